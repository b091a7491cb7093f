use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum MarkerError {
    #[error("Day marker I/O error at {path}: {message}")]
    Io { path: String, message: String },
}

/// Persisted last-active date.
pub trait DayMarker: Send + Sync {
    /// The stored date. Unreadable content reads as `None`.
    fn read(&self) -> Result<Option<NaiveDate>, MarkerError>;

    fn write(&self, date: NaiveDate) -> Result<(), MarkerError>;
}

/// Day marker stored as a `YYYY-MM-DD` text file.
#[derive(Debug, Clone)]
pub struct FileDayMarker {
    path: PathBuf,
}

impl FileDayMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, e: std::io::Error) -> MarkerError {
        MarkerError::Io {
            path: self.path.display().to_string(),
            message: e.to_string(),
        }
    }
}

impl DayMarker for FileDayMarker {
    fn read(&self) -> Result<Option<NaiveDate>, MarkerError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };

        match NaiveDate::parse_from_str(content.trim(), "%Y-%m-%d") {
            Ok(date) => Ok(Some(date)),
            Err(e) => {
                warn!(path = %self.path.display(), "Ignoring unreadable day marker: {}", e);
                Ok(None)
            }
        }
    }

    fn write(&self, date: NaiveDate) -> Result<(), MarkerError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
            }
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, date.format("%Y-%m-%d").to_string()).map_err(|e| self.io_error(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))
    }
}
