//! Voucher artifacts: the scannable pass handed to a candidate.

use std::fs;
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::registry::Ticket;

#[derive(Debug, Error)]
pub enum VoucherError {
    #[error("Voucher write failed: {0}")]
    Write(String),
}

/// Voucher keyed by `(date, sequence_number)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Voucher {
    pub date: NaiveDate,
    pub sequence_number: u32,
    /// Text a scanner reads back from the pass.
    pub payload: String,
    /// Hex SHA-256 of `payload`.
    pub checksum: String,
    /// Where the writer stored it, if anywhere.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl Voucher {
    pub fn for_ticket(ticket: &Ticket) -> Self {
        let payload = format!(
            "Entry No: {}\nName: {}\nContact: {}\nDate: {} ({})\nTime: {}",
            ticket.sequence_number,
            ticket.name,
            ticket.contact,
            ticket.date.format("%Y-%m-%d"),
            ticket.day,
            ticket.time,
        );
        let checksum = format!("{:x}", Sha256::digest(payload.as_bytes()));

        Self {
            date: ticket.date,
            sequence_number: ticket.sequence_number,
            payload,
            checksum,
            location: None,
        }
    }
}

/// Stores vouchers somewhere a printer or kiosk can pick them up.
pub trait VoucherWriter: Send + Sync {
    /// Persist `voucher` for `ticket`. Returns its location.
    fn write(&self, ticket: &Ticket, voucher: &Voucher) -> Result<String, VoucherError>;
}

/// Writes each voucher payload as a text file.
///
/// Layout: `<root>/<date> - Entries/Entry_<n>_<name>_<HH-MM-SS>.txt`
#[derive(Debug, Clone)]
pub struct FsVoucherWriter {
    root: PathBuf,
}

impl FsVoucherWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, ticket: &Ticket) -> PathBuf {
        let folder = format!("{} - Entries", ticket.date.format("%Y-%m-%d"));
        let file = format!(
            "Entry_{}_{}_{}.txt",
            ticket.sequence_number,
            safe_name(&ticket.name),
            ticket.time.replace(':', "-")
        );
        self.root.join(folder).join(file)
    }
}

impl VoucherWriter for FsVoucherWriter {
    fn write(&self, ticket: &Ticket, voucher: &Voucher) -> Result<String, VoucherError> {
        let path = self.path_for(ticket);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| VoucherError::Write(e.to_string()))?;
        }
        fs::write(&path, &voucher.payload).map_err(|e| VoucherError::Write(e.to_string()))?;
        Ok(path.display().to_string())
    }
}

/// Spaces become underscores; anything that could escape the folder is dropped.
fn safe_name(name: &str) -> String {
    name.chars()
        .filter_map(|c| match c {
            ' ' => Some('_'),
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => None,
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect()
}
