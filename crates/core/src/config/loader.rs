use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use super::{types::Config, validate_config, ConfigError};

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "TOKENLINE_CONFIG";

/// Used when `TOKENLINE_CONFIG` is unset or empty.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Prefix for per-key overrides, `__` separating nested keys
/// (`TOKENLINE_SERVER__PORT=9000`).
const ENV_PREFIX: &str = "TOKENLINE_";

/// Pick the config file from the value of `TOKENLINE_CONFIG`.
pub fn resolve_config_path(value: Option<OsString>) -> PathBuf {
    match value {
        Some(value) if !value.is_empty() => PathBuf::from(value),
        _ => PathBuf::from(DEFAULT_CONFIG_PATH),
    }
}

/// Config file location for this process.
pub fn config_path_from_env() -> PathBuf {
    resolve_config_path(std::env::var_os(CONFIG_PATH_ENV))
}

fn layered(path: &Path) -> Figment {
    // TOKENLINE_CONFIG shares the prefix but is a location, not a key.
    Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).ignore(&["config"]).split("__"))
}

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    layered(path)
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Load, then reject configurations the service cannot run with.
pub fn load_validated_config(path: &Path) -> Result<Config, ConfigError> {
    let config = load_config(path)?;
    validate_config(&config)?;
    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn write_toml(content: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", content).unwrap();
        temp_file
    }

    #[test]
    fn test_config_path_defaults_when_unset_or_empty() {
        assert_eq!(resolve_config_path(None), PathBuf::from("config.toml"));
        assert_eq!(
            resolve_config_path(Some(OsString::new())),
            PathBuf::from("config.toml")
        );
    }

    #[test]
    fn test_config_path_from_variable() {
        assert_eq!(
            resolve_config_path(Some(OsString::from("/etc/tokenline/clinic.toml"))),
            PathBuf::from("/etc/tokenline/clinic.toml")
        );
    }

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[auth]
method = "none"

[server]
port = 9000

[[stations]]
id = "room-1"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.stations[0].id, "room-1");
    }

    #[test]
    fn test_load_config_from_str_missing_auth() {
        let toml = r#"
[server]
port = 8080
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/tokenline.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_directory_is_not_a_config_file() {
        let dir = TempDir::new().unwrap();
        let result = load_config(dir.path());
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let temp_file = write_toml(
            r#"
[auth]
method = "none"

[server]
host = "127.0.0.1"
port = 3000

[ledger]
backend = "json_file"

[[stations]]
id = "room-1"
label = "Room 1"
"#,
        );

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
        assert_eq!(config.stations[0].display_label(), "Room 1");
    }

    #[test]
    fn test_validated_load_rejects_empty_station_list() {
        let temp_file = write_toml(
            r#"
[auth]
method = "none"
"#,
        );

        let result = load_validated_config(temp_file.path());
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }
}
