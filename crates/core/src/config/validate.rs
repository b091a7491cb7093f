use std::collections::HashSet;

use super::{types::Config, AuthMethod, ConfigError};

/// Validate configuration
///
/// Checks:
/// - server port is not 0
/// - api_key auth carries a non-empty key
/// - at least one station, with unique non-empty ids
/// - display timings are non-zero
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.auth.method == AuthMethod::ApiKey
        && config.auth.api_key.as_deref().is_none_or(str::is_empty)
    {
        return Err(ConfigError::ValidationError(
            "auth.api_key must be set when auth.method = \"api_key\"".to_string(),
        ));
    }

    if config.stations.is_empty() {
        return Err(ConfigError::ValidationError(
            "at least one [[stations]] entry is required".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for station in &config.stations {
        let id = station.id.trim();
        if id.is_empty() {
            return Err(ConfigError::ValidationError(
                "stations[].id cannot be empty".to_string(),
            ));
        }
        if !seen.insert(id) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate station id: {}",
                id
            )));
        }
    }

    if config.display.poll_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "display.poll_interval_ms cannot be 0".to_string(),
        ));
    }

    if config.display.highlight_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "display.highlight_interval_ms cannot be 0".to_string(),
        ));
    }

    Ok(())
}
