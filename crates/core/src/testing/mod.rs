//! Test doubles and fixtures.
//!
//! Every storage seam has an in-memory stand-in with failure injection, so
//! outage, race and rollover scenarios run without real infrastructure.
//!
//! # Example
//!
//! ```rust,ignore
//! use tokenline_core::testing::{FixedClock, MockRegistry, MockVoucherWriter};
//!
//! let clock = Arc::new(FixedClock::at("2024-01-01T09:00:00Z"));
//! let registry = Arc::new(MockRegistry::new());
//! registry.set_unavailable(true);
//! ```

mod mock_clock;
mod mock_registry;
mod mock_voucher;

pub use mock_clock::{FixedClock, MemoryDayMarker};
pub use mock_registry::MockRegistry;
pub use mock_voucher::MockVoucherWriter;

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::{NaiveDate, TimeZone, Utc};

    use crate::config::{load_config_from_str, Config};
    use crate::registry::Ticket;

    /// A ticket issued at 09:00:00 on `date`.
    pub fn ticket_on(date: NaiveDate, sequence_number: u32, name: &str) -> Ticket {
        let created_at = date
            .and_hms_opt(9, 0, 0)
            .map(|naive| Utc.from_utc_datetime(&naive))
            .unwrap_or_else(Utc::now);
        Ticket {
            date,
            day: date.format("%A").to_string(),
            time: "09:00:00".to_string(),
            name: name.to_string(),
            contact: "555-0100".to_string(),
            sequence_number,
            created_at,
        }
    }

    /// Tickets numbered from 1, one per name.
    pub fn tickets_on(date: NaiveDate, names: &[&str]) -> Vec<Ticket> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| ticket_on(date, i as u32 + 1, name))
            .collect()
    }

    /// Minimal valid configuration with the given station ids.
    pub fn config_with_stations(ids: &[&str]) -> Config {
        let mut toml = String::from("[auth]\nmethod = \"none\"\n");
        for id in ids {
            toml.push_str(&format!("\n[[stations]]\nid = \"{}\"\n", id));
        }
        match load_config_from_str(&toml) {
            Ok(config) => config,
            Err(e) => panic!("fixture config failed to parse: {}", e),
        }
    }
}
