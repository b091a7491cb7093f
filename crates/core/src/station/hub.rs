use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::Mutex;

use super::{StationController, StationError, StationState};
use crate::audit::AuditHandle;
use crate::clock::Calendar;
use crate::config::StationConfig;
use crate::ledger::CallLedger;
use crate::registry::Registry;

/// Every configured station, each behind its own lock.
///
/// Operations on one station are serialised; different stations proceed
/// concurrently and only meet in the ledger.
pub struct StationHub {
    stations: Vec<Arc<Mutex<StationController>>>,
    index: HashMap<String, usize>,
    labels: HashMap<String, String>,
}

impl StationHub {
    pub fn new(
        configs: &[StationConfig],
        registry: Arc<dyn Registry>,
        ledger: Arc<dyn CallLedger>,
        calendar: Calendar,
        max_claim_retries: u32,
        audit: Option<AuditHandle>,
    ) -> Self {
        let mut stations = Vec::with_capacity(configs.len());
        let mut index = HashMap::new();
        let mut labels = HashMap::new();

        for config in configs {
            let mut controller = StationController::new(
                config,
                registry.clone(),
                ledger.clone(),
                calendar.clone(),
                max_claim_retries,
            );
            if let Some(ref audit) = audit {
                controller = controller.with_audit(audit.clone());
            }
            index.insert(config.id.clone(), stations.len());
            labels.insert(config.id.clone(), config.display_label().to_string());
            stations.push(Arc::new(Mutex::new(controller)));
        }

        Self {
            stations,
            index,
            labels,
        }
    }

    pub fn get(&self, station_id: &str) -> Result<Arc<Mutex<StationController>>, StationError> {
        self.index
            .get(station_id)
            .map(|&i| self.stations[i].clone())
            .ok_or_else(|| StationError::NotFound(station_id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// Station id to display label.
    pub fn labels(&self) -> &HashMap<String, String> {
        &self.labels
    }

    /// Snapshot of every station, in configuration order.
    pub async fn states(&self) -> Vec<StationState> {
        let mut states = Vec::with_capacity(self.stations.len());
        for station in &self.stations {
            states.push(station.lock().await.state().clone());
        }
        states
    }

    pub async fn on_day_reset(&self, date: NaiveDate) {
        for station in &self.stations {
            station.lock().await.on_day_reset(date);
        }
    }
}
