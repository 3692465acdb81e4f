use engine_logging::engine_info;
use pagewatch_core::{CycleReport, FatalError, WatchConfig};
use tokio::sync::Mutex;

use crate::Reconciler;

/// Everything a trigger needs, built once at startup and never mutated.
///
/// Cycles are serialized: a trigger that arrives while a cycle runs waits
/// for it to finish before starting its own.
pub struct ServiceContext {
    watches: Vec<WatchConfig>,
    reconciler: Reconciler,
    gate: Mutex<()>,
}

impl ServiceContext {
    pub fn new(watches: Vec<WatchConfig>, reconciler: Reconciler) -> Self {
        Self {
            watches,
            reconciler,
            gate: Mutex::new(()),
        }
    }

    pub fn watches(&self) -> &[WatchConfig] {
        &self.watches
    }

    pub async fn tick(&self) -> Result<CycleReport, FatalError> {
        let _cycle = self.gate.lock().await;
        engine_info!("Enter tick ({} watches).", self.watches.len());
        let report = self.reconciler.run_cycle(&self.watches).await?;
        engine_info!("Exit tick: {}", report);
        Ok(report)
    }
}
