use std::fmt;

use thiserror::Error;

use crate::{advance, WatchEvent, WatchStage};

/// How a failed step affects the rest of the cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepFailure {
    /// Stop the cycle; later watches are not visited.
    AbortCycle { reason: String },
    /// Leave this watch without notifying or recording; continue with the next.
    SkipWatch { reason: String },
    /// The new items were not delivered and stay unrecorded.
    SkipPersist { reason: String },
    /// Carry on with degraded data.
    Recovered { reason: String },
}

impl StepFailure {
    /// Event that ends the watch, or `None` when the watch carries on.
    pub fn terminal_event(&self) -> Option<WatchEvent> {
        match self {
            StepFailure::AbortCycle { .. } => Some(WatchEvent::ExtractionFailed),
            StepFailure::SkipWatch { .. } => Some(WatchEvent::TableUnavailable),
            StepFailure::SkipPersist { .. } => Some(WatchEvent::NotifyFailed),
            StepFailure::Recovered { .. } => None,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            StepFailure::AbortCycle { reason }
            | StepFailure::SkipWatch { reason }
            | StepFailure::SkipPersist { reason }
            | StepFailure::Recovered { reason } => reason,
        }
    }
}

/// Conditions that must end the process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FatalError {
    /// Items were notified but could not be recorded; continuing would notify
    /// them again on every cycle.
    #[error("could not record {identifier:?} in table {table} after notifying: {reason}")]
    Persist {
        table: String,
        identifier: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchReport {
    pub table_name: String,
    pub stage: WatchStage,
    pub extracted: usize,
    pub new_items: Vec<String>,
    pub recorded: usize,
    pub reason: Option<String>,
    pub recovered: Option<String>,
}

impl WatchReport {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            stage: WatchStage::Idle,
            extracted: 0,
            new_items: Vec::new(),
            recorded: 0,
            reason: None,
            recovered: None,
        }
    }

    pub fn apply(&mut self, event: WatchEvent) {
        self.stage = advance(self.stage, event);
    }

    pub fn record_failure(&mut self, failure: StepFailure) {
        match failure.terminal_event() {
            Some(event) => {
                self.apply(event);
                self.reason = Some(failure.reason().to_string());
            }
            None => self.recovered = Some(failure.reason().to_string()),
        }
    }

    pub fn aborted_cycle(&self) -> bool {
        self.stage == WatchStage::AbortedCycle
    }

    pub fn visited(&self) -> bool {
        self.stage != WatchStage::Idle
    }
}

impl fmt::Display for WatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.table_name, self.stage.label())?;
        if self.visited() {
            write!(
                f,
                " (extracted {}, new {}, recorded {})",
                self.extracted,
                self.new_items.len(),
                self.recorded
            )?;
        }
        Ok(())
    }
}

/// Per-watch results of one cycle, in configuration order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CycleReport {
    pub watches: Vec<WatchReport>,
}

impl CycleReport {
    pub fn push(&mut self, watch: WatchReport) {
        self.watches.push(watch);
    }

    pub fn aborted(&self) -> bool {
        self.watches.iter().any(WatchReport::aborted_cycle)
    }

    pub fn notified(&self) -> usize {
        self.watches
            .iter()
            .filter(|w| w.stage == WatchStage::Done)
            .count()
    }

    pub fn recorded(&self) -> usize {
        self.watches.iter().map(|w| w.recorded).sum()
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let visited = self.watches.iter().filter(|w| w.visited()).count();
        write!(
            f,
            "{visited}/{} watches visited, {} notified, {} items recorded",
            self.watches.len(),
            self.notified(),
            self.recorded()
        )?;
        if self.aborted() {
            write!(f, ", aborted")?;
        }
        Ok(())
    }
}
