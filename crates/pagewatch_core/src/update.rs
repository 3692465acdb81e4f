use crate::{WatchEvent, WatchStage};

/// Pure transition function for one watch.
///
/// Events that do not apply to the current stage leave it unchanged, so a
/// terminal stage never moves again.
pub fn advance(stage: WatchStage, event: WatchEvent) -> WatchStage {
    match (stage, event) {
        (WatchStage::Idle, WatchEvent::Started) => WatchStage::Extracting,
        (WatchStage::Extracting, WatchEvent::Extracted) => WatchStage::Reconciling,
        (WatchStage::Extracting, WatchEvent::ExtractionFailed) => WatchStage::AbortedCycle,
        (WatchStage::Reconciling, WatchEvent::TableUnavailable) => WatchStage::SkippedWatch,
        (WatchStage::Reconciling, WatchEvent::Diffed { new_items: 0 }) => WatchStage::NothingNew,
        (WatchStage::Reconciling, WatchEvent::Diffed { .. }) => WatchStage::Notifying,
        (WatchStage::Notifying, WatchEvent::Notified) => WatchStage::Persisting,
        (WatchStage::Notifying, WatchEvent::NotifyFailed) => WatchStage::SkippedPersist,
        (WatchStage::Persisting, WatchEvent::Persisted) => WatchStage::Done,
        (stage, _) => stage,
    }
}
