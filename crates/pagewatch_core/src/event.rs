#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEvent {
    /// The reconciler picked the watch up.
    Started,
    /// The page rendered and the script returned its items.
    Extracted,
    /// Rendering or the script failed, or the deadline passed while extracting.
    ExtractionFailed,
    /// The ledger table could not be created.
    TableUnavailable,
    /// The diff against the ledger is known.
    Diffed { new_items: usize },
    /// The notification was accepted.
    Notified,
    /// The notification failed or was rejected.
    NotifyFailed,
    /// Every new item was recorded in the ledger.
    Persisted,
}
