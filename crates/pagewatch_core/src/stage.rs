/// Where a watch is within one cycle.
///
/// `Done`, `NothingNew`, `SkippedWatch`, `SkippedPersist` and `AbortedCycle`
/// are terminal. A watch that is still `Idle` when the cycle ends was never
/// visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatchStage {
    #[default]
    Idle,
    Extracting,
    Reconciling,
    Notifying,
    Persisting,
    Done,
    NothingNew,
    SkippedWatch,
    SkippedPersist,
    AbortedCycle,
}

impl WatchStage {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WatchStage::Done
                | WatchStage::NothingNew
                | WatchStage::SkippedWatch
                | WatchStage::SkippedPersist
                | WatchStage::AbortedCycle
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            WatchStage::Idle => "not visited",
            WatchStage::Extracting => "extracting",
            WatchStage::Reconciling => "reconciling",
            WatchStage::Notifying => "notifying",
            WatchStage::Persisting => "persisting",
            WatchStage::Done => "done",
            WatchStage::NothingNew => "nothing new",
            WatchStage::SkippedWatch => "skipped",
            WatchStage::SkippedPersist => "notify failed, not recorded",
            WatchStage::AbortedCycle => "extraction failed, cycle aborted",
        }
    }
}
