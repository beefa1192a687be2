pub mod calendar;
pub mod queue;
pub mod scheduling;

/// Read-merge-save rounds before a contended update gives up.
pub(crate) const SAVE_ATTEMPTS: usize = 3;
