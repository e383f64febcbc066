pub mod lecture;
pub mod ledger;

pub use lecture::{CancelOutcome, EndOutcome, LectureLifecycle, StartOutcome};
pub use ledger::{AttendanceLedger, BulkSummary, MarkOutcome};
