pub mod conflict;
pub mod timetable;

pub use conflict::{validate_and_insert, ConflictResolver, ConflictScope, SlotRejection};
pub use timetable::TimetableIndex;
