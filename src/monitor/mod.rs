pub mod clock;
pub mod room;

pub use clock::{Clock, ManualClock, SystemClock};
pub use room::{reconcile, Action, RoomMonitor};
