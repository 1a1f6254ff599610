//! ESC Core
//!
//! Resource model and the state waiters that turn asynchronous Event Store
//! Cloud operations into blocking calls.

pub mod clock;
pub mod resource;
pub mod waiter;

pub use clock::{BoxFuture, Clock, ManualClock, TokioClock};
pub use resource::{ResourceKind, StatusSnapshot, WaitRequest, status};
pub use waiter::{StateWaiter, StatusAccessor, WaitError, WaitOptions, WaitResult};
