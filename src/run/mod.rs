//! Run state, progress throttling and process coordination.

mod coordinator;
mod state;
mod throttle;

pub use coordinator::*;
pub use state::*;
pub use throttle::*;
