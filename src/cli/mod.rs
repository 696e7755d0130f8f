//! Agent process spawning and output stream parsing.

mod events;
mod process;
mod stderr;
mod stream;

pub use events::*;
pub use process::*;
pub use stderr::*;
pub use stream::*;
