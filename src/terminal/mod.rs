//! Terminal crate: sub-modules.

pub mod types;
pub mod codec;
pub mod transport;
pub mod reader;
pub mod session;
pub mod ports;

// Re-export top-level items for convenience.
pub use types::*;
pub use session::{SessionChannels, SessionController};
