pub mod builder;
pub mod handle;

mod connection;
mod dispatch;

pub use builder::{DEFAULT_MODEL, DEFAULT_SYSTEM_INSTRUCTION, DEFAULT_VOICE, LiveSessionBuilder};
pub use handle::{LiveSession, SessionState};
