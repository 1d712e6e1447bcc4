//! Short-term conversational memory
//!
//! Turns age out after a timeout and the store never holds more than a fixed
//! number of them. Nothing survives a restart.

mod store;

pub use store::{ContextStore, Turn};
