//! Live class lifecycle and join authorization engine.
//!
//! Storage, the video provider and the dispatch service sit behind the
//! traits in [`ports`]; [`services`] holds the engine proper.

pub mod config;
pub mod errors;
pub mod identity;
pub mod mock;
pub mod models;
pub mod ports;
pub mod services;
pub mod windows;

pub use config::EngineConfig;
pub use errors::{ClassError, ClassResult};
pub use services::EngineContext;
