//! HTTP clients for the external services behind the engine's ports.

pub mod dispatch;
pub mod video;

pub use dispatch::HttpDispatcher;
pub use video::HttpVideoProvider;

use liveclass_core::errors::ClassError;

pub(crate) fn upstream(service: &str, e: impl std::fmt::Display) -> ClassError {
    let msg = format!("{} request failed: {}", service, e);
    tracing::error!("{}", msg);
    ClassError::Upstream(msg)
}
