//! Error taxonomy for the render pipeline.
//!
//! Configuration errors abort startup. Everything else fails a single
//! request and never touches the shared cache.

use crate::engine::DomHandle;
use crate::request::RequestContext;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub type Result<T, E = SsrError> = std::result::Result<T, E>;

#[derive(Error)]
pub enum SsrError {
    /// Invalid or conflicting options, reported when the renderer is built.
    #[error("configuration error: {0}")]
    Config(String),

    /// The page never invoked the completion signal within the timeout.
    #[error("Render timed out ({}s), `window.{signal}` was never called.", .timeout.as_secs())]
    Timeout {
        context: Box<RequestContext>,
        handle: Arc<dyn DomHandle>,
        timeout: Duration,
        signal: String,
    },

    #[error("failed to load resource '{url}': {source}")]
    ResourceLoad {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    /// A user hook (pre-cache transform, cache function) threw or rejected.
    #[error("{label}() failed: {source}")]
    UserHook {
        label: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed trying to serialize {label}'s returned document: {source}")]
    Serialization {
        label: String,
        #[source]
        source: anyhow::Error,
    },

    /// The DOM emulation engine itself failed (startup, channel loss, ...).
    #[error("DOM emulation failed: {0}")]
    Emulation(#[source] anyhow::Error),

    /// The render-output callback failed. Not retried.
    #[error("render output callback failed: {0}")]
    Output(#[source] anyhow::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SsrError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, SsrError::Timeout { .. })
    }

    /// Request context of a timed-out render, for diagnostics.
    pub fn timed_out_context(&self) -> Option<&RequestContext> {
        match self {
            SsrError::Timeout { context, .. } => Some(context),
            _ => None,
        }
    }

    /// The still-live emulation of a timed-out render.
    pub fn timed_out_handle(&self) -> Option<&Arc<dyn DomHandle>> {
        match self {
            SsrError::Timeout { handle, .. } => Some(handle),
            _ => None,
        }
    }
}

// Hand-written so `DomHandle` does not need to be `Debug`.
impl fmt::Debug for SsrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SsrError::Config(msg) => f.debug_tuple("Config").field(msg).finish(),
            SsrError::Timeout {
                context,
                handle,
                timeout,
                signal,
            } => f
                .debug_struct("Timeout")
                .field("context", context)
                .field("url", &handle.url().as_str())
                .field("timeout", timeout)
                .field("signal", signal)
                .finish(),
            SsrError::ResourceLoad { url, source } => f
                .debug_struct("ResourceLoad")
                .field("url", url)
                .field("source", source)
                .finish(),
            SsrError::UserHook { label, source } => f
                .debug_struct("UserHook")
                .field("label", label)
                .field("source", source)
                .finish(),
            SsrError::Serialization { label, source } => f
                .debug_struct("Serialization")
                .field("label", label)
                .field("source", source)
                .finish(),
            SsrError::Emulation(e) => f.debug_tuple("Emulation").field(e).finish(),
            SsrError::Output(e) => f.debug_tuple("Output").field(e).finish(),
            SsrError::Io(e) => f.debug_tuple("Io").field(e).finish(),
        }
    }
}
