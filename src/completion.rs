//! Per-request completion token.
//!
//! The page calls the signal function exactly once when it has finished
//! rendering. The pipeline races that against its timer; whichever claims
//! the token first wins, and everything after is a no-op.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Name of the global function the page must call when it is done.
pub const COMPLETION_SIGNAL: &str = "onModulesLoaded";

const PENDING: u8 = 0;
const SIGNALED: u8 = 1;
const EXPIRED: u8 = 2;

#[derive(Clone)]
pub struct CompletionToken {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    state: AtomicU8,
    done: watch::Sender<bool>,
    watcher: watch::Receiver<bool>,
}

impl std::fmt::Debug for CompletionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionToken")
            .field("name", &self.inner.name)
            .field("state", &self.inner.state.load(Ordering::Acquire))
            .finish()
    }
}

impl CompletionToken {
    pub fn new(name: impl Into<String>) -> Self {
        let (done, watcher) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                state: AtomicU8::new(PENDING),
                done,
                watcher,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Called from the page. Returns true only for the call that completed
    /// the render; repeats are ignored and a call after expiry is logged.
    pub fn signal(&self) -> bool {
        match self
            .inner
            .state
            .compare_exchange(PENDING, SIGNALED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                self.inner.done.send_replace(true);
                true
            }
            Err(SIGNALED) => false,
            Err(_) => {
                tracing::warn!(
                    signal = %self.inner.name,
                    "`window.{}` called after the render timed out; ignoring",
                    self.inner.name
                );
                false
            }
        }
    }

    /// Called by the pipeline when its timer fires. Returns true if the
    /// token was still pending (the render has timed out); false if the
    /// signal got there first.
    pub fn expire(&self) -> bool {
        self.inner
            .state
            .compare_exchange(PENDING, EXPIRED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_signaled(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == SIGNALED
    }

    /// Resolves once `signal` has succeeded.
    pub async fn wait(&self) {
        let mut watcher = self.inner.watcher.clone();
        // The sender lives in `inner`, so this only ends on a signal.
        let _ = watcher.wait_for(|done| *done).await;
    }
}
