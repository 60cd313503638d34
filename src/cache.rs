//! Cache strategies: disabled, in-memory (default), user function, disk.
//!
//! `lookup` runs before any emulation; a non-empty answer is served as is.
//! `store` runs after a render and returns the HTML that is finally sent,
//! which lets a function strategy both own storage and rewrite the page.

use crate::engine::DomHandle;
use crate::error::Result;
use crate::hooks::{self, Hook, HookArgs};
use crate::request::RequestContext;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

#[async_trait]
pub trait CacheStrategy: Send + Sync {
    async fn lookup(&self, context: &mut RequestContext) -> Result<Option<String>>;

    async fn store(
        &self,
        context: &mut RequestContext,
        html: String,
        dom: &Arc<dyn DomHandle>,
    ) -> Result<String>;
}

/// Never hits, never stores.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

#[async_trait]
impl CacheStrategy for NoCache {
    async fn lookup(&self, _context: &mut RequestContext) -> Result<Option<String>> {
        Ok(None)
    }

    async fn store(
        &self,
        _context: &mut RequestContext,
        html: String,
        _dom: &Arc<dyn DomHandle>,
    ) -> Result<String> {
        Ok(html)
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    entries: HashMap<String, String>,
    order: VecDeque<String>,
}

/// Rendered HTML keyed by the request's original URL, for the life of the
/// process. Unbounded unless built with [`MemoryCache::bounded`].
#[derive(Debug, Default)]
pub struct MemoryCache {
    inner: Mutex<MemoryInner>,
    max_entries: Option<usize>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps at most `max_entries`, evicting the oldest insert first.
    pub fn bounded(max_entries: usize) -> Self {
        Self {
            inner: Mutex::default(),
            max_entries: Some(max_entries.max(1)),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().entries.get(key).cloned()
    }

    pub fn insert(&self, key: impl Into<String>, html: impl Into<String>) {
        let key = key.into();
        let mut inner = self.lock();
        if inner.entries.insert(key.clone(), html.into()).is_none() {
            inner.order.push_back(key);
        }
        if let Some(max) = self.max_entries {
            while inner.entries.len() > max {
                let Some(oldest) = inner.order.pop_front() else {
                    break;
                };
                inner.entries.remove(&oldest);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl CacheStrategy for MemoryCache {
    async fn lookup(&self, context: &mut RequestContext) -> Result<Option<String>> {
        Ok(self.get(&context.original_url).filter(|html| !html.is_empty()))
    }

    async fn store(
        &self,
        context: &mut RequestContext,
        html: String,
        _dom: &Arc<dyn DomHandle>,
    ) -> Result<String> {
        self.insert(context.original_url.clone(), html.clone());
        tracing::debug!(key = %context.original_url, "cached render");
        Ok(html)
    }
}

/// Caching delegated to user code.
///
/// The hook is called with `html: None` for a lookup, and with the
/// rendered HTML and live DOM after a render; what it returns then is the
/// final HTML. The pipeline stores nothing itself.
#[derive(Debug, Clone)]
pub struct FnCache {
    hook: Hook,
}

pub const CACHE_HOOK_LABEL: &str = "cache";

impl FnCache {
    pub fn new(hook: Hook) -> Self {
        Self { hook }
    }
}

#[async_trait]
impl CacheStrategy for FnCache {
    async fn lookup(&self, context: &mut RequestContext) -> Result<Option<String>> {
        let args = HookArgs {
            context: context.clone(),
            html: None,
            dom: None,
        };
        let output = self
            .hook
            .call(args)
            .await
            .map_err(|source| crate::error::SsrError::UserHook {
                label: CACHE_HOOK_LABEL.to_string(),
                source,
            })?;
        hooks::output_to_html(CACHE_HOOK_LABEL, output).await
    }

    async fn store(
        &self,
        context: &mut RequestContext,
        html: String,
        dom: &Arc<dyn DomHandle>,
    ) -> Result<String> {
        hooks::normalize(Some(&self.hook), CACHE_HOOK_LABEL, context, html, Some(dom)).await
    }
}
