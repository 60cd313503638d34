//! Resource loading for the emulated page.
//!
//! The default loader serves scripts and stylesheets from the root
//! directory only: the URL's path is resolved under `root`, escapes are
//! blocked via canonicalization, and reads are memoized for the life of
//! the process. A user override wraps it and may delegate back to it.

use crate::error::{Result, SsrError};
use anyhow::anyhow;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Script,
    Stylesheet,
}

/// A resource requested by the emulated page, with its URL resolved
/// against the page URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub url: Url,
    pub kind: ResourceKind,
}

impl Resource {
    pub fn new(url: Url, kind: ResourceKind) -> Self {
        Self { url, kind }
    }
}

#[async_trait]
pub trait ResourceLoader: Send + Sync {
    async fn load(&self, resource: &Resource) -> Result<Arc<[u8]>>;
}

/// Reads resources from the served root directory.
pub struct FsResourceLoader {
    root: PathBuf,
    memo: Mutex<HashMap<PathBuf, Arc<[u8]>>>,
    disk_reads: AtomicUsize,
}

impl FsResourceLoader {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().canonicalize().map_err(|e| {
            SsrError::Config(format!(
                "failed to canonicalize root '{}': {}",
                root.as_ref().display(),
                e
            ))
        })?;
        if !root.is_dir() {
            return Err(SsrError::Config(format!(
                "root '{}' must be a directory",
                root.display()
            )));
        }
        Ok(Self {
            root,
            memo: Mutex::new(HashMap::new()),
            disk_reads: AtomicUsize::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of files actually read from disk (memo misses).
    pub fn disk_reads(&self) -> usize {
        self.disk_reads.load(Ordering::Relaxed)
    }

    fn resolve(&self, url: &Url) -> PathBuf {
        self.root.join(url.path().trim_start_matches('/'))
    }

    fn remembered(&self, path: &Path) -> Option<Arc<[u8]>> {
        self.memo
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(path)
            .cloned()
    }
}

#[async_trait]
impl ResourceLoader for FsResourceLoader {
    async fn load(&self, resource: &Resource) -> Result<Arc<[u8]>> {
        let path = self.resolve(&resource.url);
        if let Some(bytes) = self.remembered(&path) {
            return Ok(bytes);
        }

        let fail = |source: anyhow::Error| SsrError::ResourceLoad {
            url: resource.url.to_string(),
            source,
        };

        let canonical = tokio::fs::canonicalize(&path)
            .await
            .map_err(|e| fail(anyhow!("'{}': {}", path.display(), e)))?;
        if !canonical.starts_with(&self.root) {
            return Err(fail(anyhow!(
                "access denied: '{}' is outside the root directory",
                canonical.display()
            )));
        }

        let bytes: Arc<[u8]> = tokio::fs::read(&canonical)
            .await
            .map_err(|e| fail(anyhow!("failed to read '{}': {}", canonical.display(), e)))?
            .into();
        self.disk_reads.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            target: "ssr_prerender::emulator",
            path = %canonical.display(),
            bytes = bytes.len(),
            "loaded resource"
        );

        self.memo
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(path, bytes.clone());
        Ok(bytes)
    }
}

type OverrideFn = dyn Fn(Resource, Arc<dyn ResourceLoader>) -> BoxFuture<'static, Result<Arc<[u8]>>>
    + Send
    + Sync;

/// User override for resource loading. Receives the resource and the
/// default loader; it may rewrite the resource and delegate, or answer
/// on its own.
#[derive(Clone)]
pub struct LoaderOverride(Arc<OverrideFn>);

impl LoaderOverride {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Resource, Arc<dyn ResourceLoader>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<[u8]>>> + Send + 'static,
    {
        Self(Arc::new(move |resource, fallback| Box::pin(f(resource, fallback))))
    }

    /// Wraps `fallback` so every load goes through this override first.
    pub fn wrap(&self, fallback: Arc<dyn ResourceLoader>) -> Arc<dyn ResourceLoader> {
        Arc::new(OverrideLoader {
            hook: self.clone(),
            fallback,
        })
    }
}

impl std::fmt::Debug for LoaderOverride {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("LoaderOverride(..)")
    }
}

struct OverrideLoader {
    hook: LoaderOverride,
    fallback: Arc<dyn ResourceLoader>,
}

#[async_trait]
impl ResourceLoader for OverrideLoader {
    async fn load(&self, resource: &Resource) -> Result<Arc<[u8]>> {
        (self.hook.0)(resource.clone(), self.fallback.clone()).await
    }
}
