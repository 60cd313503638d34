//! The render pipeline.
//!
//! Per request: cache lookup, emulation, wait for the completion signal or
//! the timeout, restore script attributes, serialize, the pre-cache hook,
//! the cache write, and finally the render-output callback. Steps run in
//! that order and never overlap; concurrent requests share nothing but the
//! cache, the resource memo and the normalized shell.

use crate::cache::CacheStrategy;
use crate::completion::{CompletionToken, COMPLETION_SIGNAL};
use crate::config::{RenderConfig, RenderOutput, RenderedPage};
use crate::console::VirtualConsole;
use crate::engine::{DomEngine, DomHandle, EmulationOptions};
use crate::error::{Result, SsrError};
use crate::hooks::{self, Hook};
use crate::loader::{FsResourceLoader, ResourceKind, ResourceLoader};
use crate::request::RequestContext;
use crate::scripts::{self, NormalizedShell};
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

pub const PRE_CACHE_HOOK_LABEL: &str = "preCache";
const DOCUMENT_LABEL: &str = "document";

/// A post-serialization step. Each one sees the HTML the previous one
/// produced.
enum Stage {
    PreCache(Hook),
    CacheStore,
}

/// A mounted render pipeline. Build once, share behind `Arc`.
pub struct Renderer {
    shell: NormalizedShell,
    timeout: Duration,
    cache: Arc<dyn CacheStrategy>,
    engine: Arc<dyn DomEngine>,
    loader: Arc<dyn ResourceLoader>,
    console: VirtualConsole,
    run_scripts: bool,
    fetch_external: Vec<ResourceKind>,
    stages: Vec<Stage>,
    output: RenderOutput,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("timeout", &self.timeout)
            .field("scripts", &self.shell.scripts)
            .field("run_scripts", &self.run_scripts)
            .finish_non_exhaustive()
    }
}

impl Renderer {
    /// Validates `config`, reads and normalizes the shell. All
    /// configuration errors surface here, never at request time.
    pub fn new(config: RenderConfig) -> Result<Self> {
        let html = config.load_shell()?;
        let shell = scripts::normalize_shell(&html);
        tracing::info!(
            root = %config.root.display(),
            timeout_ms = config.timeout.as_millis() as u64,
            restored_scripts = shell.scripts.len(),
            "render pipeline mounted"
        );

        let fs_loader: Arc<dyn ResourceLoader> = Arc::new(FsResourceLoader::new(&config.root)?);
        let loader = match config.loader_override() {
            Some(hook) => hook.wrap(fs_loader),
            None => fs_loader,
        };
        let console = config.virtual_console();
        let engine = match config.engine {
            Some(engine) => engine,
            None => default_engine()?,
        };

        let mut stages = Vec::new();
        if let Some(hook) = config.pre_cache {
            stages.push(Stage::PreCache(hook));
        }
        stages.push(Stage::CacheStore);

        Ok(Self {
            shell,
            timeout: config.timeout,
            cache: config.cache,
            engine,
            loader,
            console,
            run_scripts: config.engine_options.run_scripts,
            fetch_external: config.engine_options.fetch_external,
            stages,
            output: config.render,
        })
    }

    /// The shell fed to each emulation, with `defer`/`async` stripped.
    pub fn shell(&self) -> &NormalizedShell {
        &self.shell
    }

    /// Renders the request and hands the result to the render-output
    /// callback.
    pub async fn handle(&self, context: &mut RequestContext) -> Result<()> {
        let page = self.render(context).await?;
        self.output.call(context, &page).map_err(SsrError::Output)
    }

    /// Runs the pipeline up to, but not including, the render-output
    /// callback.
    pub async fn render(&self, context: &mut RequestContext) -> Result<RenderedPage> {
        if let Some(html) = self.cache.lookup(context).await? {
            tracing::debug!(url = %context.original_url, "cache hit");
            return Ok(RenderedPage { html, dom: None });
        }
        tracing::debug!(url = %context.original_url, "cache miss");

        let dom = self.emulate(context).await?;

        self.restore_script_attributes(&dom).await?;

        let mut html = dom.serialize().await.map_err(|e| SsrError::Serialization {
            label: DOCUMENT_LABEL.to_string(),
            source: e.into(),
        })?;

        for stage in &self.stages {
            html = match stage {
                Stage::PreCache(hook) => {
                    hooks::normalize(Some(hook), PRE_CACHE_HOOK_LABEL, context, html, Some(&dom)).await?
                }
                Stage::CacheStore => self.cache.store(context, html, &dom).await?,
            };
        }

        Ok(RenderedPage {
            html,
            dom: Some(dom),
        })
    }

    async fn emulate(&self, context: &RequestContext) -> Result<Arc<dyn DomHandle>> {
        let full_url = context.full_url();
        let url = Url::parse(&full_url)
            .map_err(|e| SsrError::Emulation(anyhow::anyhow!("invalid request URL '{}': {}", full_url, e)))?;
        let completion = CompletionToken::new(COMPLETION_SIGNAL);
        let options = EmulationOptions {
            url,
            resource_loader: self.loader.clone(),
            console: self.console.clone(),
            completion: completion.clone(),
            run_scripts: self.run_scripts,
            fetch_external: self.fetch_external.clone(),
        };

        tracing::debug!(url = %full_url, "starting emulation");
        let dom = self.engine.create(&self.shell.html, options).await?;

        let started = Instant::now();
        let _ = tokio::time::timeout(self.timeout, completion.wait()).await;
        if completion.expire() {
            tracing::warn!(
                url = %full_url,
                timeout_ms = self.timeout.as_millis() as u64,
                "render timed out waiting for `window.{}`",
                COMPLETION_SIGNAL
            );
            return Err(SsrError::Timeout {
                context: Box::new(context.clone()),
                handle: dom,
                timeout: self.timeout,
                signal: completion.name().to_string(),
            });
        }
        tracing::debug!(
            url = %full_url,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "render signalled completion"
        );
        Ok(dom)
    }

    async fn restore_script_attributes(&self, dom: &Arc<dyn DomHandle>) -> Result<()> {
        if self.shell.scripts.is_empty() {
            return Ok(());
        }
        let base = dom.url().clone();
        let recorded = self.shell.scripts.resolved(&base);
        for script in dom.scripts().await? {
            let Some(src) = script.src.as_deref() else {
                continue;
            };
            let Ok(resolved) = base.join(src) else {
                continue;
            };
            if let Some(attr) = recorded.get(&scripts::path_and_query(&resolved)) {
                dom.set_attribute(script.node, attr.as_str(), "").await?;
            }
        }
        Ok(())
    }
}

#[cfg(feature = "deno")]
fn default_engine() -> Result<Arc<dyn DomEngine>> {
    Ok(Arc::new(crate::runtime::DenoEngine::new()))
}

#[cfg(not(feature = "deno"))]
fn default_engine() -> Result<Arc<dyn DomEngine>> {
    Err(SsrError::Config(
        "no DOM engine configured and the `deno` feature is disabled".into(),
    ))
}
