//! Render configuration: the builder used from Rust, and the serde form
//! read from `ssr.json` files and CLI flags.

use crate::cache::{CacheStrategy, FnCache, MemoryCache, NoCache};
use crate::console::{ConsolePrefix, ConsoleSink, VirtualConsole};
use crate::disk_cache::{DiskCache, DiskCacheOptions};
use crate::engine::{DomEngine, DomHandle};
use crate::error::{Result, SsrError};
use crate::hooks::Hook;
use crate::loader::{LoaderOverride, ResourceKind};
use crate::request::RequestContext;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_INDEX: &str = "index.html";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// The final page of a request, as handed to the render-output callback.
#[derive(Clone)]
pub struct RenderedPage {
    pub html: String,
    /// The live emulation; `None` when the page came from the cache.
    pub dom: Option<Arc<dyn DomHandle>>,
}

impl std::fmt::Debug for RenderedPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderedPage")
            .field("html", &self.html)
            .field("dom", &self.dom.as_ref().map(|d| d.url().as_str().to_string()))
            .finish()
    }
}

type OutputFn = dyn Fn(&mut RequestContext, &RenderedPage) -> anyhow::Result<()> + Send + Sync;

/// Called exactly once per request with the final HTML.
#[derive(Clone)]
pub struct RenderOutput(Arc<OutputFn>);

impl RenderOutput {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut RequestContext, &RenderedPage) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub(crate) fn call(&self, context: &mut RequestContext, page: &RenderedPage) -> anyhow::Result<()> {
        (self.0)(context, page)
    }
}

impl Default for RenderOutput {
    /// Writes the HTML as the response body.
    fn default() -> Self {
        Self::new(|context, page| {
            context.set_html(page.html.clone());
            Ok(())
        })
    }
}

impl std::fmt::Debug for RenderOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RenderOutput(..)")
    }
}

/// Options passed through to the emulation engine.
#[derive(Clone, Debug)]
pub struct EngineOptions {
    pub run_scripts: bool,
    pub fetch_external: Vec<ResourceKind>,
    /// Engine-level console; conflicts with [`RenderConfigBuilder::console`].
    pub console: Option<VirtualConsole>,
    /// Engine-level loader override; conflicts with
    /// [`RenderConfigBuilder::resource_loader`].
    pub resource_loader: Option<LoaderOverride>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            run_scripts: true,
            fetch_external: vec![ResourceKind::Script, ResourceKind::Stylesheet],
            console: None,
            resource_loader: None,
        }
    }
}

/// Everything a [`Renderer`](crate::Renderer) is mounted with. Build with
/// [`RenderConfig::builder`]; checked by `Renderer::new`.
#[derive(Clone)]
pub struct RenderConfig {
    pub root: PathBuf,
    pub index: String,
    /// Literal shell; when set, `index` is not read.
    pub html: Option<String>,
    pub timeout: Duration,
    pub cache: Arc<dyn CacheStrategy>,
    pub console: Option<Arc<dyn ConsoleSink>>,
    pub console_prefix: ConsolePrefix,
    pub resource_loader: Option<LoaderOverride>,
    /// Defaults to the built-in deno engine.
    pub engine: Option<Arc<dyn DomEngine>>,
    pub engine_options: EngineOptions,
    pub pre_cache: Option<Hook>,
    pub render: RenderOutput,
}

impl std::fmt::Debug for RenderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderConfig")
            .field("root", &self.root)
            .field("index", &self.index)
            .field("html", &self.html.as_ref().map(String::len))
            .field("timeout", &self.timeout)
            .field("console_prefix", &self.console_prefix)
            .field("engine_options", &self.engine_options)
            .field("pre_cache", &self.pre_cache.is_some())
            .finish_non_exhaustive()
    }
}

impl RenderConfig {
    pub fn builder(root: impl Into<PathBuf>) -> RenderConfigBuilder {
        RenderConfigBuilder {
            config: RenderConfig {
                root: root.into(),
                index: DEFAULT_INDEX.to_string(),
                html: None,
                timeout: DEFAULT_TIMEOUT,
                cache: Arc::new(MemoryCache::new()),
                console: None,
                console_prefix: ConsolePrefix::Default,
                resource_loader: None,
                engine: None,
                engine_options: EngineOptions::default(),
                pre_cache: None,
                render: RenderOutput::default(),
            },
        }
    }

    /// Reads the shell from `html` or `root/index` and rejects conflicting
    /// options. Run once, at mount time.
    pub(crate) fn load_shell(&self) -> Result<String> {
        if !self.root.is_dir() {
            return Err(SsrError::Config(format!(
                "root directory '{}' does not exist",
                self.root.display()
            )));
        }
        if self.timeout.is_zero() {
            return Err(SsrError::Config("timeout must be greater than zero".into()));
        }
        if self.console.is_some() && self.engine_options.console.is_some() {
            return Err(SsrError::Config(
                "`console` and `engine_options.console` cannot both be set".into(),
            ));
        }
        if self.resource_loader.is_some() && self.engine_options.resource_loader.is_some() {
            return Err(SsrError::Config(
                "`resource_loader` and `engine_options.resource_loader` cannot both be set".into(),
            ));
        }

        let html = match &self.html {
            Some(html) => html.clone(),
            None => {
                let path = self.root.join(&self.index);
                std::fs::read_to_string(&path).map_err(|e| {
                    SsrError::Config(format!("failed to read shell '{}': {}", path.display(), e))
                })?
            }
        };
        if html.trim().is_empty() {
            return Err(SsrError::Config("the HTML shell is empty".into()));
        }
        Ok(html)
    }

    /// The console the page writes to: the engine-level one, else the
    /// top-level sink with the configured prefix, else `tracing`.
    pub(crate) fn virtual_console(&self) -> VirtualConsole {
        if let Some(console) = &self.engine_options.console {
            return console.clone();
        }
        match &self.console {
            Some(sink) => VirtualConsole::new(sink.clone(), self.console_prefix.clone()),
            None => VirtualConsole::new(
                Arc::new(crate::console::TracingSink),
                self.console_prefix.clone(),
            ),
        }
    }

    pub(crate) fn loader_override(&self) -> Option<&LoaderOverride> {
        self.resource_loader
            .as_ref()
            .or(self.engine_options.resource_loader.as_ref())
    }
}

pub struct RenderConfigBuilder {
    config: RenderConfig,
}

impl RenderConfigBuilder {
    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.config.index = index.into();
        self
    }

    pub fn html(mut self, html: impl Into<String>) -> Self {
        self.config.html = Some(html.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn cache(mut self, cache: impl CacheStrategy + 'static) -> Self {
        self.config.cache = Arc::new(cache);
        self
    }

    pub fn shared_cache(mut self, cache: Arc<dyn CacheStrategy>) -> Self {
        self.config.cache = cache;
        self
    }

    pub fn no_cache(self) -> Self {
        self.cache(NoCache)
    }

    /// Caching owned by user code; see [`FnCache`].
    pub fn cache_fn(self, hook: Hook) -> Self {
        self.cache(FnCache::new(hook))
    }

    pub fn disk_cache(self, options: DiskCacheOptions) -> Self {
        self.cache(DiskCache::new(options))
    }

    pub fn console(mut self, sink: impl ConsoleSink + 'static) -> Self {
        self.config.console = Some(Arc::new(sink));
        self
    }

    pub fn console_prefix(mut self, prefix: ConsolePrefix) -> Self {
        self.config.console_prefix = prefix;
        self
    }

    pub fn resource_loader(mut self, loader: LoaderOverride) -> Self {
        self.config.resource_loader = Some(loader);
        self
    }

    pub fn engine(mut self, engine: Arc<dyn DomEngine>) -> Self {
        self.config.engine = Some(engine);
        self
    }

    pub fn engine_options(mut self, options: EngineOptions) -> Self {
        self.config.engine_options = options;
        self
    }

    pub fn pre_cache(mut self, hook: Hook) -> Self {
        self.config.pre_cache = Some(hook);
        self
    }

    pub fn render(mut self, output: RenderOutput) -> Self {
        self.config.render = output;
        self
    }

    pub fn build(self) -> RenderConfig {
        self.config
    }
}

/// `cache` as written in a config file: `true`/`false` or disk options.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum CacheSetting {
    Enabled(bool),
    Disk(DiskCacheSetting),
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct DiskCacheSetting {
    pub dir: Option<PathBuf>,
    pub invalidate_previous: bool,
}

/// `console` as written in a config file: a prefix label, or `false` for
/// no prefix.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ConsoleSetting {
    Enabled(bool),
    Prefix(String),
}

/// Serializable subset of the options, as read from `ssr.json`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SsrOptions {
    pub root: Option<PathBuf>,
    pub index: Option<String>,
    pub html: Option<String>,
    /// Milliseconds.
    pub timeout: Option<u64>,
    pub cache: Option<CacheSetting>,
    pub console: Option<ConsoleSetting>,
}

impl SsrOptions {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| SsrError::Config(format!("invalid config '{}': {}", path.display(), e)))
    }

    /// Reads `path` if it exists.
    pub fn from_optional_file(path: &Path) -> Result<Option<Self>> {
        if !path.is_file() {
            return Ok(None);
        }
        Self::from_file(path).map(Some)
    }

    /// Field-wise override: anything set in `other` wins.
    pub fn merge(mut self, other: SsrOptions) -> Self {
        if other.root.is_some() {
            self.root = other.root;
        }
        if other.index.is_some() {
            self.index = other.index;
        }
        if other.html.is_some() {
            self.html = other.html;
        }
        if other.timeout.is_some() {
            self.timeout = other.timeout;
        }
        if other.cache.is_some() {
            self.cache = other.cache;
        }
        if other.console.is_some() {
            self.console = other.console;
        }
        self
    }

    /// Turns the file form into a builder. `root` falls back to `build`.
    pub fn into_builder(self) -> RenderConfigBuilder {
        let mut builder = RenderConfig::builder(self.root.unwrap_or_else(|| PathBuf::from("build")));
        if let Some(index) = self.index {
            builder = builder.index(index);
        }
        if let Some(html) = self.html {
            builder = builder.html(html);
        }
        if let Some(ms) = self.timeout {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        builder = match self.cache {
            None | Some(CacheSetting::Enabled(true)) => builder,
            Some(CacheSetting::Enabled(false)) => builder.no_cache(),
            Some(CacheSetting::Disk(disk)) => {
                let mut options = DiskCacheOptions::default().invalidate_previous(disk.invalidate_previous);
                if let Some(dir) = disk.dir {
                    options.dir = dir;
                }
                builder.disk_cache(options)
            }
        };
        match self.console {
            Some(ConsoleSetting::Enabled(false)) => builder.console_prefix(ConsolePrefix::Disabled),
            Some(ConsoleSetting::Prefix(label)) => builder.console_prefix(ConsolePrefix::Custom(label)),
            Some(ConsoleSetting::Enabled(true)) | None => builder,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::ConsoleLevel;
    use tempfile::tempdir;

    #[test]
    fn test_builder_defaults() {
        let config = RenderConfig::builder("/srv/app").build();
        assert_eq!(config.index, "index.html");
        assert_eq!(config.timeout, Duration::from_millis(5000));
        assert!(config.engine_options.run_scripts);
        assert_eq!(config.engine_options.fetch_external.len(), 2);
    }

    #[test]
    fn test_missing_root_is_rejected() {
        let config = RenderConfig::builder("/definitely/not/here").html("<p>x</p>").build();
        assert!(matches!(config.load_shell(), Err(SsrError::Config(_))));
    }

    #[test]
    fn test_shell_read_from_index() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("app.html"), "<p>app</p>").unwrap();
        let config = RenderConfig::builder(dir.path()).index("app.html").build();
        assert_eq!(config.load_shell().unwrap(), "<p>app</p>");

        let missing = RenderConfig::builder(dir.path()).build();
        assert!(missing.load_shell().is_err());
    }

    #[test]
    fn test_empty_shell_and_zero_timeout_are_rejected() {
        let dir = tempdir().unwrap();
        let empty = RenderConfig::builder(dir.path()).html("  ").build();
        assert!(empty.load_shell().is_err());
        let zero = RenderConfig::builder(dir.path())
            .html("<p>x</p>")
            .timeout(Duration::ZERO)
            .build();
        assert!(zero.load_shell().is_err());
    }

    #[test]
    fn test_console_conflict_is_rejected() {
        let dir = tempdir().unwrap();
        let config = RenderConfig::builder(dir.path())
            .html("<p>x</p>")
            .console(|_: ConsoleLevel, _: &str| {})
            .engine_options(EngineOptions {
                console: Some(VirtualConsole::default()),
                ..EngineOptions::default()
            })
            .build();
        let err = config.load_shell().unwrap_err();
        assert!(err.to_string().contains("console"));
    }

    #[test]
    fn test_loader_conflict_is_rejected() {
        let dir = tempdir().unwrap();
        let loader = LoaderOverride::new(|resource, fallback: Arc<dyn crate::loader::ResourceLoader>| async move {
            fallback.load(&resource).await
        });
        let config = RenderConfig::builder(dir.path())
            .html("<p>x</p>")
            .resource_loader(loader.clone())
            .engine_options(EngineOptions {
                resource_loader: Some(loader),
                ..EngineOptions::default()
            })
            .build();
        assert!(config.load_shell().is_err());
    }

    #[test]
    fn test_options_parse_and_merge() {
        let base: SsrOptions = serde_json::from_str(
            r#"{"root": "dist", "timeout": 2000, "cache": {"dir": "tmp/cache"}, "console": "app"}"#,
        )
        .unwrap();
        assert_eq!(base.root.as_deref(), Some(Path::new("dist")));
        assert_eq!(
            base.cache,
            Some(CacheSetting::Disk(DiskCacheSetting {
                dir: Some(PathBuf::from("tmp/cache")),
                invalidate_previous: false,
            }))
        );
        assert_eq!(base.console, Some(ConsoleSetting::Prefix("app".into())));

        let local: SsrOptions = serde_json::from_str(r#"{"cache": false, "console": false}"#).unwrap();
        let merged = base.merge(local);
        assert_eq!(merged.timeout, Some(2000));
        assert_eq!(merged.cache, Some(CacheSetting::Enabled(false)));
        assert_eq!(merged.console, Some(ConsoleSetting::Enabled(false)));

        let config = merged.into_builder().build();
        assert_eq!(config.timeout, Duration::from_millis(2000));
        assert_eq!(config.console_prefix, ConsolePrefix::Disabled);
    }

    #[test]
    fn test_unknown_option_is_an_error() {
        assert!(serde_json::from_str::<SsrOptions>(r#"{"port": 8000}"#).is_err());
    }
}
