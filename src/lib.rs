//! # SSR Prerender
//!
//! Server-side prerendering for single-page apps: a static HTML shell is
//! loaded into an emulated DOM, its scripts run until the page calls
//! `window.onModulesLoaded()`, and the resulting document is serialized,
//! cached per URL and handed back to the host server.
//!
//! ## Pipeline
//!
//! - **Cache**: in-memory by default, or disabled, disk-backed, or owned
//!   by a user function. A hit skips emulation entirely.
//! - **Emulation**: a fresh page per request at the request's full URL.
//!   Resources are read from the root directory only.
//! - **Completion**: the page's signal races the timeout; whichever comes
//!   first decides the request.
//! - **Output**: `defer`/`async` restored on body scripts, optional
//!   pre-cache hook, cache write, render-output callback.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ssr_prerender::{RenderConfig, Renderer, RequestContext};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> ssr_prerender::Result<()> {
//!     let renderer = Renderer::new(
//!         RenderConfig::builder("./build")
//!             .timeout(Duration::from_secs(3))
//!             .build(),
//!     )?;
//!
//!     let mut ctx = RequestContext::new("http", "localhost:8000", "/about");
//!     renderer.handle(&mut ctx).await?;
//!     println!("{}", ctx.body.unwrap_or_default());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod completion;
pub mod config;
pub mod console;
pub mod disk_cache;
pub mod dom;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod loader;
pub mod render;
pub mod request;
pub mod scripts;

#[cfg(feature = "deno")]
mod ops;
#[cfg(feature = "deno")]
mod runtime;

pub use cache::{CacheStrategy, FnCache, MemoryCache, NoCache};
pub use completion::{CompletionToken, COMPLETION_SIGNAL};
pub use config::{EngineOptions, RenderConfig, RenderConfigBuilder, RenderOutput, RenderedPage, SsrOptions};
pub use console::{ConsoleLevel, ConsolePrefix, ConsoleSink, VirtualConsole};
pub use disk_cache::{DiskCache, DiskCacheOptions};
pub use engine::{DomEngine, DomHandle, EmulationOptions, ScriptElement};
pub use error::{Result, SsrError};
pub use hooks::{Hook, HookArgs, HookOutput};
pub use loader::{FsResourceLoader, LoaderOverride, Resource, ResourceKind, ResourceLoader};
pub use render::Renderer;
pub use request::RequestContext;
#[cfg(feature = "deno")]
pub use runtime::{DenoEngine, DenoHandle};
