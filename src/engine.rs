//! The DOM emulation capability the pipeline drives.
//!
//! An engine turns the normalized shell into a live page at the request
//! URL, runs its scripts with resources fetched through the pipeline's
//! loader, and exposes the completion signal as a global function. The
//! handle it returns is what the pipeline restores, serializes and hands
//! to user hooks.

use crate::completion::CompletionToken;
use crate::console::VirtualConsole;
use crate::dom::NodeId;
use crate::error::Result;
use crate::loader::{ResourceKind, ResourceLoader};
use async_trait::async_trait;
use std::sync::Arc;
use url::Url;

/// Everything an engine needs to emulate one request.
#[derive(Clone)]
pub struct EmulationOptions {
    /// Full request URL; the page's `location` and the base for relative URLs.
    pub url: Url,
    pub resource_loader: Arc<dyn ResourceLoader>,
    pub console: VirtualConsole,
    /// Installed on the page's global object under `completion.name()`.
    pub completion: CompletionToken,
    pub run_scripts: bool,
    /// Which external resources the page may fetch.
    pub fetch_external: Vec<ResourceKind>,
}

impl EmulationOptions {
    pub fn fetches(&self, kind: ResourceKind) -> bool {
        self.fetch_external.contains(&kind)
    }
}

/// A `<script>` element of the live document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptElement {
    pub node: NodeId,
    /// The `src` attribute as written, if any.
    pub src: Option<String>,
}

#[async_trait]
pub trait DomEngine: Send + Sync {
    /// Starts an emulation of `html`. Scripts may still be loading or
    /// running when this returns; completion is reported through
    /// `options.completion`.
    ///
    /// The render timeout starts when this returns, so time spent inside
    /// `create` is not bounded by it. Return once the page exists and let
    /// scripts load afterwards, as [`DenoEngine`](crate::DenoEngine) does.
    async fn create(&self, html: &str, options: EmulationOptions) -> Result<Arc<dyn DomHandle>>;
}

/// A live emulated page.
#[async_trait]
pub trait DomHandle: Send + Sync {
    fn url(&self) -> &Url;

    async fn scripts(&self) -> Result<Vec<ScriptElement>>;

    async fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> Result<()>;

    /// Serializes the current document to HTML.
    async fn serialize(&self) -> Result<String>;
}
