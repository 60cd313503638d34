//! Shared test helpers: a scripted in-process DOM engine and fixtures.

#![allow(dead_code)]

use async_trait::async_trait;
use ssr_prerender::dom::{Document, NodeId};
use ssr_prerender::{
    DomEngine, DomHandle, EmulationOptions, Resource, ResourceKind, Result, ScriptElement,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

pub const SHELL: &str = concat!(
    "<!DOCTYPE html><html><head><title>App</title></head>",
    "<body><div id=\"root\"></div>",
    "<script src=\"/vendor.js\"></script>",
    "<script src=\"a.js\" defer></script>",
    "<script src=\"/lazy.js\" async></script>",
    "</body></html>"
);

/// How the fake page reports completion.
#[derive(Debug, Clone, Copy)]
pub enum Signal {
    After(Duration),
    Twice(Duration),
    Never,
}

/// Engine double: parses the shell into an arena document, fetches every
/// script through the pipeline's loader, writes the request path into
/// `#root`, then signals per `Signal`.
pub struct ScriptedEngine {
    signal: Signal,
    create_delay: Duration,
    created: AtomicUsize,
}

impl ScriptedEngine {
    pub fn new(signal: Signal) -> Arc<Self> {
        Self::with_create_delay(signal, Duration::ZERO)
    }

    /// `create` itself takes `delay` before the page exists.
    pub fn with_create_delay(signal: Signal, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            signal,
            create_delay: delay,
            created: AtomicUsize::new(0),
        })
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DomEngine for ScriptedEngine {
    async fn create(&self, html: &str, options: EmulationOptions) -> Result<Arc<dyn DomHandle>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.create_delay).await;
        let doc = Document::parse(html);

        let srcs: Vec<String> = doc
            .elements_by_tag_name(doc.root(), "script")
            .into_iter()
            .filter_map(|s| doc.get_attribute(s, "src").map(str::to_string))
            .collect();
        for src in srcs {
            if let Ok(url) = options.url.join(&src) {
                if let Err(e) = options.resource_loader.load(&Resource::new(url, ResourceKind::Script)).await {
                    options.console.error(&e.to_string());
                }
            }
        }

        let handle = Arc::new(FakePage {
            url: options.url.clone(),
            doc: Mutex::new(doc),
        });
        let page = handle.clone();
        let completion = options.completion.clone();
        let signal = self.signal;
        tokio::spawn(async move {
            let delay = match signal {
                Signal::Never => return,
                Signal::After(d) | Signal::Twice(d) => d,
            };
            tokio::time::sleep(delay).await;
            page.render_path();
            completion.signal();
            if let Signal::Twice(_) = signal {
                completion.signal();
            }
        });
        Ok(handle)
    }
}

pub struct FakePage {
    url: Url,
    doc: Mutex<Document>,
}

impl FakePage {
    fn render_path(&self) {
        let mut doc = self.doc.lock().unwrap();
        if let Some(root) = doc.get_element_by_id("root") {
            let html = format!("<p>rendered {}</p>", self.url.path());
            doc.set_inner_html(root, &html);
        }
    }
}

#[async_trait]
impl DomHandle for FakePage {
    fn url(&self) -> &Url {
        &self.url
    }

    async fn scripts(&self) -> Result<Vec<ScriptElement>> {
        let doc = self.doc.lock().unwrap();
        Ok(doc
            .elements_by_tag_name(doc.root(), "script")
            .into_iter()
            .map(|node| ScriptElement {
                node,
                src: doc.get_attribute(node, "src").map(str::to_string),
            })
            .collect())
    }

    async fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> Result<()> {
        self.doc.lock().unwrap().set_attribute(node, name, value);
        Ok(())
    }

    async fn serialize(&self) -> Result<String> {
        Ok(self.doc.lock().unwrap().serialize())
    }
}

/// A root directory with the shell and its scripts.
pub fn site(shell: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "index.html", shell);
    write(dir.path(), "vendor.js", "window.vendor = true;");
    write(dir.path(), "a.js", "window.a = true;");
    write(dir.path(), "lazy.js", "window.lazy = true;");
    dir
}

pub fn write(root: &Path, name: &str, contents: &str) {
    let path = root.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}

pub fn request(path: &str) -> ssr_prerender::RequestContext {
    ssr_prerender::RequestContext::new("http", "localhost:8000", path)
}
