//! Built-in DOM emulation engine on top of deno_core.
//!
//! Each emulation gets its own OS thread running a current-thread tokio
//! runtime, since a `JsRuntime` is neither `Send` nor `Sync`. The thread
//! owns the isolate and the page's arena document; the pipeline talks to it
//! through a command channel. Dropping every handle closes the channel and
//! ends the thread, even if the page still has timers pending.

use crate::console::VirtualConsole;
use crate::dom::{Document, NodeId};
use crate::engine::{DomEngine, DomHandle, EmulationOptions, ScriptElement};
use crate::error::{Result, SsrError};
use crate::loader::{Resource, ResourceKind};
use crate::ops::{ssr_dom, PageDocument};
use anyhow::anyhow;
use async_trait::async_trait;
use deno_core::{JsRuntime, PollEventLoopOptions, RuntimeOptions};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use url::Url;

const LOG_TARGET: &str = "ssr_prerender::emulator";

/// `DomEngine` that runs page scripts in V8.
#[derive(Debug, Default)]
pub struct DenoEngine {
    created: AtomicUsize,
}

impl DenoEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of emulations started so far.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DomEngine for DenoEngine {
    async fn create(&self, html: &str, options: EmulationOptions) -> Result<Arc<dyn DomHandle>> {
        let n = self.created.fetch_add(1, Ordering::Relaxed) + 1;
        let url = options.url.clone();
        let html = html.to_string();
        let (commands, receiver) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        std::thread::Builder::new()
            .name(format!("ssr-emulator-{}", n))
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                    Ok(rt) => rt,
                    Err(e) => {
                        let _ = ready_tx.send(Err(anyhow!("failed to start emulator runtime: {}", e)));
                        return;
                    }
                };
                rt.block_on(run_page(html, options, receiver, ready_tx));
            })?;

        ready_rx
            .await
            .map_err(|_| SsrError::Emulation(anyhow!("emulator thread exited during startup")))?
            .map_err(SsrError::Emulation)?;

        Ok(Arc::new(DenoHandle { url, commands }))
    }
}

enum Command {
    Scripts(oneshot::Sender<Vec<ScriptElement>>),
    SetAttribute {
        node: NodeId,
        name: String,
        value: String,
        reply: oneshot::Sender<bool>,
    },
    Serialize(oneshot::Sender<String>),
}

/// Handle to an emulation thread.
pub struct DenoHandle {
    url: Url,
    commands: mpsc::UnboundedSender<Command>,
}

impl DenoHandle {
    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, answer) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| SsrError::Emulation(anyhow!("emulated page for {} is gone", self.url)))?;
        answer
            .await
            .map_err(|_| SsrError::Emulation(anyhow!("emulated page for {} is gone", self.url)))
    }
}

#[async_trait]
impl DomHandle for DenoHandle {
    fn url(&self) -> &Url {
        &self.url
    }

    async fn scripts(&self) -> Result<Vec<ScriptElement>> {
        self.request(Command::Scripts).await
    }

    async fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> Result<()> {
        let found = self
            .request(|reply| Command::SetAttribute {
                node,
                name: name.to_string(),
                value: value.to_string(),
                reply,
            })
            .await?;
        if !found {
            return Err(SsrError::Emulation(anyhow!("no such node: {:?}", node)));
        }
        Ok(())
    }

    async fn serialize(&self) -> Result<String> {
        self.request(Command::Serialize).await
    }
}

/// `window.location` as handed to the bootstrap.
#[derive(Serialize)]
struct Location {
    href: String,
    origin: String,
    protocol: String,
    host: String,
    hostname: String,
    port: String,
    pathname: String,
    search: String,
    hash: String,
}

impl Location {
    fn new(url: &Url) -> Self {
        let hostname = url.host_str().unwrap_or_default().to_string();
        let port = url.port().map(|p| p.to_string()).unwrap_or_default();
        let host = if port.is_empty() {
            hostname.clone()
        } else {
            format!("{}:{}", hostname, port)
        };
        Self {
            href: url.to_string(),
            origin: url.origin().ascii_serialization(),
            protocol: format!("{}:", url.scheme()),
            host,
            hostname,
            port,
            pathname: url.path().to_string(),
            search: url.query().map(|q| format!("?{}", q)).unwrap_or_default(),
            hash: url.fragment().map(|f| format!("#{}", f)).unwrap_or_default(),
        }
    }
}

fn create_runtime(page: &PageDocument, options: &EmulationOptions) -> anyhow::Result<JsRuntime> {
    let mut runtime = JsRuntime::new(RuntimeOptions {
        extensions: vec![ssr_dom::init_ops_and_esm()],
        ..Default::default()
    });

    {
        let state = runtime.op_state();
        let mut state = state.borrow_mut();
        state.put(page.clone());
        state.put(options.console.clone());
        state.put(options.completion.clone());
    }

    let boot = format!(
        "globalThis.__ssr_boot__({}, {})",
        serde_json::to_string(&Location::new(&options.url))?,
        serde_json::to_string(options.completion.name())?
    );
    runtime.execute_script("<ssr-boot>", boot)?;
    Ok(runtime)
}

async fn run_page(
    html: String,
    options: EmulationOptions,
    mut commands: mpsc::UnboundedReceiver<Command>,
    ready: oneshot::Sender<anyhow::Result<()>>,
) {
    let page = PageDocument::new(Document::parse(&html));
    let mut runtime = match create_runtime(&page, &options) {
        Ok(runtime) => runtime,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    tracing::debug!(target: LOG_TARGET, url = %options.url, "emulated page created");
    if ready.send(Ok(())).is_err() {
        return;
    }

    if options.fetches(ResourceKind::Stylesheet) {
        load_stylesheets(&page, &options).await;
    }
    if options.run_scripts {
        run_scripts(&mut runtime, &page, &options).await;
    }
    if let Err(e) = runtime.execute_script("<ssr-loaded>", "globalThis.__ssr_loaded__()".to_string()) {
        report(&options.console, "load event", &e);
    }

    let mut idle = false;
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => answer(&page, command),
                None => break,
            },
            result = runtime.run_event_loop(PollEventLoopOptions::default()), if !idle => {
                if let Err(e) = result {
                    report(&options.console, "event loop", &e);
                }
                idle = true;
            }
        }
    }
    tracing::debug!(target: LOG_TARGET, url = %options.url, "emulated page closed");
}

fn answer(page: &PageDocument, command: Command) {
    match command {
        Command::Scripts(reply) => {
            let doc = page.read();
            let scripts = doc
                .elements_by_tag_name(doc.root(), "script")
                .into_iter()
                .map(|node| ScriptElement {
                    node,
                    src: doc.get_attribute(node, "src").map(str::to_string),
                })
                .collect();
            let _ = reply.send(scripts);
        }
        Command::SetAttribute {
            node,
            name,
            value,
            reply,
        } => {
            let mut doc = page.write();
            let found = doc.contains(node) && doc.element(node).is_some();
            if found {
                doc.set_attribute(node, &name, &value);
            }
            let _ = reply.send(found);
        }
        Command::Serialize(reply) => {
            let _ = reply.send(page.read().serialize());
        }
    }
}

/// Page scripts in document order, as `(src, inline source)`. Scripts with
/// a non-JavaScript `type` are skipped.
fn page_scripts(doc: &Document) -> Vec<(Option<String>, String)> {
    doc.elements_by_tag_name(doc.root(), "script")
        .into_iter()
        .filter(|node| match doc.get_attribute(*node, "type") {
            None => true,
            Some(t) => {
                let t = t.trim().to_ascii_lowercase();
                t.is_empty() || t == "text/javascript" || t == "application/javascript"
            }
        })
        .map(|node| {
            let src = doc.get_attribute(node, "src").map(str::to_string);
            (src, doc.text_content(node))
        })
        .collect()
}

async fn run_scripts(runtime: &mut JsRuntime, page: &PageDocument, options: &EmulationOptions) {
    let scripts = page_scripts(&page.read());
    for (src, inline) in scripts {
        let code = match src {
            Some(src) if !options.fetches(ResourceKind::Script) => {
                tracing::debug!(target: LOG_TARGET, src = %src, "external script skipped");
                continue;
            }
            Some(src) => match fetch(options, &src, ResourceKind::Script).await {
                Some(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                None => continue,
            },
            None => inline,
        };
        if let Err(e) = runtime.execute_script("<ssr-page-script>", code) {
            report(&options.console, "page script", &e);
        }
    }
}

async fn load_stylesheets(page: &PageDocument, options: &EmulationOptions) {
    let hrefs: Vec<String> = {
        let doc = page.read();
        doc.elements_by_tag_name(doc.root(), "link")
            .into_iter()
            .filter(|node| {
                doc.get_attribute(*node, "rel")
                    .is_some_and(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("stylesheet")))
            })
            .filter_map(|node| doc.get_attribute(node, "href").map(str::to_string))
            .collect()
    };
    for href in hrefs {
        fetch(options, &href, ResourceKind::Stylesheet).await;
    }
}

/// Loads a page resource. Failures go to the page's console and do not
/// stop the page.
async fn fetch(options: &EmulationOptions, reference: &str, kind: ResourceKind) -> Option<Arc<[u8]>> {
    let url = match options.url.join(reference) {
        Ok(url) => url,
        Err(e) => {
            options
                .console
                .error(&format!("Could not resolve resource '{}': {}", reference, e));
            return None;
        }
    };
    match options.resource_loader.load(&Resource::new(url, kind)).await {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            tracing::warn!(target: LOG_TARGET, error = %e, "resource load failed");
            options.console.error(&e.to_string());
            None
        }
    }
}

fn report(console: &VirtualConsole, context: &str, error: &anyhow::Error) {
    tracing::warn!(target: LOG_TARGET, context, error = %error, "uncaught error in emulated page");
    console.error(&format!("Uncaught ({}): {}", context, error));
}
