#![cfg(feature = "deno")]

mod common;

use common::{request, write};
use ssr_prerender::{ConsoleLevel, ConsolePrefix, DenoEngine, RenderConfig, Renderer};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const APP_SHELL: &str = concat!(
    "<!DOCTYPE html><html><head><title>App</title>",
    "<link rel=\"stylesheet\" href=\"/app.css\"></head>",
    "<body><div id=\"root\"></div>",
    "<script src=\"/app.js\" defer></script>",
    "</body></html>"
);

const APP_JS: &str = r#"
const root = document.getElementById("root");
const list = document.createElement("ul");
for (const name of ["one", "two"]) {
  const item = document.createElement("li");
  item.className = "item";
  item.textContent = name;
  list.appendChild(item);
}
root.appendChild(list);
document.title = "Rendered " + location.pathname;
setTimeout(() => {
  root.setAttribute("data-ready", "yes");
  window.onModulesLoaded();
}, 10);
"#;

fn app(root: &Path, js: &str) {
    write(root, "index.html", APP_SHELL);
    write(root, "app.css", "body { color: red }");
    write(root, "app.js", js);
}

fn renderer(root: &Path, timeout: Duration) -> Renderer {
    Renderer::new(
        RenderConfig::builder(root)
            .engine(Arc::new(DenoEngine::new()))
            .timeout(timeout)
            .build(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_renders_page_scripts() {
    let dir = tempfile::tempdir().unwrap();
    app(dir.path(), APP_JS);
    let renderer = renderer(dir.path(), Duration::from_secs(5));

    let mut ctx = request("/users?page=2");
    renderer.handle(&mut ctx).await.unwrap();
    let html = ctx.body.unwrap();

    assert!(
        html.contains(r#"<div id="root" data-ready="yes"><ul><li class="item">one</li><li class="item">two</li></ul></div>"#),
        "{}",
        html
    );
    assert!(html.contains("<title>Rendered /users</title>"), "{}", html);
    assert!(html.contains(r#"<script src="/app.js" defer></script>"#), "{}", html);
    assert_eq!(ctx.content_type.as_deref(), Some("text/html; charset=utf-8"));
}

#[tokio::test]
async fn test_page_that_never_signals_times_out() {
    let dir = tempfile::tempdir().unwrap();
    app(dir.path(), "document.body.appendChild(document.createElement('main'));");
    let renderer = renderer(dir.path(), Duration::from_millis(100));

    let err = renderer.handle(&mut request("/")).await.unwrap_err();
    assert!(err.is_timeout());
    let live = err.timed_out_handle().unwrap().serialize().await.unwrap();
    assert!(live.contains("<main></main>"));
}

#[tokio::test]
async fn test_inline_scripts_and_events() {
    let dir = tempfile::tempdir().unwrap();
    let shell = concat!(
        "<html><head></head><body><p id=\"out\"></p>",
        "<script>",
        "document.addEventListener('DOMContentLoaded', () => {",
        "  document.querySelector('#out').textContent = 'loaded ' + document.readyState;",
        "});",
        "window.addEventListener('load', () => window.onModulesLoaded());",
        "</script></body></html>"
    );
    write(dir.path(), "index.html", shell);
    let renderer = renderer(dir.path(), Duration::from_secs(5));

    let mut ctx = request("/");
    renderer.handle(&mut ctx).await.unwrap();
    assert!(ctx.body.unwrap().contains(r#"<p id="out">loaded interactive</p>"#));
}

#[tokio::test]
async fn test_script_errors_do_not_stop_the_page() {
    let dir = tempfile::tempdir().unwrap();
    let shell = concat!(
        "<html><body>",
        "<script src=\"/missing.js\"></script>",
        "<script>throw new Error('broken');</script>",
        "<script>console.log('still', 'running'); window.onModulesLoaded();</script>",
        "</body></html>"
    );
    write(dir.path(), "index.html", shell);
    let lines: Arc<Mutex<Vec<(ConsoleLevel, String)>>> = Arc::default();
    let sink = lines.clone();
    let renderer = Renderer::new(
        RenderConfig::builder(dir.path())
            .engine(Arc::new(DenoEngine::new()))
            .console(move |level: ConsoleLevel, line: &str| {
                sink.lock().unwrap().push((level, line.to_string()));
            })
            .console_prefix(ConsolePrefix::Custom("page".into()))
            .build(),
    )
    .unwrap();

    renderer.handle(&mut request("/")).await.unwrap();
    let lines = lines.lock().unwrap();
    let errors: Vec<&str> = lines
        .iter()
        .filter(|(level, _)| *level == ConsoleLevel::Error)
        .map(|(_, line)| line.as_str())
        .collect();
    assert_eq!(errors.len(), 2, "{:?}", lines);
    assert!(errors[0].starts_with("[page error] failed to load resource"));
    assert!(errors[1].contains("broken"));
    assert!(lines.contains(&(ConsoleLevel::Log, "[page] still running".to_string())));
}

#[tokio::test]
async fn test_each_request_gets_a_fresh_page() {
    let dir = tempfile::tempdir().unwrap();
    app(
        dir.path(),
        "window.count = (window.count || 0) + 1; document.body.setAttribute('data-count', String(window.count)); window.onModulesLoaded();",
    );
    let renderer = Renderer::new(
        RenderConfig::builder(dir.path())
            .engine(Arc::new(DenoEngine::new()))
            .no_cache()
            .build(),
    )
    .unwrap();

    for _ in 0..2 {
        let mut ctx = request("/");
        renderer.handle(&mut ctx).await.unwrap();
        assert!(ctx.body.unwrap().contains(r#"<body data-count="1">"#));
    }
}

#[tokio::test]
async fn test_non_ascii_text_from_page_scripts() {
    let dir = tempfile::tempdir().unwrap();
    app(
        dir.path(),
        r#"
const root = document.getElementById("root");
const heading = document.createElement("h1");
heading.textContent = "Über uns";
root.appendChild(heading);
const body = document.createElement("div");
body.innerHTML = "<p>日本語 &amp; <b>café</b></p>";
root.appendChild(body);
window.onModulesLoaded();
"#,
    );
    let renderer = renderer(dir.path(), Duration::from_secs(5));

    let mut ctx = request("/");
    renderer.handle(&mut ctx).await.unwrap();
    let html = ctx.body.unwrap();
    assert!(
        html.contains("<div id=\"root\"><h1>Über uns</h1><div><p>日本語 &amp; <b>café</b></p></div></div>"),
        "{}",
        html
    );
}
