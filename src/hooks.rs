//! User hooks and the normalizer that turns whatever they return into HTML.
//!
//! A hook may answer synchronously or asynchronously, with a string, with
//! a DOM handle (serialized here), or with nothing, in which case the HTML
//! it was given passes through unchanged.

use crate::engine::DomHandle;
use crate::error::{Result, SsrError};
use crate::request::RequestContext;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

/// What a hook hands back.
#[derive(Clone, Default)]
pub enum HookOutput {
    Html(String),
    Dom(Arc<dyn DomHandle>),
    #[default]
    Empty,
}

impl From<String> for HookOutput {
    fn from(html: String) -> Self {
        HookOutput::Html(html)
    }
}

impl From<&str> for HookOutput {
    fn from(html: &str) -> Self {
        HookOutput::Html(html.to_string())
    }
}

impl From<Option<String>> for HookOutput {
    fn from(html: Option<String>) -> Self {
        html.map(HookOutput::Html).unwrap_or_default()
    }
}

impl From<()> for HookOutput {
    fn from(_: ()) -> Self {
        HookOutput::Empty
    }
}

impl From<Arc<dyn DomHandle>> for HookOutput {
    fn from(dom: Arc<dyn DomHandle>) -> Self {
        HookOutput::Dom(dom)
    }
}

/// Arguments passed to every hook. `html` is `None` only when a cache
/// function is asked for a lookup.
#[derive(Clone)]
pub struct HookArgs {
    pub context: RequestContext,
    pub html: Option<String>,
    pub dom: Option<Arc<dyn DomHandle>>,
}

type HookFn = dyn Fn(HookArgs) -> BoxFuture<'static, anyhow::Result<HookOutput>> + Send + Sync;

#[derive(Clone)]
pub struct Hook(Arc<HookFn>);

impl std::fmt::Debug for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Hook(..)")
    }
}

impl Hook {
    /// A hook that answers immediately.
    pub fn sync<F, O>(f: F) -> Self
    where
        F: Fn(HookArgs) -> anyhow::Result<O> + Send + Sync + 'static,
        O: Into<HookOutput>,
    {
        Self(Arc::new(move |args| {
            let out = f(args).map(Into::into);
            Box::pin(std::future::ready(out))
        }))
    }

    /// A hook that answers with a future.
    pub fn from_async<F, Fut, O>(f: F) -> Self
    where
        F: Fn(HookArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
        O: Into<HookOutput>,
    {
        Self(Arc::new(move |args| {
            let fut = f(args);
            Box::pin(async move { fut.await.map(Into::into) })
        }))
    }

    pub async fn call(&self, args: HookArgs) -> anyhow::Result<HookOutput> {
        (self.0)(args).await
    }
}

/// Resolves a hook's output to HTML. `Empty` yields `None`; a DOM handle is
/// serialized, with failures labeled.
pub(crate) async fn output_to_html(label: &str, output: HookOutput) -> Result<Option<String>> {
    match output {
        HookOutput::Html(html) if html.is_empty() => Ok(None),
        HookOutput::Html(html) => Ok(Some(html)),
        HookOutput::Empty => Ok(None),
        HookOutput::Dom(dom) => match dom.serialize().await {
            Ok(html) => Ok(Some(html)),
            Err(e) => Err(SsrError::Serialization {
                label: label.to_string(),
                source: e.into(),
            }),
        },
    }
}

/// Runs `hook` over `html` and returns the HTML to carry forward.
///
/// No hook, or a hook that returns nothing, leaves `html` unchanged. A
/// hook error is re-raised labeled; it is never absorbed.
pub async fn normalize(
    hook: Option<&Hook>,
    label: &str,
    context: &RequestContext,
    html: String,
    dom: Option<&Arc<dyn DomHandle>>,
) -> Result<String> {
    let Some(hook) = hook else {
        return Ok(html);
    };
    let args = HookArgs {
        context: context.clone(),
        html: Some(html.clone()),
        dom: dom.cloned(),
    };
    let output = hook.call(args).await.map_err(|source| SsrError::UserHook {
        label: label.to_string(),
        source,
    })?;
    match output_to_html(label, output).await? {
        Some(out) => Ok(out),
        None => {
            tracing::debug!(hook = label, "hook returned nothing; keeping its input");
            Ok(html)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ScriptElement;
    use crate::dom::NodeId;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use url::Url;

    struct StaticDom {
        url: Url,
        html: Option<&'static str>,
    }

    #[async_trait]
    impl DomHandle for StaticDom {
        fn url(&self) -> &Url {
            &self.url
        }
        async fn scripts(&self) -> Result<Vec<ScriptElement>> {
            Ok(Vec::new())
        }
        async fn set_attribute(&self, _node: NodeId, _name: &str, _value: &str) -> Result<()> {
            Ok(())
        }
        async fn serialize(&self) -> Result<String> {
            self.html
                .map(str::to_string)
                .ok_or_else(|| SsrError::Emulation(anyhow!("document is gone")))
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::new("http", "localhost", "/")
    }

    fn dom(html: Option<&'static str>) -> Arc<dyn DomHandle> {
        Arc::new(StaticDom {
            url: Url::parse("http://localhost/").unwrap(),
            html,
        })
    }

    #[tokio::test]
    async fn test_no_hook_is_identity() {
        let out = normalize(None, "preCache", &ctx(), "<p>x</p>".into(), None).await.unwrap();
        assert_eq!(out, "<p>x</p>");
    }

    #[tokio::test]
    async fn test_sync_string_result() {
        let hook = Hook::sync(|args: HookArgs| Ok(args.html.unwrap_or_default().replace("x", "y")));
        let out = normalize(Some(&hook), "preCache", &ctx(), "<p>x</p>".into(), None).await.unwrap();
        assert_eq!(out, "<p>y</p>");
    }

    #[tokio::test]
    async fn test_async_empty_result_falls_back() {
        let hook = Hook::from_async(|_args: HookArgs| async { Ok(()) });
        let out = normalize(Some(&hook), "preCache", &ctx(), "<p>x</p>".into(), None).await.unwrap();
        assert_eq!(out, "<p>x</p>");
    }

    #[tokio::test]
    async fn test_dom_result_is_serialized() {
        let hook = Hook::sync(|_args: HookArgs| Ok(dom(Some("<html>from dom</html>"))));
        let out = normalize(Some(&hook), "preCache", &ctx(), "ignored".into(), None).await.unwrap();
        assert_eq!(out, "<html>from dom</html>");
    }

    #[tokio::test]
    async fn test_unserializable_dom_is_labeled() {
        let hook = Hook::sync(|_args: HookArgs| Ok(dom(None)));
        let err = normalize(Some(&hook), "preCache", &ctx(), "x".into(), None).await.unwrap_err();
        match err {
            SsrError::Serialization { label, .. } => assert_eq!(label, "preCache"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_hook_error_is_reraised_with_label() {
        let hook = Hook::from_async(|_args: HookArgs| async { Err::<String, _>(anyhow!("nope")) });
        let err = normalize(Some(&hook), "cache", &ctx(), "x".into(), None).await.unwrap_err();
        assert!(matches!(err, SsrError::UserHook { .. }));
        assert_eq!(err.to_string(), "cache() failed: nope");
    }

    #[tokio::test]
    async fn test_hook_sees_live_dom() {
        let hook = Hook::from_async(|args: HookArgs| async move {
            let dom = args.dom.ok_or_else(|| anyhow!("no dom"))?;
            Ok(dom.serialize().await?)
        });
        let live = dom(Some("<html>live</html>"));
        let out = normalize(Some(&hook), "preCache", &ctx(), "x".into(), Some(&live)).await.unwrap();
        assert_eq!(out, "<html>live</html>");
    }
}
