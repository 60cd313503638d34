//! The minimal request surface the pipeline needs from the HTTP layer.

use crate::error::{Result, SsrError};
use url::Url;

pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Per-request context handed in by the host server.
///
/// `original_url` is the path plus query as received (the in-memory cache
/// key); `path` is the same without the query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub protocol: String,
    pub host: String,
    pub original_url: String,
    pub path: String,
    /// Outbound body, written by the render-output callback.
    pub body: Option<String>,
    pub content_type: Option<String>,
}

impl RequestContext {
    pub fn new(
        protocol: impl Into<String>,
        host: impl Into<String>,
        original_url: impl Into<String>,
    ) -> Self {
        let original_url = original_url.into();
        let path = original_url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string();
        Self {
            protocol: protocol.into(),
            host: host.into(),
            original_url,
            path,
            body: None,
            content_type: None,
        }
    }

    /// Builds a context from an absolute URL such as `http://localhost:8000/about?x=1`.
    pub fn from_url(url: &str) -> Result<Self> {
        let parsed = Url::parse(url)
            .map_err(|e| SsrError::Config(format!("invalid request URL '{}': {}", url, e)))?;
        let host = match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(SsrError::Config(format!("request URL '{}' has no host", url)));
            }
        };
        let mut original_url = parsed.path().to_string();
        if let Some(query) = parsed.query() {
            original_url.push('?');
            original_url.push_str(query);
        }
        Ok(Self::new(parsed.scheme(), host, original_url))
    }

    /// `protocol://host/originalUrl`, the URL the emulated page reports.
    pub fn full_url(&self) -> String {
        format!("{}://{}{}", self.protocol, self.host, self.original_url)
    }

    pub fn set_html(&mut self, html: impl Into<String>) {
        self.content_type = Some(HTML_CONTENT_TYPE.to_string());
        self.body = Some(html.into());
    }
}
