//! Disk-backed cache: one HTML file per derived key under a cache directory.
//!
//! Files written by this process are flagged in an in-memory index. An
//! unflagged file left by an earlier run is picked up on first lookup
//! unless `invalidate_previous` is set. A flagged file that can no longer
//! be read is unflagged and reported as a miss.

use crate::cache::CacheStrategy;
use crate::engine::DomHandle;
use crate::error::Result;
use crate::request::{RequestContext, HTML_CONTENT_TYPE};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const DEFAULT_CACHE_DIR: &str = ".ssr-cache";

type ParseUrlFn = dyn Fn(&str) -> String + Send + Sync;
type FilenameFn = dyn Fn(&str) -> PathBuf + Send + Sync;

#[derive(Clone)]
pub struct DiskCacheOptions {
    pub dir: PathBuf,
    /// Maps the request's original URL to the cache key. Defaults to the
    /// pathname.
    pub parse_url: Option<Arc<ParseUrlFn>>,
    /// Maps the key to a file. Defaults to `dir/<kebab-case key>.html`.
    pub filename: Option<Arc<FilenameFn>>,
    /// Ignore files that this process did not write.
    pub invalidate_previous: bool,
}

impl Default for DiskCacheOptions {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_CACHE_DIR),
            parse_url: None,
            filename: None,
            invalidate_previous: false,
        }
    }
}

impl std::fmt::Debug for DiskCacheOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskCacheOptions")
            .field("dir", &self.dir)
            .field("parse_url", &self.parse_url.is_some())
            .field("filename", &self.filename.is_some())
            .field("invalidate_previous", &self.invalidate_previous)
            .finish()
    }
}

impl DiskCacheOptions {
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }

    pub fn parse_url<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.parse_url = Some(Arc::new(f));
        self
    }

    pub fn filename<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> PathBuf + Send + Sync + 'static,
    {
        self.filename = Some(Arc::new(f));
        self
    }

    pub fn invalidate_previous(mut self, yes: bool) -> Self {
        self.invalidate_previous = yes;
        self
    }
}

#[derive(Debug)]
pub struct DiskCache {
    options: DiskCacheOptions,
    index: Mutex<HashSet<PathBuf>>,
}

impl DiskCache {
    pub fn new(options: DiskCacheOptions) -> Self {
        Self {
            options,
            index: Mutex::new(HashSet::new()),
        }
    }

    /// The file a request is cached in.
    pub fn path_for(&self, context: &RequestContext) -> PathBuf {
        let key = match &self.options.parse_url {
            Some(parse) => parse(&context.original_url),
            None => pathname(&context.original_url).to_string(),
        };
        match &self.options.filename {
            Some(filename) => filename(&key),
            None => self.options.dir.join(default_file_name(&key)),
        }
    }

    fn is_flagged(&self, path: &Path) -> bool {
        self.lock().contains(path)
    }

    fn flag(&self, path: PathBuf) {
        self.lock().insert(path);
    }

    fn unflag(&self, path: &Path) {
        self.lock().remove(path);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<PathBuf>> {
        self.index.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl CacheStrategy for DiskCache {
    async fn lookup(&self, context: &mut RequestContext) -> Result<Option<String>> {
        let path = self.path_for(context);
        if self.is_flagged(&path) {
            match tokio::fs::read_to_string(&path).await {
                Ok(html) => {
                    tracing::debug!(path = %path.display(), "disk cache hit");
                    context.content_type = Some(HTML_CONTENT_TYPE.to_string());
                    return Ok(Some(html));
                }
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "disk cache entry invalidated");
                    self.unflag(&path);
                    return Ok(None);
                }
            }
        }
        if self.options.invalidate_previous {
            return Ok(None);
        }
        match tokio::fs::read_to_string(&path).await {
            Ok(html) => {
                tracing::debug!(path = %path.display(), "pre-existing disk cache entry");
                self.flag(path);
                context.content_type = Some(HTML_CONTENT_TYPE.to_string());
                Ok(Some(html))
            }
            Err(_) => Ok(None),
        }
    }

    async fn store(
        &self,
        context: &mut RequestContext,
        html: String,
        _dom: &Arc<dyn DomHandle>,
    ) -> Result<String> {
        let path = self.path_for(context);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &html).await?;
        tracing::debug!(path = %path.display(), bytes = html.len(), "cached render to disk");
        self.flag(path);
        Ok(html)
    }
}

fn pathname(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or_default()
}

fn default_file_name(key: &str) -> String {
    let name = kebab_case(key);
    if name.is_empty() {
        "index.html".to_string()
    } else {
        format!("{}.html", name)
    }
}

/// Lowercase words joined by `-`. Words break on anything that is not
/// alphanumeric, on lower-to-upper humps, before the last capital of an
/// acronym followed by lowercase, and between letters and digits.
pub fn kebab_case(input: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    for segment in input.split(|c: char| !c.is_alphanumeric()) {
        let chars: Vec<char> = segment.chars().collect();
        let mut word = String::new();
        for (i, &c) in chars.iter().enumerate() {
            if let Some(&prev) = i.checked_sub(1).and_then(|j| chars.get(j)) {
                let next = chars.get(i + 1).copied();
                let hump = prev.is_lowercase() && c.is_uppercase();
                let acronym_end = prev.is_uppercase()
                    && c.is_uppercase()
                    && next.is_some_and(char::is_lowercase);
                let digit_edge = prev.is_ascii_digit() != c.is_ascii_digit();
                if hump || acronym_end || digit_edge {
                    words.push(std::mem::take(&mut word));
                }
            }
            word.extend(c.to_lowercase());
        }
        if !word.is_empty() {
            words.push(word);
        }
    }
    words.join("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ScriptElement;
    use crate::dom::NodeId;
    use tempfile::tempdir;
    use url::Url;

    struct NoDom(Url);

    #[async_trait]
    impl DomHandle for NoDom {
        fn url(&self) -> &Url {
            &self.0
        }
        async fn scripts(&self) -> Result<Vec<ScriptElement>> {
            Ok(Vec::new())
        }
        async fn set_attribute(&self, _node: NodeId, _name: &str, _value: &str) -> Result<()> {
            Ok(())
        }
        async fn serialize(&self) -> Result<String> {
            Ok(String::new())
        }
    }

    fn no_dom() -> Arc<dyn DomHandle> {
        Arc::new(NoDom(Url::parse("http://localhost/").unwrap()))
    }

    #[test]
    fn test_kebab_case() {
        assert_eq!(kebab_case("/"), "");
        assert_eq!(kebab_case("/about/team"), "about-team");
        assert_eq!(kebab_case("/users/42/posts"), "users-42-posts");
        assert_eq!(kebab_case("/fooBar_baz"), "foo-bar-baz");
        assert_eq!(kebab_case("/XMLHttpRequest"), "xml-http-request");
        assert_eq!(kebab_case("/v2api"), "v-2-api");
    }

    #[test]
    fn test_default_path_uses_pathname() {
        let cache = DiskCache::new(DiskCacheOptions::in_dir("cache"));
        let root = RequestContext::new("http", "localhost", "/?x=1");
        let page = RequestContext::new("http", "localhost", "/blog/firstPost?ref=home");
        assert_eq!(cache.path_for(&root), PathBuf::from("cache/index.html"));
        assert_eq!(cache.path_for(&page), PathBuf::from("cache/blog-first-post.html"));
    }

    #[tokio::test]
    async fn test_store_then_hit() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::new(DiskCacheOptions::in_dir(dir.path().join("nested/cache")));
        let mut ctx = RequestContext::new("http", "localhost", "/about");

        assert_eq!(cache.lookup(&mut ctx).await.unwrap(), None);
        let out = cache.store(&mut ctx, "<p>about</p>".into(), &no_dom()).await.unwrap();
        assert_eq!(out, "<p>about</p>");

        let mut again = RequestContext::new("http", "localhost", "/about");
        assert_eq!(cache.lookup(&mut again).await.unwrap().as_deref(), Some("<p>about</p>"));
        assert_eq!(again.content_type.as_deref(), Some(HTML_CONTENT_TYPE));
    }

    #[tokio::test]
    async fn test_deleted_file_is_a_miss() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::new(DiskCacheOptions::in_dir(dir.path()).invalidate_previous(true));
        let mut ctx = RequestContext::new("http", "localhost", "/gone");
        cache.store(&mut ctx, "<p>x</p>".into(), &no_dom()).await.unwrap();

        std::fs::remove_file(cache.path_for(&ctx)).unwrap();
        assert_eq!(cache.lookup(&mut ctx).await.unwrap(), None);
        assert!(!cache.is_flagged(&cache.path_for(&ctx)));
    }

    #[tokio::test]
    async fn test_previous_files_respect_invalidate_flag() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("old.html"), "<p>old</p>").unwrap();
        let mut ctx = RequestContext::new("http", "localhost", "/old");

        let keep = DiskCache::new(DiskCacheOptions::in_dir(dir.path()));
        assert_eq!(keep.lookup(&mut ctx).await.unwrap().as_deref(), Some("<p>old</p>"));

        let fresh = DiskCache::new(DiskCacheOptions::in_dir(dir.path()).invalidate_previous(true));
        assert_eq!(fresh.lookup(&mut ctx).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_custom_key_and_filename() {
        let dir = tempdir().unwrap();
        let target = dir.path().to_path_buf();
        let cache = DiskCache::new(
            DiskCacheOptions::default()
                .parse_url(|url| url.replace('?', "/"))
                .filename(move |key| target.join(format!("{}.htm", kebab_case(key)))),
        );
        let mut ctx = RequestContext::new("http", "localhost", "/search?q=rust");
        cache.store(&mut ctx, "hit".into(), &no_dom()).await.unwrap();
        assert!(dir.path().join("search-q-rust.htm").exists());
    }
}
