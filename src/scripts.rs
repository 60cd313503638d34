//! Script-tag normalization.
//!
//! The emulated page runs body scripts eagerly, so `defer`/`async` are
//! stripped from the shell once at startup and recorded by `src`. After a
//! render the recorded attribute is put back on the matching live script,
//! so the served HTML still behaves as authored when a browser loads it.

use crate::dom::Document;
use std::collections::HashMap;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptAttr {
    Defer,
    Async,
}

impl ScriptAttr {
    pub fn as_str(self) -> &'static str {
        match self {
            ScriptAttr::Defer => "defer",
            ScriptAttr::Async => "async",
        }
    }
}

/// `src` -> stripped attribute, built once from the shell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptTagRecord {
    entries: HashMap<String, ScriptAttr>,
}

impl ScriptTagRecord {
    pub fn get(&self, src: &str) -> Option<ScriptAttr> {
        self.entries.get(src).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Re-keys the record by resolved `path?query` against the page URL,
    /// which is what a live script's `src` resolves to.
    pub fn resolved(&self, base: &Url) -> HashMap<String, ScriptAttr> {
        self.entries
            .iter()
            .filter_map(|(src, attr)| {
                let url = base.join(src).ok()?;
                Some((path_and_query(&url), *attr))
            })
            .collect()
    }
}

pub(crate) fn path_and_query(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

/// The shell as fed to the emulator, plus what was stripped from it.
#[derive(Debug, Clone)]
pub struct NormalizedShell {
    pub html: String,
    pub scripts: ScriptTagRecord,
}

/// Clears `defer`/`async` on every `<body>` script and records, per `src`,
/// which one to restore (`defer` wins when both are present). Scripts with
/// neither attribute are untouched.
pub fn normalize_shell(html: &str) -> NormalizedShell {
    let mut doc = Document::parse(html);
    let mut scripts = ScriptTagRecord::default();

    let body_scripts = match doc.body() {
        Some(body) => doc.elements_by_tag_name(body, "script"),
        None => Vec::new(),
    };
    for script in body_scripts {
        let attr = if doc.has_attribute(script, "defer") {
            ScriptAttr::Defer
        } else if doc.has_attribute(script, "async") {
            ScriptAttr::Async
        } else {
            continue;
        };
        if let Some(src) = doc.get_attribute(script, "src") {
            scripts.entries.insert(src.to_string(), attr);
        }
        doc.remove_attribute(script, "defer");
        doc.remove_attribute(script, "async");
    }

    tracing::debug!(scripts = ?scripts.entries, "normalized shell scripts");

    NormalizedShell {
        html: doc.serialize(),
        scripts,
    }
}
