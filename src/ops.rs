//! Ops behind the emulated page's `window`, `document` and `console`.
//!
//! Every DOM op works on the page's arena `Document`, addressed by raw node
//! ids. Ids coming from JS are checked against the arena; an unknown id
//! reads as empty and writes as a no-op.

use crate::completion::CompletionToken;
use crate::console::{ConsoleLevel, VirtualConsole};
use crate::dom::{Document, NodeId};
use deno_core::error::AnyError;
use deno_core::{op2, OpState};
use serde::Serialize;
use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;
use std::time::Duration;
use url::Url;

/// The live document of one emulation, shared between the ops and the
/// thread that answers the pipeline's commands.
#[derive(Clone, Default)]
pub struct PageDocument(pub Rc<RefCell<Document>>);

impl PageDocument {
    pub fn new(doc: Document) -> Self {
        Self(Rc::new(RefCell::new(doc)))
    }

    pub fn read(&self) -> Ref<'_, Document> {
        self.0.borrow()
    }

    pub fn write(&self) -> RefMut<'_, Document> {
        self.0.borrow_mut()
    }
}

fn page(state: &OpState) -> PageDocument {
    state.borrow::<PageDocument>().clone()
}

fn node(doc: &Document, raw: u32) -> Option<NodeId> {
    let id = NodeId::from_raw(raw);
    doc.contains(id).then_some(id)
}

// ============================================================================
// Console and completion
// ============================================================================

#[op2(fast)]
pub fn op_ssr_console(state: &mut OpState, #[string] level: &str, #[string] msg: &str) {
    if let Some(console) = state.try_borrow::<VirtualConsole>() {
        console.emit(ConsoleLevel::from_method(level), msg);
    }
}

#[op2(fast)]
pub fn op_ssr_signal(state: &mut OpState) -> bool {
    match state.try_borrow::<CompletionToken>() {
        Some(token) => token.signal(),
        None => false,
    }
}

#[op2(async)]
pub async fn op_ssr_sleep(millis: u32) {
    tokio::time::sleep(Duration::from_millis(millis as u64)).await;
}

/// `new URL(value, base).href`, or `value` unchanged when it cannot be
/// resolved.
#[op2]
#[string]
pub fn op_ssr_resolve_url(#[string] base: &str, #[string] value: &str) -> String {
    let joined = match Url::parse(base) {
        Ok(base) => base.join(value),
        Err(_) => Url::parse(value),
    };
    joined.map(String::from).unwrap_or_else(|_| value.to_string())
}

// ============================================================================
// Tree
// ============================================================================

#[op2(fast)]
pub fn op_dom_create_element(state: &mut OpState, #[string] tag: &str) -> u32 {
    page(state).write().create_element(tag).as_raw()
}

#[op2(fast)]
pub fn op_dom_create_text(state: &mut OpState, #[string] text: &str) -> u32 {
    page(state).write().create_text(text).as_raw()
}

#[op2(fast)]
pub fn op_dom_create_comment(state: &mut OpState, #[string] text: &str) -> u32 {
    page(state).write().create_comment(text).as_raw()
}

/// `before < 0` appends.
#[op2(fast)]
pub fn op_dom_insert(state: &mut OpState, parent: u32, child: u32, before: i32) -> bool {
    let page = page(state);
    let mut doc = page.write();
    let (Some(parent), Some(child)) = (node(&doc, parent), node(&doc, child)) else {
        return false;
    };
    let reference = match u32::try_from(before) {
        Ok(raw) => match node(&doc, raw) {
            Some(id) => Some(id),
            None => return false,
        },
        Err(_) => None,
    };
    doc.insert_before(parent, child, reference)
}

#[op2(fast)]
pub fn op_dom_remove(state: &mut OpState, parent: u32, child: u32) -> bool {
    let page = page(state);
    let mut doc = page.write();
    match (node(&doc, parent), node(&doc, child)) {
        (Some(parent), Some(child)) => doc.remove_child(parent, child),
        _ => false,
    }
}

#[op2]
pub fn op_dom_parent(state: &mut OpState, id: u32) -> Option<u32> {
    let page = page(state);
    let doc = page.read();
    node(&doc, id).and_then(|id| doc.parent(id)).map(NodeId::as_raw)
}

#[op2]
#[serde]
pub fn op_dom_children(state: &mut OpState, id: u32) -> Vec<u32> {
    let page = page(state);
    let doc = page.read();
    match node(&doc, id) {
        Some(id) => doc.children(id).iter().map(|c| c.as_raw()).collect(),
        None => Vec::new(),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    node_type: u8,
    node_name: String,
}

#[op2]
#[serde]
pub fn op_dom_node_info(state: &mut OpState, id: u32) -> Option<NodeInfo> {
    let page = page(state);
    let doc = page.read();
    let id = node(&doc, id)?;
    Some(NodeInfo {
        node_type: doc.node_type(id) as u8,
        node_name: doc.node_name(id),
    })
}

// ============================================================================
// Attributes and content
// ============================================================================

#[op2]
#[string]
pub fn op_dom_get_attr(state: &mut OpState, id: u32, #[string] name: &str) -> Option<String> {
    let page = page(state);
    let doc = page.read();
    node(&doc, id).and_then(|id| doc.get_attribute(id, name).map(str::to_string))
}

#[op2]
#[serde]
pub fn op_dom_attr_names(state: &mut OpState, id: u32) -> Vec<String> {
    let page = page(state);
    let doc = page.read();
    node(&doc, id).map(|id| doc.attribute_names(id)).unwrap_or_default()
}

#[op2(fast)]
pub fn op_dom_set_attr(state: &mut OpState, id: u32, #[string] name: &str, #[string] value: &str) {
    let page = page(state);
    let mut doc = page.write();
    if let Some(id) = node(&doc, id) {
        doc.set_attribute(id, name, value);
    }
}

#[op2(fast)]
pub fn op_dom_remove_attr(state: &mut OpState, id: u32, #[string] name: &str) {
    let page = page(state);
    let mut doc = page.write();
    if let Some(id) = node(&doc, id) {
        doc.remove_attribute(id, name);
    }
}

#[op2]
#[string]
pub fn op_dom_text(state: &mut OpState, id: u32) -> String {
    let page = page(state);
    let doc = page.read();
    node(&doc, id).map(|id| doc.text_content(id)).unwrap_or_default()
}

#[op2(fast)]
pub fn op_dom_set_text(state: &mut OpState, id: u32, #[string] text: &str) {
    let page = page(state);
    let mut doc = page.write();
    if let Some(id) = node(&doc, id) {
        doc.set_text_content(id, text);
    }
}

#[op2]
#[string]
pub fn op_dom_inner_html(state: &mut OpState, id: u32) -> String {
    let page = page(state);
    let doc = page.read();
    node(&doc, id).map(|id| doc.inner_html(id)).unwrap_or_default()
}

#[op2]
#[string]
pub fn op_dom_outer_html(state: &mut OpState, id: u32) -> String {
    let page = page(state);
    let doc = page.read();
    node(&doc, id).map(|id| doc.outer_html(id)).unwrap_or_default()
}

#[op2(fast)]
pub fn op_dom_set_inner_html(state: &mut OpState, id: u32, #[string] html: &str) {
    let page = page(state);
    let mut doc = page.write();
    if let Some(id) = node(&doc, id) {
        doc.set_inner_html(id, html);
    }
}

// ============================================================================
// Lookup
// ============================================================================

#[op2]
#[serde]
pub fn op_dom_query(
    state: &mut OpState,
    scope: u32,
    #[string] selector: &str,
    all: bool,
) -> Result<Vec<u32>, AnyError> {
    let page = page(state);
    let doc = page.read();
    let Some(scope) = node(&doc, scope) else {
        return Ok(Vec::new());
    };
    let found = if all {
        doc.query_selector_all(scope, selector)?
    } else {
        doc.query_selector(scope, selector)?.into_iter().collect()
    };
    Ok(found.into_iter().map(NodeId::as_raw).collect())
}

#[op2]
pub fn op_dom_element_by_id(state: &mut OpState, #[string] element_id: &str) -> Option<u32> {
    let page = page(state);
    let doc = page.read();
    doc.get_element_by_id(element_id).map(NodeId::as_raw)
}

deno_core::extension!(
    ssr_dom,
    ops = [
        op_ssr_console,
        op_ssr_signal,
        op_ssr_sleep,
        op_ssr_resolve_url,
        op_dom_create_element,
        op_dom_create_text,
        op_dom_create_comment,
        op_dom_insert,
        op_dom_remove,
        op_dom_parent,
        op_dom_children,
        op_dom_node_info,
        op_dom_get_attr,
        op_dom_attr_names,
        op_dom_set_attr,
        op_dom_remove_attr,
        op_dom_text,
        op_dom_set_text,
        op_dom_inner_html,
        op_dom_outer_html,
        op_dom_set_inner_html,
        op_dom_query,
        op_dom_element_by_id,
    ],
    esm_entry_point = "ext:ssr_dom/bootstrap.js",
    esm = ["ext:ssr_dom/bootstrap.js" = "src/bootstrap.js"],
);
