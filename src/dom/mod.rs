//! Arena-based DOM used both to edit the HTML shell at startup and as the
//! live document behind the built-in emulation engine.
//!
//! All nodes live in one `Vec`, referenced by copyable `NodeId` handles.
//! Detached nodes stay in the arena until the document is dropped; an
//! emulated page lives for a single request, so nothing is reclaimed.

mod parse;
mod selector;
mod serialize;

pub use selector::{SelectorError, SelectorList};

/// A copyable handle into the `Document` arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Handle for an id that crossed the JS boundary. Validate with
    /// [`Document::contains`] before use.
    pub fn from_raw(raw: u32) -> Self {
        NodeId(raw as usize)
    }

    pub fn as_raw(self) -> u32 {
        self.0 as u32
    }
}

/// W3C node type numbers, as exposed to page scripts.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum NodeType {
    Element = 1,
    Text = 3,
    Comment = 8,
    Document = 9,
    Doctype = 10,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Document,
    Doctype(String),
    Element(ElementData),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
pub struct ElementData {
    /// Lowercase tag name.
    pub tag: String,
    /// Attributes in source order. Names are lowercase.
    pub attributes: Vec<(String, String)>,
}

impl ElementData {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attributes: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl NodeData {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
        }
    }
}

pub(crate) fn is_void_element(tag: &str) -> bool {
    matches!(
        tag,
        "area"
            | "base"
            | "br"
            | "col"
            | "embed"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "param"
            | "source"
            | "track"
            | "wbr"
    )
}

/// Elements whose text content is neither entity-decoded nor escaped.
pub(crate) fn is_raw_text_element(tag: &str) -> bool {
    matches!(tag, "script" | "style" | "noscript" | "xmp" | "iframe" | "noembed" | "noframes")
}

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<NodeData>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// An empty document containing only the root node.
    pub fn new() -> Self {
        Self {
            nodes: vec![NodeData::new(NodeKind::Document)],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.0 < self.nodes.len()
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData::new(kind));
        id
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.alloc(NodeKind::Element(ElementData::new(tag)))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.alloc(NodeKind::Text(text.to_string()))
    }

    pub fn create_comment(&mut self, text: &str) -> NodeId {
        self.alloc(NodeKind::Comment(text.to_string()))
    }

    pub(crate) fn create_doctype(&mut self, name: &str) -> NodeId {
        self.alloc(NodeKind::Doctype(name.to_string()))
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        match &self.nodes[id.0].kind {
            NodeKind::Element(el) => Some(el),
            _ => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        match &mut self.nodes[id.0].kind {
            NodeKind::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|el| el.tag.as_str())
    }

    pub fn node_type(&self, id: NodeId) -> NodeType {
        match &self.nodes[id.0].kind {
            NodeKind::Document => NodeType::Document,
            NodeKind::Doctype(_) => NodeType::Doctype,
            NodeKind::Element(_) => NodeType::Element,
            NodeKind::Text(_) => NodeType::Text,
            NodeKind::Comment(_) => NodeType::Comment,
        }
    }

    /// `nodeName` as a browser reports it (uppercase tag names).
    pub fn node_name(&self, id: NodeId) -> String {
        match &self.nodes[id.0].kind {
            NodeKind::Document => "#document".to_string(),
            NodeKind::Doctype(name) => name.clone(),
            NodeKind::Element(el) => el.tag.to_ascii_uppercase(),
            NodeKind::Text(_) => "#text".to_string(),
            NodeKind::Comment(_) => "#comment".to_string(),
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn element_children(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|c| self.element(*c).is_some())
            .collect()
    }

    fn child_element_by_tag(&self, parent: NodeId, tag: &str) -> Option<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|c| self.tag_name(*c) == Some(tag))
    }

    /// The `<html>` element.
    pub fn document_element(&self) -> Option<NodeId> {
        self.child_element_by_tag(self.root(), "html")
    }

    pub fn head(&self) -> Option<NodeId> {
        self.child_element_by_tag(self.document_element()?, "head")
    }

    pub fn body(&self) -> Option<NodeId> {
        self.child_element_by_tag(self.document_element()?, "body")
    }

    /// True if `ancestor` is `node` or one of its ancestors.
    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes[id.0].parent;
        }
        false
    }

    /// Removes `id` from its parent, if any.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|c| *c != id);
        }
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        self.insert_before(parent, child, None)
    }

    /// Inserts `child` under `parent` before `reference` (or at the end).
    /// Returns false if the insertion would create a cycle or `reference`
    /// is not a child of `parent`.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) -> bool {
        if self.is_inclusive_ancestor(child, parent) || child == self.root() {
            return false;
        }
        if let Some(reference) = reference {
            if self.nodes[reference.0].parent != Some(parent) || reference == child {
                return false;
            }
        }
        self.detach(child);
        let index = match reference {
            Some(reference) => self.nodes[parent.0]
                .children
                .iter()
                .position(|c| *c == reference)
                .unwrap_or(self.nodes[parent.0].children.len()),
            None => self.nodes[parent.0].children.len(),
        };
        self.nodes[parent.0].children.insert(index, child);
        self.nodes[child.0].parent = Some(parent);
        true
    }

    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        if self.nodes[child.0].parent != Some(parent) {
            return false;
        }
        self.detach(child);
        true
    }

    fn clear_children(&mut self, id: NodeId) {
        let children = std::mem::take(&mut self.nodes[id.0].children);
        for child in children {
            self.nodes[child.0].parent = None;
        }
    }

    pub fn get_attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?.attr(name)
    }

    pub fn has_attribute(&self, id: NodeId, name: &str) -> bool {
        self.get_attribute(id, name).is_some()
    }

    /// Sets an attribute, keeping its position if it already exists.
    /// No-op on non-element nodes.
    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) {
        let Some(el) = self.element_mut(id) else {
            return;
        };
        let name = name.to_ascii_lowercase();
        match el.attributes.iter_mut().find(|(n, _)| *n == name) {
            Some((_, v)) => *v = value.to_string(),
            None => el.attributes.push((name, value.to_string())),
        }
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) {
        if let Some(el) = self.element_mut(id) {
            el.attributes.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        }
    }

    pub fn attribute_names(&self, id: NodeId) -> Vec<String> {
        self.element(id)
            .map(|el| el.attributes.iter().map(|(n, _)| n.clone()).collect())
            .unwrap_or_default()
    }

    /// Preorder list of all descendants of `id`, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node).iter().rev().copied());
        }
        out
    }

    pub fn get_element_by_id(&self, element_id: &str) -> Option<NodeId> {
        self.descendants(self.root())
            .into_iter()
            .find(|n| self.get_attribute(*n, "id") == Some(element_id))
    }

    pub fn elements_by_tag_name(&self, scope: NodeId, tag: &str) -> Vec<NodeId> {
        let tag = tag.to_ascii_lowercase();
        self.descendants(scope)
            .into_iter()
            .filter(|n| match self.tag_name(*n) {
                Some(t) => tag == "*" || t == tag,
                None => false,
            })
            .collect()
    }

    /// `textContent`: concatenated text of all descendants, or the data of a
    /// text/comment node.
    pub fn text_content(&self, id: NodeId) -> String {
        match &self.nodes[id.0].kind {
            NodeKind::Text(t) | NodeKind::Comment(t) => t.clone(),
            NodeKind::Doctype(_) => String::new(),
            NodeKind::Document | NodeKind::Element(_) => {
                let mut out = String::new();
                for node in self.descendants(id) {
                    if let NodeKind::Text(t) = &self.nodes[node.0].kind {
                        out.push_str(t);
                    }
                }
                out
            }
        }
    }

    pub fn set_text_content(&mut self, id: NodeId, text: &str) {
        if let NodeKind::Text(t) | NodeKind::Comment(t) = &mut self.nodes[id.0].kind {
            *t = text.to_string();
            return;
        }
        if self.element(id).is_none() {
            return;
        }
        self.clear_children(id);
        if !text.is_empty() {
            let node = self.create_text(text);
            self.append_child(id, node);
        }
    }

    /// Replaces the children of `id` with the parsed `html` fragment.
    pub fn set_inner_html(&mut self, id: NodeId, html: &str) {
        if self.element(id).is_none() {
            return;
        }
        self.clear_children(id);
        self.parse_fragment_into(id, html);
    }

    /// Evaluates a CSS selector against the descendants of `scope`.
    pub fn query_selector_all(&self, scope: NodeId, selector: &str) -> Result<Vec<NodeId>, SelectorError> {
        let selectors = SelectorList::parse(selector)?;
        Ok(self
            .descendants(scope)
            .into_iter()
            .filter(|n| selectors.matches(self, *n))
            .collect())
    }

    pub fn query_selector(&self, scope: NodeId, selector: &str) -> Result<Option<NodeId>, SelectorError> {
        let selectors = SelectorList::parse(selector)?;
        Ok(self
            .descendants(scope)
            .into_iter()
            .find(|n| selectors.matches(self, *n)))
    }
}
