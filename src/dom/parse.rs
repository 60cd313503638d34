//! HTML parsing. html5ever builds an `RcDom`, which is then copied into the
//! document arena so the rest of the crate works with plain `NodeId`s.

use super::{Document, NodeId};
use html5ever::tendril::TendrilSink;
use html5ever::{parse_document, parse_fragment, LocalName, Namespace, ParseOpts, QualName};
use markup5ever_rcdom::{Handle, NodeData, RcDom};

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

impl Document {
    /// Parses a complete HTML document. The tree builder adds `html`,
    /// `head` and `body` where the markup omits them.
    pub fn parse(html: &str) -> Self {
        let dom = parse_document(RcDom::default(), ParseOpts::default()).one(html);
        let mut doc = Document::new();
        let root = doc.root();
        doc.copy_children(&dom.document, root);
        doc
    }

    /// Parses `html` as a fragment in the context of `parent` and appends
    /// the nodes to it. Non-element parents parse as `body` content.
    pub fn parse_fragment_into(&mut self, parent: NodeId, html: &str) {
        let context = self.tag_name(parent).unwrap_or("body").to_string();
        let context = QualName::new(None, Namespace::from(HTML_NAMESPACE), LocalName::from(context));
        let dom = parse_fragment(RcDom::default(), ParseOpts::default(), context, Vec::new()).one(html);

        // Fragment nodes land under a synthetic `html` element.
        let wrapper = dom.document.children.borrow().first().cloned();
        if let Some(wrapper) = wrapper {
            self.copy_children(&wrapper, parent);
        }
    }

    fn copy_children(&mut self, from: &Handle, parent: NodeId) {
        let source = match &from.data {
            NodeData::Element { template_contents, .. } => template_contents.borrow().clone(),
            _ => None,
        }
        .unwrap_or_else(|| from.clone());

        for child in source.children.borrow().iter() {
            if let Some(id) = self.copy_node(child) {
                self.append_child(parent, id);
                self.copy_children(child, id);
            }
        }
    }

    fn copy_node(&mut self, handle: &Handle) -> Option<NodeId> {
        match &handle.data {
            NodeData::Doctype { name, .. } => Some(self.create_doctype(name)),
            NodeData::Element { name, attrs, .. } => {
                let id = self.create_element(&name.local);
                for attr in attrs.borrow().iter() {
                    self.set_attribute(id, &attr.name.local, &attr.value);
                }
                Some(id)
            }
            NodeData::Text { contents } => Some(self.create_text(&contents.borrow())),
            NodeData::Comment { contents } => Some(self.create_comment(contents)),
            NodeData::Document | NodeData::ProcessingInstruction { .. } => None,
        }
    }
}
