//! HTML serialization - inner_html, outer_html, serialize.

use super::{is_raw_text_element, is_void_element, Document, NodeId, NodeKind};

fn escape_text(input: &str, out: &mut String) {
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            c => out.push(c),
        }
    }
}

fn escape_attr(input: &str, out: &mut String) {
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            c => out.push(c),
        }
    }
}

impl Document {
    /// Serializes the whole document, doctype included.
    pub fn serialize(&self) -> String {
        let mut out = String::with_capacity(4096);
        for child in self.children(self.root()) {
            self.serialize_node(*child, &mut out);
        }
        out
    }

    pub fn inner_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        let raw = self.tag_name(id).map(is_raw_text_element).unwrap_or(false);
        for child in self.children(id) {
            self.serialize_child(*child, raw, &mut out);
        }
        out
    }

    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.serialize_node(id, &mut out);
        out
    }

    fn serialize_node(&self, id: NodeId, out: &mut String) {
        self.serialize_child(id, false, out)
    }

    fn serialize_child(&self, id: NodeId, raw_parent: bool, out: &mut String) {
        match self.kind(id) {
            NodeKind::Document => {
                for child in self.children(id) {
                    self.serialize_node(*child, out);
                }
            }
            NodeKind::Doctype(name) => {
                out.push_str("<!DOCTYPE ");
                out.push_str(if name.is_empty() { "html" } else { name });
                out.push('>');
            }
            NodeKind::Text(text) if raw_parent => out.push_str(text),
            NodeKind::Text(text) => escape_text(text, out),
            NodeKind::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            NodeKind::Element(el) => {
                out.push('<');
                out.push_str(&el.tag);
                for (name, value) in &el.attributes {
                    out.push(' ');
                    out.push_str(name);
                    // Empty attributes are written bare so boolean
                    // attributes read as authored: `<script defer>`.
                    if !value.is_empty() {
                        out.push_str("=\"");
                        escape_attr(value, out);
                        out.push('"');
                    }
                }
                out.push('>');
                if is_void_element(&el.tag) {
                    return;
                }
                let raw = is_raw_text_element(&el.tag);
                for child in self.children(id) {
                    self.serialize_child(*child, raw, out);
                }
                out.push_str("</");
                out.push_str(&el.tag);
                out.push('>');
            }
        }
    }
}
