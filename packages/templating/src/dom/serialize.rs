//! Markup serialization for debugging output and assertions.

use super::{DomTree, NodeData, NodeId};

pub(crate) const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

pub(super) fn write_node(tree: &DomTree, id: NodeId, out: &mut String) {
    match &tree.node(id).data {
        NodeData::Element { tag, attrs } => {
            out.push('<');
            out.push_str(tag);
            for attr in attrs {
                out.push(' ');
                out.push_str(&attr.name);
                if !attr.value.is_empty() {
                    out.push_str("=\"");
                    escape_into(&attr.value, true, out);
                    out.push('"');
                }
            }
            out.push('>');

            if VOID_ELEMENTS.contains(&tag.as_str()) {
                return;
            }
            for child in tree.children(id) {
                write_node(tree, child, out);
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
        NodeData::Text(text) => escape_into(text, false, out),
        NodeData::Comment(text) => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
        NodeData::Fragment => {
            for child in tree.children(id) {
                write_node(tree, child, out);
            }
        }
    }
}

fn escape_into(value: &str, attribute: bool, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' if !attribute => out.push_str("&lt;"),
            '>' if !attribute => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}
