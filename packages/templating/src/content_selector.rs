//! Content Selector
//!
//! A `<content select="...">` projection point. Each view distributed into
//! the owning slot contributes one group of nodes (possibly empty) to every
//! selector, so group `n` always belongs to slot child `n`.

use std::cell::RefCell;
use std::rc::Rc;

use crate::dom::{Document, NodeId};
use crate::error::Result;
use crate::selector::SelectorList;
use crate::view::View;

pub struct ContentSelector {
    document: Document,
    anchor: NodeId,
    selector: Option<String>,
    parsed: Option<SelectorList>,
    groups: RefCell<Vec<Vec<NodeId>>>,
}

impl ContentSelector {
    pub fn new(document: Document, anchor: NodeId, selector: Option<String>) -> Result<Rc<Self>> {
        let selector = selector.filter(|s| !s.trim().is_empty());
        let parsed = selector.as_deref().map(SelectorList::parse).transpose()?;
        Ok(Rc::new(ContentSelector {
            document,
            anchor,
            selector,
            parsed,
            groups: RefCell::new(Vec::new()),
        }))
    }

    /// Classify the top-level nodes of `view` and hand every selector its
    /// group, in selector order. A node claims the first selector it matches.
    /// Nodes anchoring a nested slot instead give that slot its own copy of
    /// the selectors.
    pub fn apply_selectors(
        view: &View,
        selectors: &[Rc<ContentSelector>],
        mut callback: impl FnMut(&Rc<ContentSelector>, Vec<NodeId>),
    ) {
        let document = view.document();
        let mut groups: Vec<Vec<NodeId>> = vec![Vec::new(); selectors.len()];

        let mut current = document.first_child(view.fragment());
        while let Some(node) = current {
            current = document.next_sibling(node);

            if view.is_boundary(node) {
                continue;
            }

            if let Some(slot) = view.slot_anchored_at(node) {
                let copies = selectors.iter().map(|s| s.copy_for_view_slot()).collect();
                slot.install_content_selectors(copies);
                continue;
            }

            if let Some(index) = selectors.iter().position(|s| s.matches(node)) {
                groups[index].push(node);
            }
        }

        for (selector, group) in selectors.iter().zip(groups) {
            callback(selector, group);
        }
    }

    /// Same anchor and selector, no groups
    pub fn copy_for_view_slot(&self) -> Rc<ContentSelector> {
        Rc::new(ContentSelector {
            document: self.document.clone(),
            anchor: self.anchor,
            selector: self.selector.clone(),
            parsed: self.parsed.clone(),
            groups: RefCell::new(Vec::new()),
        })
    }

    pub fn anchor(&self) -> NodeId {
        self.anchor
    }

    pub fn selector(&self) -> Option<&str> {
        self.selector.as_deref()
    }

    pub fn is_match_all(&self) -> bool {
        self.parsed.is_none()
    }

    pub fn matches(&self, node: NodeId) -> bool {
        match &self.parsed {
            None => true,
            Some(parsed) => self.document.is_element(node) && parsed.matches(&self.document, node),
        }
    }

    pub fn groups(&self) -> Vec<Vec<NodeId>> {
        self.groups.borrow().clone()
    }

    fn place_before(&self, group: &[NodeId], reference: NodeId) {
        let Some(parent) = self.document.parent(reference) else {
            return;
        };
        for node in group {
            self.document.insert_before(parent, *node, Some(reference));
        }
    }

    pub fn add(&self, group: Vec<NodeId>) {
        self.place_before(&group, self.anchor);
        self.groups.borrow_mut().push(group);
    }

    /// Insert a group at `index`, placed before the first later group that
    /// has nodes, or at the anchor
    pub fn insert(&self, index: usize, group: Vec<NodeId>) {
        if !group.is_empty() {
            let reference = self
                .groups
                .borrow()
                .iter()
                .skip(index)
                .find_map(|g| g.first().copied())
                .unwrap_or(self.anchor);
            self.place_before(&group, reference);
        }

        let mut groups = self.groups.borrow_mut();
        let index = index.min(groups.len());
        groups.insert(index, group);
    }

    /// Return the group at `index` to the view it came from
    pub fn remove_at(&self, index: usize, view: &View) {
        let group = {
            let mut groups = self.groups.borrow_mut();
            if index >= groups.len() {
                return;
            }
            groups.remove(index)
        };
        for node in group {
            view.restore_node(node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_anchors_against_later_group() {
        let document = Document::new();
        let host = document.parse_fragment("<div><!--anchor--></div>").unwrap();
        let div = document.first_child(host).unwrap();
        let anchor = document.first_child(div).unwrap();
        let selector = ContentSelector::new(document.clone(), anchor, None).unwrap();

        let a = document.create_element("a");
        let c = document.create_element("c");
        let b = document.create_element("b");
        selector.add(vec![a]);
        selector.add(vec![c]);
        selector.insert(1, vec![b]);

        assert_eq!(document.inner_html(div), "<a></a><b></b><c></c><!--anchor-->");
        assert_eq!(selector.groups().len(), 3);
    }

    #[test]
    fn test_insert_skips_empty_groups() {
        let document = Document::new();
        let host = document.parse_fragment("<div><!--anchor--></div>").unwrap();
        let div = document.first_child(host).unwrap();
        let anchor = document.first_child(div).unwrap();
        let selector = ContentSelector::new(document.clone(), anchor, None).unwrap();

        let a = document.create_element("a");
        let c = document.create_element("c");
        let b = document.create_element("b");
        selector.add(vec![a]);
        selector.add(vec![]);
        selector.add(vec![c]);
        selector.insert(1, vec![b]);

        assert_eq!(document.inner_html(div), "<a></a><b></b><c></c><!--anchor-->");
    }

    #[test]
    fn test_selector_matching() {
        let document = Document::new();
        let fragment = document
            .parse_fragment("<h1 class=\"title\"></h1><p></p>text")
            .unwrap();
        let nodes = document.child_nodes(fragment);
        let anchor = document.create_comment("anchor");

        let titles = ContentSelector::new(document.clone(), anchor, Some(".title".into())).unwrap();
        assert!(titles.matches(nodes[0]));
        assert!(!titles.matches(nodes[1]));
        assert!(!titles.matches(nodes[2]));

        let all = ContentSelector::new(document.clone(), anchor, Some("  ".into())).unwrap();
        assert!(all.is_match_all());
        assert!(all.matches(nodes[2]));
    }
}
