//! Document
//!
//! Arena-backed node tree shared by the compiler, view factories and views.
//! Nodes are addressed by `NodeId`; detached nodes simply have no parent.
//! Released subtrees go on a free list and their slots are reused by later
//! allocations. A `Document` handle is cheap to clone and every clone points
//! at the same tree.

pub mod markup;
mod serialize;

use std::cell::RefCell;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::error::{Result, TemplatingError};

/// Index of a node in its document's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn index(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Element,
    Text,
    Comment,
    Fragment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub enum NodeData {
    Element {
        tag: String,
        attrs: SmallVec<[Attribute; 4]>,
    },
    Text(String),
    Comment(String),
    Fragment,
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    first_child: Option<NodeId>,
    last_child: Option<NodeId>,
    prev_sibling: Option<NodeId>,
    next_sibling: Option<NodeId>,
    data: NodeData,
}

#[derive(Debug, Default)]
struct DomTree {
    nodes: Vec<Node>,
    free: Vec<NodeId>,
}

impl Node {
    fn new(data: NodeData) -> Self {
        Node {
            parent: None,
            first_child: None,
            last_child: None,
            prev_sibling: None,
            next_sibling: None,
            data,
        }
    }
}

impl DomTree {
    fn alloc(&mut self, data: NodeData) -> NodeId {
        if let Some(id) = self.free.pop() {
            *self.node_mut(id) = Node::new(data);
            return id;
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node::new(data));
        id
    }

    /// Detach `id` and put it and all of its descendants on the free list
    fn release(&mut self, id: NodeId) {
        self.unlink(id);
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            stack.extend(self.children(node));
            *self.node_mut(node) = Node::new(NodeData::Fragment);
            self.free.push(node);
        }
    }

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    fn unlink(&mut self, id: NodeId) {
        let (parent, prev, next) = {
            let node = self.node(id);
            (node.parent, node.prev_sibling, node.next_sibling)
        };
        let Some(parent) = parent else {
            return;
        };

        match prev {
            Some(prev) => self.node_mut(prev).next_sibling = next,
            None => self.node_mut(parent).first_child = next,
        }
        match next {
            Some(next) => self.node_mut(next).prev_sibling = prev,
            None => self.node_mut(parent).last_child = prev,
        }

        let node = self.node_mut(id);
        node.parent = None;
        node.prev_sibling = None;
        node.next_sibling = None;
    }

    fn link(&mut self, parent: NodeId, id: NodeId, reference: Option<NodeId>) {
        if reference == Some(id) {
            return;
        }
        self.unlink(id);

        // A reference node that is not a child of `parent` degrades to append.
        let reference = reference.filter(|r| self.node(*r).parent == Some(parent));

        match reference {
            Some(reference) => {
                let prev = self.node(reference).prev_sibling;
                {
                    let node = self.node_mut(id);
                    node.parent = Some(parent);
                    node.prev_sibling = prev;
                    node.next_sibling = Some(reference);
                }
                self.node_mut(reference).prev_sibling = Some(id);
                match prev {
                    Some(prev) => self.node_mut(prev).next_sibling = Some(id),
                    None => self.node_mut(parent).first_child = Some(id),
                }
            }
            None => {
                let last = self.node(parent).last_child;
                {
                    let node = self.node_mut(id);
                    node.parent = Some(parent);
                    node.prev_sibling = last;
                    node.next_sibling = None;
                }
                match last {
                    Some(last) => self.node_mut(last).next_sibling = Some(id),
                    None => self.node_mut(parent).first_child = Some(id),
                }
                self.node_mut(parent).last_child = Some(id);
            }
        }
    }

    /// Insert `child` (or the children of a fragment) before `reference`
    fn insert(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        if matches!(self.node(child).data, NodeData::Fragment) {
            let mut current = self.node(child).first_child;
            while let Some(node) = current {
                current = self.node(node).next_sibling;
                self.link(parent, node, reference);
            }
        } else {
            self.link(parent, child, reference);
        }
    }

    fn clone_node(&mut self, id: NodeId, deep: bool) -> NodeId {
        let data = self.node(id).data.clone();
        let copy = self.alloc(data);
        if deep {
            let mut current = self.node(id).first_child;
            while let Some(child) = current {
                let child_copy = self.clone_node(child, true);
                self.link(copy, child_copy, None);
                current = self.node(child).next_sibling;
            }
        }
        copy
    }

    fn children(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.node(id).first_child;
        while let Some(child) = current {
            out.push(child);
            current = self.node(child).next_sibling;
        }
        out
    }

    fn collect_descendants(&self, id: NodeId, out: &mut Vec<NodeId>) {
        let mut current = self.node(id).first_child;
        while let Some(child) = current {
            out.push(child);
            self.collect_descendants(child, out);
            current = self.node(child).next_sibling;
        }
    }

    fn attrs(&self, id: NodeId) -> Option<&SmallVec<[Attribute; 4]>> {
        match &self.node(id).data {
            NodeData::Element { attrs, .. } => Some(attrs),
            _ => None,
        }
    }

    fn attrs_mut(&mut self, id: NodeId) -> Option<&mut SmallVec<[Attribute; 4]>> {
        match &mut self.node_mut(id).data {
            NodeData::Element { attrs, .. } => Some(attrs),
            _ => None,
        }
    }
}

/// Shared handle to a node tree
#[derive(Clone, Default)]
pub struct Document {
    tree: Rc<RefCell<DomTree>>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("nodes", &self.live_nodes())
            .finish()
    }
}

impl Document {
    pub fn new() -> Self {
        Document {
            tree: Rc::new(RefCell::new(DomTree::default())),
        }
    }

    pub fn ptr_eq(&self, other: &Document) -> bool {
        Rc::ptr_eq(&self.tree, &other.tree)
    }

    // ===== Creation =====

    pub fn create_element(&self, tag: &str) -> NodeId {
        self.tree.borrow_mut().alloc(NodeData::Element {
            tag: tag.to_ascii_lowercase(),
            attrs: SmallVec::new(),
        })
    }

    pub fn create_text(&self, text: &str) -> NodeId {
        self.tree.borrow_mut().alloc(NodeData::Text(text.to_string()))
    }

    pub fn create_comment(&self, text: &str) -> NodeId {
        self.tree.borrow_mut().alloc(NodeData::Comment(text.to_string()))
    }

    pub fn create_fragment(&self) -> NodeId {
        self.tree.borrow_mut().alloc(NodeData::Fragment)
    }

    /// Parse markup whose first element must be a `<template>` and return that element
    pub fn create_template_from_markup(&self, source: &str) -> Result<NodeId> {
        let fragment = self.parse_fragment(source)?;
        let template = self
            .child_nodes(fragment)
            .into_iter()
            .find(|node| self.is_element(*node))
            .filter(|node| self.is_element_named(*node, "template"))
            .ok_or(TemplatingError::MissingTemplateElement)?;
        self.remove(template);
        Ok(template)
    }

    // ===== Inspection =====

    pub fn node_type(&self, id: NodeId) -> NodeType {
        match self.tree.borrow().node(id).data {
            NodeData::Element { .. } => NodeType::Element,
            NodeData::Text(_) => NodeType::Text,
            NodeData::Comment(_) => NodeType::Comment,
            NodeData::Fragment => NodeType::Fragment,
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.node_type(id) == NodeType::Element
    }

    pub fn is_element_named(&self, id: NodeId, name: &str) -> bool {
        self.tag_name(id)
            .map(|tag| tag.eq_ignore_ascii_case(name))
            .unwrap_or(false)
    }

    pub fn tag_name(&self, id: NodeId) -> Option<String> {
        match &self.tree.borrow().node(id).data {
            NodeData::Element { tag, .. } => Some(tag.clone()),
            _ => None,
        }
    }

    /// Character data of a text or comment node
    pub fn text(&self, id: NodeId) -> Option<String> {
        match &self.tree.borrow().node(id).data {
            NodeData::Text(text) | NodeData::Comment(text) => Some(text.clone()),
            _ => None,
        }
    }

    pub fn set_text(&self, id: NodeId, value: &str) {
        {
            let mut tree = self.tree.borrow_mut();
            if let NodeData::Text(text) | NodeData::Comment(text) = &mut tree.node_mut(id).data {
                *text = value.to_string();
                return;
            }
        }
        for child in self.child_nodes(id) {
            self.remove(child);
        }
        let text = self.create_text(value);
        self.append_child(id, text);
    }

    /// Concatenated text of the node and all of its descendants
    pub fn text_content(&self, id: NodeId) -> String {
        let tree = self.tree.borrow();
        if let NodeData::Text(text) = &tree.node(id).data {
            return text.clone();
        }
        let mut nodes = Vec::new();
        tree.collect_descendants(id, &mut nodes);
        nodes
            .into_iter()
            .filter_map(|node| match &tree.node(node).data {
                NodeData::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    // ===== Traversal =====

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.tree.borrow().node(id).parent
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.tree.borrow().node(id).first_child
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.tree.borrow().node(id).last_child
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.tree.borrow().node(id).next_sibling
    }

    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.tree.borrow().node(id).prev_sibling
    }

    pub fn next_element_sibling(&self, id: NodeId) -> Option<NodeId> {
        let mut current = self.next_sibling(id);
        while let Some(node) = current {
            if self.is_element(node) {
                return Some(node);
            }
            current = self.next_sibling(node);
        }
        None
    }

    pub fn child_nodes(&self, id: NodeId) -> Vec<NodeId> {
        self.tree.borrow().children(id)
    }

    pub fn has_child_nodes(&self, id: NodeId) -> bool {
        self.first_child(id).is_some()
    }

    /// All descendants in document order, excluding `id` itself
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.tree.borrow().collect_descendants(id, &mut out);
        out
    }

    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    // ===== Mutation =====

    /// Append a node; fragments contribute their children and end up empty
    pub fn append_child(&self, parent: NodeId, child: NodeId) {
        self.tree.borrow_mut().insert(parent, child, None);
    }

    pub fn insert_before(&self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        self.tree.borrow_mut().insert(parent, child, reference);
    }

    /// Detach a node from its parent; a detached node is left untouched
    pub fn remove(&self, id: NodeId) {
        self.tree.borrow_mut().unlink(id);
    }

    /// Free `id` and its subtree. Ids into the subtree must not be used
    /// afterwards. Skipped while the tree is borrowed.
    pub fn release(&self, id: NodeId) {
        if let Ok(mut tree) = self.tree.try_borrow_mut() {
            tree.release(id);
        }
    }

    /// Free a detached fragment and everything still inside it
    pub fn release_fragment(&self, id: NodeId) {
        let Ok(mut tree) = self.tree.try_borrow_mut() else {
            return;
        };
        let node = tree.node(id);
        if matches!(node.data, NodeData::Fragment) && node.parent.is_none() {
            tree.release(id);
        }
    }

    /// Nodes currently allocated and not released
    pub fn live_nodes(&self) -> usize {
        let tree = self.tree.borrow();
        tree.nodes.len() - tree.free.len()
    }

    /// Size of the arena, including released slots awaiting reuse
    pub fn arena_size(&self) -> usize {
        self.tree.borrow().nodes.len()
    }

    /// Put `new_node` where `old_node` is and detach `old_node`
    pub fn replace_node(&self, new_node: NodeId, old_node: NodeId) {
        let mut tree = self.tree.borrow_mut();
        if let Some(parent) = tree.node(old_node).parent {
            tree.insert(parent, new_node, Some(old_node));
            tree.unlink(old_node);
        }
    }

    pub fn clone_node(&self, id: NodeId, deep: bool) -> NodeId {
        self.tree.borrow_mut().clone_node(id, deep)
    }

    // ===== Attributes =====

    pub fn attributes(&self, id: NodeId) -> Vec<Attribute> {
        self.tree
            .borrow()
            .attrs(id)
            .map(|attrs| attrs.to_vec())
            .unwrap_or_default()
    }

    pub fn get_attribute(&self, id: NodeId, name: &str) -> Option<String> {
        self.tree.borrow().attrs(id).and_then(|attrs| {
            attrs
                .iter()
                .find(|attr| attr.name.eq_ignore_ascii_case(name))
                .map(|attr| attr.value.clone())
        })
    }

    pub fn has_attribute(&self, id: NodeId, name: &str) -> bool {
        self.get_attribute(id, name).is_some()
    }

    pub fn set_attribute(&self, id: NodeId, name: &str, value: &str) {
        let mut tree = self.tree.borrow_mut();
        if let Some(attrs) = tree.attrs_mut(id) {
            match attrs.iter_mut().find(|attr| attr.name.eq_ignore_ascii_case(name)) {
                Some(attr) => attr.value = value.to_string(),
                None => attrs.push(Attribute {
                    name: name.to_ascii_lowercase(),
                    value: value.to_string(),
                }),
            }
        }
    }

    pub fn remove_attribute(&self, id: NodeId, name: &str) {
        let mut tree = self.tree.borrow_mut();
        if let Some(attrs) = tree.attrs_mut(id) {
            attrs.retain(|attr| !attr.name.eq_ignore_ascii_case(name));
        }
    }

    pub fn class_list(&self, id: NodeId) -> Vec<String> {
        self.get_attribute(id, "class")
            .map(|value| value.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.class_list(id).iter().any(|c| c == class)
    }

    pub fn add_class(&self, id: NodeId, class: &str) {
        if !self.is_element(id) || self.has_class(id, class) {
            return;
        }
        let mut classes = self.class_list(id);
        classes.push(class.to_string());
        self.set_attribute(id, "class", &classes.join(" "));
    }

    pub fn remove_class(&self, id: NodeId, class: &str) {
        if !self.has_class(id, class) {
            return;
        }
        let classes: Vec<String> = self
            .class_list(id)
            .into_iter()
            .filter(|c| c != class)
            .collect();
        self.set_attribute(id, "class", &classes.join(" "));
    }

    // ===== Serialization =====

    /// Markup of the node itself (fragments serialize their children)
    pub fn to_html(&self, id: NodeId) -> String {
        let tree = self.tree.borrow();
        let mut out = String::new();
        serialize::write_node(&tree, id, &mut out);
        out
    }

    pub fn inner_html(&self, id: NodeId) -> String {
        let tree = self.tree.borrow();
        let mut out = String::new();
        for child in tree.children(id) {
            serialize::write_node(&tree, child, &mut out);
        }
        out
    }
}
