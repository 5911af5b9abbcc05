//! View
//!
//! One instantiation of a compiled template: a range of sibling nodes
//! (`first_child..=last_child`) plus the controllers, bindings and child
//! slots/views created for it. Nodes live in the view's own fragment while
//! the view is not inserted anywhere.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::behavior::controller::Controller;
use crate::binding::Binding;
use crate::content_selector::ContentSelector;
use crate::context::{same_context_opt, BindingContext};
use crate::dom::{Document, NodeId, NodeType};
use crate::view_factory::ViewFactory;
use crate::view_slot::ViewSlot;

/// Child of a view that takes part in its lifecycle
#[derive(Clone)]
pub enum ViewNode {
    View(Rc<View>),
    Slot(Rc<ViewSlot>),
}

impl ViewNode {
    pub fn bind(&self, context: Option<&BindingContext>, system_update: bool) {
        match self {
            ViewNode::View(view) => view.bind_with(context, system_update),
            ViewNode::Slot(slot) => slot.bind(context),
        }
    }

    pub fn unbind(&self) {
        match self {
            ViewNode::View(view) => view.unbind(),
            ViewNode::Slot(slot) => slot.unbind(),
        }
    }

    pub fn attached(&self) {
        match self {
            ViewNode::View(view) => view.attached(),
            ViewNode::Slot(slot) => slot.attached(),
        }
    }

    pub fn detached(&self) {
        match self {
            ViewNode::View(view) => view.detached(),
            ViewNode::Slot(slot) => slot.detached(),
        }
    }
}

pub struct View {
    document: Document,
    factory: Weak<ViewFactory>,
    fragment: NodeId,
    first_child: Option<NodeId>,
    last_child: Option<NodeId>,
    /// Wraps nodes that already lived under `fragment`; removal detaches them
    adopted: bool,
    /// Enhanced views wrap live nodes they do not own
    releases_fragment: Cell<bool>,
    detached_nodes: RefCell<Vec<NodeId>>,
    controllers: Vec<Rc<Controller>>,
    bindings: RefCell<Vec<Rc<dyn Binding>>>,
    children: Rc<RefCell<Vec<ViewNode>>>,
    system_controlled: bool,
    content_selectors: Vec<Rc<ContentSelector>>,
    binding_context: RefCell<Option<BindingContext>>,
    is_bound: Cell<bool>,
    is_attached: Cell<bool>,
    from_cache: Cell<bool>,
    owner: RefCell<Weak<Controller>>,
}

impl View {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        document: Document,
        factory: Weak<ViewFactory>,
        fragment: NodeId,
        controllers: Vec<Rc<Controller>>,
        bindings: Vec<Rc<dyn Binding>>,
        children: Rc<RefCell<Vec<ViewNode>>>,
        system_controlled: bool,
        content_selectors: Vec<Rc<ContentSelector>>,
    ) -> Rc<Self> {
        let first_child = document.first_child(fragment);
        let last_child = document.last_child(fragment);
        Rc::new(View {
            document,
            factory,
            fragment,
            first_child,
            last_child,
            adopted: false,
            releases_fragment: Cell::new(true),
            detached_nodes: RefCell::new(Vec::new()),
            controllers,
            bindings: RefCell::new(bindings),
            children,
            system_controlled,
            content_selectors,
            binding_context: RefCell::new(None),
            is_bound: Cell::new(false),
            is_attached: Cell::new(false),
            from_cache: Cell::new(false),
            owner: RefCell::new(Weak::new()),
        })
    }

    /// View over the existing children of `parent`
    pub(crate) fn adopt(document: Document, parent: NodeId) -> Rc<Self> {
        let first_child = document.first_child(parent);
        let last_child = document.last_child(parent);
        Rc::new(View {
            document,
            factory: Weak::new(),
            fragment: parent,
            first_child,
            last_child,
            adopted: true,
            releases_fragment: Cell::new(false),
            detached_nodes: RefCell::new(Vec::new()),
            controllers: Vec::new(),
            bindings: RefCell::new(Vec::new()),
            children: Rc::new(RefCell::new(Vec::new())),
            system_controlled: false,
            content_selectors: Vec::new(),
            binding_context: RefCell::new(None),
            is_bound: Cell::new(false),
            is_attached: Cell::new(false),
            from_cache: Cell::new(false),
            owner: RefCell::new(Weak::new()),
        })
    }

    // ===== Accessors =====

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn factory(&self) -> Option<Rc<ViewFactory>> {
        self.factory.upgrade()
    }

    pub fn fragment(&self) -> NodeId {
        self.fragment
    }

    pub fn first_child(&self) -> Option<NodeId> {
        self.first_child
    }

    pub fn last_child(&self) -> Option<NodeId> {
        self.last_child
    }

    pub fn controllers(&self) -> &[Rc<Controller>] {
        &self.controllers
    }

    pub fn children(&self) -> Vec<ViewNode> {
        self.children.borrow().clone()
    }

    pub fn content_selectors(&self) -> &[Rc<ContentSelector>] {
        &self.content_selectors
    }

    pub fn binding_context(&self) -> Option<BindingContext> {
        self.binding_context.borrow().clone()
    }

    pub fn is_bound(&self) -> bool {
        self.is_bound.get()
    }

    pub fn is_attached(&self) -> bool {
        self.is_attached.get()
    }

    pub fn from_cache(&self) -> bool {
        self.from_cache.get()
    }

    pub(crate) fn set_from_cache(&self, value: bool) {
        self.from_cache.set(value);
    }

    pub(crate) fn keep_fragment_on_drop(&self) {
        self.releases_fragment.set(false);
    }

    /// Nodes removed while building the view, freed along with it
    pub(crate) fn own_detached_nodes(&self, nodes: Vec<NodeId>) {
        self.detached_nodes.borrow_mut().extend(nodes);
    }

    pub fn system_controlled(&self) -> bool {
        self.system_controlled
    }

    pub fn owner(&self) -> Option<Rc<Controller>> {
        self.owner.borrow().upgrade()
    }

    pub(crate) fn set_owner(&self, owner: &Rc<Controller>) {
        *self.owner.borrow_mut() = Rc::downgrade(owner);
    }

    /// Slot among this view's children anchored at `node`
    pub fn slot_anchored_at(&self, node: NodeId) -> Option<Rc<ViewSlot>> {
        self.children.borrow().iter().find_map(|child| match child {
            ViewNode::Slot(slot) if slot.anchor() == node => Some(slot.clone()),
            _ => None,
        })
    }

    /// The comment markers the compiler wraps every template in
    pub(crate) fn is_boundary(&self, node: NodeId) -> bool {
        (Some(node) == self.first_child || Some(node) == self.last_child)
            && self.document.node_type(node) == NodeType::Comment
    }

    /// Put a node back into the fragment, inside the boundary markers
    pub(crate) fn restore_node(&self, node: NodeId) {
        let reference = self
            .last_child
            .filter(|last| self.is_boundary(*last) && self.document.parent(*last) == Some(self.fragment));
        self.document.insert_before(self.fragment, node, reference);
    }

    // ===== Lifecycle =====

    pub fn created(self: &Rc<Self>) {
        for controller in &self.controllers {
            controller.created(self);
        }
    }

    /// Bind with an explicit context
    pub fn bind(&self, context: &BindingContext) {
        self.bind_with(Some(context), false);
    }

    /// On a system update a view that pins its own context keeps it;
    /// otherwise the given context wins.
    pub fn bind_with(&self, context: Option<&BindingContext>, system_update: bool) {
        let own = self.binding_context();
        let context = if system_update && !self.system_controlled {
            own.clone().or_else(|| context.cloned())
        } else {
            context.cloned().or_else(|| own.clone())
        };

        if self.is_bound.get() {
            if same_context_opt(own.as_ref(), context.as_ref()) {
                return;
            }
            self.unbind();
        }

        self.is_bound.set(true);
        *self.binding_context.borrow_mut() = context.clone();

        if let Some(owner) = self.owner() {
            owner.bind(context.as_ref());
        }

        if let Some(context) = &context {
            let bindings = self.bindings.borrow().clone();
            for binding in bindings {
                binding.bind(context);
            }
        }

        for controller in &self.controllers {
            controller.bind(context.as_ref());
        }

        for child in self.children() {
            child.bind(context.as_ref(), true);
        }
    }

    pub fn add_binding(&self, binding: Rc<dyn Binding>) {
        self.bindings.borrow_mut().push(binding.clone());
        if self.is_bound.get() {
            if let Some(context) = self.binding_context() {
                binding.bind(&context);
            }
        }
    }

    pub fn unbind(&self) {
        if !self.is_bound.get() {
            return;
        }
        self.is_bound.set(false);
        self.binding_context.borrow_mut().take();

        if let Some(owner) = self.owner() {
            owner.unbind();
        }

        let bindings = self.bindings.borrow().clone();
        for binding in bindings {
            binding.unbind();
        }

        for controller in &self.controllers {
            controller.unbind();
        }

        for child in self.children() {
            child.unbind();
        }
    }

    pub fn attached(&self) {
        if self.is_attached.get() {
            return;
        }
        self.is_attached.set(true);

        if let Some(owner) = self.owner() {
            owner.attached();
        }

        for controller in &self.controllers {
            controller.attached();
        }

        for child in self.children() {
            child.attached();
        }
    }

    pub fn detached(&self) {
        if !self.is_attached.get() {
            return;
        }
        self.is_attached.set(false);

        if let Some(owner) = self.owner() {
            owner.detached();
        }

        for controller in &self.controllers {
            controller.detached();
        }

        for child in self.children() {
            child.detached();
        }
    }

    pub fn return_to_cache(self: &Rc<Self>) {
        if let Some(factory) = self.factory.upgrade() {
            factory.return_view_to_cache(self);
        }
    }

    // ===== Nodes =====

    pub fn insert_nodes_before(&self, reference: NodeId) {
        if let Some(parent) = self.document.parent(reference) {
            self.document
                .insert_before(parent, self.fragment, Some(reference));
        }
    }

    pub fn append_nodes_to(&self, parent: NodeId) {
        self.document.append_child(parent, self.fragment);
    }

    /// Move the view's nodes back into its fragment
    pub fn remove_nodes(&self) {
        if self.adopted {
            while let Some(last) = self.document.last_child(self.fragment) {
                self.document.remove(last);
            }
            return;
        }

        let (Some(start), Some(end)) = (self.first_child, self.last_child) else {
            return;
        };
        let mut current = Some(start);
        while let Some(node) = current {
            let next = self.document.next_sibling(node);
            self.document.append_child(self.fragment, node);
            if node == end {
                break;
            }
            current = next;
        }
    }
}

/// A view that is neither pooled nor referenced gives its fragment back to
/// the document. Nodes inserted elsewhere stay where they are.
impl Drop for View {
    fn drop(&mut self) {
        if self.releases_fragment.get() {
            self.document.release_fragment(self.fragment);
        }
        for node in self.detached_nodes.take() {
            self.document.release(node);
        }
    }
}
