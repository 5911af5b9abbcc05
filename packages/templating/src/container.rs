//! Container
//!
//! Minimal hierarchical dependency container. Views get a child container
//! per instruction target so behaviors on the same element can share
//! instances and reach element-scoped services: the element itself, the
//! view slot and bound view factory of a template controller, the
//! instruction, and the active resources.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::animator::{Animator, NoopAnimator};
use crate::behavior::controller::Controller;
use crate::context::{BindingContext, ViewModel};
use crate::dom::{Document, NodeId};
use crate::instructions::{PartReplacements, TargetInstruction};
use crate::resources::ViewResources;
use crate::task_queue::TaskQueue;
use crate::util::IdAllocator;
use crate::view::ViewNode;
use crate::view_factory::BoundViewFactory;
use crate::view_slot::ViewSlot;

/// Key under which a behavior's view model is memoized on an element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProviderId(pub(crate) u32);

/// State shared by every container in one tree
struct Shared {
    task_queue: Rc<TaskQueue>,
    provider_ids: IdAllocator,
    /// Custom element controllers by the element they were created on
    controllers: RefCell<HashMap<NodeId, Weak<Controller>>>,
}

/// Services available to behaviors on one instruction target
pub(crate) struct ElementScope {
    pub document: Document,
    pub element: NodeId,
    /// The element as written in markup; a containerless behavior
    /// replaces `element` with an anchor and leaves this detached
    pub host: NodeId,
    pub instruction: Rc<TargetInstruction>,
    pub binding_context: Option<BindingContext>,
    pub children: Weak<RefCell<Vec<ViewNode>>>,
    pub resources: Rc<ViewResources>,
    pub part_replacements: Option<Rc<PartReplacements>>,
    view_slot: RefCell<Weak<ViewSlot>>,
}

impl ElementScope {
    pub fn new(
        document: Document,
        element: NodeId,
        instruction: Rc<TargetInstruction>,
        binding_context: Option<BindingContext>,
        children: &Rc<RefCell<Vec<ViewNode>>>,
        resources: Rc<ViewResources>,
        part_replacements: Option<Rc<PartReplacements>>,
    ) -> Self {
        ElementScope {
            document,
            element,
            host: element,
            instruction,
            binding_context,
            children: Rc::downgrade(children),
            resources,
            part_replacements,
            view_slot: RefCell::new(Weak::new()),
        }
    }

    pub fn with_host(mut self, host: NodeId) -> Self {
        self.host = host;
        self
    }
}

pub struct Container {
    parent: Option<Rc<Container>>,
    shared: Rc<Shared>,
    instances: RefCell<HashMap<TypeId, Box<dyn Any>>>,
    providers: RefCell<HashMap<ProviderId, Option<Weak<dyn ViewModel>>>>,
    element: Option<ElementScope>,
    view_model: RefCell<Option<BindingContext>>,
}

impl Container {
    /// Root container with its own task queue
    pub fn new() -> Rc<Self> {
        Rc::new(Container {
            parent: None,
            shared: Rc::new(Shared {
                task_queue: Rc::new(TaskQueue::new()),
                provider_ids: IdAllocator::new(),
                controllers: RefCell::new(HashMap::new()),
            }),
            instances: RefCell::new(HashMap::new()),
            providers: RefCell::new(HashMap::new()),
            element: None,
            view_model: RefCell::new(None),
        })
    }

    pub fn create_child(self: &Rc<Self>) -> Rc<Self> {
        self.child(None)
    }

    pub(crate) fn create_element_child(self: &Rc<Self>, scope: ElementScope) -> Rc<Self> {
        self.child(Some(scope))
    }

    fn child(self: &Rc<Self>, element: Option<ElementScope>) -> Rc<Self> {
        Rc::new(Container {
            parent: Some(self.clone()),
            shared: self.shared.clone(),
            instances: RefCell::new(HashMap::new()),
            providers: RefCell::new(HashMap::new()),
            element,
            view_model: RefCell::new(None),
        })
    }

    pub fn parent(&self) -> Option<&Rc<Container>> {
        self.parent.as_ref()
    }

    pub fn task_queue(&self) -> Rc<TaskQueue> {
        self.shared.task_queue.clone()
    }

    pub(crate) fn next_provider_id(&self) -> ProviderId {
        ProviderId(self.shared.provider_ids.next())
    }

    pub(crate) fn register_controller(&self, element: NodeId, controller: &Rc<Controller>) {
        let mut controllers = self.shared.controllers.borrow_mut();
        controllers.retain(|_, controller| controller.strong_count() > 0);
        controllers.insert(element, Rc::downgrade(controller));
    }

    /// Controller of the custom element created on `element`
    pub fn controller_for(&self, element: NodeId) -> Option<Rc<Controller>> {
        self.shared
            .controllers
            .borrow()
            .get(&element)
            .and_then(Weak::upgrade)
    }

    // ===== Instances =====

    /// Register a shared instance under its type; `T` may be a trait object
    pub fn register_instance<T: ?Sized + 'static>(&self, value: Rc<T>) {
        self.instances
            .borrow_mut()
            .insert(TypeId::of::<Rc<T>>(), Box::new(value));
    }

    /// Resolve an instance here or in an ancestor
    pub fn get<T: ?Sized + 'static>(&self) -> Option<Rc<T>> {
        let local = self
            .instances
            .borrow()
            .get(&TypeId::of::<Rc<T>>())
            .and_then(|boxed| boxed.downcast_ref::<Rc<T>>())
            .cloned();
        local.or_else(|| self.parent.as_ref().and_then(|p| p.get::<T>()))
    }

    pub fn has<T: ?Sized + 'static>(&self, check_parent: bool) -> bool {
        if self.instances.borrow().contains_key(&TypeId::of::<Rc<T>>()) {
            return true;
        }
        check_parent && self.parent.as_ref().map(|p| p.has::<T>(true)).unwrap_or(false)
    }

    pub fn animator(&self) -> Rc<dyn Animator> {
        self.get::<dyn Animator>()
            .unwrap_or_else(|| Rc::new(NoopAnimator))
    }

    // ===== Behavior models =====

    /// Reserve a model slot for a behavior on this element
    pub(crate) fn register_provider(&self, id: ProviderId) {
        self.providers.borrow_mut().entry(id).or_insert(None);
    }

    /// The model for `id`, created once per registering container.
    /// Sibling behaviors on the same element resolve the same instance.
    pub fn get_or_create_model(
        &self,
        id: ProviderId,
        create: impl FnOnce() -> BindingContext,
    ) -> BindingContext {
        let mut current = Some(self);
        while let Some(container) = current {
            let existing = container.providers.borrow().get(&id).cloned();
            if let Some(slot) = existing {
                if let Some(model) = slot.and_then(|weak| weak.upgrade()) {
                    return model;
                }
                let model = create();
                container
                    .providers
                    .borrow_mut()
                    .insert(id, Some(Rc::downgrade(&model)));
                return model;
            }
            current = container.parent.as_deref();
        }
        create()
    }

    /// Model already created for `id` on this element or an ancestor
    pub fn resolve_model(&self, id: ProviderId) -> Option<BindingContext> {
        let local = self
            .providers
            .borrow()
            .get(&id)
            .cloned()
            .flatten()
            .and_then(|weak| weak.upgrade());
        local.or_else(|| self.parent.as_ref().and_then(|p| p.resolve_model(id)))
    }

    pub fn set_view_model(&self, model: BindingContext) {
        *self.view_model.borrow_mut() = Some(model);
    }

    pub fn view_model(&self) -> Option<BindingContext> {
        self.view_model.borrow().clone()
    }

    // ===== Element scope =====

    fn nearest_scope(self: &Rc<Self>) -> Option<Rc<Container>> {
        let mut current = Some(self.clone());
        while let Some(container) = current {
            if container.element.is_some() {
                return Some(container);
            }
            current = container.parent.clone();
        }
        None
    }

    fn scope(&self) -> Option<&ElementScope> {
        match &self.element {
            Some(scope) => Some(scope),
            None => self.parent.as_ref().and_then(|p| p.scope()),
        }
    }

    pub fn element(&self) -> Option<NodeId> {
        self.scope().map(|s| s.element)
    }

    /// Element that carried the behavior in markup, even when it has been
    /// swapped for an anchor
    pub fn host_element(&self) -> Option<NodeId> {
        self.scope().map(|s| s.host)
    }

    /// Where surrogate attributes for a view created at `element` go
    pub(crate) fn surrogate_host(&self, element: NodeId) -> NodeId {
        self.scope()
            .filter(|s| s.element == element)
            .map(|s| s.host)
            .unwrap_or(element)
    }

    pub fn document(&self) -> Option<Document> {
        self.scope().map(|s| s.document.clone())
    }

    pub fn target_instruction(&self) -> Option<Rc<TargetInstruction>> {
        self.scope().map(|s| s.instruction.clone())
    }

    pub fn view_resources(&self) -> Option<Rc<ViewResources>> {
        self.scope().map(|s| s.resources.clone())
    }

    pub fn element_binding_context(&self) -> Option<BindingContext> {
        self.scope().and_then(|s| s.binding_context.clone())
    }

    /// Slot anchored at the element; created on first request and tracked
    /// as a child of the view being built
    pub fn view_slot(self: &Rc<Self>) -> Option<Rc<ViewSlot>> {
        let owner = self.nearest_scope()?;
        let scope = owner.element.as_ref()?;

        if let Some(slot) = scope.view_slot.borrow().upgrade() {
            return Some(slot);
        }

        let slot = ViewSlot::new(
            scope.document.clone(),
            scope.element,
            scope.instruction.anchor_is_container,
            scope.binding_context.clone(),
            self.animator(),
            self.task_queue(),
        );
        if let Some(children) = scope.children.upgrade() {
            children.borrow_mut().push(ViewNode::Slot(slot.clone()));
        }
        *scope.view_slot.borrow_mut() = Rc::downgrade(&slot);
        Some(slot)
    }

    /// Factory for the lifted template of a template controller, honoring
    /// part replacements supplied by the consumer
    pub fn bound_view_factory(self: &Rc<Self>) -> Option<Rc<BoundViewFactory>> {
        let owner = self.nearest_scope()?;
        let scope = owner.element.as_ref()?;

        let mut factory = scope.instruction.view_factory.clone()?;

        if let (Some(replacements), Some(part)) = (&scope.part_replacements, factory.part()) {
            if let Some(replacement) = replacements.get(&part) {
                factory = replacement.clone().into();
            }
        }

        Some(Rc::new(BoundViewFactory::new(
            owner.clone(),
            factory,
            scope.binding_context.clone(),
            scope.part_replacements.clone(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ObjectContext;

    trait Greeter {
        fn greet(&self) -> String;
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    #[test]
    fn test_instances_resolve_through_parents() {
        let root = Container::new();
        root.register_instance::<dyn Greeter>(Rc::new(English));
        let child = root.create_child();

        assert_eq!(child.get::<dyn Greeter>().unwrap().greet(), "hello");
        assert!(child.has::<dyn Greeter>(true));
        assert!(!child.has::<dyn Greeter>(false));
    }

    #[test]
    fn test_provider_memoizes_model() {
        let root = Container::new();
        let child = root.create_child();
        let id = root.next_provider_id();
        child.register_provider(id);

        let first = child.get_or_create_model(id, || ObjectContext::empty() as BindingContext);
        let second = child.get_or_create_model(id, || ObjectContext::empty() as BindingContext);
        assert!(crate::context::same_context(&first, &second));
        assert!(root.resolve_model(id).is_none());
    }

    #[test]
    fn test_shared_task_queue() {
        let root = Container::new();
        let child = root.create_child();
        assert!(Rc::ptr_eq(&root.task_queue(), &child.task_queue()));
    }
}
