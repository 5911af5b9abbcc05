//! HTML Behaviors
//!
//! Custom elements and custom attributes. A `BehaviorBuilder` collects the
//! declaration (names, bindable properties, content handling); `initialize`
//! binds it to a `ModelType` and freezes the property table; `compile` and
//! `create` are called by the compiler and view factory for every use in
//! markup.

pub mod children;
pub mod controller;
pub mod property;

use std::cell::RefCell;
use std::rc::Rc;

use bitflags::bitflags;
use indexmap::IndexMap;
use once_cell::unsync::OnceCell;
use smol::future::BoxedLocal;

use crate::binding::{Binding, BindingMode};
use crate::container::{Container, ProviderId};
use crate::content_selector::ContentSelector;
use crate::context::BindingContext;
use crate::dom::{Document, NodeId};
use crate::error::{Result, TemplatingError};
use crate::instructions::{BehaviorInstruction, ViewCompileInstruction, ViewCreateInstruction};
use crate::loader::ResourceLoadContext;
use crate::resources::{Resource, ViewResources};
use crate::task_queue::TaskQueue;
use crate::util::hyphenate;
use crate::view_compiler::{TemplateSource, ViewCompiler};
use crate::view_engine::ViewEngine;
use crate::view_factory::ViewFactoryRef;
use crate::view_strategy::ViewStrategy;

use self::children::{ChildObserver, CompiledChildObserver};
use self::controller::Controller;
use self::property::{BindableProperty, PropertyBag};

bitflags! {
    /// Callbacks a model actually implements; the rest are never invoked
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Capabilities: u16 {
        const CREATED = 1 << 0;
        const BIND = 1 << 1;
        const UNBIND = 1 << 2;
        const ATTACHED = 1 << 3;
        const DETACHED = 1 << 4;
        const PROPERTY_CHANGED = 1 << 5;
        const ACTIVATE = 1 << 6;
        const VIEW_STRATEGY = 1 << 7;
    }
}

pub type ModelFactory = Rc<dyn Fn(&Rc<Container>) -> BindingContext>;

/// Describes a view model type: how to construct it and which callbacks
/// and change handlers it provides
#[derive(Clone)]
pub struct ModelType {
    name: String,
    module_id: Option<String>,
    capabilities: Capabilities,
    change_handlers: Vec<String>,
    view_strategy: Option<ViewStrategy>,
    factory: ModelFactory,
}

impl ModelType {
    pub fn new(name: &str, factory: impl Fn(&Rc<Container>) -> BindingContext + 'static) -> Self {
        ModelType {
            name: name.to_string(),
            module_id: None,
            capabilities: Capabilities::empty(),
            change_handlers: Vec::new(),
            view_strategy: None,
            factory: Rc::new(factory),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities |= capabilities;
        self
    }

    /// Declare a named change handler, e.g. `valueChanged`
    pub fn with_change_handler(mut self, handler: &str) -> Self {
        self.change_handlers.push(handler.to_string());
        self
    }

    pub fn with_module_id(mut self, module_id: &str) -> Self {
        self.module_id = Some(module_id.to_string());
        self
    }

    pub fn with_view_strategy(mut self, strategy: ViewStrategy) -> Self {
        self.view_strategy = Some(strategy);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module_id(&self) -> Option<&str> {
        self.module_id.as_deref()
    }

    pub(crate) fn set_module_id(&mut self, module_id: &str) {
        self.module_id = Some(module_id.to_string());
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn view_strategy(&self) -> Option<&ViewStrategy> {
        self.view_strategy.as_ref()
    }

    pub fn declares(&self, handler: &str) -> bool {
        self.change_handlers.iter().any(|h| h == handler)
    }

    pub fn create(&self, container: &Rc<Container>) -> BindingContext {
        (self.factory)(container)
    }
}

/// Decides whether a custom element's content is compiled for projection
pub type ContentProcessor =
    Rc<dyn Fn(&ViewCompiler, &Rc<ViewResources>, NodeId, &mut BehaviorInstruction) -> bool>;

/// Declaration of a custom element or attribute before it is registered
#[derive(Clone, Default)]
pub struct BehaviorBuilder {
    element_name: Option<String>,
    attribute_name: Option<String>,
    attribute_default_binding_mode: Option<BindingMode>,
    lifts_content: bool,
    target_shadow_dom: bool,
    containerless: bool,
    has_dynamic_options: bool,
    process_content: Option<ContentProcessor>,
    properties: Vec<BindableProperty>,
    child_observers: Vec<ChildObserver>,
}

impl BehaviorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `FooCustomElement` and `FooCustomAttribute` export names
    pub fn convention(key: &str) -> Option<Self> {
        let mut builder = Self::new();
        builder.apply_convention(key).then_some(builder)
    }

    pub(crate) fn apply_convention(&mut self, key: &str) -> bool {
        if let Some(name) = key.strip_suffix("CustomAttribute") {
            self.attribute_name = Some(hyphenate(name));
            return true;
        }
        if let Some(name) = key.strip_suffix("CustomElement") {
            self.element_name = Some(hyphenate(name));
            return true;
        }
        false
    }

    pub fn element(mut self, name: &str) -> Self {
        self.element_name = Some(name.to_string());
        self
    }

    pub fn attribute(mut self, name: &str) -> Self {
        self.attribute_name = Some(name.to_string());
        self
    }

    /// Attribute that lifts its element into a template it controls
    pub fn template_controller(mut self) -> Self {
        self.lifts_content = true;
        self
    }

    pub fn containerless(mut self) -> Self {
        self.containerless = true;
        self
    }

    /// Leave `<content>` elements of the view uncompiled
    pub fn use_shadow_dom(mut self) -> Self {
        self.target_shadow_dom = true;
        self
    }

    pub fn dynamic_options(mut self) -> Self {
        self.has_dynamic_options = true;
        self
    }

    pub fn bindable(mut self, property: BindableProperty) -> Self {
        self.properties.push(property);
        self
    }

    /// Collect the host's descendants matching `selector` into `name` on bind
    pub fn children(mut self, observer: ChildObserver) -> Self {
        self.child_observers.push(observer);
        self
    }

    pub fn default_binding_mode(mut self, mode: BindingMode) -> Self {
        self.attribute_default_binding_mode = Some(mode);
        self
    }

    pub fn no_content_processing(self) -> Self {
        self.process_content(|_, _, _, _| false)
    }

    pub fn process_content(
        mut self,
        processor: impl Fn(&ViewCompiler, &Rc<ViewResources>, NodeId, &mut BehaviorInstruction) -> bool + 'static,
    ) -> Self {
        self.process_content = Some(Rc::new(processor));
        self
    }

    pub fn element_name(&self) -> Option<&str> {
        self.element_name.as_deref()
    }

    pub fn attribute_name(&self) -> Option<&str> {
        self.attribute_name.as_deref()
    }

    pub(crate) fn is_unnamed(&self) -> bool {
        self.element_name.is_none() && self.attribute_name.is_none()
    }

    pub fn into_resource(self) -> Result<Rc<HtmlBehaviorResource>> {
        if let Some(name) = &self.element_name {
            validate_name(name, "custom element")?;
        }
        if let Some(name) = &self.attribute_name {
            validate_name(name, "custom attribute")?;
        }
        let child_observers = self
            .child_observers
            .iter()
            .map(ChildObserver::compile)
            .collect::<Result<Vec<_>>>()?;

        Ok(Rc::new(HtmlBehaviorResource {
            element_name: self.element_name,
            attribute_name: self.attribute_name,
            attribute_default_binding_mode: self.attribute_default_binding_mode,
            lifts_content: self.lifts_content,
            target_shadow_dom: self.target_shadow_dom,
            containerless: self.containerless,
            has_dynamic_options: self.has_dynamic_options,
            process_content: self.process_content,
            declared: self.properties,
            child_observers,
            state: OnceCell::new(),
            view_strategy: RefCell::new(None),
            view_factory: RefCell::new(None),
        }))
    }

    /// Create the resource and initialize it for `model`
    pub fn build(self, container: &Rc<Container>, model: ModelType) -> Result<Rc<HtmlBehaviorResource>> {
        let resource = self.into_resource()?;
        resource.initialize(container, model)?;
        Ok(resource)
    }
}

fn validate_name(name: &str, kind: &'static str) -> Result<()> {
    if name.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(TemplatingError::InvalidBehaviorName {
            name: name.to_string(),
            kind,
        });
    }
    Ok(())
}

/// Fixed once a behavior is initialized
pub(crate) struct BehaviorState {
    pub model: ModelType,
    pub provider_id: ProviderId,
    pub task_queue: Rc<TaskQueue>,
    pub properties: Vec<Rc<BindableProperty>>,
    pub attributes: IndexMap<String, Rc<BindableProperty>>,
}

pub struct HtmlBehaviorResource {
    element_name: Option<String>,
    attribute_name: Option<String>,
    attribute_default_binding_mode: Option<BindingMode>,
    lifts_content: bool,
    target_shadow_dom: bool,
    containerless: bool,
    has_dynamic_options: bool,
    process_content: Option<ContentProcessor>,
    declared: Vec<BindableProperty>,
    child_observers: Vec<CompiledChildObserver>,
    state: OnceCell<BehaviorState>,
    view_strategy: RefCell<Option<ViewStrategy>>,
    view_factory: RefCell<Option<ViewFactoryRef>>,
}

impl HtmlBehaviorResource {
    /// Build the property table for `model`. Later calls are ignored.
    pub fn initialize(&self, container: &Rc<Container>, model: ModelType) -> Result<()> {
        if self.state.get().is_some() {
            return Ok(());
        }

        let mut properties = self.declared.clone();

        if let Some(attribute_name) = &self.attribute_name {
            let value_property = || {
                let mut property = BindableProperty::new("value")
                    .with_attribute(attribute_name)
                    .with_default_binding_mode(self.attribute_default_binding_mode.unwrap_or_default());
                property.define_on(&model);
                property
            };

            if properties.is_empty() {
                properties.push(value_property());
            }

            if properties.len() == 1 && properties[0].name == "value" {
                let single = &mut properties[0];
                single.is_dynamic = self.has_dynamic_options;
                single.has_options = self.has_dynamic_options;
                single.define_on(&model);
            } else {
                for property in &mut properties {
                    property.define_on(&model);
                }
                let mut options = value_property();
                options.has_options = true;
                properties.push(options);
            }
        } else {
            for property in &mut properties {
                property.define_on(&model);
            }
        }

        let properties: Vec<Rc<BindableProperty>> = properties.into_iter().map(Rc::new).collect();
        let attributes = properties
            .iter()
            .map(|property| (property.attribute.clone(), property.clone()))
            .collect();

        let state = BehaviorState {
            model,
            provider_id: container.next_provider_id(),
            task_queue: container.task_queue(),
            properties,
            attributes,
        };
        let _ = self.state.set(state);
        Ok(())
    }

    pub(crate) fn state(&self) -> Result<&BehaviorState> {
        self.state.get().ok_or_else(|| {
            TemplatingError::UninitializedBehavior(self.html_name().unwrap_or_default().to_string())
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.state.get().is_some()
    }

    pub fn element_name(&self) -> Option<&str> {
        self.element_name.as_deref()
    }

    pub fn attribute_name(&self) -> Option<&str> {
        self.attribute_name.as_deref()
    }

    pub fn html_name(&self) -> Option<&str> {
        self.element_name().or_else(|| self.attribute_name())
    }

    pub fn lifts_content(&self) -> bool {
        self.lifts_content
    }

    pub fn containerless(&self) -> bool {
        self.containerless
    }

    pub fn target_shadow_dom(&self) -> bool {
        self.target_shadow_dom
    }

    pub fn model_type(&self) -> Option<&ModelType> {
        self.state.get().map(|state| &state.model)
    }

    /// Zero until initialized
    pub fn provider_id(&self) -> ProviderId {
        self.state
            .get()
            .map(|state| state.provider_id)
            .unwrap_or(ProviderId(0))
    }

    pub fn properties(&self) -> Vec<Rc<BindableProperty>> {
        self.state
            .get()
            .map(|state| state.properties.clone())
            .unwrap_or_default()
    }

    /// Property set from `attribute`, if initialized and declared
    pub fn property_for_attribute(&self, attribute: &str) -> Option<Rc<BindableProperty>> {
        self.state.get()?.attributes.get(attribute).cloned()
    }

    pub fn view_factory(&self) -> Option<ViewFactoryRef> {
        self.view_factory.borrow().clone()
    }

    pub fn set_view_factory(&self, factory: Option<ViewFactoryRef>) {
        *self.view_factory.borrow_mut() = factory;
    }

    pub fn set_view_strategy(&self, strategy: Option<ViewStrategy>) {
        *self.view_strategy.borrow_mut() = strategy;
    }

    /// Observers backing the model's bindable properties, created on first use
    pub(crate) fn ensure_properties_defined(&self, model: &BindingContext) -> Result<PropertyBag> {
        if let Some(properties) = model.property_bag() {
            return Ok(properties);
        }

        let state = self.state()?;
        let properties = PropertyBag::new();
        for property in &state.properties {
            if let Some(observer) = property.create_observer(model, &state.model, &state.task_queue)? {
                properties.insert(observer);
            }
        }
        model.define_properties(properties.clone());
        Ok(properties)
    }

    // ===== Loading =====

    /// Load the element's view through its view strategy. Attributes have
    /// no view. A transient load leaves an existing factory in place.
    pub fn load(
        self: Rc<Self>,
        engine: Rc<ViewEngine>,
        strategy: Option<ViewStrategy>,
        transient: bool,
        load_context: Option<Rc<ResourceLoadContext>>,
    ) -> BoxedLocal<Result<Option<ViewFactoryRef>>> {
        Box::pin(async move {
            if self.element_name.is_none() {
                return Ok(None);
            }

            let state = self.state()?;
            let explicit = strategy.or_else(|| self.view_strategy.borrow().clone());
            let strategy = match explicit {
                Some(strategy) => strategy,
                None => ViewStrategy::get_default(&state.model)?,
            };
            let strategy = match state.model.module_id() {
                Some(module_id) => strategy.with_module_id(module_id),
                None => strategy,
            };

            let instruction =
                ViewCompileInstruction::new(self.target_shadow_dom, engine.config().compile_surrogates);
            let factory = strategy
                .load_view_factory(engine.clone(), instruction, load_context)
                .await?;

            if !transient || self.view_factory.borrow().is_none() {
                self.set_view_factory(factory.clone());
            }
            Ok(factory)
        })
    }

    // ===== Compilation =====

    /// Called by the compiler for each use. Template controllers lift their
    /// element into a new factory and return the `<template>` left in its
    /// place; elements compile their content for projection.
    pub fn compile(
        &self,
        compiler: &ViewCompiler,
        resources: &Rc<ViewResources>,
        node: NodeId,
        instruction: &mut BehaviorInstruction,
    ) -> Result<NodeId> {
        let document = compiler.document();

        if self.lifts_content {
            if instruction.view_factory.is_some() {
                return Ok(node);
            }

            let template = document.create_element("template");
            let fragment = document.create_fragment();
            let cache_size = document.get_attribute(node, "view-cache");
            let part = document.get_attribute(node, "part");

            if let Some(attribute) = &instruction.original_attr_name {
                document.remove_attribute(node, attribute);
            }
            if part.is_some() {
                document.remove_attribute(node, "part");
            }
            if cache_size.is_some() {
                document.remove_attribute(node, "view-cache");
            }

            document.replace_node(template, node);
            document.append_child(fragment, node);
            let factory = compiler.compile(
                TemplateSource::Node(fragment),
                Some(resources),
                &ViewCompileInstruction::default(),
            )?;

            factory.set_part(part);
            if let Some(size) = cache_size {
                factory.set_cache_size(Some(size.parse()?), false);
            }

            instruction.view_factory = Some(factory.into());
            return Ok(template);
        }

        if self.element_name.is_none() {
            return Ok(node);
        }

        let mut part_replacements = IndexMap::new();
        let process = match &self.process_content {
            Some(processor) => processor(compiler, resources, node, instruction),
            None => true,
        };

        if process && document.has_child_nodes(node) {
            let fragment = document.create_fragment();
            for child in document.child_nodes(node) {
                let replaced_part = document
                    .is_element_named(child, "template")
                    .then(|| document.get_attribute(child, "replace-part"))
                    .flatten();

                match replaced_part {
                    Some(part) => {
                        let factory = compiler.compile(
                            TemplateSource::Node(child),
                            Some(resources),
                            &ViewCompileInstruction::default(),
                        )?;
                        part_replacements.insert(part, factory);
                        document.remove(child);
                    }
                    None => document.append_child(fragment, child),
                }
            }

            instruction.content_factory = Some(compiler.compile(
                TemplateSource::Node(fragment),
                Some(resources),
                &ViewCompileInstruction::default(),
            )?);
        }

        instruction.skip_content_processing = true;
        instruction.part_replacements = Some(Rc::new(part_replacements));
        Ok(node)
    }

    // ===== Instantiation =====

    /// Create the model and controller for one use. Elements also create
    /// their view, distribute projected content into it, and put its nodes
    /// into (or, containerless, before) the element.
    pub fn create(
        self: &Rc<Self>,
        container: &Rc<Container>,
        instruction: &BehaviorInstruction,
        element: Option<NodeId>,
    ) -> Result<Rc<Controller>> {
        let state = self.state()?;
        let model = match &instruction.binding_context {
            Some(context) => context.clone(),
            None => container.get_or_create_model(state.provider_id, || state.model.create(container)),
        };

        let controller = Controller::new(self.clone(), model.clone(), instruction)?;
        let mut view_factory = None;
        let child_bindings = |target: NodeId, document: Document| -> Vec<Rc<dyn Binding>> {
            self.child_observers
                .iter()
                .map(|observer| observer.create(container, document.clone(), target, &model, &state.model))
                .collect()
        };

        if !self.lifts_content && self.element_name.is_some() {
            view_factory = instruction.view_factory.clone().or_else(|| self.view_factory());
            container.set_view_model(model.clone());

            if let Some(factory) = &view_factory {
                let view = factory.create(
                    container,
                    Some(&model),
                    &instruction.create_instruction(),
                    element.map(|element| container.surrogate_host(element)),
                )?;
                controller.set_view(view);
            }

            match (element, controller.view()) {
                (Some(element), Some(view)) => {
                    container.register_controller(element, &controller);
                    if let Some(content_factory) = &instruction.content_factory {
                        let content_view = content_factory.create(
                            container,
                            None,
                            &ViewCreateInstruction::content_selector(),
                            None,
                        )?;
                        ContentSelector::apply_selectors(
                            &content_view,
                            view.content_selectors(),
                            |selector, group| selector.add(group),
                        );
                        controller.set_content_view(content_view);
                    }

                    if instruction.anchor_is_container {
                        for binding in child_bindings(element, view.document().clone()) {
                            view.add_binding(binding);
                        }
                        view.append_nodes_to(element);
                    } else {
                        view.insert_nodes_before(element);
                    }
                }
                (Some(element), None) => {
                    container.register_controller(element, &controller);
                    if let Some(document) = container.document() {
                        controller.add_child_bindings(child_bindings(element, document));
                    }
                }
                (None, Some(view)) => {
                    view.set_owner(&controller);
                    if let Some(host) = instruction.host {
                        for binding in child_bindings(host, view.document().clone()) {
                            view.add_binding(binding);
                        }
                    }
                }
                (None, None) => {
                    if let (Some(host), Some(document)) = (instruction.host, container.document()) {
                        controller.add_child_bindings(child_bindings(host, document));
                    }
                }
            }
        } else if !self.lifts_content {
            if let (Some(element), Some(document)) = (element, container.document()) {
                controller.add_child_bindings(child_bindings(element, document));
            }
        }

        if instruction.initiated_by_behavior && view_factory.is_some() {
            if let Some(view) = controller.view() {
                view.created();
            }
        }

        Ok(controller)
    }
}

impl Resource for HtmlBehaviorResource {
    fn register(self: Rc<Self>, registry: &ViewResources, name: Option<&str>) -> Result<()> {
        if let Some(attribute) = &self.attribute_name {
            registry.register_attribute(name.unwrap_or(attribute), self.clone(), attribute)?;
        }
        if let Some(element) = &self.element_name {
            registry.register_element(name.unwrap_or(element), self.clone())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ObjectContext;

    fn model(name: &str) -> ModelType {
        ModelType::new(name, |_| ObjectContext::empty() as BindingContext)
    }

    #[test]
    fn test_convention_names() {
        let element = BehaviorBuilder::convention("UserPanelCustomElement").unwrap();
        assert_eq!(element.element_name(), Some("user-panel"));

        let attribute = BehaviorBuilder::convention("TooltipCustomAttribute").unwrap();
        assert_eq!(attribute.attribute_name(), Some("tooltip"));

        assert!(BehaviorBuilder::convention("UserPanel").is_none());
    }

    #[test]
    fn test_upper_case_names_rejected() {
        let err = BehaviorBuilder::new().element("myPanel").into_resource().err().unwrap();
        assert!(matches!(err, TemplatingError::InvalidBehaviorName { .. }));
    }

    #[test]
    fn test_attribute_gets_implicit_value_property() {
        let container = Container::new();
        let behavior = BehaviorBuilder::new()
            .attribute("tooltip")
            .build(&container, model("Tooltip").with_change_handler("valueChanged"))
            .unwrap();

        let properties = behavior.properties();
        assert_eq!(properties.len(), 1);
        assert_eq!(properties[0].name, "value");
        assert_eq!(properties[0].attribute, "tooltip");
        assert_eq!(properties[0].change_handler.as_deref(), Some("valueChanged"));
        assert!(behavior.property_for_attribute("tooltip").is_some());
    }

    #[test]
    fn test_attribute_with_declared_properties_uses_options() {
        let container = Container::new();
        let behavior = BehaviorBuilder::new()
            .attribute("pager")
            .bindable(BindableProperty::new("pageSize"))
            .bindable(BindableProperty::new("current"))
            .build(&container, model("Pager"))
            .unwrap();

        let options = behavior.property_for_attribute("pager").unwrap();
        assert!(options.has_options());
        assert!(behavior.property_for_attribute("page-size").is_some());
        assert_eq!(behavior.properties().len(), 3);
    }

    #[test]
    fn test_dynamic_options() {
        let container = Container::new();
        let behavior = BehaviorBuilder::new()
            .attribute("style-map")
            .dynamic_options()
            .build(&container, model("StyleMap"))
            .unwrap();
        let value = behavior.property_for_attribute("style-map").unwrap();
        assert!(value.is_dynamic() && value.has_options());
    }

    #[test]
    fn test_provider_ids_are_unique() {
        let container = Container::new();
        let a = BehaviorBuilder::new().element("a-el").build(&container, model("A")).unwrap();
        let b = BehaviorBuilder::new().element("b-el").build(&container, model("B")).unwrap();
        assert_ne!(a.provider_id(), b.provider_id());
        assert!(a.is_initialized());
    }

    #[test]
    fn test_register_under_alias() {
        let container = Container::new();
        let behavior = BehaviorBuilder::new()
            .attribute("tooltip")
            .build(&container, model("Tooltip"))
            .unwrap();
        let resources = ViewResources::new(None, None);
        behavior.register(&resources, Some("tip")).unwrap();

        assert!(resources.get_attribute("tip").is_some());
        assert_eq!(resources.map_attribute("tip").as_deref(), Some("tooltip"));
    }
}
