//! View Resources
//!
//! Hierarchical registry of elements, attributes, value converters and
//! compile/create hooks visible to a template. Lookups fall back to the
//! parent registry; registrations only ever touch the local tables.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::behavior::HtmlBehaviorResource;
use crate::binding::{BindingLanguage, ValueConverter};
use crate::container::Container;
use crate::context::BindingContext;
use crate::dom::NodeId;
use crate::error::{ResourceKind, Result, TemplatingError};
use crate::instructions::{ViewCompileInstruction, ViewCreateInstruction};
use crate::util::relative_to_file;
use crate::view::View;
use crate::view_factory::ViewFactory;

/// Callbacks around compilation and view creation. Unimplemented phases are skipped.
pub trait ViewEngineHooks {
    fn before_compile(
        &self,
        _content: NodeId,
        _resources: &Rc<ViewResources>,
        _instruction: &ViewCompileInstruction,
    ) {
    }

    fn after_compile(&self, _factory: &Rc<ViewFactory>) {}

    fn before_create(
        &self,
        _factory: &Rc<ViewFactory>,
        _container: &Rc<Container>,
        _content: NodeId,
        _instruction: &ViewCreateInstruction,
        _binding_context: Option<&BindingContext>,
    ) {
    }

    fn after_create(&self, _view: &Rc<View>) {}

    /// Which phases this hook takes part in
    fn phases(&self) -> HookPhases {
        HookPhases::all()
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HookPhases: u8 {
        const BEFORE_COMPILE = 1 << 0;
        const AFTER_COMPILE = 1 << 1;
        const BEFORE_CREATE = 1 << 2;
        const AFTER_CREATE = 1 << 3;
    }
}

/// Per-phase hook lists. The first three are held inline; the rest spill over.
#[derive(Default)]
struct HookSlots {
    hook1: Option<Rc<dyn ViewEngineHooks>>,
    hook2: Option<Rc<dyn ViewEngineHooks>>,
    hook3: Option<Rc<dyn ViewEngineHooks>>,
    additional: Vec<Rc<dyn ViewEngineHooks>>,
}

impl HookSlots {
    fn push(&mut self, hook: Rc<dyn ViewEngineHooks>) {
        if self.hook1.is_none() {
            self.hook1 = Some(hook);
        } else if self.hook2.is_none() {
            self.hook2 = Some(hook);
        } else if self.hook3.is_none() {
            self.hook3 = Some(hook);
        } else {
            self.additional.push(hook);
        }
    }

    fn is_empty(&self) -> bool {
        self.hook1.is_none()
    }

    fn snapshot(&self) -> Vec<Rc<dyn ViewEngineHooks>> {
        self.hook1
            .iter()
            .chain(self.hook2.iter())
            .chain(self.hook3.iter())
            .chain(self.additional.iter())
            .cloned()
            .collect()
    }
}

#[derive(Default)]
struct Hooks {
    before_compile: HookSlots,
    after_compile: HookSlots,
    before_create: HookSlots,
    after_create: HookSlots,
}

/// Something that can be registered into a `ViewResources` under a name
pub trait Resource {
    fn register(self: Rc<Self>, registry: &ViewResources, name: Option<&str>) -> Result<()>;
}

pub struct ValueConverterResource {
    name: String,
    converter: Rc<dyn ValueConverter>,
}

impl ValueConverterResource {
    pub fn new(name: &str, converter: Rc<dyn ValueConverter>) -> Rc<Self> {
        Rc::new(ValueConverterResource {
            name: name.to_string(),
            converter,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `DateFormatValueConverter` -> `dateFormat`
    pub fn convention(key: &str) -> Option<String> {
        key.strip_suffix("ValueConverter")
            .filter(|base| !base.is_empty())
            .map(crate::util::camel_case)
    }
}

impl Resource for ValueConverterResource {
    fn register(self: Rc<Self>, registry: &ViewResources, name: Option<&str>) -> Result<()> {
        registry.register_value_converter(name.unwrap_or(&self.name), self.converter.clone())
    }
}

pub struct ViewResources {
    parent: RefCell<Option<Rc<ViewResources>>>,
    view_url: Option<String>,
    elements: RefCell<IndexMap<String, Rc<HtmlBehaviorResource>>>,
    attributes: RefCell<IndexMap<String, Rc<HtmlBehaviorResource>>>,
    attribute_map: RefCell<IndexMap<String, String>>,
    value_converters: RefCell<IndexMap<String, Rc<dyn ValueConverter>>>,
    binding_language: RefCell<Option<Rc<dyn BindingLanguage>>>,
    hooks: RefCell<Hooks>,
}

impl ViewResources {
    pub fn new(parent: Option<&Rc<ViewResources>>, view_url: Option<&str>) -> Rc<Self> {
        Rc::new(ViewResources {
            parent: RefCell::new(parent.cloned()),
            view_url: view_url.map(str::to_string),
            elements: RefCell::new(IndexMap::new()),
            attributes: RefCell::new(IndexMap::new()),
            attribute_map: RefCell::new(IndexMap::new()),
            value_converters: RefCell::new(IndexMap::new()),
            binding_language: RefCell::new(None),
            hooks: RefCell::new(Hooks::default()),
        })
    }

    pub fn parent(&self) -> Option<Rc<ViewResources>> {
        self.parent.borrow().clone()
    }

    pub fn view_url(&self) -> Option<&str> {
        self.view_url.as_deref()
    }

    /// Splice this registry in as the parent of `new_parent`'s chain
    pub fn patch_in_parent(&self, new_parent: &Rc<ViewResources>) {
        let original = self.parent.replace(Some(new_parent.clone()));
        if new_parent.parent.borrow().is_none() {
            *new_parent.parent.borrow_mut() = original;
        }
    }

    pub fn relative_to_view(&self, path: &str) -> String {
        relative_to_file(path, self.view_url.as_deref().unwrap_or(""))
    }

    // ===== Binding language =====

    /// The configured language, or `fallback` which is then remembered here
    pub fn binding_language(&self, fallback: &Rc<dyn BindingLanguage>) -> Rc<dyn BindingLanguage> {
        self.binding_language
            .borrow_mut()
            .get_or_insert_with(|| fallback.clone())
            .clone()
    }

    pub fn set_binding_language(&self, language: Rc<dyn BindingLanguage>) {
        *self.binding_language.borrow_mut() = Some(language);
    }

    // ===== Hooks =====

    pub fn register_view_engine_hooks(&self, hooks: Rc<dyn ViewEngineHooks>) {
        let phases = hooks.phases();
        let mut slots = self.hooks.borrow_mut();
        if phases.contains(HookPhases::BEFORE_COMPILE) {
            slots.before_compile.push(hooks.clone());
        }
        if phases.contains(HookPhases::AFTER_COMPILE) {
            slots.after_compile.push(hooks.clone());
        }
        if phases.contains(HookPhases::BEFORE_CREATE) {
            slots.before_create.push(hooks.clone());
        }
        if phases.contains(HookPhases::AFTER_CREATE) {
            slots.after_create.push(hooks);
        }
    }

    /// Hooks for a phase, parents first
    fn hooks_for(&self, pick: fn(&Hooks) -> &HookSlots) -> Vec<Rc<dyn ViewEngineHooks>> {
        let mut out = self
            .parent()
            .map(|parent| parent.hooks_for(pick))
            .unwrap_or_default();
        let hooks = self.hooks.borrow();
        let slots = pick(&hooks);
        if !slots.is_empty() {
            out.extend(slots.snapshot());
        }
        out
    }

    pub fn on_before_compile(
        self: &Rc<Self>,
        content: NodeId,
        instruction: &ViewCompileInstruction,
    ) {
        for hook in self.hooks_for(|h| &h.before_compile) {
            hook.before_compile(content, self, instruction);
        }
    }

    pub fn on_after_compile(&self, factory: &Rc<ViewFactory>) {
        for hook in self.hooks_for(|h| &h.after_compile) {
            hook.after_compile(factory);
        }
    }

    pub fn on_before_create(
        &self,
        factory: &Rc<ViewFactory>,
        container: &Rc<Container>,
        content: NodeId,
        instruction: &ViewCreateInstruction,
        binding_context: Option<&BindingContext>,
    ) {
        for hook in self.hooks_for(|h| &h.before_create) {
            hook.before_create(factory, container, content, instruction, binding_context);
        }
    }

    pub fn on_after_create(&self, view: &Rc<View>) {
        for hook in self.hooks_for(|h| &h.after_create) {
            hook.after_create(view);
        }
    }

    // ===== Registration =====

    pub fn register_element(&self, tag_name: &str, behavior: Rc<HtmlBehaviorResource>) -> Result<()> {
        register(&self.elements, tag_name, behavior, ResourceKind::Element)
    }

    pub fn register_attribute(
        &self,
        attribute: &str,
        behavior: Rc<HtmlBehaviorResource>,
        known_attribute: &str,
    ) -> Result<()> {
        self.attribute_map
            .borrow_mut()
            .insert(attribute.to_string(), known_attribute.to_string());
        register(&self.attributes, attribute, behavior, ResourceKind::Attribute)
    }

    pub fn register_value_converter(&self, name: &str, converter: Rc<dyn ValueConverter>) -> Result<()> {
        register(
            &self.value_converters,
            name,
            converter,
            ResourceKind::ValueConverter,
        )
    }

    // ===== Lookup =====

    pub fn get_element(&self, tag_name: &str) -> Option<Rc<HtmlBehaviorResource>> {
        self.elements
            .borrow()
            .get(tag_name)
            .cloned()
            .or_else(|| self.parent().and_then(|p| p.get_element(tag_name)))
    }

    pub fn get_attribute(&self, attribute: &str) -> Option<Rc<HtmlBehaviorResource>> {
        self.attributes
            .borrow()
            .get(attribute)
            .cloned()
            .or_else(|| self.parent().and_then(|p| p.get_attribute(attribute)))
    }

    /// Property-facing name an attribute was registered under
    pub fn map_attribute(&self, attribute: &str) -> Option<String> {
        self.attribute_map
            .borrow()
            .get(attribute)
            .cloned()
            .or_else(|| self.parent().and_then(|p| p.map_attribute(attribute)))
    }

    pub fn get_value_converter(&self, name: &str) -> Option<Rc<dyn ValueConverter>> {
        self.value_converters
            .borrow()
            .get(name)
            .cloned()
            .or_else(|| self.parent().and_then(|p| p.get_value_converter(name)))
    }
}

fn register<T: ?Sized>(
    table: &RefCell<IndexMap<String, Rc<T>>>,
    name: &str,
    item: Rc<T>,
    kind: ResourceKind,
) -> Result<()> {
    let mut table = table.borrow_mut();
    if let Some(existing) = table.get(name) {
        if Rc::ptr_eq(existing, &item) {
            return Ok(());
        }
        return Err(TemplatingError::DuplicateResource {
            kind,
            name: name.to_string(),
        });
    }
    table.insert(name.to_string(), item);
    Ok(())
}
