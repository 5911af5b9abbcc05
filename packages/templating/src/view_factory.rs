//! View Factory
//!
//! Instantiates a compiled template. Each `create` clones the template
//! (or adopts it in place when enhancing), replays the target instructions
//! recorded by the compiler against the marked nodes of the clone, and
//! assembles the resulting `View`. Retired views can be pooled and reused
//! without replaying instructions.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::behavior::controller::Controller;
use crate::binding::{Binding, BindingTarget};
use crate::container::{Container, ElementScope};
use crate::content_selector::ContentSelector;
use crate::context::BindingContext;
use crate::dom::{Document, NodeId};
use crate::error::{Result, TemplatingError};
use crate::instructions::{InjectorId, PartReplacements, TargetInstruction, ViewCreateInstruction};
use crate::resources::ViewResources;
use crate::view::{View, ViewNode};

/// Class and attribute the compiler puts on every instruction target
pub const TARGET_CLASS: &str = "au-target";
pub const TARGET_ID_ATTRIBUTE: &str = "au-target-id";

/// Capacity of a factory's view pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawCacheSize", into = "RawCacheSize")]
pub enum CacheSize {
    /// `*`
    Unbounded,
    Bounded(usize),
}

impl CacheSize {
    fn capacity(self) -> usize {
        match self {
            CacheSize::Unbounded => usize::MAX,
            CacheSize::Bounded(size) => size,
        }
    }
}

impl FromStr for CacheSize {
    type Err = TemplatingError;

    fn from_str(value: &str) -> Result<Self> {
        let value = value.trim();
        if value == "*" {
            return Ok(CacheSize::Unbounded);
        }
        value
            .parse::<usize>()
            .map(CacheSize::Bounded)
            .map_err(|_| TemplatingError::InvalidCacheSize(value.to_string()))
    }
}

impl fmt::Display for CacheSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheSize::Unbounded => write!(f, "*"),
            CacheSize::Bounded(size) => write!(f, "{}", size),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawCacheSize {
    Count(usize),
    Text(String),
}

impl TryFrom<RawCacheSize> for CacheSize {
    type Error = TemplatingError;

    fn try_from(raw: RawCacheSize) -> Result<Self> {
        match raw {
            RawCacheSize::Count(size) => Ok(CacheSize::Bounded(size)),
            RawCacheSize::Text(text) => text.parse(),
        }
    }
}

impl From<CacheSize> for RawCacheSize {
    fn from(size: CacheSize) -> Self {
        match size {
            CacheSize::Unbounded => RawCacheSize::Text("*".to_string()),
            CacheSize::Bounded(size) => RawCacheSize::Count(size),
        }
    }
}

pub struct ViewFactory {
    document: Document,
    template: NodeId,
    instructions: IndexMap<u32, Rc<TargetInstruction>>,
    resources: Rc<ViewResources>,
    surrogate_instruction: Option<Rc<TargetInstruction>>,
    part: RefCell<Option<String>>,
    /// `None` until a size is configured
    cache_size: Cell<Option<usize>>,
    cache: RefCell<Option<Vec<Rc<View>>>>,
}

impl ViewFactory {
    pub fn new(
        document: Document,
        template: NodeId,
        instructions: IndexMap<u32, Rc<TargetInstruction>>,
        resources: Rc<ViewResources>,
        surrogate_instruction: Option<Rc<TargetInstruction>>,
    ) -> Rc<Self> {
        Rc::new(ViewFactory {
            document,
            template,
            instructions,
            resources,
            surrogate_instruction,
            part: RefCell::new(None),
            cache_size: Cell::new(None),
            cache: RefCell::new(None),
        })
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn template(&self) -> NodeId {
        self.template
    }

    pub fn instructions(&self) -> &IndexMap<u32, Rc<TargetInstruction>> {
        &self.instructions
    }

    pub fn resources(&self) -> &Rc<ViewResources> {
        &self.resources
    }

    pub fn surrogate_instruction(&self) -> Option<&Rc<TargetInstruction>> {
        self.surrogate_instruction.as_ref()
    }

    pub fn part(&self) -> Option<String> {
        self.part.borrow().clone()
    }

    pub fn set_part(&self, part: Option<String>) {
        *self.part.borrow_mut() = part;
    }

    // ===== Cache =====

    /// Configure the view pool. With `do_not_override` an already configured
    /// size is kept.
    pub fn set_cache_size(&self, size: Option<CacheSize>, do_not_override: bool) {
        let requested = size.map(CacheSize::capacity).unwrap_or(0);
        if self.cache_size.get().is_none() || !do_not_override {
            self.cache_size.set(Some(requested));
        }

        let capacity = self.cache_size.get().unwrap_or(0);
        let mut cache = self.cache.borrow_mut();
        if capacity > 0 {
            let pool = cache.get_or_insert_with(Vec::new);
            pool.truncate(capacity);
        } else {
            *cache = None;
        }
    }

    pub fn is_caching(&self) -> bool {
        self.cache_size.get().unwrap_or(0) > 0
    }

    pub fn cached_views(&self) -> usize {
        self.cache.borrow().as_ref().map(Vec::len).unwrap_or(0)
    }

    pub fn get_cached_view(&self) -> Option<Rc<View>> {
        self.cache.borrow_mut().as_mut().and_then(Vec::pop)
    }

    /// Detach and unbind `view`, then pool it if there is room. A full pool
    /// refuses the view.
    pub fn return_view_to_cache(&self, view: &Rc<View>) {
        if view.is_attached() {
            view.detached();
        }
        if view.is_bound() {
            view.unbind();
        }

        let capacity = self.cache_size.get().unwrap_or(0);
        let mut cache = self.cache.borrow_mut();
        match cache.as_mut() {
            Some(pool) if pool.len() < capacity => {
                view.set_from_cache(true);
                pool.push(view.clone());
            }
            _ => tracing::trace!("view cache full, dropping view"),
        }
    }

    // ===== Instantiation =====

    pub fn create(
        self: &Rc<Self>,
        container: &Rc<Container>,
        binding_context: Option<&BindingContext>,
        instruction: &ViewCreateInstruction,
        element: Option<NodeId>,
    ) -> Result<Rc<View>> {
        if let Some(view) = self.get_cached_view() {
            tracing::debug!("reusing cached view");
            if !instruction.suppress_bind {
                view.bind_with(binding_context, false);
            }
            return Ok(view);
        }

        let fragment = if instruction.enhance {
            self.template
        } else {
            self.document.clone_node(self.template, true)
        };
        let targets: Vec<NodeId> = self
            .document
            .descendants(fragment)
            .into_iter()
            .filter(|node| self.document.has_class(*node, TARGET_CLASS))
            .collect();

        let mut build = Instantiation {
            document: &self.document,
            resources: &self.resources,
            binding_context,
            part_replacements: instruction.part_replacements.clone(),
            root: container.clone(),
            containers: HashMap::new(),
            controllers: Vec::new(),
            bindings: Vec::new(),
            children: Rc::new(RefCell::new(Vec::new())),
            content_selectors: Vec::new(),
            detached: Vec::new(),
        };

        self.resources
            .on_before_create(self, container, fragment, instruction, binding_context);

        if let (Some(element), Some(surrogate)) = (element, &self.surrogate_instruction) {
            build.apply_surrogate(container, element, surrogate)?;
        }

        for target in targets {
            let Some(target_instruction) = self
                .document
                .get_attribute(target, TARGET_ID_ATTRIBUTE)
                .and_then(|id| id.parse::<u32>().ok())
                .and_then(|id| self.instructions.get(&id))
            else {
                continue;
            };
            build.apply(target, target_instruction)?;
        }

        let view = View::new(
            self.document.clone(),
            Rc::downgrade(self),
            fragment,
            build.controllers,
            build.bindings,
            build.children,
            instruction.system_controlled,
            build.content_selectors,
        );
        if instruction.enhance {
            view.keep_fragment_on_drop();
        }
        view.own_detached_nodes(build.detached);

        if !instruction.initiated_by_behavior {
            view.created();
        }

        self.resources.on_after_create(&view);

        if !instruction.suppress_bind {
            view.bind_with(binding_context, false);
        }

        Ok(view)
    }

    pub fn describe(&self) -> Value {
        let instructions: serde_json::Map<String, Value> = self
            .instructions
            .iter()
            .map(|(id, instruction)| (id.to_string(), instruction.describe()))
            .collect();
        json!({
            "template": self.document.inner_html(self.template),
            "instructions": instructions,
            "surrogate": self.surrogate_instruction.as_ref().map(|s| s.describe()),
            "part": self.part(),
            "cacheSize": self.cache_size.get().map(|size| {
                if size == usize::MAX { Value::from("*") } else { Value::from(size) }
            }),
        })
    }
}

/// Accumulates what one `create` call builds
struct Instantiation<'a> {
    document: &'a Document,
    resources: &'a Rc<ViewResources>,
    binding_context: Option<&'a BindingContext>,
    part_replacements: Option<Rc<PartReplacements>>,
    root: Rc<Container>,
    containers: HashMap<InjectorId, Rc<Container>>,
    controllers: Vec<Rc<Controller>>,
    bindings: Vec<Rc<dyn Binding>>,
    children: Rc<RefCell<Vec<ViewNode>>>,
    content_selectors: Vec<Rc<ContentSelector>>,
    /// Markers and replaced elements taken out of the view's nodes
    detached: Vec<NodeId>,
}

impl Instantiation<'_> {
    fn apply(&mut self, element: NodeId, instruction: &Rc<TargetInstruction>) -> Result<()> {
        let document = self.document;

        if let Some(expression) = &instruction.content_expression {
            if let Some(text) = document.next_sibling(element) {
                self.bindings.push(expression.create_binding(BindingTarget::Node {
                    document: document.clone(),
                    node: text,
                    property: "textContent".to_string(),
                }));
            }
            document.remove(element);
            self.detached.push(element);
            return Ok(());
        }

        if let Some(content) = &instruction.content_selector {
            let anchor = document.create_comment("anchor");
            document.replace_node(anchor, element);
            self.detached.push(element);
            self.content_selectors.push(ContentSelector::new(
                document.clone(),
                anchor,
                content.selector.clone(),
            )?);
            return Ok(());
        }

        let host = element;
        let mut element = element;
        if !instruction.behavior_instructions.is_empty() {
            if !instruction.anchor_is_container {
                let anchor = document.create_comment("anchor");
                document.replace_node(anchor, element);
                self.detached.push(element);
                element = anchor;
            }

            let parent = self
                .containers
                .get(&instruction.parent_injector_id)
                .unwrap_or(&self.root)
                .clone();

            let element_container = parent.create_element_child(ElementScope::new(
                document.clone(),
                element,
                instruction.clone(),
                self.binding_context.cloned(),
                &self.children,
                self.resources.clone(),
                self.part_replacements.clone(),
            )
            .with_host(host));
            for provider in &instruction.providers {
                element_container.register_provider(*provider);
            }
            if let Some(id) = instruction.injector_id {
                self.containers.insert(id, element_container.clone());
            }

            for behavior_instruction in &instruction.behavior_instructions {
                let Some(behavior) = &behavior_instruction.behavior else {
                    continue;
                };
                let controller =
                    behavior.create(&element_container, behavior_instruction, Some(element))?;
                if let Some(content_view) = controller.content_view() {
                    self.children.borrow_mut().push(ViewNode::View(content_view));
                }
                self.controllers.push(controller);
            }
        }

        for expression in &instruction.expressions {
            self.bindings.push(expression.create_binding(document, element));
        }

        Ok(())
    }

    /// Merge the template root's attributes and behaviors onto the host
    fn apply_surrogate(
        &mut self,
        container: &Rc<Container>,
        element: NodeId,
        instruction: &Rc<TargetInstruction>,
    ) -> Result<()> {
        let document = self.document;

        for provider in &instruction.providers {
            container.register_provider(*provider);
        }

        for (key, value) in &instruction.values {
            match document.get_attribute(element, key).filter(|v| !v.is_empty()) {
                Some(current) if key == "class" => {
                    document.set_attribute(element, "class", &format!("{} {}", current, value));
                }
                Some(current) if key == "style" => {
                    let mut styles = style_to_map(value);
                    styles.extend(style_to_map(&current));
                    document.set_attribute(element, "style", &map_to_style(&styles));
                }
                Some(_) => {}
                None => document.set_attribute(element, key, value),
            }
        }

        for behavior_instruction in &instruction.behavior_instructions {
            let Some(behavior) = &behavior_instruction.behavior else {
                continue;
            };
            let controller = behavior.create(container, behavior_instruction, Some(element))?;
            if let Some(content_view) = controller.content_view() {
                self.children.borrow_mut().push(ViewNode::View(content_view));
            }
            self.controllers.push(controller);
        }

        for expression in &instruction.expressions {
            self.bindings.push(expression.create_binding(document, element));
        }

        Ok(())
    }
}

fn style_to_map(style: &str) -> IndexMap<String, String> {
    style
        .split(';')
        .filter_map(|declaration| {
            let (key, value) = declaration.split_once(':')?;
            let key = key.trim();
            (!key.is_empty()).then(|| (key.to_string(), value.trim().to_string()))
        })
        .collect()
}

fn map_to_style(styles: &IndexMap<String, String>) -> String {
    styles
        .iter()
        .map(|(key, value)| format!("{}:{};", key, value))
        .collect()
}

/// Factory for the lifted template of a template controller, with the
/// context and part replacements of the element it sits on
pub struct BoundViewFactory {
    parent_container: Rc<Container>,
    view_factory: ViewFactoryRef,
    binding_context: Option<BindingContext>,
    part_replacements: Option<Rc<PartReplacements>>,
}

impl BoundViewFactory {
    pub fn new(
        parent_container: Rc<Container>,
        view_factory: ViewFactoryRef,
        binding_context: Option<BindingContext>,
        part_replacements: Option<Rc<PartReplacements>>,
    ) -> Self {
        BoundViewFactory {
            parent_container,
            view_factory,
            binding_context,
            part_replacements,
        }
    }

    /// A view bound to `binding_context`, or system controlled by the
    /// element's context when none is given
    pub fn create(&self, binding_context: Option<&BindingContext>) -> Result<Rc<View>> {
        let container = self.parent_container.create_child();
        let context = binding_context.or(self.binding_context.as_ref());
        let instruction = ViewCreateInstruction {
            part_replacements: self.part_replacements.clone(),
            system_controlled: binding_context.is_none(),
            ..Default::default()
        };
        self.view_factory.create(&container, context, &instruction, None)
    }

    pub fn view_factory(&self) -> &ViewFactoryRef {
        &self.view_factory
    }

    pub fn is_caching(&self) -> bool {
        self.view_factory.is_caching()
    }

    pub fn set_cache_size(&self, size: Option<CacheSize>, do_not_override: bool) {
        self.view_factory.set_cache_size(size, do_not_override);
    }

    pub fn get_cached_view(&self) -> Option<Rc<View>> {
        self.view_factory.get_cached_view()
    }

    pub fn return_view_to_cache(&self, view: &Rc<View>) {
        self.view_factory.return_view_to_cache(view);
    }
}

/// Stands in for a factory whose template is still loading further up the
/// same load chain. Usable once the load completes.
pub struct ProxyViewFactory {
    address: String,
    resolved: RefCell<Option<Rc<ViewFactory>>>,
}

impl ProxyViewFactory {
    pub fn new(address: &str) -> Rc<Self> {
        Rc::new(ProxyViewFactory {
            address: address.to_string(),
            resolved: RefCell::new(None),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub(crate) fn resolve(&self, factory: Rc<ViewFactory>) {
        *self.resolved.borrow_mut() = Some(factory);
    }

    pub fn factory(&self) -> Option<Rc<ViewFactory>> {
        self.resolved.borrow().clone()
    }
}

/// A compiled factory or a proxy for one still being loaded
#[derive(Clone)]
pub enum ViewFactoryRef {
    Compiled(Rc<ViewFactory>),
    Proxy(Rc<ProxyViewFactory>),
}

impl From<Rc<ViewFactory>> for ViewFactoryRef {
    fn from(factory: Rc<ViewFactory>) -> Self {
        ViewFactoryRef::Compiled(factory)
    }
}

impl ViewFactoryRef {
    pub fn resolved(&self) -> Result<Rc<ViewFactory>> {
        match self {
            ViewFactoryRef::Compiled(factory) => Ok(factory.clone()),
            ViewFactoryRef::Proxy(proxy) => proxy
                .factory()
                .ok_or_else(|| TemplatingError::UnresolvedViewFactory(proxy.address.clone())),
        }
    }

    pub fn create(
        &self,
        container: &Rc<Container>,
        binding_context: Option<&BindingContext>,
        instruction: &ViewCreateInstruction,
        element: Option<NodeId>,
    ) -> Result<Rc<View>> {
        self.resolved()?
            .create(container, binding_context, instruction, element)
    }

    pub fn part(&self) -> Option<String> {
        self.resolved().ok().and_then(|factory| factory.part())
    }

    pub fn is_caching(&self) -> bool {
        self.resolved().map(|f| f.is_caching()).unwrap_or(false)
    }

    pub fn set_cache_size(&self, size: Option<CacheSize>, do_not_override: bool) {
        if let Ok(factory) = self.resolved() {
            factory.set_cache_size(size, do_not_override);
        }
    }

    pub fn get_cached_view(&self) -> Option<Rc<View>> {
        self.resolved().ok().and_then(|factory| factory.get_cached_view())
    }

    pub fn return_view_to_cache(&self, view: &Rc<View>) {
        if let Ok(factory) = self.resolved() {
            factory.return_view_to_cache(view);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_size_parse() {
        assert_eq!("*".parse::<CacheSize>().unwrap(), CacheSize::Unbounded);
        assert_eq!(" 3 ".parse::<CacheSize>().unwrap(), CacheSize::Bounded(3));
        assert!(matches!(
            "lots".parse::<CacheSize>(),
            Err(TemplatingError::InvalidCacheSize(_))
        ));
    }

    #[test]
    fn test_cache_size_serde() {
        let sizes: Vec<CacheSize> = serde_json::from_str(r#"["*", 4, "2"]"#).unwrap();
        assert_eq!(
            sizes,
            vec![CacheSize::Unbounded, CacheSize::Bounded(4), CacheSize::Bounded(2)]
        );
        assert_eq!(serde_json::to_string(&CacheSize::Unbounded).unwrap(), r#""*""#);
    }

    #[test]
    fn test_style_merge_consumer_wins() {
        let mut styles = style_to_map("color:red; width: 10px;");
        styles.extend(style_to_map("color: blue"));
        assert_eq!(map_to_style(&styles), "color:blue;width:10px;");
    }

    #[test]
    fn test_set_cache_size_keeps_existing_when_asked() {
        let document = Document::new();
        let template = document.create_fragment();
        let factory = ViewFactory::new(
            document,
            template,
            IndexMap::new(),
            ViewResources::new(None, None),
            None,
        );
        assert!(!factory.is_caching());

        factory.set_cache_size(Some(CacheSize::Bounded(2)), false);
        factory.set_cache_size(Some(CacheSize::Bounded(5)), true);
        assert!(factory.is_caching());
        assert_eq!(factory.describe()["cacheSize"], json!(2));

        factory.set_cache_size(None, false);
        assert!(!factory.is_caching());
    }
}
