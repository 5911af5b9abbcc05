//! Loader
//!
//! Where templates and modules come from. The engine only needs the
//! `Loader` trait; `MemoryLoader` serves registered sources from memory.
//! Template registry entries are memoized per url so that each template is
//! parsed and compiled once.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value;
use smol::future::BoxedLocal;

use crate::behavior::{BehaviorBuilder, ModelType};
use crate::binding::ValueConverter;
use crate::dom::{Document, NodeId};
use crate::error::{Result, TemplatingError};
use crate::resources::ViewResources;
use crate::util::relative_to_file;
use crate::view_factory::ViewFactory;
use crate::view_strategy::ViewStrategy;

// ===== Load memoization =====

type Waiter<T> = Box<dyn FnOnce(&std::result::Result<T, String>)>;

enum PendingState<T> {
    Idle,
    Loading(Vec<Waiter<T>>),
    Done(std::result::Result<T, String>),
}

/// A load that runs once. Later requesters wait for the first result;
/// failures are replayed by message.
pub(crate) struct Pending<T> {
    state: RefCell<PendingState<T>>,
}

impl<T: Clone + 'static> Pending<T> {
    pub fn new() -> Self {
        Pending {
            state: RefCell::new(PendingState::Idle),
        }
    }

    /// True for the caller that should perform the load
    pub fn start(&self) -> bool {
        let mut state = self.state.borrow_mut();
        match &mut *state {
            PendingState::Idle => {
                *state = PendingState::Loading(Vec::new());
                true
            }
            PendingState::Loading(_) | PendingState::Done(_) => false,
        }
    }

    pub fn is_started(&self) -> bool {
        !matches!(&*self.state.borrow(), PendingState::Idle)
    }

    pub fn complete(&self, result: &Result<T>) {
        let outcome = match result {
            Ok(value) => Ok(value.clone()),
            Err(err) => Err(err.to_string()),
        };
        let previous = self.state.replace(PendingState::Done(outcome.clone()));
        if let PendingState::Loading(waiters) = previous {
            for waiter in waiters {
                waiter(&outcome);
            }
        }
    }

    /// Run `callback` with the result, now if already done
    pub fn on_complete(&self, callback: impl FnOnce(&std::result::Result<T, String>) + 'static) {
        let done = match &mut *self.state.borrow_mut() {
            PendingState::Done(outcome) => Some(outcome.clone()),
            PendingState::Loading(waiters) => {
                waiters.push(Box::new(callback));
                return;
            }
            state @ PendingState::Idle => {
                *state = PendingState::Loading(vec![Box::new(callback)]);
                return;
            }
        };
        if let Some(outcome) = done {
            callback(&outcome);
        }
    }

    pub fn wait(&self) -> BoxedLocal<Result<T>> {
        let (sender, receiver) = smol::channel::bounded(1);
        self.on_complete(move |outcome| {
            let _ = sender.try_send(outcome.clone());
        });
        Box::pin(async move {
            match receiver.recv().await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(message)) => Err(TemplatingError::LoadFailed(message)),
                Err(_) => Err(TemplatingError::LoadFailed("abandoned load".to_string())),
            }
        })
    }
}

// ===== Template registry =====

/// A `<require from="..." as="...">` found in a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateDependency {
    pub src: String,
    pub name: Option<String>,
}

/// One loaded template and, once compiled, its factory
pub struct TemplateRegistryEntry {
    address: String,
    document: Document,
    template: Cell<Option<NodeId>>,
    dependencies: RefCell<Vec<TemplateDependency>>,
    resources: RefCell<Option<Rc<ViewResources>>>,
    factory: RefCell<Option<Rc<ViewFactory>>>,
    load: Pending<Rc<ViewFactory>>,
}

impl TemplateRegistryEntry {
    pub fn new(document: Document, address: &str) -> Rc<Self> {
        Rc::new(TemplateRegistryEntry {
            address: address.to_string(),
            document,
            template: Cell::new(None),
            dependencies: RefCell::new(Vec::new()),
            resources: RefCell::new(None),
            factory: RefCell::new(None),
            load: Pending::new(),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn template(&self) -> Option<NodeId> {
        self.template.get()
    }

    /// Store the template, pulling its `<require>` elements out as
    /// dependencies relative to this entry's address
    pub fn set_template(&self, template: NodeId) -> Result<()> {
        let document = &self.document;
        let requires: Vec<NodeId> = document
            .descendants(template)
            .into_iter()
            .filter(|node| document.is_element_named(*node, "require"))
            .collect();

        for node in requires {
            let src = document
                .get_attribute(node, "from")
                .ok_or_else(|| TemplatingError::MissingRequireSource(self.address.clone()))?;
            let name = document.get_attribute(node, "as");
            self.add_dependency(&src, name.as_deref());
            document.remove(node);
        }

        self.template.set(Some(template));
        Ok(())
    }

    pub fn add_dependency(&self, src: &str, name: Option<&str>) {
        self.dependencies.borrow_mut().push(TemplateDependency {
            src: relative_to_file(src, &self.address),
            name: name.map(str::to_string),
        });
    }

    pub fn dependencies(&self) -> Vec<TemplateDependency> {
        self.dependencies.borrow().clone()
    }

    pub fn resources(&self) -> Option<Rc<ViewResources>> {
        self.resources.borrow().clone()
    }

    pub fn set_resources(&self, resources: Rc<ViewResources>) {
        *self.resources.borrow_mut() = Some(resources);
    }

    pub fn factory(&self) -> Option<Rc<ViewFactory>> {
        self.factory.borrow().clone()
    }

    pub fn set_factory(&self, factory: Rc<ViewFactory>) {
        *self.factory.borrow_mut() = Some(factory);
    }

    pub fn is_ready(&self) -> bool {
        self.factory.borrow().is_some()
    }

    pub(crate) fn load_state(&self) -> &Pending<Rc<ViewFactory>> {
        &self.load
    }
}

/// Urls and entry addresses already being loaded by one load chain
#[derive(Debug, Default)]
pub struct ResourceLoadContext {
    dependencies: RefCell<HashSet<String>>,
}

impl ResourceLoadContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_dependency(&self, url: &str) {
        self.dependencies.borrow_mut().insert(url.to_string());
    }

    pub fn has_dependency(&self, url: &str) -> bool {
        self.dependencies.borrow().contains(url)
    }
}

// ===== Modules =====

/// One export of a loaded module
#[derive(Clone)]
pub enum Export {
    /// A model type without metadata
    Model(ModelType),
    /// A model type declared as a custom element or attribute
    Behavior { model: ModelType, behavior: BehaviorBuilder },
    ValueConverter {
        converter: Rc<dyn ValueConverter>,
        name: Option<String>,
    },
    ViewStrategy(ViewStrategy),
    Template(Rc<TemplateRegistryEntry>),
    /// Plain data; never a resource
    Value(Value),
}

pub struct ModuleExports {
    module_id: String,
    exports: IndexMap<String, Export>,
}

impl ModuleExports {
    pub fn new(module_id: &str) -> Self {
        ModuleExports {
            module_id: module_id.to_string(),
            exports: IndexMap::new(),
        }
    }

    pub fn with(mut self, key: &str, export: Export) -> Self {
        self.exports.insert(key.to_string(), export);
        self
    }

    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    pub fn get(&self, key: &str) -> Option<&Export> {
        self.exports.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Export)> {
        self.exports.iter()
    }

    pub fn len(&self) -> usize {
        self.exports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exports.is_empty()
    }
}

pub trait Loader {
    fn load_template(&self, url: &str) -> BoxedLocal<Result<Rc<TemplateRegistryEntry>>>;

    fn load_module(&self, id: &str) -> BoxedLocal<Result<Rc<ModuleExports>>>;

    /// Loads in order; the first failure wins
    fn load_all_modules(&self, ids: &[String]) -> BoxedLocal<Result<Vec<Rc<ModuleExports>>>> {
        let loads: Vec<_> = ids.iter().map(|id| self.load_module(id)).collect();
        Box::pin(async move {
            let mut modules = Vec::with_capacity(loads.len());
            for load in loads {
                modules.push(load.await?);
            }
            Ok(modules)
        })
    }

    fn add_plugin(&self, name: &str, implementation: &str);

    fn apply_plugin_to_url(&self, url: &str, plugin: &str) -> String {
        format!("{}!{}", url, plugin)
    }
}

/// Serves templates and modules registered up front
pub struct MemoryLoader {
    document: Document,
    templates: RefCell<HashMap<String, String>>,
    modules: RefCell<HashMap<String, Rc<ModuleExports>>>,
    registry: RefCell<HashMap<String, Rc<TemplateRegistryEntry>>>,
    plugins: RefCell<IndexMap<String, String>>,
    template_loads: Cell<usize>,
}

impl MemoryLoader {
    pub fn new(document: Document) -> Self {
        MemoryLoader {
            document,
            templates: RefCell::new(HashMap::new()),
            modules: RefCell::new(HashMap::new()),
            registry: RefCell::new(HashMap::new()),
            plugins: RefCell::new(IndexMap::new()),
            template_loads: Cell::new(0),
        }
    }

    pub fn add_template(&self, url: &str, markup: &str) {
        self.templates.borrow_mut().insert(url.to_string(), markup.to_string());
    }

    pub fn add_module(&self, exports: ModuleExports) {
        self.modules
            .borrow_mut()
            .insert(exports.module_id().to_string(), Rc::new(exports));
    }

    pub fn plugins(&self) -> IndexMap<String, String> {
        self.plugins.borrow().clone()
    }

    /// Number of templates parsed so far
    pub fn template_loads(&self) -> usize {
        self.template_loads.get()
    }

    fn template_entry(&self, url: &str) -> Result<Rc<TemplateRegistryEntry>> {
        if let Some(entry) = self.registry.borrow().get(url) {
            return Ok(entry.clone());
        }

        let markup = self
            .templates
            .borrow()
            .get(url)
            .cloned()
            .ok_or_else(|| TemplatingError::TemplateNotFound(url.to_string()))?;

        let entry = TemplateRegistryEntry::new(self.document.clone(), url);
        entry.set_template(self.document.create_template_from_markup(&markup)?)?;
        self.template_loads.set(self.template_loads.get() + 1);
        self.registry.borrow_mut().insert(url.to_string(), entry.clone());
        Ok(entry)
    }
}

impl Loader for MemoryLoader {
    fn load_template(&self, url: &str) -> BoxedLocal<Result<Rc<TemplateRegistryEntry>>> {
        let result = self.template_entry(url);
        Box::pin(async move { result })
    }

    fn load_module(&self, id: &str) -> BoxedLocal<Result<Rc<ModuleExports>>> {
        // `styles.css!css-resource-plugin` is served as `styles.css`
        let id = id.split_once('!').map(|(base, _)| base).unwrap_or(id);
        let result = self
            .modules
            .borrow()
            .get(id)
            .cloned()
            .ok_or_else(|| TemplatingError::ModuleNotFound(id.to_string()));
        Box::pin(async move { result })
    }

    fn add_plugin(&self, name: &str, implementation: &str) {
        self.plugins
            .borrow_mut()
            .insert(name.to_string(), implementation.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_elements_become_dependencies() {
        let document = Document::new();
        let loader = MemoryLoader::new(document.clone());
        loader.add_template(
            "app/shell.html",
            r#"<template><require from="./nav-bar"></require><require from="../shared/date" as="when"></require><nav-bar></nav-bar></template>"#,
        );

        let entry = smol::block_on(loader.load_template("app/shell.html")).unwrap();
        assert_eq!(
            entry.dependencies(),
            vec![
                TemplateDependency {
                    src: "app/nav-bar".to_string(),
                    name: None
                },
                TemplateDependency {
                    src: "shared/date".to_string(),
                    name: Some("when".to_string())
                },
            ]
        );
        let template = entry.template().unwrap();
        assert_eq!(document.inner_html(template), "<nav-bar></nav-bar>");
    }

    #[test]
    fn test_require_without_from_fails() {
        let loader = MemoryLoader::new(Document::new());
        loader.add_template("bad.html", "<template><require as=\"x\"></require></template>");
        let err = smol::block_on(loader.load_template("bad.html")).err().unwrap();
        assert!(matches!(err, TemplatingError::MissingRequireSource(_)));
    }

    #[test]
    fn test_templates_are_memoized() {
        let loader = MemoryLoader::new(Document::new());
        loader.add_template("a.html", "<template></template>");
        let first = smol::block_on(loader.load_template("a.html")).unwrap();
        let second = smol::block_on(loader.load_template("a.html")).unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(loader.template_loads(), 1);
    }

    #[test]
    fn test_plugin_suffix_is_ignored() {
        let loader = MemoryLoader::new(Document::new());
        loader.add_module(ModuleExports::new("styles.css"));
        let url = loader.apply_plugin_to_url("styles.css", "css-resource-plugin");
        assert_eq!(url, "styles.css!css-resource-plugin");
        let module = smol::block_on(loader.load_module(&url)).unwrap();
        assert_eq!(module.module_id(), "styles.css");
    }

    #[test]
    fn test_pending_replays_result() {
        let pending: Pending<u32> = Pending::new();
        assert!(pending.start());
        assert!(!pending.start());

        let waiter = pending.wait();
        pending.complete(&Ok(7));
        assert_eq!(smol::block_on(waiter).unwrap(), 7);
        assert_eq!(smol::block_on(pending.wait()).unwrap(), 7);
    }

    #[test]
    fn test_pending_replays_failure() {
        let pending: Pending<u32> = Pending::new();
        pending.start();
        pending.complete(&Err(TemplatingError::ModuleNotFound("x".to_string())));
        let err = smol::block_on(pending.wait()).err().unwrap();
        assert_eq!(err.to_string(), "Loading \"Module \"x\" could not be found.\" failed earlier.");
    }
}
