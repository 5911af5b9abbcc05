//! Shared fixtures for the integration tests: a compile harness, models
//! that record their lifecycle calls, and an animator whose animations
//! finish only when the test says so.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use aurelia_templating::behavior::property::PropertyBag;
use aurelia_templating::binding::syntax::SyntaxBindingLanguage;
use aurelia_templating::resources::Resource;
use aurelia_templating::view_strategy::ViewStrategy;
use aurelia_templating::{
    Animator, BehaviorBuilder, BindingContext, Capabilities, Container, Document, EngineConfig,
    HtmlBehaviorResource, MemoryLoader, ModelType, NodeId, TemplateSource, ViewCompileInstruction,
    ViewCompiler, ViewEngine, ViewFactory, ViewModel, ViewResources,
};
use serde_json::{Map, Value};
use smol::channel::{Receiver, Sender};
use smol::future::BoxedLocal;

// ===== Logs =====

#[derive(Clone, Default)]
pub struct Log(Rc<RefCell<Vec<String>>>);

impl Log {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.0.borrow_mut().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

// ===== Models =====

/// Records every lifecycle call as `"<name>.<callback>"`
pub struct RecordingModel {
    name: String,
    log: Log,
    values: RefCell<Map<String, Value>>,
    properties: RefCell<Option<PropertyBag>>,
    strategy: RefCell<Option<ViewStrategy>>,
}

impl RecordingModel {
    pub fn new(name: &str, log: &Log) -> Rc<Self> {
        Rc::new(RecordingModel {
            name: name.to_string(),
            log: log.clone(),
            values: RefCell::new(Map::new()),
            properties: RefCell::new(None),
            strategy: RefCell::new(None),
        })
    }

    pub fn with_value(self: Rc<Self>, key: &str, value: Value) -> Rc<Self> {
        self.values.borrow_mut().insert(key.to_string(), value);
        self
    }

    pub fn with_view_strategy(self: Rc<Self>, strategy: ViewStrategy) -> Rc<Self> {
        *self.strategy.borrow_mut() = Some(strategy);
        self
    }

    pub fn properties(&self) -> Option<PropertyBag> {
        self.properties.borrow().clone()
    }
}

impl ViewModel for RecordingModel {
    fn created(&self, _view: &Rc<aurelia_templating::View>) {
        self.log.push(format!("{}.created", self.name));
    }

    fn bind(&self, _context: &BindingContext) {
        self.log.push(format!("{}.bind", self.name));
    }

    fn unbind(&self) {
        self.log.push(format!("{}.unbind", self.name));
    }

    fn attached(&self) {
        self.log.push(format!("{}.attached", self.name));
    }

    fn detached(&self) {
        self.log.push(format!("{}.detached", self.name));
    }

    fn property_changed(&self, name: &str, new_value: &Value, old_value: &Value) {
        self.log
            .push(format!("{}.propertyChanged({}: {} -> {})", self.name, name, old_value, new_value));
    }

    fn handle_change(&self, handler: &str, new_value: &Value, old_value: &Value) {
        self.log
            .push(format!("{}.{}({} -> {})", self.name, handler, old_value, new_value));
    }

    fn activate(&self, model: &Value) -> BoxedLocal<()> {
        self.log.push(format!("{}.activate({})", self.name, model));
        Box::pin(smol::future::ready(()))
    }

    fn view_strategy(&self) -> Option<ViewStrategy> {
        self.strategy.borrow().clone()
    }

    fn define_properties(&self, properties: PropertyBag) {
        *self.properties.borrow_mut() = Some(properties);
    }

    fn property_bag(&self) -> Option<PropertyBag> {
        self.properties.borrow().clone()
    }

    fn get_property(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.properties.borrow().as_ref().and_then(|p| p.get(name)) {
            return Some(value);
        }
        self.values.borrow().get(name).cloned()
    }

    fn set_property(&self, name: &str, value: Value) -> bool {
        if let Some(properties) = self.properties.borrow().as_ref() {
            if properties.set(name, value.clone()) {
                return true;
            }
        }
        self.values.borrow_mut().insert(name.to_string(), value);
        true
    }
}

/// Every lifecycle callback
pub fn lifecycle() -> Capabilities {
    Capabilities::CREATED
        | Capabilities::BIND
        | Capabilities::UNBIND
        | Capabilities::ATTACHED
        | Capabilities::DETACHED
}

/// Model type whose instances record into `log` under `name`
pub fn recording_type(name: &str, log: &Log) -> ModelType {
    let log = log.clone();
    let instance = name.to_string();
    ModelType::new(name, move |_| RecordingModel::new(&instance, &log) as BindingContext)
        .with_capabilities(lifecycle())
}

// ===== Animator =====

/// Enter and leave only settle when released. Elements are recorded by
/// their tag name.
#[derive(Default)]
pub struct ManualAnimator {
    calls: Log,
    waiting: RefCell<Vec<Sender<()>>>,
}

impl ManualAnimator {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.entries()
    }

    pub fn pending(&self) -> usize {
        self.waiting.borrow().len()
    }

    pub fn release_all(&self) {
        for sender in self.waiting.borrow_mut().drain(..) {
            let _ = sender.try_send(());
        }
    }

    fn wait(&self, kind: &str, document: &Document, element: NodeId) -> BoxedLocal<bool> {
        self.calls
            .push(format!("{}:{}", kind, document.tag_name(element).unwrap_or_default()));
        let (tx, rx): (Sender<()>, Receiver<()>) = smol::channel::bounded(1);
        self.waiting.borrow_mut().push(tx);
        Box::pin(async move { rx.recv().await.is_ok() })
    }
}

impl Animator for ManualAnimator {
    fn enter(&self, document: &Document, element: NodeId) -> BoxedLocal<bool> {
        self.wait("enter", document, element)
    }

    fn leave(&self, document: &Document, element: NodeId) -> BoxedLocal<bool> {
        self.wait("leave", document, element)
    }
}

// ===== Harness =====

/// One document, a root container and app-level resources
pub struct Harness {
    pub document: Document,
    pub container: Rc<Container>,
    pub resources: Rc<ViewResources>,
    pub compiler: ViewCompiler,
}

impl Harness {
    pub fn new() -> Self {
        let document = Document::new();
        let resources = ViewResources::new(None, None);
        let compiler = ViewCompiler::new(
            document.clone(),
            Rc::new(SyntaxBindingLanguage::new()),
            resources.clone(),
        );
        Harness {
            document,
            container: Container::new(),
            resources,
            compiler,
        }
    }

    pub fn compile(&self, markup: &str) -> Rc<ViewFactory> {
        self.compiler
            .compile(TemplateSource::Markup(markup), None, &ViewCompileInstruction::default())
            .unwrap()
    }

    /// Build `builder` for `model` and register it with the app resources
    pub fn register(&self, builder: BehaviorBuilder, model: ModelType) -> Rc<HtmlBehaviorResource> {
        let behavior = builder.build(&self.container, model).unwrap();
        behavior.clone().register(&self.resources, None).unwrap();
        behavior
    }

    /// Give a custom element its view from inline markup
    pub fn set_view(&self, behavior: &Rc<HtmlBehaviorResource>, markup: &str) {
        let factory = self
            .compiler
            .compile(TemplateSource::Markup(markup), None, &ViewCompileInstruction::new(false, true))
            .unwrap();
        behavior.set_view_factory(Some(factory.into()));
    }

    /// Element to render into
    pub fn host(&self) -> NodeId {
        self.document.create_element("div")
    }

    pub fn html(&self, node: NodeId) -> String {
        self.document.inner_html(node)
    }

    pub fn text(&self, node: NodeId) -> String {
        self.document.text_content(node)
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Engine over an in-memory loader sharing the harness document
pub fn engine(harness: &Harness, loader: Rc<MemoryLoader>, config: EngineConfig) -> Rc<ViewEngine> {
    let compiler = ViewCompiler::new(
        harness.document.clone(),
        Rc::new(SyntaxBindingLanguage::new()),
        harness.resources.clone(),
    );
    ViewEngine::new(
        loader,
        harness.container.clone(),
        compiler,
        harness.resources.clone(),
        config,
    )
}

/// Run `future` to completion on the container's task queue
pub fn run<T>(container: &Rc<Container>, future: impl std::future::Future<Output = T>) -> T {
    container.task_queue().run(future)
}
