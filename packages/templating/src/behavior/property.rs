//! Bindable Properties
//!
//! Declared properties of a behavior and the observers backing them on each
//! model instance. Writes made while an observer is publishing are coalesced
//! into one microtask, so a burst of synchronous writes notifies once with
//! the value before the burst and the value after it.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use super::{Capabilities, ModelType};
use crate::binding::{AttributeValue, Binding, BindingMode};
use crate::context::{BindingContext, ViewModel};
use crate::error::{Result, TemplatingError};
use crate::task_queue::{MicroTask, TaskQueue};
use crate::util::hyphenate;

/// Callback receiving `(new_value, old_value)`
pub type Subscriber = Rc<dyn Fn(&Value, &Value)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BindableProperty {
    pub name: String,
    /// Attribute the property is set from; the hyphenated name by default
    pub attribute: String,
    pub default_binding_mode: BindingMode,
    pub change_handler: Option<String>,
    pub default_value: Option<Value>,
    /// Stands for the whole options string of a multi-property attribute
    #[serde(skip)]
    pub(crate) has_options: bool,
    /// Every option key becomes its own observed property
    #[serde(skip)]
    pub(crate) is_dynamic: bool,
}

impl BindableProperty {
    pub fn new(name: &str) -> Self {
        BindableProperty {
            name: name.to_string(),
            attribute: hyphenate(name),
            default_binding_mode: BindingMode::OneWay,
            change_handler: None,
            default_value: None,
            has_options: false,
            is_dynamic: false,
        }
    }

    pub fn with_attribute(mut self, attribute: &str) -> Self {
        self.attribute = attribute.to_string();
        self
    }

    pub fn with_default_binding_mode(mut self, mode: BindingMode) -> Self {
        self.default_binding_mode = mode;
        self
    }

    pub fn with_change_handler(mut self, handler: &str) -> Self {
        self.change_handler = Some(handler.to_string());
        self
    }

    pub fn with_default_value(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn has_options(&self) -> bool {
        self.has_options
    }

    pub fn is_dynamic(&self) -> bool {
        self.is_dynamic
    }

    /// Pick up a `{name}Changed` handler the model declares
    pub(crate) fn define_on(&mut self, model: &ModelType) {
        if self.change_handler.is_none() {
            let handler = format!("{}Changed", self.name);
            if model.declares(&handler) {
                self.change_handler = Some(handler);
            }
        }
    }

    /// Observer for this property on `model`; `None` for options properties
    pub(crate) fn create_observer(
        &self,
        model: &BindingContext,
        model_type: &ModelType,
        task_queue: &Rc<TaskQueue>,
    ) -> Result<Option<Rc<BehaviorPropertyObserver>>> {
        if self.has_options {
            return Ok(None);
        }

        let handler = self
            .change_handler
            .as_deref()
            .filter(|handler| model_type.declares(handler));
        if let (None, Some(declared)) = (handler, &self.change_handler) {
            if !model_type.capabilities().contains(Capabilities::PROPERTY_CHANGED) {
                return Err(TemplatingError::MissingChangeHandler {
                    handler: declared.clone(),
                    model: model_type.name().to_string(),
                });
            }
        }

        let observer = BehaviorPropertyObserver::new(
            task_queue.clone(),
            &self.name,
            self_subscriber(model, model_type, &self.name, handler),
            self.default_value.clone(),
        );
        Ok(Some(observer))
    }

    /// Apply the instruction's value for this property on a fresh model
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn initialize(
        &self,
        model: &BindingContext,
        model_type: &ModelType,
        task_queue: &Rc<TaskQueue>,
        properties: &PropertyBag,
        attributes: Option<&IndexMap<String, AttributeValue>>,
        handles_bind: bool,
        bound: &mut Vec<BoundProperty>,
    ) {
        if self.is_dynamic {
            for (key, value) in attributes.into_iter().flatten() {
                create_dynamic_property(model, model_type, task_queue, properties, handles_bind, key, value, bound);
            }
            return;
        }
        if self.has_options {
            return;
        }

        let Some(observer) = properties.observer(&self.name) else {
            return;
        };

        if let Some(attributes) = attributes {
            let saved = if handles_bind {
                observer.take_self_subscriber()
            } else {
                None
            };

            match attributes.get(&self.attribute) {
                Some(AttributeValue::Literal(value)) => {
                    observer.set_value(Value::String(value.clone()));
                    observer.call();
                }
                Some(AttributeValue::Expression(expression)) => bound.push(BoundProperty {
                    binding: expression.create_property_binding(observer.clone()),
                    observer: observer.clone(),
                }),
                None if self.default_value.is_some() => observer.call(),
                None => {}
            }

            if handles_bind {
                observer.replace_self_subscriber(saved);
            }
        }

        observer.set_publishing(true);
    }
}

#[allow(clippy::too_many_arguments)]
fn create_dynamic_property(
    model: &BindingContext,
    model_type: &ModelType,
    task_queue: &Rc<TaskQueue>,
    properties: &PropertyBag,
    handles_bind: bool,
    name: &str,
    value: &AttributeValue,
    bound: &mut Vec<BoundProperty>,
) {
    let handler_name = format!("{}Changed", name);
    let handler = model_type
        .declares(&handler_name)
        .then_some(handler_name.as_str());
    let subscriber = self_subscriber(model, model_type, name, handler);
    let observer = BehaviorPropertyObserver::new(task_queue.clone(), name, None, None);
    properties.insert(observer.clone());

    if !handles_bind {
        observer.replace_self_subscriber(subscriber.clone());
    }

    match value {
        AttributeValue::Literal(literal) => {
            observer.set_value(Value::String(literal.clone()));
            observer.call();
        }
        AttributeValue::Expression(expression) => bound.push(BoundProperty {
            binding: expression.create_property_binding(observer.clone()),
            observer: observer.clone(),
        }),
    }

    observer.set_publishing(true);
    observer.replace_self_subscriber(subscriber);
}

/// The model's own notification for `name`: the named handler, then the
/// catch-all `property_changed` when the model has that capability
fn self_subscriber(
    model: &BindingContext,
    model_type: &ModelType,
    name: &str,
    handler: Option<&str>,
) -> Option<Subscriber> {
    let catch_all = model_type
        .capabilities()
        .contains(Capabilities::PROPERTY_CHANGED);
    if handler.is_none() && !catch_all {
        return None;
    }

    let weak: Weak<dyn ViewModel> = Rc::downgrade(model);
    let handler = handler.map(str::to_string);
    let name = name.to_string();
    Some(Rc::new(move |new_value: &Value, old_value: &Value| {
        let Some(model) = weak.upgrade() else {
            return;
        };
        if let Some(handler) = &handler {
            model.handle_change(handler, new_value, old_value);
        }
        if catch_all {
            model.property_changed(&name, new_value, old_value);
        }
    }))
}

pub struct BehaviorPropertyObserver {
    me: Weak<BehaviorPropertyObserver>,
    task_queue: Rc<TaskQueue>,
    name: String,
    current: RefCell<Value>,
    old: RefCell<Value>,
    not_queued: Cell<bool>,
    publishing: Cell<bool>,
    self_subscriber: RefCell<Option<Subscriber>>,
    subscribers: RefCell<Vec<(SubscriptionId, Subscriber)>>,
    next_id: Cell<u64>,
}

impl BehaviorPropertyObserver {
    /// A default value counts as a change from null, so the first `call`
    /// reports it
    pub fn new(
        task_queue: Rc<TaskQueue>,
        name: &str,
        self_subscriber: Option<Subscriber>,
        initial_value: Option<Value>,
    ) -> Rc<Self> {
        Rc::new_cyclic(|me| BehaviorPropertyObserver {
            me: me.clone(),
            task_queue,
            name: name.to_string(),
            current: RefCell::new(initial_value.unwrap_or(Value::Null)),
            old: RefCell::new(Value::Null),
            not_queued: Cell::new(true),
            publishing: Cell::new(false),
            self_subscriber: RefCell::new(self_subscriber),
            subscribers: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_value(&self) -> Value {
        self.current.borrow().clone()
    }

    pub fn set_value(&self, value: Value) {
        if *self.current.borrow() == value {
            return;
        }

        let idle = self.not_queued.get();
        if idle {
            let previous = self.current.replace(value);
            *self.old.borrow_mut() = previous;
        } else {
            *self.current.borrow_mut() = value;
        }

        if idle && self.publishing.get() {
            if let Some(me) = self.me.upgrade() {
                self.not_queued.set(false);
                self.task_queue.queue_micro_task(me);
            }
        }
    }

    /// Notify the self subscriber and then every other subscriber, unless
    /// the value ended up where it started
    pub fn call(&self) {
        self.not_queued.set(true);

        let new_value = self.current.borrow().clone();
        let old_value = self.old.borrow().clone();
        if new_value == old_value {
            return;
        }

        let own = self.self_subscriber.borrow().clone();
        if let Some(subscriber) = own {
            subscriber(&new_value, &old_value);
        }

        let subscribers: Vec<Subscriber> = self
            .subscribers
            .borrow()
            .iter()
            .map(|(_, subscriber)| subscriber.clone())
            .collect();
        for subscriber in subscribers {
            subscriber(&new_value, &old_value);
        }

        *self.old.borrow_mut() = new_value;
    }

    pub fn subscribe(&self, subscriber: Subscriber) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.subscribers.borrow_mut().push((id, subscriber));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.borrow_mut().retain(|(existing, _)| *existing != id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }

    pub fn is_publishing(&self) -> bool {
        self.publishing.get()
    }

    pub(crate) fn set_publishing(&self, publishing: bool) {
        self.publishing.set(publishing);
    }

    pub(crate) fn take_self_subscriber(&self) -> Option<Subscriber> {
        self.self_subscriber.borrow_mut().take()
    }

    pub(crate) fn replace_self_subscriber(&self, subscriber: Option<Subscriber>) {
        *self.self_subscriber.borrow_mut() = subscriber;
    }
}

impl MicroTask for BehaviorPropertyObserver {
    fn call(&self) {
        BehaviorPropertyObserver::call(self);
    }
}

/// Observers for one model's bindable properties, by property name
#[derive(Clone, Default)]
pub struct PropertyBag(Rc<RefCell<IndexMap<String, Rc<BehaviorPropertyObserver>>>>);

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observer(&self, name: &str) -> Option<Rc<BehaviorPropertyObserver>> {
        self.0.borrow().get(name).cloned()
    }

    pub(crate) fn insert(&self, observer: Rc<BehaviorPropertyObserver>) {
        self.0.borrow_mut().insert(observer.name().to_string(), observer);
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.observer(name).map(|observer| observer.get_value())
    }

    /// Returns false when there is no observer for `name`
    pub fn set(&self, name: &str, value: Value) -> bool {
        match self.observer(name) {
            Some(observer) => {
                observer.set_value(value);
                true
            }
            None => false,
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.0.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}

/// A property whose value comes from a binding, bound with its controller
pub struct BoundProperty {
    pub observer: Rc<BehaviorPropertyObserver>,
    pub binding: Rc<dyn Binding>,
}
