//! View Models
//!
//! The object side of a binding: every view, slot and behavior binds
//! against an `Rc<dyn ViewModel>`. Lifecycle callbacks default to no-ops;
//! a model opts into them through `Capabilities` on its `ModelType`.

use std::cell::RefCell;
use std::rc::Rc;

use once_cell::unsync::OnceCell;
use serde_json::{Map, Value};
use smol::future::{self, BoxedLocal};

use crate::behavior::children::Child;
use crate::behavior::property::PropertyBag;
use crate::view::View;
use crate::view_strategy::ViewStrategy;

/// Object that views and bindings evaluate against
pub type BindingContext = Rc<dyn ViewModel>;

pub trait ViewModel {
    fn created(&self, _view: &Rc<View>) {}

    fn bind(&self, _context: &BindingContext) {}

    fn unbind(&self) {}

    fn attached(&self) {}

    fn detached(&self) {}

    /// Catch-all notification for every bindable property
    fn property_changed(&self, _name: &str, _new_value: &Value, _old_value: &Value) {}

    /// Named change handler, e.g. `valueChanged`
    fn handle_change(&self, _handler: &str, _new_value: &Value, _old_value: &Value) {}

    /// Composition hook run before the view is created
    fn activate(&self, _model: &Value) -> BoxedLocal<()> {
        Box::pin(future::ready(()))
    }

    /// View chosen by the model itself during composition
    fn view_strategy(&self) -> Option<ViewStrategy> {
        None
    }

    /// Receives the observers backing this model's bindable properties
    fn define_properties(&self, _properties: PropertyBag) {}

    /// Observers handed over by `define_properties`, if the model kept them
    fn property_bag(&self) -> Option<PropertyBag> {
        None
    }

    fn get_property(&self, _name: &str) -> Option<Value> {
        None
    }

    /// Elements gathered by a child observer declared as `property`
    fn set_children(&self, _property: &str, _children: Vec<Child>) {}

    /// Returns false when the model has no such property
    fn set_property(&self, _name: &str, _value: Value) -> bool {
        false
    }
}

/// Identity comparison that ignores vtable pointers
pub fn same_context(a: &BindingContext, b: &BindingContext) -> bool {
    std::ptr::eq(
        Rc::as_ptr(a) as *const u8,
        Rc::as_ptr(b) as *const u8,
    )
}

pub(crate) fn same_context_opt(a: Option<&BindingContext>, b: Option<&BindingContext>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => same_context(a, b),
        (None, None) => true,
        _ => false,
    }
}

/// Plain data context backed by a JSON object. Bindable properties defined
/// on it take precedence over the object's own keys.
#[derive(Default)]
pub struct ObjectContext {
    values: RefCell<Map<String, Value>>,
    properties: OnceCell<PropertyBag>,
}

impl ObjectContext {
    pub fn new(value: Value) -> Rc<Self> {
        let values = match value {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Rc::new(ObjectContext {
            values: RefCell::new(values),
            properties: OnceCell::new(),
        })
    }

    pub fn empty() -> Rc<Self> {
        Self::new(Value::Object(Map::new()))
    }

    pub fn to_json(&self) -> Value {
        let mut map = self.values.borrow().clone();
        if let Some(properties) = self.properties.get() {
            for name in properties.names() {
                if let Some(value) = properties.get(&name) {
                    map.insert(name, value);
                }
            }
        }
        Value::Object(map)
    }
}

impl ViewModel for ObjectContext {
    fn define_properties(&self, properties: PropertyBag) {
        let _ = self.properties.set(properties);
    }

    fn property_bag(&self) -> Option<PropertyBag> {
        self.properties.get().cloned()
    }

    fn get_property(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.properties.get().and_then(|p| p.get(name)) {
            return Some(value);
        }
        self.values.borrow().get(name).cloned()
    }

    fn set_property(&self, name: &str, value: Value) -> bool {
        if let Some(properties) = self.properties.get() {
            if properties.set(name, value.clone()) {
                return true;
            }
        }
        self.values.borrow_mut().insert(name.to_string(), value);
        true
    }
}
