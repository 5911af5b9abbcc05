//! Binding Seams
//!
//! The compiler only needs to ask a binding language how to interpret an
//! attribute or a text node; expressions and the bindings they create stay
//! opaque. `syntax` provides a small reference language over plain property
//! paths and `${}` interpolation.

pub mod syntax;

use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::behavior::property::BehaviorPropertyObserver;
use crate::context::BindingContext;
use crate::dom::{Document, NodeId};
use crate::resources::ViewResources;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BindingMode {
    OneTime,
    #[default]
    OneWay,
    TwoWay,
}

/// Live connection between a source context and a target
pub trait Binding {
    fn bind(&self, source: &BindingContext);
    fn unbind(&self);
}

/// Compiled expression that can be instantiated against many targets
pub trait BindingExpression {
    fn create_binding(&self, target: BindingTarget) -> Rc<dyn Binding>;

    /// Human readable form for diagnostics
    fn describe(&self) -> String;
}

#[derive(Clone)]
pub enum BindingTarget {
    /// A node property: `textContent` writes character data, anything else an attribute
    Node {
        document: Document,
        node: NodeId,
        property: String,
    },
    /// A bindable property of a behavior
    Property(Rc<BehaviorPropertyObserver>),
}

impl BindingTarget {
    pub fn set_value(&self, value: &Value) {
        match self {
            BindingTarget::Node {
                document,
                node,
                property,
            } => {
                if property == "textContent" {
                    document.set_text(*node, &display_value(value));
                } else {
                    document.set_attribute(*node, property, &display_value(value));
                }
            }
            BindingTarget::Property(observer) => observer.set_value(value.clone()),
        }
    }

    pub fn get_value(&self) -> Value {
        match self {
            BindingTarget::Node {
                document,
                node,
                property,
            } => {
                let text = if property == "textContent" {
                    Some(document.text_content(*node))
                } else {
                    document.get_attribute(*node, property)
                };
                text.map(Value::String).unwrap_or(Value::Null)
            }
            BindingTarget::Property(observer) => observer.get_value(),
        }
    }
}

/// String form a value takes when written into the document
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Expression bound to a named property of the instruction target
#[derive(Clone)]
pub struct TargetExpression {
    pub expression: Rc<dyn BindingExpression>,
    pub target_property: String,
    /// Attribute removed from the element once the expression is recorded
    pub attr_to_remove: Option<String>,
}

impl TargetExpression {
    pub fn new(expression: Rc<dyn BindingExpression>, target_property: &str) -> Self {
        TargetExpression {
            expression,
            target_property: target_property.to_string(),
            attr_to_remove: None,
        }
    }

    pub fn create_binding(&self, document: &Document, node: NodeId) -> Rc<dyn Binding> {
        self.expression.create_binding(BindingTarget::Node {
            document: document.clone(),
            node,
            property: self.target_property.clone(),
        })
    }

    pub fn create_property_binding(&self, observer: Rc<BehaviorPropertyObserver>) -> Rc<dyn Binding> {
        self.expression
            .create_binding(BindingTarget::Property(observer))
    }
}

/// Value recorded for one attribute of a behavior instruction
#[derive(Clone)]
pub enum AttributeValue {
    Literal(String),
    Expression(TargetExpression),
}

impl AttributeValue {
    pub fn describe(&self) -> String {
        match self {
            AttributeValue::Literal(value) => value.clone(),
            AttributeValue::Expression(e) => {
                format!("{} -> {}", e.expression.describe(), e.target_property)
            }
        }
    }
}

/// Result of inspecting one attribute
#[derive(Clone, Default)]
pub struct AttributeInfo {
    pub attr_name: String,
    pub attr_value: String,
    pub command: Option<String>,
    pub expression: Option<Rc<dyn BindingExpression>>,
    pub default_binding_mode: Option<BindingMode>,
}

pub enum AttributeInstruction {
    /// Stands alone on the element (events, refs, plain attribute bindings)
    Discrete(TargetExpression),
    /// Values for the behavior or element property named `attr_name`
    Attribute {
        attr_name: String,
        /// The language renamed the attribute; look the behavior up again
        altered_attr: bool,
        attributes: IndexMap<String, AttributeValue>,
    },
}

pub trait BindingLanguage {
    fn inspect_attribute(
        &self,
        resources: &ViewResources,
        attr_name: &str,
        attr_value: &str,
    ) -> AttributeInfo;

    fn create_attribute_instruction(
        &self,
        resources: &ViewResources,
        document: &Document,
        element: NodeId,
        info: &AttributeInfo,
    ) -> Option<AttributeInstruction>;

    /// Interpolation expression for text content, if it contains any
    fn parse_text(&self, resources: &ViewResources, value: &str) -> Option<Rc<dyn BindingExpression>>;
}

pub trait ValueConverter {
    fn to_view(&self, value: &Value, args: &[Value]) -> Value;

    fn from_view(&self, value: &Value, _args: &[Value]) -> Value {
        value.clone()
    }
}
