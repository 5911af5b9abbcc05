//! Reference Binding Language
//!
//! Attribute commands `bind`, `one-way`, `two-way`, `one-time`, `trigger`,
//! `delegate`, `capture`, `call`, `ref` and `options`; a bare `ref="name"`;
//! `${...}` interpolation in text and attribute values; and the options
//! form `a: literal; b.bind: path` for attributes with several properties.
//! Expressions are dotted property paths, quoted strings, numbers or
//! keywords, optionally piped through value converters: `${when | date}`.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::{
    display_value, AttributeInfo, AttributeInstruction, AttributeValue, Binding, BindingExpression,
    BindingLanguage, BindingMode, BindingTarget, TargetExpression, ValueConverter,
};
use crate::behavior::property::SubscriptionId;
use crate::context::{BindingContext, ViewModel};
use crate::dom::{Document, NodeId};
use crate::resources::ViewResources;

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_$][\w$]*$").unwrap());

#[derive(Debug, Clone, Copy, Default)]
pub struct SyntaxBindingLanguage;

impl SyntaxBindingLanguage {
    pub fn new() -> Self {
        SyntaxBindingLanguage
    }

    /// Interpolation expression for an attribute value, if it contains any
    fn parse_content(
        &self,
        resources: &ViewResources,
        value: &str,
    ) -> Option<Rc<dyn BindingExpression>> {
        InterpolationExpression::parse(resources, value)
            .map(|e| Rc::new(e) as Rc<dyn BindingExpression>)
    }

    fn binding_command(
        &self,
        resources: &ViewResources,
        info: &AttributeInfo,
        mode: BindingMode,
    ) -> AttributeInstruction {
        let expression: Rc<dyn BindingExpression> = Rc::new(PropertyExpression {
            accessor: Accessor::parse(resources, &info.attr_value),
            mode,
        });
        single_attribute(&info.attr_name, TargetExpression::new(expression, &info.attr_name))
    }

    fn options(&self, resources: &ViewResources, info: &AttributeInfo) -> AttributeInstruction {
        let mut attributes = IndexMap::new();

        for segment in info.attr_value.split(';') {
            let Some((name, value)) = segment.split_once(':') else {
                continue;
            };
            let name = name.trim();
            let value = value.trim();
            if name.is_empty() {
                continue;
            }

            let inner = self.inspect_attribute(resources, name, value);
            let property = inner.attr_name.clone();

            let attribute = match (&inner.expression, inner.command.as_deref()) {
                (Some(expression), _) => {
                    AttributeValue::Expression(TargetExpression::new(expression.clone(), &property))
                }
                (None, Some(command)) => match command_mode(command, inner.default_binding_mode) {
                    Some(mode) => {
                        let expression: Rc<dyn BindingExpression> = Rc::new(PropertyExpression {
                            accessor: Accessor::parse(resources, value),
                            mode,
                        });
                        AttributeValue::Expression(TargetExpression::new(expression, &property))
                    }
                    None => AttributeValue::Literal(value.to_string()),
                },
                (None, None) => AttributeValue::Literal(value.to_string()),
            };
            attributes.insert(property, attribute);
        }

        AttributeInstruction::Attribute {
            attr_name: info.attr_name.clone(),
            altered_attr: false,
            attributes,
        }
    }
}

fn single_attribute(attr_name: &str, expression: TargetExpression) -> AttributeInstruction {
    let mut attributes = IndexMap::new();
    attributes.insert(attr_name.to_string(), AttributeValue::Expression(expression));
    AttributeInstruction::Attribute {
        attr_name: attr_name.to_string(),
        altered_attr: false,
        attributes,
    }
}

fn command_mode(command: &str, default_mode: Option<BindingMode>) -> Option<BindingMode> {
    match command {
        "bind" => Some(default_mode.unwrap_or(BindingMode::OneWay)),
        "one-way" => Some(BindingMode::OneWay),
        "two-way" => Some(BindingMode::TwoWay),
        "one-time" => Some(BindingMode::OneTime),
        _ => None,
    }
}

fn is_two_way(document: &Document, element: NodeId, attr_name: &str) -> bool {
    let tag = document.tag_name(element).unwrap_or_default();
    match attr_name {
        "value" => matches!(tag.as_str(), "input" | "textarea" | "select"),
        "checked" => tag == "input",
        _ => false,
    }
}

impl BindingLanguage for SyntaxBindingLanguage {
    fn inspect_attribute(
        &self,
        resources: &ViewResources,
        attr_name: &str,
        attr_value: &str,
    ) -> AttributeInfo {
        let mut info = AttributeInfo {
            attr_name: attr_name.to_string(),
            attr_value: attr_value.to_string(),
            ..Default::default()
        };

        match attr_name.rsplit_once('.') {
            Some((name, command)) => {
                info.attr_name = name.trim().to_string();
                if command.trim() == "ref" {
                    info.expression = Some(Rc::new(RefExpression {
                        name: attr_value.trim().to_string(),
                    }));
                    info.attr_name = "ref".to_string();
                } else {
                    info.command = Some(command.trim().to_string());
                }
            }
            None if attr_name == "ref" => {
                info.expression = Some(Rc::new(RefExpression {
                    name: attr_value.trim().to_string(),
                }));
            }
            None => info.expression = self.parse_content(resources, attr_value),
        }

        info
    }

    fn create_attribute_instruction(
        &self,
        resources: &ViewResources,
        document: &Document,
        element: NodeId,
        info: &AttributeInfo,
    ) -> Option<AttributeInstruction> {
        if let Some(expression) = &info.expression {
            let target = TargetExpression::new(expression.clone(), &info.attr_name);
            if info.attr_name == "ref" {
                return Some(AttributeInstruction::Discrete(target));
            }
            return Some(single_attribute(&info.attr_name, target));
        }

        let command = info.command.as_deref()?;
        match command {
            "bind" => {
                let mode = info.default_binding_mode.unwrap_or_else(|| {
                    if is_two_way(document, element, &info.attr_name) {
                        BindingMode::TwoWay
                    } else {
                        BindingMode::OneWay
                    }
                });
                Some(self.binding_command(resources, info, mode))
            }
            "one-way" => Some(self.binding_command(resources, info, BindingMode::OneWay)),
            "two-way" => Some(self.binding_command(resources, info, BindingMode::TwoWay)),
            "one-time" => Some(self.binding_command(resources, info, BindingMode::OneTime)),
            "trigger" | "delegate" | "capture" | "call" => {
                let expression: Rc<dyn BindingExpression> = Rc::new(ListenerExpression {
                    event: info.attr_name.clone(),
                    handler: info.attr_value.trim().to_string(),
                    strategy: command.to_string(),
                });
                Some(AttributeInstruction::Discrete(TargetExpression::new(
                    expression,
                    &info.attr_name,
                )))
            }
            "options" => Some(self.options(resources, info)),
            _ => {
                tracing::warn!(command, attribute = %info.attr_name, "unknown binding command");
                None
            }
        }
    }

    fn parse_text(&self, resources: &ViewResources, value: &str) -> Option<Rc<dyn BindingExpression>> {
        self.parse_content(resources, value)
    }
}

// ===== Expressions =====

#[derive(Clone)]
enum Accessor {
    Literal(Value),
    Path {
        segments: Vec<String>,
        converters: Vec<(String, Option<Rc<dyn ValueConverter>>)>,
        source: String,
    },
}

impl Accessor {
    fn parse(resources: &ViewResources, source: &str) -> Self {
        let mut parts = source.split('|');
        let path = parts.next().unwrap_or("").trim();

        let literal = if (path.starts_with('\'') && path.ends_with('\'') && path.len() >= 2)
            || (path.starts_with('"') && path.ends_with('"') && path.len() >= 2)
        {
            Some(Value::String(path[1..path.len() - 1].to_string()))
        } else if let Ok(number) = path.parse::<f64>() {
            serde_json::Number::from_f64(number).map(Value::Number)
        } else {
            match path {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                "null" => Some(Value::Null),
                _ => None,
            }
        };
        if let Some(value) = literal {
            return Accessor::Literal(value);
        }

        let segments: Vec<String> = path
            .split('.')
            .map(|s| s.trim().to_string())
            .filter(|s| IDENTIFIER.is_match(s))
            .collect();
        if segments.is_empty() {
            tracing::warn!(expression = source, "unsupported binding expression");
        }

        let converters = parts
            .map(|name| {
                let name = name.trim().to_string();
                let converter = resources.get_value_converter(&name);
                if converter.is_none() {
                    tracing::warn!(converter = %name, "value converter not registered");
                }
                (name, converter)
            })
            .collect();

        Accessor::Path {
            segments,
            converters,
            source: source.trim().to_string(),
        }
    }

    fn evaluate(&self, context: &dyn ViewModel) -> Value {
        match self {
            Accessor::Literal(value) => value.clone(),
            Accessor::Path {
                segments,
                converters,
                ..
            } => {
                let mut iter = segments.iter();
                let mut value = match iter.next().and_then(|first| context.get_property(first)) {
                    Some(value) => value,
                    None => Value::Null,
                };
                for segment in iter {
                    value = value.get(segment.as_str()).cloned().unwrap_or(Value::Null);
                }
                for (_, converter) in converters {
                    if let Some(converter) = converter {
                        value = converter.to_view(&value, &[]);
                    }
                }
                value
            }
        }
    }

    /// Write back into the source; only single-segment paths are assignable
    fn assign(&self, context: &dyn ViewModel, value: Value) {
        if let Accessor::Path {
            segments,
            converters,
            ..
        } = self
        {
            if segments.len() != 1 {
                return;
            }
            let mut value = value;
            for (_, converter) in converters.iter().rev() {
                if let Some(converter) = converter {
                    value = converter.from_view(&value, &[]);
                }
            }
            context.set_property(&segments[0], value);
        }
    }

    fn describe(&self) -> String {
        match self {
            Accessor::Literal(value) => value.to_string(),
            Accessor::Path { source, .. } => source.clone(),
        }
    }
}

struct PropertyExpression {
    accessor: Accessor,
    mode: BindingMode,
}

impl BindingExpression for PropertyExpression {
    fn create_binding(&self, target: BindingTarget) -> Rc<dyn Binding> {
        Rc::new(PropertyBinding {
            accessor: self.accessor.clone(),
            mode: self.mode,
            target,
            source: RefCell::new(None),
            subscription: Cell::new(None),
        })
    }

    fn describe(&self) -> String {
        let mode = match self.mode {
            BindingMode::OneTime => "one-time",
            BindingMode::OneWay => "one-way",
            BindingMode::TwoWay => "two-way",
        };
        format!("{} ({})", self.accessor.describe(), mode)
    }
}

/// Evaluates once per bind. Two-way bindings onto behavior properties
/// also push property changes back into the source.
struct PropertyBinding {
    accessor: Accessor,
    mode: BindingMode,
    target: BindingTarget,
    source: RefCell<Option<BindingContext>>,
    subscription: Cell<Option<SubscriptionId>>,
}

impl Binding for PropertyBinding {
    fn bind(&self, source: &BindingContext) {
        self.target.set_value(&self.accessor.evaluate(source.as_ref()));
        *self.source.borrow_mut() = Some(source.clone());

        if self.mode == BindingMode::TwoWay {
            if let BindingTarget::Property(observer) = &self.target {
                let weak: Weak<dyn ViewModel> = Rc::downgrade(source);
                let accessor = self.accessor.clone();
                let id = observer.subscribe(Rc::new(move |new_value: &Value, _old: &Value| {
                    if let Some(source) = weak.upgrade() {
                        accessor.assign(source.as_ref(), new_value.clone());
                    }
                }));
                if let Some(previous) = self.subscription.replace(Some(id)) {
                    observer.unsubscribe(previous);
                }
            }
        }
    }

    fn unbind(&self) {
        self.source.borrow_mut().take();
        if let (Some(id), BindingTarget::Property(observer)) = (self.subscription.take(), &self.target) {
            observer.unsubscribe(id);
        }
    }
}

#[derive(Clone)]
enum InterpolationPart {
    Text(String),
    Expression(Accessor),
}

#[derive(Clone)]
struct InterpolationExpression {
    parts: Vec<InterpolationPart>,
}

impl InterpolationExpression {
    fn parse(resources: &ViewResources, value: &str) -> Option<Self> {
        if !value.contains("${") {
            return None;
        }

        let mut parts = Vec::new();
        let mut rest = value;
        while let Some(start) = rest.find("${") {
            let Some(len) = rest[start + 2..].find('}') else {
                break;
            };
            if start > 0 {
                parts.push(InterpolationPart::Text(rest[..start].to_string()));
            }
            let inner = &rest[start + 2..start + 2 + len];
            parts.push(InterpolationPart::Expression(Accessor::parse(resources, inner)));
            rest = &rest[start + 2 + len + 1..];
        }
        if !rest.is_empty() {
            parts.push(InterpolationPart::Text(rest.to_string()));
        }

        parts
            .iter()
            .any(|p| matches!(p, InterpolationPart::Expression(_)))
            .then_some(InterpolationExpression { parts })
    }

    fn evaluate(&self, context: &dyn ViewModel) -> String {
        self.parts
            .iter()
            .map(|part| match part {
                InterpolationPart::Text(text) => text.clone(),
                InterpolationPart::Expression(accessor) => display_value(&accessor.evaluate(context)),
            })
            .collect()
    }
}

impl BindingExpression for InterpolationExpression {
    fn create_binding(&self, target: BindingTarget) -> Rc<dyn Binding> {
        Rc::new(InterpolationBinding {
            expression: self.clone(),
            target,
        })
    }

    fn describe(&self) -> String {
        self.parts
            .iter()
            .map(|part| match part {
                InterpolationPart::Text(text) => text.clone(),
                InterpolationPart::Expression(accessor) => format!("${{{}}}", accessor.describe()),
            })
            .collect()
    }
}

struct InterpolationBinding {
    expression: InterpolationExpression,
    target: BindingTarget,
}

impl Binding for InterpolationBinding {
    fn bind(&self, source: &BindingContext) {
        let text = self.expression.evaluate(source.as_ref());
        self.target.set_value(&Value::String(text));
    }

    fn unbind(&self) {}
}

/// Event bindings have no event source in this document model; binding
/// only records the context the handler would run against
struct ListenerExpression {
    event: String,
    handler: String,
    strategy: String,
}

impl BindingExpression for ListenerExpression {
    fn create_binding(&self, _target: BindingTarget) -> Rc<dyn Binding> {
        Rc::new(ListenerBinding {
            source: RefCell::new(None),
        })
    }

    fn describe(&self) -> String {
        format!("{}.{}=\"{}\"", self.event, self.strategy, self.handler)
    }
}

struct ListenerBinding {
    source: RefCell<Option<BindingContext>>,
}

impl Binding for ListenerBinding {
    fn bind(&self, source: &BindingContext) {
        *self.source.borrow_mut() = Some(source.clone());
    }

    fn unbind(&self) {
        self.source.borrow_mut().take();
    }
}

/// `ref="name"`: stores the target node's id on the context
struct RefExpression {
    name: String,
}

impl BindingExpression for RefExpression {
    fn create_binding(&self, target: BindingTarget) -> Rc<dyn Binding> {
        Rc::new(RefBinding {
            name: self.name.clone(),
            target,
            source: RefCell::new(None),
        })
    }

    fn describe(&self) -> String {
        format!("ref {}", self.name)
    }
}

struct RefBinding {
    name: String,
    target: BindingTarget,
    source: RefCell<Option<BindingContext>>,
}

impl Binding for RefBinding {
    fn bind(&self, source: &BindingContext) {
        if let BindingTarget::Node { node, .. } = &self.target {
            source.set_property(&self.name, Value::from(node.index()));
        }
        *self.source.borrow_mut() = Some(source.clone());
    }

    fn unbind(&self) {
        if let Some(source) = self.source.borrow_mut().take() {
            source.set_property(&self.name, Value::Null);
        }
    }
}
