//! Child Observers
//!
//! A behavior can collect the elements under its host that match a
//! selector. On bind the matches are gathered, in document order, and
//! handed to the model; custom elements among them are represented by
//! their view model. There is no mutation tracking: the list reflects the
//! host's subtree as it was when the binding was bound.

use std::rc::{Rc, Weak};

use serde_json::Value;

use super::ModelType;
use crate::binding::Binding;
use crate::container::Container;
use crate::context::{BindingContext, ViewModel};
use crate::dom::{Document, NodeId};
use crate::error::Result;
use crate::selector::SelectorList;

/// One match of a child observer
#[derive(Clone)]
pub enum Child {
    /// View model of a custom element
    Model(BindingContext),
    Node(NodeId),
}

impl Child {
    pub fn model(&self) -> Option<&BindingContext> {
        match self {
            Child::Model(model) => Some(model),
            Child::Node(_) => None,
        }
    }

    pub fn node(&self) -> Option<NodeId> {
        match self {
            Child::Node(node) => Some(*node),
            Child::Model(_) => None,
        }
    }
}

/// Declared on a behavior: fill `name` with the host's descendants
/// matching `selector`
#[derive(Debug, Clone)]
pub struct ChildObserver {
    name: String,
    selector: String,
    change_handler: Option<String>,
}

impl ChildObserver {
    pub fn new(name: &str, selector: &str) -> Self {
        ChildObserver {
            name: name.to_string(),
            selector: selector.to_string(),
            change_handler: None,
        }
    }

    /// Defaults to `{name}Changed`
    pub fn with_change_handler(mut self, handler: &str) -> Self {
        self.change_handler = Some(handler.to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    pub fn change_handler(&self) -> String {
        self.change_handler
            .clone()
            .unwrap_or_else(|| format!("{}Changed", self.name))
    }

    pub(crate) fn compile(&self) -> Result<CompiledChildObserver> {
        Ok(CompiledChildObserver {
            name: self.name.clone(),
            selector: Rc::new(SelectorList::parse(&self.selector)?),
            change_handler: self.change_handler(),
        })
    }
}

/// A `ChildObserver` with its selector parsed
pub(crate) struct CompiledChildObserver {
    name: String,
    selector: Rc<SelectorList>,
    change_handler: String,
}

impl CompiledChildObserver {
    pub fn create(
        &self,
        container: &Rc<Container>,
        document: Document,
        target: NodeId,
        model: &BindingContext,
        model_type: &ModelType,
    ) -> Rc<dyn Binding> {
        Rc::new(ChildObserverBinder {
            document,
            container: container.clone(),
            target,
            property: self.name.clone(),
            selector: self.selector.clone(),
            model: Rc::downgrade(model),
            change_handler: model_type
                .declares(&self.change_handler)
                .then(|| self.change_handler.clone()),
        })
    }
}

struct ChildObserverBinder {
    document: Document,
    container: Rc<Container>,
    target: NodeId,
    property: String,
    selector: Rc<SelectorList>,
    model: Weak<dyn ViewModel>,
    change_handler: Option<String>,
}

impl ChildObserverBinder {
    fn collect(&self) -> Vec<Child> {
        self.document
            .descendants(self.target)
            .into_iter()
            .filter(|node| self.selector.matches(&self.document, *node))
            .map(|node| match self.container.controller_for(node) {
                Some(controller) => Child::Model(controller.model().clone()),
                None => Child::Node(node),
            })
            .collect()
    }
}

impl Binding for ChildObserverBinder {
    fn bind(&self, _source: &BindingContext) {
        let Some(model) = self.model.upgrade() else {
            return;
        };

        let children = self.collect();
        tracing::trace!(property = %self.property, count = children.len(), "collected child elements");
        model.set_children(&self.property, children);

        if let Some(handler) = &self.change_handler {
            model.handle_change(handler, &Value::Array(Vec::new()), &Value::Null);
        }
    }

    /// Nothing is observed between binds
    fn unbind(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ObjectContext;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Collector {
        children: RefCell<Vec<Child>>,
        handled: RefCell<Vec<String>>,
    }

    impl ViewModel for Collector {
        fn set_children(&self, _property: &str, children: Vec<Child>) {
            *self.children.borrow_mut() = children;
        }

        fn handle_change(&self, handler: &str, _new_value: &Value, _old_value: &Value) {
            self.handled.borrow_mut().push(handler.to_string());
        }
    }

    #[test]
    fn test_collects_matching_descendants_in_order() {
        let document = Document::new();
        let fragment = document
            .parse_fragment(r#"<ul><li class="tab">a</li><li>b</li><li><span class="tab">c</span></li></ul>"#)
            .unwrap();
        let list = document.first_child(fragment).unwrap();
        let container = Container::new();
        let collector = Rc::new(Collector::default());
        let model: BindingContext = collector.clone();
        let model_type = ModelType::new("Tabs", |_| ObjectContext::empty() as BindingContext)
            .with_change_handler("tabsChanged");

        let binding = ChildObserver::new("tabs", ".tab").compile().unwrap().create(
            &container,
            document.clone(),
            list,
            &model,
            &model_type,
        );
        binding.bind(&(ObjectContext::empty() as BindingContext));

        let texts: Vec<String> = collector
            .children
            .borrow()
            .iter()
            .filter_map(Child::node)
            .map(|node| document.text_content(node))
            .collect();
        assert_eq!(texts, vec!["a", "c"]);
        assert_eq!(*collector.handled.borrow(), vec!["tabsChanged"]);
    }

    #[test]
    fn test_undeclared_handler_is_not_called() {
        let document = Document::new();
        let host = document.create_element("div");
        let collector = Rc::new(Collector::default());
        let model: BindingContext = collector.clone();
        let model_type = ModelType::new("Plain", |_| ObjectContext::empty() as BindingContext);

        let binding = ChildObserver::new("items", "p").compile().unwrap().create(
            &Container::new(),
            document,
            host,
            &model,
            &model_type,
        );
        binding.bind(&model);
        assert!(collector.children.borrow().is_empty());
        assert!(collector.handled.borrow().is_empty());
    }

    #[test]
    fn test_invalid_selector_is_rejected() {
        assert!(ChildObserver::new("items", "li:not(:not(.tab))").compile().is_err());
    }
}
