//! Controller
//!
//! Pairs one behavior with one model instance. Owns the bindings feeding
//! the model's bindable properties and, for custom elements, the element's
//! own view and the view holding its projected content.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use once_cell::unsync::OnceCell;

use super::property::BoundProperty;
use super::{Capabilities, HtmlBehaviorResource};
use crate::binding::Binding;
use crate::context::BindingContext;
use crate::error::Result;
use crate::instructions::BehaviorInstruction;
use crate::view::View;

pub struct Controller {
    behavior: Rc<HtmlBehaviorResource>,
    model: BindingContext,
    capabilities: Capabilities,
    bound_properties: Vec<BoundProperty>,
    /// Child observers with no view of their own to live in
    child_bindings: RefCell<Vec<Rc<dyn Binding>>>,
    view: OnceCell<Rc<View>>,
    content_view: OnceCell<Rc<View>>,
    is_attached: Cell<bool>,
}

impl Controller {
    /// Define the model's properties and apply the instruction's attribute
    /// values to them
    pub fn new(
        behavior: Rc<HtmlBehaviorResource>,
        model: BindingContext,
        instruction: &BehaviorInstruction,
    ) -> Result<Rc<Self>> {
        let state = behavior.state()?;
        let capabilities = state.model.capabilities();
        let handles_bind = capabilities.contains(Capabilities::BIND);
        let properties = behavior.ensure_properties_defined(&model)?;

        let mut bound_properties = Vec::new();
        for property in &state.properties {
            property.initialize(
                &model,
                &state.model,
                &state.task_queue,
                &properties,
                instruction.attributes.as_ref(),
                handles_bind,
                &mut bound_properties,
            );
        }

        Ok(Rc::new(Controller {
            behavior,
            model,
            capabilities,
            bound_properties,
            child_bindings: RefCell::new(Vec::new()),
            view: OnceCell::new(),
            content_view: OnceCell::new(),
            is_attached: Cell::new(false),
        }))
    }

    pub fn behavior(&self) -> &Rc<HtmlBehaviorResource> {
        &self.behavior
    }

    pub fn model(&self) -> &BindingContext {
        &self.model
    }

    pub fn view(&self) -> Option<Rc<View>> {
        self.view.get().cloned()
    }

    pub(crate) fn set_view(&self, view: Rc<View>) {
        let _ = self.view.set(view);
    }

    pub fn content_view(&self) -> Option<Rc<View>> {
        self.content_view.get().cloned()
    }

    pub(crate) fn set_content_view(&self, view: Rc<View>) {
        let _ = self.content_view.set(view);
    }

    pub(crate) fn add_child_bindings(&self, bindings: Vec<Rc<dyn Binding>>) {
        self.child_bindings.borrow_mut().extend(bindings);
    }

    pub fn is_attached(&self) -> bool {
        self.is_attached.get()
    }

    pub fn created(&self, owning_view: &Rc<View>) {
        if self.capabilities.contains(Capabilities::CREATED) {
            self.model.created(owning_view);
        }
    }

    /// Bind the property bindings against `context`, then the model, then
    /// the element's own view against the model
    pub fn bind(&self, context: Option<&BindingContext>) {
        let handles_bind = self.capabilities.contains(Capabilities::BIND);

        let child_bindings = self.child_bindings.borrow().clone();
        for binding in child_bindings {
            binding.bind(&self.model);
        }

        for property in &self.bound_properties {
            let observer = &property.observer;
            observer.set_publishing(false);
            let saved = handles_bind.then(|| observer.take_self_subscriber());

            if let Some(context) = context {
                property.binding.bind(context);
            }
            observer.call();

            observer.set_publishing(true);
            if let Some(saved) = saved {
                observer.replace_self_subscriber(saved);
            }
        }

        if handles_bind {
            if let Some(context) = context {
                self.model.bind(context);
            }
        }

        if let Some(view) = self.view.get() {
            view.bind(&self.model);
        }
    }

    pub fn unbind(&self) {
        if let Some(view) = self.view.get() {
            view.unbind();
        }

        if self.capabilities.contains(Capabilities::UNBIND) {
            self.model.unbind();
        }

        for property in &self.bound_properties {
            property.binding.unbind();
        }

        let child_bindings = self.child_bindings.borrow().clone();
        for binding in child_bindings {
            binding.unbind();
        }
    }

    pub fn attached(&self) {
        if self.is_attached.replace(true) {
            return;
        }

        if self.capabilities.contains(Capabilities::ATTACHED) {
            self.model.attached();
        }

        if let Some(view) = self.view.get() {
            view.attached();
        }
    }

    pub fn detached(&self) {
        if !self.is_attached.replace(false) {
            return;
        }

        if let Some(view) = self.view.get() {
            view.detached();
        }

        if self.capabilities.contains(Capabilities::DETACHED) {
            self.model.detached();
        }
    }
}
