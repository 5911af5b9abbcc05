//! Composition
//!
//! Renders a view model, a view, or both into a view slot at runtime,
//! replacing whatever the slot showed before.

use std::rc::Rc;

use serde_json::Value;
use smol::future::BoxedLocal;

use crate::behavior::controller::Controller;
use crate::behavior::{BehaviorBuilder, Capabilities, HtmlBehaviorResource, ModelType};
use crate::container::Container;
use crate::context::BindingContext;
use crate::dom::NodeId;
use crate::error::{Result, TemplatingError};
use crate::instructions::{BehaviorInstruction, ViewCompileInstruction, ViewCreateInstruction};
use crate::resources::ViewResources;
use crate::view::View;
use crate::view_engine::ViewEngine;
use crate::view_slot::ViewSlot;
use crate::view_strategy::ViewStrategy;

/// Where the view model comes from
#[derive(Clone)]
pub enum ViewModelSource {
    /// Module id, relative to the composing view's url
    Module(String),
    Instance { model: BindingContext, model_type: ModelType },
}

/// What to compose and where
#[derive(Clone)]
pub struct CompositionContext {
    pub container: Rc<Container>,
    pub child_container: Option<Rc<Container>>,
    pub view_slot: Rc<ViewSlot>,
    pub view_resources: Option<Rc<ViewResources>>,
    pub binding_context: Option<BindingContext>,
    pub view: Option<ViewStrategy>,
    pub view_model: Option<ViewModelSource>,
    /// Passed to the view model's `activate`
    pub model: Option<Value>,
    /// Unbound once the new controller is in place
    pub current_controller: Option<Rc<Controller>>,
    pub skip_activation: bool,
    pub host: Option<NodeId>,
}

impl CompositionContext {
    pub fn new(container: Rc<Container>, view_slot: Rc<ViewSlot>) -> Self {
        CompositionContext {
            container,
            child_container: None,
            view_slot,
            view_resources: None,
            binding_context: None,
            view: None,
            view_model: None,
            model: None,
            current_controller: None,
            skip_activation: false,
            host: None,
        }
    }

    pub fn with_view(mut self, view: impl Into<ViewStrategy>) -> Self {
        self.view = Some(view.into());
        self
    }

    pub fn with_view_model(mut self, source: ViewModelSource) -> Self {
        self.view_model = Some(source);
        self
    }

    pub fn with_model(mut self, model: Value) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_binding_context(mut self, context: BindingContext) -> Self {
        self.binding_context = Some(context);
        self
    }

    pub fn with_view_resources(mut self, resources: Rc<ViewResources>) -> Self {
        self.view_resources = Some(resources);
        self
    }
}

/// Result of a composition
pub enum Composed {
    Controller(Rc<Controller>),
    View(Rc<View>),
    /// Nothing to compose; the slot was emptied
    Cleared,
}

pub struct CompositionEngine {
    view_engine: Rc<ViewEngine>,
}

/// A view model ready for controller creation
struct ResolvedViewModel {
    model: BindingContext,
    model_type: ModelType,
    behavior: Option<Rc<HtmlBehaviorResource>>,
}

impl CompositionEngine {
    pub fn new(view_engine: Rc<ViewEngine>) -> Self {
        CompositionEngine { view_engine }
    }

    pub fn compose(&self, mut context: CompositionContext) -> BoxedLocal<Result<Composed>> {
        let engine = self.view_engine.clone();
        Box::pin(async move {
            let child_container = context
                .child_container
                .get_or_insert_with(|| context.container.create_child())
                .clone();

            match context.view_model.clone() {
                Some(ViewModelSource::Module(module_id)) => {
                    let module_id = match &context.view_resources {
                        Some(resources) => resources.relative_to_view(&module_id),
                        None => module_id,
                    };
                    let resource = engine.import_view_model_resource(&module_id, None).await?;
                    let (Some(behavior), Some(model_type)) = (resource.behavior(), resource.model_type())
                    else {
                        return Err(TemplatingError::NoViewModel { module: module_id });
                    };

                    let model = model_type.create(&child_container);
                    child_container.set_view_model(model.clone());
                    let resolved = ResolvedViewModel {
                        model,
                        model_type: model_type.clone(),
                        behavior: Some(behavior.clone()),
                    };
                    create_controller_and_swap(&engine, &context, &child_container, resolved).await
                }
                Some(ViewModelSource::Instance { model, model_type }) => {
                    let resolved = ResolvedViewModel {
                        model,
                        model_type,
                        behavior: None,
                    };
                    create_controller_and_swap(&engine, &context, &child_container, resolved).await
                }
                None => match context.view.clone() {
                    Some(mut view) => {
                        if let Some(url) = context.view_resources.as_ref().and_then(|r| r.view_url()) {
                            view.make_relative_to(url);
                        }

                        let factory = view
                            .load_view_factory(engine.clone(), ViewCompileInstruction::default(), None)
                            .await?;
                        context.view_slot.remove_all(true, false).wait().await;

                        let Some(factory) = factory else {
                            return Ok(Composed::Cleared);
                        };
                        let created = factory.create(
                            &child_container,
                            context.binding_context.as_ref(),
                            &ViewCreateInstruction::new(),
                            None,
                        )?;
                        context.view_slot.add(created.clone());
                        Ok(Composed::View(created))
                    }
                    None => {
                        context.view_slot.remove_all(false, false);
                        Ok(Composed::Cleared)
                    }
                },
            }
        })
    }
}

async fn create_controller_and_swap(
    engine: &Rc<ViewEngine>,
    context: &CompositionContext,
    child_container: &Rc<Container>,
    view_model: ResolvedViewModel,
) -> Result<Composed> {
    context.view_slot.remove_all(true, false).wait().await;

    let controller = create_controller(engine, context, child_container, view_model).await?;

    if let Some(current) = &context.current_controller {
        current.unbind();
    }

    if let Some(view) = controller.view() {
        view.bind(controller.model());
        context.view_slot.add(view);
    }
    Ok(Composed::Controller(controller))
}

async fn create_controller(
    engine: &Rc<ViewEngine>,
    context: &CompositionContext,
    child_container: &Rc<Container>,
    view_model: ResolvedViewModel,
) -> Result<Rc<Controller>> {
    let ResolvedViewModel {
        model,
        model_type,
        behavior,
    } = view_model;
    let capabilities = model_type.capabilities();

    if !context.skip_activation && capabilities.contains(Capabilities::ACTIVATE) {
        model
            .activate(context.model.as_ref().unwrap_or(&Value::Null))
            .await;
    }

    let mut view = context.view.clone();
    let from_model = view.is_none() && capabilities.contains(Capabilities::VIEW_STRATEGY);
    if from_model {
        view = model.view_strategy();
    }
    if let Some(view) = &mut view {
        let base = if from_model {
            model_type.module_id().map(str::to_string)
        } else {
            context
                .view_resources
                .as_ref()
                .and_then(|r| r.view_url())
                .map(str::to_string)
        };
        if let Some(base) = base {
            view.make_relative_to(&base);
        }
    }

    let behavior = match behavior {
        Some(behavior) => behavior,
        None => BehaviorBuilder::new()
            .element("dynamic-element")
            .build(child_container, model_type)?,
    };

    let factory = behavior
        .clone()
        .load(engine.clone(), view, true, None)
        .await?;
    let instruction = BehaviorInstruction::dynamic(context.host, model, factory);
    behavior.create(child_container, &instruction, None)
}
