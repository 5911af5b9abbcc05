//! Module Analyzer
//!
//! Finds the resources a loaded module provides: its main custom element
//! (the view model), additional elements, attributes and value converters,
//! and an optional view strategy for the main element. Analyses are cached
//! per module id.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use smol::future::BoxedLocal;

use crate::behavior::{BehaviorBuilder, HtmlBehaviorResource, ModelType};
use crate::binding::ValueConverter;
use crate::container::Container;
use crate::error::Result;
use crate::loader::{Export, ModuleExports, Pending, ResourceLoadContext};
use crate::resources::{Resource, ValueConverterResource, ViewResources};
use crate::util::hyphenate;
use crate::view_engine::ViewEngine;
use crate::view_strategy::ViewStrategy;

#[derive(Clone)]
pub enum ResourceMetadata {
    Behavior {
        behavior: Rc<HtmlBehaviorResource>,
        model: ModelType,
    },
    ValueConverter(Rc<ValueConverterResource>),
}

/// One exported resource and what it was registered as
#[derive(Clone)]
pub struct ResourceDescription {
    key: String,
    metadata: ResourceMetadata,
}

impl ResourceDescription {
    /// Unnamed behaviors fall back to the naming convention, then to an
    /// element named after the export
    fn behavior_resource(key: &str, mut builder: BehaviorBuilder, mut model: ModelType, module_id: &str) -> Result<Self> {
        if builder.is_unnamed() && !builder.apply_convention(key) {
            builder = builder.element(&hyphenate(key));
        }
        if model.module_id().is_none() {
            model.set_module_id(module_id);
        }
        Ok(ResourceDescription {
            key: key.to_string(),
            metadata: ResourceMetadata::Behavior {
                behavior: builder.into_resource()?,
                model,
            },
        })
    }

    fn value_converter(key: &str, converter: Rc<dyn ValueConverter>, name: Option<&str>) -> Self {
        let name = name
            .map(str::to_string)
            .or_else(|| ValueConverterResource::convention(key))
            .unwrap_or_else(|| hyphenate(key));
        ResourceDescription {
            key: key.to_string(),
            metadata: ResourceMetadata::ValueConverter(ValueConverterResource::new(&name, converter)),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn metadata(&self) -> &ResourceMetadata {
        &self.metadata
    }

    pub fn behavior(&self) -> Option<&Rc<HtmlBehaviorResource>> {
        match &self.metadata {
            ResourceMetadata::Behavior { behavior, .. } => Some(behavior),
            ResourceMetadata::ValueConverter(_) => None,
        }
    }

    pub fn model_type(&self) -> Option<&ModelType> {
        match &self.metadata {
            ResourceMetadata::Behavior { model, .. } => Some(model),
            ResourceMetadata::ValueConverter(_) => None,
        }
    }

    fn is_element(&self) -> bool {
        self.behavior().is_some_and(|b| b.element_name().is_some())
    }

    pub fn initialize(&self, container: &Rc<Container>, view_strategy: Option<&ViewStrategy>) -> Result<()> {
        match &self.metadata {
            ResourceMetadata::Behavior { behavior, model } => {
                behavior.set_view_strategy(view_strategy.cloned());
                behavior.initialize(container, model.clone())
            }
            ResourceMetadata::ValueConverter(_) => Ok(()),
        }
    }

    pub fn register(&self, registry: &ViewResources, name: Option<&str>) -> Result<()> {
        match &self.metadata {
            ResourceMetadata::Behavior { behavior, .. } => behavior.clone().register(registry, name),
            ResourceMetadata::ValueConverter(converter) => converter.clone().register(registry, name),
        }
    }

    pub fn load(
        &self,
        engine: &Rc<ViewEngine>,
        load_context: Option<Rc<ResourceLoadContext>>,
    ) -> BoxedLocal<Result<()>> {
        match &self.metadata {
            ResourceMetadata::Behavior { behavior, .. } => {
                let load = behavior.clone().load(engine.clone(), None, false, load_context);
                Box::pin(async move { load.await.map(|_| ()) })
            }
            ResourceMetadata::ValueConverter(_) => Box::pin(async { Ok(()) }),
        }
    }
}

/// The analyzed resources of one module
pub struct ResourceModule {
    id: String,
    main_resource: Option<ResourceDescription>,
    resources: Vec<ResourceDescription>,
    view_strategy: Option<ViewStrategy>,
    is_initialized: Cell<bool>,
    loaded: Pending<()>,
}

impl ResourceModule {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn main_resource(&self) -> Option<&ResourceDescription> {
        self.main_resource.as_ref()
    }

    pub fn resources(&self) -> &[ResourceDescription] {
        &self.resources
    }

    pub fn view_strategy(&self) -> Option<&ViewStrategy> {
        self.view_strategy.as_ref()
    }

    fn all(&self) -> impl Iterator<Item = &ResourceDescription> {
        self.main_resource.iter().chain(self.resources.iter())
    }

    /// Initialize every resource once, handing the module's view strategy
    /// to each behavior
    pub fn initialize(&self, container: &Rc<Container>) -> Result<()> {
        if self.is_initialized.replace(true) {
            return Ok(());
        }
        for resource in self.all() {
            resource.initialize(container, self.view_strategy.as_ref())?;
        }
        Ok(())
    }

    /// `name` aliases only the first resource
    pub fn register(&self, registry: &ViewResources, name: Option<&str>) -> Result<()> {
        let mut name = name;
        for resource in self.all() {
            resource.register(registry, name)?;
            name = None;
        }
        Ok(())
    }

    /// Load every resource's view; concurrent callers share one load
    pub fn load(
        self: &Rc<Self>,
        engine: &Rc<ViewEngine>,
        load_context: Option<Rc<ResourceLoadContext>>,
    ) -> BoxedLocal<Result<()>> {
        if !self.loaded.start() {
            return self.loaded.wait();
        }

        let loads: Vec<_> = self
            .all()
            .map(|resource| resource.load(engine, load_context.clone()))
            .collect();
        let module = self.clone();
        Box::pin(async move {
            let mut result = Ok(());
            for load in loads {
                if let Err(err) = load.await {
                    result = Err(err);
                    break;
                }
            }
            module.loaded.complete(&result);
            result
        })
    }
}

#[derive(Default)]
pub struct ModuleAnalyzer {
    cache: RefCell<HashMap<String, Rc<ResourceModule>>>,
}

impl ModuleAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_analysis(&self, module_id: &str) -> Option<Rc<ResourceModule>> {
        self.cache.borrow().get(module_id).cloned()
    }

    /// Classify the exports of `module_id`. With `view_model_member` that
    /// export is the main resource; otherwise the first custom element is,
    /// falling back to the first plain model type.
    pub fn analyze(
        &self,
        module_id: &str,
        exports: &ModuleExports,
        view_model_member: Option<&str>,
    ) -> Result<Rc<ResourceModule>> {
        if let Some(module) = self.get_analysis(module_id) {
            return Ok(module);
        }

        let mut main_resource = None;
        let mut resources = Vec::new();
        let mut view_strategy = None;
        let mut fallback = None;

        if let Some(member) = view_model_member {
            main_resource = match exports.get(member) {
                Some(Export::Behavior { model, behavior }) => Some(ResourceDescription::behavior_resource(
                    member,
                    behavior.clone(),
                    model.clone(),
                    module_id,
                )?),
                Some(Export::Model(model)) => Some(ResourceDescription::behavior_resource(
                    member,
                    BehaviorBuilder::new().element(&hyphenate(member)),
                    model.clone(),
                    module_id,
                )?),
                _ => None,
            };
        }

        for (key, export) in exports.iter() {
            if Some(key.as_str()) == view_model_member {
                continue;
            }

            let description = match export {
                Export::Behavior { model, behavior } => {
                    ResourceDescription::behavior_resource(key, behavior.clone(), model.clone(), module_id)?
                }
                Export::ValueConverter { converter, name } => {
                    ResourceDescription::value_converter(key, converter.clone(), name.as_deref())
                }
                Export::ViewStrategy(strategy) => {
                    view_strategy = Some(strategy.clone());
                    continue;
                }
                Export::Template(entry) => {
                    view_strategy = Some(ViewStrategy::TemplateRegistry {
                        module_id: Some(module_id.to_string()),
                        entry: entry.clone(),
                    });
                    continue;
                }
                Export::Model(model) => match BehaviorBuilder::convention(key) {
                    Some(builder) => ResourceDescription::behavior_resource(key, builder, model.clone(), module_id)?,
                    None => {
                        if fallback.is_none() {
                            fallback = Some((key.clone(), model.clone()));
                        }
                        continue;
                    }
                },
                Export::Value(_) => continue,
            };

            if main_resource.is_none() && description.is_element() {
                main_resource = Some(description);
            } else {
                resources.push(description);
            }
        }

        if main_resource.is_none() {
            if let Some((key, model)) = fallback {
                let builder = BehaviorBuilder::new().element(&hyphenate(&key));
                main_resource = Some(ResourceDescription::behavior_resource(&key, builder, model, module_id)?);
            }
        }

        tracing::trace!(
            module_id,
            main = main_resource.as_ref().map(|r| r.key()),
            resources = resources.len(),
            "analyzed module"
        );

        let module = Rc::new(ResourceModule {
            id: module_id.to_string(),
            main_resource,
            resources,
            view_strategy,
            is_initialized: Cell::new(false),
            loaded: Pending::new(),
        });
        self.cache
            .borrow_mut()
            .insert(module_id.to_string(), module.clone());
        Ok(module)
    }
}
