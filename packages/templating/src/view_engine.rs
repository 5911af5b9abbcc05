//! View Engine
//!
//! Ties loading to compilation: loads a template, imports the modules its
//! `<require>` elements name, registers their resources in a per-template
//! registry, compiles the template against it and memoizes the factory on
//! the template's registry entry.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use smol::future::BoxedLocal;

use crate::config::EngineConfig;
use crate::container::Container;
use crate::context::BindingContext;
use crate::dom::{Document, NodeId};
use crate::error::{Result, TemplatingError};
use crate::instructions::{InjectorId, ViewCompileInstruction, ViewCreateInstruction};
use crate::loader::{Loader, ResourceLoadContext, TemplateRegistryEntry};
use crate::module_analyzer::{ModuleAnalyzer, ResourceDescription};
use crate::resources::ViewResources;
use crate::view::View;
use crate::view_compiler::{Instructions, TemplateSource, ViewCompiler};
use crate::view_factory::{ProxyViewFactory, ViewFactory, ViewFactoryRef};

/// A template to load: by url, or an entry that is already loaded
#[derive(Clone)]
pub enum TemplateLocation {
    Url(String),
    Entry(Rc<TemplateRegistryEntry>),
}

impl From<&str> for TemplateLocation {
    fn from(url: &str) -> Self {
        TemplateLocation::Url(url.to_string())
    }
}

impl From<Rc<TemplateRegistryEntry>> for TemplateLocation {
    fn from(entry: Rc<TemplateRegistryEntry>) -> Self {
        TemplateLocation::Entry(entry)
    }
}

pub struct ViewEngine {
    loader: Rc<dyn Loader>,
    container: Rc<Container>,
    compiler: ViewCompiler,
    module_analyzer: ModuleAnalyzer,
    app_resources: Rc<ViewResources>,
    plugin_map: RefCell<IndexMap<String, String>>,
    config: EngineConfig,
}

impl ViewEngine {
    pub fn new(
        loader: Rc<dyn Loader>,
        container: Rc<Container>,
        compiler: ViewCompiler,
        app_resources: Rc<ViewResources>,
        config: EngineConfig,
    ) -> Rc<Self> {
        let engine = ViewEngine {
            loader,
            container,
            compiler,
            module_analyzer: ModuleAnalyzer::new(),
            app_resources,
            plugin_map: RefCell::new(IndexMap::new()),
            config,
        };
        for (extension, implementation) in &engine.config.resource_plugins {
            engine.add_resource_plugin(extension, implementation);
        }
        Rc::new(engine)
    }

    pub fn loader(&self) -> &Rc<dyn Loader> {
        &self.loader
    }

    pub fn container(&self) -> &Rc<Container> {
        &self.container
    }

    pub fn compiler(&self) -> &ViewCompiler {
        &self.compiler
    }

    pub fn document(&self) -> &Document {
        self.compiler.document()
    }

    pub fn module_analyzer(&self) -> &ModuleAnalyzer {
        &self.module_analyzer
    }

    pub fn app_resources(&self) -> &Rc<ViewResources> {
        &self.app_resources
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Route `<require>`s of files ending in `extension` through a loader plugin
    pub fn add_resource_plugin(&self, extension: &str, implementation: &str) {
        let name = format!("{}-resource-plugin", extension.replacen('.', "", 1));
        self.plugin_map
            .borrow_mut()
            .insert(extension.to_string(), name.clone());
        self.loader.add_plugin(&name, implementation);
    }

    fn apply_loader_plugin(&self, id: &str) -> String {
        let Some(index) = id.rfind('.') else {
            return id.to_string();
        };
        match self.plugin_map.borrow().get(&id[index..]) {
            Some(plugin) => self.loader.apply_plugin_to_url(id, plugin),
            None => id.to_string(),
        }
    }

    /// Compile existing DOM in place and create a view over it
    pub fn enhance(
        &self,
        container: &Rc<Container>,
        element: NodeId,
        resources: &Rc<ViewResources>,
        binding_context: Option<&BindingContext>,
    ) -> Result<Rc<View>> {
        let mut instructions = Instructions::new();
        self.compiler
            .compile_node(element, resources, &mut instructions, InjectorId::ROOT, true)?;

        let factory = ViewFactory::new(
            self.document().clone(),
            element,
            instructions,
            resources.clone(),
            None,
        );
        let instruction = ViewCreateInstruction {
            enhance: true,
            ..Default::default()
        };
        factory.create(container, binding_context, &instruction, None)
    }

    /// Load and compile a template once. A template requested again by the
    /// load chain already compiling it gets a proxy that resolves when that
    /// compile finishes.
    pub fn load_view_factory(
        self: &Rc<Self>,
        location: TemplateLocation,
        instruction: ViewCompileInstruction,
        load_context: Option<Rc<ResourceLoadContext>>,
    ) -> BoxedLocal<Result<ViewFactoryRef>> {
        let engine = self.clone();
        Box::pin(async move {
            let load_context = load_context.unwrap_or_default();
            let entry = match location {
                TemplateLocation::Url(url) => engine.loader.load_template(&url).await?,
                TemplateLocation::Entry(entry) => entry,
            };
            let key = entry.address().to_string();
            let state = entry.load_state();

            if state.is_started() {
                if !load_context.has_dependency(&key) {
                    load_context.add_dependency(&key);
                    return state.wait().await.map(ViewFactoryRef::from);
                }

                let proxy = ProxyViewFactory::new(&key);
                let pending = proxy.clone();
                state.on_complete(move |outcome| {
                    if let Ok(factory) = outcome {
                        pending.resolve(factory.clone());
                    }
                });
                return Ok(ViewFactoryRef::Proxy(proxy));
            }

            load_context.add_dependency(&key);
            state.start();

            let result = engine
                .compile_entry(&entry, instruction, load_context)
                .await;
            state.complete(&result);
            result.map(ViewFactoryRef::from)
        })
    }

    async fn compile_entry(
        self: &Rc<Self>,
        entry: &Rc<TemplateRegistryEntry>,
        instruction: ViewCompileInstruction,
        load_context: Rc<ResourceLoadContext>,
    ) -> Result<Rc<ViewFactory>> {
        let resources = self
            .load_template_resources(entry, &instruction, load_context)
            .await?;
        entry.set_resources(resources.clone());

        let template = entry
            .template()
            .ok_or_else(|| TemplatingError::TemplateNotFound(entry.address().to_string()))?;
        let factory = self
            .compiler
            .compile(TemplateSource::Node(template), Some(&resources), &instruction)?;
        if self.config.default_cache_size.is_some() {
            factory.set_cache_size(self.config.default_cache_size, true);
        }

        entry.set_factory(factory.clone());
        Ok(factory)
    }

    /// Registry for one template, filled from its dependencies
    pub fn load_template_resources(
        self: &Rc<Self>,
        entry: &TemplateRegistryEntry,
        instruction: &ViewCompileInstruction,
        load_context: Rc<ResourceLoadContext>,
    ) -> BoxedLocal<Result<Rc<ViewResources>>> {
        let resources = ViewResources::new(Some(&self.app_resources), Some(entry.address()));
        let dependencies = entry.dependencies();

        if dependencies.is_empty() && instruction.associated_module_id.is_none() {
            return Box::pin(async move { Ok(resources) });
        }

        let (ids, names): (Vec<String>, Vec<Option<String>>) = dependencies
            .into_iter()
            .map(|dependency| (dependency.src, dependency.name))
            .unzip();
        tracing::debug!(address = entry.address(), ?ids, "importing resources");

        self.import_view_resources(ids, names, resources, instruction.clone(), Some(load_context))
    }

    /// Load modules, then initialize and register all of their resources
    /// before loading any of their views, so resources imported together
    /// can see each other while compiling
    pub fn import_view_resources(
        self: &Rc<Self>,
        module_ids: Vec<String>,
        names: Vec<Option<String>>,
        resources: Rc<ViewResources>,
        instruction: ViewCompileInstruction,
        load_context: Option<Rc<ResourceLoadContext>>,
    ) -> BoxedLocal<Result<Rc<ViewResources>>> {
        let load_context = load_context.unwrap_or_default();
        let module_ids: Vec<String> = module_ids
            .iter()
            .map(|id| self.apply_loader_plugin(id))
            .collect();
        let imports = self.loader.load_all_modules(&module_ids);
        let engine = self.clone();

        Box::pin(async move {
            let imports = imports.await?;

            let mut analyses = Vec::with_capacity(imports.len());
            for (index, exports) in imports.iter().enumerate() {
                let analysis = engine
                    .module_analyzer
                    .analyze(exports.module_id(), exports, None)?;
                analysis.initialize(&engine.container)?;
                let name = names.get(index).and_then(|name| name.as_deref());
                analysis.register(&resources, name)?;
                analyses.push(analysis);
            }

            if let Some(module_id) = &instruction.associated_module_id {
                if let Some(associated) = engine.module_analyzer.get_analysis(module_id) {
                    associated.register(&resources, None)?;
                }
            }

            let loads: Vec<_> = analyses
                .iter()
                .map(|analysis| analysis.load(&engine, Some(load_context.clone())))
                .collect();
            for load in loads {
                load.await?;
            }
            Ok(resources)
        })
    }

    /// The main resource of a view-model module, initialized
    pub fn import_view_model_resource(
        self: &Rc<Self>,
        module_import: &str,
        module_member: Option<&str>,
    ) -> BoxedLocal<Result<ResourceDescription>> {
        let load = self.loader.load_module(module_import);
        let engine = self.clone();
        let module_import = module_import.to_string();
        let module_member = module_member.map(str::to_string);

        Box::pin(async move {
            let exports = load.await?;
            let analysis =
                engine
                    .module_analyzer
                    .analyze(exports.module_id(), &exports, module_member.as_deref())?;
            let main = analysis
                .main_resource()
                .cloned()
                .ok_or(TemplatingError::NoViewModel { module: module_import })?;
            analysis.initialize(&engine.container)?;
            Ok(main)
        })
    }
}
