//! View Strategies
//!
//! How a custom element (or a composition) finds its view: an explicit url,
//! the url derived from the model's module id, an already loaded registry
//! entry, inline markup, or no view at all.

use std::cell::RefCell;
use std::rc::Rc;

use smol::future::BoxedLocal;

use crate::behavior::ModelType;
use crate::error::{Result, TemplatingError};
use crate::instructions::ViewCompileInstruction;
use crate::loader::{ResourceLoadContext, TemplateRegistryEntry};
use crate::util::relative_to_file;
use crate::view_engine::{TemplateLocation, ViewEngine};
use crate::view_factory::ViewFactoryRef;

/// `.js`/`.ts` module ids map to a sibling `.html` view
pub fn convert_module_id_to_view_url(module_id: &str) -> String {
    let base = module_id
        .strip_suffix(".js")
        .or_else(|| module_id.strip_suffix(".ts"))
        .unwrap_or(module_id);
    format!("{}.html", base)
}

/// Markup compiled on first use, with its `<require>`-style dependencies
pub struct InlineView {
    markup: String,
    dependencies: Vec<(String, Option<String>)>,
    base_url: String,
    entry: RefCell<Option<Rc<TemplateRegistryEntry>>>,
}

impl InlineView {
    pub fn markup(&self) -> &str {
        &self.markup
    }

    pub fn dependencies(&self) -> &[(String, Option<String>)] {
        &self.dependencies
    }
}

#[derive(Clone)]
pub enum ViewStrategy {
    /// A view url, relative to the owning module
    Use {
        path: String,
        module_id: Option<String>,
        absolute_path: Option<String>,
    },
    /// `some/module.js` uses `some/module.html`
    Conventional { module_id: String, view_url: String },
    NoView,
    TemplateRegistry {
        module_id: Option<String>,
        entry: Rc<TemplateRegistryEntry>,
    },
    Inline(Rc<InlineView>),
}

impl ViewStrategy {
    pub fn use_view(path: &str) -> Self {
        ViewStrategy::Use {
            path: path.to_string(),
            module_id: None,
            absolute_path: None,
        }
    }

    pub fn conventional(module_id: &str) -> Self {
        ViewStrategy::Conventional {
            module_id: module_id.to_string(),
            view_url: convert_module_id_to_view_url(module_id),
        }
    }

    pub fn template_registry(entry: Rc<TemplateRegistryEntry>) -> Self {
        ViewStrategy::TemplateRegistry { module_id: None, entry }
    }

    pub fn inline(markup: &str, dependencies: Vec<(String, Option<String>)>, base_url: &str) -> Self {
        ViewStrategy::Inline(Rc::new(InlineView {
            markup: markup.to_string(),
            dependencies,
            base_url: base_url.to_string(),
            entry: RefCell::new(None),
        }))
    }

    /// The model's own strategy, else the conventional one for its module
    pub fn get_default(model: &ModelType) -> Result<Self> {
        if let Some(strategy) = model.view_strategy() {
            let strategy = strategy.clone();
            return Ok(match model.module_id() {
                Some(module_id) => strategy.with_module_id(module_id),
                None => strategy,
            });
        }

        match model.module_id() {
            Some(module_id) => Ok(ViewStrategy::conventional(module_id)),
            None => Err(TemplatingError::NoDefaultViewStrategy {
                target: model.name().to_string(),
            }),
        }
    }

    pub fn module_id(&self) -> Option<&str> {
        match self {
            ViewStrategy::Use { module_id, .. } => module_id.as_deref(),
            ViewStrategy::Conventional { module_id, .. } => Some(module_id),
            ViewStrategy::TemplateRegistry { module_id, .. } => module_id.as_deref(),
            ViewStrategy::NoView | ViewStrategy::Inline(_) => None,
        }
    }

    /// Fill in the owning module if not already known
    pub fn with_module_id(self, id: &str) -> Self {
        match self {
            ViewStrategy::Use {
                path,
                module_id: None,
                absolute_path,
            } => ViewStrategy::Use {
                path,
                module_id: Some(id.to_string()),
                absolute_path,
            },
            ViewStrategy::TemplateRegistry { module_id: None, entry } => ViewStrategy::TemplateRegistry {
                module_id: Some(id.to_string()),
                entry,
            },
            other => other,
        }
    }

    /// Resolve a `Use` path against `file` once, ahead of loading
    pub fn make_relative_to(&mut self, file: &str) {
        if let ViewStrategy::Use {
            path, absolute_path, ..
        } = self
        {
            *absolute_path = Some(relative_to_file(path, file));
        }
    }

    pub fn load_view_factory(
        &self,
        engine: Rc<ViewEngine>,
        mut instruction: ViewCompileInstruction,
        load_context: Option<Rc<ResourceLoadContext>>,
    ) -> BoxedLocal<Result<Option<ViewFactoryRef>>> {
        instruction.associated_module_id = self.module_id().map(str::to_string);

        let location = match self {
            ViewStrategy::NoView => return Box::pin(async { Ok(None) }),
            ViewStrategy::Use {
                path,
                module_id,
                absolute_path,
            } => {
                let url = absolute_path.clone().unwrap_or_else(|| match module_id {
                    Some(module_id) => relative_to_file(path, module_id),
                    None => path.clone(),
                });
                TemplateLocation::Url(url)
            }
            ViewStrategy::Conventional { view_url, .. } => TemplateLocation::Url(view_url.clone()),
            ViewStrategy::TemplateRegistry { entry, .. } => {
                if let Some(factory) = entry.factory() {
                    return Box::pin(async move { Ok(Some(factory.into())) });
                }
                TemplateLocation::Entry(entry.clone())
            }
            ViewStrategy::Inline(inline) => match inline_entry(&engine, inline) {
                Ok(entry) => {
                    if let Some(factory) = entry.factory() {
                        return Box::pin(async move { Ok(Some(factory.into())) });
                    }
                    TemplateLocation::Entry(entry)
                }
                Err(err) => return Box::pin(async move { Err(err) }),
            },
        };

        Box::pin(async move {
            let factory = engine
                .load_view_factory(location, instruction, load_context)
                .await?;
            Ok(Some(factory))
        })
    }
}

fn inline_entry(engine: &ViewEngine, inline: &InlineView) -> Result<Rc<TemplateRegistryEntry>> {
    if let Some(entry) = inline.entry.borrow().as_ref() {
        return Ok(entry.clone());
    }

    let document = engine.document();
    let entry = TemplateRegistryEntry::new(document.clone(), &inline.base_url);
    entry.set_template(document.create_template_from_markup(&inline.markup)?)?;
    for (src, name) in &inline.dependencies {
        entry.add_dependency(src, name.as_deref());
    }
    *inline.entry.borrow_mut() = Some(entry.clone());
    Ok(entry)
}

impl From<&str> for ViewStrategy {
    fn from(path: &str) -> Self {
        ViewStrategy::use_view(path)
    }
}
