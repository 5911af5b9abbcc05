//! Templating Errors
//!
//! Fatal configuration, compile and load errors. Lifecycle operations
//! (bind/unbind/attached/detached) never fail; everything else propagates
//! one of these through `Result`.

use std::fmt;

use thiserror::Error;

use crate::dom::markup::ParseError;

/// Resource table a registration conflict happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Element,
    Attribute,
    ValueConverter,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Element => write!(f, "an Element"),
            ResourceKind::Attribute => write!(f, "an Attribute"),
            ResourceKind::ValueConverter => write!(f, "a ValueConverter"),
        }
    }
}

#[derive(Debug, Error)]
pub enum TemplatingError {
    #[error("Attempted to register {kind} when one with the same name already exists. Name: {name}.")]
    DuplicateResource { kind: ResourceKind, name: String },

    #[error("You cannot place a template controller on a surrogate element.")]
    TemplateControllerOnSurrogate,

    #[error("Cannot determine default view strategy for {target}.")]
    NoDefaultViewStrategy { target: String },

    #[error("Change handler {handler} was specified but not declared on {model}.")]
    MissingChangeHandler { handler: String, model: String },

    #[error("No view model found in module \"{module}\".")]
    NoViewModel { module: String },

    #[error("'{name}' is not a valid {kind} name. Upper-case letters are not allowed because the DOM is not case-sensitive.")]
    InvalidBehaviorName { name: String, kind: &'static str },

    #[error("Template markup must be wrapped in a <template> element e.g. <template> <!-- markup here --> </template>")]
    MissingTemplateElement,

    #[error(transparent)]
    Markup(#[from] ParseError),

    #[error("Module \"{0}\" could not be found.")]
    ModuleNotFound(String),

    #[error("Template \"{0}\" could not be found.")]
    TemplateNotFound(String),

    #[error("<require> element in {0} has no \"from\" attribute.")]
    MissingRequireSource(String),

    #[error("The view factory for \"{0}\" has not finished loading.")]
    UnresolvedViewFactory(String),

    #[error("Behavior \"{0}\" was used before it was initialized.")]
    UninitializedBehavior(String),

    #[error("Loading \"{0}\" failed earlier.")]
    LoadFailed(String),

    #[error("Invalid view cache size \"{0}\".")]
    InvalidCacheSize(String),

    #[error("Invalid selector \"{selector}\": {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TemplatingError>;
