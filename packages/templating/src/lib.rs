#![deny(clippy::all)]

//! Aurelia Templating
//!
//! Compiles HTML templates into view factories and runs the resulting views:
//! binding, attach/detach, slots, content projection, custom elements and
//! attributes, template controllers, resource loading and composition.

// Document model and primitives
pub mod dom;
pub mod selector;
pub mod util;

// Runtime services
pub mod animator;
pub mod config;
pub mod container;
pub mod context;
pub mod error;
pub mod task_queue;

// Binding seam
pub mod binding;

// Compilation
pub mod instructions;
pub mod resources;
pub mod view_compiler;

// Views
pub mod content_selector;
pub mod view;
pub mod view_factory;
pub mod view_slot;

// Behaviors
pub mod behavior;

// Loading and composition
pub mod composition;
pub mod loader;
pub mod module_analyzer;
pub mod view_engine;
pub mod view_strategy;

// Re-exports
pub use animator::{Animator, Completion, NoopAnimator};
pub use behavior::children::{Child, ChildObserver};
pub use behavior::controller::Controller;
pub use behavior::{BehaviorBuilder, Capabilities, HtmlBehaviorResource, ModelType};
pub use composition::{Composed, CompositionContext, CompositionEngine, ViewModelSource};
pub use config::EngineConfig;
pub use container::Container;
pub use context::{BindingContext, ObjectContext, ViewModel};
pub use dom::{Document, NodeId, NodeType};
pub use error::{Result, TemplatingError};
pub use instructions::{BehaviorInstruction, TargetInstruction, ViewCompileInstruction, ViewCreateInstruction};
pub use loader::{Export, Loader, MemoryLoader, ModuleExports};
pub use resources::ViewResources;
pub use task_queue::TaskQueue;
pub use view::View;
pub use view_compiler::{TemplateSource, ViewCompiler};
pub use view_engine::{TemplateLocation, ViewEngine};
pub use view_factory::{BoundViewFactory, CacheSize, ViewFactory, ViewFactoryRef};
pub use view_slot::ViewSlot;
pub use view_strategy::ViewStrategy;
