//! Instructions
//!
//! What the compiler records for later instantiation. A `TargetInstruction`
//! is attached to each marked node of a compiled template (keyed by its
//! `au-target-id`); `BehaviorInstruction`s describe the behaviors to create
//! on that node.

use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::behavior::HtmlBehaviorResource;
use crate::binding::{AttributeValue, BindingExpression, TargetExpression};
use crate::container::ProviderId;
use crate::context::BindingContext;
use crate::dom::{Document, NodeId};
use crate::view_factory::{ViewFactory, ViewFactoryRef};

/// Replacement factories keyed by the `part` name they replace
pub type PartReplacements = IndexMap<String, Rc<ViewFactory>>;

/// Identifies an element container within one view instantiation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InjectorId(pub u32);

impl InjectorId {
    /// The container the view itself is created with
    pub const ROOT: InjectorId = InjectorId(0);
}

/// Options for a single compile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewCompileInstruction {
    /// Leave `<content>` elements in place for a native slot implementation
    pub target_shadow_dom: bool,
    /// Turn attributes of a root `<template>` into a surrogate instruction
    pub compile_surrogate: bool,
    pub associated_module_id: Option<String>,
}

impl ViewCompileInstruction {
    pub fn new(target_shadow_dom: bool, compile_surrogate: bool) -> Self {
        ViewCompileInstruction {
            target_shadow_dom,
            compile_surrogate,
            associated_module_id: None,
        }
    }
}

/// Options for a single view instantiation
#[derive(Clone, Default)]
pub struct ViewCreateInstruction {
    pub suppress_bind: bool,
    /// The view's own context wins on system-initiated rebinds
    pub system_controlled: bool,
    /// Instantiate the template in place instead of cloning it
    pub enhance: bool,
    pub part_replacements: Option<Rc<PartReplacements>>,
    /// The creating behavior calls `created` itself
    pub initiated_by_behavior: bool,
}

impl ViewCreateInstruction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Views holding projected content are bound by their parent later
    pub fn content_selector() -> Self {
        ViewCreateInstruction {
            suppress_bind: true,
            ..Default::default()
        }
    }
}

#[derive(Clone)]
pub struct BehaviorInstruction {
    pub behavior: Option<Rc<HtmlBehaviorResource>>,
    pub attr_name: Option<String>,
    /// Attribute as written in markup; removed when content is lifted
    pub original_attr_name: Option<String>,
    /// `None` for dynamic instructions, which skip property initialization
    pub attributes: Option<IndexMap<String, AttributeValue>>,
    pub view_factory: Option<ViewFactoryRef>,
    pub content_factory: Option<Rc<ViewFactory>>,
    pub part_replacements: Option<Rc<PartReplacements>>,
    pub anchor_is_container: bool,
    pub suppress_bind: bool,
    pub system_controlled: bool,
    pub initiated_by_behavior: bool,
    pub skip_content_processing: bool,
    pub host: Option<NodeId>,
    pub binding_context: Option<BindingContext>,
}

impl BehaviorInstruction {
    pub fn new() -> Self {
        BehaviorInstruction {
            behavior: None,
            attr_name: None,
            original_attr_name: None,
            attributes: Some(IndexMap::new()),
            view_factory: None,
            content_factory: None,
            part_replacements: None,
            anchor_is_container: true,
            suppress_bind: false,
            system_controlled: false,
            initiated_by_behavior: false,
            skip_content_processing: false,
            host: None,
            binding_context: None,
        }
    }

    /// Custom element found by tag name
    pub fn element(document: &Document, node: NodeId, behavior: Rc<HtmlBehaviorResource>) -> Self {
        let containerless = document.has_attribute(node, "containerless") || behavior.containerless();
        BehaviorInstruction {
            anchor_is_container: !containerless,
            suppress_bind: true,
            initiated_by_behavior: true,
            behavior: Some(behavior),
            ..Self::new()
        }
    }

    pub fn attribute(attr_name: &str, behavior: Option<Rc<HtmlBehaviorResource>>) -> Self {
        BehaviorInstruction {
            attr_name: Some(attr_name.to_string()),
            behavior,
            ..Self::new()
        }
    }

    /// Behavior created directly by composition rather than from markup
    pub fn dynamic(
        host: Option<NodeId>,
        binding_context: BindingContext,
        view_factory: Option<ViewFactoryRef>,
    ) -> Self {
        BehaviorInstruction {
            host,
            binding_context: Some(binding_context),
            view_factory,
            attributes: None,
            suppress_bind: true,
            initiated_by_behavior: true,
            ..Self::new()
        }
    }

    pub fn attributes_mut(&mut self) -> &mut IndexMap<String, AttributeValue> {
        self.attributes.get_or_insert_with(IndexMap::new)
    }

    /// Create options for the behavior's own view
    pub fn create_instruction(&self) -> ViewCreateInstruction {
        ViewCreateInstruction {
            suppress_bind: self.suppress_bind,
            system_controlled: self.system_controlled,
            enhance: false,
            part_replacements: self.part_replacements.clone(),
            initiated_by_behavior: self.initiated_by_behavior,
        }
    }

    pub fn describe(&self) -> Value {
        let attributes: serde_json::Map<String, Value> = self
            .attributes
            .iter()
            .flatten()
            .map(|(k, v)| (k.clone(), Value::String(v.describe())))
            .collect();
        json!({
            "behavior": self.behavior.as_ref().and_then(|b| b.html_name()),
            "attrName": self.attr_name,
            "attributes": attributes,
            "anchorIsContainer": self.anchor_is_container,
            "viewFactory": self.view_factory.as_ref().and_then(|f| f.resolved().ok()).map(|f| f.describe()),
            "contentFactory": self.content_factory.as_ref().map(|f| f.describe()),
            "partReplacements": self.part_replacements.as_ref().map(|p| p.keys().cloned().collect::<Vec<_>>()),
        })
    }
}

impl Default for BehaviorInstruction {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentSelectorInstruction {
    pub selector: Option<String>,
}

/// Everything recorded for one marked node
#[derive(Clone)]
pub struct TargetInstruction {
    pub injector_id: Option<InjectorId>,
    pub parent_injector_id: InjectorId,
    pub providers: Vec<ProviderId>,
    pub behavior_instructions: Vec<Rc<BehaviorInstruction>>,
    pub expressions: Vec<TargetExpression>,
    pub content_selector: Option<ContentSelectorInstruction>,
    pub content_expression: Option<Rc<dyn BindingExpression>>,
    /// Surrogate attribute values merged onto the host element
    pub values: IndexMap<String, String>,
    pub view_factory: Option<ViewFactoryRef>,
    pub anchor_is_container: bool,
    pub has_element_instruction: bool,
}

impl TargetInstruction {
    fn empty(parent_injector_id: InjectorId) -> Self {
        TargetInstruction {
            injector_id: None,
            parent_injector_id,
            providers: Vec::new(),
            behavior_instructions: Vec::new(),
            expressions: Vec::new(),
            content_selector: None,
            content_expression: None,
            values: IndexMap::new(),
            view_factory: None,
            anchor_is_container: true,
            has_element_instruction: false,
        }
    }

    /// `<content select="...">` placeholder
    pub fn content_selector(selector: Option<String>, parent_injector_id: InjectorId) -> Self {
        TargetInstruction {
            content_selector: Some(ContentSelectorInstruction { selector }),
            ..Self::empty(parent_injector_id)
        }
    }

    /// Text interpolation; the target is the marker inserted before the text node
    pub fn content_expression(expression: Rc<dyn BindingExpression>) -> Self {
        TargetInstruction {
            content_expression: Some(expression),
            ..Self::empty(InjectorId::ROOT)
        }
    }

    /// Template controller whose element was lifted into its own factory
    pub fn lifting(parent_injector_id: InjectorId, instruction: Rc<BehaviorInstruction>) -> Self {
        let mut providers = Vec::new();
        if let Some(behavior) = &instruction.behavior {
            providers.push(behavior.provider_id());
        }
        TargetInstruction {
            view_factory: instruction.view_factory.clone(),
            providers,
            behavior_instructions: vec![instruction],
            anchor_is_container: false,
            ..Self::empty(parent_injector_id)
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn normal(
        injector_id: Option<InjectorId>,
        parent_injector_id: InjectorId,
        providers: Vec<ProviderId>,
        behavior_instructions: Vec<Rc<BehaviorInstruction>>,
        expressions: Vec<TargetExpression>,
        anchor_is_container: bool,
        has_element_instruction: bool,
    ) -> Self {
        TargetInstruction {
            injector_id,
            providers,
            behavior_instructions,
            expressions,
            anchor_is_container,
            has_element_instruction,
            ..Self::empty(parent_injector_id)
        }
    }

    pub fn surrogate(
        providers: Vec<ProviderId>,
        behavior_instructions: Vec<Rc<BehaviorInstruction>>,
        expressions: Vec<TargetExpression>,
        values: IndexMap<String, String>,
    ) -> Self {
        TargetInstruction {
            providers,
            behavior_instructions,
            expressions,
            values,
            ..Self::empty(InjectorId::ROOT)
        }
    }

    pub fn describe(&self) -> Value {
        let kind = if self.content_expression.is_some() {
            "contentExpression"
        } else if self.content_selector.is_some() {
            "contentSelector"
        } else if self.view_factory.is_some() {
            "lifting"
        } else {
            "normal"
        };
        json!({
            "kind": kind,
            "injectorId": self.injector_id.map(|id| id.0),
            "parentInjectorId": self.parent_injector_id.0,
            "anchorIsContainer": self.anchor_is_container,
            "selector": self.content_selector.as_ref().and_then(|c| c.selector.clone()),
            "contentExpression": self.content_expression.as_ref().map(|e| e.describe()),
            "behaviors": self.behavior_instructions.iter().map(|b| b.describe()).collect::<Vec<_>>(),
            "expressions": self
                .expressions
                .iter()
                .map(|e| format!("{} -> {}", e.expression.describe(), e.target_property))
                .collect::<Vec<_>>(),
            "values": self.values,
        })
    }
}
