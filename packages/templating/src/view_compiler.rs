//! View Compiler
//!
//! Walks a template depth-first and records a `TargetInstruction` for every
//! node that needs runtime wiring. Such nodes get the `au-target` class and
//! an `au-target-id` attribute keying their instruction. Text interpolation
//! gets an `au-marker` element in front of it; template controllers lift
//! their element into a nested factory and leave a `<template>` behind.
//!
//! Compiling never evaluates anything. The only DOM changes are the markers,
//! the target attributes, lifted elements and removed attributes.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::behavior::HtmlBehaviorResource;
use crate::binding::{
    AttributeInfo, AttributeInstruction, AttributeValue, BindingLanguage, TargetExpression,
};
use crate::dom::{Document, NodeId, NodeType};
use crate::error::{Result, TemplatingError};
use crate::instructions::{BehaviorInstruction, InjectorId, TargetInstruction, ViewCompileInstruction};
use crate::resources::ViewResources;
use crate::util::IdAllocator;
use crate::view_factory::{ViewFactory, TARGET_CLASS, TARGET_ID_ATTRIBUTE};

/// Instruction map under construction, keyed by target id
pub type Instructions = IndexMap<u32, Rc<TargetInstruction>>;

#[derive(Debug, Clone, Copy)]
pub enum TemplateSource<'a> {
    /// Markup whose root is a `<template>` element
    Markup(&'a str),
    /// A `<template>` element (its children are compiled), or any other
    /// node compiled as is
    Node(NodeId),
}

pub struct ViewCompiler {
    document: Document,
    binding_language: Rc<dyn BindingLanguage>,
    resources: Rc<ViewResources>,
    injector_ids: IdAllocator,
    target_ids: IdAllocator,
}

impl ViewCompiler {
    pub fn new(
        document: Document,
        binding_language: Rc<dyn BindingLanguage>,
        resources: Rc<ViewResources>,
    ) -> Self {
        ViewCompiler {
            document,
            binding_language,
            resources,
            injector_ids: IdAllocator::new(),
            target_ids: IdAllocator::new(),
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn resources(&self) -> &Rc<ViewResources> {
        &self.resources
    }

    pub fn compile(
        &self,
        source: TemplateSource<'_>,
        resources: Option<&Rc<ViewResources>>,
        instruction: &ViewCompileInstruction,
    ) -> Result<Rc<ViewFactory>> {
        let document = &self.document;
        let resources = resources.unwrap_or(&self.resources).clone();
        let source = match source {
            TemplateSource::Markup(markup) => document.create_template_from_markup(markup)?,
            TemplateSource::Node(node) => node,
        };

        let is_template = document.is_element_named(source, "template");
        let (content, part, cache_size) = if is_template {
            let content = document.create_fragment();
            for child in document.child_nodes(source) {
                document.append_child(content, child);
            }
            (
                content,
                document.get_attribute(source, "part"),
                document.get_attribute(source, "view-cache"),
            )
        } else {
            (source, None, None)
        };

        resources.on_before_compile(content, instruction);

        let mut instructions = Instructions::new();
        self.compile_node(
            content,
            &resources,
            &mut instructions,
            InjectorId::ROOT,
            !instruction.target_shadow_dom,
        )?;

        let open = document.create_comment("<view>");
        document.insert_before(content, open, document.first_child(content));
        let close = document.create_comment("</view>");
        document.append_child(content, close);

        let surrogate = if instruction.compile_surrogate && is_template {
            self.compile_surrogate(source, &resources)?.map(Rc::new)
        } else {
            None
        };

        let factory = ViewFactory::new(document.clone(), content, instructions, resources.clone(), surrogate);
        factory.set_part(part);
        if let Some(size) = cache_size {
            factory.set_cache_size(Some(size.parse()?), false);
        }

        resources.on_after_compile(&factory);

        tracing::debug!(
            targets = factory.instructions().len(),
            surrogate = factory.surrogate_instruction().is_some(),
            "compiled template"
        );
        Ok(factory)
    }

    /// Compile `node` and return the next node to visit
    pub(crate) fn compile_node(
        &self,
        node: NodeId,
        resources: &Rc<ViewResources>,
        instructions: &mut Instructions,
        parent_injector_id: InjectorId,
        target_light_dom: bool,
    ) -> Result<Option<NodeId>> {
        let document = &self.document;

        match document.node_type(node) {
            NodeType::Element => {
                return self.compile_element(node, resources, instructions, parent_injector_id, target_light_dom)
            }
            NodeType::Text => {
                let mut whole_text = document.text(node).unwrap_or_default();
                let mut sibling = document.next_sibling(node);
                while let Some(next) = sibling.filter(|n| document.node_type(*n) == NodeType::Text) {
                    whole_text.push_str(&document.text(next).unwrap_or_default());
                    sibling = document.next_sibling(next);
                }

                let language = resources.binding_language(&self.binding_language);
                match language.parse_text(resources, &whole_text) {
                    Some(expression) => {
                        let marker = document.create_element("au-marker");
                        let id = self.make_into_instruction_target(marker);
                        if let Some(parent) = document.parent(node) {
                            document.insert_before(parent, marker, Some(node));
                        }
                        document.set_text(node, " ");
                        instructions.insert(id, Rc::new(TargetInstruction::content_expression(expression)));

                        while let Some(next) = document
                            .next_sibling(node)
                            .filter(|n| document.node_type(*n) == NodeType::Text)
                        {
                            document.remove(next);
                        }
                        return Ok(document.next_sibling(node));
                    }
                    None => return Ok(sibling),
                }
            }
            NodeType::Fragment => {
                let mut child = document.first_child(node);
                while let Some(current) = child {
                    child = self.compile_node(current, resources, instructions, parent_injector_id, target_light_dom)?;
                }
            }
            NodeType::Comment => {}
        }

        Ok(document.next_sibling(node))
    }

    fn compile_element(
        &self,
        node: NodeId,
        resources: &Rc<ViewResources>,
        instructions: &mut Instructions,
        parent_injector_id: InjectorId,
        target_light_dom: bool,
    ) -> Result<Option<NodeId>> {
        let document = &self.document;
        let tag_name = document.tag_name(node).unwrap_or_default();
        let language = resources.binding_language(&self.binding_language);

        let mut view_factory = None;
        let mut element_behavior = None;
        let mut element_instruction = None;

        match tag_name.as_str() {
            "content" => {
                if target_light_dom {
                    let id = self.make_into_instruction_target(node);
                    let selector = document.get_attribute(node, "select");
                    instructions.insert(
                        id,
                        Rc::new(TargetInstruction::content_selector(selector, parent_injector_id)),
                    );
                }
                return Ok(document.next_sibling(node));
            }
            "template" => {
                let factory = self.compile(
                    TemplateSource::Node(node),
                    Some(resources),
                    &ViewCompileInstruction::default(),
                )?;
                factory.set_part(document.get_attribute(node, "part"));
                view_factory = Some(factory);
            }
            _ => {
                if let Some(behavior) = resources.get_element(&tag_name) {
                    element_instruction = Some(BehaviorInstruction::element(document, node, behavior.clone()));
                    element_behavior = Some(behavior);
                }
            }
        }

        let mut expressions: Vec<TargetExpression> = Vec::new();
        let mut behavior_instructions: Vec<BehaviorInstruction> = Vec::new();
        let mut lifting: Option<BehaviorInstruction> = None;

        for attribute in document.attributes(node) {
            let attr_name = attribute.name;
            let attr_value = attribute.value;
            let mut info = language.inspect_attribute(resources, &attr_name, &attr_value);
            let mut behavior = resources.get_attribute(&info.attr_name);
            let mut element_property = None;

            if let Some(behavior) = &behavior {
                apply_property_defaults(&mut info, behavior, resources);
            } else if let Some(element) = &element_behavior {
                element_property = element.property_for_attribute(&info.attr_name);
                if let Some(property) = &element_property {
                    info.default_binding_mode = Some(property.default_binding_mode);
                }
            }

            match language.create_attribute_instruction(resources, document, node, &info) {
                Some(AttributeInstruction::Discrete(expression)) => expressions.push(expression),
                Some(AttributeInstruction::Attribute {
                    attr_name: name,
                    altered_attr,
                    mut attributes,
                }) => {
                    if altered_attr {
                        behavior = resources.get_attribute(&name);
                    }

                    if let Some(behavior) = behavior {
                        let mut instruction = BehaviorInstruction::attribute(&name, Some(behavior.clone()));
                        instruction.attributes = Some(attributes);
                        configure_properties(&mut instruction, &behavior, resources);

                        if behavior.lifts_content() {
                            // first template controller wins; the rest of the
                            // element's attributes stay on the lifted element
                            instruction.original_attr_name = Some(attr_name);
                            lifting = Some(instruction);
                            break;
                        }
                        behavior_instructions.push(instruction);
                    } else if let (Some(property), Some(element)) =
                        (&element_property, element_instruction.as_mut())
                    {
                        if let Some(mut value) = attributes.shift_remove(&info.attr_name) {
                            if let AttributeValue::Expression(expression) = &mut value {
                                expression.target_property = property.name.clone();
                            }
                            element.attributes_mut().insert(info.attr_name.clone(), value);
                        }
                    } else if let Some(AttributeValue::Expression(expression)) = attributes.shift_remove(&name) {
                        expressions.push(expression);
                    }
                }
                None => {
                    if let Some(behavior) = behavior {
                        let mut instruction = BehaviorInstruction::attribute(&attr_name, Some(behavior.clone()));
                        let key = resources
                            .map_attribute(&attr_name)
                            .unwrap_or_else(|| attr_name.clone());
                        instruction
                            .attributes_mut()
                            .insert(key, AttributeValue::Literal(attr_value));

                        if behavior.lifts_content() {
                            instruction.original_attr_name = Some(attr_name);
                            lifting = Some(instruction);
                            break;
                        }
                        behavior_instructions.push(instruction);
                    } else if element_property.is_some() {
                        if let Some(element) = element_instruction.as_mut() {
                            element
                                .attributes_mut()
                                .insert(attr_name, AttributeValue::Literal(attr_value));
                        }
                    }
                }
            }
        }

        if let Some(mut instruction) = lifting {
            instruction.view_factory = view_factory.map(Into::into);
            let node = match instruction.behavior.clone() {
                Some(behavior) => behavior.compile(self, resources, node, &mut instruction)?,
                None => node,
            };
            let id = self.make_into_instruction_target(node);
            instructions.insert(
                id,
                Rc::new(TargetInstruction::lifting(parent_injector_id, Rc::new(instruction))),
            );
            return Ok(document.next_sibling(node));
        }

        let has_element_instruction = element_instruction.is_some();
        let pending: Vec<BehaviorInstruction> = element_instruction
            .into_iter()
            .chain(behavior_instructions)
            .collect();

        let mut injector_id = None;
        let mut skip_content_processing = false;

        if !expressions.is_empty() || !pending.is_empty() {
            injector_id = (!pending.is_empty()).then(|| InjectorId(self.injector_ids.next()));

            let mut providers = Vec::new();
            let mut compiled = Vec::with_capacity(pending.len());
            for mut instruction in pending {
                if let Some(behavior) = instruction.behavior.clone() {
                    behavior.compile(self, resources, node, &mut instruction)?;
                    providers.push(behavior.provider_id());
                }
                compiled.push(Rc::new(instruction));
            }

            for expression in &expressions {
                if let Some(attribute) = &expression.attr_to_remove {
                    document.remove_attribute(node, attribute);
                }
            }

            let (anchor_is_container, skip) = match compiled.first().filter(|_| has_element_instruction) {
                Some(element) => (element.anchor_is_container, element.skip_content_processing),
                None => (true, false),
            };
            skip_content_processing = skip;

            let id = self.make_into_instruction_target(node);
            instructions.insert(
                id,
                Rc::new(TargetInstruction::normal(
                    injector_id,
                    parent_injector_id,
                    providers,
                    compiled,
                    expressions,
                    anchor_is_container,
                    has_element_instruction,
                )),
            );
        }

        if skip_content_processing {
            return Ok(document.next_sibling(node));
        }

        let injector_id = injector_id.unwrap_or(parent_injector_id);
        let mut child = document.first_child(node);
        while let Some(current) = child {
            child = self.compile_node(current, resources, instructions, injector_id, target_light_dom)?;
        }

        Ok(document.next_sibling(node))
    }

    /// Attributes of a root `<template>`, applied to the host element of
    /// every view the factory creates
    fn compile_surrogate(
        &self,
        node: NodeId,
        resources: &Rc<ViewResources>,
    ) -> Result<Option<TargetInstruction>> {
        let document = &self.document;
        let language = resources.binding_language(&self.binding_language);

        let mut expressions: Vec<TargetExpression> = Vec::new();
        let mut behavior_instructions: Vec<BehaviorInstruction> = Vec::new();
        let mut values = IndexMap::new();

        for attribute in document.attributes(node) {
            let attr_name = attribute.name;
            let attr_value = attribute.value;
            let mut info = language.inspect_attribute(resources, &attr_name, &attr_value);
            let mut behavior = resources.get_attribute(&info.attr_name);

            if let Some(behavior) = &behavior {
                apply_property_defaults(&mut info, behavior, resources);
            }

            match language.create_attribute_instruction(resources, document, node, &info) {
                Some(AttributeInstruction::Discrete(expression)) => expressions.push(expression),
                Some(AttributeInstruction::Attribute {
                    attr_name: name,
                    altered_attr,
                    mut attributes,
                }) => {
                    if altered_attr {
                        behavior = resources.get_attribute(&name);
                    }

                    match behavior {
                        Some(behavior) if behavior.lifts_content() => {
                            return Err(TemplatingError::TemplateControllerOnSurrogate)
                        }
                        Some(behavior) => {
                            let mut instruction = BehaviorInstruction::attribute(&name, Some(behavior.clone()));
                            instruction.attributes = Some(attributes);
                            configure_properties(&mut instruction, &behavior, resources);
                            behavior_instructions.push(instruction);
                        }
                        None => {
                            if let Some(AttributeValue::Expression(expression)) = attributes.shift_remove(&name) {
                                expressions.push(expression);
                            }
                        }
                    }
                }
                None => match behavior {
                    Some(behavior) if behavior.lifts_content() => {
                        return Err(TemplatingError::TemplateControllerOnSurrogate)
                    }
                    Some(behavior) => {
                        let mut instruction = BehaviorInstruction::attribute(&attr_name, Some(behavior.clone()));
                        let key = resources
                            .map_attribute(&attr_name)
                            .unwrap_or_else(|| attr_name.clone());
                        instruction
                            .attributes_mut()
                            .insert(key, AttributeValue::Literal(attr_value));
                        behavior_instructions.push(instruction);
                    }
                    None => {
                        if !matches!(attr_name.as_str(), "id" | "part" | "replace-part") {
                            values.insert(attr_name, attr_value);
                        }
                    }
                },
            }
        }

        if expressions.is_empty() && behavior_instructions.is_empty() && values.is_empty() {
            return Ok(None);
        }

        let mut providers = Vec::new();
        let mut compiled = Vec::with_capacity(behavior_instructions.len());
        for mut instruction in behavior_instructions {
            if let Some(behavior) = instruction.behavior.clone() {
                behavior.compile(self, resources, node, &mut instruction)?;
                providers.push(behavior.provider_id());
            }
            compiled.push(Rc::new(instruction));
        }

        for expression in &expressions {
            if let Some(attribute) = &expression.attr_to_remove {
                document.remove_attribute(node, attribute);
            }
        }

        Ok(Some(TargetInstruction::surrogate(providers, compiled, expressions, values)))
    }

    fn make_into_instruction_target(&self, element: NodeId) -> u32 {
        let id = self.target_ids.next();
        self.document.add_class(element, TARGET_CLASS);
        self.document
            .set_attribute(element, TARGET_ID_ATTRIBUTE, &id.to_string());
        id
    }
}

/// A custom attribute's own property decides the binding mode, and an
/// options property turns a plain value into options syntax
fn apply_property_defaults(info: &mut AttributeInfo, behavior: &HtmlBehaviorResource, resources: &ViewResources) {
    let Some(known) = resources.map_attribute(&info.attr_name) else {
        return;
    };
    let Some(property) = behavior.property_for_attribute(&known) else {
        return;
    };

    info.default_binding_mode = Some(property.default_binding_mode);
    if info.command.is_none() && info.expression.is_none() && property.has_options() {
        info.command = Some("options".to_string());
    }
}

/// Key the instruction's values by the real attribute name and point each
/// expression at the property it feeds
fn configure_properties(
    instruction: &mut BehaviorInstruction,
    behavior: &HtmlBehaviorResource,
    resources: &ViewResources,
) {
    let attr_name = instruction.attr_name.clone().unwrap_or_default();
    let attributes = instruction.attributes_mut();

    if let Some(known) = resources.map_attribute(&attr_name) {
        if known != attr_name {
            if let Some(value) = attributes.shift_remove(&attr_name) {
                attributes.insert(known, value);
            }
        }
    }

    for (key, value) in attributes.iter_mut() {
        if let AttributeValue::Expression(expression) = value {
            expression.target_property = behavior
                .property_for_attribute(key)
                .map(|property| property.name.clone())
                .unwrap_or_else(|| key.clone());
        }
    }
}
