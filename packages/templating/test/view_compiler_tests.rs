//! View Compiler Tests
//!
//! Target marking and the instructions recorded for bindings, custom
//! elements, custom attributes and template controllers

#[path = "support/mod.rs"]
mod support;

#[cfg(test)]
mod tests {
    use super::support::*;
    use std::rc::Rc;

    use aurelia_templating::behavior::property::BindableProperty;
    use aurelia_templating::binding::AttributeValue;
    use aurelia_templating::resources::ViewEngineHooks;
    use aurelia_templating::{
        BehaviorBuilder, BindingContext, ModelType, ObjectContext, TemplateSource, TemplatingError,
        ViewCompileInstruction, ViewFactory, ViewResources,
    };

    fn plain_model(name: &str) -> ModelType {
        ModelType::new(name, |_| ObjectContext::empty() as BindingContext)
    }

    fn template_html(harness: &Harness, factory: &ViewFactory) -> String {
        harness.document.inner_html(factory.template())
    }

    fn literal(value: Option<&AttributeValue>) -> Option<String> {
        match value {
            Some(AttributeValue::Literal(text)) => Some(text.clone()),
            _ => None,
        }
    }

    mod bindings {
        use super::*;

        #[test]
        fn should_record_attribute_interpolation_on_the_element() {
            let harness = Harness::new();
            let factory = harness.compile(r#"<template><a href="/users/${id}">x</a></template>"#);

            let (_, instruction) = factory.instructions().first().unwrap();
            assert_eq!(instruction.expressions.len(), 1);
            assert_eq!(instruction.expressions[0].target_property, "href");
            assert_eq!(instruction.expressions[0].expression.describe(), "/users/${id}");
        }

        #[test]
        fn should_use_two_way_for_form_values() {
            let harness = Harness::new();
            let factory = harness.compile(
                r#"<template><input value.bind="name"><span title.bind="name"></span></template>"#,
            );

            let described: Vec<String> = factory
                .instructions()
                .values()
                .map(|i| i.expressions[0].expression.describe())
                .collect();
            assert_eq!(described, vec!["name (two-way)", "name (one-way)"]);
        }

        #[test]
        fn should_record_events_and_refs_as_discrete_expressions() {
            let harness = Harness::new();
            let factory = harness.compile(
                r#"<template><button ref="save" click.trigger="submit()">Save</button></template>"#,
            );

            let (_, instruction) = factory.instructions().first().unwrap();
            let described: Vec<String> = instruction
                .expressions
                .iter()
                .map(|e| e.expression.describe())
                .collect();
            assert_eq!(described, vec!["ref save", "click.trigger=\"submit()\""]);
        }

        #[test]
        fn should_ignore_unknown_commands() {
            let harness = Harness::new();
            let factory = harness.compile(r#"<template><p title.sparkle="x"></p></template>"#);

            assert!(factory.instructions().is_empty());
            assert!(!template_html(&harness, &factory).contains("au-target"));
        }

        #[test]
        fn should_merge_adjacent_text_into_one_interpolation() {
            let harness = Harness::new();
            let factory = harness.compile("<template><p>${first} and ${second}</p></template>");

            assert_eq!(factory.instructions().len(), 1);
            let (_, instruction) = factory.instructions().first().unwrap();
            let expression = instruction.content_expression.as_ref().unwrap();
            assert_eq!(expression.describe(), "${first} and ${second}");
        }
    }

    mod custom_elements {
        use super::*;

        fn register_name_tag(harness: &Harness) {
            harness.register(
                BehaviorBuilder::new()
                    .element("name-tag")
                    .bindable(BindableProperty::new("name"))
                    .bindable(BindableProperty::new("nickName")),
                plain_model("NameTag"),
            );
        }

        #[test]
        fn should_collect_property_values_on_the_element_instruction() {
            let harness = Harness::new();
            register_name_tag(&harness);
            let factory = harness.compile(
                r#"<template><name-tag name="Ada" nick-name.bind="alias" title="x"></name-tag></template>"#,
            );

            let (_, instruction) = factory.instructions().first().unwrap();
            assert!(instruction.has_element_instruction);
            assert!(instruction.injector_id.is_some());
            assert_eq!(instruction.providers.len(), 1);

            let element = &instruction.behavior_instructions[0];
            let attributes = element.attributes.as_ref().unwrap();
            assert_eq!(literal(attributes.get("name")).as_deref(), Some("Ada"));
            match attributes.get("nick-name") {
                Some(AttributeValue::Expression(expression)) => {
                    assert_eq!(expression.target_property, "nickName");
                }
                _ => panic!("expected a binding for nick-name"),
            }
            assert!(!attributes.contains_key("title"));
        }

        #[test]
        fn should_compile_element_content_for_projection() {
            let harness = Harness::new();
            register_name_tag(&harness);
            let factory = harness.compile(
                "<template><name-tag><b>${greeting}</b><template replace-part=\"icon\"><i></i></template></name-tag></template>",
            );

            let (_, instruction) = factory.instructions().first().unwrap();
            let element = &instruction.behavior_instructions[0];
            let content = element.content_factory.as_ref().unwrap();
            assert_eq!(content.instructions().len(), 1);

            let parts = element.part_replacements.as_ref().unwrap();
            assert_eq!(parts.keys().collect::<Vec<_>>(), vec!["icon"]);
            assert!(element.skip_content_processing);

            let html = template_html(&harness, &factory);
            assert!(html.contains("></name-tag>"));
            assert!(!html.contains("<b>"));
        }

        #[test]
        fn should_leave_content_alone_when_processing_is_disabled() {
            let harness = Harness::new();
            harness.register(
                BehaviorBuilder::new().element("raw-block").no_content_processing(),
                plain_model("RawBlock"),
            );
            let factory = harness.compile("<template><raw-block><p>${x}</p></raw-block></template>");

            assert_eq!(factory.instructions().len(), 1);
            let (_, instruction) = factory.instructions().first().unwrap();
            assert!(instruction.behavior_instructions[0].content_factory.is_none());
            assert!(template_html(&harness, &factory).contains("<p>${x}</p>"));
        }

        #[test]
        fn should_anchor_containerless_elements_outside() {
            let harness = Harness::new();
            harness.register(BehaviorBuilder::new().element("bare-row"), plain_model("BareRow"));
            let factory = harness.compile(
                "<template><bare-row containerless></bare-row><bare-row></bare-row></template>",
            );

            let anchors: Vec<bool> = factory
                .instructions()
                .values()
                .map(|i| i.anchor_is_container)
                .collect();
            assert_eq!(anchors, vec![false, true]);
        }

        #[test]
        fn should_give_nested_elements_their_parent_injector() {
            let harness = Harness::new();
            register_name_tag(&harness);
            harness.register(BehaviorBuilder::new().element("tag-list"), plain_model("TagList"));
            let factory = harness.compile(
                "<template><tag-list><name-tag></name-tag></tag-list></template>",
            );

            let (_, outer) = factory.instructions().first().unwrap();
            let content = outer.behavior_instructions[0].content_factory.as_ref().unwrap();
            let (_, inner) = content.instructions().first().unwrap();
            assert!(inner.has_element_instruction);
            assert_ne!(inner.injector_id, outer.injector_id);
        }
    }

    mod custom_attributes {
        use super::*;

        #[test]
        fn should_record_a_single_value_attribute() {
            let harness = Harness::new();
            harness.register(BehaviorBuilder::new().attribute("tooltip"), plain_model("Tooltip"));
            let factory = harness.compile(r#"<template><div tooltip="Hello"></div></template>"#);

            let (_, instruction) = factory.instructions().first().unwrap();
            assert!(!instruction.has_element_instruction);
            let behavior = &instruction.behavior_instructions[0];
            assert_eq!(behavior.attr_name.as_deref(), Some("tooltip"));
            assert_eq!(
                literal(behavior.attributes.as_ref().unwrap().get("tooltip")).as_deref(),
                Some("Hello")
            );
        }

        #[test]
        fn should_parse_options_for_multi_property_attributes() {
            let harness = Harness::new();
            harness.register(
                BehaviorBuilder::new()
                    .attribute("pager")
                    .bindable(BindableProperty::new("pageSize"))
                    .bindable(BindableProperty::new("current")),
                plain_model("Pager"),
            );
            let factory = harness.compile(
                r#"<template><nav pager="page-size: 10; current.bind: page"></nav></template>"#,
            );

            let (_, instruction) = factory.instructions().first().unwrap();
            let attributes = instruction.behavior_instructions[0].attributes.as_ref().unwrap();
            assert_eq!(attributes.keys().collect::<Vec<_>>(), vec!["page-size", "current"]);
            assert_eq!(literal(attributes.get("page-size")).as_deref(), Some("10"));
            match attributes.get("current") {
                Some(AttributeValue::Expression(expression)) => {
                    assert_eq!(expression.target_property, "current");
                    assert_eq!(expression.expression.describe(), "page (one-way)");
                }
                _ => panic!("expected a binding for current"),
            }
        }

        #[test]
        fn should_honor_the_attribute_default_binding_mode() {
            let harness = Harness::new();
            harness.register(
                BehaviorBuilder::new()
                    .attribute("selection")
                    .default_binding_mode(aurelia_templating::binding::BindingMode::TwoWay),
                plain_model("Selection"),
            );
            let factory = harness.compile(r#"<template><ul selection.bind="picked"></ul></template>"#);

            let (_, instruction) = factory.instructions().first().unwrap();
            let attributes = instruction.behavior_instructions[0].attributes.as_ref().unwrap();
            match attributes.get("selection") {
                Some(AttributeValue::Expression(expression)) => {
                    assert_eq!(expression.expression.describe(), "picked (two-way)");
                    assert_eq!(expression.target_property, "value");
                }
                _ => panic!("expected a binding for selection"),
            }
        }
    }

    mod template_controllers {
        use super::*;

        fn register_if(harness: &Harness) {
            harness.register(
                BehaviorBuilder::new().attribute("if").template_controller(),
                plain_model("If"),
            );
        }

        #[test]
        fn should_lift_the_element_into_its_own_factory() {
            let harness = Harness::new();
            register_if(&harness);
            let factory = harness.compile(
                r#"<template><div if.bind="show" class="panel"><span>${label}</span></div></template>"#,
            );

            let html = template_html(&harness, &factory);
            assert!(html.starts_with(r#"<!--<view>--><template class="au-target" au-target-id=""#));
            assert!(!html.contains("panel"));

            let (_, instruction) = factory.instructions().first().unwrap();
            assert!(!instruction.anchor_is_container);
            let lifted = instruction.view_factory.as_ref().unwrap().resolved().unwrap();
            let lifted_html = template_html(&harness, &lifted);
            assert!(lifted_html.contains(r#"<div class="panel">"#));
            assert!(!lifted_html.contains("if.bind"));
            assert_eq!(lifted.instructions().len(), 1);
        }

        #[test]
        fn should_move_part_and_cache_settings_to_the_lifted_factory() {
            let harness = Harness::new();
            register_if(&harness);
            let factory = harness.compile(
                r#"<template><p if="yes" part="hint" view-cache="2">x</p></template>"#,
            );

            let (_, instruction) = factory.instructions().first().unwrap();
            let lifted = instruction.view_factory.as_ref().unwrap().resolved().unwrap();
            assert_eq!(lifted.part().as_deref(), Some("hint"));
            assert!(lifted.is_caching());
            assert_eq!(template_html(&harness, &lifted), "<!--<view>--><p>x</p><!--</view>-->");
        }

        #[test]
        fn should_reject_template_controllers_on_the_surrogate() {
            let harness = Harness::new();
            register_if(&harness);
            let err = harness
                .compiler
                .compile(
                    TemplateSource::Markup(r#"<template if.bind="x"></template>"#),
                    None,
                    &ViewCompileInstruction::new(false, true),
                )
                .err()
                .unwrap();
            assert!(matches!(err, TemplatingError::TemplateControllerOnSurrogate));
        }
    }

    mod surrogates {
        use super::*;

        #[test]
        fn should_record_surrogate_bindings_and_behaviors() {
            let harness = Harness::new();
            harness.register(BehaviorBuilder::new().attribute("tooltip"), plain_model("Tooltip"));
            let factory = harness
                .compiler
                .compile(
                    TemplateSource::Markup(
                        r#"<template role="list" aria-label.bind="label" tooltip="hi"></template>"#,
                    ),
                    None,
                    &ViewCompileInstruction::new(false, true),
                )
                .unwrap();

            let surrogate = factory.surrogate_instruction().unwrap();
            assert_eq!(surrogate.values.keys().collect::<Vec<_>>(), vec!["role"]);
            assert_eq!(surrogate.expressions.len(), 1);
            assert_eq!(surrogate.behavior_instructions.len(), 1);
        }

        #[test]
        fn should_skip_surrogates_unless_asked() {
            let harness = Harness::new();
            let factory = harness.compile(r#"<template class="x"></template>"#);
            assert!(factory.surrogate_instruction().is_none());
        }

        #[test]
        fn should_reject_an_invalid_view_cache() {
            let harness = Harness::new();
            let err = harness
                .compiler
                .compile(
                    TemplateSource::Markup(r#"<template view-cache="many"></template>"#),
                    None,
                    &ViewCompileInstruction::default(),
                )
                .err()
                .unwrap();
            assert!(matches!(err, TemplatingError::InvalidCacheSize(_)));
        }
    }

    mod hooks {
        use super::*;
        use aurelia_templating::NodeId;

        struct Recorder {
            label: &'static str,
            log: Log,
        }

        impl ViewEngineHooks for Recorder {
            fn before_compile(
                &self,
                _content: NodeId,
                _resources: &Rc<ViewResources>,
                _instruction: &ViewCompileInstruction,
            ) {
                self.log.push(format!("{}.beforeCompile", self.label));
            }

            fn after_compile(&self, factory: &Rc<ViewFactory>) {
                self.log
                    .push(format!("{}.afterCompile({})", self.label, factory.instructions().len()));
            }
        }

        #[test]
        fn should_run_parent_hooks_first() {
            let harness = Harness::new();
            let log = Log::new();
            harness.resources.register_view_engine_hooks(Rc::new(Recorder {
                label: "app",
                log: log.clone(),
            }));
            let local = ViewResources::new(Some(&harness.resources), Some("views/list.html"));
            local.register_view_engine_hooks(Rc::new(Recorder {
                label: "view",
                log: log.clone(),
            }));

            harness
                .compiler
                .compile(
                    TemplateSource::Markup("<template>${x}</template>"),
                    Some(&local),
                    &ViewCompileInstruction::default(),
                )
                .unwrap();

            assert_eq!(
                log.entries(),
                vec![
                    "app.beforeCompile",
                    "view.beforeCompile",
                    "app.afterCompile(1)",
                    "view.afterCompile(1)",
                ]
            );
        }
    }

    mod description {
        use super::*;

        #[test]
        fn should_describe_the_compiled_factory() {
            let harness = Harness::new();
            let factory = harness.compile(r#"<template part="card"><h1>${title}</h1></template>"#);
            let described = factory.describe();

            assert_eq!(described["part"], "card");
            assert!(described["cacheSize"].is_null());
            let instructions = described["instructions"].as_object().unwrap();
            assert_eq!(instructions.len(), 1);
            let only = instructions.values().next().unwrap();
            assert_eq!(only["kind"], "contentExpression");
            assert_eq!(only["contentExpression"], "${title}");
        }
    }
}
