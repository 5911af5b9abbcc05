//! Content Projection Tests
//!
//! Distributing a custom element's content through `<content>` selectors
//! and swapping in consumer supplied parts

#[path = "support/mod.rs"]
mod support;

#[cfg(test)]
mod tests {
    use super::support::*;
    use std::rc::Rc;

    use aurelia_templating::{
        BehaviorBuilder, BindingContext, Document, ModelType, NodeId, ObjectContext,
        ViewCreateInstruction,
    };
    use serde_json::{json, Value};

    fn model(name: &str, value: Value) -> ModelType {
        ModelType::new(name, move |_| ObjectContext::new(value.clone()) as BindingContext)
    }

    /// Template controller that renders its template once, bound to the
    /// context of the element it sits on
    fn render_once() -> ModelType {
        ModelType::new("RenderOnce", |container| {
            if let (Some(slot), Some(factory)) = (container.view_slot(), container.bound_view_factory()) {
                if let Ok(view) = factory.create(None) {
                    slot.add(view);
                }
            }
            ObjectContext::empty() as BindingContext
        })
    }

    fn find(document: &Document, root: NodeId, tag: &str) -> NodeId {
        document
            .descendants(root)
            .into_iter()
            .find(|node| document.is_element_named(*node, tag))
            .unwrap()
    }

    fn render(harness: &Harness, markup: &str, ctx: Value) -> NodeId {
        let host = harness.host();
        let context: BindingContext = ObjectContext::new(ctx);
        harness
            .compile(markup)
            .create(&harness.container, Some(&context), &ViewCreateInstruction::new(), None)
            .unwrap()
            .append_nodes_to(host);
        host
    }

    mod selectors {
        use super::*;

        fn card(harness: &Harness) {
            let card = harness.register(
                BehaviorBuilder::new().element("my-card"),
                model("MyCard", json!({})),
            );
            harness.set_view(
                &card,
                r#"<template><header><content select="h1, .title"></content></header><section><content></content></section></template>"#,
            );
        }

        #[test]
        fn should_route_nodes_to_the_first_matching_selector() {
            let harness = Harness::new();
            card(&harness);
            let host = render(
                &harness,
                r#"<template><my-card><p>body</p><h1>Heading</h1><em class="title">sub</em></my-card></template>"#,
                json!({}),
            );

            let header = find(&harness.document, host, "header");
            let section = find(&harness.document, host, "section");
            assert_eq!(
                harness.html(header),
                r#"<h1>Heading</h1><em class="title">sub</em><!--anchor-->"#
            );
            assert_eq!(harness.html(section), "<p>body</p><!--anchor-->");
        }

        #[test]
        fn should_let_match_all_take_text() {
            let harness = Harness::new();
            card(&harness);
            let host = render(
                &harness,
                "<template><my-card>loose text<h1>Top</h1></my-card></template>",
                json!({}),
            );

            assert_eq!(harness.text(find(&harness.document, host, "section")), "loose text");
            assert_eq!(harness.text(find(&harness.document, host, "header")), "Top");
        }

        #[test]
        fn should_drop_content_without_a_matching_selector() {
            let harness = Harness::new();
            let badge = harness.register(
                BehaviorBuilder::new().element("user-badge"),
                model("UserBadge", json!({})),
            );
            harness.set_view(&badge, r#"<template><b><content select="img"></content></b></template>"#);

            let host = render(
                &harness,
                r#"<template><user-badge><img src="a.png"><span>ignored</span></user-badge></template>"#,
                json!({}),
            );
            let element = find(&harness.document, host, "user-badge");
            assert_eq!(harness.text(element), "");
            assert!(harness.html(element).contains(r#"<b><img src="a.png"><!--anchor--></b>"#));
        }

        #[test]
        fn should_bind_projected_content_to_the_consumer() {
            let harness = Harness::new();
            let card = harness.register(
                BehaviorBuilder::new().element("my-card"),
                model("MyCard", json!({ "title": "inside" })),
            );
            harness.set_view(
                &card,
                "<template><h2>${title}</h2><div><content></content></div></template>",
            );

            let host = render(
                &harness,
                "<template><my-card><p>${title}</p></my-card></template>",
                json!({ "title": "outside" }),
            );
            assert_eq!(harness.text(find(&harness.document, host, "h2")), "inside");
            assert_eq!(harness.text(find(&harness.document, host, "p")), "outside");
        }

        #[test]
        fn should_skip_projection_for_no_content_processing() {
            let harness = Harness::new();
            let raw = harness.register(
                BehaviorBuilder::new().element("raw-block").no_content_processing(),
                model("RawBlock", json!({})),
            );
            harness.set_view(&raw, "<template><div><content></content></div></template>");

            let host = render(
                &harness,
                "<template><raw-block><p>kept</p></raw-block></template>",
                json!({}),
            );
            let div = find(&harness.document, host, "div");
            assert_eq!(harness.html(div), "<!--anchor-->");
        }
    }

    mod parts {
        use super::*;

        fn item_list(harness: &Harness) {
            harness.register(
                BehaviorBuilder::new().attribute("render-once").template_controller(),
                render_once(),
            );
            let list = harness.register(
                BehaviorBuilder::new().element("item-list"),
                model("ItemList", json!({ "name": "Ada" })),
            );
            harness.set_view(
                &list,
                r#"<template><ul><li render-once part="item">${name}</li></ul></template>"#,
            );
        }

        #[test]
        fn should_render_the_default_part() {
            let harness = Harness::new();
            item_list(&harness);
            let host = render(&harness, "<template><item-list></item-list></template>", json!({}));

            let ul = find(&harness.document, host, "ul");
            assert_eq!(harness.text(ul), "Ada");
            assert!(harness.html(ul).ends_with("<!--anchor-->"));
        }

        #[test]
        fn should_substitute_a_replacement_part() {
            let harness = Harness::new();
            item_list(&harness);
            let host = render(
                &harness,
                r#"<template><item-list><template replace-part="item"><li class="custom">${name}!</li></template></item-list></template>"#,
                json!({ "name": "consumer" }),
            );

            let ul = find(&harness.document, host, "ul");
            assert_eq!(harness.text(ul), "Ada!");
            assert!(harness.document.has_class(find(&harness.document, ul, "li"), "custom"));
        }

        #[test]
        fn should_ignore_replacements_for_unknown_parts() {
            let harness = Harness::new();
            item_list(&harness);
            let host = render(
                &harness,
                r#"<template><item-list><template replace-part="footer"><li>nope</li></template></item-list></template>"#,
                json!({}),
            );
            assert_eq!(harness.text(find(&harness.document, host, "ul")), "Ada");
        }
    }

    mod lifecycle {
        use super::*;

        #[test]
        fn should_unbind_projected_content_with_the_consumer() {
            let harness = Harness::new();
            let card = harness.register(
                BehaviorBuilder::new().element("my-card"),
                model("MyCard", json!({})),
            );
            harness.set_view(&card, "<template><content></content></template>");

            let context: BindingContext = ObjectContext::new(json!({ "x": 1 }));
            let view = harness
                .compile("<template><my-card><i>${x}</i></my-card></template>")
                .create(&harness.container, Some(&context), &ViewCreateInstruction::new(), None)
                .unwrap();
            let controller = view.controllers()[0].clone();
            let projected = controller.content_view().unwrap();
            assert!(projected.is_bound());

            view.unbind();
            assert!(!projected.is_bound());
            assert!(!controller.view().unwrap().is_bound());

            let next: BindingContext = ObjectContext::new(json!({ "x": 2 }));
            view.bind(&next);
            assert_eq!(harness.text(view.fragment()), "2");
            assert!(Rc::ptr_eq(&controller.content_view().unwrap(), &projected));
        }
    }
}
