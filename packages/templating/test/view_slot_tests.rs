//! View Slot Tests
//!
//! Ordering views at an anchor, propagating bind and attach, and waiting
//! on enter/leave animations before the child list changes

#[path = "support/mod.rs"]
mod support;

#[cfg(test)]
mod tests {
    use super::support::*;
    use std::rc::Rc;

    use aurelia_templating::{
        Animator, BindingContext, NoopAnimator, ObjectContext, View, ViewCreateInstruction,
        ViewSlot,
    };
    use serde_json::json;

    fn view(harness: &Harness, markup: &str) -> Rc<View> {
        harness
            .compile(markup)
            .create(&harness.container, None, &ViewCreateInstruction::content_selector(), None)
            .unwrap()
    }

    fn animated(harness: &Harness, tag: &str) -> Rc<View> {
        view(
            harness,
            &format!(r#"<template><{tag} class="au-animate">{tag}</{tag}></template>"#),
        )
    }

    fn slot(harness: &Harness, host: aurelia_templating::NodeId, animator: Rc<dyn Animator>) -> Rc<ViewSlot> {
        ViewSlot::new(
            harness.document.clone(),
            host,
            true,
            None,
            animator,
            harness.container.task_queue(),
        )
    }

    mod ordering {
        use super::*;

        #[test]
        fn should_keep_views_in_insertion_order() {
            let harness = Harness::new();
            let host = harness.host();
            let slot = slot(&harness, host, Rc::new(NoopAnimator));

            slot.add(view(&harness, "<template>a</template>"));
            slot.add(view(&harness, "<template>c</template>"));
            slot.insert(1, view(&harness, "<template>b</template>"));

            assert_eq!(slot.len(), 3);
            assert_eq!(harness.text(host), "abc");
        }

        #[test]
        fn should_insert_before_a_marker_anchor() {
            let harness = Harness::new();
            let host = harness.host();
            let anchor = harness.document.create_comment("anchor");
            harness.document.append_child(host, anchor);
            let tail = harness.document.create_element("footer");
            harness.document.append_child(host, tail);

            let slot = ViewSlot::new(
                harness.document.clone(),
                anchor,
                false,
                None,
                Rc::new(NoopAnimator),
                harness.container.task_queue(),
            );
            slot.add(view(&harness, "<template><p>one</p></template>"));

            assert_eq!(
                harness.html(host),
                "<!--<view>--><p>one</p><!--</view>--><!--anchor--><footer></footer>"
            );
        }

        #[test]
        fn should_remove_a_view_by_identity() {
            let harness = Harness::new();
            let host = harness.host();
            let slot = slot(&harness, host, Rc::new(NoopAnimator));
            let a = view(&harness, "<template>a</template>");
            let b = view(&harness, "<template>b</template>");
            slot.add(a.clone());
            slot.add(b.clone());

            let removed = slot.remove(&a, false, false).now().flatten().unwrap();
            assert!(Rc::ptr_eq(&removed, &a));
            assert_eq!(harness.text(host), "b");
            assert_eq!(harness.text(a.fragment()), "a");

            assert!(slot.remove(&a, false, false).now().flatten().is_none());
        }

        #[test]
        fn should_return_removed_views_to_their_cache() {
            let harness = Harness::new();
            let factory = harness.compile(r#"<template view-cache="2">x</template>"#);
            let host = harness.host();
            let slot = slot(&harness, host, Rc::new(NoopAnimator));
            slot.add(factory.create(&harness.container, None, &Default::default(), None).unwrap());
            slot.add(factory.create(&harness.container, None, &Default::default(), None).unwrap());

            slot.remove_all(true, false);
            assert!(slot.is_empty());
            assert_eq!(factory.cached_views(), 2);
            assert_eq!(harness.html(host), "");
        }
    }

    mod lifecycle {
        use super::*;

        #[test]
        fn should_bind_children_with_the_slot_context() {
            let harness = Harness::new();
            let host = harness.host();
            let slot = slot(&harness, host, Rc::new(NoopAnimator));
            let child = view(&harness, "<template>${label}</template>");
            slot.add(child.clone());
            assert!(!child.is_bound());

            let ctx: BindingContext = ObjectContext::new(json!({ "label": "first" }));
            slot.bind(Some(&ctx));
            assert!(slot.is_bound());
            assert!(child.is_bound());
            assert_eq!(harness.text(host), "first");

            slot.unbind();
            assert!(!child.is_bound());
        }

        #[test]
        fn should_keep_a_pinned_child_context_on_rebind() {
            let harness = Harness::new();
            let host = harness.host();
            let slot = slot(&harness, host, Rc::new(NoopAnimator));
            let child = view(&harness, "<template>${label}</template>");
            child.bind(&(ObjectContext::new(json!({ "label": "own" })) as BindingContext));
            slot.add(child);

            let ctx: BindingContext = ObjectContext::new(json!({ "label": "slot" }));
            slot.bind(Some(&ctx));
            assert_eq!(harness.text(host), "own");
        }

        #[test]
        fn should_attach_and_detach_children() {
            let harness = Harness::new();
            let host = harness.host();
            let slot = slot(&harness, host, Rc::new(NoopAnimator));
            let first = view(&harness, "<template>1</template>");
            slot.add(first.clone());

            slot.attached();
            assert!(first.is_attached());

            let late = view(&harness, "<template>2</template>");
            slot.add(late.clone());
            assert!(late.is_attached());

            slot.detached();
            assert!(!first.is_attached());
            assert!(!late.is_attached());
        }

        #[test]
        fn should_adopt_existing_children() {
            let harness = Harness::new();
            let fragment = harness.document.parse_fragment("<ul><li>x</li><li>y</li></ul>").unwrap();
            let list = harness.document.first_child(fragment).unwrap();
            let slot = slot(&harness, list, Rc::new(NoopAnimator));

            slot.transform_child_nodes_into_view();
            assert_eq!(slot.len(), 1);

            slot.remove_all(false, false);
            assert!(slot.is_empty());
            assert_eq!(harness.html(list), "");
        }
    }

    mod animation {
        use super::*;

        #[test]
        fn should_only_animate_when_attached() {
            let harness = Harness::new();
            let animator = ManualAnimator::new();
            let slot = slot(&harness, harness.host(), animator.clone());

            let completion = slot.add(animated(&harness, "section"));
            assert!(!completion.is_pending());
            assert!(animator.calls().is_empty());
        }

        #[test]
        fn should_resolve_enter_once_the_animation_settles() {
            let harness = Harness::new();
            let animator = ManualAnimator::new();
            let slot = slot(&harness, harness.host(), animator.clone());
            slot.attached();

            let completion = slot.add(animated(&harness, "section"));
            assert!(completion.is_pending());
            assert_eq!(animator.calls(), vec!["enter:section"]);

            let queue = harness.container.task_queue();
            queue.flush();
            assert_eq!(animator.pending(), 1);

            animator.release_all();
            queue.flush();
            assert_eq!(completion.now(), Some(true));
        }

        #[test]
        fn should_skip_views_without_the_marker_class() {
            let harness = Harness::new();
            let animator = ManualAnimator::new();
            let slot = slot(&harness, harness.host(), animator.clone());
            slot.attached();

            let completion = slot.add(view(&harness, "<template><section>plain</section></template>"));
            assert_eq!(completion.now(), Some(false));
            assert!(animator.calls().is_empty());
        }

        #[test]
        fn should_keep_a_leaving_view_until_its_animation_settles() {
            let harness = Harness::new();
            let animator = ManualAnimator::new();
            let host = harness.host();
            let slot = slot(&harness, host, animator.clone());
            let queue = harness.container.task_queue();
            slot.attached();
            let leaving = animated(&harness, "aside");
            slot.add(leaving.clone());
            animator.release_all();
            queue.flush();

            let completion = slot.remove_at(0, false, false);
            assert!(completion.is_pending());
            assert_eq!(animator.calls(), vec!["enter:aside", "leave:aside"]);
            assert_eq!(slot.len(), 1);
            assert_eq!(harness.text(host), "aside");

            animator.release_all();
            queue.flush();
            let removed = completion.now().flatten().unwrap();
            assert!(Rc::ptr_eq(&removed, &leaving));
            assert!(slot.is_empty());
            assert!(!leaving.is_attached());
            assert_eq!(harness.html(host), "");
        }

        #[test]
        fn should_remove_at_once_when_skipping_animation() {
            let harness = Harness::new();
            let animator = ManualAnimator::new();
            let host = harness.host();
            let slot = slot(&harness, host, animator.clone());
            slot.add(animated(&harness, "aside"));
            slot.attached();

            let completion = slot.remove_at(0, false, true);
            assert!(!completion.is_pending());
            assert!(slot.is_empty());
            assert_eq!(animator.calls(), vec!["enter:aside"]);
        }

        #[test]
        fn should_clear_the_slot_after_every_leave_settles() {
            let harness = Harness::new();
            let animator = ManualAnimator::new();
            let host = harness.host();
            let slot = slot(&harness, host, animator.clone());
            let queue = harness.container.task_queue();
            slot.add(animated(&harness, "h1"));
            slot.add(view(&harness, "<template>plain</template>"));
            slot.add(animated(&harness, "h2"));

            let completion = slot.remove_all(false, false);
            assert!(completion.is_pending());
            assert_eq!(animator.calls(), vec!["leave:h1", "leave:h2"]);
            assert_eq!(harness.text(host), "h1h2");
            assert_eq!(slot.len(), 3);

            queue.flush();
            assert_eq!(slot.len(), 3);

            animator.release_all();
            queue.flush();
            assert_eq!(completion.now(), Some(()));
            assert!(slot.is_empty());
            assert_eq!(harness.html(host), "");
        }

        #[test]
        fn should_not_borrow_the_marker_of_a_following_view() {
            let harness = Harness::new();
            let animator = ManualAnimator::new();
            let host = harness.host();
            let slot = slot(&harness, host, animator.clone());
            let queue = harness.container.task_queue();
            slot.attached();
            slot.add(view(&harness, "<template>plain</template>"));
            slot.add(animated(&harness, "h2"));
            animator.release_all();
            queue.flush();

            let completion = slot.remove_at(0, false, false);
            assert!(!completion.is_pending());
            assert_eq!(animator.calls(), vec!["enter:h2"]);
            assert_eq!(slot.len(), 1);
            assert_eq!(harness.text(host), "h2");
        }

        #[test]
        fn should_swap_in_the_new_view_after_removal() {
            let harness = Harness::new();
            let animator = ManualAnimator::new();
            let host = harness.host();
            let slot = slot(&harness, host, animator.clone());
            let queue = harness.container.task_queue();
            slot.add(animated(&harness, "old"));

            let completion = slot.swap(view(&harness, "<template>new</template>"), false);
            assert!(completion.is_pending());
            assert_eq!(harness.text(host), "old");

            animator.release_all();
            queue.flush();
            assert_eq!(completion.now(), Some(false));
            assert_eq!(slot.len(), 1);
            assert_eq!(harness.text(host), "new");
        }

        #[test]
        fn should_swap_immediately_without_animations() {
            let harness = Harness::new();
            let host = harness.host();
            let slot = slot(&harness, host, Rc::new(NoopAnimator));
            slot.add(view(&harness, "<template>old</template>"));

            let completion = slot.swap(view(&harness, "<template>new</template>"), false);
            assert_eq!(completion.now(), Some(false));
            assert_eq!(harness.text(host), "new");
        }
    }
}
