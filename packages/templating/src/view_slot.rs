//! View Slot
//!
//! Ordered list of views rendered at an anchor node. The anchor is either
//! the container the views are appended to or a marker they are inserted
//! before. Structural changes may wait on enter/leave animations of views
//! whose first element carries the animatable marker class; the slot's
//! child list only changes once those animations settle.
//!
//! After `install_content_selectors` the slot distributes view nodes into
//! content selector groups instead of placing them at the anchor.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::Rc;

use crate::animator::{Animator, Completion, ANIMATABLE_CLASS};
use crate::content_selector::ContentSelector;
use crate::context::{same_context_opt, BindingContext};
use crate::dom::{Document, NodeId, NodeType};
use crate::task_queue::TaskQueue;
use crate::view::View;

/// The element to animate for a view: the first element after a leading comment,
/// when it carries the marker class
fn animatable_element(view: &View) -> Option<NodeId> {
    let document = view.document();
    let first = view.first_child()?;
    let last = view.last_child()?;
    if document.node_type(first) != NodeType::Comment || first == last {
        return None;
    }
    let mut current = document.next_sibling(first);
    while let Some(node) = current {
        if document.is_element(node) {
            return document.has_class(node, ANIMATABLE_CLASS).then_some(node);
        }
        if node == last {
            break;
        }
        current = document.next_sibling(node);
    }
    None
}

pub struct ViewSlot {
    document: Document,
    anchor: NodeId,
    anchor_is_container: bool,
    binding_context: RefCell<Option<BindingContext>>,
    animator: Rc<dyn Animator>,
    task_queue: Rc<TaskQueue>,
    children: RefCell<Vec<Rc<View>>>,
    is_bound: Cell<bool>,
    is_attached: Cell<bool>,
    content_selectors: RefCell<Option<Vec<Rc<ContentSelector>>>>,
}

impl ViewSlot {
    pub fn new(
        document: Document,
        anchor: NodeId,
        anchor_is_container: bool,
        binding_context: Option<BindingContext>,
        animator: Rc<dyn Animator>,
        task_queue: Rc<TaskQueue>,
    ) -> Rc<Self> {
        Rc::new(ViewSlot {
            document,
            anchor,
            anchor_is_container,
            binding_context: RefCell::new(binding_context),
            animator,
            task_queue,
            children: RefCell::new(Vec::new()),
            is_bound: Cell::new(false),
            is_attached: Cell::new(false),
            content_selectors: RefCell::new(None),
        })
    }

    pub fn anchor(&self) -> NodeId {
        self.anchor
    }

    pub fn anchor_is_container(&self) -> bool {
        self.anchor_is_container
    }

    pub fn children(&self) -> Vec<Rc<View>> {
        self.children.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.children.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.borrow().is_empty()
    }

    pub fn is_bound(&self) -> bool {
        self.is_bound.get()
    }

    pub fn is_attached(&self) -> bool {
        self.is_attached.get()
    }

    pub fn binding_context(&self) -> Option<BindingContext> {
        self.binding_context.borrow().clone()
    }

    pub fn has_content_selectors(&self) -> bool {
        self.content_selectors.borrow().is_some()
    }

    fn selectors(&self) -> Option<Vec<Rc<ContentSelector>>> {
        self.content_selectors.borrow().clone()
    }

    fn index_of(&self, view: &Rc<View>) -> Option<usize> {
        self.children
            .borrow()
            .iter()
            .position(|child| Rc::ptr_eq(child, view))
    }

    /// Deliver the output of `work` through a completion once the task queue runs it
    fn defer<T: 'static>(&self, work: impl Future<Output = T> + 'static) -> Completion<T> {
        let (tx, rx) = smol::channel::bounded(1);
        self.task_queue.spawn(async move {
            let _ = tx.try_send(work.await);
        });
        Completion::Pending(rx)
    }

    fn enter(&self, view: &View) -> Completion<bool> {
        match animatable_element(view) {
            Some(element) => self.defer(self.animator.enter(&self.document, element)),
            None => Completion::Ready(false),
        }
    }

    /// Treat the anchor's current children as one view
    pub fn transform_child_nodes_into_view(&self) {
        let view = View::adopt(self.document.clone(), self.anchor);
        self.children.borrow_mut().push(view);
    }

    // ===== Lifecycle =====

    pub fn bind(&self, context: Option<&BindingContext>) {
        if self.is_bound.get() {
            if same_context_opt(self.binding_context().as_ref(), context) {
                return;
            }
            self.unbind();
        }

        self.is_bound.set(true);
        let context = context.cloned().or_else(|| self.binding_context());
        *self.binding_context.borrow_mut() = context.clone();

        for child in self.children() {
            child.bind_with(context.as_ref(), true);
        }
    }

    pub fn unbind(&self) {
        self.is_bound.set(false);
        for child in self.children() {
            child.unbind();
        }
    }

    /// Attach children and start enter animations without waiting on them
    pub fn attached(&self) {
        if self.is_attached.get() {
            return;
        }
        self.is_attached.set(true);

        for child in self.children() {
            child.attached();
            if let Some(element) = animatable_element(&child) {
                let enter = self.animator.enter(&self.document, element);
                self.task_queue.spawn(async move {
                    enter.await;
                });
            }
        }
    }

    pub fn detached(&self) {
        if !self.is_attached.get() {
            return;
        }
        self.is_attached.set(false);
        for child in self.children() {
            child.detached();
        }
    }

    // ===== Structure =====

    /// Append a view; resolves with whether an enter animation ran
    pub fn add(&self, view: Rc<View>) -> Completion<bool> {
        if let Some(selectors) = self.selectors() {
            ContentSelector::apply_selectors(&view, &selectors, |selector, group| {
                selector.add(group)
            });
            self.children.borrow_mut().push(view.clone());
            if self.is_attached.get() {
                view.attached();
            }
            return Completion::Ready(false);
        }

        if self.anchor_is_container {
            view.append_nodes_to(self.anchor);
        } else {
            view.insert_nodes_before(self.anchor);
        }
        self.children.borrow_mut().push(view.clone());

        if self.is_attached.get() {
            view.attached();
            return self.enter(&view);
        }
        Completion::Ready(false)
    }

    /// Insert before the child at `index`; appends when `index` is past the end
    pub fn insert(&self, index: usize, view: Rc<View>) -> Completion<bool> {
        let reference = {
            let children = self.children.borrow();
            if index >= children.len() {
                None
            } else {
                Some(children[index].clone())
            }
        };
        let Some(reference) = reference else {
            return self.add(view);
        };

        if let Some(selectors) = self.selectors() {
            ContentSelector::apply_selectors(&view, &selectors, |selector, group| {
                selector.insert(index, group)
            });
            self.children.borrow_mut().insert(index, view.clone());
            if self.is_attached.get() {
                view.attached();
            }
            return Completion::Ready(false);
        }

        match reference.first_child() {
            Some(first) => view.insert_nodes_before(first),
            None if self.anchor_is_container => view.append_nodes_to(self.anchor),
            None => view.insert_nodes_before(self.anchor),
        }
        self.children.borrow_mut().insert(index, view.clone());

        if self.is_attached.get() {
            view.attached();
            return self.enter(&view);
        }
        Completion::Ready(false)
    }

    pub fn remove(
        self: &Rc<Self>,
        view: &Rc<View>,
        return_to_cache: bool,
        skip_animation: bool,
    ) -> Completion<Option<Rc<View>>> {
        match self.index_of(view) {
            Some(index) => self.remove_at(index, return_to_cache, skip_animation),
            None => Completion::Ready(None),
        }
    }

    /// Remove the child at `index`. With a leave animation the nodes and the
    /// child list stay untouched until the animation settles.
    pub fn remove_at(
        self: &Rc<Self>,
        index: usize,
        return_to_cache: bool,
        skip_animation: bool,
    ) -> Completion<Option<Rc<View>>> {
        let Some(view) = self.children.borrow().get(index).cloned() else {
            return Completion::Ready(None);
        };

        if let Some(selectors) = self.selectors() {
            for selector in &selectors {
                selector.remove_at(index, &view);
            }
            self.children.borrow_mut().remove(index);
            if self.is_attached.get() {
                view.detached();
            }
            if return_to_cache {
                view.return_to_cache();
            }
            return Completion::Ready(Some(view));
        }

        if !skip_animation {
            if let Some(element) = animatable_element(&view) {
                tracing::debug!(index, "deferring view removal until leave animation completes");
                let leave = self.animator.leave(&self.document, element);
                let slot = self.clone();
                return self.defer(async move {
                    leave.await;
                    Some(slot.finish_remove(view, return_to_cache))
                });
            }
        }

        Completion::Ready(Some(self.finish_remove(view, return_to_cache)))
    }

    fn finish_remove(&self, view: Rc<View>, return_to_cache: bool) -> Rc<View> {
        view.remove_nodes();
        if let Some(index) = self.index_of(&view) {
            self.children.borrow_mut().remove(index);
        }
        if self.is_attached.get() {
            view.detached();
        }
        if return_to_cache {
            view.return_to_cache();
        }
        view
    }

    /// Remove every child. Leave animations run in parallel; the child list
    /// is cleared once all of them have settled.
    pub fn remove_all(self: &Rc<Self>, return_to_cache: bool, skip_animation: bool) -> Completion<()> {
        let children = self.children();

        if let Some(selectors) = self.selectors() {
            for view in &children {
                for selector in &selectors {
                    selector.remove_at(0, view);
                }
            }
            self.finish_remove_all(&children, return_to_cache);
            return Completion::Ready(());
        }

        let mut pending = Vec::new();
        for child in &children {
            match animatable_element(child).filter(|_| !skip_animation) {
                Some(element) => {
                    pending.push((child.clone(), self.animator.leave(&self.document, element)))
                }
                None => child.remove_nodes(),
            }
        }

        if pending.is_empty() {
            self.finish_remove_all(&children, return_to_cache);
            return Completion::Ready(());
        }

        tracing::debug!(count = pending.len(), "deferring slot clear until leave animations complete");
        let (done_tx, done_rx) = smol::channel::unbounded::<()>();
        let count = pending.len();
        for (child, leave) in pending {
            let done = done_tx.clone();
            self.task_queue.spawn(async move {
                leave.await;
                child.remove_nodes();
                let _ = done.try_send(());
            });
        }
        drop(done_tx);

        let slot = self.clone();
        self.defer(async move {
            for _ in 0..count {
                if done_rx.recv().await.is_err() {
                    break;
                }
            }
            slot.finish_remove_all(&children, return_to_cache);
        })
    }

    fn finish_remove_all(&self, removed: &[Rc<View>], return_to_cache: bool) {
        if self.is_attached.get() {
            for view in removed {
                view.detached();
            }
        }
        if return_to_cache {
            for view in removed {
                view.return_to_cache();
            }
        }
        self.children
            .borrow_mut()
            .retain(|child| !removed.iter().any(|view| Rc::ptr_eq(view, child)));
    }

    /// Replace all children with `view`
    pub fn swap(self: &Rc<Self>, view: Rc<View>, return_to_cache: bool) -> Completion<bool> {
        match self.remove_all(return_to_cache, false) {
            Completion::Ready(()) => self.add(view),
            Completion::Pending(removed) => {
                let slot = self.clone();
                self.defer(async move {
                    let _ = removed.recv().await;
                    slot.add(view).wait().await.unwrap_or(false)
                })
            }
        }
    }

    /// Switch to distributing views through `selectors` from now on
    pub fn install_content_selectors(&self, selectors: Vec<Rc<ContentSelector>>) {
        *self.content_selectors.borrow_mut() = Some(selectors);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animator::NoopAnimator;
    use std::cell::RefCell as StdRefCell;
    use std::rc::Weak;

    fn view(document: &Document, markup: &str) -> Rc<View> {
        let fragment = document.parse_fragment(markup).unwrap();
        View::new(
            document.clone(),
            Weak::new(),
            fragment,
            Vec::new(),
            Vec::new(),
            Rc::new(StdRefCell::new(Vec::new())),
            false,
            Vec::new(),
        )
    }

    fn slot(document: &Document, host: NodeId) -> Rc<ViewSlot> {
        ViewSlot::new(
            document.clone(),
            host,
            true,
            None,
            Rc::new(NoopAnimator),
            Rc::new(TaskQueue::new()),
        )
    }

    #[test]
    fn test_add_and_insert_order() {
        let document = Document::new();
        let host = document.create_element("div");
        let slot = slot(&document, host);

        slot.add(view(&document, "<!--v--><a></a><!--/v-->"));
        slot.add(view(&document, "<!--v--><c></c><!--/v-->"));
        slot.insert(1, view(&document, "<!--v--><b></b><!--/v-->"));

        assert_eq!(slot.len(), 3);
        assert_eq!(
            document.inner_html(host),
            "<!--v--><a></a><!--/v--><!--v--><b></b><!--/v--><!--v--><c></c><!--/v-->"
        );
    }

    #[test]
    fn test_insert_past_end_appends() {
        let document = Document::new();
        let host = document.create_element("div");
        let slot = slot(&document, host);

        slot.insert(5, view(&document, "<a></a>"));
        assert_eq!(slot.len(), 1);
        assert_eq!(document.inner_html(host), "<a></a>");
    }

    #[test]
    fn test_remove_at_restores_adjacency_on_reinsert() {
        let document = Document::new();
        let host = document.create_element("div");
        let slot = slot(&document, host);
        slot.add(view(&document, "<a></a>"));
        slot.add(view(&document, "<b></b>"));
        slot.add(view(&document, "<c></c>"));
        let before = document.inner_html(host);

        let removed = slot.remove_at(1, false, false).now().flatten().unwrap();
        assert_eq!(document.inner_html(host), "<a></a><c></c>");

        slot.insert(1, removed);
        assert_eq!(document.inner_html(host), before);
    }

    #[test]
    fn test_transform_child_nodes_into_view() {
        let document = Document::new();
        let host = document.parse_fragment("<div><p>x</p></div>").unwrap();
        let div = document.first_child(host).unwrap();
        let slot = slot(&document, div);

        slot.transform_child_nodes_into_view();
        assert_eq!(slot.len(), 1);

        slot.remove_all(false, false);
        assert!(slot.is_empty());
        assert!(!document.has_child_nodes(div));
    }

    #[test]
    fn test_animatable_element_requires_leading_comment() {
        let document = Document::new();
        let animated = view(&document, "<!--<view>--><div class=\"au-animate\"></div><!--</view>-->");
        let plain = view(&document, "<div class=\"au-animate\"></div>");

        assert!(animatable_element(&animated).is_some());
        assert!(animatable_element(&plain).is_none());
    }
}
