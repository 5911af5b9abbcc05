//! Animator
//!
//! Enter/leave hooks run by view slots around node insertion and removal,
//! and the `Completion` handle slot operations return when they may finish
//! asynchronously.

use smol::channel::Receiver;
use smol::future::{self, BoxedLocal};

use crate::dom::{Document, NodeId};

/// Marker class that makes a view's first element animatable
pub const ANIMATABLE_CLASS: &str = "au-animate";

pub trait Animator {
    /// Resolves `true` when an animation actually ran
    fn enter(&self, document: &Document, element: NodeId) -> BoxedLocal<bool>;

    fn leave(&self, document: &Document, element: NodeId) -> BoxedLocal<bool>;

    fn add_class(&self, document: &Document, element: NodeId, class: &str) -> BoxedLocal<bool> {
        document.add_class(element, class);
        Box::pin(future::ready(false))
    }

    fn remove_class(&self, document: &Document, element: NodeId, class: &str) -> BoxedLocal<bool> {
        document.remove_class(element, class);
        Box::pin(future::ready(false))
    }
}

/// Default animator; completes immediately without animating
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAnimator;

impl Animator for NoopAnimator {
    fn enter(&self, _document: &Document, _element: NodeId) -> BoxedLocal<bool> {
        Box::pin(future::ready(false))
    }

    fn leave(&self, _document: &Document, _element: NodeId) -> BoxedLocal<bool> {
        Box::pin(future::ready(false))
    }
}

/// Outcome of a slot operation: available now, or delivered once a spawned
/// continuation finishes on the task queue
#[derive(Debug)]
pub enum Completion<T> {
    Ready(T),
    Pending(Receiver<T>),
}

impl<T> Completion<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Completion::Pending(_))
    }

    /// The value if it is already available
    pub fn now(self) -> Option<T> {
        match self {
            Completion::Ready(value) => Some(value),
            Completion::Pending(rx) => rx.try_recv().ok(),
        }
    }

    /// Wait for the value; `None` if the continuation was dropped
    pub async fn wait(self) -> Option<T> {
        match self {
            Completion::Ready(value) => Some(value),
            Completion::Pending(rx) => rx.recv().await.ok(),
        }
    }
}
