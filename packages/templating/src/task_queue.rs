//! Task Queue
//!
//! Microtask queue for coalesced property notifications plus a local
//! executor that drives animation and loading continuations. Everything
//! runs on the thread that owns the queue.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::rc::Rc;

use smol::LocalExecutor;

/// Work item deferred until the current synchronous turn ends
pub trait MicroTask {
    fn call(&self);
}

pub struct TaskQueue {
    micro_tasks: RefCell<VecDeque<Rc<dyn MicroTask>>>,
    flushing: Cell<bool>,
    executor: LocalExecutor<'static>,
}

impl TaskQueue {
    pub fn new() -> Self {
        TaskQueue {
            micro_tasks: RefCell::new(VecDeque::new()),
            flushing: Cell::new(false),
            executor: LocalExecutor::new(),
        }
    }

    pub fn queue_micro_task(&self, task: Rc<dyn MicroTask>) {
        self.micro_tasks.borrow_mut().push_back(task);
    }

    pub fn pending_micro_tasks(&self) -> usize {
        self.micro_tasks.borrow().len()
    }

    /// Run queued microtasks, including ones queued while flushing
    pub fn flush_micro_task_queue(&self) {
        if self.flushing.replace(true) {
            return;
        }
        loop {
            let next = self.micro_tasks.borrow_mut().pop_front();
            match next {
                Some(task) => task.call(),
                None => break,
            }
        }
        self.flushing.set(false);
    }

    /// Schedule a continuation on the local executor
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + 'static,
    {
        self.executor.spawn(future).detach();
    }

    /// Block on `future` while driving spawned continuations, then drain
    /// the microtasks it queued
    pub fn run<T>(&self, future: impl Future<Output = T>) -> T {
        let result = smol::block_on(self.executor.run(future));
        self.flush();
        result
    }

    /// Drive microtasks and spawned continuations until nothing is runnable.
    /// Continuations waiting on an external signal stay parked.
    pub fn flush(&self) {
        loop {
            self.flush_micro_task_queue();
            if !self.executor.try_tick() && self.micro_tasks.borrow().is_empty() {
                break;
            }
        }
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
