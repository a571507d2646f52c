//! Deferred destruction queue.
//!
//! Cleanup actions are pushed as resources are created and run in reverse
//! order of registration, so a resource is always destroyed before anything
//! it was created from. The owning component drains its queue during its
//! own teardown, after the device has gone idle.

use tracing::warn;

type CleanupAction = Box<dyn FnOnce() + Send>;

/// LIFO list of cleanup actions.
#[derive(Default)]
pub struct DeletionQueue {
    actions: Vec<CleanupAction>,
}

impl DeletionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cleanup action.
    pub fn push(&mut self, action: impl FnOnce() + Send + 'static) {
        self.actions.push(Box::new(action));
    }

    /// Run every registered action, most recent first.
    ///
    /// The queue is empty afterwards, so flushing again does nothing.
    pub fn flush(&mut self) {
        while let Some(action) = self.actions.pop() {
            action();
        }
    }

    /// Number of pending actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl Drop for DeletionQueue {
    fn drop(&mut self) {
        // Actions capture device handles that may already be gone here.
        if !self.actions.is_empty() {
            warn!(
                "Deletion queue dropped with {} pending actions",
                self.actions.len()
            );
        }
    }
}
