//! Disposable resource contract and child ownership tracking.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::error::Result;

/// A wrapper owning one native reference that can be released explicitly.
///
/// `dispose` is idempotent and safe to call from several threads at once.
/// `on_disposed` callbacks run exactly once, after the native release.
pub trait Disposable: Send + Sync {
    fn dispose(&self);

    fn is_disposed(&self) -> bool;

    fn on_disposed(&self, callback: Box<dyn FnOnce() + Send>);
}

/// Wrappers that can hand out a second, independently owned reference to
/// the same native object.
pub trait DuplicateReference: Sized {
    fn duplicate_reference(&self) -> Result<Self>;
}

/// Tracks children a composite resource created and disposes them with it.
///
/// Thread safe. Children the caller already disposed are skipped.
#[derive(Default)]
pub struct ChildTracker {
    children: Mutex<Vec<Arc<dyn Disposable>>>,
}

impl ChildTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `child` for later disposal and hand it back.
    pub fn register<T>(&self, child: Arc<T>) -> Arc<T>
    where
        T: Disposable + 'static,
    {
        if child.is_disposed() {
            return child;
        }
        let mut children = self.children.lock();
        children.retain(|c| !c.is_disposed());
        children.push(child.clone() as Arc<dyn Disposable>);
        child
    }

    /// Dispose every still-alive child. Later registrations are tracked afresh.
    pub fn dispose_all(&self) {
        let taken = std::mem::take(&mut *self.children.lock());
        if !taken.is_empty() {
            trace!(count = taken.len(), "disposing tracked children");
        }
        for child in taken {
            if !child.is_disposed() {
                child.dispose();
            }
        }
    }

    /// Number of tracked children not yet disposed.
    pub fn live_count(&self) -> usize {
        self.children
            .lock()
            .iter()
            .filter(|c| !c.is_disposed())
            .count()
    }
}
