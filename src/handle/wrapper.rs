//! Owning wrapper around one native reference.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::trace;

use crate::error::{Error, Result};
use crate::handle::{DisposeNotifier, NativeHandle};
use crate::native::NativeApi;

/// Owns exactly one native reference and releases it on first disposal.
///
/// Disposal is first-caller-wins: any number of threads may call
/// [`RefHandle::dispose`] concurrently and the native release runs once.
/// Dropping the wrapper disposes it.
pub struct RefHandle {
    value: NativeHandle,
    api: Arc<dyn NativeApi>,
    // incremented by every dispose() call; only the call that sees 0 releases
    dispose_counter: AtomicUsize,
    disposed: DisposeNotifier,
}

impl RefHandle {
    /// Take ownership of one native reference.
    pub fn new(api: Arc<dyn NativeApi>, value: NativeHandle) -> Result<Self> {
        if !value.is_valid() {
            return Err(Error::InvalidHandle(value.kind()));
        }
        Ok(Self {
            value,
            api,
            dispose_counter: AtomicUsize::new(0),
            disposed: DisposeNotifier::new(),
        })
    }

    /// Underlying handle regardless of disposal state. Only for identity checks and logging.
    pub fn value(&self) -> NativeHandle {
        self.value
    }

    /// Underlying handle for a native call, or `ObjectDisposed`.
    pub fn value_not_disposed(&self) -> Result<NativeHandle> {
        self.check_not_disposed()?;
        Ok(self.value)
    }

    pub fn check_not_disposed(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(Error::disposed(self.value));
        }
        Ok(())
    }

    pub fn is_disposed(&self) -> bool {
        self.dispose_counter.load(Ordering::Acquire) > 0
    }

    pub fn api(&self) -> &Arc<dyn NativeApi> {
        &self.api
    }

    /// Release the native reference. Returns true for the single call that released it.
    pub fn dispose(&self) -> bool {
        if self.dispose_counter.fetch_add(1, Ordering::AcqRel) != 0 {
            return false;
        }
        trace!(handle = %self.value, "releasing native reference");
        self.api.release(self.value);
        self.disposed.fire();
        true
    }

    /// Add one native reference and return an independent owner of it.
    pub fn duplicate(&self) -> Result<RefHandle> {
        if self.is_disposed() {
            return Err(Error::InvalidOperation(format!(
                "cannot duplicate disposed {}",
                self.value
            )));
        }
        if !self.api.add_ref(self.value) {
            return Err(Error::InvalidHandle(self.value.kind()));
        }
        RefHandle::new(self.api.clone(), self.value)
    }

    /// Run `callback` once, after the native reference has been released.
    pub fn on_disposed<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.disposed.subscribe(callback);
    }
}

impl Drop for RefHandle {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl PartialEq for RefHandle {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for RefHandle {}

impl Hash for RefHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl fmt::Debug for RefHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefHandle")
            .field("value", &self.value)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl fmt::Display for RefHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.value, f)
    }
}
