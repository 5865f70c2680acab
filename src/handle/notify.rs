//! One-shot disposal notification.

use parking_lot::Mutex;

type Callback = Box<dyn FnOnce() + Send>;

/// Completion flag plus a list of callbacks invoked exactly once.
///
/// Callbacks registered after the notifier fired run immediately on the
/// registering thread.
pub struct DisposeNotifier {
    // None once fired
    callbacks: Mutex<Option<Vec<Callback>>>,
}

impl DisposeNotifier {
    pub fn new() -> Self {
        Self {
            callbacks: Mutex::new(Some(Vec::new())),
        }
    }

    pub fn subscribe<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut guard = self.callbacks.lock();
        match guard.as_mut() {
            Some(list) => list.push(Box::new(callback)),
            None => {
                drop(guard);
                callback();
            }
        }
    }

    /// Fire all registered callbacks. Returns false if already fired.
    pub fn fire(&self) -> bool {
        // Take the list under the lock, invoke outside it so callbacks may subscribe again.
        let taken = self.callbacks.lock().take();
        match taken {
            Some(list) => {
                for callback in list {
                    callback();
                }
                true
            }
            None => false,
        }
    }

    pub fn has_fired(&self) -> bool {
        self.callbacks.lock().is_none()
    }
}

impl Default for DisposeNotifier {
    fn default() -> Self {
        Self::new()
    }
}
