use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

pub type InvalidationCallback = Box<dyn FnOnce() + Send>;

/// Backend half of a server port.
pub trait ServerPortHandle: Send + Sync {
    fn is_valid(&self) -> bool;

    /// Runs `callback` once the port dies, or straight away if it already has.
    fn on_invalidation(&self, callback: InvalidationCallback);
}

/// Handle to the window server's communication endpoint, used to notice the
/// server exiting. The handle is released when dropped and stays invalid if the
/// server restarts; ask for a new one instead.
pub struct ServerPort {
    handle: Box<dyn ServerPortHandle>,
}

impl ServerPort {
    pub fn new(handle: Box<dyn ServerPortHandle>) -> Self {
        Self { handle }
    }

    pub fn is_valid(&self) -> bool {
        self.handle.is_valid()
    }

    pub fn on_invalidation<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.handle.on_invalidation(Box::new(callback));
    }
}

impl std::fmt::Debug for ServerPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerPort")
            .field("valid", &self.is_valid())
            .finish()
    }
}

/// Port state shared between a [`ServerPort`] and the in-process server.
pub struct LocalPort {
    valid: AtomicBool,
    callbacks: Mutex<Vec<InvalidationCallback>>,
}

impl LocalPort {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            valid: AtomicBool::new(true),
            callbacks: Mutex::new(Vec::new()),
        })
    }

    pub fn invalidate(&self) {
        if !self.valid.swap(false, Ordering::SeqCst) {
            return;
        }

        let callbacks = std::mem::take(&mut *self.callbacks.lock());
        tracing::debug!(
            "server port invalidated, running {} callback(s)",
            callbacks.len()
        );

        for callback in callbacks {
            callback();
        }
    }
}

impl ServerPortHandle for Arc<LocalPort> {
    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    fn on_invalidation(&self, callback: InvalidationCallback) {
        {
            let mut callbacks = self.callbacks.lock();
            if self.valid.load(Ordering::SeqCst) {
                callbacks.push(callback);
                return;
            }
        }

        callback();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_new_port_is_valid() {
        let local = LocalPort::new();
        assert!(ServerPort::new(Box::new(local.clone())).is_valid());

        local.invalidate();
        assert!(!ServerPort::new(Box::new(local)).is_valid());
    }

    #[test]
    fn test_invalidation_runs_callbacks_once() {
        let local = LocalPort::new();
        let port = ServerPort::new(Box::new(local.clone()));
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = fired.clone();
        port.on_invalidation(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(port.is_valid());
        local.invalidate();
        local.invalidate();

        assert!(!port.is_valid());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_on_dead_port_runs_immediately() {
        let local = LocalPort::new();
        local.invalidate();

        let port = ServerPort::new(Box::new(local));
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        port.on_invalidation(move || flag.store(true, Ordering::SeqCst));

        assert!(fired.load(Ordering::SeqCst));
    }
}
