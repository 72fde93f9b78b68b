use crate::geometry::MoveDelta;
use crate::geometry::Rect;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt::Debug;
use std::fmt::Formatter;
use std::sync::Arc;

/// Invoked with the refreshed rectangles, in global coordinates.
pub type ScreenRefreshCallback = fn(rects: &[Rect], user_info: &UserInfo);

/// Invoked with the move delta and the moved rectangles as they were before the
/// move. The slice must not outlive the call.
pub type ScreenUpdateMoveCallback = fn(delta: MoveDelta, rects: &[Rect], user_info: &UserInfo);

/// Context handed back to a callback. Two values are the same context only if
/// both are empty or both point at the same allocation.
#[derive(Clone, Default)]
pub struct UserInfo(Option<Arc<dyn Any + Send + Sync>>);

impl UserInfo {
    pub const fn none() -> Self {
        Self(None)
    }

    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Some(Arc::new(value)))
    }

    pub fn from_arc(value: Arc<dyn Any + Send + Sync>) -> Self {
        Self(Some(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.as_deref().and_then(|value| value.downcast_ref::<T>())
    }

    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    pub fn same_context(&self, other: &UserInfo) -> bool {
        match (&self.0, &other.0) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Debug for UserInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            None => write!(f, "UserInfo(null)"),
            Some(value) => write!(f, "UserInfo({:p})", Arc::as_ptr(value)),
        }
    }
}

/// A function pointer that can be compared by address.
pub trait CallbackFn: Copy + Send + Sync + 'static {
    fn same_fn(self, other: Self) -> bool;
}

impl CallbackFn for ScreenRefreshCallback {
    fn same_fn(self, other: Self) -> bool {
        std::ptr::fn_addr_eq(self, other)
    }
}

impl CallbackFn for ScreenUpdateMoveCallback {
    fn same_fn(self, other: Self) -> bool {
        std::ptr::fn_addr_eq(self, other)
    }
}

#[derive(Debug, Clone)]
pub struct Registration<F> {
    pub callback: F,
    pub user_info: UserInfo,
}

impl<F: CallbackFn> Registration<F> {
    pub fn matches(&self, callback: F, user_info: &UserInfo) -> bool {
        self.callback.same_fn(callback) && self.user_info.same_context(user_info)
    }
}

/// Table of `(callback, user_info)` pairs.
///
/// Registering the same pair twice adds two entries and each unregister removes
/// one of them.
#[derive(Debug)]
pub struct CallbackRegistry<F> {
    entries: Mutex<Vec<Registration<F>>>,
}

impl<F> Default for CallbackRegistry<F> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }
}

impl<F: CallbackFn> CallbackRegistry<F> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when this was the first entry in the table.
    pub fn register(&self, callback: F, user_info: UserInfo) -> bool {
        let mut entries = self.entries.lock();
        entries.push(Registration {
            callback,
            user_info,
        });

        entries.len() == 1
    }

    /// Removes the most recent entry matching both the callback and the
    /// context. Returns false when nothing matched.
    pub fn unregister(&self, callback: F, user_info: &UserInfo) -> bool {
        let mut entries = self.entries.lock();
        match entries
            .iter()
            .rposition(|entry| entry.matches(callback, user_info))
        {
            Some(idx) => {
                entries.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn contains(&self, callback: F, user_info: &UserInfo) -> bool {
        self.entries
            .lock()
            .iter()
            .any(|entry| entry.matches(callback, user_info))
    }

    /// Copy of the table so callbacks run without the lock held and may
    /// register or unregister from inside the call.
    pub fn snapshot(&self) -> Vec<Registration<F>> {
        self.entries.lock().clone()
    }
}

impl CallbackRegistry<ScreenRefreshCallback> {
    pub fn dispatch(&self, rects: &[Rect]) {
        for entry in self.snapshot() {
            (entry.callback)(rects, &entry.user_info);
        }
    }
}

impl CallbackRegistry<ScreenUpdateMoveCallback> {
    pub fn dispatch(&self, delta: MoveDelta, rects: &[Rect]) {
        for entry in self.snapshot() {
            (entry.callback)(delta, rects, &entry.user_info);
        }
    }
}
