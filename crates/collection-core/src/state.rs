//! Minimal reactive value used to drive collection content.
//!
//! [`MutableState`] holds a value and notifies listeners with the old and new
//! value after every transition. The reconciliation core only relies on the
//! [`ReactiveSource`] contract, so any other observable type can feed a
//! collection by implementing it.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_SOURCE_ID: AtomicUsize = AtomicUsize::new(1);

fn next_source_id() -> SourceId {
    SourceId(NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed))
}

/// Stable identifier of a reactive source, used to deduplicate subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(usize);

/// Anything the scheduler can subscribe to.
pub trait ReactiveSource {
    fn source_id(&self) -> SourceId;

    /// Registers `on_change`; dropping the returned [`Subscription`]
    /// unregisters it.
    fn subscribe(&self, on_change: Rc<dyn Fn()>) -> Subscription;
}

/// Handle to a registered listener. Unsubscribes on drop.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

type Listener<T> = Rc<dyn Fn(&T, &T)>;

struct StateInner<T> {
    id: SourceId,
    value: RefCell<T>,
    listeners: RefCell<Vec<(u64, Listener<T>)>>,
    next_listener: Cell<u64>,
}

impl<T> StateInner<T> {
    fn remove_listener(&self, id: u64) {
        self.listeners
            .borrow_mut()
            .retain(|(candidate, _)| *candidate != id);
    }
}

/// Shared, observable value. Clones share the same value.
pub struct MutableState<T> {
    inner: Rc<StateInner<T>>,
}

impl<T> Clone for MutableState<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> PartialEq for MutableState<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Eq for MutableState<T> {}

impl<T: 'static> MutableState<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(StateInner {
                id: next_source_id(),
                value: RefCell::new(value),
                listeners: RefCell::new(Vec::new()),
                next_listener: Cell::new(1),
            }),
        }
    }

    pub fn id(&self) -> SourceId {
        self.inner.id
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Registers a listener called with `(old, new)` after every transition.
    pub fn listen(&self, listener: impl Fn(&T, &T) + 'static) -> Subscription {
        let id = self.inner.next_listener.get();
        self.inner.next_listener.set(id + 1);
        self.inner
            .listeners
            .borrow_mut()
            .push((id, Rc::new(listener)));
        let weak: Weak<StateInner<T>> = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.remove_listener(id);
            }
        })
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }
}

impl<T: Clone + 'static> MutableState<T> {
    pub fn value(&self) -> T {
        self.inner.value.borrow().clone()
    }

    pub fn get(&self) -> T {
        self.value()
    }

    pub fn set(&self, value: T) {
        let old = self.inner.value.replace(value);
        self.notify(&old);
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let old = self.value();
        let result = f(&mut self.inner.value.borrow_mut());
        self.notify(&old);
        result
    }

    fn notify(&self, old: &T) {
        // Listeners may subscribe, unsubscribe or write again while running.
        let listeners: Vec<Listener<T>> = self
            .inner
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        if listeners.is_empty() {
            return;
        }
        let new = self.value();
        for listener in listeners {
            listener(old, &new);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for MutableState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutableState")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}

/// Collections only reload when the value actually changed.
impl<T: Clone + PartialEq + 'static> ReactiveSource for MutableState<T> {
    fn source_id(&self) -> SourceId {
        self.id()
    }

    fn subscribe(&self, on_change: Rc<dyn Fn()>) -> Subscription {
        self.listen(move |old, new| {
            if old != new {
                on_change();
            }
        })
    }
}
