use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Shared, single-threaded handle to a store.
///
/// Everything in the sync core runs on one cooperative event loop, so the
/// handle is `Rc<RefCell<_>>` rather than a lock. Borrows never outlive a
/// [`read`](Self::read) / [`update`](Self::update) call, which means no borrow
/// is ever held across an `.await`.
///
/// Every `update` bumps [`revision`](Self::revision) so a UI can cheaply tell
/// whether anything changed since it last rendered.
pub struct StoreHandle<S> {
    inner: Rc<RefCell<S>>,
    revision: Rc<Cell<u64>>,
}

impl<S> StoreHandle<S> {
    pub fn new(store: S) -> Self {
        Self {
            inner: Rc::new(RefCell::new(store)),
            revision: Rc::new(Cell::new(0)),
        }
    }

    /// Run `f` against the current state.
    pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.inner.borrow())
    }

    /// Run `f` with exclusive access and bump the revision.
    ///
    /// `f` must not call back into the same handle.
    pub fn update<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        let result = f(&mut self.inner.borrow_mut());
        self.revision.set(self.revision.get().wrapping_add(1));
        result
    }

    pub fn revision(&self) -> u64 {
        self.revision.get()
    }

    /// True when both handles point at the same store.
    pub fn same_store(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<S: Clone> StoreHandle<S> {
    pub fn snapshot(&self) -> S {
        self.inner.borrow().clone()
    }
}

impl<S: Default> Default for StoreHandle<S> {
    fn default() -> Self {
        Self::new(S::default())
    }
}

impl<S> Clone for StoreHandle<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            revision: Rc::clone(&self.revision),
        }
    }
}

impl<S: fmt::Debug> fmt::Debug for StoreHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreHandle")
            .field("revision", &self.revision.get())
            .field("store", &self.inner.borrow())
            .finish()
    }
}
