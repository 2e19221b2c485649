//! Path-bound accessors: lightweight handles that pair a store with one
//! path, so call sites pass a single object instead of a store and a
//! string.

use std::rc::{Rc, Weak};

use crate::error::StoreError;
use crate::mutator::WriteCommand;
use crate::store::{Store, StoreInner};
use crate::value::Value;

/// A handle bound to one path of one store.
///
/// Obtained from [`Store::accessor`], which caches one accessor per path,
/// so repeated requests for the same path return equal handles. The
/// accessor holds the store weakly: it does not keep the store alive, and
/// once the store is gone, reads return `Undefined` or `false` and writes
/// are no-ops.
#[derive(Clone)]
pub struct Accessor {
    store: Weak<StoreInner>,
    path: Rc<str>,
}

impl PartialEq for Accessor {
    fn eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.store, &other.store) && self.path == other.path
    }
}

impl Eq for Accessor {}

impl std::fmt::Debug for Accessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Accessor").field("path", &self.path).finish()
    }
}

impl Accessor {
    pub(crate) fn new(store: Weak<StoreInner>, path: &str) -> Self {
        Self {
            store,
            path: Rc::from(path),
        }
    }

    fn store(&self) -> Option<Store> {
        self.store.upgrade().map(|inner| Store { inner })
    }

    /// The path this accessor is bound to.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Read the bound path, exactly as [`Store::get`] would. `Undefined`
    /// after the store is dropped.
    pub fn get(&self) -> Value {
        match self.store() {
            Some(store) => store.get(&self.path),
            None => Value::Undefined,
        }
    }

    /// Whether the bound path exists, exactly as [`Store::has`] would.
    /// `false` after the store is dropped.
    pub fn has(&self) -> bool {
        match self.store() {
            Some(store) => store.has(&self.path),
            None => false,
        }
    }

    /// Compare the bound path against a primitive-like value, exactly as
    /// [`Store::equals`] would. `Ok(false)` after the store is dropped.
    pub fn equals(&self, compare: &Value) -> Result<bool, StoreError> {
        match self.store() {
            Some(store) => store.equals(&self.path, compare),
            None => Ok(false),
        }
    }

    /// Write the bound path, exactly as [`Store::assign`] would. A no-op
    /// after the store is dropped.
    pub fn set(&self, value: impl Into<Value>) {
        if let Some(store) = self.store() {
            store.assign(&self.path, value);
        }
    }

    /// Remove the bound path, exactly as [`Store::delete`] would. A no-op
    /// after the store is dropped.
    pub fn delete(&self) {
        if let Some(store) = self.store() {
            store.delete(&self.path);
        }
    }

    /// Apply an explicit write command to the bound path, exactly as
    /// [`Store::apply`] would. A no-op after the store is dropped.
    pub fn apply(&self, command: WriteCommand) {
        if let Some(store) = self.store() {
            store.apply(&self.path, command);
        }
    }

    /// An accessor for a key nested under this one, pulled from the
    /// store's per-path cache.
    pub fn sub(&self, key: &str) -> Accessor {
        let path = format!("{}.{}", self.path, key);
        match self.store() {
            Some(store) => store.accessor(&path),
            None => Accessor::new(Weak::clone(&self.store), &path),
        }
    }
}
