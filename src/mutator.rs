//! The mutator pipeline: per-path write-transform hooks.
//!
//! A mutator is bound to exactly one path and sees every write command
//! targeting that path before it is applied. Its return value is what
//! actually happens: a value to write, [`WriteCommand::Delete`] to convert
//! the write into a removal, or [`WriteCommand::Cancel`] to abort that
//! path's write with the store untouched and nothing notified.

use std::rc::Rc;

use ahash::AHashMap;

use crate::store::Store;
use crate::value::Value;

/// A write command for one path.
///
/// The removal and cancellation sentinels are variants of a closed enum
/// rather than magic values, so they can never collide with real data.
#[derive(Debug, Clone)]
pub enum WriteCommand {
    /// Write this value.
    Value(Value),
    /// Remove the path, exactly as `delete` would. Also the proposed
    /// command a mutator sees when `delete` targets its path.
    Delete,
    /// Abort this path's write: store unmodified, nothing notified.
    Cancel,
}

impl WriteCommand {
    /// Shorthand for `WriteCommand::Value(value.into())`.
    pub fn value(value: impl Into<Value>) -> Self {
        WriteCommand::Value(value.into())
    }
}

impl From<Value> for WriteCommand {
    fn from(value: Value) -> Self {
        WriteCommand::Value(value)
    }
}

/// A per-path write-transform hook.
///
/// Receives the proposed command and the store itself, so it can perform
/// secondary writes on other paths; those writes join the in-progress
/// batch. Wrap secondary writes in
/// [`Store::without_mutation`] to keep them from re-entering the pipeline.
pub type Mutator = Rc<dyn Fn(&Store, WriteCommand) -> WriteCommand>;

/// The path → mutator table. Lookup is by exact path string.
#[derive(Default)]
pub(crate) struct MutatorTable {
    entries: AHashMap<Box<str>, Mutator>,
}

impl MutatorTable {
    pub fn insert(&mut self, path: &str, mutator: Mutator) {
        self.entries.insert(Box::from(path), mutator);
    }

    pub fn remove(&mut self, path: &str) {
        self.entries.remove(path);
    }

    pub fn get(&self, path: &str) -> Option<Mutator> {
        self.entries.get(path).cloned()
    }
}
