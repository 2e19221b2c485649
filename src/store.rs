//! The store facade: path-addressable reads and writes over the value
//! tree, composed with dependency tracking, diffing, batching, and the
//! mutator pipeline.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use ahash::AHashMap;

use crate::accessor::Accessor;
use crate::batch::Batch;
use crate::diff::{self, DiffCtx, Seen};
use crate::equality::EqualityRegistry;
use crate::error::StoreError;
use crate::mutator::{Mutator, MutatorTable, WriteCommand};
use crate::node::{DepTree, NodeId};
use crate::observer::{NullContext, ObserverContext};
use crate::path::PathCache;
use crate::value::{prim_matches, Primitive, Value};

/// A path-addressable, deeply observable value container.
///
/// Reads (`get`, `has`, `equals`) register the ambient computation's
/// interest at path granularity; writes (`set`, `assign`, `delete`,
/// `clear`) diff old against new and notify exactly the subscriptions whose
/// observed value actually changed, coalesced into one flush per top-level
/// write.
///
/// This is cheap to clone - all state is behind `Rc`. The store is
/// single-threaded and single-writer by design: no operation suspends or
/// blocks, and reentrant calls from mutators or observer callbacks join the
/// in-progress batch.
#[derive(Clone)]
pub struct Store {
    pub(crate) inner: Rc<StoreInner>,
}

pub(crate) struct StoreInner {
    root: RefCell<Value>,
    /// Whether the current root is a plain mapping or sequence that is not
    /// shallow-marked. Kept consistent with the root on every root write.
    traversable: Cell<bool>,
    tree: RefCell<DepTree>,
    paths: PathCache,
    registry: RefCell<EqualityRegistry>,
    mutators: RefCell<MutatorTable>,
    batch: Batch,
    bypass_mutators: Cell<bool>,
    context: Rc<dyn ObserverContext>,
    accessors: RefCell<AHashMap<Box<str>, Accessor>>,
}

/// Builder for customizing a [`Store`].
///
/// # Example
///
/// ```ignore
/// let store = Store::builder()
///     .initial(Value::map_from([("count", 0)]))
///     .context(scope.clone())
///     .mutator("count", |_, cmd| cmd)
///     .build();
/// ```
pub struct StoreBuilder {
    initial: Value,
    context: Rc<dyn ObserverContext>,
    registry: EqualityRegistry,
    mutators: Vec<(String, Mutator)>,
}

impl Default for StoreBuilder {
    fn default() -> Self {
        Self {
            initial: Value::Undefined,
            context: Rc::new(NullContext),
            registry: EqualityRegistry::default(),
            mutators: Vec::new(),
        }
    }
}

impl StoreBuilder {
    /// The root value the store starts with. Defaults to `Undefined`.
    pub fn initial(mut self, value: impl Into<Value>) -> Self {
        self.initial = value.into();
        self
    }

    /// The ambient reactive context consulted on every read. Defaults to
    /// [`NullContext`] (reads never register subscriptions).
    pub fn context(mut self, context: Rc<dyn ObserverContext>) -> Self {
        self.context = context;
        self
    }

    /// The equality registry for opaque instances. Defaults to
    /// [`EqualityRegistry::default`] with the built-in categories.
    pub fn equality(mut self, registry: EqualityRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Bind a mutator to one exact path.
    ///
    /// A mutator that writes its own path again re-enters itself; that
    /// behavior is implementation-defined, and secondary writes should be
    /// wrapped in [`Store::without_mutation`].
    pub fn mutator(
        mut self,
        path: &str,
        mutator: impl Fn(&Store, WriteCommand) -> WriteCommand + 'static,
    ) -> Self {
        self.mutators.push((path.to_owned(), Rc::new(mutator)));
        self
    }

    /// Build the store.
    pub fn build(self) -> Store {
        let traversable = self.initial.is_traversable();
        let mut mutators = MutatorTable::default();
        for (path, mutator) in self.mutators {
            mutators.insert(&path, mutator);
        }
        Store {
            inner: Rc::new(StoreInner {
                root: RefCell::new(self.initial),
                traversable: Cell::new(traversable),
                tree: RefCell::new(DepTree::new()),
                paths: PathCache::default(),
                registry: RefCell::new(self.registry),
                mutators: RefCell::new(mutators),
                batch: Batch::default(),
                bypass_mutators: Cell::new(false),
                context: self.context,
                accessors: RefCell::new(AHashMap::new()),
            }),
        }
    }
}

impl Store {
    /// Create a store with default settings and an initial root value.
    pub fn new(initial: impl Into<Value>) -> Self {
        Self::builder().initial(initial).build()
    }

    /// Create a builder for customizing the store.
    pub fn builder() -> StoreBuilder {
        StoreBuilder::default()
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Read the value at a path, registering the ambient computation's
    /// interest in it.
    ///
    /// Always safe to call: returns `Undefined` when any intermediate
    /// segment is absent or not traversable. Absence and an explicitly
    /// stored `Undefined` are indistinguishable here; use [`has`](Self::has)
    /// to tell them apart.
    pub fn get(&self, path: &str) -> Value {
        let tokens = self.inner.paths.resolve(path);
        if let Some(subscriber) = self.inner.context.active() {
            let mut tree = self.inner.tree.borrow_mut();
            let root = tree.root();
            let id = tree.ensure(root, &tokens);
            tree.node_mut(id).value_subs.add(&subscriber);
        }
        self.value_at(&tokens)
    }

    /// Read the root value, registering interest in it.
    pub fn get_root(&self) -> Value {
        let subscriber = self.inner.context.active();
        if let Some(subscriber) = subscriber {
            let mut tree = self.inner.tree.borrow_mut();
            let root = tree.root();
            tree.node_mut(root).value_subs.add(&subscriber);
        }
        self.inner.root.borrow().clone()
    }

    /// Whether a path currently exists, registering an existence-only
    /// dependency (distinct from `get`: a present-but-`Undefined` mapping
    /// entry exists even though `get` returns `Undefined` for it).
    pub fn has(&self, path: &str) -> bool {
        let tokens = self.inner.paths.resolve(path);
        if let Some(subscriber) = self.inner.context.active() {
            let mut tree = self.inner.tree.borrow_mut();
            let root = tree.root();
            let id = tree.ensure(root, &tokens);
            tree.node_mut(id).exists_subs.add(&subscriber);
        }
        let mut current = self.inner.root.borrow().clone();
        for token in &tokens[..tokens.len() - 1] {
            current = current.get_key(token);
        }
        current.contains_key(&tokens[tokens.len() - 1])
    }

    /// Whether the value at a path equals a primitive-like compare value,
    /// registering interest in the equality *verdict* rather than the
    /// value. The subscription fires only when the verdict flips, so many
    /// observers can each watch a different candidate at the same path
    /// without all re-running on every change.
    ///
    /// # Errors
    ///
    /// [`StoreError::StructuralCompare`] if `compare` is a mapping,
    /// sequence, or opaque instance.
    pub fn equals(&self, path: &str, compare: &Value) -> Result<bool, StoreError> {
        let prim = Self::compare_key(path, compare)?;
        let tokens = self.inner.paths.resolve(path);
        let current = self.value_at(&tokens);
        let equal = prim_matches(&prim, &current);
        if let Some(subscriber) = self.inner.context.active() {
            let mut tree = self.inner.tree.borrow_mut();
            let root = tree.root();
            let id = tree.ensure(root, &tokens);
            let node = tree.node_mut(id);
            node.compare_subs.entry(prim.clone()).or_default().add(&subscriber);
            if equal {
                node.active_compare = Some(prim);
            }
        }
        Ok(equal)
    }

    /// Root-addressed form of [`equals`](Self::equals).
    pub fn equals_root(&self, compare: &Value) -> Result<bool, StoreError> {
        let prim = Self::compare_key("(root)", compare)?;
        let current = self.inner.root.borrow().clone();
        let equal = prim_matches(&prim, &current);
        if let Some(subscriber) = self.inner.context.active() {
            let mut tree = self.inner.tree.borrow_mut();
            let root = tree.root();
            let node = tree.node_mut(root);
            node.compare_subs.entry(prim.clone()).or_default().add(&subscriber);
            if equal {
                node.active_compare = Some(prim);
            }
        }
        Ok(equal)
    }

    fn compare_key(path: &str, compare: &Value) -> Result<Primitive, StoreError> {
        compare.as_primitive().ok_or_else(|| StoreError::StructuralCompare {
            path: path.to_owned(),
            category: compare.type_label(),
        })
    }

    fn value_at(&self, tokens: &[Box<str>]) -> Value {
        let mut current = self.inner.root.borrow().clone();
        for token in tokens {
            current = current.get_key(token);
        }
        current
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Replace the root wholesale, diffing old against new inside one
    /// batch. Bypasses the mutator pipeline: mutators bind to string paths
    /// and the root has none.
    pub fn set(&self, value: impl Into<Value>) {
        let new = value.into();
        self.inner.batch.enter();
        let old = self.inner.root.replace(new.clone());
        self.inner.traversable.set(new.is_traversable());
        let root = self.inner.tree.borrow().root();
        self.diff_at(Some(root), &old, &new);
        self.inner.batch.leave();
    }

    /// Write a value at a path, creating missing intermediate segments as
    /// empty mappings (never sequences, even for numeric tokens). A root
    /// that is not traversable is coerced to an empty mapping first. The
    /// write is routed through the path's mutator, if any.
    pub fn assign(&self, path: &str, value: impl Into<Value>) {
        self.apply(path, WriteCommand::Value(value.into()));
    }

    /// Write several paths in one batch. Iteration order is unspecified
    /// and must not be relied upon.
    pub fn assign_many<K, V, I>(&self, entries: I)
    where
        K: AsRef<str>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.inner.batch.enter();
        for (path, value) in entries {
            self.apply_path(path.as_ref(), WriteCommand::Value(value.into()));
        }
        self.inner.batch.leave();
    }

    /// Remove a path. The path's mutator sees [`WriteCommand::Delete`] as
    /// the proposed command (a last chance for side effects or
    /// cancellation). A no-op without notification when the root is not
    /// traversable or the path does not exist.
    pub fn delete(&self, path: &str) {
        self.apply(path, WriteCommand::Delete);
    }

    /// Remove several paths in one batch.
    pub fn delete_many<'a>(&self, paths: impl IntoIterator<Item = &'a str>) {
        self.inner.batch.enter();
        for path in paths {
            self.apply_path(path, WriteCommand::Delete);
        }
        self.inner.batch.leave();
    }

    /// Apply an explicit write command to a path, through the mutator
    /// pipeline and inside one batch. `assign` and `delete` are shorthands
    /// for this.
    pub fn apply(&self, path: &str, command: WriteCommand) {
        self.inner.batch.enter();
        self.apply_path(path, command);
        self.inner.batch.leave();
    }

    /// Replace a traversable root with a new empty value of the same
    /// category; set a non-traversable root to `Undefined`. Implemented as
    /// [`set`](Self::set), so it goes through the full diff.
    pub fn clear(&self) {
        let next = if self.inner.traversable.get() {
            match &*self.inner.root.borrow() {
                Value::List(_) => Value::list(),
                _ => Value::map(),
            }
        } else {
            Value::Undefined
        };
        self.set(next);
    }

    fn apply_path(&self, path: &str, command: WriteCommand) {
        let mutator = if self.inner.bypass_mutators.get() {
            None
        } else {
            self.inner.mutators.borrow().get(path)
        };
        let command = match mutator {
            Some(mutator) => mutator(self, command),
            None => command,
        };
        match command {
            WriteCommand::Cancel => {}
            WriteCommand::Delete => self.remove_path(path),
            WriteCommand::Value(value) => self.write_path(path, value),
        }
    }

    fn write_path(&self, path: &str, new: Value) {
        let tokens = self.inner.paths.resolve(path);
        if !self.inner.traversable.get() {
            // Coerce the root so the path has somewhere to live; the
            // replacement is itself a root change.
            let old_root = self.inner.root.replace(Value::map());
            self.inner.traversable.set(true);
            let new_root = self.inner.root.borrow().clone();
            let root = self.inner.tree.borrow().root();
            self.diff_at(Some(root), &old_root, &new_root);
        }

        // Walk to the parent, creating missing (or non-traversable)
        // intermediates as empty mappings, and remember each ancestor's
        // dependency node and current value.
        let root = self.inner.tree.borrow().root();
        let mut ancestors: Vec<(NodeId, Value)> = Vec::new();
        let mut node = Some(root);
        let mut current = self.inner.root.borrow().clone();
        let mut created = false;
        ancestors.push((root, current.clone()));
        for token in &tokens[..tokens.len() - 1] {
            node = node.and_then(|id| self.inner.tree.borrow().child(id, token));
            let next = current.get_key(token);
            let next = if next.is_traversable() {
                next
            } else {
                let existed = current.contains_key(token);
                let map = Value::map();
                current.set_key(token, map.clone());
                created = true;
                if !existed {
                    if let Some(id) = node {
                        self.queue_exists(id);
                    }
                }
                map
            };
            current = next;
            if let Some(id) = node {
                ancestors.push((id, current.clone()));
            }
        }

        let key = &tokens[tokens.len() - 1];
        let target = node.and_then(|id| self.inner.tree.borrow().child(id, key));
        let old_existed = current.contains_key(key);
        let old = current.get_key(key);
        current.set_key(key, new);
        let new_existed = current.contains_key(key);

        // Diff against what actually landed; a rejected write (a
        // non-numeric key on a sequence) reads back unchanged.
        let stored = current.get_key(key);
        let changed = self.diff_at(target, &old, &stored);
        if old_existed != new_existed {
            if let Some(id) = target {
                self.queue_exists(id);
            }
        }
        if changed || created {
            self.notify_ancestors(&ancestors);
        }
    }

    fn remove_path(&self, path: &str) {
        if !self.inner.traversable.get() {
            return;
        }
        let tokens = self.inner.paths.resolve(path);
        let root = self.inner.tree.borrow().root();
        let mut ancestors: Vec<(NodeId, Value)> = Vec::new();
        let mut node = Some(root);
        let mut current = self.inner.root.borrow().clone();
        ancestors.push((root, current.clone()));
        for token in &tokens[..tokens.len() - 1] {
            node = node.and_then(|id| self.inner.tree.borrow().child(id, token));
            current = current.get_key(token);
            if !current.is_traversable() {
                // Benign absence: nothing to remove, nothing to notify.
                return;
            }
            if let Some(id) = node {
                ancestors.push((id, current.clone()));
            }
        }

        let key = &tokens[tokens.len() - 1];
        if !current.contains_key(key) {
            return;
        }
        let old = current.get_key(key);
        current.remove_key(key);
        let target = node.and_then(|id| self.inner.tree.borrow().child(id, key));

        let changed = self.diff_at(target, &old, &Value::Undefined);
        if let Some(id) = target {
            self.queue_exists(id);
        }
        if changed {
            self.notify_ancestors(&ancestors);
        }
    }

    fn diff_at(&self, node: Option<NodeId>, old: &Value, new: &Value) -> bool {
        let mut tree = self.inner.tree.borrow_mut();
        let registry = self.inner.registry.borrow();
        let mut ctx = DiffCtx {
            tree: &mut *tree,
            batch: &self.inner.batch,
            registry: &*registry,
        };
        let mut seen = Seen::default();
        diff::diff(&mut ctx, node, old, new, &mut seen)
    }

    /// A confirmed change at a path is also a change of every ancestor
    /// container: queue their value subscriptions and refresh their
    /// equality verdicts against the current values.
    fn notify_ancestors(&self, ancestors: &[(NodeId, Value)]) {
        let mut tree = self.inner.tree.borrow_mut();
        for (id, value) in ancestors {
            let node = tree.node_mut(*id);
            node.queue_value_subs(&self.inner.batch);
            node.refresh_active(value, &self.inner.batch);
        }
    }

    fn queue_exists(&self, id: NodeId) {
        let mut tree = self.inner.tree.borrow_mut();
        self.inner
            .batch
            .queue_set(&tree.node_mut(id).exists_subs);
    }

    // ------------------------------------------------------------------
    // Mutators
    // ------------------------------------------------------------------

    /// Merge entries into the path → mutator table. Takes effect on
    /// subsequent writes only.
    pub fn update_mutators(&self, entries: impl IntoIterator<Item = (String, Mutator)>) {
        let mut mutators = self.inner.mutators.borrow_mut();
        for (path, mutator) in entries {
            mutators.insert(&path, mutator);
        }
    }

    /// Bind one mutator to one exact path.
    pub fn update_mutator(
        &self,
        path: &str,
        mutator: impl Fn(&Store, WriteCommand) -> WriteCommand + 'static,
    ) {
        self.inner.mutators.borrow_mut().insert(path, Rc::new(mutator));
    }

    /// Remove mutators for the given paths.
    pub fn remove_mutators<'a>(&self, paths: impl IntoIterator<Item = &'a str>) {
        let mut mutators = self.inner.mutators.borrow_mut();
        for path in paths {
            mutators.remove(path);
        }
    }

    /// Run `operation` with the mutator pipeline bypassed. Used inside a
    /// mutator to perform secondary writes without re-entering mutators
    /// recursively.
    pub fn without_mutation<R>(&self, operation: impl FnOnce() -> R) -> R {
        let previous = self.inner.bypass_mutators.replace(true);
        let _reset = ResetFlag {
            flag: &self.inner.bypass_mutators,
            previous,
        };
        operation()
    }

    // ------------------------------------------------------------------
    // Equality checks
    // ------------------------------------------------------------------

    /// Register a downcasting `PartialEq` predicate for an instance
    /// category. Affects subsequent diffs of instances with that tag.
    pub fn register_equality_check<T: PartialEq + 'static>(&self, tag: &str) {
        self.inner.registry.borrow_mut().register::<T>(tag);
    }

    /// Register an arbitrary predicate for an instance category.
    ///
    /// The predicate runs inside the diff, with the store's internal state
    /// borrowed: it must not call back into this store (see
    /// [`EqualityFn`](crate::EqualityFn)).
    pub fn register_equality_check_with(
        &self,
        tag: &str,
        check: impl Fn(&dyn Any, &dyn Any) -> bool + 'static,
    ) {
        self.inner.registry.borrow_mut().register_with(tag, check);
    }

    /// Remove the predicate for an instance category. Returns true if one
    /// was registered.
    pub fn unregister_equality_check(&self, tag: &str) -> bool {
        self.inner.registry.borrow_mut().unregister(tag)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// A path-bound accessor for one field, created lazily and cached per
    /// path: repeated requests return the same handle.
    pub fn accessor(&self, path: &str) -> Accessor {
        if let Some(accessor) = self.inner.accessors.borrow().get(path) {
            return accessor.clone();
        }
        let accessor = Accessor::new(Rc::downgrade(&self.inner), path);
        self.inner
            .accessors
            .borrow_mut()
            .insert(Box::from(path), accessor.clone());
        accessor
    }
}

struct ResetFlag<'a> {
    flag: &'a Cell<bool>,
    previous: bool,
}

impl Drop for ResetFlag<'_> {
    fn drop(&mut self) {
        self.flag.set(self.previous);
    }
}
