//! The value tree: an arbitrary nested value with reference semantics.
//!
//! [`Value`] is a cheap-to-clone handle; mappings, sequences, opaque
//! instances, and function references share their payload behind `Rc`, so
//! cloning a value never copies data and in-place mutation is visible
//! through every handle. Self-referential graphs are allowed; the diff
//! engine carries a cycle guard for them.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use indexmap::IndexMap;

/// A node of the value tree.
///
/// Clone is cheap: structural variants clone an `Rc` handle, not the data.
#[derive(Clone, Default)]
pub enum Value {
    /// Absent value. Indistinguishable from a missing path when read.
    #[default]
    Undefined,
    /// Explicit null.
    Null,
    /// Boolean primitive.
    Bool(bool),
    /// Numeric primitive.
    Number(f64),
    /// String primitive.
    Str(Rc<str>),
    /// A function reference. Primitive-like for equality purposes; compared
    /// by identity (documented exception, never narrowed to strict
    /// primitives).
    Func(FuncRef),
    /// A keyed mapping.
    Map(MapRef),
    /// An ordered sequence, addressed by numeric path tokens.
    List(ListRef),
    /// An opaque instance, compared through the equality registry.
    Instance(InstanceRef),
}

/// The shape of a value as seen by the diff engine's category comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Shape {
    /// A traversable mapping.
    Map,
    /// A traversable sequence.
    List,
    /// Anything else: primitives, instances, shallow-marked containers.
    Other,
}

impl Value {
    /// Create a new empty mapping.
    pub fn map() -> Self {
        Value::Map(MapRef::new())
    }

    /// Create a new empty sequence.
    pub fn list() -> Self {
        Value::List(ListRef::new())
    }

    /// Create a mapping from key/value pairs.
    pub fn map_from<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let map = MapRef::new();
        for (key, value) in entries {
            map.insert(key.into(), value.into());
        }
        Value::Map(map)
    }

    /// Create a sequence from items.
    pub fn list_from<V: Into<Value>, I: IntoIterator<Item = V>>(items: I) -> Self {
        let list = ListRef::new();
        for item in items {
            list.push(item.into());
        }
        Value::List(list)
    }

    /// Create an opaque instance with an equality-registry category tag.
    pub fn instance(tag: impl Into<String>, payload: impl Any) -> Self {
        Value::Instance(InstanceRef::new(tag, payload))
    }

    /// Create a function reference value.
    pub fn func<T: 'static>(f: T) -> Self {
        Value::Func(FuncRef::new(f))
    }

    /// Attach the shallow marker, making an otherwise-traversable value
    /// opaque to deep diffing and path traversal. Returns the value so it
    /// can be stored directly. Non-container values are returned unchanged.
    pub fn mark_opaque(self) -> Self {
        match &self {
            Value::Map(m) => m.0.shallow.set(true),
            Value::List(l) => l.0.shallow.set(true),
            _ => {}
        }
        self
    }

    /// True if this value is a mapping or sequence without the shallow
    /// marker, i.e. the diff engine and path resolution may walk into it.
    pub fn is_traversable(&self) -> bool {
        match self {
            Value::Map(m) => !m.0.shallow.get(),
            Value::List(l) => !l.0.shallow.get(),
            _ => false,
        }
    }

    /// True for `Undefined`.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// True if both handles point at the same underlying payload.
    ///
    /// Always false for primitives; primitive equality is a value question,
    /// not an identity question.
    pub fn same_ref(&self, other: &Value) -> bool {
        match (self.ref_addr(), other.ref_addr()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// The primitive-like view of this value, if it has one.
    pub fn as_primitive(&self) -> Option<Primitive> {
        match self {
            Value::Undefined => Some(Primitive::Undefined),
            Value::Null => Some(Primitive::Null),
            Value::Bool(b) => Some(Primitive::Bool(*b)),
            Value::Number(n) => Some(Primitive::Number(*n)),
            Value::Str(s) => Some(Primitive::Str(s.clone())),
            Value::Func(f) => Some(Primitive::Func(f.clone())),
            _ => None,
        }
    }

    /// A short label for the value's category, used in errors and `Debug`.
    pub fn type_label(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Func(_) => "function",
            Value::Map(_) => "map",
            Value::List(_) => "list",
            Value::Instance(_) => "instance",
        }
    }

    /// Read a child by key. Returns `Undefined` when the value is not
    /// traversable (including shallow-marked containers) or the key is
    /// absent, so it is always safe to call.
    pub fn get_key(&self, key: &str) -> Value {
        if !self.is_traversable() {
            return Value::Undefined;
        }
        match self {
            Value::Map(m) => m.get(key).unwrap_or_default(),
            Value::List(l) => key
                .parse::<usize>()
                .ok()
                .and_then(|i| l.get(i))
                .unwrap_or_default(),
            _ => Value::Undefined,
        }
    }

    /// Write a child by key. Mappings insert or overwrite; sequences address
    /// numeric keys, padding with `Undefined` past the end. Non-numeric keys
    /// on sequences and keys on non-traversable values are ignored.
    pub fn set_key(&self, key: &str, value: Value) {
        match self {
            Value::Map(m) => {
                m.insert(key.to_owned(), value);
            }
            Value::List(l) => {
                if let Ok(index) = key.parse::<usize>() {
                    l.set(index, value);
                }
            }
            _ => {}
        }
    }

    /// Remove a child by key. Mappings drop the entry; sequences leave an
    /// `Undefined` hole so sibling indices keep their values.
    pub fn remove_key(&self, key: &str) {
        match self {
            Value::Map(m) => {
                m.remove(key);
            }
            Value::List(l) => {
                if let Ok(index) = key.parse::<usize>() {
                    if index < l.len() {
                        l.set(index, Value::Undefined);
                    }
                }
            }
            _ => {}
        }
    }

    /// Existence of a key, as observed by `has`.
    ///
    /// Mappings report raw containment (an entry holding `Undefined` still
    /// exists); sequence slots holding `Undefined` are holes and report
    /// absent. Non-traversable values contain nothing.
    pub fn contains_key(&self, key: &str) -> bool {
        if !self.is_traversable() {
            return false;
        }
        match self {
            Value::Map(m) => m.contains_key(key),
            Value::List(l) => key
                .parse::<usize>()
                .ok()
                .and_then(|i| l.get(i))
                .is_some_and(|v| !v.is_undefined()),
            _ => false,
        }
    }

    /// All keys of a traversable value, in iteration order. Sequences yield
    /// their indices as strings. Empty for anything else.
    pub(crate) fn keys(&self) -> Vec<String> {
        if !self.is_traversable() {
            return Vec::new();
        }
        match self {
            Value::Map(m) => m.keys(),
            Value::List(l) => (0..l.len()).map(|i| i.to_string()).collect(),
            _ => Vec::new(),
        }
    }

    /// Count of entries whose value is not `Undefined`.
    ///
    /// Entries holding `Undefined` are invisible to `get`, so they are
    /// excluded from the diff engine's key-count comparison on both sides.
    pub(crate) fn live_key_count(&self) -> usize {
        match self {
            Value::Map(m) => m.0.entries.borrow().values().filter(|v| !v.is_undefined()).count(),
            Value::List(l) => l.0.items.borrow().iter().filter(|v| !v.is_undefined()).count(),
            _ => 0,
        }
    }

    /// The diff engine's shape category.
    pub(crate) fn shape(&self) -> Shape {
        match self {
            Value::Map(_) if self.is_traversable() => Shape::Map,
            Value::List(_) if self.is_traversable() => Shape::List,
            _ => Shape::Other,
        }
    }

    /// Address of the shared payload for identity checks and the cycle
    /// guard. `None` for primitives.
    pub(crate) fn ref_addr(&self) -> Option<usize> {
        match self {
            Value::Map(m) => Some(Rc::as_ptr(&m.0) as usize),
            Value::List(l) => Some(Rc::as_ptr(&l.0) as usize),
            Value::Instance(i) => Some(Rc::as_ptr(&i.0) as usize),
            Value::Func(f) => Some(f.addr()),
            _ => None,
        }
    }
}

/// Primitive-like equality between two values.
///
/// True only when both sides are primitive-like and equal; any structural
/// side makes this false.
pub(crate) fn prim_eq(a: &Value, b: &Value) -> bool {
    match (a.as_primitive(), b.as_primitive()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// True when a primitive compare value matches the current value at a path.
pub(crate) fn prim_matches(compare: &Primitive, current: &Value) -> bool {
    current.as_primitive().is_some_and(|p| p == *compare)
}

/// Primitive-like values compare by value (numbers by bit pattern, so
/// `NaN == NaN`); reference-valued ones compare by identity, the same
/// notion the diff engine and `equals` use.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        if self.ref_addr().is_some() || other.ref_addr().is_some() {
            return self.same_ref(other);
        }
        prim_eq(self, other)
    }
}

impl Eq for Value {}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Func(func) => write!(f, "func@{:#x}", func.addr()),
            Value::Map(m) => write!(f, "map(len={}, @{:#x})", m.len(), Rc::as_ptr(&m.0) as usize),
            Value::List(l) => {
                write!(f, "list(len={}, @{:#x})", l.len(), Rc::as_ptr(&l.0) as usize)
            }
            Value::Instance(i) => write!(f, "instance({:?})", i.tag()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s.as_str()))
    }
}

impl From<Primitive> for Value {
    fn from(p: Primitive) -> Self {
        match p {
            Primitive::Undefined => Value::Undefined,
            Primitive::Null => Value::Null,
            Primitive::Bool(b) => Value::Bool(b),
            Primitive::Number(n) => Value::Number(n),
            Primitive::Str(s) => Value::Str(s),
            Primitive::Func(f) => Value::Func(f),
        }
    }
}

/// A shared, insertion-ordered mapping payload.
#[derive(Clone, Default)]
pub struct MapRef(Rc<MapInner>);

#[derive(Default)]
struct MapInner {
    entries: RefCell<IndexMap<String, Value>>,
    shallow: Cell<bool>,
}

impl MapRef {
    /// Create a new empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.entries.borrow().len()
    }

    /// True if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.0.entries.borrow().is_empty()
    }

    /// Read an entry.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.entries.borrow().get(key).cloned()
    }

    /// Insert or overwrite an entry, returning the previous value.
    pub fn insert(&self, key: String, value: Value) -> Option<Value> {
        self.0.entries.borrow_mut().insert(key, value)
    }

    /// Remove an entry, preserving the order of the rest.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.0.entries.borrow_mut().shift_remove(key)
    }

    /// Raw containment, regardless of the entry's value.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.entries.borrow().contains_key(key)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.0.entries.borrow().keys().cloned().collect()
    }
}

/// A shared sequence payload.
#[derive(Clone, Default)]
pub struct ListRef(Rc<ListInner>);

#[derive(Default)]
struct ListInner {
    items: RefCell<Vec<Value>>,
    shallow: Cell<bool>,
}

impl ListRef {
    /// Create a new empty sequence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of slots, holes included.
    pub fn len(&self) -> usize {
        self.0.items.borrow().len()
    }

    /// True if there are no slots.
    pub fn is_empty(&self) -> bool {
        self.0.items.borrow().is_empty()
    }

    /// Read a slot.
    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.items.borrow().get(index).cloned()
    }

    /// Write a slot, padding with `Undefined` past the end.
    pub fn set(&self, index: usize, value: Value) {
        let mut items = self.0.items.borrow_mut();
        if index >= items.len() {
            items.resize_with(index + 1, Value::default);
        }
        items[index] = value;
    }

    /// Append a value.
    pub fn push(&self, value: Value) {
        self.0.items.borrow_mut().push(value);
    }
}

/// A type-erased function reference, compared by identity.
#[derive(Clone)]
pub struct FuncRef(Rc<dyn Any>);

impl FuncRef {
    /// Wrap a function (or any callable payload) as a reference value.
    pub fn new<T: 'static>(f: T) -> Self {
        Self(Rc::new(f))
    }

    /// Downcast to the original function type.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl PartialEq for FuncRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for FuncRef {}

impl fmt::Debug for FuncRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "func@{:#x}", self.addr())
    }
}

/// An opaque instance: a category tag plus a type-erased payload.
///
/// Instances are never traversed by path resolution or the diff engine;
/// they are compared through the
/// [`EqualityRegistry`](crate::EqualityRegistry) by their tag, and assumed
/// changed when no predicate is registered.
#[derive(Clone)]
pub struct InstanceRef(Rc<InstanceInner>);

struct InstanceInner {
    tag: Box<str>,
    payload: Box<dyn Any>,
}

impl InstanceRef {
    /// Wrap a payload under an equality-registry category tag.
    pub fn new(tag: impl Into<String>, payload: impl Any) -> Self {
        Self(Rc::new(InstanceInner {
            tag: tag.into().into_boxed_str(),
            payload: Box::new(payload),
        }))
    }

    /// The category tag used for equality dispatch.
    pub fn tag(&self) -> &str {
        &self.0.tag
    }

    /// The payload as `Any`, for predicate dispatch.
    pub fn payload(&self) -> &dyn Any {
        &*self.0.payload
    }

    /// Downcast the payload to its original type.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.payload.downcast_ref()
    }
}

impl fmt::Debug for InstanceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "instance({:?}, @{:#x})", self.tag(), Rc::as_ptr(&self.0) as usize)
    }
}

/// The primitive-like subset of [`Value`] used to key equality
/// subscriptions.
///
/// Numbers compare by bit pattern: `NaN` equals itself and `0.0` differs
/// from `-0.0`, which keeps `Eq` and `Hash` lawful. Function references
/// compare by identity.
#[derive(Clone)]
pub enum Primitive {
    /// Absent value.
    Undefined,
    /// Explicit null.
    Null,
    /// Boolean primitive.
    Bool(bool),
    /// Numeric primitive.
    Number(f64),
    /// String primitive.
    Str(Rc<str>),
    /// Function reference, by identity.
    Func(FuncRef),
}

impl Primitive {
    fn rank(&self) -> u8 {
        match self {
            Primitive::Undefined => 0,
            Primitive::Null => 1,
            Primitive::Bool(_) => 2,
            Primitive::Number(_) => 3,
            Primitive::Str(_) => 4,
            Primitive::Func(_) => 5,
        }
    }
}

impl PartialEq for Primitive {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Primitive::Undefined, Primitive::Undefined) => true,
            (Primitive::Null, Primitive::Null) => true,
            (Primitive::Bool(a), Primitive::Bool(b)) => a == b,
            (Primitive::Number(a), Primitive::Number(b)) => a.to_bits() == b.to_bits(),
            (Primitive::Str(a), Primitive::Str(b)) => a == b,
            (Primitive::Func(a), Primitive::Func(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Primitive {}

impl Hash for Primitive {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Primitive::Undefined | Primitive::Null => {}
            Primitive::Bool(b) => b.hash(state),
            Primitive::Number(n) => n.to_bits().hash(state),
            Primitive::Str(s) => s.hash(state),
            Primitive::Func(f) => f.addr().hash(state),
        }
    }
}

impl PartialOrd for Primitive {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Primitive {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Primitive::Bool(a), Primitive::Bool(b)) => a.cmp(b),
            (Primitive::Number(a), Primitive::Number(b)) => a.total_cmp(b),
            (Primitive::Str(a), Primitive::Str(b)) => a.cmp(b),
            (Primitive::Func(a), Primitive::Func(b)) => a.addr().cmp(&b.addr()),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Debug for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&Value::from(self.clone()), f)
    }
}

impl From<bool> for Primitive {
    fn from(b: bool) -> Self {
        Primitive::Bool(b)
    }
}

impl From<i32> for Primitive {
    fn from(n: i32) -> Self {
        Primitive::Number(n as f64)
    }
}

impl From<f64> for Primitive {
    fn from(n: f64) -> Self {
        Primitive::Number(n)
    }
}

impl From<&str> for Primitive {
    fn from(s: &str) -> Self {
        Primitive::Str(Rc::from(s))
    }
}
