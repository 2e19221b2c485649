//! The equality registry: per-category predicates for opaque instances.
//!
//! When the diff engine reaches a value it cannot traverse structurally, it
//! dispatches on the instance's category tag. A registered predicate
//! decides "changed or not"; an unregistered category is conservatively
//! assumed changed. Dispatch is by stable string tag, not by runtime type
//! identity, so unrelated payload types can share a category and tests can
//! build isolated registries.

use std::any::Any;
use std::collections::BTreeSet;
use std::rc::Rc;
use std::time::SystemTime;

use ahash::AHashMap;
use regex::Regex;

use crate::value::{Primitive, Value};

/// Category tag for unordered collections of unique primitive values.
pub const SET_TAG: &str = "set";
/// Category tag for timestamp instants.
pub const INSTANT_TAG: &str = "instant";
/// Category tag for textual pattern matchers.
pub const PATTERN_TAG: &str = "pattern";

/// A binary equality predicate over type-erased instance payloads.
///
/// Returns `true` if the two payloads are equal (the value is unchanged).
/// A payload that fails to downcast must compare unequal.
///
/// Predicates are invoked in the middle of a diff, while the store's
/// internal state is borrowed: they must compare the two payloads and
/// nothing else, never read or write the store.
pub type EqualityFn = Rc<dyn Fn(&dyn Any, &dyn Any) -> bool>;

/// The table from category tag to equality predicate.
///
/// Owned by the store (and shared by its clones); an isolated instance can
/// be built with [`empty`](Self::empty) and handed to
/// [`StoreBuilder::equality`](crate::StoreBuilder::equality).
pub struct EqualityRegistry {
    checks: AHashMap<Box<str>, EqualityFn>,
}

impl Default for EqualityRegistry {
    /// A registry with the three built-in categories: [`SET_TAG`]
    /// (`BTreeSet<Primitive>`), [`INSTANT_TAG`] (`SystemTime`), and
    /// [`PATTERN_TAG`] (`Regex`, compared by source text).
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register::<BTreeSet<Primitive>>(SET_TAG);
        registry.register::<SystemTime>(INSTANT_TAG);
        registry.register_with(PATTERN_TAG, |old, new| {
            match (old.downcast_ref::<Regex>(), new.downcast_ref::<Regex>()) {
                (Some(old), Some(new)) => old.as_str() == new.as_str(),
                _ => false,
            }
        });
        registry
    }
}

impl EqualityRegistry {
    /// A registry with no predicates at all: every opaque instance is
    /// assumed changed.
    pub fn empty() -> Self {
        Self {
            checks: AHashMap::new(),
        }
    }

    /// Register a predicate that downcasts both payloads to `T` and
    /// compares them with `PartialEq`. Payloads of any other type compare
    /// unequal. Replaces any previous predicate for the tag.
    pub fn register<T: PartialEq + 'static>(&mut self, tag: &str) {
        self.register_with(tag, |old, new| {
            match (old.downcast_ref::<T>(), new.downcast_ref::<T>()) {
                (Some(old), Some(new)) => old == new,
                _ => false,
            }
        });
    }

    /// Register an arbitrary predicate for a tag. See [`EqualityFn`] for
    /// the constraints a predicate must observe.
    pub fn register_with(&mut self, tag: &str, check: impl Fn(&dyn Any, &dyn Any) -> bool + 'static) {
        self.checks.insert(Box::from(tag), Rc::new(check));
    }

    /// Remove the predicate for a tag. Returns true if one was registered.
    pub fn unregister(&mut self, tag: &str) -> bool {
        self.checks.remove(tag).is_some()
    }

    /// Compare two payloads under a tag. `None` means no predicate is
    /// registered and the caller should assume changed.
    pub(crate) fn compare(&self, tag: &str, old: &dyn Any, new: &dyn Any) -> Option<bool> {
        self.checks.get(tag).map(|check| check(old, new))
    }
}

impl Value {
    /// An opaque timestamp instant, compared by the built-in
    /// [`INSTANT_TAG`] predicate.
    pub fn instant(at: SystemTime) -> Self {
        Value::instance(INSTANT_TAG, at)
    }

    /// An opaque unordered collection of unique primitive values, compared
    /// by the built-in [`SET_TAG`] predicate.
    pub fn primitive_set(set: BTreeSet<Primitive>) -> Self {
        Value::instance(SET_TAG, set)
    }

    /// An opaque textual pattern matcher, compared by source text under the
    /// built-in [`PATTERN_TAG`] predicate.
    pub fn pattern(pattern: Regex) -> Self {
        Value::instance(PATTERN_TAG, pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_instant() {
        let registry = EqualityRegistry::default();
        let now = SystemTime::now();
        assert_eq!(registry.compare(INSTANT_TAG, &now, &now.clone()), Some(true));
        let later = now + std::time::Duration::from_secs(1);
        assert_eq!(registry.compare(INSTANT_TAG, &now, &later), Some(false));
    }

    #[test]
    fn test_builtin_set() {
        let registry = EqualityRegistry::default();
        let a: BTreeSet<Primitive> = [Primitive::from(1), Primitive::from("x")].into();
        let b: BTreeSet<Primitive> = [Primitive::from("x"), Primitive::from(1)].into();
        assert_eq!(registry.compare(SET_TAG, &a, &b), Some(true));
    }

    #[test]
    fn test_builtin_pattern() {
        let registry = EqualityRegistry::default();
        let a = Regex::new("a+").unwrap();
        let b = Regex::new("a+").unwrap();
        let c = Regex::new("b+").unwrap();
        assert_eq!(registry.compare(PATTERN_TAG, &a, &b), Some(true));
        assert_eq!(registry.compare(PATTERN_TAG, &a, &c), Some(false));
    }

    #[test]
    fn test_unknown_tag() {
        let registry = EqualityRegistry::empty();
        assert_eq!(registry.compare("blob", &1u8, &1u8), None);
    }

    #[test]
    fn test_mismatched_payload_types() {
        let registry = EqualityRegistry::default();
        assert_eq!(registry.compare(INSTANT_TAG, &1u8, &SystemTime::now()), Some(false));
    }

    #[test]
    fn test_unregister() {
        let mut registry = EqualityRegistry::default();
        assert!(registry.unregister(INSTANT_TAG));
        assert!(!registry.unregister(INSTANT_TAG));
        let now = SystemTime::now();
        assert_eq!(registry.compare(INSTANT_TAG, &now, &now.clone()), None);
    }
}
