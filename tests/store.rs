//! Read/write behavior of the store facade: path reads, deep creation,
//! deletion, clearing, sequences, and opaque values. No observers here;
//! notification behavior is covered in `observe.rs`.

use pathwatch::{Store, StoreError, Value};
use std::time::SystemTime;

// ============================================================================
// Reads and writes
// ============================================================================

#[test]
fn test_read_after_write() {
    let store = Store::new(Value::map());
    store.assign("a.b", 1);
    assert_eq!(store.get("a.b"), Value::from(1));
    assert!(store.has("a.b"));
    assert!(store.get("a").is_traversable());
}

#[test]
fn test_absent_paths_are_safe() {
    let store = Store::new(Value::Undefined);
    assert!(store.get("x.y.z").is_undefined());
    assert!(!store.has("x"));
    store.delete("x.y");
    assert!(store.get_root().is_undefined());
}

#[test]
fn test_deep_write_creates_intermediates() {
    let store = Store::new(Value::map());
    store.assign("a.b.c", "deep");
    assert_eq!(store.get("a.b.c"), Value::from("deep"));
    assert!(store.has("a"));
    assert!(store.has("a.b"));
    assert!(store.get("a.b").is_traversable());
}

#[test]
fn test_write_coerces_primitive_root() {
    let store = Store::new(5);
    store.assign("k", 1);
    assert!(store.get_root().is_traversable());
    assert_eq!(store.get("k"), Value::from(1));
}

#[test]
fn test_numeric_token_creates_mapping_not_sequence() {
    let store = Store::new(Value::map());
    store.assign("rows.0", "first");
    assert!(matches!(store.get("rows"), Value::Map(_)));
    assert_eq!(store.get("rows.0"), Value::from("first"));
}

#[test]
fn test_set_replaces_root() {
    let store = Store::new(Value::map_from([("a", 1)]));
    store.set(7);
    assert_eq!(store.get_root(), Value::from(7));
    assert!(store.get("a").is_undefined());
}

#[test]
fn test_overwrite_structural_with_primitive() {
    let store = Store::new(Value::map());
    store.assign("a.b", 1);
    store.assign("a", "flat");
    assert_eq!(store.get("a"), Value::from("flat"));
    assert!(store.get("a.b").is_undefined());
    assert!(!store.has("a.b"));
}

// ============================================================================
// Existence vs. value
// ============================================================================

#[test]
fn test_explicit_undefined_entry_exists() {
    let store = Store::new(Value::map());
    store.assign("m.k", Value::Undefined);
    assert!(store.get("m.k").is_undefined());
    assert!(store.has("m.k"));
    assert!(!store.has("m.other"));
}

// ============================================================================
// Deletion
// ============================================================================

#[test]
fn test_delete_removes_entry() {
    let store = Store::new(Value::map());
    store.assign("a.b", 1);
    store.delete("a.b");
    assert!(!store.has("a.b"));
    assert!(store.get("a.b").is_undefined());
    assert!(store.get("a").is_traversable());
}

#[test]
fn test_delete_missing_is_noop() {
    let store = Store::new(Value::map_from([("a", 1)]));
    store.delete("a.b.c");
    store.delete("ghost");
    assert_eq!(store.get("a"), Value::from(1));
}

#[test]
fn test_delete_many() {
    let store = Store::new(Value::map_from([("a", 1), ("b", 2), ("c", 3)]));
    store.delete_many(["a", "c"]);
    assert!(!store.has("a"));
    assert!(store.has("b"));
    assert!(!store.has("c"));
}

// ============================================================================
// Clearing
// ============================================================================

#[test]
fn test_clear_mapping_root() {
    let store = Store::new(Value::map_from([("a", 1)]));
    store.clear();
    assert!(matches!(store.get_root(), Value::Map(_)));
    assert!(!store.has("a"));
}

#[test]
fn test_clear_sequence_root() {
    let store = Store::new(Value::list_from([1, 2]));
    store.clear();
    assert!(matches!(store.get_root(), Value::List(_)));
    assert!(!store.has("0"));
}

#[test]
fn test_clear_primitive_root() {
    let store = Store::new("scalar");
    store.clear();
    assert!(store.get_root().is_undefined());
}

// ============================================================================
// Sequences
// ============================================================================

#[test]
fn test_sequence_indexing() {
    let store = Store::new(Value::list_from([10, 20, 30]));
    assert_eq!(store.get("1"), Value::from(20));
    store.assign("1", 99);
    assert_eq!(store.get("1"), Value::from(99));
}

#[test]
fn test_sequence_write_past_end_pads_with_holes() {
    let store = Store::new(Value::list_from([10]));
    store.assign("3", 99);
    assert_eq!(store.get("3"), Value::from(99));
    assert!(store.has("3"));
    // The padding slots are holes: unreadable and nonexistent.
    assert!(store.get("1").is_undefined());
    assert!(store.get("2").is_undefined());
    assert!(!store.has("1"));
    assert!(!store.has("2"));
}

#[test]
fn test_sequence_delete_leaves_hole() {
    let store = Store::new(Value::list_from([10, 20, 30]));
    store.delete("1");
    assert!(!store.has("1"));
    assert!(store.get("1").is_undefined());
    // Siblings keep their positions.
    assert_eq!(store.get("2"), Value::from(30));
}

// ============================================================================
// Opaque values
// ============================================================================

#[test]
fn test_shallow_marker_blocks_path_reads() {
    let child = Value::map_from([("x", 1)]).mark_opaque();
    let store = Store::new(Value::map_from([("child", child.clone())]));
    assert!(store.get("child.x").is_undefined());
    assert!(!store.has("child.x"));
    // The container itself is still readable, by the same handle.
    assert!(store.get("child").same_ref(&child));
}

#[test]
fn test_instance_round_trip() {
    let at = SystemTime::now();
    let store = Store::new(Value::map());
    store.assign("t", Value::instant(at));
    let Value::Instance(instance) = store.get("t") else {
        panic!("expected an instance");
    };
    assert_eq!(instance.downcast_ref::<SystemTime>(), Some(&at));
}

// ============================================================================
// Equality checks
// ============================================================================

#[test]
fn test_equals_primitive() {
    let store = Store::new(Value::map_from([("state", "idle")]));
    assert_eq!(store.equals("state", &"idle".into()), Ok(true));
    assert_eq!(store.equals("state", &"busy".into()), Ok(false));
    assert_eq!(store.equals("missing", &Value::Undefined), Ok(true));
}

#[test]
fn test_equals_rejects_structural_compare() {
    let store = Store::new(Value::map());
    let err = store.equals("a", &Value::map()).unwrap_err();
    assert!(matches!(err, StoreError::StructuralCompare { category: "map", .. }));
    assert!(store.equals_root(&Value::list()).is_err());
}

#[test]
fn test_equals_root() {
    let store = Store::new("token");
    assert_eq!(store.equals_root(&"token".into()), Ok(true));
    store.set("other");
    assert_eq!(store.equals_root(&"token".into()), Ok(false));
}
