//! Notification behavior: which subscriptions fire, how often, and when
//! they stay silent. Uses [`TrackingScope`] as the ambient context and a
//! counting subscriber as the observer.

use pathwatch::{ObserverContext, Store, Subscriber, TrackingScope, Value};
use std::cell::Cell;
use std::rc::Rc;

// ============================================================================
// Harness
// ============================================================================

#[derive(Default)]
struct Recorder {
    hits: Cell<u32>,
}

impl Recorder {
    fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    fn hits(&self) -> u32 {
        self.hits.get()
    }
}

impl Subscriber for Recorder {
    fn invalidate(&self) {
        self.hits.set(self.hits.get() + 1);
    }
}

fn tracked(initial: Value) -> (Store, Rc<TrackingScope>) {
    let scope = Rc::new(TrackingScope::new());
    let store = Store::builder()
        .initial(initial)
        .context(scope.clone())
        .build();
    (store, scope)
}

// ============================================================================
// Path precision
// ============================================================================

#[test]
fn test_only_touched_paths_fire() {
    let (store, scope) = tracked(Value::map_from([("c", 0)]));
    store.assign("a.b", 1);

    let rec_ab = Recorder::new();
    let rec_a = Recorder::new();
    let rec_c = Recorder::new();
    scope.observe(rec_ab.clone(), || store.get("a.b"));
    scope.observe(rec_a.clone(), || store.get("a"));
    scope.observe(rec_c.clone(), || store.get("c"));

    store.assign("a.b", 2);
    // The changed path and its ancestor container fire; the sibling does not.
    assert_eq!(rec_ab.hits(), 1);
    assert_eq!(rec_a.hits(), 1);
    assert_eq!(rec_c.hits(), 0);
}

#[test]
fn test_noop_write_is_silent() {
    let (store, scope) = tracked(Value::map_from([("k", "v")]));
    let rec = Recorder::new();
    let rec_root = Recorder::new();
    scope.observe(rec.clone(), || store.get("k"));
    scope.observe(rec_root.clone(), || store.get_root());

    store.assign("k", "v");
    assert_eq!(rec.hits(), 0);
    assert_eq!(rec_root.hits(), 0);
}

#[test]
fn test_delete_fires_path_and_ancestors() {
    let (store, scope) = tracked(Value::map());
    store.assign("a.b", 1);
    store.assign("a.c", 2);

    let rec_ab = Recorder::new();
    let rec_ac = Recorder::new();
    let rec_a = Recorder::new();
    scope.observe(rec_ab.clone(), || store.get("a.b"));
    scope.observe(rec_ac.clone(), || store.get("a.c"));
    scope.observe(rec_a.clone(), || store.get("a"));

    store.delete("a.b");
    assert_eq!(rec_ab.hits(), 1);
    assert_eq!(rec_a.hits(), 1);
    assert_eq!(rec_ac.hits(), 0);
}

#[test]
fn test_root_replacement_fires_root_observer() {
    let (store, scope) = tracked(Value::map());
    let rec = Recorder::new();
    scope.observe(rec.clone(), || store.get_root());
    store.set(Value::Null);
    assert_eq!(rec.hits(), 1);
}

#[test]
fn test_observer_of_replaced_subtree() {
    let (store, scope) = tracked(Value::map());
    store.assign("user.name", "ada");
    let rec_name = Recorder::new();
    scope.observe(rec_name.clone(), || store.get("user.name"));

    // Replacing the whole container reaches the observed leaf through the
    // structural diff.
    store.assign("user", Value::map_from([("name", "grace")]));
    assert_eq!(rec_name.hits(), 1);

    // Replacing with an equal-valued container is silent for the leaf.
    store.assign("user", Value::map_from([("name", "grace")]));
    assert_eq!(rec_name.hits(), 1);
}

// ============================================================================
// Batching
// ============================================================================

#[test]
fn test_multi_path_write_fires_once() {
    let (store, scope) = tracked(Value::map());
    let rec = Recorder::new();
    scope.observe(rec.clone(), || {
        store.get("x");
        store.get("y");
    });

    store.assign_many([("x", 1), ("y", 2)]);
    assert_eq!(rec.hits(), 1);
}

struct Reactor {
    store: Store,
    hits: Cell<u32>,
}

impl Subscriber for Reactor {
    fn invalidate(&self) {
        self.hits.set(self.hits.get() + 1);
        // Write back into the store from inside the flush.
        self.store.assign("log", "observed");
    }
}

#[test]
fn test_observer_write_joins_flush() {
    let (store, scope) = tracked(Value::map());
    let reactor = Rc::new(Reactor {
        store: store.clone(),
        hits: Cell::new(0),
    });
    let rec_log = Recorder::new();
    scope.observe(reactor.clone(), || store.get("x"));
    scope.observe(rec_log.clone(), || store.get("log"));

    store.assign("x", 1);
    // The reactor's write was delivered before the outer write returned.
    assert_eq!(reactor.hits.get(), 1);
    assert_eq!(rec_log.hits(), 1);
    assert_eq!(store.get("log"), Value::from("observed"));
}

// ============================================================================
// Conservative verdicts
// ============================================================================

#[test]
fn test_same_reference_write_is_conservatively_a_change() {
    let (store, scope) = tracked(Value::map());
    let child = Value::map();
    store.assign("c", child.clone());

    let rec = Recorder::new();
    scope.observe(rec.clone(), || store.get("c"));

    // In-place mutation is invisible to the diff, so rewriting the same
    // handle must notify.
    store.assign("c", child.clone());
    assert_eq!(rec.hits(), 1);
}

#[test]
fn test_same_reference_keeps_primitive_children_silent() {
    let (store, scope) = tracked(Value::map());
    let child = Value::map_from([("x", 1)]);
    store.assign("c", child.clone());

    let rec_c = Recorder::new();
    let rec_cx = Recorder::new();
    scope.observe(rec_c.clone(), || store.get("c"));
    scope.observe(rec_cx.clone(), || store.get("c.x"));

    store.assign("c", child.clone());
    assert_eq!(rec_c.hits(), 1);
    // A primitive child is still decidable and did not change.
    assert_eq!(rec_cx.hits(), 0);
}

#[test]
fn test_cyclic_values_terminate() {
    let a = Value::map();
    let b = Value::map();
    a.set_key("peer", b.clone());
    b.set_key("peer", a.clone());

    let (store, scope) = tracked(a);
    let rec = Recorder::new();
    scope.observe(rec.clone(), || store.get("peer"));

    store.set(b);
    assert_eq!(rec.hits(), 1);
}

// ============================================================================
// Equality subscriptions
// ============================================================================

#[test]
fn test_equality_verdict_flip_fires_both_sides() {
    let (store, scope) = tracked(Value::map_from([("state", "idle")]));
    let rec_idle = Recorder::new();
    let rec_busy = Recorder::new();
    let rec_never = Recorder::new();
    assert_eq!(
        scope.observe(rec_idle.clone(), || store.equals("state", &"idle".into())),
        Ok(true)
    );
    assert_eq!(
        scope.observe(rec_busy.clone(), || store.equals("state", &"busy".into())),
        Ok(false)
    );
    assert_eq!(
        scope.observe(rec_never.clone(), || store.equals("state", &"never".into())),
        Ok(false)
    );

    store.assign("state", "busy");
    assert_eq!(rec_idle.hits(), 1);
    assert_eq!(rec_busy.hits(), 1);

    store.assign("state", "done");
    // Only the side whose verdict flipped fires again.
    assert_eq!(rec_idle.hits(), 1);
    assert_eq!(rec_busy.hits(), 2);
    assert_eq!(rec_never.hits(), 0);
}

#[test]
fn test_equality_subscription_ignores_non_flip_changes() {
    let (store, scope) = tracked(Value::map_from([("n", 1)]));
    let rec = Recorder::new();
    assert_eq!(
        scope.observe(rec.clone(), || store.equals("n", &Value::from(10))),
        Ok(false)
    );

    store.assign("n", 2);
    store.assign("n", 3);
    assert_eq!(rec.hits(), 0);

    store.assign("n", 10);
    assert_eq!(rec.hits(), 1);
}

// ============================================================================
// Existence subscriptions
// ============================================================================

#[test]
fn test_existence_fires_on_flip_only() {
    let (store, scope) = tracked(Value::map());
    let rec = Recorder::new();
    assert!(!scope.observe(rec.clone(), || store.has("m.k")));

    store.assign("m.k", 1);
    assert_eq!(rec.hits(), 1);

    // Value changes without an existence flip stay silent.
    store.assign("m.k", 2);
    assert_eq!(rec.hits(), 1);

    store.delete("m.k");
    assert_eq!(rec.hits(), 2);
}

// ============================================================================
// Opaque values
// ============================================================================

#[test]
fn test_equal_instants_are_silent() {
    use std::time::{Duration, SystemTime};

    let at = SystemTime::now();
    let (store, scope) = tracked(Value::map());
    store.assign("t", Value::instant(at));

    let rec = Recorder::new();
    scope.observe(rec.clone(), || store.get("t"));

    // A new allocation with an equal payload is not a change.
    store.assign("t", Value::instant(at));
    assert_eq!(rec.hits(), 0);

    store.assign("t", Value::instant(at + Duration::from_secs(1)));
    assert_eq!(rec.hits(), 1);
}

#[test]
fn test_unregistered_category_is_conservatively_a_change() {
    let (store, scope) = tracked(Value::map());
    store.assign("blob", Value::instance("blob", 1u8));

    let rec = Recorder::new();
    scope.observe(rec.clone(), || store.get("blob"));

    store.assign("blob", Value::instance("blob", 1u8));
    assert_eq!(rec.hits(), 1);
}

#[test]
fn test_registered_category_decides() {
    let (store, scope) = tracked(Value::map());
    store.register_equality_check::<u8>("blob");
    store.assign("blob", Value::instance("blob", 1u8));

    let rec = Recorder::new();
    scope.observe(rec.clone(), || store.get("blob"));

    store.assign("blob", Value::instance("blob", 1u8));
    assert_eq!(rec.hits(), 0);

    store.assign("blob", Value::instance("blob", 2u8));
    assert_eq!(rec.hits(), 1);
}

// ============================================================================
// Context plumbing
// ============================================================================

#[test]
fn test_reads_outside_observe_do_not_subscribe() {
    let (store, scope) = tracked(Value::map_from([("k", 1)]));
    assert!(scope.active().is_none());
    store.get("k");
    let rec = Recorder::new();
    scope.observe(rec.clone(), || store.get("k"));

    store.assign("k", 2);
    assert_eq!(rec.hits(), 1);
}
