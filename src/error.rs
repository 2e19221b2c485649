//! Error types for store operations.

/// Errors raised by store operations.
///
/// Missing paths are never errors: reads of absent paths return
/// [`Value::Undefined`](crate::Value::Undefined), deletes of absent paths are
/// no-ops, and equality checks against absent paths return `false`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// `equals` was called with a structural compare value.
    ///
    /// Equality subscriptions key on the compared value, so that value must
    /// be primitive-like (null, undefined, booleans, numbers, strings, or
    /// function references). Mappings, sequences, and opaque instances are
    /// rejected; compare those by observing the path with `get` instead.
    #[error("cannot compare against a structural value ({category}) at `{path}`")]
    StructuralCompare {
        /// The path the comparison targeted.
        path: String,
        /// The category of the rejected compare value.
        category: &'static str,
    },
}
