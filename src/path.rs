//! Path resolution: dot-separated path strings canonicalized into token
//! sequences, resolved once and cached.

use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;

/// A canonicalized path: the shared token sequence for one path string.
pub(crate) type Tokens = Rc<[Box<str>]>;

/// Per-store cache of resolved paths.
///
/// Resolution is purely lexical: the path is split on `.` and each segment
/// becomes one key token. Tokens are shared, so resolving the same path
/// twice returns the same allocation.
#[derive(Default)]
pub(crate) struct PathCache {
    cache: RefCell<AHashMap<Box<str>, Tokens>>,
}

impl PathCache {
    pub fn resolve(&self, path: &str) -> Tokens {
        if let Some(tokens) = self.cache.borrow().get(path) {
            return tokens.clone();
        }
        let tokens: Tokens = path.split('.').map(Box::from).collect();
        self.cache
            .borrow_mut()
            .insert(Box::from(path), tokens.clone());
        tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_tokens() {
        let cache = PathCache::default();
        let tokens = cache.resolve("a.b.c");
        assert_eq!(tokens.len(), 3);
        assert_eq!(&*tokens[0], "a");
        assert_eq!(&*tokens[2], "c");
    }

    #[test]
    fn test_resolve_is_cached() {
        let cache = PathCache::default();
        let first = cache.resolve("x.y");
        let second = cache.resolve("x.y");
        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_single_segment() {
        let cache = PathCache::default();
        let tokens = cache.resolve("root");
        assert_eq!(tokens.len(), 1);
    }
}
