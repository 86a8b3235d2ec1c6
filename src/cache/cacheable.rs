//! Memoization Combinator
//!
//! `Cacheable` pairs a computation with a key function so repeated calls with
//! equivalent arguments are served from a `Cache`.

use std::fmt;
use std::sync::Arc;

use crate::cache::{Cache, SetOptions};

/// A computation whose results are cached under keys derived from its
/// arguments.
///
/// # Example
/// ```
/// use tiercache::{Cache, Cacheable, Config, SetOptions};
///
/// let cache: Cache<u64> = Cache::new(Config::default()).unwrap();
/// let square = Cacheable::new(cache, |n: &u64| format!("square:{n}"), |n: &u64| n * n)
///     .with_options(SetOptions::new().tag("squares"));
///
/// assert_eq!(*square.call(&12), 144);
/// assert_eq!(*square.call(&12), 144);
/// ```
pub struct Cacheable<V, F, K> {
    cache: Cache<V>,
    compute: F,
    key_fn: K,
    options: SetOptions,
}

impl<V, F, K> Cacheable<V, F, K>
where
    V: Send + Sync + 'static,
{
    pub fn new(cache: Cache<V>, key_fn: K, compute: F) -> Self {
        Self {
            cache,
            compute,
            key_fn,
            options: SetOptions::default(),
        }
    }

    /// Options applied to every stored result.
    pub fn with_options(mut self, options: SetOptions) -> Self {
        self.options = options;
        self
    }

    pub fn cache(&self) -> &Cache<V> {
        &self.cache
    }

    // == Call ==
    /// Returns the cached result for `args`, computing and storing it on a
    /// miss.
    pub fn call<A: ?Sized>(&self, args: &A) -> Arc<V>
    where
        K: Fn(&A) -> String,
        F: Fn(&A) -> V,
    {
        let key = (self.key_fn)(args);
        self.cache
            .get_or_insert_with(&key, self.options.clone(), || (self.compute)(args))
    }

    /// Like `call` for a fallible computation. Errors are passed through and
    /// never cached.
    pub fn try_call<A: ?Sized, E>(&self, args: &A) -> Result<Arc<V>, E>
    where
        K: Fn(&A) -> String,
        F: Fn(&A) -> Result<V, E>,
    {
        let key = (self.key_fn)(args);
        self.cache
            .try_get_or_insert_with(&key, self.options.clone(), || (self.compute)(args))
    }
}

impl<V, F, K> fmt::Debug for Cacheable<V, F, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cacheable")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
