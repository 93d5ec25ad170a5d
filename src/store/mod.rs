//! Durable key/value storage abstraction
//!
//! The cache and the rate-limit counter both layer expiry semantics on top of
//! a flat string-keyed store. The store itself is injected so tests can run
//! against an in-memory fake instead of the filesystem.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Flat string-keyed durable storage with no expiry semantics of its own.
///
/// Keys are expected to be filesystem-safe (lowercase alphanumerics,
/// underscores and hyphens); the cache key builders guarantee this.
pub trait KvStore: Send + Sync {
    /// Returns the stored value for `key`, if any.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key`, overwriting any previous value.
    fn set(&self, key: &str, value: &str) -> std::io::Result<()>;

    /// Removes `key` if present. Missing keys are not an error.
    fn remove(&self, key: &str);

    /// Returns all stored keys starting with `prefix`.
    fn keys_with_prefix(&self, prefix: &str) -> Vec<String>;
}
