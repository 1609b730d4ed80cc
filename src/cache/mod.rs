//! Caching subsystem.
//!
//! Two cooperating stores, both keyed on [`CacheKey`]:
//!
//! - [`store::CacheStore`]: bounded TTL cache of successful responses.
//!   Eviction follows insertion order; lookups never reorder entries.
//!
//! - [`pending::PendingRegistry`]: in-flight requests, so concurrent
//!   identical calls share one underlying operation.

pub mod pending;
pub mod store;

pub use pending::{PendingRegistry, SharedCall};
pub use store::CacheStore;

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identity of a call: its operation name plus its parameters.
///
/// Uses `DefaultHasher` (SipHash with fixed keys), which is deterministic
/// within a process lifetime. Parameters are hashed through their JSON
/// encoding; `serde_json` orders object keys, so `{"a":1,"b":2}` and
/// `{"b":2,"a":1}` produce the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(u64);

impl CacheKey {
    pub fn new(identity: &str, params: Option<&serde_json::Value>) -> Self {
        let mut hasher = DefaultHasher::new();
        identity.hash(&mut hasher);
        match params {
            Some(value) => value.to_string().hash(&mut hasher),
            None => "{}".hash(&mut hasher),
        }
        CacheKey(hasher.finish())
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "api_{}", self.0)
    }
}
