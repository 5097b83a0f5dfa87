//! tagcache store layer
//!
//! The backing store is a collaborator, not part of the caching core: any
//! key-value store that can get, set-with-TTL, delete, multi-get and
//! multi-set conforms by implementing [`Store`]. Values cross the boundary
//! as `serde_json::Value`, so a present-but-null entry (a cached "no
//! result") stays distinguishable from a miss.
//!
//! [`MemoryStore`] is the in-tree backend: a TTL-aware map suitable for
//! tests and single-process deployments. Networked stores (Redis and the
//! like) live outside this workspace and implement the same trait.

pub mod memory;
pub mod traits;

pub use memory::MemoryStore;
pub use traits::{negative_ttl, Store, StoreResult};
