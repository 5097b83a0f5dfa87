//! tagcache core - shared leaf types
//!
//! Pure data types with no store interaction. The other tagcache crates
//! depend on this: the error taxonomy, the call-identity model, and
//! generation-token creation all live here.

pub mod error;
pub mod identity;
pub mod token;

pub use error::{CacheError, CacheResult, KeyError, StoreError};
pub use identity::{Binding, Identity};
pub use token::new_token;
