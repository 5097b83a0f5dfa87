//! Error types for tagcache operations
//!
//! Three layers, kept distinct so callers can tell them apart:
//!
//! - [`KeyError`] - the caller misused a key strategy or template. These
//!   fail fast at the call site and are never coerced into misses.
//! - [`StoreError`] - the backing store failed (connectivity, codec).
//!   A cache miss is *not* an error; a store failure never surfaces as
//!   one, otherwise an outage would silently disable caching.
//! - [`CacheError`] - the top-level error the memoizers return.

use thiserror::Error;

/// Key generation and template errors (caller misuse).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("positional key strategy does not accept named arguments")]
    NamedArgsNotSupported,

    #[error("keyword key strategy does not accept positional arguments")]
    PositionalArgsNotSupported,

    #[error("key template references missing argument: {{{placeholder}}}")]
    MissingTemplateArg { placeholder: String },

    #[error("malformed key template: {reason}")]
    MalformedTemplate { reason: String },
}

/// Backing store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store connection failed: {reason}")]
    Connection { reason: String },

    #[error("value serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("value deserialization failed: {reason}")]
    Deserialization { reason: String },

    #[error("store lock poisoned")]
    LockPoisoned,
}

/// Top-level error for memoizer operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("wrapped computation failed: {reason}")]
    Compute { reason: String },
}

/// Result alias used across the tagcache crates.
pub type CacheResult<T> = Result<T, CacheError>;
