//! Error types for the sievekit library.
//!
//! ## Key Components
//!
//! - [`ConfigError`]: Returned when cache construction parameters are
//!   invalid (the only such parameter is a zero capacity).
//! - [`InvariantError`]: Returned when internal data-structure invariants
//!   are violated (debug-only `check_invariants` methods).
//!
//! ## Example Usage
//!
//! ```
//! use sievekit::error::ConfigError;
//! use sievekit::policy::sieve::SieveCache;
//!
//! // Fallible constructor for user-supplied capacities
//! let cache: Result<SieveCache<String, i32>, ConfigError> = SieveCache::try_new(100);
//! assert!(cache.is_ok());
//!
//! // Zero capacity is caught without panicking
//! let bad = SieveCache::<String, i32>::try_new(0);
//! assert!(bad.is_err());
//! ```

use std::fmt;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error returned when cache construction parameters are invalid.
///
/// Produced by the fallible `try_new` constructors on
/// [`SieveCache`](crate::policy::sieve::SieveCache) and
/// [`S3FifoCache`](crate::policy::s3_fifo::S3FifoCache). Carries a
/// human-readable description of which parameter failed validation.
///
/// # Example
///
/// ```
/// use sievekit::policy::s3_fifo::S3FifoCache;
///
/// let err = S3FifoCache::<u64, u64>::try_new(0).unwrap_err();
/// assert!(err.to_string().contains("capacity"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(String);

impl ConfigError {
    /// Creates a new `ConfigError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// InvariantError
// ---------------------------------------------------------------------------

/// Error returned when internal cache invariants are violated.
///
/// Produced by the debug-only `check_invariants` methods on the cache
/// engines. Carries a description of which invariant failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantError(String);

impl InvariantError {
    /// Creates a new `InvariantError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InvariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for InvariantError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
