//! Error types for the evictkit library.
//!
//! ## Key Components
//!
//! - [`EvictError`]: Returned when an eviction cycle cannot bring memory
//!   usage back under the configured budget.
//! - [`ConfigError`]: Returned when eviction configuration parameters are
//!   invalid (e.g. zero sample count, unknown policy name).
//!
//! ## Example Usage
//!
//! ```
//! use evictkit::config::EvictionPolicy;
//! use evictkit::error::ConfigError;
//!
//! // Policy names are validated at parse time.
//! let ok: Result<EvictionPolicy, ConfigError> = "allkeys-lru".parse();
//! assert!(ok.is_ok());
//!
//! let bad: Result<EvictionPolicy, ConfigError> = "allkeys-arc".parse();
//! assert!(bad.is_err());
//! ```

use std::fmt;

// ---------------------------------------------------------------------------
// EvictError
// ---------------------------------------------------------------------------

/// Error returned when an eviction attempt leaves the server over budget.
///
/// Produced by [`EvictionEngine::try_free_memory`](crate::engine::EvictionEngine::try_free_memory).
/// The caller is expected to refuse memory-growing commands and retry on the
/// next write attempt; the engine performs no internal retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictError {
    /// Memory is over budget but the configured policy is `noeviction`.
    PolicyForbids,
    /// Every database is empty of keys eligible under the active policy.
    NoCandidates,
    /// Candidates ran out before the free target was reached and the
    /// lazy-free backstop did not observe the budget being met either.
    InsufficientProgress,
}

impl fmt::Display for EvictError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            EvictError::PolicyForbids => {
                "memory over budget but eviction policy forbids freeing keys"
            }
            EvictError::NoCandidates => "no keys eligible for eviction under the active policy",
            EvictError::InsufficientProgress => {
                "eviction finished without reaching the memory target"
            }
        };
        f.write_str(msg)
    }
}

impl std::error::Error for EvictError {}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error returned when eviction configuration parameters are invalid.
///
/// Produced by [`EvictionConfig::validate`](crate::config::EvictionConfig::validate)
/// and by parsing policy names via `FromStr`. The variants mirror the two
/// ways an eviction configuration can go wrong: a policy name nothing
/// recognizes, or a tunable outside its permitted range.
///
/// # Example
///
/// ```
/// use evictkit::config::EvictionConfig;
///
/// let err = EvictionConfig::default()
///     .maxmemory_samples(0)
///     .validate()
///     .unwrap_err();
/// assert!(err.to_string().contains("maxmemory-samples"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A `maxmemory-policy` value that names no known policy.
    UnknownPolicy(String),
    /// A numeric option outside its permitted range.
    OutOfRange {
        /// Configuration option name, e.g. `maxmemory-samples`.
        option: &'static str,
        /// The violated constraint, e.g. `must be > 0`.
        constraint: &'static str,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::UnknownPolicy(name) => {
                write!(f, "unknown maxmemory-policy '{}'", name)
            }
            ConfigError::OutOfRange { option, constraint } => {
                write!(f, "{} {}", option, constraint)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
