//! Well-known handler priorities.
//!
//! Lower values run first.

/// Runs before every other handler. Reserved for dependency resolution on
/// `OnStart`: declared dependencies must be started before any other start
/// logic runs.
pub const FIRST: i64 = i64::MIN + 1;

/// Priority used when the caller has no ordering requirement.
pub const DEFAULT: i64 = 0;

/// Runs after every other handler (network replication, lifecycle bridging).
pub const LAST: i64 = i64::MAX;
