//! # UserDir Shared Library
//!
//! Domain types, persistence, and the user directory service shared by the
//! UserDir API server and its tests.
//!
//! ## Module Organization
//!
//! - `models`: Users, sites, and site memberships
//! - `store`: Transactional persistence (Postgres and in-memory)
//! - `directory`: The `UserDirectory` service and its collaborators
//! - `cache`: Query result caching (in-memory and Redis)
//! - `context`: Per-request context (host, principal, current time)
//! - `paging`: Paged query results
//! - `auth`: Principal tokens
//! - `db`: Connection pool and migrations

pub mod auth;
pub mod cache;
pub mod context;
pub mod db;
pub mod directory;
pub mod models;
pub mod paging;
pub mod store;

/// Current version of the UserDir shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
