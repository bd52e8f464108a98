//! SQLite-backed store for versioned cache instances.
//!
//! This module provides the persistent request/response store behind the
//! offline worker, using SQLite with async access via tokio-rusqlite.
//! It supports:
//!
//! - Named, version-tagged cache instances created lazily on first open
//! - Request-identity keys hashed over method and canonical URL
//! - Automatic schema migrations
//! - WAL mode for concurrent access
//! - Instance enumeration and deletion for activation-time pruning

pub mod connection;
pub mod hash;
pub mod instance;
pub mod migrations;

pub use crate::Error;

pub use connection::CacheDb;
pub use instance::{CacheInstance, StoredResponse};
