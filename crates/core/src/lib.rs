//! Core types and shared functionality for offshell.
//!
//! This crate provides:
//! - Versioned cache instances with a SQLite backend
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheDb, CacheInstance, StoredResponse};
pub use config::AppConfig;
pub use error::Error;
