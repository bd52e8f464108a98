//! Client code for offshell.
//!
//! This crate provides the HTTP plumbing the worker uses to reach its
//! origin: URL canonicalization, the fetch client, and the `ShellFetcher`
//! seam the lifecycle engine is driven through.

pub mod fetch;

pub use fetch::{FetchClient, FetchConfig, FetchResponse, HeaderMap, ShellFetcher, StatusCode};

pub use fetch::url::{UrlError, canonicalize, resolve_asset};
