//! Common utilities and types shared across PolyCloud crates.
//!
//! This crate holds the error taxonomy every storage backend reports through,
//! the closed set of supported platforms and the connection-string grammar
//! used to persist account credentials.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{ConnectionString, Platform, SecretString};
