//! AWS S3 backend.
//!
//! Buckets are folders. Each backend is bound to one region: folder listings
//! only include buckets located there, and new buckets are created there.
//! An `http(s)://` endpoint selects an S3-compatible service with path-style
//! addressing instead.

pub mod client;
pub mod provider;

pub use client::S3Client;
pub use provider::{AwsCredentials, AwsStorage};
