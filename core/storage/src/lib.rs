//! Vendor-neutral object storage for PolyCloud.
//!
//! This crate provides one storage contract over AWS S3, Azure Blob Storage
//! and Google Cloud Storage, plus the account model that picks and builds the
//! right backend from declarative parameters.
//!
//! # Design Principles
//! - Platform isolation: vendor SDK types and errors stay inside each backend
//! - Async operations: all I/O is async; one operation in flight per client
//! - Single-page listings: at most 1,000 folders or files per listing
//! - Unified error semantics: consistent error categories across platforms

pub mod account;
pub mod aws;
pub mod azure;
pub mod entity;
pub mod gcp;
pub mod local;
pub mod memory;
pub mod provider;
pub mod storage;

#[cfg(test)]
mod live_tests;

pub use account::{AccountConfig, StorageAccount};
pub use aws::{AwsCredentials, AwsStorage};
pub use azure::{AzureCredentials, AzureStorage};
pub use entity::{CloudFile, CloudFolder, PlatformHandle, SINGLE_PAGE_LIMIT};
pub use gcp::{GcpCredentials, GcpStorage};
pub use memory::{MemoryClient, MemoryOp};
pub use provider::{BucketEntry, ObjectClient, ObjectEntry, StorageBackend};
pub use storage::{Backend, Storage};
