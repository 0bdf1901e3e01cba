//! Azure Blob Storage backend.

pub mod client;
pub mod provider;

pub use client::AzureBlobClient;
pub use provider::{AzureCredentials, AzureStorage};
