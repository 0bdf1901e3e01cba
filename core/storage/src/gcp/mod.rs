//! Google Cloud Storage backend.
//!
//! This module talks to the Cloud Storage JSON API with:
//! - Service-account authentication (JWT bearer grant) with automatic token refresh
//! - Single-page bucket and object listings
//! - Media uploads and downloads

pub mod auth;
pub mod client;
pub mod provider;

pub use auth::{AccessToken, ServiceAccountKey, TokenManager};
pub use client::GcsClient;
pub use provider::{GcpCredentials, GcpStorage};
