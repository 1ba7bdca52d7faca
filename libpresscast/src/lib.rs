//! Presscast - bridge blog publishing to the X platform
//!
//! This library provides the core functionality for automatically
//! cross-posting published blog posts: image constraint checking and
//! optimization, the OAuth2 token lifecycle, the REST publish client, and
//! the orchestrating workflow with its publish log and retry handling.

pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod media;
pub mod types;
pub mod workflow;

// Re-export commonly used types
pub use auth::{CredentialStore, Credentials, FileCredentialStore, TokenStore};
pub use client::{ApiEndpoints, XApiClient};
pub use config::Config;
pub use db::Database;
pub use error::{PresscastError, Result};
pub use types::{LogRecord, PostEvent, PublishResult, PublishStatus};
pub use workflow::{PublishWorkflow, TokioRetryScheduler};
