//! Core types, configuration, and error handling for the Hermes relay.
//!
//! This crate provides the shared foundation used by the other Hermes crates:
//! - [`HermesError`] — unified error type using `thiserror`
//! - [`HermesConfig`] — configuration loaded from `.hermes.toml` and the environment
//! - Webhook payload types: [`WebhookEvent`], [`PullRequestRef`]
//! - Review types: [`ChangedFile`], [`ReviewComment`]

mod config;
mod error;
mod types;

pub use config::{
    AppConfig, HermesConfig, LlmConfig, ReviewConfig, ServerConfig, DEFAULT_FALLBACK_BODY,
};
pub use error::HermesError;
pub use types::{
    ChangedFile, Installation, PullRequest, PullRequestHead, PullRequestRef, Repository,
    RepositoryOwner, ReviewComment, WebhookEvent,
};

/// A convenience `Result` type for Hermes operations.
pub type Result<T> = std::result::Result<T, HermesError>;
