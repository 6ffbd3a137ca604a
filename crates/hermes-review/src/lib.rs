//! Pull request review orchestration for the Hermes relay.
//!
//! Provides the LLM client, the GitHub client, prompt construction, and the
//! pipeline that turns an opened pull request into a review comment.

pub mod github;
pub mod llm;
pub mod pipeline;
pub mod prompt;
