use std::fmt;
use std::sync::Arc;

use hermes_core::{ChangedFile, HermesError, PullRequestRef, ReviewComment};
use tracing::{debug, error, info, warn};

use crate::github::PullRequestApi;
use crate::llm::CompletionApi;
use crate::prompt::build_review_messages;

/// Where the posted comment body came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodySource {
    /// The LLM's review of the changed files.
    Generated,
    /// The configured fallback message.
    Fallback,
}

impl fmt::Display for BodySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodySource::Generated => write!(f, "generated"),
            BodySource::Fallback => write!(f, "fallback"),
        }
    }
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewReport {
    /// Number of changed files, `None` if listing them failed.
    pub changed_files: Option<usize>,
    /// Which body was used for the comment.
    pub body_source: BodySource,
    /// Whether the comment was created.
    pub posted: bool,
}

impl fmt::Display for ReviewReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let files = match self.changed_files {
            Some(n) => n.to_string(),
            None => "unknown".into(),
        };
        write!(
            f,
            "files: {files} | body: {} | posted: {}",
            self.body_source, self.posted
        )
    }
}

/// Turns one opened pull request into one review comment.
///
/// Steps run in order and each has its own failure boundary:
/// 1. list the changed files,
/// 2. ask the LLM for a review of those files,
/// 3. post exactly one comment.
///
/// A failure in step 1 or 2 falls back to the configured message; a failure in
/// step 3 is logged. Nothing is retried and nothing is propagated.
pub struct ReviewPipeline {
    llm: Arc<dyn CompletionApi>,
    fallback_body: String,
}

impl ReviewPipeline {
    /// Create a pipeline around a completion client.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use hermes_core::LlmConfig;
    /// use hermes_review::llm::LlmClient;
    /// use hermes_review::pipeline::ReviewPipeline;
    ///
    /// let llm = LlmClient::new(&LlmConfig::default()).unwrap();
    /// let pipeline = ReviewPipeline::new(Arc::new(llm), "Thanks for the PR!");
    /// assert_eq!(pipeline.fallback_body(), "Thanks for the PR!");
    /// ```
    pub fn new(llm: Arc<dyn CompletionApi>, fallback_body: impl Into<String>) -> Self {
        Self {
            llm,
            fallback_body: fallback_body.into(),
        }
    }

    /// Body posted when no review could be generated.
    pub fn fallback_body(&self) -> &str {
        &self.fallback_body
    }

    /// Ask the LLM to review `files` and return the comment text.
    ///
    /// # Errors
    ///
    /// Returns [`HermesError::Llm`] if the completion fails or comes back blank.
    pub async fn generate(&self, files: &[ChangedFile]) -> Result<String, HermesError> {
        let messages = build_review_messages(files)?;
        let body = self.llm.complete(messages).await?;
        if body.trim().is_empty() {
            return Err(HermesError::Llm("completion returned an empty message".into()));
        }
        Ok(body)
    }

    /// Run the full pipeline against `pr`.
    pub async fn run(&self, github: &dyn PullRequestApi, pr: &PullRequestRef) -> ReviewReport {
        let files = match github.list_changed_files(pr).await {
            Ok(files) => {
                for file in &files {
                    debug!(
                        pr = %pr,
                        file = %file.filename,
                        status = %file.status,
                        changes = file.changes,
                        has_patch = file.patch.is_some(),
                        "changed file"
                    );
                }
                Some(files)
            }
            Err(e) => {
                error!(pr = %pr, error = %e, "Error fetching file changes");
                None
            }
        };

        let (body, body_source) = match files.as_deref() {
            None => (self.fallback_body.clone(), BodySource::Fallback),
            Some([]) => {
                info!(pr = %pr, "pull request has no changed files, skipping review");
                (self.fallback_body.clone(), BodySource::Fallback)
            }
            Some(files) => match self.generate(files).await {
                Ok(body) => (body, BodySource::Generated),
                Err(e) => {
                    warn!(pr = %pr, error = %e, "review generation failed, using fallback body");
                    (self.fallback_body.clone(), BodySource::Fallback)
                }
            },
        };

        let comment = ReviewComment::for_pull_request(pr, body);
        let posted = match github.create_comment(&comment).await {
            Ok(()) => {
                info!(pr = %pr, body = %body_source, "posted review comment");
                true
            }
            Err(HermesError::GitHubApi { status, message }) => {
                error!(pr = %pr, status, message = %message, "Error posting comment");
                false
            }
            Err(e) => {
                error!(pr = %pr, error = %e, "Error posting comment");
                false
            }
        };

        ReviewReport {
            changed_files: files.map(|f| f.len()),
            body_source,
            posted,
        }
    }
}
