use std::fmt;

use serde::{Deserialize, Serialize};

/// The subset of a GitHub `pull_request` webhook payload the relay reads.
///
/// Unknown fields are ignored, so full GitHub payloads deserialize as-is.
///
/// # Examples
///
/// ```
/// use hermes_core::WebhookEvent;
///
/// let json = r#"{
///     "action": "opened",
///     "repository": { "name": "widgets", "owner": { "login": "acme" } },
///     "pull_request": { "number": 42 }
/// }"#;
/// let event: WebhookEvent = serde_json::from_str(json).unwrap();
/// assert_eq!(event.action, "opened");
/// assert_eq!(event.pull_request_ref().to_string(), "acme/widgets#42");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Action that triggered the delivery (e.g. `"opened"`).
    pub action: String,
    /// Repository the pull request belongs to.
    pub repository: Repository,
    /// The pull request itself.
    pub pull_request: PullRequest,
    /// GitHub App installation that received the event, if any.
    #[serde(default)]
    pub installation: Option<Installation>,
}

impl WebhookEvent {
    /// Identify the pull request this event is about.
    pub fn pull_request_ref(&self) -> PullRequestRef {
        PullRequestRef {
            owner: self.repository.owner.login.clone(),
            repo: self.repository.name.clone(),
            number: self.pull_request.number,
        }
    }

    /// Installation id carried by the payload.
    pub fn installation_id(&self) -> Option<u64> {
        self.installation.as_ref().map(|i| i.id)
    }
}

/// Repository section of a webhook payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    /// Repository name without the owner.
    pub name: String,
    /// Owning user or organization.
    pub owner: RepositoryOwner,
}

/// Owner of a repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryOwner {
    /// Login of the user or organization.
    pub login: String,
}

/// Pull request section of a webhook payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    /// Pull request number, shared with the issue number.
    pub number: u64,
    /// Head branch of the pull request.
    #[serde(default)]
    pub head: Option<PullRequestHead>,
}

/// Head commit and branch of a pull request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestHead {
    /// Commit SHA at the tip of the head branch.
    pub sha: String,
    /// Branch name.
    #[serde(rename = "ref")]
    pub ref_name: String,
}

impl fmt::Display for PullRequestHead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.ref_name, self.sha)
    }
}

/// GitHub App installation reference.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Installation {
    /// Installation id used to mint an access token.
    pub id: u64,
}

/// Fully-qualified pull request coordinates.
///
/// # Examples
///
/// ```
/// use hermes_core::PullRequestRef;
///
/// let pr = PullRequestRef::new("octocat", "hello-world", 7);
/// assert_eq!(pr.to_string(), "octocat/hello-world#7");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PullRequestRef {
    /// Repository owner login.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Pull request number.
    pub number: u64,
}

impl PullRequestRef {
    /// Build a reference from its parts.
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, number: u64) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            number,
        }
    }
}

impl fmt::Display for PullRequestRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

/// One file changed by a pull request, as returned by the list-files endpoint.
///
/// `patch` is absent for binary files and for diffs GitHub considers too large.
///
/// # Examples
///
/// ```
/// use hermes_core::ChangedFile;
///
/// let json = r#"{"filename":"logo.png","status":"added","changes":0,"additions":0}"#;
/// let file: ChangedFile = serde_json::from_str(json).unwrap();
/// assert_eq!(file.filename, "logo.png");
/// assert!(file.patch.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    /// Path of the file relative to the repository root.
    pub filename: String,
    /// Change status (`added`, `modified`, `removed`, `renamed`, ...).
    pub status: String,
    /// Total number of changed lines.
    pub changes: u64,
    /// Unified diff of the file, when GitHub provides one.
    #[serde(default)]
    pub patch: Option<String>,
}

/// A comment to create on a pull request's conversation.
///
/// Pull requests share their number with the underlying issue, so the comment
/// is addressed by `issue_number`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewComment {
    /// Repository owner login.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Issue (pull request) number.
    pub issue_number: u64,
    /// Markdown body of the comment.
    pub body: String,
}

impl ReviewComment {
    /// Address a comment to the given pull request.
    ///
    /// # Examples
    ///
    /// ```
    /// use hermes_core::{PullRequestRef, ReviewComment};
    ///
    /// let pr = PullRequestRef::new("acme", "widgets", 42);
    /// let comment = ReviewComment::for_pull_request(&pr, "LGTM");
    /// assert_eq!(comment.issue_number, 42);
    /// assert_eq!(comment.body, "LGTM");
    /// ```
    pub fn for_pull_request(pr: &PullRequestRef, body: impl Into<String>) -> Self {
        Self {
            owner: pr.owner.clone(),
            repo: pr.repo.clone(),
            issue_number: pr.number,
            body: body.into(),
        }
    }
}
