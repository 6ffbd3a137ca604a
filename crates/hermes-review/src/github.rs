use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use hermes_core::{AppConfig, ChangedFile, HermesError, PullRequestRef, ReviewComment};
use octocrab::models::{AppId, InstallationId};
use octocrab::Octocrab;
use serde::{Deserialize, Serialize};

/// Page size for the list-files endpoint (the API maximum).
const FILES_PER_PAGE: usize = 100;

/// GitHub stops listing files after 3000 entries.
const MAX_FILE_PAGES: u32 = 30;

/// The two pull request operations the review pipeline needs.
#[async_trait]
pub trait PullRequestApi: Send + Sync {
    /// List every file changed by the pull request, in API order.
    async fn list_changed_files(&self, pr: &PullRequestRef) -> Result<Vec<ChangedFile>, HermesError>;

    /// Create a comment on the pull request's conversation.
    async fn create_comment(&self, comment: &ReviewComment) -> Result<(), HermesError>;
}

/// Hands out a [`PullRequestApi`] authenticated for a given installation.
#[async_trait]
pub trait GitHubProvider: Send + Sync {
    /// Client acting as `installation_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if no installation token can be minted.
    async fn client_for(
        &self,
        installation_id: u64,
    ) -> Result<Arc<dyn PullRequestApi>, HermesError>;
}

#[derive(Serialize)]
struct PageParams {
    per_page: usize,
    page: u32,
}

#[derive(Deserialize)]
struct AppInfo {
    name: String,
}

/// GitHub REST client for listing pull request files and posting comments.
///
/// Built from a personal token for the CLI, or handed out per installation by
/// [`GitHubApp`].
#[derive(Clone)]
pub struct GitHubClient {
    octocrab: Octocrab,
}

impl GitHubClient {
    /// Wrap an already-authenticated octocrab instance.
    pub fn from_octocrab(octocrab: Octocrab) -> Self {
        Self { octocrab }
    }

    /// Create a client from an explicit token or the `GITHUB_TOKEN` environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`HermesError::Config`] if no token is available, or
    /// [`HermesError::GitHub`] if the client cannot be built.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use hermes_review::github::GitHubClient;
    ///
    /// let client = GitHubClient::from_token(Some("ghp_xxxx"), None).unwrap();
    /// ```
    pub fn from_token(token: Option<&str>, base_url: Option<&str>) -> Result<Self, HermesError> {
        let token = match token {
            Some(t) => t.to_string(),
            None => std::env::var("GITHUB_TOKEN")
                .or_else(|_| std::env::var("GH_TOKEN"))
                .map_err(|_| {
                    HermesError::Config(
                        "GITHUB_TOKEN not set. Pass --github-token or set GITHUB_TOKEN env var"
                            .into(),
                    )
                })?,
        };

        let mut builder = Octocrab::builder().personal_token(token);
        if let Some(url) = base_url {
            builder = builder
                .base_uri(url)
                .map_err(|e| HermesError::Config(format!("invalid GitHub base URL '{url}': {e}")))?;
        }
        let octocrab = builder
            .build()
            .map_err(|e| HermesError::GitHub(format!("failed to create GitHub client: {e}")))?;

        Ok(Self { octocrab })
    }
}

#[async_trait]
impl PullRequestApi for GitHubClient {
    async fn list_changed_files(&self, pr: &PullRequestRef) -> Result<Vec<ChangedFile>, HermesError> {
        let route = format!("/repos/{}/{}/pulls/{}/files", pr.owner, pr.repo, pr.number);
        let (octocrab, route) = (&self.octocrab, route.as_str());
        let files = collect_pages(move |page| async move {
            let params = PageParams {
                per_page: FILES_PER_PAGE,
                page,
            };
            octocrab
                .get::<Vec<ChangedFile>, _, _>(route, Some(&params))
                .await
                .map_err(from_octocrab)
        })
        .await?;

        tracing::debug!(pr = %pr, files = files.len(), "listed changed files");
        Ok(files)
    }

    async fn create_comment(&self, comment: &ReviewComment) -> Result<(), HermesError> {
        self.octocrab
            .issues(&comment.owner, &comment.repo)
            .create_comment(comment.issue_number, &comment.body)
            .await
            .map_err(from_octocrab)?;
        Ok(())
    }
}

/// A GitHub App identity that mints installation-scoped clients.
#[derive(Clone)]
pub struct GitHubApp {
    octocrab: Octocrab,
}

impl GitHubApp {
    /// Build the App client from its id and private key file.
    ///
    /// # Errors
    ///
    /// Returns [`HermesError::Config`] if the id or key path is missing or the key
    /// is not a valid RSA PEM, [`HermesError::FileNotFound`] if the key file does
    /// not exist.
    pub fn new(config: &AppConfig) -> Result<Self, HermesError> {
        let app_id = config
            .app_id
            .ok_or_else(|| HermesError::Config("APP_ID not set".into()))?;
        let key_path = config
            .private_key_path
            .as_deref()
            .ok_or_else(|| HermesError::Config("PRIVATE_KEY_PATH not set".into()))?;

        let pem = std::fs::read(key_path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => HermesError::FileNotFound(key_path.to_path_buf()),
            _ => HermesError::Io(e),
        })?;
        let key = jsonwebtoken::EncodingKey::from_rsa_pem(&pem).map_err(|e| {
            HermesError::Config(format!(
                "invalid private key {}: {e}",
                key_path.display()
            ))
        })?;

        let mut builder = Octocrab::builder().app(AppId(app_id), key);
        if let Some(url) = config.api_base_url() {
            builder = builder
                .base_uri(url.as_str())
                .map_err(|e| HermesError::Config(format!("invalid GitHub base URL '{url}': {e}")))?;
        }
        let octocrab = builder
            .build()
            .map_err(|e| HermesError::GitHub(format!("failed to create GitHub App client: {e}")))?;

        Ok(Self { octocrab })
    }

    /// Name of the authenticated App, from `GET /app`.
    ///
    /// # Errors
    ///
    /// Returns a GitHub error if the App JWT is rejected.
    pub async fn app_name(&self) -> Result<String, HermesError> {
        let info: AppInfo = self
            .octocrab
            .get("/app", None::<&()>)
            .await
            .map_err(from_octocrab)?;
        Ok(info.name)
    }

    /// Client authenticated as the given installation.
    ///
    /// # Errors
    ///
    /// Returns a GitHub error if the installation token cannot be created.
    pub async fn installation_client(&self, installation_id: u64) -> Result<GitHubClient, HermesError> {
        let (octocrab, _token) = self
            .octocrab
            .installation_and_token(InstallationId(installation_id))
            .await
            .map_err(from_octocrab)?;
        Ok(GitHubClient::from_octocrab(octocrab))
    }
}

#[async_trait]
impl GitHubProvider for GitHubApp {
    async fn client_for(
        &self,
        installation_id: u64,
    ) -> Result<Arc<dyn PullRequestApi>, HermesError> {
        let client = self.installation_client(installation_id).await?;
        Ok(Arc::new(client))
    }
}

/// Fetch pages `1..=MAX_FILE_PAGES` in order until one comes back short.
///
/// A full last page costs one extra request that returns nothing.
async fn collect_pages<T, F, Fut>(mut fetch_page: F) -> Result<Vec<T>, HermesError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Vec<T>, HermesError>>,
{
    let mut items = Vec::new();
    for page in 1..=MAX_FILE_PAGES {
        let batch = fetch_page(page).await?;
        let last = batch.len() < FILES_PER_PAGE;
        items.extend(batch);
        if last {
            break;
        }
    }
    Ok(items)
}

/// Keep GitHub's structured error responses apart from transport failures.
fn from_octocrab(err: octocrab::Error) -> HermesError {
    match err {
        octocrab::Error::GitHub { source, .. } => HermesError::GitHubApi {
            status: source.status_code.as_u16(),
            message: source.message.clone(),
        },
        other => HermesError::GitHub(other.to_string()),
    }
}

/// Parse a PR reference string (`owner/repo#number`) into its components.
///
/// # Errors
///
/// Returns [`HermesError::InvalidPrReference`] if the format is invalid.
///
/// # Examples
///
/// ```
/// use hermes_review::github::parse_pr_reference;
///
/// let pr = parse_pr_reference("octocat/hello-world#42").unwrap();
/// assert_eq!(pr.to_string(), "octocat/hello-world#42");
/// ```
pub fn parse_pr_reference(pr_ref: &str) -> Result<PullRequestRef, HermesError> {
    let invalid = || HermesError::InvalidPrReference(pr_ref.to_string());

    let (owner_repo, number_str) = pr_ref.split_once('#').ok_or_else(invalid)?;
    let (owner, repo) = owner_repo.split_once('/').ok_or_else(invalid)?;
    if owner.is_empty() || repo.is_empty() {
        return Err(invalid());
    }
    let number: u64 = number_str.parse().map_err(|_| invalid())?;
    Ok(PullRequestRef::new(owner, repo, number))
}
