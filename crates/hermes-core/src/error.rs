use std::path::PathBuf;

/// Errors that can occur across the Hermes relay.
///
/// Library crates use this type directly; the binary crate converts to
/// `miette::Report` at the boundary.
///
/// # Examples
///
/// ```
/// use hermes_core::HermesError;
///
/// let err = HermesError::Config("missing webhook secret".into());
/// assert!(err.to_string().contains("missing webhook secret"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum HermesError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// GitHub client or transport failure without a structured API response.
    #[error("GitHub error: {0}")]
    GitHub(String),

    /// Structured error response returned by the GitHub REST API.
    #[error("GitHub API error {status}: {message}")]
    GitHubApi {
        /// HTTP status code of the response.
        status: u16,
        /// `message` field of the error body.
        message: String,
    },

    /// LLM API or response error.
    #[error("LLM error: {0}")]
    Llm(String),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A required file was not found.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// A webhook payload lacks something the handler needs.
    #[error("webhook payload error: {0}")]
    Payload(String),

    /// A pull request reference that is not `owner/repo#number`.
    #[error("invalid PR reference '{0}', expected owner/repo#number")]
    InvalidPrReference(String),
}

impl HermesError {
    /// Returns the HTTP status code if GitHub answered with a structured error.
    ///
    /// # Examples
    ///
    /// ```
    /// use hermes_core::HermesError;
    ///
    /// let err = HermesError::GitHubApi { status: 403, message: "Forbidden".into() };
    /// assert_eq!(err.github_status(), Some(403));
    /// assert_eq!(HermesError::GitHub("timeout".into()).github_status(), None);
    /// ```
    pub fn github_status(&self) -> Option<u16> {
        match self {
            HermesError::GitHubApi { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: HermesError = io_err.into();
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn config_error_displays_message() {
        let err = HermesError::Config("bad value".into());
        assert_eq!(err.to_string(), "configuration error: bad value");
    }

    #[test]
    fn github_api_error_shows_status_and_message() {
        let err = HermesError::GitHubApi {
            status: 404,
            message: "Not Found".into(),
        };
        assert_eq!(err.to_string(), "GitHub API error 404: Not Found");
    }

    #[test]
    fn payload_error_is_not_a_config_error() {
        let err = HermesError::Payload("delivery carries no installation id".into());
        assert_eq!(
            err.to_string(),
            "webhook payload error: delivery carries no installation id"
        );
        assert!(!matches!(err, HermesError::Config(_)));
    }

    #[test]
    fn file_not_found_shows_path() {
        let err = HermesError::FileNotFound(PathBuf::from("/tmp/key.pem"));
        assert!(err.to_string().contains("/tmp/key.pem"));
    }
}
