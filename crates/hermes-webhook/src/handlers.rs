//! Handlers registered with the dispatcher.

use std::sync::Arc;

use async_trait::async_trait;
use hermes_core::{HermesError, WebhookEvent};
use hermes_review::github::GitHubProvider;
use hermes_review::pipeline::ReviewPipeline;
use tracing::info;

use crate::dispatch::{Delivery, WebhookHandler};

/// Routing key for newly opened pull requests.
pub const PULL_REQUEST_OPENED: &str = "pull_request.opened";

/// Reviews a newly opened pull request and comments on it.
pub struct PullRequestOpened {
    github: Arc<dyn GitHubProvider>,
    pipeline: Arc<ReviewPipeline>,
}

impl PullRequestOpened {
    /// Review with `pipeline`, acting as the delivery's installation via `github`.
    pub fn new(github: Arc<dyn GitHubProvider>, pipeline: Arc<ReviewPipeline>) -> Self {
        Self { github, pipeline }
    }
}

#[async_trait]
impl WebhookHandler for PullRequestOpened {
    async fn handle(&self, delivery: &Delivery) -> Result<(), HermesError> {
        let event: WebhookEvent = serde_json::from_value(delivery.payload.clone())?;
        let pr = event.pull_request_ref();
        let head = event
            .pull_request
            .head
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();

        info!(delivery_id = %delivery.id, pr = %pr, head = %head, "Received a pull request event");

        let installation_id = event.installation_id().ok_or_else(|| {
            HermesError::Payload("delivery carries no installation id".into())
        })?;
        let github = self.github.client_for(installation_id).await?;
        let report = self.pipeline.run(github.as_ref(), &pr).await;

        info!(delivery_id = %delivery.id, pr = %pr, report = %report, "review finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use hermes_core::{ChangedFile, PullRequestRef, ReviewComment};
    use hermes_review::github::PullRequestApi;
    use hermes_review::llm::{ChatMessage, CompletionApi};

    use super::*;

    #[derive(Default)]
    struct RecordingGitHub {
        comments: Mutex<Vec<ReviewComment>>,
    }

    #[async_trait]
    impl PullRequestApi for RecordingGitHub {
        async fn list_changed_files(
            &self,
            _pr: &PullRequestRef,
        ) -> Result<Vec<ChangedFile>, HermesError> {
            Ok(vec![ChangedFile {
                filename: "a.go".into(),
                status: "modified".into(),
                changes: 3,
                patch: Some("@@ ...".into()),
            }])
        }

        async fn create_comment(&self, comment: &ReviewComment) -> Result<(), HermesError> {
            self.comments.lock().unwrap().push(comment.clone());
            Ok(())
        }
    }

    struct Provider {
        client: Arc<RecordingGitHub>,
        installations: Mutex<Vec<u64>>,
    }

    #[async_trait]
    impl GitHubProvider for Provider {
        async fn client_for(
            &self,
            installation_id: u64,
        ) -> Result<Arc<dyn PullRequestApi>, HermesError> {
            self.installations.lock().unwrap().push(installation_id);
            Ok(self.client.clone())
        }
    }

    struct Echo;

    #[async_trait]
    impl CompletionApi for Echo {
        async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, HermesError> {
            Ok(format!("reviewed {} message(s)", messages.len()))
        }
    }

    fn handler() -> (PullRequestOpened, Arc<Provider>) {
        let provider = Arc::new(Provider {
            client: Arc::new(RecordingGitHub::default()),
            installations: Mutex::new(Vec::new()),
        });
        let pipeline = Arc::new(ReviewPipeline::new(Arc::new(Echo), "fallback"));
        (PullRequestOpened::new(provider.clone(), pipeline), provider)
    }

    fn delivery(payload: serde_json::Value) -> Delivery {
        Delivery {
            id: "d1".into(),
            event: "pull_request".into(),
            action: Some("opened".into()),
            payload,
        }
    }

    #[tokio::test]
    async fn comments_on_the_originating_pull_request() {
        let (handler, provider) = handler();
        let payload = serde_json::json!({
            "action": "opened",
            "repository": { "owner": { "login": "acme" }, "name": "widgets" },
            "pull_request": { "number": 42 },
            "installation": { "id": 77 }
        });

        handler.handle(&delivery(payload)).await.unwrap();

        assert_eq!(*provider.installations.lock().unwrap(), vec![77]);
        let comments = provider.client.comments.lock().unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(
            (comments[0].owner.as_str(), comments[0].repo.as_str(), comments[0].issue_number),
            ("acme", "widgets", 42)
        );
        assert_eq!(comments[0].body, "reviewed 1 message(s)");
    }

    #[tokio::test]
    async fn missing_installation_is_an_error() {
        let (handler, provider) = handler();
        let payload = serde_json::json!({
            "action": "opened",
            "repository": { "owner": { "login": "acme" }, "name": "widgets" },
            "pull_request": { "number": 42 }
        });

        let err = handler.handle(&delivery(payload)).await.unwrap_err();
        assert!(matches!(err, HermesError::Payload(_)), "unexpected error: {err}");
        assert!(provider.installations.lock().unwrap().is_empty());
        assert!(provider.client.comments.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_payload_is_an_error() {
        let (handler, _provider) = handler();
        let payload = serde_json::json!({ "action": "opened" });

        let err = handler.handle(&delivery(payload)).await.unwrap_err();
        assert!(matches!(err, HermesError::Serialization(_)));
    }
}
