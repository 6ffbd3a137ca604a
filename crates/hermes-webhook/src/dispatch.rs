//! Verification and routing of webhook deliveries.
//!
//! A [`Dispatcher`] checks the delivery signature, parses the body, finds the
//! handlers registered for the delivery's key and drops redeliveries. All of
//! that happens before the HTTP response is sent. The handlers themselves run
//! in a detached tokio task, so a client that hangs up early cannot cancel a
//! review half way through.
//!
//! Handlers are registered under `"<event>.<action>"` (e.g.
//! `"pull_request.opened"`) or under the bare event name to receive every
//! action.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hermes_core::HermesError;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::dedupe::DeliveryCache;
use crate::signature::verify_signature;

/// One verified, parsed webhook delivery.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// `X-GitHub-Delivery` id.
    pub id: String,
    /// `X-GitHub-Event` name (e.g. `"pull_request"`).
    pub event: String,
    /// `action` field of the payload, if present.
    pub action: Option<String>,
    /// Full JSON payload.
    pub payload: serde_json::Value,
}

impl Delivery {
    /// Routing key: `"<event>.<action>"`, or just the event without an action.
    ///
    /// # Examples
    ///
    /// ```
    /// use hermes_webhook::dispatch::Delivery;
    ///
    /// let delivery = Delivery {
    ///     id: "1".into(),
    ///     event: "pull_request".into(),
    ///     action: Some("opened".into()),
    ///     payload: serde_json::json!({}),
    /// };
    /// assert_eq!(delivery.key(), "pull_request.opened");
    /// ```
    pub fn key(&self) -> String {
        match &self.action {
            Some(action) => format!("{}.{}", self.event, action),
            None => self.event.clone(),
        }
    }
}

/// The three request headers GitHub sends with every delivery.
#[derive(Debug, Clone, Copy)]
pub struct DeliveryHeaders<'a> {
    /// `X-GitHub-Event`.
    pub event: &'a str,
    /// `X-GitHub-Delivery`.
    pub delivery_id: &'a str,
    /// `X-Hub-Signature-256`.
    pub signature: &'a str,
}

/// Reacts to deliveries routed to it.
#[async_trait]
pub trait WebhookHandler: Send + Sync {
    /// Handle one delivery.
    async fn handle(&self, delivery: &Delivery) -> Result<(), HermesError>;
}

/// What happened to an accepted delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// This many handlers were started in the background.
    Spawned(usize),
    /// No handler is registered for the delivery's key.
    Unrouted,
    /// The delivery id was seen recently; nothing ran.
    Duplicate,
}

/// Failures observed by the dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Missing required header.
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    /// Signature did not match the payload and secret.
    #[error("signature does not match the event payload and secret (event: {event})")]
    Verification {
        /// Event name from the delivery headers.
        event: String,
    },

    /// Invalid JSON body.
    #[error("invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// A registered handler failed.
    #[error("handler for {key} failed: {source}")]
    Handler {
        /// Routing key of the delivery.
        key: String,
        /// The handler's error.
        #[source]
        source: HermesError,
    },
}

/// Result of [`Dispatcher::admit`].
pub enum Admission {
    /// The delivery is new and has handlers; run the job to handle it.
    Run(DeliveryJob),
    /// No handler is registered for the delivery's key.
    Unrouted,
    /// The delivery id was seen recently.
    Duplicate,
}

/// An admitted delivery together with the handlers it was routed to.
///
/// Owns everything it needs, so it can be moved into a spawned task.
pub struct DeliveryJob {
    delivery: Delivery,
    key: String,
    handlers: Vec<Arc<dyn WebhookHandler>>,
    seen: DeliveryCache,
}

impl DeliveryJob {
    /// The delivery this job handles.
    pub fn delivery(&self) -> &Delivery {
        &self.delivery
    }

    /// Number of handlers the job will run.
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Run every handler in registration order, stopping at the first failure.
    ///
    /// A failure forgets the delivery id so a redelivery is processed again.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Handler`] for the first failing handler.
    pub async fn run(self) -> Result<usize, DispatchError> {
        let Self {
            delivery,
            key,
            handlers,
            seen,
        } = self;

        for handler in &handlers {
            if let Err(source) = handler.handle(&delivery).await {
                seen.forget(&delivery.id);
                return Err(DispatchError::Handler { key, source });
            }
        }

        debug!(delivery_id = %delivery.id, key = %key, "delivery handled");
        Ok(handlers.len())
    }

    /// Run the job on the tokio runtime, logging a failure instead of
    /// returning it.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(err) = self.run().await {
                Dispatcher::on_error(&err);
            }
        })
    }
}

/// Verifies deliveries and routes them to registered handlers.
pub struct Dispatcher {
    secret: Vec<u8>,
    handlers: HashMap<String, Vec<Arc<dyn WebhookHandler>>>,
    seen: DeliveryCache,
}

impl Dispatcher {
    /// Create a dispatcher for `secret`, remembering delivery ids for `dedupe_ttl`.
    pub fn new(secret: impl Into<Vec<u8>>, dedupe_ttl: Duration) -> Self {
        Self {
            secret: secret.into(),
            handlers: HashMap::new(),
            seen: DeliveryCache::new(dedupe_ttl),
        }
    }

    /// Register `handler` for `key` (`"event.action"` or a bare event name).
    pub fn on(&mut self, key: impl Into<String>, handler: Arc<dyn WebhookHandler>) -> &mut Self {
        self.handlers.entry(key.into()).or_default().push(handler);
        self
    }

    /// Handlers matching the exact key, then those registered for the bare event.
    fn handlers_for(&self, delivery: &Delivery) -> Vec<Arc<dyn WebhookHandler>> {
        let mut matched = Vec::new();
        if delivery.action.is_some() {
            if let Some(exact) = self.handlers.get(&delivery.key()) {
                matched.extend(exact.iter().cloned());
            }
        }
        if let Some(any_action) = self.handlers.get(&delivery.event) {
            matched.extend(any_action.iter().cloned());
        }
        matched
    }

    /// Verify, parse, route and dedupe one delivery without running handlers.
    ///
    /// The delivery id is recorded only once the signature is valid and at
    /// least one handler matches.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Verification`] on a bad signature and
    /// [`DispatchError::InvalidJson`] on an unparseable body.
    pub fn admit(
        &self,
        headers: DeliveryHeaders<'_>,
        body: &[u8],
    ) -> Result<Admission, DispatchError> {
        if !verify_signature(body, headers.signature, &self.secret) {
            return Err(DispatchError::Verification {
                event: headers.event.to_string(),
            });
        }

        let payload: serde_json::Value = serde_json::from_slice(body)?;
        let delivery = Delivery {
            id: headers.delivery_id.to_string(),
            event: headers.event.to_string(),
            action: payload
                .get("action")
                .and_then(|a| a.as_str())
                .map(String::from),
            payload,
        };
        let key = delivery.key();

        let handlers = self.handlers_for(&delivery);
        if handlers.is_empty() {
            debug!(delivery_id = %delivery.id, key = %key, "no handler registered");
            return Ok(Admission::Unrouted);
        }

        if !self.seen.insert(&delivery.id) {
            info!(delivery_id = %delivery.id, key = %key, "duplicate delivery ignored");
            return Ok(Admission::Duplicate);
        }

        Ok(Admission::Run(DeliveryJob {
            delivery,
            key,
            handlers,
            seen: self.seen.clone(),
        }))
    }

    /// Admit one delivery and start its handlers in the background.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Same as [`admit`](Self::admit). Handler failures are logged by the
    /// spawned task and never reach the caller.
    pub fn receive(
        &self,
        headers: DeliveryHeaders<'_>,
        body: &[u8],
    ) -> Result<DispatchOutcome, DispatchError> {
        match self.admit(headers, body)? {
            Admission::Run(job) => {
                let count = job.handler_count();
                info!(
                    delivery_id = %job.delivery().id,
                    key = %job.key,
                    handlers = count,
                    "dispatching"
                );
                job.spawn();
                Ok(DispatchOutcome::Spawned(count))
            }
            Admission::Unrouted => Ok(DispatchOutcome::Unrouted),
            Admission::Duplicate => Ok(DispatchOutcome::Duplicate),
        }
    }

    /// Log a dispatch failure. Never panics and never re-raises.
    pub fn on_error(err: &DispatchError) {
        match err {
            DispatchError::Verification { event } => {
                warn!(event = %event, "Error processing request: signature verification failed");
            }
            other => {
                error!(error = %other, "Error processing request");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::mpsc;

    use super::*;
    use crate::signature::{compute_signature, format_signature_header};

    const SECRET: &[u8] = b"test-secret";

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl WebhookHandler for Counting {
        async fn handle(&self, _delivery: &Delivery) -> Result<(), HermesError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(HermesError::Payload("delivery carries no installation id".into()));
            }
            Ok(())
        }
    }

    /// Reports each handled delivery id on a channel.
    struct Notifying {
        done: mpsc::UnboundedSender<String>,
    }

    #[async_trait]
    impl WebhookHandler for Notifying {
        async fn handle(&self, delivery: &Delivery) -> Result<(), HermesError> {
            let _ = self.done.send(delivery.id.clone());
            Ok(())
        }
    }

    fn dispatcher_with(key: &str, handler: Arc<dyn WebhookHandler>) -> Dispatcher {
        let mut dispatcher = Dispatcher::new(SECRET, Duration::from_secs(60));
        dispatcher.on(key, handler);
        dispatcher
    }

    fn signed(body: &serde_json::Value) -> (Vec<u8>, String) {
        let bytes = serde_json::to_vec(body).unwrap();
        let signature = format_signature_header(&compute_signature(&bytes, SECRET));
        (bytes, signature)
    }

    /// Admit a signed delivery and, if admitted, run its handlers to completion.
    async fn send(
        dispatcher: &Dispatcher,
        event: &str,
        id: &str,
        body: &serde_json::Value,
    ) -> Result<DispatchOutcome, DispatchError> {
        let (bytes, signature) = signed(body);
        let headers = DeliveryHeaders {
            event,
            delivery_id: id,
            signature: &signature,
        };
        match dispatcher.admit(headers, &bytes)? {
            Admission::Run(job) => job.run().await.map(DispatchOutcome::Spawned),
            Admission::Unrouted => Ok(DispatchOutcome::Unrouted),
            Admission::Duplicate => Ok(DispatchOutcome::Duplicate),
        }
    }

    #[tokio::test]
    async fn routes_exact_event_and_action() {
        let handler = Arc::new(Counting::default());
        let dispatcher = dispatcher_with("pull_request.opened", handler.clone());

        let outcome = send(&dispatcher, "pull_request", "d1", &serde_json::json!({"action": "opened"}))
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Spawned(1));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn other_actions_do_not_reach_opened_handler() {
        let handler = Arc::new(Counting::default());
        let dispatcher = dispatcher_with("pull_request.opened", handler.clone());

        for (i, action) in ["closed", "synchronize", "reopened", "edited"].iter().enumerate() {
            let outcome = send(
                &dispatcher,
                "pull_request",
                &format!("d{i}"),
                &serde_json::json!({ "action": action }),
            )
            .await
            .unwrap();
            assert_eq!(outcome, DispatchOutcome::Unrouted);
        }
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn other_events_do_not_reach_opened_handler() {
        let handler = Arc::new(Counting::default());
        let dispatcher = dispatcher_with("pull_request.opened", handler.clone());

        let outcome = send(&dispatcher, "issues", "d1", &serde_json::json!({"action": "opened"}))
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Unrouted);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn bare_event_key_receives_every_action() {
        let handler = Arc::new(Counting::default());
        let dispatcher = dispatcher_with("pull_request", handler.clone());

        send(&dispatcher, "pull_request", "d1", &serde_json::json!({"action": "opened"}))
            .await
            .unwrap();
        send(&dispatcher, "pull_request", "d2", &serde_json::json!({"action": "closed"}))
            .await
            .unwrap();

        assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn bad_signature_is_a_verification_error() {
        let handler = Arc::new(Counting::default());
        let dispatcher = dispatcher_with("pull_request.opened", handler.clone());
        let headers = DeliveryHeaders {
            event: "pull_request",
            delivery_id: "d1",
            signature: "sha256=00",
        };

        let err = dispatcher
            .receive(headers, br#"{"action":"opened"}"#)
            .unwrap_err();

        assert!(matches!(err, DispatchError::Verification { ref event } if event == "pull_request"));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
        Dispatcher::on_error(&err);
    }

    #[tokio::test]
    async fn bad_signature_does_not_consume_delivery_id() {
        let handler = Arc::new(Counting::default());
        let dispatcher = dispatcher_with("pull_request.opened", handler.clone());
        let body = serde_json::json!({"action": "opened"});
        let (bytes, _) = signed(&body);
        let forged = DeliveryHeaders {
            event: "pull_request",
            delivery_id: "d1",
            signature: "sha256=00",
        };

        assert!(dispatcher.admit(forged, &bytes).is_err());
        let outcome = send(&dispatcher, "pull_request", "d1", &body).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::Spawned(1));
    }

    #[tokio::test]
    async fn invalid_json_is_rejected_after_verification() {
        let dispatcher = Dispatcher::new(SECRET, Duration::from_secs(60));
        let body = b"not json";
        let signature = format_signature_header(&compute_signature(body, SECRET));
        let headers = DeliveryHeaders {
            event: "pull_request",
            delivery_id: "d1",
            signature: &signature,
        };

        let err = dispatcher.receive(headers, body).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidJson(_)));
    }

    #[tokio::test]
    async fn redelivery_is_dispatched_once() {
        let handler = Arc::new(Counting::default());
        let dispatcher = dispatcher_with("pull_request.opened", handler.clone());
        let body = serde_json::json!({"action": "opened"});

        let first = send(&dispatcher, "pull_request", "same-id", &body).await.unwrap();
        let second = send(&dispatcher, "pull_request", "same-id", &body).await.unwrap();

        assert_eq!(first, DispatchOutcome::Spawned(1));
        assert_eq!(second, DispatchOutcome::Duplicate);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_delivery_can_be_redelivered() {
        let handler = Arc::new(Counting {
            fail: true,
            ..Counting::default()
        });
        let dispatcher = dispatcher_with("pull_request.opened", handler.clone());
        let body = serde_json::json!({"action": "opened"});

        let err = send(&dispatcher, "pull_request", "id", &body).await.unwrap_err();
        assert!(matches!(err, DispatchError::Handler { ref key, .. } if key == "pull_request.opened"));
        Dispatcher::on_error(&err);

        assert!(send(&dispatcher, "pull_request", "id", &body).await.is_err());
        assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn receive_runs_handlers_in_the_background() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = dispatcher_with("pull_request.opened", Arc::new(Notifying { done: tx }));
        let (bytes, signature) = signed(&serde_json::json!({"action": "opened"}));
        let headers = DeliveryHeaders {
            event: "pull_request",
            delivery_id: "bg-1",
            signature: &signature,
        };

        let outcome = dispatcher.receive(headers, &bytes).unwrap();
        assert_eq!(outcome, DispatchOutcome::Spawned(1));

        let handled = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert_eq!(handled.as_deref(), Some("bg-1"));
    }

    #[tokio::test]
    async fn spawned_failure_forgets_delivery_id() {
        let handler = Arc::new(Counting {
            fail: true,
            ..Counting::default()
        });
        let dispatcher = dispatcher_with("pull_request.opened", handler.clone());
        let body = serde_json::json!({"action": "opened"});
        let (bytes, signature) = signed(&body);
        let headers = DeliveryHeaders {
            event: "pull_request",
            delivery_id: "retry-me",
            signature: &signature,
        };

        let Admission::Run(job) = dispatcher.admit(headers, &bytes).unwrap() else {
            panic!("delivery should have been admitted");
        };
        job.spawn().await.unwrap();

        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            send(&dispatcher, "pull_request", "retry-me", &body).await.unwrap_err().to_string(),
            "handler for pull_request.opened failed: webhook payload error: delivery carries no installation id"
        );
    }

    #[test]
    fn key_without_action_is_event_name() {
        let delivery = Delivery {
            id: "1".into(),
            event: "ping".into(),
            action: None,
            payload: serde_json::json!({"zen": "Keep it logically awesome."}),
        };
        assert_eq!(delivery.key(), "ping");
    }
}
