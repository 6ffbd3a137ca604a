//! Webhook intake for the Hermes relay.
//!
//! Verifies GitHub deliveries, suppresses redeliveries, routes them by
//! `event.action` key and runs their handlers in the background behind an
//! axum endpoint.

pub mod dedupe;
pub mod dispatch;
pub mod handlers;
pub mod server;
pub mod signature;

pub use dispatch::{
    Admission, Delivery, DeliveryJob, DispatchError, DispatchOutcome, Dispatcher, WebhookHandler,
};
pub use handlers::{PullRequestOpened, PULL_REQUEST_OPENED};
pub use server::{build_router, AppState};
