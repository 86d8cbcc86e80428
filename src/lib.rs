#![forbid(unsafe_code)]
//! # lti-launch
//!
//! This crate lets Tower and Axum based servers detect incoming LTI 1.x launch requests, verify
//! their OAuth 1.0a signature, timestamp and nonce, and hand the validated launch to the lower
//! layers. Usage example:
//!
//! ```no_run
//! use axum::{BoxError, Extension, Router, error_handling::HandleErrorLayer, routing::post};
//! use http::StatusCode;
//! use lti_launch::{LtiContext, LtiValidationLayer};
//! use tower::ServiceBuilder;
//!
//! async fn handle_lti_error(err: BoxError) -> (StatusCode, String) {
//!     (StatusCode::UNAUTHORIZED, format!("Launch rejected: {err}"))
//! }
//!
//! # fn build_router() -> Router {
//! let lti_layer = LtiValidationLayer::from_default_file().unwrap();
//! Router::new()
//!     .route("/launch", post(|Extension(launch): Extension<LtiContext>| async move {
//!         format!("Hello from {}", launch.key)
//!     }))
//!     .layer(
//!         ServiceBuilder::new()
//!             .layer(HandleErrorLayer::new(handle_lti_error))
//!             .layer(lti_layer),
//!     )
//! # }
//! ```
//!
//! The above code will read the launch configuration from a file in `~/.lti_config.yml` which
//! format is:
//! ```yaml
//! common: &common
//!   consumer_key: <OAUTH CONSUMER KEY>
//!   consumer_secret: <OAUTH CONSUMER SECRET>
//!   add_to_session: true
//! ```
//!
//! Requests that are not POSTs carrying a form or JSON body with a recognized
//! `lti_message_type` are passed through untouched. Requests that are launches either get an
//! [`LtiContext`] placed in their extensions, or fail with an [`LtiValidationError`] on the
//! service error channel.

use std::sync::Arc;

/// Static and caller-supplied consumer credential lookup
pub mod credentials;
/// Helpers to parse configuration files or supply structs and construct instances of the main struct
pub mod config;
/// Launch classification and the validated launch context
pub mod context;
/// Pluggable nonce tracking
pub mod nonce_store;
/// OAuth 1.0a HMAC-SHA1 signature primitives, exposed for callers who need direct access
pub mod oauth;
/// Host session abstraction used to persist validated launches
pub mod session;

/// Tower Service and Layer to allow Tower-integrated servers to validate incoming launches
#[cfg(feature = "axum-service")]
pub mod axum_service;
/// Implementation of code to validate incoming launch requests
#[cfg(feature = "axum-service")]
pub mod validate_incoming;

pub use config::{ConfigFileSection, ConfigReadError};
pub use context::{LaunchParams, LtiContext, LtiMessageType};
pub use credentials::{ConsumerCredentials, CredentialError, CredentialResolver, RequestHead};
pub use nonce_store::{MemoryNonceStore, NonceOutcome, NonceStore};
pub use session::{LaunchSession, MemorySession, SESSION_KEY, SessionHandle};

#[cfg(feature = "axum-service")]
pub use axum_service::{LtiValidationLayer, LtiValidationService};
#[cfg(feature = "axum-service")]
pub use validate_incoming::LtiValidationError;

/// This is the primary struct of this crate. It holds everything needed to validate an incoming
/// launch: the way consumer secrets are looked up, the nonce store, and the propagation options.
///
/// Cloning is cheap, and clones share the same resolver and nonce store.
#[derive(Clone)]
pub struct LtiInfo {
    credentials: Arc<dyn CredentialResolver>,
    nonce_store: Arc<dyn NonceStore>,
    add_to_session: bool,
    trust_proxy: bool,
    timestamp_tolerance: i64,
    max_body_bytes: usize,
}

impl LtiInfo {
    /// Replace the nonce store. The default is an in-process [`MemoryNonceStore`]; supply a
    /// shared store when several processes accept launches for the same consumers.
    pub fn with_nonce_store(mut self, store: impl NonceStore + 'static) -> Self {
        self.nonce_store = Arc::new(store);
        self
    }

    /// Whether validated launches are also written to the host session.
    pub fn adds_to_session(&self) -> bool {
        self.add_to_session
    }
}
