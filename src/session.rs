use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;
use thiserror::Error;

use crate::LtiContext;

/// Session field a validated launch is written under.
pub const SESSION_KEY: &str = "lti";

/// The part of a host session this crate needs: somewhere to put a validated launch.
///
/// Loading and saving the session around the request is the host's business. The layer only
/// calls `store_launch` once per validated launch.
#[async_trait]
pub trait LaunchSession: Send + Sync {
    async fn store_launch(&self, field: &str, context: &LtiContext) -> Result<(), SessionError>;
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Unable to serialize the launch for the session: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Session backend failure: {0}")]
    Backend(#[source] Box<dyn Error + Send + Sync>),
}

/// Request extension through which the host exposes its session to the layer. Insert one
/// into every request (typically from the session middleware) when launches should be
/// persisted.
#[derive(Clone)]
pub struct SessionHandle(Arc<dyn LaunchSession>);

impl SessionHandle {
    pub fn new(session: impl LaunchSession + 'static) -> Self {
        Self(Arc::new(session))
    }

    pub(crate) async fn store_launch(&self, context: &LtiContext) -> Result<(), SessionError> {
        self.0.store_launch(SESSION_KEY, context).await
    }
}

/// A session kept in memory as JSON values, for tests and hosts without a session layer of
/// their own.
#[derive(Clone, Debug, Default)]
pub struct MemorySession(Arc<RwLock<HashMap<String, Value>>>);

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<Value> {
        self.0.read().get(field).cloned()
    }

    /// The launch stored under [`SESSION_KEY`], if any.
    pub fn launch(&self) -> Option<LtiContext> {
        self.get(SESSION_KEY)
            .and_then(|value| serde_json::from_value(value).ok())
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }
}

#[async_trait]
impl LaunchSession for MemorySession {
    async fn store_launch(&self, field: &str, context: &LtiContext) -> Result<(), SessionError> {
        let value = serde_json::to_value(context)?;
        self.0.write().insert(field.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::LaunchParams;

    #[tokio::test]
    async fn handle_writes_under_fixed_key() {
        let session = MemorySession::new();
        let handle = SessionHandle::new(session.clone());
        let context = LtiContext {
            key: "key".to_string(),
            secret: "secret".to_string(),
            params: LaunchParams::from_form(b"lti_message_type=basic-lti-launch-request"),
        };
        assert!(session.is_empty());
        handle.store_launch(&context).await.unwrap();
        assert!(session.get("lti").is_some());
        assert_eq!(session.launch(), Some(context));
    }
}
