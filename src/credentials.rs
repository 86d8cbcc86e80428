use async_trait::async_trait;
use http::request::Parts;
use http::{HeaderMap, Method, Uri};
use std::error::Error;
use std::future::Future;
use thiserror::Error;

/// The key and secret a launch is validated against.
#[derive(Clone, PartialEq, Eq)]
pub struct ConsumerCredentials {
    pub key: String,
    pub secret: String,
}

impl ConsumerCredentials {
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: secret.into(),
        }
    }
}

impl std::fmt::Debug for ConsumerCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerCredentials")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Maps the consumer key claimed by a launch to the key/secret pair used to validate it.
///
/// The claimed key is the `oauth_consumer_key` body parameter, which a malformed launch may
/// omit. The request head is provided for resolvers that pick credentials per host or path.
/// The resolver is called at most once per launch, and validation only starts after it
/// returns.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(
        &self,
        claimed_key: Option<&str>,
        parts: &Parts,
    ) -> Result<ConsumerCredentials, CredentialError>;
}

/// Errors a [`CredentialResolver`] can report. Any of them aborts the launch and is forwarded
/// to the host's error handling.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("No consumer key was supplied with the launch")]
    MissingKey,
    #[error("Unknown consumer key: {0}")]
    UnknownKey(String),
    #[error("Credential lookup failed: {0}")]
    Backend(#[source] Box<dyn Error + Send + Sync>),
}

/// Resolver for a single configured pair. The claimed key is ignored; a launch signed for a
/// different key will simply fail signature verification.
#[derive(Clone)]
pub struct StaticCredentials(ConsumerCredentials);

impl StaticCredentials {
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self(ConsumerCredentials::new(key, secret))
    }
}

#[async_trait]
impl CredentialResolver for StaticCredentials {
    async fn resolve(
        &self,
        _claimed_key: Option<&str>,
        _parts: &Parts,
    ) -> Result<ConsumerCredentials, CredentialError> {
        Ok(self.0.clone())
    }
}

/// Owned copy of the request head, handed to closure resolvers so the returned future does
/// not borrow from the request.
#[derive(Clone, Debug)]
pub struct RequestHead {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
}

impl From<&Parts> for RequestHead {
    fn from(parts: &Parts) -> Self {
        Self {
            method: parts.method.clone(),
            uri: parts.uri.clone(),
            headers: parts.headers.clone(),
        }
    }
}

/// Adapter returned by [`resolve_with`].
pub struct FnResolver<F>(F);

/// Build a [`CredentialResolver`] from an async closure receiving the claimed consumer key
/// and the request head.
///
/// ```
/// use lti_launch::credentials::{ConsumerCredentials, CredentialError, RequestHead, resolve_with};
///
/// let resolver = resolve_with(|key: Option<String>, _head: RequestHead| async move {
///     match key.as_deref() {
///         Some("course-tools") => Ok(ConsumerCredentials::new("course-tools", "s3cret")),
///         Some(other) => Err(CredentialError::UnknownKey(other.to_string())),
///         None => Err(CredentialError::MissingKey),
///     }
/// });
/// # let _ = resolver;
/// ```
pub fn resolve_with<F, Fut>(f: F) -> FnResolver<F>
where
    F: Fn(Option<String>, RequestHead) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ConsumerCredentials, CredentialError>> + Send + 'static,
{
    FnResolver(f)
}

#[async_trait]
impl<F, Fut> CredentialResolver for FnResolver<F>
where
    F: Fn(Option<String>, RequestHead) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ConsumerCredentials, CredentialError>> + Send + 'static,
{
    async fn resolve(
        &self,
        claimed_key: Option<&str>,
        parts: &Parts,
    ) -> Result<ConsumerCredentials, CredentialError> {
        (self.0)(claimed_key.map(str::to_owned), RequestHead::from(parts)).await
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn parts() -> Parts {
        http::Request::builder()
            .uri("/launch")
            .header("host", "tenant-a.example.com")
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    #[tokio::test]
    async fn static_credentials_ignore_claimed_key() {
        let resolver = StaticCredentials::new("key", "secret");
        let creds = resolver.resolve(Some("other"), &parts()).await.unwrap();
        assert_eq!(creds, ConsumerCredentials::new("key", "secret"));
        let creds = resolver.resolve(None, &parts()).await.unwrap();
        assert_eq!(creds.key, "key");
    }

    #[tokio::test]
    async fn closure_resolver_receives_claimed_key() {
        let resolver = resolve_with(|key: Option<String>, _head: RequestHead| async move {
            match key.as_deref() {
                Some("known") => Ok(ConsumerCredentials::new("known", "pw")),
                Some(other) => Err(CredentialError::UnknownKey(other.to_string())),
                None => Err(CredentialError::MissingKey),
            }
        });
        let creds = resolver.resolve(Some("known"), &parts()).await.unwrap();
        assert_eq!(creds.secret, "pw");
        assert!(matches!(
            resolver.resolve(Some("nope"), &parts()).await,
            Err(CredentialError::UnknownKey(k)) if k == "nope"
        ));
        assert!(matches!(
            resolver.resolve(None, &parts()).await,
            Err(CredentialError::MissingKey)
        ));
    }

    #[tokio::test]
    async fn closure_resolver_sees_request_head() {
        let resolver = resolve_with(|key: Option<String>, head: RequestHead| async move {
            let host = head
                .headers
                .get("host")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            match (key.as_deref(), host.as_str()) {
                (Some("shared"), "tenant-a.example.com") => {
                    Ok(ConsumerCredentials::new("shared", "tenant-a-secret"))
                }
                (Some(other), _) => Err(CredentialError::UnknownKey(other.to_string())),
                (None, _) => Err(CredentialError::MissingKey),
            }
        });
        let creds = resolver.resolve(Some("shared"), &parts()).await.unwrap();
        assert_eq!(creds.secret, "tenant-a-secret");
    }

    #[test]
    fn debug_output_hides_secret() {
        let rendered = format!("{:?}", ConsumerCredentials::new("key", "hunter2"));
        assert!(rendered.contains("key"));
        assert!(!rendered.contains("hunter2"));
    }
}
