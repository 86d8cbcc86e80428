use crate::credentials::CredentialError;
use crate::nonce_store::{NonceOutcome, NonceStoreError};
use crate::session::{SessionError, SessionHandle};
use crate::{LaunchParams, LtiContext, LtiInfo, LtiMessageType, oauth};
use axum::body::Body;
use axum::extract::{OriginalUri, Request};
use chrono::prelude::*;
use http::{Method, header};
use thiserror::Error;
use url::Url;

const REQUIRED_OAUTH_PARAMS: [&str; 3] = ["oauth_signature", "oauth_nonce", "oauth_timestamp"];
const LTI_VERSIONS: [&str; 2] = ["LTI-1p0", "LTI-2p0"];

enum BodyKind {
    Form,
    Json,
}

impl LtiInfo {
    /// Run one request through launch detection and validation.
    ///
    /// Requests that are not launches come back unchanged. Validated launches come back with
    /// an [`LtiContext`] in their extensions, after it has been written to the session when
    /// that is enabled. Anything else is an error for the host to handle.
    pub async fn validate_request(&self, req: Request) -> Result<Request, LtiValidationError> {
        let Some(kind) = Self::structured_body_kind(&req) else {
            tracing::trace!(method = %req.method(), "not a launch candidate, passing through");
            return Ok(req);
        };

        let (mut parts, body) = req.into_parts();
        let body_bytes = axum::body::to_bytes(body, self.max_body_bytes)
            .await
            .map_err(|_| LtiValidationError::InvalidBody)?;

        let params = match kind {
            BodyKind::Form => Some(LaunchParams::from_form(&body_bytes)),
            BodyKind::Json => LaunchParams::from_json(&body_bytes),
        };
        let Some((params, message_type)) =
            params.and_then(|p| p.message_type().map(|t| (p, t)))
        else {
            tracing::debug!("no recognized lti_message_type, passing through");
            return Ok(Request::from_parts(parts, Body::from(body_bytes)));
        };
        tracing::debug!(message_type = message_type.as_str(), "validating LTI launch");

        let credentials = self
            .credentials
            .resolve(params.get("oauth_consumer_key"), &parts)
            .await
            .map_err(LtiValidationError::CredentialLookup)?;

        self.validate_launch(&parts, &params, message_type, &credentials.secret)
            .await?;

        let context = LtiContext {
            key: credentials.key,
            secret: credentials.secret,
            params,
        };
        if self.add_to_session {
            let session = parts
                .extensions
                .get::<SessionHandle>()
                .ok_or(LtiValidationError::NoSession)?;
            session
                .store_launch(&context)
                .await
                .map_err(LtiValidationError::Session)?;
        }
        tracing::debug!(consumer_key = %context.key, "LTI launch validated");
        parts.extensions.insert(context);

        Ok(Request::from_parts(parts, Body::from(body_bytes)))
    }

    fn structured_body_kind(req: &Request) -> Option<BodyKind> {
        if *req.method() != Method::POST {
            return None;
        }
        let content_type = req.headers().get(header::CONTENT_TYPE)?.to_str().ok()?;
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "application/x-www-form-urlencoded" => Some(BodyKind::Form),
            "application/json" => Some(BodyKind::Json),
            _ => None,
        }
    }

    async fn validate_launch(
        &self,
        parts: &http::request::Parts,
        params: &LaunchParams,
        message_type: LtiMessageType,
        secret: &str,
    ) -> Result<(), LtiValidationError> {
        Self::validate_lti_params(params, message_type)?;

        for name in REQUIRED_OAUTH_PARAMS {
            if params.get(name).is_none_or(str::is_empty) {
                return Err(LtiValidationError::MissingParameter(name));
            }
        }
        if let Some(method) = params.get("oauth_signature_method") {
            if method != oauth::SIGNATURE_METHOD {
                return Err(LtiValidationError::UnsupportedSignatureMethod(
                    method.to_string(),
                ));
            }
        }

        // presence checked above
        let timestamp =
            self.validate_timestamp(params.get("oauth_timestamp").unwrap_or_default())?;

        let url = self.request_url(parts)?;
        let base_string = oauth::base_string(parts.method.as_str(), &url, params.as_pairs());
        let signature = params.get(oauth::SIGNATURE_PARAM).unwrap_or_default();
        if !oauth::verify_signature(&base_string, secret, signature) {
            return Err(LtiValidationError::SignatureVerifyFailure);
        }

        let nonce = params.get("oauth_nonce").unwrap_or_default();
        match self
            .nonce_store
            .check_and_record(nonce, timestamp)
            .await
            .map_err(LtiValidationError::NonceStore)?
        {
            NonceOutcome::Accepted => Ok(()),
            NonceOutcome::Rejected => Err(LtiValidationError::NonceRejected),
        }
    }

    fn validate_lti_params(
        params: &LaunchParams,
        message_type: LtiMessageType,
    ) -> Result<(), LtiValidationError> {
        if !params
            .get("lti_version")
            .is_some_and(|v| LTI_VERSIONS.contains(&v))
        {
            return Err(LtiValidationError::InvalidParameters("unsupported lti_version"));
        }
        if message_type != LtiMessageType::ContentItemSelection
            && params.get("resource_link_id").is_none_or(str::is_empty)
        {
            return Err(LtiValidationError::InvalidParameters("missing resource_link_id"));
        }
        Ok(())
    }

    fn validate_timestamp(&self, timestamp_str: &str) -> Result<i64, LtiValidationError> {
        let ts_num: i64 = timestamp_str
            .trim()
            .parse()
            .map_err(|_| LtiValidationError::InvalidTime)?;
        let ts_diff = ts_num
            .checked_sub(Utc::now().timestamp())
            .ok_or(LtiValidationError::InvalidTime)?;
        if !(-self.timestamp_tolerance..=self.timestamp_tolerance).contains(&ts_diff) {
            Err(LtiValidationError::InvalidTime)
        } else {
            Ok(ts_num)
        }
    }

    /// Rebuild the absolute URL the consumer signed.
    fn request_url(&self, parts: &http::request::Parts) -> Result<Url, LtiValidationError> {
        let forwarded_proto = if self.trust_proxy {
            parts
                .headers
                .get("x-forwarded-proto")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        } else {
            None
        };
        let scheme = forwarded_proto
            .or_else(|| parts.uri.scheme_str())
            .unwrap_or("http");

        let authority = match parts.uri.authority() {
            Some(authority) => authority.as_str(),
            None => parts
                .headers
                .get(header::HOST)
                .and_then(|v| v.to_str().ok())
                .ok_or(LtiValidationError::InvalidRequestUrl)?,
        };
        // nested routers strip their prefix from `parts.uri`, the consumer signed the full path
        let uri = parts
            .extensions
            .get::<OriginalUri>()
            .map(|original| &original.0)
            .unwrap_or(&parts.uri);
        let path_and_query = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        Url::parse(&format!("{scheme}://{authority}{path_and_query}"))
            .map_err(|_| LtiValidationError::InvalidRequestUrl)
    }
}

/// All of the possible errors that can take place when attempting to validate a launch. They
/// are handed to the host unchanged so it can tell the causes apart.
#[derive(Debug, Error)]
pub enum LtiValidationError {
    /// The request body could not be read or was larger than the configured limit
    #[error("The request body could not be read or was too large")]
    InvalidBody,
    /// The consumer secret could not be resolved
    #[error("Unable to resolve the consumer credentials: {0}")]
    CredentialLookup(#[source] CredentialError),
    /// The launch is missing LTI parameters or carries unsupported values
    #[error("Invalid LTI parameters: {0}")]
    InvalidParameters(&'static str),
    /// A required OAuth parameter was missing or empty
    #[error("The OAuth parameter {0} was missing")]
    MissingParameter(&'static str),
    #[error("Unsupported OAuth signature method: {0}")]
    UnsupportedSignatureMethod(String),
    /// The absolute request URL could not be reconstructed for signature checking
    #[error("The request URL could not be determined")]
    InvalidRequestUrl,
    /// The timestamp of the launch was either invalid or outside of the permitted range
    #[error("The timestamp of the launch was either invalid or outside of the permitted range")]
    InvalidTime,
    /// The signature did not match the request
    #[error("The OAuth signature of the launch did not match")]
    SignatureVerifyFailure,
    /// The nonce was already used
    #[error("The OAuth nonce was already used")]
    NonceRejected,
    #[error("Unable to check the OAuth nonce: {0}")]
    NonceStore(#[source] NonceStoreError),
    /// Adding launches to the session is enabled but the request carries no SessionHandle
    #[error("No session is available to store the launch in")]
    NoSession,
    #[error("Unable to store the launch in the session: {0}")]
    Session(#[source] SessionError),
}
