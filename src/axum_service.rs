//! Structs and impls related to providing a Tower Service and Layer to validate incoming launches

use axum::extract::Request;
use futures_core::future::BoxFuture;
use std::error::Error;
use std::task::{Context, Poll};
use tower::{Layer, Service};

use crate::{ConfigFileSection, ConfigReadError, LtiInfo};

/// This is a Tower Service which detects LTI launches and validates them before passing the
/// request down to the next layer. Requests that are not launches are passed down untouched.
/// A launch that fails validation is not passed down; the validation error is returned on the
/// service error channel instead.
#[derive(Clone)]
pub struct LtiValidationService<S> {
    lti_info: LtiInfo,
    service: S,
}

impl<S> Service<Request> for LtiValidationService<S>
where
    S: Service<Request> + Send + Clone + 'static,
    S::Future: Send + 'static,
    S::Error: Into<Box<dyn Error + Sync + Send>>,
{
    type Response = S::Response;
    type Error = Box<dyn Error + Sync + Send>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx).map_err(|e| e.into())
    }

    fn call(&mut self, request: Request) -> Self::Future {
        // the instance that was polled ready goes into the future, a fresh clone stays behind
        let clone = self.service.clone();
        let mut inner = std::mem::replace(&mut self.service, clone);
        let lti_info = self.lti_info.clone();
        Box::pin(async move {
            match lti_info.validate_request(request).await {
                Ok(checked_request) => match inner.call(checked_request).await {
                    Ok(response) => Ok(response),
                    Err(err) => Err(err.into()),
                },
                Err(err) => Err(Box::new(err) as Box<dyn Error + Send + Sync>),
            }
        })
    }
}

/// This is a Tower Layer which applies the LtiValidationService on top of the
/// service provided to it.
#[derive(Clone)]
pub struct LtiValidationLayer {
    lti_info: LtiInfo,
}

impl<S> Layer<S> for LtiValidationLayer {
    type Service = LtiValidationService<S>;

    fn layer(&self, service: S) -> Self::Service {
        LtiValidationService {
            lti_info: self.lti_info.clone(),
            service,
        }
    }
}

impl LtiValidationLayer {
    /// Construct a LtiValidationLayer based on the configuration options in the file
    /// found in the default location.
    pub fn from_default_file() -> Result<Self, ConfigReadError> {
        Ok(Self::from_lti_info(LtiInfo::from_default_file()?))
    }

    /// Construct a LtiValidationLayer based on the configuration options in a manually
    /// created or parsed ConfigFileSection.
    pub fn from_config_section(config_info: &ConfigFileSection) -> Result<Self, ConfigReadError> {
        Ok(Self::from_lti_info(LtiInfo::from_config_section(config_info)?))
    }

    /// Construct a LtiValidationLayer from an already configured LtiInfo, e.g. one with a
    /// credential resolver or a custom nonce store.
    pub fn from_lti_info(lti_info: LtiInfo) -> Self {
        LtiValidationLayer { lti_info }
    }
}
