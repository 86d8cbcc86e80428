use crate::LtiInfo;
use crate::credentials::{CredentialResolver, StaticCredentials};
use crate::nonce_store::MemoryNonceStore;
use serde::Deserialize;
use std::io;
use std::sync::Arc;
use thiserror::Error;

const CONFIG_FILE: &str = ".lti_config.yml";

pub const DEFAULT_TIMESTAMP_TOLERANCE_SECS: i64 = 300;
pub const DEFAULT_MAX_BODY_BYTES: usize = 100 * 1024;

impl LtiInfo {
    /// Construct the LtiInfo struct based on the contents of the config file `.lti_config.yml`
    /// present in the current user's home directory. Returns an enum error type that includes the
    /// error types of all crates used.
    pub fn from_default_file() -> Result<LtiInfo, ConfigReadError> {
        Self::from_config_section(&Self::config_section_from_default_file()?)
    }

    pub(crate) fn config_section_from_default_file() -> Result<ConfigFileSection, ConfigReadError> {
        let mut home = dirs::home_dir().ok_or(ConfigReadError::NoHomeDir)?;
        home.push(CONFIG_FILE);
        let config_data = std::fs::read_to_string(&home)?;
        ConfigFileSection::from_yaml(&config_data)
    }

    /// Construct the LtiInfo struct from a ConfigFileSection holding a static consumer key and
    /// secret. Fails with [`ConfigReadError::NoCredentials`] unless both are present.
    pub fn from_config_section(section: &ConfigFileSection) -> Result<LtiInfo, ConfigReadError> {
        let (Some(key), Some(secret)) = (&section.consumer_key, &section.consumer_secret) else {
            return Err(ConfigReadError::NoCredentials);
        };
        Self::build(section, Arc::new(StaticCredentials::new(key, secret)))
    }

    /// Construct the LtiInfo struct with a caller-supplied credential lookup. Any static pair
    /// in the section is ignored; the remaining options still apply.
    pub fn from_credentials_resolver(
        section: &ConfigFileSection,
        resolver: impl CredentialResolver + 'static,
    ) -> Result<LtiInfo, ConfigReadError> {
        Self::build(section, Arc::new(resolver))
    }

    fn build(
        section: &ConfigFileSection,
        credentials: Arc<dyn CredentialResolver>,
    ) -> Result<LtiInfo, ConfigReadError> {
        let timestamp_tolerance = section
            .timestamp_tolerance_secs
            .unwrap_or(DEFAULT_TIMESTAMP_TOLERANCE_SECS);
        if timestamp_tolerance < 0 {
            return Err(ConfigReadError::InvalidTolerance(timestamp_tolerance));
        }

        let nonce_expiry = timestamp_tolerance.saturating_mul(2);
        Ok(LtiInfo {
            credentials,
            nonce_store: Arc::new(MemoryNonceStore::with_expiry(nonce_expiry)),
            add_to_session: section.add_to_session.unwrap_or(true),
            trust_proxy: section.trust_proxy.unwrap_or(false),
            timestamp_tolerance,
            max_body_bytes: section.max_body_bytes.unwrap_or(DEFAULT_MAX_BODY_BYTES),
        })
    }
}

/// All of the configuration data needed to set up a LtiInfo struct. Implements Deserialize
/// to be read from a YAML file easily, or can be created manually.
#[derive(Deserialize, Clone, Default)]
pub struct ConfigFileSection {
    pub consumer_key: Option<String>,
    pub consumer_secret: Option<String>,
    /// Also write validated launches to the host session. Defaults to true.
    pub add_to_session: Option<bool>,
    /// Take the request scheme from `X-Forwarded-Proto` when rebuilding the signed URL.
    pub trust_proxy: Option<bool>,
    pub timestamp_tolerance_secs: Option<i64>,
    /// Largest form or JSON body buffered while looking for a launch. Defaults to 100 KiB.
    pub max_body_bytes: Option<usize>,
}

impl ConfigFileSection {
    /// Construct a section holding just a static consumer key and secret.
    pub fn with_consumer(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            consumer_key: Some(key.into()),
            consumer_secret: Some(secret.into()),
            ..Self::default()
        }
    }

    /// Read the `common` section of a YAML config document.
    pub fn from_yaml(config_data: &str) -> Result<ConfigFileSection, ConfigReadError> {
        let config_data_value: serde_yml::Value = serde_yml::from_str(config_data)?;
        let common_section = config_data_value
            .get("common")
            .ok_or(ConfigReadError::InvalidFile(None))?;
        let common_section_typed: ConfigFileSection =
            serde_yml::from_value(common_section.clone())?;
        Ok(common_section_typed)
    }
}

impl std::fmt::Debug for ConfigFileSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigFileSection")
            .field("consumer_key", &self.consumer_key)
            .field(
                "consumer_secret",
                &self.consumer_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("add_to_session", &self.add_to_session)
            .field("trust_proxy", &self.trust_proxy)
            .field("timestamp_tolerance_secs", &self.timestamp_tolerance_secs)
            .field("max_body_bytes", &self.max_body_bytes)
            .finish()
    }
}

/// All of the possible errors that can take place when attempting to read a config file or set
/// up the validator. Errors are specific to the libraries that created them, and include the
/// details from those libraries.
#[derive(Debug, Error)]
pub enum ConfigReadError {
    #[error("File Read Error: {0}")]
    FileReadError(#[from] io::Error),
    #[error("Not a valid LTI config file: {0:?}")]
    InvalidFile(Option<serde_yml::Error>),
    #[error("Unable to locate the home directory")]
    NoHomeDir,
    #[error("A consumer_key and consumer_secret must be present")]
    NoCredentials,
    #[error("Timestamp tolerance must not be negative, got {0}")]
    InvalidTolerance(i64),
}

impl From<serde_yml::Error> for ConfigReadError {
    fn from(err: serde_yml::Error) -> ConfigReadError {
        ConfigReadError::InvalidFile(Some(err))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::credentials::{ConsumerCredentials, CredentialError, RequestHead, resolve_with};

    #[test]
    fn missing_credentials_fail_at_setup() {
        let load_result = LtiInfo::from_config_section(&ConfigFileSection::default());
        assert!(matches!(load_result, Err(ConfigReadError::NoCredentials)));

        let key_only = ConfigFileSection {
            consumer_key: Some("key".to_string()),
            ..Default::default()
        };
        let load_result = LtiInfo::from_config_section(&key_only);
        assert!(matches!(load_result, Err(ConfigReadError::NoCredentials)));

        let secret_only = ConfigFileSection {
            consumer_secret: Some("key".to_string()),
            ..Default::default()
        };
        let load_result = LtiInfo::from_config_section(&secret_only);
        assert!(matches!(load_result, Err(ConfigReadError::NoCredentials)));
    }

    #[test]
    fn defaults_are_applied() {
        let info = LtiInfo::from_config_section(&ConfigFileSection::with_consumer("key", "secret"))
            .unwrap();
        assert!(info.add_to_session);
        assert!(!info.trust_proxy);
        assert_eq!(info.timestamp_tolerance, DEFAULT_TIMESTAMP_TOLERANCE_SECS);
        assert_eq!(info.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
    }

    #[test]
    fn huge_tolerance_does_not_overflow() {
        let section = ConfigFileSection {
            timestamp_tolerance_secs: Some(i64::MAX),
            max_body_bytes: Some(16),
            ..ConfigFileSection::with_consumer("key", "secret")
        };
        let info = LtiInfo::from_config_section(&section).unwrap();
        assert_eq!(info.timestamp_tolerance, i64::MAX);
        assert_eq!(info.max_body_bytes, 16);
    }

    #[test]
    fn resolver_needs_no_static_pair() {
        let resolver = resolve_with(|_key: Option<String>, _head: RequestHead| async {
            Ok::<_, CredentialError>(ConsumerCredentials::new("key", "secret"))
        });
        let section = ConfigFileSection {
            add_to_session: Some(false),
            ..Default::default()
        };
        let info = LtiInfo::from_credentials_resolver(&section, resolver).unwrap();
        assert!(!info.adds_to_session());
    }

    #[test]
    fn negative_tolerance_returns_right_error() {
        let section = ConfigFileSection {
            timestamp_tolerance_secs: Some(-1),
            ..ConfigFileSection::with_consumer("key", "secret")
        };
        assert!(matches!(
            LtiInfo::from_config_section(&section),
            Err(ConfigReadError::InvalidTolerance(-1))
        ));
    }

    #[test]
    fn parses_common_section() {
        let yaml = "common: &common\n  consumer_key: key\n  consumer_secret: secret\n  add_to_session: false\n  trust_proxy: true\n";
        let section = ConfigFileSection::from_yaml(yaml).unwrap();
        assert_eq!(section.consumer_key.as_deref(), Some("key"));
        assert_eq!(section.add_to_session, Some(false));
        assert_eq!(section.trust_proxy, Some(true));
        assert_eq!(section.timestamp_tolerance_secs, None);
        assert!(!format!("{section:?}").contains("\"secret\""));
    }

    #[test]
    fn missing_common_section_returns_right_error() {
        let load_result = ConfigFileSection::from_yaml("production:\n  consumer_key: key\n");
        assert!(matches!(load_result, Err(ConfigReadError::InvalidFile(None))));
        let load_result = ConfigFileSection::from_yaml("common: [unclosed");
        assert!(matches!(load_result, Err(ConfigReadError::InvalidFile(Some(_)))));
    }
}
