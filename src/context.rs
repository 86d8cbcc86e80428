use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MESSAGE_TYPE_PARAM: &str = "lti_message_type";

/// The launch message types this layer validates. Any other `lti_message_type` is treated
/// as an ordinary request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LtiMessageType {
    BasicLaunch,
    ContentItemSelection,
}

impl LtiMessageType {
    pub const ALL: [LtiMessageType; 2] = [
        LtiMessageType::BasicLaunch,
        LtiMessageType::ContentItemSelection,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LtiMessageType::BasicLaunch => "basic-lti-launch-request",
            LtiMessageType::ContentItemSelection => "ContentItemSelectionRequest",
        }
    }

    pub fn from_param(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == value)
    }
}

/// Body parameters of a launch. Names may repeat, and form bodies keep the order they were
/// sent in.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LaunchParams(Vec<(String, String)>);

impl LaunchParams {
    /// Parse an `application/x-www-form-urlencoded` body.
    pub fn from_form(body: &[u8]) -> Self {
        Self(form_urlencoded::parse(body).into_owned().collect())
    }

    /// Parse a JSON body. Only a top level object counts as a structured body.
    ///
    /// Scalars keep their textual form, arrays become repeated names, `null` becomes an empty
    /// value and nested objects are kept as compact JSON text.
    pub fn from_json(body: &[u8]) -> Option<Self> {
        let Value::Object(map) = serde_json::from_slice::<Value>(body).ok()? else {
            return None;
        };
        let mut pairs = Vec::with_capacity(map.len());
        for (name, value) in map {
            match value {
                Value::Array(items) => {
                    for item in items {
                        pairs.push((name.clone(), json_text(item)));
                    }
                }
                other => pairs.push((name, json_text(other))),
            }
        }
        Some(Self(pairs))
    }

    /// First value sent under `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn message_type(&self) -> Option<LtiMessageType> {
        self.get(MESSAGE_TYPE_PARAM).and_then(LtiMessageType::from_param)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn as_pairs(&self) -> &[(String, String)] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<(String, String)>> for LaunchParams {
    fn from(pairs: Vec<(String, String)>) -> Self {
        Self(pairs)
    }
}

fn json_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// A validated launch. Inserted into the request extensions, and into the session when the
/// layer is configured to do so.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LtiContext {
    pub key: String,
    pub secret: String,
    pub params: LaunchParams,
}

impl LtiContext {
    pub fn message_type(&self) -> Option<LtiMessageType> {
        self.params.message_type()
    }
}

impl std::fmt::Debug for LtiContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LtiContext")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .field("params", &self.params)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn recognizes_only_allow_listed_message_types() {
        assert_eq!(
            LtiMessageType::from_param("basic-lti-launch-request"),
            Some(LtiMessageType::BasicLaunch)
        );
        assert_eq!(
            LtiMessageType::from_param("ContentItemSelectionRequest"),
            Some(LtiMessageType::ContentItemSelection)
        );
        assert_eq!(LtiMessageType::from_param("someWeirdUnsupportedMessageType"), None);
        assert_eq!(LtiMessageType::from_param("Basic-LTI-Launch-Request"), None);
    }

    #[test]
    fn form_body_keeps_order_and_repeats() {
        let params = LaunchParams::from_form(b"roles=Learner&lti_message_type=basic-lti-launch-request&roles=Mentor&name=A+B");
        assert_eq!(params.len(), 4);
        assert_eq!(params.get("roles"), Some("Learner"));
        assert_eq!(params.get("name"), Some("A B"));
        assert_eq!(params.message_type(), Some(LtiMessageType::BasicLaunch));
    }

    #[test]
    fn json_body_flattens_values() {
        let params = LaunchParams::from_json(
            br#"{"oauth_timestamp": 1700000000, "roles": ["Learner", "Mentor"], "custom": null, "flag": true, "ext": {"a": 1}}"#,
        )
        .unwrap();
        assert_eq!(params.get("oauth_timestamp"), Some("1700000000"));
        assert_eq!(
            params.iter().filter(|(n, _)| *n == "roles").count(),
            2
        );
        assert_eq!(params.get("custom"), Some(""));
        assert_eq!(params.get("flag"), Some("true"));
        assert_eq!(params.get("ext"), Some(r#"{"a":1}"#));
        assert_eq!(params.message_type(), None);
    }

    #[test]
    fn non_object_json_is_not_structured() {
        assert!(LaunchParams::from_json(b"[1, 2]").is_none());
        assert!(LaunchParams::from_json(b"\"text\"").is_none());
        assert!(LaunchParams::from_json(b"not json").is_none());
    }

    #[test]
    fn context_debug_hides_secret() {
        let context = LtiContext {
            key: "key".to_string(),
            secret: "hunter2".to_string(),
            params: LaunchParams::default(),
        };
        assert!(!format!("{context:?}").contains("hunter2"));
    }
}
