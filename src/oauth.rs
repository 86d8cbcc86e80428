//! The slice of OAuth 1.0a (RFC 5849) that LTI 1.x launches rely on: HMAC-SHA1 signatures
//! computed from a consumer secret, with an empty token secret.
//!
//! The layer uses these functions internally. They are public so tool consumers and tests
//! can sign launches the same way a platform would.

use base64::Engine;
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use sha1::Sha1;
use url::Url;

type HmacSha1 = Hmac<Sha1>;

pub const SIGNATURE_METHOD: &str = "HMAC-SHA1";
pub const SIGNATURE_PARAM: &str = "oauth_signature";

// RFC 3986 unreserved characters are the only ones left as-is
const OAUTH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encode a string the way OAuth 1.0a requires.
pub fn encode(value: &str) -> String {
    utf8_percent_encode(value, OAUTH_ENCODE_SET).to_string()
}

/// The base string URI: lowercase scheme and host, non-default port, path, no query.
pub fn base_string_uri(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    match url.port() {
        Some(port) => format!("{}://{}:{}{}", url.scheme(), host, port, url.path()),
        None => format!("{}://{}{}", url.scheme(), host, url.path()),
    }
}

/// Encode, sort and join the request parameters, leaving out any `oauth_signature`.
pub fn normalize_parameters<'a>(params: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let mut encoded: Vec<(String, String)> = params
        .into_iter()
        .filter(|(name, _)| *name != SIGNATURE_PARAM)
        .map(|(name, value)| (encode(name), encode(value)))
        .collect();
    encoded.sort();
    encoded
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Build the signature base string for a request. Query parameters of `url` are signed along
/// with `body_params`.
pub fn base_string(method: &str, url: &Url, body_params: &[(String, String)]) -> String {
    let query_params: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    let all_params = query_params
        .iter()
        .chain(body_params.iter())
        .map(|(name, value)| (name.as_str(), value.as_str()));
    format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        encode(&base_string_uri(url)),
        encode(&normalize_parameters(all_params))
    )
}

fn mac_for(consumer_secret: &str, base_string: &str) -> HmacSha1 {
    let key = format!("{}&", encode(consumer_secret));
    // HMAC takes keys of any length, so this cannot fail
    let mut mac = HmacSha1::new_from_slice(key.as_bytes()).expect("HMAC accepts any key length");
    mac.update(base_string.as_bytes());
    mac
}

/// Compute the base64 HMAC-SHA1 signature of a base string.
pub fn build_signature(base_string: &str, consumer_secret: &str) -> String {
    let digest = mac_for(consumer_secret, base_string).finalize().into_bytes();
    base64::engine::general_purpose::STANDARD.encode(digest)
}

/// Check a base64 signature against a base string in constant time.
pub fn verify_signature(base_string: &str, consumer_secret: &str, signature: &str) -> bool {
    match base64::engine::general_purpose::STANDARD.decode(signature.trim()) {
        Ok(raw) => mac_for(consumer_secret, base_string)
            .verify_slice(&raw)
            .is_ok(),
        Err(_) => false,
    }
}

/// Sign a launch as a tool consumer would, returning the value for `oauth_signature`.
///
/// `params` are the form parameters that will be posted, including the `oauth_*` fields.
pub fn sign_launch(
    method: &str,
    url: &Url,
    params: &[(String, String)],
    consumer_secret: &str,
) -> String {
    build_signature(&base_string(method, url, params), consumer_secret)
}
