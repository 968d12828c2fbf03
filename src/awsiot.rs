//! AWS IoT Device Gateway WebSocket URL signing
//!
//! Builds a SigV4 query-string-signed `wss://` URL for the gateway's
//! `/mqtt` endpoint: canonical request over `GET /mqtt` with the `host`
//! header signed and the empty-payload SHA-256, algorithm
//! `AWS4-HMAC-SHA256`, credential scope
//! `<date>/<region>/iotdevicegateway/aws4_request`. The caller supplies
//! resolved credentials and the account endpoint; the signing timestamp
//! must be within five minutes of AWS clock time.

use crate::error::{ProxyError, Result};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use time::macros::format_description;
use time::OffsetDateTime;
use url::form_urlencoded::byte_serialize;
use url::Url;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE_NAME: &str = "iotdevicegateway";
const PATH: &str = "/mqtt";
/// SHA-256 of the empty string; WebSocket handshakes carry no payload.
const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Resolved AWS credentials
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl Credentials {
    #[must_use]
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    #[must_use]
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }
}

/// Builds the signed `wss://` URL for the given gateway endpoint.
///
/// # Errors
///
/// Returns an error if the timestamp cannot be formatted or the assembled
/// URL does not parse.
pub fn websocket_url(
    endpoint: &str,
    region: &str,
    credentials: &Credentials,
    at: OffsetDateTime,
) -> Result<Url> {
    let date_long = at
        .format(format_description!(
            "[year][month][day]T[hour][minute][second]Z"
        ))
        .map_err(|err| ProxyError::InvalidUrl(format!("timestamp: {err}")))?;
    let date_short = &date_long[..8];

    let scope = format!("{date_short}/{region}/{SERVICE_NAME}/aws4_request");
    let query = canonical_query(&[
        ("X-Amz-Algorithm", ALGORITHM.to_string()),
        (
            "X-Amz-Credential",
            format!("{}/{scope}", credentials.access_key_id),
        ),
        ("X-Amz-Date", date_long.clone()),
        ("X-Amz-SignedHeaders", "host".to_string()),
    ]);

    let string_to_sign = string_to_sign(&query, endpoint, &date_long, &scope);
    let key = signing_key(&credentials.secret_access_key, date_short, region);
    let signature = hex(&hmac_sha256(&key, string_to_sign.as_bytes()));

    let mut signed = format!("wss://{endpoint}{PATH}?{query}&X-Amz-Signature={signature}");
    if let Some(token) = &credentials.session_token {
        signed.push_str("&X-Amz-Security-Token=");
        signed.push_str(&query_escape(token));
    }

    Url::parse(&signed).map_err(|err| ProxyError::InvalidUrl(format!("{signed}: {err}")))
}

/// Renders `key=value` pairs in the given order, values query-escaped.
fn canonical_query(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{key}={}", query_escape(value)))
        .collect::<Vec<_>>()
        .join("&")
}

fn string_to_sign(query: &str, host: &str, date_long: &str, scope: &str) -> String {
    let host_header = format!("host:{host}");
    let canonical_request = [
        "GET",
        PATH,
        query,
        host_header.as_str(),
        "",
        "host",
        EMPTY_PAYLOAD_SHA256,
    ]
    .join("\n");

    let request_hash = sha256_hex(&canonical_request);
    [ALGORITHM, date_long, scope, request_hash.as_str()].join("\n")
}

/// Derives the SigV4 signing key: HMAC chain over date, region, service.
fn signing_key(secret_key: &str, date_short: &str, region: &str) -> Vec<u8> {
    let key = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date_short.as_bytes());
    let key = hmac_sha256(&key, region.as_bytes());
    let key = hmac_sha256(&key, SERVICE_NAME.as_bytes());
    hmac_sha256(&key, b"aws4_request")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn sha256_hex(input: &str) -> String {
    hex(&Sha256::digest(input.as_bytes()))
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn query_escape(value: &str) -> String {
    byte_serialize(value.as_bytes()).collect()
}
