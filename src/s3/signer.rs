//! AWS Signature Version 4 request authentication
//!
//! `Authentication` is an immutable value: signing depends only on its
//! arguments, the stored credentials and the timestamp handed in, so the
//! same inputs always produce the same headers.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Hex lookup table for zero-allocation percent encoding
static HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

/// SHA256 of an empty payload
pub const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

const SERVICE: &str = "s3";
const REDACTED: &str = "********";

/// Signing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing credential: {0} must be a non-empty string")]
    MissingCredential(&'static str),

    #[error("Header {name} cannot be signed: invalid name or value")]
    InvalidHeader { name: String },
}

/// Credentials and region used to sign S3 requests
#[derive(Clone, PartialEq, Eq)]
pub struct Authentication {
    key: String,
    secret: String,
    region: String,
}

impl Authentication {
    /// Algorithm to sign the request with
    pub const ALGORITHM: &'static str = "AWS4-HMAC-SHA256";

    /// Date header to sign the request with
    pub const DATE_HEADER: &'static str = "X-Amz-Date";

    /// Header carrying the payload hash
    pub const CONTENT_SHA256_HEADER: &'static str = "X-Amz-Content-Sha256";

    pub fn new(
        key: impl Into<String>,
        secret: impl Into<String>,
        region: impl Into<String>,
    ) -> Result<Self, AuthError> {
        let key = key.into();
        let secret = secret.into();
        let region = region.into();

        if key.trim().is_empty() {
            return Err(AuthError::MissingCredential("access key"));
        }
        if secret.trim().is_empty() {
            return Err(AuthError::MissingCredential("secret key"));
        }
        if region.trim().is_empty() {
            return Err(AuthError::MissingCredential("region"));
        }

        Ok(Self { key, secret, region })
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Sign a request at the current time.
    ///
    /// `path` must already be URI-encoded and `query` is the raw query string
    /// without the leading `?`. Returns the complete header set to send:
    /// the caller's headers (lowercased) plus `x-amz-date`,
    /// `x-amz-content-sha256` and `authorization`.
    pub fn sign(
        &self,
        method: &str,
        path: &str,
        query: &str,
        headers: BTreeMap<String, String>,
        payload_hash: &str,
    ) -> Result<BTreeMap<String, String>, AuthError> {
        self.sign_at(method, path, query, headers, payload_hash, Utc::now())
    }

    /// Sign a request for an explicit timestamp
    pub fn sign_at(
        &self,
        method: &str,
        path: &str,
        query: &str,
        headers: BTreeMap<String, String>,
        payload_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<BTreeMap<String, String>, AuthError> {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();

        let mut canonical = BTreeMap::new();
        for (name, value) in headers {
            let name = name.trim().to_ascii_lowercase();
            if !is_valid_header_name(&name) || value.chars().any(|c| c.is_control() && c != '\t') {
                return Err(AuthError::InvalidHeader { name });
            }
            canonical.insert(name, value);
        }
        canonical.insert("x-amz-date".to_string(), amz_date.clone());
        canonical.insert("x-amz-content-sha256".to_string(), payload_hash.to_string());

        let canonical_path = if path.is_empty() { "/" } else { path };
        let canonical_query = create_canonical_query_string(query);
        let canonical_headers = create_canonical_headers(&canonical);
        let signed_headers = create_signed_headers(&canonical);

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method, canonical_path, canonical_query, canonical_headers, signed_headers, payload_hash
        );

        let credential_scope = format!("{}/{}/{}/aws4_request", date_stamp, self.region, SERVICE);
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            Self::ALGORITHM,
            amz_date,
            credential_scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signing_key = self.derive_signing_key(&date_stamp);
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        let authorization = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            Self::ALGORITHM,
            self.key,
            credential_scope,
            signed_headers,
            signature
        );
        canonical.insert("authorization".to_string(), authorization);

        Ok(canonical)
    }

    /// Derive signing key from date stamp (4 chained HMAC operations)
    fn derive_signing_key(&self, date_stamp: &str) -> [u8; 32] {
        let aws4_key = format!("AWS4{}", self.secret);
        let k_date = hmac_sha256(aws4_key.as_bytes(), date_stamp.as_bytes());
        let k_region = hmac_sha256(&k_date, self.region.as_bytes());
        let k_service = hmac_sha256(&k_region, SERVICE.as_bytes());
        hmac_sha256(&k_service, b"aws4_request")
    }
}

impl fmt::Debug for Authentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authentication")
            .field("key", &REDACTED)
            .field("secret", &REDACTED)
            .field("region", &self.region)
            .finish()
    }
}

/// Hex SHA256 of a request payload
pub fn payload_hash(payload: &[u8]) -> String {
    if payload.is_empty() {
        EMPTY_SHA256.to_string()
    } else {
        hex::encode(Sha256::digest(payload))
    }
}

/// URI encode a string (RFC 3986) using hex lookup table
pub fn uri_encode(s: &str, encode_slash: bool) -> String {
    let mut result = String::with_capacity(s.len() + 16);
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            b'/' if !encode_slash => {
                result.push('/');
            }
            _ => {
                result.push('%');
                result.push(HEX_UPPER[(byte >> 4) as usize] as char);
                result.push(HEX_UPPER[(byte & 0xf) as usize] as char);
            }
        }
    }
    result
}

fn is_valid_header_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
}

/// Canonical query string: decode, re-encode, sort by name
fn create_canonical_query_string(query: &str) -> String {
    if query.is_empty() {
        return String::new();
    }

    let mut params: Vec<(String, String)> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = urlencoding::decode(key).unwrap_or_else(|_| key.into());
            let value = urlencoding::decode(value).unwrap_or_else(|_| value.into());
            (uri_encode(&key, true), uri_encode(&value, true))
        })
        .collect();

    params.sort_unstable();

    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Canonical headers: `name:value\n`, values trimmed with inner runs of
/// spaces collapsed
fn create_canonical_headers(headers: &BTreeMap<String, String>) -> String {
    let mut result = String::with_capacity(headers.len() * 64);
    for (k, v) in headers {
        result.push_str(k);
        result.push(':');
        result.push_str(&v.split_whitespace().collect::<Vec<_>>().join(" "));
        result.push('\n');
    }
    result
}

fn create_signed_headers(headers: &BTreeMap<String, String>) -> String {
    headers.keys().map(String::as_str).collect::<Vec<_>>().join(";")
}

/// HMAC-SHA256 returning fixed-size array
fn hmac_sha256(key: &[u8], msg: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(msg);
    let result = mac.finalize().into_bytes();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}
