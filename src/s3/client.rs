//! S3 storage facade: bucket and object lifecycle over a `Transport`
//!
//! - Path-style addressing (`{endpoint}/{bucket}/{key}`)
//! - Optional default bucket substituted for blank bucket arguments
//! - Idempotent bucket create (409) and delete (404)
//! - Registry of buckets and keys created through this instance
//! - Optional retry with jitter for 429/503 and transport failures

use crate::config::Profile;
use crate::s3::outcome::{Operation, Outcome};
use crate::s3::signer::{uri_encode, AuthError, Authentication};
use crate::s3::types::{DirectoryEntries, ObjectOutput, ObjectRegistry};
use crate::transport::{Connection, Request, Response, Transport, TransportError};
use bytes::Bytes;
use hyper::{Method, StatusCode};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Content type used for directory uploads
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Region that takes no `LocationConstraint` on bucket creation
const DEFAULT_REGION: &str = "us-east-1";

/// S3 client errors
#[derive(Error, Debug)]
pub enum S3Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No bucket name given and no default bucket configured")]
    MissingBucket,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("S3 error: {status} {code} - {message}")]
    S3Response {
        status: StatusCode,
        code: String,
        message: String,
        request_id: Option<String>,
    },

    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl From<AuthError> for S3Error {
    fn from(err: AuthError) -> Self {
        S3Error::Config(err.to_string())
    }
}

impl S3Error {
    /// Build a service error from a failed response, reading the S3 XML
    /// error document when there is one
    pub fn from_response(response: &Response) -> Self {
        let status = response.status();
        let fallback_code = || format!("HTTP{}", status.as_u16());

        match response.xml() {
            Ok(xml) => S3Error::S3Response {
                status,
                code: xml.child_text("Code").map(str::to_owned).unwrap_or_else(fallback_code),
                message: xml
                    .child_text("Message")
                    .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error"))
                    .to_string(),
                request_id: xml.child_text("RequestId").map(str::to_owned),
            },
            Err(_) => {
                let body = response.text();
                let message = if body.trim().is_empty() {
                    status.canonical_reason().unwrap_or("Unknown error").to_string()
                } else {
                    body
                };
                S3Error::S3Response {
                    status,
                    code: fallback_code(),
                    message,
                    request_id: None,
                }
            }
        }
    }

    /// HTTP status of a service error
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            S3Error::S3Response { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }

    /// Errors raised before any network activity
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            S3Error::Config(_) | S3Error::MissingBucket | S3Error::Transport(TransportError::InvalidEndpoint(_))
        )
    }
}

pub type Result<T> = std::result::Result<T, S3Error>;

/// Backoff jitter factor in `[0, 1)`, taken from the clock's sub-second
/// nanoseconds. Retries only need spread, not unpredictability.
fn rand_jitter() -> f64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}

/// Escape XML special characters into an existing buffer
fn xml_escape_into(buf: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '&' => buf.push_str("&amp;"),
            '<' => buf.push_str("&lt;"),
            '>' => buf.push_str("&gt;"),
            '"' => buf.push_str("&quot;"),
            '\'' => buf.push_str("&apos;"),
            _ => buf.push(c),
        }
    }
}

/// S3 bucket/object client.
///
/// Single owner: every call takes `&mut self` and blocks until its
/// exchange completes.
#[derive(Debug)]
pub struct S3Client<T: Transport = Connection> {
    auth: Authentication,
    transport: T,
    bucket_name: String,
    objects: ObjectRegistry,
    max_retries: u32,
}

impl S3Client<Connection> {
    /// Create a client for an endpoint.
    ///
    /// Credentials and endpoint are validated here; nothing touches the
    /// network until the first operation.
    pub fn new(key: &str, secret: &str, endpoint: &str, region: &str) -> Result<Self> {
        let auth = Authentication::new(key, secret, region)?;
        let connection = Connection::new(endpoint).map_err(|e| S3Error::Config(e.to_string()))?;
        Ok(Self::with_transport(auth, connection))
    }

    /// Create a client from a configuration profile
    pub fn from_profile(profile: &Profile) -> Result<Self> {
        let region = profile.resolve_region().ok_or_else(|| {
            S3Error::Config("region is not set and regional discovery found none".to_string())
        })?;
        let auth = Authentication::new(profile.key.as_str(), profile.secret.as_str(), region)?;
        let connection = Connection::with_options(&profile.endpoint, profile.connection_options())
            .map_err(|e| S3Error::Config(e.to_string()))?;

        let mut client = Self::with_transport(auth, connection).with_max_retries(profile.max_retries);
        if let Some(bucket) = &profile.bucket_name {
            client.set_bucket_name(bucket);
        }
        Ok(client)
    }
}

impl<T: Transport> S3Client<T> {
    pub fn with_transport(auth: Authentication, transport: T) -> Self {
        Self {
            auth,
            transport,
            bucket_name: String::new(),
            objects: ObjectRegistry::new(),
            max_retries: 0,
        }
    }

    /// Set the default bucket
    pub fn with_bucket(mut self, bucket_name: &str) -> Self {
        self.bucket_name = bucket_name.to_string();
        self
    }

    /// Retry 429/503 responses and transport failures up to `max_retries` times
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the default bucket used when an operation is given no bucket
    pub fn set_bucket_name(&mut self, bucket_name: &str) -> &mut Self {
        self.bucket_name = bucket_name.to_string();
        self
    }

    pub fn bucket_name(&self) -> &str {
        &self.bucket_name
    }

    pub fn authentication(&self) -> &Authentication {
        &self.auth
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Buckets and keys created through this client
    pub fn objects(&self) -> &IndexMap<String, Vec<String>> {
        self.objects.as_map()
    }

    /// Record a key created outside of `put_*`
    pub fn add_object_key(&mut self, bucket: Option<&str>, key: &str) -> Result<()> {
        let bucket = self.resolve_bucket(bucket)?;
        self.objects.register_key(&bucket, key);
        Ok(())
    }

    pub fn bucket_exists(&mut self, bucket: Option<&str>) -> Result<bool> {
        let bucket = self.resolve_bucket(bucket)?;
        let response = self.send(Request::new(Method::HEAD, uri_encode(&bucket, true)))?;

        match self.check(Operation::BucketExists, &response)? {
            Outcome::NotFound => Ok(false),
            _ => Ok(true),
        }
    }

    pub fn object_exists(&mut self, key: &str, bucket: Option<&str>) -> Result<bool> {
        let bucket = self.resolve_bucket(bucket)?;
        let response = self.send(Request::new(Method::HEAD, object_path(&bucket, key)?))?;

        match self.check(Operation::ObjectExists, &response)? {
            Outcome::NotFound => Ok(false),
            _ => Ok(true),
        }
    }

    /// Create a bucket; succeeds without error if it already exists
    pub fn create_bucket(&mut self, bucket: Option<&str>) -> Result<()> {
        let bucket = self.resolve_bucket(bucket)?;
        let mut request = Request::new(Method::PUT, uri_encode(&bucket, true));

        if self.auth.region() != DEFAULT_REGION {
            let mut xml = String::with_capacity(160);
            xml.push_str("<CreateBucketConfiguration xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">");
            xml.push_str("<LocationConstraint>");
            xml_escape_into(&mut xml, self.auth.region());
            xml.push_str("</LocationConstraint></CreateBucketConfiguration>");
            request = request.with_content_type("application/xml").with_body(xml);
        }

        let response = self.send(request)?;
        match self.check(Operation::CreateBucket, &response)? {
            Outcome::AlreadyExists => debug!(bucket = %bucket, "bucket already exists"),
            _ => info!(bucket = %bucket, "bucket created"),
        }

        self.objects.register_bucket(&bucket);
        Ok(())
    }

    /// Upload inline content
    pub fn put_object(
        &mut self,
        content: impl Into<Bytes>,
        key: &str,
        content_type: &str,
        bucket: Option<&str>,
    ) -> Result<()> {
        let bucket = self.resolve_bucket(bucket)?;
        let request = Request::new(Method::PUT, object_path(&bucket, key)?)
            .with_content_type(content_type)
            .with_body(content);

        let response = self.send(request)?;
        self.check(Operation::PutObject, &response)?;

        debug!(bucket = %bucket, key = %key, "object uploaded");
        self.objects.register_key(&bucket, key);
        Ok(())
    }

    /// Upload the contents of a local file
    pub fn put_file(
        &mut self,
        file_path: impl AsRef<Path>,
        key: &str,
        content_type: &str,
        bucket: Option<&str>,
    ) -> Result<()> {
        let file_path = file_path.as_ref();
        let content = std::fs::read(file_path).map_err(|source| S3Error::Io {
            path: file_path.to_path_buf(),
            source,
        })?;

        self.put_object(content, key, content_type, bucket)
    }

    /// Upload every regular file below `path`, keyed by its relative path
    /// behind the optional `prefix`. Returns the uploaded keys in order.
    pub fn put_directory(
        &mut self,
        path: impl AsRef<Path>,
        prefix: Option<&str>,
        bucket: Option<&str>,
    ) -> Result<Vec<String>> {
        let path = path.as_ref();
        let bucket = self.resolve_bucket(bucket)?;
        let io_error = |source| S3Error::Io {
            path: path.to_path_buf(),
            source,
        };

        let entries = DirectoryEntries::new(path, prefix).map_err(io_error)?;

        let mut keys = Vec::new();
        for entry in entries {
            let (file, key) = entry.map_err(io_error)?;
            self.put_file(&file, &key, DEFAULT_CONTENT_TYPE, Some(&bucket))?;
            keys.push(key);
        }

        info!(bucket = %bucket, files = keys.len(), dir = %path.display(), "directory uploaded");
        Ok(keys)
    }

    /// Fetch an object with its metadata
    pub fn get_object(&mut self, key: &str, bucket: Option<&str>) -> Result<ObjectOutput> {
        let bucket = self.resolve_bucket(bucket)?;
        let response = self.send(Request::new(Method::GET, object_path(&bucket, key)?))?;
        self.check(Operation::GetObject, &response)?;

        Ok(ObjectOutput::from(response))
    }

    /// Fetch an object's content
    pub fn get_object_content(&mut self, key: &str, bucket: Option<&str>) -> Result<Bytes> {
        Ok(self.get_object(key, bucket)?.body)
    }

    /// Delete a bucket; returns false if it does not exist
    pub fn delete_bucket(&mut self, bucket: Option<&str>) -> Result<bool> {
        let bucket = self.resolve_bucket(bucket)?;
        let response = self.send(Request::new(Method::DELETE, uri_encode(&bucket, true)))?;
        let outcome = self.check(Operation::DeleteBucket, &response)?;

        self.objects.remove_bucket(&bucket);
        if outcome == Outcome::NotFound {
            debug!(bucket = %bucket, "bucket does not exist");
            return Ok(false);
        }

        info!(bucket = %bucket, "bucket deleted");
        Ok(true)
    }

    /// Delete an object; returns false without a delete request if it does
    /// not exist
    pub fn delete_object(&mut self, key: &str, bucket: Option<&str>) -> Result<bool> {
        let bucket = self.resolve_bucket(bucket)?;

        if !self.object_exists(key, Some(&bucket))? {
            self.objects.remove_key(&bucket, key);
            return Ok(false);
        }

        let response = self.send(Request::new(Method::DELETE, object_path(&bucket, key)?))?;
        let outcome = self.check(Operation::DeleteObject, &response)?;

        self.objects.remove_key(&bucket, key);
        Ok(outcome != Outcome::NotFound)
    }

    fn resolve_bucket(&self, bucket: Option<&str>) -> Result<String> {
        match bucket.map(str::trim).filter(|b| !b.is_empty()) {
            Some(bucket) => Ok(bucket.to_string()),
            None if !self.bucket_name.trim().is_empty() => Ok(self.bucket_name.trim().to_string()),
            None => Err(S3Error::MissingBucket),
        }
    }

    /// Map a response through the status table, turning failures into errors
    fn check(&self, operation: Operation, response: &Response) -> Result<Outcome> {
        match operation.classify(response.status()) {
            Outcome::Failed => Err(S3Error::from_response(response)),
            outcome => Ok(outcome),
        }
    }

    /// Execute one request, retrying 429/503 and transport failures with
    /// exponential backoff when retries are enabled
    fn send(&mut self, request: Request) -> Result<Response> {
        let mut attempt = 0;

        loop {
            let result = self.transport.execute(request.clone(), &self.auth);

            let retryable = match &result {
                Ok(response) => matches!(
                    response.status(),
                    StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE
                ),
                Err(TransportError::Failure { .. }) => true,
                Err(_) => false,
            };

            if !retryable || attempt >= self.max_retries {
                return Ok(result?);
            }

            let base_ms = 100u64 * (1 << attempt.min(6));
            let jitter = (base_ms as f64 * 0.2 * rand_jitter()) as u64;
            warn!(
                method = %request.method,
                path = %request.path,
                attempt = attempt + 1,
                max_retries = self.max_retries,
                "retrying S3 request"
            );
            std::thread::sleep(Duration::from_millis(base_ms + jitter));
            attempt += 1;
        }
    }
}

/// Path of an object relative to the endpoint, preserving `/` in the key
fn object_path(bucket: &str, key: &str) -> Result<String> {
    if key.is_empty() {
        return Err(S3Error::Config("object key cannot be empty".to_string()));
    }
    Ok(format!("{}/{}", uri_encode(bucket, true), uri_encode(key, false)))
}
