//! HTTP transport for S3 requests
//!
//! This module provides:
//! - `Connection`: one reusable hyper client bound to a validated endpoint
//! - `Response`: the status, headers and body of one completed exchange
//! - `XmlElement`: on-demand XML decoding of response bodies
//! - `Transport`: the seam the storage facade executes requests through

pub mod connection;
pub mod response;
pub mod xml;

pub use connection::{Connection, ConnectionOptions};
pub use response::Response;
pub use xml::XmlElement;

use crate::s3::signer::{AuthError, Authentication};
use bytes::Bytes;
use hyper::Method;
use std::collections::BTreeMap;
use thiserror::Error;

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Invalid endpoint URL: {0}")]
    InvalidEndpoint(String),

    #[error("Failed to execute request to {url}: {message}")]
    Failure { url: String, message: String },

    #[error("Invalid XML response: {0}")]
    InvalidXml(String),

    #[error("Request signing failed: {0}")]
    Signing(#[from] AuthError),

    #[error("Request build error: {0}")]
    Request(#[from] hyper::http::Error),

    #[error("Runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}

impl TransportError {
    pub(crate) fn failure(url: impl Into<String>, message: impl ToString) -> Self {
        TransportError::Failure {
            url: url.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// One request against a path relative to the endpoint
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    /// URI-encoded path relative to the endpoint (`bucket` or `bucket/key`)
    pub path: String,
    /// Raw query string without the leading `?`. The storage facade only
    /// addresses plain buckets and keys; sub-resource requests built
    /// directly against a `Transport` (`?tagging`, `?acl`) set it, and
    /// `Connection` signs it as sent.
    pub query: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            headers: BTreeMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_content_type(self, content_type: &str) -> Self {
        self.with_header("content-type", content_type)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    /// Set the raw query string, e.g. `tagging=` or `prefix=logs%2F`
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }
}

/// Executes signed requests and returns the completed exchange.
///
/// Implementations perform one round trip per call and never retry.
pub trait Transport {
    fn execute(&mut self, request: Request, auth: &Authentication) -> Result<Response>;
}
