//! Response from one completed HTTP exchange

use crate::transport::{Result, TransportError, XmlElement};
use bytes::Bytes;
use hyper::header::HeaderMap;
use hyper::StatusCode;

/// Status, headers and body of a single exchange.
///
/// `url` is the final URL after any redirects were followed.
#[derive(Debug, Clone)]
pub struct Response {
    url: String,
    body: Bytes,
    status: StatusCode,
    headers: HeaderMap,
}

impl Response {
    pub fn new(
        url: impl Into<String>,
        body: impl Into<Bytes>,
        status: StatusCode,
        headers: HeaderMap,
    ) -> Self {
        Self {
            url: url.into(),
            body: body.into(),
            status,
            headers,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }

    /// Body as text, replacing invalid UTF-8 sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Header value by case-insensitive name, if present and valid text
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Parse the body as XML (the format of S3 metadata and error payloads).
    ///
    /// Parser state lives only for the duration of this call; a failure
    /// carries the parser diagnostic and leaves nothing behind.
    pub fn xml(&self) -> Result<XmlElement> {
        XmlElement::parse(&self.body).map_err(TransportError::InvalidXml)
    }
}
