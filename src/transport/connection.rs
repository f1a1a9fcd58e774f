//! Blocking HTTP connection bound to one S3 endpoint
//!
//! Built on the hyper legacy client with:
//! - HTTP/1.1 only, TCP_NODELAY, 90s keepalive
//! - native-tls (OpenSSL) for TLS
//! - At most one idle pooled connection, reused across requests
//! - Redirect following capped at `max_redirects` hops
//!
//! Each `execute` call drives a private current-thread tokio runtime until
//! the exchange completes, so callers see a plain blocking API.

use crate::s3::signer::{payload_hash, Authentication};
use crate::transport::{Request, Response, Result, Transport, TransportError};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::LOCATION;
use hyper::{Method, Request as HyperRequest, StatusCode, Uri};
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::TokioExecutor;
use native_tls::TlsConnector;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::debug;
use url::Url;

/// Transfer options applied to every request of a `Connection`
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub follow_redirects: bool,
    pub max_redirects: usize,
    pub connect_timeout: Option<Duration>,
    /// Limit for a whole exchange, redirects and body included
    pub timeout: Option<Duration>,
    /// Disable certificate and hostname verification
    pub insecure_tls: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            follow_redirects: true,
            max_redirects: 10,
            connect_timeout: Some(Duration::from_secs(10)),
            timeout: None,
            insecure_tls: false,
        }
    }
}

/// One reusable HTTP handle bound to a validated base endpoint
pub struct Connection {
    endpoint: String,
    base: Url,
    client: HyperClient<HttpsConnector<HttpConnector>, Full<Bytes>>,
    runtime: Runtime,
    options: ConnectionOptions,
}

impl Connection {
    /// Create a connection with default options.
    ///
    /// Fails with `TransportError::InvalidEndpoint` before any I/O if the
    /// endpoint is not an absolute http(s) URL with a host.
    pub fn new(endpoint: &str) -> Result<Self> {
        Self::with_options(endpoint, ConnectionOptions::default())
    }

    pub fn with_options(endpoint: &str, options: ConnectionOptions) -> Result<Self> {
        let base = Self::normalize_endpoint(endpoint)?;

        let mut http = HttpConnector::new();
        http.set_nodelay(true);
        http.enforce_http(false);
        http.set_connect_timeout(options.connect_timeout);
        http.set_keepalive(Some(Duration::from_secs(90)));

        let tls = if options.insecure_tls {
            tracing::warn!("INSECURE TLS MODE ENABLED: Certificate verification is disabled!");
            TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)
                .build()
        } else {
            TlsConnector::new()
        }
        .map_err(|e| TransportError::failure(base.as_str(), format!("TLS setup failed: {}", e)))?;

        let https = HttpsConnector::from((http, tls.into()));

        let client = HyperClient::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(1)
            .set_host(true)
            .build(https);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        Ok(Self {
            endpoint: endpoint.to_string(),
            base,
            client,
            runtime,
            options,
        })
    }

    /// Validate an endpoint and make its path end with exactly one `/`
    pub fn normalize_endpoint(endpoint: &str) -> Result<Url> {
        let invalid = |reason: &str| {
            TransportError::InvalidEndpoint(format!("{} ({})", endpoint, reason))
        };

        let mut url = Url::parse(endpoint.trim()).map_err(|e| invalid(&e.to_string()))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid("scheme must be http or https"));
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(invalid("missing host"));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(invalid("query and fragment are not allowed"));
        }

        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }

        Ok(url)
    }

    /// Endpoint as given at construction
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Normalized endpoint, always ending with `/`
    pub fn base_uri(&self) -> &str {
        self.base.as_str()
    }

    /// Full target URI for a path relative to the endpoint
    pub fn uri(&self, relative: &str) -> String {
        format!("{}{}", self.base, relative.trim_start_matches('/'))
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    async fn exchange(&self, request: Request, auth: &Authentication, mut uri: Uri) -> Result<Response> {
        let mut method = request.method;
        let mut headers = request.headers;
        let mut body = request.body;
        let mut redirects = 0;

        loop {
            let outgoing = Self::build_request(&method, &uri, headers.clone(), body.clone(), auth)?;
            debug!(method = %method, uri = %uri, "s3_request");

            let response = self
                .client
                .request(outgoing)
                .await
                .map_err(|e| TransportError::failure(uri.to_string(), e))?;
            let status = response.status();

            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);

            if let (true, true, Some(location)) =
                (self.options.follow_redirects, status.is_redirection(), location)
            {
                if redirects >= self.options.max_redirects {
                    return Err(TransportError::failure(
                        uri.to_string(),
                        format!("maximum ({}) redirects followed", self.options.max_redirects),
                    ));
                }
                let next = redirect_target(&uri, &location)?;

                // Drain body to return connection to pool
                let _ = response.collect().await;

                if status == StatusCode::SEE_OTHER {
                    method = Method::GET;
                    body = Bytes::new();
                    headers.remove("content-type");
                }
                debug!(status = status.as_u16(), from = %uri, to = %next, "s3_redirect");

                redirects += 1;
                uri = next;
                continue;
            }

            let (parts, incoming) = response.into_parts();
            let body = incoming
                .collect()
                .await
                .map_err(|e| TransportError::failure(uri.to_string(), format!("body error: {}", e)))?
                .to_bytes();

            debug!(status = parts.status.as_u16(), bytes = body.len(), "s3_response");
            return Ok(Response::new(uri.to_string(), body, parts.status, parts.headers));
        }
    }

    /// Sign and build one request. The path is signed exactly as it will be
    /// sent; dot segments in object keys are not collapsed.
    fn build_request(
        method: &Method,
        uri: &Uri,
        mut headers: BTreeMap<String, String>,
        body: Bytes,
        auth: &Authentication,
    ) -> Result<HyperRequest<Full<Bytes>>> {
        headers.insert("host".to_string(), host_header(uri));

        let signed = auth.sign(
            method.as_str(),
            uri.path(),
            uri.query().unwrap_or(""),
            headers,
            &payload_hash(&body),
        )?;

        let mut req = HyperRequest::builder().method(method.clone()).uri(uri.clone());
        for (key, value) in signed.iter() {
            req = req.header(key, value);
        }

        Ok(req.body(Full::new(body))?)
    }
}

impl Transport for Connection {
    fn execute(&mut self, request: Request, auth: &Authentication) -> Result<Response> {
        let mut target = self.uri(&request.path);
        if let Some(query) = request.query.as_deref().filter(|q| !q.is_empty()) {
            target.push('?');
            target.push_str(query);
        }
        let uri = target
            .parse::<Uri>()
            .map_err(|e| TransportError::failure(target.as_str(), e))?;

        let exchange = self.exchange(request, auth, uri);
        match self.options.timeout {
            Some(limit) => self.runtime.block_on(async {
                match tokio::time::timeout(limit, exchange).await {
                    Ok(result) => result,
                    Err(_) => Err(TransportError::failure(
                        target.as_str(),
                        format!("timed out after {:?}", limit),
                    )),
                }
            }),
            None => self.runtime.block_on(exchange),
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.endpoint)
            .field("base", &self.base.as_str())
            .field("options", &self.options)
            .finish()
    }
}

/// Host header value; the base URL already omits default ports
fn host_header(uri: &Uri) -> String {
    let host = uri.host().unwrap_or_default();
    match uri.port_u16() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

/// Resolve a `Location` header against the URI that returned it
fn redirect_target(current: &Uri, location: &str) -> Result<Uri> {
    let invalid = |e: &dyn fmt::Display| {
        TransportError::failure(current.to_string(), format!("invalid redirect {:?}: {}", location, e))
    };

    let next = Url::parse(&current.to_string())
        .and_then(|base| base.join(location))
        .map_err(|e| invalid(&e))?;
    next.as_str().parse::<Uri>().map_err(|e| invalid(&e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructor_invalid_endpoint() {
        for endpoint in ["not a valid url", "", "localhost:9000", "ftp://example.com", "mailto:a@b.c"] {
            let err = Connection::new(endpoint).unwrap_err();
            assert!(
                matches!(err, TransportError::InvalidEndpoint(_)),
                "{:?} accepted",
                endpoint
            );
        }
    }

    #[test]
    fn test_constructor() {
        let connection = Connection::new("http://localhost:9000").unwrap();

        assert_eq!(connection.endpoint(), "http://localhost:9000");
        assert_eq!(connection.base_uri(), "http://localhost:9000/");
        assert_eq!(connection.options().max_redirects, 10);
        assert!(connection.options().follow_redirects);
    }

    #[test]
    fn test_normalize_keeps_single_separator() {
        for endpoint in ["http://localhost:9000", "http://localhost:9000/"] {
            let url = Connection::normalize_endpoint(endpoint).unwrap();
            assert_eq!(url.as_str(), "http://localhost:9000/");
        }

        let url = Connection::normalize_endpoint("https://example.com/storage").unwrap();
        assert_eq!(url.as_str(), "https://example.com/storage/");
    }

    #[test]
    fn test_uri() {
        let connection = Connection::new("http://localhost:9000").unwrap();

        assert_eq!(connection.uri(""), "http://localhost:9000/");
        assert_eq!(connection.uri("test"), "http://localhost:9000/test");
        assert_eq!(connection.uri("/test"), "http://localhost:9000/test");

        let prefixed = Connection::new("http://localhost:9000/s3/").unwrap();
        assert_eq!(prefixed.uri("bucket/key"), "http://localhost:9000/s3/bucket/key");
    }

    #[test]
    fn test_host_header_keeps_explicit_port() {
        let uri: Uri = "https://example.com/bucket".parse().unwrap();
        assert_eq!(host_header(&uri), "example.com");

        let uri: Uri = "http://localhost:9000/bucket".parse().unwrap();
        assert_eq!(host_header(&uri), "localhost:9000");
    }

    #[test]
    fn test_base_omits_default_port() {
        let connection = Connection::new("https://example.com:443").unwrap();
        assert_eq!(connection.uri("bucket"), "https://example.com/bucket");
    }

    #[test]
    fn test_build_request_is_signed() {
        let auth = Authentication::new("key", "secret", "us-east-1").unwrap();
        let uri: Uri = "http://localhost:9000/bucket/key.txt".parse().unwrap();

        let request = Connection::build_request(
            &Method::PUT,
            &uri,
            BTreeMap::new(),
            Bytes::from("content"),
            &auth,
        )
        .unwrap();

        let headers = request.headers();
        assert_eq!(headers["host"], "localhost:9000");
        assert_eq!(headers["x-amz-content-sha256"], payload_hash(b"content").as_str());
        assert!(headers.contains_key("x-amz-date"));
        assert!(headers["authorization"]
            .to_str()
            .unwrap()
            .starts_with("AWS4-HMAC-SHA256 Credential=key/"));
    }

    #[test]
    fn test_build_request_keeps_dot_segments() {
        let auth = Authentication::new("key", "secret", "us-east-1").unwrap();
        let connection = Connection::new("http://localhost:9000").unwrap();

        for key in ["bucket/a/../b.txt", "bucket/../evil.txt", "bucket/./c.txt"] {
            let uri: Uri = connection.uri(key).parse().unwrap();
            let request =
                Connection::build_request(&Method::PUT, &uri, BTreeMap::new(), Bytes::new(), &auth)
                    .unwrap();
            assert_eq!(request.uri().path(), format!("/{}", key));
        }
    }

    #[test]
    fn test_redirect_target() {
        let current: Uri = "http://localhost:9000/bucket/key".parse().unwrap();

        let next = redirect_target(&current, "/other/key").unwrap();
        assert_eq!(next.to_string(), "http://localhost:9000/other/key");

        let next = redirect_target(&current, "https://eu.example.com/bucket/key?x=1").unwrap();
        assert_eq!(next.to_string(), "https://eu.example.com/bucket/key?x=1");
    }
}
