//! In-memory S3 service used by the integration tests

#![allow(dead_code)]

use bytes::Bytes;
use hyper::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, ETAG};
use hyper::{Method, StatusCode};
use s3lite::s3::signer::payload_hash;
use s3lite::transport::{Request, Result, Transport};
use s3lite::{Authentication, S3Client, Response};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct StoredObject {
    body: Bytes,
    content_type: String,
}

/// Path-style S3 endpoint backed by maps, recording every request it sees
#[derive(Debug, Default)]
pub struct FakeS3 {
    buckets: BTreeMap<String, BTreeMap<String, StoredObject>>,
    calls: Vec<(Method, String)>,
}

impl FakeS3 {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests executed so far, as (method, decoded path)
    pub fn calls(&self) -> &[(Method, String)] {
        &self.calls
    }

    pub fn count(&self, method: Method) -> usize {
        self.calls.iter().filter(|(m, _)| *m == method).count()
    }

    fn bucket_op(&mut self, method: &Method, bucket: &str, body: &Bytes) -> (StatusCode, String) {
        if !valid_bucket_name(bucket) {
            return error(StatusCode::BAD_REQUEST, "InvalidBucketName");
        }

        match *method {
            Method::HEAD if self.buckets.contains_key(bucket) => (StatusCode::OK, String::new()),
            Method::HEAD => (StatusCode::NOT_FOUND, String::new()),
            Method::PUT if self.buckets.contains_key(bucket) => {
                error(StatusCode::CONFLICT, "BucketAlreadyOwnedByYou")
            }
            Method::PUT => {
                if !body.is_empty() && !String::from_utf8_lossy(body).contains("<LocationConstraint>") {
                    return error(StatusCode::BAD_REQUEST, "MalformedXML");
                }
                self.buckets.insert(bucket.to_string(), BTreeMap::new());
                (StatusCode::OK, String::new())
            }
            Method::DELETE => match self.buckets.get(bucket) {
                None => error(StatusCode::NOT_FOUND, "NoSuchBucket"),
                Some(objects) if !objects.is_empty() => error(StatusCode::CONFLICT, "BucketNotEmpty"),
                Some(_) => {
                    self.buckets.remove(bucket);
                    (StatusCode::NO_CONTENT, String::new())
                }
            },
            _ => error(StatusCode::METHOD_NOT_ALLOWED, "MethodNotAllowed"),
        }
    }
}

impl Transport for FakeS3 {
    fn execute(&mut self, request: Request, auth: &Authentication) -> Result<Response> {
        let path = urlencoding::decode(&request.path)
            .expect("path is valid UTF-8")
            .into_owned();
        self.calls.push((request.method.clone(), path.clone()));

        // Every request must be signable
        auth.sign(
            request.method.as_str(),
            &format!("/{}", request.path),
            "",
            request.headers.clone(),
            &payload_hash(&request.body),
        )?;

        let url = format!("http://fake-s3/{}", request.path);
        let mut headers = HeaderMap::new();

        let (status, body) = match path.split_once('/') {
            None => self.bucket_op(&request.method, &path, &request.body),
            Some((bucket, key)) => {
                let objects = self.buckets.get_mut(bucket);
                match (request.method.clone(), objects) {
                    (Method::HEAD, None) => (StatusCode::NOT_FOUND, String::new()),
                    (_, None) => error(StatusCode::NOT_FOUND, "NoSuchBucket"),
                    (Method::HEAD, Some(objects)) => match objects.get(key) {
                        Some(object) => {
                            headers.insert(CONTENT_LENGTH, HeaderValue::from(object.body.len()));
                            (StatusCode::OK, String::new())
                        }
                        None => (StatusCode::NOT_FOUND, String::new()),
                    },
                    (Method::PUT, Some(objects)) => {
                        let content_type = request
                            .headers
                            .get("content-type")
                            .cloned()
                            .unwrap_or_else(|| "binary/octet-stream".to_string());
                        let etag = format!("\"{}\"", &payload_hash(&request.body)[..32]);
                        headers.insert(ETAG, HeaderValue::from_str(&etag).expect("hex etag"));
                        objects.insert(
                            key.to_string(),
                            StoredObject {
                                body: request.body.clone(),
                                content_type,
                            },
                        );
                        (StatusCode::OK, String::new())
                    }
                    (Method::GET, Some(objects)) => match objects.get(key) {
                        Some(object) => {
                            headers.insert(
                                CONTENT_TYPE,
                                HeaderValue::from_str(&object.content_type).expect("stored content type"),
                            );
                            headers.insert(CONTENT_LENGTH, HeaderValue::from(object.body.len()));
                            return Ok(Response::new(url, object.body.clone(), StatusCode::OK, headers));
                        }
                        None => error(StatusCode::NOT_FOUND, "NoSuchKey"),
                    },
                    (Method::DELETE, Some(objects)) => {
                        objects.remove(key);
                        (StatusCode::NO_CONTENT, String::new())
                    }
                    _ => error(StatusCode::METHOD_NOT_ALLOWED, "MethodNotAllowed"),
                }
            }
        };

        Ok(Response::new(url, body, status, headers))
    }
}

fn error(status: StatusCode, code: &str) -> (StatusCode, String) {
    let body = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Error><Code>{}</Code><Message>{}</Message><RequestId>fake-request</RequestId></Error>",
        code,
        status.canonical_reason().unwrap_or("error")
    );
    (status, body)
}

fn valid_bucket_name(name: &str) -> bool {
    (3..=63).contains(&name.len())
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'.')
}

/// Client over a fresh fake service with `test-bucket` as default bucket
pub fn client() -> S3Client<FakeS3> {
    let auth = Authentication::new("key", "secret", "us-east-1").expect("valid credentials");
    S3Client::with_transport(auth, FakeS3::new()).with_bucket("test-bucket")
}
