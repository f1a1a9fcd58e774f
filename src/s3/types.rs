//! S3 types: object registry, get results and directory upload entries

use crate::transport::Response;
use bytes::Bytes;
use hyper::header::{HeaderMap, CONTENT_LENGTH, CONTENT_TYPE, ETAG, LAST_MODIFIED};
use indexmap::IndexMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Buckets and keys created through one client. Buckets and the keys inside
/// each bucket are both listed in creation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectRegistry {
    buckets: IndexMap<String, Vec<String>>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a bucket, keeping any keys already recorded for it
    pub fn register_bucket(&mut self, bucket: &str) {
        self.buckets.entry(bucket.to_string()).or_default();
    }

    /// Append a key to its bucket's list, creating the entry if needed
    pub fn register_key(&mut self, bucket: &str, key: &str) {
        let keys = self.buckets.entry(bucket.to_string()).or_default();
        if !keys.iter().any(|k| k == key) {
            keys.push(key.to_string());
        }
    }

    pub fn remove_bucket(&mut self, bucket: &str) {
        self.buckets.shift_remove(bucket);
    }

    pub fn remove_key(&mut self, bucket: &str, key: &str) {
        if let Some(keys) = self.buckets.get_mut(bucket) {
            keys.retain(|k| k != key);
        }
    }

    pub fn keys(&self, bucket: &str) -> Option<&[String]> {
        self.buckets.get(bucket).map(Vec::as_slice)
    }

    pub fn as_map(&self) -> &IndexMap<String, Vec<String>> {
        &self.buckets
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// Raw result of a GET object request
#[derive(Debug, Clone)]
pub struct ObjectOutput {
    pub body: Bytes,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    /// ETag without surrounding quotes
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub headers: HeaderMap,
}

impl From<Response> for ObjectOutput {
    fn from(response: Response) -> Self {
        let header = |name| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };

        let content_type = header(CONTENT_TYPE);
        let content_length = header(CONTENT_LENGTH).and_then(|v| v.parse().ok());
        let etag = header(ETAG).map(|v| v.trim_matches('"').to_string());
        let last_modified = header(LAST_MODIFIED);
        let headers = response.headers().clone();

        Self {
            body: response.into_body(),
            content_type,
            content_length,
            etag,
            last_modified,
            headers,
        }
    }
}

/// Regular files under a directory paired with their object keys.
///
/// Keys are the `/`-joined path relative to the root, behind the optional
/// prefix. Entries come out sorted by file name within each directory.
pub struct DirectoryEntries {
    root: PathBuf,
    prefix: String,
    walker: walkdir::IntoIter,
}

impl DirectoryEntries {
    /// Fails before yielding anything if `root` is not a readable directory
    pub fn new(root: &Path, prefix: Option<&str>) -> io::Result<Self> {
        if !fs::metadata(root)?.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a directory", root.display()),
            ));
        }
        fs::read_dir(root)?;

        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();

        Ok(Self {
            root: root.to_path_buf(),
            prefix: prefix.unwrap_or_default().trim_matches('/').to_string(),
            walker,
        })
    }

    fn object_key(&self, path: &Path) -> io::Result<String> {
        let relative = path
            .strip_prefix(&self.root)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let mut parts = Vec::new();
        for component in relative.components() {
            let part = component.as_os_str().to_str().ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("{} is not valid UTF-8", path.display()),
                )
            })?;
            parts.push(part);
        }

        let relative = parts.join("/");
        if self.prefix.is_empty() {
            Ok(relative)
        } else {
            Ok(format!("{}/{}", self.prefix, relative))
        }
    }
}

impl Iterator for DirectoryEntries {
    type Item = io::Result<(PathBuf, String)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e.into())),
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.into_path();
            return Some(self.object_key(&path).map(|key| (path, key)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;
    use hyper::StatusCode;
    use tempfile::TempDir;

    #[test]
    fn test_registry_keeps_insertion_order() {
        let mut registry = ObjectRegistry::new();
        assert!(registry.is_empty());

        registry.register_bucket("b");
        assert_eq!(registry.keys("b"), Some(&[][..]));

        registry.register_key("b", "k2");
        registry.register_key("b", "k1");
        registry.register_key("b", "k2");
        assert_eq!(registry.keys("b").unwrap(), ["k2", "k1"]);

        // Re-registering a bucket keeps its keys
        registry.register_bucket("b");
        assert_eq!(registry.keys("b").unwrap().len(), 2);

        registry.remove_key("b", "k2");
        assert_eq!(registry.keys("b").unwrap(), ["k1"]);

        registry.remove_bucket("b");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registry_lists_buckets_in_creation_order() {
        let mut registry = ObjectRegistry::new();
        registry.register_bucket("zeta");
        registry.register_key("alpha", "a.txt");
        registry.register_bucket("mid");
        let buckets: Vec<&str> = registry.as_map().keys().map(String::as_str).collect();
        assert_eq!(buckets, ["zeta", "alpha", "mid"]);

        registry.remove_bucket("zeta");
        registry.register_bucket("zeta");
        let buckets: Vec<&str> = registry.as_map().keys().map(String::as_str).collect();
        assert_eq!(buckets, ["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_object_output_from_response() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("9"));
        headers.insert(ETAG, HeaderValue::from_static("\"abc123\""));

        let response = Response::new("http://localhost/b/k", "test-text", StatusCode::OK, headers);
        let output = ObjectOutput::from(response);

        assert_eq!(output.body, Bytes::from("test-text"));
        assert_eq!(output.content_type.as_deref(), Some("text/plain"));
        assert_eq!(output.content_length, Some(9));
        assert_eq!(output.etag.as_deref(), Some("abc123"));
        assert!(output.last_modified.is_none());
    }

    #[test]
    fn test_directory_entries_keys() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.txt"), "b").unwrap();
        fs::create_dir_all(dir.path().join("sub/deeper")).unwrap();
        fs::write(dir.path().join("sub/a.txt"), "a").unwrap();
        fs::write(dir.path().join("sub/deeper/c.txt"), "c").unwrap();

        let keys: Vec<String> = DirectoryEntries::new(dir.path(), Some("/assets/"))
            .unwrap()
            .map(|entry| entry.unwrap().1)
            .collect();
        assert_eq!(keys, ["assets/b.txt", "assets/sub/a.txt", "assets/sub/deeper/c.txt"]);

        let keys: Vec<String> = DirectoryEntries::new(dir.path(), None)
            .unwrap()
            .map(|entry| entry.unwrap().1)
            .collect();
        assert_eq!(keys[0], "b.txt");
    }

    #[test]
    fn test_directory_entries_rejects_non_directory() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file.txt");
        fs::write(&file, "x").unwrap();

        assert!(DirectoryEntries::new(&file, None).is_err());
        assert!(DirectoryEntries::new(&dir.path().join("missing"), None).is_err());
    }
}
