//! The typed operation surface over the remote bucket.
//!
//! `ObjectStore` is what the filesystem dispatcher and the uploader consume;
//! `S3Client` implements it over the wire and `MemoryStore` implements it
//! in-process for tests, including the server-side copy and
//! prefix/delimiter listing behaviours the callers depend on.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Mutex;

use crate::error::{StoreError, StoreResult};
use crate::meta::{now_epoch, COPY_SOURCE_HEADER};

/// Metadata-only view of an object: lower-cased response headers plus size.
#[derive(Debug, Clone)]
pub struct ObjectHead {
    /// Response headers, lower-cased names.
    pub headers: HashMap<String, String>,
    /// Content length in bytes.
    pub size: u64,
}

/// One row of a prefix listing. Common prefixes keep their trailing
/// delimiter so callers can tell sub-directories from objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    /// Full key, or common prefix ending in the delimiter.
    pub key: String,
    /// Object size; zero for common prefixes.
    pub size: u64,
    /// Last-modified time, seconds since epoch; zero when unknown.
    pub mtime: i64,
}

/// Typed operations over the remote bucket.
pub trait ObjectStore: Send + Sync {
    /// Fetches object metadata.
    fn head(&self, key: &str) -> StoreResult<ObjectHead>;
    /// Fetches the whole object.
    fn get(&self, key: &str) -> StoreResult<(ObjectHead, Vec<u8>)>;
    /// Fetches a byte range; `range` is the literal `bytes=a-b` string.
    fn get_range(&self, key: &str, range: &str) -> StoreResult<(ObjectHead, Vec<u8>)>;
    /// Stores a body under a key with the given request headers.
    fn put(&self, key: &str, body: &[u8], headers: &[(String, String)]) -> StoreResult<()>;
    /// Stores a local file's contents under a key.
    fn put_from_file(
        &self,
        key: &str,
        path: &Path,
        headers: &[(String, String)],
    ) -> StoreResult<()>;
    /// Deletes an object. A missing key reports `NotFound`.
    fn delete(&self, key: &str) -> StoreResult<()>;
    /// Lists keys under a prefix, folding sub-keys at the delimiter into
    /// common prefixes.
    fn list_prefix(&self, prefix: &str, delimiter: &str) -> StoreResult<Vec<ListEntry>>;
}

/// Looks up a header by case-insensitive name.
pub fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

#[derive(Debug, Clone)]
struct StoredObject {
    body: Vec<u8>,
    metadata: HashMap<String, String>,
    mtime: i64,
}

/// Operation counters for the in-memory store.
#[derive(Debug, Default, Clone)]
pub struct MemoryStoreStats {
    /// HEAD requests served.
    pub heads: u64,
    /// GET requests served (whole-object and ranged).
    pub gets: u64,
    /// PUT requests served.
    pub puts: u64,
    /// DELETE requests served.
    pub deletes: u64,
    /// Prefix listings served.
    pub lists: u64,
}

/// In-memory object store for tests.
pub struct MemoryStore {
    objects: Mutex<HashMap<String, StoredObject>>,
    stats: Mutex<MemoryStoreStats>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        MemoryStore {
            objects: Mutex::new(HashMap::new()),
            stats: Mutex::new(MemoryStoreStats::default()),
        }
    }

    /// Seeds an object directly, bypassing the PUT path.
    pub fn insert_object(&self, key: &str, body: &[u8], headers: &[(String, String)]) {
        let metadata = headers
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
            .collect();
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                body: body.to_vec(),
                metadata,
                mtime: now_epoch(),
            },
        );
    }

    /// Returns a stored body, if present.
    pub fn body_of(&self, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|o| o.body.clone())
    }

    /// Returns a stored metadata header, if present.
    pub fn metadata_of(&self, key: &str, header: &str) -> Option<String> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .and_then(|o| o.metadata.get(&header.to_ascii_lowercase()).cloned())
    }

    /// True iff the key exists.
    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    /// Number of stored objects.
    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    /// Snapshot of the operation counters.
    pub fn stats(&self) -> MemoryStoreStats {
        self.stats.lock().unwrap().clone()
    }

    fn head_of(object: &StoredObject) -> ObjectHead {
        let mut headers = object.metadata.clone();
        headers.insert("content-length".to_string(), object.body.len().to_string());
        ObjectHead {
            headers,
            size: object.body.len() as u64,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for MemoryStore {
    fn head(&self, key: &str) -> StoreResult<ObjectHead> {
        self.stats.lock().unwrap().heads += 1;
        let objects = self.objects.lock().unwrap();
        let object = objects.get(key).ok_or_else(|| StoreError::NotFound {
            key: key.to_string(),
        })?;
        Ok(Self::head_of(object))
    }

    fn get(&self, key: &str) -> StoreResult<(ObjectHead, Vec<u8>)> {
        self.stats.lock().unwrap().gets += 1;
        let objects = self.objects.lock().unwrap();
        let object = objects.get(key).ok_or_else(|| StoreError::NotFound {
            key: key.to_string(),
        })?;
        Ok((Self::head_of(object), object.body.clone()))
    }

    fn get_range(&self, key: &str, range: &str) -> StoreResult<(ObjectHead, Vec<u8>)> {
        self.stats.lock().unwrap().gets += 1;
        let objects = self.objects.lock().unwrap();
        let object = objects.get(key).ok_or_else(|| StoreError::NotFound {
            key: key.to_string(),
        })?;

        let bounds = range.strip_prefix("bytes=").unwrap_or(range);
        let (start, end) = bounds.split_once('-').unwrap_or((bounds, ""));
        let start: usize = start.parse().unwrap_or(0);
        let end: usize = end.parse().unwrap_or(usize::MAX);

        let len = object.body.len();
        let start = start.min(len);
        // HTTP ranges are end-inclusive.
        let end = end.saturating_add(1).min(len).max(start);
        Ok((Self::head_of(object), object.body[start..end].to_vec()))
    }

    fn put(&self, key: &str, body: &[u8], headers: &[(String, String)]) -> StoreResult<()> {
        self.stats.lock().unwrap().puts += 1;

        let body = match header_value(headers, COPY_SOURCE_HEADER) {
            Some(source) => {
                // Source is "bucket/key"; this store holds one bucket.
                let source_key = source.split_once('/').map(|(_, k)| k).unwrap_or(source);
                let objects = self.objects.lock().unwrap();
                let source_object =
                    objects.get(source_key).ok_or_else(|| StoreError::NotFound {
                        key: source_key.to_string(),
                    })?;
                source_object.body.clone()
            }
            None => body.to_vec(),
        };

        let metadata = headers
            .iter()
            .filter(|(k, _)| {
                !k.eq_ignore_ascii_case(COPY_SOURCE_HEADER)
                    && !k.eq_ignore_ascii_case("x-amz-metadata-directive")
            })
            .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
            .collect();

        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                body,
                metadata,
                mtime: now_epoch(),
            },
        );
        Ok(())
    }

    fn put_from_file(
        &self,
        key: &str,
        path: &Path,
        headers: &[(String, String)],
    ) -> StoreResult<()> {
        let body = std::fs::read(path)?;
        self.put(key, &body, headers)
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        self.stats.lock().unwrap().deletes += 1;
        match self.objects.lock().unwrap().remove(key) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound {
                key: key.to_string(),
            }),
        }
    }

    fn list_prefix(&self, prefix: &str, delimiter: &str) -> StoreResult<Vec<ListEntry>> {
        self.stats.lock().unwrap().lists += 1;
        let objects = self.objects.lock().unwrap();

        let mut entries = Vec::new();
        let mut prefixes = BTreeSet::new();
        for (key, object) in objects.iter() {
            let rest = match key.strip_prefix(prefix) {
                Some(rest) => rest,
                None => continue,
            };
            if !delimiter.is_empty() {
                if let Some(pos) = rest.find(delimiter) {
                    prefixes.insert(format!("{}{}", prefix, &rest[..pos + delimiter.len()]));
                    continue;
                }
            }
            entries.push(ListEntry {
                key: key.clone(),
                size: object.body.len() as u64,
                mtime: object.mtime,
            });
        }

        entries.extend(prefixes.into_iter().map(|key| ListEntry {
            key,
            size: 0,
            mtime: 0,
        }));
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_headers() -> Vec<(String, String)> {
        Vec::new()
    }

    #[test]
    fn test_put_get_round_trip() {
        let store = MemoryStore::new();
        store.put("a", b"hello", &no_headers()).unwrap();

        let (head, body) = store.get("a").unwrap();
        assert_eq!(body, b"hello");
        assert_eq!(head.size, 5);
    }

    #[test]
    fn test_head_missing_is_not_found() {
        let store = MemoryStore::new();
        let err = store.head("nope").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_head_reports_content_length() {
        let store = MemoryStore::new();
        store.put("a", b"12345", &no_headers()).unwrap();
        let head = store.head("a").unwrap();
        assert_eq!(head.headers.get("content-length").unwrap(), "5");
    }

    #[test]
    fn test_metadata_headers_lower_cased() {
        let store = MemoryStore::new();
        store
            .put(
                "a",
                b"",
                &[("X-Amz-Meta-S3fs-Mode".to_string(), "33188".to_string())],
            )
            .unwrap();
        let head = store.head("a").unwrap();
        assert_eq!(head.headers.get("x-amz-meta-s3fs-mode").unwrap(), "33188");
    }

    #[test]
    fn test_get_range_end_inclusive() {
        let store = MemoryStore::new();
        store.put("a", b"0123456789", &no_headers()).unwrap();

        let (_, body) = store.get_range("a", "bytes=2-4").unwrap();
        assert_eq!(body, b"234");
    }

    #[test]
    fn test_get_range_clamps_past_eof() {
        let store = MemoryStore::new();
        store.put("a", b"0123", &no_headers()).unwrap();

        let (_, body) = store.get_range("a", "bytes=2-100").unwrap();
        assert_eq!(body, b"23");
    }

    #[test]
    fn test_delete_removes_and_reports_missing() {
        let store = MemoryStore::new();
        store.put("a", b"x", &no_headers()).unwrap();
        store.delete("a").unwrap();
        assert!(!store.contains("a"));
        assert!(store.delete("a").unwrap_err().is_not_found());
    }

    #[test]
    fn test_copy_source_takes_body_from_source() {
        let store = MemoryStore::new();
        store.put("old", b"payload", &no_headers()).unwrap();

        store
            .put(
                "new",
                b"",
                &[(COPY_SOURCE_HEADER.to_string(), "bucket/old".to_string())],
            )
            .unwrap();

        assert_eq!(store.body_of("new").unwrap(), b"payload");
    }

    #[test]
    fn test_copy_source_replaces_metadata() {
        let store = MemoryStore::new();
        store
            .put(
                "old",
                b"x",
                &[("x-amz-meta-s3fs-mode".to_string(), "1".to_string())],
            )
            .unwrap();

        store
            .put(
                "new",
                b"",
                &[
                    (COPY_SOURCE_HEADER.to_string(), "bucket/old".to_string()),
                    ("x-amz-meta-s3fs-mode".to_string(), "2".to_string()),
                ],
            )
            .unwrap();

        assert_eq!(store.metadata_of("new", "x-amz-meta-s3fs-mode").unwrap(), "2");
        assert!(store.metadata_of("new", COPY_SOURCE_HEADER).is_none());
    }

    #[test]
    fn test_copy_from_missing_source_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .put(
                "new",
                b"",
                &[(COPY_SOURCE_HEADER.to_string(), "bucket/ghost".to_string())],
            )
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_list_prefix_folds_common_prefixes() {
        let store = MemoryStore::new();
        store.put("dir/a", b"1", &no_headers()).unwrap();
        store.put("dir/b", b"2", &no_headers()).unwrap();
        store.put("dir/sub/c", b"3", &no_headers()).unwrap();

        let entries = store.list_prefix("dir/", "/").unwrap();
        let keys: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["dir/a", "dir/b", "dir/sub/"]);
    }

    #[test]
    fn test_list_prefix_root() {
        let store = MemoryStore::new();
        store.put("top", b"1", &no_headers()).unwrap();
        store.put("dir/a", b"2", &no_headers()).unwrap();

        let entries = store.list_prefix("", "/").unwrap();
        let keys: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["dir/", "top"]);
    }

    #[test]
    fn test_list_prefix_no_duplicate_common_prefix() {
        let store = MemoryStore::new();
        store.put("d/x", b"1", &no_headers()).unwrap();
        store.put("d/y", b"2", &no_headers()).unwrap();

        let entries = store.list_prefix("", "/").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, "d/");
    }

    #[test]
    fn test_list_prefix_placeholder_and_children() {
        // A directory placeholder object next to its own prefix.
        let store = MemoryStore::new();
        store.put("d", b"", &no_headers()).unwrap();
        store.put("d/x", b"1", &no_headers()).unwrap();

        let entries = store.list_prefix("", "/").unwrap();
        let keys: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["d", "d/"]);
    }

    #[test]
    fn test_put_from_file_reads_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("staged");
        std::fs::write(&path, b"from disk").unwrap();

        let store = MemoryStore::new();
        store.put_from_file("k", &path, &no_headers()).unwrap();
        assert_eq!(store.body_of("k").unwrap(), b"from disk");
    }

    #[test]
    fn test_stats_count_operations() {
        let store = MemoryStore::new();
        store.put("a", b"1", &no_headers()).unwrap();
        store.get("a").unwrap();
        store.head("a").unwrap();
        store.list_prefix("", "/").unwrap();
        store.delete("a").unwrap();

        let stats = store.stats();
        assert_eq!(stats.puts, 1);
        assert_eq!(stats.gets, 1);
        assert_eq!(stats.heads, 1);
        assert_eq!(stats.lists, 1);
        assert_eq!(stats.deletes, 1);
    }

    #[test]
    fn test_header_value_case_insensitive() {
        let headers = vec![("X-Amz-Copy-Source".to_string(), "b/k".to_string())];
        assert_eq!(header_value(&headers, "x-amz-copy-source"), Some("b/k"));
        assert_eq!(header_value(&headers, "range"), None);
    }
}
