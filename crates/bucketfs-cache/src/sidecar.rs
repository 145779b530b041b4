//! Sidecar naming, parsing and directory scanning.
//!
//! A sidecar is the commit record that marks a staged object ready for
//! upload. Its filename splits on `,` into exactly `(bucket, slug, "meta")`;
//! its body is the JSON-serialised envelope whose `fn` field names the key
//! to PUT.

use std::path::{Path, PathBuf};

use bucketfs_store::Envelope;

use crate::error::{CacheError, CacheResult};

/// Data filename for a bucket/slug pair.
pub fn data_file_name(bucket: &str, slug: &str) -> String {
    format!("{},{}", bucket, slug)
}

/// Sidecar filename for a bucket/slug pair.
pub fn sidecar_file_name(bucket: &str, slug: &str) -> String {
    format!("{},{},meta", bucket, slug)
}

/// Splits a filename into `(bucket, slug)` iff it is a sidecar name.
pub fn parse_sidecar_name(file_name: &str) -> Option<(String, String)> {
    let fields: Vec<&str> = file_name.split(',').collect();
    match fields.as_slice() {
        [bucket, slug, "meta"] if !bucket.is_empty() && !slug.is_empty() => {
            Some((bucket.to_string(), slug.to_string()))
        }
        _ => None,
    }
}

/// One upload-eligible sidecar found by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidecarEntry {
    /// The slug half of the filename.
    pub slug: String,
    /// Path of the sidecar file.
    pub meta_path: PathBuf,
    /// Path of the matching data file (existence not guaranteed).
    pub data_path: PathBuf,
}

/// Scans a cache directory for sidecars belonging to `bucket`.
pub fn scan_sidecars(cache_dir: &Path, bucket: &str) -> std::io::Result<Vec<SidecarEntry>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(cache_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = match name.to_str() {
            Some(n) => n,
            None => continue,
        };
        if let Some((entry_bucket, slug)) = parse_sidecar_name(name) {
            if entry_bucket == bucket {
                found.push(SidecarEntry {
                    data_path: cache_dir.join(data_file_name(bucket, &slug)),
                    meta_path: entry.path(),
                    slug,
                });
            }
        }
    }
    found.sort_by(|a, b| a.slug.cmp(&b.slug));
    Ok(found)
}

/// Reads and deserialises a sidecar envelope.
pub fn read_sidecar(path: &Path) -> CacheResult<Envelope> {
    let body = std::fs::read(path)?;
    serde_json::from_slice(&body).map_err(|e| CacheError::BadSidecar {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sidecar_name_accepts_triple() {
        assert_eq!(
            parse_sidecar_name("demo,a_txt,meta"),
            Some(("demo".to_string(), "a_txt".to_string()))
        );
    }

    #[test]
    fn test_parse_sidecar_name_rejects_data_file() {
        assert_eq!(parse_sidecar_name("demo,a_txt"), None);
    }

    #[test]
    fn test_parse_sidecar_name_rejects_extra_fields() {
        assert_eq!(parse_sidecar_name("demo,a,b,meta"), None);
    }

    #[test]
    fn test_parse_sidecar_name_rejects_tmp() {
        assert_eq!(parse_sidecar_name("demo,a_txt,meta.tmp"), None);
    }

    #[test]
    fn test_parse_sidecar_name_rejects_sentinel() {
        assert_eq!(parse_sidecar_name(".quit"), None);
    }

    #[test]
    fn test_scan_filters_by_bucket() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("demo,a_txt,meta"), b"{}").unwrap();
        std::fs::write(dir.path().join("other,b_txt,meta"), b"{}").unwrap();
        std::fs::write(dir.path().join("demo,a_txt"), b"data").unwrap();

        let found = scan_sidecars(dir.path(), "demo").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].slug, "a_txt");
        assert!(found[0].meta_path.ends_with("demo,a_txt,meta"));
        assert!(found[0].data_path.ends_with("demo,a_txt"));
    }

    #[test]
    fn test_scan_sorted_by_slug() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("demo,zz,meta"), b"{}").unwrap();
        std::fs::write(dir.path().join("demo,aa,meta"), b"{}").unwrap();

        let found = scan_sidecars(dir.path(), "demo").unwrap();
        let slugs: Vec<&str> = found.iter().map(|e| e.slug.as_str()).collect();
        assert_eq!(slugs, vec!["aa", "zz"]);
    }

    #[test]
    fn test_read_sidecar_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo,k,meta");
        let mut env = Envelope::new_file(3);
        env.upload_key = Some("k".to_string());
        std::fs::write(&path, serde_json::to_vec(&env).unwrap()).unwrap();

        let back = read_sidecar(&path).unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn test_read_sidecar_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo,k,meta");
        std::fs::write(&path, b"not json").unwrap();

        let err = read_sidecar(&path).unwrap_err();
        assert!(matches!(err, CacheError::BadSidecar { .. }));
    }
}
