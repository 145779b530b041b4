//! Path ↔ key translation.
//!
//! Pure and stateless. Kernel paths are `/`-rooted; keys are the same
//! strings minus exactly one leading `/`, with the empty key denoting the
//! bucket root. Centralising this keeps the dispatcher free of string
//! surgery and makes directory synthesis auditable.

use bucketfs_store::ListEntry;

/// Strips exactly one leading `/`; the root path maps to the empty key.
pub fn key_of(path: &str) -> &str {
    path.strip_prefix('/').unwrap_or(path)
}

/// The listing prefix for a directory key: empty for the root, otherwise
/// the key plus the delimiter.
pub fn list_prefix_for(dir_key: &str) -> String {
    if dir_key.is_empty() {
        String::new()
    } else {
        format!("{}/", dir_key)
    }
}

/// Immediate child names under a prefix.
///
/// Names keep their trailing `/` sub-directory marker; entries outside the
/// prefix are skipped. No deduplication happens here.
pub fn child_names(prefix: &str, listing: &[ListEntry]) -> Vec<String> {
    listing
        .iter()
        .filter_map(|entry| entry.key.strip_prefix(prefix))
        .map(str::to_string)
        .collect()
}

/// The key of a key's parent directory; the root's parent is the root.
pub fn parent_key(key: &str) -> &str {
    match key.rsplit_once('/') {
        Some((parent, _)) => parent,
        None => "",
    }
}

/// The final path component of a key.
pub fn basename(key: &str) -> &str {
    match key.rsplit_once('/') {
        Some((_, name)) => name,
        None => key,
    }
}
