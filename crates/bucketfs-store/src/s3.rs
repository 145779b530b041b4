//! S3 REST client.
//!
//! Implements `ObjectStore` over the S3 HTTP API with SigV4-signed
//! requests. The async reqwest client is driven through an owned
//! single-thread tokio runtime so the trait surface stays synchronous for
//! the filesystem and uploader callers.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::client::{header_value, ListEntry, ObjectHead, ObjectStore};
use crate::credentials::Credentials;
use crate::error::{StoreError, StoreResult};
use crate::meta::COPY_SOURCE_HEADER;
use crate::sign::{sha256_hex, uri_encode, RequestSigner};

const DEFAULT_ENDPOINT: &str = "https://s3.amazonaws.com";
const DEFAULT_REGION: &str = "us-east-1";
const METADATA_DIRECTIVE_HEADER: &str = "x-amz-metadata-directive";

/// Connection settings for one bucket.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// Bucket name.
    pub bucket: String,
    /// Endpoint base URL, scheme included.
    pub endpoint: String,
    /// Signing region.
    pub region: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub retries: u32,
}

impl S3Config {
    /// Settings for a bucket on the default endpoint: 7 s per-request
    /// timeout, 2 retries.
    pub fn new(bucket: &str) -> Self {
        S3Config {
            bucket: bucket.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            region: DEFAULT_REGION.to_string(),
            timeout: Duration::from_secs(7),
            retries: 2,
        }
    }
}

struct RawResponse {
    status: u16,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

/// Buckets usable as a DNS label in virtual-hosted addressing: lowercase
/// letters, digits and hyphens, 3 to 63 characters, no edge hyphen. Dots
/// are excluded; they break wildcard TLS.
fn dns_compatible_bucket(bucket: &str) -> bool {
    (3..=63).contains(&bucket.len())
        && bucket
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !bucket.starts_with('-')
        && !bucket.ends_with('-')
}

/// `ObjectStore` over the S3 REST API.
pub struct S3Client {
    config: S3Config,
    signer: RequestSigner,
    http: reqwest::Client,
    runtime: tokio::runtime::Runtime,
}

impl S3Client {
    /// Builds a client; fails only on HTTP/runtime construction.
    pub fn new(config: S3Config, credentials: &Credentials) -> StoreResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::Transport {
                key: String::new(),
                msg: e.to_string(),
            })?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let signer = RequestSigner::new(credentials, &config.region);
        Ok(S3Client {
            config,
            signer,
            http,
            runtime,
        })
    }

    fn endpoint_host(&self) -> &str {
        self.config
            .endpoint
            .trim_start_matches("https://")
            .trim_start_matches("http://")
    }

    fn scheme(&self) -> &str {
        if self.config.endpoint.starts_with("http://") {
            "http"
        } else {
            "https"
        }
    }

    /// Virtual-hosted addressing puts the bucket in the host name;
    /// path-style keeps it as the leading path segment. IP or port
    /// endpoints and buckets unusable as a DNS label stay path-style.
    fn virtual_hosted(&self) -> bool {
        let host = self.endpoint_host();
        dns_compatible_bucket(&self.config.bucket)
            && !host.contains(':')
            && host.parse::<std::net::IpAddr>().is_err()
    }

    fn host(&self) -> String {
        if self.virtual_hosted() {
            format!("{}.{}", self.config.bucket, self.endpoint_host())
        } else {
            self.endpoint_host().to_string()
        }
    }

    fn path_for(&self, key: &str) -> String {
        if self.virtual_hosted() {
            format!("/{}", key)
        } else if key.is_empty() {
            format!("/{}", self.config.bucket)
        } else {
            format!("/{}/{}", self.config.bucket, key)
        }
    }

    fn request(
        &self,
        method: reqwest::Method,
        key: &str,
        query: &[(String, String)],
        extra_headers: &[(String, String)],
        body: Vec<u8>,
    ) -> StoreResult<RawResponse> {
        let host = self.host();
        let path = self.path_for(key);
        let payload_hash = sha256_hex(&body);

        let query_string: Vec<String> = query
            .iter()
            .map(|(k, v)| format!("{}={}", uri_encode(k, true), uri_encode(v, true)))
            .collect();
        let base = format!("{}://{}", self.scheme(), host);
        let url = if query_string.is_empty() {
            format!("{}{}", base, uri_encode(&path, false))
        } else {
            format!("{}{}?{}", base, uri_encode(&path, false), query_string.join("&"))
        };

        let mut attempt = 0;
        loop {
            let auth_headers = self.signer.sign(
                method.as_str(),
                &host,
                &path,
                query,
                extra_headers,
                &payload_hash,
                OffsetDateTime::now_utc(),
            );

            let mut req = self.http.request(method.clone(), &url);
            for (name, value) in extra_headers.iter().chain(auth_headers.iter()) {
                req = req.header(name.as_str(), value.as_str());
            }
            req = req.body(body.clone());

            let result = self.runtime.block_on(async {
                let resp = req.send().await?;
                let status = resp.status().as_u16();
                let headers = resp
                    .headers()
                    .iter()
                    .map(|(k, v)| {
                        (
                            k.as_str().to_string(),
                            v.to_str().unwrap_or_default().to_string(),
                        )
                    })
                    .collect();
                let body = resp.bytes().await?.to_vec();
                Ok::<RawResponse, reqwest::Error>(RawResponse {
                    status,
                    headers,
                    body,
                })
            });

            match result {
                Ok(resp) if resp.status >= 500 && attempt < self.config.retries => {
                    warn!(key, status = resp.status, attempt, "retrying after server error");
                    attempt += 1;
                }
                Ok(resp) => {
                    debug!(key, status = resp.status, method = %method, "request complete");
                    return Ok(resp);
                }
                Err(e) if attempt < self.config.retries => {
                    warn!(key, attempt, error = %e, "retrying after transport error");
                    attempt += 1;
                }
                Err(e) => {
                    return Err(StoreError::Transport {
                        key: key.to_string(),
                        msg: e.to_string(),
                    })
                }
            }
        }
    }

    fn check_status(key: &str, resp: &RawResponse) -> StoreResult<()> {
        match resp.status {
            200..=299 => Ok(()),
            404 => Err(StoreError::NotFound {
                key: key.to_string(),
            }),
            code => Err(StoreError::Status {
                code,
                key: key.to_string(),
            }),
        }
    }

    fn head_of(resp: &RawResponse) -> ObjectHead {
        let size = resp
            .headers
            .get("content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(resp.body.len() as u64);
        ObjectHead {
            headers: resp.headers.clone(),
            size,
        }
    }
}

impl ObjectStore for S3Client {
    fn head(&self, key: &str) -> StoreResult<ObjectHead> {
        let resp = self.request(reqwest::Method::HEAD, key, &[], &[], Vec::new())?;
        Self::check_status(key, &resp)?;
        Ok(Self::head_of(&resp))
    }

    fn get(&self, key: &str) -> StoreResult<(ObjectHead, Vec<u8>)> {
        let resp = self.request(reqwest::Method::GET, key, &[], &[], Vec::new())?;
        Self::check_status(key, &resp)?;
        let head = Self::head_of(&resp);
        Ok((head, resp.body))
    }

    fn get_range(&self, key: &str, range: &str) -> StoreResult<(ObjectHead, Vec<u8>)> {
        let headers = vec![("range".to_string(), range.to_string())];
        let resp = self.request(reqwest::Method::GET, key, &[], &headers, Vec::new())?;
        Self::check_status(key, &resp)?;
        let head = Self::head_of(&resp);
        Ok((head, resp.body))
    }

    fn put(&self, key: &str, body: &[u8], headers: &[(String, String)]) -> StoreResult<()> {
        let mut headers = headers.to_vec();
        // A copy PUT carries our own metadata set; tell the store to take
        // the request's metadata rather than the source's.
        if header_value(&headers, COPY_SOURCE_HEADER).is_some()
            && header_value(&headers, METADATA_DIRECTIVE_HEADER).is_none()
        {
            headers.push((METADATA_DIRECTIVE_HEADER.to_string(), "REPLACE".to_string()));
        }
        let resp = self.request(reqwest::Method::PUT, key, &[], &headers, body.to_vec())?;
        Self::check_status(key, &resp)
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
        let resp = self.request(reqwest::Method::DELETE, key, &[], &[], Vec::new())?;
        Self::check_status(key, &resp)
    }

    fn list_prefix(&self, prefix: &str, delimiter: &str) -> StoreResult<Vec<ListEntry>> {
        let mut entries = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut query = vec![
                ("list-type".to_string(), "2".to_string()),
                ("prefix".to_string(), prefix.to_string()),
                ("delimiter".to_string(), delimiter.to_string()),
            ];
            if let Some(token) = &continuation {
                query.push(("continuation-token".to_string(), token.clone()));
            }

            let resp = self.request(reqwest::Method::GET, "", &query, &[], Vec::new())?;
            Self::check_status(prefix, &resp)?;

            let xml = String::from_utf8_lossy(&resp.body);
            let (mut page, next) = parse_list_response(&xml);
            entries.append(&mut page);

            match next {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }

        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }
}

/// Parses a `ListBucketResult` document into entries plus the continuation
/// token when the listing is truncated.
fn parse_list_response(xml: &str) -> (Vec<ListEntry>, Option<String>) {
    let mut entries = Vec::new();

    for block in tag_blocks(xml, "Contents") {
        let key = match tag_value(block, "Key") {
            Some(k) => xml_unescape(k),
            None => continue,
        };
        let size = tag_value(block, "Size")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let mtime = tag_value(block, "LastModified")
            .and_then(|v| OffsetDateTime::parse(v, &Rfc3339).ok())
            .map(|t| t.unix_timestamp())
            .unwrap_or(0);
        entries.push(ListEntry { key, size, mtime });
    }

    for block in tag_blocks(xml, "CommonPrefixes") {
        if let Some(prefix) = tag_value(block, "Prefix") {
            entries.push(ListEntry {
                key: xml_unescape(prefix),
                size: 0,
                mtime: 0,
            });
        }
    }

    let truncated = tag_value(xml, "IsTruncated") == Some("true");
    let token = if truncated {
        tag_value(xml, "NextContinuationToken").map(xml_unescape)
    } else {
        None
    };

    (entries, token)
}

fn tag_blocks<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let mut blocks = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find(&open) {
        let after = &rest[start + open.len()..];
        match after.find(&close) {
            Some(end) => {
                blocks.push(&after[..end]);
                rest = &after[end + close.len()..];
            }
            None => break,
        }
    }
    blocks
}

fn tag_value<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    tag_blocks(xml, tag).into_iter().next()
}

fn xml_unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
