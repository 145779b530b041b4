//! AWS Signature Version 4 request signing.
//!
//! Canonical request + string-to-sign + derived signing key, per the S3
//! REST contract. HMAC-SHA256 is composed from `sha2` following RFC 2104.

use sha2::{Digest, Sha256};
use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

use crate::credentials::Credentials;

const DATETIME_FMT: &[FormatItem<'static>] =
    format_description!("[year][month][day]T[hour][minute][second]Z");
const DATE_FMT: &[FormatItem<'static>] = format_description!("[year][month][day]");

/// SHA-256 of the empty payload, used for bodyless requests.
pub const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Lowercase hex rendering of a byte slice.
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Lowercase hex SHA-256 digest.
pub fn sha256_hex(data: &[u8]) -> String {
    to_hex(&Sha256::digest(data))
}

/// HMAC-SHA256 keyed hash (RFC 2104), arbitrary key length.
pub fn hmac_sha256(key: &[u8], message: &[u8]) -> [u8; 32] {
    let mut key_block = [0u8; 64];
    if key.len() > 64 {
        key_block[..32].copy_from_slice(&Sha256::digest(key));
    } else {
        key_block[..key.len()].copy_from_slice(key);
    }

    let mut ipad = [0x36u8; 64];
    let mut opad = [0x5cu8; 64];
    for i in 0..64 {
        ipad[i] ^= key_block[i];
        opad[i] ^= key_block[i];
    }

    let mut inner = Sha256::new();
    inner.update(ipad);
    inner.update(message);
    let inner_hash = inner.finalize();

    let mut outer = Sha256::new();
    outer.update(opad);
    outer.update(inner_hash);
    outer.finalize().into()
}

/// Percent-encodes a string the way SigV4 canonicalisation requires.
///
/// Unreserved characters pass through; `/` passes through only when
/// `encode_slash` is false (object-key paths keep their separators).
pub fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// Signs requests for one key pair and region.
pub struct RequestSigner {
    access_key_id: String,
    secret_access_key: String,
    region: String,
}

impl RequestSigner {
    /// Creates a signer for the given credentials and region.
    pub fn new(credentials: &Credentials, region: &str) -> Self {
        RequestSigner {
            access_key_id: credentials.access_key_id.clone(),
            secret_access_key: credentials.secret_access_key.clone(),
            region: region.to_string(),
        }
    }

    /// Produces the signing headers for one request.
    ///
    /// `extra_headers` are the caller's own headers (metadata, range, copy
    /// source); they participate in the signature and must be sent verbatim.
    /// The returned vector holds `x-amz-date`, `x-amz-content-sha256` and
    /// `authorization`, to be attached alongside `extra_headers`.
    pub fn sign(
        &self,
        method: &str,
        host: &str,
        path: &str,
        query: &[(String, String)],
        extra_headers: &[(String, String)],
        payload_hash: &str,
        now: OffsetDateTime,
    ) -> Vec<(String, String)> {
        let datetime = now.format(DATETIME_FMT).expect("formatting is infallible");
        let date = now.format(DATE_FMT).expect("formatting is infallible");

        let mut headers: Vec<(String, String)> = extra_headers
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.trim().to_string()))
            .collect();
        headers.push(("host".to_string(), host.to_string()));
        headers.push(("x-amz-content-sha256".to_string(), payload_hash.to_string()));
        headers.push(("x-amz-date".to_string(), datetime.clone()));
        headers.sort();

        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect();
        let signed_headers: Vec<&str> = headers.iter().map(|(k, _)| k.as_str()).collect();
        let signed_headers = signed_headers.join(";");

        let mut query: Vec<(String, String)> = query
            .iter()
            .map(|(k, v)| (uri_encode(k, true), uri_encode(v, true)))
            .collect();
        query.sort();
        let canonical_query: Vec<String> =
            query.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        let canonical_query = canonical_query.join("&");

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method,
            uri_encode(path, false),
            canonical_query,
            canonical_headers,
            signed_headers,
            payload_hash
        );

        let scope = format!("{}/{}/s3/aws4_request", date, self.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            datetime,
            scope,
            sha256_hex(canonical_request.as_bytes())
        );

        let k_date = hmac_sha256(
            format!("AWS4{}", self.secret_access_key).as_bytes(),
            date.as_bytes(),
        );
        let k_region = hmac_sha256(&k_date, self.region.as_bytes());
        let k_service = hmac_sha256(&k_region, b"s3");
        let k_signing = hmac_sha256(&k_service, b"aws4_request");
        let signature = to_hex(&hmac_sha256(&k_signing, string_to_sign.as_bytes()));

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.access_key_id, scope, signed_headers, signature
        );

        vec![
            ("x-amz-date".to_string(), datetime),
            ("x-amz-content-sha256".to_string(), payload_hash.to_string()),
            ("authorization".to_string(), authorization),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn signer() -> RequestSigner {
        RequestSigner::new(
            &Credentials::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY"),
            "us-east-1",
        )
    }

    #[test]
    fn test_sha256_hex_empty_matches_constant() {
        assert_eq!(sha256_hex(b""), EMPTY_PAYLOAD_SHA256);
    }

    #[test]
    fn test_hmac_sha256_rfc4231_case_1() {
        // RFC 4231 test case 1.
        let key = [0x0bu8; 20];
        let mac = hmac_sha256(&key, b"Hi There");
        assert_eq!(
            to_hex(&mac),
            "b0344c61d8db38535ca8afceaf0bf12b881dc200c9833da726e9376c2e32cff7"
        );
    }

    #[test]
    fn test_hmac_sha256_long_key_is_hashed() {
        let long_key = [0xaau8; 80];
        let short = hmac_sha256(&Sha256::digest(long_key), b"msg");
        let direct = hmac_sha256(&long_key, b"msg");
        assert_eq!(short, direct);
    }

    #[test]
    fn test_uri_encode_preserves_unreserved() {
        assert_eq!(uri_encode("abc-123._~", true), "abc-123._~");
    }

    #[test]
    fn test_uri_encode_slash_modes() {
        assert_eq!(uri_encode("a/b", false), "a/b");
        assert_eq!(uri_encode("a/b", true), "a%2Fb");
    }

    #[test]
    fn test_uri_encode_space_and_unicode() {
        assert_eq!(uri_encode("a b", true), "a%20b");
        assert_eq!(uri_encode("é", true), "%C3%A9");
    }

    #[test]
    fn test_sign_returns_three_headers() {
        let now = datetime!(2015-08-30 12:36:00 UTC);
        let headers = signer().sign(
            "GET",
            "example.amazonaws.com",
            "/",
            &[],
            &[],
            EMPTY_PAYLOAD_SHA256,
            now,
        );
        let names: Vec<&str> = headers.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            names,
            vec!["x-amz-date", "x-amz-content-sha256", "authorization"]
        );
    }

    #[test]
    fn test_sign_datetime_format() {
        let now = datetime!(2015-08-30 12:36:00 UTC);
        let headers = signer().sign(
            "GET",
            "h",
            "/",
            &[],
            &[],
            EMPTY_PAYLOAD_SHA256,
            now,
        );
        assert_eq!(headers[0].1, "20150830T123600Z");
    }

    #[test]
    fn test_sign_is_deterministic() {
        let now = datetime!(2015-08-30 12:36:00 UTC);
        let a = signer().sign("GET", "h", "/k", &[], &[], EMPTY_PAYLOAD_SHA256, now);
        let b = signer().sign("GET", "h", "/k", &[], &[], EMPTY_PAYLOAD_SHA256, now);
        assert_eq!(a, b);
    }

    #[test]
    fn test_sign_differs_by_secret() {
        let now = datetime!(2015-08-30 12:36:00 UTC);
        let other = RequestSigner::new(&Credentials::new("AKIDEXAMPLE", "other"), "us-east-1");
        let a = signer().sign("GET", "h", "/k", &[], &[], EMPTY_PAYLOAD_SHA256, now);
        let b = other.sign("GET", "h", "/k", &[], &[], EMPTY_PAYLOAD_SHA256, now);
        assert_ne!(a[2].1, b[2].1);
    }

    #[test]
    fn test_sign_covers_extra_headers() {
        let now = datetime!(2015-08-30 12:36:00 UTC);
        let plain = signer().sign("PUT", "h", "/k", &[], &[], EMPTY_PAYLOAD_SHA256, now);
        let with_meta = signer().sign(
            "PUT",
            "h",
            "/k",
            &[],
            &[("x-amz-meta-s3fs-mode".to_string(), "33188".to_string())],
            EMPTY_PAYLOAD_SHA256,
            now,
        );
        assert_ne!(plain[2].1, with_meta[2].1);
        assert!(with_meta[2].1.contains("x-amz-meta-s3fs-mode"));
    }

    #[test]
    fn test_sign_covers_query() {
        let now = datetime!(2015-08-30 12:36:00 UTC);
        let plain = signer().sign("GET", "h", "/", &[], &[], EMPTY_PAYLOAD_SHA256, now);
        let with_query = signer().sign(
            "GET",
            "h",
            "/",
            &[("prefix".to_string(), "dir/".to_string())],
            &[],
            EMPTY_PAYLOAD_SHA256,
            now,
        );
        assert_ne!(plain[2].1, with_query[2].1);
    }

    #[test]
    fn test_signature_is_hex() {
        let now = datetime!(2015-08-30 12:36:00 UTC);
        let headers = signer().sign("GET", "h", "/", &[], &[], EMPTY_PAYLOAD_SHA256, now);
        let auth = &headers[2].1;
        let sig = auth.rsplit("Signature=").next().unwrap();
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
