//! AWS Signature Version 4 request signing.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use super::AwsCredentials;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// The parts of an HTTP request covered by the signature.
#[derive(Debug, Clone)]
pub struct SignableRequest<'a> {
    pub method: &'a str,
    pub host: &'a str,
    /// Path, already URI-encoded with [`uri_encode_path`].
    pub path: &'a str,
    /// Raw (unencoded) query parameters.
    pub query: &'a [(String, String)],
    /// Extra headers to sign besides `host` and the `x-amz-*` headers.
    pub headers: &'a [(String, String)],
    pub payload: &'a [u8],
}

/// Headers to attach to a signed request.
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    pub authorization: String,
    pub amz_date: String,
    pub content_sha256: Option<String>,
    pub security_token: Option<String>,
}

impl SignedHeaders {
    /// All headers to attach, as `(name, value)` pairs.
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("authorization", self.authorization.clone()),
            ("x-amz-date", self.amz_date.clone()),
        ];
        if let Some(sha) = &self.content_sha256 {
            pairs.push(("x-amz-content-sha256", sha.clone()));
        }
        if let Some(token) = &self.security_token {
            pairs.push(("x-amz-security-token", token.clone()));
        }
        pairs
    }
}

/// Per-service signing parameters.
#[derive(Debug, Clone, Copy)]
pub struct SigningScope<'a> {
    pub region: &'a str,
    pub service: &'a str,
    /// S3 requires the payload hash as a signed header.
    pub sign_content_sha256: bool,
}

/// Percent-encode per the SigV4 rules: everything but `A-Za-z0-9-_.~` is
/// encoded, and `/` is kept only when `keep_slash` is set.
pub fn uri_encode(input: &str, keep_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b'/' if keep_slash => out.push('/'),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// Encode an object key as a request path.
pub fn uri_encode_path(key: &str) -> String {
    format!("/{}", uri_encode(key.trim_start_matches('/'), true))
}

/// Canonical query string: encoded pairs sorted by key then value.
pub fn canonical_query_string(query: &[(String, String)]) -> String {
    let mut pairs: Vec<(String, String)> = query
        .iter()
        .map(|(k, v)| (uri_encode(k, false), uri_encode(v, false)))
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

fn hmac(key: &[u8], data: &str) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC-SHA256 accepts any key length");
    mac.update(data.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

/// Derive the signing key for one day, region and service.
pub fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac(format!("AWS4{}", secret).as_bytes(), date);
    let k_region = hmac(&k_date, region);
    let k_service = hmac(&k_region, service);
    hmac(&k_service, "aws4_request")
}

/// Sign `request` at `now`.
pub fn sign(
    request: &SignableRequest<'_>,
    credentials: &AwsCredentials,
    scope: SigningScope<'_>,
    now: DateTime<Utc>,
) -> SignedHeaders {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();
    let payload_hash = sha256_hex(request.payload);

    let mut headers: Vec<(String, String)> = request
        .headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.trim().to_string()))
        .collect();
    headers.push(("host".to_string(), request.host.to_string()));
    headers.push(("x-amz-date".to_string(), amz_date.clone()));
    if scope.sign_content_sha256 {
        headers.push(("x-amz-content-sha256".to_string(), payload_hash.clone()));
    }
    if let Some(token) = &credentials.session_token {
        headers.push(("x-amz-security-token".to_string(), token.clone()));
    }
    headers.sort();

    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v))
        .collect();
    let signed_headers = headers
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        request.method,
        request.path,
        canonical_query_string(request.query),
        canonical_headers,
        signed_headers,
        payload_hash
    );

    let credential_scope = format!(
        "{}/{}/{}/aws4_request",
        date, scope.region, scope.service
    );
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date,
        credential_scope,
        sha256_hex(canonical_request.as_bytes())
    );

    let key = signing_key(
        &credentials.secret_access_key,
        &date,
        scope.region,
        scope.service,
    );
    let signature = hex(&hmac(&key, &string_to_sign));

    SignedHeaders {
        authorization: format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM, credentials.access_key_id, credential_scope, signed_headers, signature
        ),
        amz_date,
        content_sha256: scope.sign_content_sha256.then_some(payload_hash),
        security_token: credentials.session_token.clone(),
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn example_credentials() -> AwsCredentials {
        AwsCredentials {
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".to_string(),
            session_token: None,
            expires_at: None,
        }
    }

    #[test]
    fn test_signing_key_reference() {
        let key = signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20150830",
            "us-east-1",
            "iam",
        );
        assert_eq!(
            hex(&key),
            "c4afb1cc5771d871763a393e44b703571b55cc28424d1a5e86da6ed3c154a4b9"
        );
    }

    #[test]
    fn test_sign_reference_request() {
        let query = vec![
            ("Version".to_string(), "2010-05-08".to_string()),
            ("Action".to_string(), "ListUsers".to_string()),
        ];
        let headers = vec![(
            "Content-Type".to_string(),
            "application/x-www-form-urlencoded; charset=utf-8".to_string(),
        )];
        let request = SignableRequest {
            method: "GET",
            host: "iam.amazonaws.com",
            path: "/",
            query: &query,
            headers: &headers,
            payload: b"",
        };
        let now = Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap();
        let signed = sign(
            &request,
            &example_credentials(),
            SigningScope {
                region: "us-east-1",
                service: "iam",
                sign_content_sha256: false,
            },
            now,
        );

        assert_eq!(signed.amz_date, "20150830T123600Z");
        assert_eq!(
            signed.authorization,
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/iam/aws4_request, \
             SignedHeaders=content-type;host;x-amz-date, \
             Signature=5d672d79c15b13162d9279b0855cfba6789a8edb4c82c400e06b5924a6f2b5d7"
        );
        assert!(signed.content_sha256.is_none());
    }

    #[test]
    fn test_session_token_is_signed() {
        let mut credentials = example_credentials();
        credentials.session_token = Some("token".to_string());
        let request = SignableRequest {
            method: "PUT",
            host: "bucket.s3.us-west-1.amazonaws.com",
            path: "/task-markers/m",
            query: &[],
            headers: &[],
            payload: b"body",
        };
        let signed = sign(
            &request,
            &credentials,
            SigningScope {
                region: "us-west-1",
                service: "s3",
                sign_content_sha256: true,
            },
            Utc::now(),
        );

        assert!(signed
            .authorization
            .contains("SignedHeaders=host;x-amz-content-sha256;x-amz-date;x-amz-security-token"));
        assert_eq!(signed.content_sha256.as_deref(), Some(sha256_hex(b"body").as_str()));
        assert_eq!(signed.pairs().len(), 4);
    }

    #[test]
    fn test_uri_encoding() {
        assert_eq!(uri_encode("a b+c=d", false), "a%20b%2Bc%3Dd");
        assert_eq!(uri_encode("a/b", false), "a%2Fb");
        assert_eq!(uri_encode_path("task-markers/intake-x"), "/task-markers/intake-x");
        assert_eq!(uri_encode_path("dir/with space"), "/dir/with%20space");
    }

    #[test]
    fn test_canonical_query_sorted() {
        let query = vec![
            ("prefix".to_string(), "task-markers/".to_string()),
            ("list-type".to_string(), "2".to_string()),
        ];
        assert_eq!(
            canonical_query_string(&query),
            "list-type=2&prefix=task-markers%2F"
        );
    }
}
