//! AWS Signature Version 4 request signing

use std::{collections::BTreeMap, fmt, sync::Arc};

use axum::http::{header::HeaderName, HeaderMap, HeaderValue};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::{Digest, Sha256};
use tracing::debug;
use url::Url;

use crate::sigv4::credentials::{Credentials, ProvideCredentials};
use crate::sigv4::SigningError;

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";
pub const AMZ_DATE_HEADER: &str = "x-amz-date";
pub const SECURITY_TOKEN_HEADER: &str = "x-amz-security-token";
pub const CONTENT_SHA256_HEADER: &str = "x-amz-content-sha256";

const AMZ_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";
const SCOPE_DATE_FORMAT: &str = "%Y%m%d";

/// Headers that proxies and clients rewrite in transit.
const UNSIGNED_HEADERS: &[&str] = &[
    "authorization",
    "connection",
    "expect",
    "user-agent",
    "x-amzn-trace-id",
];

/// RFC 3986 unreserved characters are the only ones left as-is.
const QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');
const PATH_ENCODE_SET: &AsciiSet = &QUERY_ENCODE_SET.remove(b'/');

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// The request as seen by the signer. Signing adds headers in place.
#[derive(Debug, Clone)]
pub struct SignableRequest {
    pub method: String,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl SignableRequest {
    pub fn new(method: impl Into<String>, url: Url) -> Self {
        Self {
            method: method.into().to_ascii_uppercase(),
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// `host[:port]`, with the port only when it differs from the scheme default.
    pub fn host(&self) -> Result<String, SigningError> {
        let host = self
            .url
            .host_str()
            .ok_or_else(|| SigningError::MissingHost(self.url.to_string()))?;
        Ok(match self.url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        })
    }
}

#[derive(Clone)]
pub struct SigV4Signer {
    region: String,
    service: String,
    credentials: Arc<dyn ProvideCredentials>,
    clock: Clock,
    apply_checksum: bool,
}

impl fmt::Debug for SigV4Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigV4Signer")
            .field("region", &self.region)
            .field("service", &self.service)
            .field("apply_checksum", &self.apply_checksum)
            .finish_non_exhaustive()
    }
}

impl SigV4Signer {
    pub fn new(
        region: impl Into<String>,
        service: impl Into<String>,
        credentials: impl ProvideCredentials + 'static,
    ) -> Self {
        Self::with_credentials_provider(region, service, Arc::new(credentials))
    }

    pub fn with_credentials_provider(
        region: impl Into<String>,
        service: impl Into<String>,
        credentials: Arc<dyn ProvideCredentials>,
    ) -> Self {
        Self {
            region: region.into(),
            service: service.into(),
            credentials,
            clock: Arc::new(Utc::now),
            apply_checksum: true,
        }
    }

    pub fn with_clock<C>(mut self, clock: C) -> Self
    where
        C: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    /// Controls the `x-amz-content-sha256` header. The payload hash is signed either way.
    pub fn with_apply_checksum(mut self, apply_checksum: bool) -> Self {
        self.apply_checksum = apply_checksum;
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Resolves credentials and signs `request` at the current clock time.
    pub async fn sign(&self, request: &mut SignableRequest) -> Result<(), SigningError> {
        let credentials = self.credentials.provide_credentials().await?;
        self.sign_with(request, &credentials, (self.clock)())
    }

    pub fn sign_with(
        &self,
        request: &mut SignableRequest,
        credentials: &Credentials,
        now: DateTime<Utc>,
    ) -> Result<(), SigningError> {
        let amz_date = now.format(AMZ_DATE_FORMAT).to_string();
        let scope_date = now.format(SCOPE_DATE_FORMAT).to_string();
        let payload_hash = hex_sha256(request.body.as_deref().unwrap_or_default());
        let host = request.host()?;

        set_header(&mut request.headers, "host", &host)?;
        set_header(&mut request.headers, AMZ_DATE_HEADER, &amz_date)?;
        if let Some(token) = &credentials.session_token {
            set_header(&mut request.headers, SECURITY_TOKEN_HEADER, token)?;
        }
        if self.apply_checksum {
            set_header(&mut request.headers, CONTENT_SHA256_HEADER, &payload_hash)?;
        }

        let signing_headers = signable_headers(&request.headers);
        let scope = format!(
            "{scope_date}/{}/{}/aws4_request",
            self.region, self.service
        );
        let (canonical, signed_headers) =
            canonical_request(&request.method, &request.url, &signing_headers, &payload_hash);
        let signature = compute_signature(
            &credentials.secret_access_key,
            &scope_date,
            &self.region,
            &self.service,
            &string_to_sign(&amz_date, &scope, &canonical),
        )?;

        debug!(
            method = %request.method,
            host = %request.url.host_str().unwrap_or_default(),
            region = %self.region,
            service = %self.service,
            signed_headers = %signed_headers,
            "signed outbound request"
        );

        let authorization = format!(
            "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            credentials.access_key_id
        );
        set_header(&mut request.headers, "authorization", &authorization)
    }
}

fn set_header(headers: &mut HeaderMap, name: &str, value: &str) -> Result<(), SigningError> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|err| SigningError::InvalidHeader(format!("{name}: {err}")))?;
    let value = HeaderValue::from_str(value)
        .map_err(|err| SigningError::InvalidHeader(format!("{name}: {err}")))?;
    headers.insert(name, value);
    Ok(())
}

/// Lower-cased names mapped to normalized values, repeated headers joined by commas.
pub(crate) fn signable_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut signable: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let name = name.as_str();
        if UNSIGNED_HEADERS.contains(&name) {
            continue;
        }
        let value = normalize_header_value(&String::from_utf8_lossy(value.as_bytes()));
        signable
            .entry(name.to_string())
            .and_modify(|existing| {
                existing.push(',');
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    signable
}

fn normalize_header_value(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Returns the canonical request text and the `;`-joined signed header list.
pub(crate) fn canonical_request(
    method: &str,
    url: &Url,
    headers: &BTreeMap<String, String>,
    payload_hash: &str,
) -> (String, String) {
    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect();
    let signed_headers = headers.keys().cloned().collect::<Vec<_>>().join(";");

    let canonical = format!(
        "{method}\n{}\n{}\n{canonical_headers}\n{signed_headers}\n{payload_hash}",
        canonical_uri(url),
        canonical_query(url),
    );
    (canonical, signed_headers)
}

/// The already percent-encoded path is encoded once more, leaving `/` intact.
fn canonical_uri(url: &Url) -> String {
    let path = url.path();
    if path.is_empty() {
        return "/".to_string();
    }
    utf8_percent_encode(path, PATH_ENCODE_SET).to_string()
}

pub(crate) fn canonical_query(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "X-Amz-Signature")
        .map(|(key, value)| {
            (
                utf8_percent_encode(&key, QUERY_ENCODE_SET).to_string(),
                utf8_percent_encode(&value, QUERY_ENCODE_SET).to_string(),
            )
        })
        .collect();
    pairs.sort();
    pairs
        .into_iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

pub(crate) fn string_to_sign(amz_date: &str, scope: &str, canonical_request: &str) -> String {
    format!(
        "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
        hex_sha256(canonical_request.as_bytes())
    )
}

pub(crate) fn compute_signature(
    secret_access_key: &str,
    scope_date: &str,
    region: &str,
    service: &str,
    string_to_sign: &str,
) -> Result<String, SigningError> {
    let date_key = hmac_sha256(
        format!("AWS4{secret_access_key}").as_bytes(),
        scope_date.as_bytes(),
    )?;
    let region_key = hmac_sha256(&date_key, region.as_bytes())?;
    let service_key = hmac_sha256(&region_key, service.as_bytes())?;
    let signing_key = hmac_sha256(&service_key, b"aws4_request")?;
    Ok(hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes())?))
}

fn hmac_sha256(key: &[u8], message: &[u8]) -> Result<Vec<u8>, SigningError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|err| SigningError::InvalidKey(err.to_string()))?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().to_vec())
}

pub(crate) fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    fn example_credentials() -> Credentials {
        Credentials::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY")
    }

    fn example_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0)
            .single()
            .expect("valid timestamp")
    }

    fn list_users_request() -> SignableRequest {
        let url = Url::parse("https://iam.amazonaws.com/?Action=ListUsers&Version=2010-05-08")
            .expect("url");
        let mut headers = HeaderMap::new();
        headers.insert(
            "Content-Type",
            HeaderValue::from_static("application/x-www-form-urlencoded; charset=utf-8"),
        );
        SignableRequest::new("get", url).with_headers(headers)
    }

    #[test]
    fn list_users_example_matches_published_signature() {
        let signer = SigV4Signer::new("us-east-1", "iam", example_credentials())
            .with_apply_checksum(false);
        let mut request = list_users_request();

        signer
            .sign_with(&mut request, &example_credentials(), example_time())
            .expect("signing succeeds");

        assert_eq!(request.method, "GET");
        assert_eq!(request.headers["host"], "iam.amazonaws.com");
        assert_eq!(request.headers["x-amz-date"], "20150830T123600Z");
        assert!(request.headers.get(CONTENT_SHA256_HEADER).is_none());
        assert_eq!(
            request.headers["authorization"],
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/iam/aws4_request, \
             SignedHeaders=content-type;host;x-amz-date, \
             Signature=5d672d79c15b13162d9279b0855cfba6789a8edb4c82c400e06b5924a6f2b5d7"
        );
    }

    #[test]
    fn signing_key_derivation_matches_published_signature() {
        let signature = compute_signature(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20150830",
            "us-east-1",
            "iam",
            "AWS4-HMAC-SHA256\n20150830T123600Z\n20150830/us-east-1/iam/aws4_request\n\
             f536975d06c0309214f805bb90ccff089219ecd68b2577efef23edd43b7e1a59",
        )
        .expect("any key length is accepted");

        assert_eq!(
            signature,
            "5d672d79c15b13162d9279b0855cfba6789a8edb4c82c400e06b5924a6f2b5d7"
        );
    }

    #[test]
    fn canonical_request_for_list_users_example() {
        let mut request = list_users_request();
        set_header(&mut request.headers, "host", "iam.amazonaws.com").expect("host");
        set_header(&mut request.headers, AMZ_DATE_HEADER, "20150830T123600Z").expect("date");

        let (canonical, signed_headers) = canonical_request(
            &request.method,
            &request.url,
            &signable_headers(&request.headers),
            EMPTY_SHA256,
        );

        assert_eq!(signed_headers, "content-type;host;x-amz-date");
        assert_eq!(
            hex_sha256(canonical.as_bytes()),
            "f536975d06c0309214f805bb90ccff089219ecd68b2577efef23edd43b7e1a59"
        );
    }

    #[tokio::test]
    async fn signing_is_deterministic_with_a_fixed_clock() {
        let signer = SigV4Signer::new("us-east-1", "lambda", example_credentials())
            .with_clock(example_time);

        let mut first = list_users_request().with_body(r#"{"jsonrpc":"2.0"}"#);
        let mut second = list_users_request().with_body(r#"{"jsonrpc":"2.0"}"#);
        signer.sign(&mut first).await.expect("first signature");
        signer.sign(&mut second).await.expect("second signature");

        assert_eq!(first.headers, second.headers);
        assert_eq!(
            first.headers[CONTENT_SHA256_HEADER],
            hex_sha256(br#"{"jsonrpc":"2.0"}"#).as_str()
        );
    }

    #[test]
    fn session_token_is_sent_and_signed() {
        let credentials = example_credentials().with_session_token("session-token");
        let signer = SigV4Signer::new("us-east-1", "lambda", credentials.clone());
        let mut request = list_users_request();

        signer
            .sign_with(&mut request, &credentials, example_time())
            .expect("signing succeeds");

        assert_eq!(request.headers[SECURITY_TOKEN_HEADER], "session-token");
        let authorization = request.headers["authorization"].to_str().expect("ascii");
        assert!(authorization.contains(
            "SignedHeaders=content-type;host;x-amz-content-sha256;x-amz-date;x-amz-security-token,"
        ));
    }

    #[test]
    fn transit_headers_are_not_signed() {
        let signer = SigV4Signer::new("us-east-1", "lambda", example_credentials());
        let mut request = list_users_request();
        request
            .headers
            .insert("user-agent", HeaderValue::from_static("test-agent"));
        request
            .headers
            .insert("x-amzn-trace-id", HeaderValue::from_static("Root=1-abc"));

        signer
            .sign_with(&mut request, &example_credentials(), example_time())
            .expect("signing succeeds");

        let authorization = request.headers["authorization"].to_str().expect("ascii");
        assert!(!authorization.contains("user-agent"));
        assert!(!authorization.contains("x-amzn-trace-id"));
        assert_eq!(request.headers["user-agent"], "test-agent");
    }

    #[test]
    fn non_default_port_is_part_of_the_host() {
        let url = Url::parse("http://localhost:8080/mcp").expect("url");

        assert_eq!(
            SignableRequest::new("POST", url).host().expect("host"),
            "localhost:8080"
        );
        let url = Url::parse("https://example.com:443/mcp").expect("url");
        assert_eq!(
            SignableRequest::new("POST", url).host().expect("host"),
            "example.com"
        );
    }

    #[test]
    fn query_parameters_are_sorted_and_encoded() {
        let url = Url::parse("https://example.com/?b=2&a=hello%20world&a=0&c=x~y").expect("url");

        assert_eq!(canonical_query(&url), "a=0&a=hello%20world&b=2&c=x~y");
    }

    #[test]
    fn path_segments_are_encoded_twice() {
        let url = Url::parse("https://example.com/tools/my%20tool").expect("url");

        assert_eq!(canonical_uri(&url), "/tools/my%2520tool");
    }

    #[test]
    fn header_values_are_trimmed_and_repeats_joined() {
        let mut headers = HeaderMap::new();
        headers.append("X-Custom", HeaderValue::from_static("  a   b  "));
        headers.append("x-custom", HeaderValue::from_static("c"));
        headers.append("Authorization", HeaderValue::from_static("old"));

        let signable = signable_headers(&headers);

        assert_eq!(signable.len(), 1);
        assert_eq!(signable["x-custom"], "a b,c");
    }
}
