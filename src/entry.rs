//! Immutable cached response records and the match results the store hands
//! back to the executor.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use sha2::{Digest, Sha256};

use crate::error::CacheError;
use crate::http::{Headers, Method, Request};
use crate::io::{Response, Version};
use crate::time;
use crate::Result;

/// Stored body bytes. Backends may keep them off-heap, so reads can fail
/// with a store error.
pub trait Resource: Send + Sync {
    fn get(&self) -> Result<Vec<u8>>;
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct HeapResource(Vec<u8>);

impl HeapResource {
    pub fn new(bytes: Vec<u8>) -> Self {
        HeapResource(bytes)
    }
}

impl Resource for HeapResource {
    fn get(&self) -> Result<Vec<u8>> {
        Ok(self.0.clone())
    }

    fn len(&self) -> u64 {
        self.0.len() as u64
    }
}

/// A single cached exchange. Roots carrying a variant map never hold a body;
/// only leaf variants do.
pub struct CacheEntry {
    pub request_date: SystemTime,
    pub response_date: SystemTime,
    pub status: u16,
    pub reason: String,
    pub version: Version,
    pub headers: Headers,
    /// Method of the request that produced the entry.
    pub method: Method,
    /// Request header values selected by `Vary` at storage time.
    pub vary_values: Headers,
    body: Option<Arc<dyn Resource>>,
    /// variant-key to entry-key, present on roots with observed variants.
    variants: HashMap<String, String>,
}

impl CacheEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        request_date: SystemTime,
        response_date: SystemTime,
        status: u16,
        reason: String,
        version: Version,
        headers: Headers,
        method: Method,
        vary_values: Headers,
        body: Option<Arc<dyn Resource>>,
    ) -> Self {
        // Dates come from the same clock around one round-trip; a response
        // date earlier than the request date is clock skew.
        let response_date = response_date.max(request_date);
        CacheEntry {
            request_date,
            response_date,
            status,
            reason,
            version,
            headers,
            method,
            vary_values,
            body,
            variants: HashMap::new(),
        }
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key)
    }

    pub fn etag(&self) -> Option<&str> {
        self.header("etag")
    }

    pub fn last_modified(&self) -> Option<&str> {
        self.header("last-modified")
    }

    pub fn date(&self) -> Option<SystemTime> {
        self.header("date").and_then(time::parse_http_date)
    }

    pub fn vary(&self) -> Option<&str> {
        self.header("vary")
    }

    pub fn resource(&self) -> Option<&Arc<dyn Resource>> {
        self.body.as_ref()
    }

    pub fn body_bytes(&self) -> Result<Option<Vec<u8>>> {
        match &self.body {
            Some(resource) => Ok(Some(resource.get().map_err(|err| {
                CacheError::StoreError(format!("cached body read failed: {}", err))
            })?)),
            None => Ok(None),
        }
    }

    pub fn has_variants(&self) -> bool {
        !self.variants.is_empty()
    }

    pub fn variants(&self) -> &HashMap<String, String> {
        &self.variants
    }

    pub fn set_variants(&mut self, variants: HashMap<String, String>) {
        self.variants = variants;
    }

    /// Header union for a 304 refresh, RFC 7234 section 4.3.4: the stored
    /// body and its framing headers stay, everything the 304 carries wins.
    pub fn merged_with_304(
        &self,
        response: &Response,
        request_date: SystemTime,
        response_date: SystemTime,
    ) -> CacheEntry {
        let mut headers = self.headers.clone();
        for (name, value) in response.headers().iter() {
            match name.as_str() {
                "content-length" | "content-range" | "content-encoding" | "connection"
                | "keep-alive" | "transfer-encoding" => {}
                _ => headers.set(name.clone(), value.clone()),
            }
        }
        let mut updated = CacheEntry::new(
            request_date,
            response_date,
            self.status,
            self.reason.clone(),
            self.version,
            headers,
            self.method.clone(),
            self.vary_values.clone(),
            self.body.clone(),
        );
        updated.variants = self.variants.clone();
        updated
    }

    /// True when the stored entry carries a strictly later `Date` than the
    /// message, meaning the message came from a less up-to-date replica.
    /// Missing or unparsable dates compare as not newer.
    pub fn is_newer(entry: Option<&CacheEntry>, response: &Response) -> bool {
        let entry_date = match entry.and_then(|e| e.date()) {
            Some(date) => date,
            None => return false,
        };
        let response_date = match response.date() {
            Some(date) => date,
            None => return false,
        };
        entry_date > response_date
    }
}

/// Hash over the `Vary`-selected request header values. Entries stored under
/// the same fingerprint disambiguate through this key.
pub fn variant_key(vary: &str, request: &Request) -> String {
    let mut names: Vec<String> = vary.split(',').map(|n| n.trim().to_lowercase()).collect();
    names.sort();
    names.dedup();
    let mut hasher = Sha256::new();
    for name in names {
        hasher.update(name.as_bytes());
        hasher.update(b"=");
        hasher.update(request.header(&name).unwrap_or("").trim().as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

/// The entry matching this request, addressed by its store key.
#[derive(Clone)]
pub struct CacheHit {
    pub entry_key: String,
    pub entry: Arc<CacheEntry>,
}

/// Lookup result: `root` is the fingerprint-indexed entry (possibly a
/// variant container), `hit` the entry actually usable for this request.
#[derive(Default)]
pub struct CacheMatch {
    pub root: Option<CacheHit>,
    pub hit: Option<CacheHit>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::ResponseBody;
    use std::time::{Duration, UNIX_EPOCH};

    fn entry_with_headers(headers: Headers) -> CacheEntry {
        CacheEntry::new(
            UNIX_EPOCH,
            UNIX_EPOCH,
            200,
            "OK".to_string(),
            Version::Http11,
            headers,
            Method::GET,
            Headers::new(),
            Some(Arc::new(HeapResource::new(b"hello".to_vec()))),
        )
    }

    #[test]
    fn test_response_date_clamped_to_request_date() {
        let entry = CacheEntry::new(
            UNIX_EPOCH + Duration::from_secs(100),
            UNIX_EPOCH + Duration::from_secs(50),
            200,
            "OK".to_string(),
            Version::Http11,
            Headers::new(),
            Method::GET,
            Headers::new(),
            None,
        );
        assert_eq!(entry.request_date, entry.response_date);
    }

    #[test]
    fn test_merged_with_304_keeps_body_and_framing() {
        let mut headers = Headers::new();
        headers.set("etag", "\"v1\"");
        headers.set("content-length", "5");
        headers.set("cache-control", "max-age=60");
        let entry = entry_with_headers(headers);

        let refresh = Response::new()
            .with_status(304)
            .with_header("etag", "\"v1\"")
            .with_header("cache-control", "max-age=300")
            .with_header("content-length", "0")
            .with_body(ResponseBody::Empty);
        let t = UNIX_EPOCH + Duration::from_secs(500);
        let updated = entry.merged_with_304(&refresh, t, t);

        assert_eq!(Some("max-age=300"), updated.header("cache-control"));
        assert_eq!(Some("5"), updated.header("content-length"));
        assert_eq!(
            Some(b"hello".to_vec()),
            updated.body_bytes().unwrap()
        );
        assert_eq!(200, updated.status);
    }

    #[test]
    fn test_is_newer() {
        let mut headers = Headers::new();
        headers.set("date", "Sun, 06 Nov 1994 08:49:37 GMT");
        let entry = entry_with_headers(headers);

        let older = Response::new().with_header("date", "Sun, 06 Nov 1994 08:00:00 GMT");
        let newer = Response::new().with_header("date", "Sun, 06 Nov 1994 09:00:00 GMT");
        let undated = Response::new();

        assert!(CacheEntry::is_newer(Some(&entry), &older));
        assert!(!CacheEntry::is_newer(Some(&entry), &newer));
        assert!(!CacheEntry::is_newer(Some(&entry), &undated));
        assert!(!CacheEntry::is_newer(None, &older));
    }

    #[test]
    fn test_variant_key_depends_on_selected_headers_only() {
        let mut a = Request::new("http://example.com/a", Method::GET);
        a.set_header("Accept-Encoding", "gzip");
        a.set_header("User-Agent", "one");
        let mut b = Request::new("http://example.com/a", Method::GET);
        b.set_header("accept-encoding", "gzip");
        b.set_header("User-Agent", "two");
        assert_eq!(
            variant_key("Accept-Encoding", &a),
            variant_key("accept-encoding", &b)
        );

        let mut c = Request::new("http://example.com/a", Method::GET);
        c.set_header("Accept-Encoding", "br");
        assert_ne!(
            variant_key("Accept-Encoding", &a),
            variant_key("Accept-Encoding", &c)
        );
    }
}
