//! Storage facade the executor drives. Backends are expected to be
//! internally thread-safe; every operation can fail with a store error.

use std::time::SystemTime;

use sha2::{Digest, Sha256};

use crate::entry::{CacheHit, CacheMatch};
use crate::http::{Method, Request};
use crate::io::Response;
use crate::Result;

pub mod inmemory;

pub use inmemory::InMemoryStore;

pub trait CacheStore: Send + Sync {
    /// Look up the fingerprint-indexed root and the entry matching this
    /// request, resolving variant indirection.
    fn match_entry(&self, host: &str, request: &Request) -> Result<CacheMatch>;

    /// Store a drained backend response. The response carries head data
    /// only; the body travels separately.
    fn store(
        &self,
        host: &str,
        request: &Request,
        response: &Response,
        body: Option<Vec<u8>>,
        request_date: SystemTime,
        response_date: SystemTime,
    ) -> Result<CacheHit>;

    /// Refresh an entry from a 304, merging headers per RFC 7234
    /// section 4.3.4 and keeping the stored body.
    fn update(
        &self,
        hit: &CacheHit,
        host: &str,
        request: &Request,
        response: &Response,
        request_date: SystemTime,
        response_date: SystemTime,
    ) -> Result<CacheHit>;

    /// Refresh the variant selected by a negotiation 304 and re-register it
    /// under the root's variant map.
    fn store_from_negotiated(
        &self,
        hit: &CacheHit,
        host: &str,
        request: &Request,
        response: &Response,
        request_date: SystemTime,
        response_date: SystemTime,
    ) -> Result<CacheHit>;

    /// Drop entries invalidated by this exchange, RFC 7234 section 4.4. The
    /// store decides which methods and statuses actually invalidate.
    fn evict_invalidated_entries(
        &self,
        host: &str,
        request: &Request,
        response: &Response,
    ) -> Result<()>;

    /// All variant leaves reachable from a root entry.
    fn get_variants(&self, hit: &CacheHit) -> Result<Vec<CacheHit>>;
}

/// Fingerprint key: target host, effective method and effective URI. HEAD
/// folds onto GET so a HEAD probe can ride on a stored GET exchange.
pub fn entry_key(host: &str, request: &Request) -> String {
    uri_key(host, &request.method, request.url())
}

pub fn uri_key(host: &str, method: &Method, url: &str) -> String {
    let effective = match method {
        Method::HEAD => &Method::GET,
        other => other,
    };
    let mut hasher = Sha256::new();
    hasher.update(host.as_bytes());
    hasher.update(b"\n");
    hasher.update(effective.as_str().as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    format!("{:x}", hasher.finalize())
}
