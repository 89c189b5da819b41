//! Classifies how a stored entry may satisfy the current request, and the
//! RFC 7232 conditional-match helpers the executor shares with negotiation.

use std::time::SystemTime;

use crate::config::CacheConfig;
use crate::control::{MaxStale, RequestCacheControl, ResponseCacheControl};
use crate::entry::CacheEntry;
use crate::http::{Method, Request};
use crate::time::{self, Seconds};
use crate::validity::ValidityPolicy;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheSuitability {
    /// Within its freshness lifetime and every client tolerance.
    Fresh,
    /// Stale, but the client's max-stale tolerance accepts it as-is.
    FreshEnough,
    /// Stale; revalidate, serving stale on error where directives permit.
    Stale,
    /// Stale but inside the stale-while-revalidate window.
    StaleWhileRevalidated,
    /// Must not be used without successful revalidation.
    RevalidationRequired,
    /// Entry does not apply to this request (method or variant mismatch).
    Mismatch,
}

#[derive(Clone)]
pub struct SuitabilityChecker {
    validity: ValidityPolicy,
    shared_cache: bool,
    stale_while_revalidate_enabled: bool,
    stale_if_error_enabled: bool,
    stale_if_error_default: Seconds,
}

impl SuitabilityChecker {
    pub fn new(config: &CacheConfig) -> Self {
        SuitabilityChecker {
            validity: ValidityPolicy::new(config),
            shared_cache: config.shared_cache,
            stale_while_revalidate_enabled: config.stale_while_revalidate_enabled,
            stale_if_error_enabled: config.stale_if_error_enabled,
            stale_if_error_default: config.stale_if_error_default,
        }
    }

    pub fn assess(
        &self,
        request_cache_control: &RequestCacheControl,
        response_cache_control: &ResponseCacheControl,
        request: &Request,
        entry: &CacheEntry,
        now: SystemTime,
    ) -> CacheSuitability {
        if !method_match(request, entry) || !self.variant_match(request, entry) {
            return CacheSuitability::Mismatch;
        }
        if request_cache_control.no_cache || response_cache_control.no_cache {
            return CacheSuitability::RevalidationRequired;
        }
        let age = self.validity.current_age(entry, now);
        let lifetime = self
            .validity
            .freshness_lifetime(response_cache_control, entry);
        if age > lifetime {
            if response_cache_control.must_revalidate
                || (self.shared_cache && response_cache_control.proxy_revalidate)
            {
                return CacheSuitability::RevalidationRequired;
            }
            match request_cache_control.max_stale {
                MaxStale::Unlimited => return CacheSuitability::FreshEnough,
                MaxStale::Limit(limit) if age <= lifetime + limit => {
                    return CacheSuitability::FreshEnough;
                }
                _ => {}
            }
            if self.stale_while_revalidate_enabled && self.shared_cache {
                if let Some(window) = response_cache_control.stale_while_revalidate {
                    if age <= lifetime + window {
                        return CacheSuitability::StaleWhileRevalidated;
                    }
                }
            }
            return CacheSuitability::Stale;
        }
        if let Some(max_age) = request_cache_control.max_age {
            if age > max_age {
                return CacheSuitability::Stale;
            }
        }
        if let Some(min_fresh) = request_cache_control.min_fresh {
            if age + min_fresh > lifetime {
                return CacheSuitability::Stale;
            }
        }
        CacheSuitability::Fresh
    }

    fn variant_match(&self, request: &Request, entry: &CacheEntry) -> bool {
        let vary = match entry.vary() {
            Some(vary) => vary,
            None => return true,
        };
        for name in vary.split(',').map(|n| n.trim().to_lowercase()) {
            if name == "*" {
                return false;
            }
            let requested = request.header(&name).unwrap_or("").trim();
            let stored = entry.vary_values.get(&name).unwrap_or("").trim();
            if requested != stored {
                return false;
            }
        }
        true
    }

    /// True when serving the stale entry in place of an origin failure is
    /// permitted by the stale-if-error machinery.
    pub fn is_suitable_if_error(
        &self,
        request_cache_control: &RequestCacheControl,
        response_cache_control: &ResponseCacheControl,
        entry: &CacheEntry,
        now: SystemTime,
    ) -> bool {
        if response_cache_control.must_revalidate {
            return false;
        }
        let age = self.validity.current_age(entry, now);
        let lifetime = self
            .validity
            .freshness_lifetime(response_cache_control, entry);
        if age <= lifetime {
            return true;
        }
        let window = request_cache_control
            .stale_if_error
            .or(response_cache_control.stale_if_error)
            .or_else(|| {
                self.stale_if_error_enabled
                    .then_some(self.stale_if_error_default)
            });
        match window {
            Some(window) => age <= lifetime + window,
            None => false,
        }
    }

    pub fn is_conditional(&self, request: &Request) -> bool {
        request.header("if-none-match").is_some() || request.header("if-modified-since").is_some()
    }

    /// RFC 7232 evaluation of the request conditionals against the entry.
    /// `If-None-Match` takes precedence over `If-Modified-Since`.
    pub fn all_conditionals_match(
        &self,
        request: &Request,
        entry: &CacheEntry,
        now: SystemTime,
    ) -> bool {
        if let Some(if_none_match) = request.header("if-none-match") {
            return etag_matches(if_none_match, entry.etag());
        }
        if let Some(if_modified_since) = request
            .header("if-modified-since")
            .and_then(time::parse_http_date)
        {
            if if_modified_since > now {
                return false;
            }
            if let Some(last_modified) = entry.last_modified().and_then(time::parse_http_date) {
                return last_modified <= if_modified_since;
            }
        }
        false
    }
}

fn method_match(request: &Request, entry: &CacheEntry) -> bool {
    request.method == entry.method || (request.method == Method::HEAD && entry.method == Method::GET)
}

/// Weak comparison of an `If-None-Match` field against the entry tag.
fn etag_matches(if_none_match: &str, entry_etag: Option<&str>) -> bool {
    let entry_etag = match entry_etag {
        Some(etag) => opaque_tag(etag),
        None => return false,
    };
    if_none_match.split(',').map(str::trim).any(|candidate| {
        candidate == "*" || opaque_tag(candidate) == entry_etag
    })
}

fn opaque_tag(etag: &str) -> &str {
    etag.trim().trim_start_matches("W/")
}
