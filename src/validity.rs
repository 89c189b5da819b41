//! Freshness lifetime and current age computations, RFC 7234 sections 4.2.1
//! through 4.2.3.

use std::time::SystemTime;

use crate::config::CacheConfig;
use crate::control::ResponseCacheControl;
use crate::entry::CacheEntry;
use crate::time::{self, Seconds};

// Statuses eligible for heuristic freshness. RFC 7231 section 6.1 marks
// these as cacheable by default.
const HEURISTIC_STATUSES: [u16; 5] = [200, 203, 300, 301, 410];

#[derive(Clone)]
pub struct ValidityPolicy {
    shared_cache: bool,
    heuristic_caching_enabled: bool,
    heuristic_coefficient: f32,
    heuristic_default_lifetime: Seconds,
    heuristic_max_lifetime: Seconds,
}

impl ValidityPolicy {
    pub fn new(config: &CacheConfig) -> Self {
        ValidityPolicy {
            shared_cache: config.shared_cache,
            heuristic_caching_enabled: config.heuristic_caching_enabled,
            heuristic_coefficient: config.heuristic_coefficient,
            heuristic_default_lifetime: config.heuristic_default_lifetime,
            heuristic_max_lifetime: config.heuristic_max_lifetime,
        }
    }

    /// First of: `s-maxage` (shared caches), `max-age`, `Expires - Date`,
    /// heuristic.
    pub fn freshness_lifetime(
        &self,
        cache_control: &ResponseCacheControl,
        entry: &CacheEntry,
    ) -> Seconds {
        if self.shared_cache {
            if let Some(s_maxage) = cache_control.s_maxage {
                return s_maxage;
            }
        }
        if let Some(max_age) = cache_control.max_age {
            return max_age;
        }
        if let (Some(date), Some(expires)) = (
            entry.date(),
            entry.header("expires").and_then(time::parse_http_date),
        ) {
            return time::elapsed_seconds(date, expires);
        }
        self.heuristic_freshness_lifetime(entry)
    }

    fn heuristic_freshness_lifetime(&self, entry: &CacheEntry) -> Seconds {
        if !self.heuristic_caching_enabled || !HEURISTIC_STATUSES.contains(&entry.status) {
            return Seconds::ZERO;
        }
        let lifetime = match (
            entry.date(),
            entry.last_modified().and_then(time::parse_http_date),
        ) {
            (Some(date), Some(last_modified)) => {
                let delta = time::elapsed_seconds(last_modified, date);
                Seconds::new((*delta as f64 * self.heuristic_coefficient as f64) as u64)
            }
            _ => self.heuristic_default_lifetime,
        };
        lifetime.min(self.heuristic_max_lifetime)
    }

    /// Corrected current age, RFC 7234 section 4.2.3.
    pub fn current_age(&self, entry: &CacheEntry, now: SystemTime) -> Seconds {
        let date_value = entry.date().unwrap_or(entry.response_date);
        let apparent_age = time::elapsed_seconds(date_value, entry.response_date);
        let age_value = entry
            .header("age")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Seconds::new)
            .unwrap_or(Seconds::ZERO);
        let response_delay = time::elapsed_seconds(entry.request_date, entry.response_date);
        let corrected_age_value = age_value + response_delay;
        let corrected_initial_age = apparent_age.max(corrected_age_value);
        let resident_time = time::elapsed_seconds(entry.response_date, now);
        corrected_initial_age + resident_time
    }

    pub fn is_stale(
        &self,
        cache_control: &ResponseCacheControl,
        entry: &CacheEntry,
        now: SystemTime,
    ) -> bool {
        self.current_age(entry, now) > self.freshness_lifetime(cache_control, entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::parse_response_cache_control;
    use crate::http::{Headers, Method};
    use crate::io::Version;
    use std::time::Duration;

    const EPOCH: &str = "Thu, 01 Jan 2026 00:00:00 GMT";

    fn base() -> SystemTime {
        time::parse_http_date(EPOCH).unwrap()
    }

    fn entry(header_pairs: &[(&str, &str)], stored_at: SystemTime) -> CacheEntry {
        let mut headers = Headers::new();
        for (k, v) in header_pairs {
            headers.set(*k, *v);
        }
        CacheEntry::new(
            stored_at,
            stored_at,
            200,
            "OK".to_string(),
            Version::Http11,
            headers,
            Method::GET,
            Headers::new(),
            None,
        )
    }

    fn policy(shared: bool, heuristics: bool) -> ValidityPolicy {
        let config = CacheConfig::builder()
            .shared_cache(shared)
            .heuristic_caching_enabled(heuristics)
            .heuristic_default_lifetime(Seconds::new(30))
            .build()
            .unwrap();
        ValidityPolicy::new(&config)
    }

    fn cache_control(value: &str) -> crate::control::ResponseCacheControl {
        let mut headers = Headers::new();
        headers.set("cache-control", value);
        parse_response_cache_control(&headers)
    }

    #[test]
    fn test_lifetime_prefers_s_maxage_in_shared_cache() {
        let e = entry(&[("date", EPOCH)], base());
        let cc = cache_control("s-maxage=300, max-age=60");
        assert_eq!(
            Seconds::new(300),
            policy(true, false).freshness_lifetime(&cc, &e)
        );
        assert_eq!(
            Seconds::new(60),
            policy(false, false).freshness_lifetime(&cc, &e)
        );
    }

    #[test]
    fn test_lifetime_from_expires() {
        let e = entry(
            &[("date", EPOCH), ("expires", "Thu, 01 Jan 2026 00:02:00 GMT")],
            base(),
        );
        let cc = cache_control("");
        assert_eq!(
            Seconds::new(120),
            policy(true, false).freshness_lifetime(&cc, &e)
        );
    }

    #[test]
    fn test_expires_in_the_past_is_zero() {
        let e = entry(
            &[("date", EPOCH), ("expires", "Wed, 31 Dec 2025 00:00:00 GMT")],
            base(),
        );
        assert_eq!(
            Seconds::ZERO,
            policy(true, false).freshness_lifetime(&cache_control(""), &e)
        );
    }

    #[test]
    fn test_heuristic_lifetime_scales_last_modified_delta() {
        // Last-Modified 1000s before Date; 10% coefficient.
        let e = entry(
            &[
                ("date", EPOCH),
                ("last-modified", "Wed, 31 Dec 2025 23:43:20 GMT"),
            ],
            base(),
        );
        assert_eq!(
            Seconds::new(100),
            policy(true, true).freshness_lifetime(&cache_control(""), &e)
        );
        // Heuristics disabled: no lifetime at all.
        assert_eq!(
            Seconds::ZERO,
            policy(true, false).freshness_lifetime(&cache_control(""), &e)
        );
    }

    #[test]
    fn test_heuristic_default_when_no_last_modified() {
        let e = entry(&[("date", EPOCH)], base());
        assert_eq!(
            Seconds::new(30),
            policy(true, true).freshness_lifetime(&cache_control(""), &e)
        );
    }

    #[test]
    fn test_heuristic_not_applied_to_other_statuses() {
        let mut e = entry(&[("date", EPOCH)], base());
        e.status = 404;
        assert_eq!(
            Seconds::ZERO,
            policy(true, true).freshness_lifetime(&cache_control(""), &e)
        );
    }

    #[test]
    fn test_current_age_accumulates_resident_time() {
        let e = entry(&[("date", EPOCH)], base());
        let now = base() + Duration::from_secs(65);
        assert_eq!(Seconds::new(65), policy(true, false).current_age(&e, now));
    }

    #[test]
    fn test_current_age_includes_upstream_age_header() {
        let e = entry(&[("date", EPOCH), ("age", "40")], base());
        let now = base() + Duration::from_secs(10);
        assert_eq!(Seconds::new(50), policy(true, false).current_age(&e, now));
    }

    #[test]
    fn test_current_age_uses_apparent_age_when_date_lags() {
        // Origin Date 30s behind the observed response date.
        let stored = base() + Duration::from_secs(30);
        let e = entry(&[("date", EPOCH)], stored);
        let now = stored + Duration::from_secs(5);
        assert_eq!(Seconds::new(35), policy(true, false).current_age(&e, now));
    }

    #[test]
    fn test_is_stale() {
        let e = entry(&[("date", EPOCH)], base());
        let cc = cache_control("max-age=60");
        let p = policy(true, false);
        assert!(!p.is_stale(&cc, &e, base() + Duration::from_secs(59)));
        assert!(!p.is_stale(&cc, &e, base() + Duration::from_secs(60)));
        assert!(p.is_stale(&cc, &e, base() + Duration::from_secs(61)));
    }
}
