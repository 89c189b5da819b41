//! Derives the conditional and unconditional requests the executor sends to
//! the origin during revalidation and variant negotiation.

use crate::control::ResponseCacheControl;
use crate::entry::CacheEntry;
use crate::http::Request;

// Preexisting client conditionals conflict with the validators the cache
// installs and are dropped from derived requests.
const CONDITIONAL_HEADERS: [&str; 5] = [
    "if-none-match",
    "if-modified-since",
    "if-match",
    "if-unmodified-since",
    "if-range",
];

#[derive(Clone, Default)]
pub struct ConditionalRequestBuilder;

impl ConditionalRequestBuilder {
    pub fn new() -> Self {
        ConditionalRequestBuilder
    }

    fn copy_without_conditionals(&self, request: &Request) -> Request {
        let mut copy = request.clone();
        for header in CONDITIONAL_HEADERS {
            copy.remove_header(header);
        }
        copy
    }

    /// Conditional revalidation of a single entry: `If-None-Match` from the
    /// entry tag, `If-Modified-Since` from `Last-Modified` with the `Date`
    /// header as fallback validator.
    pub fn build_conditional_request(
        &self,
        response_cache_control: &ResponseCacheControl,
        request: &Request,
        entry: &CacheEntry,
    ) -> Request {
        let mut conditional = self.copy_without_conditionals(request);
        if let Some(etag) = entry.etag() {
            conditional.set_header("if-none-match", etag);
        }
        match entry.last_modified() {
            Some(last_modified) => conditional.set_header("if-modified-since", last_modified),
            None => {
                if let Some(date) = entry.header("date") {
                    conditional.set_header("if-modified-since", date);
                }
            }
        }
        if response_cache_control.must_revalidate || response_cache_control.proxy_revalidate {
            // Force intermediaries to pass the validation through.
            conditional.set_header("cache-control", "max-age=0");
        }
        conditional
    }

    /// Negotiation across stored variants: one `If-None-Match` carrying every
    /// collected tag.
    pub fn build_conditional_request_from_variants(
        &self,
        request: &Request,
        etags: &[String],
    ) -> Request {
        let mut conditional = self.copy_without_conditionals(request);
        conditional.set_header("if-none-match", &etags.join(", "));
        conditional
    }

    /// Bypass every cache between here and the origin.
    pub fn build_unconditional_request(&self, request: &Request) -> Request {
        let mut unconditional = self.copy_without_conditionals(request);
        unconditional.set_header("cache-control", "no-cache");
        unconditional.set_header("pragma", "no-cache");
        unconditional
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Headers, Method};
    use crate::io::Version;
    use std::time::UNIX_EPOCH;

    fn entry(header_pairs: &[(&str, &str)]) -> CacheEntry {
        let mut headers = Headers::new();
        for (k, v) in header_pairs {
            headers.set(*k, *v);
        }
        CacheEntry::new(
            UNIX_EPOCH,
            UNIX_EPOCH,
            200,
            "OK".to_string(),
            Version::Http11,
            headers,
            Method::GET,
            Headers::new(),
            None,
        )
    }

    #[test]
    fn test_conditional_request_carries_entry_validators() {
        let e = entry(&[
            ("etag", "\"v1\""),
            ("last-modified", "Thu, 01 Jan 2026 00:00:00 GMT"),
        ]);
        let request = Request::new("http://h/a", Method::GET);
        let conditional = ConditionalRequestBuilder::new().build_conditional_request(
            &ResponseCacheControl::default(),
            &request,
            &e,
        );
        assert_eq!(Some("\"v1\""), conditional.header("if-none-match"));
        assert_eq!(
            Some("Thu, 01 Jan 2026 00:00:00 GMT"),
            conditional.header("if-modified-since")
        );
    }

    #[test]
    fn test_conditional_request_falls_back_to_date() {
        let e = entry(&[("date", "Thu, 01 Jan 2026 00:00:00 GMT")]);
        let request = Request::new("http://h/a", Method::GET);
        let conditional = ConditionalRequestBuilder::new().build_conditional_request(
            &ResponseCacheControl::default(),
            &request,
            &e,
        );
        assert_eq!(None, conditional.header("if-none-match"));
        assert_eq!(
            Some("Thu, 01 Jan 2026 00:00:00 GMT"),
            conditional.header("if-modified-since")
        );
    }

    #[test]
    fn test_conditional_request_replaces_client_conditionals() {
        let e = entry(&[("etag", "\"v1\"")]);
        let mut request = Request::new("http://h/a", Method::GET);
        request.set_header("if-none-match", "\"client\"");
        request.set_header("if-range", "\"client\"");
        let conditional = ConditionalRequestBuilder::new().build_conditional_request(
            &ResponseCacheControl::default(),
            &request,
            &e,
        );
        assert_eq!(Some("\"v1\""), conditional.header("if-none-match"));
        assert_eq!(None, conditional.header("if-range"));
        assert_eq!(None, conditional.header("if-modified-since"));
    }

    #[test]
    fn test_must_revalidate_adds_max_age_zero() {
        let e = entry(&[("etag", "\"v1\"")]);
        let mut cc = ResponseCacheControl::default();
        cc.must_revalidate = true;
        let conditional = ConditionalRequestBuilder::new().build_conditional_request(
            &cc,
            &Request::new("http://h/a", Method::GET),
            &e,
        );
        assert_eq!(Some("max-age=0"), conditional.header("cache-control"));
    }

    #[test]
    fn test_variant_conditional_joins_etags() {
        let etags = vec!["\"a\"".to_string(), "\"b\"".to_string()];
        let conditional = ConditionalRequestBuilder::new()
            .build_conditional_request_from_variants(
                &Request::new("http://h/a", Method::GET),
                &etags,
            );
        assert_eq!(Some("\"a\", \"b\""), conditional.header("if-none-match"));
    }

    #[test]
    fn test_unconditional_request_strips_and_bypasses() {
        let mut request = Request::new("http://h/a", Method::GET);
        request.set_header("if-none-match", "\"v1\"");
        request.set_header("if-modified-since", "Thu, 01 Jan 2026 00:00:00 GMT");
        let unconditional =
            ConditionalRequestBuilder::new().build_unconditional_request(&request);
        assert_eq!(None, unconditional.header("if-none-match"));
        assert_eq!(None, unconditional.header("if-modified-since"));
        assert_eq!(Some("no-cache"), unconditional.header("cache-control"));
        assert_eq!(Some("no-cache"), unconditional.header("pragma"));
    }
}
