use crate::control::RequestCacheControl;
use crate::http::{Method, Request};

/// Gate deciding whether a request may be answered from the store at all.
/// Requests that fail here bypass the cache read path entirely; the response
/// may still be stored on the way back.
#[derive(Clone, Default)]
pub struct RequestCachePolicy;

impl RequestCachePolicy {
    pub fn new() -> Self {
        RequestCachePolicy
    }

    pub fn is_servable_from_cache(
        &self,
        cache_control: &RequestCacheControl,
        request: &Request,
    ) -> bool {
        if !matches!(request.method, Method::GET | Method::HEAD) {
            debug!("{} request is not servable from cache", request.method);
            return false;
        }
        if cache_control.no_store {
            debug!("Request with no-store is not servable from cache");
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::parse_request_cache_control;
    use crate::http::Headers;

    fn cache_control(value: &str) -> RequestCacheControl {
        let mut headers = Headers::new();
        headers.set("cache-control", value);
        parse_request_cache_control(&headers)
    }

    #[test]
    fn test_get_and_head_are_servable() {
        let policy = RequestCachePolicy::new();
        let cc = RequestCacheControl::default();
        assert!(policy.is_servable_from_cache(&cc, &Request::new("http://h/a", Method::GET)));
        assert!(policy.is_servable_from_cache(&cc, &Request::new("http://h/a", Method::HEAD)));
    }

    #[test]
    fn test_unsafe_methods_are_not_servable() {
        let policy = RequestCachePolicy::new();
        let cc = RequestCacheControl::default();
        for method in [Method::POST, Method::PUT, Method::DELETE, Method::PATCH] {
            assert!(!policy.is_servable_from_cache(&cc, &Request::new("http://h/a", method)));
        }
    }

    #[test]
    fn test_no_store_is_not_servable() {
        let policy = RequestCachePolicy::new();
        assert!(!policy.is_servable_from_cache(
            &cache_control("no-store"),
            &Request::new("http://h/a", Method::GET)
        ));
    }

    #[test]
    fn test_no_cache_is_still_servable() {
        // no-cache forces revalidation, not a cache bypass.
        let policy = RequestCachePolicy::new();
        assert!(policy.is_servable_from_cache(
            &cache_control("no-cache"),
            &Request::new("http://h/a", Method::GET)
        ));
    }
}
