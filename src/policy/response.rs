use crate::config::CacheConfig;
use crate::control::{parse_request_cache_control, ResponseCacheControl};
use crate::http::{Method, Request};
use crate::io::{Response, Version};

// Statuses storable without explicit freshness information, RFC 7231
// section 6.1.
const CACHEABLE_STATUSES: [u16; 11] = [200, 203, 204, 300, 301, 304, 404, 405, 410, 414, 501];

/// Decides whether a backend response may be written to the store.
#[derive(Clone)]
pub struct ResponseCachePolicy {
    shared_cache: bool,
    never_cache_http10_responses_with_query: bool,
    never_cache_http11_responses_with_query: bool,
}

impl ResponseCachePolicy {
    pub fn new(config: &CacheConfig) -> Self {
        ResponseCachePolicy {
            shared_cache: config.shared_cache,
            never_cache_http10_responses_with_query: config
                .never_cache_http10_responses_with_query,
            never_cache_http11_responses_with_query: config
                .never_cache_http11_responses_with_query,
        }
    }

    pub fn is_response_cacheable(
        &self,
        cache_control: &ResponseCacheControl,
        request: &Request,
        response: &Response,
    ) -> bool {
        if !matches!(request.method, Method::GET | Method::HEAD) {
            debug!("{} responses are not cacheable", request.method);
            return false;
        }
        let request_cache_control = parse_request_cache_control(request.headers());
        if request_cache_control.no_store {
            debug!("Request no-store forbids storing the response");
            return false;
        }
        if cache_control.no_store {
            debug!("Response no-store forbids storing");
            return false;
        }
        if self.shared_cache {
            if cache_control.private {
                debug!("Shared cache refuses private response");
                return false;
            }
            // An authorized exchange is only storable in a shared cache when
            // the response makes shareability explicit. RFC 7234 section 3.2.
            if request.headers().contains("authorization")
                && !cache_control.public
                && cache_control.s_maxage.is_none()
                && !cache_control.must_revalidate
            {
                debug!("Authorized response without explicit shareability");
                return false;
            }
        }
        if response
            .header("vary")
            .map(|v| v.split(',').any(|f| f.trim() == "*"))
            .unwrap_or(false)
        {
            debug!("Vary: * responses are not cacheable");
            return false;
        }
        if response.status == 206 {
            return false;
        }
        if request.has_query() {
            match response.version() {
                Version::Http10 if self.never_cache_http10_responses_with_query => {
                    return false;
                }
                Version::Http11 if self.never_cache_http11_responses_with_query => {
                    return false;
                }
                _ => {}
            }
        }
        if CACHEABLE_STATUSES.contains(&response.status) {
            return true;
        }
        // Other statuses need explicit freshness information.
        cache_control.max_age.is_some()
            || cache_control.s_maxage.is_some()
            || cache_control.public
            || response.header("expires").is_some()
    }
}
