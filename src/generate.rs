//! Synthesizes the client-visible response from a stored entry.

use std::time::SystemTime;

use crate::entry::CacheEntry;
use crate::http::{Method, Request};
use crate::io::{Response, ResponseBody};
use crate::validity::ValidityPolicy;
use crate::Result;

// The only headers a 304 generated from an entry carries, RFC 7232
// section 4.1.
const NOT_MODIFIED_HEADERS: [&str; 7] = [
    "date",
    "etag",
    "content-location",
    "expires",
    "cache-control",
    "vary",
    "last-modified",
];

#[derive(Clone)]
pub struct CachedResponseGenerator {
    validity: ValidityPolicy,
}

impl CachedResponseGenerator {
    pub fn new(validity: ValidityPolicy) -> Self {
        CachedResponseGenerator { validity }
    }

    /// Full response from the entry, with a computed `Age` header. The body
    /// read can fail on store-backed resources; callers decide whether that
    /// falls through to the origin or becomes a 504.
    pub fn generate_response(
        &self,
        request: &Request,
        entry: &CacheEntry,
        now: SystemTime,
    ) -> Result<Response> {
        let mut headers = entry.headers.clone();
        headers.remove("transfer-encoding");
        headers.set("age", self.validity.current_age(entry, now).to_string());

        let body = if request.method == Method::HEAD || entry.status == 304 {
            None
        } else {
            entry.body_bytes()?
        };
        let mut response = Response::new()
            .with_status(entry.status)
            .with_reason(&entry.reason)
            .with_version(entry.version)
            .with_headers(headers);
        if let Some(bytes) = body {
            response.set_header("content-length", &bytes.len().to_string());
            response.set_body(ResponseBody::Bytes(bytes));
        }
        Ok(response)
    }

    /// 304 answering a conditional client request from a matching entry.
    pub fn generate_not_modified_response(&self, entry: &CacheEntry) -> Response {
        let mut response = Response::new().with_status(304).with_reason("Not Modified");
        for header in NOT_MODIFIED_HEADERS {
            if let Some(value) = entry.header(header) {
                response.set_header(header, value);
            }
        }
        response
    }

    pub fn generate_gateway_timeout(&self) -> Response {
        Response::new().with_status(504).with_reason("Gateway Timeout")
    }
}
