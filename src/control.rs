//! Cache-Control header parsing into typed directive records, RFC 7234
//! section 5.2. Unknown directives are ignored; unparsable delta-seconds
//! drop the directive rather than the whole header.

use regex::Regex;

use crate::http::Headers;
use crate::time::Seconds;

const CACHE_CONTROL: &str = "cache-control";
const PRAGMA: &str = "pragma";

lazy_static! {
    // token ["=" (token / quoted-string)]
    static ref RE_DIRECTIVE: Regex =
        Regex::new(r#"([a-zA-Z][a-zA-Z0-9_-]*)\s*(?:=\s*(?:"([^"]*)"|([^,\s"]*)))?"#).unwrap();
}

/// Request `max-stale`: absent, bare (any staleness accepted), or bounded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MaxStale {
    #[default]
    Off,
    Unlimited,
    Limit(Seconds),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestCacheControl {
    pub no_cache: bool,
    pub no_store: bool,
    pub only_if_cached: bool,
    pub no_transform: bool,
    pub max_age: Option<Seconds>,
    pub min_fresh: Option<Seconds>,
    pub max_stale: MaxStale,
    pub stale_if_error: Option<Seconds>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResponseCacheControl {
    pub no_store: bool,
    pub no_cache: bool,
    /// Field names from the qualified `no-cache="..."` form; empty for the
    /// unqualified directive.
    pub no_cache_fields: Vec<String>,
    pub private: bool,
    pub public: bool,
    pub must_revalidate: bool,
    pub proxy_revalidate: bool,
    pub s_maxage: Option<Seconds>,
    pub max_age: Option<Seconds>,
    pub stale_while_revalidate: Option<Seconds>,
    pub stale_if_error: Option<Seconds>,
}

fn delta_seconds(value: Option<&str>) -> Option<Seconds> {
    value.and_then(|v| v.trim().parse::<u64>().ok()).map(Seconds::new)
}

fn field_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|f| f.trim().to_lowercase())
        .filter(|f| !f.is_empty())
        .collect()
}

fn directives(header: &str) -> Vec<(String, Option<String>)> {
    RE_DIRECTIVE
        .captures_iter(header)
        .map(|cap| {
            let name = cap[1].to_lowercase();
            let value = cap
                .get(2)
                .or_else(|| cap.get(3))
                .map(|m| m.as_str().to_string());
            (name, value)
        })
        .collect()
}

pub fn parse_request_cache_control(headers: &Headers) -> RequestCacheControl {
    let mut cc = RequestCacheControl::default();
    let header = match headers.get(CACHE_CONTROL) {
        Some(header) => header,
        None => {
            // Pragma is the HTTP/1.0 fallback, honored only when no
            // Cache-Control header is present. RFC 7234 section 5.4.
            if let Some(pragma) = headers.get(PRAGMA) {
                if pragma.to_lowercase().contains("no-cache") {
                    cc.no_cache = true;
                }
            }
            return cc;
        }
    };
    for (name, value) in directives(header) {
        match name.as_str() {
            "no-cache" => cc.no_cache = true,
            "no-store" => cc.no_store = true,
            "only-if-cached" => cc.only_if_cached = true,
            "no-transform" => cc.no_transform = true,
            "max-age" => cc.max_age = delta_seconds(value.as_deref()),
            "min-fresh" => cc.min_fresh = delta_seconds(value.as_deref()),
            "max-stale" => {
                cc.max_stale = match delta_seconds(value.as_deref()) {
                    Some(limit) => MaxStale::Limit(limit),
                    None => MaxStale::Unlimited,
                }
            }
            "stale-if-error" => cc.stale_if_error = delta_seconds(value.as_deref()),
            _ => {}
        }
    }
    cc
}

pub fn parse_response_cache_control(headers: &Headers) -> ResponseCacheControl {
    let mut cc = ResponseCacheControl::default();
    let header = match headers.get(CACHE_CONTROL) {
        Some(header) => header,
        None => return cc,
    };
    for (name, value) in directives(header) {
        match name.as_str() {
            "no-store" => cc.no_store = true,
            "no-cache" => {
                cc.no_cache = true;
                if let Some(fields) = value.as_deref() {
                    cc.no_cache_fields = field_list(fields);
                }
            }
            "private" => cc.private = true,
            "public" => cc.public = true,
            "must-revalidate" => cc.must_revalidate = true,
            "proxy-revalidate" => cc.proxy_revalidate = true,
            "s-maxage" => cc.s_maxage = delta_seconds(value.as_deref()),
            "max-age" => cc.max_age = delta_seconds(value.as_deref()),
            "stale-while-revalidate" => {
                cc.stale_while_revalidate = delta_seconds(value.as_deref())
            }
            "stale-if-error" => cc.stale_if_error = delta_seconds(value.as_deref()),
            _ => {}
        }
    }
    cc
}
