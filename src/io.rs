//! Response, downstream chain and per-exchange context types. The cache sits
//! between a client and the transport chain; everything that crosses that
//! boundary is defined here.

use std::fmt;
use std::io::Read;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use crate::http::{Headers, Request};
use crate::{error::CacheError, time, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Version {
    Http10,
    #[default]
    Http11,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Version::Http10 => write!(f, "HTTP/1.0"),
            Version::Http11 => write!(f, "HTTP/1.1"),
        }
    }
}

pub enum ResponseBody {
    Empty,
    Bytes(Vec<u8>),
    Stream(Box<dyn Read + Send>),
}

impl ResponseBody {
    /// Chain an already-drained prefix back onto the unread remainder, so the
    /// client still observes the full payload after an aborted cache drain.
    pub fn combined(prefix: Vec<u8>, rest: Box<dyn Read + Send>) -> Self {
        ResponseBody::Stream(Box::new(std::io::Cursor::new(prefix).chain(rest)))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ResponseBody::Empty)
    }
}

impl Default for ResponseBody {
    fn default() -> Self {
        ResponseBody::Empty
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Empty => write!(f, "ResponseBody::Empty"),
            ResponseBody::Bytes(b) => write!(f, "ResponseBody::Bytes({} bytes)", b.len()),
            ResponseBody::Stream(_) => write!(f, "ResponseBody::Stream"),
        }
    }
}

/// Response head without the body, recorded in the exchange context and used
/// by the store when the body travels separately.
#[derive(Clone, Debug)]
pub struct ResponseHead {
    pub status: u16,
    pub reason: String,
    pub version: Version,
    pub headers: Headers,
}

/// Adapts downstream transport output to a common response. Dropping a
/// response closes its body; `drain` consumes it first when the bytes must
/// not reach the client.
#[derive(Debug, Default)]
pub struct Response {
    pub status: u16,
    reason: String,
    version: Version,
    headers: Headers,
    body: ResponseBody,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = reason.to_string();
        self
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.set(key, value);
        self
    }

    pub fn with_body(mut self, body: ResponseBody) -> Self {
        self.body = body;
        self
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key)
    }

    pub fn set_header(&mut self, key: &str, value: &str) {
        self.headers.set(key, value);
    }

    pub fn date(&self) -> Option<SystemTime> {
        self.header("date").and_then(time::parse_http_date)
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length")
            .and_then(|v| v.trim().parse::<u64>().ok())
    }

    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    pub fn take_body(&mut self) -> ResponseBody {
        std::mem::take(&mut self.body)
    }

    pub fn set_body(&mut self, body: ResponseBody) {
        self.body = body;
    }

    /// Read the body to completion and discard the bytes. Used before serving
    /// a stale entry in place of a 5xx so the connection is left clean.
    pub fn drain(&mut self) -> Result<()> {
        match self.take_body() {
            ResponseBody::Empty | ResponseBody::Bytes(_) => Ok(()),
            ResponseBody::Stream(mut stream) => {
                std::io::copy(&mut stream, &mut std::io::sink())
                    .map_err(|err| CacheError::HttpTransportError(err.to_string()))?;
                Ok(())
            }
        }
    }

    /// Collect the remaining body into memory. Test helper and small-payload
    /// convenience; the executor itself drains with a bounded buffer.
    pub fn body_bytes(&mut self) -> Result<Vec<u8>> {
        match self.take_body() {
            ResponseBody::Empty => Ok(Vec::new()),
            ResponseBody::Bytes(b) => Ok(b),
            ResponseBody::Stream(mut stream) => {
                let mut buf = Vec::new();
                stream
                    .read_to_end(&mut buf)
                    .map_err(|err| CacheError::HttpTransportError(err.to_string()))?;
                Ok(buf)
            }
        }
    }

    pub fn head(&self) -> ResponseHead {
        ResponseHead {
            status: self.status,
            reason: self.reason.clone(),
            version: self.version,
            headers: self.headers.clone(),
        }
    }
}

/// How the cache disposed of a request, recorded in the exchange context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheResponseStatus {
    CacheMiss,
    CacheHit,
    Validated,
    CacheModuleResponse,
    Failure,
}

/// Typed per-exchange attribute bag. One value slot per key the cache
/// publishes; consumers read it after `execute` returns.
#[derive(Debug, Default)]
pub struct ExchangeContext {
    pub cache_response_status: Option<CacheResponseStatus>,
    pub http_request: Option<Request>,
    pub http_response: Option<ResponseHead>,
}

static EXCHANGE_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_exchange_id() -> String {
    format!("ex-{:010}", EXCHANGE_COUNTER.fetch_add(1, Ordering::Relaxed) + 1)
}

/// Route and per-exchange state handed through the chain. Background
/// revalidations run on a fork with its own exchange id and a fresh context
/// so the foreground caller's attributes stay untouched.
#[derive(Debug)]
pub struct Scope {
    pub exchange_id: String,
    pub original_request: Request,
    pub context: ExchangeContext,
}

impl Scope {
    pub fn new(request: &Request) -> Self {
        Scope {
            exchange_id: next_exchange_id(),
            original_request: request.clone(),
            context: ExchangeContext::default(),
        }
    }

    pub fn fork(&self) -> Scope {
        Scope {
            exchange_id: next_exchange_id(),
            original_request: self.original_request.clone(),
            context: ExchangeContext::default(),
        }
    }
}

/// Downstream request execution chain. The transport behind it performs the
/// actual round-trip; the cache only decides when to call it.
pub trait Chain: Send + Sync {
    fn proceed(&self, request: &mut Request, scope: &mut Scope) -> Result<Response>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;

    #[test]
    fn test_combined_body_yields_prefix_then_rest() {
        let rest: Box<dyn Read + Send> = Box::new(std::io::Cursor::new(b" world".to_vec()));
        let mut response = Response::new()
            .with_status(200)
            .with_body(ResponseBody::combined(b"hello".to_vec(), rest));
        assert_eq!(b"hello world".to_vec(), response.body_bytes().unwrap());
    }

    #[test]
    fn test_content_length() {
        let response = Response::new().with_header("Content-Length", "42");
        assert_eq!(Some(42), response.content_length());
        let response = Response::new().with_header("content-length", "garbage");
        assert_eq!(None, response.content_length());
    }

    #[test]
    fn test_fork_gets_fresh_context_and_new_exchange_id() {
        let request = Request::new("http://example.com/a", Method::GET);
        let mut scope = Scope::new(&request);
        scope.context.cache_response_status = Some(CacheResponseStatus::CacheHit);
        let fork = scope.fork();
        assert_ne!(scope.exchange_id, fork.exchange_id);
        assert!(fork.context.cache_response_status.is_none());
        assert_eq!("http://example.com/a", fork.original_request.url());
    }
}
