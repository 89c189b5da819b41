//! Downstream chain adapter over ureq. Redirects are not followed so the
//! cache observes 3xx exchanges as they happen.

use crate::error::CacheError;
use crate::http::{Body, Headers, Request};
use crate::io::{Chain, Response, ResponseBody, Scope, Version};
use crate::Result;

pub struct UreqChain {
    agent: ureq::Agent,
}

impl UreqChain {
    pub fn new() -> Self {
        UreqChain {
            agent: ureq::builder().redirects(0).build(),
        }
    }
}

impl Default for UreqChain {
    fn default() -> Self {
        Self::new()
    }
}

impl Chain for UreqChain {
    fn proceed(&self, request: &mut Request, _scope: &mut Scope) -> Result<Response> {
        let mut ureq_req = self.agent.request(request.method.as_str(), request.url());
        for (key, value) in request.headers().iter() {
            ureq_req = ureq_req.set(key, value);
        }
        let result = match request.take_body() {
            Body::Empty => ureq_req.call(),
            Body::Bytes(bytes) => ureq_req.send_bytes(&bytes),
            Body::Stream(reader) => ureq_req.send(reader),
        };
        let response = match result {
            Ok(response) => response,
            // ureq surfaces status codes >= 400 as errors; the cache treats
            // them as ordinary responses.
            Err(ureq::Error::Status(_code, response)) => response,
            Err(err) => return Err(CacheError::HttpTransportError(err.to_string()).into()),
        };

        let version = match response.http_version() {
            "HTTP/1.0" => Version::Http10,
            _ => Version::Http11,
        };
        let status = response.status();
        let reason = response.status_text().to_string();
        let headers = response
            .headers_names()
            .iter()
            .fold(Headers::new(), |mut headers, name| {
                headers.set(
                    name.to_lowercase(),
                    response.header(name).unwrap_or_default(),
                );
                headers
            });
        Ok(Response::new()
            .with_status(status)
            .with_reason(&reason)
            .with_version(version)
            .with_headers(headers)
            .with_body(ResponseBody::Stream(Box::new(response.into_reader()))))
    }
}
