//! The cache decision engine: a request executor sitting between the client
//! and the downstream transport chain, transparently serving, revalidating
//! and storing responses per RFC 7234.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use crate::clock::{Clock, SystemClock};
use crate::conditional::ConditionalRequestBuilder;
use crate::config::CacheConfig;
use crate::control::{self, RequestCacheControl, ResponseCacheControl};
use crate::entry::{CacheEntry, CacheHit};
use crate::error::{is_io_error, CacheError};
use crate::generate::CachedResponseGenerator;
use crate::http::{Method, Request};
use crate::io::{CacheResponseStatus, Chain, Response, ResponseBody, Scope};
use crate::policy::{RequestCachePolicy, ResponseCachePolicy};
use crate::revalidate::{CacheRevalidator, ImmediateSchedulingStrategy};
use crate::store::CacheStore;
use crate::suitability::{CacheSuitability, SuitabilityChecker};
use crate::validity::ValidityPolicy;
use crate::Result;

/// Hit/miss/update counters, bound to the executor value they describe and
/// shared by its clones.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    updates: AtomicU64,
}

impl CacheStats {
    fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn update(&self) {
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }
}

pub struct CachingExecutor<S> {
    store: Arc<S>,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    revalidator: Option<Arc<CacheRevalidator>>,
    stats: Arc<CacheStats>,
    suitability: SuitabilityChecker,
    request_policy: RequestCachePolicy,
    response_policy: ResponseCachePolicy,
    generator: CachedResponseGenerator,
    conditional: ConditionalRequestBuilder,
}

impl<S> Clone for CachingExecutor<S> {
    fn clone(&self) -> Self {
        CachingExecutor {
            store: self.store.clone(),
            config: self.config.clone(),
            clock: self.clock.clone(),
            revalidator: self.revalidator.clone(),
            stats: self.stats.clone(),
            suitability: self.suitability.clone(),
            request_policy: self.request_policy.clone(),
            response_policy: self.response_policy.clone(),
            generator: self.generator.clone(),
            conditional: self.conditional.clone(),
        }
    }
}

impl<S: CacheStore + 'static> CachingExecutor<S> {
    pub fn new(store: Arc<S>, config: CacheConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<S>, config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let revalidator = (config.asynchronous_workers > 0).then(|| {
            Arc::new(CacheRevalidator::new(
                config.asynchronous_workers,
                Arc::new(ImmediateSchedulingStrategy),
            ))
        });
        let validity = ValidityPolicy::new(&config);
        CachingExecutor {
            suitability: SuitabilityChecker::new(&config),
            request_policy: RequestCachePolicy::new(),
            response_policy: ResponseCachePolicy::new(&config),
            generator: CachedResponseGenerator::new(validity),
            conditional: ConditionalRequestBuilder::new(),
            revalidator,
            stats: Arc::new(CacheStats::default()),
            store,
            config,
            clock,
        }
    }

    /// Replace the background revalidator built from the configuration, e.g.
    /// to share one executor or install a custom scheduling strategy. `None`
    /// turns stale-while-revalidate into synchronous revalidation.
    pub fn with_revalidator(mut self, revalidator: Option<Arc<CacheRevalidator>>) -> Self {
        self.revalidator = revalidator;
        self
    }

    pub fn revalidator(&self) -> Option<&Arc<CacheRevalidator>> {
        self.revalidator.as_ref()
    }

    pub fn cache_hits(&self) -> u64 {
        self.stats.hits()
    }

    pub fn cache_misses(&self) -> u64 {
        self.stats.misses()
    }

    pub fn cache_updates(&self) -> u64 {
        self.stats.updates()
    }

    /// Run one exchange through the cache. The response body belongs to the
    /// caller; dropping the response closes it.
    pub fn execute(
        &self,
        request: &mut Request,
        scope: &mut Scope,
        chain: &Arc<dyn Chain>,
    ) -> Result<Response> {
        let target = request.target_host().to_string();
        let request_head = request.clone();
        let result = self.do_execute(&target, request, scope, chain);
        scope.context.http_request = Some(request_head);
        match &result {
            Ok(response) => scope.context.http_response = Some(response.head()),
            Err(_) => {
                scope.context.cache_response_status = Some(CacheResponseStatus::Failure);
            }
        }
        result
    }

    fn do_execute(
        &self,
        target: &str,
        request: &mut Request,
        scope: &mut Scope,
        chain: &Arc<dyn Chain>,
    ) -> Result<Response> {
        scope.context.cache_response_status = Some(CacheResponseStatus::CacheMiss);

        if client_requests_our_options(request) {
            scope.context.cache_response_status = Some(CacheResponseStatus::CacheModuleResponse);
            return Ok(Response::new().with_status(501).with_reason("Not Implemented"));
        }
        let result = self.store.match_entry(target, request)?;

        let request_cache_control = control::parse_request_cache_control(request.headers());
        debug!("Request cache control: {:?}", request_cache_control);
        if !self
            .request_policy
            .is_servable_from_cache(&request_cache_control, request)
        {
            debug!("Request is not servable from cache");
            return self.call_backend(target, request, scope, chain);
        }

        match result.hit {
            None => {
                debug!("Cache miss");
                self.handle_cache_miss(
                    &request_cache_control,
                    result.root.as_ref(),
                    target,
                    request,
                    scope,
                    chain,
                )
            }
            Some(hit) => {
                let response_cache_control =
                    control::parse_response_cache_control(&hit.entry.headers);
                debug!("Response cache control: {:?}", response_cache_control);
                self.handle_cache_hit(
                    &request_cache_control,
                    &response_cache_control,
                    &hit,
                    target,
                    request,
                    scope,
                    chain,
                )
            }
        }
    }

    fn call_backend(
        &self,
        target: &str,
        request: &mut Request,
        scope: &mut Scope,
        chain: &Arc<dyn Chain>,
    ) -> Result<Response> {
        debug!("Calling the backend");
        let request_date = self.clock.now();
        let backend_response = chain.proceed(request, scope)?;
        self.handle_backend_response(
            target,
            request,
            request_date,
            self.clock.now(),
            backend_response,
        )
    }

    fn handle_cache_miss(
        &self,
        request_cache_control: &RequestCacheControl,
        root: Option<&CacheHit>,
        target: &str,
        request: &mut Request,
        scope: &mut Scope,
        chain: &Arc<dyn Chain>,
    ) -> Result<Response> {
        self.stats.miss();
        debug!("Request {} {}: cache miss", request.method, request.url());

        if !may_call_backend(request_cache_control) {
            scope.context.cache_response_status = Some(CacheResponseStatus::CacheModuleResponse);
            return Ok(self.generator.generate_gateway_timeout());
        }
        if let Some(root) = root {
            if root.entry.has_variants() && request.body().is_empty() {
                let variants = self.store.get_variants(root)?;
                if !variants.is_empty() {
                    return self.negotiate_response_from_variants(
                        target, request, scope, chain, variants,
                    );
                }
            }
        }
        self.call_backend(target, request, scope, chain)
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_cache_hit(
        &self,
        request_cache_control: &RequestCacheControl,
        response_cache_control: &ResponseCacheControl,
        hit: &CacheHit,
        target: &str,
        request: &mut Request,
        scope: &mut Scope,
        chain: &Arc<dyn Chain>,
    ) -> Result<Response> {
        debug!("Request {} {}: cache hit", request.method, request.url());
        scope.context.cache_response_status = Some(CacheResponseStatus::CacheHit);
        self.stats.hit();

        let now = self.clock.now();
        let suitability = self.suitability.assess(
            request_cache_control,
            response_cache_control,
            request,
            &hit.entry,
            now,
        );
        debug!("Request {} {}: {:?}", request.method, request.url(), suitability);

        if matches!(
            suitability,
            CacheSuitability::Fresh | CacheSuitability::FreshEnough
        ) {
            debug!("Cache hit is suitable");
            return match self.generate_cached_response(request, &hit.entry, now) {
                Ok(response) => Ok(response),
                Err(err) => {
                    warn!("Unable to generate response from cache entry: {}", err);
                    if !may_call_backend(request_cache_control) {
                        scope.context.cache_response_status =
                            Some(CacheResponseStatus::CacheModuleResponse);
                        return Ok(self.generator.generate_gateway_timeout());
                    }
                    scope.context.cache_response_status = Some(CacheResponseStatus::Failure);
                    chain.proceed(request, scope)
                }
            };
        }

        if !may_call_backend(request_cache_control) {
            debug!("Cache entry is not fresh and only-if-cached requested");
            scope.context.cache_response_status = Some(CacheResponseStatus::CacheModuleResponse);
            Ok(self.generator.generate_gateway_timeout())
        } else if suitability == CacheSuitability::Mismatch {
            debug!("Cache entry does not match the request; calling backend");
            self.call_backend(target, request, scope, chain)
        } else if !request.body().is_repeatable() {
            debug!("Request body is not repeatable; calling backend");
            self.call_backend(target, request, scope, chain)
        } else if hit.entry.status == 304 && !self.suitability.is_conditional(request) {
            debug!("Stored 304 cannot answer a non-conditional request; calling backend");
            self.call_backend(target, request, scope, chain)
        } else if suitability == CacheSuitability::RevalidationRequired {
            debug!("Revalidation required; revalidating cache entry");
            self.revalidate_without_fallback(
                response_cache_control,
                hit,
                target,
                request,
                scope,
                chain,
            )
        } else if suitability == CacheSuitability::StaleWhileRevalidated {
            match &self.revalidator {
                Some(revalidator) => {
                    debug!("Serving stale while revalidating asynchronously");
                    self.schedule_background_revalidation(
                        revalidator,
                        response_cache_control,
                        hit,
                        target,
                        request,
                        scope,
                        chain,
                    );
                    scope.context.cache_response_status =
                        Some(CacheResponseStatus::CacheModuleResponse);
                    self.generator.generate_response(request, &hit.entry, now)
                }
                None => {
                    debug!("Revalidating stale entry (asynchronous revalidation disabled)");
                    self.revalidate_with_fallback(
                        request_cache_control,
                        response_cache_control,
                        hit,
                        target,
                        request,
                        scope,
                        chain,
                    )
                }
            }
        } else if suitability == CacheSuitability::Stale {
            debug!("Revalidating stale cache entry");
            self.revalidate_with_fallback(
                request_cache_control,
                response_cache_control,
                hit,
                target,
                request,
                scope,
                chain,
            )
        } else {
            debug!("Cache entry not usable; calling backend");
            self.call_backend(target, request, scope, chain)
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn schedule_background_revalidation(
        &self,
        revalidator: &Arc<CacheRevalidator>,
        response_cache_control: &ResponseCacheControl,
        hit: &CacheHit,
        target: &str,
        request: &Request,
        scope: &Scope,
        chain: &Arc<dyn Chain>,
    ) {
        let executor = self.clone();
        let response_cache_control = response_cache_control.clone();
        let hit = hit.clone();
        let entry_key = hit.entry_key.clone();
        let target = target.to_string();
        let request = request.clone();
        let mut fork = scope.fork();
        let chain = Arc::clone(chain);
        revalidator.revalidate_cache_entry(
            &entry_key,
            Box::new(move || {
                executor.revalidate(
                    &response_cache_control,
                    &hit,
                    &target,
                    &request,
                    &mut fork,
                    &chain,
                )
            }),
        );
    }

    /// Conditional revalidation round-trip. Retries unconditionally when the
    /// backend replica turns out to be less up to date than the entry.
    fn revalidate(
        &self,
        response_cache_control: &ResponseCacheControl,
        hit: &CacheHit,
        target: &str,
        request: &Request,
        scope: &mut Scope,
        chain: &Arc<dyn Chain>,
    ) -> Result<Response> {
        let mut request_date = self.clock.now();
        let mut conditional = self.conditional.build_conditional_request(
            response_cache_control,
            &scope.original_request,
            &hit.entry,
        );
        let mut backend_response = chain.proceed(&mut conditional, scope)?;
        let mut response_date = self.clock.now();

        if CacheEntry::is_newer(Some(&hit.entry), &backend_response) {
            debug!("Backend replica is less up to date than the entry; retrying unconditionally");
            drop(backend_response);
            let mut unconditional = self
                .conditional
                .build_unconditional_request(&scope.original_request);
            request_date = self.clock.now();
            backend_response = chain.proceed(&mut unconditional, scope)?;
            response_date = self.clock.now();
        }

        if matches!(backend_response.status, 200 | 304) {
            scope.context.cache_response_status = Some(CacheResponseStatus::Validated);
            self.stats.update();
        }
        if backend_response.status == 304 {
            let updated = self.store.update(
                hit,
                target,
                request,
                &backend_response,
                request_date,
                response_date,
            )?;
            return self
                .generator
                .generate_response(request, &updated.entry, response_date);
        }
        self.handle_backend_response(
            target,
            &conditional,
            request_date,
            response_date,
            backend_response,
        )
    }

    /// Used for must-revalidate entries: an I/O failure yields 504, never a
    /// stale response.
    fn revalidate_without_fallback(
        &self,
        response_cache_control: &ResponseCacheControl,
        hit: &CacheHit,
        target: &str,
        request: &Request,
        scope: &mut Scope,
        chain: &Arc<dyn Chain>,
    ) -> Result<Response> {
        match self.revalidate(response_cache_control, hit, target, request, scope, chain) {
            Ok(response) => Ok(response),
            Err(err) if is_io_error(&err) => {
                debug!("Revalidation failed: {}", err);
                scope.context.cache_response_status =
                    Some(CacheResponseStatus::CacheModuleResponse);
                Ok(self.generator.generate_gateway_timeout())
            }
            Err(err) => Err(err),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn revalidate_with_fallback(
        &self,
        request_cache_control: &RequestCacheControl,
        response_cache_control: &ResponseCacheControl,
        hit: &CacheHit,
        target: &str,
        request: &Request,
        scope: &mut Scope,
        chain: &Arc<dyn Chain>,
    ) -> Result<Response> {
        let mut response =
            match self.revalidate(response_cache_control, hit, target, request, scope, chain) {
                Ok(response) => response,
                Err(err) if is_io_error(&err) => {
                    debug!("Revalidation failed: {}", err);
                    scope.context.cache_response_status =
                        Some(CacheResponseStatus::CacheModuleResponse);
                    let now = self.clock.now();
                    return if self.suitability.is_suitable_if_error(
                        request_cache_control,
                        response_cache_control,
                        &hit.entry,
                        now,
                    ) {
                        debug!("Serving stale response due to IO error and stale-if-error");
                        self.generator.generate_response(request, &hit.entry, now)
                    } else {
                        Ok(self.generator.generate_gateway_timeout())
                    };
                }
                Err(err) => return Err(err),
            };
        let now = self.clock.now();
        if stale_if_error_applies_to(response.status)
            && self.suitability.is_suitable_if_error(
                request_cache_control,
                response_cache_control,
                &hit.entry,
                now,
            )
        {
            debug!(
                "Serving stale response due to {} status and stale-if-error",
                response.status
            );
            response.drain()?;
            scope.context.cache_response_status = Some(CacheResponseStatus::CacheModuleResponse);
            return self.generator.generate_response(request, &hit.entry, now);
        }
        Ok(response)
    }

    fn handle_backend_response(
        &self,
        target: &str,
        request: &Request,
        request_date: SystemTime,
        response_date: SystemTime,
        mut backend_response: Response,
    ) -> Result<Response> {
        if let Err(err) = self
            .store
            .evict_invalidated_entries(target, request, &backend_response)
        {
            warn!("Unable to evict invalidated cache entries: {}", err);
        }
        if self.is_response_too_big(&backend_response) {
            debug!("Backend response is known to be too big");
            return Ok(backend_response);
        }
        let response_cache_control =
            control::parse_response_cache_control(backend_response.headers());
        if self.response_policy.is_response_cacheable(
            &response_cache_control,
            request,
            &backend_response,
        ) {
            store_request_if_modified_since_for_304(request, &mut backend_response);
            return self.cache_and_return_response(
                target,
                request,
                backend_response,
                request_date,
                response_date,
            );
        }
        debug!("Backend response is not cacheable");
        Ok(backend_response)
    }

    fn cache_and_return_response(
        &self,
        target: &str,
        request: &Request,
        mut backend_response: Response,
        request_sent: SystemTime,
        response_received: SystemTime,
    ) -> Result<Response> {
        debug!("Caching backend response");

        if backend_response.status == 304 {
            let result = self.store.match_entry(target, request)?;
            if let Some(hit) = result.hit {
                let updated = self.store.update(
                    &hit,
                    target,
                    request,
                    &backend_response,
                    request_sent,
                    response_received,
                )?;
                return self
                    .generator
                    .generate_response(request, &updated.entry, response_received);
            }
            // The client's own conditional exchange produced this 304 and
            // the store has nothing to refresh. Fall through and store the
            // 304 itself; the response is regenerated from that entry.
        }

        let body = match backend_response.take_body() {
            ResponseBody::Empty => None,
            ResponseBody::Bytes(bytes) => {
                if bytes.len() as u64 > self.config.max_object_size {
                    debug!("Backend response content exceeds maximum object size");
                    backend_response.set_body(ResponseBody::Bytes(bytes));
                    return Ok(backend_response);
                }
                Some(bytes)
            }
            ResponseBody::Stream(mut stream) => {
                let mut buf: Vec<u8> = Vec::with_capacity(1024);
                let mut tmp = [0u8; 2048];
                loop {
                    let read = stream
                        .read(&mut tmp)
                        .map_err(|err| CacheError::HttpTransportError(err.to_string()))?;
                    if read == 0 {
                        break;
                    }
                    buf.extend_from_slice(&tmp[..read]);
                    if buf.len() as u64 > self.config.max_object_size {
                        debug!("Backend response content exceeds maximum object size");
                        backend_response.set_body(ResponseBody::combined(buf, stream));
                        return Ok(backend_response);
                    }
                }
                Some(buf)
            }
        };

        let mut fresher = None;
        if self.config.freshness_check_enabled {
            match self.store.match_entry(target, request) {
                Ok(result) => {
                    if let Some(current) = result.hit {
                        if CacheEntry::is_newer(Some(&current.entry), &backend_response) {
                            debug!("Store already contains a fresher cache entry");
                            fresher = Some(current);
                        }
                    }
                }
                Err(err) => warn!("Freshness check failed: {}", err),
            }
        }
        let hit = match fresher {
            Some(hit) => hit,
            None => match self.store.store(
                target,
                request,
                &backend_response,
                body.clone(),
                request_sent,
                response_received,
            ) {
                Ok(hit) => {
                    debug!("Backend response successfully cached");
                    hit
                }
                Err(err) => {
                    warn!("Unable to cache backend response: {}", err);
                    if let Some(bytes) = body {
                        backend_response.set_body(ResponseBody::Bytes(bytes));
                    }
                    return Ok(backend_response);
                }
            },
        };
        self.generator
            .generate_response(request, &hit.entry, response_received)
    }

    fn negotiate_response_from_variants(
        &self,
        target: &str,
        request: &mut Request,
        scope: &mut Scope,
        chain: &Arc<dyn Chain>,
        variants: Vec<CacheHit>,
    ) -> Result<Response> {
        let mut variant_map: HashMap<String, CacheHit> = HashMap::new();
        for variant in variants {
            if let Some(etag) = variant.entry.etag() {
                variant_map.insert(etag.to_string(), variant);
            }
        }
        let etags: Vec<String> = variant_map.keys().cloned().collect();
        let mut conditional = self
            .conditional
            .build_conditional_request_from_variants(request, &etags);

        let request_date = self.clock.now();
        let backend_response = chain.proceed(&mut conditional, scope)?;
        let response_date = self.clock.now();

        if backend_response.status != 304 {
            return self.handle_backend_response(
                target,
                request,
                request_date,
                response_date,
                backend_response,
            );
        }

        let result_etag = match backend_response.header("etag") {
            Some(etag) => etag.to_string(),
            None => {
                warn!("304 response did not contain an ETag");
                drop(backend_response);
                return self.call_backend(target, request, scope, chain);
            }
        };
        let matched = match variant_map.remove(&result_etag) {
            Some(matched) => matched,
            None => {
                debug!("304 response ETag does not match any sent in If-None-Match");
                drop(backend_response);
                return self.call_backend(target, request, scope, chain);
            }
        };
        if CacheEntry::is_newer(Some(&matched.entry), &backend_response) {
            drop(backend_response);
            let mut unconditional = self.conditional.build_unconditional_request(request);
            return self.call_backend(target, &mut unconditional, scope, chain);
        }

        scope.context.cache_response_status = Some(CacheResponseStatus::Validated);
        self.stats.update();

        let hit = self.store.store_from_negotiated(
            &matched,
            target,
            request,
            &backend_response,
            request_date,
            response_date,
        )?;
        if self.should_send_not_modified(request, &hit.entry, response_date) {
            Ok(self.generator.generate_not_modified_response(&hit.entry))
        } else {
            self.generator
                .generate_response(request, &hit.entry, response_date)
        }
    }

    fn generate_cached_response(
        &self,
        request: &Request,
        entry: &CacheEntry,
        now: SystemTime,
    ) -> Result<Response> {
        if self.should_send_not_modified(request, entry, now) {
            Ok(self.generator.generate_not_modified_response(entry))
        } else {
            self.generator.generate_response(request, entry, now)
        }
    }

    fn should_send_not_modified(
        &self,
        request: &Request,
        entry: &CacheEntry,
        now: SystemTime,
    ) -> bool {
        self.suitability.is_conditional(request)
            && self.suitability.all_conditionals_match(request, entry, now)
    }

    fn is_response_too_big(&self, response: &Response) -> bool {
        response
            .content_length()
            .map(|length| length > self.config.max_object_size)
            .unwrap_or(false)
    }
}

fn may_call_backend(request_cache_control: &RequestCacheControl) -> bool {
    if request_cache_control.only_if_cached {
        debug!("Request marked only-if-cached");
        return false;
    }
    true
}

/// `OPTIONS * HTTP/1.1` with `Max-Forwards: 0` targets this hop itself.
fn client_requests_our_options(request: &Request) -> bool {
    request.method == Method::OPTIONS
        && request.url() == "*"
        && request.header("max-forwards").map(str::trim) == Some("0")
}

fn stale_if_error_applies_to(status: u16) -> bool {
    matches!(status, 500 | 502 | 503 | 504)
}

/// A 304 from a non-conditional exchange carries no validators of its own.
/// Preserve the `If-Modified-Since` the conditional request sent as the
/// entry's `Last-Modified` so future conditional requests can be formed.
fn store_request_if_modified_since_for_304(request: &Request, response: &mut Response) {
    if response.status != 304 || response.header("last-modified").is_some() {
        return;
    }
    if let Some(if_modified_since) = request.header("if-modified-since") {
        let value = if_modified_since.to_string();
        response.set_header("last-modified", &value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::test::utils::{ok_response, ChainReply, MockChain, MockClock};
    use crate::time;
    use std::time::Duration;

    const EPOCH: &str = "Thu, 01 Jan 2026 00:00:00 GMT";

    fn base() -> SystemTime {
        time::parse_http_date(EPOCH).unwrap()
    }

    fn executor(
        replies: Vec<ChainReply>,
    ) -> (
        CachingExecutor<InMemoryStore>,
        Arc<MockClock>,
        Arc<dyn Chain>,
        Arc<MockChain>,
    ) {
        let clock = Arc::new(MockClock::new(base()));
        let config = CacheConfig::builder()
            .asynchronous_workers(0)
            .build()
            .unwrap();
        let executor =
            CachingExecutor::with_clock(Arc::new(InMemoryStore::new()), config, clock.clone());
        let chain = Arc::new(MockChain::new(replies));
        (executor, clock, chain.clone() as Arc<dyn Chain>, chain)
    }

    #[test]
    fn test_options_asterisk_with_max_forwards_zero_is_intercepted() {
        let (executor, _clock, chain, mock) = executor(vec![]);
        let mut request = Request::new("*", Method::OPTIONS);
        request.set_header("max-forwards", "0");
        let mut scope = Scope::new(&request);
        let response = executor.execute(&mut request, &mut scope, &chain).unwrap();
        assert_eq!(501, response.status);
        assert_eq!(
            Some(CacheResponseStatus::CacheModuleResponse),
            scope.context.cache_response_status
        );
        assert_eq!(0, mock.calls());
    }

    #[test]
    fn test_miss_then_fresh_hit() {
        let (executor, clock, chain, mock) = executor(vec![ChainReply::Response(ok_response(
            "max-age=60",
            "hello",
            base(),
        ))]);
        let mut request = Request::new("http://example.com/a", Method::GET);
        let mut scope = Scope::new(&request);
        let mut response = executor.execute(&mut request, &mut scope, &chain).unwrap();
        assert_eq!(200, response.status);
        assert_eq!(b"hello".to_vec(), response.body_bytes().unwrap());
        assert_eq!(
            Some(CacheResponseStatus::CacheMiss),
            scope.context.cache_response_status
        );
        assert_eq!(1, executor.cache_misses());

        clock.advance(Duration::from_secs(5));
        let mut request = Request::new("http://example.com/a", Method::GET);
        let mut scope = Scope::new(&request);
        let mut response = executor.execute(&mut request, &mut scope, &chain).unwrap();
        assert_eq!(b"hello".to_vec(), response.body_bytes().unwrap());
        assert_eq!(Some("5"), response.header("age"));
        assert_eq!(
            Some(CacheResponseStatus::CacheHit),
            scope.context.cache_response_status
        );
        assert_eq!(1, executor.cache_hits());
        assert_eq!(1, mock.calls());
    }

    #[test]
    fn test_only_if_cached_miss_is_gateway_timeout() {
        let (executor, _clock, chain, mock) = executor(vec![]);
        let mut request = Request::new("http://example.com/a", Method::GET);
        request.set_header("cache-control", "only-if-cached");
        let mut scope = Scope::new(&request);
        let response = executor.execute(&mut request, &mut scope, &chain).unwrap();
        assert_eq!(504, response.status);
        assert_eq!(
            Some(CacheResponseStatus::CacheModuleResponse),
            scope.context.cache_response_status
        );
        assert_eq!(0, mock.calls());
    }

    #[test]
    fn test_conditional_client_request_on_fresh_entry_gets_304() {
        let (executor, clock, chain, _mock) = executor(vec![ChainReply::Response(
            ok_response("max-age=60", "hello", base()).with_header("etag", "\"v1\""),
        )]);
        let mut request = Request::new("http://example.com/a", Method::GET);
        let mut scope = Scope::new(&request);
        executor.execute(&mut request, &mut scope, &chain).unwrap();

        clock.advance(Duration::from_secs(5));
        let mut request = Request::new("http://example.com/a", Method::GET);
        request.set_header("if-none-match", "\"v1\"");
        let mut scope = Scope::new(&request);
        let response = executor.execute(&mut request, &mut scope, &chain).unwrap();
        assert_eq!(304, response.status);
        assert_eq!(Some("\"v1\""), response.header("etag"));
    }

    #[test]
    fn test_protocol_error_sets_failure_status() {
        let (executor, _clock, chain, _mock) =
            executor(vec![ChainReply::ProtocolError("bad gateway".to_string())]);
        let mut request = Request::new("http://example.com/a", Method::GET);
        let mut scope = Scope::new(&request);
        assert!(executor.execute(&mut request, &mut scope, &chain).is_err());
        assert_eq!(
            Some(CacheResponseStatus::Failure),
            scope.context.cache_response_status
        );
    }

    #[test]
    fn test_context_records_request_and_response_heads() {
        let (executor, _clock, chain, _mock) = executor(vec![ChainReply::Response(ok_response(
            "max-age=60",
            "hello",
            base(),
        ))]);
        let mut request = Request::new("http://example.com/a", Method::GET);
        let mut scope = Scope::new(&request);
        executor.execute(&mut request, &mut scope, &chain).unwrap();
        assert_eq!(
            "http://example.com/a",
            scope.context.http_request.as_ref().unwrap().url()
        );
        assert_eq!(200, scope.context.http_response.as_ref().unwrap().status);
    }
}
