//! Reference storage backend: a mutex-guarded map, suitable for tests and
//! single-process use. Production deployments plug their own backend into
//! `CacheStore`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use crate::entry::{variant_key, CacheEntry, CacheHit, CacheMatch, HeapResource, Resource};
use crate::http::{Headers, Method, Request};
use crate::io::Response;
use crate::store::{entry_key, uri_key, CacheStore};
use crate::Result;

#[derive(Default)]
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, Arc<CacheEntry>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Direct lookup by store key. Test and inspection helper.
    pub fn get(&self, key: &str) -> Option<Arc<CacheEntry>> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    pub fn insert(&self, key: &str, entry: Arc<CacheEntry>) {
        self.entries.lock().unwrap().insert(key.to_string(), entry);
    }

    fn vary_values(vary: &str, request: &Request) -> Headers {
        let mut values = Headers::new();
        for name in vary.split(',').map(|n| n.trim().to_lowercase()) {
            if name.is_empty() {
                continue;
            }
            values.set(name.clone(), request.header(&name).unwrap_or(""));
        }
        values
    }

    fn build_entry(
        request: &Request,
        response: &Response,
        body: Option<Vec<u8>>,
        vary_values: Headers,
        request_date: SystemTime,
        response_date: SystemTime,
    ) -> CacheEntry {
        CacheEntry::new(
            request_date,
            response_date,
            response.status,
            response.reason().to_string(),
            response.version(),
            response.headers().clone(),
            request.method.clone(),
            vary_values,
            body.map(|bytes| Arc::new(HeapResource::new(bytes)) as Arc<dyn Resource>),
        )
    }

    fn remove_with_variants(entries: &mut HashMap<String, Arc<CacheEntry>>, key: &str) {
        if let Some(entry) = entries.remove(key) {
            for leaf_key in entry.variants().values() {
                entries.remove(leaf_key);
            }
        }
    }
}

impl CacheStore for InMemoryStore {
    fn match_entry(&self, host: &str, request: &Request) -> Result<CacheMatch> {
        let entries = self.entries.lock().unwrap();
        let root_key = entry_key(host, request);
        let root = match entries.get(&root_key) {
            Some(entry) => CacheHit {
                entry_key: root_key,
                entry: entry.clone(),
            },
            None => return Ok(CacheMatch::default()),
        };
        if !root.entry.has_variants() {
            return Ok(CacheMatch {
                hit: Some(root.clone()),
                root: Some(root),
            });
        }
        let hit = root
            .entry
            .vary()
            .map(|vary| variant_key(vary, request))
            .and_then(|vkey| root.entry.variants().get(&vkey).cloned())
            .and_then(|leaf_key| {
                entries.get(&leaf_key).map(|entry| CacheHit {
                    entry_key: leaf_key,
                    entry: entry.clone(),
                })
            });
        Ok(CacheMatch {
            root: Some(root),
            hit,
        })
    }

    fn store(
        &self,
        host: &str,
        request: &Request,
        response: &Response,
        body: Option<Vec<u8>>,
        request_date: SystemTime,
        response_date: SystemTime,
    ) -> Result<CacheHit> {
        let root_key = entry_key(host, request);
        let vary = response
            .header("vary")
            .map(str::to_string)
            .filter(|v| !v.trim().is_empty());
        let mut entries = self.entries.lock().unwrap();
        match vary {
            Some(vary) => {
                let vkey = variant_key(&vary, request);
                let leaf_key = format!("{}#{}", root_key, vkey);
                let leaf = Arc::new(Self::build_entry(
                    request,
                    response,
                    body,
                    Self::vary_values(&vary, request),
                    request_date,
                    response_date,
                ));

                let mut variants = entries
                    .get(&root_key)
                    .map(|root| root.variants().clone())
                    .unwrap_or_default();
                variants.insert(vkey, leaf_key.clone());
                let mut root = Self::build_entry(
                    request,
                    response,
                    None,
                    Headers::new(),
                    request_date,
                    response_date,
                );
                root.set_variants(variants);

                entries.insert(leaf_key.clone(), leaf.clone());
                entries.insert(root_key, Arc::new(root));
                Ok(CacheHit {
                    entry_key: leaf_key,
                    entry: leaf,
                })
            }
            None => {
                let entry = Arc::new(Self::build_entry(
                    request,
                    response,
                    body,
                    Headers::new(),
                    request_date,
                    response_date,
                ));
                entries.insert(root_key.clone(), entry.clone());
                Ok(CacheHit {
                    entry_key: root_key,
                    entry,
                })
            }
        }
    }

    fn update(
        &self,
        hit: &CacheHit,
        _host: &str,
        _request: &Request,
        response: &Response,
        request_date: SystemTime,
        response_date: SystemTime,
    ) -> Result<CacheHit> {
        let updated = Arc::new(hit.entry.merged_with_304(response, request_date, response_date));
        self.entries
            .lock()
            .unwrap()
            .insert(hit.entry_key.clone(), updated.clone());
        Ok(CacheHit {
            entry_key: hit.entry_key.clone(),
            entry: updated,
        })
    }

    fn store_from_negotiated(
        &self,
        hit: &CacheHit,
        host: &str,
        request: &Request,
        response: &Response,
        request_date: SystemTime,
        response_date: SystemTime,
    ) -> Result<CacheHit> {
        let updated = Arc::new(hit.entry.merged_with_304(response, request_date, response_date));
        let mut entries = self.entries.lock().unwrap();
        entries.insert(hit.entry_key.clone(), updated.clone());

        // Re-register the leaf under the root in case the root was rebuilt
        // since the variant was stored.
        if let Some(vary) = updated.vary() {
            let root_key = entry_key(host, request);
            let vkey = variant_key(vary, request);
            if let Some(root) = entries.get(&root_key) {
                if root.variants().get(&vkey) != Some(&hit.entry_key) {
                    let mut variants = root.variants().clone();
                    variants.insert(vkey, hit.entry_key.clone());
                    let mut refreshed =
                        root.merged_with_304(response, request_date, response_date);
                    refreshed.set_variants(variants);
                    entries.insert(root_key, Arc::new(refreshed));
                }
            }
        }
        Ok(CacheHit {
            entry_key: hit.entry_key.clone(),
            entry: updated,
        })
    }

    fn evict_invalidated_entries(
        &self,
        host: &str,
        request: &Request,
        response: &Response,
    ) -> Result<()> {
        // Only successful exchanges on unsafe methods invalidate, RFC 7234
        // section 4.4.
        if request.method.is_safe() {
            return Ok(());
        }
        if !(200..400).contains(&response.status) {
            return Ok(());
        }
        let mut entries = self.entries.lock().unwrap();
        Self::remove_with_variants(&mut entries, &uri_key(host, &Method::GET, request.url()));
        for header in ["location", "content-location"] {
            if let Some(location) = response.header(header) {
                let location_host = location
                    .split_once("://")
                    .map(|(_, rest)| rest.split(['/', '?', '#']).next().unwrap_or(rest))
                    .unwrap_or(host);
                if location_host == host {
                    Self::remove_with_variants(
                        &mut entries,
                        &uri_key(host, &Method::GET, location),
                    );
                }
            }
        }
        Ok(())
    }

    fn get_variants(&self, hit: &CacheHit) -> Result<Vec<CacheHit>> {
        let entries = self.entries.lock().unwrap();
        Ok(hit
            .entry
            .variants()
            .values()
            .filter_map(|leaf_key| {
                entries.get(leaf_key).map(|entry| CacheHit {
                    entry_key: leaf_key.clone(),
                    entry: entry.clone(),
                })
            })
            .collect())
    }
}
