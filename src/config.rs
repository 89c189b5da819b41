//! Cache behavior knobs. Defaults mirror a conservative shared cache: small
//! object limit, heuristics off, one background revalidation worker.

use crate::time::Seconds;

#[derive(Builder, Clone, Debug)]
#[builder(pattern = "owned", build_fn(validate = "Self::validate"))]
pub struct CacheConfig {
    /// Shared (proxy-style) cache semantics: honors `s-maxage`, refuses
    /// `private` responses and guards authorized exchanges.
    #[builder(default = "true")]
    pub shared_cache: bool,
    /// Upper bound in bytes for any cached body.
    #[builder(default = "8192")]
    pub max_object_size: u64,
    #[builder(default = "false")]
    pub heuristic_caching_enabled: bool,
    /// Fraction of (Date - Last-Modified) used as heuristic freshness.
    #[builder(default = "0.1")]
    pub heuristic_coefficient: f32,
    /// Heuristic lifetime when the entry has no `Last-Modified` to scale.
    #[builder(default = "Seconds::ZERO")]
    pub heuristic_default_lifetime: Seconds,
    /// Hard cap on any heuristically computed lifetime.
    #[builder(default = "Seconds::new(86400)")]
    pub heuristic_max_lifetime: Seconds,
    #[builder(default = "false")]
    pub never_cache_http10_responses_with_query: bool,
    #[builder(default = "false")]
    pub never_cache_http11_responses_with_query: bool,
    /// Re-read the store immediately before a write and keep whichever entry
    /// is fresher, instead of plain last-writer-wins.
    #[builder(default = "true")]
    pub freshness_check_enabled: bool,
    /// Background revalidation worker threads; 0 disables asynchronous
    /// revalidation entirely.
    #[builder(default = "1")]
    pub asynchronous_workers: usize,
    #[builder(default = "false")]
    pub stale_if_error_enabled: bool,
    /// Window applied when `stale_if_error_enabled` is set and neither side
    /// sent an explicit stale-if-error directive.
    #[builder(default = "Seconds::new(60)")]
    pub stale_if_error_default: Seconds,
    #[builder(default = "true")]
    pub stale_while_revalidate_enabled: bool,
}

impl CacheConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(coefficient) = self.heuristic_coefficient {
            if !(0.0..=1.0).contains(&coefficient) {
                return Err(format!(
                    "heuristic_coefficient must be within [0.0, 1.0], got {}",
                    coefficient
                ));
            }
        }
        Ok(())
    }
}

impl CacheConfig {
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig::builder()
            .build()
            .expect("default cache configuration is valid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert!(config.shared_cache);
        assert_eq!(8192, config.max_object_size);
        assert!(!config.heuristic_caching_enabled);
        assert_eq!(1, config.asynchronous_workers);
        assert!(!config.stale_if_error_enabled);
    }

    #[test]
    fn test_builder_overrides() {
        let config = CacheConfig::builder()
            .shared_cache(false)
            .max_object_size(1_000_000)
            .asynchronous_workers(0)
            .build()
            .unwrap();
        assert!(!config.shared_cache);
        assert_eq!(1_000_000, config.max_object_size);
        assert_eq!(0, config.asynchronous_workers);
    }

    #[test]
    fn test_builder_rejects_bad_coefficient() {
        assert!(CacheConfig::builder()
            .heuristic_coefficient(1.5)
            .build()
            .is_err());
    }
}
