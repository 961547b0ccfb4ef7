//! Self-healing resolver with fallback chain orchestration
//!
//! Attempt order, each terminal on success:
//! original locator -> cached strategy -> generated strategies by confidence.

use crate::{
    cache::{ResolutionCache, SystemClock},
    config::HealConfig,
    errors::{LocatorError, ProbeError},
    metrics::{MetricsSnapshot, ResolverMetrics},
    probe::{execute_descriptor, DocumentProbe},
    strategies,
    types::*,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Element resolver trait
#[async_trait]
pub trait SelectorResolver: Send + Sync {
    /// Resolve `locator`, healing it when it no longer matches
    async fn resolve(
        &self,
        locator: &str,
        options: ResolveOptions,
    ) -> Result<ResolutionResult, LocatorError>;
}

/// Default resolver: original, cache, then ranked healing strategies
pub struct SelfHealingResolver {
    probe: Arc<dyn DocumentProbe>,
    cache: Arc<ResolutionCache>,
    defaults: ResolveOptions,
    metrics: ResolverMetrics,
}

impl SelfHealingResolver {
    /// Create a resolver with a private cache and default options
    pub fn new(probe: Arc<dyn DocumentProbe>) -> Self {
        Self::with_cache(probe, Arc::new(ResolutionCache::default()))
    }

    /// Create a resolver sharing an existing cache
    pub fn with_cache(probe: Arc<dyn DocumentProbe>, cache: Arc<ResolutionCache>) -> Self {
        Self {
            probe,
            cache,
            defaults: ResolveOptions::default(),
            metrics: ResolverMetrics::default(),
        }
    }

    /// Create a resolver from loaded configuration
    pub fn from_config(probe: Arc<dyn DocumentProbe>, config: &HealConfig) -> Self {
        let cache = ResolutionCache::with_clock(config.cache.windows(), Arc::new(SystemClock));
        Self::with_cache(probe, Arc::new(cache)).with_defaults(config.resolve.options())
    }

    /// Replace the options used by [`SelfHealingResolver::resolve_default`]
    pub fn with_defaults(mut self, defaults: ResolveOptions) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn default_options(&self) -> ResolveOptions {
        self.defaults.clone()
    }

    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Drop the cached strategy for one locator (e.g. after navigation)
    pub fn invalidate(&self, locator: &str) -> bool {
        self.cache.remove(locator).is_some()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Resolve with the resolver's default options
    pub async fn resolve_default(&self, locator: &str) -> Result<ResolutionResult, LocatorError> {
        self.resolve_with(locator, &self.defaults).await
    }

    /// Resolve with a text hint on top of the default options
    pub async fn resolve_with_hint(
        &self,
        locator: &str,
        hint: &str,
    ) -> Result<ResolutionResult, LocatorError> {
        let options = self.defaults.clone().with_text_hint(hint);
        self.resolve_with(locator, &options).await
    }

    async fn resolve_with(
        &self,
        locator: &str,
        options: &ResolveOptions,
    ) -> Result<ResolutionResult, LocatorError> {
        options.validate()?;
        self.metrics.record_call();
        info!("Resolving locator: {}", locator);

        let mut attempted = vec![StrategyKind::Original];
        let original = Strategy::original(locator);
        match self.execute(&original.descriptor).await {
            // Original hits are not cached, so they never trigger an eviction sweep.
            Ok(Some(element)) => {
                debug!("Original locator matched: {}", locator);
                self.metrics.record_original_hit();
                return Ok(ResolutionResult::found(element, original, false, attempted));
            }
            Ok(None) => debug!("Original locator missed: {}", locator),
            Err(err) if err.is_malformed() => {
                warn!("Original locator treated as a miss: {}", err);
                self.metrics.record_malformed();
            }
            Err(err) => return Err(err.into()),
        }

        if !options.enable_healing {
            debug!("Healing disabled; giving up on '{}'", locator);
            self.metrics.record_healing_disabled();
            return Ok(ResolutionResult::not_found(false, attempted));
        }

        let reusable = self.cache.get_reusable(locator).filter(|entry| {
            let usable = entry.strategy.confidence >= options.min_confidence;
            if !usable {
                debug!(
                    "Skipping cached strategy {} for '{}' (confidence {:.2} < {:.2})",
                    entry.strategy.name,
                    locator,
                    entry.strategy.confidence,
                    options.min_confidence
                );
            }
            usable
        });
        if let Some(entry) = reusable {
            attempted.push(StrategyKind::Cache);
            debug!(
                "Replaying cached strategy {} ({}) for '{}'",
                entry.strategy.name, entry.strategy.descriptor, locator
            );
            match self.execute_candidate(&entry.strategy).await? {
                Some(element) => {
                    self.cache.put(locator, entry.strategy.clone());
                    self.metrics.record_cache_hit();
                    info!(
                        "Resolved '{}' from cache using {} (confidence: {:.2})",
                        locator, entry.strategy.name, entry.strategy.confidence
                    );
                    return Ok(ResolutionResult::found(
                        element,
                        entry.strategy.as_cached(),
                        true,
                        attempted,
                    ));
                }
                // Stale entries stay until a later success overwrites them.
                None => debug!("Cached strategy no longer matches '{}'", locator),
            }
        }

        let candidates =
            strategies::generate(self.probe.as_ref(), locator, options.hint()).await?;

        for candidate in candidates.into_iter().take(options.max_strategies) {
            if candidate.confidence < options.min_confidence {
                debug!(
                    "Stopping at {} (confidence {:.2} < {:.2})",
                    candidate.name, candidate.confidence, options.min_confidence
                );
                break;
            }

            attempted.push(candidate.kind);
            debug!(
                "Trying strategy: {} (confidence: {:.2})",
                candidate.name, candidate.confidence
            );

            if let Some(element) = self.execute_candidate(&candidate).await? {
                info!(
                    "Healed '{}' using {} strategy {} (confidence: {:.2})",
                    locator, candidate.kind, candidate.name, candidate.confidence
                );
                self.cache.put(locator, candidate.clone());
                self.metrics.record_healed();
                return Ok(ResolutionResult::found(element, candidate, true, attempted));
            }
        }

        warn!(
            "All strategies exhausted for '{}' after {} attempts",
            locator,
            attempted.len()
        );
        self.metrics.record_exhausted();
        Ok(ResolutionResult::not_found(true, attempted))
    }

    /// Execute a healing candidate; malformed descriptors count as misses
    async fn execute_candidate(
        &self,
        strategy: &Strategy,
    ) -> Result<Option<ElementRef>, LocatorError> {
        match self.execute(&strategy.descriptor).await {
            Ok(found) => Ok(found),
            Err(err) if err.is_malformed() => {
                debug!("Strategy {} rejected by probe: {}", strategy.name, err);
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn execute(
        &self,
        descriptor: &LocatorDescriptor,
    ) -> Result<Option<ElementRef>, ProbeError> {
        self.metrics.record_probe_call();
        execute_descriptor(self.probe.as_ref(), descriptor).await
    }
}

#[async_trait]
impl SelectorResolver for SelfHealingResolver {
    async fn resolve(
        &self,
        locator: &str,
        options: ResolveOptions,
    ) -> Result<ResolutionResult, LocatorError> {
        self.resolve_with(locator, &options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Probe that records every call and answers from fixed tables
    #[derive(Default)]
    struct ScriptedProbe {
        css_hits: Vec<String>,
        text_hits: Vec<(String, String)>,
        malformed: Vec<String>,
        test_id: Option<TestIdMatch>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DocumentProbe for ScriptedProbe {
        async fn query_one(&self, locator: &str) -> Result<Option<ElementRef>, ProbeError> {
            self.calls.lock().unwrap().push(format!("css:{}", locator));
            if self.malformed.iter().any(|m| m == locator) {
                return Err(ProbeError::malformed(locator, "bad syntax"));
            }
            Ok(self
                .css_hits
                .iter()
                .any(|hit| hit == locator)
                .then(|| ElementRef::new(locator)))
        }

        async fn query_by_text(
            &self,
            tags: &[String],
            text: &str,
        ) -> Result<Option<ElementRef>, ProbeError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("text:{}:{}", tags.join("|"), text));
            Ok(self
                .text_hits
                .iter()
                .find(|(tag, hit)| tags.contains(tag) && hit.contains(text))
                .map(|(tag, _)| ElementRef::new(format!("{}-node", tag)).with_tag(tag.clone())))
        }

        async fn discover_first_test_id(&self) -> Result<Option<TestIdMatch>, ProbeError> {
            self.calls.lock().unwrap().push("discover".into());
            Ok(self.test_id.clone())
        }
    }

    fn resolver(probe: ScriptedProbe) -> (SelfHealingResolver, Arc<ScriptedProbe>) {
        let probe = Arc::new(probe);
        (SelfHealingResolver::new(probe.clone()), probe)
    }

    #[tokio::test]
    async fn test_malformed_original_falls_through() {
        let (resolver, _probe) = resolver(ScriptedProbe {
            malformed: vec!["div[".into()],
            text_hits: vec![("button".into(), "Save changes".into())],
            ..Default::default()
        });
        let result = resolver
            .resolve("div[", ResolveOptions::default().with_text_hint("Save"))
            .await
            .unwrap();
        assert!(result.is_found());
        assert_eq!(result.strategy_kind(), Some(StrategyKind::Semantic));
        assert_eq!(resolver.metrics().malformed_originals, 1);
    }

    #[tokio::test]
    async fn test_threshold_stops_before_low_confidence() {
        let (resolver, probe) = resolver(ScriptedProbe {
            css_hits: vec!["[class*=\"cta\"]".into()],
            ..Default::default()
        });
        let result = resolver
            .resolve(".cta", ResolveOptions::default().with_min_confidence(0.8))
            .await
            .unwrap();
        assert!(!result.is_found());
        assert_eq!(result.attempted_strategies, vec![StrategyKind::Original]);
        assert!(!probe
            .calls
            .lock()
            .unwrap()
            .iter()
            .any(|call| call.contains("class*=")));
    }

    #[tokio::test]
    async fn test_max_strategies_caps_attempts() {
        let (resolver, _probe) = resolver(ScriptedProbe::default());
        let result = resolver
            .resolve(
                ".gone",
                ResolveOptions::default()
                    .with_text_hint("Nowhere")
                    .with_max_strategies(3),
            )
            .await
            .unwrap();
        assert_eq!(
            result.attempted_strategies,
            vec![
                StrategyKind::Original,
                StrategyKind::Aria,
                StrategyKind::Aria,
                StrategyKind::Semantic,
            ]
        );
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        struct DeadProbe;

        #[async_trait]
        impl DocumentProbe for DeadProbe {
            async fn query_one(&self, _: &str) -> Result<Option<ElementRef>, ProbeError> {
                Err(ProbeError::Transport("connection reset".into()))
            }
            async fn query_by_text(
                &self,
                _: &[String],
                _: &str,
            ) -> Result<Option<ElementRef>, ProbeError> {
                Ok(None)
            }
            async fn discover_first_test_id(&self) -> Result<Option<TestIdMatch>, ProbeError> {
                Ok(None)
            }
        }

        let resolver = SelfHealingResolver::new(Arc::new(DeadProbe));
        let err = resolver
            .resolve("#x", ResolveOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_invalid_options_rejected_before_probing() {
        let (resolver, probe) = resolver(ScriptedProbe::default());
        let err = resolver
            .resolve("#x", ResolveOptions::default().with_max_strategies(0))
            .await
            .unwrap_err();
        assert!(matches!(err, LocatorError::InvalidOptions(_)));
        assert!(probe.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_original_hit_is_not_cached() {
        let (resolver, _probe) = resolver(ScriptedProbe {
            css_hits: vec!["#submit-btn".into()],
            ..Default::default()
        });
        let result = resolver.resolve_default("#submit-btn").await.unwrap();
        assert_eq!(result.strategy_kind(), Some(StrategyKind::Original));
        assert!(resolver.cache().is_empty());
    }
}
