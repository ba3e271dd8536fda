//! Command cache manager: the consumer-facing entry points.

use super::inflight::InFlightTracker;
use super::key::CacheKey;
use super::store::{CacheStats, TtlCache};
use crate::classify::classify;
use crate::config::CommandCacheConfig;
use crate::executor::{Args, CommandExecutor};
use crate::resilience::retry::Retry;
use crate::utils::millis;
use crate::{Error, Result};
use arc_swap::ArcSwap;
use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// One startup prefetch.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WarmRequest {
    pub command: String,
    #[serde(default)]
    pub args: Option<Args>,
    #[serde(default, rename = "ttl_ms", with = "opt_millis")]
    pub ttl: Option<Duration>,
}

impl WarmRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn with_args(mut self, args: Args) -> Self {
        self.args = Some(args);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

mod opt_millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarmSummary {
    pub succeeded: usize,
    pub failed: usize,
}

struct Inner {
    executor: Arc<dyn CommandExecutor>,
    cache: TtlCache,
    in_flight: InFlightTracker,
    config: ArcSwap<CommandCacheConfig>,
}

/// Caching, deduplicating front for a [`CommandExecutor`].
///
/// Cloning is cheap and every clone shares the same cache and in-flight
/// table. Construct one per application and pass it to whatever needs
/// backend data; a fresh instance is a fully isolated cache.
///
/// Backend calls run as spawned Tokio tasks, so methods that may reach the
/// backend must be called from within a Tokio runtime.
#[derive(Clone)]
pub struct CommandCache {
    inner: Arc<Inner>,
}

impl CommandCache {
    /// Uses [`CommandCacheConfig::default`].
    pub fn new(executor: impl CommandExecutor) -> Self {
        Self::build(Arc::new(executor), CommandCacheConfig::default())
    }

    pub fn with_config(executor: impl CommandExecutor, config: CommandCacheConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(Arc::new(executor), config))
    }

    pub fn from_shared(
        executor: Arc<dyn CommandExecutor>,
        config: CommandCacheConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(executor, config))
    }

    fn build(executor: Arc<dyn CommandExecutor>, config: CommandCacheConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                executor,
                cache: TtlCache::new(),
                in_flight: InFlightTracker::new(),
                config: ArcSwap::from_pointee(config),
            }),
        }
    }

    pub fn config(&self) -> Arc<CommandCacheConfig> {
        self.inner.config.load_full()
    }

    /// Swaps TTL, invalidation and retry settings; cached entries are kept.
    pub fn reload_config(&self, config: CommandCacheConfig) -> Result<()> {
        config.validate()?;
        self.inner.config.store(Arc::new(config));
        debug!("command cache config reloaded");
        Ok(())
    }

    /// TTL the per-command table assigns to `command`.
    pub fn ttl_for(&self, command: &str) -> Duration {
        self.inner.config.load().ttl_for(command)
    }

    /// Returns a fresh cached result, or fetches it once no matter how many
    /// callers ask concurrently. `ttl` defaults to [`ttl_for`](Self::ttl_for).
    pub async fn cached_invoke(
        &self,
        command: &str,
        args: Option<&Args>,
        ttl: Option<Duration>,
    ) -> Result<Value> {
        let key = CacheKey::new(command, args);
        let ttl = ttl.unwrap_or_else(|| self.ttl_for(command));
        if let Some(value) = self.inner.cache.get(key.as_str(), ttl) {
            debug!(command, key = key.as_str(), "cache hit");
            return Ok(value);
        }
        debug!(command, key = key.as_str(), ttl_ms = millis(ttl), "cache miss");

        let this = self.clone();
        let command = command.to_string();
        let args = args.cloned();
        let store_key = key.clone();
        self.inner
            .in_flight
            .dedupe(key.as_str(), move || async move {
                let value = this.execute(&command, args.as_ref()).await?;
                this.inner.cache.set(store_key.into_string(), value.clone());
                Ok(value)
            })
            .await
    }

    /// [`cached_invoke`](Self::cached_invoke) deserialized into `T`.
    pub async fn cached_invoke_as<T: DeserializeOwned>(
        &self,
        command: &str,
        args: Option<&Args>,
        ttl: Option<Duration>,
    ) -> Result<T> {
        let value = self.cached_invoke(command, args, ttl).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Deduplicates concurrent identical calls without caching the result.
    pub async fn deduplicated_invoke(&self, command: &str, args: Option<&Args>) -> Result<Value> {
        let key = CacheKey::new(command, args);
        let this = self.clone();
        let command = command.to_string();
        let args = args.cloned();
        self.inner
            .in_flight
            .dedupe(key.as_str(), move || async move {
                this.execute(&command, args.as_ref()).await
            })
            .await
    }

    /// Returns any cached value at once, fresh or not, and refreshes it in the
    /// background. Without a cached value this blocks on a normal fetch.
    pub async fn stale_while_revalidate(
        &self,
        command: &str,
        args: Option<&Args>,
        ttl: Option<Duration>,
    ) -> Result<Value> {
        let key = CacheKey::new(command, args);
        let Some((value, _age)) = self.inner.cache.peek(key.as_str()) else {
            return self.cached_invoke(command, args, ttl).await;
        };

        let this = self.clone();
        let command = command.to_string();
        let args = args.cloned();
        tokio::spawn(async move {
            if let Err(err) = this
                .cached_invoke(&command, args.as_ref(), Some(Duration::ZERO))
                .await
            {
                debug!(
                    command = command.as_str(),
                    kind = %classify(&err),
                    error = %err,
                    "background refresh failed"
                );
            }
        });
        Ok(value)
    }

    /// Prefetches every request in parallel. Failures are logged and counted,
    /// never returned.
    pub async fn warm(&self, requests: &[WarmRequest]) -> WarmSummary {
        let results = join_all(
            requests
                .iter()
                .map(|r| self.cached_invoke(&r.command, r.args.as_ref(), r.ttl)),
        )
        .await;

        let mut summary = WarmSummary::default();
        for (request, result) in requests.iter().zip(results) {
            match result {
                Ok(_) => summary.succeeded += 1,
                Err(err) => {
                    summary.failed += 1;
                    warn!(
                        command = request.command.as_str(),
                        kind = %classify(&err),
                        error = %err,
                        "cache warm-up request failed"
                    );
                }
            }
        }
        debug!(succeeded = summary.succeeded, failed = summary.failed, "cache warmed");
        summary
    }

    /// Executes a mutating command, never cached or deduplicated, and on
    /// success evicts the read commands it invalidates. Mutations are not
    /// retried.
    pub async fn invoke_mutation(&self, command: &str, args: Option<&Args>) -> Result<Value> {
        let value = self.inner.executor.execute(command, args).await?;
        self.invalidate_after_mutation(command);
        Ok(value)
    }

    /// Evicts every cached entry of the read commands `mutation` affects.
    /// Unknown mutations are a no-op. Returns the number of evicted entries.
    pub fn invalidate_after_mutation(&self, mutation: &str) -> usize {
        let config = self.inner.config.load();
        let evicted: usize = config
            .invalidation
            .dependents(mutation)
            .iter()
            .map(|read| self.inner.cache.invalidate_by_command(read))
            .sum();
        if evicted > 0 {
            debug!(mutation, evicted, "invalidated after mutation");
        }
        evicted
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.inner.cache.invalidate(key)
    }

    pub fn invalidate_by_command(&self, command: &str) -> usize {
        self.inner.cache.invalidate_by_command(command)
    }

    /// Drops all cached responses. Running calls are untouched.
    pub fn clear(&self) {
        self.inner.cache.clear();
    }

    /// Drops all cached responses and forgets running calls.
    pub fn reset(&self) {
        self.inner.cache.clear();
        self.inner.in_flight.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = self.inner.cache.stats();
        stats.dedup_joins = self.inner.in_flight.joins();
        stats.in_flight = self.inner.in_flight.len();
        stats
    }

    async fn execute(&self, command: &str, args: Option<&Args>) -> Result<Value> {
        let executor = &self.inner.executor;
        let retry = self.inner.config.load().retry.clone();
        let Some(retry) = retry else {
            return executor.execute(command, args).await;
        };
        Retry::<Error>::new(retry)
            .on_retry({
                let command = command.to_string();
                move |attempt: u32, err: &Error| {
                    debug!(
                        command = command.as_str(),
                        attempt,
                        kind = %classify(err),
                        "backend call failed, retrying"
                    );
                }
            })
            .run(move || executor.execute(command, args))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::FnExecutor;
    use crate::resilience::retry::RetryConfig;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn counting(calls: Arc<AtomicU32>) -> FnExecutor {
        FnExecutor::new(move |command, _| {
            let calls = Arc::clone(&calls);
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(json!({ "command": command, "call": n }))
            }
        })
    }

    fn no_retry() -> CommandCacheConfig {
        CommandCacheConfig::default().without_retry()
    }

    #[tokio::test(start_paused = true)]
    async fn test_hit_skips_backend() {
        let calls = Arc::new(AtomicU32::new(0));
        let cache = CommandCache::with_config(counting(Arc::clone(&calls)), no_retry()).unwrap();

        let first = cache.cached_invoke("get_status", None, None).await.unwrap();
        let second = cache.cached_invoke("get_status", None, None).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_table_ttl_applies_when_none_given() {
        let calls = Arc::new(AtomicU32::new(0));
        let cache = CommandCache::with_config(counting(Arc::clone(&calls)), no_retry()).unwrap();
        assert_eq!(cache.ttl_for("get_status"), Duration::from_secs(5));

        cache.cached_invoke("get_status", None, None).await.unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;
        cache.cached_invoke("get_status", None, None).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_typed_invoke() {
        #[derive(Deserialize)]
        struct Reply {
            call: u32,
        }
        let cache = CommandCache::with_config(counting(Arc::new(AtomicU32::new(0))), no_retry())
            .unwrap();
        let reply: Reply = cache.cached_invoke_as("get_items", None, None).await.unwrap();
        assert_eq!(reply.call, 1);

        let err = cache
            .cached_invoke_as::<Vec<String>>("get_items", None, None)
            .await
            .unwrap_err();
        assert_eq!(classify(&err), crate::ErrorKind::Parse);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_calls_are_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let exec = FnExecutor::new(move |_, _| {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(Error::backend("connection reset"))
                } else {
                    Ok(json!("ok"))
                }
            }
        });
        let config = CommandCacheConfig::default()
            .with_retry(RetryConfig::new().with_initial_delay(Duration::from_millis(5)));
        let cache = CommandCache::with_config(exec, config).unwrap();

        assert_eq!(cache.cached_invoke("get_items", None, None).await.unwrap(), json!("ok"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_not_cached() {
        let exec = FnExecutor::new(|_, _| async { Err(Error::backend("404 not found")) });
        let cache = CommandCache::with_config(exec, no_retry()).unwrap();
        let err = cache.cached_invoke("get_item", None, None).await.unwrap_err();
        assert_eq!(classify(&err), crate::ErrorKind::NotFound);
        assert_eq!(cache.stats().size, 0);
        assert_eq!(cache.stats().in_flight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_config_keeps_entries() {
        let cache = CommandCache::with_config(counting(Arc::new(AtomicU32::new(0))), no_retry())
            .unwrap();
        cache.cached_invoke("get_items", None, None).await.unwrap();
        cache
            .reload_config(CommandCacheConfig::empty().with_default_ttl(Duration::from_secs(1)))
            .unwrap();
        assert_eq!(cache.stats().size, 1);
        assert_eq!(cache.ttl_for("get_status"), Duration::from_secs(1));
        assert_eq!(cache.invalidate_after_mutation("create_item"), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config =
            CommandCacheConfig::default().with_retry(RetryConfig::new().with_backoff_factor(0.0));
        let exec = FnExecutor::new(|_, _| async { Ok(Value::Null) });
        assert!(CommandCache::with_config(exec, config).is_err());
    }

    #[test]
    fn test_warm_request_from_yaml() {
        let reqs: Vec<WarmRequest> = serde_yaml::from_str(
            "- command: get_status\n- command: get_items\n  args: { limit: 10 }\n  ttl_ms: 500\n",
        )
        .unwrap();
        assert_eq!(reqs.len(), 2);
        assert!(reqs[0].args.is_none());
        assert_eq!(reqs[1].ttl, Some(Duration::from_millis(500)));
        assert_eq!(reqs[1].args.as_ref().and_then(|a| a.get("limit")), Some(&json!(10)));
    }
}
