//! # Rate Limiting & Cache Tests
//!
//! The token-bucket admission scenario (burst, deny, refill) through the
//! middleware chain, the cache TTL property, and end-to-end memoization.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use command_pipeline::infrastructure::cache::{CachingMiddleware, MemoryCache};
use command_pipeline::infrastructure::rate_limiting::{
    RateLimitStrategy, RateLimiter, RateLimitingMiddleware,
};
use command_pipeline_domain::entities::{CommandMetadata, ExecutionContext};
use command_pipeline_domain::events::{event_names, CollectingEventEmitter};
use command_pipeline_domain::pipeline::{Pipeline, PipelineBuilder};
use command_pipeline_domain::services::{Command, CommandHandler};
use command_pipeline_domain::value_objects::Fingerprint;
use command_pipeline_domain::PipelineError;

#[derive(Clone)]
struct Lookup {
    key: u64,
}

impl Command for Lookup {
    type Output = String;
}

struct CountingHandler {
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl CommandHandler<Lookup> for CountingHandler {
    async fn handle(&self, command: Lookup, _context: &ExecutionContext) -> Result<String, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("value-{}", command.key))
    }
}

fn context_for(user: &str) -> ExecutionContext {
    ExecutionContext::new(CommandMetadata::new().with_user_id(user))
}

/// Bucket(capacity=2, refill=1/s): allow, allow, deny,
/// deny; status reports remaining=0 and reset≈1s; after 1.1s one more
/// request is allowed.
#[tokio::test(start_paused = true)]
async fn test_token_bucket_scenario_through_chain() {
    let limiter = RateLimiter::new(RateLimitStrategy::TokenBucket {
        capacity: 2.0,
        refill_rate: 1.0,
    })
    .unwrap();

    let calls = Arc::new(AtomicU32::new(0));
    let pipeline = PipelineBuilder::new(Arc::new(CountingHandler {
        calls: Arc::clone(&calls),
    }) as Arc<dyn CommandHandler<Lookup>>)
        .with(Arc::new(RateLimitingMiddleware::new(limiter.clone())))
        .build()
        .unwrap();

    let ctx = context_for("client");

    // t=0: allow, allow, deny, deny.
    assert!(pipeline.execute(Lookup { key: 1 }, &ctx).await.is_ok());
    assert!(pipeline.execute(Lookup { key: 2 }, &ctx).await.is_ok());
    let err = pipeline.execute(Lookup { key: 3 }, &ctx).await.unwrap_err();
    assert_eq!(err.kind(), "rateLimitExceeded");
    assert!(pipeline.execute(Lookup { key: 4 }, &ctx).await.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let status = limiter.status("client");
    assert_eq!(status.remaining, 0);
    assert!(status.reset_after > Duration::from_millis(900));
    assert!(status.reset_after <= Duration::from_secs(1));

    // t=1.1s: one token refilled.
    tokio::time::advance(Duration::from_millis(1_100)).await;
    assert!(pipeline.execute(Lookup { key: 5 }, &ctx).await.is_ok());
    assert_eq!(limiter.status("client").remaining, 0);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_denial_emits_event() {
    let limiter = RateLimiter::new(RateLimitStrategy::TokenBucket {
        capacity: 1.0,
        refill_rate: 1.0,
    })
    .unwrap();

    let emitter = Arc::new(CollectingEventEmitter::new());
    let pipeline = PipelineBuilder::new(Arc::new(CountingHandler {
        calls: Arc::new(AtomicU32::new(0)),
    }) as Arc<dyn CommandHandler<Lookup>>)
        .with(Arc::new(RateLimitingMiddleware::new(limiter)))
        .build()
        .unwrap();

    let ctx = ExecutionContext::with_emitter(CommandMetadata::new().with_user_id("u"), emitter.clone());
    pipeline.execute(Lookup { key: 1 }, &ctx).await.unwrap();
    pipeline.execute(Lookup { key: 2 }, &ctx).await.unwrap_err();

    assert!(emitter
        .names()
        .iter()
        .any(|n| n == event_names::RATE_LIMIT_EXCEEDED));
}

fn fingerprint(cmd: &Lookup) -> Fingerprint {
    Fingerprint::compute("Lookup", &cmd.key.to_le_bytes())
}

/// A get strictly after put + ttl returns nothing.
#[tokio::test(start_paused = true)]
async fn test_cache_ttl_property() {
    let cache: MemoryCache<String, String> = MemoryCache::new(8).unwrap();
    cache.put("k".into(), "v".into(), Duration::from_secs(5));

    tokio::time::advance(Duration::from_secs(5) + Duration::from_millis(1)).await;
    assert_eq!(cache.get(&"k".to_string()), None);
}

#[tokio::test(start_paused = true)]
async fn test_caching_middleware_memoizes_results() {
    let calls = Arc::new(AtomicU32::new(0));
    let cache = MemoryCache::new(16).unwrap();
    let pipeline = PipelineBuilder::new(Arc::new(CountingHandler {
        calls: Arc::clone(&calls),
    }) as Arc<dyn CommandHandler<Lookup>>)
        .with(Arc::new(CachingMiddleware::new(
            cache,
            Duration::from_secs(60),
            fingerprint,
        )))
        .build()
        .unwrap();

    let ctx = context_for("u");

    // Same key: one handler execution, second call served from cache.
    assert_eq!(pipeline.execute(Lookup { key: 7 }, &ctx).await.unwrap(), "value-7");
    assert_eq!(pipeline.execute(Lookup { key: 7 }, &ctx).await.unwrap(), "value-7");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Different key misses.
    assert_eq!(pipeline.execute(Lookup { key: 8 }, &ctx).await.unwrap(), "value-8");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_caching_middleware_respects_ttl() {
    let calls = Arc::new(AtomicU32::new(0));
    let cache = MemoryCache::new(16).unwrap();
    let pipeline = PipelineBuilder::new(Arc::new(CountingHandler {
        calls: Arc::clone(&calls),
    }) as Arc<dyn CommandHandler<Lookup>>)
        .with(Arc::new(CachingMiddleware::new(
            cache,
            Duration::from_secs(1),
            fingerprint,
        )))
        .build()
        .unwrap();

    let ctx = context_for("u");
    pipeline.execute(Lookup { key: 1 }, &ctx).await.unwrap();
    tokio::time::advance(Duration::from_secs(2)).await;
    pipeline.execute(Lookup { key: 1 }, &ctx).await.unwrap();

    // The entry expired between calls, so the handler ran twice.
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_sweeper_task_drains_expired_entries() {
    let cache: MemoryCache<String, String> = MemoryCache::new(16).unwrap();
    for i in 0..4 {
        cache.put(format!("k{}", i), "v".into(), Duration::from_millis(100));
    }

    let sweeper = cache.spawn_sweeper(Duration::from_millis(200), 16);
    // Sleeping past the sweep interval lets the paused clock advance and
    // the sweeper task run.
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(cache.is_empty());

    let report = sweeper.stop().await.unwrap();
    assert_eq!(report.reclaimed, 4);
}

#[tokio::test(start_paused = true)]
async fn test_pruner_task_drops_idle_identifiers() {
    let limiter = RateLimiter::new(RateLimitStrategy::TokenBucket {
        capacity: 1.0,
        refill_rate: 1.0,
    })
    .unwrap()
    .with_inactive_after(Duration::from_secs(1));
    limiter.allow("idle-client", 1);

    let pruner = limiter.spawn_cleanup(Duration::from_secs(2));
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert_eq!(limiter.tracked_identifiers(), 0);

    let report = pruner.stop().await.unwrap();
    assert_eq!(report.reclaimed, 1);
}
