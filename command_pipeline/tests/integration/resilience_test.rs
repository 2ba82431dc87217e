//! # Resilience Tests
//!
//! Circuit breaker trip/cooldown/recovery through a real chain, timeout
//! budget inheritance, retry semantics (recovery, exhaustion, the
//! single-attempt boundary), and bulkhead isolation.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use command_pipeline::infrastructure::resilience::{
    BackoffPolicy, BulkheadMiddleware, CircuitBreakerConfig, CircuitBreakerMiddleware, CircuitState,
    RetryConfig, RetryMiddleware, TimeoutMiddleware,
};
use command_pipeline::infrastructure::runtime::{BackPressureConfig, BackPressureStrategy};
use command_pipeline_domain::entities::{CommandMetadata, ExecutionContext};
use command_pipeline_domain::pipeline::{Pipeline, PipelineBuilder};
use command_pipeline_domain::services::{Command, CommandHandler};
use command_pipeline_domain::value_objects::MiddlewarePriority;
use command_pipeline_domain::PipelineError;

#[derive(Clone)]
struct Work;

impl Command for Work {
    type Output = &'static str;
}

/// Handler whose outcome is controlled by a shared failure switch.
struct SwitchedHandler {
    fail: Arc<AtomicBool>,
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl CommandHandler<Work> for SwitchedHandler {
    async fn handle(&self, _command: Work, _context: &ExecutionContext) -> Result<&'static str, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            Err(PipelineError::timeout(Duration::from_millis(5)))
        } else {
            Ok("done")
        }
    }
}

/// Handler that fails a fixed number of times before succeeding.
struct EventuallyOk {
    failures_left: Arc<AtomicU32>,
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl CommandHandler<Work> for EventuallyOk {
    async fn handle(&self, _command: Work, _context: &ExecutionContext) -> Result<&'static str, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_left.store(remaining - 1, Ordering::SeqCst);
            Err(PipelineError::timeout(Duration::from_millis(5)))
        } else {
            Ok("recovered")
        }
    }
}

struct SleepyHandler {
    sleep: Duration,
}

#[async_trait]
impl CommandHandler<Work> for SleepyHandler {
    async fn handle(&self, _command: Work, _context: &ExecutionContext) -> Result<&'static str, PipelineError> {
        tokio::time::sleep(self.sleep).await;
        Ok("slept")
    }
}

fn context() -> ExecutionContext {
    ExecutionContext::new(CommandMetadata::new())
}

fn retry(max_attempts: u32) -> RetryMiddleware {
    RetryMiddleware::new(RetryConfig {
        max_attempts,
        policy: BackoffPolicy::Fixed(Duration::from_millis(10)),
        jitter: false,
    })
    .unwrap()
}

/// Threshold 3, cooldown 2s: three failures open the
/// breaker, the fourth call never reaches the handler, and the first
/// call after the cooldown closes it again.
#[tokio::test(start_paused = true)]
async fn test_circuit_breaker_scenario() {
    let fail = Arc::new(AtomicBool::new(true));
    let calls = Arc::new(AtomicU32::new(0));

    let breaker_mw = CircuitBreakerMiddleware::from_config(CircuitBreakerConfig {
        failure_threshold: 3,
        failure_window: Duration::from_secs(60),
        cooldown: Duration::from_secs(2),
        half_open_max_probes: 1,
    })
    .unwrap();
    let breaker = breaker_mw.breaker().clone();

    let pipeline = PipelineBuilder::new(Arc::new(SwitchedHandler {
        fail: Arc::clone(&fail),
        calls: Arc::clone(&calls),
    }) as Arc<dyn CommandHandler<Work>>)
        .with(Arc::new(breaker_mw))
        .build()
        .unwrap();

    let ctx = context();

    // Three consecutive failures trip the breaker.
    for _ in 0..3 {
        assert!(pipeline.execute(Work, &ctx).await.is_err());
    }
    assert_eq!(breaker.state(), CircuitState::Open);
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    // While open, the handler is not invoked.
    let err = pipeline.execute(Work, &ctx).await.unwrap_err();
    assert_eq!(err.kind(), "circuitBreakerOpen");
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    // After the cooldown the first call is admitted as a probe; its
    // success closes the breaker.
    tokio::time::advance(Duration::from_secs(2)).await;
    fail.store(false, Ordering::SeqCst);
    assert_eq!(pipeline.execute(Work, &ctx).await.unwrap(), "done");
    assert_eq!(breaker.state(), CircuitState::Closed);
}

/// An outer 100ms budget caps an inner 500ms request.
#[tokio::test(start_paused = true)]
async fn test_timeout_budget_inheritance() {
    let pipeline = PipelineBuilder::new(Arc::new(SleepyHandler {
        sleep: Duration::from_secs(10),
    }) as Arc<dyn CommandHandler<Work>>)
        .with(Arc::new(
            TimeoutMiddleware::new(Duration::from_millis(100))
                .unwrap()
                .with_priority(MiddlewarePriority::new(100)),
        ))
        .with(Arc::new(
            TimeoutMiddleware::new(Duration::from_millis(500))
                .unwrap()
                .with_priority(MiddlewarePriority::new(200)),
        ))
        .build()
        .unwrap();

    let err = pipeline.execute(Work, &context()).await.unwrap_err();
    match err {
        PipelineError::TimeoutError(budget) => {
            // Effective budget is the outer 100ms, never the inner 500ms.
            assert!(budget <= Duration::from_millis(100), "budget was {:?}", budget);
            assert!(budget >= Duration::from_millis(50), "budget was {:?}", budget);
        }
        other => panic!("expected TimeoutError, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_retry_recovers_after_transient_failures() {
    let calls = Arc::new(AtomicU32::new(0));
    let pipeline = PipelineBuilder::new(Arc::new(EventuallyOk {
        failures_left: Arc::new(AtomicU32::new(2)),
        calls: Arc::clone(&calls),
    }) as Arc<dyn CommandHandler<Work>>)
        .with(Arc::new(retry(3)))
        .build()
        .unwrap();

    assert_eq!(pipeline.execute(Work, &context()).await.unwrap(), "recovered");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_retry_exhaustion_wraps_last_error() {
    let fail = Arc::new(AtomicBool::new(true));
    let pipeline = PipelineBuilder::new(Arc::new(SwitchedHandler {
        fail,
        calls: Arc::new(AtomicU32::new(0)),
    }) as Arc<dyn CommandHandler<Work>>)
        .with(Arc::new(retry(3)))
        .build()
        .unwrap();

    let err = pipeline.execute(Work, &context()).await.unwrap_err();
    match err {
        PipelineError::RetryExhausted { attempts, last_error } => {
            assert_eq!(attempts, 3);
            assert_eq!(last_error.kind(), "timeout");
        }
        other => panic!("expected RetryExhausted, got {:?}", other),
    }
}

/// Boundary: maxAttempts = 1 behaves identically to no retry.
#[tokio::test(start_paused = true)]
async fn test_single_attempt_retry_is_transparent() {
    let calls = Arc::new(AtomicU32::new(0));
    let pipeline = PipelineBuilder::new(Arc::new(SwitchedHandler {
        fail: Arc::new(AtomicBool::new(true)),
        calls: Arc::clone(&calls),
    }) as Arc<dyn CommandHandler<Work>>)
        .with(Arc::new(retry(1)))
        .build()
        .unwrap();

    let err = pipeline.execute(Work, &context()).await.unwrap_err();
    assert_eq!(err.kind(), "timeout");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_non_retryable_error_propagates_immediately() {
    struct Rejecting;

    #[async_trait]
    impl CommandHandler<Work> for Rejecting {
        async fn handle(&self, _command: Work, _context: &ExecutionContext) -> Result<&'static str, PipelineError> {
            Err(PipelineError::validation_error("malformed"))
        }
    }

    let pipeline = PipelineBuilder::new(Arc::new(Rejecting) as Arc<dyn CommandHandler<Work>>)
        .with(Arc::new(retry(5)))
        .build()
        .unwrap();

    let err = pipeline.execute(Work, &context()).await.unwrap_err();
    assert_eq!(err.kind(), "validation");
}

#[tokio::test]
async fn test_bulkhead_isolates_resource_capacity() {
    let bulkhead = BulkheadMiddleware::from_config(
        "slow-service",
        BackPressureConfig {
            max_concurrency: 1,
            max_outstanding: 1,
            max_queue_memory: 0,
            strategy: BackPressureStrategy::Fail,
        },
    )
    .unwrap();

    let pipeline = Arc::new(
        PipelineBuilder::new(Arc::new(SleepyHandler {
            sleep: Duration::from_millis(100),
        }) as Arc<dyn CommandHandler<Work>>)
            .with(Arc::new(bulkhead))
            .build()
            .unwrap(),
    );

    let slow = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move { pipeline.execute(Work, &context()).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Second call while the slot is held: rejected without running.
    let err = pipeline.execute(Work, &context()).await.unwrap_err();
    assert_eq!(err.kind(), "backPressure.exhausted");

    // The slot frees once the first call finishes.
    assert_eq!(slow.await.unwrap().unwrap(), "slept");
    assert_eq!(pipeline.execute(Work, &context()).await.unwrap(), "slept");
}
