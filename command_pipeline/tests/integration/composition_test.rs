//! # Composition Tests
//!
//! Sequential, parallel, conditional, and error-handling composition,
//! including the timed parallel-strategy scenario (fast failure vs. slow
//! success) and forked-context isolation after join.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use command_pipeline_domain::entities::{CommandMetadata, ContextKey, ExecutionContext};
use command_pipeline_domain::pipeline::{ParallelStrategy, Pipeline, PipelineExt};
use command_pipeline_domain::services::Command;
use command_pipeline_domain::PipelineError;

const BRANCH_MARK: ContextKey<&'static str> = ContextKey::new("branch-mark");

#[derive(Clone)]
struct Job;

impl Command for Job {
    type Output = String;
}

/// Branch that sleeps, then succeeds with its label.
struct SlowSuccess {
    label: &'static str,
    delay: Duration,
}

#[async_trait]
impl Pipeline<Job> for SlowSuccess {
    async fn execute(&self, _command: Job, context: &ExecutionContext) -> Result<String, PipelineError> {
        tokio::time::sleep(self.delay).await;
        context.set(&BRANCH_MARK, self.label);
        Ok(self.label.to_string())
    }
}

/// Branch that sleeps, then fails.
struct SlowFailure {
    delay: Duration,
}

#[async_trait]
impl Pipeline<Job> for SlowFailure {
    async fn execute(&self, _command: Job, _context: &ExecutionContext) -> Result<String, PipelineError> {
        tokio::time::sleep(self.delay).await;
        Err(PipelineError::execution_failed("B failed"))
    }
}

fn context() -> ExecutionContext {
    ExecutionContext::new(CommandMetadata::new())
}

fn branch_a() -> SlowSuccess {
    SlowSuccess {
        label: "A",
        delay: Duration::from_millis(50),
    }
}

fn branch_b() -> SlowFailure {
    SlowFailure {
        delay: Duration::from_millis(20),
    }
}

/// Race strategy: the early failure is ignored, the late
/// success wins.
#[tokio::test(start_paused = true)]
async fn test_race_returns_slow_success() {
    let pipeline = branch_a().parallel(branch_b(), ParallelStrategy::Race);
    let result = pipeline.execute(Job, &context()).await.unwrap();
    assert_eq!(result, "A");
}

/// FirstCompleted strategy: the early failure is the result.
#[tokio::test(start_paused = true)]
async fn test_first_completed_returns_early_failure() {
    let pipeline = branch_a().parallel(branch_b(), ParallelStrategy::FirstCompleted);
    let err = pipeline.execute(Job, &context()).await.unwrap_err();
    assert_eq!(err.kind(), "executionFailed");
}

/// AllCompleted strategy: the lone success is the result.
#[tokio::test(start_paused = true)]
async fn test_all_completed_returns_success() {
    let pipeline = branch_a().parallel(branch_b(), ParallelStrategy::AllCompleted);
    let result = pipeline.execute(Job, &context()).await.unwrap();
    assert_eq!(result, "A");
}

/// Branch writes are invisible in the parent after join.
#[tokio::test(start_paused = true)]
async fn test_fork_isolation_after_join() {
    let ctx = context();
    let pipeline = branch_a().parallel(
        SlowSuccess {
            label: "C",
            delay: Duration::from_millis(10),
        },
        ParallelStrategy::AllCompleted,
    );
    pipeline.execute(Job, &ctx).await.unwrap();
    assert!(ctx.get(&BRANCH_MARK).is_none());
}

/// Race aggregates both errors in completion order when every branch
/// fails.
#[tokio::test(start_paused = true)]
async fn test_race_double_failure_orders_by_completion() {
    struct LabelledFailure {
        label: &'static str,
        delay: Duration,
    }

    #[async_trait]
    impl Pipeline<Job> for LabelledFailure {
        async fn execute(&self, _command: Job, _context: &ExecutionContext) -> Result<String, PipelineError> {
            tokio::time::sleep(self.delay).await;
            Err(PipelineError::execution_failed(self.label))
        }
    }

    let slow = LabelledFailure {
        label: "slow",
        delay: Duration::from_millis(40),
    };
    let fast = LabelledFailure {
        label: "fast",
        delay: Duration::from_millis(10),
    };

    let err = slow.parallel(fast, ParallelStrategy::Race).execute(Job, &context()).await.unwrap_err();
    match err {
        PipelineError::AllPipelinesFailed(errors) => {
            assert_eq!(errors.len(), 2);
            // Completion order: the fast branch failed first.
            assert!(errors[0].to_string().contains("fast"));
            assert!(errors[1].to_string().contains("slow"));
        }
        other => panic!("expected AllPipelinesFailed, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_sequential_then_conditional_chain() {
    let pipeline = branch_a()
        .then(SlowSuccess {
            label: "second",
            delay: Duration::from_millis(5),
        })
        .when(|_cmd: &Job, _ctx| true);

    let result = pipeline.execute(Job, &context()).await.unwrap();
    assert_eq!(result, "second");
}

#[tokio::test(start_paused = true)]
async fn test_catching_around_race() {
    let observed = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let seen = Arc::clone(&observed);

    let pipeline = SlowFailure {
        delay: Duration::from_millis(5),
    }
    .parallel(
        SlowFailure {
            delay: Duration::from_millis(10),
        },
        ParallelStrategy::Race,
    )
    .catching(move |e| {
        assert_eq!(e.kind(), "allPipelinesFailed");
        seen.store(true, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    });

    let err = pipeline.execute(Job, &context()).await.unwrap_err();
    assert_eq!(err.kind(), "allPipelinesFailed");
    assert!(observed.load(std::sync::atomic::Ordering::SeqCst));
}
