//! # Pipeline Execution Tests
//!
//! End-to-end coverage of chain ordering, the exactly-once continuation
//! contract, scoped middleware activation, and context forking.

use std::sync::Arc;

use async_trait::async_trait;
use proptest::prelude::*;

use command_pipeline_domain::entities::{CommandMetadata, ContextKey, ExecutionContext};
use command_pipeline_domain::pipeline::{Next, Pipeline, PipelineBuilder};
use command_pipeline_domain::services::{Command, CommandHandler, Middleware};
use command_pipeline_domain::value_objects::MiddlewarePriority;
use command_pipeline_domain::PipelineError;

const TRACE: ContextKey<Vec<String>> = ContextKey::new("trace");

#[derive(Clone)]
struct Ping;

impl Command for Ping {
    type Output = String;
}

#[derive(Clone)]
struct EncryptedPing;

impl Command for EncryptedPing {
    type Output = String;

    fn scopes(&self) -> &'static [&'static str] {
        &["requires-encryption"]
    }
}

struct OkHandler;

#[async_trait]
impl<C: Command<Output = String>> CommandHandler<C> for OkHandler {
    async fn handle(&self, _command: C, _context: &ExecutionContext) -> Result<String, PipelineError> {
        Ok("ok".to_string())
    }
}

/// Pass-through middleware that appends its label to the context trace.
struct Tracer {
    label: String,
    priority: MiddlewarePriority,
}

impl Tracer {
    fn arc<C: Command<Output = String>>(label: &str, priority: i32) -> Arc<dyn Middleware<C>> {
        Arc::new(Tracer {
            label: label.to_string(),
            priority: MiddlewarePriority::new(priority),
        })
    }
}

#[async_trait]
impl<C: Command<Output = String>> Middleware<C> for Tracer {
    fn priority(&self) -> MiddlewarePriority {
        self.priority
    }

    async fn execute(
        &self,
        command: C,
        context: &ExecutionContext,
        next: Next<'_, C>,
    ) -> Result<String, PipelineError> {
        let label = self.label.clone();
        context.update(&TRACE, move |t| {
            let mut t = t.cloned().unwrap_or_default();
            t.push(label);
            t
        });
        next.run(command, context).await
    }
}

/// Middleware active only for commands carrying the encryption marker.
struct ScopedTracer;

#[async_trait]
impl<C: Command<Output = String>> Middleware<C> for ScopedTracer {
    fn scope(&self) -> Option<&'static str> {
        Some("requires-encryption")
    }

    async fn execute(
        &self,
        command: C,
        context: &ExecutionContext,
        next: Next<'_, C>,
    ) -> Result<String, PipelineError> {
        context.update(&TRACE, |t| {
            let mut t = t.cloned().unwrap_or_default();
            t.push("scoped".to_string());
            t
        });
        next.run(command, context).await
    }
}

fn context() -> ExecutionContext {
    ExecutionContext::new(CommandMetadata::new())
}

fn trace_of(ctx: &ExecutionContext) -> Vec<String> {
    ctx.get(&TRACE).map(|t| (*t).clone()).unwrap_or_default()
}

/// Priorities 200/100/500 execute as 100, 200, 500.
#[tokio::test]
async fn test_priority_ordering_scenario() {
    let pipeline = PipelineBuilder::new(Arc::new(OkHandler) as Arc<dyn CommandHandler<Ping>>)
        .with(Tracer::arc("a", 200))
        .with(Tracer::arc("b", 100))
        .with(Tracer::arc("c", 500))
        .build()
        .unwrap();

    let ctx = context();
    let result = pipeline.execute(Ping, &ctx).await.unwrap();

    assert_eq!(result, "ok");
    assert_eq!(trace_of(&ctx), vec!["b", "a", "c"]);
}

/// Round-trip law: an all-pass-through chain yields the handler's result.
#[tokio::test]
async fn test_pass_through_chain_equals_direct_handler() {
    let direct = OkHandler.handle(Ping, &context()).await.unwrap();

    let pipeline = PipelineBuilder::new(Arc::new(OkHandler) as Arc<dyn CommandHandler<Ping>>)
        .with(Tracer::arc("x", 100))
        .with(Tracer::arc("y", 200))
        .build()
        .unwrap();
    let through_chain = pipeline.execute(Ping, &context()).await.unwrap();

    assert_eq!(direct, through_chain);
}

#[tokio::test]
async fn test_empty_middleware_list_runs_handler_directly() {
    let pipeline = PipelineBuilder::new(Arc::new(OkHandler) as Arc<dyn CommandHandler<Ping>>)
        .build()
        .unwrap();

    let ctx = context();
    assert_eq!(pipeline.execute(Ping, &ctx).await.unwrap(), "ok");
    assert!(trace_of(&ctx).is_empty());
}

#[tokio::test]
async fn test_scoped_middleware_skipped_without_marker() {
    let pipeline = PipelineBuilder::new(Arc::new(OkHandler) as Arc<dyn CommandHandler<Ping>>)
        .with(Arc::new(ScopedTracer))
        .with(Tracer::arc("plain", 600))
        .build()
        .unwrap();

    let ctx = context();
    pipeline.execute(Ping, &ctx).await.unwrap();
    assert_eq!(trace_of(&ctx), vec!["plain"]);
}

#[tokio::test]
async fn test_scoped_middleware_activates_with_marker() {
    let pipeline = PipelineBuilder::new(Arc::new(OkHandler) as Arc<dyn CommandHandler<EncryptedPing>>)
        .with(Arc::new(ScopedTracer))
        .build()
        .unwrap();

    let ctx = context();
    pipeline.execute(EncryptedPing, &ctx).await.unwrap();
    assert_eq!(trace_of(&ctx), vec!["scoped"]);
}

/// Short-circuiting middleware keeps the handler untouched.
#[tokio::test]
async fn test_short_circuit_skips_handler() {
    struct ShortCircuit;

    #[async_trait]
    impl Middleware<Ping> for ShortCircuit {
        fn may_short_circuit(&self) -> bool {
            true
        }

        async fn execute(
            &self,
            _command: Ping,
            _context: &ExecutionContext,
            _next: Next<'_, Ping>,
        ) -> Result<String, PipelineError> {
            Ok("cached".to_string())
        }
    }

    let pipeline = PipelineBuilder::new(Arc::new(OkHandler) as Arc<dyn CommandHandler<Ping>>)
        .with(Arc::new(ShortCircuit))
        .with(Tracer::arc("downstream", 600))
        .build()
        .unwrap();

    let ctx = context();
    assert_eq!(pipeline.execute(Ping, &ctx).await.unwrap(), "cached");
    // Neither the downstream tracer nor the handler ran.
    assert!(trace_of(&ctx).is_empty());
}

/// Any priority assignment executes in stable-sorted order.
#[test]
fn test_ordering_invariant_holds_for_arbitrary_priorities() {
    let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();

    proptest!(|(priorities in prop::collection::vec(-1000i32..1000, 1..12))| {
        let mut builder = PipelineBuilder::new(Arc::new(OkHandler) as Arc<dyn CommandHandler<Ping>>);
        for (index, priority) in priorities.iter().enumerate() {
            builder = builder.with(Tracer::arc(&format!("{}:{}", priority, index), *priority));
        }
        let pipeline = builder.build().unwrap();

        let ctx = context();
        runtime.block_on(pipeline.execute(Ping, &ctx)).unwrap();

        // The observed trace must equal the stable sort of registration order.
        let mut expected: Vec<(i32, usize)> = priorities.iter().copied().zip(0..).collect();
        expected.sort_by_key(|(priority, _)| *priority);
        let expected: Vec<String> = expected
            .into_iter()
            .map(|(priority, index)| format!("{}:{}", priority, index))
            .collect();

        prop_assert_eq!(trace_of(&ctx), expected);
    });
}
