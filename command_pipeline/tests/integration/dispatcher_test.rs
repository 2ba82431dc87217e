//! # Dispatcher Tests
//!
//! End-to-end dispatch through the application layer: registry routing,
//! admission control under load, metadata propagation into events, and
//! options loaded from TOML.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use command_pipeline::application::{CommandDispatcher, SecureDispatcher};
use command_pipeline::infrastructure::config::PipelineOptions;
use command_pipeline::infrastructure::logging::ChannelEventEmitter;
use command_pipeline::infrastructure::metrics::MetricsService;
use command_pipeline_domain::entities::{CommandMetadata, ExecutionContext};
use command_pipeline_domain::events::event_names;
use command_pipeline_domain::services::{Command, CommandHandler};
use command_pipeline_domain::PipelineError;

#[derive(Clone)]
struct Echo {
    text: String,
}

impl Command for Echo {
    type Output = String;
}

struct EchoHandler;

#[async_trait]
impl CommandHandler<Echo> for EchoHandler {
    async fn handle(&self, command: Echo, _context: &ExecutionContext) -> Result<String, PipelineError> {
        Ok(command.text)
    }
}

struct SlowEchoHandler;

#[async_trait]
impl CommandHandler<Echo> for SlowEchoHandler {
    async fn handle(&self, command: Echo, _context: &ExecutionContext) -> Result<String, PipelineError> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(command.text)
    }
}

fn echo(text: &str) -> Echo {
    Echo { text: text.into() }
}

#[tokio::test]
async fn test_dispatch_round_trip() {
    let dispatcher = CommandDispatcher::new(PipelineOptions::default()).unwrap();
    dispatcher.register_handler::<Echo>(Arc::new(EchoHandler)).unwrap();

    assert_eq!(dispatcher.dispatch(echo("hi")).await.unwrap(), "hi");
}

#[tokio::test]
async fn test_dispatch_emits_lifecycle_events_with_correlation() {
    let (emitter, mut events) = ChannelEventEmitter::new();
    let dispatcher = CommandDispatcher::new(PipelineOptions::default())
        .unwrap()
        .with_emitter(Arc::new(emitter));
    dispatcher.register_handler::<Echo>(Arc::new(EchoHandler)).unwrap();

    let correlation = Uuid::new_v4();
    let metadata = CommandMetadata::new().with_correlation_id(correlation).with_user_id("u1");
    dispatcher.dispatch_with_metadata(echo("hi"), metadata).await.unwrap();

    let started = events.recv().await.unwrap();
    assert_eq!(started.name(), event_names::COMMAND_STARTED);
    assert_eq!(started.correlation_id(), Some(correlation));

    let completed = events.recv().await.unwrap();
    assert_eq!(completed.name(), event_names::COMMAND_COMPLETED);
    assert!(completed.property("durationMs").is_some());
}

#[tokio::test]
async fn test_admission_cap_applies_to_dispatch() {
    let options = PipelineOptions {
        max_concurrency: 1,
        max_outstanding: 1,
        back_pressure_strategy: command_pipeline::infrastructure::runtime::BackPressureStrategy::Fail,
        ..Default::default()
    };
    let dispatcher = Arc::new(CommandDispatcher::new(options).unwrap());
    dispatcher.register_handler::<Echo>(Arc::new(SlowEchoHandler)).unwrap();

    let background = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move { dispatcher.dispatch(echo("slow")).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let err = dispatcher.dispatch(echo("rejected")).await.unwrap_err();
    assert_eq!(err.kind(), "backPressure.exhausted");

    assert_eq!(background.await.unwrap().unwrap(), "slow");
    assert_eq!(dispatcher.dispatch(echo("after")).await.unwrap(), "after");
}

#[tokio::test]
async fn test_options_from_toml_drive_dispatcher() {
    let options = PipelineOptions::from_toml(
        "max_concurrency = 2\nmax_outstanding = 2\nback_pressure_strategy = \"fail\"\n",
    )
    .unwrap();
    let dispatcher = CommandDispatcher::new(options).unwrap();
    dispatcher.register_handler::<Echo>(Arc::new(EchoHandler)).unwrap();

    assert_eq!(dispatcher.semaphore().config().max_concurrency, 2);
    assert_eq!(dispatcher.dispatch(echo("configured")).await.unwrap(), "configured");
}

#[tokio::test]
async fn test_secure_dispatcher_end_to_end() {
    let metrics = MetricsService::new().unwrap();
    let dispatcher = Arc::new(
        CommandDispatcher::new(PipelineOptions::default())
            .unwrap()
            .with_metrics(metrics.clone()),
    );
    dispatcher.register_handler::<Echo>(Arc::new(EchoHandler)).unwrap();
    let secure = SecureDispatcher::new(dispatcher);

    assert_eq!(secure.dispatch(echo("safe")).await.unwrap(), "safe");
    assert_eq!(metrics.in_flight(), 0);
}
