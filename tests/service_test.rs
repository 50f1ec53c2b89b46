mod common;

use common::RecordingDispatcher;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use worker_outbound_buffer::app::{OutboundService, ServiceError};
use worker_outbound_buffer::domain::SimpleMessage;
use worker_outbound_buffer::reliability::RetryConfig;
use worker_outbound_buffer::{AssemblerConfig, BufferConfig};

fn service(
    dispatcher: Arc<RecordingDispatcher<SimpleMessage>>,
    max_attempts: u32,
) -> OutboundService<SimpleMessage, Arc<RecordingDispatcher<SimpleMessage>>> {
    OutboundService::new(
        BufferConfig {
            max_buffer_weight: 100,
        },
        AssemblerConfig {
            max_bulk_weight: 10,
            ..AssemblerConfig::default()
        },
        RetryConfig {
            max_attempts,
            delay: Duration::from_millis(10),
        },
        dispatcher,
    )
    .unwrap()
}

async fn wait_for_calls(dispatcher: &RecordingDispatcher<SimpleMessage>, calls: usize) {
    timeout(Duration::from_secs(2), async {
        while dispatcher.calls() < calls {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("dispatcher was not called in time");
}

#[tokio::test]
async fn test_drain_loop_delivers_buffered_messages() {
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let service = service(dispatcher.clone(), 1);
    let handle = service.start();

    let buffer = service.buffer();
    buffer
        .put(vec![SimpleMessage::with_id("a", 2), SimpleMessage::with_id("b", 2)])
        .await
        .unwrap();

    wait_for_calls(&dispatcher, 1).await;
    handle.shutdown(Duration::from_secs(1)).await.unwrap();

    let delivered = dispatcher.delivered();
    let flat: Vec<_> = delivered.concat().into_iter().filter_map(|m| m.id).collect();
    assert_eq!(flat, vec!["a", "b"]);
    assert_eq!(service.metrics().snapshot().bulks_dispatched, delivered.len() as u64);
}

#[tokio::test]
async fn test_shutdown_flushes_remaining_messages() {
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let service = service(dispatcher.clone(), 1);
    let buffer = service.buffer();

    // Admitted before the loop runs; only the final flush can deliver it
    buffer.put_one(SimpleMessage::with_id("late", 1)).await.unwrap();
    let handle = service.start();
    handle.shutdown(Duration::from_secs(1)).await.unwrap();

    let flat: Vec<_> = dispatcher
        .delivered()
        .concat()
        .into_iter()
        .filter_map(|m| m.id)
        .collect();
    assert_eq!(flat, vec!["late"]);
    assert!(buffer.is_empty());
}

#[tokio::test]
async fn test_failing_orchestrator_triggers_recovery() {
    let dispatcher = Arc::new(RecordingDispatcher::always_failing());
    let service = service(dispatcher.clone(), 2);
    let handle = service.start();

    service
        .buffer()
        .put_one(SimpleMessage::new(3))
        .await
        .unwrap();
    wait_for_calls(&dispatcher, 2).await;

    timeout(Duration::from_secs(2), async {
        while service.recovery().episodes() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("recovery was not triggered");

    handle.shutdown(Duration::from_secs(1)).await.unwrap();
    assert_eq!(service.recovery().episodes(), 1);
    assert_eq!(service.metrics().snapshot().bulks_failed, 1);
    assert_eq!(service.recovery().listener_count(), 1);
}

#[tokio::test]
async fn test_shutdown_timeout_aborts_stuck_loop() {
    // Long retry delay keeps the loop busy past the shutdown deadline
    let dispatcher = Arc::new(RecordingDispatcher::<SimpleMessage>::always_failing());
    let service = OutboundService::new(
        BufferConfig::default(),
        AssemblerConfig::default(),
        RetryConfig {
            max_attempts: 5,
            delay: Duration::from_secs(60),
        },
        dispatcher.clone(),
    )
    .unwrap();
    let handle = service.start();
    service.buffer().put_one(SimpleMessage::new(1)).await.unwrap();
    wait_for_calls(&dispatcher, 1).await;

    let result = handle.shutdown(Duration::from_millis(50)).await;
    assert!(matches!(result, Err(ServiceError::ShutdownTimeout(_))));
}
