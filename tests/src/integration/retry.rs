//! # Publish Retry and Cancellation
//!
//! The full publish path over the in-memory broker with injected
//! produce failures, forced acknowledgment statuses, and cancellation.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chorus_broker_memory::MemoryBroker;
    use chorus_bus::{Backoff, BusConfig, EventBus, PublishError};
    use chorus_types::PersistenceStatus;
    use tokio_util::sync::CancellationToken;

    use crate::support::{init_tracing, wait_until, OrderCreated, RecordingHandler};

    fn fast_retry_config(max_attempts: u32) -> BusConfig {
        init_tracing();
        let mut config = BusConfig::default();
        config.retry.max_attempts = max_attempts;
        config.retry.backoff = Backoff::Fixed(Duration::from_millis(1));
        config
    }

    #[tokio::test]
    async fn test_transient_failures_retried_to_success() {
        let broker = MemoryBroker::new();
        let bus = EventBus::connect(Arc::new(broker.clone()), fast_retry_config(3))
            .await
            .unwrap();
        let handler = RecordingHandler::<OrderCreated>::new("projector");
        bus.subscribe::<OrderCreated>(handler.clone()).unwrap();

        broker.fail_next_produces(2);
        let persisted = bus.publish(&OrderCreated::sample("ord-1")).await.unwrap();

        assert!(persisted);
        assert_eq!(broker.produce_calls(), 3);
        assert_eq!(broker.messages_produced(), 1);
        assert!(wait_until(|| handler.count() == 1).await);

        bus.shutdown().await;
    }

    #[tokio::test]
    async fn test_exhausted_retries_report_false_and_stop_retrying() {
        let broker = MemoryBroker::new();
        let bus = EventBus::connect(Arc::new(broker.clone()), fast_retry_config(3))
            .await
            .unwrap();
        let handler = RecordingHandler::<OrderCreated>::new("projector");
        bus.subscribe::<OrderCreated>(handler).unwrap();

        broker.fail_next_produces(10);
        let persisted = bus.publish(&OrderCreated::sample("ord-1")).await.unwrap();

        assert!(!persisted);
        // The produce operation ran exactly max_attempts times.
        assert_eq!(broker.produce_calls(), 3);
        assert_eq!(broker.messages_produced(), 0);
        // A failed publish never starts the loop.
        assert_eq!(bus.loop_starts(), 0);
    }

    #[tokio::test]
    async fn test_not_persisted_ack_is_not_retried() {
        let broker = MemoryBroker::new();
        let bus = EventBus::connect(Arc::new(broker.clone()), fast_retry_config(5))
            .await
            .unwrap();
        let handler = RecordingHandler::<OrderCreated>::new("projector");
        bus.subscribe::<OrderCreated>(handler).unwrap();

        broker.force_ack_status(PersistenceStatus::NotPersisted);
        let persisted = bus.publish(&OrderCreated::sample("ord-1")).await.unwrap();

        assert!(!persisted);
        assert_eq!(broker.produce_calls(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_mid_retry_is_a_distinct_outcome() {
        let broker = MemoryBroker::new();
        let mut config = fast_retry_config(2);
        // A backoff long enough that the cancel lands inside it.
        config.retry.backoff = Backoff::Fixed(Duration::from_secs(60));
        let bus = Arc::new(
            EventBus::connect(Arc::new(broker.clone()), config)
                .await
                .unwrap(),
        );
        let handler = RecordingHandler::<OrderCreated>::new("projector");
        bus.subscribe::<OrderCreated>(handler).unwrap();

        broker.fail_next_produces(1);
        let cancel = CancellationToken::new();
        let publish_cancel = cancel.clone();
        let publishing = {
            let bus = bus.clone();
            tokio::spawn(async move {
                bus.publish_with_cancel(&OrderCreated::sample("ord-1"), &publish_cancel)
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        let result = publishing.await.unwrap();

        assert!(matches!(result, Err(PublishError::Cancelled)));
        assert_eq!(broker.produce_calls(), 1);
        assert_eq!(broker.messages_produced(), 0);
        assert_eq!(bus.loop_starts(), 0);
    }

    #[tokio::test]
    async fn test_pre_cancelled_publish_never_reaches_broker() {
        let broker = MemoryBroker::new();
        let bus = EventBus::connect(Arc::new(broker.clone()), fast_retry_config(3))
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = bus
            .publish_with_cancel(&OrderCreated::sample("ord-1"), &cancel)
            .await;

        assert!(matches!(result, Err(PublishError::Cancelled)));
        assert_eq!(broker.produce_calls(), 0);
    }
}
