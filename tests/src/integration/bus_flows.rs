//! # Bus Flows
//!
//! Publish -> transport -> per-subscriber decode -> callbacks, end to end over
//! the loopback transport.
//!
//! ## Flows Tested:
//!
//! 1. **Accepted payload**: exactly one typed delivery to `on_message`
//! 2. **Rejected payload**: one decode error to `on_error`, nothing to `on_message`
//! 3. **Independent decoders**: subscribers on one topic validate separately
//! 4. **Unsubscribe**: removed callbacks see nothing; double unsubscribe is harmless
//! 5. **Transport failures**: surface on `publish`, never retried

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use hub_bus::{BusError, InboundStream, LoopbackTransport, MessageHub, Transport};
    use hub_types::{
        DecodeError, MessageEnvelope, OutboundMessage, RawEnvelope, TransportError,
    };
    use serde_json::json;

    use crate::fixtures::{
        chat_text_decoder, order_decoder, running_hub, urgent_chat_decoder, Collector, Order,
        UrgentChat,
    };

    // =============================================================================
    // SCENARIO: orders.created
    // =============================================================================

    #[tokio::test]
    async fn test_order_accepted_and_rejected() {
        let hub = running_hub();
        let mut messages = Collector::<MessageEnvelope<Order>>::new();
        let mut errors = Collector::<(RawEnvelope, DecodeError)>::new();
        let on_error = errors.sink();
        let _sub = hub.subscribe_with_error(
            "orders.created",
            order_decoder(),
            messages.sink(),
            move |raw, err| on_error((raw, err)),
        );

        hub.publish("orders.created", json!({ "id": "o1", "total": 42 }))
            .await
            .unwrap();
        let envelope = messages.next().await;
        assert_eq!(envelope.topic, "orders.created");
        assert_eq!(
            envelope.payload,
            Order {
                id: "o1".to_string(),
                total: 42.0
            }
        );

        hub.publish("orders.created", json!({ "id": "o1" }))
            .await
            .unwrap();
        let (raw, err) = errors.next().await;
        assert_eq!(raw.payload, json!({ "id": "o1" }));
        assert_eq!(err.field(), Some("total"));
        assert!(err.is_missing());
        assert!(err.to_string().contains("total"));

        messages.assert_quiet().await;
        errors.assert_quiet().await;
    }

    #[tokio::test]
    async fn test_rejection_without_error_handler_is_silent() {
        let hub = running_hub();
        let mut messages = Collector::<MessageEnvelope<Order>>::new();
        let _sub = hub.subscribe("orders.created", order_decoder(), messages.sink());

        hub.publish("orders.created", json!({ "total": "lots" }))
            .await
            .unwrap();
        hub.publish("orders.created", json!({ "id": "o2", "total": 7.5 }))
            .await
            .unwrap();

        // Only the valid one arrives; the rejection did not disturb delivery.
        assert_eq!(messages.next().await.payload.id, "o2");
        messages.assert_quiet().await;
    }

    // =============================================================================
    // SCENARIO: chat.message with two decoders
    // =============================================================================

    #[tokio::test]
    async fn test_chat_subscribers_decode_independently() {
        let hub = running_hub();
        let mut plain = Collector::<MessageEnvelope<String>>::new();
        let mut urgent = Collector::<MessageEnvelope<UrgentChat>>::new();
        let _a = hub.subscribe("chat.message", chat_text_decoder(), plain.sink());
        let _b = hub.subscribe("chat.message", urgent_chat_decoder(), urgent.sink());

        hub.publish("chat.message", json!({ "text": "hi" }))
            .await
            .unwrap();
        assert_eq!(plain.next().await.payload, "hi");
        urgent.assert_quiet().await;

        hub.publish("chat.message", json!({ "text": "fire", "urgent": true }))
            .await
            .unwrap();
        assert_eq!(plain.next().await.payload, "fire");
        assert_eq!(
            urgent.next().await.payload,
            UrgentChat {
                text: "fire".to_string(),
                urgent: true
            }
        );
    }

    // =============================================================================
    // UNSUBSCRIBE
    // =============================================================================

    #[tokio::test]
    async fn test_unsubscribed_callback_receives_nothing() {
        let hub = running_hub();
        let mut removed = Collector::<MessageEnvelope<String>>::new();
        let mut kept = Collector::<MessageEnvelope<String>>::new();
        let sub = hub.subscribe("chat.message", chat_text_decoder(), removed.sink());
        let _keep = hub.subscribe("chat.message", chat_text_decoder(), kept.sink());

        sub.unsubscribe();
        sub.unsubscribe();
        assert!(!sub.is_active());

        hub.publish("chat.message", json!({ "text": "after" }))
            .await
            .unwrap();
        assert_eq!(kept.next().await.payload, "after");
        removed.assert_quiet().await;
        assert_eq!(hub.subscriber_count("chat.message"), 1);
    }

    // =============================================================================
    // ORDERING AND FAN-OUT
    // =============================================================================

    #[tokio::test]
    async fn test_topic_order_is_preserved() {
        let hub = running_hub();
        let mut seen = Collector::<MessageEnvelope<f64>>::new();
        let _sub = hub.subscribe(
            "ticks",
            hub_types::DecoderExt::shared(hub_types::decode::number()),
            seen.sink(),
        );

        for n in 0..20 {
            hub.publish("ticks", json!(n)).await.unwrap();
        }
        for n in 0..20 {
            assert_eq!(seen.next().await.payload, f64::from(n));
        }
    }

    #[tokio::test]
    async fn test_envelopes_are_stamped_uniquely() {
        let hub = running_hub();
        let mut seen = Collector::<MessageEnvelope<String>>::new();
        let _sub = hub.subscribe("chat.message", chat_text_decoder(), seen.sink());

        for text in ["a", "b"] {
            hub.publish("chat.message", json!({ "text": text }))
                .await
                .unwrap();
        }
        let first = seen.next().await;
        let second = seen.next().await;
        assert_ne!(first.id, second.id);
        assert!(first.sent_at().is_some());
        assert!(second.sent_at() >= first.sent_at());
    }

    #[tokio::test]
    async fn test_hubs_sharing_a_transport_see_each_other() {
        let transport = Arc::new(LoopbackTransport::new());
        let window_a = MessageHub::new(transport.clone());
        let window_b = MessageHub::new(transport.clone());
        window_a.spawn().unwrap();
        window_b.spawn().unwrap();

        let mut seen = Collector::<MessageEnvelope<Order>>::new();
        let _sub = window_b.subscribe("orders.created", order_decoder(), seen.sink());

        window_a
            .publish("orders.created", json!({ "id": "x", "total": 1 }))
            .await
            .unwrap();
        assert_eq!(seen.next().await.payload.id, "x");
        assert_eq!(transport.receiver_count(), 2);
    }

    // =============================================================================
    // TRANSPORT FAILURES
    // =============================================================================

    /// Transport that refuses every send and counts attempts.
    #[derive(Default)]
    struct RejectingTransport {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl Transport for RejectingTransport {
        async fn send(&self, message: OutboundMessage) -> Result<(), TransportError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::Rejected {
                topic: message.topic,
                reason: "offline".to_string(),
            })
        }

        fn inbound(&self) -> Result<InboundStream, TransportError> {
            Err(TransportError::Unavailable("offline".to_string()))
        }
    }

    #[tokio::test]
    async fn test_transport_rejection_fails_publish_without_retry() {
        let transport = Arc::new(RejectingTransport::default());
        let hub = MessageHub::new(transport.clone());

        let err = hub
            .publish("orders.created", json!({ "id": "o1", "total": 1 }))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BusError::Transport(TransportError::Rejected { ref topic, .. }) if topic == "orders.created"
        ));
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(hub.messages_published(), 0);

        // A failed attach leaves the hub free to try again.
        for _ in 0..2 {
            assert!(matches!(
                hub.spawn(),
                Err(BusError::Transport(TransportError::Unavailable(_)))
            ));
        }
    }

    #[tokio::test]
    async fn test_unserialisable_payload_is_rejected() {
        use std::collections::HashMap;

        let hub = running_hub();
        // Non-string map keys cannot become JSON object keys.
        let mut payload = HashMap::new();
        payload.insert(vec![1u8], 1);

        let err = hub.publish_as("bad", &payload).await.unwrap_err();
        assert!(matches!(err, BusError::Encode { .. }));
    }
}
