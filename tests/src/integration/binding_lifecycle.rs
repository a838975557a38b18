//! # Binding Lifecycle
//!
//! A `MessageHandlerBinding` follows its owner: one registration per
//! dependency epoch, swapped without gaps or overlap, released on teardown.

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{mpsc, Arc, Barrier};
    use std::time::Duration;

    use hub_bus::{Handler, MessageHub};
    use hub_runtime::{MessageHandlerBinding, ModuleHost};
    use hub_types::decode::integer;
    use hub_types::{DecoderExt, MessageEnvelope};
    use parking_lot::Mutex;
    use serde_json::json;

    use crate::fixtures::{
        app_context, chat_text_decoder, provided_scope, running_hub, Collector,
        DELIVERY_TIMEOUT, QUIET_PERIOD,
    };

    fn tagged(collector: &Collector<(u32, String)>, tag: u32) -> Handler<String> {
        let sink = collector.sink();
        Handler::new(move |env: MessageEnvelope<String>| sink((tag, env.payload)))
    }

    #[tokio::test]
    async fn test_dependency_change_never_double_delivers() {
        let hub = running_hub();
        let (scope, _provider) = provided_scope("en", &hub);
        let decoder = chat_text_decoder();
        let mut seen = Collector::new();
        let mut binding = MessageHandlerBinding::<String, u32>::new();

        binding.use_message_handler(&scope, "chat.message", &decoder, tagged(&seen, 1), 1);
        hub.publish("chat.message", json!({ "text": "first" }))
            .await
            .unwrap();
        assert_eq!(seen.next().await, (1, "first".to_string()));

        binding.use_message_handler(&scope, "chat.message", &decoder, tagged(&seen, 2), 2);
        hub.publish("chat.message", json!({ "text": "second" }))
            .await
            .unwrap();
        assert_eq!(seen.next().await, (2, "second".to_string()));
        seen.assert_quiet().await;
        assert_eq!(hub.subscriber_count("chat.message"), 1);
    }

    #[tokio::test]
    async fn test_unchanged_dependencies_keep_first_callbacks() {
        let hub = running_hub();
        let (scope, _provider) = provided_scope("en", &hub);
        let decoder = chat_text_decoder();
        let mut seen = Collector::new();
        let mut binding = MessageHandlerBinding::<String, &'static str>::new();

        for tag in 1..=3 {
            binding.use_message_handler(
                &scope,
                "chat.message",
                &decoder,
                tagged(&seen, tag),
                "room-1",
            );
        }
        assert_eq!(binding.epoch(), 1);

        hub.publish("chat.message", json!({ "text": "hi" }))
            .await
            .unwrap();
        assert_eq!(seen.next().await, (1, "hi".to_string()));
        seen.assert_quiet().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_swaps_under_load_deliver_each_message_once() {
        const MESSAGES: u64 = 200;

        let hub = running_hub();
        let (scope, _provider) = provided_scope("en", &hub);
        let decoder = integer().shared();
        let received: Arc<Mutex<HashMap<i64, Vec<u64>>>> = Arc::new(Mutex::new(HashMap::new()));
        let mut binding = MessageHandlerBinding::<i64, u64>::new();

        let handler_for = |epoch: u64| {
            let received = Arc::clone(&received);
            Handler::new(move |env: MessageEnvelope<i64>| {
                received.lock().entry(env.payload).or_default().push(epoch);
            })
        };

        for seq in 0..MESSAGES {
            if seq % 10 == 0 {
                let epoch = seq / 10;
                binding.use_message_handler(&scope, "seq", &decoder, handler_for(epoch), epoch);
            }
            hub.publish("seq", json!(seq)).await.unwrap();
        }

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while received.lock().len() < MESSAGES as usize {
            assert!(
                tokio::time::Instant::now() < deadline,
                "only {} of {} messages delivered",
                received.lock().len(),
                MESSAGES
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let received = received.lock();
        for seq in 0..MESSAGES as i64 {
            let epochs = &received[&seq];
            assert_eq!(epochs.len(), 1, "message {seq} delivered to {epochs:?}");
        }
        assert_eq!(binding.epoch(), MESSAGES / 10);
        assert_eq!(hub.subscriber_count("seq"), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_deactivate_waits_for_running_callback() {
        let hub = running_hub();
        let (scope, _provider) = provided_scope("en", &hub);
        let (entered_tx, entered_rx) = mpsc::channel::<()>();
        let release = Arc::new(Barrier::new(2));
        let deactivated = Arc::new(AtomicBool::new(false));
        let ran_after_deactivate = Arc::new(AtomicBool::new(false));

        let handler = {
            let entered_tx = Mutex::new(entered_tx);
            let release = Arc::clone(&release);
            let deactivated = Arc::clone(&deactivated);
            let ran_after_deactivate = Arc::clone(&ran_after_deactivate);
            Handler::new(move |_: MessageEnvelope<String>| {
                let _ = entered_tx.lock().send(());
                release.wait();
                if deactivated.load(Ordering::SeqCst) {
                    ran_after_deactivate.store(true, Ordering::SeqCst);
                }
            })
        };
        let mut binding = MessageHandlerBinding::<String>::new();
        binding.use_message_handler(&scope, "chat.message", &chat_text_decoder(), handler, ());

        hub.publish("chat.message", json!({ "text": "in flight" }))
            .await
            .unwrap();
        tokio::task::spawn_blocking(move || entered_rx.recv_timeout(DELIVERY_TIMEOUT))
            .await
            .unwrap()
            .expect("callback did not start");

        let teardown = {
            let deactivated = Arc::clone(&deactivated);
            std::thread::spawn(move || {
                binding.deactivate();
                deactivated.store(true, Ordering::SeqCst);
                binding
            })
        };

        tokio::time::sleep(QUIET_PERIOD).await;
        assert!(
            !deactivated.load(Ordering::SeqCst),
            "deactivate returned while the callback was running"
        );
        release.wait();

        let binding = teardown.join().unwrap();
        assert!(deactivated.load(Ordering::SeqCst));
        assert!(!ran_after_deactivate.load(Ordering::SeqCst));
        assert!(!binding.is_active());
        assert_eq!(hub.subscriber_count("chat.message"), 0);
    }

    #[tokio::test]
    async fn test_hub_change_moves_registration() {
        let first = running_hub();
        let second = running_hub();
        let (scope, provider) = provided_scope("en", &first);
        let decoder = chat_text_decoder();
        let mut seen = Collector::new();
        let mut binding = MessageHandlerBinding::<String>::new();

        binding.use_message_handler(&scope, "chat.message", &decoder, tagged(&seen, 1), ());
        provider.replace(app_context("en", &second));
        binding.use_message_handler(&scope, "chat.message", &decoder, tagged(&seen, 2), ());

        assert_eq!(first.subscriber_count("chat.message"), 0);
        assert_eq!(second.subscriber_count("chat.message"), 1);

        first
            .publish("chat.message", json!({ "text": "old hub" }))
            .await
            .unwrap();
        second
            .publish("chat.message", json!({ "text": "new hub" }))
            .await
            .unwrap();
        assert_eq!(seen.next().await, (2, "new hub".to_string()));
        seen.assert_quiet().await;

        binding.deactivate();
        assert_eq!(second.subscriber_count("chat.message"), 0);
    }

    #[tokio::test]
    async fn test_dropping_binding_releases_registration() {
        let hub = running_hub();
        let (scope, _provider) = provided_scope("en", &hub);
        let mut seen = Collector::new();
        {
            let mut binding = MessageHandlerBinding::<String>::new();
            binding.use_message_handler(
                &scope,
                "chat.message",
                &chat_text_decoder(),
                tagged(&seen, 1),
                (),
            );
            assert_eq!(hub.subscriber_count("chat.message"), 1);
        }
        assert_eq!(hub.subscriber_count("chat.message"), 0);

        hub.publish("chat.message", json!({ "text": "late" }))
            .await
            .unwrap();
        seen.assert_quiet().await;
    }

    #[test]
    #[should_panic(expected = "outside of any context provider")]
    fn test_binding_without_provider_panics() {
        let mut binding = MessageHandlerBinding::<String>::new();
        binding.use_message_handler(
            &hub_runtime::ContextScope::root(),
            "chat.message",
            &chat_text_decoder(),
            Handler::new(|_| {}),
            (),
        );
    }

    #[test]
    fn test_host_drop_releases_module_bindings() {
        use hub_runtime::{create_module, Component, ContextScope, Mounted};

        struct Listener;
        struct Listening(MessageHandlerBinding<String>);
        impl Mounted for Listening {}

        impl Component for Listener {
            fn name(&self) -> &str {
                "listener"
            }

            fn mount(&self, scope: &ContextScope) -> Box<dyn Mounted> {
                let mut binding = MessageHandlerBinding::new();
                binding.use_message_handler(
                    scope,
                    "chat.message",
                    &chat_text_decoder(),
                    Handler::new(|_| {}),
                    (),
                );
                Box::new(Listening(binding))
            }
        }

        let hub = MessageHub::loopback();
        {
            let host = ModuleHost::new(app_context("en", &hub));
            host.register("listener", create_module(Listener)).unwrap();
            host.mount("listener").unwrap();
            assert_eq!(hub.subscriber_count("chat.message"), 1);
        }
        assert_eq!(hub.subscriber_count("chat.message"), 0);
    }
}
