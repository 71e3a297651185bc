//! ---
//! courier_section: "02-gated-delivery"
//! courier_subsection: "tests"
//! courier_type: "source"
//! courier_scope: "code"
//! courier_description: "End-to-end ordering, binding and lifecycle behaviour of the bridge."
//! courier_version: "v0.0.0-prealpha"
//! courier_owner: "tbd"
//! ---
use std::sync::Arc;

use courier_common::{BindingResetPolicy, BridgeConfig, CodecKind};
use courier_msg::{
    replay_from_file, spawn_bridge, AnyCodec, BindRequest, BridgeError, BridgeEvent,
    BridgeService, ChannelBinding, DeliveryReceipt, DisconnectOutcome, InMemoryTransport,
    JsonCodec, Message, PayloadEncoder, PortHandle, RecordingHost, ReleaseReason,
    TransferableMessage, NO_SENDER,
};
use parking_lot::Mutex;
use serde_json::{json, Value};

type Journal = Arc<Mutex<Vec<String>>>;

#[derive(Debug)]
struct JournalBinding {
    name: &'static str,
    journal: Journal,
}

impl ChannelBinding for JournalBinding {
    fn on_delivered(&mut self, receipt: &DeliveryReceipt) {
        self.journal
            .lock()
            .push(format!("{}:delivered:{}", self.name, receipt.channel));
    }

    fn release(&mut self, reason: ReleaseReason) {
        self.journal
            .lock()
            .push(format!("{}:released:{reason:?}", self.name));
    }
}

fn binding(name: &'static str, journal: &Journal) -> BindRequest {
    BindRequest::new(JournalBinding {
        name,
        journal: journal.clone(),
    })
}

fn bridge() -> BridgeService<RecordingHost, JsonCodec> {
    BridgeService::new("main-frame", RecordingHost::with_context(), JsonCodec)
}

fn message(channel: &str, value: Value, sender_id: i32) -> Message {
    let payload = JsonCodec.encode(&value).expect("encode payload");
    Message::new(false, channel, payload, sender_id)
}

fn channels(service: &BridgeService<RecordingHost, JsonCodec>) -> Vec<String> {
    service
        .host()
        .deliveries()
        .iter()
        .map(|d| d.channel.clone())
        .collect()
}

#[test]
fn buffered_then_live_messages_keep_one_total_order() {
    let mut service = bridge();
    for n in 1..=3 {
        service
            .on_message(message(&format!("m{n}"), json!(n), 1))
            .expect("buffer");
    }
    assert!(service.host().deliveries().is_empty());
    assert_eq!(service.pending_len(), 3);

    service.context_created().expect("ready");
    for n in 4..=5 {
        service
            .on_message(message(&format!("m{n}"), json!(n), 1))
            .expect("deliver");
        assert_eq!(service.pending_len(), 0);
    }

    assert_eq!(channels(&service), vec!["m1", "m2", "m3", "m4", "m5"]);
    let payloads: Vec<Value> = service
        .host()
        .deliveries()
        .iter()
        .map(|d| d.payload.clone())
        .collect();
    assert_eq!(payloads, vec![json!(1), json!(2), json!(3), json!(4), json!(5)]);
}

#[test]
fn messages_after_readiness_are_never_buffered() {
    let mut service = bridge();
    service.context_created().expect("ready");
    for n in 0..4 {
        service
            .on_message(message("live", json!(n), 2))
            .expect("deliver");
        assert_eq!(service.pending_len(), 0);
        assert_eq!(service.host().deliveries().len(), n + 1);
    }
    assert_eq!(service.metrics().buffered, 0);
}

#[test]
fn ping_scenario_invokes_entry_point_once() {
    let mut service = bridge();
    service
        .on_message(Message::new(false, "ping", "\"x\"", 5))
        .expect("buffer");
    service.context_created().expect("ready");

    let deliveries = service.host().deliveries();
    assert_eq!(deliveries.len(), 1);
    let call = &deliveries[0];
    assert_eq!(
        (
            call.internal,
            call.channel.as_str(),
            call.ports.clone(),
            call.payload.clone(),
            call.sender_id
        ),
        (false, "ping", Vec::<PortHandle>::new(), json!("x"), 5)
    );
}

#[test]
fn only_latest_pending_binding_is_promoted() {
    let journal = Journal::default();
    let mut service = bridge();
    let first = service.bind(binding("first", &journal));
    let second = service.bind(binding("second", &journal));
    assert_eq!(service.pending_binding(), Some(second));

    service.context_created().expect("ready");
    assert_eq!(service.active_binding(), Some(second));
    assert_ne!(service.active_binding(), Some(first));
    assert_eq!(
        journal.lock().as_slice(),
        ["first:released:Superseded".to_owned()]
    );
    assert_eq!(service.metrics().bindings_activated, 1);
}

#[test]
fn bind_after_readiness_replaces_active_binding() {
    let journal = Journal::default();
    let mut service = bridge();
    service.context_created().expect("ready");
    let old = service.bind(binding("old", &journal));
    assert_eq!(service.active_binding(), Some(old));

    let new = service.bind(binding("new", &journal));
    assert_eq!(service.active_binding(), Some(new));
    assert_eq!(journal.lock().as_slice(), ["old:released:Replaced".to_owned()]);
}

#[test]
fn delivery_without_binding_skips_receipt_silently() {
    let journal = Journal::default();
    let mut service = bridge();
    service.context_created().expect("ready");
    let id = service.bind(binding("remote", &journal));
    service
        .on_message(message("before", json!(null), 1))
        .expect("deliver");

    assert_eq!(service.on_disconnect(id), DisconnectOutcome::ReleasedActive);
    service
        .on_message(message("after", json!(null), 1))
        .expect("deliver without binding");

    assert_eq!(channels(&service), vec!["before", "after"]);
    assert_eq!(
        journal.lock().as_slice(),
        [
            "remote:delivered:before".to_owned(),
            "remote:released:Disconnected".to_owned()
        ]
    );
    assert_eq!(service.on_disconnect(id), DisconnectOutcome::Stale);
}

#[test]
fn second_readiness_signal_is_idempotent() {
    let journal = Journal::default();
    let mut service = bridge();
    service.on_message(message("once", json!(1), 1)).expect("buffer");
    service.bind(binding("only", &journal));

    service.context_created().expect("ready");
    service.context_created().expect("second signal");

    assert_eq!(channels(&service), vec!["once"]);
    assert_eq!(service.metrics().bindings_activated, 1);
    assert_eq!(service.metrics().replayed, 1);
}

#[test]
fn disconnect_does_not_cancel_buffered_messages() {
    let journal = Journal::default();
    let mut service = bridge();
    let id = service.bind(binding("pending", &journal));
    service.on_message(message("kept", json!(1), 1)).expect("buffer");
    assert_eq!(service.on_disconnect(id), DisconnectOutcome::DiscardedPending);
    assert_eq!(service.pending_len(), 1);

    service.context_created().expect("ready");
    assert_eq!(channels(&service), vec!["kept"]);
    assert_eq!(service.active_binding(), None);
}

#[test]
fn context_replacement_regates_delivery() {
    let journal = Journal::default();
    let mut service = bridge();
    service.context_created().expect("ready");
    let id = service.bind(binding("main", &journal));

    service.context_destroyed();
    service.host_mut().attach();
    assert!(!service.is_ready());
    assert_eq!(service.epoch(), 1);
    assert_eq!(service.pending_binding(), Some(id));

    service.on_message(message("next", json!(1), 1)).expect("buffer");
    assert!(service.host().deliveries().is_empty());
    service.context_created().expect("ready again");
    assert_eq!(channels(&service), vec!["next"]);
    assert_eq!(service.active_binding(), Some(id));
}

#[test]
fn drop_policy_releases_binding_on_reset() {
    let journal = Journal::default();
    let config = BridgeConfig {
        binding_reset_policy: BindingResetPolicy::Drop,
        ..BridgeConfig::default()
    };
    let mut service =
        BridgeService::from_config(&config, RecordingHost::with_context(), JsonCodec);
    service.context_created().expect("ready");
    service.bind(binding("main", &journal));

    service.context_destroyed();
    assert_eq!(service.active_binding(), None);
    assert_eq!(service.pending_binding(), None);
    assert_eq!(journal.lock().as_slice(), ["main:released:Reset".to_owned()]);
}

#[test]
fn missing_context_drops_without_retry() {
    let mut service = bridge();
    service.context_created().expect("ready");
    let gone = service.host_mut().detach();
    assert!(gone.is_some());

    service.on_message(message("lost", json!(1), 1)).expect("dropped");
    service.host_mut().attach();
    service.on_message(message("found", json!(2), 1)).expect("deliver");

    assert_eq!(channels(&service), vec!["found"]);
    assert_eq!(service.metrics().dropped, 1);
}

#[test]
fn codec_failure_is_a_hard_error() {
    let mut service = bridge();
    service.context_created().expect("ready");
    let err = service
        .on_message(Message::new(false, "bad", vec![0xff_u8, 0xfe], 1))
        .expect_err("undecodable payload");
    assert!(matches!(err, BridgeError::Codec { ref channel, .. } if channel == "bad"));
    assert!(service.host().deliveries().is_empty());
}

#[test]
fn post_message_shares_the_gated_order() {
    let mut service = bridge();
    service.on_message(message("first", json!(1), 3)).expect("buffer");
    let payload = JsonCodec.encode(&json!({"port": true})).expect("encode");
    service
        .on_post_message(
            "second",
            TransferableMessage::new(payload, vec![PortHandle::new(4)]),
        )
        .expect("buffer");
    service.context_created().expect("ready");

    let deliveries = service.host().deliveries();
    assert_eq!(deliveries[1].channel, "second");
    assert_eq!(deliveries[1].ports, vec![PortHandle::new(4)]);
    assert_eq!(deliveries[1].sender_id, NO_SENDER);
}

#[test]
fn user_activation_ignores_gate_and_queue() {
    let mut service = bridge();
    service.on_message(message("queued", json!(0), 1)).expect("buffer");
    service.notify_user_activation();
    assert_eq!(
        service.host().context().map(|c| c.user_activations()),
        Some(1)
    );
    assert_eq!(service.pending_len(), 1);
    assert!(service.host().deliveries().is_empty());
}

#[test]
fn pump_applies_transport_events_in_order() {
    let transport = InMemoryTransport::new();
    transport.send(BridgeEvent::Message(message("a", json!(1), 1)));
    transport.send(BridgeEvent::ContextCreated);
    transport.send(BridgeEvent::Message(message("b", json!(2), 1)));
    transport.send(BridgeEvent::UserActivation);

    let mut service = bridge();
    let applied = service.pump(&transport).expect("pump");
    assert_eq!(applied, 4);
    assert!(transport.is_empty());
    assert_eq!(channels(&service), vec!["a", "b"]);
}

#[test]
fn cbor_codec_from_config() {
    let config = BridgeConfig {
        codec: CodecKind::Cbor,
        ..BridgeConfig::default()
    };
    let codec = AnyCodec::from(config.codec);
    let mut service = BridgeService::from_config(&config, RecordingHost::with_context(), codec);
    let payload = codec.encode(&json!({"k": [1, 2]})).expect("encode");
    service
        .on_message(Message::new(true, "cbor", payload, 8))
        .expect("buffer");
    service.context_created().expect("ready");

    let call = &service.host().deliveries()[0];
    assert!(call.internal);
    assert_eq!(call.payload, json!({"k": [1, 2]}));
}

#[test]
fn shutdown_returns_host_with_deliveries() {
    let mut service = bridge();
    service.context_created().expect("ready");
    service.on_message(message("kept", json!(1), 1)).expect("deliver");
    let host = service.shutdown();
    assert_eq!(host.deliveries().len(), 1);
}

#[test]
fn script_replay_drives_full_lifecycle() -> anyhow::Result<()> {
    let script = tempfile::NamedTempFile::new()?;
    std::fs::write(
        script.path(),
        concat!(
            "{\"event\":\"bind\",\"name\":\"a\"}\n",
            "{\"event\":\"message\",\"channel\":\"ping\",\"payload\":\"x\",\"sender_id\":5}\n",
            "{\"event\":\"context_created\"}\n",
            "{\"event\":\"context_destroyed\"}\n",
            "{\"event\":\"message\",\"channel\":\"later\",\"payload\":1}\n",
            "{\"event\":\"context_created\"}\n",
        ),
    )?;

    let mut service = bridge();
    let applied = replay_from_file(&mut service, script.path())?;
    assert_eq!(applied, 6);
    assert_eq!(channels(&service), vec!["ping", "later"]);
    assert!(service.active_binding().is_some());
    Ok(())
}

#[tokio::test]
async fn spawned_bridge_serialises_concurrent_producers() {
    let (handle, task) = spawn_bridge(bridge());
    let producers: Vec<_> = (0..4)
        .map(|worker| {
            let handle = handle.clone();
            tokio::spawn(async move {
                for n in 0..10 {
                    let payload = JsonCodec.encode(&json!(n)).expect("encode");
                    handle
                        .message(Message::new(false, format!("w{worker}"), payload, worker))
                        .expect("send");
                }
            })
        })
        .collect();
    for producer in producers {
        producer.await.expect("producer");
    }
    handle.context_created().expect("ready");
    drop(handle);

    let (service, summary) = task.await.expect("bridge task");
    assert!(summary.failures.is_empty());
    let deliveries = service.host().deliveries();
    assert_eq!(deliveries.len(), 40);
    for worker in 0..4 {
        let seen: Vec<Value> = deliveries
            .iter()
            .filter(|d| d.channel == format!("w{worker}"))
            .map(|d| d.payload.clone())
            .collect();
        let expected: Vec<Value> = (0..10).map(|n| json!(n)).collect();
        assert_eq!(seen, expected);
    }
}
