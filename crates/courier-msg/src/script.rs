//! ---
//! courier_section: "02-gated-delivery"
//! courier_subsection: "module"
//! courier_type: "source"
//! courier_scope: "code"
//! courier_description: "Replay of newline-delimited JSON event scripts through a bridge."
//! courier_version: "v0.0.0-prealpha"
//! courier_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use crate::binding::{BindRequest, BindingId, ChannelBinding, ReleaseReason};
use crate::codec::{Codec, PayloadEncoder};
use crate::destination::DestinationHost;
use crate::service::BridgeService;
use crate::transport::BridgeEvent;
use crate::types::{DeliveryReceipt, Message, PortHandle, SenderId, TransferableMessage};
use crate::{BridgeError, Result};

/// One line of a replay script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScriptEvent {
    /// Plain inbound message.
    Message {
        /// Addressed channel.
        channel: String,
        /// Private-channel flag.
        #[serde(default)]
        internal: bool,
        /// Logical sender.
        #[serde(default)]
        sender_id: SenderId,
        /// Payload value, encoded with the bridge codec.
        #[serde(default)]
        payload: JsonValue,
    },
    /// Post message carrying ports.
    PostMessage {
        /// Addressed channel.
        channel: String,
        /// Payload value, encoded with the bridge codec.
        #[serde(default)]
        payload: JsonValue,
        /// Transferred ports.
        #[serde(default)]
        ports: Vec<PortHandle>,
    },
    /// Bind a channel under a script-local name.
    Bind {
        /// Name later lines use to refer to this binding.
        name: String,
    },
    /// Disconnect a binding previously bound by name.
    Disconnect {
        /// Name given in the matching `bind` line.
        name: String,
    },
    /// Destination context finished constructing.
    ContextCreated,
    /// Destination context destroyed or replaced.
    ContextDestroyed,
    /// User activation occurred.
    UserActivation,
}

/// Binding created by a script; it only logs what happens to it.
#[derive(Debug)]
pub struct ScriptBinding {
    name: String,
}

impl ScriptBinding {
    /// Create a binding labelled `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl ChannelBinding for ScriptBinding {
    fn on_delivered(&mut self, receipt: &DeliveryReceipt) {
        debug!(
            binding = %self.name,
            sequence = receipt.sequence,
            channel = %receipt.channel,
            replayed = receipt.replayed,
            "script binding observed delivery"
        );
    }

    fn release(&mut self, reason: ReleaseReason) {
        info!(binding = %self.name, reason = ?reason, "script binding released");
    }
}

/// Turns script lines into bridge events, remembering binding names across lines.
#[derive(Debug, Default)]
pub struct ScriptParser {
    names: HashMap<String, BindingId>,
}

impl ScriptParser {
    /// Create a parser with no known bindings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one line. Blank lines yield `None`.
    ///
    /// Payload values are encoded with `encoder`, which must match the codec
    /// of the bridge that will receive the event.
    pub fn parse_line<E>(
        &mut self,
        encoder: &E,
        line_no: usize,
        line: &str,
    ) -> Result<Option<BridgeEvent>>
    where
        E: PayloadEncoder + ?Sized,
    {
        if line.trim().is_empty() {
            return Ok(None);
        }
        let record: ScriptEvent =
            serde_json::from_str(line).map_err(|err| BridgeError::Script {
                line: line_no,
                reason: err.to_string(),
            })?;
        self.build_event(encoder, record, line_no).map(Some)
    }

    /// Identifier bound under `name`, if any.
    pub fn binding(&self, name: &str) -> Option<BindingId> {
        self.names.get(name).copied()
    }

    fn build_event<E>(
        &mut self,
        encoder: &E,
        record: ScriptEvent,
        line: usize,
    ) -> Result<BridgeEvent>
    where
        E: PayloadEncoder + ?Sized,
    {
        let encode = |value: &JsonValue| {
            encoder.encode(value).map_err(|err| BridgeError::Script {
                line,
                reason: err.to_string(),
            })
        };

        let event = match record {
            ScriptEvent::Message {
                channel,
                internal,
                sender_id,
                payload,
            } => {
                let payload = encode(&payload)?;
                BridgeEvent::Message(Message::new(internal, channel, payload, sender_id))
            }
            ScriptEvent::PostMessage {
                channel,
                payload,
                ports,
            } => BridgeEvent::PostMessage {
                channel,
                message: TransferableMessage::new(encode(&payload)?, ports),
            },
            ScriptEvent::Bind { name } => {
                let request = BindRequest::new(ScriptBinding::new(name.clone()));
                self.names.insert(name, request.id());
                BridgeEvent::Bind(request)
            }
            ScriptEvent::Disconnect { name } => match self.names.get(&name) {
                Some(id) => BridgeEvent::Disconnect(*id),
                None => {
                    return Err(BridgeError::Script {
                        line,
                        reason: format!("disconnect names unknown binding `{name}`"),
                    })
                }
            },
            ScriptEvent::ContextCreated => BridgeEvent::ContextCreated,
            ScriptEvent::ContextDestroyed => BridgeEvent::ContextDestroyed,
            ScriptEvent::UserActivation => BridgeEvent::UserActivation,
        };
        Ok(event)
    }
}

/// Apply every event of a newline-delimited JSON script to `service`.
///
/// Blank lines are skipped. Returns the number of events applied.
pub fn replay_from_file<H, C, P>(service: &mut BridgeService<H, C>, path: P) -> Result<usize>
where
    H: DestinationHost,
    C: Codec<H::Context> + PayloadEncoder,
    P: AsRef<Path>,
{
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut parser = ScriptParser::new();
    let mut count = 0usize;

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let Some(event) = parser.parse_line(service.codec(), index + 1, &line)? else {
            continue;
        };
        service.handle(event)?;
        count += 1;
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::codec::JsonCodec;
    use crate::recording::RecordingHost;

    fn write_script(lines: &str) -> tempfile::NamedTempFile {
        let temp = tempfile::NamedTempFile::new().expect("temp file");
        std::fs::write(temp.path(), lines).expect("write script");
        temp
    }

    #[test]
    fn script_events_parse_by_tag() {
        let line = r#"{"event":"message","channel":"ping","payload":"x","sender_id":5}"#;
        let event: ScriptEvent = serde_json::from_str(line).expect("parse");
        assert_eq!(
            event,
            ScriptEvent::Message {
                channel: "ping".into(),
                internal: false,
                sender_id: 5,
                payload: json!("x"),
            }
        );
        let event: ScriptEvent =
            serde_json::from_str(r#"{"event":"context_created"}"#).expect("parse");
        assert_eq!(event, ScriptEvent::ContextCreated);
    }

    #[test]
    fn replay_applies_every_line_in_order() {
        let script = write_script(
            r#"{"event":"message","channel":"ping","payload":"x","sender_id":5}
{"event":"bind","name":"main"}

{"event":"context_created"}
{"event":"post_message","channel":"port","payload":{"n":1},"ports":[7]}
{"event":"disconnect","name":"main"}
"#,
        );
        let mut service = BridgeService::new("script", RecordingHost::with_context(), JsonCodec);
        let applied = replay_from_file(&mut service, script.path()).expect("replay");
        assert_eq!(applied, 5);

        let deliveries = service.host().deliveries();
        assert_eq!(deliveries.len(), 2);
        assert_eq!(deliveries[0].channel, "ping");
        assert_eq!(deliveries[0].payload, json!("x"));
        assert_eq!(deliveries[1].ports, vec![PortHandle::new(7)]);
        assert_eq!(service.active_binding(), None);
        assert_eq!(service.metrics().bindings_released, 1);
    }

    #[test]
    fn parse_errors_carry_line_numbers() {
        let script = write_script("{\"event\":\"context_created\"}\n{\"event\":\"nope\"}\n");
        let mut service = BridgeService::new("script", RecordingHost::with_context(), JsonCodec);
        let err = replay_from_file(&mut service, script.path()).expect_err("bad line");
        assert!(matches!(err, BridgeError::Script { line: 2, .. }));
    }

    #[test]
    fn parser_remembers_binding_names() {
        let mut parser = ScriptParser::new();
        let event = parser
            .parse_line(&JsonCodec, 1, r#"{"event":"bind","name":"a"}"#)
            .expect("parse")
            .expect("event");
        let BridgeEvent::Bind(request) = event else {
            panic!("expected bind event");
        };
        assert_eq!(parser.binding("a"), Some(request.id()));
        assert!(parser.parse_line(&JsonCodec, 2, "   ").expect("blank").is_none());
    }

    #[test]
    fn unknown_binding_name_is_rejected() {
        let script = write_script("{\"event\":\"disconnect\",\"name\":\"ghost\"}\n");
        let mut service = BridgeService::new("script", RecordingHost::with_context(), JsonCodec);
        let err = replay_from_file(&mut service, script.path()).expect_err("unknown name");
        assert!(matches!(
            err,
            BridgeError::Script { line: 1, ref reason } if reason.contains("ghost")
        ));
    }
}
