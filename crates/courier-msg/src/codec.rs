//! ---
//! courier_section: "02-gated-delivery"
//! courier_subsection: "module"
//! courier_type: "source"
//! courier_scope: "code"
//! courier_description: "Payload projection and port entanglement codecs."
//! courier_version: "v0.0.0-prealpha"
//! courier_owner: "tbd"
//! ---
use courier_common::CodecKind;
use serde_json::Value as JsonValue;

use crate::destination::Destination;
use crate::types::{Payload, PortHandle};

/// Failure to turn payload bytes into a destination value.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Payload is not valid JSON.
    #[error("json payload: {0}")]
    Json(#[from] serde_json::Error),
    /// Payload is not valid CBOR.
    #[error("cbor payload: {0}")]
    Cbor(#[from] serde_cbor::Error),
}

/// Converts opaque payloads and port handles into a destination's native representation.
pub trait Codec<D: Destination> {
    /// Project a payload into the destination's value representation.
    fn project(&self, payload: &Payload, context: &D) -> Result<D::Value, CodecError>;

    /// Entangle a transferred port into the destination.
    fn entangle(&self, port: PortHandle, context: &mut D) -> D::Port;
}

/// Encodes script or test values into payload bytes the matching codec can read back.
pub trait PayloadEncoder {
    /// Encode `value` into payload bytes.
    fn encode(&self, value: &JsonValue) -> Result<Payload, CodecError>;
}

/// Payloads are UTF-8 JSON documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

/// Payloads are CBOR documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct CborCodec;

/// Codec selected at runtime from configuration.
#[derive(Debug, Clone, Copy)]
pub enum AnyCodec {
    /// See [`JsonCodec`].
    Json(JsonCodec),
    /// See [`CborCodec`].
    Cbor(CborCodec),
}

impl From<CodecKind> for AnyCodec {
    fn from(kind: CodecKind) -> Self {
        match kind {
            CodecKind::Json => AnyCodec::Json(JsonCodec),
            CodecKind::Cbor => AnyCodec::Cbor(CborCodec),
        }
    }
}

impl<D> Codec<D> for JsonCodec
where
    D: Destination<Value = JsonValue>,
    D::Port: From<PortHandle>,
{
    fn project(&self, payload: &Payload, _context: &D) -> Result<JsonValue, CodecError> {
        Ok(serde_json::from_slice(payload.as_bytes())?)
    }

    fn entangle(&self, port: PortHandle, _context: &mut D) -> D::Port {
        D::Port::from(port)
    }
}

impl<D> Codec<D> for CborCodec
where
    D: Destination<Value = JsonValue>,
    D::Port: From<PortHandle>,
{
    fn project(&self, payload: &Payload, _context: &D) -> Result<JsonValue, CodecError> {
        Ok(serde_cbor::from_slice(payload.as_bytes())?)
    }

    fn entangle(&self, port: PortHandle, _context: &mut D) -> D::Port {
        D::Port::from(port)
    }
}

impl<D> Codec<D> for AnyCodec
where
    D: Destination<Value = JsonValue>,
    D::Port: From<PortHandle>,
{
    fn project(&self, payload: &Payload, context: &D) -> Result<JsonValue, CodecError> {
        match self {
            AnyCodec::Json(codec) => codec.project(payload, context),
            AnyCodec::Cbor(codec) => codec.project(payload, context),
        }
    }

    fn entangle(&self, port: PortHandle, _context: &mut D) -> D::Port {
        D::Port::from(port)
    }
}

impl PayloadEncoder for JsonCodec {
    fn encode(&self, value: &JsonValue) -> Result<Payload, CodecError> {
        Ok(Payload::from(serde_json::to_vec(value)?))
    }
}

impl PayloadEncoder for CborCodec {
    fn encode(&self, value: &JsonValue) -> Result<Payload, CodecError> {
        Ok(Payload::from(serde_cbor::to_vec(value)?))
    }
}

impl PayloadEncoder for AnyCodec {
    fn encode(&self, value: &JsonValue) -> Result<Payload, CodecError> {
        match self {
            AnyCodec::Json(codec) => codec.encode(value),
            AnyCodec::Cbor(codec) => codec.encode(value),
        }
    }
}
