//! # Serialization Codec
//!
//! Converts operation arguments, replies and errors to and from bytes.
//!
//! The codec works over the closed set of shapes an actor declares through its
//! [`DistributedActor`](crate::actor::DistributedActor) associated types; there is no
//! reflection or schema negotiation. Both peers must be built with the same shapes.
//!
//! JSON (`serde_json`) is the format: it is easy to inspect in packet captures and every
//! serde type works with it unchanged.
//!
//! ## Error descriptors
//!
//! Failures cross the network as an [`ErrorDescriptor`], tagged with their [`ErrorOrigin`].
//! Operation errors keep their full serialized value in `detail`, so the caller decodes the
//! exact error the remote actor returned rather than a generic failure.

use crate::actor::Operation;
use crate::error::ActorSystemError;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Where an error was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorOrigin {
    /// The actor system runtime (resolution, decoding, transport).
    System,
    /// The invoked operation itself.
    Operation,
}

/// Transportable description of a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ErrorDescriptor {
    pub origin: ErrorOrigin,
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

/// JSON codec used for every payload the actor system moves.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Bytes, ActorSystemError> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|e| ActorSystemError::MalformedPayload(format!("encode failed: {e}")))
    }

    /// Decodes `bytes` into the expected shape `T`.
    ///
    /// Shape mismatches and truncated input both fail with `MalformedPayload`.
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, ActorSystemError> {
        serde_json::from_slice(bytes).map_err(|e| ActorSystemError::MalformedPayload(e.to_string()))
    }

    /// Decodes an operation and checks it against the selector carried by the envelope.
    pub fn decode_operation<O: Operation>(
        &self,
        selector: &str,
        bytes: &[u8],
    ) -> Result<O, ActorSystemError> {
        if !O::SELECTORS.contains(&selector) {
            return Err(ActorSystemError::MalformedPayload(format!(
                "unknown selector `{selector}`"
            )));
        }
        let operation: O = self.decode(bytes)?;
        if operation.selector() != selector {
            return Err(ActorSystemError::MalformedPayload(format!(
                "payload is `{}` but envelope selector is `{selector}`",
                operation.selector()
            )));
        }
        Ok(operation)
    }

    /// Describes an operation's own error.
    ///
    /// The kind is the serialized enum variant name when there is one (`"IllegalMove"` for
    /// `BotError::IllegalMove(..)`), otherwise the bare type name.
    pub fn encode_operation_error<E>(&self, error: &E) -> ErrorDescriptor
    where
        E: Serialize + std::error::Error,
    {
        let detail = serde_json::to_value(error).ok();
        let kind = detail
            .as_ref()
            .and_then(variant_name)
            .unwrap_or_else(|| short_type_name::<E>().to_owned());
        ErrorDescriptor {
            origin: ErrorOrigin::Operation,
            kind,
            message: error.to_string(),
            detail,
        }
    }

    /// Rebuilds an operation error from its descriptor.
    pub fn decode_operation_error<E: DeserializeOwned>(
        &self,
        descriptor: &ErrorDescriptor,
    ) -> Result<E, ActorSystemError> {
        let detail = descriptor.detail.clone().ok_or_else(|| {
            ActorSystemError::MalformedPayload(format!(
                "operation error `{}` carries no detail",
                descriptor.kind
            ))
        })?;
        serde_json::from_value(detail)
            .map_err(|e| ActorSystemError::MalformedPayload(e.to_string()))
    }
}

fn variant_name(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(name) => Some(name.clone()),
        serde_json::Value::Object(map) if map.len() == 1 => map.keys().next().cloned(),
        _ => None,
    }
}

/// `"Counter"` instead of `"my_crate::actors::Counter"`.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
