//! # Call Envelope Protocol
//!
//! Wire shapes for everything that crosses a [`Channel`](crate::transport::Channel).
//!
//! ## Binary Format
//!
//! All integers are big-endian. Each message is the body of one transport frame.
//!
//! ```text
//! Hello       [0x00][node_len: u16][node: utf8]
//! Invocation  [0x01][correlation: u64][identity][selector_len: u16][selector: utf8]
//!             [payload_len: u32][payload]
//! Reply       [0x02][correlation: u64][flags: u8][payload_len: u32][payload]
//!
//! identity    [node_len: u16][node: utf8][uuid: 16 bytes][has_role: u8]
//!             [role_len: u32][role: utf8]    (role fields only when has_role = 1)
//! flags       bit 0 set = payload is a JSON ErrorDescriptor
//! ```
//!
//! An error reply whose descriptor cannot be parsed still answers its call: the caller gets
//! `MalformedPayload` and the channel stays open.

pub mod correlation;

pub use correlation::{PendingCall, PendingCalls};

use crate::codec::ErrorDescriptor;
use crate::error::ActorSystemError;
use crate::identity::{ActorIdentity, NodeId};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use uuid::Uuid;

const KIND_HELLO: u8 = 0x00;
const KIND_INVOCATION: u8 = 0x01;
const KIND_REPLY: u8 = 0x02;

const FLAG_ERROR: u8 = 0b0000_0001;

/// Links an invocation to its reply. Unique per outstanding call on one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationId(u64);

impl CorrelationId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One in-flight remote call.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationEnvelope {
    pub correlation_id: CorrelationId,
    pub target: ActorIdentity,
    pub selector: String,
    pub payload: Bytes,
}

/// Outcome carried by a reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyBody {
    /// Encoded return value.
    Success(Bytes),
    Failure(ErrorDescriptor),
}

/// The single reply to an [`InvocationEnvelope`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyEnvelope {
    pub correlation_id: CorrelationId,
    pub body: ReplyBody,
}

impl ReplyEnvelope {
    pub fn success(correlation_id: CorrelationId, payload: Bytes) -> Self {
        Self {
            correlation_id,
            body: ReplyBody::Success(payload),
        }
    }

    pub fn failure(correlation_id: CorrelationId, descriptor: ErrorDescriptor) -> Self {
        Self {
            correlation_id,
            body: ReplyBody::Failure(descriptor),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.body, ReplyBody::Failure(_))
    }
}

/// Every message kind a channel carries.
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    /// Handshake: announces the sender's node.
    Hello(NodeId),
    Invocation(InvocationEnvelope),
    Reply(ReplyEnvelope),
}

impl WireMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Hello(_) => "hello",
            Self::Invocation(_) => "invocation",
            Self::Reply(_) => "reply",
        }
    }

    /// Encodes the message into a frame body.
    pub fn encode(&self) -> Result<Bytes, ActorSystemError> {
        let mut buf = BytesMut::with_capacity(128);
        match self {
            Self::Hello(node) => {
                buf.put_u8(KIND_HELLO);
                put_str16(&mut buf, node.as_str())?;
            }
            Self::Invocation(env) => {
                buf.put_u8(KIND_INVOCATION);
                buf.put_u64(env.correlation_id.as_u64());
                put_identity(&mut buf, &env.target)?;
                put_str16(&mut buf, &env.selector)?;
                put_bytes32(&mut buf, &env.payload)?;
            }
            Self::Reply(reply) => {
                buf.put_u8(KIND_REPLY);
                buf.put_u64(reply.correlation_id.as_u64());
                match &reply.body {
                    ReplyBody::Success(payload) => {
                        buf.put_u8(0);
                        put_bytes32(&mut buf, payload)?;
                    }
                    ReplyBody::Failure(descriptor) => {
                        buf.put_u8(FLAG_ERROR);
                        let payload = serde_json::to_vec(descriptor).map_err(|e| {
                            ActorSystemError::MalformedPayload(format!("descriptor: {e}"))
                        })?;
                        put_bytes32(&mut buf, &payload)?;
                    }
                }
            }
        }
        Ok(buf.freeze())
    }

    /// Decodes a frame body. Truncated input, unknown kinds and trailing bytes are rejected.
    pub fn decode(mut body: Bytes) -> Result<Self, ActorSystemError> {
        let kind = get_u8(&mut body)?;
        let message = match kind {
            KIND_HELLO => Self::Hello(NodeId::new(get_str16(&mut body)?)),
            KIND_INVOCATION => {
                let correlation_id = CorrelationId::new(get_u64(&mut body)?);
                let target = get_identity(&mut body)?;
                let selector = get_str16(&mut body)?;
                let payload = get_bytes32(&mut body)?;
                Self::Invocation(InvocationEnvelope {
                    correlation_id,
                    target,
                    selector,
                    payload,
                })
            }
            KIND_REPLY => {
                let correlation_id = CorrelationId::new(get_u64(&mut body)?);
                let flags = get_u8(&mut body)?;
                let payload = get_bytes32(&mut body)?;
                let body = if flags & FLAG_ERROR != 0 {
                    let descriptor = serde_json::from_slice(&payload).unwrap_or_else(|e| {
                        malformed(format!("error descriptor: {e}")).to_descriptor()
                    });
                    ReplyBody::Failure(descriptor)
                } else {
                    ReplyBody::Success(payload)
                };
                Self::Reply(ReplyEnvelope {
                    correlation_id,
                    body,
                })
            }
            other => return Err(malformed(format!("unknown message kind {other:#04x}"))),
        };
        if body.has_remaining() {
            return Err(malformed(format!(
                "{} trailing bytes after {}",
                body.remaining(),
                message.kind()
            )));
        }
        Ok(message)
    }
}

fn malformed(reason: impl Into<String>) -> ActorSystemError {
    ActorSystemError::MalformedPayload(reason.into())
}

fn put_str16(buf: &mut BytesMut, value: &str) -> Result<(), ActorSystemError> {
    let len = u16::try_from(value.len()).map_err(|_| malformed("string longer than u16"))?;
    buf.put_u16(len);
    buf.put_slice(value.as_bytes());
    Ok(())
}

fn put_bytes32(buf: &mut BytesMut, value: &[u8]) -> Result<(), ActorSystemError> {
    let len = u32::try_from(value.len()).map_err(|_| malformed("payload longer than u32"))?;
    buf.put_u32(len);
    buf.put_slice(value);
    Ok(())
}

fn put_identity(buf: &mut BytesMut, id: &ActorIdentity) -> Result<(), ActorSystemError> {
    put_str16(buf, id.node().as_str())?;
    buf.put_slice(id.uuid().as_bytes());
    match id.role() {
        Some(role) => {
            buf.put_u8(1);
            put_bytes32(buf, role.as_bytes())
        }
        None => {
            buf.put_u8(0);
            Ok(())
        }
    }
}

fn need(body: &Bytes, len: usize, what: &str) -> Result<(), ActorSystemError> {
    if body.remaining() < len {
        return Err(malformed(format!(
            "truncated {what}: need {len} bytes, have {}",
            body.remaining()
        )));
    }
    Ok(())
}

fn get_u8(body: &mut Bytes) -> Result<u8, ActorSystemError> {
    need(body, 1, "u8")?;
    Ok(body.get_u8())
}

fn get_u64(body: &mut Bytes) -> Result<u64, ActorSystemError> {
    need(body, 8, "u64")?;
    Ok(body.get_u64())
}

fn get_utf8(body: &mut Bytes, len: usize, what: &str) -> Result<String, ActorSystemError> {
    need(body, len, what)?;
    let raw = body.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| malformed(format!("{what} is not utf-8")))
}

fn get_str16(body: &mut Bytes) -> Result<String, ActorSystemError> {
    need(body, 2, "string length")?;
    let len = body.get_u16() as usize;
    get_utf8(body, len, "string")
}

fn get_bytes32(body: &mut Bytes) -> Result<Bytes, ActorSystemError> {
    need(body, 4, "payload length")?;
    let len = body.get_u32() as usize;
    need(body, len, "payload")?;
    Ok(body.split_to(len))
}

fn get_identity(body: &mut Bytes) -> Result<ActorIdentity, ActorSystemError> {
    let node = NodeId::new(get_str16(body)?);
    need(body, 16, "uuid")?;
    let mut raw = [0u8; 16];
    body.copy_to_slice(&mut raw);
    let role = match get_u8(body)? {
        0 => None,
        1 => {
            need(body, 4, "role length")?;
            let len = body.get_u32() as usize;
            Some(get_utf8(body, len, "role")?)
        }
        other => return Err(malformed(format!("invalid role marker {other}"))),
    };
    Ok(ActorIdentity::from_parts(node, Uuid::from_bytes(raw), role))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ErrorOrigin;

    fn target() -> ActorIdentity {
        ActorIdentity::generate(NodeId::new("server"), Some("bot"))
    }

    #[test]
    fn invocation_layout() {
        let message = WireMessage::Invocation(InvocationEnvelope {
            correlation_id: CorrelationId::new(7),
            target: target(),
            selector: "make_move".into(),
            payload: Bytes::from_static(b"\"MakeMove\""),
        });
        let encoded = message.encode().unwrap();
        assert_eq!(encoded[0], KIND_INVOCATION);
        assert_eq!(&encoded[1..9], &7u64.to_be_bytes());
        assert_eq!(WireMessage::decode(encoded).unwrap(), message);
    }

    #[test]
    fn error_reply_sets_flag_and_carries_descriptor() {
        let descriptor = ErrorDescriptor {
            origin: ErrorOrigin::Operation,
            kind: "IllegalMove".into(),
            message: "square taken".into(),
            detail: Some(serde_json::json!({"IllegalMove": 4})),
        };
        let message = WireMessage::Reply(ReplyEnvelope::failure(CorrelationId::new(3), descriptor));
        let encoded = message.encode().unwrap();
        assert_eq!(encoded[9], FLAG_ERROR);
        let decoded = WireMessage::decode(encoded).unwrap();
        assert_eq!(decoded, message);
        match decoded {
            WireMessage::Reply(reply) => assert!(reply.is_error()),
            other => panic!("expected reply, got {other:?}"),
        }
    }

    #[test]
    fn identity_without_role_round_trips() {
        let id = ActorIdentity::generate(NodeId::new("n"), None);
        let message = WireMessage::Invocation(InvocationEnvelope {
            correlation_id: CorrelationId::new(1),
            target: id.clone(),
            selector: "get".into(),
            payload: Bytes::new(),
        });
        match WireMessage::decode(message.encode().unwrap()).unwrap() {
            WireMessage::Invocation(env) => assert_eq!(env.target, id),
            other => panic!("expected invocation, got {other:?}"),
        }
    }

    #[test]
    fn empty_role_is_not_confused_with_no_role() {
        let node = NodeId::new("n");
        let uuid = Uuid::new_v4();
        for role in [None, Some(String::new()), Some("r".repeat(300))] {
            let id = ActorIdentity::from_parts(node.clone(), uuid, role);
            let message = WireMessage::Invocation(InvocationEnvelope {
                correlation_id: CorrelationId::new(2),
                target: id.clone(),
                selector: "get".into(),
                payload: Bytes::new(),
            });
            match WireMessage::decode(message.encode().unwrap()).unwrap() {
                WireMessage::Invocation(env) => assert_eq!(env.target, id),
                other => panic!("expected invocation, got {other:?}"),
            }
        }
    }

    #[test]
    fn unreadable_error_descriptor_fails_only_its_call() {
        let mut body = BytesMut::new();
        body.put_u8(KIND_REPLY);
        body.put_u64(11);
        body.put_u8(FLAG_ERROR);
        put_bytes32(&mut body, b"{not a descriptor").unwrap();

        match WireMessage::decode(body.freeze()).unwrap() {
            WireMessage::Reply(reply) => {
                assert_eq!(reply.correlation_id, CorrelationId::new(11));
                match reply.body {
                    ReplyBody::Failure(descriptor) => {
                        assert_eq!(descriptor.origin, ErrorOrigin::System);
                        assert_eq!(descriptor.kind, "MalformedPayload");
                    }
                    other => panic!("expected failure, got {other:?}"),
                }
            }
            other => panic!("expected reply, got {other:?}"),
        }
    }

    #[test]
    fn every_truncation_is_rejected() {
        let message = WireMessage::Invocation(InvocationEnvelope {
            correlation_id: CorrelationId::new(99),
            target: target(),
            selector: "reset".into(),
            payload: Bytes::from_static(b"\"Reset\""),
        });
        let encoded = message.encode().unwrap();
        for cut in 0..encoded.len() {
            let err = WireMessage::decode(encoded.slice(..cut)).unwrap_err();
            assert!(matches!(err, ActorSystemError::MalformedPayload(_)), "cut at {cut}");
        }
    }

    #[test]
    fn unknown_kind_and_trailing_bytes_are_rejected() {
        let err = WireMessage::decode(Bytes::from_static(&[0x7f])).unwrap_err();
        assert!(matches!(err, ActorSystemError::MalformedPayload(m) if m.contains("0x7f")));

        let mut hello = BytesMut::from(&WireMessage::Hello(NodeId::new("a")).encode().unwrap()[..]);
        hello.put_u8(0);
        let err = WireMessage::decode(hello.freeze()).unwrap_err();
        assert!(matches!(err, ActorSystemError::MalformedPayload(m) if m.contains("trailing")));
    }
}
