//! # Actor System Errors
//!
//! Two layers of failure cross an invocation:
//!
//! - [`ActorSystemError`]: failures of the runtime itself (resolution, decoding, transport,
//!   timeouts). These are tagged `System` when they travel in an
//!   [`ErrorDescriptor`](crate::codec::ErrorDescriptor).
//! - The invoked operation's own error type, which is carried losslessly back to the caller
//!   and surfaced as [`InvokeError::Operation`].
//!
//! Keeping them apart means a dropped connection can never be mistaken for, say, an
//! "illegal move" reported by a game actor.

use crate::codec::{ErrorDescriptor, ErrorOrigin};
use crate::identity::ActorIdentity;
use std::time::Duration;

/// Errors raised by the actor system runtime.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActorSystemError {
    #[error("Identity already registered: {0}")]
    DuplicateIdentity(ActorIdentity),
    #[error("No local, on-demand or remote path to {0}")]
    UnresolvableIdentity(ActorIdentity),
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
    #[error("Call timed out after {0:?}")]
    TimedOut(Duration),
    #[error("Channel closed")]
    ChannelClosed,
    #[error("Actor system shutting down")]
    ShuttingDown,
    #[error("Actor stopped")]
    ActorStopped,
    #[error("Actor {identity} is a {actual}, not a {expected}")]
    WrongActorType {
        identity: ActorIdentity,
        expected: String,
        actual: String,
    },
    #[error("Transport error: {0}")]
    Transport(String),
    /// A system-origin descriptor whose kind this build does not know.
    #[error("Remote system error {kind}: {message}")]
    Remote { kind: String, message: String },
}

impl ActorSystemError {
    /// Stable kind name used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DuplicateIdentity(_) => "DuplicateIdentity",
            Self::UnresolvableIdentity(_) => "UnresolvableIdentity",
            Self::MalformedPayload(_) => "MalformedPayload",
            Self::TimedOut(_) => "TimedOut",
            Self::ChannelClosed => "ChannelClosed",
            Self::ShuttingDown => "ShuttingDown",
            Self::ActorStopped => "ActorStopped",
            Self::WrongActorType { .. } => "WrongActorType",
            Self::Transport(_) => "Transport",
            Self::Remote { .. } => "Remote",
        }
    }

    /// Describes this error for transmission to a peer.
    pub fn to_descriptor(&self) -> ErrorDescriptor {
        let detail = match self {
            Self::DuplicateIdentity(id) | Self::UnresolvableIdentity(id) => {
                serde_json::to_value(id).ok()
            }
            Self::TimedOut(after) => serde_json::to_value(after).ok(),
            _ => None,
        };
        let kind = match self {
            Self::Remote { kind, .. } => kind.clone(),
            other => other.kind().to_owned(),
        };
        let message = match self {
            Self::Remote { message, .. } => message.clone(),
            other => other.to_string(),
        };
        ErrorDescriptor {
            origin: ErrorOrigin::System,
            kind,
            message,
            detail,
        }
    }

    /// Rebuilds a system error from a descriptor sent by a peer.
    ///
    /// Kinds whose detail cannot be rebuilt, or that this build does not know, come back as
    /// [`ActorSystemError::Remote`] with the original kind and message.
    pub fn from_descriptor(descriptor: &ErrorDescriptor) -> Self {
        let identity = || {
            descriptor
                .detail
                .clone()
                .and_then(|value| serde_json::from_value::<ActorIdentity>(value).ok())
        };
        let rebuilt = match descriptor.kind.as_str() {
            "DuplicateIdentity" => identity().map(Self::DuplicateIdentity),
            "UnresolvableIdentity" => identity().map(Self::UnresolvableIdentity),
            "MalformedPayload" => Some(Self::MalformedPayload(
                descriptor
                    .message
                    .strip_prefix("Malformed payload: ")
                    .unwrap_or(&descriptor.message)
                    .to_owned(),
            )),
            "TimedOut" => descriptor
                .detail
                .clone()
                .and_then(|value| serde_json::from_value::<Duration>(value).ok())
                .map(Self::TimedOut),
            "ChannelClosed" => Some(Self::ChannelClosed),
            "ShuttingDown" => Some(Self::ShuttingDown),
            "ActorStopped" => Some(Self::ActorStopped),
            _ => None,
        };
        rebuilt.unwrap_or_else(|| Self::Remote {
            kind: descriptor.kind.clone(),
            message: descriptor.message.clone(),
        })
    }
}

impl From<std::io::Error> for ActorSystemError {
    fn from(e: std::io::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

/// Outcome of a failed invocation.
///
/// `E` is the invoked actor's own error type.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum InvokeError<E> {
    #[error(transparent)]
    System(#[from] ActorSystemError),
    #[error("Operation failed: {0}")]
    Operation(E),
}

impl<E> InvokeError<E> {
    /// The operation's own error, if that is what failed.
    pub fn operation(&self) -> Option<&E> {
        match self {
            Self::Operation(e) => Some(e),
            Self::System(_) => None,
        }
    }

    pub fn system(&self) -> Option<&ActorSystemError> {
        match self {
            Self::System(e) => Some(e),
            Self::Operation(_) => None,
        }
    }
}
