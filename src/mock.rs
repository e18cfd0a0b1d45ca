//! # Mock Peer
//!
//! A scripted remote node for testing code that calls remote actors, without a second real
//! actor system or a socket.
//!
//! [`MockPeer::attach`] connects an in-memory stream to the system under test and performs
//! the handshake, so the system sees an ordinary connected peer. Invocations addressed to
//! the mock's node are answered from a queue of expectations, in order.
//!
//! ```rust,ignore
//! let system = ActorSystem::default();
//! let mut mock = MockPeer::attach(&system, "server").await?;
//! mock.expect_invocation("make_move").return_ok(&4u8);
//! mock.expect_invocation("reset").never_reply();
//!
//! let id = system.assign_remote_identity(mock.node(), Some("bot"));
//! let bot = system.resolve::<BotPlayer>(&id)?;
//! // Use bot in tests...
//! mock.verify(); // Ensures all expectations were met
//! ```
//!
//! An invocation that arrives with no expectation queued, or with a different selector,
//! is answered with a system error and reported by [`MockPeer::verify`].

use crate::codec::{ErrorDescriptor, JsonCodec};
use crate::envelope::{InvocationEnvelope, ReplyEnvelope, WireMessage};
use crate::error::ActorSystemError;
use crate::identity::{ActorIdentity, NodeId};
use crate::system::ActorSystem;
use crate::transport::frame::{read_frame, write_frame};
use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const BUFFER_SIZE: usize = 64 * 1024;
const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// What the mock sends back for one expected invocation.
enum Response {
    Reply(Result<Bytes, ErrorDescriptor>),
    Never,
}

struct Expectation {
    selector: String,
    delay: Option<Duration>,
    response: Response,
}

#[derive(Default)]
struct Script {
    expectations: VecDeque<Expectation>,
    received: Vec<InvocationEnvelope>,
    unexpected: Vec<String>,
}

/// An in-memory remote node with expectation tracking.
pub struct MockPeer {
    node: NodeId,
    script: Arc<Mutex<Script>>,
    disconnect: CancellationToken,
    codec: JsonCodec,
}

impl MockPeer {
    /// Connects a new mock node named `node` to `system`.
    pub async fn attach(
        system: &ActorSystem,
        node: impl Into<String>,
    ) -> Result<Self, ActorSystemError> {
        let node = NodeId::new(node);
        let (system_side, mock_side) = tokio::io::duplex(BUFFER_SIZE);
        let script = Arc::new(Mutex::new(Script::default()));
        let disconnect = CancellationToken::new();

        tokio::spawn(serve(
            mock_side,
            node.clone(),
            Arc::clone(&script),
            disconnect.clone(),
        ));
        system.attach(system_side).await?;

        Ok(Self {
            node,
            script,
            disconnect,
            codec: JsonCodec,
        })
    }

    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// Mints an identity owned by the mock node.
    pub fn identity(&self, role: Option<&str>) -> ActorIdentity {
        ActorIdentity::generate(self.node.clone(), role)
    }

    /// Expects the next invocation to carry `selector`.
    pub fn expect_invocation(
        &mut self,
        selector: impl Into<String>,
    ) -> InvocationExpectationBuilder<'_> {
        InvocationExpectationBuilder {
            selector: selector.into(),
            delay: None,
            mock: self,
        }
    }

    /// Every invocation received so far, in arrival order.
    pub fn received(&self) -> Vec<InvocationEnvelope> {
        self.script.lock().received.clone()
    }

    /// Drops the connection. Calls still waiting on it fail with `ChannelClosed`.
    pub fn disconnect(&self) {
        self.disconnect.cancel();
    }

    /// Verifies that all expectations were met and nothing unexpected arrived.
    pub fn verify(&self) {
        let script = self.script.lock();
        if !script.unexpected.is_empty() {
            panic!("Unexpected invocations: {:?}", script.unexpected);
        }
        if !script.expectations.is_empty() {
            let remaining: Vec<_> = script
                .expectations
                .iter()
                .map(|e| e.selector.as_str())
                .collect();
            panic!(
                "Not all expectations were met. {} remaining: {:?}",
                remaining.len(),
                remaining
            );
        }
    }

    fn push(&self, expectation: Expectation) {
        self.script.lock().expectations.push_back(expectation);
    }
}

impl Drop for MockPeer {
    fn drop(&mut self) {
        self.disconnect.cancel();
    }
}

/// Builder for one expected invocation.
pub struct InvocationExpectationBuilder<'a> {
    selector: String,
    delay: Option<Duration>,
    mock: &'a MockPeer,
}

impl InvocationExpectationBuilder<'_> {
    /// Holds the reply back for `delay`.
    pub fn reply_after(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Replies with an encoded success value.
    pub fn return_ok<T: Serialize + ?Sized>(self, value: &T) {
        let reply = self
            .mock
            .codec
            .encode(value)
            .map_err(|e| e.to_descriptor());
        self.finish(Response::Reply(reply));
    }

    /// Replies with the actor's own error, as a real actor would.
    pub fn return_operation_err<E>(self, error: &E)
    where
        E: Serialize + std::error::Error,
    {
        let descriptor = self.mock.codec.encode_operation_error(error);
        self.finish(Response::Reply(Err(descriptor)));
    }

    /// Replies with a runtime error.
    pub fn return_system_err(self, error: ActorSystemError) {
        self.finish(Response::Reply(Err(error.to_descriptor())));
    }

    /// Accepts the invocation and never answers it.
    pub fn never_reply(self) {
        self.finish(Response::Never);
    }

    fn finish(self, response: Response) {
        self.mock.push(Expectation {
            selector: self.selector,
            delay: self.delay,
            response,
        });
    }
}

async fn serve<S>(
    stream: S,
    node: NodeId,
    script: Arc<Mutex<Script>>,
    disconnect: CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let (outbound, mut queue) = mpsc::channel::<Bytes>(64);

    let writer_stop = disconnect.clone();
    tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                _ = writer_stop.cancelled() => break,
                frame = queue.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };
            if write_frame(&mut writer, &frame).await.is_err() {
                break;
            }
        }
    });

    match WireMessage::Hello(node.clone()).encode() {
        Ok(hello) => {
            let _ = outbound.send(hello).await;
        }
        Err(e) => {
            warn!(%node, error = %e, "Mock hello could not be encoded");
            return;
        }
    }

    loop {
        let frame = tokio::select! {
            _ = disconnect.cancelled() => break,
            frame = read_frame(&mut reader, MAX_FRAME_SIZE) => frame,
        };
        let body = match frame {
            Ok(Some(body)) => body,
            Ok(None) | Err(_) => break,
        };
        match WireMessage::decode(body) {
            Ok(WireMessage::Invocation(envelope)) => {
                respond(&script, envelope, &outbound);
            }
            Ok(other) => debug!(%node, kind = other.kind(), "Mock ignoring message"),
            Err(e) => {
                warn!(%node, error = %e, "Mock received garbage");
                break;
            }
        }
    }
    disconnect.cancel();
    debug!(%node, "Mock peer disconnected");
}

fn respond(script: &Mutex<Script>, envelope: InvocationEnvelope, outbound: &mpsc::Sender<Bytes>) {
    let correlation_id = envelope.correlation_id;
    let expectation = {
        let mut script = script.lock();
        script.received.push(envelope.clone());
        match script.expectations.front() {
            Some(next) if next.selector == envelope.selector => script.expectations.pop_front(),
            _ => {
                script.unexpected.push(envelope.selector.clone());
                None
            }
        }
    };

    let (delay, reply) = match expectation {
        Some(Expectation {
            response: Response::Never,
            ..
        }) => return,
        Some(Expectation {
            delay,
            response: Response::Reply(reply),
            ..
        }) => (delay, reply),
        None => (
            None,
            Err(ActorSystemError::Remote {
                kind: "UnexpectedInvocation".into(),
                message: format!("mock did not expect '{}'", envelope.selector),
            }
            .to_descriptor()),
        ),
    };

    let envelope = match reply {
        Ok(payload) => ReplyEnvelope::success(correlation_id, payload),
        Err(descriptor) => ReplyEnvelope::failure(correlation_id, descriptor),
    };
    let outbound = outbound.clone();
    tokio::spawn(async move {
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Ok(frame) = WireMessage::Reply(envelope).encode() {
            let _ = outbound.send(frame).await;
        }
    });
}

/// Connects two actor systems through an in-memory stream.
///
/// Returns each side's view of the other's node id.
pub async fn connect_in_memory(
    left: &ActorSystem,
    right: &ActorSystem,
) -> Result<(NodeId, NodeId), ActorSystemError> {
    let (a, b): (DuplexStream, DuplexStream) = tokio::io::duplex(BUFFER_SIZE);
    let (right_node, left_node) = tokio::try_join!(left.attach(a), right.attach(b))?;
    Ok((right_node, left_node))
}
