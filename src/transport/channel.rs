//! # Transport Channel
//!
//! A [`Channel`] is one established, bidirectional link to a peer actor system.
//!
//! ## Tasks
//!
//! Establishing a channel performs the `Hello` handshake and then spawns two tasks:
//!
//! - **writer**: owns the write half and drains a bounded queue of encoded frames. It is the
//!   only writer, so concurrent senders can never interleave partial frames.
//! - **reader**: owns the read half and decodes frames in arrival order. Replies complete
//!   the matching pending call; invocations are dispatched on their own task to the
//!   [`InboundHandler`], and the resulting reply is queued on the writer.
//!
//! ## Closing
//!
//! The channel closes on [`Channel::close`], peer EOF, an I/O error or a protocol error.
//! Every pending call then fails with the close reason and new calls fail immediately.

use crate::envelope::{InvocationEnvelope, PendingCalls, ReplyBody, ReplyEnvelope, WireMessage};
use crate::error::ActorSystemError;
use crate::identity::{ActorIdentity, NodeId};
use crate::system::SystemConfig;
use crate::transport::frame::{read_frame, write_frame};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

/// Receives what a channel cannot handle itself.
#[async_trait]
pub trait InboundHandler: Send + Sync + 'static {
    /// Produces the one reply owed for `envelope`.
    async fn handle_invocation(
        &self,
        peer: &NodeId,
        envelope: InvocationEnvelope,
    ) -> ReplyEnvelope;

    /// Called once when the channel to `peer` has closed.
    fn channel_closed(&self, peer: &NodeId, reason: &ActorSystemError);
}

/// An established link to one peer.
pub struct Channel {
    local: NodeId,
    peer: NodeId,
    outbound: mpsc::Sender<Bytes>,
    pending: Arc<PendingCalls>,
    closed: CancellationToken,
}

impl Channel {
    /// Runs the handshake over `stream` and starts the channel's tasks.
    pub async fn establish<S>(
        stream: S,
        local: NodeId,
        config: &SystemConfig,
        handler: Arc<dyn InboundHandler>,
    ) -> Result<Arc<Self>, ActorSystemError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut reader, mut writer) = tokio::io::split(stream);
        let max_frame_size = config.max_frame_size;

        let hello = WireMessage::Hello(local.clone()).encode()?;
        let handshake = async {
            write_frame(&mut writer, &hello).await?;
            match read_frame(&mut reader, max_frame_size).await? {
                Some(body) => match WireMessage::decode(body)? {
                    WireMessage::Hello(peer) => Ok::<_, ActorSystemError>(peer),
                    other => Err(ActorSystemError::MalformedPayload(format!(
                        "expected hello, got {}",
                        other.kind()
                    ))),
                },
                None => Err(ActorSystemError::ChannelClosed),
            }
        };
        let peer = tokio::time::timeout(config.handshake_timeout, handshake)
            .await
            .map_err(|_| ActorSystemError::TimedOut(config.handshake_timeout))??;
        info!(local = %local, peer = %peer, "Channel established");

        let (outbound, queue) = mpsc::channel(config.outbound_capacity.max(1));
        let channel = Arc::new(Self {
            local,
            peer,
            outbound,
            pending: Arc::new(PendingCalls::new()),
            closed: CancellationToken::new(),
        });

        let span = tracing::info_span!("channel", peer = %channel.peer);
        tokio::spawn(
            write_loop(writer, queue, channel.closed.clone(), channel.peer.clone())
                .instrument(span.clone()),
        );
        tokio::spawn(
            read_loop(reader, Arc::clone(&channel), handler, max_frame_size).instrument(span),
        );
        Ok(channel)
    }

    pub fn local(&self) -> &NodeId {
        &self.local
    }

    pub fn peer(&self) -> &NodeId {
        &self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Number of calls waiting for a reply.
    pub fn pending_calls(&self) -> usize {
        self.pending.len()
    }

    /// Resolves once the channel has closed.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    /// Sends an invocation and waits for its reply.
    ///
    /// The timeout covers queueing and waiting. On expiry the pending entry is removed and a
    /// late reply is discarded; the remote side is not told to stop.
    pub async fn call(
        &self,
        target: &ActorIdentity,
        selector: &str,
        payload: Bytes,
        timeout: Option<Duration>,
    ) -> Result<ReplyBody, ActorSystemError> {
        let pending = self.pending.register()?;
        let correlation_id = pending.id();
        let frame = WireMessage::Invocation(InvocationEnvelope {
            correlation_id,
            target: target.clone(),
            selector: selector.to_owned(),
            payload,
        })
        .encode()?;

        debug!(peer = %self.peer, %correlation_id, selector, "Sending invocation");
        let exchange = async {
            self.outbound
                .send(frame)
                .await
                .map_err(|_| ActorSystemError::ChannelClosed)?;
            pending.wait(None).await
        };
        match timeout {
            Some(limit) => tokio::time::timeout(limit, exchange).await.map_err(|_| {
                debug!(peer = %self.peer, %correlation_id, ?limit, "Invocation timed out");
                ActorSystemError::TimedOut(limit)
            })?,
            None => exchange.await,
        }
    }

    /// Closes the channel, failing every pending call with `reason`.
    pub fn close(&self, reason: ActorSystemError) {
        let failed = self.pending.fail_all(reason.clone());
        if !self.closed.is_cancelled() {
            info!(peer = %self.peer, %reason, failed, "Closing channel");
        }
        self.closed.cancel();
    }
}

async fn write_loop<W>(
    mut writer: W,
    mut queue: mpsc::Receiver<Bytes>,
    closed: CancellationToken,
    peer: NodeId,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let frame = tokio::select! {
            _ = closed.cancelled() => break,
            frame = queue.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };
        if let Err(e) = write_frame(&mut writer, &frame).await {
            warn!(%peer, error = %e, "Write failed");
            closed.cancel();
            break;
        }
    }
    let _ = writer.shutdown().await;
    debug!(%peer, "Writer stopped");
}

async fn read_loop<R>(
    mut reader: R,
    channel: Arc<Channel>,
    handler: Arc<dyn InboundHandler>,
    max_frame_size: usize,
) where
    R: AsyncRead + Unpin,
{
    let peer = channel.peer.clone();
    let reason = loop {
        let frame = tokio::select! {
            _ = channel.closed.cancelled() => break ActorSystemError::ChannelClosed,
            frame = read_frame(&mut reader, max_frame_size) => frame,
        };
        let body = match frame {
            Ok(Some(body)) => body,
            Ok(None) => {
                info!(%peer, "Peer closed channel");
                break ActorSystemError::ChannelClosed;
            }
            Err(e) => {
                warn!(%peer, error = %e, "Read failed");
                break ActorSystemError::ChannelClosed;
            }
        };
        match WireMessage::decode(body) {
            Ok(WireMessage::Reply(reply)) => {
                debug!(
                    %peer,
                    correlation_id = %reply.correlation_id,
                    error = reply.is_error(),
                    "Reply"
                );
                channel.pending.complete(reply);
            }
            Ok(WireMessage::Invocation(envelope)) => {
                dispatch(&channel, &handler, envelope);
            }
            Ok(WireMessage::Hello(node)) => {
                warn!(%peer, announced = %node, "Ignoring repeated hello");
            }
            Err(e) => {
                warn!(%peer, error = %e, "Protocol error");
                break ActorSystemError::ChannelClosed;
            }
        }
    };

    channel.close(reason.clone());
    handler.channel_closed(&peer, &reason);
}

fn dispatch(
    channel: &Arc<Channel>,
    handler: &Arc<dyn InboundHandler>,
    envelope: InvocationEnvelope,
) {
    let handler = Arc::clone(handler);
    let outbound = channel.outbound.clone();
    let peer = channel.peer.clone();
    tokio::spawn(
        async move {
            let correlation_id = envelope.correlation_id;
            let reply = handler.handle_invocation(&peer, envelope).await;
            let frame = WireMessage::Reply(reply).encode().or_else(|e| {
                let failure = ReplyEnvelope::failure(correlation_id, e.to_descriptor());
                WireMessage::Reply(failure).encode()
            });
            match frame {
                Ok(frame) => {
                    if outbound.send(frame).await.is_err() {
                        debug!(%peer, %correlation_id, "Channel closed before reply was sent");
                    }
                }
                Err(e) => warn!(%peer, %correlation_id, error = %e, "Reply could not be encoded"),
            }
        }
        .in_current_span(),
    );
}
