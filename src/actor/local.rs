//! # Local Actors
//!
//! A local actor is an [`ActorCell`] running in its own Tokio task plus any number of
//! [`LocalHandle`]s that feed its mailbox.
//!
//! ## Implementation Details
//!
//! The cell owns the actor value and the receiving end of a bounded MPSC channel. Its
//! event loop:
//!
//! 1. Calls [`DistributedActor::on_start`] once.
//! 2. Receives an [`Invocation`], awaits [`DistributedActor::handle`], and sends the result
//!    back over the invocation's oneshot channel.
//! 3. When every handle has been dropped (the registry's included), calls
//!    [`DistributedActor::on_stop`] and exits.
//!
//! Because only the loop touches the actor, no two operations ever run against the same
//! actor's state at once.

use super::{DistributedActor, Operation};
use crate::codec::{short_type_name, ErrorDescriptor, JsonCodec};
use crate::error::{ActorSystemError, InvokeError};
use crate::identity::ActorIdentity;
use async_trait::async_trait;
use bytes::Bytes;
use std::any::Any;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// One-shot reply channel for a single invocation.
pub type Response<A> =
    oneshot::Sender<Result<<A as DistributedActor>::Reply, <A as DistributedActor>::Error>>;

/// Message placed in an actor's mailbox.
pub struct Invocation<A: DistributedActor> {
    pub op: A::Operation,
    pub respond_to: Response<A>,
}

/// The server half of a local actor.
pub struct ActorCell<A: DistributedActor> {
    identity: ActorIdentity,
    actor: A,
    receiver: mpsc::Receiver<Invocation<A>>,
}

impl<A: DistributedActor> ActorCell<A> {
    /// Creates the cell and the first handle to it.
    ///
    /// `default_timeout` bounds [`LocalHandle::call`] the same way the system's call timeout
    /// bounds remote calls.
    pub fn new(
        identity: ActorIdentity,
        actor: A,
        mailbox_capacity: usize,
        default_timeout: Option<Duration>,
    ) -> (Self, LocalHandle<A>) {
        let (sender, receiver) = mpsc::channel(mailbox_capacity.max(1));
        let handle = LocalHandle {
            identity: identity.clone(),
            sender,
            default_timeout,
        };
        let cell = Self {
            identity,
            actor,
            receiver,
        };
        (cell, handle)
    }

    /// Creates the cell and spawns its loop on the current runtime.
    pub fn spawn(
        identity: ActorIdentity,
        actor: A,
        mailbox_capacity: usize,
        default_timeout: Option<Duration>,
    ) -> LocalHandle<A> {
        let (cell, handle) = Self::new(identity, actor, mailbox_capacity, default_timeout);
        tokio::spawn(cell.run());
        handle
    }

    /// Runs the actor's event loop until the mailbox closes.
    pub async fn run(mut self) {
        let actor = short_type_name::<A>();
        let identity = self.identity;
        info!(actor, %identity, "Actor started");
        self.actor.on_start(&identity).await;

        let mut handled: u64 = 0;
        while let Some(Invocation { op, respond_to }) = self.receiver.recv().await {
            let selector = op.selector();
            debug!(actor, %identity, selector, ?op, "Invocation");
            let result = self.actor.handle(op).await;
            match &result {
                Ok(_) => debug!(actor, %identity, selector, "Invocation ok"),
                Err(e) => warn!(actor, %identity, selector, error = %e, "Invocation failed"),
            }
            handled += 1;
            // The caller may have timed out or been cancelled; that is not our concern.
            let _ = respond_to.send(result);
        }

        self.actor.on_stop().await;
        info!(actor, %identity, handled, "Actor stopped");
    }
}

/// Local reference to an in-process actor.
///
/// Holds only a mailbox sender, so cloning is cheap. The actor stops once every handle is
/// dropped.
pub struct LocalHandle<A: DistributedActor> {
    identity: ActorIdentity,
    sender: mpsc::Sender<Invocation<A>>,
    default_timeout: Option<Duration>,
}

impl<A: DistributedActor> Clone for LocalHandle<A> {
    fn clone(&self) -> Self {
        Self {
            identity: self.identity.clone(),
            sender: self.sender.clone(),
            default_timeout: self.default_timeout,
        }
    }
}

impl<A: DistributedActor> LocalHandle<A> {
    pub fn identity(&self) -> &ActorIdentity {
        &self.identity
    }

    /// `true` once the actor's loop has exited.
    pub fn is_stopped(&self) -> bool {
        self.sender.is_closed()
    }

    /// Invokes an operation, bounded by the default call timeout.
    pub async fn call(&self, op: A::Operation) -> Result<A::Reply, InvokeError<A::Error>> {
        self.call_with_timeout(op, self.default_timeout).await
    }

    /// Invokes an operation, waiting at most `timeout` (or forever with `None`).
    pub async fn call_with_timeout(
        &self,
        op: A::Operation,
        timeout: Option<Duration>,
    ) -> Result<A::Reply, InvokeError<A::Error>> {
        let exchange = async {
            let (respond_to, response) = oneshot::channel();
            self.sender
                .send(Invocation { op, respond_to })
                .await
                .map_err(|_| ActorSystemError::ActorStopped)?;
            let result = response.await.map_err(|_| ActorSystemError::ActorStopped)?;
            result.map_err(InvokeError::Operation)
        };
        match timeout {
            Some(limit) => tokio::time::timeout(limit, exchange)
                .await
                .map_err(|_| ActorSystemError::TimedOut(limit))?,
            None => exchange.await,
        }
    }
}

/// Type-erased view of a local actor, stored in the identity registry.
///
/// Lets the inbound dispatcher run encoded operations without knowing the actor type,
/// and lets typed resolution recover the [`LocalHandle`] through [`AnyActor::as_any`].
#[async_trait]
pub trait AnyActor: Send + Sync + 'static {
    fn identity(&self) -> &ActorIdentity;

    /// Short type name of the hosted actor.
    fn actor_type(&self) -> &'static str;

    /// Decodes the operation, runs it, and encodes the reply or error.
    async fn dispatch(
        &self,
        codec: &JsonCodec,
        selector: &str,
        payload: &[u8],
    ) -> Result<Bytes, ErrorDescriptor>;

    fn as_any(&self) -> &dyn Any;
}

#[async_trait]
impl<A: DistributedActor> AnyActor for LocalHandle<A> {
    fn identity(&self) -> &ActorIdentity {
        &self.identity
    }

    fn actor_type(&self) -> &'static str {
        short_type_name::<A>()
    }

    async fn dispatch(
        &self,
        codec: &JsonCodec,
        selector: &str,
        payload: &[u8],
    ) -> Result<Bytes, ErrorDescriptor> {
        let op: A::Operation = codec
            .decode_operation(selector, payload)
            .map_err(|e| e.to_descriptor())?;
        // The remote caller applies its own timeout; do not impose ours on inbound work.
        match self.call_with_timeout(op, None).await {
            Ok(reply) => codec.encode(&reply).map_err(|e| e.to_descriptor()),
            Err(InvokeError::Operation(e)) => Err(codec.encode_operation_error(&e)),
            Err(InvokeError::System(e)) => Err(e.to_descriptor()),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
