//! # Actor References
//!
//! [`ActorRef`] is what application code holds. It is either a [`LocalHandle`] to an
//! in-process actor or a [`RemoteProxy`] that forwards every call through the transport.
//! Both expose the same [`ActorRef::invoke`] contract; which one you get is decided by the
//! resolver, never by the caller.

use super::{DistributedActor, LocalHandle, Operation};
use crate::codec::ErrorOrigin;
use crate::envelope::ReplyBody;
use crate::error::{ActorSystemError, InvokeError};
use crate::identity::ActorIdentity;
use crate::system::ActorSystem;
use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;
use tracing::{debug, instrument};

/// Location-transparent handle to a distributed actor.
pub enum ActorRef<A: DistributedActor> {
    Local(LocalHandle<A>),
    Remote(RemoteProxy<A>),
}

impl<A: DistributedActor> Clone for ActorRef<A> {
    fn clone(&self) -> Self {
        match self {
            Self::Local(handle) => Self::Local(handle.clone()),
            Self::Remote(proxy) => Self::Remote(proxy.clone()),
        }
    }
}

impl<A: DistributedActor> fmt::Debug for ActorRef<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_local() { "Local" } else { "Remote" };
        f.debug_tuple(kind).field(&self.identity().to_string()).finish()
    }
}

impl<A: DistributedActor> ActorRef<A> {
    pub fn identity(&self) -> &ActorIdentity {
        match self {
            Self::Local(handle) => handle.identity(),
            Self::Remote(proxy) => proxy.identity(),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    /// Invokes an operation, bounded by the system's default call timeout.
    pub async fn invoke(&self, op: A::Operation) -> Result<A::Reply, InvokeError<A::Error>> {
        match self {
            Self::Local(handle) => handle.call(op).await,
            Self::Remote(proxy) => proxy.invoke(op).await,
        }
    }

    /// Invokes an operation, waiting at most `timeout`.
    pub async fn invoke_timeout(
        &self,
        op: A::Operation,
        timeout: Duration,
    ) -> Result<A::Reply, InvokeError<A::Error>> {
        match self {
            Self::Local(handle) => handle.call_with_timeout(op, Some(timeout)).await,
            Self::Remote(proxy) => proxy.invoke_with_timeout(op, Some(timeout)).await,
        }
    }
}

/// Caller-side stand-in for an actor owned by another actor system.
///
/// Never touches application state: it encodes the operation, hands it to the owning
/// system's channel, and decodes whatever comes back.
pub struct RemoteProxy<A: DistributedActor> {
    identity: ActorIdentity,
    system: ActorSystem,
    _actor: PhantomData<fn() -> A>,
}

impl<A: DistributedActor> Clone for RemoteProxy<A> {
    fn clone(&self) -> Self {
        Self {
            identity: self.identity.clone(),
            system: self.system.clone(),
            _actor: PhantomData,
        }
    }
}

impl<A: DistributedActor> RemoteProxy<A> {
    pub(crate) fn new(identity: ActorIdentity, system: ActorSystem) -> Self {
        Self {
            identity,
            system,
            _actor: PhantomData,
        }
    }

    pub fn identity(&self) -> &ActorIdentity {
        &self.identity
    }

    pub async fn invoke(&self, op: A::Operation) -> Result<A::Reply, InvokeError<A::Error>> {
        let timeout = self.system.config().call_timeout;
        self.invoke_with_timeout(op, timeout).await
    }

    #[instrument(skip(self, op), fields(identity = %self.identity, selector = op.selector()))]
    pub async fn invoke_with_timeout(
        &self,
        op: A::Operation,
        timeout: Option<Duration>,
    ) -> Result<A::Reply, InvokeError<A::Error>> {
        let codec = self.system.codec();
        let selector = op.selector();
        let payload = codec.encode(&op)?;
        debug!(bytes = payload.len(), "Forwarding");

        match self
            .system
            .call_remote(&self.identity, selector, payload, timeout)
            .await?
        {
            ReplyBody::Success(bytes) => Ok(codec.decode(&bytes)?),
            ReplyBody::Failure(descriptor) => match descriptor.origin {
                ErrorOrigin::Operation => Err(InvokeError::Operation(
                    codec.decode_operation_error(&descriptor)?,
                )),
                ErrorOrigin::System => Err(ActorSystemError::from_descriptor(&descriptor).into()),
            },
        }
    }
}
