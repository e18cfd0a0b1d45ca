//! # Resolver
//!
//! Turns an [`ActorIdentity`] into something that can be invoked.
//!
//! ## Algorithm
//!
//! 1. **Local**: the identity is bound in the registry.
//! 2. **On demand**: the identity belongs to this node and a registered handler's predicate
//!    accepts it. The handler's factory builds the actor, which is registered under the
//!    identity and started. A second resolution of the same identity finds it in step 1.
//! 3. **Remote**: the identity belongs to a connected peer.
//!
//! Anything else is [`ActorSystemError::UnresolvableIdentity`].
//!
//! Creation is serialized per identity: the first resolution runs the factory while racing
//! resolutions of the same identity wait for it and then find the instance in the registry.
//! The factory runs exactly once per identity. It holds only that identity's creation gate,
//! never the registry lock, so it may use the system it is given. It must not resolve its
//! own identity.

use crate::actor::local::ActorCell;
use crate::actor::{AnyActor, DistributedActor};
use crate::codec::short_type_name;
use crate::error::ActorSystemError;
use crate::identity::{ActorIdentity, IdentityRegistry, NodeId};
use crate::system::ActorSystem;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info};

/// Registry entry for a local actor.
pub type ActorEntry = Arc<dyn AnyActor>;

type EventLoop = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// How an identity was resolved.
pub enum Resolution {
    /// Already registered locally.
    Local(ActorEntry),
    /// Materialized by an on-demand handler during this resolution.
    Created(ActorEntry),
    /// Owned by a connected peer.
    Remote,
}

impl Resolution {
    pub fn entry(&self) -> Option<&ActorEntry> {
        match self {
            Self::Local(entry) | Self::Created(entry) => Some(entry),
            Self::Remote => None,
        }
    }
}

/// Builds actors for identities nobody has registered yet.
trait OnDemandFactory: Send + Sync {
    fn accepts(&self, id: &ActorIdentity) -> bool;

    fn actor_type(&self) -> &'static str;

    /// Builds the actor and returns its registry entry plus the not-yet-spawned event loop.
    fn build(&self, id: &ActorIdentity, system: &ActorSystem) -> (ActorEntry, EventLoop);
}

struct TypedFactory<A, P, F> {
    predicate: P,
    factory: F,
    _actor: PhantomData<fn() -> A>,
}

impl<A, P, F> OnDemandFactory for TypedFactory<A, P, F>
where
    A: DistributedActor,
    P: Fn(&ActorIdentity) -> bool + Send + Sync + 'static,
    F: Fn(&ActorIdentity, &ActorSystem) -> A + Send + Sync + 'static,
{
    fn accepts(&self, id: &ActorIdentity) -> bool {
        (self.predicate)(id)
    }

    fn actor_type(&self) -> &'static str {
        short_type_name::<A>()
    }

    fn build(&self, id: &ActorIdentity, system: &ActorSystem) -> (ActorEntry, EventLoop) {
        let actor = (self.factory)(id, system);
        let config = system.config();
        let (cell, handle) =
            ActorCell::new(id.clone(), actor, config.mailbox_capacity, config.call_timeout);
        let entry: ActorEntry = Arc::new(handle);
        let event_loop: EventLoop = Box::pin(cell.run());
        (entry, event_loop)
    }
}

/// The resolution policy plus the on-demand handlers it consults.
#[derive(Default)]
pub struct Resolver {
    handlers: RwLock<Vec<Arc<dyn OnDemandFactory>>>,
    /// Creation gates for identities being materialized right now.
    creating: Mutex<HashMap<ActorIdentity, Arc<Mutex<()>>>>,
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an on-demand handler. Handlers are consulted in registration order.
    pub fn register<A, P, F>(&self, predicate: P, factory: F)
    where
        A: DistributedActor,
        P: Fn(&ActorIdentity) -> bool + Send + Sync + 'static,
        F: Fn(&ActorIdentity, &ActorSystem) -> A + Send + Sync + 'static,
    {
        let handler = TypedFactory::<A, P, F> {
            predicate,
            factory,
            _actor: PhantomData,
        };
        debug!(actor = handler.actor_type(), "On-demand handler registered");
        self.handlers.write().push(Arc::new(handler));
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// `true` when no on-demand creation is in progress.
    pub fn is_idle(&self) -> bool {
        self.creating.lock().is_empty()
    }

    /// Resolves `id` against the registry, the on-demand handlers and the known peers.
    pub fn resolve(
        &self,
        id: &ActorIdentity,
        registry: &IdentityRegistry<ActorEntry>,
        system: &ActorSystem,
        is_known_peer: impl Fn(&NodeId) -> bool,
    ) -> Result<Resolution, ActorSystemError> {
        if let Some(entry) = registry.lookup_local(id) {
            return Ok(Resolution::Local(entry));
        }

        if id.node() == registry.node() {
            let handler = self
                .handlers
                .read()
                .iter()
                .find(|handler| handler.accepts(id))
                .cloned();
            let Some(handler) = handler else {
                debug!(identity = %id, "No local actor and no handler accepts it");
                return Err(ActorSystemError::UnresolvableIdentity(id.clone()));
            };

            let gate = Arc::clone(self.creating.lock().entry(id.clone()).or_default());
            let resolution = {
                let _creating = gate.lock();
                materialize(id, &*handler, registry, system)
            };
            let mut creating = self.creating.lock();
            if creating
                .get(id)
                .is_some_and(|current| Arc::ptr_eq(current, &gate))
            {
                creating.remove(id);
            }
            return resolution;
        }

        if is_known_peer(id.node()) {
            Ok(Resolution::Remote)
        } else {
            debug!(identity = %id, "Owner is not a connected peer");
            Err(ActorSystemError::UnresolvableIdentity(id.clone()))
        }
    }
}

/// Runs `handler` for `id` unless an earlier resolution already did.
///
/// Callers hold the identity's creation gate.
fn materialize(
    id: &ActorIdentity,
    handler: &dyn OnDemandFactory,
    registry: &IdentityRegistry<ActorEntry>,
    system: &ActorSystem,
) -> Result<Resolution, ActorSystemError> {
    if let Some(entry) = registry.lookup_local(id) {
        return Ok(Resolution::Local(entry));
    }

    let (entry, event_loop) = handler.build(id, system);
    match registry.get_or_try_insert_with(id, || Ok(Some(entry)))? {
        Some((entry, true)) => {
            tokio::spawn(event_loop);
            info!(identity = %id, actor = handler.actor_type(), "Created on demand");
            Ok(Resolution::Created(entry))
        }
        // Registered directly while the factory ran; the new instance never starts.
        Some((existing, false)) => Ok(Resolution::Local(existing)),
        None => Err(ActorSystemError::UnresolvableIdentity(id.clone())),
    }
}
