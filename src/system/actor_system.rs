//! The [`ActorSystem`] facade and its inbound dispatcher.

use super::SystemConfig;
use crate::actor::local::ActorCell;
use crate::actor::{ActorRef, DistributedActor, LocalHandle, RemoteProxy};
use crate::codec::JsonCodec;
use crate::envelope::{InvocationEnvelope, ReplyBody, ReplyEnvelope};
use crate::error::{ActorSystemError, InvokeError};
use crate::identity::{ActorIdentity, IdentityRegistry, NodeId};
use crate::resolver::{ActorEntry, Resolution, Resolver};
use crate::transport::{Channel, InboundHandler};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

struct SystemInner {
    node: NodeId,
    config: SystemConfig,
    codec: JsonCodec,
    registry: IdentityRegistry<ActorEntry>,
    resolver: Resolver,
    peers: RwLock<HashMap<NodeId, Arc<Channel>>>,
    shutdown: CancellationToken,
}

/// Handle to one actor system instance. Clones share the same state.
#[derive(Clone)]
pub struct ActorSystem {
    inner: Arc<SystemInner>,
}

impl fmt::Debug for ActorSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorSystem")
            .field("node", &self.inner.node)
            .field("local_actors", &self.local_actor_count())
            .field("peers", &self.peers())
            .finish()
    }
}

impl Default for ActorSystem {
    fn default() -> Self {
        Self::new(SystemConfig::default())
    }
}

impl ActorSystem {
    pub fn new(config: SystemConfig) -> Self {
        let node = match &config.node_name {
            Some(name) => NodeId::new(name.clone()),
            None => NodeId::random(),
        };
        info!(%node, "Actor system started");
        Self {
            inner: Arc::new(SystemInner {
                registry: IdentityRegistry::new(node.clone()),
                node,
                config,
                codec: JsonCodec,
                resolver: Resolver::new(),
                peers: RwLock::new(HashMap::new()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.inner.node
    }

    pub fn config(&self) -> &SystemConfig {
        &self.inner.config
    }

    pub fn codec(&self) -> JsonCodec {
        self.inner.codec
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    fn ensure_running(&self) -> Result<(), ActorSystemError> {
        if self.is_shut_down() {
            Err(ActorSystemError::ShuttingDown)
        } else {
            Ok(())
        }
    }

    // =========================================================================
    // Local actors
    // =========================================================================

    /// Creates a local actor under a freshly assigned identity and starts it.
    pub fn create_local_actor<A, F>(
        &self,
        factory: F,
    ) -> Result<(ActorIdentity, ActorRef<A>), ActorSystemError>
    where
        A: DistributedActor,
        F: FnOnce(&ActorIdentity, &ActorSystem) -> A,
    {
        self.spawn_local(None, factory)
    }

    /// Like [`create_local_actor`](Self::create_local_actor), with a role tag on the identity.
    pub fn create_local_actor_with_role<A, F>(
        &self,
        role: &str,
        factory: F,
    ) -> Result<(ActorIdentity, ActorRef<A>), ActorSystemError>
    where
        A: DistributedActor,
        F: FnOnce(&ActorIdentity, &ActorSystem) -> A,
    {
        self.spawn_local(Some(role), factory)
    }

    fn spawn_local<A, F>(
        &self,
        role: Option<&str>,
        factory: F,
    ) -> Result<(ActorIdentity, ActorRef<A>), ActorSystemError>
    where
        A: DistributedActor,
        F: FnOnce(&ActorIdentity, &ActorSystem) -> A,
    {
        self.ensure_running()?;
        let identity = self.inner.registry.assign(role);
        let actor = factory(&identity, self);
        let (cell, handle) = ActorCell::new(
            identity.clone(),
            actor,
            self.inner.config.mailbox_capacity,
            self.inner.config.call_timeout,
        );
        self.inner
            .registry
            .register(identity.clone(), Arc::new(handle.clone()))?;
        tokio::spawn(cell.run());
        Ok((identity, ActorRef::Local(handle)))
    }

    /// Registers a factory for identities of this node that `predicate` accepts.
    ///
    /// The factory runs the first time such an identity is resolved, locally or by an
    /// inbound invocation. Later resolutions find the same instance.
    pub fn register_on_demand_handler<A, P, F>(&self, predicate: P, factory: F)
    where
        A: DistributedActor,
        P: Fn(&ActorIdentity) -> bool + Send + Sync + 'static,
        F: Fn(&ActorIdentity, &ActorSystem) -> A + Send + Sync + 'static,
    {
        self.inner.resolver.register(predicate, factory);
    }

    /// Shorthand for an on-demand handler matching identities tagged with `role`.
    pub fn register_role_handler<A, F>(&self, role: impl Into<String>, factory: F)
    where
        A: DistributedActor,
        F: Fn(&ActorIdentity, &ActorSystem) -> A + Send + Sync + 'static,
    {
        let role = role.into();
        self.register_on_demand_handler(move |id: &ActorIdentity| id.has_role(&role), factory);
    }

    /// Removes the registry binding for `id`. Returns `false` if it was not bound.
    ///
    /// The actor keeps serving references that are already held and stops when the last
    /// one is dropped.
    pub fn resign(&self, id: &ActorIdentity) -> bool {
        self.inner.registry.unregister(id).is_some()
    }

    pub fn local_actor_count(&self) -> usize {
        self.inner.registry.len()
    }

    // =========================================================================
    // Resolution & invocation
    // =========================================================================

    /// Resolves `id` to a reference of actor type `A`.
    ///
    /// Local and on-demand resolutions check the hosted actor's type and fail with
    /// `WrongActorType` on a mismatch. Remote references cannot be checked; a mismatch
    /// there surfaces as `MalformedPayload` on the first call.
    pub fn resolve<A: DistributedActor>(
        &self,
        id: &ActorIdentity,
    ) -> Result<ActorRef<A>, ActorSystemError> {
        self.ensure_running()?;
        let resolution =
            self.inner
                .resolver
                .resolve(id, &self.inner.registry, self, |node| self.is_connected(node))?;
        match resolution {
            Resolution::Local(entry) | Resolution::Created(entry) => {
                let handle = entry
                    .as_any()
                    .downcast_ref::<LocalHandle<A>>()
                    .cloned()
                    .ok_or_else(|| ActorSystemError::WrongActorType {
                        identity: id.clone(),
                        expected: crate::codec::short_type_name::<A>().to_owned(),
                        actual: entry.actor_type().to_owned(),
                    })?;
                Ok(ActorRef::Local(handle))
            }
            Resolution::Remote => Ok(ActorRef::Remote(RemoteProxy::new(id.clone(), self.clone()))),
        }
    }

    /// Invokes `op` on `reference`. Equivalent to [`ActorRef::invoke`].
    pub async fn invoke<A: DistributedActor>(
        &self,
        reference: &ActorRef<A>,
        op: A::Operation,
    ) -> Result<A::Reply, InvokeError<A::Error>> {
        reference.invoke(op).await
    }

    /// Mints an identity owned by `peer`, for actors the peer will create on demand.
    pub fn assign_remote_identity(&self, peer: &NodeId, role: Option<&str>) -> ActorIdentity {
        ActorIdentity::generate(peer.clone(), role)
    }

    pub(crate) async fn call_remote(
        &self,
        target: &ActorIdentity,
        selector: &str,
        payload: Bytes,
        timeout: Option<Duration>,
    ) -> Result<ReplyBody, ActorSystemError> {
        self.ensure_running()?;
        let channel = self.inner.peers.read().get(target.node()).cloned();
        match channel {
            Some(channel) => channel.call(target, selector, payload, timeout).await,
            None => Err(ActorSystemError::ChannelClosed),
        }
    }

    async fn handle_inbound(&self, peer: &NodeId, envelope: InvocationEnvelope) -> ReplyEnvelope {
        let InvocationEnvelope {
            correlation_id,
            target,
            selector,
            payload,
        } = envelope;
        debug!(%peer, %correlation_id, identity = %target, %selector, "Inbound invocation");

        let entry = self.ensure_running().and_then(|()| {
            // No multi-hop: an identity that is not ours is unresolvable here.
            match self
                .inner
                .resolver
                .resolve(&target, &self.inner.registry, self, |_| false)?
            {
                Resolution::Local(entry) | Resolution::Created(entry) => Ok(entry),
                Resolution::Remote => Err(ActorSystemError::UnresolvableIdentity(target.clone())),
            }
        });
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(
                    %peer,
                    %correlation_id,
                    identity = %target,
                    error = %e,
                    "Inbound invocation rejected"
                );
                return ReplyEnvelope::failure(correlation_id, e.to_descriptor());
            }
        };

        match entry.dispatch(&self.inner.codec, &selector, &payload).await {
            Ok(reply) => ReplyEnvelope::success(correlation_id, reply),
            Err(descriptor) => ReplyEnvelope::failure(correlation_id, descriptor),
        }
    }

    // =========================================================================
    // Peers
    // =========================================================================

    pub fn peers(&self) -> Vec<NodeId> {
        self.inner
            .peers
            .read()
            .iter()
            .filter(|(_, channel)| !channel.is_closed())
            .map(|(node, _)| node.clone())
            .collect()
    }

    pub fn is_connected(&self, peer: &NodeId) -> bool {
        self.inner
            .peers
            .read()
            .get(peer)
            .is_some_and(|channel| !channel.is_closed())
    }

    /// Binds `addr` and accepts peers in the background until shutdown.
    ///
    /// Returns the bound address, which differs from `addr` when port 0 was requested.
    #[instrument(skip(self, addr), fields(node = %self.inner.node))]
    pub async fn listen(&self, addr: impl ToSocketAddrs) -> Result<SocketAddr, ActorSystemError> {
        self.ensure_running()?;
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "Listening");

        let system = Arc::downgrade(&self.inner);
        let shutdown = self.inner.shutdown.clone();
        tokio::spawn(async move {
            loop {
                let (stream, remote) = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!(error = %e, "Accept failed");
                            continue;
                        }
                    },
                };
                let Some(inner) = system.upgrade() else { break };
                let system = ActorSystem { inner };
                // The handshake runs on its own task so a slow peer cannot stall accepts.
                tokio::spawn(async move {
                    if let Err(e) = system.attach_tcp(stream).await {
                        warn!(%remote, error = %e, "Inbound connection failed");
                    }
                });
            }
            info!(%local_addr, "Listener stopped");
        });
        Ok(local_addr)
    }

    /// Connects to a listening peer and returns its node id.
    #[instrument(skip(self, addr), fields(node = %self.inner.node))]
    pub async fn connect(&self, addr: impl ToSocketAddrs) -> Result<NodeId, ActorSystemError> {
        self.ensure_running()?;
        let stream = TcpStream::connect(addr).await?;
        self.attach_tcp(stream).await
    }

    async fn attach_tcp(&self, stream: TcpStream) -> Result<NodeId, ActorSystemError> {
        stream.set_nodelay(self.inner.config.tcp_nodelay)?;
        self.attach(stream).await
    }

    /// Runs the handshake over an already-connected stream and adds the peer.
    ///
    /// A newer channel to the same peer replaces the old one, which is closed.
    pub async fn attach<S>(&self, stream: S) -> Result<NodeId, ActorSystemError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        self.ensure_running()?;
        let handler = Arc::new(Dispatcher {
            system: Arc::downgrade(&self.inner),
        });
        let channel =
            Channel::establish(stream, self.inner.node.clone(), &self.inner.config, handler)
                .await?;
        let peer = channel.peer().clone();

        let replaced = self.inner.peers.write().insert(peer.clone(), Arc::clone(&channel));
        if let Some(old) = replaced {
            old.close(ActorSystemError::ChannelClosed);
        }
        // Shutdown may have drained the peer table while the handshake was running.
        if self.is_shut_down() {
            self.inner.peers.write().remove(&peer);
            channel.close(ActorSystemError::ShuttingDown);
            return Err(ActorSystemError::ShuttingDown);
        }
        Ok(peer)
    }

    /// Closes the channel to `peer`, failing its pending calls with `ChannelClosed`.
    pub fn disconnect(&self, peer: &NodeId) -> bool {
        let channel = self.inner.peers.write().remove(peer);
        match channel {
            Some(channel) => {
                channel.close(ActorSystemError::ChannelClosed);
                true
            }
            None => false,
        }
    }

    fn forget_channel(&self, peer: &NodeId) {
        let mut peers = self.inner.peers.write();
        if peers.get(peer).is_some_and(|channel| channel.is_closed()) {
            peers.remove(peer);
        }
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Stops the listener, closes every channel with `ShuttingDown`, and clears the registry.
    ///
    /// Idempotent. Later resolutions, creations and remote calls fail with `ShuttingDown`.
    pub fn shutdown(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        info!(node = %self.inner.node, "Shutting down actor system...");
        self.inner.shutdown.cancel();

        let channels: Vec<_> = self.inner.peers.write().drain().map(|(_, ch)| ch).collect();
        for channel in &channels {
            channel.close(ActorSystemError::ShuttingDown);
        }
        let actors = self.inner.registry.clear();
        info!(node = %self.inner.node, channels = channels.len(), actors, "Actor system shut down");
    }
}

/// Inbound side of every channel. Holds the system weakly so channels do not keep it alive.
struct Dispatcher {
    system: Weak<SystemInner>,
}

#[async_trait]
impl InboundHandler for Dispatcher {
    async fn handle_invocation(
        &self,
        peer: &NodeId,
        envelope: InvocationEnvelope,
    ) -> ReplyEnvelope {
        match self.system.upgrade() {
            Some(inner) => {
                let system = ActorSystem { inner };
                system.handle_inbound(peer, envelope).await
            }
            None => ReplyEnvelope::failure(
                envelope.correlation_id,
                ActorSystemError::ShuttingDown.to_descriptor(),
            ),
        }
    }

    fn channel_closed(&self, peer: &NodeId, reason: &ActorSystemError) {
        if let Some(inner) = self.system.upgrade() {
            debug!(%peer, %reason, "Removing closed channel");
            ActorSystem { inner }.forget_channel(peer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Operation;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Serialize, Deserialize)]
    enum TallyOp {
        Add(u32),
        Total,
    }

    impl Operation for TallyOp {
        const SELECTORS: &'static [&'static str] = &["add", "total"];

        fn selector(&self) -> &'static str {
            match self {
                TallyOp::Add(_) => "add",
                TallyOp::Total => "total",
            }
        }
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize, thiserror::Error)]
    enum TallyError {
        #[error("never")]
        Never,
    }

    struct Tally(u32);

    #[async_trait]
    impl DistributedActor for Tally {
        type Operation = TallyOp;
        type Reply = u32;
        type Error = TallyError;

        async fn handle(&mut self, op: TallyOp) -> Result<u32, TallyError> {
            if let TallyOp::Add(n) = op {
                self.0 += n;
            }
            Ok(self.0)
        }
    }

    struct Other;

    #[async_trait]
    impl DistributedActor for Other {
        type Operation = TallyOp;
        type Reply = u32;
        type Error = TallyError;

        async fn handle(&mut self, _op: TallyOp) -> Result<u32, TallyError> {
            Ok(0)
        }
    }

    fn system() -> ActorSystem {
        ActorSystem::new(SystemConfig::default().with_node_name("local"))
    }

    #[tokio::test]
    async fn created_actors_resolve_locally() {
        let system = system();
        let (id, reference) = system.create_local_actor(|_, _| Tally(0)).unwrap();
        assert!(reference.is_local());
        assert_eq!(id.node(), system.node_id());
        system.invoke(&reference, TallyOp::Add(2)).await.unwrap();

        let resolved = system.resolve::<Tally>(&id).unwrap();
        assert!(resolved.is_local());
        assert_eq!(resolved.invoke(TallyOp::Total).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn role_handler_creates_once() {
        let system = system();
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        system.register_role_handler("tally", move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Tally(0)
        });

        let id = system.inner.registry.assign(Some("tally"));
        let first = system.resolve::<Tally>(&id).unwrap();
        first.invoke(TallyOp::Add(5)).await.unwrap();
        let second = system.resolve::<Tally>(&id).unwrap();
        assert_eq!(second.invoke(TallyOp::Total).await.unwrap(), 5);
        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert_eq!(system.local_actor_count(), 1);
    }

    #[tokio::test]
    async fn unknown_identities_are_unresolvable() {
        let system = system();
        let local = system.inner.registry.assign(Some("nobody"));
        assert_eq!(
            system.resolve::<Tally>(&local).unwrap_err(),
            ActorSystemError::UnresolvableIdentity(local)
        );

        let foreign = system.assign_remote_identity(&NodeId::new("elsewhere"), None);
        assert_eq!(
            system.resolve::<Tally>(&foreign).unwrap_err(),
            ActorSystemError::UnresolvableIdentity(foreign)
        );
    }

    #[tokio::test]
    async fn resolving_with_the_wrong_type_fails() {
        let system = system();
        let (id, _reference) = system.create_local_actor(|_, _| Tally(0)).unwrap();
        match system.resolve::<Other>(&id).unwrap_err() {
            ActorSystemError::WrongActorType { expected, actual, .. } => {
                assert_eq!(expected, "Other");
                assert_eq!(actual, "Tally");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn resign_unbinds_but_keeps_existing_references() {
        let system = system();
        let (id, reference) = system.create_local_actor(|_, _| Tally(1)).unwrap();
        assert!(system.resign(&id));
        assert!(!system.resign(&id));
        assert!(system.resolve::<Tally>(&id).is_err());
        assert_eq!(reference.invoke(TallyOp::Total).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn shutdown_refuses_new_work() {
        let system = system();
        system.create_local_actor(|_, _| Tally(0)).unwrap();
        system.shutdown();
        system.shutdown();

        assert!(system.is_shut_down());
        assert_eq!(system.local_actor_count(), 0);
        assert_eq!(
            system.create_local_actor(|_, _| Tally(0)).unwrap_err(),
            ActorSystemError::ShuttingDown
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_first_contact_runs_the_factory_once() {
        let system = system();
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        system.register_role_handler("tally", move |_, system: &ActorSystem| {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
            system.create_local_actor(|_, _| Tally(100)).unwrap();
            Tally(0)
        });
        let id = system.inner.registry.assign(Some("tally"));

        let start = Arc::new(std::sync::Barrier::new(8));
        let resolutions: Vec<_> = (0..8)
            .map(|_| {
                let system = system.clone();
                let id = id.clone();
                let start = Arc::clone(&start);
                tokio::task::spawn_blocking(move || {
                    start.wait();
                    system.resolve::<Tally>(&id).map(|tally| tally.identity().clone())
                })
            })
            .collect();
        for resolution in resolutions {
            assert_eq!(resolution.await.unwrap().unwrap(), id);
        }

        assert_eq!(built.load(Ordering::SeqCst), 1);
        // The on-demand actor plus the one sibling its factory created.
        assert_eq!(system.local_actor_count(), 2);
        assert!(system.inner.resolver.is_idle());
    }

    #[tokio::test]
    async fn factories_can_use_the_system() {
        let system = system();
        system.register_role_handler("parent", |_, system: &ActorSystem| {
            // Building a sibling from inside a factory must not deadlock on the registry.
            system.create_local_actor(|_, _| Tally(100)).unwrap();
            Tally(0)
        });
        let id = system.inner.registry.assign(Some("parent"));
        system.resolve::<Tally>(&id).unwrap();
        assert_eq!(system.local_actor_count(), 2);
    }
}
