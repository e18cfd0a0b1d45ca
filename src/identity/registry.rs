//! # Identity Registry
//!
//! Maps [`ActorIdentity`] values to the live local instances that answer for them.
//!
//! The registry is the only place identities are minted for local actors, and the only
//! structure (besides the pending-call tables) that concurrent invocation flows mutate.
//! All mutations happen under a single `RwLock` write guard, which is also what makes
//! on-demand creation idempotent: [`IdentityRegistry::get_or_try_insert_with`] checks and
//! inserts without releasing the lock in between.

use super::{ActorIdentity, NodeId};
use crate::error::ActorSystemError;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// Registry of local actor handles keyed by identity.
///
/// `H` is the handle type stored for each actor. The actor system stores type-erased
/// mailbox handles; tests can store anything cheap to clone.
pub struct IdentityRegistry<H> {
    node: NodeId,
    entries: RwLock<HashMap<ActorIdentity, H>>,
}

impl<H: Clone> IdentityRegistry<H> {
    pub fn new(node: NodeId) -> Self {
        Self {
            node,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// The node every identity minted here belongs to.
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// Produces a fresh identity owned by this node.
    ///
    /// Uniqueness comes from a v4 UUID; no external input is needed.
    pub fn assign(&self, role: Option<&str>) -> ActorIdentity {
        ActorIdentity::generate(self.node.clone(), role)
    }

    /// Binds `id` to `instance`. Fails if the identity is already bound.
    pub fn register(&self, id: ActorIdentity, instance: H) -> Result<(), ActorSystemError> {
        let mut entries = self.entries.write();
        if entries.contains_key(&id) {
            return Err(ActorSystemError::DuplicateIdentity(id));
        }
        debug!(identity = %id, size = entries.len() + 1, "Registered");
        entries.insert(id, instance);
        Ok(())
    }

    pub fn lookup_local(&self, id: &ActorIdentity) -> Option<H> {
        self.entries.read().get(id).cloned()
    }

    /// Removes a binding. Absent identities are ignored.
    pub fn unregister(&self, id: &ActorIdentity) -> Option<H> {
        let removed = self.entries.write().remove(id);
        if removed.is_some() {
            debug!(identity = %id, "Unregistered");
        }
        removed
    }

    /// Returns the bound instance, or runs `create` and binds its result, atomically.
    ///
    /// `create` returns `Ok(None)` when it declines to build an instance for `id`. The
    /// boolean in the result is `true` when the instance was created by this call.
    pub fn get_or_try_insert_with<F>(
        &self,
        id: &ActorIdentity,
        create: F,
    ) -> Result<Option<(H, bool)>, ActorSystemError>
    where
        F: FnOnce() -> Result<Option<H>, ActorSystemError>,
    {
        if let Some(existing) = self.lookup_local(id) {
            return Ok(Some((existing, false)));
        }

        let mut entries = self.entries.write();
        // Another flow may have created it between the read and the write lock.
        if let Some(existing) = entries.get(id) {
            return Ok(Some((existing.clone(), false)));
        }
        match create()? {
            Some(instance) => {
                entries.insert(id.clone(), instance.clone());
                debug!(identity = %id, size = entries.len(), "Registered on demand");
                Ok(Some((instance, true)))
            }
            None => Ok(None),
        }
    }

    pub fn contains(&self, id: &ActorIdentity) -> bool {
        self.entries.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn identities(&self) -> Vec<ActorIdentity> {
        self.entries.read().keys().cloned().collect()
    }

    /// Drops every binding, returning how many were removed.
    pub fn clear(&self) -> usize {
        let drained = std::mem::take(&mut *self.entries.write());
        drained.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn registry() -> IdentityRegistry<u32> {
        IdentityRegistry::new(NodeId::new("test-node"))
    }

    #[test]
    fn assign_never_repeats() {
        let registry = registry();
        let ids: HashSet<_> = (0..1_000).map(|_| registry.assign(None)).collect();
        assert_eq!(ids.len(), 1_000);
        assert!(ids.iter().all(|id| id.node().as_str() == "test-node"));
    }

    #[test]
    fn register_rejects_duplicates() {
        let registry = registry();
        let id = registry.assign(Some("bot"));
        registry.register(id.clone(), 1).unwrap();

        let err = registry.register(id.clone(), 2).unwrap_err();
        assert_eq!(err, ActorSystemError::DuplicateIdentity(id.clone()));
        assert_eq!(registry.lookup_local(&id), Some(1));
    }

    #[test]
    fn unregister_is_a_noop_when_absent() {
        let registry = registry();
        let id = registry.assign(None);
        assert_eq!(registry.unregister(&id), None);

        registry.register(id.clone(), 7).unwrap();
        assert_eq!(registry.unregister(&id), Some(7));
        assert!(registry.lookup_local(&id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn get_or_insert_creates_once() {
        let registry = registry();
        let id = registry.assign(Some("bot"));
        let calls = AtomicUsize::new(0);

        let make = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(42))
        };
        let first = registry.get_or_try_insert_with(&id, make).unwrap();
        assert_eq!(first, Some((42, true)));

        let second = registry
            .get_or_try_insert_with(&id, || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Some(99))
            })
            .unwrap();
        assert_eq!(second, Some((42, false)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn get_or_insert_can_decline() {
        let registry = registry();
        let id = registry.assign(None);
        let outcome = registry.get_or_try_insert_with(&id, || Ok(None)).unwrap();
        assert!(outcome.is_none());
        assert!(!registry.contains(&id));
    }

    #[test]
    fn concurrent_get_or_insert_yields_single_instance() {
        let registry = Arc::new(registry());
        let id = registry.assign(Some("bot"));
        let created = Arc::new(AtomicUsize::new(0));

        let threads: Vec<_> = (0..8)
            .map(|n| {
                let registry = registry.clone();
                let id = id.clone();
                let created = created.clone();
                std::thread::spawn(move || {
                    registry
                        .get_or_try_insert_with(&id, || {
                            created.fetch_add(1, Ordering::SeqCst);
                            Ok(Some(n))
                        })
                        .unwrap()
                        .unwrap()
                        .0
                })
            })
            .collect();

        let seen: HashSet<u32> = threads.into_iter().map(|t| t.join().unwrap()).collect();
        assert_eq!(seen.len(), 1);
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }
}
