//! # Actor Identities
//!
//! Every distributed actor is addressed by an [`ActorIdentity`]. Identities are minted by the
//! [`ActorSystem`](crate::system::ActorSystem) (through the [`IdentityRegistry`]) and never by
//! application code.
//!
//! An identity has three parts:
//!
//! - **node**: the [`NodeId`] of the actor system that owns the actor. The resolver uses it to
//!   decide whether an unknown identity can be reached through a connected peer.
//! - **uuid**: a random v4 UUID that makes the identity unique.
//! - **role** (optional): a tag such as `"bot"` that on-demand handlers match on.
//!
//! Identities are plain serde values, so an operation may take another actor's identity as an
//! argument and resolve it on the receiving side.

pub mod registry;

pub use registry::IdentityRegistry;

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Name of one actor-system instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// A fresh, random node name (`node-<uuid>`).
    pub fn random() -> Self {
        Self(format!("node-{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque, globally unique address of a distributed actor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorIdentity {
    node: NodeId,
    uuid: Uuid,
    role: Option<String>,
}

impl ActorIdentity {
    /// Mints a fresh identity owned by `node`.
    pub(crate) fn generate(node: NodeId, role: Option<&str>) -> Self {
        Self {
            node,
            uuid: Uuid::new_v4(),
            role: role.map(str::to_owned),
        }
    }

    /// Rebuilds an identity read off the wire.
    pub(crate) fn from_parts(node: NodeId, uuid: Uuid, role: Option<String>) -> Self {
        Self { node, uuid, role }
    }

    /// The actor system that owns this actor.
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.role.as_deref() == Some(role)
    }
}

impl fmt::Display for ActorIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.role {
            Some(role) => write!(f, "{}-{}@{}", role, self.uuid.simple(), self.node),
            None => write!(f, "{}@{}", self.uuid.simple(), self.node),
        }
    }
}
