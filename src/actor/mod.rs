//! # Distributed Actors
//!
//! This module defines what an actor looks like to the actor system.
//!
//! ## The Contract
//!
//! An actor implements [`DistributedActor`]. Its associated types declare the closed set of
//! shapes the codec needs:
//!
//! - [`DistributedActor::Operation`]: an enum of everything the actor can be asked to do.
//!   Each variant has a stable selector (see [`Operation`]).
//! - [`DistributedActor::Reply`]: the value a successful operation returns.
//! - [`DistributedActor::Error`]: the actor's own failure type, carried losslessly to remote
//!   callers.
//!
//! ## Isolation
//!
//! [`DistributedActor::handle`] takes `&mut self` and is the only way in. The actor value is
//! moved into its own Tokio task when it is created, and callers only ever hold a
//! [`LocalHandle`] (a mailbox sender) or a [`RemoteProxy`]. Invocations are processed one at a
//! time, so actor state needs no locks, while different actors run in parallel.
//!
//! ## Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use distributed_actors::actor::{DistributedActor, Operation};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! enum CounterOp { Increment(u64), Get }
//!
//! impl Operation for CounterOp {
//!     const SELECTORS: &'static [&'static str] = &["increment", "get"];
//!     fn selector(&self) -> &'static str {
//!         match self { CounterOp::Increment(_) => "increment", CounterOp::Get => "get" }
//!     }
//! }
//!
//! #[derive(Debug, Serialize, Deserialize, thiserror::Error)]
//! enum CounterError { #[error("overflow")] Overflow }
//!
//! struct Counter { value: u64 }
//!
//! #[async_trait]
//! impl DistributedActor for Counter {
//!     type Operation = CounterOp;
//!     type Reply = u64;
//!     type Error = CounterError;
//!
//!     async fn handle(&mut self, op: CounterOp) -> Result<u64, CounterError> {
//!         match op {
//!             CounterOp::Increment(n) => {
//!                 self.value = self.value.checked_add(n).ok_or(CounterError::Overflow)?;
//!                 Ok(self.value)
//!             }
//!             CounterOp::Get => Ok(self.value),
//!         }
//!     }
//! }
//! ```

pub mod local;
pub mod reference;

pub use local::{AnyActor, LocalHandle};
pub use reference::{ActorRef, RemoteProxy};

use crate::identity::ActorIdentity;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

/// The closed set of operations an actor exposes.
///
/// Implemented by an enum with one variant per operation. The selector travels in the
/// invocation envelope and is checked against the decoded payload on the receiving side.
pub trait Operation: Serialize + DeserializeOwned + Send + Debug + 'static {
    /// Every selector this operation type can produce.
    const SELECTORS: &'static [&'static str];

    /// The stable selector of this particular operation.
    fn selector(&self) -> &'static str;
}

/// Trait that any actor must implement to be hosted by the actor system.
#[async_trait]
pub trait DistributedActor: Send + 'static {
    type Operation: Operation;

    /// Value returned by a successful operation.
    type Reply: Serialize + DeserializeOwned + Send + Debug + 'static;

    /// The actor's own failure type.
    ///
    /// Serialized into the `detail` of an operation-origin error descriptor so the remote
    /// caller receives exactly this value.
    type Error: std::error::Error + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Runs once in the actor's task before the first operation.
    async fn on_start(&mut self, _identity: &ActorIdentity) {}

    /// Handles one operation. Never called concurrently for the same actor.
    async fn handle(&mut self, op: Self::Operation) -> Result<Self::Reply, Self::Error>;

    /// Runs once after the last handle to the actor is gone.
    async fn on_stop(&mut self) {}
}
