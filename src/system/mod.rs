//! # Actor System
//!
//! [`ActorSystem`] is the facade application code talks to. It owns the identity registry,
//! the resolver, the codec and one [`Channel`](crate::transport::Channel) per connected peer.
//!
//! ## Lifecycle
//!
//! ```text
//! new(config)
//!   ├─ create_local_actor / register_*_handler   (any time before shutdown)
//!   ├─ listen / connect / attach                 (peers come and go)
//!   └─ shutdown()
//!        ├─ stops accepting connections
//!        ├─ closes every channel; pending calls fail with ShuttingDown
//!        └─ clears the registry; actors stop once the last outside handle is dropped
//! ```
//!
//! ## Dependency injection
//!
//! Factories receive the new actor's identity and the system itself. An actor that needs
//! to call other actors keeps the `ActorSystem` (or references resolved through it) as a
//! field. Such an actor keeps the system alive until [`ActorSystem::shutdown`] clears the
//! registry, so call it before dropping the last handle.

pub mod actor_system;
pub mod config;
pub mod tracing;

pub use actor_system::ActorSystem;
pub use config::SystemConfig;
