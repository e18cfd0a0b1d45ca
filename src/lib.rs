#![doc(html_logo_url = "https://www.rust-lang.org/logos/rust-logo-128x128.png")]
#![doc(html_favicon_url = "https://www.rust-lang.org/favicon.ico")]
//! # Distributed Actors
//!
//! > **Location-transparent actors on Tokio.**
//!
//! An actor is an isolated unit of state that is only reachable through its own operations.
//! A *distributed* actor can be invoked the same way whether it runs in this process or in
//! another actor system across a network link. This crate is the runtime that makes that
//! possible: it assigns identities, resolves them to local handles or remote proxies,
//! serializes calls, and carries them over a framed connection.
//!
//! ## 🏗️ Design Philosophy
//!
//! ### One contract, two locations
//!
//! Application code holds an [`ActorRef<A>`](actor::ActorRef) and calls `invoke(op)`.
//! Whether that goes into a local mailbox or out over a socket is decided by the
//! [`resolver`], never by the caller.
//!
//! ### A closed set of operations
//!
//! There is no reflection. Each actor declares an operation enum, a reply type and an
//! error type (see [`DistributedActor`](actor::DistributedActor)). Peers built with the
//! same types can talk; the selector of every operation travels with the call and is
//! checked on arrival.
//!
//! ### Errors that know where they came from
//!
//! A failed call is either [`InvokeError::System`] (timeout, closed channel, unknown
//! identity, bad payload) or [`InvokeError::Operation`] carrying the actor's own error value,
//! rebuilt exactly on the caller's side.
//!
//! ## 🗺️ Module Tour
//!
//! ### 1. The Contract ([`actor`])
//! - **Role**: What an actor is, and the two reference flavors.
//! - **Key items**: [`DistributedActor`](actor::DistributedActor),
//!   [`ActorRef`](actor::ActorRef), [`LocalHandle`](actor::LocalHandle),
//!   [`RemoteProxy`](actor::RemoteProxy).
//!
//! ### 2. The Facade ([`system`])
//! - **Role**: Owns everything below and is the only type most applications touch.
//! - **Key items**: [`ActorSystem`](system::ActorSystem), [`SystemConfig`](system::SystemConfig),
//!   [`setup_tracing`](system::tracing::setup_tracing).
//!
//! ### 3. Addressing ([`identity`], [`resolver`])
//! - **Role**: Minting identities, mapping them to live actors, and the three-tier
//!   local / on-demand / remote resolution policy.
//!
//! ### 4. The Wire ([`codec`], [`envelope`], [`transport`])
//! - **Role**: JSON payloads, the binary envelope format, reply correlation, and the
//!   per-peer channel with its reader and writer tasks.
//!
//! ### 5. Testing ([`mock`])
//! - **Role**: [`MockPeer`](mock::MockPeer), a scripted in-memory remote node.
//!
//! ## 🚀 Quick Start
//!
//! ```rust,ignore
//! // Server: materialize a bot the first time someone calls one.
//! let server = ActorSystem::new(SystemConfig::default().with_node_name("server"));
//! server.register_role_handler("bot", |_, _| BotPlayer::new());
//! let addr = server.listen("127.0.0.1:0").await?;
//!
//! // Client: mint an identity on the server's node and call it.
//! let client = ActorSystem::new(SystemConfig::default());
//! let peer = client.connect(addr).await?;
//! let bot = client.resolve::<BotPlayer>(&client.assign_remote_identity(&peer, Some("bot")))?;
//! let reply = bot.invoke(BotOp::MakeMove).await?;
//! ```
//!
//! ### Running the Demo
//!
//! ```bash
//! RUST_LOG=info cargo run -p tictac-sample -- server --port 8888
//! RUST_LOG=info cargo run -p tictac-sample -- client --port 8888
//! ```

pub mod actor;
pub mod codec;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod mock;
pub mod resolver;
pub mod system;
pub mod transport;

pub use actor::{ActorRef, DistributedActor, Operation};
pub use error::{ActorSystemError, InvokeError};
pub use identity::{ActorIdentity, NodeId};
pub use system::{ActorSystem, SystemConfig};
