//! # Observability & Tracing
//!
//! [`setup_tracing`] installs a compact `tracing-subscriber` formatter filtered by `RUST_LOG`.
//!
//! ## What Gets Traced
//!
//! - **Actor lifecycle**: `Actor started`, `Created on demand`, `Actor stopped` (with the
//!   number of invocations handled).
//! - **Channels**: establishment, close reason, and the number of pending calls it failed.
//!   Channel tasks run inside a `channel{peer=...}` span.
//! - **Invocations**: every remote call runs in an `invoke_with_timeout` span carrying the
//!   `identity` and `selector`; the wire traffic below it logs `correlation_id` at debug.
//!
//! ## Usage
//!
//! ```bash
//! # Lifecycle only
//! RUST_LOG=info cargo run -p tictac-sample -- server
//!
//! # Every envelope, with decoded operations
//! RUST_LOG=debug cargo run -p tictac-sample -- client
//!
//! # Only the transport
//! RUST_LOG=distributed_actors::transport=debug cargo run -p tictac-sample -- server
//! ```
//!
//! With `RUST_LOG=debug` a single remote move looks like:
//!
//! ```text
//! DEBUG invoke_with_timeout: Forwarding identity=bot-5f0c..@server selector="make_move" bytes=11
//! DEBUG invoke_with_timeout: Sending invocation peer=server correlation_id=1 selector="make_move"
//! DEBUG channel: Invocation actor="BotPlayer" identity=bot-5f0c..@server selector="make_move"
//! DEBUG channel: Reply peer=server correlation_id=1 error=false
//! ```

/// Installs the global subscriber. Call once, at process start.
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();
}
