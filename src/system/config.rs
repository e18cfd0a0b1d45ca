//! Runtime configuration for an [`ActorSystem`](super::ActorSystem).

use serde::Deserialize;
use std::time::Duration;

/// Tunables shared by every component of one actor system.
///
/// Deserializes from any serde format; omitted fields keep their defaults:
///
/// ```rust
/// use distributed_actors::system::SystemConfig;
///
/// let config: SystemConfig = serde_json::from_str(r#"{ "node_name": "server" }"#).unwrap();
/// assert_eq!(config.node_name.as_deref(), Some("server"));
/// assert_eq!(config.mailbox_capacity, 32);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Node name announced in the handshake. A random name is generated when absent.
    pub node_name: Option<String>,
    /// Upper bound on every `invoke`, local or remote. `None` waits forever.
    #[serde(with = "opt_secs")]
    pub call_timeout: Option<Duration>,
    #[serde(with = "secs")]
    pub handshake_timeout: Duration,
    /// Per-actor mailbox size.
    pub mailbox_capacity: usize,
    /// Frames queued per channel before senders wait.
    pub outbound_capacity: usize,
    pub max_frame_size: usize,
    pub tcp_nodelay: bool,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            node_name: None,
            call_timeout: Some(Duration::from_secs(30)),
            handshake_timeout: Duration::from_secs(5),
            mailbox_capacity: 32,
            outbound_capacity: 256,
            max_frame_size: 16 * 1024 * 1024,
            tcp_nodelay: true,
        }
    }
}

impl SystemConfig {
    pub fn with_node_name(mut self, name: impl Into<String>) -> Self {
        self.node_name = Some(name.into());
        self
    }

    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = capacity;
        self
    }

    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity;
        self
    }

    pub fn with_max_frame_size(mut self, bytes: usize) -> Self {
        self.max_frame_size = bytes;
        self
    }

    pub fn with_tcp_nodelay(mut self, nodelay: bool) -> Self {
        self.tcp_nodelay = nodelay;
        self
    }
}

/// Durations are written as fractional seconds.
mod secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

mod opt_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        match Option::<f64>::deserialize(deserializer)? {
            Some(secs) => Duration::try_from_secs_f64(secs)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}
