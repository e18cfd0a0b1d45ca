#![allow(dead_code)]

use async_trait::async_trait;
use distributed_actors::mock::connect_in_memory;
use distributed_actors::{ActorSystem, DistributedActor, NodeId, Operation, SystemConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CounterOp {
    Increment(u64),
    Get,
    Fail(String),
    Sleep(u64),
}

impl Operation for CounterOp {
    const SELECTORS: &'static [&'static str] = &["increment", "get", "fail", "sleep"];

    fn selector(&self) -> &'static str {
        match self {
            CounterOp::Increment(_) => "increment",
            CounterOp::Get => "get",
            CounterOp::Fail(_) => "fail",
            CounterOp::Sleep(_) => "sleep",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum CounterError {
    #[error("counter refused: {0}")]
    Refused(String),
    #[error("counter overflow")]
    Overflow,
}

#[derive(Default)]
pub struct Counter {
    value: u64,
}

#[async_trait]
impl DistributedActor for Counter {
    type Operation = CounterOp;
    type Reply = u64;
    type Error = CounterError;

    async fn handle(&mut self, op: CounterOp) -> Result<u64, CounterError> {
        match op {
            CounterOp::Increment(n) => {
                self.value = self.value.checked_add(n).ok_or(CounterError::Overflow)?;
                Ok(self.value)
            }
            CounterOp::Get => Ok(self.value),
            CounterOp::Fail(reason) => Err(CounterError::Refused(reason)),
            CounterOp::Sleep(ms) => {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(self.value)
            }
        }
    }
}

pub fn system(name: &str) -> ActorSystem {
    ActorSystem::new(SystemConfig::default().with_node_name(name))
}

/// A client and a server joined by an in-memory channel, plus the server's node id.
pub async fn linked_pair() -> (ActorSystem, ActorSystem, NodeId) {
    let client = system("client");
    let server = system("server");
    let (server_node, _) = connect_in_memory(&client, &server)
        .await
        .expect("Failed to link systems");
    (client, server, server_node)
}

/// Polls `condition` until it holds, failing the test after one second.
pub async fn eventually<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within one second");
}
