use std::fmt;

use super::script::{Command, Script};
use crate::dht::DhtNode;
use crate::error::Result;
use crate::storage::LocalStore;

/// Result of one executed step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Put { key: String, value: i64 },
    Got { key: String, value: i64 },
    Size(u64),
    Synced,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Put { key, value } => write!(f, "put {} = {}", key, value),
            Outcome::Got { key, value } => write!(f, "get {} = {}", key, value),
            Outcome::Size(total) => write!(f, "size = {}", total),
            Outcome::Synced => write!(f, "sync"),
        }
    }
}

/// Runs the steps of `script` meant for `node`, in order.
///
/// Every node of the cluster must run the same script, or collectives will never complete.
pub async fn run<S: LocalStore>(node: &DhtNode<S>, script: &Script) -> Result<Vec<Outcome>> {
    let mut outcomes = Vec::new();

    for step in script.steps().iter().filter(|s| s.runs_on(node.id())) {
        tracing::debug!("Node {} line {}: {}", node.id(), step.line, step.command);

        let outcome = match &step.command {
            Command::Put { key, value } => {
                node.put(key, *value).await?;
                Outcome::Put {
                    key: key.clone(),
                    value: *value,
                }
            }
            Command::Get { key } => Outcome::Got {
                key: key.clone(),
                value: node.get(key).await?,
            },
            Command::Size => Outcome::Size(node.size().await?),
            Command::Sync => {
                node.sync().await?;
                Outcome::Synced
            }
        };

        tracing::info!("Node {}: {}", node.id(), outcome);
        outcomes.push(outcome);
    }

    Ok(outcomes)
}
