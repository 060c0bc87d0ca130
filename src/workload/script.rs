use std::fmt;
use std::str::FromStr;

use crate::cluster::types::NodeId;
use crate::dht::protocol;
use crate::error::{DhtError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Put { key: String, value: i64 },
    Get { key: String },
    Size,
    Sync,
}

impl Command {
    /// Collective commands must run on every node.
    pub fn is_collective(&self) -> bool {
        matches!(self, Command::Sync)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Put { key, value } => write!(f, "put {} {}", key, value),
            Command::Get { key } => write!(f, "get {}", key),
            Command::Size => write!(f, "size"),
            Command::Sync => write!(f, "sync"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// 1-based source line, 0 for generated steps.
    pub line: usize,
    /// Only this node runs the step; `None` means every node.
    pub target: Option<NodeId>,
    pub command: Command,
}

impl Step {
    pub fn runs_on(&self, node: NodeId) -> bool {
        self.target.is_none_or(|target| target == node)
    }
}

/// A workload every node of a cluster executes in order.
///
/// ```text
/// # node 1 writes, everybody reads
/// @1 put item_1 42
/// sync
/// get item_1
/// @0 size
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    steps: Vec<Step>,
}

impl Script {
    pub fn from_file(path: &str) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        text.parse()
    }

    /// Node `i` puts one key with value `i * 10`, everybody syncs and reads every key back,
    /// then node 0 asks for the cluster size.
    pub fn scenario(node_count: usize) -> Self {
        let keys: Vec<String> = (0..node_count).map(scenario_key).collect();
        let mut steps = Vec::new();

        for (i, key) in keys.iter().enumerate() {
            steps.push(Step {
                line: 0,
                target: Some(NodeId(i as u32)),
                command: Command::Put {
                    key: key.clone(),
                    value: i as i64 * 10,
                },
            });
        }
        steps.push(Step {
            line: 0,
            target: None,
            command: Command::Sync,
        });
        for key in &keys {
            steps.push(Step {
                line: 0,
                target: None,
                command: Command::Get { key: key.clone() },
            });
        }
        steps.push(Step {
            line: 0,
            target: Some(NodeId::COORDINATOR),
            command: Command::Size,
        });

        Self { steps }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Checks that every targeted node exists in a cluster of `node_count` nodes.
    pub fn check_targets(&self, node_count: usize) -> Result<()> {
        match self
            .steps
            .iter()
            .find(|s| s.target.is_some_and(|t| t.index() >= node_count))
        {
            Some(step) => Err(DhtError::Script {
                line: step.line,
                reason: format!(
                    "targets node {} but the cluster has {} nodes",
                    step.target.unwrap_or_default(),
                    node_count
                ),
            }),
            None => Ok(()),
        }
    }
}

fn scenario_key(i: usize) -> String {
    if i < 26 {
        ((b'a' + i as u8) as char).to_string()
    } else {
        format!("key_{}", i)
    }
}

impl FromStr for Script {
    type Err = DhtError;

    fn from_str(text: &str) -> Result<Self> {
        let mut steps = Vec::new();

        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let content = raw.split('#').next().unwrap_or_default().trim();
            if content.is_empty() {
                continue;
            }
            steps.push(parse_step(line, content)?);
        }

        Ok(Self { steps })
    }
}

fn parse_step(line: usize, content: &str) -> Result<Step> {
    let fail = |reason: String| DhtError::Script { line, reason };
    let mut words = content.split_whitespace().peekable();

    let target = match words.peek().copied() {
        Some(word) if word.starts_with('@') => {
            let id = word[1..]
                .parse::<u32>()
                .map_err(|_| fail(format!("invalid node target '{}'", word)))?;
            words.next();
            Some(NodeId(id))
        }
        _ => None,
    };

    let verb = words
        .next()
        .ok_or_else(|| fail("missing command".to_string()))?;
    let args: Vec<&str> = words.collect();

    let command = match (verb, args.as_slice()) {
        ("put", [key, value]) => Command::Put {
            key: checked_key(line, key)?,
            value: value
                .parse()
                .map_err(|_| fail(format!("invalid value '{}'", value)))?,
        },
        ("get", [key]) => Command::Get {
            key: checked_key(line, key)?,
        },
        ("size", []) => Command::Size,
        ("sync", []) => Command::Sync,
        ("put" | "get" | "size" | "sync", _) => {
            return Err(fail(format!(
                "wrong number of arguments for '{}'",
                verb
            )));
        }
        (other, _) => return Err(fail(format!("unknown command '{}'", other))),
    };

    if command.is_collective() && target.is_some() {
        return Err(fail(format!("'{}' runs on every node and cannot be targeted", verb)));
    }

    Ok(Step {
        line,
        target,
        command,
    })
}

fn checked_key(line: usize, key: &str) -> Result<String> {
    protocol::validate_key(key).map_err(|e| DhtError::Script {
        line,
        reason: e.to_string(),
    })?;
    Ok(key.to_string())
}
