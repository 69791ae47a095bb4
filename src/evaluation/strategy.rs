use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::debug;

use crate::agent::{AgentUnit, Conversation, Task};
use crate::error::AgentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    #[default]
    Parallel,
    Sequential,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Parallel => "parallel",
            Strategy::Sequential => "sequential",
        }
    }

    pub async fn execute(
        self,
        agents: Vec<AgentUnit>,
        task: Arc<Task>,
    ) -> Result<AggregateResult, ExecutionError> {
        match self {
            Strategy::Parallel => run_parallel(agents, task).await.map(AggregateResult::Parallel),
            Strategy::Sequential => run_sequential(&agents, &task)
                .await
                .map(AggregateResult::Sequential),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "parallel" => Ok(Strategy::Parallel),
            "sequential" => Ok(Strategy::Sequential),
            other => Err(format!(
                "unknown strategy '{other}' (expected 'parallel' or 'sequential')"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentResult {
    pub agent_id: String,
    pub agent_name: String,
    pub text: String,
}

impl AgentResult {
    fn from_agent(agent: &AgentUnit, text: String) -> Self {
        Self {
            agent_id: agent.id().to_string(),
            agent_name: agent.name().to_string(),
            text,
        }
    }
}

/// A sequential result, serialized as `{"agent_<index>": text}`.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedResult {
    pub tag: String,
    pub result: AgentResult,
}

impl Serialize for TaggedResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.tag, &self.result.text)?;
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AggregateResult {
    Parallel(Vec<AgentResult>),
    Sequential(Vec<TaggedResult>),
}

impl AggregateResult {
    pub fn len(&self) -> usize {
        match self {
            AggregateResult::Parallel(r) => r.len(),
            AggregateResult::Sequential(r) => r.len(),
        }
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    pub fn agent_ids(&self) -> Vec<&str> {
        match self {
            AggregateResult::Parallel(r) => r.iter().map(|r| r.agent_id.as_str()).collect(),
            AggregateResult::Sequential(r) => {
                r.iter().map(|t| t.result.agent_id.as_str()).collect()
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error("agent task aborted unexpectedly: {0}")]
    Join(String),
}

/// Runs every agent concurrently, each with its own conversation. Results are
/// slotted by input index; the first failure aborts all outstanding siblings.
pub async fn run_parallel(
    agents: Vec<AgentUnit>,
    task: Arc<Task>,
) -> Result<Vec<AgentResult>, ExecutionError> {
    let mut slots: Vec<Option<AgentResult>> = vec![None; agents.len()];
    let mut set = JoinSet::new();

    for (index, agent) in agents.into_iter().enumerate() {
        let task = Arc::clone(&task);
        set.spawn(async move {
            let mut conversation = Conversation::new();
            let text = agent.interact(&task, &mut conversation).await?;
            Ok::<_, AgentError>((index, AgentResult::from_agent(&agent, text)))
        });
    }

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Ok((index, result))) => slots[index] = Some(result),
            Ok(Err(e)) => {
                debug!(agent_id = %e.agent_id, outstanding = set.len(), "Aborting sibling agents");
                set.abort_all();
                return Err(e.into());
            }
            Err(e) => {
                set.abort_all();
                return Err(ExecutionError::Join(e.to_string()));
            }
        }
    }

    Ok(slots.into_iter().flatten().collect())
}

/// Runs agents one after another in assembly order; stops at the first failure.
pub async fn run_sequential(
    agents: &[AgentUnit],
    task: &Task,
) -> Result<Vec<TaggedResult>, ExecutionError> {
    let mut results = Vec::with_capacity(agents.len());
    for (index, agent) in agents.iter().enumerate() {
        let mut conversation = Conversation::new();
        let text = agent.interact(task, &mut conversation).await?;
        results.push(TaggedResult {
            tag: format!("agent_{index}"),
            result: AgentResult::from_agent(agent, text),
        });
    }
    Ok(results)
}
