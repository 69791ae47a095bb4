use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("assembly collection is not provisioned")]
    CollectionMissing,
    #[error("document {id} is malformed: {reason}")]
    Malformed { id: String, reason: String },
    #[error("document is missing a string `id` field")]
    MissingId,
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("model endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("model call timed out after {0}s")]
    Timeout(u64),
}

impl From<reqwest::Error> for ModelError {
    fn from(e: reqwest::Error) -> Self {
        ModelError::Transport(e.to_string())
    }
}

#[derive(Debug, Error)]
#[error("failed to build agent {agent_id}: {reason}")]
pub struct AgentBuildError {
    pub agent_id: String,
    pub reason: String,
}

#[derive(Debug, Error)]
#[error("agent {agent_id} failed: {cause}")]
pub struct AgentError {
    pub agent_id: String,
    #[source]
    pub cause: ModelError,
}

#[derive(Debug, Error)]
pub enum OrchestratorErrorKind {
    #[error("assembly not found")]
    AssemblyNotFound,
    #[error("assembly store failed: {0}")]
    Store(#[source] StoreError),
    #[error("agent {agent_id} could not be built: {reason}")]
    AgentBuild { agent_id: String, reason: String },
    #[error("agent {agent_id} failed: {cause}")]
    AgentFailed {
        agent_id: String,
        #[source]
        cause: ModelError,
    },
    #[error("internal error: {0}")]
    Internal(String),
}

/// Failure of one orchestration run, tagged with the assembly it was running.
#[derive(Debug, Error)]
#[error("run for assembly {assembly_id} failed: {kind}")]
pub struct OrchestratorError {
    pub assembly_id: String,
    #[source]
    pub kind: OrchestratorErrorKind,
}

impl OrchestratorError {
    pub fn new(assembly_id: impl Into<String>, kind: OrchestratorErrorKind) -> Self {
        Self {
            assembly_id: assembly_id.into(),
            kind,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, OrchestratorErrorKind::AssemblyNotFound)
    }

    /// The agent responsible for the failure, when one is known.
    pub fn agent_id(&self) -> Option<&str> {
        match &self.kind {
            OrchestratorErrorKind::AgentBuild { agent_id, .. }
            | OrchestratorErrorKind::AgentFailed { agent_id, .. } => Some(agent_id),
            _ => None,
        }
    }
}
