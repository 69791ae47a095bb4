use std::sync::Arc;
use tracing::{error, info};

use super::progress::{RunPhase, RunProgress};
use super::strategy::{AggregateResult, ExecutionError, Strategy};
use crate::agent::{AgentFactory, Task};
use crate::assembly::{AssemblyResolver, AssemblyStore, ResolveError};
use crate::error::{OrchestratorError, OrchestratorErrorKind};

/// Resolves an assembly, builds its agents and runs them against one task.
/// Nothing is cached between runs: every call sees the current assembly.
pub struct Orchestrator {
    resolver: AssemblyResolver,
    factory: AgentFactory,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn AssemblyStore>, factory: AgentFactory) -> Self {
        Self {
            resolver: AssemblyResolver::new(store),
            factory,
        }
    }

    #[allow(dead_code)]
    pub async fn run(
        &self,
        assembly_id: &str,
        task: Task,
        strategy: Strategy,
    ) -> Result<AggregateResult, OrchestratorError> {
        self.run_tracked(assembly_id, task, strategy).await.0
    }

    /// Like [`Orchestrator::run`], also returning the phase history of the run.
    pub async fn run_tracked(
        &self,
        assembly_id: &str,
        task: Task,
        strategy: Strategy,
    ) -> (Result<AggregateResult, OrchestratorError>, RunProgress) {
        let mut progress = RunProgress::new(assembly_id);

        info!(
            run_id = %progress.run_id(),
            assembly_id = %assembly_id,
            task_kind = task.kind(),
            task_id = %task.id(),
            strategy = %strategy,
            "Starting run"
        );

        let result = self.drive(&mut progress, assembly_id, task, strategy).await;
        match result {
            Ok(_) => progress.succeed(),
            Err(ref e) => {
                error!(
                    run_id = %progress.run_id(),
                    assembly_id = %assembly_id,
                    agent_id = e.agent_id().unwrap_or("-"),
                    error = %e.kind,
                    elapsed_ms = %progress.elapsed_ms(),
                    "Orchestration error"
                );
                progress.fail();
            }
        }
        (result, progress)
    }

    async fn drive(
        &self,
        progress: &mut RunProgress,
        assembly_id: &str,
        task: Task,
        strategy: Strategy,
    ) -> Result<AggregateResult, OrchestratorError> {
        let fail = |kind| OrchestratorError::new(assembly_id, kind);

        progress.transition_to(RunPhase::Resolving);
        let assembly = self.resolver.resolve(assembly_id).await.map_err(|e| match e {
            ResolveError::NotFound(_) => fail(OrchestratorErrorKind::AssemblyNotFound),
            ResolveError::Store(e) => fail(OrchestratorErrorKind::Store(e)),
        })?;

        progress.transition_to(RunPhase::Building);
        let agents = self.factory.build(&assembly).map_err(|e| {
            fail(OrchestratorErrorKind::AgentBuild {
                agent_id: e.agent_id,
                reason: e.reason,
            })
        })?;
        progress.set_agent_count(agents.len());

        progress.transition_to(RunPhase::Executing);
        strategy
            .execute(agents, Arc::new(task))
            .await
            .map_err(|e| match e {
                ExecutionError::Agent(e) => fail(OrchestratorErrorKind::AgentFailed {
                    agent_id: e.agent_id,
                    cause: e.cause,
                }),
                ExecutionError::Join(msg) => fail(OrchestratorErrorKind::Internal(msg)),
            })
    }
}
