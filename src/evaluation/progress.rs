use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Resolving,
    Building,
    Executing,
    Succeeded,
    Failed,
}

impl RunPhase {
    #[cfg(test)]
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Succeeded | RunPhase::Failed)
    }

    /// Forward-only: each phase may advance to the next one or fail.
    pub fn can_transition_to(&self, next: RunPhase) -> bool {
        use RunPhase::*;
        matches!(
            (*self, next),
            (Idle, Resolving)
                | (Resolving, Building)
                | (Building, Executing)
                | (Executing, Succeeded)
                | (Resolving | Building | Executing, Failed)
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: RunPhase,
    pub to: RunPhase,
    pub elapsed_ms: u64,
}

/// Phase history of one orchestration run.
pub struct RunProgress {
    run_id: uuid::Uuid,
    assembly_id: String,
    phase: RunPhase,
    started_at: Instant,
    last_transition: Instant,
    transitions: Vec<PhaseTransition>,
    agent_count: usize,
}

impl RunProgress {
    pub fn new(assembly_id: &str) -> Self {
        let now = Instant::now();
        Self {
            run_id: uuid::Uuid::new_v4(),
            assembly_id: assembly_id.to_string(),
            phase: RunPhase::Idle,
            started_at: now,
            last_transition: now,
            transitions: Vec::new(),
            agent_count: 0,
        }
    }

    pub fn run_id(&self) -> uuid::Uuid {
        self.run_id
    }

    #[cfg(test)]
    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    #[cfg(test)]
    pub fn transitions(&self) -> &[PhaseTransition] {
        &self.transitions
    }

    pub fn agent_count(&self) -> usize {
        self.agent_count
    }

    pub fn set_agent_count(&mut self, count: usize) {
        self.agent_count = count;
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    /// Returns false and leaves the phase untouched on an illegal move.
    pub fn transition_to(&mut self, next: RunPhase) -> bool {
        if !self.phase.can_transition_to(next) {
            warn!(
                run_id = %self.run_id,
                from = ?self.phase,
                to = ?next,
                "Ignoring illegal phase transition"
            );
            return false;
        }

        let now = Instant::now();
        let elapsed = now.duration_since(self.last_transition).as_millis() as u64;

        debug!(
            run_id = %self.run_id,
            assembly_id = %self.assembly_id,
            from = ?self.phase,
            to = ?next,
            elapsed_ms = %elapsed,
            "Phase transition"
        );

        self.transitions.push(PhaseTransition {
            from: self.phase,
            to: next,
            elapsed_ms: elapsed,
        });
        self.phase = next;
        self.last_transition = now;
        true
    }

    pub fn succeed(&mut self) {
        if self.transition_to(RunPhase::Succeeded) {
            info!(
                run_id = %self.run_id,
                assembly_id = %self.assembly_id,
                agents = self.agent_count,
                elapsed_ms = %self.elapsed_ms(),
                "Run succeeded"
            );
        }
    }

    pub fn fail(&mut self) {
        let failed_in = self.phase;
        if self.transition_to(RunPhase::Failed) {
            warn!(
                run_id = %self.run_id,
                assembly_id = %self.assembly_id,
                failed_in = ?failed_in,
                elapsed_ms = %self.elapsed_ms(),
                "Run failed"
            );
        }
    }

    #[cfg(test)]
    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Phases visited so far, starting at `Idle`.
    #[cfg(test)]
    pub fn path(&self) -> Vec<RunPhase> {
        std::iter::once(RunPhase::Idle)
            .chain(self.transitions.iter().map(|t| t.to))
            .collect()
    }
}
