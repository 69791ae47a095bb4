use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

use crate::mediator::{EventKind, Mediator, NotificationEvent};

#[derive(Debug)]
pub struct Metrics {
    pub runs_total: AtomicU64,
    pub runs_active: AtomicU64,
    pub runs_succeeded: AtomicU64,
    pub runs_failed: AtomicU64,
    pub interactions_completed: AtomicU64,
    pub duration_sum_ms: AtomicU64,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            runs_total: AtomicU64::new(0),
            runs_active: AtomicU64::new(0),
            runs_succeeded: AtomicU64::new(0),
            runs_failed: AtomicU64::new(0),
            interactions_completed: AtomicU64::new(0),
            duration_sum_ms: AtomicU64::new(0),
        })
    }

    pub fn start_run(&self) {
        self.runs_total.fetch_add(1, Ordering::Relaxed);
        self.runs_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Starts a run whose bookkeeping completes even if the caller is dropped.
    pub fn track_run(self: &Arc<Self>) -> RunGuard {
        self.start_run();
        RunGuard {
            metrics: Arc::clone(self),
            started: Instant::now(),
            finished: false,
        }
    }

    pub fn finish_run(&self, success: bool, duration_ms: u64) {
        self.runs_active.fetch_sub(1, Ordering::Relaxed);
        self.duration_sum_ms.fetch_add(duration_ms, Ordering::Relaxed);
        if success {
            self.runs_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.runs_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn render_prometheus(&self) -> String {
        let runs_total = self.runs_total.load(Ordering::Relaxed);
        let runs_active = self.runs_active.load(Ordering::Relaxed);
        let runs_succeeded = self.runs_succeeded.load(Ordering::Relaxed);
        let runs_failed = self.runs_failed.load(Ordering::Relaxed);
        let interactions = self.interactions_completed.load(Ordering::Relaxed);
        let dur_sum = self.duration_sum_ms.load(Ordering::Relaxed);

        format!(
            "# HELP grader_orchestrator_runs_total Total orchestration runs started.\n\
             # TYPE grader_orchestrator_runs_total counter\n\
             grader_orchestrator_runs_total {}\n\
             # HELP grader_orchestrator_runs_active Currently executing runs.\n\
             # TYPE grader_orchestrator_runs_active gauge\n\
             grader_orchestrator_runs_active {}\n\
             # HELP grader_orchestrator_runs_succeeded Runs that returned an aggregate.\n\
             # TYPE grader_orchestrator_runs_succeeded counter\n\
             grader_orchestrator_runs_succeeded {}\n\
             # HELP grader_orchestrator_runs_failed Runs that ended in an error.\n\
             # TYPE grader_orchestrator_runs_failed counter\n\
             grader_orchestrator_runs_failed {}\n\
             # HELP grader_orchestrator_interactions_completed Agent interactions reported to the mediator.\n\
             # TYPE grader_orchestrator_interactions_completed counter\n\
             grader_orchestrator_interactions_completed {}\n\
             # HELP grader_orchestrator_duration_ms_sum Sum of run durations in ms.\n\
             # TYPE grader_orchestrator_duration_ms_sum counter\n\
             grader_orchestrator_duration_ms_sum {}\n",
            runs_total, runs_active, runs_succeeded, runs_failed, interactions, dur_sum
        )
    }
}

/// An in-flight run. Dropping it unfinished records the run as failed.
pub struct RunGuard {
    metrics: Arc<Metrics>,
    started: Instant,
    finished: bool,
}

impl RunGuard {
    pub fn finish(mut self, success: bool) {
        self.finished = true;
        self.metrics.finish_run(success, self.elapsed_ms());
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.finished {
            warn!(elapsed_ms = self.elapsed_ms(), "Run abandoned before completion");
            self.metrics.finish_run(false, self.elapsed_ms());
        }
    }
}

impl Mediator for Metrics {
    fn notify(&self, event: &NotificationEvent) -> anyhow::Result<()> {
        if event.kind == EventKind::InteractionCompleted {
            self.interactions_completed.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_lifecycle() {
        let m = Metrics::new();
        m.start_run();
        m.start_run();
        assert_eq!(m.runs_active.load(Ordering::Relaxed), 2);
        assert_eq!(m.runs_total.load(Ordering::Relaxed), 2);

        m.finish_run(true, 500);
        m.finish_run(false, 250);
        assert_eq!(m.runs_active.load(Ordering::Relaxed), 0);
        assert_eq!(m.runs_succeeded.load(Ordering::Relaxed), 1);
        assert_eq!(m.runs_failed.load(Ordering::Relaxed), 1);
        assert_eq!(m.duration_sum_ms.load(Ordering::Relaxed), 750);
    }

    #[test]
    fn test_run_guard_finish() {
        let m = Metrics::new();
        let run = m.track_run();
        assert_eq!(m.runs_active.load(Ordering::Relaxed), 1);
        run.finish(true);
        assert_eq!(m.runs_active.load(Ordering::Relaxed), 0);
        assert_eq!(m.runs_succeeded.load(Ordering::Relaxed), 1);
        assert_eq!(m.runs_failed.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_dropped_run_guard_counts_as_failed() {
        let m = Metrics::new();
        {
            let _run = m.track_run();
            assert_eq!(m.runs_active.load(Ordering::Relaxed), 1);
        }
        assert_eq!(m.runs_active.load(Ordering::Relaxed), 0);
        assert_eq!(m.runs_failed.load(Ordering::Relaxed), 1);
        assert_eq!(m.runs_total.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_counts_interactions() {
        let m = Metrics::new();
        m.notify(&NotificationEvent::interaction_completed("a", "Grader A"))
            .unwrap();
        m.notify(&NotificationEvent::interaction_completed("b", "Grader B"))
            .unwrap();
        assert_eq!(m.interactions_completed.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_prometheus_output() {
        let m = Metrics::new();
        m.start_run();
        m.finish_run(false, 1234);
        let out = m.render_prometheus();
        assert!(out.contains("grader_orchestrator_runs_total 1"));
        assert!(out.contains("grader_orchestrator_runs_failed 1"));
        assert!(out.contains("grader_orchestrator_duration_ms_sum 1234"));
    }
}
