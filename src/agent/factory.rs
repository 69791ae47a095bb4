use std::sync::Arc;
use std::time::Duration;

use super::prompts::render_instructions;
use super::unit::AgentUnit;
use crate::assembly::Assembly;
use crate::error::AgentBuildError;
use crate::mediator::Mediator;
use crate::model::{ModelRoutes, ModelService};

pub struct AgentFactory {
    routes: Arc<ModelRoutes>,
    model: Arc<dyn ModelService>,
    mediator: Option<Arc<dyn Mediator>>,
    timeout: Duration,
}

impl AgentFactory {
    pub fn new(routes: Arc<ModelRoutes>, model: Arc<dyn ModelService>, timeout: Duration) -> Self {
        Self {
            routes,
            model,
            mediator: None,
            timeout,
        }
    }

    pub fn with_mediator(mut self, mediator: Arc<dyn Mediator>) -> Self {
        self.mediator = Some(mediator);
        self
    }

    /// One unit per evaluator, in assembly order. The first invalid evaluator
    /// fails the whole build.
    pub fn build(&self, assembly: &Assembly) -> Result<Vec<AgentUnit>, AgentBuildError> {
        assembly
            .agents
            .iter()
            .map(|cfg| {
                let route = self.routes.get(&cfg.model_route).ok_or_else(|| AgentBuildError {
                    agent_id: cfg.id.clone(),
                    reason: format!(
                        "unknown model route '{}' (available: {})",
                        cfg.model_route,
                        self.routes.ids().join(", ")
                    ),
                })?;

                if cfg.instructions.text.trim().is_empty() {
                    return Err(AgentBuildError {
                        agent_id: cfg.id.clone(),
                        reason: "instruction text is empty".to_string(),
                    });
                }

                let unit = AgentUnit::new(
                    Arc::new(cfg.clone()),
                    route.clone(),
                    render_instructions(&cfg.instructions),
                    Arc::clone(&self.model),
                    self.timeout,
                );
                Ok(match self.mediator {
                    Some(ref m) => unit.with_mediator(Arc::clone(m)),
                    None => unit,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::{EvaluatorConfig, InstructionPayload};
    use crate::model::testing::ScriptedModel;

    fn evaluator(id: &str, route: &str, text: &str) -> EvaluatorConfig {
        EvaluatorConfig {
            id: id.to_string(),
            name: id.to_uppercase(),
            description: None,
            model_route: route.to_string(),
            instructions: InstructionPayload {
                text: text.to_string(),
                json: route == "mini",
            },
        }
    }

    fn factory() -> AgentFactory {
        let routes = Arc::new(
            ModelRoutes::new()
                .with_route("default", "gpt-4o")
                .with_route("mini", "gpt-4o-mini"),
        );
        AgentFactory::new(routes, Arc::new(ScriptedModel::new()), Duration::from_secs(30))
    }

    #[test]
    fn test_build_preserves_order_and_binds_routes() {
        let assembly = Assembly {
            id: "asm-1".into(),
            agents: vec![
                evaluator("a", "default", "Be strict"),
                evaluator("b", "mini", "Be kind"),
            ],
            topic_name: "Arithmetic".into(),
        };

        let agents = factory().build(&assembly).unwrap();
        assert_eq!(agents.len(), 2);
        assert_eq!(agents[0].id(), "a");
        assert_eq!(agents[0].route().deployment, "gpt-4o");
        assert!(agents[0].instructions().text.contains("Be strict"));
        assert_eq!(agents[1].id(), "b");
        assert_eq!(agents[1].route().deployment, "gpt-4o-mini");
        assert!(agents[1].instructions().json);
    }

    #[test]
    fn test_build_empty_assembly() {
        let assembly = Assembly {
            id: "empty".into(),
            agents: vec![],
            topic_name: String::new(),
        };
        assert!(factory().build(&assembly).unwrap().is_empty());
    }

    #[test]
    fn test_build_unknown_route_fails() {
        let assembly = Assembly {
            id: "asm-2".into(),
            agents: vec![
                evaluator("a", "default", "ok"),
                evaluator("b", "gpt-5", "ok"),
            ],
            topic_name: String::new(),
        };
        let err = factory().build(&assembly).unwrap_err();
        assert_eq!(err.agent_id, "b");
        assert!(err.reason.contains("gpt-5"));
        assert!(err.reason.contains("default, mini"));
    }

    #[test]
    fn test_build_empty_instructions_fails() {
        let assembly = Assembly {
            id: "asm-3".into(),
            agents: vec![evaluator("a", "default", "   ")],
            topic_name: String::new(),
        };
        let err = factory().build(&assembly).unwrap_err();
        assert_eq!(err.agent_id, "a");
    }
}
