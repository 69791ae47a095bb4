use futures::StreamExt;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::conversation::Conversation;
use super::prompts::{render_task, RenderedInstructions};
use super::task::Task;
use crate::assembly::EvaluatorConfig;
use crate::error::{AgentError, ModelError};
use crate::mediator::{Mediator, NotificationEvent};
use crate::model::{ModelRoute, ModelService};

/// One evaluator bound to its model route and rendered instructions.
pub struct AgentUnit {
    config: Arc<EvaluatorConfig>,
    route: ModelRoute,
    instructions: RenderedInstructions,
    model: Arc<dyn ModelService>,
    mediator: Option<Arc<dyn Mediator>>,
    timeout: Duration,
}

impl AgentUnit {
    pub fn new(
        config: Arc<EvaluatorConfig>,
        route: ModelRoute,
        instructions: RenderedInstructions,
        model: Arc<dyn ModelService>,
        timeout: Duration,
    ) -> Self {
        Self {
            config,
            route,
            instructions,
            model,
            mediator: None,
            timeout,
        }
    }

    pub fn with_mediator(mut self, mediator: Arc<dyn Mediator>) -> Self {
        self.mediator = Some(mediator);
        self
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    #[cfg(test)]
    pub fn route(&self) -> &ModelRoute {
        &self.route
    }

    #[cfg(test)]
    pub fn instructions(&self) -> &RenderedInstructions {
        &self.instructions
    }

    pub async fn interact(
        &self,
        task: &Task,
        conversation: &mut Conversation,
    ) -> Result<String, AgentError> {
        let start = Instant::now();
        conversation.push_user(render_task(task));

        let response = match tokio::time::timeout(self.timeout, self.collect(conversation)).await {
            Ok(Ok(text)) => text,
            Ok(Err(cause)) => {
                return Err(AgentError {
                    agent_id: self.config.id.clone(),
                    cause,
                })
            }
            Err(_) => {
                return Err(AgentError {
                    agent_id: self.config.id.clone(),
                    cause: ModelError::Timeout(self.timeout.as_secs()),
                })
            }
        };

        debug!(
            agent_id = %self.config.id,
            route = %self.route.id,
            chars = response.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Agent interaction completed"
        );

        if let Some(ref mediator) = self.mediator {
            let event = NotificationEvent::interaction_completed(&self.config.id, &self.config.name);
            if let Err(e) = mediator.notify(&event) {
                warn!(agent_id = %self.config.id, error = %e, "Mediator notification failed");
            }
        }

        Ok(response)
    }

    async fn collect(&self, conversation: &mut Conversation) -> Result<String, ModelError> {
        let mut chunks = self
            .model
            .invoke(&self.route, &self.instructions, conversation)
            .await?;

        let mut response = String::new();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            response.push_str(&chunk);
            conversation.push_assistant(chunk);
        }
        Ok(response)
    }
}

impl fmt::Debug for AgentUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentUnit")
            .field("id", &self.config.id)
            .field("name", &self.config.name)
            .field("route", &self.route)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
