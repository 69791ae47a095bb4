//! Scripted model service and fixtures shared by unit tests.

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{ModelRoute, ModelService, TextStream};
use crate::agent::{Conversation, RenderedInstructions, Task};
use crate::agent::task::{Answer, Question};
use crate::error::ModelError;

#[derive(Debug, Clone, Default)]
pub struct Script {
    chunks: Vec<String>,
    delay: Duration,
    fail: bool,
    broken: bool,
    panics: bool,
}

impl Script {
    pub fn reply(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn fail() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Panics inside the model call, after any delay.
    pub fn panic() -> Self {
        Self {
            panics: true,
            ..Self::default()
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Yields the scripted chunks, then a malformed-stream error.
    pub fn broken_stream(mut self) -> Self {
        self.broken = true;
        self
    }
}

/// Answers per route id. Records call order as `start:<route>` / `end:<route>`.
#[derive(Default)]
pub struct ScriptedModel {
    scripts: HashMap<String, Script>,
    events: Mutex<Vec<String>>,
    instructions: Mutex<Vec<String>>,
    completed: AtomicUsize,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(mut self, route: &str, script: Script) -> Self {
        self.scripts.insert(route.to_string(), script);
        self
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| e.strip_prefix("start:").map(str::to_string))
            .collect()
    }

    pub fn seen_instructions(&self) -> Vec<String> {
        self.instructions.lock().clone()
    }

    /// Calls that ran to completion, successful or not.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelService for ScriptedModel {
    async fn invoke(
        &self,
        route: &ModelRoute,
        instructions: &RenderedInstructions,
        _conversation: &Conversation,
    ) -> Result<TextStream, ModelError> {
        self.events.lock().push(format!("start:{}", route.id));
        self.instructions.lock().push(instructions.text.clone());

        let script = self.scripts.get(&route.id).cloned().unwrap_or_default();
        if !script.delay.is_zero() {
            tokio::time::sleep(script.delay).await;
        }

        if script.panics {
            panic!("scripted panic on route {}", route.id);
        }

        self.completed.fetch_add(1, Ordering::SeqCst);
        self.events.lock().push(format!("end:{}", route.id));

        if script.fail {
            return Err(ModelError::Transport(format!("route {} unavailable", route.id)));
        }

        let mut items: Vec<Result<String, ModelError>> =
            script.chunks.into_iter().map(Ok).collect();
        if script.broken {
            items.push(Err(ModelError::Malformed("truncated event".to_string())));
        }
        Ok(tokio_stream::iter(items).boxed())
    }
}

pub fn sample_task() -> Task {
    Task::QuestionAnswer {
        question: Question {
            id: "q1".into(),
            topic: "arithmetic".into(),
            question: "2+2?".into(),
            explanation: None,
        },
        answer: Answer {
            id: "ans1".into(),
            text: "4".into(),
            question_id: "q1".into(),
            respondent: "ana".into(),
        },
    }
}
