use std::fmt::Write;

use super::task::{Answer, Essay, Question, Resource, Task};
use crate::assembly::InstructionPayload;

const INSTRUCTION_FRAME: &str = "You are an evaluator taking part in an assembly of independent \
graders. Judge only the submission you are given, do not invent facts about the respondent, \
and keep your feedback specific to the submitted text.";

const JSON_DIRECTIVE: &str = "Respond with a single valid JSON object and nothing else.";
const TEXT_DIRECTIVE: &str = "Respond in plain text.";

/// System instructions for one agent: the fixed frame merged with its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedInstructions {
    pub text: String,
    pub json: bool,
}

pub fn render_instructions(payload: &InstructionPayload) -> RenderedInstructions {
    let directive = if payload.json {
        JSON_DIRECTIVE
    } else {
        TEXT_DIRECTIVE
    };
    RenderedInstructions {
        text: format!(
            "{INSTRUCTION_FRAME}\n\n## Evaluation instructions\n{}\n\n## Output\n{directive}",
            payload.text.trim()
        ),
        json: payload.json,
    }
}

/// User prompt for one task.
pub fn render_task(task: &Task) -> String {
    match task {
        Task::QuestionAnswer { question, answer } => render_question(question, answer),
        Task::Essay { essay, resources } => render_essay(essay, resources),
    }
}

fn render_question(question: &Question, answer: &Answer) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Topic: {}", question.topic);
    let _ = writeln!(out, "Question: {}", question.question);
    if let Some(explanation) = &question.explanation {
        let _ = writeln!(out, "Expected reasoning: {explanation}");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Answer from {}:", answer.respondent);
    let _ = write!(out, "{}", answer.text);
    out
}

fn render_essay(essay: &Essay, resources: &[Resource]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Topic: {}", essay.topic);
    if let Some(theme) = &essay.theme {
        let _ = writeln!(out, "Declared theme: {theme}");
    }
    if let Some(explanation) = &essay.explanation {
        let _ = writeln!(out, "Context: {explanation}");
    }

    if !resources.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Evaluation criteria:");
        for resource in resources {
            let _ = write!(out, "- [{}] {}", resource.id, resource.objective.join(", "));
            if let Some(content) = &resource.content {
                let _ = write!(out, ": {content}");
            }
            if let Some(url) = &resource.url {
                let _ = write!(out, " (see {url})");
            }
            let _ = writeln!(out);
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Essay:");
    let _ = write!(out, "{}", essay.content);
    out
}
