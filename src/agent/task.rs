use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub topic: String,
    pub question: String,
    #[serde(default)]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub id: String,
    pub text: String,
    pub question_id: String,
    pub respondent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Essay {
    pub id: String,
    pub topic: String,
    pub content: String,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub content_file_location: Option<String>,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub file_url: Option<String>,
}

/// Evaluation criterion attached to an essay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    pub objective: Vec<String>,
    #[serde(default)]
    pub content: Option<String>,
    pub essay_id: String,
}

/// The submitted work every agent of an assembly evaluates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Task {
    QuestionAnswer { question: Question, answer: Answer },
    Essay { essay: Essay, resources: Vec<Resource> },
}

impl Task {
    pub fn kind(&self) -> &'static str {
        match self {
            Task::QuestionAnswer { .. } => "question_answer",
            Task::Essay { .. } => "essay",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Task::QuestionAnswer { answer, .. } => &answer.id,
            Task::Essay { essay, .. } => &essay.id,
        }
    }
}
