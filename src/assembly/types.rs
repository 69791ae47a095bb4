use serde::{Deserialize, Deserializer, Serialize};

/// Instruction text for one evaluator and whether its output must be JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstructionPayload {
    pub text: String,
    pub json: bool,
}

#[derive(Deserialize)]
struct RawPayload {
    text: String,
    #[serde(default)]
    json: bool,
}

// Stored evaluators carry the payload either inline or as a JSON-encoded string.
#[derive(Deserialize)]
#[serde(untagged)]
enum PayloadRepr {
    Inline(RawPayload),
    Encoded(String),
}

impl<'de> Deserialize<'de> for InstructionPayload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = match PayloadRepr::deserialize(deserializer)? {
            PayloadRepr::Inline(raw) => raw,
            PayloadRepr::Encoded(s) => serde_json::from_str::<RawPayload>(&s).map_err(|e| {
                serde::de::Error::custom(format!("metaprompt is not a {{text, json}} object: {e}"))
            })?,
        };
        Ok(Self {
            text: raw.text,
            json: raw.json,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(alias = "model_id")]
    pub model_route: String,
    #[serde(alias = "metaprompt")]
    pub instructions: InstructionPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assembly {
    pub id: String,
    #[serde(alias = "avatars", default)]
    pub agents: Vec<EvaluatorConfig>,
    #[serde(default)]
    pub topic_name: String,
}

impl Assembly {
    pub fn from_document(doc: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(doc)
    }
}
