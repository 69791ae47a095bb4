use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

use super::{ModelRoute, ModelService, TextStream};
use crate::agent::{Conversation, RenderedInstructions};
use crate::error::ModelError;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const MAX_ERROR_BODY: usize = 2048;

/// Streaming client for OpenAI-compatible `/chat/completions` endpoints.
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    stream: bool,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Deserialize, Default)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, PartialEq)]
pub(crate) enum SseLine {
    Delta(String),
    Done,
    Skip,
}

/// Interprets one line of a server-sent event stream.
pub(crate) fn parse_sse_line(line: &str) -> Result<SseLine, ModelError> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(SseLine::Skip);
    };
    let data = data.trim();
    if data.is_empty() {
        return Ok(SseLine::Skip);
    }
    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }

    let chunk: ChatChunk = serde_json::from_str(data)
        .map_err(|e| ModelError::Malformed(format!("bad stream event: {e}")))?;
    if let Some(err) = chunk.error {
        return Err(ModelError::Malformed(format!("stream reported error: {err}")));
    }

    let text: String = chunk
        .choices
        .into_iter()
        .filter_map(|c| c.delta.content)
        .collect();
    if text.is_empty() {
        Ok(SseLine::Skip)
    } else {
        Ok(SseLine::Delta(text))
    }
}

struct SseState {
    bytes: BoxStream<'static, Result<Vec<u8>, ModelError>>,
    buf: Vec<u8>,
    pending: VecDeque<String>,
    done: bool,
}

impl SseState {
    /// Consumes every complete line in the buffer. Returns an error to yield, if any.
    fn drain_lines(&mut self) -> Option<ModelError> {
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            match parse_sse_line(line.trim_end()) {
                Ok(SseLine::Delta(text)) => self.pending.push_back(text),
                Ok(SseLine::Skip) => {}
                Ok(SseLine::Done) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(e);
                }
            }
        }
        None
    }
}

/// Turns a raw byte stream of server-sent events into text fragments.
pub(crate) fn sse_text_stream(
    bytes: BoxStream<'static, Result<Vec<u8>, ModelError>>,
) -> TextStream {
    let state = SseState {
        bytes,
        buf: Vec::new(),
        pending: VecDeque::new(),
        done: false,
    };

    futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(text) = st.pending.pop_front() {
                return Some((Ok(text), st));
            }
            if st.done {
                return None;
            }
            if let Some(e) = st.drain_lines() {
                return Some((Err(e), st));
            }
            if !st.pending.is_empty() || st.done {
                continue;
            }

            match st.bytes.next().await {
                Some(Ok(bytes)) => st.buf.extend_from_slice(&bytes),
                Some(Err(e)) => {
                    st.done = true;
                    return Some((Err(e), st));
                }
                None => {
                    // Flush a trailing line that lacked its newline.
                    if !st.buf.is_empty() {
                        st.buf.push(b'\n');
                        if let Some(e) = st.drain_lines() {
                            return Some((Err(e), st));
                        }
                    }
                    st.done = true;
                }
            }
        }
    })
    .boxed()
}

impl OpenAiClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client for model endpoint")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl ModelService for OpenAiClient {
    async fn invoke(
        &self,
        route: &ModelRoute,
        instructions: &RenderedInstructions,
        conversation: &Conversation,
    ) -> Result<TextStream, ModelError> {
        let mut messages = Vec::with_capacity(conversation.len() + 1);
        messages.push(ChatMessage {
            role: "system",
            content: &instructions.text,
        });
        messages.extend(conversation.turns().iter().map(|t| ChatMessage {
            role: t.role.as_str(),
            content: &t.content,
        }));

        let body = ChatRequest {
            model: &route.deployment,
            stream: true,
            messages,
            response_format: instructions.json.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        debug!(route = %route.id, deployment = %route.deployment, "Invoking model");

        let mut request = self.client.post(self.endpoint()).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }
        let resp = request.send().await?;

        let status = resp.status();
        if !status.is_success() {
            let mut body = resp.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(ModelError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = resp
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(ModelError::from))
            .boxed();
        Ok(sse_text_stream(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn byte_stream(parts: &[&str]) -> BoxStream<'static, Result<Vec<u8>, ModelError>> {
        let items: Vec<Result<Vec<u8>, ModelError>> =
            parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        futures::stream::iter(items).boxed()
    }

    async fn collect(stream: TextStream) -> Vec<Result<String, ModelError>> {
        stream.collect().await
    }

    #[test]
    fn test_parse_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#;
        assert_eq!(parse_sse_line(line).unwrap(), SseLine::Delta("Hel".to_string()));
    }

    #[test]
    fn test_parse_done_and_noise() {
        assert_eq!(parse_sse_line("data: [DONE]").unwrap(), SseLine::Done);
        assert_eq!(parse_sse_line("").unwrap(), SseLine::Skip);
        assert_eq!(parse_sse_line(": keep-alive").unwrap(), SseLine::Skip);
        assert_eq!(parse_sse_line("event: message").unwrap(), SseLine::Skip);
        let role_only = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_sse_line(role_only).unwrap(), SseLine::Skip);
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(
            parse_sse_line("data: {not json"),
            Err(ModelError::Malformed(_))
        ));
        assert!(matches!(
            parse_sse_line(r#"data: {"error":{"message":"overloaded"}}"#),
            Err(ModelError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_stream_reassembles_split_events() {
        let stream = sse_text_stream(byte_stream(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"4 is \"}}]}\n\ndata: {\"choi",
            "ces\":[{\"delta\":{\"content\":\"correct\"}}]}\n\n",
            "data: [DONE]\n\n",
        ]));
        let out: Vec<String> = collect(stream).await.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(out, vec!["4 is ", "correct"]);
    }

    #[tokio::test]
    async fn test_stream_stops_at_done() {
        let stream = sse_text_stream(byte_stream(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n",
            "data: [DONE]\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n",
        ]));
        let out: Vec<String> = collect(stream).await.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(out, vec!["a"]);
    }

    #[tokio::test]
    async fn test_stream_flushes_unterminated_tail() {
        let stream = sse_text_stream(byte_stream(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}",
        ]));
        let out: Vec<String> = collect(stream).await.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(out, vec!["tail"]);
    }

    #[tokio::test]
    async fn test_stream_surfaces_malformed_event() {
        let stream = sse_text_stream(byte_stream(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n",
            "data: garbage\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"never\"}}]}\n",
        ]));
        let out = collect(stream).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().unwrap(), "ok");
        assert!(matches!(out[1], Err(ModelError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_stream_keeps_multibyte_chars_across_chunks() {
        let event = "data: {\"choices\":[{\"delta\":{\"content\":\"nota máxima\"}}]}\n";
        let bytes = event.as_bytes();
        let split = event.find('á').unwrap() + 1;
        let items: Vec<Result<Vec<u8>, ModelError>> =
            vec![Ok(bytes[..split].to_vec()), Ok(bytes[split..].to_vec())];
        let stream = sse_text_stream(futures::stream::iter(items).boxed());
        let out: Vec<String> = collect(stream).await.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(out, vec!["nota máxima"]);
    }

    #[test]
    fn test_client_endpoint_trims_slash() {
        let client = OpenAiClient::new("http://localhost:11434/v1/", None).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:11434/v1/chat/completions");
    }
}
