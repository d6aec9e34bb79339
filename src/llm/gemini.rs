use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::mpsc::Sender;
use tracing::debug;

use crate::db::Role;
use crate::llm::sse::SseBuffer;
use crate::llm::{
    check_status,
    models::{ChatMessage, ChatOptions},
    LlmError, LlmProvider,
};

pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
}

impl GeminiProvider {
    pub fn new(api_key: String, base_url: String, default_model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url,
            default_model,
        }
    }
}

fn request_body(messages: &[ChatMessage], options: &ChatOptions) -> Value {
    let contents: Vec<Value> = messages
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Model => "model",
            };
            let mut parts = vec![json!({ "text": m.content })];
            parts.extend(m.images.iter().map(|img| {
                json!({ "inlineData": { "mimeType": img.mime_type, "data": img.to_base64() } })
            }));
            json!({ "role": role, "parts": parts })
        })
        .collect();

    let mut body = json!({
        "contents": contents,
        "generationConfig": {
            "temperature": options.temperature.unwrap_or(0.7),
            "maxOutputTokens": options.max_tokens.unwrap_or(8192),
        },
    });

    if let Some(system) = &options.system_prompt {
        body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
    }
    body
}

/// Text carried by one streamed `GenerateContentResponse`.
fn chunk_text(event: &Value) -> Result<Option<String>, LlmError> {
    if let Some(error) = event.get("error") {
        let message = error["message"].as_str().unwrap_or("unknown error");
        return Err(LlmError::Stream(message.to_string()));
    }

    let candidate = &event["candidates"][0];
    // Anything but a normal stop means the reply was cut short.
    if let Some(reason) = candidate["finishReason"].as_str() {
        if reason != "STOP" && reason != "FINISH_REASON_UNSPECIFIED" {
            return Err(LlmError::Stream(format!("response ended early: {reason}")));
        }
    }

    let parts = match candidate["content"]["parts"].as_array() {
        Some(parts) => parts,
        None => return Ok(None),
    };
    let text: String = parts.iter().filter_map(|p| p["text"].as_str()).collect();

    Ok((!text.is_empty()).then_some(text))
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn chat_streaming(
        &self,
        messages: &[ChatMessage],
        options: ChatOptions,
        tx: Sender<String>,
    ) -> Result<(), LlmError> {
        let model = options.model.as_deref().unwrap_or(&self.default_model);
        let body = request_body(messages, &options);

        let response = self
            .client
            .post(format!(
                "{}/models/{}:streamGenerateContent?alt=sse",
                self.base_url, model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let response = check_status(response, "gemini").await?;

        let mut stream = response.bytes_stream();
        let mut buffer = SseBuffer::new();

        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| LlmError::Stream(e.to_string()))?;
            for payload in buffer.push(&bytes) {
                send_payload(&payload, &tx).await?;
            }
        }
        if let Some(payload) = buffer.finish() {
            send_payload(&payload, &tx).await?;
        }

        Ok(())
    }
}

async fn send_payload(payload: &str, tx: &Sender<String>) -> Result<(), LlmError> {
    let event: Value = serde_json::from_str(payload)
        .map_err(|e| LlmError::Stream(format!("malformed event: {e}")))?;

    if let Some(text) = chunk_text(&event)? {
        if tx.send(text).await.is_err() {
            debug!("fragment receiver dropped");
        }
    }
    Ok(())
}
