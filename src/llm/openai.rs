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

/// Any endpoint speaking the OpenAI chat-completions protocol.
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, base_url: String, default_model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url,
            default_model,
        }
    }
}

fn request_body(model: &str, messages: &[ChatMessage], options: &ChatOptions) -> Value {
    let mut wire: Vec<Value> = Vec::with_capacity(messages.len() + 1);
    if let Some(system) = &options.system_prompt {
        wire.push(json!({ "role": "system", "content": system }));
    }
    wire.extend(messages.iter().map(|m| {
        let role = match m.role {
            Role::User => "user",
            Role::Model => "assistant",
        };
        if m.images.is_empty() {
            return json!({ "role": role, "content": m.content });
        }
        let mut content = vec![json!({ "type": "text", "text": m.content })];
        content.extend(m.images.iter().map(|img| {
            json!({
                "type": "image_url",
                "image_url": { "url": format!("data:{};base64,{}", img.mime_type, img.to_base64()) }
            })
        }));
        json!({ "role": role, "content": content })
    }));

    json!({
        "model": model,
        "messages": wire,
        "stream": true,
        "temperature": options.temperature.unwrap_or(0.7),
        "max_tokens": options.max_tokens.unwrap_or(4096),
    })
}

fn delta_content(event: &Value) -> Result<Option<String>, LlmError> {
    if let Some(error) = event.get("error") {
        let message = error["message"].as_str().unwrap_or("unknown error");
        return Err(LlmError::Stream(message.to_string()));
    }
    if let Some(reason) = event["choices"][0]["finish_reason"].as_str() {
        if reason != "stop" {
            return Err(LlmError::Stream(format!("response ended early: {reason}")));
        }
    }
    Ok(event["choices"][0]["delta"]["content"]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string))
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn chat_streaming(
        &self,
        messages: &[ChatMessage],
        options: ChatOptions,
        tx: Sender<String>,
    ) -> Result<(), LlmError> {
        let model = options.model.as_deref().unwrap_or(&self.default_model);
        let body = request_body(model, messages, &options);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let response = check_status(response, "openai").await?;

        let mut stream = response.bytes_stream();
        let mut buffer = SseBuffer::new();

        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| LlmError::Stream(e.to_string()))?;
            for payload in buffer.push(&bytes) {
                forward(&payload, &tx).await?;
            }
        }
        if let Some(payload) = buffer.finish() {
            forward(&payload, &tx).await?;
        }

        Ok(())
    }
}

async fn forward(payload: &str, tx: &Sender<String>) -> Result<(), LlmError> {
    let event: Value = serde_json::from_str(payload)
        .map_err(|e| LlmError::Stream(format!("malformed event: {e}")))?;

    if let Some(content) = delta_content(&event)? {
        if tx.send(content).await.is_err() {
            debug!("fragment receiver dropped");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_role_maps_to_assistant() {
        let messages = vec![
            ChatMessage::new(Role::User, "hola"),
            ChatMessage::new(Role::Model, "¡bienvenido!"),
        ];
        let options = ChatOptions {
            system_prompt: Some("facilita".into()),
            ..Default::default()
        };

        let body = request_body("gpt-4o", &messages, &options);
        let wire = body["messages"].as_array().unwrap();
        assert_eq!(wire.len(), 3);
        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[2]["role"], "assistant");
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn reads_delta_content() {
        let event = json!({ "choices": [{ "delta": { "content": "Diseñemos" } }] });
        assert_eq!(delta_content(&event).unwrap().as_deref(), Some("Diseñemos"));

        let role_only = json!({ "choices": [{ "delta": { "role": "assistant" } }] });
        assert_eq!(delta_content(&role_only).unwrap(), None);
    }

    #[test]
    fn length_cutoff_fails_the_stream() {
        let cut = json!({ "choices": [{ "delta": {}, "finish_reason": "length" }] });
        assert!(matches!(delta_content(&cut), Err(LlmError::Stream(_))));

        let done = json!({ "choices": [{ "delta": {}, "finish_reason": "stop" }] });
        assert_eq!(delta_content(&done).unwrap(), None);
    }

    #[test]
    fn images_become_data_url_parts() {
        let mut message = ChatMessage::new(Role::User, "mi puente");
        message.images.push(crate::llm::models::InlineImage {
            mime_type: "image/jpeg".into(),
            data: vec![1, 2, 3],
        });

        let body = request_body("gpt-4o", &[message], &ChatOptions::default());
        let content = &body["messages"][0]["content"];
        assert_eq!(content[0]["text"], "mi puente");
        assert_eq!(content[1]["image_url"]["url"], "data:image/jpeg;base64,AQID");
    }
}
