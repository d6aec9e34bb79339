pub mod gemini;
pub mod models;
pub mod openai;
pub mod sse;

use gemini::GeminiProvider;
use openai::OpenAiProvider;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::Sender;

use crate::config::AppConfig;
use models::{ChatMessage, ChatOptions};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Network Error: {0}")]
    Network(String),
    #[error("API Error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("Invalid Request: {0}")]
    InvalidRequest(String),
    #[error("Rate Limited")]
    RateLimited,
    #[error("Stream Error: {0}")]
    Stream(String),
}

impl LlmError {
    /// Transient failures worth another attempt. Client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Network(_) | LlmError::RateLimited | LlmError::Stream(_) => true,
            LlmError::Api { status, .. } => *status >= 500,
            LlmError::InvalidRequest(_) => false,
        }
    }
}

/// The generative-text collaborator.
///
/// `chat_streaming` sends text fragments over `tx` as they arrive and resolves
/// once the response is complete. An `Err` means the fragments already sent do
/// not form a complete turn.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn chat_streaming(
        &self,
        messages: &[ChatMessage],
        options: ChatOptions,
        tx: Sender<String>,
    ) -> Result<(), LlmError>;
}

pub struct ProviderFactory;

impl ProviderFactory {
    pub fn create_default(config: &AppConfig) -> Option<Arc<dyn LlmProvider>> {
        match config.llm.provider.as_str() {
            "gemini" => {
                let cfg = config.llm.gemini.as_ref()?;
                Some(Arc::new(GeminiProvider::new(
                    cfg.api_key.clone(),
                    cfg.api_base.clone(),
                    cfg.default_model.clone(),
                )))
            }
            "openai" => {
                let cfg = config.llm.openai.as_ref()?;
                Some(Arc::new(OpenAiProvider::new(
                    cfg.api_key.clone(),
                    cfg.api_base.clone(),
                    cfg.default_model.clone(),
                )))
            }
            _ => None,
        }
    }
}

async fn check_status(response: reqwest::Response, provider: &str) -> Result<reqwest::Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(LlmError::RateLimited);
    }
    let body = response.text().await.unwrap_or_default();
    Err(LlmError::Api {
        status: status.as_u16(),
        body: format!("{provider}: {body}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(LlmError::Network("reset".into()).is_retryable());
        assert!(LlmError::RateLimited.is_retryable());
        assert!(LlmError::Api { status: 503, body: String::new() }.is_retryable());
        assert!(!LlmError::Api { status: 400, body: String::new() }.is_retryable());
        assert!(!LlmError::InvalidRequest("bad".into()).is_retryable());
    }

    #[test]
    fn factory_requires_provider_section() {
        let mut config = AppConfig::default();
        assert!(ProviderFactory::create_default(&config).is_none());

        config.llm.gemini = Some(crate::config::GeminiConfig {
            api_base: "http://localhost".into(),
            api_key: "k".into(),
            default_model: "m".into(),
        });
        let provider = ProviderFactory::create_default(&config).unwrap();
        assert_eq!(provider.name(), "gemini");

        config.llm.provider = "unknown".into();
        assert!(ProviderFactory::create_default(&config).is_none());
    }
}
