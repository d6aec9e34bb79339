use serde::Deserialize;

use crate::phase::classifier::DEFAULT_MARKER_KEYWORD;

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeminiConfig {
    #[serde(default = "default_gemini_base")]
    pub api_base: String,
    pub api_key: String,
    #[serde(default = "default_gemini_model")]
    pub default_model: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OpenAiConfig {
    pub api_base: String,
    pub api_key: String,
    pub default_model: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub gemini: Option<GeminiConfig>,
    pub openai: Option<OpenAiConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            gemini: None,
            openai: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_max_history")]
    pub max_history_messages: u32,
    /// Replaces the built-in methodology prompt when set.
    pub system_prompt: Option<String>,
    #[serde(default = "default_marker_keyword")]
    pub marker_keyword: String,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_history_messages: default_max_history(),
            system_prompt: None,
            marker_keyword: default_marker_keyword(),
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

impl AppConfig {
    pub fn load(path: &str) -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();

        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("LSPF").separator("__"))
            .build()?;

        let mut app_config: AppConfig = settings.try_deserialize()?;

        // Expand environment variables if present like ${GEMINI_API_KEY}
        app_config.database.path = expand_env(&app_config.database.path);

        if let Some(ref mut gemini) = app_config.llm.gemini {
            gemini.api_key = expand_env(&gemini.api_key);
        }
        if let Some(ref mut openai) = app_config.llm.openai {
            openai.api_key = expand_env(&openai.api_key);
            openai.api_base = expand_env(&openai.api_base);
        }

        if app_config.chat.retry.max_attempts == 0 {
            return Err(config::ConfigError::Message(
                "chat.retry.max_attempts must be at least 1".to_string(),
            ));
        }

        Ok(app_config)
    }
}

fn expand_env(val: &str) -> String {
    match val.strip_prefix("${").and_then(|v| v.strip_suffix('}')) {
        Some(var_name) => std::env::var(var_name).unwrap_or_default(),
        None => val.to_string(),
    }
}

fn default_database_path() -> String {
    "lsp_sessions.duckdb".to_string()
}

fn default_provider() -> String {
    "gemini".to_string()
}

fn default_gemini_base() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_max_history() -> u32 {
    50
}

fn default_marker_keyword() -> String {
    DEFAULT_MARKER_KEYWORD.to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = AppConfig::load("/nonexistent/lsp-facilitator-config").unwrap();
        assert_eq!(config.llm.provider, "gemini");
        assert_eq!(config.chat.marker_keyword, "PHASE_UPDATE");
        assert_eq!(config.chat.retry.max_attempts, 3);
    }

    #[test]
    fn reads_yaml_and_expands_secrets() {
        std::env::set_var("TEST_LSP_GEMINI_KEY", "secret-123");
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "database:\n  path: \":memory:\"\nllm:\n  provider: gemini\n  gemini:\n    api_key: \"${{TEST_LSP_GEMINI_KEY}}\"\nchat:\n  max_history_messages: 8\n  retry:\n    max_attempts: 5\n"
        )
        .unwrap();

        let config = AppConfig::load(file.path().to_str().unwrap()).unwrap();
        let gemini = config.llm.gemini.unwrap();
        assert_eq!(gemini.api_key, "secret-123");
        assert_eq!(gemini.default_model, "gemini-2.5-flash");
        assert_eq!(config.database.path, ":memory:");
        assert_eq!(config.chat.max_history_messages, 8);
        assert_eq!(config.chat.retry.max_attempts, 5);
        assert_eq!(config.chat.retry.initial_backoff_ms, 500);
    }

    #[test]
    fn expand_env_leaves_plain_values() {
        assert_eq!(expand_env("plain"), "plain");
        assert_eq!(expand_env("${LSPF_SURELY_UNSET_VAR}"), "");
    }
}
