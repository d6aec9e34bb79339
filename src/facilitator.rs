//! Runs conversation turns against the collaborator and keeps the session's
//! phase in step with what it says.
//!
//! A turn is: stream the collaborator's reply to completion (retrying transient
//! failures), evaluate the phase pipeline once on the full text, then commit the
//! user message, the model message and any phase change together.
//! Turns on the same session are serialized; a second `send_turn` waits until
//! the first has committed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{ChatConfig, RetryConfig};
use crate::db::{Message, Role, SessionStore, StoreError, UserTurn};
use crate::llm::models::{ChatMessage, ChatOptions, InlineImage};
use crate::llm::{LlmError, LlmProvider};
use crate::phase::{Phase, PhaseChange, PhaseClassifier, PhaseEngine};
use crate::prompts;

/// Shown in place of the model's reply when a turn is abandoned.
pub const FAILURE_NOTICE: &str =
    "⚠️ [Error del sistema] Lo siento, hubo un problema al procesar tu solicitud. Inténtalo de nuevo.";

const FRAGMENT_BUFFER: usize = 100;

#[derive(Debug, Error)]
pub enum FacilitatorError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("message is empty")]
    EmptyInput,
    #[error("invalid marker keyword: {0}")]
    InvalidMarker(#[from] regex::Error),
}

/// What the caller sees while a turn streams.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StreamEvent<'a> {
    Fragment(&'a str),
    /// The previous attempt failed; its fragments are discarded.
    Retrying { attempt: u32, delay: Duration },
}

#[derive(Debug)]
pub enum TurnOutcome {
    Completed {
        user_message: Message,
        model_message: Message,
        phase: Phase,
        change: Option<PhaseChange>,
    },
    /// The collaborator failed after every attempt. Only the user message was
    /// stored and the phase is unchanged.
    Abandoned {
        user_message: Message,
        notice: &'static str,
        error: LlmError,
        attempts: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before attempt `failed + 1`, doubling each time.
    pub fn backoff(&self, failed: u32) -> Duration {
        let factor = 2u32.saturating_pow(failed.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
        }
    }
}

pub struct Facilitator {
    store: Arc<dyn SessionStore>,
    llm: Arc<dyn LlmProvider>,
    engine: PhaseEngine,
    options: ChatOptions,
    history_limit: usize,
    retry: RetryPolicy,
    turn_locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl Facilitator {
    pub fn new(store: Arc<dyn SessionStore>, llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            store,
            llm,
            engine: PhaseEngine::default(),
            options: ChatOptions {
                system_prompt: Some(prompts::system_prompt(
                    crate::phase::classifier::DEFAULT_MARKER_KEYWORD,
                )),
                ..Default::default()
            },
            history_limit: 50,
            retry: RetryPolicy::default(),
            turn_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(
        store: Arc<dyn SessionStore>,
        llm: Arc<dyn LlmProvider>,
        config: &ChatConfig,
    ) -> Result<Self, FacilitatorError> {
        let classifier = PhaseClassifier::new(&config.marker_keyword)?;
        let system_prompt = config
            .system_prompt
            .clone()
            .unwrap_or_else(|| prompts::system_prompt(&config.marker_keyword));

        Ok(Self::new(store, llm)
            .with_engine(PhaseEngine::new(classifier))
            .with_system_prompt(system_prompt)
            .with_history_limit(config.max_history_messages as usize)
            .with_retry(RetryPolicy::from(&config.retry)))
    }

    pub fn with_engine(mut self, engine: PhaseEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_system_prompt(mut self, prompt: String) -> Self {
        self.options.system_prompt = Some(prompt);
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn engine(&self) -> &PhaseEngine {
        &self.engine
    }

    fn turn_lock(&self, session_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.turn_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(session_id).or_default().clone()
    }

    /// Drops the session's lock entry once no turn holds or awaits it.
    fn release_turn_lock(&self, session_id: Uuid) {
        let mut locks = self.turn_locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks
            .get(&session_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&session_id);
        }
    }

    /// True while a turn on this session is streaming or committing.
    pub fn is_busy(&self, session_id: Uuid) -> bool {
        let locks = self.turn_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .get(&session_id)
            .is_some_and(|lock| lock.try_lock().is_err())
    }

    /// Number of sessions with a turn in flight or queued.
    pub fn active_sessions(&self) -> usize {
        self.turn_locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub async fn send_turn(
        &self,
        session_id: Uuid,
        text: &str,
        on_event: &mut (dyn FnMut(StreamEvent<'_>) + Send),
    ) -> Result<TurnOutcome, FacilitatorError> {
        let turn = UserTurn {
            content: text.to_string(),
            attachments: Vec::new(),
        };
        self.send_user_turn(session_id, turn, on_event).await
    }

    /// Like [`send_turn`](Self::send_turn), with images that go to the
    /// collaborator and are stored against the user message.
    pub async fn send_user_turn(
        &self,
        session_id: Uuid,
        mut turn: UserTurn,
        on_event: &mut (dyn FnMut(StreamEvent<'_>) + Send),
    ) -> Result<TurnOutcome, FacilitatorError> {
        turn.content = turn.content.trim().to_string();
        if turn.content.is_empty() {
            return Err(FacilitatorError::EmptyInput);
        }

        let lock = self.turn_lock(session_id);
        let result = {
            let _turn = lock.lock().await;
            self.run_turn(session_id, &turn, on_event).await
        };
        drop(lock);
        self.release_turn_lock(session_id);
        result
    }

    async fn run_turn(
        &self,
        session_id: Uuid,
        turn: &UserTurn,
        on_event: &mut (dyn FnMut(StreamEvent<'_>) + Send),
    ) -> Result<TurnOutcome, FacilitatorError> {
        let session = self
            .store
            .get_session(session_id)?
            .ok_or(StoreError::SessionNotFound(session_id))?;

        let history = self.history(session_id, turn)?;

        let raw = match self.stream_with_retry(&history, on_event).await {
            Ok(raw) => raw,
            Err((error, attempts)) => {
                error!(%session_id, attempts, %error, "turn abandoned");
                let user_message = self.store.append_user_turn(session_id, turn)?;
                return Ok(TurnOutcome::Abandoned {
                    user_message,
                    notice: FAILURE_NOTICE,
                    error,
                    attempts,
                });
            }
        };

        let current = session.current_phase;
        let evaluation = self.engine.evaluate_turn(&raw, current);

        let committed = self
            .store
            .commit_turn(
                session_id,
                turn,
                &evaluation.content,
                evaluation.change.map(|c| c.to),
            )
            .map_err(|e| {
                error!(%session_id, error = %e, "failed to commit turn");
                e
            })?;

        let phase = match evaluation.change {
            Some(change) => {
                info!(%session_id, from = %change.from, to = %change.to, reason = ?change.reason, "phase changed");
                change.to
            }
            None => current,
        };

        Ok(TurnOutcome::Completed {
            user_message: committed.user_message,
            model_message: committed.model_message,
            phase,
            change: evaluation.change,
        })
    }

    /// Stored history up to the limit, images included, followed by the new turn.
    fn history(&self, session_id: Uuid, turn: &UserTurn) -> Result<Vec<ChatMessage>, StoreError> {
        let stored = self
            .store
            .recent_messages(session_id, self.history_limit.saturating_sub(1))?;

        let mut images: HashMap<Uuid, Vec<InlineImage>> = HashMap::new();
        if !stored.is_empty() {
            // Newest first from the store; keep upload order per message.
            for image in self.store.list_images(session_id)?.into_iter().rev() {
                if let Some(message_id) = image.message_id {
                    images.entry(message_id).or_default().push(InlineImage {
                        mime_type: image.mime_type,
                        data: image.data,
                    });
                }
            }
        }

        let mut history: Vec<ChatMessage> = stored
            .into_iter()
            .map(|m| ChatMessage {
                role: m.role,
                images: images.remove(&m.id).unwrap_or_default(),
                content: m.content,
            })
            .collect();

        history.push(ChatMessage {
            role: Role::User,
            content: turn.content.clone(),
            images: turn
                .attachments
                .iter()
                .map(|a| InlineImage {
                    mime_type: a.mime_type.clone(),
                    data: a.data.clone(),
                })
                .collect(),
        });
        Ok(history)
    }

    async fn stream_with_retry(
        &self,
        history: &[ChatMessage],
        on_event: &mut (dyn FnMut(StreamEvent<'_>) + Send),
    ) -> Result<String, (LlmError, u32)> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.stream_once(history, on_event).await {
                Ok(raw) => return Ok(raw),
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(attempt, ?delay, error = %e, "collaborator stream failed, retrying");
                    on_event(StreamEvent::Retrying { attempt, delay });
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err((e, attempt)),
            }
        }
    }

    /// Drains one streamed response. Only a stream that finished cleanly and
    /// produced text counts as a turn.
    async fn stream_once(
        &self,
        history: &[ChatMessage],
        on_event: &mut (dyn FnMut(StreamEvent<'_>) + Send),
    ) -> Result<String, LlmError> {
        let (tx, mut rx) = mpsc::channel::<String>(FRAGMENT_BUFFER);

        let produce = self.llm.chat_streaming(history, self.options.clone(), tx);
        let drain = async {
            let mut raw = String::new();
            while let Some(fragment) = rx.recv().await {
                on_event(StreamEvent::Fragment(&fragment));
                raw.push_str(&fragment);
            }
            raw
        };

        let (result, raw) = tokio::join!(produce, drain);
        result?;

        if raw.trim().is_empty() {
            return Err(LlmError::Stream("empty response".to_string()));
        }
        debug!(provider = self.llm.name(), bytes = raw.len(), "turn streamed");
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(100),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
    }

    #[test]
    fn zero_attempts_is_clamped() {
        let policy = RetryPolicy::from(&RetryConfig {
            max_attempts: 0,
            initial_backoff_ms: 10,
        });
        assert_eq!(policy.max_attempts, 1);
    }
}
