//! Phase-tracking facilitator for six-phase LEGO® Serious Play® sessions.
//!
//! The [`phase`] module holds the pure engine (normalizer, classifier, guard,
//! conclusion detector); [`facilitator`] drives turns against an
//! [`llm::LlmProvider`] and persists them through a [`db::SessionStore`].

pub mod cli;
pub mod config;
pub mod db;
pub mod facilitator;
pub mod llm;
pub mod phase;
pub mod prompts;
pub mod transcript;
