//! Per-turn phase update: classify raw text, guard the candidate, clean the
//! text, then let the conclusion detector override.
//!
//! The ordering is load-bearing. Classification sees the raw text because the
//! marker is stripped by cleaning; conclusion detection sees the cleaned text so
//! that bracketed annotations never count as closing phrases.

use serde::Serialize;
use tracing::debug;

use super::classifier::{Candidate, PhaseClassifier};
use super::{admit, clean, is_concluded, Phase, Rejection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    /// Admitted by the guard as the next phase.
    Advanced,
    /// Forced to the terminal phase by a closing phrase.
    Concluded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PhaseChange {
    pub from: Phase,
    pub to: Phase,
    pub reason: ChangeReason,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurnEvaluation {
    /// Cleaned text, the form that is stored and shown.
    pub content: String,
    pub candidate: Option<Candidate>,
    pub decision: Result<Phase, Rejection>,
    pub concluded: bool,
    /// The phase update to persist, if any.
    pub change: Option<PhaseChange>,
}

#[derive(Debug, Clone, Default)]
pub struct PhaseEngine {
    classifier: PhaseClassifier,
}

impl PhaseEngine {
    pub fn new(classifier: PhaseClassifier) -> Self {
        Self { classifier }
    }

    pub fn classifier(&self) -> &PhaseClassifier {
        &self.classifier
    }

    /// Storage/display form of `raw`: markers in this engine's grammar first,
    /// then the generic annotation pass.
    pub fn display_text(&self, raw: &str) -> String {
        clean(&self.classifier.strip_markers(raw))
    }

    /// Runs once per completed turn on the fully accumulated text.
    pub fn evaluate_turn(&self, raw: &str, current: Phase) -> TurnEvaluation {
        let candidate = self.classifier.classify(raw, current);
        let decision = admit(candidate.map(|c| c.phase), current);

        let mut change = match decision {
            Ok(to) => Some(PhaseChange {
                from: current,
                to,
                reason: ChangeReason::Advanced,
            }),
            Err(rejection) => {
                debug!(%current, ?candidate, %rejection, "phase transition rejected");
                None
            }
        };

        let content = self.display_text(raw);

        let concluded = is_concluded(&content);
        if concluded && !current.is_terminal() {
            change = Some(PhaseChange {
                from: current,
                to: Phase::TERMINAL,
                reason: ChangeReason::Concluded,
            });
        }

        TurnEvaluation {
            content,
            candidate,
            decision,
            concluded,
            change,
        }
    }
}
