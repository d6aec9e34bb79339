//! Proposes a phase from raw collaborator text.
//!
//! Two tiers. The explicit marker (`[PHASE_UPDATE: n]`) is authoritative and
//! short-circuits everything else; the heuristic tier only runs when no valid
//! marker is present, and only recognises near-verbatim transition phrases.

use regex::Regex;
use std::borrow::Cow;
use tracing::debug;

use super::Phase;

pub const DEFAULT_MARKER_KEYWORD: &str = "PHASE_UPDATE";

/// Phrases that announce entering a phase, per phase, lower-case.
///
/// Single methodology words ("protocolo", "evaluación") are deliberately absent:
/// the collaborator uses them in every phase.
const TRANSITION_PHRASES: [(Phase, &[&str]); 6] = [
    (
        Phase::Identification,
        &[
            "te doy la bienvenida",
            "bienvenido a tu sesión",
            "bienvenida a tu sesión",
            "¡hola! soy tu asistente",
            "hola, soy tu asistente",
            "¿cuál es tu nombre?",
        ],
    ),
    (
        Phase::ProtocolDevelopment,
        &[
            "diseñemos tu protocolo",
            "diseñemos el protocolo",
            "protocolo estructurado",
            "pasemos al diseño del protocolo",
            "he diseñado un protocolo personalizado",
        ],
    ),
    (
        Phase::Implementation,
        &[
            "comencemos a construir",
            "empieza a construir ahora",
            "es momento de construir",
            "toma tus bricks y construye",
        ],
    ),
    (
        Phase::InsightDiscovery,
        &[
            "compárteme tu modelo",
            "comparte tu modelo",
            "cuéntame la historia de tu modelo",
            "exploremos tu modelo",
        ],
    ),
    (
        Phase::StrategyDevelopment,
        &[
            "convirtamos tus insights en",
            "pasemos de los insights a la acción",
            "diseñemos tu plan de acción",
            "plan de acción de 7 días",
        ],
    ),
    (
        Phase::Evaluation,
        &[
            "reflexionemos sobre el proceso completo",
            "evaluemos el proceso",
            "miremos atrás todo el recorrido",
        ],
    ),
];

/// Text that talks *about* a phase instead of moving into it.
const REFERENCE_PHRASES: &[&str] = &[
    "en esta fase",
    "en la fase",
    "durante la fase",
    "se refiere a",
    "hace referencia",
    "explica",
    "menciona",
    "in this phase",
    "refers to",
    "explains",
    "mentions",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSource {
    Marker,
    Heuristic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub phase: Phase,
    pub source: CandidateSource,
}

#[derive(Debug, Clone)]
pub struct PhaseClassifier {
    marker: Regex,
}

impl PhaseClassifier {
    /// `keyword` is the literal the collaborator is told to emit inside the brackets.
    pub fn new(keyword: &str) -> Result<Self, regex::Error> {
        let pattern = format!(r"\[\s*{}\s*:\s*(\d+)\s*\]", regex::escape(keyword));
        Ok(Self {
            marker: Regex::new(&pattern)?,
        })
    }

    /// Valid marker values in order of appearance. Out-of-range values are dropped.
    pub fn markers(&self, raw: &str) -> Vec<Phase> {
        self.marker
            .captures_iter(raw)
            .filter_map(|caps| caps[1].parse::<i64>().ok())
            .filter_map(Phase::from_number)
            .collect()
    }

    /// Removes every marker this classifier recognizes, whatever its spacing.
    pub fn strip_markers<'a>(&self, raw: &'a str) -> Cow<'a, str> {
        self.marker.replace_all(raw, "")
    }

    pub fn classify(&self, raw: &str, current: Phase) -> Option<Candidate> {
        if let Some(phase) = self.markers(raw).last().copied() {
            return Some(Candidate {
                phase,
                source: CandidateSource::Marker,
            });
        }

        heuristic(raw, current).map(|phase| Candidate {
            phase,
            source: CandidateSource::Heuristic,
        })
    }
}

impl Default for PhaseClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_MARKER_KEYWORD).expect("default marker keyword is a valid pattern")
    }
}

fn heuristic(raw: &str, current: Phase) -> Option<Phase> {
    let text = raw.to_lowercase();

    if let Some(phrase) = REFERENCE_PHRASES.iter().find(|p| text.contains(*p)) {
        debug!(phrase, "heuristic skipped: text references a phase");
        return None;
    }

    let matches: Vec<Phase> = TRANSITION_PHRASES
        .iter()
        .filter(|(_, phrases)| phrases.iter().any(|p| text.contains(p)))
        .map(|(phase, _)| *phase)
        .collect();

    // Several phases may match in one turn; the adjacent step is the only one the guard would take.
    match current.next() {
        Some(next) if matches.contains(&next) => Some(next),
        _ => matches.first().copied(),
    }
}
