pub mod classifier;
pub mod conclusion;
pub mod guard;
pub mod normalizer;
pub mod pipeline;

pub use classifier::PhaseClassifier;
pub use conclusion::is_concluded;
pub use guard::{admit, Rejection};
pub use normalizer::clean;
pub use pipeline::{PhaseChange, PhaseEngine, TurnEvaluation};

use serde::{Deserialize, Serialize};
use std::fmt;

/// The six ordered stages of an LSP facilitation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Phase {
    Identification = 1,
    ProtocolDevelopment = 2,
    Implementation = 3,
    InsightDiscovery = 4,
    StrategyDevelopment = 5,
    Evaluation = 6,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Identification,
        Phase::ProtocolDevelopment,
        Phase::Implementation,
        Phase::InsightDiscovery,
        Phase::StrategyDevelopment,
        Phase::Evaluation,
    ];

    pub const INITIAL: Phase = Phase::Identification;
    pub const TERMINAL: Phase = Phase::Evaluation;

    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn from_number(n: i64) -> Option<Phase> {
        match n {
            1 => Some(Phase::Identification),
            2 => Some(Phase::ProtocolDevelopment),
            3 => Some(Phase::Implementation),
            4 => Some(Phase::InsightDiscovery),
            5 => Some(Phase::StrategyDevelopment),
            6 => Some(Phase::Evaluation),
            _ => None,
        }
    }

    /// The phase immediately after this one, `None` for the terminal phase.
    pub fn next(self) -> Option<Phase> {
        Phase::from_number(i64::from(self.number()) + 1)
    }

    pub fn is_terminal(self) -> bool {
        self == Phase::TERMINAL
    }

    pub fn title(self) -> &'static str {
        match self {
            Phase::Identification => "Fase 1: Identificación",
            Phase::ProtocolDevelopment => "Fase 2: Protocolo",
            Phase::Implementation => "Fase 3: Implementación",
            Phase::InsightDiscovery => "Fase 4: Insights",
            Phase::StrategyDevelopment => "Fase 5: Estrategia",
            Phase::Evaluation => "Fase 6: Evaluación",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Phase::Identification => "Definimos el desafío.",
            Phase::ProtocolDevelopment => "Diseñamos la construcción.",
            Phase::Implementation => "Construimos y compartimos.",
            Phase::InsightDiscovery => "Descubrimos significados.",
            Phase::StrategyDevelopment => "Convertimos insights en acción.",
            Phase::Evaluation => "Reflexionamos y consolidamos.",
        }
    }
}

impl Default for Phase {
    fn default() -> Self {
        Phase::INITIAL
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

impl From<Phase> for u8 {
    fn from(phase: Phase) -> u8 {
        phase.number()
    }
}

impl TryFrom<u8> for Phase {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Phase::from_number(i64::from(value)).ok_or_else(|| format!("phase out of range: {value}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbering_matches_methodology_order() {
        let numbers: Vec<u8> = Phase::ALL.iter().map(|p| p.number()).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5, 6]);
        assert!(Phase::Identification < Phase::Evaluation);
    }

    #[test]
    fn next_stops_at_terminal() {
        assert_eq!(Phase::Implementation.next(), Some(Phase::InsightDiscovery));
        assert_eq!(Phase::Evaluation.next(), None);
        assert!(Phase::Evaluation.is_terminal());
    }

    #[test]
    fn out_of_range_numbers_are_rejected() {
        assert_eq!(Phase::from_number(0), None);
        assert_eq!(Phase::from_number(7), None);
        assert!(Phase::try_from(9u8).is_err());
    }

    #[test]
    fn serializes_as_plain_number() {
        let json = serde_json::to_string(&Phase::StrategyDevelopment).unwrap();
        assert_eq!(json, "5");
        let back: Phase = serde_json::from_str("2").unwrap();
        assert_eq!(back, Phase::ProtocolDevelopment);
    }
}
