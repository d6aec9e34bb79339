use thiserror::Error;

use super::Phase;

/// Why a proposed transition was not taken. None of these are failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("no candidate phase")]
    NoCandidate,
    #[error("already in phase {0}")]
    SamePhase(Phase),
    #[error("regression from phase {current} to {candidate}")]
    Regression { current: Phase, candidate: Phase },
    #[error("skip from phase {current} to {candidate}")]
    Skip { current: Phase, candidate: Phase },
}

/// Validates a proposed transition. Only a single step forward is admitted.
pub fn admit(candidate: Option<Phase>, current: Phase) -> Result<Phase, Rejection> {
    let candidate = candidate.ok_or(Rejection::NoCandidate)?;

    if candidate == current {
        return Err(Rejection::SamePhase(current));
    }
    if candidate < current {
        return Err(Rejection::Regression { current, candidate });
    }
    if candidate.number() > current.number() + 1 {
        return Err(Rejection::Skip { current, candidate });
    }
    Ok(candidate)
}
