//! Plain-text session transcripts.
//!
//! The layout is the one the facilitator's "copy chat" button produced: a
//! speaker line (`[Usuario]:` / `[Facilitador]:`) followed by the message, with
//! blocks separated by a `---` line. A header block carries the session name and
//! phase so an exported file can be imported again.

use crate::db::{Message, Role, Session};
use crate::phase::Phase;

const SEPARATOR: &str = "\n\n---\n\n";
const USER_LABEL: &str = "[Usuario]";
const MODEL_LABEL: &str = "[Facilitador]";
const INSIGHT_TAG: &str = "[Insight]";
const NAME_PREFIX: &str = "Sesión: ";
const PHASE_PREFIX: &str = "Fase: ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub role: Role,
    pub content: String,
    pub is_insight: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    pub name: Option<String>,
    pub phase: Option<Phase>,
    pub entries: Vec<TranscriptEntry>,
}

fn speaker_line(role: Role, is_insight: bool) -> String {
    let label = match role {
        Role::User => USER_LABEL,
        Role::Model => MODEL_LABEL,
    };
    if is_insight {
        format!("{label} {INSIGHT_TAG}:")
    } else {
        format!("{label}:")
    }
}

fn parse_speaker(line: &str) -> Option<(Role, bool)> {
    let line = line.trim().strip_suffix(':')?;
    let (label, is_insight) = match line.strip_suffix(INSIGHT_TAG) {
        Some(label) => (label.trim_end(), true),
        None => (line, false),
    };
    match label {
        USER_LABEL => Some((Role::User, is_insight)),
        MODEL_LABEL => Some((Role::Model, is_insight)),
        _ => None,
    }
}

pub fn render(session: &Session, messages: &[Message]) -> String {
    let phase = session.current_phase;
    let mut blocks = Vec::with_capacity(messages.len() + 1);
    blocks.push(format!(
        "{NAME_PREFIX}{}\n{PHASE_PREFIX}{} ({})",
        session.name,
        phase.number(),
        phase.title()
    ));

    for m in messages {
        blocks.push(format!("{}\n{}", speaker_line(m.role, m.is_insight), m.content));
    }

    blocks.join(SEPARATOR)
}

pub fn parse(text: &str) -> Transcript {
    let text = text.replace("\r\n", "\n");
    let mut transcript = Transcript::default();

    for block in text.split(SEPARATOR) {
        let block = block.trim_matches('\n');
        let (first, rest) = block.split_once('\n').unwrap_or((block, ""));

        if let Some((role, is_insight)) = parse_speaker(first) {
            let content = rest.trim();
            if !content.is_empty() {
                transcript.entries.push(TranscriptEntry {
                    role,
                    content: content.to_string(),
                    is_insight,
                });
            }
            continue;
        }

        // A message holding a markdown rule was split on it; glue the tail back on.
        if let Some(last) = transcript.entries.last_mut() {
            if !block.trim().is_empty() {
                last.content.push_str(SEPARATOR);
                last.content.push_str(block.trim_end());
            }
            continue;
        }
        for line in block.lines() {
            if let Some(name) = line.strip_prefix(NAME_PREFIX) {
                transcript.name = Some(name.trim().to_string());
            } else if let Some(phase) = line.strip_prefix(PHASE_PREFIX) {
                let digits: String = phase.chars().take_while(|c| c.is_ascii_digit()).collect();
                transcript.phase = digits.parse::<i64>().ok().and_then(Phase::from_number);
            }
        }
    }

    transcript
}
