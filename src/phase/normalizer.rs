//! Strips control markup from collaborator output before it is stored or shown.

use once_cell::sync::Lazy;
use regex::Regex;

/// Bracketed technical annotations: an upper-case token, optionally followed by
/// `: payload`. Covers the phase marker (`[PHASE_UPDATE: 2]`) as well as things
/// like `[NOTA_INTERNA]` or `[DEBUG: ...]`. Markdown links (`[texto](url)`) and
/// ordinary bracketed prose are left alone.
static ANNOTATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[A-Z][A-Z0-9_]*(?:\s*:[^\[\]\n]*)?\][ \t]*").unwrap());

/// Two or more consecutive blank (or whitespace-only) lines.
static BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+").unwrap());

/// Produces the display/storage form of raw collaborator text.
///
/// Idempotent: `clean(&clean(x)) == clean(x)`.
pub fn clean(raw: &str) -> String {
    let mut text = raw.replace("\r\n", "\n");

    // Removing an annotation can expose another one ("[[A]B]" -> "[B]"), so run to a fixpoint.
    while ANNOTATION.is_match(&text) {
        text = ANNOTATION.replace_all(&text, "").into_owned();
    }

    let text = BLANK_RUN.replace_all(&text, "\n\n");
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_phase_marker_and_leading_newline() {
        let raw = "[PHASE_UPDATE: 1]\n¡Hola! Soy tu asistente...";
        assert_eq!(clean(raw), "¡Hola! Soy tu asistente...");
    }

    #[test]
    fn strips_every_marker_occurrence() {
        let raw = "[PHASE_UPDATE: 2] Diseñemos.\nTexto [PHASE_UPDATE: 3] final";
        assert_eq!(clean(raw), "Diseñemos.\nTexto final");
    }

    #[test]
    fn strips_other_technical_annotations() {
        let raw = "Primero [NOTA_INTERNA] esto. [DEBUG: fase=2 ok] Luego aquello.";
        assert_eq!(clean(raw), "Primero esto. Luego aquello.");
    }

    #[test]
    fn keeps_markdown_links_and_prose_brackets() {
        let raw = "Mira [este recurso](https://example.com) y [tu modelo].";
        assert_eq!(clean(raw), raw);
    }

    #[test]
    fn collapses_blank_line_runs() {
        let raw = "uno\n\n\n\ndos\n \n\t\n\ntres\n\ncuatro";
        assert_eq!(clean(raw), "uno\n\ndos\n\ntres\n\ncuatro");
    }

    #[test]
    fn nested_annotations_are_fully_removed() {
        assert_eq!(clean("a [[NOTA]INFO] b"), "a b");
    }

    #[test]
    fn is_idempotent() {
        let samples = [
            "",
            "   \n\n  ",
            "[PHASE_UPDATE: 4]\n\n\n\nExploremos tu modelo.\n\n\n",
            "a [[NOTA]INFO] b\r\n\r\n\r\n\r\nc",
            "x [A: [B] ] y",
            "texto [PHASE_UPDATE: 9] fuera de rango",
        ];
        for sample in samples {
            let once = clean(sample);
            assert_eq!(clean(&once), once, "not idempotent for {sample:?}");
        }
    }
}
