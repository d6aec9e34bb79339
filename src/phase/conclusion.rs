/// Session-closing phrases, lower-case.
const CLOSING_PHRASES: &[&str] = &[
    "con esto concluimos",
    "sesión concluida",
    "sesión finalizada",
    "resumen final",
    "proceso completado",
    "hemos completado el proceso",
    "damos por cerrada la sesión",
];

/// True when cleaned collaborator text closes the session.
pub fn is_concluded(cleaned: &str) -> bool {
    let text = cleaned.to_lowercase();
    CLOSING_PHRASES.iter().any(|phrase| text.contains(phrase))
}
