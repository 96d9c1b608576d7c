//! Text normalization for generated turn content.
//!
//! Models sometimes open an utterance with their own name ("As Alice, ...")
//! even when told not to. The rule table here strips those prefixes before
//! the text reaches synthesis. Kept as pure functions, deliberately outside
//! the assembler and scheduler state machines.

/// Prefix patterns a speaker may prepend to their own turn, with `{}`
/// standing for the speaker's name. Checked in order; first match wins.
const PREFIX_RULES: [&str; 6] = [
    "As {},",
    "Speaking as {},",
    "{} here,",
    "This is {},",
    "{}:",
    "{},",
];

/// Strip a leading self-reference of `speaker` from `text`.
///
/// Returns the input unchanged when no rule matches.
pub fn strip_speaker_prefix<'a>(text: &'a str, speaker: &str) -> &'a str {
    for rule in PREFIX_RULES {
        let prefix = rule.replace("{}", speaker);
        if let Some(rest) = text.strip_prefix(&prefix) {
            return rest.trim_start();
        }
    }
    text
}

/// Normalize a closed turn for synthesis: strip the speaker prefix and
/// collapse whitespace runs so pauses aren't synthesized for stray newlines.
pub fn normalize_for_synthesis(text: &str, speaker: &str) -> String {
    let stripped = strip_speaker_prefix(text.trim(), speaker);
    if let Ok(ws) = regex::Regex::new(r"\s+") {
        ws.replace_all(stripped, " ").trim().to_string()
    } else {
        stripped.trim().to_string()
    }
}
