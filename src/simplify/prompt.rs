//! Prompt sent ahead of every text unit.

/// Instructions for turning technical prose into plain, listenable text.
pub const DEFAULT_PROMPT: &str = "\
Rewrite the following passage of a technical document in plain, approachable language.
Use a relaxed, conversational tone suitable for being read aloud.
Swap jargon for everyday words, adding a short explanation in parentheses where a term has to stay.

Rules:
1. Leave out author names, affiliations, figure and table references, section numbers and tables of contents.
2. Do not use markdown or any formatting symbols.
3. Return only the rewritten text.
4. Do not summarize or comment on the passage; rewrite it, keeping as much of the original meaning as possible.
5. Write in flowing paragraphs that sound natural when spoken.

Text:
";

/// Builds the full prompt for one unit.
pub fn build_prompt(unit: &str) -> String {
    format!("{DEFAULT_PROMPT}{unit}\n")
}
