//! Markdown helpers: structural check of rewritten units and whitespace
//! normalization of extracted and joined text.

use pulldown_cmark::{CodeBlockKind, Event, Parser, Tag};
use regex::Regex;
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static EXCESS_NEWLINES: LazyLock<Regex> = LazyLock::new(|| {
    // SAFETY: hardcoded pattern, always valid
    Regex::new(r"\n{3,}").expect("hardcoded newline pattern")
});

#[allow(clippy::expect_used)]
static SETEXT_RULE: LazyLock<Regex> = LazyLock::new(|| {
    // SAFETY: hardcoded pattern, always valid
    Regex::new(r"(?m)^={3,}$").expect("hardcoded rule pattern")
});

/// Problem found in rewritten markdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkdownIssue {
    /// The text contains no readable content.
    NoText,
    /// A fenced code block is opened but never closed.
    UnclosedFence,
}

impl std::fmt::Display for MarkdownIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarkdownIssue::NoText => write!(f, "no readable text"),
            MarkdownIssue::UnclosedFence => write!(f, "unclosed code fence"),
        }
    }
}

/// Parses `text` as CommonMark and reports structural problems.
///
/// An empty list means the text parsed cleanly.
pub fn check_markdown(text: &str) -> Vec<MarkdownIssue> {
    let mut issues = Vec::new();
    let mut has_text = false;
    let mut has_fenced_block = false;

    for event in Parser::new(text) {
        match event {
            Event::Text(t) | Event::Code(t) if !t.trim().is_empty() => has_text = true,
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(_))) => has_fenced_block = true,
            _ => {}
        }
    }

    if !has_text {
        issues.push(MarkdownIssue::NoText);
    }
    // The parser silently closes a dangling fence at end of input, so an odd
    // number of fence lines is the only trace left of it.
    if has_fenced_block && fence_lines(text) % 2 == 1 {
        issues.push(MarkdownIssue::UnclosedFence);
    }
    issues
}

fn fence_lines(text: &str) -> usize {
    text.lines()
        .map(str::trim_start)
        .filter(|line| line.starts_with("```") || line.starts_with("~~~"))
        .count()
}

/// Collapses runs of three or more newlines to a single blank line.
pub fn collapse_blank_lines(text: &str) -> String {
    EXCESS_NEWLINES.replace_all(text, "\n\n").into_owned()
}

/// Normalizes text produced by document extraction.
///
/// Lines made only of `===` rules become a bare `#`.
pub fn normalize_extracted(text: &str) -> String {
    SETEXT_RULE.replace_all(text, "#").into_owned()
}
