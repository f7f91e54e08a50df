//! Language detection and syntax highlighting for fenced code blocks.

use std::sync::LazyLock;

use regex::Regex;
use syntect::easy::HighlightLines;
use syntect::highlighting::{Theme, ThemeSet};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::LinesWithEndings;

use crate::style::{Style, StyledLine, StyledSpan};

/// Language reported for untagged blocks and tags the highlighter does not know.
pub const PLAIN_TEXT: &str = "text";

const THEME_NAME: &str = "base16-ocean.dark";

static SYNTAX_SET: LazyLock<SyntaxSet> = LazyLock::new(SyntaxSet::load_defaults_newlines);
static THEME_SET: LazyLock<ThemeSet> = LazyLock::new(ThemeSet::load_defaults);
static LANGUAGE_TAG: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\s*(?:language-)?(\w+)").ok());

/// Resolves the language of a fence info string.
///
/// Takes the first word token (a `language-` prefix is accepted). Returns
/// `"text"` when the tag is missing or unknown to the highlighter.
pub fn detect_language(info: &str) -> String {
    let Some(token) = first_token(info) else {
        return PLAIN_TEXT.to_string();
    };
    if find_syntax(token).is_some() {
        token.to_string()
    } else {
        PLAIN_TEXT.to_string()
    }
}

fn first_token(info: &str) -> Option<&str> {
    let re = LANGUAGE_TAG.as_ref()?;
    re.captures(info)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn find_syntax(token: &str) -> Option<&'static SyntaxReference> {
    if token.eq_ignore_ascii_case(PLAIN_TEXT) {
        return None;
    }
    SYNTAX_SET.find_syntax_by_token(token)
}

fn theme() -> Option<&'static Theme> {
    THEME_SET.themes.get(THEME_NAME)
}

/// Highlights `code` as `language`, one styled line per source line.
///
/// Plain text, and any line the highlighter rejects, renders in the
/// code-block style. A trailing newline does not produce an extra line.
pub fn highlight_code(code: &str, language: &str) -> Vec<StyledLine> {
    let code = code.strip_suffix('\n').unwrap_or(code);
    let syntax = find_syntax(language);

    let (Some(syntax), Some(theme)) = (syntax, theme()) else {
        return plain_lines(code);
    };

    let mut highlighter = HighlightLines::new(syntax, theme);
    let mut lines = Vec::new();
    for line in LinesWithEndings::from(code) {
        match highlighter.highlight_line(line, &SYNTAX_SET) {
            Ok(ranges) => {
                let spans = ranges
                    .into_iter()
                    .map(|(style, text)| {
                        let fg = style.foreground;
                        StyledSpan::new(text.trim_end_matches('\n'), Style::Syntax(fg.r, fg.g, fg.b))
                    })
                    .filter(|span| !span.text.is_empty())
                    .collect();
                lines.push(StyledLine { spans });
            }
            Err(err) => {
                tracing::debug!(language, "highlight failed: {err}");
                lines.push(StyledLine::from_span(
                    line.trim_end_matches('\n'),
                    Style::CodeBlock,
                ));
            }
        }
    }

    if lines.is_empty() {
        lines.push(StyledLine::empty());
    }
    lines
}

fn plain_lines(code: &str) -> Vec<StyledLine> {
    code.split('\n')
        .map(|line| StyledLine::from_span(line, Style::CodeBlock))
        .collect()
}
