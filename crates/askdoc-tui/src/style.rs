//! UI-agnostic styled text.
//!
//! The render pipeline produces these; the live view translates them into
//! terminal attributes at paint time.

/// A styled span of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyledSpan {
    pub text: String,
    pub style: Style,
}

impl StyledSpan {
    pub fn new(text: impl Into<String>, style: Style) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }
}

/// A line of styled spans.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StyledLine {
    pub spans: Vec<StyledSpan>,
}

impl StyledLine {
    /// Creates an empty line.
    pub fn empty() -> Self {
        StyledLine { spans: vec![] }
    }

    pub fn from_span(text: impl Into<String>, style: Style) -> Self {
        StyledLine {
            spans: vec![StyledSpan::new(text, style)],
        }
    }

    /// Concatenated text of every span.
    pub fn plain_text(&self) -> String {
        self.spans.iter().map(|s| s.text.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.iter().all(|s| s.text.is_empty())
    }
}

/// Semantic style identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    /// No styling.
    Plain,
    /// Answer body text.
    Answer,
    /// Inline code (`code`).
    CodeInline,
    /// Code block text without a known grammar.
    CodeBlock,
    /// Code block frame and language label.
    CodeFence,
    /// Highlighted code token (foreground RGB from the syntax theme).
    Syntax(u8, u8, u8),
    /// Copy affordance label.
    CopyLabel,
    /// Copy affordance label while the copied window is open.
    CopyLabelActive,
    /// Emphasized text (*italic*).
    Emphasis,
    /// Strong text (**bold**).
    Strong,
    /// Heading level 1.
    H1,
    /// Heading level 2.
    H2,
    /// Heading level 3 and below.
    H3,
    Link,
    BlockQuote,
    ListBullet,
    ListNumber,
    /// Horizontal rule and table borders.
    Rule,
    /// Status lines printed around the answer.
    Notice,
}
