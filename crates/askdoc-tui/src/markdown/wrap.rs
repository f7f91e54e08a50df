//! Width-aware wrapping of styled spans.
//!
//! Prose wraps at word boundaries with whitespace collapsed; inline code keeps
//! its whitespace and only breaks when a single piece does not fit. Widths are
//! display columns (`unicode-width`), so CJK and emoji count as two.

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::style::{Style, StyledLine, StyledSpan};

/// Options for wrapping styled spans with hanging indents.
#[derive(Debug, Clone, Default)]
pub struct WrapOptions {
    /// Maximum display width for lines (0 disables wrapping).
    pub width: usize,
    /// Prefix spans for the first line (e.g. a list bullet).
    pub first_prefix: Vec<StyledSpan>,
    /// Prefix spans for continuation lines.
    pub rest_prefix: Vec<StyledSpan>,
}

impl WrapOptions {
    pub fn new(width: usize) -> Self {
        Self {
            width,
            first_prefix: vec![],
            rest_prefix: vec![],
        }
    }

    /// Same prefix on every line (block quotes).
    pub fn with_prefix(width: usize, prefix: &[StyledSpan]) -> Self {
        Self {
            width,
            first_prefix: prefix.to_vec(),
            rest_prefix: prefix.to_vec(),
        }
    }
}

fn spans_width(spans: &[StyledSpan]) -> usize {
    spans.iter().map(|s| s.text.width()).sum()
}

/// Wraps styled spans, carrying each span's style across line breaks.
///
/// A `\n` inside a span forces a break.
pub fn wrap_styled_spans(spans: &[StyledSpan], opts: &WrapOptions) -> Vec<StyledLine> {
    let mut builder = LineBuilder::new(opts);

    for span in spans {
        for (i, part) in span.text.split('\n').enumerate() {
            if i > 0 {
                builder.break_line();
            }
            if part.is_empty() {
                continue;
            }
            if span.style == Style::CodeInline {
                builder.push_verbatim(part, span.style);
            } else {
                builder.push_words(part, span.style);
            }
        }
    }

    builder.finish()
}

struct LineBuilder<'a> {
    opts: &'a WrapOptions,
    first_avail: usize,
    rest_avail: usize,
    lines: Vec<StyledLine>,
    current: Vec<StyledSpan>,
    used: usize,
    on_first_line: bool,
    /// A collapsed space waiting for the next word on the same line.
    pending_space: Option<Style>,
}

impl<'a> LineBuilder<'a> {
    fn new(opts: &'a WrapOptions) -> Self {
        let avail = |prefix: &[StyledSpan]| {
            if opts.width == 0 {
                usize::MAX
            } else {
                opts.width.saturating_sub(spans_width(prefix)).max(1)
            }
        };
        Self {
            opts,
            first_avail: avail(&opts.first_prefix),
            rest_avail: avail(&opts.rest_prefix),
            lines: Vec::new(),
            current: Vec::new(),
            used: 0,
            on_first_line: true,
            pending_space: None,
        }
    }

    fn avail(&self) -> usize {
        if self.on_first_line {
            self.first_avail
        } else {
            self.rest_avail
        }
    }

    fn pending_width(&self) -> usize {
        usize::from(self.pending_space.is_some())
    }

    fn push_words(&mut self, text: &str, style: Style) {
        if text.starts_with(char::is_whitespace) && self.used > 0 {
            self.pending_space = Some(style);
        }

        for (i, word) in text.split_whitespace().enumerate() {
            if i > 0 {
                self.pending_space = Some(style);
            }
            let width = word.width();
            if self.used > 0 && self.used + self.pending_width() + width > self.avail() {
                self.break_line();
            }
            self.emit_pending_space();
            if width > self.avail() {
                self.push_chars(word, style);
            } else {
                self.push_text(word, style, width);
            }
        }

        if text.ends_with(char::is_whitespace) && self.used > 0 {
            self.pending_space = Some(style);
        }
    }

    fn push_verbatim(&mut self, text: &str, style: Style) {
        let width = text.width();
        if self.used > 0
            && self.used + self.pending_width() + width > self.avail()
            && width <= self.rest_avail
        {
            self.break_line();
        }
        self.emit_pending_space();
        self.push_chars(text, style);
    }

    fn push_chars(&mut self, text: &str, style: Style) {
        for ch in text.chars() {
            let width = ch.width().unwrap_or(0);
            if width > 0 && self.used > 0 && self.used + width > self.avail() {
                self.break_line();
            }
            let mut buf = [0u8; 4];
            self.push_text(ch.encode_utf8(&mut buf), style, width);
        }
    }

    fn emit_pending_space(&mut self) {
        if let Some(style) = self.pending_space.take()
            && self.used > 0
        {
            self.push_text(" ", style, 1);
        }
    }

    fn push_text(&mut self, text: &str, style: Style, width: usize) {
        match self.current.last_mut() {
            Some(last) if last.style == style => last.text.push_str(text),
            _ => self.current.push(StyledSpan::new(text, style)),
        }
        self.used += width;
    }

    fn break_line(&mut self) {
        let prefix = if self.on_first_line {
            &self.opts.first_prefix
        } else {
            &self.opts.rest_prefix
        };
        let mut spans = prefix.clone();
        spans.append(&mut self.current);
        self.lines.push(StyledLine { spans });
        self.on_first_line = false;
        self.used = 0;
        self.pending_space = None;
    }

    fn finish(mut self) -> Vec<StyledLine> {
        if !self.current.is_empty() || self.lines.is_empty() {
            self.break_line();
        }
        self.lines
    }
}
