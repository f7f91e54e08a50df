//! Live answer view.
//!
//! In `Ansi` mode the rendered answer is repainted in place on every change:
//! the view remembers what it last painted, moves the cursor back to the
//! first line that differs and redraws from there. In `Plain` mode (stdout is
//! not a terminal) the raw answer text is appended as it arrives.

use std::io::{self, Write};

use askdoc_core::stream::{AnswerUpdate, UpdateKind};
use crossterm::style::{Color, ContentStyle, PrintStyledContent, StyledContent, Stylize};
use crossterm::{cursor, queue, terminal};
use unicode_width::UnicodeWidthStr;

use crate::copy::CopyStates;
use crate::markdown::{RenderBlock, RenderTree, render};
use crate::style::{Style, StyledLine, StyledSpan};

/// Fallback render width when the terminal size is unknown.
pub const DEFAULT_WIDTH: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    /// Styled, repainted in place.
    Ansi,
    /// Raw text, append only.
    Plain,
}

/// Render width for a configured width and the terminal's columns.
///
/// A configured width never exceeds the terminal, so rendered lines do not
/// soft-wrap behind the repaint's back.
pub fn fit_width(configured: Option<usize>, columns: Option<usize>) -> usize {
    match (configured, columns) {
        (Some(width), Some(cols)) => width.min(cols),
        (Some(width), None) => width,
        (None, Some(cols)) => cols,
        (None, None) => DEFAULT_WIDTH,
    }
}

/// Terminal width in columns, if stdout is a terminal.
pub fn terminal_width() -> Option<usize> {
    terminal::size()
        .ok()
        .map(|(cols, _)| usize::from(cols))
        .filter(|cols| *cols > 0)
}

/// Flattens a render tree into display lines with code block frames.
///
/// Code blocks get a header carrying the language, their 1-based number and
/// the copy label; the footer appears once the closing fence has arrived.
pub fn layout(tree: &RenderTree, copy: &CopyStates) -> Vec<StyledLine> {
    let mut lines = Vec::new();
    let mut code_index = 0;

    for (i, block) in tree.blocks().iter().enumerate() {
        if i > 0 {
            lines.push(StyledLine::empty());
        }
        match block {
            RenderBlock::Markdown(md) => lines.extend(md.iter().cloned()),
            RenderBlock::Code(view) => {
                let label_style = if copy.get(code_index).is_some_and(|c| c.is_copied()) {
                    Style::CopyLabelActive
                } else {
                    Style::CopyLabel
                };
                lines.push(StyledLine {
                    spans: vec![
                        StyledSpan::new(
                            format!("┌─ {} [{}] ", view.descriptor.language, code_index + 1),
                            Style::CodeFence,
                        ),
                        StyledSpan::new(copy.label(code_index), label_style),
                    ],
                });
                for line in &view.lines {
                    let mut spans = vec![StyledSpan::new("│ ", Style::CodeFence)];
                    spans.extend(line.spans.iter().cloned());
                    lines.push(StyledLine { spans });
                }
                if view.closed {
                    lines.push(StyledLine::from_span("└─", Style::CodeFence));
                }
                code_index += 1;
            }
        }
    }

    lines
}

/// One summary line per code block, for listing.
pub fn block_summary(tree: &RenderTree, copy: &CopyStates) -> Vec<StyledLine> {
    (0..tree.code_block_count())
        .filter_map(|index| tree.code_block(index).map(|view| (index, view)))
        .map(|(index, view)| {
            let line_count = view.descriptor.raw_text.lines().count();
            let state = if view.closed { "" } else { ", streaming" };
            StyledLine {
                spans: vec![
                    StyledSpan::new(format!("[{}] ", index + 1), Style::ListNumber),
                    StyledSpan::new(
                        format!("{} ({line_count} lines{state}) ", view.descriptor.language),
                        Style::Answer,
                    ),
                    StyledSpan::new(copy.label(index), Style::CopyLabel),
                ],
            }
        })
        .collect()
}

/// Repaints a streaming answer.
pub struct LiveView<W: Write> {
    out: W,
    mode: ViewMode,
    width: usize,
    /// Terminal columns, for counting soft-wrapped rows.
    columns: usize,
    tree: RenderTree,
    /// Lines currently on screen for this answer (Ansi).
    painted: Vec<StyledLine>,
    /// Bytes of answer text already written (Plain).
    printed: usize,
}

impl<W: Write> LiveView<W> {
    pub fn new(out: W, mode: ViewMode, width: usize) -> Self {
        Self {
            out,
            mode,
            width,
            columns: width,
            tree: RenderTree::default(),
            painted: Vec::new(),
            printed: 0,
        }
    }

    /// Tree of the most recent update.
    pub fn tree(&self) -> &RenderTree {
        &self.tree
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    /// Render width for the next update.
    pub fn set_width(&mut self, width: usize) {
        self.width = width;
    }

    /// Terminal columns; code lines are not wrapped by the renderer and may
    /// still span several rows.
    pub fn set_columns(&mut self, columns: usize) {
        self.columns = columns;
    }

    /// Starts a new answer below whatever is on screen.
    pub fn begin(&mut self) {
        self.tree = RenderTree::default();
        self.painted.clear();
        self.printed = 0;
    }

    /// Re-renders `text` and brings the screen up to date.
    ///
    /// # Errors
    /// Returns an error if writing to the output fails.
    pub fn update(&mut self, text: &str, copy: &mut CopyStates) -> io::Result<()> {
        match self.mode {
            ViewMode::Ansi => {
                self.tree = render(text, self.width);
                copy.sync(self.tree.code_block_count());
                self.paint(copy)
            }
            ViewMode::Plain => {
                let fresh = text.get(self.printed..).unwrap_or(text);
                self.out.write_all(fresh.as_bytes())?;
                self.printed = text.len();
                self.out.flush()
            }
        }
    }

    /// Final update for an answer; leaves the cursor on a fresh line.
    ///
    /// # Errors
    /// Returns an error if writing to the output fails.
    pub fn finish(&mut self, text: &str, copy: &mut CopyStates) -> io::Result<()> {
        if self.mode == ViewMode::Plain {
            self.tree = render(text, self.width);
            copy.sync(self.tree.code_block_count());
        }
        self.update(text, copy)?;
        if self.mode == ViewMode::Plain && !text.is_empty() && !text.ends_with('\n') {
            self.out.write_all(b"\n")?;
        }
        self.out.flush()
    }

    /// Applies one accumulator notification.
    ///
    /// # Errors
    /// Returns an error if writing to the output fails.
    pub fn apply(&mut self, update: &AnswerUpdate, copy: &mut CopyStates) -> io::Result<()> {
        match update.kind {
            UpdateKind::Reset => {
                self.begin();
                copy.clear();
                Ok(())
            }
            UpdateKind::Appended => self.update(&update.text, copy),
            UpdateKind::Finalized => self.finish(&update.text, copy),
        }
    }

    /// Writes a line outside the answer area (status, errors).
    ///
    /// # Errors
    /// Returns an error if writing to the output fails.
    pub fn notice(&mut self, line: &StyledLine) -> io::Result<()> {
        self.write_line(line)?;
        self.out.flush()
    }

    fn paint(&mut self, copy: &CopyStates) -> io::Result<()> {
        let lines = layout(&self.tree, copy);
        let keep = self
            .painted
            .iter()
            .zip(&lines)
            .take_while(|(old, new)| old == new)
            .count();

        let stale_rows: usize = self.painted[keep..]
            .iter()
            .map(|line| self.rows_for(line))
            .sum();
        if stale_rows > 0 {
            let up = u16::try_from(stale_rows).unwrap_or(u16::MAX);
            queue!(self.out, cursor::MoveUp(up))?;
        }
        queue!(
            self.out,
            cursor::MoveToColumn(0),
            terminal::Clear(terminal::ClearType::FromCursorDown)
        )?;

        for line in &lines[keep..] {
            self.write_line(line)?;
        }
        self.painted = lines;
        self.out.flush()
    }

    /// Terminal rows a painted line occupies (long code lines soft-wrap).
    fn rows_for(&self, line: &StyledLine) -> usize {
        if self.columns == 0 {
            return 1;
        }
        let width = line.plain_text().width();
        width.div_ceil(self.columns).max(1)
    }

    fn write_line(&mut self, line: &StyledLine) -> io::Result<()> {
        match self.mode {
            ViewMode::Ansi => {
                for span in &line.spans {
                    queue!(
                        self.out,
                        PrintStyledContent(StyledContent::new(
                            content_style(span.style),
                            span.text.as_str()
                        ))
                    )?;
                }
                self.out.write_all(b"\r\n")
            }
            ViewMode::Plain => {
                writeln!(self.out, "{}", line.plain_text())
            }
        }
    }
}

/// Terminal attributes for a semantic style.
fn content_style(style: Style) -> ContentStyle {
    let base = ContentStyle::new();
    match style {
        Style::Plain | Style::Answer => base,
        Style::CodeInline => base.with(Color::Cyan),
        Style::CodeBlock => base.with(Color::Grey),
        Style::CodeFence | Style::Rule | Style::CopyLabel => base.with(Color::DarkGrey),
        Style::Syntax(r, g, b) => base.with(Color::Rgb { r, g, b }),
        Style::CopyLabelActive => base.with(Color::Green).bold(),
        Style::Emphasis => base.italic(),
        Style::Strong => base.bold(),
        Style::H1 => base.with(Color::Magenta).bold().underlined(),
        Style::H2 => base.with(Color::Magenta).bold(),
        Style::H3 => base.with(Color::Blue).bold(),
        Style::Link => base.with(Color::Blue).underlined(),
        Style::BlockQuote => base.with(Color::DarkGrey).italic(),
        Style::ListBullet | Style::ListNumber => base.with(Color::Yellow),
        Style::Notice => base.with(Color::DarkGrey),
    }
}
