use std::ops::Range;

use comfy_table::{ContentArrangement, Table};
use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, LinkType, Options, Parser, Tag, TagEnd};
use unicode_width::UnicodeWidthStr;

use super::highlight::{PLAIN_TEXT, detect_language, highlight_code};
use super::wrap::{WrapOptions, wrap_styled_spans};
use crate::style::{Style, StyledLine, StyledSpan};

/// Language and exact contents of one fenced code block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlockDescriptor {
    /// Highlighter language, `"text"` when untagged or unknown.
    pub language: String,
    /// Block contents as written, including the final newline if present.
    pub raw_text: String,
}

/// A code block as it appears in the rendered answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlockView {
    pub descriptor: CodeBlockDescriptor,
    /// False while the closing fence has not arrived yet.
    pub closed: bool,
    /// Highlighted lines, unwrapped.
    pub lines: Vec<StyledLine>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderBlock {
    Markdown(Vec<StyledLine>),
    Code(CodeBlockView),
}

/// Declarative view of an answer: prose segments interleaved with code blocks.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderTree {
    blocks: Vec<RenderBlock>,
}

impl RenderTree {
    pub fn blocks(&self) -> &[RenderBlock] {
        &self.blocks
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Code blocks in document order.
    pub fn code_blocks(&self) -> Vec<&CodeBlockDescriptor> {
        self.code_views().map(|view| &view.descriptor).collect()
    }

    pub fn code_block(&self, index: usize) -> Option<&CodeBlockView> {
        self.code_views().nth(index)
    }

    pub fn code_block_count(&self) -> usize {
        self.code_views().count()
    }

    fn code_views(&self) -> impl Iterator<Item = &CodeBlockView> {
        self.blocks.iter().filter_map(|block| match block {
            RenderBlock::Code(view) => Some(view),
            RenderBlock::Markdown(_) => None,
        })
    }
}

/// Renders answer text into a `RenderTree`.
///
/// Pure: the same text and width always produce the same tree. Safe to call
/// on any prefix of a streaming answer, including one that stops inside a
/// fence or a multi-byte token boundary of the Markdown syntax.
pub fn render(text: &str, width: usize) -> RenderTree {
    if text.is_empty() {
        return RenderTree::default();
    }

    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    let parser = Parser::new_ext(text, options).into_offset_iter();
    let mut renderer = MarkdownRenderer::new(text, width);

    for (event, range) in parser {
        renderer.process_event(event, range);
    }

    renderer.finish()
}

/// Simple table buffer using comfy-table for rendering.
#[derive(Debug, Clone, Default)]
struct TableBuffer {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
    current_row: Vec<String>,
    current_cell: String,
}

impl TableBuffer {
    fn clear(&mut self) {
        self.header.clear();
        self.rows.clear();
        self.current_row.clear();
        self.current_cell.clear();
    }

    fn finish_cell(&mut self) {
        let cell = std::mem::take(&mut self.current_cell);
        self.current_row.push(cell.trim().to_string());
    }

    fn finish_row(&mut self, is_header: bool) {
        let row = std::mem::take(&mut self.current_row);
        if is_header {
            self.header = row;
        } else {
            self.rows.push(row);
        }
    }

    fn render(&self, max_width: usize) -> Vec<String> {
        let mut table = Table::new();
        table.set_content_arrangement(ContentArrangement::Dynamic);
        if max_width > 0 {
            table.set_width(u16::try_from(max_width).unwrap_or(u16::MAX));
        }

        if !self.header.is_empty() {
            table.set_header(&self.header);
        }
        for row in &self.rows {
            table.add_row(row);
        }

        table.to_string().lines().map(String::from).collect()
    }
}

#[derive(Debug, Clone)]
struct ListState {
    /// None for unordered, Some(n) for ordered starting at n.
    ordered: Option<u64>,
    current_item: u64,
    /// Display width of this list's marker, for continuation indent.
    marker_width: usize,
}

/// Code block being collected between its start and end events.
#[derive(Debug)]
struct PendingCode {
    language: String,
    raw: String,
    closed: bool,
}

struct MarkdownRenderer<'a> {
    source: &'a str,
    width: usize,
    blocks: Vec<RenderBlock>,
    /// Lines of the prose segment since the last code block.
    lines: Vec<StyledLine>,
    current_spans: Vec<StyledSpan>,
    style_stack: Vec<Style>,
    code: Option<PendingCode>,
    list_stack: Vec<ListState>,
    /// Set at the start of a list item until its first line is emitted.
    marker_pending: bool,
    quote_depth: usize,
    link_targets: Vec<Option<String>>,
    in_table: bool,
    in_table_head: bool,
    table: TableBuffer,
}

impl<'a> MarkdownRenderer<'a> {
    fn new(source: &'a str, width: usize) -> Self {
        Self {
            source,
            width,
            blocks: Vec::new(),
            lines: Vec::new(),
            current_spans: Vec::new(),
            style_stack: vec![Style::Answer],
            code: None,
            list_stack: Vec::new(),
            marker_pending: false,
            quote_depth: 0,
            link_targets: Vec::new(),
            in_table: false,
            in_table_head: false,
            table: TableBuffer::default(),
        }
    }

    fn current_style(&self) -> Style {
        self.style_stack.last().copied().unwrap_or(Style::Answer)
    }

    fn push_style(&mut self, style: Style) {
        self.style_stack.push(style);
    }

    fn pop_style(&mut self) {
        if self.style_stack.len() > 1 {
            self.style_stack.pop();
        }
    }

    fn process_event(&mut self, event: Event, range: Range<usize>) {
        match event {
            Event::Start(tag) => self.start_tag(tag, range),
            Event::End(tag) => self.end_tag(tag),
            Event::Text(text) => self.add_text(&text),
            Event::Code(code) => self.add_inline_code(&code),
            Event::SoftBreak => self.add_break(" "),
            Event::HardBreak => self.add_break("\n"),
            // Raw HTML is never forwarded to the terminal.
            Event::Html(_) | Event::InlineHtml(_) | Event::FootnoteReference(_) => {}
            Event::TaskListMarker(checked) => {
                let marker = if checked { "[x] " } else { "[ ] " };
                self.current_spans
                    .push(StyledSpan::new(marker, Style::ListBullet));
            }
            Event::Rule => {
                self.flush_paragraph();
                let len = if self.width == 0 { 40 } else { self.width.min(40) };
                self.lines
                    .push(StyledLine::from_span("─".repeat(len), Style::Rule));
                self.lines.push(StyledLine::empty());
            }
            Event::InlineMath(math) | Event::DisplayMath(math) => self.add_text(&math),
        }
    }

    fn start_tag(&mut self, tag: Tag, range: Range<usize>) {
        match tag {
            Tag::Heading { level, .. } => {
                self.flush_paragraph();
                let style = match level {
                    HeadingLevel::H1 => Style::H1,
                    HeadingLevel::H2 => Style::H2,
                    _ => Style::H3,
                };
                self.push_style(style);
            }
            Tag::CodeBlock(kind) => {
                self.flush_paragraph();
                let (language, closed) = match kind {
                    CodeBlockKind::Fenced(info) => (
                        detect_language(&info),
                        self.source.get(range).is_some_and(fence_is_closed),
                    ),
                    CodeBlockKind::Indented => (PLAIN_TEXT.to_string(), true),
                };
                self.code = Some(PendingCode {
                    language,
                    raw: String::new(),
                    closed,
                });
            }
            Tag::List(start) => {
                self.flush_paragraph();
                let marker_width = match start {
                    Some(n) => format!("{n}. ").width(),
                    None => "• ".width(),
                };
                self.list_stack.push(ListState {
                    ordered: start,
                    current_item: start.unwrap_or(1),
                    marker_width,
                });
            }
            Tag::Item => {
                self.flush_paragraph();
                self.marker_pending = true;
            }
            Tag::BlockQuote(_) => {
                self.flush_paragraph();
                self.quote_depth += 1;
                self.push_style(Style::BlockQuote);
            }
            Tag::Emphasis => self.push_style(Style::Emphasis),
            Tag::Strong => self.push_style(Style::Strong),
            Tag::Link {
                link_type,
                dest_url,
                ..
            } => {
                let shown = !matches!(link_type, LinkType::Autolink | LinkType::Email)
                    && !dest_url.is_empty();
                self.link_targets.push(shown.then(|| dest_url.to_string()));
                self.push_style(Style::Link);
            }
            Tag::Table(_) => {
                self.flush_paragraph();
                self.in_table = true;
                self.table.clear();
            }
            Tag::TableHead => self.in_table_head = true,
            Tag::TableCell => self.table.current_cell.clear(),
            Tag::Strikethrough | Tag::Superscript | Tag::Subscript => {
                self.push_style(Style::Plain);
            }
            _ => {}
        }
    }

    fn end_tag(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => {
                self.flush_paragraph();
                if self.list_stack.is_empty() {
                    self.lines.push(StyledLine::empty());
                }
            }
            TagEnd::Heading(_) => {
                self.flush_paragraph();
                self.pop_style();
                self.lines.push(StyledLine::empty());
            }
            TagEnd::CodeBlock => self.close_code_block(),
            TagEnd::List(_) => {
                self.list_stack.pop();
                if self.list_stack.is_empty() {
                    self.lines.push(StyledLine::empty());
                }
            }
            TagEnd::Item => {
                self.flush_paragraph();
                self.marker_pending = false;
                if let Some(list) = self.list_stack.last_mut() {
                    list.current_item += 1;
                }
            }
            TagEnd::BlockQuote(_) => {
                self.flush_paragraph();
                self.quote_depth = self.quote_depth.saturating_sub(1);
                self.pop_style();
            }
            TagEnd::Link => {
                if let Some(Some(url)) = self.link_targets.pop() {
                    self.current_spans
                        .push(StyledSpan::new(format!(" ({url})"), Style::Link));
                }
                self.pop_style();
            }
            TagEnd::Emphasis
            | TagEnd::Strong
            | TagEnd::Strikethrough
            | TagEnd::Superscript
            | TagEnd::Subscript => self.pop_style(),
            TagEnd::Table => {
                self.flush_table();
                self.in_table = false;
                self.lines.push(StyledLine::empty());
            }
            TagEnd::TableHead => {
                self.table.finish_row(true);
                self.in_table_head = false;
            }
            TagEnd::TableRow => {
                if !self.in_table_head {
                    self.table.finish_row(false);
                }
            }
            TagEnd::TableCell => self.table.finish_cell(),
            _ => {}
        }
    }

    fn add_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(code) = self.code.as_mut() {
            code.raw.push_str(text);
            return;
        }
        if self.in_table {
            self.table.current_cell.push_str(&text.replace('\n', " "));
            return;
        }
        let style = self.current_style();
        self.current_spans.push(StyledSpan::new(text, style));
    }

    fn add_inline_code(&mut self, code: &str) {
        if self.in_table {
            let code = code.replace('\n', " ");
            self.table.current_cell.push_str(&format!("`{code}`"));
            return;
        }
        self.current_spans
            .push(StyledSpan::new(code, Style::CodeInline));
    }

    fn add_break(&mut self, text: &str) {
        if self.in_table {
            self.table.current_cell.push(' ');
            return;
        }
        let style = self.current_style();
        self.current_spans.push(StyledSpan::new(text, style));
    }

    /// Prefixes for the next wrapped block: quote bars, then list indent.
    fn wrap_options(&mut self) -> WrapOptions {
        let quote: Vec<StyledSpan> = (0..self.quote_depth)
            .map(|_| StyledSpan::new("│ ", Style::BlockQuote))
            .collect();
        let mut first_prefix = quote.clone();
        let mut rest_prefix = quote;

        if let Some(list) = self.list_stack.last() {
            let indent = "  ".repeat(self.list_stack.len() - 1);
            let hanging = format!("{indent}{}", " ".repeat(list.marker_width));
            if self.marker_pending {
                let (marker, style) = match list.ordered {
                    Some(_) => (format!("{}. ", list.current_item), Style::ListNumber),
                    None => ("• ".to_string(), Style::ListBullet),
                };
                first_prefix.push(StyledSpan::new(indent, Style::Plain));
                first_prefix.push(StyledSpan::new(marker, style));
                self.marker_pending = false;
            } else {
                first_prefix.push(StyledSpan::new(hanging.clone(), Style::Plain));
            }
            rest_prefix.push(StyledSpan::new(hanging, Style::Plain));
        }

        WrapOptions {
            width: self.width,
            first_prefix,
            rest_prefix,
        }
    }

    fn flush_paragraph(&mut self) {
        if self.current_spans.is_empty() {
            return;
        }
        let spans = std::mem::take(&mut self.current_spans);
        let opts = self.wrap_options();
        self.lines.extend(wrap_styled_spans(&spans, &opts));
    }

    fn flush_table(&mut self) {
        for line in self.table.render(self.width) {
            self.lines.push(StyledLine::from_span(line, Style::Answer));
        }
        self.table.clear();
    }

    /// Ends the current prose segment, dropping trailing blank lines.
    fn close_segment(&mut self) {
        while self.lines.last().is_some_and(StyledLine::is_empty) {
            self.lines.pop();
        }
        if !self.lines.is_empty() {
            let lines = std::mem::take(&mut self.lines);
            self.blocks.push(RenderBlock::Markdown(lines));
        }
    }

    fn close_code_block(&mut self) {
        let Some(code) = self.code.take() else {
            return;
        };
        self.close_segment();
        let lines = highlight_code(&code.raw, &code.language);
        self.blocks.push(RenderBlock::Code(CodeBlockView {
            descriptor: CodeBlockDescriptor {
                language: code.language,
                raw_text: code.raw,
            },
            closed: code.closed,
            lines,
        }));
    }

    fn finish(mut self) -> RenderTree {
        if self.code.is_some() {
            self.close_code_block();
        }
        self.flush_paragraph();
        self.close_segment();
        RenderTree {
            blocks: self.blocks,
        }
    }
}

/// Whether the source of a fenced block ends with a matching closing fence.
fn fence_is_closed(block: &str) -> bool {
    fn strip_container(line: &str) -> &str {
        line.trim_start_matches(|c: char| c == '>' || c.is_whitespace())
    }

    let mut lines = block.lines();
    let Some(opening) = lines.next().map(strip_container) else {
        return false;
    };
    let Some(fence_char) = opening.chars().next().filter(|c| matches!(c, '`' | '~')) else {
        return false;
    };
    let fence_len = opening.chars().take_while(|c| *c == fence_char).count();

    let Some(closing) = lines.last().map(|line| strip_container(line).trim_end()) else {
        return false;
    };
    closing.chars().all(|c| c == fence_char) && closing.chars().count() >= fence_len
}
