//! Lesson document to Markdown writer
//!
//! Produces CommonMark with the GFM strikethrough and table extensions.
//! Everything the writer emits reads back through [`crate::reader`] into a
//! document that writes out to the same string again.

use lesson_doc::{
    Blockquote, CodeBlock, DocError, Document, Heading, Image, List, Mark, Node, SLIDE_MARKER,
    Slide, Table, is_slide_marker, plain_text,
};

/// Options for the Markdown writer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriterOptions {
    /// Drop slide marker paragraphs instead of writing `<!-- Slide -->` lines
    pub strip_slide_markers: bool,
}

/// Markdown output and the constructs that had no Markdown form
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Serialized {
    pub markdown: String,
    /// Node and mark type names written as bare content, in first-seen order
    pub unsupported: Vec<String>,
}

/// Convert a document to Markdown
pub fn doc_to_markdown(doc: &Document, options: &WriterOptions) -> String {
    serialize(doc, options).markdown
}

/// Convert a document to Markdown, reporting unsupported node and mark types
pub fn serialize(doc: &Document, options: &WriterOptions) -> Serialized {
    let mut writer = Writer::new(options);
    let markdown = writer.write_root(doc.content());
    Serialized {
        markdown,
        unsupported: writer.unsupported,
    }
}

/// Convert the nodes of one slide to Markdown
pub fn slide_to_markdown(slide: &Slide<'_>, options: &WriterOptions) -> String {
    Writer::new(options).write_root(slide.iter())
}

/// Parse a stored JSON document and convert it to Markdown
pub fn json_to_markdown(json: &str, options: &WriterOptions) -> Result<String, DocError> {
    let doc = Document::from_json(json)?;
    Ok(doc_to_markdown(&doc, options))
}

/// Markdown writer state
struct Writer<'a> {
    options: &'a WriterOptions,
    unsupported: Vec<String>,
}

impl<'a> Writer<'a> {
    fn new(options: &'a WriterOptions) -> Self {
        Self {
            options,
            unsupported: Vec::new(),
        }
    }

    fn write_root<'n>(&mut self, nodes: impl IntoIterator<Item = &'n Node>) -> String {
        let mut output = self.write_blocks(nodes);
        if !output.is_empty() {
            output.push('\n');
        }
        output
    }

    /// Blocks separated by one blank line, without a trailing newline
    fn write_blocks<'n>(&mut self, nodes: impl IntoIterator<Item = &'n Node>) -> String {
        let mut blocks: Vec<String> = Vec::new();
        let mut inline: Vec<&'n Node> = Vec::new();
        let mut lists: Vec<&'n List> = Vec::new();

        for node in nodes {
            if node.is_inline() {
                self.flush_lists(&mut lists, &mut blocks);
                inline.push(node);
                continue;
            }
            self.flush_inline(&mut inline, &mut blocks);

            if let Some(list) = node.as_list() {
                // Neighbouring lists of one family read back as a single list
                if lists
                    .last()
                    .is_some_and(|prev| prev.kind.is_ordered() != list.kind.is_ordered())
                {
                    self.flush_lists(&mut lists, &mut blocks);
                }
                lists.push(list);
                continue;
            }

            let block = self.write_block(node);
            if block.is_empty() {
                continue;
            }
            self.flush_lists(&mut lists, &mut blocks);
            blocks.push(block);
        }
        self.flush_inline(&mut inline, &mut blocks);
        self.flush_lists(&mut lists, &mut blocks);

        blocks.retain(|b| !b.is_empty());
        blocks.join("\n\n")
    }

    fn flush_inline(&mut self, inline: &mut Vec<&Node>, blocks: &mut Vec<String>) {
        if !inline.is_empty() {
            blocks.push(self.write_inline(inline.iter().copied(), InlineCtx::Paragraph));
            inline.clear();
        }
    }

    fn flush_lists(&mut self, lists: &mut Vec<&List>, blocks: &mut Vec<String>) {
        if !lists.is_empty() {
            blocks.push(self.write_lists(lists));
            lists.clear();
        }
    }

    fn write_block(&mut self, node: &Node) -> String {
        match node {
            Node::Paragraph(p) => {
                if !is_slide_marker(node) {
                    self.write_inline(&p.content, InlineCtx::Paragraph)
                } else if self.options.strip_slide_markers {
                    let content = without_slide_marker(&p.content);
                    self.write_inline(&content, InlineCtx::Paragraph)
                } else if plain_text(&p.content).trim() == SLIDE_MARKER {
                    SLIDE_MARKER.to_string()
                } else {
                    // Text around the marker stays; the escaped `<` keeps the
                    // marker literal so the paragraph still splits slides
                    self.write_inline(&p.content, InlineCtx::Paragraph)
                }
            }
            Node::Heading(h) => self.write_heading(h),
            Node::List(l) | Node::BulletList(l) | Node::OrderedList(l) => self.write_lists(&[l]),
            Node::ListItem(li) => self.write_blocks(&li.content),
            Node::CodeBlock(c) => write_code_block(c),
            Node::Blockquote(b) => self.write_blockquote(b),
            Node::HorizontalRule(hr) => rule_markup(hr.markup.as_deref()),
            Node::Table(t) => self.write_table(t),
            Node::TableRow(_) | Node::TableCell(_) => self.write_blocks(node.children()),
            Node::Image(img) => image_markdown(img, InlineCtx::Paragraph),
            Node::Text(_) | Node::HardBreak => self.write_inline([node], InlineCtx::Paragraph),
            Node::Unknown(u) => {
                self.record_unsupported(&u.type_name);
                self.write_blocks(&u.content)
            }
        }
    }

    fn write_heading(&mut self, h: &Heading) -> String {
        let hashes = "#".repeat(usize::from(h.effective_level()));
        let mut text = self.write_inline(&h.content, InlineCtx::Heading);
        // A trailing `#` run would be taken as the closing sequence
        if ends_with_unescaped(&text, '#') {
            text.insert(text.len() - 1, '\\');
        }
        if text.is_empty() {
            hashes
        } else {
            format!("{} {}", hashes, text)
        }
    }

    fn write_blockquote(&mut self, b: &Blockquote) -> String {
        let inner = self.write_blocks(&b.content);
        if inner.is_empty() {
            return ">".to_string();
        }
        inner
            .lines()
            .map(|line| {
                if line.is_empty() {
                    ">".to_string()
                } else {
                    format!("> {}", line)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Write consecutive lists of one family as a single Markdown list
    fn write_lists(&mut self, lists: &[&List]) -> String {
        let Some(first) = lists.first() else {
            return String::new();
        };
        let ordered = first.kind.is_ordered();
        let mut number = first.first_number();

        let mut items = Vec::new();
        for child in lists.iter().flat_map(|l| &l.content) {
            let marker = if ordered {
                let marker = format!("{}. ", number);
                number = number.saturating_add(1);
                marker
            } else {
                "- ".to_string()
            };
            let mut body = match child {
                Node::ListItem(li) => self.write_item(&li.content),
                other => self.write_blocks([other]),
            };
            // `- ---` is a thematic break, not an item holding one
            if !ordered {
                let first_line = body.lines().next().unwrap_or_default();
                if first_line.len() >= 3 && first_line.bytes().all(|b| b == b'-') {
                    let len = first_line.len();
                    body.replace_range(..len, &"*".repeat(len));
                }
            }
            items.push(indent_item(&marker, &body));
        }
        items.join("\n")
    }

    /// List item content; a leading paragraph followed only by lists stays tight
    fn write_item(&mut self, content: &[Node]) -> String {
        if let [first @ Node::Paragraph(_), rest @ ..] = content {
            if !rest.is_empty() && rest.iter().all(|n| n.as_list().is_some()) {
                let head = self.write_block(first);
                let tail = self.write_blocks(rest);
                // Only markers that may interrupt a paragraph can follow it directly
                let interrupts = tail
                    .lines()
                    .next()
                    .is_some_and(|l| l.starts_with("- ") || l.starts_with("1. "));
                return match (head.is_empty(), tail.is_empty()) {
                    (true, _) => tail,
                    (_, true) => head,
                    _ if interrupts => format!("{}\n{}", head, tail),
                    _ => format!("{}\n\n{}", head, tail),
                };
            }
        }
        self.write_blocks(content)
    }

    fn write_table(&mut self, table: &Table) -> String {
        let mut rows: Vec<Vec<String>> = Vec::new();
        for row in &table.content {
            if let Node::Unknown(u) = row {
                self.record_unsupported(&u.type_name);
            }
            let mut cells = Vec::new();
            for cell in row.children() {
                if let Node::Unknown(u) = cell {
                    self.record_unsupported(&u.type_name);
                }
                cells.push(self.write_inline(cell.children(), InlineCtx::TableCell));
            }
            rows.push(cells);
        }

        let num_cols = rows.iter().map(Vec::len).max().unwrap_or(0);
        if num_cols == 0 {
            return String::new();
        }

        let mut lines = Vec::with_capacity(rows.len() + 1);
        for (i, cells) in rows.iter().enumerate() {
            lines.push(table_row(cells, num_cols));
            // The first row is always the header
            if i == 0 {
                lines.push(format!("|{}", " --- |".repeat(num_cols)));
            }
        }
        lines.join("\n")
    }

    fn write_inline<'n>(&mut self, nodes: impl IntoIterator<Item = &'n Node>, ctx: InlineCtx) -> String {
        let mut items = Vec::new();
        self.collect_inline(nodes, &mut items);

        let mut inline = InlineWriter::new(ctx);
        for item in &items {
            inline.write_item(item);
        }
        inline.finish()
    }

    /// Flatten inline content, merging adjacent text runs with equal marks
    fn collect_inline<'n>(
        &mut self,
        nodes: impl IntoIterator<Item = &'n Node>,
        items: &mut Vec<Item<'n>>,
    ) {
        for node in nodes {
            match node {
                Node::Text(t) => {
                    let mut marks = Vec::new();
                    for mark in t.nesting_marks() {
                        match mark {
                            Mark::Unknown { name, .. } => self.record_unsupported(name),
                            known => marks.push(known),
                        }
                    }
                    let text = t.text.replace(['\n', '\r'], " ");
                    let merges = matches!(
                        items.last(),
                        Some(Item::Text { marks: prev, .. }) if *prev == marks
                    );
                    if merges {
                        if let Some(Item::Text { text: prev, .. }) = items.last_mut() {
                            prev.push_str(&text);
                        }
                    } else {
                        items.push(Item::Text { text, marks });
                    }
                }
                Node::HardBreak => items.push(Item::Break),
                Node::Image(img) => items.push(Item::Image(img)),
                Node::Unknown(u) => {
                    self.record_unsupported(&u.type_name);
                    self.collect_inline(&u.content, items);
                }
                block => {
                    push_space(items);
                    self.collect_inline(block.children(), items);
                    push_space(items);
                }
            }
        }
    }

    fn record_unsupported(&mut self, name: &str) {
        if !self.unsupported.iter().any(|n| n == name) {
            log::warn!("`{}` has no Markdown form; writing its content only", name);
            self.unsupported.push(name.to_string());
        }
    }
}

/// Where inline content is being written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InlineCtx {
    Paragraph,
    Heading,
    TableCell,
}

/// Flattened inline content
#[derive(Debug)]
enum Item<'n> {
    Text { text: String, marks: Vec<&'n Mark> },
    Break,
    Image(&'n Image),
    /// Separator between flattened blocks
    Space,
}

fn push_space(items: &mut Vec<Item<'_>>) {
    if !items.is_empty() && !matches!(items.last(), Some(Item::Space)) {
        items.push(Item::Space);
    }
}

/// Mark written with a delimiter run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Emphasis {
    Strong,
    Em,
    Strike,
}

impl Emphasis {
    fn of(mark: &Mark) -> Option<Self> {
        match mark {
            Mark::Bold => Some(Emphasis::Strong),
            Mark::Italic => Some(Emphasis::Em),
            Mark::Strike => Some(Emphasis::Strike),
            _ => None,
        }
    }

    fn delimiter(self) -> &'static str {
        match self {
            Emphasis::Strong => "**",
            Emphasis::Em => "*",
            Emphasis::Strike => "~~",
        }
    }

    fn delimiter_char(self) -> char {
        match self {
            Emphasis::Strong | Emphasis::Em => '*',
            Emphasis::Strike => '~',
        }
    }

    fn tag(self, opening: bool) -> &'static str {
        match (self, opening) {
            (Emphasis::Strong, true) => "<strong>",
            (Emphasis::Strong, false) => "</strong>",
            (Emphasis::Em, true) => "<em>",
            (Emphasis::Em, false) => "</em>",
            (Emphasis::Strike, true) => "<del>",
            (Emphasis::Strike, false) => "</del>",
        }
    }
}

/// Delimiter pair in the inline output, by byte offset
#[derive(Debug)]
struct EmphasisSpan {
    kind: Emphasis,
    open: usize,
    close: Option<usize>,
    /// Written as HTML tags because a delimiter would not flank
    html: bool,
}

/// Inline writer state
///
/// Marks shared by neighbouring runs stay open; whitespace at the edge of a
/// run is held back and written outside any delimiter that opens or closes
/// next to it. Emphasis delimiters are written as `**`, `*` and `~~` and
/// checked against the flanking rules once the whole run of content is out.
struct InlineWriter<'n> {
    ctx: InlineCtx,
    output: String,
    /// Open marks, outermost first, with their emphasis span if any
    open: Vec<(&'n Mark, Option<usize>)>,
    spans: Vec<EmphasisSpan>,
    /// Content of the open code span
    code: Option<String>,
    pending_space: String,
    pending_break: bool,
}

impl<'n> InlineWriter<'n> {
    fn new(ctx: InlineCtx) -> Self {
        Self {
            ctx,
            output: String::new(),
            open: Vec::new(),
            spans: Vec::new(),
            code: None,
            pending_space: String::new(),
            pending_break: false,
        }
    }

    fn write_item(&mut self, item: &Item<'n>) {
        match item {
            Item::Text { text, marks } => self.write_text(text, marks),
            Item::Break => {
                self.pending_space.clear();
                self.close_all();
                self.pending_break = true;
            }
            Item::Image(img) => {
                self.flush_break();
                self.transition(&[]);
                self.output.push_str(&image_markdown(img, self.ctx));
            }
            Item::Space => self.pending_space.push(' '),
        }
    }

    fn write_text(&mut self, text: &str, marks: &[&'n Mark]) {
        let core = text.trim();
        if core.is_empty() {
            self.pending_space.push_str(text);
            return;
        }
        let lead = &text[..text.len() - text.trim_start().len()];
        let trail = &text[lead.len() + core.len()..];

        self.flush_break();
        self.pending_space.push_str(lead);
        self.transition(marks);

        let line_start = self.at_line_start();
        match &mut self.code {
            Some(code) => code.push_str(core),
            None => self
                .output
                .push_str(&escape_text(core, line_start, self.ctx)),
        }
        self.pending_space = trail.to_string();
    }

    /// Close marks not in `target`, write held whitespace, open the rest
    fn transition(&mut self, target: &[&'n Mark]) {
        let common = self
            .open
            .iter()
            .zip(target)
            .take_while(|((open, _), wanted)| open == *wanted)
            .count();
        while self.open.len() > common {
            if let Some((mark, span)) = self.open.pop() {
                self.close_mark(mark, span);
            }
        }

        let space = std::mem::take(&mut self.pending_space);
        if !self.at_line_start() {
            match &mut self.code {
                Some(code) => code.push_str(&space),
                None => self.output.push_str(&space),
            }
        }

        for &mark in &target[common..] {
            let span = self.open_mark(mark);
            self.open.push((mark, span));
        }
    }

    fn flush_break(&mut self) {
        if !std::mem::take(&mut self.pending_break) || self.output.is_empty() {
            return;
        }
        match self.ctx {
            InlineCtx::Paragraph => {
                trim_end_spaces(&mut self.output);
                self.output.push_str("  \n");
                self.pending_space.clear();
            }
            // Headings are a single line
            InlineCtx::Heading => self.pending_space.push(' '),
            InlineCtx::TableCell => {
                trim_end_spaces(&mut self.output);
                self.output.push_str("<br>");
            }
        }
    }

    fn at_line_start(&self) -> bool {
        self.code.is_none() && (self.output.is_empty() || self.output.ends_with('\n'))
    }

    /// Write the opening syntax; emphasis returns the index of its span
    fn open_mark(&mut self, mark: &Mark) -> Option<usize> {
        if let Some(kind) = Emphasis::of(mark) {
            self.spans.push(EmphasisSpan {
                kind,
                open: self.output.len(),
                close: None,
                html: false,
            });
            self.output.push_str(kind.delimiter());
            return Some(self.spans.len() - 1);
        }
        match mark {
            Mark::Underline => self.output.push_str("<u>"),
            Mark::Code => self.code = Some(String::new()),
            Mark::Link(_) => self.output.push('['),
            Mark::Bold | Mark::Italic | Mark::Strike | Mark::Unknown { .. } => {}
        }
        None
    }

    fn close_mark(&mut self, mark: &Mark, span: Option<usize>) {
        if let Some(span) = span.and_then(|i| self.spans.get_mut(i)) {
            span.close = Some(self.output.len());
            self.output.push_str(span.kind.delimiter());
            return;
        }
        match mark {
            Mark::Underline => self.output.push_str("</u>"),
            Mark::Code => {
                if let Some(code) = self.code.take() {
                    self.output.push_str(&code_span(&code, self.ctx));
                }
            }
            Mark::Link(link) => {
                self.output.push_str("](");
                self.output
                    .push_str(&link_target(&link.href, link.title.as_deref()));
                self.output.push(')');
            }
            Mark::Bold | Mark::Italic | Mark::Strike | Mark::Unknown { .. } => {}
        }
    }

    fn close_all(&mut self) {
        while let Some((mark, span)) = self.open.pop() {
            self.close_mark(mark, span);
        }
    }

    fn finish(mut self) -> String {
        self.pending_space.clear();
        self.pending_break = false;
        self.close_all();
        resolve_emphasis(&self.output, &mut self.spans)
    }
}

/// Emphasis delimiter as placed in a rendering of the output
#[derive(Debug)]
struct Delimiter {
    start: usize,
    end: usize,
    ch: char,
    span: usize,
    opening: bool,
}

/// Rewrite emphasis spans whose delimiters CommonMark would read literally
///
/// A delimiter run opens only when left-flanking and closes only when
/// right-flanking. Spans failing either test are written with HTML tags,
/// which read back as the same marks. Switching a span can split a run it
/// shared with a neighbour, so the test repeats until nothing changes.
fn resolve_emphasis(output: &str, spans: &mut [EmphasisSpan]) -> String {
    loop {
        let (rendered, delimiters) = render_emphasis(output, spans);
        let mut changed = false;
        for (i, delimiter) in delimiters.iter().enumerate() {
            let span = &mut spans[delimiter.span];
            if !span.html && !flanks(&rendered, &delimiters, i) {
                span.html = true;
                changed = true;
            }
        }
        if !changed {
            return rendered;
        }
    }
}

fn render_emphasis(output: &str, spans: &[EmphasisSpan]) -> (String, Vec<Delimiter>) {
    let mut edges: Vec<(usize, usize, bool)> = Vec::with_capacity(spans.len() * 2);
    for (i, span) in spans.iter().enumerate() {
        edges.push((span.open, i, true));
        if let Some(close) = span.close {
            edges.push((close, i, false));
        }
    }
    edges.sort_unstable();

    let mut rendered = String::with_capacity(output.len());
    let mut delimiters = Vec::new();
    let mut copied = 0;
    for (pos, i, opening) in edges {
        let kind = spans[i].kind;
        rendered.push_str(&output[copied..pos]);
        let start = rendered.len();
        if spans[i].html {
            rendered.push_str(kind.tag(opening));
        } else {
            rendered.push_str(kind.delimiter());
            delimiters.push(Delimiter {
                start,
                end: rendered.len(),
                ch: kind.delimiter_char(),
                span: i,
                opening,
            });
        }
        copied = pos + kind.delimiter().len();
    }
    rendered.push_str(&output[copied..]);
    (rendered, delimiters)
}

/// Whether delimiter `i` can do its job, judged on the whole run it is part of
fn flanks(rendered: &str, delimiters: &[Delimiter], i: usize) -> bool {
    let ch = delimiters[i].ch;
    let (mut first, mut last) = (i, i);
    while first > 0
        && delimiters[first - 1].ch == ch
        && delimiters[first - 1].end == delimiters[first].start
    {
        first -= 1;
    }
    while last + 1 < delimiters.len()
        && delimiters[last + 1].ch == ch
        && delimiters[last + 1].start == delimiters[last].end
    {
        last += 1;
    }

    let before = rendered[..delimiters[first].start].chars().next_back();
    let after = rendered[delimiters[last].end..].chars().next();
    if delimiters[i].opening {
        left_flanking(before, after)
    } else {
        left_flanking(after, before)
    }
}

/// CommonMark left-flanking test; swapping the arguments gives right-flanking
fn left_flanking(before: Option<char>, after: Option<char>) -> bool {
    match after {
        None => false,
        Some(c) if c.is_whitespace() => false,
        Some(c) if is_punctuation(c) => {
            before.is_none_or(|b| b.is_whitespace() || is_punctuation(b))
        }
        Some(_) => true,
    }
}

fn is_punctuation(c: char) -> bool {
    c.is_ascii_punctuation() || (!c.is_ascii() && !c.is_alphanumeric() && !c.is_whitespace())
}

/// Paragraph content with every slide marker removed from its text
fn without_slide_marker(content: &[Node]) -> Vec<Node> {
    content
        .iter()
        .map(|node| match node {
            Node::Text(t) if t.text.contains(SLIDE_MARKER) => {
                Node::marked_text(t.text.replace(SLIDE_MARKER, ""), t.marks.clone())
            }
            other => other.clone(),
        })
        .collect()
}

/// Escape text so it reads back literally
///
/// `line_start` enables the escapes for block syntax that only matters at
/// the beginning of a paragraph line.
fn escape_text(text: &str, line_start: bool, ctx: InlineCtx) -> String {
    let line_start = line_start && ctx == InlineCtx::Paragraph;
    let marker_end = if line_start {
        ordered_marker_end(text)
    } else {
        None
    };

    let mut out = String::with_capacity(text.len());
    for (i, c) in text.char_indices() {
        let escape = match c {
            '\\' | '`' | '*' | '_' | '~' | '[' | ']' | '<' => true,
            '|' => ctx == InlineCtx::TableCell,
            '&' => looks_like_entity(&text[i..]),
            '#' | '-' | '+' | '>' | '=' => line_start && i == 0,
            '.' | ')' => marker_end == Some(i),
            _ => false,
        };
        if escape {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Byte index of the `.` or `)` closing a leading `12.` style list marker
fn ordered_marker_end(text: &str) -> Option<usize> {
    let digits = text.bytes().take_while(u8::is_ascii_digit).count();
    match text.as_bytes().get(digits) {
        Some(b'.' | b')') if digits > 0 => Some(digits),
        _ => None,
    }
}

/// Whether `s` (starting with `&`) begins with an entity or numeric reference
fn looks_like_entity(s: &str) -> bool {
    let body = &s[1..];
    let len = body
        .bytes()
        .take_while(|b| b.is_ascii_alphanumeric() || *b == b'#')
        .count();
    len > 0 && body.as_bytes().get(len) == Some(&b';')
}

fn ends_with_unescaped(text: &str, c: char) -> bool {
    let Some(rest) = text.strip_suffix(c) else {
        return false;
    };
    let backslashes = rest.chars().rev().take_while(|&ch| ch == '\\').count();
    backslashes % 2 == 0
}

fn trim_end_spaces(output: &mut String) {
    let len = output.trim_end_matches([' ', '\t']).len();
    output.truncate(len);
}

fn code_span(code: &str, ctx: InlineCtx) -> String {
    let code = if ctx == InlineCtx::TableCell {
        code.replace('|', "\\|")
    } else {
        code.to_string()
    };
    let ticks = "`".repeat(longest_backtick_run(&code) + 1);
    if code.starts_with('`') || code.ends_with('`') {
        format!("{ticks} {code} {ticks}")
    } else {
        format!("{ticks}{code}{ticks}")
    }
}

/// Link or image destination with optional title
fn link_target(href: &str, title: Option<&str>) -> String {
    let needs_brackets = href.is_empty()
        || href.contains(|c: char| c.is_whitespace() || matches!(c, '(' | ')' | '<' | '>'));
    let mut out = if needs_brackets {
        format!("<{}>", href.replace('<', "%3C").replace('>', "%3E"))
    } else {
        href.to_string()
    };
    if let Some(title) = title.filter(|t| !t.is_empty()) {
        out.push_str(" \"");
        out.push_str(&title.replace('\\', "\\\\").replace('"', "\\\""));
        out.push('"');
    }
    out
}

fn image_markdown(img: &Image, ctx: InlineCtx) -> String {
    let alt = img.alt.replace(['\n', '\r'], " ");
    format!(
        "![{}]({})",
        escape_text(alt.trim(), false, ctx),
        link_target(&img.src, img.title.as_deref())
    )
}

fn write_code_block(c: &CodeBlock) -> String {
    let text = c.text();
    let fence = "`".repeat(calculate_fence_length(&text));

    let mut out = fence.clone();
    if let Some(lang) = &c.language {
        out.push_str(lang);
    }
    out.push('\n');
    if !text.is_empty() {
        out.push_str(&text);
        out.push('\n');
    }
    out.push_str(&fence);
    out
}

/// Stored rule markup if it is a valid thematic break, `---` otherwise
fn rule_markup(markup: Option<&str>) -> String {
    let compact: String = markup
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let mut chars = compact.chars();
    match chars.next() {
        Some(first @ ('-' | '*' | '_')) if compact.len() >= 3 && chars.all(|c| c == first) => {
            compact
        }
        _ => "---".to_string(),
    }
}

fn table_row(cells: &[String], num_cols: usize) -> String {
    let mut line = String::from("|");
    for i in 0..num_cols {
        line.push(' ');
        if let Some(cell) = cells.get(i) {
            line.push_str(cell);
        }
        line.push_str(" |");
    }
    line
}

/// Prefix the first line with `marker` and indent the rest to its width
fn indent_item(marker: &str, body: &str) -> String {
    if body.is_empty() {
        return marker.trim_end().to_string();
    }
    let indent = " ".repeat(marker.len());
    let mut out = String::new();
    for (i, line) in body.lines().enumerate() {
        if i == 0 {
            out.push_str(marker);
        } else {
            out.push('\n');
            if !line.is_empty() {
                out.push_str(&indent);
            }
        }
        out.push_str(line);
    }
    out
}

fn longest_backtick_run(content: &str) -> usize {
    let mut max_backticks = 0;
    let mut current_run = 0;

    for c in content.chars() {
        if c == '`' {
            current_run += 1;
            max_backticks = max_backticks.max(current_run);
        } else {
            current_run = 0;
        }
    }
    max_backticks
}

/// Calculate the minimum fence length needed for a code block.
///
/// The fence must be longer than any sequence of consecutive backticks in the content.
/// Returns at least 3 (the minimum for a valid fenced code block).
fn calculate_fence_length(content: &str) -> usize {
    3.max(longest_backtick_run(content) + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lesson_doc::ListKind;

    fn md(content: Vec<Node>) -> String {
        let doc = Document::try_new(content).unwrap();
        doc_to_markdown(&doc, &WriterOptions::default())
    }

    fn p(text: &str) -> Node {
        Node::paragraph(vec![Node::text(text)])
    }

    fn marked(text: &str, marks: Vec<Mark>) -> Node {
        Node::paragraph(vec![Node::marked_text(text, marks)])
    }

    #[test]
    fn test_heading() {
        assert_eq!(md(vec![Node::heading(1, vec![Node::text("Title")])]), "# Title\n");
    }

    #[test]
    fn test_heading_levels() {
        for level in 1..=6u64 {
            let out = md(vec![Node::heading(level, vec![Node::text("Title")])]);
            assert_eq!(out, format!("{} Title\n", "#".repeat(level as usize)));
        }
    }

    #[test]
    fn test_heading_out_of_range_writes_level_six() {
        assert_eq!(
            md(vec![Node::heading(7, vec![Node::text("Deep")])]),
            "###### Deep\n"
        );
    }

    #[test]
    fn test_heading_trailing_hash_is_escaped() {
        assert_eq!(
            md(vec![Node::heading(2, vec![Node::text("C#")])]),
            "## C\\#\n"
        );
    }

    #[test]
    fn test_heading_hard_break_becomes_space() {
        let out = md(vec![Node::heading(
            1,
            vec![Node::text("a"), Node::hard_break(), Node::text("b")],
        )]);
        assert_eq!(out, "# a b\n");
    }

    #[test]
    fn test_paragraphs_separated_by_blank_line() {
        assert_eq!(md(vec![p("First"), p("Second")]), "First\n\nSecond\n");
    }

    #[test]
    fn test_empty_paragraphs_are_skipped() {
        let out = md(vec![p("a"), Node::paragraph(vec![]), p("b")]);
        assert_eq!(out, "a\n\nb\n");
    }

    #[test]
    fn test_empty_document() {
        assert_eq!(md(vec![]), "");
    }

    #[test]
    fn test_bold_then_italic_nesting() {
        assert_eq!(md(vec![marked("hi", vec![Mark::Bold, Mark::Italic])]), "***hi***\n");
    }

    #[test]
    fn test_code_mark_is_innermost() {
        assert_eq!(md(vec![marked("x", vec![Mark::Code, Mark::Bold])]), "**`x`**\n");
    }

    #[test]
    fn test_strike_and_underline() {
        assert_eq!(md(vec![marked("x", vec![Mark::Strike])]), "~~x~~\n");
        assert_eq!(md(vec![marked("x", vec![Mark::Underline])]), "<u>x</u>\n");
    }

    #[test]
    fn test_link() {
        assert_eq!(
            md(vec![marked("UN", vec![Mark::link("https://un.org")])]),
            "[UN](https://un.org)\n"
        );
        assert_eq!(
            md(vec![marked(
                "UN",
                vec![Mark::link_with_title("https://un.org", "United \"Nations\"")]
            )]),
            "[UN](https://un.org \"United \\\"Nations\\\"\")\n"
        );
    }

    #[test]
    fn test_link_with_spaces_uses_angle_brackets() {
        assert_eq!(
            md(vec![marked("notes", vec![Mark::link("my notes.pdf")])]),
            "[notes](<my notes.pdf>)\n"
        );
    }

    #[test]
    fn test_whitespace_moves_outside_marks() {
        let out = md(vec![Node::paragraph(vec![
            Node::text("Vote"),
            Node::marked_text(" yes ", vec![Mark::Bold]),
            Node::text("now"),
        ])]);
        assert_eq!(out, "Vote **yes** now\n");
    }

    #[test]
    fn test_marks_span_adjacent_runs() {
        let out = md(vec![Node::paragraph(vec![
            Node::marked_text("a", vec![Mark::Bold]),
            Node::marked_text("b", vec![Mark::Bold, Mark::Italic]),
            Node::marked_text("c", vec![Mark::Bold]),
        ])]);
        assert_eq!(out, "**a*b*c**\n");
    }

    #[test]
    fn test_emphasis_next_to_punctuation_uses_html() {
        let out = md(vec![Node::paragraph(vec![
            Node::marked_text("a.", vec![Mark::Bold]),
            Node::text("b"),
        ])]);
        assert_eq!(out, "<strong>a.</strong>b\n");

        let out = md(vec![Node::paragraph(vec![
            Node::text("a"),
            Node::marked_text("(x)", vec![Mark::Italic]),
        ])]);
        assert_eq!(out, "a<em>(x)</em>\n");

        let out = md(vec![Node::paragraph(vec![
            Node::text("x"),
            Node::marked_text("-1", vec![Mark::Strike]),
        ])]);
        assert_eq!(out, "x<del>-1</del>\n");
    }

    #[test]
    fn test_emphasis_next_to_punctuation_and_space_keeps_delimiters() {
        let out = md(vec![Node::paragraph(vec![
            Node::text("See "),
            Node::marked_text("(x)", vec![Mark::Italic]),
            Node::text(" now, "),
            Node::marked_text("done.", vec![Mark::Bold]),
        ])]);
        assert_eq!(out, "See *(x)* now, **done.**\n");
    }

    #[test]
    fn test_shared_delimiter_run_falls_back_together() {
        let out = md(vec![Node::paragraph(vec![
            Node::marked_text("a", vec![Mark::Bold]),
            Node::marked_text("b.", vec![Mark::Bold, Mark::Italic]),
            Node::text("c"),
        ])]);
        assert_eq!(out, "<strong>a<em>b.</em></strong>c\n");
    }

    #[test]
    fn test_flanking() {
        assert!(left_flanking(None, Some('a')));
        assert!(left_flanking(Some('a'), Some('b')));
        assert!(left_flanking(Some(' '), Some('(')));
        assert!(!left_flanking(Some('a'), Some('(')));
        assert!(!left_flanking(Some('a'), Some(' ')));
        assert!(!left_flanking(Some('a'), None));
        // Right-flanking is the mirror image
        assert!(left_flanking(None, Some('.')));
        assert!(!left_flanking(Some('b'), Some('.')));
    }

    #[test]
    fn test_inline_code_with_backticks() {
        assert_eq!(md(vec![marked("a`b", vec![Mark::Code])]), "``a`b``\n");
        assert_eq!(md(vec![marked("`x", vec![Mark::Code])]), "`` `x ``\n");
    }

    #[test]
    fn test_escaping() {
        assert_eq!(
            md(vec![p("Use *stars* and _under_ [x] a < b")]),
            "Use \\*stars\\* and \\_under\\_ \\[x\\] a \\< b\n"
        );
        assert_eq!(md(vec![p("AT&T &amp; co")]), "AT&T \\&amp; co\n");
    }

    #[test]
    fn test_line_start_escaping() {
        assert_eq!(md(vec![p("# not a heading")]), "\\# not a heading\n");
        assert_eq!(md(vec![p("- not a list")]), "\\- not a list\n");
        assert_eq!(md(vec![p("> not a quote")]), "\\> not a quote\n");
        assert_eq!(md(vec![p("1945. The Charter")]), "1945\\. The Charter\n");
        assert_eq!(md(vec![p("In 1945. The Charter")]), "In 1945. The Charter\n");
    }

    #[test]
    fn test_hard_break() {
        let out = md(vec![Node::paragraph(vec![
            Node::text("a "),
            Node::hard_break(),
            Node::text("b"),
        ])]);
        assert_eq!(out, "a  \nb\n");
    }

    #[test]
    fn test_hard_break_at_edges_is_dropped() {
        let out = md(vec![Node::paragraph(vec![
            Node::hard_break(),
            Node::text("a"),
            Node::hard_break(),
        ])]);
        assert_eq!(out, "a\n");
    }

    #[test]
    fn test_newlines_in_text_become_spaces() {
        assert_eq!(md(vec![p("one\ntwo")]), "one two\n");
    }

    #[test]
    fn test_image() {
        assert_eq!(
            md(vec![Node::image_with_title("flag.png", "Flag", "Ghana")]),
            "![Flag](flag.png \"Ghana\")\n"
        );
        assert_eq!(
            md(vec![Node::paragraph(vec![
                Node::text("See "),
                Node::image("my flag.png", "Flag"),
            ])]),
            "See ![Flag](<my flag.png>)\n"
        );
    }

    #[test]
    fn test_code_block() {
        let out = md(vec![Node::code_block(Some("rust".to_string()), "fn main() {}")]);
        assert_eq!(out, "```rust\nfn main() {}\n```\n");
    }

    #[test]
    fn test_code_block_empty() {
        assert_eq!(md(vec![Node::code_block(None, "")]), "```\n```\n");
    }

    #[test]
    fn test_code_block_with_triple_backticks() {
        let code = "Here is a code block:\n```r\nx <- 1\n```";
        let out = md(vec![Node::code_block(Some("markdown".to_string()), code)]);
        assert!(out.starts_with("````markdown\n"));
        assert!(out.ends_with("\n````\n"));
    }

    #[test]
    fn test_calculate_fence_length() {
        assert_eq!(calculate_fence_length("no backticks"), 3);
        assert_eq!(calculate_fence_length("`one`"), 3);
        assert_eq!(calculate_fence_length("```"), 4);
        assert_eq!(calculate_fence_length("`````"), 6);
    }

    #[test]
    fn test_horizontal_rule() {
        assert_eq!(md(vec![Node::horizontal_rule()]), "---\n");
        let with_markup = |markup: &str| {
            md(vec![Node::HorizontalRule(lesson_doc::HorizontalRule {
                markup: Some(markup.to_string()),
            })])
        };
        assert_eq!(with_markup("***"), "***\n");
        assert_eq!(with_markup("* * *"), "***\n");
        assert_eq!(with_markup("==="), "---\n");
    }

    #[test]
    fn test_blockquote() {
        let out = md(vec![Node::blockquote(vec![p("a"), p("b")])]);
        assert_eq!(out, "> a\n>\n> b\n");
    }

    #[test]
    fn test_nested_blockquote() {
        let out = md(vec![Node::blockquote(vec![Node::blockquote(vec![p("deep")])])]);
        assert_eq!(out, "> > deep\n");
    }

    #[test]
    fn test_bullet_list() {
        let out = md(vec![Node::bullet_list(vec![
            Node::list_item(vec![p("Item 1")]),
            Node::list_item(vec![p("Item 2")]),
        ])]);
        assert_eq!(out, "- Item 1\n- Item 2\n");
    }

    #[test]
    fn test_ordered_list_start() {
        let out = md(vec![Node::ordered_list(
            Some(5),
            vec![
                Node::list_item(vec![p("a")]),
                Node::list_item(vec![p("b")]),
                Node::list_item(vec![p("c")]),
            ],
        )]);
        assert_eq!(out, "5. a\n6. b\n7. c\n");
    }

    #[test]
    fn test_flat_list_children() {
        let out = md(vec![Node::list(ListKind::Ordered, vec![p("First"), p("Second")])]);
        assert_eq!(out, "1. First\n2. Second\n");

        let task = md(vec![Node::list(
            ListKind::Other("task".to_string()),
            vec![p("Research")],
        )]);
        assert_eq!(task, "- Research\n");
    }

    #[test]
    fn test_adjacent_lists_merge() {
        let out = md(vec![
            Node::list(ListKind::Bullet, vec![p("a")]),
            Node::list(ListKind::Bullet, vec![p("b")]),
            Node::list(ListKind::Ordered, vec![p("c")]),
            Node::list(ListKind::Ordered, vec![p("d")]),
        ]);
        assert_eq!(out, "- a\n- b\n\n1. c\n2. d\n");
    }

    #[test]
    fn test_nested_list_stays_tight() {
        let out = md(vec![Node::bullet_list(vec![
            Node::list_item(vec![
                p("Parent"),
                Node::bullet_list(vec![Node::list_item(vec![p("Child")])]),
            ]),
            Node::list_item(vec![p("Next")]),
        ])]);
        assert_eq!(out, "- Parent\n  - Child\n- Next\n");
    }

    #[test]
    fn test_ordered_item_continuation_indent() {
        let out = md(vec![Node::ordered_list(
            Some(9),
            vec![
                Node::list_item(vec![p("a"), p("b")]),
                Node::list_item(vec![p("c")]),
            ],
        )]);
        assert_eq!(out, "9. a\n\n   b\n10. c\n");
    }

    #[test]
    fn test_nested_ordered_list_not_starting_at_one() {
        let out = md(vec![Node::bullet_list(vec![Node::list_item(vec![
            p("Parent"),
            Node::ordered_list(Some(3), vec![Node::list_item(vec![p("Child")])]),
        ])])]);
        assert_eq!(out, "- Parent\n\n  3. Child\n");
    }

    #[test]
    fn test_bullet_item_holding_rule() {
        let out = md(vec![Node::bullet_list(vec![Node::list_item(vec![
            Node::horizontal_rule(),
        ])])]);
        assert_eq!(out, "- ***\n");
    }

    #[test]
    fn test_empty_list_item() {
        let out = md(vec![Node::bullet_list(vec![
            Node::list_item(vec![]),
            Node::list_item(vec![p("b")]),
        ])]);
        assert_eq!(out, "-\n- b\n");
    }

    #[test]
    fn test_table() {
        let cell = |text: &str| Node::table_cell(vec![p(text)]);
        let out = md(vec![Node::table(vec![
            Node::table_row(vec![
                Node::table_header_cell(vec![p("Country")]),
                Node::table_header_cell(vec![p("Vote")]),
            ]),
            Node::table_row(vec![cell("Chile"), cell("Yes|No")]),
            Node::table_row(vec![cell("Peru")]),
        ])]);
        insta::assert_snapshot!(out.trim_end(), @r"
| Country | Vote |
| --- | --- |
| Chile | Yes\|No |
| Peru |  |
");
    }

    #[test]
    fn test_table_cell_with_break_and_code() {
        let out = md(vec![Node::table(vec![Node::table_row(vec![Node::table_cell(
            vec![Node::paragraph(vec![
                Node::text("a"),
                Node::hard_break(),
                Node::marked_text("x|y", vec![Mark::Code]),
            ])],
        )])])]);
        assert_eq!(out, "| a<br>`x\\|y` |\n| --- |\n");
    }

    #[test]
    fn test_slide_markers() {
        let content = vec![p("A"), p(SLIDE_MARKER), p("B")];
        assert_eq!(md(content.clone()), "A\n\n<!-- Slide -->\n\nB\n");

        let doc = Document::try_new(content).unwrap();
        let stripped = doc_to_markdown(
            &doc,
            &WriterOptions {
                strip_slide_markers: true,
            },
        );
        assert_eq!(stripped, "A\n\nB\n");
    }

    #[test]
    fn test_slide_marker_inside_text_keeps_the_text() {
        let content = vec![p("Read chapter 3 <!-- Slide --> before class")];
        assert_eq!(
            md(content.clone()),
            "Read chapter 3 \\<!-- Slide --> before class\n"
        );

        let doc = Document::try_new(content).unwrap();
        let stripped = doc_to_markdown(
            &doc,
            &WriterOptions {
                strip_slide_markers: true,
            },
        );
        assert_eq!(stripped, "Read chapter 3  before class\n");
    }

    #[test]
    fn test_padded_slide_marker_is_a_bare_line() {
        let doc = Document::try_new(vec![p("  <!-- Slide -->  ")]).unwrap();
        assert_eq!(
            doc_to_markdown(&doc, &WriterOptions::default()),
            "<!-- Slide -->\n"
        );
    }

    #[test]
    fn test_stripped_marker_between_lists_keeps_one_list() {
        let doc = Document::try_new(vec![
            Node::list(ListKind::Bullet, vec![p("a")]),
            p(SLIDE_MARKER),
            Node::list(ListKind::Bullet, vec![p("b")]),
        ])
        .unwrap();
        let options = WriterOptions {
            strip_slide_markers: true,
        };
        assert_eq!(doc_to_markdown(&doc, &options), "- a\n- b\n");
    }

    #[test]
    fn test_slide_to_markdown() {
        let doc = Document::try_new(vec![
            Node::heading(1, vec![Node::text("One")]),
            p(SLIDE_MARKER),
            Node::heading(1, vec![Node::text("Two")]),
            p("Body"),
        ])
        .unwrap();
        let slides = doc.slides();
        assert_eq!(
            slide_to_markdown(&slides[1], &WriterOptions::default()),
            "# Two\n\nBody\n"
        );
    }

    #[test]
    fn test_unsupported_constructs_are_reported() {
        let doc = Document::try_new(vec![
            Node::unknown("callout", vec![p("note")]),
            marked("hi", vec![Mark::unknown("highlight")]),
            Node::unknown("callout", vec![p("again")]),
        ])
        .unwrap();
        let out = serialize(&doc, &WriterOptions::default());
        assert_eq!(out.markdown, "note\n\nhi\n\nagain\n");
        assert_eq!(out.unsupported, vec!["callout", "highlight"]);
    }

    #[test]
    fn test_json_to_markdown() {
        let json = r#"{"type":"doc","content":[
            {"type":"heading","attrs":{"level":2},"content":[{"type":"text","text":"Agenda"}]},
            {"type":"orderedList","attrs":{"start":3},"content":[
                {"type":"listItem","content":[{"type":"paragraph","content":[{"type":"text","text":"Roll call"}]}]}
            ]}
        ]}"#;
        let out = json_to_markdown(json, &WriterOptions::default()).unwrap();
        assert_eq!(out, "## Agenda\n\n3. Roll call\n");
    }

    #[test]
    fn test_json_to_markdown_rejects_invalid_nesting() {
        let json = r#"{"type":"doc","content":[
            {"type":"list","content":[{"type":"text","text":"loose"}]}
        ]}"#;
        let err = json_to_markdown(json, &WriterOptions::default()).unwrap_err();
        assert!(matches!(err, DocError::InvalidNesting { .. }));
    }
}
