//! Markdown to lesson document reader
//!
//! Event-driven conversion of pulldown-cmark output into the lesson
//! document tree. Every construct the writer emits maps back to the node or
//! mark it came from; other Markdown is kept as close as the schema allows.

use lesson_doc::{
    DocError, Document, HorizontalRule, Image, Link, Mark, Node, ParseOptions, SLIDE_MARKER,
    plain_text,
};
use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag};

/// Parse Markdown into a validated lesson document
pub fn markdown_to_doc(markdown: &str) -> Result<Document, DocError> {
    markdown_to_doc_with(markdown, &ParseOptions::default())
}

/// Parse Markdown into a validated lesson document with explicit limits
///
/// Reading stops at the first container nested deeper than
/// `options.max_depth`, so the tree never grows past the bound.
pub fn markdown_to_doc_with(markdown: &str, options: &ParseOptions) -> Result<Document, DocError> {
    let mut parser_options = Options::empty();
    parser_options.insert(Options::ENABLE_STRIKETHROUGH);
    parser_options.insert(Options::ENABLE_TABLES);

    let mut builder = Builder::new(options.max_depth);
    for (event, range) in Parser::new_ext(markdown, parser_options).into_offset_iter() {
        builder.event(event, &markdown[range]);
        if builder.error.is_some() {
            break;
        }
    }
    let content = builder.finish()?;
    log::trace!("read {} top-level nodes from Markdown", content.len());
    Document::try_new_with(content, options)
}

/// Open container while reading
#[derive(Debug)]
enum FrameKind {
    Root,
    Paragraph,
    Heading(u8),
    Blockquote,
    List { start: Option<u64> },
    Item,
    CodeBlock { language: Option<String>, text: String },
    HtmlBlock { html: String },
    Table,
    TableRow { header: bool },
    TableCell { header: bool },
    Image { src: String, title: Option<String> },
    /// Inline mark; text inside goes to the enclosing frame
    Mark(Mark),
    /// Anything else; its content is passed through
    Other,
}

impl FrameKind {
    /// Whether the frame becomes a node of its own
    fn is_node(&self) -> bool {
        !matches!(self, FrameKind::Root | FrameKind::Mark(_) | FrameKind::Other)
    }
}

#[derive(Debug)]
struct Frame {
    kind: FrameKind,
    children: Vec<Node>,
}

impl Frame {
    fn new(kind: FrameKind) -> Self {
        Self {
            kind,
            children: Vec::new(),
        }
    }
}

struct Builder {
    frames: Vec<Frame>,
    /// Marks applying to new text, outermost first
    marks: Vec<Mark>,
    /// Open frames that become nodes
    depth: usize,
    max_depth: usize,
    error: Option<DocError>,
}

impl Builder {
    fn new(max_depth: usize) -> Self {
        Self {
            frames: vec![Frame::new(FrameKind::Root)],
            marks: Vec::new(),
            depth: 0,
            max_depth,
            error: None,
        }
    }

    fn event(&mut self, event: Event<'_>, source: &str) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(_) => self.end(),
            Event::Text(text) => self.text(&text),
            Event::Code(code) => {
                let mut marks = self.marks.clone();
                marks.push(Mark::Code);
                self.push_text(&code, marks);
            }
            Event::Html(html) => self.html(&html),
            Event::InlineHtml(html) => self.inline_html(&html),
            Event::SoftBreak => self.text(" "),
            Event::HardBreak => self.push_node(Node::HardBreak),
            Event::Rule => self.push_node(Node::HorizontalRule(HorizontalRule {
                markup: Some(rule_markup(source)),
            })),
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        let kind = match tag {
            Tag::Paragraph => FrameKind::Paragraph,
            Tag::Heading { level, .. } => FrameKind::Heading(heading_level(level)),
            Tag::BlockQuote(_) => FrameKind::Blockquote,
            Tag::CodeBlock(kind) => {
                let language = match kind {
                    CodeBlockKind::Fenced(info) => Some(info.trim().to_string()),
                    CodeBlockKind::Indented => None,
                };
                FrameKind::CodeBlock {
                    language: language.filter(|l| !l.is_empty()),
                    text: String::new(),
                }
            }
            Tag::HtmlBlock => FrameKind::HtmlBlock {
                html: String::new(),
            },
            Tag::List(start) => FrameKind::List { start },
            Tag::Item => FrameKind::Item,
            Tag::Table(_) => FrameKind::Table,
            // Header cells sit directly under the head, without a row
            Tag::TableHead => FrameKind::TableRow { header: true },
            Tag::TableRow => FrameKind::TableRow { header: false },
            Tag::TableCell => FrameKind::TableCell {
                header: matches!(
                    self.frames.last(),
                    Some(Frame {
                        kind: FrameKind::TableRow { header: true },
                        ..
                    })
                ),
            },
            Tag::Emphasis => self.open_mark(Mark::Italic),
            Tag::Strong => self.open_mark(Mark::Bold),
            Tag::Strikethrough => self.open_mark(Mark::Strike),
            Tag::Link {
                dest_url, title, ..
            } => self.open_mark(Mark::Link(Link {
                href: dest_url.to_string(),
                title: Some(title.to_string()).filter(|t| !t.is_empty()),
            })),
            Tag::Image {
                dest_url, title, ..
            } => FrameKind::Image {
                src: dest_url.to_string(),
                title: Some(title.to_string()).filter(|t| !t.is_empty()),
            },
            _ => FrameKind::Other,
        };
        if kind.is_node() {
            if self.depth >= self.max_depth {
                self.error = Some(DocError::TooDeep {
                    path: self.next_path(),
                    max_depth: self.max_depth,
                });
                return;
            }
            self.depth += 1;
        }
        self.frames.push(Frame::new(kind));
    }

    /// Document path the next container node would get
    fn next_path(&self) -> String {
        let mut path = String::new();
        let mut parent = &self.frames[0];
        for frame in self.frames.iter().skip(1).filter(|f| f.kind.is_node()) {
            path.push_str(&format!("/content/{}", parent.children.len()));
            parent = frame;
        }
        path.push_str(&format!("/content/{}", parent.children.len()));
        path
    }

    fn end(&mut self) {
        if self.frames.len() <= 1 {
            return;
        }
        let Some(Frame { kind, children }) = self.frames.pop() else {
            return;
        };
        if kind.is_node() {
            self.depth -= 1;
        }

        let node = match kind {
            FrameKind::Root => return,
            FrameKind::Mark(mark) => {
                self.close_mark(&mark);
                return;
            }
            FrameKind::Other => {
                for child in children {
                    self.push_node(child);
                }
                return;
            }
            FrameKind::HtmlBlock { html } => match html_block(&html) {
                Some(node) => node,
                None => return,
            },
            FrameKind::Paragraph => Node::paragraph(children),
            FrameKind::Heading(level) => Node::heading(u64::from(level), children),
            FrameKind::Blockquote => Node::blockquote(wrap_inline(children)),
            FrameKind::List { start: Some(start) } => {
                Node::ordered_list(Some(u32::try_from(start).unwrap_or(u32::MAX)), children)
            }
            FrameKind::List { start: None } => Node::bullet_list(children),
            FrameKind::Item => Node::list_item(wrap_inline(children)),
            FrameKind::CodeBlock { language, mut text } => {
                // The fence closes on its own line
                if text.ends_with('\n') {
                    text.pop();
                }
                Node::code_block(language, text)
            }
            FrameKind::Table => Node::table(children),
            FrameKind::TableRow { .. } => Node::table_row(children),
            FrameKind::TableCell { header: true } => {
                Node::table_header_cell(wrap_inline(children))
            }
            FrameKind::TableCell { header: false } => Node::table_cell(wrap_inline(children)),
            FrameKind::Image { src, title } => Node::Image(Image {
                src,
                alt: plain_text(&children),
                title,
            }),
        };
        self.push_node(node);
    }

    fn finish(mut self) -> Result<Vec<Node>, DocError> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        while self.frames.len() > 1 {
            self.end();
        }
        let root = self.frames.pop().map(|f| f.children).unwrap_or_default();
        Ok(wrap_inline(root))
    }

    fn open_mark(&mut self, mark: Mark) -> FrameKind {
        self.marks.push(mark.clone());
        FrameKind::Mark(mark)
    }

    fn close_mark(&mut self, mark: &Mark) {
        if let Some(i) = self.marks.iter().rposition(|m| m == mark) {
            self.marks.remove(i);
        }
    }

    fn text(&mut self, text: &str) {
        if let Some(Frame {
            kind: FrameKind::CodeBlock { text: code, .. },
            ..
        }) = self.frames.last_mut()
        {
            code.push_str(text);
            return;
        }
        let marks = self.marks.clone();
        self.push_text(text, marks);
    }

    /// Append text, extending the previous run when the marks match
    fn push_text(&mut self, text: &str, marks: Vec<Mark>) {
        let children = self.target();
        if let Some(Node::Text(last)) = children.last_mut() {
            if last.marks == marks {
                last.text.push_str(text);
                return;
            }
        }
        children.push(Node::marked_text(text, marks));
    }

    fn push_node(&mut self, node: Node) {
        self.target().push(node);
    }

    /// Children of the innermost frame that is not a mark
    fn target(&mut self) -> &mut Vec<Node> {
        let index = self
            .frames
            .iter()
            .rposition(|f| !matches!(f.kind, FrameKind::Mark(_)))
            .unwrap_or(0);
        &mut self.frames[index].children
    }

    fn html(&mut self, html: &str) {
        if let Some(Frame {
            kind: FrameKind::HtmlBlock { html: block },
            ..
        }) = self.frames.last_mut()
        {
            block.push_str(html);
            return;
        }
        self.inline_html(html);
    }

    fn inline_html(&mut self, html: &str) {
        if html.contains(SLIDE_MARKER) {
            self.text(SLIDE_MARKER);
            return;
        }
        match html.trim().to_ascii_lowercase().as_str() {
            "<u>" => self.marks.push(Mark::Underline),
            "</u>" => self.close_mark(&Mark::Underline),
            "<strong>" | "<b>" => self.marks.push(Mark::Bold),
            "</strong>" | "</b>" => self.close_mark(&Mark::Bold),
            "<em>" | "<i>" => self.marks.push(Mark::Italic),
            "</em>" | "</i>" => self.close_mark(&Mark::Italic),
            "<del>" | "<s>" => self.marks.push(Mark::Strike),
            "</del>" | "</s>" => self.close_mark(&Mark::Strike),
            "<br>" | "<br/>" | "<br />" => self.push_node(Node::HardBreak),
            _ => self.text(html),
        }
    }
}

/// Paragraph for an HTML block: a slide marker, or the raw HTML as text
fn html_block(html: &str) -> Option<Node> {
    if html.contains(SLIDE_MARKER) {
        return Some(Node::paragraph(vec![Node::text(SLIDE_MARKER)]));
    }
    let html = html.trim();
    if html.is_empty() {
        None
    } else {
        Some(Node::paragraph(vec![Node::text(html)]))
    }
}

/// Wrap runs of inline nodes in paragraphs (tight list items, table cells)
fn wrap_inline(children: Vec<Node>) -> Vec<Node> {
    let mut blocks = Vec::new();
    let mut run = Vec::new();
    for child in children {
        if child.is_inline() || matches!(child, Node::Image(_)) {
            run.push(child);
        } else {
            if !run.is_empty() {
                blocks.push(Node::paragraph(std::mem::take(&mut run)));
            }
            blocks.push(child);
        }
    }
    if !run.is_empty() {
        blocks.push(Node::paragraph(run));
    }
    blocks
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// Markup of a thematic break as written in the source
fn rule_markup(source: &str) -> String {
    match source.chars().find(|c| matches!(c, '-' | '*' | '_')) {
        Some(c) => {
            let count = source.chars().filter(|&x| x == c).count();
            c.to_string().repeat(count.max(3))
        }
        None => "---".to_string(),
    }
}
