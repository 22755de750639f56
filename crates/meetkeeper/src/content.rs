//! Editor content pipeline.
//!
//! Notes are edited as Markdown (CommonMark with task lists) and stored as
//! an ordered list of [`Block`]s. This module converts between the two and
//! reconciles a freshly parsed block list against the stored one.
//!
//! Reconciliation is positional and append-only: a stored block keeps its
//! id when the block at the same index changes, extra incoming blocks are
//! appended, and nothing is ever removed. Removing a block is a separate,
//! explicit storage operation.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use serde::{Deserialize, Serialize};
use tracing::trace;
use uuid::Uuid;

/// The fixed set of note block types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    /// A section heading.
    Heading,
    /// A plain paragraph.
    Paragraph,
    /// A bulleted or numbered list item.
    Bullet,
    /// A checklist item.
    Checklist,
    /// A fenced or indented code block.
    Code,
    /// Quoted text.
    Quote,
}

impl BlockKind {
    /// Parse the storage name of a block kind.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "heading" => Some(Self::Heading),
            "paragraph" => Some(Self::Paragraph),
            "bullet" => Some(Self::Bullet),
            "checklist" => Some(Self::Checklist),
            "code" => Some(Self::Code),
            "quote" => Some(Self::Quote),
            _ => None,
        }
    }

    fn is_list_item(self) -> bool {
        matches!(self, Self::Bullet | Self::Checklist)
    }
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Heading => write!(f, "heading"),
            Self::Paragraph => write!(f, "paragraph"),
            Self::Bullet => write!(f, "bullet"),
            Self::Checklist => write!(f, "checklist"),
            Self::Code => write!(f, "code"),
            Self::Quote => write!(f, "quote"),
        }
    }
}

/// The payload of a block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockContent {
    /// Text with inline Markdown emphasis preserved.
    pub text: String,
    /// Heading level, 1 through 6.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
    /// Checklist state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,
    /// Code block language tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl BlockContent {
    /// Content carrying only text.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

/// One normalized unit of note content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Stable identifier, kept across in-place updates.
    pub id: String,
    /// What kind of block this is.
    pub kind: BlockKind,
    /// The block's payload.
    pub content: BlockContent,
    /// When the content last changed.
    pub timestamp: DateTime<Utc>,
}

impl Block {
    /// Create a block with a fresh id.
    #[must_use]
    pub fn new(kind: BlockKind, content: BlockContent) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            content,
            timestamp: Utc::now(),
        }
    }

    /// Create a paragraph block.
    #[must_use]
    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::new(BlockKind::Paragraph, BlockContent::text(text))
    }

    /// Create a heading block.
    #[must_use]
    pub fn heading(level: u8, text: impl Into<String>) -> Self {
        Self::new(
            BlockKind::Heading,
            BlockContent {
                level: Some(level.clamp(1, 6)),
                ..BlockContent::text(text)
            },
        )
    }

    /// Create a checklist block.
    #[must_use]
    pub fn checklist(text: impl Into<String>, checked: bool) -> Self {
        Self::new(
            BlockKind::Checklist,
            BlockContent {
                checked: Some(checked),
                ..BlockContent::text(text)
            },
        )
    }

    /// Whether this is a ticked checklist item.
    #[must_use]
    pub fn is_checked(&self) -> bool {
        self.kind == BlockKind::Checklist && self.content.checked == Some(true)
    }

    /// Whether `other` carries the same kind and content, ignoring id and time.
    #[must_use]
    pub fn same_content(&self, other: &Block) -> bool {
        self.kind == other.kind && self.content == other.content
    }
}

/// Whether editor content has nothing worth saving.
///
/// Whitespace and the empty-paragraph placeholders rich-text editors emit
/// both count as blank.
#[must_use]
pub fn is_blank(markup: &str) -> bool {
    markup.trim().is_empty() || parse_blocks(markup).is_empty()
}

/// Parse editor Markdown into blocks, in document order.
#[must_use]
pub fn parse_blocks(markup: &str) -> Vec<Block> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let mut builder = BlockBuilder::default();
    for event in Parser::new_ext(markup, options) {
        builder.handle(event);
    }
    let blocks = builder.finish();
    trace!(count = blocks.len(), "parsed note blocks");
    blocks
}

#[derive(Debug)]
struct OpenBlock {
    kind: BlockKind,
    content: BlockContent,
}

#[derive(Debug, Default)]
struct BlockBuilder {
    blocks: Vec<Block>,
    open: Option<OpenBlock>,
    quote_depth: usize,
    item_depth: usize,
}

impl BlockBuilder {
    fn handle(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => self.push_text(&text),
            Event::Code(code) => {
                self.push_text("`");
                self.push_text(&code);
                self.push_text("`");
            }
            Event::SoftBreak => self.push_text(" "),
            Event::HardBreak => self.push_text("\n"),
            Event::TaskListMarker(checked) => {
                if let Some(open) = self.open.as_mut() {
                    open.kind = BlockKind::Checklist;
                    open.content.checked = Some(checked);
                }
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Heading { level, .. } => {
                self.close();
                self.open = Some(OpenBlock {
                    kind: BlockKind::Heading,
                    content: BlockContent {
                        level: Some(heading_level(level)),
                        ..BlockContent::default()
                    },
                });
            }
            Tag::Paragraph => {
                if self.item_depth > 0 && self.open.is_some() {
                    // Loose list items wrap their text in paragraphs
                    self.push_separator();
                    return;
                }
                self.close();
                let kind = if self.item_depth > 0 {
                    BlockKind::Bullet
                } else if self.quote_depth > 0 {
                    BlockKind::Quote
                } else {
                    BlockKind::Paragraph
                };
                self.open = Some(OpenBlock {
                    kind,
                    content: BlockContent::default(),
                });
            }
            Tag::List { .. } => self.close(),
            Tag::Item => {
                self.close();
                self.item_depth += 1;
                self.open = Some(OpenBlock {
                    kind: BlockKind::Bullet,
                    content: BlockContent::default(),
                });
            }
            Tag::BlockQuote { .. } => {
                self.close();
                self.quote_depth += 1;
            }
            Tag::CodeBlock(kind) => {
                self.close();
                let language = match kind {
                    CodeBlockKind::Fenced(info) => info
                        .split_whitespace()
                        .next()
                        .map(str::to_string),
                    CodeBlockKind::Indented => None,
                };
                self.open = Some(OpenBlock {
                    kind: BlockKind::Code,
                    content: BlockContent {
                        language,
                        ..BlockContent::default()
                    },
                });
            }
            Tag::Emphasis => self.push_text("*"),
            Tag::Strong => self.push_text("**"),
            Tag::Strikethrough => self.push_text("~~"),
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Heading { .. } | TagEnd::CodeBlock | TagEnd::Item => {
                self.close();
                if matches!(tag, TagEnd::Item) {
                    self.item_depth = self.item_depth.saturating_sub(1);
                }
            }
            TagEnd::Paragraph => {
                if self.item_depth == 0 {
                    self.close();
                }
            }
            TagEnd::BlockQuote { .. } => {
                self.close();
                self.quote_depth = self.quote_depth.saturating_sub(1);
            }
            TagEnd::Emphasis => self.push_text("*"),
            TagEnd::Strong => self.push_text("**"),
            TagEnd::Strikethrough => self.push_text("~~"),
            _ => {}
        }
    }

    fn push_text(&mut self, text: &str) {
        if let Some(open) = self.open.as_mut() {
            open.content.text.push_str(text);
        }
    }

    fn push_separator(&mut self) {
        if let Some(open) = self.open.as_mut() {
            if !open.content.text.is_empty() {
                open.content.text.push(' ');
            }
        }
    }

    fn close(&mut self) {
        let Some(OpenBlock { kind, mut content }) = self.open.take() else {
            return;
        };
        content.text = if kind == BlockKind::Code {
            content.text.trim_end_matches('\n').to_string()
        } else {
            content.text.trim().to_string()
        };
        if content.text.is_empty() {
            return;
        }
        self.blocks.push(Block::new(kind, content));
    }

    fn finish(mut self) -> Vec<Block> {
        self.close();
        self.blocks
    }
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

/// Render blocks back to editor Markdown.
#[must_use]
pub fn render_blocks(blocks: &[Block]) -> String {
    let mut out = String::new();
    let mut previous: Option<BlockKind> = None;

    for block in blocks {
        if let Some(prev) = previous {
            // Adjacent list items stay in one tight list
            if prev.is_list_item() && block.kind.is_list_item() {
                out.push('\n');
            } else {
                out.push_str("\n\n");
            }
        }
        render_block(block, &mut out);
        previous = Some(block.kind);
    }

    if !out.is_empty() {
        out.push('\n');
    }
    out
}

fn render_block(block: &Block, out: &mut String) {
    let text = &block.content.text;
    match block.kind {
        BlockKind::Heading => {
            let level = usize::from(block.content.level.unwrap_or(1).clamp(1, 6));
            out.push_str(&"#".repeat(level));
            out.push(' ');
            out.push_str(text);
        }
        BlockKind::Paragraph => push_lines(text, "", out),
        BlockKind::Bullet => {
            out.push_str("- ");
            if starts_with_task_marker(text) {
                out.push('\\');
            }
            push_lines(text, "  ", out);
        }
        BlockKind::Checklist => {
            out.push_str(if block.is_checked() { "- [x] " } else { "- [ ] " });
            push_lines(text, "  ", out);
        }
        BlockKind::Code => {
            out.push_str("```");
            if let Some(language) = &block.content.language {
                out.push_str(language);
            }
            out.push('\n');
            out.push_str(text);
            out.push_str("\n```");
        }
        BlockKind::Quote => {
            out.push_str("> ");
            push_lines(text, "> ", out);
        }
    }
}

/// Write `text`, turning each newline into a hard break followed by
/// `continuation`, and escaping lines that would open another block.
fn push_lines(text: &str, continuation: &str, out: &mut String) {
    for (index, line) in text.split('\n').enumerate() {
        if index > 0 {
            out.push_str("\\\n");
            out.push_str(continuation);
        }
        match block_marker_at(line) {
            Some(at) => {
                out.push_str(&line[..at]);
                out.push('\\');
                out.push_str(&line[at..]);
            }
            None => out.push_str(line),
        }
    }
}

/// Byte offset of the character that makes `line` start a heading, quote,
/// list item, rule, fence or HTML block.
fn block_marker_at(line: &str) -> Option<usize> {
    let bytes = line.as_bytes();
    let first = *bytes.first()?;
    let followed_by_space = |at: usize| matches!(bytes.get(at), None | Some(b' ' | b'\t'));
    let is_rule = || line.chars().all(|c| c == char::from(first) || c == ' ' || c == '\t');

    match first {
        b'#' | b'>' | b'<' => Some(0),
        b'-' | b'+' | b'*' if followed_by_space(1) => Some(0),
        b'-' | b'*' | b'_' | b'=' if is_rule() => Some(0),
        b'`' | b'~' if line.starts_with("```") || line.starts_with("~~~") => Some(0),
        b'0'..=b'9' => {
            let digits = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
            let ordered = digits <= 9
                && matches!(bytes.get(digits), Some(b'.' | b')'))
                && followed_by_space(digits + 1);
            ordered.then_some(digits)
        }
        _ => None,
    }
}

fn starts_with_task_marker(text: &str) -> bool {
    ["[ ]", "[x]", "[X]"].iter().any(|marker| {
        text.strip_prefix(marker)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with([' ', '\t']))
    })
}

/// The prose of `blocks`, one block per line, without code blocks.
#[must_use]
pub fn plain_text(blocks: &[Block]) -> String {
    blocks
        .iter()
        .filter(|block| block.kind != BlockKind::Code)
        .map(|block| block.content.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Result of merging incoming blocks into the stored sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    /// The merged sequence to store.
    pub blocks: Vec<Block>,
    /// Stored blocks whose content changed in place.
    pub updated: usize,
    /// Incoming blocks appended past the stored length.
    pub appended: usize,
}

impl Reconciled {
    /// Whether the merge changed anything.
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        self.updated == 0 && self.appended == 0
    }
}

/// Merge `incoming` into `previous` by position.
///
/// Index `i` of `previous` takes the kind and content of index `i` of
/// `incoming`, keeping its id. Incoming blocks past the stored length are
/// appended. Stored blocks past the incoming length are kept as they are.
#[must_use]
pub fn reconcile(previous: &[Block], incoming: Vec<Block>) -> Reconciled {
    let mut blocks = previous.to_vec();
    let mut updated = 0;
    let mut appended = 0;

    for (index, block) in incoming.into_iter().enumerate() {
        match blocks.get_mut(index) {
            Some(existing) => {
                if !existing.same_content(&block) {
                    existing.kind = block.kind;
                    existing.content = block.content;
                    existing.timestamp = block.timestamp;
                    updated += 1;
                }
            }
            None => {
                blocks.push(block);
                appended += 1;
            }
        }
    }

    Reconciled {
        blocks,
        updated,
        appended,
    }
}

/// Checklist texts ticked in `incoming` that were not ticked in `previous`.
///
/// Matching is by text rather than position, so inserting a line above a
/// ticked item does not report it again. Unticking is not reported.
#[must_use]
pub fn newly_checked(previous: &[Block], incoming: &[Block]) -> Vec<String> {
    let already: HashSet<&str> = previous
        .iter()
        .filter(|block| block.is_checked())
        .map(|block| block.content.text.as_str())
        .collect();

    let mut seen = HashSet::new();
    incoming
        .iter()
        .filter(|block| block.is_checked())
        .map(|block| block.content.text.as_str())
        .filter(|text| !already.contains(text) && seen.insert(*text))
        .map(str::to_string)
        .collect()
}
