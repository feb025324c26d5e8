//! Rich-text sanitizing
//!
//! Editor HTML is parsed with an HTML5 parser and reduced to a small model:
//! a list of blocks (paragraph, bullet item, numbered item), each holding
//! inline runs with bold/italic/underline marks and line breaks. The model
//! serialises back to canonical HTML using only `p`, `ul`, `ol`, `li`,
//! `strong`, `em`, `u` and `br`, so sanitizing its own output is a no-op.

mod html;

pub use html::{is_well_formed, plain_text};

/// Sanitize editor HTML to the allow-listed subset
pub fn sanitize(raw_html: &str) -> String {
    RichText::from_html(raw_html).to_html()
}

/// Inline formatting flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Marks {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
}

impl Marks {
    pub const PLAIN: Marks = Marks {
        bold: false,
        italic: false,
        underline: false,
    };
}

/// Inline content of a block
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline {
    Text { text: String, marks: Marks },
    Break,
}

/// Paragraph alignment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
    Justify,
}

impl Align {
    pub(crate) fn parse(value: &str) -> Option<Align> {
        match value.trim().to_ascii_lowercase().as_str() {
            "left" | "start" => Some(Align::Left),
            "center" | "middle" => Some(Align::Center),
            "right" | "end" => Some(Align::Right),
            "justify" => Some(Align::Justify),
            _ => None,
        }
    }

    fn css(self) -> Option<&'static str> {
        match self {
            Align::Left => None,
            Align::Center => Some("center"),
            Align::Right => Some("right"),
            Align::Justify => Some("justify"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Paragraph,
    Bullet,
    Numbered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    pub align: Align,
    pub inlines: Vec<Inline>,
}

impl Block {
    pub(crate) fn new(kind: BlockKind, align: Align) -> Self {
        Self {
            kind,
            align,
            inlines: Vec::new(),
        }
    }

    fn is_list_item(&self) -> bool {
        self.kind != BlockKind::Paragraph
    }

    /// Collapse whitespace across runs, merge equal runs and trim the edges.
    /// Applied once per block while parsing; a normalized block is a fixed point.
    pub(crate) fn normalize(&mut self) {
        let mut out: Vec<Inline> = Vec::with_capacity(self.inlines.len());
        // True at block start and after a break, where leading spaces are dropped
        let mut at_line_start = true;

        for inline in self.inlines.drain(..) {
            match inline {
                Inline::Break => {
                    trim_trailing_space(&mut out);
                    out.push(Inline::Break);
                    at_line_start = true;
                }
                Inline::Text { text, marks } => {
                    let mut text = collapse_whitespace(&text);
                    let prev_ends_with_space = matches!(
                        out.last(),
                        Some(Inline::Text { text, .. }) if text.ends_with(' ')
                    );
                    if (at_line_start || prev_ends_with_space) && text.starts_with(' ') {
                        text.remove(0);
                    }
                    if text.is_empty() {
                        continue;
                    }
                    at_line_start = false;
                    match out.last_mut() {
                        Some(Inline::Text {
                            text: prev,
                            marks: prev_marks,
                        }) if *prev_marks == marks => prev.push_str(&text),
                        _ => out.push(Inline::Text { text, marks }),
                    }
                }
            }
        }
        trim_trailing_space(&mut out);
        self.inlines = out;
    }

    fn has_text(&self) -> bool {
        self.inlines
            .iter()
            .any(|i| matches!(i, Inline::Text { text, .. } if !text.is_empty()))
    }
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_ascii_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

fn trim_trailing_space(inlines: &mut Vec<Inline>) {
    if let Some(Inline::Text { text, .. }) = inlines.last_mut() {
        if text.ends_with(' ') {
            text.pop();
            if text.is_empty() {
                inlines.pop();
            }
        }
    }
}

/// Sanitized rich text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RichText {
    blocks: Vec<Block>,
}

impl RichText {
    /// Parse editor HTML; disallowed markup is stripped, never escaped
    pub fn from_html(raw_html: &str) -> Self {
        Self {
            blocks: html::parse_blocks(raw_html),
        }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// True when there is no visible text
    pub fn is_blank(&self) -> bool {
        !self.blocks.iter().any(Block::has_text)
    }

    /// List marker for each block (`"1."`, `"•"`), numbering restarting
    /// whenever a numbered run is interrupted
    pub fn markers(&self) -> Vec<Option<String>> {
        let mut counter = 0usize;
        self.blocks
            .iter()
            .map(|block| match block.kind {
                BlockKind::Numbered => {
                    counter += 1;
                    Some(format!("{}.", counter))
                }
                BlockKind::Bullet => {
                    counter = 0;
                    Some("•".to_string())
                }
                BlockKind::Paragraph => {
                    counter = 0;
                    None
                }
            })
            .collect()
    }

    /// Plain-text projection, one line per block
    pub fn plain_text(&self) -> String {
        let markers = self.markers();
        let mut lines = Vec::with_capacity(self.blocks.len());
        for (block, marker) in self.blocks.iter().zip(markers) {
            let mut line = String::new();
            if let Some(marker) = marker {
                line.push_str(&marker);
                line.push(' ');
            }
            for inline in &block.inlines {
                match inline {
                    Inline::Text { text, .. } => line.push_str(text),
                    Inline::Break => line.push('\n'),
                }
            }
            lines.push(line);
        }
        lines.join("\n")
    }

    /// Canonical HTML serialisation
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        let mut open_list: Option<BlockKind> = None;

        for block in &self.blocks {
            let wanted = block.is_list_item().then_some(block.kind);
            if open_list != wanted {
                if let Some(kind) = open_list {
                    out.push_str(list_tag(kind, true));
                }
                if let Some(kind) = wanted {
                    out.push_str(list_tag(kind, false));
                }
                open_list = wanted;
            }

            let tag = if block.is_list_item() { "li" } else { "p" };
            out.push('<');
            out.push_str(tag);
            if let Some(align) = block.align.css() {
                out.push_str(" style=\"text-align:");
                out.push_str(align);
                out.push('"');
            }
            out.push('>');
            for inline in &block.inlines {
                match inline {
                    Inline::Break => out.push_str("<br>"),
                    Inline::Text { text, marks } => push_run(&mut out, text, *marks),
                }
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
        if let Some(kind) = open_list {
            out.push_str(list_tag(kind, true));
        }
        out
    }
}

fn list_tag(kind: BlockKind, close: bool) -> &'static str {
    match (kind, close) {
        (BlockKind::Numbered, false) => "<ol>",
        (BlockKind::Numbered, true) => "</ol>",
        (_, false) => "<ul>",
        (_, true) => "</ul>",
    }
}

fn push_run(out: &mut String, text: &str, marks: Marks) {
    if marks.bold {
        out.push_str("<strong>");
    }
    if marks.italic {
        out.push_str("<em>");
    }
    if marks.underline {
        out.push_str("<u>");
    }
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    if marks.underline {
        out.push_str("</u>");
    }
    if marks.italic {
        out.push_str("</em>");
    }
    if marks.bold {
        out.push_str("</strong>");
    }
}
