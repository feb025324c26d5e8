//! HTML parsing into the rich-text model

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node};

use super::{Align, Block, BlockKind, Inline, Marks};

/// Elements removed together with everything inside them
const DROPPED: &[&str] = &[
    "script", "style", "iframe", "object", "embed", "noscript", "template", "svg", "math",
    "textarea", "select", "head", "title", "frameset", "frame", "applet",
];

/// Elements that start a new paragraph when unwrapped
const BLOCK_CONTAINERS: &[&str] = &[
    "p", "div", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "pre", "section", "article",
    "header", "footer", "aside", "nav", "main", "address", "figure", "figcaption", "table",
    "thead", "tbody", "tfoot", "tr", "td", "th", "caption", "dl", "dt", "dd", "center", "hr",
];

#[derive(Debug, Clone, Copy)]
struct Context {
    marks: Marks,
    align: Align,
    /// Kind of list the walker is inside, if any
    list: Option<BlockKind>,
    /// Kind of the list item the walker is inside, if any
    item: Option<BlockKind>,
}

/// Pending work for the tree walkers, kept on an explicit stack so nesting
/// depth never grows the call stack
enum Step<'a> {
    Element(ElementRef<'a>, Context),
    Text(&'a str, Context),
    /// Close the current block once an element's children are done
    Flush,
}

/// Push the children of `element` so they pop in document order
fn push_children<'a>(stack: &mut Vec<Step<'a>>, element: ElementRef<'a>, ctx: Context) {
    let start = stack.len();
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let text: &'a str = text;
                if !text.is_empty() {
                    stack.push(Step::Text(text, ctx));
                }
            }
            Node::Element(_) => {
                if let Some(child_element) = ElementRef::wrap(child) {
                    stack.push(Step::Element(child_element, ctx));
                }
            }
            _ => {}
        }
    }
    stack[start..].reverse();
}

struct BlockBuilder {
    blocks: Vec<Block>,
    current: Option<Block>,
}

impl BlockBuilder {
    fn new() -> Self {
        Self {
            blocks: Vec::new(),
            current: None,
        }
    }

    fn current(&mut self, ctx: &Context) -> &mut Block {
        self.current.get_or_insert_with(|| {
            Block::new(ctx.item.unwrap_or(BlockKind::Paragraph), ctx.align)
        })
    }

    fn flush(&mut self) {
        if let Some(mut block) = self.current.take() {
            block.normalize();
            if !block.inlines.is_empty() {
                self.blocks.push(block);
            }
        }
    }

    fn walk(&mut self, root: ElementRef<'_>, ctx: Context) {
        let mut stack = Vec::new();
        push_children(&mut stack, root, ctx);
        while let Some(step) = stack.pop() {
            match step {
                Step::Text(text, ctx) => self.current(&ctx).inlines.push(Inline::Text {
                    text: text.to_string(),
                    marks: ctx.marks,
                }),
                Step::Flush => self.flush(),
                Step::Element(element, ctx) => self.open_element(&mut stack, element, ctx),
            }
        }
    }

    fn open_element<'a>(
        &mut self,
        stack: &mut Vec<Step<'a>>,
        element: ElementRef<'a>,
        ctx: Context,
    ) {
        let name = element.value().name().to_ascii_lowercase();
        let name = name.as_str();
        if DROPPED.contains(&name) {
            return;
        }

        let mut inner = ctx;
        apply_style_marks(element, &mut inner.marks);

        match name {
            "br" => self.current(&ctx).inlines.push(Inline::Break),
            "b" | "strong" => {
                inner.marks.bold = true;
                push_children(stack, element, inner);
            }
            "i" | "em" => {
                inner.marks.italic = true;
                push_children(stack, element, inner);
            }
            "u" | "ins" => {
                inner.marks.underline = true;
                push_children(stack, element, inner);
            }
            "ul" | "ol" => {
                self.flush();
                inner.list = Some(if name == "ol" {
                    BlockKind::Numbered
                } else {
                    BlockKind::Bullet
                });
                inner.item = None;
                stack.push(Step::Flush);
                push_children(stack, element, inner);
            }
            "li" => {
                self.flush();
                let kind = ctx.list.unwrap_or(BlockKind::Bullet);
                inner.item = Some(kind);
                inner.align = element_align(element).unwrap_or(ctx.align);
                self.current = Some(Block::new(kind, inner.align));
                stack.push(Step::Flush);
                push_children(stack, element, inner);
            }
            _ if BLOCK_CONTAINERS.contains(&name) => {
                if ctx.item.is_some() {
                    // Inside a list item a block container only breaks the line
                    let has_content = self
                        .current
                        .as_ref()
                        .is_some_and(|b| !b.inlines.is_empty());
                    if has_content {
                        self.current(&ctx).inlines.push(Inline::Break);
                    }
                    push_children(stack, element, inner);
                } else {
                    self.flush();
                    inner.align = element_align(element).unwrap_or(ctx.align);
                    stack.push(Step::Flush);
                    push_children(stack, element, inner);
                }
            }
            _ => push_children(stack, element, inner),
        }
    }
}

/// Parse a fragment into normalized blocks
pub(super) fn parse_blocks(raw_html: &str) -> Vec<Block> {
    let fragment = Html::parse_fragment(raw_html);
    let mut builder = BlockBuilder::new();
    let ctx = Context {
        marks: Marks::PLAIN,
        align: Align::Left,
        list: None,
        item: None,
    };
    builder.walk(fragment.root_element(), ctx);
    builder.flush();
    builder.blocks
}

fn style_declarations(element: ElementRef<'_>) -> Vec<(String, String)> {
    element
        .value()
        .attr("style")
        .map(|style| {
            style
                .split(';')
                .filter_map(|decl| decl.split_once(':'))
                .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_ascii_lowercase()))
                .collect()
        })
        .unwrap_or_default()
}

fn apply_style_marks(element: ElementRef<'_>, marks: &mut Marks) {
    for (property, value) in style_declarations(element) {
        match property.as_str() {
            "font-weight" => {
                if matches!(value.as_str(), "bold" | "bolder" | "600" | "700" | "800" | "900") {
                    marks.bold = true;
                }
            }
            "font-style" => {
                if matches!(value.as_str(), "italic" | "oblique") {
                    marks.italic = true;
                }
            }
            "text-decoration" | "text-decoration-line" => {
                if value.contains("underline") {
                    marks.underline = true;
                }
            }
            _ => {}
        }
    }
}

fn element_align(element: ElementRef<'_>) -> Option<Align> {
    let from_style = style_declarations(element)
        .into_iter()
        .find(|(property, _)| property == "text-align")
        .and_then(|(_, value)| Align::parse(&value));
    if from_style.is_some() {
        return from_style;
    }
    if let Some(align) = element.value().attr("align").and_then(Align::parse) {
        return Some(align);
    }
    element
        .value()
        .classes()
        .find_map(|class| class.strip_prefix("ql-align-").and_then(Align::parse))
}

/// Reduce markup to plain text, keeping line structure.
///
/// Used for party names and addresses, where line breaks typed by the user
/// matter and HTML whitespace collapsing would lose them.
pub fn plain_text(raw: &str) -> String {
    if !raw.contains(['<', '&']) {
        return raw.to_string();
    }
    let fragment = Html::parse_fragment(raw);
    let mut out = String::new();
    collect_text(fragment.root_element(), &mut out);
    out
}

fn collect_text(root: ElementRef<'_>, out: &mut String) {
    enum Pending<'a> {
        Text(&'a str),
        Element(ElementRef<'a>),
        EndBlock,
    }

    fn push_pending<'a>(stack: &mut Vec<Pending<'a>>, element: ElementRef<'a>) {
        let start = stack.len();
        for child in element.children() {
            match child.value() {
                Node::Text(text) => {
                    let text: &'a str = text;
                    stack.push(Pending::Text(text));
                }
                Node::Element(_) => {
                    if let Some(child_element) = ElementRef::wrap(child) {
                        stack.push(Pending::Element(child_element));
                    }
                }
                _ => {}
            }
        }
        stack[start..].reverse();
    }

    let mut stack = Vec::new();
    push_pending(&mut stack, root);
    while let Some(pending) = stack.pop() {
        match pending {
            Pending::Text(text) => out.push_str(text),
            Pending::EndBlock => {
                if !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            Pending::Element(element) => {
                let name = element.value().name().to_ascii_lowercase();
                if DROPPED.contains(&name.as_str()) {
                    continue;
                }
                if name == "br" {
                    out.push('\n');
                    continue;
                }
                let is_block = name == "li" || BLOCK_CONTAINERS.contains(&name.as_str());
                if is_block {
                    if !out.is_empty() && !out.ends_with('\n') {
                        out.push('\n');
                    }
                    stack.push(Pending::EndBlock);
                }
                push_pending(&mut stack, element);
            }
        }
    }
}

static TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<(/?)([a-zA-Z][a-zA-Z0-9]*)[^<>]*>"#).expect("valid regex"));

/// Check that every tag in sanitized output is balanced and properly nested
pub fn is_well_formed(html: &str) -> bool {
    let mut stack: Vec<String> = Vec::new();
    let mut last_end = 0;
    for caps in TAG_RE.captures_iter(html) {
        let whole = caps.get(0).map_or(0..0, |m| m.range());
        if html[last_end..whole.start].contains(['<', '>']) {
            return false;
        }
        last_end = whole.end;

        let name = caps[2].to_ascii_lowercase();
        if name == "br" {
            continue;
        }
        if &caps[1] == "/" {
            if stack.pop().as_deref() != Some(name.as_str()) {
                return false;
            }
        } else {
            stack.push(name);
        }
    }
    !html[last_end..].contains(['<', '>']) && stack.is_empty()
}
