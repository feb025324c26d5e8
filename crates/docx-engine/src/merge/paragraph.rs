//! Paragraph-level template rendering for WordprocessingML parts
//!
//! Word splits typed text into runs at arbitrary points (spell check, edits,
//! formatting changes), so a placeholder like `{{ district }}` is often spread
//! over several `<w:r>` elements. Paragraphs are therefore the unit of work:
//! their text is joined, placeholders are matched on the joined text, and the
//! paragraph is rebuilt with the formatting of its first text run. Paragraphs
//! without template syntax pass through byte-identical.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use super::context::{LoopFrame, MergeContext, Resolved};
use crate::error::EngineError;
use crate::sanitize::{Align, Inline, Marks, RichText};

static PARAGRAPH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<w:p(?:\s[^>]*[^/])?>.*?</w:p>").expect("valid regex"));
static PPR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*<w:pPr>.*?</w:pPr>").expect("valid regex"));
static RUN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<w:r(?:\s[^>]*[^/])?>(.*?)</w:r>").expect("valid regex"));
static RPR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*<w:rPr>.*?</w:rPr>").expect("valid regex"));
static TEXT_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?s)<w:t(?:\s[^>]*)?/>|<w:t(?:\s[^>]*)?>(.*?)</w:t>|<w:tab/>|<w:br(\s[^>]*)?/>|<w:cr/>"#,
    )
    .expect("valid regex")
});
static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*(?:r\s+)?([A-Za-z_]\w*(?:\.[A-Za-z_]\w*)*)\s*\}\}").expect("valid regex")
});
static LOOP_START_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\{%-?\s*p\s+for\s+([A-Za-z_]\w*)\s+in\s+([A-Za-z_]\w*)\s*-?%\}\s*$")
        .expect("valid regex")
});
static LOOP_END_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\{%-?\s*p\s+endfor\s*-?%\}\s*$").expect("valid regex"));
static TABLE_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<(/?)w:(tbl|tr|tc)[\s>]").expect("valid regex"));
static PARAGRAPH_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\s+w14:(?:paraId|textId)="[^"]*""#).expect("valid regex"));

/// Schema order of `w:rPr` children
const RUN_PROPERTY_ORDER: &[&str] = &[
    "rStyle", "rFonts", "b", "bCs", "i", "iCs", "caps", "smallCaps", "strike", "dstrike",
    "outline", "shadow", "emboss", "imprint", "noProof", "snapToGrid", "vanish", "webHidden",
    "color", "spacing", "w", "kern", "position", "sz", "szCs", "highlight", "u", "effect", "bdr",
    "shd", "fitText", "vertAlign", "rtl", "cs", "em", "lang", "eastAsianLayout", "specVanish",
    "oMath", "rPrChange",
];

/// Schema order of `w:pPr` children
const PARAGRAPH_PROPERTY_ORDER: &[&str] = &[
    "pStyle", "keepNext", "keepLines", "pageBreakBefore", "framePr", "widowControl", "numPr",
    "suppressLineNumbers", "pBdr", "shd", "tabs", "suppressAutoHyphens", "kinsoku", "wordWrap",
    "overflowPunct", "topLinePunct", "autoSpaceDE", "autoSpaceDN", "bidi", "adjustRightInd",
    "snapToGrid", "spacing", "ind", "contextualSpacing", "mirrorIndents", "suppressOverlap",
    "jc", "textDirection", "textAlignment", "textboxTightWrap", "outlineLvl", "divId",
    "cnfStyle", "rPr", "sectPr", "pPrChange",
];

/// Hanging indent for list items, in twentieths of a point
const LIST_INDENT: &str = r#"<w:ind w:left="720" w:hanging="360"/>"#;

const PAGE_BREAK: char = '\u{c}';

/// A paragraph and the pieces needed to rebuild it
#[derive(Debug)]
struct Paragraph<'a> {
    xml: &'a str,
    open_tag: &'a str,
    properties: Option<&'a str>,
    run_properties: Option<&'a str>,
    /// Joined text; tabs, line breaks and page breaks as control characters
    text: String,
}

impl<'a> Paragraph<'a> {
    fn parse(xml: &'a str) -> Self {
        let open_end = xml.find('>').map_or(xml.len(), |i| i + 1);
        let open_tag = &xml[..open_end];
        let after_open = &xml[open_end..];

        let (properties, runs) = match PPR_RE.find(after_open) {
            Some(m) => (Some(m.as_str().trim_start()), &after_open[m.end()..]),
            None => (None, after_open),
        };

        let run_properties = RUN_RE
            .captures_iter(runs)
            .filter_map(|caps| caps.get(1))
            .find(|body| body.as_str().contains("<w:t"))
            .and_then(|body| RPR_RE.find(body.as_str()))
            .map(|m| m.as_str().trim_start());

        let mut text = String::new();
        for caps in TEXT_TOKEN_RE.captures_iter(runs) {
            let token = caps.get(0).map_or("", |m| m.as_str());
            if let Some(content) = caps.get(1) {
                text.push_str(&unescape_xml(content.as_str()));
            } else if token.starts_with("<w:tab") {
                text.push('\t');
            } else if token.starts_with("<w:br") {
                let is_page = caps
                    .get(2)
                    .is_some_and(|attrs| attrs.as_str().contains("w:type=\"page\""));
                text.push(if is_page { PAGE_BREAK } else { '\n' });
            } else if token.starts_with("<w:cr") {
                text.push('\n');
            }
        }

        Self {
            xml,
            open_tag,
            properties,
            run_properties,
            text,
        }
    }

    fn has_syntax(&self) -> bool {
        self.text.contains("{{") || self.text.contains("{%")
    }

    fn base_run_properties(&self) -> &str {
        self.run_properties.unwrap_or("")
    }
}

enum Segment<'a> {
    Xml(&'a str),
    Paragraph(Paragraph<'a>),
}

enum LoopMarker<'a> {
    Start { var: &'a str, source: &'a str },
    End,
}

fn loop_marker<'a>(paragraph: &'a Paragraph<'_>) -> Option<LoopMarker<'a>> {
    if let Some(caps) = LOOP_START_RE.captures(&paragraph.text) {
        let var = caps.get(1)?.as_str();
        let source = caps.get(2)?.as_str();
        return Some(LoopMarker::Start { var, source });
    }
    LOOP_END_RE
        .is_match(&paragraph.text)
        .then_some(LoopMarker::End)
}

fn split_segments(xml: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut last = 0;
    for m in PARAGRAPH_RE.find_iter(xml) {
        if m.start() > last {
            segments.push(Segment::Xml(&xml[last..m.start()]));
        }
        segments.push(Segment::Paragraph(Paragraph::parse(m.as_str())));
        last = m.end();
    }
    if last < xml.len() {
        segments.push(Segment::Xml(&xml[last..]));
    }
    segments
}

/// Render one WordprocessingML part against `ctx`
pub(crate) fn render_part(xml: &str, ctx: &MergeContext) -> Result<String, EngineError> {
    let segments = split_segments(xml);
    let mut out = String::with_capacity(xml.len() + xml.len() / 4);
    render_segments(&segments, ctx, None, &mut out)?;
    Ok(out)
}

fn render_segments(
    segments: &[Segment<'_>],
    ctx: &MergeContext,
    frame: Option<&LoopFrame<'_>>,
    out: &mut String,
) -> Result<(), EngineError> {
    let mut index = 0;
    while index < segments.len() {
        match &segments[index] {
            Segment::Xml(xml) => push_xml(out, xml, frame.is_some()),
            Segment::Paragraph(paragraph) => match loop_marker(paragraph) {
                Some(LoopMarker::Start { var, source }) => {
                    if frame.is_some() {
                        return Err(EngineError::Generation(format!(
                            "nested loop over '{}' is not supported",
                            source
                        )));
                    }
                    let end = find_loop_end(segments, index + 1, source)?;
                    let body = &segments[index + 1..end];
                    check_loop_body(body, source)?;
                    let entries = ctx.list(source).ok_or_else(|| {
                        EngineError::Generation(format!("unknown loop source '{}'", source))
                    })?;
                    for (position, entry) in entries.iter().enumerate() {
                        let item = LoopFrame {
                            var,
                            entry,
                            index: position,
                        };
                        render_segments(body, ctx, Some(&item), out)?;
                    }
                    index = end + 1;
                    continue;
                }
                Some(LoopMarker::End) => {
                    return Err(EngineError::Generation(
                        "endfor without a matching for".to_string(),
                    ));
                }
                None if paragraph.has_syntax() => {
                    let rendered = render_paragraph(paragraph, ctx, frame);
                    push_xml(out, &rendered, frame.is_some());
                }
                None => push_xml(out, paragraph.xml, frame.is_some()),
            },
        }
        index += 1;
    }
    Ok(())
}

/// Repeated content must not duplicate paragraph ids
fn push_xml(out: &mut String, xml: &str, repeated: bool) {
    if repeated {
        out.push_str(&PARAGRAPH_ID_RE.replace_all(xml, ""));
    } else {
        out.push_str(xml);
    }
}

fn find_loop_end(segments: &[Segment<'_>], from: usize, source: &str) -> Result<usize, EngineError> {
    for (offset, segment) in segments[from..].iter().enumerate() {
        if let Segment::Paragraph(paragraph) = segment {
            match loop_marker(paragraph) {
                Some(LoopMarker::End) => return Ok(from + offset),
                Some(LoopMarker::Start { .. }) => {
                    return Err(EngineError::Generation(format!(
                        "nested loop inside loop over '{}' is not supported",
                        source
                    )));
                }
                None => {}
            }
        }
    }
    Err(EngineError::Generation(format!(
        "loop over '{}' has no endfor",
        source
    )))
}

/// A loop must open and close within the same table cell
fn check_loop_body(body: &[Segment<'_>], source: &str) -> Result<(), EngineError> {
    let crosses = || {
        EngineError::Generation(format!(
            "loop over '{}' crosses a table boundary",
            source
        ))
    };
    let mut depth = [0i64; 3];
    for segment in body {
        if let Segment::Xml(xml) = segment {
            for caps in TABLE_TAG_RE.captures_iter(xml) {
                let slot = match &caps[2] {
                    "tbl" => 0,
                    "tr" => 1,
                    _ => 2,
                };
                depth[slot] += if &caps[1] == "/" { -1 } else { 1 };
                if depth[slot] < 0 {
                    return Err(crosses());
                }
            }
        }
    }
    if depth.iter().all(|d| *d == 0) {
        Ok(())
    } else {
        Err(crosses())
    }
}

enum Piece<'a> {
    Text(String),
    Rich(&'a RichText),
}

fn render_paragraph(paragraph: &Paragraph<'_>, ctx: &MergeContext, frame: Option<&LoopFrame<'_>>) -> String {
    // A rich-text placeholder alone in its paragraph becomes real paragraphs
    if let Some(caps) = PLACEHOLDER_RE.captures(paragraph.text.trim()) {
        let whole = caps.get(0).map_or(0, |m| m.len());
        if whole == paragraph.text.trim().len() {
            if let Some(Resolved::Rich(rich)) = ctx.resolve(&caps[1], frame) {
                return expand_rich_paragraphs(paragraph, rich);
            }
        }
    }

    let mut pieces: Vec<Piece<'_>> = Vec::new();
    let mut literal = String::new();
    let mut last = 0;
    for caps in PLACEHOLDER_RE.captures_iter(&paragraph.text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        literal.push_str(&paragraph.text[last..whole.start()]);
        last = whole.end();
        match ctx.resolve(&caps[1], frame) {
            Some(Resolved::Text(text)) => literal.push_str(&text),
            Some(Resolved::Rich(rich)) => {
                if !literal.is_empty() {
                    pieces.push(Piece::Text(std::mem::take(&mut literal)));
                }
                pieces.push(Piece::Rich(rich));
            }
            None => {
                warn!(placeholder = %&caps[1], "Unknown placeholder left in document");
                literal.push_str(whole.as_str());
            }
        }
    }
    literal.push_str(&paragraph.text[last..]);
    if !literal.is_empty() {
        pieces.push(Piece::Text(literal));
    }

    let base = paragraph.base_run_properties();
    let mut out = String::with_capacity(paragraph.xml.len());
    out.push_str(paragraph.open_tag);
    if let Some(properties) = paragraph.properties {
        out.push_str(properties);
    }
    for piece in pieces {
        match piece {
            Piece::Text(text) => push_run(&mut out, base, &text),
            Piece::Rich(rich) => push_inline_rich(&mut out, base, rich),
        }
    }
    out.push_str("</w:p>");
    out
}

/// Rich text inside a sentence: formatted runs, blocks separated by line breaks
fn push_inline_rich(out: &mut String, base: &str, rich: &RichText) {
    for (index, (block, marker)) in rich.blocks().iter().zip(rich.markers()).enumerate() {
        if index > 0 {
            push_run(out, base, "\n");
        }
        if let Some(marker) = marker {
            push_run(out, base, &format!("{} ", marker));
        }
        push_block_runs(out, base, &block.inlines);
    }
}

fn push_block_runs(out: &mut String, base: &str, inlines: &[Inline]) {
    for inline in inlines {
        match inline {
            Inline::Text { text, marks } => {
                let properties = run_properties_with_marks(base, *marks);
                push_run(out, &properties, text);
            }
            Inline::Break => push_run(out, base, "\n"),
        }
    }
}

/// One template paragraph per block, keeping the template's paragraph style
fn expand_rich_paragraphs(paragraph: &Paragraph<'_>, rich: &RichText) -> String {
    let base = paragraph.base_run_properties();
    let blocks = rich.blocks();
    let mut out = String::new();

    if blocks.is_empty() {
        out.push_str(paragraph.open_tag);
        out.push_str(paragraph.properties.unwrap_or(""));
        out.push_str("</w:p>");
        return out;
    }

    for (index, (block, marker)) in blocks.iter().zip(rich.markers()).enumerate() {
        let is_last = index + 1 == blocks.len();
        if index == 0 {
            out.push_str(paragraph.open_tag);
        } else {
            out.push_str(&PARAGRAPH_ID_RE.replace_all(paragraph.open_tag, ""));
        }
        out.push_str(&block_paragraph_properties(
            paragraph.properties,
            block.align,
            marker.is_some(),
            is_last,
        ));
        if let Some(marker) = marker {
            push_run(&mut out, base, &format!("{}\t", marker));
        }
        push_block_runs(&mut out, base, &block.inlines);
        out.push_str("</w:p>");
    }
    out
}

fn block_paragraph_properties(
    template: Option<&str>,
    align: Align,
    list_item: bool,
    is_last: bool,
) -> String {
    let inner = template.map(|p| element_inner(p, "w:pPr")).unwrap_or("");
    let mut children: Vec<(String, String)> = child_elements(inner)
        .into_iter()
        .filter(|(name, _)| {
            let name = name.as_str();
            !(name == "sectPr" && !is_last
                || name == "jc" && align != Align::Left
                || (name == "ind" || name == "numPr") && list_item)
        })
        .collect();

    if let Some(value) = jc_value(align) {
        children.push(("jc".to_string(), format!(r#"<w:jc w:val="{}"/>"#, value)));
    }
    if list_item {
        children.push(("ind".to_string(), LIST_INDENT.to_string()));
    }
    if children.is_empty() {
        return String::new();
    }
    sort_by_schema(&mut children, PARAGRAPH_PROPERTY_ORDER);

    let mut out = String::from("<w:pPr>");
    for (_, xml) in children {
        out.push_str(&xml);
    }
    out.push_str("</w:pPr>");
    out
}

fn jc_value(align: Align) -> Option<&'static str> {
    match align {
        Align::Left => None,
        Align::Center => Some("center"),
        Align::Right => Some("right"),
        Align::Justify => Some("both"),
    }
}

/// The template run formatting plus the rich-text marks
fn run_properties_with_marks(base: &str, marks: Marks) -> String {
    if marks == Marks::PLAIN {
        return base.to_string();
    }
    let inner = if base.is_empty() {
        ""
    } else {
        element_inner(base, "w:rPr")
    };
    let mut children: Vec<(String, String)> = child_elements(inner)
        .into_iter()
        .filter(|(name, _)| {
            !(marks.bold && (name == "b" || name == "bCs")
                || marks.italic && (name == "i" || name == "iCs")
                || marks.underline && name == "u")
        })
        .collect();

    if marks.bold {
        children.push(("b".to_string(), "<w:b/>".to_string()));
        children.push(("bCs".to_string(), "<w:bCs/>".to_string()));
    }
    if marks.italic {
        children.push(("i".to_string(), "<w:i/>".to_string()));
        children.push(("iCs".to_string(), "<w:iCs/>".to_string()));
    }
    if marks.underline {
        children.push(("u".to_string(), r#"<w:u w:val="single"/>"#.to_string()));
    }
    sort_by_schema(&mut children, RUN_PROPERTY_ORDER);

    let mut out = String::from("<w:rPr>");
    for (_, xml) in children {
        out.push_str(&xml);
    }
    out.push_str("</w:rPr>");
    out
}

fn sort_by_schema(children: &mut [(String, String)], order: &[&str]) {
    children.sort_by_key(|(name, _)| {
        order
            .iter()
            .position(|known| known == name)
            .unwrap_or(order.len())
    });
}

/// Content between the start and end tags of an element
fn element_inner<'a>(xml: &'a str, tag: &str) -> &'a str {
    let start = xml.find('>').map_or(0, |i| i + 1);
    let close = format!("</{}>", tag);
    let end = xml.rfind(&close).unwrap_or(xml.len());
    if start <= end {
        &xml[start..end]
    } else {
        ""
    }
}

/// Direct `w:` children of a property element as `(local name, xml)`
fn child_elements(inner: &str) -> Vec<(String, String)> {
    let mut children = Vec::new();
    let mut pos = 0;
    while let Some(found) = inner[pos..].find('<') {
        let start = pos + found;
        let Some(tag_len) = inner[start..].find('>') else {
            break;
        };
        let tag_end = start + tag_len + 1;
        let tag = &inner[start..tag_end];
        if tag.starts_with("</") {
            pos = tag_end;
            continue;
        }
        let qualified = tag[1..]
            .split(|c: char| c.is_whitespace() || c == '/' || c == '>')
            .next()
            .unwrap_or("");
        let local = qualified.strip_prefix("w:").unwrap_or(qualified).to_string();

        let end = if tag.ends_with("/>") {
            tag_end
        } else {
            let close = format!("</{}>", qualified);
            inner[tag_end..]
                .find(&close)
                .map_or(inner.len(), |i| tag_end + i + close.len())
        };
        children.push((local, inner[start..end].to_string()));
        pos = end;
    }
    children
}

/// Emit one run for `text`, mapping control characters to Word elements
fn push_run(out: &mut String, properties: &str, text: &str) {
    if text.is_empty() {
        return;
    }
    out.push_str("<w:r>");
    out.push_str(properties);
    let mut pending = String::new();
    for c in text.chars() {
        let element = match c {
            '\n' => Some("<w:br/>"),
            '\t' => Some("<w:tab/>"),
            PAGE_BREAK => Some(r#"<w:br w:type="page"/>"#),
            '\r' => None,
            c if (c as u32) < 0x20 => None,
            c => {
                pending.push(c);
                continue;
            }
        };
        flush_text(out, &mut pending);
        if let Some(element) = element {
            out.push_str(element);
        }
    }
    flush_text(out, &mut pending);
    out.push_str("</w:r>");
}

fn flush_text(out: &mut String, pending: &mut String) {
    if pending.is_empty() {
        return;
    }
    out.push_str(r#"<w:t xml:space="preserve">"#);
    escape_xml_into(out, pending);
    out.push_str("</w:t>");
    pending.clear();
}

fn escape_xml_into(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}

fn unescape_xml(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp..];
        let decoded = after.find(';').and_then(|semi| {
            let entity = &after[1..semi];
            let c = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => entity
                    .strip_prefix("#x")
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            }?;
            Some((c, semi + 1))
        });
        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &after[consumed..];
            }
            None => {
                out.push('&');
                rest = &after[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::PartyEntry;
    use pretty_assertions::assert_eq;

    fn context() -> MergeContext {
        let mut ctx = MergeContext::new();
        ctx.insert_text("district", "Pune");
        ctx.insert_text("date", "25/12/2024");
        ctx.insert_rich("main_prayer", RichText::from_html("<b>Grant relief</b> now"));
        ctx.insert_list(
            "petitioners",
            vec![PartyEntry::new("A", "X"), PartyEntry::new("B & Co", "Y\nZ")],
        );
        ctx
    }

    fn body(paragraphs: &str) -> String {
        format!("<w:document><w:body>{}<w:sectPr/></w:body></w:document>", paragraphs)
    }

    #[test]
    fn test_paragraph_without_syntax_untouched() {
        let xml = body(r#"<w:p w:rsidR="00AB"><w:pPr><w:jc w:val="center"/></w:pPr><w:r><w:t>IN THE HIGH COURT</w:t></w:r></w:p><w:p/>"#);
        assert_eq!(render_part(&xml, &context()).unwrap(), xml);
    }

    #[test]
    fn test_placeholder_split_across_runs() {
        let xml = body(
            r#"<w:p><w:r><w:rPr><w:b/></w:rPr><w:t>District: {{ dis</w:t></w:r><w:r><w:t>trict }}</w:t></w:r></w:p>"#,
        );
        let out = render_part(&xml, &context()).unwrap();
        assert_eq!(
            out,
            body(r#"<w:p><w:r><w:rPr><w:b/></w:rPr><w:t xml:space="preserve">District: Pune</w:t></w:r></w:p>"#)
        );
    }

    #[test]
    fn test_unknown_placeholder_kept() {
        let xml = body(r#"<w:p><w:r><w:t>{{ case_no }} of {{ date }}</w:t></w:r></w:p>"#);
        let out = render_part(&xml, &context()).unwrap();
        assert!(out.contains("{{ case_no }} of 25/12/2024"));
    }

    #[test]
    fn test_text_is_escaped_and_breaks_mapped() {
        let mut ctx = context();
        ctx.insert_text("address", "1 <Main> St\nPune\tMH");
        let xml = body(r#"<w:p><w:r><w:t>{{ address }}</w:t></w:r></w:p>"#);
        let out = render_part(&xml, &ctx).unwrap();
        assert!(out.contains(
            r#"<w:t xml:space="preserve">1 &lt;Main&gt; St</w:t><w:br/><w:t xml:space="preserve">Pune</w:t><w:tab/><w:t xml:space="preserve">MH</w:t>"#
        ));
    }

    #[test]
    fn test_standalone_rich_text_expands_to_paragraphs() {
        let mut ctx = context();
        ctx.insert_rich(
            "interim_prayer",
            RichText::from_html(r#"<p style="text-align:center">Stay</p><ol><li><i>one</i></li></ol>"#),
        );
        let xml = body(
            r#"<w:p><w:pPr><w:pStyle w:val="Body"/><w:ind w:left="100"/></w:pPr><w:r><w:t>{{ interim_prayer }}</w:t></w:r></w:p>"#,
        );
        let out = render_part(&xml, &ctx).unwrap();
        assert_eq!(
            out,
            body(concat!(
                r#"<w:p><w:pPr><w:pStyle w:val="Body"/><w:ind w:left="100"/><w:jc w:val="center"/></w:pPr>"#,
                r#"<w:r><w:t xml:space="preserve">Stay</w:t></w:r></w:p>"#,
                r#"<w:p><w:pPr><w:pStyle w:val="Body"/><w:ind w:left="720" w:hanging="360"/></w:pPr>"#,
                r#"<w:r><w:t xml:space="preserve">1.</w:t><w:tab/></w:r>"#,
                r#"<w:r><w:rPr><w:i/><w:iCs/></w:rPr><w:t xml:space="preserve">one</w:t></w:r></w:p>"#,
            ))
        );
    }

    #[test]
    fn test_inline_rich_text_becomes_formatted_runs() {
        let xml = body(
            r#"<w:p><w:r><w:rPr><w:rFonts w:ascii="Arial"/><w:sz w:val="24"/></w:rPr><w:t>Prayer: {{ main_prayer }}.</w:t></w:r></w:p>"#,
        );
        let out = render_part(&xml, &context()).unwrap();
        assert!(out.contains(
            r#"<w:r><w:rPr><w:rFonts w:ascii="Arial"/><w:b/><w:bCs/><w:sz w:val="24"/></w:rPr><w:t xml:space="preserve">Grant relief</w:t></w:r>"#
        ));
        assert!(out.contains(r#"<w:t xml:space="preserve"> now</w:t>"#));
        assert!(out.contains(r#"<w:t xml:space="preserve">.</w:t>"#));
        assert!(!out.contains("<b>"));
    }

    #[test]
    fn test_paragraph_loop_repeats_in_order() {
        let xml = body(concat!(
            r#"<w:p><w:r><w:t>{%p for p in petitioners %}</w:t></w:r></w:p>"#,
            r#"<w:p w14:paraId="1A2B3C4D"><w:r><w:t>{{ loop.index }}. {{ p.name }}</w:t></w:r></w:p>"#,
            r#"<w:p><w:r><w:t>{{ p.address }}</w:t></w:r></w:p>"#,
            r#"<w:p><w:r><w:t>{%p endfor %}</w:t></w:r></w:p>"#,
        ));
        let out = render_part(&xml, &context()).unwrap();
        let a = out.find("1. A").unwrap();
        let b = out.find("2. B &amp; Co").unwrap();
        assert!(a < b);
        assert!(out.contains(r#"<w:t xml:space="preserve">Y</w:t><w:br/><w:t xml:space="preserve">Z</w:t>"#));
        assert!(!out.contains("{%"));
        assert!(!out.contains("paraId"));
    }

    #[test]
    fn test_loop_errors() {
        let unterminated = body(r#"<w:p><w:r><w:t>{%p for p in petitioners %}</w:t></w:r></w:p>"#);
        assert!(matches!(
            render_part(&unterminated, &context()),
            Err(EngineError::Generation(msg)) if msg.contains("no endfor")
        ));

        let unknown = body(concat!(
            r#"<w:p><w:r><w:t>{%p for p in witnesses %}</w:t></w:r></w:p>"#,
            r#"<w:p><w:r><w:t>{%p endfor %}</w:t></w:r></w:p>"#,
        ));
        assert!(matches!(
            render_part(&unknown, &context()),
            Err(EngineError::Generation(msg)) if msg.contains("witnesses")
        ));

        let stray = body(r#"<w:p><w:r><w:t>{%p endfor %}</w:t></w:r></w:p>"#);
        assert!(render_part(&stray, &context()).is_err());
    }

    #[test]
    fn test_loop_across_table_cells_rejected() {
        let xml = body(concat!(
            r#"<w:tbl><w:tr><w:tc><w:p><w:r><w:t>{%p for p in petitioners %}</w:t></w:r></w:p></w:tc>"#,
            r#"<w:tc><w:p><w:r><w:t>{%p endfor %}</w:t></w:r></w:p></w:tc></w:tr></w:tbl>"#,
        ));
        assert!(matches!(
            render_part(&xml, &context()),
            Err(EngineError::Generation(msg)) if msg.contains("table")
        ));
    }

    #[test]
    fn test_entities_in_template_text() {
        let xml = body(r#"<w:p><w:r><w:t>A &amp; B &#x2014; {{ district }}</w:t></w:r></w:p>"#);
        let out = render_part(&xml, &context()).unwrap();
        assert!(out.contains("A &amp; B \u{2014} Pune"));
    }

    #[test]
    fn test_unescape_leaves_unknown_entities() {
        assert_eq!(unescape_xml("a &bogus; b &lt;"), "a &bogus; b <");
        assert_eq!(unescape_xml("&#65;&#x42;"), "AB");
    }

    #[test]
    fn test_child_elements_handles_containers() {
        let children = child_elements(
            r#"<w:pStyle w:val="X"/><w:tabs><w:tab w:val="left" w:pos="720"/></w:tabs><w:rPr><w:b/></w:rPr>"#,
        );
        let names: Vec<&str> = children.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["pStyle", "tabs", "rPr"]);
        assert_eq!(children[2].1, "<w:rPr><w:b/></w:rPr>");
    }
}
