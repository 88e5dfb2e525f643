use crossterm::style::{Attribute, Color as TermColor, ContentStyle, StyledContent};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};
use waterui_fiber::describe::{AttrValue, TEXT_VALUE_KEY};

use crate::host::{NodeKind, TermNode, TerminalHost};

/// Tags laid out inline, on the line of their parent.
const INLINE_TAGS: &[&str] = &["span", "b", "strong", "i", "em", "u", "a", "button", "code", "label"];

/// Represents a fully resolved frame ready to be drawn to the terminal.
#[derive(Debug, Default, Clone)]
pub struct RenderFrame {
    lines: Vec<RenderLine>,
}

impl RenderFrame {
    /// Pushes a finished line.
    pub fn push_line(&mut self, line: RenderLine) {
        self.lines.push(line);
    }

    /// Returns the set of lines recorded in this frame.
    #[must_use]
    pub fn lines(&self) -> &[RenderLine] {
        &self.lines
    }

    /// Appends a blank line.
    pub fn push_blank(&mut self) {
        self.lines.push(RenderLine::default());
    }

    /// Cuts every line to at most `columns` display columns.
    pub fn clip(&mut self, columns: usize) {
        for line in &mut self.lines {
            line.clip(columns);
        }
    }

    /// Consumes the frame, returning its lines.
    #[must_use]
    pub fn into_lines(self) -> Vec<RenderLine> {
        self.lines
    }

    /// The frame as plain text, one line per row.
    #[must_use]
    pub fn to_plain_text(&self) -> String {
        self.lines
            .iter()
            .map(RenderLine::plain_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Representation of a single line in the terminal output.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RenderLine {
    segments: Vec<RenderSegment>,
}

impl RenderLine {
    /// Creates a line starting with `indent` levels of indentation.
    #[must_use]
    pub fn new(indent: usize) -> Self {
        let mut segments = Vec::new();
        if indent > 0 {
            segments.push(RenderSegment::plain(" ".repeat(indent * 2)));
        }
        Self { segments }
    }

    /// Pushes a new segment onto the line.
    pub fn push(&mut self, segment: RenderSegment) {
        self.segments.push(segment);
    }

    /// Returns the list of segments contained in this line.
    #[must_use]
    pub fn segments(&self) -> &[RenderSegment] {
        &self.segments
    }

    /// Display width in terminal columns.
    #[must_use]
    pub fn width(&self) -> usize {
        self.segments.iter().map(|segment| segment.content.width()).sum()
    }

    /// Text of the line without styling.
    #[must_use]
    pub fn plain_text(&self) -> String {
        self.segments.iter().map(RenderSegment::content).collect()
    }

    fn clip(&mut self, columns: usize) {
        let mut used = 0;
        let mut keep = 0;
        for segment in &mut self.segments {
            let remaining = columns - used;
            let width = segment.content.width();
            keep += 1;
            if width <= remaining {
                used += width;
                continue;
            }
            let mut cut = String::new();
            let mut taken = 0;
            for ch in segment.content.chars() {
                let ch_width = ch.width().unwrap_or(0);
                if taken + ch_width > remaining {
                    break;
                }
                taken += ch_width;
                cut.push(ch);
            }
            segment.content = cut;
            break;
        }
        self.segments.truncate(keep);
    }
}

/// Atomic piece of content rendered on a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderSegment {
    content: String,
    style: ContentStyle,
}

impl RenderSegment {
    /// Creates a plain (unstyled) segment.
    pub fn plain(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            style: ContentStyle::new(),
        }
    }

    /// Creates a segment with custom styling.
    pub fn styled(content: impl Into<String>, style: ContentStyle) -> Self {
        Self {
            content: content.into(),
            style,
        }
    }

    /// Borrows the raw text stored in this segment.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Style applied when printed.
    #[must_use]
    pub const fn style(&self) -> &ContentStyle {
        &self.style
    }

    /// Converts this segment into a [`StyledContent`] for printing through crossterm.
    #[must_use]
    pub fn as_styled_content(&self) -> StyledContent<String> {
        self.style.apply(self.content.clone())
    }
}

/// Walks the terminal host tree and produces frames.
///
/// Elements are blocks unless their tag is inline (`span`, `b`, `button`, ...). A block starts a
/// new line; nested blocks are indented one level further. Inline content flows on the current
/// line. Elements read `bold`, `italic`, `underline`, `color` and `background` properties.
#[derive(Debug, Default)]
pub struct Renderer;

impl Renderer {
    /// Creates a new renderer instance.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Renders everything attached under the host root.
    #[must_use]
    pub fn render(&self, host: &TerminalHost) -> RenderFrame {
        let mut frame = RenderFrame::default();
        self.render_content(host, host.root(), 0, 0, ContentStyle::new(), &mut frame);
        frame
    }

    /// Lays out the children of `node`: inline runs at `indent`, blocks at `block_indent`.
    fn render_content(
        &self,
        host: &TerminalHost,
        node: TermNode,
        indent: usize,
        block_indent: usize,
        style: ContentStyle,
        frame: &mut RenderFrame,
    ) {
        let mut line: Option<RenderLine> = None;
        for &child in host.children(node) {
            if is_block(host, child) {
                if let Some(line) = line.take() {
                    frame.push_line(line);
                }
                self.render_block(host, child, block_indent, style, frame);
            } else {
                let line = line.get_or_insert_with(|| RenderLine::new(indent));
                Self::render_inline(host, child, style, line);
            }
        }
        if let Some(line) = line {
            frame.push_line(line);
        }
    }

    fn render_block(
        &self,
        host: &TerminalHost,
        node: TermNode,
        indent: usize,
        inherited: ContentStyle,
        frame: &mut RenderFrame,
    ) {
        let Some(data) = host.node(node) else {
            return;
        };
        let tag = match &data.kind {
            NodeKind::Element(tag) => tag.as_str(),
            _ => "",
        };
        let mut style = apply_properties(inherited, &data.properties);
        match tag {
            "h1" | "h2" | "h3" => style.attributes.set(Attribute::Bold),
            "hr" => {
                let mut line = RenderLine::new(indent);
                line.push(RenderSegment::plain("─".repeat(16)));
                frame.push_line(line);
                return;
            }
            "br" => {
                frame.push_blank();
                return;
            }
            "li" => {
                let mut item = RenderFrame::default();
                self.render_content(host, node, 0, 1, style, &mut item);
                let mut rows = item.lines.into_iter();
                let mut bullet = RenderLine::new(indent);
                bullet.push(RenderSegment::plain("• "));
                bullet.segments.extend(rows.next().map(|row| row.segments).unwrap_or_default());
                frame.push_line(bullet);
                for row in rows {
                    let mut line = RenderLine::new(indent);
                    line.segments.extend(row.segments);
                    frame.push_line(line);
                }
                return;
            }
            _ => {}
        }
        self.render_content(host, node, indent, indent + 1, style, frame);
    }

    fn render_inline(host: &TerminalHost, node: TermNode, inherited: ContentStyle, line: &mut RenderLine) {
        let Some(data) = host.node(node) else {
            return;
        };
        match &data.kind {
            NodeKind::Text => {
                if let Some(value) = data.properties.get(TEXT_VALUE_KEY).and_then(AttrValue::as_text) {
                    line.push(RenderSegment::styled(value, inherited));
                }
            }
            NodeKind::Element(tag) => {
                let mut style = apply_properties(inherited, &data.properties);
                match tag.as_str() {
                    "b" | "strong" => style.attributes.set(Attribute::Bold),
                    "i" | "em" => style.attributes.set(Attribute::Italic),
                    "u" | "a" => style.attributes.set(Attribute::Underlined),
                    _ => {}
                }
                let button = tag == "button";
                if button {
                    line.push(RenderSegment::styled("[ ", style));
                }
                for &child in &data.children {
                    Self::render_inline(host, child, style, line);
                }
                if button {
                    line.push(RenderSegment::styled(" ]", style));
                }
            }
            NodeKind::Root => {}
        }
    }
}

fn is_block(host: &TerminalHost, node: TermNode) -> bool {
    matches!(
        host.kind(node),
        Some(NodeKind::Element(tag)) if !INLINE_TAGS.contains(&tag.as_str())
    )
}

fn apply_properties(
    mut style: ContentStyle,
    properties: &std::collections::BTreeMap<String, AttrValue>,
) -> ContentStyle {
    let flag = |key: &str| matches!(properties.get(key), Some(AttrValue::Bool(true)));
    if flag("bold") {
        style.attributes.set(Attribute::Bold);
    }
    if flag("italic") {
        style.attributes.set(Attribute::Italic);
    }
    if flag("underline") {
        style.attributes.set(Attribute::Underlined);
    }
    if let Some(color) = properties.get("color").and_then(AttrValue::as_text).and_then(parse_color) {
        style.foreground_color = Some(color);
    }
    if let Some(color) = properties
        .get("background")
        .and_then(AttrValue::as_text)
        .and_then(parse_color)
    {
        style.background_color = Some(color);
    }
    style
}

/// Parses a named color or a `#rrggbb` hex triplet.
fn parse_color(value: &str) -> Option<TermColor> {
    if let Some(hex) = value.strip_prefix('#') {
        if hex.len() != 6 {
            return None;
        }
        let channel = |range: core::ops::Range<usize>| u8::from_str_radix(hex.get(range)?, 16).ok();
        return Some(TermColor::Rgb {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
        });
    }
    let color = match value.to_ascii_lowercase().as_str() {
        "black" => TermColor::Black,
        "red" => TermColor::Red,
        "green" => TermColor::Green,
        "yellow" => TermColor::Yellow,
        "blue" => TermColor::Blue,
        "magenta" => TermColor::Magenta,
        "cyan" => TermColor::Cyan,
        "white" => TermColor::White,
        "grey" | "gray" => TermColor::Grey,
        _ => return None,
    };
    Some(color)
}

#[cfg(test)]
mod tests {
    use super::*;
    use waterui_fiber::{Session, element};

    fn frame_of(description: waterui_fiber::Description) -> RenderFrame {
        let mut session = Session::new(TerminalHost::new());
        let root = session.host().root();
        session
            .render_blocking(description, root)
            .expect("render should succeed");
        Renderer::new().render(session.host())
    }

    #[test]
    fn render_plain_text() {
        let frame = frame_of(element("p").child("hello").build());
        assert_eq!(frame.lines().len(), 1);
        assert_eq!(frame.lines()[0].segments()[0].content(), "hello");
    }

    #[test]
    fn blocks_stack_and_inline_content_flows() {
        let frame = frame_of(
            element("div")
                .child(element("h1").child("Title"))
                .child(
                    element("p")
                        .child("press ")
                        .child(element("button").child("ok")),
                )
                .build(),
        );
        assert_eq!(frame.to_plain_text(), "  Title\n  press [ ok ]");
        assert!(frame.lines()[0].segments()[1].style().attributes.has(Attribute::Bold));
    }

    #[test]
    fn list_items_get_bullets() {
        let frame = frame_of(
            element("ul")
                .child(element("li").child("one"))
                .child(element("li").child("two"))
                .build(),
        );
        assert_eq!(frame.to_plain_text(), "  • one\n  • two");
    }

    #[test]
    fn colors_and_flags_become_styles() {
        let frame = frame_of(
            element("p")
                .attr("color", "#ff8000")
                .attr("underline", true)
                .child("warm")
                .build(),
        );
        let style = frame.lines()[0].segments()[0].style();
        assert_eq!(
            style.foreground_color,
            Some(TermColor::Rgb { r: 255, g: 128, b: 0 })
        );
        assert!(style.attributes.has(Attribute::Underlined));
        assert_eq!(parse_color("teal"), None);
    }

    #[test]
    fn clipping_respects_wide_characters() {
        let mut line = RenderLine::default();
        line.push(RenderSegment::plain("ab"));
        line.push(RenderSegment::plain("漢字x"));
        line.clip(5);
        assert_eq!(line.plain_text(), "ab漢");
        assert_eq!(line.width(), 4);
    }
}
