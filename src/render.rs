//! Answer fragment rendering.
//!
//! Each fragment is classified once, and markdown fragments are turned into a
//! small block model (headings, paragraphs, list items, code) before anything
//! is drawn. Fenced code with a known language tag is highlighted with syntect;
//! everything else in code is left undecorated.

use once_cell::sync::Lazy;
use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag};
use regex::Regex;
use syntect::easy::HighlightLines;
use syntect::highlighting::ThemeSet;
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;

use iced::font::{self, Font};
use iced::widget::{column, container, rich_text, row, span, text};
use iced::{Border, Color, Element, Length, Padding};

use crate::Message;

static SYNTAX_SET: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);
static THEME_SET: Lazy<ThemeSet> = Lazy::new(ThemeSet::load_defaults);

const CODE_THEME: &str = "base16-ocean.dark";

// `## Title` style headings.
static HASH_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,6}\s+(.*?)\s*#*$").unwrap());
// `**Title**` left behind once the answer is split on "* ".
static BOLD_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\*\*(.*?)\*+$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderKind {
    /// First fragment of a multi-fragment answer, shown verbatim.
    Overview,
    /// Heading marker detected; holds the text with the marker stripped.
    Heading(String),
    Markdown,
}

pub fn classify(fragment: &str, position: usize, total: usize) -> RenderKind {
    if position == 0 && total > 1 {
        return RenderKind::Overview;
    }
    match heading_text(fragment) {
        Some(title) => RenderKind::Heading(title),
        None => RenderKind::Markdown,
    }
}

fn heading_text(fragment: &str) -> Option<String> {
    let captures = HASH_HEADING
        .captures(fragment)
        .or_else(|| BOLD_HEADING.captures(fragment))?;
    let title = captures.get(1)?.as_str().trim();
    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InlineStyle {
    pub bold: bool,
    pub italic: bool,
    pub code: bool,
    pub link: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inline {
    pub text: String,
    pub style: InlineStyle,
}

/// One run of code text. `color` is `None` for undecorated code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeRun {
    pub text: String,
    pub color: Option<[u8; 3]>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading { level: u8, inlines: Vec<Inline> },
    Paragraph(Vec<Inline>),
    ListItem { depth: usize, marker: String, inlines: Vec<Inline> },
    Quote(Vec<Inline>),
    Code { language: Option<String>, lines: Vec<Vec<CodeRun>> },
    Rule,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    Overview(String),
    Heading(String),
    Markdown(Vec<Block>),
}

pub fn render_answer(fragments: &[String]) -> Vec<Rendered> {
    let total = fragments.len();
    fragments
        .iter()
        .enumerate()
        .map(|(position, fragment)| render_fragment(fragment, position, total))
        .collect()
}

pub fn render_fragment(fragment: &str, position: usize, total: usize) -> Rendered {
    match classify(fragment, position, total) {
        RenderKind::Overview => Rendered::Overview(fragment.to_string()),
        RenderKind::Heading(title) => Rendered::Heading(title),
        RenderKind::Markdown => {
            let blocks = markdown_blocks(fragment);
            if blocks.is_empty() && !fragment.trim().is_empty() {
                // Bare markers and link definitions parse to nothing; show them as typed.
                Rendered::Markdown(vec![Block::Paragraph(vec![Inline {
                    text: fragment.trim().to_string(),
                    style: InlineStyle::default(),
                }])])
            } else {
                Rendered::Markdown(blocks)
            }
        }
    }
}

enum ListKind {
    Bullet,
    Ordered(u64),
}

#[derive(Default)]
struct BlockBuilder {
    blocks: Vec<Block>,
    inlines: Vec<Inline>,
    style: InlineStyle,
    lists: Vec<ListKind>,
    item_marker: Option<String>,
    heading: Option<u8>,
    quote: usize,
    code: Option<(Option<String>, String)>,
}

impl BlockBuilder {
    fn push_text(&mut self, text: &str, style: InlineStyle) {
        if let Some((_, buffer)) = self.code.as_mut() {
            buffer.push_str(text);
            return;
        }
        match self.inlines.last_mut() {
            Some(last) if last.style == style => last.text.push_str(text),
            _ => self.inlines.push(Inline {
                text: text.to_string(),
                style,
            }),
        }
    }

    fn flush(&mut self) {
        if self.inlines.iter().all(|i| i.text.trim().is_empty()) {
            self.inlines.clear();
            return;
        }
        let inlines = std::mem::take(&mut self.inlines);
        let block = if let Some(level) = self.heading {
            Block::Heading { level, inlines }
        } else if let Some(marker) = self.item_marker.take() {
            Block::ListItem {
                depth: self.lists.len().saturating_sub(1),
                marker,
                inlines,
            }
        } else if self.quote > 0 {
            Block::Quote(inlines)
        } else {
            Block::Paragraph(inlines)
        };
        self.blocks.push(block);
    }

    fn next_marker(&mut self) -> String {
        match self.lists.last_mut() {
            Some(ListKind::Ordered(n)) => {
                let marker = format!("{}.", n);
                *n += 1;
                marker
            }
            Some(ListKind::Bullet) | None => "•".to_string(),
        }
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

pub fn markdown_blocks(fragment: &str) -> Vec<Block> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TASKLISTS);

    let mut b = BlockBuilder::default();

    for event in Parser::new_ext(fragment, options) {
        match event {
            Event::Start(tag) => match tag {
                Tag::Paragraph => {}
                Tag::Heading(level, _, _) => {
                    b.flush();
                    b.heading = Some(heading_level(level));
                }
                Tag::BlockQuote => {
                    b.flush();
                    b.quote += 1;
                }
                Tag::CodeBlock(kind) => {
                    b.flush();
                    let language = match kind {
                        CodeBlockKind::Fenced(info) => info
                            .split_whitespace()
                            .next()
                            .map(str::to_string)
                            .filter(|l| !l.is_empty()),
                        CodeBlockKind::Indented => None,
                    };
                    b.code = Some((language, String::new()));
                }
                Tag::List(start) => {
                    b.flush();
                    b.lists.push(match start {
                        Some(n) => ListKind::Ordered(n),
                        None => ListKind::Bullet,
                    });
                }
                Tag::Item => {
                    b.flush();
                    b.item_marker = Some(b.next_marker());
                }
                Tag::Emphasis => b.style.italic = true,
                Tag::Strong => b.style.bold = true,
                Tag::Link(..) => b.style.link = true,
                _ => {}
            },
            Event::End(tag) => match tag {
                Tag::Paragraph => b.flush(),
                Tag::Heading(..) => {
                    b.flush();
                    b.heading = None;
                }
                Tag::BlockQuote => {
                    b.flush();
                    b.quote = b.quote.saturating_sub(1);
                }
                Tag::CodeBlock(_) => {
                    if let Some((language, source)) = b.code.take() {
                        let lines = highlight(&source, language.as_deref());
                        b.blocks.push(Block::Code { language, lines });
                    }
                }
                Tag::List(_) => {
                    b.flush();
                    b.lists.pop();
                }
                Tag::Item => b.flush(),
                Tag::Emphasis => b.style.italic = false,
                Tag::Strong => b.style.bold = false,
                Tag::Link(..) => b.style.link = false,
                _ => {}
            },
            Event::Text(t) => {
                let style = b.style;
                b.push_text(&t, style);
            }
            Event::Code(t) => {
                let style = InlineStyle { code: true, ..b.style };
                b.push_text(&t, style);
            }
            Event::Html(t) => {
                let style = b.style;
                b.push_text(&t, style);
            }
            Event::SoftBreak => {
                let style = b.style;
                b.push_text(" ", style);
            }
            Event::HardBreak => {
                let style = b.style;
                b.push_text("\n", style);
            }
            Event::Rule => {
                b.flush();
                b.blocks.push(Block::Rule);
            }
            Event::TaskListMarker(done) => {
                let style = b.style;
                b.push_text(if done { "[x] " } else { "[ ] " }, style);
            }
            Event::FootnoteReference(_) => {}
        }
    }
    b.flush();
    b.blocks
}

/// Highlights `source` when `language` names a known syntax; otherwise every
/// line becomes one undecorated run.
pub fn highlight(source: &str, language: Option<&str>) -> Vec<Vec<CodeRun>> {
    let source = source.strip_suffix('\n').unwrap_or(source);
    let syntax = language.and_then(|l| SYNTAX_SET.find_syntax_by_token(l));

    let (Some(syntax), Some(theme)) = (syntax, THEME_SET.themes.get(CODE_THEME)) else {
        return plain_lines(source);
    };

    let mut highlighter = HighlightLines::new(syntax, theme);
    let mut lines = Vec::new();
    for line in LinesWithEndings::from(source) {
        match highlighter.highlight_line(line, &SYNTAX_SET) {
            Ok(ranges) => lines.push(
                ranges
                    .into_iter()
                    .map(|(style, piece)| CodeRun {
                        text: piece.trim_end_matches(['\n', '\r']).to_string(),
                        color: Some([style.foreground.r, style.foreground.g, style.foreground.b]),
                    })
                    .filter(|run| !run.text.is_empty())
                    .collect(),
            ),
            Err(e) => {
                tracing::debug!("highlighting failed, falling back to plain code: {}", e);
                return plain_lines(source);
            }
        }
    }
    lines
}

fn plain_lines(source: &str) -> Vec<Vec<CodeRun>> {
    source
        .lines()
        .map(|line| {
            vec![CodeRun {
                text: line.to_string(),
                color: None,
            }]
        })
        .collect()
}

const BODY_SIZE: u16 = 15;
const CODE_SIZE: u16 = 14;

fn bold(base: Font) -> Font {
    Font {
        weight: font::Weight::Bold,
        ..base
    }
}

pub fn view<'a>(rendered: &'a Rendered, palette: Palette) -> Element<'a, Message> {
    match rendered {
        Rendered::Overview(line) => text(line.as_str())
            .size(20)
            .font(bold(Font::MONOSPACE))
            .color(palette.heading)
            .into(),
        Rendered::Heading(title) => text(title.as_str())
            .size(17)
            .font(bold(Font::MONOSPACE))
            .color(palette.heading)
            .into(),
        Rendered::Markdown(blocks) if blocks.is_empty() => text("").size(BODY_SIZE).into(),
        Rendered::Markdown(blocks) => container(
            column(blocks.iter().map(|block| view_block(block, palette)))
                .spacing(8)
                .width(Length::Fill),
        )
        .padding(Padding {
            left: 20.0,
            ..Padding::ZERO
        })
        .into(),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Palette {
    pub text: Color,
    pub heading: Color,
    pub muted: Color,
    pub link: Color,
    pub inline_code: Color,
}

impl Palette {
    pub fn for_dark(dark: bool) -> Self {
        if dark {
            Palette {
                text: Color::from_rgb8(0xE2, 0xE8, 0xF0),
                heading: Color::WHITE,
                muted: Color::from_rgb8(0x94, 0xA3, 0xB8),
                link: Color::from_rgb8(0xE8, 0x79, 0xF9),
                inline_code: Color::from_rgb8(0xF0, 0xAB, 0xFC),
            }
        } else {
            Palette {
                text: Color::from_rgb8(0x0F, 0x17, 0x2A),
                heading: Color::from_rgb8(0x02, 0x06, 0x17),
                muted: Color::from_rgb8(0x64, 0x74, 0x8B),
                link: Color::from_rgb8(0xA2, 0x1C, 0xAF),
                inline_code: Color::from_rgb8(0x86, 0x19, 0x8F),
            }
        }
    }
}

fn view_inlines<'a>(inlines: &'a [Inline], palette: Palette, size: u16) -> Element<'a, Message> {
    let spans: Vec<text::Span<'a, Message, Font>> = inlines
        .iter()
        .map(|inline| {
            let style = inline.style;
            let mut font = Font::MONOSPACE;
            if style.bold {
                font.weight = font::Weight::Bold;
            }
            if style.italic {
                font.style = font::Style::Italic;
            }
            let color = if style.code {
                palette.inline_code
            } else if style.link {
                palette.link
            } else {
                palette.text
            };
            span(inline.text.as_str()).font(font).color(color)
        })
        .collect();

    rich_text(spans).size(size).into()
}

fn view_block<'a>(block: &'a Block, palette: Palette) -> Element<'a, Message> {
    match block {
        Block::Heading { level, inlines } => {
            let size: u16 = match level {
                1 => 20,
                2 => 18,
                _ => 16,
            };
            text(inlines.iter().map(|i| i.text.as_str()).collect::<String>())
                .size(size)
                .font(bold(Font::MONOSPACE))
                .color(palette.heading)
                .into()
        }
        Block::Paragraph(inlines) => view_inlines(inlines, palette, BODY_SIZE),
        Block::ListItem {
            depth,
            marker,
            inlines,
        } => row![
            text(marker.as_str()).size(BODY_SIZE).color(palette.muted),
            view_inlines(inlines, palette, BODY_SIZE),
        ]
        .spacing(8)
        .padding(Padding {
            left: *depth as f32 * 18.0,
            ..Padding::ZERO
        })
        .into(),
        Block::Quote(inlines) => container(view_inlines(inlines, palette, BODY_SIZE))
            .padding([4, 12])
            .style(move |_theme| container::Style {
                border: Border {
                    color: palette.muted,
                    width: 1.0,
                    radius: 4.0.into(),
                },
                ..Default::default()
            })
            .into(),
        Block::Code { language, lines } => view_code(language.as_deref(), lines, palette),
        Block::Rule => container(text(""))
            .width(Length::Fill)
            .height(Length::Fixed(1.0))
            .style(move |_theme| container::Style {
                background: Some(palette.muted.into()),
                ..Default::default()
            })
            .into(),
    }
}

fn view_code<'a>(
    language: Option<&'a str>,
    lines: &'a [Vec<CodeRun>],
    palette: Palette,
) -> Element<'a, Message> {
    let plain = Color::from_rgb8(0xC0, 0xC5, 0xCE);
    let body = column(lines.iter().map(|runs| {
        let spans: Vec<text::Span<'a, Message, Font>> = runs
            .iter()
            .map(|run| {
                let color = run
                    .color
                    .map(|[r, g, b]| Color::from_rgb8(r, g, b))
                    .unwrap_or(plain);
                span(run.text.as_str()).font(Font::MONOSPACE).color(color)
            })
            .collect();
        rich_text(spans).size(CODE_SIZE).into()
    }))
    .spacing(2);

    let mut content = column![].spacing(6);
    if let Some(language) = language {
        content = content.push(text(language).size(11).color(palette.muted));
    }
    content = content.push(body);

    container(content)
        .padding(12)
        .width(Length::Fill)
        .style(|_theme| container::Style {
            background: Some(Color::from_rgb8(0x2B, 0x30, 0x3B).into()),
            border: Border {
                radius: 6.0.into(),
                ..Default::default()
            },
            ..Default::default()
        })
        .into()
}
