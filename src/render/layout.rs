//! Page layout for summary documents.
//!
//! Converts lightly formatted summary text (`#`/`##` headings, `-`/`•` bullets,
//! `**bold**` markers) into positioned lines on letter-size pages. Positions are in
//! millimetres from the bottom-left corner, as printpdf expects.

use crate::render::RenderRequest;

pub const PAGE_WIDTH_MM: f32 = 215.9;
pub const PAGE_HEIGHT_MM: f32 = 279.4;
pub const MARGIN_MM: f32 = 25.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStyle {
    Title,
    Meta,
    Heading,
    Body,
    Bullet,
}

impl LineStyle {
    pub fn font_size(&self) -> f32 {
        match self {
            LineStyle::Title => 18.0,
            LineStyle::Heading => 14.0,
            LineStyle::Meta | LineStyle::Body | LineStyle::Bullet => 11.0,
        }
    }

    fn line_height(&self) -> f32 {
        match self {
            LineStyle::Title => 9.0,
            LineStyle::Heading => 7.0,
            _ => 5.0,
        }
    }

    fn wrap_width(&self) -> usize {
        match self {
            LineStyle::Title => 55,
            LineStyle::Heading => 70,
            LineStyle::Bullet => 84,
            _ => 90,
        }
    }

    pub fn indent(&self) -> f32 {
        match self {
            LineStyle::Bullet => 5.0,
            _ => 0.0,
        }
    }

    pub fn is_bold(&self) -> bool {
        matches!(self, LineStyle::Title | LineStyle::Heading)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLine {
    pub text: String,
    pub style: LineStyle,
    pub x: f32,
    pub y: f32,
}

pub type Page = Vec<PlacedLine>;

pub fn document_title(category: &str) -> String {
    format!("Patient Health Summary - {}", title_case(category))
}

/// "general" -> "General", "primary_care" -> "Primary Care"
pub fn title_case(value: &str) -> String {
    value
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

struct Cursor {
    pages: Vec<Page>,
    y: f32,
}

impl Cursor {
    fn new() -> Self {
        Self {
            pages: vec![Vec::new()],
            y: PAGE_HEIGHT_MM - MARGIN_MM,
        }
    }

    fn space(&mut self, mm: f32) {
        self.y -= mm;
    }

    fn push(&mut self, text: String, style: LineStyle) {
        if self.y - style.line_height() < MARGIN_MM {
            self.pages.push(Vec::new());
            self.y = PAGE_HEIGHT_MM - MARGIN_MM;
        }
        self.y -= style.line_height();
        let line = PlacedLine {
            text,
            style,
            x: MARGIN_MM + style.indent(),
            y: self.y,
        };
        if let Some(page) = self.pages.last_mut() {
            page.push(line);
        }
    }

    fn push_wrapped(&mut self, text: &str, style: LineStyle) {
        for line in wrap_text(text, style.wrap_width()) {
            self.push(line, style);
        }
    }
}

pub fn layout(request: &RenderRequest) -> Vec<Page> {
    let mut cursor = Cursor::new();

    cursor.push_wrapped(&sanitize(&document_title(&request.category)), LineStyle::Title);
    cursor.space(4.0);

    if let Some(name) = request.owner_display_name.as_deref().filter(|n| !n.trim().is_empty()) {
        cursor.push_wrapped(&sanitize(&format!("Patient: {}", name.trim())), LineStyle::Meta);
        cursor.space(2.0);
    }

    for raw in request.text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            cursor.space(1.5);
            continue;
        }

        if line.starts_with('#') {
            let heading = strip_markup(line.trim_start_matches('#').trim());
            cursor.space(2.5);
            cursor.push_wrapped(&sanitize(&heading), LineStyle::Heading);
        } else if line.starts_with('-') || line.starts_with('•') || (line.starts_with('*') && !line.starts_with("**")) {
            let item = strip_markup(line.trim_start_matches(['-', '•', '*', ' ']).trim());
            cursor.push_wrapped(&format!("- {}", sanitize(&item)), LineStyle::Bullet);
        } else {
            cursor.push_wrapped(&sanitize(&strip_markup(line)), LineStyle::Body);
        }
    }

    cursor.pages
}

fn strip_markup(text: &str) -> String {
    text.replace("**", "").replace("__", "")
}

/// Map text onto the Latin-1 range the builtin PDF fonts render through WinAnsi
pub fn sanitize(text: &str) -> String {
    text.chars()
        .filter_map(|c| match c {
            '\u{2018}' | '\u{2019}' | '\u{201A}' => Some('\''),
            '\u{201C}' | '\u{201D}' | '\u{201E}' => Some('"'),
            '\u{2013}' | '\u{2014}' | '\u{2212}' | '•' | '\u{00B7}' => Some('-'),
            '\u{00A0}' | '\t' => Some(' '),
            '\u{00B5}' => Some('u'),
            c if c.is_ascii_control() => None,
            c if c.is_ascii() => Some(c),
            '\u{00A1}'..='\u{00FF}' => Some(c),
            _ => Some('?'),
        })
        .collect()
}

/// Simple word-wrap helper for PDF text rendering. Words wider than a line are cut.
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let chars: Vec<char> = word.chars().collect();
        for piece in chars.chunks(max_chars) {
            if current_len + piece.len() + 1 > max_chars && !current.is_empty() {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if !current.is_empty() {
                current.push(' ');
                current_len += 1;
            }
            current.extend(piece);
            current_len += piece.len();
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}
