//! Page layout of an inspection report.
//!
//! Layout works in millimetres with the origin at the top-left corner of an
//! A4 page; `y` is the text baseline. The result is a plain [`Document`]
//! value, rendering to PDF happens in [`super::pdf`].

use chrono_tz::Tz;

use crate::models::InspectionRecord;

use super::signature::{decode_data_url, SignatureImage};

pub const PAGE_WIDTH: f32 = 210.0;
pub const PAGE_HEIGHT: f32 = 297.0;
pub const MARGIN: f32 = 14.0;
/// Lowest baseline allowed on a page.
pub const BOTTOM: f32 = PAGE_HEIGHT - MARGIN;
/// Wrap width for free-text paragraphs.
pub const WRAP_WIDTH: f32 = 180.0;

const TITLE_SIZE: f32 = 16.0;
const META_SIZE: f32 = 11.0;
const HEADING_SIZE: f32 = 13.0;
const BODY_SIZE: f32 = 10.0;

const TITLE_ADVANCE: f32 = 8.0;
const META_ADVANCE: f32 = 6.0;
const HEADING_ADVANCE: f32 = 8.0;
const SUBHEADING_ADVANCE: f32 = 6.0;
const BODY_ADVANCE: f32 = 5.0;
const CATEGORY_GAP: f32 = 2.0;
const SECTION_GAP: f32 = 4.0;
const ITEM_INDENT: f32 = 4.0;

pub const SIGNATURE_WIDTH: f32 = 60.0;
pub const SIGNATURE_HEIGHT: f32 = 25.0;
pub const SIGNATURE_PLACEHOLDER: &str = "[signature unavailable]";

// Helvetica averages roughly half an em per glyph.
const AVG_GLYPH_EM: f32 = 0.5;
const PT_TO_MM: f32 = 25.4 / 72.0;

#[derive(Debug, Clone, PartialEq)]
pub struct TextElement {
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub text: String,
}

/// Image placed with its top-left corner at (`x`, `y`).
#[derive(Debug, Clone, PartialEq)]
pub struct ImageElement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub image: SignatureImage,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Text(TextElement),
    Image(ImageElement),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub elements: Vec<Element>,
}

impl Page {
    pub fn texts(&self) -> impl Iterator<Item = &TextElement> {
        self.elements.iter().filter_map(|e| match e {
            Element::Text(t) => Some(t),
            Element::Image(_) => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub pages: Vec<Page>,
}

impl Document {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// All text lines in emission order.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.pages
            .iter()
            .flat_map(|p| p.texts())
            .map(|t| t.text.as_str())
    }
}

/// Top-to-bottom writer with automatic page breaks.
struct PageCursor {
    pages: Vec<Page>,
    y: f32,
}

impl PageCursor {
    fn new() -> Self {
        Self {
            pages: vec![Page::default()],
            y: MARGIN,
        }
    }

    fn new_page(&mut self) {
        self.pages.push(Page::default());
        self.y = MARGIN;
    }

    fn break_if_past_bottom(&mut self) {
        if self.y > BOTTOM {
            self.new_page();
        }
    }

    /// Starts a new page unless `height` more units fit below the cursor.
    fn ensure_room(&mut self, height: f32) {
        if self.y + height > BOTTOM && self.y > MARGIN {
            self.new_page();
        }
    }

    fn advance(&mut self, by: f32) {
        self.y += by;
        self.break_if_past_bottom();
    }

    fn push(&mut self, element: Element) {
        if let Some(page) = self.pages.last_mut() {
            page.elements.push(element);
        }
    }

    fn line(&mut self, text: impl Into<String>, size: f32, indent: f32, advance: f32) {
        self.break_if_past_bottom();
        let y = self.y;
        self.push(Element::Text(TextElement {
            x: MARGIN + indent,
            y,
            size,
            text: text.into(),
        }));
        self.advance(advance);
    }

    fn paragraph(&mut self, text: &str, size: f32, indent: f32, width: f32, advance: f32) {
        for line in wrap_text(text, width, size) {
            self.line(line, size, indent, advance);
        }
    }

    fn finish(self) -> Document {
        Document { pages: self.pages }
    }
}

/// Approximate rendered width of `text` in millimetres.
pub fn text_width(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * AVG_GLYPH_EM * PT_TO_MM
}

/// Greedy word wrap. Explicit newlines are kept; a word wider than the line
/// is split.
pub fn wrap_text(text: &str, width: f32, size: f32) -> Vec<String> {
    let per_char = size * AVG_GLYPH_EM * PT_TO_MM;
    let max_chars = (((width + 1e-3) / per_char).floor() as usize).max(1);
    let mut lines = Vec::new();

    for raw_line in text.lines() {
        let mut current = String::new();
        let mut current_len = 0usize;
        for word in raw_line.split_whitespace() {
            let mut chars: Vec<char> = word.chars().collect();
            while chars.len() > max_chars {
                if current_len > 0 {
                    lines.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                let rest = chars.split_off(max_chars);
                lines.push(chars.into_iter().collect());
                chars = rest;
            }
            let word_len = chars.len();
            let needed = if current_len == 0 {
                word_len
            } else {
                current_len + 1 + word_len
            };
            if needed > max_chars {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current.extend(chars);
            current_len += word_len;
        }
        if current_len > 0 || raw_line.trim().is_empty() {
            lines.push(current);
        }
    }
    lines
}

#[derive(Debug, Clone, Copy)]
pub struct LayoutOptions {
    /// Timezone of the date line.
    pub timezone: Tz,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self { timezone: Tz::UTC }
    }
}

pub fn item_line(item_id: &str, status: &str, comment: &str) -> String {
    if comment.trim().is_empty() {
        format!("- {}: {}", item_id, status)
    } else {
        format!("- {}: {} (\"{}\")", item_id, status, comment.trim())
    }
}

/// Lays out one inspection record. Never fails: an unreadable signature
/// becomes a placeholder line.
pub fn layout(record: &InspectionRecord, options: &LayoutOptions) -> Document {
    let mut cursor = PageCursor::new();

    cursor.line("Vehicle Inspection Report", TITLE_SIZE, 0.0, TITLE_ADVANCE);

    let date = record.created_at.with_timezone(&options.timezone);
    let vehicle = &record.vehicle;
    let mut meta = vec![
        format!("Date: {}", date.format("%Y-%m-%d %H:%M %Z")),
        format!("Type: {}", record.inspection_type),
        format!("Vehicle: {} {}", vehicle.make, vehicle.model),
        format!("Registration: {}", vehicle.registration),
        format!("Mileage: {}", vehicle.mileage),
    ];
    if let Some(driver) = &record.driver_name {
        meta.push(format!("Driver: {}", driver));
    }
    if let Some(inspector) = &record.inspector_name {
        meta.push(format!("Inspector: {}", inspector));
    }
    let meta_width = PAGE_WIDTH - 2.0 * MARGIN;
    for line in &meta {
        cursor.paragraph(line, META_SIZE, 0.0, meta_width, META_ADVANCE);
    }
    cursor.advance(SECTION_GAP);

    if !record.checklist.is_empty() {
        cursor.line("Checklist", HEADING_SIZE, 0.0, HEADING_ADVANCE);
        let item_width = PAGE_WIDTH - 2.0 * MARGIN - ITEM_INDENT;
        for (category_id, items) in record.checklist.iter() {
            cursor.line(category_id.to_uppercase(), BODY_SIZE, 0.0, BODY_ADVANCE);
            for (item_id, state) in items.iter() {
                let text = item_line(item_id, state.status.label(), &state.comment);
                cursor.paragraph(&text, BODY_SIZE, ITEM_INDENT, item_width, BODY_ADVANCE);
            }
            cursor.advance(CATEGORY_GAP);
        }
    }

    if let Some(comments) = record.general_comments.as_deref().filter(|c| !c.trim().is_empty()) {
        cursor.advance(SECTION_GAP);
        cursor.ensure_room(SUBHEADING_ADVANCE + BODY_ADVANCE);
        cursor.line("General Comments", HEADING_SIZE, 0.0, SUBHEADING_ADVANCE);
        cursor.paragraph(comments, BODY_SIZE, 0.0, WRAP_WIDTH, BODY_ADVANCE);
    }

    if let Some(data_url) = record.signature_data_url.as_deref() {
        cursor.advance(SECTION_GAP);
        match decode_data_url(data_url) {
            Ok(image) => {
                cursor.ensure_room(SUBHEADING_ADVANCE + SIGNATURE_HEIGHT);
                cursor.line("Driver Signature", HEADING_SIZE, 0.0, SUBHEADING_ADVANCE);
                // the heading may have been the last line that fit
                cursor.ensure_room(SIGNATURE_HEIGHT);
                let y = cursor.y;
                cursor.push(Element::Image(ImageElement {
                    x: MARGIN,
                    y,
                    width: SIGNATURE_WIDTH,
                    height: SIGNATURE_HEIGHT,
                    image,
                }));
                cursor.advance(SIGNATURE_HEIGHT);
            }
            Err(e) => {
                tracing::warn!(
                    "Signature could not be embedded, using placeholder: id={}, error={}",
                    record.id,
                    e
                );
                cursor.ensure_room(SUBHEADING_ADVANCE + BODY_ADVANCE);
                cursor.line("Driver Signature", HEADING_SIZE, 0.0, SUBHEADING_ADVANCE);
                cursor.line(SIGNATURE_PLACEHOLDER, BODY_SIZE, 0.0, BODY_ADVANCE);
            }
        }
    }

    let mut document = cursor.finish();
    // a trailing break can leave an empty last page
    if document.pages.len() > 1 && document.pages.last().is_some_and(|p| p.elements.is_empty()) {
        document.pages.pop();
    }
    document
}
