//! Direct DOCX → PDF conversion
//!
//! Paragraphs are laid out in-process with the base-14 Helvetica family, so
//! no fonts are embedded and no external tool is needed. The layout is
//! plain: A4 pages, 20mm margins, greedy word wrap, headings
//! set bold at larger sizes, list items indented with a bullet. Images,
//! tables and section properties are not reproduced.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream, StringFormat};
use tracing::{debug, instrument};

use super::{mm_to_points, ConversionBackend, PAGE_HEIGHT_MM, PAGE_MARGIN_MM, PAGE_WIDTH_MM};
use crate::docx::{self, DocxDocument, Paragraph};
use crate::error::{ConvertError, Result};

const BODY_SIZE: f32 = 11.0;
const LINE_SPACING: f32 = 1.4;
const PARAGRAPH_SPACING: f32 = 0.5;
const LIST_INDENT: f32 = 18.0;
const BULLET: char = '•';

/// Helvetica advance widths for U+0020..=U+007E, in 1/1000 em.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // '0'..'?'
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // '@'..'O'
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 'P'..'_'
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // '`'..'o'
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // 'p'..'~'
];

/// Bold faces run slightly wider; widths are scaled rather than tabulated.
const BOLD_WIDTH_FACTOR: f32 = 1.06;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Font {
    Regular,
    Bold,
    Oblique,
    BoldOblique,
}

impl Font {
    const ALL: [Font; 4] = [Font::Regular, Font::Bold, Font::Oblique, Font::BoldOblique];

    fn from_style(bold: bool, italic: bool) -> Self {
        match (bold, italic) {
            (false, false) => Font::Regular,
            (true, false) => Font::Bold,
            (false, true) => Font::Oblique,
            (true, true) => Font::BoldOblique,
        }
    }

    fn resource_name(self) -> &'static [u8] {
        match self {
            Font::Regular => b"F1",
            Font::Bold => b"F2",
            Font::Oblique => b"F3",
            Font::BoldOblique => b"F4",
        }
    }

    fn base_font(self) -> &'static str {
        match self {
            Font::Regular => "Helvetica",
            Font::Bold => "Helvetica-Bold",
            Font::Oblique => "Helvetica-Oblique",
            Font::BoldOblique => "Helvetica-BoldOblique",
        }
    }

    /// Advance width of `c` in 1/1000 em.
    fn char_units(self, c: char) -> f32 {
        let base = match c {
            ' '..='~' => f32::from(HELVETICA_WIDTHS[c as usize - 0x20]),
            BULLET => 350.0,
            _ => 556.0,
        };
        match self {
            Font::Bold | Font::BoldOblique => base * BOLD_WIDTH_FACTOR,
            Font::Regular | Font::Oblique => base,
        }
    }
}

/// Map a character to its WinAnsiEncoding byte, `?` when unmappable.
fn win_ansi_byte(c: char) -> u8 {
    match c {
        ' '..='~' => c as u8,
        '\u{a0}'..='\u{ff}' => c as u32 as u8,
        '€' => 0x80,
        '‚' => 0x82,
        'ƒ' => 0x83,
        '„' => 0x84,
        '…' => 0x85,
        '†' => 0x86,
        '‡' => 0x87,
        'ˆ' => 0x88,
        '‰' => 0x89,
        'Š' => 0x8a,
        '‹' => 0x8b,
        'Œ' => 0x8c,
        'Ž' => 0x8e,
        '‘' => 0x91,
        '’' => 0x92,
        '“' => 0x93,
        '”' => 0x94,
        '•' => 0x95,
        '–' => 0x96,
        '—' => 0x97,
        '˜' => 0x98,
        '™' => 0x99,
        'š' => 0x9a,
        '›' => 0x9b,
        'œ' => 0x9c,
        'ž' => 0x9e,
        'Ÿ' => 0x9f,
        _ => b'?',
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Fragment {
    font: Font,
    text: String,
}

/// A run of non-whitespace characters, possibly spanning several styles.
#[derive(Debug, Clone, Default, PartialEq)]
struct Word {
    fragments: Vec<Fragment>,
    units: f32,
}

impl Word {
    fn push(&mut self, font: Font, c: char) {
        match self.fragments.last_mut() {
            Some(last) if last.font == font => last.text.push(c),
            _ => self.fragments.push(Fragment {
                font,
                text: c.to_string(),
            }),
        }
        self.units += font.char_units(c);
    }

    fn width(&self, size: f32) -> f32 {
        self.units * size / 1000.0
    }

    fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Break a word wider than `max_width` into pieces that fit.
    fn split_to_width(self, max_width: f32, size: f32) -> Vec<Word> {
        let mut pieces = Vec::new();
        let mut current = Word::default();
        for fragment in self.fragments {
            for c in fragment.text.chars() {
                let next = (current.units + fragment.font.char_units(c)) * size / 1000.0;
                if next > max_width && !current.is_empty() {
                    pieces.push(std::mem::take(&mut current));
                }
                current.push(fragment.font, c);
            }
        }
        if !current.is_empty() {
            pieces.push(current);
        }
        pieces
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(Word),
    LineBreak,
}

fn tokenize(paragraph: &Paragraph, force_bold: bool) -> Vec<Token> {
    fn flush(word: &mut Word, tokens: &mut Vec<Token>) {
        if !word.is_empty() {
            tokens.push(Token::Word(std::mem::take(word)));
        }
    }

    let mut tokens = Vec::new();
    let mut word = Word::default();

    for run in &paragraph.runs {
        let font = Font::from_style(run.bold || force_bold, run.italic);
        for c in run.text.chars() {
            if c == '\n' {
                flush(&mut word, &mut tokens);
                tokens.push(Token::LineBreak);
            } else if c.is_whitespace() {
                flush(&mut word, &mut tokens);
            } else {
                word.push(font, c);
            }
        }
    }
    flush(&mut word, &mut tokens);
    tokens
}

fn heading_size(level: u8) -> f32 {
    match level {
        1 => 20.0,
        2 => 16.0,
        3 => 14.0,
        _ => 12.0,
    }
}

/// Geometry of the printable area in PDF points (origin bottom-left).
#[derive(Debug, Clone, Copy)]
struct PageGeometry {
    width: f32,
    height: f32,
    margin: f32,
}

impl PageGeometry {
    fn a4() -> Self {
        Self {
            width: mm_to_points(PAGE_WIDTH_MM),
            height: mm_to_points(PAGE_HEIGHT_MM),
            margin: mm_to_points(PAGE_MARGIN_MM),
        }
    }

    fn text_width(&self) -> f32 {
        self.width - 2.0 * self.margin
    }

    fn top(&self) -> f32 {
        self.height - self.margin
    }
}

/// Accumulates content stream operations page by page.
struct Layout {
    geometry: PageGeometry,
    pages: Vec<Vec<Operation>>,
    current: Vec<Operation>,
    cursor: f32,
}

impl Layout {
    fn new(geometry: PageGeometry) -> Self {
        Self {
            geometry,
            pages: Vec::new(),
            current: Vec::new(),
            cursor: geometry.top(),
        }
    }

    fn new_page(&mut self) {
        self.pages.push(std::mem::take(&mut self.current));
        self.cursor = self.geometry.top();
    }

    fn ensure_room(&mut self, line_height: f32) {
        let at_top = (self.cursor - self.geometry.top()).abs() < f32::EPSILON;
        if self.cursor - line_height < self.geometry.margin && !at_top {
            self.new_page();
        }
    }

    fn blank_line(&mut self, line_height: f32) {
        self.ensure_room(line_height);
        self.cursor -= line_height;
    }

    fn show_text(&mut self, font: Font, size: f32, x: f32, y: f32, text: &str) {
        let bytes: Vec<u8> = text.chars().map(win_ansi_byte).collect();
        self.current.extend([
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![
                    Object::Name(font.resource_name().to_vec()),
                    Object::Real(size),
                ],
            ),
            Operation::new("Td", vec![Object::Real(x), Object::Real(y)]),
            Operation::new(
                "Tj",
                vec![Object::String(bytes, StringFormat::Hexadecimal)],
            ),
            Operation::new("ET", vec![]),
        ]);
    }

    fn emit_line(&mut self, words: &[Word], indent: f32, size: f32, bullet: bool) {
        let line_height = size * LINE_SPACING;
        self.ensure_room(line_height);

        let baseline = self.cursor - size;
        let left = self.geometry.margin + indent;
        if bullet {
            let bullet_x = left - Font::Regular.char_units(BULLET) * size / 1000.0 - 4.0;
            self.show_text(Font::Regular, size, bullet_x, baseline, &BULLET.to_string());
        }

        let space = Font::Regular.char_units(' ') * size / 1000.0;
        let mut x = left;
        for word in words {
            for fragment in &word.fragments {
                self.show_text(fragment.font, size, x, baseline, &fragment.text);
                x += fragment.text.chars().map(|c| fragment.font.char_units(c)).sum::<f32>()
                    * size
                    / 1000.0;
            }
            x += space;
        }

        self.cursor -= line_height;
    }

    fn paragraph(&mut self, paragraph: &Paragraph) {
        let (size, bold) = match paragraph.heading_level {
            Some(level) => (heading_size(level), true),
            None => (BODY_SIZE, false),
        };
        let line_height = size * LINE_SPACING;
        let indent = paragraph
            .list_level
            .map(|level| LIST_INDENT * (f32::from(level) + 1.0))
            .unwrap_or(0.0);
        let max_width = self.geometry.text_width() - indent;
        let space = Font::Regular.char_units(' ') * size / 1000.0;

        let tokens = tokenize(paragraph, bold);
        if tokens.is_empty() {
            self.blank_line(line_height);
            return;
        }

        let mut bullet = paragraph.list_level.is_some();
        let mut line: Vec<Word> = Vec::new();
        let mut line_width = 0.0;

        for token in tokens {
            let word = match token {
                Token::LineBreak => {
                    self.emit_line(&line, indent, size, bullet);
                    bullet = false;
                    line.clear();
                    line_width = 0.0;
                    continue;
                }
                Token::Word(word) => word,
            };

            let pieces = if word.width(size) > max_width {
                word.split_to_width(max_width, size)
            } else {
                vec![word]
            };

            for piece in pieces {
                let width = piece.width(size);
                if !line.is_empty() && line_width + space + width > max_width {
                    self.emit_line(&line, indent, size, bullet);
                    bullet = false;
                    line.clear();
                    line_width = 0.0;
                }
                line_width += if line.is_empty() { width } else { space + width };
                line.push(piece);
            }
        }
        if !line.is_empty() {
            self.emit_line(&line, indent, size, bullet);
        }

        self.cursor -= size * PARAGRAPH_SPACING;
    }

    fn finish(mut self) -> Vec<Vec<Operation>> {
        if !self.current.is_empty() || self.pages.is_empty() {
            self.pages.push(self.current);
        }
        self.pages
    }
}

/// Lay out a parsed document and serialize it as PDF bytes.
pub fn render_pdf(document: &DocxDocument) -> Result<Vec<u8>> {
    let geometry = PageGeometry::a4();
    let mut layout = Layout::new(geometry);
    for paragraph in &document.paragraphs {
        layout.paragraph(paragraph);
    }
    write_pdf(layout.finish(), geometry)
}

fn write_pdf(pages: Vec<Vec<Operation>>, geometry: PageGeometry) -> Result<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut fonts = Dictionary::new();
    for font in Font::ALL {
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => font.base_font(),
            "Encoding" => "WinAnsiEncoding",
        });
        fonts.set(font.resource_name(), Object::Reference(font_id));
    }
    let resources_id = doc.add_object(dictionary! {
        "Font" => fonts,
    });

    let mut kids = Vec::with_capacity(pages.len());
    for operations in pages {
        let content = Content { operations };
        let encoded = content
            .encode()
            .map_err(|e| ConvertError::Conversion(format!("Content encoding failed: {}", e)))?;
        let content_id = doc.add_object(Stream::new(Dictionary::new(), encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "Contents" => Object::Reference(content_id),
            "Resources" => Object::Reference(resources_id),
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(geometry.width),
                Object::Real(geometry.height),
            ],
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    let info_id = doc.add_object(dictionary! {
        "Producer" => Object::string_literal("docconv"),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));
    doc.trailer.set("Info", Object::Reference(info_id));
    doc.compress();

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| ConvertError::Conversion(format!("Save failed: {}", e)))?;
    Ok(buffer)
}

/// Strategy A: in-process layout with lopdf.
#[derive(Debug, Clone, Default)]
pub struct DirectConverter;

impl DirectConverter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ConversionBackend for DirectConverter {
    fn name(&self) -> &'static str {
        "direct"
    }

    #[instrument(skip(self), fields(backend = "direct"))]
    async fn convert(&self, source: &Path, artifact: &Path) -> Result<()> {
        let source: PathBuf = source.to_path_buf();
        let artifact: PathBuf = artifact.to_path_buf();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let document = docx::read_docx(&source)
                .map_err(|e| ConvertError::Conversion(format!("Malformed DOCX: {}", e)))?;
            let bytes = render_pdf(&document)?;
            std::fs::write(&artifact, &bytes).map_err(|e| {
                ConvertError::Conversion(format!("Cannot write {}: {}", artifact.display(), e))
            })?;
            debug!(
                paragraphs = document.paragraphs.len(),
                bytes = bytes.len(),
                "Wrote PDF artifact"
            );
            Ok(())
        })
        .await
        .map_err(|e| ConvertError::Conversion(format!("Conversion task panicked: {}", e)))?
    }
}
