use anyhow::{Context, Result};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};

use super::layout::{
    Align, Cells, LayoutPage, PageGeometry, SettlementLayout, SummaryBlock, COLUMNS, CONTINUED,
};

const REGULAR: &[u8] = b"F1";
const BOLD: &[u8] = b"F2";
const CELL_PADDING: f32 = 3.0;

/// Render a laid-out settlement as a PDF.
///
/// Uses the standard Helvetica faces with WinAnsi encoding, so no font file
/// is embedded and the same layout always produces the same bytes.
pub fn render(layout: &SettlementLayout, geometry: &PageGeometry) -> Result<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular_id = doc.add_object(font("Helvetica"));
    let bold_id = doc.add_object(font("Helvetica-Bold"));
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular_id,
            "F2" => bold_id,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(layout.pages.len());
    for page in &layout.pages {
        let content = PageWriter::new(geometry).page(layout, page);
        let encoded = content
            .encode()
            .with_context(|| format!("Failed to encode page {}", page.number))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => count,
        "Resources" => resources_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Real(geometry.width),
            Object::Real(geometry.height),
        ],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id: ObjectId = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .context("Failed to write settlement PDF")?;
    Ok(bytes)
}

fn font(base: &str) -> lopdf::Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => base,
        "Encoding" => "WinAnsiEncoding",
    }
}

/// Accumulates drawing operations for one page, top to bottom.
struct PageWriter<'a> {
    geometry: &'a PageGeometry,
    operations: Vec<Operation>,
}

impl<'a> PageWriter<'a> {
    fn new(geometry: &'a PageGeometry) -> Self {
        Self {
            geometry,
            operations: Vec::new(),
        }
    }

    fn page(mut self, layout: &SettlementLayout, page: &LayoutPage) -> Content {
        let g = *self.geometry;
        let left = g.margin;
        let right = g.width - g.margin;
        let top = g.height - g.margin;

        // header region
        self.text(BOLD, 14.0, left, top - 14.0, &layout.title);
        let page_label = format!("Página {} de {}", page.number, page.total_pages);
        self.text_right(REGULAR, g.font_size, right, top - 12.0, &page_label);
        if !layout.subtitle.is_empty() {
            self.text(REGULAR, 9.0, left, top - 28.0, &layout.subtitle);
        }

        if page.is_first() {
            let middle = left + g.table_width() / 2.0;
            self.info_column(left, top - 48.0, &layout.trip_info);
            self.info_column(middle, top - 48.0, &layout.employee_info);
        } else {
            let banner = layout
                .trip_info
                .iter()
                .chain(layout.employee_info.iter().take(1))
                .map(|(label, value)| format!("{}: {}", label, value))
                .collect::<Vec<_>>()
                .join("   ");
            self.text(REGULAR, 9.0, left, top - 48.0, &format!("(continuação) {}", banner));
        }

        // column headers, repeated on every page
        let mut y = top - g.header_height;
        let headers: Vec<&str> = page.column_headers.iter().map(String::as_str).collect();
        self.row(BOLD, y - 12.0, &headers);
        self.line(left, y - g.column_header_height + 2.0, right, 0.8);
        y -= g.column_header_height;

        for cells in &page.rows {
            self.cells(REGULAR, y - 9.0, cells);
            y -= g.row_height;
        }

        if page.continued {
            self.text_right(REGULAR, g.font_size, right, y - 10.0, CONTINUED);
        }
        y -= g.marker_height;

        if let Some(summary) = &page.summary {
            self.summary(y, summary);
        }

        Content {
            operations: self.operations,
        }
    }

    fn info_column(&mut self, x: f32, mut y: f32, info: &[(String, String)]) {
        for (label, value) in info {
            self.text(BOLD, 9.0, x, y, &format!("{}:", label));
            self.text(REGULAR, 9.0, x + 90.0, y, value);
            y -= 14.0;
        }
    }

    fn summary(&mut self, top: f32, summary: &SummaryBlock) {
        let g = *self.geometry;
        let left = g.margin;
        let right = g.width - g.margin;

        self.line(left, top + 2.0, right, 0.8);
        self.cells(BOLD, top - 10.0, &summary.totals);

        let mut y = top - 30.0;
        for (label, value) in &summary.lines {
            self.text(BOLD, 9.0, right - 260.0, y, label);
            self.text_right(BOLD, 9.0, right, y, value);
            y -= 13.0;
        }

        // signature lines, side by side
        let y = top - g.footer_height + 12.0;
        let slot = g.table_width() / summary.signatures.len().max(1) as f32;
        for (i, name) in summary.signatures.iter().enumerate() {
            let x = left + slot * i as f32 + 20.0;
            self.line(x, y + 10.0, x + slot - 40.0, 0.5);
            self.text(REGULAR, g.font_size, x, y, name);
        }
    }

    fn cells(&mut self, face: &[u8], y: f32, cells: &Cells) {
        let texts: Vec<&str> = cells.iter().map(String::as_str).collect();
        self.row(face, y, &texts);
    }

    fn row(&mut self, face: &[u8], y: f32, texts: &[&str]) {
        let size = self.geometry.font_size;
        let mut x = self.geometry.margin;
        for (column, text) in COLUMNS.iter().zip(texts) {
            match column.align {
                Align::Left => self.text(face, size, x + CELL_PADDING, y, text),
                Align::Right => {
                    self.text_right(face, size, x + column.width - CELL_PADDING, y, text)
                }
            }
            x += column.width;
        }
    }

    fn text_right(&mut self, face: &[u8], size: f32, right: f32, y: f32, text: &str) {
        let x = right - text_width(text, size);
        self.text(face, size, x, y, text);
    }

    fn text(&mut self, face: &[u8], size: f32, x: f32, y: f32, text: &str) {
        if text.is_empty() {
            return;
        }
        self.operations.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(face.to_vec()), Object::Real(size)]),
            Operation::new("Td", vec![Object::Real(x), Object::Real(y)]),
            Operation::new(
                "Tj",
                vec![Object::String(win_ansi(text), StringFormat::Literal)],
            ),
            Operation::new("ET", vec![]),
        ]);
    }

    fn line(&mut self, x1: f32, y: f32, x2: f32, width: f32) {
        self.operations.extend([
            Operation::new("w", vec![Object::Real(width)]),
            Operation::new("m", vec![Object::Real(x1), Object::Real(y)]),
            Operation::new("l", vec![Object::Real(x2), Object::Real(y)]),
            Operation::new("S", vec![]),
        ]);
    }
}

/// Encode text for a WinAnsi font. Latin-1 maps one to one; anything
/// outside it prints as `?`.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

/// Approximate Helvetica advance width, exact for the characters amounts use.
fn text_width(text: &str, size: f32) -> f32 {
    let units: u32 = text
        .chars()
        .map(|c| match c {
            '0'..='9' | '$' => 556,
            '.' | ',' | ' ' => 278,
            '-' => 333,
            'R' => 722,
            'i' | 'l' | 'j' => 222,
            'f' | 't' | 'I' => 278,
            'm' | 'M' => 833,
            'w' | 'W' => 778,
            c if c.is_uppercase() => 667,
            _ => 556,
        })
        .sum();
    units as f32 * size / 1000.0
}
