use anyhow::{anyhow, Result};
use printpdf::{BuiltinFont, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference, Point};

use super::layout::{Block, InvoiceDocument, TextLine, BODY_SIZE};

const PT_TO_MM: f32 = 0.352_778;
const LINE_SPACING: f32 = 1.45;
/// Rough Helvetica advance per point of font size, used for truncation and right alignment.
const AVG_GLYPH_WIDTH: f32 = 0.5;
const BLOCK_GAP_MM: f32 = 5.0;
const SIGNATURE_GAP_MM: f32 = 18.0;

pub trait DocumentRenderer {
    fn render(&self, document: &InvoiceDocument) -> Result<Vec<u8>>;
}

/// PDF output using the standard Helvetica faces.
pub struct PdfRenderer;

/// Plain-text rendering for terminal previews.
pub struct TextRenderer {
    pub width: usize,
}

impl Default for TextRenderer {
    fn default() -> Self {
        TextRenderer { width: 72 }
    }
}

struct PdfCanvas {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    width_mm: f32,
    height_mm: f32,
    margin_mm: f32,
    y: f32,
}

impl PdfCanvas {
    fn line_height(size: f32) -> f32 {
        size * LINE_SPACING * PT_TO_MM
    }

    fn content_width(&self) -> f32 {
        self.width_mm - 2.0 * self.margin_mm
    }

    fn left(&self) -> f32 {
        self.margin_mm
    }

    fn right(&self) -> f32 {
        self.width_mm - self.margin_mm
    }

    /// Starts a new page when fewer than `needed` millimetres remain.
    fn ensure_space(&mut self, needed: f32) {
        if self.y - needed >= self.margin_mm {
            return;
        }
        let (page, layer) = self
            .doc
            .add_page(Mm(self.width_mm), Mm(self.height_mm), "Layer 1");
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.y = self.height_mm - self.margin_mm;
    }

    fn text_at(&self, line: &TextLine, x: f32, y: f32) {
        let font = if line.bold { &self.bold } else { &self.regular };
        self.layer
            .use_text(line.text.clone(), line.size, Mm(x), Mm(y), font);
    }

    fn rule(&self, y: f32) {
        let line = Line {
            points: vec![
                (Point::new(Mm(self.left()), Mm(y)), false),
                (Point::new(Mm(self.right()), Mm(y)), false),
            ],
            is_closed: false,
        };
        self.layer.add_line(line);
    }

    fn column_stack(&mut self, left: &[TextLine], right: &[TextLine], right_x: f32) {
        let rows = left.len().max(right.len());
        for index in 0..rows {
            let size = left
                .get(index)
                .map(|l| l.size)
                .into_iter()
                .chain(right.get(index).map(|r| r.size))
                .fold(BODY_SIZE, f32::max);
            let height = Self::line_height(size);
            self.ensure_space(height);
            self.y -= height;
            if let Some(line) = left.get(index) {
                self.text_at(line, self.left(), self.y);
            }
            if let Some(line) = right.get(index) {
                self.text_at(line, right_x, self.y);
            }
        }
    }

    fn block(&mut self, block: &Block) {
        match block {
            Block::Columns {
                left,
                right,
                rule_below,
            } => {
                let right_x = self.left() + self.content_width() * 0.62;
                self.column_stack(left, right, right_x);
                if *rule_below {
                    self.y -= 2.0;
                    self.rule(self.y);
                }
            }
            Block::Title(line) => {
                let height = Self::line_height(line.size);
                self.ensure_space(height);
                self.y -= height;
                let x = self.left() + (self.content_width() - text_width(line)) / 2.0;
                self.text_at(line, x.max(self.left()), self.y);
            }
            Block::Table {
                headers,
                widths,
                rows,
            } => {
                let content_width = self.content_width();
                let columns: Vec<(f32, f32)> = widths
                    .iter()
                    .scan(self.left(), |x, fraction| {
                        let start = *x;
                        let width = fraction * content_width;
                        *x += width;
                        Some((start, width))
                    })
                    .collect();
                let height = Self::line_height(BODY_SIZE) + 1.5;

                self.ensure_space(height * 2.0);
                self.rule(self.y);
                self.y -= height;
                for (header, (x, width)) in headers.iter().zip(&columns) {
                    let cell = TextLine::bold(fit_text(header, *width, BODY_SIZE));
                    self.text_at(&cell, x + 1.0, self.y + 1.0);
                }
                self.rule(self.y - 0.5);

                for row in rows {
                    self.ensure_space(height);
                    self.y -= height;
                    for (value, (x, width)) in row.iter().zip(&columns) {
                        let cell = TextLine::body(fit_text(value, *width, BODY_SIZE));
                        self.text_at(&cell, x + 1.0, self.y + 1.0);
                    }
                    self.rule(self.y - 0.5);
                }
            }
            Block::Totals(lines) => {
                let amount_right = self.right();
                let label_x = self.right() - self.content_width() * 0.45;
                for total in lines {
                    let label = if total.emphasis {
                        TextLine::bold(total.label.clone())
                    } else {
                        TextLine::body(total.label.clone())
                    };
                    let amount = TextLine {
                        text: total.amount.clone(),
                        ..label.clone()
                    };
                    let height = Self::line_height(BODY_SIZE);
                    self.ensure_space(height);
                    self.y -= height;
                    self.text_at(&label, label_x, self.y);
                    self.text_at(&amount, amount_right - text_width(&amount), self.y);
                }
            }
            Block::Note(line) => {
                let height = Self::line_height(line.size);
                self.ensure_space(height);
                self.y -= height;
                self.text_at(line, self.left(), self.y);
            }
            Block::Signature {
                left,
                right,
                image_url,
            } => {
                self.ensure_space(SIGNATURE_GAP_MM + Self::line_height(BODY_SIZE) * 2.0);
                self.y -= SIGNATURE_GAP_MM;
                let right_x = self.left() + self.content_width() * 0.62;
                self.column_stack(left, right, right_x);
                // Remote images are not fetched; print a signing line instead.
                let marker = if image_url.is_some() {
                    "(signature on file)"
                } else {
                    "______________________"
                };
                let height = Self::line_height(BODY_SIZE);
                self.ensure_space(height);
                self.y -= height;
                self.text_at(&TextLine::body(marker), self.left(), self.y);
            }
        }
        self.y -= BLOCK_GAP_MM;
    }
}

impl DocumentRenderer for PdfRenderer {
    fn render(&self, document: &InvoiceDocument) -> Result<Vec<u8>> {
        let page = document.page;
        let (doc, page_index, layer_index) =
            PdfDocument::new(&document.title, Mm(page.width_mm), Mm(page.height_mm), "Layer 1");
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| anyhow!("PDF font: {}", e))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| anyhow!("PDF font: {}", e))?;
        let layer = doc.get_page(page_index).get_layer(layer_index);
        let margin_mm = page.padding_pt * PT_TO_MM;

        let mut canvas = PdfCanvas {
            doc,
            layer,
            regular,
            bold,
            width_mm: page.width_mm,
            height_mm: page.height_mm,
            margin_mm,
            y: page.height_mm - margin_mm,
        };
        for block in &document.blocks {
            canvas.block(block);
        }

        canvas
            .doc
            .save_to_bytes()
            .map_err(|e| anyhow!("PDF encoding: {}", e))
    }
}

impl DocumentRenderer for TextRenderer {
    fn render(&self, document: &InvoiceDocument) -> Result<Vec<u8>> {
        let width = self.width;
        let mut out = String::new();

        for block in &document.blocks {
            match block {
                Block::Columns {
                    left,
                    right,
                    rule_below,
                } => {
                    for index in 0..left.len().max(right.len()) {
                        let l = left.get(index).map(|t| t.text.as_str()).unwrap_or("");
                        let r = right.get(index).map(|t| t.text.as_str()).unwrap_or("");
                        out.push_str(&spread(l, r, width));
                        out.push('\n');
                    }
                    if *rule_below {
                        out.push_str(&"=".repeat(width));
                        out.push('\n');
                    }
                }
                Block::Title(line) => {
                    out.push_str(&format!("{:^width$}\n", line.text, width = width));
                }
                Block::Table {
                    headers,
                    widths,
                    rows,
                } => {
                    let columns: Vec<usize> = widths
                        .iter()
                        .map(|fraction| ((fraction * width as f32) as usize).max(3))
                        .collect();
                    out.push_str(&table_row(headers, &columns));
                    out.push_str(&"-".repeat(width));
                    out.push('\n');
                    for row in rows {
                        out.push_str(&table_row(row, &columns));
                    }
                    out.push_str(&"-".repeat(width));
                    out.push('\n');
                }
                Block::Totals(lines) => {
                    for total in lines {
                        let text = format!("{} {:>16}", total.label, total.amount);
                        out.push_str(&format!("{:>width$}\n", text, width = width));
                    }
                }
                Block::Note(line) => {
                    out.push_str(&line.text);
                    out.push('\n');
                }
                Block::Signature { left, right, .. } => {
                    out.push('\n');
                    for index in 0..left.len().max(right.len()) {
                        let l = left.get(index).map(|t| t.text.as_str()).unwrap_or("");
                        let r = right.get(index).map(|t| t.text.as_str()).unwrap_or("");
                        out.push_str(&spread(l, r, width));
                        out.push('\n');
                    }
                }
            }
            out.push('\n');
        }

        Ok(out.into_bytes())
    }
}

fn text_width(line: &TextLine) -> f32 {
    line.text.chars().count() as f32 * line.size * AVG_GLYPH_WIDTH * PT_TO_MM
}

/// Cuts `text` so it fits a column of `width_mm` at `size` points.
fn fit_text(text: &str, width_mm: f32, size: f32) -> String {
    let max_chars = ((width_mm - 2.0) / (size * AVG_GLYPH_WIDTH * PT_TO_MM)).floor().max(1.0) as usize;
    truncate(text, max_chars)
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars <= 3 {
        return text.chars().take(max_chars).collect();
    }
    let mut cut: String = text.chars().take(max_chars - 3).collect();
    cut.push_str("...");
    cut
}

fn spread(left: &str, right: &str, width: usize) -> String {
    let used = left.chars().count() + right.chars().count();
    if used + 1 >= width {
        return format!("{} {}", left, right).trim_end().to_string();
    }
    format!("{}{}{}", left, " ".repeat(width - used), right)
        .trim_end()
        .to_string()
}

fn table_row(cells: &[String], columns: &[usize]) -> String {
    let mut line = String::new();
    for (cell, width) in cells.iter().zip(columns) {
        let cell = truncate(cell, width - 1);
        let padding = width - cell.chars().count();
        line.push_str(&cell);
        line.push_str(&" ".repeat(padding));
    }
    let mut line = line.trim_end().to_string();
    line.push('\n');
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::draft::{BillDraft, CustomerChoice};
    use crate::models::{NewCustomer, Profile};
    use crate::pdf::layout::{build_invoice, InvoiceData};
    use chrono::{NaiveDate, Utc};

    fn document(items: usize) -> InvoiceDocument {
        let profile = Profile {
            id: "u1".into(),
            full_name: None,
            company_name: "Asha Traders".into(),
            company_address: None,
            gstin: None,
            signature_url: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let mut draft = BillDraft::new("INV-2026-0001");
        draft.set_customer(CustomerChoice::New(NewCustomer {
            name: "Ravi".into(),
            ..NewCustomer::default()
        }));
        for n in 0..items {
            draft.push_item(&format!("Item {}", n), 1, 10.0);
        }
        let date = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        build_invoice(&profile, &InvoiceData::from_draft(&draft, None, None, date), "Rs.")
    }

    #[test]
    fn pdf_output_is_a_pdf_file() {
        let bytes = PdfRenderer.render(&document(3)).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    /// Page objects in the output: `/Type /Page` but not `/Type /Pages`.
    fn page_count(pdf: &[u8]) -> usize {
        let text = String::from_utf8_lossy(pdf);
        text.match_indices("/Type")
            .filter(|(at, _)| {
                let rest = text[at + "/Type".len()..].trim_start();
                rest.starts_with("/Page") && !rest.starts_with("/Pages")
            })
            .count()
    }

    #[test]
    fn long_tables_flow_onto_more_pages() {
        let short = PdfRenderer.render(&document(2)).unwrap();
        let long = PdfRenderer.render(&document(120)).unwrap();
        assert_eq!(page_count(&short), 1);
        assert!(page_count(&long) >= 2);
    }

    #[test]
    fn text_preview_shows_rows_and_totals() {
        let bytes = TextRenderer::default().render(&document(2)).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("Tax Invoice"));
        assert!(text.contains("Item 0"));
        assert!(text.contains("Invoice #INV-2026-0001"));
        assert!(text.contains("Rs.20.00"));
        assert!(text.lines().all(|l| l.chars().count() <= 72));
    }

    #[test]
    fn truncation_marks_cut_text() {
        assert_eq!(truncate("Portland cement 53 grade", 10), "Portlan...");
        assert_eq!(truncate("Sand", 10), "Sand");
        assert_eq!(truncate("Sand", 2), "Sa");
    }
}
