//! Greedy, single-pass pagination of a shaped report onto fixed-size pages, plus the encoders
//! that turn the laid-out document into bytes.

use crate::catalog::{Align, ColorRule, ColumnSpec, FontTier, Orientation, PageSize, ReportSchema, PAGE_MARGIN_MM};
use crate::error::Result;
use crate::movement::{Rgb, NEGATIVE_TEXT_COLOR, SUMMARY_ROW_COLOR};
use crate::schema::{ExportFormat, ReportOptions};
use crate::shaping::{ReportBody, RowRole, ShapedReport, ShapedRow};
use crate::utils::truncate_chars;
use chrono::NaiveDateTime;
use log::debug;
use serde::Serialize;

pub const TITLE_BAND_MM: f64 = 8.0;
pub const SUBTITLE_BAND_MM: f64 = 6.0;
pub const FOOTER_BAND_MM: f64 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BandKind {
    PageHeader,
    TableHeader,
    DateHeader,
    GroupHeader,
    Detail,
    Summary,
    Totals,
    Footer,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cell {
    pub text: String,
    pub x_mm: f64,
    pub width_mm: f64,
    /// Character capacity of the cell; `text` never exceeds it.
    pub chars: usize,
    pub align: Align,
    pub color: Option<Rgb>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Band {
    pub kind: BandKind,
    pub y_mm: f64,
    pub height_mm: f64,
    pub background: Option<Rgb>,
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedPage {
    pub number: usize,
    pub bands: Vec<Band>,
}

impl RenderedPage {
    pub fn bands_of(&self, kind: BandKind) -> impl Iterator<Item = &Band> {
        self.bands.iter().filter(move |b| b.kind == kind)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedDocument {
    pub title: String,
    pub subtitle: Option<String>,
    pub orientation: Orientation,
    pub page_size: PageSize,
    pub font_tier: FontTier,
    pub generated_at: NaiveDateTime,
    pub pages: Vec<RenderedPage>,
}

impl RenderedDocument {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// Minimum space left on a page before a new date section or group is started on it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectionThresholds {
    pub date_section_mm: f64,
    pub group_mm: f64,
}

pub fn section_thresholds(tier: FontTier) -> SectionThresholds {
    match tier {
        FontTier::Compact => SectionThresholds {
            date_section_mm: 30.0,
            group_mm: 22.0,
        },
        FontTier::Standard => SectionThresholds {
            date_section_mm: 36.0,
            group_mm: 26.0,
        },
        FontTier::Large => SectionThresholds {
            date_section_mm: 45.0,
            group_mm: 32.0,
        },
    }
}

struct PageBuilder<'a> {
    schema: &'a ReportSchema,
    title: &'a str,
    subtitle: Option<&'a str>,
    pages: Vec<RenderedPage>,
    cursor_mm: f64,
    bottom_mm: f64,
    row_mm: f64,
    body_bands: usize,
}

impl<'a> PageBuilder<'a> {
    fn new(schema: &'a ReportSchema, title: &'a str, subtitle: Option<&'a str>) -> Self {
        let page = schema.page_size();
        let mut builder = Self {
            schema,
            title,
            subtitle,
            pages: Vec::new(),
            cursor_mm: PAGE_MARGIN_MM,
            bottom_mm: page.height_mm - PAGE_MARGIN_MM - FOOTER_BAND_MM,
            row_mm: schema.font_tier.row_height_mm(),
            body_bands: 0,
        };
        builder.start_page();
        builder
    }

    fn table_width_chars(&self) -> usize {
        self.schema.columns.iter().map(|c| c.max_chars).sum()
    }

    fn spanning_cell(&self, text: &str, align: Align) -> Cell {
        let chars = self.table_width_chars();
        Cell {
            text: truncate_chars(text, chars),
            x_mm: PAGE_MARGIN_MM,
            width_mm: self.schema.table_width_mm(),
            chars,
            align,
            color: None,
        }
    }

    fn start_page(&mut self) {
        self.pages.push(RenderedPage {
            number: self.pages.len() + 1,
            bands: Vec::new(),
        });
        self.cursor_mm = PAGE_MARGIN_MM;
        self.body_bands = 0;

        let title = self.spanning_cell(self.title, Align::Center);
        self.place(BandKind::PageHeader, TITLE_BAND_MM, None, vec![title]);
        if let Some(subtitle) = self.subtitle {
            let subtitle = self.spanning_cell(subtitle, Align::Center);
            self.place(BandKind::PageHeader, SUBTITLE_BAND_MM, None, vec![subtitle]);
        }

        let headers = column_cells(self.schema, |c| c.header.to_string(), |_| None);
        self.place(BandKind::TableHeader, self.row_mm, Some(SUMMARY_ROW_COLOR), headers);
    }

    fn place(&mut self, kind: BandKind, height_mm: f64, background: Option<Rgb>, cells: Vec<Cell>) {
        let band = Band {
            kind,
            y_mm: self.cursor_mm,
            height_mm,
            background,
            cells,
        };
        self.cursor_mm += height_mm;
        if !matches!(kind, BandKind::PageHeader | BandKind::TableHeader) {
            self.body_bands += 1;
        }
        if let Some(page) = self.pages.last_mut() {
            page.bands.push(band);
        }
    }

    fn remaining_mm(&self) -> f64 {
        self.bottom_mm - self.cursor_mm
    }

    /// Breaks the page when less than `threshold_mm` is left. A page without body bands is
    /// never broken, so an oversized section still makes progress.
    fn ensure_section(&mut self, threshold_mm: f64) {
        if self.body_bands > 0 && self.remaining_mm() < threshold_mm {
            self.start_page();
        }
    }

    fn ensure_row(&mut self, height_mm: f64) {
        if self.body_bands > 0 && self.cursor_mm + height_mm > self.bottom_mm {
            self.start_page();
        }
    }

    fn heading(&mut self, kind: BandKind, text: &str) {
        self.ensure_row(self.row_mm);
        let cell = self.spanning_cell(text, Align::Left);
        self.place(kind, self.row_mm, None, vec![cell]);
    }

    fn row(&mut self, row: &ShapedRow) {
        self.ensure_row(self.row_mm);
        let (kind, background) = match row.role {
            RowRole::Detail => (
                BandKind::Detail,
                row.kind
                    .filter(|_| self.schema.row_colors)
                    .map(|k| k.traits().row_color),
            ),
            RowRole::Opening | RowRole::Closing => (BandKind::Summary, Some(SUMMARY_ROW_COLOR)),
            RowRole::Totals => (BandKind::Totals, Some(SUMMARY_ROW_COLOR)),
        };
        let cells = row_cells(self.schema, row);
        self.place(kind, self.row_mm, background, cells);
    }

    fn stamp_footers(&mut self, generated_at: NaiveDateTime) {
        let total = self.pages.len();
        let page_height = self.schema.page_size().height_mm;
        let half_mm = self.schema.table_width_mm() / 2.0;
        let half_chars = self.table_width_chars() / 2;
        let stamp = format!("Generated: {}", generated_at.format("%d-%m-%Y %H:%M:%S"));

        for page in &mut self.pages {
            let cell = |text: String, x_mm: f64, align: Align| Cell {
                text: truncate_chars(&text, half_chars),
                x_mm,
                width_mm: half_mm,
                chars: half_chars,
                align,
                color: None,
            };
            page.bands.push(Band {
                kind: BandKind::Footer,
                y_mm: page_height - PAGE_MARGIN_MM - FOOTER_BAND_MM,
                height_mm: FOOTER_BAND_MM,
                background: None,
                cells: vec![
                    cell(format!("Page {} of {}", page.number, total), PAGE_MARGIN_MM, Align::Left),
                    cell(stamp.clone(), PAGE_MARGIN_MM + half_mm, Align::Right),
                ],
            });
        }
    }
}

fn column_cells(
    schema: &ReportSchema,
    text: impl Fn(&ColumnSpec) -> String,
    color: impl Fn(&ColumnSpec) -> Option<Rgb>,
) -> Vec<Cell> {
    let mut x_mm = PAGE_MARGIN_MM;
    schema
        .columns
        .iter()
        .map(|column| {
            let cell = Cell {
                text: truncate_chars(&text(column), column.max_chars),
                x_mm,
                width_mm: column.width_mm,
                chars: column.max_chars,
                align: column.align,
                color: color(column),
            };
            x_mm += column.width_mm;
            cell
        })
        .collect()
}

fn row_cells(schema: &ReportSchema, row: &ShapedRow) -> Vec<Cell> {
    column_cells(
        schema,
        |column| {
            let text = row.value(column.data_key).display();
            match (column.color_rule, row.marker) {
                (ColorRule::Marker, Some(marker)) => format!("{} {}", marker, text),
                _ => text,
            }
        },
        |column| {
            let negative = row.value(column.data_key).is_negative();
            (column.color_rule == ColorRule::NegativeRed && negative).then_some(NEGATIVE_TEXT_COLOR)
        },
    )
}

/// Lays a shaped report out page by page. The totals band closes the last page.
pub fn render(report: &ShapedReport, options: &ReportOptions) -> RenderedDocument {
    render_body(&report.body, &report.totals, report.schema, options)
}

pub fn render_body(
    body: &ReportBody,
    totals: &ShapedRow,
    schema: &ReportSchema,
    options: &ReportOptions,
) -> RenderedDocument {
    let title = if options.title.trim().is_empty() {
        schema.title.to_string()
    } else {
        options.title.clone()
    };
    let subtitle = subtitle_line(options);
    let generated_at = options.resolved_generated_at();
    let thresholds = section_thresholds(schema.font_tier);

    let mut builder = PageBuilder::new(schema, &title, subtitle.as_deref());

    match body {
        ReportBody::Flat(rows) => {
            for row in rows {
                builder.row(row);
            }
        }
        ReportBody::Grouped(sections) => {
            for section in sections {
                builder.ensure_section(thresholds.date_section_mm);
                builder.heading(BandKind::DateHeader, &section.heading);
                for group in &section.groups {
                    builder.ensure_section(thresholds.group_mm);
                    builder.heading(BandKind::GroupHeader, &group.heading);
                    for row in &group.inflows {
                        builder.row(row);
                    }
                    builder.row(&group.opening);
                    for row in &group.details {
                        builder.row(row);
                    }
                    builder.row(&group.closing);
                }
            }
        }
    }

    builder.row(totals);
    builder.stamp_footers(generated_at);

    debug!(
        "Laid out {} rows of {} on {} pages",
        body.row_count(),
        schema.kind,
        builder.pages.len()
    );

    let pages = builder.pages;
    RenderedDocument {
        title,
        subtitle,
        orientation: schema.orientation,
        page_size: schema.page_size(),
        font_tier: schema.font_tier,
        generated_at,
        pages,
    }
}

fn subtitle_line(options: &ReportOptions) -> Option<String> {
    let parts: Vec<String> = [
        options.subtitle.clone(),
        options.date_range.clone(),
        Some(options.filter_type.label().to_string()),
    ]
    .into_iter()
    .flatten()
    .filter(|s| !s.trim().is_empty())
    .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" | "))
    }
}

fn pad(cell: &Cell) -> String {
    let width = cell.chars;
    match cell.align {
        Align::Left => format!("{:<width$}", cell.text),
        Align::Right => format!("{:>width$}", cell.text),
        Align::Center => format!("{:^width$}", cell.text),
    }
}

/// Fixed-width text: one line per band, pages separated by form feeds.
pub fn encode_plain_text(document: &RenderedDocument) -> String {
    document
        .pages
        .iter()
        .map(|page| {
            page.bands
                .iter()
                .map(|band| {
                    let line = band.cells.iter().map(pad).collect::<Vec<_>>().join(" ");
                    format!("{}\n", line.trim_end())
                })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("\x0C")
}

pub fn encode(document: &RenderedDocument, format: ExportFormat) -> Result<Vec<u8>> {
    match format {
        ExportFormat::PlainText => Ok(encode_plain_text(document).into_bytes()),
        ExportFormat::Json => Ok(serde_json::to_vec_pretty(document)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{get_schema, ReportKind};
    use crate::shaping::{compute_totals, CellValue, DateSection, GroupSection};
    use chrono::NaiveDate;

    fn options() -> ReportOptions {
        ReportOptions {
            generated_at: NaiveDate::from_ymd_opt(2024, 4, 30)
                .unwrap()
                .and_hms_opt(18, 5, 0),
            ..ReportOptions::new("Test Report")
        }
    }

    fn detail(bags: i64, broker: &str) -> ShapedRow {
        ShapedRow::new(RowRole::Detail)
            .with("sl_no", CellValue::text("1"))
            .with("bags", CellValue::Bags(bags))
            .with("qtls", CellValue::Decimal(bags as f64 * 0.75))
            .with("broker", CellValue::text(broker))
    }

    #[test]
    fn test_hard_truncation_without_ellipsis() {
        let schema = get_schema(ReportKind::PurchaseLedger);
        let rows = vec![detail(1, "Venkateswara Traders and Commission Agents")];
        let totals = compute_totals(schema, &rows, "TOTAL");
        let doc = render_body(&ReportBody::Flat(rows), &totals, schema, &options());

        let band = doc.pages[0].bands_of(BandKind::Detail).next().unwrap();
        let broker = band.cells.iter().find(|c| c.chars == 15).unwrap();
        assert_eq!(broker.text, "Venkateswara Tr");
    }

    #[test]
    fn test_footer_stamped_with_final_page_count() {
        let schema = get_schema(ReportKind::PurchaseLedger);
        let rows: Vec<ShapedRow> = (0..90).map(|i| detail(i, "B")).collect();
        let totals = compute_totals(schema, &rows, "TOTAL");
        let doc = render_body(&ReportBody::Flat(rows), &totals, schema, &options());

        assert_eq!(doc.page_count(), 3);
        for page in &doc.pages {
            let footer = page.bands_of(BandKind::Footer).next().unwrap();
            assert_eq!(footer.cells[0].text, format!("Page {} of 3", page.number));
            assert_eq!(footer.cells[1].text, "Generated: 30-04-2024 18:05:00");
            assert_eq!(page.bands_of(BandKind::TableHeader).count(), 1);
        }
    }

    #[test]
    fn test_rows_never_cross_the_footer() {
        let schema = get_schema(ReportKind::MovementAudit);
        let rows: Vec<ShapedRow> = (0..200).map(|i| detail(i, "B")).collect();
        let totals = compute_totals(schema, &rows, "TOTAL");
        let doc = render_body(&ReportBody::Flat(rows), &totals, schema, &options());

        let limit = schema.page_size().height_mm - PAGE_MARGIN_MM - FOOTER_BAND_MM;
        for page in &doc.pages {
            for band in page.bands.iter().filter(|b| b.kind != BandKind::Footer) {
                assert!(band.y_mm + band.height_mm <= limit + 1e-9);
            }
        }
    }

    #[test]
    fn test_group_moves_to_next_page_below_threshold() {
        let schema = get_schema(ReportKind::RiceStock);
        let summary = |role| ShapedRow::new(role).with("bags", CellValue::Bags(0));
        let group = |details: usize| GroupSection {
            heading: "Product: Rice".to_string(),
            inflows: Vec::new(),
            opening: summary(RowRole::Opening),
            details: (0..details).map(|i| detail(i as i64, "-")).collect(),
            closing: summary(RowRole::Closing),
        };
        // Both headings and 36 rows leave 21mm on the first page.
        let sections = vec![DateSection {
            date: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            heading: "Date: 01-04-2024".to_string(),
            groups: vec![group(34), group(1)],
        }];
        let totals = ShapedRow::new(RowRole::Totals);
        let doc = render_body(&ReportBody::Grouped(sections), &totals, schema, &options());

        assert_eq!(doc.page_count(), 2);
        assert_eq!(doc.pages[0].bands_of(BandKind::GroupHeader).count(), 1);
        assert_eq!(doc.pages[1].bands_of(BandKind::GroupHeader).count(), 1);
    }

    #[test]
    fn test_negative_figures_are_red_and_marked() {
        let schema = get_schema(ReportKind::PaddyStock);
        let mut row = ShapedRow::new(RowRole::Detail)
            .with("movement_type", CellValue::text("production-shifting"))
            .with("bags", CellValue::Bags(-80));
        row.marker = Some("(-)");
        let cells = row_cells(schema, &row);

        assert_eq!(cells[0].text, "(-) production-s");
        assert_eq!(cells[1].color, Some(NEGATIVE_TEXT_COLOR));
        assert_eq!(cells[0].color, None);
    }

    #[test]
    fn test_plain_text_pages_split_on_form_feed() {
        let schema = get_schema(ReportKind::PurchaseLedger);
        let rows: Vec<ShapedRow> = (0..90).map(|i| detail(i, "B")).collect();
        let totals = compute_totals(schema, &rows, "TOTAL");
        let doc = render_body(&ReportBody::Flat(rows), &totals, schema, &options());

        let text = String::from_utf8(encode(&doc, ExportFormat::PlainText).unwrap()).unwrap();
        assert_eq!(text.split('\x0C').count(), 3);
        assert!(text.contains("Page 3 of 3"));

        let json = encode(&doc, ExportFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
        assert_eq!(value["pages"].as_array().unwrap().len(), 3);
    }
}
