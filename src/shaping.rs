//! Turns canonical records, ledger entries and yields into the rows a report schema prints.
//!
//! Totals are computed here, once, over the whole dataset. The layout renderer only places
//! them; it never adds anything up per page.

use crate::catalog::{get_schema, ReportKind, ReportSchema, TotalRule};
use crate::chunking::ChunkProcessor;
use crate::engine::{yield_percent, GroupKey, LedgerEntry, LedgerLine, OutturnYield, ReconciliationEngine};
use crate::error::Result;
use crate::ingestion::{canonicalize_record, CanonicalRecord, ProductType, StockClass};
use crate::movement::MovementKind;
use crate::schema::{LooseNumber, RawMovementRecord};
use crate::utils::{format_display_date, format_percent, format_qtls, MISSING};
use chrono::NaiveDate;
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CellValue {
    Text(String),
    Bags(i64),
    /// Quintals and weights, printed at two decimals.
    Decimal(f64),
    Percent(f64),
    Empty,
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        CellValue::Text(value.into())
    }

    pub fn display(&self) -> String {
        match self {
            CellValue::Text(s) => s.clone(),
            CellValue::Bags(n) => n.to_string(),
            CellValue::Decimal(v) => format_qtls(*v),
            CellValue::Percent(v) => format_percent(*v),
            CellValue::Empty => String::new(),
        }
    }

    pub fn is_negative(&self) -> bool {
        match self {
            CellValue::Bags(n) => *n < 0,
            CellValue::Decimal(v) | CellValue::Percent(v) => format_qtls(*v).starts_with('-'),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RowRole {
    Detail,
    Opening,
    Closing,
    Totals,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShapedRow {
    pub role: RowRole,
    /// Drives the row background when the schema colours rows.
    pub kind: Option<MovementKind>,
    pub marker: Option<&'static str>,
    pub values: BTreeMap<&'static str, CellValue>,
}

static EMPTY_CELL: CellValue = CellValue::Empty;

impl ShapedRow {
    pub fn new(role: RowRole) -> Self {
        Self {
            role,
            kind: None,
            marker: None,
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &'static str, value: CellValue) -> Self {
        self.values.insert(key, value);
        self
    }

    pub fn value(&self, key: &str) -> &CellValue {
        self.values.get(key).unwrap_or(&EMPTY_CELL)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSection {
    pub heading: String,
    /// The inbound movements making up the opening stock, printed above it.
    pub inflows: Vec<ShapedRow>,
    pub opening: ShapedRow,
    pub details: Vec<ShapedRow>,
    pub closing: ShapedRow,
}

impl GroupSection {
    pub fn row_count(&self) -> usize {
        self.inflows.len() + self.details.len() + 2
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateSection {
    pub date: NaiveDate,
    pub heading: String,
    pub groups: Vec<GroupSection>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ReportBody {
    Flat(Vec<ShapedRow>),
    Grouped(Vec<DateSection>),
}

impl ReportBody {
    pub fn row_count(&self) -> usize {
        match self {
            ReportBody::Flat(rows) => rows.len(),
            ReportBody::Grouped(sections) => sections
                .iter()
                .flat_map(|s| &s.groups)
                .map(GroupSection::row_count)
                .sum(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShapedReport {
    pub schema: &'static ReportSchema,
    pub body: ReportBody,
    pub totals: ShapedRow,
}

/// Data key of the per-product column on the outturn yield report.
pub fn product_column_key(product: ProductType) -> &'static str {
    match product {
        ProductType::Rice => "product_rice",
        ProductType::Broken => "product_broken",
        ProductType::RjRice1 => "product_rj_rice_1",
        ProductType::ZeroBroken => "product_zero_broken",
        ProductType::Unpolish => "product_unpolish",
        ProductType::Faram => "product_faram",
        ProductType::Bran => "product_bran",
        ProductType::RjRice2 => "product_rj_rice_2",
        ProductType::SizerBroken => "product_sizer_broken",
    }
}

/// Sums, counts and ratios for the totals band, taken over every row passed in.
pub fn compute_totals<'r>(
    schema: &ReportSchema,
    rows: impl IntoIterator<Item = &'r ShapedRow>,
    label: &str,
) -> ShapedRow {
    let mut bag_sums: BTreeMap<&'static str, i64> = BTreeMap::new();
    let mut decimal_sums: BTreeMap<&'static str, f64> = BTreeMap::new();
    let mut count = 0usize;

    for row in rows {
        count += 1;
        for column in schema.columns.iter().filter(|c| c.total == TotalRule::Sum) {
            match row.value(column.data_key) {
                CellValue::Bags(n) => *bag_sums.entry(column.data_key).or_default() += n,
                CellValue::Decimal(v) => *decimal_sums.entry(column.data_key).or_default() += v,
                _ => {}
            }
        }
    }

    let summed = |key: &str| -> f64 {
        decimal_sums
            .get(key)
            .copied()
            .or_else(|| bag_sums.get(key).map(|n| *n as f64))
            .unwrap_or(0.0)
    };

    let mut totals = ShapedRow::new(RowRole::Totals);
    for column in schema.columns {
        let value = match column.total {
            TotalRule::None => CellValue::Empty,
            TotalRule::Label => CellValue::text(label),
            TotalRule::Count => CellValue::text(format!("{} rows", count)),
            TotalRule::Sum => match (bag_sums.get(column.data_key), decimal_sums.get(column.data_key)) {
                (_, Some(v)) => CellValue::Decimal(*v),
                (Some(n), None) => CellValue::Bags(*n),
                (None, None) => CellValue::Empty,
            },
            TotalRule::Ratio {
                numerator,
                denominator,
            } => CellValue::Percent(yield_percent(summed(numerator), summed(denominator))),
        };
        totals.values.insert(column.data_key, value);
    }
    totals
}

fn number(value: &Option<LooseNumber>) -> CellValue {
    value
        .as_ref()
        .and_then(LooseNumber::as_f64)
        .map(CellValue::Decimal)
        .unwrap_or_else(|| CellValue::text(MISSING))
}

fn record_cell(key: &str, raw: &RawMovementRecord, record: &CanonicalRecord) -> CellValue {
    let d = &record.display;
    match key {
        "date" => CellValue::text(&d.date),
        "movement_type" => CellValue::text(&d.movement_type),
        "variety" => CellValue::text(&d.variety),
        "product_type" => CellValue::text(&d.product_type),
        "bags" => CellValue::Bags(record.bags),
        "qtls" => CellValue::Decimal(record.quantity_qtls),
        "moisture" => number(&raw.moisture),
        "cutting" => number(&raw.cutting),
        "gross_weight" => number(&raw.gross_weight),
        "tare_weight" => number(&raw.tare_weight),
        "net_weight" => number(&raw.net_weight),
        "wb_no" => CellValue::text(&d.wb_no),
        "lorry_number" => CellValue::text(&d.lorry_number),
        "broker" => CellValue::text(&d.broker),
        "from_location" => CellValue::text(&d.from_location),
        "to_location" => CellValue::text(&d.to_location),
        "outturn" => CellValue::text(&d.outturn),
        "packaging" => CellValue::text(&d.packaging),
        "status" => match record.defect() {
            Some(defect) => CellValue::text(defect.to_string()),
            None => CellValue::text("OK"),
        },
        _ => CellValue::Empty,
    }
}

fn includes(kind: ReportKind, record: &CanonicalRecord) -> bool {
    match kind {
        ReportKind::Arrivals => {
            record.kind == Some(MovementKind::Purchase) && record.class == StockClass::Paddy
        }
        ReportKind::PurchaseLedger => record.kind == Some(MovementKind::Purchase),
        ReportKind::Shifting => matches!(
            record.kind,
            Some(MovementKind::Shifting | MovementKind::ProductionShifting | MovementKind::ForProduction)
        ),
        ReportKind::MovementAudit => true,
        ReportKind::PaddyStock | ReportKind::RiceStock | ReportKind::OutturnYield => false,
    }
}

/// One row per matching record, canonicalized window by window. Only the schema's columns are
/// materialized.
pub fn shape_flat(
    schema: &'static ReportSchema,
    records: &[RawMovementRecord],
    processor: &ChunkProcessor<'_>,
) -> Result<ShapedReport> {
    let rows = processor.fold_in_chunks(records, Vec::new(), |rows: &mut Vec<ShapedRow>, raw, index| {
        let record = canonicalize_record(raw, index);
        if !includes(schema.kind, &record) {
            return;
        }

        let mut row = ShapedRow::new(RowRole::Detail);
        row.kind = record.kind;
        row.marker = record.kind.and_then(|k| k.traits().marker);
        for column in schema.columns {
            let value = if column.data_key == "sl_no" {
                CellValue::text((rows.len() + 1).to_string())
            } else {
                record_cell(column.data_key, raw, &record)
            };
            row.values.insert(column.data_key, value);
        }
        rows.push(row);
    })?;

    debug!("Shaped {} rows for {}", rows.len(), schema.kind);
    let totals = compute_totals(schema, &rows, "TOTAL");
    Ok(ShapedReport {
        schema,
        body: ReportBody::Flat(rows),
        totals,
    })
}

fn line_row(line: &LedgerLine) -> ShapedRow {
    ShapedRow {
        role: RowRole::Detail,
        kind: Some(line.kind),
        marker: line.marker,
        values: BTreeMap::new(),
    }
    .with("movement_type", CellValue::text(line.kind.label()))
    .with("bags", CellValue::Bags(line.bags_delta))
    .with("qtls", CellValue::Decimal(line.qtls_delta))
    .with("from", CellValue::text(&line.from))
    .with("to", CellValue::text(&line.to))
    .with("reference", CellValue::text(&line.reference))
}

fn summary_row(role: RowRole, label: &str, bags: i64, qtls: f64, note: &str) -> ShapedRow {
    ShapedRow::new(role)
        .with("movement_type", CellValue::text(label))
        .with("bags", CellValue::Bags(bags))
        .with("qtls", CellValue::Decimal(qtls))
        .with("from", CellValue::Empty)
        .with("to", CellValue::Empty)
        .with("reference", CellValue::text(note))
}

/// Date sections of groups: inflows, opening, transactions, closing.
pub fn shape_ledger<K: GroupKey>(
    schema: &'static ReportSchema,
    entries: &[LedgerEntry<K>],
) -> ShapedReport {
    let mut sections: Vec<DateSection> = Vec::new();

    for entry in entries {
        let date = entry.key.date();
        let group = GroupSection {
            heading: entry.key.group_label(),
            inflows: entry.inflows.iter().map(line_row).collect(),
            opening: summary_row(
                RowRole::Opening,
                "Opening Stock",
                entry.opening_bags,
                entry.opening_qtls,
                if entry.opening_missing { "no inbound stock" } else { "" },
            ),
            details: entry.transactions.iter().map(line_row).collect(),
            closing: summary_row(
                RowRole::Closing,
                "Closing Stock",
                entry.closing_bags,
                entry.closing_qtls,
                "",
            ),
        };

        match sections.last_mut() {
            Some(section) if section.date == date => section.groups.push(group),
            _ => sections.push(DateSection {
                date,
                heading: format!("Date: {}", format_display_date(date)),
                groups: vec![group],
            }),
        }
    }

    let totals = compute_totals(
        schema,
        sections.iter().flat_map(|s| &s.groups).map(|g| &g.closing),
        "Total Closing",
    );
    ShapedReport {
        schema,
        body: ReportBody::Grouped(sections),
        totals,
    }
}

pub fn shape_yields(schema: &'static ReportSchema, yields: &[OutturnYield]) -> ShapedReport {
    let rows: Vec<ShapedRow> = yields
        .iter()
        .map(|y| {
            let mut row = ShapedRow::new(RowRole::Detail)
                .with("outturn", CellValue::text(&y.outturn))
                .with("variety", CellValue::text(&y.variety))
                .with("paddy_bags", CellValue::Bags(y.paddy_bags))
                .with("paddy_qtls", CellValue::Decimal(y.paddy_qtls))
                .with("total_qtls", CellValue::Decimal(y.total_byproduct_qtls))
                .with("yield_pct", CellValue::Percent(y.yield_pct));
            for product in ProductType::ALL {
                let qtls = y.byproducts.get(&product).copied().unwrap_or(0.0);
                row = row.with(product_column_key(product), CellValue::Decimal(qtls));
            }
            row
        })
        .collect();

    let totals = compute_totals(schema, &rows, "TOTAL");
    ShapedReport {
        schema,
        body: ReportBody::Flat(rows),
        totals,
    }
}

/// Shapes any report kind from the raw record stream.
pub fn shape_report(
    kind: ReportKind,
    records: &[RawMovementRecord],
    engine: &ReconciliationEngine<'_>,
) -> Result<ShapedReport> {
    let schema = get_schema(kind);
    match kind {
        ReportKind::Arrivals
        | ReportKind::PurchaseLedger
        | ReportKind::Shifting
        | ReportKind::MovementAudit => shape_flat(schema, records, engine.processor()),
        ReportKind::PaddyStock => Ok(shape_ledger(schema, &engine.reconcile_paddy(records)?)),
        ReportKind::RiceStock => Ok(shape_ledger(schema, &engine.reconcile_rice(records)?)),
        ReportKind::OutturnYield => Ok(shape_yields(schema, &engine.outturn_yields(records)?)),
    }
}
