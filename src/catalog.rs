//! The fixed catalogue of report layouts. A new report kind needs an entry here and a shaping
//! function in [`crate::shaping`]; nothing is inferred from the data.

use crate::error::{Result, StockLedgerError};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ReportKind {
    Arrivals,
    PurchaseLedger,
    Shifting,
    PaddyStock,
    RiceStock,
    MovementAudit,
    OutturnYield,
}

impl ReportKind {
    pub const ALL: [ReportKind; 7] = [
        ReportKind::Arrivals,
        ReportKind::PurchaseLedger,
        ReportKind::Shifting,
        ReportKind::PaddyStock,
        ReportKind::RiceStock,
        ReportKind::MovementAudit,
        ReportKind::OutturnYield,
    ];

    /// Used as the first segment of export filenames.
    pub fn file_stem(&self) -> &'static str {
        match self {
            ReportKind::Arrivals => "Arrivals",
            ReportKind::PurchaseLedger => "PurchaseLedger",
            ReportKind::Shifting => "Shifting",
            ReportKind::PaddyStock => "PaddyStock",
            ReportKind::RiceStock => "RiceStock",
            ReportKind::MovementAudit => "MovementAudit",
            ReportKind::OutturnYield => "OutturnYield",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_stem())
    }
}

impl FromStr for ReportKind {
    type Err = StockLedgerError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect::<String>()
            .to_lowercase();

        ReportKind::ALL
            .into_iter()
            .find(|kind| kind.file_stem().to_lowercase() == normalized)
            .ok_or_else(|| StockLedgerError::UnknownReportKind(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Orientation {
    Portrait,
    Landscape,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageSize {
    pub width_mm: f64,
    pub height_mm: f64,
}

pub const A4_SHORT_MM: f64 = 210.0;
pub const A4_LONG_MM: f64 = 297.0;
pub const PAGE_MARGIN_MM: f64 = 10.0;

impl Orientation {
    pub fn page_size(&self) -> PageSize {
        match self {
            Orientation::Portrait => PageSize {
                width_mm: A4_SHORT_MM,
                height_mm: A4_LONG_MM,
            },
            Orientation::Landscape => PageSize {
                width_mm: A4_LONG_MM,
                height_mm: A4_SHORT_MM,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FontTier {
    Compact,
    Standard,
    Large,
}

impl FontTier {
    pub fn font_pt(&self) -> f64 {
        match self {
            FontTier::Compact => 7.0,
            FontTier::Standard => 8.0,
            FontTier::Large => 10.0,
        }
    }

    pub fn row_height_mm(&self) -> f64 {
        match self {
            FontTier::Compact => 5.0,
            FontTier::Standard => 6.0,
            FontTier::Large => 7.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Align {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColorRule {
    Plain,
    /// Negative figures are printed in red.
    NegativeRed,
    /// Prefixes the production "(-)" marker when the row carries one.
    Marker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TotalRule {
    None,
    Label,
    Sum,
    Count,
    /// `numerator / denominator * 100` over the column totals.
    Ratio {
        numerator: &'static str,
        denominator: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LayoutStyle {
    Flat,
    /// Date header, then per group: header, opening, details, closing.
    Grouped,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ColumnSpec {
    pub header: &'static str,
    pub data_key: &'static str,
    pub width_mm: f64,
    pub max_chars: usize,
    pub align: Align,
    pub color_rule: ColorRule,
    pub total: TotalRule,
}

const fn col(
    header: &'static str,
    data_key: &'static str,
    width_mm: f64,
    max_chars: usize,
    align: Align,
) -> ColumnSpec {
    ColumnSpec {
        header,
        data_key,
        width_mm,
        max_chars,
        align,
        color_rule: ColorRule::Plain,
        total: TotalRule::None,
    }
}

impl ColumnSpec {
    const fn total(self, total: TotalRule) -> Self {
        ColumnSpec { total, ..self }
    }

    const fn colored(self, color_rule: ColorRule) -> Self {
        ColumnSpec { color_rule, ..self }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReportSchema {
    pub kind: ReportKind,
    pub title: &'static str,
    pub orientation: Orientation,
    pub font_tier: FontTier,
    pub layout: LayoutStyle,
    /// Row backgrounds follow the movement colour table.
    pub row_colors: bool,
    pub columns: &'static [ColumnSpec],
}

impl ReportSchema {
    pub fn page_size(&self) -> PageSize {
        self.orientation.page_size()
    }

    pub fn printable_width_mm(&self) -> f64 {
        self.page_size().width_mm - 2.0 * PAGE_MARGIN_MM
    }

    pub fn table_width_mm(&self) -> f64 {
        self.columns.iter().map(|c| c.width_mm).sum()
    }

    pub fn column(&self, data_key: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.data_key == data_key)
    }
}

use Align::{Center, Left, Right};

static ARRIVALS: ReportSchema = ReportSchema {
    kind: ReportKind::Arrivals,
    title: "Paddy Arrivals",
    orientation: Orientation::Landscape,
    font_tier: FontTier::Compact,
    layout: LayoutStyle::Flat,
    row_colors: true,
    columns: &[
        col("Sl", "sl_no", 9.0, 4, Right).total(TotalRule::Label),
        col("Date", "date", 18.0, 10, Center),
        col("Type", "movement_type", 22.0, 12, Left),
        col("Variety", "variety", 24.0, 13, Left),
        col("Bags", "bags", 13.0, 7, Right).total(TotalRule::Sum),
        col("Qtls", "qtls", 16.0, 9, Right).total(TotalRule::Sum),
        col("Moist", "moisture", 12.0, 6, Right),
        col("Cut", "cutting", 12.0, 6, Right),
        col("WB No", "wb_no", 16.0, 8, Left),
        col("Gross", "gross_weight", 18.0, 10, Right).total(TotalRule::Sum),
        col("Tare", "tare_weight", 16.0, 9, Right).total(TotalRule::Sum),
        col("Net", "net_weight", 18.0, 10, Right).total(TotalRule::Sum),
        col("Lorry", "lorry_number", 20.0, 11, Left),
        col("Broker", "broker", 24.0, 13, Left),
        col("From", "from_location", 19.0, 10, Left),
        col("To", "to_location", 19.0, 10, Left),
    ],
};

static PURCHASE_LEDGER: ReportSchema = ReportSchema {
    kind: ReportKind::PurchaseLedger,
    title: "Purchase Ledger",
    orientation: Orientation::Portrait,
    font_tier: FontTier::Standard,
    layout: LayoutStyle::Flat,
    row_colors: false,
    columns: &[
        col("Sl", "sl_no", 10.0, 5, Right).total(TotalRule::Label),
        col("Date", "date", 20.0, 10, Center),
        col("Variety", "variety", 28.0, 13, Left),
        col("Bags", "bags", 16.0, 7, Right).total(TotalRule::Sum),
        col("Qtls", "qtls", 20.0, 9, Right).total(TotalRule::Sum),
        col("Net Wt", "net_weight", 22.0, 10, Right).total(TotalRule::Sum),
        col("WB No", "wb_no", 18.0, 8, Left),
        col("Lorry", "lorry_number", 24.0, 11, Left),
        col("Broker", "broker", 32.0, 15, Left),
    ],
};

static SHIFTING: ReportSchema = ReportSchema {
    kind: ReportKind::Shifting,
    title: "Paddy Shifting",
    orientation: Orientation::Portrait,
    font_tier: FontTier::Standard,
    layout: LayoutStyle::Flat,
    row_colors: true,
    columns: &[
        col("Sl", "sl_no", 10.0, 5, Right).total(TotalRule::Label),
        col("Date", "date", 20.0, 10, Center),
        col("Type", "movement_type", 30.0, 14, Left).colored(ColorRule::Marker),
        col("Variety", "variety", 26.0, 12, Left),
        col("Bags", "bags", 16.0, 7, Right).total(TotalRule::Sum),
        col("Qtls", "qtls", 20.0, 9, Right).total(TotalRule::Sum),
        col("From", "from_location", 22.0, 10, Left),
        col("To", "to_location", 22.0, 10, Left),
        col("Outturn", "outturn", 24.0, 11, Left),
    ],
};

static PADDY_STOCK: ReportSchema = ReportSchema {
    kind: ReportKind::PaddyStock,
    title: "Paddy Stock Reconciliation",
    orientation: Orientation::Portrait,
    font_tier: FontTier::Standard,
    layout: LayoutStyle::Grouped,
    row_colors: true,
    columns: &[
        col("Particulars", "movement_type", 34.0, 16, Left).colored(ColorRule::Marker),
        col("Bags", "bags", 18.0, 8, Right)
            .colored(ColorRule::NegativeRed)
            .total(TotalRule::Sum),
        col("Qtls", "qtls", 22.0, 10, Right)
            .colored(ColorRule::NegativeRed)
            .total(TotalRule::Sum),
        col("From", "from", 30.0, 14, Left),
        col("To", "to", 30.0, 14, Left),
        col("Reference", "reference", 56.0, 26, Left),
    ],
};

static RICE_STOCK: ReportSchema = ReportSchema {
    kind: ReportKind::RiceStock,
    title: "Rice Stock Reconciliation",
    orientation: Orientation::Portrait,
    font_tier: FontTier::Standard,
    layout: LayoutStyle::Grouped,
    row_colors: true,
    columns: &[
        col("Particulars", "movement_type", 34.0, 16, Left).colored(ColorRule::Marker),
        col("Bags", "bags", 18.0, 8, Right)
            .colored(ColorRule::NegativeRed)
            .total(TotalRule::Sum),
        col("Qtls", "qtls", 22.0, 10, Right)
            .colored(ColorRule::NegativeRed)
            .total(TotalRule::Sum),
        col("From", "from", 30.0, 14, Left),
        col("To", "to", 30.0, 14, Left),
        col("Packing / Ref", "reference", 56.0, 26, Left),
    ],
};

static MOVEMENT_AUDIT: ReportSchema = ReportSchema {
    kind: ReportKind::MovementAudit,
    title: "Movement Audit",
    orientation: Orientation::Landscape,
    font_tier: FontTier::Compact,
    layout: LayoutStyle::Flat,
    row_colors: true,
    columns: &[
        col("Sl", "sl_no", 9.0, 4, Right).total(TotalRule::Label),
        col("Date", "date", 18.0, 10, Center),
        col("Type", "movement_type", 24.0, 13, Left),
        col("Variety", "variety", 24.0, 13, Left),
        col("Product", "product_type", 22.0, 12, Left),
        col("Bags", "bags", 13.0, 7, Right).total(TotalRule::Sum),
        col("Qtls", "qtls", 16.0, 9, Right).total(TotalRule::Sum),
        col("From", "from_location", 18.0, 10, Left),
        col("To", "to_location", 18.0, 10, Left),
        col("Outturn", "outturn", 18.0, 10, Left),
        col("Packing", "packaging", 22.0, 12, Left),
        col("WB No", "wb_no", 14.0, 7, Left),
        col("Lorry", "lorry_number", 18.0, 10, Left),
        col("Broker", "broker", 20.0, 11, Left),
        col("Status", "status", 23.0, 13, Left).total(TotalRule::Count),
    ],
};

static OUTTURN_YIELD: ReportSchema = ReportSchema {
    kind: ReportKind::OutturnYield,
    title: "Outturn Yield",
    orientation: Orientation::Landscape,
    font_tier: FontTier::Compact,
    layout: LayoutStyle::Flat,
    row_colors: false,
    columns: &[
        col("Outturn", "outturn", 22.0, 12, Left).total(TotalRule::Label),
        col("Variety", "variety", 22.0, 12, Left),
        col("Paddy Bags", "paddy_bags", 14.0, 7, Right).total(TotalRule::Sum),
        col("Paddy Qtls", "paddy_qtls", 18.0, 10, Right).total(TotalRule::Sum),
        col("Rice", "product_rice", 16.0, 9, Right).total(TotalRule::Sum),
        col("Broken", "product_broken", 16.0, 9, Right).total(TotalRule::Sum),
        col("RJ Rice 1", "product_rj_rice_1", 16.0, 9, Right).total(TotalRule::Sum),
        col("0 Broken", "product_zero_broken", 16.0, 9, Right).total(TotalRule::Sum),
        col("Unpolish", "product_unpolish", 16.0, 9, Right).total(TotalRule::Sum),
        col("Faram", "product_faram", 16.0, 9, Right).total(TotalRule::Sum),
        col("Bran", "product_bran", 16.0, 9, Right).total(TotalRule::Sum),
        col("RJ Rice (2)", "product_rj_rice_2", 16.0, 9, Right).total(TotalRule::Sum),
        col("Sizer Brkn", "product_sizer_broken", 16.0, 9, Right).total(TotalRule::Sum),
        col("Total Qtls", "total_qtls", 18.0, 10, Right).total(TotalRule::Sum),
        col("Yield %", "yield_pct", 16.0, 8, Right).total(TotalRule::Ratio {
            numerator: "total_qtls",
            denominator: "paddy_qtls",
        }),
    ],
};

/// Looks up the layout for a report kind.
pub fn get_schema(kind: ReportKind) -> &'static ReportSchema {
    match kind {
        ReportKind::Arrivals => &ARRIVALS,
        ReportKind::PurchaseLedger => &PURCHASE_LEDGER,
        ReportKind::Shifting => &SHIFTING,
        ReportKind::PaddyStock => &PADDY_STOCK,
        ReportKind::RiceStock => &RICE_STOCK,
        ReportKind::MovementAudit => &MOVEMENT_AUDIT,
        ReportKind::OutturnYield => &OUTTURN_YIELD,
    }
}

/// Name-based lookup; an unknown name is a programming error and fails immediately.
pub fn get_schema_by_name(name: &str) -> Result<&'static ReportSchema> {
    Ok(get_schema(name.parse::<ReportKind>()?))
}
