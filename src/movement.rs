//! The movement taxonomy and the one table that says how each kind moves stock and how it is
//! painted on a report. The reconciliation engine and the layout renderer both read from here.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MovementKind {
    Purchase,
    Shifting,
    ProductionShifting,
    ForProduction,
    Production,
    Sale,
    Palti,
    PaltiShortage,
}

impl MovementKind {
    pub const ALL: [MovementKind; 8] = [
        MovementKind::Purchase,
        MovementKind::Shifting,
        MovementKind::ProductionShifting,
        MovementKind::ForProduction,
        MovementKind::Production,
        MovementKind::Sale,
        MovementKind::Palti,
        MovementKind::PaltiShortage,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            MovementKind::Purchase => "purchase",
            MovementKind::Shifting => "shifting",
            MovementKind::ProductionShifting => "production-shifting",
            MovementKind::ForProduction => "for-production",
            MovementKind::Production => "production",
            MovementKind::Sale => "sale",
            MovementKind::Palti => "palti",
            MovementKind::PaltiShortage => "palti-shortage",
        }
    }

    pub fn traits(&self) -> &'static MovementTraits {
        movement_traits(*self)
    }

    pub fn is_production_bound(&self) -> bool {
        self.traits().sign == StockSign::ProductionBound
    }
}

/// How a movement kind affects the stock it is posted against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StockSign {
    /// Adds to the partition's opening stock.
    Inbound,
    /// Subtracts from the running total.
    Outbound,
    /// Inbound at the destination, outbound at the source.
    Transfer,
    /// Consumed into an outturn; subtracted and marked "(-)".
    ProductionBound,
    /// Relieves one packaging and credits another; shortage is lost.
    Repack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub fn hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.0, self.1, self.2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MovementTraits {
    pub kind: MovementKind,
    pub sign: StockSign,
    pub row_color: Rgb,
    pub marker: Option<&'static str>,
}

pub const PRODUCTION_MARKER: &str = "(-)";

static MOVEMENT_TABLE: [MovementTraits; 8] = [
    MovementTraits {
        kind: MovementKind::Purchase,
        sign: StockSign::Inbound,
        row_color: Rgb(220, 252, 231),
        marker: None,
    },
    MovementTraits {
        kind: MovementKind::Shifting,
        sign: StockSign::Transfer,
        row_color: Rgb(219, 234, 254),
        marker: None,
    },
    MovementTraits {
        kind: MovementKind::ProductionShifting,
        sign: StockSign::ProductionBound,
        row_color: Rgb(255, 237, 213),
        marker: Some(PRODUCTION_MARKER),
    },
    MovementTraits {
        kind: MovementKind::ForProduction,
        sign: StockSign::ProductionBound,
        row_color: Rgb(254, 249, 195),
        marker: Some(PRODUCTION_MARKER),
    },
    MovementTraits {
        kind: MovementKind::Production,
        sign: StockSign::ProductionBound,
        row_color: Rgb(237, 233, 254),
        marker: Some(PRODUCTION_MARKER),
    },
    MovementTraits {
        kind: MovementKind::Sale,
        sign: StockSign::Outbound,
        row_color: Rgb(254, 226, 226),
        marker: None,
    },
    MovementTraits {
        kind: MovementKind::Palti,
        sign: StockSign::Repack,
        row_color: Rgb(207, 250, 254),
        marker: None,
    },
    MovementTraits {
        kind: MovementKind::PaltiShortage,
        sign: StockSign::Repack,
        row_color: Rgb(252, 231, 243),
        marker: None,
    },
];

pub fn movement_traits(kind: MovementKind) -> &'static MovementTraits {
    let idx = MovementKind::ALL
        .iter()
        .position(|k| *k == kind)
        .unwrap_or_default();
    &MOVEMENT_TABLE[idx]
}

/// Background for opening/closing summary rows.
pub const SUMMARY_ROW_COLOR: Rgb = Rgb(243, 244, 246);

/// Text colour for negative figures in columns that ask for it.
pub const NEGATIVE_TEXT_COLOR: Rgb = Rgb(185, 28, 28);
