//! Canonicalizer: the only place loose persistence rows are turned into typed movements.

use crate::movement::MovementKind;
use crate::schema::{LooseNumber, RawMovementRecord};
use crate::utils::{format_display_date, normalize_code, normalize_optional_code, parse_movement_date, MISSING};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProductType {
    Rice,
    Broken,
    RjRice1,
    ZeroBroken,
    Unpolish,
    Faram,
    Bran,
    RjRice2,
    SizerBroken,
}

impl ProductType {
    pub const ALL: [ProductType; 9] = [
        ProductType::Rice,
        ProductType::Broken,
        ProductType::RjRice1,
        ProductType::ZeroBroken,
        ProductType::Unpolish,
        ProductType::Faram,
        ProductType::Bran,
        ProductType::RjRice2,
        ProductType::SizerBroken,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ProductType::Rice => "Rice",
            ProductType::Broken => "Broken",
            ProductType::RjRice1 => "RJ Rice 1",
            ProductType::ZeroBroken => "0 Broken",
            ProductType::Unpolish => "Unpolish",
            ProductType::Faram => "Faram",
            ProductType::Bran => "Bran",
            ProductType::RjRice2 => "RJ Rice (2)",
            ProductType::SizerBroken => "Sizer Broken",
        }
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Ordered marker list. Specific markers come before the generic "broken"/"rice" ones.
const PRODUCT_MARKERS: [(&str, ProductType); 12] = [
    ("sizer broken", ProductType::SizerBroken),
    ("0 broken", ProductType::ZeroBroken),
    ("rj rice (2)", ProductType::RjRice2),
    ("rj rice(2)", ProductType::RjRice2),
    ("rj rice 2", ProductType::RjRice2),
    ("rj rice 1", ProductType::RjRice1),
    ("rj rice", ProductType::RjRice1),
    ("unpolish", ProductType::Unpolish),
    ("faram", ProductType::Faram),
    ("bran", ProductType::Bran),
    ("broken", ProductType::Broken),
    ("rice", ProductType::Rice),
];

pub fn canonicalize_product_type(raw: &str) -> ProductType {
    let lowered = raw.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    PRODUCT_MARKERS
        .iter()
        .find(|(marker, _)| lowered.contains(marker))
        .map(|(_, product)| *product)
        .unwrap_or(ProductType::Rice)
}

pub fn canonicalize_movement_type(raw: &str) -> Option<MovementKind> {
    let normalized = raw
        .trim()
        .to_lowercase()
        .replace(['_', ' '], "-");

    let kind = match normalized.as_str() {
        "purchase" | "purchases" | "arrival" | "arrivals" => MovementKind::Purchase,
        "shifting" | "shift" | "transfer" => MovementKind::Shifting,
        "production-shifting" | "productionshifting" => MovementKind::ProductionShifting,
        "for-production" | "forproduction" => MovementKind::ForProduction,
        "production" | "produced" => MovementKind::Production,
        "sale" | "sales" | "dispatch" => MovementKind::Sale,
        "palti" | "repack" | "repackaging" => MovementKind::Palti,
        "palti-shortage" | "paltishortage" | "palti-short" => MovementKind::PaltiShortage,
        _ => return None,
    };
    Some(kind)
}

/// Which ledger a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StockClass {
    /// Keyed by variety, location and outturn.
    Paddy,
    /// Keyed by canonical product type.
    Rice,
}

/// A movement with exactly the references its kind needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Movement {
    Purchase {
        to_location: Option<String>,
    },
    Shifting {
        from_location: String,
        to_location: String,
    },
    ProductionShifting {
        from_location: String,
        outturn: String,
    },
    ForProduction {
        location: String,
        outturn: String,
    },
    Production {
        outturn: String,
        packaging: Option<String>,
    },
    Sale {
        packaging: Option<String>,
    },
    Palti {
        source_packaging: String,
        target_packaging: String,
        target_bags: i64,
        shortage_kg: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RecordDefect {
    UnparseableDate(String),
    UnknownMovementType(String),
    MissingField {
        kind: MovementKind,
        field: &'static str,
    },
}

impl fmt::Display for RecordDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordDefect::UnparseableDate(raw) => write!(f, "bad date '{}'", raw),
            RecordDefect::UnknownMovementType(raw) => write!(f, "unknown type '{}'", raw),
            RecordDefect::MissingField { kind, field } => {
                write!(f, "{} without {}", kind.label(), field)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RecordStatus {
    Reconcilable(Movement),
    AuditOnly(RecordDefect),
}

/// Display text for every column a report may show. Missing values are `"-"`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayFields {
    pub date: String,
    pub movement_type: String,
    pub variety: String,
    pub product_type: String,
    pub bags: String,
    pub bag_size_kg: String,
    pub quantity_qtls: String,
    pub gross_weight: String,
    pub tare_weight: String,
    pub net_weight: String,
    pub moisture: String,
    pub cutting: String,
    pub wb_no: String,
    pub lorry_number: String,
    pub broker: String,
    pub from_location: String,
    pub to_location: String,
    pub outturn: String,
    pub packaging: String,
    pub source_packaging: String,
    pub target_packaging: String,
    pub shortage_kg: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalRecord {
    /// Position of the record in the input stream.
    pub index: usize,
    pub date: Option<NaiveDate>,
    pub kind: Option<MovementKind>,
    pub class: StockClass,
    pub variety: String,
    pub product_type: ProductType,
    pub bags: i64,
    pub quantity_qtls: f64,
    pub display: DisplayFields,
    pub status: RecordStatus,
}

impl CanonicalRecord {
    pub fn movement(&self) -> Option<&Movement> {
        match &self.status {
            RecordStatus::Reconcilable(movement) => Some(movement),
            RecordStatus::AuditOnly(_) => None,
        }
    }

    pub fn defect(&self) -> Option<&RecordDefect> {
        match &self.status {
            RecordStatus::AuditOnly(defect) => Some(defect),
            RecordStatus::Reconcilable(_) => None,
        }
    }

    pub fn outturn(&self) -> Option<&str> {
        match self.movement()? {
            Movement::ProductionShifting { outturn, .. }
            | Movement::ForProduction { outturn, .. }
            | Movement::Production { outturn, .. } => Some(outturn),
            _ => None,
        }
    }
}

/// Upper bound on a single record's bag count. Keeps ledger sums far from `i64` overflow.
pub const MAX_BAGS_PER_RECORD: i64 = 1_000_000_000;

fn number(value: &Option<LooseNumber>) -> Option<f64> {
    value.as_ref().and_then(LooseNumber::as_f64)
}

fn bag_count(value: &Option<LooseNumber>) -> Option<i64> {
    number(value).map(|b| (b.abs().round() as i64).min(MAX_BAGS_PER_RECORD))
}

fn text(value: &Option<String>) -> String {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| MISSING.to_string())
}

fn number_text(value: Option<f64>) -> String {
    value
        .map(crate::utils::format_qtls)
        .unwrap_or_else(|| MISSING.to_string())
}

fn code_text(value: &Option<String>) -> String {
    normalize_optional_code(value.as_deref()).unwrap_or_else(|| MISSING.to_string())
}

/// Quintals from the most precise figure the record carries.
fn resolve_quintals(raw: &RawMovementRecord, bags: i64) -> f64 {
    if let Some(qtls) = number(&raw.quantity_quintals) {
        return qtls.abs();
    }
    if let Some(net) = number(&raw.net_weight) {
        return net.abs() / 100.0;
    }
    if let (Some(gross), Some(tare)) = (number(&raw.gross_weight), number(&raw.tare_weight)) {
        return (gross - tare).abs() / 100.0;
    }
    if let Some(bag_size) = number(&raw.bag_size_kg) {
        return (bags as f64 * bag_size).abs() / 100.0;
    }
    0.0
}

fn require(
    value: Option<String>,
    kind: MovementKind,
    field: &'static str,
) -> Result<String, RecordDefect> {
    value.ok_or(RecordDefect::MissingField { kind, field })
}

fn classify(
    raw: &RawMovementRecord,
    kind: MovementKind,
    class: StockClass,
    bags: i64,
) -> Result<Movement, RecordDefect> {
    let from = normalize_optional_code(raw.from_location.as_deref());
    let to = normalize_optional_code(raw.to_location.as_deref());
    let outturn = normalize_optional_code(raw.outturn_ref.as_deref());
    let packaging = normalize_optional_code(raw.packaging_ref.as_deref());

    let movement = match kind {
        MovementKind::Purchase => {
            if class == StockClass::Paddy && to.is_none() {
                return Err(RecordDefect::MissingField {
                    kind,
                    field: "toLocation",
                });
            }
            Movement::Purchase { to_location: to }
        }
        MovementKind::Shifting => Movement::Shifting {
            from_location: require(from, kind, "fromLocation")?,
            to_location: require(to, kind, "toLocation")?,
        },
        MovementKind::ProductionShifting => Movement::ProductionShifting {
            from_location: require(from, kind, "fromLocation")?,
            outturn: require(outturn, kind, "outturnRef")?,
        },
        MovementKind::ForProduction => Movement::ForProduction {
            location: require(to.or(from), kind, "toLocation")?,
            outturn: require(outturn, kind, "outturnRef")?,
        },
        MovementKind::Production => Movement::Production {
            outturn: require(outturn, kind, "outturnRef")?,
            packaging,
        },
        MovementKind::Sale => Movement::Sale { packaging },
        MovementKind::Palti | MovementKind::PaltiShortage => {
            let source = normalize_optional_code(raw.source_packaging_ref.as_deref());
            let target = normalize_optional_code(raw.target_packaging_ref.as_deref());
            Movement::Palti {
                source_packaging: require(source, kind, "sourcePackagingRef")?,
                target_packaging: require(target, kind, "targetPackagingRef")?,
                target_bags: bag_count(&raw.target_bags).unwrap_or(bags),
                shortage_kg: number(&raw.shortage_kg).map(f64::abs).unwrap_or(0.0),
            }
        }
    };
    Ok(movement)
}

/// Canonicalizes one raw row. Never fails; anything unusable degrades to a default or marks
/// the record audit-only.
pub fn canonicalize_record(raw: &RawMovementRecord, index: usize) -> CanonicalRecord {
    let raw_date = raw.date.as_deref().unwrap_or("");
    let date = parse_movement_date(raw_date);
    let raw_type = raw.movement_type.as_deref().unwrap_or("");
    let kind = canonicalize_movement_type(raw_type);

    let has_product_type = raw
        .product_type
        .as_deref()
        .is_some_and(|p| !p.trim().is_empty());
    let class = match kind {
        Some(MovementKind::Production | MovementKind::Sale)
        | Some(MovementKind::Palti | MovementKind::PaltiShortage) => StockClass::Rice,
        _ if has_product_type => StockClass::Rice,
        _ => StockClass::Paddy,
    };
    let product_type = raw
        .product_type
        .as_deref()
        .map(canonicalize_product_type)
        .unwrap_or(ProductType::Rice);

    let bags = bag_count(&raw.bags).unwrap_or(0);
    let quantity_qtls = resolve_quintals(raw, bags);
    let variety = raw
        .variety
        .as_deref()
        .map(normalize_code)
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| MISSING.to_string());

    let status = match (date, kind) {
        (None, _) => RecordStatus::AuditOnly(RecordDefect::UnparseableDate(raw_date.to_string())),
        (_, None) => RecordStatus::AuditOnly(RecordDefect::UnknownMovementType(raw_type.to_string())),
        (Some(_), Some(kind)) => match classify(raw, kind, class, bags) {
            Ok(movement) => RecordStatus::Reconcilable(movement),
            Err(defect) => RecordStatus::AuditOnly(defect),
        },
    };

    let display = DisplayFields {
        date: date
            .map(format_display_date)
            .unwrap_or_else(|| text(&raw.date)),
        movement_type: kind
            .map(|k| k.label().to_string())
            .unwrap_or_else(|| text(&raw.movement_type)),
        variety: variety.clone(),
        product_type: if has_product_type {
            product_type.label().to_string()
        } else {
            MISSING.to_string()
        },
        bags: bags.to_string(),
        bag_size_kg: number_text(number(&raw.bag_size_kg)),
        quantity_qtls: crate::utils::format_qtls(quantity_qtls),
        gross_weight: number_text(number(&raw.gross_weight)),
        tare_weight: number_text(number(&raw.tare_weight)),
        net_weight: number_text(number(&raw.net_weight)),
        moisture: number_text(number(&raw.moisture)),
        cutting: number_text(number(&raw.cutting)),
        wb_no: text(&raw.wb_no),
        lorry_number: text(&raw.lorry_number),
        broker: text(&raw.broker),
        from_location: code_text(&raw.from_location),
        to_location: code_text(&raw.to_location),
        outturn: code_text(&raw.outturn_ref),
        packaging: code_text(&raw.packaging_ref),
        source_packaging: code_text(&raw.source_packaging_ref),
        target_packaging: code_text(&raw.target_packaging_ref),
        shortage_kg: number_text(number(&raw.shortage_kg)),
    };

    CanonicalRecord {
        index,
        date,
        kind,
        class,
        variety,
        product_type,
        bags,
        quantity_qtls,
        display,
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(movement_type: &str) -> RawMovementRecord {
        RawMovementRecord {
            date: Some("2024-04-01".to_string()),
            movement_type: Some(movement_type.to_string()),
            variety: Some("Sona".to_string()),
            bags: Some(LooseNumber::Number(50.0)),
            ..Default::default()
        }
    }

    #[test]
    fn test_product_type_precedence() {
        assert_eq!(canonicalize_product_type("0 Broken Extra"), ProductType::ZeroBroken);
        assert_eq!(canonicalize_product_type("RJ Rice (2) Lot"), ProductType::RjRice2);
        assert_eq!(canonicalize_product_type("Sizer  Broken"), ProductType::SizerBroken);
        assert_eq!(canonicalize_product_type("rj rice 1"), ProductType::RjRice1);
        assert_eq!(canonicalize_product_type("Broken Rice"), ProductType::Broken);
        assert_eq!(canonicalize_product_type("Rice Bran"), ProductType::Bran);
        assert_eq!(canonicalize_product_type("UNPOLISH"), ProductType::Unpolish);
        assert_eq!(canonicalize_product_type("Faram"), ProductType::Faram);
        assert_eq!(canonicalize_product_type("Steam Rice"), ProductType::Rice);
    }

    #[test]
    fn test_product_type_fallback() {
        assert_eq!(canonicalize_product_type(""), ProductType::Rice);
        assert_eq!(canonicalize_product_type("Husk"), ProductType::Rice);
    }

    #[test]
    fn test_movement_type_synonyms() {
        assert_eq!(canonicalize_movement_type(" Purchase "), Some(MovementKind::Purchase));
        assert_eq!(
            canonicalize_movement_type("production_shifting"),
            Some(MovementKind::ProductionShifting)
        );
        assert_eq!(
            canonicalize_movement_type("For Production"),
            Some(MovementKind::ForProduction)
        );
        assert_eq!(canonicalize_movement_type("PALTI SHORTAGE"), Some(MovementKind::PaltiShortage));
        assert_eq!(canonicalize_movement_type("loan"), None);
    }

    #[test]
    fn test_quintals_resolution_order() {
        let mut record = raw("purchase");
        record.to_location = Some("K1".to_string());
        record.bag_size_kg = Some(LooseNumber::Number(75.0));
        assert_eq!(canonicalize_record(&record, 0).quantity_qtls, 37.5);

        record.gross_weight = Some(LooseNumber::Number(12_000.0));
        record.tare_weight = Some(LooseNumber::Number(4_000.0));
        assert_eq!(canonicalize_record(&record, 0).quantity_qtls, 80.0);

        record.net_weight = Some("7,950".into());
        assert_eq!(canonicalize_record(&record, 0).quantity_qtls, 79.5);

        record.quantity_quintals = Some(LooseNumber::Number(79.25));
        assert_eq!(canonicalize_record(&record, 0).quantity_qtls, 79.25);
    }

    #[test]
    fn test_malformed_fields_degrade_to_defaults() {
        let record = RawMovementRecord {
            date: Some("2024-04-01".to_string()),
            movement_type: Some("sale".to_string()),
            bags: Some("lots".into()),
            moisture: Some("wet".into()),
            ..Default::default()
        };

        let canonical = canonicalize_record(&record, 3);
        assert_eq!(canonical.bags, 0);
        assert_eq!(canonical.quantity_qtls, 0.0);
        assert_eq!(canonical.display.moisture, "-");
        assert_eq!(canonical.display.broker, "-");
        assert_eq!(canonical.variety, "-");
        assert_eq!(canonical.class, StockClass::Rice);
        assert!(canonical.movement().is_some());
    }

    #[test]
    fn test_palti_without_packaging_is_audit_only() {
        let mut record = raw("palti");
        record.source_packaging_ref = Some("BOPP 26KG".to_string());

        let canonical = canonicalize_record(&record, 0);
        assert_eq!(
            canonical.defect(),
            Some(&RecordDefect::MissingField {
                kind: MovementKind::Palti,
                field: "targetPackagingRef",
            })
        );
        assert_eq!(canonical.display.source_packaging, "BOPP 26KG");
        assert_eq!(canonical.display.target_packaging, "-");
    }

    #[test]
    fn test_absurd_bag_counts_are_clamped() {
        let mut record = raw("palti");
        record.bags = Some(LooseNumber::Number(1e300));
        record.source_packaging_ref = Some("jute".to_string());
        record.target_packaging_ref = Some("bopp".to_string());
        record.target_bags = Some(LooseNumber::Number(-9.9e18));

        let canonical = canonicalize_record(&record, 0);
        assert_eq!(canonical.bags, MAX_BAGS_PER_RECORD);
        assert!(matches!(
            canonical.movement(),
            Some(Movement::Palti { target_bags: MAX_BAGS_PER_RECORD, .. })
        ));

        record.bags = Some(LooseNumber::Number(f64::NAN));
        assert_eq!(canonicalize_record(&record, 0).bags, 0);
    }

    #[test]
    fn test_palti_target_bags_default_to_source() {
        let mut record = raw("palti-shortage");
        record.source_packaging_ref = Some("jute 50kg".to_string());
        record.target_packaging_ref = Some("bopp 50kg".to_string());
        record.shortage_kg = Some(LooseNumber::Number(5.0));

        let canonical = canonicalize_record(&record, 0);
        assert_eq!(
            canonical.movement(),
            Some(&Movement::Palti {
                source_packaging: "JUTE 50KG".to_string(),
                target_packaging: "BOPP 50KG".to_string(),
                target_bags: 50,
                shortage_kg: 5.0,
            })
        );
    }

    #[test]
    fn test_stock_class() {
        let mut paddy = raw("purchase");
        paddy.to_location = Some("k1".to_string());
        assert_eq!(canonicalize_record(&paddy, 0).class, StockClass::Paddy);

        let mut rice = raw("purchase");
        rice.product_type = Some("Broken".to_string());
        let canonical = canonicalize_record(&rice, 0);
        assert_eq!(canonical.class, StockClass::Rice);
        assert!(canonical.movement().is_some());
    }

    #[test]
    fn test_bad_date_and_unknown_type() {
        let mut record = raw("purchase");
        record.date = Some("someday".to_string());
        assert!(matches!(
            canonicalize_record(&record, 0).defect(),
            Some(RecordDefect::UnparseableDate(_))
        ));

        let record = raw("loan");
        let canonical = canonicalize_record(&record, 0);
        assert!(matches!(
            canonical.defect(),
            Some(RecordDefect::UnknownMovementType(_))
        ));
        assert_eq!(canonical.display.movement_type, "loan");
    }
}
