use crate::chunking::ChunkProcessor;
use crate::error::Result;
use crate::ingestion::{canonicalize_record, CanonicalRecord, Movement, ProductType, StockClass};
use crate::movement::{MovementKind, StockSign};
use crate::schema::RawMovementRecord;
use crate::utils::MISSING;
use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// A grouping key of one ledger. Keys order by date first.
pub trait GroupKey: Ord + Clone + fmt::Debug {
    fn date(&self) -> NaiveDate;

    /// The non-date part of the key, as shown on a group header.
    fn group_label(&self) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PaddyKey {
    pub date: NaiveDate,
    pub variety: String,
    pub location: String,
    pub outturn: String,
}

impl GroupKey for PaddyKey {
    fn date(&self) -> NaiveDate {
        self.date
    }

    fn group_label(&self) -> String {
        format!(
            "Variety: {} | Location: {} | Outturn: {}",
            self.variety, self.location, self.outturn
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RiceKey {
    pub date: NaiveDate,
    pub product_type: ProductType,
}

impl GroupKey for RiceKey {
    fn date(&self) -> NaiveDate {
        self.date
    }

    fn group_label(&self) -> String {
        format!("Product: {}", self.product_type.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PostingRole {
    /// Counted in the partition's opening stock.
    Opening,
    /// Applied to the running total after the opening.
    Delta,
}

/// What a record contributes to one ledger group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Posting<K> {
    pub key: K,
    pub role: PostingRole,
    pub line: LedgerLine,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerLine {
    pub kind: MovementKind,
    pub record_index: usize,
    /// Signed. Opening lines are always positive.
    pub bags_delta: i64,
    pub qtls_delta: f64,
    pub marker: Option<&'static str>,
    pub from: String,
    pub to: String,
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEntry<K> {
    pub key: K,
    pub opening_bags: i64,
    pub opening_qtls: f64,
    /// The inbound movements that make up the opening stock.
    pub inflows: Vec<LedgerLine>,
    pub transactions: Vec<LedgerLine>,
    pub closing_bags: i64,
    pub closing_qtls: f64,
    /// Outgoing movements were posted but nothing came in; the opening is zero.
    pub opening_missing: bool,
}

impl<K> LedgerEntry<K> {
    pub fn delta_bags(&self) -> i64 {
        self.transactions.iter().map(|t| t.bags_delta).sum()
    }

    pub fn delta_qtls(&self) -> f64 {
        self.transactions.iter().map(|t| t.qtls_delta).sum()
    }
}

/// Decides which groups a record touches and with what sign.
pub trait LedgerPolicy {
    type Key: GroupKey;

    fn postings(&self, record: &CanonicalRecord) -> Vec<Posting<Self::Key>>;
}

fn line(
    record: &CanonicalRecord,
    kind: MovementKind,
    bags_delta: i64,
    qtls_delta: f64,
    from: &str,
    to: &str,
    reference: &str,
) -> LedgerLine {
    LedgerLine {
        kind,
        record_index: record.index,
        bags_delta,
        qtls_delta,
        marker: kind.traits().marker,
        from: from.to_string(),
        to: to.to_string(),
        reference: reference.to_string(),
    }
}

fn opening<K>(key: K, line: LedgerLine) -> Posting<K> {
    Posting {
        key,
        role: PostingRole::Opening,
        line,
    }
}

fn delta<K>(key: K, line: LedgerLine) -> Posting<K> {
    Posting {
        key,
        role: PostingRole::Delta,
        line,
    }
}

/// Paddy stock per date, variety and location. Paddy is held at a location, not against an
/// outturn, so every posting uses `-` for the outturn component and the outturn ref travels on
/// the line as its reference.
pub struct PaddyStockPolicy;

impl PaddyStockPolicy {
    fn key(record: &CanonicalRecord, date: NaiveDate, location: &str, outturn: &str) -> PaddyKey {
        PaddyKey {
            date,
            variety: record.variety.clone(),
            location: location.to_string(),
            outturn: outturn.to_string(),
        }
    }
}

impl LedgerPolicy for PaddyStockPolicy {
    type Key = PaddyKey;

    fn postings(&self, record: &CanonicalRecord) -> Vec<Posting<PaddyKey>> {
        let (Some(date), Some(kind), Some(movement)) = (record.date, record.kind, record.movement())
        else {
            return Vec::new();
        };
        if record.class != StockClass::Paddy {
            return Vec::new();
        }

        let bags = record.bags;
        let qtls = record.quantity_qtls;
        let display = &record.display;

        match (kind.traits().sign, movement) {
            (StockSign::Inbound, Movement::Purchase { to_location: Some(to) }) => vec![opening(
                Self::key(record, date, to, MISSING),
                line(record, kind, bags, qtls, &display.broker, to, &display.wb_no),
            )],
            (StockSign::Transfer, Movement::Shifting { from_location, to_location }) => vec![
                opening(
                    Self::key(record, date, to_location, MISSING),
                    line(record, kind, bags, qtls, from_location, to_location, &display.lorry_number),
                ),
                delta(
                    Self::key(record, date, from_location, MISSING),
                    line(record, kind, -bags, -qtls, from_location, to_location, &display.lorry_number),
                ),
            ],
            (StockSign::ProductionBound, Movement::ProductionShifting { from_location, outturn }) => {
                vec![delta(
                    Self::key(record, date, from_location, MISSING),
                    line(record, kind, -bags, -qtls, from_location, MISSING, outturn),
                )]
            }
            (StockSign::ProductionBound, Movement::ForProduction { location, outturn }) => {
                vec![delta(
                    Self::key(record, date, location, MISSING),
                    line(record, kind, -bags, -qtls, location, MISSING, outturn),
                )]
            }
            _ => Vec::new(),
        }
    }
}

/// Rice stock per date and canonical product type.
pub struct RiceStockPolicy;

impl LedgerPolicy for RiceStockPolicy {
    type Key = RiceKey;

    fn postings(&self, record: &CanonicalRecord) -> Vec<Posting<RiceKey>> {
        let (Some(date), Some(kind), Some(movement)) = (record.date, record.kind, record.movement())
        else {
            return Vec::new();
        };
        if record.class != StockClass::Rice {
            return Vec::new();
        }

        let key = RiceKey {
            date,
            product_type: record.product_type,
        };
        let bags = record.bags;
        let qtls = record.quantity_qtls;
        let display = &record.display;

        match (kind.traits().sign, movement) {
            (StockSign::Inbound, Movement::Purchase { to_location }) => vec![opening(
                key,
                line(
                    record,
                    kind,
                    bags,
                    qtls,
                    &display.broker,
                    to_location.as_deref().unwrap_or(MISSING),
                    &display.packaging,
                ),
            )],
            (StockSign::Transfer, Movement::Shifting { from_location, to_location }) => vec![
                opening(
                    key.clone(),
                    line(record, kind, bags, qtls, from_location, to_location, &display.packaging),
                ),
                delta(
                    key,
                    line(record, kind, -bags, -qtls, from_location, to_location, &display.packaging),
                ),
            ],
            (StockSign::ProductionBound, movement) => {
                let (from, reference) = match movement {
                    Movement::ProductionShifting { from_location, outturn } => {
                        (from_location.as_str(), outturn.as_str())
                    }
                    Movement::ForProduction { location, outturn } => {
                        (location.as_str(), outturn.as_str())
                    }
                    Movement::Production { outturn, .. } => {
                        (display.from_location.as_str(), outturn.as_str())
                    }
                    _ => (MISSING, MISSING),
                };
                vec![delta(
                    key,
                    line(record, kind, -bags, -qtls, from, MISSING, reference),
                )]
            }
            (StockSign::Outbound, Movement::Sale { .. }) => vec![delta(
                key,
                line(
                    record,
                    kind,
                    -bags,
                    -qtls,
                    &display.from_location,
                    &display.broker,
                    &display.packaging,
                ),
            )],
            (
                StockSign::Repack,
                Movement::Palti {
                    source_packaging,
                    target_packaging,
                    target_bags,
                    shortage_kg,
                },
            ) => {
                let shortage_qtls = shortage_kg / 100.0;
                let shortage_note = if *shortage_kg > 0.0 {
                    format!("short {} kg", crate::utils::format_qtls(*shortage_kg))
                } else {
                    MISSING.to_string()
                };
                vec![
                    delta(
                        key.clone(),
                        line(record, kind, -bags, -qtls, source_packaging, target_packaging, MISSING),
                    ),
                    delta(
                        key,
                        line(
                            record,
                            kind,
                            *target_bags,
                            qtls - shortage_qtls,
                            source_packaging,
                            target_packaging,
                            &shortage_note,
                        ),
                    ),
                ]
            }
            _ => Vec::new(),
        }
    }
}

#[derive(Default)]
struct GroupAccumulator {
    opening_bags: i64,
    opening_qtls: f64,
    inflows: Vec<LedgerLine>,
    transactions: Vec<LedgerLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutturnYield {
    pub outturn: String,
    pub variety: String,
    pub paddy_bags: i64,
    pub paddy_qtls: f64,
    pub byproduct_bags: i64,
    pub byproducts: BTreeMap<ProductType, f64>,
    pub total_byproduct_qtls: f64,
    pub yield_pct: f64,
}

#[derive(Default)]
struct YieldAccumulator {
    variety: Option<String>,
    paddy_bags: i64,
    paddy_qtls: f64,
    byproduct_bags: i64,
    byproducts: BTreeMap<ProductType, f64>,
}

/// Running stock per group across dates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockPosition {
    pub date: NaiveDate,
    pub group: String,
    pub day_closing_bags: i64,
    pub day_closing_qtls: f64,
    pub carried_bags: i64,
    pub carried_qtls: f64,
}

pub fn yield_percent(byproduct_qtls: f64, paddy_qtls: f64) -> f64 {
    if paddy_qtls == 0.0 {
        0.0
    } else {
        byproduct_qtls / paddy_qtls * 100.0
    }
}

pub struct ReconciliationEngine<'a> {
    processor: ChunkProcessor<'a>,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(processor: ChunkProcessor<'a>) -> Self {
        Self { processor }
    }

    pub fn processor(&self) -> &ChunkProcessor<'a> {
        &self.processor
    }

    /// Canonicalizes each raw record inside its window and folds it straight into the group
    /// accumulators, so no canonical copy of the whole input is kept.
    pub fn reconcile<P: LedgerPolicy>(
        &self,
        records: &[RawMovementRecord],
        policy: &P,
    ) -> Result<Vec<LedgerEntry<P::Key>>> {
        let groups = self.processor.fold_in_chunks(
            records,
            BTreeMap::new(),
            |groups, raw, index| {
                let record = canonicalize_record(raw, index);
                Self::post(groups, policy, &record);
            },
        )?;
        Ok(Self::finish(groups))
    }

    pub fn reconcile_canonical<P: LedgerPolicy>(
        &self,
        records: &[CanonicalRecord],
        policy: &P,
    ) -> Result<Vec<LedgerEntry<P::Key>>> {
        let groups = self.processor.fold_in_chunks(
            records,
            BTreeMap::new(),
            |groups, record, _| Self::post(groups, policy, record),
        )?;
        Ok(Self::finish(groups))
    }

    pub fn reconcile_paddy(&self, records: &[RawMovementRecord]) -> Result<Vec<LedgerEntry<PaddyKey>>> {
        self.reconcile(records, &PaddyStockPolicy)
    }

    pub fn reconcile_rice(&self, records: &[RawMovementRecord]) -> Result<Vec<LedgerEntry<RiceKey>>> {
        self.reconcile(records, &RiceStockPolicy)
    }

    fn post<P: LedgerPolicy>(
        groups: &mut BTreeMap<P::Key, GroupAccumulator>,
        policy: &P,
        record: &CanonicalRecord,
    ) {
        for posting in policy.postings(record) {
            let group = groups.entry(posting.key).or_default();
            match posting.role {
                PostingRole::Opening => {
                    group.opening_bags += posting.line.bags_delta;
                    group.opening_qtls += posting.line.qtls_delta;
                    group.inflows.push(posting.line);
                }
                PostingRole::Delta => group.transactions.push(posting.line),
            }
        }
    }

    fn finish<K: GroupKey>(groups: BTreeMap<K, GroupAccumulator>) -> Vec<LedgerEntry<K>> {
        let mut missing_openings = 0;

        let entries: Vec<LedgerEntry<K>> = groups
            .into_iter()
            .map(|(key, group)| {
                let delta_bags: i64 = group.transactions.iter().map(|t| t.bags_delta).sum();
                let delta_qtls: f64 = group.transactions.iter().map(|t| t.qtls_delta).sum();
                let opening_missing = group.inflows.is_empty() && !group.transactions.is_empty();

                if opening_missing {
                    missing_openings += 1;
                    warn!(
                        "No inbound stock for {} on {}; opening treated as zero",
                        key.group_label(),
                        key.date()
                    );
                }

                LedgerEntry {
                    closing_bags: group.opening_bags + delta_bags,
                    closing_qtls: group.opening_qtls + delta_qtls,
                    key,
                    opening_bags: group.opening_bags,
                    opening_qtls: group.opening_qtls,
                    inflows: group.inflows,
                    transactions: group.transactions,
                    opening_missing,
                }
            })
            .collect();

        info!(
            "Reconciled {} ledger groups ({} without inbound stock)",
            entries.len(),
            missing_openings
        );
        entries
    }

    /// Paddy consumed versus products recovered, per outturn.
    pub fn outturn_yields(&self, records: &[RawMovementRecord]) -> Result<Vec<OutturnYield>> {
        let outturns = self.processor.fold_in_chunks(
            records,
            BTreeMap::<String, YieldAccumulator>::new(),
            |outturns, raw, index| {
                let record = canonicalize_record(raw, index);
                let (Some(kind), Some(outturn)) = (record.kind, record.outturn()) else {
                    return;
                };
                let acc = outturns.entry(outturn.to_string()).or_default();

                if kind == MovementKind::Production {
                    acc.byproduct_bags += record.bags;
                    *acc.byproducts.entry(record.product_type).or_default() += record.quantity_qtls;
                } else if kind.is_production_bound() {
                    acc.paddy_bags += record.bags;
                    acc.paddy_qtls += record.quantity_qtls;
                    if acc.variety.is_none() && record.variety != MISSING {
                        acc.variety = Some(record.variety.clone());
                    }
                }
            },
        )?;

        let yields: Vec<OutturnYield> = outturns
            .into_iter()
            .map(|(outturn, acc)| {
                let total: f64 = acc.byproducts.values().sum();
                if acc.paddy_qtls == 0.0 {
                    debug!("Outturn {} has no paddy input; yield reported as zero", outturn);
                }
                OutturnYield {
                    variety: acc.variety.unwrap_or_else(|| MISSING.to_string()),
                    paddy_bags: acc.paddy_bags,
                    paddy_qtls: acc.paddy_qtls,
                    byproduct_bags: acc.byproduct_bags,
                    total_byproduct_qtls: total,
                    yield_pct: yield_percent(total, acc.paddy_qtls),
                    byproducts: acc.byproducts,
                    outturn,
                }
            })
            .collect();

        info!("Computed yields for {} outturns", yields.len());
        Ok(yields)
    }
}

/// Running closing stock per group across dates, starting from zero.
///
/// The per-date opening of each entry is left untouched.
pub fn carry_forward<K: GroupKey>(entries: &[LedgerEntry<K>]) -> Vec<StockPosition> {
    let mut running: BTreeMap<String, (i64, f64)> = BTreeMap::new();

    entries
        .iter()
        .map(|entry| {
            let group = entry.key.group_label();
            let totals = running.entry(group.clone()).or_insert((0, 0.0));
            totals.0 += entry.closing_bags;
            totals.1 += entry.closing_qtls;
            StockPosition {
                date: entry.key.date(),
                group,
                day_closing_bags: entry.closing_bags,
                day_closing_qtls: entry.closing_qtls,
                carried_bags: totals.0,
                carried_qtls: totals.1,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::NoopObserver;
    use crate::ingestion::MAX_BAGS_PER_RECORD;
    use crate::schema::LooseNumber;
    use crate::utils::format_qtls;

    fn record(date: &str, movement_type: &str) -> RawMovementRecord {
        RawMovementRecord {
            date: Some(date.to_string()),
            movement_type: Some(movement_type.to_string()),
            variety: Some("Sona".to_string()),
            ..Default::default()
        }
    }

    fn rice(date: &str, movement_type: &str, product: &str, bags: f64, qtls: f64) -> RawMovementRecord {
        RawMovementRecord {
            product_type: Some(product.to_string()),
            bags: Some(LooseNumber::Number(bags)),
            quantity_quintals: Some(LooseNumber::Number(qtls)),
            ..record(date, movement_type)
        }
    }

    fn engine(observer: &NoopObserver) -> ReconciliationEngine<'_> {
        ReconciliationEngine::new(ChunkProcessor::new(2, observer))
    }

    #[test]
    fn test_sale_reduces_closing() {
        let records = vec![
            rice("2024-04-01", "purchase", "Rice", 100.0, 26.0),
            rice("2024-04-01", "sale", "rice", 40.0, 10.4),
        ];

        let entries = engine(&NoopObserver).reconcile_rice(&records).unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.opening_bags, 100);
        assert_eq!(format_qtls(entry.opening_qtls), "26.00");
        assert_eq!(entry.transactions[0].bags_delta, -40);
        assert_eq!(entry.closing_bags, 60);
        assert_eq!(format_qtls(entry.closing_qtls), "15.60");
        assert!(!entry.opening_missing);
    }

    #[test]
    fn test_palti_conserves_bags_and_loses_shortage() {
        let mut palti = rice("2024-04-02", "palti", "Broken", 50.0, 25.0);
        palti.source_packaging_ref = Some("Jute 50kg".to_string());
        palti.target_packaging_ref = Some("BOPP 50kg".to_string());
        palti.shortage_kg = Some(LooseNumber::Number(5.0));
        let records = vec![rice("2024-04-02", "purchase", "Broken", 50.0, 25.0), palti];

        let entries = engine(&NoopObserver).reconcile_rice(&records).unwrap();
        let entry = &entries[0];
        assert_eq!(entry.transactions.len(), 2);
        assert_eq!(entry.transactions[0].bags_delta, -50);
        assert_eq!(entry.transactions[1].bags_delta, 50);
        assert_eq!(entry.closing_bags, entry.opening_bags);
        assert_eq!(format_qtls(entry.opening_qtls - entry.closing_qtls), "0.05");
    }

    #[test]
    fn test_production_bound_rows_are_marked_and_subtracted() {
        let mut purchase = record("2024-04-03", "purchase");
        purchase.to_location = Some("K1".to_string());
        purchase.bags = Some(LooseNumber::Number(200.0));
        purchase.net_weight = Some(LooseNumber::Number(15_000.0));

        let mut to_mill = record("2024-04-03", "production-shifting");
        to_mill.from_location = Some(" k1 ".to_string());
        to_mill.outturn_ref = Some("OT-7".to_string());
        to_mill.bags = Some(LooseNumber::Number(80.0));
        to_mill.quantity_quintals = Some(LooseNumber::Number(60.0));

        let entries = engine(&NoopObserver)
            .reconcile_paddy(&[purchase, to_mill])
            .unwrap();

        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.key.location, "K1");
        assert_eq!(entry.transactions[0].marker, Some("(-)"));
        assert_eq!(entry.transactions[0].reference, "OT-7");
        assert_eq!(entry.closing_bags, 120);
        assert_eq!(format_qtls(entry.closing_qtls), "90.00");
    }

    #[test]
    fn test_shifting_posts_to_both_locations() {
        let mut shifting = record("2024-04-04", "shifting");
        shifting.from_location = Some("K1".to_string());
        shifting.to_location = Some("K2".to_string());
        shifting.bags = Some(LooseNumber::Number(30.0));
        shifting.quantity_quintals = Some(LooseNumber::Number(22.5));

        let entries = engine(&NoopObserver).reconcile_paddy(&[shifting]).unwrap();
        assert_eq!(entries.len(), 2);

        let k1 = entries.iter().find(|e| e.key.location == "K1").unwrap();
        assert!(k1.opening_missing);
        assert_eq!(k1.opening_bags, 0);
        assert_eq!(k1.closing_bags, -30);

        let k2 = entries.iter().find(|e| e.key.location == "K2").unwrap();
        assert_eq!(k2.opening_bags, 30);
        assert_eq!(k2.closing_bags, 30);
        assert!(k2.transactions.is_empty());
    }

    #[test]
    fn test_for_production_draws_down_the_location() {
        let mut purchase = record("2024-04-05", "purchase");
        purchase.to_location = Some("MILL".to_string());
        purchase.bags = Some(LooseNumber::Number(100.0));
        purchase.quantity_quintals = Some(LooseNumber::Number(75.0));

        let mut consumed = record("2024-04-05", "for-production");
        consumed.to_location = Some("MILL".to_string());
        consumed.outturn_ref = Some("OT-1".to_string());
        consumed.bags = Some(LooseNumber::Number(10.0));
        consumed.quantity_quintals = Some(LooseNumber::Number(7.5));

        let entries = engine(&NoopObserver)
            .reconcile_paddy(&[purchase, consumed])
            .unwrap();

        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.key.outturn, MISSING);
        assert_eq!(entry.opening_bags, 100);
        assert_eq!(entry.inflows.len(), 1);
        assert_eq!(entry.inflows[0].kind, MovementKind::Purchase);
        assert_eq!(entry.transactions.len(), 1);
        assert_eq!(entry.transactions[0].kind, MovementKind::ForProduction);
        assert_eq!(entry.transactions[0].bags_delta, -10);
        assert_eq!(entry.transactions[0].marker, Some("(-)"));
        assert_eq!(entry.transactions[0].reference, "OT-1");
        assert_eq!(entry.closing_bags, 90);
        assert_eq!(format_qtls(entry.closing_qtls), "67.50");
        assert!(!entry.opening_missing);
    }

    #[test]
    fn test_purchase_with_outturn_is_consumed_at_its_location() {
        let mut purchase = record("2024-04-05", "purchase");
        purchase.to_location = Some("K1".to_string());
        purchase.outturn_ref = Some("OT-1".to_string());
        purchase.bags = Some(LooseNumber::Number(100.0));
        purchase.quantity_quintals = Some(LooseNumber::Number(75.0));

        let mut to_mill = record("2024-04-05", "production-shifting");
        to_mill.from_location = Some("K1".to_string());
        to_mill.outturn_ref = Some("OT-1".to_string());
        to_mill.bags = Some(LooseNumber::Number(80.0));
        to_mill.quantity_quintals = Some(LooseNumber::Number(60.0));

        let entries = engine(&NoopObserver)
            .reconcile_paddy(&[purchase, to_mill])
            .unwrap();

        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert!(!entry.opening_missing);
        assert_eq!(entry.opening_bags, 100);
        assert_eq!(entry.closing_bags, 20);
        assert_eq!(format_qtls(entry.closing_qtls), "15.00");
    }

    #[test]
    fn test_line_kind_matches_the_record() {
        let records = synthetic_mix();
        let canonical: Vec<CanonicalRecord> = records
            .iter()
            .enumerate()
            .map(|(i, r)| canonicalize_record(r, i))
            .collect();

        let entries = engine(&NoopObserver).reconcile_paddy(&records).unwrap();
        for entry in &entries {
            for line in entry.inflows.iter().chain(&entry.transactions) {
                assert_eq!(Some(line.kind), canonical[line.record_index].kind);
                if line.kind.is_production_bound() {
                    assert!(line.bags_delta <= 0);
                }
            }
            for inflow in &entry.inflows {
                assert!(matches!(inflow.kind, MovementKind::Purchase | MovementKind::Shifting));
            }
        }
    }

    fn synthetic_mix() -> Vec<RawMovementRecord> {
        let mut purchase = record("2024-04-06", "purchase");
        purchase.to_location = Some("K1".to_string());
        purchase.outturn_ref = Some("OT-2".to_string());
        purchase.bags = Some(LooseNumber::Number(50.0));

        let mut shifting = record("2024-04-06", "shifting");
        shifting.from_location = Some("K1".to_string());
        shifting.to_location = Some("K2".to_string());
        shifting.bags = Some(LooseNumber::Number(20.0));

        let mut for_production = record("2024-04-06", "for-production");
        for_production.to_location = Some("K2".to_string());
        for_production.outturn_ref = Some("OT-2".to_string());
        for_production.bags = Some(LooseNumber::Number(15.0));

        let mut to_mill = record("2024-04-06", "production-shifting");
        to_mill.from_location = Some("K1".to_string());
        to_mill.outturn_ref = Some("OT-2".to_string());
        to_mill.bags = Some(LooseNumber::Number(5.0));

        vec![purchase, shifting, for_production, to_mill]
    }

    #[test]
    fn test_absurd_bag_counts_accumulate_without_overflow() {
        let records = vec![
            rice("2024-04-05", "purchase", "Rice", 1e300, 1.0),
            rice("2024-04-05", "purchase", "Rice", 9.3e18, 1.0),
            rice("2024-04-05", "sale", "Rice", 1e300, 1.0),
        ];

        let entries = engine(&NoopObserver).reconcile_rice(&records).unwrap();
        assert_eq!(entries[0].opening_bags, 2 * MAX_BAGS_PER_RECORD);
        assert_eq!(entries[0].closing_bags, MAX_BAGS_PER_RECORD);
    }

    #[test]
    fn test_keys_collapse_case_and_whitespace() {
        let mut a = record("2024-04-06", "purchase");
        a.variety = Some("sona  masoori".to_string());
        a.to_location = Some("k1".to_string());
        a.bags = Some(LooseNumber::Number(1.0));
        let mut b = record("06-04-2024", "purchase");
        b.variety = Some(" SONA MASOORI ".to_string());
        b.to_location = Some("K1 ".to_string());
        b.bags = Some(LooseNumber::Number(2.0));

        let entries = engine(&NoopObserver).reconcile_paddy(&[a, b]).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].opening_bags, 3);
    }

    #[test]
    fn test_defective_records_are_skipped() {
        let mut palti = rice("2024-04-07", "palti", "Rice", 10.0, 5.0);
        palti.source_packaging_ref = Some("Jute".to_string());
        let records = vec![rice("2024-04-07", "purchase", "Rice", 10.0, 5.0), palti];

        let entries = engine(&NoopObserver).reconcile_rice(&records).unwrap();
        assert_eq!(entries[0].transactions.len(), 0);
        assert_eq!(entries[0].closing_bags, 10);
    }

    #[test]
    fn test_outturn_yield() {
        let mut paddy = record("2024-04-08", "production-shifting");
        paddy.from_location = Some("K1".to_string());
        paddy.outturn_ref = Some("OT-9".to_string());
        paddy.quantity_quintals = Some(LooseNumber::Number(100.0));
        paddy.bags = Some(LooseNumber::Number(133.0));

        let mut rice_out = rice("2024-04-09", "production", "Rice", 90.0, 45.0);
        rice_out.outturn_ref = Some("ot-9".to_string());
        let mut bran = rice("2024-04-09", "production", "Bran", 20.0, 8.5);
        bran.outturn_ref = Some("OT-9".to_string());
        let mut orphan = rice("2024-04-09", "production", "Broken", 4.0, 2.0);
        orphan.outturn_ref = Some("OT-10".to_string());

        let yields = engine(&NoopObserver)
            .outturn_yields(&[paddy, rice_out, bran, orphan])
            .unwrap();

        assert_eq!(yields.len(), 2);
        let ot9 = &yields[1];
        assert_eq!(ot9.outturn, "OT-9");
        assert_eq!(ot9.variety, "SONA");
        assert_eq!(format_qtls(ot9.total_byproduct_qtls), "53.50");
        assert_eq!(format_qtls(ot9.yield_pct), "53.50");
        assert_eq!(ot9.byproducts.get(&ProductType::Bran), Some(&8.5));

        let ot10 = &yields[0];
        assert_eq!(ot10.outturn, "OT-10");
        assert_eq!(format_qtls(ot10.yield_pct), "0.00");
    }

    #[test]
    fn test_carry_forward_accumulates_across_dates() {
        let records = vec![
            rice("2024-04-01", "purchase", "Rice", 100.0, 26.0),
            rice("2024-04-02", "sale", "Rice", 40.0, 10.4),
            rice("2024-04-03", "purchase", "Rice", 10.0, 2.6),
        ];
        let entries = engine(&NoopObserver).reconcile_rice(&records).unwrap();
        let positions = carry_forward(&entries);

        assert_eq!(positions.len(), 3);
        assert_eq!(positions[1].day_closing_bags, -40);
        assert_eq!(positions[1].carried_bags, 60);
        assert_eq!(positions[2].carried_bags, 70);
        assert_eq!(format_qtls(positions[2].carried_qtls), "18.20");
    }
}
