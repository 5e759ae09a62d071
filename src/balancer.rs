use crate::engine::{GroupKey, LedgerEntry};
use crate::error::{Result, StockLedgerError};
use crate::utils::qtls_eq;
use log::warn;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VerificationResult {
    pub entries_checked: usize,
    pub missing_openings: usize,
    pub violations: Vec<String>,
}

impl VerificationResult {
    pub fn is_balanced(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Checks `closing = opening + Σ deltas` on every ledger entry: bags exactly, quintals at
/// display precision.
pub struct LedgerBalancer<'a, K> {
    entries: &'a [LedgerEntry<K>],
}

impl<'a, K: GroupKey> LedgerBalancer<'a, K> {
    pub fn new(entries: &'a [LedgerEntry<K>]) -> Self {
        Self { entries }
    }

    pub fn verify(&self) -> VerificationResult {
        let mut result = VerificationResult {
            entries_checked: self.entries.len(),
            ..Default::default()
        };

        for entry in self.entries {
            if entry.opening_missing {
                result.missing_openings += 1;
            }
            if let Err(e) = check_entry(entry) {
                warn!("{}", e);
                result.violations.push(e.to_string());
            }
        }

        result
    }

    pub fn verify_strict(&self) -> Result<()> {
        self.entries.iter().try_for_each(check_entry)
    }
}

fn check_entry<K: GroupKey>(entry: &LedgerEntry<K>) -> Result<()> {
    let delta_bags = entry.delta_bags();
    let delta_qtls = entry.delta_qtls();

    let bags_ok = entry.closing_bags == entry.opening_bags + delta_bags;
    let qtls_ok = qtls_eq(entry.closing_qtls, entry.opening_qtls + delta_qtls);

    if bags_ok && qtls_ok {
        return Ok(());
    }

    Err(StockLedgerError::LedgerImbalance {
        key: format!("{} on {}", entry.key.group_label(), entry.key.date()),
        opening_bags: entry.opening_bags,
        delta_bags,
        closing_bags: entry.closing_bags,
        opening_qtls: entry.opening_qtls,
        delta_qtls,
        closing_qtls: entry.closing_qtls,
    })
}

pub fn verify_ledger<K: GroupKey>(entries: &[LedgerEntry<K>]) -> VerificationResult {
    LedgerBalancer::new(entries).verify()
}

pub fn verify_ledger_strict<K: GroupKey>(entries: &[LedgerEntry<K>]) -> Result<()> {
    LedgerBalancer::new(entries).verify_strict()
}
