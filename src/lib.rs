//! # Rice Stock Ledger
//!
//! Reconciles a rice mill's movement records (arrivals, shifting, milling, sales, repacking)
//! into per-day stock ledgers and lays them out as paginated, column-exact printable reports.
//!
//! ## Core Concepts
//!
//! - **Movement record**: one stock event as supplied by the persistence layer, loosely typed
//! - **Canonical record**: the same event with a parsed date, normalized codes and a typed movement
//! - **Ledger entry**: opening stock, signed transactions and closing stock for one grouping key
//! - **Report schema**: a fixed column layout, orientation and font tier per report kind
//! - **Delivery**: handing the encoded document to the host through ordered fallback tiers
//!
//! ## Example
//!
//! ```rust,ignore
//! use rice_stock_ledger::*;
//!
//! let records = RawMovementRecord::list_from_json(&std::fs::read_to_string("movements.json")?)?;
//! let generator = StockReportGenerator::new(EngineConfig::default())?;
//! let options = ReportOptions::new("Paddy Stock - April 2024");
//!
//! let document = generator.generate(ReportKind::PaddyStock, &records, &options)?;
//! println!("{} pages", document.page_count());
//!
//! let host = FileSystemHost::new("reports");
//! let receipt = futures::executor::block_on(
//!     generator.export(ReportKind::PaddyStock, &records, &options, &host),
//! )?;
//! println!("saved {} via {:?}", receipt.filename, receipt.tier);
//! ```

pub mod balancer;
pub mod catalog;
pub mod chunking;
pub mod delivery;
pub mod engine;
pub mod error;
pub mod ingestion;
pub mod layout;
pub mod movement;
pub mod schema;
pub mod shaping;
pub mod utils;

pub use balancer::{verify_ledger, verify_ledger_strict, LedgerBalancer, VerificationResult};
pub use catalog::{get_schema, get_schema_by_name, ColumnSpec, ReportKind, ReportSchema};
pub use chunking::{
    CancellationFlag, ChunkProcessor, LogObserver, NoopObserver, Progress, ProgressObserver,
    ProgressStage,
};
pub use delivery::{
    DeliveryPipeline, DeliveryReceipt, DeliveryTier, EncodedDocument, ExportHost,
    FileSystemHost, HostError,
};
pub use engine::{
    carry_forward, LedgerEntry, LedgerLine, LedgerPolicy, OutturnYield, PaddyKey,
    PaddyStockPolicy, ReconciliationEngine, RiceKey, RiceStockPolicy, StockPosition,
};
pub use error::{Result, StockLedgerError, TierFailure};
pub use ingestion::*;
pub use layout::{encode, render, Band, BandKind, RenderedDocument, RenderedPage};
pub use movement::{MovementKind, StockSign};
pub use schema::*;
pub use shaping::{shape_report, CellValue, ReportBody, ShapedReport, ShapedRow};
pub use utils::*;

use log::{debug, info};

/// Runs one report from raw records to a laid-out document, and optionally delivers it.
pub struct StockReportGenerator<'o> {
    config: EngineConfig,
    observer: &'o dyn ProgressObserver,
    cancellation: Option<&'o CancellationFlag>,
}

impl StockReportGenerator<'static> {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            observer: &LogObserver,
            cancellation: None,
        })
    }
}

impl<'o> StockReportGenerator<'o> {
    pub fn with_observer<'n>(self, observer: &'n dyn ProgressObserver) -> StockReportGenerator<'n>
    where
        'o: 'n,
    {
        StockReportGenerator {
            config: self.config,
            observer,
            cancellation: self.cancellation,
        }
    }

    pub fn with_cancellation(mut self, flag: &'o CancellationFlag) -> Self {
        self.cancellation = Some(flag);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn engine(&self) -> ReconciliationEngine<'o> {
        let processor = ChunkProcessor::from_config(&self.config, self.observer);
        let processor = match self.cancellation {
            Some(flag) => processor.with_cancellation(flag),
            None => processor,
        };
        ReconciliationEngine::new(processor)
    }

    pub fn shape(&self, kind: ReportKind, records: &[RawMovementRecord]) -> Result<ShapedReport> {
        info!("Generating {} report from {} records", kind, records.len());
        shape_report(kind, records, &self.engine())
    }

    pub fn generate(
        &self,
        kind: ReportKind,
        records: &[RawMovementRecord],
        options: &ReportOptions,
    ) -> Result<RenderedDocument> {
        let report = self.shape(kind, records)?;
        let document = render(&report, options);
        debug!("{} report laid out on {} pages", kind, document.page_count());
        Ok(document)
    }

    pub fn encode(&self, kind: ReportKind, document: &RenderedDocument, options: &ReportOptions) -> Result<EncodedDocument> {
        let format = self.config.export_format;
        Ok(EncodedDocument {
            filename: report_filename(kind, options, format),
            mime_type: format.mime_type(),
            bytes: encode(document, format)?,
        })
    }

    /// Generates, encodes and delivers one report. The generation time is fixed once so the
    /// footer and the filename agree.
    pub async fn export<H: ExportHost + ?Sized>(
        &self,
        kind: ReportKind,
        records: &[RawMovementRecord],
        options: &ReportOptions,
        host: &H,
    ) -> Result<DeliveryReceipt> {
        let options = ReportOptions {
            generated_at: Some(options.resolved_generated_at()),
            ..options.clone()
        };
        let document = self.generate(kind, records, &options)?;
        let encoded = self.encode(kind, &document, &options)?;
        DeliveryPipeline::from_config(host, &self.config)
            .deliver(&encoded)
            .await
    }
}

/// `<ReportKind>_<filterType>_<YYYYMMDD_HHMMSS>.<ext>`
pub fn report_filename(kind: ReportKind, options: &ReportOptions, format: ExportFormat) -> String {
    format!(
        "{}_{}_{}.{}",
        kind.file_stem(),
        options.filter_type.as_str(),
        filename_timestamp(options.resolved_generated_at()),
        format.extension()
    )
}

pub fn generate_report(
    kind: ReportKind,
    records: &[RawMovementRecord],
    options: &ReportOptions,
) -> Result<RenderedDocument> {
    StockReportGenerator::new(EngineConfig::default())?.generate(kind, records, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_report_filename() {
        let options = ReportOptions {
            filter_type: FilterType::Month,
            generated_at: NaiveDate::from_ymd_opt(2024, 4, 30)
                .unwrap()
                .and_hms_opt(18, 5, 9),
            ..ReportOptions::new("April")
        };
        assert_eq!(
            report_filename(ReportKind::PaddyStock, &options, ExportFormat::PlainText),
            "PaddyStock_month_20240430_180509.txt"
        );
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = EngineConfig {
            chunk_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            StockReportGenerator::new(config),
            Err(StockLedgerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_cancelled_generation_leaves_no_document() {
        let flag = CancellationFlag::new();
        flag.cancel();
        let records = vec![RawMovementRecord::default(); 3];
        let generator = StockReportGenerator::new(EngineConfig::default())
            .unwrap()
            .with_observer(&NoopObserver)
            .with_cancellation(&flag);

        let result = generator.generate(ReportKind::MovementAudit, &records, &ReportOptions::new("x"));
        assert!(matches!(result, Err(StockLedgerError::Cancelled { processed: 0 })));
    }
}
