use chrono::NaiveDateTime;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StockLedgerError};

/// A number as the persistence layer happens to export it: either a JSON number or a string
/// such as `"1,250.50"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum LooseNumber {
    Number(f64),
    Text(String),
}

impl LooseNumber {
    /// Returns `None` for blank or unparseable text and for non-finite numbers.
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            LooseNumber::Number(n) => *n,
            LooseNumber::Text(s) => {
                let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
                if cleaned.is_empty() {
                    return None;
                }
                cleaned.parse::<f64>().ok()?
            }
        };
        value.is_finite().then_some(value)
    }
}

impl From<f64> for LooseNumber {
    fn from(value: f64) -> Self {
        LooseNumber::Number(value)
    }
}

impl From<&str> for LooseNumber {
    fn from(value: &str) -> Self {
        LooseNumber::Text(value.to_string())
    }
}

/// One movement row exactly as handed over by the persistence layer.
///
/// Every field is optional; the canonicalizer decides what a row can be used for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct RawMovementRecord {
    #[schemars(description = "Movement date, normally YYYY-MM-DD. DD-MM-YYYY, DD/MM/YYYY and ISO date-times are accepted.")]
    pub date: Option<String>,

    #[schemars(
        description = "One of purchase, shifting, production-shifting, for-production, production, sale, palti, palti-shortage."
    )]
    pub movement_type: Option<String>,

    #[schemars(description = "Paddy variety (e.g. 'Sona Masoori').")]
    pub variety: Option<String>,

    #[schemars(description = "Free-text rice product type. Absent for paddy movements.")]
    pub product_type: Option<String>,

    pub bags: Option<LooseNumber>,
    pub bag_size_kg: Option<LooseNumber>,
    pub quantity_quintals: Option<LooseNumber>,
    pub gross_weight: Option<LooseNumber>,
    pub tare_weight: Option<LooseNumber>,
    pub net_weight: Option<LooseNumber>,
    pub moisture: Option<LooseNumber>,
    pub cutting: Option<LooseNumber>,

    #[schemars(description = "Weighbridge slip number.")]
    pub wb_no: Option<String>,
    pub lorry_number: Option<String>,
    pub broker: Option<String>,

    #[schemars(description = "Location code the stock leaves from.")]
    pub from_location: Option<String>,

    #[schemars(description = "Location code the stock arrives at.")]
    pub to_location: Option<String>,

    #[schemars(description = "Outturn (production batch) code.")]
    pub outturn_ref: Option<String>,

    pub packaging_ref: Option<String>,
    pub source_packaging_ref: Option<String>,
    pub target_packaging_ref: Option<String>,

    #[schemars(description = "Bags produced on the target packaging of a palti. Defaults to the source bag count.")]
    pub target_bags: Option<LooseNumber>,

    #[schemars(description = "Mass lost while repackaging, in kilograms.")]
    pub shortage_kg: Option<LooseNumber>,
}

impl RawMovementRecord {
    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(RawMovementRecord)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }

    /// Parses a JSON array of movement rows.
    pub fn list_from_json(json: &str) -> Result<Vec<RawMovementRecord>> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    #[default]
    All,
    Day,
    Week,
    Month,
}

impl FilterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterType::All => "all",
            FilterType::Day => "day",
            FilterType::Week => "week",
            FilterType::Month => "month",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FilterType::All => "All Records",
            FilterType::Day => "Daily",
            FilterType::Week => "Weekly",
            FilterType::Month => "Monthly",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportOptions {
    pub title: String,

    #[serde(default)]
    pub subtitle: Option<String>,

    #[serde(default)]
    #[schemars(description = "Human readable period covered by the records, e.g. '01-04-2024 to 30-04-2024'.")]
    pub date_range: Option<String>,

    #[serde(default)]
    pub filter_type: FilterType,

    #[serde(default)]
    #[schemars(description = "Generation timestamp stamped on the footer and filename. Defaults to the local time of the run.")]
    pub generated_at: Option<NaiveDateTime>,
}

impl ReportOptions {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn resolved_generated_at(&self) -> NaiveDateTime {
        self.generated_at
            .unwrap_or_else(|| chrono::Local::now().naive_local())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    /// Fixed-width printable pages separated by form feeds.
    #[default]
    PlainText,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::PlainText => "txt",
            ExportFormat::Json => "json",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::PlainText => "text/plain; charset=utf-8",
            ExportFormat::Json => "application/json",
        }
    }
}

fn default_chunk_size() -> usize {
    5000
}

fn default_progress_interval() -> usize {
    10_000
}

fn default_release_delay_ms() -> u64 {
    150
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EngineConfig {
    #[serde(default = "default_chunk_size")]
    #[schemars(description = "Records processed per window. Bounds transient memory, not concurrency.")]
    pub chunk_size: usize,

    #[serde(default = "default_progress_interval")]
    #[schemars(description = "Emit a progress observation every N records.")]
    pub progress_interval: usize,

    #[serde(default = "default_release_delay_ms")]
    #[schemars(description = "Milliseconds to wait before releasing an in-memory export handle.")]
    pub release_delay_ms: u64,

    #[serde(default)]
    pub export_format: ExportFormat,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            progress_interval: default_progress_interval(),
            release_delay_ms: default_release_delay_ms(),
            export_format: ExportFormat::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(StockLedgerError::InvalidConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.progress_interval == 0 {
            return Err(StockLedgerError::InvalidConfig(
                "progress_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
