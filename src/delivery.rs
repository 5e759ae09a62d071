//! Hands an encoded document to the host environment.
//!
//! Delivery walks an ordered list of tiers and stops at the first one that works:
//! the host's native save, then an in-memory object link, then a base64 data URL.
//! A tier failure is logged and recorded; only running out of tiers is an error.

use crate::error::{Result, StockLedgerError, TierFailure};
use crate::schema::EngineConfig;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use futures::future::{self, Either, FutureExt, LocalBoxFuture};
use log::{debug, info, warn};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("{0} is not supported by this host")]
    Unsupported(&'static str),

    #[error("{0}")]
    Failed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodedDocument {
    pub filename: String,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
}

impl EncodedDocument {
    pub fn data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type.replace(' ', ""),
            STANDARD.encode(&self.bytes)
        )
    }
}

/// The environment-specific export mechanisms.
pub trait ExportHost {
    fn save_native<'a>(&'a self, document: &'a EncodedDocument) -> LocalBoxFuture<'a, std::result::Result<(), HostError>>;

    /// Registers the bytes in memory and returns a handle URL for them.
    fn create_object_url(&self, document: &EncodedDocument) -> std::result::Result<String, HostError>;

    fn click_anchor(&self, href: &str, filename: &str) -> std::result::Result<(), HostError>;

    fn revoke_object_url(&self, url: &str);

    fn open_in_new_context(&self, url: &str) -> std::result::Result<(), HostError>;

    fn delay(&self, duration: Duration) -> LocalBoxFuture<'static, ()>;

    /// Resolves when the host is being torn down. Never resolves by default.
    fn teardown(&self) -> LocalBoxFuture<'static, ()> {
        future::pending().boxed_local()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeliveryTier {
    DirectSave,
    BlobLink,
    DataUrl,
}

impl DeliveryTier {
    pub fn name(&self) -> &'static str {
        match self {
            DeliveryTier::DirectSave => "direct save",
            DeliveryTier::BlobLink => "object link",
            DeliveryTier::DataUrl => "data url",
        }
    }

    fn next(&self) -> Option<DeliveryTier> {
        match self {
            DeliveryTier::DirectSave => Some(DeliveryTier::BlobLink),
            DeliveryTier::BlobLink => Some(DeliveryTier::DataUrl),
            DeliveryTier::DataUrl => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryReceipt {
    pub tier: DeliveryTier,
    pub filename: String,
    /// Tiers that were tried and failed before `tier` succeeded.
    pub failures: Vec<TierFailure>,
}

pub struct DeliveryPipeline<'h, H: ExportHost + ?Sized> {
    host: &'h H,
    release_delay: Duration,
}

impl<'h, H: ExportHost + ?Sized> DeliveryPipeline<'h, H> {
    pub fn new(host: &'h H, release_delay: Duration) -> Self {
        Self {
            host,
            release_delay,
        }
    }

    pub fn from_config(host: &'h H, config: &EngineConfig) -> Self {
        Self::new(host, Duration::from_millis(config.release_delay_ms))
    }

    pub async fn deliver(&self, document: &EncodedDocument) -> Result<DeliveryReceipt> {
        let mut failures = Vec::new();
        let mut tier = Some(DeliveryTier::DirectSave);

        while let Some(current) = tier {
            match self.attempt(current, document).await {
                Ok(()) => {
                    info!("Delivered {} via {}", document.filename, current.name());
                    return Ok(DeliveryReceipt {
                        tier: current,
                        filename: document.filename.clone(),
                        failures,
                    });
                }
                Err(e) => {
                    warn!("Export via {} failed: {}", current.name(), e);
                    failures.push(TierFailure {
                        tier: current.name(),
                        reason: e.to_string(),
                    });
                    tier = current.next();
                }
            }
        }

        Err(StockLedgerError::DeliveryFailed {
            filename: document.filename.clone(),
            failures,
        })
    }

    async fn attempt(
        &self,
        tier: DeliveryTier,
        document: &EncodedDocument,
    ) -> std::result::Result<(), HostError> {
        match tier {
            DeliveryTier::DirectSave => self.host.save_native(document).await,
            DeliveryTier::BlobLink => self.object_link(document).await,
            DeliveryTier::DataUrl => self.data_url(document),
        }
    }

    /// The handle is revoked exactly once: right away when the click fails, otherwise after
    /// the release delay or teardown, whichever comes first.
    async fn object_link(&self, document: &EncodedDocument) -> std::result::Result<(), HostError> {
        let url = self.host.create_object_url(document)?;

        if let Err(e) = self.host.click_anchor(&url, &document.filename) {
            self.host.revoke_object_url(&url);
            return Err(e);
        }

        match future::select(self.host.delay(self.release_delay), self.host.teardown()).await {
            Either::Left(_) => debug!("Releasing {} after delay", url),
            Either::Right(_) => debug!("Releasing {} on teardown", url),
        }
        self.host.revoke_object_url(&url);
        Ok(())
    }

    fn data_url(&self, document: &EncodedDocument) -> std::result::Result<(), HostError> {
        let url = document.data_url();
        match self.host.open_in_new_context(&url) {
            Ok(()) => Ok(()),
            Err(open_error) => {
                debug!("Opening data url failed ({}); forcing download", open_error);
                self.host.click_anchor(&url, &document.filename).map_err(|click_error| {
                    HostError::Failed(format!("{}; forced download: {}", open_error, click_error))
                })
            }
        }
    }
}

/// Saves into a directory. The browser-only mechanisms are unavailable.
#[derive(Debug, Clone)]
pub struct FileSystemHost {
    pub output_dir: PathBuf,
}

impl FileSystemHost {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

impl ExportHost for FileSystemHost {
    fn save_native<'a>(&'a self, document: &'a EncodedDocument) -> LocalBoxFuture<'a, std::result::Result<(), HostError>> {
        async move {
            fs::create_dir_all(&self.output_dir)?;
            let path = self.output_dir.join(&document.filename);
            fs::write(&path, &document.bytes)?;
            debug!("Wrote {} bytes to {}", document.bytes.len(), path.display());
            Ok::<(), HostError>(())
        }
        .boxed_local()
    }

    fn create_object_url(&self, _document: &EncodedDocument) -> std::result::Result<String, HostError> {
        Err(HostError::Unsupported("object urls"))
    }

    fn click_anchor(&self, _href: &str, _filename: &str) -> std::result::Result<(), HostError> {
        Err(HostError::Unsupported("anchor downloads"))
    }

    fn revoke_object_url(&self, _url: &str) {}

    fn open_in_new_context(&self, _url: &str) -> std::result::Result<(), HostError> {
        Err(HostError::Unsupported("viewing contexts"))
    }

    fn delay(&self, _duration: Duration) -> LocalBoxFuture<'static, ()> {
        future::ready(()).boxed_local()
    }
}
