//! Fixed-window processing of large record streams.
//!
//! Windows bound transient memory; they are processed one after another on the calling thread.

use crate::error::{Result, StockLedgerError};
use crate::schema::EngineConfig;
use log::info;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStage {
    Checkpoint,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub stage: ProgressStage,
    pub processed: usize,
    /// Known for slices, `None` for open-ended iterators.
    pub total: Option<usize>,
}

/// Receives advisory progress observations. Nothing in the core depends on them.
pub trait ProgressObserver {
    fn on_progress(&self, progress: &Progress);
}

impl<F> ProgressObserver for F
where
    F: Fn(&Progress),
{
    fn on_progress(&self, progress: &Progress) {
        self(progress)
    }
}

/// Logs checkpoints through the `log` facade.
pub struct LogObserver;

impl ProgressObserver for LogObserver {
    fn on_progress(&self, progress: &Progress) {
        match (progress.stage, progress.total) {
            (ProgressStage::Checkpoint, Some(total)) => {
                info!("Processed {} of {} records", progress.processed, total)
            }
            (ProgressStage::Checkpoint, None) => info!("Processed {} records", progress.processed),
            (ProgressStage::Finished, _) => {
                info!("Finished processing {} records", progress.processed)
            }
        }
    }
}

pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_progress(&self, _progress: &Progress) {}
}

/// Set by the host to abort a run between windows.
#[derive(Debug, Default)]
pub struct CancellationFlag(AtomicBool);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct ChunkProcessor<'a> {
    chunk_size: usize,
    progress_interval: usize,
    observer: &'a dyn ProgressObserver,
    cancellation: Option<&'a CancellationFlag>,
}

impl<'a> ChunkProcessor<'a> {
    pub fn new(chunk_size: usize, observer: &'a dyn ProgressObserver) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            progress_interval: 10_000,
            observer,
            cancellation: None,
        }
    }

    pub fn from_config(config: &EngineConfig, observer: &'a dyn ProgressObserver) -> Self {
        Self::new(config.chunk_size, observer).with_progress_interval(config.progress_interval)
    }

    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval.max(1);
        self
    }

    pub fn with_cancellation(mut self, flag: &'a CancellationFlag) -> Self {
        self.cancellation = Some(flag);
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Applies `transform(record, global_index)` to every record, window by window, and
    /// returns the results in input order.
    pub fn process_in_chunks<T, U, F>(&self, records: &[T], mut transform: F) -> Result<Vec<U>>
    where
        F: FnMut(&T, usize) -> U,
    {
        let mut output = Vec::with_capacity(records.len());
        self.fold_in_chunks(records, (), |_, record, index| {
            output.push(transform(record, index));
        })?;
        Ok(output)
    }

    /// Folds every record into `acc` in input order.
    pub fn fold_in_chunks<T, A, F>(&self, records: &[T], mut acc: A, mut fold: F) -> Result<A>
    where
        F: FnMut(&mut A, &T, usize),
    {
        let total = Some(records.len());
        let mut processed = 0;

        for chunk in records.chunks(self.chunk_size) {
            self.check_cancelled(processed)?;
            for record in chunk {
                fold(&mut acc, record, processed);
                processed += 1;
                self.checkpoint(processed, total);
            }
        }

        self.finish(processed, total);
        Ok(acc)
    }

    /// Pulls one window at a time from `records`, so at most `chunk_size` input items are held.
    pub fn process_stream<I, T, U, F>(&self, records: I, mut transform: F) -> Result<Vec<U>>
    where
        I: IntoIterator<Item = T>,
        F: FnMut(T, usize) -> U,
    {
        let mut iter = records.into_iter();
        let mut output = Vec::new();
        let mut window: Vec<T> = Vec::with_capacity(self.chunk_size);
        let mut processed = 0;

        loop {
            self.check_cancelled(processed)?;
            window.extend(iter.by_ref().take(self.chunk_size));
            if window.is_empty() {
                break;
            }
            for record in window.drain(..) {
                output.push(transform(record, processed));
                processed += 1;
                self.checkpoint(processed, None);
            }
        }

        self.finish(processed, None);
        Ok(output)
    }

    fn check_cancelled(&self, processed: usize) -> Result<()> {
        match self.cancellation {
            Some(flag) if flag.is_cancelled() => Err(StockLedgerError::Cancelled { processed }),
            _ => Ok(()),
        }
    }

    fn checkpoint(&self, processed: usize, total: Option<usize>) {
        if processed % self.progress_interval == 0 {
            self.observer.on_progress(&Progress {
                stage: ProgressStage::Checkpoint,
                processed,
                total,
            });
        }
    }

    fn finish(&self, processed: usize, total: Option<usize>) {
        self.observer.on_progress(&Progress {
            stage: ProgressStage::Finished,
            processed,
            total,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_order_is_preserved_across_windows() {
        let records: Vec<u32> = (0..12_345).collect();
        let processor = ChunkProcessor::new(1000, &NoopObserver);

        let output = processor
            .process_in_chunks(&records, |r, idx| (idx, *r * 2))
            .unwrap();

        assert_eq!(output.len(), records.len());
        for (i, (idx, doubled)) in output.iter().enumerate() {
            assert_eq!(*idx, i);
            assert_eq!(*doubled, records[i] * 2);
        }
    }

    #[test]
    fn test_progress_every_ten_thousand() {
        let seen = RefCell::new(Vec::new());
        let observer = |p: &Progress| seen.borrow_mut().push(*p);
        let records = vec![0u8; 25_000];

        ChunkProcessor::new(3000, &observer)
            .fold_in_chunks(&records, 0usize, |acc, _, _| *acc += 1)
            .unwrap();

        let seen = seen.into_inner();
        let checkpoints: Vec<usize> = seen
            .iter()
            .filter(|p| p.stage == ProgressStage::Checkpoint)
            .map(|p| p.processed)
            .collect();
        assert_eq!(checkpoints, vec![10_000, 20_000]);
        assert_eq!(seen.last().unwrap().stage, ProgressStage::Finished);
        assert_eq!(seen.last().unwrap().processed, 25_000);
    }

    #[test]
    fn test_stream_matches_slice_processing() {
        let records: Vec<u64> = (0..7_777).collect();
        let processor = ChunkProcessor::new(500, &NoopObserver);

        let from_slice = processor.process_in_chunks(&records, |r, i| r + i as u64).unwrap();
        let from_stream = processor
            .process_stream(records.clone(), |r, i| r + i as u64)
            .unwrap();

        assert_eq!(from_slice, from_stream);
    }

    #[test]
    fn test_cancelled_run_returns_error() {
        let flag = CancellationFlag::new();
        let records = vec![1u8; 10];
        let processor = ChunkProcessor::new(4, &NoopObserver).with_cancellation(&flag);

        let mut calls = 0;
        let result = processor.fold_in_chunks(&records, (), |_, _, idx| {
            calls += 1;
            if idx == 5 {
                flag.cancel();
            }
        });

        assert!(matches!(result, Err(StockLedgerError::Cancelled { processed: 8 })));
        assert_eq!(calls, 8);
    }

    #[test]
    fn test_zero_chunk_size_is_clamped() {
        let processor = ChunkProcessor::new(0, &NoopObserver);
        assert_eq!(processor.chunk_size(), 1);
        let output = processor.process_in_chunks(&[1, 2, 3], |r, _| *r).unwrap();
        assert_eq!(output, vec![1, 2, 3]);
    }
}
