//! Batched export of a label's messages to numbered JSON files
//!
//! [`plan_batches`] decides which id windows are processed and which file
//! each one lands in; [`ExportSession`] owns the record accumulator and
//! writes the files; [`Exporter`] drives resolve, list, fetch and flush.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::client::GmailClient;
use crate::config::{BatchMode, ExportConfig};
use crate::error::{GmailError, Result};
use crate::label_resolver::LabelResolver;
use crate::lister::{ListOptions, MessageLister};
use crate::message::{fetch_and_clean, MessageRecord};

/// Hooks called as an export advances; every method defaults to a no-op
pub trait ExportProgress: Send + Sync {
    fn label_resolved(&self, _label_id: &str) {}

    /// `to_fetch` is the number of messages the batch plan covers
    fn messages_listed(&self, _total: usize, _to_fetch: usize) {}

    fn message_fetched(&self, _id: &str) {}

    fn file_written(&self, _file: &WrittenFile) {}
}

/// Progress sink that ignores every event
pub struct NoProgress;

impl ExportProgress for NoProgress {}

/// One id window and the file it is flushed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchWindow {
    /// File number, starting at 1
    pub number: usize,
    /// First id index of the window
    pub start: usize,
    /// One past the last id index of the window
    pub end: usize,
    /// Whether the file also repeats every earlier window
    pub cumulative: bool,
}

impl BatchWindow {
    fn len(&self) -> usize {
        self.end - self.start
    }

    /// Number of records the file for this window will hold
    pub fn records_in_file(&self) -> usize {
        if self.cumulative {
            self.end
        } else {
            self.len()
        }
    }

    pub fn file_name(&self, prefix: &str) -> String {
        format!("{}-{}.json", prefix, self.number)
    }
}

/// Split `total` ids into batch windows.
///
/// `Legacy` keeps the long-standing export loop: a window is only processed while
/// its end is below `total`, each file receives every record gathered so
/// far, and the window end snaps to `total` once `start + end` overshoots,
/// which also ends the loop. With 450 ids and a size of 200 only the first
/// window is written. `Windowed` partitions all ids and flushes the tail.
pub fn plan_batches(total: usize, batch_size: usize, mode: BatchMode) -> Result<Vec<BatchWindow>> {
    if batch_size == 0 {
        return Err(GmailError::ConfigError(
            "batch size must be at least 1".to_string(),
        ));
    }

    let mut windows = Vec::new();
    match mode {
        BatchMode::Legacy => {
            let mut batch_min = 0;
            let mut batch_max = batch_size;
            let mut batch_counter = 1;

            while batch_max < total {
                windows.push(BatchWindow {
                    number: batch_counter,
                    start: batch_min,
                    end: batch_max,
                    cumulative: true,
                });
                batch_min += batch_size;
                batch_max += batch_size;
                if batch_min + batch_max > total {
                    batch_max = total;
                }
                batch_counter += 1;
            }
        }
        BatchMode::Windowed => {
            let mut start = 0;
            while start < total {
                let end = (start + batch_size).min(total);
                windows.push(BatchWindow {
                    number: windows.len() + 1,
                    start,
                    end,
                    cumulative: false,
                });
                start = end;
            }
        }
    }

    Ok(windows)
}

/// A file written (or planned, on a dry run)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    pub path: PathBuf,
    pub records: usize,
}

/// Owns the accumulated records and writes batch files
pub struct ExportSession {
    output_dir: PathBuf,
    file_prefix: String,
    accumulator: Vec<MessageRecord>,
    written: Vec<WrittenFile>,
}

impl ExportSession {
    pub fn new(output_dir: impl Into<PathBuf>, file_prefix: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            file_prefix: file_prefix.into(),
            accumulator: Vec::new(),
            written: Vec::new(),
        }
    }

    pub fn path_for(&self, window: &BatchWindow) -> PathBuf {
        self.output_dir.join(window.file_name(&self.file_prefix))
    }

    pub fn accumulated(&self) -> &[MessageRecord] {
        &self.accumulator
    }

    pub fn written(&self) -> &[WrittenFile] {
        &self.written
    }

    pub fn into_written(self) -> Vec<WrittenFile> {
        self.written
    }

    /// Add a window's records and flush them to the window's file
    ///
    /// A cumulative window keeps everything gathered so far; otherwise the
    /// accumulator is reset first so the file holds only this window.
    pub async fn flush_window(
        &mut self,
        window: &BatchWindow,
        records: Vec<MessageRecord>,
    ) -> Result<&WrittenFile> {
        if !window.cumulative {
            self.accumulator.clear();
        }
        self.accumulator.extend(records);

        let path = self.path_for(window);
        write_json_array(&path, &self.accumulator).await?;
        info!(
            "Wrote {} records to {}",
            self.accumulator.len(),
            path.display()
        );

        self.written.push(WrittenFile {
            path,
            records: self.accumulator.len(),
        });
        let last = self.written.len() - 1;
        Ok(&self.written[last])
    }
}

/// Overwrite `path` with the compact JSON array of `records`
async fn write_json_array(path: &Path, records: &[MessageRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let json = serde_json::to_vec(records)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

/// Outcome of one export run
#[derive(Debug, Clone)]
pub struct ExportReport {
    pub label: String,
    pub label_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub messages_listed: usize,
    pub messages_fetched: usize,
    /// Listed ids that no file covers
    pub messages_skipped: usize,
    pub batch_mode: BatchMode,
    pub files: Vec<WrittenFile>,
    pub dry_run: bool,
}

impl ExportReport {
    pub fn duration_seconds(&self) -> i64 {
        (self.completed_at - self.started_at).num_seconds()
    }
}

/// Ids a plan never reaches
fn uncovered(windows: &[BatchWindow], total: usize) -> usize {
    total - windows.last().map(|w| w.end).unwrap_or(0)
}

/// Drives the export of one label
pub struct Exporter<C: GmailClient> {
    resolver: LabelResolver<C>,
    config: ExportConfig,
}

impl<C: GmailClient> Exporter<C> {
    pub fn new(client: C, config: ExportConfig) -> Self {
        Self {
            resolver: LabelResolver::new(client),
            config,
        }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Resolve the configured label, failing when it does not exist
    pub async fn resolve_label(&mut self) -> Result<String> {
        let label = self.config.label.clone();
        self.resolver
            .resolve_label_id(&label)
            .await?
            .ok_or(GmailError::LabelNotFound(label))
    }

    pub async fn list_messages(&self, label_id: &str) -> Result<Vec<String>> {
        let options = ListOptions {
            include_spam_trash: self.config.include_spam_trash,
            paginate: self.config.paginate_messages,
        };
        MessageLister::new(self.resolver.client(), options)
            .list_message_ids(label_id)
            .await
    }

    pub fn plan(&self, total: usize) -> Result<Vec<BatchWindow>> {
        plan_batches(total, self.config.batch_size, self.config.batch_mode)
    }

    /// Fetch, clean and flush the planned windows of `ids`
    pub async fn export_messages(
        &self,
        ids: &[String],
        progress: &dyn ExportProgress,
    ) -> Result<(usize, Vec<WrittenFile>)> {
        let windows = self.plan(ids.len())?;
        let client = self.resolver.client();
        let mut session = ExportSession::new(&self.config.output_dir, &self.config.file_prefix);
        let mut fetched = 0;

        for window in &windows {
            debug!(
                "Processing batch {} (ids {}..{})",
                window.number, window.start, window.end
            );
            let mut records = Vec::with_capacity(window.len());
            for id in &ids[window.start..window.end] {
                records.push(fetch_and_clean(client, id).await?);
                fetched += 1;
                progress.message_fetched(id);
            }
            let file = session.flush_window(window, records).await?;
            progress.file_written(file);
        }

        Ok((fetched, session.into_written()))
    }

    /// Run the whole export; a dry run stops after listing
    pub async fn run(&mut self, dry_run: bool, progress: &dyn ExportProgress) -> Result<ExportReport> {
        let started_at = Utc::now();

        let label_id = self.resolve_label().await?;
        progress.label_resolved(&label_id);

        let ids = self.list_messages(&label_id).await?;
        let windows = self.plan(ids.len())?;
        let skipped = uncovered(&windows, ids.len());
        let to_fetch = windows.last().map(|w| w.end).unwrap_or(0);
        progress.messages_listed(ids.len(), if dry_run { 0 } else { to_fetch });
        if skipped > 0 {
            warn!(
                "{} of {} messages fall outside every batch and will not be exported",
                skipped,
                ids.len()
            );
        }

        let (fetched, files) = if dry_run {
            let session = ExportSession::new(&self.config.output_dir, &self.config.file_prefix);
            let planned = windows
                .iter()
                .map(|window| WrittenFile {
                    path: session.path_for(window),
                    records: window.records_in_file(),
                })
                .collect();
            info!("Dry run: {} files planned", windows.len());
            (0, planned)
        } else {
            self.export_messages(&ids, progress).await?
        };

        Ok(ExportReport {
            label: self.config.label.clone(),
            label_id,
            started_at,
            completed_at: Utc::now(),
            messages_listed: ids.len(),
            messages_fetched: fetched,
            messages_skipped: skipped,
            batch_mode: self.config.batch_mode,
            files,
            dry_run,
        })
    }
}
