//! Command-line interface

use clap::{Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::{BatchMode, Config};
use crate::exporter::{ExportProgress, ExportReport, WrittenFile};

#[derive(Parser, Debug)]
#[command(name = "gmail-label-export")]
#[command(version = "0.1.0")]
#[command(about = "Export the messages under a Gmail label to batched JSON files", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to OAuth2 application credentials file (overrides config)
    #[arg(long)]
    pub credentials: Option<PathBuf>,

    /// Path to token cache file (overrides config)
    #[arg(long)]
    pub token_cache: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authenticate with Gmail API
    Auth {
        /// Force re-authentication even if token exists
        #[arg(long)]
        force: bool,
    },

    /// Export every message under the label
    Export {
        /// Label name or id to export (overrides config)
        #[arg(short, long)]
        label: Option<String>,

        /// Directory the batch files are written to (overrides config)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Resolve and list only, report the files that would be written
        #[arg(long)]
        dry_run: bool,
    },

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    /// Apply command-line paths and export options on top of the loaded config
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(credentials) = &self.credentials {
            config.auth.credentials_path = credentials.clone();
        }
        if let Some(token_cache) = &self.token_cache {
            config.auth.token_path = token_cache.clone();
        }
        if let Commands::Export {
            label, output_dir, ..
        } = &self.command
        {
            if let Some(label) = label {
                config.export.label = label.clone();
            }
            if let Some(output_dir) = output_dir {
                config.export.output_dir = output_dir.clone();
            }
        }
    }
}

/// Progress reporter using indicatif
pub struct ProgressReporter {
    multi: Arc<MultiProgress>,
    spinner_style: ProgressStyle,
    bar_style: ProgressStyle,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::with_multi(Arc::new(MultiProgress::new()))
    }

    /// Share the display with the log writer so log lines print above the bars
    pub fn with_multi(multi: Arc<MultiProgress>) -> Self {
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        let bar_style = ProgressStyle::default_bar()
            .template("[{elapsed:>6}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");

        Self {
            multi,
            spinner_style,
            bar_style,
        }
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    pub fn add_progress_bar(&self, len: u64, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new(len));
        pb.set_style(self.bar_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Finish a spinner and clear it from the multi-progress display
    pub fn finish_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        println!("  ✓ {}", msg);
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Renders export events as spinners and a fetch progress bar
pub struct ExportProgressDisplay {
    state: Mutex<DisplayState>,
}

struct DisplayState {
    reporter: ProgressReporter,
    current: Option<ProgressBar>,
}

impl ExportProgressDisplay {
    /// Starts with a spinner for the label lookup
    pub fn new(reporter: ProgressReporter, label: &str) -> Self {
        let spinner = reporter.add_spinner(&format!("Resolving label '{}'...", label));
        Self {
            state: Mutex::new(DisplayState {
                reporter,
                current: Some(spinner),
            }),
        }
    }

    /// Clear whatever is still on screen, e.g. after an error
    pub fn clear(&self) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(pb) = state.current.take() {
                pb.finish_and_clear();
            }
        }
    }
}

impl ExportProgress for ExportProgressDisplay {
    fn label_resolved(&self, label_id: &str) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(pb) = state.current.take() {
                state
                    .reporter
                    .finish_spinner(&pb, &format!("Label resolved to {}", label_id));
            }
            let spinner = state.reporter.add_spinner("Listing messages...");
            state.current = Some(spinner);
        }
    }

    fn messages_listed(&self, total: usize, to_fetch: usize) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(pb) = state.current.take() {
                state
                    .reporter
                    .finish_spinner(&pb, &format!("Found {} messages", total));
            }
            if to_fetch > 0 {
                let bar = state
                    .reporter
                    .add_progress_bar(to_fetch as u64, "Fetching messages");
                state.current = Some(bar);
            }
        }
    }

    fn message_fetched(&self, _id: &str) {
        if let Ok(state) = self.state.lock() {
            if let Some(pb) = &state.current {
                pb.inc(1);
            }
        }
    }

    fn file_written(&self, file: &WrittenFile) {
        if let Ok(state) = self.state.lock() {
            if let Some(pb) = &state.current {
                pb.set_message(format!("wrote {}", file.path.display()));
                if pb.length().is_some_and(|len| pb.position() >= len) {
                    pb.finish_and_clear();
                }
            }
        }
    }
}

/// Plain-text summary printed at the end of an export
pub fn render_summary(report: &ExportReport) -> String {
    let mut out = String::new();

    if report.dry_run {
        out.push_str("Export summary (DRY RUN, nothing was fetched or written)\n");
    } else {
        out.push_str("Export summary\n");
    }
    out.push_str(&format!("  Label:            {} ({})\n", report.label, report.label_id));
    out.push_str(&format!("  Messages listed:  {}\n", report.messages_listed));
    if !report.dry_run {
        out.push_str(&format!("  Messages fetched: {}\n", report.messages_fetched));
    }
    out.push_str(&format!("  Batch mode:       {}\n", report.batch_mode));
    out.push_str(&format!(
        "  Duration:         {}m {}s\n",
        report.duration_seconds() / 60,
        report.duration_seconds() % 60
    ));

    if report.files.is_empty() {
        out.push_str("  Files:            none\n");
    } else {
        let verb = if report.dry_run { "would hold" } else { "holds" };
        out.push_str("  Files:\n");
        for file in &report.files {
            out.push_str(&format!(
                "    {} {} {} records\n",
                file.path.display(),
                verb,
                file.records
            ));
        }
    }

    if report.messages_skipped > 0 {
        out.push_str(&format!(
            "\n  Note: {} messages are not covered by any file in {} mode.\n",
            report.messages_skipped, report.batch_mode
        ));
        if report.batch_mode == BatchMode::Legacy {
            out.push_str("        Set export.batch_mode = \"windowed\" to export all of them.\n");
        }
    }

    out
}
