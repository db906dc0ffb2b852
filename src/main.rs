use anyhow::Result;
use clap::Parser;
use gmail_label_export::auth;
use gmail_label_export::cli::{self, Cli, Commands, ExportProgressDisplay, ProgressReporter};
use gmail_label_export::client::{GmailClient, ProductionGmailClient};
use gmail_label_export::config::Config;
use gmail_label_export::error::GmailError;
use gmail_label_export::exporter::Exporter;
use indicatif::MultiProgress;
use std::io::Write;
use std::process;
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// A writer that prints through MultiProgress to avoid progress bar conflicts
#[derive(Clone)]
struct MultiProgressWriter {
    multi: Arc<MultiProgress>,
    buffer: Arc<std::sync::Mutex<Vec<u8>>>,
}

impl MultiProgressWriter {
    fn new(multi: Arc<MultiProgress>) -> Self {
        Self {
            multi,
            buffer: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }
}

impl Write for MultiProgressWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "log buffer poisoned"))?;
        buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "log buffer poisoned"))?;
        if !buffer.is_empty() {
            let msg = String::from_utf8_lossy(&buffer);
            let msg = msg.trim_end_matches('\n');
            if !msg.is_empty() {
                let _ = self.multi.println(msg);
            }
            buffer.clear();
        }
        Ok(())
    }
}

impl Drop for MultiProgressWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// MakeWriter implementation for tracing
#[derive(Clone)]
struct MultiProgressMakeWriter {
    multi: Arc<MultiProgress>,
}

impl<'a> MakeWriter<'a> for MultiProgressMakeWriter {
    type Writer = MultiProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        MultiProgressWriter::new(Arc::clone(&self.multi))
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        display_error(&e);
        eprintln!("\nFor help, run: gmail-label-export --help");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Install default crypto provider for rustls
    // On non-Windows platforms, use aws-lc-rs; on Windows, use ring
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_label_export=debug,warn"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_label_export=info,warn"))
    };

    // Logs print above progress bars through the shared MultiProgress
    let multi_progress = Arc::new(MultiProgress::new());
    let make_writer = MultiProgressMakeWriter {
        multi: Arc::clone(&multi_progress),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(make_writer)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    match &cli.command {
        Commands::InitConfig { output, force } => {
            if output.exists() && !force {
                return Err(GmailError::ConfigError(format!(
                    "Configuration file already exists at {:?}. Use --force to overwrite.",
                    output
                ))
                .into());
            }

            Config::create_example(output).await?;

            println!("Created example configuration file at: {:?}", output);
            println!("\nKey settings to review:");
            println!("  - export.label: Label name or id to export");
            println!("  - export.batch_size: Messages per output file");
            println!("  - export.batch_mode: 'legacy' (cumulative files) or 'windowed'");
            println!("  - auth.credentials_path: OAuth client secret downloaded from Google Cloud");

            Ok(())
        }

        Commands::Auth { force } => {
            let config = load_config(&cli).await?;
            let token_path = &config.auth.token_path;

            if *force && token_path.exists() {
                tokio::fs::remove_file(token_path).await?;
                tracing::info!("Removed existing token cache");
            }

            let credential = auth::acquire(
                token_path,
                &config.auth.credentials_path,
                &config.auth.scopes,
                config.auth.oauth2_port,
            )
            .await?;

            println!("Successfully authenticated with Gmail API");
            println!("Token cached at: {:?}", token_path);

            let client = ProductionGmailClient::new(auth::build_gmail_hub(&credential).await?);
            let email = client.get_profile_email().await?;
            println!("Connected to account: {}", email);

            Ok(())
        }

        Commands::Export { dry_run, .. } => {
            let config = load_config(&cli).await?;
            let reporter = ProgressReporter::with_multi(Arc::clone(&multi_progress));

            let auth_spinner = reporter.add_spinner("Authenticating...");
            let credential = match auth::acquire(
                &config.auth.token_path,
                &config.auth.credentials_path,
                &config.auth.scopes,
                config.auth.oauth2_port,
            )
            .await
            {
                Ok(credential) => credential,
                Err(e) => {
                    auth_spinner.finish_and_clear();
                    return Err(e.into());
                }
            };
            reporter.finish_spinner(&auth_spinner, "Authenticated");

            let client = ProductionGmailClient::new(auth::build_gmail_hub(&credential).await?);
            let label = config.export.label.clone();
            let mut exporter = Exporter::new(client, config.export);

            let display = ExportProgressDisplay::new(reporter, &label);
            let report = exporter.run(*dry_run, &display).await;
            display.clear();
            let report = report?;

            println!("\n{}", cli::render_summary(&report));
            Ok(())
        }
    }
}

/// Load the config file and layer the command-line overrides on top
async fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(&cli.config).await?;
    cli.apply_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

fn display_error(error: &anyhow::Error) {
    eprintln!("Error: {}", error);

    let mut cause = error.source();
    while let Some(e) = cause {
        eprintln!("  Caused by: {}", e);
        cause = e.source();
    }

    if let Some(gmail_err) = error.downcast_ref::<GmailError>() {
        match gmail_err {
            GmailError::AuthError(_) | GmailError::TokenRefreshRejected(_) => {
                eprintln!("\nHint: Make sure your credentials.json file is valid.");
                eprintln!("      You can download it from Google Cloud Console.");
                eprintln!("      Try running: gmail-label-export auth --force");
            }
            GmailError::LabelNotFound(label) => {
                eprintln!("\nHint: No label is named or has the id '{}'.", label);
                eprintln!("      Label names are matched exactly, including case.");
            }
            GmailError::ConfigError(_) => {
                eprintln!("\nHint: Check your configuration file for errors.");
                eprintln!("      Run: gmail-label-export init-config --force");
            }
            err if err.is_transient() => {
                eprintln!("\nHint: This may be a temporary API or network error.");
                eprintln!("      Files already written are kept; run the export again.");
            }
            _ => {}
        }
    }
}
