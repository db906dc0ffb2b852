//! Gmail Label Export
//!
//! Exports every message filed under one Gmail label to numbered JSON files.
//!
//! # Overview
//!
//! - **Authentication**: OAuth2 installed-app flow with a cached, refreshable token
//! - **Label resolution**: name or id lookup memoized in a small LRU cache
//! - **Listing**: label-filtered message ids, optionally across all pages
//! - **Parsing**: raw RFC 822 messages turned into header maps with cleaned body text
//! - **Export**: batched JSON files, cumulative (`legacy`) or one window per file (`windowed`)
//!
//! # Example Usage
//!
//! ```no_run
//! use gmail_label_export::{auth, client::ProductionGmailClient, config::Config};
//! use gmail_label_export::exporter::{Exporter, NoProgress};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!
//!     let credential = auth::acquire(
//!         &config.auth.token_path,
//!         &config.auth.credentials_path,
//!         &config.auth.scopes,
//!         config.auth.oauth2_port,
//!     )
//!     .await?;
//!
//!     let client = ProductionGmailClient::new(auth::build_gmail_hub(&credential).await?);
//!     let report = Exporter::new(client, config.export)
//!         .run(false, &NoProgress)
//!         .await?;
//!
//!     println!("{} files written", report.files.len());
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`auth`] - Credential cache, refresh and interactive authorization
//! - [`client`] - Gmail API client trait and production implementation
//! - [`label_resolver`] - Label name/id resolution with LRU memoization
//! - [`lister`] - Paginated message id listing
//! - [`message`] - Raw message parsing into records
//! - [`cleaner`] - Quoted-reply and zero-width-space removal
//! - [`exporter`] - Batch planning and JSON file output
//! - [`cli`] - Command-line interface and progress display
//! - [`config`] - Configuration management
//! - [`error`] - Error types and result aliases

pub mod auth;
pub mod cleaner;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod exporter;
pub mod label_resolver;
pub mod lister;
pub mod message;

// Re-export commonly used types for convenience
pub use error::{GmailError, Result};

pub use auth::{AuthorizationFlow, Credential, CredentialManager, InstalledAppFlow};
pub use client::{GmailClient, LabelInfo, MessagePage, ProductionGmailClient};
pub use config::{BatchMode, Config, ExportConfig};
pub use exporter::{plan_batches, BatchWindow, ExportReport, ExportSession, Exporter};
pub use label_resolver::LabelResolver;
pub use message::{parse_raw_message, MessageRecord};

// CLI types (for binary usage)
pub use cli::{Cli, Commands, ProgressReporter};
