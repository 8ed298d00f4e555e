//! Command-line importer that synchronises hierarchical process
//! definitions into the AskDelphi CMS.
//!
//! The flow is: load settings from the environment, parse the process
//! document, map it onto a topic tree and replay that tree against the CMS
//! through an authenticated session.

pub mod auth;
pub mod checkout;
pub mod client;
pub mod config;
pub mod error;
pub mod importer;
pub mod load_config;
pub mod mapper;
pub mod parts;
pub mod relations;
pub mod session;
pub mod topic;
pub mod topic_types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::client::{CmsClient, DelphiClient};
use crate::importer::Importer;
use crate::load_config::load_settings;
use crate::mapper::{Mapper, ProcessDocument};
use crate::session::Session;
use crate::topic_types::TypeCatalog;

/// Synchronise digital coach process definitions with the AskDelphi CMS.
#[derive(Debug, Parser)]
#[command(name = "delphi-sync", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Import a process document as a topic tree.
    Import {
        /// Path to the process JSON document.
        #[arg(long)]
        input: PathBuf,
    },
    /// Export the full project to a JSON file.
    Export {
        /// Path the export is written to.
        #[arg(long)]
        output: PathBuf,
    },
    /// Delete a topic and all of its descendants.
    Delete {
        /// Topic to delete.
        #[arg(long)]
        topic_id: String,
        /// Version to delete; looked up when omitted.
        #[arg(long)]
        topic_version_id: Option<String>,
    },
}

/// Run the selected command against the configured CMS.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = load_settings();
    let session = Arc::new(Session::from_settings(&settings)?);
    let client = DelphiClient::new(session);

    match cli.command {
        Commands::Import { input } => {
            let raw = std::fs::read_to_string(&input)
                .with_context(|| format!("could not read {}", input.display()))?;
            // Some exporters prepend a UTF-8 BOM.
            let document: ProcessDocument = serde_json::from_str(raw.trim_start_matches('\u{feff}'))
                .with_context(|| format!("could not parse {}", input.display()))?;

            let mapper = Mapper::new(TypeCatalog::digital_coach());
            let tree = mapper.map(&document.process);

            if settings.skip_checkout_checkin {
                warn!("checkout/checkin is skipped; only use this against mock backends");
            }
            let importer = Importer::new(
                client,
                settings.skip_checkout_checkin,
                settings.language.clone(),
            );
            importer.import_topics(&tree).await?;
            info!("import completed");
        }
        Commands::Export { output } => {
            let export = client.export().await?;
            let serialised = serde_json::to_string_pretty(&export)?;
            std::fs::write(&output, serialised)
                .with_context(|| format!("could not write {}", output.display()))?;
            info!(file = %output.display(), "export written");
        }
        Commands::Delete { topic_id, topic_version_id } => {
            let summary = client.get_topic(&topic_id).await?;
            let version_id = match topic_version_id.or(summary.topic_version_id) {
                Some(version_id) => version_id,
                None => anyhow::bail!(
                    "topic {topic_id} has no version id; pass --topic-version-id explicitly"
                ),
            };
            let importer = Importer::new(client, settings.skip_checkout_checkin, settings.language);
            importer
                .delete_topic_recursive(&topic_id, &version_id, &summary.children)
                .await?;
            info!(topic_id = %topic_id, "topic tree deleted");
        }
    }
    Ok(())
}
