//! Check command handler.
//!
//! Reports whether the index collection is reachable and which of the
//! requested documents have chunks in it.

use clap::Args;
use research_core::{config::AppConfig, AppResult};
use research_retrieval::{CollectionReport, RetrievalGateway};
use std::collections::BTreeSet;

/// Check the index collection and document coverage
#[derive(Args, Debug)]
pub struct CheckCommand {
    /// Documents to look for (repeat the flag or separate with commas)
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub filenames: Vec<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl CheckCommand {
    /// Execute the check command. Returns whether every requested document
    /// is present.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<bool> {
        tracing::info!("Executing check command");

        let filenames: BTreeSet<String> = self
            .filenames
            .iter()
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect();

        let gateway = RetrievalGateway::from_config(config).await?;
        let report = gateway.check(&filenames).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print!("{}", render_report(&report));
        }

        Ok(report.missing().is_empty())
    }
}

/// Human-readable collection report.
pub fn render_report(report: &CollectionReport) -> String {
    let mut lines = vec![
        format!("Collection: {}", report.collection),
        format!("- Document chunks: {}", report.total_chunks),
    ];

    for file in &report.files {
        let status = if file.chunks > 0 { "found" } else { "NOT FOUND" };
        lines.push(format!("- {}: {} ({} chunks)", file.filename, status, file.chunks));
    }

    let missing = report.missing();
    if !missing.is_empty() {
        lines.push(format!("Missing documents: {}", missing.join(", ")));
    }

    lines.join("\n") + "\n"
}
