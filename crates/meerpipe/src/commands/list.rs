//! List command - writes the selected jobs as a manifest.

use std::path::Path;

use anyhow::{Context as _, Result};
use console::style;
use meerpipe_pipeline::write_manifest;

use super::{Context, Selected};

/// Written to the current directory.
pub const LIST_OUT_FILE: &str = "processing_jobs.csv";

/// Write `processing_jobs.csv` and report it.
pub fn run(selected: &Selected, ctx: &Context) -> Result<()> {
    let path = Path::new(LIST_OUT_FILE);
    write_manifest(path, &selected.jobs)
        .with_context(|| format!("failed to write {LIST_OUT_FILE}"))?;

    if ctx.json_output {
        let output = serde_json::json!({
            "path": path,
            "jobs": selected.jobs.len(),
            "rejected": selected.rejected,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!(
            "{} {} jobs written to {}",
            style("✓").green(),
            selected.jobs.len(),
            style(LIST_OUT_FILE).bold()
        );
        for rejected in &selected.rejected {
            rejected.print();
        }
    }
    Ok(())
}
