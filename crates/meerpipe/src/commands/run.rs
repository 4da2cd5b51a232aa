//! Run command - processes every selected job and reports the outcome.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result, bail};
use console::{Style, style};
use indicatif::{ProgressBar, ProgressStyle};
use meerpipe_pipeline::{Pipeline, ProcessRunner, Settings};
use meerpipe_types::JobSummary;
use serde::Serialize;
use tracing::info;

use super::{Context, Rejected, Selected};

#[derive(Debug, Serialize)]
struct RunReport<'a> {
    jobs: &'a [JobSummary],
    rejected: &'a [Rejected],
}

pub async fn run(selected: Selected, settings: Arc<Settings>, ctx: &Context) -> Result<()> {
    let Selected {
        jobs,
        rejected,
        index,
    } = selected;

    let pipeline = Pipeline::new(settings, index, Arc::new(ProcessRunner))
        .await
        .context("failed to start the workflow engine")?;

    let spinner = if ctx.json_output {
        ProgressBar::hidden()
    } else {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message(format!("processing {} jobs", jobs.len()));
        spinner.enable_steady_tick(Duration::from_millis(120));
        spinner
    };

    let summaries = pipeline.run_all(jobs).await;
    spinner.finish_and_clear();
    pipeline
        .shutdown()
        .await
        .context("workflow engine did not shut down cleanly")?;

    if ctx.json_output {
        let report = RunReport {
            jobs: &summaries,
            rejected: &rejected,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&summaries, &rejected, ctx);
    }

    let failed = summaries.iter().filter(|s| !s.is_success()).count() + rejected.len();
    let total = summaries.len() + rejected.len();
    info!(total, failed, "run finished");
    if failed > 0 {
        bail!("{failed} of {total} observations failed");
    }
    Ok(())
}

fn print_report(summaries: &[JobSummary], rejected: &[Rejected], ctx: &Context) {
    let dim = Style::new().dim();
    for summary in summaries {
        let job = &summary.job;
        let attempts: u32 = summary.stages.iter().map(|r| r.attempts).sum();
        match &summary.error {
            None => println!(
                "{} {} {} {}",
                style("✓").green(),
                job.pulsar,
                job.utc,
                dim.apply_to(format!("{} stages, {attempts} attempts", summary.stages.len()))
            ),
            Some(error) => println!(
                "{} {} {} failed: {error}",
                style("✗").red(),
                job.pulsar,
                job.utc
            ),
        }
        if ctx.verbose {
            for record in &summary.stages {
                println!(
                    "    {:<9} {} attempt(s){}",
                    record.stage.id(),
                    record.attempts,
                    record
                        .error
                        .as_ref()
                        .map(|e| format!(" - {e}"))
                        .unwrap_or_default()
                );
            }
        }
    }
    for rejected in rejected {
        rejected.print();
    }
}
