//! Dry run - prints each job's stage plan without running anything.

use anyhow::Result;
use console::{Style, style};
use meerpipe_pipeline::{Settings, StagePlan, StagePreview};
use meerpipe_types::ObservationJob;
use serde::Serialize;

use super::{Context, Selected};

#[derive(Debug, Serialize)]
struct JobPlan<'a> {
    job: &'a ObservationJob,
    stages: Vec<StagePreview>,
}

pub fn run(selected: &Selected, settings: &Settings, ctx: &Context) -> Result<()> {
    let plan = StagePlan::from_settings(settings);
    let plans: Vec<JobPlan<'_>> = selected
        .jobs
        .iter()
        .map(|job| JobPlan {
            job,
            stages: plan.preview(settings, job),
        })
        .collect();

    if ctx.json_output {
        let output = serde_json::json!({
            "jobs": plans,
            "rejected": selected.rejected,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    for JobPlan { job, stages } in &plans {
        println!();
        println!(
            "{} {} {}",
            style(&job.pulsar).bold(),
            job.utc,
            dim.apply_to(format!("[{} {}, {:.0} s]", job.project_code, job.band, job.duration_secs))
        );
        if ctx.verbose {
            println!("  {} {}", dim.apply_to("ephemeris:"), job.ephemeris.display());
            println!("  {} {}", dim.apply_to("template: "), job.template.display());
        }
        for stage in stages {
            let after = if stage.depends_on.is_empty() {
                String::new()
            } else {
                let deps: Vec<&str> = stage.depends_on.iter().map(|d| d.id()).collect();
                format!(" after {}", deps.join(", "))
            };
            println!(
                "  {:<9} {:>10.0} s {:>10.0} MB{}",
                stage.stage.id(),
                stage.resources.time_limit_secs,
                stage.resources.memory_mb,
                dim.apply_to(after)
            );
        }
    }
    for rejected in &selected.rejected {
        rejected.print();
    }
    println!();
    println!(
        "{}",
        dim.apply_to(format!("{} jobs planned, nothing run", plans.len()))
    );
    Ok(())
}
