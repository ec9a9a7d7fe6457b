use anyhow::Result;
use clap::Parser;
use console::style;
use std::path::Path;

use pgshift_core::MigrationPlan;
use pgshift_runtime::{Database, MutationOutcome, PlanReport, PlanRunner};

use super::{print_json, GlobalArgs};

/// Apply a migration plan file.
#[derive(Parser)]
pub struct ApplyCommand {
    /// Plan file (TOML, `[[step]]` entries).
    pub plan: String,
}

impl ApplyCommand {
    pub async fn execute(self, db: &Database, args: &GlobalArgs) -> Result<()> {
        if !Path::new(&self.plan).exists() {
            anyhow::bail!("Plan file not found: {}", self.plan);
        }
        let plan = MigrationPlan::from_file(&self.plan)?;

        if plan.is_empty() {
            if !args.json {
                println!("  {} No steps in {}", style("ℹ").blue(), self.plan);
            }
            return Ok(());
        }

        if !args.json {
            println!();
            println!(
                "  {}  Applying {} step(s) from {}",
                style("⚒️").bold(),
                plan.steps.len(),
                style(&self.plan).cyan()
            );
            println!();
        }

        let report = PlanRunner::new(db.clone()).run(&plan).await?;

        if args.json {
            return print_json(&report);
        }
        print_report(&report);
        Ok(())
    }
}

fn print_report(report: &PlanReport) {
    for step in &report.steps {
        let marker = match &step.outcome {
            MutationOutcome::Applied => style("✓").green(),
            MutationOutcome::AlreadySatisfied => style("-").dim(),
            MutationOutcome::FailedSoft { .. } => style("!").yellow(),
        };
        let detail = step
            .detail
            .as_deref()
            .map(|d| format!(" ({})", d))
            .unwrap_or_default();
        println!(
            "  {} {:>3} {:<20} {} {}{}",
            marker,
            step.index,
            step.action,
            style(&step.table).cyan(),
            style(&step.outcome).dim(),
            detail
        );
        if let MutationOutcome::FailedSoft {
            remediation: Some(sql),
            ..
        } = &step.outcome
        {
            println!("        {} {}", style("run manually:").yellow(), sql);
        }
    }

    let elapsed = report.finished_at - report.started_at;
    println!();
    println!(
        "  {} {} applied, {} already in place, {} soft failure(s) in {}ms",
        style("ℹ").blue(),
        report.applied(),
        report.already_satisfied(),
        report.soft_failures(),
        elapsed.num_milliseconds()
    );
    println!();
}
