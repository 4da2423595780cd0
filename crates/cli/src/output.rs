use crate::error::CliError;
use engine_config::report::{plan::PlanReport, summary::JobSummary};
use engine_core::progress::ProgressStatus;
use model::pagination::range::BatchRange;

/// Prints `json`, or writes it to `path` when one is given.
pub async fn emit_json(json: String, path: Option<&str>) -> Result<(), CliError> {
    match path {
        Some(path) => tokio::fs::write(path, json).await?,
        None => println!("{json}"),
    }
    Ok(())
}

pub async fn write_summary(summary: &JobSummary, path: Option<&str>) -> Result<(), CliError> {
    emit_json(summary.to_json()?, path).await
}

pub async fn write_plan(plan: &PlanReport, path: Option<&str>) -> Result<(), CliError> {
    emit_json(serde_json::to_string_pretty(plan)?, path).await
}

pub fn print_bounds(table: &str, bounds: Option<&BatchRange>) {
    match bounds {
        Some(range) => println!("{table}: min {} max {}", range.start, range.end),
        None => println!("{table}: no rows"),
    }
}

pub fn print_progress_table(statuses: &[ProgressStatus]) {
    if statuses.is_empty() {
        println!("No recorded jobs.");
        return;
    }

    for status in statuses {
        println!("Progress for job '{}' on {}:", status.job_id, status.table);
        println!("-----------------------------");
        println!("{:<16} {}", "Stage", status.stage);
        println!("{:<16} {}", "Range", status.range);
        let last_key = status
            .last_key
            .as_ref()
            .map(|k| k.to_string())
            .unwrap_or_else(|| "n/a".to_string());
        println!("{:<16} {}", "Last key", last_key);
        println!("{:<16} {}", "Sub-batches", status.sub_batches_done);
        println!("{:<16} {}", "Rows affected", status.rows_affected);
        if let Some(percent) = status.percent_done {
            println!("{:<16} {percent:.1}%", "Done");
        }
        if let Some(error) = &status.last_error {
            println!("{:<16} {}", "Last error", error);
        }
        println!("{:<16} {}", "Updated", status.updated_at.to_rfc3339());
        println!();
    }
}
