//! Markdown run report
//!
//! Renders one finished run: metadata, phase counts, the per-source table
//! and the failure list.

use crate::output::OutputResult;
use crate::pipeline::{Phase, PipelineRun};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes the markdown report of a run
///
/// # Arguments
///
/// * `run` - The finished run
/// * `config_hash` - Hash of the configuration the run used
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote the report
/// * `Err(OutputError)` - Failed to write the report
pub fn generate_markdown_report(run: &PipelineRun, config_hash: &str, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_report(run, config_hash);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    tracing::info!("Report written to {}", output_path.display());
    Ok(())
}

/// Formats a run as markdown
pub fn format_markdown_report(run: &PipelineRun, config_hash: &str) -> String {
    let mut md = String::new();

    md.push_str("# Harvest Run Report\n\n");

    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Run ID**: {}\n", run.id));
    md.push_str(&format!("- **Started**: {}\n", run.started_at.to_rfc3339()));
    if let Some(finished) = run.finished_at {
        md.push_str(&format!("- **Finished**: {}\n", finished.to_rfc3339()));
    }
    if let Some(duration) = run.duration_ms() {
        md.push_str(&format!("- **Duration**: {:.1} seconds\n", duration as f64 / 1000.0));
    }
    md.push_str(&format!("- **Status**: {}\n", run.status.to_db_string()));
    md.push_str(&format!("- **Last Phase**: {}\n", run.phase));
    if let Some(reason) = &run.fatal_reason {
        md.push_str(&format!("- **Fatal Reason**: {}\n", reason));
    }
    md.push_str(&format!("- **Config Hash**: {}\n\n", config_hash));

    md.push_str("## Phase Counts\n\n");
    md.push_str("| Phase | Items |\n");
    md.push_str("|-------|-------|\n");
    md.push_str(&format!("| Fetched | {} |\n", run.counts.fetched));
    md.push_str(&format!("| Analyzed | {} |\n", run.counts.analyzed));
    md.push_str(&format!("| Kept by filter | {} |\n", run.counts.filtered_in));
    md.push_str(&format!("| Dropped by filter | {} |\n", run.counts.filtered_out));
    md.push_str(&format!("| Persisted | {} |\n\n", run.counts.persisted));

    md.push_str(&format!(
        "Cache views: {} written, {} failed\n\n",
        run.cache_views_written, run.cache_views_failed
    ));

    if !run.sources.is_empty() {
        md.push_str("## Sources\n\n");
        md.push_str("| Source | Submitted | Accepted | Rejected | Fetched | Failed | Skipped |\n");
        md.push_str("|--------|-----------|----------|----------|---------|--------|---------|\n");
        for source in &run.sources {
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} | {} |\n",
                source.name,
                source.submitted,
                source.accepted,
                source.rejections.len(),
                source.fetched,
                source.failed(),
                source.skipped
            ));
        }
        md.push('\n');
    }

    if run.failure_count() > 0 {
        md.push_str(&format!("## Failures ({})\n\n", run.failure_count()));

        for phase in [Phase::Fetching, Phase::Analyzing, Phase::Persisting] {
            let failures: Vec<_> = run.failures_in(phase).collect();
            if failures.is_empty() {
                continue;
            }

            md.push_str(&format!("### {}\n\n", phase));
            for failure in failures {
                md.push_str(&format!("- `{}`: {}\n", failure.target, failure.reason));
            }
            md.push('\n');
        }

        if run.failures_dropped > 0 {
            md.push_str(&format!("*{} more failures not listed*\n\n", run.failures_dropped));
        }
    }

    md.push_str("---\n\n");
    md.push_str("*Generated by harvester*\n");

    md
}
