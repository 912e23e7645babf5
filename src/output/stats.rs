//! Console printing of runs, stored statistics and pool health

use crate::identity::PoolStats;
use crate::pipeline::PipelineRun;
use crate::queue::ValidationReport;
use crate::storage::StoredStats;

/// Prints a finished run to stdout
pub fn print_run_summary(run: &PipelineRun) {
    println!("=== Harvest Run {} ===\n", run.id);

    println!("Status: {} (last phase: {})", run.status.to_db_string(), run.phase);
    if let Some(reason) = &run.fatal_reason {
        println!("Fatal: {}", reason);
    }
    if let Some(duration) = run.duration_ms() {
        println!("Duration: {:.1}s", duration as f64 / 1000.0);
    }
    println!();

    println!("Items:");
    println!("  Fetched: {}", run.counts.fetched);
    println!("  Analyzed: {}", run.counts.analyzed);
    println!("  Kept: {} (dropped {})", run.counts.filtered_in, run.counts.filtered_out);
    println!("  Persisted: {}", run.counts.persisted);
    println!(
        "  Cache views: {} written, {} failed",
        run.cache_views_written, run.cache_views_failed
    );
    println!();

    if !run.sources.is_empty() {
        println!("Sources:");
        for source in &run.sources {
            println!(
                "  {}: {} fetched, {} failed, {} rejected",
                source.name,
                source.fetched,
                source.failed(),
                source.rejections.len()
            );
        }
        println!();
    }

    if run.failure_count() > 0 {
        println!("Failures ({}):", run.failure_count());
        for failure in &run.failures {
            println!("  [{}] {}: {}", failure.phase, failure.target, failure.reason);
        }
        if run.failures_dropped > 0 {
            println!("  ... and {} more", run.failures_dropped);
        }
    }
}

/// Prints stored statistics to stdout
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_stored_stats(stats: &StoredStats) {
    println!("=== Harvest Statistics ===\n");

    println!("Overview:");
    println!("  Stored items: {}", stats.total_items);
    println!("  Recorded runs: {}", stats.total_runs);
    if let Some(average) = stats.average_score {
        println!("  Average score: {:.1}", average);
    }
    println!();

    if !stats.items_by_source.is_empty() {
        println!("Items by Source:");
        let mut counts: Vec<_> = stats.items_by_source.iter().collect();
        counts.sort_by(|a, b| b.1.cmp(a.1));

        for (source, count) in counts {
            let percentage = if stats.total_items > 0 {
                (*count as f64 / stats.total_items as f64) * 100.0
            } else {
                0.0
            };
            println!("  {}: {} ({:.1}%)", source, count, percentage);
        }
        println!();
    }

    if !stats.best_items.is_empty() {
        println!("Best Items:");
        for item in &stats.best_items {
            println!(
                "  {:>5.1}  [{}] {}",
                item.composite.unwrap_or(0.0),
                item.source_kind,
                item.title.as_deref().unwrap_or(&item.url)
            );
        }
        println!();
    }

    if let Some(run) = &stats.latest_run {
        println!(
            "Latest Run: {} ({}, {} fetched, {} persisted, {} failures)",
            run.id,
            run.status.to_db_string(),
            run.counts.fetched,
            run.counts.persisted,
            run.failures
        );
    }
}

/// Prints identity pool health to stdout
pub fn print_pool_stats(stats: &PoolStats) {
    println!("Identity Pool:");
    println!("  Total: {}", stats.total);
    println!("  Available: {}", stats.available);
    println!(
        "  Healthy: {}, degraded: {}, untested: {}, blacklisted: {}",
        stats.healthy, stats.degraded, stats.untested, stats.blacklisted
    );
    if let Some(latency) = stats.average_latency {
        println!("  Average probe latency: {:?}", latency);
    }
    if let Some(current) = &stats.current {
        println!("  Current: {}", current);
    }
}

/// Prints the validation report of one source's targets
pub fn print_validation(source: &str, report: &ValidationReport) {
    println!(
        "Source {}: {} accepted, {} rejected",
        source,
        report.accepted_count(),
        report.rejected_count()
    );

    for target in &report.accepted {
        println!(
            "  + [{:>3}] {} ({} {})",
            target.priority, target.normalized_url, target.source_kind, target.content_kind
        );
    }
    for rejection in &report.rejected {
        println!("  - {} ({})", rejection.raw_input, rejection.reason);
    }
}
