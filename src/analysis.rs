use anyhow::{Context, Result};
use chrono::Utc;
use std::fs;
use std::time::Instant;
use tracing::{info, warn};

use crate::export::{self, OutputFiles};
use crate::extract::extract_records;
use crate::render::{render_all, GeoJsonRenderer, MapRenderer};
use crate::stats::{AnalysisResult, SetSummary, VisitCount};
use crate::utils::format_number;
use crate::Args;

pub fn analyze_location_history(args: &Args) -> Result<AnalysisResult> {
    let total_start_time = Instant::now();
    info!(action = "start", component = "analysis", file_path = ?args.input, "Starting location history analysis");

    let extraction = extract_records(&args.input, args.workers)
        .with_context(|| format!("Error parsing KML file '{}'", args.input.display()))?;
    let records = extraction.records;
    let summary = SetSummary::of(&records);

    let filtered = if args.has_date_filter() {
        let subset = records.filter_by_date(args.start, args.end)?;
        info!(
            action = "filter",
            component = "analysis",
            kept = subset.len(),
            total = records.len(),
            "Applied date filter"
        );
        let filtered_summary = SetSummary::of(&subset);
        Some((subset, filtered_summary))
    } else {
        None
    };

    let file_stem = output_stem(args);
    let plot_kinds = args.plot_kinds();
    if !args.no_export || !plot_kinds.is_empty() {
        fs::create_dir_all(&args.output_dir).with_context(|| {
            format!("Failed to create output directory {}", args.output_dir.display())
        })?;
    }

    if !args.no_export {
        let files = OutputFiles::new(&args.output_dir, &file_stem);
        export::save_records(&records, &files.records)?;
        export::save_records(&records.with_timestamps(), &files.timestamped)?;
        export::save_analysis(&summary, &files.analysis)?;
        if let Some((subset, _)) = &filtered {
            export::save_records(subset, &files.filtered)?;
        }
    }

    if !plot_kinds.is_empty() {
        let plotted = filtered.as_ref().map_or(&records, |(subset, _)| subset);
        let renderers: Vec<Box<dyn MapRenderer>> = plot_kinds
            .into_iter()
            .map(|kind| {
                Box::new(GeoJsonRenderer::new(kind, &args.output_dir, &file_stem))
                    as Box<dyn MapRenderer>
            })
            .collect();
        let failed = render_all(plotted, &renderers)
            .iter()
            .filter(|outcome| outcome.result.is_err())
            .count();
        if failed > 0 {
            warn!(action = "complete", component = "render", failed, "Some plots could not be created");
        }
    }

    info!(
        action = "complete",
        component = "analysis",
        duration_ms = total_start_time.elapsed().as_millis(),
        "Analysis completed successfully"
    );

    Ok(AnalysisResult {
        records,
        dropped_records: extraction.failures.len(),
        summary,
        filtered,
    })
}

fn output_stem(args: &Args) -> String {
    let input_stem = args
        .input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "locations".to_string());
    format!(
        "{}_{}_{}",
        args.prefix,
        Utc::now().format("%Y%m%d%H%M%S"),
        input_stem
    )
}

fn print_summary(title: &str, summary: &SetSummary) {
    println!("\n--- {} ---", title);

    match &summary.date_range {
        Some(range) if range.days_between > 0 => println!(
            "Date range: {} to {} ({} days)",
            range.earliest.format("%d.%m.%Y"),
            range.latest.format("%d.%m.%Y"),
            format_number(range.days_between as usize)
        ),
        Some(range) => println!(
            "Date range: {} to {}",
            range.earliest.format("%d.%m.%Y"),
            range.latest.format("%d.%m.%Y")
        ),
        None => println!("Date range: no timestamps available"),
    }

    let report = &summary.report;
    println!("Total points: {}", format_number(report.total_points));
    println!("Duplicate points: {}", format_number(report.duplicate_points));
    println!("Unique points: {}", format_number(report.unique_points));
    println!(
        "Valid timestamps: {}, invalid timestamps: {}",
        format_number(summary.valid_timestamps),
        format_number(summary.invalid_timestamps)
    );

    print_table("Most visited locations", &report.most_visited);
    print_table("Least visited locations", &report.least_visited);
}

fn print_table(title: &str, table: &[VisitCount]) {
    println!("\n{} ({}):", title, table.len());
    for entry in table {
        println!(
            "- {:.6}, {:.6}: {} visits",
            entry.longitude,
            entry.latitude,
            format_number(entry.visits)
        );
    }
}

pub fn print_analysis_results(result: &AnalysisResult, args: &Args) {
    print_summary(&format!("{} Analysis", args.input.display()), &result.summary);
    if result.dropped_records > 0 {
        println!(
            "\nPlacemarks skipped (missing or invalid fields): {}",
            format_number(result.dropped_records)
        );
    }
    let fields = result.records.attribute_names();
    if !fields.is_empty() {
        let fields: Vec<&str> = fields.into_iter().collect();
        println!("Extended data fields: {}", fields.join(", "));
    }

    if let Some((_, summary)) = &result.filtered {
        print_summary("Filtered Analysis", summary);
    }
}
