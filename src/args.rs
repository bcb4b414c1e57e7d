use chrono::{DateTime, NaiveDate, Utc};
use clap::Parser;
use std::path::PathBuf;

use crate::render::PlotKind;

#[derive(Parser, Debug)]
#[command(
    name = "placemap",
    about = "Extract placemarks from a KML location export and report visit frequencies",
    version,
    long_about = None
)]
pub struct Args {
    /// KML file to analyze
    #[arg(default_value = "Locations.kml")]
    pub input: PathBuf,

    /// Number of worker threads
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Keep only records at or after this date (DD.MM.YYYY, YYYY-MM-DD or RFC 3339)
    #[arg(long, value_parser = parse_date_bound)]
    pub start: Option<DateTime<Utc>>,

    /// Keep only records at or before this date (DD.MM.YYYY, YYYY-MM-DD or RFC 3339)
    #[arg(long, value_parser = parse_date_bound)]
    pub end: Option<DateTime<Utc>>,

    /// Directory for exported data and plots
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Prefix for output file names
    #[arg(short, long, default_value = "output")]
    pub prefix: String,

    /// Plot types to generate
    #[arg(long, value_enum, value_delimiter = ',')]
    pub plot: Vec<PlotKind>,

    /// Generate every plot type
    #[arg(long)]
    pub all_plots: bool,

    /// Skip writing the JSON data and analysis files
    #[arg(long)]
    pub no_export: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn plot_kinds(&self) -> Vec<PlotKind> {
        if self.all_plots {
            return PlotKind::ALL.to_vec();
        }
        let mut kinds = Vec::new();
        for kind in &self.plot {
            if !kinds.contains(kind) {
                kinds.push(*kind);
            }
        }
        kinds
    }

    pub fn has_date_filter(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }
}

/// Parse a date bound. Plain dates mean midnight UTC.
pub fn parse_date_bound(value: &str) -> Result<DateTime<Utc>, String> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%d.%m.%Y")
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y-%m-%d"))
        .map(|date| date.and_time(chrono::NaiveTime::MIN).and_utc())
        .map_err(|_| {
            format!("invalid date '{value}', expected DD.MM.YYYY, YYYY-MM-DD or RFC 3339")
        })
}
