use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::records::RecordSet;
use crate::stats::{SetSummary, VisitCount};

const FIXED_COLUMNS: [&str; 5] = ["name", "longitude", "latitude", "timestamp", "description"];

/// One row per record: the fixed columns followed by every attribute name
/// seen anywhere in the set, null where a record lacks it.
pub fn record_rows(records: &RecordSet) -> Vec<Map<String, Value>> {
    let attribute_names = records.attribute_names();
    records
        .iter()
        .map(|record| {
            let mut row = Map::new();
            row.insert("name".into(), Value::from(record.name.as_str()));
            row.insert("longitude".into(), Value::from(record.longitude));
            row.insert("latitude".into(), Value::from(record.latitude));
            row.insert(
                "timestamp".into(),
                record
                    .timestamp
                    .map_or(Value::Null, |ts| Value::from(ts.to_rfc3339())),
            );
            row.insert(
                "description".into(),
                record
                    .description
                    .as_deref()
                    .map_or(Value::Null, Value::from),
            );
            for name in &attribute_names {
                // Fixed columns win over attributes that reuse their names.
                if FIXED_COLUMNS.contains(name) {
                    continue;
                }
                let value = record
                    .attributes
                    .get(*name)
                    .map_or(Value::Null, |v| Value::from(v.as_str()));
                row.insert((*name).to_string(), value);
            }
            row
        })
        .collect()
}

#[derive(Serialize)]
struct SummaryRow {
    total_points: usize,
    duplicate_points: usize,
    unique_points: usize,
    valid_timestamps: usize,
    invalid_timestamps: usize,
}

#[derive(Serialize)]
struct AnalysisDocument<'a> {
    summary: SummaryRow,
    top_10_most_visited: &'a [VisitCount],
    top_10_least_visited: &'a [VisitCount],
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    writer.flush()?;
    info!(action = "write", component = "export", file_path = ?path, "Data saved");
    Ok(())
}

pub fn save_records(records: &RecordSet, path: &Path) -> Result<()> {
    write_json(path, &record_rows(records))
}

pub fn save_analysis(summary: &SetSummary, path: &Path) -> Result<()> {
    let report = &summary.report;
    let document = AnalysisDocument {
        summary: SummaryRow {
            total_points: report.total_points,
            duplicate_points: report.duplicate_points,
            unique_points: report.unique_points,
            valid_timestamps: summary.valid_timestamps,
            invalid_timestamps: summary.invalid_timestamps,
        },
        top_10_most_visited: &report.most_visited,
        top_10_least_visited: &report.least_visited,
    };
    write_json(path, &document)
}

/// File paths for one run, all sharing `{prefix}_{stamp}_{input stem}`.
#[derive(Debug, Clone)]
pub struct OutputFiles {
    pub records: PathBuf,
    pub timestamped: PathBuf,
    pub analysis: PathBuf,
    pub filtered: PathBuf,
}

impl OutputFiles {
    pub fn new(output_dir: &Path, file_stem: &str) -> Self {
        let file = |suffix: &str| output_dir.join(format!("{file_stem}{suffix}.json"));
        Self {
            records: file(""),
            timestamped: file("_timestamps"),
            analysis: file("_analysis"),
            filtered: file("_filtered"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::LocationRecord;

    #[test]
    fn test_rows_flatten_attributes() {
        let records = RecordSet::new(vec![
            LocationRecord::new("a", 1.0, 2.0).with_attribute("speed", "3"),
            LocationRecord::new("b", 3.0, 4.0)
                .with_description("corner shop")
                .with_attribute("accuracy", "9")
                .with_attribute("name", "shadowed"),
        ]);
        let rows = record_rows(&records);
        assert_eq!(rows.len(), 2);

        let columns: Vec<&str> = rows[0].keys().map(String::as_str).collect();
        assert_eq!(
            columns,
            vec!["accuracy", "description", "latitude", "longitude", "name", "speed", "timestamp"]
        );
        assert_eq!(rows[0]["accuracy"], Value::Null);
        assert_eq!(rows[0]["speed"], Value::from("3"));
        assert_eq!(rows[0]["description"], Value::Null);
        assert_eq!(rows[1]["description"], Value::from("corner shop"));
        assert_eq!(rows[1]["name"], Value::from("b"));
        assert_eq!(rows[1]["speed"], Value::Null);
    }

    #[test]
    fn test_output_file_names() {
        let files = OutputFiles::new(Path::new("out"), "run_20240101000000_Locations");
        assert_eq!(files.records, Path::new("out/run_20240101000000_Locations.json"));
        assert_eq!(
            files.analysis,
            Path::new("out/run_20240101000000_Locations_analysis.json")
        );
    }

    #[test]
    fn test_save_analysis_writes_tables() {
        let records = RecordSet::new(vec![
            LocationRecord::new("a", 1.0, 2.0),
            LocationRecord::new("b", 1.0, 2.0),
        ]);
        let path = std::env::temp_dir()
            .join(format!("placemap-analysis-{}.json", std::process::id()));
        save_analysis(&SetSummary::of(&records), &path).unwrap();

        let written: Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["summary"]["duplicate_points"], Value::from(1));
        assert_eq!(written["top_10_most_visited"][0]["visits"], Value::from(2));
        std::fs::remove_file(&path).unwrap();
    }
}
