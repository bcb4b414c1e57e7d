use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::records::RecordSet;

/// Size of the most and least visited tables.
pub const RANKING_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VisitCount {
    pub longitude: f64,
    pub latitude: f64,
    pub visits: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrequencyReport {
    pub total_points: usize,
    pub duplicate_points: usize,
    pub unique_points: usize,
    /// Highest counts, presented in ascending order.
    pub most_visited: Vec<VisitCount>,
    /// Lowest counts, ascending.
    pub least_visited: Vec<VisitCount>,
}

/// Earliest and latest timestamp with the whole days between them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DateRange {
    pub earliest: DateTime<Utc>,
    pub latest: DateTime<Utc>,
    pub days_between: i64,
}

impl DateRange {
    pub fn of(records: &RecordSet) -> Option<Self> {
        records
            .timestamp_bounds()
            .map(|(earliest, latest)| DateRange {
                earliest,
                latest,
                days_between: (latest - earliest).num_days(),
            })
    }
}

/// Statistics over one record set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetSummary {
    pub date_range: Option<DateRange>,
    pub valid_timestamps: usize,
    pub invalid_timestamps: usize,
    pub report: FrequencyReport,
}

impl SetSummary {
    pub fn of(records: &RecordSet) -> Self {
        SetSummary {
            date_range: DateRange::of(records),
            valid_timestamps: records.valid_timestamp_count(),
            invalid_timestamps: records.invalid_timestamp_count(),
            report: analyze(records),
        }
    }
}

#[derive(Debug)]
pub struct AnalysisResult {
    pub records: RecordSet,
    pub dropped_records: usize,
    pub summary: SetSummary,
    pub filtered: Option<(RecordSet, SetSummary)>,
}

pub fn analyze(records: &RecordSet) -> FrequencyReport {
    analyze_with_limit(records, RANKING_SIZE)
}

/// Group records by exact coordinate equality and rank the groups.
///
/// Groups are enumerated by ascending (longitude, latitude) and then
/// stable-sorted by visit count, so equal counts keep coordinate order.
pub fn analyze_with_limit(records: &RecordSet, limit: usize) -> FrequencyReport {
    let mut counts: HashMap<(u64, u64), usize> = HashMap::new();
    for record in records {
        *counts
            .entry((coordinate_key(record.longitude), coordinate_key(record.latitude)))
            .or_insert(0) += 1;
    }

    let mut groups: Vec<VisitCount> = counts
        .into_iter()
        .map(|((lon, lat), visits)| VisitCount {
            longitude: f64::from_bits(lon),
            latitude: f64::from_bits(lat),
            visits,
        })
        .collect();
    groups.sort_by(|a, b| {
        a.longitude
            .total_cmp(&b.longitude)
            .then(a.latitude.total_cmp(&b.latitude))
    });
    groups.sort_by_key(|g| g.visits);

    let total_points = records.len();
    let unique_points = groups.len();
    let least_visited = groups.iter().take(limit).copied().collect();
    let most_visited = groups[groups.len().saturating_sub(limit)..].to_vec();

    FrequencyReport {
        total_points,
        duplicate_points: total_points - unique_points,
        unique_points,
        most_visited,
        least_visited,
    }
}

// -0.0 == 0.0 under float equality, so both must land in one group.
fn coordinate_key(value: f64) -> u64 {
    if value == 0.0 {
        0.0f64.to_bits()
    } else {
        value.to_bits()
    }
}
