use rayon::prelude::*;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::time::Instant;
use tracing::{error, info};

use crate::error::{ExtractError, RecordError};
use crate::kml::PlacemarkReader;
use crate::placemark::extract_placemark;
use crate::records::{LocationRecord, RecordSet};

/// A placemark that could not be turned into a record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordFailure {
    /// Zero-based position of the placemark in the document.
    pub index: usize,
    pub error: RecordError,
}

/// Everything one extraction run produces.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub records: RecordSet,
    pub failures: Vec<RecordFailure>,
}

pub fn default_workers() -> usize {
    std::cmp::min(num_cpus::get(), 8)
}

/// Extract every placemark of the KML file at `path`.
pub fn extract_records(
    path: &Path,
    max_workers: Option<usize>,
) -> Result<Extraction, ExtractError> {
    let file = File::open(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => ExtractError::NotFound {
            path: path.to_path_buf(),
        },
        _ => ExtractError::Io {
            path: path.to_path_buf(),
            source,
        },
    })?;

    info!(action = "open", component = "record_extraction", file_path = ?path, "Opened KML file");
    extract_from_reader(BufReader::new(file), max_workers)
}

/// Extract every placemark from an already opened KML source.
///
/// Placemarks are streamed off `source` and converted on a dedicated pool of
/// `max_workers` threads (`min(cpus, 8)` by default).
pub fn extract_from_reader<R>(
    source: R,
    max_workers: Option<usize>,
) -> Result<Extraction, ExtractError>
where
    R: BufRead + Send,
{
    let start_time = Instant::now();
    let max_workers = max_workers.unwrap_or_else(default_workers);
    info!(
        action = "configure",
        component = "record_extraction",
        worker_count = max_workers,
        "Using workers for processing"
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(max_workers)
        .build()?;

    // Each sub-tree is moved into its task and dropped once converted.
    let outcomes: Vec<(usize, Result<LocationRecord, RecordError>)> = pool.install(|| {
        PlacemarkReader::new(source)
            .enumerate()
            .par_bridge()
            .map(|(index, placemark)| {
                placemark.map(|element| (index, extract_placemark(&element)))
            })
            .collect::<Result<Vec<_>, ExtractError>>()
    })?;

    let mut records = Vec::with_capacity(outcomes.len());
    let mut failures = Vec::new();
    for (index, outcome) in outcomes {
        match outcome {
            Ok(record) => records.push(record),
            Err(error) => {
                error!(
                    action = "drop",
                    component = "record_extraction",
                    placemark_index = index,
                    error = %error,
                    "Error parsing placemark"
                );
                failures.push(RecordFailure { index, error });
            }
        }
    }

    let records = RecordSet::new(records);
    info!(
        action = "complete",
        component = "record_extraction",
        placemarks = records.len(),
        dropped = failures.len(),
        valid_timestamps = records.valid_timestamp_count(),
        invalid_timestamps = records.invalid_timestamp_count(),
        duration_ms = start_time.elapsed().as_millis(),
        "KML file parsed"
    );

    Ok(Extraction { records, failures })
}
