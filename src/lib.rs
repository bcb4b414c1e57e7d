pub mod analysis;
pub mod args;
pub mod error;
pub mod export;
pub mod extract;
pub mod kml;
pub mod placemark;
pub mod records;
pub mod render;
pub mod stats;
pub mod utils;

pub use args::Args;
pub use error::{ExtractError, FilterError, RecordError, RenderError};
pub use extract::{extract_from_reader, extract_records, Extraction, RecordFailure};
pub use records::{LocationRecord, RecordSet};
pub use stats::{analyze, AnalysisResult, FrequencyReport, VisitCount};
