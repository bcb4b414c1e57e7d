use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::FilterError;

/// One extracted placemark.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationRecord {
    pub name: String,
    pub longitude: f64,
    pub latitude: f64,
    pub timestamp: Option<DateTime<Utc>>,
    pub description: Option<String>,
    /// Extended data, keyed by whatever names the source document uses.
    pub attributes: BTreeMap<String, String>,
}

impl LocationRecord {
    pub fn new(name: impl Into<String>, longitude: f64, latitude: f64) -> Self {
        Self {
            name: name.into(),
            longitude,
            latitude,
            timestamp: None,
            description: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn coordinates(&self) -> (f64, f64) {
        (self.longitude, self.latitude)
    }
}

/// The records of one extraction pass. Order carries no meaning.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSet {
    records: Vec<LocationRecord>,
    valid_timestamps: usize,
}

impl RecordSet {
    pub fn new(records: Vec<LocationRecord>) -> Self {
        let valid_timestamps = records.iter().filter(|r| r.timestamp.is_some()).count();
        Self {
            records,
            valid_timestamps,
        }
    }

    pub fn records(&self) -> &[LocationRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LocationRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn valid_timestamp_count(&self) -> usize {
        self.valid_timestamps
    }

    pub fn invalid_timestamp_count(&self) -> usize {
        self.records.len() - self.valid_timestamps
    }

    /// Earliest and latest timestamp present, if any record has one.
    pub fn timestamp_bounds(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let mut stamps = self.records.iter().filter_map(|r| r.timestamp);
        let first = stamps.next()?;
        Some(stamps.fold((first, first), |(min, max), ts| (min.min(ts), max.max(ts))))
    }

    /// Every distinct attribute name across the set, sorted.
    pub fn attribute_names(&self) -> BTreeSet<&str> {
        self.records
            .iter()
            .flat_map(|r| r.attributes.keys().map(String::as_str))
            .collect()
    }

    /// The records that carry a timestamp.
    pub fn with_timestamps(&self) -> RecordSet {
        self.records
            .iter()
            .filter(|r| r.timestamp.is_some())
            .cloned()
            .collect()
    }

    /// Records whose timestamp lies in `[start, end]`, both ends inclusive.
    ///
    /// A missing bound falls back to the earliest or latest timestamp in the
    /// set. Records without a timestamp never match.
    pub fn filter_by_date(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<RecordSet, FilterError> {
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(FilterError::InvertedRange { start, end });
            }
        }

        let Some((min, max)) = self.timestamp_bounds() else {
            return Ok(RecordSet::default());
        };
        let start = start.unwrap_or(min);
        let end = end.unwrap_or(max);
        // A lone bound can still land on the wrong side of the observed range.
        if start > end {
            return Err(FilterError::InvertedRange { start, end });
        }

        Ok(self
            .records
            .iter()
            .filter(|r| r.timestamp.is_some_and(|ts| start <= ts && ts <= end))
            .cloned()
            .collect())
    }
}

impl FromIterator<LocationRecord> for RecordSet {
    fn from_iter<I: IntoIterator<Item = LocationRecord>>(iter: I) -> Self {
        RecordSet::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a LocationRecord;
    type IntoIter = std::slice::Iter<'a, LocationRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
