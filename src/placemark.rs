use chrono::{DateTime, Utc};
use scraper::Html;
use tracing::warn;

use crate::error::RecordError;
use crate::kml::Element;
use crate::records::LocationRecord;

/// Turn one placemark sub-tree into a record.
///
/// Name and coordinates are required; everything else falls back to absent.
pub fn extract_placemark(placemark: &Element) -> Result<LocationRecord, RecordError> {
    if let Some(reason) = placemark.malformed() {
        return Err(RecordError::Malformed(reason.to_string()));
    }

    let name = placemark
        .find("name")
        .map(|e| e.text.as_str())
        .filter(|text| !text.is_empty())
        .ok_or(RecordError::MissingName)?;

    let coordinates = placemark
        .find("coordinates")
        .ok_or(RecordError::MissingCoordinates)?;
    let (longitude, latitude) = parse_coordinates(&coordinates.text)?;

    let mut record = LocationRecord::new(name, longitude, latitude);

    record.timestamp = placemark
        .find("TimeStamp")
        .and_then(|stamp| stamp.child("when"))
        .and_then(|when| parse_timestamp(&when.text));

    record.description = placemark
        .find("description")
        .map(|e| clean_html(&e.text))
        .filter(|text| !text.trim().is_empty());

    for data in placemark.find_all("Data") {
        let Some(key) = data.attribute("name") else {
            warn!(
                action = "skip",
                component = "extended_data",
                placemark = name,
                "Data entry without a name attribute"
            );
            continue;
        };
        let value = data.child("value").map(|v| v.text.clone()).unwrap_or_default();
        record.attributes.insert(key.to_string(), value);
    }

    Ok(record)
}

/// Parse `longitude,latitude[,altitude]`.
pub fn parse_coordinates(text: &str) -> Result<(f64, f64), RecordError> {
    let invalid = |reason: &str| RecordError::InvalidCoordinates {
        text: text.to_string(),
        reason: reason.to_string(),
    };

    let mut parts = text.trim().split(',');
    let (Some(lon), Some(lat)) = (parts.next(), parts.next()) else {
        return Err(invalid("expected longitude,latitude"));
    };

    let parse = |part: &str| -> Result<f64, RecordError> {
        let value: f64 = part
            .trim()
            .parse()
            .map_err(|e: std::num::ParseFloatError| invalid(&e.to_string()))?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(invalid("value is not finite"))
        }
    };

    Ok((parse(lon)?, parse(lat)?))
}

/// Parse an ISO 8601 date-time carrying a zone designator into UTC.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    DateTime::parse_from_rfc3339(text)
        .or_else(|_| DateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// Keep only the text nodes of an HTML fragment.
pub fn clean_html(html: &str) -> String {
    Html::parse_fragment(html).root_element().text().collect()
}
