//! Map output for a record set.
//!
//! Rendering backends sit behind [`MapRenderer`]. The bundled
//! [`GeoJsonRenderer`] writes one GeoJSON FeatureCollection per plot kind,
//! ready for any map viewer.

use clap::ValueEnum;
use rayon::prelude::*;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info};

use crate::error::RenderError;
use crate::records::{LocationRecord, RecordSet};
use crate::stats::{analyze_with_limit, VisitCount};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum PlotKind {
    Scatter,
    Heatmap,
    Lines,
    CircleMarkers,
    Polygon,
}

impl PlotKind {
    pub const ALL: [PlotKind; 5] = [
        PlotKind::Scatter,
        PlotKind::Heatmap,
        PlotKind::Lines,
        PlotKind::CircleMarkers,
        PlotKind::Polygon,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            PlotKind::Scatter => "scatter_plot",
            PlotKind::Heatmap => "heatmap",
            PlotKind::Lines => "lines_plot",
            PlotKind::CircleMarkers => "circle_markers",
            PlotKind::Polygon => "polygon",
        }
    }
}

/// Something that turns a read-only record set into one output file.
pub trait MapRenderer: Send + Sync {
    fn name(&self) -> &str;

    fn render(&self, records: &RecordSet) -> Result<PathBuf, RenderError>;
}

#[derive(Debug)]
pub struct RenderOutcome {
    pub renderer: String,
    pub result: Result<PathBuf, RenderError>,
}

/// Run every renderer over the same records in parallel.
///
/// A failing renderer is logged and reported in its own outcome; the others
/// still run to completion.
pub fn render_all(
    records: &RecordSet,
    renderers: &[Box<dyn MapRenderer>],
) -> Vec<RenderOutcome> {
    let start_time = Instant::now();
    let outcomes: Vec<RenderOutcome> = renderers
        .par_iter()
        .map(|renderer| RenderOutcome {
            renderer: renderer.name().to_string(),
            result: renderer.render(records),
        })
        .collect();

    for outcome in &outcomes {
        match &outcome.result {
            Ok(path) => {
                info!(action = "write", component = "render", renderer = %outcome.renderer, file_path = ?path, "Plot saved")
            }
            Err(e) => {
                error!(action = "write", component = "render", renderer = %outcome.renderer, error = %e, "Error creating plot")
            }
        }
    }
    info!(
        action = "complete",
        component = "render",
        plot_count = outcomes.len(),
        duration_ms = start_time.elapsed().as_millis(),
        "Rendering completed"
    );

    outcomes
}

pub struct GeoJsonRenderer {
    kind: PlotKind,
    path: PathBuf,
    name: String,
}

impl GeoJsonRenderer {
    /// Writes to `{output_dir}/{file_stem}_{kind}.geojson`.
    pub fn new(kind: PlotKind, output_dir: &Path, file_stem: &str) -> Self {
        let name = kind.slug().to_string();
        let path = output_dir.join(format!("{file_stem}_{name}.geojson"));
        Self { kind, path, name }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn feature_collection(&self, records: &RecordSet) -> Value {
        let features: Vec<Value> = match self.kind {
            PlotKind::Scatter => records.iter().map(point_feature).collect(),
            PlotKind::Heatmap => {
                let groups = coordinate_groups(records);
                let peak = groups.iter().map(|g| g.visits).max().unwrap_or(1) as f64;
                groups
                    .iter()
                    .map(|g| group_feature(g, json!({ "weight": g.visits as f64 / peak })))
                    .collect()
            }
            PlotKind::CircleMarkers => coordinate_groups(records)
                .iter()
                .map(|g| group_feature(g, json!({ "radius": (g.visits as f64).sqrt() })))
                .collect(),
            PlotKind::Lines => {
                let track = chronological(records.iter().collect());
                vec![line_feature("track", &track)]
            }
            PlotKind::Polygon => {
                let mut by_name: BTreeMap<&str, Vec<&LocationRecord>> = BTreeMap::new();
                for record in records {
                    by_name.entry(record.name.as_str()).or_default().push(record);
                }
                by_name
                    .into_iter()
                    .map(|(name, group)| line_feature(name, &chronological(group)))
                    .collect()
            }
        };

        json!({ "type": "FeatureCollection", "features": features })
    }
}

impl MapRenderer for GeoJsonRenderer {
    fn name(&self) -> &str {
        &self.name
    }

    fn render(&self, records: &RecordSet) -> Result<PathBuf, RenderError> {
        let io_error = |source| RenderError::Io {
            path: self.path.clone(),
            source,
        };
        let mut writer = BufWriter::new(File::create(&self.path).map_err(io_error)?);
        serde_json::to_writer(&mut writer, &self.feature_collection(records))?;
        writer.flush().map_err(io_error)?;
        Ok(self.path.clone())
    }
}

fn coordinate_groups(records: &RecordSet) -> Vec<VisitCount> {
    analyze_with_limit(records, usize::MAX).least_visited
}

fn chronological(mut records: Vec<&LocationRecord>) -> Vec<&LocationRecord> {
    records.sort_by_key(|r| r.timestamp);
    records
}

fn point_feature(record: &LocationRecord) -> Value {
    json!({
        "type": "Feature",
        "geometry": { "type": "Point", "coordinates": [record.longitude, record.latitude] },
        "properties": {
            "name": record.name,
            "timestamp": record.timestamp,
            "description": record.description,
            "attributes": record.attributes,
        },
    })
}

fn group_feature(group: &VisitCount, mut properties: Value) -> Value {
    properties["visits"] = json!(group.visits);
    json!({
        "type": "Feature",
        "geometry": { "type": "Point", "coordinates": [group.longitude, group.latitude] },
        "properties": properties,
    })
}

fn line_feature(name: &str, records: &[&LocationRecord]) -> Value {
    let coordinates: Vec<[f64; 2]> = records.iter().map(|r| [r.longitude, r.latitude]).collect();
    json!({
        "type": "Feature",
        "geometry": { "type": "LineString", "coordinates": coordinates },
        "properties": { "name": name, "points": coordinates.len() },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn records() -> RecordSet {
        let at = |h| Utc.with_ymd_and_hms(2024, 6, 1, h, 0, 0).unwrap();
        RecordSet::new(vec![
            LocationRecord::new("home", 1.0, 1.0).with_timestamp(at(9)),
            LocationRecord::new("work", 2.0, 2.0).with_timestamp(at(8)),
            LocationRecord::new("home", 1.0, 1.0).with_timestamp(at(7)),
        ])
    }

    fn features(kind: PlotKind) -> Vec<Value> {
        let renderer = GeoJsonRenderer::new(kind, Path::new("."), "test");
        renderer.feature_collection(&records())["features"]
            .as_array()
            .unwrap()
            .clone()
    }

    #[test]
    fn test_scatter_has_one_point_per_record() {
        assert_eq!(features(PlotKind::Scatter).len(), 3);
    }

    #[test]
    fn test_heatmap_weights_groups() {
        let heat = features(PlotKind::Heatmap);
        assert_eq!(heat.len(), 2);
        assert_eq!(heat[0]["properties"]["weight"], json!(0.5));
        assert_eq!(heat[1]["properties"]["visits"], json!(2));
        assert_eq!(heat[1]["properties"]["weight"], json!(1.0));
    }

    #[test]
    fn test_lines_follow_time() {
        let lines = features(PlotKind::Lines);
        assert_eq!(
            lines[0]["geometry"]["coordinates"],
            json!([[1.0, 1.0], [2.0, 2.0], [1.0, 1.0]])
        );
    }

    #[test]
    fn test_polygon_groups_by_name() {
        let paths = features(PlotKind::Polygon);
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0]["properties"]["name"], json!("home"));
        assert_eq!(paths[0]["properties"]["points"], json!(2));
    }

    struct Failing;

    impl MapRenderer for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn render(&self, _records: &RecordSet) -> Result<PathBuf, RenderError> {
            Err(RenderError::Io {
                path: PathBuf::from("nowhere"),
                source: std::io::Error::other("disk full"),
            })
        }
    }

    #[test]
    fn test_render_all_isolates_failures() {
        let dir = std::env::temp_dir().join(format!("placemap-render-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let scatter = GeoJsonRenderer::new(PlotKind::Scatter, &dir, "ok");
        let expected = scatter.path().to_path_buf();
        assert_eq!(expected, dir.join("ok_scatter_plot.geojson"));
        let renderers: Vec<Box<dyn MapRenderer>> = vec![Box::new(Failing), Box::new(scatter)];

        let outcomes = render_all(&records(), &renderers);
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].result.is_err());
        let written = outcomes[1].result.as_ref().unwrap();
        assert_eq!(written, &expected);
        assert!(written.exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
