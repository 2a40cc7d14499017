//! Layered path maps.
//!
//! One standalone Leaflet document per map kind. Each year in the data gets
//! its own togglable overlay holding one polyline per activity with a path.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::Serialize;

use crate::config::MapSettings;
use crate::error::{Result, SyncError};
use crate::metrics::DerivedRecord;
use crate::{Bounds, GpsPoint};

/// Google polyline precision used by the provider.
const POLYLINE_PRECISION: u32 = 5;

/// The maps produced by a render run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapKind {
    Walks,
    Rides,
}

impl MapKind {
    pub const ALL: [MapKind; 2] = [MapKind::Walks, MapKind::Rides];

    /// Activity `type` value rendered on this map.
    pub fn activity_type(&self) -> &'static str {
        match self {
            MapKind::Walks => "Walk",
            MapKind::Rides => "Ride",
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            MapKind::Walks => "walks.html",
            MapKind::Rides => "rides.html",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            MapKind::Walks => "Walks",
            MapKind::Rides => "Rides",
        }
    }
}

/// Line and canvas styling.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapStyle {
    #[serde(skip)]
    pub width: u32,
    #[serde(skip)]
    pub height: u32,
    pub weight: f64,
    pub opacity: f64,
    pub smooth_factor: f64,
}

impl Default for MapStyle {
    fn default() -> Self {
        Self {
            width: 1800,
            height: 1500,
            weight: 6.0,
            opacity: 0.7,
            smooth_factor: 2.0,
        }
    }
}

/// All paths for one year of one activity type.
#[derive(Debug, Clone, PartialEq)]
pub struct YearLayer {
    pub year: i32,
    pub paths: Vec<Vec<GpsPoint>>,
}

/// Decode a Google-encoded polyline into (latitude, longitude) points.
pub fn decode_path(encoded: &str) -> Result<Vec<GpsPoint>> {
    let line: geo::LineString<f64> = polyline::decode_polyline(encoded, POLYLINE_PRECISION)
        .map_err(|e| SyncError::Render {
            message: format!("invalid polyline: {}", e),
        })?;
    Ok(line.coords().map(|c| GpsPoint::new(c.y, c.x)).collect())
}

/// Group records of `activity_type` by year, ascending, decoding each path.
///
/// Every year with a record of this type gets a layer, even if none of its
/// records has a path. `no_data`, missing and undecodable polylines add nothing.
pub fn build_layers(records: &[DerivedRecord<'_>], activity_type: &str) -> Vec<YearLayer> {
    let mut by_year: BTreeMap<i32, Vec<Vec<GpsPoint>>> = BTreeMap::new();

    for derived in records.iter().filter(|d| d.activity_type() == activity_type) {
        let Some(year) = derived.year() else {
            debug!(
                "[Render] Activity {} has no parseable local date, skipping",
                derived.record.id()
            );
            continue;
        };
        let paths = by_year.entry(year).or_default();

        if !derived.record.has_path() {
            continue;
        }
        let Some(encoded) = derived.record.map_polyline.as_deref() else {
            continue;
        };
        match decode_path(encoded) {
            Ok(points) if points.len() >= 2 => paths.push(points),
            Ok(_) => debug!(
                "[Render] Activity {} path has fewer than 2 points",
                derived.record.id()
            ),
            Err(e) => warn!("[Render] Activity {}: {}", derived.record.id(), e),
        }
    }

    by_year
        .into_iter()
        .map(|(year, paths)| YearLayer { year, paths })
        .collect()
}

// ============================================================================
// HTML Output
// ============================================================================

#[derive(Serialize)]
struct ViewJson {
    center: Option<[f64; 2]>,
    zoom: u8,
    bounds: Option<[[f64; 2]; 2]>,
}

#[derive(Serialize)]
struct LayerJson {
    name: String,
    paths: Vec<Vec<[f64; 2]>>,
}

/// Produce the standalone HTML document for one map.
pub fn render_html(
    kind: MapKind,
    layers: &[YearLayer],
    settings: &MapSettings,
    style: &MapStyle,
) -> Result<String> {
    let bounds = if settings.center.is_none() {
        Bounds::from_points(layers.iter().flat_map(|l| l.paths.iter().flatten().copied()))
            .map(|b| b.corners())
    } else {
        None
    };
    let view = ViewJson {
        center: settings.center.map(|c| c.lat_lng()),
        zoom: settings.zoom,
        bounds,
    };
    let layers_json: Vec<LayerJson> = layers
        .iter()
        .map(|l| LayerJson {
            name: l.year.to_string(),
            paths: l
                .paths
                .iter()
                .map(|p| p.iter().map(GpsPoint::lat_lng).collect())
                .collect(),
        })
        .collect();

    Ok(MAP_TEMPLATE
        .replace("{{TITLE}}", kind.title())
        .replace("{{WIDTH}}", &style.width.to_string())
        .replace("{{HEIGHT}}", &style.height.to_string())
        .replace("{{VIEW}}", &script_json(&view)?)
        .replace("{{STYLE}}", &script_json(style)?)
        .replace("{{LAYERS}}", &script_json(&layers_json)?))
}

/// JSON safe to inline in a `<script>` block.
fn script_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map(|s| s.replace("</", "<\\/"))
        .map_err(|e| SyncError::Render {
            message: format!("could not encode map data: {}", e),
        })
}

/// Renders and writes the walk and ride maps.
pub struct MapRenderer {
    settings: MapSettings,
    style: MapStyle,
}

impl MapRenderer {
    pub fn new(settings: MapSettings) -> Self {
        Self {
            settings,
            style: MapStyle::default(),
        }
    }

    pub fn with_style(mut self, style: MapStyle) -> Self {
        self.style = style;
        self
    }

    pub fn render(&self, records: &[DerivedRecord<'_>], kind: MapKind) -> Result<String> {
        let layers = build_layers(records, kind.activity_type());
        render_html(kind, &layers, &self.settings, &self.style)
    }

    /// Write every map kind into `out_dir`. Returns the written paths.
    pub fn write_maps(&self, records: &[DerivedRecord<'_>], out_dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(out_dir).map_err(|e| SyncError::Render {
            message: format!("could not create {}: {}", out_dir.display(), e),
        })?;

        let mut written = Vec::with_capacity(MapKind::ALL.len());
        for kind in MapKind::ALL {
            let layers = build_layers(records, kind.activity_type());
            let path_count: usize = layers.iter().map(|l| l.paths.len()).sum();
            let html = render_html(kind, &layers, &self.settings, &self.style)?;

            let path = out_dir.join(kind.file_name());
            fs::write(&path, html).map_err(|e| SyncError::Render {
                message: format!("could not write {}: {}", path.display(), e),
            })?;
            info!(
                "[Render] Wrote {} ({} layers, {} paths)",
                path.display(),
                layers.len(),
                path_count
            );
            written.push(path);
        }
        Ok(written)
    }
}

const MAP_TEMPLATE: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <title>{{TITLE}}</title>
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <link rel="stylesheet" href="https://cdnjs.cloudflare.com/ajax/libs/leaflet/1.9.4/leaflet.css" crossorigin="anonymous" />
  <script src="https://cdnjs.cloudflare.com/ajax/libs/leaflet/1.9.4/leaflet.js" crossorigin="anonymous"></script>
  <style>
    html, body { margin: 0; padding: 0; }
    #map { width: {{WIDTH}}px; height: {{HEIGHT}}px; }
  </style>
</head>
<body>
  <div id="map"></div>
  <script>
    const view = {{VIEW}};
    const style = {{STYLE}};
    const layers = {{LAYERS}};

    const map = L.map('map');
    L.tileLayer('https://tile.openstreetmap.org/{z}/{x}/{y}.png', {
      maxZoom: 19,
      attribution: '&copy; OpenStreetMap contributors'
    }).addTo(map);

    const overlays = {};
    for (const layer of layers) {
      const group = L.featureGroup();
      for (const path of layer.paths) {
        L.polyline(path, style).addTo(group);
      }
      group.addTo(map);
      overlays[layer.name] = group;
    }
    L.control.layers(null, overlays, { collapsed: false }).addTo(map);

    if (view.center) {
      map.setView(view.center, view.zoom);
    } else if (view.bounds) {
      map.fitBounds(view.bounds);
    } else {
      map.setView([0, 0], 2);
    }
  </script>
</body>
</html>
"#;
