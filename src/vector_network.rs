use crate::geometry_utils::{
    LatLng, LocalTangentPlane, chaikin_smooth, extract_sub_polyline_metric, nearest_vertex_index,
    project_point_to_polyline_metric, resample_by_arc_length,
};
use crate::normalize::{best_road_key, normalize_aggressive};
use ahash::AHashMap;
use compact_str::CompactString;
use geo_types::{Coord, LineString};
use geojson::{Feature, FeatureCollection, JsonObject};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info};

lazy_static! {
    static ref SPA_PAIR: Regex = Regex::new(r"(?i)SPA ?\d+/\d+").unwrap();
    static ref SPA_SINGLE: Regex = Regex::new(r"(?i)SPA ?\d+").unwrap();
    static ref SP_SINGLE: Regex = Regex::new(r"(?i)SP ?\d+").unwrap();
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineStyle {
    pub color: CompactString,
    pub weight: f64,
    pub opacity: f64,
}

impl LineStyle {
    pub fn network_default() -> Self {
        Self {
            color: "#1A73E8".into(),
            weight: 3.0,
            opacity: 1.0,
        }
    }

    pub fn highlighted() -> Self {
        Self {
            color: "#ff0000".into(),
            weight: 4.0,
            opacity: 1.0,
        }
    }

    pub fn dimmed() -> Self {
        Self {
            color: "#ffffff".into(),
            weight: 0.5,
            opacity: 0.06,
        }
    }
}

/// Short label of a network feature, e.g. `SPA 294/250` or `SP 270`.
pub fn short_name(full_name: &str) -> &str {
    let regexes: [&Regex; 2] = if full_name.to_ascii_uppercase().contains("SPA") {
        [&*SPA_PAIR, &*SPA_SINGLE]
    } else {
        [&*SP_SINGLE, &*SP_SINGLE]
    };

    regexes
        .into_iter()
        .find_map(|re| re.find(full_name))
        .map(|m| m.as_str())
        .unwrap_or(full_name)
}

#[derive(Debug, Clone)]
pub struct VectorFeature {
    pub name: String,
    pub short_name: String,
    pub geometries: Vec<LineString<f64>>,
    pub properties: JsonObject,
    pub default_style: LineStyle,
}

impl VectorFeature {
    pub fn from_geojson(feature: &Feature) -> Option<Self> {
        let geometries: Vec<LineString<f64>> = match &feature.geometry.as_ref()?.value {
            geojson::Value::LineString(positions) => vec![line_from_positions(positions)],
            geojson::Value::MultiLineString(lines) => {
                lines.iter().map(|l| line_from_positions(l)).collect()
            }
            _ => return None,
        };

        let properties = feature.properties.clone().unwrap_or_default();
        let name = properties
            .get("name")
            .and_then(|v| v.as_str())
            .map(|n| n.replace('_', " ").trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "Rodovia".to_string());

        Some(Self {
            short_name: short_name(&name).to_string(),
            name,
            geometries,
            properties,
            default_style: LineStyle::network_default(),
        })
    }

    pub fn vertex_count(&self) -> usize {
        self.geometries.iter().map(|g| g.0.len()).sum()
    }

    /// All vertices, multi-line parts concatenated in order.
    pub fn flattened(&self) -> Vec<LatLng> {
        self.geometries
            .iter()
            .flat_map(|g| g.0.iter().map(|&c| LatLng::from(c)))
            .collect()
    }
}

fn line_from_positions(positions: &[Vec<f64>]) -> LineString<f64> {
    positions
        .iter()
        .filter(|p| p.len() >= 2)
        .map(|p| Coord { x: p[0], y: p[1] })
        .collect::<Vec<_>>()
        .into()
}

/// Highway network features grouped by full road name.
#[derive(Debug, Default)]
pub struct VectorNetwork {
    features: Vec<VectorFeature>,
    by_name: AHashMap<String, Vec<usize>>,
}

impl VectorNetwork {
    pub fn from_feature_collection(collection: &FeatureCollection) -> Self {
        let mut network = VectorNetwork::default();
        let mut skipped = 0usize;

        for feature in &collection.features {
            match VectorFeature::from_geojson(feature) {
                Some(f) => network.push(f),
                None => skipped += 1,
            }
        }

        info!(
            "Loaded vector network: {} features, {} names, {} non-line features skipped",
            network.features.len(),
            network.by_name.len(),
            skipped
        );
        network
    }

    pub fn push(&mut self, feature: VectorFeature) {
        self.by_name
            .entry(feature.name.clone())
            .or_default()
            .push(self.features.len());
        self.features.push(feature);
    }

    pub fn features(&self) -> &[VectorFeature] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Name of the feature group matching `road`.
    pub fn find_name(&self, road: &str) -> Option<&str> {
        best_road_key(road, self.by_name.keys().map(|k| k.as_str())).map(|(name, _)| name)
    }

    /// The feature with the most vertices among those named like `road`.
    pub fn find_feature(&self, road: &str) -> Option<&VectorFeature> {
        let name = self.find_name(road)?;
        self.by_name
            .get(name)?
            .iter()
            .map(|&idx| &self.features[idx])
            .filter(|f| f.vertex_count() > 0)
            .fold(None, |best: Option<&VectorFeature>, f| match best {
                Some(b) if b.vertex_count() >= f.vertex_count() => Some(b),
                _ => Some(f),
            })
    }

    /// Display style per feature given the roads currently filtered for.
    pub fn layer_styles<I, S>(&self, active_roads: I) -> Vec<(&str, LineStyle)>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let active: Vec<String> = active_roads
            .into_iter()
            .map(|r| normalize_aggressive(r.as_ref()))
            .filter(|r| !r.is_empty())
            .collect();

        self.features
            .iter()
            .map(|feature| {
                if active.is_empty() {
                    return (feature.name.as_str(), feature.default_style.clone());
                }
                let key = normalize_aggressive(&feature.name);
                let style = if active
                    .iter()
                    .any(|ar| key.contains(ar.as_str()) || ar.contains(key.as_str()))
                {
                    LineStyle::highlighted()
                } else {
                    LineStyle::dimmed()
                };
                (feature.name.as_str(), style)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractMode {
    /// Cut between the projections of both ends onto the line.
    Slice,
    /// Nearest vertices to both ends, widened by a margin.
    VertexWindow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub window_margin: usize,
    pub densify_spacing_m: f64,
    pub max_samples: usize,
    pub smoothing_passes: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            window_margin: 6,
            densify_spacing_m: 20.0,
            max_samples: 3000,
            smoothing_passes: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VectorPath {
    pub feature_name: String,
    pub mode: ExtractMode,
    pub points: Vec<LatLng>,
}

pub struct NetworkPathExtractor<'a> {
    network: &'a VectorNetwork,
    config: ExtractorConfig,
}

impl<'a> NetworkPathExtractor<'a> {
    pub fn new(network: &'a VectorNetwork, config: ExtractorConfig) -> Self {
        Self { network, config }
    }

    /// Coarse cut of the network line between `start` and `end`, before
    /// densifying.
    pub fn cut(&self, road: &str, start: LatLng, end: LatLng) -> Option<VectorPath> {
        let Some(feature) = self.network.find_feature(road) else {
            debug!("No network feature for {}", road);
            return None;
        };
        let vertices = feature.flattened();

        let (mode, points) = match slice_between(&vertices, start, end) {
            Some(points) => (ExtractMode::Slice, points),
            None => (
                ExtractMode::VertexWindow,
                vertex_window(&vertices, start, end, self.config.window_margin),
            ),
        };

        if points.len() < 2 {
            return None;
        }

        debug!(
            "Cut {} from network feature {} by {:?}: {} points",
            road,
            feature.name,
            mode,
            points.len()
        );

        Some(VectorPath {
            feature_name: feature.name.clone(),
            mode,
            points,
        })
    }

    /// The network path between two positions on `road`, densified and smoothed.
    pub fn extract(&self, road: &str, start: LatLng, end: LatLng) -> Option<VectorPath> {
        let mut path = self.cut(road, start, end)?;
        let dense = resample_by_arc_length(
            &path.points,
            self.config.densify_spacing_m,
            self.config.max_samples,
        );
        path.points = chaikin_smooth(&dense, self.config.smoothing_passes);
        Some(path)
    }
}

fn slice_between(vertices: &[LatLng], start: LatLng, end: LatLng) -> Option<Vec<LatLng>> {
    if vertices.len() < 2 {
        return None;
    }

    let ltp = LocalTangentPlane::new(start);
    let metric: Vec<(f64, f64)> = vertices.iter().map(|&v| ltp.project(v)).collect();

    let (d_start, _, _) = project_point_to_polyline_metric(ltp.project(start), &metric)?;
    let (d_end, _, _) = project_point_to_polyline_metric(ltp.project(end), &metric)?;

    let mut cut = if d_start <= d_end {
        extract_sub_polyline_metric(&metric, d_start, d_end)
    } else {
        let mut reversed = extract_sub_polyline_metric(&metric, d_end, d_start);
        reversed.reverse();
        reversed
    };
    cut.dedup();

    if cut.len() < 2 {
        return None;
    }
    Some(cut.into_iter().map(|xy| ltp.unproject(xy)).collect())
}

fn vertex_window(vertices: &[LatLng], start: LatLng, end: LatLng, margin: usize) -> Vec<LatLng> {
    let (Some(i_start), Some(i_end)) = (
        nearest_vertex_index(vertices, start),
        nearest_vertex_index(vertices, end),
    ) else {
        return vec![];
    };

    let lo = i_start.min(i_end).saturating_sub(margin);
    let hi = (i_start.max(i_end) + margin).min(vertices.len() - 1);

    let mut window = vertices[lo..=hi].to_vec();
    if i_start > i_end {
        window.reverse();
    }
    window
}
