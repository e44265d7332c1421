use crate::chainage::ChainageIndex;
use crate::config::{PlaceholderConfig, RenderConfig};
use crate::geometry_utils::LatLng;
use crate::normalize::normalize_aggressive;
use crate::record::{RawRecord, extract_field, field_or_position, parse_decimal};
use crate::resolver::{CoordinateResolver, CoordinateSource};
use crate::sampler::AdaptivePathSampler;
use crate::segments::SegmentIndex;
use crate::vector_network::{NetworkPathExtractor, VectorNetwork};
use geojson::{Feature, FeatureCollection, Geometry};
use serde_json::{Map, Value as JsonValue};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

const DEFAULT_COLOR: &str = "#0000FF";
const DEFAULT_WEIGHT: u32 = 3;

/// One row of the "lines per stretch" sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadSegmentRequest {
    pub road: String,
    pub km_start: f64,
    pub km_final: f64,
    pub color: String,
    pub weight: u32,
}

impl RoadSegmentRequest {
    pub fn from_record(record: &RawRecord, row_index: usize) -> Self {
        let road = extract_field(record, &["RODOVIAS", "RODOVIA", "rodovia"])
            .filter(|r| !r.is_empty())
            .map(|r| r.to_string())
            .unwrap_or_else(|| format!("Rodovia {}", row_index + 1));

        let km = |candidates: &[&str]| {
            extract_field(record, candidates)
                .and_then(parse_decimal)
                .unwrap_or(0.0)
        };

        let color = extract_field(record, &["COR", "cor", "cor_hex", "COR_HEX"])
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_COLOR)
            .to_string();

        let weight = extract_field(record, &["ESPESSURA", "espessura"])
            .and_then(parse_decimal)
            .map(|w| w.trunc())
            .filter(|w| *w >= 1.0)
            .map(|w| w as u32)
            .unwrap_or(DEFAULT_WEIGHT);

        Self {
            road,
            km_start: km(&["KM_INICIAL", "KM INICIAL", "km_inicial"]),
            km_final: km(&["KM_FINAL", "KM FINAL", "km_final"]),
            color,
            weight,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathSource {
    Chainage,
    VectorNetwork,
    StraightLine,
    Placeholder,
}

impl PathSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PathSource::Chainage => "chainage",
            PathSource::VectorNetwork => "vector_network",
            PathSource::StraightLine => "straight_line",
            PathSource::Placeholder => "placeholder",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderedSegment {
    pub request: RoadSegmentRequest,
    pub path: Vec<LatLng>,
    pub source: PathSource,
    /// Network feature the path was cut from.
    pub feature: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisualEntry {
    pub segments: Vec<usize>,
    pub features: Vec<String>,
}

/// Normalized road → positions in [`RenderPass::segments`] and matched network features.
pub type VisualIndex = BTreeMap<String, VisualEntry>;

#[derive(Debug, Clone, Default)]
pub struct RenderPass {
    pub segments: Vec<RenderedSegment>,
    pub visual_index: VisualIndex,
}

impl RenderPass {
    pub fn count_by_source(&self, source: PathSource) -> usize {
        self.segments.iter().filter(|s| s.source == source).count()
    }

    /// Roads of this pass, as written in the requests.
    pub fn roads(&self) -> BTreeSet<&str> {
        self.segments
            .iter()
            .map(|s| s.request.road.as_str())
            .collect()
    }

    pub fn to_feature_collection(&self, opacity: f64) -> FeatureCollection {
        let features = self
            .segments
            .iter()
            .map(|segment| {
                let positions: Vec<Vec<f64>> = segment
                    .path
                    .iter()
                    .map(|p| vec![p.lng, p.lat])
                    .collect();

                let mut properties = Map::new();
                let request = &segment.request;
                properties.insert("road".to_string(), JsonValue::from(request.road.clone()));
                properties.insert("km_start".to_string(), JsonValue::from(request.km_start));
                properties.insert("km_final".to_string(), JsonValue::from(request.km_final));
                properties.insert("color".to_string(), JsonValue::from(request.color.clone()));
                properties.insert("weight".to_string(), JsonValue::from(request.weight));
                properties.insert("opacity".to_string(), JsonValue::from(opacity));
                properties.insert(
                    "source".to_string(),
                    JsonValue::from(segment.source.as_str()),
                );
                if let Some(feature) = &segment.feature {
                    properties.insert("feature".to_string(), JsonValue::from(feature.clone()));
                }

                Feature {
                    bbox: None,
                    geometry: Some(Geometry::new(geojson::Value::LineString(positions))),
                    id: None,
                    properties: Some(properties),
                    foreign_members: None,
                }
            })
            .collect();

        FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        }
    }
}

/// Straight two-point path drawn for request `index` when nothing resolves.
pub fn placeholder_path(config: &PlaceholderConfig, index: usize) -> Vec<LatLng> {
    let i = index as f64;
    let base = LatLng::new(
        config.origin_lat + config.lat_step * i,
        config.origin_lng + config.lng_step * i,
    );
    vec![
        base,
        LatLng::new(base.lat + config.offset_lat, base.lng + config.offset_lng),
    ]
}

/// Resolves request rows into drawable paths, degrading through the
/// chainage sampler, the vector network, a straight line and a placeholder.
pub struct Renderer<'a> {
    chainage: &'a ChainageIndex,
    resolver: CoordinateResolver<'a>,
    network: &'a VectorNetwork,
    config: &'a RenderConfig,
}

impl<'a> Renderer<'a> {
    pub fn new(
        chainage: &'a ChainageIndex,
        segments: &'a SegmentIndex,
        network: &'a VectorNetwork,
        config: &'a RenderConfig,
    ) -> Self {
        Self {
            chainage,
            resolver: CoordinateResolver::new(chainage, segments),
            network,
            config,
        }
    }

    pub fn render_one(&self, index: usize, request: &RoadSegmentRequest) -> RenderedSegment {
        let road = request.road.as_str();

        if self.chainage.contains_road(road) {
            let sampler = AdaptivePathSampler::new(&self.resolver, self.config.sampler.clone());
            let path = sampler.sample(road, request.km_start, request.km_final);
            if path.len() >= 2 {
                return RenderedSegment {
                    request: request.clone(),
                    path,
                    source: PathSource::Chainage,
                    feature: None,
                };
            }
        } else {
            debug!("{} is not in the chainage sheet", road);
        }

        let start = self.resolver.resolve(road, request.km_start);
        let end = self.resolver.resolve(road, request.km_final);

        // zero-length and inverted ranges never widen into a network cut
        if request.km_final <= request.km_start
            && let Some(point) = start.or(end)
        {
            debug!(
                "Degenerate range for {} km {}-{}",
                road, request.km_start, request.km_final
            );
            return RenderedSegment {
                request: request.clone(),
                path: vec![point, end.unwrap_or(point)],
                source: PathSource::StraightLine,
                feature: None,
            };
        }

        if let (Some(start), Some(end)) = (start, end) {
            let extractor = NetworkPathExtractor::new(self.network, self.config.extractor.clone());
            if let Some(cut) = extractor.extract(road, start, end)
                && cut.points.len() >= 2
            {
                return RenderedSegment {
                    request: request.clone(),
                    path: cut.points,
                    source: PathSource::VectorNetwork,
                    feature: Some(cut.feature_name),
                };
            }

            debug!("Straight line for {} km {}", road, request.km_start);
            return RenderedSegment {
                request: request.clone(),
                path: vec![start, end],
                source: PathSource::StraightLine,
                feature: None,
            };
        }

        warn!(
            "Placeholder path for {} km {}-{}",
            road, request.km_start, request.km_final
        );
        RenderedSegment {
            request: request.clone(),
            path: placeholder_path(&self.config.placeholder, index),
            source: PathSource::Placeholder,
            feature: None,
        }
    }

    pub fn render(&self, requests: &[RoadSegmentRequest]) -> RenderPass {
        let mut pass = RenderPass::default();

        for (index, request) in requests.iter().enumerate() {
            let segment = self.render_one(index, request);

            let key = normalize_aggressive(&request.road);
            let entry = pass.visual_index.entry(key).or_insert_with(|| VisualEntry {
                segments: vec![],
                features: self
                    .network
                    .find_name(&request.road)
                    .map(|name| vec![name.to_string()])
                    .unwrap_or_default(),
            });
            entry.segments.push(pass.segments.len());
            pass.segments.push(segment);
        }

        info!(
            "Rendered {} requests: {} chainage, {} network, {} straight, {} placeholder",
            pass.segments.len(),
            pass.count_by_source(PathSource::Chainage),
            pass.count_by_source(PathSource::VectorNetwork),
            pass.count_by_source(PathSource::StraightLine),
            pass.count_by_source(PathSource::Placeholder)
        );

        pass
    }
}

/// Exact-value filter over the request sheet; empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestFilter {
    pub road: Option<String>,
    pub company: Option<String>,
    pub period: Option<String>,
}

impl RequestFilter {
    pub fn is_empty(&self) -> bool {
        [&self.road, &self.company, &self.period]
            .iter()
            .all(|f| f.as_deref().is_none_or(str::is_empty))
    }

    pub fn matches(&self, record: &RawRecord) -> bool {
        let check = |wanted: &Option<String>, candidates: &[&str]| match wanted.as_deref() {
            None | Some("") => true,
            Some(wanted) => extract_field(record, candidates) == Some(wanted),
        };

        check(&self.road, &["RODOVIA", "Rodovia", "SP"])
            && check(&self.company, &["EMPRESA", "Empresa", "CONCESSIONARIA"])
            && check(&self.period, &["PERIODO", "Período", "Periodo"])
    }

    pub fn apply<'r>(&self, records: &'r [RawRecord]) -> Vec<&'r RawRecord> {
        records.iter().filter(|r| self.matches(r)).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistinctValues {
    pub roads: BTreeSet<String>,
    pub companies: BTreeSet<String>,
    pub periods: BTreeSet<String>,
}

/// Sorted distinct road, company and period values of a request sheet.
/// Columns A, F and G are used when no header matches.
pub fn distinct_values<'a, I>(records: I) -> DistinctValues
where
    I: IntoIterator<Item = &'a RawRecord>,
{
    let mut values = DistinctValues::default();

    for record in records {
        if let Some(road) =
            field_or_position(record, &["RODOVIAS", "RODOVIA", "Rodovias", "Rodovia", "SP"], 0)
        {
            values.roads.insert(road.to_string());
        }
        if let Some(period) =
            field_or_position(record, &["PERIODO", "PERÍODO", "Período", "Periodo"], 5)
        {
            values.periods.insert(period.to_string());
        }
        if let Some(company) = field_or_position(
            record,
            &["EMPRESA", "Empresa", "CONCESSIONARIA", "CONCESSIONÁRIA"],
            6,
        ) {
            values.companies.insert(company.to_string());
        }
    }

    values
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> RawRecord {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_request_defaults() {
        let r = RoadSegmentRequest::from_record(&record(&[("OBS", "x")]), 4);
        assert_eq!(r.road, "Rodovia 5");
        assert_eq!(r.km_start, 0.0);
        assert_eq!(r.km_final, 0.0);
        assert_eq!(r.color, "#0000FF");
        assert_eq!(r.weight, 3);
    }

    #[test]
    fn test_request_fields() {
        let r = RoadSegmentRequest::from_record(
            &record(&[
                ("RODOVIAS ", "SP 270"),
                ("KM_INICIAL", "10,5"),
                ("KM_FINAL", "12"),
                ("cor_hex", "#00ff00"),
                ("ESPESSURA", "5"),
            ]),
            0,
        );
        assert_eq!(r.road, "SP 270");
        assert_eq!(r.km_start, 10.5);
        assert_eq!(r.km_final, 12.0);
        assert_eq!(r.color, "#00ff00");
        assert_eq!(r.weight, 5);
    }

    #[test]
    fn test_placeholder_offsets() {
        let config = PlaceholderConfig::default();
        let p = placeholder_path(&config, 2);
        assert!((p[0].lat - -23.8).abs() < 1e-9);
        assert!((p[0].lng - -46.2).abs() < 1e-9);
        assert!((p[1].lat - -23.85).abs() < 1e-9);
        assert!((p[1].lng - -46.1).abs() < 1e-9);
    }

    #[test]
    fn test_filter() {
        let rows = vec![
            record(&[("RODOVIA", "SP 270"), ("EMPRESA", "Vang"), ("PERIODO", "Diurno")]),
            record(&[("RODOVIA", "SP 280"), ("EMPRESA", "Jon"), ("PERIODO", "Noturno")]),
        ];
        assert!(RequestFilter::default().is_empty());
        assert_eq!(RequestFilter::default().apply(&rows).len(), 2);

        let filter = RequestFilter {
            road: Some("SP 280".into()),
            company: Some(String::new()),
            period: None,
        };
        assert!(!filter.is_empty());
        let kept = filter.apply(&rows);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].get("EMPRESA"), Some("Jon"));
    }

    #[test]
    fn test_distinct_values_positional() {
        let rows = vec![
            record(&[
                ("A", "SP 270"),
                ("B", ""),
                ("C", ""),
                ("D", ""),
                ("E", ""),
                ("F", "Diurno"),
                ("G", "Vang"),
            ]),
            record(&[("RODOVIA", "SP 280"), ("EMPRESA", "Jon"), ("PERIODO", "Noturno")]),
            record(&[("RODOVIA", "SP 270"), ("EMPRESA", "Jon"), ("PERIODO", "Noturno")]),
        ];
        let values = distinct_values(&rows);
        assert_eq!(
            values.roads.into_iter().collect::<Vec<_>>(),
            vec!["SP 270", "SP 280"]
        );
        assert_eq!(values.companies.len(), 2);
        assert_eq!(values.periods.len(), 2);
    }
}
