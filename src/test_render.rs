use crate::chainage::{ChainageIndex, ChainageTier};
use crate::config::RenderConfig;
use crate::geometry_utils::{LatLng, haversine_distance};
use crate::loader::{network_from_str, records_from_str};
use crate::record::{RawRecord, extract_field};
use crate::render::{PathSource, RenderPass, Renderer, RoadSegmentRequest};
use crate::resolver::{CoordinateResolver, CoordinateSource, ResolvedFrom};
use crate::segments::SegmentIndex;
use crate::vector_network::VectorNetwork;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};

const CHAINAGE_CSV: &str = "\
SP;KM;LOCALIZAÇÃO;MUNICÍPIO
SP270;10,0;-23.500000, -48.000000;Sorocaba
SP270;11,0;-23.510000, -48.010000;Sorocaba
";

const SEGMENTS_CSV: &str = "\
Rodovia;Km Inicial;Km Final;Lat e Long km Inicial;Lat e Long km final
SP 300;0;4;-23.51, -48.0;-23.49, -47.98
SP 310;0;10;-22.00, -47.00;-22.10, -47.10
SP 320;abc;10;-22.00, -47.00;-22.10, -47.10
";

// SP 300 runs north along lng -48.0, turns at (-23.49, -48.0) and heads east
const NETWORK_GEOJSON: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {
      "type": "Feature",
      "properties": { "name": "SP_300" },
      "geometry": {
        "type": "LineString",
        "coordinates": [[-48.0, -23.51], [-48.0, -23.50], [-48.0, -23.49], [-47.99, -23.49], [-47.98, -23.49]]
      }
    },
    {
      "type": "Feature",
      "properties": { "name": "Marco" },
      "geometry": { "type": "Point", "coordinates": [-48.0, -23.0] }
    }
  ]
}"#;

struct Fixture {
    chainage: ChainageIndex,
    segments: SegmentIndex,
    network: VectorNetwork,
    config: RenderConfig,
}

impl Fixture {
    fn new() -> Self {
        let chainage_rows = records_from_str(CHAINAGE_CSV).unwrap();
        let segment_rows = records_from_str(SEGMENTS_CSV).unwrap();
        let collection = network_from_str(NETWORK_GEOJSON, Path::new("network.geojson")).unwrap();

        Self {
            chainage: ChainageIndex::build(&chainage_rows),
            segments: SegmentIndex::build(&segment_rows),
            network: VectorNetwork::from_feature_collection(&collection),
            config: RenderConfig::default(),
        }
    }

    fn render(&self, requests: &[RoadSegmentRequest]) -> RenderPass {
        Renderer::new(&self.chainage, &self.segments, &self.network, &self.config).render(requests)
    }
}

/// Counts `WARN` events emitted while installed.
struct WarnCounter(Arc<AtomicUsize>);

impl<S: tracing::Subscriber> Layer<S> for WarnCounter {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == tracing::Level::WARN {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn request(road: &str, km_start: f64, km_final: f64) -> RoadSegmentRequest {
    RoadSegmentRequest {
        road: road.to_string(),
        km_start,
        km_final,
        color: "#0000FF".to_string(),
        weight: 3,
    }
}

#[test]
fn test_indices_from_sheets() {
    let fixture = Fixture::new();
    assert_eq!(fixture.chainage.record_count(), 2);
    assert_eq!(fixture.segments.segment_count(), 2);
    assert_eq!(fixture.network.len(), 1);
    assert_eq!(fixture.chainage.records("SP270")[0].municipality, "Sorocaba");
}

#[test]
fn test_midpoint_between_chainage_posts() {
    let fixture = Fixture::new();
    let resolver = CoordinateResolver::new(&fixture.chainage, &fixture.segments);

    let (coord, from) = resolver.resolve_with_source("SP270", 10.5).unwrap();
    assert_eq!(from, ResolvedFrom::Chainage(ChainageTier::Interpolated));
    assert!((coord.lat - -23.505).abs() < 1e-9);
    assert!((coord.lng - -48.005).abs() < 1e-9);

    assert_eq!(
        resolver.resolve("SP270", 10.0),
        Some(LatLng::new(-23.5, -48.0))
    );
}

#[test]
fn test_header_with_trailing_space() {
    let record: RawRecord = [("RODOVIAS ", "SP 270")].into_iter().collect();
    assert_eq!(extract_field(&record, &["RODOVIA", "Rodovia"]), Some("SP 270"));
}

#[test]
fn test_conflicting_km_keys_last_write_wins() {
    let rows = records_from_str(
        "SP;KM;LOCALIZAÇÃO\nSP270;10,0;-23.5, -48.0\nSP270;10;-23.6, -48.1\n",
    )
    .unwrap();
    let index = ChainageIndex::build(&rows);
    let hit = index.lookup("SP270", 10.0).unwrap();
    assert_eq!(hit.tier, ChainageTier::Exact);
    assert_eq!(hit.coordinate, LatLng::new(-23.6, -48.1));
}

#[test]
fn test_chainage_path() {
    let fixture = Fixture::new();
    let pass = fixture.render(&[request("SP270", 10.0, 11.0)]);
    let segment = &pass.segments[0];

    assert_eq!(segment.source, PathSource::Chainage);
    assert!(segment.path.len() >= 2);
    assert!(segment.path.len() <= fixture.config.sampler.max_points);
    assert!(haversine_distance(segment.path[0], LatLng::new(-23.5, -48.0)) < 0.01);
    assert!(
        haversine_distance(*segment.path.last().unwrap(), LatLng::new(-23.51, -48.01)) < 0.01
    );
    for pair in segment.path.windows(2) {
        assert!(haversine_distance(pair[0], pair[1]) > 0.5);
    }
}

#[test]
fn test_unknown_zero_length_request_degrades() {
    let fixture = Fixture::new();
    let pass = fixture.render(&[request("SP999-UNKNOWN", 5.0, 5.0)]);
    let segment = &pass.segments[0];

    assert_eq!(segment.source, PathSource::Placeholder);
    assert_eq!(segment.path.len(), 2);
    assert_eq!(segment.path[0], LatLng::new(-23.5, -46.6));
}

#[test]
fn test_network_slice_follows_bend() {
    let fixture = Fixture::new();
    let pass = fixture.render(&[request("SP 300", 0.0, 4.0)]);
    let segment = &pass.segments[0];

    assert_eq!(segment.source, PathSource::VectorNetwork);
    assert_eq!(segment.feature.as_deref(), Some("SP 300"));

    let corner = LatLng::new(-23.49, -48.0);
    let closest = segment
        .path
        .iter()
        .map(|p| haversine_distance(*p, corner))
        .fold(f64::INFINITY, f64::min);
    assert!(closest < 30.0, "{closest}");
}

#[test]
fn test_straight_line_without_network_feature() {
    let fixture = Fixture::new();
    let pass = fixture.render(&[request("SP 310", 0.0, 5.0)]);
    let segment = &pass.segments[0];

    assert_eq!(segment.source, PathSource::StraightLine);
    assert_eq!(segment.path.len(), 2);
    assert_eq!(segment.path[0], LatLng::new(-22.0, -47.0));
    assert!((segment.path[1].lat - -22.05).abs() < 1e-9);
}

#[test]
fn test_pass_output() {
    let fixture = Fixture::new();
    let pass = fixture.render(&[
        request("SP270", 10.0, 11.0),
        request("SP 300", 0.0, 4.0),
        request("SP999-UNKNOWN", 5.0, 5.0),
        request("SP-300", 1.0, 2.0),
    ]);

    assert_eq!(pass.segments.len(), 4);
    // placeholder offsets follow the request position
    let placeholder = pass.segments[2].path[0];
    assert!((placeholder.lat - -23.8).abs() < 1e-9);
    assert!((placeholder.lng - -46.2).abs() < 1e-9);

    let sp300 = &pass.visual_index["sp300"];
    assert_eq!(sp300.segments, vec![1, 3]);
    assert_eq!(sp300.features, vec!["SP 300".to_string()]);
    assert!(pass.visual_index["sp270"].features.is_empty());

    let collection = pass.to_feature_collection(fixture.config.path_opacity);
    assert_eq!(collection.features.len(), 4);
    let properties = collection.features[2].properties.as_ref().unwrap();
    assert_eq!(properties["source"], "placeholder");
    assert_eq!(properties["opacity"], 0.8);
    assert_eq!(properties["road"], "SP999-UNKNOWN");

    let styles = fixture.network.layer_styles(pass.roads());
    assert_eq!(styles.len(), 1);
    assert_eq!(styles[0].1.color.as_str(), "#ff0000");
}

#[test]
fn test_suffixed_road_reaches_chainage() {
    let fixture = Fixture::new();
    let resolver = CoordinateResolver::new(&fixture.chainage, &fixture.segments);

    for road in ["SP270 Vang", "SP 270 Raposo Tavares"] {
        let (coord, from) = resolver.resolve_with_source(road, 10.5).unwrap();
        assert_eq!(from, ResolvedFrom::Chainage(ChainageTier::Interpolated));
        assert!((coord.lat - -23.505).abs() < 1e-9);
    }

    let pass = fixture.render(&[request("SP270 Vang", 10.0, 11.0)]);
    assert_eq!(pass.segments[0].source, PathSource::Chainage);
    assert!(haversine_distance(pass.segments[0].path[0], LatLng::new(-23.5, -48.0)) < 0.01);
}

#[test]
fn test_degenerate_ranges_skip_network() {
    let fixture = Fixture::new();
    let pass = fixture.render(&[request("SP 300", 1.0, 1.0), request("SP 300", 3.0, 1.0)]);

    let zero = &pass.segments[0];
    assert_eq!(zero.source, PathSource::StraightLine);
    assert_eq!(zero.feature, None);
    assert_eq!(zero.path.len(), 2);
    assert_eq!(zero.path[0], zero.path[1]);
    assert!((zero.path[0].lat - -23.505).abs() < 1e-9);
    assert!((zero.path[0].lng - -47.995).abs() < 1e-9);

    let inverted = &pass.segments[1];
    assert_eq!(inverted.source, PathSource::StraightLine);
    assert_eq!(inverted.path.len(), 2);
    assert!((inverted.path[0].lat - -23.495).abs() < 1e-9);
    assert!((inverted.path[1].lat - -23.505).abs() < 1e-9);
}

#[test]
fn test_unknown_road_warns_once() {
    let fixture = Fixture::new();
    let warnings = Arc::new(AtomicUsize::new(0));
    let subscriber = tracing_subscriber::registry().with(WarnCounter(warnings.clone()));

    tracing::subscriber::with_default(subscriber, || {
        fixture.render(&[request("SP999-UNKNOWN", 5.0, 6.0)]);
    });

    assert_eq!(warnings.load(Ordering::SeqCst), 1);
}
