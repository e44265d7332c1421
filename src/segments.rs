use crate::geometry_utils::LatLng;
use crate::normalize::{best_road_key, normalize_aggressive};
use crate::record::{RawRecord, extract_field, parse_decimal};
use ahash::AHashMap;
use compact_str::CompactString;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

lazy_static! {
    // maintenance contractor names appended to road names in request sheets
    static ref OPERATOR_SUFFIX: Regex =
        Regex::new(r" (?:Vang|Jon|Madri|Obragen|Ellenco|Vale)").unwrap();
}

/// A road stretch with known positions at both ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearSegment {
    pub road: CompactString,
    pub km_start: f64,
    pub km_end: f64,
    pub coord_start: LatLng,
    pub coord_final: LatLng,
}

impl LinearSegment {
    pub fn contains(&self, km: f64) -> bool {
        self.km_start <= km && km <= self.km_end
    }

    fn midpoint_km(&self) -> f64 {
        (self.km_start + self.km_end) / 2.0
    }

    /// Position at `km` by progress along the stretch.
    pub fn interpolate(&self, km: f64) -> LatLng {
        let span = self.km_end - self.km_start;
        if span <= 0.0 {
            return self.coord_start;
        }
        let progress = ((km - self.km_start) / span).clamp(0.0, 1.0);
        self.coord_start.lerp(self.coord_final, progress)
    }
}

/// Road → kilometre-sorted stretches, the coarse fallback behind the chainage sheet.
#[derive(Debug, Default)]
pub struct SegmentIndex {
    roads: AHashMap<CompactString, Vec<LinearSegment>>,
}

impl SegmentIndex {
    pub fn build<'a, I>(rows: I) -> Self
    where
        I: IntoIterator<Item = &'a RawRecord>,
    {
        let mut roads: AHashMap<CompactString, Vec<LinearSegment>> = AHashMap::new();

        for (row_idx, row) in rows.into_iter().enumerate() {
            let line = row_idx + 2;
            match Self::segment_from_row(row) {
                Ok(segment) => roads.entry(segment.road.clone()).or_default().push(segment),
                Err(reason) => warn!("Invalid segment on line {}: {}", line, reason),
            }
        }

        for segments in roads.values_mut() {
            segments.sort_by(|a, b| a.km_start.total_cmp(&b.km_start));
        }

        let index = SegmentIndex { roads };
        info!(
            "Built segment index: {} roads, {} segments",
            index.roads.len(),
            index.segment_count()
        );
        index
    }

    fn segment_from_row(row: &RawRecord) -> Result<LinearSegment, String> {
        let road = extract_field(row, &["Rodovia", "RODOVIA"])
            .filter(|v| !v.is_empty())
            .ok_or("missing road")?;

        let km_start = extract_field(row, &["Km Inicial", "KM_INICIAL"])
            .and_then(parse_decimal)
            .ok_or_else(|| format!("{road}: bad start km"))?;
        let km_end = extract_field(row, &["Km Final", "KM_FINAL"])
            .and_then(parse_decimal)
            .ok_or_else(|| format!("{road}: bad final km"))?;

        let coord_start = extract_field(row, &["Lat e Long km Inicial"])
            .and_then(LatLng::parse)
            .ok_or_else(|| format!("{road}: bad start coordinate"))?;
        let coord_final = extract_field(row, &["Lat e Long km final"])
            .and_then(LatLng::parse)
            .ok_or_else(|| format!("{road}: bad final coordinate"))?;

        let segment = if km_end < km_start {
            LinearSegment {
                road: road.into(),
                km_start: km_end,
                km_end: km_start,
                coord_start: coord_final,
                coord_final: coord_start,
            }
        } else {
            LinearSegment {
                road: road.into(),
                km_start,
                km_end,
                coord_start,
                coord_final,
            }
        };

        Ok(segment)
    }

    pub fn insert(&mut self, segment: LinearSegment) {
        let segments = self.roads.entry(segment.road.clone()).or_default();
        let pos = segments.partition_point(|s| s.km_start <= segment.km_start);
        segments.insert(pos, segment);
    }

    /// Finds the indexed key for a road name as written in a request sheet.
    /// Misses are silent; the render pass logs the road once.
    pub fn resolve_road(&self, road: &str) -> Option<&str> {
        let trimmed = road.trim();
        if let Some((key, _)) = self.roads.get_key_value(trimmed) {
            return Some(key.as_str());
        }

        let cleaned = OPERATOR_SUFFIX.replace_all(trimmed, "");
        let cleaned = cleaned.trim();
        if cleaned.is_empty() {
            return None;
        }
        if let Some((key, _)) = self.roads.get_key_value(cleaned) {
            return Some(key.as_str());
        }

        let mut keys: Vec<&str> = self.roads.keys().map(|k| k.as_str()).collect();
        keys.sort_unstable();

        let contained = keys.iter().copied().find(|key| {
            if key.contains(cleaned) {
                return true;
            }
            let mut words = key.split(' ');
            match (words.next(), words.next()) {
                (Some(first), Some(second)) => cleaned.contains(&format!("{first} {second}")),
                _ => false,
            }
        });

        contained.or_else(|| best_road_key(cleaned, keys).map(|(key, _)| key))
    }

    /// Position of `km` on `road` by interpolating inside the stretch that
    /// contains it, or the closest stretch end otherwise.
    pub fn resolve(&self, road: &str, km: f64) -> Option<LatLng> {
        if !km.is_finite() {
            return None;
        }
        let segments = self.roads.get(self.resolve_road(road)?)?;

        let containing = segments
            .iter()
            .filter(|s| s.contains(km))
            .min_by(|a, b| {
                (a.midpoint_km() - km)
                    .abs()
                    .total_cmp(&(b.midpoint_km() - km).abs())
            });
        if let Some(segment) = containing {
            return Some(segment.interpolate(km));
        }

        segments
            .iter()
            .flat_map(|s| [(s.km_start, s.coord_start), (s.km_end, s.coord_final)])
            .min_by(|a, b| (a.0 - km).abs().total_cmp(&(b.0 - km).abs()))
            .map(|(_, coord)| coord)
    }

    /// The lowest-kilometre stretch of a road.
    pub fn first_segment(&self, road: &str) -> Option<&LinearSegment> {
        self.resolve_road(road)
            .and_then(|key| self.roads.get(key))
            .and_then(|segments| segments.first())
    }

    /// Road key whose alphanumeric form equals a vector feature name.
    pub fn road_for_feature(&self, feature_name: &str) -> Option<&str> {
        let wanted = normalize_aggressive(feature_name);
        if wanted.is_empty() {
            return None;
        }
        self.roads
            .keys()
            .filter(|key| normalize_aggressive(key) == wanted)
            .min()
            .map(|key| key.as_str())
    }

    pub fn segments(&self, road: &str) -> &[LinearSegment] {
        self.resolve_road(road)
            .and_then(|key| self.roads.get(key))
            .map(|s| s.as_slice())
            .unwrap_or_default()
    }

    pub fn roads(&self) -> impl Iterator<Item = &str> {
        self.roads.keys().map(|k| k.as_str())
    }

    pub fn segment_count(&self) -> usize {
        self.roads.values().map(|s| s.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.roads.is_empty()
    }
}
