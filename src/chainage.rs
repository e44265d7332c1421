use crate::geometry_utils::LatLng;
use crate::normalize::{best_road_key, normalize, normalize_aggressive};
use crate::record::{RawRecord, extract_field, field_or_position, parse_decimal};
use ahash::AHashMap;
use compact_str::CompactString;
use ordered_float::OrderedFloat;
use std::collections::BTreeMap;
use tracing::{debug, info};

const ROAD_FIELDS: &[&str] = &["SP", "RODOVIA", "RODOVIAS", "ROD"];
const ROAD_COLUMN: usize = 1;
const KM_FIELDS: &[&str] = &["KM", "KM_INICIAL", "KM INICIAL"];
const KM_COLUMN: usize = 2;
const LOCATION_FIELDS: &[&str] = &["LOCALIZAÇÃO", "LOCALIZACAO", "LOCALIZA", "LOCAL", "LOCATION"];
const LAT_FIELDS: &[&str] = &["LAT", "LATITUDE"];
const LNG_FIELDS: &[&str] = &["LNG", "LON", "LONG", "LONGITUDE"];
const MUNICIPALITY_FIELDS: &[&str] = &["MUNICIPIO", "MUNICÍPIO", "CIDADE"];

/// A surveyed point on a road: kilometre post plus its position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainageRecord {
    pub road: CompactString,
    pub km: f64,
    pub raw_km: String,
    /// `"lat, lng"` as written in the sheet.
    pub location: String,
    pub municipality: String,
}

impl ChainageRecord {
    pub fn coordinate(&self) -> Option<LatLng> {
        LatLng::parse(&self.location)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChainageTier {
    Exact,
    Rounded,
    Interpolated,
    Nearest,
}

#[derive(Debug, Clone, Copy)]
pub struct ChainageHit<'a> {
    pub tier: ChainageTier,
    pub coordinate: LatLng,
    /// The record that answered, `None` for interpolated hits.
    pub record: Option<&'a ChainageRecord>,
}

#[derive(Debug, Default)]
struct RoadChainage {
    records: Vec<ChainageRecord>,
    by_key: AHashMap<String, usize>,
    by_km: BTreeMap<OrderedFloat<f64>, usize>,
}

impl RoadChainage {
    fn insert(&mut self, record: ChainageRecord) {
        let idx = self.records.len();

        let canonical = km_key(record.km);
        let raw_dot = record.raw_km.replacen(',', ".", 1);
        for key in [
            canonical.replacen('.', ",", 1),
            canonical,
            raw_dot.replacen('.', ",", 1),
            raw_dot,
        ] {
            self.by_key.insert(key, idx);
        }
        self.by_km.insert(OrderedFloat(record.km), idx);
        self.records.push(record);
    }

    fn record_for(&self, km: f64) -> Option<&ChainageRecord> {
        let key = km_key(km);
        self.by_key
            .get(&key)
            .or_else(|| self.by_key.get(&key.replacen('.', ",", 1)))
            .map(|&idx| &self.records[idx])
    }

    fn hit(&self, km: f64, tier: ChainageTier) -> Option<ChainageHit<'_>> {
        let record = self.record_for(km)?;
        Some(ChainageHit {
            tier,
            coordinate: record.coordinate()?,
            record: Some(record),
        })
    }

    fn located(&self, idx: usize) -> Option<(&ChainageRecord, LatLng)> {
        let record = &self.records[idx];
        record.coordinate().map(|c| (record, c))
    }

    fn interpolate(&self, km: f64) -> Option<ChainageHit<'_>> {
        let (lower, lower_coord) = self
            .by_km
            .range(..=OrderedFloat(km))
            .rev()
            .find_map(|(_, &idx)| self.located(idx))?;
        let (upper, upper_coord) = self
            .by_km
            .range(OrderedFloat(km)..)
            .find_map(|(_, &idx)| self.located(idx))?;

        if lower.km == upper.km {
            return None;
        }

        let t = (km - lower.km) / (upper.km - lower.km);
        Some(ChainageHit {
            tier: ChainageTier::Interpolated,
            coordinate: lower_coord.lerp(upper_coord, t),
            record: None,
        })
    }

    fn nearest(&self, km: f64) -> Option<ChainageHit<'_>> {
        self.by_km
            .iter()
            .filter_map(|(k, &idx)| self.located(idx).map(|found| (k.0, found)))
            .min_by(|a, b| (a.0 - km).abs().total_cmp(&(b.0 - km).abs()))
            .map(|(_, (record, coordinate))| ChainageHit {
                tier: ChainageTier::Nearest,
                coordinate,
                record: Some(record),
            })
    }
}

/// Canonical text form of a kilometre, `10.0` is `"10"`.
fn km_key(km: f64) -> String {
    let km = if km == 0.0 { 0.0 } else { km };
    format!("{km}")
}

/// Road → kilometre → position, built from the official chainage sheet.
#[derive(Debug, Default)]
pub struct ChainageIndex {
    roads: AHashMap<CompactString, RoadChainage>,
}

impl ChainageIndex {
    pub fn build<'a, I>(rows: I) -> Self
    where
        I: IntoIterator<Item = &'a RawRecord>,
    {
        let mut index = ChainageIndex::default();
        let mut skipped = 0usize;

        for (row_idx, row) in rows.into_iter().enumerate() {
            match Self::record_from_row(row) {
                Some(record) => index.insert(record),
                None => {
                    skipped += 1;
                    debug!("Skipping chainage row {} without road or km", row_idx + 2);
                }
            }
        }

        info!(
            "Built chainage index: {} roads, {} records, {} rows skipped",
            index.roads.len(),
            index.record_count(),
            skipped
        );

        index
    }

    fn record_from_row(row: &RawRecord) -> Option<ChainageRecord> {
        let road = normalize(field_or_position(row, ROAD_FIELDS, ROAD_COLUMN)?);
        if road.is_empty() {
            return None;
        }

        let raw_km = field_or_position(row, KM_FIELDS, KM_COLUMN)?;
        let km = parse_decimal(raw_km)?;

        let location = match extract_field(row, LOCATION_FIELDS).filter(|v| !v.is_empty()) {
            Some(location) => location.to_string(),
            None => {
                let lat = extract_field(row, LAT_FIELDS).unwrap_or_default();
                let lng = extract_field(row, LNG_FIELDS).unwrap_or_default();
                if lat.contains(',') || lng.contains(',') {
                    format!("{lat}; {lng}")
                } else {
                    format!("{lat}, {lng}")
                }
            }
        };

        Some(ChainageRecord {
            road: CompactString::from(road),
            km,
            raw_km: raw_km.to_string(),
            location,
            municipality: extract_field(row, MUNICIPALITY_FIELDS)
                .unwrap_or_default()
                .to_string(),
        })
    }

    pub fn insert(&mut self, record: ChainageRecord) {
        self.roads
            .entry(record.road.clone())
            .or_default()
            .insert(record);
    }

    /// The indexed road key for `road`: normalized equality first, then
    /// equality once punctuation and spacing are dropped, then the ranked
    /// containment and route-number match.
    pub fn resolve_road(&self, road: &str) -> Option<&str> {
        let wanted = normalize(road);
        if let Some((key, _)) = self.roads.get_key_value(wanted.as_str()) {
            return Some(key.as_str());
        }

        let aggressive = normalize_aggressive(road);
        if aggressive.is_empty() {
            return None;
        }
        let equal = self
            .roads
            .keys()
            .filter(|key| normalize_aggressive(key) == aggressive)
            .min()
            .map(|key| key.as_str());

        equal.or_else(|| {
            best_road_key(road, self.roads.keys().map(|k| k.as_str())).map(|(key, _)| key)
        })
    }

    /// Position of `km` on `road`, trying exact, one-decimal, interpolated and
    /// nearest kilometres in that order.
    pub fn lookup(&self, road: &str, km: f64) -> Option<ChainageHit<'_>> {
        if !km.is_finite() {
            return None;
        }

        let key = self.resolve_road(road)?;
        let chainage = self.roads.get(key)?;

        chainage
            .hit(km, ChainageTier::Exact)
            .or_else(|| chainage.hit((km * 10.0).round() / 10.0, ChainageTier::Rounded))
            .or_else(|| chainage.interpolate(km))
            .or_else(|| chainage.nearest(km))
    }

    pub fn contains_road(&self, road: &str) -> bool {
        self.resolve_road(road).is_some()
    }

    pub fn records(&self, road: &str) -> &[ChainageRecord] {
        self.resolve_road(road)
            .and_then(|key| self.roads.get(key))
            .map(|c| c.records.as_slice())
            .unwrap_or_default()
    }

    pub fn roads(&self) -> impl Iterator<Item = &str> {
        self.roads.keys().map(|k| k.as_str())
    }

    pub fn record_count(&self) -> usize {
        self.roads.values().map(|c| c.records.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.roads.is_empty()
    }
}
