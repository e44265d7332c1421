use crate::chainage::{ChainageIndex, ChainageTier};
use crate::geometry_utils::LatLng;
use crate::segments::SegmentIndex;

/// Anything that can place a kilometre of a road on the map.
pub trait CoordinateSource {
    fn resolve(&self, road: &str, km: f64) -> Option<LatLng>;
}

impl<F> CoordinateSource for F
where
    F: Fn(&str, f64) -> Option<LatLng>,
{
    fn resolve(&self, road: &str, km: f64) -> Option<LatLng> {
        self(road, km)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedFrom {
    Chainage(ChainageTier),
    Segment,
}

/// Chainage sheet first, linear segments second.
#[derive(Debug, Clone, Copy)]
pub struct CoordinateResolver<'a> {
    pub chainage: &'a ChainageIndex,
    pub segments: &'a SegmentIndex,
}

impl<'a> CoordinateResolver<'a> {
    pub fn new(chainage: &'a ChainageIndex, segments: &'a SegmentIndex) -> Self {
        Self { chainage, segments }
    }

    pub fn resolve_with_source(&self, road: &str, km: f64) -> Option<(LatLng, ResolvedFrom)> {
        if let Some(hit) = self.chainage.lookup(road, km) {
            return Some((hit.coordinate, ResolvedFrom::Chainage(hit.tier)));
        }

        self.segments
            .resolve(road, km)
            .map(|coord| (coord, ResolvedFrom::Segment))
    }

    /// Whether either index knows the road at all.
    pub fn knows_road(&self, road: &str) -> bool {
        self.chainage.contains_road(road) || self.segments.resolve_road(road).is_some()
    }
}

impl CoordinateSource for CoordinateResolver<'_> {
    fn resolve(&self, road: &str, km: f64) -> Option<LatLng> {
        self.resolve_with_source(road, km).map(|(coord, _)| coord)
    }
}
