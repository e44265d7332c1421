use crate::geometry_utils::{LatLng, chaikin_smooth, dedup_consecutive, haversine_distance};
use crate::resolver::CoordinateSource;
use ahash::AHashMap;
use std::collections::VecDeque;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Width of the initial coarse segments.
    pub max_step_km: f64,
    /// Segments whose half-width is below this are never split.
    pub min_step_km: f64,
    /// Allowed gap between a segment's straight midpoint and the road's.
    pub tolerance_m: f64,
    /// Upper bound on lookups and on emitted points.
    pub max_points: usize,
    pub dedup_m: f64,
    pub smoothing_passes: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            max_step_km: 0.2,
            min_step_km: 0.01,
            tolerance_m: 8.0,
            max_points: 3000,
            dedup_m: 0.5,
            smoothing_passes: 1,
        }
    }
}

/// Kilometre lookups memoized at metre resolution.
struct MemoSource<'s, R: CoordinateSource> {
    source: &'s R,
    road: &'s str,
    cache: AHashMap<i64, Option<LatLng>>,
}

impl<R: CoordinateSource> MemoSource<'_, R> {
    fn get(&mut self, km: f64) -> Option<LatLng> {
        let key = (km * 1000.0).round() as i64;
        *self
            .cache
            .entry(key)
            .or_insert_with(|| self.source.resolve(self.road, km))
    }

    fn len(&self) -> usize {
        self.cache.len()
    }
}

fn round_to_metre(km: f64) -> f64 {
    (km * 1000.0).round() / 1000.0
}

/// Turns a kilometre range into a polyline by splitting only where the road bends.
pub struct AdaptivePathSampler<'a, R: CoordinateSource> {
    source: &'a R,
    config: SamplerConfig,
}

impl<'a, R: CoordinateSource> AdaptivePathSampler<'a, R> {
    pub fn new(source: &'a R, config: SamplerConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Most segments the work-list may hold so the smoothed output stays
    /// within `max_points`.
    fn segment_budget(&self) -> usize {
        let passes = self.config.smoothing_passes.min(usize::BITS as usize - 1);
        (self.config.max_points >> passes).saturating_sub(1).max(1)
    }

    pub fn sample(&self, road: &str, km_start: f64, km_end: f64) -> Vec<LatLng> {
        if !km_start.is_finite() || !km_end.is_finite() {
            return vec![];
        }

        let mut memo = MemoSource {
            source: self.source,
            road,
            cache: AHashMap::new(),
        };

        if km_end <= km_start {
            let ends: Vec<LatLng> = [memo.get(km_start), memo.get(km_end)]
                .into_iter()
                .flatten()
                .collect();
            return dedup_consecutive(&ends, self.config.dedup_m);
        }

        let budget = self.segment_budget();
        let length = km_end - km_start;
        let step = self
            .config
            .max_step_km
            .max(length / budget as f64)
            .max(0.001);

        let mut work: VecDeque<(f64, f64)> = VecDeque::new();
        let mut a = km_start;
        while a < km_end {
            let mut b = (a + step).min(km_end);
            if work.len() + 1 >= budget {
                b = km_end;
            }
            work.push_back((a, b));
            a = b;
        }

        let mut accepted: Vec<(f64, f64)> = Vec::new();

        while let Some((a, b)) = work.pop_front() {
            let (Some(pa), Some(pb)) = (memo.get(a), memo.get(b)) else {
                accepted.push((a, b));
                continue;
            };

            let within_budget =
                accepted.len() + work.len() + 2 <= budget && memo.len() < self.config.max_points;
            let mid = round_to_metre((a + b) / 2.0);
            let half_width = mid - a;

            if !within_budget || half_width < self.config.min_step_km || mid >= b {
                accepted.push((a, b));
                continue;
            }

            let Some(pm) = memo.get(mid) else {
                accepted.push((a, b));
                continue;
            };

            let deviation = haversine_distance(pa.midpoint(pb), pm);
            if deviation > self.config.tolerance_m {
                work.push_front((mid, b));
                work.push_front((a, mid));
            } else {
                accepted.push((a, b));
            }
        }

        accepted.sort_by(|x, y| x.0.total_cmp(&y.0));

        let mut points: Vec<LatLng> = accepted.iter().filter_map(|&(a, _)| memo.get(a)).collect();
        if let Some(end) = memo.get(km_end) {
            points.push(end);
        }

        let mut path = dedup_consecutive(&points, self.config.dedup_m);
        if path.len() >= 3 && self.config.smoothing_passes > 0 {
            path = dedup_consecutive(
                &chaikin_smooth(&path, self.config.smoothing_passes),
                self.config.dedup_m,
            );
        }

        debug!(
            "Sampled {} km {}..{}: {} segments, {} lookups, {} points",
            road,
            km_start,
            km_end,
            accepted.len(),
            memo.len(),
            path.len()
        );

        path
    }
}
