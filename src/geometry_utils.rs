use geo::{Coord, Distance, Haversine, Point};
use itertools::Itertools;

/// A WGS84 position as the spreadsheets write it: latitude first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Parses a textual `"lat, lng"` pair such as `"-23.415050, -48.043810"`.
    ///
    /// A `;` separated pair is also accepted, in which case each half may use
    /// a decimal comma (`"-23,41; -48,04"`).
    pub fn parse(text: &str) -> Option<Self> {
        let (lat, lng) = match text.split_once(';') {
            Some((lat, lng)) => (lat.replacen(',', ".", 1), lng.replacen(',', ".", 1)),
            None => {
                let mut parts = text.split(',');
                let lat = parts.next()?.to_string();
                let lng = parts.next()?.to_string();
                if parts.next().is_some() {
                    return None;
                }
                (lat, lng)
            }
        };

        let lat: f64 = lat.trim().parse().ok()?;
        let lng: f64 = lng.trim().parse().ok()?;

        if lat.is_finite() && lng.is_finite() {
            Some(Self { lat, lng })
        } else {
            None
        }
    }

    /// Linear interpolation in degree space, `t = 0` is `self`.
    pub fn lerp(self, other: LatLng, t: f64) -> LatLng {
        LatLng {
            lat: self.lat + (other.lat - self.lat) * t,
            lng: self.lng + (other.lng - self.lng) * t,
        }
    }

    pub fn midpoint(self, other: LatLng) -> LatLng {
        LatLng {
            lat: (self.lat + other.lat) / 2.0,
            lng: (self.lng + other.lng) / 2.0,
        }
    }
}

impl From<LatLng> for Coord<f64> {
    fn from(value: LatLng) -> Self {
        Coord {
            x: value.lng,
            y: value.lat,
        }
    }
}

impl From<Coord<f64>> for LatLng {
    fn from(value: Coord<f64>) -> Self {
        LatLng {
            lat: value.y,
            lng: value.x,
        }
    }
}

impl From<LatLng> for Point<f64> {
    fn from(value: LatLng) -> Self {
        Point::new(value.lng, value.lat)
    }
}

/// Great-circle distance in metres.
pub fn haversine_distance(a: LatLng, b: LatLng) -> f64 {
    Haversine.distance(Point::from(a), Point::from(b))
}

// --- Metric Projection Helper (Local Tangent Plane) ---

/// A Local Tangent Plane projection centered at a specific position.
/// Equirectangular approximation, good enough for the few kilometres a road
/// section spans.
/// x = R * cos(lat0) * dlon
/// y = R * dlat
#[derive(Debug, Clone, Copy)]
pub struct LocalTangentPlane {
    origin_lon_rad: f64,
    origin_lat_rad: f64,
    cos_lat0: f64,
    radius: f64,
}

impl LocalTangentPlane {
    const EARTH_RADIUS: f64 = 6_371_007.2;

    pub fn new(origin: LatLng) -> Self {
        let origin_lon_rad = origin.lng.to_radians();
        let origin_lat_rad = origin.lat.to_radians();
        Self {
            origin_lon_rad,
            origin_lat_rad,
            cos_lat0: origin_lat_rad.cos(),
            radius: Self::EARTH_RADIUS,
        }
    }

    /// Project to (x, y) meters
    pub fn project(&self, position: LatLng) -> (f64, f64) {
        let dlon = position.lng.to_radians() - self.origin_lon_rad;
        let dlat = position.lat.to_radians() - self.origin_lat_rad;
        let x = self.radius * self.cos_lat0 * dlon;
        let y = self.radius * dlat;
        (x, y)
    }

    /// Unproject (x, y) meters
    pub fn unproject(&self, (x, y): (f64, f64)) -> LatLng {
        let dlon = x / (self.radius * self.cos_lat0);
        let dlat = y / self.radius;
        LatLng {
            lat: (self.origin_lat_rad + dlat).to_degrees(),
            lng: (self.origin_lon_rad + dlon).to_degrees(),
        }
    }
}

// --- Metric Geometry Functions (XY Space) ---

fn distance_metric(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((b.0 - a.0).powi(2) + (b.1 - a.1).powi(2)).sqrt()
}

/// Calculate Euclidean length of a polyline in metric space (x, y).
pub fn polyline_length_metric(coords: &[(f64, f64)]) -> f64 {
    coords
        .iter()
        .tuple_windows()
        .map(|(a, b)| distance_metric(*a, *b))
        .sum()
}

/// Project point to polyline in metric space.
/// Returns (distance_along_polyline, distance_from_polyline, projected_point).
pub fn project_point_to_polyline_metric(
    point: (f64, f64),
    coords: &[(f64, f64)],
) -> Option<(f64, f64, (f64, f64))> {
    if coords.len() < 2 {
        return coords
            .first()
            .map(|&only| (0.0, distance_metric(point, only), only));
    }

    let mut best: Option<(f64, f64, (f64, f64))> = None;
    let mut walked = 0.0;

    for (&a, &b) in coords.iter().tuple_windows() {
        let seg_len = distance_metric(a, b);
        let t = if seg_len <= 1e-9 {
            0.0
        } else {
            (((point.0 - a.0) * (b.0 - a.0) + (point.1 - a.1) * (b.1 - a.1)) / seg_len.powi(2))
                .clamp(0.0, 1.0)
        };
        let projected = (a.0 + (b.0 - a.0) * t, a.1 + (b.1 - a.1) * t);
        let dist = distance_metric(point, projected);

        if best.map_or(true, |(_, best_dist, _)| dist < best_dist) {
            best = Some((walked + seg_len * t, dist, projected));
        }
        walked += seg_len;
    }

    best
}

/// Point at a given distance along a polyline in metric space, clamped to its ends.
pub fn point_at_distance_metric(coords: &[(f64, f64)], distance: f64) -> Option<(f64, f64)> {
    let first = *coords.first()?;
    if distance <= 0.0 {
        return Some(first);
    }

    let mut walked = 0.0;
    for (&a, &b) in coords.iter().tuple_windows() {
        let seg_len = distance_metric(a, b);
        if walked + seg_len >= distance && seg_len > 0.0 {
            let t = (distance - walked) / seg_len;
            return Some((a.0 + (b.0 - a.0) * t, a.1 + (b.1 - a.1) * t));
        }
        walked += seg_len;
    }

    coords.last().copied()
}

/// Extract the sub-polyline strictly between two distances along the line.
/// Interior vertices are kept so bends inside the range survive.
pub fn extract_sub_polyline_metric(
    coords: &[(f64, f64)],
    start_dist: f64,
    end_dist: f64,
) -> Vec<(f64, f64)> {
    let total_len = polyline_length_metric(coords);
    let start = start_dist.clamp(0.0, total_len);
    let end = end_dist.clamp(0.0, total_len);

    let Some(p_start) = point_at_distance_metric(coords, start) else {
        return vec![];
    };
    if start >= end {
        return vec![p_start];
    }

    let mut result = vec![p_start];
    let mut current_dist = 0.0;
    for (&p1, &p2) in coords.iter().tuple_windows() {
        let next_dist = current_dist + distance_metric(p1, p2);
        // epsilon keeps vertices that coincide with the cut points from doubling up
        if next_dist > start + 1e-4 && next_dist < end - 1e-4 {
            result.push(p2);
        }
        current_dist = next_dist;
    }

    if let Some(p_end) = point_at_distance_metric(coords, end) {
        result.push(p_end);
    }
    result
}

// --- Lat/Lng path helpers ---

/// Index of the vertex closest to `target` by squared planar distance in degrees.
pub fn nearest_vertex_index(coords: &[LatLng], target: LatLng) -> Option<usize> {
    coords
        .iter()
        .enumerate()
        .map(|(idx, c)| {
            let d_lat = c.lat - target.lat;
            let d_lng = c.lng - target.lng;
            (idx, d_lat * d_lat + d_lng * d_lng)
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(idx, _)| idx)
}

/// Drops every point closer than `min_distance_m` to the last kept point.
pub fn dedup_consecutive(points: &[LatLng], min_distance_m: f64) -> Vec<LatLng> {
    let mut filtered: Vec<LatLng> = Vec::with_capacity(points.len());
    for &p in points {
        match filtered.last() {
            Some(&prev) if haversine_distance(prev, p) <= min_distance_m => {}
            _ => filtered.push(p),
        }
    }
    filtered
}

/// Chaikin corner cutting. Endpoints are kept, each edge is replaced by its
/// 25% and 75% points.
pub fn chaikin_smooth(points: &[LatLng], iterations: usize) -> Vec<LatLng> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let mut pts = points.to_vec();
    for _ in 0..iterations {
        let mut out = Vec::with_capacity(pts.len() * 2);
        out.push(pts[0]);
        for (&p0, &p1) in pts.iter().tuple_windows() {
            out.push(p0.lerp(p1, 0.25));
            out.push(p0.lerp(p1, 0.75));
        }
        out.push(pts[pts.len() - 1]);
        pts = out;
    }
    pts
}

/// Resample a path at regular arc-length intervals.
///
/// `samples = min(ceil(len / spacing) + 1, max_samples)` intervals are walked,
/// so both ends of the input are always part of the output.
pub fn resample_by_arc_length(points: &[LatLng], spacing_m: f64, max_samples: usize) -> Vec<LatLng> {
    if points.len() < 2 || spacing_m <= 0.0 {
        return points.to_vec();
    }

    let ltp = LocalTangentPlane::new(points[0]);
    let metric: Vec<(f64, f64)> = points.iter().map(|&p| ltp.project(p)).collect();
    let length = polyline_length_metric(&metric);
    if length <= 0.0 {
        return points.to_vec();
    }

    let samples = ((length / spacing_m).ceil() as usize + 1).min(max_samples.max(1));
    (0..=samples)
        .filter_map(|i| {
            let dist = (i as f64 / samples as f64 * length).min(length);
            point_at_distance_metric(&metric, dist)
        })
        .map(|xy| ltp.unproject(xy))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lat_lng() {
        let p = LatLng::parse("-23.415050, -48.043810").unwrap();
        assert_eq!(p, LatLng::new(-23.41505, -48.04381));

        let p = LatLng::parse("-23,5; -48,25").unwrap();
        assert_eq!(p, LatLng::new(-23.5, -48.25));

        assert!(LatLng::parse("").is_none());
        assert!(LatLng::parse("abc, 1").is_none());
        assert!(LatLng::parse("-23,5,-48,0").is_none());
    }

    #[test]
    fn test_ltp_roundtrip() {
        let ltp = LocalTangentPlane::new(LatLng::new(-23.5, -48.0));
        let xy = ltp.project(LatLng::new(-23.51, -48.01));
        let back = ltp.unproject(xy);
        assert!((back.lat - -23.51).abs() < 1e-9);
        assert!((back.lng - -48.01).abs() < 1e-9);
    }

    #[test]
    fn test_haversine_one_milli_degree() {
        // ~111 m per 0.001 degree of latitude
        let d = haversine_distance(LatLng::new(-23.5, -48.0), LatLng::new(-23.501, -48.0));
        assert!((d - 111.2).abs() < 1.0, "{d}");
    }

    #[test]
    fn test_projection_on_bent_line() {
        let line = vec![(0.0, 0.0), (0.0, 100.0), (100.0, 100.0)];
        let (along, off, proj) = project_point_to_polyline_metric((50.0, 110.0), &line).unwrap();
        assert!((along - 150.0).abs() < 1e-9);
        assert!((off - 10.0).abs() < 1e-9);
        assert_eq!(proj, (50.0, 100.0));
    }

    #[test]
    fn test_sub_polyline_keeps_interior_vertex() {
        let line = vec![(0.0, 0.0), (0.0, 100.0), (100.0, 100.0)];
        let sub = extract_sub_polyline_metric(&line, 50.0, 150.0);
        assert_eq!(sub, vec![(0.0, 50.0), (0.0, 100.0), (50.0, 100.0)]);
    }

    #[test]
    fn test_chaikin_keeps_ends() {
        let pts = vec![
            LatLng::new(0.0, 0.0),
            LatLng::new(0.0, 1.0),
            LatLng::new(1.0, 1.0),
        ];
        let smooth = chaikin_smooth(&pts, 1);
        assert_eq!(smooth.len(), 6);
        assert_eq!(smooth[0], pts[0]);
        assert_eq!(smooth[1], LatLng::new(0.0, 0.25));
        assert_eq!(smooth[5], pts[2]);
    }

    #[test]
    fn test_dedup_drops_close_points() {
        let pts = vec![
            LatLng::new(-23.5, -48.0),
            LatLng::new(-23.500001, -48.0),
            LatLng::new(-23.501, -48.0),
        ];
        let deduped = dedup_consecutive(&pts, 0.5);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[1], pts[2]);
    }

    #[test]
    fn test_resample_spacing() {
        let pts = vec![LatLng::new(-23.5, -48.0), LatLng::new(-23.501, -48.0)];
        let dense = resample_by_arc_length(&pts, 20.0, 3000);
        // ceil(111 m / 20 m) + 1 = 7 intervals
        assert_eq!(dense.len(), 8);
        assert!((dense[0].lat - -23.5).abs() < 1e-9);
        assert!((dense[7].lat - -23.501).abs() < 1e-9);
    }
}
