use geo::{HaversineDistance, Point};

/// Great-circle distance between two points in meters
///
/// Points are `(x = lon, y = lat)`.
#[inline]
pub fn haversine_meters(a: Point<f64>, b: Point<f64>) -> f64 {
    a.haversine_distance(&b)
}

/// Round a coordinate to a fixed number of decimals as an integer, for use in
/// hash keys where `f64` cannot be used directly
#[inline]
pub fn quantize(value: f64, decimals: u32) -> i64 {
    let scale = 10f64.powi(decimals as i32);
    (value * scale).round() as i64
}
