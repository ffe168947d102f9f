//! Utility types and functions for coordinate conversions and spatial operations
//!
//! The projected plane is the Web Mercator "map point" space: a square world of
//! [`WORLD_SIZE`] units per side with the origin in the north-west corner, x growing
//! east and y growing south.

use geo::{Coord, Destination, Distance, Haversine, Point, Rect};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Edge length of the projected world in map points (2^28)
pub const WORLD_SIZE: f64 = 268_435_456.0;

/// Maximum latitude that can be represented in Web Mercator
pub const MAX_LATITUDE: f64 = 85.05112878;

/// Zoom level at which one 256-unit tile spans the whole world: log2(WORLD_SIZE / 256)
pub const MAX_WORLD_ZOOM: f64 = 20.0;

/// Precomputed constant: WORLD_SIZE / 360.0
const LON_TO_X_FACTOR: f64 = WORLD_SIZE / 360.0;

/// Precomputed constant: 360.0 / WORLD_SIZE
const X_TO_LON_FACTOR: f64 = 360.0 / WORLD_SIZE;

/// Precomputed constant: 1 / (4 * PI)
const Y_FACTOR: f64 = 1.0 / (4.0 * std::f64::consts::PI);

/// A geographic coordinate in degrees
///
/// Equality is tolerant to floating-point noise, see [`is_nearly_equal`].
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

/// Bit-exact hashable key of a [`Coordinate`], used to group coincident points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoordinateKey(u64, u64);

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// The coordinate reached after travelling `distance_meters` along a great circle
    /// starting at `bearing_radians` (clockwise from north)
    pub fn destination(&self, bearing_radians: f64, distance_meters: f64) -> Coordinate {
        let origin: Point<f64> = (*self).into();
        Haversine
            .destination(origin, bearing_radians.to_degrees(), distance_meters)
            .into()
    }

    /// Great-circle distance to `other` in meters
    #[inline]
    pub fn distance(&self, other: &Coordinate) -> f64 {
        Haversine.distance(Point::from(*self), Point::from(*other))
    }

    #[inline]
    pub fn key(&self) -> CoordinateKey {
        CoordinateKey(self.latitude.to_bits(), self.longitude.to_bits())
    }

    /// Project onto the map point plane
    #[inline]
    pub fn to_map_point(&self) -> Coord<f64> {
        coordinate_to_map_point(*self)
    }
}

impl PartialEq for Coordinate {
    fn eq(&self, other: &Self) -> bool {
        is_nearly_equal(self.latitude, other.latitude)
            && is_nearly_equal(self.longitude, other.longitude)
    }
}

impl From<Coordinate> for Point<f64> {
    #[inline]
    fn from(coordinate: Coordinate) -> Self {
        Point::new(coordinate.longitude, coordinate.latitude)
    }
}

impl From<Point<f64>> for Coordinate {
    #[inline]
    fn from(point: Point<f64>) -> Self {
        Coordinate::new(point.y(), point.x())
    }
}

/// Relative floating-point comparison
///
/// Values are equal when identical, when their difference is below one ulp of the
/// smallest normal number (if either side is zero or subnormal), or when their
/// relative difference is below machine epsilon.
pub fn is_nearly_equal(a: f64, b: f64) -> bool {
    if a == b {
        return true;
    }

    let abs_a = a.abs();
    let abs_b = b.abs();
    let diff = (a - b).abs();

    if a == 0.0 || b == 0.0 || abs_a + abs_b < f64::MIN_POSITIVE {
        diff < f64::EPSILON * f64::MIN_POSITIVE
    } else {
        diff / (abs_a + abs_b).min(f64::MAX) < f64::EPSILON
    }
}

/// Latitude/longitude extent of a region, in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Span {
    pub latitude_delta: f64,
    pub longitude_delta: f64,
}

/// A visible geographic region: center plus span
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Region {
    pub center: Coordinate,
    pub span: Span,
}

impl Region {
    pub fn new(center: Coordinate, span: Span) -> Self {
        Self { center, span }
    }

    /// Convert to a projected rectangle
    pub fn to_map_rect(&self) -> Rect<f64> {
        let half_lat = self.span.latitude_delta * 0.5;
        let half_lon = self.span.longitude_delta * 0.5;

        let top_left = coordinate_to_map_point(Coordinate::new(
            self.center.latitude + half_lat,
            self.center.longitude - half_lon,
        ));
        let bottom_right = coordinate_to_map_point(Coordinate::new(
            self.center.latitude - half_lat,
            self.center.longitude + half_lon,
        ));

        // Rect::new normalizes the corners
        Rect::new(top_left, bottom_right)
    }

    /// The region covering a projected rectangle
    pub fn from_map_rect(rect: Rect<f64>) -> Self {
        let min = rect.min();
        let max = rect.max();

        let top_left = map_point_to_coordinate(min);
        let bottom_right = map_point_to_coordinate(max);
        let center = map_point_to_coordinate(rect.center());

        Self {
            center,
            span: Span {
                latitude_delta: top_left.latitude - bottom_right.latitude,
                longitude_delta: bottom_right.longitude - top_left.longitude,
            },
        }
    }
}

/// Viewport size in logical pixels
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Convert WGS84 to a map point
///
/// Latitude is clamped to the representable Web Mercator range.
#[inline(always)]
pub fn coordinate_to_map_point(coordinate: Coordinate) -> Coord<f64> {
    let lat = coordinate.latitude.clamp(-MAX_LATITUDE, MAX_LATITUDE);
    let sin_lat = lat.to_radians().sin();

    let x = (coordinate.longitude + 180.0) * LON_TO_X_FACTOR;
    let y = (0.5 - ((1.0 + sin_lat) / (1.0 - sin_lat)).ln() * Y_FACTOR) * WORLD_SIZE;

    Coord { x, y }
}

/// Convert a map point back to WGS84
#[inline(always)]
pub fn map_point_to_coordinate(point: Coord<f64>) -> Coordinate {
    let longitude = point.x * X_TO_LON_FACTOR - 180.0;
    let exponent = (point.y / WORLD_SIZE - 0.5) * 2.0 * std::f64::consts::PI;
    let latitude = (std::f64::consts::FRAC_PI_2 - 2.0 * exponent.exp().atan()).to_degrees();
    Coordinate::new(latitude, longitude)
}

/// The whole projected world
pub fn world_rect() -> Rect<f64> {
    Rect::new(
        Coord { x: 0.0, y: 0.0 },
        Coord {
            x: WORLD_SIZE,
            y: WORLD_SIZE,
        },
    )
}

/// Half-open containment: `min <= p < max` on both axes
///
/// Adjacent rectangles sharing an edge never both contain a point on it.
#[inline(always)]
pub fn rect_contains(rect: &Rect<f64>, point: Coord<f64>) -> bool {
    let min = rect.min();
    let max = rect.max();
    point.x >= min.x && point.x < max.x && point.y >= min.y && point.y < max.y
}

/// Check whether a geographic coordinate projects into `rect`
#[inline]
pub fn rect_contains_coordinate(rect: &Rect<f64>, coordinate: Coordinate) -> bool {
    rect_contains(rect, coordinate_to_map_point(coordinate))
}

/// Discrete zoom level for the ratio of viewport width to projected width
///
/// Returns `None` for a degenerate scale (NaN, infinite, zero or negative).
pub fn zoom_level(zoom_scale: f64) -> Option<u32> {
    if !zoom_scale.is_finite() || zoom_scale <= 0.0 {
        return None;
    }

    // log2 of a zoomed-out scale is negative
    let exponent = (zoom_scale.log2() + 0.5).floor();
    Some((MAX_WORLD_ZOOM + exponent).max(0.0) as u32)
}
