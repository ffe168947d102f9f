//! Cluster alignment strategies
//!
//! A strategy picks the single coordinate at which a cluster is displayed, given
//! its member coordinates and the grid cell they were collected from.

use crate::utils::{self, Coordinate};
use geo::Rect;
use std::fmt;
use std::sync::Arc;

/// Computes the representative coordinate of a cluster
///
/// Implementations must be stateless (or internally synchronized): one instance is
/// shared by every reload.
pub trait ClusterAlignmentStrategy: Send + Sync {
    fn calculate_position(&self, coordinates: &[Coordinate], within: Rect<f64>) -> Coordinate;
}

impl<F> ClusterAlignmentStrategy for F
where
    F: Fn(&[Coordinate], Rect<f64>) -> Coordinate + Send + Sync,
{
    fn calculate_position(&self, coordinates: &[Coordinate], within: Rect<f64>) -> Coordinate {
        self(coordinates, within)
    }
}

/// Midpoint of the cell, member coordinates are ignored
#[derive(Debug, Clone, Copy, Default)]
pub struct CenterCoordinate;

impl ClusterAlignmentStrategy for CenterCoordinate {
    fn calculate_position(&self, _coordinates: &[Coordinate], within: Rect<f64>) -> Coordinate {
        utils::map_point_to_coordinate(within.center())
    }
}

/// Member coordinate closest (great-circle) to the cell midpoint
///
/// Falls back to the midpoint for an empty cluster.
#[derive(Debug, Clone, Copy, Default)]
pub struct NearCenterCoordinate;

impl ClusterAlignmentStrategy for NearCenterCoordinate {
    fn calculate_position(&self, coordinates: &[Coordinate], within: Rect<f64>) -> Coordinate {
        let center = CenterCoordinate.calculate_position(&[], within);
        coordinates
            .iter()
            .map(|coordinate| (coordinate, center.distance(coordinate)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(coordinate, _)| *coordinate)
            .unwrap_or(center)
    }
}

/// Arithmetic mean of latitudes and longitudes
///
/// Not geodesically correct, which is fine at cell scale. An empty cluster has no
/// mean, so it falls back to the cell midpoint instead of producing NaN.
#[derive(Debug, Clone, Copy, Default)]
pub struct AverageCoordinate;

impl ClusterAlignmentStrategy for AverageCoordinate {
    fn calculate_position(&self, coordinates: &[Coordinate], within: Rect<f64>) -> Coordinate {
        if coordinates.is_empty() {
            return CenterCoordinate.calculate_position(coordinates, within);
        }

        let (latitude, longitude) = coordinates
            .iter()
            .fold((0.0, 0.0), |(lat, lon), coordinate| {
                (lat + coordinate.latitude, lon + coordinate.longitude)
            });
        let count = coordinates.len() as f64;
        Coordinate::new(latitude / count, longitude / count)
    }
}

/// First member coordinate, or the fallback strategy's result for an empty cluster
pub struct FirstCoordinate {
    fallback: Arc<dyn ClusterAlignmentStrategy>,
}

impl FirstCoordinate {
    pub fn new(fallback: impl ClusterAlignmentStrategy + 'static) -> Self {
        Self {
            fallback: Arc::new(fallback),
        }
    }
}

impl ClusterAlignmentStrategy for FirstCoordinate {
    fn calculate_position(&self, coordinates: &[Coordinate], within: Rect<f64>) -> Coordinate {
        match coordinates.first() {
            Some(first) => *first,
            None => self.fallback.calculate_position(coordinates, within),
        }
    }
}

/// Shareable handle to the strategy used by a [`crate::Configuration`]
///
/// # Example
/// ```
/// use cluster_map::{ClusterAlignment, Configuration, Coordinate};
///
/// // Built-in strategy
/// let config = Configuration::default().with_cluster_position(ClusterAlignment::average());
///
/// // Custom strategy from a closure: always the south-most member
/// let south_most = ClusterAlignment::custom(|coordinates: &[Coordinate], _cell: geo::Rect<f64>| {
///     coordinates
///         .iter()
///         .copied()
///         .min_by(|a, b| a.latitude.total_cmp(&b.latitude))
///         .unwrap_or_default()
/// });
/// let config = config.with_cluster_position(south_most);
/// ```
#[derive(Clone)]
pub struct ClusterAlignment {
    name: &'static str,
    strategy: Arc<dyn ClusterAlignmentStrategy>,
}

impl ClusterAlignment {
    /// Cell midpoint
    pub fn center() -> Self {
        Self::named("center", CenterCoordinate)
    }

    /// Member nearest to the cell midpoint, midpoint when empty
    pub fn near_center() -> Self {
        Self::named("near_center", NearCenterCoordinate)
    }

    /// Mean member position
    pub fn average() -> Self {
        Self::named("average", AverageCoordinate)
    }

    /// First member, cell midpoint when empty
    pub fn first() -> Self {
        Self::named("first", FirstCoordinate::new(CenterCoordinate))
    }

    /// Wrap any user supplied strategy
    pub fn custom(strategy: impl ClusterAlignmentStrategy + 'static) -> Self {
        Self::named("custom", strategy)
    }

    fn named(name: &'static str, strategy: impl ClusterAlignmentStrategy + 'static) -> Self {
        Self {
            name,
            strategy: Arc::new(strategy),
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Default for ClusterAlignment {
    fn default() -> Self {
        Self::near_center()
    }
}

impl ClusterAlignmentStrategy for ClusterAlignment {
    #[inline]
    fn calculate_position(&self, coordinates: &[Coordinate], within: Rect<f64>) -> Coordinate {
        self.strategy.calculate_position(coordinates, within)
    }
}

impl fmt::Debug for ClusterAlignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ClusterAlignment").field(&self.name).finish()
    }
}
