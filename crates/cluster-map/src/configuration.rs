//! Configuration for the cluster manager
//!
//! Every field has an independent default; the `with_*` setters clamp out of range
//! values instead of rejecting them.

use crate::alignment::ClusterAlignment;
use std::fmt;
use std::sync::Arc;

/// Highest zoom level the clustering cut-off may be set to
pub const MAX_ZOOM_LEVEL: u32 = 20;

/// Maps a zoom level to the edge length of a square grid cell, in screen units
pub type CellSizeFn = Arc<dyn Fn(u32) -> f64 + Send + Sync>;

/// Configuration for the cluster manager
///
/// # Example
/// ```
/// use cluster_map::{ClusterAlignment, Configuration};
///
/// let config = Configuration::default()
///     .with_max_zoom_level(18)
///     .with_min_count_for_clustering(3)
///     .with_remove_invisible_annotations(false)
///     .with_cluster_position(ClusterAlignment::center())
///     .with_cell_size_for_zoom_level(|zoom| if zoom >= 16 { 32.0 } else { 64.0 });
///
/// assert_eq!(config.max_zoom_level(), 18);
/// assert_eq!(config.cell_size(17), 32.0);
/// ```
#[derive(Clone)]
pub struct Configuration {
    /// Clustering is disabled above this zoom level (0..=20, default 20)
    max_zoom_level: u32,
    /// Minimum number of points in a cell for them to form a cluster (default 2)
    min_count_for_clustering: usize,
    /// Remove annotations that left the viewport from the visible set (default true)
    should_remove_invisible_annotations: bool,
    /// Spread points sharing one coordinate on a small circle (default true)
    should_distribute_annotations_on_same_coordinate: bool,
    /// Radius in meters of that circle (>= 0, default 3)
    distance_from_contested_location: f64,
    /// Strategy positioning clusters (default near-center)
    cluster_position: ClusterAlignment,
    /// Cell edge length per zoom level (default 88/64/32/16 by zoom band)
    cell_size_for_zoom_level: CellSizeFn,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            max_zoom_level: MAX_ZOOM_LEVEL,
            min_count_for_clustering: 2,
            should_remove_invisible_annotations: true,
            should_distribute_annotations_on_same_coordinate: true,
            distance_from_contested_location: 3.0,
            cluster_position: ClusterAlignment::default(),
            cell_size_for_zoom_level: Arc::new(default_cell_size),
        }
    }
}

/// Default cell sizes: finer cells as the map zooms in
pub fn default_cell_size(zoom_level: u32) -> f64 {
    match zoom_level {
        13..=15 => 64.0,
        16..=18 => 32.0,
        19.. => 16.0,
        _ => 88.0,
    }
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clamped to `0..=20`
    pub fn with_max_zoom_level(mut self, max_zoom_level: u32) -> Self {
        self.max_zoom_level = max_zoom_level.min(MAX_ZOOM_LEVEL);
        self
    }

    pub fn with_min_count_for_clustering(mut self, min_count: usize) -> Self {
        self.min_count_for_clustering = min_count;
        self
    }

    pub fn with_remove_invisible_annotations(mut self, enabled: bool) -> Self {
        self.should_remove_invisible_annotations = enabled;
        self
    }

    pub fn with_distribute_annotations_on_same_coordinate(mut self, enabled: bool) -> Self {
        self.should_distribute_annotations_on_same_coordinate = enabled;
        self
    }

    /// Clamped to `>= 0`; NaN becomes 0
    pub fn with_distance_from_contested_location(mut self, meters: f64) -> Self {
        self.distance_from_contested_location = if meters.is_nan() { 0.0 } else { meters.max(0.0) };
        self
    }

    pub fn with_cluster_position(mut self, alignment: ClusterAlignment) -> Self {
        self.cluster_position = alignment;
        self
    }

    pub fn with_cell_size_for_zoom_level<F>(mut self, cell_size: F) -> Self
    where
        F: Fn(u32) -> f64 + Send + Sync + 'static,
    {
        self.cell_size_for_zoom_level = Arc::new(cell_size);
        self
    }

    #[inline]
    pub fn max_zoom_level(&self) -> u32 {
        self.max_zoom_level
    }

    #[inline]
    pub fn min_count_for_clustering(&self) -> usize {
        self.min_count_for_clustering
    }

    #[inline]
    pub fn should_remove_invisible_annotations(&self) -> bool {
        self.should_remove_invisible_annotations
    }

    #[inline]
    pub fn should_distribute_annotations_on_same_coordinate(&self) -> bool {
        self.should_distribute_annotations_on_same_coordinate
    }

    #[inline]
    pub fn distance_from_contested_location(&self) -> f64 {
        self.distance_from_contested_location
    }

    #[inline]
    pub fn cluster_position(&self) -> &ClusterAlignment {
        &self.cluster_position
    }

    /// Cell edge length for `zoom_level`
    #[inline]
    pub fn cell_size(&self, zoom_level: u32) -> f64 {
        (self.cell_size_for_zoom_level)(zoom_level)
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("max_zoom_level", &self.max_zoom_level)
            .field("min_count_for_clustering", &self.min_count_for_clustering)
            .field(
                "should_remove_invisible_annotations",
                &self.should_remove_invisible_annotations,
            )
            .field(
                "should_distribute_annotations_on_same_coordinate",
                &self.should_distribute_annotations_on_same_coordinate,
            )
            .field(
                "distance_from_contested_location",
                &self.distance_from_contested_location,
            )
            .field("cluster_position", &self.cluster_position)
            .finish_non_exhaustive()
    }
}
