//! Cluster Map - Incremental Viewport Clustering of Geographic Points
//!
//! This library keeps a large, changing set of geographic points in a quadtree and,
//! for a given viewport, partitions the visible region into zoom-dependent grid
//! cells, collapses crowded cells into clusters and reports the minimal set of
//! insertions and removals relative to what was displayed before.
//!
//! # Architecture
//!
//! - **[`Quadtree`]**: Spatial index over the projected world with insert, remove and range query
//! - **[`ClusterAlignment`]**: Pluggable strategies positioning a cluster inside its cell
//! - **[`Configuration`]**: Immutable clustering tunables
//! - **[`ClusterManager`]**: Owns the index and the visible set, serializes mutations and
//!   reloads, cancels superseded reloads
//!
//! # Example
//! ```
//! use cluster_map::{ClusterManager, Clusterable, Configuration, Coordinate, Region, Size, Span};
//!
//! #[derive(Clone, Debug, PartialEq)]
//! struct Marker {
//!     id: u32,
//!     coordinate: Coordinate,
//! }
//!
//! impl Clusterable for Marker {
//!     fn coordinate(&self) -> Coordinate {
//!         self.coordinate
//!     }
//!
//!     fn set_coordinate(&mut self, coordinate: Coordinate) {
//!         self.coordinate = coordinate;
//!     }
//! }
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let manager = ClusterManager::new(Configuration::default());
//! manager
//!     .add_many((0..10).map(|id| Marker {
//!         id,
//!         coordinate: Coordinate::new(52.52 + id as f64 * 0.001, 13.40),
//!     }))
//!     .await;
//!
//! let region = Region::new(
//!     Coordinate::new(52.52, 13.40),
//!     Span { latitude_delta: 0.5, longitude_delta: 0.5 },
//! );
//! let difference = manager.reload(Size::new(390.0, 844.0), region).await;
//! assert!(difference.removals.is_empty());
//! assert_eq!(manager.fetch_visible_nested_annotations().await.len(), 10);
//! # });
//! ```

pub mod alignment;
mod annotation;
mod configuration;
mod manager;
mod quadtree;
pub mod runtime;
pub mod utils;

// Public API exports
pub use alignment::{ClusterAlignment, ClusterAlignmentStrategy};
pub use annotation::{Annotation, ClusterAnnotation, Clusterable, Difference};
pub use configuration::{CellSizeFn, Configuration, MAX_ZOOM_LEVEL, default_cell_size};
pub use manager::ClusterManager;
pub use quadtree::Quadtree;
pub use utils::{Coordinate, Region, Size, Span};

use std::fmt;

/// Checkpoints of a reload, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadStage {
    /// Waiting behind earlier mutations or reloads
    Queued,
    /// Splitting the visible rectangle into grid cells
    Partitioning,
    /// Collecting the points of every cell
    Querying,
    /// Deciding per cell between a cluster and individual points
    Clustering,
    /// Comparing with the visible set
    Diffing,
}

impl fmt::Display for ReloadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReloadStage::Queued => "queued",
            ReloadStage::Partitioning => "partitioning",
            ReloadStage::Querying => "querying",
            ReloadStage::Clustering => "clustering",
            ReloadStage::Diffing => "diffing",
        };
        f.write_str(name)
    }
}

/// Error types for reloads
///
/// None of these is surfaced by [`ClusterManager::reload`], which degrades every
/// error to an empty [`Difference`]; use [`ClusterManager::try_reload`] to see them.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("Reload superseded by a newer request while {stage}")]
    Cancelled { stage: ReloadStage },

    #[error("Degenerate viewport: {0}")]
    Degenerate(String),

    #[error("Clustering task failed: {0}")]
    TaskFailed(String),
}

pub type Result<T> = std::result::Result<T, ClusterError>;
