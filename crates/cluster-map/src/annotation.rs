//! Annotation structures exchanged with the host: points, clusters and diffs

use crate::utils::Coordinate;
use uuid::Uuid;

/// A point that can be indexed and clustered
///
/// `PartialEq` is the point's value equality: it is used to find the instance to
/// remove from the index and to diff successive visible sets.
///
/// The index looks a point up at its current coordinate. A reload that spreads out
/// points sharing a coordinate moves them with [`Clusterable::set_coordinate`], so a
/// copy taken before that reload no longer matches and removing it finds nothing.
/// Remove the values returned by
/// [`ClusterManager::fetch_all_annotations`](crate::ClusterManager::fetch_all_annotations),
/// or disable the spreading in [`Configuration`](crate::Configuration).
///
/// # Example
/// ```
/// use cluster_map::{Clusterable, Coordinate};
///
/// #[derive(Clone, Debug, PartialEq)]
/// struct Shop {
///     id: u32,
///     coordinate: Coordinate,
/// }
///
/// impl Clusterable for Shop {
///     fn coordinate(&self) -> Coordinate {
///         self.coordinate
///     }
///
///     fn set_coordinate(&mut self, coordinate: Coordinate) {
///         self.coordinate = coordinate;
///     }
/// }
/// ```
pub trait Clusterable: Clone + PartialEq + Send + Sync + 'static {
    /// Geographic position of the point
    fn coordinate(&self) -> Coordinate;

    /// Move the point; used when spreading out points sharing a coordinate
    fn set_coordinate(&mut self, coordinate: Coordinate);

    /// Whether the point may be merged into a cluster (default `true`)
    fn should_cluster(&self) -> bool {
        true
    }
}

/// A group of nearby points displayed as one unit
///
/// Created fresh on every reload. Two clusters are equal when their coordinates
/// and member lists are equal; the id does not take part.
#[derive(Clone, Debug)]
pub struct ClusterAnnotation<P> {
    id: Uuid,
    coordinate: Coordinate,
    members: Vec<P>,
}

impl<P: Clusterable> ClusterAnnotation<P> {
    pub fn new(coordinate: Coordinate, members: Vec<P>) -> Self {
        Self {
            id: Uuid::new_v4(),
            coordinate,
            members,
        }
    }

    #[inline]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Representative position chosen by the alignment strategy
    #[inline]
    pub fn coordinate(&self) -> Coordinate {
        self.coordinate
    }

    /// Member points in index order
    #[inline]
    pub fn members(&self) -> &[P] {
        &self.members
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl<P: PartialEq> PartialEq for ClusterAnnotation<P> {
    fn eq(&self, other: &Self) -> bool {
        self.coordinate == other.coordinate && self.members == other.members
    }
}

/// A visible unit: either a single point or a cluster
#[derive(Clone, Debug, PartialEq)]
pub enum Annotation<P> {
    Point(P),
    Cluster(ClusterAnnotation<P>),
}

impl<P: Clusterable> Annotation<P> {
    /// Position at which the annotation is displayed
    pub fn coordinate(&self) -> Coordinate {
        match self {
            Annotation::Point(point) => point.coordinate(),
            Annotation::Cluster(cluster) => cluster.coordinate(),
        }
    }

    /// Number of points represented by this annotation
    pub fn member_count(&self) -> usize {
        match self {
            Annotation::Point(_) => 1,
            Annotation::Cluster(cluster) => cluster.len(),
        }
    }

    #[inline]
    pub fn is_cluster(&self) -> bool {
        matches!(self, Annotation::Cluster(_))
    }

    /// Borrow the individual points, flattening clusters
    pub fn points(&self) -> &[P] {
        match self {
            Annotation::Point(point) => std::slice::from_ref(point),
            Annotation::Cluster(cluster) => cluster.members(),
        }
    }

    /// Take the individual points, flattening clusters
    pub fn into_points(self) -> Vec<P> {
        match self {
            Annotation::Point(point) => vec![point],
            Annotation::Cluster(cluster) => cluster.members,
        }
    }
}

/// Delta between two successive visible sets
#[derive(Clone, Debug, PartialEq)]
pub struct Difference<P> {
    /// Annotations that became visible
    pub insertions: Vec<Annotation<P>>,
    /// Annotations that are no longer visible
    pub removals: Vec<Annotation<P>>,
}

impl<P> Default for Difference<P> {
    fn default() -> Self {
        Self {
            insertions: Vec::new(),
            removals: Vec::new(),
        }
    }
}

impl<P> Difference<P> {
    pub fn new(insertions: Vec<Annotation<P>>, removals: Vec<Annotation<P>>) -> Self {
        Self {
            insertions,
            removals,
        }
    }

    /// True when nothing needs to change on screen
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.insertions.is_empty() && self.removals.is_empty()
    }
}
