//! Quadtree spatial index for point annotations
//!
//! Every node owns a rectangle of the projected plane. Leaves store points directly;
//! once a leaf reaches [`MAX_POINTS_PER_LEAF`] it becomes internal, creates its four
//! quadrants (NW, NE, SW, SE) and eagerly moves every stored point into the quadrant
//! containing it. Nodes are never merged back.

use crate::{Clusterable, utils};
use geo::{Coord, Intersects, Rect};
use smallvec::SmallVec;

/// Maximum depth of the quadtree to prevent infinite recursion on coincident points
const MAX_DEPTH: u32 = 20;

/// Number of points a leaf may hold before it subdivides
const MAX_POINTS_PER_LEAF: usize = 8;

type LeafPoints<P> = SmallVec<[P; MAX_POINTS_PER_LEAF]>;

/// Root container for the quadtree spatial index
#[derive(Debug, Clone)]
pub struct Quadtree<P> {
    /// Root node, its rectangle is fixed at construction
    root: QuadtreeNode<P>,
    /// Number of stored points
    len: usize,
}

/// A single node in the quadtree
#[derive(Debug, Clone)]
struct QuadtreeNode<P> {
    /// Bounding box in map points
    bounding_box: Rect<f64>,
    /// Depth level in the tree (0 = root)
    level: u32,
    kind: NodeKind<P>,
}

#[derive(Debug, Clone)]
enum NodeKind<P> {
    /// Points stored directly in this node
    Leaf(LeafPoints<P>),
    /// Child nodes (NW, NE, SW, SE), no points stored here
    Internal(Box<[QuadtreeNode<P>; 4]>),
}

impl<P: Clusterable> Default for Quadtree<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<P: Clusterable> Quadtree<P> {
    /// Create a new empty quadtree covering the whole world
    pub fn new() -> Self {
        Self::with_bounds(utils::world_rect())
    }

    /// Create a new empty quadtree covering `bounding_box`
    pub fn with_bounds(bounding_box: Rect<f64>) -> Self {
        Self {
            root: QuadtreeNode::new(bounding_box, 0),
            len: 0,
        }
    }

    /// Insert a point
    ///
    /// Returns `false` (and drops the point) if its coordinate lies outside the
    /// root rectangle.
    pub fn add(&mut self, point: P) -> bool {
        let position = utils::coordinate_to_map_point(point.coordinate());
        if !utils::rect_contains(&self.root.bounding_box, position) {
            return false;
        }

        self.root.insert(point, position);
        self.len += 1;
        true
    }

    /// Remove the point equal to `point`, looked up at its coordinate
    pub fn remove(&mut self, point: &P) -> Option<P> {
        let position = utils::coordinate_to_map_point(point.coordinate());
        if !utils::rect_contains(&self.root.bounding_box, position) {
            return None;
        }

        let removed = self.root.remove(point, position);
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    /// All points whose coordinate lies inside `rect`
    pub fn find_annotations(&self, rect: Rect<f64>) -> Vec<P> {
        self.find_annotation_refs(rect).into_iter().cloned().collect()
    }

    /// Borrowing variant of [`Quadtree::find_annotations`]
    pub fn find_annotation_refs(&self, rect: Rect<f64>) -> Vec<&P> {
        let mut results = Vec::new();
        self.root.query(&rect, &mut results);
        results
    }

    /// Number of stored points
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Rectangle covered by the root node
    #[inline]
    pub fn bounding_box(&self) -> Rect<f64> {
        self.root.bounding_box
    }

    /// Depth of the deepest node (0 when the root is still a leaf)
    pub fn depth(&self) -> u32 {
        self.root.depth()
    }
}

impl<P: Clusterable> QuadtreeNode<P> {
    fn new(bounding_box: Rect<f64>, level: u32) -> Self {
        Self {
            bounding_box,
            level,
            kind: NodeKind::Leaf(SmallVec::new()),
        }
    }

    /// Index of the quadrant containing `position` (0 = NW, 1 = NE, 2 = SW, 3 = SE)
    ///
    /// y grows southward in map points.
    #[inline]
    fn quadrant_of(&self, position: Coord<f64>) -> usize {
        quadrant_index(self.bounding_box.center(), position)
    }

    /// Create the 4 quadrant nodes of `bounding_box` and distribute `points` among them
    fn split(
        bounding_box: Rect<f64>,
        level: u32,
        points: LeafPoints<P>,
    ) -> Box<[QuadtreeNode<P>; 4]> {
        let min = bounding_box.min();
        let max = bounding_box.max();
        let mid = bounding_box.center();
        let child_level = level + 1;

        let mut children = Box::new([
            QuadtreeNode::new(Rect::new(min, mid), child_level),
            QuadtreeNode::new(
                Rect::new(Coord { x: mid.x, y: min.y }, Coord { x: max.x, y: mid.y }),
                child_level,
            ),
            QuadtreeNode::new(
                Rect::new(Coord { x: min.x, y: mid.y }, Coord { x: mid.x, y: max.y }),
                child_level,
            ),
            QuadtreeNode::new(Rect::new(mid, max), child_level),
        ]);

        for point in points {
            let position = utils::coordinate_to_map_point(point.coordinate());
            let quadrant = quadrant_index(mid, position);
            children[quadrant].insert(point, position);
        }

        children
    }

    fn insert(&mut self, point: P, position: Coord<f64>) {
        debug_assert!(utils::rect_contains(&self.bounding_box, position));

        let quadrant = self.quadrant_of(position);
        match &mut self.kind {
            NodeKind::Leaf(points) => {
                points.push(point);
                if points.len() >= MAX_POINTS_PER_LEAF && self.level < MAX_DEPTH {
                    let points = std::mem::take(points);
                    self.kind =
                        NodeKind::Internal(Self::split(self.bounding_box, self.level, points));
                }
            }
            NodeKind::Internal(children) => children[quadrant].insert(point, position),
        }
    }

    fn remove(&mut self, target: &P, position: Coord<f64>) -> Option<P> {
        let quadrant = self.quadrant_of(position);
        match &mut self.kind {
            NodeKind::Leaf(points) => {
                let index = points.iter().position(|point| point == target)?;
                Some(points.remove(index))
            }
            NodeKind::Internal(children) => children[quadrant].remove(target, position),
        }
    }

    fn query<'a>(&'a self, rect: &Rect<f64>, results: &mut Vec<&'a P>) {
        if !self.bounding_box.intersects(rect) {
            return;
        }

        match &self.kind {
            NodeKind::Leaf(points) => results.extend(
                points
                    .iter()
                    .filter(|point| utils::rect_contains_coordinate(rect, point.coordinate())),
            ),
            NodeKind::Internal(children) => {
                for child in children.iter() {
                    child.query(rect, results);
                }
            }
        }
    }

    fn depth(&self) -> u32 {
        match &self.kind {
            NodeKind::Leaf(_) => self.level,
            NodeKind::Internal(children) => {
                children.iter().map(|child| child.depth()).max().unwrap_or(self.level)
            }
        }
    }
}

#[inline]
fn quadrant_index(mid: Coord<f64>, position: Coord<f64>) -> usize {
    let east = position.x >= mid.x;
    let south = position.y >= mid.y;
    match (east, south) {
        (false, false) => 0,
        (true, false) => 1,
        (false, true) => 2,
        (true, true) => 3,
    }
}
