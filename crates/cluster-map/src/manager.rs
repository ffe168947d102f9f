//! Cluster manager: owns the index and the visible set, runs reloads
//!
//! Every mutation and reload goes through one fair `RwLock`, so they are applied in
//! request order. A reload takes a generation ticket when it is requested; requesting
//! another reload moves the generation on, and the older one gives up at its next
//! checkpoint. The last checkpoint runs under the write lock right before the visible
//! set is replaced, so a superseded result is never applied.

use crate::alignment::ClusterAlignmentStrategy;
use crate::annotation::{Annotation, ClusterAnnotation, Clusterable, Difference};
use crate::configuration::Configuration;
use crate::quadtree::Quadtree;
use crate::runtime::{self, RwLock};
use crate::utils::{self, Coordinate, CoordinateKey, Region, Size, WORLD_SIZE};
use crate::{ClusterError, ReloadStage, Result};
use geo::{Coord, Rect};
use rayon::prelude::*;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::JoinHandle;

/// Upper bound on grid cells per reload; a cell size function returning tiny
/// values would otherwise allocate without limit
const MAX_GRID_CELLS: u64 = 1 << 20;

/// Incremental clusterer for a set of points
///
/// Cheap to clone: clones share the same index, visible set and configuration.
///
/// # Example
/// ```
/// # use cluster_map::{ClusterManager, Clusterable, Configuration, Coordinate, Region, Size, Span};
/// # #[derive(Clone, Debug, PartialEq)]
/// # struct Marker(Coordinate);
/// # impl Clusterable for Marker {
/// #     fn coordinate(&self) -> Coordinate { self.0 }
/// #     fn set_coordinate(&mut self, coordinate: Coordinate) { self.0 = coordinate; }
/// # }
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let manager = ClusterManager::new(Configuration::default());
/// manager.add(Marker(Coordinate::new(48.85, 2.35))).await;
///
/// let region = Region::new(Coordinate::new(48.85, 2.35), Span { latitude_delta: 1.0, longitude_delta: 1.0 });
/// let handle = manager.reload_with(Size::new(400.0, 800.0), region, |difference| {
///     assert_eq!(difference.insertions.len(), 1);
/// });
/// assert!(handle.await.unwrap());
/// # });
/// ```
pub struct ClusterManager<P> {
    state: Arc<RwLock<ClusterState<P>>>,
    configuration: Arc<Configuration>,
    generation: Arc<AtomicU64>,
}

impl<P> Clone for ClusterManager<P> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            configuration: Arc::clone(&self.configuration),
            generation: Arc::clone(&self.generation),
        }
    }
}

impl<P: Clusterable> Default for ClusterManager<P> {
    fn default() -> Self {
        Self::new(Configuration::default())
    }
}

/// Everything guarded by the manager's lock
struct ClusterState<P> {
    tree: Quadtree<P>,
    visible_annotations: Vec<Annotation<P>>,
    /// Zoom level of the last applied reload
    zoom_level: Option<u32>,
}

/// Generation ticket of one reload request
#[derive(Debug)]
struct ReloadTicket {
    generation: u64,
    latest: Arc<AtomicU64>,
}

impl ReloadTicket {
    /// Take the next generation, superseding every earlier ticket
    fn issue(latest: &Arc<AtomicU64>) -> Self {
        let generation = latest.fetch_add(1, Ordering::SeqCst) + 1;
        Self {
            generation,
            latest: Arc::clone(latest),
        }
    }

    #[inline]
    fn is_cancelled(&self) -> bool {
        self.latest.load(Ordering::SeqCst) != self.generation
    }

    /// Checkpoint after `stage`
    fn check(&self, stage: ReloadStage) -> Result<()> {
        if self.is_cancelled() {
            tracing::trace!(generation = self.generation, %stage, "Reload superseded");
            return Err(ClusterError::Cancelled { stage });
        }
        Ok(())
    }
}

/// Result of the partitioning stage
struct Grid {
    visible_rect: Rect<f64>,
    zoom_level: u32,
    cells: Vec<GridCell>,
}

impl Grid {
    /// Whether `coordinate` is on screen, including across the anti-meridian
    fn covers(&self, coordinate: Coordinate) -> bool {
        let point = coordinate.to_map_point();
        [0.0, WORLD_SIZE, -WORLD_SIZE].iter().any(|shift| {
            utils::rect_contains(
                &self.visible_rect,
                Coord {
                    x: point.x + shift,
                    y: point.y,
                },
            )
        })
    }
}

/// One clustering cell
#[derive(Debug, Clone, Copy, PartialEq)]
struct GridCell {
    /// Cell rectangle, handed to the alignment strategy
    rect: Rect<f64>,
    /// Part of `rect` lying past a world edge, shifted onto the other side
    wrapped: Option<Rect<f64>>,
}

impl GridCell {
    fn points<'a, P: Clusterable>(&self, tree: &'a Quadtree<P>) -> Vec<&'a P> {
        let mut points = tree.find_annotation_refs(self.rect);
        if let Some(wrapped) = self.wrapped {
            points.extend(tree.find_annotation_refs(wrapped));
        }
        points
    }
}

impl<P: Clusterable> ClusterManager<P> {
    pub fn new(configuration: Configuration) -> Self {
        Self {
            state: Arc::new(RwLock::new(ClusterState {
                tree: Quadtree::new(),
                visible_annotations: Vec::new(),
                zoom_level: None,
            })),
            configuration: Arc::new(configuration),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    #[inline]
    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Insert a point; visible on the next reload
    ///
    /// Returns `false` when the point lies outside the world.
    pub async fn add(&self, point: P) -> bool {
        runtime::with_write(&self.state, |state| state.tree.add(point)).await
    }

    /// Insert several points, returns how many were accepted
    pub async fn add_many<I>(&self, points: I) -> usize
    where
        I: IntoIterator<Item = P>,
    {
        let points: Vec<P> = points.into_iter().collect();
        runtime::with_write(&self.state, |state| {
            points
                .into_iter()
                .map(|point| state.tree.add(point))
                .filter(|added| *added)
                .count()
        })
        .await
    }

    /// Remove the point equal to `point`
    pub async fn remove(&self, point: &P) -> Option<P> {
        runtime::with_write(&self.state, |state| state.tree.remove(point)).await
    }

    /// Remove several points, returns how many were found
    pub async fn remove_many(&self, points: &[P]) -> usize {
        runtime::with_write(&self.state, |state| {
            points
                .iter()
                .filter_map(|point| state.tree.remove(point))
                .count()
        })
        .await
    }

    /// Drop every point by replacing the index with an empty one
    ///
    /// The visible set is left alone so the next reload reports the removals.
    pub async fn remove_all(&self) {
        runtime::with_write(&self.state, |state| state.tree = Quadtree::new()).await
    }

    /// Recompute the visible annotations for a viewport
    ///
    /// Every failure, including being superseded by a newer reload, yields an empty
    /// [`Difference`] and leaves the visible set untouched.
    pub fn reload(
        &self,
        viewport: Size,
        region: Region,
    ) -> impl Future<Output = Difference<P>> + Send + use<P> {
        let reload = self.try_reload(viewport, region);
        async move {
            match reload.await {
                Ok(difference) => difference,
                Err(error) => {
                    log_reload_failure(&error);
                    Difference::default()
                }
            }
        }
    }

    /// Like [`ClusterManager::reload`], but reports why nothing was applied
    ///
    /// The request counts as submitted when this is called, not when the returned
    /// future is first polled.
    pub fn try_reload(
        &self,
        viewport: Size,
        region: Region,
    ) -> impl Future<Output = Result<Difference<P>>> + Send + use<P> {
        let ticket = ReloadTicket::issue(&self.generation);
        let state = Arc::clone(&self.state);
        let configuration = Arc::clone(&self.configuration);

        async move {
            let mut guard = state.write_owned().await;
            ticket.check(ReloadStage::Queued)?;

            let outcome = runtime::run_blocking(move || {
                guard.reload(&configuration, &ticket, viewport, region)
            })
            .await?;
            outcome
        }
    }

    /// Run a reload in the background and hand the difference to `completion`
    ///
    /// `completion` only runs when the result was applied; the handle resolves to
    /// `true` in that case. Must be called from within a tokio runtime.
    pub fn reload_with<F>(&self, viewport: Size, region: Region, completion: F) -> JoinHandle<bool>
    where
        F: FnOnce(Difference<P>) + Send + 'static,
    {
        let reload = self.try_reload(viewport, region);
        runtime::spawn(async move {
            match reload.await {
                Ok(difference) => {
                    completion(difference);
                    true
                }
                Err(error) => {
                    log_reload_failure(&error);
                    false
                }
            }
        })
    }

    /// Every indexed point
    pub async fn fetch_all_annotations(&self) -> Vec<P> {
        runtime::with_read(&self.state, |state| {
            state.tree.find_annotations(state.tree.bounding_box())
        })
        .await
    }

    /// The visible set with clusters flattened into their members
    pub async fn fetch_visible_nested_annotations(&self) -> Vec<P> {
        runtime::with_read(&self.state, |state| {
            state
                .visible_annotations
                .iter()
                .flat_map(|annotation| annotation.points().iter().cloned())
                .collect()
        })
        .await
    }

    /// The visible set as last applied
    pub async fn visible_annotations(&self) -> Vec<Annotation<P>> {
        runtime::with_read(&self.state, |state| state.visible_annotations.clone()).await
    }

    /// Zoom level used by the last applied reload
    pub async fn zoom_level(&self) -> Option<u32> {
        runtime::with_read(&self.state, |state| state.zoom_level).await
    }

    /// Number of indexed points
    pub async fn len(&self) -> usize {
        runtime::with_read(&self.state, |state| state.tree.len()).await
    }

    pub async fn is_empty(&self) -> bool {
        runtime::with_read(&self.state, |state| state.tree.is_empty()).await
    }
}

fn log_reload_failure(error: &ClusterError) {
    match error {
        ClusterError::Cancelled { .. } => tracing::debug!("{}", error),
        ClusterError::Degenerate(_) | ClusterError::TaskFailed(_) => {
            tracing::warn!("Reload produced no result: {}", error)
        }
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<P: Clusterable> ClusterState<P> {
    fn reload(
        &mut self,
        configuration: &Configuration,
        ticket: &ReloadTicket,
        viewport: Size,
        region: Region,
    ) -> Result<Difference<P>> {
        #[cfg(feature = "profiling")]
        profiling::scope!("manager::reload");

        let grid = partition(configuration, viewport, region)?;
        tracing::debug!(
            generation = ticket.generation,
            zoom_level = grid.zoom_level,
            cells = grid.cells.len(),
            "Partitioned visible rect"
        );
        ticket.check(ReloadStage::Partitioning)?;

        if configuration.should_distribute_annotations_on_same_coordinate() {
            self.distribute_overlapping(
                &grid.cells,
                configuration.distance_from_contested_location(),
            );
        }

        let tree = &self.tree;
        let buckets: Vec<Vec<&P>> = grid
            .cells
            .par_iter()
            .map(|cell| cell.points(tree))
            .collect();
        ticket.check(ReloadStage::Querying)?;

        let clustering_enabled = grid.zoom_level <= configuration.max_zoom_level();
        let annotations: Vec<Annotation<P>> = grid
            .cells
            .par_iter()
            .zip(buckets.par_iter())
            .flat_map_iter(|(cell, points)| {
                cluster_cell(cell.rect, points, clustering_enabled, configuration)
            })
            .collect();
        ticket.check(ReloadStage::Clustering)?;

        let (insertions, mut removals) = diff(&self.visible_annotations, annotations);
        if !configuration.should_remove_invisible_annotations() {
            // Leave annotations that scrolled off screen where they are
            removals.retain(|annotation| grid.covers(annotation.coordinate()));
        }
        ticket.check(ReloadStage::Diffing)?;

        self.visible_annotations
            .retain(|annotation| !removals.contains(annotation));
        self.visible_annotations.extend(insertions.iter().cloned());
        self.zoom_level = Some(grid.zoom_level);

        tracing::debug!(
            generation = ticket.generation,
            insertions = insertions.len(),
            removals = removals.len(),
            visible = self.visible_annotations.len(),
            "Applied reload"
        );
        Ok(Difference::new(insertions, removals))
    }

    /// Spread points sharing one exact coordinate on a circle of `distance` meters
    fn distribute_overlapping(&mut self, cells: &[GridCell], distance: f64) {
        #[cfg(feature = "profiling")]
        profiling::scope!("manager::distribute_overlapping");

        let on_grid: Vec<P> = cells
            .iter()
            .flat_map(|cell| cell.points(&self.tree))
            .cloned()
            .collect();

        let mut slots: HashMap<CoordinateKey, usize> = HashMap::new();
        let mut groups: Vec<Vec<P>> = Vec::new();
        for point in on_grid {
            let slot = *slots.entry(point.coordinate().key()).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[slot].push(point);
        }

        let world = self.tree.bounding_box();
        for group in groups.into_iter().filter(|group| group.len() > 1) {
            let step = std::f64::consts::TAU / group.len() as f64;
            tracing::trace!(count = group.len(), "Distributing coincident points");

            for (index, point) in group.iter().enumerate() {
                let Some(mut moved) = self.tree.remove(point) else {
                    continue;
                };
                let target = moved.coordinate().destination(step * index as f64, distance);
                // Near the poles the circle can leave the projectable world
                if utils::rect_contains_coordinate(&world, target) {
                    moved.set_coordinate(target);
                }
                self.tree.add(moved);
            }
        }
    }
}

/// Grid the visible region at the zoom level implied by `viewport`
fn partition(configuration: &Configuration, viewport: Size, region: Region) -> Result<Grid> {
    let visible_rect = region.to_map_rect();
    let zoom_scale = viewport.width / visible_rect.width();
    let zoom_level = utils::zoom_level(zoom_scale)
        .ok_or_else(|| ClusterError::Degenerate(format!("zoom scale is {zoom_scale}")))?;

    let cell_size = configuration.cell_size(zoom_level);
    let cells = grid_cells(visible_rect, zoom_scale / cell_size)?;

    Ok(Grid {
        visible_rect,
        zoom_level,
        cells,
    })
}

/// Square cells of edge `1 / scale_factor` covering `visible_rect`, column by column
///
/// Cells lying entirely past a world edge are shifted onto the other side. A cell
/// straddling the eastern edge keeps its rectangle and also queries the overhanging
/// part at the western side.
fn grid_cells(visible_rect: Rect<f64>, scale_factor: f64) -> Result<Vec<GridCell>> {
    if !scale_factor.is_finite() || scale_factor <= 0.0 {
        return Err(ClusterError::Degenerate(format!(
            "cell scale factor is {scale_factor}"
        )));
    }

    let min_x = (visible_rect.min().x * scale_factor).floor() as i64;
    let max_x = (visible_rect.max().x * scale_factor).floor() as i64;
    let min_y = (visible_rect.min().y * scale_factor).floor() as i64;
    let max_y = (visible_rect.max().y * scale_factor).floor() as i64;

    let columns = max_x.saturating_sub(min_x).saturating_add(1).max(0) as u64;
    let rows = max_y.saturating_sub(min_y).saturating_add(1).max(0) as u64;
    if columns.saturating_mul(rows) > MAX_GRID_CELLS {
        return Err(ClusterError::Degenerate(format!(
            "{columns}x{rows} grid cells"
        )));
    }

    let mut cells = Vec::with_capacity((columns * rows) as usize);
    for x in min_x..=max_x {
        // Edges from neighbouring indices so adjacent cells share them exactly
        let mut left = x as f64 / scale_factor;
        let mut right = (x + 1) as f64 / scale_factor;
        if left >= WORLD_SIZE {
            left -= WORLD_SIZE;
            right -= WORLD_SIZE;
        } else if right <= 0.0 {
            left += WORLD_SIZE;
            right += WORLD_SIZE;
        }

        // x = 0 is always a cell edge, so only the eastern edge can be straddled
        let overhang = (right > WORLD_SIZE).then_some((0.0, right - WORLD_SIZE));

        for y in min_y..=max_y {
            let top = y as f64 / scale_factor;
            let bottom = (y + 1) as f64 / scale_factor;
            cells.push(GridCell {
                rect: Rect::new(Coord { x: left, y: top }, Coord { x: right, y: bottom }),
                wrapped: overhang.map(|(from, to)| {
                    Rect::new(Coord { x: from, y: top }, Coord { x: to, y: bottom })
                }),
            });
        }
    }

    Ok(cells)
}

/// Annotations for the points of one cell
fn cluster_cell<P: Clusterable>(
    cell: Rect<f64>,
    points: &[&P],
    clustering_enabled: bool,
    configuration: &Configuration,
) -> Vec<Annotation<P>> {
    let (candidates, standalone): (Vec<&P>, Vec<&P>) =
        points.iter().copied().partition(|point| point.should_cluster());

    let mut annotations: Vec<Annotation<P>> = standalone
        .into_iter()
        .map(|point| Annotation::Point(point.clone()))
        .collect();

    let should_cluster = clustering_enabled
        && !candidates.is_empty()
        && candidates.len() >= configuration.min_count_for_clustering();

    if should_cluster {
        let coordinates: Vec<Coordinate> =
            candidates.iter().map(|point| point.coordinate()).collect();
        let coordinate = configuration
            .cluster_position()
            .calculate_position(&coordinates, cell);
        let members = candidates.into_iter().cloned().collect();
        annotations.push(Annotation::Cluster(ClusterAnnotation::new(
            coordinate, members,
        )));
    } else {
        annotations.extend(
            candidates
                .into_iter()
                .map(|point| Annotation::Point(point.clone())),
        );
    }

    annotations
}

/// `(after - before, before - after)` by annotation equality
fn diff<P: Clusterable>(
    before: &[Annotation<P>],
    after: Vec<Annotation<P>>,
) -> (Vec<Annotation<P>>, Vec<Annotation<P>>) {
    let removals = before
        .iter()
        .filter(|annotation| !after.contains(annotation))
        .cloned()
        .collect();
    let insertions = after
        .into_iter()
        .filter(|annotation| !before.contains(annotation))
        .collect();
    (insertions, removals)
}
