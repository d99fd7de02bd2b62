//! Unscanned-area detection on a coarse floor-plan grid
//!
//! The footprint is cut into square cells. A cell is scanned when its center
//! lies inside any scanned bounding box; connected unscanned cells are
//! flood-filled into one rectangular extent each. This is an approximate set
//! difference meant for "where to scan next" guidance.

use spatial_common::{Bounds2D, Point2D};
use std::collections::VecDeque;

/// Most cells a footprint is cut into; larger footprints get coarser cells
const MAX_CELLS: f64 = 1_000_000.0;

/// Rectangular extents of unscanned space inside `footprint`
///
/// Extents are returned in row-major order of their first cell. A degenerate
/// or unbounded footprint, or a non-positive `cell_size`, yields no extents.
pub fn unscanned_areas(footprint: &Bounds2D, scanned: &[Bounds2D], cell_size: f64) -> Vec<Bounds2D> {
    let (width, height) = (footprint.width(), footprint.height());
    if !cell_size.is_finite() || cell_size <= 0.0 || !width.is_finite() || !height.is_finite() {
        return Vec::new();
    }
    if width <= 0.0 || height <= 0.0 {
        return Vec::new();
    }

    let grid = CellGrid::new(footprint, cell_size);
    let unscanned: Vec<bool> = (0..grid.rows)
        .flat_map(|row| (0..grid.cols).map(move |col| (col, row)))
        .map(|(col, row)| {
            let center = grid.center(col, row);
            !scanned.iter().any(|b| b.contains(&center))
        })
        .collect();

    let mut visited = vec![false; unscanned.len()];
    let mut gaps = Vec::new();

    for start in 0..unscanned.len() {
        if !unscanned[start] || visited[start] {
            continue;
        }
        visited[start] = true;
        let mut extent = grid.cell_bounds(start);
        let mut queue = VecDeque::from([start]);

        while let Some(index) = queue.pop_front() {
            extent = extent.union(&grid.cell_bounds(index));
            for next in grid.neighbors(index) {
                if unscanned[next] && !visited[next] {
                    visited[next] = true;
                    queue.push_back(next);
                }
            }
        }
        gaps.push(extent);
    }

    gaps
}

struct CellGrid {
    origin: Point2D,
    limit: Point2D,
    cell_size: f64,
    cols: usize,
    rows: usize,
}

impl CellGrid {
    /// Grid over `footprint`, growing `cell_size` until at most [`MAX_CELLS`]
    /// cells remain
    fn new(footprint: &Bounds2D, cell_size: f64) -> Self {
        let (width, height) = (footprint.width(), footprint.height());
        let mut cell_size = cell_size;
        loop {
            let cells = (width / cell_size).ceil() * (height / cell_size).ceil();
            if cells <= MAX_CELLS {
                break;
            }
            cell_size *= (cells / MAX_CELLS).sqrt().max(1.01);
        }
        Self {
            origin: footprint.min,
            limit: footprint.max,
            cell_size,
            cols: (width / cell_size).ceil() as usize,
            rows: (height / cell_size).ceil() as usize,
        }
    }

    /// Cell extent, clipped to the footprint on the far edges
    fn cell_bounds(&self, index: usize) -> Bounds2D {
        let (col, row) = (index % self.cols, index / self.cols);
        let min = Point2D::new(
            self.origin.x + col as f64 * self.cell_size,
            self.origin.y + row as f64 * self.cell_size,
        );
        let max = Point2D::new(
            (min.x + self.cell_size).min(self.limit.x),
            (min.y + self.cell_size).min(self.limit.y),
        );
        Bounds2D::new(min, max)
    }

    fn center(&self, col: usize, row: usize) -> Point2D {
        let b = self.cell_bounds(row * self.cols + col);
        Point2D::new((b.min.x + b.max.x) / 2.0, (b.min.y + b.max.y) / 2.0)
    }

    fn neighbors(&self, index: usize) -> impl Iterator<Item = usize> {
        let (col, row) = (index % self.cols, index / self.cols);
        let cols = self.cols;
        let rows = self.rows;
        [
            (col > 0).then(|| index - 1),
            (col + 1 < cols).then(|| index + 1),
            (row > 0).then(|| index - cols),
            (row + 1 < rows).then(|| index + cols),
        ]
        .into_iter()
        .flatten()
    }
}
