use std::collections::{HashMap, HashSet};

use glam::Vec3;

use crate::index::{BoxFuture, IndexId, SpatialIndex, nearest};

/// A 2D cell coordinate on the XY plane (height is ignored for bucketing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellCoord {
    pub x: i32,
    pub y: i32,
}

impl CellCoord {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Uniform grid bucketing of indexed points.
///
/// Ids are assigned to cells from their XY position divided by `cell_size`.
/// A stream query visits the square of cells covering the search radius and
/// then filters candidates by true 3D distance. Cells emptied by deletes are
/// kept until [`SpatialIndex::optimise`] drops them.
#[derive(Debug, Clone)]
pub struct GridIndex {
    cell_size: f32,
    cells: HashMap<CellCoord, HashSet<IndexId>>,
    positions: HashMap<IndexId, Vec3>,
}

impl GridIndex {
    /// Create an empty grid with the given cell size.
    pub fn new(cell_size: f32) -> Self {
        assert!(
            cell_size.is_finite() && cell_size > 0.0,
            "cell_size must be positive"
        );
        Self {
            cell_size,
            cells: HashMap::new(),
            positions: HashMap::new(),
        }
    }

    /// Cell size used for this grid.
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Convert a world position to a cell coordinate.
    pub fn position_to_cell(&self, pos: Vec3) -> CellCoord {
        CellCoord {
            x: (pos.x / self.cell_size).floor() as i32,
            y: (pos.y / self.cell_size).floor() as i32,
        }
    }

    /// Ids within a square radius (in cells) of a center cell.
    ///
    /// Cell distances are taken in `i64` so centers far outside the world
    /// cannot overflow.
    pub fn ids_in_radius(&self, center: CellCoord, radius: i32) -> Vec<IndexId> {
        let radius = i64::from(radius.max(0));
        let side = 2 * radius + 1;
        let mut result = Vec::new();
        if side.saturating_mul(side) > self.cells.len() as i64 {
            // Fewer occupied cells than cells in the square: scan what exists.
            for (coord, ids) in &self.cells {
                let dx = i64::from(coord.x) - i64::from(center.x);
                let dy = i64::from(coord.y) - i64::from(center.y);
                if dx.abs() <= radius && dy.abs() <= radius {
                    result.extend(ids.iter().copied());
                }
            }
        } else {
            for dx in -radius..=radius {
                for dy in -radius..=radius {
                    let x = i32::try_from(i64::from(center.x) + dx);
                    let y = i32::try_from(i64::from(center.y) + dy);
                    let (Ok(x), Ok(y)) = (x, y) else {
                        continue;
                    };
                    if let Some(ids) = self.cells.get(&CellCoord::new(x, y)) {
                        result.extend(ids.iter().copied());
                    }
                }
            }
        }
        result
    }

    /// Number of cells currently allocated, empty ones included.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Total number of id placements across all cells.
    pub fn total_placements(&self) -> usize {
        self.cells.values().map(|s| s.len()).sum()
    }

    pub fn position(&self, id: IndexId) -> Option<Vec3> {
        self.positions.get(&id).copied()
    }
}

impl SpatialIndex for GridIndex {
    fn add(&mut self, id: IndexId, position: Vec3) -> bool {
        if self.positions.contains_key(&id) {
            return false;
        }
        let coord = self.position_to_cell(position);
        self.cells.entry(coord).or_default().insert(id);
        self.positions.insert(id, position);
        true
    }

    fn delete(&mut self, id: IndexId) -> bool {
        let Some(position) = self.positions.remove(&id) else {
            return false;
        };
        let coord = self.position_to_cell(position);
        if let Some(ids) = self.cells.get_mut(&coord) {
            ids.remove(&id);
        }
        true
    }

    fn stream(&self, position: Vec3, radius: f32, limit: usize) -> BoxFuture<'static, Vec<IndexId>> {
        let center = self.position_to_cell(position);
        // Float to int casts saturate; ids_in_radius copes with i32::MAX.
        let reach = (radius / self.cell_size).ceil().max(0.0) as i32;
        let candidates = self
            .ids_in_radius(center, reach)
            .into_iter()
            .filter_map(|id| self.positions.get(&id).map(|p| (id, *p)));
        let hits = nearest(candidates, position, radius, limit);
        Box::pin(std::future::ready(hits))
    }

    fn optimise(&mut self) {
        let before = self.cell_count();
        self.cells.retain(|_, ids| !ids.is_empty());
        for ids in self.cells.values_mut() {
            ids.shrink_to_fit();
        }
        self.cells.shrink_to_fit();
        self.positions.shrink_to_fit();
        debug_assert_eq!(self.total_placements(), self.positions.len());
        tracing::debug!(
            before,
            after = self.cell_count(),
            placements = self.total_placements(),
            "grid optimised"
        );
    }

    fn clear(&mut self) {
        self.cells.clear();
        self.positions.clear();
    }

    fn len(&self) -> usize {
        self.positions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_to_cell_basic() {
        let grid = GridIndex::new(16.0);
        let coord = grid.position_to_cell(Vec3::new(10.0, 10.0, 500.0));
        assert_eq!(coord, CellCoord::new(0, 0));

        let coord = grid.position_to_cell(Vec3::new(20.0, -5.0, 0.0));
        assert_eq!(coord, CellCoord::new(1, -1));
    }

    #[test]
    fn add_rejects_duplicate_ids() {
        let mut grid = GridIndex::new(16.0);
        assert!(grid.add(IndexId(1), Vec3::ZERO));
        assert!(!grid.add(IndexId(1), Vec3::ONE));
        assert_eq!(grid.len(), 1);
        assert_eq!(grid.position(IndexId(1)), Some(Vec3::ZERO));
    }

    #[test]
    fn delete_unknown_is_false() {
        let mut grid = GridIndex::new(16.0);
        assert!(!grid.delete(IndexId(3)));
        grid.add(IndexId(3), Vec3::ZERO);
        assert!(grid.delete(IndexId(3)));
        assert!(grid.is_empty());
    }

    #[test]
    fn ids_in_radius_collects_neighbours() {
        let mut grid = GridIndex::new(16.0);
        grid.add(IndexId(1), Vec3::ZERO);
        grid.add(IndexId(2), Vec3::new(20.0, 0.0, 0.0));

        assert_eq!(grid.ids_in_radius(CellCoord::new(0, 0), 0), vec![IndexId(1)]);
        let nearby = grid.ids_in_radius(CellCoord::new(0, 0), 1);
        assert!(nearby.contains(&IndexId(1)));
        assert!(nearby.contains(&IndexId(2)));
        assert!(grid.ids_in_radius(CellCoord::new(10, 10), 0).is_empty());
    }

    #[test]
    fn stream_filters_by_true_distance() {
        let mut grid = GridIndex::new(10.0);
        grid.add(IndexId(1), Vec3::new(3.0, 0.0, 0.0));
        grid.add(IndexId(2), Vec3::new(9.0, 9.0, 0.0));
        // Same cell column, far away vertically.
        grid.add(IndexId(3), Vec3::new(1.0, 1.0, 400.0));
        let hits = pollster::block_on(grid.stream(Vec3::ZERO, 10.0, 10));
        assert_eq!(hits, vec![IndexId(1)]);
        let hits = pollster::block_on(grid.stream(Vec3::ZERO, 13.0, 10));
        assert_eq!(hits, vec![IndexId(1), IndexId(2)]);
    }

    #[test]
    fn stream_reaches_beyond_one_cell() {
        let mut grid = GridIndex::new(5.0);
        for i in 0..20 {
            grid.add(IndexId(i), Vec3::new(i as f32 * 4.0, 0.0, 0.0));
        }
        let hits = pollster::block_on(grid.stream(Vec3::ZERO, 30.0, 100));
        assert_eq!(hits.len(), 8);
        assert_eq!(hits[0], IndexId(0));
        assert_eq!(hits[7], IndexId(7));
    }

    #[test]
    fn optimise_drops_empty_cells() {
        let mut grid = GridIndex::new(16.0);
        grid.add(IndexId(1), Vec3::ZERO);
        grid.add(IndexId(2), Vec3::new(100.0, 0.0, 0.0));
        grid.delete(IndexId(2));
        assert_eq!(grid.cell_count(), 2);
        grid.optimise();
        assert_eq!(grid.cell_count(), 1);
        assert_eq!(grid.total_placements(), 1);
    }

    #[test]
    fn far_away_centers_do_not_overflow() {
        let mut grid = GridIndex::new(1e-5);
        grid.add(IndexId(1), Vec3::new(19_999.0, 0.0, 0.0));
        grid.add(IndexId(2), Vec3::new(-19_999.0, 0.0, 0.0));
        let hits = pollster::block_on(grid.stream(Vec3::new(-19_999.0, 0.0, 0.0), 300.0, 10));
        assert_eq!(hits, vec![IndexId(2)]);

        assert_eq!(grid.ids_in_radius(CellCoord::new(0, 0), i32::MAX).len(), 2);
        let corner = CellCoord::new(i32::MIN, i32::MAX);
        assert!(grid.ids_in_radius(corner, 1).is_empty());
    }

    #[test]
    fn observer_far_outside_world_sees_nothing() {
        let mut grid = GridIndex::new(300.0);
        grid.add(IndexId(1), Vec3::new(10.0, 0.0, 0.0));
        let far = Vec3::new(-1e12, 0.0, 0.0);
        assert!(pollster::block_on(grid.stream(far, 300.0, 10)).is_empty());
    }

    #[test]
    #[should_panic(expected = "cell_size must be positive")]
    fn zero_cell_size_panics() {
        let _ = GridIndex::new(0.0);
    }
}
