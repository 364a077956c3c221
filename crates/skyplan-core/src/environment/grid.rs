//! Planning grid: hierarchical cubic subdivision with embedded obstacles
//! and per-cell aggregated cost.

use chrono::{DateTime, Utc};
use nalgebra::{Point3, Vector3};
use rand::Rng;
use std::collections::{HashMap, HashSet};

use crate::geo::{LocalFrame, Position, POSITION_EPSILON_M};
use crate::geom::{AxisBox, CubicGrid, LineSegment};
use crate::intervals::{CostInterval, IntervalTree};
use crate::obstacle::Obstacle;
use crate::policy::{CostPolicy, RiskPolicy};

/// One cell of the subdivision. Cells may be refined into a child grid;
/// embedded obstacle intervals land at every level they intersect, so
/// queries at any level see the full cost.
#[derive(Debug, Clone)]
pub struct GridCell {
    pub bounds: AxisBox,
    pub intervals: IntervalTree,
    children: Option<ChildGrid>,
}

#[derive(Debug, Clone)]
struct ChildGrid {
    grid: CubicGrid,
    cells: Vec<GridCell>,
}

impl GridCell {
    fn new(bounds: AxisBox) -> Self {
        Self {
            bounds,
            intervals: IntervalTree::new(),
            children: None,
        }
    }

    fn refine(&mut self, divisions: (usize, usize, usize)) {
        let grid = CubicGrid::new(self.bounds, divisions);
        let mut cells = Vec::with_capacity(grid.cell_count());
        for i in 0..divisions.0 {
            for j in 0..divisions.1 {
                for k in 0..divisions.2 {
                    cells.push(GridCell::new(grid.cell_bounds((i, j, k))));
                }
            }
        }
        self.children = Some(ChildGrid { grid, cells });
    }

    fn embed(
        &mut self,
        obstacle: &Obstacle,
        frame: &LocalFrame,
        path: &mut Vec<usize>,
        affected: &mut Vec<Vec<usize>>,
    ) {
        if !obstacle.shape.intersects_box(frame, &self.bounds) {
            return;
        }
        self.intervals.add(obstacle.interval.clone());
        affected.push(path.clone());
        if let Some(children) = &mut self.children {
            for (index, cell) in children.cells.iter_mut().enumerate() {
                path.push(index);
                cell.embed(obstacle, frame, path, affected);
                path.pop();
            }
        }
    }

    fn cell_at_path(&mut self, path: &[usize]) -> Option<&mut GridCell> {
        match path.split_first() {
            None => Some(self),
            Some((&head, rest)) => self
                .children
                .as_mut()
                .and_then(|c| c.cells.get_mut(head))
                .and_then(|cell| cell.cell_at_path(rest)),
        }
    }

    /// Finest cells containing the point.
    fn lookup_finest<'a>(&'a self, p: &Point3<f64>, out: &mut Vec<&'a GridCell>) {
        if !self.bounds.contains(p) {
            return;
        }
        match &self.children {
            None => out.push(self),
            Some(children) => {
                let mut any = false;
                for cell in &children.cells {
                    if cell.bounds.contains(p) {
                        cell.lookup_finest(p, out);
                        any = true;
                    }
                }
                if !any {
                    out.push(self);
                }
            }
        }
    }
}

/// Hierarchical cubic planning grid over a local frame.
///
/// Graph vertices are the corner positions of the root subdivision; moves
/// connect axis-adjacent vertices.
#[derive(Debug, Clone)]
pub struct PlanningGrid {
    frame: LocalFrame,
    time: DateTime<Utc>,
    grid: CubicGrid,
    cells: Vec<GridCell>,
    normalizer: f64,
    intervals: IntervalTree,
    obstacles: HashMap<String, Obstacle>,
    affected: HashMap<String, Vec<Vec<usize>>>,
}

impl PlanningGrid {
    pub fn new(
        frame: LocalFrame,
        extent: Vector3<f64>,
        divisions: (usize, usize, usize),
        time: DateTime<Utc>,
    ) -> Self {
        let bounds = AxisBox::from_extent(extent);
        let grid = CubicGrid::new(bounds, divisions);
        let mut cells = Vec::with_capacity(grid.cell_count());
        for i in 0..divisions.0 {
            for j in 0..divisions.1 {
                for k in 0..divisions.2 {
                    cells.push(GridCell::new(grid.cell_bounds((i, j, k))));
                }
            }
        }
        Self {
            frame,
            time,
            grid,
            cells,
            normalizer: bounds.longest_edge(),
            intervals: IntervalTree::new(),
            obstacles: HashMap::new(),
            affected: HashMap::new(),
        }
    }

    pub fn frame(&self) -> &LocalFrame {
        &self.frame
    }

    pub fn globe(&self) -> &crate::geo::Globe {
        &self.frame.globe
    }

    pub fn set_globe(&mut self, globe: crate::geo::Globe) {
        self.frame.globe = globe;
    }

    /// Geographic center of the grid.
    pub fn center_position(&self) -> Position {
        self.frame.from_local(&self.grid.bounds.center())
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    pub fn set_time(&mut self, time: DateTime<Utc>) {
        self.time = time;
    }

    pub fn bounds(&self) -> &AxisBox {
        &self.grid.bounds
    }

    pub fn divisions(&self) -> (usize, usize, usize) {
        self.grid.divisions
    }

    /// Longest edge of the root box; divides distances into `[0,1]`-ish
    /// normalized units.
    pub fn normalizer(&self) -> f64 {
        self.normalizer
    }

    fn cell_index(&self, cell: (usize, usize, usize)) -> usize {
        let (_, s, t) = self.grid.divisions;
        (cell.0 * s + cell.1) * t + cell.2
    }

    /// Refine one root cell into a child subdivision.
    pub fn refine_cell(&mut self, cell: (usize, usize, usize), divisions: (usize, usize, usize)) {
        let index = self.cell_index(cell);
        self.cells[index].refine(divisions);
        // re-embed obstacles so the new children carry their cost
        let obstacles: Vec<Obstacle> = self.obstacles.values().cloned().collect();
        for obstacle in obstacles {
            self.unembed(obstacle.id());
            self.embed(obstacle);
        }
    }

    // ---- cost intervals -------------------------------------------------

    pub fn add_cost_interval(&mut self, interval: CostInterval) {
        self.intervals.add(interval);
    }

    pub fn remove_cost_interval(&mut self, interval: &CostInterval) -> bool {
        self.intervals.remove(interval)
    }

    /// Aggregate cost of a root cell over `[start, end]`: the cell's own
    /// intervals plus the environment-wide ones, deduplicated by id.
    pub fn cell_cost(&self, cell: (usize, usize, usize), start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
        let index = self.cell_index(cell);
        let mut seen: HashSet<&str> = HashSet::new();
        let mut cost = 0.0;
        for interval in self.cells[index]
            .intervals
            .search_range(start, end)
            .into_iter()
            .chain(self.intervals.search_range(start, end))
        {
            if seen.insert(interval.id.as_str()) {
                cost += interval.effective_cost();
            }
        }
        cost
    }

    /// Active aggregated cost of a cell at the environment's current time:
    /// `1` uniform base plus the unique active contributions.
    pub fn active_cell_cost(&self, cell: (usize, usize, usize)) -> f64 {
        1.0 + self.cell_cost(cell, self.time, self.time)
    }

    /// Environment-wide aggregated cost over `[start, end]`: the unique
    /// contributions of the global intervals and of every embedded
    /// obstacle active in the window.
    pub fn accumulated_cost(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut cost = 0.0;
        for interval in self.intervals.search_range(start, end) {
            if seen.insert(interval.id.as_str()) {
                cost += interval.effective_cost();
            }
        }
        for obstacle in self.obstacles.values() {
            if obstacle.active_during(start, end) && seen.insert(obstacle.id()) {
                cost += obstacle.interval.effective_cost();
            }
        }
        cost
    }

    // ---- obstacles ------------------------------------------------------

    /// Push an obstacle into every cell its shape intersects, recursively.
    /// Returns false when an obstacle with the same id is already embedded.
    pub fn embed(&mut self, obstacle: Obstacle) -> bool {
        if self.obstacles.contains_key(obstacle.id()) {
            return false;
        }
        let divisions = self.grid.divisions;
        let mut affected = Vec::new();
        for i in 0..divisions.0 {
            for j in 0..divisions.1 {
                for k in 0..divisions.2 {
                    let index = self.cell_index((i, j, k));
                    let frame = self.frame;
                    let mut path = vec![index];
                    self.cells[index].embed(&obstacle, &frame, &mut path, &mut affected);
                }
            }
        }
        tracing::debug!(id = %obstacle.id(), cells = affected.len(), "embedded obstacle");
        self.affected.insert(obstacle.id().to_string(), affected);
        self.obstacles.insert(obstacle.id().to_string(), obstacle);
        true
    }

    /// Reverse an embed by consulting the affected-cells map.
    pub fn unembed(&mut self, id: &str) -> bool {
        let Some(obstacle) = self.obstacles.remove(id) else {
            return false;
        };
        if let Some(paths) = self.affected.remove(id) {
            for path in paths {
                let (root, rest) = path.split_first().expect("non-empty cell path");
                if let Some(cell) = self.cells[*root].cell_at_path(rest) {
                    cell.intervals.remove(&obstacle.interval);
                }
            }
        }
        true
    }

    pub fn unembed_all(&mut self) {
        let ids: Vec<String> = self.obstacles.keys().cloned().collect();
        for id in ids {
            self.unembed(&id);
        }
    }

    pub fn is_embedded(&self, id: &str) -> bool {
        self.obstacles.contains_key(id)
    }

    pub fn obstacles(&self) -> impl Iterator<Item = &Obstacle> {
        self.obstacles.values()
    }

    // ---- vertices and adjacency ----------------------------------------

    fn vertex_extent(&self) -> Vector3<f64> {
        self.grid.cell_extent()
    }

    fn vertex_position(&self, v: (usize, usize, usize)) -> Position {
        let e = self.vertex_extent();
        let p = Point3::new(
            self.grid.bounds.min.x + v.0 as f64 * e.x,
            self.grid.bounds.min.y + v.1 as f64 * e.y,
            self.grid.bounds.min.z + v.2 as f64 * e.z,
        );
        self.frame.from_local(&p)
    }

    /// Grid vertex at a position, if the position coincides with one.
    fn vertex_of(&self, position: &Position) -> Option<(usize, usize, usize)> {
        let p = self.frame.to_local(position);
        if !self.grid.bounds.contains(&p) {
            return None;
        }
        let e = self.vertex_extent();
        let (r, s, t) = self.grid.divisions;
        let fi = (p.x - self.grid.bounds.min.x) / e.x;
        let fj = (p.y - self.grid.bounds.min.y) / e.y;
        let fk = (p.z - self.grid.bounds.min.z) / e.z;
        let (i, j, k) = (fi.round(), fj.round(), fk.round());
        if ((fi - i) * e.x).abs() > POSITION_EPSILON_M
            || ((fj - j) * e.y).abs() > POSITION_EPSILON_M
            || ((fk - k) * e.z).abs() > POSITION_EPSILON_M
        {
            return None;
        }
        let (i, j, k) = (i as usize, j as usize, k as usize);
        if i > r || j > s || k > t {
            return None;
        }
        Some((i, j, k))
    }

    /// Up to six axis-neighbor vertices of a grid vertex; empty when the
    /// position is not a vertex of this grid.
    pub fn neighbors(&self, position: &Position) -> Vec<Position> {
        let Some((i, j, k)) = self.vertex_of(position) else {
            return Vec::new();
        };
        let (r, s, t) = self.grid.divisions;
        let mut out = Vec::with_capacity(6);
        if i > 0 {
            out.push(self.vertex_position((i - 1, j, k)));
        }
        if i < r {
            out.push(self.vertex_position((i + 1, j, k)));
        }
        if j > 0 {
            out.push(self.vertex_position((i, j - 1, k)));
        }
        if j < s {
            out.push(self.vertex_position((i, j + 1, k)));
        }
        if k > 0 {
            out.push(self.vertex_position((i, j, k - 1)));
        }
        if k < t {
            out.push(self.vertex_position((i, j, k + 1)));
        }
        out
    }

    pub fn are_neighbors(&self, a: &Position, b: &Position) -> bool {
        match (self.vertex_of(a), self.vertex_of(b)) {
            (Some(u), Some(v)) => {
                let di = u.0.abs_diff(v.0);
                let dj = u.1.abs_diff(v.1);
                let dk = u.2.abs_diff(v.2);
                di + dj + dk == 1
            }
            _ => false,
        }
    }

    /// Corner vertices of the root cells containing a position; used to
    /// attach off-grid starts and goals to the graph.
    pub fn adjacent_waypoints(&self, position: &Position) -> Vec<Position> {
        let p = self.frame.to_local(position);
        let key = position.precision();
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for cell in self.grid.lookup_cells(&p) {
            for di in 0..=1 {
                for dj in 0..=1 {
                    for dk in 0..=1 {
                        let v = (cell.0 + di, cell.1 + dj, cell.2 + dk);
                        if seen.insert(v) {
                            let corner = self.vertex_position(v);
                            if corner.precision() != key {
                                out.push(corner);
                            }
                        }
                    }
                }
            }
        }
        out
    }

    pub fn contains(&self, position: &Position) -> bool {
        self.grid.bounds.contains(&self.frame.to_local(position))
    }

    /// Finest cells containing a position.
    pub fn lookup_cells(&self, position: &Position) -> Vec<&GridCell> {
        let p = self.frame.to_local(position);
        let mut out = Vec::new();
        for cell in self.grid.lookup_cells(&p) {
            self.cells[self.cell_index(cell)].lookup_finest(&p, &mut out);
        }
        out
    }

    // ---- distances and costs -------------------------------------------

    pub fn distance(&self, a: &Position, b: &Position) -> f64 {
        self.frame.globe.distance(a, b)
    }

    pub fn normalized_distance(&self, a: &Position, b: &Position) -> f64 {
        self.distance(a, b) / self.normalizer
    }

    /// Cost of a single move between adjacent grid vertices.
    ///
    /// The shared adjacent cells of the two vertices each contribute
    /// `1 + cell cost`; the cost policy combines them and the risk policy
    /// maps inadmissible hazard magnitudes to infinity.
    pub fn step_cost(
        &self,
        a: &Position,
        b: &Position,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cost_policy: CostPolicy,
        risk_policy: RiskPolicy,
    ) -> f64 {
        if !self.are_neighbors(a, b) {
            return f64::INFINITY;
        }
        let pa = self.frame.to_local(a);
        let pb = self.frame.to_local(b);
        let cells_a: HashSet<(usize, usize, usize)> =
            self.grid.lookup_cells(&pa).into_iter().collect();
        let shared: Vec<(usize, usize, usize)> = self
            .grid
            .lookup_cells(&pb)
            .into_iter()
            .filter(|c| cells_a.contains(c))
            .collect();

        let mut costs = Vec::with_capacity(shared.len());
        for cell in shared {
            let hazard = self.cell_cost(cell, start, end);
            if !risk_policy.satisfies(hazard) {
                return f64::INFINITY;
            }
            costs.push(1.0 + hazard);
        }
        cost_policy.combine(&costs)
    }

    /// Cost of a long leg between two arbitrary positions, expressed in
    /// units of the finest root-cell edge so that unit steps and legs
    /// compare on the same scale.
    pub fn leg_cost(
        &self,
        a: &Position,
        b: &Position,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cost_policy: CostPolicy,
        risk_policy: RiskPolicy,
    ) -> f64 {
        let pa = self.frame.to_local(a);
        let pb = self.frame.to_local(b);
        let segment = LineSegment::new(pa, pb);

        let divisions = self.grid.divisions;
        let mut costs = Vec::new();
        for i in 0..divisions.0 {
            for j in 0..divisions.1 {
                for k in 0..divisions.2 {
                    let bounds = self.grid.cell_bounds((i, j, k));
                    if bounds.intersects_segment(&segment) {
                        let hazard = self.cell_cost((i, j, k), start, end);
                        if !risk_policy.satisfies(hazard) {
                            return f64::INFINITY;
                        }
                        costs.push(1.0 + hazard);
                    }
                }
            }
        }
        if costs.is_empty() {
            return f64::INFINITY;
        }
        let e = self.grid.cell_extent();
        let unit = e.x.min(e.y).min(e.z);
        let length_units = (pb - pa).norm() / unit;
        length_units * cost_policy.combine(&costs)
    }

    // ---- conflicts and sampling ----------------------------------------

    pub fn check_conflict(&self, position: &Position, clearance: f64) -> bool {
        let p = self.frame.to_local(position);
        self.obstacles
            .values()
            .filter(|o| o.active_at(self.time))
            .any(|o| o.shape.conflicts_with_point(&self.frame, &p, clearance))
    }

    pub fn check_conflict_segment(&self, a: &Position, b: &Position, clearance: f64) -> bool {
        let segment = LineSegment::new(self.frame.to_local(a), self.frame.to_local(b));
        self.obstacles
            .values()
            .filter(|o| o.active_at(self.time))
            .any(|o| o.shape.conflicts_with_segment(&self.frame, &segment, clearance))
    }

    pub fn sample_random_position<R: Rng + ?Sized>(&self, rng: &mut R) -> Position {
        let b = &self.grid.bounds;
        let p = Point3::new(
            rng.gen_range(b.min.x..=b.max.x),
            rng.gen_range(b.min.y..=b.max.y),
            rng.gen_range(b.min.z..=b.max.z),
        );
        self.frame.from_local(&p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Globe;
    use crate::obstacle::ObstacleShape;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn unit_grid() -> PlanningGrid {
        let frame = LocalFrame::new(Position::new(0.0, 0.0, 0.0), Globe::default());
        PlanningGrid::new(frame, Vector3::new(10.0, 10.0, 10.0), (10, 10, 10), now())
    }

    fn vertex(grid: &PlanningGrid, i: usize, j: usize, k: usize) -> Position {
        grid.vertex_position((i, j, k))
    }

    #[test]
    fn interior_vertex_has_six_neighbors() {
        let grid = unit_grid();
        assert_eq!(grid.neighbors(&vertex(&grid, 5, 5, 5)).len(), 6);
        assert_eq!(grid.neighbors(&vertex(&grid, 0, 0, 0)).len(), 3);
    }

    #[test]
    fn axis_neighbors_only() {
        let grid = unit_grid();
        let origin = vertex(&grid, 0, 0, 0);
        assert!(grid.are_neighbors(&origin, &vertex(&grid, 1, 0, 0)));
        assert!(!grid.are_neighbors(&origin, &vertex(&grid, 1, 1, 0)));
        assert!(!grid.are_neighbors(&origin, &vertex(&grid, 2, 0, 0)));
    }

    #[test]
    fn uniform_step_cost_is_one() {
        let grid = unit_grid();
        let cost = grid.step_cost(
            &vertex(&grid, 0, 0, 0),
            &vertex(&grid, 1, 0, 0),
            now(),
            now(),
            CostPolicy::Average,
            RiskPolicy::Ignorance,
        );
        assert!((cost - 1.0).abs() < 1e-9);
    }

    #[test]
    fn embedded_obstacle_raises_step_cost_and_unembed_restores() {
        let mut grid = unit_grid();
        let frame = *grid.frame();
        let center = frame.from_local(&Point3::new(0.5, 0.5, 0.5));
        let obstacle = Obstacle::new(
            ObstacleShape::Sphere {
                center,
                radius_m: 0.4,
            },
            CostInterval::new("hazard", now() - chrono::Duration::hours(1), now() + chrono::Duration::hours(1), 40.0),
        );
        assert!(grid.embed(obstacle.clone()));
        assert!(!grid.embed(obstacle));

        let cost = grid.step_cost(
            &vertex(&grid, 0, 0, 0),
            &vertex(&grid, 1, 0, 0),
            now(),
            now(),
            CostPolicy::Maximum,
            RiskPolicy::Ignorance,
        );
        assert!((cost - 41.0).abs() < 1e-9);

        assert!(grid.unembed("hazard"));
        let cost = grid.step_cost(
            &vertex(&grid, 0, 0, 0),
            &vertex(&grid, 1, 0, 0),
            now(),
            now(),
            CostPolicy::Maximum,
            RiskPolicy::Ignorance,
        );
        assert!((cost - 1.0).abs() < 1e-9);
    }

    #[test]
    fn risk_policy_blocks_hazardous_steps() {
        let mut grid = unit_grid();
        let frame = *grid.frame();
        let center = frame.from_local(&Point3::new(0.5, 0.5, 0.5));
        grid.embed(Obstacle::new(
            ObstacleShape::Sphere {
                center,
                radius_m: 0.4,
            },
            CostInterval::new("hot", now(), now(), 100.0),
        ));
        let cost = grid.step_cost(
            &vertex(&grid, 0, 0, 0),
            &vertex(&grid, 1, 0, 0),
            now(),
            now(),
            CostPolicy::Minimum,
            RiskPolicy::Avoidance,
        );
        assert!(cost.is_infinite());
    }

    #[test]
    fn adjacent_waypoints_of_cell_interior() {
        let grid = unit_grid();
        let inside = grid.frame.from_local(&Point3::new(0.5, 0.5, 0.5));
        let adjacent = grid.adjacent_waypoints(&inside);
        assert_eq!(adjacent.len(), 8);
    }

    #[test]
    fn expired_obstacle_does_not_conflict() {
        let mut grid = unit_grid();
        let frame = *grid.frame();
        let center = frame.from_local(&Point3::new(5.0, 5.0, 5.0));
        grid.embed(Obstacle::new(
            ObstacleShape::Sphere {
                center,
                radius_m: 2.0,
            },
            CostInterval::new("stale", now() - chrono::Duration::hours(3), now() - chrono::Duration::hours(2), 10.0),
        ));
        assert!(!grid.check_conflict(&frame.from_local(&Point3::new(5.0, 5.0, 5.0)), 0.0));
    }
}
