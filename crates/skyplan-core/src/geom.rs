//! Cartesian geometry primitives in the environment's local frame.

use nalgebra::{Point3, Vector3};

/// Axis-aligned box in local frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisBox {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl AxisBox {
    pub fn new(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self {
            min: Point3::new(min.x.min(max.x), min.y.min(max.y), min.z.min(max.z)),
            max: Point3::new(min.x.max(max.x), min.y.max(max.y), min.z.max(max.z)),
        }
    }

    /// Box spanning the origin and an extent vector.
    pub fn from_extent(extent: Vector3<f64>) -> Self {
        Self::new(Point3::origin(), Point3::origin() + extent)
    }

    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    pub fn diagonal(&self) -> Vector3<f64> {
        self.max - self.min
    }

    /// Longest edge of the box, used as the distance normalizer.
    pub fn longest_edge(&self) -> f64 {
        let d = self.diagonal();
        d.x.max(d.y).max(d.z)
    }

    pub fn corners(&self) -> [Point3<f64>; 8] {
        let (lo, hi) = (self.min, self.max);
        [
            Point3::new(lo.x, lo.y, lo.z),
            Point3::new(hi.x, lo.y, lo.z),
            Point3::new(lo.x, hi.y, lo.z),
            Point3::new(hi.x, hi.y, lo.z),
            Point3::new(lo.x, lo.y, hi.z),
            Point3::new(hi.x, lo.y, hi.z),
            Point3::new(lo.x, hi.y, hi.z),
            Point3::new(hi.x, hi.y, hi.z),
        ]
    }

    pub fn contains(&self, p: &Point3<f64>) -> bool {
        const EPS: f64 = 1e-9;
        p.x >= self.min.x - EPS
            && p.x <= self.max.x + EPS
            && p.y >= self.min.y - EPS
            && p.y <= self.max.y + EPS
            && p.z >= self.min.z - EPS
            && p.z <= self.max.z + EPS
    }

    pub fn intersects_box(&self, other: &AxisBox) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Closest point of the box to `p`.
    pub fn clamp_point(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::new(
            p.x.clamp(self.min.x, self.max.x),
            p.y.clamp(self.min.y, self.max.y),
            p.z.clamp(self.min.z, self.max.z),
        )
    }

    pub fn intersects_sphere(&self, center: &Point3<f64>, radius: f64) -> bool {
        (self.clamp_point(center) - center).norm() <= radius
    }

    /// Vertical cylinder (axis parallel to +z) against box.
    pub fn intersects_cylinder(
        &self,
        center_xy: &Point3<f64>,
        radius: f64,
        base_z: f64,
        top_z: f64,
    ) -> bool {
        if top_z < self.min.z || base_z > self.max.z {
            return false;
        }
        let cx = center_xy.x.clamp(self.min.x, self.max.x);
        let cy = center_xy.y.clamp(self.min.y, self.max.y);
        let dx = cx - center_xy.x;
        let dy = cy - center_xy.y;
        (dx * dx + dy * dy).sqrt() <= radius
    }

    /// Parametric clip of a segment against the box (slab method).
    /// Returns the `[t_enter, t_exit]` sub-interval of `[0,1]`, if any.
    pub fn clip_segment(&self, segment: &LineSegment) -> Option<(f64, f64)> {
        let dir = segment.b - segment.a;
        let mut t_enter = 0.0_f64;
        let mut t_exit = 1.0_f64;

        for axis in 0..3 {
            let origin = segment.a[axis];
            let delta = dir[axis];
            let (lo, hi) = (self.min[axis], self.max[axis]);
            if delta.abs() <= f64::EPSILON {
                if origin < lo || origin > hi {
                    return None;
                }
            } else {
                let mut t0 = (lo - origin) / delta;
                let mut t1 = (hi - origin) / delta;
                if t0 > t1 {
                    std::mem::swap(&mut t0, &mut t1);
                }
                t_enter = t_enter.max(t0);
                t_exit = t_exit.min(t1);
                if t_enter > t_exit {
                    return None;
                }
            }
        }
        Some((t_enter, t_exit))
    }

    pub fn intersects_segment(&self, segment: &LineSegment) -> bool {
        self.clip_segment(segment).is_some()
    }
}

/// Cube with a given origin corner and edge length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cube {
    pub origin: Point3<f64>,
    pub edge: f64,
}

impl Cube {
    pub fn new(origin: Point3<f64>, edge: f64) -> Self {
        Self { origin, edge }
    }

    pub fn bounds(&self) -> AxisBox {
        AxisBox::new(
            self.origin,
            self.origin + Vector3::new(self.edge, self.edge, self.edge),
        )
    }
}

/// Regular subdivision of a box into `(r, s, t)` cells.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubicGrid {
    pub bounds: AxisBox,
    pub divisions: (usize, usize, usize),
}

impl CubicGrid {
    pub fn new(bounds: AxisBox, divisions: (usize, usize, usize)) -> Self {
        debug_assert!(divisions.0 > 0 && divisions.1 > 0 && divisions.2 > 0);
        Self { bounds, divisions }
    }

    pub fn cell_extent(&self) -> Vector3<f64> {
        let d = self.bounds.diagonal();
        Vector3::new(
            d.x / self.divisions.0 as f64,
            d.y / self.divisions.1 as f64,
            d.z / self.divisions.2 as f64,
        )
    }

    pub fn cell_count(&self) -> usize {
        self.divisions.0 * self.divisions.1 * self.divisions.2
    }

    pub fn cell_bounds(&self, cell: (usize, usize, usize)) -> AxisBox {
        let e = self.cell_extent();
        let min = Point3::new(
            self.bounds.min.x + cell.0 as f64 * e.x,
            self.bounds.min.y + cell.1 as f64 * e.y,
            self.bounds.min.z + cell.2 as f64 * e.z,
        );
        AxisBox::new(min, min + e)
    }

    /// Cells containing the point, inclusive of shared faces and corners
    /// (up to eight for an interior grid vertex).
    pub fn lookup_cells(&self, p: &Point3<f64>) -> Vec<(usize, usize, usize)> {
        if !self.bounds.contains(p) {
            return Vec::new();
        }
        let e = self.cell_extent();
        let mut axis_cells: [Vec<usize>; 3] = [Vec::new(), Vec::new(), Vec::new()];
        let divisions = [self.divisions.0, self.divisions.1, self.divisions.2];
        for axis in 0..3 {
            let offset = (p[axis] - self.bounds.min[axis]) / e[axis];
            let idx = offset.floor() as isize;
            let on_boundary = (offset - offset.round()).abs() < 1e-9;
            let rounded = offset.round() as isize;
            if on_boundary {
                if rounded > 0 {
                    axis_cells[axis].push((rounded - 1) as usize);
                }
                if (rounded as usize) < divisions[axis] {
                    axis_cells[axis].push(rounded as usize);
                }
            } else {
                let clamped = idx.clamp(0, divisions[axis] as isize - 1) as usize;
                axis_cells[axis].push(clamped);
            }
        }
        let mut cells = Vec::new();
        for &i in &axis_cells[0] {
            for &j in &axis_cells[1] {
                for &k in &axis_cells[2] {
                    cells.push((i, j, k));
                }
            }
        }
        cells
    }

    /// Up to six axis-neighbors of a cell.
    pub fn neighbors(&self, cell: (usize, usize, usize)) -> Vec<(usize, usize, usize)> {
        let (i, j, k) = cell;
        let (r, s, t) = self.divisions;
        let mut out = Vec::with_capacity(6);
        if i > 0 {
            out.push((i - 1, j, k));
        }
        if i + 1 < r {
            out.push((i + 1, j, k));
        }
        if j > 0 {
            out.push((i, j - 1, k));
        }
        if j + 1 < s {
            out.push((i, j + 1, k));
        }
        if k > 0 {
            out.push((i, j, k - 1));
        }
        if k + 1 < t {
            out.push((i, j, k + 1));
        }
        out
    }
}

/// Straight line segment between two local-frame points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSegment {
    pub a: Point3<f64>,
    pub b: Point3<f64>,
}

impl LineSegment {
    pub fn new(a: Point3<f64>, b: Point3<f64>) -> Self {
        Self { a, b }
    }

    pub fn length(&self) -> f64 {
        (self.b - self.a).norm()
    }

    pub fn point_at(&self, t: f64) -> Point3<f64> {
        self.a + (self.b - self.a) * t
    }

    /// Minimum distance from the segment to a point.
    pub fn distance_to_point(&self, p: &Point3<f64>) -> f64 {
        let d = self.b - self.a;
        let len_sq = d.norm_squared();
        if len_sq < 1e-12 {
            return (p - self.a).norm();
        }
        let t = ((p - self.a).dot(&d) / len_sq).clamp(0.0, 1.0);
        (p - self.point_at(t)).norm()
    }

    /// Minimum distance from the segment to a vertical cylinder axis,
    /// restricted to the altitude band of the cylinder.
    pub fn distance_to_vertical_axis(
        &self,
        axis_xy: &Point3<f64>,
        base_z: f64,
        top_z: f64,
    ) -> f64 {
        // clip to the altitude band first
        let (za, zb) = (self.a.z, self.b.z);
        let (t0, t1) = if (zb - za).abs() <= f64::EPSILON {
            if za < base_z || za > top_z {
                return f64::INFINITY;
            }
            (0.0, 1.0)
        } else {
            let ta = (base_z - za) / (zb - za);
            let tb = (top_z - za) / (zb - za);
            let enter = ta.min(tb).max(0.0);
            let exit = ta.max(tb).min(1.0);
            if enter > exit {
                return f64::INFINITY;
            }
            (enter, exit)
        };

        let pa = self.point_at(t0);
        let pb = self.point_at(t1);
        let flat = LineSegment::new(Point3::new(pa.x, pa.y, 0.0), Point3::new(pb.x, pb.y, 0.0));
        flat.distance_to_point(&Point3::new(axis_xy.x, axis_xy.y, 0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_box_intersection() {
        let bounds = AxisBox::new(Point3::new(1.0, 1.0, 1.0), Point3::new(2.0, 2.0, 2.0));
        let through = LineSegment::new(Point3::new(0.0, 1.5, 1.5), Point3::new(3.0, 1.5, 1.5));
        let outside = LineSegment::new(Point3::new(0.0, 0.0, 0.0), Point3::new(0.5, 0.5, 0.5));
        assert!(bounds.intersects_segment(&through));
        assert!(!bounds.intersects_segment(&outside));
    }

    #[test]
    fn sphere_box_intersection() {
        let bounds = AxisBox::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        assert!(bounds.intersects_sphere(&Point3::new(1.5, 0.5, 0.5), 0.6));
        assert!(!bounds.intersects_sphere(&Point3::new(2.0, 0.5, 0.5), 0.5));
    }

    #[test]
    fn grid_lookup_on_vertex_returns_shared_cells() {
        let grid = CubicGrid::new(
            AxisBox::from_extent(Vector3::new(10.0, 10.0, 10.0)),
            (10, 10, 10),
        );
        // interior vertex shared by eight cells
        let cells = grid.lookup_cells(&Point3::new(5.0, 5.0, 5.0));
        assert_eq!(cells.len(), 8);
        // interior of a cell
        let cells = grid.lookup_cells(&Point3::new(0.5, 0.5, 0.5));
        assert_eq!(cells, vec![(0, 0, 0)]);
        // corner of the whole grid
        let cells = grid.lookup_cells(&Point3::new(0.0, 0.0, 0.0));
        assert_eq!(cells, vec![(0, 0, 0)]);
    }

    #[test]
    fn grid_cell_neighbors_at_corner() {
        let grid = CubicGrid::new(
            AxisBox::from_extent(Vector3::new(10.0, 10.0, 10.0)),
            (10, 10, 10),
        );
        assert_eq!(grid.neighbors((0, 0, 0)).len(), 3);
        assert_eq!(grid.neighbors((5, 5, 5)).len(), 6);
    }

    #[test]
    fn segment_distance_to_point() {
        let seg = LineSegment::new(Point3::origin(), Point3::new(10.0, 0.0, 0.0));
        assert!((seg.distance_to_point(&Point3::new(5.0, 3.0, 0.0)) - 3.0).abs() < 1e-9);
        assert!((seg.distance_to_point(&Point3::new(-4.0, 3.0, 0.0)) - 5.0).abs() < 1e-9);
    }
}
