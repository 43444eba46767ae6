// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Planes and polygon utilities.

use crate::error::{Error, Result};
use nalgebra::{Point2, Point3, Vector3};

/// Plane definition: a point and a unit normal.
#[derive(Debug, Clone, Copy)]
pub struct Plane {
    /// Point on the plane
    pub point: Point3<f64>,
    /// Normal vector (normalized on construction)
    pub normal: Vector3<f64>,
}

impl Plane {
    /// Create a new plane. The normal is normalized.
    pub fn new(point: Point3<f64>, normal: Vector3<f64>) -> Self {
        Self {
            point,
            normal: normal.normalize(),
        }
    }

    /// Signed distance from point to plane.
    /// Positive = in front (normal side), negative = behind.
    pub fn signed_distance(&self, point: &Point3<f64>) -> f64 {
        (point - self.point).dot(&self.normal)
    }

    /// Check if point is in front of the plane.
    pub fn is_front(&self, point: &Point3<f64>) -> bool {
        self.signed_distance(point) >= 0.0
    }

    /// Check if point lies on the plane within `tol`.
    pub fn contains(&self, point: &Point3<f64>, tol: f64) -> bool {
        self.signed_distance(point).abs() <= tol
    }

    /// Intersect a parametric line `origin + t * direction` with the plane.
    /// Returns `None` when the line is parallel to the plane.
    pub fn intersect_line(
        &self,
        origin: &Point3<f64>,
        direction: &Vector3<f64>,
    ) -> Option<Point3<f64>> {
        let denom = direction.dot(&self.normal);
        if denom.abs() < 1e-12 {
            return None;
        }
        let t = (self.point - origin).dot(&self.normal) / denom;
        Some(origin + direction * t)
    }
}

/// Calculate the normal of a polygon from its vertices using Newell's method.
/// Falls back to +Z for degenerate input.
pub fn newell_normal(points: &[Point3<f64>]) -> Vector3<f64> {
    let n = points.len();
    if n < 3 {
        return Vector3::new(0.0, 0.0, 1.0);
    }

    let mut normal = Vector3::<f64>::zeros();
    for i in 0..n {
        let current = &points[i];
        let next = &points[(i + 1) % n];
        normal.x += (current.y - next.y) * (current.z + next.z);
        normal.y += (current.z - next.z) * (current.x + next.x);
        normal.z += (current.x - next.x) * (current.y + next.y);
    }

    match normal.try_normalize(1e-12) {
        Some(n) => n,
        None => Vector3::new(0.0, 0.0, 1.0),
    }
}

/// Project 3D points onto a 2D plane defined by a normal.
/// Returns 2D points and the coordinate system (u_axis, v_axis, origin).
pub fn project_to_2d(
    points_3d: &[Point3<f64>],
    normal: &Vector3<f64>,
) -> (Vec<Point2<f64>>, Vector3<f64>, Vector3<f64>, Point3<f64>) {
    if points_3d.is_empty() {
        return (
            Vec::new(),
            Vector3::zeros(),
            Vector3::zeros(),
            Point3::origin(),
        );
    }

    let origin = points_3d[0];

    // Pick the axis least parallel to the normal for a stable cross product
    let abs_x = normal.x.abs();
    let abs_y = normal.y.abs();
    let abs_z = normal.z.abs();

    let reference = if abs_x <= abs_y && abs_x <= abs_z {
        Vector3::new(1.0, 0.0, 0.0)
    } else if abs_y <= abs_z {
        Vector3::new(0.0, 1.0, 0.0)
    } else {
        Vector3::new(0.0, 0.0, 1.0)
    };

    let u_axis = normal.cross(&reference).normalize();
    let v_axis = normal.cross(&u_axis).normalize();

    let points_2d = points_3d
        .iter()
        .map(|p| {
            let v = p - origin;
            Point2::new(v.dot(&u_axis), v.dot(&v_axis))
        })
        .collect();

    (points_2d, u_axis, v_axis, origin)
}

/// Project 3D points using an existing coordinate system so that multiple
/// point sets share one 2D space.
pub fn project_to_2d_with_basis(
    points_3d: &[Point3<f64>],
    u_axis: &Vector3<f64>,
    v_axis: &Vector3<f64>,
    origin: &Point3<f64>,
) -> Vec<Point2<f64>> {
    points_3d
        .iter()
        .map(|p| {
            let v = p - origin;
            Point2::new(v.dot(u_axis), v.dot(v_axis))
        })
        .collect()
}

/// Signed area of a 2D polygon (shoelace). Positive for counter-clockwise
/// winding in the projection basis.
pub fn signed_area(points: &[Point2<f64>]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut area = 0.0;
    for i in 0..n {
        let p = &points[i];
        let q = &points[(i + 1) % n];
        area += p.x * q.y - q.x * p.y;
    }
    area * 0.5
}

/// Point-in-polygon test (ray casting, boundary counts as inside).
pub fn point_in_polygon(point: &Point2<f64>, polygon: &[Point2<f64>]) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let pi = &polygon[i];
        let pj = &polygon[j];

        // On-edge check: distance from point to segment below tolerance
        let edge = pj - pi;
        let to_point = point - pi;
        let len_sq = edge.norm_squared();
        if len_sq > 1e-24 {
            let t = (to_point.dot(&edge) / len_sq).clamp(0.0, 1.0);
            let closest = pi + edge * t;
            if (point - closest).norm_squared() < 1e-18 {
                return true;
            }
        }

        if (pi.y > point.y) != (pj.y > point.y) {
            let x_cross = pi.x + (point.y - pi.y) / (pj.y - pi.y) * (pj.x - pi.x);
            if point.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Check if a polygon is convex (all cross products share a sign).
fn is_convex(points: &[Point2<f64>]) -> bool {
    if points.len() < 3 {
        return false;
    }

    let n = points.len();
    let mut sign = 0i8;
    for i in 0..n {
        let p0 = &points[i];
        let p1 = &points[(i + 1) % n];
        let p2 = &points[(i + 2) % n];

        let cross = (p1.x - p0.x) * (p2.y - p1.y) - (p1.y - p0.y) * (p2.x - p1.x);
        if cross.abs() > 1e-10 {
            let current = if cross > 0.0 { 1i8 } else { -1i8 };
            if sign == 0 {
                sign = current;
            } else if sign != current {
                return false;
            }
        }
    }
    true
}

/// Simple fan triangulation for convex polygons.
fn fan_triangulate(n: usize) -> Vec<usize> {
    let mut indices = Vec::with_capacity((n - 2) * 3);
    for i in 1..n - 1 {
        indices.push(0);
        indices.push(i);
        indices.push(i + 1);
    }
    indices
}

/// Triangulate a simple polygon (no holes).
/// Returns triangle indices into the input points.
pub fn triangulate_polygon(points: &[Point2<f64>]) -> Result<Vec<usize>> {
    let n = points.len();
    if n < 3 {
        return Err(Error::Triangulation(
            "Need at least 3 points to triangulate".to_string(),
        ));
    }

    if n == 3 {
        return Ok(vec![0, 1, 2]);
    }
    if n == 4 {
        return Ok(vec![0, 1, 2, 0, 2, 3]);
    }
    if n <= 8 && is_convex(points) {
        return Ok(fan_triangulate(n));
    }

    let mut vertices = Vec::with_capacity(n * 2);
    for p in points {
        vertices.push(p.x);
        vertices.push(p.y);
    }

    let indices = earcutr::earcut(&vertices, &[], 2)
        .map_err(|e| Error::Triangulation(format!("{:?}", e)))?;
    Ok(indices)
}

/// Triangulate a polygon with holes.
/// Returns triangle indices into the combined vertex array (outer + holes).
pub fn triangulate_polygon_with_holes(
    outer: &[Point2<f64>],
    holes: &[Vec<Point2<f64>>],
) -> Result<Vec<usize>> {
    if outer.len() < 3 {
        return Err(Error::Triangulation(
            "Need at least 3 points in outer boundary".to_string(),
        ));
    }

    let valid_holes: Vec<&Vec<Point2<f64>>> = holes.iter().filter(|h| h.len() >= 3).collect();
    if valid_holes.is_empty() {
        return triangulate_polygon(outer);
    }

    let total_points: usize = outer.len() + valid_holes.iter().map(|h| h.len()).sum::<usize>();
    let mut vertices = Vec::with_capacity(total_points * 2);
    for p in outer {
        vertices.push(p.x);
        vertices.push(p.y);
    }

    let mut hole_indices = Vec::with_capacity(valid_holes.len());
    for hole in valid_holes {
        hole_indices.push(vertices.len() / 2);
        for p in hole {
            vertices.push(p.x);
            vertices.push(p.y);
        }
    }

    let indices = earcutr::earcut(&vertices, &hole_indices, 2)
        .map_err(|e| Error::Triangulation(format!("{:?}", e)))?;
    Ok(indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plane_signed_distance() {
        let plane = Plane::new(Point3::new(0.0, 0.0, 5.0), Vector3::new(0.0, 0.0, 2.0));
        assert!((plane.normal.norm() - 1.0).abs() < 1e-12);
        assert!((plane.signed_distance(&Point3::new(1.0, 2.0, 7.0)) - 2.0).abs() < 1e-12);
        assert!(!plane.is_front(&Point3::new(0.0, 0.0, 4.0)));
    }

    #[test]
    fn plane_line_intersection() {
        let plane = Plane::new(Point3::new(10.0, 0.0, 0.0), Vector3::new(1.0, 0.0, 0.0));
        let hit = plane
            .intersect_line(&Point3::origin(), &Vector3::new(1.0, 1.0, 0.0))
            .unwrap();
        assert!((hit.x - 10.0).abs() < 1e-12);
        assert!((hit.y - 10.0).abs() < 1e-12);

        // Parallel line
        assert!(plane
            .intersect_line(&Point3::origin(), &Vector3::new(0.0, 1.0, 0.0))
            .is_none());
    }

    #[test]
    fn newell_normal_square() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let normal = newell_normal(&points);
        assert!((normal.z - 1.0).abs() < 1e-9);
    }

    #[test]
    fn point_in_polygon_basics() {
        let square = vec![
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(10.0, 10.0),
            Point2::new(0.0, 10.0),
        ];
        assert!(point_in_polygon(&Point2::new(5.0, 5.0), &square));
        assert!(!point_in_polygon(&Point2::new(15.0, 5.0), &square));
        // Boundary counts as inside
        assert!(point_in_polygon(&Point2::new(10.0, 5.0), &square));
    }

    #[test]
    fn triangulate_quad() {
        let points = vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 1.0),
        ];
        let indices = triangulate_polygon(&points).unwrap();
        assert_eq!(indices.len(), 6);
    }

    #[test]
    fn triangulate_with_hole() {
        let outer = vec![
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(10.0, 10.0),
            Point2::new(0.0, 10.0),
        ];
        let hole = vec![
            Point2::new(3.0, 3.0),
            Point2::new(7.0, 3.0),
            Point2::new(7.0, 7.0),
            Point2::new(3.0, 7.0),
        ];
        let indices = triangulate_polygon_with_holes(&outer, &[hole]).unwrap();
        assert!(indices.len() > 6);
        assert_eq!(indices.len() % 3, 0);
    }
}
