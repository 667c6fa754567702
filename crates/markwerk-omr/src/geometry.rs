// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Planar geometry for region detection: polygon approximation of traced
// contours and the ordered, validated quadrilateral handed to rectification.

use imageproc::point::Point;
use markwerk_core::error::{MarkwerkError, Result};

/// Four corners of an answer block in source-image pixels.
///
/// Always stored clockwise from top-left; always convex with at least the
/// area it was validated against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quadrilateral {
    corners: [Point<f32>; 4],
}

impl Quadrilateral {
    /// Order `points` and validate them as a convex, non-degenerate
    /// quadrilateral of at least `min_area` square pixels.
    pub fn new(points: [Point<f32>; 4], min_area: f32) -> Result<Self> {
        let corners = order_corners(&points).ok_or_else(|| malformed("corner ordering is ambiguous"))?;

        if !is_convex(&corners) {
            return Err(malformed("polygon is not convex"));
        }
        let area = shoelace_area(&corners);
        if area < min_area {
            return Err(malformed(&format!("area {area:.0} below minimum {min_area:.0}")));
        }

        Ok(Self { corners })
    }

    /// Top-left, top-right, bottom-right, bottom-left.
    pub fn corners(&self) -> [Point<f32>; 4] {
        self.corners
    }

    pub fn area(&self) -> f32 {
        shoelace_area(&self.corners)
    }

    pub fn centroid(&self) -> Point<f32> {
        let (sx, sy) = self
            .corners
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        Point::new(sx / 4.0, sy / 4.0)
    }

    /// Axis-aligned bounds as `(min_x, min_y, max_x, max_y)`.
    pub fn bounds(&self) -> (f32, f32, f32, f32) {
        self.corners.iter().fold(
            (f32::MAX, f32::MAX, f32::MIN, f32::MIN),
            |(x0, y0, x1, y1), p| (x0.min(p.x), y0.min(p.y), x1.max(p.x), y1.max(p.y)),
        )
    }

    /// Whether `point` lies inside (or on the edge of) the quadrilateral.
    pub fn contains(&self, point: Point<f32>) -> bool {
        let mut sign = 0.0f32;
        for i in 0..4 {
            let a = self.corners[i];
            let b = self.corners[(i + 1) % 4];
            let cross = (b.x - a.x) * (point.y - a.y) - (b.y - a.y) * (point.x - a.x);
            if cross.abs() <= f32::EPSILON {
                continue;
            }
            if sign == 0.0 {
                sign = cross.signum();
            } else if cross.signum() != sign {
                return false;
            }
        }
        true
    }

    /// Corners as plain arrays, for reports.
    pub fn to_array(&self) -> [[f32; 2]; 4] {
        self.corners.map(|p| [p.x, p.y])
    }
}

fn malformed(reason: &str) -> MarkwerkError {
    MarkwerkError::MalformedQuadrilateral {
        region: None,
        reason: reason.to_owned(),
    }
}

/// Identify top-left, top-right, bottom-right and bottom-left by coordinate
/// sum and difference. Returns `None` when two roles resolve to the same
/// point.
pub fn order_corners(points: &[Point<f32>; 4]) -> Option<[Point<f32>; 4]> {
    let pick = |key: &dyn Fn(&Point<f32>) -> f32| -> usize {
        let mut best = 0;
        for i in 1..4 {
            if key(&points[i]) < key(&points[best]) {
                best = i;
            }
        }
        best
    };

    let top_left = pick(&|p| p.x + p.y);
    let bottom_right = pick(&|p| -(p.x + p.y));
    let top_right = pick(&|p| p.y - p.x);
    let bottom_left = pick(&|p| p.x - p.y);

    let indices = [top_left, top_right, bottom_right, bottom_left];
    for i in 0..4 {
        for j in (i + 1)..4 {
            if indices[i] == indices[j] {
                return None;
            }
        }
    }
    Some(indices.map(|i| points[i]))
}

/// Area of a simple polygon by the shoelace formula.
pub fn shoelace_area(points: &[Point<f32>]) -> f32 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut area = 0.0f32;
    for i in 0..n {
        let j = (i + 1) % n;
        area += points[i].x * points[j].y;
        area -= points[j].x * points[i].y;
    }
    area.abs() / 2.0
}

/// True when every turn of the closed polygon has the same, non-zero
/// orientation.
pub fn is_convex(points: &[Point<f32>]) -> bool {
    let n = points.len();
    if n < 3 {
        return false;
    }
    let mut sign = 0.0f32;
    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        let c = points[(i + 2) % n];
        let cross = (b.x - a.x) * (c.y - b.y) - (b.y - a.y) * (c.x - b.x);
        if cross.abs() <= f32::EPSILON {
            return false;
        }
        if sign == 0.0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return false;
        }
    }
    true
}

/// Length of the closed curve through `points`.
pub fn closed_perimeter(points: &[Point<f32>]) -> f32 {
    let n = points.len();
    if n < 2 {
        return 0.0;
    }
    (0..n).map(|i| distance(points[i], points[(i + 1) % n])).sum()
}

fn distance(a: Point<f32>, b: Point<f32>) -> f32 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

/// Perpendicular distance from `p` to the line through `a` and `b`.
fn point_to_line_distance(p: Point<f32>, a: Point<f32>, b: Point<f32>) -> f32 {
    let length = distance(a, b);
    if length <= f32::EPSILON {
        return distance(p, a);
    }
    ((b.x - a.x) * (a.y - p.y) - (a.x - p.x) * (b.y - a.y)).abs() / length
}

/// Simplify a closed contour with Douglas-Peucker, then drop vertices that
/// sit within `epsilon` of the line joining their neighbours.
///
/// The curve is split at the point farthest from the first point so the
/// start of the trace never survives as a spurious vertex on its own.
pub fn approximate_closed_polygon(points: &[Point<f32>], epsilon: f32) -> Vec<Point<f32>> {
    if points.len() <= 3 {
        return points.to_vec();
    }

    let origin = points[0];
    let far = (1..points.len())
        .max_by(|&a, &b| {
            distance(origin, points[a])
                .partial_cmp(&distance(origin, points[b]))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or(points.len() / 2);

    // Walk the loop as an open chain ending back at the origin.
    let mut chain = points.to_vec();
    chain.push(origin);
    let last = chain.len() - 1;

    let mut keep = vec![false; chain.len()];
    keep[0] = true;
    keep[far] = true;
    mark_douglas_peucker(&chain, 0, far, epsilon, &mut keep);
    mark_douglas_peucker(&chain, far, last, epsilon, &mut keep);

    let simplified: Vec<Point<f32>> = (0..last).filter(|&i| keep[i]).map(|i| chain[i]).collect();
    drop_collinear(simplified, epsilon)
}

/// Iterative Douglas-Peucker over `chain[start..=end]`, marking the vertices
/// to keep.
fn mark_douglas_peucker(chain: &[Point<f32>], start: usize, end: usize, epsilon: f32, keep: &mut [bool]) {
    let mut stack = vec![(start, end)];
    while let Some((s, e)) = stack.pop() {
        if e <= s + 1 {
            continue;
        }
        let mut max_dist = 0.0f32;
        let mut max_index = s;
        for i in (s + 1)..e {
            let d = point_to_line_distance(chain[i], chain[s], chain[e]);
            if d > max_dist {
                max_dist = d;
                max_index = i;
            }
        }
        if max_dist > epsilon {
            keep[max_index] = true;
            stack.push((s, max_index));
            stack.push((max_index, e));
        }
    }
}

fn drop_collinear(mut polygon: Vec<Point<f32>>, epsilon: f32) -> Vec<Point<f32>> {
    while polygon.len() > 3 {
        let n = polygon.len();
        let weakest = (0..n)
            .map(|i| {
                let prev = polygon[(i + n - 1) % n];
                let next = polygon[(i + 1) % n];
                (i, point_to_line_distance(polygon[i], prev, next))
            })
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        match weakest {
            Some((index, deviation)) if deviation < epsilon => {
                polygon.remove(index);
            }
            _ => break,
        }
    }
    polygon
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f32, y: f32) -> Point<f32> {
        Point::new(x, y)
    }

    /// Trace the boundary of an axis-aligned rectangle one pixel at a time,
    /// clockwise from `start_offset` pixels along the top edge.
    fn traced_rectangle(x0: f32, y0: f32, x1: f32, y1: f32, start_offset: usize) -> Vec<Point<f32>> {
        let mut pts = Vec::new();
        let mut x = x0;
        while x < x1 {
            pts.push(p(x, y0));
            x += 1.0;
        }
        let mut y = y0;
        while y < y1 {
            pts.push(p(x1, y));
            y += 1.0;
        }
        let mut x = x1;
        while x > x0 {
            pts.push(p(x, y1));
            x -= 1.0;
        }
        let mut y = y1;
        while y > y0 {
            pts.push(p(x0, y));
            y -= 1.0;
        }
        pts.rotate_left(start_offset);
        pts
    }

    #[test]
    fn shoelace_area_rectangle() {
        let area = shoelace_area(&[p(0.0, 0.0), p(10.0, 0.0), p(10.0, 5.0), p(0.0, 5.0)]);
        assert!((area - 50.0).abs() < 1e-3, "Expected 50.0, got {}", area);
    }

    /// Corners come back clockwise from top-left whatever the input order.
    #[test]
    fn order_corners_from_shuffled_input() {
        let shuffled = [p(90.0, 80.0), p(10.0, 12.0), p(12.0, 85.0), p(95.0, 8.0)];
        let ordered = order_corners(&shuffled).expect("distinct roles");
        assert_eq!(ordered[0], p(10.0, 12.0));
        assert_eq!(ordered[1], p(95.0, 8.0));
        assert_eq!(ordered[2], p(90.0, 80.0));
        assert_eq!(ordered[3], p(12.0, 85.0));
    }

    #[test]
    fn quadrilateral_rejects_tiny_area() {
        let corners = [p(0.0, 0.0), p(5.0, 0.0), p(5.0, 5.0), p(0.0, 5.0)];
        let err = Quadrilateral::new(corners, 100.0).expect_err("area 25 < 100");
        assert!(matches!(err, MarkwerkError::MalformedQuadrilateral { .. }));
    }

    #[test]
    fn quadrilateral_rejects_collapsed_corners() {
        let corners = [p(0.0, 0.0), p(50.0, 0.0), p(100.0, 0.0), p(0.0, 50.0)];
        assert!(Quadrilateral::new(corners, 1.0).is_err());
    }

    #[test]
    fn quadrilateral_contains_centroid_not_outside() {
        let quad = Quadrilateral::new(
            [p(10.0, 10.0), p(110.0, 14.0), p(106.0, 90.0), p(8.0, 86.0)],
            100.0,
        )
        .expect("valid quad");
        assert!(quad.contains(quad.centroid()));
        assert!(!quad.contains(p(200.0, 50.0)));
        let (x0, y0, x1, y1) = quad.bounds();
        assert_eq!((x0, y0, x1, y1), (8.0, 10.0, 110.0, 90.0));
    }

    #[test]
    fn convexity_detects_reflex_vertex() {
        let arrow = [p(0.0, 0.0), p(10.0, 5.0), p(0.0, 10.0), p(3.0, 5.0)];
        assert!(!is_convex(&arrow));
        let square = [p(0.0, 0.0), p(10.0, 0.0), p(10.0, 10.0), p(0.0, 10.0)];
        assert!(is_convex(&square));
    }

    /// A pixel-traced rectangle reduces to its four corners.
    #[test]
    fn approximation_recovers_rectangle_corners() {
        let trace = traced_rectangle(20.0, 30.0, 220.0, 130.0, 0);
        let epsilon = 0.02 * closed_perimeter(&trace);
        let polygon = approximate_closed_polygon(&trace, epsilon);
        assert_eq!(polygon.len(), 4, "got {polygon:?}");
        let quad = Quadrilateral::new([polygon[0], polygon[1], polygon[2], polygon[3]], 1.0)
            .expect("valid");
        assert_eq!(quad.corners()[0], p(20.0, 30.0));
        assert_eq!(quad.corners()[2], p(220.0, 130.0));
    }

    /// Starting the trace mid-edge must not leave an extra vertex behind.
    #[test]
    fn approximation_ignores_mid_edge_start() {
        let trace = traced_rectangle(0.0, 0.0, 150.0, 90.0, 60);
        let epsilon = 0.02 * closed_perimeter(&trace);
        let polygon = approximate_closed_polygon(&trace, epsilon);
        assert_eq!(polygon.len(), 4, "got {polygon:?}");
    }

    #[test]
    fn perimeter_of_unit_square() {
        let square = [p(0.0, 0.0), p(1.0, 0.0), p(1.0, 1.0), p(0.0, 1.0)];
        assert!((closed_perimeter(&square) - 4.0).abs() < 1e-6);
    }
}
