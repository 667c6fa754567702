// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Region detection: finds the outlined answer blocks on a sheet and returns
// them as validated quadrilaterals in question order.

use image::GrayImage;
use imageproc::contours::{BorderType, find_contours};
use imageproc::point::Point;
use markwerk_core::config::{AreaBand, DetectionConfig};
use markwerk_core::error::{MarkwerkError, Result};
use tracing::{debug, info, instrument};

use crate::geometry::{Quadrilateral, approximate_closed_polygon, closed_perimeter};
use crate::layout::{LayoutProfile, RegionOrder};

/// Locates answer blocks in a sheet-level ink mask.
#[derive(Debug, Clone)]
pub struct RegionDetector {
    config: DetectionConfig,
}

impl RegionDetector {
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    /// Find exactly `profile.topology.regions` blocks, ordered so region index
    /// matches question numbering.
    #[instrument(skip_all, fields(layout = %profile.layout))]
    pub fn detect(&self, mask: &GrayImage, profile: &LayoutProfile) -> Result<Vec<Quadrilateral>> {
        let required = profile.topology.regions;
        let image_area = mask.width() as f32 * mask.height() as f32;

        let mut candidates = self.candidates(mask, profile.region.area_band, image_area);
        debug!(candidates = candidates.len(), "Quadrilateral candidates in area band");

        // Largest first, so blocks nested in an accepted one are dropped.
        candidates.sort_by(|a, b| b.area().total_cmp(&a.area()));
        let mut accepted: Vec<Quadrilateral> = Vec::with_capacity(required);
        for quad in candidates {
            if accepted.len() == required {
                break;
            }
            if accepted.iter().any(|outer| outer.contains(quad.centroid())) {
                continue;
            }
            accepted.push(quad);
        }

        if accepted.len() < required {
            return Err(MarkwerkError::RegionNotFound {
                layout: profile.layout,
                found: accepted.len(),
                required,
            });
        }

        let ordered = order_regions(accepted, profile.order, self.config.row_tolerance);

        let bands = &profile.region.region_bands;
        if !bands.is_empty() {
            let fitting = ordered
                .iter()
                .zip(bands)
                .filter(|(quad, band)| band.contains(quad.area(), image_area))
                .count();
            if fitting < required {
                return Err(MarkwerkError::RegionNotFound {
                    layout: profile.layout,
                    found: fitting,
                    required,
                });
            }
        }

        info!(regions = ordered.len(), "Answer regions detected");
        Ok(ordered)
    }

    /// Outer contours that approximate to a convex quadrilateral within the
    /// area band.
    fn candidates(&self, mask: &GrayImage, band: AreaBand, image_area: f32) -> Vec<Quadrilateral> {
        let mut quads = Vec::new();
        for contour in find_contours::<i32>(mask) {
            if contour.border_type != BorderType::Outer || contour.points.len() < 4 {
                continue;
            }
            let points: Vec<Point<f32>> = contour
                .points
                .iter()
                .map(|p| Point::new(p.x as f32, p.y as f32))
                .collect();

            let epsilon = self.config.approx_epsilon * closed_perimeter(&points);
            let polygon = approximate_closed_polygon(&points, epsilon);
            if polygon.len() != 4 {
                continue;
            }
            let quad = match Quadrilateral::new(
                [polygon[0], polygon[1], polygon[2], polygon[3]],
                self.config.min_quad_area,
            ) {
                Ok(quad) => quad,
                Err(err) => {
                    debug!(%err, "Rejected contour");
                    continue;
                }
            };
            if band.contains(quad.area(), image_area) {
                quads.push(quad);
            }
        }
        quads
    }
}

/// Put regions into question order.
pub fn order_regions(mut quads: Vec<Quadrilateral>, order: RegionOrder, row_tolerance: f32) -> Vec<Quadrilateral> {
    match order {
        RegionOrder::Single => quads,
        RegionOrder::TopToBottom => {
            quads.sort_by(|a, b| {
                let (ax, ay, _, _) = a.bounds();
                let (bx, by, _, _) = b.bounds();
                ay.total_cmp(&by).then(ax.total_cmp(&bx))
            });
            quads
        }
        RegionOrder::RowMajor => {
            if quads.is_empty() {
                return quads;
            }
            let mut heights: Vec<f32> = quads
                .iter()
                .map(|q| {
                    let (_, y0, _, y1) = q.bounds();
                    y1 - y0
                })
                .collect();
            heights.sort_by(f32::total_cmp);
            let tolerance = heights[heights.len() / 2] * row_tolerance;

            quads.sort_by(|a, b| a.centroid().y.total_cmp(&b.centroid().y));
            let mut rows: Vec<Vec<Quadrilateral>> = Vec::new();
            let mut row_start = f32::MIN;
            for quad in quads {
                let cy = quad.centroid().y;
                match rows.last_mut() {
                    Some(row) if cy - row_start <= tolerance => row.push(quad),
                    _ => {
                        row_start = cy;
                        rows.push(vec![quad]);
                    }
                }
            }
            rows.into_iter()
                .flat_map(|mut row| {
                    row.sort_by(|a, b| a.centroid().x.total_cmp(&b.centroid().x));
                    row
                })
                .collect()
        }
    }
}
