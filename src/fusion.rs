// src/fusion.rs
//
// Per-frame target fusion: pick the single best detection among the
// allowed classes and estimate its ground distance and bearing, combining
// a pinhole width-based estimate with an optional homography projection.

use crate::types::{BoundingBox, Detection, GeometryConfig};
use anyhow::{Context, Result};
use nalgebra::{Matrix3, Vector3};
use std::fs;
use tracing::debug;

/// Which estimator produced the final distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMethod {
    /// Pinhole similar-triangles estimate from apparent box width.
    Width,
    /// Ground-plane projection of the contact point.
    Homography,
    /// Homography result failed the sanity check; width value used instead.
    WidthFallback,
}

/// The selected detection plus its derived distance/angle for one frame.
#[derive(Debug, Clone, Copy)]
pub struct FusedTarget {
    pub class_id: u32,
    pub bbox: BoundingBox,
    pub anchor: (i32, i32),
    pub distance_cm: f32,
    pub angle_deg: f32,
    pub method: DistanceMethod,
}

/// Pixel→ground-plane projective transform. Loaded once at startup and
/// shared read-only; valid only for points on the assumed flat ground.
#[derive(Debug, Clone)]
pub struct Homography {
    matrix: Matrix3<f64>,
}

impl Homography {
    pub fn new(matrix: Matrix3<f64>) -> Self {
        Self { matrix }
    }

    /// Load a 3×3 matrix stored as a JSON array of three rows.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read homography file {}", path))?;
        let rows: [[f64; 3]; 3] = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse homography file {}", path))?;
        let matrix = Matrix3::from_fn(|r, c| rows[r][c]);
        Ok(Self { matrix })
    }

    /// Project an image pixel to ground-plane (X, Y) in meters.
    pub fn pixel_to_ground(&self, x: f64, y: f64) -> (f64, f64) {
        let q = self.matrix * Vector3::new(x, y, 1.0);
        let w = q.z + 1e-9;
        (q.x / w, q.y / w)
    }
}

/// Distance from the camera foot to a ground point, in meters.
fn plane_distance_m(x: f64, y: f64) -> f64 {
    (x * x + y * y).sqrt()
}

/// Width-based pinhole distance. Always computable; degrades for distant,
/// occluded, or rotated objects.
pub fn width_distance_cm(box_w_px: i32, real_w_cm: f32, focal_px: f32) -> f32 {
    real_w_cm * focal_px / box_w_px.max(1) as f32
}

/// Select the nearest allowed-class detection and fuse its distance estimate.
///
/// Returns `None` when no detection survives the class filter — that is the
/// normal "no target" outcome, not an error. Ties on distance go to the
/// earliest detection in scan order.
pub fn select_target(
    detections: &[Detection],
    allowed_classes: &[u32],
    frame_w: u32,
    frame_h: u32,
    homography: Option<&Homography>,
    geometry: &GeometryConfig,
) -> Option<FusedTarget> {
    let center_x = frame_w as i32 / 2;
    let ground_row = (geometry.ground_row_ratio * frame_h as f32) as i32;

    let mut best: Option<FusedTarget> = None;

    for det in detections {
        if !allowed_classes.contains(&det.class_id) {
            continue;
        }

        let bbox = det.bbox.clip(frame_w, frame_h);
        let (anchor_x, anchor_y) = bbox.bottom_center();
        let angle_deg = (anchor_x - center_x) as f32 / frame_w as f32 * geometry.h_fov_deg;

        let width_cm = width_distance_cm(
            bbox.width_px(),
            geometry.real_object_width_cm,
            geometry.focal_length_px,
        );
        let mut distance_cm = width_cm;
        let mut method = DistanceMethod::Width;

        // Homography wins when the anchor plausibly touches the ground plane.
        if let Some(h) = homography {
            if anchor_y >= ground_row {
                let (gx, gy) = h.pixel_to_ground(anchor_x as f64, anchor_y as f64);
                let dist_m = plane_distance_m(gx, gy);
                distance_cm = (dist_m * 100.0) as f32;
                method = DistanceMethod::Homography;

                // Sanity check: a blown-up projection with a reasonable
                // width estimate means the contact-point assumption failed.
                if dist_m > geometry.hard_max_m as f64
                    && width_cm / 100.0 < geometry.soft_max_m
                {
                    distance_cm = width_cm;
                    method = DistanceMethod::WidthFallback;
                    debug!(
                        "homography distance {:.1}m rejected, using width {:.1}cm",
                        dist_m, width_cm
                    );
                }
            }
        }

        let candidate = FusedTarget {
            class_id: det.class_id,
            bbox,
            anchor: (anchor_x, anchor_y),
            distance_cm,
            angle_deg,
            method,
        };

        // Nearest-object policy; strict < keeps the earliest on ties.
        if best.map_or(true, |b| candidate.distance_cm < b.distance_cm) {
            best = Some(candidate);
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeometryConfig;

    fn geometry() -> GeometryConfig {
        GeometryConfig {
            focal_length_px: 115.0,
            real_object_width_cm: 6.5,
            h_fov_deg: 60.0,
            ground_row_ratio: 0.90,
            hard_max_m: 10.0,
            soft_max_m: 2.0,
            homography_path: None,
        }
    }

    fn det(class_id: u32, x1: i32, y1: i32, x2: i32, y2: i32) -> Detection {
        Detection {
            class_id,
            confidence: 0.9,
            bbox: BoundingBox::new(x1, y1, x2, y2),
        }
    }

    #[test]
    fn test_no_allowed_candidates_yields_none() {
        let dets = vec![det(1, 10, 10, 50, 50), det(2, 60, 60, 90, 90)];
        assert!(select_target(&dets, &[39], 640, 480, None, &geometry()).is_none());
        assert!(select_target(&[], &[39], 640, 480, None, &geometry()).is_none());
    }

    #[test]
    fn test_width_distance_strictly_decreasing_in_width() {
        let g = geometry();
        let mut prev = f32::INFINITY;
        for w in [1, 2, 5, 20, 100, 400] {
            let d = width_distance_cm(w, g.real_object_width_cm, g.focal_length_px);
            assert!(d < prev, "width {} should shrink distance", w);
            prev = d;
        }
    }

    #[test]
    fn test_bearing_sign_matches_pixel_offset() {
        let g = geometry();
        // Box right of center → positive bearing
        let right = select_target(&[det(39, 400, 100, 440, 200)], &[39], 640, 480, None, &g)
            .unwrap();
        assert!(right.angle_deg > 0.0);
        // Box left of center → negative bearing
        let left = select_target(&[det(39, 100, 100, 140, 200)], &[39], 640, 480, None, &g)
            .unwrap();
        assert!(left.angle_deg < 0.0);
    }

    #[test]
    fn test_nearest_candidate_wins() {
        // Wider box → nearer by the width estimate
        let far = det(39, 10, 10, 30, 50);
        let near = det(39, 100, 100, 300, 200);
        let t = select_target(&[far, near], &[39], 640, 480, None, &geometry()).unwrap();
        assert_eq!(t.bbox, near.bbox);
        assert_eq!(t.method, DistanceMethod::Width);
    }

    #[test]
    fn test_distance_tie_keeps_earliest() {
        let a = det(39, 10, 10, 110, 50);
        let b = det(39, 200, 10, 300, 50);
        let t = select_target(&[a, b], &[39], 640, 480, None, &geometry()).unwrap();
        assert_eq!(t.bbox, a.bbox.clip(640, 480));
    }

    #[test]
    fn test_homography_used_for_grounded_anchor() {
        // Scale-only homography: pixel (320, 470) → (3.2, 4.7) meters
        let h = Homography::new(Matrix3::new(
            0.01, 0.0, 0.0, //
            0.0, 0.01, 0.0, //
            0.0, 0.0, 1.0,
        ));
        let t = select_target(
            &[det(39, 300, 400, 340, 470)],
            &[39],
            640,
            480,
            Some(&h),
            &geometry(),
        )
        .unwrap();
        assert_eq!(t.method, DistanceMethod::Homography);
        let expected = (3.2f64 * 3.2 + 4.7 * 4.7).sqrt() * 100.0;
        assert!((t.distance_cm as f64 - expected).abs() < 1.0);
    }

    #[test]
    fn test_anchor_above_ground_row_skips_homography() {
        let h = Homography::new(Matrix3::identity());
        // Anchor row 200 < 0.9 * 480 = 432 → width method
        let t = select_target(
            &[det(39, 300, 100, 340, 200)],
            &[39],
            640,
            480,
            Some(&h),
            &geometry(),
        )
        .unwrap();
        assert_eq!(t.method, DistanceMethod::Width);
    }

    #[test]
    fn test_sanity_fallback_to_width() {
        // Projection that explodes: pixel (320, 470) → ~320 m out
        let h = Homography::new(Matrix3::new(
            1.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, //
            0.0, 0.0, 1.0,
        ));
        // Wide box → width distance 6.5*115/100 = 7.5 cm, well under soft max
        let t = select_target(
            &[det(39, 270, 400, 370, 470)],
            &[39],
            640,
            480,
            Some(&h),
            &geometry(),
        )
        .unwrap();
        assert_eq!(t.method, DistanceMethod::WidthFallback);
        let width_cm = width_distance_cm(100, 6.5, 115.0);
        assert!((t.distance_cm - width_cm).abs() < 1e-3);
    }

    #[test]
    fn test_pixel_to_ground_projective_divide() {
        // Last row scales w by 2 → coordinates halved
        let h = Homography::new(Matrix3::new(
            1.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, //
            0.0, 0.0, 2.0,
        ));
        let (x, y) = h.pixel_to_ground(4.0, 6.0);
        assert!((x - 2.0).abs() < 1e-6);
        assert!((y - 3.0).abs() < 1e-6);
    }
}
