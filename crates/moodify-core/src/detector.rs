//! Multi-scale Haar cascade face locator.
//!
//! Slides the cascade window over an image pyramid, then clusters raw hits
//! into face boxes. Only the first reported cluster is returned by
//! [`FaceLocator::locate`]; it is neither the largest nor the most confident.

use crate::cascade::{CascadeError, HaarCascade, IntegralImage};
use crate::frame;
use crate::types::FaceBox;
use image::{GrayImage, RgbImage};
use std::path::Path;

// --- Named constants (no magic numbers) ---
pub const DEFAULT_SCALE_FACTOR: f64 = 1.3;
pub const DEFAULT_MIN_NEIGHBORS: usize = 5;
const GROUP_EPS: f64 = 0.2;
/// Pyramid levels above this factor scan every pixel instead of every other.
const DENSE_STEP_FACTOR: f64 = 2.0;

/// Finds a single face region in an intensity image.
pub trait FaceLocator {
    fn locate(&self, gray: &GrayImage) -> Option<FaceBox>;

    /// Convert a color frame to intensity, then locate.
    fn locate_frame(&self, frame: &RgbImage) -> Option<FaceBox> {
        self.locate(&frame::to_intensity(frame))
    }
}

/// Integer rectangle used while grouping raw window hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Rect {
    x: i32,
    y: i32,
    width: i32,
    height: i32,
}

/// Haar cascade detector with fixed pyramid and grouping parameters.
pub struct CascadeLocator {
    cascade: HaarCascade,
    scale_factor: f64,
    min_neighbors: usize,
}

impl CascadeLocator {
    /// Load a cascade XML and use the default parameters (1.3, 5).
    pub fn load(cascade_path: &Path) -> Result<Self, CascadeError> {
        Ok(Self::new(HaarCascade::load(cascade_path)?))
    }

    pub fn new(cascade: HaarCascade) -> Self {
        Self {
            cascade,
            scale_factor: DEFAULT_SCALE_FACTOR,
            min_neighbors: DEFAULT_MIN_NEIGHBORS,
        }
    }

    /// All grouped detections, in the order the grouping reports them.
    pub fn detect_all(&self, gray: &GrayImage) -> Vec<FaceBox> {
        let (width, height) = gray.dimensions();
        let (win_w, win_h) = self.cascade.window_size();

        let mut hits = Vec::new();
        let mut factor = 1.0f64;
        loop {
            let scaled_win_w = (win_w as f64 * factor).round() as u32;
            let scaled_win_h = (win_h as f64 * factor).round() as u32;
            if scaled_win_w > width || scaled_win_h > height {
                break;
            }

            let scaled_w = (width as f64 / factor).round() as u32;
            let scaled_h = (height as f64 / factor).round() as u32;
            if scaled_w < win_w || scaled_h < win_h {
                break;
            }

            let resized;
            let level = if scaled_w == width && scaled_h == height {
                gray
            } else {
                resized = frame::resize_bilinear(gray, scaled_w, scaled_h);
                &resized
            };
            let integral = IntegralImage::new(level);
            let step = if factor > DENSE_STEP_FACTOR { 1 } else { 2 };

            let before = hits.len();
            for y in (0..=scaled_h - win_h).step_by(step) {
                for x in (0..=scaled_w - win_w).step_by(step) {
                    if self.cascade.passes(&integral, x, y) {
                        hits.push(Rect {
                            x: (x as f64 * factor).round() as i32,
                            y: (y as f64 * factor).round() as i32,
                            width: scaled_win_w as i32,
                            height: scaled_win_h as i32,
                        });
                    }
                }
            }
            tracing::trace!(factor, level = ?(scaled_w, scaled_h), hits = hits.len() - before, "cascade pyramid level");

            factor *= self.scale_factor;
        }

        let grouped = group_rectangles(&hits, self.min_neighbors, GROUP_EPS);
        tracing::debug!(raw = hits.len(), grouped = grouped.len(), "cascade detection");

        grouped
            .into_iter()
            .filter_map(|r| clamp_to_frame(r, width, height))
            .collect()
    }
}

impl FaceLocator for CascadeLocator {
    fn locate(&self, gray: &GrayImage) -> Option<FaceBox> {
        self.detect_all(gray).into_iter().next()
    }
}

fn clamp_to_frame(r: Rect, width: u32, height: u32) -> Option<FaceBox> {
    let x0 = r.x.clamp(0, width as i32);
    let y0 = r.y.clamp(0, height as i32);
    let x1 = (r.x + r.width).clamp(0, width as i32);
    let y1 = (r.y + r.height).clamp(0, height as i32);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(FaceBox {
        x: x0 as u32,
        y: y0 as u32,
        width: (x1 - x0) as u32,
        height: (y1 - y0) as u32,
    })
}

fn similar(a: &Rect, b: &Rect, eps: f64) -> bool {
    let delta = eps * (a.width.min(b.width) + a.height.min(b.height)) as f64 * 0.5;
    ((a.x - b.x).abs() as f64) <= delta
        && ((a.y - b.y).abs() as f64) <= delta
        && ((a.x + a.width - b.x - b.width).abs() as f64) <= delta
        && ((a.y + a.height - b.y - b.height).abs() as f64) <= delta
}

/// Cluster similar rectangles (union-find), average each cluster, and keep
/// clusters with more than `min_neighbors` members that are not nested
/// inside a stronger cluster. Cluster order follows the first member's
/// position in `rects`.
fn group_rectangles(rects: &[Rect], min_neighbors: usize, eps: f64) -> Vec<Rect> {
    if min_neighbors == 0 || rects.is_empty() {
        return rects.to_vec();
    }

    let n = rects.len();
    let mut parent: Vec<usize> = (0..n).collect();
    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    for i in 0..n {
        for j in (i + 1)..n {
            if similar(&rects[i], &rects[j], eps) {
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                if ri != rj {
                    parent[rj] = ri;
                }
            }
        }
    }

    // Label clusters in order of first appearance.
    let mut label_of_root = vec![usize::MAX; n];
    let mut sums: Vec<(i64, i64, i64, i64)> = Vec::new();
    let mut counts: Vec<usize> = Vec::new();
    for (i, r) in rects.iter().enumerate() {
        let root = find(&mut parent, i);
        if label_of_root[root] == usize::MAX {
            label_of_root[root] = sums.len();
            sums.push((0, 0, 0, 0));
            counts.push(0);
        }
        let label = label_of_root[root];
        let s = &mut sums[label];
        s.0 += r.x as i64;
        s.1 += r.y as i64;
        s.2 += r.width as i64;
        s.3 += r.height as i64;
        counts[label] += 1;
    }

    let averaged: Vec<Rect> = sums
        .iter()
        .zip(&counts)
        .map(|(s, &count)| {
            let inv = 1.0 / count as f64;
            Rect {
                x: (s.0 as f64 * inv).round() as i32,
                y: (s.1 as f64 * inv).round() as i32,
                width: (s.2 as f64 * inv).round() as i32,
                height: (s.3 as f64 * inv).round() as i32,
            }
        })
        .collect();

    let mut kept = Vec::new();
    for (i, r1) in averaged.iter().enumerate() {
        let n1 = counts[i];
        if n1 <= min_neighbors {
            continue;
        }
        let nested = averaged.iter().enumerate().any(|(j, r2)| {
            let n2 = counts[j];
            if j == i || n2 <= min_neighbors {
                return false;
            }
            let dx = (r2.width as f64 * eps).round() as i32;
            let dy = (r2.height as f64 * eps).round() as i32;
            r1.x >= r2.x - dx
                && r1.y >= r2.y - dy
                && r1.x + r1.width <= r2.x + r2.width + dx
                && r1.y + r1.height <= r2.y + r2.height + dy
                && (n2 > n1.max(3) || n1 < 3)
        });
        if !nested {
            kept.push(*r1);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::TEST_CASCADE_XML;
    use image::Luma;

    fn rect(x: i32, y: i32, w: i32, h: i32) -> Rect {
        Rect { x, y, width: w, height: h }
    }

    fn test_locator() -> CascadeLocator {
        CascadeLocator::new(HaarCascade::from_xml(TEST_CASCADE_XML).unwrap())
    }

    fn edge_image(width: u32, height: u32, top: u8, bottom: u8) -> GrayImage {
        GrayImage::from_fn(width, height, |_, y| Luma([if y < height / 2 { top } else { bottom }]))
    }

    #[test]
    fn test_similar_within_eps() {
        assert!(similar(&rect(0, 0, 24, 24), &rect(4, 4, 24, 24), 0.2));
        assert!(!similar(&rect(0, 0, 24, 24), &rect(5, 0, 24, 24), 0.2));
    }

    #[test]
    fn test_group_drops_sparse_clusters() {
        // Five hits is not more than min_neighbors = 5.
        let rects: Vec<Rect> = (0..5).map(|i| rect(i, 0, 24, 24)).collect();
        assert!(group_rectangles(&rects, 5, 0.2).is_empty());

        let rects: Vec<Rect> = (0..6).map(|i| rect(i, 0, 24, 24)).collect();
        let grouped = group_rectangles(&rects, 5, 0.2);
        assert_eq!(grouped.len(), 1);
        // Mean x of 0..=5 is 2.5, rounded away from zero.
        assert_eq!(grouped[0], rect(3, 0, 24, 24));
    }

    #[test]
    fn test_group_preserves_first_cluster_order() {
        let mut rects = Vec::new();
        // Small cluster listed first, large cluster second.
        rects.extend((0..6).map(|i| rect(200 + i, 200, 30, 30)));
        rects.extend((0..10).map(|i| rect(i, 0, 80, 80)));
        let grouped = group_rectangles(&rects, 5, 0.2);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].x, 203);
        assert_eq!(grouped[1].width, 80);
    }

    #[test]
    fn test_group_drops_nested_weaker_cluster() {
        let mut rects = Vec::new();
        rects.extend((0..12).map(|i| rect(i % 3, 0, 100, 100)));
        rects.extend((0..6).map(|_| rect(30, 30, 20, 20)));
        let grouped = group_rectangles(&rects, 5, 0.2);
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[0].width, 100);
    }

    #[test]
    fn test_group_threshold_zero_passes_through() {
        let rects = vec![rect(0, 0, 10, 10), rect(50, 50, 10, 10)];
        assert_eq!(group_rectangles(&rects, 0, 0.2), rects);
    }

    #[test]
    fn test_locator_uses_fixed_parameters() {
        let locator = test_locator();
        assert_eq!(locator.scale_factor, 1.3);
        assert_eq!(locator.min_neighbors, 5);
    }

    #[test]
    fn test_locate_none_on_blank_image() {
        let blank = GrayImage::from_pixel(64, 64, Luma([128]));
        assert_eq!(test_locator().locate(&blank), None);
    }

    #[test]
    fn test_locate_none_on_inverted_pattern() {
        let inverted = edge_image(64, 64, 30, 220);
        assert_eq!(test_locator().locate(&inverted), None);
    }

    #[test]
    fn test_locate_returns_box_within_bounds() {
        let gray = edge_image(64, 64, 220, 30);
        let found = test_locator().locate(&gray).expect("edge pattern should be detected");
        assert!(found.fits_within(64, 64), "box {found:?} outside 64x64");
    }

    #[test]
    fn test_locate_frame_converts_color() {
        let frame = RgbImage::from_fn(64, 64, |_, y| image::Rgb(if y < 32 { [220, 220, 220] } else { [30, 30, 30] }));
        let locator = test_locator();
        assert_eq!(locator.locate_frame(&frame), locator.locate(&edge_image(64, 64, 220, 30)));
        assert!(locator.locate_frame(&frame).is_some());
    }

    #[test]
    fn test_locate_none_when_image_smaller_than_window() {
        let tiny = edge_image(16, 16, 220, 30);
        assert_eq!(test_locator().locate(&tiny), None);
    }

    #[test]
    fn test_clamp_to_frame() {
        let clamped = clamp_to_frame(rect(-2, 5, 20, 20), 16, 16).unwrap();
        assert_eq!(clamped, FaceBox { x: 0, y: 5, width: 16, height: 11 });
        assert_eq!(clamp_to_frame(rect(20, 20, 5, 5), 16, 16), None);
    }
}
