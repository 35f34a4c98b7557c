//! Haar cascade model: OpenCV XML loading and per-window evaluation.
//!
//! Reads the boosted-stump/tree cascade format written by
//! `opencv_traincascade` (e.g. `haarcascade_frontalface_default.xml`) and
//! evaluates variance-normalized Haar features over integral images.

use image::GrayImage;
use std::path::Path;
use thiserror::Error;

/// Subtracted from every stage threshold, matching the trainer's rounding.
const STAGE_THRESHOLD_EPS: f32 = 1e-5;

#[derive(Error, Debug)]
pub enum CascadeError {
    #[error("cascade file not found: {0}")]
    NotFound(String),
    #[error("failed to read cascade {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cascade XML: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("invalid cascade: {0}")]
    Invalid(String),
    #[error("unsupported cascade: {0}")]
    Unsupported(String),
}

#[derive(Debug, Clone, Copy)]
struct WeightedRect {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    weight: f32,
}

#[derive(Debug, Clone)]
struct HaarFeature {
    rects: Vec<WeightedRect>,
}

#[derive(Debug, Clone, Copy)]
struct Node {
    left: i32,
    right: i32,
    feature: usize,
    threshold: f32,
}

#[derive(Debug, Clone)]
struct WeakClassifier {
    nodes: Vec<Node>,
    leaves: Vec<f32>,
}

#[derive(Debug, Clone)]
struct Stage {
    threshold: f32,
    classifiers: Vec<WeakClassifier>,
}

/// A loaded Haar cascade with a fixed detection window.
#[derive(Debug, Clone)]
pub struct HaarCascade {
    window_width: u32,
    window_height: u32,
    stages: Vec<Stage>,
    features: Vec<HaarFeature>,
}

impl HaarCascade {
    /// Load a cascade from an OpenCV XML file.
    pub fn load(path: &Path) -> Result<Self, CascadeError> {
        if !path.exists() {
            return Err(CascadeError::NotFound(path.display().to_string()));
        }
        let xml = std::fs::read_to_string(path).map_err(|source| CascadeError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let cascade = Self::from_xml(&xml)?;

        tracing::info!(
            path = %path.display(),
            window = ?(cascade.window_width, cascade.window_height),
            stages = cascade.stages.len(),
            features = cascade.features.len(),
            "loaded Haar cascade"
        );

        Ok(cascade)
    }

    /// Parse a cascade from OpenCV XML text.
    pub fn from_xml(xml: &str) -> Result<Self, CascadeError> {
        let doc = roxmltree::Document::parse(xml)?;
        let cascade = child(doc.root_element(), "cascade")?;

        let stage_type = text(child(cascade, "stageType")?);
        if stage_type != "BOOST" {
            return Err(CascadeError::Unsupported(format!("stageType {stage_type}")));
        }
        let feature_type = text(child(cascade, "featureType")?);
        if feature_type != "HAAR" {
            return Err(CascadeError::Unsupported(format!("featureType {feature_type}")));
        }

        let window_width: u32 = parse_one(child(cascade, "width")?)?;
        let window_height: u32 = parse_one(child(cascade, "height")?)?;
        if window_width < 3 || window_height < 3 {
            return Err(CascadeError::Invalid(format!(
                "window {window_width}x{window_height} too small"
            )));
        }

        let features = items(child(cascade, "features")?)
            .map(|node| parse_feature(node, window_width, window_height))
            .collect::<Result<Vec<_>, _>>()?;

        let stages = items(child(cascade, "stages")?)
            .map(|node| parse_stage(node, features.len()))
            .collect::<Result<Vec<_>, _>>()?;

        if stages.is_empty() {
            return Err(CascadeError::Invalid("cascade has no stages".into()));
        }

        Ok(Self {
            window_width,
            window_height,
            stages,
            features,
        })
    }

    pub fn window_size(&self) -> (u32, u32) {
        (self.window_width, self.window_height)
    }

    /// Run every stage on the window whose top-left corner is `(x, y)`.
    ///
    /// Returns true only if all stages pass. The window must lie inside
    /// the image the integral was built from.
    pub fn passes(&self, integral: &IntegralImage, x: u32, y: u32) -> bool {
        // Variance normalization over the window minus a 1-pixel border.
        let inner_w = self.window_width - 2;
        let inner_h = self.window_height - 2;
        let area = (inner_w * inner_h) as f64;
        let sum = integral.sum(x + 1, y + 1, inner_w, inner_h) as f64;
        let sq_sum = integral.squared_sum(x + 1, y + 1, inner_w, inner_h) as f64;
        let nf = area * sq_sum - sum * sum;
        let norm = if nf > 0.0 { nf.sqrt() } else { 1.0 };

        for stage in &self.stages {
            let mut score = 0.0f32;
            for classifier in &stage.classifiers {
                let mut idx: i32 = 0;
                loop {
                    let node = &classifier.nodes[idx as usize];
                    let value = (self.feature_value(node.feature, integral, x, y) / norm) as f32;
                    idx = if value < node.threshold { node.left } else { node.right };
                    if idx <= 0 {
                        break;
                    }
                }
                score += classifier.leaves[(-idx) as usize];
            }
            if score < stage.threshold {
                return false;
            }
        }
        true
    }

    fn feature_value(&self, feature: usize, integral: &IntegralImage, x: u32, y: u32) -> f64 {
        self.features[feature]
            .rects
            .iter()
            .map(|r| r.weight as f64 * integral.sum(x + r.x, y + r.y, r.width, r.height) as f64)
            .sum()
    }
}

/// Summed-area tables of pixel values and squared pixel values.
pub struct IntegralImage {
    stride: usize,
    sum: Vec<u64>,
    squared: Vec<u64>,
}

impl IntegralImage {
    pub fn new(gray: &GrayImage) -> Self {
        let (width, height) = (gray.width() as usize, gray.height() as usize);
        let stride = width + 1;
        let mut sum = vec![0u64; stride * (height + 1)];
        let mut squared = vec![0u64; stride * (height + 1)];
        let data = gray.as_raw();

        for y in 0..height {
            let mut row_sum = 0u64;
            let mut row_sq = 0u64;
            for x in 0..width {
                let p = data[y * width + x] as u64;
                row_sum += p;
                row_sq += p * p;
                sum[(y + 1) * stride + x + 1] = sum[y * stride + x + 1] + row_sum;
                squared[(y + 1) * stride + x + 1] = squared[y * stride + x + 1] + row_sq;
            }
        }

        Self { stride, sum, squared }
    }

    pub fn sum(&self, x: u32, y: u32, width: u32, height: u32) -> u64 {
        Self::rect(&self.sum, self.stride, x, y, width, height)
    }

    pub fn squared_sum(&self, x: u32, y: u32, width: u32, height: u32) -> u64 {
        Self::rect(&self.squared, self.stride, x, y, width, height)
    }

    fn rect(table: &[u64], stride: usize, x: u32, y: u32, width: u32, height: u32) -> u64 {
        let (x0, y0) = (x as usize, y as usize);
        let (x1, y1) = (x0 + width as usize, y0 + height as usize);
        table[y1 * stride + x1] + table[y0 * stride + x0]
            - table[y0 * stride + x1]
            - table[y1 * stride + x0]
    }
}

fn parse_feature(
    node: roxmltree::Node<'_, '_>,
    window_width: u32,
    window_height: u32,
) -> Result<HaarFeature, CascadeError> {
    if let Some(tilted) = node.children().find(|n| n.has_tag_name("tilted")) {
        if text(tilted) != "0" {
            return Err(CascadeError::Unsupported("tilted Haar features".into()));
        }
    }

    let rects = items(child(node, "rects")?)
        .map(|r| {
            let values = parse_numbers(r)?;
            if values.len() != 5 {
                return Err(CascadeError::Invalid(format!(
                    "feature rect needs 5 values, got {}",
                    values.len()
                )));
            }
            let [x, y, w, h] = [values[0], values[1], values[2], values[3]].map(|v| v as u32);
            if x + w > window_width || y + h > window_height {
                return Err(CascadeError::Invalid(format!(
                    "feature rect {x},{y} {w}x{h} outside window"
                )));
            }
            Ok(WeightedRect {
                x,
                y,
                width: w,
                height: h,
                weight: values[4] as f32,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if rects.is_empty() {
        return Err(CascadeError::Invalid("feature has no rects".into()));
    }
    Ok(HaarFeature { rects })
}

fn parse_stage(node: roxmltree::Node<'_, '_>, feature_count: usize) -> Result<Stage, CascadeError> {
    let threshold: f32 = parse_one(child(node, "stageThreshold")?)?;

    let classifiers = items(child(node, "weakClassifiers")?)
        .map(|wc| {
            let raw_nodes = parse_numbers(child(wc, "internalNodes")?)?;
            let leaves: Vec<f32> = parse_numbers(child(wc, "leafValues")?)?
                .into_iter()
                .map(|v| v as f32)
                .collect();

            if raw_nodes.is_empty() || raw_nodes.len() % 4 != 0 {
                return Err(CascadeError::Invalid(format!(
                    "internalNodes length {} is not a multiple of 4",
                    raw_nodes.len()
                )));
            }

            let nodes: Vec<Node> = raw_nodes
                .chunks_exact(4)
                .map(|c| Node {
                    left: c[0] as i32,
                    right: c[1] as i32,
                    feature: c[2] as usize,
                    threshold: c[3] as f32,
                })
                .collect();

            for (i, n) in nodes.iter().enumerate() {
                if n.feature >= feature_count {
                    return Err(CascadeError::Invalid(format!(
                        "node references feature {} of {feature_count}",
                        n.feature
                    )));
                }
                for child_idx in [n.left, n.right] {
                    let in_range = if child_idx > 0 {
                        (child_idx as usize) < nodes.len()
                    } else {
                        ((-child_idx) as usize) < leaves.len()
                    };
                    if !in_range {
                        return Err(CascadeError::Invalid(format!(
                            "node child {child_idx} out of range"
                        )));
                    }
                    // Internal children must point forward so evaluation terminates.
                    if child_idx > 0 && (child_idx as usize) <= i {
                        return Err(CascadeError::Invalid(format!(
                            "node {i} links back to node {child_idx}"
                        )));
                    }
                }
            }

            Ok(WeakClassifier { nodes, leaves })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Stage {
        threshold: threshold - STAGE_THRESHOLD_EPS,
        classifiers,
    })
}

fn child<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
    name: &str,
) -> Result<roxmltree::Node<'a, 'input>, CascadeError> {
    node.children()
        .find(|n| n.has_tag_name(name))
        .ok_or_else(|| CascadeError::Invalid(format!("missing <{name}> in <{}>", node.tag_name().name())))
}

/// Element children (the `<_>` list items of the OpenCV format).
fn items<'a, 'input: 'a>(
    node: roxmltree::Node<'a, 'input>,
) -> impl Iterator<Item = roxmltree::Node<'a, 'input>> + 'a {
    node.children().filter(|n| n.is_element())
}

fn text<'a>(node: roxmltree::Node<'a, '_>) -> &'a str {
    node.text().unwrap_or("").trim()
}

fn parse_numbers(node: roxmltree::Node<'_, '_>) -> Result<Vec<f64>, CascadeError> {
    text(node)
        .split_whitespace()
        .map(|t| {
            t.parse::<f64>()
                .map_err(|_| CascadeError::Invalid(format!("bad number {t:?} in <{}>", node.tag_name().name())))
        })
        .collect()
}

fn parse_one<T: std::str::FromStr>(node: roxmltree::Node<'_, '_>) -> Result<T, CascadeError> {
    let raw = text(node);
    raw.parse::<T>()
        .map_err(|_| CascadeError::Invalid(format!("bad value {raw:?} in <{}>", node.tag_name().name())))
}

/// A single-stage 24x24 cascade whose one feature fires when the top half
/// of the window is brighter than the bottom half.
#[cfg(test)]
pub(crate) const TEST_CASCADE_XML: &str = r#"<?xml version="1.0"?>
<opencv_storage>
<cascade type_id="opencv-cascade-classifier">
  <stageType>BOOST</stageType>
  <featureType>HAAR</featureType>
  <height>24</height>
  <width>24</width>
  <stageParams>
    <maxWeakCount>1</maxWeakCount></stageParams>
  <featureParams>
    <maxCatCount>0</maxCatCount></featureParams>
  <stageNum>1</stageNum>
  <stages>
    <_>
      <maxWeakCount>1</maxWeakCount>
      <stageThreshold>0.</stageThreshold>
      <weakClassifiers>
        <_>
          <internalNodes>
            0 -1 0 5.0000000000000003e-02</internalNodes>
          <leafValues>
            -1. 1.</leafValues></_></weakClassifiers></_></stages>
  <features>
    <_>
      <rects>
        <_>
          0 0 24 24 -1.</_>
        <_>
          0 0 24 12 2.</_></rects></_></features></cascade>
</opencv_storage>
"#;
