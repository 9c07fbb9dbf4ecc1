//! Tiny-YOLOv2 face detector using ONNX Runtime via `ort`.
//!
//! Handles square-pad preprocessing, inference, grid decoding and NMS, then
//! maps boxes back to frame pixels.
use std::path::Path;

use ndarray::{s, Array4};

use crate::detection::domain::face_detection::{BoundingBox, FaceDetection};
use crate::detection::domain::face_detector::{DetectorError, DetectorOptions, FaceDetector};
use crate::shared::frame::Frame;

use super::execution_provider::{preferred_execution_providers, provider_label};

/// Per-channel mean subtracted before scaling by 1/256.
const MEAN_RGB: [f32; 3] = [117.001, 114.697, 97.404];

const PIXEL_SCALE: f32 = 256.0;

/// Anchor box sizes in grid cells.
const ANCHORS: [(f64, f64); 5] = [
    (1.603231, 2.094468),
    (6.041143, 7.080126),
    (2.882459, 3.518061),
    (4.266906, 5.178857),
    (9.041765, 10.66308),
];

/// Values per anchor: tx, ty, tw, th, objectness.
const BOX_ENCODING_SIZE: usize = 5;

const CHANNELS_PER_CELL: usize = ANCHORS.len() * BOX_ENCODING_SIZE;

/// Each output cell covers 32x32 input pixels.
const CELL_SIZE: u32 = 32;

const NMS_IOU_THRESH: f64 = 0.4;

/// Tiny face detector backed by an ONNX Runtime session.
pub struct OnnxTinyFaceDetector {
    session: ort::session::Session,
}

impl OnnxTinyFaceDetector {
    /// Load a tiny face detector ONNX model.
    ///
    /// The model must accept a dynamic or matching `[1, 3, S, S]` input.
    pub fn new(model_path: &Path) -> Result<Self, DetectorError> {
        log::debug!("Creating ONNX session ({})", provider_label());
        let session = ort::session::Session::builder()
            .map_err(backend)?
            .with_execution_providers(preferred_execution_providers())
            .map_err(backend)?
            .commit_from_file(model_path)
            .map_err(backend)?;
        Ok(Self { session })
    }
}

impl FaceDetector for OnnxTinyFaceDetector {
    fn detect(
        &mut self,
        frame: &Frame,
        options: &DetectorOptions,
    ) -> Result<Vec<FaceDetection>, DetectorError> {
        options.validate()?;
        if frame.is_empty() {
            return Err(DetectorError::EmptyFrame {
                width: frame.width(),
                height: frame.height(),
            });
        }
        let input_size = options.input_size.pixels();

        // 1. Preprocess: pad to square at top-left, resize, normalize
        let (input_tensor, scale) = to_input_tensor(frame, input_size);

        // 2. Inference
        let input_value = ort::value::Tensor::from_array(input_tensor).map_err(backend)?;
        let outputs = self
            .session
            .run(ort::inputs![input_value])
            .map_err(backend)?;
        if outputs.len() == 0 {
            return Err(DetectorError::UnexpectedOutput(
                "model produced no outputs".into(),
            ));
        }
        let tensor = outputs[0].try_extract_array::<f32>().map_err(backend)?;
        let shape = tensor.shape().to_vec();
        let (layout, grid) = grid_layout(&shape)?;
        if grid != grid_size(input_size) {
            log::warn!(
                "model output grid {grid}x{grid} does not match input size {input_size}; \
                 boxes are decoded against the output grid"
            );
        }
        let data: Vec<f32> = tensor.iter().copied().collect();

        // 3. Decode grid cells into relative boxes
        let mut raw = decode_grid(&data, layout, grid, options.score_threshold);

        // 4. NMS
        let kept = nms(&mut raw, NMS_IOU_THRESH);

        // 5. Relative -> frame pixels
        let faces = to_frame_detections(kept, input_size, scale, frame.width(), frame.height());

        log::debug!(
            "frame {}: {} face(s) above {:.2}",
            frame.index(),
            faces.len(),
            options.score_threshold
        );
        Ok(faces)
    }
}

fn backend(e: impl std::fmt::Display) -> DetectorError {
    DetectorError::Backend(e.to_string())
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Scale the frame so its longer side equals `target_size`, anchor it at the
/// top-left of a black square canvas and normalize.
///
/// Returns `(NCHW float32 tensor, scale)`.
fn to_input_tensor(frame: &Frame, target_size: u32) -> (Array4<f32>, f64) {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);

    let size = target_size as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (c, mean) in MEAN_RGB.iter().enumerate() {
        tensor.slice_mut(s![0, c, .., ..]).fill(-mean / PIXEL_SCALE);
    }

    let src_w = frame.width() as usize;
    let src_h = frame.height() as usize;

    // Nearest-neighbor resize into the top-left corner
    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let rgb = frame.rgb(src_x, src_y);
            for c in 0..3 {
                tensor[[0, c, y, x]] = (rgb[c] as f32 - MEAN_RGB[c]) / PIXEL_SCALE;
            }
        }
    }

    (tensor, scale)
}

// ---------------------------------------------------------------------------
// Grid decoding
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum GridLayout {
    /// `[1, anchors * 5, G, G]`
    Nchw,
    /// `[1, G, G, anchors * 5]`
    Nhwc,
}

fn grid_layout(shape: &[usize]) -> Result<(GridLayout, usize), DetectorError> {
    match shape {
        [1, c, g, h] if *c == CHANNELS_PER_CELL && g == h => Ok((GridLayout::Nchw, *g)),
        [1, g, h, c] if *c == CHANNELS_PER_CELL && g == h => Ok((GridLayout::Nhwc, *g)),
        _ => Err(DetectorError::UnexpectedOutput(format!(
            "expected [1, {CHANNELS_PER_CELL}, G, G] or [1, G, G, {CHANNELS_PER_CELL}], got {shape:?}"
        ))),
    }
}

#[derive(Clone, Debug)]
struct RawDetection {
    /// Box relative to the square network input, `[0, 1]`.
    rel: BoundingBox,
    score: f64,
}

fn sigmoid(x: f32) -> f64 {
    1.0 / (1.0 + (-(x as f64)).exp())
}

fn decode_grid(
    data: &[f32],
    layout: GridLayout,
    grid: usize,
    score_threshold: f64,
) -> Vec<RawDetection> {
    let value = |row: usize, col: usize, anchor: usize, field: usize| -> f32 {
        let channel = anchor * BOX_ENCODING_SIZE + field;
        match layout {
            GridLayout::Nchw => data[(channel * grid + row) * grid + col],
            GridLayout::Nhwc => data[(row * grid + col) * CHANNELS_PER_CELL + channel],
        }
    };

    let g = grid as f64;
    let mut dets = Vec::new();
    for row in 0..grid {
        for col in 0..grid {
            for (anchor, (aw, ah)) in ANCHORS.iter().enumerate() {
                let score = sigmoid(value(row, col, anchor, 4));
                if score <= score_threshold {
                    continue;
                }
                let cx = (col as f64 + sigmoid(value(row, col, anchor, 0))) / g;
                let cy = (row as f64 + sigmoid(value(row, col, anchor, 1))) / g;
                let w = (value(row, col, anchor, 2) as f64).exp() * aw / g;
                let h = (value(row, col, anchor, 3) as f64).exp() * ah / g;
                dets.push(RawDetection {
                    rel: BoundingBox::from_xywh(cx - w / 2.0, cy - h / 2.0, w, h),
                    score,
                });
            }
        }
    }
    dets
}

/// Expected output grid size for an input size.
fn grid_size(input_size: u32) -> usize {
    (input_size / CELL_SIZE) as usize
}

/// Map boxes relative to the square network input back to frame pixels.
///
/// Boxes are not clipped: a face reaching past a frame edge keeps its
/// negative or oversized coordinates. Boxes that miss the frame entirely are
/// dropped.
fn to_frame_detections(
    kept: Vec<RawDetection>,
    input_size: u32,
    scale: f64,
    frame_width: u32,
    frame_height: u32,
) -> Vec<FaceDetection> {
    let fw = frame_width as f64;
    let fh = frame_height as f64;
    let to_frame = input_size as f64 / scale;
    kept.into_iter()
        .map(|d| {
            let b = BoundingBox::new(
                d.rel.left * to_frame,
                d.rel.top * to_frame,
                d.rel.right * to_frame,
                d.rel.bottom * to_frame,
            );
            FaceDetection::new(b, frame_width, frame_height, d.score)
        })
        .filter(|f| {
            let b = &f.bounding_box;
            b.area() > 0.0 && b.right > 0.0 && b.left < fw && b.bottom > 0.0 && b.top < fh
        })
        .collect()
}

// ---------------------------------------------------------------------------
// NMS
// ---------------------------------------------------------------------------

/// Greedy NMS: sort by score descending, suppress overlapping boxes.
fn nms(dets: &mut [RawDetection], iou_thresh: f64) -> Vec<RawDetection> {
    dets.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<RawDetection> = Vec::new();
    for det in dets.iter() {
        if keep.iter().all(|k| k.rel.iou(&det.rel) <= iou_thresh) {
            keep.push(det.clone());
        }
    }
    keep
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
