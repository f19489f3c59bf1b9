#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, RawDetection};
use crate::error::AnalysisError;

/// Score below which proposals are discarded before NMS.
const PRE_NMS_SCORE: f32 = 0.25;
/// Upper bound on detections returned per frame.
const MAX_DETECTIONS: usize = 300;

/// Tract-based backend for YOLOv8-style ONNX detectors.
///
/// Expects a `1x3xSxS` float input and a `1x(4+C)xN` output where each of the
/// `N` proposals carries `cx, cy, w, h` followed by `C` class scores.
/// Frames of any size are resampled to the model input; boxes are mapped back
/// to source-frame pixels.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    input_size: u32,
    iou_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_size,
            iou_threshold: 0.7,
        })
    }

    /// Override the default NMS IoU threshold.
    pub fn with_iou_threshold(mut self, threshold: f32) -> Self {
        self.iou_threshold = threshold;
        self
    }

    fn build_input(&self, pixels: &[u8], width: u32, height: u32) -> Result<Tensor> {
        let expected_len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if width == 0 || height == 0 || pixels.len() != expected_len {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{} frame, received {}",
                expected_len,
                width,
                height,
                pixels.len()
            ));
        }

        let side = self.input_size as usize;
        let (src_w, src_h) = (width as usize, height as usize);
        // Nearest-neighbour resample straight into NCHW.
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
            let sx = (x * src_w / side).min(src_w - 1);
            let sy = (y * src_h / side).min(src_h - 1);
            pixels[(sy * src_w + sx) * 3 + c] as f32 / 255.0
        });

        Ok(input.into_tensor())
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<RawDetection>> {
        let input = self.build_input(pixels, width, height)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| AnalysisError::MalformedDetection("model produced no outputs".into()))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        decode_output(view, self.input_size, width, height, self.iou_threshold)
    }

    fn warm_up(&mut self) -> Result<()> {
        let side = self.input_size;
        let blank = vec![0u8; (side as usize) * (side as usize) * 3];
        self.detect(&blank, side, side).map(|_| ())
    }
}

/// Turn a `[1, 4+C, N]` output into detections in source-frame pixels.
fn decode_output(
    view: tract_ndarray::ArrayViewD<'_, f32>,
    input_size: u32,
    width: u32,
    height: u32,
    iou_threshold: f32,
) -> Result<Vec<RawDetection>> {
    let shape = view.shape().to_vec();
    if shape.len() != 3 || shape[0] != 1 || shape[1] <= 4 {
        return Err(AnalysisError::MalformedDetection(format!(
            "unexpected detector output shape {:?}",
            shape
        ))
        .into());
    }
    let view = view
        .into_dimensionality::<tract_ndarray::Ix3>()
        .context("detector output is not rank 3")?;
    let (rows, proposals) = (shape[1], shape[2]);
    let classes = rows - 4;

    let scale_x = width as f32 / input_size as f32;
    let scale_y = height as f32 / input_size as f32;

    let mut candidates = Vec::new();
    for i in 0..proposals {
        let (best_class, best_score) = (0..classes)
            .map(|c| (c, view[[0, 4 + c, i]]))
            .fold((0usize, f32::NEG_INFINITY), |best, cur| {
                if cur.1 > best.1 {
                    cur
                } else {
                    best
                }
            });
        if !(best_score >= PRE_NMS_SCORE) {
            continue;
        }

        let cx = view[[0, 0, i]];
        let cy = view[[0, 1, i]];
        let w = view[[0, 2, i]];
        let h = view[[0, 3, i]];
        candidates.push(RawDetection {
            class_id: best_class as u32,
            confidence: best_score.min(1.0),
            bbox: BoundingBox::new(
                ((cx - w / 2.0) * scale_x).max(0.0),
                ((cy - h / 2.0) * scale_y).max(0.0),
                ((cx + w / 2.0) * scale_x).min(width as f32),
                ((cy + h / 2.0) * scale_y).min(height as f32),
            ),
        });
    }

    Ok(non_max_suppression(candidates, iou_threshold))
}

/// Greedy per-class NMS; output is ordered by descending confidence.
fn non_max_suppression(mut boxes: Vec<RawDetection>, iou_threshold: f32) -> Vec<RawDetection> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<RawDetection> = Vec::new();
    for candidate in boxes {
        let overlaps = kept.iter().any(|k| {
            k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !overlaps {
            kept.push(candidate);
            if kept.len() == MAX_DETECTIONS {
                break;
            }
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(class_id: u32, confidence: f32, x1: f32) -> RawDetection {
        RawDetection {
            class_id,
            confidence,
            bbox: BoundingBox::new(x1, 0.0, x1 + 10.0, 10.0),
        }
    }

    /// One `[1, 4+classes, N]` output with the given `(cx, cy, w, h, class, score)` proposals.
    fn output(
        classes: usize,
        proposals: &[(f32, f32, f32, f32, usize, f32)],
    ) -> tract_ndarray::ArrayD<f32> {
        let mut out = tract_ndarray::Array3::<f32>::zeros((1, 4 + classes, proposals.len()));
        for (i, &(cx, cy, w, h, class, score)) in proposals.iter().enumerate() {
            out[[0, 0, i]] = cx;
            out[[0, 1, i]] = cy;
            out[[0, 2, i]] = w;
            out[[0, 3, i]] = h;
            out[[0, 4 + class, i]] = score;
        }
        out.into_dyn()
    }

    fn error_kind(err: anyhow::Error) -> &'static str {
        AnalysisError::pipeline(err).kind()
    }

    #[test]
    fn rejects_output_of_wrong_rank() {
        let flat = tract_ndarray::Array2::<f32>::zeros((6, 3)).into_dyn();
        let err = decode_output(flat.view(), 640, 640, 640, 0.7).unwrap_err();
        assert_eq!(error_kind(err), "malformed_detection");
    }

    #[test]
    fn rejects_output_without_class_rows() {
        let boxes_only = tract_ndarray::Array3::<f32>::zeros((1, 4, 8)).into_dyn();
        let err = decode_output(boxes_only.view(), 640, 640, 640, 0.7).unwrap_err();
        assert_eq!(error_kind(err), "malformed_detection");
    }

    #[test]
    fn maps_center_boxes_to_source_pixels() {
        let out = output(2, &[(100.0, 200.0, 50.0, 100.0, 1, 0.9)]);
        let dets = decode_output(out.view(), 640, 1280, 720, 0.7).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_id, 1);
        assert_eq!(dets[0].confidence, 0.9);
        assert_eq!(dets[0].bbox.to_array(), [150.0, 168.75, 250.0, 281.25]);
    }

    #[test]
    fn clamps_boxes_to_frame_and_drops_weak_proposals() {
        let out = output(
            3,
            &[
                (10.0, 630.0, 40.0, 40.0, 0, 0.8),
                (630.0, 10.0, 40.0, 40.0, 2, 0.7),
                (320.0, 320.0, 20.0, 20.0, 1, 0.1),
            ],
        );
        let dets = decode_output(out.view(), 640, 1280, 640, 0.7).unwrap();
        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].bbox.to_array(), [0.0, 610.0, 60.0, 640.0]);
        assert_eq!(dets[1].bbox.to_array(), [1220.0, 0.0, 1280.0, 30.0]);
    }

    #[test]
    fn nms_suppresses_same_class_overlap() {
        let kept = non_max_suppression(vec![det(0, 0.6, 0.5), det(0, 0.9, 0.0)], 0.7);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].confidence, 0.9);
    }

    #[test]
    fn nms_keeps_overlapping_boxes_of_different_classes() {
        let kept = non_max_suppression(vec![det(0, 0.6, 0.0), det(2, 0.9, 0.0)], 0.7);
        assert_eq!(kept.len(), 2);
    }
}
