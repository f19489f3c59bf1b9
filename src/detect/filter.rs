use crate::error::AnalysisError;

use super::result::{FilteredDetection, RawDetection};
use super::taxonomy::coarse_label;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Keep detections at or above `confidence_threshold` whose class is in the
/// taxonomy table, relabelled to their coarse class. Input order is preserved.
pub fn filter_and_map(
    raw_detections: &[RawDetection],
    confidence_threshold: f32,
) -> Result<Vec<FilteredDetection>, AnalysisError> {
    let mut kept = Vec::new();
    for det in raw_detections {
        validate(det)?;
        if det.confidence < confidence_threshold {
            continue;
        }
        let Some(label) = coarse_label(det.class_id) else {
            continue;
        };
        kept.push(FilteredDetection {
            label,
            confidence: round_confidence(det.confidence),
            bbox: det.bbox,
            class_id: det.class_id,
        });
    }
    Ok(kept)
}

fn validate(det: &RawDetection) -> Result<(), AnalysisError> {
    if !det.confidence.is_finite() || !(0.0..=1.0).contains(&det.confidence) {
        return Err(AnalysisError::MalformedDetection(format!(
            "class {} has confidence {} outside 0..=1",
            det.class_id, det.confidence
        )));
    }
    if !det.bbox.is_finite() {
        return Err(AnalysisError::MalformedDetection(format!(
            "class {} has non-finite bounding box {:?}",
            det.class_id,
            det.bbox.to_array()
        )));
    }
    Ok(())
}

/// Two decimal places, exact halves to even.
pub(crate) fn round_confidence(confidence: f32) -> f32 {
    ((confidence as f64 * 100.0).round_ties_even() / 100.0) as f32
}
