//! Cross-frame deduplication.
//!
//! Detections are folded in frame order, then in-frame order. Each coarse
//! label keeps the first detection with the highest confidence seen for it.

use std::collections::HashMap;

use crate::detect::{FilteredDetection, ObjectClass};

/// One surviving detection per label, in order of each label's first appearance.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AggregatedResult {
    entries: Vec<FilteredDetection>,
    positions: HashMap<ObjectClass, usize>,
}

impl AggregatedResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one detection in. Replaces the stored entry only on strictly greater confidence.
    pub fn absorb(&mut self, detection: FilteredDetection) {
        match self.positions.get(&detection.label) {
            Some(&pos) => {
                if detection.confidence > self.entries[pos].confidence {
                    self.entries[pos] = detection;
                }
            }
            None => {
                self.positions.insert(detection.label, self.entries.len());
                self.entries.push(detection);
            }
        }
    }

    pub fn get(&self, label: ObjectClass) -> Option<&FilteredDetection> {
        self.positions.get(&label).map(|&pos| &self.entries[pos])
    }

    pub fn labels(&self) -> Vec<ObjectClass> {
        self.entries.iter().map(|d| d.label).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_detections(self) -> Vec<FilteredDetection> {
        self.entries
    }
}

/// Aggregate an ordered stream of filtered detections.
pub fn aggregate<I>(detections: I) -> AggregatedResult
where
    I: IntoIterator<Item = FilteredDetection>,
{
    detections
        .into_iter()
        .fold(AggregatedResult::new(), |mut acc, det| {
            acc.absorb(det);
            acc
        })
}
