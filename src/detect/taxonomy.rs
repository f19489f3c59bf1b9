//! Class-id to coarse-label table.
//!
//! A single table decides both whether a detector class is kept and which
//! coarse label it reports under.

use super::result::ObjectClass;

/// COCO-80 classes the pipeline reports, grouped into coarse labels.
pub const CLASS_TABLE: &[(u32, ObjectClass)] = &[
    (0, ObjectClass::Person),
    // road, rail, air and water vehicles
    (1, ObjectClass::Vehicle),
    (2, ObjectClass::Vehicle),
    (3, ObjectClass::Vehicle),
    (4, ObjectClass::Vehicle),
    (5, ObjectClass::Vehicle),
    (6, ObjectClass::Vehicle),
    (7, ObjectClass::Vehicle),
    (8, ObjectClass::Vehicle),
    (16, ObjectClass::Animal),
    (17, ObjectClass::Animal),
    (18, ObjectClass::Animal),
    (19, ObjectClass::Animal),
    (20, ObjectClass::Animal),
    (21, ObjectClass::Animal),
    (22, ObjectClass::Animal),
    (23, ObjectClass::Animal),
    (24, ObjectClass::Animal),
    (25, ObjectClass::Animal),
    // carried containers
    (26, ObjectClass::Package),
    (27, ObjectClass::Package),
    (28, ObjectClass::Package),
];

/// Coarse label for a detector class, or `None` when the class is not reported.
pub fn coarse_label(class_id: u32) -> Option<ObjectClass> {
    CLASS_TABLE
        .iter()
        .find(|(id, _)| *id == class_id)
        .map(|(_, label)| *label)
}
