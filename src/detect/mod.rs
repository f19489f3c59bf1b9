mod backend;
mod backends;
mod filter;
mod result;
mod shared;
mod taxonomy;

pub use backend::DetectorBackend;
pub use backends::{ScriptedBackend, ScriptedFrame, StubBackend};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use filter::{filter_and_map, DEFAULT_CONFIDENCE_THRESHOLD};
pub use result::{BoundingBox, FilteredDetection, ObjectClass, RawDetection};
pub use shared::{DetectorHandle, SharedDetector};
pub use taxonomy::{coarse_label, CLASS_TABLE};
