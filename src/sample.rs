//! Evenly spaced frame sampling.

use crate::frame::Frame;
use crate::ingest::VideoSource;

pub const DEFAULT_MAX_FRAMES: usize = 5;

/// Index spacing between kept frames: `max(1, total_frames / max_frames)`.
pub fn stride_for(total_frames: u64, max_frames: usize) -> u64 {
    let max_frames = max_frames.max(1) as u64;
    (total_frames / max_frames).max(1)
}

/// Walk `source` from the start, keeping every `stride`-th frame until
/// `max_frames` are kept or the source runs out.
///
/// A decode error after the source opened ends the walk; frames sampled so far are kept.
pub fn sample(source: &mut dyn VideoSource, max_frames: usize) -> Vec<Frame> {
    let stride = stride_for(source.frame_count(), max_frames);
    log::debug!(
        "sampling up to {} frames (reported total {}, stride {})",
        max_frames,
        source.frame_count(),
        stride
    );

    let mut frames = Vec::with_capacity(max_frames);
    let mut index: u64 = 0;
    while frames.len() < max_frames {
        let step = if index % stride == 0 {
            source.next_frame().map(|frame| match frame {
                Some(frame) => {
                    log::debug!("sampled frame {} ({} bytes)", frame.index, frame.byte_len());
                    frames.push(frame);
                    true
                }
                None => false,
            })
        } else {
            source.skip_frame()
        };
        match step {
            Ok(true) => index += 1,
            Ok(false) => break,
            Err(err) => {
                log::warn!("decoding stopped at frame {}: {:#}", index, err);
                break;
            }
        }
    }
    frames
}
