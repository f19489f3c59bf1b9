use std::collections::VecDeque;

use anyhow::{anyhow, Result};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::RawDetection;

/// Outcome of one scripted `detect` call.
pub type ScriptedFrame = Result<Vec<RawDetection>, String>;

/// Backend that replays a fixed script, one entry per `detect` call.
///
/// Once the script is exhausted every call returns no detections.
#[derive(Default)]
pub struct ScriptedBackend {
    script: VecDeque<ScriptedFrame>,
    calls: usize,
}

impl ScriptedBackend {
    pub fn new<I>(script: I) -> Self
    where
        I: IntoIterator<Item = ScriptedFrame>,
    {
        Self {
            script: script.into_iter().collect(),
            calls: 0,
        }
    }

    /// Script that yields the given detections, in order, with no failures.
    pub fn from_frames<I>(frames: I) -> Self
    where
        I: IntoIterator<Item = Vec<RawDetection>>,
    {
        Self::new(frames.into_iter().map(Ok))
    }

    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _pixels: &[u8], _width: u32, _height: u32) -> Result<Vec<RawDetection>> {
        self.calls += 1;
        match self.script.pop_front() {
            Some(Ok(detections)) => Ok(detections),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(Vec::new()),
        }
    }
}
