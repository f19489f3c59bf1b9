use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use super::backend::DetectorBackend;

/// Handle to an initialized backend. `detect` takes `&mut self`, hence the `Mutex`.
pub type DetectorHandle = Arc<Mutex<Box<dyn DetectorBackend>>>;

type Factory = dyn Fn() -> Result<Box<dyn DetectorBackend>> + Send + Sync;

/// Lazily constructed detector shared by every analysis in the process.
///
/// The check-and-initialize step runs with `init` held, so concurrent first
/// callers construct the backend at most once. `slot` is only locked to read
/// or publish the handle, so `is_loaded` does not wait on a slow load. A failed
/// construction leaves the slot empty and the next caller retries.
pub struct SharedDetector {
    slot: Mutex<Option<DetectorHandle>>,
    init: Mutex<()>,
    factory: Box<Factory>,
}

impl SharedDetector {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Box<dyn DetectorBackend>> + Send + Sync + 'static,
    {
        Self {
            slot: Mutex::new(None),
            init: Mutex::new(()),
            factory: Box::new(factory),
        }
    }

    /// Wrap an already constructed backend.
    pub fn preloaded<B: DetectorBackend + 'static>(backend: B) -> Self {
        let handle: DetectorHandle = Arc::new(Mutex::new(Box::new(backend)));
        Self {
            slot: Mutex::new(Some(handle)),
            init: Mutex::new(()),
            factory: Box::new(|| Err(anyhow!("preloaded detector has no factory"))),
        }
    }

    /// Return the shared backend, constructing it on first use.
    pub fn get(&self) -> Result<DetectorHandle> {
        if let Some(handle) = self.loaded()? {
            return Ok(handle);
        }

        let _init = self
            .init
            .lock()
            .map_err(|_| anyhow!("detector init lock poisoned"))?;
        if let Some(handle) = self.loaded()? {
            return Ok(handle);
        }

        log::info!("Loading detector backend...");
        let mut backend = (self.factory)()?;
        backend.warm_up()?;
        log::info!("Detector backend '{}' loaded", backend.name());

        let handle: DetectorHandle = Arc::new(Mutex::new(backend));
        *self
            .slot
            .lock()
            .map_err(|_| anyhow!("detector slot lock poisoned"))? = Some(handle.clone());
        Ok(handle)
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded().map(|handle| handle.is_some()).unwrap_or(false)
    }

    fn loaded(&self) -> Result<Option<DetectorHandle>> {
        let slot = self
            .slot
            .lock()
            .map_err(|_| anyhow!("detector slot lock poisoned"))?;
        Ok(slot.clone())
    }
}
