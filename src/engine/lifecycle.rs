use std::sync::{Mutex, OnceLock};
use std::time::Instant;

use tracing::{error, info, warn};

use crate::errors::ServiceError;

use super::{EngineHandle, EngineLoader};

/// Owns the process-wide engine handle.
///
/// The handle is written at most once. Loads run behind `load_gate`, so concurrent first
/// callers wait for a single load instead of racing; a failed load leaves the slot empty
/// and the next caller retries.
pub struct LifecycleManager {
    loader: Box<dyn EngineLoader>,
    handle: OnceLock<EngineHandle>,
    load_gate: Mutex<()>,
}

impl LifecycleManager {
    pub fn new(loader: impl EngineLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            handle: OnceLock::new(),
            load_gate: Mutex::new(()),
        }
    }

    /// Returns the cached handle, loading it synchronously on this call if needed.
    pub fn ensure_loaded(&self) -> Result<EngineHandle, ServiceError> {
        if let Some(handle) = self.handle.get() {
            return Ok(handle.clone());
        }

        // A poisoned gate only means a previous loader panicked; the slot is still empty.
        let _gate = self.load_gate.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = self.handle.get() {
            return Ok(handle.clone());
        }

        info!("ENGINE: loading base model and adapter");
        let started = Instant::now();
        match self.loader.load() {
            Ok(handle) => {
                info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    eos = handle.eos_marker(),
                    "ENGINE: model ready for inference"
                );
                Ok(self.handle.get_or_init(|| handle).clone())
            }
            Err(e) => {
                let err = ServiceError::from_load(e);
                match &err {
                    ServiceError::ResourceNotFound(path) => {
                        error!(path = %path.display(), "ENGINE: adapter not found; load aborted")
                    }
                    other => error!(error = %other, "ENGINE: model load failed"),
                }
                Err(err)
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.handle.get().is_some()
    }

    /// Startup attempt: failures are logged and left for lazy retry.
    pub fn preload(&self) -> bool {
        match self.ensure_loaded() {
            Ok(_) => true,
            Err(_) => {
                warn!("ENGINE: startup load failed; will retry on first request");
                false
            }
        }
    }
}
