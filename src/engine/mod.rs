mod adapter;
pub mod lifecycle;
mod tokenizer;

use std::sync::Arc;

use crate::errors::EngineError;
use crate::prompting::GenerationConfig;

pub use adapter::LoraAdapter;
pub use lifecycle::LifecycleManager;
pub use tokenizer::{load_tokenizer, resolve_eos_token, ModelFiles};

/// A loaded model + tokenizer pair able to complete prompts.
///
/// Implementations are shared across request threads; callers serialize `generate`
/// unless an implementation states otherwise.
pub trait GenerationEngine: Send + Sync {
    /// Returns the full decoded sequence: the prompt echo followed by the continuation,
    /// with special tokens retained.
    fn generate(&self, prompt: &str, params: &GenerationConfig) -> Result<String, EngineError>;

    fn token_count(&self, text: &str) -> Result<usize, EngineError>;

    /// Literal text of the end-of-sequence token, e.g. `</s>`.
    fn eos_marker(&self) -> &str;
}

pub type EngineHandle = Arc<dyn GenerationEngine>;

/// Performs the expensive one-time construction of an engine.
pub trait EngineLoader: Send + Sync {
    fn load(&self) -> Result<EngineHandle, EngineError>;
}

impl<F> EngineLoader for F
where
    F: Fn() -> Result<EngineHandle, EngineError> + Send + Sync,
{
    fn load(&self) -> Result<EngineHandle, EngineError> {
        self()
    }
}
