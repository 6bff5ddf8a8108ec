use std::sync::Mutex;
use std::time::Instant;

use tracing::{debug, error, info};

use answerd_protocol::Query;

use crate::engine::LifecycleManager;
use crate::errors::ServiceError;
use crate::extraction::extract_answer;
use crate::prompting::{format_prompt, GenerationConfig};

/// Answers validated queries: engine lookup, prompt, generation, extraction.
pub struct QueryService {
    lifecycle: LifecycleManager,
    generation: GenerationConfig,
    generation_gate: Mutex<()>,
}

impl QueryService {
    pub fn new(lifecycle: LifecycleManager, generation: GenerationConfig) -> Self {
        Self {
            lifecycle,
            generation,
            generation_gate: Mutex::new(()),
        }
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    pub fn generation_config(&self) -> GenerationConfig {
        self.generation
    }

    /// Blocking; run it off the async executor.
    pub fn answer(&self, query: &Query) -> Result<String, ServiceError> {
        info!(query = query.as_str(), "QUERY: received");

        let engine = self.lifecycle.ensure_loaded().map_err(|e| match e {
            ServiceError::EngineUnavailable(_) => e,
            other => ServiceError::EngineUnavailable(other.to_string()),
        })?;

        let prompt = format_prompt(query.as_str());
        if let Ok(count) = engine.token_count(&prompt) {
            debug!(prompt_tokens = count, "QUERY: prompt built");
        }

        let started = Instant::now();
        let raw = {
            // Generation is not assumed reentrant; one request decodes at a time.
            let _gate = self.generation_gate.lock().unwrap_or_else(|e| e.into_inner());
            engine.generate(&prompt, &self.generation)
        }
        .map_err(|e| {
            error!(error = %e, "QUERY: model inference failed");
            ServiceError::GenerationFailure(e)
        })?;

        let answer = extract_answer(&raw, &prompt, engine.eos_marker());
        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            raw_len = raw.len(),
            answer_len = answer.len(),
            "QUERY: answer extracted"
        );
        Ok(answer)
    }
}
