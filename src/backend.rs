use std::collections::HashMap;
use std::sync::Arc;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::models::llama::{Cache, Config, Llama, LlamaConfig};
use tokenizers::{PaddingDirection, PaddingParams, Tokenizer};
use tracing::{debug, info};

use crate::config::ModelConfig;
use crate::engine::{
    load_tokenizer, resolve_eos_token, EngineHandle, EngineLoader, GenerationEngine, LoraAdapter,
    ModelFiles,
};
use crate::errors::EngineError;
use crate::prompting::{contains_end_marker, GenerationConfig};

/// Llama-family causal LM with a LoRA adapter merged in, served through candle.
pub struct CandleEngine {
    model: Llama,
    config: Config,
    tokenizer: Tokenizer,
    device: Device,
    dtype: DType,
    eos_token_id: u32,
    eos_marker: String,
}

impl CandleEngine {
    pub fn load(settings: &ModelConfig) -> Result<Self, EngineError> {
        // Adapter is checked before any base weights are fetched.
        let adapter = LoraAdapter::from_dir(&settings.adapter_path)?;

        let device = select_device(&settings.device)?;
        let dtype = parse_dtype(&settings.dtype)?;
        info!(base_model = %settings.base_model, ?device, ?dtype, "ENGINE: loading base model");

        let files = ModelFiles::resolve(&settings.base_model)?;
        let llama_config: LlamaConfig =
            serde_json::from_slice(&std::fs::read(&files.config)?)?;
        let config = llama_config.into_config(false);

        let mut weights: HashMap<String, Tensor> = HashMap::new();
        for path in &files.weights {
            weights.extend(candle_core::safetensors::load(path, &Device::Cpu)?);
        }
        info!(tensors = weights.len(), "ENGINE: base weights loaded");

        adapter.merge_into(&mut weights)?;

        // Plain tensors, no `Var`s: the model carries no training state.
        let vb = VarBuilder::from_tensors(weights, dtype, &device);
        let model = Llama::load(vb, &config)?;

        let tokenizer = load_tokenizer(&files.tokenizer)?;
        Self::from_parts(model, config, tokenizer, device, dtype)
    }

    /// Wires a built model to its tokenizer: resolves eos and aliases padding to it.
    fn from_parts(
        model: Llama,
        config: Config,
        mut tokenizer: Tokenizer,
        device: Device,
        dtype: DType,
    ) -> Result<Self, EngineError> {
        let (eos_token_id, eos_marker) = resolve_eos_token(&tokenizer)?;
        tokenizer.with_padding(Some(PaddingParams {
            direction: PaddingDirection::Right,
            pad_id: eos_token_id,
            pad_token: eos_marker.clone(),
            ..Default::default()
        }));
        info!(
            eos_token_id,
            eos = %eos_marker,
            "ENGINE: tokenizer ready (pad aliased to eos)"
        );

        Ok(Self {
            model,
            config,
            tokenizer,
            device,
            dtype,
            eos_token_id,
            eos_marker,
        })
    }

    fn encode(&self, text: &str) -> Result<Vec<u32>, EngineError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| EngineError::Tokenizer(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, ids: &[u32]) -> Result<String, EngineError> {
        self.tokenizer
            .decode(ids, false)
            .map_err(|e| EngineError::Tokenizer(e.to_string()))
    }
}

impl GenerationEngine for CandleEngine {
    fn generate(&self, prompt: &str, params: &GenerationConfig) -> Result<String, EngineError> {
        let mut tokens = self.encode(prompt)?;
        let prompt_len = tokens.len();
        let context = self.config.max_position_embeddings;
        if prompt_len >= context {
            return Err(EngineError::Other(format!(
                "prompt of {} tokens leaves no room in the model context of {}",
                prompt_len, context
            )));
        }
        // Long prompts shorten the continuation instead of failing outright.
        let budget = params.max_new_tokens.min(context - prompt_len);
        if budget < params.max_new_tokens {
            debug!(
                budget,
                requested = params.max_new_tokens,
                "ENGINE: generation budget clamped to context"
            );
        }

        let sampling = if params.do_sample {
            Sampling::TopP {
                p: params.top_p,
                temperature: params.temperature,
            }
        } else {
            Sampling::ArgMax
        };
        let mut logits_processor = LogitsProcessor::from_sampling(params.seed, sampling);
        let mut cache = Cache::new(true, self.dtype, &self.config, &self.device)?;
        let mut index_pos = 0;

        for step in 0..budget {
            let context_size = if step == 0 { tokens.len() } else { 1 };
            let start = tokens.len() - context_size;
            let input = Tensor::new(&tokens[start..], &self.device)?.unsqueeze(0)?;
            let logits = self.model.forward(&input, index_pos, &mut cache)?;
            let logits = logits.squeeze(0)?.to_dtype(DType::F32)?;
            index_pos += context_size;

            let next_token = logits_processor.sample(&logits)?;
            tokens.push(next_token);

            if next_token == self.eos_token_id {
                debug!(step, "ENGINE: eos token hit");
                break;
            }
            // The answer ends once the model starts a new question block.
            if contains_end_marker(&self.decode(&tokens[prompt_len..])?) {
                debug!(step, "ENGINE: end marker in generated text");
                break;
            }
        }

        debug!(
            new_tokens = tokens.len() - prompt_len,
            "ENGINE: generation finished"
        );
        self.decode(&tokens)
    }

    fn token_count(&self, text: &str) -> Result<usize, EngineError> {
        Ok(self.encode(text)?.len())
    }

    fn eos_marker(&self) -> &str {
        &self.eos_marker
    }
}

/// Builds a [`CandleEngine`] from model settings on demand.
pub struct CandleLoader {
    settings: ModelConfig,
}

impl CandleLoader {
    pub fn new(settings: ModelConfig) -> Self {
        Self { settings }
    }
}

impl EngineLoader for CandleLoader {
    fn load(&self) -> Result<EngineHandle, EngineError> {
        let engine = CandleEngine::load(&self.settings)?;
        Ok(Arc::new(engine))
    }
}

/// Accepts `auto`, `cpu`, `cuda`, `cuda:N` and `metal`.
pub fn select_device(selector: &str) -> Result<Device, EngineError> {
    let device = match selector.trim().to_ascii_lowercase().as_str() {
        "auto" => Device::cuda_if_available(0)?,
        "cpu" => Device::Cpu,
        "cuda" => Device::new_cuda(0)?,
        "metal" => Device::new_metal(0)?,
        other => match other.strip_prefix("cuda:").map(str::parse::<usize>) {
            Some(Ok(ordinal)) => Device::new_cuda(ordinal)?,
            _ => return Err(EngineError::Other(format!("unknown device: '{}'", selector))),
        },
    };
    Ok(device)
}

/// Accepts short and long forms: "f32"/"float32", "f16"/"float16", "bf16"/"bfloat16".
pub fn parse_dtype(s: &str) -> Result<DType, EngineError> {
    match s {
        "f32" | "float32" => Ok(DType::F32),
        "f16" | "float16" => Ok(DType::F16),
        "bf16" | "bfloat16" => Ok(DType::BF16),
        other => Err(EngineError::Other(format!("unknown dtype: '{}'", other))),
    }
}
