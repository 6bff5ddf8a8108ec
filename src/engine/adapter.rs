// LoRA adapter loading and merge-at-load for candle.
// Reads PEFT-style `adapter_model.safetensors` + `adapter_config.json` and folds the
// low-rank deltas into the base weights, so inference runs on plain tensors.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor};
use tracing::{debug, info};

use crate::errors::EngineError;

const WEIGHTS_FILE: &str = "adapter_model.safetensors";
const CONFIG_FILE: &str = "adapter_config.json";
const PEFT_PREFIX: &str = "base_model.model.";

#[derive(Debug, Clone)]
struct LoraPair {
    a: Tensor,
    b: Tensor,
}

#[derive(Debug, Clone)]
pub struct LoraAdapter {
    pub rank: Option<usize>,
    pub alpha: Option<f64>,
    pub use_rslora: bool,
    pairs: HashMap<String, LoraPair>,
}

impl LoraAdapter {
    /// Loads an adapter directory. A missing directory or weights file is `AdapterNotFound`.
    pub fn from_dir(dir: &Path) -> Result<Self, EngineError> {
        if !dir.exists() {
            return Err(EngineError::AdapterNotFound(dir.to_path_buf()));
        }
        let weights_path = if dir.is_dir() {
            dir.join(WEIGHTS_FILE)
        } else {
            dir.to_path_buf()
        };
        if !weights_path.exists() {
            return Err(EngineError::AdapterNotFound(weights_path));
        }

        info!(path = %weights_path.display(), "ENGINE: loading LoRA adapter");
        let tensors = candle_core::safetensors::load(&weights_path, &Device::Cpu)?;

        let config_path = config_path_for(dir);
        let (rank, alpha, use_rslora) = if config_path.exists() {
            let raw = std::fs::read_to_string(&config_path)?;
            let config: serde_json::Value = serde_json::from_str(&raw)?;
            (
                config["r"].as_u64().map(|r| r as usize),
                config["lora_alpha"].as_f64(),
                config["use_rslora"].as_bool().unwrap_or(false),
            )
        } else {
            (None, None, false)
        };

        Self::from_tensors(tensors, rank, alpha, use_rslora)
    }

    /// Pairs `*.lora_A.weight` / `*.lora_B.weight` tensors by target module.
    pub fn from_tensors(
        tensors: HashMap<String, Tensor>,
        rank: Option<usize>,
        alpha: Option<f64>,
        use_rslora: bool,
    ) -> Result<Self, EngineError> {
        let mut a_parts: HashMap<String, Tensor> = HashMap::new();
        let mut b_parts: HashMap<String, Tensor> = HashMap::new();

        for (name, tensor) in tensors {
            if let Some(module) = name.strip_suffix(".lora_A.weight") {
                a_parts.insert(module_name(module), tensor);
            } else if let Some(module) = name.strip_suffix(".lora_B.weight") {
                b_parts.insert(module_name(module), tensor);
            } else {
                debug!(tensor = %name, "ENGINE: ignoring non-LoRA adapter tensor");
            }
        }

        let mut pairs = HashMap::with_capacity(a_parts.len());
        for (module, a) in a_parts {
            let b = b_parts.remove(&module).ok_or_else(|| {
                EngineError::Other(format!("adapter has lora_A without lora_B for {}", module))
            })?;
            pairs.insert(module, LoraPair { a, b });
        }
        if let Some(module) = b_parts.keys().next() {
            return Err(EngineError::Other(format!(
                "adapter has lora_B without lora_A for {}",
                module
            )));
        }

        Ok(Self {
            rank,
            alpha,
            use_rslora,
            pairs,
        })
    }

    /// Delta scale: `alpha / r`, or `alpha / sqrt(r)` for rank-stabilized adapters.
    pub fn scale(&self) -> f64 {
        match (self.alpha, self.rank) {
            (Some(alpha), Some(rank)) if rank > 0 => {
                if self.use_rslora {
                    alpha / (rank as f64).sqrt()
                } else {
                    alpha / rank as f64
                }
            }
            _ => 1.0,
        }
    }

    pub fn target_modules(&self) -> Vec<&str> {
        let mut modules: Vec<&str> = self.pairs.keys().map(String::as_str).collect();
        modules.sort_unstable();
        modules
    }

    /// Applies `W' = W + scale * B·A` to every targeted weight in place.
    pub fn merge_into(&self, weights: &mut HashMap<String, Tensor>) -> Result<usize, EngineError> {
        let scale = self.scale();
        for (module, pair) in &self.pairs {
            let key = format!("{}.weight", module);
            let base = weights.get(&key).ok_or_else(|| {
                EngineError::Other(format!("adapter targets unknown base weight {}", key))
            })?;

            let delta = pair
                .b
                .to_dtype(DType::F32)?
                .matmul(&pair.a.to_dtype(DType::F32)?)?
                .affine(scale, 0.0)?;
            let merged = base
                .to_dtype(DType::F32)?
                .add(&delta)?
                .to_dtype(base.dtype())?;
            weights.insert(key, merged);
        }

        info!(
            modules = self.pairs.len(),
            scale, "ENGINE: LoRA deltas merged into base weights"
        );
        Ok(self.pairs.len())
    }
}

fn config_path_for(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(CONFIG_FILE)
    } else {
        path.parent()
            .unwrap_or_else(|| Path::new("."))
            .join(CONFIG_FILE)
    }
}

fn module_name(raw: &str) -> String {
    raw.strip_prefix(PEFT_PREFIX).unwrap_or(raw).to_string()
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;

    const MODULE: &str = "model.layers.0.self_attn.q_proj";

    fn adapter_tensors() -> HashMap<String, Tensor> {
        let a = Tensor::new(&[[1f32, 2.0]], &Device::Cpu).expect("lora_A");
        let b = Tensor::new(&[[1f32], [3.0]], &Device::Cpu).expect("lora_B");
        HashMap::from([
            (format!("{PEFT_PREFIX}{MODULE}.lora_A.weight"), a),
            (format!("{PEFT_PREFIX}{MODULE}.lora_B.weight"), b),
        ])
    }

    #[test]
    fn merges_scaled_delta_into_base_weight() {
        let adapter = LoraAdapter::from_tensors(adapter_tensors(), Some(1), Some(2.0), false)
            .expect("pair tensors");
        assert_eq!(adapter.target_modules(), vec![MODULE]);
        assert_eq!(adapter.scale(), 2.0);

        let base = Tensor::zeros((2, 2), DType::F32, &Device::Cpu).expect("base");
        let mut weights = HashMap::from([(format!("{MODULE}.weight"), base)]);
        let merged = adapter.merge_into(&mut weights).expect("merge");
        assert_eq!(merged, 1);

        let updated = weights[&format!("{MODULE}.weight")]
            .to_vec2::<f32>()
            .expect("read merged");
        assert_eq!(updated, vec![vec![2.0, 4.0], vec![6.0, 12.0]]);
    }

    #[test]
    fn rslora_scale_uses_sqrt_rank() {
        let adapter = LoraAdapter::from_tensors(HashMap::new(), Some(4), Some(8.0), true)
            .expect("empty adapter");
        assert_eq!(adapter.scale(), 4.0);

        let unscaled = LoraAdapter::from_tensors(HashMap::new(), None, None, false)
            .expect("empty adapter");
        assert_eq!(unscaled.scale(), 1.0);
    }

    #[test]
    fn unpaired_tensor_is_rejected() {
        let mut tensors = adapter_tensors();
        tensors.retain(|name, _| name.ends_with("lora_A.weight"));
        assert!(LoraAdapter::from_tensors(tensors, Some(1), Some(1.0), false).is_err());
    }

    #[test]
    fn unknown_target_weight_is_rejected() {
        let adapter = LoraAdapter::from_tensors(adapter_tensors(), Some(1), Some(1.0), false)
            .expect("pair tensors");
        let mut weights = HashMap::new();
        assert!(adapter.merge_into(&mut weights).is_err());
    }

    #[test]
    fn missing_directory_is_not_found() {
        let dir = mk_temp_dir("answerd_adapter_missing");
        match LoraAdapter::from_dir(&dir) {
            Err(EngineError::AdapterNotFound(path)) => assert_eq!(path, dir),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn directory_without_weights_is_not_found() {
        let dir = mk_temp_dir("answerd_adapter_empty");
        fs::create_dir_all(&dir).expect("create dir");
        match LoraAdapter::from_dir(&dir) {
            Err(EngineError::AdapterNotFound(path)) => assert!(path.ends_with(WEIGHTS_FILE)),
            other => panic!("unexpected result: {other:?}"),
        }
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn loads_weights_and_config_from_directory() {
        let dir = mk_temp_dir("answerd_adapter_full");
        fs::create_dir_all(&dir).expect("create dir");
        candle_core::safetensors::save(&adapter_tensors(), dir.join(WEIGHTS_FILE))
            .expect("write adapter weights");
        fs::write(
            dir.join(CONFIG_FILE),
            br#"{"r": 1, "lora_alpha": 16, "target_modules": ["q_proj"]}"#,
        )
        .expect("write adapter config");

        let adapter = LoraAdapter::from_dir(&dir).expect("load adapter");
        assert_eq!(adapter.rank, Some(1));
        assert_eq!(adapter.alpha, Some(16.0));
        assert_eq!(adapter.scale(), 16.0);
        assert_eq!(adapter.target_modules(), vec![MODULE]);

        let _ = fs::remove_dir_all(dir);
    }

    fn mk_temp_dir(prefix: &str) -> PathBuf {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time ok")
            .as_nanos();
        std::env::temp_dir().join(format!("{}_{}_{}", prefix, std::process::id(), ts))
    }
}
