use std::path::{Path, PathBuf};

use tokenizers::Tokenizer;
use tracing::info;

use crate::errors::EngineError;
use crate::prompting::EOS_MARKER;

/// On-disk locations of the base model artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFiles {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub weights: Vec<PathBuf>,
}

impl ModelFiles {
    /// Resolves `base_model` as a local directory first, then as a hub repo id.
    pub fn resolve(base_model: &str) -> Result<Self, EngineError> {
        let local = Path::new(base_model);
        if local.is_dir() {
            return Self::from_dir(local);
        }

        info!(repo = base_model, "ENGINE: fetching base model from hub");
        let api = hf_hub::api::sync::Api::new()?;
        let repo = api.model(base_model.to_string());
        let config = repo.get("config.json")?;
        let tokenizer = repo.get("tokenizer.json")?;
        let weights = match repo.get("model.safetensors") {
            Ok(path) => vec![path],
            Err(_) => {
                let index = repo.get("model.safetensors.index.json")?;
                shard_names(&index)?
                    .iter()
                    .map(|name| repo.get(name))
                    .collect::<Result<Vec<_>, _>>()?
            }
        };

        Ok(Self {
            config,
            tokenizer,
            weights,
        })
    }

    pub fn from_dir(dir: &Path) -> Result<Self, EngineError> {
        let config = require(dir.join("config.json"))?;
        let tokenizer = require(dir.join("tokenizer.json"))?;

        let single = dir.join("model.safetensors");
        let weights = if single.exists() {
            vec![single]
        } else {
            let index = require(dir.join("model.safetensors.index.json"))?;
            shard_names(&index)?
                .into_iter()
                .map(|name| dir.join(name))
                .collect()
        };

        Ok(Self {
            config,
            tokenizer,
            weights,
        })
    }
}

fn require(path: PathBuf) -> Result<PathBuf, EngineError> {
    if path.exists() {
        Ok(path)
    } else {
        Err(EngineError::Other(format!(
            "model file not found: {}",
            path.display()
        )))
    }
}

/// Distinct shard file names listed in a safetensors index, in first-seen order.
fn shard_names(index_path: &Path) -> Result<Vec<String>, EngineError> {
    let raw = std::fs::read_to_string(index_path)?;
    let index: serde_json::Value = serde_json::from_str(&raw)?;
    let weight_map = index
        .get("weight_map")
        .and_then(|m| m.as_object())
        .ok_or_else(|| EngineError::Other("safetensors index has no weight_map".to_string()))?;

    let mut names: Vec<String> = Vec::new();
    for file in weight_map.values().filter_map(|v| v.as_str()) {
        if !names.iter().any(|n| n == file) {
            names.push(file.to_string());
        }
    }
    Ok(names)
}

pub fn load_tokenizer(path: &Path) -> Result<Tokenizer, EngineError> {
    Tokenizer::from_file(path).map_err(|e| EngineError::Tokenizer(e.to_string()))
}

/// Finds the end-of-sequence token id and its literal text.
pub fn resolve_eos_token(tokenizer: &Tokenizer) -> Result<(u32, String), EngineError> {
    [EOS_MARKER, "<|endoftext|>", "<|end_of_text|>"]
        .iter()
        .find_map(|marker| {
            tokenizer
                .token_to_id(marker)
                .map(|id| (id, marker.to_string()))
        })
        .ok_or_else(|| {
            EngineError::Tokenizer(
                "tokenizer/model incompatibility: no end-of-sequence token found".to_string(),
            )
        })
}
