//! answerd - question answering over a fine-tuned causal language model
//!
//! A single `POST /process-query` endpoint wraps a base model with a merged LoRA adapter:
//!
//! - **engine**: generation trait, adapter merge, lazy process-wide lifecycle
//! - **backend**: candle implementation of the engine
//! - **prompting** / **extraction**: prompt template and answer recovery
//! - **service** / **server**: request orchestration and the HTTP surface
//!
//! # Example
//!
//! ```bash
//! ANSWERD_ADAPTER_PATH=./my-tinyllama-adapter answerd
//! curl -X POST localhost:5000/process-query -H 'content-type: application/json' \
//!      -d '{"query": "What is 2+2?"}'
//! ```

pub mod backend;
pub mod config;
pub mod engine;
pub mod errors;
pub mod extraction;
pub mod prompting;
pub mod server;
pub mod service;

pub use answerd_protocol as protocol;
pub use config::AppConfig;
pub use engine::{EngineHandle, EngineLoader, GenerationEngine, LifecycleManager};
pub use errors::{EngineError, ServiceError};
pub use service::QueryService;
