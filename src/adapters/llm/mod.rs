//! Model client adapters
//!
//! - `OpenAiCompatibleClient`: chat completions over HTTP with retry
//! - `ScriptedModelClient`: deterministic scripted replies for tests and dry runs

pub mod mock;
pub mod openai_compatible;
pub mod retry;

pub use mock::{MockResponse, RecordedCall, ScriptedModelClient};
pub use openai_compatible::OpenAiCompatibleClient;
pub use retry::RetryPolicy;
