//! Oracle clients that reach a language model over HTTP.

pub mod cache;
pub mod http;
pub mod jan;
pub mod openai;

pub use cache::ResponseCache;
pub use http::{parse_model_ids, GenerationOptions};
pub use jan::JanOracle;
pub use openai::OpenAiOracle;
