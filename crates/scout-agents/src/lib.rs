//! Concrete stages, reasoning client and web tools for the VC Scout
//! evaluator. The workflow engine itself lives in `coordination`.

pub mod agents;
pub mod client;
pub mod config;
pub mod prompts;
pub mod structured;
pub mod tools;

pub use agents::{build_registry, AgentDeps};
pub use client::OpenAiCompatClient;
pub use config::LlmConfig;
pub use tools::{DuckDuckGoSearch, HttpScraper, PageScraper, SearchProvider};
