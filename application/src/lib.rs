pub mod prompt;
pub mod query_engine;

pub use prompt::PromptAssembler;
pub use query_engine::{EngineState, IndexStats, QueryEngine};
