pub mod engine;
pub mod novelty;
pub mod prompts;
pub mod schema;

pub use engine::{EngineConfig, IdeaEngine};
pub use novelty::{fingerprint, NoveltyCache, NoveltyPartition, NoveltySubject};
