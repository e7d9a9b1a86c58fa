//! Chess Evaluation Core Library
//!
//! Evaluates every position of a game from one of three sources: embedded
//! PGN annotations, a remote opening explorer, or a UCI engine process.

pub mod config;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod opening;
pub mod parser;
pub mod pipeline;
pub mod rules;

pub use config::{EngineConfig, EvalConfig, OpeningBookConfig, RateLimitScope};
pub use engine::{EngineProcessBridge, Evaluation, PositionAnalyzer};
pub use error::{Error, Result};
pub use evaluator::{EvaluationRecord, EvaluationSource, EvaluatorSettings, HybridEvaluator};
pub use opening::{OpeningBookClient, OpeningDatabase, OpeningSource, SelectionStrategy};
pub use pipeline::{EvaluationProgress, GameEvaluationPipeline, GameEvaluationSet};

/// Pipeline wired to a live engine process and the HTTP opening explorer
pub type LiveEvaluator = GameEvaluationPipeline<EngineProcessBridge, OpeningBookClient>;

/// Builds a pipeline around an already started engine bridge
pub fn live_pipeline(config: &EvalConfig, engine: EngineProcessBridge) -> Result<LiveEvaluator> {
    let book = OpeningBookClient::new(config.opening_book.clone())?;
    Ok(GameEvaluationPipeline::new(HybridEvaluator::new(
        engine,
        book,
        EvaluatorSettings::from_config(config),
    )))
}
