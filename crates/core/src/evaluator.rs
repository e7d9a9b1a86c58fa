//! Per-position source selection: embedded data, opening book, then engine

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::EvalConfig;
use crate::engine::{AnalysisPreferences, Evaluation, PositionAnalyzer};
use crate::error::Result;
use crate::opening::{BookStats, OpeningInfo, OpeningSource};
use crate::rules::PositionContext;

/// Provenance of an evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EvaluationSource {
    Embedded,
    Opening,
    Engine,
    Error,
}

/// The evaluation chosen for one position, always from White's point of view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationRecord {
    pub source: EvaluationSource,
    pub evaluation: Evaluation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opening: Option<OpeningInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<BookStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_move: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
    /// Why the position fell back to a previous value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EvaluationRecord {
    fn new(source: EvaluationSource, evaluation: Evaluation) -> Self {
        Self {
            source,
            evaluation,
            opening: None,
            stats: None,
            best_move: None,
            depth: None,
            error: None,
        }
    }

    pub fn embedded(evaluation: Evaluation) -> Self {
        Self::new(EvaluationSource::Embedded, evaluation)
    }

    /// Fallback record repeating the previous position's value
    pub fn degraded(previous: Evaluation, reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::new(EvaluationSource::Error, previous)
        }
    }
}

/// Knobs for source selection
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatorSettings {
    pub opening_enabled: bool,
    /// Highest position index looked up in the opening book
    pub max_plies: usize,
    pub preferences: AnalysisPreferences,
}

impl EvaluatorSettings {
    pub fn from_config(config: &EvalConfig) -> Self {
        Self {
            opening_enabled: config.opening_book.enabled,
            max_plies: config.opening_book.max_plies,
            preferences: config.analysis.clone(),
        }
    }
}

impl Default for EvaluatorSettings {
    fn default() -> Self {
        Self::from_config(&EvalConfig::default())
    }
}

/// Chooses exactly one evaluation source per position
pub struct HybridEvaluator<A, B> {
    analyzer: A,
    book: B,
    settings: EvaluatorSettings,
}

impl<A: PositionAnalyzer, B: OpeningSource> HybridEvaluator<A, B> {
    pub fn new(analyzer: A, book: B, settings: EvaluatorSettings) -> Self {
        Self {
            analyzer,
            book,
            settings,
        }
    }

    pub fn analyzer(&self) -> &A {
        &self.analyzer
    }

    pub fn book(&self) -> &B {
        &self.book
    }

    pub fn settings(&self) -> &EvaluatorSettings {
        &self.settings
    }

    /// Evaluates one position. Embedded data wins, then the opening book
    /// within the ply budget, then the engine. Engine errors are returned.
    pub async fn evaluate(
        &self,
        position: &PositionContext,
        embedded: Option<Evaluation>,
    ) -> Result<EvaluationRecord> {
        if let Some(evaluation) = embedded {
            return Ok(EvaluationRecord::embedded(evaluation));
        }

        if let Some(record) = self.book_record(position).await {
            return Ok(record);
        }

        self.engine_record(position).await
    }

    /// Like [`evaluate`](Self::evaluate), but recoverable failures become an
    /// `Error` record carrying `previous`. Only an unavailable engine is
    /// returned as an error.
    pub async fn evaluate_or_degrade(
        &self,
        position: &Result<PositionContext>,
        embedded: Option<Evaluation>,
        previous: Evaluation,
    ) -> Result<EvaluationRecord> {
        if let Some(evaluation) = embedded {
            return Ok(EvaluationRecord::embedded(evaluation));
        }

        let position = match position {
            Ok(position) => position,
            Err(e) => {
                warn!("Skipping unreachable position: {}", e);
                return Ok(EvaluationRecord::degraded(previous, e.to_string()));
            }
        };

        match self.evaluate(position, None).await {
            Ok(record) => Ok(record),
            Err(e) if e.is_recoverable() => {
                warn!("Position {} fell back to previous value: {}", position.index, e);
                Ok(EvaluationRecord::degraded(previous, e.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn book_record(&self, position: &PositionContext) -> Option<EvaluationRecord> {
        if !self.settings.opening_enabled || position.index > self.settings.max_plies {
            return None;
        }

        let database = self.book.active_database();
        let book = self.book.lookup(&position.fen, database).await?;
        let evaluation = self.book.book_evaluation(&book)?;

        debug!(
            "Position {} evaluated from {} book: {}",
            position.index, database, evaluation
        );

        Some(EvaluationRecord {
            opening: Some(book.opening.clone().unwrap_or_else(OpeningInfo::unknown)),
            stats: Some(BookStats::from_book(&book)),
            ..EvaluationRecord::new(EvaluationSource::Opening, evaluation)
        })
    }

    async fn engine_record(&self, position: &PositionContext) -> Result<EvaluationRecord> {
        let result = self
            .analyzer
            .analyze(&position.moves, &self.settings.preferences)
            .await?;

        let raw = result
            .score
            .map(|score| score.to_evaluation())
            .unwrap_or(Evaluation::EVEN);

        // Engine scores are from the side to move; records are from White's
        let evaluation = if position.second_player_to_move() {
            raw.negate()
        } else {
            raw
        };

        debug!(
            "Position {} evaluated by engine: {} ({})",
            position.index,
            evaluation,
            result.summary()
        );

        Ok(EvaluationRecord {
            best_move: result.best_move,
            depth: result.depth,
            ..EvaluationRecord::new(EvaluationSource::Engine, evaluation)
        })
    }
}
