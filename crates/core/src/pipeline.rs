//! Whole-game evaluation, one position at a time

use serde::Serialize;
use tracing::info;

use crate::engine::{Evaluation, PositionAnalyzer};
use crate::error::Result;
use crate::evaluator::{EvaluationRecord, EvaluationSource, HybridEvaluator};
use crate::opening::{OpeningInfo, OpeningSource};
use crate::parser::PgnGame;
use crate::rules::replay_san;

/// Progress after a position has settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EvaluationProgress {
    pub completed: usize,
    pub total: usize,
}

impl EvaluationProgress {
    /// Rounded percentage of positions done
    pub fn percent(&self) -> u32 {
        if self.total == 0 {
            return 100;
        }
        ((self.completed * 100 + self.total / 2) / self.total) as u32
    }
}

/// Number of records per provenance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SourceCounts {
    pub embedded: usize,
    pub opening: usize,
    pub engine: usize,
    pub error: usize,
}

impl SourceCounts {
    fn record(&mut self, source: EvaluationSource) {
        match source {
            EvaluationSource::Embedded => self.embedded += 1,
            EvaluationSource::Opening => self.opening += 1,
            EvaluationSource::Engine => self.engine += 1,
            EvaluationSource::Error => self.error += 1,
        }
    }

    /// Label describing where most evaluations came from. Games mixing book
    /// and engine evaluations are "Hybrid".
    pub fn dominant_label(&self) -> &'static str {
        if self.opening > 0 && self.engine > 0 {
            return "Hybrid";
        }

        // Later entries win ties
        [
            ("Embedded", self.embedded),
            ("Opening", self.opening),
            ("Engine", self.engine),
        ]
        .into_iter()
        .reduce(|best, next| if best.1 > next.1 { best } else { next })
        .map(|(label, _)| label)
        .unwrap_or("Engine")
    }
}

/// Evaluations for every position of a game, `moves + 1` records
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameEvaluationSet {
    pub records: Vec<EvaluationRecord>,
    pub source_counts: SourceCounts,
    pub dominant_source: String,
    /// Most recent opening classification reported by the book
    pub opening: Option<OpeningInfo>,
}

impl GameEvaluationSet {
    fn from_records(records: Vec<EvaluationRecord>) -> Self {
        let mut source_counts = SourceCounts::default();
        let mut opening = None;

        for record in &records {
            source_counts.record(record.source);
            if record.source == EvaluationSource::Opening {
                if let Some(info) = &record.opening {
                    opening = Some(info.clone());
                }
            }
        }

        Self {
            dominant_source: source_counts.dominant_label().to_string(),
            records,
            source_counts,
            opening,
        }
    }

    pub fn evaluations(&self) -> Vec<Evaluation> {
        self.records.iter().map(|r| r.evaluation).collect()
    }
}

/// Evaluates whole games strictly in position order
pub struct GameEvaluationPipeline<A, B> {
    evaluator: HybridEvaluator<A, B>,
}

impl<A: PositionAnalyzer, B: OpeningSource> GameEvaluationPipeline<A, B> {
    pub fn new(evaluator: HybridEvaluator<A, B>) -> Self {
        Self { evaluator }
    }

    pub fn evaluator(&self) -> &HybridEvaluator<A, B> {
        &self.evaluator
    }

    /// Evaluates positions `0..=moves.len()`.
    ///
    /// `embedded[i]`, when present, is the authoritative value for position
    /// `i`. Each position settles before the next one starts. Position-level
    /// failures become `Error` records; only an unavailable engine aborts.
    pub async fn evaluate_game<F>(
        &self,
        moves: &[String],
        embedded: &[Option<Evaluation>],
        mut progress: F,
    ) -> Result<GameEvaluationSet>
    where
        F: FnMut(EvaluationProgress) + Send,
    {
        let line = replay_san(moves);
        let total = line.len();
        if let Some(ply) = line.first_rejected() {
            info!(
                "Move {} cannot be played; positions from {} on will fall back",
                ply + 1,
                ply + 1
            );
        }

        let mut records: Vec<EvaluationRecord> = Vec::with_capacity(total);
        for (index, position) in line.positions.iter().enumerate() {
            let previous = records
                .last()
                .map(|r| r.evaluation)
                .unwrap_or(Evaluation::EVEN);
            let embedded_eval = embedded.get(index).copied().flatten();

            let record = self
                .evaluator
                .evaluate_or_degrade(position, embedded_eval, previous)
                .await?;
            records.push(record);

            progress(EvaluationProgress {
                completed: index + 1,
                total,
            });
        }

        let set = GameEvaluationSet::from_records(records);
        info!(
            "Evaluated {} positions ({}): {:?}",
            total, set.dominant_source, set.source_counts
        );
        Ok(set)
    }

    /// Evaluates a parsed PGN game using its `[%eval]` annotations
    pub async fn evaluate_pgn_game<F>(&self, game: &PgnGame, progress: F) -> Result<GameEvaluationSet>
    where
        F: FnMut(EvaluationProgress) + Send,
    {
        let embedded = game.embedded_evaluations();
        self.evaluate_game(&game.moves, &embedded, progress).await
    }
}
