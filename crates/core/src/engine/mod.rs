//! Chess engine integration
//!
//! Drives a UCI-compatible engine like Stockfish through a single-outstanding
//! request protocol.

use std::future::Future;
use std::sync::Arc;

pub mod analysis;
pub mod bridge;
pub mod capabilities;
pub mod correlator;
pub mod protocol;

// Re-export main types for convenience
pub use analysis::{
    AnalysisPreferences, AnalysisRequest, AnalysisResult, Evaluation, MoveToken, Score, SearchMode,
};
pub use bridge::{BridgeState, EngineProcessBridge};
pub use capabilities::{EngineCapabilities, EngineOption};
pub use correlator::{RequestCorrelator, Ticket};

use crate::error::Result;

/// Anything that can search a position given as moves from the start position
pub trait PositionAnalyzer: Send + Sync {
    fn analyze(
        &self,
        moves: &[MoveToken],
        preferences: &AnalysisPreferences,
    ) -> impl Future<Output = Result<AnalysisResult>> + Send;
}

impl PositionAnalyzer for EngineProcessBridge {
    async fn analyze(
        &self,
        moves: &[MoveToken],
        preferences: &AnalysisPreferences,
    ) -> Result<AnalysisResult> {
        self.analyze_moves(moves, preferences).await
    }
}

impl<T: PositionAnalyzer> PositionAnalyzer for Arc<T> {
    fn analyze(
        &self,
        moves: &[MoveToken],
        preferences: &AnalysisPreferences,
    ) -> impl Future<Output = Result<AnalysisResult>> + Send {
        (**self).analyze(moves, preferences)
    }
}
