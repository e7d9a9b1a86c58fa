//! Types for representing engine requests and analysis results

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// Raw score as reported by the engine, from the side to move's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    /// Centipawn score
    Centipawns(i32),
    /// Forced mate in N moves (negative = side to move gets mated)
    Mate(i32),
}

impl Score {
    /// Converts the raw score into a displayable evaluation (same perspective)
    pub fn to_evaluation(self) -> Evaluation {
        match self {
            Score::Centipawns(cp) => Evaluation::Pawns(cp as f64 / 100.0),
            Score::Mate(moves) => Evaluation::Mate(moves),
        }
    }
}

/// A formatted position evaluation.
///
/// Renders as `+0.35` / `-1.20` for ordinary scores and `#3` / `#-3` for
/// forced mates, and parses back from the same text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Evaluation {
    /// Score in pawns
    Pawns(f64),
    /// Forced mate (positive = the evaluated side mates)
    Mate(i32),
}

impl Evaluation {
    /// The level evaluation `+0.00`
    pub const EVEN: Evaluation = Evaluation::Pawns(0.0);

    /// Flips the evaluation to the other side's perspective
    pub fn negate(self) -> Self {
        match self {
            Evaluation::Pawns(p) => Evaluation::Pawns(-p),
            Evaluation::Mate(moves) => Evaluation::Mate(-moves),
        }
    }

    /// Converts evaluation to a plottable number, mates pinned to ±100
    pub fn as_score(&self) -> f64 {
        match self {
            Evaluation::Pawns(p) => *p,
            Evaluation::Mate(moves) => {
                if *moves >= 0 {
                    100.0
                } else {
                    -100.0
                }
            }
        }
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Evaluation::Pawns(p) => {
                // Values that round to zero print as +0.00, never -0.00
                if *p > -0.005 {
                    let shown = if *p <= 0.0 { 0.0 } else { *p };
                    write!(f, "+{:.2}", shown)
                } else {
                    write!(f, "{:.2}", p)
                }
            }
            Evaluation::Mate(moves) => write!(f, "#{}", moves),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid evaluation: {0:?}")]
pub struct ParseEvaluationError(String);

impl FromStr for Evaluation {
    type Err = ParseEvaluationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        if let Some(mate) = text.strip_prefix('#') {
            return mate
                .parse::<i32>()
                .map(Evaluation::Mate)
                .map_err(|_| ParseEvaluationError(s.to_string()));
        }
        match text.parse::<f64>() {
            Ok(p) if p.is_finite() => Ok(Evaluation::Pawns(p)),
            _ => Err(ParseEvaluationError(s.to_string())),
        }
    }
}

impl Serialize for Evaluation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Evaluation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// A move in coordinate notation: origin, destination, optional promotion
/// (e.g. `e2e4`, `e7e8q`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MoveToken(String);

impl MoveToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_square(bytes: &[u8]) -> bool {
    matches!(bytes, [file, rank] if (b'a'..=b'h').contains(file) && (b'1'..=b'8').contains(rank))
}

impl FromStr for MoveToken {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        let valid = match bytes.len() {
            4 => is_square(&bytes[0..2]) && is_square(&bytes[2..4]),
            5 => {
                is_square(&bytes[0..2])
                    && is_square(&bytes[2..4])
                    && matches!(bytes[4], b'q' | b'r' | b'b' | b'n')
            }
            _ => false,
        };

        if valid {
            Ok(MoveToken(s.to_string()))
        } else {
            Err(Error::InvalidPosition(format!("malformed move token '{}'", s)))
        }
    }
}

impl TryFrom<String> for MoveToken {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MoveToken> for String {
    fn from(token: MoveToken) -> Self {
        token.0
    }
}

impl fmt::Display for MoveToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the engine should bound its search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Fixed thinking time per position
    MoveTime,
    /// Fixed search depth per position
    Depth,
}

/// Search settings for one analysis request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisPreferences {
    pub mode: SearchMode,
    pub movetime_ms: u64,
    pub depth: u32,
    /// Number of principal variations the engine should report
    pub multipv: u32,
}

impl Default for AnalysisPreferences {
    fn default() -> Self {
        Self {
            mode: SearchMode::MoveTime,
            movetime_ms: 2000,
            depth: 15,
            multipv: 1,
        }
    }
}

/// A position (as moves from the start position) plus how to search it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub moves: Vec<MoveToken>,
    pub preferences: AnalysisPreferences,
}

/// Latest engine findings for a request. Every field may be absent when the
/// engine finished without reporting progress.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisResult {
    /// Score from the side to move's perspective
    pub score: Option<Score>,
    /// Search depth reached
    pub depth: Option<u32>,
    /// Principal variation (best line of play)
    pub pv: Option<Vec<String>>,
    /// Move named on the terminal line
    pub best_move: Option<String>,
}

impl AnalysisResult {
    /// Returns a brief summary of the analysis
    pub fn summary(&self) -> String {
        let eval = self
            .score
            .map(|s| s.to_evaluation().to_string())
            .unwrap_or_else(|| "-".to_string());
        let pv = self
            .pv
            .as_ref()
            .map(|pv| pv.iter().take(5).cloned().collect::<Vec<_>>().join(" "))
            .unwrap_or_default();

        format!(
            "Eval: {} | Best: {} | Depth: {} | PV: {}",
            eval,
            self.best_move.as_deref().unwrap_or("-"),
            self.depth.map(|d| d.to_string()).unwrap_or_else(|| "-".into()),
            pv
        )
    }
}
