//! Opening explorer data types: wire schema and derived book statistics

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Explorer database to query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpeningDatabase {
    /// Online games, filterable by speed and rating
    Lichess,
    /// Over-the-board master games
    Masters,
}

impl OpeningDatabase {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpeningDatabase::Lichess => "lichess",
            OpeningDatabase::Masters => "masters",
        }
    }

    /// Whether the endpoint accepts speed and rating filters
    pub fn accepts_filters(&self) -> bool {
        matches!(self, OpeningDatabase::Lichess)
    }
}

impl fmt::Display for OpeningDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpeningDatabase {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lichess" => Ok(OpeningDatabase::Lichess),
            "masters" => Ok(OpeningDatabase::Masters),
            other => Err(Error::Config(format!("unknown opening database '{}'", other))),
        }
    }
}

/// Parameters of one explorer request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplorerRequest {
    pub database: OpeningDatabase,
    pub fen: String,
    pub speeds: String,
    pub ratings: String,
    pub moves: u32,
}

impl ExplorerRequest {
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("variant", "standard".to_string()),
            ("fen", self.fen.clone()),
        ];
        if self.database.accepts_filters() {
            pairs.push(("speeds", self.speeds.clone()));
            pairs.push(("ratings", self.ratings.clone()));
        }
        pairs.push(("moves", self.moves.to_string()));
        pairs.push(("topGames", "0".to_string()));
        pairs.push(("recentGames", "0".to_string()));
        pairs
    }
}

/// Response body as sent by the explorer. Counts are required and unsigned,
/// so missing or negative values fail deserialization.
#[derive(Debug, Clone, Deserialize)]
pub struct ExplorerResponse {
    #[serde(default)]
    pub opening: Option<ExplorerOpening>,
    pub moves: Vec<ExplorerMove>,
    pub white: u64,
    pub draws: u64,
    pub black: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExplorerOpening {
    pub eco: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplorerMove {
    #[serde(default)]
    pub uci: Option<String>,
    pub san: String,
    pub white: u64,
    pub draws: u64,
    pub black: u64,
    #[serde(default)]
    pub average_rating: Option<u32>,
}

/// Opening classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpeningInfo {
    pub eco: Option<String>,
    pub name: String,
}

impl OpeningInfo {
    pub fn unknown() -> Self {
        Self {
            eco: None,
            name: "Unknown Opening".to_string(),
        }
    }
}

/// A candidate move with its results and derived rates
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateMove {
    pub uci: Option<String>,
    pub san: String,
    pub white: u64,
    pub draws: u64,
    pub black: u64,
    pub total: u64,
    pub win_rate: f64,
    pub draw_rate: f64,
    /// White's score with this move: win rate plus half the draw rate
    pub performance: f64,
}

impl CandidateMove {
    pub fn new(uci: Option<String>, san: String, white: u64, draws: u64, black: u64) -> Self {
        let total = white + draws + black;
        let (win_rate, draw_rate) = if total > 0 {
            (white as f64 / total as f64, draws as f64 / total as f64)
        } else {
            (0.0, 0.0)
        };

        Self {
            uci,
            san,
            white,
            draws,
            black,
            total,
            win_rate,
            draw_rate,
            performance: win_rate + 0.5 * draw_rate,
        }
    }
}

/// Book statistics for one position in one database
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookData {
    pub database: OpeningDatabase,
    pub opening: Option<OpeningInfo>,
    pub moves: Vec<CandidateMove>,
    pub white: u64,
    pub draws: u64,
    pub black: u64,
}

impl BookData {
    /// Validates a wire response and derives per-move statistics
    pub fn from_response(database: OpeningDatabase, response: ExplorerResponse) -> Result<Self> {
        if let Some(bad) = response.moves.iter().find(|m| m.san.trim().is_empty()) {
            return Err(Error::RemoteFetchFailed(format!(
                "candidate move without SAN (uci {:?})",
                bad.uci
            )));
        }

        let moves = response
            .moves
            .into_iter()
            .map(|m| CandidateMove::new(m.uci, m.san, m.white, m.draws, m.black))
            .collect();

        Ok(Self {
            database,
            opening: response.opening.map(|o| OpeningInfo {
                eco: Some(o.eco).filter(|e| !e.is_empty()),
                name: o.name,
            }),
            moves,
            white: response.white,
            draws: response.draws,
            black: response.black,
        })
    }

    /// Sum of the candidate moves' sample counts
    pub fn total_games(&self) -> u64 {
        self.moves.iter().map(|m| m.total).sum()
    }
}

/// One candidate move as shown in an attribution summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopMove {
    pub san: String,
    pub total: u64,
    /// Performance as a percentage
    pub performance: f64,
}

/// Aggregate sample counts attached to opening-sourced evaluations
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookStats {
    pub total_games: u64,
    pub top_moves: Vec<TopMove>,
}

impl BookStats {
    pub fn from_book(book: &BookData) -> Self {
        Self {
            total_games: book.total_games(),
            top_moves: book
                .moves
                .iter()
                .take(3)
                .map(|m| TopMove {
                    san: m.san.clone(),
                    total: m.total,
                    performance: (m.performance * 1000.0).round() / 10.0,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "white": 1200, "draws": 600, "black": 1000,
        "moves": [
            {"uci": "g1f3", "san": "Nf3", "white": 700, "draws": 200, "black": 100, "averageRating": 1950},
            {"uci": "f1c4", "san": "Bc4", "white": 300, "draws": 300, "black": 400}
        ],
        "opening": {"eco": "C20", "name": "King's Pawn Game"},
        "topGames": []
    }"#;

    #[test]
    fn test_response_derives_rates() {
        let response: ExplorerResponse = serde_json::from_str(SAMPLE).unwrap();
        let book = BookData::from_response(OpeningDatabase::Lichess, response).unwrap();

        assert_eq!(book.total_games(), 2000);
        let nf3 = &book.moves[0];
        assert_eq!(nf3.total, 1000);
        assert!((nf3.win_rate - 0.7).abs() < 1e-9);
        assert!((nf3.draw_rate - 0.2).abs() < 1e-9);
        assert!((nf3.performance - 0.8).abs() < 1e-9);
        assert_eq!(
            book.opening,
            Some(OpeningInfo {
                eco: Some("C20".into()),
                name: "King's Pawn Game".into()
            })
        );
    }

    #[test]
    fn test_null_opening_is_accepted() {
        let json = r#"{"white": 0, "draws": 0, "black": 0, "moves": [], "opening": null}"#;
        let response: ExplorerResponse = serde_json::from_str(json).unwrap();
        let book = BookData::from_response(OpeningDatabase::Masters, response).unwrap();
        assert!(book.opening.is_none());
        assert_eq!(book.total_games(), 0);
    }

    #[test]
    fn test_schema_rejects_missing_or_negative_counts() {
        let missing_moves = r#"{"white": 1, "draws": 0, "black": 0}"#;
        assert!(serde_json::from_str::<ExplorerResponse>(missing_moves).is_err());

        let negative = r#"{"white": 1, "draws": 0, "black": 0,
            "moves": [{"san": "e4", "white": -3, "draws": 0, "black": 0}]}"#;
        assert!(serde_json::from_str::<ExplorerResponse>(negative).is_err());
    }

    #[test]
    fn test_empty_san_is_remote_fetch_failure() {
        let json = r#"{"white": 1, "draws": 0, "black": 0,
            "moves": [{"uci": "e2e4", "san": "", "white": 1, "draws": 0, "black": 0}]}"#;
        let response: ExplorerResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(
            BookData::from_response(OpeningDatabase::Lichess, response),
            Err(Error::RemoteFetchFailed(_))
        ));
    }

    #[test]
    fn test_query_pairs_filter_only_for_lichess() {
        let mut request = ExplorerRequest {
            database: OpeningDatabase::Lichess,
            fen: "startfen".into(),
            speeds: "blitz".into(),
            ratings: "2000".into(),
            moves: 10,
        };
        let keys: Vec<&str> = request.query_pairs().iter().map(|(k, _)| *k).collect();
        assert_eq!(
            keys,
            vec!["variant", "fen", "speeds", "ratings", "moves", "topGames", "recentGames"]
        );

        request.database = OpeningDatabase::Masters;
        let keys: Vec<&str> = request.query_pairs().iter().map(|(k, _)| *k).collect();
        assert!(!keys.contains(&"speeds"));
        assert!(keys.contains(&"topGames"));
    }

    #[test]
    fn test_book_stats_top_three() {
        let response: ExplorerResponse = serde_json::from_str(SAMPLE).unwrap();
        let book = BookData::from_response(OpeningDatabase::Lichess, response).unwrap();
        let stats = BookStats::from_book(&book);

        assert_eq!(stats.total_games, 2000);
        assert_eq!(stats.top_moves.len(), 2);
        assert_eq!(stats.top_moves[0].san, "Nf3");
        assert_eq!(stats.top_moves[0].performance, 80.0);
    }

    #[test]
    fn test_database_parse() {
        assert_eq!("Masters".parse::<OpeningDatabase>().unwrap(), OpeningDatabase::Masters);
        assert!("player".parse::<OpeningDatabase>().is_err());
    }
}
