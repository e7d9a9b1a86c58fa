//! Runtime configuration, loadable from TOML

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::AnalysisPreferences;
use crate::error::{Error, Result};
use crate::opening::{OpeningDatabase, SelectionStrategy};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    pub engine: EngineConfig,
    /// Search settings used for every engine-evaluated position of a game
    pub analysis: AnalysisPreferences,
    pub opening_book: OpeningBookConfig,
}

impl EvalConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!("cannot read {}: {}", path.as_ref().display(), e))
        })?;
        Self::from_toml_str(&text)
    }
}

/// Engine process settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Path to the engine binary (or a name on PATH)
    pub path: String,
    pub args: Vec<String>,
    pub handshake_timeout_ms: u64,
    /// Wall-clock limit for a single analysis request
    pub hard_timeout_ms: u64,
    /// Pause between the defensive `stop` and the new position
    pub settle_delay_ms: u64,
    pub hash_mb: u32,
    pub max_threads: u32,
    pub multipv: u32,
}

impl EngineConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn hard_timeout(&self) -> Duration {
        Duration::from_millis(self.hard_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: "stockfish".to_string(),
            args: Vec::new(),
            handshake_timeout_ms: 10_000,
            hard_timeout_ms: 10_000,
            settle_delay_ms: 100,
            hash_mb: 64,
            max_threads: 2,
            multipv: 1,
        }
    }
}

/// Which opening-book requests share one politeness interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitScope {
    /// One interval across every database
    Global,
    /// Each database is limited independently
    PerDatabase,
}

/// Remote opening explorer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpeningBookConfig {
    pub enabled: bool,
    pub base_url: String,
    pub database: OpeningDatabase,
    /// Highest position index still looked up in the book
    pub max_plies: usize,
    /// Minimum aggregate games before the book's evaluation is trusted
    pub min_games: u64,
    /// Minimum games for a candidate move to be considered by move selection
    pub min_move_samples: u64,
    pub speeds: String,
    pub ratings: String,
    /// Number of candidate moves requested
    pub moves: u32,
    pub strategy: SelectionStrategy,
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
    pub min_interval_ms: u64,
    pub rate_limit_scope: RateLimitScope,
    pub max_retries: u32,
    pub request_timeout_secs: u64,
}

impl OpeningBookConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for OpeningBookConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://explorer.lichess.ovh".to_string(),
            database: OpeningDatabase::Lichess,
            max_plies: 20,
            min_games: 100,
            min_move_samples: 10,
            speeds: "blitz,rapid,classical".to_string(),
            ratings: "1600,1800,2000,2200".to_string(),
            moves: 10,
            strategy: SelectionStrategy::Balanced,
            cache_ttl_secs: 24 * 60 * 60,
            cache_capacity: 500,
            min_interval_ms: 1000,
            rate_limit_scope: RateLimitScope::Global,
            max_retries: 0,
            request_timeout_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SearchMode;
    use std::io::Write;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = EvalConfig::from_toml_str("").unwrap();
        assert_eq!(config, EvalConfig::default());
        assert_eq!(config.engine.hard_timeout(), Duration::from_secs(10));
        assert_eq!(config.opening_book.min_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_sections_override() {
        let config = EvalConfig::from_toml_str(
            r#"
            [engine]
            path = "/usr/local/bin/stockfish"
            hard_timeout_ms = 5000

            [analysis]
            mode = "depth"
            depth = 18

            [opening_book]
            database = "masters"
            strategy = "popular"
            rate_limit_scope = "per_database"
            "#,
        )
        .unwrap();

        assert_eq!(config.engine.path, "/usr/local/bin/stockfish");
        assert_eq!(config.engine.hard_timeout_ms, 5000);
        assert_eq!(config.engine.settle_delay_ms, 100);
        assert_eq!(config.analysis.mode, SearchMode::Depth);
        assert_eq!(config.analysis.depth, 18);
        assert_eq!(config.analysis.movetime_ms, 2000);
        assert_eq!(config.opening_book.database, OpeningDatabase::Masters);
        assert_eq!(config.opening_book.strategy, SelectionStrategy::Popular);
        assert_eq!(config.opening_book.rate_limit_scope, RateLimitScope::PerDatabase);
        assert_eq!(config.opening_book.max_plies, 20);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = EvalConfig::from_toml_str("[engine]\nhard_timeout_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[opening_book]\nenabled = false").unwrap();

        let config = EvalConfig::load(file.path()).unwrap();
        assert!(!config.opening_book.enabled);

        assert!(matches!(
            EvalConfig::load("/nonexistent/chess-eval.toml"),
            Err(Error::Config(_))
        ));
    }
}
