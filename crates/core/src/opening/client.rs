//! Opening explorer client with caching, rate limiting and soft failure

use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rand::Rng;
use reqwest::Client;
use tracing::{debug, warn};

use super::cache::TtlCache;
use super::rate_limit::RateLimiter;
use super::selection;
use super::types::{BookData, CandidateMove, ExplorerRequest, ExplorerResponse, OpeningDatabase};
use crate::config::OpeningBookConfig;
use crate::engine::Evaluation;
use crate::error::{Error, Result};

/// Fetches one explorer response
pub trait ExplorerTransport: Send + Sync {
    fn fetch(
        &self,
        request: &ExplorerRequest,
    ) -> impl Future<Output = Result<ExplorerResponse>> + Send;
}

/// HTTP transport against the public explorer
pub struct HttpExplorer {
    client: Client,
    base_url: String,
}

impl HttpExplorer {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent("chess-eval/0.1")
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

impl ExplorerTransport for HttpExplorer {
    async fn fetch(&self, request: &ExplorerRequest) -> Result<ExplorerResponse> {
        let url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            request.database.as_str()
        );

        let response = self
            .client
            .get(&url)
            .query(&request.query_pairs())
            .send()
            .await
            .map_err(|e| Error::RemoteFetchFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::RemoteFetchFailed(format!(
                "explorer returned {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::RemoteFetchFailed(e.to_string()))?;

        serde_json::from_str(&body)
            .map_err(|e| Error::RemoteFetchFailed(format!("malformed explorer response: {}", e)))
    }
}

type CacheKey = (String, OpeningDatabase);

/// Opening book backed by an explorer transport.
///
/// Lookups never fail: any transport or schema error is logged and reported
/// as "no data".
pub struct OpeningBookClient<T = HttpExplorer> {
    transport: T,
    config: OpeningBookConfig,
    cache: Mutex<TtlCache<CacheKey, BookData>>,
    limiter: RateLimiter,
    database: Mutex<OpeningDatabase>,
}

impl OpeningBookClient<HttpExplorer> {
    pub fn new(config: OpeningBookConfig) -> Result<Self> {
        let transport = HttpExplorer::new(config.base_url.clone(), config.request_timeout())?;
        Ok(Self::with_transport(config, transport))
    }
}

impl<T: ExplorerTransport> OpeningBookClient<T> {
    pub fn with_transport(config: OpeningBookConfig, transport: T) -> Self {
        Self {
            cache: Mutex::new(TtlCache::new(config.cache_capacity, config.cache_ttl())),
            limiter: RateLimiter::new(config.min_interval(), config.rate_limit_scope),
            database: Mutex::new(config.database),
            transport,
            config,
        }
    }

    pub fn config(&self) -> &OpeningBookConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Database used by default for lookups
    pub fn database(&self) -> OpeningDatabase {
        *self.database.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Changes the active database and drops every cached entry
    pub fn switch_database(&self, database: OpeningDatabase) {
        let previous = {
            let mut active = self.database.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *active, database)
        };
        self.clear_cache();
        debug!("Opening database switched from {} to {}", previous, database);
    }

    pub fn clear_cache(&self) {
        self.cache_lock().clear();
    }

    pub fn cached_entries(&self) -> usize {
        self.cache_lock().len()
    }

    /// Book data for `fen` in `database`, or `None` when unavailable
    pub async fn query(&self, fen: &str, database: OpeningDatabase) -> Option<BookData> {
        let key = (fen.to_string(), database);

        let cached = self.cache_lock().get(&key);
        if let Some(book) = cached {
            debug!("Opening cache hit for {} in {}", fen, database);
            return Some(book);
        }

        match self.fetch_with_retry(fen, database).await {
            Ok(book) => {
                let evicted = self.cache_lock().insert(key, book.clone());
                if let Some((old_fen, _)) = evicted {
                    debug!("Opening cache full, evicted {}", old_fen);
                }
                Some(book)
            }
            Err(e) => {
                warn!("Opening lookup failed for {} in {}: {}", fen, database, e);
                None
            }
        }
    }

    /// Opening evaluation for a book, honouring the configured game threshold
    pub fn calculate_opening_evaluation(&self, book: &BookData) -> Option<Evaluation> {
        selection::opening_evaluation(book, self.config.min_games)
    }

    /// Book move chosen by the configured strategy
    pub fn select_best_move<'a>(&self, book: &'a BookData) -> Option<&'a CandidateMove> {
        selection::select_best_move(book, self.config.strategy, self.config.min_move_samples)
    }

    async fn fetch_with_retry(&self, fen: &str, database: OpeningDatabase) -> Result<BookData> {
        let request = ExplorerRequest {
            database,
            fen: fen.to_string(),
            speeds: self.config.speeds.clone(),
            ratings: self.config.ratings.clone(),
            moves: self.config.moves,
        };

        let mut attempt = 0;
        loop {
            self.limiter.acquire(database).await;

            let outcome = match self.transport.fetch(&request).await {
                Ok(response) => BookData::from_response(database, response),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(book) => return Ok(book),
                Err(e) if attempt < self.config.max_retries => {
                    attempt += 1;
                    let jitter = rand::rng().random_range(100..=300);
                    debug!(
                        "Explorer attempt {} failed ({}), retrying in {}ms",
                        attempt, e, jitter
                    );
                    tokio::time::sleep(Duration::from_millis(jitter)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn cache_lock(&self) -> MutexGuard<'_, TtlCache<CacheKey, BookData>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitScope;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use tokio::time::Instant;

    const FEN: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";

    fn response() -> ExplorerResponse {
        serde_json::from_str(
            r#"{"white": 2000, "draws": 1000, "black": 2000,
                "moves": [{"uci": "e7e5", "san": "e5", "white": 2000, "draws": 1000, "black": 2000}],
                "opening": {"eco": "B00", "name": "King's Pawn"}}"#,
        )
        .unwrap()
    }

    /// Scripted transport; an empty script answers with `response()`
    #[derive(Default)]
    struct FakeExplorer {
        script: Mutex<VecDeque<Result<ExplorerResponse>>>,
        calls: Arc<Mutex<Vec<(Instant, ExplorerRequest)>>>,
    }

    impl FakeExplorer {
        fn scripted(script: Vec<Result<ExplorerResponse>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<(Instant, ExplorerRequest)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ExplorerTransport for FakeExplorer {
        async fn fetch(&self, request: &ExplorerRequest) -> Result<ExplorerResponse> {
            self.calls
                .lock()
                .unwrap()
                .push((Instant::now(), request.clone()));
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok(response()))
        }
    }

    fn client(config: OpeningBookConfig, fake: FakeExplorer) -> OpeningBookClient<FakeExplorer> {
        OpeningBookClient::with_transport(config, fake)
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_query_within_ttl_hits_cache() {
        let book = client(OpeningBookConfig::default(), FakeExplorer::default());

        let first = book.query(FEN, OpeningDatabase::Lichess).await.unwrap();
        let second = book.query(FEN, OpeningDatabase::Lichess).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(book.transport().calls().len(), 1);
        assert_eq!(book.cached_entries(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_refetched() {
        let config = OpeningBookConfig {
            cache_ttl_secs: 60,
            ..Default::default()
        };
        let book = client(config, FakeExplorer::default());

        book.query(FEN, OpeningDatabase::Lichess).await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;
        book.query(FEN, OpeningDatabase::Lichess).await.unwrap();

        assert_eq!(book.transport().calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_fens_are_spaced_by_interval() {
        let book = client(OpeningBookConfig::default(), FakeExplorer::default());

        book.query(FEN, OpeningDatabase::Lichess).await;
        book.query("other fen", OpeningDatabase::Lichess).await;
        book.query("third fen", OpeningDatabase::Masters).await;

        let calls = book.transport().calls();
        assert_eq!(calls.len(), 3);
        for pair in calls.windows(2) {
            assert!(pair[1].0 - pair[0].0 >= Duration::from_millis(1000));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_database_scope_does_not_delay_other_database() {
        let config = OpeningBookConfig {
            rate_limit_scope: RateLimitScope::PerDatabase,
            ..Default::default()
        };
        let book = client(config, FakeExplorer::default());

        book.query(FEN, OpeningDatabase::Lichess).await;
        book.query(FEN, OpeningDatabase::Masters).await;

        let calls = book.transport().calls();
        assert_eq!(calls[1].0, calls[0].0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_error_is_soft_failure() {
        let fake = FakeExplorer::scripted(vec![Err(Error::RemoteFetchFailed(
            "explorer returned 502 Bad Gateway".into(),
        ))]);
        let book = client(OpeningBookConfig::default(), fake);

        assert!(book.query(FEN, OpeningDatabase::Lichess).await.is_none());
        assert_eq!(book.cached_entries(), 0);

        // Failures are not cached: the next lookup goes out again
        assert!(book.query(FEN, OpeningDatabase::Lichess).await.is_some());
        assert_eq!(book.transport().calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_with_jitter_before_giving_up() {
        let fake = FakeExplorer::scripted(vec![
            Err(Error::RemoteFetchFailed("reset".into())),
            Err(Error::RemoteFetchFailed("reset".into())),
        ]);
        let config = OpeningBookConfig {
            max_retries: 2,
            min_interval_ms: 0,
            ..Default::default()
        };
        let book = client(config, fake);

        assert!(book.query(FEN, OpeningDatabase::Lichess).await.is_some());

        let calls = book.transport().calls();
        assert_eq!(calls.len(), 3);
        for pair in calls.windows(2) {
            let gap = pair[1].0 - pair[0].0;
            assert!(gap >= Duration::from_millis(100) && gap <= Duration::from_millis(300));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_oldest_fen() {
        let config = OpeningBookConfig {
            cache_capacity: 2,
            min_interval_ms: 0,
            ..Default::default()
        };
        let book = client(config, FakeExplorer::default());

        book.query("fen-a", OpeningDatabase::Lichess).await;
        book.query("fen-b", OpeningDatabase::Lichess).await;
        book.query("fen-c", OpeningDatabase::Lichess).await;
        assert_eq!(book.cached_entries(), 2);

        book.query("fen-a", OpeningDatabase::Lichess).await;
        assert_eq!(book.transport().calls().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_database_clears_cache() {
        let book = client(OpeningBookConfig::default(), FakeExplorer::default());
        book.query(FEN, OpeningDatabase::Lichess).await;
        assert_eq!(book.cached_entries(), 1);

        book.switch_database(OpeningDatabase::Masters);
        assert_eq!(book.database(), OpeningDatabase::Masters);
        assert_eq!(book.cached_entries(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_carries_config_filters() {
        let config = OpeningBookConfig {
            speeds: "blitz".into(),
            ratings: "2200".into(),
            moves: 4,
            ..Default::default()
        };
        let book = client(config, FakeExplorer::default());
        book.query(FEN, OpeningDatabase::Lichess).await;

        let (_, request) = &book.transport().calls()[0];
        assert_eq!(request.fen, FEN);
        assert_eq!(request.speeds, "blitz");
        assert_eq!(request.moves, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evaluation_and_selection_use_config() {
        let book = client(OpeningBookConfig::default(), FakeExplorer::default());
        let data = book.query(FEN, OpeningDatabase::Lichess).await.unwrap();

        // 5000 games, White scores exactly 50%
        assert_eq!(
            book.calculate_opening_evaluation(&data),
            Some(Evaluation::Pawns(0.0))
        );
        assert_eq!(book.select_best_move(&data).unwrap().san, "e5");
    }
}
