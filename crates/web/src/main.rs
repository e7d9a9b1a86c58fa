use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use chess_eval_core::evaluator::{EvaluatorSettings, HybridEvaluator};
use chess_eval_core::{EngineProcessBridge, EvalConfig, GameEvaluationPipeline, OpeningBookClient};

mod routes;

pub type SharedPipeline =
    GameEvaluationPipeline<Arc<EngineProcessBridge>, Arc<OpeningBookClient>>;

pub struct AppState {
    pub config: EvalConfig,
    pub engine: Arc<EngineProcessBridge>,
    pub book: Arc<OpeningBookClient>,
    pub pipeline: SharedPipeline,
    /// Games are evaluated one at a time; the engine takes a single request
    pub evaluation_lock: tokio::sync::Mutex<()>,
}

impl AppState {
    pub fn new(config: EvalConfig, engine: EngineProcessBridge) -> chess_eval_core::Result<Self> {
        let engine = Arc::new(engine);
        let book = Arc::new(OpeningBookClient::new(config.opening_book.clone())?);
        let pipeline = GameEvaluationPipeline::new(HybridEvaluator::new(
            Arc::clone(&engine),
            Arc::clone(&book),
            EvaluatorSettings::from_config(&config),
        ));

        Ok(Self {
            config,
            engine,
            book,
            pipeline,
            evaluation_lock: tokio::sync::Mutex::new(()),
        })
    }
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/evaluate", post(routes::evaluate))
        .route("/engine", get(routes::engine_status))
        .route("/opening-book", get(routes::opening::lookup))
        .route("/opening-book/database", post(routes::opening::switch_database))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

fn load_config() -> EvalConfig {
    match std::env::var("CHESS_EVAL_CONFIG") {
        Ok(path) => EvalConfig::load(&path).expect("Failed to load configuration"),
        Err(_) => EvalConfig::default(),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = load_config();

    let mut engine = EngineProcessBridge::new(config.engine.clone());
    if let Err(e) = engine.start().await {
        // Embedded and book evaluations still work without an engine
        warn!("Engine not available: {}", e);
    }

    let state = Arc::new(AppState::new(config, engine).expect("Failed to create opening book client"));

    let addr = std::env::var("CHESS_EVAL_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();

    info!("Server running at http://{}", addr);

    axum::serve(listener, app(state)).await.unwrap();
}
