use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use chess_eval_core::opening::selection::select_best_move;
use chess_eval_core::opening::{BookData, CandidateMove, OpeningDatabase, SelectionStrategy};
use chess_eval_core::Evaluation;

use super::ApiError;
use crate::AppState;

#[derive(Deserialize)]
pub struct BookQuery {
    pub fen: String,
    pub strategy: Option<String>,
    pub database: Option<String>,
}

#[derive(Serialize)]
pub struct BookResponse {
    pub database: OpeningDatabase,
    pub strategy: SelectionStrategy,
    pub book: Option<BookData>,
    pub evaluation: Option<Evaluation>,
    pub selected_move: Option<CandidateMove>,
}

pub async fn lookup(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BookQuery>,
) -> Result<Json<BookResponse>, ApiError> {
    let strategy = match &query.strategy {
        Some(name) => name.parse()?,
        None => state.config.opening_book.strategy,
    };
    let database = match &query.database {
        Some(name) => name.parse()?,
        None => state.book.database(),
    };

    let book = state.book.query(&query.fen, database).await;
    let evaluation = book
        .as_ref()
        .and_then(|b| state.book.calculate_opening_evaluation(b));
    let selected_move = book.as_ref().and_then(|b| {
        select_best_move(b, strategy, state.config.opening_book.min_move_samples).cloned()
    });

    Ok(Json(BookResponse {
        database,
        strategy,
        book,
        evaluation,
        selected_move,
    }))
}

#[derive(Deserialize)]
pub struct DatabaseForm {
    pub database: OpeningDatabase,
}

#[derive(Serialize)]
pub struct DatabaseResponse {
    pub database: OpeningDatabase,
}

pub async fn switch_database(
    State(state): State<Arc<AppState>>,
    Json(form): Json<DatabaseForm>,
) -> Json<DatabaseResponse> {
    state.book.switch_database(form.database);
    info!("Opening database set to {}", form.database);

    Json(DatabaseResponse {
        database: state.book.database(),
    })
}
