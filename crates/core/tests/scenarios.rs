//! End-to-end evaluation scenarios with a scripted engine and explorer

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use chess_eval_core::config::{EngineConfig, OpeningBookConfig};
use chess_eval_core::engine::{
    AnalysisPreferences, AnalysisResult, EngineProcessBridge, MoveToken, Score,
};
use chess_eval_core::error::{Error, Result};
use chess_eval_core::evaluator::{EvaluationSource, EvaluatorSettings, HybridEvaluator};
use chess_eval_core::opening::types::{ExplorerRequest, ExplorerResponse};
use chess_eval_core::opening::{ExplorerTransport, OpeningBookClient};
use chess_eval_core::parser::parse_first_game;
use chess_eval_core::pipeline::GameEvaluationPipeline;
use chess_eval_core::rules::replay_san;
use chess_eval_core::{Evaluation, PositionAnalyzer};
use tokio::io::{duplex, split, AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Explorer serving canned responses per FEN; unknown positions have no games
#[derive(Default)]
struct CannedExplorer {
    responses: HashMap<String, String>,
    failing: bool,
    calls: AtomicUsize,
}

impl ExplorerTransport for CannedExplorer {
    async fn fetch(&self, request: &ExplorerRequest) -> Result<ExplorerResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(Error::RemoteFetchFailed(
                "explorer returned 500 Internal Server Error".into(),
            ));
        }
        let body = self
            .responses
            .get(&request.fen)
            .cloned()
            .unwrap_or_else(|| r#"{"white":0,"draws":0,"black":0,"moves":[]}"#.to_string());
        Ok(serde_json::from_str(&body)?)
    }
}

/// Analyzer returning +0.25 from the side to move for every position
#[derive(Default)]
struct SteadyEngine {
    requests: Mutex<Vec<usize>>,
}

impl PositionAnalyzer for SteadyEngine {
    async fn analyze(
        &self,
        moves: &[MoveToken],
        _preferences: &AnalysisPreferences,
    ) -> Result<AnalysisResult> {
        self.requests.lock().unwrap().push(moves.len());
        Ok(AnalysisResult {
            score: Some(Score::Centipawns(25)),
            depth: Some(14),
            pv: None,
            best_move: Some("a2a3".into()),
        })
    }
}

fn fast_book_config() -> OpeningBookConfig {
    OpeningBookConfig {
        min_interval_ms: 0,
        ..OpeningBookConfig::default()
    }
}

fn fen_after(moves: &[&str]) -> String {
    let line = replay_san(moves);
    line.positions[moves.len()].as_ref().unwrap().fen.clone()
}

fn to_strings(moves: &[&str]) -> Vec<String> {
    moves.iter().map(|m| m.to_string()).collect()
}

#[tokio::test]
async fn scenario_a_opening_book_supplies_early_position() {
    // 5000 games after 1. e4, e5 played in 70% of them
    let mut explorer = CannedExplorer::default();
    explorer.responses.insert(
        fen_after(&["e4"]),
        r#"{"white": 2600, "draws": 900, "black": 1500,
            "opening": {"eco": "B00", "name": "King's Pawn Game"},
            "moves": [
                {"uci": "e7e5", "san": "e5", "white": 1800, "draws": 700, "black": 1000},
                {"uci": "c7c5", "san": "c5", "white": 800, "draws": 200, "black": 500}
            ]}"#
        .to_string(),
    );

    let book = OpeningBookClient::with_transport(fast_book_config(), explorer);
    let pipeline = GameEvaluationPipeline::new(HybridEvaluator::new(
        SteadyEngine::default(),
        book,
        EvaluatorSettings::default(),
    ));

    let set = pipeline
        .evaluate_game(&to_strings(&["e4", "e5", "Nf3", "Nc6"]), &[], |_| {})
        .await
        .unwrap();

    assert_eq!(set.records.len(), 5);
    let first = &set.records[1];
    assert_eq!(first.source, EvaluationSource::Opening);
    // (2600 + 450) / 5000 = 0.61
    assert_eq!(first.evaluation.to_string(), "+11.00");
    assert_eq!(first.opening.as_ref().unwrap().name, "King's Pawn Game");

    let stats = first.stats.as_ref().unwrap();
    assert_eq!(stats.total_games, 5000);
    assert_eq!(stats.top_moves[0].san, "e5");
    assert_eq!(stats.top_moves[0].total, 3500);

    assert_eq!(set.dominant_source, "Hybrid");
    assert_eq!(set.opening.as_ref().unwrap().eco.as_deref(), Some("B00"));

    // Positions without book data went to the engine, flipped for Black
    assert_eq!(set.records[0].source, EvaluationSource::Engine);
    assert_eq!(set.records[2].evaluation.to_string(), "+0.25");
    assert_eq!(set.records[3].evaluation.to_string(), "-0.25");
}

#[tokio::test]
async fn scenario_b_embedded_prefix_then_fallthrough() {
    let game = parse_first_game(
        r#"[Event "Annotated"]

1. e4 { [%eval 0.3] } 1... e5 { [%eval 0.28] } 2. Nf3 { [%eval 0.25] } 2... Nc6 3. Bb5 a6 *
"#,
    )
    .unwrap();
    assert_eq!(game.move_count(), 6);

    let settings = EvaluatorSettings {
        max_plies: 4,
        ..EvaluatorSettings::default()
    };
    let book = OpeningBookClient::with_transport(fast_book_config(), CannedExplorer::default());
    let pipeline = GameEvaluationPipeline::new(HybridEvaluator::new(
        SteadyEngine::default(),
        book,
        settings,
    ));

    let set = pipeline.evaluate_pgn_game(&game, |_| {}).await.unwrap();
    let sources: Vec<EvaluationSource> = set.records.iter().map(|r| r.source).collect();

    assert_eq!(set.records.len(), 7);
    assert_eq!(&sources[..4], &[EvaluationSource::Embedded; 4]);
    assert!(sources[4..].iter().all(|s| *s == EvaluationSource::Engine));
    assert_eq!(set.records[0].evaluation, Evaluation::EVEN);
    assert_eq!(set.records[3].evaluation, Evaluation::Pawns(0.25));

    // The book was consulted only for position 4, inside the ply budget
    let calls = pipeline.evaluator().book().transport().calls.load(Ordering::SeqCst);
    assert_eq!(calls, 1);
    assert_eq!(*pipeline.evaluator().analyzer().requests.lock().unwrap(), vec![4, 5, 6]);
}

#[tokio::test]
async fn scenario_c_terminal_line_without_progress() {
    let (bridge_io, engine_io) = duplex(16 * 1024);

    tokio::spawn(async move {
        let (read, mut write) = split(engine_io);
        let mut lines = BufReader::new(read).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let reply = match line.as_str() {
                "uci" => "id name Blank\nuciok\n",
                "isready" => "readyok\n",
                l if l.starts_with("go") => "bestmove e7e5\n",
                _ => continue,
            };
            if write.write_all(reply.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    let (read, write) = split(bridge_io);
    let mut bridge = EngineProcessBridge::new(EngineConfig {
        settle_delay_ms: 1,
        hard_timeout_ms: 1000,
        ..EngineConfig::default()
    });
    bridge.attach(BufReader::new(read), write).await.unwrap();

    let moves: Vec<MoveToken> = vec!["e2e4".parse().unwrap()];
    let result = bridge
        .analyze_moves(&moves, &AnalysisPreferences::default())
        .await
        .unwrap();

    assert!(result.score.is_none());
    assert!(result.depth.is_none());
    assert!(result.pv.is_none());
    assert_eq!(result.best_move.as_deref(), Some("e7e5"));
}

#[tokio::test]
async fn scenario_d_server_error_falls_through_to_engine() {
    let explorer = CannedExplorer {
        failing: true,
        ..Default::default()
    };
    let book = OpeningBookClient::with_transport(fast_book_config(), explorer);

    assert!(book.query(&fen_after(&["d4"]), book.database()).await.is_none());

    let pipeline = GameEvaluationPipeline::new(HybridEvaluator::new(
        SteadyEngine::default(),
        book,
        EvaluatorSettings::default(),
    ));
    let set = pipeline
        .evaluate_game(&to_strings(&["d4"]), &[], |_| {})
        .await
        .unwrap();

    assert!(set
        .records
        .iter()
        .all(|r| r.source == EvaluationSource::Engine));
    assert_eq!(set.records[1].evaluation.to_string(), "-0.25");
}

#[tokio::test]
async fn every_move_list_yields_one_record_per_position() {
    let games: [&[&str]; 3] = [&[], &["c4"], &["e4", "e5", "Qh5", "Nc6", "Bc4", "Nf6", "Qxf7#"]];

    for moves in games {
        let book = OpeningBookClient::with_transport(fast_book_config(), CannedExplorer::default());
        let pipeline = GameEvaluationPipeline::new(HybridEvaluator::new(
            SteadyEngine::default(),
            book,
            EvaluatorSettings::default(),
        ));
        let set = pipeline
            .evaluate_game(&to_strings(moves), &[], |_| {})
            .await
            .unwrap();
        assert_eq!(set.records.len(), moves.len() + 1);
    }
}
