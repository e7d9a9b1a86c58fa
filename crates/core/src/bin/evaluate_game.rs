//! Evaluates every position of a PGN game and prints one line per position

use chess_eval_core::config::EvalConfig;
use chess_eval_core::engine::EngineProcessBridge;
use chess_eval_core::evaluator::EvaluationSource;
use chess_eval_core::parser::parse_pgn_file;
use chess_eval_core::{live_pipeline, GameEvaluationSet};
use std::env;
use std::process;

struct Args {
    pgn_path: String,
    config_path: Option<String>,
    engine_path: Option<String>,
}

fn parse_args() -> Option<Args> {
    let mut args = env::args().skip(1);
    let mut pgn_path = None;
    let mut config_path = None;
    let mut engine_path = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config_path = Some(args.next()?),
            "--engine" => engine_path = Some(args.next()?),
            _ if pgn_path.is_none() && !arg.starts_with("--") => pgn_path = Some(arg),
            _ => return None,
        }
    }

    Some(Args {
        pgn_path: pgn_path?,
        config_path,
        engine_path,
    })
}

fn print_usage() {
    println!("Usage: evaluate_game <pgn_file> [--config <path>] [--engine <path>]");
    println!();
    println!("The config file may also be given through CHESS_EVAL_CONFIG.");
}

#[tokio::main]
async fn main() {
    let Some(args) = parse_args() else {
        print_usage();
        process::exit(1);
    };

    let config_path = args
        .config_path
        .or_else(|| env::var("CHESS_EVAL_CONFIG").ok());
    let mut config = match config_path {
        Some(path) => EvalConfig::load(&path).unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            process::exit(1);
        }),
        None => EvalConfig::default(),
    };
    if let Some(engine) = args.engine_path {
        config.engine.path = engine;
    }

    let games = parse_pgn_file(&args.pgn_path).unwrap_or_else(|e| {
        eprintln!("Error reading {}: {}", args.pgn_path, e);
        process::exit(1);
    });
    let game = &games[0];
    println!("{} ({} half-moves)", game.summary(), game.move_count());

    let mut engine = EngineProcessBridge::new(config.engine.clone());
    if let Err(e) = engine.start().await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
    println!(
        "[OK] {} ready",
        engine.capabilities().name.as_deref().unwrap_or("Engine")
    );

    let pipeline = live_pipeline(&config, engine).expect("Failed to create opening book client");

    let result = pipeline
        .evaluate_pgn_game(game, |progress| {
            eprint!("\rEvaluating... {}%", progress.percent());
        })
        .await;
    eprintln!();

    match result {
        Ok(set) => print_set(&game.moves, &set),
        Err(e) => {
            eprintln!("Evaluation aborted: {}", e);
            process::exit(1);
        }
    }
}

fn print_set(moves: &[String], set: &GameEvaluationSet) {
    println!();
    for (index, record) in set.records.iter().enumerate() {
        let label = match index {
            0 => "start".to_string(),
            i if i % 2 == 1 => format!("{}. {}", (i + 1) / 2, moves[i - 1]),
            i => format!("{}... {}", i / 2, moves[i - 1]),
        };

        let detail = match record.source {
            EvaluationSource::Opening => record
                .opening
                .as_ref()
                .map(|o| o.name.clone())
                .unwrap_or_default(),
            EvaluationSource::Engine => record
                .best_move
                .as_ref()
                .map(|m| format!("best {}", m))
                .unwrap_or_default(),
            EvaluationSource::Error => record.error.clone().unwrap_or_default(),
            EvaluationSource::Embedded => String::new(),
        };

        println!(
            "{:>3}  {:<14} {:>7}  {:<9} {}",
            index,
            label,
            record.evaluation.to_string(),
            format!("{:?}", record.source),
            detail
        );
    }

    println!();
    println!("Sources: {} {:?}", set.dominant_source, set.source_counts);
    if let Some(opening) = &set.opening {
        match &opening.eco {
            Some(eco) => println!("Opening: {} ({})", opening.name, eco),
            None => println!("Opening: {}", opening.name),
        }
    }
}
