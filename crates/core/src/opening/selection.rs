//! Book move selection and opening evaluation

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::types::{BookData, CandidateMove};
use crate::engine::Evaluation;
use crate::error::{Error, Result};

/// How a book move is picked among the candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionStrategy {
    /// Most played
    Popular,
    /// Best score for White
    Performance,
    /// Popularity and performance blended 30/70
    Balanced,
    /// Weighted random pick favouring strong, well-sampled moves
    Random,
}

impl fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SelectionStrategy::Popular => "popular",
            SelectionStrategy::Performance => "performance",
            SelectionStrategy::Balanced => "balanced",
            SelectionStrategy::Random => "random",
        };
        f.write_str(name)
    }
}

impl FromStr for SelectionStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "popular" => Ok(SelectionStrategy::Popular),
            "performance" => Ok(SelectionStrategy::Performance),
            "balanced" => Ok(SelectionStrategy::Balanced),
            "random" => Ok(SelectionStrategy::Random),
            other => Err(Error::Config(format!("unknown selection strategy '{}'", other))),
        }
    }
}

const POPULARITY_WEIGHT: f64 = 0.3;
const PERFORMANCE_WEIGHT: f64 = 0.7;
const MIN_RANDOM_WEIGHT: f64 = 0.1;

/// Picks a book move using the thread-local RNG for the random strategy
pub fn select_best_move(
    book: &BookData,
    strategy: SelectionStrategy,
    min_samples: u64,
) -> Option<&CandidateMove> {
    select_best_move_with(book, strategy, min_samples, &mut rand::rng())
}

/// Picks a book move among candidates with at least `min_samples` games.
///
/// When no candidate reaches the threshold, the most played move is returned.
pub fn select_best_move_with<'a, R: Rng + ?Sized>(
    book: &'a BookData,
    strategy: SelectionStrategy,
    min_samples: u64,
    rng: &mut R,
) -> Option<&'a CandidateMove> {
    let candidates: Vec<&CandidateMove> =
        book.moves.iter().filter(|m| m.total >= min_samples).collect();

    if candidates.is_empty() {
        return first_max_by(book.moves.iter(), |m| m.total as f64);
    }

    match strategy {
        SelectionStrategy::Popular => first_max_by(candidates.into_iter(), |m| m.total as f64),
        SelectionStrategy::Performance => {
            first_max_by(candidates.into_iter(), |m| m.performance)
        }
        SelectionStrategy::Balanced => {
            let max_total = candidates.iter().map(|m| m.total).max().unwrap_or(0).max(1) as f64;
            first_max_by(candidates.into_iter(), |m| {
                POPULARITY_WEIGHT * (m.total as f64 / max_total) + PERFORMANCE_WEIGHT * m.performance
            })
        }
        SelectionStrategy::Random => weighted_pick(&candidates, rng),
    }
}

fn weighted_pick<'a, R: Rng + ?Sized>(
    candidates: &[&'a CandidateMove],
    rng: &mut R,
) -> Option<&'a CandidateMove> {
    let weights: Vec<f64> = candidates
        .iter()
        .map(|m| (m.performance * (m.total as f64).sqrt()).max(MIN_RANDOM_WEIGHT))
        .collect();
    let sum: f64 = weights.iter().sum();

    let mut roll = rng.random_range(0.0..sum);
    for (candidate, weight) in candidates.iter().zip(&weights) {
        if roll < *weight {
            return Some(*candidate);
        }
        roll -= weight;
    }
    candidates.last().copied()
}

// Ties keep the earliest candidate, i.e. the explorer's ordering
fn first_max_by<'a, I, F>(iter: I, key: F) -> Option<&'a CandidateMove>
where
    I: Iterator<Item = &'a CandidateMove>,
    F: Fn(&CandidateMove) -> f64,
{
    let mut best: Option<(&CandidateMove, f64)> = None;
    for candidate in iter {
        let score = key(candidate);
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((candidate, score)),
        }
    }
    best.map(|(candidate, _)| candidate)
}

/// Converts book statistics into a White-perspective evaluation.
///
/// The games-weighted performance is centred on 0.5 and scaled by 100, so a
/// book where White scores 55% evaluates to +5.00. Positions with fewer than
/// `min_games` samples have no book evaluation.
pub fn opening_evaluation(book: &BookData, min_games: u64) -> Option<Evaluation> {
    let total = book.total_games();
    if book.moves.is_empty() || total == 0 || total < min_games {
        return None;
    }

    let weighted: f64 = book
        .moves
        .iter()
        .map(|m| m.performance * m.total as f64)
        .sum::<f64>()
        / total as f64;

    Some(Evaluation::Pawns((weighted - 0.5) * 100.0))
}
