//! Move replay on top of shakmaty: per-position move-token prefixes and FENs

use shakmaty::fen::Fen;
use shakmaty::san::San;
use shakmaty::{Chess, Color, EnPassantMode, Move, Position, Role, Square};

use crate::engine::MoveToken;
use crate::error::{Error, Result};

/// One position of a game, reached after `index` half-moves
#[derive(Debug, Clone, PartialEq)]
pub struct PositionContext {
    pub index: usize,
    /// Moves from the start position leading here
    pub moves: Vec<MoveToken>,
    pub fen: String,
}

impl PositionContext {
    pub fn starting() -> Self {
        Self {
            index: 0,
            moves: Vec::new(),
            fen: Fen::from_position(&Chess::default(), EnPassantMode::Legal).to_string(),
        }
    }

    /// Whether the second player (Black) is to move
    pub fn second_player_to_move(&self) -> bool {
        self.index % 2 == 1
    }
}

/// Every position of a replayed move list
#[derive(Debug)]
pub struct GameLine {
    /// Index `i` holds the position after `i` half-moves, or the reason it
    /// could not be reached
    pub positions: Vec<Result<PositionContext>>,
    /// Side to move in the final reachable position
    pub final_turn: Color,
}

impl GameLine {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Index of the first half-move that could not be played
    pub fn first_rejected(&self) -> Option<usize> {
        self.positions
            .iter()
            .position(|p| p.is_err())
            .map(|i| i - 1)
    }
}

/// Replays SAN moves from the start position.
///
/// Always yields `moves.len() + 1` entries. Once a move fails to parse or is
/// illegal, that position and every later one is an `InvalidPosition` error.
pub fn replay_san<S: AsRef<str>>(moves: &[S]) -> GameLine {
    let mut position = Chess::default();
    let mut tokens: Vec<MoveToken> = Vec::with_capacity(moves.len());
    let mut positions = Vec::with_capacity(moves.len() + 1);
    positions.push(Ok(PositionContext::starting()));

    let mut failure: Option<String> = None;

    for (ply, san) in moves.iter().enumerate() {
        let index = ply + 1;
        let san = san.as_ref();

        if let Some(reason) = &failure {
            positions.push(Err(Error::InvalidPosition(format!(
                "position {} follows rejected move: {}",
                index, reason
            ))));
            continue;
        }

        match play_san(&position, san) {
            Ok((next, token)) => {
                position = next;
                tokens.push(token);
                positions.push(Ok(PositionContext {
                    index,
                    moves: tokens.clone(),
                    fen: Fen::from_position(&position, EnPassantMode::Legal).to_string(),
                }));
            }
            Err(e) => {
                let reason = format!("half-move {} '{}': {}", index, san, e);
                positions.push(Err(Error::InvalidPosition(reason.clone())));
                failure = Some(reason);
            }
        }
    }

    GameLine {
        positions,
        final_turn: position.turn(),
    }
}

fn play_san(position: &Chess, san: &str) -> Result<(Chess, MoveToken)> {
    let parsed: San = san
        .parse()
        .map_err(|_| Error::InvalidPosition(format!("unparsable move '{}'", san)))?;
    let mv = parsed
        .to_move(position)
        .map_err(|_| Error::InvalidPosition(format!("illegal move '{}'", san)))?;
    let token: MoveToken = move_to_uci(&mv).parse()?;
    let next = position
        .clone()
        .play(mv)
        .map_err(|_| Error::InvalidPosition(format!("illegal move '{}'", san)))?;
    Ok((next, token))
}

/// Standard UCI notation for a move (castling as king two squares)
pub fn move_to_uci(mv: &Move) -> String {
    match mv {
        Move::Normal {
            from,
            to,
            promotion,
            ..
        } => {
            let promo = promotion
                .map(|r| match r {
                    Role::Queen => "q",
                    Role::Rook => "r",
                    Role::Bishop => "b",
                    Role::Knight => "n",
                    _ => "",
                })
                .unwrap_or("");
            format!("{}{}{}", from, to, promo)
        }
        Move::EnPassant { from, to, .. } => format!("{}{}", from, to),
        Move::Castle { king, rook } => {
            let file = if rook.file() > king.file() {
                shakmaty::File::G
            } else {
                shakmaty::File::C
            };
            format!("{}{}", king, Square::from_coords(file, king.rank()))
        }
        Move::Put { .. } => String::new(),
    }
}
