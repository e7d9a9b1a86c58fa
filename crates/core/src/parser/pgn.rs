//! PGN parsing with embedded `[%eval]` annotations

use pgn_reader::{RawComment, RawTag, SanPlus, Skip, Visitor};
use std::fs;
use std::io::Cursor;
use std::ops::ControlFlow;
use std::path::Path;

use crate::engine::Evaluation;
use crate::error::{Error, Result};

/// Represents a parsed chess game
#[derive(Debug, Clone, PartialEq)]
pub struct PgnGame {
    pub event: Option<String>,
    pub site: Option<String>,
    pub date: Option<String>,
    pub white: Option<String>,
    pub black: Option<String>,
    pub result: Option<String>,
    pub white_elo: Option<u16>,
    pub black_elo: Option<u16>,
    /// Mainline moves in SAN
    pub moves: Vec<String>,
    /// `evaluations[k]` is the annotation that follows half-move `k`
    pub evaluations: Vec<Option<Evaluation>>,
}

impl PgnGame {
    pub fn move_count(&self) -> usize {
        self.moves.len()
    }

    pub fn summary(&self) -> String {
        let white = self.white.as_deref().unwrap_or("Unknown");
        let black = self.black.as_deref().unwrap_or("Unknown");
        let result = self.result.as_deref().unwrap_or("*");
        format!("{} vs {} - {}", white, black, result)
    }

    pub fn has_embedded_evaluations(&self) -> bool {
        self.evaluations.iter().any(Option::is_some)
    }

    /// Embedded evaluations indexed by position (`moves.len() + 1` entries).
    ///
    /// Position 0 is level when the game carries any annotation at all; the
    /// position after half-move `k` takes the annotation following that move.
    pub fn embedded_evaluations(&self) -> Vec<Option<Evaluation>> {
        let mut positions = Vec::with_capacity(self.moves.len() + 1);
        if self.has_embedded_evaluations() {
            positions.push(Some(Evaluation::EVEN));
        } else {
            positions.push(None);
        }
        positions.extend(
            (0..self.moves.len()).map(|k| self.evaluations.get(k).copied().flatten()),
        );
        positions
    }
}

/// Extracts the value of a `[%eval ...]` command from comment text
pub fn parse_eval_annotation(comment: &str) -> Option<Evaluation> {
    let start = comment.find("[%eval")? + "[%eval".len();
    let rest = &comment[start..];
    let end = rest.find(']')?;
    // Some exporters append the search depth: `[%eval 0.17,23]`
    let value = rest[..end].trim().split(',').next()?.trim();
    value.parse().ok()
}

#[derive(Default)]
struct GameTags {
    event: Option<String>,
    site: Option<String>,
    date: Option<String>,
    white: Option<String>,
    black: Option<String>,
    result: Option<String>,
    white_elo: Option<u16>,
    black_elo: Option<u16>,
}

struct GameMoves {
    tags: GameTags,
    moves: Vec<String>,
    evaluations: Vec<Option<Evaluation>>,
}

struct GameParser;

impl Visitor for GameParser {
    type Tags = GameTags;
    type Movetext = GameMoves;
    type Output = PgnGame;

    fn begin_tags(&mut self) -> ControlFlow<Self::Output, Self::Tags> {
        ControlFlow::Continue(GameTags::default())
    }

    fn tag(
        &mut self,
        tags: &mut Self::Tags,
        name: &[u8],
        value: RawTag<'_>,
    ) -> ControlFlow<Self::Output> {
        let name_str = String::from_utf8_lossy(name);
        let value_str = value.decode_utf8_lossy().to_string();

        match name_str.as_ref() {
            "Event" => tags.event = Some(value_str),
            "Site" => tags.site = Some(value_str),
            "Date" => tags.date = Some(value_str),
            "White" => tags.white = Some(value_str),
            "Black" => tags.black = Some(value_str),
            "Result" => tags.result = Some(value_str),
            "WhiteElo" => tags.white_elo = value_str.parse().ok(),
            "BlackElo" => tags.black_elo = value_str.parse().ok(),
            _ => {}
        }

        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, tags: Self::Tags) -> ControlFlow<Self::Output, Self::Movetext> {
        ControlFlow::Continue(GameMoves {
            tags,
            moves: Vec::new(),
            evaluations: Vec::new(),
        })
    }

    // Legality is checked later by the rules layer so an illegal move can
    // still be reported per position.
    fn san(&mut self, movetext: &mut Self::Movetext, san: SanPlus) -> ControlFlow<Self::Output> {
        movetext.moves.push(san.san.to_string());
        movetext.evaluations.push(None);
        ControlFlow::Continue(())
    }

    fn comment(
        &mut self,
        movetext: &mut Self::Movetext,
        comment: RawComment<'_>,
    ) -> ControlFlow<Self::Output> {
        if let Some(slot) = movetext.evaluations.last_mut() {
            let text = String::from_utf8_lossy(comment.as_bytes());
            if let Some(eval) = parse_eval_annotation(&text) {
                *slot = Some(eval);
            }
        }
        ControlFlow::Continue(())
    }

    fn begin_variation(
        &mut self,
        _movetext: &mut Self::Movetext,
    ) -> ControlFlow<Self::Output, Skip> {
        ControlFlow::Continue(Skip(true))
    }

    fn end_game(&mut self, movetext: Self::Movetext) -> Self::Output {
        PgnGame {
            event: movetext.tags.event,
            site: movetext.tags.site,
            date: movetext.tags.date,
            white: movetext.tags.white,
            black: movetext.tags.black,
            result: movetext.tags.result,
            white_elo: movetext.tags.white_elo,
            black_elo: movetext.tags.black_elo,
            moves: movetext.moves,
            evaluations: movetext.evaluations,
        }
    }
}

pub fn parse_pgn_file<P: AsRef<Path>>(path: P) -> Result<Vec<PgnGame>> {
    let contents = fs::read_to_string(path)?;
    parse_pgn_string(&contents)
}

pub fn parse_pgn_string(pgn: &str) -> Result<Vec<PgnGame>> {
    let mut parser = GameParser;
    let mut games: Vec<PgnGame> = Vec::new();

    let cursor = Cursor::new(pgn.as_bytes());
    let mut reader = pgn_reader::Reader::new(cursor);

    loop {
        match reader.read_game(&mut parser) {
            Ok(Some(game)) => games.push(game),
            Ok(None) => break,
            Err(e) => return Err(Error::Pgn(e.to_string())),
        }
    }

    games.retain(|g| !g.moves.is_empty() || g.white.is_some() || g.event.is_some());

    if games.is_empty() {
        Err(Error::Pgn("No valid games found in PGN".to_string()))
    } else {
        Ok(games)
    }
}

/// Parses the first game of a PGN document
pub fn parse_first_game(pgn: &str) -> Result<PgnGame> {
    parse_pgn_string(pgn)?
        .into_iter()
        .next()
        .ok_or_else(|| Error::Pgn("No valid games found in PGN".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_PGN: &str = r#"[Event "Test"]
[White "Alice"]
[Black "Bob"]
[Result "1-0"]

1. e4 e5 2. Nf3 Nc6 3. Bb5 1-0
"#;

    const ANNOTATED_PGN: &str = r#"[Event "Rated Blitz game"]
[White "Alice"]
[Black "Bob"]
[Result "0-1"]

1. e4 { [%eval 0.2] } 1... e5 { [%eval 0.19] } 2. Nf3 { [%clk 0:03:00] [%eval 0.17,20] }
2... Nc6 { [%eval 0.25] } (2... d6 { [%eval 0.5] } 3. d4) 3. Bc4 4. Nf6 0-1
"#;

    #[test]
    fn test_parse_pgn_string() {
        let games = parse_pgn_string(SAMPLE_PGN).unwrap();
        assert_eq!(games.len(), 1);

        let game = &games[0];
        assert_eq!(game.white.as_deref(), Some("Alice"));
        assert_eq!(game.black.as_deref(), Some("Bob"));
        assert_eq!(game.result.as_deref(), Some("1-0"));
        assert_eq!(game.move_count(), 5);
        assert!(!game.has_embedded_evaluations());
    }

    #[test]
    fn test_game_summary() {
        let games = parse_pgn_string(SAMPLE_PGN).unwrap();
        let summary = games[0].summary();
        assert_eq!(summary, "Alice vs Bob - 1-0");
    }

    #[test]
    fn test_unannotated_game_has_no_embedded_positions() {
        let game = parse_first_game(SAMPLE_PGN).unwrap();
        let embedded = game.embedded_evaluations();
        assert_eq!(embedded.len(), 6);
        assert!(embedded.iter().all(Option::is_none));
    }

    #[test]
    fn test_eval_annotations_align_with_positions() {
        let game = parse_first_game(ANNOTATED_PGN).unwrap();
        assert_eq!(game.moves, vec!["e4", "e5", "Nf3", "Nc6", "Bc4", "Nf6"]);

        let embedded = game.embedded_evaluations();
        assert_eq!(embedded.len(), 7);
        assert_eq!(embedded[0], Some(Evaluation::EVEN));
        assert_eq!(embedded[1], Some(Evaluation::Pawns(0.2)));
        assert_eq!(embedded[3], Some(Evaluation::Pawns(0.17)));
        // Variation comments are skipped
        assert_eq!(embedded[4], Some(Evaluation::Pawns(0.25)));
        assert_eq!(embedded[5], None);
        assert_eq!(embedded[6], None);
    }

    #[test]
    fn test_parse_eval_annotation_forms() {
        assert_eq!(parse_eval_annotation("[%eval -1.5]"), Some(Evaluation::Pawns(-1.5)));
        assert_eq!(parse_eval_annotation(" [%eval #-3] "), Some(Evaluation::Mate(-3)));
        assert_eq!(parse_eval_annotation("[%clk 0:01:00]"), None);
        assert_eq!(parse_eval_annotation("[%eval]"), None);
        assert_eq!(parse_eval_annotation("good move"), None);
    }

    #[test]
    fn test_illegal_moves_are_kept_as_text() {
        let games = parse_pgn_string("1. e4 e5 2. Ke3 *").unwrap();
        assert_eq!(games[0].moves, vec!["e4", "e5", "Ke3"]);
    }

    #[test]
    fn test_empty_input_is_error() {
        assert!(matches!(parse_pgn_string(""), Err(Error::Pgn(_))));
    }
}
