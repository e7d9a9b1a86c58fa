//! Parser module for reading chess game formats
//!
//! Currently supports PGN, including `[%eval]` comment annotations.

pub mod pgn;

pub use pgn::{parse_first_game, parse_pgn_file, parse_pgn_string, PgnGame};
