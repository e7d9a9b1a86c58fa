//! UCI wire format: outbound commands and inbound message classification

use std::fmt;

use super::analysis::{AnalysisPreferences, MoveToken, Score, SearchMode};
use super::capabilities::EngineOption;

/// Search bound sent with `go`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchLimit {
    MoveTime(u64),
    Depth(u32),
}

impl From<&AnalysisPreferences> for SearchLimit {
    fn from(prefs: &AnalysisPreferences) -> Self {
        match prefs.mode {
            SearchMode::MoveTime => SearchLimit::MoveTime(prefs.movetime_ms),
            SearchMode::Depth => SearchLimit::Depth(prefs.depth),
        }
    }
}

/// Commands sent to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Uci,
    SetOption { name: String, value: String },
    IsReady,
    Stop,
    Position(Vec<MoveToken>),
    Go(SearchLimit),
    Quit,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Uci => f.write_str("uci"),
            Command::SetOption { name, value } => {
                write!(f, "setoption name {} value {}", name, value)
            }
            Command::IsReady => f.write_str("isready"),
            Command::Stop => f.write_str("stop"),
            Command::Position(moves) if moves.is_empty() => f.write_str("position startpos"),
            Command::Position(moves) => {
                f.write_str("position startpos moves")?;
                for mv in moves {
                    write!(f, " {}", mv)?;
                }
                Ok(())
            }
            Command::Go(SearchLimit::MoveTime(ms)) => write!(f, "go movetime {}", ms),
            Command::Go(SearchLimit::Depth(depth)) => write!(f, "go depth {}", depth),
            Command::Quit => f.write_str("quit"),
        }
    }
}

/// Fields of interest on an `info` progress line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfoLine {
    pub multipv: Option<u32>,
    pub depth: Option<u32>,
    pub score: Option<Score>,
    pub pv: Option<Vec<String>>,
}

/// Classified engine output line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineMessage {
    IdName(String),
    UciOk,
    ReadyOk,
    Option { name: String, option: EngineOption },
    Info(InfoLine),
    /// Terminal line of a search; `best` is `None` for `bestmove (none)`
    BestMove { best: Option<String>, ponder: Option<String> },
    Other,
}

impl EngineMessage {
    pub fn parse(line: &str) -> EngineMessage {
        let line = line.trim();
        let mut parts = line.split_whitespace();

        match parts.next() {
            Some("uciok") => EngineMessage::UciOk,
            Some("readyok") => EngineMessage::ReadyOk,
            Some("id") => match parts.next() {
                Some("name") => EngineMessage::IdName(parts.collect::<Vec<_>>().join(" ")),
                _ => EngineMessage::Other,
            },
            Some("option") => parse_option(line).unwrap_or(EngineMessage::Other),
            Some("info") => {
                let rest: Vec<&str> = parts.collect();
                if rest.first() == Some(&"string") {
                    EngineMessage::Other
                } else {
                    EngineMessage::Info(parse_info(&rest))
                }
            }
            Some("bestmove") => {
                // Parse: "bestmove e2e4 ponder e7e5"
                let best = parts.next().filter(|m| *m != "(none)").map(String::from);
                let ponder = match parts.next() {
                    Some("ponder") => parts.next().map(String::from),
                    _ => None,
                };
                EngineMessage::BestMove { best, ponder }
            }
            _ => EngineMessage::Other,
        }
    }
}

fn parse_info(parts: &[&str]) -> InfoLine {
    let mut info = InfoLine::default();
    let mut i = 0;

    while i < parts.len() {
        match parts[i] {
            "depth" => {
                info.depth = parts.get(i + 1).and_then(|d| d.parse().ok());
                i += 2;
            }
            "multipv" => {
                info.multipv = parts.get(i + 1).and_then(|m| m.parse().ok());
                i += 2;
            }
            "score" => {
                let value = parts.get(i + 2).and_then(|v| v.parse::<i32>().ok());
                info.score = match (parts.get(i + 1), value) {
                    (Some(&"cp"), Some(cp)) => Some(Score::Centipawns(cp)),
                    (Some(&"mate"), Some(m)) => Some(Score::Mate(m)),
                    _ => info.score,
                };
                i += 3;
            }
            "pv" => {
                // Everything after "pv" is the principal variation
                let pv: Vec<String> = parts[i + 1..].iter().map(|s| s.to_string()).collect();
                if !pv.is_empty() {
                    info.pv = Some(pv);
                }
                break;
            }
            _ => {
                i += 1;
            }
        }
    }

    info
}

const OPTION_KEYWORDS: [&str; 5] = ["type", "default", "min", "max", "var"];

// option name <N> type <T> [default D] [min m] [max M] [var V]*
fn parse_option(line: &str) -> Option<EngineMessage> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let name_start = parts.iter().position(|p| *p == "name")? + 1;
    let type_at = parts.iter().position(|p| *p == "type")?;
    if type_at <= name_start {
        return None;
    }

    let name = parts[name_start..type_at].join(" ");
    let kind = parts.get(type_at + 1)?.to_string();
    let mut option = EngineOption {
        kind,
        default: None,
        min: None,
        max: None,
    };

    let mut i = type_at + 2;
    while i < parts.len() {
        let keyword = parts[i];
        let end = parts[i + 1..]
            .iter()
            .position(|p| OPTION_KEYWORDS.contains(p))
            .map(|offset| i + 1 + offset)
            .unwrap_or(parts.len());
        let value = parts[i + 1..end].join(" ");

        match keyword {
            "default" if !value.is_empty() && value != "<empty>" => option.default = Some(value),
            "min" => option.min = value.parse().ok(),
            "max" => option.max = value.parse().ok(),
            _ => {}
        }
        i = end;
    }

    Some(EngineMessage::Option { name, option })
}
