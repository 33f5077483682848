//! Line-based text protocol (GTP flavor) front end.
//!
//! One command per input line, exactly one reply block per command, strictly
//! synchronous: a command is fully processed, including any search, before
//! the next line is read. Replies follow the GTP grammar:
//!
//! - success: `= <payload>` followed by a blank line (payload may be empty
//!   or span several lines),
//! - failure: `? <message>` followed by a blank line.
//!
//! Coordinates use column letters `A`-`T` skipping `I` and row numbers
//! counted from the bottom; `pass` is the pass token.
//!
//! The engine walks `Idle -> Ready -> InGame -> Terminated`: the session is
//! created by the first `clear_board`, mutated by `play`/`genmove`, and
//! destroyed by `quit` (or by an internal-consistency failure, which is
//! fatal to the session but not to the process).

use std::io::{self, BufRead, Write};

use log::error;

use crate::board::{Color, Move, Vertex};
use crate::constants::{DEFAULT_KOMI, DEFAULT_SIZE, DEFAULT_SUGGESTIONS, SUPPORTED_SIZES};
use crate::mcts::SearchConfig;
use crate::predictor::Predictor;
use crate::session::{Mode, Session, SessionRegistry};

/// The list of known protocol commands.
const KNOWN_COMMANDS: &[&str] = &[
    "boardsize",
    "clear_board",
    "eval",
    "genmove",
    "known_command",
    "komi",
    "list_commands",
    "name",
    "play",
    "protocol_version",
    "quit",
    "showboard",
    "suggestions",
    "version",
];

/// Registry key for the single session a protocol loop drives.
const SESSION_ID: &str = "default";

/// Protocol machine states.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProtocolState {
    Idle,
    Ready,
    InGame,
    Terminated,
}

/// Engine-level options applied when a session is created or reset.
#[derive(Clone, Debug)]
pub struct EngineOptions {
    pub size: usize,
    pub komi: f32,
    pub mode: Mode,
    pub search: SearchConfig,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            size: DEFAULT_SIZE,
            komi: DEFAULT_KOMI,
            mode: Mode::Mcts,
            search: SearchConfig::default(),
        }
    }
}

/// Protocol engine: parses commands, drives the session, serializes replies.
pub struct GtpEngine {
    registry: SessionRegistry,
    state: ProtocolState,
    options: EngineOptions,
    /// Consumed when the session is created by the first `clear_board`.
    pending_predictor: Option<Box<dyn Predictor>>,
}

impl GtpEngine {
    pub fn new(options: EngineOptions, predictor: Box<dyn Predictor>) -> Self {
        Self {
            registry: SessionRegistry::new(),
            state: ProtocolState::Idle,
            options,
            pending_predictor: Some(predictor),
        }
    }

    pub fn state(&self) -> ProtocolState {
        self.state
    }

    /// Read commands from `reader` until `quit` or end of input, writing one
    /// reply block per command to `writer`.
    pub fn run<R: BufRead, W: Write>(&mut self, reader: R, writer: &mut W) -> anyhow::Result<()> {
        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (id, command_line) = parse_id(line);
            let parts: Vec<&str> = command_line.split_whitespace().collect();
            if parts.is_empty() {
                continue;
            }
            let command = parts[0].to_lowercase();

            let (ok, payload) = self.execute(&command, &parts[1..]);
            let prefix = if ok { '=' } else { '?' };
            let id_str = id.map(|i| i.to_string()).unwrap_or_default();
            if payload.is_empty() {
                write!(writer, "{prefix}{id_str}\n\n")?;
            } else {
                write!(writer, "{prefix}{id_str} {payload}\n\n")?;
            }
            writer.flush()?;

            if self.state == ProtocolState::Terminated {
                break;
            }
        }
        Ok(())
    }

    /// Run the protocol loop over stdin/stdout.
    pub fn run_stdio(&mut self) -> anyhow::Result<()> {
        let stdin = io::stdin();
        let mut stdout = io::stdout();
        self.run(stdin.lock(), &mut stdout)
    }

    /// Execute one command and return (success, reply payload).
    pub fn execute(&mut self, command: &str, args: &[&str]) -> (bool, String) {
        match command {
            "name" => (true, "tengen".to_string()),

            "version" => (true, env!("CARGO_PKG_VERSION").to_string()),

            "protocol_version" => (true, "2".to_string()),

            "list_commands" => (true, KNOWN_COMMANDS.join("\n")),

            "known_command" => {
                if args.is_empty() {
                    return (false, "missing argument".to_string());
                }
                let known = KNOWN_COMMANDS.contains(&args[0].to_lowercase().as_str());
                (true, if known { "true" } else { "false" }.to_string())
            }

            "boardsize" => {
                if args.is_empty() {
                    return (false, "missing argument".to_string());
                }
                match args[0].parse::<usize>() {
                    Ok(size) if SUPPORTED_SIZES.contains(&size) => {
                        self.options.size = size;
                        // A live session must follow the new size, or move
                        // parsing would desynchronize from the board.
                        if let Some(session) = self.registry.get_mut(SESSION_ID) {
                            session.reset(size, self.options.komi);
                            self.state = ProtocolState::Ready;
                        }
                        (true, String::new())
                    }
                    Ok(size) => (false, format!("unacceptable size: {size}")),
                    Err(_) => (false, "invalid size".to_string()),
                }
            }

            "komi" => {
                if args.is_empty() {
                    return (false, "missing argument".to_string());
                }
                match args[0].parse::<f32>() {
                    Ok(komi) => {
                        self.options.komi = komi;
                        if let Some(session) = self.registry.get_mut(SESSION_ID) {
                            session.set_komi(komi);
                        }
                        (true, String::new())
                    }
                    Err(_) => (false, "invalid komi".to_string()),
                }
            }

            "clear_board" => {
                if let Some(session) = self.registry.get_mut(SESSION_ID) {
                    session.reset(self.options.size, self.options.komi);
                } else {
                    let Some(predictor) = self.pending_predictor.take() else {
                        return (false, "session terminated".to_string());
                    };
                    let session = Session::new(
                        self.options.size,
                        self.options.komi,
                        self.options.mode,
                        predictor,
                        self.options.search.clone(),
                    );
                    self.registry.insert(SESSION_ID, session);
                }
                self.state = ProtocolState::Ready;
                (true, String::new())
            }

            "play" => {
                if args.len() < 2 {
                    return (false, "missing arguments".to_string());
                }
                let Some(color) = parse_color(args[0]) else {
                    return (false, format!("invalid color: {}", args[0]));
                };
                let size = self.board_size();
                let Some(vertex) = parse_vertex(args[1], size) else {
                    return (false, format!("invalid vertex: {}", args[1]));
                };
                let Some(session) = self.active_session() else {
                    return (false, "no active session".to_string());
                };
                match session.play(Move { color, vertex }) {
                    Ok(()) => {
                        self.state = ProtocolState::InGame;
                        (true, String::new())
                    }
                    Err(e) => (false, e.to_string()),
                }
            }

            "genmove" => {
                if args.is_empty() {
                    return (false, "missing argument".to_string());
                }
                let Some(color) = parse_color(args[0]) else {
                    return (false, format!("invalid color: {}", args[0]));
                };
                let size = self.board_size();
                let Some(session) = self.active_session() else {
                    return (false, "no active session".to_string());
                };
                match session.genmove(color) {
                    Ok(vertex) => {
                        self.state = ProtocolState::InGame;
                        (true, format_vertex(vertex, size))
                    }
                    Err(e) => {
                        // Tree/board divergence is a bug, fatal to the
                        // session; it must not masquerade as a rule
                        // violation. The predictor survives so a later
                        // clear_board can start over.
                        error!("session destroyed: {e}");
                        if let Some(dead) = self.registry.remove(SESSION_ID) {
                            self.pending_predictor = Some(dead.into_predictor());
                        }
                        self.state = ProtocolState::Idle;
                        (false, format!("internal error: {e}"))
                    }
                }
            }

            "showboard" => {
                let Some(session) = self.active_session() else {
                    return (false, "no active session".to_string());
                };
                let board = session.showboard();
                (true, board)
            }

            "suggestions" => {
                if args.is_empty() {
                    return (false, "missing argument".to_string());
                }
                let Some(color) = parse_color(args[0]) else {
                    return (false, format!("invalid color: {}", args[0]));
                };
                let top_n = match args.get(1) {
                    Some(s) => match s.parse::<usize>() {
                        Ok(n) => n,
                        Err(_) => return (false, format!("invalid count: {s}")),
                    },
                    None => DEFAULT_SUGGESTIONS,
                };
                let size = self.board_size();
                let Some(session) = self.active_session() else {
                    return (false, "no active session".to_string());
                };
                let ranked = session.suggestions(color, top_n);
                let payload = ranked
                    .iter()
                    .map(|s| format!("{} {:.3}", format_vertex(s.vertex, size), s.score))
                    .collect::<Vec<_>>()
                    .join("\n");
                (true, payload)
            }

            "eval" => {
                if args.is_empty() {
                    return (false, "missing argument".to_string());
                }
                let Some(color) = parse_color(args[0]) else {
                    return (false, format!("invalid color: {}", args[0]));
                };
                let Some(session) = self.active_session() else {
                    return (false, "no active session".to_string());
                };
                let summary = session.evaluation(color);
                (
                    true,
                    format!(
                        "winrate {:.3} black {} white {} value {:.3}",
                        summary.winrate,
                        summary.black_stones,
                        summary.white_stones,
                        summary.value
                    ),
                )
            }

            "quit" => {
                self.registry.remove(SESSION_ID);
                self.state = ProtocolState::Terminated;
                (true, String::new())
            }

            _ => (false, format!("unknown command: {command}")),
        }
    }

    fn active_session(&mut self) -> Option<&mut Session> {
        match self.state {
            ProtocolState::Ready | ProtocolState::InGame => self.registry.get_mut(SESSION_ID),
            _ => None,
        }
    }

    /// Size used for vertex parsing and formatting: the live board's when a
    /// session exists, the configured default otherwise.
    fn board_size(&self) -> usize {
        self.registry
            .get(SESSION_ID)
            .map(|s| s.board().size())
            .unwrap_or(self.options.size)
    }
}

/// Parse an optional numeric command id from the beginning of the line.
fn parse_id(line: &str) -> (Option<u32>, &str) {
    let trimmed = line.trim();
    let end = trimmed
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());
    if end > 0 {
        if let Ok(id) = trimmed[..end].parse::<u32>() {
            return (Some(id), trimmed[end..].trim());
        }
    }
    (None, trimmed)
}

/// Parse a vertex like `D4` or `pass`. Column letters skip `I`; rows are
/// numbered from the bottom, so internal `x = size - row`.
pub fn parse_vertex(s: &str, size: usize) -> Option<Vertex> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("pass") {
        return Some(Vertex::Pass);
    }
    let mut chars = s.chars();
    let col_char = chars.next()?.to_ascii_uppercase();
    if !col_char.is_ascii_uppercase() || col_char == 'I' {
        return None;
    }
    let mut y = (col_char as u8 - b'A') as usize;
    if col_char > 'I' {
        y -= 1;
    }
    if y >= size {
        return None;
    }
    let row: usize = chars.as_str().parse().ok()?;
    if row == 0 || row > size {
        return None;
    }
    Some(Vertex::Point(size - row, y))
}

/// Format a vertex in protocol notation.
pub fn format_vertex(vertex: Vertex, size: usize) -> String {
    match vertex {
        Vertex::Pass => "pass".to_string(),
        Vertex::Point(x, y) => {
            let mut letter = b'A' + y as u8;
            if letter >= b'I' {
                letter += 1;
            }
            format!("{}{}", letter as char, size - x)
        }
    }
}

fn parse_color(s: &str) -> Option<Color> {
    match s.to_lowercase().as_str() {
        "b" | "black" => Some(Color::Black),
        "w" | "white" => Some(Color::White),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::UniformPredictor;

    fn engine() -> GtpEngine {
        let options = EngineOptions {
            size: 9,
            mode: Mode::Policy,
            ..EngineOptions::default()
        };
        GtpEngine::new(options, Box::new(UniformPredictor))
    }

    #[test]
    fn parse_id_with_and_without_id() {
        assert_eq!(parse_id("123 name"), (Some(123), "name"));
        assert_eq!(parse_id("name"), (None, "name"));
    }

    #[test]
    fn vertex_parsing_skips_i_column() {
        assert_eq!(parse_vertex("A1", 19), Some(Vertex::Point(18, 0)));
        assert_eq!(parse_vertex("D4", 19), Some(Vertex::Point(15, 3)));
        assert_eq!(parse_vertex("H19", 19), Some(Vertex::Point(0, 7)));
        // J is the 9th column because I is skipped.
        assert_eq!(parse_vertex("J1", 19), Some(Vertex::Point(18, 8)));
        assert_eq!(parse_vertex("T19", 19), Some(Vertex::Point(0, 18)));
        // Q is the 15th column index once I drops out of A..T.
        assert_eq!(parse_vertex("Q16", 19), Some(Vertex::Point(3, 15)));
        assert_eq!(parse_vertex("pass", 19), Some(Vertex::Pass));
        assert_eq!(parse_vertex("I5", 19), None);
        assert_eq!(parse_vertex("U1", 19), None);
        assert_eq!(parse_vertex("A0", 19), None);
        assert_eq!(parse_vertex("A20", 19), None);
        assert_eq!(parse_vertex("4D", 19), None);
    }

    #[test]
    fn vertex_formatting_round_trips() {
        for &s in &["A1", "D4", "J1", "Q16", "T19", "pass"] {
            let v = parse_vertex(s, 19).unwrap();
            assert_eq!(format_vertex(v, 19), s);
        }
    }

    #[test]
    fn state_machine_walks_idle_ready_ingame() {
        let mut e = engine();
        assert_eq!(e.state(), ProtocolState::Idle);
        let (ok, _) = e.execute("clear_board", &[]);
        assert!(ok);
        assert_eq!(e.state(), ProtocolState::Ready);
        let (ok, _) = e.execute("play", &["black", "E5"]);
        assert!(ok);
        assert_eq!(e.state(), ProtocolState::InGame);
        let (ok, _) = e.execute("quit", &[]);
        assert!(ok);
        assert_eq!(e.state(), ProtocolState::Terminated);
    }

    #[test]
    fn board_commands_require_a_session() {
        let mut e = engine();
        for (cmd, args) in [
            ("play", vec!["black", "E5"]),
            ("genmove", vec!["white"]),
            ("showboard", vec![]),
            ("suggestions", vec!["black"]),
            ("eval", vec!["white"]),
        ] {
            let (ok, msg) = e.execute(cmd, &args);
            assert!(!ok, "{cmd} must fail in Idle");
            assert!(msg.contains("no active session"));
        }
        assert_eq!(e.state(), ProtocolState::Idle);
    }

    #[test]
    fn illegal_play_reports_error_without_state_change() {
        let mut e = engine();
        e.execute("clear_board", &[]);
        let (ok, _) = e.execute("play", &["black", "E5"]);
        assert!(ok);
        let (ok, msg) = e.execute("play", &["white", "E5"]);
        assert!(!ok);
        assert!(msg.contains("not empty"));
        assert_eq!(e.state(), ProtocolState::InGame);
    }

    #[test]
    fn bad_syntax_is_a_protocol_error() {
        let mut e = engine();
        e.execute("clear_board", &[]);
        let (ok, msg) = e.execute("play", &["black", "Z99"]);
        assert!(!ok);
        assert!(msg.contains("invalid vertex"));
        let (ok, msg) = e.execute("play", &["green", "E5"]);
        assert!(!ok);
        assert!(msg.contains("invalid color"));
        let (ok, msg) = e.execute("frobnicate", &[]);
        assert!(!ok);
        assert!(msg.contains("unknown command"));
    }

    #[test]
    fn genmove_replies_with_a_vertex_and_applies_it() {
        let mut e = engine();
        e.execute("clear_board", &[]);
        let (ok, reply) = e.execute("genmove", &["black"]);
        assert!(ok);
        let vertex = parse_vertex(&reply, 9).expect("reply must be a vertex or pass");
        if let Vertex::Point(_, _) = vertex {
            let (_, board) = e.execute("showboard", &[]);
            assert_eq!(board.matches('X').count(), 1);
        }
    }

    #[test]
    fn boardsize_and_komi() {
        let mut e = engine();
        let (ok, _) = e.execute("boardsize", &["13"]);
        assert!(ok);
        let (ok, msg) = e.execute("boardsize", &["10"]);
        assert!(!ok);
        assert!(msg.contains("unacceptable"));
        let (ok, _) = e.execute("komi", &["6.5"]);
        assert!(ok);
        e.execute("clear_board", &[]);
        let (_, board) = e.execute("showboard", &[]);
        assert_eq!(board.lines().count(), 13);
    }

    #[test]
    fn boardsize_resets_the_live_session() {
        let mut e = engine();
        e.execute("clear_board", &[]);
        e.execute("play", &["black", "E5"]);
        let (ok, _) = e.execute("boardsize", &["13"]);
        assert!(ok);
        assert_eq!(e.state(), ProtocolState::Ready);
        // Vertices now parse and format against the 13x13 board.
        let (ok, _) = e.execute("play", &["black", "A1"]);
        assert!(ok);
        let (_, board) = e.execute("showboard", &[]);
        let rows: Vec<&str> = board.lines().collect();
        assert_eq!(rows.len(), 13);
        assert_eq!(rows[12].chars().next(), Some('X'));
        assert_eq!(board.matches('X').count(), 1);
        let (ok, reply) = e.execute("genmove", &["white"]);
        assert!(ok);
        assert!(parse_vertex(&reply, 13).is_some());
    }

    #[test]
    fn suggestions_reply_ranked_legal_vertices() {
        let mut e = engine();
        e.execute("clear_board", &[]);
        e.execute("play", &["black", "E5"]);
        let (ok, reply) = e.execute("suggestions", &["white", "3"]);
        assert!(ok);
        let lines: Vec<&str> = reply.lines().collect();
        assert_eq!(lines.len(), 3);
        for line in &lines {
            let mut parts = line.split_whitespace();
            let vertex = parse_vertex(parts.next().unwrap(), 9).unwrap();
            assert_ne!(vertex, Vertex::Pass);
            assert_ne!(vertex, Vertex::Point(4, 4), "occupied point suggested");
            let score: f32 = parts.next().unwrap().parse().unwrap();
            assert!(score > 0.0);
        }
    }

    #[test]
    fn eval_reports_winrate_and_stones() {
        let mut e = engine();
        e.execute("clear_board", &[]);
        e.execute("play", &["black", "E5"]);
        let (ok, reply) = e.execute("eval", &["black"]);
        assert!(ok);
        let fields: Vec<&str> = reply.split_whitespace().collect();
        assert_eq!(fields[0], "winrate");
        let winrate: f32 = fields[1].parse().unwrap();
        assert!((0.0..=1.0).contains(&winrate));
        assert_eq!(&fields[2..6], ["black", "1", "white", "0"]);
    }

    #[test]
    fn known_command_and_listing() {
        let mut e = engine();
        let (ok, reply) = e.execute("known_command", &["genmove"]);
        assert!(ok);
        assert_eq!(reply, "true");
        let (ok, reply) = e.execute("known_command", &["frobnicate"]);
        assert!(ok);
        assert_eq!(reply, "false");
        let (_, listing) = e.execute("list_commands", &[]);
        for cmd in KNOWN_COMMANDS {
            assert!(listing.lines().any(|l| l == *cmd));
        }
    }
}
