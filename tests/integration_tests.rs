//! End-to-end tests: protocol transcripts over the full engine, plus the
//! cross-module game scenarios that don't belong to any single unit.

use std::io::Cursor;

use tengen::board::{Board, Color, Move, MoveError, Vertex};
use tengen::gtp::{EngineOptions, GtpEngine, ProtocolState, format_vertex, parse_vertex};
use tengen::mcts::SearchConfig;
use tengen::predictor::{MaterialPredictor, Predictor, PredictorError, UniformPredictor};
use tengen::session::{Mode, Session, SessionRegistry};

fn engine(size: usize, mode: Mode) -> GtpEngine {
    let options = EngineOptions {
        size,
        mode,
        search: SearchConfig {
            playouts: 50,
            ..SearchConfig::default()
        },
        ..EngineOptions::default()
    };
    GtpEngine::new(options, Box::new(UniformPredictor))
}

/// Feed a script through the protocol loop and return the raw reply stream.
fn transcript(engine: &mut GtpEngine, input: &str) -> String {
    let mut output = Vec::new();
    engine
        .run(Cursor::new(input.to_string()), &mut output)
        .expect("protocol loop failed");
    String::from_utf8(output).expect("replies must be utf-8")
}

// =============================================================================
// Protocol framing
// =============================================================================

#[test]
fn each_command_yields_one_reply_block() {
    let mut e = engine(9, Mode::Policy);
    let out = transcript(&mut e, "clear_board\nplay black E5\nquit\n");
    assert_eq!(out, "=\n\n=\n\n=\n\n");
    assert_eq!(e.state(), ProtocolState::Terminated);
}

#[test]
fn command_ids_are_echoed() {
    let mut e = engine(9, Mode::Policy);
    let out = transcript(&mut e, "7 clear_board\n8 play black Z99\n");
    assert_eq!(out, "=7\n\n?8 invalid vertex: Z99\n\n");
}

#[test]
fn comments_and_blank_lines_are_skipped() {
    let mut e = engine(9, Mode::Policy);
    let out = transcript(&mut e, "# warm-up\n\nclear_board\n");
    assert_eq!(out, "=\n\n");
}

#[test]
fn unknown_commands_do_not_change_state() {
    let mut e = engine(9, Mode::Policy);
    let out = transcript(&mut e, "clear_board\nfrobnicate\nplay black E5\n");
    assert_eq!(out, "=\n\n? unknown command: frobnicate\n\n=\n\n");
    assert_eq!(e.state(), ProtocolState::InGame);
}

#[test]
fn input_ends_without_quit() {
    let mut e = engine(9, Mode::Policy);
    let out = transcript(&mut e, "clear_board\n");
    assert_eq!(out, "=\n\n");
    assert_eq!(e.state(), ProtocolState::Ready);
}

// =============================================================================
// Board scenarios through the protocol
// =============================================================================

#[test]
fn showboard_after_d4_and_q16() {
    let mut e = engine(19, Mode::Policy);
    let out = transcript(
        &mut e,
        "clear_board\nplay black D4\nplay white Q16\nshowboard\n",
    );
    let board_block = out
        .rsplit("= ")
        .next()
        .expect("showboard reply present")
        .trim_end();
    let rows: Vec<&str> = board_block.lines().collect();
    assert_eq!(rows.len(), 19);
    assert!(rows.iter().all(|r| r.len() == 19));

    // D4: column D (index 3), row 4 from the bottom -> grid row 15.
    // Q16: column Q (index 15 with I skipped), row 16 -> grid row 3.
    let stones: Vec<(usize, usize, char)> = rows
        .iter()
        .enumerate()
        .flat_map(|(x, row)| {
            row.chars()
                .enumerate()
                .filter(|&(_, c)| c != '.')
                .map(move |(y, c)| (x, y, c))
        })
        .collect();
    assert_eq!(stones, vec![(3, 15, 'O'), (15, 3, 'X')]);
}

#[test]
fn surrounded_stone_is_captured_through_the_protocol() {
    let mut e = engine(9, Mode::Policy);
    // White E5 surrounded by black D5, F5, E4, E6.
    let out = transcript(
        &mut e,
        "clear_board\nplay white E5\nplay black D5\nplay black F5\nplay black E4\nplay black E6\nshowboard\n",
    );
    let board_block = out.rsplit("= ").next().unwrap().trim_end();
    assert_eq!(board_block.matches('O').count(), 0);
    assert_eq!(board_block.matches('X').count(), 4);
}

#[test]
fn boardsize_change_rebinds_coordinates_to_the_new_board() {
    let mut e = engine(19, Mode::Policy);
    // Shrinking the board mid-session must reset it; A1 then lands on the
    // bottom-left of the 9x9 grid, not somewhere inside a stale 19x19 one.
    let out = transcript(&mut e, "clear_board\nboardsize 9\nplay black A1\nshowboard\n");
    assert!(!out.contains('?'), "replies must all succeed: {out}");
    let board_block = out.rsplit("= ").next().unwrap().trim_end();
    let rows: Vec<&str> = board_block.lines().collect();
    assert_eq!(rows.len(), 9);
    assert_eq!(rows[8].chars().next(), Some('X'));
    assert_eq!(board_block.matches('X').count(), 1);
}

#[test]
fn illegal_moves_leave_the_board_unchanged() {
    let mut e = engine(9, Mode::Policy);
    let before = transcript(&mut e, "clear_board\nplay black E5\nshowboard\n");
    let after = transcript(&mut e, "play white E5\nshowboard\n");
    let board_of = |s: &str| s.rsplit("= ").next().unwrap().trim_end().to_string();
    assert!(after.starts_with("? "));
    assert_eq!(board_of(&before), board_of(&after));
}

#[test]
fn double_pass_is_accepted_and_leaves_the_board_unchanged() {
    let mut e = engine(9, Mode::Policy);
    let out = transcript(
        &mut e,
        "clear_board\nplay black C3\nplay black pass\nplay white pass\nshowboard\n",
    );
    assert!(!out.contains('?'), "passes must be accepted: {out}");
    let board_block = out.rsplit("= ").next().unwrap().trim_end();
    assert_eq!(board_block.matches('X').count(), 1);
}

// =============================================================================
// genmove behavior
// =============================================================================

#[test]
fn genmove_reply_is_a_parsable_vertex_applied_to_the_board() {
    let mut e = engine(9, Mode::Mcts);
    let out = transcript(&mut e, "clear_board\ngenmove black\nshowboard\n");
    let mut blocks = out.split("\n\n").filter(|b| !b.is_empty());
    blocks.next().expect("clear_board reply");
    let reply = blocks
        .next()
        .expect("genmove reply")
        .trim_start_matches("= ")
        .to_string();
    let vertex = parse_vertex(&reply, 9).expect("genmove reply must parse");
    let board_block = out.rsplit("= ").next().unwrap().trim_end();
    match vertex {
        Vertex::Point(x, y) => {
            let row: Vec<char> = board_block.lines().nth(x).unwrap().chars().collect();
            assert_eq!(row[y], 'X');
        }
        Vertex::Pass => assert_eq!(board_block.matches('X').count(), 0),
    }
}

#[test]
fn genmove_is_deterministic_for_a_fixed_predictor_and_budget() {
    let reply = |_: usize| {
        let mut e = engine(9, Mode::Mcts);
        transcript(&mut e, "clear_board\ngenmove black\n")
    };
    assert_eq!(reply(0), reply(1));
}

#[test]
fn policy_mode_and_zero_budget_mcts_agree() {
    let run = |mode: Mode, playouts: usize| {
        let options = EngineOptions {
            size: 9,
            mode,
            search: SearchConfig {
                playouts,
                ..SearchConfig::default()
            },
            ..EngineOptions::default()
        };
        let mut e = GtpEngine::new(options, Box::new(MaterialPredictor));
        transcript(&mut e, "clear_board\ngenmove black\n")
    };
    assert_eq!(run(Mode::Policy, 50), run(Mode::Mcts, 0));
}

/// Predictor that always fails; the engine must degrade, not crash.
struct FailingPredictor;

impl Predictor for FailingPredictor {
    fn prior_moves(
        &self,
        _board: &Board,
        _color: Color,
    ) -> Result<Vec<(Vertex, f32)>, PredictorError> {
        Err(PredictorError::Failure("backend offline".into()))
    }

    fn evaluate(&self, _board: &Board, _color: Color) -> Result<f32, PredictorError> {
        Err(PredictorError::Failure("backend offline".into()))
    }
}

#[test]
fn predictor_faults_never_kill_the_session() {
    let options = EngineOptions {
        size: 9,
        mode: Mode::Mcts,
        search: SearchConfig {
            playouts: 20,
            ..SearchConfig::default()
        },
        ..EngineOptions::default()
    };
    let mut e = GtpEngine::new(options, Box::new(FailingPredictor));
    let out = transcript(&mut e, "clear_board\ngenmove black\nshowboard\n");
    assert!(!out.contains('?'), "fault must degrade gracefully: {out}");
    assert_eq!(e.state(), ProtocolState::InGame);
}

#[test]
fn suggestions_and_eval_round_out_the_protocol() {
    let mut e = engine(9, Mode::Policy);
    let out = transcript(&mut e, "clear_board\nplay black E5\nsuggestions white 2\neval white\n");
    let replies: Vec<&str> = out.split("\n\n").filter(|b| !b.is_empty()).collect();
    assert_eq!(replies.len(), 4);
    let suggested = replies[2].trim_start_matches("= ");
    assert_eq!(suggested.lines().count(), 2);
    for line in suggested.lines() {
        let vertex = line.split_whitespace().next().unwrap();
        assert!(parse_vertex(vertex, 9).is_some(), "bad vertex: {line}");
        assert_ne!(vertex, "E5", "occupied point suggested");
    }
    assert!(replies[3].starts_with("= winrate "), "{}", replies[3]);
}

// =============================================================================
// Sessions
// =============================================================================

#[test]
fn sessions_are_isolated_from_each_other() {
    let mut registry = SessionRegistry::new();
    let make = || {
        Session::new(
            9,
            7.5,
            Mode::Policy,
            Box::new(UniformPredictor),
            SearchConfig::default(),
        )
    };
    registry.insert("a", make());
    registry.insert("b", make());

    registry
        .get_mut("a")
        .unwrap()
        .play(Move {
            color: Color::Black,
            vertex: Vertex::Point(4, 4),
        })
        .unwrap();
    assert_eq!(registry.get_mut("a").unwrap().board().move_number(), 1);
    assert_eq!(registry.get_mut("b").unwrap().board().move_number(), 0);

    registry.remove("a");
    assert_eq!(registry.len(), 1);
}

#[test]
fn session_tracks_the_double_pass_terminal_condition() {
    let mut s = Session::new(
        9,
        7.5,
        Mode::Policy,
        Box::new(UniformPredictor),
        SearchConfig::default(),
    );
    for color in [Color::Black, Color::White] {
        s.play(Move {
            color,
            vertex: Vertex::Pass,
        })
        .unwrap();
    }
    assert!(s.is_game_over());
}

#[test]
fn search_recommendations_survive_board_revalidation() {
    // The session re-validates every generated move against the
    // authoritative board; across a stretch of alternating genmoves no
    // inconsistency may surface and stone accounting must hold.
    let mut s = Session::new(
        5,
        0.0,
        Mode::Mcts,
        Box::new(MaterialPredictor),
        SearchConfig {
            playouts: 40,
            ..SearchConfig::default()
        },
    );
    let stones = |s: &Session| {
        s.board().stone_count(Color::Black) + s.board().stone_count(Color::White)
    };
    let captures = |s: &Session| {
        s.board().captures_by(Color::Black) + s.board().captures_by(Color::White)
    };
    let mut color = Color::Black;
    for _ in 0..10 {
        if s.is_game_over() {
            break;
        }
        let (stones_before, caps_before) = (stones(&s), captures(&s));
        let vertex = s.genmove(color).expect("no tree/board divergence");
        if vertex != Vertex::Pass {
            let captured = captures(&s) - caps_before;
            assert_eq!(
                stones(&s),
                stones_before + 1 - captured,
                "stone accounting broken after {}",
                format_vertex(vertex, 5)
            );
        }
        color = color.opponent();
    }
}

// =============================================================================
// Rule details worth pinning end-to-end
// =============================================================================

#[test]
fn ko_cycle_through_the_protocol() {
    let mut e = engine(9, Mode::Policy);
    // Build the ko shape, capture, verify the retake is refused, then
    // retake legally after an intervening move.
    let out = transcript(
        &mut e,
        concat!(
            "clear_board\n",
            "play black B9\n",
            "play black A8\n",
            "play black B7\n",
            "play black C8\n",
            "play white C9\n",
            "play white C7\n",
            "play white D8\n",
            "play white B8\n", // captures C8
            "play black C8\n", // ko retake, must fail
            "play black G5\n",
            "play white G6\n",
            "play black C8\n", // legal again
        ),
    );
    let replies: Vec<&str> = out.split("\n\n").filter(|b| !b.is_empty()).collect();
    assert_eq!(replies.len(), 13);
    assert!(replies[9].starts_with("? "), "ko retake: {}", replies[9]);
    assert!(replies[9].contains("ko"));
    assert!(replies[12].starts_with('='), "delayed retake: {}", replies[12]);
}

#[test]
fn suicide_is_refused_with_the_same_board_error_as_the_library() {
    let mut board = Board::new(9);
    board.place(Color::Black, 0, 1).unwrap();
    board.place(Color::Black, 1, 0).unwrap();
    assert_eq!(board.place(Color::White, 0, 0), Err(MoveError::Suicide));

    let mut e = engine(9, Mode::Policy);
    let out = transcript(
        &mut e,
        "clear_board\nplay black A8\nplay black B9\nplay white A9\n",
    );
    let last = out.split("\n\n").filter(|b| !b.is_empty()).last().unwrap();
    assert!(last.starts_with("? "));
    assert!(last.contains("suicide"));
}
