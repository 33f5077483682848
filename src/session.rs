//! Game sessions and the process-wide session registry.
//!
//! A session pairs one authoritative board with an operating mode chosen at
//! creation: policy-only move selection or full MCTS. The session owns its
//! board exclusively; the search only ever sees clones, and every generated
//! move is re-validated against the authoritative board before it counts as
//! applied.
//!
//! The registry maps session identifiers to live sessions. Entries are
//! created by an init command and removed by quit, never implicitly
//! collected; long-running deployments reap abandoned sessions explicitly.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use log::{debug, error};
use thiserror::Error;

use crate::board::{Board, Color, Move, MoveError, Vertex};
use crate::mcts::{SearchConfig, choose_move, policy_move};
use crate::predictor::{Predictor, checked_evaluate, masked_priors};

/// Operating mode, selected once per session at creation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Argmax of the predictor's priors over legal moves.
    Policy,
    /// Full predictor-guided tree search.
    Mcts,
}

/// Why a generated move could not be applied.
#[derive(Debug, Error)]
pub enum GenMoveError {
    /// The search recommended a move the authoritative board rejected.
    /// This indicates tree/board divergence and is fatal to the session.
    #[error("search returned {vertex} but the board rejected it: {source}")]
    Inconsistent { vertex: Vertex, source: MoveError },
}

/// A ranked move candidate with its prior probability.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Suggestion {
    pub vertex: Vertex,
    pub score: f32,
}

/// A position summary from the predictor's value signal.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Evaluation {
    /// Winning probability for the asking color, in `[0, 1]`.
    pub winrate: f32,
    pub black_stones: usize,
    pub white_stones: usize,
    /// Raw value signal in `[-1, 1]`.
    pub value: f32,
}

/// One live game: an authoritative board plus the machinery to move on it.
pub struct Session {
    board: Board,
    mode: Mode,
    predictor: Box<dyn Predictor>,
    config: SearchConfig,
    last_active: Instant,
}

impl Session {
    pub fn new(size: usize, komi: f32, mode: Mode, predictor: Box<dyn Predictor>, config: SearchConfig) -> Self {
        let mut board = Board::new(size);
        board.set_komi(komi);
        Self {
            board,
            mode,
            predictor,
            config,
            last_active: Instant::now(),
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Replace the board with a fresh empty one of the given size and komi.
    pub fn reset(&mut self, size: usize, komi: f32) {
        self.board = Board::new(size);
        self.board.set_komi(komi);
        self.touch();
    }

    pub fn set_komi(&mut self, komi: f32) {
        self.board.set_komi(komi);
        self.touch();
    }

    /// Apply a move from the controller.
    pub fn play(&mut self, mv: Move) -> Result<(), MoveError> {
        self.touch();
        self.board.apply(mv)?;
        Ok(())
    }

    /// Generate a move for `color`, apply it to the authoritative board, and
    /// return it. The chosen vertex is re-validated by the board itself; a
    /// rejection is surfaced as an internal-consistency failure, never
    /// silently retried with a different move.
    pub fn genmove(&mut self, color: Color) -> Result<Vertex, GenMoveError> {
        self.touch();
        let vertex = match self.mode {
            Mode::Policy => policy_move(&self.board, color, self.predictor.as_ref()),
            Mode::Mcts => choose_move(&self.board, color, self.predictor.as_ref(), &self.config),
        };
        debug!("genmove {color}: chose {vertex}");
        match self.board.apply(Move { color, vertex }) {
            Ok(_) => Ok(vertex),
            Err(source) => {
                error!("tree/board divergence: {vertex} rejected ({source})");
                Err(GenMoveError::Inconsistent { vertex, source })
            }
        }
    }

    /// The top `top_n` legal board moves for `color`, ranked by prior
    /// probability. Pass is never suggested; ties keep row-major order.
    pub fn suggestions(&mut self, color: Color, top_n: usize) -> Vec<Suggestion> {
        self.touch();
        let mut ranked: Vec<(Vertex, f32)> =
            masked_priors(&self.board, color, self.predictor.as_ref())
                .into_iter()
                .filter(|&(v, _)| v != Vertex::Pass)
                .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(top_n);
        ranked
            .into_iter()
            .map(|(vertex, score)| Suggestion { vertex, score })
            .collect()
    }

    /// Position summary for `color`: winrate mapped from the value signal
    /// plus stone counts. Predictor faults degrade to the neutral value, so
    /// the winrate falls back to one half.
    pub fn evaluation(&mut self, color: Color) -> Evaluation {
        self.touch();
        let value = checked_evaluate(self.predictor.as_ref(), &self.board, color);
        Evaluation {
            winrate: (value + 1.0) / 2.0,
            black_stones: self.board.stone_count(Color::Black),
            white_stones: self.board.stone_count(Color::White),
            value,
        }
    }

    /// The full grid as rows of glyphs, top row first.
    pub fn showboard(&self) -> String {
        self.board.to_string()
    }

    pub fn is_game_over(&self) -> bool {
        self.board.is_game_over()
    }

    pub fn idle_for(&self) -> Duration {
        self.last_active.elapsed()
    }

    /// Tear the session down, handing its predictor back for reuse.
    pub fn into_predictor(self) -> Box<dyn Predictor> {
        self.predictor
    }

    fn touch(&mut self) {
        self.last_active = Instant::now();
    }
}

/// Process-wide map of session identifiers to live sessions.
///
/// State is fully isolated across sessions: no board, search tree, or
/// predictor call context is shared between two entries.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session under `id`, replacing any previous holder.
    pub fn insert(&mut self, id: impl Into<String>, session: Session) {
        self.sessions.insert(id.into(), session);
    }

    pub fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Session> {
        self.sessions.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Remove a session, releasing all its resources.
    pub fn remove(&mut self, id: &str) -> Option<Session> {
        self.sessions.remove(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop sessions idle for longer than `max_idle`. Returns how many were
    /// reaped.
    pub fn reap_idle(&mut self, max_idle: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.idle_for() <= max_idle);
        before - self.sessions.len()
    }
}
