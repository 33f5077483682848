//! Prior-guided rollouts (short stochastic game continuation).
//!
//! A rollout stands in for a direct position evaluation during search: it
//! plays up to `depth` moves sampled from the predictor's masked priors,
//! stops early on a double pass, and evaluates the reached position. The
//! result is one scalar outcome per simulation, exactly what the search's
//! evaluation step requires.

use crate::board::{Board, Color, Move, Vertex};
use crate::predictor::{Predictor, checked_evaluate, masked_priors};

/// Play a stochastic continuation of at most `depth` moves from `board`
/// with `to_move` to play, then evaluate the reached position.
///
/// Returns a value in `[-1, 1]` from the perspective of `to_move` at the
/// start of the rollout.
pub fn rollout(
    board: &Board,
    to_move: Color,
    predictor: &dyn Predictor,
    depth: usize,
    rng: &mut fastrand::Rng,
) -> f32 {
    let mut board = board.clone();
    let mut color = to_move;

    for _ in 0..depth {
        if board.is_game_over() {
            break;
        }
        let vertex = sample_vertex(&board, color, predictor, rng);
        if board.apply(Move { color, vertex }).is_err() {
            // Masked priors only contain legal vertices; treat a rejected
            // sample as a pass so the rollout still terminates.
            board.pass_turn(color);
        }
        color = color.opponent();
    }

    let value = checked_evaluate(predictor, &board, color);
    if color == to_move { value } else { -value }
}

/// Sample one vertex from the masked prior distribution.
fn sample_vertex(
    board: &Board,
    color: Color,
    predictor: &dyn Predictor,
    rng: &mut fastrand::Rng,
) -> Vertex {
    let dist = masked_priors(board, color, predictor);
    let total: f32 = dist.iter().map(|(_, p)| p).sum();
    let mut r = rng.f32() * total;
    for &(vertex, p) in &dist {
        if r < p {
            return vertex;
        }
        r -= p;
    }
    dist.last().map(|&(v, _)| v).unwrap_or(Vertex::Pass)
}
