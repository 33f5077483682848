//! Predictor interface: the external capability the search engine consumes.
//!
//! A predictor supplies, for a board position and a color to move, a
//! probability distribution over vertices (board points plus pass) and a
//! scalar evaluation in `[-1, 1]` (higher is better for the given color).
//! The search treats both as opaque: a neural network, a fast-rollout
//! simulation, or a material heuristic all satisfy the same contract.
//!
//! Any predictor failure degrades gracefully: the consumers in this crate
//! substitute a uniform distribution over legal moves and a neutral
//! evaluation instead of propagating the error.

use std::collections::HashMap;

use log::warn;
use thiserror::Error;

use crate::board::{Board, Color, Vertex};
use crate::constants::{DIST_TOLERANCE, NEUTRAL_VALUE};

/// A fault reported by (or detected in the output of) a predictor.
#[derive(Debug, Error)]
pub enum PredictorError {
    #[error("predictor failure: {0}")]
    Failure(String),
    #[error("malformed distribution: {0}")]
    MalformedDistribution(String),
    #[error("evaluation out of range: {0}")]
    ValueOutOfRange(f32),
}

/// External move-probability and position-evaluation source.
pub trait Predictor {
    /// Probability distribution over board points and pass for `color` to
    /// move. Entries need not individually be legal; the caller masks
    /// illegal vertices and renormalizes.
    fn prior_moves(&self, board: &Board, color: Color)
    -> Result<Vec<(Vertex, f32)>, PredictorError>;

    /// Expected outcome for `color` from this position, in `[-1, 1]`.
    fn evaluate(&self, board: &Board, color: Color) -> Result<f32, PredictorError>;
}

/// Check that a prior distribution is non-negative and sums to 1 within
/// tolerance.
pub fn validate_distribution(dist: &[(Vertex, f32)]) -> Result<(), PredictorError> {
    let mut sum = 0.0f32;
    for &(vertex, p) in dist {
        if !p.is_finite() || p < 0.0 {
            return Err(PredictorError::MalformedDistribution(format!(
                "probability {p} at {vertex}"
            )));
        }
        sum += p;
    }
    if (sum - 1.0).abs() > DIST_TOLERANCE {
        return Err(PredictorError::MalformedDistribution(format!(
            "probabilities sum to {sum}"
        )));
    }
    Ok(())
}

/// Evaluate a position, falling back to the neutral value on any fault.
pub fn checked_evaluate(predictor: &dyn Predictor, board: &Board, color: Color) -> f32 {
    match predictor.evaluate(board, color) {
        Ok(v) if v.is_finite() && (-1.0..=1.0).contains(&v) => v,
        Ok(v) => {
            warn!("predictor fault: {}", PredictorError::ValueOutOfRange(v));
            NEUTRAL_VALUE
        }
        Err(e) => {
            warn!("predictor fault: {e}");
            NEUTRAL_VALUE
        }
    }
}

/// Priors for `color`, masked to the legal moves of `board` (pass included,
/// last) and renormalized. Falls back to a uniform distribution over legal
/// vertices on any predictor fault or when the predictor puts no mass on
/// legal moves. The result order is stable: row-major legal points, then
/// pass.
pub fn masked_priors(
    board: &Board,
    color: Color,
    predictor: &dyn Predictor,
) -> Vec<(Vertex, f32)> {
    let mut candidates: Vec<Vertex> = board
        .legal_moves(color)
        .into_iter()
        .map(|(x, y)| Vertex::Point(x, y))
        .collect();
    candidates.push(Vertex::Pass);

    let raw = match predictor.prior_moves(board, color) {
        Ok(dist) => match validate_distribution(&dist) {
            Ok(()) => Some(dist),
            Err(e) => {
                warn!("predictor fault: {e}");
                None
            }
        },
        Err(e) => {
            warn!("predictor fault: {e}");
            None
        }
    };

    let uniform = 1.0 / candidates.len() as f32;
    let Some(raw) = raw else {
        return candidates.into_iter().map(|v| (v, uniform)).collect();
    };

    let by_vertex: HashMap<Vertex, f32> = raw.into_iter().collect();
    let masked: Vec<(Vertex, f32)> = candidates
        .iter()
        .map(|&v| (v, by_vertex.get(&v).copied().unwrap_or(0.0)))
        .collect();
    let mass: f32 = masked.iter().map(|(_, p)| p).sum();
    if mass <= f32::EPSILON {
        return candidates.into_iter().map(|v| (v, uniform)).collect();
    }
    masked.into_iter().map(|(v, p)| (v, p / mass)).collect()
}

/// Uniform priors and a neutral evaluation. Deterministic; useful as a
/// baseline and in tests.
pub struct UniformPredictor;

impl Predictor for UniformPredictor {
    fn prior_moves(
        &self,
        board: &Board,
        _color: Color,
    ) -> Result<Vec<(Vertex, f32)>, PredictorError> {
        let size = board.size();
        let n = size * size + 1;
        let p = 1.0 / n as f32;
        let mut dist: Vec<(Vertex, f32)> = Vec::with_capacity(n);
        for x in 0..size {
            for y in 0..size {
                dist.push((Vertex::Point(x, y), p));
            }
        }
        dist.push((Vertex::Pass, p));
        Ok(dist)
    }

    fn evaluate(&self, _board: &Board, _color: Color) -> Result<f32, PredictorError> {
        Ok(NEUTRAL_VALUE)
    }
}

/// Uniform priors with a stone-difference evaluation: own stones minus
/// opponent stones, komi counted for White, scaled into `[-1, 1]`.
pub struct MaterialPredictor;

impl Predictor for MaterialPredictor {
    fn prior_moves(
        &self,
        board: &Board,
        color: Color,
    ) -> Result<Vec<(Vertex, f32)>, PredictorError> {
        UniformPredictor.prior_moves(board, color)
    }

    fn evaluate(&self, board: &Board, color: Color) -> Result<f32, PredictorError> {
        let black = board.stone_count(Color::Black) as f32;
        let white = board.stone_count(Color::White) as f32;
        let diff = match color {
            Color::Black => black - white - board.komi(),
            Color::White => white - black + board.komi(),
        };
        let area = (board.size() * board.size()) as f32;
        Ok((diff / area).clamp(-1.0, 1.0))
    }
}
