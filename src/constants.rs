//! Engine-wide constants: board defaults and search parameters.

/// Default board size (NxN). Standard Go sizes are 9, 13, or 19.
pub const DEFAULT_SIZE: usize = 19;

/// Board sizes the protocol accepts.
pub const SUPPORTED_SIZES: [usize; 3] = [9, 13, 19];

/// Default komi (compensation points for White).
pub const DEFAULT_KOMI: f32 = 7.5;

/// Default number of simulations per `genmove` in MCTS mode.
pub const DEFAULT_PLAYOUTS: usize = 400;

/// PUCT exploration constant.
pub const C_PUCT: f64 = 1.5;

/// Default seed for the rollout policy RNG.
pub const DEFAULT_SEED: u64 = 1;

/// Default number of ranked moves returned by `suggestions`.
pub const DEFAULT_SUGGESTIONS: usize = 5;

/// Tolerance when checking that a predictor distribution sums to 1.
pub const DIST_TOLERANCE: f32 = 1e-3;

/// Neutral evaluation substituted when a predictor faults.
pub const NEUTRAL_VALUE: f32 = 0.0;

/// Board glyphs used by `showboard`.
pub const GLYPH_BLACK: char = 'X';
pub const GLYPH_WHITE: char = 'O';
pub const GLYPH_EMPTY: char = '.';
