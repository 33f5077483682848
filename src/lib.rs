//! Tengen: a Go engine with predictor-guided MCTS.
//!
//! This crate provides a rules-correct Go board, a Monte-Carlo tree search
//! biased by externally supplied move-probability and position-evaluation
//! signals, and a line-based GTP-style protocol front end for GUIs and
//! tournament managers.
//!
//! ## Modules
//!
//! - [`constants`] - Board defaults and search parameters
//! - [`board`] - Board state, captures, ko, legality
//! - [`predictor`] - The external prior/evaluation interface
//! - [`mcts`] - PUCT tree search
//! - [`playout`] - Prior-guided rollouts
//! - [`session`] - Game sessions and the session registry
//! - [`gtp`] - Protocol state machine
//!
//! ## Example
//!
//! ```
//! use tengen::board::{Board, Color};
//! use tengen::mcts::{SearchConfig, choose_move};
//! use tengen::predictor::MaterialPredictor;
//!
//! let mut board = Board::new(9);
//! board.place(Color::Black, 4, 4).unwrap();
//!
//! let config = SearchConfig { playouts: 100, ..SearchConfig::default() };
//! let reply = choose_move(&board, Color::White, &MaterialPredictor, &config);
//! println!("White replies {reply}");
//! ```

pub mod board;
pub mod constants;
pub mod gtp;
pub mod mcts;
pub mod playout;
pub mod predictor;
pub mod session;
