//! Go board representation and rules.
//!
//! This module provides the core game logic:
//! - Stone placement with capture detection
//! - Suicide prohibition with full rollback
//! - Simple (single-point) ko enforcement
//! - Flood-fill group and liberty queries
//! - Dry-run legality checks for move generation
//!
//! The board knows nothing about search or protocol; it is cloned freely by
//! the search engine to explore hypothetical continuations.

use std::fmt;

use thiserror::Error;

use crate::constants::{DEFAULT_KOMI, DEFAULT_SIZE, GLYPH_BLACK, GLYPH_EMPTY, GLYPH_WHITE};

/// Stone color.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Color {
    Black,
    White,
}

impl Color {
    pub fn opponent(self) -> Color {
        match self {
            Color::Black => Color::White,
            Color::White => Color::Black,
        }
    }

    pub fn glyph(self) -> char {
        match self {
            Color::Black => GLYPH_BLACK,
            Color::White => GLYPH_WHITE,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::Black => write!(f, "black"),
            Color::White => write!(f, "white"),
        }
    }
}

/// A board intersection, `(x, y)` with `x` the row from the top and `y` the
/// column from the left, both in `[0, size)`.
pub type Point = (usize, usize);

/// A playable vertex: a board point or the pass sentinel.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Vertex {
    Pass,
    Point(usize, usize),
}

impl fmt::Display for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Vertex::Pass => write!(f, "pass"),
            Vertex::Point(x, y) => write!(f, "({x},{y})"),
        }
    }
}

/// A move: a color paired with the vertex it plays.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Move {
    pub color: Color,
    pub vertex: Vertex,
}

/// Why a placement was rejected. The board is untouched in every case.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum MoveError {
    #[error("point is off the board")]
    OutOfBounds,
    #[error("point not empty")]
    Occupied,
    #[error("illegal move: retakes ko")]
    Ko,
    #[error("illegal move: suicide")]
    Suicide,
}

/// What a successful placement did.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PlaceOutcome {
    /// Number of opposing stones removed by this move.
    pub captured: usize,
}

/// A Go board with capture, ko, and pass bookkeeping.
#[derive(Clone)]
pub struct Board {
    size: usize,
    cells: Vec<Option<Color>>,
    /// Point forbidden to the next mover after a single-stone ko capture.
    ko: Option<Point>,
    captured_by_black: usize,
    captured_by_white: usize,
    consecutive_passes: usize,
    move_number: usize,
    komi: f32,
}

impl Default for Board {
    fn default() -> Self {
        Self::new(DEFAULT_SIZE)
    }
}

impl Board {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            cells: vec![None; size * size],
            ko: None,
            captured_by_black: 0,
            captured_by_white: 0,
            consecutive_passes: 0,
            move_number: 0,
            komi: DEFAULT_KOMI,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn komi(&self) -> f32 {
        self.komi
    }

    pub fn set_komi(&mut self, komi: f32) {
        self.komi = komi;
    }

    pub fn ko(&self) -> Option<Point> {
        self.ko
    }

    pub fn move_number(&self) -> usize {
        self.move_number
    }

    pub fn consecutive_passes(&self) -> usize {
        self.consecutive_passes
    }

    /// Two consecutive passes end the game.
    pub fn is_game_over(&self) -> bool {
        self.consecutive_passes >= 2
    }

    /// Stones captured by `color` so far.
    pub fn captures_by(&self, color: Color) -> usize {
        match color {
            Color::Black => self.captured_by_black,
            Color::White => self.captured_by_white,
        }
    }

    fn idx(&self, x: usize, y: usize) -> usize {
        x * self.size + y
    }

    fn in_bounds(&self, x: usize, y: usize) -> bool {
        x < self.size && y < self.size
    }

    /// Stone at `(x, y)`, `None` for empty or off-board points.
    pub fn get(&self, x: usize, y: usize) -> Option<Color> {
        if !self.in_bounds(x, y) {
            return None;
        }
        self.cells[self.idx(x, y)]
    }

    /// Number of stones of `color` on the board.
    pub fn stone_count(&self, color: Color) -> usize {
        self.cells.iter().filter(|c| **c == Some(color)).count()
    }

    fn neighbors(&self, x: usize, y: usize) -> impl Iterator<Item = Point> + '_ {
        let s = self.size;
        let mut v = Vec::with_capacity(4);
        if x > 0 {
            v.push((x - 1, y));
        }
        if x + 1 < s {
            v.push((x + 1, y));
        }
        if y > 0 {
            v.push((x, y - 1));
        }
        if y + 1 < s {
            v.push((x, y + 1));
        }
        v.into_iter()
    }

    /// Place a stone of `color` at `(x, y)`.
    ///
    /// Adjacent opposing groups left without liberties are removed before the
    /// suicide check, so a capturing move is never suicide. A rejected move
    /// leaves the board byte-for-byte unchanged.
    pub fn place(&mut self, color: Color, x: usize, y: usize) -> Result<PlaceOutcome, MoveError> {
        if !self.in_bounds(x, y) {
            return Err(MoveError::OutOfBounds);
        }
        if self.get(x, y).is_some() {
            return Err(MoveError::Occupied);
        }
        if self.ko == Some((x, y)) {
            return Err(MoveError::Ko);
        }

        let idx = self.idx(x, y);
        self.cells[idx] = Some(color);

        // Capture check is restricted to the (up to four) opposing groups
        // adjacent to the new stone.
        let opp = color.opponent();
        let mut to_remove: Vec<Point> = Vec::new();
        for (nx, ny) in self.neighbors(x, y) {
            if self.get(nx, ny) == Some(opp)
                && !to_remove.contains(&(nx, ny))
                && self.liberties_of(nx, ny) == 0
            {
                self.collect_group(nx, ny, &mut to_remove);
            }
        }
        for &(rx, ry) in &to_remove {
            let i = self.idx(rx, ry);
            self.cells[i] = None;
        }
        let captured = to_remove.len();

        if captured == 0 && self.liberties_of(x, y) == 0 {
            // Suicide: roll back the only mutation made so far.
            self.cells[idx] = None;
            return Err(MoveError::Suicide);
        }

        // Simple ko: a single-stone capture by a lone stone in atari forbids
        // the immediate recapture. Anything else clears the ko point.
        self.ko = if captured == 1
            && self.group_of(x, y).len() == 1
            && self.liberties_of(x, y) == 1
        {
            Some(to_remove[0])
        } else {
            None
        };

        match color {
            Color::Black => self.captured_by_black += captured,
            Color::White => self.captured_by_white += captured,
        }
        self.consecutive_passes = 0;
        self.move_number += 1;
        Ok(PlaceOutcome { captured })
    }

    /// Pass. Always legal; clears the ko point.
    pub fn pass_turn(&mut self, _color: Color) {
        self.ko = None;
        self.consecutive_passes += 1;
        self.move_number += 1;
    }

    /// Apply a move, placing or passing as appropriate.
    pub fn apply(&mut self, mv: Move) -> Result<PlaceOutcome, MoveError> {
        match mv.vertex {
            Vertex::Pass => {
                self.pass_turn(mv.color);
                Ok(PlaceOutcome { captured: 0 })
            }
            Vertex::Point(x, y) => self.place(mv.color, x, y),
        }
    }

    /// All stones in the group containing `(x, y)`, empty if no stone there.
    pub fn group_of(&self, x: usize, y: usize) -> Vec<Point> {
        let mut group = Vec::new();
        if self.get(x, y).is_some() {
            self.collect_group(x, y, &mut group);
        }
        group
    }

    fn collect_group(&self, x: usize, y: usize, out: &mut Vec<Point>) {
        let color = match self.get(x, y) {
            Some(c) => c,
            None => return,
        };
        let mut stack = vec![(x, y)];
        let mut visited = vec![false; self.size * self.size];
        while let Some((cx, cy)) = stack.pop() {
            let i = self.idx(cx, cy);
            if visited[i] {
                continue;
            }
            visited[i] = true;
            out.push((cx, cy));
            for (nx, ny) in self.neighbors(cx, cy) {
                if !visited[self.idx(nx, ny)] && self.get(nx, ny) == Some(color) {
                    stack.push((nx, ny));
                }
            }
        }
    }

    /// Liberties of the group containing `(x, y)`, 0 if no stone there.
    ///
    /// Flood-fills the group while collecting distinct adjacent empty points.
    pub fn liberties_of(&self, x: usize, y: usize) -> usize {
        let color = match self.get(x, y) {
            Some(c) => c,
            None => return 0,
        };
        let mut stack = vec![(x, y)];
        let mut visited = vec![false; self.size * self.size];
        let mut liberty = vec![false; self.size * self.size];
        let mut libs = 0;
        while let Some((cx, cy)) = stack.pop() {
            let i = self.idx(cx, cy);
            if visited[i] {
                continue;
            }
            visited[i] = true;
            for (nx, ny) in self.neighbors(cx, cy) {
                let ni = self.idx(nx, ny);
                match self.get(nx, ny) {
                    None => {
                        if !liberty[ni] {
                            liberty[ni] = true;
                            libs += 1;
                        }
                    }
                    Some(c) if c == color && !visited[ni] => stack.push((nx, ny)),
                    _ => {}
                }
            }
        }
        libs
    }

    /// Would `place(color, x, y)` succeed? Simulates on a clone and discards
    /// it, so the authoritative board is never mutated.
    pub fn is_legal(&self, color: Color, x: usize, y: usize) -> bool {
        if !self.in_bounds(x, y) || self.get(x, y).is_some() || self.ko == Some((x, y)) {
            return false;
        }
        self.clone().place(color, x, y).is_ok()
    }

    /// All empty points where `place(color, ..)` would succeed, in stable
    /// row-major order.
    pub fn legal_moves(&self, color: Color) -> Vec<Point> {
        let mut moves = Vec::new();
        for x in 0..self.size {
            for y in 0..self.size {
                if self.is_legal(color, x, y) {
                    moves.push((x, y));
                }
            }
        }
        moves
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for x in 0..self.size {
            for y in 0..self.size {
                let ch = match self.get(x, y) {
                    Some(c) => c.glyph(),
                    None => GLYPH_EMPTY,
                };
                write!(f, "{ch}")?;
            }
            if x + 1 < self.size {
                writeln!(f)?;
            }
        }
        Ok(())
    }
}
