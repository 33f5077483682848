//! Monte-Carlo tree search with predictor-guided (PUCT) selection.
//!
//! Each simulation descends the tree by the PUCT rule, materializes one
//! untried move into a new child, evaluates the child's position through the
//! predictor (directly, or via a short prior-guided rollout), and backs the
//! outcome up the selection path with a sign flip per ply.
//!
//! Node statistics keep the backup invariant: below the root, an interior
//! node's visit count equals the sum of its children's visit counts. A
//! node's own creation evaluation is folded out the moment it gains its
//! first child, from the node and from every ancestor below the root, so
//! interior statistics cover current-leaf evaluations exactly. The root is
//! left out of the fold so it keeps one visit per simulation.
//!
//! With a zero simulation budget the search degrades to prior-greedy
//! selection over legal moves, the policy-only operating mode.

use std::time::{Duration, Instant};

use log::{debug, error};

use crate::board::{Board, Color, Move, Vertex};
use crate::constants::{C_PUCT, DEFAULT_PLAYOUTS, DEFAULT_SEED};
use crate::playout::rollout;
use crate::predictor::{Predictor, checked_evaluate, masked_priors};

/// Search parameters for one `genmove`.
#[derive(Clone, Debug)]
pub struct SearchConfig {
    /// Simulation budget. Zero selects the policy-only mode.
    pub playouts: usize,
    /// PUCT exploration constant.
    pub c_puct: f64,
    /// Wall-clock budget; checked between simulations, never mid-simulation.
    pub deadline: Option<Duration>,
    /// Rollout length for the evaluation step. Zero evaluates the expanded
    /// child's position directly.
    pub rollout_depth: usize,
    /// Seed for the rollout policy RNG.
    pub seed: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            playouts: DEFAULT_PLAYOUTS,
            c_puct: C_PUCT,
            deadline: None,
            rollout_depth: 0,
            seed: DEFAULT_SEED,
        }
    }
}

/// A node in the search tree. Owns an independent copy of the position it
/// represents, so mutating one node never aliases another.
pub struct SearchNode {
    /// Position at this node.
    pub board: Board,
    /// Move that produced this node from its parent (unused at the root).
    pub mv: Vertex,
    /// Color to move at this node.
    pub to_move: Color,
    /// Prior probability assigned by the parent's masked distribution.
    pub prior: f32,
    /// Number of simulations recorded at this node.
    pub visits: u32,
    /// Sum of backed-up values, from the perspective of the player who
    /// moved into this node.
    pub value_sum: f64,
    /// Untried moves with their priors, fetched lazily at first expansion.
    pub untried: Vec<(Vertex, f32)>,
    /// Expanded children, in the order they were discovered.
    pub children: Vec<SearchNode>,
    own_eval: f64,
    has_own_sample: bool,
    priors_fetched: bool,
}

impl SearchNode {
    fn new(board: Board, mv: Vertex, to_move: Color, prior: f32) -> Self {
        Self {
            board,
            mv,
            to_move,
            prior,
            visits: 0,
            value_sum: 0.0,
            untried: Vec::new(),
            children: Vec::new(),
            own_eval: 0.0,
            has_own_sample: false,
            priors_fetched: false,
        }
    }

    /// Mean backed-up value; 0 while unvisited.
    pub fn q(&self) -> f64 {
        if self.visits > 0 {
            self.value_sum / self.visits as f64
        } else {
            0.0
        }
    }

    fn fetch_priors(&mut self, predictor: &dyn Predictor) {
        if self.priors_fetched {
            return;
        }
        self.untried = masked_priors(&self.board, self.to_move, predictor);
        self.priors_fetched = true;
    }
}

/// Choose a move for `color` on `board`.
///
/// With a non-zero budget this runs a full tree search and returns the
/// most-visited root child (robust to evaluation noise); with budget zero it
/// returns the prior-greedy move. The authoritative board is never touched:
/// the search works on clones throughout.
pub fn choose_move(
    board: &Board,
    color: Color,
    predictor: &dyn Predictor,
    config: &SearchConfig,
) -> Vertex {
    if config.playouts == 0 {
        return policy_move(board, color, predictor);
    }
    let root = run_search(board, color, predictor, config);
    best_move(&root)
}

/// Prior-greedy selection: argmax of the masked priors, ties to the first
/// candidate in stable order. Returns pass when nothing else is legal.
pub fn policy_move(board: &Board, color: Color, predictor: &dyn Predictor) -> Vertex {
    let masked = masked_priors(board, color, predictor);
    let mut best = Vertex::Pass;
    let mut best_p = f32::NEG_INFINITY;
    for &(vertex, p) in &masked {
        if p > best_p {
            best = vertex;
            best_p = p;
        }
    }
    best
}

/// Run the configured number of simulations and return the root of the
/// resulting tree.
pub fn run_search(
    board: &Board,
    color: Color,
    predictor: &dyn Predictor,
    config: &SearchConfig,
) -> SearchNode {
    let mut root = SearchNode::new(board.clone(), Vertex::Pass, color, 1.0);
    let mut rng = fastrand::Rng::with_seed(config.seed);
    let start = Instant::now();

    let mut simulations = 0;
    for _ in 0..config.playouts {
        if let Some(deadline) = config.deadline {
            if start.elapsed() >= deadline {
                debug!("search deadline reached after {simulations} simulations");
                break;
            }
        }
        simulate(&mut root, predictor, config, &mut rng);
        simulations += 1;
    }

    if let Some(best) = root.children.iter().max_by_key(|c| c.visits) {
        debug!(
            "search done: {simulations} simulations, best {} with {} visits, q={:.3}",
            best.mv, best.visits, best.q()
        );
    }
    root
}

/// The most-visited root child, ties to the first discovered.
pub fn best_move(root: &SearchNode) -> Vertex {
    let mut best = Vertex::Pass;
    let mut best_visits = 0;
    for child in &root.children {
        if child.visits > best_visits {
            best = child.mv;
            best_visits = child.visits;
        }
    }
    best
}

/// One simulation: descend, expand, evaluate, back up.
fn simulate(
    root: &mut SearchNode,
    predictor: &dyn Predictor,
    config: &SearchConfig,
    rng: &mut fastrand::Rng,
) {
    let (path, retired) = descend(root, predictor, config.c_puct);

    // Evaluate the reached leaf for the color to move there.
    let leaf = leaf_of(root, &path);
    let value_to_move = if config.rollout_depth > 0 && !leaf.board.is_game_over() {
        rollout(&leaf.board, leaf.to_move, predictor, config.rollout_depth, rng)
    } else {
        checked_evaluate(predictor, &leaf.board, leaf.to_move)
    };
    // Perspective of the player who moved into the leaf.
    let leaf_value = -f64::from(value_to_move);

    backup(root, &path, leaf_value);
    if let Some(own_eval) = retired {
        fold_out(root, &path[..path.len() - 1], own_eval);
    }
}

/// Descend from the root, expanding one untried move when available.
/// Returns the path of child indices taken, plus the expanded node's own
/// creation evaluation when this simulation turned it into an interior node.
fn descend(
    root: &mut SearchNode,
    predictor: &dyn Predictor,
    c_puct: f64,
) -> (Vec<usize>, Option<f64>) {
    let mut path = Vec::new();
    let mut node = root;

    loop {
        if node.board.is_game_over() {
            return (path, None); // terminal leaf, re-evaluated as-is
        }
        node.fetch_priors(predictor);

        if let Some((idx, retired)) = expand_one(node) {
            path.push(idx);
            return (path, retired);
        }
        if node.children.is_empty() {
            return (path, None);
        }

        let idx = select_child(node, c_puct);
        path.push(idx);
        node = &mut node.children[idx];
    }
}

/// Materialize the next untried move into a child node. Returns its index
/// and, for a node gaining its first child, the creation evaluation that
/// must be folded out of the path statistics; `None` when the node is fully
/// expanded.
fn expand_one(node: &mut SearchNode) -> Option<(usize, Option<f64>)> {
    while !node.untried.is_empty() {
        let (vertex, prior) = node.untried.remove(0);
        let mut child_board = node.board.clone();
        let color = node.to_move;
        if let Err(e) = child_board.apply(Move { color, vertex }) {
            // Untried moves come from the legal-move mask; a rejection here
            // means tree/board divergence.
            error!("expansion of {vertex} rejected by the board: {e}");
            continue;
        }
        let retired = if node.has_own_sample {
            node.has_own_sample = false;
            Some(node.own_eval)
        } else {
            None
        };
        node.children
            .push(SearchNode::new(child_board, vertex, color.opponent(), prior));
        return Some((node.children.len() - 1, retired));
    }
    None
}

/// PUCT selection over expanded children, ties to the first discovered.
fn select_child(node: &SearchNode, c_puct: f64) -> usize {
    let sqrt_parent = f64::from(node.visits).sqrt();
    let mut best = 0;
    let mut best_score = f64::NEG_INFINITY;
    for (i, child) in node.children.iter().enumerate() {
        let exploration =
            c_puct * f64::from(child.prior) * sqrt_parent / (1.0 + f64::from(child.visits));
        let score = child.q() + exploration;
        if score > best_score {
            best = i;
            best_score = score;
        }
    }
    best
}

fn leaf_of<'a>(root: &'a SearchNode, path: &[usize]) -> &'a SearchNode {
    path.iter().fold(root, |node, &idx| &node.children[idx])
}

/// Propagate `leaf_value` (perspective of the player who moved into the
/// leaf) up every node on the path, flipping sign at each ply.
fn backup(root: &mut SearchNode, path: &[usize], leaf_value: f64) {
    let mut sign = if path.len() % 2 == 0 { 1.0 } else { -1.0 };
    let mut node = root;
    record(node, sign * leaf_value);
    for &idx in path {
        node = &mut node.children[idx];
        sign = -sign;
        record(node, sign * leaf_value);
    }
}

fn record(node: &mut SearchNode, value: f64) {
    node.visits += 1;
    node.value_sum += value;
    // A leaf's first sample is its own creation evaluation; it is folded
    // out of the whole path when the node gains children.
    if node.visits == 1 && node.children.is_empty() {
        node.own_eval = value;
        node.has_own_sample = true;
    }
}

/// Remove one node's creation evaluation from every node on the path to it,
/// root excluded. `own_eval` is the value as it was recorded at the expanded
/// node itself; the sign alternates per ply above it, mirroring `backup`.
fn fold_out(root: &mut SearchNode, path_to_expanded: &[usize], own_eval: f64) {
    let mut node = root;
    for (depth, &idx) in path_to_expanded.iter().enumerate() {
        node = &mut node.children[idx];
        let sign = if (path_to_expanded.len() - 1 - depth) % 2 == 0 {
            1.0
        } else {
            -1.0
        };
        node.visits -= 1;
        node.value_sum -= sign * own_eval;
    }
}
