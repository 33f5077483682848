//! Tengen: a Go engine with predictor-guided MCTS.
//!
//! ## Usage
//!
//! - `tengen gtp` - Start the protocol server for GUI integration
//! - `tengen demo` - Run a short search demo
//!
//! Logging goes to stderr (stdout is the protocol channel); set the level
//! with `RUST_LOG`, e.g. `RUST_LOG=debug tengen gtp`.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};

use tengen::board::{Board, Color};
use tengen::constants::{DEFAULT_KOMI, DEFAULT_PLAYOUTS, DEFAULT_SEED, DEFAULT_SIZE};
use tengen::gtp::{EngineOptions, GtpEngine};
use tengen::mcts::{SearchConfig, choose_move};
use tengen::predictor::MaterialPredictor;
use tengen::session::Mode;

/// Tengen: a Go engine with predictor-guided MCTS
#[derive(Parser)]
#[command(name = "tengen")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum CliMode {
    /// Prior-greedy move selection
    Policy,
    /// Full tree search
    Mcts,
}

impl From<CliMode> for Mode {
    fn from(mode: CliMode) -> Self {
        match mode {
            CliMode::Policy => Mode::Policy,
            CliMode::Mcts => Mode::Mcts,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start the protocol server for use with GUI applications
    Gtp {
        /// Simulations per genmove
        #[arg(long, default_value_t = DEFAULT_PLAYOUTS)]
        playouts: usize,
        /// Operating mode, fixed for the session
        #[arg(long, value_enum, default_value_t = CliMode::Mcts)]
        mode: CliMode,
        /// Board size (9, 13, or 19)
        #[arg(long, default_value_t = DEFAULT_SIZE)]
        boardsize: usize,
        /// Komi
        #[arg(long, default_value_t = DEFAULT_KOMI)]
        komi: f32,
        /// Rollout length per simulation (0 evaluates positions directly)
        #[arg(long, default_value_t = 0)]
        rollout_depth: usize,
        /// Rollout RNG seed
        #[arg(long, default_value_t = DEFAULT_SEED)]
        seed: u64,
    },
    /// Run a short search demo
    Demo,
}

fn main() -> anyhow::Result<()> {
    // Keep the handle alive for the lifetime of the process.
    let _logger = flexi_logger::Logger::try_with_env_or_str("info")
        .context("bad log spec")?
        .log_to_stderr()
        .start()
        .context("logger init failed")?;

    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Gtp {
            playouts,
            mode,
            boardsize,
            komi,
            rollout_depth,
            seed,
        }) => {
            let options = EngineOptions {
                size: boardsize,
                komi,
                mode: mode.into(),
                search: SearchConfig {
                    playouts,
                    rollout_depth,
                    seed,
                    ..SearchConfig::default()
                },
            };
            let mut engine = GtpEngine::new(options, Box::new(MaterialPredictor));
            engine.run_stdio()
        }
        Some(Commands::Demo) | None => {
            run_demo();
            Ok(())
        }
    }
}

fn run_demo() {
    println!("Tengen: Go engine demo\n");

    let mut board = Board::new(9);
    board.place(Color::Black, 4, 4).unwrap();
    board.place(Color::White, 2, 6).unwrap();
    println!("{board}\n");

    let config = SearchConfig {
        playouts: 200,
        ..SearchConfig::default()
    };
    println!("Running {} simulations...", config.playouts);
    let reply = choose_move(&board, Color::Black, &MaterialPredictor, &config);
    println!("Black plays {reply}");
}
