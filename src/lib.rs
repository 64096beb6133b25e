//! Musat library crate for deciding satisfiability of modal μ-calculus
//! formulas.
//!
//! The decision procedure reduces satisfiability to the emptiness of an
//! alternating parity tree automaton over subformulae: the automaton is
//! turned into a game arena and a tracking word automaton, the tracking
//! automaton is determinized by an external tool, and the product of
//! arena, determinized automaton and carried symbols is a parity game in
//! which the existential player wins node 0 if and only if the formula is
//! satisfiable. The game is handed to an external solver in PGSolver
//! text.

pub mod apta;
pub mod arena;
pub mod constructor;
pub mod dpw;
pub mod formula;
pub mod options;
pub mod parity;
pub mod tracking;

use std::fmt::{self, Display};
use std::io;

use log::{debug, info};
use thiserror::Error as ThisError;

use apta::Apta;
use arena::Arena;
use constructor::{BfsQueue, DfsQueue};
use formula::parser::{parse, ParseError};
use formula::Formulas;
use options::{CheckOptions, ExplorationStrategy, OutputFormat};
use parity::game::ParityGame;
use parity::{solver, Player};
use tracking::TrackingAutomaton;

/// An error of the check: a malformed formula, or a failing external
/// tool. Internal invariant violations are not represented here; they are
/// programmer errors and panic.
#[derive(Debug, ThisError)]
pub enum Error {
    /// The input formula was rejected by the parser or normalizer.
    #[error("{0}")]
    Formula(#[from] ParseError),
    /// An external tool could not be started or written to.
    #[error("could not run the {tool}: {source}")]
    Spawn {
        /// Which tool was invoked.
        tool: &'static str,
        /// The underlying I/O error.
        source: io::Error,
    },
    /// An external tool exited with failure.
    #[error("the {tool} failed ({status:?}), it reported:\n{stderr}")]
    Tool {
        /// Which tool was invoked.
        tool: &'static str,
        /// The exit code, if any.
        status: Option<i32>,
        /// The captured standard error of the tool.
        stderr: String,
    },
    /// An external tool answered with output the pipeline cannot use.
    #[error("unusable {tool} output: {message}")]
    ToolOutput {
        /// Which tool was invoked.
        tool: &'static str,
        /// What was wrong with the output.
        message: String,
    },
    /// An I/O error outside of the external tools.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// The satisfiability status of a formula.
///
/// Displays as the verdict the driver prints: `True` for a satisfiable
/// formula, `False` otherwise.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Status {
    /// The formula is satisfiable.
    Satisfiable,
    /// The formula is unsatisfiable.
    Unsatisfiable,
}

impl From<Player> for Status {
    fn from(player: Player) -> Self {
        match player {
            Player::Even => Self::Satisfiable,
            Player::Odd => Self::Unsatisfiable,
        }
    }
}

impl From<Status> for Player {
    fn from(status: Status) -> Self {
        match status {
            Status::Satisfiable => Self::Even,
            Status::Unsatisfiable => Self::Odd,
        }
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Satisfiable => "True",
                Self::Unsatisfiable => "False",
            }
        )
    }
}

/// A result of the check procedure.
pub struct CheckResult {
    /// The verdict, when the game was solved.
    status: Option<Status>,
    /// The emitted game text, when solving was not requested.
    game: Option<String>,
}

impl CheckResult {
    /// Returns the satisfiability status, if the game was solved.
    pub fn status(&self) -> Option<Status> {
        self.status
    }

    /// Returns the PGSolver text of the game, if it was requested
    /// instead of a verdict.
    pub fn game(&self) -> Option<&str> {
        self.game.as_deref()
    }

    fn with_status(status: Status) -> Self {
        Self {
            status: Some(status),
            game: None,
        }
    }

    fn with_game(game: String) -> Self {
        Self {
            status: None,
            game: Some(game),
        }
    }
}

/// Checks satisfiability of the given formula with the default
/// [`CheckOptions`].
///
/// # Errors
///
/// Returns an error if the formula is malformed or an external tool
/// fails.
pub fn check(input: &str) -> Result<CheckResult, Error> {
    check_with(input, &CheckOptions::default())
}

/// Checks satisfiability of the given formula.
///
/// # Errors
///
/// Returns an error if the formula is malformed or an external tool
/// fails.
pub fn check_with(input: &str, options: &CheckOptions) -> Result<CheckResult, Error> {
    let mut formulas = Formulas::new();
    let root = parse(&mut formulas, input)?;
    debug!("parsed formula: {}", formulas.display(root));

    info!("building the automaton");
    let apta = Apta::of(&mut formulas, root);
    debug!("automaton has {} states", apta.len());

    info!("building the arena and the tracking automaton");
    let arena = match options.exploration_strategy {
        ExplorationStrategy::Bfs => {
            Arena::of(&formulas, &apta, 0, BfsQueue::with_capacity(4096))
        }
        ExplorationStrategy::Dfs => {
            Arena::of(&formulas, &apta, 0, DfsQueue::with_capacity(4096))
        }
    };
    let npa = TrackingAutomaton::of(&apta);
    if options.write_dot {
        write_dot_file("orig.dot", &npa)?;
    }

    let dpw = dpw::determinize(&formulas, &apta, &npa, &options.determinizer)?;
    if options.write_dot {
        write_dot_file("graph.dot", &dpw)?;
    }

    info!("building the parity game");
    let game = match options.exploration_strategy {
        ExplorationStrategy::Bfs => {
            ParityGame::of(&arena, &dpw, BfsQueue::with_capacity(4096))
        }
        ExplorationStrategy::Dfs => {
            ParityGame::of(&arena, &dpw, DfsQueue::with_capacity(4096))
        }
    };
    let text = game.to_string();

    if options.output_format == OutputFormat::Pg {
        return Ok(CheckResult::with_game(text));
    }

    let winner = solver::solve(&text, &options.solver)?;
    info!("game solved, winner of node 0 is {}", winner);
    Ok(CheckResult::with_status(Status::from(winner)))
}

/// Writes a diagnostic GraphViz rendering of an automaton. The files are
/// not part of the contract and failures only affect them.
fn write_dot_file(path: &str, automaton: &TrackingAutomaton) -> Result<(), Error> {
    let mut file = fs_err::File::create(path)?;
    dpw::write_dot(&mut file, automaton)?;
    Ok(())
}
