//! Options for the satisfiability check.

use clap::{ArgEnum, ArgGroup, Args, Parser};

/// The default command for the external determinizer (see
/// [`CheckOptions::determinizer`]).
pub const DEFAULT_DETERMINIZER: &str =
    "autfilt --deterministic --colored-parity='max even' --state-based-acceptance";

/// The default command for the external parity game solver (see
/// [`CheckOptions::solver`]).
pub const DEFAULT_SOLVER: &str = "python3 -c 'import sys, spot; \
game, = spot.automata(sys.stdin.read()); \
print(1 if spot.solve_game(game) else 0)'";

/// Implement [`Display`](std::fmt::Display) with the information in
/// [`clap::ArgEnum`].
///
/// This ensures consistent names for parsing of the default argument.
macro_rules! arg_enum_display {
    ($t:ty) => {
        impl std::fmt::Display for $t
        where
            $t: clap::ArgEnum,
        {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let value = clap::ArgEnum::to_possible_value(self).unwrap();
                write!(f, "{}", value.get_name())
            }
        }
    };
}

/// The output produced by the check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ArgEnum)]
pub enum OutputFormat {
    /// Solve the game and report the verdict.
    #[clap(name = "verdict")]
    Verdict,
    /// Emit the parity game in PGSolver format without solving it.
    #[clap(name = "pg")]
    Pg,
}
impl Default for OutputFormat {
    fn default() -> Self {
        Self::Verdict
    }
}
arg_enum_display!(OutputFormat);

/// The strategy for choosing the next pending entity during the arena
/// and game constructions. Both strategies yield deterministic indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ArgEnum)]
pub enum ExplorationStrategy {
    /// Expand entities in a breadth-first search.
    #[clap(name = "bfs")]
    Bfs,
    /// Expand entities in a depth-first search.
    #[clap(name = "dfs")]
    Dfs,
}
impl Default for ExplorationStrategy {
    fn default() -> Self {
        Self::Bfs
    }
}
arg_enum_display!(ExplorationStrategy);

/// The trace level / verbosity for the logging framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ArgEnum)]
pub enum TraceLevel {
    /// Turn logging off.
    #[clap(name = "off")]
    Off,
    /// Only print errors.
    #[clap(name = "error")]
    Error,
    /// Print errors and warnings.
    #[clap(name = "warn")]
    Warn,
    /// Print errors, warnings and useful information.
    #[clap(name = "info")]
    Info,
    /// Print errors, warnings, useful and debug information.
    #[clap(name = "debug")]
    Debug,
    /// Print all information, including very verbose output.
    #[clap(name = "trace")]
    Trace,
}
impl Default for TraceLevel {
    fn default() -> Self {
        Self::Error
    }
}
arg_enum_display!(TraceLevel);

impl From<TraceLevel> for log::LevelFilter {
    fn from(level: TraceLevel) -> Self {
        match level {
            TraceLevel::Off => Self::Off,
            TraceLevel::Error => Self::Error,
            TraceLevel::Warn => Self::Warn,
            TraceLevel::Info => Self::Info,
            TraceLevel::Debug => Self::Debug,
            TraceLevel::Trace => Self::Trace,
        }
    }
}

/// Options to control the satisfiability check.
///
/// These options can be used with [`check_with`](crate::check_with).
///
/// # Examples
///
/// ```
/// use musat::options::*;
/// let options = CheckOptions {
///     output_format: OutputFormat::Pg,
///     ..CheckOptions::default()
/// };
/// ```
#[derive(Debug, Clone, Args)]
pub struct CheckOptions {
    /// Output of the check: the solved verdict, or the game in PGSolver
    /// format
    #[clap(
        arg_enum,
        short = 'o',
        long = "output-format",
        value_name = "format",
        default_value_t,
        display_order = 4
    )]
    pub output_format: OutputFormat,
    /// Exploration strategy for the arena and game constructions
    #[clap(
        arg_enum,
        short = 'e',
        long = "exploration",
        value_name = "strategy",
        default_value_t,
        display_order = 5
    )]
    pub exploration_strategy: ExplorationStrategy,
    /// Determinizer command, run through `sh -c`; it receives a
    /// nondeterministic parity max even automaton in HOA text on stdin
    /// and must answer with a deterministic colored equivalent on stdout
    #[clap(
        long = "determinizer",
        value_name = "cmd",
        default_value = "autfilt --deterministic --colored-parity='max even' --state-based-acceptance",
        display_order = 6
    )]
    pub determinizer: String,
    /// Solver command, run through `sh -c`; it receives the game in
    /// PGSolver text on stdin and must print the player winning node 0
    #[clap(
        long = "solver",
        value_name = "cmd",
        default_value = "python3 -c 'import sys, spot; \
game, = spot.automata(sys.stdin.read()); \
print(1 if spot.solve_game(game) else 0)'",
        display_order = 7
    )]
    pub solver: String,
    /// Write the boolean-labelled tracking automaton and its
    /// determinization as orig.dot and graph.dot
    #[clap(long = "dot", display_order = 8)]
    pub write_dot: bool,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::default(),
            exploration_strategy: ExplorationStrategy::default(),
            determinizer: DEFAULT_DETERMINIZER.to_owned(),
            solver: DEFAULT_SOLVER.to_owned(),
            write_dot: false,
        }
    }
}

/// A group of options used for parsing the arguments of the command-line
/// interface.
///
/// This struct should mainly be used with [`clap`] and not instantiated
/// manually. For using this crate as a library, please use
/// [`CheckOptions`] directly instead.
#[derive(Debug, Clone, Parser)]
#[clap(version, about)]
#[clap(group = ArgGroup::new("input-formula").required(true))]
pub struct CliOptions {
    /// The μ-calculus formula to check.
    /// Either this field or [`CliOptions::input_file`] has to be set.
    #[clap(
        short = 'f',
        long = "formula",
        group = "input-formula",
        display_order = 0
    )]
    pub formula: Option<String>,
    /// The input file from which the formula is read.
    /// Either this field or [`CliOptions::formula`] has to be set.
    #[clap(
        short = 'F',
        long = "formula-file",
        group = "input-formula",
        display_order = 1
    )]
    pub input_file: Option<String>,
    /// The output file where the game should be written to.
    #[clap(short = 'O', long = "output-file", display_order = 2)]
    pub output_file: Option<String>,
    /// The trace level to use for instantiating the logging framework.
    #[clap(
        arg_enum,
        short = 't',
        long = "trace",
        value_name = "trace-level",
        default_value_t,
        display_order = 10
    )]
    pub trace_level: TraceLevel,
    /// The set of options for the check itself.
    #[clap(flatten)]
    pub check_options: CheckOptions,
}

impl From<&CliOptions> for CheckOptions {
    fn from(options: &CliOptions) -> Self {
        options.check_options.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_cli_literals() {
        let options = CheckOptions::default();
        assert_eq!(options.determinizer, DEFAULT_DETERMINIZER);
        assert_eq!(options.solver, DEFAULT_SOLVER);
        assert_eq!(options.output_format, OutputFormat::Verdict);
    }

    #[test]
    fn arg_enum_display_round_trips() {
        assert_eq!(OutputFormat::Pg.to_string(), "pg");
        assert_eq!(ExplorationStrategy::Bfs.to_string(), "bfs");
        assert_eq!(TraceLevel::Info.to_string(), "info");
    }
}
