//! Musat binary crate.

use std::io::{self, Write};

use clap::Parser;
use fs_err as fs;

use musat::options::{CheckOptions, CliOptions, TraceLevel};
use musat::{check_with, Error};

fn main() {
    if let Err(error) = musat_main() {
        // discard result as we cannot further propagate a write error
        let _ = writeln!(io::stderr(), "Error: {}", error);
        std::process::exit(1);
    }
}

/// Initialize the logging framework with the given trace level.
///
/// # Errors
///
/// Returns an error if the logging framework has already been initialized.
fn initialize_logging(level: TraceLevel) -> io::Result<()> {
    env_logger::builder()
        .filter(None, level.into())
        .format_timestamp_millis()
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::AlreadyExists, e))
}

/// Main function that parses the options, reads the input, runs the
/// check and writes the verdict or the game.
///
/// # Errors
///
/// Returns an error if an I/O error occurred or an external tool failed.
fn musat_main() -> Result<(), Error> {
    let options = CliOptions::parse();
    initialize_logging(options.trace_level)?;

    let input = if let Some(input_file) = &options.input_file {
        fs::read_to_string(input_file)?
    } else if let Some(formula) = &options.formula {
        formula.clone()
    } else {
        unreachable!()
    };
    let input = input.trim();

    let check_options = CheckOptions::from(&options);
    let result = match check_with(input, &check_options) {
        // render parse errors with a caret into the offending input
        Err(Error::Formula(error)) => {
            let _ = writeln!(io::stderr(), "{}", error.render(input));
            std::process::exit(1);
        }
        other => other?,
    };

    if let Some(status) = result.status() {
        writeln!(io::stdout(), "{}", status)?;
    }
    if let Some(game) = result.game() {
        if let Some(output_file) = &options.output_file {
            let mut file = fs::File::create(output_file)?;
            write!(file, "{}", game)?;
        } else {
            write!(io::stdout(), "{}", game)?;
        }
    }
    Ok(())
}
