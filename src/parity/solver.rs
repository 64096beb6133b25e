//! Invocation of the external parity game solver.
//!
//! The solver is an opaque process: it receives the PGSolver text on
//! stdin and reports which player wins from node 0. Its stdout is scanned
//! for a phrase of the form `player 0` / `player 1`, falling back to the
//! first standalone `0` or `1` token.

use std::io::Write;
use std::process::{Command, Stdio};

use log::{debug, info};

use crate::parity::Player;
use crate::Error;

const TOOL: &str = "game solver";

/// Runs the solver command over the game text and returns the winner of
/// node 0.
pub fn solve(game_text: &str, command: &str) -> Result<Player, Error> {
    info!("solving the parity game with `{}`", command);
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| Error::Spawn { tool: TOOL, source })?;
    child
        .stdin
        .take()
        .expect("stdin was piped")
        .write_all(game_text.as_bytes())
        .map_err(|source| Error::Spawn { tool: TOOL, source })?;
    let output = child
        .wait_with_output()
        .map_err(|source| Error::Spawn { tool: TOOL, source })?;
    if !output.status.success() {
        return Err(Error::Tool {
            tool: TOOL,
            status: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    debug!("solver answered: {}", stdout.trim());
    parse_winner(&stdout).ok_or_else(|| Error::ToolOutput {
        tool: TOOL,
        message: format!("no winner found in solver output:\n{}", stdout),
    })
}

/// Extracts the winning player from the solver's output.
fn parse_winner(stdout: &str) -> Option<Player> {
    let mut tokens = stdout.split(|c: char| !c.is_ascii_alphanumeric());
    let mut fallback = None;
    while let Some(token) = tokens.next() {
        match token {
            "player" | "Player" => match tokens.next() {
                Some("0") => return Some(Player::Even),
                Some("1") => return Some(Player::Odd),
                _ => continue,
            },
            "0" if fallback.is_none() => fallback = Some(Player::Even),
            "1" if fallback.is_none() => fallback = Some(Player::Odd),
            _ => continue,
        }
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phrases_take_precedence_over_tokens() {
        assert_eq!(
            parse_winner("3 nodes, player 1 wins node 0"),
            Some(Player::Odd)
        );
        assert_eq!(parse_winner("the winner is player 0."), Some(Player::Even));
    }

    #[test]
    fn bare_tokens_are_accepted() {
        assert_eq!(parse_winner("1\n"), Some(Player::Odd));
        assert_eq!(parse_winner("0"), Some(Player::Even));
    }

    #[test]
    fn missing_winner_is_detected() {
        assert_eq!(parse_winner("no answer"), None);
    }
}
