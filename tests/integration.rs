//! Integration tests that run the full pipeline, including the external
//! determinizer and game solver when they are installed on the host.

use std::io::Write;
use std::process::Command;

use musat::options::{CheckOptions, OutputFormat};
use musat::parity::game::RawGame;
use musat::{
    check_with,
    Status::{self, Satisfiable, Unsatisfiable},
};

/// Returns true if the given shell command can run on this host.
fn have_tool(probe: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(probe)
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Returns true if both external tools of the default configuration are
/// available; prints a notice naming the test otherwise.
fn external_tools_available(test: &str) -> bool {
    let available =
        have_tool("command -v autfilt") && have_tool("python3 -c 'import spot'");
    if !available {
        eprintln!("skipping {}: autfilt or python spot not installed", test);
    }
    available
}

/// Check the given formula and compare the verdict against the expected
/// status.
fn verify_satisfiability(formula: &str, expected: Status) {
    let result = check_with(formula, &CheckOptions::default()).unwrap();
    assert_eq!(
        result.status(),
        Some(expected),
        "wrong verdict for `{}`",
        formula
    );
}

/// Build the game for the given formula without solving it.
fn game_text(formula: &str) -> String {
    let options = CheckOptions {
        output_format: OutputFormat::Pg,
        ..CheckOptions::default()
    };
    let result = check_with(formula, &options).unwrap();
    result.game().expect("game text requested").to_owned()
}

#[test]
fn literals() {
    if !external_tools_available("literals") {
        return;
    }
    verify_satisfiability("true", Satisfiable);
    verify_satisfiability("false", Unsatisfiable);
}

#[test]
fn propositional_contradiction() {
    if !external_tools_available("propositional_contradiction") {
        return;
    }
    verify_satisfiability("p && !p", Unsatisfiable);
    verify_satisfiability("p || !p", Satisfiable);
}

#[test]
fn plain_fixpoints() {
    if !external_tools_available("plain_fixpoints") {
        return;
    }
    // the least fixpoint of the identity is ⊥, the greatest is ⊤
    verify_satisfiability("mu X. X", Unsatisfiable);
    verify_satisfiability("nu X. X", Satisfiable);
}

#[test]
fn recursive_modalities() {
    if !external_tools_available("recursive_modalities") {
        return;
    }
    // an infinite p-path
    verify_satisfiability("nu X. (p && < > X)", Satisfiable);
    // p holds somewhere reachable
    verify_satisfiability("mu X. (p || < > X)", Satisfiable);
}

#[test]
fn modal_conjunction() {
    if !external_tools_available("modal_conjunction") {
        return;
    }
    verify_satisfiability("(< > a) && ([ ] b)", Satisfiable);
}

#[test]
fn game_emission_is_idempotent() {
    if !external_tools_available("game_emission_is_idempotent") {
        return;
    }
    for formula in &["true", "mu X. (p || < > X)", "(< > a) && ([ ] b)"] {
        let text = game_text(formula);
        let reparsed = RawGame::parse(&text).unwrap();
        assert_eq!(reparsed.to_string(), text, "for `{}`", formula);
    }
}

#[test]
fn emitted_game_respects_the_grammar() {
    if !external_tools_available("emitted_game_respects_the_grammar") {
        return;
    }
    let text = game_text("nu X. (p && < > X)");
    let game = RawGame::parse(&text).unwrap();
    assert!(!game.nodes().is_empty());
    for (priority, player, successors) in game.nodes() {
        assert!(*player <= 1);
        assert!(*priority >= 1 || successors.len() == 1);
        assert!(!successors.is_empty());
    }
}

#[test]
fn verdict_written_by_the_driver() {
    if !external_tools_available("verdict_written_by_the_driver") {
        return;
    }
    // run the binary itself on a formula file
    let mut formula_file = tempfile::NamedTempFile::new().unwrap();
    write!(formula_file, "nu X. X").unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_musat"))
        .arg("-F")
        .arg(formula_file.path())
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "True");
}

#[test]
fn parse_errors_fail_the_driver() {
    let output = Command::new(env!("CARGO_BIN_EXE_musat"))
        .arg("-f")
        .arg("mu X. (p ||")
        .output()
        .unwrap();
    assert!(!output.status.success());
}
