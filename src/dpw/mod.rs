//! Determinization of the tracking automaton into a deterministic parity
//! word automaton.
//!
//! The tracking labels are encoded as conjunctions of literals over the
//! atomic propositions of the formula, a block of control variables
//! `_u0.._uK-1` and one variable `_is_choice`; the boolean-labelled
//! automaton is handed to an external determinizer in HOA text, and the
//! deterministic result is decoded back into tracking labels.

mod hoa;

use std::collections::HashMap;
use std::io::Write;
use std::process::{Command, Stdio};

use log::{debug, info, trace};

use crate::apta::{Apta, StateIndex};
use crate::formula::{Formulas, Symbol};
use crate::tracking::{Label, TrackingAutomaton, TrackingState};
use crate::Error;

pub(crate) use hoa::Cube;

/// The role of one boolean label variable.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum VarRole {
    /// An atomic proposition of the formula.
    Prop(Symbol),
    /// Control variable `_u<k>`.
    Control(usize),
    /// Control variable `_is_choice`.
    IsChoice,
}

/// Translates tracking labels to boolean cubes and back.
///
/// Local-existential states with more than one successor are assigned one
/// control variable each; modal-existential states are numbered and their
/// rank is encoded in binary, most significant bit on `_u0`.
pub struct LabelEncoder {
    aps: Vec<Symbol>,
    ap_index: HashMap<Symbol, usize>,
    local_ex_states: Vec<StateIndex>,
    local_ex_rank: HashMap<StateIndex, usize>,
    local_children: Vec<Vec<StateIndex>>,
    modal_ex_states: Vec<StateIndex>,
    modal_ex_rank: HashMap<StateIndex, usize>,
    state_bits: usize,
    control_bits: usize,
}

impl LabelEncoder {
    /// Sets up the encoding for the given automaton.
    pub fn new(formulas: &Formulas, apta: &Apta) -> Self {
        let aps = formulas.propositions(apta.states()[0].value());
        let ap_index = aps.iter().enumerate().map(|(i, &p)| (p, i)).collect();

        let local_ex_states: Vec<StateIndex> = apta
            .states()
            .iter()
            .enumerate()
            .filter(|(_, s)| s.local() && s.existential() && s.successor_count() > 1)
            .map(|(q, _)| q)
            .collect();
        let local_ex_rank = local_ex_states
            .iter()
            .enumerate()
            .map(|(k, &q)| (q, k))
            .collect();
        let local_children = local_ex_states
            .iter()
            .map(|&q| apta.states()[q].all_successors().collect())
            .collect();

        let modal_ex_states: Vec<StateIndex> = apta
            .states()
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.local() && s.existential())
            .map(|(q, _)| q)
            .collect();
        let modal_ex_rank = modal_ex_states
            .iter()
            .enumerate()
            .map(|(k, &q)| (q, k))
            .collect();

        // one bit is always spent when a modal-existential state exists,
        // so that a constrained _u0 stays distinguishable from an
        // unconstrained one
        let state_bits = match modal_ex_states.len() {
            0 => 0,
            m => (usize::BITS - (m - 1).leading_zeros()).max(1) as usize,
        };
        let control_bits = local_ex_states.len().max(state_bits);

        Self {
            aps,
            ap_index,
            local_ex_states,
            local_ex_rank,
            local_children,
            modal_ex_states,
            modal_ex_rank,
            state_bits,
            control_bits,
        }
    }

    /// The names of all label variables: atomic propositions first, then
    /// the control variables, then `_is_choice`.
    pub fn variable_names(&self, formulas: &Formulas) -> Vec<String> {
        let mut names: Vec<String> = self
            .aps
            .iter()
            .map(|&p| formulas.name(p).to_owned())
            .collect();
        for k in 0..self.control_bits {
            names.push(format!("_u{}", k));
        }
        names.push("_is_choice".to_owned());
        names
    }

    fn control_var(&self, k: usize) -> usize {
        self.aps.len() + k
    }

    fn is_choice_var(&self) -> usize {
        self.aps.len() + self.control_bits
    }

    /// Encodes a label as a conjunction of literals.
    pub(crate) fn encode(&self, label: &Label) -> Cube {
        let mut cube: Cube = label
            .aprops()
            .iter()
            .map(|&(p, b)| (self.ap_index[&p], b))
            .collect();
        match label {
            Label::Any { .. } => (),
            Label::State { extra, .. } => {
                cube.push((self.is_choice_var(), false));
                if let Some(q) = extra {
                    let rank = self.modal_ex_rank[q];
                    for k in 0..self.state_bits {
                        let bit = rank >> (self.state_bits - 1 - k) & 1;
                        cube.push((self.control_var(k), bit != 0));
                    }
                }
            }
            Label::Choice { extra, .. } => {
                cube.push((self.is_choice_var(), true));
                for (q, target) in extra {
                    if let Some(&k) = self.local_ex_rank.get(q) {
                        let second = *target != self.local_children[k][0];
                        cube.push((self.control_var(k), second));
                    }
                }
            }
        }
        cube.sort_unstable_by_key(|&(v, _)| v);
        cube
    }

    /// Resolves the variables of a determinizer output header to their
    /// roles. The determinizer may reorder variables or drop unused ones,
    /// but it must preserve their names.
    ///
    /// # Panics
    ///
    /// Panics if a variable name was not registered by the encoding; the
    /// external tool must not invent variables.
    fn roles(&self, formulas: &Formulas, names: &[String]) -> Vec<VarRole> {
        names
            .iter()
            .map(|name| {
                if name == "_is_choice" {
                    return VarRole::IsChoice;
                }
                if let Some(Ok(k)) = name.strip_prefix("_u").map(str::parse::<usize>) {
                    if k < self.control_bits {
                        return VarRole::Control(k);
                    }
                    panic!("unexpected control variable `{}` in determinizer output", name);
                }
                match self.aps.iter().find(|&&p| formulas.name(p) == name) {
                    Some(&p) => VarRole::Prop(p),
                    None => panic!("unexpected variable `{}` in determinizer output", name),
                }
            })
            .collect()
    }

    /// Decodes a cube back into a label. Returns `None` for cubes that
    /// encode no reachable label (the determinizer is free to emit them
    /// on letters that never occur).
    fn decode(&self, formulas: &Formulas, cube: &Cube, roles: &[VarRole]) -> Option<Label> {
        let mut aprops = Vec::new();
        let mut controls = vec![None; self.control_bits];
        let mut is_choice = None;

        for &(var, value) in cube {
            match roles.get(var) {
                Some(&VarRole::Prop(p)) => aprops.push((p, value)),
                Some(&VarRole::Control(k)) => controls[k] = Some(value),
                Some(&VarRole::IsChoice) => is_choice = Some(value),
                None => panic!("literal over unregistered variable {} in a cube", var),
            }
        }
        aprops.sort_by(|&(a, _), &(b, _)| formulas.name(a).cmp(formulas.name(b)));

        let label = match is_choice {
            None => Label::Any { aprops },
            Some(true) => {
                let mut extra = Vec::new();
                for (k, &q) in self.local_ex_states.iter().enumerate() {
                    if let Some(second) = controls[k] {
                        extra.push((q, self.local_children[k][second as usize]));
                    }
                }
                Label::Choice { extra, aprops }
            }
            Some(false) => {
                let extra = if self.state_bits == 0 || controls[0].is_none() {
                    None
                } else {
                    let mut rank = 0;
                    for &bit in controls.iter().take(self.state_bits) {
                        rank = rank << 1 | bit.unwrap_or(false) as usize;
                    }
                    match self.modal_ex_states.get(rank) {
                        Some(&q) => Some(q),
                        // a code with no modal state behind it
                        None => return None,
                    }
                };
                Label::State { extra, aprops }
            }
        };
        Some(label)
    }
}

/// Builds the boolean-labelled rendering of the tracking automaton:
/// a priority and a cube-labelled edge list per state.
fn boolean_states(
    encoder: &LabelEncoder,
    npa: &TrackingAutomaton,
) -> Vec<(usize, Vec<(Cube, usize)>)> {
    npa.states()
        .iter()
        .map(|state| {
            let mut edges = Vec::new();
            for (label, targets) in state.next() {
                let cube = encoder.encode(label);
                for &target in targets {
                    edges.push((cube.clone(), target));
                }
            }
            (state.priority(), edges)
        })
        .collect()
}

/// Runs the external determinizer command over the boolean rendering of
/// `npa` and decodes the deterministic result.
///
/// The command is run through `sh -c` with the HOA text on stdin; it must
/// write a deterministic, colored, parity max even automaton in HOA text
/// on stdout (state-based acceptance preferred, uniform edge colours
/// accepted).
pub fn determinize(
    formulas: &Formulas,
    apta: &Apta,
    npa: &TrackingAutomaton,
    command: &str,
) -> Result<TrackingAutomaton, Error> {
    const TOOL: &str = "determinizer";

    let encoder = LabelEncoder::new(formulas, apta);
    let states = boolean_states(&encoder, npa);
    let names = encoder.variable_names(formulas);
    let num_colors = npa.max_priority() + 1;

    let mut input = Vec::new();
    hoa::write_automaton(&mut input, &names, num_colors, &states)
        .expect("writing to a vector cannot fail");

    info!("determinizing the tracking automaton with `{}`", command);
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
        .write_all(&input)
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

    let text = String::from_utf8_lossy(&output.stdout);
    let parsed = hoa::parse_automaton(&text).map_err(|message| Error::ToolOutput {
        tool: TOOL,
        message,
    })?;
    debug!("determinized automaton has {} states", parsed.states.len());

    decode_automaton(formulas, &encoder, parsed).map_err(|message| Error::ToolOutput {
        tool: TOOL,
        message,
    })
}

/// Decodes a parsed determinizer output into the tracking carrier type.
/// States are renumbered so that the initial state has index 0.
fn decode_automaton(
    formulas: &Formulas,
    encoder: &LabelEncoder,
    parsed: hoa::HoaAutomaton,
) -> Result<TrackingAutomaton, String> {
    let roles = encoder.roles(formulas, &parsed.aps);
    let renumber = |index: usize| -> usize {
        // swap the initial state to the front
        if index == parsed.start {
            0
        } else if index == 0 {
            parsed.start
        } else {
            index
        }
    };

    let mut states: Vec<TrackingState> = Vec::with_capacity(parsed.states.len());
    for index in 0..parsed.states.len() {
        let source = &parsed.states[renumber(index)];
        let color = source
            .color
            .or_else(|| source.edges.iter().find_map(|&(_, _, acc)| acc))
            .ok_or_else(|| format!("state {} of the output carries no colour", index))?;
        let mut state = TrackingState::new(color);
        for (cond, target, _) in &source.edges {
            for cube in cond.cubes() {
                if let Some(label) = encoder.decode(formulas, &cube, &roles) {
                    state.add_transition(label, Some(renumber(*target)));
                } else {
                    trace!("dropping an edge over an unused code");
                }
            }
        }
        states.push(state);
    }
    Ok(TrackingAutomaton::from_states(states))
}

/// Writes the automaton in GraphViz format, for diagnostics.
pub fn write_dot<W: Write>(writer: &mut W, automaton: &TrackingAutomaton) -> std::io::Result<()> {
    writeln!(writer, "digraph tracking {{")?;
    writeln!(writer, "  rankdir=LR;")?;
    for (index, state) in automaton.states().iter().enumerate() {
        writeln!(
            writer,
            "  q{} [label=\"q{} ({})\"];",
            index,
            index,
            state.priority()
        )?;
        for (label, targets) in state.next() {
            for target in targets {
                writeln!(writer, "  q{} -> q{} [label=\"{}\"];", index, target, label)?;
            }
        }
    }
    writeln!(writer, "}}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::parser::parse;

    fn encoder_for(input: &str) -> (Formulas, Apta, LabelEncoder) {
        let mut formulas = Formulas::new();
        let root = parse(&mut formulas, input).unwrap();
        let apta = Apta::of(&mut formulas, root);
        let encoder = LabelEncoder::new(&formulas, &apta);
        (formulas, apta, encoder)
    }

    fn round_trip(formulas: &Formulas, encoder: &LabelEncoder, label: Label) -> Label {
        let names = encoder.variable_names(formulas);
        let roles = encoder.roles(formulas, &names);
        let cube = encoder.encode(&label);
        encoder.decode(formulas, &cube, &roles).unwrap()
    }

    #[test]
    fn control_variable_count() {
        // one disjunction with two successors, one diamond state
        let (_, _, encoder) = encoder_for("(p || q) && < > p");
        assert_eq!(encoder.local_ex_states.len(), 1);
        assert_eq!(encoder.modal_ex_states.len(), 1);
        assert_eq!(encoder.state_bits, 1);
        assert_eq!(encoder.control_bits, 1);
    }

    #[test]
    fn any_labels_round_trip() {
        let (formulas, apta, encoder) = encoder_for("p && q");
        let p = formulas.propositions(apta.states()[0].value())[0];
        let label = Label::Any {
            aprops: vec![(p, true)],
        };
        assert_eq!(round_trip(&formulas, &encoder, label.clone()), label);
        assert_eq!(
            round_trip(&formulas, &encoder, Label::any()),
            Label::any()
        );
    }

    #[test]
    fn choice_labels_round_trip() {
        let (formulas, _, encoder) = encoder_for("p || q");
        assert_eq!(
            round_trip(&formulas, &encoder, Label::choice()),
            Label::choice()
        );
        // both children of the disjunction are recoverable
        let q = encoder.local_ex_states[0];
        for &child in &encoder.local_children[0] {
            let label = Label::Choice {
                extra: vec![(q, child)],
                aprops: Vec::new(),
            };
            assert_eq!(round_trip(&formulas, &encoder, label.clone()), label);
        }
    }

    #[test]
    fn state_labels_round_trip() {
        let (formulas, _, encoder) = encoder_for("(< > a) && (< > b)");
        assert_eq!(encoder.modal_ex_states.len(), 2);
        let unconstrained = Label::State {
            extra: None,
            aprops: Vec::new(),
        };
        assert_eq!(
            round_trip(&formulas, &encoder, unconstrained.clone()),
            unconstrained
        );
        for &q in &encoder.modal_ex_states {
            let label = Label::State {
                extra: Some(q),
                aprops: Vec::new(),
            };
            assert_eq!(round_trip(&formulas, &encoder, label.clone()), label);
        }
    }

    #[test]
    fn decoding_survives_reordered_variables() {
        let (formulas, _, encoder) = encoder_for("(p || q) && < > p");
        let mut names = encoder.variable_names(&formulas);
        names.reverse();
        let roles = encoder.roles(&formulas, &names);
        // _is_choice is now variable 0
        let label = encoder
            .decode(&formulas, &vec![(0, true)], &roles)
            .unwrap();
        assert_eq!(label, Label::choice());
    }

    #[test]
    #[should_panic(expected = "unexpected variable")]
    fn unknown_variables_are_fatal() {
        let (formulas, _, encoder) = encoder_for("p");
        encoder.roles(&formulas, &["mystery".to_owned()]);
    }

    #[test]
    fn boolean_rendering_covers_all_transitions() {
        let (_, apta, encoder) = encoder_for("mu X. (p || < > X)");
        let npa = TrackingAutomaton::of(&apta);
        let states = boolean_states(&encoder, &npa);
        assert_eq!(states.len(), npa.len());
        for ((priority, edges), state) in states.iter().zip(npa.states()) {
            assert_eq!(*priority, state.priority());
            let expected: usize = state.next().iter().map(|(_, t)| t.len()).sum();
            assert_eq!(edges.len(), expected);
        }
    }
}
