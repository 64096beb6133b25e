//! The tracking automaton: a nondeterministic parity word automaton whose
//! letters are the steps of the game arena.
//!
//! States are in one-to-one correspondence with automaton states; the
//! tracked state follows the choices recorded in the word. The same
//! carrier type holds the determinized automaton after the round trip
//! through the external determinizer (see [`crate::dpw`]).

use std::fmt;

use crate::apta::{Apta, StateIndex};
use crate::formula::Symbol;

/// Constraints a label puts on the atomic propositions of the letter,
/// sorted by proposition name.
pub type Aprops = Vec<(Symbol, bool)>;

/// A letter of the tracking automaton.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Label {
    /// Matches any step satisfying the propositional constraints.
    Any {
        /// Propositional constraints.
        aprops: Aprops,
    },
    /// Matches a local step; `extra` records which local-existential
    /// state chose which successor (empty: no constraint on the choice).
    Choice {
        /// The recorded choices.
        extra: Vec<(StateIndex, StateIndex)>,
        /// Propositional constraints.
        aprops: Aprops,
    },
    /// Matches a modal step; `extra` is the chosen existential state, or
    /// `None` for any modal target.
    State {
        /// The chosen existential state, if constrained.
        extra: Option<StateIndex>,
        /// Propositional constraints.
        aprops: Aprops,
    },
}

impl Label {
    /// An unconstrained ANY label.
    pub fn any() -> Self {
        Label::Any { aprops: Vec::new() }
    }

    /// An unconstrained CHOICE label.
    pub fn choice() -> Self {
        Label::Choice {
            extra: Vec::new(),
            aprops: Vec::new(),
        }
    }

    /// The propositional constraints of the label.
    pub fn aprops(&self) -> &Aprops {
        match self {
            Label::Any { aprops } | Label::Choice { aprops, .. } | Label::State { aprops, .. } => {
                aprops
            }
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let aprops = self.aprops();
        match self {
            Label::Any { .. } => write!(f, "ANY")?,
            Label::Choice { extra, .. } => {
                write!(f, "CHOICE(")?;
                for (i, (q, target)) in extra.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}→{}", q, target)?;
                }
                write!(f, ")")?;
            }
            Label::State { extra, .. } => {
                write!(f, "STATE(")?;
                if let Some(q) = extra {
                    write!(f, "{}", q)?;
                }
                write!(f, ")")?;
            }
        }
        if !aprops.is_empty() {
            write!(f, "[")?;
            for (i, (p, b)) in aprops.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{}{:?}", if *b { "" } else { "!" }, p)?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}

/// A state of the tracking automaton.
#[derive(Debug)]
pub struct TrackingState {
    priority: usize,
    next: Vec<(Label, Vec<StateIndex>)>,
}

impl TrackingState {
    pub(crate) fn new(priority: usize) -> Self {
        Self {
            priority,
            next: Vec::new(),
        }
    }

    /// The parity priority of the state.
    pub fn priority(&self) -> usize {
        self.priority
    }

    /// The labelled transition table of the state.
    pub fn next(&self) -> &[(Label, Vec<StateIndex>)] {
        &self.next
    }

    /// Adds the targets under the given label, merging with an existing
    /// equal label and keeping the target set sorted.
    pub(crate) fn add_transition<I: IntoIterator<Item = StateIndex>>(
        &mut self,
        label: Label,
        targets: I,
    ) {
        let entry = match self.next.iter_mut().find(|(l, _)| *l == label) {
            Some((_, entry)) => entry,
            None => {
                self.next.push((label, Vec::new()));
                &mut self.next.last_mut().unwrap().1
            }
        };
        for target in targets {
            if let Err(pos) = entry.binary_search(&target) {
                entry.insert(pos, target);
            }
        }
    }
}

/// A parity word automaton over arena steps. Nondeterministic when built
/// from the automaton, deterministic after the determinization round trip.
#[derive(Debug)]
pub struct TrackingAutomaton {
    states: Vec<TrackingState>,
}

impl TrackingAutomaton {
    /// Builds the tracking automaton of an automaton. Tracking states are
    /// indexed like the automaton states; state `q` has priority Ω(q)+1.
    pub fn of(apta: &Apta) -> Self {
        let mut states: Vec<TrackingState> = apta
            .states()
            .iter()
            .map(|state| TrackingState::new(state.priority() + 1))
            .collect();
        for (q, state) in apta.states().iter().enumerate() {
            let tracking = &mut states[q];
            match (state.local(), state.existential()) {
                // Q∨: one CHOICE edge per successor, recording the choice
                (true, true) => {
                    for (_, targets) in state.next() {
                        for &target in targets.iter() {
                            let label = Label::Choice {
                                extra: vec![(q, target)],
                                aprops: Vec::new(),
                            };
                            tracking.add_transition(label, Some(target));
                        }
                    }
                }
                // Q∧: ANY edges constrained by the propositional label
                (true, false) => {
                    for (label, targets) in state.next() {
                        let label = match label {
                            Some((p, b)) => Label::Any {
                                aprops: vec![(*p, *b)],
                            },
                            None => Label::any(),
                        };
                        tracking.add_transition(label, targets.iter().copied());
                    }
                }
                // Q□: follow any modal target, or wait out a local step
                (false, false) => {
                    for (_, targets) in state.next() {
                        let label = Label::State {
                            extra: None,
                            aprops: Vec::new(),
                        };
                        tracking.add_transition(label, targets.iter().copied());
                    }
                    tracking.add_transition(Label::choice(), Some(q));
                }
                // Q◇: follow the own modal step, or wait out a local step
                (false, true) => {
                    for (_, targets) in state.next() {
                        let label = Label::State {
                            extra: Some(q),
                            aprops: Vec::new(),
                        };
                        tracking.add_transition(label, targets.iter().copied());
                    }
                    tracking.add_transition(Label::choice(), Some(q));
                }
            }
        }
        Self { states }
    }

    pub(crate) fn from_states(states: Vec<TrackingState>) -> Self {
        Self { states }
    }

    /// The states of the automaton.
    pub fn states(&self) -> &[TrackingState] {
        &self.states
    }

    /// Number of states.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Returns true if the automaton has no states.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// The maximum priority over all states.
    pub fn max_priority(&self) -> usize {
        self.states
            .iter()
            .map(TrackingState::priority)
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::parser::parse;
    use crate::formula::Formulas;

    fn build(input: &str) -> (Apta, TrackingAutomaton) {
        let mut formulas = Formulas::new();
        let root = parse(&mut formulas, input).unwrap();
        let apta = Apta::of(&mut formulas, root);
        let tracking = TrackingAutomaton::of(&apta);
        (apta, tracking)
    }

    #[test]
    fn priorities_are_shifted_by_one() {
        let (apta, tracking) = build("mu X. (p || < > X)");
        for (state, track) in apta.states().iter().zip(tracking.states()) {
            assert_eq!(track.priority(), state.priority() + 1);
        }
    }

    #[test]
    fn disjunctions_record_their_choices() {
        let (apta, tracking) = build("p || q");
        assert!(apta.states()[0].local() && apta.states()[0].existential());
        let track = &tracking.states()[0];
        assert_eq!(track.next().len(), 2);
        for (label, targets) in track.next() {
            match label {
                Label::Choice { extra, .. } => {
                    assert_eq!(extra.len(), 1);
                    assert_eq!(extra[0].0, 0);
                    assert_eq!(targets, &vec![extra[0].1]);
                }
                other => panic!("expected a choice label, found {}", other),
            }
        }
    }

    #[test]
    fn conjunctions_merge_unconditional_edges() {
        let (apta, tracking) = build("p && q");
        assert!(apta.states()[0].local() && !apta.states()[0].existential());
        let track = &tracking.states()[0];
        assert_eq!(track.next().len(), 1);
        let (label, targets) = &track.next()[0];
        assert_eq!(*label, Label::any());
        assert_eq!(targets.len(), 2);
    }

    #[test]
    fn propositions_constrain_the_letter() {
        let (_, tracking) = build("p");
        let track = &tracking.states()[0];
        assert_eq!(track.next().len(), 2);
        for (label, _) in track.next() {
            match label {
                Label::Any { aprops } => assert_eq!(aprops.len(), 1),
                other => panic!("expected an ANY label, found {}", other),
            }
        }
    }

    #[test]
    fn modal_states_wait_with_a_choice_self_loop() {
        let (apta, tracking) = build("(< > a) && ([ ] b)");
        for (q, state) in apta.states().iter().enumerate() {
            if state.local() {
                continue;
            }
            let track = &tracking.states()[q];
            // exactly one CHOICE self-loop
            let loops: Vec<_> = track
                .next()
                .iter()
                .filter(|(label, _)| matches!(label, Label::Choice { .. }))
                .collect();
            assert_eq!(loops.len(), 1);
            assert_eq!(loops[0].0, Label::choice());
            assert_eq!(loops[0].1, vec![q]);
            // plus one STATE transition carrying the successors
            let states: Vec<_> = track
                .next()
                .iter()
                .filter(|(label, _)| matches!(label, Label::State { .. }))
                .collect();
            assert_eq!(states.len(), 1);
            match states[0].0 {
                Label::State { extra, .. } => {
                    assert_eq!(extra.is_some(), state.existential());
                    if let Some(chosen) = extra {
                        assert_eq!(chosen, q);
                    }
                }
                _ => unreachable!(),
            }
        }
    }
}
