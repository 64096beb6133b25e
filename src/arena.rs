//! The game arena over macro-states of the automaton.
//!
//! Positions are pairs of a set of automaton states and an optional
//! propositional letter. A position without a letter emits one letter per
//! assignment of the propositions in scope; a position with a letter
//! resolves local states through choice maps and finally takes a modal
//! step, dropping the letter again. Only the alphabet of the position
//! currently being expanded is materialized.

use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use itertools::Itertools;
use log::debug;

use crate::apta::{Apta, StateIndex};
use crate::constructor::ExplorationQueue;
use crate::formula::Formulas;
use crate::formula::Symbol;

/// A propositional letter: an assignment fixing the value of every
/// proposition in scope, sorted by proposition name.
pub type Letter = Vec<(Symbol, bool)>;

/// A local choice map, assigning every local-existential state of a
/// position one of its successors, sorted by state index.
pub type ChoiceMap = Vec<(StateIndex, StateIndex)>;

/// The type for an index of an arena position.
pub type PositionIndex = usize;

/// The label of an arena edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Move {
    /// Emission of a propositional letter.
    Letter(Letter),
    /// A local step resolving the choices of local-existential states.
    Choice(ChoiceMap),
    /// A modal step into the given existential state.
    Modal(StateIndex),
    /// A modal step taken when only universal states remain.
    Skip,
}

/// A position of the arena.
#[derive(Debug)]
pub struct Position {
    states: Vec<StateIndex>,
    symbol: Option<Letter>,
    diamond: bool,
    next: Vec<(Move, PositionIndex)>,
}

impl Position {
    /// The macro-state of the position, sorted ascending.
    pub fn states(&self) -> &[StateIndex] {
        &self.states
    }

    /// The letter the position has read, if any.
    pub fn symbol(&self) -> Option<&Letter> {
        self.symbol.as_ref()
    }

    /// Returns true if the position belongs to the existential player.
    pub fn is_diamond(&self) -> bool {
        self.diamond
    }

    /// The labelled out-edges of the position, in emission order.
    pub fn next(&self) -> &[(Move, PositionIndex)] {
        &self.next
    }
}

/// The emptiness game arena of an automaton.
pub struct Arena {
    positions: Vec<Position>,
    position_map: HashMap<(Vec<StateIndex>, Option<Letter>), PositionIndex>,
    d_choices: BTreeSet<ChoiceMap>,
}

impl Arena {
    /// Builds the arena reachable from the position `({initial}, ∅)`,
    /// which always receives index 0.
    pub fn of<Q: ExplorationQueue<PositionIndex>>(
        formulas: &Formulas,
        apta: &Apta,
        initial: StateIndex,
        mut queue: Q,
    ) -> Self {
        let mut arena = Self {
            positions: Vec::new(),
            position_map: HashMap::new(),
            d_choices: BTreeSet::new(),
        };
        arena.position(apta, vec![initial], None, &mut queue);
        while let Some(index) = queue.pop() {
            arena.expand(formulas, apta, index, &mut queue);
        }
        debug!(
            "arena has {} positions and {} choice maps",
            arena.positions.len(),
            arena.d_choices.len()
        );
        arena
    }

    /// The positions of the arena.
    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    /// Number of positions.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns true if the arena has no positions.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// The non-empty choice maps recorded during expansion.
    pub fn d_choices(&self) -> &BTreeSet<ChoiceMap> {
        &self.d_choices
    }

    /// Returns the index of a position, creating and enqueueing it if it
    /// does not exist yet.
    fn position<Q: ExplorationQueue<PositionIndex>>(
        &mut self,
        apta: &Apta,
        states: Vec<StateIndex>,
        symbol: Option<Letter>,
        queue: &mut Q,
    ) -> PositionIndex {
        debug_assert!(!states.is_empty());
        match self.position_map.entry((states, symbol)) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let (states, symbol) = entry.key();
                let diamond =
                    symbol.is_none() || states.iter().any(|&q| apta.states()[q].local());
                let position = Position {
                    states: states.clone(),
                    symbol: symbol.clone(),
                    diamond,
                    next: Vec::new(),
                };
                let index = self.positions.len();
                self.positions.push(position);
                entry.insert(index);
                queue.push(index);
                index
            }
        }
    }

    fn add_edge<Q: ExplorationQueue<PositionIndex>>(
        &mut self,
        apta: &Apta,
        from: PositionIndex,
        label: Move,
        states: Vec<StateIndex>,
        symbol: Option<Letter>,
        queue: &mut Q,
    ) {
        let target = self.position(apta, states, symbol, queue);
        self.positions[from].next.push((label, target));
    }

    fn expand<Q: ExplorationQueue<PositionIndex>>(
        &mut self,
        formulas: &Formulas,
        apta: &Apta,
        index: PositionIndex,
        queue: &mut Q,
    ) {
        let states = self.positions[index].states.clone();
        let symbol = self.positions[index].symbol.clone();

        let sigma = match symbol {
            None => {
                // emit one letter per assignment of the propositions in scope
                for letter in alphabet(formulas, apta, &states) {
                    self.add_edge(
                        apta,
                        index,
                        Move::Letter(letter.clone()),
                        states.clone(),
                        Some(letter),
                        queue,
                    );
                }
                return;
            }
            Some(sigma) => sigma,
        };

        if states.iter().any(|&q| apta.states()[q].local()) {
            // resolve the choices of the local-existential states
            let existentials: Vec<StateIndex> = states
                .iter()
                .copied()
                .filter(|&q| apta.states()[q].local() && apta.states()[q].existential())
                .collect();
            let choices: Vec<Vec<StateIndex>> = existentials
                .iter()
                .map(|&q| apta.states()[q].all_successors().collect())
                .collect();
            for combination in all_combinations(&choices) {
                let d: ChoiceMap = existentials.iter().copied().zip(combination).collect();
                if !d.is_empty() {
                    self.d_choices.insert(d.clone());
                }
                let successor = update_local(apta, &states, &sigma, &d);
                self.add_edge(
                    apta,
                    index,
                    Move::Choice(d),
                    successor,
                    Some(sigma.clone()),
                    queue,
                );
            }
        } else {
            let existentials: Vec<StateIndex> = states
                .iter()
                .copied()
                .filter(|&q| apta.states()[q].existential())
                .collect();
            if existentials.is_empty() {
                // all universal: one representative step
                let representative = states[0];
                let successor = update_modal(apta, &states, representative);
                self.add_edge(apta, index, Move::Skip, successor, None, queue);
            } else {
                for q in existentials {
                    let successor = update_modal(apta, &states, q);
                    self.add_edge(apta, index, Move::Modal(q), successor, None, queue);
                }
            }
        }
    }
}

/// Enumerates all ways of picking one element from each of the given
/// vectors. A single empty combination is produced when there is nothing
/// to pick from.
fn all_combinations(choices: &[Vec<StateIndex>]) -> Vec<Vec<StateIndex>> {
    if choices.is_empty() {
        return vec![Vec::new()];
    }
    choices
        .iter()
        .map(|c| c.iter().copied())
        .multi_cartesian_product()
        .collect()
}

/// The alphabet of a position: one letter per assignment of the
/// propositions appearing in the subformulae of its states, enumerated
/// with the last proposition toggling fastest.
fn alphabet(formulas: &Formulas, apta: &Apta, states: &[StateIndex]) -> Vec<Letter> {
    let mut props: Vec<Symbol> = states
        .iter()
        .flat_map(|&q| formulas.propositions(apta.states()[q].value()))
        .collect();
    props.sort_by(|&a, &b| formulas.name(a).cmp(formulas.name(b)));
    props.dedup();

    if props.is_empty() {
        return vec![Vec::new()];
    }
    props
        .iter()
        .map(|_| [false, true].iter().copied())
        .multi_cartesian_product()
        .map(|values| props.iter().copied().zip(values).collect())
        .collect()
}

/// The local update of a macro-state: existential states follow their
/// choice in `d`, universal states follow every transition enabled under
/// `sigma`, modal states pass through unchanged.
fn update_local(
    apta: &Apta,
    states: &[StateIndex],
    sigma: &Letter,
    d: &ChoiceMap,
) -> Vec<StateIndex> {
    let mut successor = BTreeSet::new();
    for &q in states {
        let state = &apta.states()[q];
        if !state.local() {
            successor.insert(q);
            continue;
        }
        if state.existential() {
            if let Ok(pos) = d.binary_search_by_key(&q, |&(p, _)| p) {
                successor.insert(d[pos].1);
            }
        } else {
            for (label, targets) in state.next() {
                let enabled = match label {
                    None => true,
                    Some((p, b)) => sigma.iter().any(|&(sp, sb)| sp == *p && sb == *b),
                };
                if enabled {
                    successor.extend(targets.iter().copied());
                }
            }
        }
    }
    successor.into_iter().collect()
}

/// The modal update of a macro-state for the chosen state `q`: all
/// successors of `q` plus the successors of every other universal state.
/// Existential modal states other than `q` are dropped on this branch.
fn update_modal(apta: &Apta, states: &[StateIndex], q: StateIndex) -> Vec<StateIndex> {
    let mut successor: BTreeSet<StateIndex> = apta.states()[q].all_successors().collect();
    for &other in states {
        if other != q && !apta.states()[other].existential() {
            successor.extend(apta.states()[other].all_successors());
        }
    }
    successor.into_iter().collect()
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Move::Letter(letter) => {
                write!(f, "σ{{")?;
                for (i, (p, b)) in letter.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{:?}={}", p, b)?;
                }
                write!(f, "}}")
            }
            Move::Choice(d) => {
                write!(f, "d{{")?;
                for (i, (q, target)) in d.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}→{}", q, target)?;
                }
                write!(f, "}}")
            }
            Move::Modal(q) => write!(f, "q{}", q),
            Move::Skip => write!(f, "∅"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apta::Apta;
    use crate::constructor::BfsQueue;
    use crate::formula::parser::parse;

    fn build(input: &str) -> (Formulas, Apta, Arena) {
        let mut formulas = Formulas::new();
        let root = parse(&mut formulas, input).unwrap();
        let apta = Apta::of(&mut formulas, root);
        let arena = Arena::of(&formulas, &apta, 0, BfsQueue::with_capacity(64));
        (formulas, apta, arena)
    }

    #[test]
    fn initial_position_is_the_singleton_of_the_root() {
        let (_, _, arena) = build("nu X. (p && < > X)");
        let initial = &arena.positions()[0];
        assert_eq!(initial.states(), &[0]);
        assert_eq!(initial.symbol(), None);
        assert!(initial.is_diamond());
    }

    #[test]
    fn unread_positions_enumerate_the_full_alphabet() {
        let (_, _, arena) = build("(a && b) || (a && c)");
        let initial = &arena.positions()[0];
        // three propositions in scope, eight letters, each exactly once
        assert_eq!(initial.next().len(), 8);
        let mut seen = BTreeSet::new();
        for (label, _) in initial.next() {
            match label {
                Move::Letter(letter) => {
                    assert_eq!(letter.len(), 3);
                    assert!(seen.insert(letter.clone()));
                }
                other => panic!("expected a letter, found {}", other),
            }
        }
    }

    #[test]
    fn every_position_is_reachable_from_the_initial_one() {
        let (_, _, arena) = build("mu X. (p || < > X)");
        let mut reached = vec![false; arena.len()];
        let mut pending = vec![0];
        reached[0] = true;
        while let Some(v) = pending.pop() {
            for &(_, w) in arena.positions()[v].next() {
                if !reached[w] {
                    reached[w] = true;
                    pending.push(w);
                }
            }
        }
        assert!(reached.iter().all(|&r| r));
    }

    #[test]
    fn local_steps_record_their_choice_maps() {
        let (_, apta, arena) = build("p || q");
        // the root is an Or state, so every local step resolves its choice
        assert!(apta.states()[0].existential());
        assert!(!arena.d_choices().is_empty());
        for d in arena.d_choices() {
            assert_eq!(d.len(), 1);
            assert_eq!(d[0].0, 0);
        }
    }

    #[test]
    fn modal_steps_drop_competing_existential_states() {
        let (_, apta, arena) = build("(< > a) && ([ ] b)");
        // find a position whose states are exactly the two modal states
        let dia = apta
            .states()
            .iter()
            .position(|s| !s.local() && s.existential())
            .unwrap();
        let boxed = apta
            .states()
            .iter()
            .position(|s| !s.local() && !s.existential())
            .unwrap();
        let modal_pos = arena
            .positions()
            .iter()
            .find(|p| p.states() == [dia.min(boxed), dia.max(boxed)] && p.symbol().is_some())
            .expect("modal position not built");
        assert!(!modal_pos.is_diamond());
        // the only existential modal state is chosen; the box state tags along
        assert_eq!(modal_pos.next().len(), 1);
        match &modal_pos.next()[0] {
            (Move::Modal(q), target) => {
                assert_eq!(*q, dia);
                let target = &arena.positions()[*target];
                assert_eq!(target.symbol(), None);
                // successors of both modal states are carried over
                assert_eq!(target.states().len(), 2);
            }
            (other, _) => panic!("expected a modal move, found {}", other),
        }
    }

    #[test]
    fn all_universal_positions_take_a_representative_step() {
        let (_, apta, arena) = build("[ ] p");
        let boxed = 0;
        assert!(!apta.states()[boxed].local());
        assert!(!apta.states()[boxed].existential());
        let modal_pos = arena
            .positions()
            .iter()
            .find(|p| p.states() == [boxed] && p.symbol().is_some())
            .expect("modal position not built");
        assert_eq!(modal_pos.next().len(), 1);
        assert!(matches!(modal_pos.next()[0].0, Move::Skip));
    }
}
