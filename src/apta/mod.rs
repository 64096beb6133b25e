//! Alternating parity tree automata over subformulae.
//!
//! States are (unfoldings of) subformulae of the input formula; interning
//! in the [`Formulas`] arena keeps the state set finite, since re-unfolding
//! a fixpoint folds back onto an already known formula.

mod scc;

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use tinyvec::TinyVec;

use crate::formula::{FormulaId, FormulaNode, Formulas, Symbol};

/// The type for an index of a state of the automaton.
pub type StateIndex = usize;

/// An edge label of the automaton: `None` for unconditional moves,
/// `Some((p, b))` for moves conditional on the value of a proposition.
pub type EdgeLabel = Option<(Symbol, bool)>;

/// The set of successors under one edge label.
pub type SuccessorSet = TinyVec<[StateIndex; 2]>;

/// A state of the automaton.
#[derive(Debug)]
pub struct State {
    value: FormulaId,
    local: bool,
    existential: bool,
    base_priority: usize,
    priority: usize,
    next: Vec<(EdgeLabel, SuccessorSet)>,
}

impl State {
    fn new(formulas: &Formulas, value: FormulaId) -> Self {
        let node = formulas.node(value);
        let local = matches!(
            node,
            FormulaNode::Lit(_)
                | FormulaNode::Prop(_)
                | FormulaNode::Neg(_)
                | FormulaNode::And(..)
                | FormulaNode::Or(..)
                | FormulaNode::Mu(..)
                | FormulaNode::Nu(..)
        );
        let existential = matches!(
            node,
            FormulaNode::Lit(false)
                | FormulaNode::Or(..)
                | FormulaNode::Mu(..)
                | FormulaNode::Nu(..)
                | FormulaNode::Dia(_)
        );
        let base_priority = match node {
            FormulaNode::Lit(b) => !b as usize,
            FormulaNode::Mu(..) | FormulaNode::Nu(..) => alternation_level(formulas, value),
            _ => 0,
        };
        Self {
            value,
            local,
            existential,
            base_priority,
            priority: 0,
            next: Vec::new(),
        }
    }

    /// The subformula this state stands for.
    pub fn value(&self) -> FormulaId {
        self.value
    }

    /// Returns true if the state is local (non-modal).
    pub fn local(&self) -> bool {
        self.local
    }

    /// Returns true if the state has existential polarity.
    pub fn existential(&self) -> bool {
        self.existential
    }

    /// The priority Ω′ read off the formula.
    pub fn base_priority(&self) -> usize {
        self.base_priority
    }

    /// The total priority Ω after SCC propagation.
    pub fn priority(&self) -> usize {
        self.priority
    }

    /// The labelled transition table of the state, in canonical order.
    pub fn next(&self) -> &[(EdgeLabel, SuccessorSet)] {
        &self.next
    }

    /// The total number of successors over all labels.
    pub fn successor_count(&self) -> usize {
        self.next.iter().map(|(_, targets)| targets.len()).sum()
    }

    /// Iterates over all successor indices of the state.
    pub fn all_successors(&self) -> impl Iterator<Item = StateIndex> + '_ {
        self.next.iter().flat_map(|(_, targets)| targets.iter().copied())
    }

    fn add_transition(&mut self, label: EdgeLabel, target: StateIndex) {
        let targets = match self.next.iter_mut().find(|(l, _)| *l == label) {
            Some((_, targets)) => targets,
            None => {
                self.next.push((label, SuccessorSet::default()));
                &mut self.next.last_mut().unwrap().1
            }
        };
        if let Err(pos) = targets.binary_search(&target) {
            targets.insert(pos, target);
        }
    }
}

/// An alternating parity tree automaton built from a formula.
#[derive(Debug)]
pub struct Apta {
    states: Vec<State>,
    state_map: HashMap<FormulaId, StateIndex>,
}

impl Apta {
    /// Builds the automaton of the given formula by worklist expansion
    /// and computes the total priorities.
    ///
    /// The root formula always receives state index 0.
    pub fn of(formulas: &mut Formulas, root: FormulaId) -> Self {
        let mut apta = Self {
            states: Vec::new(),
            state_map: HashMap::new(),
        };
        apta.state(formulas, root);
        let mut expanded = 0;
        while expanded < apta.states.len() {
            apta.expand(formulas, expanded);
            expanded += 1;
        }
        apta.propagate_priorities();
        apta
    }

    /// Returns the index of the state for a formula, creating it if the
    /// formula has not been seen before.
    pub fn state(&mut self, formulas: &Formulas, value: FormulaId) -> StateIndex {
        match self.state_map.entry(value) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let index = self.states.len();
                self.states.push(State::new(formulas, value));
                entry.insert(index);
                index
            }
        }
    }

    /// Looks up the state index of a formula without creating it.
    pub fn state_of(&self, value: FormulaId) -> Option<StateIndex> {
        self.state_map.get(&value).copied()
    }

    /// The states of the automaton.
    pub fn states(&self) -> &[State] {
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

    fn expand(&mut self, formulas: &mut Formulas, index: StateIndex) {
        let value = self.states[index].value;
        match formulas.node(value) {
            FormulaNode::And(f, g) | FormulaNode::Or(f, g) => {
                self.add_transition(formulas, index, None, f);
                self.add_transition(formulas, index, None, g);
            }
            FormulaNode::Dia(f) | FormulaNode::Box(f) => {
                self.add_transition(formulas, index, None, f);
            }
            FormulaNode::Mu(..) | FormulaNode::Nu(..) => {
                let unfolded = formulas.unfold(value);
                self.add_transition(formulas, index, None, unfolded);
            }
            FormulaNode::Prop(p) => {
                let tt = formulas.intern(FormulaNode::Lit(true));
                let ff = formulas.intern(FormulaNode::Lit(false));
                self.add_transition(formulas, index, Some((p, true)), tt);
                self.add_transition(formulas, index, Some((p, false)), ff);
            }
            FormulaNode::Neg(f) => {
                let p = match formulas.node(f) {
                    FormulaNode::Prop(p) => p,
                    node => panic!("negation of a non-proposition in the automaton: {:?}", node),
                };
                let tt = formulas.intern(FormulaNode::Lit(true));
                let ff = formulas.intern(FormulaNode::Lit(false));
                self.add_transition(formulas, index, Some((p, true)), ff);
                self.add_transition(formulas, index, Some((p, false)), tt);
            }
            FormulaNode::Lit(_) => {
                self.add_transition(formulas, index, None, value);
            }
            node @ FormulaNode::Var(_) => {
                panic!("unexpanded operator in the automaton: {:?}", node)
            }
        }
    }

    fn add_transition(
        &mut self,
        formulas: &Formulas,
        from: StateIndex,
        label: EdgeLabel,
        target: FormulaId,
    ) {
        let target = self.state(formulas, target);
        self.states[from].add_transition(label, target);
    }

    /// Assigns the total priority Ω: within every strongly connected
    /// component the maximum Ω′ of its members, except that singleton
    /// components without a self-loop get priority 0.
    fn propagate_priorities(&mut self) {
        let adjacency: Vec<Vec<StateIndex>> = self
            .states
            .iter()
            .map(|state| state.all_successors().collect())
            .collect();

        for component in scc::strongly_connected_components(&adjacency) {
            if let [q] = component[..] {
                if !adjacency[q].contains(&q) {
                    self.states[q].priority = 0;
                    continue;
                }
            }
            let max = component
                .iter()
                .map(|&q| self.states[q].base_priority)
                .max()
                .expect("empty component");
            for &q in &component {
                self.states[q].priority = max;
            }
        }
    }
}

/// Searches the principal subformula path for the next fixpoint binder.
fn next_fixpoint(formulas: &Formulas, formula: FormulaId) -> Option<FormulaId> {
    match formulas.node(formula) {
        FormulaNode::Mu(..) | FormulaNode::Nu(..) => Some(formula),
        FormulaNode::And(f, g) | FormulaNode::Or(f, g) => {
            next_fixpoint(formulas, f).or_else(|| next_fixpoint(formulas, g))
        }
        FormulaNode::Neg(f) | FormulaNode::Dia(f) | FormulaNode::Box(f) => {
            next_fixpoint(formulas, f)
        }
        FormulaNode::Lit(_) | FormulaNode::Prop(_) | FormulaNode::Var(_) => None,
    }
}

/// Counts the strict fixpoint alternations along the principal subformula
/// path of dependent binders.
pub fn alternation_depth(formulas: &Formulas, formula: FormulaId) -> usize {
    let outer = match next_fixpoint(formulas, formula) {
        Some(outer) => outer,
        None => return 0,
    };
    let (outer_mu, outer_var, outer_body) = match formulas.node(outer) {
        FormulaNode::Mu(x, f) => (true, x, f),
        FormulaNode::Nu(x, f) => (false, x, f),
        _ => unreachable!(),
    };
    match next_fixpoint(formulas, outer_body) {
        Some(inner) => {
            let (inner_mu, inner_body) = match formulas.node(inner) {
                FormulaNode::Mu(_, f) => (true, f),
                FormulaNode::Nu(_, f) => (false, f),
                _ => unreachable!(),
            };
            let appears = formulas.variable_occurs(outer_var, inner_body);
            let step = (appears && outer_mu != inner_mu) as usize;
            step + alternation_depth(formulas, inner)
        }
        None => formulas.variable_occurs(outer_var, outer_body) as usize,
    }
}

/// The priority a fixpoint state derives from its alternation depth:
/// odd for μ, even for ν. Non-fixpoint formulas have level 0.
pub fn alternation_level(formulas: &Formulas, formula: FormulaId) -> usize {
    let d = alternation_depth(formulas, formula);
    match formulas.node(formula) {
        FormulaNode::Mu(..) => 2 * ((d + 2) / 2) - 1,
        FormulaNode::Nu(..) => 2 * (d / 2),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::parser::parse;

    fn build(input: &str) -> (Formulas, Apta) {
        let mut formulas = Formulas::new();
        let root = parse(&mut formulas, input).unwrap();
        let apta = Apta::of(&mut formulas, root);
        (formulas, apta)
    }

    fn depth(input: &str) -> usize {
        let mut formulas = Formulas::new();
        let root = parse(&mut formulas, input).unwrap();
        alternation_depth(&formulas, root)
    }

    fn level(input: &str) -> usize {
        let mut formulas = Formulas::new();
        let root = parse(&mut formulas, input).unwrap();
        alternation_level(&formulas, root)
    }

    #[test]
    fn alternation_depth_counts_strict_alternations() {
        assert_eq!(depth("p"), 0);
        assert_eq!(depth("mu X. p"), 0);
        assert_eq!(depth("mu X. X"), 1);
        assert_eq!(depth("nu X. (p && < > X)"), 1);
        // same binder kind does not alternate
        assert_eq!(depth("mu X. mu Y. (X && Y)"), 1);
        assert_eq!(depth("mu X. nu Y. (X && Y)"), 2);
        assert_eq!(depth("mu X. nu Y. mu Z. ((X && Y) && Z)"), 3);
        // a strictly alternating nest of n dependent binders whose
        // innermost variable is vacuous has depth n - 1
        assert_eq!(depth("mu X. nu Y. mu Z. (X && Y)"), 2);
        // the inner binder does not depend on the outer one
        assert_eq!(depth("mu X. nu Y. Y"), 1);
    }

    #[test]
    fn alternation_level_is_odd_for_mu_and_even_for_nu() {
        assert_eq!(level("mu X. X"), 1);
        assert_eq!(level("nu X. X"), 0);
        assert_eq!(level("mu X. nu Y. (X && Y)"), 3);
        assert_eq!(level("nu X. mu Y. (X && Y)"), 2);
        assert_eq!(level("mu X. nu Y. mu Z. ((X && Y) && Z)"), 3);
        assert_eq!(level("mu X. nu Y. mu Z. (X && Y)"), 3);
    }

    #[test]
    fn literal_priorities() {
        let (_, apta) = build("true");
        assert_eq!(apta.states()[0].priority(), 0);
        let (_, apta) = build("false");
        assert_eq!(apta.states()[0].priority(), 1);
        assert!(apta.states()[0].existential());
    }

    #[test]
    fn literals_loop_on_themselves() {
        let (_, apta) = build("true");
        let state = &apta.states()[0];
        assert_eq!(state.next().len(), 1);
        let (label, targets) = &state.next()[0];
        assert_eq!(*label, None);
        assert_eq!(targets.as_slice(), &[0]);
    }

    #[test]
    fn proposition_splits_on_its_value() {
        let (formulas, apta) = build("p");
        let state = &apta.states()[0];
        assert!(state.local());
        assert!(!state.existential());
        assert_eq!(state.next().len(), 2);
        let (label, _) = &state.next()[0];
        let (p, value) = label.unwrap();
        assert_eq!(formulas.name(p), "p");
        assert!(value);
    }

    #[test]
    fn fixpoint_unfolding_keeps_the_state_set_finite() {
        let (_, apta) = build("mu X. (p || < > X)");
        // mu X.(p || < >X), p || < >(mu X...), p, < >(mu X...), true, false
        assert_eq!(apta.len(), 6);
        for state in apta.states() {
            if state.existential() {
                for (_, targets) in state.next() {
                    assert!(!targets.is_empty());
                }
            }
        }
    }

    #[test]
    fn self_loop_fixpoints_keep_their_priority() {
        let (_, apta) = build("mu X. X");
        assert_eq!(apta.states()[0].priority(), 1);
        let (_, apta) = build("nu X. X");
        assert_eq!(apta.states()[0].priority(), 0);
    }

    #[test]
    fn scc_priority_is_uniform_and_dominates_base() {
        let (_, apta) = build("nu X. mu Y. (< > Y || (p && < > X))");
        let adjacency: Vec<Vec<usize>> = apta
            .states()
            .iter()
            .map(|s| s.all_successors().collect())
            .collect();
        for component in scc::strongly_connected_components(&adjacency) {
            if component.len() == 1 && !adjacency[component[0]].contains(&component[0]) {
                assert_eq!(apta.states()[component[0]].priority(), 0);
                continue;
            }
            let max = component
                .iter()
                .map(|&q| apta.states()[q].base_priority())
                .max()
                .unwrap();
            for &q in &component {
                assert_eq!(apta.states()[q].priority(), max);
                assert!(apta.states()[q].priority() >= apta.states()[q].base_priority());
            }
        }
    }

    #[test]
    fn vacuous_fixpoint_gets_priority_zero() {
        // mu X. p never loops, so the SCC rule overrides its base priority
        let (_, apta) = build("mu X. p");
        let root = &apta.states()[0];
        assert_eq!(root.base_priority(), 1);
        assert_eq!(root.priority(), 0);
    }
}
