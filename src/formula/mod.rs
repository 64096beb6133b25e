//! Formulas of the modal μ-calculus.

pub mod parser;

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;

/// An interned proposition or fixpoint variable name.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

/// An interned formula.
///
/// Within one [`Formulas`] arena, two formulas are structurally equal
/// if and only if their ids are equal.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct FormulaId(u32);

impl FormulaId {
    /// Returns the index of this formula in its arena.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A node of a formula in negation normal form at the leaves.
///
/// Negation is restricted to atomic propositions; the parser rewrites
/// everything else before interning (see [`parser`]).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum FormulaNode {
    /// A literal `true` or `false`.
    Lit(bool),
    /// An atomic proposition.
    Prop(Symbol),
    /// A bound fixpoint variable.
    Var(Symbol),
    /// Negation of an atomic proposition.
    Neg(FormulaId),
    /// Conjunction.
    And(FormulaId, FormulaId),
    /// Disjunction.
    Or(FormulaId, FormulaId),
    /// Diamond modality `< >` (some successor).
    Dia(FormulaId),
    /// Box modality `[ ]` (all successors).
    Box(FormulaId),
    /// Least fixpoint binder.
    Mu(Symbol, FormulaId),
    /// Greatest fixpoint binder.
    Nu(Symbol, FormulaId),
}

/// Arena interning formulas and their proposition and variable names.
///
/// All containers downstream reference formulas by [`FormulaId`], so the
/// arena may grow (fixpoint unfolding creates new instances) without
/// invalidating anything.
#[derive(Debug, Default)]
pub struct Formulas {
    nodes: Vec<FormulaNode>,
    node_map: HashMap<FormulaNode, FormulaId>,
    names: Vec<String>,
    name_map: HashMap<String, Symbol>,
}

impl Formulas {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a name and returns its symbol.
    pub fn symbol(&mut self, name: &str) -> Symbol {
        if let Some(&sym) = self.name_map.get(name) {
            return sym;
        }
        let sym = Symbol(self.names.len() as u32);
        self.names.push(name.to_owned());
        self.name_map.insert(name.to_owned(), sym);
        sym
    }

    /// Returns the name interned for the given symbol.
    pub fn name(&self, sym: Symbol) -> &str {
        &self.names[sym.0 as usize]
    }

    /// Interns a node and returns the id of the formula.
    pub fn intern(&mut self, node: FormulaNode) -> FormulaId {
        match self.node_map.entry(node) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let id = FormulaId(self.nodes.len() as u32);
                self.nodes.push(node);
                entry.insert(id);
                id
            }
        }
    }

    /// Returns the node of the formula with the given id.
    pub fn node(&self, id: FormulaId) -> FormulaNode {
        self.nodes[id.index()]
    }

    /// Number of interned formulas.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if no formula has been interned yet.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Substitutes the formula `replacement` for every free occurrence of
    /// the variable `var` in `formula`.
    pub fn substitute(
        &mut self,
        formula: FormulaId,
        var: Symbol,
        replacement: FormulaId,
    ) -> FormulaId {
        let mut cache = HashMap::new();
        self.substitute_rec(formula, var, replacement, &mut cache)
    }

    fn substitute_rec(
        &mut self,
        formula: FormulaId,
        var: Symbol,
        replacement: FormulaId,
        cache: &mut HashMap<FormulaId, FormulaId>,
    ) -> FormulaId {
        if let Some(&done) = cache.get(&formula) {
            return done;
        }
        let result = match self.node(formula) {
            FormulaNode::Var(x) if x == var => replacement,
            FormulaNode::Lit(_) | FormulaNode::Prop(_) | FormulaNode::Var(_) => formula,
            FormulaNode::Neg(f) => {
                let f = self.substitute_rec(f, var, replacement, cache);
                self.intern(FormulaNode::Neg(f))
            }
            FormulaNode::And(f, g) => {
                let f = self.substitute_rec(f, var, replacement, cache);
                let g = self.substitute_rec(g, var, replacement, cache);
                self.intern(FormulaNode::And(f, g))
            }
            FormulaNode::Or(f, g) => {
                let f = self.substitute_rec(f, var, replacement, cache);
                let g = self.substitute_rec(g, var, replacement, cache);
                self.intern(FormulaNode::Or(f, g))
            }
            FormulaNode::Dia(f) => {
                let f = self.substitute_rec(f, var, replacement, cache);
                self.intern(FormulaNode::Dia(f))
            }
            FormulaNode::Box(f) => {
                let f = self.substitute_rec(f, var, replacement, cache);
                self.intern(FormulaNode::Box(f))
            }
            // an inner binder of the same name shadows var
            FormulaNode::Mu(x, _) | FormulaNode::Nu(x, _) if x == var => formula,
            FormulaNode::Mu(x, f) => {
                let f = self.substitute_rec(f, var, replacement, cache);
                self.intern(FormulaNode::Mu(x, f))
            }
            FormulaNode::Nu(x, f) => {
                let f = self.substitute_rec(f, var, replacement, cache);
                self.intern(FormulaNode::Nu(x, f))
            }
        };
        cache.insert(formula, result);
        result
    }

    /// One-step fixpoint unfolding: `Qx.ψ` becomes `ψ[x ↦ Qx.ψ]`.
    ///
    /// # Panics
    ///
    /// Panics if the formula is not a fixpoint binder.
    pub fn unfold(&mut self, formula: FormulaId) -> FormulaId {
        match self.node(formula) {
            FormulaNode::Mu(x, body) | FormulaNode::Nu(x, body) => {
                self.substitute(body, x, formula)
            }
            node => panic!("unfolding a non-fixpoint formula: {:?}", node),
        }
    }

    /// Returns true if the variable `var` occurs free in `formula`.
    pub fn variable_occurs(&self, var: Symbol, formula: FormulaId) -> bool {
        match self.node(formula) {
            FormulaNode::Var(x) => x == var,
            FormulaNode::Lit(_) | FormulaNode::Prop(_) => false,
            FormulaNode::Neg(f) | FormulaNode::Dia(f) | FormulaNode::Box(f) => {
                self.variable_occurs(var, f)
            }
            FormulaNode::And(f, g) | FormulaNode::Or(f, g) => {
                self.variable_occurs(var, f) || self.variable_occurs(var, g)
            }
            FormulaNode::Mu(x, f) | FormulaNode::Nu(x, f) => {
                x != var && self.variable_occurs(var, f)
            }
        }
    }

    /// Returns the atomic propositions syntactically appearing in the
    /// formula, sorted lexicographically by name and deduplicated.
    pub fn propositions(&self, formula: FormulaId) -> Vec<Symbol> {
        let mut props = Vec::new();
        self.collect_propositions(formula, &mut props);
        props.sort_by(|&a, &b| self.name(a).cmp(self.name(b)));
        props.dedup();
        props
    }

    fn collect_propositions(&self, formula: FormulaId, props: &mut Vec<Symbol>) {
        match self.node(formula) {
            FormulaNode::Prop(p) => props.push(p),
            FormulaNode::Lit(_) | FormulaNode::Var(_) => (),
            FormulaNode::Neg(f) | FormulaNode::Dia(f) | FormulaNode::Box(f) => {
                self.collect_propositions(f, props)
            }
            FormulaNode::And(f, g) | FormulaNode::Or(f, g) => {
                self.collect_propositions(f, props);
                self.collect_propositions(g, props);
            }
            FormulaNode::Mu(_, f) | FormulaNode::Nu(_, f) => self.collect_propositions(f, props),
        }
    }

    /// Returns a displayable view of the formula.
    pub fn display(&self, formula: FormulaId) -> FormulaDisplay<'_> {
        FormulaDisplay {
            formulas: self,
            formula,
        }
    }
}

/// Helper struct to display a formula in the surface syntax.
pub struct FormulaDisplay<'a> {
    formulas: &'a Formulas,
    formula: FormulaId,
}

impl fmt::Display for FormulaDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fs = self.formulas;
        match fs.node(self.formula) {
            FormulaNode::Lit(true) => write!(f, "true"),
            FormulaNode::Lit(false) => write!(f, "false"),
            FormulaNode::Prop(p) | FormulaNode::Var(p) => write!(f, "{}", fs.name(p)),
            FormulaNode::Neg(g) => write!(f, "!{}", fs.display(g)),
            FormulaNode::And(g, h) => write!(f, "({} && {})", fs.display(g), fs.display(h)),
            FormulaNode::Or(g, h) => write!(f, "({} || {})", fs.display(g), fs.display(h)),
            FormulaNode::Dia(g) => write!(f, "< >{}", fs.display(g)),
            FormulaNode::Box(g) => write!(f, "[ ]{}", fs.display(g)),
            FormulaNode::Mu(x, g) => write!(f, "mu {}. {}", fs.name(x), fs.display(g)),
            FormulaNode::Nu(x, g) => write!(f, "nu {}. {}", fs.name(x), fs.display(g)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_identifies_structurally_equal_formulas() {
        let mut fs = Formulas::new();
        let p = fs.symbol("p");
        let a = fs.intern(FormulaNode::Prop(p));
        let b = fs.intern(FormulaNode::Prop(p));
        assert_eq!(a, b);
        let c = fs.intern(FormulaNode::Dia(a));
        let d = fs.intern(FormulaNode::Dia(b));
        assert_eq!(c, d);
        assert_eq!(fs.len(), 2);
    }

    #[test]
    fn unfolding_folds_back_to_the_binder() {
        // mu X. < >X unfolds to < >(mu X. < >X)
        let mut fs = Formulas::new();
        let x = fs.symbol("X");
        let var = fs.intern(FormulaNode::Var(x));
        let dia = fs.intern(FormulaNode::Dia(var));
        let mu = fs.intern(FormulaNode::Mu(x, dia));
        let unfolded = fs.unfold(mu);
        assert_eq!(unfolded, fs.intern(FormulaNode::Dia(mu)));
        // unfolding the unfolded body reuses the same ids
        let again = fs.unfold(mu);
        assert_eq!(unfolded, again);
    }

    #[test]
    fn substitution_respects_shadowing() {
        // substituting X in (X || mu X. X) only touches the free occurrence
        let mut fs = Formulas::new();
        let x = fs.symbol("X");
        let var = fs.intern(FormulaNode::Var(x));
        let inner = fs.intern(FormulaNode::Mu(x, var));
        let or = fs.intern(FormulaNode::Or(var, inner));
        let tt = fs.intern(FormulaNode::Lit(true));
        let result = fs.substitute(or, x, tt);
        assert_eq!(result, fs.intern(FormulaNode::Or(tt, inner)));
    }

    #[test]
    fn variable_occurrence_ignores_bound_instances() {
        let mut fs = Formulas::new();
        let x = fs.symbol("X");
        let var = fs.intern(FormulaNode::Var(x));
        let inner = fs.intern(FormulaNode::Nu(x, var));
        assert!(fs.variable_occurs(x, var));
        assert!(!fs.variable_occurs(x, inner));
    }

    #[test]
    fn propositions_are_sorted_by_name() {
        let mut fs = Formulas::new();
        let q = fs.symbol("q");
        let p = fs.symbol("p");
        let fq = fs.intern(FormulaNode::Prop(q));
        let fp = fs.intern(FormulaNode::Prop(p));
        let and = fs.intern(FormulaNode::And(fq, fp));
        let props = fs.propositions(and);
        assert_eq!(props, vec![p, q]);
    }
}
