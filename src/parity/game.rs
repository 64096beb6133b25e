//! The parity game product of arena positions, tracking states and
//! carried symbols.
//!
//! A play walks the arena, carrying first the emitted letter and then the
//! pair of letter and local or modal step, which the tracking automaton
//! consumes as one word letter. The existential player owns the unread
//! game nodes of diamond positions; every node with a carried symbol
//! belongs to the universal player, since the step has already been
//! chosen and the tracking automaton merely has to honour it.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;

use log::debug;

use crate::arena::{Arena, Letter, Move, PositionIndex};
use crate::constructor::ExplorationQueue;
use crate::parity::{Parity, Player, Priority};
use crate::tracking::{Label, TrackingAutomaton};

/// The type for an index of a node in a parity game.
pub type NodeIndex = usize;

/// The symbol carried by a game node between arena steps.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeSymbol {
    /// Nothing carried; the arena moves next.
    Empty,
    /// A letter emitted by the arena, not yet paired with a step.
    Letter(Letter),
    /// A letter and the step taken under it; consumed by the tracking
    /// automaton.
    Step(Letter, Move),
}

/// A node of the parity game.
#[derive(Debug)]
pub struct Node {
    position: PositionIndex,
    track: usize,
    symbol: NodeSymbol,
    owner: Player,
    priority: Priority,
    successors: Vec<NodeIndex>,
}

impl Node {
    /// The arena position of the node.
    pub fn position(&self) -> PositionIndex {
        self.position
    }

    /// The tracking state of the node.
    pub fn track(&self) -> usize {
        self.track
    }

    /// The carried symbol of the node.
    pub fn symbol(&self) -> &NodeSymbol {
        &self.symbol
    }

    /// The player controlling the node.
    pub fn owner(&self) -> Player {
        self.owner
    }

    /// The priority of the node.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// The successor indices of the node.
    pub fn successors(&self) -> &[NodeIndex] {
        &self.successors
    }
}

/// The parity game deciding emptiness of the automaton.
pub struct ParityGame {
    nodes: Vec<Node>,
    mapping: HashMap<(PositionIndex, usize, NodeSymbol), NodeIndex>,
}

impl ParityGame {
    /// Builds the game from the arena and the determinized tracking
    /// automaton, starting from `(position 0, state 0, ∅)`, which always
    /// receives node index 0.
    pub fn of<Q: ExplorationQueue<NodeIndex>>(
        arena: &Arena,
        tracking: &TrackingAutomaton,
        mut queue: Q,
    ) -> Self {
        let mut game = Self {
            nodes: Vec::new(),
            mapping: HashMap::new(),
        };
        game.node(arena, tracking, 0, 0, NodeSymbol::Empty, &mut queue);
        while let Some(index) = queue.pop() {
            game.expand(arena, tracking, index, &mut queue);
        }
        debug!("parity game has {} nodes", game.nodes.len());
        game
    }

    /// The nodes of the game.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Number of nodes.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// The index of the initial node.
    pub fn initial_node(&self) -> NodeIndex {
        0
    }

    /// Returns the index of a node, creating and enqueueing it if it does
    /// not exist yet.
    fn node<Q: ExplorationQueue<NodeIndex>>(
        &mut self,
        arena: &Arena,
        tracking: &TrackingAutomaton,
        position: PositionIndex,
        track: usize,
        symbol: NodeSymbol,
        queue: &mut Q,
    ) -> NodeIndex {
        match self.mapping.entry((position, track, symbol)) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let (position, track, symbol) = entry.key().clone();
                let owner = match symbol {
                    NodeSymbol::Empty => {
                        if arena.positions()[position].is_diamond() {
                            Player::Even
                        } else {
                            Player::Odd
                        }
                    }
                    _ => Player::Odd,
                };
                let node = Node {
                    position,
                    track,
                    symbol,
                    owner,
                    priority: tracking.states()[track].priority() + 1,
                    successors: Vec::new(),
                };
                let index = self.nodes.len();
                self.nodes.push(node);
                entry.insert(index);
                queue.push(index);
                index
            }
        }
    }

    fn add_successor<Q: ExplorationQueue<NodeIndex>>(
        &mut self,
        arena: &Arena,
        tracking: &TrackingAutomaton,
        from: NodeIndex,
        position: PositionIndex,
        track: usize,
        symbol: NodeSymbol,
        queue: &mut Q,
    ) {
        let target = self.node(arena, tracking, position, track, symbol, queue);
        let successors = &mut self.nodes[from].successors;
        if !successors.contains(&target) {
            successors.push(target);
        }
    }

    fn expand<Q: ExplorationQueue<NodeIndex>>(
        &mut self,
        arena: &Arena,
        tracking: &TrackingAutomaton,
        index: NodeIndex,
        queue: &mut Q,
    ) {
        let position = self.nodes[index].position;
        let track = self.nodes[index].track;
        let symbol = self.nodes[index].symbol.clone();
        let arena_position = &arena.positions()[position];

        match symbol {
            NodeSymbol::Empty => {
                if arena_position.symbol().is_none() {
                    // the arena emits a letter
                    for (step, target) in arena_position.next() {
                        let letter = match step {
                            Move::Letter(letter) => letter.clone(),
                            step => panic!("unread position took a non-letter step {}", step),
                        };
                        self.add_successor(
                            arena,
                            tracking,
                            index,
                            *target,
                            track,
                            NodeSymbol::Letter(letter),
                            queue,
                        );
                    }
                } else {
                    // the arena resolves a local or modal step
                    let sigma = arena_position.symbol().expect("position has a letter").clone();
                    for (step, target) in arena_position.next() {
                        debug_assert!(!matches!(step, Move::Letter(_)));
                        self.add_successor(
                            arena,
                            tracking,
                            index,
                            *target,
                            track,
                            NodeSymbol::Step(sigma.clone(), step.clone()),
                            queue,
                        );
                    }
                }
            }
            NodeSymbol::Step(sigma, step) => {
                // the tracking automaton consumes one word letter
                for (label, targets) in tracking.states()[track].next() {
                    if !compatible(label, &sigma, &step) {
                        continue;
                    }
                    for &target in targets {
                        self.add_successor(
                            arena,
                            tracking,
                            index,
                            position,
                            target,
                            NodeSymbol::Empty,
                            queue,
                        );
                    }
                }
            }
            NodeSymbol::Letter(_) => {
                // a bare letter carries no step to consume
                self.add_successor(
                    arena,
                    tracking,
                    index,
                    position,
                    track,
                    NodeSymbol::Empty,
                    queue,
                );
            }
        }
    }

    #[cfg(test)]
    fn add_test_node(&mut self, owner: Player, priority: Priority) -> NodeIndex {
        let index = self.nodes.len();
        self.nodes.push(Node {
            position: index,
            track: 0,
            symbol: NodeSymbol::Empty,
            owner,
            priority,
            successors: Vec::new(),
        });
        index
    }

    #[cfg(test)]
    fn empty() -> Self {
        Self {
            nodes: Vec::new(),
            mapping: HashMap::new(),
        }
    }
}

/// Tests whether a tracking label is compatible with the carried letter
/// and step.
fn compatible(label: &Label, sigma: &Letter, step: &Move) -> bool {
    // the letter must not contradict the propositional constraints
    for &(p, b) in label.aprops() {
        if sigma.iter().any(|&(sp, sb)| sp == p && sb != b) {
            return false;
        }
    }
    match label {
        Label::Any { .. } => true,
        Label::Choice { extra, .. } => match step {
            Move::Choice(d) => extra.iter().all(|&(q, target)| {
                d.binary_search_by_key(&q, |&(p, _)| p)
                    .map(|pos| d[pos].1 == target)
                    .unwrap_or(false)
            }),
            _ => false,
        },
        Label::State { extra, .. } => match step {
            Move::Modal(q) => extra.map_or(true, |e| e == *q),
            Move::Skip => extra.is_none(),
            _ => false,
        },
    }
}

impl fmt::Display for ParityGame {
    /// Writes the game in PGSolver format. Nodes without successors are
    /// emitted as a self-loop whose priority makes its owner lose.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "parity {};", self.num_nodes())?;
        for (index, node) in self.nodes.iter().enumerate() {
            let owner = u32::from(node.owner());
            if node.successors().is_empty() {
                let losing = u32::from(!Player::from(Parity::of(owner as Priority)));
                writeln!(f, "{} {} {} {};", index, losing, owner, index)?;
            } else {
                write!(f, "{} {} {} ", index, node.priority(), owner)?;
                for (i, successor) in node.successors().iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", successor)?;
                }
                writeln!(f, ";")?;
            }
        }
        Ok(())
    }
}

/// A parity game reparsed from PGSolver text: priority, player and
/// successors per node.
#[derive(Debug, PartialEq, Eq)]
pub struct RawGame {
    nodes: Vec<(Priority, u32, Vec<NodeIndex>)>,
}

impl RawGame {
    /// The nodes of the reparsed game.
    pub fn nodes(&self) -> &[(Priority, u32, Vec<NodeIndex>)] {
        &self.nodes
    }

    /// Parses PGSolver text.
    pub fn parse(text: &str) -> Result<Self, String> {
        let mut lines = text.lines();
        let header = lines.next().ok_or("empty game text")?;
        let count: usize = header
            .strip_prefix("parity ")
            .and_then(|rest| rest.strip_suffix(';'))
            .ok_or_else(|| format!("malformed header `{}`", header))?
            .parse()
            .map_err(|e| format!("malformed node count in `{}`: {}", header, e))?;

        let mut nodes = Vec::with_capacity(count);
        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let line = line
                .strip_suffix(';')
                .ok_or_else(|| format!("missing `;` in `{}`", line))?;
            let mut fields = line.split(' ');
            let index: usize = parse_field(&mut fields, line)?;
            if index != nodes.len() {
                return Err(format!("node {} out of order in `{}`", index, line));
            }
            let priority: Priority = parse_field(&mut fields, line)?;
            let player: u32 = parse_field(&mut fields, line)?;
            if player > 1 {
                return Err(format!("invalid player {} in `{}`", player, line));
            }
            let successors = fields
                .next()
                .ok_or_else(|| format!("missing successors in `{}`", line))?
                .split(',')
                .map(|s| {
                    s.parse::<usize>()
                        .map_err(|e| format!("malformed successor `{}`: {}", s, e))
                })
                .collect::<Result<Vec<_>, _>>()?;
            nodes.push((priority, player, successors));
        }
        if nodes.len() != count {
            return Err(format!(
                "header announced {} nodes, found {}",
                count,
                nodes.len()
            ));
        }
        for (_, _, successors) in &nodes {
            for &successor in successors {
                if successor >= count {
                    return Err(format!("successor {} out of range", successor));
                }
            }
        }
        Ok(Self { nodes })
    }
}

fn parse_field<'a, I: Iterator<Item = &'a str>, T: std::str::FromStr>(
    fields: &mut I,
    line: &str,
) -> Result<T, String>
where
    T::Err: fmt::Display,
{
    fields
        .next()
        .ok_or_else(|| format!("missing field in `{}`", line))?
        .parse()
        .map_err(|e| format!("malformed field in `{}`: {}", line, e))
}

impl fmt::Display for RawGame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "parity {};", self.nodes.len())?;
        for (index, (priority, player, successors)) in self.nodes.iter().enumerate() {
            write!(f, "{} {} {} ", index, priority, player)?;
            for (i, successor) in successors.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{}", successor)?;
            }
            writeln!(f, ";")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apta::Apta;
    use crate::constructor::BfsQueue;
    use crate::formula::parser::parse;
    use crate::formula::Formulas;

    fn build(input: &str) -> ParityGame {
        let mut formulas = Formulas::new();
        let root = parse(&mut formulas, input).unwrap();
        let apta = Apta::of(&mut formulas, root);
        let arena = Arena::of(&formulas, &apta, 0, BfsQueue::with_capacity(64));
        // the product accepts the nondeterministic automaton as well,
        // which keeps these tests independent of the external tool
        let tracking = TrackingAutomaton::of(&apta);
        ParityGame::of(&arena, &tracking, BfsQueue::with_capacity(64))
    }

    #[test]
    fn trivial_game_of_true() {
        let game = build("true");
        assert_eq!(game.num_nodes(), 4);
        let expected = "parity 4;\n\
                        0 2 0 1;\n\
                        1 2 1 2;\n\
                        2 2 0 3;\n\
                        3 2 1 2;\n";
        assert_eq!(game.to_string(), expected);
    }

    #[test]
    fn ownership_follows_the_symbol() {
        let game = build("mu X. (p || < > X)");
        for node in game.nodes() {
            match node.symbol() {
                NodeSymbol::Empty => (),
                _ => assert_eq!(node.owner(), Player::Odd),
            }
        }
    }

    #[test]
    fn priorities_are_shifted_tracking_priorities() {
        let game = build("nu X. (p && < > X)");
        for node in game.nodes() {
            assert!(node.priority() >= 2);
        }
    }

    #[test]
    fn compatibility_of_choice_labels() {
        let sigma: Letter = Vec::new();
        let d = vec![(2, 5), (4, 7)];
        let permissive = Label::choice();
        assert!(compatible(&permissive, &sigma, &Move::Choice(d.clone())));
        let exact = Label::Choice {
            extra: vec![(4, 7)],
            aprops: Vec::new(),
        };
        assert!(compatible(&exact, &sigma, &Move::Choice(d.clone())));
        let wrong = Label::Choice {
            extra: vec![(4, 8)],
            aprops: Vec::new(),
        };
        assert!(!compatible(&wrong, &sigma, &Move::Choice(d)));
        assert!(!compatible(&permissive, &sigma, &Move::Skip));
    }

    #[test]
    fn compatibility_of_state_labels() {
        let sigma: Letter = Vec::new();
        let any_target = Label::State {
            extra: None,
            aprops: Vec::new(),
        };
        assert!(compatible(&any_target, &sigma, &Move::Modal(3)));
        assert!(compatible(&any_target, &sigma, &Move::Skip));
        let exact = Label::State {
            extra: Some(3),
            aprops: Vec::new(),
        };
        assert!(compatible(&exact, &sigma, &Move::Modal(3)));
        assert!(!compatible(&exact, &sigma, &Move::Modal(2)));
        assert!(!compatible(&exact, &sigma, &Move::Skip));
        assert!(!compatible(&exact, &sigma, &Move::Choice(Vec::new())));
    }

    #[test]
    fn aprops_constrain_the_carried_letter() {
        let mut formulas = Formulas::new();
        let p = formulas.symbol("p");
        let label = Label::Any {
            aprops: vec![(p, true)],
        };
        assert!(compatible(&label, &vec![(p, true)], &Move::Skip));
        assert!(!compatible(&label, &vec![(p, false)], &Move::Skip));
        // a letter silent on p does not contradict the constraint
        assert!(compatible(&label, &Vec::new(), &Move::Skip));
    }

    #[test]
    fn stuck_nodes_lose_by_self_loop() {
        let mut game = ParityGame::empty();
        let n0 = game.add_test_node(Player::Even, 4);
        let n1 = game.add_test_node(Player::Odd, 3);
        game.nodes[n0].successors.push(n1);
        // n1 is stuck: its owner is odd, so the self-loop gets priority 0
        let expected = "parity 2;\n\
                        0 4 0 1;\n\
                        1 0 1 1;\n";
        assert_eq!(game.to_string(), expected);
    }

    #[test]
    fn emission_reparses_to_the_same_game() {
        let game = build("mu X. (p || < > X)");
        let text = game.to_string();
        let raw = RawGame::parse(&text).unwrap();
        assert_eq!(raw.nodes().len(), game.num_nodes());
        for (node, (priority, player, successors)) in game.nodes().iter().zip(raw.nodes()) {
            if node.successors().is_empty() {
                continue;
            }
            assert_eq!(*priority, node.priority());
            assert_eq!(*player, u32::from(node.owner()));
            assert_eq!(successors, node.successors());
        }
    }

    #[test]
    fn emission_is_idempotent() {
        let game = build("(< > a) && ([ ] b)");
        let text = game.to_string();
        let reparsed = RawGame::parse(&text).unwrap();
        assert_eq!(reparsed.to_string(), text);
    }
}
