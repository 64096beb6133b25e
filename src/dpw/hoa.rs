//! HOA v1 interchange with the external determinizer.
//!
//! Only the subset of the format that the pipeline emits and consumes is
//! supported: boolean-labelled parity automata with a single initial
//! state, explicit transition labels and colours on states or edges.

use std::io::{self, Write};

/// A conjunction of literals over label variables, sorted by variable
/// index. An empty cube is the constant true.
pub(crate) type Cube = Vec<(usize, bool)>;

/// A boolean condition of an edge, as written in a label expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BoolExpr {
    True,
    False,
    Var(usize),
    Not(Box<BoolExpr>),
    And(Box<BoolExpr>, Box<BoolExpr>),
    Or(Box<BoolExpr>, Box<BoolExpr>),
}

impl BoolExpr {
    /// Expands the expression into disjoint-by-construction cubes (a
    /// disjunctive normal form). Contradictory cubes are dropped.
    pub(crate) fn cubes(&self) -> Vec<Cube> {
        match self {
            BoolExpr::True => vec![Vec::new()],
            BoolExpr::False => Vec::new(),
            BoolExpr::Var(v) => vec![vec![(*v, true)]],
            BoolExpr::Not(inner) => inner.negated_cubes(),
            BoolExpr::And(lhs, rhs) => {
                let mut result = Vec::new();
                for left in lhs.cubes() {
                    for right in rhs.cubes() {
                        if let Some(cube) = merge_cubes(&left, &right) {
                            result.push(cube);
                        }
                    }
                }
                result
            }
            BoolExpr::Or(lhs, rhs) => {
                let mut result = lhs.cubes();
                result.extend(rhs.cubes());
                result
            }
        }
    }

    /// Cubes of the negation of the expression (negation normal form is
    /// produced on the fly).
    fn negated_cubes(&self) -> Vec<Cube> {
        match self {
            BoolExpr::True => Vec::new(),
            BoolExpr::False => vec![Vec::new()],
            BoolExpr::Var(v) => vec![vec![(*v, false)]],
            BoolExpr::Not(inner) => inner.cubes(),
            BoolExpr::And(lhs, rhs) => {
                let mut result = lhs.negated_cubes();
                result.extend(rhs.negated_cubes());
                result
            }
            BoolExpr::Or(lhs, rhs) => {
                let mut result = Vec::new();
                for left in lhs.negated_cubes() {
                    for right in rhs.negated_cubes() {
                        if let Some(cube) = merge_cubes(&left, &right) {
                            result.push(cube);
                        }
                    }
                }
                result
            }
        }
    }
}

/// Conjoins two cubes; `None` if they contradict each other.
fn merge_cubes(left: &Cube, right: &Cube) -> Option<Cube> {
    let mut cube = left.clone();
    for &(v, b) in right {
        match cube.binary_search_by_key(&v, |&(w, _)| w) {
            Ok(pos) => {
                if cube[pos].1 != b {
                    return None;
                }
            }
            Err(pos) => cube.insert(pos, (v, b)),
        }
    }
    Some(cube)
}

/// A state of a parsed automaton.
#[derive(Debug, Default)]
pub(crate) struct HoaState {
    /// The colour from the state acceptance marks, if any.
    pub(crate) color: Option<usize>,
    /// Out-edges: condition, target and colour from edge acceptance marks.
    pub(crate) edges: Vec<(BoolExpr, usize, Option<usize>)>,
}

/// An automaton parsed from the determinizer's output.
#[derive(Debug)]
pub(crate) struct HoaAutomaton {
    pub(crate) start: usize,
    pub(crate) aps: Vec<String>,
    pub(crate) states: Vec<HoaState>,
}

/// The nested Inf/Fin formula of the parity max even condition with the
/// given number of acceptance sets.
pub(crate) fn parity_max_even(sets: usize) -> String {
    if sets == 0 {
        return "t".to_owned();
    }
    let mut formula = String::new();
    let mut open = 0;
    for color in (0..sets).rev() {
        let last = color == 0;
        let (name, junctor) = if color % 2 == 0 {
            ("Inf", " | ")
        } else {
            ("Fin", " & ")
        };
        formula.push_str(name);
        formula.push_str(&format!("({})", color));
        if !last {
            formula.push_str(junctor);
            formula.push('(');
            open += 1;
        }
    }
    for _ in 0..open {
        formula.push(')');
    }
    formula
}

/// Writes a cube as a label expression.
fn write_cube<W: Write>(writer: &mut W, cube: &Cube) -> io::Result<()> {
    if cube.is_empty() {
        return write!(writer, "t");
    }
    for (i, &(v, b)) in cube.iter().enumerate() {
        if i > 0 {
            write!(writer, " & ")?;
        }
        if !b {
            write!(writer, "!")?;
        }
        write!(writer, "{}", v)?;
    }
    Ok(())
}

/// Writes a nondeterministic parity max even automaton with state-based
/// colours in HOA v1.
pub(crate) fn write_automaton<W: Write>(
    writer: &mut W,
    aps: &[String],
    num_colors: usize,
    states: &[(usize, Vec<(Cube, usize)>)],
) -> io::Result<()> {
    writeln!(writer, "HOA: v1")?;
    writeln!(writer, "tool: \"musat\"")?;
    writeln!(writer, "States: {}", states.len())?;
    writeln!(writer, "Start: 0")?;
    write!(writer, "AP: {}", aps.len())?;
    for ap in aps {
        write!(writer, " \"{}\"", ap)?;
    }
    writeln!(writer)?;
    writeln!(writer, "acc-name: parity max even {}", num_colors)?;
    writeln!(
        writer,
        "Acceptance: {} {}",
        num_colors,
        parity_max_even(num_colors)
    )?;
    writeln!(
        writer,
        "properties: trans-labels explicit-labels state-acc colored"
    )?;
    writeln!(writer, "--BODY--")?;
    for (index, (color, edges)) in states.iter().enumerate() {
        writeln!(writer, "State: {} {{{}}}", index, color)?;
        for (cube, target) in edges {
            write!(writer, "[")?;
            write_cube(writer, cube)?;
            writeln!(writer, "] {}", target)?;
        }
    }
    writeln!(writer, "--END--")?;
    Ok(())
}

/// Parses an automaton from the determinizer's output.
pub(crate) fn parse_automaton(input: &str) -> Result<HoaAutomaton, String> {
    let mut lines = input.lines().map(str::trim);

    match lines.next() {
        Some(line) if line.starts_with("HOA:") => (),
        other => return Err(format!("expected an HOA header, found {:?}", other)),
    }

    let mut num_states = None;
    let mut start = 0;
    let mut aps = Vec::new();

    // header
    for line in &mut lines {
        if line == "--BODY--" {
            break;
        }
        if line == "--ABORT--" {
            return Err("the determinizer aborted".to_owned());
        }
        let (item, rest) = match line.find(':') {
            Some(colon) => (&line[..colon], line[colon + 1..].trim()),
            None => continue,
        };
        match item {
            "States" => {
                num_states =
                    Some(rest.parse::<usize>().map_err(|e| {
                        format!("malformed state count `{}`: {}", rest, e)
                    })?)
            }
            "Start" => {
                start = rest
                    .parse::<usize>()
                    .map_err(|e| format!("malformed start state `{}`: {}", rest, e))?
            }
            "AP" => {
                let mut parts = rest.splitn(2, ' ');
                let count: usize = parts
                    .next()
                    .unwrap_or_default()
                    .parse()
                    .map_err(|e| format!("malformed AP count in `{}`: {}", rest, e))?;
                aps = parse_quoted(parts.next().unwrap_or_default());
                if aps.len() != count {
                    return Err(format!(
                        "AP count {} does not match {} names",
                        count,
                        aps.len()
                    ));
                }
            }
            // the acceptance formula itself is not interpreted; colours
            // are read from the acceptance marks in the body
            _ => (),
        }
    }

    let num_states = num_states.ok_or("missing States header")?;
    let mut states: Vec<HoaState> = (0..num_states).map(|_| HoaState::default()).collect();
    let mut current: Option<usize> = None;

    for line in lines {
        if line == "--END--" {
            break;
        }
        if line == "--ABORT--" {
            return Err("the determinizer aborted".to_owned());
        }
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix("State:") {
            let rest = rest.trim();
            let (index_part, marks) = split_acceptance(rest);
            let index: usize = index_part
                .split_whitespace()
                .next()
                .ok_or_else(|| format!("missing state index in `{}`", line))?
                .parse()
                .map_err(|e| format!("malformed state index in `{}`: {}", line, e))?;
            if index >= num_states {
                return Err(format!("state index {} out of range", index));
            }
            states[index].color = marks;
            current = Some(index);
        } else {
            let state = current.ok_or_else(|| format!("edge before any state: `{}`", line))?;
            let (cond, rest) = if let Some(rest) = line.strip_prefix('[') {
                let end = rest
                    .find(']')
                    .ok_or_else(|| format!("unterminated label in `{}`", line))?;
                (parse_expr(&rest[..end])?, rest[end + 1..].trim())
            } else {
                return Err(format!("edge without an explicit label: `{}`", line));
            };
            let (target_part, marks) = split_acceptance(rest);
            let target: usize = target_part
                .trim()
                .parse()
                .map_err(|e| format!("malformed edge target in `{}`: {}", line, e))?;
            if target >= num_states {
                return Err(format!("edge target {} out of range", target));
            }
            states[state].edges.push((cond, target, marks));
        }
    }

    if start >= num_states {
        return Err(format!("start state {} out of range", start));
    }
    Ok(HoaAutomaton { start, aps, states })
}

/// Splits trailing acceptance marks `{c ...}` off a body line, returning
/// the first colour if present.
fn split_acceptance(rest: &str) -> (&str, Option<usize>) {
    match rest.find('{') {
        Some(open) => {
            let marks = rest[open + 1..]
                .trim_end()
                .trim_end_matches('}')
                .split_whitespace()
                .filter_map(|m| m.parse().ok())
                .next();
            (&rest[..open], marks)
        }
        None => (rest, None),
    }
}

fn parse_quoted(rest: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut chars = rest.chars();
    while let Some(c) = chars.next() {
        if c != '"' {
            continue;
        }
        let mut name = String::new();
        for c in chars.by_ref() {
            if c == '"' {
                break;
            }
            name.push(c);
        }
        names.push(name);
    }
    names
}

/// Parses a label expression: disjunctions of conjunctions of possibly
/// negated variables and constants.
fn parse_expr(input: &str) -> Result<BoolExpr, String> {
    let tokens: Vec<char> = input.chars().filter(|c| !c.is_whitespace()).collect();
    let mut parser = ExprParser { tokens, pos: 0 };
    let expr = parser.disjunction()?;
    if parser.pos != parser.tokens.len() {
        return Err(format!("trailing input in label `{}`", input));
    }
    Ok(expr)
}

struct ExprParser {
    tokens: Vec<char>,
    pos: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<char> {
        self.tokens.get(self.pos).copied()
    }

    fn disjunction(&mut self) -> Result<BoolExpr, String> {
        let mut lhs = self.conjunction()?;
        while self.peek() == Some('|') {
            self.pos += 1;
            let rhs = self.conjunction()?;
            lhs = BoolExpr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn conjunction(&mut self) -> Result<BoolExpr, String> {
        let mut lhs = self.atom()?;
        while self.peek() == Some('&') {
            self.pos += 1;
            let rhs = self.atom()?;
            lhs = BoolExpr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn atom(&mut self) -> Result<BoolExpr, String> {
        match self.peek() {
            Some('!') => {
                self.pos += 1;
                let inner = self.atom()?;
                Ok(BoolExpr::Not(Box::new(inner)))
            }
            Some('(') => {
                self.pos += 1;
                let inner = self.disjunction()?;
                if self.peek() != Some(')') {
                    return Err("unbalanced parenthesis in label".to_owned());
                }
                self.pos += 1;
                Ok(inner)
            }
            Some('t') => {
                self.pos += 1;
                Ok(BoolExpr::True)
            }
            Some('f') => {
                self.pos += 1;
                Ok(BoolExpr::False)
            }
            Some(c) if c.is_ascii_digit() => {
                let mut value = 0;
                while let Some(c) = self.peek() {
                    if let Some(digit) = c.to_digit(10) {
                        value = value * 10 + digit as usize;
                        self.pos += 1;
                    } else {
                        break;
                    }
                }
                Ok(BoolExpr::Var(value))
            }
            other => Err(format!("unexpected {:?} in label expression", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parity_max_even_formulas() {
        assert_eq!(parity_max_even(1), "Inf(0)");
        assert_eq!(parity_max_even(2), "Fin(1) & (Inf(0))");
        assert_eq!(parity_max_even(3), "Inf(2) | (Fin(1) & (Inf(0)))");
        assert_eq!(
            parity_max_even(4),
            "Fin(3) & (Inf(2) | (Fin(1) & (Inf(0))))"
        );
    }

    #[test]
    fn expressions_expand_to_cubes() {
        let expr = parse_expr("0 & !1 | 2").unwrap();
        assert_eq!(
            expr.cubes(),
            vec![vec![(0, true), (1, false)], vec![(2, true)]]
        );
    }

    #[test]
    fn negation_is_pushed_down() {
        let expr = parse_expr("!(0 | !1)").unwrap();
        assert_eq!(expr.cubes(), vec![vec![(0, false), (1, true)]]);
    }

    #[test]
    fn contradictions_are_dropped() {
        let expr = parse_expr("0 & !0").unwrap();
        assert!(expr.cubes().is_empty());
        let expr = parse_expr("t & !f").unwrap();
        assert_eq!(expr.cubes(), vec![Vec::new()]);
    }

    #[test]
    fn writer_output_parses_back() {
        let states = vec![
            (2, vec![(vec![(0, true)], 1), (vec![(0, false)], 0)]),
            (1, vec![(Vec::new(), 1)]),
        ];
        let mut buffer = Vec::new();
        write_automaton(
            &mut buffer,
            &["a".to_owned(), "_is_choice".to_owned()],
            3,
            &states,
        )
        .unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let parsed = parse_automaton(&text).unwrap();
        assert_eq!(parsed.start, 0);
        assert_eq!(parsed.aps, vec!["a", "_is_choice"]);
        assert_eq!(parsed.states.len(), 2);
        assert_eq!(parsed.states[0].color, Some(2));
        assert_eq!(parsed.states[0].edges.len(), 2);
        let (cond, target, acc) = &parsed.states[1].edges[0];
        assert_eq!(cond.cubes(), vec![Vec::new()]);
        assert_eq!(*target, 1);
        assert_eq!(*acc, None);
    }

    #[test]
    fn state_acceptance_marks_are_read() {
        let input = "HOA: v1\nStates: 1\nStart: 0\nAP: 1 \"a\"\n\
                     Acceptance: 2 Fin(1) & (Inf(0))\n--BODY--\n\
                     State: 0 {1}\n[t] 0\n--END--\n";
        let parsed = parse_automaton(input).unwrap();
        assert_eq!(parsed.states[0].color, Some(1));
    }

    #[test]
    fn edge_acceptance_marks_are_read() {
        let input = "HOA: v1\nStates: 1\nStart: 0\nAP: 0\n\
                     Acceptance: 1 Inf(0)\n--BODY--\n\
                     State: 0\n[t] 0 {0}\n--END--\n";
        let parsed = parse_automaton(input).unwrap();
        assert_eq!(parsed.states[0].color, None);
        assert_eq!(parsed.states[0].edges[0].2, Some(0));
    }
}
