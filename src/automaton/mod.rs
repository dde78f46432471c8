/*
    This module turns rule bodies into automata used to re-derive rule
    structure from a flat list of recognized words
*/

use std::fmt::Write;

use crate::grammar::{Leaf, Node};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LeafId(pub usize);

// Where a state continues. End means a match may stop here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    State(StateId),
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafKind {
    Literal,
    Rule,
    List,
}

// The part of an AST leaf the matcher needs, kept alive with the grammar
#[derive(Debug, Clone, PartialEq)]
pub struct Terminal {
    pub kind: LeafKind,
    pub leaf: Leaf,
}

#[derive(Debug, Clone, PartialEq)]
pub enum State {
    Branch(Vec<Edge>),
    Leaf { leaf: LeafId, next: Edge },
    // Placeholder for an imported rule. It has no edges.
    Stub { leaf: LeafId },
}

impl State {
    pub fn edges(&self) -> &[Edge] {
        match self {
            State::Branch(edges) => edges,
            State::Leaf { next, .. } => std::slice::from_ref(next),
            State::Stub { .. } => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Automaton {
    states: Vec<State>,
    entry: Edge,
}

impl Automaton {
    // Compiles an optimized rule body. Leaves are appended to `leaves` and the
    // states refer to them by index.
    pub fn compile(root: &Node, leaves: &mut Vec<Terminal>) -> Self {
        let mut builder = Builder {
            states: Vec::new(),
            leaves,
        };
        let entry = builder.compile(root, Edge::End);
        Automaton {
            states: builder.states,
            entry,
        }
    }

    pub fn import(leaf: LeafId) -> Self {
        Automaton {
            states: vec![State::Stub { leaf }],
            entry: Edge::State(StateId(0)),
        }
    }

    pub fn entry(&self) -> Edge {
        self.entry
    }

    pub fn state(&self, id: StateId) -> &State {
        &self.states[id.0]
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    // The stub leaf of an imported rule, None for rules with a body
    pub fn import_leaf(&self) -> Option<LeafId> {
        match self.states.as_slice() {
            [State::Stub { leaf }] => Some(*leaf),
            _ => None,
        }
    }

    pub fn is_import(&self) -> bool {
        self.import_leaf().is_some()
    }

    pub fn dump(&self, leaves: &[Terminal]) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "start -> {}", edge_label(self.entry));
        for (index, state) in self.states.iter().enumerate() {
            let head = match state {
                State::Branch(_) => "branch".to_string(),
                State::Leaf { leaf, .. } | State::Stub { leaf } => terminal_label(&leaves[leaf.0]),
            };
            let edges = state.edges().iter().map(|e| edge_label(*e)).collect::<Vec<_>>();
            if edges.is_empty() {
                let _ = writeln!(out, "#{} {}", index, head);
            } else {
                let _ = writeln!(out, "#{} {} -> {}", index, head, edges.join(" | "));
            }
        }
        out
    }
}

fn edge_label(edge: Edge) -> String {
    match edge {
        Edge::State(id) => format!("#{}", id.0),
        Edge::End => "end".to_string(),
    }
}

fn terminal_label(terminal: &Terminal) -> String {
    match terminal.kind {
        LeafKind::Literal => format!("\"{}\"", terminal.leaf.name),
        LeafKind::Rule => format!("<{}>", terminal.leaf.name),
        LeafKind::List => format!("{{{}}}", terminal.leaf.name),
    }
}

struct Builder<'a> {
    states: Vec<State>,
    leaves: &'a mut Vec<Terminal>,
}

impl Builder<'_> {
    fn push(&mut self, state: State) -> Edge {
        self.states.push(state);
        Edge::State(StateId(self.states.len() - 1))
    }

    fn leaf(&mut self, kind: LeafKind, leaf: &Leaf, next: Edge) -> Edge {
        self.leaves.push(Terminal {
            kind,
            leaf: leaf.clone(),
        });
        let leaf = LeafId(self.leaves.len() - 1);
        self.push(State::Leaf { leaf, next })
    }

    // Children in order, each one continuing into the next
    fn chain(&mut self, children: &[Node], next: Edge) -> Edge {
        children
            .iter()
            .rev()
            .fold(next, |next, child| self.compile(child, next))
    }

    // Returns the entry of `node`, which continues into `next` once it matched
    fn compile(&mut self, node: &Node, next: Edge) -> Edge {
        match node {
            Node::Sequence(children) => self.chain(children, next),
            Node::Alternation(children) => {
                let edges = children.iter().map(|child| self.compile(child, next)).collect();
                self.push(State::Branch(edges))
            }
            Node::Optional(children) => {
                let body = self.chain(children, next);
                self.push(State::Branch(vec![body, next]))
            }
            Node::Repetition(children) => {
                // The loop branch exists before its body so the body can point back at it
                let repeat = self.push(State::Branch(Vec::new()));
                let body = self.chain(children, repeat);
                if let Edge::State(id) = repeat {
                    self.states[id.0] = State::Branch(vec![body, next]);
                }
                repeat
            }
            Node::Literal(leaf) => self.leaf(LeafKind::Literal, leaf, next),
            Node::RuleRef(leaf) => self.leaf(LeafKind::Rule, leaf, next),
            Node::ListRef(leaf) => self.leaf(LeafKind::List, leaf, next),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compiled(node: &Node) -> (Automaton, Vec<Terminal>) {
        let mut leaves = Vec::new();
        let automaton = Automaton::compile(node, &mut leaves);
        (automaton, leaves)
    }

    fn leaf_at(automaton: &Automaton, edge: Edge) -> (LeafId, Edge) {
        match edge {
            Edge::State(id) => match automaton.state(id) {
                State::Leaf { leaf, next } => (*leaf, *next),
                other => panic!("expected a leaf, found {:?}", other),
            },
            Edge::End => panic!("expected a leaf, found end"),
        }
    }

    fn branch_at(automaton: &Automaton, edge: Edge) -> Vec<Edge> {
        match edge {
            Edge::State(id) => match automaton.state(id) {
                State::Branch(edges) => edges.clone(),
                other => panic!("expected a branch, found {:?}", other),
            },
            Edge::End => panic!("expected a branch, found end"),
        }
    }

    #[test]
    fn sequence_chains_leaves() {
        let (automaton, leaves) = compiled(&Node::Sequence(vec![
            Node::literal("open"),
            Node::rule("door"),
        ]));
        let (first, next) = leaf_at(&automaton, automaton.entry());
        let (second, end) = leaf_at(&automaton, next);

        assert_eq!(leaves[first.0].leaf.name, "open");
        assert_eq!(leaves[second.0].kind, LeafKind::Rule);
        assert_eq!(end, Edge::End);
    }

    #[test]
    fn alternation_shares_continuation() {
        let (automaton, _) = compiled(&Node::Sequence(vec![
            Node::Alternation(vec![Node::literal("red"), Node::literal("blue")]),
            Node::literal("car"),
        ]));
        let edges = branch_at(&automaton, automaton.entry());
        assert_eq!(edges.len(), 2);

        let (_, after_red) = leaf_at(&automaton, edges[0]);
        let (_, after_blue) = leaf_at(&automaton, edges[1]);
        assert_eq!(after_red, after_blue);
        assert_eq!(leaf_at(&automaton, after_red).1, Edge::End);
    }

    #[test]
    fn optional_can_skip() {
        let (automaton, _) = compiled(&Node::Optional(vec![Node::literal("the")]));
        let edges = branch_at(&automaton, automaton.entry());
        assert_eq!(edges[1], Edge::End);
        assert_eq!(leaf_at(&automaton, edges[0]).1, Edge::End);
    }

    #[test]
    fn repetition_loops_back() {
        let (automaton, _) = compiled(&Node::Repetition(vec![Node::literal("ping")]));
        let entry = automaton.entry();
        let edges = branch_at(&automaton, entry);

        assert_eq!(edges[1], Edge::End);
        let (_, after_ping) = leaf_at(&automaton, edges[0]);
        assert_eq!(after_ping, entry);
    }

    #[test]
    fn import_is_a_stub() {
        let automaton = Automaton::import(LeafId(3));
        assert!(automaton.is_import());
        assert_eq!(automaton.import_leaf(), Some(LeafId(3)));
        assert!(automaton.state(StateId(0)).edges().is_empty());

        let (automaton, _) = compiled(&Node::rule("x"));
        assert!(!automaton.is_import());
    }

    #[test]
    fn dump_states() {
        let (automaton, leaves) = compiled(&Node::Repetition(vec![Node::literal("ping")]));
        assert_eq!(
            automaton.dump(&leaves),
            "start -> #0\n#0 branch -> #1 | end\n#1 \"ping\" -> #0\n"
        );
    }
}
