/*
    This module is for storing and manipulating rule bodies
*/

pub mod optimizer;

use std::fmt::Display;

pub use optimizer::optimize;

// A named leaf. The id is 0 until the compiler interns the name.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Leaf {
    pub name: String,
    pub id: u32,
}

impl Leaf {
    pub fn new(name: impl Into<String>) -> Self {
        Leaf {
            name: name.into(),
            id: 0,
        }
    }
}

// The body of a rule. Only composites have children, only leaves have names.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Node {
    Sequence(Vec<Node>),
    Alternation(Vec<Node>),
    Optional(Vec<Node>),
    Repetition(Vec<Node>),
    Literal(Leaf),
    RuleRef(Leaf),
    ListRef(Leaf),
}

impl Node {
    pub fn literal(name: impl Into<String>) -> Self {
        Node::Literal(Leaf::new(name))
    }

    pub fn rule(name: impl Into<String>) -> Self {
        Node::RuleRef(Leaf::new(name))
    }

    pub fn list(name: impl Into<String>) -> Self {
        Node::ListRef(Leaf::new(name))
    }

    pub fn children(&self) -> &[Node] {
        match self {
            Node::Sequence(c) | Node::Alternation(c) | Node::Optional(c) | Node::Repetition(c) => c,
            _ => &[],
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<Node>> {
        match self {
            Node::Sequence(c) | Node::Alternation(c) | Node::Optional(c) | Node::Repetition(c) => Some(c),
            _ => None,
        }
    }

    pub fn leaf(&self) -> Option<&Leaf> {
        match self {
            Node::Literal(l) | Node::RuleRef(l) | Node::ListRef(l) => Some(l),
            _ => None,
        }
    }

    // Number of serialized records: composites get a start and an end record
    pub fn record_count(&self) -> usize {
        match self.leaf() {
            Some(_) => 1,
            None => 2 + self.children().iter().map(Node::record_count).sum::<usize>(),
        }
    }

    // Every rule name referenced anywhere below this node, in order
    pub fn rule_refs(&self) -> Vec<&str> {
        match self {
            Node::RuleRef(leaf) => vec![leaf.name.as_str()],
            _ => self.children().iter().flat_map(Node::rule_refs).collect(),
        }
    }

    fn dump(&self, f: &mut std::fmt::Formatter<'_>, level: usize) -> std::fmt::Result {
        let indent = "  ".repeat(level);
        let tag = match self {
            Node::Sequence(_) => "seq",
            Node::Alternation(_) => "alt",
            Node::Optional(_) => "opt",
            Node::Repetition(_) => "rep",
            Node::Literal(l) => return writeln!(f, "{}lit('{}')", indent, l.name),
            Node::RuleRef(l) => return writeln!(f, "{}rule('{}')", indent, l.name),
            Node::ListRef(l) => return writeln!(f, "{}list('{}')", indent, l.name),
        };
        writeln!(f, "{}<{}>", indent, tag)?;
        for child in self.children() {
            child.dump(f, level + 1)?;
        }
        writeln!(f, "{}</{}>", indent, tag)
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.dump(f, 0)
    }
}

// Random rule bodies for property tests
#[cfg(test)]
pub(crate) fn arb_node() -> impl proptest::strategy::Strategy<Value = Node> {
    use proptest::prelude::*;

    let leaf = prop_oneof![
        "[a-c]".prop_map(Node::literal),
        "[a-c]".prop_map(Node::rule),
        "[a-c]".prop_map(Node::list),
    ];
    leaf.prop_recursive(4, 32, 4, |inner| {
        let children = prop::collection::vec(inner, 1..4);
        prop_oneof![
            children.clone().prop_map(Node::Sequence),
            children.clone().prop_map(Node::Alternation),
            children.clone().prop_map(Node::Optional),
            children.prop_map(Node::Repetition),
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_records() {
        let node = Node::Sequence(vec![
            Node::literal("open"),
            Node::Optional(vec![Node::literal("the")]),
            Node::rule("door"),
        ]);
        // seq(2) + lit(1) + opt(2) + lit(1) + rule(1)
        assert_eq!(node.record_count(), 7);
        assert_eq!(Node::list("room").record_count(), 1);
    }

    #[test]
    fn collect_rule_refs() {
        let node = Node::Alternation(vec![
            Node::rule("a"),
            Node::Sequence(vec![Node::literal("x"), Node::rule("b")]),
            Node::list("c"),
        ]);
        assert_eq!(node.rule_refs(), vec!["a", "b"]);
    }

    #[test]
    fn dump_tree() {
        let node = Node::Sequence(vec![
            Node::literal("feed"),
            Node::Alternation(vec![Node::literal("cat"), Node::list("pets")]),
        ]);
        let answer = "<seq>\n  lit('feed')\n  <alt>\n    lit('cat')\n    list('pets')\n  </alt>\n</seq>\n";
        assert_eq!(node.to_string(), answer);
    }
}
