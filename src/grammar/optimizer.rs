use itertools::Itertools;

use super::{Leaf, Node};

// Merges runs of adjacent literals into one space-joined literal.
// Alternation is left alone, its literal children are separate choices.
fn combine_literals(node: &mut Node) {
    let children = match node {
        Node::Sequence(c) | Node::Optional(c) | Node::Repetition(c) if c.len() > 1 => c,
        _ => return,
    };

    let mut combined = Vec::with_capacity(children.len());
    for (is_literal, run) in &std::mem::take(children)
        .into_iter()
        .chunk_by(|child| matches!(child, Node::Literal(_)))
    {
        if is_literal {
            let text = run
                .filter_map(|child| match child {
                    Node::Literal(leaf) => Some(leaf.name),
                    _ => None,
                })
                .join(" ");
            combined.push(Node::Literal(Leaf::new(text)));
        } else {
            combined.extend(run);
        }
    }
    *children = combined;
}

fn optimize_node(mut node: Node, top: bool) -> Node {
    if let Some(children) = node.children_mut() {
        *children = std::mem::take(children)
            .into_iter()
            .map(|child| optimize_node(child, false))
            .collect();
    }
    combine_literals(&mut node);

    // Optional is never collapsed, it still carries the skip choice
    match node {
        Node::Sequence(mut c) | Node::Alternation(mut c) if c.len() == 1 && !top => c.remove(0),
        other => other,
    }
}

// Rewrites a rule body into its smallest equivalent form. The root itself is
// never collapsed.
pub fn optimize(root: &mut Node) {
    let node = std::mem::replace(root, Node::Sequence(Vec::new()));
    *root = optimize_node(node, true);
}
