//! Resolution of `this`-rooted path expressions against a record tree.

use std::collections::BTreeSet;

use recseal_core::{NodePath, PathExpr, PolicyError, Segment, Selector};

use crate::node::Node;

/// Resolve one expression to the concrete paths it names.
///
/// A wildcard over an empty container resolves to nothing. Every other miss
/// is an error.
pub fn resolve(root: &Node, expr: &PathExpr) -> Result<Vec<NodePath>, PolicyError> {
    let mut frontier = vec![(NodePath::root(), root)];
    for selector in expr.selectors() {
        let mut next = Vec::with_capacity(frontier.len());
        for (path, node) in frontier {
            match (selector, node) {
                (Selector::Member(name), Node::Object(obj)) => {
                    let child = obj
                        .members()
                        .get(name)
                        .ok_or_else(|| PolicyError::PathNotFound(expr.to_string()))?;
                    next.push((path.child(Segment::Member(name.clone())), child));
                }
                (Selector::Index(i), Node::Array(arr)) => {
                    let child = arr
                        .items()
                        .get(i)
                        .ok_or_else(|| PolicyError::PathNotFound(expr.to_string()))?;
                    next.push((path.child(Segment::Index(*i)), child));
                }
                (Selector::AnyMember, Node::Object(obj)) => {
                    for (name, child) in obj.members() {
                        next.push((path.child(Segment::Member(name.clone())), child));
                    }
                }
                (Selector::AnyIndex, Node::Array(arr)) => {
                    for (&i, child) in arr.items() {
                        next.push((path.child(Segment::Index(i)), child));
                    }
                }
                _ => return Err(PolicyError::PathNotFound(expr.to_string())),
            }
        }
        frontier = next;
    }
    Ok(frontier.into_iter().map(|(path, _)| path).collect())
}

/// Resolve a comma-separated list, keeping first-seen order and dropping
/// repeats.
pub fn resolve_list(root: &Node, list: &str, allow_wildcard: bool) -> Result<Vec<NodePath>, PolicyError> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for expr in PathExpr::parse_list(list)? {
        if !allow_wildcard && expr.has_wildcard() {
            return Err(PolicyError::WildcardNotAllowed(expr.to_string()));
        }
        for path in resolve(root, &expr)? {
            if seen.insert(path.clone()) {
                out.push(path);
            }
        }
    }
    Ok(out)
}
