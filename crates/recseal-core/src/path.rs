//! # Record Paths
//!
//! Two related notions live here:
//!
//! - [`NodePath`]: the concrete address of one node, rendered with `.name`
//!   and `[index]` separators and the root omitted (`""`, `.a`,
//!   `.items[2].email`). The rendered form is what goes into Merkle leaf
//!   tags, so its grammar is part of the commitment format.
//! - [`PathExpr`]: a caller-supplied selector rooted at `this`, such as
//!   `this.items[*].email`, with at most one `*` wildcard. Lists of
//!   expressions are comma-separated.

use std::fmt;

use crate::error::PolicyError;

/// One step of a concrete node path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Segment {
    /// Object member by name.
    Member(String),
    /// Array entry by index.
    Index(u32),
}

impl Segment {
    /// Characters a member name may not contain. Rendered paths are not
    /// escaped, so these would let two shapes share one leaf tag.
    pub const RESERVED: [char; 3] = ['.', '[', ']'];

    /// True if `name` renders unambiguously as a `.name` step.
    pub fn is_valid_member(name: &str) -> bool {
        !name.contains(Self::RESERVED)
    }
}

/// Concrete address of a node from the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodePath(Vec<Segment>);

impl NodePath {
    /// The root path.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// True for the root.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Segments from the root down.
    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    /// The node's identity in its parent, `None` for the root.
    pub fn last(&self) -> Option<&Segment> {
        self.0.last()
    }

    /// Descend one level.
    pub fn push(&mut self, segment: Segment) {
        self.0.push(segment);
    }

    /// Ascend one level.
    pub fn pop(&mut self) -> Option<Segment> {
        self.0.pop()
    }

    /// A new path one level below this one.
    pub fn child(&self, segment: Segment) -> Self {
        let mut out = self.clone();
        out.push(segment);
        out
    }

    /// Rendered form used in leaf tags.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for seg in &self.0 {
            match seg {
                Segment::Member(name) => write!(f, ".{name}")?,
                Segment::Index(i) => write!(f, "[{i}]")?,
            }
        }
        Ok(())
    }
}

impl FromIterator<Segment> for NodePath {
    fn from_iter<I: IntoIterator<Item = Segment>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One step of a path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// `.name`
    Member(String),
    /// `[n]`
    Index(u32),
    /// `.*`: every member of an object.
    AnyMember,
    /// `[*]`: every entry of an array.
    AnyIndex,
}

/// A parsed `this`-rooted path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpr {
    source: String,
    selectors: Vec<Selector>,
}

impl PathExpr {
    /// Parse one expression.
    pub fn parse(expr: &str) -> Result<Self, PolicyError> {
        let source = expr.trim();
        let invalid = |why: &str| PolicyError::InvalidPath(format!("{source:?}: {why}"));

        let rest = source
            .strip_prefix("this")
            .ok_or_else(|| invalid("must start with `this`"))?;

        let mut selectors = Vec::new();
        let mut chars = rest.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            match c {
                '.' => {
                    let start = i + 1;
                    let mut end = rest.len();
                    while let Some(&(j, n)) = chars.peek() {
                        if n == '.' || n == '[' {
                            end = j;
                            break;
                        }
                        if n == ']' {
                            return Err(invalid("unbalanced `]`"));
                        }
                        chars.next();
                    }
                    let name = &rest[start..end];
                    match name {
                        "" => return Err(invalid("empty member name")),
                        "*" => selectors.push(Selector::AnyMember),
                        _ => selectors.push(Selector::Member(name.to_string())),
                    }
                }
                '[' => {
                    let start = i + 1;
                    let mut end = None;
                    for (j, n) in chars.by_ref() {
                        if n == ']' {
                            end = Some(j);
                            break;
                        }
                    }
                    let end = end.ok_or_else(|| invalid("missing `]`"))?;
                    let inner = rest[start..end].trim();
                    if inner == "*" {
                        selectors.push(Selector::AnyIndex);
                    } else {
                        let idx = inner
                            .parse::<u32>()
                            .map_err(|_| invalid("array index must be a number or `*`"))?;
                        selectors.push(Selector::Index(idx));
                    }
                }
                _ => return Err(invalid("expected `.` or `[`")),
            }
        }

        let wildcards = selectors
            .iter()
            .filter(|s| matches!(s, Selector::AnyMember | Selector::AnyIndex))
            .count();
        if wildcards > 1 {
            return Err(invalid("at most one wildcard is allowed"));
        }

        Ok(Self {
            source: source.to_string(),
            selectors,
        })
    }

    /// Parse a comma-separated list of expressions.
    pub fn parse_list(list: &str) -> Result<Vec<Self>, PolicyError> {
        let exprs = list
            .split(',')
            .map(Self::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(exprs)
    }

    /// Steps after `this`.
    pub fn selectors(&self) -> &[Selector] {
        &self.selectors
    }

    /// True if a `*` appears anywhere.
    pub fn has_wildcard(&self) -> bool {
        self.selectors
            .iter()
            .any(|s| matches!(s, Selector::AnyMember | Selector::AnyIndex))
    }

    /// The expression as written (trimmed).
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for PathExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_node_paths() {
        assert_eq!(NodePath::root().render(), "");
        let p: NodePath = [
            Segment::Member("items".into()),
            Segment::Index(2),
            Segment::Member("email".into()),
        ]
        .into_iter()
        .collect();
        assert_eq!(p.render(), ".items[2].email");
        assert_eq!(p.last(), Some(&Segment::Member("email".into())));
    }

    #[test]
    fn member_names_exclude_separators() {
        assert!(Segment::is_valid_member("email"));
        assert!(Segment::is_valid_member(""));
        assert!(Segment::is_valid_member("a b-c"));
        for bad in ["a.b", "a[0]", "]", "[", "."] {
            assert!(!Segment::is_valid_member(bad), "{bad}");
        }
    }

    #[test]
    fn parse_simple_expressions() {
        let e = PathExpr::parse("this").unwrap();
        assert!(e.selectors().is_empty());

        let e = PathExpr::parse(" this.a.b[3] ").unwrap();
        assert_eq!(
            e.selectors(),
            &[
                Selector::Member("a".into()),
                Selector::Member("b".into()),
                Selector::Index(3)
            ]
        );
        assert!(!e.has_wildcard());
        assert_eq!(e.as_str(), "this.a.b[3]");
    }

    #[test]
    fn parse_wildcards() {
        let e = PathExpr::parse("this.items[*].email").unwrap();
        assert!(e.has_wildcard());
        assert_eq!(e.selectors()[1], Selector::AnyIndex);

        let e = PathExpr::parse("this.*").unwrap();
        assert_eq!(e.selectors(), &[Selector::AnyMember]);

        assert!(matches!(
            PathExpr::parse("this.*[*]"),
            Err(PolicyError::InvalidPath(_))
        ));
    }

    #[test]
    fn parse_rejects_malformed() {
        for bad in ["a.b", "this.", "this..a", "this[", "this[x]", "thisx", "this.a]", "this[-1]"] {
            assert!(
                matches!(PathExpr::parse(bad), Err(PolicyError::InvalidPath(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn parse_list_splits_on_commas() {
        let list = PathExpr::parse_list("this.a, this.b[0] ,this.c").unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list[1].as_str(), "this.b[0]");
        assert!(PathExpr::parse_list("this.a,,this.b").is_err());
    }
}
