//! # Masking Engine
//!
//! Splits a string into kept text and hidden parts. Every hidden part is
//! shown as a replacement string. Masking produces two lists:
//!
//! ```text
//! visible = [v0, r0, v1, r1, ..., vn]     kept text alternating with replacements
//! hidden  = [h0, h1, ..., h(n-1)]
//!
//! original = v0 h0 v1 h1 ... vn
//! rendered = v0 r0 v1 r1 ... vn
//! ```
//!
//! A mask is given either as explicit character intervals, or as a regular
//! expression plus a substitution template. In the regex form, each capture
//! group must be followed directly by the next one, and together the groups
//! must cover the whole string. Groups the template references (`$n`) stay
//! visible. Every run of unreferenced groups becomes one hidden part, and the
//! template literal at that place becomes its replacement. `$$` is a literal
//! dollar sign.
//!
//! Patterns may be written bare or in slash form with flags, as in
//! `/^(.)(.*?)(@.)(.*?)(\..*)$/i`.

use regex::Regex;
use serde::{Deserialize, Serialize};

use recseal_core::PolicyError;

/// One hidden character range `[start, end)` and the text shown in its place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskInterval {
    /// First hidden character (inclusive).
    pub start: usize,
    /// End of the hidden range (exclusive).
    pub end: usize,
    /// Text shown instead of the hidden range.
    #[serde(default)]
    pub replacement: String,
}

impl MaskInterval {
    /// Convenience constructor.
    pub fn new(start: usize, end: usize, replacement: impl Into<String>) -> Self {
        Self {
            start,
            end,
            replacement: replacement.into(),
        }
    }
}

/// How to split a string into visible and hidden parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MaskSpec {
    /// Regular expression with a substitution template.
    Pattern {
        /// The expression, bare or as `/body/flags`.
        pattern: String,
        /// Template of `$n` references and literals.
        substitution: String,
    },
    /// Explicit, sorted, non-overlapping character intervals.
    Intervals {
        /// Hidden ranges.
        intervals: Vec<MaskInterval>,
    },
}

impl MaskSpec {
    /// Build a pattern mask.
    pub fn pattern(pattern: impl Into<String>, substitution: impl Into<String>) -> Self {
        MaskSpec::Pattern {
            pattern: pattern.into(),
            substitution: substitution.into(),
        }
    }

    /// Build an interval mask.
    pub fn intervals(intervals: Vec<MaskInterval>) -> Self {
        MaskSpec::Intervals { intervals }
    }

    /// True for regex specs, which may be applied through wildcard paths.
    pub fn is_pattern(&self) -> bool {
        matches!(self, MaskSpec::Pattern { .. })
    }

    /// Compile once for repeated application.
    pub fn compile(&self) -> Result<CompiledMask<'_>, PolicyError> {
        match self {
            MaskSpec::Intervals { intervals } => Ok(CompiledMask::Intervals(intervals)),
            MaskSpec::Pattern {
                pattern,
                substitution,
            } => {
                let regex = compile_pattern(pattern)?;
                let template = Template::parse(substitution, regex.captures_len() - 1)?;
                Ok(CompiledMask::Pattern { regex, template })
            }
        }
    }

    /// Split `value`.
    pub fn apply(&self, value: &str) -> Result<MaskedParts, PolicyError> {
        self.compile()?.apply(value)
    }
}

/// A [`MaskSpec`] ready to apply.
#[derive(Debug)]
pub enum CompiledMask<'a> {
    /// Interval form.
    Intervals(&'a [MaskInterval]),
    /// Regex form.
    Pattern {
        /// Compiled expression.
        regex: Regex,
        /// Parsed substitution.
        template: Template,
    },
}

impl CompiledMask<'_> {
    /// Split `value` into visible and hidden parts.
    pub fn apply(&self, value: &str) -> Result<MaskedParts, PolicyError> {
        match self {
            CompiledMask::Intervals(intervals) => apply_intervals(intervals, value),
            CompiledMask::Pattern { regex, template } => apply_pattern(regex, template, value),
        }
    }
}

/// The result of masking one string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskedParts {
    /// `[v0, r0, v1, r1, ..., vn]`.
    pub visible: Vec<String>,
    /// `[h0, ..., h(n-1)]`.
    pub hidden: Vec<String>,
}

impl MaskedParts {
    /// The original string.
    pub fn reconstruct(&self) -> String {
        reconstruct(&self.visible, &self.hidden)
    }

    /// The string as shown when masked.
    pub fn render(&self) -> String {
        render(&self.visible)
    }
}

/// Interleave kept text with hidden parts.
pub fn reconstruct(visible: &[String], hidden: &[String]) -> String {
    let mut out = String::new();
    for (i, kept) in visible.iter().step_by(2).enumerate() {
        out.push_str(kept);
        if let Some(h) = hidden.get(i) {
            out.push_str(h);
        }
    }
    out
}

/// Concatenate kept text and replacements.
pub fn render(visible: &[String]) -> String {
    visible.concat()
}

/// True if the two lists have the `2n + 1` / `n` shape.
pub fn is_well_formed(visible: &[String], hidden_count: usize) -> bool {
    visible.len() == 2 * hidden_count + 1
}

fn invalid(msg: impl Into<String>) -> PolicyError {
    PolicyError::InvalidMask(msg.into())
}

// ---------------------------------------------------------------------------
// Intervals
// ---------------------------------------------------------------------------

fn apply_intervals(intervals: &[MaskInterval], value: &str) -> Result<MaskedParts, PolicyError> {
    // Byte offset of every char boundary, including the end.
    let bounds: Vec<usize> = value
        .char_indices()
        .map(|(b, _)| b)
        .chain(std::iter::once(value.len()))
        .collect();
    let char_len = bounds.len() - 1;

    let mut visible = Vec::with_capacity(2 * intervals.len() + 1);
    let mut hidden = Vec::with_capacity(intervals.len());
    let mut cursor = 0usize;
    for iv in intervals {
        if iv.start >= iv.end {
            return Err(invalid(format!("empty interval [{}, {})", iv.start, iv.end)));
        }
        if iv.end > char_len {
            return Err(invalid(format!(
                "interval [{}, {}) exceeds string length {char_len}",
                iv.start, iv.end
            )));
        }
        if iv.start < cursor {
            return Err(invalid(format!(
                "interval [{}, {}) overlaps or precedes the previous one",
                iv.start, iv.end
            )));
        }
        visible.push(value[bounds[cursor]..bounds[iv.start]].to_string());
        visible.push(iv.replacement.clone());
        hidden.push(value[bounds[iv.start]..bounds[iv.end]].to_string());
        cursor = iv.end;
    }
    visible.push(value[bounds[cursor]..].to_string());
    Ok(MaskedParts { visible, hidden })
}

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

/// Accept `/body/flags` as well as a bare expression.
fn compile_pattern(pattern: &str) -> Result<Regex, PolicyError> {
    let (body, flags) = match pattern.strip_prefix('/').and_then(|p| p.rsplit_once('/')) {
        Some((body, flags)) => (body, flags),
        None => (pattern, ""),
    };
    let mut inline = String::new();
    for flag in flags.chars() {
        match flag {
            'i' | 'm' | 's' => inline.push(flag),
            // Global and unicode matching change nothing for a single anchored match.
            'g' | 'u' => {}
            other => return Err(invalid(format!("unsupported pattern flag {other:?}"))),
        }
    }
    let source = if inline.is_empty() {
        body.to_string()
    } else {
        format!("(?{inline}){body}")
    };
    Regex::new(&source).map_err(|e| invalid(format!("bad pattern {pattern:?}: {e}")))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Group(usize),
    Literal(String),
}

/// A parsed substitution: referenced groups in increasing order, and the
/// literal before, between and after them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    refs: Vec<usize>,
    /// `refs.len() + 1` literals.
    literals: Vec<String>,
    groups: usize,
}

impl Template {
    /// Parse `template` against a pattern with `groups` capture groups.
    pub fn parse(template: &str, groups: usize) -> Result<Self, PolicyError> {
        let mut tokens = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '$' {
                literal.push(c);
                continue;
            }
            match chars.peek() {
                Some('$') => {
                    chars.next();
                    literal.push('$');
                }
                Some(d) if d.is_ascii_digit() => {
                    let mut digits = String::new();
                    while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                        digits.push(d);
                        chars.next();
                    }
                    let n: usize = digits
                        .parse()
                        .map_err(|_| invalid(format!("group reference ${digits} out of range")))?;
                    if !literal.is_empty() {
                        tokens.push(Token::Literal(std::mem::take(&mut literal)));
                    }
                    tokens.push(Token::Group(n));
                }
                _ => return Err(invalid("`$` must be followed by a group number or `$`")),
            }
        }
        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }

        let mut refs = Vec::new();
        let mut literals = vec![String::new()];
        for token in tokens {
            match token {
                Token::Literal(text) => {
                    if let Some(last) = literals.last_mut() {
                        last.push_str(&text);
                    }
                }
                Token::Group(n) => {
                    if n == 0 || n > groups {
                        return Err(invalid(format!(
                            "group reference ${n} out of range (pattern has {groups} groups)"
                        )));
                    }
                    if refs.last().is_some_and(|&prev| n <= prev) {
                        return Err(invalid(format!("group reference ${n} is out of order")));
                    }
                    refs.push(n);
                    literals.push(String::new());
                }
            }
        }
        Ok(Self {
            refs,
            literals,
            groups,
        })
    }
}

fn apply_pattern(regex: &Regex, template: &Template, value: &str) -> Result<MaskedParts, PolicyError> {
    let caps = regex
        .captures(value)
        .ok_or_else(|| invalid(format!("pattern does not match {value:?}")))?;

    // Group texts, checked to tile the whole string in order.
    let mut texts = Vec::with_capacity(template.groups);
    let mut cursor = 0usize;
    for g in 1..=template.groups {
        let m = caps
            .get(g)
            .ok_or_else(|| invalid(format!("group {g} did not participate in the match")))?;
        if m.start() != cursor {
            return Err(invalid(format!(
                "group {g} does not start where the previous group ended"
            )));
        }
        cursor = m.end();
        texts.push(m.as_str());
    }
    if cursor != value.len() {
        return Err(invalid("capture groups do not cover the whole string"));
    }

    let text_of = |from: usize, to: usize| -> String { texts[from - 1..to - 1].concat() };

    let mut visible = vec![String::new()];
    let mut hidden = Vec::new();
    let m = template.refs.len();
    for j in 0..=m {
        let lo = if j == 0 { 1 } else { template.refs[j - 1] + 1 };
        let hi = if j == m { template.groups + 1 } else { template.refs[j] };
        let literal = &template.literals[j];
        if lo < hi {
            hidden.push(text_of(lo, hi));
            visible.push(literal.clone());
            visible.push(String::new());
        } else if !literal.is_empty() {
            return Err(invalid(format!(
                "literal {literal:?} sits between adjacent visible groups"
            )));
        }
        if j < m {
            let g = template.refs[j];
            if let Some(last) = visible.last_mut() {
                last.push_str(texts[g - 1]);
            }
        }
    }
    Ok(MaskedParts { visible, hidden })
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMAIL: &str = r"/^(.)(.*?)(@.)(.*?)(\..*)$/";

    #[test]
    fn email_pattern() {
        let parts = MaskSpec::pattern(EMAIL, "$1***$3***$5")
            .apply("secret@example.com")
            .unwrap();
        assert_eq!(parts.visible, vec!["s", "***", "@e", "***", ".com"]);
        assert_eq!(parts.hidden, vec!["ecret", "xample"]);
        assert_eq!(parts.render(), "s***@e***.com");
        assert_eq!(parts.reconstruct(), "secret@example.com");
    }

    #[test]
    fn intervals_use_char_positions() {
        let spec = MaskSpec::intervals(vec![MaskInterval::new(1, 3, "**"), MaskInterval::new(4, 5, "")]);
        let parts = spec.apply("héllo").unwrap();
        assert_eq!(parts.visible, vec!["h", "**", "l", "", ""]);
        assert_eq!(parts.hidden, vec!["él", "o"]);
        assert_eq!(parts.reconstruct(), "héllo");
        assert_eq!(parts.render(), "h**l");
    }

    #[test]
    fn no_intervals_keeps_everything() {
        let parts = MaskSpec::intervals(vec![]).apply("abc").unwrap();
        assert_eq!(parts.visible, vec!["abc"]);
        assert!(parts.hidden.is_empty());
    }

    #[test]
    fn bad_intervals_rejected() {
        let cases = [
            vec![MaskInterval::new(2, 2, "")],
            vec![MaskInterval::new(0, 9, "")],
            vec![MaskInterval::new(2, 3, ""), MaskInterval::new(1, 2, "")],
            vec![MaskInterval::new(0, 2, ""), MaskInterval::new(1, 3, "")],
        ];
        for intervals in cases {
            assert!(matches!(
                MaskSpec::intervals(intervals).apply("abcd"),
                Err(PolicyError::InvalidMask(_))
            ));
        }
    }

    #[test]
    fn template_rules() {
        // Not in increasing order.
        assert!(Template::parse("$2$1", 2).is_err());
        // Unknown group.
        assert!(Template::parse("$3", 2).is_err());
        assert!(Template::parse("$0", 2).is_err());
        // Dangling dollar.
        assert!(Template::parse("a$", 2).is_err());
        // Escaped dollar is a literal.
        let t = Template::parse("$1$$", 2).unwrap();
        assert_eq!(t.literals, vec!["".to_string(), "$".to_string()]);
    }

    #[test]
    fn literal_between_visible_groups_rejected() {
        let err = MaskSpec::pattern("^(a)(b)$", "$1-$2").apply("ab").unwrap_err();
        assert!(matches!(err, PolicyError::InvalidMask(_)));
    }

    #[test]
    fn groups_must_tile_the_string() {
        // Gap between groups.
        assert!(MaskSpec::pattern("^(a)x(b)$", "$1").apply("axb").is_err());
        // Trailing text outside any group.
        assert!(MaskSpec::pattern("^(a)(b)", "$1").apply("abc").is_err());
        // No match at all.
        assert!(MaskSpec::pattern("^z$", "").apply("abc").is_err());
    }

    #[test]
    fn unreferenced_pattern_hides_everything() {
        let parts = MaskSpec::pattern("^(.*)$", "[hidden]").apply("abc").unwrap();
        assert_eq!(parts.visible, vec!["", "[hidden]", ""]);
        assert_eq!(parts.hidden, vec!["abc"]);
    }

    #[test]
    fn slash_flags() {
        let parts = MaskSpec::pattern("/^(A)(.*)$/i", "$1#").apply("abc").unwrap();
        assert_eq!(parts.render(), "a#");
        assert!(MaskSpec::pattern("/^(a)$/x", "$1").apply("a").is_err());
    }

    #[test]
    fn mask_spec_yaml_forms() {
        let spec: MaskSpec = serde_yaml::from_str("pattern: '^(.)(.*)$'\nsubstitution: '$1*'\n").unwrap();
        assert!(spec.is_pattern());
        let spec: MaskSpec =
            serde_yaml::from_str("intervals:\n  - { start: 0, end: 1, replacement: '#' }\n").unwrap();
        assert_eq!(spec, MaskSpec::intervals(vec![MaskInterval::new(0, 1, "#")]));
    }
}
