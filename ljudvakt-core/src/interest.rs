//! Constraint predicates and typed interests over media-graph objects.
//!
//! Hooks declare what they react to as an [`ObjectInterest`]: a target type
//! tag plus an ordered conjunction of [`Constraint`]s evaluated against a
//! [`Properties`] bag. Evaluation is pure: the same interest against the
//! same bag always yields the same answer.

use std::cmp::Ordering;

use crate::properties::Properties;

/// Runtime type tag of a media-graph object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    /// Matches every type tag.
    Any,
    Client,
    Device,
    Link,
    Metadata,
    Node,
    Port,
    SessionItem,
}

impl ObjectType {
    /// Whether an interest targeting `self` accepts an object tagged `other`.
    pub fn accepts(self, other: ObjectType) -> bool {
        self == ObjectType::Any || self == other
    }
}

/// Which bag a constraint reads its value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintSubject {
    /// The object's own properties.
    Property,
    /// The daemon-global properties, when available.
    Global,
}

/// Comparison applied to the looked-up value.
///
/// Range operators compare numerically when both sides parse as numbers and
/// lexicographically otherwise.
#[derive(Debug, Clone)]
pub enum ConstraintVerb {
    Equals(String),
    NotEquals(String),
    InList(Vec<String>),
    /// Shell-style glob over the value (`*`, `?`, `[...]`, `[!...]`).
    Matches(String),
    IsPresent,
    IsAbsent,
    LessThan(String),
    LessEq(String),
    GreaterThan(String),
    GreaterEq(String),
}

/// A single predicate over a properties bag.
#[derive(Debug, Clone)]
pub struct Constraint {
    subject: ConstraintSubject,
    key: String,
    verb: ConstraintVerb,
}

impl Constraint {
    pub fn new(subject: ConstraintSubject, key: impl Into<String>, verb: ConstraintVerb) -> Self {
        Self {
            subject,
            key: key.into(),
            verb,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Evaluates the constraint.
    ///
    /// A missing key is false for every verb except [`ConstraintVerb::IsAbsent`].
    pub fn holds(&self, props: &Properties, global: Option<&Properties>) -> bool {
        let bag = match self.subject {
            ConstraintSubject::Property => Some(props),
            ConstraintSubject::Global => global,
        };
        let value = bag.and_then(|b| b.get(&self.key));

        let Some(value) = value else {
            return matches!(self.verb, ConstraintVerb::IsAbsent);
        };

        match &self.verb {
            ConstraintVerb::Equals(operand) => value == operand,
            ConstraintVerb::NotEquals(operand) => value != operand,
            ConstraintVerb::InList(operands) => operands.iter().any(|o| o == value),
            ConstraintVerb::Matches(pattern) => glob_match(pattern, value),
            ConstraintVerb::IsPresent => true,
            ConstraintVerb::IsAbsent => false,
            ConstraintVerb::LessThan(operand) => compare(value, operand) == Ordering::Less,
            ConstraintVerb::LessEq(operand) => compare(value, operand) != Ordering::Greater,
            ConstraintVerb::GreaterThan(operand) => compare(value, operand) == Ordering::Greater,
            ConstraintVerb::GreaterEq(operand) => compare(value, operand) != Ordering::Less,
        }
    }
}

/// Numeric comparison when both sides parse as numbers, lexicographic otherwise.
fn compare(value: &str, operand: &str) -> Ordering {
    match (value.parse::<f64>(), operand.parse::<f64>()) {
        (Ok(a), Ok(b)) => a.partial_cmp(&b).unwrap_or_else(|| value.cmp(operand)),
        _ => value.cmp(operand),
    }
}

/// A typed conjunction of constraints, immutable after construction.
#[derive(Debug, Clone)]
pub struct ObjectInterest {
    target: ObjectType,
    constraints: Vec<Constraint>,
}

impl ObjectInterest {
    /// Starts building an interest for objects tagged `target`.
    pub fn builder(target: ObjectType) -> InterestBuilder {
        InterestBuilder {
            target,
            constraints: Vec::new(),
        }
    }

    /// An interest with no constraints: matches every object of `target` type.
    pub fn any(target: ObjectType) -> Self {
        Self {
            target,
            constraints: Vec::new(),
        }
    }

    pub fn target(&self) -> ObjectType {
        self.target
    }

    /// Whether an object with the given tag and properties matches.
    ///
    /// Constraints are evaluated in insertion order with short-circuiting.
    pub fn matches(&self, tag: ObjectType, props: &Properties) -> bool {
        self.matches_with_globals(tag, props, None)
    }

    /// [`Self::matches`] with a daemon-global bag for `Global` constraints.
    pub fn matches_with_globals(
        &self,
        tag: ObjectType,
        props: &Properties,
        global: Option<&Properties>,
    ) -> bool {
        self.target.accepts(tag) && self.constraints.iter().all(|c| c.holds(props, global))
    }
}

/// Builder for [`ObjectInterest`].
pub struct InterestBuilder {
    target: ObjectType,
    constraints: Vec<Constraint>,
}

impl InterestBuilder {
    pub fn constraint(
        mut self,
        subject: ConstraintSubject,
        key: impl Into<String>,
        verb: ConstraintVerb,
    ) -> Self {
        self.constraints.push(Constraint::new(subject, key, verb));
        self
    }

    pub fn build(self) -> ObjectInterest {
        ObjectInterest {
            target: self.target,
            constraints: self.constraints,
        }
    }
}

/// Shell-style glob match (fnmatch dialect, no special path handling).
///
/// Supports `*`, `?`, and bracket classes with ranges and `[!...]`/`[^...]`
/// negation. An unterminated bracket matches a literal `[`.
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let pat: Vec<char> = pattern.chars().collect();
    let txt: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while t < txt.len() {
        let mut advanced = false;
        if p < pat.len() {
            match pat[p] {
                '*' => {
                    star = Some((p, t));
                    p += 1;
                    continue;
                }
                '?' => {
                    p += 1;
                    t += 1;
                    advanced = true;
                }
                '[' => match match_class(&pat, p, txt[t]) {
                    Some((true, next)) => {
                        p = next;
                        t += 1;
                        advanced = true;
                    }
                    Some((false, _)) => {}
                    None => {
                        if txt[t] == '[' {
                            p += 1;
                            t += 1;
                            advanced = true;
                        }
                    }
                },
                literal => {
                    if literal == txt[t] {
                        p += 1;
                        t += 1;
                        advanced = true;
                    }
                }
            }
        }
        if advanced {
            continue;
        }
        // Mismatch: resume after the last `*`, consuming one more character.
        match star {
            Some((star_p, star_t)) => {
                p = star_p + 1;
                t = star_t + 1;
                star = Some((star_p, star_t + 1));
            }
            None => return false,
        }
    }

    while p < pat.len() && pat[p] == '*' {
        p += 1;
    }
    p == pat.len()
}

/// Evaluates a bracket class starting at `pat[start] == '['`.
///
/// Returns `(matched, index past the class)`, or `None` when unterminated.
fn match_class(pat: &[char], start: usize, c: char) -> Option<(bool, usize)> {
    let mut i = start + 1;
    let negated = matches!(pat.get(i), Some('!') | Some('^'));
    if negated {
        i += 1;
    }
    let mut matched = false;
    let mut first = true;
    while i < pat.len() {
        if pat[i] == ']' && !first {
            return Some((matched != negated, i + 1));
        }
        first = false;
        if i + 2 < pat.len() && pat[i + 1] == '-' && pat[i + 2] != ']' {
            if pat[i] <= c && c <= pat[i + 2] {
                matched = true;
            }
            i += 3;
        } else {
            if pat[i] == c {
                matched = true;
            }
            i += 1;
        }
    }
    None
}
