//! Match and binding patterns.

use crate::path::{Hygiene, Path};
use ferric_diagnostics::Span;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindingMode {
    Move,
    Ref,
    RefMut,
}

/// A name introduced by a pattern. The slot is allocated during
/// resolution; within one arm group every alternative introduces the same
/// names in the same slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternBinding {
    pub name: String,
    pub hygiene: Hygiene,
    pub mode: BindingMode,
    pub slot: Option<u32>,
}

impl PatternBinding {
    pub fn new(name: &str) -> Self {
        PatternBinding {
            name: name.to_string(),
            hygiene: Hygiene::source(),
            mode: BindingMode::Move,
            slot: None,
        }
    }
}

/// Constants that may appear in value and range patterns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PatternValue {
    Integer(i128),
    Float(f64),
    Bool(bool),
    Char(char),
    Str(String),
    ByteStr(Vec<u8>),
    /// A named constant, unit struct, or unit enum variant
    Named(Path),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PatternKind {
    /// `_`
    Any,
    /// A lone identifier: binds a variable, unless resolution finds a
    /// unit variant/struct or constant of that name
    MaybeBind { name: String, hygiene: Hygiene },
    /// A literal or named constant
    Value { value: PatternValue },
    /// `lo ..= hi`
    Range {
        start: PatternValue,
        end: PatternValue,
    },
    /// `(a, b, c)`
    Tuple(Vec<Pattern>),
    /// `Some(x)` - tuple struct or tuple enum variant
    StructTuple { path: Path, elems: Vec<Pattern> },
    /// `Point { x, y, .. }`
    Struct {
        path: Path,
        fields: Vec<(String, Pattern)>,
        exhaustive: bool,
    },
    /// `[a, b, c]`
    Slice(Vec<Pattern>),
    /// `[a, rest @ .., z]`
    SplitSlice {
        leading: Vec<Pattern>,
        middle: Option<PatternBinding>,
        trailing: Vec<Pattern>,
    },
    /// `a | b | c`
    Or(Vec<Pattern>),
    /// `&pat` / `&mut pat`
    Ref { is_mut: bool, inner: Box<Pattern> },
    /// `box pat`
    Box_ { inner: Box<Pattern> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub span: Span,
    /// `name @ kind` - also produced when a MaybeBind turns out to be a
    /// binding
    pub binding: Option<PatternBinding>,
    pub kind: PatternKind,
}

impl Pattern {
    pub fn new(kind: PatternKind) -> Self {
        Pattern {
            span: Span::synthetic(),
            binding: None,
            kind,
        }
    }

    pub fn any() -> Self {
        Pattern::new(PatternKind::Any)
    }

    /// A plain identifier pattern, to be disambiguated by resolution
    pub fn maybe_bind(name: &str) -> Self {
        Pattern::new(PatternKind::MaybeBind {
            name: name.to_string(),
            hygiene: Hygiene::source(),
        })
    }

    /// An identifier pattern known to bind (used by desugarings, which
    /// introduce variables that must never be mistaken for constants)
    pub fn bind(name: &str, hygiene: Hygiene) -> Self {
        Pattern {
            span: Span::synthetic(),
            binding: Some(PatternBinding {
                name: name.to_string(),
                hygiene,
                mode: BindingMode::Move,
                slot: None,
            }),
            kind: PatternKind::Any,
        }
    }

    /// Collect the names of every binding this pattern introduces,
    /// depth-first.
    pub fn binding_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_binding_names(&mut names);
        names
    }

    fn collect_binding_names(&self, names: &mut Vec<String>) {
        if let Some(b) = &self.binding {
            names.push(b.name.clone());
        }
        match &self.kind {
            PatternKind::Any
            | PatternKind::Value { .. }
            | PatternKind::Range { .. } => {}
            PatternKind::MaybeBind { name, .. } => names.push(name.clone()),
            PatternKind::Tuple(pats) | PatternKind::Slice(pats) => {
                for p in pats {
                    p.collect_binding_names(names);
                }
            }
            PatternKind::StructTuple { elems, .. } => {
                for p in elems {
                    p.collect_binding_names(names);
                }
            }
            PatternKind::Struct { fields, .. } => {
                for (_, p) in fields {
                    p.collect_binding_names(names);
                }
            }
            PatternKind::SplitSlice {
                leading,
                middle,
                trailing,
            } => {
                for p in leading {
                    p.collect_binding_names(names);
                }
                if let Some(b) = middle {
                    names.push(b.name.clone());
                }
                for p in trailing {
                    p.collect_binding_names(names);
                }
            }
            PatternKind::Or(alts) => {
                // All alternatives bind the same set; take the first
                if let Some(first) = alts.first() {
                    first.collect_binding_names(names);
                }
            }
            PatternKind::Ref { inner, .. } | PatternKind::Box_ { inner } => {
                inner.collect_binding_names(names);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_names() {
        let pat = Pattern::new(PatternKind::Tuple(vec![
            Pattern::maybe_bind("a"),
            Pattern::new(PatternKind::Ref {
                is_mut: false,
                inner: Box::new(Pattern::maybe_bind("b")),
            }),
            Pattern::any(),
        ]));
        assert_eq!(pat.binding_names(), vec!["a", "b"]);
    }

    #[test]
    fn test_or_pattern_counts_once() {
        let pat = Pattern::new(PatternKind::Or(vec![
            Pattern::maybe_bind("x"),
            Pattern::maybe_bind("x"),
        ]));
        assert_eq!(pat.binding_names(), vec!["x"]);
    }
}
