//! Syntactic-sugar lowering: for loops, `?`, `if let`/`while let`, and
//! range literals all reduce to primitive match/loop forms here, so the
//! resolver and type checker never see them.

use ferric_ast::{
    ExprKind, ExprNode, Hygiene, ItemPath, MatchArm, Path, Pattern, PatternKind, PatternValue,
};
use std::collections::HashMap;

/// Paths to the compiler-known items the desugarings call. Lang items
/// win when the crate declares them; the `core` paths are the fallback.
#[derive(Debug, Clone)]
pub struct DesugarPaths {
    into_iter: Path,
    iter_next: Path,
    option_some: Path,
    option_none: Path,
    result_ok: Path,
    result_err: Path,
    from_from: Path,
    range: Path,
    range_inclusive: Path,
    range_from: Path,
    range_to: Path,
    range_to_inclusive: Path,
    range_full: Path,
}

fn lang_or(lang_items: &HashMap<String, ItemPath>, name: &str, fallback: &[&str]) -> Path {
    match lang_items.get(name) {
        Some(ip) => Path::from_item_path(ip),
        None => Path::absolute_named("core", fallback),
    }
}

impl DesugarPaths {
    pub fn from_lang_items(lang_items: &HashMap<String, ItemPath>) -> Self {
        DesugarPaths {
            into_iter: lang_or(
                lang_items,
                "into_iter",
                &["iter", "IntoIterator", "into_iter"],
            ),
            iter_next: lang_or(lang_items, "iter_next", &["iter", "Iterator", "next"]),
            option_some: lang_or(lang_items, "option_some", &["option", "Option", "Some"]),
            option_none: lang_or(lang_items, "option_none", &["option", "Option", "None"]),
            result_ok: lang_or(lang_items, "result_ok", &["result", "Result", "Ok"]),
            result_err: lang_or(lang_items, "result_err", &["result", "Result", "Err"]),
            from_from: lang_or(lang_items, "from_from", &["convert", "From", "from"]),
            range: lang_or(lang_items, "range", &["ops", "Range"]),
            range_inclusive: lang_or(
                lang_items,
                "range_inclusive",
                &["ops", "RangeInclusive"],
            ),
            range_from: lang_or(lang_items, "range_from", &["ops", "RangeFrom"]),
            range_to: lang_or(lang_items, "range_to", &["ops", "RangeTo"]),
            range_to_inclusive: lang_or(
                lang_items,
                "range_to_inclusive",
                &["ops", "RangeToInclusive"],
            ),
            range_full: lang_or(lang_items, "range_full", &["ops", "RangeFull"]),
        }
    }
}

fn some_pattern(paths: &DesugarPaths, inner: Pattern) -> Pattern {
    Pattern::new(PatternKind::StructTuple {
        path: paths.option_some.clone(),
        elems: vec![inner],
    })
}

fn none_pattern(paths: &DesugarPaths) -> Pattern {
    Pattern::new(PatternKind::Value {
        value: PatternValue::Named(paths.option_none.clone()),
    })
}

/// Rewrite one node if it is sugar; children are assumed to be already
/// processed (the driver walks post-order). Returns true when the node
/// changed shape.
pub fn desugar_expr(node: &mut ExprNode, paths: &DesugarPaths, scope: u32) -> bool {
    let kind = std::mem::replace(&mut node.kind, ExprKind::Tuple(Vec::new()));
    let (changed, kind) = match kind {
        ExprKind::ForLoop {
            label,
            pat,
            iter,
            body,
        } => (true, desugar_for(paths, scope, label, pat, *iter, *body)),
        ExprKind::Try { inner } => (true, desugar_try(paths, scope, *inner)),
        ExprKind::IfLet {
            pat,
            value,
            then_,
            else_,
        } => (true, desugar_if_let(pat, *value, *then_, else_)),
        ExprKind::WhileLet {
            label,
            pat,
            value,
            body,
        } => (true, desugar_while_let(label, pat, *value, *body)),
        ExprKind::Range {
            start,
            end,
            inclusive,
        } => (true, desugar_range(paths, start, end, inclusive)),
        other => (false, other),
    };
    node.kind = kind;
    changed
}

/// `for pat in iter { body }` becomes
/// `match IntoIterator::into_iter(iter) { it => { 'l: loop {
///     match Iterator::next(&mut it) { Some(pat) => body, None => break 'l } } } }`
fn desugar_for(
    paths: &DesugarPaths,
    scope: u32,
    label: Option<String>,
    pat: Pattern,
    iter: ExprNode,
    body: ExprNode,
) -> ExprKind {
    // The iterator binding is hygienic so user code cannot collide
    let hygiene = Hygiene::expansion(scope);
    let it_pat = Pattern::bind("it", hygiene.clone());
    let it_ref = ExprNode::named(Path::relative_hygienic(
        hygiene,
        vec![ferric_ast::PathNode::new("it")],
    ));

    let next_call = ExprNode::call_path(
        paths.iter_next.clone(),
        vec![ExprNode::new(ExprKind::Borrow {
            is_mut: true,
            inner: Box::new(it_ref),
        })],
    );
    let inner_match = ExprNode::new(ExprKind::Match {
        value: Box::new(next_call),
        arms: vec![
            MatchArm {
                pats: vec![some_pattern(paths, pat)],
                guard: None,
                body,
            },
            MatchArm {
                pats: vec![none_pattern(paths)],
                guard: None,
                body: ExprNode::new(ExprKind::Break {
                    label: label.clone(),
                    value: None,
                }),
            },
        ],
    });
    let loop_node = ExprNode::new(ExprKind::Loop {
        label,
        body: Box::new(inner_match),
    });
    let into_iter_call = ExprNode::call_path(paths.into_iter.clone(), vec![iter]);
    ExprKind::Match {
        value: Box::new(into_iter_call),
        arms: vec![MatchArm {
            pats: vec![it_pat],
            guard: None,
            body: ExprNode::block(Vec::new(), Some(loop_node)),
        }],
    }
}

/// `expr?` becomes
/// `match expr { Ok(v) => v, Err(e) => return Err(From::from(e)) }`
fn desugar_try(paths: &DesugarPaths, scope: u32, inner: ExprNode) -> ExprKind {
    let hygiene = Hygiene::expansion(scope);
    let v_path = Path::relative_hygienic(hygiene.clone(), vec![ferric_ast::PathNode::new("v")]);
    let e_path = Path::relative_hygienic(hygiene.clone(), vec![ferric_ast::PathNode::new("e")]);

    let ok_arm = MatchArm {
        pats: vec![Pattern::new(PatternKind::StructTuple {
            path: paths.result_ok.clone(),
            elems: vec![Pattern::bind("v", hygiene.clone())],
        })],
        guard: None,
        body: ExprNode::named(v_path),
    };
    let from_call = ExprNode::call_path(
        paths.from_from.clone(),
        vec![ExprNode::named(e_path)],
    );
    let err_arm = MatchArm {
        pats: vec![Pattern::new(PatternKind::StructTuple {
            path: paths.result_err.clone(),
            elems: vec![Pattern::bind("e", hygiene)],
        })],
        guard: None,
        body: ExprNode::new(ExprKind::Return {
            value: Some(Box::new(ExprNode::call_path(
                paths.result_err.clone(),
                vec![from_call],
            ))),
        }),
    };
    ExprKind::Match {
        value: Box::new(inner),
        arms: vec![ok_arm, err_arm],
    }
}

/// `if let pat = value { then } else { other }` as a two-arm match
fn desugar_if_let(
    pat: Pattern,
    value: ExprNode,
    then_: ExprNode,
    else_: Option<Box<ExprNode>>,
) -> ExprKind {
    ExprKind::Match {
        value: Box::new(value),
        arms: vec![
            MatchArm {
                pats: vec![pat],
                guard: None,
                body: then_,
            },
            MatchArm {
                pats: vec![Pattern::any()],
                guard: None,
                body: else_.map(|b| *b).unwrap_or_else(ExprNode::unit),
            },
        ],
    }
}

/// `while let pat = value { body }` as loop+match, re-evaluating `value`
/// each iteration and preserving the break/continue target
fn desugar_while_let(
    label: Option<String>,
    pat: Pattern,
    value: ExprNode,
    body: ExprNode,
) -> ExprKind {
    let inner_match = ExprNode::new(ExprKind::Match {
        value: Box::new(value),
        arms: vec![
            MatchArm {
                pats: vec![pat],
                guard: None,
                body,
            },
            MatchArm {
                pats: vec![Pattern::any()],
                guard: None,
                body: ExprNode::new(ExprKind::Break {
                    label: label.clone(),
                    value: None,
                }),
            },
        ],
    });
    ExprKind::Loop {
        label,
        body: Box::new(inner_match),
    }
}

/// Range expressions become their `core::ops` struct literals
fn desugar_range(
    paths: &DesugarPaths,
    start: Option<Box<ExprNode>>,
    end: Option<Box<ExprNode>>,
    inclusive: bool,
) -> ExprKind {
    let mut fields = Vec::new();
    let path = match (start, end, inclusive) {
        (Some(s), Some(e), false) => {
            fields.push(("start".to_string(), *s));
            fields.push(("end".to_string(), *e));
            paths.range.clone()
        }
        (Some(s), Some(e), true) => {
            fields.push(("start".to_string(), *s));
            fields.push(("end".to_string(), *e));
            paths.range_inclusive.clone()
        }
        (Some(s), None, _) => {
            fields.push(("start".to_string(), *s));
            paths.range_from.clone()
        }
        (None, Some(e), false) => {
            fields.push(("end".to_string(), *e));
            paths.range_to.clone()
        }
        (None, Some(e), true) => {
            fields.push(("end".to_string(), *e));
            paths.range_to_inclusive.clone()
        }
        (None, None, _) => paths.range_full.clone(),
    };
    ExprKind::StructLiteral {
        path,
        fields,
        base: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferric_ast::CoreType;

    fn paths() -> DesugarPaths {
        DesugarPaths::from_lang_items(&HashMap::new())
    }

    #[test]
    fn test_for_loop_desugar_shape() {
        // for i in it_source { () }  -- outer match, loop, inner match
        let mut node = ExprNode::new(ExprKind::ForLoop {
            label: Some("outer".to_string()),
            pat: Pattern::maybe_bind("i"),
            iter: Box::new(ExprNode::named(Path::ident("it_source"))),
            body: Box::new(ExprNode::unit()),
        });
        assert!(desugar_expr(&mut node, &paths(), 1));

        let ExprKind::Match { value, arms } = &node.kind else {
            panic!("expected outer match");
        };
        assert!(matches!(value.kind, ExprKind::CallPath { .. }));
        assert_eq!(arms.len(), 1);
        let ExprKind::Block { tail: Some(tail), .. } = &arms[0].body.kind else {
            panic!("expected block wrapping loop");
        };
        let ExprKind::Loop { label, body } = &tail.kind else {
            panic!("expected loop");
        };
        assert_eq!(label.as_deref(), Some("outer"));
        let ExprKind::Match { arms: inner, .. } = &body.kind else {
            panic!("expected inner match");
        };
        assert_eq!(inner.len(), 2);
        // None arm breaks to the preserved label
        assert!(matches!(
            &inner[1].body.kind,
            ExprKind::Break { label: Some(l), .. } if l == "outer"
        ));
    }

    #[test]
    fn test_try_desugar_shape() {
        let mut node = ExprNode::new(ExprKind::Try {
            inner: Box::new(ExprNode::named(Path::ident("r"))),
        });
        assert!(desugar_expr(&mut node, &paths(), 1));
        let ExprKind::Match { arms, .. } = &node.kind else {
            panic!("expected match");
        };
        assert_eq!(arms.len(), 2);
        // The error arm returns Err(From::from(e))
        assert!(matches!(arms[1].body.kind, ExprKind::Return { .. }));
    }

    #[test]
    fn test_range_desugar() {
        let mut node = ExprNode::new(ExprKind::Range {
            start: Some(Box::new(ExprNode::int(0, Some(CoreType::U32)))),
            end: Some(Box::new(ExprNode::int(10, Some(CoreType::U32)))),
            inclusive: false,
        });
        assert!(desugar_expr(&mut node, &paths(), 1));
        let ExprKind::StructLiteral { fields, .. } = &node.kind else {
            panic!("expected struct literal");
        };
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].0, "start");
        assert_eq!(fields[1].0, "end");
    }

    #[test]
    fn test_plain_nodes_untouched() {
        let mut node = ExprNode::int(1, None);
        assert!(!desugar_expr(&mut node, &paths(), 1));
        assert!(matches!(node.kind, ExprKind::Literal(_)));
    }

    #[test]
    fn test_desugared_bindings_are_hygienic() {
        let mut node = ExprNode::new(ExprKind::Try {
            inner: Box::new(ExprNode::named(Path::ident("r"))),
        });
        desugar_expr(&mut node, &paths(), 9);
        let ExprKind::Match { arms, .. } = &node.kind else {
            panic!("expected match");
        };
        let PatternKind::StructTuple { elems, .. } = &arms[0].pats[0].kind else {
            panic!("expected Ok(v) pattern");
        };
        let binding = elems[0].binding.as_ref().unwrap();
        assert_eq!(binding.hygiene.scope, 9);
    }
}
