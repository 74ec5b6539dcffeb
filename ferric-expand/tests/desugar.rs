// The for-loop desugaring scenario: a labelled for over a range becomes
// the IntoIterator/Iterator::next match-loop-match, with the label and
// the element pattern preserved.

use ferric_ast::{
    Crate, ExprKind, ExprNode, Function, Item, ItemEntry, Pattern, PatternKind, Stmt, TypeRef,
};
use ferric_diagnostics::DiagnosticEngine;
use ferric_expand::{expand_crate, CfgState, Registry, TokenReparser};

fn run_expansion(krate: &mut Crate) {
    let registry = Registry::with_builtins();
    let reparser = TokenReparser::new();
    let cfg = CfgState::new();
    let mut diag = DiagnosticEngine::new();
    expand_crate(krate, &registry, &cfg, &reparser, &mut diag).expect("expansion");
}

#[test]
fn for_loop_over_range_desugars_to_match_loop_match() {
    // fn f() { 'l: for i in 0..10 { () } }
    let for_loop = ExprNode::new(ExprKind::ForLoop {
        label: Some("l".to_string()),
        pat: Pattern::maybe_bind("i"),
        iter: Box::new(ExprNode::new(ExprKind::Range {
            start: Some(Box::new(ExprNode::int(0, None))),
            end: Some(Box::new(ExprNode::int(10, None))),
            inclusive: false,
        })),
        body: Box::new(ExprNode::unit()),
    });
    let body = ExprNode::block(vec![Stmt::Semi(for_loop)], None);
    let mut krate = Crate::new();
    krate.root.items.push(ItemEntry::new(
        "f",
        Item::Function(Function::new(vec![], TypeRef::unit(), Some(body))),
    ));

    run_expansion(&mut krate);

    let Item::Function(f) = &krate.root.item("f").unwrap().item else {
        panic!("expected fn");
    };
    let ExprKind::Block { stmts, .. } = &f.body.as_ref().unwrap().kind else {
        panic!("expected block");
    };
    let Stmt::Semi(outer) = &stmts[0] else {
        panic!("expected stmt");
    };

    // Outer match on IntoIterator::into_iter(range-literal)
    let ExprKind::Match { value, arms } = &outer.kind else {
        panic!("expected outer match, got {:?}", outer.kind);
    };
    let ExprKind::CallPath { path, args, .. } = &value.kind else {
        panic!("expected into_iter call");
    };
    assert_eq!(path.nodes().last().unwrap().name, "into_iter");
    // The range sugar desugared to a Range struct literal
    assert!(matches!(args[0].kind, ExprKind::StructLiteral { .. }));

    // One arm binding the iterator, wrapping the labelled loop
    assert_eq!(arms.len(), 1);
    let ExprKind::Block { tail: Some(tail), .. } = &arms[0].body.kind else {
        panic!("expected block around loop");
    };
    let ExprKind::Loop { label, body } = &tail.kind else {
        panic!("expected loop");
    };
    assert_eq!(label.as_deref(), Some("l"));

    // Inner match on Iterator::next(&mut it) with Some/None arms
    let ExprKind::Match { value, arms } = &body.kind else {
        panic!("expected inner match");
    };
    let ExprKind::CallPath { path, args, .. } = &value.kind else {
        panic!("expected next call");
    };
    assert_eq!(path.nodes().last().unwrap().name, "next");
    assert!(matches!(
        args[0].kind,
        ExprKind::Borrow { is_mut: true, .. }
    ));
    assert_eq!(arms.len(), 2);

    // Some(i): the user's element pattern is preserved inside
    let PatternKind::StructTuple { elems, .. } = &arms[0].pats[0].kind else {
        panic!("expected Some(..) pattern");
    };
    assert!(matches!(
        &elems[0].kind,
        PatternKind::MaybeBind { name, .. } if name == "i"
    ));

    // None: break to the preserved label
    assert!(matches!(
        &arms[1].body.kind,
        ExprKind::Break { label: Some(l), .. } if l == "l"
    ));
}

#[test]
fn question_mark_desugars_to_match_return() {
    // fn f() { r?; }
    let try_expr = ExprNode::new(ExprKind::Try {
        inner: Box::new(ExprNode::named(ferric_ast::Path::ident("r"))),
    });
    let body = ExprNode::block(vec![Stmt::Semi(try_expr)], None);
    let mut krate = Crate::new();
    krate.root.items.push(ItemEntry::new(
        "f",
        Item::Function(Function::new(vec![], TypeRef::unit(), Some(body))),
    ));

    run_expansion(&mut krate);

    let Item::Function(f) = &krate.root.item("f").unwrap().item else {
        panic!("expected fn");
    };
    let ExprKind::Block { stmts, .. } = &f.body.as_ref().unwrap().kind else {
        panic!("expected block");
    };
    let Stmt::Semi(node) = &stmts[0] else {
        panic!("expected stmt");
    };
    let ExprKind::Match { arms, .. } = &node.kind else {
        panic!("expected match");
    };
    assert_eq!(arms.len(), 2);
    // Ok arm yields the bound value; Err arm returns Err(From::from(e))
    assert!(matches!(arms[0].body.kind, ExprKind::NamedValue { .. }));
    let ExprKind::Return { value: Some(ret) } = &arms[1].body.kind else {
        panic!("expected return");
    };
    let ExprKind::CallPath { path, args, .. } = &ret.kind else {
        panic!("expected Err(..) call");
    };
    assert_eq!(path.nodes().last().unwrap().name, "Err");
    let ExprKind::CallPath { path, .. } = &args[0].kind else {
        panic!("expected From::from call");
    };
    assert_eq!(path.nodes().last().unwrap().name, "from");
}
