// The use-resolution scenario: a dependency crate `c` exposes `m::f`;
// the compiled crate imports it. After resolution the root value index
// carries the import and the use statement is bound.

use ferric_ast::{
    Crate, ExprKind, ExprNode, ExternCrateInfo, Function, Item, ItemEntry, ItemPath, Module, Path,
    PathClass, PathNode, Pattern, Stmt, TypeBinding, TypeRef, UseItem, ValueBinding,
};
use ferric_resolve::resolve_crate;

fn dependency_crate() -> ExternCrateInfo {
    let mut m = Module::new(ItemPath::crate_root("c").child("m"));
    m.items.push(ItemEntry::public(
        "f",
        Item::Function(Function::new(vec![], TypeRef::unit(), None)),
    ));
    let mut root = Module::new(ItemPath::crate_root("c"));
    root.items.push(ItemEntry::public("m", Item::Module(m)));
    ExternCrateInfo {
        name: "c".to_string(),
        root,
    }
}

fn crate_importing_f() -> Crate {
    let mut krate = Crate::new();
    krate
        .extern_crates
        .insert("c".to_string(), dependency_crate());
    krate.root.items.push(ItemEntry::new(
        "c",
        Item::ExternCrate {
            krate: "c".to_string(),
        },
    ));
    krate.root.items.push(ItemEntry::new(
        "f",
        Item::Use(UseItem {
            path: Path::relative(vec![
                PathNode::new("c"),
                PathNode::new("m"),
                PathNode::new("f"),
            ]),
            is_glob: false,
        }),
    ));
    krate
}

#[test]
fn use_of_dependency_function_binds() {
    let mut krate = crate_importing_f();
    resolve_crate(&mut krate).expect("resolution");

    // The root's value index has f -> ::"c"::m::f, marked as an import
    let entry = krate.root.value_items.get("f").expect("indexed import");
    assert!(entry.is_import);
    assert_eq!(entry.path.krate, "c");
    assert_eq!(entry.path.nodes, vec!["m".to_string(), "f".to_string()]);

    // The use statement's value binding is Function
    let use_entry = krate
        .root
        .items
        .iter()
        .find(|e| matches!(e.item, Item::Use(_)))
        .expect("use item");
    let Item::Use(u) = &use_entry.item else {
        panic!();
    };
    assert!(matches!(
        &u.path.bindings.value_ns,
        ValueBinding::Function(p) if p.krate == "c"
    ));
}

#[test]
fn imported_name_resolves_in_function_bodies() {
    let mut krate = crate_importing_f();
    // fn g() { f() }
    let body = ExprNode::block(
        vec![Stmt::Semi(ExprNode::call_path(Path::ident("f"), vec![]))],
        None,
    );
    krate.root.items.push(ItemEntry::new(
        "g",
        Item::Function(Function::new(vec![], TypeRef::unit(), Some(body))),
    ));
    resolve_crate(&mut krate).expect("resolution");

    let Item::Function(g) = &krate.root.item("g").unwrap().item else {
        panic!();
    };
    let ExprKind::Block { stmts, .. } = &g.body.as_ref().unwrap().kind else {
        panic!();
    };
    let Stmt::Semi(call) = &stmts[0] else { panic!() };
    let ExprKind::CallPath { path, .. } = &call.kind else {
        panic!();
    };
    // The call path was absolutised into the dependency crate
    assert!(matches!(
        &path.class,
        PathClass::Absolute { krate, .. } if krate == "c"
    ));
    assert!(matches!(path.bindings.value_ns, ValueBinding::Function(_)));
}

#[test]
fn local_variables_get_slots() {
    let mut krate = Crate::new();
    // fn f(a: u32) { let b = a; b }
    let body = ExprNode::block(
        vec![Stmt::Let {
            pat: Pattern::maybe_bind("b"),
            ty: TypeRef::infer(),
            value: Some(ExprNode::named(Path::ident("a"))),
        }],
        Some(ExprNode::named(Path::ident("b"))),
    );
    krate.root.items.push(ItemEntry::new(
        "f",
        Item::Function(Function::new(
            vec![(
                Pattern::maybe_bind("a"),
                TypeRef::Primitive(ferric_ast::CoreType::U32),
            )],
            TypeRef::unit(),
            Some(body),
        )),
    ));
    resolve_crate(&mut krate).expect("resolution");

    let Item::Function(f) = &krate.root.item("f").unwrap().item else {
        panic!();
    };
    // The argument pattern became a binding with slot 0
    assert_eq!(f.args[0].0.binding.as_ref().unwrap().slot, Some(0));
    let ExprKind::Block { stmts, tail, .. } = &f.body.as_ref().unwrap().kind else {
        panic!();
    };
    // `a` on the right-hand side is a local
    let Stmt::Let { pat, value, .. } = &stmts[0] else {
        panic!();
    };
    let ExprKind::NamedValue { path } = &value.as_ref().unwrap().kind else {
        panic!();
    };
    assert!(matches!(path.class, PathClass::Local { .. }));
    assert_eq!(path.bindings.value_ns, ValueBinding::Variable(0));
    // `b` got the next slot and the tail sees it
    assert_eq!(pat.binding.as_ref().unwrap().slot, Some(1));
    let ExprKind::NamedValue { path } = &tail.as_ref().unwrap().kind else {
        panic!();
    };
    assert_eq!(path.bindings.value_ns, ValueBinding::Variable(1));
}

#[test]
fn trait_method_paths_become_ufcs() {
    use ferric_ast::{Trait, TraitItem, TraitItemEntry};
    let mut krate = Crate::new();
    krate.root.items.push(ItemEntry::public(
        "Greet",
        Item::Trait(Trait {
            generics: Default::default(),
            supertraits: vec![],
            items: vec![TraitItemEntry {
                name: "greet".to_string(),
                attrs: vec![],
                item: TraitItem::Function(Function::new(vec![], TypeRef::unit(), None)),
            }],
        }),
    ));
    // fn g() { Greet::greet() }
    let body = ExprNode::block(
        vec![Stmt::Semi(ExprNode::call_path(
            Path::relative(vec![PathNode::new("Greet"), PathNode::new("greet")]),
            vec![],
        ))],
        None,
    );
    krate.root.items.push(ItemEntry::new(
        "g",
        Item::Function(Function::new(vec![], TypeRef::unit(), Some(body))),
    ));
    resolve_crate(&mut krate).expect("resolution");

    let Item::Function(g) = &krate.root.item("g").unwrap().item else {
        panic!();
    };
    let ExprKind::Block { stmts, .. } = &g.body.as_ref().unwrap().kind else {
        panic!();
    };
    let Stmt::Semi(call) = &stmts[0] else { panic!() };
    let ExprKind::CallPath { path, .. } = &call.kind else {
        panic!();
    };
    // Trait::method became `<_ as Trait>::method`
    let PathClass::Ufcs {
        ty, trait_path, nodes,
    } = &path.class
    else {
        panic!("expected UFCS, got {:?}", path.class);
    };
    assert!(ty.is_infer());
    assert!(trait_path.is_some());
    assert_eq!(nodes[0].name, "greet");
}

#[test]
fn pattern_arm_mismatch_is_fatal() {
    use ferric_ast::{MatchArm, PatternKind};
    let mut krate = Crate::new();
    // fn f(x: u32) { match x { a | _ => () } } - `a` missing in arm 2
    let or_pat = Pattern::new(PatternKind::Or(vec![
        Pattern::maybe_bind("a"),
        Pattern::any(),
    ]));
    let body = ExprNode::block(
        vec![Stmt::Semi(ExprNode::new(ExprKind::Match {
            value: Box::new(ExprNode::named(Path::ident("x"))),
            arms: vec![MatchArm {
                pats: vec![or_pat],
                guard: None,
                body: ExprNode::unit(),
            }],
        }))],
        None,
    );
    krate.root.items.push(ItemEntry::new(
        "f",
        Item::Function(Function::new(
            vec![(
                Pattern::maybe_bind("x"),
                TypeRef::Primitive(ferric_ast::CoreType::U32),
            )],
            TypeRef::unit(),
            Some(body),
        )),
    ));
    assert!(matches!(
        resolve_crate(&mut krate),
        Err(ferric_resolve::ResolveError::PatternArmMismatch { .. })
    ));
}

#[test]
fn resolution_is_idempotent_on_paths_and_indices() {
    let mut krate = crate_importing_f();
    resolve_crate(&mut krate).expect("first run");
    let after_first = krate.clone();
    resolve_crate(&mut krate).expect("second run");
    assert_eq!(krate, after_first);
}

#[test]
fn unknown_name_reports_suggestion() {
    let mut krate = crate_importing_f();
    let body = ExprNode::block(
        vec![Stmt::Semi(ExprNode::call_path(Path::ident("ff"), vec![]))],
        None,
    );
    krate.root.items.push(ItemEntry::new(
        "g",
        Item::Function(Function::new(vec![], TypeRef::unit(), Some(body))),
    ));
    match resolve_crate(&mut krate) {
        Err(ferric_resolve::ResolveError::UnresolvedName {
            name, suggestion, ..
        }) => {
            assert_eq!(name, "ff");
            assert_eq!(suggestion.as_deref(), Some("f"));
        }
        other => panic!("expected unresolved name, got {other:?}"),
    }
}

#[test]
fn type_binding_and_value_binding_are_independent() {
    use ferric_ast::{Struct, StructKind, TupleField};
    let mut krate = Crate::new();
    // A tuple struct occupies both namespaces under one name
    krate.root.items.push(ItemEntry::public(
        "Wrapper",
        Item::Struct(Struct {
            generics: Default::default(),
            kind: StructKind::Tuple(vec![TupleField {
                is_pub: true,
                ty: TypeRef::Primitive(ferric_ast::CoreType::U32),
                attrs: vec![],
            }]),
        }),
    ));
    resolve_crate(&mut krate).expect("resolution");
    let type_entry = krate.root.type_items.get("Wrapper").expect("type ns");
    let value_entry = krate.root.value_items.get("Wrapper").expect("value ns");
    assert!(matches!(type_entry.binding.type_ns, TypeBinding::Struct(_)));
    assert!(matches!(
        value_entry.binding.value_ns,
        ValueBinding::Struct(_)
    ));
}
