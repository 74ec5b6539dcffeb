// End-to-end inference scenarios: literal-class unification through let
// chains, and unsize coercion insertion at call boundaries.

use ferric_ast::{
    CoreType, Crate, ExprKind, ExprNode, Function, Item, ItemEntry, Lifetime, Path, Pattern,
    Stmt, TypeRef,
};
use ferric_resolve::resolve_crate;
use ferric_typeck::check_crate;

fn run(krate: &mut Crate) {
    resolve_crate(krate).expect("resolution");
    check_crate(krate).expect("inference");
}

fn body_of<'a>(krate: &'a Crate, name: &str) -> &'a ExprNode {
    let Item::Function(f) = &krate.root.item(name).expect("fn").item else {
        panic!("expected function {name}");
    };
    f.body.as_ref().expect("body")
}

#[test]
fn literal_class_flows_through_let_and_addition() {
    // fn f() { let x: _ = 1u32; let y = x + 1; }
    let body = ExprNode::block(
        vec![
            Stmt::Let {
                pat: Pattern::maybe_bind("x"),
                ty: TypeRef::infer(),
                value: Some(ExprNode::int(1, Some(CoreType::U32))),
            },
            Stmt::Let {
                pat: Pattern::maybe_bind("y"),
                ty: TypeRef::infer(),
                value: Some(ExprNode::new(ExprKind::BinOp {
                    op: ferric_ast::BinOp::Add,
                    left: Box::new(ExprNode::named(Path::ident("x"))),
                    right: Box::new(ExprNode::int(1, None)),
                })),
            },
        ],
        None,
    );
    let mut krate = Crate::new();
    krate.root.items.push(ItemEntry::new(
        "f",
        Item::Function(Function::new(vec![], TypeRef::unit(), Some(body))),
    ));
    run(&mut krate);

    let ExprKind::Block { stmts, .. } = &body_of(&krate, "f").kind else {
        panic!();
    };
    // x's initialiser is u32
    let Stmt::Let { value: Some(x_init), ty: x_ty, .. } = &stmts[0] else {
        panic!();
    };
    assert_eq!(x_init.res_type, TypeRef::Primitive(CoreType::U32));
    assert_eq!(*x_ty, TypeRef::Primitive(CoreType::U32));
    // y's initialiser (x + 1) is u32; the unsuffixed literal unified
    let Stmt::Let { value: Some(y_init), .. } = &stmts[1] else {
        panic!();
    };
    assert_eq!(y_init.res_type, TypeRef::Primitive(CoreType::U32));
    let ExprKind::BinOp { right, .. } = &y_init.kind else {
        panic!();
    };
    assert_eq!(right.res_type, TypeRef::Primitive(CoreType::U32));
}

#[test]
fn every_node_is_typed_after_inference() {
    let body = ExprNode::block(
        vec![Stmt::Let {
            pat: Pattern::maybe_bind("t"),
            ty: TypeRef::infer(),
            value: Some(ExprNode::new(ExprKind::Tuple(vec![
                ExprNode::bool_lit(true),
                ExprNode::int(3, Some(CoreType::I64)),
            ]))),
        }],
        Some(ExprNode::named(Path::ident("t"))),
    );
    let mut krate = Crate::new();
    krate.root.items.push(ItemEntry::new(
        "f",
        Item::Function(Function::new(
            vec![],
            TypeRef::Tuple(vec![
                TypeRef::Primitive(CoreType::Bool),
                TypeRef::Primitive(CoreType::I64),
            ]),
            Some(body),
        )),
    ));
    run(&mut krate);

    fn assert_no_infer(node: &ExprNode) {
        assert!(
            !node.res_type.contains_infer(),
            "untyped node: {:?}",
            node.kind
        );
        let mut clone = node.clone();
        let _ = clone.for_each_child_mut(&mut |child| {
            assert_no_infer(child);
            Ok::<(), std::convert::Infallible>(())
        });
    }
    assert_no_infer(body_of(&krate, "f"));
}

#[test]
fn unsize_coercion_wraps_trait_object_argument() {
    use ferric_ast::{Impl, StructKind, Trait};
    // trait Draw {} struct Dot; impl Draw for Dot {}
    // fn callee(d: &dyn Draw) {} fn caller() { callee(&Dot) }
    let mut krate = Crate::new();
    krate.root.items.push(ItemEntry::public(
        "Draw",
        Item::Trait(Trait {
            generics: Default::default(),
            supertraits: vec![],
            items: vec![],
        }),
    ));
    krate.root.items.push(ItemEntry::public(
        "Dot",
        Item::Struct(ferric_ast::Struct {
            generics: Default::default(),
            kind: StructKind::Unit,
        }),
    ));
    krate.root.items.push(ItemEntry::new(
        "",
        Item::Impl(Impl {
            generics: Default::default(),
            trait_path: Some(Path::ident("Draw")),
            self_ty: TypeRef::path(Path::ident("Dot")),
            items: vec![],
        }),
    ));
    let dyn_draw = TypeRef::TraitObject {
        traits: vec![Path::ident("Draw")],
        lifetime: Lifetime::Infer,
    };
    krate.root.items.push(ItemEntry::new(
        "callee",
        Item::Function(Function::new(
            vec![(Pattern::maybe_bind("d"), TypeRef::borrow(dyn_draw))],
            TypeRef::unit(),
            Some(ExprNode::block(vec![], None)),
        )),
    ));
    let caller_body = ExprNode::block(
        vec![Stmt::Semi(ExprNode::call_path(
            Path::ident("callee"),
            vec![ExprNode::new(ExprKind::Borrow {
                is_mut: false,
                inner: Box::new(ExprNode::named(Path::ident("Dot"))),
            })],
        ))],
        None,
    );
    krate.root.items.push(ItemEntry::new(
        "caller",
        Item::Function(Function::new(vec![], TypeRef::unit(), Some(caller_body))),
    ));
    run(&mut krate);

    let ExprKind::Block { stmts, .. } = &body_of(&krate, "caller").kind else {
        panic!();
    };
    let Stmt::Semi(call) = &stmts[0] else { panic!() };
    let ExprKind::CallPath { args, .. } = &call.kind else {
        panic!();
    };
    // The argument got wrapped in an Unsize node whose result is the
    // trait-object borrow; the inner node keeps its concrete type
    let ExprKind::Unsize { inner, .. } = &args[0].kind else {
        panic!("expected unsize wrapper, got {:?}", args[0].kind);
    };
    assert!(matches!(
        &args[0].res_type,
        TypeRef::Borrow { inner: pointee, .. }
            if matches!(**pointee, TypeRef::TraitObject { .. })
    ));
    assert!(matches!(
        &inner.res_type,
        TypeRef::Borrow { inner: pointee, .. }
            if matches!(**pointee, TypeRef::Path(_))
    ));
}

#[test]
fn method_call_resolves_through_inherent_impl() {
    use ferric_ast::{Impl, ImplItem, ImplItemEntry, StructKind};
    // struct Counter; impl Counter { fn get(&self) -> u32 { 7 } }
    // fn f() -> u32 { Counter.get() }
    let mut krate = Crate::new();
    krate.root.items.push(ItemEntry::public(
        "Counter",
        Item::Struct(ferric_ast::Struct {
            generics: Default::default(),
            kind: StructKind::Unit,
        }),
    ));
    let get_fn = Function::new(
        vec![(
            Pattern::bind("self", ferric_ast::Hygiene::source()),
            TypeRef::borrow(TypeRef::path(Path::ident("Self"))),
        )],
        TypeRef::Primitive(CoreType::U32),
        Some(ExprNode::block(
            vec![],
            Some(ExprNode::int(7, Some(CoreType::U32))),
        )),
    );
    krate.root.items.push(ItemEntry::new(
        "",
        Item::Impl(Impl {
            generics: Default::default(),
            trait_path: None,
            self_ty: TypeRef::path(Path::ident("Counter")),
            items: vec![ImplItemEntry {
                name: "get".to_string(),
                is_pub: true,
                attrs: vec![],
                item: ImplItem::Function(get_fn),
            }],
        }),
    ));
    let body = ExprNode::block(
        vec![],
        Some(ExprNode::new(ExprKind::CallMethod {
            receiver: Box::new(ExprNode::named(Path::ident("Counter"))),
            method: ferric_ast::PathNode::new("get"),
            args: vec![],
            cache: Default::default(),
        })),
    );
    krate.root.items.push(ItemEntry::new(
        "f",
        Item::Function(Function::new(
            vec![],
            TypeRef::Primitive(CoreType::U32),
            Some(body),
        )),
    ));
    run(&mut krate);

    let ExprKind::Block { tail: Some(tail), .. } = &body_of(&krate, "f").kind else {
        panic!();
    };
    // The method call was rewritten into a UFCS call with the auto-
    // borrowed receiver first
    let ExprKind::CallPath { path, args, .. } = &tail.kind else {
        panic!("expected rewritten call, got {:?}", tail.kind);
    };
    assert!(matches!(path.class, ferric_ast::PathClass::Ufcs { .. }));
    assert!(matches!(args[0].kind, ExprKind::Borrow { .. }));
    assert_eq!(tail.res_type, TypeRef::Primitive(CoreType::U32));
}

#[test]
fn comparing_type_without_ord_impl_is_fatal() {
    use ferric_ast::{ItemPath, StructKind, Trait};
    // trait Ordered {} (the ord lang item), struct S with no impl:
    // fn f(a: S, b: S) { a < b; } must not silently type-check
    let mut krate = Crate::new();
    krate.root.items.push(ItemEntry::public(
        "Ordered",
        Item::Trait(Trait {
            generics: Default::default(),
            supertraits: vec![],
            items: vec![],
        }),
    ));
    krate.lang_items.insert(
        "ord".to_string(),
        ItemPath::local_root().child("Ordered"),
    );
    krate.root.items.push(ItemEntry::public(
        "S",
        Item::Struct(ferric_ast::Struct {
            generics: Default::default(),
            kind: StructKind::Unit,
        }),
    ));
    let s_ty = TypeRef::path(Path::ident("S"));
    let body = ExprNode::block(
        vec![Stmt::Semi(ExprNode::new(ExprKind::BinOp {
            op: ferric_ast::BinOp::Lt,
            left: Box::new(ExprNode::named(Path::ident("a"))),
            right: Box::new(ExprNode::named(Path::ident("b"))),
        }))],
        None,
    );
    krate.root.items.push(ItemEntry::new(
        "f",
        Item::Function(Function::new(
            vec![
                (Pattern::maybe_bind("a"), s_ty.clone()),
                (Pattern::maybe_bind("b"), s_ty),
            ],
            TypeRef::unit(),
            Some(body),
        )),
    ));
    resolve_crate(&mut krate).expect("resolution");
    assert!(matches!(
        check_crate(&mut krate),
        Err(ferric_typeck::TypeError::BadOperator { .. })
    ));
}

#[test]
fn heterogeneous_partial_eq_dispatches_through_the_eq_lang_item() {
    use ferric_ast::{Impl, ItemPath, PathNode, StructKind, Trait, TypeParam};
    // trait Same<T> {} (the eq lang item), struct A, struct B, and
    // impl Same<B> for A: `a == b` with different operand types must
    // resolve through the impl instead of forcing the types equal
    let mut krate = Crate::new();
    let mut eq_trait = Trait {
        generics: Default::default(),
        supertraits: vec![],
        items: vec![],
    };
    eq_trait.generics.types.push(TypeParam::new("T"));
    krate
        .root
        .items
        .push(ItemEntry::public("Same", Item::Trait(eq_trait)));
    krate
        .lang_items
        .insert("eq".to_string(), ItemPath::local_root().child("Same"));
    for name in ["A", "B"] {
        krate.root.items.push(ItemEntry::public(
            name,
            Item::Struct(ferric_ast::Struct {
                generics: Default::default(),
                kind: StructKind::Unit,
            }),
        ));
    }
    krate.root.items.push(ItemEntry::new(
        "",
        Item::Impl(Impl {
            generics: Default::default(),
            trait_path: Some(Path::relative(vec![PathNode::with_args(
                "Same",
                vec![TypeRef::path(Path::ident("B"))],
            )])),
            self_ty: TypeRef::path(Path::ident("A")),
            items: vec![],
        }),
    ));
    // fn f(a: A, b: B) -> bool { a == b }
    let body = ExprNode::block(
        vec![],
        Some(ExprNode::new(ExprKind::BinOp {
            op: ferric_ast::BinOp::Eq,
            left: Box::new(ExprNode::named(Path::ident("a"))),
            right: Box::new(ExprNode::named(Path::ident("b"))),
        })),
    );
    krate.root.items.push(ItemEntry::new(
        "f",
        Item::Function(Function::new(
            vec![
                (Pattern::maybe_bind("a"), TypeRef::path(Path::ident("A"))),
                (Pattern::maybe_bind("b"), TypeRef::path(Path::ident("B"))),
            ],
            TypeRef::Primitive(CoreType::Bool),
            Some(body),
        )),
    ));
    run(&mut krate);

    let ExprKind::Block { tail: Some(tail), .. } = &body_of(&krate, "f").kind else {
        panic!();
    };
    // The comparison is bool; the operands kept their own types
    assert_eq!(tail.res_type, TypeRef::Primitive(CoreType::Bool));
    let ExprKind::BinOp { left, right, .. } = &tail.kind else {
        panic!();
    };
    let TypeRef::Path(lp) = &left.res_type else {
        panic!("expected nominal left type, got {:?}", left.res_type);
    };
    assert_eq!(lp.as_item_path().unwrap().nodes, vec!["A".to_string()]);
    let TypeRef::Path(rp) = &right.res_type else {
        panic!("expected nominal right type, got {:?}", right.res_type);
    };
    assert_eq!(rp.as_item_path().unwrap().nodes, vec!["B".to_string()]);
}

#[test]
fn type_mismatch_is_fatal() {
    // fn f() -> u32 { true }
    let body = ExprNode::block(vec![], Some(ExprNode::bool_lit(true)));
    let mut krate = Crate::new();
    krate.root.items.push(ItemEntry::new(
        "f",
        Item::Function(Function::new(
            vec![],
            TypeRef::Primitive(CoreType::U32),
            Some(body),
        )),
    ));
    resolve_crate(&mut krate).expect("resolution");
    assert!(matches!(
        check_crate(&mut krate),
        Err(ferric_typeck::TypeError::Mismatch { .. })
    ));
}

#[test]
fn diverging_tail_satisfies_any_return_type() {
    // fn f() -> u32 { return 3u32; }  (the block tail is Diverge)
    let body = ExprNode::block(
        vec![],
        Some(ExprNode::new(ExprKind::Return {
            value: Some(Box::new(ExprNode::int(3, Some(CoreType::U32)))),
        })),
    );
    let mut krate = Crate::new();
    krate.root.items.push(ItemEntry::new(
        "f",
        Item::Function(Function::new(
            vec![],
            TypeRef::Primitive(CoreType::U32),
            Some(body),
        )),
    ));
    run(&mut krate);
}
