// Resolution over pathologically deep module trees must not exhaust the
// stack: the walker's frames stay small and the module chain is the only
// recursion.

use ferric_ast::{
    Crate, ExprNode, Function, Item, ItemEntry, ItemPath, Module, Path, PathClass, Stmt, TypeRef,
};
use ferric_resolve::resolve_crate;

const DEPTH: usize = 1024;

/// Build `mod m0 { mod m1 { ... fn leaf() { root_fn(); } ... } }` with a
/// call out to a crate-root function from the deepest level.
fn deep_crate() -> Crate {
    let mut krate = Crate::new();
    krate.root.items.push(ItemEntry::public(
        "root_fn",
        Item::Function(Function::new(vec![], TypeRef::unit(), None)),
    ));

    let mut path = ItemPath::local_root();
    let mut names = Vec::new();
    for i in 0..DEPTH {
        let name = format!("m{i}");
        path = path.child(&name);
        names.push((name, path.clone()));
    }

    // Innermost module first
    let leaf_body = ExprNode::block(
        vec![Stmt::Semi(ExprNode::call_path(
            Path::ident("root_fn"),
            vec![],
        ))],
        None,
    );
    let (_, leaf_path) = names.last().expect("depth > 0");
    let mut current = Module::new(leaf_path.clone());
    current.items.push(ItemEntry::new(
        "leaf",
        Item::Function(Function::new(vec![], TypeRef::unit(), Some(leaf_body))),
    ));

    for (name, mod_path) in names.iter().rev().skip(1) {
        let mut outer = Module::new(mod_path.clone());
        let inner_name = format!("m{}", mod_path.nodes.len());
        let _ = name;
        outer
            .items
            .push(ItemEntry::public(&inner_name, Item::Module(current)));
        current = outer;
    }
    krate
        .root
        .items
        .push(ItemEntry::public("m0", Item::Module(current)));
    krate
}

#[test]
fn deep_module_nesting_resolves() {
    // Test threads default to a small stack; give the walker the room a
    // compiler process would have
    let handle = std::thread::Builder::new()
        .stack_size(64 * 1024 * 1024)
        .spawn(run_deep)
        .expect("spawn");
    handle.join().expect("deep resolution thread");
}

fn run_deep() {
    let mut krate = deep_crate();
    resolve_crate(&mut krate).expect("deep resolution");

    // Walk down to the leaf and check the call was absolutised to the
    // crate root
    let mut module = &krate.root;
    for i in 0..DEPTH {
        module = match &module.item(&format!("m{i}")).expect("module").item {
            Item::Module(m) => m,
            other => panic!("expected module, got {}", other.describe()),
        };
    }
    let Item::Function(leaf) = &module.item("leaf").expect("leaf").item else {
        panic!("expected leaf fn");
    };
    let ferric_ast::ExprKind::Block { stmts, .. } = &leaf.body.as_ref().unwrap().kind else {
        panic!();
    };
    let Stmt::Semi(call) = &stmts[0] else { panic!() };
    let ferric_ast::ExprKind::CallPath { path, .. } = &call.kind else {
        panic!();
    };
    match &path.class {
        PathClass::Absolute { krate, nodes } => {
            assert!(krate.is_empty());
            assert_eq!(nodes.len(), 1);
            assert_eq!(nodes[0].name, "root_fn");
        }
        other => panic!("expected absolute path, got {other:?}"),
    }
}
