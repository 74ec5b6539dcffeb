// End-to-end cfg stripping over a whole crate, including the
// idempotence of re-running expansion on an already-expanded tree.

use ferric_ast::{
    Attribute, Crate, Function, Item, ItemEntry, MetaItem, TypeRef,
};
use ferric_diagnostics::{DiagnosticEngine, Span};
use ferric_expand::{expand_crate, CfgState, Registry, TokenReparser};

fn cfg_fn(name: &str, pred: MetaItem) -> ItemEntry {
    let mut entry = ItemEntry::new(
        name,
        Item::Function(Function::new(vec![], TypeRef::unit(), None)),
    );
    entry
        .attrs
        .push(Attribute::new(Span::unknown(), MetaItem::list("cfg", vec![pred])));
    entry
}

fn run_expansion(krate: &mut Crate, cfg: &CfgState) {
    let registry = Registry::with_builtins();
    let reparser = TokenReparser::new();
    let mut diag = DiagnosticEngine::new();
    expand_crate(krate, &registry, cfg, &reparser, &mut diag).expect("expansion");
    assert!(!diag.has_errors());
}

#[test]
fn cfg_strip_keeps_and_removes() {
    let mut krate = Crate::new();
    krate.root.items.push(cfg_fn("a", MetaItem::flag("foo")));
    krate.root.items.push(cfg_fn(
        "b",
        MetaItem::list("not", vec![MetaItem::flag("foo")]),
    ));

    let mut cfg = CfgState::new();
    cfg.set_flag("foo");
    run_expansion(&mut krate, &cfg);

    // `a` survives, `b` is a tombstone
    assert!(matches!(krate.root.items[0].item, Item::Function(_)));
    assert!(matches!(krate.root.items[1].item, Item::None));
    assert!(krate.root.item("a").is_some());
    assert!(krate.root.item("b").is_none());
}

#[test]
fn cfg_strip_is_idempotent() {
    let mut krate = Crate::new();
    krate.root.items.push(cfg_fn("a", MetaItem::flag("foo")));
    krate.root.items.push(cfg_fn(
        "b",
        MetaItem::list("not", vec![MetaItem::flag("foo")]),
    ));

    let mut cfg = CfgState::new();
    cfg.set_flag("foo");
    run_expansion(&mut krate, &cfg);
    let first = krate.clone();
    run_expansion(&mut krate, &cfg);
    assert_eq!(krate, first);
}

#[test]
fn cfg_strip_in_nested_module() {
    use ferric_ast::{ItemPath, Module};
    let mut inner = Module::new(ItemPath::local_root().child("inner"));
    inner.items.push(cfg_fn("gone", MetaItem::flag("missing")));
    let mut krate = Crate::new();
    krate
        .root
        .items
        .push(ItemEntry::public("inner", Item::Module(inner)));

    let cfg = CfgState::new();
    run_expansion(&mut krate, &cfg);

    let module = krate
        .module_at(&ItemPath::local_root().child("inner"))
        .expect("module");
    assert!(module.item("gone").is_none());
}
