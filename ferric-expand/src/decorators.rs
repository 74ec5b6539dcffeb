//! Built-in attribute decorators.

use crate::derive;
use crate::registry::{AttrStage, Decorator, DecoratorContext, Registry};
use crate::ExpandError;
use ferric_ast::{
    find_attr, EnumVariant, ExprKind, ExprNode, Impl, Item, ItemEntry, MetaItem, StructField,
    TestDesc, TupleField, TypeRef,
};
use ferric_diagnostics::Span;

/// `#[cfg(pred)]` - deletes the decorated node when the predicate fails.
/// Deletion takes the shape the position allows: items become tombstones,
/// field and variant names are cleared, impls lose their self-type,
/// expressions become empty.
struct CfgDecorator;

impl Decorator for CfgDecorator {
    fn stage(&self) -> AttrStage {
        AttrStage::EarlyPre
    }

    fn handle_item(
        &self,
        ctx: &mut DecoratorContext<'_>,
        span: &Span,
        mi: &MetaItem,
        entry: &mut ItemEntry,
    ) -> Result<(), ExpandError> {
        if ctx.cfg.check(span, mi, ctx.diag)? {
            return Ok(());
        }
        log::debug!("cfg strip: item `{}`", entry.name);
        match &mut entry.item {
            Item::Impl(imp) => imp.self_ty = TypeRef::infer(),
            Item::MacroInvocation(mac) => mac.clear(),
            item => *item = Item::None,
        }
        Ok(())
    }

    fn handle_struct_field(
        &self,
        ctx: &mut DecoratorContext<'_>,
        span: &Span,
        mi: &MetaItem,
        field: &mut StructField,
    ) -> Result<(), ExpandError> {
        if !ctx.cfg.check(span, mi, ctx.diag)? {
            field.name.clear();
        }
        Ok(())
    }

    fn handle_tuple_field(
        &self,
        ctx: &mut DecoratorContext<'_>,
        span: &Span,
        mi: &MetaItem,
        field: &mut TupleField,
    ) -> Result<(), ExpandError> {
        if !ctx.cfg.check(span, mi, ctx.diag)? {
            field.ty = TypeRef::infer();
        }
        Ok(())
    }

    fn handle_variant(
        &self,
        ctx: &mut DecoratorContext<'_>,
        span: &Span,
        mi: &MetaItem,
        variant: &mut EnumVariant,
    ) -> Result<(), ExpandError> {
        if !ctx.cfg.check(span, mi, ctx.diag)? {
            variant.name.clear();
        }
        Ok(())
    }

    fn handle_impl(
        &self,
        ctx: &mut DecoratorContext<'_>,
        span: &Span,
        mi: &MetaItem,
        imp: &mut Impl,
    ) -> Result<(), ExpandError> {
        if !ctx.cfg.check(span, mi, ctx.diag)? {
            imp.self_ty = TypeRef::infer();
        }
        Ok(())
    }

    fn handle_expr(
        &self,
        ctx: &mut DecoratorContext<'_>,
        span: &Span,
        mi: &MetaItem,
        node: &mut ExprNode,
    ) -> Result<(), ExpandError> {
        if !ctx.cfg.check(span, mi, ctx.diag)? {
            node.kind = ExprKind::Tuple(Vec::new());
        }
        Ok(())
    }
}

/// `#[derive(Trait, ...)]` - synthesises impl items after the early walk
/// so their contents get macro-expanded by the late pass.
struct DeriveDecorator;

impl Decorator for DeriveDecorator {
    fn stage(&self) -> AttrStage {
        AttrStage::EarlyPost
    }

    fn handle_item(
        &self,
        ctx: &mut DecoratorContext<'_>,
        span: &Span,
        mi: &MetaItem,
        entry: &mut ItemEntry,
    ) -> Result<(), ExpandError> {
        if !matches!(entry.item, Item::Struct(_) | Item::Enum(_)) {
            return Err(ExpandError::BadAttribute {
                span: span.clone(),
                detail: format!("#[derive] on a {}", entry.item.describe()),
            });
        }
        for trait_mi in mi.items() {
            let generated = derive::expand_derive(span, &trait_mi.name, entry)?;
            log::debug!("derive({}) on `{}`", trait_mi.name, entry.name);
            ctx.new_items.push(generated);
        }
        Ok(())
    }
}

/// `#[test]` - collects the function into the crate's test list when the
/// harness is active. Runs last so cfg stripping and derives have
/// settled.
struct TestDecorator;

impl Decorator for TestDecorator {
    fn stage(&self) -> AttrStage {
        AttrStage::LatePost
    }

    fn handle_item(
        &self,
        ctx: &mut DecoratorContext<'_>,
        span: &Span,
        _mi: &MetaItem,
        entry: &mut ItemEntry,
    ) -> Result<(), ExpandError> {
        if !matches!(entry.item, Item::Function(_)) {
            return Err(ExpandError::BadAttribute {
                span: span.clone(),
                detail: "#[test] on a non-function".to_string(),
            });
        }
        if !ctx.test_harness {
            return Ok(());
        }
        let desc = TestDesc {
            name: entry.name.clone(),
            path: ctx.module_path.child(&entry.name),
            should_panic: find_attr(&entry.attrs, "should_panic").is_some(),
            ignore: find_attr(&entry.attrs, "ignore").is_some(),
        };
        log::debug!("collected test `{}`", desc.name);
        ctx.tests.push(desc);
        Ok(())
    }
}

/// Attributes that are recorded but change nothing during expansion
/// (later passes read them straight off the item)
struct MarkerDecorator;

impl Decorator for MarkerDecorator {
    fn stage(&self) -> AttrStage {
        AttrStage::LatePost
    }
}

/// Register every built-in decorator
pub fn register(registry: &mut Registry) {
    registry.register_decorator("cfg", Box::new(CfgDecorator));
    registry.register_decorator("derive", Box::new(DeriveDecorator));
    registry.register_decorator("test", Box::new(TestDecorator));
    for marker in [
        "inline",
        "repr",
        "allow",
        "warn",
        "deny",
        "doc",
        "cold",
        "must_use",
        "should_panic",
        "ignore",
        "macro_use",
        "macro_export",
        "no_mangle",
    ] {
        registry.register_decorator(marker, Box::new(MarkerDecorator));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::CfgState;
    use ferric_ast::{Function, ItemPath};
    use ferric_diagnostics::DiagnosticEngine;

    fn run_item_decorator(
        name: &str,
        mi: &MetaItem,
        entry: &mut ItemEntry,
        test_harness: bool,
    ) -> (Vec<TestDesc>, Vec<ItemEntry>) {
        let registry = Registry::with_builtins();
        let cfg = CfgState::new();
        let mut diag = DiagnosticEngine::new();
        let mut tests = Vec::new();
        let mut new_items = Vec::new();
        {
            let mut ctx = DecoratorContext {
                cfg: &cfg,
                diag: &mut diag,
                module_path: ItemPath::local_root(),
                test_harness,
                tests: &mut tests,
                new_items: &mut new_items,
            };
            registry
                .find_decorator(name)
                .expect("registered")
                .handle_item(&mut ctx, &Span::unknown(), mi, entry)
                .expect("decorator");
        }
        (tests, new_items)
    }

    #[test]
    fn test_cfg_tombstones_items() {
        let mut entry = ItemEntry::new(
            "gone",
            Item::Function(Function::new(vec![], TypeRef::unit(), None)),
        );
        let mi = MetaItem::list("cfg", vec![MetaItem::flag("nonexistent_flag")]);
        run_item_decorator("cfg", &mi, &mut entry, false);
        assert!(matches!(entry.item, Item::None));
    }

    #[test]
    fn test_test_decorator_collects() {
        let mut entry = ItemEntry::new(
            "works",
            Item::Function(Function::new(vec![], TypeRef::unit(), None)),
        );
        let mi = MetaItem::flag("test");
        let (tests, _) = run_item_decorator("test", &mi, &mut entry, true);
        assert_eq!(tests.len(), 1);
        assert_eq!(tests[0].name, "works");
        assert!(!tests[0].should_panic);
    }

    #[test]
    fn test_test_decorator_inactive_without_harness() {
        let mut entry = ItemEntry::new(
            "works",
            Item::Function(Function::new(vec![], TypeRef::unit(), None)),
        );
        let mi = MetaItem::flag("test");
        let (tests, _) = run_item_decorator("test", &mi, &mut entry, false);
        assert!(tests.is_empty());
    }
}
