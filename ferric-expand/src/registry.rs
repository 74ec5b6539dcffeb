//! Handler registries for procedural macros and attribute decorators.
//!
//! Both registries are built once at startup and threaded by reference
//! into the expansion driver; nothing here is global state.

use crate::cfg::CfgState;
use crate::ExpandError;
use ferric_ast::{
    EnumVariant, ExprNode, Impl, ItemEntry, ItemPath, MetaItem, StructField, TestDesc, TokenStream,
    TokenTree, TupleField,
};
use ferric_diagnostics::{DiagnosticEngine, Span};
use std::collections::HashMap;

/// When a decorator runs. The tree is walked twice (early, late); each
/// walk applies the matching Pre stage before descending into an item and
/// the Post stage after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrStage {
    EarlyPre,
    EarlyPost,
    LatePre,
    LatePost,
}

impl AttrStage {
    pub fn pre(is_early: bool) -> Self {
        if is_early {
            AttrStage::EarlyPre
        } else {
            AttrStage::LatePre
        }
    }

    pub fn post(is_early: bool) -> Self {
        if is_early {
            AttrStage::EarlyPost
        } else {
            AttrStage::LatePost
        }
    }
}

/// Ambient state handed to a proc-macro handler
pub struct MacroContext<'a> {
    pub cfg: &'a CfgState,
    pub diag: &'a mut DiagnosticEngine,
    pub module_path: ItemPath,
}

/// A built-in function-like macro (`cfg!`, `concat!`, `line!`, ...)
pub trait ProcMacro {
    /// Whether this handler participates in the early pass
    fn expand_early(&self) -> bool {
        true
    }

    fn expand(
        &self,
        ctx: &mut MacroContext<'_>,
        span: &Span,
        ident: Option<&str>,
        input: &[TokenTree],
    ) -> Result<TokenStream, ExpandError>;
}

/// Ambient state handed to a decorator handler
pub struct DecoratorContext<'a> {
    pub cfg: &'a CfgState,
    pub diag: &'a mut DiagnosticEngine,
    pub module_path: ItemPath,
    pub test_harness: bool,
    /// Test descriptors collected by `#[test]`
    pub tests: &'a mut Vec<TestDesc>,
    /// Items synthesised by the decorator (derive impls), appended to the
    /// owning module after the current item
    pub new_items: &'a mut Vec<ItemEntry>,
}

/// An attribute handler. Positions a decorator does not care about fall
/// through as no-ops; `#[cfg]` overrides every position.
pub trait Decorator {
    fn stage(&self) -> AttrStage;

    fn handle_item(
        &self,
        ctx: &mut DecoratorContext<'_>,
        span: &Span,
        mi: &MetaItem,
        entry: &mut ItemEntry,
    ) -> Result<(), ExpandError> {
        let _ = (ctx, span, mi, entry);
        Ok(())
    }

    fn handle_struct_field(
        &self,
        ctx: &mut DecoratorContext<'_>,
        span: &Span,
        mi: &MetaItem,
        field: &mut StructField,
    ) -> Result<(), ExpandError> {
        let _ = (ctx, span, mi, field);
        Ok(())
    }

    fn handle_tuple_field(
        &self,
        ctx: &mut DecoratorContext<'_>,
        span: &Span,
        mi: &MetaItem,
        field: &mut TupleField,
    ) -> Result<(), ExpandError> {
        let _ = (ctx, span, mi, field);
        Ok(())
    }

    fn handle_variant(
        &self,
        ctx: &mut DecoratorContext<'_>,
        span: &Span,
        mi: &MetaItem,
        variant: &mut EnumVariant,
    ) -> Result<(), ExpandError> {
        let _ = (ctx, span, mi, variant);
        Ok(())
    }

    fn handle_impl(
        &self,
        ctx: &mut DecoratorContext<'_>,
        span: &Span,
        mi: &MetaItem,
        imp: &mut Impl,
    ) -> Result<(), ExpandError> {
        let _ = (ctx, span, mi, imp);
        Ok(())
    }

    fn handle_expr(
        &self,
        ctx: &mut DecoratorContext<'_>,
        span: &Span,
        mi: &MetaItem,
        node: &mut ExprNode,
    ) -> Result<(), ExpandError> {
        let _ = (ctx, span, mi, node);
        Ok(())
    }
}

/// The two handler tables, filled by [`Registry::with_builtins`] at
/// process start
#[derive(Default)]
pub struct Registry {
    macros: HashMap<String, Box<dyn ProcMacro>>,
    decorators: HashMap<String, Box<dyn Decorator>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// The standard handler set
    pub fn with_builtins() -> Self {
        let mut registry = Registry::new();
        crate::proc_macros::register(&mut registry);
        crate::decorators::register(&mut registry);
        registry
    }

    pub fn register_macro(&mut self, name: &str, handler: Box<dyn ProcMacro>) {
        self.macros.insert(name.to_string(), handler);
    }

    pub fn register_decorator(&mut self, name: &str, handler: Box<dyn Decorator>) {
        self.decorators.insert(name.to_string(), handler);
    }

    pub fn find_macro(&self, name: &str) -> Option<&dyn ProcMacro> {
        self.macros.get(name).map(|b| b.as_ref())
    }

    pub fn find_decorator(&self, name: &str) -> Option<&dyn Decorator> {
        self.decorators.get(name).map(|b| b.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_tables_are_populated() {
        let registry = Registry::with_builtins();
        assert!(registry.find_macro("cfg").is_some());
        assert!(registry.find_macro("concat").is_some());
        assert!(registry.find_decorator("cfg").is_some());
        assert!(registry.find_decorator("derive").is_some());
        assert!(registry.find_macro("no_such_macro").is_none());
    }

    #[test]
    fn test_stage_selection() {
        assert_eq!(AttrStage::pre(true), AttrStage::EarlyPre);
        assert_eq!(AttrStage::post(true), AttrStage::EarlyPost);
        assert_eq!(AttrStage::pre(false), AttrStage::LatePre);
        assert_eq!(AttrStage::post(false), AttrStage::LatePost);
    }
}
