//! Macro and attribute expansion (stage A of the middle-end).
//!
//! The crate tree is walked twice: the early pass strips `#[cfg]`,
//! evaluates early proc macros, and lets `#[derive]` synthesise items;
//! the late pass expands everything that was deferred (including the
//! contents of derived items), desugars the high-level expression forms,
//! and collects `#[test]` functions. Macro lookups that miss in the early
//! pass defer silently; a miss in the late pass is fatal.

use ferric_diagnostics::{error_codes, DiagnosticEngine, Fatal, Span};
use thiserror::Error;

pub mod cfg;
pub mod decorators;
pub mod derive;
pub mod desugar;
pub mod macro_rules;
pub mod proc_macros;
pub mod registry;
pub mod reparse;

pub use cfg::CfgState;
pub use registry::{AttrStage, Decorator, DecoratorContext, MacroContext, ProcMacro, Registry};
pub use reparse::{Reparse, TokenReparser};

use desugar::DesugarPaths;
use ferric_ast::{
    Attribute, Crate, EnumVariant, ExprKind, ExprNode, Item, ItemEntry, ItemPath, MacroInvocation,
    MacroRulesDef, Module, StructField, StructKind, TestDesc, TokenStream, TupleField, TypeRef,
    VariantKind,
};

#[derive(Debug, Error)]
pub enum ExpandError {
    #[error("unknown cfg() function `{name}`")]
    UnknownCfgFunction { span: Span, name: String },
    #[error("cfg(not(..)) takes exactly one argument")]
    CfgArity { span: Span },
    #[error("cannot find macro `{name}!` in this scope")]
    UnresolvedMacro { span: Span, name: String },
    #[error("malformed macro input: {detail}")]
    MacroInput { span: Span, detail: String },
    #[error("`#[derive({name})]` is not supported")]
    UnsupportedDerive { span: Span, name: String },
    #[error("malformed attribute: {detail}")]
    BadAttribute { span: Span, detail: String },
    #[error("{message}")]
    CompileError { span: Span, message: String },
    #[error("bad format string: {detail}")]
    BadFormatString { span: Span, detail: String },
}

impl ExpandError {
    pub fn span(&self) -> &Span {
        match self {
            ExpandError::UnknownCfgFunction { span, .. }
            | ExpandError::CfgArity { span }
            | ExpandError::UnresolvedMacro { span, .. }
            | ExpandError::MacroInput { span, .. }
            | ExpandError::UnsupportedDerive { span, .. }
            | ExpandError::BadAttribute { span, .. }
            | ExpandError::CompileError { span, .. }
            | ExpandError::BadFormatString { span, .. } => span,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ExpandError::UnknownCfgFunction { .. } => error_codes::UNKNOWN_CFG_FUNCTION,
            ExpandError::CfgArity { .. } => error_codes::CFG_ARITY,
            ExpandError::UnresolvedMacro { .. } => error_codes::UNRESOLVED_MACRO,
            ExpandError::MacroInput { .. } => error_codes::MACRO_INPUT,
            ExpandError::UnsupportedDerive { .. } => error_codes::UNSUPPORTED_DERIVE,
            ExpandError::BadAttribute { .. } => error_codes::BAD_ATTRIBUTE,
            ExpandError::CompileError { .. } => error_codes::COMPILE_ERROR,
            ExpandError::BadFormatString { .. } => error_codes::BAD_FORMAT_STRING,
        }
    }
}

impl From<ExpandError> for Fatal {
    fn from(err: ExpandError) -> Fatal {
        Fatal::new(err.span().clone(), err.code(), err.to_string())
    }
}

/// Rewrite `#[cfg_attr(pred, attr...)]` in an attribute list: when the
/// predicate holds the trailing attributes apply in place, otherwise the
/// whole thing disappears.
pub fn expand_cfg_attrs(
    attrs: &mut Vec<Attribute>,
    cfg: &CfgState,
    diag: &mut DiagnosticEngine,
) -> Result<(), ExpandError> {
    let mut out = Vec::with_capacity(attrs.len());
    for attr in attrs.drain(..) {
        if attr.name() != "cfg_attr" {
            out.push(attr);
            continue;
        }
        let items = attr.meta.items();
        if items.len() < 2 {
            return Err(ExpandError::BadAttribute {
                span: attr.span.clone(),
                detail: "cfg_attr needs a predicate and at least one attribute".to_string(),
            });
        }
        if cfg.check(&attr.span, &items[0], diag)? {
            for inner in &items[1..] {
                out.push(Attribute::new(attr.span.clone(), inner.clone()));
            }
        }
    }
    *attrs = out;
    Ok(())
}

/// One level of the module stack: the macros visible at this point of the
/// walk
struct ModScope {
    path: ItemPath,
    macros: Vec<MacroRulesDef>,
}

struct ExpandContext<'a> {
    registry: &'a Registry,
    cfg: &'a CfgState,
    reparser: &'a dyn Reparse,
    diag: &'a mut DiagnosticEngine,
    desugar_paths: DesugarPaths,
    test_harness: bool,
    tests: Vec<TestDesc>,
    mod_stack: Vec<ModScope>,
    /// Macros imported from `#[macro_use] extern crate`
    imported_macros: Vec<MacroRulesDef>,
    next_scope: u32,
    is_early: bool,
}

impl<'a> ExpandContext<'a> {
    fn current_module_path(&self) -> ItemPath {
        self.mod_stack
            .last()
            .map(|s| s.path.clone())
            .unwrap_or_default()
    }

    fn alloc_scope(&mut self) -> u32 {
        let id = self.next_scope;
        self.next_scope += 1;
        id
    }

    /// Resolve and run a macro invocation. `Ok(None)` means deferred to
    /// the late pass.
    fn expand_invocation(
        &mut self,
        mac: &MacroInvocation,
    ) -> Result<Option<TokenStream>, ExpandError> {
        // 1. The proc-macro handler table
        if let Some(handler) = self.registry.find_macro(&mac.name) {
            if !self.is_early || handler.expand_early() {
                log::debug!("expanding {}! via handler", mac.name);
                let module_path = self.current_module_path();
                let mut mctx = MacroContext {
                    cfg: self.cfg,
                    diag: &mut *self.diag,
                    module_path,
                };
                let out = handler.expand(&mut mctx, &mac.span, mac.ident.as_deref(), &mac.input)?;
                return Ok(Some(out));
            }
            return Ok(None);
        }

        // 2. The module stack, innermost first; later definitions shadow
        let found = self
            .mod_stack
            .iter()
            .rev()
            .find_map(|scope| scope.macros.iter().rev().find(|d| d.name == mac.name))
            .or_else(|| {
                self.imported_macros
                    .iter()
                    .rev()
                    .find(|d| d.name == mac.name)
            })
            .cloned();
        if let Some(def) = found {
            let scope_id = self.alloc_scope();
            log::debug!("expanding {}! via macro_rules (scope {scope_id})", mac.name);
            let out = macro_rules::expand_macro_rules(&def, &mac.span, &mac.input, scope_id)?;
            return Ok(Some(out));
        }

        // 3. Early misses defer; late misses are fatal
        if self.is_early {
            Ok(None)
        } else {
            Err(ExpandError::UnresolvedMacro {
                span: mac.span.clone(),
                name: mac.name.clone(),
            })
        }
    }

    /// Run the decorators of one stage over an item entry's attributes
    fn run_item_decorators(
        &mut self,
        entry: &mut ItemEntry,
        stage: AttrStage,
        new_items: &mut Vec<ItemEntry>,
    ) -> Result<(), ExpandError> {
        let attrs = entry.attrs.clone();
        for attr in &attrs {
            let Some(dec) = self.registry.find_decorator(attr.name()) else {
                continue;
            };
            if dec.stage() != stage {
                continue;
            }
            let module_path = self.current_module_path();
            let mut dctx = DecoratorContext {
                cfg: self.cfg,
                diag: &mut *self.diag,
                module_path,
                test_harness: self.test_harness,
                tests: &mut self.tests,
                new_items,
            };
            dec.handle_item(&mut dctx, &attr.span, &attr.meta, entry)?;
            if matches!(entry.item, Item::None) {
                break;
            }
        }
        Ok(())
    }

    fn run_variant_decorators(
        &mut self,
        attrs: &[Attribute],
        stage: AttrStage,
        variant: &mut EnumVariant,
    ) -> Result<(), ExpandError> {
        let mut unused = Vec::new();
        for attr in attrs {
            let Some(dec) = self.registry.find_decorator(attr.name()) else {
                continue;
            };
            if dec.stage() != stage {
                continue;
            }
            let module_path = self.current_module_path();
            let mut dctx = DecoratorContext {
                cfg: self.cfg,
                diag: &mut *self.diag,
                module_path,
                test_harness: self.test_harness,
                tests: &mut self.tests,
                new_items: &mut unused,
            };
            dec.handle_variant(&mut dctx, &attr.span, &attr.meta, variant)?;
        }
        Ok(())
    }

    fn run_struct_field_decorators(
        &mut self,
        attrs: &[Attribute],
        stage: AttrStage,
        field: &mut StructField,
    ) -> Result<(), ExpandError> {
        let mut unused = Vec::new();
        for attr in attrs {
            let Some(dec) = self.registry.find_decorator(attr.name()) else {
                continue;
            };
            if dec.stage() != stage {
                continue;
            }
            let module_path = self.current_module_path();
            let mut dctx = DecoratorContext {
                cfg: self.cfg,
                diag: &mut *self.diag,
                module_path,
                test_harness: self.test_harness,
                tests: &mut self.tests,
                new_items: &mut unused,
            };
            dec.handle_struct_field(&mut dctx, &attr.span, &attr.meta, field)?;
        }
        Ok(())
    }

    fn run_tuple_field_decorators(
        &mut self,
        attrs: &[Attribute],
        stage: AttrStage,
        field: &mut TupleField,
    ) -> Result<(), ExpandError> {
        let mut unused = Vec::new();
        for attr in attrs {
            let Some(dec) = self.registry.find_decorator(attr.name()) else {
                continue;
            };
            if dec.stage() != stage {
                continue;
            }
            let module_path = self.current_module_path();
            let mut dctx = DecoratorContext {
                cfg: self.cfg,
                diag: &mut *self.diag,
                module_path,
                test_harness: self.test_harness,
                tests: &mut self.tests,
                new_items: &mut unused,
            };
            dec.handle_tuple_field(&mut dctx, &attr.span, &attr.meta, field)?;
        }
        Ok(())
    }

    fn expand_module(&mut self, module: &mut Module) -> Result<(), ExpandError> {
        self.mod_stack.push(ModScope {
            path: module.path.clone(),
            macros: Vec::new(),
        });
        let result = self.expand_module_inner(module);
        self.mod_stack.pop();
        result
    }

    fn expand_module_inner(&mut self, module: &mut Module) -> Result<(), ExpandError> {
        // Items are processed in source order; expansion output is
        // appended and picked up by the same loop
        let mut i = 0;
        while i < module.items.len() {
            let mut entry = std::mem::replace(&mut module.items[i], ItemEntry::new("", Item::None));
            let mut new_items = Vec::new();
            let result = self.expand_item_entry(&mut entry, &mut new_items);
            module.items[i] = entry;
            module.items.append(&mut new_items);
            result?;
            i += 1;
        }

        // Pending invocations queued by earlier expansions
        let mut qi = 0;
        while qi < module.macro_invocations.len() {
            let mac = module.macro_invocations[qi].clone();
            if !mac.is_cleared() {
                if let Some(tokens) = self.expand_invocation(&mac)? {
                    let items = self.reparser.parse_items(&mac.span, &tokens)?;
                    module.items.extend(items);
                    module.macro_invocations[qi].clear();
                }
            }
            qi += 1;
        }

        // Newly appended items get the same treatment
        while i < module.items.len() {
            let mut entry = std::mem::replace(&mut module.items[i], ItemEntry::new("", Item::None));
            let mut new_items = Vec::new();
            let result = self.expand_item_entry(&mut entry, &mut new_items);
            module.items[i] = entry;
            module.items.append(&mut new_items);
            result?;
            i += 1;
        }

        for anon in &mut module.anon_modules {
            self.expand_module(anon)?;
        }
        Ok(())
    }

    fn expand_item_entry(
        &mut self,
        entry: &mut ItemEntry,
        new_items: &mut Vec<ItemEntry>,
    ) -> Result<(), ExpandError> {
        if self.is_early {
            expand_cfg_attrs(&mut entry.attrs, self.cfg, self.diag)?;
        }
        self.run_item_decorators(entry, AttrStage::pre(self.is_early), new_items)?;
        if matches!(entry.item, Item::None) {
            return Ok(());
        }

        match &mut entry.item {
            Item::Module(m) => self.expand_module(m)?,
            Item::MacroRules(def) => {
                let def = def.clone();
                if let Some(scope) = self.mod_stack.last_mut() {
                    scope.macros.push(def);
                }
            }
            Item::MacroInvocation(_) => {
                let taken = std::mem::replace(&mut entry.item, Item::None);
                if let Item::MacroInvocation(mac) = taken {
                    if mac.is_cleared() {
                        // cfg'd out; leave the tombstone
                    } else if let Some(tokens) = self.expand_invocation(&mac)? {
                        new_items.extend(self.reparser.parse_items(&mac.span, &tokens)?);
                    } else {
                        // Deferred to the late pass
                        entry.item = Item::MacroInvocation(mac);
                    }
                }
            }
            Item::Function(f) => {
                for (_, ty) in &mut f.args {
                    self.expand_type(ty)?;
                }
                self.expand_type(&mut f.ret)?;
                if let Some(body) = &mut f.body {
                    self.expand_expr(body)?;
                }
            }
            Item::Static(s) => {
                self.expand_type(&mut s.ty)?;
                if let Some(v) = &mut s.value {
                    self.expand_expr(v)?;
                }
            }
            Item::Const(c) => {
                self.expand_type(&mut c.ty)?;
                if let Some(v) = &mut c.value {
                    self.expand_expr(v)?;
                }
            }
            Item::Struct(def) => {
                let stage = AttrStage::pre(self.is_early);
                match &mut def.kind {
                    StructKind::Unit => {}
                    StructKind::Tuple(fields) => {
                        for field in fields.iter_mut() {
                            let attrs = field.attrs.clone();
                            self.run_tuple_field_decorators(&attrs, stage, field)?;
                            self.expand_type(&mut field.ty)?;
                        }
                    }
                    StructKind::Named(fields) => {
                        for field in fields.iter_mut() {
                            let attrs = field.attrs.clone();
                            self.run_struct_field_decorators(&attrs, stage, field)?;
                            self.expand_type(&mut field.ty)?;
                        }
                    }
                }
            }
            Item::Union(def) => {
                let stage = AttrStage::pre(self.is_early);
                for field in def.fields.iter_mut() {
                    let attrs = field.attrs.clone();
                    self.run_struct_field_decorators(&attrs, stage, field)?;
                    self.expand_type(&mut field.ty)?;
                }
            }
            Item::Enum(def) => {
                let stage = AttrStage::pre(self.is_early);
                for variant in def.variants.iter_mut() {
                    let attrs = variant.attrs.clone();
                    self.run_variant_decorators(&attrs, stage, variant)?;
                    if variant.name.is_empty() {
                        continue;
                    }
                    match &mut variant.kind {
                        VariantKind::Unit { .. } => {}
                        VariantKind::Tuple(fields) => {
                            for field in fields.iter_mut() {
                                self.expand_type(&mut field.ty)?;
                            }
                        }
                        VariantKind::Struct(fields) => {
                            for field in fields.iter_mut() {
                                self.expand_type(&mut field.ty)?;
                            }
                        }
                    }
                }
            }
            Item::Trait(def) => {
                for item in def.items.iter_mut() {
                    if let ferric_ast::TraitItem::Function(f) = &mut item.item {
                        for (_, ty) in &mut f.args {
                            self.expand_type(ty)?;
                        }
                        self.expand_type(&mut f.ret)?;
                        if let Some(body) = &mut f.body {
                            self.expand_expr(body)?;
                        }
                    }
                }
            }
            Item::Impl(imp) => {
                if !imp.is_cleared() {
                    self.expand_type(&mut imp.self_ty)?;
                    for item in imp.items.iter_mut() {
                        match &mut item.item {
                            ferric_ast::ImplItem::Function(f) => {
                                for (_, ty) in &mut f.args {
                                    self.expand_type(ty)?;
                                }
                                self.expand_type(&mut f.ret)?;
                                if let Some(body) = &mut f.body {
                                    self.expand_expr(body)?;
                                }
                            }
                            ferric_ast::ImplItem::Const(c) => {
                                self.expand_type(&mut c.ty)?;
                                if let Some(v) = &mut c.value {
                                    self.expand_expr(v)?;
                                }
                            }
                            ferric_ast::ImplItem::Type(ty) => self.expand_type(ty)?,
                        }
                    }
                }
            }
            Item::TypeAlias(alias) => self.expand_type(&mut alias.ty)?,
            Item::None
            | Item::ExternCrate { .. }
            | Item::Use(_)
            | Item::TraitAlias(_)
            | Item::NegImpl(_)
            | Item::ExternBlock(_) => {}
        }

        self.run_item_decorators(entry, AttrStage::post(self.is_early), new_items)?;
        Ok(())
    }

    fn expand_expr(&mut self, node: &mut ExprNode) -> Result<(), ExpandError> {
        // Expression attributes (cfg on expressions) first
        if self.is_early && !node.attrs.is_empty() {
            expand_cfg_attrs(&mut node.attrs, self.cfg, self.diag)?;
            let attrs = node.attrs.clone();
            let stage = AttrStage::pre(self.is_early);
            for attr in &attrs {
                let Some(dec) = self.registry.find_decorator(attr.name()) else {
                    continue;
                };
                if dec.stage() != stage {
                    continue;
                }
                let module_path = self.current_module_path();
                let mut unused = Vec::new();
                let mut dctx = DecoratorContext {
                    cfg: self.cfg,
                    diag: &mut *self.diag,
                    module_path,
                    test_harness: self.test_harness,
                    tests: &mut self.tests,
                    new_items: &mut unused,
                };
                dec.handle_expr(&mut dctx, &attr.span, &attr.meta, node)?;
            }
        }

        node.for_each_child_mut(&mut |child| self.expand_expr(child))?;

        // Expression-position macro invocation
        if let ExprKind::Macro(mac) = &node.kind {
            let mac = mac.clone();
            if !mac.is_cleared() {
                if let Some(tokens) = self.expand_invocation(&mac)? {
                    let mut parsed = self.reparser.parse_expr(&mac.span, &tokens)?;
                    parsed.span = mac.span.clone();
                    // The fresh subtree may itself contain sugar/macros
                    self.expand_expr(&mut parsed)?;
                    *node = parsed;
                }
            } else {
                node.kind = ExprKind::Tuple(Vec::new());
            }
        }

        // Sugar goes away in the late pass, after children settled
        if !self.is_early {
            let scope = self.alloc_scope();
            if desugar::desugar_expr(node, &self.desugar_paths, scope) {
                // Desugaring introduces match/loop scaffolding that may
                // itself contain sugar (nested for loops)
                node.for_each_child_mut(&mut |child| self.expand_expr(child))?;
            }
        }
        Ok(())
    }

    fn expand_type(&mut self, ty: &mut TypeRef) -> Result<(), ExpandError> {
        match ty {
            TypeRef::Macro(tm) => {
                let mac = MacroInvocation {
                    span: tm.span.clone(),
                    name: tm.name.clone(),
                    ident: None,
                    input: tm.input.clone(),
                };
                if let Some(tokens) = self.expand_invocation(&mac)? {
                    let parsed = self.reparser.parse_type(&mac.span, &tokens)?;
                    *ty = parsed;
                    self.expand_type(ty)?;
                }
                Ok(())
            }
            TypeRef::Array { inner, .. }
            | TypeRef::Slice { inner }
            | TypeRef::Borrow { inner, .. }
            | TypeRef::Pointer { inner, .. } => self.expand_type(inner),
            TypeRef::Tuple(elems) => {
                for e in elems {
                    self.expand_type(e)?;
                }
                Ok(())
            }
            TypeRef::Function(sig) => {
                for a in &mut sig.args {
                    self.expand_type(a)?;
                }
                self.expand_type(&mut sig.ret)
            }
            TypeRef::Path(path) => {
                if let Some(nodes) = path.nodes_mut() {
                    for node in nodes.iter_mut() {
                        for arg in &mut node.args {
                            self.expand_type(arg)?;
                        }
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Collect macros made visible by `#[macro_use] extern crate`
fn collect_imported_macros(krate: &Crate) -> Vec<MacroRulesDef> {
    let mut out = Vec::new();
    for entry in &krate.root.items {
        let Item::ExternCrate { krate: name } = &entry.item else {
            continue;
        };
        if ferric_ast::find_attr(&entry.attrs, "macro_use").is_none() {
            continue;
        }
        if let Some(info) = krate.extern_crates.get(name) {
            out.extend(info.root.macros().cloned());
        }
    }
    out
}

/// Run the full expansion stage over a crate
pub fn expand_crate(
    krate: &mut Crate,
    registry: &Registry,
    cfg: &CfgState,
    reparser: &dyn Reparse,
    diag: &mut DiagnosticEngine,
) -> Result<(), ExpandError> {
    let mut ctx = ExpandContext {
        registry,
        cfg,
        reparser,
        diag,
        desugar_paths: DesugarPaths::from_lang_items(&krate.lang_items),
        test_harness: krate.test_harness,
        tests: Vec::new(),
        mod_stack: Vec::new(),
        imported_macros: collect_imported_macros(krate),
        next_scope: 1,
        is_early: true,
    };

    expand_cfg_attrs(&mut krate.attrs, cfg, ctx.diag)?;
    // Crate-level attributes may switch on the test harness
    if krate.attrs.iter().any(|a| a.name() == "test_harness") {
        ctx.test_harness = true;
    }

    for is_early in [true, false] {
        ctx.is_early = is_early;
        log::info!(
            "expansion: {} pass",
            if is_early { "early" } else { "late" }
        );
        ctx.expand_module(&mut krate.root)?;
    }

    krate.test_harness = ctx.test_harness;
    krate.tests.append(&mut ctx.tests);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferric_ast::{MetaItem, Path};

    fn expand(krate: &mut Crate, cfg: &CfgState) -> Result<(), ExpandError> {
        let registry = Registry::with_builtins();
        let reparser = TokenReparser::new();
        let mut diag = DiagnosticEngine::new();
        expand_crate(krate, &registry, cfg, &reparser, &mut diag)
    }

    #[test]
    fn test_cfg_attr_rewrite() {
        let mut attrs = vec![Attribute::new(
            Span::unknown(),
            MetaItem::list(
                "cfg_attr",
                vec![MetaItem::flag("set_flag"), MetaItem::flag("inline")],
            ),
        )];
        let mut cfg = CfgState::new();
        cfg.set_flag("set_flag");
        let mut diag = DiagnosticEngine::new();
        expand_cfg_attrs(&mut attrs, &cfg, &mut diag).unwrap();
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs[0].name(), "inline");
    }

    #[test]
    fn test_cfg_attr_disappears_when_false() {
        let mut attrs = vec![Attribute::new(
            Span::unknown(),
            MetaItem::list(
                "cfg_attr",
                vec![MetaItem::flag("missing"), MetaItem::flag("inline")],
            ),
        )];
        let cfg = CfgState::new();
        let mut diag = DiagnosticEngine::new();
        expand_cfg_attrs(&mut attrs, &cfg, &mut diag).unwrap();
        assert!(attrs.is_empty());
    }

    #[test]
    fn test_unresolved_macro_defers_then_fails() {
        let mut krate = Crate::new();
        krate.root.items.push(ItemEntry::new(
            "",
            Item::MacroInvocation(MacroInvocation::new("no_such", vec![])),
        ));
        let cfg = CfgState::new();
        let err = expand(&mut krate, &cfg);
        assert!(matches!(
            err,
            Err(ExpandError::UnresolvedMacro { name, .. }) if name == "no_such"
        ));
    }

    #[test]
    fn test_expr_macro_expansion() {
        use ferric_ast::{Function, Stmt};
        // fn f() { let x = cfg!(foo); }
        let body = ExprNode::block(
            vec![Stmt::Let {
                pat: ferric_ast::Pattern::maybe_bind("x"),
                ty: TypeRef::infer(),
                value: Some(ExprNode::new(ExprKind::Macro(MacroInvocation::new(
                    "cfg",
                    vec![ferric_ast::TokenTree::token(ferric_ast::Token::ident("foo"))],
                )))),
            }],
            None,
        );
        let mut krate = Crate::new();
        krate.root.items.push(ItemEntry::new(
            "f",
            Item::Function(Function::new(vec![], TypeRef::unit(), Some(body))),
        ));
        let mut cfg = CfgState::new();
        cfg.set_flag("foo");
        expand(&mut krate, &cfg).unwrap();

        let Item::Function(f) = &krate.root.item("f").unwrap().item else {
            panic!("expected fn");
        };
        let ExprKind::Block { stmts, .. } = &f.body.as_ref().unwrap().kind else {
            panic!("expected block");
        };
        let Stmt::Let { value: Some(v), .. } = &stmts[0] else {
            panic!("expected let");
        };
        assert!(matches!(
            v.kind,
            ExprKind::Literal(ferric_ast::Literal::Bool(true))
        ));
    }

    #[test]
    fn test_macro_rules_item_generation() {
        use ferric_ast::{MacroRule, Token, TokenTree};
        // macro_rules! def_const { ($n:ident) => { const $n: u32 = 1; } }
        // def_const!(A);
        let rule = MacroRule {
            pattern: vec![
                TokenTree::token(Token::punct("$")),
                TokenTree::token(Token::ident("n")),
                TokenTree::token(Token::punct(":")),
                TokenTree::token(Token::ident("ident")),
            ],
            body: vec![
                TokenTree::token(Token::ident("const")),
                TokenTree::token(Token::punct("$")),
                TokenTree::token(Token::ident("n")),
                TokenTree::token(Token::punct(":")),
                TokenTree::token(Token::ident("u32")),
                TokenTree::token(Token::punct("=")),
                TokenTree::token(Token::IntLit {
                    value: 1,
                    suffix: None,
                }),
                TokenTree::token(Token::punct(";")),
            ],
        };
        let mut krate = Crate::new();
        krate.root.items.push(ItemEntry::new(
            "def_const",
            Item::MacroRules(MacroRulesDef {
                name: "def_const".to_string(),
                rules: vec![rule],
                def_module: ItemPath::local_root(),
            }),
        ));
        krate.root.items.push(ItemEntry::new(
            "",
            Item::MacroInvocation(MacroInvocation::new(
                "def_const",
                vec![ferric_ast::TokenTree::token(Token::ident("A"))],
            )),
        ));
        let cfg = CfgState::new();
        expand(&mut krate, &cfg).unwrap();
        let generated = krate.root.item("A").expect("generated const");
        assert!(matches!(generated.item, Item::Const(_)));
    }

    #[test]
    fn test_derive_generates_impl_in_module() {
        use ferric_ast::{Struct, StructKind};
        let mut entry = ItemEntry::new(
            "Unit",
            Item::Struct(Struct {
                generics: Default::default(),
                kind: StructKind::Unit,
            }),
        );
        entry.attrs.push(Attribute::new(
            Span::unknown(),
            MetaItem::list("derive", vec![MetaItem::flag("Clone")]),
        ));
        let mut krate = Crate::new();
        krate.root.items.push(entry);
        let cfg = CfgState::new();
        expand(&mut krate, &cfg).unwrap();
        assert_eq!(krate.root.impls().count(), 1);
    }

    #[test]
    fn test_use_statement_cfg_strip() {
        let mut entry = ItemEntry::new(
            "u",
            Item::Use(ferric_ast::UseItem {
                path: Path::ident("m"),
                is_glob: false,
            }),
        );
        entry.attrs.push(Attribute::new(
            Span::unknown(),
            MetaItem::list("cfg", vec![MetaItem::flag("never_set")]),
        ));
        let mut krate = Crate::new();
        krate.root.items.push(entry);
        let cfg = CfgState::new();
        expand(&mut krate, &cfg).unwrap();
        assert!(matches!(krate.root.items[0].item, Item::None));
    }
}
