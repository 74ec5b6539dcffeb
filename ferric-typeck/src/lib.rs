//! Type inference and checking (stage E of the middle-end).
//!
//! One inference context per function body: an enumeration pass
//! allocates inference variables for every type hole, an iteration pass
//! applies the typing rules until nothing changes, and a validation pass
//! rejects any hole that survived. Coercion nodes are inserted along the
//! way wherever the language permits them.

use ferric_diagnostics::{error_codes, Fatal, Span};
use thiserror::Error;

pub mod calls;
pub mod equality;
pub mod infer;
pub mod ivars;
pub mod method;
pub mod ops;
pub mod pattern;
pub mod traits;

pub use infer::InferContext;
pub use ivars::{IVar, IVarTable};

use ferric_ast::{
    Crate, ExprNode, GenericParams, Impl, Item, ItemPath, Pattern, TypeRef,
};

#[derive(Debug, Error)]
pub enum TypeError {
    #[error("type mismatch: `{left}` vs `{right}`")]
    Mismatch {
        span: Span,
        left: String,
        right: String,
    },
    #[error("cannot infer type: {detail}")]
    CannotInfer { span: Span, detail: String },
    #[error("multiple applicable methods named `{name}`")]
    AmbiguousMethod { span: Span, name: String },
    #[error("no method `{name}` found for `{ty}`")]
    NoMethod { span: Span, ty: String, name: String },
    #[error("no field `{name}` on `{ty}`")]
    NoField { span: Span, ty: String, name: String },
    #[error("associated type expansion exceeded the depth limit")]
    ProjectionDepth { span: Span },
    #[error("operator `{op}` cannot be applied to `{ty}`")]
    BadOperator { span: Span, op: String, ty: String },
    #[error("this call takes {expected} argument(s) but {found} were supplied")]
    ArgumentCount {
        span: Span,
        expected: usize,
        found: usize,
    },
    #[error("type inference did not converge")]
    InferLoop { span: Span },
    #[error("unexpected node at inference: {detail}")]
    Unexpected { span: Span, detail: String },
}

impl TypeError {
    pub fn span(&self) -> &Span {
        match self {
            TypeError::Mismatch { span, .. }
            | TypeError::CannotInfer { span, .. }
            | TypeError::AmbiguousMethod { span, .. }
            | TypeError::NoMethod { span, .. }
            | TypeError::NoField { span, .. }
            | TypeError::ProjectionDepth { span }
            | TypeError::BadOperator { span, .. }
            | TypeError::ArgumentCount { span, .. }
            | TypeError::InferLoop { span }
            | TypeError::Unexpected { span, .. } => span,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            TypeError::Mismatch { .. } => error_codes::TYPE_MISMATCH,
            TypeError::CannotInfer { .. } => error_codes::CANNOT_INFER,
            TypeError::AmbiguousMethod { .. } => error_codes::AMBIGUOUS_METHOD,
            TypeError::NoMethod { .. } => error_codes::NO_METHOD,
            TypeError::NoField { .. } => error_codes::NO_FIELD,
            TypeError::ProjectionDepth { .. } => error_codes::PROJECTION_DEPTH,
            TypeError::BadOperator { .. } => error_codes::BAD_OPERATOR,
            TypeError::ArgumentCount { .. } => error_codes::ARGUMENT_COUNT,
            TypeError::InferLoop { .. } => error_codes::INFER_LOOP,
            TypeError::Unexpected { .. } => error_codes::UNEXPECTED_NODE,
        }
    }
}

impl From<TypeError> for Fatal {
    fn from(err: TypeError) -> Fatal {
        Fatal::new(err.span().clone(), err.code(), err.to_string())
    }
}

/// A crate-level impl, carried with the module it appeared in
#[derive(Debug, Clone)]
pub struct ImplData {
    pub module: ItemPath,
    pub imp: Impl,
}

/// Gather every live impl in the crate (and its dependencies) into one
/// flat list for trait resolution.
pub fn collect_impls(krate: &Crate) -> Vec<ImplData> {
    let mut out = Vec::new();
    let mut visit = |module: &ferric_ast::Module| {
        for imp in module.impls() {
            out.push(ImplData {
                module: module.path.clone(),
                imp: imp.clone(),
            });
        }
    };
    krate.visit_modules(&mut visit);
    for info in krate.extern_crates.values() {
        let mut module_stack = vec![&info.root];
        while let Some(module) = module_stack.pop() {
            for imp in module.impls() {
                out.push(ImplData {
                    module: module.path.clone(),
                    imp: imp.clone(),
                });
            }
            for entry in &module.items {
                if let Item::Module(child) = &entry.item {
                    module_stack.push(child);
                }
            }
        }
    }
    out
}

/// Where a checked body lives in the tree
#[derive(Debug, Clone)]
enum BodySlot {
    Item { module: ItemPath, index: usize },
    ImplItem {
        module: ItemPath,
        item_index: usize,
        fn_index: usize,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct BodyJob {
    slot: BodySlot,
    pub span: Span,
    pub self_ty: Option<TypeRef>,
    pub impl_generics: GenericParams,
    pub fn_generics: GenericParams,
    pub args: Vec<(Pattern, TypeRef)>,
    pub ret: TypeRef,
}

fn collect_bodies(krate: &Crate) -> Vec<BodyJob> {
    let mut jobs = Vec::new();
    let mut visit = |module: &ferric_ast::Module| {
        for (index, entry) in module.items.iter().enumerate() {
            match &entry.item {
                Item::Function(f) if f.body.is_some() => jobs.push(BodyJob {
                    slot: BodySlot::Item {
                        module: module.path.clone(),
                        index,
                    },
                    span: entry.span.clone(),
                    self_ty: None,
                    impl_generics: GenericParams::default(),
                    fn_generics: f.generics.clone(),
                    args: f.args.clone(),
                    ret: f.ret.clone(),
                }),
                Item::Static(s) if s.value.is_some() => jobs.push(BodyJob {
                    slot: BodySlot::Item {
                        module: module.path.clone(),
                        index,
                    },
                    span: entry.span.clone(),
                    self_ty: None,
                    impl_generics: GenericParams::default(),
                    fn_generics: GenericParams::default(),
                    args: Vec::new(),
                    ret: s.ty.clone(),
                }),
                Item::Const(c) if c.value.is_some() => jobs.push(BodyJob {
                    slot: BodySlot::Item {
                        module: module.path.clone(),
                        index,
                    },
                    span: entry.span.clone(),
                    self_ty: None,
                    impl_generics: GenericParams::default(),
                    fn_generics: GenericParams::default(),
                    args: Vec::new(),
                    ret: c.ty.clone(),
                }),
                Item::Impl(imp) if !imp.is_cleared() => {
                    for (fn_index, item) in imp.items.iter().enumerate() {
                        let ferric_ast::ImplItem::Function(f) = &item.item else {
                            continue;
                        };
                        if f.body.is_none() {
                            continue;
                        }
                        jobs.push(BodyJob {
                            slot: BodySlot::ImplItem {
                                module: module.path.clone(),
                                item_index: index,
                                fn_index,
                            },
                            span: entry.span.clone(),
                            self_ty: Some(imp.self_ty.clone()),
                            impl_generics: imp.generics.clone(),
                            fn_generics: f.generics.clone(),
                            args: f.args.clone(),
                            ret: f.ret.clone(),
                        });
                    }
                }
                _ => {}
            }
        }
    };
    krate.visit_modules(&mut visit);
    jobs
}

fn take_body(krate: &mut Crate, slot: &BodySlot) -> Option<ExprNode> {
    match slot {
        BodySlot::Item { module, index } => {
            let entry = krate.module_at_mut(module)?.items.get_mut(*index)?;
            match &mut entry.item {
                Item::Function(f) => f.body.take(),
                Item::Static(s) => s.value.take(),
                Item::Const(c) => c.value.take(),
                _ => None,
            }
        }
        BodySlot::ImplItem {
            module,
            item_index,
            fn_index,
        } => {
            let entry = krate.module_at_mut(module)?.items.get_mut(*item_index)?;
            let Item::Impl(imp) = &mut entry.item else {
                return None;
            };
            let ferric_ast::ImplItem::Function(f) = &mut imp.items.get_mut(*fn_index)?.item
            else {
                return None;
            };
            f.body.take()
        }
    }
}

fn put_body(krate: &mut Crate, slot: &BodySlot, body: ExprNode) {
    match slot {
        BodySlot::Item { module, index } => {
            if let Some(entry) = krate
                .module_at_mut(module)
                .and_then(|m| m.items.get_mut(*index))
            {
                match &mut entry.item {
                    Item::Function(f) => f.body = Some(body),
                    Item::Static(s) => s.value = Some(body),
                    Item::Const(c) => c.value = Some(body),
                    _ => {}
                }
            }
        }
        BodySlot::ImplItem {
            module,
            item_index,
            fn_index,
        } => {
            if let Some(entry) = krate
                .module_at_mut(module)
                .and_then(|m| m.items.get_mut(*item_index))
            {
                if let Item::Impl(imp) = &mut entry.item {
                    if let Some(item) = imp.items.get_mut(*fn_index) {
                        if let ferric_ast::ImplItem::Function(f) = &mut item.item {
                            f.body = Some(body);
                        }
                    }
                }
            }
        }
    }
}

/// Run inference over every function, const, and static body in the
/// crate. Contexts are independent; ivars are never shared across
/// bodies.
pub fn check_crate(krate: &mut Crate) -> Result<(), TypeError> {
    let impls = collect_impls(krate);
    let jobs = collect_bodies(krate);
    log::info!(
        "inference: {} bodies, {} impls in scope",
        jobs.len(),
        impls.len()
    );
    for job in jobs {
        let Some(mut body) = take_body(krate, &job.slot) else {
            continue;
        };
        let result = infer::infer_body(krate, &impls, &job, &mut body);
        put_body(krate, &job.slot, body);
        result?;
    }
    Ok(())
}
