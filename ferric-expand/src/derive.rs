//! `#[derive(...)]` implementations.
//!
//! Each supported trait synthesises a plain impl item in the AST; the
//! late expansion pass then treats the generated code like hand-written
//! source.

use crate::ExpandError;
use ferric_ast::{
    expr::BinOp, ConstItem, EnumVariant, ExprKind, ExprNode, GenericBound, Impl, ImplItem,
    ImplItemEntry, Item, ItemEntry, MatchArm, Path, PathNode, Pattern, PatternKind, PatternValue,
    Struct, StructKind, TypeRef, VariantKind,
};
use ferric_ast::{Function, GenericParams};
use ferric_diagnostics::Span;

pub fn expand_derive(
    span: &Span,
    trait_name: &str,
    entry: &ItemEntry,
) -> Result<ItemEntry, ExpandError> {
    let imp = match trait_name {
        "Clone" => derive_clone(span, entry)?,
        "Copy" => derive_marker(entry, &["core", "marker", "Copy"]),
        "PartialEq" => derive_partial_eq(span, entry)?,
        "Default" => derive_default(span, entry)?,
        other => {
            return Err(ExpandError::UnsupportedDerive {
                span: span.clone(),
                name: other.to_string(),
            })
        }
    };
    // Impl blocks are nameless entries in the module item list
    let mut out = ItemEntry::new("", Item::Impl(imp));
    out.span = span.clone();
    Ok(out)
}

/// The decorated type as written: `Name<T, U>`
fn self_type(entry: &ItemEntry) -> TypeRef {
    let generics = item_generics(entry);
    let args: Vec<TypeRef> = generics
        .types
        .iter()
        .map(|p| TypeRef::path(Path::ident(&p.name)))
        .collect();
    TypeRef::path(Path {
        class: ferric_ast::PathClass::Relative {
            hygiene: ferric_ast::Hygiene::source(),
            nodes: vec![PathNode::with_args(&entry.name, args)],
        },
        bindings: Default::default(),
    })
}

fn item_generics(entry: &ItemEntry) -> &GenericParams {
    static EMPTY: GenericParams = GenericParams {
        lifetimes: Vec::new(),
        types: Vec::new(),
        consts: Vec::new(),
        bounds: Vec::new(),
    };
    match &entry.item {
        Item::Struct(s) => &s.generics,
        Item::Enum(e) => &e.generics,
        _ => &EMPTY,
    }
}

/// Generics for the impl: the type's own parameters, each additionally
/// bounded by the derived trait
fn impl_generics(entry: &ItemEntry, trait_path: &[&str]) -> GenericParams {
    let mut generics = item_generics(entry).clone();
    for param in generics.types.clone() {
        generics.bounds.push(GenericBound::TraitBound {
            hrtb: Vec::new(),
            ty: TypeRef::path(Path::ident(&param.name)),
            trait_path: Path::absolute_named("core", trait_path),
        });
    }
    generics
}

fn self_ty_ref() -> TypeRef {
    TypeRef::path(Path::ident("Self"))
}

fn self_value() -> ExprNode {
    ExprNode::named(Path::ident("self"))
}

fn clone_call(receiver: ExprNode) -> ExprNode {
    ExprNode::new(ExprKind::CallMethod {
        receiver: Box::new(receiver),
        method: PathNode::new("clone"),
        args: Vec::new(),
        cache: Default::default(),
    })
}

fn field_of(receiver: ExprNode, name: &str) -> ExprNode {
    ExprNode::new(ExprKind::Field {
        receiver: Box::new(receiver),
        name: name.to_string(),
    })
}

fn method_fn(args: Vec<(Pattern, TypeRef)>, ret: TypeRef, body: ExprNode) -> Function {
    Function::new(args, ret, Some(body))
}

fn impl_block(entry: &ItemEntry, trait_segs: &[&str], items: Vec<ImplItemEntry>) -> Impl {
    Impl {
        generics: impl_generics(entry, trait_segs),
        trait_path: Some(Path::absolute_named("core", trait_segs)),
        self_ty: self_type(entry),
        items,
    }
}

/// Marker traits (`Copy`): an empty impl
fn derive_marker(entry: &ItemEntry, trait_segs: &[&str]) -> Impl {
    impl_block(entry, trait_segs, Vec::new())
}

fn derive_clone(span: &Span, entry: &ItemEntry) -> Result<Impl, ExpandError> {
    let body = match &entry.item {
        Item::Struct(def) => clone_struct_body(entry, def),
        Item::Enum(def) => clone_enum_body(entry, def),
        other => {
            return Err(ExpandError::BadAttribute {
                span: span.clone(),
                detail: format!("derive(Clone) on a {}", other.describe()),
            })
        }
    };
    let receiver = (
        Pattern::bind("self", ferric_ast::Hygiene::source()),
        TypeRef::borrow(self_ty_ref()),
    );
    let clone_fn = method_fn(vec![receiver], self_ty_ref(), body);
    Ok(impl_block(
        entry,
        &["clone", "Clone"],
        vec![ImplItemEntry {
            name: "clone".to_string(),
            is_pub: false,
            attrs: Vec::new(),
            item: ImplItem::Function(clone_fn),
        }],
    ))
}

fn clone_struct_body(entry: &ItemEntry, def: &Struct) -> ExprNode {
    match &def.kind {
        StructKind::Unit => ExprNode::named(Path::ident(&entry.name)),
        StructKind::Tuple(fields) => ExprNode::call_path(
            Path::ident(&entry.name),
            (0..fields.len())
                .map(|i| clone_call(field_of(self_value(), &i.to_string())))
                .collect(),
        ),
        StructKind::Named(fields) => ExprNode::new(ExprKind::StructLiteral {
            path: Path::ident(&entry.name),
            fields: fields
                .iter()
                .filter(|f| !f.name.is_empty())
                .map(|f| (f.name.clone(), clone_call(field_of(self_value(), &f.name))))
                .collect(),
            base: None,
        }),
    }
}

fn variant_path(entry: &ItemEntry, variant: &EnumVariant) -> Path {
    Path::relative(vec![
        PathNode::new(&entry.name),
        PathNode::new(&variant.name),
    ])
}

fn clone_enum_body(entry: &ItemEntry, def: &ferric_ast::Enum) -> ExprNode {
    let mut arms = Vec::new();
    for variant in def.variants.iter().filter(|v| !v.name.is_empty()) {
        let vpath = variant_path(entry, variant);
        let (pat, body) = match &variant.kind {
            VariantKind::Unit { .. } => (
                Pattern::new(PatternKind::Value {
                    value: PatternValue::Named(vpath.clone()),
                }),
                ExprNode::named(vpath),
            ),
            VariantKind::Tuple(fields) => {
                let binds: Vec<String> =
                    (0..fields.len()).map(|i| format!("__field{i}")).collect();
                (
                    Pattern::new(PatternKind::StructTuple {
                        path: vpath.clone(),
                        elems: binds
                            .iter()
                            .map(|n| Pattern::bind(n, ferric_ast::Hygiene::source()))
                            .collect(),
                    }),
                    ExprNode::call_path(
                        vpath,
                        binds
                            .iter()
                            .map(|n| clone_call(ExprNode::named(Path::ident(n))))
                            .collect(),
                    ),
                )
            }
            VariantKind::Struct(fields) => {
                let named: Vec<&str> = fields
                    .iter()
                    .filter(|f| !f.name.is_empty())
                    .map(|f| f.name.as_str())
                    .collect();
                (
                    Pattern::new(PatternKind::Struct {
                        path: vpath.clone(),
                        fields: named
                            .iter()
                            .map(|n| {
                                (
                                    n.to_string(),
                                    Pattern::bind(
                                        &format!("__{n}"),
                                        ferric_ast::Hygiene::source(),
                                    ),
                                )
                            })
                            .collect(),
                        exhaustive: true,
                    }),
                    ExprNode::new(ExprKind::StructLiteral {
                        path: vpath,
                        fields: named
                            .iter()
                            .map(|n| {
                                (
                                    n.to_string(),
                                    clone_call(ExprNode::named(Path::ident(&format!("__{n}")))),
                                )
                            })
                            .collect(),
                        base: None,
                    }),
                )
            }
        };
        arms.push(MatchArm {
            pats: vec![pat],
            guard: None,
            body,
        });
    }
    ExprNode::new(ExprKind::Match {
        value: Box::new(ExprNode::new(ExprKind::Deref {
            inner: Box::new(self_value()),
        })),
        arms,
    })
}

fn derive_partial_eq(span: &Span, entry: &ItemEntry) -> Result<Impl, ExpandError> {
    let Item::Struct(def) = &entry.item else {
        return Err(ExpandError::UnsupportedDerive {
            span: span.clone(),
            name: "PartialEq (on enums)".to_string(),
        });
    };

    let other = ExprNode::named(Path::ident("other"));
    let field_names: Vec<String> = match &def.kind {
        StructKind::Unit => Vec::new(),
        StructKind::Tuple(fields) => (0..fields.len()).map(|i| i.to_string()).collect(),
        StructKind::Named(fields) => fields
            .iter()
            .filter(|f| !f.name.is_empty())
            .map(|f| f.name.clone())
            .collect(),
    };
    let mut body: Option<ExprNode> = None;
    for name in field_names {
        let cmp = ExprNode::new(ExprKind::BinOp {
            op: BinOp::Eq,
            left: Box::new(field_of(self_value(), &name)),
            right: Box::new(field_of(other.clone(), &name)),
        });
        body = Some(match body {
            None => cmp,
            Some(prev) => ExprNode::new(ExprKind::BinOp {
                op: BinOp::BoolAnd,
                left: Box::new(prev),
                right: Box::new(cmp),
            }),
        });
    }
    let body = body.unwrap_or_else(|| ExprNode::bool_lit(true));

    let eq_fn = method_fn(
        vec![
            (
                Pattern::bind("self", ferric_ast::Hygiene::source()),
                TypeRef::borrow(self_ty_ref()),
            ),
            (
                Pattern::bind("other", ferric_ast::Hygiene::source()),
                TypeRef::borrow(self_ty_ref()),
            ),
        ],
        TypeRef::Primitive(ferric_ast::CoreType::Bool),
        body,
    );
    Ok(impl_block(
        entry,
        &["cmp", "PartialEq"],
        vec![ImplItemEntry {
            name: "eq".to_string(),
            is_pub: false,
            attrs: Vec::new(),
            item: ImplItem::Function(eq_fn),
        }],
    ))
}

fn default_call() -> ExprNode {
    ExprNode::call_path(
        Path::absolute_named("core", &["default", "Default", "default"]),
        Vec::new(),
    )
}

fn derive_default(span: &Span, entry: &ItemEntry) -> Result<Impl, ExpandError> {
    let Item::Struct(def) = &entry.item else {
        return Err(ExpandError::UnsupportedDerive {
            span: span.clone(),
            name: "Default (on enums)".to_string(),
        });
    };
    let body = match &def.kind {
        StructKind::Unit => ExprNode::named(Path::ident(&entry.name)),
        StructKind::Tuple(fields) => ExprNode::call_path(
            Path::ident(&entry.name),
            (0..fields.len()).map(|_| default_call()).collect(),
        ),
        StructKind::Named(fields) => ExprNode::new(ExprKind::StructLiteral {
            path: Path::ident(&entry.name),
            fields: fields
                .iter()
                .filter(|f| !f.name.is_empty())
                .map(|f| (f.name.clone(), default_call()))
                .collect(),
            base: None,
        }),
    };
    let default_fn = method_fn(Vec::new(), self_ty_ref(), body);
    Ok(impl_block(
        entry,
        &["default", "Default"],
        vec![ImplItemEntry {
            name: "default".to_string(),
            is_pub: false,
            attrs: Vec::new(),
            item: ImplItem::Function(default_fn),
        }],
    ))
}

// Unused here but keeps the derive surface aligned with const items in
// impls for future derives (e.g. discriminant tables)
#[allow(dead_code)]
fn const_item(ty: TypeRef, value: ExprNode) -> ImplItem {
    ImplItem::Const(ConstItem {
        ty,
        value: Some(value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferric_ast::{StructField, TypeParam};

    fn sample_struct() -> ItemEntry {
        let mut generics = GenericParams::default();
        generics.types.push(TypeParam::new("T"));
        ItemEntry::new(
            "Pair",
            Item::Struct(Struct {
                generics,
                kind: StructKind::Named(vec![
                    StructField {
                        is_pub: true,
                        name: "a".to_string(),
                        ty: TypeRef::path(Path::ident("T")),
                        attrs: Vec::new(),
                    },
                    StructField {
                        is_pub: true,
                        name: "b".to_string(),
                        ty: TypeRef::Primitive(ferric_ast::CoreType::U32),
                        attrs: Vec::new(),
                    },
                ]),
            }),
        )
    }

    #[test]
    fn test_derive_clone_shape() {
        let entry = sample_struct();
        let out = expand_derive(&Span::unknown(), "Clone", &entry).unwrap();
        let Item::Impl(imp) = &out.item else {
            panic!("expected impl");
        };
        assert!(imp.trait_path.is_some());
        assert_eq!(imp.items.len(), 1);
        assert_eq!(imp.items[0].name, "clone");
        // The impl carries a T: Clone bound
        assert_eq!(imp.generics.bounds.len(), 1);
    }

    #[test]
    fn test_derive_partial_eq_body_is_conjunction() {
        let entry = sample_struct();
        let out = expand_derive(&Span::unknown(), "PartialEq", &entry).unwrap();
        let Item::Impl(imp) = &out.item else {
            panic!("expected impl");
        };
        let ImplItem::Function(f) = &imp.items[0].item else {
            panic!("expected fn");
        };
        let body = f.body.as_ref().unwrap();
        assert!(matches!(
            body.kind,
            ExprKind::BinOp {
                op: BinOp::BoolAnd,
                ..
            }
        ));
    }

    #[test]
    fn test_unsupported_derive_is_fatal() {
        let entry = sample_struct();
        assert!(matches!(
            expand_derive(&Span::unknown(), "Serialize", &entry),
            Err(ExpandError::UnsupportedDerive { .. })
        ));
    }
}
