// Enum representation scenarios: the two-variant niche optimisation,
// the general tagged layout, and C-like discriminant sizing.

use ferric_ast::{
    Bindings, CoreType, Crate, Enum, EnumVariant, Item, ItemEntry, ItemPath, Path, PathClass,
    PathNode, TupleField, TypeBinding, TypeRef, VariantKind,
};
use ferric_layout::{LayoutEngine, TargetSpec, VariantMode};

fn enum_type(name: &str) -> TypeRef {
    let ip = ItemPath::local_root().child(name);
    TypeRef::path(Path {
        class: PathClass::Absolute {
            krate: String::new(),
            nodes: vec![PathNode::new(name)],
        },
        bindings: Bindings {
            type_ns: TypeBinding::Enum(ip),
            value_ns: Default::default(),
        },
    })
}

fn unit_variant(name: &str) -> EnumVariant {
    EnumVariant {
        name: name.to_string(),
        attrs: vec![],
        kind: VariantKind::Unit { discriminant: None },
    }
}

fn tuple_variant(name: &str, tys: Vec<TypeRef>) -> EnumVariant {
    EnumVariant {
        name: name.to_string(),
        attrs: vec![],
        kind: VariantKind::Tuple(
            tys.into_iter()
                .map(|ty| TupleField {
                    is_pub: false,
                    ty,
                    attrs: vec![],
                })
                .collect(),
        ),
    }
}

fn crate_with_enum(name: &str, variants: Vec<EnumVariant>) -> Crate {
    let mut krate = Crate::new();
    krate.root.items.push(ItemEntry::public(
        name,
        Item::Enum(Enum {
            generics: Default::default(),
            variants,
        }),
    ));
    krate
}

#[test]
fn two_variant_reference_enum_gets_the_niche() {
    // enum E { A, B(&u32) } - one pointer wide, tag in the reference
    let krate = crate_with_enum(
        "E",
        vec![
            unit_variant("A"),
            tuple_variant("B", vec![TypeRef::borrow(TypeRef::Primitive(CoreType::U32))]),
        ],
    );
    let spec = TargetSpec::builtin("x86_64-linux-gnu").unwrap();
    let engine = LayoutEngine::new(&krate, &spec);
    let repr = engine.type_repr(&enum_type("E")).unwrap();

    assert_eq!(repr.size, Some(8));
    assert_eq!(repr.align, 8);
    match &repr.variants {
        VariantMode::NonZero {
            field_path,
            zero_variant,
        } => {
            // Variant B (index 1), its first field
            assert_eq!(field_path, &vec![1, 0]);
            assert_eq!(*zero_variant, 0);
        }
        other => panic!("expected NonZero mode, got {other:?}"),
    }
}

#[test]
fn general_data_enum_gets_a_trailing_tag() {
    // enum E { A(u32), B(u8), C }  - no niche, u8 tag after the data
    let krate = crate_with_enum(
        "E",
        vec![
            tuple_variant("A", vec![TypeRef::Primitive(CoreType::U32)]),
            tuple_variant("B", vec![TypeRef::Primitive(CoreType::U8)]),
            unit_variant("C"),
        ],
    );
    let spec = TargetSpec::builtin("x86_64-linux-gnu").unwrap();
    let engine = LayoutEngine::new(&krate, &spec);
    let repr = engine.type_repr(&enum_type("E")).unwrap();

    match &repr.variants {
        VariantMode::Values { tag_field, values } => {
            assert_eq!(values, &vec![0, 1, 2]);
            // The tag sits after the variant data, at the padded offset
            let tag = &repr.fields[*tag_field];
            assert_eq!(tag.offset, 4);
            assert_eq!(tag.ty, TypeRef::Primitive(CoreType::U8));
        }
        other => panic!("expected Values mode, got {other:?}"),
    }
    // 4 data bytes + 1 tag byte, rounded to align 4
    assert_eq!(repr.size, Some(8));
    assert_eq!(repr.align, 4);

    // Invariant: variant payloads + tag fit inside the total
    let max_payload = 4u64;
    assert!(max_payload + 1 <= repr.size.unwrap());
}

#[test]
fn c_like_enum_picks_smallest_signed_repr() {
    let krate = crate_with_enum(
        "Small",
        vec![unit_variant("A"), unit_variant("B"), unit_variant("C")],
    );
    let spec = TargetSpec::builtin("x86_64-linux-gnu").unwrap();
    let engine = LayoutEngine::new(&krate, &spec);
    let repr = engine.type_repr(&enum_type("Small")).unwrap();
    assert_eq!(repr.size, Some(1));
    assert_eq!(repr.fields[0].ty, TypeRef::Primitive(CoreType::I8));
    match &repr.variants {
        VariantMode::Values { values, .. } => assert_eq!(values, &vec![0, 1, 2]),
        other => panic!("expected Values mode, got {other:?}"),
    }
}

#[test]
fn c_like_enum_with_wide_discriminants() {
    // An explicit discriminant beyond i16 forces i32
    let mut variants = vec![unit_variant("A")];
    variants.push(EnumVariant {
        name: "B".to_string(),
        attrs: vec![],
        kind: VariantKind::Unit {
            discriminant: Some(100_000),
        },
    });
    let krate = crate_with_enum("Wide", variants);
    let spec = TargetSpec::builtin("x86_64-linux-gnu").unwrap();
    let engine = LayoutEngine::new(&krate, &spec);
    let repr = engine.type_repr(&enum_type("Wide")).unwrap();
    assert_eq!(repr.fields[0].ty, TypeRef::Primitive(CoreType::I32));
    match &repr.variants {
        VariantMode::Values { values, .. } => {
            assert_eq!(values, &vec![0, 100_000]);
        }
        other => panic!("expected Values mode, got {other:?}"),
    }
}

#[test]
fn empty_enum_is_zero_sized() {
    let krate = crate_with_enum("Never", vec![]);
    let spec = TargetSpec::builtin("x86_64-linux-gnu").unwrap();
    let engine = LayoutEngine::new(&krate, &spec);
    let repr = engine.type_repr(&enum_type("Never")).unwrap();
    assert_eq!(repr.size, Some(0));
    assert_eq!(repr.align, 1);
    assert!(matches!(repr.variants, VariantMode::None));
}

#[test]
fn niche_detection_descends_through_structs() {
    use ferric_ast::{Struct, StructField, StructKind};
    // struct Holder { value: &u32 }  enum E { None_, Some_(Holder) }
    let mut krate = Crate::new();
    krate.root.items.push(ItemEntry::public(
        "Holder",
        Item::Struct(Struct {
            generics: Default::default(),
            kind: StructKind::Named(vec![StructField {
                is_pub: true,
                name: "value".to_string(),
                ty: TypeRef::borrow(TypeRef::Primitive(CoreType::U32)),
                attrs: vec![],
            }]),
        }),
    ));
    let holder_ip = ItemPath::local_root().child("Holder");
    let holder_ty = TypeRef::path(Path {
        class: PathClass::Absolute {
            krate: String::new(),
            nodes: vec![PathNode::new("Holder")],
        },
        bindings: Bindings {
            type_ns: TypeBinding::Struct(holder_ip),
            value_ns: Default::default(),
        },
    });
    krate.root.items.push(ItemEntry::public(
        "E",
        Item::Enum(Enum {
            generics: Default::default(),
            variants: vec![
                unit_variant("None_"),
                tuple_variant("Some_", vec![holder_ty]),
            ],
        }),
    ));
    let spec = TargetSpec::builtin("x86_64-linux-gnu").unwrap();
    let engine = LayoutEngine::new(&krate, &spec);
    let repr = engine.type_repr(&enum_type("E")).unwrap();
    assert_eq!(repr.size, Some(8));
    match &repr.variants {
        VariantMode::NonZero { field_path, .. } => {
            // variant 1 -> its tuple field 0 -> Holder's field 0
            assert_eq!(field_path, &vec![1, 0, 0]);
        }
        other => panic!("expected NonZero mode, got {other:?}"),
    }
}
