//! Memory representation of concrete types.
//!
//! Layout is computed on demand against the selected target and cached.
//! Generic types have no layout; asking for one reports "not known yet"
//! and the caller decides whether that is fatal.

use crate::target::TargetSpec;
use dashmap::DashMap;
use ferric_ast::{find_attr, Crate, Item, StructKind, Substitution, TypeRef, VariantKind};
use ferric_ast::types::CoreType;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LayoutError {
    /// The type still mentions generic parameters; retry once concrete
    #[error("layout not known yet (generic type)")]
    Generic,
    #[error("unsized type in illegal position")]
    UnsizedField,
    #[error("integer overflow computing size")]
    Overflow,
    #[error("cannot compute layout: {0}")]
    Unexpected(String),
}

impl LayoutError {
    pub fn code(&self) -> &'static str {
        use ferric_diagnostics::error_codes as codes;
        match self {
            LayoutError::Generic => codes::GENERIC_LAYOUT,
            LayoutError::UnsizedField => codes::UNSIZED_FIELD,
            LayoutError::Overflow => codes::SIZE_OVERFLOW,
            LayoutError::Unexpected(_) => codes::GENERIC_LAYOUT,
        }
    }
}

/// One laid-out field: where it sits and what type it holds
#[derive(Debug, Clone, PartialEq)]
pub struct ReprField {
    pub offset: u64,
    pub ty: TypeRef,
}

/// How an enum's active variant is encoded
#[derive(Debug, Clone, PartialEq)]
pub enum VariantMode {
    /// Not an enum, or an enum that needs no discrimination
    None,
    /// An integer tag field holding one value per variant
    Values { tag_field: usize, values: Vec<u64> },
    /// Niche optimisation: the tag lives inside the data variant at
    /// `field_path`; an all-zero niche encodes `zero_variant`
    NonZero {
        field_path: Vec<usize>,
        zero_variant: usize,
    },
}

/// The computed representation of one concrete type
#[derive(Debug, Clone, PartialEq)]
pub struct TypeRepr {
    /// None = unsized (`str`, slices, trait objects, unsized tails)
    pub size: Option<u64>,
    pub align: u64,
    pub fields: Vec<ReprField>,
    pub variants: VariantMode,
}

/// How a struct's `#[repr(..)]` shapes its layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum StructReprKind {
    #[default]
    Rust,
    C,
    Packed,
    Transparent,
}

/// Discriminant representation of a C-like enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum EnumReprKind {
    #[default]
    Rust,
    C,
    Fixed(CoreType),
}

pub struct LayoutEngine<'c> {
    krate: &'c Crate,
    spec: &'c TargetSpec,
    /// Insert-only; entries are deterministic in value, so shared reads
    /// are always coherent
    cache: DashMap<TypeRef, Arc<TypeRepr>>,
}

impl<'c> LayoutEngine<'c> {
    pub fn new(krate: &'c Crate, spec: &'c TargetSpec) -> Self {
        LayoutEngine {
            krate,
            spec,
            cache: DashMap::new(),
        }
    }

    pub fn target(&self) -> &TargetSpec {
        self.spec
    }

    fn ptr_bytes(&self) -> u64 {
        self.spec.arch.pointer_bytes()
    }

    /// Size (None = unsized) and alignment of a primitive
    fn primitive_layout(&self, ct: CoreType) -> (Option<u64>, u64) {
        let al = &self.spec.arch.alignments;
        match ct {
            CoreType::Bool | CoreType::U8 | CoreType::I8 => (Some(1), 1),
            CoreType::U16 | CoreType::I16 => (Some(2), al.u16),
            CoreType::U32 | CoreType::I32 | CoreType::Char => (Some(4), al.u32),
            CoreType::U64 | CoreType::I64 => (Some(8), al.u64),
            CoreType::U128 | CoreType::I128 => {
                // An emulated i128 only needs u64 alignment
                let align = if self.spec.backend_c.emulated_i128 {
                    al.u64
                } else {
                    al.u128
                };
                (Some(16), align)
            }
            CoreType::Usize | CoreType::Isize => (Some(self.ptr_bytes()), al.ptr),
            CoreType::F32 => (Some(4), al.f32),
            CoreType::F64 => (Some(8), al.f64),
            CoreType::Str => (None, 1),
        }
    }

    /// How many pointer-words a `&T`/`*T` to this pointee occupies
    fn pointee_words(&self, inner: &TypeRef) -> Result<u64, LayoutError> {
        match inner {
            TypeRef::Slice { .. } | TypeRef::TraitObject { .. } => Ok(2),
            TypeRef::Primitive(CoreType::Str) => Ok(2),
            TypeRef::Generic { .. } | TypeRef::Infer { .. } => Err(LayoutError::Generic),
            _ => Ok(1),
        }
    }

    /// Size and alignment of any concrete type
    pub fn size_and_align(&self, ty: &TypeRef) -> Result<(Option<u64>, u64), LayoutError> {
        match ty {
            TypeRef::Primitive(ct) => Ok(self.primitive_layout(*ct)),
            TypeRef::Diverge => Ok((Some(0), 1)),
            TypeRef::Borrow { inner, .. } | TypeRef::Pointer { inner, .. } => {
                let words = self.pointee_words(inner)?;
                let size = self
                    .ptr_bytes()
                    .checked_mul(words)
                    .ok_or(LayoutError::Overflow)?;
                Ok((Some(size), self.spec.arch.alignments.ptr))
            }
            TypeRef::Function(_) => Ok((Some(self.ptr_bytes()), self.spec.arch.alignments.ptr)),
            TypeRef::Array { inner, size } => {
                let (elem_size, align) = self.size_and_align(inner)?;
                let elem_size = elem_size.ok_or(LayoutError::UnsizedField)?;
                let total = elem_size
                    .checked_mul(*size)
                    .ok_or(LayoutError::Overflow)?;
                Ok((Some(total), align))
            }
            TypeRef::Slice { inner } => {
                let (_, align) = self.size_and_align(inner)?;
                Ok((None, align))
            }
            TypeRef::TraitObject { .. } => Ok((None, 1)),
            TypeRef::Tuple(elems) if elems.is_empty() => Ok((Some(0), 1)),
            TypeRef::Tuple(_) | TypeRef::Path(_) => {
                let repr = self.type_repr(ty)?;
                Ok((repr.size, repr.align))
            }
            TypeRef::Generic { .. } | TypeRef::Infer { .. } => Err(LayoutError::Generic),
            TypeRef::ErasedType { .. } | TypeRef::Closure { .. } | TypeRef::Macro(_) => Err(
                LayoutError::Unexpected(format!("type unexpected at layout stage: {ty:?}")),
            ),
        }
    }

    /// Full representation of a struct/union/enum/tuple type
    pub fn type_repr(&self, ty: &TypeRef) -> Result<Arc<TypeRepr>, LayoutError> {
        if let Some(hit) = self.cache.get(ty) {
            return Ok(hit.clone());
        }
        if ty.contains_generic() || ty.contains_infer() {
            return Err(LayoutError::Generic);
        }

        let repr = Arc::new(self.compute_repr(ty)?);
        log::debug!(
            "layout: {:?} -> size={:?} align={}",
            ty,
            repr.size,
            repr.align
        );
        self.cache.insert(ty.clone(), repr.clone());
        Ok(repr)
    }

    fn compute_repr(&self, ty: &TypeRef) -> Result<TypeRepr, LayoutError> {
        match ty {
            TypeRef::Tuple(elems) => {
                self.layout_fields(elems.clone(), StructReprKind::Rust)
            }
            TypeRef::Path(path) => {
                let binding = &path.bindings.type_ns;
                let item_path = binding
                    .item_path()
                    .ok_or_else(|| {
                        LayoutError::Unexpected(format!("unbound path in layout: {path}"))
                    })?
                    .clone();
                let entry = self.krate.item_at(&item_path).ok_or_else(|| {
                    LayoutError::Unexpected(format!("dangling item path: {item_path}"))
                })?;
                let args: Vec<TypeRef> = path
                    .nodes()
                    .last()
                    .map(|n| n.args.clone())
                    .unwrap_or_default();
                let subst = Substitution::for_impl(None, args);

                match &entry.item {
                    Item::Struct(def) => {
                        let repr_kind = struct_repr_kind(&entry.attrs);
                        let field_types: Vec<TypeRef> = match &def.kind {
                            StructKind::Unit => Vec::new(),
                            StructKind::Tuple(fields) => fields
                                .iter()
                                .filter(|f| !f.ty.is_infer())
                                .map(|f| subst.apply(&f.ty))
                                .collect(),
                            StructKind::Named(fields) => fields
                                .iter()
                                .filter(|f| !f.name.is_empty())
                                .map(|f| subst.apply(&f.ty))
                                .collect(),
                        };
                        self.layout_fields(field_types, repr_kind)
                    }
                    Item::Union(def) => {
                        let field_types: Vec<TypeRef> = def
                            .fields
                            .iter()
                            .filter(|f| !f.name.is_empty())
                            .map(|f| subst.apply(&f.ty))
                            .collect();
                        self.layout_union(field_types)
                    }
                    Item::Enum(def) => {
                        let repr_kind = enum_repr_kind(&entry.attrs);
                        let all_unit = def
                            .variants
                            .iter()
                            .filter(|v| !v.name.is_empty())
                            .all(|v| matches!(v.kind, VariantKind::Unit { .. }));
                        if all_unit {
                            self.layout_value_enum(def, repr_kind)
                        } else {
                            self.layout_data_enum(def, &subst)
                        }
                    }
                    other => Err(LayoutError::Unexpected(format!(
                        "layout requested for {}",
                        other.describe()
                    ))),
                }
            }
            _ => Err(LayoutError::Unexpected(format!(
                "no aggregate layout for {ty:?}"
            ))),
        }
    }

    /// Declaration-order aggregate layout (structs and tuples)
    fn layout_fields(
        &self,
        field_types: Vec<TypeRef>,
        repr_kind: StructReprKind,
    ) -> Result<TypeRepr, LayoutError> {
        let packed = repr_kind == StructReprKind::Packed;
        let mut fields = Vec::with_capacity(field_types.len());
        let mut cur_ofs: u64 = 0;
        let mut max_align: u64 = 1;
        let mut unsized_tail = false;
        let count = field_types.len();

        for (i, fty) in field_types.into_iter().enumerate() {
            let (size, align) = self.size_and_align(&fty)?;
            if !packed && align > 0 {
                cur_ofs = round_up(cur_ofs, align)?;
            }
            max_align = max_align.max(align);
            fields.push(ReprField {
                offset: cur_ofs,
                ty: fty,
            });
            match size {
                Some(s) => {
                    cur_ofs = cur_ofs.checked_add(s).ok_or(LayoutError::Overflow)?;
                }
                None => {
                    // The last field may be unsized; it makes the whole
                    // aggregate unsized
                    if i + 1 != count {
                        return Err(LayoutError::UnsizedField);
                    }
                    unsized_tail = true;
                }
            }
        }

        let align = if packed { 1 } else { max_align };
        let size = if unsized_tail {
            None
        } else if packed {
            Some(cur_ofs)
        } else {
            Some(round_up(cur_ofs, align)?)
        };
        Ok(TypeRepr {
            size,
            align,
            fields,
            variants: VariantMode::None,
        })
    }

    /// All fields at offset zero
    fn layout_union(&self, field_types: Vec<TypeRef>) -> Result<TypeRepr, LayoutError> {
        let mut max_size: u64 = 0;
        let mut max_align: u64 = 1;
        let mut fields = Vec::with_capacity(field_types.len());
        for fty in field_types {
            let (size, align) = self.size_and_align(&fty)?;
            let size = size.ok_or(LayoutError::UnsizedField)?;
            max_size = max_size.max(size);
            max_align = max_align.max(align);
            fields.push(ReprField { offset: 0, ty: fty });
        }
        Ok(TypeRepr {
            size: Some(round_up(max_size, max_align)?),
            align: max_align,
            fields,
            variants: VariantMode::None,
        })
    }

    /// C-like enum: the repr attribute picks the discriminant type;
    /// default picks the smallest signed type that fits every value.
    fn layout_value_enum(
        &self,
        def: &ferric_ast::Enum,
        repr_kind: EnumReprKind,
    ) -> Result<TypeRepr, LayoutError> {
        let mut values: Vec<u64> = Vec::new();
        let mut next: i64 = 0;
        for variant in def.variants.iter().filter(|v| !v.name.is_empty()) {
            if let VariantKind::Unit { discriminant } = &variant.kind {
                if let Some(d) = discriminant {
                    next = *d;
                }
                values.push(next as u64);
                next = next.wrapping_add(1);
            }
        }

        if values.is_empty() {
            return Ok(TypeRepr {
                size: Some(0),
                align: 1,
                fields: Vec::new(),
                variants: VariantMode::None,
            });
        }

        let tag_type = match repr_kind {
            EnumReprKind::C => CoreType::U32,
            EnumReprKind::Fixed(CoreType::Usize) => match self.spec.arch.pointer_bits {
                16 => CoreType::U16,
                32 => CoreType::U32,
                _ => CoreType::U64,
            },
            EnumReprKind::Fixed(ct) => ct,
            EnumReprKind::Rust => {
                let mut width = 1;
                for v in &values {
                    let v = *v as i64;
                    width = width.max(if (-0x80..0x80).contains(&v) {
                        1
                    } else if (-0x8000..0x8000).contains(&v) {
                        2
                    } else if (-0x8000_0000..0x8000_0000).contains(&v) {
                        3
                    } else {
                        4
                    });
                }
                match width {
                    1 => CoreType::I8,
                    2 => CoreType::I16,
                    3 => CoreType::I32,
                    _ => CoreType::I64,
                }
            }
        };

        let (size, align) = self.primitive_layout(tag_type);
        Ok(TypeRepr {
            size,
            align,
            fields: vec![ReprField {
                offset: 0,
                ty: TypeRef::Primitive(tag_type),
            }],
            variants: VariantMode::Values {
                tag_field: 0,
                values,
            },
        })
    }

    /// Data-carrying enum: niche-optimised two-variant form when
    /// possible, otherwise common-prefix variants plus a trailing tag.
    fn layout_data_enum(
        &self,
        def: &ferric_ast::Enum,
        subst: &Substitution,
    ) -> Result<TypeRepr, LayoutError> {
        let mono_types: Vec<TypeRef> = def
            .variants
            .iter()
            .filter(|v| !v.name.is_empty())
            .map(|v| variant_payload_type(v, subst))
            .collect();

        // Niche opportunity: two variants, one unit, the other with a
        // statically never-zero slot
        if mono_types.len() == 2 {
            let unit_idx = mono_types.iter().position(|t| t.is_unit());
            if let Some(u) = unit_idx {
                let d = 1 - u;
                if let Some(sub_path) = self.nonzero_path(&mono_types[d])? {
                    let mut max_size: u64 = 0;
                    let mut max_align: u64 = 1;
                    let mut fields = Vec::new();
                    for t in &mono_types {
                        let (size, align) = self.size_and_align(t)?;
                        let size = size.ok_or(LayoutError::UnsizedField)?;
                        max_size = max_size.max(size);
                        max_align = max_align.max(align);
                        fields.push(ReprField {
                            offset: 0,
                            ty: t.clone(),
                        });
                    }
                    let mut field_path = vec![d];
                    field_path.extend(sub_path);
                    return Ok(TypeRepr {
                        size: Some(max_size),
                        align: max_align,
                        fields,
                        variants: VariantMode::NonZero {
                            field_path,
                            zero_variant: u,
                        },
                    });
                }
            }
        }

        // General data-carrying layout
        let mut max_size: u64 = 0;
        let mut max_align: u64 = 1;
        let mut fields = Vec::new();
        for t in &mono_types {
            let (size, align) = self.size_and_align(t)?;
            let size = size.ok_or(LayoutError::UnsizedField)?;
            max_size = max_size.max(size);
            max_align = max_align.max(align);
            fields.push(ReprField {
                offset: 0,
                ty: t.clone(),
            });
        }
        // The variant union is padded out to its alignment
        if max_size > 0 {
            max_size = round_up(max_size, max_align)?;
        }

        let mut tag_size: u64 = 0;
        let mut variants = VariantMode::None;
        if mono_types.len() > 1 {
            let tag_type = if mono_types.len() <= 255 {
                tag_size = 1;
                CoreType::U8
            } else {
                max_size = round_up(max_size, 2)?;
                tag_size = 2;
                CoreType::U16
            };
            let tag_field = fields.len();
            fields.push(ReprField {
                offset: max_size,
                ty: TypeRef::Primitive(tag_type),
            });
            variants = VariantMode::Values {
                tag_field,
                values: (0..mono_types.len() as u64).collect(),
            };
        }

        max_align = max_align.max(tag_size);
        let total = round_up(
            max_size.checked_add(tag_size).ok_or(LayoutError::Overflow)?,
            max_align,
        )?;
        Ok(TypeRepr {
            size: Some(total),
            align: max_align,
            fields,
            variants,
        })
    }

    /// Locate a statically never-zero slot inside a type, as a field
    /// path. Borrows and function pointers qualify directly; structs are
    /// searched recursively; the `non_zero` lang-item struct qualifies
    /// via its first field.
    fn nonzero_path(&self, ty: &TypeRef) -> Result<Option<Vec<usize>>, LayoutError> {
        match ty {
            TypeRef::Borrow { .. } | TypeRef::Function(_) => Ok(Some(Vec::new())),
            TypeRef::Tuple(elems) => {
                for (i, elem) in elems.iter().enumerate() {
                    if let Some(mut sub) = self.nonzero_path(elem)? {
                        sub.insert(0, i);
                        return Ok(Some(sub));
                    }
                }
                Ok(None)
            }
            TypeRef::Path(path) => {
                let Some(item_path) = path.bindings.type_ns.item_path() else {
                    return Ok(None);
                };
                if !matches!(
                    path.bindings.type_ns,
                    ferric_ast::TypeBinding::Struct(_)
                ) {
                    return Ok(None);
                }
                let repr = match self.type_repr(ty) {
                    Ok(r) => r,
                    Err(LayoutError::Generic) => return Ok(None),
                    Err(e) => return Err(e),
                };
                for (i, field) in repr.fields.iter().enumerate() {
                    if let Some(mut sub) = self.nonzero_path(&field.ty)? {
                        sub.insert(0, i);
                        return Ok(Some(sub));
                    }
                }
                if self.krate.lang_item("non_zero") == Some(item_path) {
                    return Ok(Some(vec![0]));
                }
                Ok(None)
            }
            _ => Ok(None),
        }
    }
}

/// The payload type of an enum variant, monomorphised: unit variants are
/// the unit type, tuple/struct variants become tuples of their fields.
fn variant_payload_type(variant: &ferric_ast::EnumVariant, subst: &Substitution) -> TypeRef {
    match &variant.kind {
        VariantKind::Unit { .. } => TypeRef::unit(),
        VariantKind::Tuple(fields) => TypeRef::Tuple(
            fields
                .iter()
                .filter(|f| !f.ty.is_infer())
                .map(|f| subst.apply(&f.ty))
                .collect(),
        ),
        VariantKind::Struct(fields) => TypeRef::Tuple(
            fields
                .iter()
                .filter(|f| !f.name.is_empty())
                .map(|f| subst.apply(&f.ty))
                .collect(),
        ),
    }
}

fn struct_repr_kind(attrs: &[ferric_ast::Attribute]) -> StructReprKind {
    let Some(attr) = find_attr(attrs, "repr") else {
        return StructReprKind::Rust;
    };
    for item in attr.meta.items() {
        match item.name.as_str() {
            "packed" => return StructReprKind::Packed,
            "C" | "simd" => return StructReprKind::C,
            "transparent" => return StructReprKind::Transparent,
            "rust" => return StructReprKind::Rust,
            _ => {}
        }
    }
    StructReprKind::Rust
}

fn enum_repr_kind(attrs: &[ferric_ast::Attribute]) -> EnumReprKind {
    let Some(attr) = find_attr(attrs, "repr") else {
        return EnumReprKind::Rust;
    };
    for item in attr.meta.items() {
        match item.name.as_str() {
            "C" => return EnumReprKind::C,
            "rust" => return EnumReprKind::Rust,
            name => {
                if let Some(ct) = CoreType::from_name(name) {
                    if ct.is_integer() {
                        return EnumReprKind::Fixed(ct);
                    }
                }
            }
        }
    }
    EnumReprKind::Rust
}

fn round_up(value: u64, align: u64) -> Result<u64, LayoutError> {
    if align <= 1 {
        return Ok(value);
    }
    let rem = value % align;
    if rem == 0 {
        Ok(value)
    } else {
        value
            .checked_add(align - rem)
            .ok_or(LayoutError::Overflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::TargetSpec;
    use ferric_ast::{Crate, CoreType, TypeRef};

    fn engine_fixture() -> (Crate, TargetSpec) {
        (Crate::new(), TargetSpec::builtin("x86_64-linux-gnu").unwrap())
    }

    #[test]
    fn test_primitive_layout() {
        let (krate, spec) = engine_fixture();
        let engine = LayoutEngine::new(&krate, &spec);
        assert_eq!(
            engine.size_and_align(&TypeRef::Primitive(CoreType::Bool)).unwrap(),
            (Some(1), 1)
        );
        assert_eq!(
            engine.size_and_align(&TypeRef::Primitive(CoreType::U64)).unwrap(),
            (Some(8), 8)
        );
        // str is unsized, align 1
        assert_eq!(
            engine.size_and_align(&TypeRef::Primitive(CoreType::Str)).unwrap(),
            (None, 1)
        );
    }

    #[test]
    fn test_emulated_i128_alignment() {
        let (krate, mut spec) = engine_fixture();
        spec.backend_c.emulated_i128 = true;
        let engine = LayoutEngine::new(&krate, &spec);
        assert_eq!(
            engine.size_and_align(&TypeRef::Primitive(CoreType::I128)).unwrap(),
            (Some(16), 8)
        );
    }

    #[test]
    fn test_fat_and_thin_pointers() {
        let (krate, spec) = engine_fixture();
        let engine = LayoutEngine::new(&krate, &spec);
        let thin = TypeRef::borrow(TypeRef::Primitive(CoreType::U32));
        assert_eq!(engine.size_and_align(&thin).unwrap(), (Some(8), 8));
        let fat = TypeRef::borrow(TypeRef::Slice {
            inner: Box::new(TypeRef::Primitive(CoreType::U8)),
        });
        assert_eq!(engine.size_and_align(&fat).unwrap(), (Some(16), 8));
    }

    #[test]
    fn test_tuple_layout_with_padding() {
        let (krate, spec) = engine_fixture();
        let engine = LayoutEngine::new(&krate, &spec);
        // (u8, u32, u8) -> 0, 4, 8; size 12, align 4
        let ty = TypeRef::Tuple(vec![
            TypeRef::Primitive(CoreType::U8),
            TypeRef::Primitive(CoreType::U32),
            TypeRef::Primitive(CoreType::U8),
        ]);
        let repr = engine.type_repr(&ty).unwrap();
        assert_eq!(repr.size, Some(12));
        assert_eq!(repr.align, 4);
        let offsets: Vec<u64> = repr.fields.iter().map(|f| f.offset).collect();
        assert_eq!(offsets, vec![0, 4, 8]);
    }

    #[test]
    fn test_unit_tuple_is_zero_sized() {
        let (krate, spec) = engine_fixture();
        let engine = LayoutEngine::new(&krate, &spec);
        assert_eq!(
            engine.size_and_align(&TypeRef::unit()).unwrap(),
            (Some(0), 1)
        );
    }

    #[test]
    fn test_array_overflow_is_fatal() {
        let (krate, spec) = engine_fixture();
        let engine = LayoutEngine::new(&krate, &spec);
        let ty = TypeRef::Array {
            inner: Box::new(TypeRef::Primitive(CoreType::U64)),
            size: u64::MAX / 2,
        };
        assert!(matches!(
            engine.size_and_align(&ty),
            Err(LayoutError::Overflow)
        ));
    }

    #[test]
    fn test_generic_type_is_not_fatal() {
        let (krate, spec) = engine_fixture();
        let engine = LayoutEngine::new(&krate, &spec);
        let ty = TypeRef::Generic {
            name: "T".to_string(),
            slot: 0,
        };
        assert!(matches!(
            engine.size_and_align(&ty),
            Err(LayoutError::Generic)
        ));
    }

    #[test]
    fn test_repr_is_cached() {
        let (krate, spec) = engine_fixture();
        let engine = LayoutEngine::new(&krate, &spec);
        let ty = TypeRef::Tuple(vec![TypeRef::Primitive(CoreType::U8)]);
        let a = engine.type_repr(&ty).unwrap();
        let b = engine.type_repr(&ty).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
