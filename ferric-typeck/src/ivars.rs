//! Inference variables.
//!
//! An append-only table of type holes. Unifying two ivars links one to
//! the other (union-find without path compression, so iteration order
//! stays deterministic); binding an ivar fills its root's slot. Classes
//! restrict unsuffixed literal holes to integer or float primitives.

use crate::TypeError;
use ferric_ast::{InferClass, TypeRef};
use ferric_diagnostics::Span;

#[derive(Debug, Clone, Default)]
pub struct IVar {
    /// Link to another ivar this one was unified into
    pub alias: Option<u32>,
    /// The concrete type, once known (only meaningful on a root)
    pub ty: Option<TypeRef>,
    pub class: InferClass,
}

#[derive(Debug, Default)]
pub struct IVarTable {
    ivars: Vec<IVar>,
    changed: bool,
}

impl IVarTable {
    pub fn new() -> Self {
        IVarTable::default()
    }

    pub fn len(&self) -> usize {
        self.ivars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ivars.is_empty()
    }

    pub fn new_ivar(&mut self, class: InferClass) -> u32 {
        self.ivars.push(IVar {
            alias: None,
            ty: None,
            class,
        });
        (self.ivars.len() - 1) as u32
    }

    pub fn mark_change(&mut self) {
        self.changed = true;
    }

    pub fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }

    /// Follow alias links to the representative
    pub fn root(&self, mut idx: u32) -> u32 {
        loop {
            match self.ivars.get(idx as usize).and_then(|iv| iv.alias) {
                Some(next) => idx = next,
                None => return idx,
            }
        }
    }

    pub fn class_of(&self, idx: u32) -> InferClass {
        let root = self.root(idx);
        self.ivars
            .get(root as usize)
            .map(|iv| iv.class)
            .unwrap_or(InferClass::None)
    }

    /// The bound type of an ivar's root, if any
    pub fn get(&self, idx: u32) -> Option<&TypeRef> {
        let root = self.root(idx);
        self.ivars.get(root as usize).and_then(|iv| iv.ty.as_ref())
    }

    /// Resolve the representative type of `ty`: an allocated, bound
    /// `Infer` becomes its binding (repeatedly, so chains collapse);
    /// anything else is returned as written.
    pub fn resolve_shallow(&self, ty: &TypeRef) -> TypeRef {
        let mut current = ty.clone();
        let mut fuel = self.ivars.len() + 1;
        while fuel > 0 {
            match &current {
                TypeRef::Infer {
                    index: Some(idx), ..
                } => match self.get(*idx) {
                    Some(bound) => current = bound.clone(),
                    None => {
                        // Normalise to the root so callers compare equals
                        let root = self.root(*idx);
                        return TypeRef::Infer {
                            index: Some(root),
                            class: self.class_of(root),
                        };
                    }
                },
                _ => return current,
            }
            fuel -= 1;
        }
        current
    }

    /// Fully resolve: every bound ivar anywhere inside the type is
    /// replaced by its binding. Bindings may themselves contain bound
    /// ivars, so substitution repeats until nothing changes.
    pub fn resolve_deep(&self, ty: &TypeRef) -> TypeRef {
        let mut out = self.resolve_shallow(ty);
        let mut fuel = self.ivars.len() + 1;
        loop {
            let mut changed = false;
            out.visit_mut(&mut |t| {
                if let TypeRef::Infer { index: Some(_), .. } = t {
                    let resolved = self.resolve_shallow(t);
                    if resolved != *t {
                        changed = true;
                        *t = resolved;
                    }
                }
            });
            if !changed || fuel == 0 {
                break;
            }
            fuel -= 1;
        }
        out
    }

    fn classes_compatible(a: InferClass, b: InferClass) -> bool {
        a == InferClass::None || b == InferClass::None || a == b
    }

    fn merged_class(a: InferClass, b: InferClass) -> InferClass {
        if a == InferClass::None {
            b
        } else {
            a
        }
    }

    /// Union two unbound ivars (callers bind via [`IVarTable::bind`]
    /// when either side has a type)
    pub fn unify_ivars(&mut self, span: &Span, a: u32, b: u32) -> Result<(), TypeError> {
        let ra = self.root(a);
        let rb = self.root(b);
        if ra == rb {
            return Ok(());
        }
        let ca = self.class_of(ra);
        let cb = self.class_of(rb);
        if !Self::classes_compatible(ca, cb) {
            return Err(TypeError::Mismatch {
                span: span.clone(),
                left: format!("{{{ca:?} literal}}"),
                right: format!("{{{cb:?} literal}}"),
            });
        }
        let class = Self::merged_class(ca, cb);
        if let Some(iv) = self.ivars.get_mut(rb as usize) {
            iv.alias = Some(ra);
        }
        if let Some(iv) = self.ivars.get_mut(ra as usize) {
            iv.class = class;
        }
        self.mark_change();
        Ok(())
    }

    /// Whether a concrete type satisfies an ivar class
    fn type_fits_class(ty: &TypeRef, class: InferClass) -> bool {
        match class {
            InferClass::None => true,
            InferClass::Integer => {
                matches!(ty, TypeRef::Primitive(ct) if ct.is_integer())
                    || matches!(ty, TypeRef::Diverge)
            }
            InferClass::Float => {
                matches!(ty, TypeRef::Primitive(ct) if ct.is_float())
                    || matches!(ty, TypeRef::Diverge)
            }
        }
    }

    /// Bind an ivar's root to a concrete type
    pub fn bind(&mut self, span: &Span, idx: u32, ty: TypeRef) -> Result<(), TypeError> {
        let root = self.root(idx);
        let class = self.class_of(root);
        if !Self::type_fits_class(&ty, class) {
            return Err(TypeError::Mismatch {
                span: span.clone(),
                left: format!("{{{class:?} literal}}"),
                right: format!("{ty:?}"),
            });
        }
        if let Some(iv) = self.ivars.get_mut(root as usize) {
            iv.ty = Some(ty);
        }
        self.mark_change();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferric_ast::CoreType;

    #[test]
    fn test_union_and_bind() {
        let mut table = IVarTable::new();
        let a = table.new_ivar(InferClass::None);
        let b = table.new_ivar(InferClass::Integer);
        table.unify_ivars(&Span::unknown(), a, b).unwrap();
        assert_eq!(table.root(b), a);
        // The unknown class adopted Integer through the union
        assert_eq!(table.class_of(a), InferClass::Integer);

        table
            .bind(&Span::unknown(), b, TypeRef::Primitive(CoreType::U32))
            .unwrap();
        assert_eq!(table.get(a), Some(&TypeRef::Primitive(CoreType::U32)));
    }

    #[test]
    fn test_class_conflict_is_fatal() {
        let mut table = IVarTable::new();
        let a = table.new_ivar(InferClass::Integer);
        let b = table.new_ivar(InferClass::Float);
        assert!(table.unify_ivars(&Span::unknown(), a, b).is_err());
    }

    #[test]
    fn test_bind_respects_class() {
        let mut table = IVarTable::new();
        let a = table.new_ivar(InferClass::Integer);
        assert!(table
            .bind(&Span::unknown(), a, TypeRef::Primitive(CoreType::F64))
            .is_err());
        assert!(table
            .bind(&Span::unknown(), a, TypeRef::Primitive(CoreType::I64))
            .is_ok());
    }

    #[test]
    fn test_resolve_shallow_follows_chains() {
        let mut table = IVarTable::new();
        let a = table.new_ivar(InferClass::None);
        let b = table.new_ivar(InferClass::None);
        table.unify_ivars(&Span::unknown(), a, b).unwrap();
        table
            .bind(&Span::unknown(), a, TypeRef::Primitive(CoreType::Bool))
            .unwrap();
        let hole = TypeRef::Infer {
            index: Some(b),
            class: InferClass::None,
        };
        assert_eq!(
            table.resolve_shallow(&hole),
            TypeRef::Primitive(CoreType::Bool)
        );
    }

    #[test]
    fn test_change_flag() {
        let mut table = IVarTable::new();
        assert!(!table.take_changed());
        let a = table.new_ivar(InferClass::None);
        table
            .bind(&Span::unknown(), a, TypeRef::unit())
            .unwrap();
        assert!(table.take_changed());
        assert!(!table.take_changed());
    }
}
