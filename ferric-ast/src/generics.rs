//! Generic parameter lists and bounds.

use crate::path::Path;
use crate::types::{Lifetime, TypeRef};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeParam {
    pub name: String,
    pub default: Option<TypeRef>,
}

impl TypeParam {
    pub fn new(name: &str) -> Self {
        TypeParam {
            name: name.to_string(),
            default: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LifetimeParam {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConstParam {
    pub name: String,
    pub ty: TypeRef,
}

/// A single where-clause predicate (or inline bound, normalised here by
/// the parser)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GenericBound {
    /// `T: Trait` (with optional `for<'a>` binders)
    TraitBound {
        hrtb: Vec<String>,
        ty: TypeRef,
        trait_path: Path,
    },
    /// `<T as Trait>::Assoc = U`, produced from `Trait<Assoc = U>` sugar
    TypeEquality { ty: TypeRef, equals: TypeRef },
    /// `T: 'a`
    TypeLifetime { ty: TypeRef, lifetime: Lifetime },
    /// `'a: 'b`
    LifetimeBound {
        lifetime: Lifetime,
        outlives: Lifetime,
    },
}

/// Generic parameters attached to an item, impl, or higher-ranked bound
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GenericParams {
    pub lifetimes: Vec<LifetimeParam>,
    pub types: Vec<TypeParam>,
    pub consts: Vec<ConstParam>,
    pub bounds: Vec<GenericBound>,
}

impl GenericParams {
    pub fn is_empty(&self) -> bool {
        self.lifetimes.is_empty() && self.types.is_empty() && self.consts.is_empty()
    }

    pub fn type_param_index(&self, name: &str) -> Option<usize> {
        self.types.iter().position(|p| p.name == name)
    }

    pub fn const_param_index(&self, name: &str) -> Option<usize> {
        self.consts.iter().position(|p| p.name == name)
    }

    pub fn lifetime_index(&self, name: &str) -> Option<usize> {
        self.lifetimes.iter().position(|p| p.name == name)
    }

    /// Append an in-band lifetime (2018 edition), returning its index
    pub fn add_lifetime(&mut self, name: &str) -> usize {
        self.lifetimes.push(LifetimeParam {
            name: name.to_string(),
        });
        self.lifetimes.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_lookup() {
        let mut params = GenericParams::default();
        params.types.push(TypeParam::new("T"));
        params.types.push(TypeParam::new("U"));
        assert_eq!(params.type_param_index("U"), Some(1));
        assert_eq!(params.type_param_index("V"), None);
        assert!(!params.is_empty());
    }

    #[test]
    fn test_in_band_lifetime() {
        let mut params = GenericParams::default();
        assert_eq!(params.add_lifetime("a"), 0);
        assert_eq!(params.add_lifetime("b"), 1);
        assert_eq!(params.lifetime_index("b"), Some(1));
    }
}
