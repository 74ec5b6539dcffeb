//! Target-aware type layout (repr) computation.
//!
//! The layout engine answers size/alignment/field-offset queries for
//! fully-resolved types against a configured target descriptor, including
//! niche-optimised enum encodings. Results are cached process-wide.

pub mod repr;
pub mod target;

pub use repr::{LayoutEngine, LayoutError, ReprField, TypeRepr, VariantMode};
pub use target::{
    builtin_cfg, ArchAlignments, ArchAtomics, BackendOptsC, CfgEntry, CodegenMode, TargetArch,
    TargetError, TargetSpec,
};
