//! Name resolution (stages B and C of the middle-end).
//!
//! Three steps over one crate: bind `use` statements, build the
//! per-module name indices, then absolutise every path against them.
//! After this stage no path in the tree is Relative/Self/Super (outside
//! macro-input token trees) and every path carries its binding pair.

use ferric_diagnostics::{error_codes, Fatal, Span};
use thiserror::Error;

pub mod absolute;
pub mod index;
pub mod use_res;

pub use absolute::{resolve_absolute, Context, LookupMode};
pub use index::{build_definition_index, write_back, ModuleIndex, ResolveIndex};
pub use use_res::resolve_uses;

use ferric_ast::Crate;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("cannot find {mode} `{name}`")]
    UnresolvedName {
        span: Span,
        name: String,
        mode: &'static str,
        suggestion: Option<String>,
    },
    #[error("`{name}` is not a {expected} (found {found})")]
    NameKindMismatch {
        span: Span,
        name: String,
        expected: &'static str,
        found: String,
    },
    #[error("the name `{name}` is defined twice in {module}")]
    NameCollision {
        span: Span,
        name: String,
        module: String,
    },
    #[error("or-pattern alternatives bind different names: {detail}")]
    PatternArmMismatch { span: Span, detail: String },
    #[error("too many `super` levels for this module")]
    SuperOutOfRange { span: Span },
    #[error("wildcard import target must be a module, enum, or crate (found {found})")]
    BadGlobTarget { span: Span, found: String },
    #[error("cannot find lifetime `'{name}`")]
    UnresolvedLifetime { span: Span, name: String },
}

impl ResolveError {
    pub fn span(&self) -> &Span {
        match self {
            ResolveError::UnresolvedName { span, .. }
            | ResolveError::NameKindMismatch { span, .. }
            | ResolveError::NameCollision { span, .. }
            | ResolveError::PatternArmMismatch { span, .. }
            | ResolveError::SuperOutOfRange { span }
            | ResolveError::BadGlobTarget { span, .. }
            | ResolveError::UnresolvedLifetime { span, .. } => span,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ResolveError::UnresolvedName { .. } => error_codes::UNRESOLVED_NAME,
            ResolveError::NameKindMismatch { .. } => error_codes::NAME_KIND_MISMATCH,
            ResolveError::NameCollision { .. } => error_codes::NAME_COLLISION,
            ResolveError::PatternArmMismatch { .. } => error_codes::PATTERN_ARM_MISMATCH,
            ResolveError::SuperOutOfRange { .. } => error_codes::SUPER_OUT_OF_RANGE,
            ResolveError::BadGlobTarget { .. } => error_codes::BAD_GLOB_TARGET,
            ResolveError::UnresolvedLifetime { .. } => error_codes::UNRESOLVED_LIFETIME,
        }
    }
}

impl From<ResolveError> for Fatal {
    fn from(err: ResolveError) -> Fatal {
        let mut diagnostic = ferric_diagnostics::Diagnostic::error(
            err.code(),
            err.to_string(),
            err.span().clone(),
        );
        if let ResolveError::UnresolvedName {
            suggestion: Some(s),
            ..
        } = &err
        {
            diagnostic = diagnostic
                .with_help(format!("a name with a similar spelling exists: `{s}`"));
        }
        Fatal::from_diagnostic(diagnostic)
    }
}

/// Run the whole resolution stage. Returns the index side table for
/// downstream consumers that want it directly; the same data is written
/// back into each module's three index maps.
pub fn resolve_crate(krate: &mut Crate) -> Result<ResolveIndex, ResolveError> {
    log::info!("resolution: indexing definitions");
    let mut idx = build_definition_index(krate)?;
    log::info!("resolution: binding use statements");
    resolve_uses(krate, &mut idx)?;
    log::info!("resolution: absolutising paths");
    resolve_absolute(krate, &idx)?;
    write_back(krate, &idx);
    Ok(idx)
}
