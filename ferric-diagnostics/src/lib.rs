// Diagnostic machinery for the Ferric middle-end.
// Rust-style error[E0xxx] rendering with spans, colors, and suggestions.

use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Source code location carried on every AST/HIR node.
///
/// The middle-end treats spans as opaque: they are attached by the parser
/// and only read back when a diagnostic is rendered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub length: usize,
}

impl Span {
    pub fn new(file: impl Into<String>, line: usize, column: usize, length: usize) -> Self {
        Self {
            file: file.into(),
            line,
            column,
            length,
        }
    }

    /// Span for nodes synthesised by the compiler itself (desugaring,
    /// derives, macro-generated tokens without position data).
    pub fn synthetic() -> Self {
        Self {
            file: "<generated>".to_string(),
            line: 0,
            column: 0,
            length: 0,
        }
    }

    pub fn unknown() -> Self {
        Self {
            file: "<unknown>".to_string(),
            line: 0,
            column: 0,
            length: 0,
        }
    }
}

impl Default for Span {
    fn default() -> Self {
        Self::unknown()
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Diagnostic severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorLevel {
    Error,
    Warning,
    Note,
    Help,
}

impl fmt::Display for ErrorLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorLevel::Error => write!(f, "{}", "error".red().bold()),
            ErrorLevel::Warning => write!(f, "{}", "warning".yellow().bold()),
            ErrorLevel::Note => write!(f, "{}", "note".cyan().bold()),
            ErrorLevel::Help => write!(f, "{}", "help".green().bold()),
        }
    }
}

/// Structured diagnostic message
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub level: ErrorLevel,
    pub code: String,
    pub message: String,
    pub span: Span,
    pub notes: Vec<String>,
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn new(level: ErrorLevel, code: &str, message: String, span: Span) -> Self {
        Self {
            level,
            code: code.to_string(),
            message,
            span,
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn error(code: &str, message: String, span: Span) -> Self {
        Self::new(ErrorLevel::Error, code, message, span)
    }

    pub fn warning(code: &str, message: String, span: Span) -> Self {
        Self::new(ErrorLevel::Warning, code, message, span)
    }

    pub fn with_note(mut self, note: String) -> Self {
        self.notes.push(note);
        self
    }

    pub fn with_help(mut self, help: String) -> Self {
        self.help = Some(help);
        self
    }

    /// Attach a "did you mean" note when a close candidate exists.
    pub fn with_name_suggestion(self, wanted: &str, candidates: &[String]) -> Self {
        match suggest_name(wanted, candidates) {
            Some(hit) => self.with_help(format!("a name with a similar spelling exists: `{hit}`")),
            None => self,
        }
    }

    fn render(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!(
            "{}[{}]: {}\n",
            self.level,
            self.code,
            self.message.bold()
        ));
        output.push_str(&format!(
            " {} {}:{}:{}\n",
            "-->".cyan().bold(),
            self.span.file,
            self.span.line,
            self.span.column
        ));

        for note in &self.notes {
            output.push_str(&format!(" {} {}\n", "=".cyan().bold(), note.cyan()));
        }
        if let Some(help) = &self.help {
            output.push_str(&format!(" {} {}\n", "help:".green().bold(), help));
        }

        output
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

/// A fatal diagnostic: terminates the current compilation pass.
///
/// Every stage entry point returns `Result<_, Fatal>`; the driver decides
/// the process exit code. Warnings never take this path.
#[derive(Debug, Clone, Error)]
#[error("{diagnostic}")]
pub struct Fatal {
    pub diagnostic: Diagnostic,
}

impl Fatal {
    pub fn new(span: Span, code: &str, message: String) -> Self {
        Self {
            diagnostic: Diagnostic::error(code, message, span),
        }
    }

    pub fn from_diagnostic(diagnostic: Diagnostic) -> Self {
        Self { diagnostic }
    }
}

/// Diagnostic accumulation across the pipeline.
///
/// Warnings are batched here and rendered at the end of the run; errors are
/// raised as [`Fatal`] values instead and terminate the owning pass.
#[derive(Debug, Default)]
pub struct DiagnosticEngine {
    diagnostics: Vec<Diagnostic>,
    error_count: usize,
    warning_count: usize,
}

impl DiagnosticEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, diagnostic: Diagnostic) {
        match diagnostic.level {
            ErrorLevel::Error => self.error_count += 1,
            ErrorLevel::Warning => self.warning_count += 1,
            _ => {}
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn emit_warning(&mut self, code: &str, message: String, span: Span) {
        self.emit(Diagnostic::warning(code, message, span));
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn warning_count(&self) -> usize {
        self.warning_count
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Print all accumulated diagnostics to stderr
    pub fn print_all(&self) {
        for diag in &self.diagnostics {
            eprintln!("{diag}");
        }
    }

    pub fn print_summary(&self) {
        if self.error_count > 0 {
            eprintln!(
                "{}: {} error{} emitted",
                "error".red().bold(),
                self.error_count,
                if self.error_count == 1 { "" } else { "s" }
            );
        }
        if self.warning_count > 0 {
            eprintln!(
                "{}: {} warning{} emitted",
                "warning".yellow().bold(),
                self.warning_count,
                if self.warning_count == 1 { "" } else { "s" }
            );
        }
    }
}

/// Find the closest candidate to a misspelled name, if any is close enough.
///
/// The cutoff scales with name length so short names don't produce noise.
pub fn suggest_name(wanted: &str, candidates: &[String]) -> Option<String> {
    let max_distance = (wanted.len() / 3).max(1);
    candidates
        .iter()
        .map(|c| (strsim::levenshtein(wanted, c), c))
        .filter(|(d, _)| *d <= max_distance && *d > 0)
        .min_by_key(|(d, _)| *d)
        .map(|(_, c)| c.clone())
}

/// Stable error codes for every fatal the middle-end can raise
pub mod error_codes {
    // Expansion (E0100-E0199)
    pub const UNKNOWN_CFG_FUNCTION: &str = "E0100";
    pub const UNKNOWN_CFG_KEY: &str = "W0100"; // warning, evaluates false
    pub const CFG_ARITY: &str = "E0101";
    pub const UNRESOLVED_MACRO: &str = "E0102";
    pub const MACRO_INPUT: &str = "E0103"; // syntactic-not-macro
    pub const UNSUPPORTED_DERIVE: &str = "E0104";
    pub const BAD_ATTRIBUTE: &str = "E0105";
    pub const COMPILE_ERROR: &str = "E0106"; // compile_error! invocation
    pub const BAD_FORMAT_STRING: &str = "E0107";

    // Resolution (E0200-E0299)
    pub const UNRESOLVED_NAME: &str = "E0200";
    pub const NAME_KIND_MISMATCH: &str = "E0201";
    pub const NAME_COLLISION: &str = "E0202";
    pub const PATTERN_ARM_MISMATCH: &str = "E0203";
    pub const SUPER_OUT_OF_RANGE: &str = "E0204";
    pub const BAD_GLOB_TARGET: &str = "E0205";
    pub const UNRESOLVED_LIFETIME: &str = "E0206";

    // Type inference (E0300-E0399)
    pub const TYPE_MISMATCH: &str = "E0300";
    pub const CANNOT_INFER: &str = "E0301";
    pub const AMBIGUOUS_METHOD: &str = "E0302";
    pub const NO_METHOD: &str = "E0303";
    pub const PROJECTION_DEPTH: &str = "E0304";
    pub const BAD_OPERATOR: &str = "E0305";
    pub const ARGUMENT_COUNT: &str = "E0306";
    pub const INFER_LOOP: &str = "E0307"; // iteration bound exceeded
    pub const UNEXPECTED_NODE: &str = "E0308"; // desugared form survived to inference
    pub const NO_FIELD: &str = "E0309";

    // Layout (E0400-E0499)
    pub const UNSIZED_FIELD: &str = "E0400";
    pub const SIZE_OVERFLOW: &str = "E0401";
    pub const GENERIC_LAYOUT: &str = "E0402";

    // Target configuration (E0500-E0599)
    pub const UNKNOWN_TARGET: &str = "E0500";
    pub const BAD_TARGET_FILE: &str = "E0501";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_display() {
        let span = Span::new("lib.rs", 12, 4, 3);
        assert_eq!(format!("{span}"), "lib.rs:12:4");
    }

    #[test]
    fn test_engine_counts() {
        let mut engine = DiagnosticEngine::new();
        engine.emit_warning(
            error_codes::UNKNOWN_CFG_KEY,
            "unknown cfg key `target_bits`".to_string(),
            Span::unknown(),
        );
        engine.emit(Diagnostic::error(
            error_codes::UNRESOLVED_NAME,
            "cannot find type `Foo`".to_string(),
            Span::unknown(),
        ));

        assert_eq!(engine.warning_count(), 1);
        assert_eq!(engine.error_count(), 1);
        assert!(engine.has_errors());
    }

    #[test]
    fn test_suggest_name() {
        let candidates = vec![
            "into_iter".to_string(),
            "next".to_string(),
            "len".to_string(),
        ];
        assert_eq!(
            suggest_name("into_itre", &candidates),
            Some("into_iter".to_string())
        );
        assert_eq!(suggest_name("completely_different", &candidates), None);
        // An exact match is not a suggestion
        assert_eq!(suggest_name("len", &candidates), None);
    }

    #[test]
    fn test_fatal_carries_diagnostic() {
        let fatal = Fatal::new(
            Span::new("main.rs", 1, 1, 1),
            error_codes::TYPE_MISMATCH,
            "expected `u32`, found `bool`".to_string(),
        );
        assert_eq!(fatal.diagnostic.code, error_codes::TYPE_MISMATCH);
        assert_eq!(fatal.diagnostic.level, ErrorLevel::Error);
    }
}
