//! Built-in function-like macros.
//!
//! These are the handlers a freestanding compiler must supply itself:
//! cfg tests, token pasting, source-location probes, environment reads,
//! and the format_args entry point.

use crate::registry::{MacroContext, ProcMacro, Registry};
use crate::reparse::{Reparse, TokenReparser};
use crate::ExpandError;
use ferric_ast::{stream_to_string, Token, TokenStream, TokenTree};
use ferric_diagnostics::Span;

fn input_err(span: &Span, detail: impl Into<String>) -> ExpandError {
    ExpandError::MacroInput {
        span: span.clone(),
        detail: detail.into(),
    }
}

fn str_token(span: &Span, value: String) -> TokenStream {
    vec![TokenTree::Token(span.clone(), Token::StrLit(value))]
}

/// Split a token stream on top-level commas
fn split_args(tts: &[TokenTree]) -> Vec<Vec<TokenTree>> {
    let mut out = Vec::new();
    let mut current = Vec::new();
    for tt in tts {
        if tt.as_token().map(|t| t.is_punct(",")).unwrap_or(false) {
            out.push(std::mem::take(&mut current));
        } else {
            current.push(tt.clone());
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn expect_str_arg(span: &Span, arg: &[TokenTree]) -> Result<String, ExpandError> {
    match arg {
        [TokenTree::Token(_, Token::StrLit(s))] => Ok(s.clone()),
        _ => Err(input_err(span, "expected a string literal")),
    }
}

/// `cfg!( predicate )` - evaluates to `true` or `false`
struct CfgExpander;

impl ProcMacro for CfgExpander {
    fn expand(
        &self,
        ctx: &mut MacroContext<'_>,
        span: &Span,
        ident: Option<&str>,
        input: &[TokenTree],
    ) -> Result<TokenStream, ExpandError> {
        if ident.is_some() {
            return Err(input_err(span, "cfg! doesn't take an identifier"));
        }
        let meta = TokenReparser::new().parse_meta(span, input)?;
        let value = ctx.cfg.check(span, &meta, ctx.diag)?;
        log::debug!("cfg!({meta}) = {value}");
        Ok(vec![TokenTree::Token(
            span.clone(),
            Token::ident(if value { "true" } else { "false" }),
        )])
    }
}

/// `concat!( lit, lit, ... )` - one string literal
struct ConcatExpander;

impl ProcMacro for ConcatExpander {
    fn expand(
        &self,
        _ctx: &mut MacroContext<'_>,
        span: &Span,
        _ident: Option<&str>,
        input: &[TokenTree],
    ) -> Result<TokenStream, ExpandError> {
        let mut out = String::new();
        for arg in split_args(input) {
            match arg.as_slice() {
                [TokenTree::Token(_, tok)] => match tok {
                    Token::StrLit(s) => out.push_str(s),
                    Token::IntLit { value, .. } => out.push_str(&value.to_string()),
                    Token::FloatLit { value, .. } => out.push_str(&value.to_string()),
                    Token::CharLit(c) => out.push(*c),
                    Token::Ident { name, .. } if name == "true" || name == "false" => {
                        out.push_str(name)
                    }
                    other => {
                        return Err(input_err(
                            span,
                            format!("concat! argument must be a literal, got {other:?}"),
                        ))
                    }
                },
                _ => return Err(input_err(span, "concat! argument must be a literal")),
            }
        }
        Ok(str_token(span, out))
    }
}

/// `stringify!( tokens )` - the tokens rendered as a string
struct StringifyExpander;

impl ProcMacro for StringifyExpander {
    fn expand(
        &self,
        _ctx: &mut MacroContext<'_>,
        span: &Span,
        _ident: Option<&str>,
        input: &[TokenTree],
    ) -> Result<TokenStream, ExpandError> {
        Ok(str_token(span, stream_to_string(input)))
    }
}

/// `line!` / `column!` / `file!` - source-position probes
enum PositionKind {
    Line,
    Column,
    File,
}

struct PositionExpander(PositionKind);

impl ProcMacro for PositionExpander {
    fn expand(
        &self,
        _ctx: &mut MacroContext<'_>,
        span: &Span,
        _ident: Option<&str>,
        input: &[TokenTree],
    ) -> Result<TokenStream, ExpandError> {
        if !input.is_empty() {
            return Err(input_err(span, "this macro takes no arguments"));
        }
        Ok(match self.0 {
            PositionKind::Line => vec![TokenTree::Token(
                span.clone(),
                Token::IntLit {
                    value: span.line as u128,
                    suffix: Some("u32".to_string()),
                },
            )],
            PositionKind::Column => vec![TokenTree::Token(
                span.clone(),
                Token::IntLit {
                    value: span.column as u128,
                    suffix: Some("u32".to_string()),
                },
            )],
            PositionKind::File => str_token(span, span.file.clone()),
        })
    }
}

/// `module_path!` - the expansion-site module as a string
struct ModulePathExpander;

impl ProcMacro for ModulePathExpander {
    fn expand(
        &self,
        ctx: &mut MacroContext<'_>,
        span: &Span,
        _ident: Option<&str>,
        _input: &[TokenTree],
    ) -> Result<TokenStream, ExpandError> {
        let mut rendered = "crate".to_string();
        for node in &ctx.module_path.nodes {
            rendered.push_str("::");
            rendered.push_str(node);
        }
        Ok(str_token(span, rendered))
    }
}

/// `env!("NAME")` - fatal when unset; `option_env!("NAME")` - Some/None
struct EnvExpander {
    optional: bool,
}

impl ProcMacro for EnvExpander {
    fn expand(
        &self,
        _ctx: &mut MacroContext<'_>,
        span: &Span,
        _ident: Option<&str>,
        input: &[TokenTree],
    ) -> Result<TokenStream, ExpandError> {
        let args = split_args(input);
        let name = match args.first() {
            Some(arg) => expect_str_arg(span, arg)?,
            None => return Err(input_err(span, "expected an environment variable name")),
        };
        match std::env::var(&name) {
            Ok(value) => {
                if self.optional {
                    let mut out = vec![TokenTree::Token(span.clone(), Token::ident("Some"))];
                    out.push(TokenTree::Delimited {
                        span: span.clone(),
                        delim: ferric_ast::Delim::Paren,
                        tts: str_token(span, value),
                    });
                    Ok(out)
                } else {
                    Ok(str_token(span, value))
                }
            }
            Err(_) if self.optional => {
                Ok(vec![TokenTree::Token(span.clone(), Token::ident("None"))])
            }
            Err(_) => Err(ExpandError::CompileError {
                span: span.clone(),
                message: format!("environment variable `{name}` not defined"),
            }),
        }
    }
}

/// `include_str!("path")` - file contents, relative to the invoking file
struct IncludeStrExpander;

impl ProcMacro for IncludeStrExpander {
    fn expand(
        &self,
        _ctx: &mut MacroContext<'_>,
        span: &Span,
        _ident: Option<&str>,
        input: &[TokenTree],
    ) -> Result<TokenStream, ExpandError> {
        let args = split_args(input);
        let rel = match args.first() {
            Some(arg) => expect_str_arg(span, arg)?,
            None => return Err(input_err(span, "expected a file path")),
        };
        let base = std::path::Path::new(&span.file)
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_default();
        let full = base.join(&rel);
        match std::fs::read_to_string(&full) {
            Ok(text) => Ok(str_token(span, text)),
            Err(err) => Err(input_err(
                span,
                format!("cannot read `{}`: {err}", full.display()),
            )),
        }
    }
}

/// `compile_error!("message")` - late-stage fatal, so cfg'd-out code can
/// still strip it first
struct CompileErrorExpander;

impl ProcMacro for CompileErrorExpander {
    fn expand_early(&self) -> bool {
        false
    }

    fn expand(
        &self,
        _ctx: &mut MacroContext<'_>,
        span: &Span,
        _ident: Option<&str>,
        input: &[TokenTree],
    ) -> Result<TokenStream, ExpandError> {
        let args = split_args(input);
        let message = match args.first() {
            Some(arg) => expect_str_arg(span, arg)?,
            None => "explicit compile error".to_string(),
        };
        Err(ExpandError::CompileError {
            span: span.clone(),
            message,
        })
    }
}

/// `format_args!("fmt", args...)` - validates the format string and
/// lowers to the formatting entry point with the literal pieces and the
/// argument expressions. Runtime formatting lives in the library.
struct FormatArgsExpander;

impl FormatArgsExpander {
    /// Split a format string into literal pieces around `{}`-style
    /// placeholders, validating brace pairing. Returns the pieces and the
    /// number of placeholders.
    fn split_format(span: &Span, fmt: &str) -> Result<(Vec<String>, usize), ExpandError> {
        let mut pieces = Vec::new();
        let mut current = String::new();
        let mut placeholders = 0;
        let mut chars = fmt.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '{' => {
                    if chars.peek() == Some(&'{') {
                        chars.next();
                        current.push('{');
                        continue;
                    }
                    // Consume up to the matching close brace
                    let mut inner = String::new();
                    let mut closed = false;
                    for c2 in chars.by_ref() {
                        if c2 == '}' {
                            closed = true;
                            break;
                        }
                        inner.push(c2);
                    }
                    if !closed {
                        return Err(ExpandError::BadFormatString {
                            span: span.clone(),
                            detail: "unterminated `{` placeholder".to_string(),
                        });
                    }
                    pieces.push(std::mem::take(&mut current));
                    placeholders += 1;
                }
                '}' => {
                    if chars.peek() == Some(&'}') {
                        chars.next();
                        current.push('}');
                    } else {
                        return Err(ExpandError::BadFormatString {
                            span: span.clone(),
                            detail: "unmatched `}`".to_string(),
                        });
                    }
                }
                other => current.push(other),
            }
        }
        pieces.push(current);
        Ok((pieces, placeholders))
    }
}

impl ProcMacro for FormatArgsExpander {
    fn expand(
        &self,
        _ctx: &mut MacroContext<'_>,
        span: &Span,
        _ident: Option<&str>,
        input: &[TokenTree],
    ) -> Result<TokenStream, ExpandError> {
        let args = split_args(input);
        let Some((fmt_arg, rest)) = args.split_first() else {
            return Err(input_err(span, "format_args! needs a format string"));
        };
        let fmt = expect_str_arg(span, fmt_arg)?;
        let (pieces, placeholders) = Self::split_format(span, &fmt)?;
        if placeholders != rest.len() {
            return Err(ExpandError::BadFormatString {
                span: span.clone(),
                detail: format!(
                    "{placeholders} placeholder(s) but {} argument(s)",
                    rest.len()
                ),
            });
        }

        // core::fmt::Arguments::new_v1([pieces...], [&arg0, &arg1, ...])
        let mut out: TokenStream = Vec::new();
        for seg in ["core", "fmt", "Arguments", "new_v1"] {
            if !out.is_empty() {
                out.push(TokenTree::Token(span.clone(), Token::punct("::")));
            }
            out.push(TokenTree::Token(span.clone(), Token::ident(seg)));
        }
        let mut piece_tokens: TokenStream = Vec::new();
        for (i, piece) in pieces.iter().enumerate() {
            if i > 0 {
                piece_tokens.push(TokenTree::Token(span.clone(), Token::punct(",")));
            }
            piece_tokens.push(TokenTree::Token(span.clone(), Token::StrLit(piece.clone())));
        }
        let mut arg_tokens: TokenStream = Vec::new();
        for (i, arg) in rest.iter().enumerate() {
            if i > 0 {
                arg_tokens.push(TokenTree::Token(span.clone(), Token::punct(",")));
            }
            arg_tokens.push(TokenTree::Token(span.clone(), Token::punct("&")));
            arg_tokens.extend(arg.iter().cloned());
        }
        let mut call: TokenStream = Vec::new();
        call.push(TokenTree::Delimited {
            span: span.clone(),
            delim: ferric_ast::Delim::Bracket,
            tts: piece_tokens,
        });
        call.push(TokenTree::Token(span.clone(), Token::punct(",")));
        call.push(TokenTree::Delimited {
            span: span.clone(),
            delim: ferric_ast::Delim::Bracket,
            tts: arg_tokens,
        });
        out.push(TokenTree::Delimited {
            span: span.clone(),
            delim: ferric_ast::Delim::Paren,
            tts: call,
        });
        Ok(out)
    }
}

/// Register every built-in macro handler
pub fn register(registry: &mut Registry) {
    registry.register_macro("cfg", Box::new(CfgExpander));
    registry.register_macro("concat", Box::new(ConcatExpander));
    registry.register_macro("stringify", Box::new(StringifyExpander));
    registry.register_macro("line", Box::new(PositionExpander(PositionKind::Line)));
    registry.register_macro("column", Box::new(PositionExpander(PositionKind::Column)));
    registry.register_macro("file", Box::new(PositionExpander(PositionKind::File)));
    registry.register_macro("module_path", Box::new(ModulePathExpander));
    registry.register_macro("env", Box::new(EnvExpander { optional: false }));
    registry.register_macro("option_env", Box::new(EnvExpander { optional: true }));
    registry.register_macro("include_str", Box::new(IncludeStrExpander));
    registry.register_macro("compile_error", Box::new(CompileErrorExpander));
    registry.register_macro("format_args", Box::new(FormatArgsExpander));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::CfgState;
    use ferric_ast::ItemPath;
    use ferric_diagnostics::DiagnosticEngine;

    fn run(
        name: &str,
        cfg: &CfgState,
        input: Vec<TokenTree>,
    ) -> Result<TokenStream, ExpandError> {
        let registry = Registry::with_builtins();
        let mut diag = DiagnosticEngine::new();
        let mut ctx = MacroContext {
            cfg,
            diag: &mut diag,
            module_path: ItemPath::local_root().child("m"),
        };
        let handler = registry.find_macro(name).expect("registered");
        handler.expand(&mut ctx, &Span::unknown(), None, &input)
    }

    #[test]
    fn test_cfg_macro() {
        let mut cfg = CfgState::new();
        cfg.set_flag("foo");
        let out = run("cfg", &cfg, vec![TokenTree::token(Token::ident("foo"))]).unwrap();
        assert!(out[0].as_token().map(|t| t.is_ident("true")).unwrap_or(false));
        let out = run("cfg", &cfg, vec![TokenTree::token(Token::ident("bar"))]).unwrap();
        assert!(out[0].as_token().map(|t| t.is_ident("false")).unwrap_or(false));
    }

    #[test]
    fn test_concat() {
        let cfg = CfgState::new();
        let input = vec![
            TokenTree::token(Token::StrLit("a".to_string())),
            TokenTree::token(Token::punct(",")),
            TokenTree::token(Token::IntLit {
                value: 42,
                suffix: None,
            }),
        ];
        let out = run("concat", &cfg, input).unwrap();
        assert!(matches!(
            out[0].as_token(),
            Some(Token::StrLit(s)) if s == "a42"
        ));
    }

    #[test]
    fn test_stringify() {
        let cfg = CfgState::new();
        let input = vec![
            TokenTree::token(Token::ident("a")),
            TokenTree::token(Token::punct("+")),
            TokenTree::token(Token::ident("b")),
        ];
        let out = run("stringify", &cfg, input).unwrap();
        assert!(matches!(
            out[0].as_token(),
            Some(Token::StrLit(s)) if s == "a + b"
        ));
    }

    #[test]
    fn test_module_path() {
        let cfg = CfgState::new();
        let out = run("module_path", &cfg, vec![]).unwrap();
        assert!(matches!(
            out[0].as_token(),
            Some(Token::StrLit(s)) if s == "crate::m"
        ));
    }

    #[test]
    fn test_compile_error_is_fatal() {
        let cfg = CfgState::new();
        let input = vec![TokenTree::token(Token::StrLit("boom".to_string()))];
        assert!(matches!(
            run("compile_error", &cfg, input),
            Err(ExpandError::CompileError { message, .. }) if message == "boom"
        ));
    }

    #[test]
    fn test_format_args_arity_check() {
        let cfg = CfgState::new();
        let input = vec![TokenTree::token(Token::StrLit("{} {}".to_string()))];
        assert!(matches!(
            run("format_args", &cfg, input),
            Err(ExpandError::BadFormatString { .. })
        ));
    }

    #[test]
    fn test_format_args_escapes() {
        let cfg = CfgState::new();
        let input = vec![TokenTree::token(Token::StrLit("{{}}".to_string()))];
        // No placeholders: escaped braces only
        assert!(run("format_args", &cfg, input).is_ok());
    }
}
