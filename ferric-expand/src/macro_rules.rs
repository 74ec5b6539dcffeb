//! The `macro_rules!` engine: pattern compilation, token matching, and
//! transcription.
//!
//! Rules are tried in definition order; the first whose pattern matches
//! the invocation's token stream is transcribed. Fragment captures
//! (`$e:expr` and friends) are collected as balanced token runs and
//! re-parsed by the caller according to the invocation's syntactic
//! position.

use crate::ExpandError;
use ferric_ast::{Delim, Hygiene, ItemPath, MacroRulesDef, Token, TokenStream, TokenTree};
use ferric_diagnostics::Span;
use std::collections::HashMap;

/// Fragment specifier of a `$name:frag` capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragSpec {
    Tt,
    Ident,
    Literal,
    Lifetime,
    Expr,
    Ty,
    Pat,
    Path,
    Block,
    Stmt,
    Meta,
}

impl FragSpec {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "tt" => FragSpec::Tt,
            "ident" => FragSpec::Ident,
            "literal" => FragSpec::Literal,
            "lifetime" => FragSpec::Lifetime,
            "expr" => FragSpec::Expr,
            "ty" => FragSpec::Ty,
            "pat" => FragSpec::Pat,
            "path" => FragSpec::Path,
            "block" => FragSpec::Block,
            "stmt" => FragSpec::Stmt,
            "meta" => FragSpec::Meta,
            _ => return None,
        })
    }

    /// Whether the capture is a single known token tree, rather than a
    /// balanced run delimited by the following pattern token
    fn is_single_tree(&self) -> bool {
        matches!(
            self,
            FragSpec::Tt | FragSpec::Ident | FragSpec::Literal | FragSpec::Lifetime | FragSpec::Block
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RepKind {
    /// `*`
    ZeroOrMore,
    /// `+`
    OneOrMore,
    /// `?`
    AtMostOne,
}

#[derive(Debug, Clone)]
enum PatEnt {
    Token(Token),
    Subtree { delim: Delim, entries: Vec<PatEnt> },
    Var { name: String, frag: FragSpec },
    Rep {
        entries: Vec<PatEnt>,
        sep: Option<Token>,
        kind: RepKind,
    },
}

#[derive(Debug, Clone)]
enum TransEnt {
    Token(Span, Token),
    Subtree {
        span: Span,
        delim: Delim,
        entries: Vec<TransEnt>,
    },
    Var(String),
    DollarCrate,
    Rep {
        entries: Vec<TransEnt>,
        sep: Option<Token>,
    },
}

#[derive(Debug, Clone)]
enum Capture {
    Tokens(Vec<TokenTree>),
    Seq(Vec<Capture>),
}

type Captures = HashMap<String, Capture>;

fn macro_input_err(span: &Span, detail: impl Into<String>) -> ExpandError {
    ExpandError::MacroInput {
        span: span.clone(),
        detail: detail.into(),
    }
}

/// Compile a rule's pattern token stream into match entries
fn compile_pattern(span: &Span, tts: &[TokenTree]) -> Result<Vec<PatEnt>, ExpandError> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < tts.len() {
        match &tts[i] {
            TokenTree::Token(_, tok) if tok.is_punct("$") => {
                i += 1;
                match tts.get(i) {
                    Some(TokenTree::Token(_, Token::Ident { name, .. })) => {
                        // $name:frag
                        let var_name = name.clone();
                        i += 1;
                        match tts.get(i) {
                            Some(TokenTree::Token(_, t)) if t.is_punct(":") => {
                                i += 1;
                            }
                            _ => {
                                return Err(macro_input_err(
                                    span,
                                    format!("`${var_name}` needs a fragment specifier"),
                                ))
                            }
                        }
                        let frag = match tts.get(i) {
                            Some(TokenTree::Token(_, Token::Ident { name: frag, .. })) => {
                                FragSpec::from_name(frag).ok_or_else(|| {
                                    macro_input_err(
                                        span,
                                        format!("unknown fragment specifier `{frag}`"),
                                    )
                                })?
                            }
                            _ => {
                                return Err(macro_input_err(span, "missing fragment specifier"))
                            }
                        };
                        i += 1;
                        out.push(PatEnt::Var {
                            name: var_name,
                            frag,
                        });
                    }
                    Some(TokenTree::Delimited {
                        delim: Delim::Paren,
                        tts: inner,
                        ..
                    }) => {
                        // $( ... ) sep? rep
                        let entries = compile_pattern(span, inner)?;
                        i += 1;
                        let (sep, kind, consumed) = parse_rep_suffix(span, &tts[i..])?;
                        i += consumed;
                        out.push(PatEnt::Rep { entries, sep, kind });
                    }
                    _ => {
                        return Err(macro_input_err(span, "`$` must introduce a capture"));
                    }
                }
            }
            TokenTree::Token(_, tok) => {
                out.push(PatEnt::Token(tok.clone()));
                i += 1;
            }
            TokenTree::Delimited { delim, tts: inner, .. } => {
                out.push(PatEnt::Subtree {
                    delim: *delim,
                    entries: compile_pattern(span, inner)?,
                });
                i += 1;
            }
        }
    }
    Ok(out)
}

/// Parse the `sep? (*|+|?)` suffix after a repetition group. Returns the
/// separator, the kind, and the number of tokens consumed.
fn parse_rep_suffix(
    span: &Span,
    rest: &[TokenTree],
) -> Result<(Option<Token>, RepKind, usize), ExpandError> {
    let kind_of = |tok: &Token| match tok {
        Token::Punct(p) if p == "*" => Some(RepKind::ZeroOrMore),
        Token::Punct(p) if p == "+" => Some(RepKind::OneOrMore),
        Token::Punct(p) if p == "?" => Some(RepKind::AtMostOne),
        _ => None,
    };
    match rest.first() {
        Some(TokenTree::Token(_, tok)) => {
            if let Some(kind) = kind_of(tok) {
                return Ok((None, kind, 1));
            }
            // Single-token separator, then the repetition marker
            match rest.get(1) {
                Some(TokenTree::Token(_, marker)) => match kind_of(marker) {
                    Some(kind) => Ok((Some(tok.clone()), kind, 2)),
                    None => Err(macro_input_err(span, "expected `*`, `+` or `?`")),
                },
                _ => Err(macro_input_err(span, "expected repetition marker")),
            }
        }
        _ => Err(macro_input_err(span, "expected repetition marker")),
    }
}

/// Compile a rule's body token stream into transcription entries
fn compile_body(span: &Span, tts: &[TokenTree]) -> Result<Vec<TransEnt>, ExpandError> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < tts.len() {
        match &tts[i] {
            TokenTree::Token(_, tok) if tok.is_punct("$") => {
                i += 1;
                match tts.get(i) {
                    Some(TokenTree::Token(_, Token::Ident { name, .. })) => {
                        if name == "crate" {
                            out.push(TransEnt::DollarCrate);
                        } else {
                            out.push(TransEnt::Var(name.clone()));
                        }
                        i += 1;
                    }
                    Some(TokenTree::Delimited {
                        delim: Delim::Paren,
                        tts: inner,
                        ..
                    }) => {
                        let entries = compile_body(span, inner)?;
                        i += 1;
                        let (sep, _kind, consumed) = parse_rep_suffix(span, &tts[i..])?;
                        i += consumed;
                        out.push(TransEnt::Rep { entries, sep });
                    }
                    _ => {
                        return Err(macro_input_err(span, "`$` must introduce a substitution"));
                    }
                }
            }
            TokenTree::Token(sp, tok) => {
                out.push(TransEnt::Token(sp.clone(), tok.clone()));
                i += 1;
            }
            TokenTree::Delimited { span: sp, delim, tts: inner } => {
                out.push(TransEnt::Subtree {
                    span: sp.clone(),
                    delim: *delim,
                    entries: compile_body(sp, inner)?,
                });
                i += 1;
            }
        }
    }
    Ok(out)
}

/// Whether a token tree matches a pattern token (hygiene is ignored:
/// matching is by surface form)
fn token_matches(tree: &TokenTree, pat: &Token) -> bool {
    match (tree.as_token(), pat) {
        (Some(Token::Ident { name: a, .. }), Token::Ident { name: b, .. }) => a == b,
        (Some(t), p) => t == p,
        (None, _) => false,
    }
}

fn is_literal_token(tok: &Token) -> bool {
    matches!(
        tok,
        Token::IntLit { .. }
            | Token::FloatLit { .. }
            | Token::StrLit(_)
            | Token::ByteStrLit(_)
            | Token::CharLit(_)
    ) || tok.is_ident("true")
        || tok.is_ident("false")
}

/// Names of all captures appearing in a pattern entry list
fn pattern_vars(entries: &[PatEnt], out: &mut Vec<String>) {
    for ent in entries {
        match ent {
            PatEnt::Var { name, .. } => out.push(name.clone()),
            PatEnt::Subtree { entries, .. } | PatEnt::Rep { entries, .. } => {
                pattern_vars(entries, out)
            }
            PatEnt::Token(_) => {}
        }
    }
}

/// Attempt to match `entries` against a prefix of `input`. On success
/// returns the number of trees consumed; captures are added to `caps`.
fn match_seq(entries: &[PatEnt], input: &[TokenTree], caps: &mut Captures) -> Option<usize> {
    let mut pos = 0;
    for (idx, ent) in entries.iter().enumerate() {
        match ent {
            PatEnt::Token(tok) => {
                if pos < input.len() && token_matches(&input[pos], tok) {
                    pos += 1;
                } else {
                    return None;
                }
            }
            PatEnt::Subtree { delim, entries } => match input.get(pos) {
                Some(TokenTree::Delimited {
                    delim: d,
                    tts: inner,
                    ..
                }) if d == delim => {
                    let consumed = match_seq(entries, inner, caps)?;
                    if consumed != inner.len() {
                        return None;
                    }
                    pos += 1;
                }
                _ => return None,
            },
            PatEnt::Var { name, frag } => {
                let trees = capture_fragment(*frag, &input[pos..], entries.get(idx + 1))?;
                if trees.is_empty() && !matches!(frag, FragSpec::Tt) {
                    return None;
                }
                pos += trees.len();
                caps.insert(name.clone(), Capture::Tokens(trees));
            }
            PatEnt::Rep { entries, sep, kind } => {
                let mut iterations: Vec<Captures> = Vec::new();
                loop {
                    if matches!(kind, RepKind::AtMostOne) && iterations.len() == 1 {
                        break;
                    }
                    let offset = if iterations.is_empty() {
                        0
                    } else {
                        match sep {
                            Some(s) => {
                                if pos < input.len() && token_matches(&input[pos], s) {
                                    1
                                } else {
                                    break;
                                }
                            }
                            None => 0,
                        }
                    };
                    let mut iter_caps = Captures::new();
                    match match_seq(entries, &input[pos + offset..], &mut iter_caps) {
                        // Zero-consumption iterations would never end
                        Some(consumed) if consumed > 0 => {
                            pos += offset + consumed;
                            iterations.push(iter_caps);
                        }
                        _ => break,
                    }
                }
                if matches!(kind, RepKind::OneOrMore) && iterations.is_empty() {
                    return None;
                }
                // Group per-variable captures across iterations
                let mut vars = Vec::new();
                pattern_vars(entries, &mut vars);
                for var in vars {
                    let seq = iterations
                        .iter()
                        .filter_map(|it| it.get(&var).cloned())
                        .collect();
                    caps.insert(var, Capture::Seq(seq));
                }
            }
        }
    }
    Some(pos)
}

/// Capture a fragment starting at `input[0]`. Single-tree fragments take
/// exactly one tree of the right shape; balanced-run fragments consume
/// until the following pattern token appears at this nesting level.
fn capture_fragment(
    frag: FragSpec,
    input: &[TokenTree],
    follow: Option<&PatEnt>,
) -> Option<Vec<TokenTree>> {
    if frag.is_single_tree() {
        let first = input.first()?;
        let ok = match frag {
            FragSpec::Tt => true,
            FragSpec::Ident => matches!(first.as_token(), Some(Token::Ident { .. })),
            FragSpec::Literal => first.as_token().map(is_literal_token).unwrap_or(false),
            FragSpec::Lifetime => matches!(first.as_token(), Some(Token::Lifetime(_))),
            FragSpec::Block => {
                matches!(first, TokenTree::Delimited { delim: Delim::Brace, .. })
            }
            _ => false,
        };
        return if ok { Some(vec![first.clone()]) } else { None };
    }

    let stop_token = match follow {
        Some(PatEnt::Token(tok)) => Some(tok),
        Some(PatEnt::Rep { sep: Some(s), .. }) => Some(s),
        _ => None,
    };
    let mut taken = Vec::new();
    for tree in input {
        if let Some(stop) = stop_token {
            if token_matches(tree, stop) {
                break;
            }
        }
        taken.push(tree.clone());
    }
    if taken.is_empty() {
        None
    } else {
        Some(taken)
    }
}

/// Project the captures visible inside one repetition iteration
fn iteration_view(caps: &Captures, vars: &[String], index: usize) -> Option<Captures> {
    let mut view = caps.clone();
    for var in vars {
        match caps.get(var) {
            Some(Capture::Seq(seq)) => {
                view.insert(var.clone(), seq.get(index)?.clone());
            }
            Some(Capture::Tokens(_)) => {}
            None => return None,
        }
    }
    Some(view)
}

fn body_vars(entries: &[TransEnt], out: &mut Vec<String>) {
    for ent in entries {
        match ent {
            TransEnt::Var(name) => out.push(name.clone()),
            TransEnt::Subtree { entries, .. } | TransEnt::Rep { entries, .. } => {
                body_vars(entries, out)
            }
            TransEnt::Token(..) | TransEnt::DollarCrate => {}
        }
    }
}

fn transcribe(
    span: &Span,
    entries: &[TransEnt],
    caps: &Captures,
    scope: u32,
    def_module: &ItemPath,
    out: &mut Vec<TokenTree>,
) -> Result<(), ExpandError> {
    for ent in entries {
        match ent {
            TransEnt::Token(sp, tok) => {
                // Identifiers written in the macro body belong to this
                // expansion's hygiene scope
                let tok = match tok {
                    Token::Ident { name, .. } => Token::Ident {
                        name: name.clone(),
                        hygiene: Hygiene::expansion(scope),
                    },
                    other => other.clone(),
                };
                out.push(TokenTree::Token(sp.clone(), tok));
            }
            TransEnt::DollarCrate => {
                out.push(TokenTree::Token(
                    span.clone(),
                    Token::Ident {
                        name: "$crate".to_string(),
                        hygiene: Hygiene {
                            scope,
                            module_path: Some(def_module.clone()),
                        },
                    },
                ));
            }
            TransEnt::Var(name) => match caps.get(name) {
                Some(Capture::Tokens(trees)) => out.extend(trees.iter().cloned()),
                Some(Capture::Seq(_)) => {
                    return Err(macro_input_err(
                        span,
                        format!("`${name}` is repeated and needs `$(...)`"),
                    ));
                }
                None => {
                    return Err(macro_input_err(span, format!("unknown capture `${name}`")));
                }
            },
            TransEnt::Subtree {
                span: sp,
                delim,
                entries,
            } => {
                let mut inner = Vec::new();
                transcribe(sp, entries, caps, scope, def_module, &mut inner)?;
                out.push(TokenTree::Delimited {
                    span: sp.clone(),
                    delim: *delim,
                    tts: inner,
                });
            }
            TransEnt::Rep { entries, sep } => {
                let mut vars = Vec::new();
                body_vars(entries, &mut vars);
                let count = vars
                    .iter()
                    .find_map(|v| match caps.get(v) {
                        Some(Capture::Seq(seq)) => Some(seq.len()),
                        _ => None,
                    })
                    .ok_or_else(|| {
                        macro_input_err(span, "repetition with no repeating capture")
                    })?;
                for i in 0..count {
                    if i > 0 {
                        if let Some(s) = sep {
                            out.push(TokenTree::Token(span.clone(), s.clone()));
                        }
                    }
                    let view = iteration_view(caps, &vars, i).ok_or_else(|| {
                        macro_input_err(span, "mismatched repetition depths")
                    })?;
                    transcribe(span, entries, &view, scope, def_module, out)?;
                }
            }
        }
    }
    Ok(())
}

/// Expand one macro_rules invocation: try each rule in order, transcribe
/// the first that matches.
pub fn expand_macro_rules(
    def: &MacroRulesDef,
    span: &Span,
    input: &[TokenTree],
    hygiene_scope: u32,
) -> Result<TokenStream, ExpandError> {
    for rule in &def.rules {
        let pattern = compile_pattern(span, &rule.pattern)?;
        let mut caps = Captures::new();
        match match_seq(&pattern, input, &mut caps) {
            Some(consumed) if consumed == input.len() => {
                let body = compile_body(span, &rule.body)?;
                let mut out = Vec::new();
                transcribe(span, &body, &caps, hygiene_scope, &def.def_module, &mut out)?;
                log::trace!(
                    "macro_rules {}! matched; {} tokens out",
                    def.name,
                    out.len()
                );
                return Ok(out);
            }
            _ => continue,
        }
    }
    Err(macro_input_err(
        span,
        format!("no rule of `{}!` matched the input", def.name),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferric_ast::MacroRule;

    fn ident(name: &str) -> TokenTree {
        TokenTree::token(Token::ident(name))
    }

    fn punct(sym: &str) -> TokenTree {
        TokenTree::token(Token::punct(sym))
    }

    fn int(value: u128) -> TokenTree {
        TokenTree::token(Token::IntLit {
            value,
            suffix: None,
        })
    }

    fn def(rules: Vec<(Vec<TokenTree>, Vec<TokenTree>)>) -> MacroRulesDef {
        MacroRulesDef {
            name: "m".to_string(),
            rules: rules
                .into_iter()
                .map(|(pattern, body)| MacroRule { pattern, body })
                .collect(),
            def_module: ItemPath::local_root(),
        }
    }

    #[test]
    fn test_simple_substitution() {
        // macro_rules! m { ($x:expr) => { $x + $x } }
        let def = def(vec![(
            vec![punct("$"), ident("x"), punct(":"), ident("expr")],
            vec![punct("$"), ident("x"), punct("+"), punct("$"), ident("x")],
        )]);
        let out = expand_macro_rules(&def, &Span::unknown(), &[int(3)], 1).unwrap();
        assert_eq!(out.len(), 3);
        assert!(matches!(
            out[0].as_token(),
            Some(Token::IntLit { value: 3, .. })
        ));
        assert!(out[1].as_token().map(|t| t.is_punct("+")).unwrap_or(false));
    }

    #[test]
    fn test_rule_order_first_match_wins() {
        // m!{ (zero) => {0}; ($x:tt) => {1} }
        let def = def(vec![
            (vec![ident("zero")], vec![int(0)]),
            (
                vec![punct("$"), ident("x"), punct(":"), ident("tt")],
                vec![int(1)],
            ),
        ]);
        let out = expand_macro_rules(&def, &Span::unknown(), &[ident("zero")], 1).unwrap();
        assert!(matches!(
            out[0].as_token(),
            Some(Token::IntLit { value: 0, .. })
        ));
        let out = expand_macro_rules(&def, &Span::unknown(), &[ident("other")], 1).unwrap();
        assert!(matches!(
            out[0].as_token(),
            Some(Token::IntLit { value: 1, .. })
        ));
    }

    #[test]
    fn test_repetition_with_separator() {
        // m!{ ($($x:ident),*) => { $($x);* } }
        let def = def(vec![(
            vec![
                punct("$"),
                TokenTree::Delimited {
                    span: Span::unknown(),
                    delim: Delim::Paren,
                    tts: vec![punct("$"), ident("x"), punct(":"), ident("ident")],
                },
                punct(","),
                punct("*"),
            ],
            vec![
                punct("$"),
                TokenTree::Delimited {
                    span: Span::unknown(),
                    delim: Delim::Paren,
                    tts: vec![punct("$"), ident("x")],
                },
                punct(";"),
                punct("*"),
            ],
        )]);
        let input = vec![ident("a"), punct(","), ident("b"), punct(","), ident("c")];
        let out = expand_macro_rules(&def, &Span::unknown(), &input, 1).unwrap();
        // a ; b ; c
        assert_eq!(out.len(), 5);
        assert!(matches!(
            out[0].as_token(),
            Some(Token::Ident { name, .. }) if name == "a"
        ));
        assert!(out[1].as_token().map(|t| t.is_punct(";")).unwrap_or(false));
        assert!(matches!(
            out[4].as_token(),
            Some(Token::Ident { name, .. }) if name == "c"
        ));
    }

    #[test]
    fn test_no_rule_matched_is_an_error() {
        let def = def(vec![(vec![ident("only")], vec![int(1)])]);
        let err = expand_macro_rules(&def, &Span::unknown(), &[ident("wrong")], 1);
        assert!(matches!(err, Err(ExpandError::MacroInput { .. })));
    }

    #[test]
    fn test_transcribed_idents_get_fresh_hygiene() {
        // m!{ () => { tmp } }
        let def = def(vec![(vec![], vec![ident("tmp")])]);
        let out = expand_macro_rules(&def, &Span::unknown(), &[], 42).unwrap();
        match out[0].as_token() {
            Some(Token::Ident { hygiene, .. }) => assert_eq!(hygiene.scope, 42),
            other => panic!("expected ident, got {other:?}"),
        }
    }

    #[test]
    fn test_dollar_crate_carries_def_module() {
        let mut d = def(vec![(vec![], vec![punct("$"), ident("crate")])]);
        d.def_module = ItemPath::crate_root("dep");
        let out = expand_macro_rules(&d, &Span::unknown(), &[], 1).unwrap();
        match out[0].as_token() {
            Some(Token::Ident { name, hygiene }) => {
                assert_eq!(name, "$crate");
                assert_eq!(hygiene.module_path, Some(ItemPath::crate_root("dep")));
            }
            other => panic!("expected $crate marker, got {other:?}"),
        }
    }
}
