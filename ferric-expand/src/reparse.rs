//! Re-parsing of macro expansion output.
//!
//! The real parser is an external collaborator; expansion talks to it
//! through the [`Reparse`] trait, selecting an entry point by the
//! invocation's syntactic position. [`TokenReparser`] is the built-in
//! implementation covering the token shapes the built-in macros and
//! ordinary macro_rules bodies produce; a full parser can be substituted
//! by the driver.

use crate::ExpandError;
use ferric_ast::{
    ConstItem, CoreType, ExprKind, ExprNode, Function, Item, ItemEntry, Literal, MetaItem, Path,
    PathClass, PathNode, Pattern, PatternKind, PatternValue, Static, Stmt, Struct, StructKind,
    Token, TokenTree, TypeRef,
};
use ferric_ast::expr::BinOp;
use ferric_diagnostics::Span;

pub trait Reparse {
    fn parse_items(&self, span: &Span, tts: &[TokenTree]) -> Result<Vec<ItemEntry>, ExpandError>;
    fn parse_expr(&self, span: &Span, tts: &[TokenTree]) -> Result<ExprNode, ExpandError>;
    fn parse_type(&self, span: &Span, tts: &[TokenTree]) -> Result<TypeRef, ExpandError>;
    fn parse_pattern(&self, span: &Span, tts: &[TokenTree]) -> Result<Pattern, ExpandError>;
    fn parse_stmts(&self, span: &Span, tts: &[TokenTree]) -> Result<Vec<Stmt>, ExpandError>;
    fn parse_meta(&self, span: &Span, tts: &[TokenTree]) -> Result<MetaItem, ExpandError>;
}

/// The built-in token parser
#[derive(Debug, Default)]
pub struct TokenReparser;

impl TokenReparser {
    pub fn new() -> Self {
        TokenReparser
    }
}

fn parse_err(span: &Span, detail: impl Into<String>) -> ExpandError {
    ExpandError::MacroInput {
        span: span.clone(),
        detail: detail.into(),
    }
}

struct Cursor<'a> {
    span: Span,
    tts: &'a [TokenTree],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(span: &Span, tts: &'a [TokenTree]) -> Self {
        Cursor {
            span: span.clone(),
            tts,
            pos: 0,
        }
    }

    fn peek(&self) -> Option<&'a TokenTree> {
        self.tts.get(self.pos)
    }

    fn peek_token(&self) -> Option<&'a Token> {
        self.peek().and_then(|t| t.as_token())
    }

    fn next(&mut self) -> Option<&'a TokenTree> {
        let tree = self.tts.get(self.pos)?;
        self.pos += 1;
        Some(tree)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tts.len()
    }

    fn eat_punct(&mut self, sym: &str) -> bool {
        if self.peek_token().map(|t| t.is_punct(sym)).unwrap_or(false) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_ident(&mut self, name: &str) -> bool {
        if self.peek_token().map(|t| t.is_ident(name)).unwrap_or(false) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, sym: &str) -> Result<(), ExpandError> {
        if self.eat_punct(sym) {
            Ok(())
        } else {
            Err(parse_err(
                &self.span,
                format!("expected `{sym}`, found {:?}", self.peek()),
            ))
        }
    }

    fn expect_ident(&mut self) -> Result<(String, ferric_ast::Hygiene), ExpandError> {
        match self.next().and_then(|t| t.as_token()) {
            Some(Token::Ident { name, hygiene }) => Ok((name.clone(), hygiene.clone())),
            other => Err(parse_err(
                &self.span,
                format!("expected identifier, found {other:?}"),
            )),
        }
    }
}

/// Binary operator lookup with precedence (higher binds tighter)
fn binop_for(sym: &str) -> Option<(BinOp, u8)> {
    Some(match sym {
        "||" => (BinOp::BoolOr, 1),
        "&&" => (BinOp::BoolAnd, 2),
        "==" => (BinOp::Eq, 3),
        "!=" => (BinOp::Ne, 3),
        "<" => (BinOp::Lt, 3),
        "<=" => (BinOp::Le, 3),
        ">" => (BinOp::Gt, 3),
        ">=" => (BinOp::Ge, 3),
        "|" => (BinOp::BitOr, 4),
        "^" => (BinOp::BitXor, 5),
        "&" => (BinOp::BitAnd, 6),
        "<<" => (BinOp::Shl, 7),
        ">>" => (BinOp::Shr, 7),
        "+" => (BinOp::Add, 8),
        "-" => (BinOp::Sub, 8),
        "*" => (BinOp::Mul, 9),
        "/" => (BinOp::Div, 9),
        "%" => (BinOp::Rem, 9),
        _ => return None,
    })
}

fn literal_from_token(tok: &Token) -> Option<Literal> {
    match tok {
        Token::IntLit { value, suffix } => Some(Literal::Integer {
            value: *value,
            suffix: suffix.as_deref().and_then(CoreType::from_name),
        }),
        Token::FloatLit { value, suffix } => Some(Literal::Float {
            value: *value,
            suffix: suffix.as_deref().and_then(CoreType::from_name),
        }),
        Token::StrLit(s) => Some(Literal::Str(s.clone())),
        Token::ByteStrLit(b) => Some(Literal::ByteStr(b.clone())),
        Token::CharLit(c) => Some(Literal::Char(*c)),
        Token::Ident { name, .. } if name == "true" => Some(Literal::Bool(true)),
        Token::Ident { name, .. } if name == "false" => Some(Literal::Bool(false)),
        _ => None,
    }
}

impl TokenReparser {
    fn parse_path(&self, cur: &mut Cursor<'_>) -> Result<Path, ExpandError> {
        // Leading `::` roots the path at the local crate
        let absolute = cur.eat_punct("::");
        let (first, hygiene) = cur.expect_ident()?;
        let mut nodes = Vec::new();
        // `$crate` markers root resolution at the macro's own crate via
        // the hygiene module path
        let dollar_crate = first == "$crate";
        if !dollar_crate {
            nodes.push(PathNode::new(&first));
        }
        while cur.peek_token().map(|t| t.is_punct("::")).unwrap_or(false) {
            // Only continue when followed by an identifier segment
            match cur.tts.get(cur.pos + 1).and_then(|t| t.as_token()) {
                Some(Token::Ident { .. }) => {
                    cur.eat_punct("::");
                    let (seg, _) = cur.expect_ident()?;
                    nodes.push(PathNode::new(&seg));
                }
                _ => break,
            }
        }
        if absolute {
            Ok(Path::absolute("", nodes))
        } else if dollar_crate {
            Ok(Path::relative_hygienic(hygiene, nodes))
        } else {
            Ok(Path::relative_hygienic(hygiene, nodes))
        }
    }

    fn parse_call_args(
        &self,
        span: &Span,
        tts: &[TokenTree],
    ) -> Result<Vec<ExprNode>, ExpandError> {
        let mut args = Vec::new();
        let mut cur = Cursor::new(span, tts);
        while !cur.at_end() {
            args.push(self.parse_expr_prec(&mut cur, 0)?);
            if !cur.eat_punct(",") {
                break;
            }
        }
        if !cur.at_end() {
            return Err(parse_err(span, "trailing tokens in argument list"));
        }
        Ok(args)
    }

    fn parse_primary(&self, cur: &mut Cursor<'_>) -> Result<ExprNode, ExpandError> {
        // Unary prefixes
        if cur.eat_punct("&") {
            let is_mut = cur.eat_ident("mut");
            let inner = self.parse_primary(cur)?;
            return Ok(ExprNode::new(ExprKind::Borrow {
                is_mut,
                inner: Box::new(inner),
            }));
        }
        if cur.eat_punct("*") {
            let inner = self.parse_primary(cur)?;
            return Ok(ExprNode::new(ExprKind::Deref {
                inner: Box::new(inner),
            }));
        }
        if cur.eat_punct("-") {
            let inner = self.parse_primary(cur)?;
            return Ok(ExprNode::new(ExprKind::UniOp {
                op: ferric_ast::UniOp::Neg,
                inner: Box::new(inner),
            }));
        }
        if cur.eat_punct("!") {
            let inner = self.parse_primary(cur)?;
            return Ok(ExprNode::new(ExprKind::UniOp {
                op: ferric_ast::UniOp::Not,
                inner: Box::new(inner),
            }));
        }

        let mut node = match cur.peek() {
            Some(TokenTree::Token(sp, tok)) => {
                if let Some(lit) = literal_from_token(tok) {
                    cur.next();
                    ExprNode::with_span(sp.clone(), ExprKind::Literal(lit))
                } else if matches!(tok, Token::Ident { .. }) || tok.is_punct("::") {
                    let path = self.parse_path(cur)?;
                    // A parenthesised group directly after a path is a call
                    if let Some(TokenTree::Delimited {
                        delim: ferric_ast::Delim::Paren,
                        tts: inner,
                        span: gspan,
                    }) = cur.peek()
                    {
                        let args = self.parse_call_args(gspan, inner)?;
                        cur.next();
                        ExprNode::call_path(path, args)
                    } else {
                        ExprNode::named(path)
                    }
                } else {
                    return Err(parse_err(
                        &cur.span,
                        format!("cannot parse expression at {tok:?}"),
                    ));
                }
            }
            Some(TokenTree::Delimited {
                delim: ferric_ast::Delim::Paren,
                tts: inner,
                span: gspan,
            }) => {
                let elems = self.parse_call_args(gspan, inner)?;
                cur.next();
                if elems.len() == 1 && !inner.iter().any(|t| {
                    t.as_token().map(|t| t.is_punct(",")).unwrap_or(false)
                }) {
                    elems.into_iter().next().unwrap_or_else(ExprNode::unit)
                } else {
                    ExprNode::new(ExprKind::Tuple(elems))
                }
            }
            Some(TokenTree::Delimited {
                delim: ferric_ast::Delim::Bracket,
                tts: inner,
                span: gspan,
            }) => {
                let elems = self.parse_call_args(gspan, inner)?;
                cur.next();
                ExprNode::new(ExprKind::ArrayList(elems))
            }
            Some(TokenTree::Delimited {
                delim: ferric_ast::Delim::Brace,
                tts: inner,
                span: gspan,
            }) => {
                let stmts = self.parse_stmts(gspan, inner)?;
                cur.next();
                block_from_stmts(stmts)
            }
            None => return Err(parse_err(&cur.span, "empty expression")),
        };

        // Postfix: field access and method calls
        loop {
            if cur.peek_token().map(|t| t.is_punct(".")).unwrap_or(false) {
                cur.eat_punct(".");
                let (name, _) = cur.expect_ident()?;
                if let Some(TokenTree::Delimited {
                    delim: ferric_ast::Delim::Paren,
                    tts: inner,
                    span: gspan,
                }) = cur.peek()
                {
                    let args = self.parse_call_args(gspan, inner)?;
                    cur.next();
                    node = ExprNode::new(ExprKind::CallMethod {
                        receiver: Box::new(node),
                        method: PathNode::new(&name),
                        args,
                        cache: Default::default(),
                    });
                } else {
                    node = ExprNode::new(ExprKind::Field {
                        receiver: Box::new(node),
                        name,
                    });
                }
            } else {
                break;
            }
        }
        Ok(node)
    }

    fn parse_expr_prec(&self, cur: &mut Cursor<'_>, min_prec: u8) -> Result<ExprNode, ExpandError> {
        let mut left = self.parse_primary(cur)?;
        loop {
            let Some(tok) = cur.peek_token() else { break };
            let Token::Punct(sym) = tok else { break };
            let Some((op, prec)) = binop_for(sym) else {
                break;
            };
            if prec < min_prec {
                break;
            }
            cur.next();
            let right = self.parse_expr_prec(cur, prec + 1)?;
            left = ExprNode::new(ExprKind::BinOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            });
        }
        Ok(left)
    }

    fn parse_type_inner(&self, cur: &mut Cursor<'_>) -> Result<TypeRef, ExpandError> {
        if cur.eat_punct("&") {
            let is_mut = cur.eat_ident("mut");
            let inner = self.parse_type_inner(cur)?;
            return Ok(TypeRef::Borrow {
                is_mut,
                inner: Box::new(inner),
            });
        }
        if cur.eat_punct("*") {
            let is_mut = if cur.eat_ident("mut") {
                true
            } else if cur.eat_ident("const") {
                false
            } else {
                return Err(parse_err(&cur.span, "expected `const` or `mut`"));
            };
            let inner = self.parse_type_inner(cur)?;
            return Ok(TypeRef::Pointer {
                is_mut,
                inner: Box::new(inner),
            });
        }
        if cur.eat_punct("!") {
            return Ok(TypeRef::Diverge);
        }
        match cur.peek() {
            Some(TokenTree::Token(_, Token::Ident { name, .. })) => {
                if name == "_" {
                    cur.next();
                    return Ok(TypeRef::infer());
                }
                if let Some(ct) = CoreType::from_name(name) {
                    cur.next();
                    return Ok(TypeRef::Primitive(ct));
                }
                let mut path = self.parse_path(cur)?;
                // Generic arguments on the final segment
                if cur.eat_punct("<") {
                    let mut args = Vec::new();
                    loop {
                        args.push(self.parse_type_inner(cur)?);
                        if cur.eat_punct(",") {
                            continue;
                        }
                        cur.expect_punct(">")?;
                        break;
                    }
                    if let Some(nodes) = path.nodes_mut() {
                        if let Some(last) = nodes.last_mut() {
                            last.args = args;
                        }
                    }
                }
                Ok(TypeRef::path(path))
            }
            Some(TokenTree::Delimited {
                delim: ferric_ast::Delim::Paren,
                tts: inner,
                span: gspan,
            }) => {
                cur.next();
                let mut elems = Vec::new();
                let mut inner_cur = Cursor::new(gspan, inner);
                while !inner_cur.at_end() {
                    elems.push(self.parse_type_inner(&mut inner_cur)?);
                    if !inner_cur.eat_punct(",") {
                        break;
                    }
                }
                Ok(TypeRef::Tuple(elems))
            }
            Some(TokenTree::Delimited {
                delim: ferric_ast::Delim::Bracket,
                tts: inner,
                span: gspan,
            }) => {
                cur.next();
                let mut inner_cur = Cursor::new(gspan, inner);
                let elem = self.parse_type_inner(&mut inner_cur)?;
                if inner_cur.eat_punct(";") {
                    match inner_cur.next().and_then(|t| t.as_token()) {
                        Some(Token::IntLit { value, .. }) => Ok(TypeRef::Array {
                            inner: Box::new(elem),
                            size: *value as u64,
                        }),
                        other => Err(parse_err(
                            gspan,
                            format!("expected array length, found {other:?}"),
                        )),
                    }
                } else {
                    Ok(TypeRef::Slice {
                        inner: Box::new(elem),
                    })
                }
            }
            other => Err(parse_err(
                &cur.span,
                format!("cannot parse type at {other:?}"),
            )),
        }
    }

    fn parse_pattern_inner(&self, cur: &mut Cursor<'_>) -> Result<Pattern, ExpandError> {
        match cur.peek() {
            Some(TokenTree::Token(_, tok)) => {
                if let Some(lit) = literal_from_token(tok) {
                    cur.next();
                    let value = match lit {
                        Literal::Integer { value, .. } => PatternValue::Integer(value as i128),
                        Literal::Float { value, .. } => PatternValue::Float(value),
                        Literal::Bool(b) => PatternValue::Bool(b),
                        Literal::Str(s) => PatternValue::Str(s),
                        Literal::ByteStr(b) => PatternValue::ByteStr(b),
                        Literal::Char(c) => PatternValue::Char(c),
                    };
                    return Ok(Pattern::new(PatternKind::Value { value }));
                }
                if tok.is_ident("_") {
                    cur.next();
                    return Ok(Pattern::any());
                }
                match tok {
                    Token::Ident { .. } => {
                        let path = self.parse_path(cur)?;
                        if let Some(TokenTree::Delimited {
                            delim: ferric_ast::Delim::Paren,
                            tts: inner,
                            span: gspan,
                        }) = cur.peek()
                        {
                            let mut elems = Vec::new();
                            let mut inner_cur = Cursor::new(gspan, inner);
                            while !inner_cur.at_end() {
                                elems.push(self.parse_pattern_inner(&mut inner_cur)?);
                                if !inner_cur.eat_punct(",") {
                                    break;
                                }
                            }
                            cur.next();
                            return Ok(Pattern::new(PatternKind::StructTuple { path, elems }));
                        }
                        // Single identifier: binding or constant, decided
                        // by resolution
                        match &path.class {
                            PathClass::Relative { hygiene, nodes } if nodes.len() == 1 => {
                                Ok(Pattern {
                                    span: cur.span.clone(),
                                    binding: None,
                                    kind: PatternKind::MaybeBind {
                                        name: nodes[0].name.clone(),
                                        hygiene: hygiene.clone(),
                                    },
                                })
                            }
                            _ => Ok(Pattern::new(PatternKind::Value {
                                value: PatternValue::Named(path),
                            })),
                        }
                    }
                    other => Err(parse_err(
                        &cur.span,
                        format!("cannot parse pattern at {other:?}"),
                    )),
                }
            }
            Some(TokenTree::Delimited {
                delim: ferric_ast::Delim::Paren,
                tts: inner,
                span: gspan,
            }) => {
                cur.next();
                let mut elems = Vec::new();
                let mut inner_cur = Cursor::new(gspan, inner);
                while !inner_cur.at_end() {
                    elems.push(self.parse_pattern_inner(&mut inner_cur)?);
                    if !inner_cur.eat_punct(",") {
                        break;
                    }
                }
                Ok(Pattern::new(PatternKind::Tuple(elems)))
            }
            other => Err(parse_err(
                &cur.span,
                format!("cannot parse pattern at {other:?}"),
            )),
        }
    }

    fn parse_meta_inner(&self, cur: &mut Cursor<'_>) -> Result<MetaItem, ExpandError> {
        let (name, _) = cur.expect_ident()?;
        if let Some(TokenTree::Delimited {
            delim: ferric_ast::Delim::Paren,
            tts: inner,
            span: gspan,
        }) = cur.peek()
        {
            let mut items = Vec::new();
            let mut inner_cur = Cursor::new(gspan, inner);
            while !inner_cur.at_end() {
                items.push(self.parse_meta_inner(&mut inner_cur)?);
                if !inner_cur.eat_punct(",") {
                    break;
                }
            }
            cur.next();
            return Ok(MetaItem::list(&name, items));
        }
        if cur.eat_punct("=") {
            match cur.next().and_then(|t| t.as_token()) {
                Some(Token::StrLit(value)) => {
                    return Ok(MetaItem::value(&name, value));
                }
                other => {
                    return Err(parse_err(
                        &cur.span,
                        format!("expected string value, found {other:?}"),
                    ))
                }
            }
        }
        Ok(MetaItem::flag(&name))
    }
}

fn block_from_stmts(mut stmts: Vec<Stmt>) -> ExprNode {
    // A trailing value statement becomes the block tail
    let tail = match stmts.last() {
        Some(Stmt::Expr(_)) => match stmts.pop() {
            Some(Stmt::Expr(e)) => Some(e),
            _ => None,
        },
        _ => None,
    };
    ExprNode::block(stmts, tail)
}

impl Reparse for TokenReparser {
    fn parse_items(&self, span: &Span, tts: &[TokenTree]) -> Result<Vec<ItemEntry>, ExpandError> {
        let mut cur = Cursor::new(span, tts);
        let mut items = Vec::new();
        while !cur.at_end() {
            let is_pub = cur.eat_ident("pub");
            if cur.eat_ident("fn") {
                let (name, _) = cur.expect_ident()?;
                match (cur.next(), cur.peek()) {
                    (
                        Some(TokenTree::Delimited {
                            delim: ferric_ast::Delim::Paren,
                            tts: params,
                            ..
                        }),
                        Some(TokenTree::Delimited {
                            delim: ferric_ast::Delim::Brace,
                            tts: body,
                            span: bspan,
                        }),
                    ) => {
                        if !params.is_empty() {
                            return Err(parse_err(
                                span,
                                "generated functions with parameters need the full parser",
                            ));
                        }
                        let stmts = self.parse_stmts(bspan, body)?;
                        cur.next();
                        let mut entry = ItemEntry::new(
                            &name,
                            Item::Function(Function::new(
                                vec![],
                                TypeRef::unit(),
                                Some(block_from_stmts(stmts)),
                            )),
                        );
                        entry.is_pub = is_pub;
                        items.push(entry);
                    }
                    _ => return Err(parse_err(span, "malformed generated function")),
                }
            } else if cur.eat_ident("const") {
                let (name, _) = cur.expect_ident()?;
                cur.expect_punct(":")?;
                let ty = self.parse_type_inner(&mut cur)?;
                cur.expect_punct("=")?;
                let value = self.parse_expr_prec(&mut cur, 0)?;
                cur.expect_punct(";")?;
                let mut entry = ItemEntry::new(
                    &name,
                    Item::Const(ConstItem {
                        ty,
                        value: Some(value),
                    }),
                );
                entry.is_pub = is_pub;
                items.push(entry);
            } else if cur.eat_ident("static") {
                let (name, _) = cur.expect_ident()?;
                cur.expect_punct(":")?;
                let ty = self.parse_type_inner(&mut cur)?;
                cur.expect_punct("=")?;
                let value = self.parse_expr_prec(&mut cur, 0)?;
                cur.expect_punct(";")?;
                let mut entry = ItemEntry::new(
                    &name,
                    Item::Static(Static {
                        is_mut: false,
                        ty,
                        value: Some(value),
                    }),
                );
                entry.is_pub = is_pub;
                items.push(entry);
            } else if cur.eat_ident("struct") {
                let (name, _) = cur.expect_ident()?;
                cur.expect_punct(";")?;
                let mut entry = ItemEntry::new(
                    &name,
                    Item::Struct(Struct {
                        generics: Default::default(),
                        kind: StructKind::Unit,
                    }),
                );
                entry.is_pub = is_pub;
                items.push(entry);
            } else {
                return Err(parse_err(
                    span,
                    format!("generated item needs the full parser: {:?}", cur.peek()),
                ));
            }
        }
        Ok(items)
    }

    fn parse_expr(&self, span: &Span, tts: &[TokenTree]) -> Result<ExprNode, ExpandError> {
        let mut cur = Cursor::new(span, tts);
        let node = self.parse_expr_prec(&mut cur, 0)?;
        if !cur.at_end() {
            return Err(parse_err(span, "trailing tokens after expression"));
        }
        Ok(node)
    }

    fn parse_type(&self, span: &Span, tts: &[TokenTree]) -> Result<TypeRef, ExpandError> {
        let mut cur = Cursor::new(span, tts);
        let ty = self.parse_type_inner(&mut cur)?;
        if !cur.at_end() {
            return Err(parse_err(span, "trailing tokens after type"));
        }
        Ok(ty)
    }

    fn parse_pattern(&self, span: &Span, tts: &[TokenTree]) -> Result<Pattern, ExpandError> {
        let mut cur = Cursor::new(span, tts);
        let pat = self.parse_pattern_inner(&mut cur)?;
        if !cur.at_end() {
            return Err(parse_err(span, "trailing tokens after pattern"));
        }
        Ok(pat)
    }

    fn parse_stmts(&self, span: &Span, tts: &[TokenTree]) -> Result<Vec<Stmt>, ExpandError> {
        let mut cur = Cursor::new(span, tts);
        let mut stmts = Vec::new();
        while !cur.at_end() {
            if cur.eat_ident("let") {
                let pat = self.parse_pattern_inner(&mut cur)?;
                let ty = if cur.eat_punct(":") {
                    self.parse_type_inner(&mut cur)?
                } else {
                    TypeRef::infer()
                };
                cur.expect_punct("=")?;
                let value = self.parse_expr_prec(&mut cur, 0)?;
                cur.expect_punct(";")?;
                stmts.push(Stmt::Let {
                    pat,
                    ty,
                    value: Some(value),
                });
            } else {
                let expr = self.parse_expr_prec(&mut cur, 0)?;
                if cur.eat_punct(";") {
                    stmts.push(Stmt::Semi(expr));
                } else {
                    stmts.push(Stmt::Expr(expr));
                    break;
                }
            }
        }
        if !cur.at_end() {
            return Err(parse_err(span, "trailing tokens after statements"));
        }
        Ok(stmts)
    }

    fn parse_meta(&self, span: &Span, tts: &[TokenTree]) -> Result<MetaItem, ExpandError> {
        let mut cur = Cursor::new(span, tts);
        let meta = self.parse_meta_inner(&mut cur)?;
        if !cur.at_end() {
            return Err(parse_err(span, "trailing tokens after meta item"));
        }
        Ok(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn test_parse_literal_expr() {
        let reparser = TokenReparser::new();
        let node = reparser.parse_expr(&Span::unknown(), &[ident("true")]).unwrap();
        assert!(matches!(
            node.kind,
            ExprKind::Literal(Literal::Bool(true))
        ));
    }

    #[test]
    fn test_parse_binary_precedence() {
        // 1 + 2 * 3 parses as 1 + (2 * 3)
        let reparser = TokenReparser::new();
        let tts = vec![int(1), punct("+"), int(2), punct("*"), int(3)];
        let node = reparser.parse_expr(&Span::unknown(), &tts).unwrap();
        match node.kind {
            ExprKind::BinOp {
                op: BinOp::Add,
                right,
                ..
            } => {
                assert!(matches!(
                    right.kind,
                    ExprKind::BinOp { op: BinOp::Mul, .. }
                ));
            }
            other => panic!("expected Add at root, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_path_call() {
        let reparser = TokenReparser::new();
        let tts = vec![
            ident("foo"),
            punct("::"),
            ident("bar"),
            TokenTree::Delimited {
                span: Span::unknown(),
                delim: ferric_ast::Delim::Paren,
                tts: vec![int(1), punct(","), int(2)],
            },
        ];
        let node = reparser.parse_expr(&Span::unknown(), &tts).unwrap();
        match node.kind {
            ExprKind::CallPath { path, args, .. } => {
                assert_eq!(path.nodes().len(), 2);
                assert_eq!(args.len(), 2);
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_type_with_args() {
        let reparser = TokenReparser::new();
        let tts = vec![
            punct("&"),
            ident("Vec"),
            punct("<"),
            ident("u8"),
            punct(">"),
        ];
        let ty = reparser.parse_type(&Span::unknown(), &tts).unwrap();
        match ty {
            TypeRef::Borrow { inner, .. } => match *inner {
                TypeRef::Path(path) => {
                    assert_eq!(path.nodes()[0].args.len(), 1);
                }
                other => panic!("expected path, got {other:?}"),
            },
            other => panic!("expected borrow, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_generated_const_item() {
        let reparser = TokenReparser::new();
        let tts = vec![
            ident("const"),
            ident("N"),
            punct(":"),
            ident("u32"),
            punct("="),
            int(7),
            punct(";"),
        ];
        let items = reparser.parse_items(&Span::unknown(), &tts).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "N");
        assert!(matches!(items[0].item, Item::Const(_)));
    }

    #[test]
    fn test_parse_let_statements() {
        let reparser = TokenReparser::new();
        let tts = vec![
            ident("let"),
            ident("x"),
            punct("="),
            int(1),
            punct(";"),
            ident("x"),
        ];
        let stmts = reparser.parse_stmts(&Span::unknown(), &tts).unwrap();
        assert_eq!(stmts.len(), 2);
        assert!(matches!(stmts[0], Stmt::Let { .. }));
        assert!(matches!(stmts[1], Stmt::Expr(_)));
    }
}
