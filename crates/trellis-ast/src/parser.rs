//! Recursive-descent parser.
//!
//! Precedence, lowest first: ternary / elvis / `??`, `or`, `and`, equality,
//! `<=>`, relational and `isa`, range, additive, multiplicative, unary, `as`,
//! postfix, primary. Assignment only exists at statement level.
//!
//! The first syntax error aborts the template.

use derive_more::{Display, Error, From};
use trellis_context::ClassTable;
use trellis_core::{Primitive, Span, TypeArg, TypeRef};

use crate::ast::*;
use crate::lexer::{LexError, Lexer};
use crate::token::{Token, TokenKind};

#[derive(Clone, Debug, Display, Error, PartialEq, Eq)]
#[display("{}:{}: expected {expected}, found {found}", position.line, position.column)]
pub struct SyntaxError {
    #[error(not(source))]
    pub position: Span,
    pub expected: String,
    pub found: String,
}

impl SyntaxError {
    pub fn message(&self) -> String {
        format!("expected {}, found {}", self.expected, self.found)
    }
}

#[derive(Clone, Debug, Display, Error, From, PartialEq, Eq)]
pub enum ParseError {
    #[display("{_0}")]
    Lex(LexError),
    #[display("{_0}")]
    Syntax(SyntaxError),
}

pub type ParseResult<T> = Result<T, SyntaxError>;

/// The name a template gets from its source name: the last `/` segment.
pub fn default_name(source_name: &str) -> &str {
    source_name.rsplit('/').next().unwrap_or(source_name)
}

/// Parse a whole template source.
pub fn parse(source_name: &str, text: &str, classes: &ClassTable) -> Result<TemplateDecl, ParseError> {
    let tokens = Lexer::tokenize(text)?;
    Ok(Parser::new(tokens, classes).template(default_name(source_name))?)
}

/// Parse only the header of a template, lexing no further than needed.
pub fn parse_header(
    source_name: &str,
    text: &str,
    classes: &ClassTable,
) -> Result<TemplateHeader, ParseError> {
    let mut tokens = Vec::new();
    let mut in_header = false;
    for token in Lexer::new(text) {
        let token = token?;
        let blank = matches!(&token.kind, TokenKind::Text(t) if t.trim().is_empty());
        let stop = match token.kind {
            TokenKind::Template if !in_header => {
                in_header = true;
                false
            }
            TokenKind::RParen if in_header => true,
            TokenKind::Eof => true,
            _ if !in_header && blank => continue,
            _ if !in_header => break,
            _ => false,
        };
        tokens.push(token);
        if stop {
            break;
        }
    }
    if !in_header {
        return Ok(TemplateHeader {
            name: default_name(source_name).to_string(),
            params: Vec::new(),
        });
    }
    let end = tokens.last().map(|t| t.span).unwrap_or_default();
    if !matches!(tokens.last().map(|t| &t.kind), Some(TokenKind::Eof)) {
        tokens.push(Token {
            kind: TokenKind::Eof,
            lexeme: String::new(),
            span: end,
        });
    }
    let mut parser = Parser::new(tokens, classes);
    let (name, params, _) = parser.header()?;
    Ok(TemplateHeader { name, params })
}

pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    classes: &'a ClassTable,
}

impl<'a> Parser<'a> {
    /// `tokens` must end with an `Eof` token.
    pub fn new(tokens: Vec<Token>, classes: &'a ClassTable) -> Self {
        Self {
            tokens,
            pos: 0,
            classes,
        }
    }

    fn peek(&self) -> &TokenKind {
        self.peek_nth(0)
    }

    fn peek_nth(&self, n: usize) -> &TokenKind {
        let index = (self.pos + n).min(self.tokens.len().saturating_sub(1));
        self.tokens
            .get(index)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn span(&self) -> Span {
        self.tokens
            .get(self.pos.min(self.tokens.len().saturating_sub(1)))
            .map(|t| t.span)
            .unwrap_or_default()
    }

    fn prev_span(&self) -> Span {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map(|t| t.span)
            .unwrap_or_default()
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    fn at(&self, kind: &TokenKind) -> bool {
        self.peek() == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error(&self, expected: impl Into<String>) -> SyntaxError {
        SyntaxError {
            position: self.span(),
            expected: expected.into(),
            found: self.peek().to_string(),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> ParseResult<Span> {
        if self.at(&kind) {
            self.advance();
            Ok(self.prev_span())
        } else {
            Err(self.error(kind.to_string()))
        }
    }

    fn ident(&mut self, what: &str) -> ParseResult<(String, Span)> {
        match self.peek().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok((name, self.prev_span()))
            }
            _ => Err(self.error(what)),
        }
    }

    pub fn template(&mut self, default_name: &str) -> ParseResult<TemplateDecl> {
        let mut body = Vec::new();
        let blank_prefix = matches!(self.peek(), TokenKind::Text(text) if text.trim().is_empty());
        if blank_prefix && self.peek_nth(1) == &TokenKind::Template {
            self.advance();
        }
        let has_header = self.at(&TokenKind::Template);

        let (name, params, header) = if has_header {
            let (name, params, span) = self.header()?;
            self.eat(&TokenKind::Semi);
            if let TokenKind::Text(text) = self.peek().clone() {
                let stripped = text
                    .strip_prefix("\r\n")
                    .or_else(|| text.strip_prefix('\n'))
                    .unwrap_or(&text);
                let span = self.span();
                self.advance();
                if !stripped.is_empty() {
                    body.push(Stmt {
                        kind: StmtKind::Text(stripped.to_string()),
                        span,
                    });
                }
            }
            (name, params, Some(span))
        } else {
            (default_name.to_string(), Vec::new(), None)
        };

        while !self.at(&TokenKind::Eof) {
            if let Some(stmt) = self.statement()? {
                body.push(stmt);
            }
        }
        Ok(TemplateDecl {
            name,
            params,
            body,
            header,
        })
    }

    fn header(&mut self) -> ParseResult<(String, Vec<ParamDecl>, Span)> {
        let start = self.expect(TokenKind::Template)?;
        let (name, _) = self.ident("template name")?;
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.at(&TokenKind::RParen) {
            loop {
                let ty_span = self.span();
                let ty = self.type_ref()?;
                let (name, name_span) = self.ident("parameter name")?;
                params.push(ParamDecl {
                    name,
                    ty,
                    span: ty_span.to(name_span),
                });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        let end = self.expect(TokenKind::RParen)?;
        Ok((name, params, start.to(end)))
    }

    // ---- statements ----

    /// `None` for empty statements (a lone `;`).
    fn statement(&mut self) -> ParseResult<Option<Stmt>> {
        let start = self.span();
        let kind = match self.peek().clone() {
            TokenKind::Semi => {
                self.advance();
                return Ok(None);
            }
            TokenKind::Text(text) => {
                self.advance();
                StmtKind::Text(text)
            }
            TokenKind::LBrace => StmtKind::Block(self.block()?),
            TokenKind::If => self.if_statement()?,
            TokenKind::Foreach => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let (var, _) = self.ident("loop variable")?;
                self.expect(TokenKind::In)?;
                let iterable = self.expr()?;
                let reverse = self.eat(&TokenKind::Reverse);
                self.expect(TokenKind::RParen)?;
                let body = self.body()?;
                StmtKind::Foreach {
                    var,
                    iterable,
                    reverse,
                    body,
                }
            }
            TokenKind::Return => {
                self.advance();
                let value = if self.starts_expr() {
                    Some(self.expr()?)
                } else {
                    None
                };
                StmtKind::Return(value)
            }
            TokenKind::Ident(name) if self.peek_nth(1) == &TokenKind::Assign => {
                self.advance();
                self.advance();
                let value = self.expr()?;
                StmtKind::Assign { name, value }
            }
            _ if self.starts_expr() => StmtKind::Expr(self.expr()?),
            _ => return Err(self.error("statement")),
        };
        Ok(Some(Stmt {
            kind,
            span: start.to(self.prev_span()),
        }))
    }

    fn starts_expr(&self) -> bool {
        let kind = self.peek();
        kind.starts_operand() || matches!(kind, TokenKind::Minus | TokenKind::Call)
    }

    fn if_statement(&mut self) -> ParseResult<StmtKind> {
        self.expect(TokenKind::If)?;
        self.expect(TokenKind::LParen)?;
        let cond = self.expr()?;
        self.expect(TokenKind::RParen)?;
        let then = self.body()?;
        let otherwise = if self.eat(&TokenKind::Else) {
            if self.at(&TokenKind::If) {
                let start = self.span();
                let nested = self.if_statement()?;
                let span = start.to(self.prev_span());
                Some(Block {
                    stmts: vec![Stmt { kind: nested, span }],
                    span,
                })
            } else {
                Some(self.body()?)
            }
        } else {
            None
        };
        Ok(StmtKind::If {
            cond,
            then,
            otherwise,
        })
    }

    /// A braced block, or a single statement standing in for one.
    fn body(&mut self) -> ParseResult<Block> {
        if self.at(&TokenKind::LBrace) {
            return self.block();
        }
        let start = self.span();
        let stmts = self.statement()?.into_iter().collect();
        Ok(Block {
            stmts,
            span: start.to(self.prev_span()),
        })
    }

    fn block(&mut self) -> ParseResult<Block> {
        let start = self.expect(TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        while !self.at(&TokenKind::RBrace) {
            if self.at(&TokenKind::Eof) {
                return Err(self.error("`}`"));
            }
            if let Some(stmt) = self.statement()? {
                stmts.push(stmt);
            }
        }
        let end = self.expect(TokenKind::RBrace)?;
        Ok(Block {
            stmts,
            span: start.to(end),
        })
    }

    // ---- expressions ----

    pub fn expr(&mut self) -> ParseResult<Expr> {
        self.conditional()
    }

    fn conditional(&mut self) -> ParseResult<Expr> {
        let lhs = self.or()?;
        let kind = match self.peek() {
            TokenKind::Question => {
                self.advance();
                let then = self.expr()?;
                self.expect(TokenKind::Colon)?;
                let otherwise = self.conditional()?;
                ExprKind::Ternary {
                    cond: Box::new(lhs),
                    then: Box::new(then),
                    otherwise: Box::new(otherwise),
                }
            }
            TokenKind::Elvis => {
                self.advance();
                let rhs = self.conditional()?;
                ExprKind::Elvis {
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                }
            }
            TokenKind::Coalesce => {
                self.advance();
                let rhs = self.conditional()?;
                ExprKind::Coalesce {
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                }
            }
            _ => return Ok(lhs),
        };
        let start = match &kind {
            ExprKind::Ternary { cond, .. } => cond.span,
            ExprKind::Elvis { lhs, .. } | ExprKind::Coalesce { lhs, .. } => lhs.span,
            _ => self.prev_span(),
        };
        Ok(Expr::new(kind, start.to(self.prev_span())))
    }

    fn binary(&self, op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        let span = lhs.span.to(rhs.span);
        Expr::new(
            ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            span,
        )
    }

    fn or(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.and()?;
        while matches!(self.peek(), TokenKind::Or | TokenKind::OrOr) {
            self.advance();
            let rhs = self.and()?;
            lhs = self.binary(BinaryOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn and(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.equality()?;
        while matches!(self.peek(), TokenKind::And | TokenKind::AndAnd) {
            self.advance();
            let rhs = self.equality()?;
            lhs = self.binary(BinaryOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn equality(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.compare3()?;
        loop {
            let op = match self.peek() {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::Ne,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.compare3()?;
            lhs = self.binary(op, lhs, rhs);
        }
    }

    fn compare3(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.relational()?;
        while self.eat(&TokenKind::Compare3) {
            let rhs = self.relational()?;
            let span = lhs.span.to(rhs.span);
            lhs = Expr::new(
                ExprKind::Compare3 {
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }
        Ok(lhs)
    }

    fn relational(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.range()?;
        loop {
            let op = match self.peek() {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Le => BinaryOp::Le,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::Ge => BinaryOp::Ge,
                TokenKind::Isa => {
                    self.advance();
                    let ty = self.type_ref()?;
                    let span = lhs.span.to(self.prev_span());
                    lhs = Expr::new(
                        ExprKind::TypeTest {
                            expr: Box::new(lhs),
                            ty,
                        },
                        span,
                    );
                    continue;
                }
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.range()?;
            lhs = self.binary(op, lhs, rhs);
        }
    }

    fn range(&mut self) -> ParseResult<Expr> {
        let lhs = self.additive()?;
        if self.eat(&TokenKind::DotDot) {
            let rhs = self.additive()?;
            return Ok(self.binary(BinaryOp::Range, lhs, rhs));
        }
        Ok(lhs)
    }

    fn additive(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                TokenKind::Amp => BinaryOp::Concat,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.multiplicative()?;
            lhs = self.binary(op, lhs, rhs);
        }
    }

    fn multiplicative(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Rem,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.unary()?;
            lhs = self.binary(op, lhs, rhs);
        }
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        let start = self.span();
        match self.peek() {
            TokenKind::Minus => {
                self.advance();
                let operand = self.unary()?;
                let span = start.to(operand.span);
                let folded = match &operand.kind {
                    ExprKind::Literal(Literal::Int(n)) => n.checked_neg().map(Literal::Int),
                    ExprKind::Literal(Literal::Long(n)) => n.checked_neg().map(Literal::Long),
                    ExprKind::Literal(Literal::Double(bits)) => {
                        Some(Literal::Double((-f64::from_bits(*bits)).to_bits()))
                    }
                    _ => None,
                };
                let kind = match folded {
                    Some(literal) => ExprKind::Literal(literal),
                    None => ExprKind::Unary {
                        op: UnaryOp::Neg,
                        operand: Box::new(operand),
                    },
                };
                Ok(Expr::new(kind, span))
            }
            TokenKind::Bang | TokenKind::Not => {
                self.advance();
                let operand = self.unary()?;
                let span = start.to(operand.span);
                Ok(Expr::new(
                    ExprKind::Unary {
                        op: UnaryOp::Not,
                        operand: Box::new(operand),
                    },
                    span,
                ))
            }
            TokenKind::LParen => match self.cast_prefix() {
                Some(ty) => {
                    let operand = self.unary()?;
                    let span = start.to(operand.span);
                    Ok(Expr::new(
                        ExprKind::Cast {
                            expr: Box::new(operand),
                            ty,
                        },
                        span,
                    ))
                }
                None => self.as_cast(),
            },
            _ => self.as_cast(),
        }
    }

    /// Consume `( Type )` when it is a cast, leaving the position untouched
    /// otherwise.
    fn cast_prefix(&mut self) -> Option<TypeRef> {
        let saved = self.pos;
        self.advance();
        let is_type_name = match self.peek() {
            TokenKind::Ident(name) => {
                Primitive::from_keyword(name).is_some() || self.classes.contains(name)
            }
            _ => false,
        };
        if is_type_name {
            if let Ok(ty) = self.type_ref() {
                if self.eat(&TokenKind::RParen) && self.peek().starts_operand() {
                    return Some(ty);
                }
            }
        }
        self.pos = saved;
        None
    }

    fn as_cast(&mut self) -> ParseResult<Expr> {
        let mut expr = self.postfix()?;
        while self.eat(&TokenKind::As) {
            let ty = self.type_ref()?;
            let span = expr.span.to(self.prev_span());
            expr = Expr::new(
                ExprKind::Cast {
                    expr: Box::new(expr),
                    ty,
                },
                span,
            );
        }
        Ok(expr)
    }

    fn postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                TokenKind::Dot | TokenKind::SafeDot => {
                    let null_safe = self.advance() == TokenKind::SafeDot;
                    let (name, _) = self.ident("member name")?;
                    let args = if self.at(&TokenKind::LParen) {
                        Some(self.arguments()?)
                    } else {
                        None
                    };
                    let span = expr.span.to(self.prev_span());
                    let target = Box::new(expr);
                    let kind = match args {
                        Some(args) => ExprKind::Call {
                            target: Some(target),
                            name,
                            args,
                            null_safe,
                        },
                        None => ExprKind::Property {
                            target,
                            name,
                            null_safe,
                        },
                    };
                    expr = Expr::new(kind, span);
                }
                TokenKind::LBracket | TokenKind::SafeIndex => {
                    let null_safe = self.advance() == TokenKind::SafeIndex;
                    let index = self.expr()?;
                    self.expect(TokenKind::RBracket)?;
                    let span = expr.span.to(self.prev_span());
                    expr = Expr::new(
                        ExprKind::Index {
                            target: Box::new(expr),
                            index: Box::new(index),
                            null_safe,
                        },
                        span,
                    );
                }
                _ => return Ok(expr),
            }
        }
    }

    fn arguments(&mut self) -> ParseResult<Vec<Expr>> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        if !self.at(&TokenKind::RParen) {
            loop {
                args.push(self.expr()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(args)
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        let start = self.span();
        let kind = match self.peek().clone() {
            TokenKind::Int(n) => {
                self.advance();
                ExprKind::Literal(Literal::Int(n))
            }
            TokenKind::Long(n) => {
                self.advance();
                ExprKind::Literal(Literal::Long(n))
            }
            TokenKind::Double(bits) => {
                self.advance();
                ExprKind::Literal(Literal::Double(bits))
            }
            TokenKind::Str(s) => {
                self.advance();
                ExprKind::Literal(Literal::Str(s))
            }
            TokenKind::True => {
                self.advance();
                ExprKind::Literal(Literal::Bool(true))
            }
            TokenKind::False => {
                self.advance();
                ExprKind::Literal(Literal::Bool(false))
            }
            TokenKind::Null => {
                self.advance();
                ExprKind::Literal(Literal::Null)
            }
            TokenKind::Ident(name) => {
                self.advance();
                if self.at(&TokenKind::LParen) {
                    ExprKind::Call {
                        target: None,
                        name,
                        args: self.arguments()?,
                        null_safe: false,
                    }
                } else {
                    ExprKind::Ident(name)
                }
            }
            TokenKind::Call => {
                self.advance();
                let (mut name, _) = self.ident("template name")?;
                while self.eat(&TokenKind::Slash) {
                    let (segment, _) = self.ident("template name")?;
                    name.push('/');
                    name.push_str(&segment);
                }
                let args = self.arguments()?;
                ExprKind::TemplateCall { name, args }
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.expr()?;
                self.expect(TokenKind::RParen)?;
                return Ok(Expr::new(inner.kind, start.to(self.prev_span())));
            }
            TokenKind::Hash => {
                self.advance();
                ExprKind::List(self.arguments()?)
            }
            TokenKind::HashHash => {
                self.advance();
                ExprKind::Set(self.arguments()?)
            }
            _ => return Err(self.error("expression")),
        };
        Ok(Expr::new(kind, start.to(self.prev_span())))
    }

    // ---- types ----

    pub fn type_ref(&mut self) -> ParseResult<TypeRef> {
        let (name, _) = self.ident("type name")?;
        let mut ty = match Primitive::from_keyword(&name) {
            Some(primitive) => TypeRef::Primitive(primitive),
            None => {
                let mut args = Vec::new();
                if self.eat(&TokenKind::Lt) {
                    loop {
                        args.push(self.type_arg()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(TokenKind::Gt)?;
                }
                TypeRef::Class { name, args }
            }
        };
        while self.at(&TokenKind::LBracket) && self.peek_nth(1) == &TokenKind::RBracket {
            self.advance();
            self.advance();
            ty = TypeRef::array(ty);
        }
        Ok(ty)
    }

    fn type_arg(&mut self) -> ParseResult<TypeArg> {
        if !self.eat(&TokenKind::Question) {
            return Ok(TypeArg::Exact(self.type_ref()?));
        }
        let bound = match self.peek() {
            TokenKind::Ident(word) if word == "extends" || word == "super" => word.clone(),
            _ => return Ok(TypeArg::Any),
        };
        self.advance();
        let ty = self.type_ref()?;
        Ok(if bound == "extends" {
            TypeArg::Extends(ty)
        } else {
            TypeArg::Super(ty)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> TemplateDecl {
        let classes = ClassTable::builtin();
        match parse("pages/test", src, &classes) {
            Ok(decl) => decl,
            Err(e) => panic!("parse failed: {e}"),
        }
    }

    fn parse_err(src: &str) -> ParseError {
        let classes = ClassTable::builtin();
        match parse("pages/test", src, &classes) {
            Ok(decl) => panic!("expected an error, got {decl:?}"),
            Err(e) => e,
        }
    }

    /// Compact s-expression rendering for snapshots.
    fn sexp(expr: &Expr) -> String {
        let list = |args: &[Expr]| args.iter().map(sexp).collect::<Vec<_>>().join(" ");
        match &expr.kind {
            ExprKind::Literal(Literal::Str(s)) => format!("{s:?}"),
            ExprKind::Literal(Literal::Double(bits)) => format!("{}", f64::from_bits(*bits)),
            ExprKind::Literal(Literal::Int(n)) => n.to_string(),
            ExprKind::Literal(Literal::Long(n)) => format!("{n}L"),
            ExprKind::Literal(Literal::Bool(b)) => b.to_string(),
            ExprKind::Literal(Literal::Null) => "null".into(),
            ExprKind::Ident(name) => name.clone(),
            ExprKind::Binary { op, lhs, rhs } => {
                format!("({} {} {})", op.symbol(), sexp(lhs), sexp(rhs))
            }
            ExprKind::Unary { op, operand } => format!("({op:?} {})", sexp(operand)),
            ExprKind::Call {
                target,
                name,
                args,
                null_safe,
            } => {
                let dot = if *null_safe { "?." } else { "." };
                match target {
                    Some(t) => format!("(call {}{dot}{name} {})", sexp(t), list(args)),
                    None => format!("(call {name} {})", list(args)),
                }
            }
            ExprKind::TemplateCall { name, args } => format!("(template {name} {})", list(args)),
            ExprKind::Property {
                target,
                name,
                null_safe,
            } => format!("({}{}{name})", sexp(target), if *null_safe { "?." } else { "." }),
            ExprKind::Index {
                target,
                index,
                null_safe,
            } => format!("(index{} {} {})", if *null_safe { "?" } else { "" }, sexp(target), sexp(index)),
            ExprKind::Ternary {
                cond,
                then,
                otherwise,
            } => format!("(? {} {} {})", sexp(cond), sexp(then), sexp(otherwise)),
            ExprKind::Elvis { lhs, rhs } => format!("(?: {} {})", sexp(lhs), sexp(rhs)),
            ExprKind::Coalesce { lhs, rhs } => format!("(?? {} {})", sexp(lhs), sexp(rhs)),
            ExprKind::List(items) => format!("(list {})", list(items)),
            ExprKind::Set(items) => format!("(set {})", list(items)),
            ExprKind::Cast { expr, ty } => format!("(cast {ty} {})", sexp(expr)),
            ExprKind::TypeTest { expr, ty } => format!("(isa {} {ty})", sexp(expr)),
            ExprKind::Compare3 { lhs, rhs } => format!("(<=> {} {})", sexp(lhs), sexp(rhs)),
        }
    }

    fn expr_of(src: &str) -> String {
        let decl = parse_ok(&format!("<% {src} %>"));
        match &decl.body[0].kind {
            StmtKind::Expr(expr) => sexp(expr),
            other => panic!("not an expression statement: {other:?}"),
        }
    }

    #[test]
    fn test_precedence() {
        insta::assert_snapshot!(expr_of("a or b and c == d <=> e < f + g * -h"), @"(or a (and b (== c (<=> d (< e (+ f (* g (Neg h))))))))");
        insta::assert_snapshot!(expr_of("x ? y : z ?: w"), @"(? x y (?: z w))");
        insta::assert_snapshot!(expr_of("1 .. n + 1"), @"(.. 1 (+ n 1))");
        insta::assert_snapshot!(expr_of("'a' & b + 1"), @r#"(+ (& "a" b) 1)"#);
        insta::assert_snapshot!(expr_of("x isa String and not y"), @"(and (isa x String) (Not y))");
    }

    #[test]
    fn test_postfix_and_null_safe_chains() {
        insta::assert_snapshot!(
            expr_of("f?.toString()?.length() == 0"),
            @"(== (call (call f?.toString )?.length ) 0)"
        );
        insta::assert_snapshot!(expr_of("a.b[1]?[2].c"), @"((index? (index (a.b) 1) 2).c)");
        insta::assert_snapshot!(expr_of("#(1, 2) ?? ##()"), @"(?? (list 1 2) (set ))");
        insta::assert_snapshot!(expr_of("call pages/header(title)"), @"(template pages/header title)");
    }

    #[test]
    fn test_cast_versus_parenthesized_expression() {
        insta::assert_snapshot!(expr_of("(String) x"), @"(cast String x)");
        insta::assert_snapshot!(expr_of("(int) 2.5"), @"(cast int 2.5)");
        insta::assert_snapshot!(expr_of("(List<String>) #()"), @"(cast List<String> (list ))");
        // `x` is not a type, and `(String) - 1` is a subtraction
        insta::assert_snapshot!(expr_of("(x) - 1"), @"(- x 1)");
        insta::assert_snapshot!(expr_of("(String) - 1"), @"(- String 1)");
        insta::assert_snapshot!(expr_of("y as Integer"), @"(cast Integer y)");
    }

    #[test]
    fn test_negative_literals_fold() {
        insta::assert_snapshot!(expr_of("-5"), @"-5");
        insta::assert_snapshot!(expr_of("-2.5"), @"-2.5");
    }

    #[test]
    fn test_header_and_statements() {
        let decl = parse_ok(
            "  <% template greet(String name, List<? extends Number> xs) %>\nHi <% name %>\n<% foreach (x in xs reverse) { x; } if (a) b else if (c) { d } else e; return %>",
        );
        assert_eq!(decl.name, "greet");
        let params: Vec<String> = decl
            .params
            .iter()
            .map(|p| format!("{} {}", p.ty, p.name))
            .collect();
        assert_eq!(params, ["String name", "List<? extends Number> xs"]);
        assert!(decl.header.is_some());

        let kinds: Vec<&str> = decl
            .body
            .iter()
            .map(|stmt| match &stmt.kind {
                StmtKind::Text(_) => "text",
                StmtKind::Expr(_) => "expr",
                StmtKind::Assign { .. } => "assign",
                StmtKind::If { .. } => "if",
                StmtKind::Foreach { .. } => "foreach",
                StmtKind::Return(_) => "return",
                StmtKind::Block(_) => "block",
            })
            .collect();
        assert_eq!(kinds, ["text", "expr", "text", "foreach", "if", "return"]);
        assert_eq!(decl.body[0].kind, StmtKind::Text("Hi ".into()));

        let StmtKind::Foreach { reverse, .. } = &decl.body[3].kind else {
            unreachable!()
        };
        assert!(*reverse);
        let StmtKind::If { otherwise, .. } = &decl.body[4].kind else {
            unreachable!()
        };
        let nested = &otherwise.as_ref().map(|b| &b.stmts[0].kind);
        assert!(matches!(nested, Some(StmtKind::If { otherwise: Some(_), .. })));
    }

    #[test]
    fn test_no_header_uses_source_name() {
        let decl = parse_ok("<% a = false; a ? 'true' : 'false' %>");
        assert_eq!(decl.name, "test");
        assert!(decl.params.is_empty());
        assert!(matches!(decl.body[0].kind, StmtKind::Assign { .. }));
        assert!(matches!(decl.body[1].kind, StmtKind::Expr(_)));
    }

    #[test]
    fn test_syntax_error_reports_expected_and_found() {
        let err = parse_err("<% foo(1, %>");
        insta::assert_snapshot!(err.to_string(), @"1:13: expected expression, found end of input");

        let err = parse_err("<% if x %>");
        insta::assert_snapshot!(err.to_string(), @"1:7: expected `(`, found identifier `x`");

        let err = parse_err("hello <% template late() %>");
        insta::assert_snapshot!(err.to_string(), @"1:10: expected statement, found `template`");
    }

    #[test]
    fn test_lex_errors_surface_through_parse() {
        let err = parse_err("<% 'open %>");
        assert!(matches!(err, ParseError::Lex(_)));
    }

    #[test]
    fn test_parse_header_stops_early() {
        let classes = ClassTable::builtin();
        // The body would not lex, but only the header is read.
        let header = parse_header("a/b", "<% template b(int n) %> <% 'broken", &classes);
        let header = header.map_err(|e| e.to_string());
        assert_eq!(
            header,
            Ok(TemplateHeader {
                name: "b".into(),
                params: vec![ParamDecl {
                    name: "n".into(),
                    ty: TypeRef::int(),
                    span: Span::new(14, 19, 1, 15),
                }],
            })
        );

        let header = parse_header("a/plain", "Just text", &classes).map_err(|e| e.to_string());
        assert_eq!(header.map(|h| (h.name, h.params.len())), Ok(("plain".into(), 0)));
    }
}
