//! Source text to tokens.
//!
//! A source starts in text mode: everything up to `<%` becomes a single
//! `Text` token, preserved verbatim. Inside `<% ... %>` the lexer produces
//! code tokens and skips whitespace and `//` / `/* */` comments. The stream
//! always ends with one `Eof` token.
//!
//! [`Lexer`] is an iterator, so tokens are produced lazily; it is `Clone`, so
//! a sequence can be restarted from any point.

use derive_more::{Display, Error};
use trellis_core::Span;

use crate::token::{Token, TokenKind};

#[derive(Clone, Debug, Display, PartialEq, Eq)]
pub enum LexErrorKind {
    #[display("unexpected character `{_0}`")]
    UnexpectedChar(char),
    #[display("unterminated string literal")]
    UnterminatedString,
    #[display("unterminated comment")]
    UnterminatedComment,
    #[display("invalid escape `\\{_0}`")]
    InvalidEscape(char),
    #[display("number literal `{_0}` is out of range")]
    NumberOutOfRange(String),
    #[display("`<%` inside template code")]
    NestedOpen,
}

#[derive(Clone, Debug, Display, Error, PartialEq, Eq)]
#[display("{}:{}: {kind}", span.line, span.column)]
pub struct LexError {
    #[error(not(source))]
    pub kind: LexErrorKind,
    pub span: Span,
}

impl LexError {
    pub fn line(&self) -> u32 {
        self.span.line
    }

    pub fn column(&self) -> u32 {
        self.span.column
    }

    pub fn message(&self) -> String {
        self.kind.to_string()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Mode {
    Text,
    Code,
}

#[derive(Clone, Debug)]
pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    line: u32,
    column: u32,
    mode: Mode,
    done: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            line: 1,
            column: 1,
            mode: Mode::Text,
            done: false,
        }
    }

    /// Lex the whole source.
    pub fn tokenize(src: &'a str) -> Result<Vec<Token>, LexError> {
        Lexer::new(src).collect()
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn bump_n(&mut self, n: usize) {
        for _ in 0..n {
            self.bump();
        }
    }

    fn mark(&self) -> (usize, u32, u32) {
        (self.pos, self.line, self.column)
    }

    fn span_from(&self, (start, line, column): (usize, u32, u32)) -> Span {
        Span::new(start, self.pos, line, column)
    }

    fn token(&self, kind: TokenKind, mark: (usize, u32, u32)) -> Token {
        Token {
            kind,
            lexeme: self.src[mark.0..self.pos].to_string(),
            span: self.span_from(mark),
        }
    }

    fn error(&self, kind: LexErrorKind, mark: (usize, u32, u32)) -> LexError {
        LexError {
            kind,
            span: self.span_from(mark),
        }
    }

    pub fn next_token(&mut self) -> Result<Token, LexError> {
        loop {
            if self.mode == Mode::Text {
                if self.rest().starts_with("<%") {
                    self.bump_n(2);
                    self.mode = Mode::Code;
                    continue;
                }
                let mark = self.mark();
                if self.rest().is_empty() {
                    return Ok(self.token(TokenKind::Eof, mark));
                }
                let len = self.rest().find("<%").unwrap_or(self.rest().len());
                let text = self.rest()[..len].to_string();
                while self.pos < mark.0 + len {
                    self.bump();
                }
                return Ok(self.token(TokenKind::Text(text), mark));
            }

            self.skip_trivia()?;
            if self.rest().starts_with("%>") {
                self.bump_n(2);
                self.mode = Mode::Text;
                continue;
            }
            return self.code_token();
        }
    }

    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match (self.peek(), self.peek_nth(1)) {
                (Some(c), _) if c.is_whitespace() => {
                    self.bump();
                }
                (Some('/'), Some('/')) => {
                    while let Some(c) = self.peek() {
                        if c == '\n' || self.rest().starts_with("%>") {
                            break;
                        }
                        self.bump();
                    }
                }
                (Some('/'), Some('*')) => {
                    let mark = self.mark();
                    self.bump_n(2);
                    loop {
                        if self.rest().starts_with("*/") {
                            self.bump_n(2);
                            break;
                        }
                        if self.bump().is_none() {
                            return Err(self.error(LexErrorKind::UnterminatedComment, mark));
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn code_token(&mut self) -> Result<Token, LexError> {
        let mark = self.mark();
        let Some(c) = self.peek() else {
            return Ok(self.token(TokenKind::Eof, mark));
        };

        if c.is_alphabetic() || c == '_' {
            while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
                self.bump();
            }
            let src = self.src;
            let word = &src[mark.0..self.pos];
            let kind = TokenKind::keyword(word).unwrap_or_else(|| TokenKind::Ident(word.to_string()));
            return Ok(self.token(kind, mark));
        }
        if c.is_ascii_digit() {
            return self.number(mark);
        }
        if c == '\'' || c == '"' {
            return self.string(c, mark);
        }
        if self.rest().starts_with("<%") {
            self.bump_n(2);
            return Err(self.error(LexErrorKind::NestedOpen, mark));
        }

        const OPERATORS: &[(&str, TokenKind)] = &[
            ("<=>", TokenKind::Compare3),
            ("?:", TokenKind::Elvis),
            ("?.", TokenKind::SafeDot),
            ("?[", TokenKind::SafeIndex),
            ("??", TokenKind::Coalesce),
            ("##", TokenKind::HashHash),
            ("&&", TokenKind::AndAnd),
            ("||", TokenKind::OrOr),
            ("==", TokenKind::EqEq),
            ("!=", TokenKind::NotEq),
            ("<=", TokenKind::Le),
            (">=", TokenKind::Ge),
            ("..", TokenKind::DotDot),
            ("?", TokenKind::Question),
            (":", TokenKind::Colon),
            ("#", TokenKind::Hash),
            ("+", TokenKind::Plus),
            ("-", TokenKind::Minus),
            ("*", TokenKind::Star),
            ("/", TokenKind::Slash),
            ("%", TokenKind::Percent),
            ("&", TokenKind::Amp),
            ("!", TokenKind::Bang),
            ("<", TokenKind::Lt),
            (">", TokenKind::Gt),
            ("=", TokenKind::Assign),
            ("(", TokenKind::LParen),
            (")", TokenKind::RParen),
            ("[", TokenKind::LBracket),
            ("]", TokenKind::RBracket),
            ("{", TokenKind::LBrace),
            ("}", TokenKind::RBrace),
            (",", TokenKind::Comma),
            (".", TokenKind::Dot),
            (";", TokenKind::Semi),
        ];
        for (text, kind) in OPERATORS {
            if self.rest().starts_with(text) {
                self.bump_n(text.len());
                return Ok(self.token(kind.clone(), mark));
            }
        }

        self.bump();
        Err(self.error(LexErrorKind::UnexpectedChar(c), mark))
    }

    fn number(&mut self, mark: (usize, u32, u32)) -> Result<Token, LexError> {
        let src = self.src;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        let mut is_double = false;
        if self.peek() == Some('.') && self.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) {
            is_double = true;
            self.bump();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        let digits = &src[mark.0..self.pos];
        let out_of_range = |lexer: &Self| {
            lexer.error(
                LexErrorKind::NumberOutOfRange(lexer.src[mark.0..lexer.pos].to_string()),
                mark,
            )
        };

        if is_double {
            let value: f64 = digits.parse().map_err(|_| out_of_range(self))?;
            return Ok(self.token(TokenKind::Double(value.to_bits()), mark));
        }
        if matches!(self.peek(), Some('L' | 'l')) {
            self.bump();
            let value: i64 = digits.parse().map_err(|_| out_of_range(self))?;
            return Ok(self.token(TokenKind::Long(value), mark));
        }
        let value: i32 = digits.parse().map_err(|_| out_of_range(self))?;
        Ok(self.token(TokenKind::Int(value), mark))
    }

    fn string(&mut self, quote: char, mark: (usize, u32, u32)) -> Result<Token, LexError> {
        self.bump();
        let mut value = String::new();
        loop {
            let Some(c) = self.bump() else {
                return Err(self.error(LexErrorKind::UnterminatedString, mark));
            };
            match c {
                c if c == quote => break,
                '\\' => {
                    let escape_mark = self.mark();
                    let escaped = self
                        .bump()
                        .ok_or_else(|| self.error(LexErrorKind::UnterminatedString, mark))?;
                    value.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '\\' => '\\',
                        '\'' => '\'',
                        '"' => '"',
                        other => {
                            return Err(self.error(LexErrorKind::InvalidEscape(other), escape_mark));
                        }
                    });
                }
                c => value.push(c),
            }
        }
        Ok(self.token(TokenKind::Str(value), mark))
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = self.next_token();
        if matches!(&result, Ok(token) if token.kind == TokenKind::Eof) || result.is_err() {
            self.done = true;
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(src: &str) -> String {
        Lexer::tokenize(src)
            .unwrap()
            .iter()
            .map(|t| format!("{}:{} {:?}", t.line(), t.column(), t.kind))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_text_and_code_tokens() {
        insta::assert_snapshot!(render("Hi <% name ?: 'you' %>!\n"), @r#"
        1:1 Text("Hi ")
        1:7 Ident("name")
        1:12 Elvis
        1:15 Str("you")
        1:23 Text("!\n")
        2:1 Eof
        "#);
    }

    #[test]
    fn test_operators_prefer_longest_match() {
        let kinds: Vec<TokenKind> = Lexer::tokenize("<% a<=>b ?. c?[0] ## #( x..y %>")
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Compare3,
                TokenKind::Ident("b".into()),
                TokenKind::SafeDot,
                TokenKind::Ident("c".into()),
                TokenKind::SafeIndex,
                TokenKind::Int(0),
                TokenKind::RBracket,
                TokenKind::HashHash,
                TokenKind::Hash,
                TokenKind::LParen,
                TokenKind::Ident("x".into()),
                TokenKind::DotDot,
                TokenKind::Ident("y".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numeric_literals() {
        let kinds: Vec<TokenKind> = Lexer::tokenize("<% 12 12L 1.5 1..3 %>")
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Int(12),
                TokenKind::Long(12),
                TokenKind::Double(1.5f64.to_bits()),
                TokenKind::Int(1),
                TokenKind::DotDot,
                TokenKind::Int(3),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_escapes_and_comments() {
        let tokens = Lexer::tokenize("<% /* c */ 'it\\'s' // tail\n \"a\\tb\" %>").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Str("it's".into()));
        assert_eq!(tokens[1].kind, TokenKind::Str("a\tb".into()));
        assert_eq!(tokens[1].line(), 2);
    }

    #[test]
    fn test_errors_carry_positions() {
        let err = Lexer::tokenize("<%\n  'open").unwrap_err();
        assert_eq!(err.kind, LexErrorKind::UnterminatedString);
        assert_eq!((err.line(), err.column()), (2, 3));

        let err = Lexer::tokenize("<% a @ b %>").unwrap_err();
        assert_eq!(err.to_string(), "1:6: unexpected character `@`");

        let err = Lexer::tokenize("<% 99999999999 %>").unwrap_err();
        assert_eq!(
            err.kind,
            LexErrorKind::NumberOutOfRange("99999999999".into())
        );
    }

    #[test]
    fn test_lexer_is_lazy_and_restartable() {
        let mut lexer = Lexer::new("a<% b %>c");
        let first = lexer.next().unwrap().unwrap();
        let restart = lexer.clone();
        let rest: Vec<_> = lexer.map(|t| t.unwrap().kind).collect();
        let again: Vec<_> = restart.map(|t| t.unwrap().kind).collect();
        assert_eq!(first.kind, TokenKind::Text("a".into()));
        assert_eq!(rest, again);
        assert_eq!(rest.last(), Some(&TokenKind::Eof));
    }
}
