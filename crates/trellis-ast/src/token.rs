use std::fmt;

use trellis_core::Span;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Literal output outside `<% %>`.
    Text(String),
    Ident(String),
    Int(i32),
    Long(i64),
    /// IEEE-754 bits.
    Double(u64),
    Str(String),

    // Keywords
    Template,
    If,
    Else,
    Foreach,
    In,
    Reverse,
    Return,
    Call,
    True,
    False,
    Null,
    And,
    Or,
    Not,
    Isa,
    As,

    // Operators
    Question,  // ?
    Colon,     // :
    Elvis,     // ?:
    SafeDot,   // ?.
    SafeIndex, // ?[
    Coalesce,  // ??
    Compare3,  // <=>
    Hash,      // #
    HashHash,  // ##
    Plus,      // +
    Minus,     // -
    Star,      // *
    Slash,     // /
    Percent,   // %
    Amp,       // &
    AndAnd,    // &&
    OrOr,      // ||
    Bang,      // !
    EqEq,      // ==
    NotEq,     // !=
    Lt,        // <
    Le,        // <=
    Gt,        // >
    Ge,        // >=
    Assign,    // =
    DotDot,    // ..

    // Punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Semi,

    Eof,
}

/// Coarse classification of a token.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TokenCategory {
    Text,
    Identifier,
    Literal,
    Keyword,
    Operator,
    Punctuation,
    End,
}

impl TokenKind {
    pub fn keyword(word: &str) -> Option<TokenKind> {
        Some(match word {
            "template" => TokenKind::Template,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "foreach" => TokenKind::Foreach,
            "in" => TokenKind::In,
            "reverse" => TokenKind::Reverse,
            "return" => TokenKind::Return,
            "call" => TokenKind::Call,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "null" => TokenKind::Null,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            "isa" => TokenKind::Isa,
            "as" => TokenKind::As,
            _ => return None,
        })
    }

    pub fn category(&self) -> TokenCategory {
        use TokenKind::*;
        match self {
            Text(_) => TokenCategory::Text,
            Ident(_) => TokenCategory::Identifier,
            Int(_) | Long(_) | Double(_) | Str(_) | True | False | Null => TokenCategory::Literal,
            Template | If | Else | Foreach | In | Reverse | Return | Call | And | Or | Not
            | Isa | As => TokenCategory::Keyword,
            LParen | RParen | LBracket | RBracket | LBrace | RBrace | Comma | Dot | Semi => {
                TokenCategory::Punctuation
            }
            Eof => TokenCategory::End,
            _ => TokenCategory::Operator,
        }
    }

    /// Whether this token can start an operand (used to tell casts from
    /// parenthesized expressions).
    pub fn starts_operand(&self) -> bool {
        matches!(
            self,
            TokenKind::Ident(_)
                | TokenKind::Int(_)
                | TokenKind::Long(_)
                | TokenKind::Double(_)
                | TokenKind::Str(_)
                | TokenKind::True
                | TokenKind::False
                | TokenKind::Null
                | TokenKind::LParen
                | TokenKind::Hash
                | TokenKind::HashHash
                | TokenKind::Bang
                | TokenKind::Not
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use TokenKind::*;
        let fixed = match self {
            Text(_) => return f.write_str("template text"),
            Ident(name) => return write!(f, "identifier `{name}`"),
            Int(n) => return write!(f, "`{n}`"),
            Long(n) => return write!(f, "`{n}L`"),
            Double(bits) => return write!(f, "`{}`", f64::from_bits(*bits)),
            Str(_) => return f.write_str("string literal"),
            Eof => return f.write_str("end of input"),
            Template => "template",
            If => "if",
            Else => "else",
            Foreach => "foreach",
            In => "in",
            Reverse => "reverse",
            Return => "return",
            Call => "call",
            True => "true",
            False => "false",
            Null => "null",
            And => "and",
            Or => "or",
            Not => "not",
            Isa => "isa",
            As => "as",
            Question => "?",
            Colon => ":",
            Elvis => "?:",
            SafeDot => "?.",
            SafeIndex => "?[",
            Coalesce => "??",
            Compare3 => "<=>",
            Hash => "#",
            HashHash => "##",
            Plus => "+",
            Minus => "-",
            Star => "*",
            Slash => "/",
            Percent => "%",
            Amp => "&",
            AndAnd => "&&",
            OrOr => "||",
            Bang => "!",
            EqEq => "==",
            NotEq => "!=",
            Lt => "<",
            Le => "<=",
            Gt => ">",
            Ge => ">=",
            Assign => "=",
            DotDot => "..",
            LParen => "(",
            RParen => ")",
            LBracket => "[",
            RBracket => "]",
            LBrace => "{",
            RBrace => "}",
            Comma => ",",
            Dot => ".",
            Semi => ";",
        };
        write!(f, "`{fixed}`")
    }
}

/// A token with its source text and position.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub span: Span,
}

impl Token {
    pub fn line(&self) -> u32 {
        self.span.line
    }

    pub fn column(&self) -> u32 {
        self.span.column
    }
}
