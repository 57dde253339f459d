//! Front end of the Trellis compiler: tokens, lexer, syntax tree and parser.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod query;
pub mod token;

pub use ast::*;
pub use lexer::{LexError, LexErrorKind, Lexer};
pub use parser::{ParseError, Parser, SyntaxError, default_name, parse, parse_header};
pub use query::{find_template, parse_template, template_header};
pub use token::{Token, TokenCategory, TokenKind};
