//! The syntax front-end: tokenizer and parser for template files.
//!
//! Expressions are not interpreted by this crate; they are captured as
//! opaque text.  The parser's job is to expose the command structure the
//! autoescaper operates on.

mod lexer;
mod parser;

pub use self::lexer::{Token, Tokenizer};
pub use self::parser::parse_file;
