use crate::ast::Span;
use crate::error::{Error, ErrorKind};

/// A token of template source.
#[derive(Debug)]
pub enum Token<'s> {
    /// Literal template data between commands, before line joining.
    RawText(&'s str),
    /// The inside of a `{...}` command, braces stripped.
    Command(&'s str),
    /// The verbatim content of a `{literal}...{/literal}` region.
    Literal(&'s str),
}

/// Tokenizes template source into raw text runs and commands.
///
/// Every `{` starts a command (literal braces are written `{lb}`/`{rb}`),
/// so tokenization only has to find the matching close brace, skipping
/// quoted strings inside command text.
pub struct Tokenizer<'s> {
    rest: &'s str,
    failed: bool,
    current_line: u32,
    current_col: u32,
}

impl<'s> Tokenizer<'s> {
    pub fn new(source: &'s str) -> Tokenizer<'s> {
        Tokenizer {
            rest: source,
            failed: false,
            current_line: 1,
            current_col: 0,
        }
    }

    /// Produces the next token or `None` at the end of input.
    pub fn next_token(&mut self) -> Result<Option<(Token<'s>, Span)>, Error> {
        if self.rest.is_empty() || self.failed {
            return Ok(None);
        }
        let (start_line, start_col) = (self.current_line, self.current_col);
        if self.rest.starts_with('{') {
            match self.tokenize_command() {
                Ok(token) => Ok(Some((token, self.span(start_line, start_col)))),
                Err(err) => {
                    self.failed = true;
                    Err(err)
                }
            }
        } else {
            let end = self.rest.find('{').unwrap_or(self.rest.len());
            let text = self.advance(end);
            Ok(Some((Token::RawText(text), self.span(start_line, start_col))))
        }
    }

    fn tokenize_command(&mut self) -> Result<Token<'s>, Error> {
        let inner_len = match find_command_end(&self.rest[1..]) {
            Some(len) => len,
            None => {
                return Err(Error::new(
                    ErrorKind::SyntaxError,
                    "unclosed command: expected `}`",
                ))
            }
        };
        self.advance(1);
        let inner = self.advance(inner_len);
        self.advance(1);
        if inner.trim() == "literal" {
            const CLOSE: &str = "{/literal}";
            let end = match self.rest.find(CLOSE) {
                Some(end) => end,
                None => {
                    return Err(Error::new(
                        ErrorKind::SyntaxError,
                        "unclosed {literal} block",
                    ))
                }
            };
            let content = self.advance(end);
            self.advance(CLOSE.len());
            Ok(Token::Literal(content))
        } else {
            Ok(Token::Command(inner))
        }
    }

    fn advance(&mut self, bytes: usize) -> &'s str {
        let (skipped, rest) = self.rest.split_at(bytes);
        for c in skipped.chars() {
            match c {
                '\n' => {
                    self.current_line += 1;
                    self.current_col = 0;
                }
                _ => self.current_col += 1,
            }
        }
        self.rest = rest;
        skipped
    }

    fn span(&self, start_line: u32, start_col: u32) -> Span {
        Span {
            start_line,
            start_col,
            end_line: self.current_line,
            end_col: self.current_col,
        }
    }
}

/// Finds the length of command text up to the closing brace, skipping
/// quoted strings.
fn find_command_end(text: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (idx, c) in text.char_indices() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '"' | '\'' => quote = Some(c),
                '}' => return Some(idx),
                _ => {}
            },
        }
    }
    None
}
