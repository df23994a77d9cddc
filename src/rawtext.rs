use crate::context::{AttrKind, Context, Delim, ElementKind, JsSlash, State, UriPart};
use crate::error::{Error, ErrorKind};

/// Advances a context across a run of literal template text.
///
/// This is the raw text "lexer" of the autoescaper: a deterministic
/// approximation of how a browser tokenizes the output stream, covering
/// the HTML, attribute, URI, CSS and JS sub-grammars.  It only needs to be
/// exact enough to pick the right escaper and to reject genuinely
/// ambiguous input; it makes no attempt to recover from malformed HTML.
pub fn process_raw_text(ctx: Context, text: &str) -> Result<Context, Error> {
    let mut scanner = Scanner { ctx, rest: text };
    while !scanner.rest.is_empty() {
        ok!(scanner.step());
    }
    Ok(scanner.ctx)
}

struct Scanner<'s> {
    ctx: Context,
    rest: &'s str,
}

fn is_tag_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == ':' || c == '-'
}

fn is_attr_name_char(c: char) -> bool {
    !c.is_ascii_whitespace() && !matches!(c, '=' | '>' | '/' | '"' | '\'')
}

fn is_js_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

/// Keywords after which a `/` starts a RegExp literal rather than dividing.
fn is_regex_preceder_keyword(word: &str) -> bool {
    matches!(
        word,
        "break"
            | "case"
            | "continue"
            | "delete"
            | "do"
            | "else"
            | "finally"
            | "in"
            | "instanceof"
            | "new"
            | "return"
            | "throw"
            | "try"
            | "typeof"
            | "void"
    )
}

impl<'s> Scanner<'s> {
    fn peek(&self) -> Option<char> {
        self.rest.chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = some!(self.peek());
        self.rest = &self.rest[c.len_utf8()..];
        Some(c)
    }

    fn eat(&mut self, n: usize) {
        self.rest = &self.rest[n..];
    }

    fn eat_while<F: Fn(char) -> bool>(&mut self, f: F) -> &'s str {
        let end = self
            .rest
            .char_indices()
            .find(|&(_, c)| !f(c))
            .map(|(idx, _)| idx)
            .unwrap_or(self.rest.len());
        let (skipped, rest) = self.rest.split_at(end);
        self.rest = rest;
        skipped
    }

    fn starts_with_ignore_case(&self, prefix: &str) -> bool {
        self.rest
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
    }

    /// Attribute delimiters close the value no matter what the embedded
    /// grammar thinks, which is how browsers tokenize.  Returns `true`
    /// when the current character terminated the attribute (or the whole
    /// tag).
    fn check_attr_delim(&mut self) -> bool {
        let c = match self.peek() {
            Some(c) => c,
            None => return false,
        };
        match self.ctx.delim {
            Delim::DoubleQuote if c == '"' => {
                self.bump();
                self.ctx = self.ctx.end_of_attr_context();
                true
            }
            Delim::SingleQuote if c == '\'' => {
                self.bump();
                self.ctx = self.ctx.end_of_attr_context();
                true
            }
            Delim::SpaceOrTagEnd if c.is_ascii_whitespace() => {
                self.bump();
                self.ctx = self.ctx.end_of_attr_context();
                true
            }
            Delim::SpaceOrTagEnd if c == '>' => {
                self.bump();
                self.ctx = tag_end_context(self.ctx.element);
                true
            }
            _ => false,
        }
    }

    fn step(&mut self) -> Result<(), Error> {
        match self.ctx.state {
            State::HtmlPcdata => self.step_pcdata(),
            State::HtmlRcdata => self.step_rcdata(),
            State::HtmlBeforeTagName => self.step_before_tag_name(),
            State::HtmlTagName => self.step_tag_name(),
            State::HtmlTag => self.step_tag(),
            State::HtmlAttrName => self.step_attr_name(),
            State::HtmlBeforeAttrValue => self.step_before_attr_value(),
            State::HtmlNormalAttrValue => self.step_normal_attr_value(),
            State::HtmlComment => self.step_html_comment(),
            State::Css => self.step_css(),
            State::CssComment => self.step_css_comment(),
            State::CssDqString | State::CssSqString => self.step_css_string(),
            State::CssUri | State::CssDqUri | State::CssSqUri => self.step_css_uri(),
            State::Js => self.step_js(),
            State::JsLineComment => self.step_js_line_comment(),
            State::JsBlockComment => self.step_js_block_comment(),
            State::JsDqString | State::JsSqString => self.step_js_string(),
            State::JsRegex => self.step_js_regex(),
            State::Uri => self.step_uri(),
            State::Text => {
                self.rest = "";
                Ok(())
            }
        }
    }

    fn step_pcdata(&mut self) -> Result<(), Error> {
        match self.rest.find('<') {
            None => self.rest = "",
            Some(idx) => {
                self.eat(idx);
                if self.rest.starts_with("<!--") {
                    self.eat(4);
                    self.ctx.state = State::HtmlComment;
                } else if self.rest.starts_with("</") {
                    let after = self.rest[2..].chars().next();
                    if after.is_some_and(|c| c.is_ascii_alphabetic()) {
                        self.eat(2);
                        self.eat_while(is_tag_name_char);
                        // close tags never re-enter special content
                        self.ctx.element = ElementKind::Normal;
                        self.ctx.state = State::HtmlTagName;
                    } else if after.is_none() {
                        self.eat(2);
                        self.ctx.element = ElementKind::Normal;
                        self.ctx.state = State::HtmlBeforeTagName;
                    } else {
                        self.eat(1);
                    }
                } else {
                    let after = self.rest[1..].chars().next();
                    if after.is_some_and(|c| c.is_ascii_alphabetic()) {
                        self.eat(1);
                        let name = self.eat_while(is_tag_name_char);
                        self.ctx.element = ElementKind::for_tag_name(name);
                        self.ctx.state = State::HtmlTagName;
                    } else if after.is_none() {
                        self.eat(1);
                        self.ctx.element = ElementKind::Normal;
                        self.ctx.state = State::HtmlBeforeTagName;
                    } else {
                        // a lone `<` that does not open a tag
                        self.eat(1);
                    }
                }
            }
        }
        Ok(())
    }

    fn step_rcdata(&mut self) -> Result<(), Error> {
        let close = format!("</{}", self.ctx.element.rcdata_tag_name());
        loop {
            let idx = match self.rest.find('<') {
                None => {
                    self.rest = "";
                    return Ok(());
                }
                Some(idx) => idx,
            };
            self.eat(idx);
            if self.starts_with_ignore_case(&close)
                && !self.rest[close.len()..]
                    .chars()
                    .next()
                    .is_some_and(is_tag_name_char)
            {
                self.eat(close.len());
                self.ctx.element = ElementKind::Normal;
                self.ctx.state = State::HtmlTagName;
                return Ok(());
            }
            self.eat(1);
        }
    }

    fn step_before_tag_name(&mut self) -> Result<(), Error> {
        if self.rest.starts_with('/') {
            self.eat(1);
            self.eat_while(is_tag_name_char);
            self.ctx.element = ElementKind::Normal;
            self.ctx.state = State::HtmlTagName;
        } else if self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
            let name = self.eat_while(is_tag_name_char);
            self.ctx.element = ElementKind::for_tag_name(name);
            self.ctx.state = State::HtmlTagName;
        } else {
            // not a tag after all
            self.ctx.state = State::HtmlPcdata;
        }
        Ok(())
    }

    fn step_tag_name(&mut self) -> Result<(), Error> {
        self.eat_while(is_tag_name_char);
        match self.peek() {
            None => {}
            Some(c) if c.is_ascii_whitespace() => {
                self.bump();
                self.ctx.state = State::HtmlTag;
            }
            Some('>') => {
                self.bump();
                self.ctx = tag_end_context(self.ctx.element);
            }
            Some(_) => {
                // `/>` and stray characters are handled by the tag state
                self.ctx.state = State::HtmlTag;
            }
        }
        Ok(())
    }

    fn step_tag(&mut self) -> Result<(), Error> {
        self.eat_while(|c| c.is_ascii_whitespace());
        match self.peek() {
            None => {}
            Some('>') => {
                self.bump();
                self.ctx = tag_end_context(self.ctx.element);
            }
            Some('/') => {
                self.bump();
                if self.peek() == Some('>') {
                    self.bump();
                    self.ctx = Context {
                        state: State::HtmlPcdata,
                        ..Context::default()
                    };
                }
            }
            Some(_) => {
                let name = self.eat_while(is_attr_name_char);
                if name.is_empty() {
                    // quotes and equals signs outside a value; skip
                    self.bump();
                } else {
                    self.ctx.attr = AttrKind::for_attr_name(name);
                    self.ctx.state = State::HtmlAttrName;
                }
            }
        }
        Ok(())
    }

    fn step_attr_name(&mut self) -> Result<(), Error> {
        self.eat_while(is_attr_name_char);
        match self.peek() {
            None => {}
            Some('=') => {
                self.bump();
                self.ctx.state = State::HtmlBeforeAttrValue;
            }
            Some('>') => {
                self.bump();
                self.ctx = tag_end_context(self.ctx.element);
            }
            Some(_) => {
                // valueless attribute
                self.bump();
                self.ctx.attr = AttrKind::None;
                self.ctx.state = State::HtmlTag;
            }
        }
        Ok(())
    }

    fn step_before_attr_value(&mut self) -> Result<(), Error> {
        self.eat_while(|c| c.is_ascii_whitespace());
        match self.peek() {
            None => {}
            Some('"') => {
                self.bump();
                self.ctx = self.ctx.attr_value_context(Delim::DoubleQuote);
            }
            Some('\'') => {
                self.bump();
                self.ctx = self.ctx.attr_value_context(Delim::SingleQuote);
            }
            Some('>') => {
                self.bump();
                self.ctx = tag_end_context(self.ctx.element);
            }
            Some(_) => {
                self.ctx = self.ctx.attr_value_context(Delim::SpaceOrTagEnd);
            }
        }
        Ok(())
    }

    fn step_normal_attr_value(&mut self) -> Result<(), Error> {
        if !self.check_attr_delim() {
            self.bump();
        }
        Ok(())
    }

    fn step_html_comment(&mut self) -> Result<(), Error> {
        match self.rest.find("-->") {
            None => self.rest = "",
            Some(idx) => {
                self.eat(idx + 3);
                self.ctx.state = State::HtmlPcdata;
            }
        }
        Ok(())
    }

    fn step_css(&mut self) -> Result<(), Error> {
        if self.check_attr_delim() {
            return Ok(());
        }
        if self.rest.starts_with("/*") {
            self.eat(2);
            self.ctx.state = State::CssComment;
        } else if self.rest.starts_with('"') {
            self.eat(1);
            self.ctx.state = State::CssDqString;
        } else if self.rest.starts_with('\'') {
            self.eat(1);
            self.ctx.state = State::CssSqString;
        } else if self.starts_with_ignore_case("url(") {
            self.eat(4);
            self.eat_while(|c| c.is_ascii_whitespace());
            self.ctx.uri_part = UriPart::Start;
            match self.peek() {
                Some('"') => {
                    self.bump();
                    self.ctx.state = State::CssDqUri;
                }
                Some('\'') => {
                    self.bump();
                    self.ctx.state = State::CssSqUri;
                }
                _ => self.ctx.state = State::CssUri,
            }
        } else if self.ctx.delim == Delim::None && self.starts_with_ignore_case("</style") {
            self.eat(7);
            self.ctx = Context {
                state: State::HtmlTagName,
                ..Context::default()
            };
        } else {
            self.bump();
        }
        Ok(())
    }

    fn step_css_comment(&mut self) -> Result<(), Error> {
        if self.check_attr_delim() {
            return Ok(());
        }
        match self.rest.find("*/") {
            None => self.rest = "",
            Some(idx) => {
                self.eat(idx + 2);
                self.ctx.state = State::Css;
            }
        }
        Ok(())
    }

    fn step_css_string(&mut self) -> Result<(), Error> {
        if self.check_attr_delim() {
            return Ok(());
        }
        let quote = if self.ctx.state == State::CssDqString {
            '"'
        } else {
            '\''
        };
        match self.bump() {
            Some('\\') => {
                self.bump();
            }
            Some(c) if c == quote => self.ctx.state = State::Css,
            _ => {}
        }
        Ok(())
    }

    fn step_css_uri(&mut self) -> Result<(), Error> {
        if self.check_attr_delim() {
            return Ok(());
        }
        let c = match self.bump() {
            Some(c) => c,
            None => return Ok(()),
        };
        let done = match self.ctx.state {
            State::CssDqUri => c == '"',
            State::CssSqUri => c == '\'',
            _ => c == ')' || c.is_ascii_whitespace(),
        };
        if done {
            self.ctx.state = State::Css;
            self.ctx.uri_part = UriPart::None;
        } else {
            self.ctx.uri_part = self.ctx.uri_part.after_char(c);
        }
        Ok(())
    }

    fn step_js(&mut self) -> Result<(), Error> {
        if self.check_attr_delim() {
            return Ok(());
        }
        if self.rest.starts_with("//") {
            self.eat(2);
            self.ctx.state = State::JsLineComment;
            return Ok(());
        }
        if self.rest.starts_with("/*") {
            self.eat(2);
            self.ctx.state = State::JsBlockComment;
            return Ok(());
        }
        if self.ctx.delim == Delim::None && self.starts_with_ignore_case("</script") {
            self.eat(8);
            self.ctx = Context {
                state: State::HtmlTagName,
                ..Context::default()
            };
            return Ok(());
        }
        let c = match self.peek() {
            Some(c) => c,
            None => return Ok(()),
        };
        match c {
            '"' => {
                self.bump();
                self.ctx.state = State::JsDqString;
                self.ctx.slash = JsSlash::None;
            }
            '\'' => {
                self.bump();
                self.ctx.state = State::JsSqString;
                self.ctx.slash = JsSlash::None;
            }
            '/' => match self.ctx.slash {
                JsSlash::DivOp => {
                    self.bump();
                    // after a division operator an operand follows, where a
                    // slash would begin a RegExp
                    self.ctx.slash = JsSlash::Regex;
                }
                JsSlash::Unknown => {
                    return Err(Error::new(
                        ErrorKind::AmbiguousJsSlash,
                        format!(
                            "Slash (/) cannot follow the preceding branches since it is unclear \
                             whether the slash is a RegExp literal or division operator.  Please \
                             add parentheses in the branches leading to `{}`",
                            snippet(self.rest)
                        ),
                    ));
                }
                JsSlash::Regex | JsSlash::None => {
                    self.bump();
                    self.ctx.state = State::JsRegex;
                }
            },
            c if is_js_word_char(c) => {
                let word = self.eat_while(is_js_word_char);
                self.ctx.slash = if is_regex_preceder_keyword(word) {
                    JsSlash::Regex
                } else {
                    JsSlash::DivOp
                };
            }
            ')' | ']' => {
                self.bump();
                self.ctx.slash = JsSlash::DivOp;
            }
            c if c.is_ascii_whitespace() => {
                self.bump();
            }
            _ => {
                self.bump();
                self.ctx.slash = JsSlash::Regex;
            }
        }
        Ok(())
    }

    fn step_js_line_comment(&mut self) -> Result<(), Error> {
        if self.check_attr_delim() {
            return Ok(());
        }
        match self.bump() {
            Some('\n') | Some('\r') | Some('\u{2028}') | Some('\u{2029}') => {
                self.ctx.state = State::Js;
            }
            _ => {}
        }
        Ok(())
    }

    fn step_js_block_comment(&mut self) -> Result<(), Error> {
        if self.check_attr_delim() {
            return Ok(());
        }
        if self.rest.starts_with("*/") {
            self.eat(2);
            self.ctx.state = State::Js;
        } else {
            self.bump();
        }
        Ok(())
    }

    fn step_js_string(&mut self) -> Result<(), Error> {
        if self.check_attr_delim() {
            return Ok(());
        }
        let quote = if self.ctx.state == State::JsDqString {
            '"'
        } else {
            '\''
        };
        match self.bump() {
            Some('\\') => {
                self.bump();
            }
            Some(c) if c == quote => {
                self.ctx.state = State::Js;
                // a slash after a string literal divides
                self.ctx.slash = JsSlash::DivOp;
            }
            _ => {}
        }
        Ok(())
    }

    fn step_js_regex(&mut self) -> Result<(), Error> {
        let mut in_charset = false;
        loop {
            if self.check_attr_delim() {
                return Ok(());
            }
            let c = match self.bump() {
                Some(c) => c,
                None => return Ok(()),
            };
            match c {
                '\\' => {
                    self.bump();
                }
                '[' => in_charset = true,
                ']' => in_charset = false,
                '/' if !in_charset => {
                    self.ctx.state = State::Js;
                    self.ctx.slash = JsSlash::DivOp;
                    return Ok(());
                }
                _ => {}
            }
        }
    }

    fn step_uri(&mut self) -> Result<(), Error> {
        if self.check_attr_delim() {
            return Ok(());
        }
        if let Some(c) = self.bump() {
            self.ctx.uri_part = self.ctx.uri_part.after_char(c);
        }
        Ok(())
    }
}

fn tag_end_context(element: ElementKind) -> Context {
    match element {
        ElementKind::Script => Context {
            state: State::Js,
            slash: JsSlash::Regex,
            ..Context::default()
        },
        ElementKind::Style => Context {
            state: State::Css,
            ..Context::default()
        },
        ElementKind::Textarea | ElementKind::Title | ElementKind::Listing | ElementKind::Xmp => {
            Context {
                state: State::HtmlRcdata,
                element,
                ..Context::default()
            }
        }
        ElementKind::Normal | ElementKind::Void => Context {
            state: State::HtmlPcdata,
            ..Context::default()
        },
    }
}

fn snippet(rest: &str) -> &str {
    let max = 40;
    match rest.char_indices().nth(max) {
        Some((idx, _)) => &rest[..idx],
        None => rest,
    }
}
