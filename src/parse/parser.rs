use crate::ast::{
    AutoescapeMode, BlockValue, CallNode, CommandText, ContentKind, DirectiveCall, ForNode,
    ForeachNode, IfArm, IfNode, LetNode, MsgNode, Node, NodeId, ParamNode, Print, RawText, SoyFile,
    Span, Spanned, SpecialChar, SwitchCase, SwitchNode, Template,
};
use crate::error::{attach_basic_debug_info, Error, ErrorKind};
use crate::parse::lexer::{Token, Tokenizer};

macro_rules! syntax_error {
    ($msg:expr) => {{
        return Err(Error::new(ErrorKind::SyntaxError, $msg));
    }};
    ($msg:expr, $($tt:tt)*) => {{
        return Err(Error::new(ErrorKind::SyntaxError, format!($msg, $($tt)*)));
    }};
}

/// Parses one template file.
pub fn parse_file(source: &str, path: &str) -> Result<SoyFile, Error> {
    let mut parser = Parser {
        tokenizer: Tokenizer::new(source),
        path,
        last_span: Span::default(),
    };
    let rv = parser.parse_file_inner(source).map_err(|mut err| {
        if !err.has_location() {
            err.set_filename_and_span(path, parser.last_span);
        }
        err
    });
    attach_basic_debug_info(rv, source)
}

struct Parser<'s> {
    tokenizer: Tokenizer<'s>,
    path: &'s str,
    last_span: Span,
}

impl<'s> Parser<'s> {
    fn next(&mut self) -> Result<Option<(Token<'s>, Span)>, Error> {
        let rv = ok!(self.tokenizer.next_token());
        if let Some((_, span)) = rv {
            self.last_span = span;
        }
        Ok(rv)
    }

    fn parse_file_inner(&mut self, source: &str) -> Result<SoyFile, Error> {
        let mut file = SoyFile {
            path: self.path.to_string(),
            source: source.to_string(),
            delpackage: None,
            namespace: None,
            default_autoescape: None,
            templates: Vec::new(),
        };
        while let Some((token, span)) = ok!(self.next()) {
            let text = match token {
                // anything outside a template (including doc comments) is
                // insignificant
                Token::RawText(_) => continue,
                Token::Literal(_) => syntax_error!("{{literal}} outside of template"),
                Token::Command(text) => text.trim(),
            };
            let (word, rest) = split_word(text);
            match word {
                "delpackage" => file.delpackage = Some(rest.to_string()),
                "namespace" => {
                    let (bare, pairs) = ok!(parse_attrs(rest));
                    file.namespace = bare.first().map(|name| name.to_string());
                    for (key, value) in pairs {
                        if key == "autoescape" {
                            file.default_autoescape =
                                Some(ok!(expect_autoescape_mode(value)));
                        }
                    }
                }
                "template" | "deltemplate" => {
                    let template =
                        ok!(self.parse_template(rest, word == "deltemplate", span, &file));
                    file.templates.push(template);
                }
                other => syntax_error!("unexpected command {{{other}}} outside of template"),
            }
        }
        Ok(file)
    }

    fn parse_template(
        &mut self,
        header: &str,
        delegate: bool,
        span: Span,
        file: &SoyFile,
    ) -> Result<Template, Error> {
        let (bare, pairs) = ok!(parse_attrs(header));
        let mut name = bare.first().map(|name| name.to_string());
        let mut autoescape = None;
        let mut kind = None;
        let mut private = false;
        for (key, value) in pairs {
            match key {
                "name" => name = Some(value.to_string()),
                "autoescape" => autoescape = Some(ok!(expect_autoescape_mode(value))),
                "kind" => kind = Some(ok!(expect_content_kind(value))),
                "private" => private = value == "true",
                _ => {}
            }
        }
        let name = match name {
            Some(name) => name,
            None => syntax_error!("template is missing a name"),
        };
        let explicit_autoescape = autoescape.is_some();
        let autoescape = autoescape
            .or(file.default_autoescape)
            .unwrap_or(AutoescapeMode::Strict);
        let end_tag = if delegate { "/deltemplate" } else { "/template" };
        let (body, _) = ok!(self.parse_body(&[end_tag]));
        Ok(Template {
            name,
            delegate,
            autoescape,
            explicit_autoescape,
            kind,
            private,
            body,
            span,
            derived: false,
        })
    }

    /// Parses body nodes until one of the terminator commands is seen.
    /// Returns the nodes and the full text of the terminating command.
    fn parse_body(&mut self, terminators: &[&str]) -> Result<(Vec<Node>, String), Error> {
        let mut nodes = Vec::new();
        loop {
            let (token, span) = match ok!(self.next()) {
                Some(rv) => rv,
                None => syntax_error!(
                    "unexpected end of input, expected {{{}}}",
                    terminators.join("} or {")
                ),
            };
            match token {
                Token::RawText(text) => {
                    let joined = join_lines(text);
                    if !joined.is_empty() {
                        nodes.push(Node::RawText(Spanned::new(RawText { text: joined }, span)));
                    }
                }
                Token::Literal(text) => nodes.push(Node::Literal(Spanned::new(
                    RawText {
                        text: text.to_string(),
                    },
                    span,
                ))),
                Token::Command(text) => {
                    let trimmed = text.trim();
                    let (word, rest) = split_word(trimmed);
                    if terminators.contains(&word) {
                        return Ok((nodes, trimmed.to_string()));
                    }
                    nodes.push(ok!(self.parse_command(word, rest, trimmed, span)));
                }
            }
        }
    }

    fn parse_command(
        &mut self,
        word: &str,
        rest: &str,
        full: &str,
        span: Span,
    ) -> Result<Node, Error> {
        Ok(match word {
            "if" => ok!(self.parse_if(rest, span)),
            "switch" => ok!(self.parse_switch(rest, span)),
            "for" => ok!(self.parse_for(rest, span)),
            "foreach" => ok!(self.parse_foreach(rest, span)),
            "let" => ok!(self.parse_let(rest, span)),
            "call" => ok!(self.parse_call(rest, false, span)),
            "delcall" => ok!(self.parse_call(rest, true, span)),
            "msg" => ok!(self.parse_msg(rest, span)),
            "css" => Node::Css(Spanned::new(
                CommandText {
                    text: rest.to_string(),
                },
                span,
            )),
            "xid" => Node::Xid(Spanned::new(
                CommandText {
                    text: rest.to_string(),
                },
                span,
            )),
            "sp" => special(SpecialChar::Sp, span),
            "nil" => special(SpecialChar::Nil, span),
            "lb" => special(SpecialChar::Lb, span),
            "rb" => special(SpecialChar::Rb, span),
            "\\n" => special(SpecialChar::Newline, span),
            "\\r" => special(SpecialChar::CarriageReturn, span),
            "\\t" => special(SpecialChar::Tab, span),
            "print" => make_print(rest, true, span),
            "param" => syntax_error!("{{param}} is only allowed inside {{call}}"),
            word if word.starts_with('/') => {
                syntax_error!("unexpected closing command {{{word}}}")
            }
            word if word.starts_with('$') => make_print(full, false, span),
            other => syntax_error!("unknown command {{{other}}}"),
        })
    }

    fn parse_if(&mut self, cond: &str, span: Span) -> Result<Node, Error> {
        let mut arms = Vec::new();
        let mut pending = Some(cond.to_string());
        loop {
            let (body, term) = ok!(self.parse_body(&["elseif", "else", "/if"]));
            arms.push(IfArm {
                cond: pending,
                body,
            });
            let (word, rest) = split_word(&term);
            if word == "elseif" {
                pending = Some(rest.to_string());
            } else if word == "else" {
                let (body, _) = ok!(self.parse_body(&["/if"]));
                arms.push(IfArm { cond: None, body });
                break;
            } else {
                break;
            }
        }
        Ok(Node::If(Spanned::new(IfNode { arms }, span)))
    }

    fn parse_switch(&mut self, expr: &str, span: Span) -> Result<Node, Error> {
        let (pre, mut term) = ok!(self.parse_body(&["case", "default", "/switch"]));
        if !pre.is_empty() {
            syntax_error!("unexpected content before the first {{case}}");
        }
        let mut cases = Vec::new();
        let mut default = None;
        loop {
            let (word, rest) = split_word(&term);
            match word {
                "case" => {
                    let (body, next_term) =
                        ok!(self.parse_body(&["case", "default", "/switch"]));
                    cases.push(SwitchCase {
                        expr: rest.to_string(),
                        body,
                    });
                    term = next_term;
                }
                "default" => {
                    let (body, _) = ok!(self.parse_body(&["/switch"]));
                    default = Some(body);
                    break;
                }
                _ => break,
            }
        }
        Ok(Node::Switch(Spanned::new(
            SwitchNode {
                expr: expr.to_string(),
                cases,
                default,
            },
            span,
        )))
    }

    fn parse_for(&mut self, clause: &str, span: Span) -> Result<Node, Error> {
        let (var, range) = ok!(split_loop_clause(clause));
        let (body, _) = ok!(self.parse_body(&["/for"]));
        Ok(Node::For(Spanned::new(
            ForNode {
                var,
                range,
                body,
            },
            span,
        )))
    }

    fn parse_foreach(&mut self, clause: &str, span: Span) -> Result<Node, Error> {
        let (var, list) = ok!(split_loop_clause(clause));
        let (body, term) = ok!(self.parse_body(&["ifempty", "/foreach"]));
        let ifempty = if term == "ifempty" {
            let (body, _) = ok!(self.parse_body(&["/foreach"]));
            Some(body)
        } else {
            None
        };
        Ok(Node::Foreach(Spanned::new(
            ForeachNode {
                var,
                list,
                body,
                ifempty,
            },
            span,
        )))
    }

    fn parse_let(&mut self, rest: &str, span: Span) -> Result<Node, Error> {
        let rest = rest.trim();
        if let Some(inner) = rest.strip_suffix('/') {
            let inner = inner.trim();
            let (var, expr) = match inner.split_once(':') {
                Some(rv) => rv,
                None => syntax_error!("self-closing {{let}} requires `: expression`"),
            };
            return Ok(Node::Let(Spanned::new(
                LetNode {
                    var: var.trim().to_string(),
                    kind: None,
                    value: BlockValue::Expr(expr.trim().to_string()),
                },
                span,
            )));
        }
        let (bare, pairs) = ok!(parse_attrs(rest));
        let var = match bare.first() {
            Some(var) => var.to_string(),
            None => syntax_error!("{{let}} is missing a variable"),
        };
        let mut kind = None;
        for (key, value) in pairs {
            if key == "kind" {
                kind = Some(ok!(expect_content_kind(value)));
            }
        }
        let (body, _) = ok!(self.parse_body(&["/let"]));
        Ok(Node::Let(Spanned::new(
            LetNode {
                var,
                kind,
                value: BlockValue::Block(body),
            },
            span,
        )))
    }

    fn parse_call(&mut self, rest: &str, delegate: bool, span: Span) -> Result<Node, Error> {
        let mut rest = rest.trim();
        let self_closing = rest.ends_with('/');
        if self_closing {
            rest = rest[..rest.len() - 1].trim_end();
        }
        let (bare, pairs) = ok!(parse_attrs(rest));
        let mut target = bare.first().map(|target| target.to_string());
        let mut data = None;
        for (key, value) in pairs {
            match key {
                "name" => target = Some(value.to_string()),
                "data" => data = Some(value.to_string()),
                _ => {}
            }
        }
        let target = match target {
            Some(target) => target,
            None => syntax_error!("call is missing a target"),
        };
        let mut params = Vec::new();
        if !self_closing {
            let end_tag = if delegate { "/delcall" } else { "/call" };
            loop {
                let (token, param_span) = match ok!(self.next()) {
                    Some(rv) => rv,
                    None => syntax_error!("unexpected end of input, expected {{{end_tag}}}"),
                };
                match token {
                    Token::RawText(text) => {
                        if !join_lines(text).is_empty() {
                            syntax_error!("only {{param}} is allowed inside {{call}}");
                        }
                    }
                    Token::Literal(_) => {
                        syntax_error!("only {{param}} is allowed inside {{call}}")
                    }
                    Token::Command(text) => {
                        let trimmed = text.trim();
                        let (word, param_rest) = split_word(trimmed);
                        if word == end_tag {
                            break;
                        } else if word == "param" {
                            params.push(ok!(self.parse_param(param_rest, param_span)));
                        } else {
                            syntax_error!("only {{param}} is allowed inside {{call}}");
                        }
                    }
                }
            }
        }
        Ok(Node::Call(Spanned::new(
            CallNode {
                id: NodeId::default(),
                target,
                delegate,
                data,
                params,
                escaping_directives: Vec::new(),
            },
            span,
        )))
    }

    fn parse_param(&mut self, rest: &str, span: Span) -> Result<Spanned<ParamNode>, Error> {
        let rest = rest.trim();
        if let Some(inner) = rest.strip_suffix('/') {
            let inner = inner.trim();
            let (name, expr) = match inner.split_once(':') {
                Some(rv) => rv,
                None => syntax_error!("self-closing {{param}} requires `: expression`"),
            };
            return Ok(Spanned::new(
                ParamNode {
                    name: name.trim().to_string(),
                    kind: None,
                    value: BlockValue::Expr(expr.trim().to_string()),
                },
                span,
            ));
        }
        let (bare, pairs) = ok!(parse_attrs(rest));
        let name = match bare.first() {
            Some(name) => name.to_string(),
            None => syntax_error!("{{param}} is missing a name"),
        };
        let mut kind = None;
        for (key, value) in pairs {
            if key == "kind" {
                kind = Some(ok!(expect_content_kind(value)));
            }
        }
        let (body, _) = ok!(self.parse_body(&["/param"]));
        Ok(Spanned::new(
            ParamNode {
                name,
                kind,
                value: BlockValue::Block(body),
            },
            span,
        ))
    }

    fn parse_msg(&mut self, attrs: &str, span: Span) -> Result<Node, Error> {
        let (body, _) = ok!(self.parse_body(&["/msg"]));
        Ok(Node::Msg(Spanned::new(
            MsgNode {
                attrs: attrs.to_string(),
                body,
            },
            span,
        )))
    }
}

fn special(c: SpecialChar, span: Span) -> Node {
    Node::Special(Spanned::new(c, span))
}

fn make_print(text: &str, explicit_print: bool, span: Span) -> Node {
    let (expr, directives) = split_print_parts(text);
    Node::Print(Spanned::new(
        Print {
            id: NodeId::default(),
            expr,
            explicit_print,
            directives,
        },
        span,
    ))
}

fn split_word(text: &str) -> (&str, &str) {
    match text.find(|c: char| c.is_ascii_whitespace()) {
        Some(idx) => (&text[..idx], text[idx..].trim_start()),
        None => (text, ""),
    }
}

fn split_loop_clause(clause: &str) -> Result<(String, String), Error> {
    match clause.split_once(" in ") {
        Some((var, over)) => Ok((var.trim().to_string(), over.trim().to_string())),
        None => Err(Error::new(
            ErrorKind::SyntaxError,
            "loop requires `$var in ...`",
        )),
    }
}

/// Splits a print command into the expression and its directives.
///
/// The pipe splits only outside quoted strings, and `||` is the boolean
/// operator, not a directive separator.
fn split_print_parts(text: &str) -> (String, Vec<DirectiveCall>) {
    let mut parts: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '"' | '\'' => {
                    quote = Some(c);
                    current.push(c);
                }
                '|' if chars.peek() == Some(&'|') => {
                    current.push('|');
                    current.push(chars.next().unwrap());
                }
                '|' => {
                    parts.push(std::mem::take(&mut current));
                }
                _ => current.push(c),
            },
        }
    }
    parts.push(current);

    let expr = parts[0].trim().to_string();
    let directives = parts[1..]
        .iter()
        .map(|part| {
            let part = part.trim();
            match part.split_once(':') {
                Some((name, args)) => DirectiveCall {
                    name: name.trim().to_string(),
                    args: Some(args.trim().to_string()),
                },
                None => DirectiveCall {
                    name: part.to_string(),
                    args: None,
                },
            }
        })
        .collect();
    (expr, directives)
}

/// Applies the template language's line joining.
///
/// A whitespace run containing a line terminator is removed entirely when
/// it borders a command (the edge of the run of raw text) or an HTML tag
/// bracket, and collapses to a single space otherwise.  Horizontal
/// whitespace within a line is preserved.
fn join_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut ws = String::new();
    let mut has_newline = false;
    let mut at_start = true;
    for c in text.chars() {
        if c.is_ascii_whitespace() {
            ws.push(c);
            has_newline |= c == '\n' || c == '\r';
        } else {
            if !ws.is_empty() {
                if !has_newline {
                    out.push_str(&ws);
                } else if !at_start
                    && !matches!(out.chars().last(), Some('<') | Some('>'))
                    && !matches!(c, '<' | '>')
                {
                    out.push(' ');
                }
                ws.clear();
                has_newline = false;
            }
            out.push(c);
            at_start = false;
        }
    }
    if !ws.is_empty() && !has_newline {
        out.push_str(&ws);
    }
    out
}

fn parse_attrs(mut rest: &str) -> Result<(Vec<&str>, Vec<(&str, &str)>), Error> {
    let mut bare = Vec::new();
    let mut pairs = Vec::new();
    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }
        let mut name_end = rest.len();
        let mut has_value = false;
        for (idx, c) in rest.char_indices() {
            if c == '=' {
                name_end = idx;
                has_value = true;
                break;
            }
            if c.is_ascii_whitespace() {
                name_end = idx;
                break;
            }
        }
        let name = &rest[..name_end];
        if has_value {
            let after = &rest[name_end + 1..];
            match after.chars().next() {
                Some(q @ ('"' | '\'')) => match after[1..].find(q) {
                    Some(value_end) => {
                        pairs.push((name, &after[1..1 + value_end]));
                        rest = &after[1 + value_end + 1..];
                    }
                    None => syntax_error!("unterminated value for attribute {name}"),
                },
                _ => syntax_error!("expected quoted value for attribute {name}"),
            }
        } else {
            bare.push(name);
            rest = &rest[name_end..];
        }
    }
    Ok((bare, pairs))
}

fn expect_autoescape_mode(value: &str) -> Result<AutoescapeMode, Error> {
    match AutoescapeMode::from_attr_value(value) {
        Some(mode) => Ok(mode),
        None => Err(Error::new(
            ErrorKind::SyntaxError,
            format!("unknown autoescape mode {value:?}"),
        )),
    }
}

fn expect_content_kind(value: &str) -> Result<ContentKind, Error> {
    match ContentKind::from_attr_value(value) {
        Some(kind) => Ok(kind),
        None => Err(Error::new(
            ErrorKind::SyntaxError,
            format!("unknown content kind {value:?}"),
        )),
    }
}
