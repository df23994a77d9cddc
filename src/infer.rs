use crate::ast::{
    AutoescapeMode, BlockValue, CallNode, ContentKind, DirectiveCall, ForNode, ForeachNode, IfNode,
    LetNode, MsgNode, Node, ParamNode, Print, Span, Spanned, SwitchNode,
};
use crate::context::{Context, State};
use crate::error::{Error, ErrorKind};
use crate::escaping::{escapers_for, is_compatible, EscapingMode};
use crate::rawtext::process_raw_text;
use crate::rewrite::{CallRewrite, Session, TplRef};
use crate::to_source::{body_to_source, if_arm_to_source, node_to_source};

/// The escaping regime a body is inferred under.
///
/// `Transitional` is the regime of typed blocks inside non-strict
/// templates: strict except that `|noAutoescape` is tolerated, which lets
/// callees migrate to strict before all their callers do.  `Scan` walks
/// non-contextual templates for their call sites without inserting or
/// checking anything print-related.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Regime {
    Strict,
    Transitional,
    Contextual,
    Scan,
}

impl Regime {
    pub(crate) fn for_template(mode: AutoescapeMode) -> Regime {
        match mode {
            AutoescapeMode::Strict => Regime::Strict,
            AutoescapeMode::Contextual => Regime::Contextual,
            AutoescapeMode::NonContextual | AutoescapeMode::NoAutoescape => Regime::Scan,
        }
    }
}

/// Walks one template body, threading a context through every node and
/// recording the directives and call rewrites the apply phase will commit.
pub(crate) struct InferenceEngine<'e, 'a> {
    session: &'e mut Session<'a>,
    file_idx: usize,
    template_name: String,
    regime: Regime,
}

impl<'e, 'a> InferenceEngine<'e, 'a> {
    pub(crate) fn new(
        session: &'e mut Session<'a>,
        file_idx: usize,
        template_name: String,
        regime: Regime,
    ) -> InferenceEngine<'e, 'a> {
        InferenceEngine {
            session,
            file_idx,
            template_name,
            regime,
        }
    }

    fn path(&self) -> &'a str {
        let files = self.session.files;
        &files.files[self.file_idx].path
    }

    pub(crate) fn infer_body(&mut self, body: &[Node], ctx: Context) -> Result<Context, Error> {
        let path = self.path();
        let mut ctx = ctx;
        for node in body {
            ctx = match self.infer_node(node, ctx) {
                Ok(ctx) => ctx,
                Err(err) => return Err(err.maybe_locate(path, &self.template_name, node.span())),
            };
        }
        Ok(ctx)
    }

    fn infer_node(&mut self, node: &Node, ctx: Context) -> Result<Context, Error> {
        match node {
            Node::RawText(text) => process_raw_text(ctx, &text.text),
            Node::Literal(text) => process_raw_text(ctx, &text.text),
            Node::Special(special) => process_raw_text(ctx, special.as_str()),
            Node::Print(print) => self.infer_print(print, ctx),
            Node::If(if_node) => self.infer_if(if_node, ctx),
            Node::Switch(switch) => self.infer_switch(switch, ctx),
            Node::For(for_node) => self.infer_for(for_node, ctx),
            Node::Foreach(foreach) => self.infer_foreach(foreach, ctx),
            Node::Let(let_node) => {
                ok!(self.infer_let(let_node, ctx));
                Ok(ctx)
            }
            Node::Call(call) => self.infer_call(call, call.span(), ctx),
            Node::Msg(msg) => self.infer_msg(msg, ctx),
            Node::Css(_) | Node::Xid(_) => Ok(ctx),
        }
    }

    fn infer_print(&mut self, print: &Spanned<Print>, ctx: Context) -> Result<Context, Error> {
        if self.regime == Regime::Scan {
            return Ok(ctx.after_dynamic_value());
        }

        let cancelling = print
            .directives
            .iter()
            .find(|d| self.session.registry.cancels_autoescape(&d.name));
        if let Some(directive) = cancelling {
            let allowed = match self.regime {
                Regime::Contextual | Regime::Scan => true,
                Regime::Transitional => directive.name == "noAutoescape",
                Regime::Strict => false,
            };
            if !allowed {
                return Err(self.cancelling_error(&directive.name, ctx));
            }
            // the user opted out; leave the print alone
            return Ok(ctx.after_dynamic_value());
        }

        let user_escaping: Vec<EscapingMode> = print
            .directives
            .iter()
            .filter_map(|d| EscapingMode::from_directive_name(&d.name))
            .collect();

        let required = match escapers_for(ctx) {
            Ok(modes) => modes,
            Err(err) => {
                if err.kind() == ErrorKind::DirectiveInComment || user_escaping.is_empty() {
                    return Err(with_snippet(err, &print_source(print)));
                }
                Vec::new()
            }
        };

        if !user_escaping.is_empty() {
            if !is_compatible(ctx, user_escaping[0], &required) {
                let listed = user_escaping
                    .iter()
                    .map(|m| m.directive_name())
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(Error::new(
                    ErrorKind::IncompatibleEscapingMode,
                    format!(
                        "Escaping modes [{listed}] not compatible with (Context {ctx}) : {}",
                        print_source(print)
                    ),
                ));
            }
            // already escaped appropriately by hand
        } else {
            let prepend = print
                .directives
                .last()
                .and_then(|d| self.session.registry.output_kind(&d.name))
                == Some(ContentKind::Html)
                && matches!(
                    ctx.state,
                    State::HtmlPcdata | State::HtmlRcdata | State::HtmlNormalAttrValue
                );
            let inserted: Vec<DirectiveCall> = required
                .iter()
                .map(|mode| DirectiveCall::new(mode.directive_name()))
                .collect();
            let mut merged = Vec::with_capacity(print.directives.len() + inserted.len());
            if prepend {
                // the content-kind-bearing directive consumes safe HTML and
                // produces safe HTML, so the escape runs first and nothing
                // re-escapes its output
                merged.extend(inserted);
                merged.extend(print.directives.iter().cloned());
            } else {
                merged.extend(print.directives.iter().cloned());
                merged.extend(inserted);
            }
            self.session
                .inferences
                .print_directives
                .insert(print.id, merged);
        }

        Ok(ctx.after_dynamic_value())
    }

    fn cancelling_error(&self, directive_name: &str, ctx: Context) -> Error {
        if directive_name == "noAutoescape" {
            let detail = match kind_hint(ctx) {
                Some(kind) => format!(
                    "noAutoescape is not allowed in strict autoescaping mode. Instead, pass in \
                     a {{param}} with kind=\"{kind}\" or SanitizedContent."
                ),
                None => "noAutoescape is not allowed in strict autoescaping mode. Instead, pass \
                         in a {param} with appropriate kind=\"...\" or SanitizedContent."
                    .to_string(),
            };
            Error::new(ErrorKind::StrictForbidsCancellingDirective, detail)
        } else {
            Error::new(
                ErrorKind::StrictForbidsCancellingDirective,
                format!(
                    "Autoescape-cancelling print directives like |{directive_name} are only \
                     allowed in kind=\"text\" blocks. If you really want to over-escape, try \
                     using a let block: {{let $foo kind=\"text\"}}{{$foo \
                     |{directive_name}}}{{/let}}{{$foo}}."
                ),
            )
        }
    }

    fn infer_if(&mut self, if_node: &Spanned<IfNode>, ctx: Context) -> Result<Context, Error> {
        let mut joined: Option<Context> = None;
        for (idx, arm) in if_node.arms.iter().enumerate() {
            let end = ok!(self.infer_body(&arm.body, ctx));
            joined = Some(match joined {
                None => end,
                Some(prev) => match Context::join(prev, end) {
                    Some(ctx) => ctx,
                    None => {
                        return Err(Error::new(
                            ErrorKind::AmbiguousBranches,
                            format!(
                                "{{if}} command branch ends in a different context than \
                                 preceding branches: {}",
                                if_arm_to_source(arm, idx == 0)
                            ),
                        ))
                    }
                },
            });
        }
        let joined = joined.unwrap_or(ctx);
        if if_node.has_else() {
            Ok(joined)
        } else {
            match Context::join(joined, ctx) {
                Some(ctx) => Ok(ctx),
                None => Err(Error::new(
                    ErrorKind::AmbiguousBranches,
                    format!(
                        "{{if}} command without {{else}} changes context : {}",
                        node_source_if(if_node)
                    ),
                )),
            }
        }
    }

    fn infer_switch(
        &mut self,
        switch: &Spanned<SwitchNode>,
        ctx: Context,
    ) -> Result<Context, Error> {
        let mut joined: Option<Context> = None;
        for case in &switch.cases {
            let end = ok!(self.infer_body(&case.body, ctx));
            joined = Some(match joined {
                None => end,
                Some(prev) => match Context::join(prev, end) {
                    Some(ctx) => ctx,
                    None => {
                        return Err(Error::new(
                            ErrorKind::AmbiguousBranches,
                            format!(
                                "{{switch}} command case ends in a different context than \
                                 preceding cases: {{case {}}}{}",
                                case.expr,
                                body_to_source(&case.body)
                            ),
                        ))
                    }
                },
            });
        }
        if let Some(ref default) = switch.default {
            let end = ok!(self.infer_body(default, ctx));
            joined = Some(match joined {
                None => end,
                Some(prev) => match Context::join(prev, end) {
                    Some(ctx) => ctx,
                    None => {
                        return Err(Error::new(
                            ErrorKind::AmbiguousBranches,
                            format!(
                                "{{switch}} command case ends in a different context than \
                                 preceding cases: {{default}}{}",
                                body_to_source(default)
                            ),
                        ))
                    }
                },
            });
        }
        let joined = joined.unwrap_or(ctx);
        if switch.default.is_some() {
            Ok(joined)
        } else {
            match Context::join(joined, ctx) {
                Some(ctx) => Ok(ctx),
                None => Err(Error::new(
                    ErrorKind::AmbiguousBranches,
                    "{switch} command without {default} changes context",
                )),
            }
        }
    }

    fn infer_for(&mut self, for_node: &Spanned<ForNode>, ctx: Context) -> Result<Context, Error> {
        let end = ok!(self.infer_body(&for_node.body, ctx));
        if end != ctx {
            return Err(Error::new(
                ErrorKind::LoopChangesContext,
                format!(
                    "{{for}} command changes context so it cannot be reentered : {{for {} in \
                     {}}}{}{{/for}}",
                    for_node.var,
                    for_node.range,
                    body_to_source(&for_node.body)
                ),
            ));
        }
        Ok(ctx)
    }

    fn infer_foreach(
        &mut self,
        foreach: &Spanned<ForeachNode>,
        ctx: Context,
    ) -> Result<Context, Error> {
        let end = ok!(self.infer_body(&foreach.body, ctx));
        if end != ctx {
            return Err(Error::new(
                ErrorKind::LoopChangesContext,
                format!(
                    "{{foreach}} body changes context : {{foreach {} in {}}}{}{{/foreach}}",
                    foreach.var,
                    foreach.list,
                    body_to_source(&foreach.body)
                ),
            ));
        }
        if let Some(ref ifempty) = foreach.ifempty {
            let ifempty_end = ok!(self.infer_body(ifempty, ctx));
            return match Context::join(ctx, ifempty_end) {
                Some(ctx) => Ok(ctx),
                None => Err(Error::new(
                    ErrorKind::AmbiguousBranches,
                    format!(
                        "{{ifempty}} command branch ends in a different context than the loop \
                         body: {{ifempty}}{}",
                        body_to_source(ifempty)
                    ),
                )),
            };
        }
        Ok(ctx)
    }

    fn infer_let(&mut self, let_node: &Spanned<LetNode>, ctx: Context) -> Result<(), Error> {
        let body = match let_node.value {
            BlockValue::Expr(_) => return Ok(()),
            BlockValue::Block(ref body) => body,
        };
        match let_node.kind {
            Some(kind) => {
                let header = format!("{{let {} kind=\"{kind}\"}}", let_node.var);
                self.infer_typed_block(body, kind, &header)
            }
            None => match self.regime {
                Regime::Strict => Err(missing_kind_error("let", &let_node.var)),
                Regime::Scan => {
                    ok!(self.infer_body(body, ctx));
                    Ok(())
                }
                Regime::Contextual | Regime::Transitional => {
                    let end = ok!(self.infer_body(body, ctx));
                    if end != ctx {
                        return Err(Error::new(
                            ErrorKind::BlockBadEnd,
                            format!(
                                "Blocks should start and end in HTML context: {{let {}}}",
                                let_node.var
                            ),
                        ));
                    }
                    Ok(())
                }
            },
        }
    }

    fn infer_param(&mut self, param: &Spanned<ParamNode>) -> Result<(), Error> {
        let body = match param.value {
            BlockValue::Expr(_) => return Ok(()),
            BlockValue::Block(ref body) => body,
        };
        match param.kind {
            Some(kind) => {
                let header = format!("{{param {} kind=\"{kind}\"}}", param.name);
                self.infer_typed_block(body, kind, &header)
            }
            None => match self.regime {
                Regime::Strict => Err(missing_kind_error("param", &param.name)),
                Regime::Scan => {
                    ok!(self.infer_body(body, Context::html_pcdata()));
                    Ok(())
                }
                Regime::Contextual | Regime::Transitional => {
                    let end = ok!(self.infer_body(body, Context::html_pcdata()));
                    if end != Context::html_pcdata() {
                        return Err(Error::new(
                            ErrorKind::BlockBadEnd,
                            format!(
                                "Blocks should start and end in HTML context: {{param {}}}",
                                param.name
                            ),
                        ));
                    }
                    Ok(())
                }
            },
        }
    }

    /// Infers a `kind`-typed block: the body starts at the kind's canonical
    /// context and must end in one of its terminal contexts, under a strict
    /// (or transitional) regime.
    fn infer_typed_block(
        &mut self,
        body: &[Node],
        kind: ContentKind,
        header: &str,
    ) -> Result<(), Error> {
        let block_regime = match self.regime {
            Regime::Strict => Regime::Strict,
            _ => Regime::Transitional,
        };
        let saved = self.regime;
        self.regime = block_regime;
        let result = self.infer_body(body, Context::start_for_kind(kind));
        self.regime = saved;
        let end = ok!(result);
        if !end.is_valid_end_for_kind(kind) {
            return Err(strict_block_bad_end(kind, end, header));
        }
        Ok(())
    }

    fn infer_msg(&mut self, msg: &Spanned<MsgNode>, ctx: Context) -> Result<Context, Error> {
        if self.regime != Regime::Scan {
            let allowed = matches!(
                ctx.state,
                State::HtmlPcdata | State::HtmlRcdata | State::HtmlNormalAttrValue | State::Text
            );
            if !allowed {
                return Err(Error::new(
                    ErrorKind::MessageForbiddenInContext,
                    format!(
                        "Messages are not supported in this context, because it would mean \
                         asking translators to write source code: (Context {ctx})"
                    ),
                ));
            }
        }
        self.infer_body(&msg.body, ctx)
    }

    fn infer_call(
        &mut self,
        call: &Spanned<CallNode>,
        span: Span,
        ctx: Context,
    ) -> Result<Context, Error> {
        for param in &call.params {
            ok!(self.infer_param(param));
        }

        if self.regime != Regime::Scan && ctx.state.is_comment() {
            return Err(Error::new(
                ErrorKind::DirectiveInComment,
                "Don't put {print} or {call} inside comments",
            ));
        }

        let files = self.session.files;
        let resolved = files.files[self.file_idx].resolve_name(&call.target);
        let callees = self
            .session
            .by_name
            .get(&resolved)
            .cloned()
            .unwrap_or_default();

        if callees.is_empty() {
            return self.infer_extern_call(call, ctx);
        }

        let (callee_mode, callee_kind) = {
            let (fi, ti) = callees[0];
            let template = &files.files[fi].templates[ti];
            (template.autoescape, template.kind)
        };
        if callee_mode == AutoescapeMode::Strict {
            return self.infer_strict_callee(call, &resolved, callee_kind, ctx);
        }

        let strict_caller = matches!(self.regime, Regime::Strict | Regime::Transitional);
        if strict_caller && ctx.state != State::Text {
            return Err(Error::new(
                ErrorKind::StrictForbidsNonStrictCall,
                format!(
                    "Soy strict autoescaping currently forbids calls to non-strict templates, \
                     unless the context is kind=\"text\", since there's no guarantee the callee \
                     is safe: {}",
                    call_source(call)
                ),
            ));
        }
        if matches!(
            callee_mode,
            AutoescapeMode::NonContextual | AutoescapeMode::NoAutoescape
        ) {
            // nothing we can usefully infer about the callee
            return Ok(ctx.after_dynamic_value());
        }

        // contextual callee(s): specialize per start context
        let canonical = Context::html_pcdata();
        let mut new_target = None;
        let mut end: Option<Context> = None;
        for id in callees {
            let tref = if ctx == canonical {
                TplRef::Orig(id)
            } else {
                let idx = self.session.derivation_for(id, ctx);
                new_target = Some(format!("{}{}", call.target, ctx.derivative_suffix()));
                TplRef::Derived(idx)
            };
            let callee_end = match self.session.require_end_context(tref, ctx) {
                Ok(end) => end,
                Err(err) => return Err(self.callee_error(&resolved, span, err)),
            };
            end = Some(match end {
                None => callee_end,
                Some(prev) => match Context::join(prev, callee_end) {
                    Some(ctx) => ctx,
                    None => {
                        return Err(Error::new(
                            ErrorKind::AmbiguousBranches,
                            format!(
                                "{{delcall}} candidates for {resolved} end in different \
                                 contexts: {}",
                                call_source(call)
                            ),
                        ))
                    }
                },
            });
        }
        self.session.inferences.call_rewrites.insert(
            call.id,
            CallRewrite {
                new_target,
                escapes: Vec::new(),
            },
        );
        Ok(end.unwrap_or(ctx))
    }

    fn infer_extern_call(
        &mut self,
        call: &Spanned<CallNode>,
        ctx: Context,
    ) -> Result<Context, Error> {
        if matches!(self.regime, Regime::Strict | Regime::Transitional) {
            let modes = match escapers_for(ctx) {
                Ok(modes) => modes,
                Err(err) => return Err(with_snippet(err, &call_source(call))),
            };
            self.session.inferences.call_rewrites.insert(
                call.id,
                CallRewrite {
                    new_target: None,
                    escapes: modes
                        .iter()
                        .map(|m| m.directive_name().to_string())
                        .collect(),
                },
            );
        }
        Ok(ctx.after_dynamic_value())
    }

    fn infer_strict_callee(
        &mut self,
        call: &Spanned<CallNode>,
        resolved: &str,
        callee_kind: Option<ContentKind>,
        ctx: Context,
    ) -> Result<Context, Error> {
        let kind = callee_kind.unwrap_or(ContentKind::Html);
        let compatible = ctx.is_valid_start_for_kind(kind);
        match self.regime {
            Regime::Strict | Regime::Transitional => {
                let escapes = if compatible {
                    Vec::new()
                } else {
                    let modes = match escapers_for(ctx) {
                        Ok(modes) => modes,
                        Err(err) => return Err(with_snippet(err, &call_source(call))),
                    };
                    modes
                        .iter()
                        .map(|m| m.directive_name().to_string())
                        .collect()
                };
                self.session.inferences.call_rewrites.insert(
                    call.id,
                    CallRewrite {
                        new_target: None,
                        escapes,
                    },
                );
            }
            Regime::Contextual | Regime::Scan => {
                if !compatible {
                    return Err(Error::new(
                        ErrorKind::IncompatibleCallKind,
                        format!(
                            "Cannot call strictly autoescaped template {resolved} of \
                             kind=\"{kind}\" from incompatible context (Context {ctx}). Strict \
                             templates generate extra code to safely call templates of other \
                             content kinds, but non-strict templates do not: {}",
                            call_source(call)
                        ),
                    ));
                }
            }
        }
        Ok(ctx.after_dynamic_value())
    }

    fn callee_error(&self, resolved: &str, span: Span, err: Error) -> Error {
        let mut wrapped = Error::new(
            err.kind(),
            format!(
                "error while inferring callee {resolved}: {}",
                err.detail().unwrap_or("")
            ),
        )
        .with_source(err);
        wrapped.set_filename_and_span(self.path(), span);
        wrapped.set_template(&self.template_name);
        wrapped
    }
}

fn kind_hint(ctx: Context) -> Option<ContentKind> {
    match ctx.state {
        State::HtmlPcdata => Some(ContentKind::Html),
        State::Js | State::JsDqString | State::JsSqString | State::JsRegex => Some(ContentKind::Js),
        State::Uri | State::CssUri | State::CssDqUri | State::CssSqUri => Some(ContentKind::Uri),
        State::HtmlTag | State::HtmlAttrName | State::HtmlBeforeAttrValue => {
            Some(ContentKind::Attributes)
        }
        State::Css | State::CssDqString | State::CssSqString => Some(ContentKind::Css),
        State::Text => Some(ContentKind::Text),
        _ => None,
    }
}

pub(crate) fn missing_kind_error(command: &str, name: &str) -> Error {
    Error::new(
        ErrorKind::MissingKindInStrict,
        format!(
            "In strict templates, {{{command}}}...{{/{command}}} blocks require an explicit \
             kind=\"<type>\". (Note that {{{command} ...: expr /}} is NOT subject to this \
             restriction). Cause: {{{command} {name}}}"
        ),
    )
}

pub(crate) fn strict_block_bad_end(kind: ContentKind, end: Context, header: &str) -> Error {
    let hint = match end.state {
        State::JsDqString | State::JsSqString | State::CssDqString | State::CssSqString => {
            "an unterminated string literal"
        }
        State::HtmlComment | State::CssComment | State::JsLineComment | State::JsBlockComment => {
            "an unterminated comment"
        }
        _ if kind == ContentKind::Uri => "an unterminated or empty URI",
        _ if kind == ContentKind::Attributes => {
            "an unterminated attribute value, or ending with an unquoted attribute"
        }
        _ => "an unclosed script block or attribute",
    };
    Error::new(
        ErrorKind::StrictBlockBadEnd,
        format!(
            "A strict block of kind=\"{kind}\" cannot end in context (Context {end}). Likely \
             cause is {hint}: {header}"
        ),
    )
}

pub(crate) fn with_snippet(err: Error, snippet: &str) -> Error {
    let kind = err.kind();
    let detail = match err.detail() {
        Some(detail) => format!("{detail} : {snippet}"),
        None => snippet.to_string(),
    };
    Error::new(kind, detail)
}

fn print_source(print: &Spanned<Print>) -> String {
    node_to_source(&Node::Print(Spanned::new(
        (**print).clone(),
        print.span(),
    )))
}

fn call_source(call: &Spanned<CallNode>) -> String {
    node_to_source(&Node::Call(Spanned::new((**call).clone(), call.span())))
}

fn node_source_if(if_node: &Spanned<IfNode>) -> String {
    node_to_source(&Node::If(Spanned::new(
        (**if_node).clone(),
        if_node.span(),
    )))
}
