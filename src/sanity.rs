//! Syntactic checks that do not depend on context inference.
//!
//! These run before rewriting and fail fast on constructs that could only
//! confuse the escaper later: the compiler-reserved `|text` directive,
//! kind-less blocks in strict scope, typed blocks in templates that never
//! escape, and non-contextual callers of strict text templates.

use crate::ast::{
    AutoescapeMode, BlockValue, ContentKind, FileSet, Node, SoyFile, Template,
};
use crate::error::{Error, ErrorKind};
use crate::infer::missing_kind_error;
use crate::rewrite::templates_by_name;
use crate::to_source::node_to_source;

/// Checks a file set for escaping-independent problems.
pub fn check_escaping_sanity(file_set: &FileSet) -> Result<(), Error> {
    let by_name = templates_by_name(file_set);
    for file in &file_set.files {
        for template in &file.templates {
            let checker = Checker {
                file_set,
                file,
                by_name: &by_name,
                template_name: file.resolve_name(&template.name),
                mode: template.autoescape,
            };
            ok!(checker.check_body(
                &template.body,
                template.autoescape == AutoescapeMode::Strict
            ));
        }
    }
    Ok(())
}

struct Checker<'a> {
    file_set: &'a FileSet,
    file: &'a SoyFile,
    by_name: &'a std::collections::HashMap<String, Vec<(usize, usize)>>,
    template_name: String,
    mode: AutoescapeMode,
}

impl<'a> Checker<'a> {
    fn check_body(&self, body: &[Node], strict_scope: bool) -> Result<(), Error> {
        for node in body {
            ok!(self
                .check_node(node, strict_scope)
                .map_err(|err| err.maybe_locate(
                    &self.file.path,
                    &self.template_name,
                    node.span()
                )));
        }
        Ok(())
    }

    fn check_node(&self, node: &Node, strict_scope: bool) -> Result<(), Error> {
        match node {
            Node::Print(print) => {
                if print.directives.iter().any(|d| d.name == "text") {
                    return Err(Error::new(
                        ErrorKind::ReservedDirective,
                        "Print directive |text is only for internal use by the Soy compiler.",
                    ));
                }
            }
            Node::Let(let_node) => {
                if let BlockValue::Block(ref body) = let_node.value {
                    if let_node.kind.is_none() && strict_scope {
                        return Err(missing_kind_error("let", &let_node.var));
                    }
                    if let_node.kind.is_some() && self.mode == AutoescapeMode::NoAutoescape {
                        return Err(Error::new(
                            ErrorKind::TypedBlockInNoAutoescape,
                            format!(
                                "{{let}} node with 'kind' attribute is not permitted in \
                                 non-autoescaped templates: {}",
                                node_to_source(node)
                            ),
                        ));
                    }
                    ok!(self.check_body(body, strict_scope || let_node.kind.is_some()));
                }
            }
            Node::Call(call) => {
                if self.mode == AutoescapeMode::NonContextual {
                    if let Some(callee) = self.lookup(&call.target) {
                        if callee.autoescape == AutoescapeMode::Strict
                            && callee.kind == Some(ContentKind::Text)
                        {
                            return Err(Error::new(
                                ErrorKind::IncompatibleCallKind,
                                format!(
                                    "Calls to strict templates with 'kind=\"text\"' attribute \
                                     is not permitted in non-contextually autoescaped \
                                     templates: {}",
                                    node_to_source(node)
                                ),
                            ));
                        }
                    }
                }
                for param in &call.params {
                    if let BlockValue::Block(ref body) = param.value {
                        if param.kind.is_none() && strict_scope {
                            return Err(missing_kind_error("param", &param.name));
                        }
                        if param.kind.is_some() && self.mode == AutoescapeMode::NoAutoescape {
                            return Err(Error::new(
                                ErrorKind::TypedBlockInNoAutoescape,
                                format!(
                                    "{{param}} node with 'kind' attribute is not permitted in \
                                     non-autoescaped templates: {{param {} kind=\"{}\"}}",
                                    param.name,
                                    param.kind.map(|k| k.attr_value()).unwrap_or("")
                                ),
                            ));
                        }
                        ok!(self.check_body(body, strict_scope || param.kind.is_some()));
                    }
                }
            }
            Node::If(if_node) => {
                for arm in &if_node.arms {
                    ok!(self.check_body(&arm.body, strict_scope));
                }
            }
            Node::Switch(switch) => {
                for case in &switch.cases {
                    ok!(self.check_body(&case.body, strict_scope));
                }
                if let Some(ref default) = switch.default {
                    ok!(self.check_body(default, strict_scope));
                }
            }
            Node::For(for_node) => ok!(self.check_body(&for_node.body, strict_scope)),
            Node::Foreach(foreach) => {
                ok!(self.check_body(&foreach.body, strict_scope));
                if let Some(ref ifempty) = foreach.ifempty {
                    ok!(self.check_body(ifempty, strict_scope));
                }
            }
            Node::Msg(msg) => ok!(self.check_body(&msg.body, strict_scope)),
            _ => {}
        }
        Ok(())
    }

    fn lookup(&self, target: &str) -> Option<&'a Template> {
        let resolved = self.file.resolve_name(target);
        let &(fi, ti) = self.by_name.get(&resolved)?.first()?;
        Some(&self.file_set.files[fi].templates[ti])
    }
}
