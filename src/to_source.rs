//! Canonical source rendering for parsed templates.
//!
//! The rewriter mutates the tree in place; this module renders it back to
//! template source.  It is the counterpart the integration tests compare
//! against and the error path uses it to quote offending nodes.

use std::fmt::Write;

use crate::ast::{
    BlockValue, CallNode, IfArm, LetNode, Node, ParamNode, Print, SoyFile, Template,
};

/// Renders a whole file back to source.
pub fn file_to_source(file: &SoyFile) -> String {
    let mut out = String::new();
    if let Some(ref delpackage) = file.delpackage {
        let _ = writeln!(out, "{{delpackage {delpackage}}}");
    }
    if let Some(ref namespace) = file.namespace {
        let _ = write!(out, "{{namespace {namespace}}}");
    }
    for template in &file.templates {
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(&template_to_source(template));
    }
    out
}

/// Renders a single template definition.
pub fn template_to_source(template: &Template) -> String {
    let keyword = if template.delegate {
        "deltemplate"
    } else {
        "template"
    };
    let mut out = format!("{{{keyword} {}", template.name);
    if template.explicit_autoescape {
        let _ = write!(out, " autoescape=\"{}\"", template.autoescape.attr_value());
    }
    if let Some(kind) = template.kind {
        let _ = write!(out, " kind=\"{kind}\"");
    }
    if template.private {
        out.push_str(" private=\"true\"");
    }
    out.push_str("}\n");
    out.push_str(&body_to_source(&template.body));
    let _ = write!(out, "\n{{/{keyword}}}");
    out
}

/// Renders just the opening command of a template, for error snippets.
pub(crate) fn template_header_to_source(template: &Template) -> String {
    let full = template_to_source(template);
    match full.find('}') {
        Some(idx) => full[..idx + 1].to_string(),
        None => full,
    }
}

/// Renders one `{if}` arm including its opening command.
pub(crate) fn if_arm_to_source(arm: &IfArm, first: bool) -> String {
    let mut out = String::new();
    let _ = write_if_arm(&mut out, arm, first);
    out
}

pub(crate) fn body_to_source(body: &[Node]) -> String {
    let mut out = String::new();
    for node in body {
        out.push_str(&node_to_source(node));
    }
    out
}

/// Renders one node; used for error snippets as well.
pub fn node_to_source(node: &Node) -> String {
    let mut out = String::new();
    let _ = write_node(&mut out, node);
    out
}

fn write_node(out: &mut String, node: &Node) -> std::fmt::Result {
    match node {
        Node::RawText(text) => out.push_str(&text.text),
        Node::Special(special) => out.push_str(special.command()),
        Node::Literal(text) => {
            ok!(write!(out, "{{literal}}{}{{/literal}}", text.text));
        }
        Node::Print(print) => ok!(write_print(out, print)),
        Node::If(if_node) => {
            for (idx, arm) in if_node.arms.iter().enumerate() {
                ok!(write_if_arm(out, arm, idx == 0));
            }
            out.push_str("{/if}");
        }
        Node::Switch(switch) => {
            ok!(write!(out, "{{switch {}}}", switch.expr));
            for case in &switch.cases {
                ok!(write!(out, "{{case {}}}", case.expr));
                out.push_str(&body_to_source(&case.body));
            }
            if let Some(ref default) = switch.default {
                out.push_str("{default}");
                out.push_str(&body_to_source(default));
            }
            out.push_str("{/switch}");
        }
        Node::For(for_node) => {
            ok!(write!(
                out,
                "{{for {} in {}}}{}{{/for}}",
                for_node.var,
                for_node.range,
                body_to_source(&for_node.body)
            ));
        }
        Node::Foreach(foreach) => {
            ok!(write!(
                out,
                "{{foreach {} in {}}}{}",
                foreach.var,
                foreach.list,
                body_to_source(&foreach.body)
            ));
            if let Some(ref ifempty) = foreach.ifempty {
                out.push_str("{ifempty}");
                out.push_str(&body_to_source(ifempty));
            }
            out.push_str("{/foreach}");
        }
        Node::Let(let_node) => ok!(write_let(out, let_node)),
        Node::Call(call) => ok!(write_call(out, call)),
        Node::Msg(msg) => {
            ok!(write!(out, "{{msg {}}}", msg.attrs));
            out.push_str(&body_to_source(&msg.body));
            out.push_str("{/msg}");
        }
        Node::Css(cmd) => ok!(write!(out, "{{css {}}}", cmd.text)),
        Node::Xid(cmd) => ok!(write!(out, "{{xid {}}}", cmd.text)),
    }
    Ok(())
}

fn write_print(out: &mut String, print: &Print) -> std::fmt::Result {
    out.push('{');
    if print.explicit_print {
        out.push_str("print ");
    }
    out.push_str(&print.expr);
    for directive in &print.directives {
        ok!(write!(out, " |{}", directive.name));
        if let Some(ref args) = directive.args {
            ok!(write!(out, ":{args}"));
        }
    }
    out.push('}');
    Ok(())
}

fn write_if_arm(out: &mut String, arm: &IfArm, first: bool) -> std::fmt::Result {
    match arm.cond {
        Some(ref cond) if first => ok!(write!(out, "{{if {cond}}}")),
        Some(ref cond) => ok!(write!(out, "{{elseif {cond}}}")),
        None => out.push_str("{else}"),
    }
    out.push_str(&body_to_source(&arm.body));
    Ok(())
}

fn write_let(out: &mut String, let_node: &LetNode) -> std::fmt::Result {
    match let_node.value {
        BlockValue::Expr(ref expr) => {
            ok!(write!(out, "{{let {}: {expr} /}}", let_node.var));
        }
        BlockValue::Block(ref body) => {
            ok!(write!(out, "{{let {}", let_node.var));
            if let Some(kind) = let_node.kind {
                ok!(write!(out, " kind=\"{kind}\""));
            }
            out.push('}');
            out.push_str(&body_to_source(body));
            out.push_str("{/let}");
        }
    }
    Ok(())
}

fn write_param(out: &mut String, param: &ParamNode) -> std::fmt::Result {
    match param.value {
        BlockValue::Expr(ref expr) => {
            ok!(write!(out, "{{param {}: {expr} /}}", param.name));
        }
        BlockValue::Block(ref body) => {
            ok!(write!(out, "{{param {}", param.name));
            if let Some(kind) = param.kind {
                ok!(write!(out, " kind=\"{kind}\""));
            }
            out.push('}');
            out.push_str(&body_to_source(body));
            out.push_str("{/param}");
        }
    }
    Ok(())
}

fn write_call(out: &mut String, call: &CallNode) -> std::fmt::Result {
    let keyword = if call.delegate { "delcall" } else { "call" };
    ok!(write!(out, "{{{keyword} {}", call.target));
    if let Some(ref data) = call.data {
        ok!(write!(out, " data=\"{data}\""));
    }
    if call.params.is_empty() {
        out.push_str(" /}");
    } else {
        out.push('}');
        for param in &call.params {
            ok!(write_param(out, param));
        }
        ok!(write!(out, "{{/{keyword}}}"));
    }
    Ok(())
}
