//! The rewriting session: inference roots, call-site specialization and
//! the final application of recorded annotations to the tree.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::ast::{
    AutoescapeMode, BlockValue, ContentKind, DirectiveCall, FileSet, Node, NodeId, Template,
};
use crate::context::Context;
use crate::directive::DirectiveRegistry;
use crate::error::Error;
use crate::infer::{strict_block_bad_end, InferenceEngine, Regime};
use crate::to_source::template_header_to_source;

/// Identifies an original template by position in the file set.
pub(crate) type TemplateId = (usize, usize);

/// A template under inference: an original or a manufactured derivative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum TplRef {
    Orig(TemplateId),
    Derived(usize),
}

/// What the apply phase does to a call node.
#[derive(Debug, Clone)]
pub(crate) struct CallRewrite {
    pub new_target: Option<String>,
    pub escapes: Vec<String>,
}

/// A derivative template cloned for a non-default start context.
pub(crate) struct Derivation {
    pub base_file: usize,
    pub template: Rc<Template>,
}

/// Everything inference learns, applied to the tree only once the whole
/// session succeeded.
#[derive(Default)]
pub(crate) struct Inferences {
    pub print_directives: HashMap<NodeId, Vec<DirectiveCall>>,
    pub call_rewrites: HashMap<NodeId, CallRewrite>,
    pub end_contexts: HashMap<(TplRef, Context), Context>,
    /// Creation order is the append order of derivative templates, which
    /// keeps output deterministic.
    pub derivations: Vec<Derivation>,
    pub derivation_index: HashMap<(TemplateId, Context), usize>,
}

pub(crate) struct Session<'a> {
    pub files: &'a FileSet,
    pub registry: &'a DirectiveRegistry,
    pub by_name: HashMap<String, Vec<TemplateId>>,
    pub inferences: Inferences,
    prev_end_contexts: HashMap<(TplRef, Context), Context>,
    in_progress: HashSet<(TplRef, Context)>,
    next_id: u32,
}

/// Rewrites a parsed template set so every interpolation is escaped for
/// the context it renders into.
///
/// Prints gain directive lists, calls are retargeted to derivative
/// templates or gain result escapes, and derivative templates are appended
/// to the file that defines their original.  The first error aborts the
/// session; the tree is only mutated on success.
pub fn rewrite(file_set: &mut FileSet, registry: &DirectiveRegistry) -> Result<(), Error> {
    let mut next_id = 1u32;
    for file in &mut file_set.files {
        for template in &mut file.templates {
            assign_body_ids(&mut template.body, &mut next_id);
        }
    }
    let by_name = templates_by_name(file_set);

    let inferences = {
        let mut session = Session {
            files: &*file_set,
            registry,
            by_name,
            inferences: Inferences::default(),
            prev_end_contexts: HashMap::new(),
            in_progress: HashSet::new(),
            next_id,
        };
        // Recursion is answered optimistically from the previous pass, so
        // iterate until the end-context cache stops moving.  The
        // (template, context) space is finite and almost every set settles
        // on the second pass.
        const MAX_PASSES: usize = 8;
        for _ in 0..MAX_PASSES {
            if ok!(session.run_pass()) {
                break;
            }
        }
        session.inferences
    };

    apply(file_set, &inferences);
    Ok(())
}

/// Maps every resolved template name to its definitions (delegates of the
/// same name share an entry, in file order).
pub(crate) fn templates_by_name(file_set: &FileSet) -> HashMap<String, Vec<TemplateId>> {
    let mut by_name: HashMap<String, Vec<TemplateId>> = HashMap::new();
    for (fi, file) in file_set.files.iter().enumerate() {
        for (ti, template) in file.templates.iter().enumerate() {
            by_name
                .entry(file.resolve_name(&template.name))
                .or_default()
                .push((fi, ti));
        }
    }
    by_name
}

impl<'a> Session<'a> {
    /// Runs one full inference pass.  Returns true when the pass produced
    /// the same end contexts as the previous one and created no new
    /// derivatives.
    fn run_pass(&mut self) -> Result<bool, Error> {
        let derivation_count = self.inferences.derivations.len();
        self.prev_end_contexts = std::mem::take(&mut self.inferences.end_contexts);
        self.inferences.print_directives.clear();
        self.inferences.call_rewrites.clear();
        self.in_progress.clear();

        let files = self.files;
        for (fi, file) in files.files.iter().enumerate() {
            for (ti, template) in file.templates.iter().enumerate() {
                if template.derived {
                    continue;
                }
                let id = (fi, ti);
                match template.autoescape {
                    AutoescapeMode::Strict => {
                        let kind = template.kind.unwrap_or(ContentKind::Html);
                        let start = Context::start_for_kind(kind);
                        let end = ok!(self.require_end_context(TplRef::Orig(id), start));
                        if !end.is_valid_end_for_kind(kind) {
                            let header = template_header_to_source(template);
                            let mut err = strict_block_bad_end(kind, end, &header);
                            err.set_filename_and_span(&file.path, template.span);
                            err.set_template(&file.resolve_name(&template.name));
                            return Err(err);
                        }
                    }
                    AutoescapeMode::Contextual => {
                        ok!(self.require_end_context(TplRef::Orig(id), Context::html_pcdata()));
                    }
                    AutoescapeMode::NonContextual | AutoescapeMode::NoAutoescape => {
                        // such templates are only our business when they
                        // call into inferred templates
                        if self.body_calls_inferable(fi, &template.body) {
                            let name = file.resolve_name(&template.name);
                            let mut engine =
                                InferenceEngine::new(self, fi, name, Regime::Scan);
                            ok!(engine.infer_body(&template.body, Context::html_pcdata()));
                        }
                    }
                }
            }
        }

        let stable = self.inferences.end_contexts == self.prev_end_contexts
            && self.inferences.derivations.len() == derivation_count;
        Ok(stable)
    }

    /// The end context of `tref`'s body when started at `start`, inferring
    /// it if this pass has not yet.  Recursive requests are answered with
    /// the previous pass's value (or the start context on the first pass).
    pub(crate) fn require_end_context(
        &mut self,
        tref: TplRef,
        start: Context,
    ) -> Result<Context, Error> {
        if let Some(&end) = self.inferences.end_contexts.get(&(tref, start)) {
            return Ok(end);
        }
        if self.in_progress.contains(&(tref, start)) {
            return Ok(self
                .prev_end_contexts
                .get(&(tref, start))
                .copied()
                .unwrap_or(start));
        }
        self.in_progress.insert((tref, start));
        let result = self.infer_template(tref, start);
        self.in_progress.remove(&(tref, start));
        let end = ok!(result);
        self.inferences.end_contexts.insert((tref, start), end);
        Ok(end)
    }

    fn infer_template(&mut self, tref: TplRef, start: Context) -> Result<Context, Error> {
        let files = self.files;
        match tref {
            TplRef::Orig((fi, ti)) => {
                let template = &files.files[fi].templates[ti];
                let name = files.files[fi].resolve_name(&template.name);
                let regime = Regime::for_template(template.autoescape);
                let mut engine = InferenceEngine::new(self, fi, name, regime);
                engine.infer_body(&template.body, start)
            }
            TplRef::Derived(idx) => {
                let (fi, template) = {
                    let derivation = &self.inferences.derivations[idx];
                    (derivation.base_file, Rc::clone(&derivation.template))
                };
                let name = files.files[fi].resolve_name(&template.name);
                let regime = Regime::for_template(template.autoescape);
                let mut engine = InferenceEngine::new(self, fi, name, regime);
                engine.infer_body(&template.body, start)
            }
        }
    }

    /// Returns the existing derivative of `base` for `start`, creating and
    /// registering it first if needed.  The map entry exists before the
    /// derivative body is ever inferred, which is what lets recursive call
    /// cycles re-use the derivative instead of spawning forever.
    pub(crate) fn derivation_for(&mut self, base: TemplateId, start: Context) -> usize {
        if let Some(&idx) = self.inferences.derivation_index.get(&(base, start)) {
            return idx;
        }
        let (fi, ti) = base;
        let mut clone = self.files.files[fi].templates[ti].clone();
        clone.name = format!("{}{}", clone.name, start.derivative_suffix());
        clone.derived = true;
        assign_body_ids(&mut clone.body, &mut self.next_id);
        let idx = self.inferences.derivations.len();
        self.inferences.derivations.push(Derivation {
            base_file: fi,
            template: Rc::new(clone),
        });
        self.inferences.derivation_index.insert((base, start), idx);
        idx
    }

    fn body_calls_inferable(&self, fi: usize, body: &[Node]) -> bool {
        body.iter().any(|node| self.node_calls_inferable(fi, node))
    }

    fn node_calls_inferable(&self, fi: usize, node: &Node) -> bool {
        match node {
            Node::Call(call) => {
                let resolved = self.files.files[fi].resolve_name(&call.target);
                if let Some(ids) = self.by_name.get(&resolved) {
                    let (cfi, cti) = ids[0];
                    if matches!(
                        self.files.files[cfi].templates[cti].autoescape,
                        AutoescapeMode::Strict | AutoescapeMode::Contextual
                    ) {
                        return true;
                    }
                }
                call.params.iter().any(|param| match param.value {
                    BlockValue::Block(ref body) => self.body_calls_inferable(fi, body),
                    BlockValue::Expr(_) => false,
                })
            }
            Node::If(if_node) => if_node
                .arms
                .iter()
                .any(|arm| self.body_calls_inferable(fi, &arm.body)),
            Node::Switch(switch) => {
                switch
                    .cases
                    .iter()
                    .any(|case| self.body_calls_inferable(fi, &case.body))
                    || switch
                        .default
                        .as_ref()
                        .is_some_and(|body| self.body_calls_inferable(fi, body))
            }
            Node::For(for_node) => self.body_calls_inferable(fi, &for_node.body),
            Node::Foreach(foreach) => {
                self.body_calls_inferable(fi, &foreach.body)
                    || foreach
                        .ifempty
                        .as_ref()
                        .is_some_and(|body| self.body_calls_inferable(fi, body))
            }
            Node::Let(let_node) => match let_node.value {
                BlockValue::Block(ref body) => self.body_calls_inferable(fi, body),
                BlockValue::Expr(_) => false,
            },
            Node::Msg(msg) => self.body_calls_inferable(fi, &msg.body),
            _ => false,
        }
    }
}

fn next_id(counter: &mut u32) -> NodeId {
    let id = NodeId(*counter);
    *counter += 1;
    id
}

fn assign_body_ids(body: &mut [Node], counter: &mut u32) {
    for node in body {
        match node {
            Node::Print(print) => print.get_mut().id = next_id(counter),
            Node::Call(call) => {
                call.get_mut().id = next_id(counter);
                for param in &mut call.get_mut().params {
                    if let BlockValue::Block(ref mut block) = param.get_mut().value {
                        assign_body_ids(block, counter);
                    }
                }
            }
            Node::If(if_node) => {
                for arm in &mut if_node.get_mut().arms {
                    assign_body_ids(&mut arm.body, counter);
                }
            }
            Node::Switch(switch) => {
                let switch = switch.get_mut();
                for case in &mut switch.cases {
                    assign_body_ids(&mut case.body, counter);
                }
                if let Some(ref mut default) = switch.default {
                    assign_body_ids(default, counter);
                }
            }
            Node::For(for_node) => assign_body_ids(&mut for_node.get_mut().body, counter),
            Node::Foreach(foreach) => {
                let foreach = foreach.get_mut();
                assign_body_ids(&mut foreach.body, counter);
                if let Some(ref mut ifempty) = foreach.ifempty {
                    assign_body_ids(ifempty, counter);
                }
            }
            Node::Let(let_node) => {
                if let BlockValue::Block(ref mut block) = let_node.get_mut().value {
                    assign_body_ids(block, counter);
                }
            }
            Node::Msg(msg) => assign_body_ids(&mut msg.get_mut().body, counter),
            _ => {}
        }
    }
}

fn apply(file_set: &mut FileSet, inferences: &Inferences) {
    for derivation in &inferences.derivations {
        let template = (*derivation.template).clone();
        file_set.files[derivation.base_file].templates.push(template);
    }
    for file in &mut file_set.files {
        for template in &mut file.templates {
            apply_body(&mut template.body, inferences);
        }
    }
}

fn apply_body(body: &mut [Node], inferences: &Inferences) {
    for node in body {
        match node {
            Node::Print(print) => {
                let id = print.id;
                if let Some(directives) = inferences.print_directives.get(&id) {
                    print.get_mut().directives = directives.clone();
                }
            }
            Node::Call(call) => {
                let id = call.id;
                if let Some(rewrite) = inferences.call_rewrites.get(&id) {
                    let call = call.get_mut();
                    if let Some(ref target) = rewrite.new_target {
                        call.target = target.clone();
                    }
                    call.escaping_directives = rewrite.escapes.clone();
                }
                for param in &mut call.get_mut().params {
                    if let BlockValue::Block(ref mut block) = param.get_mut().value {
                        apply_body(block, inferences);
                    }
                }
            }
            Node::If(if_node) => {
                for arm in &mut if_node.get_mut().arms {
                    apply_body(&mut arm.body, inferences);
                }
            }
            Node::Switch(switch) => {
                let switch = switch.get_mut();
                for case in &mut switch.cases {
                    apply_body(&mut case.body, inferences);
                }
                if let Some(ref mut default) = switch.default {
                    apply_body(default, inferences);
                }
            }
            Node::For(for_node) => apply_body(&mut for_node.get_mut().body, inferences),
            Node::Foreach(foreach) => {
                let foreach = foreach.get_mut();
                apply_body(&mut foreach.body, inferences);
                if let Some(ref mut ifempty) = foreach.ifempty {
                    apply_body(ifempty, inferences);
                }
            }
            Node::Let(let_node) => {
                if let BlockValue::Block(ref mut block) = let_node.get_mut().value {
                    apply_body(block, inferences);
                }
            }
            Node::Msg(msg) => apply_body(&mut msg.get_mut().body, inferences),
            _ => {}
        }
    }
}
