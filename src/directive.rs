use std::collections::BTreeMap;

use crate::ast::ContentKind;

/// Static traits of a print directive plugin.
///
/// The rewriter never executes directives; it only needs to know whether a
/// directive opts its print out of autoescaping and whether it promises a
/// particular content kind for its output.
#[derive(Debug, Clone)]
pub struct PrintDirective {
    pub name: String,
    pub cancels_autoescape: bool,
    pub output_kind: Option<ContentKind>,
}

impl PrintDirective {
    pub fn new<N: Into<String>>(name: N) -> PrintDirective {
        PrintDirective {
            name: name.into(),
            cancels_autoescape: false,
            output_kind: None,
        }
    }

    pub fn cancelling<N: Into<String>>(name: N) -> PrintDirective {
        PrintDirective {
            name: name.into(),
            cancels_autoescape: true,
            output_kind: None,
        }
    }

    pub fn with_output_kind(mut self, kind: ContentKind) -> PrintDirective {
        self.output_kind = Some(kind);
        self
    }
}

/// The catalogue of print directives available to a template set.
///
/// The built-in escaping directives the rewriter inserts itself are always
/// known; this registry describes everything else, in particular which
/// user-visible directives cancel autoescaping (`noAutoescape` being the
/// canonical one).
#[derive(Debug, Default)]
pub struct DirectiveRegistry {
    directives: BTreeMap<String, PrintDirective>,
}

impl DirectiveRegistry {
    pub fn new() -> DirectiveRegistry {
        DirectiveRegistry::default()
    }

    /// Registers a directive, replacing any previous one of the same name.
    pub fn register(&mut self, directive: PrintDirective) {
        self.directives.insert(directive.name.clone(), directive);
    }

    pub fn get(&self, name: &str) -> Option<&PrintDirective> {
        self.directives.get(name)
    }

    pub fn cancels_autoescape(&self, name: &str) -> bool {
        self.get(name).is_some_and(|d| d.cancels_autoescape)
    }

    pub fn output_kind(&self, name: &str) -> Option<ContentKind> {
        self.get(name).and_then(|d| d.output_kind)
    }
}
