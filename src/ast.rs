use std::fmt;
use std::ops::Deref;

/// Token span information.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "unstable_machinery_serde", derive(serde::Serialize))]
pub struct Span {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            " @ {}:{}-{}:{}",
            self.start_line, self.start_col, self.end_line, self.end_col
        )
    }
}

/// Container for nodes with location info.
///
/// This container fulfills two purposes: it adds location information to
/// nodes, but it also ensures the nodes are heap allocated.  The latter is
/// useful to ensure that enum variants do not cause the enum to become too
/// large.
#[derive(Clone)]
#[cfg_attr(feature = "unstable_machinery_serde", derive(serde::Serialize))]
pub struct Spanned<T> {
    inner: Box<(T, Span)>,
}

impl<T> Spanned<T> {
    /// Creates a new spanned node.
    pub fn new(node: T, span: Span) -> Spanned<T> {
        Spanned {
            inner: Box::new((node, span)),
        }
    }

    /// Accesses the span.
    pub fn span(&self) -> Span {
        self.inner.1
    }

    pub(crate) fn get_mut(&mut self) -> &mut T {
        &mut self.inner.0
    }
}

impl<T> Deref for Spanned<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner.0
    }
}

impl<T: fmt::Debug> fmt::Debug for Spanned<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        ok!(fmt::Debug::fmt(&self.inner.0, f));
        write!(f, "{:?}", self.inner.1)
    }
}

/// Identifies a print or call node across the annotate/apply phases.
///
/// Ids are assigned by the rewriter before inference starts and re-assigned
/// on cloned derivative bodies, so they are unique within one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "unstable_machinery_serde", derive(serde::Serialize))]
pub struct NodeId(pub(crate) u32);

/// The external content contract of a strict template or typed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "unstable_machinery_serde", derive(serde::Serialize))]
pub enum ContentKind {
    Html,
    Js,
    Uri,
    Attributes,
    Css,
    Text,
}

impl ContentKind {
    /// Parses the value of a `kind="..."` attribute.
    pub fn from_attr_value(value: &str) -> Option<ContentKind> {
        Some(match value {
            "html" => ContentKind::Html,
            "js" => ContentKind::Js,
            "uri" => ContentKind::Uri,
            "attributes" => ContentKind::Attributes,
            "css" => ContentKind::Css,
            "text" => ContentKind::Text,
            _ => return None,
        })
    }

    /// The value as it appears in a `kind="..."` attribute.
    pub fn attr_value(self) -> &'static str {
        match self {
            ContentKind::Html => "html",
            ContentKind::Js => "js",
            ContentKind::Uri => "uri",
            ContentKind::Attributes => "attributes",
            ContentKind::Css => "css",
            ContentKind::Text => "text",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.attr_value())
    }
}

/// Per-template escaping regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "unstable_machinery_serde", derive(serde::Serialize))]
pub enum AutoescapeMode {
    /// Kind-typed, safety enforced.  The default.
    Strict,
    /// Contextually inferred but permissive (`deprecated-contextual`).
    Contextual,
    /// Legacy blanket escaping, no inference (`deprecated-noncontextual`).
    NonContextual,
    /// No escaping at all (`deprecated-noautoescape`).
    NoAutoescape,
}

impl AutoescapeMode {
    pub fn from_attr_value(value: &str) -> Option<AutoescapeMode> {
        Some(match value {
            "strict" => AutoescapeMode::Strict,
            "deprecated-contextual" => AutoescapeMode::Contextual,
            "deprecated-noncontextual" => AutoescapeMode::NonContextual,
            "deprecated-noautoescape" => AutoescapeMode::NoAutoescape,
            _ => return None,
        })
    }

    pub fn attr_value(self) -> &'static str {
        match self {
            AutoescapeMode::Strict => "strict",
            AutoescapeMode::Contextual => "deprecated-contextual",
            AutoescapeMode::NonContextual => "deprecated-noncontextual",
            AutoescapeMode::NoAutoescape => "deprecated-noautoescape",
        }
    }
}

/// A set of parsed template files forming one compilation unit.
#[derive(Debug, Default)]
#[cfg_attr(feature = "unstable_machinery_serde", derive(serde::Serialize))]
pub struct FileSet {
    pub files: Vec<SoyFile>,
}

impl FileSet {
    pub fn new() -> FileSet {
        FileSet::default()
    }

    pub fn add_file(&mut self, file: SoyFile) {
        self.files.push(file);
    }
}

/// A single parsed template file.
#[derive(Debug)]
#[cfg_attr(feature = "unstable_machinery_serde", derive(serde::Serialize))]
pub struct SoyFile {
    pub path: String,
    #[cfg_attr(feature = "unstable_machinery_serde", serde(skip))]
    pub source: String,
    pub delpackage: Option<String>,
    pub namespace: Option<String>,
    pub default_autoescape: Option<AutoescapeMode>,
    pub templates: Vec<Template>,
}

impl SoyFile {
    /// Resolves a template or call-target name against the file namespace.
    ///
    /// Dotted shorthand (`.foo`) is namespace relative, anything else is
    /// taken as written.
    pub fn resolve_name(&self, name: &str) -> String {
        if let Some(rest) = name.strip_prefix('.') {
            match self.namespace {
                Some(ref ns) => format!("{ns}.{rest}"),
                None => rest.to_string(),
            }
        } else {
            name.to_string()
        }
    }
}

/// A template or delegate template definition.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "unstable_machinery_serde", derive(serde::Serialize))]
pub struct Template {
    /// The name as written in the source (possibly `.`-relative).
    pub name: String,
    /// True for `{deltemplate}`.
    pub delegate: bool,
    pub autoescape: AutoescapeMode,
    /// Whether the autoescape attribute was spelled out in the source.
    pub explicit_autoescape: bool,
    pub kind: Option<ContentKind>,
    pub private: bool,
    pub body: Vec<Node>,
    pub span: Span,
    /// True for templates manufactured by the rewriter.
    pub derived: bool,
}

/// A statement-level node in a template body.
#[derive(Debug, Clone)]
#[cfg_attr(
    feature = "unstable_machinery_serde",
    derive(serde::Serialize),
    serde(tag = "node")
)]
pub enum Node {
    RawText(Spanned<RawText>),
    Special(Spanned<SpecialChar>),
    Literal(Spanned<RawText>),
    Print(Spanned<Print>),
    If(Spanned<IfNode>),
    Switch(Spanned<SwitchNode>),
    For(Spanned<ForNode>),
    Foreach(Spanned<ForeachNode>),
    Let(Spanned<LetNode>),
    Call(Spanned<CallNode>),
    Msg(Spanned<MsgNode>),
    Css(Spanned<CommandText>),
    Xid(Spanned<CommandText>),
}

impl Node {
    pub fn span(&self) -> Span {
        match self {
            Node::RawText(s) => s.span(),
            Node::Special(s) => s.span(),
            Node::Literal(s) => s.span(),
            Node::Print(s) => s.span(),
            Node::If(s) => s.span(),
            Node::Switch(s) => s.span(),
            Node::For(s) => s.span(),
            Node::Foreach(s) => s.span(),
            Node::Let(s) => s.span(),
            Node::Call(s) => s.span(),
            Node::Msg(s) => s.span(),
            Node::Css(s) => s.span(),
            Node::Xid(s) => s.span(),
        }
    }
}

/// A run of literal template text.
///
/// The text is stored after line joining: whitespace runs containing a
/// newline are removed entirely, matching the template language's
/// whitespace rules.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "unstable_machinery_serde", derive(serde::Serialize))]
pub struct RawText {
    pub text: String,
}

/// The single-character commands (`{sp}`, `{lb}`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "unstable_machinery_serde", derive(serde::Serialize))]
pub enum SpecialChar {
    Sp,
    Nil,
    Lb,
    Rb,
    Newline,
    CarriageReturn,
    Tab,
}

impl SpecialChar {
    /// The literal text this command renders as.
    pub fn as_str(self) -> &'static str {
        match self {
            SpecialChar::Sp => " ",
            SpecialChar::Nil => "",
            SpecialChar::Lb => "{",
            SpecialChar::Rb => "}",
            SpecialChar::Newline => "\n",
            SpecialChar::CarriageReturn => "\r",
            SpecialChar::Tab => "\t",
        }
    }

    /// The source form of the command.
    pub fn command(self) -> &'static str {
        match self {
            SpecialChar::Sp => "{sp}",
            SpecialChar::Nil => "{nil}",
            SpecialChar::Lb => "{lb}",
            SpecialChar::Rb => "{rb}",
            SpecialChar::Newline => "{\\n}",
            SpecialChar::CarriageReturn => "{\\r}",
            SpecialChar::Tab => "{\\t}",
        }
    }
}

/// A print directive attached to a print node (`|escapeHtml`).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "unstable_machinery_serde", derive(serde::Serialize))]
pub struct DirectiveCall {
    pub name: String,
    /// Raw argument text after `:` if any, kept verbatim for printing.
    pub args: Option<String>,
}

impl DirectiveCall {
    pub fn new<N: Into<String>>(name: N) -> DirectiveCall {
        DirectiveCall {
            name: name.into(),
            args: None,
        }
    }
}

/// An interpolation (`{$expr|d1|d2}` or `{print expr}`).
///
/// The expression is opaque to the autoescaper; only the directive list is
/// interpreted and rewritten.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "unstable_machinery_serde", derive(serde::Serialize))]
pub struct Print {
    pub id: NodeId,
    pub expr: String,
    /// True when written with the long `{print ...}` form.
    pub explicit_print: bool,
    pub directives: Vec<DirectiveCall>,
}

/// An `{if}`/`{elseif}`/`{else}` chain.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "unstable_machinery_serde", derive(serde::Serialize))]
pub struct IfNode {
    pub arms: Vec<IfArm>,
}

impl IfNode {
    pub fn has_else(&self) -> bool {
        self.arms.last().is_some_and(|arm| arm.cond.is_none())
    }
}

/// One arm of an `{if}` chain; the `{else}` arm has no condition.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "unstable_machinery_serde", derive(serde::Serialize))]
pub struct IfArm {
    pub cond: Option<String>,
    pub body: Vec<Node>,
}

/// A `{switch}` command.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "unstable_machinery_serde", derive(serde::Serialize))]
pub struct SwitchNode {
    pub expr: String,
    pub cases: Vec<SwitchCase>,
    pub default: Option<Vec<Node>>,
}

/// One `{case}` of a `{switch}`.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "unstable_machinery_serde", derive(serde::Serialize))]
pub struct SwitchCase {
    pub expr: String,
    pub body: Vec<Node>,
}

/// A `{for $i in range(...)}` loop.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "unstable_machinery_serde", derive(serde::Serialize))]
pub struct ForNode {
    pub var: String,
    pub range: String,
    pub body: Vec<Node>,
}

/// A `{foreach $x in $list}` loop with optional `{ifempty}` branch.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "unstable_machinery_serde", derive(serde::Serialize))]
pub struct ForeachNode {
    pub var: String,
    pub list: String,
    pub body: Vec<Node>,
    pub ifempty: Option<Vec<Node>>,
}

/// The value of a `{let}` or `{param}`: an inline expression or a block.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "unstable_machinery_serde", derive(serde::Serialize))]
pub enum BlockValue {
    Expr(String),
    Block(Vec<Node>),
}

/// A `{let}` binding.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "unstable_machinery_serde", derive(serde::Serialize))]
pub struct LetNode {
    pub var: String,
    pub kind: Option<ContentKind>,
    pub value: BlockValue,
}

/// A `{call}` or `{delcall}`.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "unstable_machinery_serde", derive(serde::Serialize))]
pub struct CallNode {
    pub id: NodeId,
    /// The target as written; rewritten in place when the call is
    /// retargeted to a derivative.
    pub target: String,
    pub delegate: bool,
    pub data: Option<String>,
    pub params: Vec<Spanned<ParamNode>>,
    /// Escaping directives to apply to the call result, filled in by the
    /// rewriter for strict call sites.
    pub escaping_directives: Vec<String>,
}

/// A `{param}` inside a call.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "unstable_machinery_serde", derive(serde::Serialize))]
pub struct ParamNode {
    pub name: String,
    pub kind: Option<ContentKind>,
    pub value: BlockValue,
}

/// A `{msg}` command.  Attributes are kept verbatim.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "unstable_machinery_serde", derive(serde::Serialize))]
pub struct MsgNode {
    pub attrs: String,
    pub body: Vec<Node>,
}

/// The argument of a `{css}` or `{xid}` command.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "unstable_machinery_serde", derive(serde::Serialize))]
pub struct CommandText {
    pub text: String,
}
