use std::fmt;

use crate::ast::ContentKind;

/// The lexical state of the output stream at one point in a template.
///
/// Two contexts compare equal iff every field matches.  The default value
/// is the HTML PCDATA context that rendering starts in.
///
/// Most fields only carry information for a subset of states (the slash
/// value is meaningless outside JS, the URI part outside URI-like states);
/// such fields hold their `None`-like default everywhere else so that
/// equality and the packed encoding stay well defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "unstable_machinery_serde", derive(serde::Serialize))]
pub struct Context {
    pub state: State,
    pub element: ElementKind,
    pub attr: AttrKind,
    pub delim: Delim,
    pub slash: JsSlash,
    pub uri_part: UriPart,
}

/// The lexer state component of a [`Context`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "unstable_machinery_serde", derive(serde::Serialize))]
pub enum State {
    #[default]
    HtmlPcdata,
    HtmlRcdata,
    HtmlBeforeTagName,
    HtmlTagName,
    HtmlTag,
    HtmlAttrName,
    HtmlBeforeAttrValue,
    HtmlNormalAttrValue,
    HtmlComment,
    Css,
    CssComment,
    CssDqString,
    CssSqString,
    CssUri,
    CssDqUri,
    CssSqUri,
    Js,
    JsLineComment,
    JsBlockComment,
    JsDqString,
    JsSqString,
    JsRegex,
    Uri,
    Text,
}

impl State {
    fn packed(self) -> u32 {
        match self {
            State::HtmlPcdata => 0x00,
            State::HtmlRcdata => 0x01,
            State::HtmlBeforeTagName => 0x02,
            State::HtmlTagName => 0x03,
            State::HtmlTag => 0x04,
            State::HtmlAttrName => 0x05,
            State::HtmlBeforeAttrValue => 0x06,
            State::HtmlNormalAttrValue => 0x07,
            State::HtmlComment => 0x08,
            State::Css => 0x09,
            State::CssComment => 0x0a,
            State::CssDqString => 0x0b,
            State::CssSqString => 0x0c,
            State::CssUri => 0x0d,
            State::CssDqUri => 0x0e,
            State::CssSqUri => 0x0f,
            State::Js => 0x10,
            State::JsLineComment => 0x11,
            State::JsBlockComment => 0x12,
            State::JsDqString => 0x13,
            State::JsSqString => 0x14,
            State::JsRegex => 0x15,
            State::Uri => 0x16,
            State::Text => 0x17,
        }
    }

    fn name(self) -> &'static str {
        match self {
            State::HtmlPcdata => "HTML_PCDATA",
            State::HtmlRcdata => "HTML_RCDATA",
            State::HtmlBeforeTagName => "HTML_BEFORE_TAG_NAME",
            State::HtmlTagName => "HTML_TAG_NAME",
            State::HtmlTag => "HTML_TAG",
            State::HtmlAttrName => "HTML_ATTRIBUTE_NAME",
            State::HtmlBeforeAttrValue => "HTML_BEFORE_ATTRIBUTE_VALUE",
            State::HtmlNormalAttrValue => "HTML_NORMAL_ATTR_VALUE",
            State::HtmlComment => "HTML_COMMENT",
            State::Css => "CSS",
            State::CssComment => "CSS_COMMENT",
            State::CssDqString => "CSS_DQ_STRING",
            State::CssSqString => "CSS_SQ_STRING",
            State::CssUri => "CSS_URI",
            State::CssDqUri => "CSS_DQ_URI",
            State::CssSqUri => "CSS_SQ_URI",
            State::Js => "JS",
            State::JsLineComment => "JS_LINE_COMMENT",
            State::JsBlockComment => "JS_BLOCK_COMMENT",
            State::JsDqString => "JS_DQ_STRING",
            State::JsSqString => "JS_SQ_STRING",
            State::JsRegex => "JS_REGEX",
            State::Uri => "URI",
            State::Text => "TEXT",
        }
    }

    /// True for comment states of any of the embedded grammars.
    pub fn is_comment(self) -> bool {
        matches!(
            self,
            State::HtmlComment | State::CssComment | State::JsLineComment | State::JsBlockComment
        )
    }
}

/// The HTML element whose tag or special content is being lexed.
///
/// `Normal` doubles as the out-of-element default; close tags and dynamic
/// element names also resolve to `Normal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "unstable_machinery_serde", derive(serde::Serialize))]
pub enum ElementKind {
    #[default]
    Normal,
    Script,
    Style,
    Textarea,
    Title,
    Listing,
    Xmp,
    Void,
}

impl ElementKind {
    /// Classifies a literal element name.
    pub fn for_tag_name(name: &str) -> ElementKind {
        if name.eq_ignore_ascii_case("script") {
            ElementKind::Script
        } else if name.eq_ignore_ascii_case("style") {
            ElementKind::Style
        } else if name.eq_ignore_ascii_case("textarea") {
            ElementKind::Textarea
        } else if name.eq_ignore_ascii_case("title") {
            ElementKind::Title
        } else if name.eq_ignore_ascii_case("listing") {
            ElementKind::Listing
        } else if name.eq_ignore_ascii_case("xmp") {
            ElementKind::Xmp
        } else if is_void_element(name) {
            ElementKind::Void
        } else {
            ElementKind::Normal
        }
    }

    /// The literal tag name that closes this element's special content.
    pub(crate) fn rcdata_tag_name(self) -> &'static str {
        match self {
            ElementKind::Textarea => "textarea",
            ElementKind::Title => "title",
            ElementKind::Listing => "listing",
            ElementKind::Xmp => "xmp",
            _ => "",
        }
    }

    fn packed(self) -> u32 {
        match self {
            ElementKind::Normal => 0,
            ElementKind::Script => 1,
            ElementKind::Style => 2,
            ElementKind::Textarea => 3,
            ElementKind::Title => 4,
            ElementKind::Listing => 5,
            ElementKind::Xmp => 6,
            ElementKind::Void => 7,
        }
    }

    fn name(self) -> &'static str {
        match self {
            ElementKind::Normal => "NORMAL",
            ElementKind::Script => "SCRIPT",
            ElementKind::Style => "STYLE",
            ElementKind::Textarea => "TEXTAREA",
            ElementKind::Title => "TITLE",
            ElementKind::Listing => "LISTING",
            ElementKind::Xmp => "XMP",
            ElementKind::Void => "VOID",
        }
    }
}

fn is_void_element(name: &str) -> bool {
    [
        "area", "base", "br", "col", "command", "embed", "hr", "img", "input", "keygen", "link",
        "meta", "param", "source", "track", "wbr",
    ]
    .iter()
    .any(|candidate| name.eq_ignore_ascii_case(candidate))
}

/// The embedded language of the attribute whose value is being lexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "unstable_machinery_serde", derive(serde::Serialize))]
pub enum AttrKind {
    #[default]
    None,
    Plaintext,
    Script,
    Style,
    Uri,
    Meta,
}

impl AttrKind {
    /// Classifies a literal attribute name.
    pub fn for_attr_name(name: &str) -> AttrKind {
        let lower = name.to_ascii_lowercase();
        if lower.starts_with("on") && lower.len() > 2 {
            AttrKind::Script
        } else if lower == "style" {
            AttrKind::Style
        } else if lower == "http-equiv" {
            AttrKind::Meta
        } else if is_uri_attr(&lower) {
            AttrKind::Uri
        } else {
            AttrKind::Plaintext
        }
    }

    fn packed(self) -> u32 {
        match self {
            AttrKind::None => 0,
            AttrKind::Plaintext => 1,
            AttrKind::Script => 2,
            AttrKind::Style => 3,
            AttrKind::Uri => 4,
            AttrKind::Meta => 5,
        }
    }

    fn name(self) -> &'static str {
        match self {
            AttrKind::None => "NONE",
            AttrKind::Plaintext => "PLAIN_TEXT",
            AttrKind::Script => "SCRIPT",
            AttrKind::Style => "STYLE",
            AttrKind::Uri => "URI",
            AttrKind::Meta => "META",
        }
    }
}

fn is_uri_attr(lower_name: &str) -> bool {
    matches!(
        lower_name,
        "action"
            | "archive"
            | "background"
            | "cite"
            | "classid"
            | "codebase"
            | "data"
            | "dsync"
            | "formaction"
            | "href"
            | "icon"
            | "longdesc"
            | "manifest"
            | "poster"
            | "src"
            | "usemap"
            | "xml:base"
    )
}

/// The delimiter that terminates the current attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "unstable_machinery_serde", derive(serde::Serialize))]
pub enum Delim {
    #[default]
    None,
    DoubleQuote,
    SingleQuote,
    SpaceOrTagEnd,
}

impl Delim {
    fn packed(self) -> u32 {
        match self {
            Delim::None => 0,
            Delim::DoubleQuote => 1,
            Delim::SingleQuote => 2,
            Delim::SpaceOrTagEnd => 3,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Delim::None => "NONE",
            Delim::DoubleQuote => "DOUBLE_QUOTE",
            Delim::SingleQuote => "SINGLE_QUOTE",
            Delim::SpaceOrTagEnd => "SPACE_OR_TAG_END",
        }
    }
}

/// Whether the next `/` in JS starts a RegExp literal or divides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "unstable_machinery_serde", derive(serde::Serialize))]
pub enum JsSlash {
    #[default]
    None,
    Regex,
    DivOp,
    Unknown,
}

impl JsSlash {
    fn packed(self) -> u32 {
        match self {
            JsSlash::None => 0,
            JsSlash::Regex => 1,
            JsSlash::DivOp => 2,
            JsSlash::Unknown => 3,
        }
    }

    fn name(self) -> &'static str {
        match self {
            JsSlash::None => "NONE",
            JsSlash::Regex => "REGEX",
            JsSlash::DivOp => "DIV_OP",
            JsSlash::Unknown => "UNKNOWN",
        }
    }
}

/// The part of a URI being lexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "unstable_machinery_serde", derive(serde::Serialize))]
pub enum UriPart {
    #[default]
    None,
    Start,
    PreQuery,
    Query,
    Fragment,
    UnknownPreFragment,
    Unknown,
    MaybeVariableScheme,
    MaybeSchemePart,
}

impl UriPart {
    fn packed(self) -> u32 {
        match self {
            UriPart::None => 0,
            UriPart::Start => 1,
            UriPart::PreQuery => 2,
            UriPart::Query => 3,
            UriPart::Fragment => 4,
            UriPart::UnknownPreFragment => 5,
            UriPart::Unknown => 6,
            UriPart::MaybeVariableScheme => 7,
            UriPart::MaybeSchemePart => 8,
        }
    }

    fn name(self) -> &'static str {
        match self {
            UriPart::None => "NONE",
            UriPart::Start => "START",
            UriPart::PreQuery => "PRE_QUERY",
            UriPart::Query => "QUERY",
            UriPart::Fragment => "FRAGMENT",
            UriPart::UnknownPreFragment => "UNKNOWN_PRE_FRAGMENT",
            UriPart::Unknown => "UNKNOWN",
            UriPart::MaybeVariableScheme => "MAYBE_VARIABLE_SCHEME",
            UriPart::MaybeSchemePart => "MAYBE_SCHEME_PART",
        }
    }

    /// Advances the part over one literal character.
    pub(crate) fn after_char(self, c: char) -> UriPart {
        match c {
            '#' => UriPart::Fragment,
            '?' => match self {
                UriPart::Start
                | UriPart::PreQuery
                | UriPart::UnknownPreFragment
                | UriPart::MaybeVariableScheme
                | UriPart::MaybeSchemePart => UriPart::Query,
                other => other,
            },
            _ => match self {
                UriPart::Start => UriPart::PreQuery,
                other => other,
            },
        }
    }
}

impl Context {
    /// The context rendering starts in: HTML PCDATA.
    pub fn html_pcdata() -> Context {
        Context::default()
    }

    /// The canonical context a strict block of `kind` starts in.
    pub fn start_for_kind(kind: ContentKind) -> Context {
        match kind {
            ContentKind::Html => Context::default(),
            ContentKind::Js => Context {
                state: State::Js,
                slash: JsSlash::Regex,
                ..Context::default()
            },
            ContentKind::Uri => Context {
                state: State::Uri,
                uri_part: UriPart::Start,
                ..Context::default()
            },
            ContentKind::Attributes => Context {
                state: State::HtmlTag,
                ..Context::default()
            },
            ContentKind::Css => Context {
                state: State::Css,
                ..Context::default()
            },
            ContentKind::Text => Context {
                state: State::Text,
                ..Context::default()
            },
        }
    }

    /// Loose check used at call sites: is this a reasonable context to
    /// interpolate content of `kind` into?  Sub-fields like the URI part or
    /// the attribute delimiter do not participate.
    pub fn is_valid_start_for_kind(self, kind: ContentKind) -> bool {
        match kind {
            ContentKind::Html => matches!(self.state, State::HtmlPcdata),
            ContentKind::Js => matches!(
                self.state,
                State::Js | State::JsDqString | State::JsSqString
            ),
            ContentKind::Uri => matches!(
                self.state,
                State::Uri | State::CssUri | State::CssDqUri | State::CssSqUri
            ),
            ContentKind::Attributes => matches!(self.state, State::HtmlTag),
            ContentKind::Css => matches!(self.state, State::Css),
            ContentKind::Text => matches!(self.state, State::Text),
        }
    }

    /// Exact check that a strict block of `kind` ended in a canonical
    /// terminal context.
    pub fn is_valid_end_for_kind(self, kind: ContentKind) -> bool {
        match kind {
            ContentKind::Html => self == Context::default(),
            // A `/` after the block output is ambiguous either way, so any
            // slash value is accepted at the end of a js block.
            ContentKind::Js => {
                self.state == State::Js && self.delim == Delim::None && self.attr == AttrKind::None
            }
            ContentKind::Uri => {
                self.state == State::Uri
                    && self.delim == Delim::None
                    && !matches!(self.uri_part, UriPart::Start | UriPart::None)
            }
            // Ending with a valueless attribute (`... checked`) is fine,
            // ending inside a value or with an unquoted value is not.
            ContentKind::Attributes => {
                matches!(self.state, State::HtmlTag | State::HtmlAttrName)
                    && self.delim == Delim::None
                    && self.element == ElementKind::Normal
            }
            ContentKind::Css => self.state == State::Css && self.delim == Delim::None,
            ContentKind::Text => self.state == State::Text,
        }
    }

    /// The context inside an attribute value that was committed to the
    /// unquoted form, derived from a `HtmlBeforeAttrValue` context.
    pub(crate) fn unquoted_attr_value_context(self) -> Context {
        self.attr_value_context(Delim::SpaceOrTagEnd)
    }

    /// The context at the start of an attribute value with the given
    /// delimiter.
    pub(crate) fn attr_value_context(self, delim: Delim) -> Context {
        let mut ctx = Context {
            state: State::HtmlNormalAttrValue,
            element: self.element,
            attr: self.attr,
            delim,
            slash: JsSlash::None,
            uri_part: UriPart::None,
        };
        match self.attr {
            AttrKind::Script => {
                ctx.state = State::Js;
                ctx.slash = JsSlash::Regex;
            }
            AttrKind::Style => ctx.state = State::Css,
            AttrKind::Uri => {
                ctx.state = State::Uri;
                ctx.uri_part = UriPart::Start;
            }
            AttrKind::None | AttrKind::Plaintext | AttrKind::Meta => {}
        }
        ctx
    }

    /// The context after the current attribute value ended, back in the
    /// containing tag.
    pub(crate) fn end_of_attr_context(self) -> Context {
        Context {
            state: State::HtmlTag,
            element: self.element,
            ..Context::default()
        }
    }

    /// The context after a dynamic value (print or strict call result) was
    /// emitted.
    pub(crate) fn after_dynamic_value(self) -> Context {
        let mut ctx = self;
        match self.state {
            // A dynamic value is assumed to be a complete expression, after
            // which a slash divides.
            State::Js => ctx.slash = JsSlash::DivOp,
            // A dynamic attribute set leaves the lexer where a following
            // `="..."` or `>` still parses.
            State::HtmlTag => {
                ctx.state = State::HtmlAttrName;
                ctx.attr = AttrKind::Plaintext;
            }
            State::HtmlBeforeTagName => ctx.state = State::HtmlTagName,
            // Committing to an unquoted attribute value.
            State::HtmlBeforeAttrValue => {
                ctx = self.unquoted_attr_value_context();
                ctx = ctx.after_dynamic_value();
            }
            State::Uri | State::CssUri | State::CssDqUri | State::CssSqUri => {
                if ctx.uri_part == UriPart::Start {
                    ctx.uri_part = UriPart::PreQuery;
                }
            }
            _ => {}
        }
        ctx
    }

    /// Joins the contexts at the ends of two parallel control-flow
    /// branches.  Returns `None` when no widened context exists.
    pub fn join(a: Context, b: Context) -> Option<Context> {
        if a == b {
            return Some(a);
        }

        let mut wa = a;
        let mut wb = b;
        if wa.slash != wb.slash {
            wa.slash = JsSlash::Unknown;
            wb.slash = JsSlash::Unknown;
        }
        if wa.uri_part != wb.uri_part {
            let widened = join_uri_parts(wa.uri_part, wb.uri_part);
            wa.uri_part = widened;
            wb.uri_part = widened;
        }
        if wa == wb {
            return Some(wa);
        }

        // A tag name, a valueless attribute name and an unquoted attribute
        // value all converge with the surrounding tag once a space is
        // seen, so such pairs are joinable at the tag context.
        let pa = wa.after_space_projection();
        let pb = wb.after_space_projection();
        match (pa, pb) {
            (Some(p), _) if p == wb => Some(wb),
            (_, Some(p)) if p == wa => Some(wa),
            (Some(p), Some(q)) if p == q => Some(p),
            _ => None,
        }
    }

    fn after_space_projection(self) -> Option<Context> {
        if self.state == State::HtmlTagName
            || self.state == State::HtmlAttrName
            || self.delim == Delim::SpaceOrTagEnd
        {
            Some(self.end_of_attr_context())
        } else {
            None
        }
    }

    /// A stable encoding of this context, used to suffix derivative
    /// template names (`__C<hex>`).
    pub fn packed(self) -> u32 {
        self.state.packed()
            | self.element.packed() << 5
            | self.attr.packed() << 8
            | self.delim.packed() << 11
            | self.slash.packed() << 13
            | self.uri_part.packed() << 15
    }

    /// The name suffix for a derivative template inferred at this start
    /// context.
    pub fn derivative_suffix(self) -> String {
        format!("__C{:x}", self.packed())
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        ok!(write!(f, "{}", self.state.name()));
        if self.element != ElementKind::Normal {
            ok!(write!(f, " {}", self.element.name()));
        }
        if self.attr != AttrKind::None {
            ok!(write!(f, " {}", self.attr.name()));
        }
        if self.delim != Delim::None {
            ok!(write!(f, " {}", self.delim.name()));
        }
        if self.slash != JsSlash::None {
            ok!(write!(f, " {}", self.slash.name()));
        }
        if self.uri_part != UriPart::None {
            ok!(write!(f, " {}", self.uri_part.name()));
        }
        Ok(())
    }
}

fn join_uri_parts(a: UriPart, b: UriPart) -> UriPart {
    let pre_fragment = |part: UriPart| {
        matches!(
            part,
            UriPart::Start | UriPart::PreQuery | UriPart::Query | UriPart::UnknownPreFragment
        )
    };
    if pre_fragment(a) && pre_fragment(b) {
        UriPart::UnknownPreFragment
    } else {
        UriPart::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_suffixes() {
        let js_sq = Context {
            state: State::JsSqString,
            ..Context::default()
        };
        assert_eq!(js_sq.derivative_suffix(), "__C14");

        let script_start = Context::start_for_kind(ContentKind::Js);
        assert_eq!(script_start.derivative_suffix(), "__C2010");

        let title = Context {
            state: State::HtmlRcdata,
            element: ElementKind::Title,
            ..Context::default()
        };
        assert_eq!(title.derivative_suffix(), "__C81");
    }

    #[test]
    fn test_join_widens_slash() {
        let div = Context {
            state: State::Js,
            slash: JsSlash::DivOp,
            ..Context::default()
        };
        let regex = Context {
            state: State::Js,
            slash: JsSlash::Regex,
            ..Context::default()
        };
        let joined = Context::join(div, regex).unwrap();
        assert_eq!(joined.slash, JsSlash::Unknown);
    }

    #[test]
    fn test_join_unquoted_attr_with_tag() {
        let tag = Context {
            state: State::HtmlTag,
            ..Context::default()
        };
        let attr_name = Context {
            state: State::HtmlAttrName,
            attr: AttrKind::Plaintext,
            ..Context::default()
        };
        assert_eq!(Context::join(attr_name, tag), Some(tag));

        let unquoted = Context {
            state: State::HtmlNormalAttrValue,
            attr: AttrKind::Plaintext,
            delim: Delim::SpaceOrTagEnd,
            ..Context::default()
        };
        assert_eq!(Context::join(unquoted, tag), Some(tag));
    }

    #[test]
    fn test_join_uri_parts() {
        let query = Context {
            state: State::Uri,
            delim: Delim::DoubleQuote,
            attr: AttrKind::Uri,
            uri_part: UriPart::Query,
            ..Context::default()
        };
        let pre_query = Context {
            uri_part: UriPart::PreQuery,
            ..query
        };
        let joined = Context::join(query, pre_query).unwrap();
        assert_eq!(joined.uri_part, UriPart::UnknownPreFragment);

        let fragment = Context {
            uri_part: UriPart::Fragment,
            ..query
        };
        let joined = Context::join(joined, fragment).unwrap();
        assert_eq!(joined.uri_part, UriPart::Unknown);
    }
}
