use crate::context::{Context, Delim, State, UriPart};
use crate::error::{Error, ErrorKind};

/// The escaping and filtering transformations the rewriter knows how to
/// insert.
///
/// Each mode corresponds to a print directive the runtime provides.  The
/// rewriter only deals in their names and a few static properties; the
/// actual string transformations live with the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "unstable_machinery_serde", derive(serde::Serialize))]
pub enum EscapingMode {
    EscapeHtml,
    EscapeHtmlRcdata,
    EscapeHtmlAttribute,
    EscapeHtmlAttributeNospace,
    FilterHtmlElementName,
    FilterHtmlAttributes,
    EscapeJsString,
    EscapeJsValue,
    EscapeJsRegex,
    EscapeCssString,
    FilterCssValue,
    EscapeUri,
    NormalizeUri,
    FilterNormalizeUri,
    /// Reserved for compiler-inserted coercion in `kind="text"` blocks.
    Text,
}

impl EscapingMode {
    /// The print directive name (without the leading `|`).
    pub fn directive_name(self) -> &'static str {
        match self {
            EscapingMode::EscapeHtml => "escapeHtml",
            EscapingMode::EscapeHtmlRcdata => "escapeHtmlRcdata",
            EscapingMode::EscapeHtmlAttribute => "escapeHtmlAttribute",
            EscapingMode::EscapeHtmlAttributeNospace => "escapeHtmlAttributeNospace",
            EscapingMode::FilterHtmlElementName => "filterHtmlElementName",
            EscapingMode::FilterHtmlAttributes => "filterHtmlAttributes",
            EscapingMode::EscapeJsString => "escapeJsString",
            EscapingMode::EscapeJsValue => "escapeJsValue",
            EscapingMode::EscapeJsRegex => "escapeJsRegex",
            EscapingMode::EscapeCssString => "escapeCssString",
            EscapingMode::FilterCssValue => "filterCssValue",
            EscapingMode::EscapeUri => "escapeUri",
            EscapingMode::NormalizeUri => "normalizeUri",
            EscapingMode::FilterNormalizeUri => "filterNormalizeUri",
            EscapingMode::Text => "text",
        }
    }

    /// Looks a mode up by its directive name.
    pub fn from_directive_name(name: &str) -> Option<EscapingMode> {
        Some(match name {
            "escapeHtml" => EscapingMode::EscapeHtml,
            "escapeHtmlRcdata" => EscapingMode::EscapeHtmlRcdata,
            "escapeHtmlAttribute" => EscapingMode::EscapeHtmlAttribute,
            "escapeHtmlAttributeNospace" => EscapingMode::EscapeHtmlAttributeNospace,
            "filterHtmlElementName" => EscapingMode::FilterHtmlElementName,
            "filterHtmlAttributes" => EscapingMode::FilterHtmlAttributes,
            "escapeJsString" => EscapingMode::EscapeJsString,
            "escapeJsValue" => EscapingMode::EscapeJsValue,
            "escapeJsRegex" => EscapingMode::EscapeJsRegex,
            "escapeCssString" => EscapingMode::EscapeCssString,
            "filterCssValue" => EscapingMode::FilterCssValue,
            "escapeUri" => EscapingMode::EscapeUri,
            "normalizeUri" => EscapingMode::NormalizeUri,
            "filterNormalizeUri" => EscapingMode::FilterNormalizeUri,
            "text" => EscapingMode::Text,
            _ => return None,
        })
    }

    /// Whether the mode's output can be embedded into an HTML attribute
    /// without a further attribute escape.
    pub fn is_html_embeddable(self) -> bool {
        matches!(
            self,
            EscapingMode::EscapeHtml
                | EscapingMode::EscapeHtmlRcdata
                | EscapingMode::EscapeHtmlAttribute
                | EscapingMode::EscapeHtmlAttributeNospace
                | EscapingMode::FilterHtmlElementName
                | EscapingMode::FilterHtmlAttributes
                | EscapingMode::EscapeUri
        )
    }
}

/// Computes the ordered list of escaping modes a dynamic value printed in
/// `ctx` requires.
pub fn escapers_for(ctx: Context) -> Result<Vec<EscapingMode>, Error> {
    if ctx.state.is_comment() {
        return Err(Error::new(
            ErrorKind::DirectiveInComment,
            "Don't put {print} or {call} inside comments",
        ));
    }

    let mut modes = match ctx.state {
        State::HtmlPcdata => vec![EscapingMode::EscapeHtml],
        State::HtmlRcdata => vec![EscapingMode::EscapeHtmlRcdata],
        State::HtmlBeforeTagName | State::HtmlTagName => {
            vec![EscapingMode::FilterHtmlElementName]
        }
        State::HtmlTag | State::HtmlAttrName => vec![EscapingMode::FilterHtmlAttributes],
        // an unquoted value begins at the dynamic value
        State::HtmlBeforeAttrValue => {
            return escapers_for(ctx.unquoted_attr_value_context());
        }
        State::HtmlNormalAttrValue => vec![],
        State::Css => vec![EscapingMode::FilterCssValue],
        State::CssDqString | State::CssSqString => vec![EscapingMode::EscapeCssString],
        State::Js => vec![EscapingMode::EscapeJsValue],
        State::JsDqString | State::JsSqString => vec![EscapingMode::EscapeJsString],
        State::JsRegex => vec![EscapingMode::EscapeJsRegex],
        State::Uri | State::CssUri | State::CssDqUri | State::CssSqUri => {
            ok!(uri_escapers(ctx))
        }
        State::Text => vec![EscapingMode::Text],
        State::HtmlComment
        | State::CssComment
        | State::JsLineComment
        | State::JsBlockComment => unreachable!("comment states rejected above"),
    };

    // Inside an attribute the value must additionally survive the HTML
    // attribute grammar, unless the last escaper's output already does.
    if ctx.delim != Delim::None && !modes.last().copied().is_some_and(|m| m.is_html_embeddable()) {
        modes.push(if ctx.delim == Delim::SpaceOrTagEnd {
            EscapingMode::EscapeHtmlAttributeNospace
        } else {
            EscapingMode::EscapeHtmlAttribute
        });
    }

    Ok(modes)
}

fn uri_escapers(ctx: Context) -> Result<Vec<EscapingMode>, Error> {
    Ok(match ctx.uri_part {
        UriPart::Start | UriPart::MaybeVariableScheme | UriPart::MaybeSchemePart => {
            vec![EscapingMode::FilterNormalizeUri]
        }
        UriPart::PreQuery => vec![EscapingMode::NormalizeUri],
        UriPart::Query => vec![EscapingMode::EscapeUri],
        // the fragment cannot change where the URI leads; the attribute
        // escape (appended by the caller) is all a delimited value needs
        UriPart::Fragment => {
            if ctx.delim != Delim::None {
                vec![]
            } else {
                vec![EscapingMode::EscapeUri]
            }
        }
        UriPart::Unknown | UriPart::UnknownPreFragment => {
            return Err(Error::new(
                ErrorKind::AmbiguousUriPart,
                "Cannot determine which part of the URL this is in",
            ));
        }
        UriPart::None => vec![EscapingMode::FilterNormalizeUri],
    })
}

/// Whether a user-written escaping directive satisfies the context.
///
/// A directive passes if it is one of the modes the context requires
/// anyway, or if its output alphabet is safe regardless of context (full
/// percent-encoding).
pub fn is_compatible(ctx: Context, mode: EscapingMode, required: &[EscapingMode]) -> bool {
    if required.contains(&mode) {
        return true;
    }
    if mode == EscapingMode::EscapeUri {
        let string_like = matches!(
            ctx.state,
            State::JsDqString
                | State::JsSqString
                | State::CssDqString
                | State::CssSqString
                | State::Uri
                | State::CssUri
                | State::CssDqUri
                | State::CssSqUri
                | State::HtmlNormalAttrValue
        ) || ctx.delim != Delim::None;
        if string_like {
            return true;
        }
    }
    false
}
