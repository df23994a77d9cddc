use std::borrow::Cow;
use std::fmt;

use crate::ast::Span;

/// Represents autoescaping errors.
///
/// If debug mode is enabled an error contains additional debug
/// information that can be displayed by formatting an error with the
/// alternative formatting (``format!("{:#}", err)``).  That information
/// is also shown for the [`Debug`] display where the extended information
/// is hidden when the alternative formatting is used.
///
/// Errors raised while a derivative template is inferred are re-raised at
/// the originating call site; the callee failure stays reachable through
/// the standard error chain ([`std::error::Error::source`]).
pub struct Error {
    repr: Box<ErrorRepr>,
}

/// The internal error data
struct ErrorRepr {
    kind: ErrorKind,
    detail: Option<Cow<'static, str>>,
    name: Option<String>,
    template: Option<String>,
    lineno: usize,
    col: usize,
    span: Option<Span>,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
    #[cfg(feature = "debug")]
    debug_info: Option<crate::debug::DebugInfo>,
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut err = f.debug_struct("Error");
        err.field("kind", &self.kind());
        if let Some(ref detail) = self.repr.detail {
            err.field("detail", detail);
        }
        if let Some(ref name) = self.name() {
            err.field("name", name);
        }
        if let Some(ref template) = self.template() {
            err.field("template", template);
        }
        if let Some(line) = self.line() {
            err.field("line", &line);
        }
        if let Some(ref source) = std::error::Error::source(self) {
            err.field("source", source);
        }
        ok!(err.finish());

        // because errors are commonly just unwrapped in tests and small
        // tools it's quite useful to spit out the debug info following the
        // error struct dump.
        #[cfg(feature = "debug")]
        {
            if !f.alternate() {
                if let Some(info) = self.debug_info() {
                    ok!(writeln!(f));
                    ok!(crate::debug::render_debug_info(
                        f,
                        self.name(),
                        self.kind(),
                        self.line(),
                        self.span(),
                        info,
                    ));
                    ok!(writeln!(f));
                }
            }
        }

        Ok(())
    }
}

/// An enum describing the error kind.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The template has a syntax error.
    SyntaxError,
    /// Branches of `{if}`/`{switch}` end in incompatible contexts.
    AmbiguousBranches,
    /// A `{for}`/`{foreach}` body does not round-trip the context.
    LoopChangesContext,
    /// A literal `/` follows branches with different JS slash values.
    AmbiguousJsSlash,
    /// A print in a URI whose part cannot be determined.
    AmbiguousUriPart,
    /// The user supplied directives that cannot satisfy the context.
    IncompatibleEscapingMode,
    /// An interpolation inside an HTML/CSS/JS comment.
    DirectiveInComment,
    /// A strict block's end context does not match its kind.
    StrictBlockBadEnd,
    /// An autoescape-cancelling directive in strict scope.
    StrictForbidsCancellingDirective,
    /// A call to a non-strict template from strict scope.
    StrictForbidsNonStrictCall,
    /// A call to a strict template from an incompatible context.
    IncompatibleCallKind,
    /// A `{msg}` in a context where translators cannot write text.
    MessageForbiddenInContext,
    /// An untyped block begins or ends outside HTML.
    BlockBadEnd,
    /// A block `{let}`/`{param}` without `kind` under strict.
    MissingKindInStrict,
    /// Use of the compiler-reserved `|text` directive.
    ReservedDirective,
    /// A typed block in a no-autoescape template.
    TypedBlockInNoAutoescape,
}

impl ErrorKind {
    fn description(self) -> &'static str {
        match self {
            ErrorKind::SyntaxError => "syntax error",
            ErrorKind::AmbiguousBranches => "branches end in different contexts",
            ErrorKind::LoopChangesContext => "loop changes context",
            ErrorKind::AmbiguousJsSlash => "ambiguous JS slash",
            ErrorKind::AmbiguousUriPart => "ambiguous URI part",
            ErrorKind::IncompatibleEscapingMode => "incompatible escaping modes",
            ErrorKind::DirectiveInComment => "interpolation inside comment",
            ErrorKind::StrictBlockBadEnd => "strict block ends in wrong context",
            ErrorKind::StrictForbidsCancellingDirective => {
                "autoescape-cancelling directive in strict scope"
            }
            ErrorKind::StrictForbidsNonStrictCall => "call to non-strict template",
            ErrorKind::IncompatibleCallKind => "call from incompatible context",
            ErrorKind::MessageForbiddenInContext => "message not supported in this context",
            ErrorKind::BlockBadEnd => "block ends in wrong context",
            ErrorKind::MissingKindInStrict => "block without kind in strict scope",
            ErrorKind::ReservedDirective => "reserved directive",
            ErrorKind::TypedBlockInNoAutoescape => "typed block in non-autoescaped template",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref detail) = self.repr.detail {
            ok!(write!(f, "{}: {}", self.kind(), detail));
        } else {
            ok!(write!(f, "{}", self.kind()));
        }
        if let Some(ref filename) = self.name() {
            ok!(write!(
                f,
                " (in {}:{}:{}",
                filename,
                self.repr.lineno,
                self.repr.col
            ));
            if let Some(ref template) = self.template() {
                ok!(write!(f, ", template {template}"));
            }
            ok!(write!(f, ")"));
        }
        #[cfg(feature = "debug")]
        {
            if f.alternate() {
                if let Some(info) = self.debug_info() {
                    ok!(crate::debug::render_debug_info(
                        f,
                        self.name(),
                        self.kind(),
                        self.line(),
                        self.span(),
                        info,
                    ));
                }
            }
        }
        Ok(())
    }
}

impl Error {
    /// Creates a new error with kind and detail.
    pub fn new<D: Into<Cow<'static, str>>>(kind: ErrorKind, detail: D) -> Error {
        Error {
            repr: Box::new(ErrorRepr {
                kind,
                detail: Some(detail.into()),
                name: None,
                template: None,
                lineno: 0,
                col: 0,
                span: None,
                source: None,
                #[cfg(feature = "debug")]
                debug_info: None,
            }),
        }
    }

    pub(crate) fn set_filename_and_span(&mut self, filename: &str, span: Span) {
        self.repr.name = Some(filename.into());
        self.repr.span = Some(span);
        self.repr.lineno = span.start_line as usize;
        self.repr.col = span.start_col as usize;
    }

    pub(crate) fn set_template(&mut self, template: &str) {
        self.repr.template = Some(template.into());
    }

    pub(crate) fn has_location(&self) -> bool {
        self.repr.lineno > 0
    }

    /// Attaches location data unless the error already carries some.
    ///
    /// Inference errors are created where the offending node is visited and
    /// then annotated on the way out of the template, so the innermost
    /// location always wins.
    pub(crate) fn maybe_locate(mut self, filename: &str, template: &str, span: Span) -> Error {
        if !self.has_location() {
            self.set_filename_and_span(filename, span);
        }
        if self.repr.template.is_none() {
            self.set_template(template);
        }
        self
    }

    /// Attaches another error as source to this error.
    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.repr.source = Some(Box::new(source));
        self
    }

    /// Returns the error kind
    pub fn kind(&self) -> ErrorKind {
        self.repr.kind
    }

    /// Returns the detail message if available.
    pub fn detail(&self) -> Option<&str> {
        self.repr.detail.as_deref()
    }

    /// Returns the filename of the template file that caused the error.
    pub fn name(&self) -> Option<&str> {
        self.repr.name.as_deref()
    }

    /// Returns the name of the template that caused the error.
    pub fn template(&self) -> Option<&str> {
        self.repr.template.as_deref()
    }

    /// Returns the line number where the error occurred.
    pub fn line(&self) -> Option<usize> {
        if self.repr.lineno > 0 {
            Some(self.repr.lineno)
        } else {
            None
        }
    }

    /// Returns the column where the error occurred.
    pub fn column(&self) -> Option<usize> {
        if self.repr.lineno > 0 {
            Some(self.repr.col)
        } else {
            None
        }
    }

    /// Returns the span where the error occurred.
    #[allow(unused)]
    pub(crate) fn span(&self) -> Option<Span> {
        self.repr.span
    }

    /// Returns the template debug information if available.
    ///
    /// The debug info snapshot is only embedded into the error if the
    /// `debug` feature is enabled.
    #[cfg(feature = "debug")]
    #[cfg_attr(docsrs, doc(cfg(feature = "debug")))]
    pub(crate) fn debug_info(&self) -> Option<&crate::debug::DebugInfo> {
        self.repr.debug_info.as_ref()
    }

    #[cfg(feature = "debug")]
    pub(crate) fn attach_debug_info(&mut self, value: crate::debug::DebugInfo) {
        self.repr.debug_info = Some(value);
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.repr.source.as_ref().map(|err| err.as_ref() as _)
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error {
            repr: Box::new(ErrorRepr {
                kind,
                detail: None,
                name: None,
                template: None,
                lineno: 0,
                col: 0,
                span: None,
                source: None,
                #[cfg(feature = "debug")]
                debug_info: None,
            }),
        }
    }
}

pub fn attach_basic_debug_info<T>(rv: Result<T, Error>, source: &str) -> Result<T, Error> {
    #[cfg(feature = "debug")]
    {
        match rv {
            Ok(rv) => Ok(rv),
            Err(mut err) => {
                err.attach_debug_info(crate::debug::DebugInfo {
                    template_source: Some(source.to_string()),
                });
                Err(err)
            }
        }
    }
    #[cfg(not(feature = "debug"))]
    {
        let _source = source;
        rv
    }
}
