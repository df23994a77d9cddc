//! <strong>minisoy: a contextual autoescaping rewriter for Closure-style
//! templates with minimal dependencies</strong>
//!
//! This crate takes a parsed set of templates written with typed
//! interpolation points (`{$var}`) and control-flow commands (`{if}`,
//! `{foreach}`, `{call}`, ...) and rewrites it so that every interpolation
//! carries exactly the escaping directives its surrounding HTML, CSS, JS
//! or URI context requires.  The rendered output is then safe against
//! cross-site scripting no matter what untrusted values are interpolated.
//!
//! The rewriter is a static pass: it performs no I/O, evaluates no
//! expressions and renders nothing.  It threads a small lexical context
//! value through every template body, joins contexts across branches,
//! specializes callees per call-site context (producing derivative
//! templates with `__C<hex>` name suffixes), and enforces the strict mode
//! contract of `kind`-typed templates and blocks.
//!
//! # Example
//!
//! ```
//! use minisoy::{parse_file, rewrite, file_to_source, DirectiveRegistry, FileSet};
//!
//! let source = "{namespace ns}\n\n\
//!               {template foo autoescape=\"deprecated-contextual\"}\n\
//!               Hello, {$world}!\n\
//!               {/template}";
//! let mut files = FileSet::new();
//! files.add_file(parse_file(source, "example.soy").unwrap());
//! rewrite(&mut files, &DirectiveRegistry::new()).unwrap();
//! assert!(file_to_source(&files.files[0]).contains("{$world |escapeHtml}"));
//! ```
//!
//! # Errors
//!
//! Failures carry a stable [`ErrorKind`], the file, line and column, the
//! template name and a rendered snippet of the offending command.  With
//! the default `debug` feature the source lines around the failure are
//! rendered into the alternate `Display`/`Debug` output.

#![cfg_attr(docsrs, feature(doc_cfg))]

#[macro_use]
mod macros;

pub mod ast;
pub mod context;
#[cfg(feature = "debug")]
mod debug;
mod directive;
mod error;
mod escaping;
mod infer;
pub mod parse;
mod rawtext;
mod rewrite;
mod sanity;
mod to_source;

pub use self::ast::{AutoescapeMode, ContentKind, FileSet, SoyFile, Span, Template};
pub use self::directive::{DirectiveRegistry, PrintDirective};
pub use self::error::{Error, ErrorKind};
pub use self::escaping::{escapers_for, EscapingMode};
pub use self::parse::parse_file;
pub use self::rawtext::process_raw_text;
pub use self::rewrite::rewrite;
pub use self::sanity::check_escaping_sanity;
pub use self::to_source::{file_to_source, node_to_source, template_to_source};
