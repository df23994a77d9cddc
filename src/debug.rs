use std::fmt;

use crate::ast::Span;
use crate::error::ErrorKind;

/// This is a snapshot of the debug information.
#[cfg_attr(docsrs, doc(cfg(feature = "debug")))]
#[derive(Default)]
pub(crate) struct DebugInfo {
    pub(crate) template_source: Option<String>,
}

impl DebugInfo {
    /// If available this contains a reference to the source string.
    pub fn source(&self) -> Option<&str> {
        self.template_source.as_deref()
    }
}

pub(super) fn render_debug_info(
    f: &mut fmt::Formatter,
    name: Option<&str>,
    kind: ErrorKind,
    line: Option<usize>,
    span: Option<Span>,
    info: &DebugInfo,
) -> fmt::Result {
    if let Some(source) = info.source() {
        let title = format!(
            " {} ",
            name.unwrap_or_default()
                .rsplit(&['/', '\\'])
                .next()
                .unwrap_or("Template Source")
        );
        writeln!(f)?;
        writeln!(f, "{:-^1$}", title, 79)?;
        let lines: Vec<_> = source.lines().enumerate().collect();
        let idx = line.unwrap_or(1).saturating_sub(1);
        let skip = idx.saturating_sub(3);
        let pre = lines.iter().skip(skip).take(3.min(idx)).collect::<Vec<_>>();
        let post = lines.iter().skip(idx + 1).take(3).collect::<Vec<_>>();
        for (idx, line) in pre {
            writeln!(f, "{:>4} | {}", idx + 1, line)?;
        }

        if let Some(&(_, line)) = lines.get(idx) {
            writeln!(f, "{:>4} > {}", idx + 1, line)?;
            if let Some(span) = span {
                if span.start_line == span.end_line {
                    writeln!(
                        f,
                        "     i {}{} {}",
                        " ".repeat(span.start_col as usize),
                        "^".repeat((span.end_col.saturating_sub(span.start_col)).max(1) as usize),
                        kind,
                    )?;
                }
            }
        }

        for (idx, line) in post {
            writeln!(f, "{:>4} | {}", idx + 1, line)?;
        }
        write!(f, "{:~^1$}", "", 79)?;
    }
    Ok(())
}
