//! Diagnostics: severities, accumulation, and the never-throw policy.
//!
//! Passes do not propagate user errors as `Result`s. They record diagnostics
//! through the [`Reporter`], which bumps the owning lex-file's counters, and
//! the pass driver checks the totals between passes. Only `Internal`
//! severity aborts: it marks a violated compiler invariant, not bad input.

use std::fmt;

use crate::origin::{LexFiles, Origin};

/// Diagnostic severity.
///
/// `Internal` is for compiler bugs and aborts the pipeline; `Error` marks
/// ill-formed input (code emission is suppressed); `Warning` is dubious but
/// tolerable; `Message` is informational trace output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Internal,
    Error,
    Warning,
    Message,
}

/// A single recorded diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub origin: Option<Origin>,
    pub message: String,
}

impl Diagnostic {
    /// Renders the diagnostic with its file/line prefix resolved.
    #[must_use]
    pub fn render(&self, files: &LexFiles) -> String {
        match self.origin {
            Some(org) if org.line > 0 => {
                format!("{}:{}: {}: {}", files.name_of(org.file), org.line, self.severity, self.message)
            }
            Some(org) => format!("{}: {}: {}", files.name_of(org.file), self.severity, self.message),
            None => format!("{}: {}", self.severity, self.message),
        }
    }
}

/// Accumulates diagnostics for one compilation.
///
/// Holds its own totals in addition to the per-file counters so callers that
/// report without an origin (driver-level failures) are still counted.
#[derive(Debug, Default)]
pub struct Reporter {
    diagnostics: Vec<Diagnostic>,
    errors: u32,
    warnings: u32,
}

impl Reporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a diagnostic, bumping the relevant counters.
    ///
    /// # Panics
    /// `Internal` severity marks a violated compiler invariant: the
    /// diagnostic is recorded, then the pipeline aborts.
    pub fn report(&mut self, files: &mut LexFiles, severity: Severity, origin: Option<Origin>, message: String) {
        match severity {
            Severity::Error => {
                self.errors += 1;
                if let Some(org) = origin
                    && org.file != crate::origin::LexFileId::BUILTIN
                {
                    files.get_mut(org.file).errcount += 1;
                }
            }
            Severity::Warning => {
                self.warnings += 1;
                if let Some(org) = origin
                    && org.file != crate::origin::LexFileId::BUILTIN
                {
                    files.get_mut(org.file).warncount += 1;
                }
            }
            Severity::Internal | Severity::Message => {}
        }
        let rendered = if severity == Severity::Internal {
            Some(message.clone())
        } else {
            None
        };
        self.diagnostics.push(Diagnostic {
            severity,
            origin,
            message,
        });
        if let Some(message) = rendered {
            panic!("internal error: {message}");
        }
    }

    /// Total errors recorded so far.
    #[must_use]
    pub fn error_count(&self) -> u32 {
        self.errors
    }

    /// Total warnings recorded so far.
    #[must_use]
    pub fn warning_count(&self) -> u32 {
        self.warnings
    }

    /// All diagnostics in recording order.
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Renders every diagnostic, one per line.
    #[must_use]
    pub fn render_all(&self, files: &LexFiles) -> String {
        let mut out = String::new();
        for diag in &self.diagnostics {
            out.push_str(&diag.render(files));
            out.push('\n');
        }
        out
    }
}

/// Error returned by the driver when compilation cannot proceed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// Input errors were recorded; code emission suppressed.
    ErrorsReported { pass: &'static str, count: u32 },
    /// The source file could not be matched to a front-end.
    UnknownExtension { filename: String },
    /// An I/O or side-file problem outside the tree pipeline.
    External(String),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ErrorsReported { pass, count } => {
                write!(f, "{count} error(s) after {pass} pass, stopping")
            }
            Self::UnknownExtension { filename } => {
                write!(f, "no front-end handles {filename}")
            }
            Self::External(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for CompileError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_per_file() {
        let mut files = LexFiles::new();
        let id = files.open("t.gpp");
        let mut rep = Reporter::new();
        rep.report(&mut files, Severity::Error, Some(Origin::new(id, 3)), "bad".into());
        rep.report(&mut files, Severity::Warning, Some(Origin::new(id, 4)), "odd".into());
        rep.report(&mut files, Severity::Message, None, "note".into());

        assert_eq!(rep.error_count(), 1);
        assert_eq!(rep.warning_count(), 1);
        assert_eq!(files.get(id).errcount, 1);
        assert_eq!(files.get(id).warncount, 1);
        assert_eq!(rep.diagnostics().len(), 3);
    }

    #[test]
    fn test_render_with_line() {
        let mut files = LexFiles::new();
        let id = files.open("t.gpp");
        let diag = Diagnostic {
            severity: Severity::Error,
            origin: Some(Origin::new(id, 12)),
            message: "unexpected outdent".into(),
        };
        assert_eq!(diag.render(&files), "t.gpp:12: error: unexpected outdent");
    }
}
