//! Diagnostics.
//!
//! The front end reports through an injectable `Reporter`; it never prints
//! directly. A recoverable problem is reported and counted, and the pass
//! keeps going so the user sees as many diagnostics as possible; the final
//! pass/fail state of a translation unit is just "were any errors counted".
//!
//! A diagnostic whose mark has an expansion chain gets one
//! "in expansion of macro" note per chain level, innermost first.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::file_dir::FileDir;
use crate::mark::Mark;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
        })
    }
}

pub struct Diagnostic {
    pub severity: Severity,
    pub mark: Option<Mark>,
    pub message: String,
}

pub trait Reporter {
    fn report(&self, diag: &Diagnostic);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WarnOpts {
    pub all: bool,
    pub extra: bool,
    pub error: bool,
}

/// Shared handle to the diagnostic state of one driver run.
#[derive(Clone)]
pub struct DiagCtx {
    inner: Rc<DiagInner>,
}

struct DiagInner {
    reporter: Box<dyn Reporter>,
    warn_opts: WarnOpts,
    errors: Cell<usize>,
    warnings: Cell<usize>,
}

impl DiagCtx {
    pub fn new(reporter: Box<dyn Reporter>, warn_opts: WarnOpts) -> DiagCtx {
        DiagCtx {
            inner: Rc::new(DiagInner {
                reporter,
                warn_opts,
                errors: Cell::new(0),
                warnings: Cell::new(0),
            }),
        }
    }

    pub fn error(&self, mark: Option<&Mark>, message: impl Into<String>) {
        self.inner.errors.set(self.inner.errors.get() + 1);
        self.emit(Severity::Error, mark, message.into());
    }

    pub fn warn(&self, mark: Option<&Mark>, message: impl Into<String>) {
        if self.inner.warn_opts.error {
            self.error(mark, message);
            return;
        }
        self.inner.warnings.set(self.inner.warnings.get() + 1);
        self.emit(Severity::Warning, mark, message.into());
    }

    pub fn note(&self, mark: Option<&Mark>, message: impl Into<String>) {
        self.emit(Severity::Note, mark, message.into());
    }

    fn emit(&self, severity: Severity, mark: Option<&Mark>, message: String) {
        self.inner.reporter.report(&Diagnostic {
            severity,
            mark: mark.cloned(),
            message,
        });
        // Attribute macro-expanded text back to its call sites.
        let mut link = mark.and_then(|m| m.parent.clone());
        while let Some(l) = link {
            self.inner.reporter.report(&Diagnostic {
                severity: Severity::Note,
                mark: Some(l.site.clone()),
                message: format!("in expansion of macro '{}'", l.macro_name),
            });
            link = l.site.parent.clone();
        }
    }

    pub fn error_count(&self) -> usize {
        self.inner.errors.get()
    }

    pub fn warning_count(&self) -> usize {
        self.inner.warnings.get()
    }

    pub fn warn_opts(&self) -> WarnOpts {
        self.inner.warn_opts
    }
}

/// Reporter that writes `file:line:col: severity: message`, the source line,
/// and a caret, to stderr.
pub struct StderrReporter {
    fdir: Rc<FileDir>,
}

impl StderrReporter {
    pub fn new(fdir: Rc<FileDir>) -> StderrReporter {
        StderrReporter { fdir }
    }

    fn source_line(&self, mark: &Mark) -> Option<String> {
        let entry = self.fdir.lookup(&mark.file)?;
        let rest = entry.buf.get(mark.line_start..)?;
        let line = rest.split('\n').next().unwrap_or("");
        Some(line.trim_end().to_string())
    }
}

impl Reporter for StderrReporter {
    fn report(&self, diag: &Diagnostic) {
        match &diag.mark {
            Some(mark) => {
                eprintln!("{}: {}: {}", mark, diag.severity, diag.message);
                if let Some(line) = self.source_line(mark) {
                    eprintln!(" {}", line);
                    let pad = " ".repeat(mark.col.max(1) as usize);
                    eprintln!("{}^", pad);
                }
            }
            None => eprintln!("{}: {}", diag.severity, diag.message),
        }
    }
}

/// Reporter that keeps everything in memory; used by tests.
#[derive(Default)]
pub struct CollectReporter {
    pub diags: RefCell<Vec<(Severity, Option<String>, String)>>,
}

impl CollectReporter {
    pub fn new() -> CollectReporter {
        CollectReporter::default()
    }
}

impl Reporter for CollectReporter {
    fn report(&self, diag: &Diagnostic) {
        self.diags.borrow_mut().push((
            diag.severity,
            diag.mark.as_ref().map(|m| m.to_string()),
            diag.message.clone(),
        ));
    }
}

/// Reporter that drops everything; for throwaway inner passes.
pub struct NullReporter;

impl Reporter for NullReporter {
    fn report(&self, _diag: &Diagnostic) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mark::MarkLink;

    #[test]
    fn werror_upgrades_warnings() {
        let diag = DiagCtx::new(
            Box::new(NullReporter),
            WarnOpts {
                error: true,
                ..WarnOpts::default()
            },
        );
        diag.warn(None, "meh");
        assert_eq!(diag.error_count(), 1);
        assert_eq!(diag.warning_count(), 0);
    }

    #[test]
    fn expansion_chain_adds_notes() {
        let reporter = Rc::new(CollectReporter::new());
        struct Fwd(Rc<CollectReporter>);
        impl Reporter for Fwd {
            fn report(&self, d: &Diagnostic) {
                self.0.report(d)
            }
        }
        let diag = DiagCtx::new(Box::new(Fwd(Rc::clone(&reporter))), WarnOpts::default());

        let outer = Mark::new("a.c".into());
        let inner = Mark::built_in().with_parent(Rc::new(MarkLink {
            macro_name: "M".into(),
            site: outer,
        }));
        diag.error(Some(&inner), "boom");

        let diags = reporter.diags.borrow();
        assert_eq!(diags.len(), 2);
        assert_eq!(diags[1].0, Severity::Note);
        assert!(diags[1].2.contains("in expansion of macro 'M'"));
    }
}
