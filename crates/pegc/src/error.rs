use std::{cell::RefCell, fmt::Display};

use crate::span::Span;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

/// Secondary location attached to a diagnostic.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Related {
    pub message: String,
    pub span: Span,
}

impl Related {
    pub fn new(message: impl Into<String>, span: Span) -> Related {
        Related {
            message: message.into(),
            span,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Span,
    pub related: Vec<Related>,
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.span, self.severity, self.message)
    }
}

/// Diagnostics collected over one compilation.
///
/// Passes only get a shared reference, recording goes through interior mutability.
#[derive(Default)]
pub struct Session {
    diagnostics: RefCell<Vec<Diagnostic>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }
    fn push(&self, severity: Severity, span: Span, message: String, related: Vec<Related>) {
        log::debug!("{severity} at {span}: {message}");
        self.diagnostics.borrow_mut().push(Diagnostic {
            severity,
            message,
            span,
            related,
        });
    }
    pub fn error(&self, span: Span, message: impl ToString) {
        self.push(Severity::Error, span, message.to_string(), Vec::new());
    }
    pub fn error_with(&self, span: Span, message: impl ToString, related: Vec<Related>) {
        self.push(Severity::Error, span, message.to_string(), related);
    }
    pub fn warning(&self, span: Span, message: impl ToString) {
        self.push(Severity::Warning, span, message.to_string(), Vec::new());
    }
    pub fn info(&self, span: Span, message: impl ToString, related: Vec<Related>) {
        self.push(Severity::Info, span, message.to_string(), related);
    }
    pub fn error_count(&self) -> usize {
        self.diagnostics
            .borrow()
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }
    pub fn diagnostics(&self) -> std::cell::Ref<Vec<Diagnostic>> {
        self.diagnostics.borrow()
    }
    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics.into_inner()
    }
    /// Fails with [`CompileError::Grammar`] if any error was recorded.
    pub fn check_errors(&self) -> Result<(), CompileError> {
        let diagnostics = self.diagnostics.borrow();
        match diagnostics.iter().find(|d| d.severity == Severity::Error) {
            Some(first) => Err(CompileError::Grammar {
                first: first.clone(),
                diagnostics: diagnostics.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// A defect in the compiler itself, never something the grammar author can fix.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct InternalError {
    pub message: String,
}

impl InternalError {
    pub fn new(message: impl ToString) -> InternalError {
        InternalError {
            message: message.to_string(),
        }
    }
}

impl Display for InternalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "internal compiler error: {}", self.message)
    }
}

impl std::error::Error for InternalError {}

#[derive(Clone, Debug)]
pub enum CompileError {
    /// The grammar was rejected by the check passes.
    Grammar {
        first: Diagnostic,
        diagnostics: Vec<Diagnostic>,
    },
    Internal(InternalError),
}

impl From<InternalError> for CompileError {
    fn from(value: InternalError) -> Self {
        CompileError::Internal(value)
    }
}

impl Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::Grammar { first, diagnostics } => {
                let errors = diagnostics
                    .iter()
                    .filter(|d| d.severity == Severity::Error)
                    .count();
                write!(f, "{}", first.message)?;
                if errors > 1 {
                    write!(f, " (and {} more errors)", errors - 1)?;
                }
                Ok(())
            }
            CompileError::Internal(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for CompileError {}

#[test]
fn test_session_batches_errors() {
    let session = Session::new();
    session.warning(Span::new(0, 1), "first warning");
    session.error(Span::new(2, 3), "first error");
    session.error(Span::new(4, 5), "second error");

    assert_eq!(session.error_count(), 2);
    let Err(CompileError::Grammar { first, diagnostics }) = session.check_errors() else {
        panic!("expected a grammar error");
    };
    assert_eq!(first.message, "first error");
    assert_eq!(diagnostics.len(), 3);
}
