//! Diagnostic records shared by every phase
//!
//! No phase of the parser aborts on bad input. Instead each one appends
//! [`Diagnostic`]s and keeps going, so the worst possible result is a model
//! containing `Unresolved` markers plus a non-empty diagnostic list.

use crate::parser::ast::SourceLocation;
use std::fmt;

/// How serious a diagnostic is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// The class of problem a diagnostic reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// Unterminated literal or comment, unexpected character
    Lex,
    /// Malformed `#define`/`#undef`/conditional directive
    Macro,
    /// Unparseable declarator or statement
    Syntax,
    /// Tag, typedef or symbol redefined with a differing body
    Redefinition,
    /// Type name never defined anywhere in the input
    UnresolvedReference,
    /// Typedef chain that revisits itself
    CyclicTypedef,
}

impl DiagnosticKind {
    /// Short tag used when rendering diagnostics
    pub fn code(self) -> &'static str {
        match self {
            DiagnosticKind::Lex => "lex",
            DiagnosticKind::Macro => "macro",
            DiagnosticKind::Syntax => "syntax",
            DiagnosticKind::Redefinition => "redefinition",
            DiagnosticKind::UnresolvedReference => "unresolved",
            DiagnosticKind::CyclicTypedef => "cyclic-typedef",
        }
    }
}

/// A single problem found while processing a translation unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    /// Byte offset into the source text
    pub offset: usize,
    pub location: SourceLocation,
    /// The name the diagnostic is about, if any
    pub name: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn error(
        kind: DiagnosticKind,
        offset: usize,
        location: SourceLocation,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity: Severity::Error,
            kind,
            offset,
            location,
            name: None,
            message: message.into(),
        }
    }

    pub fn warning(
        kind: DiagnosticKind,
        offset: usize,
        location: SourceLocation,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity: Severity::Warning,
            kind,
            offset,
            location,
            name: None,
            message: message.into(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}] at line {}, column {}: {}",
            self.severity,
            self.kind.code(),
            self.location.line,
            self.location.column,
            self.message
        )
    }
}
