//! # Introduction
//!
//! cheader reads C header text and produces a queryable model of what it
//! declares: top-level declarations, a type table of struct/union/enum tags,
//! typedefs and ordinary symbols, the macros that were defined, and a list of
//! diagnostics. It does not preprocess, type-check or compile anything.
//!
//! ## Pipeline
//!
//! ```text
//! Source → Lexer → Macro pre-pass → Declaration parser → Type table + Declarations
//! ```
//!
//! 1. [`parser::lexer`] tokenises the source. Comments vanish, string
//!    literals stay intact and each preprocessor line becomes one token.
//! 2. [`parser::macros`] records `#define`s and marks inactive conditional
//!    regions.
//! 3. [`parser::parse`] parses declarations, substituting object-like macros
//!    that stand for types, and registers every named definition.
//! 4. [`types`] resolves names one step at a time and detects typedef cycles.
//!
//! Every phase keeps going on bad input and reports [`diagnostics`] instead,
//! so [`parse_header`] never fails.
//!
//! ```
//! let model = cheader::parse_header("typedef int T;\nT values[4];");
//! let values = model.declaration("values").unwrap();
//! assert_eq!(values.ty.declarator("values"), "T values[4]");
//! assert!(model.diagnostics.is_empty());
//! ```

pub mod diagnostics;
pub mod parser;
pub mod types;

use diagnostics::Diagnostic;
use log::debug;
use parser::ast::Declaration;
use parser::macros::{build_macros_with, MacroTable};
use parser::parse::parse_translation_unit;
use types::TypeTable;

/// Everything extracted from one header
#[derive(Debug, Clone, Default)]
pub struct HeaderModel {
    pub macros: MacroTable,
    pub table: TypeTable,
    /// Top-level declarations in source order
    pub declarations: Vec<Declaration>,
    /// Lexer, macro and parser diagnostics, in that order
    pub diagnostics: Vec<Diagnostic>,
}

impl HeaderModel {
    /// The first declaration of `name`
    pub fn declaration(&self, name: &str) -> Option<&Declaration> {
        self.declarations.iter().find(|d| d.name == name)
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// Run every phase over `source`
pub fn parse_header(source: &str) -> HeaderModel {
    parse_header_with(source, MacroTable::new())
}

/// Run every phase over `source`, starting from `predefined` macros
pub fn parse_header_with(source: &str, predefined: MacroTable) -> HeaderModel {
    let (tokens, mut diagnostics) = parser::lex(source);
    let (macros, macro_diagnostics) = build_macros_with(&tokens, predefined);
    diagnostics.extend(macro_diagnostics);

    let output = parse_translation_unit(tokens, &macros, TypeTable::new());
    diagnostics.extend(output.diagnostics);

    debug!(
        "header parsed: {} declarations, {} macros, {} diagnostics",
        output.declarations.len(),
        macros.len(),
        diagnostics.len()
    );

    HeaderModel {
        macros,
        table: output.table,
        declarations: output.declarations,
        diagnostics,
    }
}
