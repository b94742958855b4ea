//! Main parser coordinator
//!
//! This module provides the [`Parser`] struct and core parsing infrastructure,
//! including error types, helper methods, error recovery and the main parse
//! entry point.
//!
//! # Parser Architecture
//!
//! The Parser uses a recursive descent approach with the following organization:
//! - This module: Parser struct, helper methods, recovery and the finishing pass
//! - `declarations`: specifiers, external declarations, struct/union/enum bodies
//! - `declarator`: pointers, grouping parentheses, arrays, functions, parameters
//! - `expressions`: integer constant expressions for enum values and bounds
//!
//! # Implementation
//!
//! Parser methods are split across multiple files using `impl Parser` blocks,
//! allowing each module to extend the Parser with related functionality while
//! maintaining access to the shared parser state.
//!
//! Internally every parse method returns `Result<_, ParseError>`. The error
//! only unwinds to the nearest recovery point (an external declaration or a
//! struct member), where it becomes a [`Diagnostic`] and parsing resumes, so
//! [`parse_translation_unit`] itself cannot fail.

use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::parser::ast::{Declaration, SourceLocation};
use crate::parser::lexer::{Keyword, Punct, Token, TokenKind};
use crate::parser::macros::MacroTable;
use crate::types::TypeTable;
use log::debug;
use rustc_hash::FxHashSet;
use thiserror::Error;

/// Parser error type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("expected {expected}, found {found}")]
    UnexpectedToken {
        expected: String,
        found: String,
        offset: usize,
        location: SourceLocation,
    },
    #[error("{message}")]
    Invalid {
        message: String,
        offset: usize,
        location: SourceLocation,
    },
}

impl ParseError {
    pub fn offset(&self) -> usize {
        match self {
            ParseError::UnexpectedToken { offset, .. } | ParseError::Invalid { offset, .. } => *offset,
        }
    }

    pub fn location(&self) -> SourceLocation {
        match self {
            ParseError::UnexpectedToken { location, .. }
            | ParseError::Invalid { location, .. } => *location,
        }
    }

    pub fn into_diagnostic(self) -> Diagnostic {
        Diagnostic::error(
            DiagnosticKind::Syntax,
            self.offset(),
            self.location(),
            self.to_string(),
        )
    }
}

/// Everything the declaration parser produces
#[derive(Debug, Clone, Default)]
pub struct ParseOutput {
    pub table: TypeTable,
    pub declarations: Vec<Declaration>,
    pub diagnostics: Vec<Diagnostic>,
}

/// A typedef name used before (or without) its definition
#[derive(Debug, Clone)]
pub(crate) struct PendingRef {
    pub name: String,
    pub offset: usize,
    pub location: SourceLocation,
}

/// Parse a whole token stream into declarations, registering every named
/// definition in `table`. Directive tokens and tokens inside inactive
/// conditional branches are dropped first.
pub fn parse_translation_unit(tokens: Vec<Token>, macros: &MacroTable, table: TypeTable) -> ParseOutput {
    let mut parser = Parser::new(tokens, macros, table);
    parser.parse_all();
    parser.finish()
}

/// Recursive descent parser for C header declarations
pub struct Parser<'m> {
    pub(crate) tokens: Vec<Token>,
    pub(crate) position: usize,
    pub(crate) macros: &'m MacroTable,
    pub(crate) table: TypeTable,
    pub(crate) declarations: Vec<Declaration>,
    pub(crate) diagnostics: Vec<Diagnostic>,
    pub(crate) pending_refs: Vec<PendingRef>,
}

impl<'m> Parser<'m> {
    pub fn new(tokens: Vec<Token>, macros: &'m MacroTable, table: TypeTable) -> Self {
        let mut tokens: Vec<Token> = tokens
            .into_iter()
            .filter(|t| match t.kind {
                TokenKind::Directive => false,
                TokenKind::Eof => true,
                _ => macros.is_active(t.offset),
            })
            .collect();

        if !tokens.last().is_some_and(Token::is_eof) {
            let (offset, location) = tokens
                .last()
                .map_or((0, SourceLocation::default()), |t| (t.end(), t.location));
            tokens.push(Token {
                kind: TokenKind::Eof,
                lexeme: String::new(),
                offset,
                location,
                expanded: false,
            });
        }

        Self {
            tokens,
            position: 0,
            macros,
            table,
            declarations: Vec::new(),
            diagnostics: Vec::new(),
            pending_refs: Vec::new(),
        }
    }

    /// Parse every external declaration, recovering from errors
    pub fn parse_all(&mut self) {
        while !self.is_at_end() {
            let start = self.position;
            let refs = self.pending_refs.len();

            if let Err(err) = self.parse_external_declaration() {
                debug!("syntax error at line {}: {}", err.location().line, err);
                // The failed statement declared nothing, so its type names go too
                self.pending_refs.truncate(refs);
                self.diagnostics.push(err.into_diagnostic());
                self.synchronize(start);
            }

            // Always make progress
            if self.position == start && !self.is_at_end() {
                self.advance();
            }
        }
    }

    /// Report references that never resolved, rewrite them as `Unresolved`,
    /// and report typedef cycles
    pub fn finish(mut self) -> ParseOutput {
        let known: FxHashSet<String> = self.table.typedefs().map(|(name, _)| name.to_string()).collect();
        let is_typedef = |name: &str| known.contains(name);

        for pending in std::mem::take(&mut self.pending_refs) {
            if !is_typedef(&pending.name) {
                self.diagnostics.push(
                    Diagnostic::warning(
                        DiagnosticKind::UnresolvedReference,
                        pending.offset,
                        pending.location,
                        format!("unknown type name '{}'", pending.name),
                    )
                    .with_name(pending.name),
                );
            }
        }

        self.table.mark_unresolved(&is_typedef);
        for declaration in &mut self.declarations {
            declaration.ty.mark_unresolved(&is_typedef);
        }

        for cycle in self.table.detect_cycles() {
            let Some(first) = cycle.first() else {
                continue;
            };
            let (offset, location) = self
                .table
                .typedef(first)
                .map_or((0, SourceLocation::default()), |e| (e.offset, e.location));

            let mut chain = cycle.clone();
            chain.push(first.clone());
            self.diagnostics.push(
                Diagnostic::warning(
                    DiagnosticKind::CyclicTypedef,
                    offset,
                    location,
                    format!("cyclic typedef chain: {}", chain.join(" -> ")),
                )
                .with_name(first.clone()),
            );
        }

        debug!(
            "parsed {} declarations, {} table entries, {} diagnostics",
            self.declarations.len(),
            self.table.len(),
            self.diagnostics.len()
        );

        ParseOutput {
            table: self.table,
            declarations: self.declarations,
            diagnostics: self.diagnostics,
        }
    }

    /// Skip to the end of the broken statement that began at `start`: the
    /// first `;` outside braces, or an unmatched `}` (plus a `;` after it).
    /// When the braces never balance, resume after the first `;` instead.
    pub(crate) fn synchronize(&mut self, start: usize) {
        self.position = start;
        let mut depth = 0usize;

        while !self.is_at_end() {
            let token = self.advance().clone();
            match token.kind {
                TokenKind::Punct(Punct::LBrace) => depth += 1,
                TokenKind::Punct(Punct::RBrace) if depth == 0 => {
                    self.match_punct(Punct::Semicolon);
                    return;
                }
                TokenKind::Punct(Punct::RBrace) => {
                    depth -= 1;
                    // A closed body followed by a new declaration
                    if depth == 0 && self.starts_declaration() {
                        return;
                    }
                }
                TokenKind::Punct(Punct::Semicolon) if depth == 0 => return,
                _ => {}
            }
        }

        self.position = start;
        while !self.is_at_end() {
            if self.advance().is_punct(Punct::Semicolon) {
                return;
            }
        }
    }

    /// Whether the current token can only begin a new declaration
    fn starts_declaration(&self) -> bool {
        match &self.peek().kind {
            TokenKind::Keyword(keyword) => keyword.starts_specifier(),
            TokenKind::Ident => self.table.is_typedef_name(&self.peek().lexeme),
            _ => false,
        }
    }

    // ===== Helper methods =====

    pub(crate) fn peek(&self) -> &Token {
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    /// Token `n` places ahead, clamped to the trailing Eof
    pub(crate) fn peek_ahead(&self, n: usize) -> &Token {
        &self.tokens[(self.position + n).min(self.tokens.len() - 1)]
    }

    pub(crate) fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.position += 1;
        }
        self.previous()
    }

    pub(crate) fn previous(&self) -> &Token {
        &self.tokens[self.position.saturating_sub(1)]
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.peek().is_eof()
    }

    pub(crate) fn check_punct(&self, punct: Punct) -> bool {
        self.peek().is_punct(punct)
    }

    pub(crate) fn check_keyword(&self, keyword: Keyword) -> bool {
        self.peek().is_keyword(keyword)
    }

    pub(crate) fn match_punct(&mut self, punct: Punct) -> bool {
        if self.check_punct(punct) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect_punct(&mut self, punct: Punct, ctx: &str) -> Result<(), ParseError> {
        if self.check_punct(punct) {
            self.advance();
            Ok(())
        } else {
            let spelling = crate::parser::lexer::punct_spelling(punct);
            Err(self.unexpected(format!("'{spelling}' {ctx}")))
        }
    }

    pub(crate) fn expect_identifier(&mut self, ctx: &str) -> Result<Token, ParseError> {
        if self.peek().kind == TokenKind::Ident {
            Ok(self.advance().clone())
        } else {
            Err(self.unexpected(format!("identifier {ctx}")))
        }
    }

    /// Error for the current token not being `expected`
    pub(crate) fn unexpected(&self, expected: impl Into<String>) -> ParseError {
        let token = self.peek();
        ParseError::UnexpectedToken {
            expected: expected.into(),
            found: token.to_string(),
            offset: token.offset,
            location: token.location,
        }
    }

    pub(crate) fn invalid(&self, token: &Token, message: impl Into<String>) -> ParseError {
        ParseError::Invalid {
            message: message.into(),
            offset: token.offset,
            location: token.location,
        }
    }

    /// Index just past the group that opens at `open`, or `None` when it
    /// never closes. Brackets of all three kinds nest.
    pub(crate) fn group_end(&self, open: usize) -> Option<usize> {
        let mut depth = 0usize;
        for (index, token) in self.tokens.iter().enumerate().skip(open) {
            match token.kind {
                TokenKind::Punct(Punct::LParen | Punct::LBracket | Punct::LBrace) => depth += 1,
                TokenKind::Punct(Punct::RParen | Punct::RBracket | Punct::RBrace) => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Some(index + 1);
                    }
                }
                TokenKind::Eof => return None,
                _ => {}
            }
        }
        None
    }

    /// Consume a balanced group starting at the current opening bracket
    pub(crate) fn skip_group(&mut self) -> Result<(), ParseError> {
        match self.group_end(self.position) {
            Some(end) => {
                self.position = end;
                Ok(())
            }
            None => {
                let open = self.peek().clone();
                Err(self.invalid(&open, format!("unbalanced '{}'", open.lexeme)))
            }
        }
    }

    /// Collect tokens up to (not including) one of `stops` at nesting depth
    /// zero, or an unmatched closing bracket.
    pub(crate) fn capture_until(&mut self, stops: &[Punct]) -> Result<Vec<Token>, ParseError> {
        let start = self.position;
        // Positions of the brackets still open
        let mut open: Vec<usize> = Vec::new();

        loop {
            let token = self.peek();
            match token.kind {
                TokenKind::Eof => {
                    return Err(match open.first() {
                        Some(&position) => {
                            let opener = self.tokens[position].clone();
                            self.invalid(&opener, format!("unbalanced '{}'", opener.lexeme))
                        }
                        None => {
                            let first = self.tokens[start].clone();
                            self.invalid(&first, "unexpected end of input in expression")
                        }
                    });
                }
                TokenKind::Punct(punct) if open.is_empty() && stops.contains(&punct) => break,
                TokenKind::Punct(Punct::LParen | Punct::LBracket | Punct::LBrace) => {
                    open.push(self.position)
                }
                TokenKind::Punct(Punct::RParen | Punct::RBracket | Punct::RBrace) => {
                    if open.pop().is_none() {
                        break;
                    }
                }
                _ => {}
            }
            self.advance();
        }

        Ok(self.tokens[start..self.position].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::lexer::lex;
    use crate::parser::macros::build_macros;

    fn parse(source: &str) -> ParseOutput {
        let (tokens, _) = lex(source);
        let (macros, _) = build_macros(&tokens);
        parse_translation_unit(tokens, &macros, TypeTable::new())
    }

    fn names(output: &ParseOutput) -> Vec<&str> {
        output.declarations.iter().map(|d| d.name.as_str()).collect()
    }

    #[test]
    fn test_parse_simple_declarations() {
        let output = parse("int x;\nchar *name;\nvoid f(void);");

        assert!(output.diagnostics.is_empty());
        assert_eq!(names(&output), vec!["x", "name", "f"]);
        assert_eq!(output.declarations[1].ty.declarator("name"), "char *name");
    }

    #[test]
    fn test_empty_input() {
        let output = parse("");
        assert!(output.declarations.is_empty());
        assert!(output.diagnostics.is_empty());
    }

    #[test]
    fn test_recovery_after_unbalanced_initializer() {
        let output = parse("int bad = { 1, 2;\nint good;");

        assert_eq!(names(&output), vec!["good"]);
        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.diagnostics[0].kind, DiagnosticKind::Syntax);
    }

    #[test]
    fn test_failed_statement_reports_only_the_syntax_error() {
        let output = parse("undefined x = {;\nint y;");

        assert_eq!(names(&output), vec!["y"]);
        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.diagnostics[0].kind, DiagnosticKind::Syntax);
        assert_eq!(output.diagnostics[0].message, "unbalanced '{'");
        assert_eq!(output.diagnostics[0].location.column, 15);
    }

    #[test]
    fn test_recovery_after_stray_brace() {
        let output = parse("int x = };\nint after;");

        assert_eq!(names(&output), vec!["after"]);
        assert_eq!(output.diagnostics.len(), 1);
        assert!(output.diagnostics[0].is_error());
    }

    #[test]
    fn test_recovery_resumes_after_closed_body() {
        let output = parse("int broken(int { return; }\nint next;");

        assert_eq!(names(&output), vec!["next"]);
        assert_eq!(output.diagnostics.len(), 1);
    }

    #[test]
    fn test_inactive_tokens_are_dropped() {
        let output = parse("#if 0\nint hidden;\n#endif\nint shown;");
        assert_eq!(names(&output), vec!["shown"]);
    }

    #[test]
    fn test_unresolved_reference_reported_once() {
        let output = parse("undefined x;\nundefined *y;");

        let unresolved: Vec<&Diagnostic> = output
            .diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::UnresolvedReference)
            .collect();
        assert_eq!(unresolved.len(), 2);
        assert!(unresolved.iter().all(|d| d.name.as_deref() == Some("undefined")));
        assert_eq!(
            output.declarations[0].ty,
            crate::parser::ast::TypeExpr::Unresolved("undefined".to_string())
        );
    }

    #[test]
    fn test_forward_typedef_use_resolves() {
        let output = parse("typedef later alias;\ntypedef int later;");

        assert!(output.diagnostics.is_empty());
        assert_eq!(
            output.declarations[0].ty,
            crate::parser::ast::TypeExpr::typedef_ref("later")
        );
    }

    #[test]
    fn test_cycle_reported_once() {
        let output = parse("typedef C A;\ntypedef A B;\ntypedef B C;");

        let cycles: Vec<&Diagnostic> = output
            .diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::CyclicTypedef)
            .collect();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].message, "cyclic typedef chain: A -> C -> B -> A");
        assert!(output
            .diagnostics
            .iter()
            .all(|d| d.kind != DiagnosticKind::UnresolvedReference));
    }
}
