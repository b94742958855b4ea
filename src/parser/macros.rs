//! Macro table and the directive pre-pass
//!
//! [`build_macros`] walks the directive tokens produced by the lexer in
//! source order and records `#define`s, honours `#undef`, and tracks which
//! regions of the source sit inside a false conditional branch.
//!
//! Conditionals are approximated, not preprocessed:
//!
//! - `#ifdef X` / `#ifndef X` test whether `X` is in the table at that point
//! - `#if` / `#elif` understand integer constant expressions, `defined X`,
//!   `defined(X)`, `!` and a bare macro name (true when defined and not `0`)
//! - any other condition is assumed true and reported as a warning
//!
//! Function-like macros are recorded but never substituted. Object-like
//! substitution is single-level: the replacement tokens are marked
//! [`Token::expanded`] and the parser never substitutes those again.

use super::expressions::{evaluate, parse_int_literal};
use super::lexer::{tokenize, Punct, Token, TokenKind};
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use log::{debug, trace};
use rustc_hash::FxHashMap;
use std::ops::Range;

/// One `#define`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroDefinition {
    pub name: String,
    /// Replacement text with continuations merged and whitespace collapsed
    pub replacement: String,
    pub line: usize,
    /// Parameter names for function-like macros
    pub params: Option<Vec<String>>,
}

impl MacroDefinition {
    /// An object-like macro, e.g. one given on the command line
    pub fn object(name: &str, replacement: &str) -> Self {
        Self {
            name: name.to_string(),
            replacement: replacement.to_string(),
            line: 0,
            params: None,
        }
    }

    pub fn is_function_like(&self) -> bool {
        self.params.is_some()
    }
}

/// Name to definition map, plus the source regions excluded by conditionals
#[derive(Debug, Clone, Default)]
pub struct MacroTable {
    macros: FxHashMap<String, MacroDefinition>,
    /// Byte ranges of inactive conditional branches, in source order
    inactive: Vec<Range<usize>>,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or overwrite a definition, returning the one it replaced
    pub fn define(&mut self, definition: MacroDefinition) -> Option<MacroDefinition> {
        self.macros.insert(definition.name.clone(), definition)
    }

    pub fn undefine(&mut self, name: &str) -> Option<MacroDefinition> {
        self.macros.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&MacroDefinition> {
        self.macros.get(name)
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    /// Definitions sorted by name
    pub fn iter(&self) -> impl Iterator<Item = &MacroDefinition> {
        let mut definitions: Vec<&MacroDefinition> = self.macros.values().collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions.into_iter()
    }

    /// Whether the byte at `offset` lies outside every inactive branch
    pub fn is_active(&self, offset: usize) -> bool {
        !self.inactive.iter().any(|range| range.contains(&offset))
    }

    pub fn inactive_regions(&self) -> &[Range<usize>] {
        &self.inactive
    }

    /// Replacement tokens for an object-like macro used at `at`.
    ///
    /// Every returned token carries the use site's offset and location and is
    /// marked expanded. Returns `None` for unknown and function-like macros.
    pub fn substitute(&self, name: &str, at: &Token) -> Option<Vec<Token>> {
        let definition = self.macros.get(name)?;
        if definition.is_function_like() {
            return None;
        }

        let tokens = tokenize(&definition.replacement)
            .filter(|t| !t.is_eof())
            .map(|t| Token {
                offset: at.offset,
                location: at.location,
                expanded: true,
                ..t
            })
            .collect();
        Some(tokens)
    }
}

/// Build the macro table from a token stream, starting empty
pub fn build_macros(tokens: &[Token]) -> (MacroTable, Vec<Diagnostic>) {
    build_macros_with(tokens, MacroTable::new())
}

/// Build the macro table on top of `predefined` (e.g. `-D` definitions)
pub fn build_macros_with(tokens: &[Token], predefined: MacroTable) -> (MacroTable, Vec<Diagnostic>) {
    let mut builder = MacroBuilder {
        table: predefined,
        stack: Vec::new(),
        inactive_start: None,
        diagnostics: Vec::new(),
    };

    for token in tokens.iter().filter(|t| t.kind == TokenKind::Directive) {
        builder.directive(token);
    }

    builder.finish()
}

/// State of one open `#if` group
struct Conditional {
    /// Some branch of this group has already been taken
    taken: bool,
    /// The current branch is live
    active: bool,
    /// The enclosing region is live
    parent_active: bool,
    seen_else: bool,
    directive: Token,
}

struct MacroBuilder {
    table: MacroTable,
    stack: Vec<Conditional>,
    /// Start of the inactive region currently open
    inactive_start: Option<usize>,
    diagnostics: Vec<Diagnostic>,
}

impl MacroBuilder {
    fn is_active(&self) -> bool {
        self.stack.last().map_or(true, |c| c.active)
    }

    fn error(&mut self, directive: &Token, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::error(
            DiagnosticKind::Macro,
            directive.offset,
            directive.location,
            message,
        ));
    }

    fn directive(&mut self, directive: &Token) {
        let was_active = self.is_active();

        let body = directive.lexeme.strip_prefix('#').unwrap_or(&directive.lexeme);
        let words: Vec<Token> = tokenize(body).filter(|t| !t.is_eof()).collect();

        // A lone `#` is the null directive
        let Some(first) = words.first() else {
            return;
        };

        match first.lexeme.as_str() {
            "define" if was_active => self.define(directive, body, &words),
            "undef" if was_active => self.undef(directive, &words),
            "ifdef" | "ifndef" => {
                let negate = first.lexeme == "ifndef";
                let condition = if was_active {
                    self.defined_condition(directive, &words).map(|d| d != negate)
                } else {
                    Some(false)
                };
                self.open(directive, condition.unwrap_or(false));
            }
            "if" => {
                let condition = was_active && self.if_condition(directive, &words[1..]);
                self.open(directive, condition);
            }
            "elif" => self.elif(directive, &words[1..]),
            "else" => self.else_branch(directive),
            "endif" => {
                if self.stack.pop().is_none() {
                    self.error(directive, "#endif without #if");
                }
            }
            "define" | "undef" => {}
            other if was_active => {
                debug!("ignoring #{} at line {}", other, directive.location.line);
            }
            _ => {}
        }

        let now_active = self.is_active();
        if was_active && !now_active {
            self.inactive_start = Some(directive.offset);
        } else if !was_active && now_active {
            if let Some(start) = self.inactive_start.take() {
                self.table.inactive.push(start..directive.offset);
            }
        }
    }

    fn define(&mut self, directive: &Token, body: &str, words: &[Token]) {
        let Some(name) = words.get(1).filter(|t| t.is_word() && t.kind != TokenKind::NumericLiteral)
        else {
            self.error(directive, "macro name missing in #define");
            return;
        };

        let after_name = &body[name.end()..];
        let (params, replacement) = if after_name.starts_with('(') {
            match macro_params(&words[2..]) {
                Some((params, close)) => (Some(params), body[close.end()..].trim()),
                None => {
                    self.error(
                        directive,
                        format!("malformed parameter list in #define {}", name.lexeme),
                    );
                    return;
                }
            }
        } else {
            (None, after_name.trim())
        };

        let definition = MacroDefinition {
            name: name.lexeme.clone(),
            replacement: replacement.to_string(),
            line: directive.location.line,
            params,
        };

        trace!("#define {} -> {:?}", definition.name, definition.replacement);
        if let Some(previous) = self.table.define(definition) {
            debug!(
                "macro '{}' redefined at line {} (was line {})",
                previous.name, directive.location.line, previous.line
            );
        }
    }

    fn undef(&mut self, directive: &Token, words: &[Token]) {
        match words.get(1).filter(|t| t.is_word()) {
            Some(name) => {
                self.table.undefine(&name.lexeme);
            }
            None => self.error(directive, "macro name missing in #undef"),
        }
    }

    /// `#ifdef NAME` / `#ifndef NAME`: whether NAME is defined
    fn defined_condition(&mut self, directive: &Token, words: &[Token]) -> Option<bool> {
        match words.get(1).filter(|t| t.is_word()) {
            Some(name) => Some(self.table.is_defined(&name.lexeme)),
            None => {
                self.error(directive, format!("macro name missing in #{}", words[0].lexeme));
                None
            }
        }
    }

    fn if_condition(&mut self, directive: &Token, expr: &[Token]) -> bool {
        if expr.is_empty() {
            self.error(directive, "missing condition in conditional directive");
            return false;
        }

        match self.evaluate_condition(expr) {
            Some(value) => value,
            None => {
                self.diagnostics.push(Diagnostic::warning(
                    DiagnosticKind::Macro,
                    directive.offset,
                    directive.location,
                    format!("cannot evaluate '{}', assuming true", directive.lexeme),
                ));
                true
            }
        }
    }

    fn evaluate_condition(&self, expr: &[Token]) -> Option<bool> {
        match expr {
            [bang, rest @ ..] if bang.is_punct(Punct::Bang) && !rest.is_empty() => {
                self.evaluate_condition(rest).map(|value| !value)
            }
            [defined, name] if defined.lexeme == "defined" && name.is_word() => {
                Some(self.table.is_defined(&name.lexeme))
            }
            [defined, open, name, close]
                if defined.lexeme == "defined"
                    && open.is_punct(Punct::LParen)
                    && name.is_word()
                    && close.is_punct(Punct::RParen) =>
            {
                Some(self.table.is_defined(&name.lexeme))
            }
            [name] if name.kind == TokenKind::Ident => {
                let value = self.table.get(&name.lexeme).map(|m| m.replacement.trim());
                Some(value.is_some_and(|text| !text.is_empty() && parse_int_literal(text) != Some(0)))
            }
            _ => evaluate(expr, |_| None).map(|value| value != 0),
        }
    }

    fn open(&mut self, directive: &Token, condition: bool) {
        let parent_active = self.is_active();
        self.stack.push(Conditional {
            taken: condition,
            active: parent_active && condition,
            parent_active,
            seen_else: false,
            directive: directive.clone(),
        });
    }

    fn elif(&mut self, directive: &Token, expr: &[Token]) {
        let Some(top) = self.stack.last() else {
            self.error(directive, "#elif without #if");
            return;
        };
        if top.seen_else {
            self.error(directive, "#elif after #else");
            return;
        }

        let evaluate_branch = top.parent_active && !top.taken;
        let condition = evaluate_branch && self.if_condition(directive, expr);

        if let Some(top) = self.stack.last_mut() {
            top.active = condition;
            top.taken |= condition;
        }
    }

    fn else_branch(&mut self, directive: &Token) {
        let Some(top) = self.stack.last_mut() else {
            self.error(directive, "#else without #if");
            return;
        };
        if top.seen_else {
            self.error(directive, "#else after #else");
            return;
        }

        top.active = top.parent_active && !top.taken;
        top.taken = true;
        top.seen_else = true;
    }

    fn finish(mut self) -> (MacroTable, Vec<Diagnostic>) {
        for open in std::mem::take(&mut self.stack) {
            self.error(&open.directive, "unterminated conditional directive");
        }
        if let Some(start) = self.inactive_start.take() {
            self.table.inactive.push(start..usize::MAX);
        }

        debug!(
            "macro table built: {} definitions, {} inactive regions",
            self.table.len(),
            self.table.inactive.len()
        );
        (self.table, self.diagnostics)
    }
}

/// Parameter names of a function-like macro, starting at `(`. Returns the
/// names and the closing `)` token.
fn macro_params(tokens: &[Token]) -> Option<(Vec<String>, &Token)> {
    let (open, rest) = tokens.split_first()?;
    if !open.is_punct(Punct::LParen) {
        return None;
    }

    let mut params = Vec::new();
    let mut expect_name = true;
    for token in rest {
        match token.kind {
            TokenKind::Punct(Punct::RParen) if !expect_name || params.is_empty() => {
                return Some((params, token));
            }
            TokenKind::Punct(Punct::Comma) if !expect_name => expect_name = true,
            TokenKind::Ident | TokenKind::Keyword(_) if expect_name => {
                params.push(token.lexeme.clone());
                expect_name = false;
            }
            TokenKind::Punct(Punct::Ellipsis) if expect_name => {
                params.push("...".to_string());
                expect_name = false;
            }
            _ => return None,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Severity;
    use crate::parser::lexer::lex;

    fn build(source: &str) -> (MacroTable, Vec<Diagnostic>) {
        let (tokens, _) = lex(source);
        build_macros(&tokens)
    }

    /// Offset of the first occurrence of `needle`
    fn offset_of(source: &str, needle: &str) -> usize {
        source.find(needle).unwrap()
    }

    #[test]
    fn test_object_macros() {
        let (table, diagnostics) = build("#define MACRO1 macro1\n#define MACRO2 2\n#define EMPTY\n");

        assert!(diagnostics.is_empty());
        assert_eq!(table.len(), 3);
        assert_eq!(table.get("MACRO1").unwrap().replacement, "macro1");
        assert_eq!(table.get("MACRO2").unwrap().line, 2);
        assert_eq!(table.get("EMPTY").unwrap().replacement, "");
    }

    #[test]
    fn test_multiline_macro() {
        let (table, _) = build("#define mlm Multi\\\n Line\\\n Macro\nint x;\n");
        assert_eq!(table.get("mlm").unwrap().replacement, "Multi Line Macro");
    }

    #[test]
    fn test_function_like_macro_is_recorded_not_substituted() {
        let (table, diagnostics) = build("#define MAX(a, b) ((a) > (b) ? (a) : (b))\n");
        assert!(diagnostics.is_empty());

        let definition = table.get("MAX").unwrap();
        assert_eq!(definition.params, Some(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(definition.replacement, "((a) > (b) ? (a) : (b))");

        let (tokens, _) = lex("MAX");
        assert_eq!(table.substitute("MAX", &tokens[0]), None);
    }

    #[test]
    fn test_space_before_paren_is_object_like() {
        let (table, _) = build("#define PAREN (1 + 2)\n");
        let definition = table.get("PAREN").unwrap();
        assert!(!definition.is_function_like());
        assert_eq!(definition.replacement, "(1 + 2)");
    }

    #[test]
    fn test_undef_and_redefine() {
        let (table, diagnostics) = build("#define A 1\n#undef A\n#define B 1\n#define B 2\n");
        assert!(diagnostics.is_empty());
        assert!(!table.is_defined("A"));
        assert_eq!(table.get("B").unwrap().replacement, "2");
    }

    #[test]
    fn test_substitute_marks_tokens_expanded() {
        let (table, _) = build("#define STR const char *\n");
        let (tokens, _) = lex("\n  STR");
        let use_site = &tokens[0];

        let replacement = table.substitute("STR", use_site).unwrap();
        let lexemes: Vec<&str> = replacement.iter().map(|t| t.lexeme.as_str()).collect();
        assert_eq!(lexemes, vec!["const", "char", "*"]);
        assert!(replacement.iter().all(|t| t.expanded));
        assert!(replacement.iter().all(|t| t.location == use_site.location));
    }

    #[test]
    fn test_ifdef_else_regions() {
        let source = "#define A\n#ifdef A\nint yes;\n#else\nint no;\n#endif\nint after;\n";
        let (table, diagnostics) = build(source);

        assert!(diagnostics.is_empty());
        assert!(table.is_active(offset_of(source, "int yes")));
        assert!(!table.is_active(offset_of(source, "int no")));
        assert!(table.is_active(offset_of(source, "int after")));
    }

    #[test]
    fn test_ifndef_guard() {
        let source = "#ifndef GUARD\n#define GUARD\nint body;\n#endif\n";
        let (table, diagnostics) = build(source);

        assert!(diagnostics.is_empty());
        assert!(table.is_defined("GUARD"));
        assert!(table.is_active(offset_of(source, "int body")));
    }

    #[test]
    fn test_definitions_in_inactive_branch_are_ignored() {
        let (table, _) = build("#if 0\n#define HIDDEN 1\n#undef KEEP\n#endif\n");
        assert!(!table.is_defined("HIDDEN"));

        let (table, _) = build("#define KEEP 1\n#if 0\n#undef KEEP\n#endif\n");
        assert!(table.is_defined("KEEP"));
    }

    #[test]
    fn test_if_elif_chain() {
        let source = "#define LEVEL 2\n#if defined(NOPE)\nint a;\n#elif !defined LEVEL\nint b;\n#elif LEVEL\nint c;\n#else\nint d;\n#endif\n";
        let (table, diagnostics) = build(source);

        assert!(diagnostics.is_empty());
        assert!(!table.is_active(offset_of(source, "int a")));
        assert!(!table.is_active(offset_of(source, "int b")));
        assert!(table.is_active(offset_of(source, "int c")));
        assert!(!table.is_active(offset_of(source, "int d")));
    }

    #[test]
    fn test_nested_inactive_conditionals() {
        let source = "#if 0\n#ifdef X\nint a;\n#else\nint b;\n#endif\n#endif\nint c;\n";
        let (table, diagnostics) = build(source);

        assert!(diagnostics.is_empty());
        assert!(!table.is_active(offset_of(source, "int a")));
        assert!(!table.is_active(offset_of(source, "int b")));
        assert!(table.is_active(offset_of(source, "int c")));
    }

    #[test]
    fn test_arithmetic_condition() {
        let source = "#if (1 + 1) == 3\nint a;\n#endif\n";
        let (table, diagnostics) = build(source);
        assert!(diagnostics.is_empty());
        assert!(!table.is_active(offset_of(source, "int a")));
    }

    #[test]
    fn test_unsupported_condition_assumed_true() {
        let source = "#if VERSION(3) > 2\nint a;\n#endif\n";
        let (table, diagnostics) = build(source);

        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].severity, Severity::Warning);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::Macro);
        assert!(table.is_active(offset_of(source, "int a")));
    }

    #[test]
    fn test_malformed_directives() {
        let (_, diagnostics) = build("#define\n#endif\n#else\n#ifdef\n");

        let messages: Vec<&str> = diagnostics.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "macro name missing in #define",
                "#endif without #if",
                "#else without #if",
                "macro name missing in #ifdef",
                "unterminated conditional directive",
            ]
        );
        assert!(diagnostics.iter().all(|d| d.is_error() && d.kind == DiagnosticKind::Macro));
    }

    #[test]
    fn test_unterminated_conditional_masks_rest() {
        let source = "#if 0\nint a;\n";
        let (table, diagnostics) = build(source);

        assert_eq!(diagnostics.len(), 1);
        assert!(!table.is_active(offset_of(source, "int a")));
    }

    #[test]
    fn test_predefined_macros() {
        let mut predefined = MacroTable::new();
        predefined.define(MacroDefinition::object("FEATURE", "1"));

        let source = "#ifdef FEATURE\nint a;\n#endif\n";
        let (tokens, _) = lex(source);
        let (table, _) = build_macros_with(&tokens, predefined);

        assert!(table.is_active(offset_of(source, "int a")));
        assert_eq!(table.get("FEATURE").unwrap().line, 0);
    }

    #[test]
    fn test_include_and_pragma_ignored() {
        let (table, diagnostics) = build("#include <stdio.h>\n#pragma once\n#\n");
        assert!(diagnostics.is_empty());
        assert!(table.is_empty());
    }
}
