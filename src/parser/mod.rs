//! C header declaration parser
//!
//! This module turns header text into declarations and a type table:
//! - [`lexer`]: Tokenization (source text → tokens, directives as whole lines)
//! - [`macros`]: Macro table built from `#define`/`#undef`, conditional regions
//! - [`parse`]: Parser coordinator, recovery and the finishing pass
//! - [`ast`]: Type expressions and declaration records
//!
//! # Parser Implementation
//!
//! Hand-written recursive descent parser over a token vector. Declaration
//! specifiers and tag bodies live in `declarations`, declarators in
//! `declarator`, constant expressions in [`expressions`].
//! No external parser generator dependencies.

pub mod ast;
mod declarations;
mod declarator;
pub mod expressions;
pub mod lexer;
pub mod macros;
pub mod parse;

pub use lexer::{lex, tokenize, Token, TokenKind};
pub use macros::{build_macros, build_macros_with, MacroDefinition, MacroTable};
pub use parse::{parse_translation_unit, ParseError, ParseOutput, Parser};
