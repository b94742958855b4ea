//! Declarator parsing
//!
//! A declarator wraps the base type from the specifiers in pointer, array and
//! function layers and names the result:
//!
//! ```text
//! declarator  ::= ("*" qualifier* annotation*)* direct suffix* annotation*
//! direct      ::= identifier | "(" declarator ")" | ε
//! suffix      ::= "[" size? "]" | "(" parameters ")"
//! parameters  ::= "void" | param ("," param)* ("," "...")? | ε
//! ```
//!
//! Grouping parentheses are handled by parsing the suffix that follows the
//! group first, then re-entering the group with that type as the base. This
//! is what makes `int (*x)[3]` a pointer to an array while `int *x[3]` is an
//! array of pointers.

use crate::parser::ast::{ArraySize, Param, Qualifiers, SourceLocation, TypeExpr};
use crate::parser::declarations::SpecContext;
use crate::parser::expressions::evaluate;
use crate::parser::lexer::{join_tokens, Keyword, Punct, TokenKind};
use crate::parser::parse::{ParseError, Parser};

/// Whether a declarator must name something
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeclaratorMode {
    /// File-scope and member declarators; parentheses right after the
    /// specifiers always group
    Named,
    /// Parameters; the name may be omitted
    Abstract,
}

/// A parsed declarator: the complete type of the declared name
#[derive(Debug, Clone)]
pub(crate) struct Declarator {
    pub name: Option<String>,
    pub ty: TypeExpr,
    pub attributes: Vec<String>,
    pub offset: usize,
    pub location: SourceLocation,
}

impl<'m> Parser<'m> {
    pub(crate) fn parse_declarator(
        &mut self,
        base: TypeExpr,
        mode: DeclaratorMode,
    ) -> Result<Declarator, ParseError> {
        let mut ty = base;
        let mut attributes = Vec::new();

        loop {
            // Block pointers (`^`) are recorded as plain pointers
            if self.match_punct(Punct::Star) || self.match_punct(Punct::Caret) {
                let qualifiers = self.parse_pointer_qualifiers();
                ty = TypeExpr::qualified(qualifiers, TypeExpr::pointer_to(ty));
            } else if self.peek().kind == TokenKind::Ident && self.is_annotation(true) {
                attributes.push(self.take_annotation()?);
            } else {
                break;
            }
        }

        if self.check_punct(Punct::LParen) && self.is_grouping_paren(mode) {
            return self.parse_grouped_declarator(ty, mode, attributes);
        }

        let start = self.peek().clone();
        let name = if start.kind == TokenKind::Ident {
            self.advance();
            Some(start.lexeme.clone())
        } else {
            None
        };

        let ty = self.parse_type_suffix(ty)?;

        // Trailing annotations, e.g. `void f(void) __attribute__((noreturn))`
        while self.peek().kind == TokenKind::Ident {
            attributes.push(self.take_annotation()?);
        }

        Ok(Declarator {
            name,
            ty,
            attributes,
            offset: start.offset,
            location: start.location,
        })
    }

    /// Qualifiers after a `*`
    fn parse_pointer_qualifiers(&mut self) -> Qualifiers {
        let mut qualifiers = Qualifiers::default();
        loop {
            match self.peek().keyword() {
                Some(Keyword::Const) => qualifiers.is_const = true,
                Some(Keyword::Volatile) => qualifiers.is_volatile = true,
                Some(Keyword::Restrict) => qualifiers.is_restrict = true,
                _ => return qualifiers,
            }
            self.advance();
        }
    }

    /// Whether the `(` at the current position opens a grouped declarator
    /// rather than a parameter list
    fn is_grouping_paren(&self, mode: DeclaratorMode) -> bool {
        if mode == DeclaratorMode::Named {
            return true;
        }

        let next = self.peek_ahead(1);
        match next.kind {
            TokenKind::Punct(Punct::Star | Punct::Caret | Punct::LParen | Punct::LBracket) => true,
            TokenKind::Ident => !self.table.is_typedef_name(&next.lexeme),
            _ => false,
        }
    }

    /// `( declarator ) suffix`: the suffix applies to the base type first,
    /// and the inner declarator is built on top of the result
    fn parse_grouped_declarator(
        &mut self,
        base: TypeExpr,
        mode: DeclaratorMode,
        mut attributes: Vec<String>,
    ) -> Result<Declarator, ParseError> {
        let open = self.position;
        self.skip_group()?;
        let ty = self.parse_type_suffix(base)?;
        let end = self.position;
        let len_before = self.tokens.len();

        self.position = open + 1;
        let mut inner = self.parse_declarator(ty, mode)?;
        self.expect_punct(Punct::RParen, "to close grouped declarator")?;

        // Macro substitution inside the group shifts everything after it
        let shift = self.tokens.len() as isize - len_before as isize;
        self.position = end.checked_add_signed(shift).unwrap_or(end);

        attributes.append(&mut inner.attributes);
        inner.attributes = attributes;
        Ok(inner)
    }

    /// Array and function suffixes
    pub(crate) fn parse_type_suffix(&mut self, ty: TypeExpr) -> Result<TypeExpr, ParseError> {
        if self.match_punct(Punct::LBracket) {
            let size = if self.check_punct(Punct::RBracket) {
                None
            } else {
                let tokens = self.capture_until(&[Punct::RBracket])?;
                let value = evaluate(&tokens, |name| self.table.enum_constant(name))
                    .and_then(|v| u64::try_from(v).ok());
                Some(ArraySize {
                    text: join_tokens(&tokens),
                    value,
                })
            };
            self.expect_punct(Punct::RBracket, "after array size")?;

            let element = self.parse_type_suffix(ty)?;
            return Ok(TypeExpr::Array {
                element: Box::new(element),
                size,
            });
        }

        if self.match_punct(Punct::LParen) {
            let (params, variadic) = self.parse_parameter_list()?;
            return Ok(TypeExpr::Function {
                ret: Box::new(ty),
                params,
                variadic,
            });
        }

        Ok(ty)
    }

    /// Parameters after `(`, through the closing `)`. Both `()` and `(void)`
    /// mean no parameters.
    fn parse_parameter_list(&mut self) -> Result<(Vec<Param>, bool), ParseError> {
        let mut params = Vec::new();
        let mut variadic = false;

        if self.match_punct(Punct::RParen) {
            return Ok((params, variadic));
        }
        if self.check_keyword(Keyword::Void) && self.peek_ahead(1).is_punct(Punct::RParen) {
            self.advance();
            self.advance();
            return Ok((params, variadic));
        }

        loop {
            if self.match_punct(Punct::Ellipsis) {
                variadic = true;
                break;
            }

            let spec = self.parse_declaration_specifiers(SpecContext::Param)?;
            let declarator = self.parse_declarator(spec.base, DeclaratorMode::Abstract)?;
            params.push(Param {
                name: declarator.name,
                ty: declarator.ty,
            });

            if !self.match_punct(Punct::Comma) {
                break;
            }
        }

        self.expect_punct(Punct::RParen, "after parameters")?;
        Ok((params, variadic))
    }

    /// Whether the identifier at the current position is an annotation
    /// (calling convention, `__declspec(...)`, `__attribute__((...))`) rather
    /// than a type or declared name.
    ///
    /// With a parenthesized group it must be followed by more of the
    /// declaration, and the group must not look like a parameter list.
    /// Without one it must be followed by the declarator once the type is
    /// known, or by a type keyword before it.
    pub(crate) fn is_annotation(&self, has_type: bool) -> bool {
        let next = self.peek_ahead(1);

        if next.is_punct(Punct::LParen) {
            let open = self.position + 1;
            let Some(end) = self.group_end(open) else {
                return false;
            };
            if self.looks_like_parameters(open, end) {
                return false;
            }
            let follower = &self.tokens[end.min(self.tokens.len() - 1)];
            return follower.kind == TokenKind::Ident
                || follower.is_punct(Punct::Star)
                || follower.keyword().is_some_and(Keyword::starts_specifier);
        }

        match next.kind {
            TokenKind::Ident | TokenKind::Punct(Punct::Star) => has_type,
            TokenKind::Keyword(keyword) => {
                !has_type && keyword.starts_specifier() && !keyword.is_qualifier()
            }
            _ => false,
        }
    }

    /// Whether the group `tokens[open..end]` reads as a parameter list:
    /// empty, `void`, a type keyword or typedef name first, `...`, or two
    /// names in a row.
    fn looks_like_parameters(&self, open: usize, end: usize) -> bool {
        let inner = &self.tokens[open + 1..end - 1];
        let Some(first) = inner.first() else {
            return true;
        };

        if first.keyword().is_some_and(Keyword::starts_specifier)
            || self.table.is_typedef_name(&first.lexeme)
        {
            return true;
        }

        inner.iter().any(|t| t.is_punct(Punct::Ellipsis))
            || inner.windows(2).any(|pair| {
                pair[0].kind == TokenKind::Ident
                    && (pair[1].kind == TokenKind::Ident || pair[1].is_punct(Punct::Star))
            })
    }

    /// Consume an annotation (identifier plus optional parenthesized
    /// arguments) and return its text
    pub(crate) fn take_annotation(&mut self) -> Result<String, ParseError> {
        let start = self.position;
        self.advance();
        if self.check_punct(Punct::LParen) {
            self.skip_group()?;
        }
        Ok(join_tokens(&self.tokens[start..self.position]))
    }
}
