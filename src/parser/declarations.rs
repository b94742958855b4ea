//! Declaration parsing implementation
//!
//! This module handles the specifier half of C declarations and everything
//! that is registered in the type table:
//!
//! - External declarations: variables, prototypes, typedefs
//! - Function definitions, whose bodies are skipped unread
//! - Declaration specifiers: storage class, qualifiers, base type
//! - Struct/union/enum specifiers and their bodies
//!
//! # Grammar
//!
//! ```text
//! external_decl  ::= specifiers (";" | init_decl ("," init_decl)* ";" | declarator body)
//! init_decl      ::= declarator ("=" initializer)?
//! specifiers     ::= (storage | qualifier | type_word | record | enum | typedef_name | annotation)+
//! record         ::= ("struct" | "union") tag? ("{" member* "}")?
//! member         ::= specifiers (member_decl ("," member_decl)*)? ";"
//! member_decl    ::= declarator? (":" width)? ("=" default)?
//! enum           ::= "enum" tag? ("{" enumerator ("," enumerator)* ","? "}")?
//! ```
//!
//! Initializers, bit widths, member defaults and enum values are captured as
//! opaque text. Identifiers in specifier position are classified by
//! [`Parser::classify_identifier`].
//!
//! All parsing methods are implemented as `pub(crate)` methods on the [`Parser`] struct.

use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::parser::ast::*;
use crate::parser::declarator::DeclaratorMode;
use crate::parser::expressions::evaluate;
use crate::parser::lexer::{join_tokens, Keyword, Punct, Token, TokenKind};
use crate::parser::parse::{ParseError, Parser, PendingRef};
use crate::types::{Definition, Registration, Symbol, SymbolKind};
use log::{debug, trace};

/// Where a list of specifiers appears
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SpecContext {
    File,
    Member,
    Param,
}

/// The specifier half of a declaration
#[derive(Debug, Clone)]
pub(crate) struct DeclSpec {
    pub storage: StorageClass,
    /// Base type with the specifier qualifiers applied
    pub base: TypeExpr,
    pub attributes: Vec<String>,
}

/// What an identifier in specifier position turned out to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IdentRole {
    /// A typedef name, known or provisional
    TypeName,
    /// A macro whose replacement has been spliced into the token stream
    Substituted,
    /// Calling convention or similar, recorded verbatim
    Annotation,
    /// The start of the declarator
    Declarator,
}

impl<'m> Parser<'m> {
    /// Parse one external declaration, including a trailing `;` or a skipped
    /// function body
    pub(crate) fn parse_external_declaration(&mut self) -> Result<(), ParseError> {
        if self.match_punct(Punct::Semicolon) {
            return Ok(());
        }

        let spec = self.parse_declaration_specifiers(SpecContext::File)?;

        // Tag declaration only, e.g. `struct s { ... };`
        if self.match_punct(Punct::Semicolon) {
            return Ok(());
        }

        loop {
            let declarator = self.parse_declarator(spec.base.clone(), DeclaratorMode::Named)?;
            let Some(name) = declarator.name else {
                return Err(self.unexpected("identifier in declaration"));
            };

            let mut attributes = spec.attributes.clone();
            attributes.extend(declarator.attributes);

            let mut declaration = Declaration {
                name,
                ty: declarator.ty,
                storage: spec.storage,
                initializer: None,
                attributes,
                is_definition: false,
                offset: declarator.offset,
                location: declarator.location,
            };

            if declaration.ty.is_function()
                && spec.storage != StorageClass::Typedef
                && self.check_punct(Punct::LBrace)
            {
                self.skip_group()?;
                trace!("skipped body of '{}'", declaration.name);
                declaration.is_definition = true;
                self.add_declaration(declaration);
                return Ok(());
            }

            if self.match_punct(Punct::Eq) {
                let tokens = self.capture_until(&[Punct::Comma, Punct::Semicolon])?;
                if tokens.is_empty() {
                    return Err(self.unexpected("initializer"));
                }
                declaration.initializer = Some(join_tokens(&tokens));
            }

            self.add_declaration(declaration);

            if !self.match_punct(Punct::Comma) {
                break;
            }
        }

        self.expect_punct(Punct::Semicolon, "after declaration")
    }

    /// Register a declaration in the table and record it
    fn add_declaration(&mut self, declaration: Declaration) {
        let definition = match declaration.storage {
            StorageClass::Typedef => Definition::Typedef(declaration.ty.clone()),
            storage => Definition::Symbol(Symbol {
                kind: if declaration.ty.is_function() {
                    SymbolKind::Function
                } else {
                    SymbolKind::Variable
                },
                ty: declaration.ty.clone(),
                storage,
            }),
        };

        self.register(
            &declaration.name,
            definition,
            declaration.offset,
            declaration.location,
        );
        debug!("declared {}", declaration);
        self.declarations.push(declaration);
    }

    /// Register a definition, warning when it replaces a differing one
    pub(crate) fn register(
        &mut self,
        name: &str,
        definition: Definition,
        offset: usize,
        location: SourceLocation,
    ) {
        let what = match &definition {
            Definition::Tag(_) => "tag",
            Definition::Typedef(_) => "typedef",
            Definition::Symbol(_) => "symbol",
        };

        if let Registration::Redefined { previous } =
            self.table.register(name, definition, offset, location)
        {
            self.diagnostics.push(
                Diagnostic::warning(
                    DiagnosticKind::Redefinition,
                    offset,
                    location,
                    format!(
                        "{what} '{name}' redefined (previous definition at line {})",
                        previous.line
                    ),
                )
                .with_name(name),
            );
        }
    }

    /// Parse declaration specifiers: storage class, qualifiers, base type and
    /// annotations, in any order
    pub(crate) fn parse_declaration_specifiers(
        &mut self,
        context: SpecContext,
    ) -> Result<DeclSpec, ParseError> {
        let mut storage = StorageClass::None;
        let mut qualifiers = Qualifiers::default();
        let mut words: Vec<String> = Vec::new();
        let mut base: Option<TypeExpr> = None;
        let mut attributes = Vec::new();

        loop {
            let token = self.peek().clone();
            let has_type = base.is_some() || !words.is_empty();

            match token.kind {
                TokenKind::Keyword(keyword) => {
                    if let Some(class) = storage_class(keyword) {
                        let allowed = match context {
                            SpecContext::File => true,
                            SpecContext::Member => false,
                            SpecContext::Param => class == StorageClass::Register,
                        };
                        if !allowed {
                            return Err(self.invalid(
                                &token,
                                format!("storage class '{}' not allowed here", token.lexeme),
                            ));
                        }
                        storage = class;
                        self.advance();
                        continue;
                    }

                    match keyword {
                        Keyword::Inline | Keyword::Noreturn => attributes.push(token.lexeme.clone()),
                        Keyword::Const => qualifiers.is_const = true,
                        Keyword::Volatile => qualifiers.is_volatile = true,
                        Keyword::Restrict => qualifiers.is_restrict = true,
                        keyword if keyword.is_primitive() => {
                            if base.is_some() {
                                return Err(self.invalid(
                                    &token,
                                    format!("conflicting type specifier '{}'", token.lexeme),
                                ));
                            }
                            words.push(token.lexeme.clone());
                        }
                        Keyword::Struct | Keyword::Union | Keyword::Enum => {
                            if has_type {
                                return Err(self.invalid(
                                    &token,
                                    format!("conflicting type specifier '{}'", token.lexeme),
                                ));
                            }
                            self.advance();
                            base = Some(match keyword {
                                Keyword::Struct => self.parse_record_specifier(RecordKind::Struct)?,
                                Keyword::Union => self.parse_record_specifier(RecordKind::Union)?,
                                _ => self.parse_enum_specifier()?,
                            });
                            continue;
                        }
                        _ => break,
                    }
                    self.advance();
                }
                TokenKind::Ident => match self.classify_identifier(has_type, context) {
                    IdentRole::TypeName => {
                        if !self.table.is_typedef_name(&token.lexeme) {
                            self.pending_refs.push(PendingRef {
                                name: token.lexeme.clone(),
                                offset: token.offset,
                                location: token.location,
                            });
                        }
                        base = Some(TypeExpr::typedef_ref(&token.lexeme));
                        self.advance();
                    }
                    IdentRole::Substituted => {}
                    IdentRole::Annotation => {
                        let annotation = self.take_annotation()?;
                        attributes.push(annotation);
                    }
                    IdentRole::Declarator => break,
                },
                _ => break,
            }
        }

        let base = match base {
            Some(base) => base,
            None if !words.is_empty() => TypeExpr::Primitive(words.join(" ")),
            // Implicit int: `static x;`, `const y;`
            None if storage != StorageClass::None || !qualifiers.is_empty() => {
                TypeExpr::primitive("int")
            }
            None => return Err(self.unexpected("declaration specifiers")),
        };

        Ok(DeclSpec {
            storage,
            base: TypeExpr::qualified(qualifiers, base),
            attributes,
        })
    }

    /// Decide what the identifier at the current position is, given whether
    /// a base type has already been seen.
    ///
    /// In order: a registered typedef name; a macro whose replacement begins
    /// a type (substituted in place); an annotation such as a calling
    /// convention; an unknown name used as a type because a declarator
    /// follows it; otherwise the declarator itself.
    pub(crate) fn classify_identifier(&mut self, has_type: bool, context: SpecContext) -> IdentRole {
        let token = self.peek();

        if !has_type && self.table.is_typedef_name(&token.lexeme) {
            return IdentRole::TypeName;
        }
        if !token.expanded && self.try_substitute_macro(has_type) {
            return IdentRole::Substituted;
        }
        if self.is_annotation(has_type) {
            return IdentRole::Annotation;
        }

        if !has_type {
            let next = self.peek_ahead(1);
            let declarator_follows = match next.kind {
                TokenKind::Ident | TokenKind::Punct(Punct::Star) => true,
                TokenKind::Keyword(keyword) => keyword.is_qualifier(),
                TokenKind::Punct(Punct::Comma | Punct::RParen | Punct::LBracket | Punct::LParen) => {
                    context == SpecContext::Param
                }
                _ => false,
            };
            if declarator_follows {
                return IdentRole::TypeName;
            }
        }

        IdentRole::Declarator
    }

    /// Splice in the replacement of an object-like macro when it stands for
    /// part of a type. An empty replacement vanishes when the declaration
    /// clearly continues after it.
    fn try_substitute_macro(&mut self, has_type: bool) -> bool {
        let token = self.peek().clone();
        let Some(replacement) = self.macros.substitute(&token.lexeme, &token) else {
            return false;
        };

        let accept = match replacement.first() {
            None => {
                let next = self.peek_ahead(1);
                matches!(next.kind, TokenKind::Ident | TokenKind::Keyword(_))
                    || next.is_punct(Punct::Star)
                    || next.is_punct(Punct::LParen)
            }
            Some(first) => match first.kind {
                TokenKind::Keyword(keyword) if has_type => keyword.is_qualifier(),
                TokenKind::Keyword(keyword) => keyword.starts_specifier(),
                TokenKind::Ident => !has_type && self.table.is_typedef_name(&first.lexeme),
                _ => false,
            },
        };

        if accept {
            trace!(
                "substituting macro '{}' at line {}",
                token.lexeme,
                token.location.line
            );
            self.tokens
                .splice(self.position..self.position + 1, replacement);
        }
        accept
    }

    /// Parse a struct or union specifier after its keyword
    pub(crate) fn parse_record_specifier(&mut self, kind: RecordKind) -> Result<TypeExpr, ParseError> {
        let keyword = self.previous().clone();
        self.skip_tag_annotations()?;
        let tag = self.tag_name();

        let forward = |tag: &Token| {
            TypeExpr::Record(RecordType {
                kind,
                tag: Some(tag.lexeme.clone()),
                fields: None,
            })
        };

        if !self.check_punct(Punct::LBrace) {
            let Some(tag) = tag else {
                return Err(self.unexpected(format!("tag name or '{{' after '{}'", keyword.lexeme)));
            };
            self.register(&tag.lexeme, Definition::Tag(forward(&tag)), tag.offset, tag.location);
            return Ok(TypeExpr::tag_ref(kind.into(), &tag.lexeme));
        }

        // Register the tag first so the body can refer to it
        if let Some(tag) = &tag {
            self.register(&tag.lexeme, Definition::Tag(forward(tag)), tag.offset, tag.location);
        }

        self.advance();
        let fields = self.parse_members()?;
        let record = RecordType {
            kind,
            tag: tag.as_ref().map(|t| t.lexeme.clone()),
            fields: Some(fields),
        };

        Ok(match tag {
            Some(tag) => {
                self.register(
                    &tag.lexeme,
                    Definition::Tag(TypeExpr::Record(record)),
                    tag.offset,
                    tag.location,
                );
                TypeExpr::tag_ref(kind.into(), &tag.lexeme)
            }
            None => TypeExpr::Record(record),
        })
    }

    /// Parse member declarations up to and including the closing `}`.
    /// A malformed member is reported and skipped.
    fn parse_members(&mut self) -> Result<Vec<Field>, ParseError> {
        let mut fields = Vec::new();

        loop {
            if self.match_punct(Punct::RBrace) {
                return Ok(fields);
            }
            if self.is_at_end() {
                return Err(self.unexpected("'}' to close member list"));
            }

            let refs = self.pending_refs.len();
            if let Err(err) = self.parse_member_declaration(&mut fields) {
                debug!("bad member at line {}: {}", err.location().line, err);
                self.pending_refs.truncate(refs);
                self.diagnostics.push(err.into_diagnostic());
                self.skip_member();
            }
        }
    }

    fn parse_member_declaration(&mut self, fields: &mut Vec<Field>) -> Result<(), ParseError> {
        let spec = self.parse_declaration_specifiers(SpecContext::Member)?;

        if self.match_punct(Punct::Semicolon) {
            // Anonymous struct/union member; a named tag here only declares it
            if matches!(spec.base, TypeExpr::Record(_)) {
                fields.push(Field {
                    name: None,
                    ty: spec.base,
                    bit_width: None,
                    default: None,
                });
            }
            return Ok(());
        }

        loop {
            let (name, ty) = if self.check_punct(Punct::Colon) {
                // Unnamed bit-field
                (None, spec.base.clone())
            } else {
                let declarator = self.parse_declarator(spec.base.clone(), DeclaratorMode::Named)?;
                if declarator.name.is_none() && !self.check_punct(Punct::Colon) {
                    return Err(self.unexpected("member name"));
                }
                (declarator.name, declarator.ty)
            };

            let bit_width = if self.match_punct(Punct::Colon) {
                Some(self.capture_text(&[Punct::Comma, Punct::Semicolon, Punct::Eq], "bit-field width")?)
            } else {
                None
            };
            let default = if self.match_punct(Punct::Eq) {
                Some(self.capture_text(&[Punct::Comma, Punct::Semicolon], "member default value")?)
            } else {
                None
            };

            fields.push(Field {
                name,
                ty,
                bit_width,
                default,
            });

            if !self.match_punct(Punct::Comma) {
                break;
            }
        }

        self.expect_punct(Punct::Semicolon, "after struct member")
    }

    /// Skip the rest of a broken member: through the next `;` or up to the
    /// `}` that closes the member list
    fn skip_member(&mut self) {
        let mut depth = 0usize;
        while !self.is_at_end() {
            match self.peek().kind {
                TokenKind::Punct(Punct::Semicolon) if depth == 0 => {
                    self.advance();
                    return;
                }
                TokenKind::Punct(Punct::RBrace) if depth == 0 => return,
                TokenKind::Punct(Punct::LBrace) => depth += 1,
                TokenKind::Punct(Punct::RBrace) => depth -= 1,
                _ => {}
            }
            self.advance();
        }
    }

    /// Parse an enum specifier after the `enum` keyword
    pub(crate) fn parse_enum_specifier(&mut self) -> Result<TypeExpr, ParseError> {
        let keyword = self.previous().clone();
        self.skip_tag_annotations()?;
        let tag = self.tag_name();

        let forward = |tag: &Token| {
            TypeExpr::Enum(EnumType {
                tag: Some(tag.lexeme.clone()),
                enumerators: None,
            })
        };

        if !self.check_punct(Punct::LBrace) {
            let Some(tag) = tag else {
                return Err(self.unexpected(format!("tag name or '{{' after '{}'", keyword.lexeme)));
            };
            self.register(&tag.lexeme, Definition::Tag(forward(&tag)), tag.offset, tag.location);
            return Ok(TypeExpr::tag_ref(TagKind::Enum, &tag.lexeme));
        }

        if let Some(tag) = &tag {
            self.register(&tag.lexeme, Definition::Tag(forward(tag)), tag.offset, tag.location);
        }

        self.advance();
        let enumerators = self.parse_enumerators()?;
        let enum_type = EnumType {
            tag: tag.as_ref().map(|t| t.lexeme.clone()),
            enumerators: Some(enumerators),
        };

        Ok(match tag {
            Some(tag) => {
                self.register(
                    &tag.lexeme,
                    Definition::Tag(TypeExpr::Enum(enum_type)),
                    tag.offset,
                    tag.location,
                );
                TypeExpr::tag_ref(TagKind::Enum, &tag.lexeme)
            }
            None => TypeExpr::Enum(enum_type),
        })
    }

    /// Parse enumerators up to and including the closing `}`. Values without
    /// an explicit expression continue from the previous one, starting at 0.
    fn parse_enumerators(&mut self) -> Result<Vec<Enumerator>, ParseError> {
        let mut enumerators: Vec<Enumerator> = Vec::new();
        let mut next_value = Some(0i64);

        loop {
            if self.match_punct(Punct::RBrace) {
                break;
            }

            let name = self.expect_identifier("in enum body")?;
            let (text, value) = if self.match_punct(Punct::Eq) {
                let tokens = self.capture_until(&[Punct::Comma, Punct::RBrace])?;
                if tokens.is_empty() {
                    return Err(self.unexpected("enumerator value"));
                }
                let value = evaluate(&tokens, |ident| {
                    enumerators
                        .iter()
                        .find(|e| e.name == ident)
                        .map_or_else(|| self.table.enum_constant(ident), |e| e.value)
                });
                (Some(join_tokens(&tokens)), value)
            } else {
                (None, next_value)
            };
            next_value = value.and_then(|v| v.checked_add(1));

            self.register(
                &name.lexeme,
                Definition::Symbol(Symbol {
                    kind: SymbolKind::EnumConstant { value },
                    ty: TypeExpr::primitive("int"),
                    storage: StorageClass::None,
                }),
                name.offset,
                name.location,
            );
            enumerators.push(Enumerator {
                name: name.lexeme,
                text,
                value,
            });

            if !self.match_punct(Punct::Comma) {
                self.expect_punct(Punct::RBrace, "after enumerator")?;
                break;
            }
        }

        Ok(enumerators)
    }

    /// Consume the tag name after `struct`/`union`/`enum`, if there is one
    fn tag_name(&mut self) -> Option<Token> {
        if self.peek().kind == TokenKind::Ident {
            Some(self.advance().clone())
        } else {
            None
        }
    }

    /// Drop annotations between a tag keyword and the tag name, e.g.
    /// `struct __declspec(align(8)) name` or `struct PACKED name {`.
    /// In `struct name inst;` the first identifier is the tag.
    fn skip_tag_annotations(&mut self) -> Result<(), ParseError> {
        while self.peek().kind == TokenKind::Ident {
            let next = self.peek_ahead(1);
            let annotation = match next.kind {
                TokenKind::Ident => {
                    let after = self.peek_ahead(2);
                    after.kind == TokenKind::Ident || after.is_punct(Punct::LBrace)
                }
                TokenKind::Punct(Punct::LParen) => self.group_end(self.position + 1).is_some_and(|end| {
                    let follower = &self.tokens[end.min(self.tokens.len() - 1)];
                    follower.kind == TokenKind::Ident || follower.is_punct(Punct::LBrace)
                }),
                _ => false,
            };
            if !annotation {
                break;
            }
            let skipped = self.take_annotation()?;
            debug!("ignoring tag annotation '{}'", skipped);
        }
        Ok(())
    }

    /// Capture opaque text up to one of `stops`; it must not be empty
    fn capture_text(&mut self, stops: &[Punct], what: &str) -> Result<String, ParseError> {
        let tokens = self.capture_until(stops)?;
        if tokens.is_empty() {
            return Err(self.unexpected(what));
        }
        Ok(join_tokens(&tokens))
    }
}

fn storage_class(keyword: Keyword) -> Option<StorageClass> {
    match keyword {
        Keyword::Typedef => Some(StorageClass::Typedef),
        Keyword::Static => Some(StorageClass::Static),
        Keyword::Extern => Some(StorageClass::Extern),
        Keyword::Auto => Some(StorageClass::Auto),
        Keyword::Register => Some(StorageClass::Register),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use crate::diagnostics::DiagnosticKind;
    use crate::parser::ast::*;
    use crate::parser::lexer::lex;
    use crate::parser::macros::build_macros;
    use crate::parser::parse::{parse_translation_unit, ParseOutput};
    use crate::types::{Namespace, SymbolKind, TypeTable};
    use pretty_assertions::assert_eq;

    fn parse(source: &str) -> ParseOutput {
        let (tokens, _) = lex(source);
        let (macros, _) = build_macros(&tokens);
        parse_translation_unit(tokens, &macros, TypeTable::new())
    }

    fn decl<'a>(output: &'a ParseOutput, name: &str) -> &'a Declaration {
        output
            .declarations
            .iter()
            .find(|d| d.name == name)
            .unwrap_or_else(|| panic!("no declaration named {name}"))
    }

    #[test]
    fn test_storage_and_qualifiers() {
        let output = parse("static const int constVar = 5;\nextern volatile unsigned long counter;");
        assert!(output.diagnostics.is_empty());

        let const_var = decl(&output, "constVar");
        assert_eq!(const_var.storage, StorageClass::Static);
        assert_eq!(const_var.initializer.as_deref(), Some("5"));
        assert_eq!(const_var.to_string(), "static const int constVar = 5");

        let counter = decl(&output, "counter");
        assert_eq!(counter.storage, StorageClass::Extern);
        assert_eq!(counter.ty.declarator("counter"), "volatile unsigned long counter");
    }

    #[test]
    fn test_typedef_list() {
        let output = parse("typedef int typeInt, *typeIntPtr, typeIntArr[10], typeIntDArr[5][5];");
        assert!(output.diagnostics.is_empty());

        let rendered: Vec<String> = output
            .declarations
            .iter()
            .map(|d| d.ty.declarator(&d.name))
            .collect();
        assert_eq!(
            rendered,
            vec![
                "int typeInt",
                "int *typeIntPtr",
                "int typeIntArr[10]",
                "int typeIntDArr[5][5]",
            ]
        );
        assert!(output.declarations.iter().all(|d| d.storage == StorageClass::Typedef));
        assert!(output.table.is_typedef_name("typeIntDArr"));
    }

    #[test]
    fn test_typedef_name_as_type() {
        let output = parse("typedef int typeInt;\ntypedef typeInt typeTypeInt;\ntypeTypeInt *ttip5[5];");
        assert!(output.diagnostics.is_empty());

        let ttip5 = decl(&output, "ttip5");
        assert_eq!(ttip5.ty.declarator("ttip5"), "typeTypeInt *ttip5[5]");
        assert_eq!(
            output.table.resolve_fully("typeTypeInt", Namespace::Typedef),
            Ok(&TypeExpr::primitive("int"))
        );
    }

    #[test]
    fn test_struct_definition_and_instance() {
        let source = "struct structName {\n  int x; int y;\n  char str[10] = \"brace }  \\0\"; /* brace } */\n} structInst;";
        let output = parse(source);
        assert!(output.diagnostics.is_empty());

        let inst = decl(&output, "structInst");
        assert_eq!(inst.ty, TypeExpr::tag_ref(TagKind::Struct, "structName"));

        let TypeExpr::Record(record) = &output.table.tag("structName").unwrap().definition else {
            panic!("expected a record");
        };
        let fields = record.fields.as_ref().unwrap();
        let names: Vec<Option<&str>> = fields.iter().map(|f| f.name.as_deref()).collect();
        assert_eq!(names, vec![Some("x"), Some("y"), Some("str")]);
        assert_eq!(fields[2].default.as_deref(), Some("\"brace }  \\0\""));
    }

    #[test]
    fn test_self_referential_struct() {
        let output = parse("struct recursiveStruct { struct recursiveStruct *next; };");
        assert!(output.diagnostics.is_empty());

        let TypeExpr::Record(record) = &output.table.tag("recursiveStruct").unwrap().definition else {
            panic!("expected a record");
        };
        let next = &record.fields.as_ref().unwrap()[0];
        assert_eq!(
            next.ty,
            TypeExpr::pointer_to(TypeExpr::tag_ref(TagKind::Struct, "recursiveStruct"))
        );
    }

    #[test]
    fn test_anonymous_struct_typedef() {
        let output = parse("typedef struct { int x; } *anonStructPtr;");
        assert!(output.diagnostics.is_empty());

        let TypeExpr::Pointer(target) = &decl(&output, "anonStructPtr").ty else {
            panic!("expected a pointer");
        };
        assert!(matches!(&**target, TypeExpr::Record(RecordType { tag: None, .. })));
        assert_eq!(output.table.tags().count(), 0);
    }

    #[test]
    fn test_union_and_bitfields() {
        let output = parse("union u { int x; struct { unsigned a : 3, : 2; }; };");
        assert!(output.diagnostics.is_empty());

        let TypeExpr::Record(record) = &output.table.tag("u").unwrap().definition else {
            panic!("expected a record");
        };
        assert_eq!(record.kind, RecordKind::Union);
        let fields = record.fields.as_ref().unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[1].name, None);

        let TypeExpr::Record(inner) = &fields[1].ty else {
            panic!("expected an anonymous struct");
        };
        let inner_fields = inner.fields.as_ref().unwrap();
        assert_eq!(inner_fields[0].bit_width.as_deref(), Some("3"));
        assert_eq!(inner_fields[1].name, None);
        assert_eq!(inner_fields[1].bit_width.as_deref(), Some("2"));
    }

    #[test]
    fn test_malformed_member_is_skipped() {
        let output = parse("struct s { int a; int = 3; int b; };\nint after;");

        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.diagnostics[0].kind, DiagnosticKind::Syntax);

        let TypeExpr::Record(record) = &output.table.tag("s").unwrap().definition else {
            panic!("expected a record");
        };
        let names: Vec<Option<&str>> = record
            .fields
            .as_ref()
            .unwrap()
            .iter()
            .map(|f| f.name.as_deref())
            .collect();
        assert_eq!(names, vec![Some("a"), Some("b")]);
        assert!(output.declarations.iter().any(|d| d.name == "after"));
    }

    #[test]
    fn test_enum_values() {
        let output = parse("enum enumName {\n enum1=2,\n enum2=0, enum3,\n enum4\n} enumInst;");
        assert!(output.diagnostics.is_empty());

        let TypeExpr::Enum(enum_type) = &output.table.tag("enumName").unwrap().definition else {
            panic!("expected an enum");
        };
        let values: Vec<(&str, Option<i64>)> = enum_type
            .enumerators
            .as_ref()
            .unwrap()
            .iter()
            .map(|e| (e.name.as_str(), e.value))
            .collect();
        assert_eq!(
            values,
            vec![("enum1", Some(2)), ("enum2", Some(0)), ("enum3", Some(1)), ("enum4", Some(2))]
        );
        assert_eq!(output.table.enum_constant("enum3"), Some(1));
        assert_eq!(
            output.table.symbol("enum4").unwrap().definition.kind,
            SymbolKind::EnumConstant { value: Some(2) }
        );
    }

    #[test]
    fn test_enum_values_from_expressions() {
        let output = parse("enum flags { A = 1 << 2, B = A | 1, C, D = UNKNOWN, E, };");
        assert!(output.diagnostics.is_empty());

        let values: Vec<Option<i64>> = ["A", "B", "C", "D", "E"]
            .iter()
            .map(|name| output.table.enum_constant(name))
            .collect();
        assert_eq!(values, vec![Some(4), Some(5), Some(6), None, None]);

        let TypeExpr::Enum(enum_type) = &output.table.tag("flags").unwrap().definition else {
            panic!("expected an enum");
        };
        assert_eq!(enum_type.enumerators.as_ref().unwrap()[0].text.as_deref(), Some("1 << 2"));
    }

    #[test]
    fn test_function_definition_body_skipped() {
        let output = parse("int **function3(int x, int y)\n{\n JUNK\n { }\n int localVariable = 1;\n}\nint after;");
        assert!(output.diagnostics.is_empty());

        let function = decl(&output, "function3");
        assert!(function.is_definition);
        assert_eq!(function.ty.declarator("function3"), "int **function3(int x, int y)");
        assert!(output.declarations.iter().all(|d| d.name != "localVariable"));
        assert!(output.declarations.iter().any(|d| d.name == "after"));
    }

    #[test]
    fn test_calling_convention_annotations() {
        let output = parse("int __declspec(dllexport) __stdcall function1();");
        assert!(output.diagnostics.is_empty());

        let function = decl(&output, "function1");
        assert_eq!(function.attributes, vec!["__declspec(dllexport)", "__stdcall"]);
        assert_eq!(function.ty.declarator("function1"), "int function1()");
    }

    #[test]
    fn test_trailing_annotation_after_prototype() {
        let output = parse("void f(void) __THROW;\nvoid g(int) __attribute__((noreturn));");
        assert!(output.diagnostics.is_empty());

        assert_eq!(decl(&output, "f").attributes, vec!["__THROW"]);
        assert_eq!(decl(&output, "g").attributes, vec!["__attribute__((noreturn))"]);
    }

    #[test]
    fn test_type_macro_is_substituted() {
        let output = parse("#define STR const char *\n#define EXPORT\nEXPORT STR name;\nint MACRO1;");
        assert!(output.diagnostics.is_empty());

        assert_eq!(decl(&output, "name").ty.declarator("name"), "const char *name");
        assert!(decl(&output, "name").attributes.is_empty());
        assert_eq!(decl(&output, "MACRO1").ty, TypeExpr::primitive("int"));
    }

    #[test]
    fn test_name_macro_is_not_substituted() {
        let output = parse("#define MACRO1 macro1\nint MACRO1;");
        assert!(output.diagnostics.is_empty());
        assert_eq!(output.declarations[0].name, "MACRO1");
    }

    #[test]
    fn test_redefinition_warning() {
        let output = parse("typedef int T;\ntypedef char T;\nstruct s { int a; };\nstruct s { int b; };");

        let redefinitions: Vec<&str> = output
            .diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::Redefinition)
            .filter_map(|d| d.name.as_deref())
            .collect();
        assert_eq!(redefinitions, vec!["T", "s"]);
        assert_eq!(
            output.table.typedef("T").unwrap().definition,
            TypeExpr::primitive("char")
        );
    }

    #[test]
    fn test_prototype_then_definition_is_not_a_redefinition() {
        let output = parse("int add(int a, int b);\nint add(int x, int y) { return x + y; }");
        assert!(output.diagnostics.is_empty());
        assert_eq!(output.declarations.len(), 2);
    }

    #[test]
    fn test_tag_followed_by_declarator_name() {
        let output = parse(
            "struct s { int x; };\nstruct s inst;\nunion u { int a; };\nunion u w;\nenum e { A };\nenum e v;",
        );

        assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
        let tags: Vec<&str> = output.table.tags().map(|(name, _)| name).collect();
        assert_eq!(tags, vec!["s", "u", "e"]);
        assert_eq!(decl(&output, "inst").ty.declarator("inst"), "struct s inst");
        assert_eq!(decl(&output, "w").ty.declarator("w"), "union u w");
        assert_eq!(decl(&output, "v").ty.declarator("v"), "enum e v");
    }

    #[test]
    fn test_typedef_sharing_its_tag_name() {
        let output = parse(
            "typedef struct node node;\nstruct node { node *next; };\ntypedef enum color color_t;",
        );

        assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
        assert_eq!(
            output.table.typedef("node").unwrap().definition,
            TypeExpr::tag_ref(TagKind::Struct, "node")
        );
        assert_eq!(
            output.table.typedef("color_t").unwrap().definition,
            TypeExpr::tag_ref(TagKind::Enum, "color")
        );

        let TypeExpr::Record(record) = &output.table.tag("node").unwrap().definition else {
            panic!("node is not a record");
        };
        let next = &record.fields.as_ref().unwrap()[0];
        assert_eq!(next.ty, TypeExpr::pointer_to(TypeExpr::typedef_ref("node")));
        assert!(output.table.tag("color_t").is_none());
    }

    #[test]
    fn test_annotation_before_tag_name() {
        let output = parse("struct PACKED s { char c; int i; };\nstruct s value;");

        assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
        let tags: Vec<&str> = output.table.tags().map(|(name, _)| name).collect();
        assert_eq!(tags, vec!["s"]);
        assert_eq!(decl(&output, "value").ty.declarator("value"), "struct s value");
    }

    #[test]
    fn test_failed_member_reports_no_unresolved_name() {
        let output = parse("struct s { mystery m = ; int ok; };");

        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.diagnostics[0].kind, DiagnosticKind::Syntax);
    }

    #[test]
    fn test_missing_specifiers_is_an_error() {
        let output = parse("x;\nint y;");
        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.diagnostics[0].kind, DiagnosticKind::Syntax);
        assert_eq!(output.declarations[0].name, "y");
    }
}
