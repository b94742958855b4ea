//! Lexer (tokenizer) for C header source
//!
//! Converts raw source text into a lazy stream of [`Token`]s. Comments never
//! become tokens, and the lexer keeps the three kinds of "skippable" text
//! apart: a `/*` inside a string literal is part of the string, and a `"`
//! inside a comment is part of the comment.
//!
//! Preprocessor lines (a `#` that is the first non-blank character of a line)
//! are emitted as a single [`TokenKind::Directive`] token whose lexeme is the
//! whole logical line: backslash-newline continuations merged, comments
//! removed and runs of whitespace collapsed. The macro pre-pass works from
//! those tokens.
//!
//! Malformed input never stops the lexer. Unterminated literals and comments
//! and stray characters are recorded as [`Diagnostic`]s.

use super::ast::SourceLocation;
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use log::trace;
use std::fmt;

/// C keywords
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    // Type specifiers
    Void,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Signed,
    Unsigned,
    Bool,
    Complex,

    // Tagged types
    Struct,
    Union,
    Enum,

    // Storage classes
    Typedef,
    Static,
    Extern,
    Auto,
    Register,

    // Function specifiers
    Inline,
    Noreturn,

    // Qualifiers
    Const,
    Volatile,
    Restrict,

    // Statements and operators (only ever skipped inside bodies)
    Sizeof,
    If,
    Else,
    While,
    Do,
    For,
    Switch,
    Case,
    Default,
    Break,
    Continue,
    Return,
    Goto,
}

impl Keyword {
    pub fn from_ident(ident: &str) -> Option<Self> {
        let keyword = match ident {
            "void" => Keyword::Void,
            "char" => Keyword::Char,
            "short" => Keyword::Short,
            "int" => Keyword::Int,
            "long" => Keyword::Long,
            "float" => Keyword::Float,
            "double" => Keyword::Double,
            "signed" => Keyword::Signed,
            "unsigned" => Keyword::Unsigned,
            "_Bool" => Keyword::Bool,
            "_Complex" => Keyword::Complex,
            "struct" => Keyword::Struct,
            "union" => Keyword::Union,
            "enum" => Keyword::Enum,
            "typedef" => Keyword::Typedef,
            "static" => Keyword::Static,
            "extern" => Keyword::Extern,
            "auto" => Keyword::Auto,
            "register" => Keyword::Register,
            "inline" => Keyword::Inline,
            "_Noreturn" => Keyword::Noreturn,
            "const" => Keyword::Const,
            "volatile" => Keyword::Volatile,
            "restrict" => Keyword::Restrict,
            "sizeof" => Keyword::Sizeof,
            "if" => Keyword::If,
            "else" => Keyword::Else,
            "while" => Keyword::While,
            "do" => Keyword::Do,
            "for" => Keyword::For,
            "switch" => Keyword::Switch,
            "case" => Keyword::Case,
            "default" => Keyword::Default,
            "break" => Keyword::Break,
            "continue" => Keyword::Continue,
            "return" => Keyword::Return,
            "goto" => Keyword::Goto,
            _ => return None,
        };
        Some(keyword)
    }

    /// Built-in type words that combine into a primitive (`unsigned long`)
    pub fn is_primitive(self) -> bool {
        matches!(
            self,
            Keyword::Void
                | Keyword::Char
                | Keyword::Short
                | Keyword::Int
                | Keyword::Long
                | Keyword::Float
                | Keyword::Double
                | Keyword::Signed
                | Keyword::Unsigned
                | Keyword::Bool
                | Keyword::Complex
        )
    }

    pub fn is_qualifier(self) -> bool {
        matches!(self, Keyword::Const | Keyword::Volatile | Keyword::Restrict)
    }

    /// Any keyword that may begin or continue a declaration's specifiers
    pub fn starts_specifier(self) -> bool {
        self.is_primitive()
            || self.is_qualifier()
            || matches!(
                self,
                Keyword::Struct
                    | Keyword::Union
                    | Keyword::Enum
                    | Keyword::Typedef
                    | Keyword::Static
                    | Keyword::Extern
                    | Keyword::Auto
                    | Keyword::Register
                    | Keyword::Inline
                    | Keyword::Noreturn
            )
    }
}

/// Punctuators and operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Punct {
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semicolon,
    Comma,
    Colon,
    Question,
    Dot,
    Ellipsis,
    Arrow,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Bang,
    Eq,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    LtLt,
    GtGt,
    AndAnd,
    OrOr,
    PlusPlus,
    MinusMinus,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    PercentEq,
    AmpEq,
    PipeEq,
    CaretEq,
    LtLtEq,
    GtGtEq,
    Hash,
    HashHash,
}

/// Longest spellings first so the scan below is maximal munch
const PUNCTUATORS: &[(&str, Punct)] = &[
    ("...", Punct::Ellipsis),
    ("<<=", Punct::LtLtEq),
    (">>=", Punct::GtGtEq),
    ("->", Punct::Arrow),
    ("++", Punct::PlusPlus),
    ("--", Punct::MinusMinus),
    ("<<", Punct::LtLt),
    (">>", Punct::GtGt),
    ("<=", Punct::Le),
    (">=", Punct::Ge),
    ("==", Punct::EqEq),
    ("!=", Punct::NotEq),
    ("&&", Punct::AndAnd),
    ("||", Punct::OrOr),
    ("+=", Punct::PlusEq),
    ("-=", Punct::MinusEq),
    ("*=", Punct::StarEq),
    ("/=", Punct::SlashEq),
    ("%=", Punct::PercentEq),
    ("&=", Punct::AmpEq),
    ("|=", Punct::PipeEq),
    ("^=", Punct::CaretEq),
    ("##", Punct::HashHash),
    ("(", Punct::LParen),
    (")", Punct::RParen),
    ("{", Punct::LBrace),
    ("}", Punct::RBrace),
    ("[", Punct::LBracket),
    ("]", Punct::RBracket),
    (";", Punct::Semicolon),
    (",", Punct::Comma),
    (":", Punct::Colon),
    ("?", Punct::Question),
    (".", Punct::Dot),
    ("+", Punct::Plus),
    ("-", Punct::Minus),
    ("*", Punct::Star),
    ("/", Punct::Slash),
    ("%", Punct::Percent),
    ("&", Punct::Amp),
    ("|", Punct::Pipe),
    ("^", Punct::Caret),
    ("~", Punct::Tilde),
    ("!", Punct::Bang),
    ("=", Punct::Eq),
    ("<", Punct::Lt),
    (">", Punct::Gt),
    ("#", Punct::Hash),
];

/// Source spelling of a punctuator
pub(crate) fn punct_spelling(punct: Punct) -> &'static str {
    PUNCTUATORS
        .iter()
        .find(|(_, p)| *p == punct)
        .map_or("?", |(text, _)| *text)
}

/// Token classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Keyword(Keyword),
    Punct(Punct),
    StringLiteral,
    CharLiteral,
    NumericLiteral,
    /// A whole logical preprocessor line
    Directive,
    Eof,
}

/// A lexed token. The lexeme is the exact source spelling except for
/// directives, whose lexeme is the normalized logical line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    /// Byte offset of the first character in the source
    pub offset: usize,
    pub location: SourceLocation,
    /// Produced by macro substitution; never substituted again
    pub expanded: bool,
}

impl Token {
    pub fn is_punct(&self, punct: Punct) -> bool {
        self.kind == TokenKind::Punct(punct)
    }

    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        self.kind == TokenKind::Keyword(keyword)
    }

    pub fn keyword(&self) -> Option<Keyword> {
        match self.kind {
            TokenKind::Keyword(keyword) => Some(keyword),
            _ => None,
        }
    }

    pub fn ident(&self) -> Option<&str> {
        match self.kind {
            TokenKind::Ident => Some(&self.lexeme),
            _ => None,
        }
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }

    /// Identifiers, keywords and numbers need a space between them when
    /// tokens are joined back into text
    pub(crate) fn is_word(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Ident | TokenKind::Keyword(_) | TokenKind::NumericLiteral
        )
    }

    pub(crate) fn end(&self) -> usize {
        self.offset + self.lexeme.len()
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Ident => write!(f, "identifier '{}'", self.lexeme),
            TokenKind::Keyword(_) => write!(f, "'{}'", self.lexeme),
            TokenKind::Punct(_) => write!(f, "'{}'", self.lexeme),
            TokenKind::StringLiteral => write!(f, "string literal {}", self.lexeme),
            TokenKind::CharLiteral => write!(f, "char literal {}", self.lexeme),
            TokenKind::NumericLiteral => write!(f, "number {}", self.lexeme),
            TokenKind::Directive => write!(f, "directive '{}'", self.lexeme),
            TokenKind::Eof => write!(f, "end of input"),
        }
    }
}

/// Join tokens back into text, keeping a single space wherever the source
/// had whitespace or two words would otherwise run together.
pub(crate) fn join_tokens(tokens: &[Token]) -> String {
    let mut text = String::new();
    let mut previous: Option<&Token> = None;

    for token in tokens {
        if let Some(prev) = previous {
            let gap = token.offset > prev.end();
            if gap || (prev.is_word() && token.is_word()) {
                text.push(' ');
            }
        }
        text.push_str(&token.lexeme);
        previous = Some(token);
    }

    text
}

/// Lazy lexer over one source text
pub struct Lexer<'src> {
    source: &'src str,
    bytes: &'src [u8],
    position: usize,
    line: usize,
    column: usize,
    /// Only blanks and comments seen since the last newline
    at_line_start: bool,
    finished: bool,
    diagnostics: Vec<Diagnostic>,
}

/// Start lexing `source`. The returned iterator ends with one
/// [`TokenKind::Eof`] token.
pub fn tokenize(source: &str) -> Lexer<'_> {
    Lexer::new(source)
}

/// Lex all of `source`, returning the tokens and any lexer diagnostics
pub fn lex(source: &str) -> (Vec<Token>, Vec<Diagnostic>) {
    Lexer::new(source).tokenize()
}

impl<'src> Lexer<'src> {
    /// Create a new lexer for the given source string.
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            position: 0,
            line: 1,
            column: 1,
            at_line_start: true,
            finished: false,
            diagnostics: Vec::new(),
        }
    }

    /// Tokenize the entire input
    pub fn tokenize(mut self) -> (Vec<Token>, Vec<Diagnostic>) {
        let tokens: Vec<Token> = self.by_ref().collect();
        (tokens, self.diagnostics)
    }

    /// Drain the diagnostics recorded so far
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Get next token
    fn next_token(&mut self) -> Token {
        loop {
            self.skip_whitespace_and_comments();

            let start = self.position;
            let loc = self.current_location();

            let Some(ch) = self.peek() else {
                self.finished = true;
                return self.make_token(TokenKind::Eof, start, loc);
            };

            if self.at_line_start && ch == b'#' {
                self.at_line_start = false;
                return self.directive(start, loc);
            }
            self.at_line_start = false;

            match ch {
                b'"' | b'\'' => return self.quoted_literal(ch, start, loc),
                b'0'..=b'9' => return self.number_literal(start, loc),
                b'.' if self.peek_ahead(1).is_some_and(|c| c.is_ascii_digit()) => {
                    return self.number_literal(start, loc);
                }
                b'a'..=b'z' | b'A'..=b'Z' | b'_' | b'$' => {
                    return self.identifier_or_keyword(start, loc);
                }
                _ => {}
            }

            let source = self.source;
            let rest = &source[self.position..];
            if let Some((text, punct)) = PUNCTUATORS.iter().find(|(text, _)| rest.starts_with(text)) {
                for _ in 0..text.len() {
                    self.advance();
                }
                return self.make_token(TokenKind::Punct(*punct), start, loc);
            }

            // Unknown character: report, skip it and keep going
            let bad = rest.chars().next().unwrap_or('\u{fffd}');
            for _ in 0..bad.len_utf8() {
                self.advance();
            }
            self.diagnostics.push(Diagnostic::error(
                DiagnosticKind::Lex,
                start,
                loc,
                format!("unexpected character '{}'", bad.escape_default()),
            ));
        }
    }

    /// Lex a string or character literal, including any encoding prefix
    /// already consumed from `start`
    fn quoted_literal(&mut self, quote: u8, start: usize, loc: SourceLocation) -> Token {
        let terminated = self.skip_quoted(quote);
        let (kind, what) = if quote == b'"' {
            (TokenKind::StringLiteral, "string literal")
        } else {
            (TokenKind::CharLiteral, "character literal")
        };

        if !terminated {
            self.diagnostics.push(Diagnostic::error(
                DiagnosticKind::Lex,
                start,
                loc,
                format!("unterminated {what}"),
            ));
        }

        self.make_token(kind, start, loc)
    }

    /// Consume a quoted literal starting at the opening quote. Returns false
    /// when the literal ran into a newline or the end of input.
    fn skip_quoted(&mut self, quote: u8) -> bool {
        self.advance(); // opening quote

        while let Some(ch) = self.peek() {
            match ch {
                b'\\' => {
                    self.advance();
                    // Escaped character, or a line continuation
                    if self.peek().is_some() {
                        self.advance();
                    }
                }
                b'\n' => return false,
                c if c == quote => {
                    self.advance();
                    return true;
                }
                _ => {
                    self.advance();
                }
            }
        }

        false
    }

    /// Numeric literal as an opaque pp-number: `0x1`, `3.1415e6`, `10UL`, `.5`
    fn number_literal(&mut self, start: usize, loc: SourceLocation) -> Token {
        self.advance();

        while let Some(ch) = self.peek() {
            let exponent = matches!(ch, b'e' | b'E' | b'p' | b'P')
                && matches!(self.peek_ahead(1), Some(b'+' | b'-'));
            if exponent {
                self.advance();
                self.advance();
            } else if ch.is_ascii_alphanumeric() || ch == b'_' || ch == b'.' {
                self.advance();
            } else {
                break;
            }
        }

        self.make_token(TokenKind::NumericLiteral, start, loc)
    }

    /// Parse identifier or keyword
    fn identifier_or_keyword(&mut self, start: usize, loc: SourceLocation) -> Token {
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == b'_' || ch == b'$' {
                self.advance();
            } else {
                break;
            }
        }

        let source = self.source;
        let ident = &source[start..self.position];

        // Encoding prefixes: L"..", u8"..", u'..', U".."
        if matches!(ident, "L" | "u" | "U" | "u8") {
            if let Some(quote @ (b'"' | b'\'')) = self.peek() {
                return self.quoted_literal(quote, start, loc);
            }
        }

        let kind = match Keyword::from_ident(ident) {
            Some(keyword) => TokenKind::Keyword(keyword),
            None => TokenKind::Ident,
        };
        self.make_token(kind, start, loc)
    }

    /// Capture a logical preprocessor line starting at `#`
    fn directive(&mut self, start: usize, loc: SourceLocation) -> Token {
        let mut text = String::new();
        let mut pending_space = false;

        while let Some(ch) = self.peek() {
            match ch {
                b'\n' => break,
                b'\\' if self.continuation_len() > 0 => {
                    for _ in 0..self.continuation_len() {
                        self.advance();
                    }
                    pending_space = true;
                }
                b'/' if self.peek_ahead(1) == Some(b'*') => {
                    self.skip_block_comment();
                    pending_space = true;
                }
                b'/' if self.peek_ahead(1) == Some(b'/') => {
                    self.skip_line_comment();
                    break;
                }
                b' ' | b'\t' | b'\r' | 0x0b | 0x0c => {
                    self.advance();
                    pending_space = true;
                }
                b'"' | b'\'' => {
                    let literal_start = self.position;
                    if !self.skip_quoted(ch) {
                        self.diagnostics.push(Diagnostic::error(
                            DiagnosticKind::Lex,
                            literal_start,
                            loc,
                            "unterminated literal in directive",
                        ));
                    }
                    push_spaced(&mut text, &mut pending_space);
                    text.push_str(&self.source[literal_start..self.position]);
                }
                _ => {
                    let ch_start = self.position;
                    let width = self.source[ch_start..].chars().next().map_or(1, char::len_utf8);
                    for _ in 0..width {
                        self.advance();
                    }
                    push_spaced(&mut text, &mut pending_space);
                    text.push_str(&self.source[ch_start..self.position]);
                }
            }
        }

        trace!("directive at line {}: {}", loc.line, text);

        Token {
            kind: TokenKind::Directive,
            lexeme: text,
            offset: start,
            location: loc,
            expanded: false,
        }
    }

    /// Skip whitespace, comments and line continuations
    fn skip_whitespace_and_comments(&mut self) {
        while let Some(ch) = self.peek() {
            match ch {
                b'\n' => {
                    self.advance();
                    self.at_line_start = true;
                }
                b' ' | b'\t' | b'\r' | 0x0b | 0x0c => {
                    self.advance();
                }
                b'\\' if self.continuation_len() > 0 => {
                    for _ in 0..self.continuation_len() {
                        self.advance();
                    }
                }
                b'/' if self.peek_ahead(1) == Some(b'/') => self.skip_line_comment(),
                b'/' if self.peek_ahead(1) == Some(b'*') => self.skip_block_comment(),
                _ => break,
            }
        }
    }

    /// Skip single-line comment up to (not including) the newline
    fn skip_line_comment(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == b'\n' {
                break;
            }
            self.advance();
        }
    }

    /// Skip multi-line comment (/* ... */); the first `*/` closes it
    fn skip_block_comment(&mut self) {
        let start = self.position;
        let start_loc = self.current_location();
        self.advance(); // skip '/'
        self.advance(); // skip '*'

        while !self.is_at_end() {
            if self.peek() == Some(b'*') && self.peek_ahead(1) == Some(b'/') {
                self.advance(); // skip '*'
                self.advance(); // skip '/'
                return;
            }
            self.advance();
        }

        self.diagnostics.push(Diagnostic::error(
            DiagnosticKind::Lex,
            start,
            start_loc,
            "unterminated block comment",
        ));
    }

    /// Length of a backslash-newline sequence at the current position, or 0
    fn continuation_len(&self) -> usize {
        match (self.peek_ahead(1), self.peek_ahead(2)) {
            (Some(b'\n'), _) => 2,
            (Some(b'\r'), Some(b'\n')) => 3,
            _ => 0,
        }
    }

    fn make_token(&self, kind: TokenKind, start: usize, loc: SourceLocation) -> Token {
        Token {
            kind,
            lexeme: self.source[start..self.position].to_string(),
            offset: start,
            location: loc,
            expanded: false,
        }
    }

    /// Peek at current byte without consuming
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.position).copied()
    }

    /// Peek ahead n bytes
    fn peek_ahead(&self, n: usize) -> Option<u8> {
        self.bytes.get(self.position + n).copied()
    }

    /// Advance one byte, tracking line and column
    fn advance(&mut self) -> Option<u8> {
        let ch = self.peek()?;
        self.position += 1;

        if ch == b'\n' {
            self.line += 1;
            self.column = 1;
        } else if ch & 0xC0 != 0x80 {
            // UTF-8 continuation bytes do not start a new column
            self.column += 1;
        }

        Some(ch)
    }

    /// Check if at end of input
    fn is_at_end(&self) -> bool {
        self.position >= self.bytes.len()
    }

    /// Get current source location
    fn current_location(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column)
    }
}

fn push_spaced(text: &mut String, pending_space: &mut bool) {
    if *pending_space && !text.is_empty() {
        text.push(' ');
    }
    *pending_space = false;
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if self.finished {
            return None;
        }
        Some(self.next_token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).map(|t| t.kind).collect()
    }

    fn lexemes(source: &str) -> Vec<String> {
        tokenize(source)
            .filter(|t| !t.is_eof())
            .map(|t| t.lexeme)
            .collect()
    }

    #[test]
    fn test_simple_tokens() {
        let tokens: Vec<Token> = tokenize("int main(void);").collect();

        assert!(tokens[0].is_keyword(Keyword::Int));
        assert_eq!(tokens[1].ident(), Some("main"));
        assert!(tokens[2].is_punct(Punct::LParen));
        assert!(tokens[3].is_keyword(Keyword::Void));
        assert!(tokens[4].is_punct(Punct::RParen));
        assert!(tokens[5].is_punct(Punct::Semicolon));
        assert!(tokens[6].is_eof());
        assert_eq!(tokens.len(), 7);
    }

    #[test]
    fn test_operators_maximal_munch() {
        assert_eq!(
            kinds("... -> <<= ## *"),
            vec![
                TokenKind::Punct(Punct::Ellipsis),
                TokenKind::Punct(Punct::Arrow),
                TokenKind::Punct(Punct::LtLtEq),
                TokenKind::Punct(Punct::HashHash),
                TokenKind::Punct(Punct::Star),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments() {
        assert_eq!(
            lexemes("int x; // comment\nint y; /* block\ncomment */ int z;"),
            vec!["int", "x", ";", "int", "y", ";", "int", "z", ";"]
        );
    }

    #[test]
    fn test_comment_opener_inside_string() {
        let tokens: Vec<Token> =
            tokenize(r#"char* s = "string with comment: /*comment inside string*/";"#).collect();

        assert_eq!(tokens[4].kind, TokenKind::StringLiteral);
        assert_eq!(
            tokens[4].lexeme,
            r#""string with comment: /*comment inside string*/""#
        );
        assert!(tokens[5].is_punct(Punct::Semicolon));
    }

    #[test]
    fn test_quote_inside_comment() {
        let source = "/*char* str5 = \"commented string with \\\"escaped quotes\\\" \"*/ int x;";
        assert_eq!(lexemes(source), vec!["int", "x", ";"]);

        assert_eq!(lexemes("// it's \"quoted\"\nint y;"), vec!["int", "y", ";"]);
    }

    #[test]
    fn test_escaped_quotes() {
        let tokens = lexemes(r#""string with \"escaped quotes\" " x"#);
        assert_eq!(tokens, vec![r#""string with \"escaped quotes\" ""#, "x"]);
    }

    #[test]
    fn test_numeric_literals() {
        assert_eq!(
            lexemes("0x1 3.1415e6 1e-5 .5 10UL 0777"),
            vec!["0x1", "3.1415e6", "1e-5", ".5", "10UL", "0777"]
        );
        assert_eq!(kinds("3.1415e6")[0], TokenKind::NumericLiteral);
    }

    #[test]
    fn test_char_literal_and_prefix() {
        let tokens: Vec<Token> = tokenize(r#"'\'' L'x' u8"abc""#).collect();

        assert_eq!(tokens[0].kind, TokenKind::CharLiteral);
        assert_eq!(tokens[0].lexeme, r"'\''");
        assert_eq!(tokens[1].kind, TokenKind::CharLiteral);
        assert_eq!(tokens[2].kind, TokenKind::StringLiteral);
        assert_eq!(tokens[2].lexeme, "u8\"abc\"");
    }

    #[test]
    fn test_directive_is_one_token() {
        let tokens: Vec<Token> =
            tokenize("#define mlm Multi Line\\\n            Macro\nint x;").collect();

        assert_eq!(tokens[0].kind, TokenKind::Directive);
        assert_eq!(tokens[0].lexeme, "#define mlm Multi Line Macro");
        assert!(tokens[1].is_keyword(Keyword::Int));
        assert_eq!(tokens[1].location.line, 3);
    }

    #[test]
    fn test_directive_strips_comments_and_indent() {
        let tokens: Vec<Token> =
            tokenize("  #define MACRO4 macro4 /*with comment*/\n#define S \"a /* b\" // c\n").collect();

        assert_eq!(tokens[0].lexeme, "#define MACRO4 macro4");
        assert_eq!(tokens[1].lexeme, "#define S \"a /* b\"");
    }

    #[test]
    fn test_hash_in_string_is_not_directive() {
        let tokens: Vec<Token> =
            tokenize("char* s = \"string with define #define MACRO5 x \";").collect();

        assert!(tokens.iter().all(|t| t.kind != TokenKind::Directive));
        assert_eq!(tokens[4].kind, TokenKind::StringLiteral);
    }

    #[test]
    fn test_unterminated_string_at_end() {
        let (tokens, diagnostics) = lex("char *s = \"never closed");

        assert_eq!(tokens[4].kind, TokenKind::StringLiteral);
        assert_eq!(tokens[4].lexeme, "\"never closed");
        assert!(tokens[5].is_eof());
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::Lex);
    }

    #[test]
    fn test_unterminated_comment_at_end() {
        let (tokens, diagnostics) = lex("int x; /* dangling");

        assert_eq!(tokens.len(), 4);
        assert!(tokens[3].is_eof());
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("block comment"));
    }

    #[test]
    fn test_unexpected_character_is_skipped() {
        let (tokens, diagnostics) = lex("int @x;");

        assert_eq!(tokens[1].ident(), Some("x"));
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_offsets_and_locations() {
        let tokens: Vec<Token> = tokenize("int\n  x;").collect();

        assert_eq!(tokens[1].offset, 6);
        assert_eq!(tokens[1].location, SourceLocation::new(2, 3));
    }

    #[test]
    fn test_lexer_is_lazy_and_finite() {
        let mut lexer = tokenize("a b");
        assert_eq!(lexer.next().map(|t| t.lexeme), Some("a".to_string()));
        assert_eq!(lexer.next().map(|t| t.lexeme), Some("b".to_string()));
        assert!(lexer.next().is_some_and(|t| t.is_eof()));
        assert!(lexer.next().is_none());
    }

    #[test]
    fn test_join_tokens() {
        let tokens: Vec<Token> = tokenize("{0x1, 3.1415e6}").filter(|t| !t.is_eof()).collect();
        assert_eq!(join_tokens(&tokens), "{0x1, 3.1415e6}");
    }
}
