//! Integer constant expression evaluation
//!
//! Enum values, array bounds and `#if` conditions are kept as opaque text in
//! the model, but when that text is an integer constant expression its value
//! is computed here. Binary operators use precedence climbing. Anything that
//! is not a plain integer expression (floats, casts, `sizeof`, unknown names,
//! overflow, division by zero) evaluates to `None` rather than an error.

use crate::parser::lexer::{Keyword, Punct, Token, TokenKind};

/// Evaluate `tokens` as one complete integer constant expression.
/// Identifiers are looked up through `lookup`.
pub fn evaluate(tokens: &[Token], lookup: impl Fn(&str) -> Option<i64>) -> Option<i64> {
    let mut evaluator = ConstEvaluator {
        tokens,
        position: 0,
        lookup,
    };
    let value = evaluator.parse_expression()?;

    // Trailing tokens mean this was not a single expression
    if evaluator.position == tokens.len() {
        Some(value)
    } else {
        None
    }
}

/// Parse an integer literal such as `42`, `0x1F`, `0777`, `0b101` or `10UL`
pub fn parse_int_literal(text: &str) -> Option<i64> {
    let digits = text.trim_end_matches(['u', 'U', 'l', 'L']);

    let (digits, radix) = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        (hex, 16)
    } else if let Some(bin) = digits
        .strip_prefix("0b")
        .or_else(|| digits.strip_prefix("0B"))
    {
        (bin, 2)
    } else if digits.len() > 1 && digits.starts_with('0') {
        (&digits[1..], 8)
    } else {
        (digits, 10)
    };

    if digits.is_empty() {
        return None;
    }
    // Unsigned values above i64::MAX wrap like a two's-complement cast
    u64::from_str_radix(digits, radix).ok().map(|v| v as i64)
}

/// Value of a character literal such as `'a'`, `'\n'` or `'\x41'`
pub fn parse_char_literal(text: &str) -> Option<i64> {
    let start = text.find('\'')?;
    let body = text[start + 1..].strip_suffix('\'')?;
    let mut chars = body.chars();

    let value = match chars.next()? {
        '\\' => {
            let escaped = chars.next()?;
            match escaped {
                'n' => '\n' as i64,
                't' => '\t' as i64,
                'r' => '\r' as i64,
                'a' => 0x07,
                'b' => 0x08,
                'f' => 0x0c,
                'v' => 0x0b,
                '\\' | '\'' | '"' | '?' => escaped as i64,
                'x' => {
                    let hex: String = chars.by_ref().collect();
                    return i64::from_str_radix(&hex, 16).ok();
                }
                '0'..='7' => {
                    let octal: String = std::iter::once(escaped).chain(chars.by_ref()).collect();
                    return i64::from_str_radix(&octal, 8).ok();
                }
                _ => return None,
            }
        }
        ch => ch as i64,
    };

    // Multi-character constants are implementation-defined
    if chars.next().is_some() {
        return None;
    }
    Some(value)
}

struct ConstEvaluator<'t, F> {
    tokens: &'t [Token],
    position: usize,
    lookup: F,
}

impl<F: Fn(&str) -> Option<i64>> ConstEvaluator<'_, F> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn match_punct(&mut self, punct: Punct) -> bool {
        if self.peek().is_some_and(|t| t.is_punct(punct)) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    /// Parse expression (top-level entry point)
    fn parse_expression(&mut self) -> Option<i64> {
        self.parse_ternary()
    }

    /// Parse ternary: condition ? true_expr : false_expr
    fn parse_ternary(&mut self) -> Option<i64> {
        let condition = self.parse_binary(0)?;

        if self.match_punct(Punct::Question) {
            let true_value = self.parse_expression()?;
            if !self.match_punct(Punct::Colon) {
                return None;
            }
            let false_value = self.parse_ternary()?;
            return Some(if condition != 0 { true_value } else { false_value });
        }

        Some(condition)
    }

    /// Precedence climbing over the binary operators
    fn parse_binary(&mut self, min_precedence: u8) -> Option<i64> {
        let mut left = self.parse_unary()?;

        loop {
            let Some(TokenKind::Punct(op)) = self.peek().map(|t| t.kind) else {
                break;
            };
            let Some(precedence) = binary_precedence(op) else {
                break;
            };
            if precedence < min_precedence {
                break;
            }
            self.position += 1;

            let right = self.parse_binary(precedence + 1)?;
            left = apply_binary(op, left, right)?;
        }

        Some(left)
    }

    /// Parse unary (- + ~ !)
    fn parse_unary(&mut self) -> Option<i64> {
        if self.match_punct(Punct::Minus) {
            return self.parse_unary()?.checked_neg();
        }
        if self.match_punct(Punct::Plus) {
            return self.parse_unary();
        }
        if self.match_punct(Punct::Tilde) {
            return Some(!self.parse_unary()?);
        }
        if self.match_punct(Punct::Bang) {
            return Some(i64::from(self.parse_unary()? == 0));
        }

        self.parse_primary()
    }

    /// Parse primary (literals, names, parenthesized expressions)
    fn parse_primary(&mut self) -> Option<i64> {
        let token = self.peek()?;

        let value = match token.kind {
            TokenKind::NumericLiteral => parse_int_literal(&token.lexeme)?,
            TokenKind::CharLiteral => parse_char_literal(&token.lexeme)?,
            TokenKind::Ident => (self.lookup)(&token.lexeme)?,
            TokenKind::Punct(Punct::LParen) => {
                self.position += 1;
                let value = self.parse_expression()?;
                if !self.match_punct(Punct::RParen) {
                    return None;
                }
                return Some(value);
            }
            TokenKind::Keyword(Keyword::Sizeof) => return None,
            _ => return None,
        };

        self.position += 1;
        Some(value)
    }
}

fn binary_precedence(op: Punct) -> Option<u8> {
    let precedence = match op {
        Punct::OrOr => 1,
        Punct::AndAnd => 2,
        Punct::Pipe => 3,
        Punct::Caret => 4,
        Punct::Amp => 5,
        Punct::EqEq | Punct::NotEq => 6,
        Punct::Lt | Punct::Le | Punct::Gt | Punct::Ge => 7,
        Punct::LtLt | Punct::GtGt => 8,
        Punct::Plus | Punct::Minus => 9,
        Punct::Star | Punct::Slash | Punct::Percent => 10,
        _ => return None,
    };
    Some(precedence)
}

fn apply_binary(op: Punct, left: i64, right: i64) -> Option<i64> {
    let value = match op {
        Punct::OrOr => i64::from(left != 0 || right != 0),
        Punct::AndAnd => i64::from(left != 0 && right != 0),
        Punct::Pipe => left | right,
        Punct::Caret => left ^ right,
        Punct::Amp => left & right,
        Punct::EqEq => i64::from(left == right),
        Punct::NotEq => i64::from(left != right),
        Punct::Lt => i64::from(left < right),
        Punct::Le => i64::from(left <= right),
        Punct::Gt => i64::from(left > right),
        Punct::Ge => i64::from(left >= right),
        Punct::LtLt => left.checked_shl(u32::try_from(right).ok()?)?,
        Punct::GtGt => left.checked_shr(u32::try_from(right).ok()?)?,
        Punct::Plus => left.checked_add(right)?,
        Punct::Minus => left.checked_sub(right)?,
        Punct::Star => left.checked_mul(right)?,
        Punct::Slash => left.checked_div(right)?,
        Punct::Percent => left.checked_rem(right)?,
        _ => return None,
    };
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::lexer::tokenize;

    fn eval(source: &str) -> Option<i64> {
        let tokens: Vec<Token> = tokenize(source).filter(|t| !t.is_eof()).collect();
        evaluate(&tokens, |name| match name {
            "FOUR" => Some(4),
            _ => None,
        })
    }

    #[test]
    fn test_int_literals() {
        assert_eq!(parse_int_literal("42"), Some(42));
        assert_eq!(parse_int_literal("0x1F"), Some(31));
        assert_eq!(parse_int_literal("0777"), Some(511));
        assert_eq!(parse_int_literal("0b101"), Some(5));
        assert_eq!(parse_int_literal("10UL"), Some(10));
        assert_eq!(parse_int_literal("0"), Some(0));
        assert_eq!(parse_int_literal("3.1415e6"), None);
    }

    #[test]
    fn test_char_literals() {
        assert_eq!(parse_char_literal("'a'"), Some(97));
        assert_eq!(parse_char_literal(r"'\n'"), Some(10));
        assert_eq!(parse_char_literal(r"'\x41'"), Some(65));
        assert_eq!(parse_char_literal(r"'\0'"), Some(0));
        assert_eq!(parse_char_literal("L'b'"), Some(98));
    }

    #[test]
    fn test_precedence() {
        assert_eq!(eval("1 + 2 * 3"), Some(7));
        assert_eq!(eval("(1 + 2) * 3"), Some(9));
        assert_eq!(eval("1 << 3 | 1"), Some(9));
        assert_eq!(eval("10 - 4 - 3"), Some(3));
        assert_eq!(eval("-FOUR + ~0"), Some(-5));
        assert_eq!(eval("FOUR > 3 ? 10 : 20"), Some(10));
        assert_eq!(eval("!0 && 2"), Some(1));
    }

    #[test]
    fn test_non_constant_expressions() {
        assert_eq!(eval("UNKNOWN + 1"), None);
        assert_eq!(eval("1 / 0"), None);
        assert_eq!(eval("sizeof(int)"), None);
        assert_eq!(eval("1 2"), None);
        assert_eq!(eval("2.5"), None);
    }
}
