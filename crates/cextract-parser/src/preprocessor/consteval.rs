//! Integer constant expression evaluator
//!
//! Folds array sizes and enumerator values the way a compiler front end
//! does. Identifiers are handed to a resolver, which knows about enum
//! constants and object-like macros; anything else (casts, `sizeof`,
//! floating point) makes the expression non-constant.

use super::lexer::{tokenize, Token, TokenKind};

/// Evaluate `text` as an integer constant expression
pub fn eval(text: &str, resolve: &mut dyn FnMut(&str) -> Option<i64>) -> Option<i64> {
    let tokens = tokenize(text);
    let mut ev = Evaluator {
        tokens,
        pos: 0,
        resolve,
    };
    let value = ev.conditional()?;
    if ev.pos == ev.tokens.len() {
        Some(value)
    } else {
        None
    }
}

/// Parse an integer literal, including hex, octal, binary and suffixes
pub fn parse_int_literal(text: &str) -> Option<i64> {
    let digits = text.trim_end_matches(['u', 'U', 'l', 'L']);
    let (radix, body) = if let Some(rest) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        (16, rest)
    } else if let Some(rest) = digits
        .strip_prefix("0b")
        .or_else(|| digits.strip_prefix("0B"))
    {
        (2, rest)
    } else if digits.len() > 1 && digits.starts_with('0') {
        (8, &digits[1..])
    } else {
        (10, digits)
    };
    let body = body.replace('\'', "");
    u64::from_str_radix(&body, radix).ok().map(|v| v as i64)
}

/// Value of a plain character literal such as `'a'` or `'\n'`
pub fn parse_char_literal(text: &str) -> Option<i64> {
    let inner = text.strip_prefix('\'')?.strip_suffix('\'')?;
    let mut chars = inner.chars();
    let value = match chars.next()? {
        '\\' => match chars.next()? {
            'n' => '\n' as i64,
            't' => '\t' as i64,
            'r' => '\r' as i64,
            '0' => 0,
            '\\' => '\\' as i64,
            '\'' => '\'' as i64,
            '"' => '"' as i64,
            _ => return None,
        },
        c => c as i64,
    };
    if chars.next().is_some() {
        return None;
    }
    Some(value)
}

struct Evaluator<'a, 'r> {
    tokens: Vec<Token<'a>>,
    pos: usize,
    resolve: &'r mut dyn FnMut(&str) -> Option<i64>,
}

fn precedence(op: &str) -> Option<u8> {
    Some(match op {
        "||" => 1,
        "&&" => 2,
        "|" => 3,
        "^" => 4,
        "&" => 5,
        "==" | "!=" => 6,
        "<" | ">" | "<=" | ">=" => 7,
        "<<" | ">>" => 8,
        "+" | "-" => 9,
        "*" | "/" | "%" => 10,
        _ => return None,
    })
}

fn apply(op: &str, l: i64, r: i64) -> Option<i64> {
    Some(match op {
        "||" => (l != 0 || r != 0) as i64,
        "&&" => (l != 0 && r != 0) as i64,
        "|" => l | r,
        "^" => l ^ r,
        "&" => l & r,
        "==" => (l == r) as i64,
        "!=" => (l != r) as i64,
        "<" => (l < r) as i64,
        ">" => (l > r) as i64,
        "<=" => (l <= r) as i64,
        ">=" => (l >= r) as i64,
        "<<" => l.checked_shl(u32::try_from(r).ok()?)?,
        ">>" => l.checked_shr(u32::try_from(r).ok()?)?,
        "+" => l.wrapping_add(r),
        "-" => l.wrapping_sub(r),
        "*" => l.wrapping_mul(r),
        "/" => l.checked_div(r)?,
        "%" => l.checked_rem(r)?,
        _ => return None,
    })
}

impl<'a> Evaluator<'a, '_> {
    fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.pos)
    }

    fn eat(&mut self, punct: &str) -> bool {
        match self.peek() {
            Some(t) if t.kind == TokenKind::Punct && t.text == punct => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn conditional(&mut self) -> Option<i64> {
        let cond = self.binary(1)?;
        if !self.eat("?") {
            return Some(cond);
        }
        let then = self.conditional()?;
        if !self.eat(":") {
            return None;
        }
        let otherwise = self.conditional()?;
        Some(if cond != 0 { then } else { otherwise })
    }

    fn binary(&mut self, min_prec: u8) -> Option<i64> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(t) if t.kind == TokenKind::Punct => t.text,
                _ => break,
            };
            let prec = match precedence(op) {
                Some(p) if p >= min_prec => p,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.binary(prec + 1)?;
            lhs = apply(op, lhs, rhs)?;
        }
        Some(lhs)
    }

    fn unary(&mut self) -> Option<i64> {
        let tok = *self.peek()?;
        self.pos += 1;
        match tok.kind {
            TokenKind::Number => parse_int_literal(tok.text),
            TokenKind::Char => parse_char_literal(tok.text),
            TokenKind::Identifier if tok.text == "sizeof" => None,
            TokenKind::Identifier => (self.resolve)(tok.text),
            TokenKind::Punct => match tok.text {
                "(" => {
                    let v = self.conditional()?;
                    self.eat(")").then_some(v)
                }
                "-" => self.unary().map(i64::wrapping_neg),
                "+" => self.unary(),
                "~" => self.unary().map(|v| !v),
                "!" => self.unary().map(|v| (v == 0) as i64),
                _ => None,
            },
            TokenKind::Str => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_idents(_: &str) -> Option<i64> {
        None
    }

    #[test]
    fn literals() {
        assert_eq!(parse_int_literal("42"), Some(42));
        assert_eq!(parse_int_literal("0x10UL"), Some(16));
        assert_eq!(parse_int_literal("017"), Some(15));
        assert_eq!(parse_int_literal("0b101"), Some(5));
        assert_eq!(parse_int_literal("0"), Some(0));
        assert_eq!(parse_int_literal("1.5"), None);
        assert_eq!(parse_char_literal("'A'"), Some(65));
        assert_eq!(parse_char_literal("'\\n'"), Some(10));
    }

    #[test]
    fn precedence_and_parens() {
        assert_eq!(eval("1 + 2 * 3", &mut no_idents), Some(7));
        assert_eq!(eval("(1 + 2) * 3", &mut no_idents), Some(9));
        assert_eq!(eval("1 << 4 | 1", &mut no_idents), Some(17));
        assert_eq!(eval("-3 + ~0", &mut no_idents), Some(-4));
        assert_eq!(eval("1 ? 5 : 6", &mut no_idents), Some(5));
    }

    #[test]
    fn chained_operators() {
        assert_eq!(eval("!0 && 3 > 2 || 0", &mut no_idents), Some(1));
        assert_eq!(eval("- - 4 - 1 - 1", &mut no_idents), Some(2));
        assert_eq!(eval("1 / 0", &mut no_idents), None);
    }

    #[test]
    fn identifiers_go_through_resolver() {
        let mut resolve = |name: &str| match name {
            "K" => Some(4),
            _ => None,
        };
        assert_eq!(eval("K * 2", &mut resolve), Some(8));
        assert_eq!(eval("J", &mut resolve), None);
    }

    #[test]
    fn non_constant_forms_fail() {
        assert_eq!(eval("sizeof(int)", &mut no_idents), None);
        assert_eq!(eval("1 / 0", &mut no_idents), None);
        assert_eq!(eval("1 2", &mut no_idents), None);
        assert_eq!(eval("", &mut no_idents), None);
    }
}
