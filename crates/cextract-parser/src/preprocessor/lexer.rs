//! Preprocessing-token lexer
//!
//! Just enough of the C token grammar to find identifiers in macro bodies
//! and declaration text without tripping over comments, literals, or the
//! letters inside numbers such as `0x1Fu`.

use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Number,
    Char,
    Str,
    Punct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    /// Byte offset of the token in the lexed text
    pub start: usize,
}

impl Token<'_> {
    pub fn end(&self) -> usize {
        self.start + self.text.len()
    }
}

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r#"(?s)(?P<comment>/\*.*?\*/|//[^\n]*)"#,
            r#"|(?P<str>"(?:\\.|[^"\\\n])*")"#,
            r#"|(?P<chr>'(?:\\.|[^'\\\n])*')"#,
            r#"|(?P<num>\.?[0-9](?:[eEpP][+-]|[A-Za-z0-9_.])*)"#,
            r#"|(?P<ident>[A-Za-z_][A-Za-z0-9_]*)"#,
            r#"|(?P<punct><<|>>|<=|>=|==|!=|&&|\|\||##|->|[^\sA-Za-z0-9_])"#,
        ))
        .expect("token pattern is valid")
    })
}

/// Split `text` into tokens, dropping comments and whitespace
pub fn tokenize(text: &str) -> Vec<Token<'_>> {
    token_regex()
        .captures_iter(text)
        .filter_map(|caps| {
            let (kind, m) = if let Some(m) = caps.name("ident") {
                (TokenKind::Identifier, m)
            } else if let Some(m) = caps.name("num") {
                (TokenKind::Number, m)
            } else if let Some(m) = caps.name("chr") {
                (TokenKind::Char, m)
            } else if let Some(m) = caps.name("str") {
                (TokenKind::Str, m)
            } else if let Some(m) = caps.name("punct") {
                (TokenKind::Punct, m)
            } else {
                return None;
            };
            Some(Token {
                kind,
                text: m.as_str(),
                start: m.start(),
            })
        })
        .collect()
}

/// Identifier tokens of `text` with their byte offsets
pub fn identifiers(text: &str) -> impl Iterator<Item = (usize, &str)> {
    tokenize(text)
        .into_iter()
        .filter(|t| t.kind == TokenKind::Identifier)
        .map(|t| (t.start, t.text))
}

/// Whether the next non-blank character at or after `offset` is `(`
pub fn followed_by_paren(text: &str, offset: usize) -> bool {
    text.get(offset..)
        .and_then(|rest| rest.trim_start().chars().next())
        == Some('(')
}

/// Join backslash-continued lines of a directive
pub fn splice_lines(text: &str) -> String {
    text.replace("\\\r\n", " ").replace("\\\n", " ")
}
