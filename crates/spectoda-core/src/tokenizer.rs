//! TNGL tokenizer
//!
//! An ordered set of matchers is tried at every cursor position. The match
//! starting earliest wins; matchers declared first win ties. Whitespace is
//! dropped, everything else becomes a [`Token`].

use regex_lite::Regex;
use std::sync::OnceLock;

/// Token categories, in matcher priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// `->` chaining arrow
    Connection,
    /// `// line` or `/* block */`
    Comment,
    /// `var name` or `let name`
    VariableDeclaration,
    /// `#rrggbb`
    Color,
    /// `Infinity`, `-inf`
    Infinity,
    /// `"text"`
    String,
    /// `&name`
    VariableReference,
    /// `1.2d+9h2m7.2s-123t`
    Timestamp,
    /// `$name`
    Label,
    /// `'c'`
    Char,
    /// `0x1f`
    Byte,
    /// `12px`
    Pixels,
    /// `-50.5%`
    Percentage,
    /// Naked float, rejected by the compiler
    Float,
    /// Naked integer, rejected by the compiler
    Number,
    /// Keyword or variable read
    Word,
    Whitespace,
    /// Single punctuation character; braces delimit scopes
    Punctuation,
}

/// A lexed token with its byte offset in the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub offset: usize,
}

struct Matcher {
    kind: TokenKind,
    regex: Regex,
}

const PATTERNS: &[(TokenKind, &str)] = &[
    (TokenKind::Connection, r"->"),
    (TokenKind::Comment, r"(?s)//[^\n]*|/\*.*?\*/"),
    (TokenKind::VariableDeclaration, r"\b(?:var|let)\s+[A-Za-z_][A-Za-z0-9_]*"),
    (TokenKind::Color, r"#[0-9a-fA-F]{6}\b"),
    (TokenKind::Infinity, r"[+-]?(?:Infinity|infinity|inf|Inf)\b"),
    (TokenKind::String, r#""[^"\n]*""#),
    (TokenKind::VariableReference, r"&[A-Za-z_][A-Za-z0-9_]*"),
    (
        TokenKind::Timestamp,
        r"(?:[+-]?(?:[0-9]+\.?[0-9]*|\.[0-9]+)(?:ms|d|h|m|s|t))+\b",
    ),
    (TokenKind::Label, r"\$[A-Za-z0-9_]*"),
    (TokenKind::Char, r"'[^'\n]'"),
    (TokenKind::Byte, r"\b0[xX][0-9a-fA-F]{1,2}\b"),
    (TokenKind::Pixels, r"[+-]?[0-9]+px\b"),
    (TokenKind::Percentage, r"[+-]?(?:[0-9]+\.?[0-9]*|\.[0-9]+)%"),
    (TokenKind::Float, r"[+-]?[0-9]*\.[0-9]+"),
    (TokenKind::Number, r"[+-]?[0-9]+"),
    (TokenKind::Word, r"[A-Za-z_][A-Za-z0-9_]*"),
    (TokenKind::Whitespace, r"\s+"),
    (TokenKind::Punctuation, r"[^A-Za-z0-9_\s]"),
];

fn matchers() -> &'static [Matcher] {
    static MATCHERS: OnceLock<Vec<Matcher>> = OnceLock::new();
    MATCHERS.get_or_init(|| {
        PATTERNS
            .iter()
            .filter_map(|(kind, pattern)| match Regex::new(pattern) {
                Ok(regex) => Some(Matcher { kind: *kind, regex }),
                Err(e) => {
                    tracing::error!("invalid token pattern for {:?}: {}", kind, e);
                    None
                }
            })
            .collect()
    })
}

/// Split TNGL source into tokens, dropping whitespace
pub fn tokenize(source: &str) -> Vec<Token> {
    let matchers = matchers();
    // Next match per matcher; recomputed once the cursor passes its start
    let mut cached: Vec<Option<(usize, usize)>> = matchers
        .iter()
        .map(|m| m.regex.find_at(source, 0).map(|found| (found.start(), found.end())))
        .collect();

    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < source.len() {
        let mut best: Option<(usize, usize, TokenKind)> = None;

        for (matcher, slot) in matchers.iter().zip(cached.iter_mut()) {
            if let Some((start, _)) = *slot {
                if start < pos {
                    *slot = matcher
                        .regex
                        .find_at(source, pos)
                        .map(|found| (found.start(), found.end()));
                }
            }

            if let Some((start, end)) = *slot {
                if end > start && best.map_or(true, |(best_start, _, _)| start < best_start) {
                    best = Some((start, end, matcher.kind));
                }
            }
        }

        let Some((start, end, kind)) = best else {
            break;
        };

        if start > pos {
            tracing::warn!("skipping unrecognized input {:?}", &source[pos..start]);
        }

        if kind != TokenKind::Whitespace {
            tokens.push(Token {
                kind,
                text: source[start..end].to_string(),
                offset: start,
            });
        }

        pos = end;
    }

    tokens
}
