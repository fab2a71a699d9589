//! Single-pass scanner from source bytes to a token stream.
//!
//! The scanner walks the input once, tracking a 1-based line counter, and
//! always terminates the stream with an end-of-input token. It is total over
//! ASCII input: isolated unexpected bytes are reported on a diagnostics side
//! channel and skipped; only an unterminated string literal aborts.

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Eof,
    OpenParen,
    CloseParen,
    OpenBrace,
    CloseBrace,
    OpenBracket,
    CloseBracket,
    Comma,
    Semi,
    Colon,
    Plus,
    Minus,
    Equal,
    EqualEqual,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Arrow,
    Number,
    StringLiteral,
    True,
    False,
    Fn,
    Return,
    Const,
    Var,
    If,
    Else,
    While,
    For,
    Break,
    Continue,
    In,
    Extern,
    Export,
    Type,
    Identifier,
}

/// A scanned token. `lexeme` is the exact source slice for literals and
/// identifiers (string literals exclude their surrounding quotes); for
/// punctuation it reproduces the punctuation itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: u32,
}

/// Tokens plus the non-fatal diagnostics collected along the way.
#[derive(Debug)]
pub struct ScanOutput {
    pub tokens: Vec<Token>,
    pub diagnostics: Vec<String>,
}

pub struct Lexer<'a> {
    source: &'a [u8],
    current: usize,
    line: u32,
    tokens: Vec<Token>,
    diagnostics: Vec<String>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Lexer {
            source: source.as_bytes(),
            current: 0,
            line: 1,
            tokens: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn scan_tokens(mut self) -> Result<ScanOutput, CoreError> {
        while !self.is_at_end() {
            self.skip_whitespace();
            if self.is_at_end() {
                break;
            }

            let c = self.advance();
            match c {
                b'(' => self.add_token(TokenKind::OpenParen, "("),
                b')' => self.add_token(TokenKind::CloseParen, ")"),
                b'{' => self.add_token(TokenKind::OpenBrace, "{"),
                b'}' => self.add_token(TokenKind::CloseBrace, "}"),
                b'[' => self.add_token(TokenKind::OpenBracket, "["),
                b']' => self.add_token(TokenKind::CloseBracket, "]"),
                b',' => self.add_token(TokenKind::Comma, ","),
                b';' => self.add_token(TokenKind::Semi, ";"),
                b':' => self.add_token(TokenKind::Colon, ":"),
                b'+' => self.add_token(TokenKind::Plus, "+"),
                b'"' => self.string_literal()?,
                b'=' => {
                    if self.match_byte(b'=') {
                        self.add_token(TokenKind::EqualEqual, "==");
                    } else {
                        self.add_token(TokenKind::Equal, "=");
                    }
                }
                b'!' => {
                    if self.match_byte(b'=') {
                        self.add_token(TokenKind::NotEqual, "!=");
                    } else {
                        self.report_unexpected(c);
                    }
                }
                b'<' => {
                    if self.match_byte(b'=') {
                        self.add_token(TokenKind::LessEqual, "<=");
                    } else {
                        self.add_token(TokenKind::Less, "<");
                    }
                }
                b'>' => {
                    if self.match_byte(b'=') {
                        self.add_token(TokenKind::GreaterEqual, ">=");
                    } else {
                        self.add_token(TokenKind::Greater, ">");
                    }
                }
                b'-' => {
                    if self.match_byte(b'>') {
                        self.add_token(TokenKind::Arrow, "->");
                    } else if self.peek().is_ascii_digit() {
                        // The minus is part of the number lexeme.
                        self.number();
                    } else {
                        self.add_token(TokenKind::Minus, "-");
                    }
                }
                _ => {
                    if c.is_ascii_digit() {
                        self.number();
                    } else if is_ident_start(c) {
                        self.identifier();
                    } else {
                        self.report_unexpected(c);
                    }
                }
            }
        }

        self.tokens.push(Token {
            kind: TokenKind::Eof,
            lexeme: String::new(),
            line: self.line,
        });

        Ok(ScanOutput {
            tokens: self.tokens,
            diagnostics: self.diagnostics,
        })
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn advance(&mut self) -> u8 {
        let c = self.source[self.current];
        self.current += 1;
        c
    }

    fn peek(&self) -> u8 {
        if self.is_at_end() {
            0
        } else {
            self.source[self.current]
        }
    }

    fn peek_next(&self) -> u8 {
        if self.current + 1 >= self.source.len() {
            0
        } else {
            self.source[self.current + 1]
        }
    }

    fn match_byte(&mut self, expected: u8) -> bool {
        if self.is_at_end() || self.source[self.current] != expected {
            return false;
        }
        self.current += 1;
        true
    }

    fn skip_whitespace(&mut self) {
        loop {
            match self.peek() {
                b' ' | b'\r' | b'\t' => {
                    self.advance();
                }
                b'\n' => {
                    self.line += 1;
                    self.advance();
                }
                b'/' => {
                    if self.peek_next() == b'/' {
                        // Comment until end of line.
                        while self.peek() != b'\n' && !self.is_at_end() {
                            self.advance();
                        }
                    } else {
                        return;
                    }
                }
                _ => return,
            }
        }
    }

    fn add_token(&mut self, kind: TokenKind, lexeme: &str) {
        self.tokens.push(Token {
            kind,
            lexeme: lexeme.to_string(),
            line: self.line,
        });
    }

    fn report_unexpected(&mut self, byte: u8) {
        self.diagnostics.push(format!(
            "unexpected character at line {}: {}",
            self.line,
            char::from(byte)
        ));
    }

    fn lexeme_from(&self, start: usize) -> String {
        String::from_utf8_lossy(&self.source[start..self.current]).into_owned()
    }

    /// Consumes the remainder of a number whose first byte (a digit, or a
    /// minus that precedes one) has already been taken.
    fn number(&mut self) {
        let start = self.current - 1;
        while self.peek().is_ascii_digit() {
            self.advance();
        }
        let lexeme = self.lexeme_from(start);
        self.tokens.push(Token {
            kind: TokenKind::Number,
            lexeme,
            line: self.line,
        });
    }

    fn identifier(&mut self) {
        let start = self.current - 1;
        while is_ident_continue(self.peek()) {
            self.advance();
        }
        let text = self.lexeme_from(start);
        let kind = keyword_kind(&text);
        self.tokens.push(Token {
            kind,
            lexeme: text,
            line: self.line,
        });
    }

    fn string_literal(&mut self) -> Result<(), CoreError> {
        let start = self.current;
        while self.peek() != b'"' && !self.is_at_end() {
            if self.peek() == b'\n' {
                self.line += 1;
            }
            self.advance();
        }

        if self.is_at_end() {
            return Err(CoreError::lex(self.line, "unterminated string"));
        }

        // Bytes between the quotes, preserved verbatim; no escape processing.
        let value = String::from_utf8_lossy(&self.source[start..self.current]).into_owned();
        self.advance();
        self.tokens.push(Token {
            kind: TokenKind::StringLiteral,
            lexeme: value,
            line: self.line,
        });
        Ok(())
    }
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_ident_continue(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

fn keyword_kind(text: &str) -> TokenKind {
    match text {
        "fn" => TokenKind::Fn,
        "return" => TokenKind::Return,
        "const" => TokenKind::Const,
        "var" => TokenKind::Var,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        "for" => TokenKind::For,
        "break" => TokenKind::Break,
        "continue" => TokenKind::Continue,
        "in" => TokenKind::In,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "extern" => TokenKind::Extern,
        "export" => TokenKind::Export,
        // The print family resolves to built-ins later; keep them ordinary
        // identifiers here.
        "print" | "println" | "printf" => TokenKind::Identifier,
        "u8" | "u16" | "u32" | "i8" | "i16" | "i32" | "bool" | "str" => TokenKind::Type,
        _ => TokenKind::Identifier,
    }
}

/// Convenience entry point used by the parser and tests.
pub fn scan(source: &str) -> Result<ScanOutput, CoreError> {
    Lexer::new(source).scan_tokens()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        scan(source)
            .expect("scan should succeed")
            .tokens
            .iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn scans_punctuation_and_operators() {
        let kinds = kinds("( ) { } [ ] , ; : + == != < <= > >= ->");
        assert_eq!(
            kinds,
            vec![
                TokenKind::OpenParen,
                TokenKind::CloseParen,
                TokenKind::OpenBrace,
                TokenKind::CloseBrace,
                TokenKind::OpenBracket,
                TokenKind::CloseBracket,
                TokenKind::Comma,
                TokenKind::Semi,
                TokenKind::Colon,
                TokenKind::Plus,
                TokenKind::EqualEqual,
                TokenKind::NotEqual,
                TokenKind::Less,
                TokenKind::LessEqual,
                TokenKind::Greater,
                TokenKind::GreaterEqual,
                TokenKind::Arrow,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn scans_keywords_types_and_identifiers() {
        let output = scan("fn main x u32 str print println printf").expect("scan");
        let kinds: Vec<_> = output.tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Fn,
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::Type,
                TokenKind::Type,
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn minus_forms_arrow_negative_number_or_operator() {
        let output = scan("-> -12 - x").expect("scan");
        assert_eq!(output.tokens[0].kind, TokenKind::Arrow);
        assert_eq!(output.tokens[1].kind, TokenKind::Number);
        assert_eq!(output.tokens[1].lexeme, "-12");
        assert_eq!(output.tokens[2].kind, TokenKind::Minus);
    }

    #[test]
    fn skips_line_comments() {
        let output = scan("x // all of this vanishes\ny").expect("scan");
        assert_eq!(output.tokens.len(), 3);
        assert_eq!(output.tokens[0].lexeme, "x");
        assert_eq!(output.tokens[1].lexeme, "y");
        assert_eq!(output.tokens[1].line, 2);
    }

    #[test]
    fn string_literal_preserves_bytes_verbatim() {
        let output = scan("\"a\\nb\"").expect("scan");
        assert_eq!(output.tokens[0].kind, TokenKind::StringLiteral);
        // No escape processing: backslash and 'n' stay two separate bytes.
        assert_eq!(output.tokens[0].lexeme, "a\\nb");
    }

    #[test]
    fn newline_inside_string_advances_line() {
        let output = scan("\"a\nb\" x").expect("scan");
        assert_eq!(output.tokens[0].lexeme, "a\nb");
        assert_eq!(output.tokens[1].line, 2);
    }

    #[test]
    fn unterminated_string_is_fatal() {
        let err = scan("\"oops").unwrap_err();
        assert!(matches!(err, CoreError::Lex { line: 1, .. }));
    }

    #[test]
    fn unexpected_character_is_reported_and_skipped() {
        let output = scan("a $ b").expect("scan");
        assert_eq!(output.diagnostics.len(), 1);
        assert!(output.diagnostics[0].contains("line 1"));
        assert_eq!(output.tokens.len(), 3);
    }

    #[test]
    fn bare_bang_is_reported_without_a_token() {
        let output = scan("! x").expect("scan");
        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.tokens[0].kind, TokenKind::Identifier);
    }

    #[test]
    fn scanning_always_ends_with_eof() {
        // Totality over a sweep of ASCII inputs with no unterminated string.
        let pieces = ["fn", "1", "+", "->", "{", "}", ";", "x_9", "u16", "//c", " "];
        for a in &pieces {
            for b in &pieces {
                for c in &pieces {
                    let source = format!("{a}\n{b} {c}");
                    let output = scan(&source).expect("scan should terminate");
                    assert_eq!(output.tokens.last().map(|t| t.kind), Some(TokenKind::Eof));
                }
            }
        }
    }

    #[test]
    fn token_lines_count_preceding_newlines() {
        let source = "fn one\n\ntwo\nthree // end\nfour";
        let output = scan(source).expect("scan");
        for token in &output.tokens {
            if token.lexeme.is_empty() {
                continue;
            }
            let offset = source.find(&token.lexeme).expect("lexeme present");
            let newlines = source[..offset].bytes().filter(|&b| b == b'\n').count();
            assert_eq!(token.line as usize, newlines + 1, "token {:?}", token);
        }
    }
}
