//! Recursive-descent parser from tokens to function definitions.
//!
//! The grammar is deliberately small: four expression levels
//! (`expression -> comparison -> addition -> primary`), at most one binary
//! operator per comparison/addition invocation, and statement forms keyed on
//! a leading keyword or one token of lookahead after an identifier. The
//! first `consume` failure aborts parsing.

use crate::ast::{BinaryOp, Expr, Function};
use crate::error::CoreError;
use crate::lexer::{Token, TokenKind};

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, current: 0 }
    }

    /// Parses the whole token stream as a sequence of function definitions.
    pub fn parse(mut self) -> Result<Vec<Function>, CoreError> {
        let mut functions = Vec::new();
        while !self.is_at_end() {
            functions.push(self.parse_function()?);
        }
        Ok(functions)
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current - 1]
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn check(&self, kind: TokenKind) -> bool {
        !self.is_at_end() && self.peek().kind == kind
    }

    fn match_kind(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            return true;
        }
        false
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> Result<&Token, CoreError> {
        if self.check(kind) {
            return Ok(self.advance());
        }
        Err(CoreError::parse(self.peek().line, message))
    }

    fn parse_function(&mut self) -> Result<Function, CoreError> {
        // At most one prefix keyword, so a function can never be both.
        let is_extern = self.match_kind(TokenKind::Extern);
        let is_export = !is_extern && self.match_kind(TokenKind::Export);

        self.consume(TokenKind::Fn, "expected 'fn' keyword")?;
        let name = self
            .consume(TokenKind::Identifier, "expected function name")?
            .lexeme
            .clone();

        self.consume(TokenKind::OpenParen, "expected '(' after function name")?;

        let mut params: Vec<(String, String)> = Vec::new();
        if !self.check(TokenKind::CloseParen) {
            loop {
                let line = self.peek().line;
                let param_name = self
                    .consume(TokenKind::Identifier, "expected parameter name")?
                    .lexeme
                    .clone();
                self.consume(TokenKind::Colon, "expected ':' after parameter name")?;
                let param_type = self.parse_type()?;

                if params.iter().any(|(existing, _)| *existing == param_name) {
                    return Err(CoreError::parse(
                        line,
                        format!("duplicate parameter name '{param_name}'"),
                    ));
                }
                params.push((param_name, param_type));

                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
        }

        self.consume(TokenKind::CloseParen, "expected ')' after parameters")?;

        let return_type = if self.match_kind(TokenKind::Arrow) {
            Some(self.parse_type()?)
        } else {
            None
        };

        if is_extern {
            self.consume(TokenKind::Semi, "expected ';' after extern function declaration")?;
            return Ok(Function {
                name,
                params,
                return_type,
                body: Vec::new(),
                is_extern: true,
                is_export: false,
            });
        }

        self.consume(TokenKind::OpenBrace, "expected '{' before function body")?;
        let body = self.parse_block_body()?;
        self.consume(TokenKind::CloseBrace, "expected '}' after function body")?;

        Ok(Function {
            name,
            params,
            return_type,
            body,
            is_extern: false,
            is_export,
        })
    }

    fn parse_block_body(&mut self) -> Result<Vec<Expr>, CoreError> {
        let mut body = Vec::new();
        while !self.check(TokenKind::CloseBrace) && !self.is_at_end() {
            body.push(self.parse_expression()?);
        }
        Ok(body)
    }

    fn parse_type(&mut self) -> Result<String, CoreError> {
        if self.match_kind(TokenKind::OpenBracket) {
            self.consume(TokenKind::CloseBracket, "expected ']' after '['")?;
            let element = self.parse_type()?;
            Ok(format!("[]{element}"))
        } else if self.match_kind(TokenKind::Type) {
            Ok(self.previous().lexeme.clone())
        } else {
            Err(CoreError::parse(self.peek().line, "expected type"))
        }
    }

    /// Statement entry point. Statement forms are keyed on a leading keyword;
    /// an identifier needs one token of lookahead to distinguish a call
    /// statement or an assignment from a plain expression.
    fn parse_expression(&mut self) -> Result<Expr, CoreError> {
        if self.match_kind(TokenKind::Return) {
            let expr = self.parse_comparison()?;
            self.consume(TokenKind::Semi, "expected ';' after return statement")?;
            return Ok(Expr::Return(Box::new(expr)));
        }

        if self.check(TokenKind::Const) || self.check(TokenKind::Var) {
            let is_const = self.advance().kind == TokenKind::Const;
            let name = self
                .consume(TokenKind::Identifier, "expected variable name")?
                .lexeme
                .clone();

            // Annotation is optional; the default type is u8.
            let type_name = if self.match_kind(TokenKind::Colon) {
                self.parse_type()?
            } else {
                "u8".to_string()
            };

            let init = if self.match_kind(TokenKind::Equal) {
                Some(Box::new(self.parse_comparison()?))
            } else {
                None
            };
            self.consume(TokenKind::Semi, "expected ';' after variable declaration")?;

            return Ok(Expr::VarDecl {
                name,
                type_name,
                is_const,
                init,
            });
        }

        if self.match_kind(TokenKind::If) {
            self.consume(TokenKind::OpenParen, "expected '(' after 'if'")?;
            let cond = self.parse_comparison()?;
            self.consume(TokenKind::CloseParen, "expected ')' after if condition")?;

            self.consume(TokenKind::OpenBrace, "expected '{' after if condition")?;
            let then_body = self.parse_block_body()?;
            self.consume(TokenKind::CloseBrace, "expected '}' after if body")?;

            let else_body = if self.match_kind(TokenKind::Else) {
                self.consume(TokenKind::OpenBrace, "expected '{' after 'else'")?;
                let body = self.parse_block_body()?;
                self.consume(TokenKind::CloseBrace, "expected '}' after else body")?;
                body
            } else {
                Vec::new()
            };

            return Ok(Expr::If {
                cond: Box::new(cond),
                then_body,
                else_body,
            });
        }

        if self.match_kind(TokenKind::While) {
            self.consume(TokenKind::OpenParen, "expected '(' after 'while'")?;
            let cond = self.parse_comparison()?;
            self.consume(TokenKind::CloseParen, "expected ')' after while condition")?;

            self.consume(TokenKind::OpenBrace, "expected '{' after while condition")?;
            let body = self.parse_block_body()?;
            self.consume(TokenKind::CloseBrace, "expected '}' after while body")?;

            return Ok(Expr::While {
                cond: Box::new(cond),
                body,
            });
        }

        if self.match_kind(TokenKind::For) {
            let var = self
                .consume(TokenKind::Identifier, "expected variable name after 'for'")?
                .lexeme
                .clone();
            self.consume(TokenKind::In, "expected 'in' after for variable")?;
            let start = self.parse_comparison()?;
            self.consume(TokenKind::Colon, "expected ':' in for range")?;
            let end = self.parse_comparison()?;

            self.consume(TokenKind::OpenBrace, "expected '{' after for range")?;
            let body = self.parse_block_body()?;
            self.consume(TokenKind::CloseBrace, "expected '}' after for body")?;

            return Ok(Expr::For {
                var,
                start: Box::new(start),
                end: Box::new(end),
                body,
            });
        }

        if self.match_kind(TokenKind::Break) {
            self.consume(TokenKind::Semi, "expected ';' after break")?;
            return Ok(Expr::Break);
        }

        if self.match_kind(TokenKind::Continue) {
            self.consume(TokenKind::Semi, "expected ';' after continue")?;
            return Ok(Expr::Continue);
        }

        if self.check(TokenKind::Identifier) {
            let next = self.tokens.get(self.current + 1).map(|t| t.kind);
            match next {
                Some(TokenKind::OpenParen) => {
                    let expr = self.parse_comparison()?;
                    self.consume(TokenKind::Semi, "expected ';' after function call")?;
                    return Ok(expr);
                }
                Some(TokenKind::Equal) => {
                    let name = self.advance().lexeme.clone();
                    self.advance(); // the '='
                    let value = self.parse_comparison()?;
                    self.consume(TokenKind::Semi, "expected ';' after assignment")?;
                    return Ok(Expr::Assign {
                        name,
                        value: Box::new(value),
                    });
                }
                _ => {}
            }
        }

        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, CoreError> {
        let lhs = self.parse_addition()?;

        let op = if self.match_kind(TokenKind::EqualEqual) {
            BinaryOp::Eq
        } else if self.match_kind(TokenKind::NotEqual) {
            BinaryOp::Ne
        } else if self.match_kind(TokenKind::Less) {
            BinaryOp::Lt
        } else if self.match_kind(TokenKind::LessEqual) {
            BinaryOp::Le
        } else if self.match_kind(TokenKind::Greater) {
            BinaryOp::Gt
        } else if self.match_kind(TokenKind::GreaterEqual) {
            BinaryOp::Ge
        } else {
            return Ok(lhs);
        };

        let rhs = self.parse_addition()?;
        Ok(Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn parse_addition(&mut self) -> Result<Expr, CoreError> {
        let lhs = self.parse_primary()?;

        if self.match_kind(TokenKind::Plus) {
            let rhs = self.parse_primary()?;
            return Ok(Expr::Binary {
                op: BinaryOp::Add,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            });
        }

        Ok(lhs)
    }

    fn parse_primary(&mut self) -> Result<Expr, CoreError> {
        if self.match_kind(TokenKind::Number) {
            let token = self.previous();
            let line = token.line;
            let lexeme = token.lexeme.clone();
            let value: i64 = lexeme.parse().map_err(|_| {
                CoreError::parse(line, format!("integer literal out of range: {lexeme}"))
            })?;
            return Ok(Expr::Number(value));
        }

        if self.match_kind(TokenKind::True) {
            return Ok(Expr::Boolean(true));
        }
        if self.match_kind(TokenKind::False) {
            return Ok(Expr::Boolean(false));
        }
        if self.match_kind(TokenKind::StringLiteral) {
            return Ok(Expr::StringLiteral(self.previous().lexeme.clone()));
        }

        if self.match_kind(TokenKind::OpenParen) {
            let expr = self.parse_comparison()?;
            self.consume(TokenKind::CloseParen, "expected ')' after expression")?;
            return Ok(expr);
        }

        if self.match_kind(TokenKind::Identifier) {
            let name = self.previous().lexeme.clone();

            if self.match_kind(TokenKind::OpenParen) {
                let mut args = Vec::new();
                if !self.check(TokenKind::CloseParen) {
                    loop {
                        args.push(self.parse_comparison()?);
                        if !self.match_kind(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.consume(TokenKind::CloseParen, "expected ')' after function arguments")?;
                return Ok(Expr::Call { callee: name, args });
            }

            return Ok(Expr::Variable(name));
        }

        Err(CoreError::parse(
            self.peek().line,
            "expected primary expression",
        ))
    }
}

/// Scans and parses `source` in one step, forwarding scanner diagnostics.
pub fn parse_source(source: &str) -> Result<(Vec<Function>, Vec<String>), CoreError> {
    let scanned = crate::lexer::scan(source)?;
    let functions = Parser::new(scanned.tokens).parse()?;
    Ok((functions, scanned.diagnostics))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Vec<Function> {
        let (functions, diagnostics) = parse_source(source).expect("parse should succeed");
        assert!(diagnostics.is_empty(), "unexpected diagnostics: {diagnostics:?}");
        functions
    }

    #[test]
    fn parses_function_per_fn_keyword() {
        let sources = [
            ("fn a() { }", 1),
            ("fn a() { } fn b() { }", 2),
            ("fn a() { } fn b() { } export fn c() -> u32 { return 1; }", 3),
        ];
        for (source, expected) in sources {
            assert_eq!(parse_ok(source).len(), expected, "source: {source}");
        }
    }

    #[test]
    fn parses_params_and_return_type() {
        let functions = parse_ok("fn add(a: u32, b: u32) -> u32 { return a + b; }");
        let f = &functions[0];
        assert_eq!(f.name, "add");
        assert_eq!(
            f.params,
            vec![
                ("a".to_string(), "u32".to_string()),
                ("b".to_string(), "u32".to_string())
            ]
        );
        assert_eq!(f.return_type.as_deref(), Some("u32"));
        assert!(matches!(
            f.body[0],
            Expr::Return(ref e) if matches!(**e, Expr::Binary { op: BinaryOp::Add, .. })
        ));
    }

    #[test]
    fn rejects_duplicate_parameter_names() {
        let err = parse_source("fn f(a: u8, a: u8) { }").unwrap_err();
        assert!(matches!(err, CoreError::Parse { .. }));
    }

    #[test]
    fn parses_extern_declaration_without_body() {
        let functions = parse_ok("extern fn puts(s: str) -> i32;");
        let f = &functions[0];
        assert!(f.is_extern);
        assert!(!f.is_export);
        assert!(f.body.is_empty());
    }

    #[test]
    fn extern_requires_semicolon() {
        let err = parse_source("extern fn puts(s: str) -> i32 { }").unwrap_err();
        assert!(matches!(err, CoreError::Parse { .. }));
    }

    #[test]
    fn parses_slice_types() {
        let functions = parse_ok("fn f(xs: []u8, deep: [][]i16) { }");
        assert_eq!(functions[0].params[0].1, "[]u8");
        assert_eq!(functions[0].params[1].1, "[][]i16");
    }

    #[test]
    fn var_decl_defaults_to_u8() {
        let functions = parse_ok("fn f() { var x; const y: u32 = 1; }");
        assert_eq!(
            functions[0].body[0],
            Expr::VarDecl {
                name: "x".to_string(),
                type_name: "u8".to_string(),
                is_const: false,
                init: None,
            }
        );
        assert!(matches!(
            functions[0].body[1],
            Expr::VarDecl { is_const: true, .. }
        ));
    }

    #[test]
    fn parses_if_else_while_for() {
        let functions = parse_ok(
            "fn f() { \
                if (1 == 2) { g(); } else { continue; } \
                while (true) { break; } \
                for i in 0:10 { g(); } \
             }",
        );
        let body = &functions[0].body;
        assert!(matches!(body[0], Expr::If { .. }));
        assert!(matches!(body[1], Expr::While { .. }));
        assert!(matches!(body[2], Expr::For { .. }));
    }

    #[test]
    fn call_statement_requires_semicolon() {
        let err = parse_source("fn f() { g() }").unwrap_err();
        assert!(matches!(err, CoreError::Parse { .. }));
    }

    #[test]
    fn parses_assignment_statement() {
        let functions = parse_ok("fn f() { var i: u32 = 0; i = i + 1; }");
        assert_eq!(
            functions[0].body[1],
            Expr::Assign {
                name: "i".to_string(),
                value: Box::new(Expr::Binary {
                    op: BinaryOp::Add,
                    lhs: Box::new(Expr::Variable("i".to_string())),
                    rhs: Box::new(Expr::Number(1)),
                }),
            }
        );
    }

    #[test]
    fn comparison_combines_two_additions() {
        let functions = parse_ok("fn f() -> bool { return a + 1 < b + 2; }");
        let Expr::Return(inner) = &functions[0].body[0] else {
            panic!("expected return");
        };
        let Expr::Binary { op, lhs, rhs } = &**inner else {
            panic!("expected comparison");
        };
        assert_eq!(*op, BinaryOp::Lt);
        assert!(matches!(**lhs, Expr::Binary { op: BinaryOp::Add, .. }));
        assert!(matches!(**rhs, Expr::Binary { op: BinaryOp::Add, .. }));
    }

    #[test]
    fn negative_and_boundary_literals() {
        let functions = parse_ok("fn f() { var a: u32 = -12; var b: u32 = 9223372036854775807; }");
        let Expr::VarDecl { init: Some(a), .. } = &functions[0].body[0] else {
            panic!("expected decl");
        };
        assert_eq!(**a, Expr::Number(-12));
        let Expr::VarDecl { init: Some(b), .. } = &functions[0].body[1] else {
            panic!("expected decl");
        };
        assert_eq!(**b, Expr::Number(i64::MAX));
    }

    #[test]
    fn rejects_out_of_range_literal() {
        let err = parse_source("fn f() { return 9223372036854775808; }").unwrap_err();
        match err {
            CoreError::Parse { line, message } => {
                assert_eq!(line, 1);
                assert!(message.contains("out of range"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn reports_missing_tokens() {
        for source in [
            "fn f( { }",
            "fn f() -> { }",
            "fn f() { return 1 }",
            "fn f() { if 1 { } }",
            "fn f() { for i in 0 10 { } }",
            "fn f() { break }",
        ] {
            let err = parse_source(source).unwrap_err();
            assert!(matches!(err, CoreError::Parse { .. }), "source: {source}");
        }
    }

    #[test]
    fn plain_reassignment_of_undeclared_form_is_rejected() {
        // Without a leading declaration keyword, `1 = 2;` has no statement
        // form; the parser trips on the stray '='.
        let err = parse_source("fn f() { 1 = 2; }").unwrap_err();
        assert!(matches!(err, CoreError::Parse { .. }));
    }
}
