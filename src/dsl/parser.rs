//! Recursive-descent parser from tokens to a [`Script`].

use super::ast::{BinaryOp, Expr, Procedure, Script, Stmt, UnaryOp};
use super::lexer::{Token, TokenKind};
use super::{DslError, DslResult};

pub fn parse_tokens(tokens: Vec<Token>) -> DslResult<Script> {
    Parser::new(tokens).script()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.last().map(|t| t.kind) != Some(TokenKind::Eof) {
            let (line, column) = tokens.last().map(|t| (t.line, t.column)).unwrap_or((1, 1));
            tokens.push(Token {
                kind: TokenKind::Eof,
                text: String::new(),
                line,
                column,
            });
        }
        Self { tokens, pos: 0 }
    }

    fn script(mut self) -> DslResult<Script> {
        let mut statements = Vec::new();
        while !self.at_end() {
            if self.eat(TokenKind::Newline) {
                continue;
            }
            statements.push(self.statement()?);
        }
        Ok(Script { statements })
    }

    // ── Statements ──────────────────────────────────────────────────────

    fn statement(&mut self) -> DslResult<Stmt> {
        let token = self.peek().clone();
        let stmt = match token.kind {
            TokenKind::Connect => {
                self.advance();
                self.connect()?
            }
            TokenKind::Call => {
                self.advance();
                self.call()?
            }
            TokenKind::Assert => {
                self.advance();
                self.assert()?
            }
            TokenKind::Wait => {
                self.advance();
                self.wait()?
            }
            TokenKind::Loop => {
                self.advance();
                self.loop_stmt()?
            }
            TokenKind::If => {
                self.advance();
                self.if_stmt()?
            }
            TokenKind::Set => {
                self.advance();
                self.set()?
            }
            TokenKind::Print => {
                self.advance();
                Stmt::Print(self.expression()?)
            }
            TokenKind::Define => {
                self.advance();
                self.define()?
            }
            TokenKind::Run => {
                self.advance();
                self.run()?
            }
            TokenKind::Ident if self.peek_at(1) == TokenKind::Assign => self.set()?,
            TokenKind::Ident => {
                return Err(self.error_at(&token, format!("unexpected identifier '{}'", token.text)))
            }
            _ => return Err(self.error_at(&token, format!("unexpected token '{}'", display(&token)))),
        };
        self.skip_newlines();
        Ok(stmt)
    }

    fn connect(&mut self) -> DslResult<Stmt> {
        let server = self.expression()?;

        let mut args = Vec::new();
        while !self.at_statement_end() && !self.check(TokenKind::LBrace) {
            args.push(self.expression()?);
        }

        let mut options = Vec::new();
        if self.eat(TokenKind::LBrace) {
            loop {
                self.skip_separators();
                if self.check(TokenKind::RBrace) || self.at_end() {
                    break;
                }
                let name = self.expect(TokenKind::Ident, "expected option name")?.text;
                self.expect(TokenKind::Colon, "expected ':' after option name")?;
                let value = self.expression()?;
                options.push((name, value));
            }
            self.expect(TokenKind::RBrace, "expected '}'")?;
        }

        Ok(Stmt::Connect {
            server,
            args,
            options,
        })
    }

    fn call(&mut self) -> DslResult<Stmt> {
        let tool = if self.check(TokenKind::Ident) || self.check(TokenKind::Str) {
            self.advance().text
        } else {
            return Err(self.error("expected tool name after 'call'"));
        };

        let args = if self.at_statement_end() || self.check(TokenKind::Arrow) {
            None
        } else {
            Some(self.expression()?)
        };

        let target = if self.eat(TokenKind::Arrow) {
            Some(self.expect(TokenKind::Ident, "expected variable name after '->'")?.text)
        } else {
            None
        };

        Ok(Stmt::Call { tool, args, target })
    }

    fn assert(&mut self) -> DslResult<Stmt> {
        let condition = self.expression()?;
        let message = if self.eat(TokenKind::Comma) {
            Some(self.expect(TokenKind::Str, "expected string message after ','")?.text)
        } else {
            None
        };
        Ok(Stmt::Assert { condition, message })
    }

    fn wait(&mut self) -> DslResult<Stmt> {
        let condition = self.expression()?;
        let mut timeout = None;
        let mut interval = None;
        if self.eat(TokenKind::Comma) {
            timeout = Some(self.expression()?);
            if self.eat(TokenKind::Comma) {
                interval = Some(self.expression()?);
            }
        }
        Ok(Stmt::Wait {
            condition,
            timeout,
            interval,
        })
    }

    fn loop_stmt(&mut self) -> DslResult<Stmt> {
        let var = self.expect(TokenKind::Ident, "expected iterator variable after 'loop'")?.text;
        self.expect(TokenKind::In, "expected 'in' after iterator variable")?;
        let collection = self.expression()?;
        let body = self.block()?;
        Ok(Stmt::Loop {
            var,
            collection,
            body,
        })
    }

    fn if_stmt(&mut self) -> DslResult<Stmt> {
        let condition = self.expression()?;
        let then_body = self.block()?;

        let else_body = if self.eat(TokenKind::Else) {
            if self.eat(TokenKind::If) {
                Some(vec![self.if_stmt()?])
            } else {
                Some(self.block()?)
            }
        } else {
            None
        };

        Ok(Stmt::If {
            condition,
            then_body,
            else_body,
        })
    }

    fn set(&mut self) -> DslResult<Stmt> {
        let var = self.expect(TokenKind::Ident, "expected variable name")?.text;
        self.expect(TokenKind::Assign, "expected '=' after variable name")?;
        let value = self.expression()?;
        Ok(Stmt::Set { var, value })
    }

    fn define(&mut self) -> DslResult<Stmt> {
        let name = self.expect(TokenKind::Ident, "expected procedure name after 'define'")?.text;

        let mut params = Vec::new();
        if self.eat(TokenKind::LParen) {
            self.delimited(TokenKind::RParen, |p| {
                params.push(p.expect(TokenKind::Ident, "expected parameter name")?.text);
                Ok(())
            })?;
        }

        let body = self.block()?;
        Ok(Stmt::Define(Procedure { name, params, body }))
    }

    fn run(&mut self) -> DslResult<Stmt> {
        let name = self.expect(TokenKind::Ident, "expected procedure name after 'run'")?.text;

        let mut args = Vec::new();
        if self.eat(TokenKind::LParen) {
            self.delimited(TokenKind::RParen, |p| {
                args.push(p.expression()?);
                Ok(())
            })?;
        }

        Ok(Stmt::Run { name, args })
    }

    fn block(&mut self) -> DslResult<Vec<Stmt>> {
        self.skip_newlines();
        self.expect(TokenKind::LBrace, "expected '{'")?;

        let mut body = Vec::new();
        loop {
            self.skip_newlines();
            if self.check(TokenKind::RBrace) || self.at_end() {
                break;
            }
            body.push(self.statement()?);
        }

        self.expect(TokenKind::RBrace, "expected '}'")?;
        Ok(body)
    }

    // ── Expressions ─────────────────────────────────────────────────────

    fn expression(&mut self) -> DslResult<Expr> {
        self.or()
    }

    fn or(&mut self) -> DslResult<Expr> {
        self.binary(&[(TokenKind::OrOr, BinaryOp::Or)], Self::and)
    }

    fn and(&mut self) -> DslResult<Expr> {
        self.binary(&[(TokenKind::AndAnd, BinaryOp::And)], Self::equality)
    }

    fn equality(&mut self) -> DslResult<Expr> {
        self.binary(
            &[(TokenKind::EqEq, BinaryOp::Eq), (TokenKind::NotEq, BinaryOp::Ne)],
            Self::comparison,
        )
    }

    fn comparison(&mut self) -> DslResult<Expr> {
        self.binary(
            &[
                (TokenKind::Less, BinaryOp::Lt),
                (TokenKind::Greater, BinaryOp::Gt),
                (TokenKind::LessEq, BinaryOp::Le),
                (TokenKind::GreaterEq, BinaryOp::Ge),
            ],
            Self::term,
        )
    }

    fn term(&mut self) -> DslResult<Expr> {
        self.binary(
            &[(TokenKind::Plus, BinaryOp::Add), (TokenKind::Minus, BinaryOp::Sub)],
            Self::factor,
        )
    }

    fn factor(&mut self) -> DslResult<Expr> {
        self.binary(
            &[(TokenKind::Star, BinaryOp::Mul), (TokenKind::Slash, BinaryOp::Div)],
            Self::unary,
        )
    }

    /// Left-associative chain of `ops` over operands parsed by `next`.
    fn binary(
        &mut self,
        ops: &[(TokenKind, BinaryOp)],
        next: fn(&mut Self) -> DslResult<Expr>,
    ) -> DslResult<Expr> {
        let mut left = next(self)?;
        while let Some(&(_, op)) = ops.iter().find(|(kind, _)| self.check(*kind)) {
            self.advance();
            let right = next(self)?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> DslResult<Expr> {
        let op = if self.eat(TokenKind::Bang) {
            UnaryOp::Not
        } else if self.eat(TokenKind::Minus) {
            UnaryOp::Neg
        } else {
            return self.postfix();
        };
        Ok(Expr::Unary(op, Box::new(self.unary()?)))
    }

    fn postfix(&mut self) -> DslResult<Expr> {
        let mut expr = self.primary()?;

        loop {
            if self.eat(TokenKind::Dot) {
                let field = self.expect(TokenKind::Ident, "expected field name after '.'")?.text;
                expr = Expr::Field(Box::new(expr), field);
            } else if self.eat(TokenKind::LBracket) {
                let index = self.expression()?;
                self.expect(TokenKind::RBracket, "expected ']'")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if self.check(TokenKind::LParen) && self.previous().kind == TokenKind::Ident {
                let name = match &expr {
                    Expr::Var(name) => name.clone(),
                    _ => break,
                };
                self.advance();
                let mut args = Vec::new();
                self.delimited(TokenKind::RParen, |p| {
                    args.push(p.expression()?);
                    Ok(())
                })?;
                expr = Expr::Call(name, args);
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn primary(&mut self) -> DslResult<Expr> {
        let token = self.peek().clone();
        let expr = match token.kind {
            TokenKind::Str => Expr::Str(token.text.clone()),
            TokenKind::Number => {
                let value = token
                    .text
                    .parse::<f64>()
                    .map_err(|e| self.error_at(&token, format!("invalid number '{}': {}", token.text, e)))?;
                Expr::Number(value)
            }
            TokenKind::True => Expr::Bool(true),
            TokenKind::False => Expr::Bool(false),
            TokenKind::Null => Expr::Null,
            TokenKind::Ident => Expr::Var(token.text.clone()),
            TokenKind::LBrace => {
                self.advance();
                return self.object();
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                self.delimited(TokenKind::RBracket, |p| {
                    elements.push(p.expression()?);
                    Ok(())
                })?;
                return Ok(Expr::Array(elements));
            }
            TokenKind::LParen => {
                self.advance();
                self.skip_newlines();
                let inner = self.expression()?;
                self.skip_newlines();
                self.expect(TokenKind::RParen, "expected ')'")?;
                return Ok(inner);
            }
            _ => return Err(self.error_at(&token, "expected expression")),
        };
        self.advance();
        Ok(expr)
    }

    fn object(&mut self) -> DslResult<Expr> {
        let mut fields = Vec::new();
        loop {
            self.skip_separators();
            if self.check(TokenKind::RBrace) || self.at_end() {
                break;
            }
            let key = if self.check(TokenKind::Ident) || self.check(TokenKind::Str) {
                self.advance().text
            } else {
                return Err(self.error("expected field name"));
            };
            self.expect(TokenKind::Colon, "expected ':' after field name")?;
            let value = self.expression()?;
            fields.push((key, value));
        }
        self.expect(TokenKind::RBrace, "expected '}'")?;
        Ok(Expr::Object(fields))
    }

    /// Comma-separated items up to `close`; newlines inside are ignored.
    fn delimited(
        &mut self,
        close: TokenKind,
        mut item: impl FnMut(&mut Self) -> DslResult<()>,
    ) -> DslResult<()> {
        loop {
            self.skip_newlines();
            if self.check(close) || self.at_end() {
                break;
            }
            item(self)?;
            self.skip_newlines();
            if !self.check(close) && !self.eat(TokenKind::Comma) {
                return Err(self.error(format!("expected ',' or '{}'", closing_symbol(close))));
            }
        }
        self.expect(close, &format!("expected '{}'", closing_symbol(close)))?;
        Ok(())
    }

    // ── Token helpers ───────────────────────────────────────────────────

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, offset: usize) -> TokenKind {
        self.tokens
            .get(self.pos + offset)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.pos.saturating_sub(1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if !self.at_end() {
            self.pos += 1;
        }
        token
    }

    fn at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn check(&self, kind: TokenKind) -> bool {
        !self.at_end() && self.peek().kind == kind
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, message: &str) -> DslResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(message))
        }
    }

    /// Newline, end of input, or the `}` closing a one-line block.
    fn at_statement_end(&self) -> bool {
        self.at_end() || self.check(TokenKind::Newline) || self.check(TokenKind::RBrace)
    }

    fn skip_newlines(&mut self) {
        while self.eat(TokenKind::Newline) {}
    }

    fn skip_separators(&mut self) {
        while self.eat(TokenKind::Newline) || self.eat(TokenKind::Comma) {}
    }

    fn error(&self, message: impl Into<String>) -> DslError {
        self.error_at(self.peek(), message)
    }

    fn error_at(&self, token: &Token, message: impl Into<String>) -> DslError {
        DslError::Parse {
            message: message.into(),
            line: token.line,
        }
    }
}

fn closing_symbol(kind: TokenKind) -> &'static str {
    match kind {
        TokenKind::RParen => ")",
        TokenKind::RBracket => "]",
        TokenKind::RBrace => "}",
        _ => "?",
    }
}

fn display(token: &Token) -> &str {
    match token.kind {
        TokenKind::Eof => "end of input",
        TokenKind::Newline => "newline",
        _ => &token.text,
    }
}
