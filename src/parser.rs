use std::rc::Rc;

use crate::ast::{DictEntry, Expression, FunctionDecl, Literal, Statement};
use crate::diagnostics::Diagnostic;
use crate::lexer::{Token, TokenKind, TokenLiteral};

/// Parse a token stream into a statement list.
///
/// Parsing never fails: every error is reported through the returned
/// diagnostics, the parser synchronizes to a likely statement boundary, and
/// keeps going with whatever it can salvage.
pub fn program(tokens: &[Token]) -> (Vec<Statement>, Vec<Diagnostic>) {
    let mut parser = Parser::new(tokens);
    let mut statements = Vec::new();
    while !parser.is_at_end() {
        statements.push(parser.declaration());
    }
    (statements, parser.diagnostics)
}

struct Parser<'a> {
    tokens: &'a [Token],
    current: usize,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self {
            tokens,
            current: 0,
            diagnostics: Vec::new(),
        }
    }

    fn declaration(&mut self) -> Statement {
        if self.check_class_definition() {
            return self.class_definition();
        }
        self.statement()
    }

    /// Look for `IDENT ':' [IDENT] '=' '{'` without consuming anything.
    fn check_class_definition(&mut self) -> bool {
        let save = self.current;
        let mut matches = false;
        if self.match_kind(TokenKind::Identifier) && self.match_kind(TokenKind::Colon) {
            if self.check(TokenKind::Identifier) {
                self.advance();
            }
            matches = self.match_kind(TokenKind::Equal) && self.check(TokenKind::LeftBrace);
        }
        self.current = save;
        matches
    }

    fn class_definition(&mut self) -> Statement {
        let name = self.consume(TokenKind::Identifier, "Expect class name.");
        self.consume(TokenKind::Colon, "Expect ':' after class name.");

        let parent = if self.check(TokenKind::Identifier) {
            Some(self.advance())
        } else {
            None
        };

        self.consume(TokenKind::Equal, "Expect '=' after class name.");
        self.consume(TokenKind::LeftBrace, "Expect '{' after '='.");

        let mut body = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            body.push(self.declaration());
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after class body.");

        Statement::Class { name, parent, body }
    }

    fn statement(&mut self) -> Statement {
        if self.match_kind(TokenKind::If) {
            return self.if_statement();
        }
        if self.match_kind(TokenKind::While) {
            return self.while_statement();
        }
        if self.match_kind(TokenKind::For) {
            return self.for_statement();
        }
        if self.match_kind(TokenKind::LeftBrace) {
            return Statement::Block(self.block());
        }
        if self.match_kind(TokenKind::Return) {
            return self.return_statement();
        }
        if self.match_kind(TokenKind::Def) {
            return Statement::Function(self.function_decl());
        }
        self.expression_statement()
    }

    fn if_statement(&mut self) -> Statement {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'if'.");
        let condition = self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after if condition.");
        self.consume(TokenKind::LeftBrace, "Expect '{' after 'if (...)'.");
        let then_branch = Statement::Block(self.block());

        let else_branch = if self.match_kind(TokenKind::Else) {
            self.consume(TokenKind::LeftBrace, "Expect '{' after 'else'.");
            Some(Box::new(Statement::Block(self.block())))
        } else {
            None
        };
        Statement::If(condition, Box::new(then_branch), else_branch)
    }

    fn while_statement(&mut self) -> Statement {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'while'.");
        let condition = self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after while condition.");
        self.consume(TokenKind::LeftBrace, "Expect '{' after 'while (...)'.");
        let body = Statement::Block(self.block());
        Statement::While(condition, Box::new(body))
    }

    fn for_statement(&mut self) -> Statement {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'for'.");
        let var = self.consume(TokenKind::Identifier, "Expect loop variable name.");
        self.consume(TokenKind::In, "Expect 'in' after loop variable.");
        let iterable = self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after iterable expr.");
        self.consume(TokenKind::LeftBrace, "Expect '{' after 'for (...)'.");
        let body = Statement::Block(self.block());
        Statement::For(var, iterable, Box::new(body))
    }

    fn return_statement(&mut self) -> Statement {
        let keyword = self.previous().clone();
        let value = if !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            Some(self.expression())
        } else {
            None
        };
        Statement::Return(keyword, value)
    }

    fn expression_statement(&mut self) -> Statement {
        Statement::Expression(self.expression())
    }

    fn block(&mut self) -> Vec<Statement> {
        let mut statements = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            statements.push(self.declaration());
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after block.");
        statements
    }

    /// `NAME '(' params? ')' '{' body '}'`, the `def` keyword already consumed.
    fn function_decl(&mut self) -> Rc<FunctionDecl> {
        let name = self.consume(TokenKind::Identifier, "Expect function name.");
        self.consume(TokenKind::LeftParen, "Expect '(' after function name.");
        let mut params = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                params.push(self.consume(TokenKind::Identifier, "Expect parameter name."));
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after parameters.");
        self.consume(TokenKind::LeftBrace, "Expect '{' after function signature.");
        let body = self.block();
        Rc::new(FunctionDecl {
            name: Some(name),
            params,
            body,
        })
    }

    // ---------- Expressions ----------

    fn expression(&mut self) -> Expression {
        self.ternary()
    }

    fn ternary(&mut self) -> Expression {
        let expr = self.assignment();
        if self.match_kind(TokenKind::Question) {
            let then_expr = self.expression();
            self.consume(TokenKind::Colon, "Expect ':' in ternary operator.");
            let else_expr = self.ternary();
            return Expression::Ternary(Box::new(expr), Box::new(then_expr), Box::new(else_expr));
        }
        expr
    }

    fn assignment(&mut self) -> Expression {
        let expr = self.or();
        if self.match_kind(TokenKind::Equal) {
            let equals = self.previous().clone();
            let value = self.assignment();
            match expr {
                Expression::Variable(name) => return Expression::Assign(name, Box::new(value)),
                Expression::Get(object, index) => {
                    return Expression::Set(object, index, Box::new(value))
                }
                _ => self.error(&equals, "Invalid assignment target."),
            }
        }
        expr
    }

    fn or(&mut self) -> Expression {
        let mut expr = self.and();
        while self.match_kind(TokenKind::Or) {
            let op = self.previous().clone();
            let right = self.and();
            expr = Expression::Binary(Box::new(expr), op, Box::new(right));
        }
        expr
    }

    fn and(&mut self) -> Expression {
        let mut expr = self.equality();
        while self.match_kind(TokenKind::And) {
            let op = self.previous().clone();
            let right = self.equality();
            expr = Expression::Binary(Box::new(expr), op, Box::new(right));
        }
        expr
    }

    fn equality(&mut self) -> Expression {
        let mut expr = self.comparison();
        while self.match_any(&[TokenKind::BangEqual, TokenKind::EqualEqual]) {
            let op = self.previous().clone();
            let right = self.comparison();
            expr = Expression::Binary(Box::new(expr), op, Box::new(right));
        }
        expr
    }

    fn comparison(&mut self) -> Expression {
        let mut expr = self.term();
        while self.match_any(&[
            TokenKind::Greater,
            TokenKind::GreaterEqual,
            TokenKind::Less,
            TokenKind::LessEqual,
        ]) {
            let op = self.previous().clone();
            let right = self.term();
            expr = Expression::Binary(Box::new(expr), op, Box::new(right));
        }
        expr
    }

    fn term(&mut self) -> Expression {
        let mut expr = self.factor();
        while self.match_any(&[TokenKind::Minus, TokenKind::Plus]) {
            let op = self.previous().clone();
            let right = self.factor();
            expr = Expression::Binary(Box::new(expr), op, Box::new(right));
        }
        expr
    }

    fn factor(&mut self) -> Expression {
        let mut expr = self.unary();
        while self.match_any(&[TokenKind::Slash, TokenKind::Star]) {
            let op = self.previous().clone();
            let right = self.unary();
            expr = Expression::Binary(Box::new(expr), op, Box::new(right));
        }
        expr
    }

    fn unary(&mut self) -> Expression {
        if self.match_any(&[TokenKind::Bang, TokenKind::Minus]) {
            let op = self.previous().clone();
            let right = self.unary();
            return Expression::Unary(op, Box::new(right));
        }
        self.call()
    }

    fn call(&mut self) -> Expression {
        let mut expr = self.subscript();
        loop {
            if self.match_kind(TokenKind::LeftParen) {
                expr = self.finish_call(expr);
            } else if self.match_kind(TokenKind::Dot) {
                let name = self.consume(TokenKind::Identifier, "Expect property name after '.'.");
                expr = Expression::Dot(Box::new(expr), name);
            } else {
                break;
            }
        }
        expr
    }

    fn finish_call(&mut self, callee: Expression) -> Expression {
        let mut args = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                args.push(self.expression());
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
        }
        let paren = self.consume(TokenKind::RightParen, "Expect ')' after arguments.");
        Expression::Call(Box::new(callee), paren, args)
    }

    fn subscript(&mut self) -> Expression {
        let mut expr = self.primary();
        while self.match_kind(TokenKind::LeftBracket) {
            let index = self.expression();
            self.consume(TokenKind::RightBracket, "Expect ']' after index.");
            expr = Expression::Get(Box::new(expr), Box::new(index));
        }
        expr
    }

    fn primary(&mut self) -> Expression {
        if self.match_kind(TokenKind::False) {
            return Expression::Literal(Literal::Bool(false));
        }
        if self.match_kind(TokenKind::True) {
            return Expression::Literal(Literal::Bool(true));
        }
        if self.match_kind(TokenKind::None) {
            return Expression::Literal(Literal::None);
        }
        if self.match_any(&[TokenKind::Number, TokenKind::String]) {
            let literal = match &self.previous().literal {
                Some(TokenLiteral::Number(n)) => Literal::Number(n.clone()),
                Some(TokenLiteral::Str(s)) => Literal::Str(s.clone()),
                None => Literal::None,
            };
            return Expression::Literal(literal);
        }
        if self.match_kind(TokenKind::Def) {
            return self.function_expression();
        }
        if self.is_lambda() {
            return self.lambda_expression();
        }
        if self.match_kind(TokenKind::Identifier) {
            return Expression::Variable(self.previous().clone());
        }
        if self.match_kind(TokenKind::LeftBracket) {
            return self.array_or_range();
        }
        if self.match_kind(TokenKind::LeftBrace) {
            return self.dict_literal();
        }
        if self.match_kind(TokenKind::LeftParen) {
            let expr = self.expression();
            self.consume(TokenKind::RightParen, "Expect ')' after group.");
            return Expression::Grouping(Box::new(expr));
        }
        let token = self.peek().clone();
        self.error(&token, "Expect expression.");
        Expression::Literal(Literal::None)
    }

    /// `[e1, e2, ...]` unless the first expression is followed by `::`, in
    /// which case `[start::end]` or `[start::end::step]`.
    fn array_or_range(&mut self) -> Expression {
        if self.check(TokenKind::RightBracket) {
            self.advance();
            return Expression::Array(Vec::new());
        }
        let first = self.expression();
        if self.match_kind(TokenKind::ColonColon) {
            let end = self.expression();
            let step = if self.match_kind(TokenKind::ColonColon) {
                Some(Box::new(self.expression()))
            } else {
                None
            };
            self.consume(TokenKind::RightBracket, "Expect ']' after range expression.");
            return Expression::Range(Box::new(first), Box::new(end), step);
        }
        let mut elements = vec![first];
        while self.match_kind(TokenKind::Comma) {
            if self.check(TokenKind::RightBracket) {
                break;
            }
            elements.push(self.expression());
        }
        self.consume(TokenKind::RightBracket, "Expect ']' after array literal.");
        Expression::Array(elements)
    }

    fn dict_literal(&mut self) -> Expression {
        let mut entries = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            let key = self.dict_key();
            self.consume(TokenKind::Colon, "Expect ':' after dict key.");
            let value = self.expression();
            entries.push(DictEntry { key, value });
            if !self.match_kind(TokenKind::Comma) {
                break;
            }
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after dict literal.");
        Expression::Dict(entries)
    }

    /// A bare identifier key reads as its name-as-string.
    fn dict_key(&mut self) -> Expression {
        if self.match_kind(TokenKind::Identifier) {
            return Expression::Literal(Literal::Str(self.previous().lexeme.clone()));
        }
        self.expression()
    }

    /// `def NAME(...) {...}` in expression position; both names and yields
    /// the function.
    fn function_expression(&mut self) -> Expression {
        Expression::Function(self.function_decl())
    }

    /// Peek for `IDENT '->'` or `'(' IDENT,* ')' '->'` without consuming.
    fn is_lambda(&mut self) -> bool {
        if self.check(TokenKind::Identifier) && self.peek_next().kind == TokenKind::Arrow {
            return true;
        }
        if self.check(TokenKind::LeftParen) {
            let save = self.current;
            self.advance();
            let mut valid = true;
            if !self.check(TokenKind::RightParen) {
                loop {
                    if !self.check(TokenKind::Identifier) {
                        valid = false;
                        break;
                    }
                    self.advance();
                    if !self.match_kind(TokenKind::Comma) {
                        break;
                    }
                }
            }
            if valid && self.check(TokenKind::RightParen) {
                self.advance();
                let is_arrow = self.check(TokenKind::Arrow);
                self.current = save;
                return is_arrow;
            }
            self.current = save;
        }
        false
    }

    /// The single-expression body is wrapped in an implicit return; the
    /// resulting function is nameless.
    fn lambda_expression(&mut self) -> Expression {
        let mut params = Vec::new();
        if self.check(TokenKind::Identifier) && self.peek_next().kind == TokenKind::Arrow {
            params.push(self.advance());
        } else if self.match_kind(TokenKind::LeftParen) {
            if !self.check(TokenKind::RightParen) {
                loop {
                    params.push(self.consume(TokenKind::Identifier, "Expect parameter name in lambda."));
                    if !self.match_kind(TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.consume(TokenKind::RightParen, "Expect ')' after lambda params.");
        }
        self.consume(TokenKind::Arrow, "Expect '->' in lambda.");
        let body_expr = self.expression();
        let keyword = self.previous().clone();
        Expression::Function(Rc::new(FunctionDecl {
            name: None,
            params,
            body: vec![Statement::Return(keyword, Some(body_expr))],
        }))
    }

    // ---------- Utility ----------

    fn match_kind(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            return true;
        }
        false
    }

    fn match_any(&mut self, kinds: &[TokenKind]) -> bool {
        for kind in kinds {
            if self.check(*kind) {
                self.advance();
                return true;
            }
        }
        false
    }

    /// On mismatch: report, synchronize, and yield a dummy token of the
    /// expected kind so parsing always makes progress.
    fn consume(&mut self, kind: TokenKind, message: &str) -> Token {
        if self.check(kind) {
            return self.advance();
        }
        let line = self.peek().line;
        let token = self.peek().clone();
        self.error(&token, message);
        Token {
            kind,
            lexeme: String::new(),
            literal: None,
            line,
        }
    }

    fn error(&mut self, token: &Token, message: &str) {
        let location = if token.kind == TokenKind::Eof {
            "end".to_string()
        } else {
            format!("'{}'", token.lexeme)
        };
        self.diagnostics.push(Diagnostic::Parse {
            line: token.line,
            location,
            message: message.to_string(),
        });
        self.synchronize();
    }

    /// Skip to what looks like the next statement boundary.
    fn synchronize(&mut self) {
        self.advance();
        while !self.is_at_end() {
            if self.previous().kind == TokenKind::Semicolon {
                return;
            }
            match self.peek().kind {
                TokenKind::Def
                | TokenKind::If
                | TokenKind::For
                | TokenKind::While
                | TokenKind::Return => return,
                _ => {}
            }
            self.advance();
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        !self.is_at_end() && self.peek().kind == kind
    }

    fn advance(&mut self) -> Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous().clone()
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn peek_next(&self) -> &Token {
        if self.current + 1 >= self.tokens.len() {
            &self.tokens[self.tokens.len() - 1]
        } else {
            &self.tokens[self.current + 1]
        }
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current - 1]
    }
}
