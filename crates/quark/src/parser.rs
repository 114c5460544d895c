//! Recursive-descent parser with explicit per-precedence-level methods (§4.2).
//!
//! Error strategy is fail-fast: the first grammar violation returns a
//! positioned `ParseError`, there is no error recovery or multi-error
//! reporting.

use crate::ast::{BinaryOp, ElifArm, Expr, Stmt, UnaryOp};
use crate::error::{ParseError, ParseResult};
use crate::lexer::Lexer;
use crate::token::{Literal, Position, Token, TokenKind};

pub struct Parser<'a> {
    lexer: Lexer<'a>,
}

impl<'a> Parser<'a> {
    pub fn new(filename: impl Into<String>, src: &'a [u8]) -> Self {
        Self {
            lexer: Lexer::new(filename, src),
        }
    }

    /// Parses the entire source buffer into a `Chunk`.
    pub fn parse(&mut self) -> ParseResult<Stmt> {
        let mut statements = Vec::new();
        self.skip_newlines_and_semicolons()?;
        while self.peek()?.kind != TokenKind::Eof {
            statements.push(self.parse_statement()?);
            self.skip_newlines_and_semicolons()?;
        }
        Ok(Stmt::Chunk(statements))
    }

    fn peek(&mut self) -> ParseResult<Token> {
        Ok(self.lexer.peek_token()?)
    }

    fn advance(&mut self) -> ParseResult<Token> {
        Ok(self.lexer.next_token()?)
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> ParseResult<Token> {
        let tok = self.advance()?;
        if tok.kind != kind {
            return Err(ParseError::new(format!("expected {what}, found '{}'", tok.text), tok.position));
        }
        Ok(tok)
    }

    fn at(&mut self, kind: TokenKind) -> ParseResult<bool> {
        Ok(self.peek()?.kind == kind)
    }

    fn skip_newlines(&mut self) -> ParseResult<()> {
        while self.at(TokenKind::Newline)? {
            self.advance()?;
        }
        Ok(())
    }

    fn skip_newlines_and_semicolons(&mut self) -> ParseResult<()> {
        while matches!(self.peek()?.kind, TokenKind::Newline | TokenKind::Semicolon) {
            self.advance()?;
        }
        Ok(())
    }

    /// Consumes a statement terminator: one or more of newline/`;`, or the
    /// upcoming `}`/EOF (end of block / end of file ends a statement too).
    fn end_statement(&mut self) -> ParseResult<()> {
        match self.peek()?.kind {
            TokenKind::Newline | TokenKind::Semicolon => {
                self.skip_newlines_and_semicolons()?;
                Ok(())
            }
            TokenKind::RBrace | TokenKind::Eof => Ok(()),
            _ => {
                let tok = self.peek()?;
                Err(ParseError::new(format!("expected end of statement, found '{}'", tok.text), tok.position))
            }
        }
    }

    // ---------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------

    fn parse_block(&mut self) -> ParseResult<Vec<Stmt>> {
        self.expect(TokenKind::LBrace, "'{'")?;
        self.skip_newlines_and_semicolons()?;
        let mut statements = Vec::new();
        while !self.at(TokenKind::RBrace)? {
            statements.push(self.parse_statement()?);
            self.skip_newlines_and_semicolons()?;
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(statements)
    }

    fn parse_statement(&mut self) -> ParseResult<Stmt> {
        let tok = self.peek()?;
        match tok.kind {
            TokenKind::LBrace => Ok(Stmt::Block(self.parse_block()?)),
            TokenKind::If => self.parse_if(),
            TokenKind::For => self.parse_for(),
            TokenKind::Fn => self.parse_function_decl(),
            TokenKind::Return => self.parse_return(),
            TokenKind::Export => self.parse_export(),
            TokenKind::Break => {
                self.advance()?;
                self.end_statement()?;
                Ok(Stmt::Break(tok.position))
            }
            TokenKind::Continue => {
                self.advance()?;
                self.end_statement()?;
                Ok(Stmt::Continue(tok.position))
            }
            TokenKind::Debugger => {
                self.advance()?;
                self.end_statement()?;
                Ok(Stmt::Debugger(tok.position))
            }
            TokenKind::Class | TokenKind::This | TokenKind::Super => Err(ParseError::new(
                format!("'{}' is recognized but not implemented", tok.text),
                tok.position,
            )),
            TokenKind::Semicolon => {
                self.advance()?;
                Ok(Stmt::Empty)
            }
            _ => self.parse_expr_or_assign_statement(),
        }
    }

    fn parse_if(&mut self) -> ParseResult<Stmt> {
        self.advance()?; // 'if'
        let cond = self.parse_expr()?;
        let then_body = self.parse_block()?;
        let mut elifs = Vec::new();
        let mut else_body = None;
        loop {
            let save_newlines = self.peek()?.kind == TokenKind::Else;
            if !save_newlines {
                break;
            }
            self.advance()?; // 'else'
            if self.at(TokenKind::If)? {
                self.advance()?;
                let elif_cond = self.parse_expr()?;
                let elif_body = self.parse_block()?;
                elifs.push(ElifArm {
                    cond: elif_cond,
                    body: elif_body,
                });
            } else {
                else_body = Some(self.parse_block()?);
                break;
            }
        }
        Ok(Stmt::If {
            cond,
            then_body,
            elifs,
            else_body,
        })
    }

    /// Three forms: `for block` (infinite), `for expr block` (condition
    /// only), `for init? ; cond? ; post? block`.
    fn parse_for(&mut self) -> ParseResult<Stmt> {
        self.advance()?; // 'for'

        if self.at(TokenKind::LBrace)? {
            let body = self.parse_block()?;
            return Ok(Stmt::For {
                init: None,
                cond: None,
                post: None,
                body,
            });
        }

        if self.at(TokenKind::Semicolon)? {
            // `for ; cond? ; post? block`: the init clause is empty.
            self.advance()?; // ';'
            let cond = if self.at(TokenKind::Semicolon)? {
                None
            } else {
                Some(self.parse_expr()?)
            };
            self.expect(TokenKind::Semicolon, "';'")?;
            let post = if self.at(TokenKind::LBrace)? {
                None
            } else {
                Some(Box::new(self.parse_expr_or_assign_statement_no_terminator()?))
            };
            let body = self.parse_block()?;
            return Ok(Stmt::For {
                init: None,
                cond,
                post,
                body,
            });
        }

        // Try the `for expr block` / `for init ; cond ; post block` forms by
        // parsing a statement first and inspecting what comes next.
        let first = self.parse_expr_or_assign_statement_no_terminator()?;

        if self.at(TokenKind::LBrace)? {
            // `for expr block`: `first` must be a bare expression statement.
            let Stmt::ExprStmt(cond) = first else {
                let tok = self.peek()?;
                return Err(ParseError::new(
                    "'for' with a single clause requires a plain condition expression",
                    tok.position,
                ));
            };
            let body = self.parse_block()?;
            return Ok(Stmt::For {
                init: None,
                cond: Some(cond),
                post: None,
                body,
            });
        }

        self.expect(TokenKind::Semicolon, "';'")?;
        let cond = if self.at(TokenKind::Semicolon)? {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(TokenKind::Semicolon, "';'")?;
        let post = if self.at(TokenKind::LBrace)? {
            None
        } else {
            Some(Box::new(self.parse_expr_or_assign_statement_no_terminator()?))
        };
        let body = self.parse_block()?;
        Ok(Stmt::For {
            init: Some(Box::new(first)),
            cond,
            post,
            body,
        })
    }

    fn parse_params(&mut self) -> ParseResult<Vec<String>> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        self.skip_newlines()?;
        if !self.at(TokenKind::RParen)? {
            loop {
                let name = self.expect(TokenKind::Ident, "parameter name")?;
                params.push(name.text);
                self.skip_newlines()?;
                if self.at(TokenKind::Comma)? {
                    self.advance()?;
                    self.skip_newlines()?;
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        Ok(params)
    }

    fn parse_function_decl(&mut self) -> ParseResult<Stmt> {
        let fn_tok = self.advance()?; // 'fn'
        let name_tok = self.expect(TokenKind::Ident, "function name")?;
        let params = self.parse_params()?;
        let body = self.parse_block()?;
        Ok(Stmt::FunctionDecl {
            name: name_tok.text,
            params,
            body,
            position: fn_tok.position,
        })
    }

    fn parse_return(&mut self) -> ParseResult<Stmt> {
        let tok = self.advance()?; // 'return'
        if matches!(self.peek()?.kind, TokenKind::Newline | TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof) {
            self.end_statement()?;
            return Ok(Stmt::Return(Vec::new(), tok.position));
        }
        let mut exprs = vec![self.parse_expr()?];
        while self.at(TokenKind::Comma)? {
            self.advance()?;
            exprs.push(self.parse_expr()?);
        }
        self.end_statement()?;
        Ok(Stmt::Return(exprs, tok.position))
    }

    fn parse_export(&mut self) -> ParseResult<Stmt> {
        let tok = self.advance()?; // 'export'
        let value = self.parse_expr()?;
        self.end_statement()?;
        Ok(Stmt::Export(value, tok.position))
    }

    /// Parses an expression statement or a multi-target assignment, then
    /// consumes the statement terminator.
    fn parse_expr_or_assign_statement(&mut self) -> ParseResult<Stmt> {
        let stmt = self.parse_expr_or_assign_statement_no_terminator()?;
        self.end_statement()?;
        Ok(stmt)
    }

    fn parse_expr_or_assign_statement_no_terminator(&mut self) -> ParseResult<Stmt> {
        let position = self.peek()?.position;
        let first = self.parse_expr()?;

        if self.at(TokenKind::Comma)? || self.at(TokenKind::Assign)? {
            let mut targets = vec![first.into_assign_target().map_err(|p| {
                ParseError::new("invalid assignment target", p)
            })?];
            while self.at(TokenKind::Comma)? {
                self.advance()?;
                let target = self.parse_expr()?;
                targets.push(target.into_assign_target().map_err(|p| {
                    ParseError::new("invalid assignment target", p)
                })?);
            }
            self.expect(TokenKind::Assign, "'='")?;
            let mut values = vec![self.parse_expr()?];
            while self.at(TokenKind::Comma)? {
                self.advance()?;
                values.push(self.parse_expr()?);
            }
            return Ok(Stmt::Assign {
                targets,
                values,
                position,
            });
        }

        if let Expr::Call { .. } = &first {
            return Ok(Stmt::CallStmt(first));
        }
        Ok(Stmt::ExprStmt(first))
    }

    // ---------------------------------------------------------------
    // Expressions — precedence climbing per §4.2's table, one method per
    // level from lowest (ternary) to highest (postfix chain).
    // ---------------------------------------------------------------

    pub fn parse_expr(&mut self) -> ParseResult<Expr> {
        self.parse_ternary()
    }

    fn parse_ternary(&mut self) -> ParseResult<Expr> {
        let cond = self.parse_logical_or()?;
        if self.at(TokenKind::Question)? {
            let position = self.advance()?.position;
            let then_expr = self.parse_ternary()?;
            self.expect(TokenKind::Colon, "':'")?;
            let else_expr = self.parse_ternary()?;
            return Ok(Expr::Ternary {
                cond: Box::new(cond),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
                position,
            });
        }
        Ok(cond)
    }

    fn parse_logical_or(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_logical_and()?;
        while self.at(TokenKind::OrOr)? {
            let position = self.advance()?.position;
            let right = self.parse_logical_and()?;
            left = Expr::Binary {
                op: BinaryOp::Or,
                left: Box::new(left),
                right: Box::new(right),
                position,
            };
        }
        Ok(left)
    }

    fn parse_logical_and(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_bit_or()?;
        while self.at(TokenKind::AndAnd)? {
            let position = self.advance()?.position;
            let right = self.parse_bit_or()?;
            left = Expr::Binary {
                op: BinaryOp::And,
                left: Box::new(left),
                right: Box::new(right),
                position,
            };
        }
        Ok(left)
    }

    fn parse_bit_or(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_bit_xor()?;
        while self.at(TokenKind::Pipe)? {
            let position = self.advance()?.position;
            let right = self.parse_bit_xor()?;
            left = Expr::Binary {
                op: BinaryOp::BitOr,
                left: Box::new(left),
                right: Box::new(right),
                position,
            };
        }
        Ok(left)
    }

    fn parse_bit_xor(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_bit_and()?;
        while self.at(TokenKind::Caret)? {
            let position = self.advance()?.position;
            let right = self.parse_bit_and()?;
            left = Expr::Binary {
                op: BinaryOp::BitXor,
                left: Box::new(left),
                right: Box::new(right),
                position,
            };
        }
        Ok(left)
    }

    fn parse_bit_and(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_equality()?;
        while self.at(TokenKind::Amp)? {
            let position = self.advance()?.position;
            let right = self.parse_equality()?;
            left = Expr::Binary {
                op: BinaryOp::BitAnd,
                left: Box::new(left),
                right: Box::new(right),
                position,
            };
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek()?.kind {
                TokenKind::Eq => BinaryOp::Eq,
                TokenKind::Neq => BinaryOp::Neq,
                _ => break,
            };
            let position = self.advance()?.position;
            let right = self.parse_relational()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                position,
            };
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_shift()?;
        loop {
            let op = match self.peek()?.kind {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Lte => BinaryOp::Lte,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::Gte => BinaryOp::Gte,
                _ => break,
            };
            let position = self.advance()?.position;
            let right = self.parse_shift()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                position,
            };
        }
        Ok(left)
    }

    fn parse_shift(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek()?.kind {
                TokenKind::Shl => BinaryOp::Shl,
                TokenKind::Shr => BinaryOp::Shr,
                _ => break,
            };
            let position = self.advance()?.position;
            let right = self.parse_additive()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                position,
            };
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek()?.kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            let position = self.advance()?.position;
            let right = self.parse_multiplicative()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                position,
            };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek()?.kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            let position = self.advance()?.position;
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                position,
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        let op = match self.peek()?.kind {
            TokenKind::Plus => Some(UnaryOp::Pos),
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            _ => None,
        };
        if let Some(op) = op {
            let position = self.advance()?.position;
            let expr = self.parse_unary()?;
            return Ok(Expr::Unary {
                op,
                expr: Box::new(expr),
                position,
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek()?.kind {
                TokenKind::LParen => {
                    let position = self.advance()?.position;
                    let mut args = Vec::new();
                    self.skip_newlines()?;
                    if !self.at(TokenKind::RParen)? {
                        loop {
                            args.push(self.parse_expr()?);
                            self.skip_newlines()?;
                            if self.at(TokenKind::Comma)? {
                                self.advance()?;
                                self.skip_newlines()?;
                            } else {
                                break;
                            }
                        }
                    }
                    self.expect(TokenKind::RParen, "')'")?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        position,
                    };
                }
                TokenKind::LBracket => {
                    let position = self.advance()?.position;
                    let index = self.parse_expr()?;
                    self.expect(TokenKind::RBracket, "']'")?;
                    expr = Expr::Index {
                        value: Box::new(expr),
                        index: Box::new(index),
                        is_assign_target: false,
                        position,
                    };
                }
                TokenKind::Dot => {
                    let position = self.advance()?.position;
                    let name = self.expect(TokenKind::Ident, "attribute name")?;
                    expr = Expr::Attribute {
                        value: Box::new(expr),
                        name: name.text,
                        is_assign_target: false,
                        position,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let tok = self.advance()?;
        match tok.kind {
            TokenKind::Null => Ok(Expr::Null(tok.position)),
            TokenKind::True => Ok(Expr::True(tok.position)),
            TokenKind::False => Ok(Expr::False(tok.position)),
            TokenKind::Int => match tok.literal {
                Some(Literal::Int(v)) => Ok(Expr::Int(v, tok.position)),
                _ => unreachable!("lexer always attaches Int literal to Int token"),
            },
            TokenKind::Float => match tok.literal {
                Some(Literal::Float(v)) => Ok(Expr::Float(v, tok.position)),
                _ => unreachable!("lexer always attaches Float literal to Float token"),
            },
            TokenKind::String => match tok.literal {
                Some(Literal::String(v)) => Ok(Expr::String(v, tok.position)),
                _ => unreachable!("lexer always attaches String literal to String token"),
            },
            TokenKind::Ident => Ok(Expr::Identifier {
                name: tok.text,
                is_assign_target: false,
                position: tok.position,
            }),
            TokenKind::LParen => {
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            TokenKind::LBracket => self.parse_list_literal(tok.position),
            TokenKind::LBrace => self.parse_dict_literal(tok.position),
            TokenKind::Fn => self.parse_function_literal(tok.position),
            TokenKind::DunderImport => Err(ParseError::new(
                "'__import__' is reserved; call the 'import' builtin instead",
                tok.position,
            )),
            _ => Err(ParseError::new(format!("unexpected token '{}'", tok.text), tok.position)),
        }
    }

    fn parse_list_literal(&mut self, position: Position) -> ParseResult<Expr> {
        let mut elements = Vec::new();
        self.skip_newlines()?;
        if !self.at(TokenKind::RBracket)? {
            loop {
                elements.push(self.parse_expr()?);
                self.skip_newlines()?;
                if self.at(TokenKind::Comma)? {
                    self.advance()?;
                    self.skip_newlines()?;
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RBracket, "']'")?;
        Ok(Expr::List(elements, position))
    }

    fn parse_dict_literal(&mut self, position: Position) -> ParseResult<Expr> {
        let mut entries = Vec::new();
        self.skip_newlines()?;
        if !self.at(TokenKind::RBrace)? {
            loop {
                let key = self.expect(TokenKind::Ident, "dict key")?;
                self.expect(TokenKind::Colon, "':'")?;
                let value = self.parse_expr()?;
                entries.push((key.text, value));
                self.skip_newlines()?;
                if self.at(TokenKind::Comma)? {
                    self.advance()?;
                    self.skip_newlines()?;
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(Expr::Dict(entries, position))
    }

    fn parse_function_literal(&mut self, position: Position) -> ParseResult<Expr> {
        let params = self.parse_params()?;
        let body = self.parse_block()?;
        Ok(Expr::FunctionLit { params, body, position })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Stmt {
        Parser::new("t.qk", src.as_bytes()).parse().expect("parse")
    }

    #[test]
    fn parses_quicksort_shaped_program() {
        let chunk = parse(
            "fn swap(list, i, j) {\n\
                 t = list[i]\n\
                 list[i] = list[j]\n\
                 list[j] = t\n\
             }\n",
        );
        assert!(matches!(chunk, Stmt::Chunk(_)));
    }

    #[test]
    fn multi_assign_parses_as_assign() {
        let chunk = parse("a,b=1,2\n");
        let Stmt::Chunk(stmts) = chunk else { panic!() };
        assert!(matches!(stmts[0], Stmt::Assign { .. }));
    }

    #[test]
    fn ternary_is_right_associative_and_lowest_precedence() {
        let chunk = parse("x = a ? b : c ? d : e\n");
        let Stmt::Chunk(stmts) = chunk else { panic!() };
        let Stmt::Assign { values, .. } = &stmts[0] else { panic!() };
        assert!(matches!(values[0], Expr::Ternary { .. }));
    }

    #[test]
    fn for_with_three_clauses() {
        let chunk = parse("for i=0;i<5;i=i+1 { print(i) }\n");
        let Stmt::Chunk(stmts) = chunk else { panic!() };
        assert!(matches!(stmts[0], Stmt::For { .. }));
    }

    #[test]
    fn invalid_assignment_target_is_a_parse_error() {
        let mut parser = Parser::new("t.qk", b"1 = 2\n");
        assert!(parser.parse().is_err());
    }

    #[test]
    fn class_keyword_is_recognized_but_rejected() {
        let mut parser = Parser::new("t.qk", b"class Foo {}\n");
        assert!(parser.parse().is_err());
    }
}
