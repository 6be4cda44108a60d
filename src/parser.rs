pub mod ast;

use anyhow::{Result, anyhow, bail};

use crate::lexer::{Span, Token, TokenKind};
use ast::{
    AssignOp, BinaryOp, Block, BlockExpr, Expression, FuncDecl, MemberInit, Module, Statement,
    TypeExpr, TypedName, UnaryOp, UseBinding,
};

/// Right binding power of the unary prefix operators.
const UNARY_BP: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delim {
    Paren,
    Bracket,
    Brace,
}

pub struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
    /// Open parentheses and square brackets, plus the curly braces of struct
    /// definitions, struct literals, and use lists. Generic blocks are not
    /// pushed here: inside any open entry an end-of-line is plain whitespace.
    open_delims: Vec<Delim>,
    /// Set while parsing the braceless then branch of an if statement, where
    /// `else` terminates the statement.
    in_then_branch: bool,
}

/// Token kinds that may end a statement, for semicolon inference.
fn may_end_statement(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Number(_)
            | TokenKind::Str(_)
            | TokenKind::Identifier(_)
            | TokenKind::Underscore
            | TokenKind::Comma
            | TokenKind::RBracket
            | TokenKind::RBrace
            | TokenKind::RParen
            | TokenKind::Else
            | TokenKind::False
            | TokenKind::Return
            | TokenKind::Then
            | TokenKind::True
    )
}

/// Token kinds that may begin a statement, for semicolon inference.
fn may_begin_statement(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Eof
            | TokenKind::Number(_)
            | TokenKind::Str(_)
            | TokenKind::Identifier(_)
            | TokenKind::Underscore
            | TokenKind::Semicolon
            | TokenKind::LBrace
            | TokenKind::RBrace
            | TokenKind::LParen
            | TokenKind::False
            | TokenKind::For
            | TokenKind::Func
            | TokenKind::If
            | TokenKind::Else
            | TokenKind::Let
            | TokenKind::Return
            | TokenKind::Struct
            | TokenKind::True
            | TokenKind::Use
    )
}

fn tail_power(kind: TokenKind) -> Result<(u8, u8)> {
    Ok(match kind {
        TokenKind::Eof
        | TokenKind::Semicolon
        | TokenKind::RParen
        | TokenKind::Comma
        | TokenKind::RBrace
        | TokenKind::RBracket
        | TokenKind::Then
        | TokenKind::Else => (0, 0),
        TokenKind::Equals | TokenKind::PlusEq | TokenKind::MinusEq | TokenKind::ColonEquals => {
            (1, 2)
        }
        TokenKind::Or | TokenKind::And => (4, 3),
        TokenKind::EqEq | TokenKind::NotEq => (5, 6),
        TokenKind::Less | TokenKind::LessEq | TokenKind::Greater | TokenKind::GreaterEq => (8, 7),
        TokenKind::Plus | TokenKind::Minus => (10, 9),
        TokenKind::Star | TokenKind::Slash | TokenKind::Percent => (12, 11),
        TokenKind::LBrace => (13, 0),
        TokenKind::LParen | TokenKind::LBracket => (14, 0),
        TokenKind::Dot => (16, 15),
        _ => bail!("Cannot determine binding power for {kind} as a tail token"),
    })
}

impl<'a> Parser<'a> {
    pub fn new(mut tokens: Vec<Token<'a>>) -> Self {
        if tokens.last().map(|token| token.kind) != Some(TokenKind::Eof) {
            tokens.push(Token::new(TokenKind::Eof, Span::default()));
        }
        Self {
            tokens,
            pos: 0,
            open_delims: Vec::new(),
            in_then_branch: false,
        }
    }

    pub fn parse_module(&mut self) -> Result<Module> {
        let mut statements = Vec::new();
        while self.peek().kind != TokenKind::Eof {
            statements.push(self.parse_stmt()?);
        }
        Ok(Module { statements })
    }

    /// Returns the current token with layout already resolved: any
    /// end-of-line at the cursor has been rewritten to a semicolon or
    /// deleted before this returns.
    fn peek(&mut self) -> Token<'a> {
        loop {
            let Some(token) = self.tokens.get(self.pos) else {
                return Token::new(TokenKind::Eof, Span::default());
            };
            if token.kind != TokenKind::Eol {
                return token.clone();
            }
            self.resolve_eol();
        }
    }

    /// Semicolon inference. An end-of-line becomes a semicolon when no
    /// parenthesis, square bracket, or struct-style brace is open, the
    /// previous token may end a statement, and the next may begin one.
    /// Anything else deletes it as whitespace.
    fn resolve_eol(&mut self) {
        let span = self.tokens[self.pos].span;
        let next_kind = self
            .tokens
            .get(self.pos + 1)
            .map(|token| token.kind)
            .unwrap_or(TokenKind::Eof);

        // Never promote directly before a closing brace: the final
        // expression of a block keeps the block's value unless the user
        // writes the semicolon out.
        if next_kind == TokenKind::RBrace {
            self.tokens.remove(self.pos);
            return;
        }

        let after_end = self.pos > 0 && may_end_statement(self.tokens[self.pos - 1].kind);
        let promote = self.open_delims.is_empty()
            && after_end
            && may_begin_statement(next_kind)
            && next_kind != TokenKind::Eof;
        if promote {
            self.tokens[self.pos] = Token::new(TokenKind::Semicolon, span);
        } else {
            self.tokens.remove(self.pos);
        }
    }

    fn advance(&mut self) -> Token<'a> {
        let token = self.peek();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        match token.kind {
            TokenKind::LParen => self.open_delims.push(Delim::Paren),
            TokenKind::LBracket => self.open_delims.push(Delim::Bracket),
            TokenKind::RParen => {
                if self.open_delims.last() == Some(&Delim::Paren) {
                    self.open_delims.pop();
                }
            }
            TokenKind::RBracket => {
                if self.open_delims.last() == Some(&Delim::Bracket) {
                    self.open_delims.pop();
                }
            }
            _ => {}
        }
        token
    }

    fn expect(&mut self, expected: TokenKind<'a>) -> Result<Token<'a>> {
        let token = self.peek();
        if token.kind == expected {
            Ok(self.advance())
        } else {
            Err(anyhow!(
                "Expected {expected}, found {} at offset {}",
                token.kind,
                token.span.start
            ))
        }
    }

    fn expect_identifier(&mut self) -> Result<String> {
        let token = self.peek();
        if let TokenKind::Identifier(name) = token.kind {
            self.advance();
            Ok(name.to_string())
        } else {
            Err(anyhow!(
                "Expected an identifier, found {} at offset {}",
                token.kind,
                token.span.start
            ))
        }
    }

    /// Consumes a statement terminator. A semicolon is consumed and reported
    /// as explicit; end of file and a closing brace terminate without being
    /// consumed, as does `else` inside a braceless then branch.
    fn consume_terminator(&mut self) -> Result<bool> {
        let token = self.peek();
        match token.kind {
            TokenKind::Semicolon => {
                self.advance();
                Ok(true)
            }
            TokenKind::Eof | TokenKind::RBrace => Ok(false),
            TokenKind::Else if self.in_then_branch => Ok(false),
            _ => Err(anyhow!(
                "Expected a statement terminator, found {} at offset {}",
                token.kind,
                token.span.start
            )),
        }
    }

    /// Eats the semicolon that layout promotion leaves behind a closing
    /// brace, if there is one.
    fn eat_semicolon(&mut self) {
        if self.peek().kind == TokenKind::Semicolon {
            self.advance();
        }
    }

    fn parse_stmt(&mut self) -> Result<Statement> {
        match self.peek().kind {
            TokenKind::Let => self.parse_var_decl(),
            TokenKind::Struct => self.parse_struct_decl(),
            TokenKind::Func => self.parse_func_decl(),
            TokenKind::For => self.parse_for_stmt(),
            TokenKind::If => self.parse_if_stmt(),
            TokenKind::Return => self.parse_return_stmt(),
            TokenKind::Use => self.parse_use_decl(),
            _ => self.parse_expr_stmt(),
        }
    }

    fn parse_var_decl(&mut self) -> Result<Statement> {
        self.expect(TokenKind::Let)?;
        let name = self.expect_identifier()?;
        self.expect(TokenKind::Colon)?;
        let ty = self.parse_type()?;
        let init = if self.peek().kind == TokenKind::Equals {
            self.advance();
            Some(self.parse_expr(0)?)
        } else {
            None
        };
        self.consume_terminator()?;
        Ok(Statement::VarDecl { name, ty, init })
    }

    fn parse_struct_decl(&mut self) -> Result<Statement> {
        self.expect(TokenKind::Struct)?;
        let name = self.expect_identifier()?;
        self.expect(TokenKind::LBrace)?;
        self.open_delims.push(Delim::Brace);
        let mut members = Vec::new();
        while self.peek().kind != TokenKind::RBrace {
            let member_name = self.expect_identifier()?;
            self.expect(TokenKind::Colon)?;
            let member_ty = self.parse_type()?;
            self.expect(TokenKind::Comma)?;
            members.push(TypedName {
                name: member_name,
                ty: member_ty,
            });
        }
        self.open_delims.pop();
        self.expect(TokenKind::RBrace)?;
        self.eat_semicolon();
        Ok(Statement::StructDecl { name, members })
    }

    fn parse_func_decl(&mut self) -> Result<Statement> {
        self.expect(TokenKind::Func)?;
        let name = self.expect_identifier()?;
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        while self.peek().kind != TokenKind::RParen {
            let param_name = self.expect_identifier()?;
            self.expect(TokenKind::Colon)?;
            let param_ty = self.parse_type()?;
            params.push(TypedName {
                name: param_name,
                ty: param_ty,
            });
            if self.peek().kind == TokenKind::Comma {
                self.advance();
            }
        }
        self.expect(TokenKind::RParen)?;
        let ret = if self.peek().kind == TokenKind::Colon {
            self.advance();
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(TokenKind::LBrace)?;
        let body = self.parse_block()?;
        self.expect(TokenKind::RBrace)?;
        self.eat_semicolon();
        Ok(Statement::FuncDecl(FuncDecl {
            name,
            params,
            ret,
            body,
        }))
    }

    fn parse_if_stmt(&mut self) -> Result<Statement> {
        self.expect(TokenKind::If)?;
        let cond = self.parse_expr(0)?;
        self.expect(TokenKind::Then)?;
        let then_branch = Box::new(self.parse_then_stmt()?);
        // Layout promotion between a braced branch and `else` leaves a
        // semicolon behind; it also serves as this statement's terminator
        // when no else follows.
        self.eat_semicolon();
        let else_branch = if self.peek().kind == TokenKind::Else {
            self.advance();
            let stmt = self.parse_else_stmt()?;
            self.eat_semicolon();
            Some(Box::new(stmt))
        } else {
            None
        };
        Ok(Statement::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    fn parse_then_stmt(&mut self) -> Result<Statement> {
        if self.peek().kind == TokenKind::LBrace {
            return self.parse_braced_stmt();
        }
        let saved = self.in_then_branch;
        self.in_then_branch = true;
        let result = self.parse_stmt();
        self.in_then_branch = saved;
        result
    }

    fn parse_else_stmt(&mut self) -> Result<Statement> {
        if self.peek().kind == TokenKind::LBrace {
            return self.parse_braced_stmt();
        }
        self.parse_stmt()
    }

    fn parse_braced_stmt(&mut self) -> Result<Statement> {
        self.expect(TokenKind::LBrace)?;
        let block = self.parse_block()?;
        self.expect(TokenKind::RBrace)?;
        Ok(Statement::Block(block))
    }

    fn parse_for_stmt(&mut self) -> Result<Statement> {
        self.expect(TokenKind::For)?;
        self.expect(TokenKind::LParen)?;
        let init = Box::new(self.parse_stmt()?);
        let cond = self.parse_expr(0)?;
        self.expect(TokenKind::Semicolon)?;
        let iter = self.parse_expr(0)?;
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::LBrace)?;
        let body = self.parse_block()?;
        self.expect(TokenKind::RBrace)?;
        self.eat_semicolon();
        Ok(Statement::For {
            init,
            cond,
            iter,
            body,
        })
    }

    fn parse_return_stmt(&mut self) -> Result<Statement> {
        self.expect(TokenKind::Return)?;
        let terminated = match self.peek().kind {
            TokenKind::Semicolon | TokenKind::Eof | TokenKind::RBrace => true,
            TokenKind::Else => self.in_then_branch,
            _ => false,
        };
        if terminated {
            self.consume_terminator()?;
            return Ok(Statement::Return(None));
        }
        let expr = self.parse_expr(0)?;
        self.consume_terminator()?;
        Ok(Statement::Return(Some(expr)))
    }

    fn parse_use_decl(&mut self) -> Result<Statement> {
        self.expect(TokenKind::Use)?;
        self.expect(TokenKind::LBrace)?;
        self.open_delims.push(Delim::Brace);
        let mut bindings = Vec::new();
        while self.peek().kind != TokenKind::RBrace {
            let alias = self.expect_identifier()?;
            self.expect(TokenKind::Colon)?;
            let module = self.expect_identifier()?;
            self.expect(TokenKind::Comma)?;
            bindings.push(UseBinding { alias, module });
        }
        self.open_delims.pop();
        self.expect(TokenKind::RBrace)?;
        self.eat_semicolon();
        Ok(Statement::Use { bindings })
    }

    fn parse_expr_stmt(&mut self) -> Result<Statement> {
        let expr = self.parse_expr(0)?;
        let has_semicolon = self.consume_terminator()?;
        Ok(Statement::Expr {
            expr,
            has_semicolon,
        })
    }

    /// Collects statements up to a closing brace or end of file. The caller
    /// consumes the closing brace.
    fn parse_block(&mut self) -> Result<Block> {
        let mut statements = Vec::new();
        loop {
            match self.peek().kind {
                TokenKind::RBrace | TokenKind::Eof => break,
                _ => statements.push(self.parse_stmt()?),
            }
        }
        Ok(Block { statements })
    }

    /// Builds a block expression from a block whose opening brace has been
    /// consumed. A final expression-statement without an explicit semicolon
    /// becomes the block's value; otherwise the block evaluates to unit.
    fn parse_block_expr(&mut self) -> Result<Expression> {
        let mut block = self.parse_block()?;
        self.expect(TokenKind::RBrace)?;
        let result = match block.statements.last() {
            Some(Statement::Expr {
                has_semicolon: false,
                ..
            }) => {
                let Some(Statement::Expr { expr, .. }) = block.statements.pop() else {
                    unreachable!()
                };
                Box::new(expr)
            }
            _ => Box::new(Expression::Unit),
        };
        Ok(Expression::Block(BlockExpr {
            statements: block.statements,
            result,
        }))
    }

    fn parse_expr(&mut self, min_bp: u8) -> Result<Expression> {
        let token = self.advance();
        let mut lhs = self.parse_head_expr(token)?;
        loop {
            let (lbp, rbp) = tail_power(self.peek().kind)?;
            if lbp <= min_bp {
                break;
            }
            lhs = self.parse_tail_expr(lhs, rbp)?;
        }
        Ok(lhs)
    }

    fn parse_head_expr(&mut self, token: Token<'a>) -> Result<Expression> {
        match token.kind {
            TokenKind::Number(lexeme) => Ok(Expression::Number(lexeme.to_string())),
            TokenKind::Str(value) => Ok(Expression::Str(value.to_string())),
            TokenKind::Identifier(name) => Ok(Expression::Identifier(name.to_string())),
            TokenKind::True => Ok(Expression::Bool(true)),
            TokenKind::False => Ok(Expression::Bool(false)),
            TokenKind::Plus => self.parse_unary(UnaryOp::Plus),
            TokenKind::Minus => self.parse_unary(UnaryOp::Minus),
            TokenKind::Not => self.parse_unary(UnaryOp::Not),
            TokenKind::LParen => {
                let inner = self.parse_expr(0)?;
                self.expect(TokenKind::RParen)?;
                Ok(Expression::Group(Box::new(inner)))
            }
            TokenKind::If => self.parse_if_expr(),
            TokenKind::LBrace => self.parse_block_expr(),
            _ => Err(anyhow!(
                "Failed to parse a head expression from {} at offset {}",
                token.kind,
                token.span.start
            )),
        }
    }

    fn parse_unary(&mut self, op: UnaryOp) -> Result<Expression> {
        let rhs = self.parse_expr(UNARY_BP)?;
        Ok(Expression::Unary {
            op,
            rhs: Box::new(rhs),
        })
    }

    fn parse_if_expr(&mut self) -> Result<Expression> {
        let cond = self.parse_expr(0)?;
        self.expect(TokenKind::Then)?;
        let then_branch = self.parse_branch_expr()?;
        // A layout semicolon may sit between a braced branch and `else`.
        self.eat_semicolon();
        self.expect(TokenKind::Else)?;
        let else_branch = self.parse_branch_expr()?;
        Ok(Expression::If {
            cond: Box::new(cond),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        })
    }

    fn parse_branch_expr(&mut self) -> Result<Expression> {
        if self.peek().kind == TokenKind::LBrace {
            self.advance();
            self.parse_block_expr()
        } else {
            self.parse_expr(0)
        }
    }

    fn parse_tail_expr(&mut self, head: Expression, rbp: u8) -> Result<Expression> {
        let token = self.advance();
        match token.kind {
            TokenKind::Equals => self.parse_assign(head, AssignOp::Assign, rbp),
            TokenKind::PlusEq => self.parse_assign(head, AssignOp::AddAssign, rbp),
            TokenKind::MinusEq => self.parse_assign(head, AssignOp::SubAssign, rbp),
            TokenKind::ColonEquals => {
                let Expression::Identifier(name) = head else {
                    bail!(
                        "The left-hand side of ':=' must be an identifier (at offset {})",
                        token.span.start
                    );
                };
                let value = self.parse_expr(rbp)?;
                Ok(Expression::DeclAssign {
                    name,
                    value: Box::new(value),
                })
            }
            TokenKind::Plus => self.parse_binary(head, BinaryOp::Add, rbp),
            TokenKind::Minus => self.parse_binary(head, BinaryOp::Sub, rbp),
            TokenKind::Star => self.parse_binary(head, BinaryOp::Mul, rbp),
            TokenKind::Slash => self.parse_binary(head, BinaryOp::Div, rbp),
            TokenKind::Percent => self.parse_binary(head, BinaryOp::Rem, rbp),
            TokenKind::EqEq => self.parse_binary(head, BinaryOp::Eq, rbp),
            TokenKind::NotEq => self.parse_binary(head, BinaryOp::Ne, rbp),
            TokenKind::Less => self.parse_binary(head, BinaryOp::Lt, rbp),
            TokenKind::LessEq => self.parse_binary(head, BinaryOp::Le, rbp),
            TokenKind::Greater => self.parse_binary(head, BinaryOp::Gt, rbp),
            TokenKind::GreaterEq => self.parse_binary(head, BinaryOp::Ge, rbp),
            TokenKind::Or => self.parse_binary(head, BinaryOp::Or, rbp),
            TokenKind::And => self.parse_binary(head, BinaryOp::And, rbp),
            TokenKind::LParen => self.parse_call(head),
            TokenKind::LBrace => self.parse_struct_literal(head),
            TokenKind::LBracket => {
                let index = self.parse_expr(0)?;
                self.expect(TokenKind::RBracket)?;
                Ok(Expression::Index {
                    array: Box::new(head),
                    index: Box::new(index),
                })
            }
            TokenKind::Dot => {
                let name = self.expect_identifier()?;
                Ok(Expression::Member {
                    object: Box::new(head),
                    name,
                })
            }
            _ => Err(anyhow!(
                "Failed to parse a tail expression from {} at offset {}",
                token.kind,
                token.span.start
            )),
        }
    }

    fn parse_assign(&mut self, target: Expression, op: AssignOp, rbp: u8) -> Result<Expression> {
        let value = self.parse_expr(rbp)?;
        Ok(Expression::Assign {
            target: Box::new(target),
            op,
            value: Box::new(value),
        })
    }

    fn parse_binary(&mut self, lhs: Expression, op: BinaryOp, rbp: u8) -> Result<Expression> {
        let rhs = self.parse_expr(rbp)?;
        Ok(Expression::Binary {
            lhs: Box::new(lhs),
            op,
            rhs: Box::new(rhs),
        })
    }

    /// Call arguments; the opening parenthesis has been consumed. A trailing
    /// comma is permitted.
    fn parse_call(&mut self, callee: Expression) -> Result<Expression> {
        let mut args = Vec::new();
        while self.peek().kind != TokenKind::RParen {
            args.push(self.parse_expr(0)?);
            if self.peek().kind == TokenKind::Comma {
                self.advance();
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(Expression::Call {
            callee: Box::new(callee),
            args,
        })
    }

    /// Struct literal members; the opening brace has been consumed. The
    /// trailing comma is mandatory.
    fn parse_struct_literal(&mut self, ty: Expression) -> Result<Expression> {
        self.open_delims.push(Delim::Brace);
        let mut members = Vec::new();
        while self.peek().kind != TokenKind::RBrace {
            let name = self.expect_identifier()?;
            self.expect(TokenKind::Colon)?;
            let value = self.parse_expr(0)?;
            self.expect(TokenKind::Comma)?;
            members.push(MemberInit { name, value });
        }
        self.open_delims.pop();
        self.expect(TokenKind::RBrace)?;
        Ok(Expression::StructLiteral {
            ty: Box::new(ty),
            members,
        })
    }

    fn parse_type(&mut self) -> Result<TypeExpr> {
        match self.peek().kind {
            TokenKind::Func => self.parse_func_type(),
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_type()?;
                self.expect(TokenKind::RParen)?;
                self.parse_array_suffix(inner)
            }
            TokenKind::Identifier(_) => {
                let name = self.expect_identifier()?;
                self.parse_array_suffix(TypeExpr::Named(name))
            }
            kind => Err(anyhow!(
                "Expected a type, found {kind} at offset {}",
                self.peek().span.start
            )),
        }
    }

    fn parse_array_suffix(&mut self, mut ty: TypeExpr) -> Result<TypeExpr> {
        while self.peek().kind == TokenKind::LBracket {
            self.advance();
            self.expect(TokenKind::RBracket)?;
            ty = TypeExpr::Array(Box::new(ty));
        }
        Ok(ty)
    }

    /// Function type syntax `func(T1, T2): R`. Parameter names may be
    /// written and are discarded; an omitted return clause means unit.
    fn parse_func_type(&mut self) -> Result<TypeExpr> {
        self.expect(TokenKind::Func)?;
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        while self.peek().kind != TokenKind::RParen {
            if let TokenKind::Identifier(_) = self.peek().kind {
                let name = self.expect_identifier()?;
                if self.peek().kind == TokenKind::Colon {
                    self.advance();
                    params.push(self.parse_type()?);
                } else {
                    params.push(self.parse_array_suffix(TypeExpr::Named(name))?);
                }
            } else {
                params.push(self.parse_type()?);
            }
            if self.peek().kind == TokenKind::Comma {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        let ret = if self.peek().kind == TokenKind::Colon {
            self.advance();
            Some(Box::new(self.parse_type()?))
        } else {
            None
        };
        Ok(TypeExpr::Func { params, ret })
    }
}

pub fn parse_tokens(tokens: Vec<Token<'_>>) -> Result<Module> {
    Parser::new(tokens).parse_module()
}
