use crate::expression::lexer::{tokenize, Token, TokenKind};
use crate::expression::ExpressionError;
use serde_json::Value;

const MAX_NESTING: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    In,
    NotIn,
    Is,
    IsNot,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
            CompareOp::In => "in",
            CompareOp::NotIn => "not in",
            CompareOp::Is => "is",
            CompareOp::IsNot => "is not",
        }
    }
}

/// Parsed expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Name(String),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Attribute(Box<Expr>, String),
    Subscript(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Compare(Box<Expr>, Vec<(CompareOp, Expr)>),
    Conditional {
        body: Box<Expr>,
        test: Box<Expr>,
        orelse: Box<Expr>,
    },
    /// `element for target in iter [if condition]`, evaluated to a list
    Comprehension {
        element: Box<Expr>,
        target: String,
        iter: Box<Expr>,
        condition: Option<Box<Expr>>,
    },
}

pub fn parse(source: &str) -> Result<Expr, ExpressionError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.expression()?;
    match parser.peek() {
        TokenKind::Eof => Ok(expr),
        _ => Err(parser.unexpected()),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].kind
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)].kind
    }

    fn position(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len() - 1)].position
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        kind
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), TokenKind::Ident(name) if name == keyword)
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.is_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<(), ExpressionError> {
        if self.eat(&kind) {
            Ok(())
        } else {
            Err(ExpressionError::syntax(
                format!("expected {what}"),
                self.position(),
            ))
        }
    }

    fn unexpected(&self) -> ExpressionError {
        let message = match self.peek() {
            TokenKind::Eof => "unexpected end of expression".to_string(),
            TokenKind::Ident(name) => format!("invalid syntax near '{name}'"),
            other => format!("invalid syntax near {other:?}"),
        };
        ExpressionError::syntax(message, self.position())
    }

    fn enter(&mut self) -> Result<(), ExpressionError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(ExpressionError::syntax(
                "expression is nested too deeply",
                self.position(),
            ));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn leave_levels(&mut self, levels: usize) {
        self.depth -= levels;
    }

    /// conditional: or_expr ['if' or_expr 'else' expression]
    fn expression(&mut self) -> Result<Expr, ExpressionError> {
        self.enter()?;
        let body = self.or_expr()?;
        let expr = if self.is_keyword("if") && !self.in_comprehension_filter() {
            self.advance();
            let test = self.or_expr()?;
            if !self.eat_keyword("else") {
                return Err(ExpressionError::syntax("expected 'else'", self.position()));
            }
            let orelse = self.expression()?;
            Expr::Conditional {
                body: Box::new(body),
                test: Box::new(test),
                orelse: Box::new(orelse),
            }
        } else {
            body
        };
        self.leave();
        Ok(expr)
    }

    // A trailing `if` without a matching `else` belongs to an enclosing comprehension
    fn in_comprehension_filter(&self) -> bool {
        let mut depth = 0usize;
        for token in &self.tokens[self.pos..] {
            match &token.kind {
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    if depth == 0 {
                        return true;
                    }
                    depth -= 1;
                }
                TokenKind::Comma if depth == 0 => return true,
                TokenKind::Ident(name) if depth == 0 && name == "else" => return false,
                TokenKind::Ident(name) if depth == 0 && name == "for" => return true,
                TokenKind::Eof => return true,
                _ => {}
            }
        }
        true
    }

    fn or_expr(&mut self) -> Result<Expr, ExpressionError> {
        let first = self.and_expr()?;
        if !self.is_keyword("or") {
            return Ok(first);
        }
        let mut operands = vec![first];
        while self.eat_keyword("or") {
            operands.push(self.and_expr()?);
        }
        Ok(Expr::Or(operands))
    }

    fn and_expr(&mut self) -> Result<Expr, ExpressionError> {
        let first = self.not_expr()?;
        if !self.is_keyword("and") {
            return Ok(first);
        }
        let mut operands = vec![first];
        while self.eat_keyword("and") {
            operands.push(self.not_expr()?);
        }
        Ok(Expr::And(operands))
    }

    fn not_expr(&mut self) -> Result<Expr, ExpressionError> {
        if self.eat_keyword("not") {
            self.enter()?;
            let operand = self.not_expr()?;
            self.leave();
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)));
        }
        self.comparison()
    }

    fn compare_op(&mut self) -> Option<CompareOp> {
        let followed_by =
            |keyword: &str| matches!(self.peek_at(1), TokenKind::Ident(next) if next == keyword);

        let (op, width) = match self.peek() {
            TokenKind::Eq => (CompareOp::Eq, 1),
            TokenKind::NotEq => (CompareOp::NotEq, 1),
            TokenKind::Lt => (CompareOp::Lt, 1),
            TokenKind::LtEq => (CompareOp::LtEq, 1),
            TokenKind::Gt => (CompareOp::Gt, 1),
            TokenKind::GtEq => (CompareOp::GtEq, 1),
            TokenKind::Ident(name) if name == "in" => (CompareOp::In, 1),
            TokenKind::Ident(name) if name == "is" && followed_by("not") => (CompareOp::IsNot, 2),
            TokenKind::Ident(name) if name == "is" => (CompareOp::Is, 1),
            TokenKind::Ident(name) if name == "not" && followed_by("in") => (CompareOp::NotIn, 2),
            _ => return None,
        };
        for _ in 0..width {
            self.advance();
        }
        Some(op)
    }

    fn comparison(&mut self) -> Result<Expr, ExpressionError> {
        let left = self.additive()?;
        let mut rest = Vec::new();
        while let Some(op) = self.compare_op() {
            rest.push((op, self.additive()?));
        }
        if rest.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare(Box::new(left), rest))
        }
    }

    // every operator in a left-deep chain adds one level to the tree
    fn additive(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.multiplicative()?;
        let mut levels = 0;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            self.enter()?;
            levels += 1;
            let right = self.multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        self.leave_levels(levels);
        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.unary()?;
        let mut levels = 0;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::DoubleSlash => BinaryOp::FloorDiv,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            self.enter()?;
            levels += 1;
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        self.leave_levels(levels);
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ExpressionError> {
        let op = match self.peek() {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => UnaryOp::Pos,
            _ => return self.postfix(),
        };
        self.advance();
        self.enter()?;
        let operand = self.unary()?;
        self.leave();
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    fn postfix(&mut self) -> Result<Expr, ExpressionError> {
        let mut expr = self.atom()?;
        let mut levels = 0;
        loop {
            if !matches!(
                self.peek(),
                TokenKind::Dot | TokenKind::LBracket | TokenKind::LParen
            ) {
                break;
            }
            self.enter()?;
            levels += 1;
            match self.peek() {
                TokenKind::Dot => {
                    self.advance();
                    match self.advance() {
                        TokenKind::Ident(name) => expr = Expr::Attribute(Box::new(expr), name),
                        _ => {
                            return Err(ExpressionError::syntax(
                                "expected attribute name",
                                self.position(),
                            ))
                        }
                    }
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.expression()?;
                    self.expect(TokenKind::RBracket, "']'")?;
                    expr = Expr::Subscript(Box::new(expr), Box::new(index));
                }
                TokenKind::LParen => {
                    self.advance();
                    let args = self.call_arguments()?;
                    expr = Expr::Call(Box::new(expr), args);
                }
                _ => break,
            }
        }
        self.leave_levels(levels);
        Ok(expr)
    }

    fn call_arguments(&mut self) -> Result<Vec<Expr>, ExpressionError> {
        let mut args = Vec::new();
        if self.eat(&TokenKind::RParen) {
            return Ok(args);
        }
        let first = self.expression()?;
        if self.is_keyword("for") {
            args.push(self.comprehension(first)?);
            self.expect(TokenKind::RParen, "')'")?;
            return Ok(args);
        }
        args.push(first);
        while self.eat(&TokenKind::Comma) {
            if matches!(self.peek(), TokenKind::RParen) {
                break;
            }
            args.push(self.expression()?);
        }
        self.expect(TokenKind::RParen, "')'")?;
        Ok(args)
    }

    fn comprehension(&mut self, element: Expr) -> Result<Expr, ExpressionError> {
        self.advance();
        let target = match self.advance() {
            TokenKind::Ident(name) if !is_reserved(&name) => name,
            _ => {
                return Err(ExpressionError::syntax(
                    "expected loop variable",
                    self.position(),
                ))
            }
        };
        if !self.eat_keyword("in") {
            return Err(ExpressionError::syntax("expected 'in'", self.position()));
        }
        let iter = self.or_expr()?;
        let condition = if self.eat_keyword("if") {
            Some(Box::new(self.or_expr()?))
        } else {
            None
        };
        Ok(Expr::Comprehension {
            element: Box::new(element),
            target,
            iter: Box::new(iter),
            condition,
        })
    }

    fn atom(&mut self) -> Result<Expr, ExpressionError> {
        let position = self.position();
        match self.advance() {
            TokenKind::Int(i) => Ok(Expr::Literal(Value::from(i))),
            TokenKind::Float(f) => Ok(Expr::Literal(Value::from(f))),
            TokenKind::Str(s) => {
                let mut s = s;
                // adjacent string literals concatenate
                while let TokenKind::Str(next) = self.peek() {
                    s.push_str(next);
                    self.advance();
                }
                Ok(Expr::Literal(Value::String(s)))
            }
            TokenKind::Ident(name) => match name.as_str() {
                "True" | "true" => Ok(Expr::Literal(Value::Bool(true))),
                "False" | "false" => Ok(Expr::Literal(Value::Bool(false))),
                "None" | "null" => Ok(Expr::Literal(Value::Null)),
                reserved if is_reserved(reserved) => Err(ExpressionError::syntax(
                    format!("invalid syntax near '{reserved}'"),
                    position,
                )),
                _ => Ok(Expr::Name(name)),
            },
            TokenKind::LParen => {
                self.enter()?;
                let expr = self.expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                self.leave();
                Ok(expr)
            }
            TokenKind::LBracket => {
                self.enter()?;
                let expr = self.list_display()?;
                self.leave();
                Ok(expr)
            }
            TokenKind::LBrace => {
                self.enter()?;
                let expr = self.dict_display()?;
                self.leave();
                Ok(expr)
            }
            TokenKind::Eof => Err(ExpressionError::syntax(
                "unexpected end of expression",
                position,
            )),
            other => Err(ExpressionError::syntax(
                format!("invalid syntax near {other:?}"),
                position,
            )),
        }
    }

    fn list_display(&mut self) -> Result<Expr, ExpressionError> {
        if self.eat(&TokenKind::RBracket) {
            return Ok(Expr::List(Vec::new()));
        }
        let first = self.expression()?;
        if self.is_keyword("for") {
            let comprehension = self.comprehension(first)?;
            self.expect(TokenKind::RBracket, "']'")?;
            return Ok(comprehension);
        }
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if matches!(self.peek(), TokenKind::RBracket) {
                break;
            }
            items.push(self.expression()?);
        }
        self.expect(TokenKind::RBracket, "']'")?;
        Ok(Expr::List(items))
    }

    fn dict_display(&mut self) -> Result<Expr, ExpressionError> {
        let mut entries = Vec::new();
        if self.eat(&TokenKind::RBrace) {
            return Ok(Expr::Dict(entries));
        }
        loop {
            let key = self.expression()?;
            self.expect(TokenKind::Colon, "':'")?;
            let value = self.expression()?;
            entries.push((key, value));
            if !self.eat(&TokenKind::Comma) || matches!(self.peek(), TokenKind::RBrace) {
                break;
            }
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(Expr::Dict(entries))
    }
}

fn is_reserved(name: &str) -> bool {
    matches!(
        name,
        "and" | "or" | "not" | "in" | "is" | "if" | "else" | "for" | "lambda" | "import"
    )
}
