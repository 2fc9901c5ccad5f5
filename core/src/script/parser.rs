use std::collections::VecDeque;

use crate::interpreter::RuntimeError;
use crate::script::lexer::BinOp;
use crate::script::lexer::Line;
use crate::script::lexer::Token;
use crate::script::lexer::syntax;
use crate::script::lexer::tokenize;

/// Deepest nesting of parentheses, call arguments, unary operators and
/// indented blocks a program may use. Bounds parser, evaluator and drop
/// recursion on the worker's stack.
pub(crate) const MAX_NESTING: usize = 100;

const KEYWORDS: &[&str] = &[
    "and", "else", "False", "if", "None", "not", "or", "pass", "raise", "True", "while",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Expr {
    Int(i64),
    Str(String),
    Bool(bool),
    None,
    Name(String),
    Call { name: String, args: Vec<Expr> },
    Neg(Box<Expr>),
    Not(Box<Expr>),
    /// Left-associative operator chain, folded in order.
    Binary {
        first: Box<Expr>,
        rest: Vec<(BinOp, Expr)>,
    },
    /// Two or more operands, short-circuiting.
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Stmt {
    Pass,
    Expr(Expr),
    Assign {
        target: String,
        value: Expr,
    },
    Raise {
        kind: String,
        message: Option<Expr>,
    },
    If {
        cond: Expr,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
    While {
        cond: Expr,
        body: Vec<Node>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Node {
    pub line: usize,
    pub stmt: Stmt,
}

pub(crate) fn parse_program(source: &str) -> Result<Vec<Node>, RuntimeError> {
    let mut parser = BlockParser {
        lines: tokenize(source)?,
        pos: 0,
        depth: 0,
    };
    parser.block(0)
}

struct BlockParser {
    lines: Vec<Line>,
    pos: usize,
    depth: usize,
}

impl BlockParser {
    fn block(&mut self, indent: usize) -> Result<Vec<Node>, RuntimeError> {
        let mut nodes = Vec::new();
        while let Some(line) = self.lines.get(self.pos) {
            if line.indent < indent {
                break;
            }
            if line.indent > indent {
                return Err(RuntimeError::new("IndentationError", "unexpected indent")
                    .at_line(line.number));
            }
            let number = line.number;
            let tokens = std::mem::take(&mut self.lines[self.pos].tokens);
            self.pos += 1;
            self.statement_line(Cursor::new(tokens), indent, &mut nodes)
                .map_err(|err| err.at_line(number))?;
        }
        Ok(nodes)
    }

    fn statement_line(
        &mut self,
        mut cur: Cursor,
        indent: usize,
        nodes: &mut Vec<Node>,
    ) -> Result<(), RuntimeError> {
        let line = self.current_line_number();
        match cur.peek_name() {
            Some("while") => {
                cur.next();
                let cond = cur.expr()?;
                cur.expect(&Token::Colon, "expected ':'")?;
                let body = self.suite(cur, indent)?;
                nodes.push(Node {
                    line,
                    stmt: Stmt::While { cond, body },
                });
            }
            Some("if") => {
                cur.next();
                let cond = cur.expr()?;
                cur.expect(&Token::Colon, "expected ':'")?;
                let then = self.suite(cur, indent)?;
                let otherwise = self.else_clause(indent)?;
                nodes.push(Node {
                    line,
                    stmt: Stmt::If {
                        cond,
                        then,
                        otherwise,
                    },
                });
            }
            Some("else") => return Err(syntax("'else' without a matching 'if'")),
            _ => {
                for stmt in cur.simple_statements()? {
                    nodes.push(Node { line, stmt });
                }
            }
        }
        Ok(())
    }

    /// Body of a compound statement: the rest of the header line, or the
    /// indented block below it.
    fn suite(&mut self, mut cur: Cursor, indent: usize) -> Result<Vec<Node>, RuntimeError> {
        let line = self.current_line_number();
        if !cur.at_end() {
            return Ok(cur
                .simple_statements()?
                .into_iter()
                .map(|stmt| Node { line, stmt })
                .collect());
        }
        match self.lines.get(self.pos) {
            Some(next) if next.indent > indent => {
                let inner = next.indent;
                if self.depth >= MAX_NESTING {
                    return Err(too_deep("blocks nested too deeply"));
                }
                self.depth += 1;
                let body = self.block(inner);
                self.depth -= 1;
                body
            }
            _ => Err(RuntimeError::new("IndentationError", "expected an indented block")),
        }
    }

    fn else_clause(&mut self, indent: usize) -> Result<Vec<Node>, RuntimeError> {
        let Some(next) = self.lines.get(self.pos) else {
            return Ok(Vec::new());
        };
        let is_else = next.indent == indent
            && matches!(next.tokens.first(), Some(Token::Name(name)) if name == "else");
        if !is_else {
            return Ok(Vec::new());
        }
        let number = next.number;
        let tokens = std::mem::take(&mut self.lines[self.pos].tokens);
        self.pos += 1;
        let mut cur = Cursor::new(tokens);
        cur.next();
        cur.expect(&Token::Colon, "expected ':'")
            .map_err(|err| err.at_line(number))?;
        self.suite(cur, indent).map_err(|err| err.at_line(number))
    }

    /// Number of the line most recently consumed.
    fn current_line_number(&self) -> usize {
        self.pos
            .checked_sub(1)
            .and_then(|idx| self.lines.get(idx))
            .map_or(0, |line| line.number)
    }
}

struct Cursor {
    tokens: VecDeque<Token>,
    depth: usize,
}

impl Cursor {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens: tokens.into(),
            depth: 0,
        }
    }

    /// Runs `parse` one nesting level deeper.
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, RuntimeError>,
    ) -> Result<T, RuntimeError> {
        if self.depth >= MAX_NESTING {
            return Err(too_deep("expression nested too deeply"));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn at_end(&self) -> bool {
        self.tokens.is_empty()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.front()
    }

    fn peek_name(&self) -> Option<&str> {
        match self.tokens.front() {
            Some(Token::Name(name)) => Some(name.as_str()),
            _ => None,
        }
    }

    fn next(&mut self) -> Option<Token> {
        self.tokens.pop_front()
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.tokens.pop_front();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_name() == Some(keyword) {
            self.tokens.pop_front();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token, message: &str) -> Result<(), RuntimeError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(syntax(message))
        }
    }

    fn simple_statements(&mut self) -> Result<Vec<Stmt>, RuntimeError> {
        let mut stmts = Vec::new();
        loop {
            stmts.push(self.simple_statement()?);
            if self.at_end() {
                break;
            }
            self.expect(&Token::Semi, "invalid syntax")?;
            if self.at_end() {
                break;
            }
        }
        Ok(stmts)
    }

    fn simple_statement(&mut self) -> Result<Stmt, RuntimeError> {
        if self.eat_keyword("pass") {
            return Ok(Stmt::Pass);
        }
        if self.eat_keyword("raise") {
            let kind = match self.next() {
                Some(Token::Name(name)) if !is_keyword(&name) => name,
                _ => return Err(syntax("expected an exception name after 'raise'")),
            };
            let mut message = None;
            if self.eat(&Token::LParen) && !self.eat(&Token::RParen) {
                message = Some(self.expr()?);
                self.expect(&Token::RParen, "expected ')'")?;
            }
            return Ok(Stmt::Raise { kind, message });
        }
        if let (Some(Token::Name(name)), Some(Token::Assign)) =
            (self.tokens.front(), self.tokens.get(1))
        {
            if is_keyword(name) {
                return Err(syntax(format!("cannot assign to {name}")));
            }
            let target = name.clone();
            self.tokens.drain(..2);
            let value = self.expr()?;
            return Ok(Stmt::Assign { target, value });
        }
        Ok(Stmt::Expr(self.expr()?))
    }

    fn expr(&mut self) -> Result<Expr, RuntimeError> {
        let first = self.and_expr()?;
        if self.peek_name() != Some("or") {
            return Ok(first);
        }
        let mut operands = vec![first];
        while self.eat_keyword("or") {
            operands.push(self.and_expr()?);
        }
        Ok(Expr::Or(operands))
    }

    fn and_expr(&mut self) -> Result<Expr, RuntimeError> {
        let first = self.not_expr()?;
        if self.peek_name() != Some("and") {
            return Ok(first);
        }
        let mut operands = vec![first];
        while self.eat_keyword("and") {
            operands.push(self.not_expr()?);
        }
        Ok(Expr::And(operands))
    }

    fn not_expr(&mut self) -> Result<Expr, RuntimeError> {
        if self.eat_keyword("not") {
            let operand = self.nested(Self::not_expr)?;
            return Ok(Expr::Not(Box::new(operand)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, RuntimeError> {
        let first = self.arith()?;
        let mut rest = Vec::new();
        while let Some(Token::Op(op)) = self.peek() {
            let op = *op;
            if !op.is_comparison() {
                break;
            }
            self.next();
            rest.push((op, self.arith()?));
        }
        Ok(chain(first, rest))
    }

    fn arith(&mut self) -> Result<Expr, RuntimeError> {
        let first = self.term()?;
        let mut rest = Vec::new();
        while let Some(Token::Op(op @ (BinOp::Add | BinOp::Sub))) = self.peek() {
            let op = *op;
            self.next();
            rest.push((op, self.term()?));
        }
        Ok(chain(first, rest))
    }

    fn term(&mut self) -> Result<Expr, RuntimeError> {
        let first = self.unary()?;
        let mut rest = Vec::new();
        while let Some(Token::Op(op @ (BinOp::Mul | BinOp::FloorDiv | BinOp::Mod))) = self.peek()
        {
            let op = *op;
            self.next();
            rest.push((op, self.unary()?));
        }
        Ok(chain(first, rest))
    }

    fn unary(&mut self) -> Result<Expr, RuntimeError> {
        if self.eat(&Token::Op(BinOp::Sub)) {
            let operand = self.nested(Self::unary)?;
            return Ok(Expr::Neg(Box::new(operand)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, RuntimeError> {
        match self.next() {
            Some(Token::Int(value)) => Ok(Expr::Int(value)),
            Some(Token::Str(value)) => Ok(Expr::Str(value)),
            Some(Token::LParen) => {
                let inner = self.nested(Self::expr)?;
                self.expect(&Token::RParen, "expected ')'")?;
                Ok(inner)
            }
            Some(Token::Name(name)) => match name.as_str() {
                "True" => Ok(Expr::Bool(true)),
                "False" => Ok(Expr::Bool(false)),
                "None" => Ok(Expr::None),
                _ if is_keyword(&name) => Err(syntax("invalid syntax")),
                _ if self.eat(&Token::LParen) => {
                    let args = self.nested(Self::call_args)?;
                    Ok(Expr::Call { name, args })
                }
                _ => Ok(Expr::Name(name)),
            },
            Some(_) => Err(syntax("invalid syntax")),
            None => Err(syntax("unexpected end of line")),
        }
    }

    fn call_args(&mut self) -> Result<Vec<Expr>, RuntimeError> {
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            if self.eat(&Token::RParen) {
                return Ok(args);
            }
            self.expect(&Token::Comma, "expected ',' or ')'")?;
        }
    }
}

fn chain(first: Expr, rest: Vec<(BinOp, Expr)>) -> Expr {
    if rest.is_empty() {
        return first;
    }
    Expr::Binary {
        first: Box::new(first),
        rest,
    }
}

fn too_deep(message: &str) -> RuntimeError {
    RuntimeError::new("RecursionError", message)
}

fn is_keyword(name: &str) -> bool {
    KEYWORDS.contains(&name)
}
