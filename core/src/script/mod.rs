//! Mini-script: a small line-oriented, Python-flavoured runtime.
//!
//! It exists so the session machinery has a real synchronous interpreter to
//! drive: `print` streams output fragments, `input` parks the worker in the
//! blocking read, and every statement passes through [`RuntimeIo::checkpoint`]
//! so a torn-down worker stops promptly.

mod lexer;
mod parser;

use std::collections::HashMap;
use std::fmt;

use crate::interpreter::ExecError;
use crate::interpreter::Interpreter;
use crate::interpreter::InterpreterFactory;
use crate::interpreter::RuntimeError;
use crate::interpreter::RuntimeIo;
use lexer::BinOp;
use parser::Expr;
use parser::Node;
use parser::Stmt;
use parser::parse_program;

const MAX_STRING_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Str(String),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "str",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Str(s) => !s.is_empty(),
        }
    }

    fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Default)]
pub struct MiniScript {
    globals: HashMap<String, Value>,
}

impl MiniScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    fn exec_block(&mut self, nodes: &[Node], io: &mut dyn RuntimeIo) -> Result<(), ExecError> {
        for node in nodes {
            io.checkpoint()?;
            self.exec(&node.stmt, io).map_err(|err| match err {
                ExecError::Runtime(err) => ExecError::Runtime(err.at_line(node.line)),
                other => other,
            })?;
        }
        Ok(())
    }

    fn exec(&mut self, stmt: &Stmt, io: &mut dyn RuntimeIo) -> Result<(), ExecError> {
        match stmt {
            Stmt::Pass => {}
            Stmt::Expr(expr) => {
                self.eval(expr, io)?;
            }
            Stmt::Assign { target, value } => {
                let value = self.eval(value, io)?;
                self.globals.insert(target.clone(), value);
            }
            Stmt::Raise { kind, message } => {
                let message = match message {
                    Some(expr) => self.eval(expr, io)?.to_string(),
                    None => String::new(),
                };
                return Err(RuntimeError::new(kind.clone(), message).into());
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                if self.eval(cond, io)?.truthy() {
                    self.exec_block(then, io)?;
                } else {
                    self.exec_block(otherwise, io)?;
                }
            }
            Stmt::While { cond, body } => loop {
                io.checkpoint()?;
                if !self.eval(cond, io)?.truthy() {
                    break;
                }
                self.exec_block(body, io)?;
            },
        }
        Ok(())
    }

    fn eval(&mut self, expr: &Expr, io: &mut dyn RuntimeIo) -> Result<Value, ExecError> {
        let value = match expr {
            Expr::Int(n) => Value::Int(*n),
            Expr::Str(s) => Value::Str(s.clone()),
            Expr::Bool(b) => Value::Bool(*b),
            Expr::None => Value::None,
            Expr::Name(name) => self
                .globals
                .get(name)
                .cloned()
                .ok_or_else(|| name_error(name))?,
            Expr::Call { name, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, io)?);
                }
                self.call(name, values, io)?
            }
            Expr::Neg(operand) => match self.eval(operand, io)? {
                Value::Int(n) => Value::Int(n.checked_neg().ok_or_else(overflow)?),
                other => {
                    return Err(type_error(format!(
                        "bad operand type for unary -: '{}'",
                        other.type_name()
                    )));
                }
            },
            Expr::Not(operand) => Value::Bool(!self.eval(operand, io)?.truthy()),
            Expr::And(operands) => {
                let mut value = Value::Bool(true);
                for operand in operands {
                    value = self.eval(operand, io)?;
                    if !value.truthy() {
                        break;
                    }
                }
                value
            }
            Expr::Or(operands) => {
                let mut value = Value::Bool(false);
                for operand in operands {
                    value = self.eval(operand, io)?;
                    if value.truthy() {
                        break;
                    }
                }
                value
            }
            Expr::Binary { first, rest } => {
                let mut acc = self.eval(first, io)?;
                for (op, operand) in rest {
                    let rhs = self.eval(operand, io)?;
                    acc = binary(*op, acc, rhs)?;
                }
                acc
            }
        };
        Ok(value)
    }

    fn call(
        &mut self,
        name: &str,
        args: Vec<Value>,
        io: &mut dyn RuntimeIo,
    ) -> Result<Value, ExecError> {
        match name {
            "print" => {
                let mut line = args
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" ");
                line.push('\n');
                io.write_output(&line)?;
                Ok(Value::None)
            }
            "input" => {
                if args.len() > 1 {
                    return Err(arity("input", "at most 1 argument", args.len()));
                }
                if let Some(prompt) = args.first() {
                    let prompt = prompt.to_string();
                    if !prompt.is_empty() {
                        io.write_output(&prompt)?;
                    }
                }
                let Some(line) = io.read_line()? else {
                    return Err(RuntimeError::new("EOFError", "EOF when reading a line").into());
                };
                let line = line.strip_suffix('\n').unwrap_or(&line);
                let line = line.strip_suffix('\r').unwrap_or(line);
                Ok(Value::Str(line.to_string()))
            }
            "int" => match single("int", args)? {
                Value::Str(s) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| {
                    RuntimeError::new(
                        "ValueError",
                        format!("invalid literal for int() with base 10: '{s}'"),
                    )
                    .into()
                }),
                other => other.as_int().map(Value::Int).ok_or_else(|| {
                    type_error(format!(
                        "int() argument must be a string or a number, not '{}'",
                        other.type_name()
                    ))
                }),
            },
            "str" => Ok(Value::Str(single("str", args)?.to_string())),
            "len" => match single("len", args)? {
                Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
                other => Err(type_error(format!(
                    "object of type '{}' has no len()",
                    other.type_name()
                ))),
            },
            _ => match self.globals.get(name) {
                Some(value) => Err(type_error(format!(
                    "'{}' object is not callable",
                    value.type_name()
                ))),
                None => Err(name_error(name)),
            },
        }
    }
}

impl Interpreter for MiniScript {
    fn run(&mut self, source: &str, io: &mut dyn RuntimeIo) -> Result<(), ExecError> {
        let program = parse_program(source)?;
        self.exec_block(&program, io)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MiniScriptFactory;

impl InterpreterFactory for MiniScriptFactory {
    fn name(&self) -> &str {
        "mini-script"
    }

    fn create(&self) -> Box<dyn Interpreter> {
        Box::new(MiniScript::new())
    }
}

fn binary(op: BinOp, lhs: Value, rhs: Value) -> Result<Value, ExecError> {
    use Value::Int;
    use Value::Str;

    let value = match (op, &lhs, &rhs) {
        (BinOp::Eq, _, _) => Value::Bool(loosely_equal(&lhs, &rhs)),
        (BinOp::Ne, _, _) => Value::Bool(!loosely_equal(&lhs, &rhs)),
        (BinOp::Add, Str(a), Str(b)) => Str(format!("{a}{b}")),
        (BinOp::Mul, Str(s), n) | (BinOp::Mul, n, Str(s)) if n.as_int().is_some() => {
            let count = n.as_int().unwrap_or_default().max(0) as usize;
            if s.len().saturating_mul(count) > MAX_STRING_BYTES {
                return Err(RuntimeError::new("MemoryError", "repeated string too large").into());
            }
            Str(s.repeat(count))
        }
        (BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge, Str(a), Str(b)) => {
            Value::Bool(compare(op, a.cmp(b)))
        }
        _ => match (lhs.as_int(), rhs.as_int()) {
            (Some(a), Some(b)) => int_op(op, a, b)?,
            _ => {
                let message = if op.is_comparison() {
                    format!(
                        "'{}' not supported between instances of '{}' and '{}'",
                        op.symbol(),
                        lhs.type_name(),
                        rhs.type_name()
                    )
                } else {
                    format!(
                        "unsupported operand type(s) for {}: '{}' and '{}'",
                        op.symbol(),
                        lhs.type_name(),
                        rhs.type_name()
                    )
                };
                return Err(type_error(message));
            }
        },
    };
    Ok(value)
}

fn int_op(op: BinOp, a: i64, b: i64) -> Result<Value, ExecError> {
    let value = match op {
        BinOp::Add => Value::Int(a.checked_add(b).ok_or_else(overflow)?),
        BinOp::Sub => Value::Int(a.checked_sub(b).ok_or_else(overflow)?),
        BinOp::Mul => Value::Int(a.checked_mul(b).ok_or_else(overflow)?),
        BinOp::FloorDiv | BinOp::Mod => {
            if b == 0 {
                return Err(RuntimeError::new(
                    "ZeroDivisionError",
                    "integer division or modulo by zero",
                )
                .into());
            }
            let quotient = a.checked_div(b).ok_or_else(overflow)?;
            let remainder = a % b;
            // Round toward negative infinity like Python.
            let adjust = remainder != 0 && ((remainder < 0) != (b < 0));
            if op == BinOp::FloorDiv {
                Value::Int(if adjust { quotient - 1 } else { quotient })
            } else {
                Value::Int(if adjust { remainder + b } else { remainder })
            }
        }
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => Value::Bool(compare(op, a.cmp(&b))),
        BinOp::Eq => Value::Bool(a == b),
        BinOp::Ne => Value::Bool(a != b),
    };
    Ok(value)
}

fn compare(op: BinOp, ordering: std::cmp::Ordering) -> bool {
    match op {
        BinOp::Lt => ordering.is_lt(),
        BinOp::Le => ordering.is_le(),
        BinOp::Gt => ordering.is_gt(),
        BinOp::Ge => ordering.is_ge(),
        _ => false,
    }
}

fn loosely_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs.as_int(), rhs.as_int()) {
        (Some(a), Some(b)) => a == b,
        _ => lhs == rhs,
    }
}

fn single(name: &str, args: Vec<Value>) -> Result<Value, ExecError> {
    let count = args.len();
    let mut args = args.into_iter();
    match (args.next(), args.next()) {
        (Some(value), None) => Ok(value),
        _ => Err(arity(name, "exactly one argument", count)),
    }
}

fn arity(name: &str, expected: &str, given: usize) -> ExecError {
    type_error(format!("{name}() takes {expected} ({given} given)"))
}

fn name_error(name: &str) -> ExecError {
    RuntimeError::new("NameError", format!("name '{name}' is not defined")).into()
}

fn type_error(message: String) -> ExecError {
    RuntimeError::new("TypeError", message).into()
}

fn overflow() -> ExecError {
    RuntimeError::new("OverflowError", "integer overflow").into()
}
