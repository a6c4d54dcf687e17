use crate::error::{Result, SnapError};
use crate::traits::{SnapFunction, StateVector};
use std::collections::HashMap;

/// Names bound to the lifted state and time, in slot order.
pub const STATE_VARIABLES: [&str; 5] = ["x", "v", "a", "j", "t"];

/// Deepest evaluation stack a compiled expression may need.
pub const MAX_STACK_DEPTH: usize = 64;

/// Deepest parenthesis/unary nesting the parser accepts.
pub const MAX_NESTING_DEPTH: usize = 256;

/// Longest token stream accepted; bounds the height of the syntax tree.
pub const MAX_TOKENS: usize = 4096;

/// Built-in unary functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Sin,
    Cos,
    Tan,
    Exp,
    Ln,
    Sqrt,
    Abs,
    Tanh,
}

impl Function {
    fn lookup(name: &str) -> Option<Self> {
        let function = match name {
            "sin" => Function::Sin,
            "cos" => Function::Cos,
            "tan" => Function::Tan,
            "exp" => Function::Exp,
            "ln" => Function::Ln,
            "sqrt" => Function::Sqrt,
            "abs" => Function::Abs,
            "tanh" => Function::Tanh,
            _ => return None,
        };
        Some(function)
    }

    fn apply(self, a: f64) -> f64 {
        match self {
            Function::Sin => a.sin(),
            Function::Cos => a.cos(),
            Function::Tan => a.tan(),
            Function::Exp => a.exp(),
            Function::Ln => a.ln(),
            Function::Sqrt => a.sqrt(),
            Function::Abs => a.abs(),
            Function::Tanh => a.tanh(),
        }
    }
}

/// OpCodes for the stack-based virtual machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpCode {
    /// Pushes a constant.
    LoadConst(f64),
    /// Pushes a state slot (0=x, 1=v, 2=a, 3=j, 4=t).
    LoadVar(usize),
    /// Pushes a parameter by index.
    LoadParam(usize),
    /// Pops (b, a), pushes a + b.
    Add,
    /// Pops (b, a), pushes a - b.
    Sub,
    /// Pops (b, a), pushes a * b.
    Mul,
    /// Pops (b, a), pushes a / b.
    Div,
    /// Pops (b, a), pushes a ^ b.
    Pow,
    /// Pops a, pushes -a.
    Neg,
    /// Pops a, pushes f(a).
    Call(Function),
}

/// A snap nonlinearity compiled from text, e.g.
/// `-A*j - B*a - C*v - D*x + E*tanh(x)`.
///
/// Compilation resolves every symbol and bounds the stack depth, so
/// evaluation cannot fail. Evaluation uses a fixed-size stack on the call
/// frame, which keeps the type `Send + Sync` and allocation-free.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapExpression {
    source: String,
    ops: Vec<OpCode>,
    params: Vec<f64>,
}

impl SnapExpression {
    pub fn compile(source: &str, params: &[(&str, f64)]) -> Result<Self> {
        let mut param_map = HashMap::new();
        for (i, (name, _)) in params.iter().enumerate() {
            if STATE_VARIABLES.contains(name) || Function::lookup(name).is_some() {
                return Err(expression_error(format!(
                    "parameter name `{name}` shadows a built-in symbol"
                )));
            }
            if param_map.insert(name.to_string(), i).is_some() {
                return Err(expression_error(format!("duplicate parameter `{name}`")));
            }
        }

        let expr = parse(source)?;
        let compiler = Compiler {
            param_map: &param_map,
        };
        let mut ops = Vec::new();
        let mut depth = StackDepth::default();
        compiler.compile_recursive(&expr, &mut ops, &mut depth)?;

        Ok(Self {
            source: source.to_string(),
            ops,
            params: params.iter().map(|(_, value)| *value).collect(),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn ops(&self) -> &[OpCode] {
        &self.ops
    }

    /// Evaluates with `vars = [x, v, a, j, t]`.
    pub fn evaluate(&self, vars: &[f64; 5]) -> f64 {
        let mut stack = [0.0_f64; MAX_STACK_DEPTH];
        let mut top = 0usize;

        for op in &self.ops {
            match *op {
                OpCode::LoadConst(value) => {
                    stack[top] = value;
                    top += 1;
                }
                OpCode::LoadVar(slot) => {
                    stack[top] = vars[slot];
                    top += 1;
                }
                OpCode::LoadParam(idx) => {
                    stack[top] = self.params[idx];
                    top += 1;
                }
                OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Pow => {
                    top -= 1;
                    let b = stack[top];
                    let a = stack[top - 1];
                    stack[top - 1] = match op {
                        OpCode::Add => a + b,
                        OpCode::Sub => a - b,
                        OpCode::Mul => a * b,
                        OpCode::Div => a / b,
                        _ => a.powf(b),
                    };
                }
                OpCode::Neg => stack[top - 1] = -stack[top - 1],
                OpCode::Call(function) => stack[top - 1] = function.apply(stack[top - 1]),
            }
        }

        stack[0]
    }
}

impl SnapFunction for SnapExpression {
    fn snap(&self, state: &StateVector, t: f64) -> f64 {
        self.evaluate(&[state[0], state[1], state[2], state[3], t])
    }
}

fn expression_error(message: String) -> SnapError {
    SnapError::Expression(message)
}

// --- AST & Compiler ---

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(f64),
    Symbol(String),
    Binary(Box<Expr>, BinaryOp, Box<Expr>),
    Neg(Box<Expr>),
    Call(String, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Default)]
struct StackDepth {
    current: usize,
}

impl StackDepth {
    fn push(&mut self) -> Result<()> {
        self.current += 1;
        if self.current > MAX_STACK_DEPTH {
            return Err(expression_error(format!(
                "expression needs more than {MAX_STACK_DEPTH} stack slots"
            )));
        }
        Ok(())
    }

    fn pop(&mut self) {
        self.current -= 1;
    }
}

struct Compiler<'a> {
    param_map: &'a HashMap<String, usize>,
}

impl Compiler<'_> {
    fn compile_recursive(&self, expr: &Expr, ops: &mut Vec<OpCode>, depth: &mut StackDepth) -> Result<()> {
        match expr {
            Expr::Number(n) => {
                depth.push()?;
                ops.push(OpCode::LoadConst(*n));
            }
            Expr::Symbol(name) => {
                depth.push()?;
                if let Some(slot) = STATE_VARIABLES.iter().position(|v| v == name) {
                    ops.push(OpCode::LoadVar(slot));
                } else if let Some(&idx) = self.param_map.get(name) {
                    ops.push(OpCode::LoadParam(idx));
                } else {
                    return Err(expression_error(format!("unknown variable or parameter `{name}`")));
                }
            }
            Expr::Binary(left, op, right) => {
                self.compile_recursive(left, ops, depth)?;
                self.compile_recursive(right, ops, depth)?;
                depth.pop();
                ops.push(match op {
                    BinaryOp::Add => OpCode::Add,
                    BinaryOp::Sub => OpCode::Sub,
                    BinaryOp::Mul => OpCode::Mul,
                    BinaryOp::Div => OpCode::Div,
                    BinaryOp::Pow => OpCode::Pow,
                });
            }
            Expr::Neg(operand) => {
                self.compile_recursive(operand, ops, depth)?;
                ops.push(OpCode::Neg);
            }
            Expr::Call(name, arg) => {
                let function = Function::lookup(name)
                    .ok_or_else(|| expression_error(format!("unknown function `{name}`")))?;
                self.compile_recursive(arg, ops, depth)?;
                ops.push(OpCode::Call(function));
            }
        }
        Ok(())
    }
}

// --- Parser ---

fn parse(input: &str) -> Result<Expr> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(expression_error("empty expression".to_string()));
    }
    if tokens.len() > MAX_TOKENS {
        return Err(expression_error(format!(
            "expression is too long ({} tokens, at most {MAX_TOKENS})",
            tokens.len()
        )));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse_expression()?;
    if let Some(token) = parser.peek() {
        return Err(expression_error(format!("unexpected trailing {token:?}")));
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() || c == '.' {
            let mut end = start;
            let mut prev = c;
            while let Some(&(i, d)) = chars.peek() {
                let exponent_sign = (d == '+' || d == '-') && (prev == 'e' || prev == 'E');
                if d.is_ascii_digit() || d == '.' || d == 'e' || d == 'E' || exponent_sign {
                    end = i + d.len_utf8();
                    prev = d;
                    chars.next();
                } else {
                    break;
                }
            }
            let literal = &input[start..end];
            let value = literal
                .parse::<f64>()
                .map_err(|_| expression_error(format!("invalid number `{literal}`")))?;
            tokens.push(Token::Number(value));
        } else if c.is_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&(_, d)) = chars.peek() {
                if d.is_alphanumeric() || d == '_' {
                    ident.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Identifier(ident));
        } else {
            let token = match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '/' => Token::Slash,
                '^' => Token::Caret,
                '(' => Token::LParen,
                ')' => Token::RParen,
                other => {
                    return Err(expression_error(format!(
                        "unexpected character `{other}` at offset {start}"
                    )))
                }
            };
            tokens.push(token);
            chars.next();
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect_rparen(&mut self) -> Result<()> {
        match self.consume() {
            Some(Token::RParen) => Ok(()),
            _ => Err(expression_error("expected `)`".to_string())),
        }
    }

    // expression := term (('+' | '-') term)*
    fn parse_expression(&mut self) -> Result<Expr> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.consume();
            let right = self.parse_term()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    // term := unary (('*' | '/') unary)*
    fn parse_term(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => break,
            };
            self.consume();
            let right = self.parse_unary()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    // Every recursive path (parentheses, calls, unary minus, exponents) passes
    // through here, so this is where nesting is bounded.
    fn parse_unary(&mut self) -> Result<Expr> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(expression_error(format!(
                "expression nests deeper than {MAX_NESTING_DEPTH} levels"
            )));
        }
        let expr = self.parse_signed();
        self.depth -= 1;
        expr
    }

    // unary := '-' unary | power
    fn parse_signed(&mut self) -> Result<Expr> {
        if let Some(Token::Minus) = self.peek() {
            self.consume();
            let operand = self.parse_unary()?;
            return Ok(Expr::Neg(Box::new(operand)));
        }
        self.parse_power()
    }

    // power := primary ('^' unary)?   (right-associative, binds tighter than unary minus)
    fn parse_power(&mut self) -> Result<Expr> {
        let base = self.parse_primary()?;
        if let Some(Token::Caret) = self.peek() {
            self.consume();
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary(Box::new(base), BinaryOp::Pow, Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.consume() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Identifier(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.consume();
                    let arg = self.parse_expression()?;
                    self.expect_rparen()?;
                    Ok(Expr::Call(name, Box::new(arg)))
                } else {
                    Ok(Expr::Symbol(name))
                }
            }
            Some(Token::LParen) => {
                let expr = self.parse_expression()?;
                self.expect_rparen()?;
                Ok(expr)
            }
            Some(token) => Err(expression_error(format!("unexpected {token:?}"))),
            None => Err(expression_error("unexpected end of expression".to_string())),
        }
    }
}
