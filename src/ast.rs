//! Record selection expressions.
//!
//! An expression such as `nhit > 20 && abs(rec.zenith) < 0.5` is parsed once
//! against a catalog, then evaluated against the values of each record.
//!
//! ```text
//! expression ::= or
//! or         ::= and ( '||' and )*
//! and        ::= bitor ( '&&' bitor )*
//! bitor      ::= bitand ( '|' bitand )*
//! bitand     ::= equality ( '&' equality )*
//! equality   ::= compare ( ( '==' | '!=' ) compare )*
//! compare    ::= sum ( ( '<' | '<=' | '>' | '>=' ) sum )*
//! sum        ::= product ( ( '+' | '-' ) product )*
//! product    ::= unary ( ( '*' | '/' | '%' ) unary )*
//! unary      ::= ( '!' | '-' | '+' ) unary | power
//! power      ::= primary ( '^' unary )?
//! primary    ::= NUMBER | 'true' | 'false' | FIELD | FUNC '(' args ')' | '(' expression ')'
//! ```
//!
//! Vector fields are evaluated element by element, with scalar fields
//! broadcast; a record is selected when any element satisfies the expression.

use std::cmp::Ordering;
use std::sync::OnceLock;

use regex::Regex;

use crate::catalog::Catalog;
use crate::error::{Result, XcdfError};
use crate::types::{FieldData, Value};

/// Intermediate value during evaluation. Integers are widened so that every
/// u64 and i64 field value is exact.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Num {
    Bool(bool),
    Int(i128),
    Float(f64),
}

impl Num {
    pub fn truthy(&self) -> bool {
        match *self {
            Num::Bool(b) => b,
            Num::Int(i) => i != 0,
            Num::Float(f) => f != 0.0 && !f.is_nan(),
        }
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            Num::Bool(b) => b as u8 as f64,
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }

    fn as_int(&self) -> Option<i128> {
        match *self {
            Num::Bool(b) => Some(b as i128),
            Num::Int(i) => Some(i),
            Num::Float(_) => None,
        }
    }

    fn trunc_int(&self) -> i128 {
        match *self {
            Num::Float(f) => f as i128,
            _ => self.as_int().unwrap_or(0),
        }
    }
}

impl From<Value> for Num {
    fn from(v: Value) -> Num {
        match v {
            Value::Unsigned(u) => Num::Int(u as i128),
            Value::Signed(s) => Num::Int(s as i128),
            Value::Float(f) => Num::Float(f),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BinaryOp {
    Or,
    And,
    BitOr,
    BitAnd,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Func {
    Abs,
    Sqrt,
    Exp,
    Log,
    Log10,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Floor,
    Ceil,
    Round,
    Pow,
    Atan2,
    Fmod,
    Min,
    Max,
}

impl Func {
    fn from_name(s: &str) -> Option<Func> {
        let f = match s {
            "abs" => Func::Abs,
            "sqrt" => Func::Sqrt,
            "exp" => Func::Exp,
            "log" => Func::Log,
            "log10" => Func::Log10,
            "sin" => Func::Sin,
            "cos" => Func::Cos,
            "tan" => Func::Tan,
            "asin" => Func::Asin,
            "acos" => Func::Acos,
            "atan" => Func::Atan,
            "floor" => Func::Floor,
            "ceil" => Func::Ceil,
            "round" => Func::Round,
            "pow" => Func::Pow,
            "atan2" => Func::Atan2,
            "fmod" => Func::Fmod,
            "min" => Func::Min,
            "max" => Func::Max,
            _ => return None,
        };
        Some(f)
    }

    fn arity(self) -> usize {
        match self {
            Func::Pow | Func::Atan2 | Func::Fmod | Func::Min | Func::Max => 2,
            _ => 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Lit { val: Num },
    Ref { col: usize },
    Unary { op: UnaryOp, l: Box<Expr> },
    Binary { op: BinaryOp, l: Box<Expr>, r: Box<Expr> },
    Call { func: Func, args: Vec<Expr> },
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Int(i128),
    Float(f64),
    Ident(String),
    Op(String),
}

fn token_pattern() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| {
        Regex::new(concat!(
            r"^(?:",
            r"(?P<num>(?:\d+\.\d*|\.\d+)(?:[eE][+-]?\d+)?|\d+[eE][+-]?\d+|\d+)",
            r"|(?P<ident>[A-Za-z_][A-Za-z0-9_.]*)",
            r"|(?P<op>&&|\|\||==|!=|<=|>=|[-+*/%^()<>!&|,])",
            r")"
        ))
        .expect("token pattern")
    })
}

fn syntax(position: usize, message: impl Into<String>) -> XcdfError {
    XcdfError::Expression {
        position,
        message: message.into(),
    }
}

/// Splits `s` into tokens paired with their starting column.
fn tokenize(s: &str) -> Result<Vec<(Token, usize)>> {
    let re = token_pattern();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < s.len() {
        let rest = &s[pos..];
        let trimmed = rest.trim_start();
        if trimmed.is_empty() {
            break;
        }
        pos += rest.len() - trimmed.len();

        let caps = re
            .captures(trimmed)
            .ok_or_else(|| syntax(pos, format!("unexpected character '{}'", trimmed.chars().next().unwrap_or(' '))))?;
        let (token, len) = if let Some(m) = caps.name("num") {
            let text = m.as_str();
            let token = if text.contains(|c: char| c == '.' || c == 'e' || c == 'E') {
                Token::Float(text.parse().map_err(|_| syntax(pos, "bad number"))?)
            } else {
                match text.parse::<u64>() {
                    Ok(i) => Token::Int(i as i128),
                    Err(_) => Token::Float(text.parse().map_err(|_| syntax(pos, "bad number"))?),
                }
            };
            (token, m.end())
        } else if let Some(m) = caps.name("ident") {
            (Token::Ident(m.as_str().to_owned()), m.end())
        } else if let Some(m) = caps.name("op") {
            (Token::Op(m.as_str().to_owned()), m.end())
        } else {
            return Err(syntax(pos, "unrecognized token"));
        };
        tokens.push((token, pos));
        pos += len;
    }

    Ok(tokens)
}

// binary operators from loosest to tightest binding
const LEVELS: &[&[(&str, BinaryOp)]] = &[
    &[("||", BinaryOp::Or)],
    &[("&&", BinaryOp::And)],
    &[("|", BinaryOp::BitOr)],
    &[("&", BinaryOp::BitAnd)],
    &[("==", BinaryOp::Eq), ("!=", BinaryOp::Ne)],
    &[("<", BinaryOp::Lt), ("<=", BinaryOp::Le), (">", BinaryOp::Gt), (">=", BinaryOp::Ge)],
    &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)],
    &[("*", BinaryOp::Mul), ("/", BinaryOp::Div), ("%", BinaryOp::Rem)],
];

// bound on parenthesis nesting, prefix operator runs and operator chains
const MAX_DEPTH: usize = 256;

struct Parser<'a> {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    end: usize,
    depth: usize,
    catalog: &'a Catalog,
    refs: Vec<usize>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn column(&self) -> usize {
        self.tokens.get(self.pos).map(|(_, c)| *c).unwrap_or(self.end)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        self.pos += 1;
        t
    }

    fn peek_op(&self) -> Option<&str> {
        match self.peek() {
            Some(Token::Op(op)) => Some(op.as_str()),
            _ => None,
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<()> {
        if self.peek_op() == Some(op) {
            self.pos += 1;
            Ok(())
        } else {
            Err(syntax(self.column(), format!("expected '{}'", op)))
        }
    }

    fn descend(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(syntax(self.column(), "expression nested too deeply"));
        }
        Ok(())
    }

    fn expression(&mut self) -> Result<Expr> {
        self.descend()?;
        let e = self.binary(0)?;
        self.depth -= 1;
        Ok(e)
    }

    fn binary(&mut self, level: usize) -> Result<Expr> {
        if level == LEVELS.len() {
            return self.unary();
        }
        let depth = self.depth;
        let mut l = self.binary(level + 1)?;
        loop {
            let op = match self.peek_op() {
                Some(s) => LEVELS[level].iter().find(|(text, _)| *text == s).map(|(_, op)| *op),
                None => None,
            };
            let op = match op {
                Some(op) => op,
                None => {
                    self.depth = depth;
                    return Ok(l);
                }
            };
            self.pos += 1;
            // each link of a chain deepens the left operand
            self.descend()?;
            let r = self.binary(level + 1)?;
            l = Expr::Binary {
                op,
                l: Box::new(l),
                r: Box::new(r),
            };
        }
    }

    fn unary(&mut self) -> Result<Expr> {
        let op = match self.peek_op() {
            Some("!") => Some(UnaryOp::Not),
            Some("-") => Some(UnaryOp::Neg),
            Some("+") => None,
            _ => return self.power(),
        };
        self.pos += 1;
        self.descend()?;
        let arg = self.unary()?;
        self.depth -= 1;
        Ok(match op {
            Some(op) => Expr::Unary { op, l: Box::new(arg) },
            None => arg,
        })
    }

    fn power(&mut self) -> Result<Expr> {
        let base = self.primary()?;
        if self.peek_op() == Some("^") {
            self.pos += 1;
            self.descend()?;
            let exponent = self.unary()?;
            self.depth -= 1;
            return Ok(Expr::Binary {
                op: BinaryOp::Pow,
                l: Box::new(base),
                r: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr> {
        let column = self.column();
        match self.next() {
            Some(Token::Int(i)) => Ok(Expr::Lit { val: Num::Int(i) }),
            Some(Token::Float(f)) => Ok(Expr::Lit { val: Num::Float(f) }),
            Some(Token::Op(op)) if op == "(" => {
                let e = self.expression()?;
                self.expect_op(")")?;
                Ok(e)
            }
            Some(Token::Ident(name)) => {
                if self.peek_op() == Some("(") {
                    let func = Func::from_name(&name)
                        .ok_or_else(|| syntax(column, format!("unknown function '{}'", name)))?;
                    self.pos += 1;
                    let mut args = vec![self.expression()?];
                    while self.peek_op() == Some(",") {
                        self.pos += 1;
                        args.push(self.expression()?);
                    }
                    self.expect_op(")")?;
                    if args.len() != func.arity() {
                        return Err(syntax(
                            column,
                            format!("'{}' takes {} argument(s), got {}", name, func.arity(), args.len()),
                        ));
                    }
                    return Ok(Expr::Call { func, args });
                }
                match name.as_str() {
                    "true" => Ok(Expr::Lit { val: Num::Bool(true) }),
                    "false" => Ok(Expr::Lit { val: Num::Bool(false) }),
                    _ => {
                        let col = self
                            .catalog
                            .index_of(&name)
                            .ok_or_else(|| XcdfError::UnknownField(name.clone()))?;
                        if !self.refs.contains(&col) {
                            self.refs.push(col);
                        }
                        Ok(Expr::Ref { col })
                    }
                }
            }
            Some(Token::Op(op)) => Err(syntax(column, format!("unexpected '{}'", op))),
            None => Err(syntax(column, "unexpected end of expression")),
        }
    }
}

/// Parses `s` against `catalog`. Returns the tree and the catalog indices of
/// the fields it references.
pub fn parse_expr(s: &str, catalog: &Catalog) -> Result<(Expr, Vec<usize>)> {
    let tokens = tokenize(s)?;
    if tokens.is_empty() {
        return Err(syntax(0, "empty expression"));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: s.len(),
        depth: 0,
        catalog,
        refs: Vec::new(),
    };
    let e = parser.expression()?;
    if parser.pos < parser.tokens.len() {
        return Err(syntax(parser.column(), "unexpected trailing input"));
    }
    Ok((e, parser.refs))
}

fn arith(op: BinaryOp, l: Num, r: Num) -> Num {
    if let (Some(a), Some(b)) = (l.as_int(), r.as_int()) {
        let exact = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            BinaryOp::Mul => a.checked_mul(b),
            BinaryOp::Rem => a.checked_rem(b),
            _ => None,
        };
        if let Some(v) = exact {
            return Num::Int(v);
        }
    }
    let (a, b) = (l.as_f64(), r.as_f64());
    Num::Float(match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Rem => a % b,
        _ => a.powf(b),
    })
}

fn compare(l: Num, r: Num) -> Option<Ordering> {
    match (l.as_int(), r.as_int()) {
        (Some(a), Some(b)) => Some(a.cmp(&b)),
        _ => l.as_f64().partial_cmp(&r.as_f64()),
    }
}

fn call(func: Func, args: &[Num]) -> Num {
    let x = args[0];
    if func == Func::Abs {
        if let Some(i) = x.as_int() {
            return i.checked_abs().map(Num::Int).unwrap_or(Num::Float(-(i as f64)));
        }
    }
    if func == Func::Min || func == Func::Max {
        let pick_left = match compare(x, args[1]) {
            Some(Ordering::Less) => func == Func::Min,
            Some(Ordering::Greater) => func == Func::Max,
            Some(Ordering::Equal) => true,
            None => return Num::Float(f64::NAN),
        };
        return if pick_left { x } else { args[1] };
    }
    let a = x.as_f64();
    let b = args.get(1).map(Num::as_f64).unwrap_or(0.0);
    Num::Float(match func {
        Func::Abs => a.abs(),
        Func::Sqrt => a.sqrt(),
        Func::Exp => a.exp(),
        Func::Log => a.ln(),
        Func::Log10 => a.log10(),
        Func::Sin => a.sin(),
        Func::Cos => a.cos(),
        Func::Tan => a.tan(),
        Func::Asin => a.asin(),
        Func::Acos => a.acos(),
        Func::Atan => a.atan(),
        Func::Floor => a.floor(),
        Func::Ceil => a.ceil(),
        Func::Round => a.round(),
        Func::Pow => a.powf(b),
        Func::Atan2 => a.atan2(b),
        Func::Fmod => a % b,
        Func::Min | Func::Max => f64::NAN,
    })
}

/// Evaluates `e` for element `element` of the record held in `values`.
/// Fields with a single value are used for every element.
pub fn eval(values: &[FieldData], e: &Expr, element: usize) -> Num {
    match e {
        Expr::Lit { val } => *val,
        Expr::Ref { col } => {
            let data = &values[*col];
            let i = if data.len() == 1 { 0 } else { element };
            data.get(i).map(Num::from).unwrap_or(Num::Float(f64::NAN))
        }
        Expr::Unary { op, l } => {
            let v = eval(values, l, element);
            match op {
                UnaryOp::Not => Num::Bool(!v.truthy()),
                UnaryOp::Neg => match v.as_int() {
                    Some(i) => i.checked_neg().map(Num::Int).unwrap_or(Num::Float(-(i as f64))),
                    None => Num::Float(-v.as_f64()),
                },
            }
        }
        Expr::Binary { op, l, r } => match op {
            BinaryOp::Or => Num::Bool(eval(values, l, element).truthy() || eval(values, r, element).truthy()),
            BinaryOp::And => Num::Bool(eval(values, l, element).truthy() && eval(values, r, element).truthy()),
            _ => {
                let lv = eval(values, l, element);
                let rv = eval(values, r, element);
                match op {
                    BinaryOp::BitOr => Num::Int(lv.trunc_int() | rv.trunc_int()),
                    BinaryOp::BitAnd => Num::Int(lv.trunc_int() & rv.trunc_int()),
                    BinaryOp::Eq => Num::Bool(compare(lv, rv) == Some(Ordering::Equal)),
                    BinaryOp::Ne => Num::Bool(compare(lv, rv) != Some(Ordering::Equal)),
                    BinaryOp::Lt => Num::Bool(compare(lv, rv) == Some(Ordering::Less)),
                    BinaryOp::Le => Num::Bool(matches!(compare(lv, rv), Some(Ordering::Less | Ordering::Equal))),
                    BinaryOp::Gt => Num::Bool(compare(lv, rv) == Some(Ordering::Greater)),
                    BinaryOp::Ge => {
                        Num::Bool(matches!(compare(lv, rv), Some(Ordering::Greater | Ordering::Equal)))
                    }
                    _ => arith(*op, lv, rv),
                }
            }
        },
        Expr::Call { func, args } => {
            let evaluated: Vec<Num> = args.iter().map(|a| eval(values, a, element)).collect();
            call(*func, &evaluated)
        }
    }
}

/// Compiled record predicate.
#[derive(Clone, Debug)]
pub struct EventSelectExpression {
    source: String,
    expr: Expr,
    refs: Vec<usize>,
}

impl EventSelectExpression {
    pub fn new(source: &str, catalog: &Catalog) -> Result<Self> {
        let (expr, refs) = parse_expr(source, catalog)?;
        Ok(EventSelectExpression {
            source: source.to_owned(),
            expr,
            refs,
        })
    }

    /// Predicate that accepts every record.
    pub fn select_all() -> Self {
        EventSelectExpression {
            source: "true".to_owned(),
            expr: Expr::Lit { val: Num::Bool(true) },
            refs: Vec::new(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Catalog indices of the referenced fields.
    pub fn fields(&self) -> &[usize] {
        &self.refs
    }

    pub fn select_event(&self, values: &[FieldData]) -> bool {
        let mut elements = 1;
        for &col in &self.refs {
            match values[col].len() {
                0 => return false,
                n => elements = elements.max(n),
            }
        }
        (0..elements).any(|i| {
            let aligned = self.refs.iter().all(|&col| {
                let n = values[col].len();
                n == 1 || i < n
            });
            aligned && eval(values, &self.expr, i).truthy()
        })
    }
}
