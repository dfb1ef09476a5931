//! Runtime values and the constant-pool element type.

use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::vm::bytecode::Proto;

mod table;
pub use table::{Key, Table};


/// A compile-time constant: the only value kinds a constant pool may hold.
///
/// Equality and hashing compare `Num` by bit pattern so pools deduplicate
/// deterministically (NaN folds onto itself, `0.0` and `-0.0` stay apart).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Const {
    Nil,
    Bool(bool),
    Num(f64),
    Str(Rc<str>),
}

impl PartialEq for Const {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Const::Nil, Const::Nil) => true,
            (Const::Bool(a), Const::Bool(b)) => a == b,
            (Const::Num(a), Const::Num(b)) => a.to_bits() == b.to_bits(),
            (Const::Str(a), Const::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Const {}

impl Hash for Const {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Const::Nil => state.write_u8(0),
            Const::Bool(b) => {
                state.write_u8(1);
                b.hash(state);
            }
            Const::Num(n) => {
                state.write_u8(2);
                n.to_bits().hash(state);
            }
            Const::Str(s) => {
                state.write_u8(3);
                s.hash(state);
            }
        }
    }
}

impl Const {
    pub fn to_value(&self) -> Value {
        match self {
            Const::Nil => Value::Nil,
            Const::Bool(b) => Value::Bool(*b),
            Const::Num(n) => Value::Num(*n),
            Const::Str(s) => Value::Str(Rc::clone(s)),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Const::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Const {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Const::Nil => f.write_str("nil"),
            Const::Bool(b) => write!(f, "{b}"),
            Const::Num(n) => f.write_str(&fmt_num(*n)),
            Const::Str(s) => write!(f, "{s:?}"),
        }
    }
}

/// A closure: a compiled prototype plus its captured upvalue cells.
///
/// Cells are shared (`Rc<RefCell<_>>`) so a capture forwarded through
/// several nesting levels observes writes from any of them.
#[derive(Debug)]
pub struct Closure {
    pub proto: Rc<Proto>,
    pub upvals: Vec<Rc<RefCell<Value>>>,
}

impl Closure {
    pub fn new(proto: Rc<Proto>, upvals: Vec<Rc<RefCell<Value>>>) -> Self {
        Self { proto, upvals }
    }
}

/// A runtime value. Tables and functions compare by identity, everything
/// else by content.
#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Num(f64),
    Str(Rc<str>),
    Table(Rc<RefCell<Table>>),
    Function(Rc<Closure>),
}

impl Value {
    pub fn table(t: Table) -> Self {
        Value::Table(Rc::new(RefCell::new(t)))
    }

    pub fn str(s: &str) -> Self {
        Value::Str(s.into())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Num(_) => "number",
            Value::Str(_) => "string",
            Value::Table(_) => "table",
            Value::Function(_) => "function",
        }
    }

    /// Only `nil` and `false` are falsey.
    pub fn truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    /// Numeric coercion used by arithmetic instructions: numbers pass
    /// through, strings that parse as a float coerce, everything else is
    /// not a number.
    pub fn as_num(&self) -> Option<f64> {
        match self {
            Value::Num(n) => Some(*n),
            Value::Str(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// String coercion used by concatenation: strings pass through,
    /// numbers render with their canonical formatting.
    pub fn as_coerced_str(&self) -> Option<String> {
        match self {
            Value::Str(s) => Some(s.to_string()),
            Value::Num(n) => Some(fmt_num(*n)),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Num(a), Value::Num(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("Nil"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Num(n) => write!(f, "Num({n})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Table(t) => write!(f, "Table({:p})", Rc::as_ptr(t)),
            Value::Function(c) => write!(f, "Function({:p})", Rc::as_ptr(c)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Num(n) => f.write_str(&fmt_num(*n)),
            Value::Str(s) => f.write_str(s),
            Value::Table(t) => write!(f, "table: {:p}", Rc::as_ptr(t)),
            Value::Function(c) => write!(f, "function: {:p}", Rc::as_ptr(c)),
        }
    }
}

/// Canonical number rendering: integral values print without a fraction,
/// everything else goes through the shortest float representation.
pub fn fmt_num(n: f64) -> String {
    if n.is_nan() {
        return "nan".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if n.fract() == 0.0 && n.abs() < 9e15 {
        let mut buf = itoa::Buffer::new();
        buf.format(n as i64).to_string()
    } else {
        let mut buf = ryu::Buffer::new();
        buf.format(n).to_string()
    }
}
