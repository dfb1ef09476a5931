//! The table container: a hash map keyed by any non-nil, non-NaN value,
//! an auto-incrementing positional counter, and an optional metatable.

use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use anyhow::{Result, bail};
use rustc_hash::FxHashMap;

use super::{Closure, Value};

/// A hashable view of a table key. Numbers hash by bit pattern (with
/// `-0.0` folded onto `0.0` so the two index the same slot); tables and
/// functions key by identity and the `Rc` is retained so the identity
/// stays stable for as long as the entry exists.
#[derive(Clone)]
pub enum Key {
    Bool(bool),
    Num(u64),
    Str(Rc<str>),
    Table(Rc<RefCell<Table>>),
    Function(Rc<Closure>),
}

impl Key {
    fn num(n: f64) -> Key {
        let n = if n == 0.0 { 0.0 } else { n };
        Key::Num(n.to_bits())
    }

    /// Key for a lookup. `None` means the lookup trivially misses.
    pub fn for_get(v: &Value) -> Option<Key> {
        match v {
            Value::Nil => None,
            Value::Num(n) if n.is_nan() => None,
            Value::Bool(b) => Some(Key::Bool(*b)),
            Value::Num(n) => Some(Key::num(*n)),
            Value::Str(s) => Some(Key::Str(Rc::clone(s))),
            Value::Table(t) => Some(Key::Table(Rc::clone(t))),
            Value::Function(c) => Some(Key::Function(Rc::clone(c))),
        }
    }

    /// Key for a store. Nil and NaN keys are type errors.
    pub fn for_set(v: &Value) -> Result<Key> {
        match v {
            Value::Nil => bail!("table index is nil"),
            Value::Num(n) if n.is_nan() => bail!("table index is NaN"),
            Value::Bool(b) => Ok(Key::Bool(*b)),
            Value::Num(n) => Ok(Key::num(*n)),
            Value::Str(s) => Ok(Key::Str(Rc::clone(s))),
            Value::Table(t) => Ok(Key::Table(Rc::clone(t))),
            Value::Function(c) => Ok(Key::Function(Rc::clone(c))),
        }
    }
}

// Identity arms print the pointer, like `Value`'s `Debug`; recursing
// into a table key's contents would not terminate on cyclic tables.
impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Bool(b) => write!(f, "Bool({b})"),
            Key::Num(bits) => write!(f, "Num({})", f64::from_bits(*bits)),
            Key::Str(s) => write!(f, "Str({s:?})"),
            Key::Table(t) => write!(f, "Table({:p})", Rc::as_ptr(t)),
            Key::Function(c) => write!(f, "Function({:p})", Rc::as_ptr(c)),
        }
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Key::Bool(a), Key::Bool(b)) => a == b,
            (Key::Num(a), Key::Num(b)) => a == b,
            (Key::Str(a), Key::Str(b)) => a == b,
            (Key::Table(a), Key::Table(b)) => Rc::ptr_eq(a, b),
            (Key::Function(a), Key::Function(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Key::Bool(b) => {
                state.write_u8(0);
                b.hash(state);
            }
            Key::Num(bits) => {
                state.write_u8(1);
                bits.hash(state);
            }
            Key::Str(s) => {
                state.write_u8(2);
                s.hash(state);
            }
            Key::Table(t) => {
                state.write_u8(3);
                (Rc::as_ptr(t) as usize).hash(state);
            }
            Key::Function(c) => {
                state.write_u8(4);
                (Rc::as_ptr(c) as usize).hash(state);
            }
        }
    }
}

/// The table container. Storing nil removes the mapping, so `len` stays
/// accurate for dense prefixes; `get` on an absent key yields nil, never
/// an error. `next_index` only ever grows.
#[derive(Debug, Default)]
pub struct Table {
    map: FxHashMap<Key, Value>,
    next_index: u64,
    pub metatable: Option<Rc<RefCell<Table>>>,
}

impl Table {
    pub fn new() -> Self {
        Self {
            map: FxHashMap::default(),
            next_index: 1,
            metatable: None,
        }
    }

    /// Build a table from a positional value list: keys 1..=n.
    pub fn from_values(values: Vec<Value>) -> Self {
        let mut t = Table::new();
        for v in values {
            t.insert(v);
        }
        t
    }

    pub fn get(&self, key: &Value) -> Value {
        Key::for_get(key)
            .and_then(|k| self.map.get(&k))
            .cloned()
            .unwrap_or(Value::Nil)
    }

    pub fn get_str(&self, key: &str) -> Value {
        self.map
            .get(&Key::Str(key.into()))
            .cloned()
            .unwrap_or(Value::Nil)
    }

    pub fn set(&mut self, key: Value, value: Value) -> Result<()> {
        let k = Key::for_set(&key)?;
        if matches!(value, Value::Nil) {
            self.map.remove(&k);
        } else {
            self.map.insert(k, value);
        }
        Ok(())
    }

    pub fn set_str(&mut self, key: &str, value: Value) {
        if matches!(value, Value::Nil) {
            self.map.remove(&Key::Str(key.into()));
        } else {
            self.map.insert(Key::Str(key.into()), value);
        }
    }

    /// Positional insertion at the auto-incrementing counter. The counter
    /// advances even when the value is nil, so it never moves backwards.
    pub fn insert(&mut self, value: Value) {
        let key = Key::num(self.next_index as f64);
        self.next_index += 1;
        if !matches!(value, Value::Nil) {
            self.map.insert(key, value);
        }
    }

    /// Dense-prefix length: the largest n such that keys 1..=n are all
    /// present.
    pub fn len(&self) -> usize {
        let mut n = 0u64;
        while self.map.contains_key(&Key::num((n + 1) as f64)) {
            n += 1;
        }
        n as usize
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Total number of stored entries, regardless of key shape.
    pub fn entries(&self) -> usize {
        self.map.len()
    }
}
