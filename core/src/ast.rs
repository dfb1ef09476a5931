//! The statement/expression tree consumed by the bytecode compiler.
//!
//! The tree is produced by an external front end and read-only from the
//! compiler's point of view. Statements and expressions are closed sum
//! types; each consumer traverses them with an exhaustive match so adding
//! a variant is a compile error everywhere it matters.

use crate::op::{BinOp, UnOp};
use crate::val::Const;

/// An ordered statement sequence with an optional trailing list of
/// return expressions.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub ret: Option<Vec<Expr>>,
}

impl Block {
    pub fn new(stmts: Vec<Stmt>) -> Self {
        Self { stmts, ret: None }
    }

    pub fn with_ret(stmts: Vec<Stmt>, ret: Vec<Expr>) -> Self {
        Self { stmts, ret: Some(ret) }
    }
}

/// Assignment target. The compiler only lowers `Name` targets; `Index`
/// targets are rejected with a generation error.
#[derive(Debug, Clone, PartialEq)]
pub enum AssignTarget {
    Name(String),
    Index { obj: Expr, key: Expr },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `a, b = e1, e2`: multi-target assignment. A single call expression
    /// feeding several targets distributes its return values across them.
    Assign {
        targets: Vec<AssignTarget>,
        values: Vec<Expr>,
    },
    /// `local a, b = e1, e2`
    Local {
        names: Vec<String>,
        values: Vec<Expr>,
    },
    /// `if c1 then .. elseif c2 then .. else .. end`
    If {
        arms: Vec<(Expr, Block)>,
        else_body: Option<Block>,
    },
    While {
        cond: Expr,
        body: Block,
    },
    /// Numeric `for var = start, limit [, step] do .. end`
    NumericFor {
        var: String,
        start: Expr,
        limit: Expr,
        step: Option<Expr>,
        body: Block,
    },
    /// `function name(..) .. end` / `local function name(..) .. end`
    Function {
        name: String,
        local: bool,
        func: FuncBody,
    },
    /// A call in statement position; return values are discarded.
    Call(Expr),
}

/// One entry of a table constructor.
#[derive(Debug, Clone, PartialEq)]
pub enum TableItem {
    /// `expr`, appended at the next positional key.
    Positional(Expr),
    /// `name = expr`
    Named(String, Expr),
    /// `[key] = expr`
    Keyed(Expr, Expr),
}

/// A function literal: parameter names plus body.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncBody {
    pub params: Vec<String>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(Const),
    Name(String),
    Un(UnOp, Box<Expr>),
    Bin(Box<Expr>, BinOp, Box<Expr>),
    Table(Vec<TableItem>),
    Index {
        obj: Box<Expr>,
        key: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    /// `obj:name(args)` method-call sugar; `obj` is evaluated once and
    /// passed as the implicit first argument.
    MethodCall {
        obj: Box<Expr>,
        name: String,
        args: Vec<Expr>,
    },
    Function(FuncBody),
}

impl Expr {
    pub fn nil() -> Self {
        Expr::Const(Const::Nil)
    }

    pub fn bool(b: bool) -> Self {
        Expr::Const(Const::Bool(b))
    }

    pub fn num(n: f64) -> Self {
        Expr::Const(Const::Num(n))
    }

    pub fn str(s: &str) -> Self {
        Expr::Const(Const::Str(s.into()))
    }

    pub fn name(n: &str) -> Self {
        Expr::Name(n.to_string())
    }

    pub fn bin(l: Expr, op: BinOp, r: Expr) -> Self {
        Expr::Bin(Box::new(l), op, Box::new(r))
    }

    pub fn un(op: UnOp, e: Expr) -> Self {
        Expr::Un(op, Box::new(e))
    }

    pub fn index(obj: Expr, key: Expr) -> Self {
        Expr::Index {
            obj: Box::new(obj),
            key: Box::new(key),
        }
    }

    /// Field-access sugar: `obj.name` is `obj["name"]`.
    pub fn field(obj: Expr, name: &str) -> Self {
        Expr::index(obj, Expr::str(name))
    }

    pub fn call(callee: Expr, args: Vec<Expr>) -> Self {
        Expr::Call {
            callee: Box::new(callee),
            args,
        }
    }

    pub fn method_call(obj: Expr, name: &str, args: Vec<Expr>) -> Self {
        Expr::MethodCall {
            obj: Box::new(obj),
            name: name.to_string(),
            args,
        }
    }
}
