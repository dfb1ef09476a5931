pub(super) use crate::{
    ast::{AssignTarget, Block, Expr, FuncBody, Stmt, TableItem},
    op::{BinOp, UnOp},
    val::Value,
    vm::{Vm, compile_block, disassemble},
};

/// Run a top-level block on a fresh VM and return its return values.
pub(super) fn exec(block: &Block) -> Vec<Value> {
    Vm::new().exec(block).unwrap()
}

/// Run a block expected to return exactly one value.
pub(super) fn exec_one(block: &Block) -> Value {
    let mut values = exec(block);
    assert_eq!(values.len(), 1, "expected one return value");
    values.pop().unwrap()
}

pub(super) fn assign(name: &str, value: Expr) -> Stmt {
    Stmt::Assign {
        targets: vec![AssignTarget::Name(name.to_string())],
        values: vec![value],
    }
}

pub(super) fn local(name: &str, value: Expr) -> Stmt {
    Stmt::Local {
        names: vec![name.to_string()],
        values: vec![value],
    }
}

pub(super) fn func_body(params: &[&str], body: Block) -> FuncBody {
    FuncBody {
        params: params.iter().map(|p| p.to_string()).collect(),
        body,
    }
}

mod bytecode;
mod control_flow;
mod functions;
mod tables;
