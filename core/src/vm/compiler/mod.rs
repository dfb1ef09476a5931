//! AST-to-bytecode compiler.
//!
//! `Compiler` keeps an explicit stack of per-function builders; function
//! literals push a builder, compile their body, and pop it. Identifier
//! resolution walks that stack, threading chained upvalue captures
//! through every intermediate function.

use anyhow::{Result, bail};
use tracing::debug;

use crate::ast::Block;
use crate::vm::bytecode::{Proto, ProtoDebug};
use crate::vm::insn::{Insn, Temp};

mod builder;
mod expr;
mod stmt;

use builder::FuncBuilder;


/// Where an identifier lives.
pub(crate) enum Loc {
    Local(Temp),
    Upval(u16),
    Global,
}

pub struct Compiler {
    funcs: Vec<FuncBuilder>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

/// Compile a top-level block into a zero-parameter prototype.
pub fn compile_block(block: &Block) -> Result<Proto> {
    Compiler::new().compile_block(block)
}

/// Compile a function body with the given parameter names.
pub fn compile_function(params: &[String], body: &Block) -> Result<Proto> {
    Compiler::new().compile_function(params, body)
}

impl Compiler {
    pub fn new() -> Self {
        Self { funcs: Vec::new() }
    }

    pub fn compile_block(&mut self, block: &Block) -> Result<Proto> {
        self.compile_inner(&[], block, Some(ProtoDebug { name: Some("main".into()) }))
    }

    pub fn compile_function(&mut self, params: &[String], body: &Block) -> Result<Proto> {
        self.compile_inner(params, body, None)
    }

    pub(crate) fn compile_inner(
        &mut self,
        params: &[String],
        block: &Block,
        debug: Option<ProtoDebug>,
    ) -> Result<Proto> {
        self.funcs.push(FuncBuilder::with_params(params)?);
        let generated = self.gen_block(block).map(|_| {
            // Implicit terminal return; unreachable when the block ends in
            // an explicit one.
            self.fb().emit(Insn::Return {
                start: Temp(0),
                count: 0,
            });
        });
        let fb = match self.funcs.pop() {
            Some(fb) => fb,
            None => bail!("builder stack underflow"),
        };
        generated?;
        let proto = fb.finish(debug)?;
        debug!(
            insns = proto.code.len(),
            consts = proto.consts.len(),
            regs = proto.n_regs,
            "compiled function"
        );
        Ok(proto)
    }

    pub(crate) fn fb(&mut self) -> &mut FuncBuilder {
        self.funcs.last_mut().expect("no active function builder")
    }

    /// Resolve an identifier: innermost locals first, then enclosing
    /// functions (as upvalues), then global.
    pub(crate) fn resolve(&mut self, name: &str) -> Result<Loc> {
        let top = self.funcs.len() - 1;
        if let Some(t) = self.funcs[top].lookup_local(name) {
            return Ok(Loc::Local(t));
        }
        match self.resolve_upval(top, name)? {
            Some(idx) => Ok(Loc::Upval(idx)),
            None => Ok(Loc::Global),
        }
    }

    /// Resolve `name` as an upvalue of the function at `level`, allocating
    /// capture descriptors down the chain as needed.
    fn resolve_upval(&mut self, level: usize, name: &str) -> Result<Option<u16>> {
        if level == 0 {
            return Ok(None);
        }
        if let Some(idx) = self.funcs[level].find_upval(name) {
            return Ok(Some(idx));
        }
        if let Some(t) = self.funcs[level - 1].lookup_local(name) {
            let idx = self.funcs[level].add_upval(crate::vm::bytecode::UpvalDesc::Local {
                name: name.to_string(),
                reg: crate::vm::insn::Reg(t.0 as u16),
            })?;
            return Ok(Some(idx));
        }
        match self.resolve_upval(level - 1, name)? {
            Some(parent_idx) => {
                let idx = self.funcs[level].add_upval(crate::vm::bytecode::UpvalDesc::Parent {
                    name: name.to_string(),
                    idx: parent_idx,
                })?;
                Ok(Some(idx))
            }
            None => Ok(None),
        }
    }
}
