//! Per-call activation frames.

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{Result, bail};

use crate::val::Value;
use crate::vm::bytecode::Proto;
use crate::vm::insn::{Insn, KIdx, RK, Reg};

/// The mutable state of one invocation: a register file sized to the
/// prototype's budget, an instruction pointer, the captured upvalue
/// cells, and a buffer the `Return` instruction fills for the caller.
pub struct Frame {
    pub proto: Rc<Proto>,
    pub upvals: Vec<Rc<RefCell<Value>>>,
    regs: Vec<Value>,
    pub pc: usize,
    /// Caller register where returned values land.
    pub(crate) ret_dst: u16,
    /// How many result slots the caller expects filled.
    pub(crate) ret_expect: u8,
    pub(crate) ret_buf: Vec<Value>,
}

impl Frame {
    pub fn new(
        proto: Rc<Proto>,
        upvals: Vec<Rc<RefCell<Value>>>,
        args: Vec<Value>,
        ret_dst: u16,
        ret_expect: u8,
    ) -> Self {
        let mut regs = vec![Value::Nil; proto.n_regs as usize];
        // Arguments land in the parameter registers; extras are dropped
        // and missing parameters stay nil.
        let n = args.len().min(proto.n_params as usize);
        for (slot, arg) in regs.iter_mut().zip(args.into_iter().take(n)) {
            *slot = arg;
        }
        Self {
            proto,
            upvals,
            regs,
            pc: 0,
            ret_dst,
            ret_expect,
            ret_buf: Vec::new(),
        }
    }

    /// Read the next instruction and advance the instruction pointer.
    pub fn fetch(&mut self) -> Result<Insn<Reg>> {
        match self.proto.code.get(self.pc) {
            Some(insn) => {
                self.pc += 1;
                Ok(*insn)
            }
            None => bail!(
                "instruction pointer {} past end of code ({})",
                self.pc,
                self.proto.code.len()
            ),
        }
    }

    pub fn r(&self, reg: Reg) -> Result<&Value> {
        match self.regs.get(reg.0 as usize) {
            Some(v) => Ok(v),
            None => bail!("register {} out of range (budget {})", reg.0, self.regs.len()),
        }
    }

    pub fn set(&mut self, reg: Reg, value: Value) -> Result<()> {
        match self.regs.get_mut(reg.0 as usize) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => bail!("register {} out of range (budget {})", reg.0, self.regs.len()),
        }
    }

    /// Register peek without an error path, for disassembly annotation.
    pub fn reg(&self, idx: u16) -> Option<&Value> {
        self.regs.get(idx as usize)
    }

    pub fn k(&self, k: KIdx) -> Result<Value> {
        match self.proto.consts.get(k.0 as usize) {
            Some(c) => Ok(c.to_value()),
            None => bail!("constant {} out of range (pool {})", k.0, self.proto.consts.len()),
        }
    }

    pub fn k_str(&self, k: KIdx) -> Result<Rc<str>> {
        match self.proto.consts.get(k.0 as usize).and_then(|c| c.as_str()) {
            Some(s) => Ok(s.into()),
            None => bail!("constant {} is not a string", k.0),
        }
    }

    /// Resolve a register-or-constant operand to a value.
    pub fn rk(&self, operand: RK<Reg>) -> Result<Value> {
        match operand {
            RK::R(r) => Ok(self.r(r)?.clone()),
            RK::K(k) => self.k(k),
        }
    }
}
