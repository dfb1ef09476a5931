//! The fetch-decode-execute engine and call-stack management.

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{Result, bail};
use tracing::{debug, trace};

use crate::ast::Block;
use crate::val::{Closure, Table, Value};
use crate::vm::bytecode::{Proto, UpvalDesc};
use crate::vm::compiler::compile_block;
use crate::vm::frame::Frame;
use crate::vm::insn::{Insn, RK, Reg};

/// Call-stack depth limit; recursion past this is a runtime error rather
/// than a host stack overflow.
const MAX_DEPTH: usize = 1024;

/// The virtual machine: a global table plus a stack of activation frames,
/// last-is-current.
pub struct Vm {
    pub globals: Rc<RefCell<Table>>,
    frames: Vec<Frame>,
    root_ret: Vec<Value>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        Self {
            globals: Rc::new(RefCell::new(Table::new())),
            frames: Vec::new(),
            root_ret: Vec::new(),
        }
    }

    pub fn set_global(&self, name: &str, value: Value) {
        self.globals.borrow_mut().set_str(name, value);
    }

    pub fn get_global(&self, name: &str) -> Value {
        self.globals.borrow().get_str(name)
    }

    /// Compile and run a top-level block, returning its return values.
    pub fn exec(&mut self, block: &Block) -> Result<Vec<Value>> {
        let proto = Rc::new(compile_block(block)?);
        self.run(&proto)
    }

    /// Drive a prototype to completion as the root frame. A fatal error
    /// unwinds here with the remaining frames discarded.
    pub fn run(&mut self, proto: &Rc<Proto>) -> Result<Vec<Value>> {
        self.frames.clear();
        self.root_ret.clear();
        self.frames
            .push(Frame::new(Rc::clone(proto), Vec::new(), Vec::new(), 0, 0));
        while !self.frames.is_empty() {
            if let Err(e) = self.step() {
                self.frames.clear();
                return Err(e);
            }
        }
        Ok(std::mem::take(&mut self.root_ret))
    }

    fn frame(&self) -> Result<&Frame> {
        match self.frames.last() {
            Some(f) => Ok(f),
            None => bail!("no active frame"),
        }
    }

    fn frame_mut(&mut self) -> Result<&mut Frame> {
        match self.frames.last_mut() {
            Some(f) => Ok(f),
            None => bail!("no active frame"),
        }
    }

    /// Push a frame for `closure`. Arguments were already copied out of
    /// the caller, so the caller's registers stay untouched until the
    /// callee returns.
    pub fn push_context(
        &mut self,
        closure: Rc<Closure>,
        args: Vec<Value>,
        ret_dst: u16,
        ret_expect: u8,
    ) -> Result<()> {
        if self.frames.len() >= MAX_DEPTH {
            bail!("stack overflow (depth {})", MAX_DEPTH);
        }
        debug!(
            depth = self.frames.len() + 1,
            name = closure.proto.debug.as_ref().and_then(|d| d.name.as_deref()),
            "push context"
        );
        self.frames.push(Frame::new(
            Rc::clone(&closure.proto),
            closure.upvals.clone(),
            args,
            ret_dst,
            ret_expect,
        ));
        Ok(())
    }

    /// Pop the current frame and propagate its return buffer into the
    /// caller's result slots, padding with nil and discarding extras. The
    /// root frame's values go to the run result instead.
    pub fn pop_context(&mut self) -> Result<()> {
        let done = match self.frames.pop() {
            Some(f) => f,
            None => bail!("no active frame"),
        };
        debug!(depth = self.frames.len(), "pop context");
        match self.frames.last_mut() {
            Some(caller) => {
                for i in 0..done.ret_expect as usize {
                    let v = done.ret_buf.get(i).cloned().unwrap_or(Value::Nil);
                    let slot = match done.ret_dst.checked_add(i as u16) {
                        Some(s) => Reg(s),
                        None => bail!("return slot out of range"),
                    };
                    caller.set(slot, v)?;
                }
            }
            None => self.root_ret = done.ret_buf,
        }
        Ok(())
    }

    /// Execute one instruction of the current frame.
    pub fn step(&mut self) -> Result<()> {
        let insn = self.frame_mut()?.fetch()?;
        trace!(op = insn.opcode(), pc = self.frame()?.pc - 1, "step");
        match insn {
            Insn::Move { dst, src } => {
                let frame = self.frame_mut()?;
                let v = frame.r(src)?.clone();
                frame.set(dst, v)?;
            }
            Insn::LoadK { dst, k } => {
                let frame = self.frame_mut()?;
                let v = frame.k(k)?;
                frame.set(dst, v)?;
            }
            Insn::LoadBool { dst, value, skip } => {
                let frame = self.frame_mut()?;
                frame.set(dst, Value::Bool(value))?;
                if skip {
                    frame.pc += 1;
                }
            }
            Insn::LoadNil { start, end } => {
                let frame = self.frame_mut()?;
                for i in start.0..=end.0 {
                    frame.set(Reg(i), Value::Nil)?;
                }
            }

            Insn::GetGlobal { dst, name } => {
                let name = self.frame()?.k_str(name)?;
                let v = self.globals.borrow().get_str(&name);
                self.frame_mut()?.set(dst, v)?;
            }
            Insn::SetGlobal { name, src } => {
                let frame = self.frame()?;
                let name = frame.k_str(name)?;
                let v = frame.r(src)?.clone();
                self.globals.borrow_mut().set_str(&name, v);
            }
            Insn::GetUpval { dst, upval } => {
                let frame = self.frame_mut()?;
                let v = match frame.upvals.get(upval as usize) {
                    Some(cell) => cell.borrow().clone(),
                    None => bail!("upvalue {} out of range", upval),
                };
                frame.set(dst, v)?;
            }
            Insn::SetUpval { upval, src } => {
                let frame = self.frame()?;
                let v = frame.r(src)?.clone();
                match frame.upvals.get(upval as usize) {
                    Some(cell) => *cell.borrow_mut() = v,
                    None => bail!("upvalue {} out of range", upval),
                }
            }

            Insn::NewTable { dst } => {
                self.frame_mut()?.set(dst, Value::table(Table::new()))?;
            }
            Insn::GetTable { dst, obj, key } => {
                let frame = self.frame()?;
                let key = frame.rk(key)?;
                let v = match frame.r(obj)? {
                    Value::Table(t) => t.borrow().get(&key),
                    other => bail!("attempt to index a {} value", other.type_name()),
                };
                self.frame_mut()?.set(dst, v)?;
            }
            Insn::SetTable { obj, key, value } => {
                let frame = self.frame()?;
                let key = frame.rk(key)?;
                let value = frame.rk(value)?;
                match frame.r(obj)? {
                    Value::Table(t) => t.borrow_mut().set(key, value)?,
                    other => bail!("attempt to index a {} value", other.type_name()),
                }
            }
            Insn::SelfGet { dst, obj, field } => {
                let frame = self.frame()?;
                let key = frame.rk(field)?;
                let receiver = frame.r(obj)?.clone();
                let method = match &receiver {
                    Value::Table(t) => t.borrow().get(&key),
                    other => bail!("attempt to index a {} value", other.type_name()),
                };
                let frame = self.frame_mut()?;
                frame.set(dst, method)?;
                let next = match dst.0.checked_add(1) {
                    Some(n) => Reg(n),
                    None => bail!("register {} out of range", dst.0),
                };
                frame.set(next, receiver)?;
            }

            Insn::Add { dst, lhs, rhs } => self.arith(dst, lhs, rhs, |a, b| a + b)?,
            Insn::Sub { dst, lhs, rhs } => self.arith(dst, lhs, rhs, |a, b| a - b)?,
            Insn::Mul { dst, lhs, rhs } => self.arith(dst, lhs, rhs, |a, b| a * b)?,
            Insn::Div { dst, lhs, rhs } => self.arith(dst, lhs, rhs, |a, b| a / b)?,
            Insn::Mod { dst, lhs, rhs } => {
                // Floored modulo: the result takes the divisor's sign.
                self.arith(dst, lhs, rhs, |a, b| a - (a / b).floor() * b)?
            }
            Insn::Pow { dst, lhs, rhs } => self.arith(dst, lhs, rhs, f64::powf)?,

            Insn::Neg { dst, src } => {
                let frame = self.frame()?;
                let v = frame.r(src)?;
                let n = match v.as_num() {
                    Some(n) => n,
                    None => bail!("attempt to perform arithmetic on a {} value", v.type_name()),
                };
                self.frame_mut()?.set(dst, Value::Num(-n))?;
            }
            Insn::Not { dst, src } => {
                let frame = self.frame_mut()?;
                let v = Value::Bool(!frame.r(src)?.truthy());
                frame.set(dst, v)?;
            }
            Insn::Len { dst, src } => {
                let frame = self.frame()?;
                let n = match frame.r(src)? {
                    Value::Str(s) => s.len() as f64,
                    Value::Table(t) => t.borrow().len() as f64,
                    other => bail!("attempt to get length of a {} value", other.type_name()),
                };
                self.frame_mut()?.set(dst, Value::Num(n))?;
            }

            Insn::Concat { dst, start, end } => {
                let frame = self.frame()?;
                let mut out = String::new();
                for i in start.0..=end.0 {
                    let v = frame.r(Reg(i))?;
                    match v.as_coerced_str() {
                        Some(s) => out.push_str(&s),
                        None => bail!("attempt to concatenate a {} value", v.type_name()),
                    }
                }
                self.frame_mut()?.set(dst, Value::Str(out.into()))?;
            }

            Insn::Jump { offset } => {
                let frame = self.frame_mut()?;
                frame.pc = offset_pc(frame.pc, offset)?;
            }
            Insn::Eq { cond, lhs, rhs } => {
                let frame = self.frame()?;
                // No coercion: values of different types are unequal.
                let result = frame.rk(lhs)? == frame.rk(rhs)?;
                if result == cond {
                    self.frame_mut()?.pc += 1;
                }
            }
            Insn::Lt { cond, lhs, rhs } => {
                let result = self.order(lhs, rhs, |o| o == std::cmp::Ordering::Less)?;
                if result == cond {
                    self.frame_mut()?.pc += 1;
                }
            }
            Insn::Le { cond, lhs, rhs } => {
                let result = self.order(lhs, rhs, |o| o != std::cmp::Ordering::Greater)?;
                if result == cond {
                    self.frame_mut()?.pc += 1;
                }
            }
            Insn::Test { src, expected } => {
                let frame = self.frame_mut()?;
                if frame.r(src)?.truthy() != expected {
                    frame.pc += 1;
                }
            }
            Insn::TestSet { dst, src, expected } => {
                let frame = self.frame_mut()?;
                let v = frame.r(src)?.clone();
                if v.truthy() == expected {
                    frame.pc += 1;
                } else {
                    frame.set(dst, v)?;
                }
            }

            Insn::Call { func, argc, retc } => {
                let frame = self.frame()?;
                let callee = match frame.r(func)? {
                    Value::Function(c) => Rc::clone(c),
                    other => bail!("attempt to call a {} value", other.type_name()),
                };
                let mut args = Vec::with_capacity(argc as usize);
                for i in 0..argc as u16 {
                    let slot = match func.0.checked_add(1 + i) {
                        Some(s) => Reg(s),
                        None => bail!("argument register out of range"),
                    };
                    args.push(frame.r(slot)?.clone());
                }
                self.push_context(callee, args, func.0, retc)?;
            }
            Insn::Return { start, count } => {
                let frame = self.frame_mut()?;
                let mut values = Vec::with_capacity(count as usize);
                for i in 0..count as u16 {
                    let slot = match start.0.checked_add(i) {
                        Some(s) => Reg(s),
                        None => bail!("return register out of range"),
                    };
                    values.push(frame.r(slot)?.clone());
                }
                frame.ret_buf = values;
                self.pop_context()?;
            }

            Insn::ForPrep { base, end_offset } => {
                let frame = self.frame_mut()?;
                let (index, _, step) = for_window(frame, base)?;
                // Bias one step down so the paired ForLoop's increment
                // lands on the start value for the first iteration.
                frame.set(base, Value::Num(index - step))?;
                frame.pc = offset_pc(frame.pc, end_offset)?;
            }
            Insn::ForLoop { base, start_offset } => {
                let frame = self.frame_mut()?;
                let (index, limit, step) = for_window(frame, base)?;
                let next = index + step;
                frame.set(base, Value::Num(next))?;
                // Zero step counts as forward so `for i = 1, 0, 0` exits
                // immediately instead of spinning.
                let live = if step >= 0.0 { next <= limit } else { next >= limit };
                if live {
                    let var = match base.0.checked_add(3) {
                        Some(v) => Reg(v),
                        None => bail!("loop register out of range"),
                    };
                    frame.set(var, Value::Num(next))?;
                    frame.pc = offset_pc(frame.pc, start_offset)?;
                }
            }

            Insn::Closure { dst, proto } => self.make_closure(dst, proto)?,
        }
        Ok(())
    }

    fn arith(
        &mut self,
        dst: Reg,
        lhs: RK<Reg>,
        rhs: RK<Reg>,
        f: impl Fn(f64, f64) -> f64,
    ) -> Result<()> {
        let frame = self.frame()?;
        let a = frame.rk(lhs)?;
        let b = frame.rk(rhs)?;
        let (x, y) = match (a.as_num(), b.as_num()) {
            (Some(x), Some(y)) => (x, y),
            (None, _) => bail!("attempt to perform arithmetic on a {} value", a.type_name()),
            (_, None) => bail!("attempt to perform arithmetic on a {} value", b.type_name()),
        };
        self.frame_mut()?.set(dst, Value::Num(f(x, y)))?;
        Ok(())
    }

    /// Ordering for `Lt`/`Le`: numbers compare numerically (any NaN
    /// operand compares false), strings lexicographically, and anything
    /// else is a type error.
    fn order(
        &self,
        lhs: RK<Reg>,
        rhs: RK<Reg>,
        f: impl Fn(std::cmp::Ordering) -> bool,
    ) -> Result<bool> {
        let frame = self.frame()?;
        let a = frame.rk(lhs)?;
        let b = frame.rk(rhs)?;
        match (&a, &b) {
            (Value::Num(x), Value::Num(y)) => Ok(x.partial_cmp(y).is_some_and(&f)),
            (Value::Str(x), Value::Str(y)) => Ok(f(x.cmp(y))),
            _ => bail!(
                "attempt to compare {} with {}",
                a.type_name(),
                b.type_name()
            ),
        }
    }

    /// Instantiate a nested prototype, consuming one capture
    /// pseudo-instruction per declared upvalue.
    fn make_closure(&mut self, dst: Reg, proto: u16) -> Result<()> {
        let frame = self.frame_mut()?;
        let inner = match frame.proto.protos.get(proto as usize) {
            Some(p) => Rc::clone(p),
            None => bail!("nested prototype {} out of range", proto),
        };
        let mut cells = Vec::with_capacity(inner.upvals.len());
        for desc in &inner.upvals {
            let capture = frame.fetch()?;
            match (desc, capture) {
                (UpvalDesc::Local { .. }, Insn::Move { src, .. }) => {
                    cells.push(Rc::new(RefCell::new(frame.r(src)?.clone())));
                }
                (UpvalDesc::Parent { .. }, Insn::GetUpval { upval, .. }) => {
                    match frame.upvals.get(upval as usize) {
                        Some(cell) => cells.push(Rc::clone(cell)),
                        None => bail!("upvalue {} out of range", upval),
                    }
                }
                (_, other) => bail!(
                    "malformed capture sequence: expected Move/GetUpval, found {}",
                    other.opcode()
                ),
            }
        }
        let closure = Closure::new(inner, cells);
        frame.set(dst, Value::Function(Rc::new(closure)))?;
        Ok(())
    }
}

/// Apply a relative jump offset to an already-advanced instruction
/// pointer.
fn offset_pc(pc: usize, offset: i32) -> Result<usize> {
    match pc.checked_add_signed(offset as isize) {
        Some(target) => Ok(target),
        None => bail!("jump offset {} out of range at pc {}", offset, pc),
    }
}

/// Read the numeric for window {index, limit, step} at `base`.
fn for_window(frame: &Frame, base: Reg) -> Result<(f64, f64, f64)> {
    let mut out = [0.0; 3];
    for (i, slot) in out.iter_mut().enumerate() {
        let reg = match base.0.checked_add(i as u16) {
            Some(r) => Reg(r),
            None => bail!("loop register out of range"),
        };
        let v = frame.r(reg)?;
        *slot = match v.as_num() {
            Some(n) => n,
            None => bail!("'for' {} must be a number", ["initial value", "limit", "step"][i]),
        };
    }
    Ok((out[0], out[1], out[2]))
}
