//! Expression lowering. Every expression lowers to instructions appended
//! to the current builder plus a destination temporary; operands are
//! generated before the operator that consumes them, left to right.

use std::rc::Rc;

use anyhow::{Result, bail};

use crate::ast::{Expr, FuncBody, TableItem};
use crate::op::{BinOp, UnOp};
use crate::val::Const;
use crate::vm::bytecode::{ProtoDebug, UpvalDesc};
use crate::vm::insn::{Insn, RK, Temp};

use super::{Compiler, Loc};

impl Compiler {
    /// Lower an expression, returning the temporary holding its value.
    pub(crate) fn expr(&mut self, e: &Expr) -> Result<Temp> {
        match e {
            Expr::Const(c) => {
                let k = self.fb().k(c.clone())?;
                let dst = self.fb().alloc();
                self.fb().emit(Insn::LoadK { dst, k });
                Ok(dst)
            }
            Expr::Name(name) => match self.resolve(name)? {
                Loc::Local(t) => Ok(t),
                Loc::Upval(upval) => {
                    let dst = self.fb().alloc();
                    self.fb().emit(Insn::GetUpval { dst, upval });
                    Ok(dst)
                }
                Loc::Global => {
                    let name = self.fb().k(Const::Str(name.as_str().into()))?;
                    let dst = self.fb().alloc();
                    self.fb().emit(Insn::GetGlobal { dst, name });
                    Ok(dst)
                }
            },
            Expr::Un(op, inner) => {
                let src = self.expr(inner)?;
                let dst = self.fb().alloc();
                let insn = match op {
                    UnOp::Neg => Insn::Neg { dst, src },
                    UnOp::Not => Insn::Not { dst, src },
                    UnOp::Len => Insn::Len { dst, src },
                };
                self.fb().emit(insn);
                Ok(dst)
            }
            Expr::Bin(l, op, r) if op.is_arith() => {
                let lhs = self.expr_rk(l)?;
                let rhs = self.expr_rk(r)?;
                let dst = self.fb().alloc();
                let insn = match op {
                    BinOp::Add => Insn::Add { dst, lhs, rhs },
                    BinOp::Sub => Insn::Sub { dst, lhs, rhs },
                    BinOp::Mul => Insn::Mul { dst, lhs, rhs },
                    BinOp::Div => Insn::Div { dst, lhs, rhs },
                    BinOp::Mod => Insn::Mod { dst, lhs, rhs },
                    _ => Insn::Pow { dst, lhs, rhs },
                };
                self.fb().emit(insn);
                Ok(dst)
            }
            Expr::Bin(l, op, r) if op.is_cmp() => self.lower_cmp(*op, l, r),
            Expr::Bin(l, op, r) if op.is_lazy() => self.lower_lazy(*op, l, r),
            Expr::Bin(_, BinOp::Concat, _) => self.lower_concat(e),
            // Unreachable: the guards above cover every BinOp. Kept total
            // so a new operator fails loudly instead of panicking.
            Expr::Bin(_, op, _) => bail!("unsupported binary operator {op}"),
            Expr::Table(items) => self.lower_table(items),
            Expr::Index { obj, key } => {
                let obj = self.expr(obj)?;
                let key = self.expr_rk(key)?;
                let dst = self.fb().alloc();
                self.fb().emit(Insn::GetTable { dst, obj, key });
                Ok(dst)
            }
            Expr::Call { callee, args } => self.lower_call(callee, args, 1),
            Expr::MethodCall { obj, name, args } => self.lower_method_call(obj, name, args, 1),
            Expr::Function(body) => self.lower_function(body, None),
        }
    }

    /// Lower an expression into a register-or-constant operand: literal
    /// constants become pool references without a `LoadK`.
    pub(crate) fn expr_rk(&mut self, e: &Expr) -> Result<RK<Temp>> {
        match e {
            Expr::Const(c) => Ok(RK::K(self.fb().k(c.clone())?)),
            other => Ok(RK::R(self.expr(other)?)),
        }
    }

    /// Comparisons lower to a conditional skip plus two `LoadBool`s that
    /// materialize the result. `>`/`>=` reuse `Lt`/`Le` with swapped
    /// operands; `~=` is `Eq` with inverted polarity.
    fn lower_cmp(&mut self, op: BinOp, l: &Expr, r: &Expr) -> Result<Temp> {
        let lhs = self.expr_rk(l)?;
        let rhs = self.expr_rk(r)?;
        let dst = self.fb().alloc();
        let insn = match op {
            BinOp::Eq => Insn::Eq { cond: true, lhs, rhs },
            BinOp::Ne => Insn::Eq { cond: false, lhs, rhs },
            BinOp::Lt => Insn::Lt { cond: true, lhs, rhs },
            BinOp::Le => Insn::Le { cond: true, lhs, rhs },
            BinOp::Gt => Insn::Lt { cond: true, lhs: rhs, rhs: lhs },
            _ => Insn::Le { cond: true, lhs: rhs, rhs: lhs },
        };
        self.fb().emit(insn);
        self.fb().emit(Insn::LoadBool {
            dst,
            value: false,
            skip: true,
        });
        self.fb().emit(Insn::LoadBool {
            dst,
            value: true,
            skip: false,
        });
        Ok(dst)
    }

    /// `and`/`or`: the right operand's instructions sit behind a jump and
    /// are only reached when the left operand does not decide the result.
    fn lower_lazy(&mut self, op: BinOp, l: &Expr, r: &Expr) -> Result<Temp> {
        let dst = self.fb().alloc();
        let src = self.expr(l)?;
        // `and` short-circuits on a falsey left side, `or` on a truthy one.
        let expected = matches!(op, BinOp::And);
        self.fb().emit(Insn::TestSet { dst, src, expected });
        let done = self.fb().emit(Insn::Jump { offset: 0 });
        let rhs = self.expr(r)?;
        self.fb().emit(Insn::Move { dst, src: rhs });
        self.fb().patch_jump(done)?;
        Ok(dst)
    }

    /// A `..` chain concatenates over one contiguous register run.
    fn lower_concat(&mut self, e: &Expr) -> Result<Temp> {
        fn flatten<'a>(e: &'a Expr, out: &mut Vec<&'a Expr>) {
            match e {
                Expr::Bin(l, BinOp::Concat, r) => {
                    flatten(l, out);
                    flatten(r, out);
                }
                other => out.push(other),
            }
        }
        let mut parts = Vec::new();
        flatten(e, &mut parts);

        let mut values = Vec::with_capacity(parts.len());
        for part in &parts {
            values.push(self.expr(part)?);
        }
        let fb = self.fb();
        let start = fb.alloc();
        for _ in 1..values.len() {
            fb.alloc();
        }
        for (i, v) in values.iter().enumerate() {
            let slot = Temp(start.0 + i as u32);
            self.fb().emit(Insn::Move { dst: slot, src: *v });
        }
        let end = Temp(start.0 + values.len() as u32 - 1);
        let dst = self.fb().alloc();
        self.fb().emit(Insn::Concat { dst, start, end });
        Ok(dst)
    }

    fn lower_table(&mut self, items: &[TableItem]) -> Result<Temp> {
        let dst = self.fb().alloc();
        self.fb().emit(Insn::NewTable { dst });
        for item in items {
            match item {
                TableItem::Positional(value) => {
                    // Positional fields land at the current dense length
                    // plus one, so they stay 1,2,… regardless of keyed
                    // fields mixed into the literal.
                    let len = self.fb().alloc();
                    self.fb().emit(Insn::Len { dst: len, src: dst });
                    let one = self.fb().k(Const::Num(1.0))?;
                    let key = self.fb().alloc();
                    self.fb().emit(Insn::Add {
                        dst: key,
                        lhs: RK::R(len),
                        rhs: RK::K(one),
                    });
                    let value = self.expr_rk(value)?;
                    self.fb().emit(Insn::SetTable {
                        obj: dst,
                        key: RK::R(key),
                        value,
                    });
                }
                TableItem::Named(name, value) => {
                    let key = RK::K(self.fb().k(Const::Str(name.as_str().into()))?);
                    let value = self.expr_rk(value)?;
                    self.fb().emit(Insn::SetTable { obj: dst, key, value });
                }
                TableItem::Keyed(key, value) => {
                    let key = self.expr_rk(key)?;
                    let value = self.expr_rk(value)?;
                    self.fb().emit(Insn::SetTable { obj: dst, key, value });
                }
            }
        }
        Ok(dst)
    }

    /// Calls: callee and arguments are evaluated in order, then moved into
    /// a fresh contiguous run `[callee, arg1, …]`. The run is padded to
    /// `retc` registers so the return write-back stays inside the frame.
    /// Returns the run base, where the first result lands.
    pub(crate) fn lower_call(&mut self, callee: &Expr, args: &[Expr], retc: u8) -> Result<Temp> {
        if args.len() > u8::MAX as usize {
            bail!("too many arguments: {}", args.len());
        }
        let callee = self.expr(callee)?;
        let mut arg_vals = Vec::with_capacity(args.len());
        for a in args {
            arg_vals.push(self.expr(a)?);
        }

        let base = self.fb().alloc();
        self.fb().emit(Insn::Move { dst: base, src: callee });
        for (i, v) in arg_vals.iter().enumerate() {
            let slot = self.fb().alloc();
            debug_assert_eq!(slot.0, base.0 + 1 + i as u32);
            self.fb().emit(Insn::Move { dst: slot, src: *v });
        }
        for _ in (args.len() + 1)..(retc as usize) {
            self.fb().alloc();
        }
        self.fb().emit(Insn::Call {
            func: base,
            argc: args.len() as u8,
            retc,
        });
        Ok(base)
    }

    /// Method calls place the method at the run base via `SelfGet` and the
    /// receiver right behind it as the implicit first argument.
    pub(crate) fn lower_method_call(
        &mut self,
        obj: &Expr,
        name: &str,
        args: &[Expr],
        retc: u8,
    ) -> Result<Temp> {
        if args.len() + 1 > u8::MAX as usize {
            bail!("too many arguments: {}", args.len());
        }
        let obj = self.expr(obj)?;
        let mut arg_vals = Vec::with_capacity(args.len());
        for a in args {
            arg_vals.push(self.expr(a)?);
        }

        let field = RK::K(self.fb().k(Const::Str(name.into()))?);
        let base = self.fb().alloc();
        let receiver = self.fb().alloc();
        debug_assert_eq!(receiver.0, base.0 + 1);
        self.fb().emit(Insn::SelfGet { dst: base, obj, field });
        for (i, v) in arg_vals.iter().enumerate() {
            let slot = self.fb().alloc();
            debug_assert_eq!(slot.0, base.0 + 2 + i as u32);
            self.fb().emit(Insn::Move { dst: slot, src: *v });
        }
        for _ in (args.len() + 2)..(retc as usize) {
            self.fb().alloc();
        }
        self.fb().emit(Insn::Call {
            func: base,
            argc: args.len() as u8 + 1,
            retc,
        });
        Ok(base)
    }

    /// Function literals compile recursively on a fresh builder; the
    /// resulting prototype is registered with the enclosing function and
    /// referenced by `Closure`, followed by one capture pseudo-instruction
    /// per upvalue.
    pub(crate) fn lower_function(&mut self, body: &FuncBody, name: Option<&str>) -> Result<Temp> {
        let debug = name.map(|n| ProtoDebug {
            name: Some(n.to_string()),
        });
        let proto = Rc::new(self.compile_inner(&body.params, &body.body, debug)?);

        let fb = self.fb();
        if fb.protos.len() > u16::MAX as usize {
            bail!("too many nested functions");
        }
        let proto_idx = fb.protos.len() as u16;
        let upvals: Vec<UpvalDesc> = proto.upvals.clone();
        fb.protos.push(proto);

        let dst = self.fb().alloc();
        self.fb().emit(Insn::Closure {
            dst,
            proto: proto_idx,
        });
        for desc in &upvals {
            match desc {
                UpvalDesc::Local { reg, .. } => {
                    self.fb().emit(Insn::Move {
                        dst,
                        src: Temp(reg.0 as u32),
                    });
                }
                UpvalDesc::Parent { idx, .. } => {
                    self.fb().emit(Insn::GetUpval { dst, upval: *idx });
                }
            }
        }
        Ok(dst)
    }
}
