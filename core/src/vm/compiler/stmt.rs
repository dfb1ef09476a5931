//! Statement lowering and block generation.

use anyhow::{Result, bail};

use crate::ast::{AssignTarget, Block, Expr, Stmt};
use crate::val::Const;
use crate::vm::insn::{Insn, Temp};

use super::{Compiler, Loc};

impl Compiler {
    /// Lower a block inside its own lexical scope. The optional trailing
    /// return list lowers to a `Return` over a contiguous run.
    pub(crate) fn gen_block(&mut self, block: &Block) -> Result<()> {
        self.fb().begin_scope();
        let result = self.gen_block_inner(block);
        self.fb().end_scope();
        result
    }

    fn gen_block_inner(&mut self, block: &Block) -> Result<()> {
        for stmt in &block.stmts {
            self.gen_stmt(stmt)?;
        }
        if let Some(ret) = &block.ret {
            self.gen_return(ret)?;
        }
        Ok(())
    }

    fn gen_return(&mut self, exprs: &[Expr]) -> Result<()> {
        if exprs.is_empty() {
            self.fb().emit(Insn::Return {
                start: Temp(0),
                count: 0,
            });
            return Ok(());
        }
        if exprs.len() > u8::MAX as usize {
            bail!("too many return values: {}", exprs.len());
        }
        let mut values = Vec::with_capacity(exprs.len());
        for e in exprs {
            values.push(self.expr(e)?);
        }
        let start = self.fb().alloc();
        for _ in 1..values.len() {
            self.fb().alloc();
        }
        for (i, v) in values.iter().enumerate() {
            self.fb().emit(Insn::Move {
                dst: Temp(start.0 + i as u32),
                src: *v,
            });
        }
        self.fb().emit(Insn::Return {
            start,
            count: exprs.len() as u8,
        });
        Ok(())
    }

    fn gen_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Assign { targets, values } => self.gen_assign(targets, values),
            Stmt::Local { names, values } => self.gen_local(names, values),
            Stmt::If { arms, else_body } => self.gen_if(arms, else_body.as_ref()),
            Stmt::While { cond, body } => self.gen_while(cond, body),
            Stmt::NumericFor {
                var,
                start,
                limit,
                step,
                body,
            } => self.gen_numeric_for(var, start, limit, step.as_ref(), body),
            Stmt::Function { name, local, func } => {
                if *local {
                    // The name is bound before the body compiles, so the
                    // body resolves it to this slot rather than a global.
                    let slot = self.fb().define_local(name);
                    let f = self.lower_function(func, Some(name))?;
                    self.fb().emit(Insn::Move { dst: slot, src: f });
                } else {
                    let f = self.lower_function(func, Some(name))?;
                    let name = self.fb().k(Const::Str(name.as_str().into()))?;
                    self.fb().emit(Insn::SetGlobal { name, src: f });
                }
                Ok(())
            }
            Stmt::Call(e) => match e {
                Expr::Call { callee, args } => {
                    self.lower_call(callee, args, 0)?;
                    Ok(())
                }
                Expr::MethodCall { obj, name, args } => {
                    self.lower_method_call(obj, name, args, 0)?;
                    Ok(())
                }
                _ => bail!("expression statement must be a call"),
            },
        }
    }

    /// Multi-target assignment. A single call feeding several targets
    /// distributes its return values; otherwise values pair with targets
    /// positionally, missing values filling in as nil.
    fn gen_assign(&mut self, targets: &[AssignTarget], values: &[Expr]) -> Result<()> {
        if targets.len() > u8::MAX as usize {
            bail!("too many assignment targets: {}", targets.len());
        }
        if values.len() == 1
            && targets.len() > 1
            && matches!(values[0], Expr::Call { .. } | Expr::MethodCall { .. })
        {
            let base = self.gen_multi_call(&values[0], targets.len() as u8)?;
            for (i, target) in targets.iter().enumerate() {
                self.assign_to(target, Temp(base.0 + i as u32))?;
            }
            return Ok(());
        }

        // Values evaluate left to right before any target is written;
        // surplus values still run for their side effects.
        let mut slots = Vec::with_capacity(targets.len());
        for (i, value) in values.iter().enumerate() {
            let v = self.expr(value)?;
            if i < targets.len() {
                slots.push(v);
            }
        }
        while slots.len() < targets.len() {
            slots.push(self.load_nil()?);
        }
        for (target, slot) in targets.iter().zip(slots) {
            self.assign_to(target, slot)?;
        }
        Ok(())
    }

    fn gen_local(&mut self, names: &[String], values: &[Expr]) -> Result<()> {
        if names.len() > u8::MAX as usize {
            bail!("too many local bindings: {}", names.len());
        }
        if values.len() == 1
            && names.len() > 1
            && matches!(values[0], Expr::Call { .. } | Expr::MethodCall { .. })
        {
            let base = self.gen_multi_call(&values[0], names.len() as u8)?;
            for (i, name) in names.iter().enumerate() {
                let slot = self.fb().define_local(name);
                self.fb().emit(Insn::Move {
                    dst: slot,
                    src: Temp(base.0 + i as u32),
                });
            }
            return Ok(());
        }

        // Initializers run before the names come into scope, so
        // `local x = x` reads the outer binding.
        let mut slots = Vec::with_capacity(names.len());
        for (i, value) in values.iter().enumerate() {
            let v = self.expr(value)?;
            if i < names.len() {
                slots.push(v);
            }
        }
        while slots.len() < names.len() {
            slots.push(self.load_nil()?);
        }
        for (name, slot) in names.iter().zip(slots) {
            let dst = self.fb().define_local(name);
            self.fb().emit(Insn::Move { dst, src: slot });
        }
        Ok(())
    }

    fn gen_multi_call(&mut self, call: &Expr, retc: u8) -> Result<Temp> {
        match call {
            Expr::Call { callee, args } => self.lower_call(callee, args, retc),
            Expr::MethodCall { obj, name, args } => self.lower_method_call(obj, name, args, retc),
            _ => bail!("expected a call expression"),
        }
    }

    fn assign_to(&mut self, target: &AssignTarget, src: Temp) -> Result<()> {
        match target {
            AssignTarget::Name(name) => match self.resolve(name)? {
                Loc::Local(dst) => {
                    self.fb().emit(Insn::Move { dst, src });
                    Ok(())
                }
                Loc::Upval(upval) => {
                    self.fb().emit(Insn::SetUpval { upval, src });
                    Ok(())
                }
                Loc::Global => {
                    let name = self.fb().k(Const::Str(name.as_str().into()))?;
                    self.fb().emit(Insn::SetGlobal { name, src });
                    Ok(())
                }
            },
            AssignTarget::Index { .. } => {
                bail!("cannot assign to an index expression")
            }
        }
    }

    fn load_nil(&mut self) -> Result<Temp> {
        let t = self.fb().alloc();
        self.fb().emit(Insn::LoadNil { start: t, end: t });
        Ok(t)
    }

    /// Each arm tests its condition and jumps over its body to the next
    /// arm when false; every body ends with a jump to the common end.
    fn gen_if(&mut self, arms: &[(Expr, Block)], else_body: Option<&Block>) -> Result<()> {
        let mut exits = Vec::with_capacity(arms.len());
        for (cond, body) in arms {
            let c = self.expr(cond)?;
            self.fb().emit(Insn::Test {
                src: c,
                expected: false,
            });
            let next_arm = self.fb().emit(Insn::Jump { offset: 0 });
            self.gen_block(body)?;
            exits.push(self.fb().emit(Insn::Jump { offset: 0 }));
            self.fb().patch_jump(next_arm)?;
        }
        if let Some(body) = else_body {
            self.gen_block(body)?;
        }
        for exit in exits {
            self.fb().patch_jump(exit)?;
        }
        Ok(())
    }

    fn gen_while(&mut self, cond: &Expr, body: &Block) -> Result<()> {
        let top = self.fb().here();
        let c = self.expr(cond)?;
        self.fb().emit(Insn::Test {
            src: c,
            expected: false,
        });
        let exit = self.fb().emit(Insn::Jump { offset: 0 });
        self.gen_block(body)?;
        let back = self.fb().here();
        self.fb().emit(Insn::Jump {
            offset: top as i32 - (back as i32 + 1),
        });
        self.fb().patch_jump(exit)?;
        Ok(())
    }

    /// Numeric for over the 4-register window {index, limit, step, var}.
    /// `ForPrep` biases the index down one step and enters at the paired
    /// `ForLoop`; the loop variable is a scoped local at `base + 3`.
    fn gen_numeric_for(
        &mut self,
        var: &str,
        start: &Expr,
        limit: &Expr,
        step: Option<&Expr>,
        body: &Block,
    ) -> Result<()> {
        let start_v = self.expr(start)?;
        let limit_v = self.expr(limit)?;
        let step_v = match step {
            Some(e) => self.expr(e)?,
            None => {
                let one = self.fb().k(Const::Num(1.0))?;
                let t = self.fb().alloc();
                self.fb().emit(Insn::LoadK { dst: t, k: one });
                t
            }
        };

        self.fb().begin_scope();
        let base = self.fb().alloc();
        let limit_slot = self.fb().alloc();
        let step_slot = self.fb().alloc();
        let var_slot = self.fb().define_local(var);
        debug_assert_eq!(var_slot.0, base.0 + 3);
        self.fb().emit(Insn::Move {
            dst: base,
            src: start_v,
        });
        self.fb().emit(Insn::Move {
            dst: limit_slot,
            src: limit_v,
        });
        self.fb().emit(Insn::Move {
            dst: step_slot,
            src: step_v,
        });

        let prep = self.fb().emit(Insn::ForPrep {
            base,
            end_offset: 0,
        });
        let body_top = self.fb().here();
        self.gen_block(body)?;
        let loop_pos = self.fb().here();
        self.fb().emit(Insn::ForLoop {
            base,
            start_offset: body_top as i32 - (loop_pos as i32 + 1),
        });
        self.fb().patch_for_prep(prep, loop_pos)?;
        self.fb().end_scope();
        Ok(())
    }
}
