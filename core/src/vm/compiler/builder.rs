//! Per-function generation state: code buffer, constant pool, temporary
//! allocator, lexical scopes, and upvalue descriptors.

use anyhow::{Result, bail};
use rustc_hash::FxHashMap;

use crate::val::Const;
use crate::vm::bytecode::{Proto, ProtoDebug, UpvalDesc};
use crate::vm::insn::{Insn, KIdx, Reg, Temp};

struct LocalVar {
    name: String,
    temp: Temp,
    depth: u32,
}

pub(crate) struct FuncBuilder {
    code: Vec<Insn<Temp>>,
    consts: Vec<Const>,
    const_index: FxHashMap<Const, u16>,
    /// Monotonically increasing; temporaries are never reused during
    /// generation. The final allocation pass maps each 1:1 to a register.
    next_temp: u32,
    locals: Vec<LocalVar>,
    scope_depth: u32,
    upvals: Vec<UpvalDesc>,
    pub(crate) protos: Vec<std::rc::Rc<Proto>>,
    n_params: u16,
}

impl FuncBuilder {
    pub fn with_params(params: &[String]) -> Result<Self> {
        if params.len() > u16::MAX as usize {
            bail!("too many parameters: {}", params.len());
        }
        let mut fb = Self {
            code: Vec::new(),
            consts: Vec::new(),
            const_index: FxHashMap::default(),
            next_temp: 0,
            locals: Vec::new(),
            scope_depth: 0,
            upvals: Vec::new(),
            protos: Vec::new(),
            n_params: params.len() as u16,
        };
        // Parameters occupy the first registers so the frame can copy call
        // arguments straight into them.
        for p in params {
            fb.define_local(p);
        }
        Ok(fb)
    }

    pub fn here(&self) -> usize {
        self.code.len()
    }

    /// Append an instruction, returning its position for later patching.
    pub fn emit(&mut self, insn: Insn<Temp>) -> usize {
        self.code.push(insn);
        self.code.len() - 1
    }

    pub fn alloc(&mut self) -> Temp {
        let t = Temp(self.next_temp);
        self.next_temp += 1;
        t
    }

    /// Pool a constant, deduplicating by value.
    pub fn k(&mut self, c: Const) -> Result<KIdx> {
        if let Some(&i) = self.const_index.get(&c) {
            return Ok(KIdx(i));
        }
        if self.consts.len() > u16::MAX as usize {
            bail!("constant pool overflow");
        }
        let i = self.consts.len() as u16;
        self.consts.push(c.clone());
        self.const_index.insert(c, i);
        Ok(KIdx(i))
    }

    pub fn begin_scope(&mut self) {
        self.scope_depth += 1;
    }

    pub fn end_scope(&mut self) {
        self.scope_depth -= 1;
        while matches!(self.locals.last(), Some(l) if l.depth > self.scope_depth) {
            self.locals.pop();
        }
    }

    /// Bind `name` to a fresh temporary in the current scope. Shadowing an
    /// outer binding is fine; the newest binding wins on lookup.
    pub fn define_local(&mut self, name: &str) -> Temp {
        let temp = self.alloc();
        self.locals.push(LocalVar {
            name: name.to_string(),
            temp,
            depth: self.scope_depth,
        });
        temp
    }

    pub fn lookup_local(&self, name: &str) -> Option<Temp> {
        self.locals
            .iter()
            .rev()
            .find(|l| l.name == name)
            .map(|l| l.temp)
    }

    pub fn find_upval(&self, name: &str) -> Option<u16> {
        self.upvals
            .iter()
            .position(|u| u.name() == name)
            .map(|i| i as u16)
    }

    pub fn add_upval(&mut self, desc: UpvalDesc) -> Result<u16> {
        if self.upvals.len() >= u16::MAX as usize {
            bail!("too many upvalues");
        }
        self.upvals.push(desc);
        Ok((self.upvals.len() - 1) as u16)
    }

    /// Rewrite a placeholder `Jump` at `pos` to land on the next emitted
    /// instruction.
    pub fn patch_jump(&mut self, pos: usize) -> Result<()> {
        let target = self.code.len() as i32;
        match self.code.get_mut(pos) {
            Some(Insn::Jump { offset }) => {
                *offset = target - (pos as i32 + 1);
                Ok(())
            }
            _ => bail!("jump patch target at {} is not a jump", pos),
        }
    }

    /// Point a `ForPrep` at the `ForLoop` emitted at `loop_pos`.
    pub fn patch_for_prep(&mut self, prep_pos: usize, loop_pos: usize) -> Result<()> {
        match self.code.get_mut(prep_pos) {
            Some(Insn::ForPrep { end_offset, .. }) => {
                *end_offset = loop_pos as i32 - (prep_pos as i32 + 1);
                Ok(())
            }
            _ => bail!("for-prep patch target at {} is not a ForPrep", prep_pos),
        }
    }

    /// The allocation pass: map every temporary 1:1 onto a register and
    /// record the register budget. After this no `Temp` operand exists.
    pub fn finish(self, debug: Option<ProtoDebug>) -> Result<Proto> {
        if self.next_temp > u16::MAX as u32 {
            bail!(
                "function needs {} registers, limit is {}",
                self.next_temp,
                u16::MAX
            );
        }
        let code = self
            .code
            .into_iter()
            .map(|insn| insn.map_regs(|t| Reg(t.0 as u16)))
            .collect();
        Ok(Proto {
            code,
            consts: self.consts,
            protos: self.protos,
            n_regs: self.next_temp as u16,
            n_params: self.n_params,
            upvals: self.upvals,
            debug,
        })
    }
}
