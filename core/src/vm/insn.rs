//! The instruction set: one typed variant per opcode.
//!
//! `Insn` is generic over its register operand type. During code
//! generation instructions carry [`Temp`] placeholders; the final
//! allocation pass maps them to [`Reg`], so a prototype's instruction
//! stream can only ever hold real registers; no temporary survives past
//! generation by construction.

use serde::{Deserialize, Serialize};

/// A register slot in the executing frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reg(pub u16);

/// A generation-time placeholder register, resolved 1:1 to a [`Reg`]
/// once the function's register budget is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Temp(pub u32);

/// An index into the owning prototype's constant pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KIdx(pub u16);

/// A register-or-constant operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RK<R> {
    R(R),
    K(KIdx),
}

impl<R> RK<R> {
    pub fn map<S>(self, f: impl FnOnce(R) -> S) -> RK<S> {
        match self {
            RK::R(r) => RK::R(f(r)),
            RK::K(k) => RK::K(k),
        }
    }
}

/// One bytecode instruction. Every opcode has a fixed operand shape.
/// Jump offsets are relative to the instruction pointer after fetch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Insn<R> {
    // Data movement
    Move { dst: R, src: R },
    LoadK { dst: R, k: KIdx },
    /// Load a boolean; when `skip` is set the next instruction is skipped
    /// (used to materialize comparison results).
    LoadBool { dst: R, value: bool, skip: bool },
    /// Clear the inclusive register range `start..=end`.
    LoadNil { start: R, end: R },

    // Globals and upvalues
    GetGlobal { dst: R, name: KIdx },
    SetGlobal { name: KIdx, src: R },
    GetUpval { dst: R, upval: u16 },
    SetUpval { upval: u16, src: R },

    // Tables
    NewTable { dst: R },
    GetTable { dst: R, obj: R, key: RK<R> },
    SetTable { obj: R, key: RK<R>, value: RK<R> },
    /// Method-call sugar: `dst = obj[field]; dst+1 = obj`.
    SelfGet { dst: R, obj: R, field: RK<R> },

    // Arithmetic
    Add { dst: R, lhs: RK<R>, rhs: RK<R> },
    Sub { dst: R, lhs: RK<R>, rhs: RK<R> },
    Mul { dst: R, lhs: RK<R>, rhs: RK<R> },
    Div { dst: R, lhs: RK<R>, rhs: RK<R> },
    Mod { dst: R, lhs: RK<R>, rhs: RK<R> },
    Pow { dst: R, lhs: RK<R>, rhs: RK<R> },

    // Unary
    Neg { dst: R, src: R },
    Not { dst: R, src: R },
    Len { dst: R, src: R },

    /// Concatenate the inclusive register range `start..=end`.
    Concat { dst: R, start: R, end: R },

    // Control flow
    Jump { offset: i32 },
    /// Skip the next instruction when the comparison result equals `cond`.
    Eq { cond: bool, lhs: RK<R>, rhs: RK<R> },
    Lt { cond: bool, lhs: RK<R>, rhs: RK<R> },
    Le { cond: bool, lhs: RK<R>, rhs: RK<R> },
    /// Skip the next instruction unless truthiness of `src` matches
    /// `expected`.
    Test { src: R, expected: bool },
    /// Short-circuit helper: when truthiness of `src` does NOT match
    /// `expected`, copy `src` into `dst` and fall through (normally onto a
    /// jump past the alternative); otherwise skip the next instruction.
    TestSet { dst: R, src: R, expected: bool },

    // Calls
    /// Call the value in `func`; `argc` arguments occupy the registers
    /// immediately after it, and `retc` results are written back starting
    /// at `func`.
    Call { func: R, argc: u8, retc: u8 },
    /// Return `count` values starting at `start`.
    Return { start: R, count: u8 },

    // Numeric for: 4-register window {index, limit, step, loop var}
    /// Bias the index by one step down and jump forward onto the paired
    /// `ForLoop`.
    ForPrep { base: R, end_offset: i32 },
    /// Add the step, test against the limit (step-sign aware, inclusive);
    /// on continuation refresh the loop variable and jump back to the body.
    ForLoop { base: R, start_offset: i32 },

    /// Instantiate nested prototype `proto`. Followed by one capture
    /// pseudo-instruction per declared upvalue: `Move` copies a local
    /// register into a fresh cell, `GetUpval` forwards the enclosing
    /// frame's cell.
    Closure { dst: R, proto: u16 },
}

impl<R> Insn<R> {
    /// Rewrite every register operand. Used by the allocation pass to turn
    /// `Insn<Temp>` into `Insn<Reg>`.
    pub fn map_regs<S>(self, mut f: impl FnMut(R) -> S) -> Insn<S> {
        use Insn::*;
        match self {
            Move { dst, src } => Move { dst: f(dst), src: f(src) },
            LoadK { dst, k } => LoadK { dst: f(dst), k },
            LoadBool { dst, value, skip } => LoadBool { dst: f(dst), value, skip },
            LoadNil { start, end } => LoadNil { start: f(start), end: f(end) },
            GetGlobal { dst, name } => GetGlobal { dst: f(dst), name },
            SetGlobal { name, src } => SetGlobal { name, src: f(src) },
            GetUpval { dst, upval } => GetUpval { dst: f(dst), upval },
            SetUpval { upval, src } => SetUpval { upval, src: f(src) },
            NewTable { dst } => NewTable { dst: f(dst) },
            GetTable { dst, obj, key } => GetTable {
                dst: f(dst),
                obj: f(obj),
                key: key.map(&mut f),
            },
            SetTable { obj, key, value } => SetTable {
                obj: f(obj),
                key: key.map(&mut f),
                value: value.map(&mut f),
            },
            SelfGet { dst, obj, field } => SelfGet {
                dst: f(dst),
                obj: f(obj),
                field: field.map(&mut f),
            },
            Add { dst, lhs, rhs } => Add {
                dst: f(dst),
                lhs: lhs.map(&mut f),
                rhs: rhs.map(&mut f),
            },
            Sub { dst, lhs, rhs } => Sub {
                dst: f(dst),
                lhs: lhs.map(&mut f),
                rhs: rhs.map(&mut f),
            },
            Mul { dst, lhs, rhs } => Mul {
                dst: f(dst),
                lhs: lhs.map(&mut f),
                rhs: rhs.map(&mut f),
            },
            Div { dst, lhs, rhs } => Div {
                dst: f(dst),
                lhs: lhs.map(&mut f),
                rhs: rhs.map(&mut f),
            },
            Mod { dst, lhs, rhs } => Mod {
                dst: f(dst),
                lhs: lhs.map(&mut f),
                rhs: rhs.map(&mut f),
            },
            Pow { dst, lhs, rhs } => Pow {
                dst: f(dst),
                lhs: lhs.map(&mut f),
                rhs: rhs.map(&mut f),
            },
            Neg { dst, src } => Neg { dst: f(dst), src: f(src) },
            Not { dst, src } => Not { dst: f(dst), src: f(src) },
            Len { dst, src } => Len { dst: f(dst), src: f(src) },
            Concat { dst, start, end } => Concat {
                dst: f(dst),
                start: f(start),
                end: f(end),
            },
            Jump { offset } => Jump { offset },
            Eq { cond, lhs, rhs } => Eq {
                cond,
                lhs: lhs.map(&mut f),
                rhs: rhs.map(&mut f),
            },
            Lt { cond, lhs, rhs } => Lt {
                cond,
                lhs: lhs.map(&mut f),
                rhs: rhs.map(&mut f),
            },
            Le { cond, lhs, rhs } => Le {
                cond,
                lhs: lhs.map(&mut f),
                rhs: rhs.map(&mut f),
            },
            Test { src, expected } => Test { src: f(src), expected },
            TestSet { dst, src, expected } => TestSet {
                dst: f(dst),
                src: f(src),
                expected,
            },
            Call { func, argc, retc } => Call { func: f(func), argc, retc },
            Return { start, count } => Return { start: f(start), count },
            ForPrep { base, end_offset } => ForPrep { base: f(base), end_offset },
            ForLoop { base, start_offset } => ForLoop { base: f(base), start_offset },
            Closure { dst, proto } => Closure { dst: f(dst), proto },
        }
    }

    /// Mnemonic for disassembly.
    pub fn opcode(&self) -> &'static str {
        use Insn::*;
        match self {
            Move { .. } => "MOVE",
            LoadK { .. } => "LOADK",
            LoadBool { .. } => "LOADBOOL",
            LoadNil { .. } => "LOADNIL",
            GetGlobal { .. } => "GETGLOBAL",
            SetGlobal { .. } => "SETGLOBAL",
            GetUpval { .. } => "GETUPVAL",
            SetUpval { .. } => "SETUPVAL",
            NewTable { .. } => "NEWTABLE",
            GetTable { .. } => "GETTABLE",
            SetTable { .. } => "SETTABLE",
            SelfGet { .. } => "SELF",
            Add { .. } => "ADD",
            Sub { .. } => "SUB",
            Mul { .. } => "MUL",
            Div { .. } => "DIV",
            Mod { .. } => "MOD",
            Pow { .. } => "POW",
            Neg { .. } => "UNM",
            Not { .. } => "NOT",
            Len { .. } => "LEN",
            Concat { .. } => "CONCAT",
            Jump { .. } => "JMP",
            Eq { .. } => "EQ",
            Lt { .. } => "LT",
            Le { .. } => "LE",
            Test { .. } => "TEST",
            TestSet { .. } => "TESTSET",
            Call { .. } => "CALL",
            Return { .. } => "RETURN",
            ForPrep { .. } => "FORPREP",
            ForLoop { .. } => "FORLOOP",
            Closure { .. } => "CLOSURE",
        }
    }
}
