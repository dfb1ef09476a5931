//! Human-readable rendering of prototypes and single instructions.
//!
//! Rendering is pure: repeated calls over the same prototype produce the
//! same text. Registers print as `%rN`, constant-pool slots as `$kN`;
//! when a frame is supplied the register's current value is appended.

use std::fmt::Write as _;

use crate::vm::bytecode::{Proto, UpvalDesc};
use crate::vm::frame::Frame;
use crate::vm::insn::{Insn, KIdx, RK, Reg};

/// Render a prototype and, recursively, its nested prototypes.
pub fn disassemble(proto: &Proto) -> String {
    let mut out = String::new();
    render_proto(proto, "0", &mut out);
    out
}

fn render_proto(proto: &Proto, path: &str, out: &mut String) {
    let name = proto
        .debug
        .as_ref()
        .and_then(|d| d.name.as_deref())
        .unwrap_or("?");
    let _ = writeln!(
        out,
        "function {path} <{name}> ({} insns, {} consts, {} regs, {} params, {} upvals)",
        proto.code.len(),
        proto.consts.len(),
        proto.n_regs,
        proto.n_params,
        proto.upvals.len(),
    );
    for (i, c) in proto.consts.iter().enumerate() {
        let _ = writeln!(out, "  $k{i} = {c}");
    }
    for (i, u) in proto.upvals.iter().enumerate() {
        match u {
            UpvalDesc::Local { name, reg } => {
                let _ = writeln!(out, "  u{i} = {name} (local %r{})", reg.0);
            }
            UpvalDesc::Parent { name, idx } => {
                let _ = writeln!(out, "  u{i} = {name} (parent u{idx})");
            }
        }
    }
    for (pc, insn) in proto.code.iter().enumerate() {
        let _ = writeln!(out, "  [{pc:3}] {}", disassemble_insn(insn, None));
    }
    for (i, inner) in proto.protos.iter().enumerate() {
        render_proto(inner, &format!("{path}.{i}"), out);
    }
}

/// Render one instruction; with a frame, annotate register operands with
/// their live values.
pub fn disassemble_insn(insn: &Insn<Reg>, frame: Option<&Frame>) -> String {
    let r = |reg: Reg| match frame.and_then(|f| f.reg(reg.0)) {
        Some(v) => format!("%r{}({})", reg.0, v),
        None => format!("%r{}", reg.0),
    };
    let k = |k: KIdx| format!("$k{}", k.0);
    let rk = |operand: RK<Reg>| match operand {
        RK::R(reg) => r(reg),
        RK::K(idx) => k(idx),
    };

    let op = insn.opcode();
    use Insn::*;
    match *insn {
        Move { dst, src } => format!("{op} {} {}", r(dst), r(src)),
        LoadK { dst, k: idx } => format!("{op} {} {}", r(dst), k(idx)),
        LoadBool { dst, value, skip } => {
            format!("{op} {} {} skip={}", r(dst), value, skip)
        }
        LoadNil { start, end } => format!("{op} {} {}", r(start), r(end)),
        GetGlobal { dst, name } => format!("{op} {} {}", r(dst), k(name)),
        SetGlobal { name, src } => format!("{op} {} {}", k(name), r(src)),
        GetUpval { dst, upval } => format!("{op} {} u{}", r(dst), upval),
        SetUpval { upval, src } => format!("{op} u{} {}", upval, r(src)),
        NewTable { dst } => format!("{op} {}", r(dst)),
        GetTable { dst, obj, key } => format!("{op} {} {} {}", r(dst), r(obj), rk(key)),
        SetTable { obj, key, value } => format!("{op} {} {} {}", r(obj), rk(key), rk(value)),
        SelfGet { dst, obj, field } => format!("{op} {} {} {}", r(dst), r(obj), rk(field)),
        Add { dst, lhs, rhs }
        | Sub { dst, lhs, rhs }
        | Mul { dst, lhs, rhs }
        | Div { dst, lhs, rhs }
        | Mod { dst, lhs, rhs }
        | Pow { dst, lhs, rhs } => format!("{op} {} {} {}", r(dst), rk(lhs), rk(rhs)),
        Neg { dst, src } | Not { dst, src } | Len { dst, src } => {
            format!("{op} {} {}", r(dst), r(src))
        }
        Concat { dst, start, end } => format!("{op} {} {}..{}", r(dst), r(start), r(end)),
        Jump { offset } => format!("{op} {offset:+}"),
        Eq { cond, lhs, rhs } | Lt { cond, lhs, rhs } | Le { cond, lhs, rhs } => {
            format!("{op} {} {} {}", cond, rk(lhs), rk(rhs))
        }
        Test { src, expected } => format!("{op} {} {}", r(src), expected),
        TestSet { dst, src, expected } => {
            format!("{op} {} {} {}", r(dst), r(src), expected)
        }
        Call { func, argc, retc } => format!("{op} {} argc={} retc={}", r(func), argc, retc),
        Return { start, count } => format!("{op} {} count={}", r(start), count),
        ForPrep { base, end_offset } => format!("{op} {} {end_offset:+}", r(base)),
        ForLoop { base, start_offset } => format!("{op} {} {start_offset:+}", r(base)),
        Closure { dst, proto } => format!("{op} {} p{}", r(dst), proto),
    }
}
