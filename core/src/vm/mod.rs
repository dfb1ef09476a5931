//! Register bytecode VM subsystem
//!
//! This module contains the instruction set, the AST-to-bytecode compiler,
//! the execution engine, and the disassembler.

pub mod bytecode;
mod compiler;
mod disasm;
mod exec;
mod frame;
pub mod insn;

pub use bytecode::{Proto, ProtoDebug, UpvalDesc};
pub use compiler::{Compiler, compile_block, compile_function};
pub use disasm::{disassemble, disassemble_insn};
pub use exec::Vm;
pub use frame::Frame;
pub use insn::{Insn, KIdx, RK, Reg, Temp};

#[cfg(test)]
mod vm_test;
