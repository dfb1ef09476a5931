//! Compiled function prototypes.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::val::Const;
use crate::vm::insn::{Insn, Reg};

/// Where an upvalue of a nested prototype comes from. The name is kept for
/// disassembly; the source drives the capture pseudo-instructions emitted
/// after `Closure`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UpvalDesc {
    /// Captured by copying a local register of the enclosing function.
    Local { name: String, reg: Reg },
    /// Forwarded from the enclosing function's own upvalue list.
    Parent { name: String, idx: u16 },
}

impl UpvalDesc {
    pub fn name(&self) -> &str {
        match self {
            UpvalDesc::Local { name, .. } | UpvalDesc::Parent { name, .. } => name,
        }
    }
}

/// Optional debug metadata attached by the front end.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtoDebug {
    pub name: Option<String>,
}

/// A compiled function: immutable once generation finishes. Nested
/// function literals compile to entries in `protos`, referenced by index
/// from `Closure` instructions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proto {
    pub code: Vec<Insn<Reg>>,
    /// Deduplicated, insertion-ordered constant pool.
    pub consts: Vec<Const>,
    pub protos: Vec<Rc<Proto>>,
    /// Max simultaneous live registers; the activation frame's register
    /// file is sized to this.
    pub n_regs: u16,
    /// Registers below this index are pre-populated from call arguments.
    pub n_params: u16,
    pub upvals: Vec<UpvalDesc>,
    pub debug: Option<ProtoDebug>,
}
