use super::*;

use crate::vm::Proto;

fn sample_proto() -> Proto {
    // local x = 1; function f(n) return n + x end; return f(2)
    let block = Block::with_ret(
        vec![
            local("x", Expr::num(1.0)),
            Stmt::Function {
                name: "f".to_string(),
                local: false,
                func: func_body(
                    &["n"],
                    Block::with_ret(
                        vec![],
                        vec![Expr::bin(Expr::name("n"), BinOp::Add, Expr::name("x"))],
                    ),
                ),
            },
        ],
        vec![Expr::call(Expr::name("f"), vec![Expr::num(2.0)])],
    );
    compile_block(&block).unwrap()
}

#[test]
fn test_proto_serde_round_trip() {
    let proto = sample_proto();
    let json = serde_json::to_string(&proto).unwrap();
    let back: Proto = serde_json::from_str(&json).unwrap();
    assert_eq!(proto, back);
}

#[test]
fn test_disassembly_is_idempotent() {
    let proto = sample_proto();
    let first = disassemble(&proto);
    let second = disassemble(&proto);
    assert_eq!(first, second);
}

#[test]
fn test_disassembly_covers_nested_protos() {
    let proto = sample_proto();
    let text = disassemble(&proto);
    // Root listing plus the nested function's own listing.
    assert!(text.contains("function 0 <main>"), "{text}");
    assert!(text.contains("function 0.0 <f>"), "{text}");
    assert!(text.contains("CLOSURE"), "{text}");
    assert!(text.contains("RETURN"), "{text}");
}

#[test]
fn test_disassembly_renders_const_pool() {
    let proto = compile_block(&Block::with_ret(
        vec![],
        vec![Expr::bin(Expr::str("a"), BinOp::Concat, Expr::num(2.0))],
    ))
    .unwrap();
    let text = disassemble(&proto);
    assert!(text.contains("$k0 = \"a\""), "{text}");
    assert!(text.contains("$k1 = 2"), "{text}");
    assert!(text.contains("CONCAT"), "{text}");
}

#[test]
fn test_disassembly_annotates_registers_with_frame_values() {
    use crate::vm::{Frame, Insn, Reg, disassemble_insn};

    let proto = std::rc::Rc::new(sample_proto());
    let mut frame = Frame::new(std::rc::Rc::clone(&proto), Vec::new(), Vec::new(), 0, 0);
    frame.set(Reg(0), Value::Num(10.0)).unwrap();
    let insn: Insn<Reg> = Insn::Move { dst: Reg(1), src: Reg(0) };
    // With a live frame every register operand carries its value.
    assert_eq!(disassemble_insn(&insn, Some(&frame)), "MOVE %r1(nil) %r0(10)");
    assert_eq!(disassemble_insn(&insn, None), "MOVE %r1 %r0");
}

#[test]
fn test_executed_proto_still_disassembles_identically() {
    // Execution must not perturb the prototype.
    let proto = std::rc::Rc::new(sample_proto());
    let before = disassemble(&proto);
    let out = Vm::new().run(&proto).unwrap();
    assert_eq!(out, vec![Value::Num(3.0)]);
    assert_eq!(disassemble(&proto), before);
}
