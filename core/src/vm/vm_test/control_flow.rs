use super::*;

#[test]
fn test_vm_while_accumulate() {
    // x = 0; i = 0; while i < 3 do x = x + 2; i = i + 1 end; return x
    let block = Block::with_ret(
        vec![
            assign("x", Expr::num(0.0)),
            assign("i", Expr::num(0.0)),
            Stmt::While {
                cond: Expr::bin(Expr::name("i"), BinOp::Lt, Expr::num(3.0)),
                body: Block::new(vec![
                    assign("x", Expr::bin(Expr::name("x"), BinOp::Add, Expr::num(2.0))),
                    assign("i", Expr::bin(Expr::name("i"), BinOp::Add, Expr::num(1.0))),
                ]),
            },
        ],
        vec![Expr::name("x")],
    );
    assert_eq!(exec_one(&block), Value::Num(6.0));
}

#[test]
fn test_vm_while_false_never_runs() {
    // x = 1; while false do x = 2 end; return x
    let block = Block::with_ret(
        vec![
            assign("x", Expr::num(1.0)),
            Stmt::While {
                cond: Expr::bool(false),
                body: Block::new(vec![assign("x", Expr::num(2.0))]),
            },
        ],
        vec![Expr::name("x")],
    );
    assert_eq!(exec_one(&block), Value::Num(1.0));
}

#[test]
fn test_vm_if_elseif_else_chain() {
    // if n == 1 then r = "one" elseif n == 2 then r = "two" else r = "many" end
    let pick = |n: f64| {
        let block = Block::with_ret(
            vec![
                assign("n", Expr::num(n)),
                Stmt::If {
                    arms: vec![
                        (
                            Expr::bin(Expr::name("n"), BinOp::Eq, Expr::num(1.0)),
                            Block::new(vec![assign("r", Expr::str("one"))]),
                        ),
                        (
                            Expr::bin(Expr::name("n"), BinOp::Eq, Expr::num(2.0)),
                            Block::new(vec![assign("r", Expr::str("two"))]),
                        ),
                    ],
                    else_body: Some(Block::new(vec![assign("r", Expr::str("many"))])),
                },
            ],
            vec![Expr::name("r")],
        );
        exec_one(&block)
    };
    assert_eq!(pick(1.0), Value::str("one"));
    assert_eq!(pick(2.0), Value::str("two"));
    assert_eq!(pick(7.0), Value::str("many"));
}

#[test]
fn test_vm_if_without_else_falls_through() {
    // x = 1; if false then x = 2 end; return x
    let block = Block::with_ret(
        vec![
            assign("x", Expr::num(1.0)),
            Stmt::If {
                arms: vec![(Expr::bool(false), Block::new(vec![assign("x", Expr::num(2.0))]))],
                else_body: None,
            },
        ],
        vec![Expr::name("x")],
    );
    assert_eq!(exec_one(&block), Value::Num(1.0));
}

fn for_loop_body_count(start: f64, limit: f64, step: Option<f64>) -> (Value, Value) {
    // n = 0; last = nil; for i = start, limit[, step] do n = n + 1; last = i end
    let block = Block::with_ret(
        vec![
            assign("n", Expr::num(0.0)),
            assign("last", Expr::nil()),
            Stmt::NumericFor {
                var: "i".to_string(),
                start: Expr::num(start),
                limit: Expr::num(limit),
                step: step.map(Expr::num),
                body: Block::new(vec![
                    assign("n", Expr::bin(Expr::name("n"), BinOp::Add, Expr::num(1.0))),
                    assign("last", Expr::name("i")),
                ]),
            },
        ],
        vec![Expr::name("n"), Expr::name("last")],
    );
    let mut values = exec(&block);
    let last = values.pop().unwrap();
    (values.pop().unwrap(), last)
}

#[test]
fn test_vm_numeric_for_counts_inclusive() {
    let (n, last) = for_loop_body_count(1.0, 5.0, None);
    assert_eq!(n, Value::Num(5.0));
    assert_eq!(last, Value::Num(5.0));
}

#[test]
fn test_vm_numeric_for_zero_trip() {
    let (n, last) = for_loop_body_count(5.0, 1.0, None);
    assert_eq!(n, Value::Num(0.0));
    assert_eq!(last, Value::Nil);
}

#[test]
fn test_vm_numeric_for_step() {
    // for i = 1, 6, 2 runs for 1, 3, 5
    let (n, last) = for_loop_body_count(1.0, 6.0, Some(2.0));
    assert_eq!(n, Value::Num(3.0));
    assert_eq!(last, Value::Num(5.0));
}

#[test]
fn test_vm_numeric_for_zero_step_past_limit_terminates() {
    // for i = 1, 0, 0 runs zero times; a zero step counts as forward.
    let (n, last) = for_loop_body_count(1.0, 0.0, Some(0.0));
    assert_eq!(n, Value::Num(0.0));
    assert_eq!(last, Value::Nil);
}

#[test]
fn test_vm_numeric_for_negative_step() {
    let (n, last) = for_loop_body_count(3.0, 1.0, Some(-1.0));
    assert_eq!(n, Value::Num(3.0));
    assert_eq!(last, Value::Num(1.0));
}

#[test]
fn test_vm_numeric_for_non_numeric_limit_errors() {
    let block = Block::new(vec![Stmt::NumericFor {
        var: "i".to_string(),
        start: Expr::num(1.0),
        limit: Expr::str("ten"),
        step: None,
        body: Block::new(vec![]),
    }]);
    let err = Vm::new().exec(&block).unwrap_err();
    assert!(err.to_string().contains("'for' limit must be a number"));
}

#[test]
fn test_vm_short_circuit_skips_right_side() {
    // `boom` is nil; calling it would be a type error, but the right
    // side must never run. return false and boom(), true or boom()
    let block = Block::with_ret(
        vec![],
        vec![
            Expr::bin(
                Expr::bool(false),
                BinOp::And,
                Expr::call(Expr::name("boom"), vec![]),
            ),
            Expr::bin(
                Expr::bool(true),
                BinOp::Or,
                Expr::call(Expr::name("boom"), vec![]),
            ),
        ],
    );
    assert_eq!(exec(&block), vec![Value::Bool(false), Value::Bool(true)]);
}

#[test]
fn test_vm_and_or_yield_operand_values() {
    // non-boolean operands pass through: return 1 and 2, nil or "x"
    let block = Block::with_ret(
        vec![],
        vec![
            Expr::bin(Expr::num(1.0), BinOp::And, Expr::num(2.0)),
            Expr::bin(Expr::nil(), BinOp::Or, Expr::str("x")),
        ],
    );
    assert_eq!(exec(&block), vec![Value::Num(2.0), Value::str("x")]);
}
