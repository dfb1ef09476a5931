use super::*;

#[test]
fn test_vm_function_call_args_and_return() {
    // function add(a, b) return a + b end; return add(2, 3)
    let block = Block::with_ret(
        vec![Stmt::Function {
            name: "add".to_string(),
            local: false,
            func: func_body(
                &["a", "b"],
                Block::with_ret(
                    vec![],
                    vec![Expr::bin(Expr::name("a"), BinOp::Add, Expr::name("b"))],
                ),
            ),
        }],
        vec![Expr::call(Expr::name("add"), vec![Expr::num(2.0), Expr::num(3.0)])],
    );
    assert_eq!(exec_one(&block), Value::Num(5.0));
}

#[test]
fn test_vm_missing_args_are_nil_extra_args_dropped() {
    // function second(a, b) return b end
    let second = Stmt::Function {
        name: "second".to_string(),
        local: false,
        func: func_body(&["a", "b"], Block::with_ret(vec![], vec![Expr::name("b")])),
    };
    let one_arg = Block::with_ret(
        vec![second.clone()],
        vec![Expr::call(Expr::name("second"), vec![Expr::num(1.0)])],
    );
    assert_eq!(exec_one(&one_arg), Value::Nil);

    let three_args = Block::with_ret(
        vec![second],
        vec![Expr::call(
            Expr::name("second"),
            vec![Expr::num(1.0), Expr::num(2.0), Expr::num(3.0)],
        )],
    );
    assert_eq!(exec_one(&three_args), Value::Num(2.0));
}

#[test]
fn test_vm_recursive_factorial() {
    // function fact(n) if n <= 1 then return 1 end return n * fact(n - 1) end
    // return fact(5)
    let body = Block::with_ret(
        vec![Stmt::If {
            arms: vec![(
                Expr::bin(Expr::name("n"), BinOp::Le, Expr::num(1.0)),
                Block::with_ret(vec![], vec![Expr::num(1.0)]),
            )],
            else_body: None,
        }],
        vec![Expr::bin(
            Expr::name("n"),
            BinOp::Mul,
            Expr::call(
                Expr::name("fact"),
                vec![Expr::bin(Expr::name("n"), BinOp::Sub, Expr::num(1.0))],
            ),
        )],
    );
    let block = Block::with_ret(
        vec![Stmt::Function {
            name: "fact".to_string(),
            local: false,
            func: func_body(&["n"], body),
        }],
        vec![Expr::call(Expr::name("fact"), vec![Expr::num(5.0)])],
    );
    assert_eq!(exec_one(&block), Value::Num(120.0));
}

fn two_returner() -> Stmt {
    // function two() return 1, 2 end
    Stmt::Function {
        name: "two".to_string(),
        local: false,
        func: func_body(
            &[],
            Block::with_ret(vec![], vec![Expr::num(1.0), Expr::num(2.0)]),
        ),
    }
}

#[test]
fn test_vm_multi_return_fills_targets_in_order() {
    // a, b = two(); return a, b
    let block = Block::with_ret(
        vec![
            two_returner(),
            Stmt::Assign {
                targets: vec![
                    AssignTarget::Name("a".to_string()),
                    AssignTarget::Name("b".to_string()),
                ],
                values: vec![Expr::call(Expr::name("two"), vec![])],
            },
        ],
        vec![Expr::name("a"), Expr::name("b")],
    );
    assert_eq!(exec(&block), vec![Value::Num(1.0), Value::Num(2.0)]);
}

#[test]
fn test_vm_multi_return_pads_missing_with_nil() {
    // a, b, c = two(); return c
    let block = Block::with_ret(
        vec![
            two_returner(),
            Stmt::Assign {
                targets: vec![
                    AssignTarget::Name("a".to_string()),
                    AssignTarget::Name("b".to_string()),
                    AssignTarget::Name("c".to_string()),
                ],
                values: vec![Expr::call(Expr::name("two"), vec![])],
            },
        ],
        vec![Expr::name("c")],
    );
    assert_eq!(exec_one(&block), Value::Nil);
}

#[test]
fn test_vm_extra_returns_discarded() {
    // local a = two(); return a
    let block = Block::with_ret(
        vec![two_returner(), local("a", Expr::call(Expr::name("two"), vec![]))],
        vec![Expr::name("a")],
    );
    assert_eq!(exec_one(&block), Value::Num(1.0));
}

#[test]
fn test_vm_local_multi_bind_from_call() {
    // local a, b = two(); return b, a
    let block = Block::with_ret(
        vec![
            two_returner(),
            Stmt::Local {
                names: vec!["a".to_string(), "b".to_string()],
                values: vec![Expr::call(Expr::name("two"), vec![])],
            },
        ],
        vec![Expr::name("b"), Expr::name("a")],
    );
    assert_eq!(exec(&block), vec![Value::Num(2.0), Value::Num(1.0)]);
}

#[test]
fn test_vm_call_non_function_fails_without_mutation() {
    // g = 7; g()
    let block = Block::new(vec![
        assign("g", Expr::num(7.0)),
        Stmt::Call(Expr::call(Expr::name("g"), vec![])),
    ]);
    let mut vm = Vm::new();
    let err = vm.exec(&block).unwrap_err();
    assert!(
        err.to_string().contains("attempt to call a number value"),
        "unexpected error: {err}"
    );
    // Nothing observable changed in the caller's environment.
    assert_eq!(vm.get_global("g"), Value::Num(7.0));
}

#[test]
fn test_vm_upvalue_captured_by_copy() {
    // local x = 10; local f = function() return x end; x = 20; return f()
    // Capture snapshots the local at closure creation.
    let block = Block::with_ret(
        vec![
            local("x", Expr::num(10.0)),
            local(
                "f",
                Expr::Function(func_body(
                    &[],
                    Block::with_ret(vec![], vec![Expr::name("x")]),
                )),
            ),
            assign("x", Expr::num(20.0)),
        ],
        vec![Expr::call(Expr::name("f"), vec![])],
    );
    assert_eq!(exec_one(&block), Value::Num(10.0));
}

#[test]
fn test_vm_upvalue_writes_persist_across_calls() {
    // local x = 1
    // local inc = function() x = x + 1; return x end
    // return inc(), inc()
    let block = Block::with_ret(
        vec![
            local("x", Expr::num(1.0)),
            local(
                "inc",
                Expr::Function(func_body(
                    &[],
                    Block::with_ret(
                        vec![assign(
                            "x",
                            Expr::bin(Expr::name("x"), BinOp::Add, Expr::num(1.0)),
                        )],
                        vec![Expr::name("x")],
                    ),
                )),
            ),
        ],
        vec![
            Expr::call(Expr::name("inc"), vec![]),
            Expr::call(Expr::name("inc"), vec![]),
        ],
    );
    assert_eq!(exec(&block), vec![Value::Num(2.0), Value::Num(3.0)]);
}

#[test]
fn test_vm_upvalue_forwarded_through_two_levels() {
    // local x = 5
    // outer = function() return function() return x end end
    // return outer()()
    let inner = Expr::Function(func_body(
        &[],
        Block::with_ret(vec![], vec![Expr::name("x")]),
    ));
    let block = Block::with_ret(
        vec![
            local("x", Expr::num(5.0)),
            assign(
                "outer",
                Expr::Function(func_body(&[], Block::with_ret(vec![], vec![inner]))),
            ),
        ],
        vec![Expr::call(
            Expr::call(Expr::name("outer"), vec![]),
            vec![],
        )],
    );
    assert_eq!(exec_one(&block), Value::Num(5.0));
}

#[test]
fn test_vm_method_call_passes_receiver() {
    // t = { get = function(self, k) return self[k] end, answer = 42 }
    // return t:get("answer")
    let getter = Expr::Function(func_body(
        &["self", "k"],
        Block::with_ret(
            vec![],
            vec![Expr::index(Expr::name("self"), Expr::name("k"))],
        ),
    ));
    let block = Block::with_ret(
        vec![assign(
            "t",
            Expr::Table(vec![
                TableItem::Named("get".to_string(), getter),
                TableItem::Named("answer".to_string(), Expr::num(42.0)),
            ]),
        )],
        vec![Expr::method_call(
            Expr::name("t"),
            "get",
            vec![Expr::str("answer")],
        )],
    );
    assert_eq!(exec_one(&block), Value::Num(42.0));
}

#[test]
fn test_vm_runaway_recursion_overflows() {
    // function f() return f() end; f()
    let block = Block::new(vec![
        Stmt::Function {
            name: "f".to_string(),
            local: false,
            func: func_body(
                &[],
                Block::with_ret(vec![], vec![Expr::call(Expr::name("f"), vec![])]),
            ),
        },
        Stmt::Call(Expr::call(Expr::name("f"), vec![])),
    ]);
    let err = Vm::new().exec(&block).unwrap_err();
    assert!(err.to_string().contains("stack overflow"));
}
