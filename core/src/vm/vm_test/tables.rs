use super::*;

#[test]
fn test_vm_table_constructor_mixed_fields() {
    // t = {10, 20, [5] = 50, x = 1}
    let block = Block::new(vec![assign(
        "t",
        Expr::Table(vec![
            TableItem::Positional(Expr::num(10.0)),
            TableItem::Positional(Expr::num(20.0)),
            TableItem::Keyed(Expr::num(5.0), Expr::num(50.0)),
            TableItem::Named("x".to_string(), Expr::num(1.0)),
        ]),
    )]);
    let mut vm = Vm::new();
    vm.exec(&block).unwrap();
    let t = match vm.get_global("t") {
        Value::Table(t) => t,
        other => panic!("expected table, got {other:?}"),
    };
    let t = t.borrow();
    assert_eq!(t.get(&Value::Num(1.0)), Value::Num(10.0));
    assert_eq!(t.get(&Value::Num(2.0)), Value::Num(20.0));
    assert_eq!(t.get(&Value::Num(5.0)), Value::Num(50.0));
    assert_eq!(t.get_str("x"), Value::Num(1.0));
    assert_eq!(t.get(&Value::Num(3.0)), Value::Nil);
}

#[test]
fn test_vm_table_positional_keys_ignore_keyed_interleaving() {
    // t = {[50] = "far", 10, x = 1, 20}; positional fields still land at 1, 2
    let block = Block::new(vec![assign(
        "t",
        Expr::Table(vec![
            TableItem::Keyed(Expr::num(50.0), Expr::str("far")),
            TableItem::Positional(Expr::num(10.0)),
            TableItem::Named("x".to_string(), Expr::num(1.0)),
            TableItem::Positional(Expr::num(20.0)),
        ]),
    )]);
    let mut vm = Vm::new();
    vm.exec(&block).unwrap();
    let t = match vm.get_global("t") {
        Value::Table(t) => t,
        other => panic!("expected table, got {other:?}"),
    };
    let t = t.borrow();
    assert_eq!(t.get(&Value::Num(1.0)), Value::Num(10.0));
    assert_eq!(t.get(&Value::Num(2.0)), Value::Num(20.0));
    assert_eq!(t.get(&Value::Num(50.0)), Value::str("far"));
}

#[test]
fn test_vm_index_read() {
    // t = {x = {y = 9}}; return t.x.y
    let block = Block::with_ret(
        vec![assign(
            "t",
            Expr::Table(vec![TableItem::Named(
                "x".to_string(),
                Expr::Table(vec![TableItem::Named("y".to_string(), Expr::num(9.0))]),
            )]),
        )],
        vec![Expr::field(Expr::field(Expr::name("t"), "x"), "y")],
    );
    assert_eq!(exec_one(&block), Value::Num(9.0));
}

#[test]
fn test_vm_absent_key_reads_nil() {
    let block = Block::with_ret(
        vec![assign("t", Expr::Table(vec![]))],
        vec![Expr::field(Expr::name("t"), "missing")],
    );
    assert_eq!(exec_one(&block), Value::Nil);
}

#[test]
fn test_vm_table_len_is_dense_prefix() {
    // return #{1, 2, 3, [5] = 9}
    let block = Block::with_ret(
        vec![],
        vec![Expr::un(
            UnOp::Len,
            Expr::Table(vec![
                TableItem::Positional(Expr::num(1.0)),
                TableItem::Positional(Expr::num(2.0)),
                TableItem::Positional(Expr::num(3.0)),
                TableItem::Keyed(Expr::num(5.0), Expr::num(9.0)),
            ]),
        )],
    );
    assert_eq!(exec_one(&block), Value::Num(3.0));
}

#[test]
fn test_vm_index_non_table_errors() {
    // return (5).x
    let block = Block::with_ret(vec![], vec![Expr::field(Expr::num(5.0), "x")]);
    let err = Vm::new().exec(&block).unwrap_err();
    assert!(err.to_string().contains("attempt to index a number value"));
}

#[test]
fn test_vm_nil_table_key_write_errors() {
    // t = {[k] = 1} where k evaluates to nil
    let block = Block::new(vec![assign(
        "t",
        Expr::Table(vec![TableItem::Keyed(Expr::name("undefined"), Expr::num(1.0))]),
    )]);
    let err = Vm::new().exec(&block).unwrap_err();
    assert!(err.to_string().contains("table index is nil"));
}

#[test]
fn test_vm_tables_compare_by_identity() {
    // a = {}; b = {}; c = a; return a == b, a == c
    let block = Block::with_ret(
        vec![
            assign("a", Expr::Table(vec![])),
            assign("b", Expr::Table(vec![])),
            assign("c", Expr::name("a")),
        ],
        vec![
            Expr::bin(Expr::name("a"), BinOp::Eq, Expr::name("b")),
            Expr::bin(Expr::name("a"), BinOp::Eq, Expr::name("c")),
        ],
    );
    assert_eq!(exec(&block), vec![Value::Bool(false), Value::Bool(true)]);
}
