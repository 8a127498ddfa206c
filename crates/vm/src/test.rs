use std::iter;

use expect_test::expect;
use pretty_assertions::assert_eq;
use test_env_log::test;

use crate::builtins;
use crate::error::{EvalError, Result};
use crate::eval::{expand_clauses, Evaluator, Objects};
use crate::pools::Pools;
use crate::value::{Env, Value};

fn sym(name: &str) -> Value {
    Value::symbol(name)
}

fn int(v: i64) -> Value {
    Value::int(v)
}

/// An evaluator setup that keeps its globals between calls.
struct Harness {
    pools: Pools,
    objects: Objects,
    globals: Env,
    out: Vec<u8>,
    max_depth: usize,
}

impl Harness {
    fn new() -> Self {
        let pools = Pools::new();
        let globals = builtins::register(&pools.new_map());
        Harness {
            pools,
            objects: Objects::default(),
            globals,
            out: vec![],
            max_depth: 64,
        }
    }

    fn list(&self, items: Vec<Value>) -> Value {
        Value::List(self.pools.list_from(items))
    }

    fn eval(&mut self, value: &Value) -> Result<Value> {
        let mut eval = Evaluator::new(
            &self.pools,
            &self.objects,
            &mut self.out,
            self.globals.clone(),
        )
        .with_max_depth(self.max_depth);
        let result = eval.eval_global(value);
        let globals = eval.into_globals();
        if result.is_ok() {
            self.globals = globals;
        }
        result
    }

    /// Evaluate `forms` in order inside one `begin`.
    fn run(&mut self, forms: Vec<Value>) -> Result<Value> {
        let program = self.list(iter::once(sym("begin")).chain(forms).collect());
        self.eval(&program)
    }

    fn output(&self) -> String {
        String::from_utf8_lossy(&self.out).into_owned()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.pools.clear();
    }
}

#[test]
fn test_arithmetic() {
    let mut h = Harness::new();
    let sum = h.list(vec![sym("+"), int(1), int(2)]);
    assert_eq!(h.eval(&sum).unwrap(), int(3));
    assert!(h.eval(&sum).unwrap().as_int().is_some());

    let promoted = h.list(vec![sym("+"), int(1), Value::float(2.0)]);
    let promoted = h.eval(&promoted).unwrap();
    assert!(matches!(promoted.as_number(), Some(n) if n.is_float()));
    assert_eq!(promoted.to_string(), "3.0");

    let negate = h.list(vec![sym("-"), int(5)]);
    assert_eq!(h.eval(&negate).unwrap(), int(-5));

    let truncated = h.list(vec![sym("/"), int(7), int(2)]);
    assert_eq!(h.eval(&truncated).unwrap(), int(3));

    let float_div = h.list(vec![sym("/"), Value::float(7.0), int(2)]);
    assert_eq!(h.eval(&float_div).unwrap(), Value::float(3.5));

    let by_zero = h.list(vec![sym("/"), int(1), int(0)]);
    assert!(matches!(h.eval(&by_zero), Err(EvalError::DivisionByZero)));

    let empty_sub = h.list(vec![sym("-")]);
    assert!(matches!(h.eval(&empty_sub), Err(EvalError::Arity { .. })));

    let empty_add = h.list(vec![sym("+")]);
    assert_eq!(h.eval(&empty_add).unwrap(), int(0));
}

#[test]
fn test_comparisons_chain() {
    let mut h = Harness::new();
    let cases = [
        ("<", vec![int(1), int(2), int(3)], true),
        ("<", vec![int(1), int(3), int(2)], false),
        ("<=", vec![int(1), int(1), Value::float(1.5)], true),
        (">", vec![int(3), int(2)], true),
        (">=", vec![int(2), int(3)], false),
        ("=", vec![int(1), Value::float(1.0)], true),
        ("!=", vec![int(1), int(2)], true),
    ];
    for (op, args, expected) in cases {
        let form = h.list(iter::once(sym(op)).chain(args).collect());
        assert_eq!(h.eval(&form).unwrap(), Value::Boolean(expected), "{}", form);
    }

    let bad = h.list(vec![sym("<"), int(1), "two".into()]);
    let err = h.eval(&bad).unwrap_err();
    assert_eq!(err.to_string(), "<: expected number, found string");
}

#[test]
fn test_def_updates_globals() {
    let mut h = Harness::new();
    let def = h.list(vec![sym("def"), sym("x"), int(5)]);
    let square = h.list(vec![sym("*"), sym("x"), sym("x")]);
    assert_eq!(h.run(vec![def, square]).unwrap(), int(25));
    assert_eq!(h.eval(&sym("x")).unwrap(), int(5));
}

#[test]
fn test_failed_eval_discards_definitions() {
    let mut h = Harness::new();
    let def = h.list(vec![sym("def"), sym("y"), int(1)]);
    let call = h.list(vec![sym("foo"), int(1)]);
    let err = h.run(vec![def, call]).unwrap_err();
    assert_eq!(err.to_string(), "unbound symbol: foo");
    assert!(matches!(h.eval(&sym("y")), Err(EvalError::Unbound(name)) if name == "y"));
}

#[test]
fn test_if_truthiness() {
    let mut h = Harness::new();
    let cases = [
        (Value::Nil, int(2)),
        (Value::Boolean(false), int(2)),
        (int(0), int(1)),
        ("".into(), int(1)),
    ];
    for (pred, expected) in cases {
        let form = h.list(vec![sym("if"), pred, int(1), int(2)]);
        assert_eq!(h.eval(&form).unwrap(), expected);
    }

    let no_else = h.list(vec![sym("if"), Value::Boolean(false), int(1)]);
    assert_eq!(h.eval(&no_else).unwrap(), Value::Nil);

    let malformed = h.list(vec![sym("if"), Value::Boolean(true)]);
    assert!(matches!(
        h.eval(&malformed),
        Err(EvalError::Malformed { form: "if", .. })
    ));
}

#[test]
fn test_expand_clauses() {
    let h = Harness::new();
    let clauses = vec![
        h.list(vec![sym("a"), sym("x")]),
        h.list(vec![sym("b"), sym("y"), sym("z")]),
        h.list(vec![sym("else"), sym("w")]),
    ];
    let expanded = expand_clauses(&h.pools, &clauses).unwrap();
    expect![["(if a x (if b (begin y z) w))"]].assert_eq(&expanded.to_string());

    let misplaced = vec![
        h.list(vec![sym("else"), sym("w")]),
        h.list(vec![sym("a"), sym("x")]),
    ];
    let err = expand_clauses(&h.pools, &misplaced).unwrap_err();
    assert_eq!(err.to_string(), "malformed cond: else clause isn't last");

    assert_eq!(expand_clauses(&h.pools, &[]).unwrap(), Value::Nil);
}

#[test]
fn test_cond_picks_first_true_clause() {
    let mut h = Harness::new();
    let cond = h.list(vec![
        sym("cond"),
        h.list(vec![Value::Boolean(false), int(1)]),
        h.list(vec![sym("else"), int(2)]),
    ]);
    assert_eq!(h.eval(&cond).unwrap(), int(2));

    let no_match = h.list(vec![sym("cond"), h.list(vec![Value::Nil, int(1)])]);
    assert_eq!(h.eval(&no_match).unwrap(), Value::Nil);
}

#[test]
fn test_closures_capture_environment() {
    let mut h = Harness::new();
    // (def make-adder (fn (n) (fn (x) (+ x n))))
    let inner = h.list(vec![
        sym("fn"),
        h.list(vec![sym("x")]),
        h.list(vec![sym("+"), sym("x"), sym("n")]),
    ]);
    let outer = h.list(vec![sym("fn"), h.list(vec![sym("n")]), inner]);
    let def_adder = h.list(vec![sym("def"), sym("make-adder"), outer]);
    let def_add2 = h.list(vec![
        sym("def"),
        sym("add2"),
        h.list(vec![sym("make-adder"), int(2)]),
    ]);
    let call = h.list(vec![sym("add2"), int(40)]);
    assert_eq!(h.run(vec![def_adder, def_add2, call]).unwrap(), int(42));

    let adder = h.eval(&sym("add2")).unwrap();
    assert!(adder.is_compound_procedure());
    assert_eq!(adder.to_string(), "#<procedure>");
    // `n` only lives in the closure
    assert!(h.eval(&sym("n")).is_err());
}

#[test]
fn test_recursion_sees_later_globals() {
    let mut h = Harness::new();
    // (def fact (fn (n) (if (<= n 1) 1 (* n (fact (- n 1))))))
    let body = h.list(vec![
        sym("if"),
        h.list(vec![sym("<="), sym("n"), int(1)]),
        int(1),
        h.list(vec![
            sym("*"),
            sym("n"),
            h.list(vec![sym("fact"), h.list(vec![sym("-"), sym("n"), int(1)])]),
        ]),
    ]);
    let def = h.list(vec![
        sym("def"),
        sym("fact"),
        h.list(vec![sym("fn"), h.list(vec![sym("n")]), body]),
    ]);
    let call = h.list(vec![sym("fact"), int(10)]);
    assert_eq!(h.run(vec![def, call]).unwrap(), int(3_628_800));
}

#[test]
fn test_compound_arity_is_checked() {
    let mut h = Harness::new();
    let procedure = h.list(vec![
        sym("fn"),
        h.list(vec![sym("a"), sym("b")]),
        sym("a"),
    ]);
    let call = h.list(vec![procedure, int(1)]);
    let err = h.eval(&call).unwrap_err();
    assert_eq!(err.to_string(), "fn: expected 2 argument(s), found 1");
}

#[test]
fn test_set_requires_binding() {
    let mut h = Harness::new();
    let set = h.list(vec![sym("set"), sym("z"), int(1)]);
    let err = h.eval(&set).unwrap_err();
    assert_eq!(err.to_string(), "cannot set unbound symbol: z");

    let def = h.list(vec![sym("def"), sym("z"), int(1)]);
    let set = h.list(vec![sym("set"), sym("z"), int(2)]);
    assert_eq!(h.run(vec![def, set, sym("z")]).unwrap(), int(2));

    // ((fn (a) (set a 5) a) 1)
    let procedure = h.list(vec![
        sym("fn"),
        h.list(vec![sym("a")]),
        h.list(vec![sym("set"), sym("a"), int(5)]),
        sym("a"),
    ]);
    let call = h.list(vec![procedure, int(1)]);
    assert_eq!(h.eval(&call).unwrap(), int(5));
}

#[test]
fn test_local_def_stays_local() {
    let mut h = Harness::new();
    // ((fn () (def local 1) local))
    let procedure = h.list(vec![
        sym("fn"),
        h.list(vec![]),
        h.list(vec![sym("def"), sym("local"), int(1)]),
        sym("local"),
    ]);
    let call = h.list(vec![procedure]);
    assert_eq!(h.eval(&call).unwrap(), int(1));
    assert!(h.eval(&sym("local")).is_err());
}

#[test]
fn test_maps_and_vectors_are_applicable() {
    let mut h = Harness::new();
    let map = h.list(vec![sym("make-map"), "a".into(), int(1)]);
    let hit = h.list(vec![map.clone(), "a".into()]);
    let miss = h.list(vec![map, "b".into()]);
    assert_eq!(h.eval(&hit).unwrap(), int(1));
    assert_eq!(h.eval(&miss).unwrap(), Value::Nil);

    let vector = h.list(vec![sym("make-vector"), int(10), int(20)]);
    let index = h.list(vec![vector.clone(), int(1)]);
    assert_eq!(h.eval(&index).unwrap(), int(20));

    let out_of_range = h.list(vec![vector.clone(), int(2)]);
    assert_eq!(
        h.eval(&out_of_range).unwrap_err().to_string(),
        "index 2 out of range for length 2"
    );
    let negative = h.list(vec![vector.clone(), int(-1)]);
    assert!(matches!(
        h.eval(&negative),
        Err(EvalError::IndexOutOfRange { index: -1, .. })
    ));
    let float_index = h.list(vec![vector, Value::float(1.0)]);
    assert!(matches!(h.eval(&float_index), Err(EvalError::Type { .. })));
}

#[test]
fn test_apply_non_procedure() {
    let mut h = Harness::new();
    let call = h.list(vec![int(1), int(2)]);
    assert_eq!(
        h.eval(&call).unwrap_err().to_string(),
        "attempt to apply non-procedure 1"
    );
}

#[test]
fn test_sequence_primitives() {
    let mut h = Harness::new();
    let quoted = |h: &Harness, items: Vec<Value>| h.list(vec![sym("quote"), h.list(items)]);
    let nested = quoted(
        &h,
        vec![h.list(vec![int(1), int(2)]), int(3), int(4)],
    );

    let cases = [
        ("first", "(1 2)"),
        ("ffirst", "1"),
        ("next", "(3 4)"),
        ("fnext", "3"),
        ("nnext", "(4)"),
        ("nfirst", "(2)"),
        ("count", "3"),
    ];
    for (op, expected) in cases {
        let form = h.list(vec![sym(op), nested.clone()]);
        assert_eq!(h.eval(&form).unwrap().to_string(), expected, "{}", op);
    }

    let single = quoted(&h, vec![int(1)]);
    let next = h.list(vec![sym("next"), single]);
    assert_eq!(h.eval(&next).unwrap(), Value::Nil);

    let first_nil = h.list(vec![sym("first"), Value::Nil]);
    assert_eq!(h.eval(&first_nil).unwrap(), Value::Nil);

    let vector = h.list(vec![sym("make-vector"), int(1), int(2), int(3)]);
    let next_vector = h.list(vec![sym("next"), vector.clone()]);
    assert_eq!(h.eval(&next_vector).unwrap().to_string(), "(2 3)");

    let cons = h.list(vec![sym("cons"), int(0), vector]);
    assert_eq!(h.eval(&cons).unwrap().to_string(), "(0 1 2 3)");
    let cons_nil = h.list(vec![sym("cons"), int(0), Value::Nil]);
    assert_eq!(h.eval(&cons_nil).unwrap().to_string(), "(0)");

    let count_str = h.list(vec![sym("count"), "héllo".into()]);
    assert_eq!(h.eval(&count_str).unwrap(), int(5));

    let bad = h.list(vec![sym("first"), int(1)]);
    assert_eq!(
        h.eval(&bad).unwrap_err().to_string(),
        "first: expected list, vector or nil, found integer"
    );
}

#[test]
fn test_predicates() {
    let mut h = Harness::new();
    let empty_list = h.list(vec![sym("quote"), h.list(vec![])]);
    let procedure = h.list(vec![sym("fn"), h.list(vec![]), int(1)]);
    let cases = [
        ("integer?", int(1), true),
        ("integer?", Value::float(1.0), false),
        ("float?", Value::float(1.0), true),
        ("string?", "s".into(), true),
        ("boolean?", Value::Boolean(false), true),
        ("symbol?", h.list(vec![sym("quote"), sym("a")]), true),
        ("map?", h.list(vec![sym("make-map")]), true),
        ("vector?", h.list(vec![sym("make-vector")]), true),
        ("list?", empty_list, true),
        ("fn?", sym("+"), true),
        ("fn?", procedure, true),
        ("fn?", int(1), false),
        ("object?", Value::Nil, false),
    ];
    for (op, arg, expected) in cases {
        let form = h.list(vec![sym(op), arg]);
        assert_eq!(h.eval(&form).unwrap(), Value::Boolean(expected), "{}", form);
    }
}

#[test]
fn test_make_map_needs_pairs() {
    let mut h = Harness::new();
    let odd = h.list(vec![sym("make-map"), int(1)]);
    assert!(matches!(h.eval(&odd), Err(EvalError::Arity { .. })));
}

#[test]
fn test_println_and_str() {
    let mut h = Harness::new();
    let vector = h.list(vec![sym("make-vector"), int(1), "b".into()]);
    let print = h.list(vec![sym("println"), "a".into(), int(1), vector]);
    assert_eq!(h.eval(&print).unwrap(), Value::Nil);
    assert_eq!(h.output(), "a 1 [1 \"b\"]\n");

    let str = h.list(vec![
        sym("str"),
        "a".into(),
        int(1),
        Value::float(2.5),
        Value::Nil,
    ]);
    assert_eq!(h.eval(&str).unwrap(), Value::from("a12.5nil"));
}

#[test]
fn test_depth_limit() {
    let mut h = Harness::new();
    h.max_depth = 20;
    // (def spin (fn (n) (spin n))) (spin 1)
    let def = h.list(vec![
        sym("def"),
        sym("spin"),
        h.list(vec![
            sym("fn"),
            h.list(vec![sym("n")]),
            h.list(vec![sym("spin"), sym("n")]),
        ]),
    ]);
    let call = h.list(vec![sym("spin"), int(1)]);
    let err = h.run(vec![def, call]).unwrap_err();
    assert!(matches!(err, EvalError::DepthExceeded(20)));
    assert_eq!(err.to_string(), "recursion depth exceeded (limit 20)");
}

#[test]
fn test_malformed_special_forms() {
    let mut h = Harness::new();
    let cases = [
        (vec![sym("quote")], "malformed quote: expected exactly one operand"),
        (vec![sym("def"), int(1), int(2)], "malformed def: expected a symbol and a value"),
        (vec![sym("fn"), sym("x")], "malformed fn: missing parameter list"),
        (vec![sym("begin")], "malformed begin: empty body"),
    ];
    for (form, message) in cases {
        let form = h.list(form);
        assert_eq!(h.eval(&form).unwrap_err().to_string(), message);
    }

    let no_body = h.list(vec![sym("fn"), h.list(vec![sym("x")])]);
    assert_eq!(
        h.eval(&no_body).unwrap_err().to_string(),
        "malformed fn: missing body"
    );
    let bad_params = h.list(vec![sym("fn"), h.list(vec![int(1)]), int(1)]);
    assert_eq!(
        h.eval(&bad_params).unwrap_err().to_string(),
        "malformed fn: parameters must be symbols"
    );
}

#[test]
fn test_builtin_names_are_bound() {
    let mut h = Harness::new();
    for name in builtins::names() {
        let value = h.eval(&sym(name)).unwrap();
        assert_eq!(value.to_string(), format!("#<fn {}>", name));
    }
    assert_eq!(builtins::names().count(), 32);
}
