use expect_test::{expect, Expect};
use masp_vm::Pools;
use pretty_assertions::assert_eq;
use test_env_log::test;

use crate::{parse, ParseErrorKind, MAX_NESTING};

fn check(src: &str, expected: Expect) {
    let pools = Pools::new();
    let program = parse(src, &pools).unwrap();
    expected.assert_eq(&program.to_string());
    drop(program);
    pools.clear();
}

fn check_err(src: &str, expected: Expect) {
    let pools = Pools::new();
    let err = parse(src, &pools).unwrap_err();
    expected.assert_eq(&err.to_string());
    pools.clear();
}

#[test]
fn test_program_is_wrapped_in_begin() {
    check("(+ 1 2)", expect![["(begin (+ 1 2))"]]);
    check(
        "(def x 1)\n(println x)",
        expect![["(begin (def x 1) (println x))"]],
    );
    check("", expect![["(begin)"]]);
    check("  ; only a comment\n", expect![["(begin)"]]);
}

#[test]
fn test_atoms() {
    check(
        "nil true false foo make-map <= a.b",
        expect![["(begin nil true false foo make-map <= a.b)"]],
    );
    check("- -x +", expect![["(begin - -x +)"]]);
    check("()", expect![["(begin ())"]]);
}

#[test]
fn test_numbers() {
    check(
        "1 -2 +3 0x1f 0b11 1.5 -0.25 2e3",
        expect![["(begin 1 -2 3 31 3 1.5 -0.25 2000.0)"]],
    );
    check_err("(+ 1 2x)", expect![["malformed number `2x` at 1:6"]]);
    check_err("1.2.3", expect![["malformed number `1.2.3` at 1:1"]]);
}

#[test]
fn test_strings() {
    check(
        r#"(println "a\tb\n" "say \"hi\"" "\\")"#,
        expect![[r#"(begin (println "a\tb\n" "say \"hi\"" "\\"))"#]],
    );
    check(r#""(not a list""#, expect![[r#"(begin "(not a list")"#]]);
    check(r#""; not a comment""#, expect![[r#"(begin "; not a comment")"#]]);
}

#[test]
fn test_commas_and_comments_are_whitespace() {
    check(
        "{a 1, b 2} ; trailing\n[1,2,3]",
        expect![["(begin (make-map a 1 b 2) (make-vector 1 2 3))"]],
    );
}

#[test]
fn test_collection_sugar() {
    check("[1 [2] {}]", expect![["(begin (make-vector 1 (make-vector 2) (make-map)))"]]);
    check(
        "{\"k\" [1 2]}",
        expect![[r#"(begin (make-map "k" (make-vector 1 2)))"#]],
    );
}

#[test]
fn test_quote() {
    check("'a", expect![["(begin (quote a))"]]);
    check("'(1 'b)", expect![["(begin (quote (1 (quote b))))"]]);
    check("' [x]", expect![["(begin (quote (make-vector x)))"]]);
    check_err("(a ')", expect![["nothing to quote at 1:4"]]);
    check_err("'", expect![["nothing to quote at 1:1"]]);
}

#[test]
fn test_defn() {
    check(
        "(defn add (a b) (+ a b))",
        expect![["(begin (def add (fn (a b) (+ a b))))"]],
    );
    check(
        "(defn noop ())",
        expect![["(begin (def noop (fn ())))"]],
    );
    check_err(
        "(defn f)",
        expect![["defn needs a name and a parameter list at 1:1"]],
    );
}

#[test]
fn test_scope_errors() {
    check_err("(1 2", expect![["scope left open at 1:1"]]);
    check_err("(1 2))", expect![["faulty closing at 1:6"]]);
    check_err("(a\n  b))", expect![["faulty closing at 2:5"]]);
    check_err("[1 2)", expect![["faulty closing at 1:5"]]);
    check_err("(a (b [c)", expect![["faulty closing at 1:9"]]);
    check_err("(a\n (b\n  c)", expect![["scope left open at 1:1"]]);
    check_err("((a) (b", expect![["scope left open at 1:6"]]);
}

#[test]
fn test_unterminated_string() {
    check_err("(println \"oops)", expect![["unterminated string at 1:10"]]);
    check_err("\"a\\\"", expect![["unterminated string at 1:1"]]);
}

#[test]
fn test_unexpected_char() {
    check_err("(a #b)", expect![["unexpected character `#` at 1:4"]]);
    check_err("`a", expect![["unexpected character ``` at 1:1"]]);
}

#[test]
fn test_error_position() {
    let pools = Pools::new();
    let err = parse("(a\n  b))", &pools).unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::FaultyClosing);
    assert_eq!(err.offset, 7);
    assert_eq!((err.line, err.column), (2, 5));
    pools.clear();
}

#[test]
fn test_nesting_limit() {
    let pools = Pools::new();
    let ok = "(".repeat(MAX_NESTING - 1) + &")".repeat(MAX_NESTING - 1);
    assert!(parse(&ok, &pools).is_ok());

    let deep = "[".repeat(MAX_NESTING + 1) + &"]".repeat(MAX_NESTING + 1);
    let err = parse(&deep, &pools).unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::NestingTooDeep);
    assert_eq!(err.offset, MAX_NESTING);
    pools.clear();
}

#[test]
fn test_printed_program_reads_back() {
    let pools = Pools::new();
    let src = r#"(def m (quote (1 -2.5 "s\n" nil true sym ())))"#;
    let first = parse(src, &pools).unwrap();
    let printed = first.to_string();
    let second = parse(&printed, &pools).unwrap();
    // The reread program is wrapped once more.
    assert_eq!(second.as_list().and_then(|l| l.get(1)), Some(first.clone()));
    drop((first, second));
    pools.clear();
}
