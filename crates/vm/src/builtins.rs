//! The primitive functions every engine starts with.

use std::cmp::Ordering;
use std::io::Write;
use std::iter;

use itertools::Itertools;

use crate::error::{EvalError, Result};
use crate::eval::Evaluator;
use crate::pools::Pools;
use crate::value::{Env, NativeFunction, Number, Value};

type Builtin = fn(&mut Evaluator<'_>, &[Value], &Env) -> Result<Value>;

static BUILTINS: &[(&str, Builtin)] = &[
    ("+", op_add),
    ("-", op_sub),
    ("*", op_mul),
    ("/", op_div),
    ("=", op_eq),
    ("!=", op_ne),
    ("<", op_lt),
    (">", op_gt),
    ("<=", op_le),
    (">=", op_ge),
    ("first", first),
    ("ffirst", ffirst),
    ("next", next),
    ("fnext", fnext),
    ("nnext", nnext),
    ("nfirst", nfirst),
    ("integer?", is_integer),
    ("float?", is_float),
    ("string?", is_string),
    ("boolean?", is_boolean),
    ("symbol?", is_symbol),
    ("map?", is_map),
    ("vector?", is_vector),
    ("list?", is_list),
    ("fn?", is_fn),
    ("object?", is_object),
    ("make-map", make_map),
    ("make-vector", make_vector),
    ("println", println),
    ("str", str),
    ("count", count),
    ("cons", cons),
];

/// Names of all builtins, in registration order.
pub fn names() -> impl Iterator<Item = &'static str> {
    BUILTINS.iter().map(|(name, _)| *name)
}

/// Bind every builtin in `env`.
pub fn register(env: &Env) -> Env {
    BUILTINS.iter().fold(env.clone(), |env, (name, func)| {
        env.add(
            Value::symbol(*name),
            Value::Function(NativeFunction::new(*name, *func)),
        )
    })
}

fn number(func: &str, v: &Value) -> Result<Number> {
    v.as_number()
        .ok_or_else(|| EvalError::type_error(func, "number", v.type_name()))
}

fn one<'v>(func: &str, args: &'v [Value]) -> Result<&'v Value> {
    match args {
        [v] => Ok(v),
        _ => Err(EvalError::arity(func, "1", args.len())),
    }
}

fn op_add(_: &mut Evaluator<'_>, args: &[Value], _: &Env) -> Result<Value> {
    args.iter()
        .try_fold(Number::Int(0), |acc, v| Ok(acc + number("+", v)?))
        .map(Value::Number)
}

fn op_mul(_: &mut Evaluator<'_>, args: &[Value], _: &Env) -> Result<Value> {
    args.iter()
        .try_fold(Number::Int(1), |acc, v| Ok(acc * number("*", v)?))
        .map(Value::Number)
}

fn op_sub(_: &mut Evaluator<'_>, args: &[Value], _: &Env) -> Result<Value> {
    match args {
        [] => Err(EvalError::arity("-", "at least 1", 0)),
        [v] => Ok(Value::Number(-number("-", v)?)),
        [first, rest @ ..] => rest
            .iter()
            .try_fold(number("-", first)?, |acc, v| Ok(acc - number("-", v)?))
            .map(Value::Number),
    }
}

fn op_div(_: &mut Evaluator<'_>, args: &[Value], _: &Env) -> Result<Value> {
    let (first, rest) = match args {
        [] => return Err(EvalError::arity("/", "at least 1", 0)),
        // the reciprocal
        [_] => (Number::Int(1), args),
        [first, rest @ ..] => (number("/", first)?, rest),
    };
    rest.iter()
        .try_fold(first, |acc, v| {
            acc.checked_div(number("/", v)?)
                .ok_or(EvalError::DivisionByZero)
        })
        .map(Value::Number)
}

fn op_eq(_: &mut Evaluator<'_>, args: &[Value], _: &Env) -> Result<Value> {
    if args.is_empty() {
        return Err(EvalError::arity("=", "at least 1", 0));
    }
    Ok(Value::Boolean(args.iter().tuple_windows().all(|(a, b)| a == b)))
}

fn op_ne(eval: &mut Evaluator<'_>, args: &[Value], env: &Env) -> Result<Value> {
    let equal = op_eq(eval, args, env)?;
    Ok(Value::Boolean(!equal.is_truthy()))
}

/// Whether every adjacent pair of `args` is ordered as `test` wants.
fn compare(func: &str, args: &[Value], test: fn(Ordering) -> bool) -> Result<Value> {
    if args.is_empty() {
        return Err(EvalError::arity(func, "at least 1", 0));
    }
    let numbers = args
        .iter()
        .map(|v| number(func, v))
        .collect::<Result<Vec<_>>>()?;
    let ordered = numbers
        .iter()
        .tuple_windows()
        .all(|(a, b)| a.partial_cmp(b).map_or(false, test));
    Ok(Value::Boolean(ordered))
}

fn op_lt(_: &mut Evaluator<'_>, args: &[Value], _: &Env) -> Result<Value> {
    compare("<", args, Ordering::is_lt)
}

fn op_gt(_: &mut Evaluator<'_>, args: &[Value], _: &Env) -> Result<Value> {
    compare(">", args, Ordering::is_gt)
}

fn op_le(_: &mut Evaluator<'_>, args: &[Value], _: &Env) -> Result<Value> {
    compare("<=", args, Ordering::is_le)
}

fn op_ge(_: &mut Evaluator<'_>, args: &[Value], _: &Env) -> Result<Value> {
    compare(">=", args, Ordering::is_ge)
}

fn first_of(func: &str, v: &Value) -> Result<Value> {
    match v {
        Value::List(list) => Ok(list.first().unwrap_or(Value::Nil)),
        Value::Vector(items) => Ok(items.first().cloned().unwrap_or(Value::Nil)),
        Value::Nil => Ok(Value::Nil),
        other => Err(EvalError::type_error(
            func,
            "list, vector or nil",
            other.type_name(),
        )),
    }
}

/// Everything after the first element as a list, or nil if nothing is left.
fn next_of(pools: &Pools, func: &str, v: &Value) -> Result<Value> {
    match v {
        Value::List(list) if list.len() > 1 => Ok(Value::List(list.rest())),
        Value::Vector(items) if items.len() > 1 => {
            Ok(Value::List(pools.list_from(items[1..].iter().cloned())))
        }
        Value::List(_) | Value::Vector(_) | Value::Nil => Ok(Value::Nil),
        other => Err(EvalError::type_error(
            func,
            "list, vector or nil",
            other.type_name(),
        )),
    }
}

fn first(_: &mut Evaluator<'_>, args: &[Value], _: &Env) -> Result<Value> {
    first_of("first", one("first", args)?)
}

fn ffirst(_: &mut Evaluator<'_>, args: &[Value], _: &Env) -> Result<Value> {
    let v = first_of("ffirst", one("ffirst", args)?)?;
    first_of("ffirst", &v)
}

fn next(eval: &mut Evaluator<'_>, args: &[Value], _: &Env) -> Result<Value> {
    next_of(eval.pools(), "next", one("next", args)?)
}

fn fnext(eval: &mut Evaluator<'_>, args: &[Value], _: &Env) -> Result<Value> {
    let v = next_of(eval.pools(), "fnext", one("fnext", args)?)?;
    first_of("fnext", &v)
}

fn nnext(eval: &mut Evaluator<'_>, args: &[Value], _: &Env) -> Result<Value> {
    let v = next_of(eval.pools(), "nnext", one("nnext", args)?)?;
    next_of(eval.pools(), "nnext", &v)
}

fn nfirst(eval: &mut Evaluator<'_>, args: &[Value], _: &Env) -> Result<Value> {
    let v = first_of("nfirst", one("nfirst", args)?)?;
    next_of(eval.pools(), "nfirst", &v)
}

macro_rules! predicate {
    ($func:ident, $name:literal, $test:expr) => {
        fn $func(_: &mut Evaluator<'_>, args: &[Value], _: &Env) -> Result<Value> {
            let test: fn(&Value) -> bool = $test;
            Ok(Value::Boolean(test(one($name, args)?)))
        }
    };
}

predicate!(is_integer, "integer?", |v| matches!(
    v,
    Value::Number(Number::Int(_))
));
predicate!(is_float, "float?", |v| matches!(
    v,
    Value::Number(Number::Float(_))
));
predicate!(is_string, "string?", |v| matches!(v, Value::String(_)));
predicate!(is_boolean, "boolean?", |v| matches!(v, Value::Boolean(_)));
predicate!(is_symbol, "symbol?", |v| matches!(v, Value::Symbol(_)));
predicate!(is_map, "map?", |v| matches!(v, Value::Map(_)));
predicate!(is_vector, "vector?", |v| matches!(v, Value::Vector(_)));
predicate!(is_list, "list?", |v| matches!(v, Value::List(_)));
predicate!(is_fn, "fn?", Value::is_procedure);
predicate!(is_object, "object?", |v| matches!(v, Value::Object(_)));

fn make_map(eval: &mut Evaluator<'_>, args: &[Value], _: &Env) -> Result<Value> {
    if args.len() % 2 != 0 {
        return Err(EvalError::arity("make-map", "an even number of", args.len()));
    }
    let pairs = args
        .chunks_exact(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()));
    Ok(Value::Map(eval.pools().map_from(pairs)))
}

fn make_vector(_: &mut Evaluator<'_>, args: &[Value], _: &Env) -> Result<Value> {
    Ok(Value::Vector(args.to_vec()))
}

fn println(eval: &mut Evaluator<'_>, args: &[Value], _: &Env) -> Result<Value> {
    let line = args.iter().map(Value::to_display_string).join(" ");
    writeln!(eval.output(), "{}", line)?;
    Ok(Value::Nil)
}

fn str(_: &mut Evaluator<'_>, args: &[Value], _: &Env) -> Result<Value> {
    Ok(Value::String(
        args.iter().map(Value::to_display_string).collect(),
    ))
}

fn count(_: &mut Evaluator<'_>, args: &[Value], _: &Env) -> Result<Value> {
    let len = match one("count", args)? {
        Value::List(list) => list.len(),
        Value::Vector(items) => items.len(),
        Value::Map(map) => map.len(),
        Value::String(s) => s.chars().count(),
        Value::NumberArray(items) => items.len(),
        Value::Nil => 0,
        other => {
            return Err(EvalError::type_error(
                "count",
                "a collection",
                other.type_name(),
            ))
        }
    };
    Ok(Value::int(len as i64))
}

/// `(cons x coll)` puts `x` in front of `coll` and returns a list.
fn cons(eval: &mut Evaluator<'_>, args: &[Value], _: &Env) -> Result<Value> {
    let (head, tail) = match args {
        [head, tail] => (head, tail),
        _ => return Err(EvalError::arity("cons", "2", args.len())),
    };
    let pools = eval.pools();
    let list = match tail {
        Value::List(list) => list.add(head.clone()),
        Value::Nil => pools.list_from([head.clone()]),
        Value::Vector(items) => {
            pools.list_from(iter::once(head.clone()).chain(items.iter().cloned()))
        }
        other => {
            return Err(EvalError::type_error(
                "cons",
                "list, vector or nil",
                other.type_name(),
            ))
        }
    };
    Ok(Value::List(list))
}
