//! The tree-walking evaluator.
//!
//! Values are evaluated directly; a form is a non-empty list whose head is
//! either a special form name or an expression evaluating to something
//! applicable. Compound procedures are plain lists of the shape
//! `(procedure params body env)`, where `env` is the environment captured when
//! the `fn` form was evaluated.

use std::any::Any;
use std::io::Write;

use slotmap::SlotMap;
use tracing::trace;

use crate::error::{EvalError, Result};
use crate::pools::Pools;
use crate::value::{Env, List, Number, ObjectKey, Symbol, Value, PROCEDURE_TAG};

/// Host objects referenced by [`Value::Object`].
pub type Objects = SlotMap<ObjectKey, Box<dyn Any>>;

/// Default limit of nested form evaluations. Small enough to stay within a
/// 2 MiB thread stack in debug builds.
pub const DEFAULT_MAX_DEPTH: usize = 200;

/// Where an expression is evaluated, and so where `def` puts its bindings.
pub enum Scope {
    /// The top level. Bindings go straight into the globals.
    Global,
    /// The body of a compound procedure. Bindings are dropped when it returns.
    Local(Env),
}

pub struct Evaluator<'a> {
    pools: &'a Pools,
    objects: &'a Objects,
    output: &'a mut dyn Write,
    globals: Env,
    depth: usize,
    max_depth: usize,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        pools: &'a Pools,
        objects: &'a Objects,
        output: &'a mut dyn Write,
        globals: Env,
    ) -> Self {
        Evaluator {
            pools,
            objects,
            output,
            globals,
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Limit the nesting of evaluated forms. `0` disables the limit.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn pools(&self) -> &'a Pools {
        self.pools
    }

    /// The sink `println` writes to.
    pub fn output(&mut self) -> &mut dyn Write {
        &mut *self.output
    }

    /// The host object behind `value`, if it is a live object handle.
    pub fn object(&self, value: &Value) -> Option<&'a dyn Any> {
        match value {
            Value::Object(key) => self.objects.get(*key).map(|obj| &**obj),
            _ => None,
        }
    }

    /// The global environment, including definitions made so far.
    pub fn globals(&self) -> &Env {
        &self.globals
    }

    pub fn into_globals(self) -> Env {
        self.globals
    }

    /// Evaluate `value` at the top level.
    pub fn eval_global(&mut self, value: &Value) -> Result<Value> {
        self.eval(value, &mut Scope::Global)
    }

    pub fn eval(&mut self, value: &Value, scope: &mut Scope) -> Result<Value> {
        match value {
            Value::Symbol(name) => self.lookup(name, scope),
            Value::List(form) if !form.is_empty() => {
                if self.max_depth != 0 && self.depth >= self.max_depth {
                    return Err(EvalError::DepthExceeded(self.max_depth));
                }
                self.depth += 1;
                let result = self.eval_form(form, scope);
                self.depth -= 1;
                result
            }
            _ => Ok(value.clone()),
        }
    }

    /// Call `callee` with already evaluated arguments. `env` is the caller's
    /// environment, handed to native functions.
    pub fn apply(&mut self, callee: &Value, args: &[Value], env: &Env) -> Result<Value> {
        match callee {
            Value::Function(func) => func.call(self, args, env),
            Value::List(procedure) if callee.is_compound_procedure() => {
                self.apply_compound(procedure, args)
            }
            Value::Map(map) => match args {
                [key] => Ok(map.get(key).unwrap_or(Value::Nil)),
                _ => Err(EvalError::arity("map", "1", args.len())),
            },
            Value::Vector(items) => match args {
                [Value::Number(Number::Int(index))] => usize::try_from(*index)
                    .ok()
                    .and_then(|i| items.get(i))
                    .cloned()
                    .ok_or(EvalError::IndexOutOfRange {
                        index: *index,
                        len: items.len(),
                    }),
                [other] => Err(EvalError::type_error(
                    "vector",
                    "integer index",
                    other.type_name(),
                )),
                _ => Err(EvalError::arity("vector", "1", args.len())),
            },
            other => Err(EvalError::NotProcedure(other.to_string())),
        }
    }

    fn lookup(&self, name: &Symbol, scope: &Scope) -> Result<Value> {
        let key = Value::Symbol(name.clone());
        let local = match scope {
            Scope::Local(env) => env.get(&key),
            Scope::Global => None,
        };
        // Closures only capture the environment they were created in; falling
        // back to the globals lets top-level functions see later definitions.
        local
            .or_else(|| self.globals.get(&key))
            .ok_or_else(|| EvalError::Unbound(name.clone()))
    }

    fn scope_env(&self, scope: &Scope) -> Env {
        match scope {
            Scope::Global => self.globals.clone(),
            Scope::Local(env) => env.clone(),
        }
    }

    fn eval_form(&mut self, form: &List, scope: &mut Scope) -> Result<Value> {
        let items = form.to_vec();
        let (head, rest) = match items.split_first() {
            Some(split) => split,
            None => return Ok(Value::List(form.clone())),
        };

        if let Some(name) = head.as_symbol() {
            if let Some(result) = self.eval_special(name, rest, scope) {
                return result;
            }
        }

        let callee = self.eval(head, scope)?;
        let args = rest
            .iter()
            .map(|arg| self.eval(arg, scope))
            .collect::<Result<Vec<_>>>()?;
        let env = self.scope_env(scope);
        self.apply(&callee, &args, &env)
    }

    /// Evaluate a special form, or return `None` if `name` does not name one.
    fn eval_special(
        &mut self,
        name: &Symbol,
        rest: &[Value],
        scope: &mut Scope,
    ) -> Option<Result<Value>> {
        let result = match name.as_str() {
            "quote" => self.eval_quote(rest),
            "def" => self.eval_def(rest, scope),
            "set" => self.eval_set(rest, scope),
            "if" => self.eval_if(rest, scope),
            "fn" => self.eval_fn(rest, scope),
            "begin" => self.eval_sequence(rest, scope),
            "cond" => self.eval_cond(rest, scope),
            _ => return None,
        };
        trace!(form = %name, ok = result.is_ok(), "special form");
        Some(result)
    }

    fn eval_quote(&self, rest: &[Value]) -> Result<Value> {
        match rest {
            [quoted] => Ok(quoted.clone()),
            _ => Err(EvalError::malformed("quote", "expected exactly one operand")),
        }
    }

    fn eval_def(&mut self, rest: &[Value], scope: &mut Scope) -> Result<Value> {
        let (name, expr) = match rest {
            [Value::Symbol(name), expr] => (name, expr),
            _ => return Err(EvalError::malformed("def", "expected a symbol and a value")),
        };
        let value = self.eval(expr, scope)?;
        let key = Value::Symbol(name.clone());
        match scope {
            Scope::Global => self.globals = self.globals.add(key, value),
            Scope::Local(env) => *env = env.add(key, value),
        }
        Ok(Value::Nil)
    }

    fn eval_set(&mut self, rest: &[Value], scope: &mut Scope) -> Result<Value> {
        let (name, expr) = match rest {
            [Value::Symbol(name), expr] => (name, expr),
            _ => return Err(EvalError::malformed("set", "expected a symbol and a value")),
        };
        let value = self.eval(expr, scope)?;
        let key = Value::Symbol(name.clone());

        if let Scope::Local(env) = scope {
            if let Some(updated) = env.try_replace_value(key.clone(), value.clone()) {
                *env = updated;
                return Ok(Value::Nil);
            }
        }
        match self.globals.try_replace_value(key, value) {
            Some(updated) => {
                self.globals = updated;
                Ok(Value::Nil)
            }
            None => Err(EvalError::SetUnbound(name.clone())),
        }
    }

    fn eval_if(&mut self, rest: &[Value], scope: &mut Scope) -> Result<Value> {
        let (pred, then, otherwise) = match rest {
            [pred, then] => (pred, then, None),
            [pred, then, otherwise] => (pred, then, Some(otherwise)),
            _ => {
                return Err(EvalError::malformed(
                    "if",
                    "expected a predicate, a consequent and an optional alternative",
                ))
            }
        };
        if self.eval(pred, scope)?.is_truthy() {
            self.eval(then, scope)
        } else if let Some(otherwise) = otherwise {
            self.eval(otherwise, scope)
        } else {
            Ok(Value::Nil)
        }
    }

    fn eval_fn(&mut self, rest: &[Value], scope: &mut Scope) -> Result<Value> {
        let (params, body) = match rest {
            [params @ Value::List(_), body @ ..] => (params, body),
            _ => return Err(EvalError::malformed("fn", "missing parameter list")),
        };
        if body.is_empty() {
            return Err(EvalError::malformed("fn", "missing body"));
        }
        let all_symbols = params
            .as_list()
            .map_or(false, |params| params.iter().all(|p| p.as_symbol().is_some()));
        if !all_symbols {
            return Err(EvalError::malformed("fn", "parameters must be symbols"));
        }

        let body = self.pools.list_from(body.iter().cloned());
        let procedure = self.pools.list_from([
            Value::symbol(PROCEDURE_TAG),
            params.clone(),
            Value::List(body),
            Value::Map(self.scope_env(scope)),
        ]);
        Ok(Value::List(procedure))
    }

    fn eval_cond(&mut self, rest: &[Value], scope: &mut Scope) -> Result<Value> {
        let expanded = expand_clauses(self.pools, rest)?;
        self.eval(&expanded, scope)
    }

    fn eval_sequence(&mut self, body: &[Value], scope: &mut Scope) -> Result<Value> {
        let (last, init) = body
            .split_last()
            .ok_or_else(|| EvalError::malformed("begin", "empty body"))?;
        for form in init {
            self.eval(form, scope)?;
        }
        self.eval(last, scope)
    }

    fn apply_compound(&mut self, procedure: &List, args: &[Value]) -> Result<Value> {
        let parts = procedure.to_vec();
        let (params, body, captured) = match parts.as_slice() {
            [_, Value::List(params), Value::List(body), Value::Map(env)] => (params, body, env),
            _ => {
                return Err(EvalError::malformed(
                    "procedure",
                    "expected (procedure params body env)",
                ))
            }
        };
        if params.len() != args.len() {
            return Err(EvalError::arity(
                "fn",
                params.len().to_string(),
                args.len(),
            ));
        }

        let env = params
            .iter()
            .zip(args)
            .fold(captured.clone(), |env, (param, arg)| env.add(param, arg.clone()));
        self.eval_sequence(&body.to_vec(), &mut Scope::Local(env))
    }
}

/// Rewrite the clauses of a `cond` into nested `if` forms.
///
/// `(cond (a x) (b y z) (else w))` becomes `(if a x (if b (begin y z) w))`.
/// Running out of clauses yields `nil`.
pub fn expand_clauses(pools: &Pools, clauses: &[Value]) -> Result<Value> {
    let (first, rest) = match clauses.split_first() {
        Some(split) => split,
        None => return Ok(Value::Nil),
    };
    let clause = first.as_list().map(List::to_vec).unwrap_or_default();
    let (test, actions) = match clause.split_first() {
        Some(split) => split,
        None => return Err(EvalError::malformed("cond", "clause must be a non-empty list")),
    };

    if test.is_symbol_named("else") {
        if !rest.is_empty() {
            return Err(EvalError::malformed("cond", "else clause isn't last"));
        }
        return Ok(sequence_to_expr(pools, actions));
    }

    let alternative = expand_clauses(pools, rest)?;
    let expanded = pools.list_from([
        Value::symbol("if"),
        test.clone(),
        sequence_to_expr(pools, actions),
        alternative,
    ]);
    Ok(Value::List(expanded))
}

fn sequence_to_expr(pools: &Pools, actions: &[Value]) -> Value {
    match actions {
        [] => Value::Nil,
        [single] => single.clone(),
        _ => Value::List(
            pools.list_from(std::iter::once(Value::symbol("begin")).chain(actions.iter().cloned())),
        ),
    }
}
