//! Values, the evaluator and the primitive library of masp.

pub mod builtins;
pub mod error;
pub mod eval;
pub mod pools;
pub mod value;

pub use error::{EvalError, Result};
pub use eval::{expand_clauses, Evaluator, Objects, Scope, DEFAULT_MAX_DEPTH};
pub use pools::Pools;
pub use value::{Env, List, Map, NativeFunction, Number, ObjectKey, Symbol, Value};

#[cfg(test)]
mod test;
