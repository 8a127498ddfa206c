use smol_str::SmolStr;
use thiserror::Error;

use crate::value::Symbol;

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("unbound symbol: {0}")]
    Unbound(Symbol),

    #[error("cannot set unbound symbol: {0}")]
    SetUnbound(Symbol),

    #[error("malformed {form}: {reason}")]
    Malformed {
        form: &'static str,
        reason: &'static str,
    },

    #[error("{func}: expected {expected}, found {found}")]
    Type {
        func: SmolStr,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{func}: expected {expected} argument(s), found {found}")]
    Arity {
        func: SmolStr,
        expected: String,
        found: usize,
    },

    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("attempt to apply non-procedure {0}")]
    NotProcedure(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("recursion depth exceeded (limit {0})")]
    DepthExceeded(usize),

    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),

    /// Raised by host functions.
    #[error("{0}")]
    Custom(String),
}

impl EvalError {
    pub fn malformed(form: &'static str, reason: &'static str) -> Self {
        EvalError::Malformed { form, reason }
    }

    pub fn type_error(func: &str, expected: &'static str, found: &'static str) -> Self {
        EvalError::Type {
            func: func.into(),
            expected,
            found,
        }
    }

    pub fn arity(func: &str, expected: impl Into<String>, found: usize) -> Self {
        EvalError::Arity {
            func: func.into(),
            expected: expected.into(),
            found,
        }
    }
}

pub type Result<T> = std::result::Result<T, EvalError>;
