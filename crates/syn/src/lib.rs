//! Reading masp source text into values.
//!
//! A program is read as a single `(begin ...)` form holding every top-level
//! form. Reader sugar is expanded on the way:
//!
//! - `[a b]` reads as `(make-vector a b)`
//! - `{k v}` reads as `(make-map k v)`
//! - `'x` reads as `(quote x)`
//! - `(defn name params body...)` reads as `(def name (fn params body...))`

mod error;
mod number;
mod reader;
mod scope;

#[cfg(test)]
mod test;

use masp_vm::{Pools, Value};
use tracing::debug;

pub use error::{ParseError, ParseErrorKind, Result};
pub use reader::{Reader, MAX_NESTING};

/// Read `src` into a `(begin ...)` form allocated from `pools`.
pub fn parse(src: &str, pools: &Pools) -> Result<Value> {
    let result = Reader::new(src, pools).read_program();
    if let Err(err) = &result {
        debug!(%err, "parse failed");
    }
    result
}
