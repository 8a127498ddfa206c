use std::fmt::{self, Display, Write};

use itertools::Itertools;

use super::{Number, Value};

fn write_escaped(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_char('"')?;
    for ch in s.chars() {
        match ch {
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            '\r' => f.write_str("\\r")?,
            '\0' => f.write_str("\\0")?,
            '\\' => f.write_str("\\\\")?,
            '"' => f.write_str("\\\"")?,
            ch => f.write_char(ch)?,
        }
    }
    f.write_char('"')
}

/// Prints the readable form of a value. Strings are quoted and escaped, so
/// everything except functions and objects reads back as an equal value.
impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::NumberArray(items) => write!(
                f,
                "[{}]",
                items.iter().map(|v| Number::Float(*v)).format(" ")
            ),
            Value::String(s) => write_escaped(f, s),
            Value::Symbol(s) => f.write_str(s),
            Value::Vector(items) => write!(f, "[{}]", items.iter().format(" ")),
            Value::List(_) if self.is_compound_procedure() => f.write_str("#<procedure>"),
            Value::List(list) => write!(f, "({})", list.iter().format(" ")),
            Value::Map(map) => write!(
                f,
                "{{{}}}",
                map.iter()
                    .format_with(" ", |(k, v), f| f(&format_args!("{} {}", k, v)))
            ),
            Value::Object(_) => f.write_str("#<object>"),
            Value::Function(func) => write!(f, "#<fn {}>", func.name()),
        }
    }
}

impl Value {
    /// Like the `Display` form, but top-level strings are written as they are.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}
