mod hash;
mod number;
mod print;

use std::fmt;
use std::rc::Rc;

use masp_gc::{PersistentList, PersistentMap};
use slotmap::new_key_type;
use smol_str::SmolStr;

use crate::error::Result;
use crate::eval::Evaluator;

pub use number::Number;

/// Symbols are small inline strings; most names need no allocation.
pub type Symbol = SmolStr;
pub type List = PersistentList<Value>;
pub type Map = PersistentMap<Value, Value>;
/// An environment maps symbols to their values.
pub type Env = Map;

/// The head symbol of a compound procedure list.
pub const PROCEDURE_TAG: &str = "procedure";

new_key_type! {
    /// Handle of a host object stored by the engine.
    pub struct ObjectKey;
}

/// Signature of a native function.
pub type NativeFn = dyn Fn(&mut Evaluator<'_>, &[Value], &Env) -> Result<Value>;

/// A host function callable from scripts.
#[derive(Clone)]
pub struct NativeFunction {
    name: SmolStr,
    func: Rc<NativeFn>,
}

impl NativeFunction {
    pub fn new<F>(name: impl Into<SmolStr>, func: F) -> Self
    where
        F: Fn(&mut Evaluator<'_>, &[Value], &Env) -> Result<Value> + 'static,
    {
        NativeFunction {
            name: name.into(),
            func: Rc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, eval: &mut Evaluator<'_>, args: &[Value], env: &Env) -> Result<Value> {
        (self.func)(eval, args, env)
    }
}

impl PartialEq for NativeFunction {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(
            Rc::as_ptr(&self.func) as *const (),
            Rc::as_ptr(&other.func) as *const (),
        )
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunction({})", self.name)
    }
}

#[derive(Clone)]
pub enum Value {
    Nil,
    Boolean(bool),
    Number(Number),
    NumberArray(Vec<f64>),
    String(String),
    Symbol(Symbol),
    Vector(Vec<Value>),
    List(List),
    Map(Map),
    Object(ObjectKey),
    Function(NativeFunction),
}

impl Value {
    pub fn symbol(name: impl Into<Symbol>) -> Value {
        Value::Symbol(name.into())
    }

    pub fn int(v: i64) -> Value {
        Value::Number(Number::Int(v))
    }

    pub fn float(v: f64) -> Value {
        Value::Number(Number::Float(v))
    }

    /// Name of this value's kind, as used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Boolean(_) => "boolean",
            Value::Number(Number::Int(_)) => "integer",
            Value::Number(Number::Float(_)) => "float",
            Value::NumberArray(_) => "number array",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Vector(_) => "vector",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
        }
    }

    /// Everything except `nil` and `false` is true.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Boolean(false))
    }

    /// Returns `true` if the value evaluates to itself.
    pub fn is_self_evaluating(&self) -> bool {
        !matches!(self, Value::Symbol(_) | Value::List(_))
    }

    /// Returns `true` if the value is [`Nil`].
    ///
    /// [`Nil`]: Value::Nil
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    pub fn as_bool(&self) -> Option<bool> {
        if let Self::Boolean(v) = self {
            Some(*v)
        } else {
            None
        }
    }

    pub fn as_number(&self) -> Option<Number> {
        if let Self::Number(v) = self {
            Some(*v)
        } else {
            None
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        if let Self::Number(Number::Int(v)) = self {
            Some(*v)
        } else {
            None
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        self.as_number().map(Number::to_float)
    }

    pub fn as_str(&self) -> Option<&str> {
        if let Self::String(v) = self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_symbol(&self) -> Option<&Symbol> {
        if let Self::Symbol(v) = self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_list(&self) -> Option<&List> {
        if let Self::List(v) = self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        if let Self::Map(v) = self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_vector(&self) -> Option<&[Value]> {
        if let Self::Vector(v) = self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_function(&self) -> Option<&NativeFunction> {
        if let Self::Function(v) = self {
            Some(v)
        } else {
            None
        }
    }

    /// Whether this is the symbol `name`.
    pub fn is_symbol_named(&self, name: &str) -> bool {
        self.as_symbol().map_or(false, |s| s == name)
    }

    /// Returns `true` for a `(procedure params body env)` list built by `fn`.
    pub fn is_compound_procedure(&self) -> bool {
        match self {
            Value::List(list) => {
                list.len() == 4
                    && list.first().map_or(false, |v| v.is_symbol_named(PROCEDURE_TAG))
                    && matches!(list.get(3), Some(Value::Map(_)))
            }
            _ => false,
        }
    }

    /// Whether this value can be applied to arguments.
    pub fn is_procedure(&self) -> bool {
        matches!(self, Value::Function(_)) || self.is_compound_procedure()
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::float(v)
    }
}

impl From<Number> for Value {
    fn from(v: Number) -> Self {
        Value::Number(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Vector(v)
    }
}

impl From<List> for Value {
    fn from(v: List) -> Self {
        Value::List(v)
    }
}

impl From<Map> for Value {
    fn from(v: Map) -> Self {
        Value::Map(v)
    }
}

impl From<NativeFunction> for Value {
    fn from(v: NativeFunction) -> Self {
        Value::Function(v)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::NumberArray(a), Value::NumberArray(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Vector(a), Value::Vector(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}
