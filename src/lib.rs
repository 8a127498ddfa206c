//! masp is a small Lisp meant to be embedded in a host program.
//!
//! An [`Engine`] owns the pools every value is allocated from, the global
//! environment and the host objects handed to scripts. Source text is read
//! with [`Engine::parse`] and run with [`Engine::eval`]; definitions made by a
//! successful evaluation stay visible to later ones.
//!
//! ```
//! let mut engine = masp::Engine::new();
//! let value = engine.parse_and_eval("(def x 5) (* x x)").unwrap();
//! assert_eq!(value, masp::Value::int(25));
//! ```


use std::any::Any;
use std::io::{self, Write};

use thiserror::Error;
use tracing::debug;

pub use masp_syn::{ParseError, ParseErrorKind};
pub use masp_vm::{
    builtins, Env, EvalError, Evaluator, NativeFunction, Number, Objects, Pools, Value,
    DEFAULT_MAX_DEPTH,
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("evaluation error: {0}")]
    Eval(#[from] EvalError),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Deepest nesting of evaluated forms before evaluation fails. `0` means
    /// no limit.
    pub max_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

pub struct Engine {
    pools: Pools,
    globals: Env,
    objects: Objects,
    output: Box<dyn Write>,
    config: EngineConfig,
}

impl Engine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let pools = Pools::new();
        let globals = builtins::register(&pools.new_map());
        debug!(
            builtins = globals.len(),
            max_depth = config.max_depth,
            "engine created"
        );
        Engine {
            pools,
            globals,
            objects: Objects::with_key(),
            output: Box::new(io::stdout()),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pools(&self) -> &Pools {
        &self.pools
    }

    /// The committed global environment.
    pub fn globals(&self) -> &Env {
        &self.globals
    }

    /// Redirect what `println` writes.
    pub fn set_output(&mut self, output: Box<dyn Write>) {
        self.output = output;
    }

    /// Read `src` into a single `(begin ...)` form.
    pub fn parse(&self, src: &str) -> Result<Value> {
        Ok(masp_syn::parse(src, &self.pools)?)
    }

    /// Evaluate `value` in the global environment.
    ///
    /// Definitions are committed only if evaluation succeeds; on failure the
    /// globals are left exactly as they were.
    pub fn eval(&mut self, value: &Value) -> Result<Value> {
        let mut evaluator = Evaluator::new(
            &self.pools,
            &self.objects,
            &mut *self.output,
            self.globals.clone(),
        )
        .with_max_depth(self.config.max_depth);

        match evaluator.eval_global(value) {
            Ok(result) => {
                self.globals = evaluator.into_globals();
                Ok(result)
            }
            Err(err) => {
                debug!(%err, "evaluation failed");
                Err(err.into())
            }
        }
    }

    pub fn parse_and_eval(&mut self, src: &str) -> Result<Value> {
        let program = self.parse(src)?;
        self.eval(&program)
    }

    /// Reclaim every list and map node no live value can reach. Returns the
    /// number of slots reclaimed.
    pub fn gc(&self) -> usize {
        self.pools.gc()
    }

    /// Bytes held by the pools, used or not.
    pub fn reserved_size_bytes(&self) -> usize {
        self.pools.reserved_size_bytes()
    }

    /// Bytes held by occupied pool slots.
    pub fn live_size_bytes(&self) -> usize {
        self.pools.live_size_bytes()
    }

    /// Bind `name` globally, replacing any previous binding.
    pub fn define(&mut self, name: &str, value: Value) {
        self.globals = self.globals.add(Value::symbol(name), value);
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.globals.get(&Value::symbol(name))
    }

    /// Expose a host function to scripts under `name`.
    pub fn register_fn<F>(&mut self, name: &str, func: F)
    where
        F: Fn(&mut Evaluator<'_>, &[Value], &Env) -> masp_vm::Result<Value> + 'static,
    {
        self.define(name, Value::Function(NativeFunction::new(name, func)));
    }

    /// Store a host object and return the value scripts refer to it by.
    pub fn insert_object<T: Any>(&mut self, object: T) -> Value {
        Value::Object(self.objects.insert(Box::new(object)))
    }

    /// The host object behind `value`, if it is a live object of type `T`.
    pub fn object<T: Any>(&self, value: &Value) -> Option<&T> {
        match value {
            Value::Object(key) => self.objects.get(*key)?.downcast_ref(),
            _ => None,
        }
    }

    /// Take a host object back. Values still referring to it become dangling
    /// handles that no longer resolve.
    pub fn remove_object(&mut self, value: &Value) -> Option<Box<dyn Any>> {
        match value {
            Value::Object(key) => self.objects.remove(*key),
            _ => None,
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // Values stored in the pools hold the pools themselves.
        self.pools.clear();
    }
}
