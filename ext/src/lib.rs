//! lbm-ext - native extensions for the lispbm evaluator
//!
//! Extensions are Rust functions that Lisp programs call like any other
//! function. The evaluator converts its values to [`ExtValue`] on the way in
//! and back on the way out, so this crate never sees evaluator internals.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

pub mod bridge;
pub mod stdlib;

/// Deepest list nesting an [`ExtValue`] may carry across the bridge
pub const MAX_NESTING: usize = 512;

/// A value passed between the evaluator and an extension
#[derive(Debug, Clone, PartialEq)]
pub enum ExtValue {
    Nil,
    True,
    Int(i64),
    Float(f64),
    String(String),
    Symbol(String),
    List(Vec<ExtValue>),
}

/// Result type for extension calls
pub type ExtResult = Result<ExtValue, ExtError>;

/// Errors that can occur during extension calls
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtError {
    #[error("expected {expected} arguments, got {got}")]
    ArgumentCount { expected: usize, got: usize },
    #[error("expected {expected} argument, got {got}")]
    ArgumentType { expected: String, got: String },
    #[error("runtime error: {0}")]
    RuntimeError(String),
    #[error("extension not found: {0}")]
    NotFound(String),
}

/// Trait for functions that can be called from Lisp
pub trait Extension: Send + Sync {
    fn call(&self, args: Vec<ExtValue>) -> ExtResult;
    fn name(&self) -> &str;
    /// Exact argument count, or the minimum when variadic
    fn arity(&self) -> usize;
    fn is_variadic(&self) -> bool {
        false
    }
    fn description(&self) -> Option<&str> {
        None
    }
}

/// What a registry knows about one extension
#[derive(Debug, Clone, PartialEq)]
pub struct ExtInfo {
    pub name: String,
    pub arity: usize,
    pub variadic: bool,
    pub description: Option<String>,
}

impl ExtInfo {
    fn of(extension: &dyn Extension) -> Self {
        ExtInfo {
            name: extension.name().to_string(),
            arity: extension.arity(),
            variadic: extension.is_variadic(),
            description: extension.description().map(str::to_string),
        }
    }
}

impl fmt::Display for ExtInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arity = if self.variadic {
            format!("{}+", self.arity)
        } else {
            self.arity.to_string()
        };
        write!(f, "{:<16} {:<3}", self.name, arity)?;
        if let Some(description) = &self.description {
            write!(f, " {}", description)?;
        }
        Ok(())
    }
}

/// A registry of extensions, looked up by their Lisp name
#[derive(Clone)]
pub struct ExtRegistry {
    extensions: HashMap<String, Arc<dyn Extension>>,
}

impl ExtRegistry {
    pub fn new() -> Self {
        Self {
            extensions: HashMap::new(),
        }
    }

    /// Register an extension, replacing any previous one with the same name
    pub fn register<E: Extension + 'static>(&mut self, extension: E) {
        let name = extension.name().to_string();
        self.extensions.insert(name, Arc::new(extension));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.extensions.contains_key(name)
    }

    /// Call an extension by name
    pub fn call(&self, name: &str, args: Vec<ExtValue>) -> ExtResult {
        match self.extensions.get(name) {
            Some(extension) => extension.call(args),
            None => Err(ExtError::NotFound(name.to_string())),
        }
    }

    pub fn info(&self, name: &str) -> Option<ExtInfo> {
        self.extensions.get(name).map(|e| ExtInfo::of(e.as_ref()))
    }

    /// Every registered extension, sorted by name
    pub fn describe(&self) -> Vec<ExtInfo> {
        let mut all: Vec<ExtInfo> = self
            .extensions
            .values()
            .map(|e| ExtInfo::of(e.as_ref()))
            .collect();
        all.sort_unstable_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.extensions.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Create a registry with the whole standard library
    pub fn with_stdlib() -> Self {
        let mut registry = Self::new();
        stdlib::register_all(&mut registry);
        registry
    }

    /// Create a registry with only the named stdlib modules
    pub fn with_modules(modules: &[&str]) -> Self {
        let mut registry = Self::new();
        stdlib::register_modules(&mut registry, modules);
        registry
    }
}

impl Default for ExtRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExtRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtRegistry")
            .field("extensions", &self.names())
            .finish()
    }
}

impl ExtValue {
    /// Numeric view of ints and floats
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ExtValue::Int(i) => Some(*i as f64),
            ExtValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            ExtValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ExtValue]> {
        match self {
            ExtValue::List(items) => Some(items),
            ExtValue::Nil => Some(&[]),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ExtValue::Nil => "nil",
            ExtValue::True => "t",
            ExtValue::Int(_) => "int",
            ExtValue::Float(_) => "float",
            ExtValue::String(_) => "string",
            ExtValue::Symbol(_) => "symbol",
            ExtValue::List(_) => "list",
        }
    }

    pub fn from_bool(b: bool) -> Self {
        if b {
            ExtValue::True
        } else {
            ExtValue::Nil
        }
    }
}

impl fmt::Display for ExtValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtValue::Nil => write!(f, "nil"),
            ExtValue::True => write!(f, "t"),
            ExtValue::Int(i) => write!(f, "{}", i),
            ExtValue::Float(x) => write!(f, "{:?}", x),
            ExtValue::String(s) => write!(f, "{}", s),
            ExtValue::Symbol(s) => write!(f, "{}", s),
            ExtValue::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
        }
    }
}
