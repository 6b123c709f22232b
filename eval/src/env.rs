//! Environments
//!
//! Local environments are persistent binding chains: extending one never
//! changes it, so closures can capture them by cloning an `Arc`. The global
//! environment is a plain map shared by all contexts.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::symbols::{SymId, Symbol};
use crate::value::{defer_release, release, Value};

#[derive(Clone, Default)]
pub struct Env(Option<Arc<Binding>>);

struct Binding {
    symbol: Symbol,
    value: Value,
    next: Env,
}

impl Drop for Binding {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        defer_release(std::mem::replace(&mut self.value, Value::Nil), &mut pending);
        self.next.release_into(&mut pending);
        release(pending);
    }
}

impl Env {
    pub fn empty() -> Self {
        Env(None)
    }

    /// New environment with `symbol` bound in front of `self`
    pub fn extend(&self, symbol: Symbol, value: Value) -> Env {
        Env(Some(Arc::new(Binding {
            symbol,
            value,
            next: self.clone(),
        })))
    }

    pub fn lookup(&self, id: SymId) -> Option<&Value> {
        let mut cur = self.0.as_ref();
        while let Some(binding) = cur {
            if binding.symbol.id() == id {
                return Some(&binding.value);
            }
            cur = binding.next.0.as_ref();
        }
        None
    }

    /// Detach the uniquely owned prefix of the chain, moving its values
    /// onto `pending`
    pub(crate) fn release_into(&mut self, pending: &mut Vec<Value>) {
        let mut next = self.0.take();
        while let Some(binding) = next {
            match Arc::try_unwrap(binding) {
                Ok(mut binding) => {
                    defer_release(std::mem::replace(&mut binding.value, Value::Nil), pending);
                    next = binding.next.0.take();
                }
                Err(_) => break,
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub fn len(&self) -> usize {
        let mut n = 0;
        let mut cur = self.0.as_ref();
        while let Some(binding) = cur {
            n += 1;
            cur = binding.next.0.as_ref();
        }
        n
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        let mut cur = self.0.as_ref();
        while let Some(binding) = cur {
            list.entry(&binding.symbol);
            cur = binding.next.0.as_ref();
        }
        list.finish()
    }
}

/// Global bindings, keyed by symbol id
#[derive(Debug, Clone, Default)]
pub struct GlobalEnv {
    bindings: HashMap<SymId, Value>,
}

impl GlobalEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: SymId) -> Option<&Value> {
        self.bindings.get(&id)
    }

    pub fn insert(&mut self, id: SymId, value: Value) -> Option<Value> {
        self.bindings.insert(id, value)
    }

    pub fn remove(&mut self, id: SymId) -> Option<Value> {
        self.bindings.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn clear(&mut self) {
        self.bindings.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::SymbolTable;

    #[test]
    fn test_extend_shadows_without_mutating() {
        let mut symbols = SymbolTable::new();
        let x = symbols.intern("x");
        let y = symbols.intern("y");

        let outer = Env::empty().extend(x.clone(), Value::Int(1));
        let inner = outer
            .extend(y.clone(), Value::Int(2))
            .extend(x.clone(), Value::Int(3));

        assert_eq!(inner.lookup(x.id()), Some(&Value::Int(3)));
        assert_eq!(inner.lookup(y.id()), Some(&Value::Int(2)));
        assert_eq!(outer.lookup(x.id()), Some(&Value::Int(1)));
        assert_eq!(outer.lookup(y.id()), None);
        assert_eq!(inner.len(), 3);
        assert!(Env::empty().is_empty());
    }

    #[test]
    fn test_deep_chain_drops() {
        let mut symbols = SymbolTable::new();
        let x = symbols.intern("x");
        let mut env = Env::empty();
        for i in 0..200_000 {
            env = env.extend(x.clone(), Value::Int(i));
        }
        assert_eq!(env.lookup(x.id()), Some(&Value::Int(199_999)));
        drop(env);
    }

    #[test]
    fn test_global_env() {
        let mut symbols = SymbolTable::new();
        let g = symbols.intern("g");
        let mut globals = GlobalEnv::new();
        assert!(globals.insert(g.id(), Value::Int(1)).is_none());
        assert_eq!(globals.insert(g.id(), Value::Int(2)), Some(Value::Int(1)));
        assert_eq!(globals.get(g.id()), Some(&Value::Int(2)));
        assert_eq!(globals.len(), 1);
        globals.clear();
        assert!(globals.is_empty());
    }
}
