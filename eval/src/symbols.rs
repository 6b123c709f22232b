//! Symbol interning
//!
//! Symbols compare by id. The first block of ids is fixed: special forms,
//! fundamentals and the symbols the evaluator itself produces (error
//! symbols, `exit-ok`, `timeout`, ...), so the machine can dispatch on
//! constants instead of strings.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymId(pub u32);

/// An interned symbol: id plus a shared copy of its name
#[derive(Clone)]
pub struct Symbol {
    id: SymId,
    name: Arc<str>,
}

impl Symbol {
    pub fn id(&self) -> SymId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Ids of the predefined symbols; `PREDEFINED[id]` is the name.
pub mod sym {
    use super::SymId;

    // special forms
    pub const QUOTE: SymId = SymId(0);
    pub const DEFINE: SymId = SymId(1);
    pub const LAMBDA: SymId = SymId(2);
    pub const IF: SymId = SymId(3);
    pub const LET: SymId = SymId(4);
    pub const PROGN: SymId = SymId(5);
    pub const AND: SymId = SymId(6);
    pub const OR: SymId = SymId(7);
    pub const MATCH: SymId = SymId(8);
    pub const RECV: SymId = SymId(9);
    pub const RECV_TO: SymId = SymId(10);
    pub const TRAP: SymId = SymId(11);

    // fundamentals
    pub const ADD: SymId = SymId(12);
    pub const SUB: SymId = SymId(13);
    pub const MUL: SymId = SymId(14);
    pub const DIV: SymId = SymId(15);
    pub const MOD: SymId = SymId(16);
    pub const NUM_EQ: SymId = SymId(17);
    pub const LT: SymId = SymId(18);
    pub const GT: SymId = SymId(19);
    pub const LEQ: SymId = SymId(20);
    pub const GEQ: SymId = SymId(21);
    pub const EQ: SymId = SymId(22);
    pub const NOT: SymId = SymId(23);
    pub const CONS: SymId = SymId(24);
    pub const CAR: SymId = SymId(25);
    pub const CDR: SymId = SymId(26);
    pub const LIST: SymId = SymId(27);
    pub const APPEND: SymId = SymId(28);
    pub const LENGTH: SymId = SymId(29);
    pub const SELF: SymId = SymId(30);
    pub const SEND: SymId = SymId(31);
    pub const SPAWN: SymId = SymId(32);
    pub const WAIT: SymId = SymId(33);
    pub const SLEEP: SymId = SymId(34);
    pub const YIELD: SymId = SymId(35);

    // pattern syntax and results
    pub const BIND: SymId = SymId(36);
    pub const WILDCARD: SymId = SymId(37);
    pub const EXIT_OK: SymId = SymId(38);
    pub const EXIT_ERROR: SymId = SymId(39);
    pub const NO_MATCH: SymId = SymId(40);
    pub const TIMEOUT: SymId = SymId(41);

    // errors
    pub const TYPE_ERROR: SymId = SymId(42);
    pub const VARIABLE_NOT_BOUND: SymId = SymId(43);
    pub const DIVISION_BY_ZERO: SymId = SymId(44);
    pub const EVAL_ERROR: SymId = SymId(45);
    pub const STACK_OVERFLOW: SymId = SymId(46);
}

const PREDEFINED: &[&str] = &[
    "quote",
    "define",
    "lambda",
    "if",
    "let",
    "progn",
    "and",
    "or",
    "match",
    "recv",
    "recv-to",
    "trap",
    "+",
    "-",
    "*",
    "/",
    "mod",
    "=",
    "<",
    ">",
    "<=",
    ">=",
    "eq",
    "not",
    "cons",
    "car",
    "cdr",
    "list",
    "append",
    "length",
    "self",
    "send",
    "spawn",
    "wait",
    "sleep",
    "yield",
    "?",
    "_",
    "exit-ok",
    "exit-error",
    "no_match",
    "timeout",
    "type_error",
    "variable_not_bound",
    "division_by_zero",
    "eval_error",
    "stack_overflow",
];

/// Name to symbol table shared by every context
#[derive(Debug, Clone)]
pub struct SymbolTable {
    by_name: HashMap<Arc<str>, SymId>,
    names: Vec<Arc<str>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        let mut table = SymbolTable {
            by_name: HashMap::new(),
            names: Vec::with_capacity(PREDEFINED.len() * 2),
        };
        for name in PREDEFINED {
            table.intern(name);
        }
        table
    }

    /// Return the symbol for `name`, adding it if unseen
    pub fn intern(&mut self, name: &str) -> Symbol {
        if let Some(&id) = self.by_name.get(name) {
            return Symbol {
                id,
                name: self.names[id.0 as usize].clone(),
            };
        }
        let id = SymId(self.names.len() as u32);
        let name: Arc<str> = Arc::from(name);
        self.names.push(name.clone());
        self.by_name.insert(name.clone(), id);
        Symbol { id, name }
    }

    pub fn lookup(&self, name: &str) -> Option<Symbol> {
        self.by_name.get(name).map(|&id| Symbol {
            id,
            name: self.names[id.0 as usize].clone(),
        })
    }

    pub fn symbol(&self, id: SymId) -> Option<Symbol> {
        self.names
            .get(id.0 as usize)
            .map(|name| Symbol { id, name: name.clone() })
    }

    /// Symbol value for a predefined id
    pub fn value(&self, id: SymId) -> Value {
        match self.symbol(id) {
            Some(symbol) => Value::Symbol(symbol),
            None => Value::Nil,
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}
