use std::fmt;
use std::sync::Arc;

use crate::builtins::Fundamental;
use crate::env::Env;
use crate::symbols::Symbol;

/// A Lisp value. Values are immutable and share structure through `Arc`.
///
/// Nothing that walks a value recurses on the host stack: dropping,
/// comparing and printing all keep their own worklist, so a list nested a
/// million levels deep is as safe as a flat one.
#[derive(Clone)]
pub enum Value {
    Nil,
    True,
    Int(i64),
    Float(f64),
    Symbol(Symbol),
    Str(Arc<str>),
    Cons(Arc<Cons>),
    Closure(Arc<Closure>),
    Fundamental(Fundamental),
    Extension(Arc<str>),
}

#[derive(Debug)]
pub struct Cons {
    pub car: Value,
    pub cdr: Value,
}

#[derive(Debug)]
pub struct Closure {
    pub params: Vec<Symbol>,
    pub body: Value,
    pub env: Env,
}

/// Push `value` for later release if dropping it could cascade
pub(crate) fn defer_release(value: Value, pending: &mut Vec<Value>) {
    if matches!(value, Value::Cons(_) | Value::Closure(_)) {
        pending.push(value);
    }
}

/// Free a value graph one uniquely owned node at a time. Children are moved
/// out of each node before it is dropped, so every `Drop` below sees only
/// leaves.
pub(crate) fn release(mut pending: Vec<Value>) {
    while let Some(value) = pending.pop() {
        match value {
            Value::Cons(cell) => {
                if let Ok(mut cell) = Arc::try_unwrap(cell) {
                    defer_release(std::mem::replace(&mut cell.car, Value::Nil), &mut pending);
                    defer_release(std::mem::replace(&mut cell.cdr, Value::Nil), &mut pending);
                }
            }
            Value::Closure(closure) => {
                if let Ok(mut closure) = Arc::try_unwrap(closure) {
                    defer_release(std::mem::replace(&mut closure.body, Value::Nil), &mut pending);
                    closure.env.release_into(&mut pending);
                }
            }
            _ => {}
        }
    }
}

impl Drop for Cons {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        defer_release(std::mem::replace(&mut self.car, Value::Nil), &mut pending);
        defer_release(std::mem::replace(&mut self.cdr, Value::Nil), &mut pending);
        release(pending);
    }
}

impl Drop for Closure {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        defer_release(std::mem::replace(&mut self.body, Value::Nil), &mut pending);
        self.env.release_into(&mut pending);
        release(pending);
    }
}

impl Value {
    pub fn cons(car: Value, cdr: Value) -> Value {
        Value::Cons(Arc::new(Cons { car, cdr }))
    }

    /// Build a proper list from `items`
    pub fn list<I>(items: I) -> Value
    where
        I: IntoIterator<Item = Value>,
        I::IntoIter: DoubleEndedIterator,
    {
        Value::list_with_tail(items, Value::Nil)
    }

    /// Build a list ending in `tail` instead of `nil`
    pub fn list_with_tail<I>(items: I, tail: Value) -> Value
    where
        I: IntoIterator<Item = Value>,
        I::IntoIter: DoubleEndedIterator,
    {
        items
            .into_iter()
            .rev()
            .fold(tail, |acc, item| Value::cons(item, acc))
    }

    pub fn string(s: &str) -> Value {
        Value::Str(Arc::from(s))
    }

    pub fn from_bool(b: bool) -> Value {
        if b {
            Value::True
        } else {
            Value::Nil
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn is_truthy(&self) -> bool {
        !self.is_nil()
    }

    /// `nil` or a cons cell
    pub fn is_list(&self) -> bool {
        matches!(self, Value::Nil | Value::Cons(_))
    }

    pub fn car(&self) -> Option<&Value> {
        match self {
            Value::Cons(cell) => Some(&cell.car),
            _ => None,
        }
    }

    pub fn cdr(&self) -> Option<&Value> {
        match self {
            Value::Cons(cell) => Some(&cell.cdr),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self {
            Value::Symbol(s) => Some(s),
            _ => None,
        }
    }

    /// Iterate the elements of a list; an improper tail is not visited
    pub fn iter(&self) -> ListIter<'_> {
        ListIter { cur: self }
    }

    /// Elements of a proper list, `None` for anything else
    pub fn to_vec(&self) -> Option<Vec<Value>> {
        let mut out = Vec::new();
        let mut cur = self;
        loop {
            match cur {
                Value::Nil => return Some(out),
                Value::Cons(cell) => {
                    out.push(cell.car.clone());
                    cur = &cell.cdr;
                }
                _ => return None,
            }
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::True => "t",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Symbol(_) => "symbol",
            Value::Str(_) => "string",
            Value::Cons(_) => "cons",
            Value::Closure(_) => "closure",
            Value::Fundamental(_) => "fundamental",
            Value::Extension(_) => "extension",
        }
    }
}

pub struct ListIter<'a> {
    cur: &'a Value,
}

impl<'a> Iterator for ListIter<'a> {
    type Item = &'a Value;

    fn next(&mut self) -> Option<&'a Value> {
        match self.cur {
            Value::Cons(cell) => {
                self.cur = &cell.cdr;
                Some(&cell.car)
            }
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        let mut pending = vec![(self, other)];
        while let Some((a, b)) = pending.pop() {
            let same = match (a, b) {
                (Value::Nil, Value::Nil) | (Value::True, Value::True) => true,
                (Value::Int(x), Value::Int(y)) => x == y,
                (Value::Float(x), Value::Float(y)) => x == y,
                (Value::Symbol(x), Value::Symbol(y)) => x == y,
                (Value::Str(x), Value::Str(y)) => x == y,
                (Value::Cons(x), Value::Cons(y)) => {
                    if !Arc::ptr_eq(x, y) {
                        pending.push((&x.cdr, &y.cdr));
                        pending.push((&x.car, &y.car));
                    }
                    true
                }
                (Value::Closure(x), Value::Closure(y)) => Arc::ptr_eq(x, y),
                (Value::Fundamental(x), Value::Fundamental(y)) => x == y,
                (Value::Extension(x), Value::Extension(y)) => x == y,
                _ => false,
            };
            if !same {
                return false;
            }
        }
        true
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::from_bool(b)
    }
}

/// Print anything but a cons cell
fn fmt_atom(value: &Value, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match value {
        Value::Nil => write!(f, "nil"),
        Value::True => write!(f, "t"),
        Value::Int(i) => write!(f, "{}", i),
        Value::Float(x) => write!(f, "{:?}", x),
        Value::Symbol(s) => write!(f, "{}", s),
        Value::Str(s) => write!(f, "{:?}", s),
        Value::Cons(_) => write!(f, "<cons>"),
        Value::Closure(c) => write!(f, "<closure/{}>", c.params.len()),
        Value::Fundamental(op) => write!(f, "<fundamental {}>", op.name()),
        Value::Extension(name) => write!(f, "<extension {}>", name),
    }
}

enum Print<'a> {
    /// A whole value
    Value(&'a Value),
    /// The rest of a list after at least one element
    Tail(&'a Value),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut pending = vec![Print::Value(self)];
        while let Some(item) = pending.pop() {
            match item {
                Print::Value(Value::Cons(cell)) => {
                    write!(f, "(")?;
                    pending.push(Print::Tail(&cell.cdr));
                    pending.push(Print::Value(&cell.car));
                }
                Print::Value(atom) => fmt_atom(atom, f)?,
                Print::Tail(Value::Nil) => write!(f, ")")?,
                Print::Tail(Value::Cons(cell)) => {
                    write!(f, " ")?;
                    pending.push(Print::Tail(&cell.cdr));
                    pending.push(Print::Value(&cell.car));
                }
                Print::Tail(tail) => {
                    write!(f, " . ")?;
                    fmt_atom(tail, f)?;
                    write!(f, ")")?;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::SymbolTable;

    #[test]
    fn test_list_helpers() {
        let l = Value::list([Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert!(l.is_list());
        assert_eq!(l.iter().count(), 3);
        assert_eq!(l.car(), Some(&Value::Int(1)));
        assert_eq!(
            l.to_vec(),
            Some(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
        assert_eq!(Value::Nil.to_vec(), Some(vec![]));

        let dotted = Value::cons(Value::Int(1), Value::Int(2));
        assert_eq!(dotted.to_vec(), None);
        assert_eq!(dotted.iter().count(), 1);
    }

    #[test]
    fn test_display() {
        let mut symbols = SymbolTable::new();
        let a = Value::Symbol(symbols.intern("a"));
        let v = Value::list([
            a.clone(),
            Value::Float(1.5),
            Value::string("hi"),
            Value::list([Value::Nil, Value::True]),
        ]);
        assert_eq!(v.to_string(), "(a 1.5 \"hi\" (nil t))");
        assert_eq!(Value::cons(a, Value::Int(2)).to_string(), "(a . 2)");
        assert_eq!(Value::Fundamental(Fundamental::Add).to_string(), "<fundamental +>");
    }

    #[test]
    fn test_structural_equality() {
        let a = Value::list([Value::Int(1), Value::string("x")]);
        let b = Value::list([Value::Int(1), Value::string("x")]);
        assert_eq!(a, b);
        assert_ne!(a, Value::list([Value::Int(1)]));
        assert_ne!(Value::Int(1), Value::Float(1.0));

        let closure = Arc::new(Closure {
            params: vec![],
            body: Value::Nil,
            env: Env::empty(),
        });
        let same = Value::Closure(closure.clone());
        assert_eq!(same, Value::Closure(closure));
        let other = Value::Closure(Arc::new(Closure {
            params: vec![],
            body: Value::Nil,
            env: Env::empty(),
        }));
        assert_ne!(same, other);
    }

    /// `(((...nil...)))` nested `depth` levels through the car
    fn car_chain(depth: usize) -> Value {
        let mut v = Value::Nil;
        for _ in 0..depth {
            v = Value::list([v]);
        }
        v
    }

    #[test]
    fn test_deep_car_chain_is_walked_iteratively() {
        let depth = 1_000_000;
        let a = car_chain(depth);
        let b = car_chain(depth);
        assert_eq!(a, b);
        assert_ne!(a, car_chain(depth - 1));

        let printed = a.to_string();
        assert_eq!(printed.len(), 2 * depth + 3);
        assert!(printed.starts_with("((((") && printed.ends_with("nil))))"));

        drop(a);
        drop(b);
    }

    #[test]
    fn test_deep_closure_chain_drops() {
        let mut symbols = SymbolTable::new();
        let f = symbols.intern("f");
        let mut v = Value::Nil;
        for _ in 0..1_000_000 {
            v = Value::Closure(Arc::new(Closure {
                params: vec![],
                body: Value::Nil,
                env: Env::empty().extend(f.clone(), v),
            }));
        }
        drop(v);
    }

    #[test]
    fn test_shared_structure_survives_release() {
        let shared = car_chain(1_000);
        let outer = Value::cons(shared.clone(), shared.clone());
        drop(outer);
        assert_eq!(shared, car_chain(1_000));
    }

    #[test]
    fn test_long_list_drops_without_recursion() {
        let l = Value::list((0..200_000).map(Value::Int));
        assert_eq!(l.iter().count(), 200_000);
        drop(l);
    }
}
