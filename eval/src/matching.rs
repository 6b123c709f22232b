//! Pattern matching for `match`, `recv` and `recv-to`

use crate::error::EvalError;
use crate::symbols::{sym, Symbol, SymbolTable};
use crate::value::Value;

pub type Bindings = Vec<(Symbol, Value)>;

/// Match `value` against `pattern`, pushing variable bindings on success.
/// Bindings from a failed attempt are left for the caller to discard.
pub fn match_pattern(pattern: &Value, value: &Value, bindings: &mut Bindings) -> bool {
    // car before cdr, so variables bind left to right
    let mut pending = vec![(pattern, value)];
    while let Some((pattern, value)) = pending.pop() {
        match pattern {
            Value::Symbol(s) if s.id() == sym::WILDCARD => {}
            Value::Cons(cell) => {
                if let Value::Symbol(head) = &cell.car {
                    if head.id() == sym::BIND {
                        if let Some(Value::Symbol(var)) = cell.cdr.car() {
                            if var.id() != sym::WILDCARD {
                                bindings.push((var.clone(), value.clone()));
                            }
                        }
                        continue;
                    }
                }
                match value {
                    Value::Cons(v) => {
                        pending.push((&cell.cdr, &v.cdr));
                        pending.push((&cell.car, &v.car));
                    }
                    _ => return false,
                }
            }
            literal => {
                if literal != value {
                    return false;
                }
            }
        }
    }
    true
}

/// Body of a clause `(pattern e1 e2 ...)`, wrapped in `progn` when it has
/// more than one expression
pub fn clause_body(clause: &Value, symbols: &SymbolTable) -> Value {
    match clause.cdr() {
        Some(Value::Cons(body)) if body.cdr.is_nil() => body.car.clone(),
        Some(body @ Value::Cons(_)) => Value::cons(symbols.value(sym::PROGN), body.clone()),
        _ => Value::Nil,
    }
}

/// First clause whose pattern matches `value`: its body and bindings
pub fn find_clause(
    clauses: &Value,
    value: &Value,
    symbols: &SymbolTable,
) -> Result<Option<(Value, Bindings)>, EvalError> {
    let mut bindings = Bindings::new();
    for clause in clauses.iter() {
        let pattern = clause
            .car()
            .ok_or_else(|| EvalError::Malformed(format!("bad match clause {}", clause)))?;
        bindings.clear();
        if match_pattern(pattern, value, &mut bindings) {
            return Ok(Some((clause_body(clause, symbols), bindings)));
        }
    }
    Ok(None)
}
