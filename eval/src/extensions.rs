//! Bridge between evaluator values and `lbm-ext` extensions

use lbm_ext::bridge::{to_ext_args, ToExtValue};
use lbm_ext::{ExtError, ExtRegistry, ExtValue, MAX_NESTING};

use crate::error::EvalError;
use crate::symbols::SymbolTable;
use crate::value::{ListIter, Value};

/// Anything that is not a proper, non-empty list
fn atom_to_ext(value: &Value) -> ExtValue {
    match value {
        Value::Nil => ExtValue::Nil,
        Value::True => ExtValue::True,
        Value::Int(i) => ExtValue::Int(*i),
        Value::Float(x) => ExtValue::Float(*x),
        Value::Str(s) => ExtValue::String(s.to_string()),
        Value::Symbol(s) => ExtValue::Symbol(s.name().to_string()),
        // dotted pairs and opaque values have no extension form, pass the printed text
        Value::Cons(_) | Value::Closure(_) | Value::Fundamental(_) | Value::Extension(_) => {
            ExtValue::String(value.to_string())
        }
    }
}

fn is_proper_list(value: &Value) -> bool {
    let mut cur = value;
    loop {
        match cur {
            Value::Nil => return true,
            Value::Cons(cell) => cur = &cell.cdr,
            _ => return false,
        }
    }
}

impl ToExtValue for Value {
    fn to_ext(&self) -> Result<ExtValue, ExtError> {
        // lists being converted: remaining elements and the items so far
        let mut open: Vec<(ListIter<'_>, Vec<ExtValue>)> = Vec::new();
        let mut next = self;
        loop {
            let mut done = if matches!(next, Value::Cons(_)) && is_proper_list(next) {
                if open.len() == MAX_NESTING {
                    return Err(ExtError::RuntimeError(format!(
                        "list nested deeper than {} levels",
                        MAX_NESTING
                    )));
                }
                open.push((next.iter(), Vec::new()));
                None
            } else {
                Some(atom_to_ext(next))
            };
            loop {
                let Some((items, built)) = open.last_mut() else {
                    return Ok(done.unwrap_or(ExtValue::Nil));
                };
                if let Some(v) = done.take() {
                    built.push(v);
                }
                match items.next() {
                    Some(item) => {
                        next = item;
                        break;
                    }
                    None => {
                        let list = std::mem::take(built);
                        open.pop();
                        done = Some(ExtValue::List(list));
                    }
                }
            }
        }
    }
}

/// Convert an extension result back, interning any symbols it names
pub fn from_ext(value: ExtValue, symbols: &mut SymbolTable) -> Value {
    let mut open: Vec<(std::vec::IntoIter<ExtValue>, Vec<Value>)> = Vec::new();
    let mut next = value;
    loop {
        let mut done = match next {
            ExtValue::List(items) => {
                open.push((items.into_iter(), Vec::new()));
                None
            }
            ExtValue::Nil => Some(Value::Nil),
            ExtValue::True => Some(Value::True),
            ExtValue::Int(i) => Some(Value::Int(i)),
            ExtValue::Float(x) => Some(Value::Float(x)),
            ExtValue::String(s) => Some(Value::string(&s)),
            ExtValue::Symbol(name) => Some(Value::Symbol(symbols.intern(&name))),
        };
        loop {
            let Some((items, built)) = open.last_mut() else {
                return done.unwrap_or(Value::Nil);
            };
            if let Some(v) = done.take() {
                built.push(v);
            }
            match items.next() {
                Some(item) => {
                    next = item;
                    break;
                }
                None => {
                    let list = Value::list(std::mem::take(built));
                    open.pop();
                    done = Some(list);
                }
            }
        }
    }
}

/// Call the extension `name` with evaluator arguments
pub fn call_extension(
    registry: &ExtRegistry,
    symbols: &mut SymbolTable,
    name: &str,
    args: &[Value],
) -> Result<Value, EvalError> {
    let args = to_ext_args(args)?;
    let result = registry.call(name, args)?;
    Ok(from_ext(result, symbols))
}
