//! Fundamental operations
//!
//! Fundamentals are applied in a single step. The process primitives
//! (`self`, `send`, `spawn`, `wait`, `sleep`, `yield`) touch the scheduler
//! and are applied by the machine in `eval.rs`; everything else is a pure
//! function of its arguments and lives here.

use std::cmp::Ordering;

use crate::error::EvalError;
use crate::symbols::{sym, SymId};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fundamental {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    NumEq,
    Lt,
    Gt,
    Leq,
    Geq,
    Eq,
    Not,
    Cons,
    Car,
    Cdr,
    List,
    Append,
    Length,
    SelfId,
    Send,
    Spawn,
    Wait,
    Sleep,
    Yield,
}

impl Fundamental {
    pub fn from_sym(id: SymId) -> Option<Fundamental> {
        use Fundamental::*;
        Some(match id {
            sym::ADD => Add,
            sym::SUB => Sub,
            sym::MUL => Mul,
            sym::DIV => Div,
            sym::MOD => Mod,
            sym::NUM_EQ => NumEq,
            sym::LT => Lt,
            sym::GT => Gt,
            sym::LEQ => Leq,
            sym::GEQ => Geq,
            sym::EQ => Eq,
            sym::NOT => Not,
            sym::CONS => Cons,
            sym::CAR => Car,
            sym::CDR => Cdr,
            sym::LIST => List,
            sym::APPEND => Append,
            sym::LENGTH => Length,
            sym::SELF => SelfId,
            sym::SEND => Send,
            sym::SPAWN => Spawn,
            sym::WAIT => Wait,
            sym::SLEEP => Sleep,
            sym::YIELD => Yield,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        use Fundamental::*;
        match self {
            Add => "+",
            Sub => "-",
            Mul => "*",
            Div => "/",
            Mod => "mod",
            NumEq => "=",
            Lt => "<",
            Gt => ">",
            Leq => "<=",
            Geq => ">=",
            Eq => "eq",
            Not => "not",
            Cons => "cons",
            Car => "car",
            Cdr => "cdr",
            List => "list",
            Append => "append",
            Length => "length",
            SelfId => "self",
            Send => "send",
            Spawn => "spawn",
            Wait => "wait",
            Sleep => "sleep",
            Yield => "yield",
        }
    }

    /// Whether applying this needs the running context or the scheduler
    pub fn is_process_primitive(self) -> bool {
        use Fundamental::*;
        matches!(self, SelfId | Send | Spawn | Wait | Sleep | Yield)
    }
}

#[derive(Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn of(v: &Value) -> Result<Num, EvalError> {
        match v {
            Value::Int(i) => Ok(Num::Int(*i)),
            Value::Float(x) => Ok(Num::Float(*x)),
            other => Err(EvalError::type_error("number", other)),
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(x) => x,
        }
    }

    fn into_value(self) -> Value {
        match self {
            Num::Int(i) => Value::Int(i),
            Num::Float(x) => Value::Float(x),
        }
    }
}

fn arith(op: Fundamental, a: Num, b: Num) -> Result<Num, EvalError> {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => Ok(Num::Int(match op {
            Fundamental::Add => x.wrapping_add(y),
            Fundamental::Sub => x.wrapping_sub(y),
            Fundamental::Mul => x.wrapping_mul(y),
            Fundamental::Div => {
                if y == 0 {
                    return Err(EvalError::DivisionByZero);
                }
                x.wrapping_div(y)
            }
            Fundamental::Mod => {
                if y == 0 {
                    return Err(EvalError::DivisionByZero);
                }
                x.wrapping_rem(y)
            }
            _ => return Err(EvalError::Malformed(format!("{} is not arithmetic", op.name()))),
        })),
        (a, b) => {
            let (x, y) = (a.as_f64(), b.as_f64());
            Ok(Num::Float(match op {
                Fundamental::Add => x + y,
                Fundamental::Sub => x - y,
                Fundamental::Mul => x * y,
                Fundamental::Div | Fundamental::Mod => {
                    if y == 0.0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    if op == Fundamental::Div {
                        x / y
                    } else {
                        x % y
                    }
                }
                _ => return Err(EvalError::Malformed(format!("{} is not arithmetic", op.name()))),
            }))
        }
    }
}

fn compare(a: Num, b: Num) -> Option<Ordering> {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => Some(x.cmp(&y)),
        (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
    }
}

fn expect_arity(op: Fundamental, args: &[Value], n: usize) -> Result<(), EvalError> {
    if args.len() == n {
        Ok(())
    } else {
        Err(EvalError::Malformed(format!(
            "{} expects {} arguments, got {}",
            op.name(),
            n,
            args.len()
        )))
    }
}

fn proper_list(v: &Value) -> Result<Vec<Value>, EvalError> {
    v.to_vec().ok_or_else(|| EvalError::type_error("list", v))
}

/// Apply a pure fundamental
pub fn apply(op: Fundamental, args: &[Value]) -> Result<Value, EvalError> {
    use Fundamental::*;
    match op {
        Add | Mul => {
            let mut acc = Num::Int(if op == Add { 0 } else { 1 });
            for arg in args {
                acc = arith(op, acc, Num::of(arg)?)?;
            }
            Ok(acc.into_value())
        }
        Sub | Div | Mod => {
            let (first, rest) = args.split_first().ok_or_else(|| {
                EvalError::Malformed(format!("{} expects at least 1 argument", op.name()))
            })?;
            let first = Num::of(first)?;
            if rest.is_empty() {
                return match op {
                    Sub => arith(Sub, Num::Int(0), first).map(Num::into_value),
                    Div => arith(Div, Num::Float(1.0), first).map(Num::into_value),
                    _ => Err(EvalError::Malformed("mod expects 2 arguments".into())),
                };
            }
            let mut acc = first;
            for arg in rest {
                acc = arith(op, acc, Num::of(arg)?)?;
            }
            Ok(acc.into_value())
        }
        NumEq | Lt | Gt | Leq | Geq => {
            let nums = args.iter().map(Num::of).collect::<Result<Vec<_>, _>>()?;
            let holds = nums.windows(2).all(|w| {
                let ord = compare(w[0], w[1]);
                match op {
                    NumEq => ord == Some(Ordering::Equal),
                    Lt => ord == Some(Ordering::Less),
                    Gt => ord == Some(Ordering::Greater),
                    Leq => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
                    _ => matches!(ord, Some(Ordering::Greater | Ordering::Equal)),
                }
            });
            Ok(Value::from_bool(holds))
        }
        Eq => Ok(Value::from_bool(args.windows(2).all(|w| w[0] == w[1]))),
        Not => {
            expect_arity(op, args, 1)?;
            Ok(Value::from_bool(args[0].is_nil()))
        }
        Cons => {
            expect_arity(op, args, 2)?;
            Ok(Value::cons(args[0].clone(), args[1].clone()))
        }
        Car | Cdr => {
            expect_arity(op, args, 1)?;
            match &args[0] {
                Value::Nil => Ok(Value::Nil),
                Value::Cons(cell) => Ok(if op == Car {
                    cell.car.clone()
                } else {
                    cell.cdr.clone()
                }),
                other => Err(EvalError::type_error("list", other)),
            }
        }
        List => Ok(Value::list(args.iter().cloned())),
        Append => match args.split_last() {
            None => Ok(Value::Nil),
            Some((last, init)) => {
                let mut items = Vec::new();
                for arg in init {
                    items.extend(proper_list(arg)?);
                }
                Ok(Value::list_with_tail(items, last.clone()))
            }
        },
        Length => {
            expect_arity(op, args, 1)?;
            match &args[0] {
                Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
                other => Ok(Value::Int(proper_list(other)?.len() as i64)),
            }
        }
        SelfId | Send | Spawn | Wait | Sleep | Yield => Err(EvalError::Malformed(format!(
            "{} needs a running context",
            op.name()
        ))),
    }
}
