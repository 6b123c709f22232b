//! The continuation-passing machine
//!
//! [`step`] does one unit of work for a context: either it evaluates
//! `curr_exp`, or (when `app_cont` is set) it pops the top frame and hands it
//! the value in `r`. Nested evaluation is expressed by pushing a frame and
//! switching `curr_exp`; the host stack depth never depends on the program.

use std::sync::Arc;

use log::{debug, trace, warn};

use crate::builtins::{self, Fundamental};
use crate::context::{BlockReason, Cid, Context};
use crate::env::Env;
use crate::error::EvalError;
use crate::extensions::call_extension;
use crate::matching::{find_clause, Bindings};
use crate::runtime::Runtime;
use crate::scheduler::ExecutionResult;
use crate::stack::Frame;
use crate::symbols::{sym, SymId, Symbol};
use crate::value::{Closure, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpecialForm {
    Quote,
    Define,
    Lambda,
    If,
    Let,
    Progn,
    And,
    Or,
    Match,
    Recv,
    RecvTo,
    Trap,
}

impl SpecialForm {
    fn from_sym(id: SymId) -> Option<SpecialForm> {
        Some(match id {
            sym::QUOTE => SpecialForm::Quote,
            sym::DEFINE => SpecialForm::Define,
            sym::LAMBDA => SpecialForm::Lambda,
            sym::IF => SpecialForm::If,
            sym::LET => SpecialForm::Let,
            sym::PROGN => SpecialForm::Progn,
            sym::AND => SpecialForm::And,
            sym::OR => SpecialForm::Or,
            sym::MATCH => SpecialForm::Match,
            sym::RECV => SpecialForm::Recv,
            sym::RECV_TO => SpecialForm::RecvTo,
            sym::TRAP => SpecialForm::Trap,
            _ => return None,
        })
    }
}

type StepResult = Result<ExecutionResult, EvalError>;

/// Take one step, turning evaluation errors into the context's outcome
pub(crate) fn advance(ctx: &mut Context, rt: &mut Runtime) -> ExecutionResult {
    ctx.steps += 1;
    match step(ctx, rt) {
        Ok(result) => result,
        Err(err) => raise(ctx, rt, err),
    }
}

pub(crate) fn step(ctx: &mut Context, rt: &mut Runtime) -> StepResult {
    if ctx.app_cont {
        match ctx.k.pop() {
            Some(frame) => {
                trace!("context {} apply {}", ctx.id, frame.name());
                apply_continuation(frame, ctx, rt)
            }
            None => Ok(finish(ctx)),
        }
    } else {
        let exp = ctx.curr_exp.clone();
        trace!("context {} eval {}", ctx.id, exp);
        eval_expression(exp, ctx, rt)
    }
}

fn raise(ctx: &mut Context, rt: &Runtime, err: EvalError) -> ExecutionResult {
    let error = rt.symbols.value(err.symbol());
    if err.is_recoverable() && ctx.k.unwind_to_catch() {
        debug!("context {} trapped: {}", ctx.id, err);
        ctx.r = Value::list([rt.symbols.value(sym::EXIT_ERROR), error]);
        ctx.app_cont = true;
        return ExecutionResult::Continue;
    }
    if err.is_recoverable() {
        debug!("context {} failed: {}", ctx.id, err);
    } else {
        warn!("context {} aborted: {}", ctx.id, err);
    }
    ctx.r = error;
    finish(ctx)
}

fn finish(ctx: &mut Context) -> ExecutionResult {
    ctx.k.clear();
    ctx.program = Value::Nil;
    ctx.app_cont = false;
    ExecutionResult::Exited
}

fn return_value(ctx: &mut Context, value: Value) -> StepResult {
    ctx.r = value;
    ctx.app_cont = true;
    Ok(ExecutionResult::Continue)
}

fn eval_in(ctx: &mut Context, exp: Value, env: Env) -> StepResult {
    ctx.curr_exp = exp;
    ctx.curr_env = env;
    ctx.app_cont = false;
    Ok(ExecutionResult::Continue)
}

fn malformed(what: &str, exp: &Value) -> EvalError {
    EvalError::Malformed(format!("malformed {}: {}", what, exp))
}

/// `n`th element of a list, `nil` past the end
fn nth(list: &Value, n: usize) -> Value {
    list.iter().nth(n).cloned().unwrap_or(Value::Nil)
}

fn bind(env: &Env, bindings: Bindings) -> Env {
    bindings
        .into_iter()
        .fold(env.clone(), |env, (symbol, value)| env.extend(symbol, value))
}

fn seconds_to_us(v: &Value) -> Result<u32, EvalError> {
    let secs = match v {
        Value::Int(i) => *i as f64,
        Value::Float(x) => *x,
        other => return Err(EvalError::type_error("number of seconds", other)),
    };
    // saturating float to int cast
    Ok((secs.max(0.0) * 1_000_000.0) as u32)
}

fn lookup(symbol: &Symbol, ctx: &Context, rt: &Runtime) -> Result<Value, EvalError> {
    if let Some(v) = ctx.curr_env.lookup(symbol.id()) {
        return Ok(v.clone());
    }
    if let Some(v) = rt.globals.get(symbol.id()) {
        return Ok(v.clone());
    }
    if let Some(op) = Fundamental::from_sym(symbol.id()) {
        return Ok(Value::Fundamental(op));
    }
    if rt.extensions.contains(symbol.name()) {
        return Ok(Value::Extension(Arc::from(symbol.name())));
    }
    Err(EvalError::Unbound(symbol.name().to_string()))
}

fn eval_expression(exp: Value, ctx: &mut Context, rt: &mut Runtime) -> StepResult {
    match &exp {
        Value::Symbol(symbol) => {
            let value = lookup(symbol, ctx, rt)?;
            return_value(ctx, value)
        }
        Value::Cons(cell) => {
            if let Value::Symbol(head) = &cell.car {
                if let Some(form) = SpecialForm::from_sym(head.id()) {
                    return eval_special(form, &exp, &cell.cdr, ctx, rt);
                }
            }
            ctx.k.push(Frame::Application {
                evaluated: Vec::new(),
                pending: cell.cdr.clone(),
                env: ctx.curr_env.clone(),
            })?;
            ctx.curr_exp = cell.car.clone();
            Ok(ExecutionResult::Continue)
        }
        _ => return_value(ctx, exp.clone()),
    }
}

fn eval_special(
    form: SpecialForm,
    exp: &Value,
    args: &Value,
    ctx: &mut Context,
    rt: &mut Runtime,
) -> StepResult {
    let env = ctx.curr_env.clone();
    let rest = args.cdr().cloned().unwrap_or(Value::Nil);
    match form {
        SpecialForm::Quote => return_value(ctx, nth(args, 0)),
        SpecialForm::Define => {
            let symbol = args
                .car()
                .and_then(Value::as_symbol)
                .cloned()
                .ok_or_else(|| malformed("define", exp))?;
            ctx.k.push(Frame::SetGlobal(symbol))?;
            eval_in(ctx, nth(args, 1), env)
        }
        SpecialForm::Lambda => {
            let params = nth(args, 0)
                .to_vec()
                .and_then(|ps| ps.iter().map(|p| p.as_symbol().cloned()).collect::<Option<Vec<_>>>())
                .ok_or_else(|| malformed("lambda", exp))?;
            let body = match &rest {
                Value::Cons(cell) if cell.cdr.is_nil() => cell.car.clone(),
                Value::Nil => Value::Nil,
                body => Value::cons(rt.symbols.value(sym::PROGN), body.clone()),
            };
            return_value(ctx, Value::Closure(Arc::new(Closure { params, body, env })))
        }
        SpecialForm::If => {
            ctx.k.push(Frame::If {
                then: nth(args, 1),
                otherwise: nth(args, 2),
                env: env.clone(),
            })?;
            eval_in(ctx, nth(args, 0), env)
        }
        SpecialForm::Let => eval_let(ctx, nth(args, 0), rest, env),
        SpecialForm::Progn => eval_sequence(ctx, args.clone(), env),
        SpecialForm::And => eval_chain(ctx, args.clone(), env, true),
        SpecialForm::Or => eval_chain(ctx, args.clone(), env, false),
        SpecialForm::Match => {
            ctx.k.push(Frame::Match {
                clauses: rest,
                env: env.clone(),
            })?;
            eval_in(ctx, nth(args, 0), env)
        }
        SpecialForm::Recv => receive(ctx, rt, args, None),
        SpecialForm::RecvTo => match nth(args, 0) {
            timeout @ (Value::Int(_) | Value::Float(_)) => {
                let us = seconds_to_us(&timeout)?;
                receive(ctx, rt, &rest, Some(us))
            }
            timeout => {
                ctx.k.push(Frame::RecvTimeout {
                    clauses: rest,
                    env: env.clone(),
                })?;
                eval_in(ctx, timeout, env)
            }
        },
        SpecialForm::Trap => {
            ctx.k.push(Frame::Catch)?;
            eval_in(ctx, nth(args, 0), env)
        }
    }
}

/// Evaluate a body, the last expression in tail position
fn eval_sequence(ctx: &mut Context, body: Value, env: Env) -> StepResult {
    match &body {
        Value::Cons(cell) => {
            if !cell.cdr.is_nil() {
                ctx.k.push(Frame::Progn {
                    rest: cell.cdr.clone(),
                    env: env.clone(),
                })?;
            }
            eval_in(ctx, cell.car.clone(), env)
        }
        Value::Nil => return_value(ctx, Value::Nil),
        other => Err(malformed("body", other)),
    }
}

/// `and` / `or` over the remaining expressions
fn eval_chain(ctx: &mut Context, exprs: Value, env: Env, and: bool) -> StepResult {
    match &exprs {
        Value::Cons(cell) => {
            if !cell.cdr.is_nil() {
                let rest = cell.cdr.clone();
                let frame = if and {
                    Frame::And {
                        rest,
                        env: env.clone(),
                    }
                } else {
                    Frame::Or {
                        rest,
                        env: env.clone(),
                    }
                };
                ctx.k.push(frame)?;
            }
            eval_in(ctx, cell.car.clone(), env)
        }
        _ => return_value(ctx, Value::from_bool(and)),
    }
}

fn eval_let(ctx: &mut Context, bindings: Value, body: Value, env: Env) -> StepResult {
    match &bindings {
        Value::Cons(cell) => {
            let binding = &cell.car;
            let symbol = binding
                .car()
                .and_then(Value::as_symbol)
                .cloned()
                .ok_or_else(|| malformed("let binding", binding))?;
            ctx.k.push(Frame::Let {
                symbol,
                bindings: cell.cdr.clone(),
                body,
                env: env.clone(),
            })?;
            eval_in(ctx, nth(binding, 1), env)
        }
        Value::Nil => eval_sequence(ctx, body, env),
        other => Err(malformed("let bindings", other)),
    }
}

/// Scan the mailbox oldest first for a message some clause accepts
fn receive(ctx: &mut Context, rt: &Runtime, clauses: &Value, timeout_us: Option<u32>) -> StepResult {
    if clauses.is_nil() {
        if let Some(message) = ctx.mailbox.pop_front() {
            ctx.timed_out = false;
            return return_value(ctx, message);
        }
    } else {
        let mut hit = None;
        for (index, message) in ctx.mailbox.iter().enumerate() {
            if let Some(found) = find_clause(clauses, message, &rt.symbols)? {
                hit = Some((index, found));
                break;
            }
        }
        if let Some((index, (body, bindings))) = hit {
            ctx.mailbox.remove(index);
            ctx.timed_out = false;
            let env = bind(&ctx.curr_env, bindings);
            return eval_in(ctx, body, env);
        }
    }
    match timeout_us {
        Some(_) if ctx.timed_out => {
            ctx.timed_out = false;
            return_value(ctx, rt.symbols.value(sym::TIMEOUT))
        }
        Some(us) => Ok(ExecutionResult::Blocked(BlockReason::MessageOrTimeout(us))),
        None => Ok(ExecutionResult::Blocked(BlockReason::Message)),
    }
}

fn apply_continuation(frame: Frame, ctx: &mut Context, rt: &mut Runtime) -> StepResult {
    match frame {
        Frame::Done => match ctx.program.clone() {
            Value::Cons(cell) => {
                ctx.program = cell.cdr.clone();
                ctx.k.push(Frame::Done)?;
                eval_in(ctx, cell.car.clone(), Env::empty())
            }
            _ => Ok(finish(ctx)),
        },
        Frame::SetGlobal(symbol) => {
            rt.globals.insert(symbol.id(), ctx.r.clone());
            return_value(ctx, Value::Symbol(symbol))
        }
        Frame::Progn { rest, env } => eval_sequence(ctx, rest, env),
        Frame::If {
            then,
            otherwise,
            env,
        } => {
            let branch = if ctx.r.is_truthy() { then } else { otherwise };
            eval_in(ctx, branch, env)
        }
        Frame::And { rest, env } => {
            if ctx.r.is_nil() {
                Ok(ExecutionResult::Continue)
            } else {
                eval_chain(ctx, rest, env, true)
            }
        }
        Frame::Or { rest, env } => {
            if ctx.r.is_truthy() {
                Ok(ExecutionResult::Continue)
            } else {
                eval_chain(ctx, rest, env, false)
            }
        }
        Frame::Let {
            symbol,
            bindings,
            body,
            env,
        } => {
            let env = env.extend(symbol, ctx.r.clone());
            eval_let(ctx, bindings, body, env)
        }
        Frame::Application {
            mut evaluated,
            pending,
            env,
        } => {
            evaluated.push(std::mem::replace(&mut ctx.r, Value::Nil));
            match &pending {
                Value::Cons(cell) => {
                    let next = cell.car.clone();
                    ctx.k.push(Frame::Application {
                        evaluated,
                        pending: cell.cdr.clone(),
                        env: env.clone(),
                    })?;
                    eval_in(ctx, next, env)
                }
                Value::Nil => apply_function(evaluated, ctx, rt),
                other => Err(malformed("argument list", other)),
            }
        }
        Frame::Match { clauses, env } => match find_clause(&clauses, &ctx.r, &rt.symbols)? {
            Some((body, bindings)) => {
                let env = bind(&env, bindings);
                eval_in(ctx, body, env)
            }
            None => return_value(ctx, rt.symbols.value(sym::NO_MATCH)),
        },
        Frame::RecvTimeout { clauses, env } => {
            let timeout = ctx.r.clone();
            seconds_to_us(&timeout)?;
            // re-enter as a recv-to with a literal timeout, so a blocked
            // context re-examines its mailbox without re-evaluating it
            let form = Value::cons(
                rt.symbols.value(sym::RECV_TO),
                Value::cons(timeout, clauses),
            );
            eval_in(ctx, form, env)
        }
        Frame::Catch => {
            let value = std::mem::replace(&mut ctx.r, Value::Nil);
            return_value(ctx, Value::list([rt.symbols.value(sym::EXIT_OK), value]))
        }
        Frame::WaitFor(target) => wait_for(ctx, target, rt),
    }
}

fn apply_function(evaluated: Vec<Value>, ctx: &mut Context, rt: &mut Runtime) -> StepResult {
    let mut evaluated = evaluated.into_iter();
    let function = evaluated
        .next()
        .ok_or_else(|| EvalError::Malformed("empty application".to_string()))?;
    let args: Vec<Value> = evaluated.collect();
    match function {
        Value::Closure(closure) => {
            if closure.params.len() != args.len() {
                return Err(EvalError::Malformed(format!(
                    "closure expects {} arguments, got {}",
                    closure.params.len(),
                    args.len()
                )));
            }
            let env = closure
                .params
                .iter()
                .cloned()
                .zip(args)
                .fold(closure.env.clone(), |env, (param, arg)| env.extend(param, arg));
            eval_in(ctx, closure.body.clone(), env)
        }
        Value::Fundamental(op) if op.is_process_primitive() => apply_process(op, args, ctx, rt),
        Value::Fundamental(op) => {
            let value = builtins::apply(op, &args)?;
            return_value(ctx, value)
        }
        Value::Extension(name) => {
            let value = call_extension(&rt.extensions, &mut rt.symbols, &name, &args)?;
            return_value(ctx, value)
        }
        other => Err(EvalError::type_error("function", &other)),
    }
}

fn expect_args(op: Fundamental, args: &[Value], n: usize) -> Result<(), EvalError> {
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

/// Context id argument; `Ok(None)` for integers that name no context
fn cid_arg(v: &Value) -> Result<Option<Cid>, EvalError> {
    match v {
        Value::Int(_) => Ok(Cid::from_value(v)),
        other => Err(EvalError::type_error("context id", other)),
    }
}

fn apply_process(
    op: Fundamental,
    mut args: Vec<Value>,
    ctx: &mut Context,
    rt: &mut Runtime,
) -> StepResult {
    match op {
        Fundamental::SelfId => {
            expect_args(op, &args, 0)?;
            let id = ctx.id.into();
            return_value(ctx, id)
        }
        Fundamental::Send => {
            expect_args(op, &args, 2)?;
            let message = args.pop().unwrap_or(Value::Nil);
            let delivered = match cid_arg(&args[0])? {
                Some(target) if target == ctx.id => ctx.mailbox.push(message),
                Some(target) => match rt.scheduler.deliver(target, message) {
                    Ok(()) => true,
                    Err(e) => {
                        debug!("send from context {} failed: {}", ctx.id, e);
                        false
                    }
                },
                None => false,
            };
            return_value(ctx, Value::from_bool(delivered))
        }
        Fundamental::Spawn => {
            if args.is_empty() {
                return Err(EvalError::Malformed("spawn expects a function".to_string()));
            }
            let quote = rt.symbols.value(sym::QUOTE);
            let call: Vec<Value> = args
                .into_iter()
                .map(|arg| Value::list([quote.clone(), arg]))
                .collect();
            let stack = rt.config.default_stack_size;
            match rt.spawn(Value::list([Value::list(call)]), stack) {
                Ok(cid) => {
                    debug!("context {} spawned {}", ctx.id, cid);
                    return_value(ctx, cid.into())
                }
                Err(e) => {
                    warn!("spawn from context {} failed: {}", ctx.id, e);
                    return_value(ctx, Value::Nil)
                }
            }
        }
        Fundamental::Wait => {
            expect_args(op, &args, 1)?;
            match cid_arg(&args[0])? {
                Some(target) if target == ctx.id => {
                    Err(EvalError::Malformed("a context cannot wait for itself".to_string()))
                }
                Some(target) => wait_for(ctx, target, rt),
                None => return_value(ctx, Value::True),
            }
        }
        Fundamental::Sleep => {
            expect_args(op, &args, 1)?;
            let us = seconds_to_us(&args[0])?;
            ctx.r = Value::True;
            ctx.app_cont = true;
            if us == 0 {
                Ok(ExecutionResult::Pass)
            } else {
                Ok(ExecutionResult::Blocked(BlockReason::Sleep(us)))
            }
        }
        Fundamental::Yield => {
            expect_args(op, &args, 0)?;
            ctx.r = Value::True;
            ctx.app_cont = true;
            Ok(ExecutionResult::Pass)
        }
        _ => Err(EvalError::Malformed(format!("{} is not a process primitive", op.name()))),
    }
}

/// Yield the slice until `target` is no longer pending
fn wait_for(ctx: &mut Context, target: Cid, rt: &Runtime) -> StepResult {
    if rt.scheduler.is_pending(target) {
        ctx.k.push(Frame::WaitFor(target))?;
        ctx.r = Value::Nil;
        ctx.app_cont = true;
        Ok(ExecutionResult::Pass)
    } else {
        return_value(ctx, Value::True)
    }
}
