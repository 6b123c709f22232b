//! Loading source text into new contexts

use log::debug;

use crate::context::Cid;
use crate::error::{Error, Result};
use crate::evaluator::Evaluator;
use crate::reader::{read_expression, read_program, CharStream};
use crate::symbols::sym;
use crate::value::Value;

/// How source text is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Any number of top-level expressions, run in order
    Program,
    /// Exactly one expression
    Expression,
}

impl Evaluator {
    /// Parse `stream` and launch a context evaluating it
    pub fn load_and_eval<S: CharStream + ?Sized>(&self, stream: &mut S, kind: Kind) -> Result<Cid> {
        let mut rt = self.lock_live()?;
        let program = match kind {
            Kind::Program => Value::list(read_program(stream, &mut rt.symbols)?),
            Kind::Expression => Value::list([read_expression(stream, &mut rt.symbols)?]),
        };
        let stack = rt.config.default_stack_size;
        let cid = rt.spawn(program, stack)?;
        debug!("loaded {:?} into context {}", kind, cid);
        Ok(cid)
    }

    /// Parse `stream` and launch a context binding the unevaluated result to
    /// the global `name`
    pub fn load_and_define<S: CharStream + ?Sized>(
        &self,
        stream: &mut S,
        kind: Kind,
        name: &str,
    ) -> Result<Cid> {
        let mut rt = self.lock_live()?;
        let parsed = match kind {
            Kind::Program => Value::list(read_program(stream, &mut rt.symbols)?),
            Kind::Expression => read_expression(stream, &mut rt.symbols)?,
        };
        let define = Value::list([
            rt.symbols.value(sym::DEFINE),
            Value::Symbol(rt.symbols.intern(name)),
            Value::list([rt.symbols.value(sym::QUOTE), parsed]),
        ]);
        let stack = rt.config.default_stack_size;
        rt.spawn(Value::list([define]), stack)
    }

    /// Launch a context evaluating what the global `name` holds
    pub fn eval_defined(&self, name: &str, kind: Kind) -> Result<Cid> {
        let mut rt = self.lock_live()?;
        let value = rt
            .symbols
            .lookup(name)
            .and_then(|symbol| rt.globals.get(symbol.id()).cloned())
            .ok_or_else(|| Error::UndefinedSymbol(name.to_string()))?;
        let program = match kind {
            Kind::Program if value.is_list() => value,
            Kind::Program => return Err(Error::NotAProgram(value.to_string())),
            Kind::Expression => Value::list([value]),
        };
        let stack = rt.config.default_stack_size;
        rt.spawn(program, stack)
    }
}
