use lbm_ext::ExtError;
use thiserror::Error;

use crate::context::Cid;
use crate::reader::ReadError;
use crate::symbols::{sym, SymId};

/// Errors raised while a context evaluates. Each maps to the error symbol
/// left in the context's result register.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("continuation stack overflow")]
    StackOverflow,
    #[error("type error: {0}")]
    Type(String),
    #[error("variable not bound: {0}")]
    Unbound(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("eval error: {0}")]
    Malformed(String),
    #[error("extension failed: {0}")]
    Extension(#[from] ExtError),
}

impl EvalError {
    pub fn symbol(&self) -> SymId {
        match self {
            EvalError::StackOverflow => sym::STACK_OVERFLOW,
            EvalError::Type(_) => sym::TYPE_ERROR,
            EvalError::Unbound(_) => sym::VARIABLE_NOT_BOUND,
            EvalError::DivisionByZero => sym::DIVISION_BY_ZERO,
            EvalError::Malformed(_) | EvalError::Extension(_) => sym::EVAL_ERROR,
        }
    }

    /// `trap` cannot catch an overflowing stack
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, EvalError::StackOverflow)
    }

    pub(crate) fn type_error(expected: &str, got: &crate::value::Value) -> Self {
        EvalError::Type(format!("expected {}, got {}", expected, got.type_name()))
    }
}

/// Errors returned by the evaluator's host-facing API
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("no live context with id {0}")]
    UnknownContext(Cid),
    #[error("mailbox of context {0} is full")]
    MailboxFull(Cid),
    #[error("evaluator has been killed")]
    Killed,
    #[error("evaluator run loop is active")]
    AlreadyRunning,
    #[error("context limit of {0} reached")]
    TooManyContexts(usize),
    #[error("stack size {0} cannot hold the initial continuation")]
    StackTooSmall(usize),
    #[error("symbol `{0}` is not defined")]
    UndefinedSymbol(String),
    #[error("not a program: {0}")]
    NotAProgram(String),
    #[error(transparent)]
    Read(#[from] ReadError),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_symbols() {
        assert_eq!(EvalError::DivisionByZero.symbol(), sym::DIVISION_BY_ZERO);
        assert_eq!(EvalError::Unbound("x".into()).symbol(), sym::VARIABLE_NOT_BOUND);
        assert_eq!(
            EvalError::Extension(ExtError::NotFound("f".into())).symbol(),
            sym::EVAL_ERROR
        );
        assert!(!EvalError::StackOverflow.is_recoverable());
        assert!(EvalError::Type("x".into()).is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let cid = Cid::new(7).unwrap();
        assert_eq!(Error::UnknownContext(cid).to_string(), "no live context with id 7");
        assert_eq!(Error::Killed.to_string(), "evaluator has been killed");
        assert_eq!(
            EvalError::Unbound("foo".into()).to_string(),
            "variable not bound: foo"
        );
    }
}
