//! Continuation stack
//!
//! Every pending piece of work a context has is a [`Frame`] on its own
//! bounded stack. Evaluation never recurses on the host stack, so a
//! context's depth is limited only by the capacity given at launch.

use crate::context::Cid;
use crate::env::Env;
use crate::error::EvalError;
use crate::symbols::Symbol;
use crate::value::Value;

#[derive(Debug, Clone)]
pub enum Frame {
    /// Bottom of every stack: the current top-level expression is finished
    Done,
    /// Bind the result to a global
    SetGlobal(Symbol),
    /// Remaining expressions of a body
    Progn { rest: Value, env: Env },
    If { then: Value, otherwise: Value, env: Env },
    And { rest: Value, env: Env },
    Or { rest: Value, env: Env },
    /// The binding being computed in a `let`, the ones after it and the body
    Let {
        symbol: Symbol,
        bindings: Value,
        body: Value,
        env: Env,
    },
    /// Operator and arguments evaluated so far, and those still pending
    Application {
        evaluated: Vec<Value>,
        pending: Value,
        env: Env,
    },
    Match { clauses: Value, env: Env },
    /// Timeout expression of a `recv-to` is being evaluated
    RecvTimeout { clauses: Value, env: Env },
    /// Installed by `trap`
    Catch,
    /// `wait` polling another context
    WaitFor(Cid),
}

impl Frame {
    pub fn name(&self) -> &'static str {
        match self {
            Frame::Done => "done",
            Frame::SetGlobal(_) => "set-global",
            Frame::Progn { .. } => "progn",
            Frame::If { .. } => "if",
            Frame::And { .. } => "and",
            Frame::Or { .. } => "or",
            Frame::Let { .. } => "let",
            Frame::Application { .. } => "application",
            Frame::Match { .. } => "match",
            Frame::RecvTimeout { .. } => "recv-timeout",
            Frame::Catch => "catch",
            Frame::WaitFor(_) => "wait-for",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContinuationStack {
    frames: Vec<Frame>,
    capacity: usize,
    high_water: usize,
}

impl ContinuationStack {
    pub fn with_capacity(capacity: usize) -> Self {
        ContinuationStack {
            frames: Vec::with_capacity(capacity.min(64)),
            capacity,
            high_water: 0,
        }
    }

    pub fn push(&mut self, frame: Frame) -> Result<(), EvalError> {
        if self.frames.len() >= self.capacity {
            return Err(EvalError::StackOverflow);
        }
        self.frames.push(frame);
        self.high_water = self.high_water.max(self.frames.len());
        Ok(())
    }

    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    pub fn top(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// Discard frames up to and including the innermost `Catch`.
    /// Returns false, leaving the stack empty, when there is none.
    pub fn unwind_to_catch(&mut self) -> bool {
        while let Some(frame) = self.frames.pop() {
            if matches!(frame, Frame::Catch) {
                return true;
            }
        }
        false
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Deepest the stack has been
    pub fn high_water(&self) -> usize {
        self.high_water
    }

    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter().rev()
    }
}
