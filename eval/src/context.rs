//! Evaluation contexts and their mailboxes

use std::collections::VecDeque;
use std::fmt;
use std::num::NonZeroU32;

use crate::env::Env;
use crate::error::EvalError;
use crate::stack::{ContinuationStack, Frame};
use crate::value::Value;

/// Context identifier. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cid(NonZeroU32);

impl Cid {
    pub fn new(id: u32) -> Option<Cid> {
        NonZeroU32::new(id).map(Cid)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }

    /// Id from a Lisp integer, as passed to `send` or `wait`
    pub fn from_value(value: &Value) -> Option<Cid> {
        match value {
            Value::Int(i) => u32::try_from(*i).ok().and_then(Cid::new),
            _ => None,
        }
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Cid> for Value {
    fn from(cid: Cid) -> Value {
        Value::Int(cid.get() as i64)
    }
}

/// The collection a context is in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Queue {
    Ready,
    Blocked,
    Done,
}

/// Why a context left the ready queue without finishing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// `recv`: until a message arrives
    Message,
    /// `recv-to`: until a message arrives or the microseconds elapse
    MessageOrTimeout(u32),
    /// `sleep`: for the microseconds only
    Sleep(u32),
}

impl BlockReason {
    pub fn woken_by_message(self) -> bool {
        !matches!(self, BlockReason::Sleep(_))
    }

    pub fn deadline_us(self) -> Option<u32> {
        match self {
            BlockReason::Message => None,
            BlockReason::MessageOrTimeout(us) | BlockReason::Sleep(us) => Some(us),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Overflow {
    /// Refuse the new message
    #[default]
    Reject,
    /// Make room by discarding the oldest message
    DropOldest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MailboxPolicy {
    pub capacity: Option<usize>,
    pub overflow: Overflow,
}

impl MailboxPolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn bounded(capacity: usize, overflow: Overflow) -> Self {
        MailboxPolicy {
            capacity: Some(capacity),
            overflow,
        }
    }
}

/// FIFO of messages waiting to be received
#[derive(Debug, Clone, Default)]
pub struct Mailbox {
    messages: VecDeque<Value>,
    policy: MailboxPolicy,
}

impl Mailbox {
    pub fn new(policy: MailboxPolicy) -> Self {
        Mailbox {
            messages: VecDeque::new(),
            policy,
        }
    }

    /// Append a message. Returns false if the policy refused it.
    pub fn push(&mut self, message: Value) -> bool {
        if let Some(capacity) = self.policy.capacity {
            if self.messages.len() >= capacity {
                match self.policy.overflow {
                    Overflow::Reject => return false,
                    Overflow::DropOldest => {
                        if self.messages.pop_front().is_none() {
                            return false;
                        }
                    }
                }
            }
        }
        self.messages.push_back(message);
        true
    }

    pub fn pop_front(&mut self) -> Option<Value> {
        self.messages.pop_front()
    }

    pub fn remove(&mut self, index: usize) -> Option<Value> {
        self.messages.remove(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn policy(&self) -> MailboxPolicy {
        self.policy
    }
}

/// One lightweight process: its own registers, continuation stack and mailbox
#[derive(Debug)]
pub struct Context {
    pub(crate) id: Cid,
    /// Top-level expressions still to run after the current one
    pub(crate) program: Value,
    pub(crate) curr_exp: Value,
    pub(crate) curr_env: Env,
    /// Result register
    pub(crate) r: Value,
    pub(crate) mailbox: Mailbox,
    pub(crate) k: ContinuationStack,
    pub(crate) done: bool,
    /// Set when `r` holds a value to hand to the top frame
    pub(crate) app_cont: bool,
    /// When the context last blocked, from the timestamp callback
    pub(crate) timestamp: u32,
    pub(crate) sleep_us: u32,
    pub(crate) block: Option<BlockReason>,
    pub(crate) timed_out: bool,
    pub(crate) steps: u64,
}

impl Context {
    pub(crate) fn new(
        id: Cid,
        program: Value,
        stack_size: usize,
        mailbox: MailboxPolicy,
    ) -> Result<Context, EvalError> {
        let mut k = ContinuationStack::with_capacity(stack_size);
        k.push(Frame::Done)?;
        let (curr_exp, program) = match &program {
            Value::Cons(cell) => (cell.car.clone(), cell.cdr.clone()),
            _ => (Value::Nil, Value::Nil),
        };
        Ok(Context {
            id,
            program,
            curr_exp,
            curr_env: Env::empty(),
            r: Value::Nil,
            mailbox: Mailbox::new(mailbox),
            k,
            done: false,
            app_cont: false,
            timestamp: 0,
            sleep_us: 0,
            block: None,
            timed_out: false,
            steps: 0,
        })
    }

    pub fn id(&self) -> Cid {
        self.id
    }

    /// The result register; the final value once the context is done
    pub fn result(&self) -> &Value {
        &self.r
    }

    pub fn current_expression(&self) -> &Value {
        &self.curr_exp
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    pub fn stack(&self) -> &ContinuationStack {
        &self.k
    }

    pub fn block_reason(&self) -> Option<BlockReason> {
        self.block
    }

    /// Steps taken so far
    pub fn steps(&self) -> u64 {
        self.steps
    }
}
