//! Context collections
//!
//! Every live context is in exactly one of ready, blocked or done. The
//! context taking a slice is removed from the arena while it runs and put
//! back by [`Scheduler::place`] before the runtime lock is released.

use std::collections::{HashMap, VecDeque};

use log::debug;

use crate::context::{BlockReason, Cid, Context, MailboxPolicy, Queue};
use crate::error::Error;
use crate::value::Value;

/// How a step or slice left the running context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionResult {
    /// More work this slice
    Continue,
    /// Give up the rest of the slice
    Pass,
    /// Timeslice used up
    BudgetExhausted,
    Blocked(BlockReason),
    Exited,
}

#[derive(Debug)]
pub(crate) struct Scheduler {
    contexts: HashMap<Cid, Context>,
    ready: VecDeque<Cid>,
    blocked: Vec<Cid>,
    done: Vec<Cid>,
    running: Option<Cid>,
    next_cid: u32,
    max_contexts: usize,
}

impl Scheduler {
    pub fn new(max_contexts: usize) -> Self {
        Scheduler {
            contexts: HashMap::new(),
            ready: VecDeque::new(),
            blocked: Vec::new(),
            done: Vec::new(),
            running: None,
            next_cid: 1,
            max_contexts,
        }
    }

    pub fn clear(&mut self) {
        self.contexts.clear();
        self.ready.clear();
        self.blocked.clear();
        self.done.clear();
        self.running = None;
        self.next_cid = 1;
    }

    /// Contexts not yet removed, including done ones
    pub fn len(&self) -> usize {
        self.contexts.len() + usize::from(self.running.is_some())
    }

    fn allocate_cid(&mut self) -> Result<Cid, Error> {
        if self.len() >= self.max_contexts {
            return Err(Error::TooManyContexts(self.max_contexts));
        }
        loop {
            let candidate = Cid::new(self.next_cid);
            self.next_cid = self.next_cid.wrapping_add(1);
            if let Some(cid) = candidate {
                if !self.contexts.contains_key(&cid) && self.running != Some(cid) {
                    return Ok(cid);
                }
            }
        }
    }

    /// Create a context for `program` at the back of ready
    pub fn create(
        &mut self,
        program: Value,
        stack_size: usize,
        mailbox: MailboxPolicy,
    ) -> Result<Cid, Error> {
        let cid = self.allocate_cid()?;
        let ctx = Context::new(cid, program, stack_size, mailbox)
            .map_err(|_| Error::StackTooSmall(stack_size))?;
        self.contexts.insert(cid, ctx);
        self.ready.push_back(cid);
        debug!("context {} created, stack {}", cid, stack_size);
        Ok(cid)
    }

    /// Take the head of ready for a slice
    pub fn take_next_ready(&mut self) -> Option<Context> {
        while let Some(cid) = self.ready.pop_front() {
            if let Some(ctx) = self.contexts.remove(&cid) {
                self.running = Some(cid);
                return Some(ctx);
            }
        }
        None
    }

    /// Put the context that just ran back into the right collection
    pub fn place(&mut self, mut ctx: Context, result: ExecutionResult, now: u32) -> Queue {
        let cid = ctx.id;
        self.running = None;
        let queue = match result {
            ExecutionResult::Exited => {
                ctx.done = true;
                self.done.push(cid);
                debug!("context {} done: {}", cid, ctx.r);
                Queue::Done
            }
            ExecutionResult::Blocked(reason) => {
                ctx.block = Some(reason);
                ctx.timestamp = now;
                ctx.sleep_us = reason.deadline_us().unwrap_or(0);
                self.blocked.push(cid);
                debug!("context {} blocked: {:?}", cid, reason);
                Queue::Blocked
            }
            ExecutionResult::Continue | ExecutionResult::Pass | ExecutionResult::BudgetExhausted => {
                self.ready.push_back(cid);
                Queue::Ready
            }
        };
        self.contexts.insert(cid, ctx);
        queue
    }

    fn unblock(&mut self, cid: Cid) {
        self.blocked.retain(|&b| b != cid);
        if let Some(ctx) = self.contexts.get_mut(&cid) {
            ctx.block = None;
            ctx.sleep_us = 0;
        }
        self.ready.push_back(cid);
    }

    /// Move blocked contexts whose deadline has passed to ready
    pub fn wake_expired(&mut self, now: u32) {
        let mut expired = Vec::new();
        for cid in &self.blocked {
            if let Some(ctx) = self.contexts.get_mut(cid) {
                if let Some(reason) = ctx.block {
                    if reason.deadline_us().is_some()
                        && now.wrapping_sub(ctx.timestamp) >= ctx.sleep_us
                    {
                        if let BlockReason::MessageOrTimeout(_) = reason {
                            ctx.timed_out = true;
                        }
                        expired.push(*cid);
                    }
                }
            }
        }
        for cid in expired {
            debug!("context {} woke after timeout", cid);
            self.unblock(cid);
        }
    }

    /// Append `message` to a live context's mailbox, waking it if it is
    /// blocked receiving
    pub fn deliver(&mut self, cid: Cid, message: Value) -> Result<(), Error> {
        let ctx = match self.contexts.get_mut(&cid) {
            Some(ctx) if !ctx.done => ctx,
            _ => return Err(Error::UnknownContext(cid)),
        };
        if !ctx.mailbox.push(message) {
            return Err(Error::MailboxFull(cid));
        }
        if ctx.block.map_or(false, BlockReason::woken_by_message) {
            self.unblock(cid);
        }
        Ok(())
    }

    /// Live and not yet done, counting the running context
    pub fn is_pending(&self, cid: Cid) -> bool {
        self.running == Some(cid) || self.contexts.get(&cid).map_or(false, |c| !c.done)
    }

    /// Remove a done context, returning its result
    pub fn remove_done(&mut self, cid: Cid) -> Option<Value> {
        let pos = self.done.iter().position(|&d| d == cid)?;
        self.done.remove(pos);
        self.contexts.remove(&cid).map(|ctx| ctx.r)
    }

    pub fn queue_of(&self, cid: Cid) -> Option<Queue> {
        if self.ready.contains(&cid) {
            Some(Queue::Ready)
        } else if self.blocked.contains(&cid) {
            Some(Queue::Blocked)
        } else if self.done.contains(&cid) {
            Some(Queue::Done)
        } else {
            None
        }
    }

    pub fn ids(&self, queue: Queue) -> Vec<Cid> {
        match queue {
            Queue::Ready => self.ready.iter().copied().collect(),
            Queue::Blocked => self.blocked.clone(),
            Queue::Done => self.done.clone(),
        }
    }

    pub fn for_each<F: FnMut(&Context)>(&self, queue: Queue, mut f: F) {
        for cid in self.ids(queue) {
            if let Some(ctx) = self.contexts.get(&cid) {
                f(ctx);
            }
        }
    }

    #[cfg(test)]
    pub fn get(&self, cid: Cid) -> Option<&Context> {
        self.contexts.get(&cid)
    }
}
