//! State shared by every context, guarded by the evaluator's lock

use lbm_ext::ExtRegistry;

use crate::callbacks::Callbacks;
use crate::config::EvalConfig;
use crate::context::{Cid, Queue};
use crate::control::{ControlState, EvalState};
use crate::env::GlobalEnv;
use crate::error::Error;
use crate::eval::advance;
use crate::scheduler::{ExecutionResult, Scheduler};
use crate::symbols::SymbolTable;
use crate::value::Value;

#[derive(Debug)]
pub(crate) struct Runtime {
    pub scheduler: Scheduler,
    pub globals: GlobalEnv,
    pub symbols: SymbolTable,
    pub extensions: ExtRegistry,
    pub config: EvalConfig,
}

impl Runtime {
    pub fn new(config: EvalConfig, extensions: ExtRegistry) -> Self {
        Runtime {
            scheduler: Scheduler::new(config.max_contexts),
            globals: GlobalEnv::new(),
            symbols: SymbolTable::new(),
            extensions,
            config,
        }
    }

    /// Drop every context and global binding. Interned symbols survive so
    /// that symbol values held by the host keep their meaning.
    pub fn reset(&mut self) {
        self.scheduler.clear();
        self.globals.clear();
    }

    pub fn spawn(&mut self, program: Value, stack_size: usize) -> Result<Cid, Error> {
        self.scheduler.create(program, stack_size, self.config.mailbox)
    }

    /// Give the head of ready a slice of at most `budget` steps. Returns the
    /// context that ran and where it went, or `None` if nothing was ready.
    pub fn run_slice(
        &mut self,
        budget: u32,
        now: u32,
        control: &ControlState,
        callbacks: &Callbacks,
    ) -> Option<(Cid, Queue)> {
        // a single requested step may take one step; otherwise only Running may run
        let may_step = |n: u32| match control.get() {
            EvalState::Running => true,
            EvalState::Step => n == 0,
            _ => false,
        };
        if !may_step(0) {
            return None;
        }
        self.scheduler.wake_expired(now);
        let mut ctx = self.scheduler.take_next_ready()?;
        let mut result = ExecutionResult::BudgetExhausted;
        for n in 0..budget.max(1) {
            if n > 0 && !may_step(n) {
                break;
            }
            match advance(&mut ctx, self) {
                ExecutionResult::Continue => {}
                other => {
                    result = other;
                    break;
                }
            }
        }
        let cid = ctx.id;
        if result == ExecutionResult::Exited {
            ctx.done = true;
            callbacks.ctx_done(&ctx);
        }
        Some((cid, self.scheduler.place(ctx, result, now)))
    }
}
