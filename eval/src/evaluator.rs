//! Host-facing evaluator handle
//!
//! An [`Evaluator`] is a cheap clone of a shared runtime. One thread runs
//! [`Evaluator::run`]; any other thread may launch programs, send messages,
//! wait for results or steer the run loop at the same time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use lbm_ext::{ExtInfo, ExtRegistry};
use log::{debug, info, warn};
use parking_lot::{Condvar, Mutex, MutexGuard, RwLock};

use crate::callbacks::Callbacks;
use crate::config::EvalConfig;
use crate::context::{Cid, Context, Queue};
use crate::control::{ControlState, EvalState};
use crate::error::{Error, Result};
use crate::runtime::Runtime;
use crate::value::Value;

struct Shared {
    runtime: Mutex<Runtime>,
    /// Signalled whenever a context enters done
    done_signal: Condvar,
    control: ControlState,
    callbacks: RwLock<Callbacks>,
    loop_active: AtomicBool,
    config: EvalConfig,
}

#[derive(Clone)]
pub struct Evaluator {
    shared: Arc<Shared>,
}

impl Evaluator {
    /// Evaluator with the standard extension library
    pub fn new(config: EvalConfig) -> Self {
        Self::with_extensions(config, ExtRegistry::with_stdlib())
    }

    pub fn with_extensions(config: EvalConfig, extensions: ExtRegistry) -> Self {
        Evaluator {
            shared: Arc::new(Shared {
                runtime: Mutex::new(Runtime::new(config.clone(), extensions)),
                done_signal: Condvar::new(),
                control: ControlState::new(),
                callbacks: RwLock::new(Callbacks::default()),
                loop_active: AtomicBool::new(false),
                config,
            }),
        }
    }

    pub fn config(&self) -> &EvalConfig {
        &self.shared.config
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Runtime> {
        self.shared.runtime.lock()
    }

    /// Lock the runtime for a request that must be refused after kill
    pub(crate) fn lock_live(&self) -> Result<MutexGuard<'_, Runtime>> {
        let rt = self.lock();
        if self.shared.control.is_killed() {
            warn!("request refused: evaluator killed");
            return Err(Error::Killed);
        }
        Ok(rt)
    }

    /// Empty every queue and the global environment and return to `Init`.
    /// Fails while the run loop is active.
    pub fn init(&self) -> Result<()> {
        // run claims the loop under this lock, so it cannot start in between
        let mut rt = self.lock();
        if self.shared.loop_active.load(Ordering::Acquire) {
            return Err(Error::AlreadyRunning);
        }
        rt.reset();
        self.shared.control.reset();
        info!("evaluator initialized");
        Ok(())
    }

    /// The run loop. Returns once the evaluator is killed.
    pub fn run(&self) {
        let shared = &self.shared;
        {
            let _rt = self.lock();
            if shared.loop_active.swap(true, Ordering::AcqRel) {
                warn!("run loop already active");
                return;
            }
            if !shared.control.transition(EvalState::Init, EvalState::Running) {
                warn!("run loop not started: evaluator is {}", shared.control.get());
                shared.loop_active.store(false, Ordering::Release);
                return;
            }
        }
        info!("evaluator running");

        loop {
            match shared.control.get() {
                EvalState::Kill => break,
                EvalState::Running => {
                    if !self.run_once(shared.config.timeslice) {
                        self.idle(shared.config.idle_sleep_us);
                    }
                }
                EvalState::Step => {
                    self.run_once(1);
                    shared.control.transition(EvalState::Step, EvalState::Paused);
                }
                EvalState::Paused | EvalState::Init => self.idle(shared.config.pause_sleep_us),
            }
        }

        info!("evaluator killed, run loop exiting");
        shared.loop_active.store(false, Ordering::Release);
    }

    /// Run the loop on a new thread
    pub fn start(&self) -> std::io::Result<JoinHandle<()>> {
        let evaluator = self.clone();
        thread::Builder::new()
            .name("lbm-eval".to_string())
            .spawn(move || evaluator.run())
    }

    /// One slice. False when nothing was ready.
    fn run_once(&self, budget: u32) -> bool {
        let callbacks = self.shared.callbacks.read().clone();
        let now = callbacks.timestamp_us();
        let mut rt = self.lock();
        match rt.run_slice(budget, now, &self.shared.control, &callbacks) {
            Some((_, Queue::Done)) => {
                self.shared.done_signal.notify_all();
                true
            }
            Some(_) => true,
            None => false,
        }
    }

    fn idle(&self, us: u32) {
        let callbacks = self.shared.callbacks.read().clone();
        callbacks.usleep(us);
    }

    pub fn pause(&self) {
        if self.shared.control.pause() {
            info!("evaluator paused");
        }
    }

    /// Take one step of one context, then pause again
    pub fn step(&self) {
        self.shared.control.step();
    }

    pub fn resume(&self) {
        if self.shared.control.resume() {
            info!("evaluator resumed");
        }
    }

    pub fn kill(&self) {
        self.shared.control.kill();
        info!("evaluator kill requested");
    }

    pub fn state(&self) -> EvalState {
        self.shared.control.get()
    }

    /// Start a context for `program` (a list of top-level expressions)
    pub fn launch(&self, program: Value) -> Result<Cid> {
        self.launch_with_stack(program, self.shared.config.default_stack_size)
    }

    pub fn launch_with_stack(&self, program: Value, stack_size: usize) -> Result<Cid> {
        if !program.is_list() {
            return Err(Error::NotAProgram(program.to_string()));
        }
        let mut rt = self.lock_live()?;
        rt.spawn(program, stack_size)
    }

    /// Remove a done context and return its result. `None` if the context is
    /// not done (or unknown); nothing is removed then.
    pub fn remove_done(&self, cid: Cid) -> Option<Value> {
        self.lock().scheduler.remove_done(cid)
    }

    /// Block until `cid` is done, then remove it and return its result.
    /// Must not be called from the run loop thread.
    pub fn wait(&self, cid: Cid) -> Value {
        let mut rt = self.lock();
        loop {
            if let Some(value) = rt.scheduler.remove_done(cid) {
                return value;
            }
            self.shared.done_signal.wait(&mut rt);
        }
    }

    /// [`wait`](Self::wait) with a deadline
    pub fn wait_timeout(&self, cid: Cid, timeout: Duration) -> Option<Value> {
        let deadline = Instant::now() + timeout;
        let mut rt = self.lock();
        loop {
            if let Some(value) = rt.scheduler.remove_done(cid) {
                return Some(value);
            }
            if self
                .shared
                .done_signal
                .wait_until(&mut rt, deadline)
                .timed_out()
            {
                return rt.scheduler.remove_done(cid);
            }
        }
    }

    /// Deliver a message to a live context's mailbox
    pub fn send(&self, cid: Cid, message: Value) -> Result<()> {
        let mut rt = self.lock_live()?;
        let result = rt.scheduler.deliver(cid, message);
        if let Err(e) = &result {
            debug!("host send failed: {}", e);
        }
        result
    }

    /// Visit every context in `queue` under the runtime lock
    pub fn for_each<F: FnMut(&Context)>(&self, queue: Queue, f: F) {
        self.lock().scheduler.for_each(queue, f);
    }

    pub fn queue_of(&self, cid: Cid) -> Option<Queue> {
        self.lock().scheduler.queue_of(cid)
    }

    /// Contexts not yet removed, done ones included
    pub fn live_contexts(&self) -> usize {
        self.lock().scheduler.len()
    }

    pub fn set_usleep_callback<F>(&self, f: F)
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        self.shared.callbacks.write().usleep = Some(Arc::new(f));
    }

    pub fn set_timestamp_us_callback<F>(&self, f: F)
    where
        F: Fn() -> u32 + Send + Sync + 'static,
    {
        self.shared.callbacks.write().timestamp_us = Some(Arc::new(f));
    }

    /// Called on the run loop thread, with the runtime locked, each time a
    /// context finishes. Must not call back into the evaluator.
    pub fn set_ctx_done_callback<F>(&self, f: F)
    where
        F: Fn(&Context) + Send + Sync + 'static,
    {
        self.shared.callbacks.write().ctx_done = Some(Arc::new(f));
    }

    pub fn set_callbacks(&self, callbacks: Callbacks) {
        *self.shared.callbacks.write() = callbacks;
    }

    /// Value of a global binding
    pub fn global(&self, name: &str) -> Option<Value> {
        let rt = self.lock();
        let symbol = rt.symbols.lookup(name)?;
        rt.globals.get(symbol.id()).cloned()
    }

    pub fn define_global(&self, name: &str, value: Value) {
        let mut rt = self.lock();
        let symbol = rt.symbols.intern(name);
        rt.globals.insert(symbol.id(), value);
    }

    /// Extensions this evaluator can call, sorted by name
    pub fn extensions(&self) -> Vec<ExtInfo> {
        self.lock().extensions.describe()
    }

    pub fn extension(&self, name: &str) -> Option<ExtInfo> {
        self.lock().extensions.info(name)
    }

    /// Symbol value for `name`, for building messages on the host side
    pub fn symbol(&self, name: &str) -> Value {
        Value::Symbol(self.lock().symbols.intern(name))
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(EvalConfig::default())
    }
}

impl std::fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluator")
            .field("state", &self.state())
            .field("config", &self.shared.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wait_for(evaluator: &Evaluator, state: EvalState) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while evaluator.state() != state {
            if Instant::now() > deadline {
                return false;
            }
            thread::sleep(Duration::from_micros(100));
        }
        true
    }

    #[test]
    fn test_init_racing_start_never_strands_the_loop() {
        for _ in 0..50 {
            let evaluator = Evaluator::default();
            let other = evaluator.clone();
            let initializer = thread::spawn(move || other.init());
            let handle = evaluator.start().unwrap();
            let init_result = initializer.join().unwrap();

            assert!(
                wait_for(&evaluator, EvalState::Running),
                "loop left in {}",
                evaluator.state()
            );
            if init_result.is_err() {
                assert!(matches!(init_result, Err(Error::AlreadyRunning)));
            }
            evaluator.kill();
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_init_refused_while_running() {
        let evaluator = Evaluator::default();
        let handle = evaluator.start().unwrap();
        assert!(wait_for(&evaluator, EvalState::Running));
        assert!(matches!(evaluator.init(), Err(Error::AlreadyRunning)));
        evaluator.kill();
        handle.join().unwrap();
        evaluator.init().unwrap();
        assert_eq!(evaluator.state(), EvalState::Init);
    }

    #[test]
    fn test_extensions_listing() {
        let evaluator = Evaluator::with_extensions(
            EvalConfig::default(),
            ExtRegistry::with_modules(&["math"]),
        );
        let listed = evaluator.extensions();
        assert!(listed.iter().any(|info| info.name == "sqrt"));
        assert!(!listed.iter().any(|info| info.name == "str-len"));
        assert_eq!(evaluator.extension("sqrt").map(|info| info.arity), Some(1));
        assert!(evaluator.extension("str-len").is_none());
    }
}
