//! Host callbacks: sleeping, time and context completion

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::context::Context;

pub type UsleepFn = Arc<dyn Fn(u32) + Send + Sync>;
pub type TimestampFn = Arc<dyn Fn() -> u32 + Send + Sync>;
pub type CtxDoneFn = Arc<dyn Fn(&Context) + Send + Sync>;

/// Every callback defaults to a no-op; the timestamp then reads as 0.
#[derive(Clone, Default)]
pub struct Callbacks {
    pub usleep: Option<UsleepFn>,
    pub timestamp_us: Option<TimestampFn>,
    /// Runs on the evaluator thread with the scheduler lock held. It must
    /// not call back into the evaluator.
    pub ctx_done: Option<CtxDoneFn>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep and timestamp callbacks backed by `std`
    pub fn host() -> Self {
        let epoch = Instant::now();
        Callbacks {
            usleep: Some(Arc::new(|us: u32| {
                std::thread::sleep(Duration::from_micros(us as u64))
            })),
            // wraps after ~71 minutes; elapsed time is computed with wrapping_sub
            timestamp_us: Some(Arc::new(move || epoch.elapsed().as_micros() as u32)),
            ctx_done: None,
        }
    }

    pub fn usleep(&self, us: u32) {
        match &self.usleep {
            Some(f) => f(us),
            None => std::thread::yield_now(),
        }
    }

    pub fn timestamp_us(&self) -> u32 {
        self.timestamp_us.as_ref().map_or(0, |f| f())
    }

    pub fn ctx_done(&self, ctx: &Context) {
        if let Some(f) = &self.ctx_done {
            f(ctx);
        }
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("usleep", &self.usleep.is_some())
            .field("timestamp_us", &self.timestamp_us.is_some())
            .field("ctx_done", &self.ctx_done.is_some())
            .finish()
    }
}
