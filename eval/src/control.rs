//! Evaluator control state
//!
//! Host threads request pause/step/resume/kill by changing one atomic; the
//! run loop observes it at its safe points (between steps).

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EvalState {
    Init = 0,
    Paused = 1,
    Running = 2,
    Step = 3,
    Kill = 4,
}

impl EvalState {
    fn from_u8(raw: u8) -> EvalState {
        match raw {
            0 => EvalState::Init,
            1 => EvalState::Paused,
            2 => EvalState::Running,
            3 => EvalState::Step,
            _ => EvalState::Kill,
        }
    }
}

impl fmt::Display for EvalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EvalState::Init => "init",
            EvalState::Paused => "paused",
            EvalState::Running => "running",
            EvalState::Step => "step",
            EvalState::Kill => "kill",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug)]
pub struct ControlState(AtomicU8);

impl ControlState {
    pub fn new() -> Self {
        ControlState(AtomicU8::new(EvalState::Init as u8))
    }

    pub fn get(&self) -> EvalState {
        EvalState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Compare-and-set; true if the state was `from` and is now `to`
    pub fn transition(&self, from: EvalState, to: EvalState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Running → Paused
    pub fn pause(&self) -> bool {
        self.transition(EvalState::Running, EvalState::Paused)
    }

    /// Paused → Step
    pub fn step(&self) -> bool {
        self.transition(EvalState::Paused, EvalState::Step)
    }

    /// Paused or Step → Running
    pub fn resume(&self) -> bool {
        self.transition(EvalState::Paused, EvalState::Running)
            || self.transition(EvalState::Step, EvalState::Running)
    }

    /// Any → Kill. Final.
    pub fn kill(&self) {
        self.0.store(EvalState::Kill as u8, Ordering::Release);
    }

    pub(crate) fn reset(&self) {
        self.0.store(EvalState::Init as u8, Ordering::Release);
    }

    pub fn is_killed(&self) -> bool {
        self.get() == EvalState::Kill
    }
}

impl Default for ControlState {
    fn default() -> Self {
        Self::new()
    }
}
