use crate::context::MailboxPolicy;

pub const DEFAULT_STACK_SIZE: usize = 256;
pub const DEFAULT_TIMESLICE: u32 = 100;
pub const DEFAULT_IDLE_SLEEP_US: u32 = 200;
pub const DEFAULT_PAUSE_SLEEP_US: u32 = 1000;
pub const DEFAULT_MAX_CONTEXTS: usize = 4096;

/// Evaluator tunables
#[derive(Debug, Clone, PartialEq)]
pub struct EvalConfig {
    /// Continuation frames per context unless given at launch
    pub default_stack_size: usize,
    /// Steps a context may take before it is rotated to the back of ready
    pub timeslice: u32,
    /// Sleep between scheduler passes that found nothing ready
    pub idle_sleep_us: u32,
    /// Sleep between control-state checks while paused
    pub pause_sleep_us: u32,
    pub max_contexts: usize,
    pub mailbox: MailboxPolicy,
}

impl EvalConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stack_size(mut self, frames: usize) -> Self {
        self.default_stack_size = frames;
        self
    }

    pub fn with_timeslice(mut self, steps: u32) -> Self {
        self.timeslice = steps.max(1);
        self
    }

    pub fn with_mailbox(mut self, policy: MailboxPolicy) -> Self {
        self.mailbox = policy;
        self
    }

    pub fn with_max_contexts(mut self, max: usize) -> Self {
        self.max_contexts = max;
        self
    }
}

impl Default for EvalConfig {
    fn default() -> Self {
        EvalConfig {
            default_stack_size: DEFAULT_STACK_SIZE,
            timeslice: DEFAULT_TIMESLICE,
            idle_sleep_us: DEFAULT_IDLE_SLEEP_US,
            pause_sleep_us: DEFAULT_PAUSE_SLEEP_US,
            max_contexts: DEFAULT_MAX_CONTEXTS,
            mailbox: MailboxPolicy::unbounded(),
        }
    }
}
