pub mod builtins;
pub mod callbacks;
pub mod config;
pub mod context;
pub mod control;
pub mod env;
pub mod error;
pub mod eval;
pub mod evaluator;
pub mod extensions;
pub mod loader;
pub mod matching;
pub mod reader;
mod runtime;
pub mod scheduler;
pub mod stack;
pub mod symbols;
pub mod value;

#[cfg(test)]
mod integration_tests;

// Re-export commonly used types
pub use callbacks::Callbacks;
pub use config::EvalConfig;
pub use context::{BlockReason, Cid, Context, Mailbox, MailboxPolicy, Overflow, Queue};
pub use control::{ControlState, EvalState};
pub use error::{Error, EvalError, Result};
pub use evaluator::Evaluator;
pub use lbm_ext::{ExtInfo, ExtRegistry};
pub use loader::Kind;
pub use reader::{read_expression, read_program, CharStream, ReadError, ReadErrorKind, StringStream};
pub use scheduler::ExecutionResult;
pub use symbols::{SymId, Symbol, SymbolTable};
pub use value::Value;
