//! lbm-shell - interactive lispbm shell
//!
//! Every entry runs as a new context on a background evaluator, so programs
//! that block keep running while the shell takes more input.

use std::env;
use std::thread::JoinHandle;
use std::time::Duration;

use lbm_eval::{Callbacks, Cid, Context, EvalConfig, Evaluator, Kind, Queue, StringStream};
use log::warn;
use rustyline::error::ReadlineError;
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Highlighter, Hinter};

/// How long an entry may run before the prompt comes back
const RESULT_WAIT: Duration = Duration::from_millis(500);

#[cfg(windows)]
const HOME: &str = "%APPDATA%";
#[cfg(windows)]
const PROMPT: &str = "lbm> ";
#[cfg(not(windows))]
const HOME: &str = "~";
#[cfg(not(windows))]
const PROMPT: &str = "\x1b[38;5;85mlbm> \x1b[0m";

/// Depth of unclosed parentheses, ignoring strings and comments
fn open_parens(input: &str) -> i64 {
    let mut depth = 0;
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            '"' => {
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => {
                            chars.next();
                        }
                        '"' => break,
                        _ => {}
                    }
                }
            }
            ';' => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            _ => {}
        }
    }
    depth
}

#[derive(Completer, Helper, Highlighter, Hinter)]
struct LineHelper;

impl Validator for LineHelper {
    fn validate(&self, ctx: &mut ValidationContext) -> rustyline::Result<ValidationResult> {
        let input = ctx.input();
        if input.starts_with('.') {
            return Ok(ValidationResult::Valid(None));
        }
        Ok(match open_parens(input) {
            0 => ValidationResult::Valid(None),
            d if d > 0 => ValidationResult::Incomplete,
            _ => ValidationResult::Invalid(Some("  <- unbalanced ')'".to_string())),
        })
    }
}

pub struct Repl {
    evaluator: Evaluator,
    handle: Option<JoinHandle<()>>,
    cmd_buf: Vec<String>,
    rl: Editor<LineHelper>,
    loc: String,
}

impl Repl {
    pub fn new() -> std::io::Result<Self> {
        let loc = env::var("HOME").unwrap_or_else(|_| HOME.to_string()) + "/.lbm.history.txt";
        let mut rl = Editor::<LineHelper>::new();
        rl.set_helper(Some(LineHelper));
        if rl.load_history(&loc).is_err() {
            println!("No history");
        }
        let evaluator = Evaluator::new(EvalConfig::default());
        evaluator.set_callbacks(Callbacks::host());
        let handle = evaluator.start()?;
        Ok(Repl {
            evaluator,
            handle: Some(handle),
            cmd_buf: vec![],
            rl,
            loc,
        })
    }

    pub fn run(&mut self) {
        println!("lispbm {}", env!("CARGO_PKG_VERSION"));
        println!("Type .help for shell commands");
        loop {
            let buf = match self.rl.readline(PROMPT) {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) => continue,
                Err(_) => String::from(".quit"),
            };
            let line = buf.trim();
            if line.is_empty() {
                continue;
            }
            match line.split_whitespace().next().unwrap_or("") {
                ".quit" => break,
                ".help" => print_help(),
                ".history" => {
                    for cmd in &self.cmd_buf {
                        println!("{}", cmd);
                    }
                }
                ".state" => println!("{}", self.evaluator.state()),
                ".pause" => self.evaluator.pause(),
                ".step" => self.evaluator.step(),
                ".continue" => self.evaluator.resume(),
                ".ready" => self.list(Queue::Ready),
                ".blocked" => self.list(Queue::Blocked),
                ".done" => self.list(Queue::Done),
                ".ext" => self.extensions(line),
                ".send" => self.send(line),
                ".wait" => self.wait(line),
                cmd if cmd.starts_with('.') => println!("Unknown command {}", cmd),
                _ => self.eval(line),
            }
            self.rl.add_history_entry(line);
            self.cmd_buf.push(line.to_string());
        }
        self.shutdown();
    }

    fn eval(&self, source: &str) {
        match self
            .evaluator
            .load_and_eval(&mut StringStream::new(source), Kind::Program)
        {
            Ok(cid) => self.report(cid),
            Err(e) => println!("Error: {}", e),
        }
    }

    /// Print a context's result if it finishes soon, otherwise leave it running
    fn report(&self, cid: Cid) {
        match self.evaluator.wait_timeout(cid, RESULT_WAIT) {
            Some(value) => println!("{}", value),
            None => println!("[context {} still running]", cid),
        }
    }

    fn list(&self, queue: Queue) {
        self.evaluator.for_each(queue, |ctx: &Context| {
            let state = match ctx.block_reason() {
                Some(reason) => format!("{:?}", reason),
                None if ctx.is_done() => format!("result {}", ctx.result()),
                None => format!("at {}", ctx.current_expression()),
            };
            println!(
                "{:>5}  steps {:<8} mailbox {:<3} stack {:<4} {}",
                ctx.id(),
                ctx.steps(),
                ctx.mailbox().len(),
                ctx.stack().len(),
                state
            );
        });
    }

    /// `.ext [name]`: one extension, or all of them
    fn extensions(&self, line: &str) {
        match line.split_whitespace().nth(1) {
            Some(name) => match self.evaluator.extension(name) {
                Some(info) => println!("{}", info),
                None => println!("no extension named {}", name),
            },
            None => {
                for info in self.evaluator.extensions() {
                    println!("{}", info);
                }
            }
        }
    }

    /// `.send <cid> <expr>`: the expression is delivered unevaluated
    fn send(&self, line: &str) {
        let mut parts = line.splitn(3, char::is_whitespace).skip(1);
        let (cid, expr) = match (parts.next(), parts.next()) {
            (Some(cid), Some(expr)) => (cid, expr.trim()),
            _ => {
                println!("usage: .send <cid> <expr>");
                return;
            }
        };
        let cid = match cid.parse::<u32>().ok().and_then(Cid::new) {
            Some(cid) => cid,
            None => {
                println!("not a context id: {}", cid);
                return;
            }
        };
        // the message is parsed through a context so its symbols are interned
        // in the evaluator's table
        let program = format!("(send {} (quote {}))", cid.get(), expr);
        match self
            .evaluator
            .load_and_eval(&mut StringStream::new(&program), Kind::Expression)
        {
            Ok(sender) => match self.evaluator.wait_timeout(sender, RESULT_WAIT) {
                Some(delivered) if delivered.is_truthy() => {}
                Some(_) => println!("context {} did not accept the message", cid),
                None => println!("send is waiting; is the evaluator paused?"),
            },
            Err(e) => println!("Error: {}", e),
        }
    }

    fn wait(&self, line: &str) {
        match line
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse::<u32>().ok())
            .and_then(Cid::new)
        {
            Some(cid) => self.report(cid),
            None => println!("usage: .wait <cid>"),
        }
    }

    fn shutdown(&mut self) {
        println!("See ya!");
        if let Err(e) = self.rl.save_history(&self.loc) {
            warn!("could not save history to {}: {}", self.loc, e);
        }
        self.evaluator.kill();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn print_help() {
    println!("Shell commands:");
    println!("    .quit                  Leave the shell");
    println!("    .history               Show entered lines");
    println!("    .state                 Show the evaluator state");
    println!("    .pause                 Pause the evaluator");
    println!("    .step                  Take one step while paused");
    println!("    .continue              Resume a paused evaluator");
    println!("    .ready .blocked .done  List contexts in a queue");
    println!("    .ext [name]            Describe one extension, or list them all");
    println!("    .send <cid> <expr>     Send the unevaluated expression to a context");
    println!("    .wait <cid>            Wait briefly for a context's result");
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    match Repl::new() {
        Ok(mut repl) => repl.run(),
        Err(e) => {
            eprintln!("Error: could not start evaluator: {}", e);
            std::process::exit(1);
        }
    }
}
