//! lbm - run lispbm programs from the command line

use std::fs;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use lbm_eval::{
    read_program, Callbacks, EvalConfig, Evaluator, ExtRegistry, Kind, MailboxPolicy, Overflow,
    StringStream, SymbolTable,
};
use lbm_ext::stdlib::available_modules;
use log::{debug, info};

#[derive(Parser)]
#[command(name = "lbm", version, about = "Run lispbm programs on the CPS evaluator")]
struct Cli {
    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate each file in its own context and print the results
    Run(RunArgs),
    /// Parse files without evaluating them
    Check {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Source files; each one becomes a context
    files: Vec<PathBuf>,

    /// Evaluate an expression given on the command line
    #[arg(short, long)]
    expression: Option<String>,

    /// Continuation frames per context
    #[arg(long, default_value_t = lbm_eval::config::DEFAULT_STACK_SIZE)]
    stack_size: usize,

    /// Steps per context before it yields to the next one
    #[arg(long, default_value_t = lbm_eval::config::DEFAULT_TIMESLICE)]
    timeslice: u32,

    /// Bound every mailbox to this many messages
    #[arg(long)]
    mailbox_capacity: Option<usize>,

    /// Drop the oldest message instead of refusing new ones when a mailbox is full
    #[arg(long, requires = "mailbox_capacity")]
    drop_oldest: bool,

    /// Give up on a context after this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Load only these extension modules (comma separated) instead of all of them
    #[arg(long, value_delimiter = ',')]
    ext: Vec<String>,
}

/// CLI error types
#[derive(Debug)]
enum CliError {
    InvalidArgs(String),
    Io(PathBuf, std::io::Error),
    Load(String, lbm_eval::Error),
    Timeout(String),
    Parse { failed: usize, total: usize },
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::InvalidArgs(msg) => write!(f, "Invalid arguments: {}", msg),
            CliError::Io(path, err) => write!(f, "{}: {}", path.display(), err),
            CliError::Load(name, err) => write!(f, "{}: {}", name, err),
            CliError::Timeout(what) => write!(f, "{} did not finish in time", what),
            CliError::Parse { failed, total } => {
                write!(f, "{} of {} files failed to parse", failed, total)
            }
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let result = match cli.command {
        Command::Run(args) => cmd_run(args),
        Command::Check { files } => cmd_check(&files),
    };

    if let Err(err) = result {
        eprintln!("Error: {}", err);
        process::exit(1);
    }
}

fn read_source(path: &PathBuf) -> Result<String, CliError> {
    fs::read_to_string(path).map_err(|e| CliError::Io(path.clone(), e))
}

fn config_from(args: &RunArgs) -> EvalConfig {
    let mailbox = match args.mailbox_capacity {
        Some(capacity) => {
            let overflow = if args.drop_oldest {
                Overflow::DropOldest
            } else {
                Overflow::Reject
            };
            MailboxPolicy::bounded(capacity, overflow)
        }
        None => MailboxPolicy::unbounded(),
    };
    EvalConfig::default()
        .with_stack_size(args.stack_size)
        .with_timeslice(args.timeslice)
        .with_mailbox(mailbox)
}

/// The extensions a run may call, all of them unless `--ext` names modules
fn extensions_from(args: &RunArgs) -> Result<ExtRegistry, CliError> {
    if args.ext.is_empty() {
        return Ok(ExtRegistry::with_stdlib());
    }
    let available = available_modules();
    if let Some(unknown) = args.ext.iter().find(|m| !available.contains(&m.as_str())) {
        return Err(CliError::InvalidArgs(format!(
            "unknown extension module {}; available: {}",
            unknown,
            available.join(", ")
        )));
    }
    let modules: Vec<&str> = args.ext.iter().map(String::as_str).collect();
    Ok(ExtRegistry::with_modules(&modules))
}

fn cmd_run(args: RunArgs) -> Result<(), CliError> {
    let mut sources = Vec::new();
    if let Some(expr) = &args.expression {
        sources.push(("<expression>".to_string(), expr.clone(), Kind::Expression));
    }
    for path in &args.files {
        sources.push((path.display().to_string(), read_source(path)?, Kind::Program));
    }
    if sources.is_empty() {
        return Err(CliError::InvalidArgs(
            "nothing to run; give files or --expression".to_string(),
        ));
    }

    let evaluator = Evaluator::with_extensions(config_from(&args), extensions_from(&args)?);
    evaluator.set_callbacks(Callbacks::host());
    let handle = evaluator
        .start()
        .map_err(|e| CliError::Io(PathBuf::from("<evaluator thread>"), e))?;

    let mut launched = Vec::new();
    for (name, source, kind) in sources {
        match evaluator.load_and_eval(&mut StringStream::new(&source), kind) {
            Ok(cid) => {
                debug!("{} running as context {}", name, cid);
                launched.push((name, cid));
            }
            Err(e) => {
                evaluator.kill();
                let _ = handle.join();
                return Err(CliError::Load(name, e));
            }
        }
    }

    let mut outcome = Ok(());
    for (name, cid) in &launched {
        let result = match args.timeout_ms {
            Some(ms) => evaluator.wait_timeout(*cid, Duration::from_millis(ms)),
            None => Some(evaluator.wait(*cid)),
        };
        match result {
            Some(value) if launched.len() == 1 => println!("{}", value),
            Some(value) => println!("{}: {}", name, value),
            None => {
                outcome = Err(CliError::Timeout(name.clone()));
                break;
            }
        }
    }

    evaluator.kill();
    let _ = handle.join();
    info!("evaluator stopped");
    outcome
}

fn cmd_check(files: &[PathBuf]) -> Result<(), CliError> {
    let mut symbols = SymbolTable::new();
    let mut failed = 0;
    for path in files {
        let source = read_source(path)?;
        match read_program(&mut StringStream::new(&source), &mut symbols) {
            Ok(exprs) => println!("{}: ok, {} expressions", path.display(), exprs.len()),
            Err(e) => {
                println!("{}: {}", path.display(), e);
                failed += 1;
            }
        }
    }
    if failed > 0 {
        return Err(CliError::Parse {
            failed,
            total: files.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_args(argv: &[&str]) -> RunArgs {
        let cli = Cli::try_parse_from(argv).unwrap();
        match cli.command {
            Command::Run(args) => args,
            Command::Check { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn test_ext_modules_restrict_registry() {
        let args = run_args(&["lbm", "run", "-e", "(sqrt 4)", "--ext", "math,string"]);
        assert_eq!(args.ext, vec!["math", "string"]);
        let registry = extensions_from(&args).unwrap();
        assert!(registry.contains("sqrt"));
        assert!(registry.contains("str-len"));
        assert!(!registry.contains("println"));

        let all = extensions_from(&run_args(&["lbm", "run", "-e", "1"])).unwrap();
        assert!(all.contains("println"));
    }

    #[test]
    fn test_unknown_ext_module_rejected() {
        let args = run_args(&["lbm", "run", "-e", "1", "--ext", "math,net"]);
        match extensions_from(&args) {
            Err(CliError::InvalidArgs(msg)) => assert!(msg.contains("net")),
            other => panic!("expected invalid args, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_config_from_timeslice() {
        let args = run_args(&["lbm", "run", "-e", "1", "--timeslice", "7"]);
        assert_eq!(config_from(&args).timeslice, 7);
    }
}
