//! End-to-end tests: a real run loop thread driven through the public API
//!
//! - message passing between contexts and with the host
//! - pause / step / resume / kill
//! - error isolation between contexts
//! - loader and extensions

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::callbacks::Callbacks;
use crate::config::EvalConfig;
use crate::context::{Cid, Context, MailboxPolicy, Overflow, Queue};
use crate::control::EvalState;
use crate::error::Error;
use crate::evaluator::Evaluator;
use crate::loader::Kind;
use crate::reader::StringStream;
use crate::value::Value;

const TIMEOUT: Duration = Duration::from_secs(5);

struct Harness {
    evaluator: Evaluator,
    handle: Option<JoinHandle<()>>,
}

impl Harness {
    fn new(config: EvalConfig) -> Self {
        let evaluator = Evaluator::new(config);
        evaluator.set_callbacks(Callbacks::host());
        let handle = evaluator.start().unwrap();
        let harness = Harness {
            evaluator,
            handle: Some(handle),
        };
        harness.wait_for_state(EvalState::Running);
        harness
    }

    fn running() -> Self {
        Self::new(EvalConfig::default())
    }

    fn wait_for_state(&self, state: EvalState) {
        let deadline = Instant::now() + TIMEOUT;
        while self.evaluator.state() != state {
            assert!(Instant::now() < deadline, "state never became {}", state);
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn wait_for_queue(&self, cid: Cid, queue: Queue) {
        let deadline = Instant::now() + TIMEOUT;
        while self.evaluator.queue_of(cid) != Some(queue) {
            assert!(Instant::now() < deadline, "context {} never reached {:?}", cid, queue);
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn load(&self, src: &str) -> Cid {
        self.evaluator
            .load_and_eval(&mut StringStream::new(src), Kind::Program)
            .unwrap()
    }

    fn eval(&self, src: &str) -> String {
        let cid = self.load(src);
        self.evaluator
            .wait_timeout(cid, TIMEOUT)
            .map(|v| v.to_string())
            .unwrap_or_else(|| panic!("`{}` did not finish", src))
    }

    /// Queue and step count of every context, taken under one lock
    fn snapshot(&self) -> HashMap<Cid, (Queue, u64)> {
        let mut out = HashMap::new();
        for queue in [Queue::Ready, Queue::Blocked, Queue::Done] {
            self.evaluator.for_each(queue, |ctx: &Context| {
                out.insert(ctx.id(), (queue, ctx.steps()));
            });
        }
        out
    }

    fn kill(&mut self) {
        self.evaluator.kill();
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap();
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.kill();
    }
}

#[test]
fn test_self_send_then_receive_finishes_with_42() {
    let h = Harness::running();
    let cid = h.load("(send (self) 42) (recv ((? x) x))");
    h.wait_for_queue(cid, Queue::Done);
    assert_eq!(h.evaluator.remove_done(cid), Some(Value::Int(42)));
    assert_eq!(h.evaluator.remove_done(cid), None);
    assert_eq!(h.evaluator.queue_of(cid), None);
}

#[test]
fn test_send_to_unknown_context_changes_nothing() {
    let h = Harness::running();
    let waiting = h.load("(recv ((? x) x))");
    h.wait_for_queue(waiting, Queue::Blocked);
    let before = h.snapshot();

    let unknown = Cid::new(9_999).unwrap();
    assert_eq!(
        h.evaluator.send(unknown, Value::Int(1)),
        Err(Error::UnknownContext(unknown))
    );
    assert_eq!(h.snapshot(), before);
}

#[test]
fn test_host_send_wakes_receiver() {
    let h = Harness::running();
    let cid = h.load("(recv ((ping (? n)) (+ n 1)))");
    h.wait_for_queue(cid, Queue::Blocked);
    let ping = Value::list([h.evaluator.symbol("ping"), Value::Int(41)]);
    h.evaluator.send(cid, ping).unwrap();
    assert_eq!(h.evaluator.wait_timeout(cid, TIMEOUT), Some(Value::Int(42)));
}

#[test]
fn test_deeply_nested_results_are_released() {
    let h = Harness::running();
    let nest = "(define nest (lambda (n acc) (if (= n 0) acc (nest (- n 1) (list acc)))))";
    let cid = h.load(&format!("{} (nest 200000 nil) 'ok", nest));
    assert_eq!(
        h.evaluator.wait_timeout(cid, Duration::from_secs(60)),
        Some(h.evaluator.symbol("ok"))
    );

    let cid = h.load("(nest 200000 'x)");
    let nested = h
        .evaluator
        .wait_timeout(cid, Duration::from_secs(60))
        .unwrap();
    assert_eq!(h.evaluator.remove_done(cid), None);
    let printed = nested.to_string();
    assert_eq!(printed.len(), 2 * 200_000 + 1);
    assert!(printed.starts_with("((((") && printed.ends_with("x))))"));
    assert_eq!(nested, nested.clone());
    drop(nested);

    // the bridge refuses what it cannot hand to an extension
    let cid = h.load("(str-len (nest 100000 nil))");
    let result = h.evaluator.wait_timeout(cid, Duration::from_secs(60)).unwrap();
    assert_eq!(result, h.evaluator.symbol("eval_error"));
}

#[test]
fn test_messages_arrive_in_send_order() {
    let h = Harness::running();
    let cid = h.load(
        "(define collect (lambda (n acc) \
           (if (= n 0) acc (collect (- n 1) (append acc (list (recv)))))))
         (collect 20 nil)",
    );
    for i in 0..20 {
        h.evaluator.send(cid, Value::Int(i)).unwrap();
    }
    let expected = Value::list((0..20).map(Value::Int).collect::<Vec<_>>());
    assert_eq!(h.evaluator.wait_timeout(cid, TIMEOUT), Some(expected));
}

#[test]
fn test_contexts_talk_to_each_other() {
    let h = Harness::running();
    let result = h.eval(
        "(define echo (lambda () (recv ((? msg) (send (car msg) (cdr msg))))))
         (define peer (spawn echo))
         (send peer (cons (self) 'hello))
         (recv ((? reply) reply))",
    );
    assert_eq!(result, "hello");
}

#[test]
fn test_spawn_passes_evaluated_arguments() {
    let h = Harness::running();
    let result = h.eval(
        "(define worker (lambda (parent x y) (send parent (list 'sum (+ x y)))))
         (spawn worker (self) (* 2 3) 4)
         (recv ((sum (? s)) s))",
    );
    assert_eq!(result, "10");
}

#[test]
fn test_wait_yields_until_child_is_done() {
    let h = Harness::running();
    let result = h.eval(
        "(define child (lambda () (progn (sleep 0.01) (define flag 'set))))
         (define c (spawn child))
         (wait c)
         flag",
    );
    assert_eq!(result, "set");
}

#[test]
fn test_sleep_blocks_for_the_given_time() {
    let h = Harness::running();
    let started = Instant::now();
    assert_eq!(h.eval("(sleep 0.05) 'done"), "done");
    assert!(started.elapsed() >= Duration::from_millis(50));
}

#[test]
fn test_recv_to_times_out() {
    let h = Harness::running();
    assert_eq!(h.eval("(recv-to 0.02 ((? x) x))"), "timeout");
    let cid = h.load("(recv-to 2 ((? x) (list 'got x)))");
    h.wait_for_queue(cid, Queue::Blocked);
    h.evaluator.send(cid, Value::Int(7)).unwrap();
    assert_eq!(
        h.evaluator.wait_timeout(cid, TIMEOUT).map(|v| v.to_string()),
        Some("(got 7)".into())
    );
}

#[test]
fn test_sleeping_context_is_not_woken_by_messages() {
    let h = Harness::running();
    let cid = h.load("(sleep 0.2) (recv ((? x) x))");
    h.wait_for_queue(cid, Queue::Blocked);
    h.evaluator.send(cid, Value::Int(1)).unwrap();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(h.evaluator.queue_of(cid), Some(Queue::Blocked));
    assert_eq!(h.evaluator.wait_timeout(cid, TIMEOUT), Some(Value::Int(1)));
}

#[test]
fn test_errors_are_isolated_per_context() {
    let h = Harness::running();
    let bad = h.load("(car 5)");
    let deep = h.evaluator.launch_with_stack(
        Value::list(read_program_values(
            &h.evaluator,
            "(define f (lambda (n) (+ 1 (f n)))) (f 0)",
        )),
        32,
    );
    let good = h.load("(+ 1 2)");
    assert_eq!(
        h.evaluator.wait_timeout(bad, TIMEOUT).map(|v| v.to_string()),
        Some("type_error".into())
    );
    assert_eq!(
        h.evaluator
            .wait_timeout(deep.unwrap(), TIMEOUT)
            .map(|v| v.to_string()),
        Some("stack_overflow".into())
    );
    assert_eq!(h.evaluator.wait_timeout(good, TIMEOUT), Some(Value::Int(3)));
}

/// Parse through a loader round trip so symbols come from the evaluator's table
fn read_program_values(evaluator: &Evaluator, src: &str) -> Vec<Value> {
    let cid = evaluator
        .load_and_define(&mut StringStream::new(src), Kind::Program, "__src")
        .unwrap();
    evaluator.wait_timeout(cid, TIMEOUT).unwrap();
    evaluator.global("__src").and_then(|v| v.to_vec()).unwrap()
}

#[test]
fn test_trap_catches_and_execution_continues() {
    let h = Harness::running();
    assert_eq!(
        h.eval("(define r (trap (/ 10 0))) (list r (trap (+ 1 1)))"),
        "((exit-error division_by_zero) (exit-ok 2))"
    );
}

#[test]
fn test_step_while_paused_advances_one_context_one_step() {
    let h = Harness::running();
    h.evaluator.pause();
    h.wait_for_state(EvalState::Paused);

    let a = h.load("(+ 1 2 3)");
    let b = h.load("(+ 4 5 6)");
    let before = h.snapshot();
    assert_eq!(before[&a], (Queue::Ready, 0));
    assert_eq!(before[&b], (Queue::Ready, 0));

    h.evaluator.step();
    h.wait_for_state(EvalState::Paused);
    let after = h.snapshot();
    assert_eq!(after[&a].1, 1);
    assert_eq!(after[&b].1, 0);

    h.evaluator.step();
    h.wait_for_state(EvalState::Paused);
    let after = h.snapshot();
    assert_eq!(after[&a].1, 1);
    assert_eq!(after[&b].1, 1);

    // nothing moves while paused
    thread::sleep(Duration::from_millis(20));
    assert_eq!(h.snapshot(), after);

    h.evaluator.resume();
    assert_eq!(h.evaluator.wait_timeout(a, TIMEOUT), Some(Value::Int(6)));
    assert_eq!(h.evaluator.wait_timeout(b, TIMEOUT), Some(Value::Int(15)));
}

#[test]
fn test_step_while_running_is_ignored() {
    let h = Harness::running();
    h.evaluator.step();
    assert_eq!(h.evaluator.state(), EvalState::Running);
    assert_eq!(h.eval("'still-running"), "still-running");
}

#[test]
fn test_pause_then_kill_leaves_contexts_unfinished() {
    let done = Arc::new(AtomicUsize::new(0));
    let mut h = Harness::running();
    let seen = done.clone();
    h.evaluator.set_ctx_done_callback(move |_: &Context| {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    let spin = "(define spin (lambda (n) (spin (+ n 1)))) (spin 0)";
    let a = h.load(spin);
    let b = h.load(spin);
    thread::sleep(Duration::from_millis(20));

    h.evaluator.pause();
    h.wait_for_state(EvalState::Paused);
    h.kill();
    assert_eq!(h.evaluator.state(), EvalState::Kill);

    let frozen = h.snapshot();
    assert_ne!(frozen[&a].0, Queue::Done);
    assert_ne!(frozen[&b].0, Queue::Done);

    assert_eq!(h.evaluator.send(a, Value::Nil), Err(Error::Killed));
    assert_eq!(h.evaluator.launch(Value::Nil), Err(Error::Killed));
    h.evaluator.step();
    h.evaluator.resume();
    assert_eq!(h.evaluator.state(), EvalState::Kill);
    thread::sleep(Duration::from_millis(20));

    assert_eq!(h.snapshot(), frozen);
    assert_eq!(done.load(Ordering::SeqCst), 0);
}

#[test]
fn test_done_callback_sees_every_finished_context() {
    let h = Harness::running();
    let results = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = results.clone();
    h.evaluator.set_ctx_done_callback(move |ctx: &Context| {
        sink.lock().push((ctx.id(), ctx.result().clone()));
    });
    let a = h.load("1");
    let b = h.load("(+ 1 1)");
    h.evaluator.wait_timeout(a, TIMEOUT).unwrap();
    h.evaluator.wait_timeout(b, TIMEOUT).unwrap();
    let mut seen = results.lock().clone();
    seen.sort_by_key(|(cid, _)| *cid);
    assert_eq!(seen, vec![(a, Value::Int(1)), (b, Value::Int(2))]);
}

#[test]
fn test_init_is_refused_while_running_and_resets_after() {
    let mut h = Harness::running();
    assert_eq!(h.evaluator.init(), Err(Error::AlreadyRunning));
    h.evaluator.define_global("x", Value::Int(1));
    let blocked = h.load("(recv)");
    h.wait_for_queue(blocked, Queue::Blocked);
    h.kill();

    h.evaluator.init().unwrap();
    assert_eq!(h.evaluator.state(), EvalState::Init);
    assert_eq!(h.evaluator.live_contexts(), 0);
    assert_eq!(h.evaluator.global("x"), None);
    assert!(h.evaluator.launch(Value::Nil).is_ok());
}

#[test]
fn test_context_ids_are_unique_and_nonzero() {
    let h = Harness::running();
    h.evaluator.pause();
    h.wait_for_state(EvalState::Paused);
    let mut ids: Vec<Cid> = (0..50).map(|_| h.load("(recv)")).collect();
    assert!(ids.iter().all(|cid| cid.get() != 0));
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 50);
}

#[test]
fn test_context_limit_is_enforced() {
    let h = Harness::new(EvalConfig::default().with_max_contexts(2));
    h.load("(recv)");
    // done contexts hold their slot until removed
    let finished = h.load("1");
    h.wait_for_queue(finished, Queue::Done);
    assert_eq!(
        h.evaluator.launch(Value::Nil),
        Err(Error::TooManyContexts(2))
    );
    h.evaluator.remove_done(finished).unwrap();

    // a spawn that finds no free slot evaluates to nil
    assert_eq!(h.eval("(spawn (lambda () 1))"), "nil");
}

#[test]
fn test_bounded_mailbox_policies() {
    let h = Harness::new(
        EvalConfig::default().with_mailbox(MailboxPolicy::bounded(2, Overflow::Reject)),
    );
    let cid = h.load("(sleep 10)");
    h.wait_for_queue(cid, Queue::Blocked);
    h.evaluator.send(cid, Value::Int(1)).unwrap();
    h.evaluator.send(cid, Value::Int(2)).unwrap();
    assert_eq!(h.evaluator.send(cid, Value::Int(3)), Err(Error::MailboxFull(cid)));
    assert_eq!(h.eval("(send (self) 1) (send (self) 2) (send (self) 3)"), "nil");

    let h = Harness::new(
        EvalConfig::default().with_mailbox(MailboxPolicy::bounded(2, Overflow::DropOldest)),
    );
    assert_eq!(
        h.eval("(send (self) 1) (send (self) 2) (send (self) 3) (list (recv) (recv))"),
        "(2 3)"
    );
}

#[test]
fn test_load_and_define_then_eval_defined() {
    let h = Harness::running();
    let def = h
        .evaluator
        .load_and_define(
            &mut StringStream::new("(define base 40) (+ base 2)"),
            Kind::Program,
            "prog",
        )
        .unwrap();
    assert_eq!(
        h.evaluator.wait_timeout(def, TIMEOUT).map(|v| v.to_string()),
        Some("prog".into())
    );
    let run = h.evaluator.eval_defined("prog", Kind::Program).unwrap();
    assert_eq!(h.evaluator.wait_timeout(run, TIMEOUT), Some(Value::Int(42)));

    let def = h
        .evaluator
        .load_and_define(&mut StringStream::new("(* 3 3)"), Kind::Expression, "sq")
        .unwrap();
    h.evaluator.wait_timeout(def, TIMEOUT).unwrap();
    let run = h.evaluator.eval_defined("sq", Kind::Expression).unwrap();
    assert_eq!(h.evaluator.wait_timeout(run, TIMEOUT), Some(Value::Int(9)));
}

#[test]
fn test_globals_are_shared_with_the_host() {
    let h = Harness::running();
    h.evaluator.define_global("limit", Value::Int(5));
    assert_eq!(h.eval("(define doubled (* limit 2)) doubled"), "10");
    assert_eq!(h.evaluator.global("doubled"), Some(Value::Int(10)));
    assert_eq!(h.evaluator.global("never-defined"), None);
}

#[test]
fn test_extensions_from_lisp() {
    let h = Harness::running();
    assert_eq!(h.eval("(str-concat \"ctx-\" \"7\")"), "\"ctx-7\"");
    assert_eq!(h.eval("(str-match \"ctx-7\" \"^ctx-[0-9]+$\")"), "t");
    assert_eq!(h.eval("(pow 2 8)"), "256");
    assert_eq!(h.eval("(trap (sqrt -1))"), "(exit-error eval_error)");
}

#[test]
fn test_host_symbols_match_program_symbols() {
    let h = Harness::running();
    let cid = h.load("(recv (stop 'stopped) (_ 'other))");
    h.wait_for_queue(cid, Queue::Blocked);
    h.evaluator.send(cid, h.evaluator.symbol("stop")).unwrap();
    assert_eq!(
        h.evaluator.wait_timeout(cid, TIMEOUT).map(|v| v.to_string()),
        Some("stopped".into())
    );
}

#[test]
fn test_round_robin_is_fair() {
    let h = Harness::new(EvalConfig::default().with_timeslice(5));
    let spin = h.load("(define spin (lambda (n) (spin (+ n 1)))) (spin 0)");
    let quick = h.load(
        "(define count (lambda (n) (if (= n 0) 'finished (count (- n 1))))) (count 500)",
    );
    assert_eq!(
        h.evaluator.wait_timeout(quick, TIMEOUT).map(|v| v.to_string()),
        Some("finished".into())
    );
    assert_eq!(h.evaluator.queue_of(spin), Some(Queue::Ready));
}
