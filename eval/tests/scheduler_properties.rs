//! Queue membership properties under random host operations

use std::collections::HashMap;
use std::thread;
use std::time::{Duration, Instant};

use lbm_eval::{Callbacks, Cid, Context, EvalConfig, EvalState, Evaluator, Kind, Queue, StringStream, Value};
use proptest::prelude::*;

const PROGRAMS: &[&str] = &[
    "(+ 1 2)",
    "(recv)",
    "(recv ((ping (? n)) n))",
    "(define spin (lambda (n) (spin (+ n 1)))) (spin 0)",
    "(send (self) 'me) (recv)",
    "(car 1)",
    "(spawn (lambda () 'child))",
];

#[derive(Debug, Clone)]
enum Op {
    Launch(usize),
    Send(usize, i64),
    Step,
    Remove(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..PROGRAMS.len()).prop_map(Op::Launch),
        (0usize..16, any::<i64>()).prop_map(|(i, n)| Op::Send(i, n)),
        Just(Op::Step),
        (0usize..16).prop_map(Op::Remove),
    ]
}

fn wait_for_state(evaluator: &Evaluator, state: EvalState) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while evaluator.state() != state {
        assert!(Instant::now() < deadline, "evaluator never reached {}", state);
        thread::sleep(Duration::from_micros(200));
    }
}

/// Queue of every context, with a count of how many queues list it
fn membership(evaluator: &Evaluator) -> HashMap<Cid, (Queue, usize)> {
    let mut seen: HashMap<Cid, (Queue, usize)> = HashMap::new();
    for queue in [Queue::Ready, Queue::Blocked, Queue::Done] {
        evaluator.for_each(queue, |ctx: &Context| {
            seen.entry(ctx.id()).or_insert((queue, 0)).1 += 1;
        });
    }
    seen
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn every_context_is_in_exactly_one_queue(ops in prop::collection::vec(op(), 1..40)) {
        let evaluator = Evaluator::new(EvalConfig::default());
        evaluator.set_callbacks(Callbacks::host());
        let handle = evaluator.start().unwrap();
        wait_for_state(&evaluator, EvalState::Running);
        evaluator.pause();
        wait_for_state(&evaluator, EvalState::Paused);

        let mut launched: Vec<Cid> = Vec::new();
        let mut removed: Vec<Cid> = Vec::new();
        for op in ops {
            match op {
                Op::Launch(i) => {
                    let cid = evaluator
                        .load_and_eval(&mut StringStream::new(PROGRAMS[i]), Kind::Program)
                        .unwrap();
                    prop_assert!(!launched.contains(&cid));
                    launched.push(cid);
                }
                Op::Send(i, n) => {
                    if let Some(&cid) = launched.get(i) {
                        let msg = Value::list([evaluator.symbol("ping"), Value::Int(n)]);
                        let expected_ok = matches!(
                            evaluator.queue_of(cid),
                            Some(Queue::Ready) | Some(Queue::Blocked)
                        );
                        prop_assert_eq!(evaluator.send(cid, msg).is_ok(), expected_ok);
                    }
                }
                Op::Step => {
                    evaluator.step();
                    wait_for_state(&evaluator, EvalState::Paused);
                }
                Op::Remove(i) => {
                    if let Some(&cid) = launched.get(i) {
                        let was_done = evaluator.queue_of(cid) == Some(Queue::Done);
                        prop_assert_eq!(evaluator.remove_done(cid).is_some(), was_done);
                        if was_done {
                            removed.push(cid);
                        }
                    }
                }
            }

            let seen = membership(&evaluator);
            for cid in &launched {
                prop_assert_ne!(cid.get(), 0);
                if removed.contains(cid) {
                    prop_assert!(!seen.contains_key(cid));
                } else {
                    let (queue, count) = seen.get(cid).copied().unwrap_or((Queue::Done, 0));
                    prop_assert_eq!(count, 1, "context {} listed {} times", cid, count);
                    prop_assert_eq!(evaluator.queue_of(*cid), Some(queue));
                }
            }
        }

        let before = membership(&evaluator);
        evaluator.kill();
        handle.join().unwrap();
        evaluator.step();
        evaluator.resume();
        if let Some(&cid) = launched.first() {
            prop_assert!(evaluator.send(cid, Value::Nil).is_err());
        }
        prop_assert_eq!(membership(&evaluator), before);
        prop_assert_eq!(evaluator.state(), EvalState::Kill);
    }
}
