mod common;

use jobtree::actor::Actor;
use jobtree::{Error, Outcome};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

#[test]
fn test_concurrent_increments_and_decrements_cancel_out() {
    let executor = common::executor(4);
    let actor = Actor::new_in(&executor.handle(), 100i64);

    for _ in 0..5 {
        let counter = actor.clone();
        let outcome = executor.execute(async move {
            let increments: Vec<_> = (0..1000)
                .map(|_| {
                    let counter = counter.clone();
                    jobtree::spawn_child(async move { Ok(counter.invoke(|n| *n += 1).await) })
                })
                .collect();
            for handle in increments {
                handle.await.into_result()?;
            }

            let decrements: Vec<_> = (0..1000)
                .map(|_| {
                    let counter = counter.clone();
                    jobtree::spawn_child(async move { Ok(counter.invoke(|n| *n -= 1).await) })
                })
                .collect();
            for handle in decrements {
                handle.await.into_result()?;
            }

            Ok(counter.invoke(|n| *n).await)
        });

        assert!(matches!(outcome, Outcome::Completed(100)));
    }
}

#[test]
fn test_bodies_never_overlap() {
    let executor = common::executor(4);
    let actor = Actor::new_in(&executor.handle(), Vec::<usize>::new());
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let (active_in, peak_in) = (active.clone(), peak.clone());
    let outcome = executor.execute(async move {
        let callers: Vec<_> = (0..200)
            .map(|i| {
                let actor = actor.clone();
                let active = active_in.clone();
                let peak = peak_in.clone();
                jobtree::spawn_child(async move {
                    actor
                        .invoke(move |log| {
                            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            log.push(i);
                            thread::sleep(Duration::from_micros(50));
                            active.fetch_sub(1, Ordering::SeqCst);
                        })
                        .await;
                    Ok(())
                })
            })
            .collect();
        for caller in callers {
            caller.await.into_result()?;
        }

        Ok(actor.invoke(|log| log.len()).await)
    });

    assert!(matches!(outcome, Outcome::Completed(200)));
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

#[test]
fn test_invocations_run_in_arrival_order_and_nested_calls_queue_last() {
    let executor = common::executor(2);
    let actor = Actor::new_in(&executor.handle(), Vec::<&'static str>::new());
    let (release, gate) = mpsc::channel::<()>();

    let nested = actor.clone();
    let first = actor.invoke(move |log| {
        gate.recv().unwrap();
        log.push("A");
        drop(nested.invoke(|log| log.push("N")));
    });
    let second = actor.invoke(|log| log.push("B"));
    let third = actor.invoke(|log| log.push("C"));
    release.send(()).unwrap();

    futures::executor::block_on(async {
        first.await;
        second.await;
        third.await;
    });
    let log = futures::executor::block_on(actor.shutdown());

    assert_eq!(log, vec!["A", "B", "C", "N"]);
}

#[test]
fn test_async_bodies_keep_exclusive_access_across_suspension() {
    let executor = common::executor(4);
    let actor = Actor::new_in(&executor.handle(), 0u32);

    let outcome = executor.execute(async move {
        let writers: Vec<_> = (0..50)
            .map(|_| {
                let actor = actor.clone();
                jobtree::spawn_child(async move {
                    let seen = actor
                        .invoke_async(|n: &mut u32| {
                            Box::pin(async move {
                                let before = *n;
                                jobtree::yield_now().await;
                                *n = before + 1;
                                before
                            })
                        })
                        .await;
                    Ok(seen)
                })
            })
            .collect();
        for writer in writers {
            writer.await.into_result()?;
        }

        Ok(actor.invoke(|n| *n).await)
    });

    assert!(matches!(outcome, Outcome::Completed(50)));
}

#[test]
fn test_panicking_body_resumes_in_caller_and_actor_survives() {
    let executor = common::executor(2);
    let actor = Actor::new_in(&executor.handle(), 1u8);

    let handle = actor.clone();
    let outcome = executor.execute(async move {
        handle
            .invoke(|_| {
                if true {
                    panic!("body exploded");
                }
            })
            .await;
        Ok(())
    });

    match outcome {
        Outcome::Failed(Error::Panicked(message)) => assert_eq!(message, "body exploded"),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(futures::executor::block_on(actor.invoke(|n| *n + 1)), 2);
}

#[test]
fn test_shutdown_returns_state_and_closes() {
    let executor = common::executor(2);
    let actor = Actor::new_in(&executor.handle(), String::from("log:"));

    drop(actor.invoke(|s| s.push_str(" one")));
    drop(actor.invoke(|s| s.push_str(" two")));
    let state = futures::executor::block_on(actor.shutdown());

    assert_eq!(state, "log: one two");
    assert!(actor.is_closed());
    assert_eq!(actor.pending(), 0);
}

#[test]
#[should_panic(expected = "invoke on a closed actor")]
fn test_invoke_after_shutdown_panics() {
    let executor = common::executor(1);
    let actor = Actor::new_in(&executor.handle(), ());

    futures::executor::block_on(actor.shutdown());
    drop(actor.invoke(|_| ()));
}

#[test]
fn test_actor_created_inside_a_job_uses_current_executor() {
    let executor = common::executor(2);

    let outcome = executor.execute(async {
        let actor = Actor::new(vec![1, 2, 3]);
        actor.invoke(|v| v.push(4)).await;
        Ok(actor.shutdown().await)
    });

    assert!(matches!(outcome.completed().as_deref(), Some([1, 2, 3, 4])));
}
