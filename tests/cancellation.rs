mod common;

use jobtree::job::Lineage;
use jobtree::{Error, Handle, JoinHandle, Outcome, time};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

type Slot<T> = Arc<Mutex<Option<JoinHandle<T>>>>;

async fn wait_for<T: Send + 'static>(slot: &Slot<T>) -> JoinHandle<T> {
    loop {
        if let Some(handle) = slot.lock().unwrap().take() {
            return handle;
        }
        time::sleep(Duration::from_millis(1)).await;
    }
}

async fn park() -> Result<(), Error> {
    jobtree::sleep(Duration::from_secs(30)).await
}

#[test]
fn test_cancel_cascades_to_descendants_before_returning() {
    let executor = common::executor(2);

    let outcome = executor.execute(async {
        let slot: Slot<()> = Arc::new(Mutex::new(None));

        let grandchild_slot = slot.clone();
        let child = jobtree::spawn_child(async move {
            let grandchild = jobtree::spawn_child(park());
            *grandchild_slot.lock().unwrap() = Some(grandchild);
            park().await
        });
        let grandchild = wait_for(&slot).await;

        child.cancel();
        assert!(child.is_cancelled());
        assert!(grandchild.is_cancelled());
        assert!(!jobtree::is_cancelled(), "cancellation never flows upward");

        Ok((child.await, grandchild.await))
    });

    let (child, grandchild) = outcome.completed().unwrap();
    assert!(child.is_cancelled());
    assert!(grandchild.is_cancelled());
}

#[test]
fn test_detached_and_default_jobs_are_not_cancelled() {
    let executor = common::executor(2);
    let slot: Slot<&'static str> = Arc::new(Mutex::new(None));
    let other: Slot<&'static str> = Arc::new(Mutex::new(None));

    let (detached_slot, default_slot) = (slot.clone(), other.clone());
    let parent = executor.spawn(async move {
        let detached = jobtree::spawn_detached(async {
            jobtree::sleep(Duration::from_millis(50)).await?;
            Ok("detached")
        });
        let default = jobtree::spawn(async {
            jobtree::sleep(Duration::from_millis(50)).await?;
            Ok("default")
        });
        *detached_slot.lock().unwrap() = Some(detached);
        *default_slot.lock().unwrap() = Some(default);
        park().await
    });

    let outcome = executor.block_on(async move {
        let detached = wait_for(&slot).await;
        let default = wait_for(&other).await;
        assert_eq!(detached.lineage(), Lineage::Detached);
        assert_eq!(default.lineage(), Lineage::Inherited);

        parent.cancel();
        assert!(!detached.is_cancelled());
        assert!(!default.is_cancelled());

        (parent.await, detached.await, default.await)
    });

    assert!(outcome.0.is_cancelled());
    assert!(matches!(outcome.1, Outcome::Completed("detached")));
    assert!(matches!(outcome.2, Outcome::Completed("default")));
}

#[test]
fn test_aware_sleep_returns_promptly_on_cancel() {
    let executor = common::executor(2);

    let handle = executor.spawn(async {
        jobtree::sleep(Duration::from_secs(10)).await?;
        Ok(())
    });
    thread::sleep(Duration::from_millis(20));

    let started = Instant::now();
    handle.cancel();
    let outcome = futures::executor::block_on(handle);

    assert!(outcome.is_cancelled());
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[test]
fn test_unaware_async_wait_runs_to_completion() {
    let executor = common::executor(2);

    let started = Instant::now();
    let handle = executor.spawn(async {
        time::sleep(Duration::from_millis(300)).await;
        jobtree::check_cancelled()?;
        Ok(())
    });
    thread::sleep(Duration::from_millis(20));

    handle.cancel();
    let outcome = futures::executor::block_on(handle);

    assert!(outcome.is_cancelled());
    assert!(started.elapsed() >= Duration::from_millis(300));
}

#[test]
fn test_unaware_blocking_wait_runs_to_completion() {
    let executor = common::executor(2);

    let started = Instant::now();
    let handle = executor.spawn(async {
        thread::sleep(Duration::from_millis(300));
        Ok("done anyway")
    });
    thread::sleep(Duration::from_millis(20));

    handle.cancel();
    let outcome = futures::executor::block_on(handle);

    assert!(matches!(outcome, Outcome::Completed("done anyway")));
    assert!(started.elapsed() >= Duration::from_millis(300));
}

#[test]
fn test_cancel_is_idempotent_and_keeps_completed_results() {
    let executor = common::executor(1);

    let outcome = executor.execute(async {
        let finished = jobtree::spawn_child(async { Ok(5) });
        while !finished.is_finished() {
            jobtree::yield_now().await;
        }
        finished.cancel();
        finished.cancel();
        assert!(!finished.is_cancelled());

        let pending = jobtree::spawn_child(park());
        pending.cancel();
        pending.cancel();

        Ok((finished.await, pending.await))
    });

    let (finished, pending) = outcome.completed().unwrap();
    assert!(matches!(finished, Outcome::Completed(5)));
    assert!(pending.is_cancelled());
}

#[test]
fn test_failing_child_does_not_fail_its_parent() {
    let executor = common::executor(2);

    let ignored = executor.execute(async {
        let _child = jobtree::spawn_child(async { Err::<(), _>(Error::failed("child broke")) });
        jobtree::yield_now().await;
        Ok("parent fine")
    });
    assert!(matches!(ignored, Outcome::Completed("parent fine")));

    let observed = executor.execute(async {
        let child = jobtree::spawn_child(async { Err::<(), _>(Error::failed("child broke")) });
        Ok(child.await)
    });
    let child = observed.completed().unwrap();
    assert_eq!(child.failure().map(ToString::to_string).as_deref(), Some("child broke"));
}

#[test]
fn test_finished_parent_cancels_outstanding_children() {
    let executor = common::executor(2);

    for fails in [false, true] {
        let slot: Slot<()> = Arc::new(Mutex::new(None));
        let child_slot = slot.clone();

        let parent = executor.execute(async move {
            *child_slot.lock().unwrap() = Some(jobtree::spawn_child(park()));
            if fails {
                return Err(Error::failed("parent broke"));
            }
            Ok(())
        });
        assert_eq!(parent.is_failed(), fails);

        let child = slot.lock().unwrap().take().unwrap();
        assert!(child.is_cancelled());
        assert!(futures::executor::block_on(child).is_cancelled());
    }
}

#[test]
fn test_child_of_cancelled_job_starts_cancelled() {
    let executor = common::executor(1);

    let outcome = executor.execute(async {
        let me = jobtree::current_id().unwrap();
        assert!(Handle::current().cancel(me));
        assert!(jobtree::is_cancelled());

        let child = jobtree::spawn_child(async { Ok(()) });
        assert!(child.is_cancelled());
        child.await;

        Ok("returned normally")
    });

    assert!(matches!(outcome, Outcome::Completed("returned normally")));
}

#[test]
fn test_cancellable_interrupts_foreign_futures() {
    let executor = common::executor(1);

    let handle = executor.spawn(async {
        jobtree::cancellable(futures::future::pending::<()>()).await?;
        Ok(())
    });
    thread::sleep(Duration::from_millis(20));
    handle.cancel();

    assert!(futures::executor::block_on(handle).is_cancelled());
}

#[test]
fn test_completion_observes_cancellation_and_abandonment() {
    let executor = common::executor(1);

    let (completer, completion) = jobtree::io::completion::<u8>();
    let waiting = executor.spawn(completion);
    thread::sleep(Duration::from_millis(20));
    waiting.cancel();
    assert!(futures::executor::block_on(waiting).is_cancelled());
    assert!(completer.is_abandoned());

    let (completer, completion) = jobtree::io::completion::<u8>();
    let orphaned = executor.spawn(completion);
    drop(completer);
    let outcome = futures::executor::block_on(orphaned);
    assert!(matches!(outcome, Outcome::Failed(Error::Abandoned)));

    let (completer, completion) = jobtree::io::completion::<u8>();
    let delivered = executor.spawn(completion);
    thread::spawn(move || completer.complete(9));
    assert!(matches!(
        futures::executor::block_on(delivered),
        Outcome::Completed(9)
    ));
}

#[test]
fn test_descendants_are_flagged_before_their_ancestor() {
    let executor = common::executor(4);

    for _ in 0..50 {
        let slot: Slot<bool> = Arc::new(Mutex::new(None));
        let child_slot = slot.clone();

        let parent = executor.spawn(async move {
            let child = jobtree::spawn_child(async {
                let grandchild = jobtree::spawn_child(park());
                while !jobtree::is_cancelled() {
                    jobtree::yield_now().await;
                }
                Ok(grandchild.is_cancelled())
            });
            *child_slot.lock().unwrap() = Some(child);
            park().await
        });

        let child = loop {
            if let Some(child) = slot.lock().unwrap().take() {
                break child;
            }
            thread::sleep(Duration::from_millis(1));
        };
        parent.cancel();

        assert!(futures::executor::block_on(parent).is_cancelled());
        assert!(matches!(
            futures::executor::block_on(child),
            Outcome::Completed(true)
        ));
    }
}
