mod common;

use jobtree::group::{self, FailurePolicy, JobGroup};
use jobtree::{Error, Outcome};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Counts member computations that have not been dropped yet.
struct Live(Arc<AtomicUsize>);

impl Live {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Live(counter.clone())
    }
}

impl Drop for Live {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[test]
fn test_fail_fast_cancels_siblings_and_reports_failure() {
    let executor = common::executor(4);
    let live = Arc::new(AtomicUsize::new(0));

    let counter = live.clone();
    let started = Instant::now();
    let outcome = executor.execute(async move {
        let members = counter.clone();
        let result = group::fail_fast(|group| async move {
            for i in 0..10u32 {
                let live = Live::new(&members);
                group.add(async move {
                    let _live = live;
                    if i == 3 {
                        jobtree::sleep(Duration::from_millis(10)).await?;
                        return Err(Error::failed("member 3 failed"));
                    }
                    jobtree::sleep(Duration::from_secs(5)).await?;
                    Ok(i)
                });
            }
            group.collect().await
        })
        .await;

        Ok((result, counter.load(Ordering::SeqCst)))
    });

    let (result, live_after_scope) = outcome.completed().unwrap();
    let error = result.unwrap_err();
    assert_eq!(error.to_string(), "member 3 failed");
    assert_eq!(live_after_scope, 0, "no member may outlive the scope");
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn test_collect_all_sums_a_thousand_members() {
    let executor = common::executor(4);

    for _ in 0..3 {
        let outcome = executor.execute(async {
            group::collect_all(|group| async move {
                for i in 0..1000u64 {
                    group.add(async move {
                        jobtree::yield_now().await;
                        Ok(i)
                    });
                }
                Ok(group
                    .fold(0, |sum, outcome| sum + outcome.completed().unwrap_or(0))
                    .await)
            })
            .await
        });

        assert!(matches!(outcome, Outcome::Completed(499_500)));
    }
}

#[test]
fn test_collect_all_reports_every_outcome() {
    let executor = common::executor(2);

    let outcome = executor.execute(async {
        group::collect_all(|group| async move {
            for i in 0..6u32 {
                group.add(async move {
                    if i % 2 == 0 {
                        Ok(i)
                    } else {
                        Err(Error::failed(format!("odd {i}")))
                    }
                });
            }
            Ok(group.outcomes().await)
        })
        .await
    });

    let outcomes = outcome.completed().unwrap();
    assert_eq!(outcomes.len(), 6);
    assert_eq!(outcomes.iter().filter(|o| o.is_completed()).count(), 3);
    assert_eq!(outcomes.iter().filter(|o| o.is_failed()).count(), 3);
}

#[test]
fn test_results_arrive_in_completion_order() {
    let executor = common::executor(2);

    let outcome = executor.execute(async {
        group::collect_all(|group| async move {
            for (index, delay) in [(0u32, 150u64), (1, 90), (2, 30)] {
                group.add(async move {
                    jobtree::sleep(Duration::from_millis(delay)).await?;
                    Ok(index)
                });
            }

            let mut order = Vec::new();
            while let Some(outcome) = group.next().await {
                order.push(outcome.completed().unwrap());
            }
            Ok(order)
        })
        .await
    });

    assert!(matches!(outcome.completed().as_deref(), Some([2, 1, 0])));
}

#[test]
fn test_group_is_a_stream() {
    let executor = common::executor(2);

    let outcome = executor.execute(async {
        group::collect_all(|group: JobGroup<u32>| async move {
            for i in 0..5 {
                group.add(async move { Ok(i * 10) });
            }
            let outcomes: Vec<Outcome<u32>> = futures::StreamExt::collect(group.clone()).await;
            Ok(outcomes.into_iter().filter_map(Outcome::completed).sum::<u32>())
        })
        .await
    });

    assert!(matches!(outcome, Outcome::Completed(100)));
}

#[test]
fn test_cancel_all_on_collect_all_flags_new_members() {
    let executor = common::executor(2);
    let ran = Arc::new(AtomicBool::new(false));

    let flag = ran.clone();
    let outcome = executor.execute(async move {
        group::collect_all(|group| async move {
            group.add(async {
                jobtree::sleep(Duration::from_secs(5)).await?;
                Ok(false)
            });
            group.cancel_all();
            assert!(group.is_cancelling());

            group.add(async move {
                flag.store(true, Ordering::SeqCst);
                Ok(jobtree::is_cancelled())
            });

            Ok(group.outcomes().await)
        })
        .await
    });

    let outcomes = outcome.completed().unwrap();
    assert!(ran.load(Ordering::SeqCst), "collect-all members still run");
    assert!(outcomes.iter().any(|o| matches!(o, Outcome::Completed(true))));
    assert!(outcomes.iter().any(Outcome::is_cancelled));
}

#[test]
fn test_cancel_all_on_fail_fast_skips_new_members() {
    let executor = common::executor(2);
    let ran = Arc::new(AtomicBool::new(false));

    let flag = ran.clone();
    let outcome = executor.execute(async move {
        group::scope(FailurePolicy::FailFast, |group| async move {
            group.cancel_all();
            group.add(async move {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            });
            Ok(group.next().await)
        })
        .await
    });

    let member = outcome.completed().unwrap();
    assert!(matches!(member, Some(Outcome::Cancelled)));
    assert!(!ran.load(Ordering::SeqCst), "a skipped member never runs");
}

#[test]
fn test_scope_exit_cancels_outstanding_members() {
    let executor = common::executor(2);
    let live = Arc::new(AtomicUsize::new(0));

    let counter = live.clone();
    let started = Instant::now();
    let outcome = executor.execute(async move {
        group::collect_all(|group| async move {
            for _ in 0..8 {
                let live = Live::new(&counter);
                group.add(async move {
                    let _live = live;
                    jobtree::sleep(Duration::from_secs(30)).await
                });
            }
            Ok("left early")
        })
        .await
    });

    assert!(matches!(outcome, Outcome::Completed("left early")));
    assert_eq!(live.load(Ordering::SeqCst), 0);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn test_add_after_scope_exit_panics() {
    let executor = common::executor(1);
    let escaped: Arc<Mutex<Option<JobGroup<()>>>> = Arc::new(Mutex::new(None));

    let slot = escaped.clone();
    let outcome = executor.execute(async move {
        let inner = slot.clone();
        group::collect_all(|group: JobGroup<()>| async move {
            *inner.lock().unwrap() = Some(group);
            Ok(())
        })
        .await?;

        let group = slot.lock().unwrap().take().unwrap();
        group.add(async { Ok(()) });
        Ok(())
    });

    match outcome {
        Outcome::Failed(Error::Panicked(message)) => {
            assert!(message.contains("add() on a closed job group"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn test_member_adding_while_scope_exits_leaves_nothing_behind() {
    let executor = common::executor(4);

    for _ in 0..20 {
        let live = Arc::new(AtomicUsize::new(0));

        let counter = live.clone();
        let outcome = executor.execute(async move {
            let members = counter.clone();
            let result = group::collect_all(|group: JobGroup<()>| async move {
                let spawner = group.clone();
                group.add(async move {
                    // Ends when `add` panics on the closed group.
                    for _ in 0..100_000 {
                        let live = Live::new(&members);
                        spawner.add(async move {
                            let _live = live;
                            jobtree::sleep(Duration::from_secs(30)).await
                        });
                        jobtree::yield_now().await;
                    }
                    Ok(())
                });

                jobtree::sleep(Duration::from_millis(2)).await?;
                Ok(())
            })
            .await;

            Ok((result, counter.load(Ordering::SeqCst)))
        });

        let (result, live_after_scope) = outcome.completed().unwrap();
        assert!(result.is_ok());
        assert_eq!(live_after_scope, 0, "no member may outlive the scope");
    }
}
