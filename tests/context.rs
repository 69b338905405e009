mod common;

use jobtree::context::{self, ContextKey, Snapshot};
use jobtree::{Error, Outcome};
use std::time::Duration;

static REQUEST_ID: ContextKey<u64> = ContextKey::new("request_id");
static USER: ContextKey<String> = ContextKey::new("user");

#[test]
fn test_with_binds_and_restores() {
    let executor = common::executor(2);

    let outcome = executor.execute(async {
        assert_eq!(REQUEST_ID.try_read(), None);

        let inside = context::with(&REQUEST_ID, 1, async {
            let outer = REQUEST_ID.read();
            let shadowed = context::with(&REQUEST_ID, 2, async {
                jobtree::yield_now().await;
                REQUEST_ID.read()
            })
            .await;
            (outer, shadowed, REQUEST_ID.read())
        })
        .await;

        Ok((inside, REQUEST_ID.try_read()))
    });

    let (inside, after) = outcome.completed().unwrap();
    assert_eq!(inside, (1, 2, 1));
    assert_eq!(after, None);
}

#[test]
fn test_binding_is_restored_after_error() {
    let executor = common::executor(1);

    let outcome = executor.execute(async {
        let failed: Result<(), Error> = USER
            .scope("alice".to_string(), async {
                assert_eq!(USER.read(), "alice");
                Err(Error::failed("request rejected"))
            })
            .await;

        assert!(failed.is_err());
        Ok(USER.try_read())
    });

    assert!(matches!(outcome, Outcome::Completed(None)));
}

#[test]
fn test_context_follows_job_across_workers() {
    let executor = common::executor(4);

    let outcome = executor.execute(async {
        context::with(&REQUEST_ID, 99, async {
            for _ in 0..20 {
                jobtree::sleep(Duration::from_millis(1)).await?;
                assert_eq!(REQUEST_ID.read(), 99);
            }
            Ok::<_, Error>(REQUEST_ID.read())
        })
        .await
    });

    assert!(matches!(outcome, Outcome::Completed(99)));
}

#[test]
fn test_jobs_capture_context_at_creation() {
    let executor = common::executor(2);

    let outcome = executor.execute(async {
        let (child, default) = context::with(&REQUEST_ID, 7, async {
            let child = jobtree::spawn_child(async {
                jobtree::sleep(Duration::from_millis(20)).await?;
                Ok(REQUEST_ID.read())
            });
            let default = jobtree::spawn(async {
                jobtree::sleep(Duration::from_millis(20)).await?;
                Ok(REQUEST_ID.read())
            });
            (child, default)
        })
        .await;

        assert_eq!(REQUEST_ID.try_read(), None);
        Ok((child.await, default.await))
    });

    let (child, default) = outcome.completed().unwrap();
    assert!(matches!(child, Outcome::Completed(7)));
    assert!(matches!(default, Outcome::Completed(7)));
}

#[test]
fn test_detached_jobs_start_from_empty_context() {
    let executor = common::executor(2);

    let outcome = executor.execute(async {
        let detached = context::with(&REQUEST_ID, 7, async {
            jobtree::spawn_detached(async { Ok(Snapshot::current().is_empty()) })
        })
        .await;

        Ok(detached.await)
    });

    assert!(matches!(
        outcome.completed(),
        Some(Outcome::Completed(true))
    ));
}

#[test]
fn test_reading_unbound_key_fails_the_job() {
    let executor = common::executor(1);

    let outcome = executor.execute(async { Ok(USER.read()) });

    match outcome {
        Outcome::Failed(Error::Panicked(message)) => {
            assert!(message.contains("context key `user` is not bound"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}
