#![cfg(feature = "sqlite")]

use futures_util::FutureExt;
use sqlx::{Connection, Sqlite, SqliteConnection};
use sqlx_atomic::savepointer::{MockSavepointer, Savepointer};
use sqlx_atomic::{atomic, AtomicError, Error, Level, Querier, Scope, TxOptions, WorkFuture};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const BROKEN: &str = "NOT VALID SQL";

/// Wraps the mock so selected statements come out as invalid SQL.
#[derive(Debug, Clone, Default)]
struct Faulty {
    inner: MockSavepointer,
    create: bool,
    rollback: bool,
    release: bool,
}

impl Savepointer for Faulty {
    fn create(&self, name: &str) -> String {
        let stmt = self.inner.create(name);
        if self.create {
            BROKEN.to_string()
        } else {
            stmt
        }
    }

    fn rollback(&self, name: &str) -> String {
        let stmt = self.inner.rollback(name);
        if self.rollback {
            BROKEN.to_string()
        } else {
            stmt
        }
    }

    fn release(&self, name: &str) -> String {
        let stmt = self.inner.release(name);
        if self.release {
            BROKEN.to_string()
        } else {
            stmt
        }
    }
}

async fn setup() -> SqliteConnection {
    let mut conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
    sqlx::query("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
        .execute(&mut conn)
        .await
        .unwrap();
    conn
}

async fn names(conn: &mut SqliteConnection) -> Vec<String> {
    sqlx::query_scalar::<Sqlite, String>("SELECT name FROM items ORDER BY id")
        .fetch_all(&mut *conn)
        .await
        .unwrap()
}

/// Fails if a transaction was left open on `conn`.
async fn assert_no_open_transaction(conn: &mut SqliteConnection) {
    sqlx::query("BEGIN").execute(&mut *conn).await.unwrap();
    sqlx::query("ROLLBACK").execute(&mut *conn).await.unwrap();
}

fn querier<'c>(conn: &'c mut SqliteConnection, sp: impl Savepointer + 'static) -> Querier<'c, Sqlite> {
    Querier::<Sqlite>::builder()
        .connection(conn)
        .savepointer(sp)
        .build()
        .unwrap()
}

async fn insert(q: &mut Querier<'_, Sqlite>, name: &'static str) -> sqlx_atomic::Result<()> {
    q.execute(sqlx::query("INSERT INTO items (name) VALUES (?)").bind(name))
        .await?;
    Ok(())
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> Option<&str> {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
}

fn noop<'a>(_: &'a mut Querier<'_, Sqlite>) -> WorkFuture<'a, (), Error> {
    Box::pin(async { Ok(()) })
}

/// Panics before returning a future.
fn explode<'a>(_: &'a mut Querier<'_, Sqlite>) -> WorkFuture<'a, (), Error> {
    panic!("boom")
}

type NoWork = for<'a, 'q> fn(&'a mut Querier<'q, Sqlite>) -> WorkFuture<'a, (), Error>;

#[tokio::test]
async fn test_root_success_commits() {
    let mut conn = setup().await;
    let sp = MockSavepointer::new(true);
    let mut q = querier(&mut conn, sp.clone());

    let res = q
        .atomic(|tx| {
            Box::pin(async move {
                insert(tx, "a").await?;
                Ok::<_, Error>(())
            })
        })
        .await;
    assert!(res.is_ok());
    drop(q);

    assert!(sp.statements().is_empty());
    assert_eq!(names(&mut conn).await, vec!["a"]);
    assert_no_open_transaction(&mut conn).await;
}

#[tokio::test]
async fn test_work_value_is_returned() {
    let mut conn = setup().await;
    let mut q = Querier::<Sqlite>::new(&mut conn);

    let count = q
        .atomic(|tx| {
            Box::pin(async move {
                insert(tx, "a").await?;
                insert(tx, "b").await?;
                let rows = tx.fetch_all("SELECT id FROM items").await?;
                Ok::<_, Error>(rows.len())
            })
        })
        .await
        .unwrap();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn test_root_failure_rolls_back() {
    let mut conn = setup().await;
    let sp = MockSavepointer::new(true);
    let mut q = querier(&mut conn, sp.clone());

    let err = q
        .atomic(|tx| {
            Box::pin(async move {
                insert(tx, "a").await?;
                tx.execute("SELECT * FROM missing").await?;
                Ok::<_, Error>(())
            })
        })
        .await
        .unwrap_err();
    assert!(matches!(err.err, Some(Error::Database(_))));
    assert!(err.atomic.is_none());
    drop(q);

    assert!(sp.statements().is_empty());
    assert!(names(&mut conn).await.is_empty());
    assert_no_open_transaction(&mut conn).await;
}

#[tokio::test]
async fn test_inner_failure_rolls_back_to_savepoint_and_outer_commits() {
    let mut conn = setup().await;
    let sp = MockSavepointer::new(false);
    let mut q = querier(&mut conn, sp.clone());

    let res = q
        .atomic(|tx| {
            Box::pin(async move {
                insert(tx, "outer").await?;
                let inner = tx
                    .atomic(|sp| {
                        Box::pin(async move {
                            insert(sp, "inner").await?;
                            sp.execute("SELECT * FROM missing").await?;
                            Ok::<_, Error>(())
                        })
                    })
                    .await;
                let inner = inner.unwrap_err();
                assert!(matches!(inner.err, Some(Error::Database(_))));
                assert!(inner.atomic.is_none());
                Ok::<_, Error>(())
            })
        })
        .await;
    assert!(res.is_ok());
    drop(q);

    assert_eq!(sp.statements(), vec!["SAVEPOINT sp_1;", "ROLLBACK TO sp_1;"]);
    assert_eq!(names(&mut conn).await, vec!["outer"]);
    assert_no_open_transaction(&mut conn).await;
}

#[tokio::test]
async fn test_inner_success_releases_savepoint() {
    let mut conn = setup().await;
    let sp = MockSavepointer::new(true);
    let mut q = querier(&mut conn, sp.clone());

    q.atomic(|tx| {
        Box::pin(async move {
            insert(tx, "outer").await?;
            tx.atomic(|sp| {
                Box::pin(async move {
                    insert(sp, "inner").await?;
                    Ok::<_, Error>(())
                })
            })
            .await?;
            Ok::<_, Error>(())
        })
    })
    .await
    .unwrap();
    drop(q);

    assert_eq!(sp.statements(), vec!["SAVEPOINT sp_1;", "RELEASE sp_1;"]);
    assert_eq!(names(&mut conn).await, vec!["outer", "inner"]);
}

#[tokio::test]
async fn test_release_skipped_when_dialect_cannot_release() {
    let mut conn = setup().await;
    let sp = MockSavepointer::new(false);
    let mut q = querier(&mut conn, sp.clone());

    q.atomic(|tx| {
        Box::pin(async move {
            tx.atomic(|sp| {
                Box::pin(async move {
                    insert(sp, "inner").await?;
                    Ok::<_, Error>(())
                })
            })
            .await?;
            Ok::<_, Error>(())
        })
    })
    .await
    .unwrap();
    drop(q);

    assert_eq!(sp.statements(), vec!["SAVEPOINT sp_1;"]);
    assert_eq!(names(&mut conn).await, vec!["inner"]);
}

#[tokio::test]
async fn test_create_savepoint_failure_skips_work_and_outer_commits() {
    let mut conn = setup().await;
    let sp = Faulty {
        create: true,
        ..Faulty::default()
    };
    let recorded = sp.inner.clone();
    let mut q = querier(&mut conn, sp);
    let invoked = Arc::new(AtomicBool::new(false));

    let flag = Arc::clone(&invoked);
    q.atomic(move |tx| {
        Box::pin(async move {
            insert(tx, "outer").await?;
            let inner = tx
                .atomic(move |sp| {
                    Box::pin(async move {
                        flag.store(true, Ordering::SeqCst);
                        insert(sp, "inner").await?;
                        Ok::<_, Error>(())
                    })
                })
                .await
                .unwrap_err();
            assert!(inner.err.is_none());
            assert!(matches!(inner.atomic, Some(Error::Database(_))));
            Ok::<_, Error>(())
        })
    })
    .await
    .unwrap();
    drop(q);

    assert!(!invoked.load(Ordering::SeqCst));
    assert_eq!(recorded.statements(), vec!["SAVEPOINT sp_1;"]);
    assert_eq!(names(&mut conn).await, vec!["outer"]);
}

#[tokio::test]
async fn test_rollback_failure_is_reported_with_work_error() {
    let mut conn = setup().await;
    let sp = Faulty {
        rollback: true,
        ..Faulty::default()
    };
    let mut q = querier(&mut conn, sp);

    q.atomic(|tx| {
        Box::pin(async move {
            let inner = tx
                .atomic(|sp| {
                    Box::pin(async move {
                        sp.execute("SELECT * FROM missing").await?;
                        Ok::<_, Error>(())
                    })
                })
                .await
                .unwrap_err();
            assert!(matches!(inner.err, Some(Error::Database(_))));
            assert!(matches!(inner.atomic, Some(Error::Database(_))));
            assert!(inner.to_string().starts_with("Err: \"Database error: "));
            assert!(inner.to_string().contains(" Atomic: \"Database error: "));
            Ok::<_, Error>(())
        })
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_release_failure_is_the_only_error() {
    let mut conn = setup().await;
    let sp = Faulty {
        release: true,
        ..Faulty::default()
    };
    let mut q = querier(&mut conn, sp);

    q.atomic(|tx| {
        Box::pin(async move {
            let inner: AtomicError<Error> = tx
                .atomic(|sp| {
                    Box::pin(async move {
                        insert(sp, "inner").await?;
                        Ok::<_, Error>(())
                    })
                })
                .await
                .unwrap_err();
            assert!(inner.err.is_none());
            assert!(matches!(inner.atomic, Some(Error::Database(_))));
            Ok::<_, Error>(())
        })
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_commit_failure_is_reported() {
    let mut conn = setup().await;
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&mut conn)
        .await
        .unwrap();
    sqlx::query("CREATE TABLE parents (id INTEGER PRIMARY KEY)")
        .execute(&mut conn)
        .await
        .unwrap();
    sqlx::query(
        "CREATE TABLE children (id INTEGER PRIMARY KEY, \
         parent_id INTEGER NOT NULL REFERENCES parents(id) DEFERRABLE INITIALLY DEFERRED)",
    )
    .execute(&mut conn)
    .await
    .unwrap();
    let mut q = Querier::<Sqlite>::new(&mut conn);

    let err = q
        .atomic(|tx| {
            Box::pin(async move {
                // The deferred constraint only fires at COMMIT.
                tx.execute("INSERT INTO children (parent_id) VALUES (99)")
                    .await?;
                Ok::<_, Error>(())
            })
        })
        .await
        .unwrap_err();
    assert!(err.err.is_none());
    assert!(matches!(err.atomic, Some(Error::Database(_))));
}

#[tokio::test]
async fn test_errors_propagate_through_ancestors_until_swallowed() {
    let mut conn = setup().await;
    let sp = MockSavepointer::new(true);
    let mut q = querier(&mut conn, sp.clone());

    q.atomic(|tx| {
        Box::pin(async move {
            insert(tx, "root").await?;
            let middle = tx
                .atomic(|middle| {
                    Box::pin(async move {
                        insert(middle, "middle").await?;
                        middle
                            .atomic(|inner| {
                                Box::pin(async move {
                                    insert(inner, "inner").await?;
                                    inner.execute("SELECT * FROM missing").await?;
                                    Ok::<_, Error>(())
                                })
                            })
                            .await?;
                        Ok::<_, Error>(())
                    })
                })
                .await
                .unwrap_err();
            assert!(matches!(middle.err, Some(Error::Nested(_))));
            assert!(middle.atomic.is_none());
            Ok::<_, Error>(())
        })
    })
    .await
    .unwrap();
    drop(q);

    assert_eq!(
        sp.statements(),
        vec![
            "SAVEPOINT sp_1;",
            "SAVEPOINT sp_2;",
            "ROLLBACK TO sp_2;",
            "ROLLBACK TO sp_1;",
        ]
    );
    assert_eq!(names(&mut conn).await, vec!["root"]);
}

#[tokio::test]
async fn test_sibling_and_deep_savepoints() {
    let mut conn = setup().await;
    let sp = MockSavepointer::new(true);
    let mut q = querier(&mut conn, sp.clone());

    q.atomic(|tx| {
        Box::pin(async move {
            assert_eq!(tx.level(), &Level::Transaction);
            insert(tx, "1").await?;

            let res = tx
                .atomic(|sp| {
                    Box::pin(async move {
                        sp.execute("SELECT * FROM missing").await?;
                        Ok::<_, Error>(())
                    })
                })
                .await;
            assert!(res.is_err());

            tx.atomic(|sp| {
                Box::pin(async move {
                    assert_eq!(sp.level().depth(), Some(1));
                    insert(sp, "3").await?;
                    Ok::<_, Error>(())
                })
            })
            .await?;

            tx.atomic(|sp3| {
                Box::pin(async move {
                    insert(sp3, "4").await?;
                    sp3.atomic(|sp4| {
                        Box::pin(async move {
                            assert_eq!(sp4.level().depth(), Some(2));
                            insert(sp4, "5").await?;
                            let res = sp4
                                .atomic(|sp5| {
                                    Box::pin(async move {
                                        assert_eq!(sp5.level().depth(), Some(3));
                                        insert(sp5, "6").await?;
                                        sp5.execute("SELECT * FROM missing").await?;
                                        Ok::<_, Error>(())
                                    })
                                })
                                .await;
                            assert!(res.unwrap_err().is_callback());
                            Ok::<_, Error>(())
                        })
                    })
                    .await?;
                    Ok::<_, Error>(())
                })
            })
            .await?;
            Ok::<_, Error>(())
        })
    })
    .await
    .unwrap();
    drop(q);

    assert_eq!(
        sp.statements(),
        vec![
            "SAVEPOINT sp_1;",
            "ROLLBACK TO sp_1;",
            "SAVEPOINT sp_2;",
            "RELEASE sp_2;",
            "SAVEPOINT sp_3;",
            "SAVEPOINT sp_4;",
            "SAVEPOINT sp_5;",
            "ROLLBACK TO sp_5;",
            "RELEASE sp_4;",
            "RELEASE sp_3;",
        ]
    );
    assert_eq!(names(&mut conn).await, vec!["1", "3", "4", "5"]);
    assert_no_open_transaction(&mut conn).await;
}

#[tokio::test]
async fn test_root_panic_rolls_back_and_is_reraised() {
    let mut conn = setup().await;
    let mut q = Querier::<Sqlite>::new(&mut conn);

    let res = AssertUnwindSafe(q.atomic(|tx| {
        Box::pin(async move {
            insert(tx, "a").await?;
            if tx.in_transaction() {
                panic!("whoa!");
            }
            Ok::<_, Error>(())
        })
    }))
    .catch_unwind()
    .await;
    let payload = res.unwrap_err();
    assert_eq!(panic_message(&*payload), Some("whoa!"));
    drop(q);

    assert!(names(&mut conn).await.is_empty());
    assert_no_open_transaction(&mut conn).await;
}

#[tokio::test]
async fn test_nested_panic_rolls_back_every_level_once() {
    let mut conn = setup().await;
    let sp = MockSavepointer::new(true);
    let mut q = querier(&mut conn, sp.clone());

    let res = AssertUnwindSafe(q.atomic(|tx| {
        Box::pin(async move {
            insert(tx, "outer").await?;
            tx.atomic(|sp| {
                Box::pin(async move {
                    insert(sp, "inner").await?;
                    if sp.in_transaction() {
                        panic!("boom");
                    }
                    Ok::<_, Error>(())
                })
            })
            .await?;
            Ok::<_, Error>(())
        })
    }))
    .catch_unwind()
    .await;
    let payload = res.unwrap_err();
    assert_eq!(panic_message(&*payload), Some("boom"));
    drop(q);

    assert_eq!(sp.statements(), vec!["SAVEPOINT sp_1;", "ROLLBACK TO sp_1;"]);
    assert!(names(&mut conn).await.is_empty());
    assert_no_open_transaction(&mut conn).await;
}

#[tokio::test]
async fn test_panic_while_building_the_work_rolls_back() {
    let mut conn = setup().await;
    let sp = MockSavepointer::new(true);
    let mut q = querier(&mut conn, sp.clone());

    let res = AssertUnwindSafe(q.atomic(|tx| {
        Box::pin(async move {
            insert(tx, "outer").await?;
            tx.atomic(explode).await?;
            Ok::<_, Error>(())
        })
    }))
    .catch_unwind()
    .await;
    let payload = res.unwrap_err();
    assert_eq!(panic_message(&*payload), Some("boom"));
    drop(q);

    assert_eq!(sp.statements(), vec!["SAVEPOINT sp_1;", "ROLLBACK TO sp_1;"]);
    assert!(names(&mut conn).await.is_empty());
    assert_no_open_transaction(&mut conn).await;
}

#[tokio::test]
async fn test_root_panic_while_building_the_work_is_reraised() {
    let mut conn = setup().await;
    let mut q = Querier::<Sqlite>::new(&mut conn);

    let res = AssertUnwindSafe(q.atomic(explode)).catch_unwind().await;
    let payload = res.unwrap_err();
    assert_eq!(panic_message(&*payload), Some("boom"));
    drop(q);

    assert_no_open_transaction(&mut conn).await;
}

#[tokio::test]
async fn test_panic_is_reraised_when_rollback_fails() {
    let mut conn = setup().await;
    let sp = Faulty {
        rollback: true,
        ..Faulty::default()
    };
    let recorded = sp.inner.clone();
    let mut q = querier(&mut conn, sp);

    let res = AssertUnwindSafe(q.atomic(|tx| {
        Box::pin(async move {
            tx.atomic(|sp| {
                Box::pin(async move {
                    if sp.in_transaction() {
                        panic!("boom");
                    }
                    Ok::<_, Error>(())
                })
            })
            .await?;
            Ok::<_, Error>(())
        })
    }))
    .catch_unwind()
    .await;
    let payload = res.unwrap_err();
    assert_eq!(panic_message(&*payload), Some("boom"));
    drop(q);

    assert_eq!(recorded.statements(), vec!["SAVEPOINT sp_1;", "ROLLBACK TO sp_1;"]);
    assert_no_open_transaction(&mut conn).await;
}

#[tokio::test]
async fn test_default_dialect_savepoints_run_on_sqlite() {
    let mut conn = setup().await;
    let mut q = Querier::<Sqlite>::new(&mut conn);

    q.atomic(|tx| {
        Box::pin(async move {
            insert(tx, "kept").await?;
            let res = tx
                .atomic(|sp| {
                    Box::pin(async move {
                        let name = sp.savepoint_name().map(str::len);
                        assert_eq!(name, Some(22));
                        insert(sp, "dropped").await?;
                        sp.execute("SELECT * FROM missing").await?;
                        Ok::<_, Error>(())
                    })
                })
                .await;
            assert!(res.is_err());
            tx.atomic(|sp| {
                Box::pin(async move {
                    insert(sp, "released").await?;
                    Ok::<_, Error>(())
                })
            })
            .await?;
            Ok::<_, Error>(())
        })
    })
    .await
    .unwrap();
    drop(q);

    assert_eq!(names(&mut conn).await, vec!["kept", "released"]);
}

#[tokio::test]
async fn test_nil_querier() {
    let res = atomic(None, Some(noop)).await;
    let err = res.unwrap_err();
    assert!(err.err.is_none());
    assert!(matches!(err.atomic, Some(Error::NilQuerier)));
}

#[tokio::test]
async fn test_absent_work_is_a_no_op() {
    let mut conn = setup().await;
    let sp = MockSavepointer::new(true);
    let mut q = querier(&mut conn, sp.clone());

    let res = atomic(Some(&mut q), None::<NoWork>).await;
    assert!(matches!(res, Ok(None)));

    let res = q
        .atomic(|tx| {
            Box::pin(async move {
                let nested = atomic(Some(tx), None::<NoWork>).await;
                assert!(matches!(nested, Ok(None)));
                Ok::<_, Error>(())
            })
        })
        .await;
    assert!(res.is_ok());
    drop(q);

    assert!(sp.statements().is_empty());
    assert_no_open_transaction(&mut conn).await;
}

#[tokio::test]
async fn test_atomic_with_work_fn() {
    let mut conn = setup().await;
    let mut q = Querier::<Sqlite>::new(&mut conn);
    let res = atomic(Some(&mut q), Some(noop)).await;
    assert!(matches!(res, Ok(Some(()))));
}

#[tokio::test]
async fn test_detached_querier_is_invalid() {
    let mut conn = setup().await;
    let mut q = Querier::<Sqlite>::new(&mut conn);
    assert!(q.detach().is_some());

    let err = atomic(Some(&mut q), None::<NoWork>).await.unwrap_err();
    assert!(matches!(err.atomic, Some(Error::InvalidQuerier)));

    let invoked = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&invoked);
    let err = q
        .atomic(move |_| {
            Box::pin(async move {
                flag.store(true, Ordering::SeqCst);
                Ok::<_, Error>(())
            })
        })
        .await
        .unwrap_err();
    assert!(err.err.is_none());
    assert!(matches!(err.atomic, Some(Error::InvalidQuerier)));
    assert!(!invoked.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_cancelled_scope_fails_later_statements() {
    let mut conn = setup().await;
    let mut q = Querier::<Sqlite>::builder()
        .connection(&mut conn)
        .scope(Scope::new())
        .build()
        .unwrap();

    let err = q
        .atomic(|tx| {
            Box::pin(async move {
                insert(tx, "a").await?;
                tx.scope().cancel();
                insert(tx, "b").await?;
                Ok::<_, Error>(())
            })
        })
        .await
        .unwrap_err();
    assert!(matches!(err.err, Some(Error::Cancelled)));
    assert!(matches!(err.atomic, Some(Error::Cancelled)));
    assert!(q.scope().is_cancelled());
    drop(q);

    // The dropped transaction is rolled back before the next statement.
    assert!(names(&mut conn).await.is_empty());
}

#[tokio::test]
async fn test_expired_deadline_fails_before_work() {
    let mut conn = setup().await;
    let mut q = Querier::<Sqlite>::builder()
        .connection(&mut conn)
        .scope(Scope::new().with_deadline(tokio::time::Instant::now()))
        .build()
        .unwrap();

    let invoked = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&invoked);
    let err = q
        .atomic(move |_| {
            Box::pin(async move {
                flag.store(true, Ordering::SeqCst);
                Ok::<_, Error>(())
            })
        })
        .await
        .unwrap_err();
    assert!(err.err.is_none());
    assert!(matches!(err.atomic, Some(Error::DeadlineExceeded)));
    assert!(!invoked.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_sqlite_rejects_transaction_options() {
    let mut conn = setup().await;
    let mut q = Querier::<Sqlite>::builder()
        .connection(&mut conn)
        .tx_options(TxOptions::default().read_only(true))
        .build()
        .unwrap();

    let err = q.atomic(noop).await.unwrap_err();
    assert!(matches!(err.atomic, Some(Error::UnsupportedTxOptions("sqlite"))));
}

#[tokio::test]
async fn test_anyhow_work_errors() {
    let mut conn = setup().await;
    let mut q = Querier::<Sqlite>::new(&mut conn);

    let res: anyhow::Result<()> = async {
        q.atomic(|tx| {
            Box::pin(async move {
                insert(tx, "a").await?;
                if tx.in_transaction() {
                    anyhow::bail!("validation failed");
                }
                Ok::<_, anyhow::Error>(())
            })
        })
        .await?;
        Ok(())
    }
    .await;
    let err = res.unwrap_err();
    assert_eq!(err.to_string(), r#"Err: "validation failed" Atomic: <nil>"#);
}
