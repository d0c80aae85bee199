use sqlx::{Connection, MySql, MySqlConnection};
use sqlx_atomic::{Error, Querier};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "sqlx_atomic=debug".into()))
        .init();

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "mysql://localhost/test".to_string());
    let mut conn = MySqlConnection::connect(&database_url).await?;
    let mut q = Querier::<MySql>::new(&mut conn);

    println!("=== Nested Atomic (Savepoint) Example ===\n");

    // Example 1: Successful nested unit of work
    println!("1. Nested unit of work - both succeed...");
    q.atomic(|tx| {
        Box::pin(async move {
            let result = tx
                .execute(
                    sqlx::query("INSERT INTO users (name, email) VALUES (?, ?)")
                        .bind("David")
                        .bind("david@example.com"),
                )
                .await?;
            let user_id = result.last_insert_id() as i64;
            println!("   Outer: Created user with ID {}", user_id);

            tx.atomic(|sp| {
                Box::pin(async move {
                    sp.execute(
                        sqlx::query("INSERT INTO audit_log (user_id, action) VALUES (?, ?)")
                            .bind(user_id)
                            .bind("User created"),
                    )
                    .await?;
                    println!("   Nested: Created audit log in savepoint {:?}", sp.savepoint_name());
                    Ok::<_, Error>(())
                })
            })
            .await?;

            println!("   ✓ Transaction committed, savepoint released\n");
            Ok::<_, Error>(())
        })
    })
    .await?;

    // Example 2: Nested unit of work fails, outer succeeds
    println!("2. Nested unit of work fails, outer succeeds...");
    q.atomic(|tx| {
        Box::pin(async move {
            let result = tx
                .execute(
                    sqlx::query("INSERT INTO users (name, email) VALUES (?, ?)")
                        .bind("Eve")
                        .bind("eve@example.com"),
                )
                .await?;
            let user_id = result.last_insert_id() as i64;
            println!("   Outer: Created user with ID {}", user_id);

            let nested = tx
                .atomic(|sp| {
                    Box::pin(async move {
                        sp.execute(sqlx::query("INSERT INTO non_existent_table VALUES (?)").bind(user_id))
                            .await?;
                        Ok::<_, Error>(())
                    })
                })
                .await;

            if let Err(e) = nested {
                println!("   Nested: Rolled back to savepoint ({e})");
            }
            println!("   ✓ Outer transaction still commits\n");
            Ok::<_, Error>(())
        })
    })
    .await?;

    // Example 3: Three levels deep, the middle level swallows the innermost failure
    println!("3. Three levels, innermost fails...");
    q.atomic(|tx| {
        Box::pin(async move {
            tx.atomic(|outer_sp| {
                Box::pin(async move {
                    outer_sp
                        .execute(sqlx::query("INSERT INTO audit_log (action) VALUES (?)").bind("level 1"))
                        .await?;

                    let inner = outer_sp
                        .atomic(|inner_sp| {
                            Box::pin(async move {
                                inner_sp.execute("SELECT * FROM non_existent_table").await?;
                                Ok::<_, Error>(())
                            })
                        })
                        .await;
                    println!("   Level 2 result: {:?}", inner.map_err(|e| e.to_string()));
                    Ok::<_, Error>(())
                })
            })
            .await?;
            Ok::<_, Error>(())
        })
    })
    .await?;
    println!("   ✓ Level 1 released, transaction committed\n");

    println!("=== All examples completed ===");
    Ok(())
}
