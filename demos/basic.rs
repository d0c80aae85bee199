use sqlx::{Connection, MySql, MySqlConnection};
use sqlx_atomic::{Error, Querier};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "sqlx_atomic=debug".into()))
        .init();

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "mysql://localhost/test".to_string());
    let mut conn = MySqlConnection::connect(&database_url).await?;
    let mut q = Querier::<MySql>::new(&mut conn);

    println!("=== Basic Atomic Example ===\n");

    // Example 1: Simple INSERT
    println!("1. Creating a user...");
    q.atomic(|tx| {
        Box::pin(async move {
            tx.execute(
                sqlx::query("INSERT INTO users (name, email) VALUES (?, ?)")
                    .bind("Alice")
                    .bind("alice@example.com"),
            )
            .await?;
            Ok::<_, Error>(())
        })
    })
    .await?;
    println!("   ✓ User created successfully\n");

    // Example 2: Multiple operations in one transaction
    println!("2. Creating user with profile...");
    let user_id = q
        .atomic(|tx| {
            Box::pin(async move {
                let result = tx
                    .execute(
                        sqlx::query("INSERT INTO users (name, email) VALUES (?, ?)")
                            .bind("Bob")
                            .bind("bob@example.com"),
                    )
                    .await?;
                let user_id = result.last_insert_id() as i64;

                tx.execute(
                    sqlx::query("INSERT INTO profiles (user_id, bio) VALUES (?, ?)")
                        .bind(user_id)
                        .bind("Software Developer"),
                )
                .await?;

                Ok::<_, Error>(user_id)
            })
        })
        .await?;
    println!("   ✓ User and profile created with ID: {}\n", user_id);

    // Example 3: Error handling and automatic rollback
    println!("3. Testing rollback on error...");
    let result = q
        .atomic(|tx| {
            Box::pin(async move {
                tx.execute(
                    sqlx::query("INSERT INTO users (name, email) VALUES (?, ?)")
                        .bind("Charlie")
                        .bind("charlie@example.com"),
                )
                .await?;

                tx.execute("SELECT * FROM non_existent_table").await?;
                Ok::<_, Error>(())
            })
        })
        .await;

    match result {
        Ok(()) => println!("   ✗ Unexpected success\n"),
        Err(e) => println!("   ✓ Rolled back: {e}\n"),
    }

    println!("=== All examples completed ===");
    Ok(())
}
