//! `PostgreSQL` persistence for the homestay booking core.
//!
//! [`PostgresBookingStore`] implements [`homestay_booking::BookingStore`]:
//! each unit of work is one database transaction, reservation rows read for
//! a transition are locked with `FOR UPDATE`, and outbox rows are written in
//! the same transaction as the state they describe. A CDC connector tails the
//! `outbox` table; nothing here publishes to the broker.
//!
//! # Example
//!
//! ```ignore
//! use homestay_postgres::{PostgresBookingStore, connect, migrate};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = connect("postgres://localhost/homestay", 10).await?;
//!     migrate(&pool).await?;
//!     let store = PostgresBookingStore::new(pool);
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod rows;
mod store;

pub use store::{PostgresBookingStore, PostgresUnitOfWork};

use homestay_booking::BookingError;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Open a connection pool.
///
/// # Errors
///
/// Returns [`BookingError::Store`] when the database is unreachable.
pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, BookingError> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .map_err(|e| BookingError::Store(format!("failed to connect to postgres: {e}")))
}

/// Apply the embedded schema migrations.
///
/// # Errors
///
/// Returns [`BookingError::Store`] when a migration fails.
pub async fn migrate(pool: &PgPool) -> Result<(), BookingError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| BookingError::Store(format!("migration failed: {e}")))?;
    tracing::info!("Database migrations applied");
    Ok(())
}
