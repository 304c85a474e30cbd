/// Database layer for the user directory
///
/// # Modules
///
/// - `pool`: PostgreSQL connection pool management with health checks
/// - `migrations`: Embedded schema migrations and status
///
/// Row-level SQL lives with the models; the transactional store built on top
/// of this pool is [`crate::store::postgres::PgStore`].
///
/// # Example
///
/// ```no_run
/// use userdir_shared::db::{migrations::run_migrations, pool::{create_pool, DatabaseConfig}};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let pool = create_pool(DatabaseConfig::from_env()?).await?;
///     run_migrations(&pool).await?;
///     Ok(())
/// }
/// ```

pub mod migrations;
pub mod pool;
