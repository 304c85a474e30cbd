/// Database migration runner
///
/// Migrations live in `userdir-shared/migrations/` as reversible pairs:
/// - `{timestamp}_{name}.up.sql`
/// - `{timestamp}_{name}.down.sql`
///
/// They are embedded at compile time with `sqlx::migrate!`.
///
/// # Example
///
/// ```no_run
/// use userdir_shared::db::pool::{create_pool, DatabaseConfig};
/// use userdir_shared::db::migrations::{get_migration_status, run_migrations};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let pool = create_pool(DatabaseConfig::from_env()?).await?;
///
///     run_migrations(&pool).await?;
///
///     let status = get_migration_status(&pool).await?;
///     println!("Applied {} migrations", status.applied_migrations);
///     Ok(())
/// }
/// ```

use sqlx::{migrate::MigrateDatabase, postgres::PgPool, Postgres};
use tracing::{debug, info, warn};

/// Migration status information
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    /// Number of migrations that have been applied
    pub applied_migrations: usize,

    /// Latest applied migration version (timestamp)
    pub latest_version: Option<i64>,

    /// Whether every embedded migration has been applied
    pub is_up_to_date: bool,
}

/// Runs all pending database migrations
///
/// Each migration runs in its own transaction; a failing migration is rolled
/// back and its error returned.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    info!("Starting database migrations");

    match sqlx::migrate!("./migrations").run(pool).await {
        Ok(()) => {
            info!("All database migrations completed successfully");
            Ok(())
        }
        Err(e) => {
            warn!("Migration failed: {}", e);
            Err(e)
        }
    }
}

/// Number of up-migrations embedded in this build
pub fn embedded_migration_count() -> usize {
    sqlx::migrate!("./migrations")
        .iter()
        .filter(|migration| !migration.migration_type.is_down_migration())
        .count()
}

/// Gets the current migration status
///
/// # Errors
///
/// Returns an error if the migrations table cannot be queried.
pub async fn get_migration_status(pool: &PgPool) -> Result<MigrationStatus, sqlx::Error> {
    debug!("Checking migration status");

    let table_exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (
            SELECT FROM information_schema.tables
            WHERE table_schema = 'public'
            AND table_name = '_sqlx_migrations'
        )",
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        debug!("Migrations table does not exist yet");
        return Ok(MigrationStatus {
            applied_migrations: 0,
            latest_version: None,
            is_up_to_date: embedded_migration_count() == 0,
        });
    }

    let (count, latest_version): (i64, Option<i64>) = sqlx::query_as(
        "SELECT
            COUNT(*) as count,
            MAX(version) as latest_version
         FROM _sqlx_migrations
         WHERE success = true",
    )
    .fetch_one(pool)
    .await?;

    debug!(
        applied_migrations = count,
        latest_version = ?latest_version,
        "Migration status retrieved"
    );

    let applied_migrations = count as usize;
    Ok(MigrationStatus {
        applied_migrations,
        latest_version,
        is_up_to_date: applied_migrations >= embedded_migration_count(),
    })
}

/// Creates the database if it doesn't exist (development and tests)
pub async fn ensure_database_exists(database_url: &str) -> Result<(), sqlx::Error> {
    info!("Checking if database exists");

    if !Postgres::database_exists(database_url).await? {
        info!("Database does not exist, creating it");
        Postgres::create_database(database_url).await?;
        info!("Database created successfully");
    } else {
        debug!("Database already exists");
    }

    Ok(())
}

/// Drops the database
///
/// ⚠️  **WARNING**: This PERMANENTLY DELETES ALL DATA. Never use in production.
pub async fn drop_database(database_url: &str) -> Result<(), sqlx::Error> {
    warn!("Dropping database");

    if Postgres::database_exists(database_url).await? {
        Postgres::drop_database(database_url).await?;
        info!("Database dropped successfully");
    } else {
        debug!("Database does not exist, nothing to drop");
    }

    Ok(())
}
