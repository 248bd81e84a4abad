use crate::config::Config;
use crate::error::DBError;

// Runtime checked statements, no DATABASE_URL at build time
macro_rules! sql_stmnt {
    ($ret:ident, $stmt:expr) => {
        sqlx::query_as::<_ ,$ret>($stmt)
    };
    ($stmt:expr) => {
        sqlx::query($stmt)
    };
    ($ret:ident, $stmt:expr, $($bind:expr),*) => {
        sqlx::query_as::<_ ,$ret>($stmt)$(.bind($bind))*
    };
    ($stmt:expr, $($bind:expr),*) => {
        sqlx::query($stmt)$(.bind($bind))*
    };
}

pub async fn establish_db_connection(config: &Config) -> Result<sqlx::PgPool, DBError> {
    Ok(sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.db_max_connections())
        .acquire_timeout(config.db_acquire_timeout())
        .connect(config.database_url())
        .await?)
}

/// Applies every pending migration under `app/migrations`
pub async fn run_migrations(conn: &sqlx::PgPool) -> Result<(), DBError> {
    sqlx::migrate!("./migrations").run(conn).await?;
    Ok(())
}

pub async fn check_schema(conn: &sqlx::PgPool) -> Result<(), DBError> {
    sql_stmnt!("SELECT 1 FROM sensors LIMIT 1")
        .fetch_optional(conn)
        .await?;
    Ok(())
}

pub mod reading;
pub mod sensor;
