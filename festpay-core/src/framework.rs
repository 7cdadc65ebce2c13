use sqlx::SqlitePool;

/// Executes the SQL commands defined next to each entity.
#[derive(Debug, Clone)]
pub struct DatabaseProcessor {
    pub pool: SqlitePool,
}
