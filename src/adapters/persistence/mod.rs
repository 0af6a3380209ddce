use sqlx::PgPool;

use crate::app_error::AppError;

pub mod invoice;
pub mod payment;
pub mod subscription;
pub mod usage;

/// Postgres implementation of every billing repository.
#[derive(Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    pub fn new(pool: PgPool) -> Self {
        PostgresPersistence { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => AppError::NotFound,
            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();
                // PostgreSQL unique violation
                if db_err.is_unique_violation() || msg.contains("duplicate key") {
                    AppError::InvalidInput("A record with this value already exists".into())
                }
                // PostgreSQL foreign key violation
                else if db_err.is_foreign_key_violation() {
                    AppError::InvalidInput("Referenced record not found".into())
                }
                // PostgreSQL check violation, e.g. a negative amount
                else if db_err.is_check_violation() {
                    AppError::InvalidInput("Value violates a billing constraint".into())
                } else {
                    tracing::error!(error = ?err, "Database error");
                    AppError::Database("Database operation failed".into())
                }
            }
            _ => {
                tracing::error!(error = ?err, "Database error");
                AppError::Database("Database operation failed".into())
            }
        }
    }
}
