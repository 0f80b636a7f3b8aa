//! Conversions from external infrastructure errors into domain errors.

use courier_domain::CourierError;
use rusqlite::Error as SqlError;
use tokio::task::JoinError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub CourierError);

impl From<InfraError> for CourierError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<CourierError> for InfraError {
    fn from(value: CourierError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoCourierError {
    fn into_courier(self) -> CourierError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → CourierError */
/* -------------------------------------------------------------------------- */

impl IntoCourierError for SqlError {
    fn into_courier(self) -> CourierError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => {
                        CourierError::Database("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        CourierError::Database("database is locked".into())
                    }
                    (ErrorCode::ConstraintViolation, 2067) => {
                        CourierError::Database("unique constraint violation".into())
                    }
                    (ErrorCode::ConstraintViolation, 787) => {
                        CourierError::Database("foreign key constraint violation".into())
                    }
                    _ => CourierError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => CourierError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                CourierError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                CourierError::Database(format!("invalid column type: {ty}"))
            }
            RE::Utf8Error(_) => CourierError::Database("invalid UTF-8 returned from sqlite".into()),
            RE::InvalidPath(path) => {
                CourierError::Database(format!("invalid database path: {}", path.to_string_lossy()))
            }
            RE::InvalidQuery => CourierError::Database("invalid SQL query".into()),
            other => CourierError::Database(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_courier())
    }
}

/* -------------------------------------------------------------------------- */
/* tokio JoinError → CourierError */
/* -------------------------------------------------------------------------- */

impl IntoCourierError for JoinError {
    fn into_courier(self) -> CourierError {
        if self.is_cancelled() {
            CourierError::Internal("blocking task cancelled".into())
        } else {
            CourierError::Internal(format!("blocking task panic: {self}"))
        }
    }
}

impl From<JoinError> for InfraError {
    fn from(value: JoinError) -> Self {
        InfraError(value.into_courier())
    }
}

/// Map a rusqlite error straight to the domain error.
pub(crate) fn map_sql_error(err: SqlError) -> CourierError {
    InfraError::from(err).into()
}

/// Map a blocking-task join error straight to the domain error.
pub(crate) fn map_join_error(err: JoinError) -> CourierError {
    InfraError::from(err).into()
}
