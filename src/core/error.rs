//! Error taxonomy for the case engine
//!
//! Four failure classes cross the core boundary: caller mistakes
//! (`Validation`), missing SLA configuration (`ConfigurationMissing`),
//! transient store contention that survived the retry budget
//! (`RetriesExhausted`), and definitive store payloads (`Store`). Only the
//! transient class is ever retried.

use thiserror::Error;

/// Errors surfaced by the backing store client.
///
/// Classification happens once, at the rusqlite boundary: lock/timeout
/// results are transient, everything else is a definitive payload whose
/// message is preserved verbatim.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLITE_BUSY / SQLITE_LOCKED class; eligible for retry
    #[error("base de datos ocupada: {0}")]
    Busy(String),

    /// Unique/check/foreign-key violation; definitive, never retried
    #[error("{0}")]
    Constraint(String),

    /// Any other definitive store error payload; never retried
    #[error("{0}")]
    Definitive(String),
}

impl StoreError {
    /// Whether the error is a transient failure worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Busy(_))
    }

    /// Whether the error is a uniqueness/constraint violation
    pub fn is_constraint(&self) -> bool {
        matches!(self, StoreError::Constraint(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(ffi, _) => match ffi.code {
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                    StoreError::Busy(e.to_string())
                }
                rusqlite::ErrorCode::ConstraintViolation => StoreError::Constraint(e.to_string()),
                _ => StoreError::Definitive(e.to_string()),
            },
            _ => StoreError::Definitive(e.to_string()),
        }
    }
}

/// Errors surfaced by case, followup and SLA operations
#[derive(Debug, Error)]
pub enum CoreError {
    /// Structurally invalid caller input; surfaced immediately, never retried
    #[error("{0}")]
    Validation(String),

    /// No SLA row exists for a (tenant, stage) pair; the caller owns the
    /// fallback policy
    #[error("no existe SLA para la etapa '{stage}' en el colegio '{tenant}'")]
    ConfigurationMissing { tenant: String, stage: String },

    /// A record lookup missed outside the documented best-effort paths
    #[error("no se encontró el registro '{0}'")]
    NotFound(String),

    /// Transient store failures outlasted the bounded retry budget
    #[error("operación abandonada tras {attempts} intentos: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: StoreError,
    },

    /// Definitive store error payload, message preserved verbatim
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CoreError {
    /// Shorthand for a validation failure with a display message
    pub fn validation(msg: impl Into<String>) -> Self {
        CoreError::Validation(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn busy_failure() -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".to_string()),
        )
    }

    fn constraint_failure() -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
            Some("UNIQUE constraint failed: seguimientos".to_string()),
        )
    }

    #[test]
    fn test_busy_is_transient() {
        let err = StoreError::from(busy_failure());
        assert!(err.is_transient());
        assert!(!err.is_constraint());
    }

    #[test]
    fn test_constraint_is_definitive() {
        let err = StoreError::from(constraint_failure());
        assert!(!err.is_transient());
        assert!(err.is_constraint());
    }

    #[test]
    fn test_constraint_message_preserved() {
        let err = StoreError::from(constraint_failure());
        assert!(err.to_string().contains("UNIQUE constraint failed"));
    }

    #[test]
    fn test_validation_message_passthrough() {
        let err = CoreError::validation("Datos inválidos para crear caso");
        assert_eq!(err.to_string(), "Datos inválidos para crear caso");
    }
}
