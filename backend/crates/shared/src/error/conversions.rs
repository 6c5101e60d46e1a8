//! Error conversions
//!
//! Storage error classification and the HTTP rendering of [`AppError`].

// ============================================================================
// SQLx classification (feature-gated)
// ============================================================================

/// What a storage failure means to the caller.
#[cfg(feature = "sqlx")]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbErrorClass {
    /// A unique constraint rejected the write; carries the constraint name.
    UniqueViolation { constraint: Option<String> },
    /// Safe to retry: serialization failure, deadlock, lock timeout.
    Transient,
    /// The database cannot be reached or is out of resources.
    Unavailable,
    /// Anything else.
    Other,
}

/// Classify a `sqlx` error using PostgreSQL SQLSTATE codes.
///
/// <https://www.postgresql.org/docs/current/errcodes-appendix.html>
#[cfg(feature = "sqlx")]
pub fn classify_sqlx(err: &sqlx::Error) -> DbErrorClass {
    match err {
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            // Class 23: Integrity Constraint Violation
            Some("23505") => DbErrorClass::UniqueViolation {
                constraint: db_err.constraint().map(str::to_string),
            },
            // Class 40: Transaction Rollback / Class 55: lock_not_available
            Some("40001") | Some("40P01") | Some("55P03") => DbErrorClass::Transient,
            // Class 53: Insufficient Resources / Class 57: Operator Intervention
            Some("53000") | Some("53100") | Some("53200") | Some("53300") | Some("57000")
            | Some("57014") | Some("57P01") | Some("57P02") | Some("57P03") => {
                DbErrorClass::Unavailable
            }
            _ => DbErrorClass::Other,
        },
        sqlx::Error::PoolTimedOut => DbErrorClass::Transient,
        sqlx::Error::Io(_) | sqlx::Error::PoolClosed | sqlx::Error::Tls(_) => {
            DbErrorClass::Unavailable
        }
        _ => DbErrorClass::Other,
    }
}

// ============================================================================
// Axum conversions (feature-gated)
// ============================================================================

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for super::app_error::AppError {
    fn into_response(self) -> axum::response::Response {
        use axum::Json;
        use axum::http::StatusCode;

        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        // RFC 7807 Problem Details, plus a stable `code`
        let body = serde_json::json!({
            "type": format!("https://httpstatuses.io/{}", self.status_code()),
            "title": self.kind().as_str(),
            "status": self.status_code(),
            "code": self.code(),
            "detail": self.message(),
        });

        (status, Json(body)).into_response()
    }
}
