//! Error types for web handlers.
//!
//! [`AppError`] carries a status, a stable machine-readable code and a
//! user-facing message. Every [`LedgerError`] maps to exactly one code so
//! clients can branch on "sold out", "already used" or "not approved yet"
//! without parsing messages.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::fmt;
use ticket_ledger_core::LedgerError;

/// Application error type for web handlers.
///
/// # Examples
///
/// ```ignore
/// async fn handler(State(state): State<AppState>, Path(id): Path<TicketId>)
///     -> Result<Json<Ticket>, AppError>
/// {
///     Ok(Json(state.ledger.reservations.get_ticket(id).await?))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: String,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code: code.into(),
            source: None,
        }
    }

    /// Attach the underlying error for logging.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// Create a 400 Bad Request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message, "BAD_REQUEST")
    }

    /// Create a 404 Not Found error.
    #[must_use]
    pub fn not_found(resource: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            format!("{resource} with id {id} not found"),
            "NOT_FOUND",
        )
    }

    /// Create a 422 Unprocessable Entity error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message, "VALIDATION_ERROR")
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            message,
            "INTERNAL_SERVER_ERROR",
        )
    }

    /// Create a 503 Service Unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message, "SERVICE_UNAVAILABLE")
    }

    /// HTTP status of this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Stable error code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    /// Error code (for client error handling).
    code: String,
    /// Human-readable error message.
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            if let Some(source) = &self.source {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    error = %source,
                    "Internal server error"
                );
            } else {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    "Internal server error"
                );
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        if matches!(err, LedgerError::Storage(_)) {
            return Self::internal("An internal error occurred").with_source(err.into());
        }
        let message = err.to_string();
        let (status, code) = match &err {
            LedgerError::InsufficientStock { .. } => (StatusCode::CONFLICT, "SOLD_OUT"),
            LedgerError::InvalidQuantity { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_QUANTITY")
            }
            LedgerError::TierEventMismatch { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "TIER_EVENT_MISMATCH")
            }
            LedgerError::InvalidEnvelope(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_ENVELOPE")
            }
            LedgerError::EventNotUpcoming { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "EVENT_NOT_UPCOMING")
            }
            LedgerError::NotApproved { .. } => {
                (StatusCode::PAYMENT_REQUIRED, "PAYMENT_NOT_APPROVED")
            }
            LedgerError::AlreadyProcessed { .. } => (StatusCode::CONFLICT, "ALREADY_PROCESSED"),
            LedgerError::FullyRedeemed { .. } => (StatusCode::CONFLICT, "FULLY_REDEEMED"),
            LedgerError::OverRedeem { .. } => (StatusCode::CONFLICT, "OVER_REDEEM"),
            LedgerError::EventEnded { .. } => (StatusCode::CONFLICT, "EVENT_ENDED"),
            LedgerError::WrongEvent { .. } => (StatusCode::CONFLICT, "WRONG_EVENT"),
            LedgerError::PaymentIncomplete { .. } => (StatusCode::CONFLICT, "PAYMENT_INCOMPLETE"),
            LedgerError::TerminalState { .. } => (StatusCode::CONFLICT, "TICKET_INACTIVE"),
            LedgerError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            LedgerError::ProviderTimeout => (StatusCode::GATEWAY_TIMEOUT, "PAYMENT_PROVIDER_TIMEOUT"),
            LedgerError::Provider(_) => (StatusCode::BAD_GATEWAY, "PAYMENT_PROVIDER_ERROR"),
            LedgerError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_SERVER_ERROR"),
        };
        Self::new(status, message, code)
    }
}

/// Convert `anyhow::Error` to `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ticket_ledger_core::{ExternalPaymentId, TicketId, TierId};

    #[test]
    fn test_error_display() {
        let err = AppError::bad_request("Invalid input");
        assert_eq!(err.to_string(), "[BAD_REQUEST] Invalid input");
    }

    #[test]
    fn test_not_found() {
        let err = AppError::not_found("Ticket", "123");
        assert_eq!(err.to_string(), "[NOT_FOUND] Ticket with id 123 not found");
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_ledger_error_codes() {
        let sold_out = AppError::from(LedgerError::InsufficientStock {
            tier_id: TierId::new(),
            requested: 2,
            remaining: 1,
        });
        assert_eq!(sold_out.status(), StatusCode::CONFLICT);
        assert_eq!(sold_out.code(), "SOLD_OUT");

        let pending = AppError::from(LedgerError::NotApproved {
            payment_id: ExternalPaymentId::new("42"),
            status: "pending".into(),
        });
        assert_eq!(pending.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(pending.code(), "PAYMENT_NOT_APPROVED");

        let timeout = AppError::from(LedgerError::ProviderTimeout);
        assert_eq!(timeout.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_scan_rejection_keeps_counts_in_message() {
        let err = AppError::from(LedgerError::OverRedeem {
            ticket_id: TicketId::new(),
            requested: 3,
            remaining: 1,
        });
        assert_eq!(err.code(), "OVER_REDEEM");
        assert!(err.message.contains("requested 3 units, 1 remaining"));
    }

    #[test]
    fn test_storage_errors_are_hidden() {
        let err = AppError::from(LedgerError::Storage("connection refused".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.message.contains("connection refused"));
        assert!(err.source.is_some());
    }
}
