use thiserror::Error;
use uuid::Uuid;

use crate::domain::reservation::{Actor, ReservationStatus};

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Not found: {entity} with {field}={value}")]
    NotFound {
        entity: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("Validation: {0}")]
    Validation(String),

    #[error("Slot unavailable: {reason}")]
    SlotUnavailable { reason: String },

    #[error("Timed out after {waited_ms}ms waiting for lock {key}")]
    LockTimeout { key: i64, waited_ms: u64 },

    #[error("Invalid state transition {from} -> {to} by {actor}")]
    InvalidStateTransition {
        from: ReservationStatus,
        to: ReservationStatus,
        actor: Actor,
    },

    #[error("Insufficient points: requested {requested}, available {available}")]
    InsufficientPoints { requested: i64, available: i64 },

    #[error("Deposit capture failed for reservation {reservation_id}: {reason}")]
    PaymentCaptureFailed { reservation_id: Uuid, reason: String },

    #[error("Concurrent modification of {entity} {id}")]
    ConcurrentModification { entity: &'static str, id: Uuid },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl DomainError {
    /// Stable machine-readable code for API mapping.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::NotFound { .. } => "NOT_FOUND",
            DomainError::Validation(_) => "VALIDATION_FAILED",
            DomainError::SlotUnavailable { .. } => "SLOT_UNAVAILABLE",
            DomainError::LockTimeout { .. } => "LOCK_TIMEOUT",
            DomainError::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            DomainError::InsufficientPoints { .. } => "INSUFFICIENT_POINTS",
            DomainError::PaymentCaptureFailed { .. } => "PAYMENT_CAPTURE_FAILED",
            DomainError::ConcurrentModification { .. } => "CONCURRENT_MODIFICATION",
            DomainError::Storage(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether this error is likely transient and the operation may
    /// succeed if retried unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DomainError::LockTimeout { .. }
                | DomainError::ConcurrentModification { .. }
                | DomainError::Storage(_)
        )
    }

    /// Whether the caller may retry, possibly with different input
    /// (another slot, fewer points).
    pub fn is_retryable(&self) -> bool {
        self.is_transient() || matches!(self, DomainError::SlotUnavailable { .. })
    }

    /// Errors whose message can be shown to the end user as-is.
    /// Everything else is an internal defect and surfaces as a generic 5xx.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            DomainError::NotFound { .. }
                | DomainError::Validation(_)
                | DomainError::SlotUnavailable { .. }
                | DomainError::LockTimeout { .. }
                | DomainError::InsufficientPoints { .. }
                | DomainError::PaymentCaptureFailed { .. }
        )
    }

    /// Message safe to return to clients.
    pub fn public_message(&self) -> String {
        if self.is_user_facing() {
            self.to_string()
        } else {
            "Internal error, please try again later".to_string()
        }
    }

    pub fn not_found(entity: &'static str, field: &'static str, value: impl ToString) -> Self {
        DomainError::NotFound {
            entity,
            field,
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metrics exporter error: {0}")]
    Metrics(String),
}

impl From<validator::ValidationErrors> for DomainError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut field_errors: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| {
                    let msg = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string());
                    format!("{}: {}", field, msg)
                })
            })
            .collect();
        field_errors.sort();

        if field_errors.is_empty() {
            DomainError::Validation("request is invalid".to_string())
        } else {
            DomainError::Validation(field_errors.join("; "))
        }
    }
}

impl From<InfraError> for DomainError {
    fn from(e: InfraError) -> Self {
        DomainError::Storage(e.to_string())
    }
}

impl From<sea_orm::DbErr> for DomainError {
    fn from(e: sea_orm::DbErr) -> Self {
        DomainError::Storage(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Infra(#[from] InfraError),
}

impl From<sea_orm::DbErr> for AppError {
    fn from(e: sea_orm::DbErr) -> Self {
        AppError::Infra(InfraError::Database(e))
    }
}
