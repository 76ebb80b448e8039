use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};

use crate::messaging::PublishError;
use crate::store::{DecodeError, StoreError};

// ============================================================================
// Customer Operation Errors
// ============================================================================
//
// - NotFound: expected outcome, the id is absent (client error)
// - Decode:   a stored item is malformed (never retried)
// - Store:    store transport/service failure (retried at the gateway)
// - Publish:  the bus rejected the event; the store write is NOT rolled back
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CustomerError {
    #[error("Customer not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

impl CustomerError {
    pub fn kind(&self) -> &'static str {
        match self {
            CustomerError::NotFound(_) => "NotFound",
            CustomerError::Decode(_) => "Decode",
            CustomerError::Store(_) => "Store",
            CustomerError::Publish(_) => "Publish",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CustomerError::NotFound(_))
    }
}

/// Status mapping for whatever routing layer sits in front of the service.
impl ResponseError for CustomerError {
    fn status_code(&self) -> StatusCode {
        match self {
            CustomerError::NotFound(_) => StatusCode::NOT_FOUND,
            CustomerError::Decode(_) | CustomerError::Store(_) | CustomerError::Publish(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": self.kind(),
            "message": self.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DecodeErrorKind;

    #[test]
    fn test_not_found_is_client_error() {
        let err = CustomerError::NotFound("nonexistent".to_string());
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Customer not found: nonexistent");
    }

    #[test]
    fn test_infrastructure_failures_are_server_errors() {
        let errors = [
            CustomerError::from(StoreError::Backend {
                operation: "put_item",
                message: "connection reset".to_string(),
            }),
            CustomerError::from(PublishError::new("ThrottlingException", "rate exceeded")),
            CustomerError::from(DecodeError {
                kind: DecodeErrorKind::MissingField,
                attribute: "Email".to_string(),
                id: None,
            }),
        ];

        for err in errors {
            assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR, "{err}");
            assert!(!err.is_not_found());
        }
    }

    #[test]
    fn test_error_response_body() {
        let err = CustomerError::from(PublishError::new("ThrottlingException", "rate exceeded"));
        let response = err.error_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.kind(), "Publish");
    }
}
