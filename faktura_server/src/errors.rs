use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use faktura_engine::{AuthenticationError, InvoicingError, WebhookStoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("Authentication Error. {0}")]
    AuthenticationError(#[from] AuthenticationError),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("{0}")]
    InvoicingError(InvoicingError),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
}

impl ServerError {
    /// The stable machine-readable reason code included in every error response.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::InitializeError(_) | Self::ConfigurationError(_) => "server_error",
            Self::BackendError(_) | Self::IOError(_) | Self::Unspecified(_) => "dependency_error",
            Self::InvalidRequestBody(_) => "invalid_request",
            Self::NoRecordFound(_) => "not_found",
            Self::AuthenticationError(e) => match e {
                AuthenticationError::MissingCredential => "missing_credential",
                AuthenticationError::RequestExpired => "request_expired",
                AuthenticationError::InvalidCredential => "invalid_credential",
                AuthenticationError::InvalidSignature => "invalid_signature",
                AuthenticationError::DatabaseError(_) => "dependency_error",
            },
            Self::InvoicingError(e) => match e {
                InvoicingError::DuplicateOrder { .. } => "duplicate_order",
                InvoicingError::InvoiceNotFound(_) => "not_found",
                InvoicingError::NotEditable(..) => "not_editable",
                InvoicingError::AlreadySent(_) => "already_sent",
                InvoicingError::AlreadyCredited(_) => "already_credited",
                InvoicingError::CannotCancelPaid(_) => "cannot_cancel_paid",
                InvoicingError::CannotCreditCreditNote(_) => "cannot_credit_credit_note",
                InvoicingError::InvalidOrder(_) => "invalid_order",
                InvoicingError::NoOrganization | InvoicingError::OrganizationNotFound(_) => "organization_error",
                InvoicingError::EmailDispatch(_) | InvoicingError::Collaborator(_) => "dependency_error",
                InvoicingError::DatabaseError(_) => "dependency_error",
            },
        }
    }
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::AuthenticationError(e) => match e {
                AuthenticationError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::UNAUTHORIZED,
            },
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::InvoicingError(e) => match e {
                InvoicingError::DuplicateOrder { .. } => StatusCode::CONFLICT,
                InvoicingError::InvoiceNotFound(_) => StatusCode::NOT_FOUND,
                InvoicingError::NotEditable(..) |
                InvoicingError::AlreadySent(_) |
                InvoicingError::AlreadyCredited(_) |
                InvoicingError::CannotCancelPaid(_) |
                InvoicingError::CannotCreditCreditNote(_) |
                InvoicingError::InvalidOrder(_) => StatusCode::BAD_REQUEST,
                InvoicingError::OrganizationNotFound(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::InitializeError(_) |
            Self::BackendError(_) |
            Self::IOError(_) |
            Self::ConfigurationError(_) |
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).insert_header(ContentType::json()).body(
            serde_json::json!({ "error": self.reason_code(), "message": self.to_string() }).to_string(),
        )
    }
}

impl From<InvoicingError> for ServerError {
    fn from(e: InvoicingError) -> Self {
        ServerError::InvoicingError(e)
    }
}

impl From<WebhookStoreError> for ServerError {
    fn from(e: WebhookStoreError) -> Self {
        ServerError::BackendError(e.to_string())
    }
}

#[cfg(test)]
mod test {
    use actix_web::http::StatusCode;
    use faktura_engine::db_types::{InvoiceNumber, InvoiceStatus};

    use super::*;

    #[test]
    fn status_codes_follow_the_error_taxonomy() {
        let number = InvoiceNumber::new(2025, 7);
        let dup = ServerError::from(InvoicingError::DuplicateOrder { invoice_number: number.clone() });
        assert_eq!(dup.status_code(), StatusCode::CONFLICT);
        assert_eq!(dup.reason_code(), "duplicate_order");
        let missing = ServerError::from(InvoicingError::InvoiceNotFound(number.clone()));
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
        let state = ServerError::from(InvoicingError::NotEditable(number.clone(), InvoiceStatus::Sent));
        assert_eq!(state.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(state.reason_code(), "not_editable");
        let auth = ServerError::from(AuthenticationError::RequestExpired);
        assert_eq!(auth.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(auth.reason_code(), "request_expired");
        let dep = ServerError::from(InvoicingError::EmailDispatch("relay down".into()));
        assert_eq!(dep.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn error_responses_carry_code_and_message() {
        let err = ServerError::from(AuthenticationError::InvalidSignature);
        let resp = err.error_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
