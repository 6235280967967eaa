use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use log::error;
use thiserror::Error;

use crate::models::{ErrorBody, OrderStatus, StockIssue};
use crate::payment::PaymentError;

/// Failures coming out of a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// A unique index rejected the write.
    #[error("duplicate key: {0}")]
    Duplicate(String),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("Stock issues found")]
    StockConflict(Vec<StockIssue>),
    #[error("{0}")]
    NotFound(String),
    #[error("Order cannot move from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("{0}")]
    Payment(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("Payment processor error")]
    ExternalService(String),
    #[error("Storage failure")]
    Storage(#[from] StoreError),
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        AppError::ExternalService(err.to_string())
    }
}

impl From<mongodb::error::Error> for AppError {
    fn from(err: mongodb::error::Error) -> Self {
        AppError::Storage(StoreError::Database(err))
    }
}

impl AppError {
    pub fn body(&self) -> ErrorBody {
        let (message, stock_issues) = match self {
            AppError::StockConflict(issues) => (None, issues.clone()),
            AppError::ExternalService(message) => (Some(message.clone()), Vec::new()),
            _ => (None, Vec::new()),
        };
        ErrorBody {
            error: self.to_string(),
            message,
            stock_issues,
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::StockConflict(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidTransition { .. } => StatusCode::CONFLICT,
            AppError::Payment(_) => StatusCode::PAYMENT_REQUIRED,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::ExternalService(_) | AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            AppError::Storage(e) => error!("Storage failure: {}", e),
            AppError::ExternalService(e) => error!("Payment processor error: {}", e),
            _ => {}
        }
        let mut body = serde_json::to_value(self.body()).unwrap_or_default();
        body["success"] = serde_json::Value::Bool(false);
        HttpResponse::build(self.status_code()).json(body)
    }
}
