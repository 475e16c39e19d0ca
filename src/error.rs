use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShopError {
    #[error("Order not found")]
    OrderNotFound,

    #[error("Product not found")]
    ProductNotFound,

    #[error("You are not allowed to access this order")]
    Forbidden,

    #[error("Login required")]
    Unauthorized,

    #[error("Missing csrf-token header")]
    MissingCsrfToken,

    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("Serialization error: {0}")]
    Bson(#[from] mongodb::bson::ser::Error),

    #[error("Payment gateway error: {0}")]
    Payment(String),

    #[error("Invoice rendering failed: {0}")]
    Render(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(&'static str),
}

pub type Result<T> = std::result::Result<T, ShopError>;

impl ResponseError for ShopError {
    fn status_code(&self) -> StatusCode {
        match self {
            ShopError::OrderNotFound | ShopError::ProductNotFound => StatusCode::NOT_FOUND,
            ShopError::Forbidden | ShopError::MissingCsrfToken => StatusCode::FORBIDDEN,
            ShopError::Unauthorized => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            // Internal detail goes to the log, never to the client.
            log::error!("{self}");
            HttpResponse::build(status).json("Internal Server Error")
        } else {
            HttpResponse::build(status).json(self.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_and_forbidden_stay_distinguishable() {
        assert_eq!(ShopError::OrderNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ShopError::ProductNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ShopError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ShopError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn server_side_failures_use_a_generic_body() {
        let err = ShopError::Payment("card network unreachable".into());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let resp = err.error_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
