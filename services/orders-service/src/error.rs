//! Maps `error_handling::ServiceError` onto HTTP responses (§7: domain
//! errors → 4xx, infrastructure errors → 5xx).

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use error_handling::ServiceError;
use std::fmt;

#[derive(Debug)]
pub struct AppError(pub ServiceError);

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        AppError(err)
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(self.0.to_response())
    }
}
