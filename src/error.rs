use std::fmt::Display;

use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use actix_web::ResponseError;
use log::error;
use serde::Serialize;
use thiserror::Error;

use crate::geohash::GeoError;

#[derive(Debug, Error)]
pub(crate) enum CommunityError {
    #[error("community with the code {0} not found")]
    CodeNotFound(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("already a member of community {0}")]
    AlreadyMember(String),
    #[error("not a member of community {0}")]
    NotMember(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Debug)]
pub(crate) struct Error(anyhow::Error);

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Self(e)
    }
}

impl From<CommunityError> for Error {
    fn from(e: CommunityError) -> Self {
        Self(e.into())
    }
}

impl From<GeoError> for Error {
    fn from(e: GeoError) -> Self {
        Self(e.into())
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        if let Some(e) = self.0.downcast_ref::<CommunityError>() {
            return match e {
                CommunityError::CodeNotFound(_) | CommunityError::NotFound(_) => StatusCode::NOT_FOUND,
                CommunityError::AlreadyMember(_) | CommunityError::NotMember(_) => StatusCode::CONFLICT,
                CommunityError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            };
        }
        if self.0.downcast_ref::<GeoError>().is_some() {
            return StatusCode::BAD_REQUEST;
        }
        StatusCode::INTERNAL_SERVER_ERROR
    }

    fn error_response(&self) -> HttpResponse<actix_web::body::BoxBody> {
        let status = self.status_code();
        if status.is_server_error() {
            error!("request failed: {:#}", self.0);
            return HttpResponse::new(status);
        }
        HttpResponse::build(status).json(ErrorBody { error: self.to_string() })
    }
}
