//! services/api/src/web/extract.rs
//!
//! Body and query extractors whose rejections use the same JSON error payload
//! as every other failure.

use axum::{
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::{request::Parts, StatusCode},
    Json,
};
use serde::de::DeserializeOwned;

use crate::web::rest::{error_response, HttpError};

/// A JSON request body. Malformed or mistyped bodies are a 400.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = HttpError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(error_response(
                StatusCode::BAD_REQUEST,
                "validation_error",
                rejection.body_text(),
            )),
        }
    }
}

/// Query-string parameters. Unparseable values are a 400.
pub struct QueryParams<T>(pub T);

impl<S, T> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = HttpError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(QueryParams(value)),
            Err(rejection) => Err(error_response(
                StatusCode::BAD_REQUEST,
                "validation_error",
                rejection.body_text(),
            )),
        }
    }
}
