//! Caller identity.
//!
//! Authentication happens upstream; requests arrive with the UUID of the
//! already-authenticated account in `X-Owner-Id`.

use crate::error::ErrorResponse;
use axum::extract::FromRequestParts;
use axum::http::{request::Parts, StatusCode};
use axum::Json;
use uuid::Uuid;

pub const OWNER_HEADER: &str = "x-owner-id";

/// Account making the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner(pub Uuid);

impl Owner {
    pub fn id(&self) -> Uuid {
        self.0
    }
}

// Implemented on parts so it composes with Multipart and body extractors.
impl<S> FromRequestParts<S> for Owner
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts.headers.get(OWNER_HEADER).ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(
                    ErrorResponse::new("Missing X-Owner-Id header", "MISSING_OWNER")
                        .with_suggested_action("Send the caller's account id in X-Owner-Id"),
                ),
            )
        })?;

        value
            .to_str()
            .ok()
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
            .map(Owner)
            .ok_or_else(|| {
                (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse::new(
                        "X-Owner-Id must be a UUID",
                        "INVALID_OWNER",
                    )),
                )
            })
    }
}
