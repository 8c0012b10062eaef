//! Caller identity taken from request headers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::UserId;
use domain::{Principal, Role};

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// The authenticated caller of a request.
///
/// `x-user-id` is required. `x-user-role` defaults to `customer`.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub Principal);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header(parts, USER_ID_HEADER)?
            .ok_or_else(|| ApiError::Unauthorized(format!("Missing {USER_ID_HEADER} header")))?
            .parse::<UserId>()
            .map_err(|_| ApiError::Unauthorized(format!("Malformed {USER_ID_HEADER} header")))?;

        let role = match header(parts, USER_ROLE_HEADER)? {
            Some(role) => role
                .parse::<Role>()
                .map_err(|_| ApiError::Unauthorized(format!("Unknown role: {role}")))?,
            None => Role::Customer,
        };

        Ok(Caller(Principal { user_id, role }))
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Result<Option<&'a str>, ApiError> {
    parts
        .headers
        .get(name)
        .map(|value| {
            value
                .to_str()
                .map(str::trim)
                .map_err(|_| ApiError::Unauthorized(format!("Malformed {name} header")))
        })
        .transpose()
}
