use axum::{
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Response},
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use uuid::Uuid;

use crate::responses::JsonResponse;
use crate::state::AppState;
use crate::utils::jwt::decode_jwt;

/// The authenticated subscriber, extracted from a bearer token.
pub struct AuthSubscriber {
    pub subscriber_id: Uuid,
    pub email: String,
}

impl FromRequestParts<AppState> for AuthSubscriber {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| {
                    JsonResponse::unauthorized("Missing bearer token").into_response()
                })?;

        let token = decode_jwt(bearer.token(), &state.jwt_keys)
            .map_err(|_| JsonResponse::unauthorized("Invalid or expired token").into_response())?;

        Ok(AuthSubscriber {
            subscriber_id: token.claims.sub,
            email: token.claims.email,
        })
    }
}
