use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};

use crate::auth::dto::{JwtKeys, TokenKind};
use crate::auth::repo_types::User;
use crate::error::ApiError;
use crate::state::AppState;

/// Resolves the bearer token to the full user record, so handlers behind it
/// (current, signout) work on an already-authenticated record.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Not authorized".into()))?;

        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .ok_or_else(|| ApiError::Unauthorized("Not authorized".into()))?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys
            .verify(token)
            .map_err(|_| ApiError::Unauthorized("Not authorized".into()))?;

        if claims.kind != TokenKind::Access {
            return Err(ApiError::Unauthorized("Not authorized".into()));
        }

        let user = User::find_by_id(&state.db, claims.sub)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("Not authorized".into()))?;

        Ok(CurrentUser(user))
    }
}
