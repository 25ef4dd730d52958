use axum::{
    extract::{DefaultBodyLimit, FromRef, Multipart, Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use bytes::Bytes;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{
            JwtKeys, MessageResponse, PublicUser, RefreshRequest, RefreshResponse,
            ResendVerifyRequest, SigninRequest, SigninResponse, SignupResponse,
            UpdateSubscriptionRequest,
        },
        extractors::CurrentUser,
        repo_types::User,
        services::{
            generate_verification_token, hash_password, is_valid_email, verify_password,
        },
    },
    avatars::gravatar_url,
    email::send_verification_email,
    error::ApiError,
    state::AppState,
};

const INVALID_CREDENTIALS: &str = "Email or password invalid";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users/signup", post(signup))
        .route("/users/signin", post(signin))
        .route("/users/signout", post(signout))
        .route("/users/current", get(get_current))
        .route("/users/refresh", post(refresh))
        .route("/users/verify/:verification_token", get(verify_email))
        .route("/users/verify", post(resend_verify_email))
        .route("/users/:user_id/subscription", patch(update_subscription))
        .route("/users/:user_id/avatars", patch(update_avatar))
        .layer(DefaultBodyLimit::max(5 * 1024 * 1024))
}

struct SignupForm {
    email: String,
    password: String,
    avatar: Option<(String, Bytes)>,
}

async fn read_signup_form(mut mp: Multipart) -> Result<SignupForm, ApiError> {
    let mut email = None;
    let mut password = None;
    let mut avatar = None;

    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|_| ApiError::BadRequest("Malformed multipart body".into()))?
    {
        match field.name() {
            Some("email") => {
                email = Some(field.text().await.map_err(bad_field)?);
            }
            Some("password") => {
                password = Some(field.text().await.map_err(bad_field)?);
            }
            Some("avatar") => {
                let filename = field
                    .file_name()
                    .unwrap_or("avatar")
                    .to_string();
                let body = field.bytes().await.map_err(bad_field)?;
                avatar = Some((filename, body));
            }
            _ => {}
        }
    }

    Ok(SignupForm {
        email: email.ok_or_else(|| ApiError::BadRequest("email is required".into()))?,
        password: password.ok_or_else(|| ApiError::BadRequest("password is required".into()))?,
        avatar,
    })
}

fn bad_field(_: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::BadRequest("Malformed multipart body".into())
}

#[instrument(skip(state, mp))]
pub async fn signup(
    State(state): State<AppState>,
    mp: Multipart,
) -> Result<(StatusCode, Json<SignupResponse>), ApiError> {
    let mut form = read_signup_form(mp).await?;
    form.email = form.email.trim().to_lowercase();

    if !is_valid_email(&form.email) {
        warn!(email = %form.email, "invalid email");
        return Err(ApiError::BadRequest("Invalid email".into()));
    }
    if form.password.len() < 8 {
        warn!("password too short");
        return Err(ApiError::BadRequest("Password too short".into()));
    }

    // Friendly pre-check; the UNIQUE constraint below is what actually closes
    // the concurrent-signup window.
    if User::find_by_email(&state.db, &form.email).await?.is_some() {
        warn!(email = %form.email, "email already registered");
        return Err(ApiError::Conflict("Email already in use".into()));
    }

    let avatar_url = match form.avatar {
        Some((filename, body)) => state.avatars.process(&filename, body).await?,
        None => gravatar_url(&form.email),
    };

    let password_hash = hash_password(&form.password)?;
    let verification_token = generate_verification_token();

    let user = match User::create(
        &state.db,
        &form.email,
        &password_hash,
        &avatar_url,
        &verification_token,
    )
    .await
    {
        Ok(u) => u,
        Err(e) if is_unique_violation(&e) => {
            warn!(email = %form.email, "lost signup race");
            return Err(ApiError::Conflict("Email already in use".into()));
        }
        Err(e) => return Err(e.into()),
    };

    send_verification_email(state.mailer.clone(), user.email.clone(), verification_token);

    info!(user_id = %user.id, email = %user.email, "user signed up");
    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            email: user.email,
            subscription: user.subscription,
        }),
    ))
}

fn is_unique_violation(e: &anyhow::Error) -> bool {
    e.downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .and_then(|db| db.code())
        .map(|code| code == "23505")
        .unwrap_or(false)
}

#[instrument(skip(state, payload))]
pub async fn signin(
    State(state): State<AppState>,
    Json(mut payload): Json<SigninRequest>,
) -> Result<Json<SigninResponse>, ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    // Unknown email and wrong password answer identically so signin cannot be
    // used to enumerate accounts.
    let user = User::find_by_email(&state.db, &payload.email)
        .await?
        .ok_or_else(|| {
            warn!(email = %payload.email, "signin unknown email");
            ApiError::Unauthorized(INVALID_CREDENTIALS.into())
        })?;

    if !user.verify {
        warn!(user_id = %user.id, "signin before verification");
        return Err(ApiError::Unauthorized("Email not verified".into()));
    }

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = %user.id, "signin invalid password");
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.into()));
    }

    let keys = JwtKeys::from_ref(&state);
    let access_token = keys.sign_access(user.id)?;
    let refresh_token = keys.sign_refresh(user.id)?;
    User::store_token_pair(&state.db, user.id, &access_token, &refresh_token).await?;

    info!(user_id = %user.id, "user signed in");
    Ok(Json(SigninResponse {
        access_token,
        refresh_token,
        user: PublicUser {
            email: user.email,
            subscription: user.subscription,
        },
    }))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, ApiError> {
    // Every failure in the refresh flow collapses into 403: callers learn
    // nothing about whether the token was expired, forged or orphaned.
    match refresh_pair(&state, &payload.refresh_token).await {
        Ok(resp) => Ok(Json(resp)),
        Err(e) => {
            warn!(error = %e, "refresh rejected");
            Err(ApiError::Forbidden)
        }
    }
}

async fn refresh_pair(state: &AppState, refresh_token: &str) -> anyhow::Result<RefreshResponse> {
    let keys = JwtKeys::from_ref(state);
    let claims = keys.verify_refresh(refresh_token)?;

    let user = User::find_by_id(&state.db, claims.sub)
        .await?
        .ok_or_else(|| anyhow::anyhow!("refresh subject no longer exists"))?;

    let access_token = keys.sign_refreshed_access(user.id)?;
    let refresh_token = keys.sign_refresh(user.id)?;
    User::store_token_pair(&state.db, user.id, &access_token, &refresh_token).await?;

    info!(user_id = %user.id, "token pair refreshed");
    Ok(RefreshResponse {
        access_token,
        refresh_token,
    })
}

#[instrument(skip_all)]
pub async fn signout(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<MessageResponse>, ApiError> {
    // Clears the cached pair only; an unexpired token presented directly still
    // verifies (validity is signature + expiry, not the cache).
    User::clear_token_pair(&state.db, user.id).await?;
    info!(user_id = %user.id, "user signed out");
    Ok(Json(MessageResponse::new("Signout success")))
}

#[instrument(skip_all)]
pub async fn get_current(CurrentUser(user): CurrentUser) -> Json<PublicUser> {
    Json(PublicUser {
        email: user.email,
        subscription: user.subscription,
    })
}

#[instrument(skip(state, payload))]
pub async fn update_subscription(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<UpdateSubscriptionRequest>,
) -> Result<Json<User>, ApiError> {
    let user = User::update_subscription(&state.db, user_id, payload.subscription)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    info!(user_id = %user.id, subscription = ?user.subscription, "subscription updated");
    Ok(Json(user))
}

#[instrument(skip(state, mp))]
pub async fn update_avatar(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    mut mp: Multipart,
) -> Result<Json<User>, ApiError> {
    let mut upload = None;
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|_| ApiError::BadRequest("Malformed multipart body".into()))?
    {
        if field.name() == Some("avatar") {
            let filename = field.file_name().unwrap_or("avatar").to_string();
            let body = field.bytes().await.map_err(bad_field)?;
            upload = Some((filename, body));
        }
    }

    let (filename, body) = upload.ok_or_else(|| ApiError::NotFound("File not found".into()))?;
    let avatar_url = state.avatars.process(&filename, body).await?;

    let user = User::update_avatar(&state.db, user_id, &avatar_url)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    info!(user_id = %user.id, avatar_url = %user.avatar_url, "avatar updated");
    Ok(Json(user))
}

#[instrument(skip(state))]
pub async fn verify_email(
    State(state): State<AppState>,
    Path(verification_token): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    // One-shot: the token is consumed below, so a repeat call lands here with
    // an unknown token and gets the same 404.
    let user = User::find_by_verification_token(&state.db, &verification_token)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    User::mark_verified(&state.db, user.id).await?;

    info!(user_id = %user.id, "email verified");
    Ok(Json(MessageResponse::new("Email verified successfully")))
}

#[instrument(skip(state, payload))]
pub async fn resend_verify_email(
    State(state): State<AppState>,
    Json(mut payload): Json<ResendVerifyRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    let user = User::find_by_email(&state.db, &payload.email)
        .await?
        .ok_or_else(|| ApiError::NotFound("Email not found".into()))?;

    if user.verify {
        return Err(ApiError::BadRequest("Email already verified".into()));
    }

    // Reuse the stored token; no new one is minted here.
    let verification_token = user
        .verification_token
        .clone()
        .ok_or_else(|| anyhow::anyhow!("unverified user without verification token"))?;

    send_verification_email(state.mailer.clone(), user.email, verification_token);

    Ok(Json(MessageResponse::new("Verification email resent")))
}
