use jsonwebtoken::{DecodingKey, EncodingKey};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::auth::repo_types::Subscription;

/// Token type used to distinguish access and refresh JWTs.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT payload.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: Uuid,       // user ID
    pub exp: usize,      // expiration time
    pub iat: usize,      // issued at
    pub iss: String,     // issuer
    pub aud: String,     // audience
    pub kind: TokenKind, // access or refresh
}

/// JWT signing/verification keys plus the three lifetimes in play: the signin
/// access TTL, the (longer) access TTL used by the refresh flow, and the
/// refresh-token TTL.
#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub refresh_access_ttl: Duration,
    pub refresh_ttl: Duration,
}

/// Request body for signin.
#[derive(Debug, Deserialize)]
pub struct SigninRequest {
    pub email: String,
    pub password: String,
}

/// Request body for token refresh.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Request body for resending the verification email.
#[derive(Debug, Deserialize)]
pub struct ResendVerifyRequest {
    pub email: String,
}

/// Request body for a subscription change.
#[derive(Debug, Deserialize)]
pub struct UpdateSubscriptionRequest {
    pub subscription: Subscription,
}

/// Public part of the user returned to clients.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub email: String,
    pub subscription: Subscription,
}

/// Response for a successful signup: the safe projection only, never the hash
/// or any token.
#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub email: String,
    pub subscription: Subscription,
}

/// Response for a successful signin.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SigninResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: PublicUser,
}

/// Response for a successful refresh.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
}

/// Plain acknowledgement body.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signin_response_uses_camel_case() {
        let resp = SigninResponse {
            access_token: "a.b.c".into(),
            refresh_token: "d.e.f".into(),
            user: PublicUser {
                email: "a@x.com".into(),
                subscription: Subscription::Starter,
            },
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"accessToken\""));
        assert!(json.contains("\"refreshToken\""));
        assert!(json.contains("\"subscription\":\"starter\""));
    }

    #[test]
    fn refresh_request_accepts_camel_case() {
        let req: RefreshRequest = serde_json::from_str(r#"{"refreshToken":"abc"}"#).unwrap();
        assert_eq!(req.refresh_token, "abc");
    }
}
