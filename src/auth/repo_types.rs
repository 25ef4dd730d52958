use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Subscription plan tag. Maps onto the `subscription` Postgres enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "subscription", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Subscription {
    Starter,
    Pro,
    Business,
}

impl Default for Subscription {
    fn default() -> Self {
        Subscription::Starter
    }
}

/// User record in the database. Serialization always yields a safe projection:
/// the hash, the verification token and the cached token pair never leave the
/// process in a serialized record.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub subscription: Subscription,
    pub avatar_url: String,
    pub verify: bool,
    /// Present while unverified; cleared to None when verification succeeds.
    #[serde(skip_serializing)]
    pub verification_token: Option<String>,
    /// Cache of the most recently issued pair, not the source of truth for
    /// token validity. Cleared on signout.
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub created_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_user_is_a_safe_projection() {
        let user = User {
            id: Uuid::new_v4(),
            email: "a@x.com".into(),
            password_hash: "argon2-hash".into(),
            subscription: Subscription::Starter,
            avatar_url: "avatars/a.png".into(),
            verify: false,
            verification_token: Some("tok".into()),
            access_token: Some("acc".into()),
            refresh_token: Some("ref".into()),
            created_at: OffsetDateTime::now_utc(),
        };

        let json = serde_json::to_string(&user).unwrap();
        assert!(json.contains("a@x.com"));
        assert!(json.contains("starter"));
        assert!(!json.contains("argon2-hash"));
        assert!(!json.contains("\"tok\""));
        assert!(!json.contains("\"acc\""));
        assert!(!json.contains("\"ref\""));
    }

    #[test]
    fn subscription_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Subscription::Business).unwrap(),
            "\"business\""
        );
        assert_eq!(Subscription::default(), Subscription::Starter);
    }
}
