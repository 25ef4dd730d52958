use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::repo_types::{Subscription, User};

const USER_COLUMNS: &str = "id, email, password_hash, subscription, avatar_url, verify, \
                            verification_token, access_token, refresh_token, created_at";

impl User {
    /// Find a user by email.
    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(db)
            .await?;
        Ok(user)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(db)
            .await?;
        Ok(user)
    }

    pub async fn find_by_verification_token(
        db: &PgPool,
        verification_token: &str,
    ) -> anyhow::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE verification_token = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(verification_token)
            .fetch_optional(db)
            .await?;
        Ok(user)
    }

    /// Create a new unverified user. The UNIQUE constraint on email is the
    /// real duplicate guard; callers map its violation to a conflict.
    pub async fn create(
        db: &PgPool,
        email: &str,
        password_hash: &str,
        avatar_url: &str,
        verification_token: &str,
    ) -> anyhow::Result<User> {
        let sql = format!(
            "INSERT INTO users (email, password_hash, avatar_url, verification_token)
             VALUES ($1, $2, $3, $4)
             RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .bind(password_hash)
            .bind(avatar_url)
            .bind(verification_token)
            .fetch_one(db)
            .await?;
        Ok(user)
    }

    /// Overwrite the cached token pair with a freshly issued one.
    pub async fn store_token_pair(
        db: &PgPool,
        id: Uuid,
        access_token: &str,
        refresh_token: &str,
    ) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET access_token = $2, refresh_token = $3 WHERE id = $1")
            .bind(id)
            .bind(access_token)
            .bind(refresh_token)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn clear_token_pair(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET access_token = NULL, refresh_token = NULL WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    /// One-way transition to the verified state; the verification token is
    /// consumed, so a second call with the same token finds nobody.
    pub async fn mark_verified(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET verify = TRUE, verification_token = NULL WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn update_subscription(
        db: &PgPool,
        id: Uuid,
        subscription: Subscription,
    ) -> anyhow::Result<Option<User>> {
        let sql =
            format!("UPDATE users SET subscription = $2 WHERE id = $1 RETURNING {USER_COLUMNS}");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(subscription)
            .fetch_optional(db)
            .await?;
        Ok(user)
    }

    pub async fn update_avatar(
        db: &PgPool,
        id: Uuid,
        avatar_url: &str,
    ) -> anyhow::Result<Option<User>> {
        let sql =
            format!("UPDATE users SET avatar_url = $2 WHERE id = $1 RETURNING {USER_COLUMNS}");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(avatar_url)
            .fetch_optional(db)
            .await?;
        Ok(user)
    }
}
