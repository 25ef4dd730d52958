use std::path::PathBuf;

use anyhow::Context;
use axum::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Seam for the avatar image pipeline. Implementations take the uploaded bytes
/// and hand back the public path the processed image is served from.
#[async_trait]
pub trait AvatarPipeline: Send + Sync {
    async fn process(&self, filename: &str, body: Bytes) -> anyhow::Result<String>;
}

/// Writes processed avatars under a local directory, e.g. `public/avatars`,
/// and returns the `avatars/<name>` path stored on the user record.
#[derive(Clone)]
pub struct LocalAvatars {
    dir: PathBuf,
}

impl LocalAvatars {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl AvatarPipeline for LocalAvatars {
    async fn process(&self, filename: &str, body: Bytes) -> anyhow::Result<String> {
        // Uploads from different users may carry the same filename.
        let unique = format!("{}_{}", Uuid::new_v4(), sanitize(filename));
        let dest = self.dir.join(&unique);

        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("create avatar dir {}", self.dir.display()))?;
        tokio::fs::write(&dest, &body)
            .await
            .with_context(|| format!("write avatar {}", dest.display()))?;

        Ok(format!("avatars/{}", unique))
    }
}

fn sanitize(filename: &str) -> String {
    filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Default avatar for accounts created without an upload: a gravatar-style URL
/// derived deterministically from the normalized email.
pub fn gravatar_url(email: &str) -> String {
    let normalized = email.trim().to_lowercase();
    let digest = Sha256::digest(normalized.as_bytes());
    format!("https://gravatar.com/avatar/{}?s=250", hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gravatar_is_deterministic_and_normalizes() {
        let a = gravatar_url("User@Example.com");
        let b = gravatar_url("  user@example.com  ");
        assert_eq!(a, b);
        assert!(a.starts_with("https://gravatar.com/avatar/"));
        assert!(a.ends_with("?s=250"));
    }

    #[test]
    fn gravatar_differs_per_email() {
        assert_ne!(gravatar_url("a@x.com"), gravatar_url("b@x.com"));
    }

    #[test]
    fn sanitize_strips_path_separators() {
        assert_eq!(sanitize("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(sanitize("photo-1.jpg"), "photo-1.jpg");
    }

    #[tokio::test]
    async fn local_pipeline_writes_and_returns_relative_path() {
        let dir = std::env::temp_dir().join(format!("avatars-{}", Uuid::new_v4()));
        let pipeline = LocalAvatars::new(&dir);

        let path = pipeline
            .process("me.png", Bytes::from_static(b"png-bytes"))
            .await
            .expect("process avatar");

        assert!(path.starts_with("avatars/"));
        assert!(path.ends_with("_me.png"));

        let on_disk = dir.join(path.strip_prefix("avatars/").unwrap());
        let contents = tokio::fs::read(on_disk).await.expect("read back");
        assert_eq!(contents, b"png-bytes");

        tokio::fs::remove_dir_all(dir).await.ok();
    }
}
